use serde::{Deserialize, Serialize};

/*
Example parameters file:

storage_fee_factor = 1_250_000
min_value_per_byte = 360
max_block_size = 524_288
token_access_cost = 100
input_cost = 2_000
data_input_cost = 100
output_cost = 100
max_block_cost = 1_000_000
block_version = 3

*/

/// Network parameters a transaction is reduced under.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockchainParameters {
    /// Storage fee per byte per storage period.
    #[serde(default = "BlockchainParameters::default_storage_fee_factor")]
    pub storage_fee_factor: u64,

    /// Minimum value a box must hold per byte of its encoding.
    #[serde(default = "BlockchainParameters::default_min_value_per_byte")]
    pub min_value_per_byte: u64,

    /// Maximum block size in bytes.
    #[serde(default = "BlockchainParameters::default_max_block_size")]
    pub max_block_size: u64,

    /// Cost of accessing one token entry.
    #[serde(default = "BlockchainParameters::default_token_access_cost")]
    pub token_access_cost: u64,

    /// Cost per transaction input.
    #[serde(default = "BlockchainParameters::default_input_cost")]
    pub input_cost: u64,

    /// Cost per data input.
    #[serde(default = "BlockchainParameters::default_data_input_cost")]
    pub data_input_cost: u64,

    /// Cost per output.
    #[serde(default = "BlockchainParameters::default_output_cost")]
    pub output_cost: u64,

    /// Computation ceiling of a block. Also bounds a single transaction.
    #[serde(default = "BlockchainParameters::default_max_block_cost")]
    pub max_block_cost: u64,

    /// Height at which the current soft-fork voting began.
    #[serde(default)]
    pub soft_fork_starting_height: Option<u32>,

    /// Votes collected for the current soft fork.
    #[serde(default)]
    pub soft_fork_votes_collected: Option<u32>,

    /// Protocol version of blocks.
    #[serde(default = "BlockchainParameters::default_block_version")]
    pub block_version: u8,
}

impl BlockchainParameters {
    /// Parses parameters from a TOML document. Missing keys take their defaults.
    pub fn from_toml_str(s: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(s)
    }

    /// Returns a documentation for the parameters file.
    pub fn documentation() -> &'static str {
        r##"
    storage_fee_factor = 1_250_000  # storage fee per byte per storage period
    min_value_per_byte = 360        # minimum value per byte of a box
    max_block_size = 524_288        # maximum block size in bytes
    token_access_cost = 100         # cost of accessing one token entry
    input_cost = 2_000              # cost per transaction input
    data_input_cost = 100           # cost per data input
    output_cost = 100               # cost per output
    max_block_cost = 1_000_000      # computation ceiling of a block
    soft_fork_starting_height = 0   # optional; height at which soft-fork voting began
    soft_fork_votes_collected = 0   # optional; votes collected for the soft fork
    block_version = 3               # protocol version of blocks
"##
    }

    pub fn default_storage_fee_factor() -> u64 {
        1_250_000
    }

    pub fn default_min_value_per_byte() -> u64 {
        360
    }

    pub fn default_max_block_size() -> u64 {
        524_288
    }

    pub fn default_token_access_cost() -> u64 {
        100
    }

    pub fn default_input_cost() -> u64 {
        2_000
    }

    pub fn default_data_input_cost() -> u64 {
        100
    }

    pub fn default_output_cost() -> u64 {
        100
    }

    pub fn default_max_block_cost() -> u64 {
        1_000_000
    }

    pub fn default_block_version() -> u8 {
        3
    }
}

impl Default for BlockchainParameters {
    fn default() -> Self {
        BlockchainParameters {
            storage_fee_factor: Self::default_storage_fee_factor(),
            min_value_per_byte: Self::default_min_value_per_byte(),
            max_block_size: Self::default_max_block_size(),
            token_access_cost: Self::default_token_access_cost(),
            input_cost: Self::default_input_cost(),
            data_input_cost: Self::default_data_input_cost(),
            output_cost: Self::default_output_cost(),
            max_block_cost: Self::default_max_block_cost(),
            soft_fork_starting_height: None,
            soft_fork_votes_collected: None,
            block_version: Self::default_block_version(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_document_yields_defaults() {
        let p = BlockchainParameters::from_toml_str("").unwrap();
        assert_eq!(p, BlockchainParameters::default());
        assert_eq!(p.max_block_cost, 1_000_000);
        assert_eq!(p.soft_fork_starting_height, None);
    }

    #[test]
    fn overrides_single_keys() {
        let p = BlockchainParameters::from_toml_str(
            "max_block_cost = 5_000\nsoft_fork_votes_collected = 12\n",
        )
        .unwrap();
        assert_eq!(p.max_block_cost, 5_000);
        assert_eq!(p.soft_fork_votes_collected, Some(12));
        assert_eq!(p.input_cost, 2_000);
    }

    #[test]
    fn documentation_parses() {
        let p = BlockchainParameters::from_toml_str(BlockchainParameters::documentation()).unwrap();
        assert_eq!(p.soft_fork_starting_height, Some(0));
        assert_eq!(p.block_version, 3);
    }

    #[test]
    fn rejects_wrong_types() {
        assert!(BlockchainParameters::from_toml_str("block_version = \"three\"").is_err());
    }
}
