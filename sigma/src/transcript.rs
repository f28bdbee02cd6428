//! Defines a `TranscriptProtocol` trait for using a Merlin transcript.

use curve25519_dalek::scalar::Scalar;
use merlin::Transcript;

/// Extension trait to the Merlin transcript API that adds the proof domain
/// separator and generates challenges as scalars.
pub trait TranscriptProtocol {
    /// Starts the transcript for proving `message`.
    fn sigma_proof(message: &[u8]) -> Self;
    /// Compute a `label`ed challenge variable.
    fn challenge_scalar(&mut self, label: &'static [u8]) -> Scalar;
}

impl TranscriptProtocol for Transcript {
    fn sigma_proof(message: &[u8]) -> Self {
        let mut t = Transcript::new(b"Sigma.proof");
        t.append_message(b"msg", message);
        t
    }

    fn challenge_scalar(&mut self, label: &'static [u8]) -> Scalar {
        let mut buf = [0u8; 64];
        self.challenge_bytes(label, &mut buf);
        Scalar::from_bytes_mod_order_wide(&buf)
    }
}
