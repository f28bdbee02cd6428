//! Binary encoding utils shared by the proposition and proof codecs.
//! Integers are little-endian; sizes are LE32; points and scalars are 32 bytes.

use std::convert::TryFrom;

use curve25519_dalek::ristretto::CompressedRistretto;
use curve25519_dalek::scalar::Scalar;
use merlin::Transcript;

use crate::errors::CodecError;

/// Interface for writing binary data. Labels only matter for transcripts;
/// byte buffers ignore them.
pub trait Writer {
    /// Writes bytes with the given label.
    fn write(&mut self, label: &'static [u8], src: &[u8]);

    /// Writes a single byte.
    #[inline]
    fn write_u8(&mut self, label: &'static [u8], x: u8) {
        self.write(label, &[x])
    }

    /// Writes a LE32-encoded integer.
    #[inline]
    fn write_u32(&mut self, label: &'static [u8], x: u32) {
        self.write(label, &x.to_le_bytes())
    }

    /// Writes a LE64-encoded integer.
    #[inline]
    fn write_u64(&mut self, label: &'static [u8], x: u64) {
        self.write(label, &x.to_le_bytes())
    }

    /// Writes a length or count as LE32. A size past `u32::MAX` is written
    /// as `u32::MAX`, which no reader accepts.
    #[inline]
    fn write_size(&mut self, label: &'static [u8], x: usize) {
        self.write_u32(label, u32::try_from(x).unwrap_or(u32::MAX))
    }

    /// Writes a compressed point.
    #[inline]
    fn write_point(&mut self, label: &'static [u8], x: &CompressedRistretto) {
        self.write(label, x.as_bytes())
    }

    /// Writes a scalar in canonical form.
    #[inline]
    fn write_scalar(&mut self, label: &'static [u8], x: &Scalar) {
        self.write(label, x.as_bytes())
    }

    /// Writes a length-prefixed byte string.
    #[inline]
    fn write_bytes(&mut self, label: &'static [u8], x: &[u8]) {
        self.write_size(label, x.len());
        self.write(label, x)
    }
}

impl Writer for Vec<u8> {
    #[inline]
    fn write(&mut self, _label: &'static [u8], src: &[u8]) {
        self.extend_from_slice(src);
    }

    #[inline]
    fn write_u8(&mut self, _label: &'static [u8], x: u8) {
        self.push(x);
    }
}

impl Writer for Transcript {
    #[inline]
    fn write(&mut self, label: &'static [u8], src: &[u8]) {
        self.append_message(label, src)
    }

    #[inline]
    fn write_u64(&mut self, label: &'static [u8], x: u64) {
        self.append_u64(label, x)
    }
}

/// Cursor over a byte slice.
#[derive(Debug)]
pub struct SliceReader<'a> {
    whole: &'a [u8],
    start: usize,
}

impl<'a> SliceReader<'a> {
    /// Wraps a slice for reading from the beginning.
    pub fn new(data: &'a [u8]) -> Self {
        SliceReader {
            whole: data,
            start: 0,
        }
    }

    /// Runs `parse_fn` over the whole of `data` and fails with
    /// `CodecError::TrailingBytes` if anything is left unread.
    pub fn parse<F, T, E>(data: &'a [u8], parse_fn: F) -> Result<T, E>
    where
        F: FnOnce(&mut Self) -> Result<T, E>,
        E: From<CodecError>,
    {
        let mut reader = Self::new(data);
        let result = parse_fn(&mut reader)?;
        if reader.remaining() != 0 {
            return Err(CodecError::TrailingBytes.into());
        }
        Ok(result)
    }

    /// Number of unread bytes.
    pub fn remaining(&self) -> usize {
        self.whole.len() - self.start
    }

    /// Returns the next `n` bytes and advances the cursor.
    pub fn read(&mut self, n: usize) -> Result<&'a [u8], CodecError> {
        if n > self.remaining() {
            return Err(CodecError::UnexpectedEnd);
        }
        let bytes = &self.whole[self.start..self.start + n];
        self.start += n;
        Ok(bytes)
    }

    pub fn read_u8(&mut self) -> Result<u8, CodecError> {
        Ok(self.read(1)?[0])
    }

    pub fn read_u32(&mut self) -> Result<u32, CodecError> {
        let mut buf = [0u8; 4];
        buf.copy_from_slice(self.read(4)?);
        Ok(u32::from_le_bytes(buf))
    }

    pub fn read_u64(&mut self) -> Result<u64, CodecError> {
        let mut buf = [0u8; 8];
        buf.copy_from_slice(self.read(8)?);
        Ok(u64::from_le_bytes(buf))
    }

    pub fn read_size(&mut self) -> Result<usize, CodecError> {
        Ok(self.read_u32()? as usize)
    }

    pub fn read_u8x32(&mut self) -> Result<[u8; 32], CodecError> {
        let mut buf = [0u8; 32];
        buf.copy_from_slice(self.read(32)?);
        Ok(buf)
    }

    /// Reads a length-prefixed byte string.
    pub fn read_bytes(&mut self) -> Result<&'a [u8], CodecError> {
        let n = self.read_size()?;
        self.read(n)
    }

    /// Reads a compressed point and checks that it decompresses.
    pub fn read_point(&mut self) -> Result<CompressedRistretto, CodecError> {
        let point = CompressedRistretto(self.read_u8x32()?);
        point.decompress().ok_or(CodecError::InvalidPoint)?;
        Ok(point)
    }

    /// Reads a compressed point without checking it.
    pub fn read_compressed(&mut self) -> Result<CompressedRistretto, CodecError> {
        Ok(CompressedRistretto(self.read_u8x32()?))
    }

    pub fn read_scalar(&mut self) -> Result<Scalar, CodecError> {
        Scalar::from_canonical_bytes(self.read_u8x32()?).ok_or(CodecError::InvalidScalar)
    }
}

/// A type with a canonical binary encoding.
pub trait Encodable {
    /// Appends the encoding of the receiver to the writer.
    fn encode(&self, w: &mut impl Writer);

    /// Encodes the receiver into a newly allocated vector of bytes.
    fn encode_to_vec(&self) -> Vec<u8> {
        let mut buf = Vec::new();
        self.encode(&mut buf);
        buf
    }
}

/// A type decodable from its canonical binary encoding.
pub trait Decodable: Sized {
    /// Decodes the receiver from the reader, leaving any bytes after it unread.
    fn decode(r: &mut SliceReader) -> Result<Self, CodecError>;

    /// Decodes the receiver from a slice that must contain nothing else.
    fn decode_exact(data: &[u8]) -> Result<Self, CodecError> {
        SliceReader::parse(data, |r| Self::decode(r))
    }
}
