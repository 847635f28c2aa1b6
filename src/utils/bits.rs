use crate::error::{Result, TsMergeError};

/// A bit-level reader for parsing binary data streams.
///
/// Implements the bit reading operations needed for H.264 parameter set
/// parsing: single bits, fixed-width fields, and exponential Golomb codes
/// (ue(v) / se(v)).
///
/// Example:
/// ```
/// use tsmerge::utils::BitReader;
///
/// let data = [0b10110011];
/// let mut reader = BitReader::new(&data);
///
/// assert_eq!(reader.read_bit().unwrap(), true);
/// assert_eq!(reader.read_bits(3).unwrap(), 0b011);
/// ```
pub struct BitReader<'a> {
    data: &'a [u8],
    byte_offset: usize,
    bit_offset: u8,
}

impl<'a> BitReader<'a> {
    /// Creates a new BitReader from a byte slice
    pub fn new(data: &'a [u8]) -> Self {
        BitReader {
            data,
            byte_offset: 0,
            bit_offset: 0,
        }
    }

    /// Reads a single bit from the stream.
    /// Returns true for 1, false for 0.
    pub fn read_bit(&mut self) -> Result<bool> {
        if self.byte_offset >= self.data.len() {
            return Err(TsMergeError::InvalidData("reached end of data".into()));
        }

        let bit = (self.data[self.byte_offset] >> (7 - self.bit_offset)) & 1;
        self.bit_offset += 1;

        if self.bit_offset == 8 {
            self.bit_offset = 0;
            self.byte_offset += 1;
        }

        Ok(bit == 1)
    }

    /// Reads n bits and returns them as a big-endian number.
    ///
    /// Returns error if n > 32 or end of data is reached.
    pub fn read_bits(&mut self, n: u32) -> Result<u32> {
        if n > 32 {
            return Err(TsMergeError::InvalidData("too many bits requested".into()));
        }

        let mut value = 0u32;
        let n = n as usize;

        for i in 0..n {
            let bit = self.read_bit()?;
            if bit {
                value |= 1 << (n - 1 - i);
            }
        }

        Ok(value)
    }

    /// Reads an unsigned exponential Golomb code (ue(v)).
    ///
    /// M leading zeros followed by a 1, then M INFO bits;
    /// value = 2^M + INFO - 1.
    pub fn read_golomb(&mut self) -> Result<u32> {
        let mut leading_zeros = 0;
        while !self.read_bit()? {
            leading_zeros += 1;
            if leading_zeros > 31 {
                return Err(TsMergeError::InvalidData("invalid Golomb code".into()));
            }
        }

        if leading_zeros == 0 {
            return Ok(0);
        }

        let info = self.read_bits(leading_zeros)?;
        Ok((1u32 << leading_zeros) + info - 1)
    }

    /// Reads a signed exponential Golomb code (se(v)).
    ///
    /// k=0 -> 0; otherwise magnitude = (k+1)>>1 with sign from parity
    /// (odd k positive, even k negative).
    pub fn read_signed_golomb(&mut self) -> Result<i32> {
        let k = self.read_golomb()?;
        if k == 0 {
            return Ok(0);
        }

        let magnitude = ((k + 1) >> 1) as i32;
        let sign = if k & 1 == 1 { 1 } else { -1 };
        Ok(sign * magnitude)
    }

    /// Skips n bits in the stream.
    pub fn skip_bits(&mut self, n: u32) -> Result<()> {
        let n = n as usize;
        for _ in 0..n {
            self.read_bit()?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_read_bits() {
        let data = [0b10110011];
        let mut reader = BitReader::new(&data);
        assert_eq!(reader.read_bits(3).unwrap(), 0b101);
        assert_eq!(reader.read_bits(5).unwrap(), 0b10011);

        // Cross-byte boundary
        let data = [0b10110011, 0b01011010];
        let mut reader = BitReader::new(&data);
        assert_eq!(reader.read_bits(3).unwrap(), 0b101);
        assert_eq!(reader.read_bits(8).unwrap(), 0b10011010);

        // Error on too many bits
        let data = [0xFF];
        let mut reader = BitReader::new(&data);
        assert!(reader.read_bits(33).is_err());

        // Error past end of data
        let data = [0xFF];
        let mut reader = BitReader::new(&data);
        reader.read_bits(8).unwrap();
        assert!(reader.read_bit().is_err());
    }

    #[test]
    fn test_read_golomb() {
        // "1" -> 0
        let data = [0b10000000];
        let mut reader = BitReader::new(&data);
        assert_eq!(reader.read_golomb().unwrap(), 0);

        // "010" -> 1, "011" -> 2 packed as 010 011 xx
        let data = [0b01001100];
        let mut reader = BitReader::new(&data);
        assert_eq!(reader.read_golomb().unwrap(), 1);
        assert_eq!(reader.read_golomb().unwrap(), 2);

        // "00110" -> 5
        let data = [0b00110000];
        let mut reader = BitReader::new(&data);
        assert_eq!(reader.read_golomb().unwrap(), 5);
    }

    #[test]
    fn test_read_signed_golomb() {
        // k=1 -> +1, k=2 -> -1
        let data = [0b01001100];
        let mut reader = BitReader::new(&data);
        assert_eq!(reader.read_signed_golomb().unwrap(), 1);
        assert_eq!(reader.read_signed_golomb().unwrap(), -1);
    }
}
