//! Read-only bit view over a byte payload
//!
//! Bits are addressed MSB-first: bit 0 is the high bit of byte 0, bit 8 the
//! high bit of byte 1, and so on. Used for supported-PID bitmasks and
//! status bytes.

use crate::error::ObdError;

/// Bit-addressable view of a byte slice
#[derive(Debug, Clone, Copy)]
pub struct BitArray<'a> {
    bytes: &'a [u8],
}

impl<'a> BitArray<'a> {
    pub fn new(bytes: &'a [u8]) -> Self {
        Self { bytes }
    }

    /// Number of addressable bits
    pub fn len(&self) -> usize {
        self.bytes.len() * 8
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Read the bit at an absolute position
    pub fn get(&self, index: usize) -> Result<bool, ObdError> {
        let byte = self.bytes.get(index / 8).ok_or(ObdError::IndexOutOfRange {
            index,
            len: self.len(),
        })?;
        Ok(byte & (0x80 >> (index % 8)) != 0)
    }

    /// Unsigned value of bits `start..stop`, MSB first
    pub fn value(&self, start: usize, stop: usize) -> Result<u64, ObdError> {
        if stop > self.len() || stop - start.min(stop) > 64 {
            return Err(ObdError::IndexOutOfRange {
                index: stop,
                len: self.len(),
            });
        }
        (start..stop).try_fold(0u64, |acc, i| Ok((acc << 1) | u64::from(self.get(i)?)))
    }

    /// Count of set bits
    pub fn count_ones(&self) -> usize {
        self.bytes.iter().map(|b| b.count_ones() as usize).sum()
    }

    /// Positions of set bits within `start..stop`
    pub fn set_positions(&self, start: usize, stop: usize) -> Vec<usize> {
        (start..stop.min(self.len()))
            .filter(|i| self.get(*i).unwrap_or(false))
            .collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = bool> + '_ {
        (0..self.len()).map(move |i| self.bytes[i / 8] & (0x80 >> (i % 8)) != 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_msb_first_addressing() {
        let bits = BitArray::new(&[0x80, 0x01]);
        assert!(bits.get(0).unwrap());
        assert!(!bits.get(1).unwrap());
        assert!(bits.get(15).unwrap());
        assert_eq!(bits.len(), 16);
    }

    #[test]
    fn test_out_of_range() {
        let bits = BitArray::new(&[0xFF]);
        assert!(matches!(
            bits.get(8),
            Err(ObdError::IndexOutOfRange { index: 8, len: 8 })
        ));
        assert!(bits.value(4, 12).is_err());
    }

    #[test]
    fn test_value_and_counts() {
        let bits = BitArray::new(&[0b1000_0011, 0xF0]);
        assert_eq!(bits.value(1, 8).unwrap(), 3);
        assert_eq!(bits.count_ones(), 7);
        assert_eq!(bits.set_positions(0, 8), vec![0, 6, 7]);
        assert_eq!(bits.iter().filter(|b| *b).count(), 7);
    }
}
