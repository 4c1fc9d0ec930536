//! SAE J1850 and ISO 9141-2 / ISO 14230-4 frame parsing
//!
//! Each line is `[priority, target, source, data.., checksum]`.

use super::frame::{EcuAddress, Frame, FrameKind, Message};
use super::FrameParser;
use crate::bytes::hex_to_bytes;
use crate::error::ObdError;
use crc::{Crc, CRC_8_SAE_J1850};

const J1850_CRC: Crc<u8> = Crc::<u8>::new(&CRC_8_SAE_J1850);

const HEADER_LEN: usize = 3;
const MIN_FRAME_LEN: usize = 5;
const MAX_FRAME_LEN: usize = 11;
const DTC_RESPONSE: u8 = 0x43;

/// Trailing integrity byte used by the bus
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Checksum {
    /// CRC-8/SAE-J1850 (PWM and VPW)
    J1850Crc,
    /// 8-bit additive sum (ISO 9141-2, ISO 14230-4)
    Sum8,
}

impl Checksum {
    pub fn compute(&self, bytes: &[u8]) -> u8 {
        match self {
            Checksum::J1850Crc => J1850_CRC.checksum(bytes),
            Checksum::Sum8 => bytes.iter().fold(0u8, |acc, b| acc.wrapping_add(*b)),
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct LegacyParser {
    checksum: Checksum,
}

impl LegacyParser {
    pub fn new(checksum: Checksum) -> Self {
        Self { checksum }
    }
}

impl FrameParser for LegacyParser {
    fn parse_frame(&self, line: &str) -> Result<Frame, ObdError> {
        let raw = hex_to_bytes(line)?;
        if !(MIN_FRAME_LEN..=MAX_FRAME_LEN).contains(&raw.len()) {
            return Err(ObdError::malformed(format!(
                "legacy frame of {} bytes: {line}",
                raw.len()
            )));
        }
        let (body, checksum) = raw.split_at(raw.len() - 1);
        let expected = self.checksum.compute(body);
        if checksum[0] != expected {
            return Err(ObdError::malformed(format!(
                "checksum {:02X} != {expected:02X}: {line}",
                checksum[0]
            )));
        }
        Ok(Frame {
            data: body[HEADER_LEN..].to_vec(),
            priority: raw[0],
            target: raw[1],
            source: EcuAddress(u32::from(raw[2])),
            kind: FrameKind::Legacy,
            raw,
        })
    }

    fn assemble(&self, source: EcuAddress, mut frames: Vec<Frame>) -> Result<Message, ObdError> {
        let Some(mode) = frames.first().and_then(|f| f.data.first().copied()) else {
            return Err(ObdError::malformed(format!("empty frame from {source}")));
        };
        if frames.iter().any(|f| f.data.first() != Some(&mode)) {
            return Err(ObdError::malformed(format!(
                "frames from {source} disagree on the response mode"
            )));
        }

        let data = if frames.len() == 1 {
            frames[0].data.clone()
        } else if mode == DTC_RESPONSE {
            let mut data = vec![DTC_RESPONSE];
            for frame in &frames {
                data.extend_from_slice(&frame.data[1..]);
            }
            data
        } else {
            if frames.iter().any(|f| f.data.len() < 3) {
                return Err(ObdError::malformed(format!(
                    "multi-line reply from {source} without order bytes"
                )));
            }
            frames.sort_by_key(|f| f.data[2]);
            let contiguous = frames
                .iter()
                .enumerate()
                .all(|(i, f)| usize::from(f.data[2]) == i + 1);
            if !contiguous {
                return Err(ObdError::malformed(format!(
                    "non-contiguous order bytes from {source}"
                )));
            }
            let mut data = frames[0].data[..2].to_vec();
            for frame in &frames {
                data.extend_from_slice(&frame.data[3..]);
            }
            data
        };

        Ok(Message {
            source,
            data,
            frames,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_checksums() {
        assert_eq!(Checksum::J1850Crc.compute(b"123456789"), 0x4B);
        assert_eq!(Checksum::Sum8.compute(&[0x48, 0x6B, 0x10, 0x41, 0x0D, 0x3C]), 0x4D);
    }

    #[test]
    fn test_parse_valid_frame() {
        let parser = LegacyParser::new(Checksum::J1850Crc);
        let frame = parser.parse_frame("48 6B 10 41 0D 3C 1C").unwrap();
        assert_eq!(frame.source, EcuAddress(0x10));
        assert_eq!(frame.target, 0x6B);
        assert_eq!(frame.data, vec![0x41, 0x0D, 0x3C]);
    }

    #[test]
    fn test_corrupted_checksum_dropped() {
        let parser = LegacyParser::new(Checksum::Sum8);
        assert!(parser.parse_frame("48 6B 10 41 0D 3C 4D").is_ok());
        assert!(matches!(
            parser.parse_frame("48 6B 10 41 0D 3C 4E"),
            Err(ObdError::MalformedData(_))
        ));
    }

    #[test]
    fn test_length_bounds() {
        let parser = LegacyParser::new(Checksum::Sum8);
        assert!(parser.parse_frame("48 6B 10 07").is_err());
        assert!(parser.parse_frame("48 6B 10 44 07").is_ok());
        assert!(parser
            .parse_frame("48 6B 10 49 02 01 00 00 00 31 00 00")
            .is_err());
    }

    #[test]
    fn test_dtc_frames_concatenate() {
        let parser = LegacyParser::new(Checksum::J1850Crc);
        let frames = vec![
            parser.parse_frame("48 6B 10 43 01 33 02 34 03 00 BA").unwrap(),
            parser.parse_frame("48 6B 10 43 04 20 00 00 00 00 74").unwrap(),
        ];
        let msg = parser.assemble(EcuAddress(0x10), frames).unwrap();
        assert_eq!(
            msg.data,
            vec![0x43, 0x01, 0x33, 0x02, 0x34, 0x03, 0x00, 0x04, 0x20, 0x00, 0x00, 0x00, 0x00]
        );
    }

    #[test]
    fn test_ordered_frames_sorted_and_order_byte_removed() {
        let parser = LegacyParser::new(Checksum::J1850Crc);
        let lines = [
            "48 6B 10 49 02 03 30 30 52 35 48",
            "48 6B 10 49 02 01 00 00 00 31 69",
            "48 6B 10 49 02 05 33 34 35 36 D4",
            "48 6B 10 49 02 02 44 34 47 50 B9",
            "48 6B 10 49 02 04 35 42 31 32 C3",
        ];
        let frames = lines.iter().map(|l| parser.parse_frame(l).unwrap()).collect();
        let msg = parser.assemble(EcuAddress(0x10), frames).unwrap();
        assert_eq!(&msg.data[..2], &[0x49, 0x02]);
        assert_eq!(&msg.data[2..5], &[0x00, 0x00, 0x00]);
        assert_eq!(&msg.data[5..], b"1D4GP00R55B123456");
    }

    #[test]
    fn test_gap_in_order_bytes_rejected() {
        let parser = LegacyParser::new(Checksum::J1850Crc);
        let frames = vec![
            parser.parse_frame("48 6B 10 49 02 01 00 00 00 31 69").unwrap(),
            parser.parse_frame("48 6B 10 49 02 03 30 30 52 35 48").unwrap(),
        ];
        assert!(parser.assemble(EcuAddress(0x10), frames).is_err());
    }
}
