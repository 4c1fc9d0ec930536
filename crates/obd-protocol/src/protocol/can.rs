//! ISO 15765-4 (CAN) frame parsing and ISO-TP reassembly

use super::frame::{EcuAddress, Frame, FrameKind, Message};
use super::FrameParser;
use crate::bytes::hex_to_bytes;
use crate::error::ObdError;
use std::collections::{BTreeMap, VecDeque};
use tracing::debug;

/// Header bytes after 11-bit ids are left-padded
const HEADER_LEN: usize = 4;
const MIN_FRAME_LEN: usize = 6;
const MAX_FRAME_LEN: usize = 12;
const TESTER_ADDRESS: u8 = 0xF1;

/// Parser for 11-bit or 29-bit CAN ids
#[derive(Debug, Clone, Copy)]
pub struct CanParser {
    id_bits: u8,
}

impl CanParser {
    pub fn new(id_bits: u8) -> Self {
        Self { id_bits }
    }
}

impl FrameParser for CanParser {
    fn parse_frame(&self, line: &str) -> Result<Frame, ObdError> {
        let mut compact: String = line.chars().filter(|c| !c.is_whitespace()).collect();
        if self.id_bits == 11 {
            compact.insert_str(0, "00000");
        }
        let raw = hex_to_bytes(&compact)?;
        if !(MIN_FRAME_LEN..=MAX_FRAME_LEN).contains(&raw.len()) {
            return Err(ObdError::malformed(format!(
                "CAN frame of {} bytes: {line}",
                raw.len()
            )));
        }

        let (priority, target, source) = if self.id_bits == 11 {
            let id = (u32::from(raw[2]) << 8) | u32::from(raw[3]);
            (raw[2] & 0x0F, TESTER_ADDRESS, EcuAddress(id))
        } else {
            (raw[0], raw[2], EcuAddress(u32::from(raw[3])))
        };

        let body = &raw[HEADER_LEN..];
        let pci = body[0];
        let (kind, data) = match pci >> 4 {
            0x0 => {
                let len = usize::from(pci & 0x0F);
                if len == 0 || len > body.len() - 1 {
                    return Err(ObdError::malformed(format!(
                        "single frame declares {len} bytes: {line}"
                    )));
                }
                (FrameKind::Single, body[1..=len].to_vec())
            }
            0x1 => {
                if body.len() < 2 {
                    return Err(ObdError::malformed(format!("truncated first frame: {line}")));
                }
                let total_len = (usize::from(pci & 0x0F) << 8) | usize::from(body[1]);
                if total_len == 0 {
                    return Err(ObdError::malformed(format!(
                        "first frame declares zero length: {line}"
                    )));
                }
                (FrameKind::First { total_len }, body[2..].to_vec())
            }
            0x2 => (
                FrameKind::Consecutive { index: pci & 0x0F },
                body[1..].to_vec(),
            ),
            other => {
                return Err(ObdError::malformed(format!(
                    "unsupported PCI type {other:X}: {line}"
                )))
            }
        };

        Ok(Frame {
            raw,
            data,
            source,
            target,
            priority,
            kind,
        })
    }

    fn assemble(&self, source: EcuAddress, frames: Vec<Frame>) -> Result<Message, ObdError> {
        let data = if let [frame] = frames.as_slice() {
            match frame.kind {
                FrameKind::Single => frame.data.clone(),
                _ => {
                    return Err(ObdError::malformed(format!(
                        "lone {:?} frame from {source}",
                        frame.kind
                    )))
                }
            }
        } else {
            reassemble(source, &frames)?
        };
        Ok(Message {
            source,
            data,
            frames,
        })
    }
}

/// Join a first frame with its consecutive frames by sequence index
fn reassemble(source: EcuAddress, frames: &[Frame]) -> Result<Vec<u8>, ObdError> {
    let mut first = None;
    let mut by_index: BTreeMap<u8, VecDeque<&Frame>> = BTreeMap::new();
    for frame in frames {
        match frame.kind {
            FrameKind::First { total_len } if first.is_none() => first = Some((frame, total_len)),
            FrameKind::Consecutive { index } => by_index.entry(index).or_default().push_back(frame),
            kind => {
                return Err(ObdError::malformed(format!(
                    "unexpected {kind:?} frame in multi-frame reply from {source}"
                )))
            }
        }
    }
    let Some((first, total_len)) = first else {
        return Err(ObdError::malformed(format!(
            "multi-frame reply from {source} has no first frame"
        )));
    };

    let mut data = first.data.clone();
    let mut position = 0usize;
    while data.len() < total_len {
        let index = ((position + 1) % 16) as u8;
        let next = by_index.get_mut(&index).and_then(VecDeque::pop_front);
        let Some(frame) = next else {
            return Err(ObdError::malformed(format!(
                "missing consecutive frame {index} from {source} ({} of {total_len} bytes)",
                data.len()
            )));
        };
        data.extend_from_slice(&frame.data);
        position += 1;
    }

    let leftover: usize = by_index.values().map(VecDeque::len).sum();
    if leftover > 0 {
        debug!("Ignoring {} surplus consecutive frame(s) from {}", leftover, source);
    }
    data.truncate(total_len);
    Ok(data)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse_all(parser: &CanParser, lines: &[&str]) -> Vec<Frame> {
        lines.iter().map(|l| parser.parse_frame(l).unwrap()).collect()
    }

    const VIN_LINES: [&str; 4] = [
        "7E8 10 14 49 02 01 31 44 34",
        "7E8 21 47 50 30 30 52 35 35",
        "7E8 22 42 31 32 33 34 35 36",
        "7E8 23 00 00 00 00 00 00 00",
    ];

    #[test]
    fn test_single_frame_11bit() {
        let parser = CanParser::new(11);
        let frame = parser.parse_frame("7E8 03 41 0D 3C").unwrap();
        assert_eq!(frame.source, EcuAddress(0x7E8));
        assert_eq!(frame.priority, 0x07);
        assert_eq!(frame.kind, FrameKind::Single);
        assert_eq!(frame.data, vec![0x41, 0x0D, 0x3C]);

        let msg = parser.assemble(frame.source, vec![frame]).unwrap();
        assert_eq!(msg.data, vec![0x41, 0x0D, 0x3C]);
    }

    #[test]
    fn test_single_frame_29bit() {
        let parser = CanParser::new(29);
        let frame = parser.parse_frame("18 DA F1 10 03 41 0D 3C").unwrap();
        assert_eq!(frame.source, EcuAddress(0x10));
        assert_eq!(frame.target, 0xF1);
        assert_eq!(frame.priority, 0x18);
    }

    #[test]
    fn test_rejects_bad_frames() {
        let parser = CanParser::new(11);
        assert!(parser.parse_frame("7E8 00 41 0D").is_err());
        assert!(parser.parse_frame("7E8 07 41 0D").is_err());
        assert!(parser.parse_frame("7E8 30 00 00").is_err());
        assert!(parser.parse_frame("7E8 03").is_err());
        assert!(parser.parse_frame("7E8 10 00 49 02 01 31 44 34").is_err());
    }

    #[test]
    fn test_multi_frame_in_order() {
        let parser = CanParser::new(11);
        let frames = parse_all(&parser, &VIN_LINES);
        let msg = parser.assemble(EcuAddress(0x7E8), frames).unwrap();
        assert_eq!(msg.data.len(), 20);
        assert_eq!(&msg.data[..3], &[0x49, 0x02, 0x01]);
        assert_eq!(&msg.data[3..], b"1D4GP00R55B123456");
    }

    #[test]
    fn test_multi_frame_out_of_order() {
        let parser = CanParser::new(11);
        let lines = [VIN_LINES[0], VIN_LINES[2], VIN_LINES[1], VIN_LINES[3]];
        let frames = parse_all(&parser, &lines);
        let msg = parser.assemble(EcuAddress(0x7E8), frames).unwrap();
        assert_eq!(&msg.data[3..], b"1D4GP00R55B123456");
    }

    #[test]
    fn test_multi_frame_missing_index() {
        let parser = CanParser::new(11);
        let lines = [VIN_LINES[0], VIN_LINES[1], VIN_LINES[3]];
        let frames = parse_all(&parser, &lines);
        assert!(matches!(
            parser.assemble(EcuAddress(0x7E8), frames),
            Err(ObdError::MalformedData(_))
        ));
    }

    #[test]
    fn test_lone_first_frame_rejected() {
        let parser = CanParser::new(11);
        let frames = parse_all(&parser, &VIN_LINES[..1]);
        assert!(parser.assemble(EcuAddress(0x7E8), frames).is_err());
    }

    #[test]
    fn test_sequence_wraps_after_fifteen() {
        let parser = CanParser::new(11);
        // 6 + 16 * 7 = 118 bytes, indices 1..F then 0
        let mut lines = vec!["7E8 10 76 49 06 01 02 03 04".to_string()];
        for p in 0..16u8 {
            let index = (p + 1) % 16;
            lines.push(format!("7E8 2{index:X} {0:02X} {0:02X} {0:02X} {0:02X} {0:02X} {0:02X} {0:02X}", p));
        }
        let frames: Vec<Frame> = lines.iter().map(|l| parser.parse_frame(l).unwrap()).collect();
        let msg = parser.assemble(EcuAddress(0x7E8), frames).unwrap();
        assert_eq!(msg.data.len(), 0x76);
        assert_eq!(msg.data[6], 0x00);
        assert_eq!(msg.data[0x75], 0x0F);
    }
}
