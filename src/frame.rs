//! Extended CSAFE frame codec: byte stuffing, delimiters, XOR checksum.
//!
//! Outbound frames carry `[dst, src, commands.., checksum]` between an
//! extended start flag and a stop flag, with every interior byte in the
//! `0xF0..=0xF3` range escaped. Inbound report payloads are scanned for
//! delimiter pairs; anything outside a pair is padding.

use thiserror::Error;
use tracing::warn;

use crate::protocol::{addr, checksum, flag};
use crate::types::ResponseStatus;

/// Smallest meaningful interior: destination, source, status, checksum.
const MIN_INTERIOR: usize = 4;

/// Why a frame candidate was discarded.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum FrameError {
    #[error("stuffing escape at end of interior")]
    TruncatedEscape,

    #[error("invalid stuffing escape value 0x{0:02x}")]
    InvalidEscape(u8),

    #[error("frame interior too short: {0} bytes")]
    ShortFrame(usize),

    #[error("checksum mismatch: frame carries 0x{carried:02x}, computed 0x{computed:02x}")]
    ChecksumMismatch { carried: u8, computed: u8 },
}

/// Escape every flag-range byte as `0xF3` followed by its low two bits.
pub fn stuff(input: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(input.len());
    for &b in input {
        if (flag::EXT_START..=flag::STUFF).contains(&b) {
            out.push(flag::STUFF);
            out.push(b & 0x03);
        } else {
            out.push(b);
        }
    }
    out
}

/// Reverse [`stuff`]. Fails on a dangling escape or an escape value
/// outside `0..=3`.
pub fn unstuff(input: &[u8]) -> Result<Vec<u8>, FrameError> {
    let mut out = Vec::with_capacity(input.len());
    let mut bytes = input.iter();
    while let Some(&b) = bytes.next() {
        if b != flag::STUFF {
            out.push(b);
            continue;
        }
        match bytes.next() {
            Some(&v) if v <= 0x03 => out.push(flag::EXT_START | v),
            Some(&v) => return Err(FrameError::InvalidEscape(v)),
            None => return Err(FrameError::TruncatedEscape),
        }
    }
    Ok(out)
}

/// Build the wire form of an outbound extended frame around marshalled
/// command bytes. The checksum covers the command bytes only and is itself
/// subject to stuffing.
pub fn build(payload: &[u8]) -> Vec<u8> {
    let mut interior = Vec::with_capacity(payload.len() + 3);
    interior.push(addr::DEFAULT_SECONDARY);
    interior.push(addr::PC_HOST_PRIMARY);
    interior.extend_from_slice(payload);
    interior.push(checksum(payload));

    let mut wire = Vec::with_capacity(interior.len() + 2);
    wire.push(flag::EXT_START);
    wire.extend(stuff(&interior));
    wire.push(flag::STOP);
    wire
}

/// One validated inbound frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResponseFrame {
    pub destination: u8,
    pub source: u8,
    pub status: ResponseStatus,
    /// Concatenated `(opcode, len, data)` response triples.
    pub body: Vec<u8>,
}

/// Scan a report payload for extended frames.
///
/// A report may carry several frames; invalid candidates are logged and
/// skipped without affecting their neighbours. A second start flag before a
/// stop restarts the frame at the later position.
pub fn extract(data: &[u8]) -> Vec<ResponseFrame> {
    let mut frames = Vec::new();
    let mut start = None;
    for (i, &b) in data.iter().enumerate() {
        match b {
            flag::EXT_START => start = Some(i),
            flag::STOP => {
                if let Some(s) = start.take() {
                    match decode_interior(&data[s + 1..i]) {
                        Ok(frame) => frames.push(frame),
                        Err(e) => warn!("dropping frame candidate: {e}"),
                    }
                }
            }
            _ => {}
        }
    }
    frames
}

/// Unstuff and validate one interior. The checksum covers the status byte
/// and the response triples; the two address bytes are excluded.
fn decode_interior(stuffed: &[u8]) -> Result<ResponseFrame, FrameError> {
    let interior = unstuff(stuffed)?;
    if interior.len() < MIN_INTERIOR {
        return Err(FrameError::ShortFrame(interior.len()));
    }

    let carried = interior[interior.len() - 1];
    let computed = checksum(&interior[2..interior.len() - 1]);
    if carried != computed {
        return Err(FrameError::ChecksumMismatch { carried, computed });
    }

    Ok(ResponseFrame {
        destination: interior[0],
        source: interior[1],
        status: ResponseStatus::from_byte(interior[2]),
        body: interior[3..interior.len() - 1].to_vec(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{FrameStatus, MachineState};

    #[test]
    fn stuffing_is_identity_below_flag_range() {
        let input: Vec<u8> = (0x00..0xF0).collect();
        assert_eq!(stuff(&input), input);
        assert_eq!(unstuff(&input).unwrap(), input);
    }

    #[test]
    fn stuffing_round_trips_every_byte() {
        let input: Vec<u8> = (0x00..=0xFF).collect();
        let stuffed = stuff(&input);
        // No delimiter may survive in the stuffed interior.
        let mut rest = stuffed.as_slice();
        while let Some((&b, tail)) = rest.split_first() {
            assert!(b < 0xF0 || b == flag::STUFF);
            rest = if b == flag::STUFF {
                assert!(tail[0] <= 0x03);
                &tail[1..]
            } else {
                tail
            };
        }
        assert_eq!(unstuff(&stuffed).unwrap(), input);
    }

    #[test]
    fn stuffing_escapes_each_flag() {
        assert_eq!(stuff(&[0xF0]), vec![0xF3, 0x00]);
        assert_eq!(stuff(&[0xF1]), vec![0xF3, 0x01]);
        assert_eq!(stuff(&[0xF2]), vec![0xF3, 0x02]);
        assert_eq!(stuff(&[0xF3]), vec![0xF3, 0x03]);
    }

    #[test]
    fn unstuff_rejects_bad_escapes() {
        assert_eq!(unstuff(&[0xF3]), Err(FrameError::TruncatedEscape));
        assert_eq!(unstuff(&[0xF3, 0x30]), Err(FrameError::InvalidEscape(0x30)));
    }

    #[test]
    fn build_wraps_payload_with_addresses_and_checksum() {
        // GETID as the sole command: checksum equals the opcode itself.
        assert_eq!(build(&[0x92]), vec![0xF0, 0xFD, 0x00, 0x92, 0x92, 0xF2]);
    }

    #[test]
    fn build_stuffs_the_checksum() {
        // Payload chosen so the checksum lands in the flag range.
        let payload = [0xB4, 0x47, 0x03];
        assert_eq!(checksum(&payload), 0xF0);
        let wire = build(&payload);
        assert_eq!(
            wire,
            vec![0xF0, 0xFD, 0x00, 0xB4, 0x47, 0x03, 0xF3, 0x00, 0xF2]
        );
    }

    fn respond(status: u8, body: &[u8]) -> Vec<u8> {
        let mut interior = vec![addr::PC_HOST_PRIMARY, addr::DEFAULT_SECONDARY, status];
        interior.extend_from_slice(body);
        interior.push(checksum(&interior[2..]));
        let mut wire = vec![flag::EXT_START];
        wire.extend(stuff(&interior));
        wire.push(flag::STOP);
        wire
    }

    #[test]
    fn extract_reads_one_frame_amid_padding() {
        let mut data = vec![0x00, 0x00];
        data.extend(respond(0x01, &[0x92, 0x01, 0x30]));
        data.extend([0x00; 8]);

        let frames = extract(&data);
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].status.machine_state, MachineState::Ready);
        assert_eq!(frames[0].status.prev_frame, FrameStatus::Ok);
        assert_eq!(frames[0].body, vec![0x92, 0x01, 0x30]);
    }

    #[test]
    fn extract_reads_multiple_frames() {
        let mut data = respond(0x01, &[0x92, 0x00]);
        data.extend(respond(0x81, &[0xB4, 0x00]));
        let frames = extract(&data);
        assert_eq!(frames.len(), 2);
        assert!(!frames[0].status.frame_toggle);
        assert!(frames[1].status.frame_toggle);
    }

    #[test]
    fn extract_drops_checksum_mismatch() {
        let mut data = respond(0x01, &[0x92, 0x01, 0x30]);
        let last = data.len() - 2;
        data[last] ^= 0xFF;
        assert!(extract(&data).is_empty());
    }

    #[test]
    fn extract_drops_short_interior() {
        assert!(extract(&[flag::EXT_START, 0x00, 0xFD, flag::STOP]).is_empty());
    }

    #[test]
    fn extract_ignores_stop_without_start() {
        assert!(extract(&[0x00, flag::STOP, 0x01]).is_empty());
    }

    #[test]
    fn later_start_flag_wins() {
        // A stray start flag followed by a real frame: the second start
        // resets the candidate, so the real frame still decodes.
        let mut data = vec![flag::EXT_START, 0x55];
        data.extend(respond(0x01, &[0x92, 0x00]));
        let frames = extract(&data);
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].body, vec![0x92, 0x00]);
    }
}
