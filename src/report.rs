//! HID report adapter for the monitor's three report sizes.

use tracing::warn;

/// Report id used for every outbound frame.
///
/// The monitor exposes three output sizes, but only the 0x02 report is
/// reliably acknowledged: the short 0x01 report draws responses with
/// mismatched checksums on long replies, and the 0x04 report sometimes goes
/// unanswered.
pub const OUTPUT_REPORT_ID: u8 = 0x02;

/// Payload bytes carried by an outbound 0x02 report (121 on the wire with
/// the id byte).
pub const OUTPUT_PAYLOAD_LEN: usize = 120;

/// Known report ids with their wire lengths, id byte included.
const REPORT_LENGTHS: [(u8, usize); 3] = [(0x01, 21), (0x02, 121), (0x04, 501)];

/// Largest input report the monitor produces, id byte included.
pub const MAX_INPUT_LEN: usize = 501;

/// One HID report, id separated from payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Report {
    pub id: u8,
    pub data: Vec<u8>,
}

/// Wrap one framed message in a zero-padded 0x02 output report.
///
/// The monitor ignores bytes after the stop flag, so the padding is inert.
pub fn output_report(frame: &[u8]) -> Vec<u8> {
    debug_assert!(frame.len() <= OUTPUT_PAYLOAD_LEN);
    let mut buf = vec![0u8; OUTPUT_PAYLOAD_LEN + 1];
    buf[0] = OUTPUT_REPORT_ID;
    buf[1..1 + frame.len()].copy_from_slice(frame);
    buf
}

/// Validate an inbound report and trim its payload to the tabulated input
/// length. Unknown ids and short reads drop the whole report.
pub fn accept(report: &Report) -> Option<&[u8]> {
    let Some(&(_, wire_len)) = REPORT_LENGTHS.iter().find(|(id, _)| *id == report.id) else {
        warn!("dropping report with unknown id 0x{:02x}", report.id);
        return None;
    };
    let payload_len = wire_len - 1;
    if report.data.len() < payload_len {
        warn!(
            "dropping short report 0x{:02x}: {} of {} payload bytes",
            report.id,
            report.data.len(),
            payload_len
        );
        return None;
    }
    Some(&report.data[..payload_len])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn output_report_pads_to_fixed_size() {
        let report = output_report(&[0xF0, 0x92, 0xF2]);
        assert_eq!(report.len(), 121);
        assert_eq!(report[0], OUTPUT_REPORT_ID);
        assert_eq!(&report[1..4], &[0xF0, 0x92, 0xF2]);
        assert!(report[4..].iter().all(|&b| b == 0));
    }

    #[test]
    fn accept_trims_known_reports() {
        let report = Report {
            id: 0x01,
            data: vec![0xAA; 32],
        };
        assert_eq!(accept(&report), Some(&[0xAA; 20][..]));
    }

    #[test]
    fn accept_rejects_unknown_id() {
        let report = Report {
            id: 0x03,
            data: vec![0; 121],
        };
        assert_eq!(accept(&report), None);
    }

    #[test]
    fn accept_rejects_short_read() {
        let report = Report {
            id: 0x02,
            data: vec![0; 60],
        };
        assert_eq!(accept(&report), None);
    }
}
