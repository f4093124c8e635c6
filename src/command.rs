//! Command construction and typed response decoding.
//!
//! Outbound commands marshal to one of three shapes: a single opcode byte,
//! a long command (`opcode, len, data..`), or a long command wrapping
//! another command in the SETUSERCFG1 envelope for the monitor's
//! proprietary namespace. Inbound frames carry a sequence of
//! `(opcode, len, data)` response triples that decode into [`Event`]s.

use thiserror::Error;
use tracing::{debug, warn};

use crate::frame::ResponseFrame;
use crate::protocol::opcode;
use crate::types::{ResponseStatus, StrokeState, WorkoutState};

// ============================================================================
// Commands
// ============================================================================

/// One outbound CSAFE command in marshalled form.
///
/// Build values through the named constructors; [`Command::short`],
/// [`Command::long`] and [`Command::wrap`] are the escape hatch for opcodes
/// this crate has no constructor for yet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Command {
    bytes: Vec<u8>,
}

impl Command {
    /// A single-opcode short command.
    pub fn short(op: u8) -> Self {
        Self { bytes: vec![op] }
    }

    /// A long command: opcode, data-byte count, data.
    pub fn long(op: u8, data: &[u8]) -> Self {
        let mut bytes = Vec::with_capacity(data.len() + 2);
        bytes.push(op);
        bytes.push(data.len() as u8);
        bytes.extend_from_slice(data);
        Self { bytes }
    }

    /// Wrap a proprietary PM command in the SETUSERCFG1 envelope.
    pub fn wrap(inner: Command) -> Self {
        Self::long(opcode::SETUSERCFG1, &inner.bytes)
    }

    pub fn get_status() -> Self {
        Self::short(opcode::GETSTATUS)
    }

    /// Request the monitor's five-digit user id.
    pub fn get_id() -> Self {
        Self::short(opcode::GETID)
    }

    /// Request manufacturer, model and version numbers.
    pub fn get_version() -> Self {
        Self::short(opcode::GETVERSION)
    }

    /// Request the most recent stroke power.
    pub fn get_power() -> Self {
        Self::short(opcode::GETPOWER)
    }

    pub fn get_units() -> Self {
        Self::short(opcode::GETUNITS)
    }

    pub fn get_serial() -> Self {
        Self::short(opcode::GETSERIAL)
    }

    pub fn get_odometer() -> Self {
        Self::short(opcode::GETODOMETER)
    }

    pub fn get_error_code() -> Self {
        Self::short(opcode::GETERRORCODE)
    }

    /// Request the flywheel stroke state (proprietary, wrapped).
    pub fn get_stroke_state() -> Self {
        Self::wrap(Self::short(opcode::PM_GET_STROKESTATE))
    }

    /// Request the workout state (proprietary, wrapped).
    pub fn get_workout_state() -> Self {
        Self::wrap(Self::short(opcode::PM_GET_WORKOUTSTATE))
    }

    /// Request per-stroke statistics (proprietary, wrapped).
    pub fn get_stroke_stats() -> Self {
        Self::wrap(Self::long(opcode::PM_GET_STROKESTATS, &[0]))
    }

    // State-machine control. The monitor acknowledges these through the
    // frame status byte; they produce no response data.

    pub fn reset() -> Self {
        Self::short(opcode::RESET)
    }

    pub fn go_idle() -> Self {
        Self::short(opcode::GOIDLE)
    }

    pub fn go_have_id() -> Self {
        Self::short(opcode::GOHAVEID)
    }

    pub fn go_in_use() -> Self {
        Self::short(opcode::GOINUSE)
    }

    pub fn go_finished() -> Self {
        Self::short(opcode::GOFINISHED)
    }

    pub fn go_ready() -> Self {
        Self::short(opcode::GOREADY)
    }

    pub fn bad_id() -> Self {
        Self::short(opcode::BADID)
    }

    /// Marshalled wire bytes, pre-framing.
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.bytes
    }
}

// ============================================================================
// Typed responses
// ============================================================================

/// Five ASCII digits identifying the current user.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IdResponse {
    pub digits: [u8; 5],
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VersionResponse {
    pub manufacturer_id: u8,
    pub class_id: u8,
    pub model: u8,
    pub hardware_version: u16,
    pub firmware_version: u16,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PowerResponse {
    pub stroke_watts: u16,
    pub units_specifier: u8,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StrokeStateResponse {
    pub state: StrokeState,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WorkoutStateResponse {
    pub state: WorkoutState,
}

impl WorkoutStateResponse {
    /// Human-readable workout state.
    pub fn label(&self) -> &'static str {
        self.state.label()
    }
}

/// Per-stroke statistics. Force values are in the monitor's native units.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StrokeStatsResponse {
    pub stroke_distance: u16,
    pub stroke_drive_time: u8,
    pub stroke_recovery_time: u16,
    pub stroke_length: u8,
    pub drive_counter: u16,
    pub peak_drive_force: u16,
    pub impulse_drive_force: u16,
    pub average_drive_force: u16,
    pub work_per_stroke: u16,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UnitsResponse {
    pub units_type: u8,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SerialResponse {
    /// Nine-character serial number.
    pub serial: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OdometerResponse {
    pub distance: u32,
    pub units_specifier: u8,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ErrorCodeResponse {
    pub error_code: u32,
}

/// One decoded inbound event.
///
/// Every frame yields a `Status` first (from its status byte), then one
/// variant per embedded command response, in frame order.
#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    Status(ResponseStatus),
    Id(IdResponse),
    Version(VersionResponse),
    Power(PowerResponse),
    StrokeState(StrokeStateResponse),
    StrokeStats(StrokeStatsResponse),
    WorkoutState(WorkoutStateResponse),
    Units(UnitsResponse),
    Serial(SerialResponse),
    Odometer(OdometerResponse),
    ErrorCode(ErrorCodeResponse),
}

/// Why a response triple failed to decode.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum DecodeError {
    /// The triple sequence ended mid-header or mid-data.
    #[error("truncated response sequence at opcode 0x{op:02x}")]
    TruncatedSequence { op: u8 },

    #[error("{name} response too short: expected {expected} bytes, got {got}")]
    TooShort {
        name: &'static str,
        expected: usize,
        got: usize,
    },

    #[error("invalid {field} value 0x{value:02x}")]
    InvalidValue { field: &'static str, value: u8 },
}

// ============================================================================
// Response decoding
// ============================================================================

/// Decode every event carried by one inbound frame.
///
/// The frame's status byte is emitted first; embedded responses follow in
/// frame order. A malformed triple ends decoding for this frame; earlier
/// events are still returned, the failure is logged.
pub fn decode_frame(frame: &ResponseFrame) -> Vec<Event> {
    let mut events = vec![Event::Status(frame.status)];
    if let Err(e) = decode_responses(frame.status, &frame.body, &mut events) {
        warn!("response decoding aborted: {e}");
    }
    events
}

/// Walk a `(opcode, len, data)` triple sequence, unwrapping SETUSERCFG1
/// envelopes recursively.
fn decode_responses(
    status: ResponseStatus,
    body: &[u8],
    out: &mut Vec<Event>,
) -> Result<(), DecodeError> {
    let mut idx = 0;
    while idx < body.len() {
        let op = body[idx];
        let len = *body
            .get(idx + 1)
            .ok_or(DecodeError::TruncatedSequence { op })? as usize;
        let data = body
            .get(idx + 2..idx + 2 + len)
            .ok_or(DecodeError::TruncatedSequence { op })?;
        idx += 2 + len;

        if op == opcode::SETUSERCFG1 {
            // The wrapper's data is itself a response sequence.
            decode_responses(status, data, out)?;
            continue;
        }

        if let Some(event) = decode_response(status, op, data)? {
            out.push(event);
        }
    }
    Ok(())
}

fn decode_response(
    status: ResponseStatus,
    op: u8,
    data: &[u8],
) -> Result<Option<Event>, DecodeError> {
    let event = match op {
        opcode::GETSTATUS => Event::Status(status),

        opcode::RESET
        | opcode::GOIDLE
        | opcode::GOHAVEID
        | opcode::GOINUSE
        | opcode::GOFINISHED
        | opcode::GOREADY
        | opcode::BADID => {
            // State-control acknowledgement; the frame status already
            // carries the resulting machine state.
            debug!("{} acknowledged", opcode::name(op));
            return Ok(None);
        }

        opcode::GETID => {
            let d = need(op, data, 5)?;
            Event::Id(IdResponse {
                digits: [d[0], d[1], d[2], d[3], d[4]],
            })
        }

        opcode::GETVERSION => {
            let d = need(op, data, 7)?;
            Event::Version(VersionResponse {
                manufacturer_id: d[0],
                class_id: d[1],
                model: d[2],
                hardware_version: u16::from_le_bytes([d[3], d[4]]),
                firmware_version: u16::from_le_bytes([d[5], d[6]]),
            })
        }

        opcode::GETPOWER => {
            let d = need(op, data, 3)?;
            Event::Power(PowerResponse {
                stroke_watts: u16::from_le_bytes([d[0], d[1]]),
                units_specifier: d[2],
            })
        }

        opcode::PM_GET_STROKESTATE => {
            let d = need(op, data, 1)?;
            let state = StrokeState::from_u8(d[0]).ok_or(DecodeError::InvalidValue {
                field: "stroke state",
                value: d[0],
            })?;
            Event::StrokeState(StrokeStateResponse { state })
        }

        opcode::PM_GET_WORKOUTSTATE => {
            let d = need(op, data, 1)?;
            let state = WorkoutState::from_u8(d[0]).ok_or(DecodeError::InvalidValue {
                field: "workout state",
                value: d[0],
            })?;
            Event::WorkoutState(WorkoutStateResponse { state })
        }

        opcode::PM_GET_STROKESTATS => {
            let d = need(op, data, 16)?;
            Event::StrokeStats(StrokeStatsResponse {
                stroke_distance: u16::from_le_bytes([d[0], d[1]]),
                stroke_drive_time: d[2],
                stroke_recovery_time: u16::from_le_bytes([d[3], d[4]]),
                stroke_length: d[5],
                drive_counter: u16::from_le_bytes([d[6], d[7]]),
                peak_drive_force: u16::from_le_bytes([d[8], d[9]]),
                impulse_drive_force: u16::from_le_bytes([d[10], d[11]]),
                average_drive_force: u16::from_le_bytes([d[12], d[13]]),
                work_per_stroke: u16::from_le_bytes([d[14], d[15]]),
            })
        }

        opcode::GETUNITS => {
            let d = need(op, data, 1)?;
            Event::Units(UnitsResponse { units_type: d[0] })
        }

        opcode::GETSERIAL => {
            let d = need(op, data, 9)?;
            Event::Serial(SerialResponse {
                serial: String::from_utf8_lossy(&d[..9]).into_owned(),
            })
        }

        opcode::GETODOMETER => {
            let d = need(op, data, 5)?;
            Event::Odometer(OdometerResponse {
                distance: u32::from_le_bytes([d[0], d[1], d[2], d[3]]),
                units_specifier: d[4],
            })
        }

        opcode::GETERRORCODE => {
            // Three bytes, least significant first.
            let d = need(op, data, 3)?;
            Event::ErrorCode(ErrorCodeResponse {
                error_code: u32::from_le_bytes([d[0], d[1], d[2], 0]),
            })
        }

        _ => {
            warn!(
                "skipping unsupported response 0x{op:02x} with {} data bytes",
                data.len()
            );
            return Ok(None);
        }
    };

    Ok(Some(event))
}

fn need<'a>(op: u8, data: &'a [u8], expected: usize) -> Result<&'a [u8], DecodeError> {
    if data.len() < expected {
        return Err(DecodeError::TooShort {
            name: opcode::name(op),
            expected,
            got: data.len(),
        });
    }
    Ok(data)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{FrameStatus, MachineState};

    fn frame(status: u8, body: &[u8]) -> ResponseFrame {
        ResponseFrame {
            destination: 0x00,
            source: 0xFD,
            status: ResponseStatus::from_byte(status),
            body: body.to_vec(),
        }
    }

    #[test]
    fn short_commands_marshal_to_one_byte() {
        assert_eq!(Command::get_id().as_bytes(), &[0x92]);
        assert_eq!(Command::get_status().as_bytes(), &[0x80]);
        assert_eq!(Command::get_power().as_bytes(), &[0xB4]);
        assert_eq!(Command::go_ready().as_bytes(), &[0x87]);
    }

    #[test]
    fn proprietary_commands_marshal_wrapped() {
        assert_eq!(Command::get_stroke_state().as_bytes(), &[0x1A, 0x01, 0xBF]);
        assert_eq!(Command::get_workout_state().as_bytes(), &[0x1A, 0x01, 0x8D]);
        assert_eq!(
            Command::get_stroke_stats().as_bytes(),
            &[0x1A, 0x03, 0x6E, 0x01, 0x00]
        );
    }

    #[test]
    fn long_command_records_data_length() {
        let cmd = Command::long(0x76, &[0x01, 0x02, 0x03]);
        assert_eq!(cmd.as_bytes(), &[0x76, 0x03, 0x01, 0x02, 0x03]);
    }

    #[test]
    fn every_frame_yields_a_status_first() {
        let events = decode_frame(&frame(0x81, &[]));
        assert_eq!(
            events,
            vec![Event::Status(ResponseStatus {
                frame_toggle: true,
                prev_frame: FrameStatus::Ok,
                machine_state: MachineState::Ready,
            })]
        );
    }

    #[test]
    fn decodes_id_response() {
        let events = decode_frame(&frame(0x01, &[0x92, 0x05, 0x30, 0x31, 0x32, 0x33, 0x34]));
        assert_eq!(events.len(), 2);
        assert_eq!(
            events[1],
            Event::Id(IdResponse {
                digits: *b"01234"
            })
        );
    }

    #[test]
    fn decodes_wrapped_workout_state() {
        let events = decode_frame(&frame(0x01, &[0x1A, 0x03, 0x8D, 0x01, 0x01]));
        assert_eq!(
            events[1],
            Event::WorkoutState(WorkoutStateResponse {
                state: WorkoutState::WorkoutRow,
            })
        );
        if let Event::WorkoutState(ws) = &events[1] {
            assert_eq!(ws.label(), "Workout row");
        }
    }

    #[test]
    fn wrapped_sequences_unwrap_recursively() {
        // A wrapper inside a wrapper still reaches the typed decoder.
        let body = [0x1A, 0x05, 0x1A, 0x03, 0xBF, 0x01, 0x02];
        let events = decode_frame(&frame(0x01, &body));
        assert_eq!(
            events[1],
            Event::StrokeState(StrokeStateResponse {
                state: StrokeState::Driving,
            })
        );
    }

    #[test]
    fn unknown_opcode_is_skipped_not_fatal() {
        let body = [0x7E, 0x01, 0xAA, 0xB4, 0x03, 0x06, 0x00, 0x58];
        let events = decode_frame(&frame(0x01, &body));
        assert_eq!(events.len(), 2);
        assert_eq!(
            events[1],
            Event::Power(PowerResponse {
                stroke_watts: 6,
                units_specifier: 0x58,
            })
        );
    }

    #[test]
    fn truncated_triple_keeps_decoded_prefix() {
        // Power decodes; the id triple declares more data than remains.
        let body = [0xB4, 0x03, 0x06, 0x00, 0x58, 0x92, 0x05, 0x30];
        let events = decode_frame(&frame(0x01, &body));
        assert_eq!(events.len(), 2);
        assert!(matches!(events[1], Event::Power(_)));
    }

    #[test]
    fn short_typed_payload_is_an_error() {
        let mut out = Vec::new();
        let err = decode_responses(
            ResponseStatus::from_byte(0x01),
            &[0x91, 0x03, 0x16, 0x02, 0x05],
            &mut out,
        )
        .unwrap_err();
        assert_eq!(
            err,
            DecodeError::TooShort {
                name: "GETVERSION",
                expected: 7,
                got: 3,
            }
        );
    }

    #[test]
    fn control_acknowledgement_yields_no_extra_event() {
        let events = decode_frame(&frame(0x01, &[0x87, 0x00]));
        assert_eq!(events.len(), 1);
    }

    #[test]
    fn getstatus_triple_repeats_the_status() {
        let events = decode_frame(&frame(0x01, &[0x80, 0x00]));
        assert_eq!(events.len(), 2);
        assert_eq!(events[0], events[1]);
    }

    #[test]
    fn decodes_supplementary_telemetry() {
        let body = [
            0x94, 0x09, b'4', b'3', b'0', b'1', b'2', b'3', b'4', b'5', b'6', // serial
            0x9B, 0x05, 0x10, 0x27, 0x00, 0x00, 0x24, // odometer: 10000, units 0x24
            0x9C, 0x03, 0x39, 0x05, 0x00, // error code 1337
            0x93, 0x01, 0x24, // units
        ];
        let events = decode_frame(&frame(0x01, &body));
        assert_eq!(
            &events[1..],
            &[
                Event::Serial(SerialResponse {
                    serial: "430123456".into()
                }),
                Event::Odometer(OdometerResponse {
                    distance: 10_000,
                    units_specifier: 0x24,
                }),
                Event::ErrorCode(ErrorCodeResponse { error_code: 1337 }),
                Event::Units(UnitsResponse { units_type: 0x24 }),
            ]
        );
    }
}
