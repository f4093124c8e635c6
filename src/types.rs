//! Decoded monitor state: the response status byte and the PM state tables.

use crate::protocol::status;

/// Handling status of the previous host frame (status byte bits 5-4).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameStatus {
    Ok,
    Reject,
    Bad,
    NotReady,
}

impl FrameStatus {
    fn from_status_byte(byte: u8) -> Self {
        match (byte & status::PREV_FRAME) >> 4 {
            0 => Self::Ok,
            1 => Self::Reject,
            2 => Self::Bad,
            _ => Self::NotReady,
        }
    }
}

/// CSAFE state-machine state (status byte bits 3-0).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MachineState {
    Error,
    Ready,
    Idle,
    HaveId,
    InUse,
    Pause,
    Finish,
    Manual,
    Offline,
    /// A state value outside the published table.
    Unknown(u8),
}

impl MachineState {
    fn from_status_byte(byte: u8) -> Self {
        match byte & status::MACHINE_STATE {
            0x00 => Self::Error,
            0x01 => Self::Ready,
            0x02 => Self::Idle,
            0x03 => Self::HaveId,
            0x05 => Self::InUse,
            0x06 => Self::Pause,
            0x07 => Self::Finish,
            0x08 => Self::Manual,
            0x09 => Self::Offline,
            other => Self::Unknown(other),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Error => "Error",
            Self::Ready => "Ready",
            Self::Idle => "Idle",
            Self::HaveId => "HaveID",
            Self::InUse => "InUse",
            Self::Pause => "Pause",
            Self::Finish => "Finish",
            Self::Manual => "Manual",
            Self::Offline => "Offline",
            Self::Unknown(_) => "Unknown",
        }
    }
}

/// Decoded response status byte.
///
/// Every inbound frame carries one; the receive pump surfaces it as the
/// first event of the frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResponseStatus {
    /// Flips on each accepted inbound frame.
    pub frame_toggle: bool,
    pub prev_frame: FrameStatus,
    pub machine_state: MachineState,
}

impl ResponseStatus {
    pub fn from_byte(byte: u8) -> Self {
        Self {
            frame_toggle: byte & status::FRAME_TOGGLE != 0,
            prev_frame: FrameStatus::from_status_byte(byte),
            machine_state: MachineState::from_status_byte(byte),
        }
    }
}

/// Flywheel stroke state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StrokeState {
    /// Waiting for the wheel to reach minimum speed (0).
    WaitingForMinSpeed,
    /// Waiting for the wheel to accelerate (1).
    WaitingToAccelerate,
    /// Drive in progress (2).
    Driving,
    /// Dwelling after the drive (3).
    Dwelling,
    /// Recovery (4).
    Recovering,
}

impl StrokeState {
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(Self::WaitingForMinSpeed),
            1 => Some(Self::WaitingToAccelerate),
            2 => Some(Self::Driving),
            3 => Some(Self::Dwelling),
            4 => Some(Self::Recovering),
            _ => None,
        }
    }

    pub fn as_u8(self) -> u8 {
        match self {
            Self::WaitingForMinSpeed => 0,
            Self::WaitingToAccelerate => 1,
            Self::Driving => 2,
            Self::Dwelling => 3,
            Self::Recovering => 4,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::WaitingForMinSpeed => "wait min speed",
            Self::WaitingToAccelerate => "accelerating",
            Self::Driving => "driving",
            Self::Dwelling => "dwelling",
            Self::Recovering => "recovering",
        }
    }
}

/// Workout state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkoutState {
    WaitToBegin,
    WorkoutRow,
    CountdownPause,
    IntervalRest,
    IntervalWorkTime,
    IntervalWorkDistance,
    IntervalRestEndToWorkTime,
    IntervalRestEndToWorkDistance,
    IntervalWorkTimeToRest,
    IntervalWorkDistanceToRest,
    WorkoutEnd,
    Terminate,
    WorkoutLogged,
    Rearm,
}

impl WorkoutState {
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(Self::WaitToBegin),
            1 => Some(Self::WorkoutRow),
            2 => Some(Self::CountdownPause),
            3 => Some(Self::IntervalRest),
            4 => Some(Self::IntervalWorkTime),
            5 => Some(Self::IntervalWorkDistance),
            6 => Some(Self::IntervalRestEndToWorkTime),
            7 => Some(Self::IntervalRestEndToWorkDistance),
            8 => Some(Self::IntervalWorkTimeToRest),
            9 => Some(Self::IntervalWorkDistanceToRest),
            10 => Some(Self::WorkoutEnd),
            11 => Some(Self::Terminate),
            12 => Some(Self::WorkoutLogged),
            13 => Some(Self::Rearm),
            _ => None,
        }
    }

    pub fn as_u8(self) -> u8 {
        match self {
            Self::WaitToBegin => 0,
            Self::WorkoutRow => 1,
            Self::CountdownPause => 2,
            Self::IntervalRest => 3,
            Self::IntervalWorkTime => 4,
            Self::IntervalWorkDistance => 5,
            Self::IntervalRestEndToWorkTime => 6,
            Self::IntervalRestEndToWorkDistance => 7,
            Self::IntervalWorkTimeToRest => 8,
            Self::IntervalWorkDistanceToRest => 9,
            Self::WorkoutEnd => 10,
            Self::Terminate => 11,
            Self::WorkoutLogged => 12,
            Self::Rearm => 13,
        }
    }

    /// Display label, as printed on polling dashboards.
    pub fn label(self) -> &'static str {
        match self {
            Self::WaitToBegin => "Wait to begin",
            Self::WorkoutRow => "Workout row",
            Self::CountdownPause => "Countdown pause",
            Self::IntervalRest => "Interval rest",
            Self::IntervalWorkTime => "Interval work time",
            Self::IntervalWorkDistance => "Interval work distance",
            Self::IntervalRestEndToWorkTime => "Interval rest end to work time",
            Self::IntervalRestEndToWorkDistance => "Interval rest end to work distance",
            Self::IntervalWorkTimeToRest => "Interval work time to rest",
            Self::IntervalWorkDistanceToRest => "Interval work distance to rest",
            Self::WorkoutEnd => "Workout end",
            Self::Terminate => "Workout terminate",
            Self::WorkoutLogged => "Workout logged",
            Self::Rearm => "Workout rearm",
        }
    }
}

/// Detects the start of each drive from successive stroke states.
///
/// A new stroke begins when the state drops back to [`StrokeState::Driving`]
/// from a state past the drive (dwelling or recovering). Repeated `Driving`
/// reports within one stroke do not retrigger.
#[derive(Debug, Default)]
pub struct StrokeTracker {
    last: Option<StrokeState>,
}

impl StrokeTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed the next observed stroke state; true when a new stroke begins.
    pub fn observe(&mut self, state: StrokeState) -> bool {
        let started = matches!(self.last, Some(prev) if prev.as_u8() > 2)
            && state == StrokeState::Driving;
        self.last = Some(state);
        started
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_byte_decodes_fields() {
        let s = ResponseStatus::from_byte(0x01);
        assert!(!s.frame_toggle);
        assert_eq!(s.prev_frame, FrameStatus::Ok);
        assert_eq!(s.machine_state, MachineState::Ready);

        let s = ResponseStatus::from_byte(0x81);
        assert!(s.frame_toggle);
        assert_eq!(s.machine_state, MachineState::Ready);

        let s = ResponseStatus::from_byte(0x35);
        assert_eq!(s.prev_frame, FrameStatus::NotReady);
        assert_eq!(s.machine_state, MachineState::InUse);
    }

    #[test]
    fn machine_state_keeps_unlisted_values() {
        let s = ResponseStatus::from_byte(0x0C);
        assert_eq!(s.machine_state, MachineState::Unknown(0x0C));
    }

    #[test]
    fn workout_state_labels() {
        assert_eq!(WorkoutState::from_u8(1), Some(WorkoutState::WorkoutRow));
        assert_eq!(WorkoutState::WorkoutRow.label(), "Workout row");
        assert_eq!(WorkoutState::from_u8(13), Some(WorkoutState::Rearm));
        assert_eq!(WorkoutState::from_u8(14), None);
    }

    #[test]
    fn stroke_tracker_fires_once_per_drive() {
        let mut tracker = StrokeTracker::new();
        let observed: Vec<bool> = [4u8, 4, 4, 2, 2]
            .iter()
            .map(|&v| tracker.observe(StrokeState::from_u8(v).unwrap()))
            .collect();
        assert_eq!(observed, vec![false, false, false, true, false]);
    }

    #[test]
    fn stroke_tracker_ignores_drive_from_acceleration() {
        let mut tracker = StrokeTracker::new();
        assert!(!tracker.observe(StrokeState::WaitingToAccelerate));
        assert!(!tracker.observe(StrokeState::Driving));
        assert!(!tracker.observe(StrokeState::Dwelling));
        assert!(tracker.observe(StrokeState::Driving));
    }
}
