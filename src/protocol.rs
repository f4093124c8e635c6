//! CSAFE wire constants for the Concept2 PM5.

/// Unique frame flag bytes. No byte of a stuffed frame interior may equal
/// any of these values.
pub mod flag {
    /// Extended frame start (the PM5 path uses extended frames only).
    pub const EXT_START: u8 = 0xF0;
    /// Standard frame start. Recognised but never emitted by this driver.
    pub const STD_START: u8 = 0xF1;
    /// Frame stop.
    pub const STOP: u8 = 0xF2;
    /// Byte-stuffing escape.
    pub const STUFF: u8 = 0xF3;
}

/// Extended-frame addresses.
pub mod addr {
    pub const PC_HOST_PRIMARY: u8 = 0x00;
    pub const DEFAULT_SECONDARY: u8 = 0xFD;
    pub const BROADCAST: u8 = 0xFF;
}

/// Response status byte bit masks.
pub mod status {
    /// Toggles between 0 and 1 on alternate accepted frames.
    pub const FRAME_TOGGLE: u8 = 0x80;
    /// Previous-frame handling status (bits 5-4).
    pub const PREV_FRAME: u8 = 0x30;
    /// CSAFE state-machine state (bits 3-0).
    pub const MACHINE_STATE: u8 = 0x0F;
}

/// Command opcodes understood by this driver.
///
/// The `PM_*` opcodes live in the monitor's proprietary namespace and must
/// be wrapped in a SETUSERCFG1 long command on the wire.
pub mod opcode {
    pub const SETUSERCFG1: u8 = 0x1A;
    pub const PM_GET_STROKESTATS: u8 = 0x6E;
    pub const GETSTATUS: u8 = 0x80;
    pub const RESET: u8 = 0x81;
    pub const GOIDLE: u8 = 0x82;
    pub const GOHAVEID: u8 = 0x83;
    pub const GOINUSE: u8 = 0x85;
    pub const GOFINISHED: u8 = 0x86;
    pub const GOREADY: u8 = 0x87;
    pub const BADID: u8 = 0x88;
    pub const PM_GET_WORKOUTSTATE: u8 = 0x8D;
    pub const GETVERSION: u8 = 0x91;
    pub const GETID: u8 = 0x92;
    pub const GETUNITS: u8 = 0x93;
    pub const GETSERIAL: u8 = 0x94;
    pub const GETODOMETER: u8 = 0x9B;
    pub const GETERRORCODE: u8 = 0x9C;
    pub const GETPOWER: u8 = 0xB4;
    pub const PM_GET_STROKESTATE: u8 = 0xBF;

    /// Human-readable opcode name for log output.
    pub fn name(op: u8) -> &'static str {
        match op {
            SETUSERCFG1 => "SETUSERCFG1",
            PM_GET_STROKESTATS => "PM_GET_STROKESTATS",
            GETSTATUS => "GETSTATUS",
            RESET => "RESET",
            GOIDLE => "GOIDLE",
            GOHAVEID => "GOHAVEID",
            GOINUSE => "GOINUSE",
            GOFINISHED => "GOFINISHED",
            GOREADY => "GOREADY",
            BADID => "BADID",
            PM_GET_WORKOUTSTATE => "PM_GET_WORKOUTSTATE",
            GETVERSION => "GETVERSION",
            GETID => "GETID",
            GETUNITS => "GETUNITS",
            GETSERIAL => "GETSERIAL",
            GETODOMETER => "GETODOMETER",
            GETERRORCODE => "GETERRORCODE",
            GETPOWER => "GETPOWER",
            PM_GET_STROKESTATE => "PM_GET_STROKESTATE",
            _ => "UNKNOWN",
        }
    }
}

/// USB identification.
pub mod device {
    /// Concept2 vendor id.
    pub const CONCEPT2_VID: u16 = 0x17A4;
    /// PM5 product id.
    pub const PM5_PID: u16 = 0x001E;
}

/// Host-side timing.
pub mod timing {
    /// Minimum interframe gap the monitor requires between outbound frames.
    pub const MIN_INTERFRAME_GAP_MS: u64 = 50;
    /// Default sender gap. Safety margin over [`MIN_INTERFRAME_GAP_MS`].
    pub const SEND_TIMEOUT_MS: u64 = 100;
    /// Default depth of the outbound command queue.
    pub const SEND_BUFFER: usize = 100;
    /// Reader-thread poll timeout. Bounds shutdown latency when idle.
    pub const READ_TIMEOUT_MS: i32 = 5;
}

/// Maximum frame length the monitor accepts, in wire bytes.
pub const MAX_FRAME_LEN: usize = 120;

/// 8-bit XOR checksum over the designated byte range.
pub fn checksum(bytes: &[u8]) -> u8 {
    bytes.iter().fold(0, |acc, b| acc ^ b)
}
