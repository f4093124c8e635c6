//! Host-side driver for the Concept2 PM5 rowing performance monitor.
//!
//! Speaks the PM5 variant of CSAFE over USB HID: an extended-frame codec
//! with byte stuffing and XOR checksums, typed command/response marshalling
//! (including the proprietary SETUSERCFG1 wrapper), a paced sender that
//! respects the monitor's interframe gap and coalesces queued commands into
//! one frame, and a receive pump that turns raw HID reports into typed
//! [`Event`]s.
//!
//! ```no_run
//! use pm5_csafe::{Command, Event, PerformanceMonitor};
//!
//! # async fn demo() -> Result<(), pm5_csafe::TransportError> {
//! let mut pm = PerformanceMonitor::open()?;
//! let mut events = pm.events().expect("fresh session");
//!
//! pm.send_all([Command::get_id(), Command::get_version()])?;
//! while let Some(event) = events.recv().await {
//!     if let Event::Power(power) = event {
//!         println!("{} W", power.stroke_watts);
//!     }
//! }
//! # Ok(())
//! # }
//! ```

pub mod command;
pub mod error;
pub mod frame;
pub mod hid;
pub mod protocol;
pub mod report;
pub mod transport;
pub mod types;

mod monitor;

pub use command::{
    Command, DecodeError, ErrorCodeResponse, Event, IdResponse, OdometerResponse, PowerResponse,
    SerialResponse, StrokeStateResponse, StrokeStatsResponse, UnitsResponse, VersionResponse,
    WorkoutStateResponse,
};
pub use error::TransportError;
pub use frame::{FrameError, ResponseFrame};
pub use monitor::PerformanceMonitor;
pub use report::Report;
pub use transport::{Transport, TransportConfig};
pub use types::{
    FrameStatus, MachineState, ResponseStatus, StrokeState, StrokeTracker, WorkoutState,
};
