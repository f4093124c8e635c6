//! Paced command transport over one HID device.
//!
//! Two long-lived tasks per session:
//!
//! - the **sender** drains the command queue, coalesces what it finds into
//!   one frame within the monitor's maximum frame length, and enforces the
//!   interframe gap before every write;
//! - the **receiver** turns raw input reports into typed [`Event`]s on the
//!   session's event channel.
//!
//! A dedicated reader thread performs the blocking HID reads and feeds the
//! receiver through a channel, so neither task blocks the runtime. The two
//! tasks share nothing but the pacing record behind a mutex, which is never
//! held across a suspension point.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::command::{decode_frame, Command, Event};
use crate::error::TransportError;
use crate::frame;
use crate::hid::DeviceIo;
use crate::protocol::timing;
use crate::report::{self, Report};

/// Capacity of the raw-report channel between the reader thread and the
/// receiver task.
const RAW_REPORT_CAPACITY: usize = 32;

/// Transport tuning knobs.
#[derive(Debug, Clone)]
pub struct TransportConfig {
    /// Minimum wall-clock gap between two writes with no inbound report
    /// between them.
    pub send_timeout: Duration,
    /// Depth of the outbound command queue.
    pub send_buffer: usize,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            send_timeout: Duration::from_millis(timing::SEND_TIMEOUT_MS),
            send_buffer: timing::SEND_BUFFER,
        }
    }
}

impl TransportConfig {
    pub fn with_send_timeout(mut self, timeout: Duration) -> Self {
        self.send_timeout = timeout;
        self
    }

    pub fn with_send_buffer(mut self, depth: usize) -> Self {
        self.send_buffer = depth;
        self
    }
}

/// Shared pacing record: when the last write happened and whether the
/// monitor has answered since.
#[derive(Debug, Default)]
struct PaceState {
    last_send: Option<Instant>,
    received_since_last_send: bool,
}

impl PaceState {
    /// Record an accepted inbound report.
    fn note_report(&mut self) {
        self.received_since_last_send = true;
    }

    /// Ask to write at `now`. `Ok` records the send; `Err` names the
    /// earliest instant worth asking again.
    fn check_send(&mut self, now: Instant, gap: Duration) -> Result<(), Instant> {
        match self.last_send {
            Some(last) if !self.received_since_last_send && now < last + gap => Err(last + gap),
            _ => {
                self.last_send = Some(now);
                self.received_since_last_send = false;
                Ok(())
            }
        }
    }
}

/// Append a command to a frame batch unless the framed wire length would
/// exceed the monitor's maximum frame length. Returns whether the command
/// was taken.
fn try_append(batch: &mut Vec<u8>, command: &Command) -> bool {
    let mut trial = batch.clone();
    trial.extend_from_slice(command.as_bytes());
    if frame::build(&trial).len() > crate::protocol::MAX_FRAME_LEN {
        return false;
    }
    *batch = trial;
    true
}

/// A running transport session.
pub struct Transport {
    command_tx: mpsc::Sender<Command>,
    events_rx: Option<mpsc::UnboundedReceiver<Event>>,
    shutdown: Arc<AtomicBool>,
    sender: JoinHandle<()>,
    receiver: JoinHandle<()>,
}

impl Transport {
    /// Start the sender and receiver over an opened device.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn start<D: DeviceIo>(device: Arc<D>, config: TransportConfig) -> Self {
        let shutdown = Arc::new(AtomicBool::new(false));
        let pace = Arc::new(Mutex::new(PaceState::default()));
        let (command_tx, command_rx) = mpsc::channel(config.send_buffer);
        let (raw_tx, raw_rx) = mpsc::channel(RAW_REPORT_CAPACITY);
        let (event_tx, events_rx) = mpsc::unbounded_channel();

        {
            let device = Arc::clone(&device);
            let shutdown = Arc::clone(&shutdown);
            thread::Builder::new()
                .name("pm5-hid-reader".into())
                .spawn(move || run_reader_loop(device, raw_tx, shutdown))
                .expect("failed to spawn HID reader thread");
        }

        let sender = tokio::spawn(run_sender(
            Arc::clone(&device),
            command_rx,
            Arc::clone(&pace),
            config.send_timeout,
        ));
        let receiver = tokio::spawn(run_receiver(raw_rx, pace, event_tx));

        Self {
            command_tx,
            events_rx: Some(events_rx),
            shutdown,
            sender,
            receiver,
        }
    }

    /// Enqueue one command without blocking.
    pub fn send(&self, command: Command) -> Result<(), TransportError> {
        self.command_tx.try_send(command).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => TransportError::SendBufferFull,
            mpsc::error::TrySendError::Closed(_) => TransportError::Disconnected,
        })
    }

    /// Take the session's event stream. Available once; the stream ends
    /// when the session does.
    pub fn events(&mut self) -> Option<mpsc::UnboundedReceiver<Event>> {
        self.events_rx.take()
    }

    /// Stop both tasks and wait for them to finish.
    pub async fn close(self) {
        self.shutdown.store(true, Ordering::SeqCst);
        drop(self.command_tx);
        let _ = self.sender.await;
        let _ = self.receiver.await;
        info!("transport closed");
    }
}

/// Blocking read loop on its own thread. Exits on shutdown, on a dropped
/// receiver, or on a read error (a failed read means the device is gone).
fn run_reader_loop<D: DeviceIo>(device: Arc<D>, tx: mpsc::Sender<Report>, shutdown: Arc<AtomicBool>) {
    debug!("HID reader thread started");
    let mut buf = [0u8; report::MAX_INPUT_LEN];
    while !shutdown.load(Ordering::Relaxed) {
        match device.read_report(&mut buf, timing::READ_TIMEOUT_MS) {
            Ok(0) => {} // timeout; loop to check shutdown
            Ok(n) => {
                let report = Report {
                    id: buf[0],
                    data: buf[1..n].to_vec(),
                };
                if tx.blocking_send(report).is_err() {
                    break;
                }
            }
            Err(e) => {
                error!("HID read failed, ending session: {e}");
                break;
            }
        }
    }
    debug!("HID reader thread exiting");
}

/// Sender task: consume the command queue, coalesce, pace, write.
async fn run_sender<D: DeviceIo>(
    device: Arc<D>,
    mut commands: mpsc::Receiver<Command>,
    pace: Arc<Mutex<PaceState>>,
    gap: Duration,
) {
    debug!("sender task started");
    let mut carry: Option<Command> = None;

    loop {
        let first = match carry.take() {
            Some(c) => c,
            None => match commands.recv().await {
                Some(c) => c,
                None => break,
            },
        };

        // Coalesce whatever else is already queued. A command that would
        // overflow the frame starts the next batch instead, keeping FIFO
        // order.
        let mut batch = first.into_bytes();
        while let Ok(next) = commands.try_recv() {
            if !try_append(&mut batch, &next) {
                carry = Some(next);
                break;
            }
        }

        loop {
            let verdict = pace.lock().check_send(Instant::now(), gap);
            match verdict {
                Ok(()) => break,
                Err(at) => tokio::time::sleep_until(tokio::time::Instant::from_std(at)).await,
            }
        }

        let wire = frame::build(&batch);
        debug!("writing frame: {:02x?}", wire);
        if let Err(e) = device.write_report(&report::output_report(&wire)) {
            // Transient write failures happen across device power
            // transitions; the next command retries the pipe.
            warn!("HID write failed: {e}");
        }
    }
    debug!("sender task exiting");
}

/// Receiver task: demultiplex raw reports into typed events.
async fn run_receiver(
    mut raw: mpsc::Receiver<Report>,
    pace: Arc<Mutex<PaceState>>,
    events: mpsc::UnboundedSender<Event>,
) {
    debug!("receiver task started");
    while let Some(report) = raw.recv().await {
        let Some(payload) = report::accept(&report) else {
            continue;
        };
        pace.lock().note_report();

        for frame in frame::extract(payload) {
            for event in decode_frame(&frame) {
                if events.send(event).is_err() {
                    debug!("event consumer gone");
                }
            }
        }
    }
    debug!("receiver task exiting");
}
