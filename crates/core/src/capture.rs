//! Background capture pipeline: RTT bytes through the parser into the
//! profiler.
//!
//! One worker thread polls the debug transport while a scenario runs,
//! feeds every chunk through the frame parser, and appends the decoded
//! records to the profiler. The worker owns transport, parser, and
//! profiler outright for its lifetime, so no lock guards the timeline;
//! the caller gets the profiler back, processed exactly once, at join.
//!
//! Cancellation is cooperative (atomic stop flag checked each iteration),
//! and a fatal transport error is parked in a shared slot rather than
//! interrupting the caller's thread.

use crate::error::{Error, Result};
use crate::parser::RecordParser;
use crate::profiler::Profiler;
use crate::record::Record;
use crate::transport::RttTransport;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tracing::{debug, error, info};

/// Sleep between transport polls, bounding the poll frequency.
pub const POLL_INTERVAL: Duration = Duration::from_millis(10);
/// Upper bound on bytes pulled per transport read.
pub const READ_CHUNK: usize = 1024;

/// Handle to a running capture worker.
pub struct CaptureHandle {
    stop: Arc<AtomicBool>,
    fatal: Arc<Mutex<Option<Error>>>,
    worker: JoinHandle<Profiler>,
}

/// Spawn the capture worker.
///
/// The worker runs until the transport disconnects, a fatal read error
/// occurs, or [`CaptureHandle::stop`] is called. In every case it runs
/// `profiler.process()` on whatever records arrived before exiting.
pub fn start_capture<T>(mut transport: T, mut parser: RecordParser, mut profiler: Profiler) -> CaptureHandle
where
    T: RttTransport + 'static,
{
    let stop = Arc::new(AtomicBool::new(false));
    let fatal = Arc::new(Mutex::new(None));

    let worker_stop = Arc::clone(&stop);
    let worker_fatal = Arc::clone(&fatal);
    let worker = thread::spawn(move || {
        let mut buf = [0u8; READ_CHUNK];
        while transport.connected() && !worker_stop.load(Ordering::Acquire) {
            match transport.read(&mut buf) {
                Ok(0) => {}
                Ok(n) => {
                    let records: Vec<Record> = parser
                        .feed(&buf[..n])
                        .iter()
                        .map(Record::decode)
                        .collect();
                    if !records.is_empty() {
                        profiler.add(&records);
                    }
                }
                Err(e) => {
                    error!(error = %e, "capture read failed");
                    *worker_fatal.lock().unwrap() = Some(e);
                    break;
                }
            }
            thread::sleep(POLL_INTERVAL);
        }
        info!(records = profiler.len(), "capture finished");
        profiler.process();
        profiler
    });

    debug!("capture worker started");
    CaptureHandle { stop, fatal, worker }
}

impl CaptureHandle {
    /// Whether the worker parked a fatal transport error. Non-consuming, for
    /// polling between scenario steps.
    pub fn has_fatal(&self) -> bool {
        self.fatal.lock().unwrap().is_some()
    }

    /// Whether the worker has already exited.
    pub fn is_finished(&self) -> bool {
        self.worker.is_finished()
    }

    /// Request stop and join within `join_timeout`.
    ///
    /// Returns the processed profiler, or the worker's fatal transport
    /// error if it died on one. The join bound holds because the transport
    /// read itself is time-bounded.
    pub fn stop(self, join_timeout: Duration) -> Result<Profiler> {
        self.stop.store(true, Ordering::Release);

        let deadline = Instant::now() + join_timeout;
        while !self.worker.is_finished() {
            if Instant::now() >= deadline {
                return Err(Error::Timeout(format!(
                    "capture worker did not stop within {} ms",
                    join_timeout.as_millis()
                )));
            }
            thread::sleep(Duration::from_millis(1));
        }

        let profiler = self
            .worker
            .join()
            .map_err(|_| Error::Transport("capture worker panicked".into()))?;

        if let Some(e) = self.fatal.lock().unwrap().take() {
            return Err(e);
        }
        Ok(profiler)
    }
}
