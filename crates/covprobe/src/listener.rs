//! Stream Listener
//!
//! Background thread that tails the device log and feeds executed methods
//! into a [`ComponentCounter`]. When the stream ends (EOF, read error, or
//! the device refusing to open it) the listener logs a restart and opens a
//! fresh stream. Restarts never reset the counter, so lines replayed after a
//! restart are not double counted.
//!
//! ```text
//! Idle ──start──► Running ──stream ends──► Restarting ──► Running ...
//!                    │                          │
//!                    └──────── stop() ──────────┴──► Stopped
//! ```

use crate::coverage::{ComponentCounter, LogLine};
use crate::device::{LogStream, TargetDevice};
use crate::result::{CovError, CovResult};
use serde::{Deserialize, Serialize};
use std::io::BufRead;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::JoinHandle;
use std::time::Duration;

/// Pause before reopening an ended stream unless configured otherwise
pub const DEFAULT_RESTART_BACKOFF: Duration = Duration::from_millis(500);

/// Longest single sleep while backing off, so `stop()` is noticed promptly
const STOP_POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Listener lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ListenerState {
    /// Thread spawned, no stream opened yet
    Idle,
    /// Consuming a live stream
    Running,
    /// Stream ended; about to reopen
    Restarting,
    /// Stopped through the shutdown hook
    Stopped,
}

/// Listener settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListenerConfig {
    /// Log tag the stream is filtered to
    pub tag: String,
    /// Pause between a stream ending and the next open
    #[serde(with = "crate::config::millis")]
    pub restart_backoff: Duration,
}

impl ListenerConfig {
    /// Listener for `tag` with the default restart backoff
    #[must_use]
    pub fn new(tag: impl Into<String>) -> Self {
        Self {
            tag: tag.into(),
            restart_backoff: DEFAULT_RESTART_BACKOFF,
        }
    }

    /// Set the restart backoff
    #[must_use]
    pub const fn with_restart_backoff(mut self, backoff: Duration) -> Self {
        self.restart_backoff = backoff;
        self
    }
}

#[derive(Debug)]
struct ListenerShared {
    stop: AtomicBool,
    state: Mutex<ListenerState>,
    restarts: AtomicU64,
    lines: AtomicU64,
}

impl ListenerShared {
    fn set_state(&self, state: ListenerState) {
        *self.state.lock().unwrap_or_else(PoisonError::into_inner) = state;
    }

    fn stopping(&self) -> bool {
        self.stop.load(Ordering::SeqCst)
    }
}

/// Handle to the background log listener
///
/// Dropping the handle asks the thread to stop without waiting for it.
#[derive(Debug)]
pub struct StreamListener {
    shared: Arc<ListenerShared>,
    handle: Option<JoinHandle<()>>,
    done: Mutex<Receiver<()>>,
}

impl StreamListener {
    /// Spawn the listener thread and return immediately
    pub fn start(
        device: Arc<dyn TargetDevice>,
        config: ListenerConfig,
        counter: ComponentCounter,
    ) -> CovResult<Self> {
        let shared = Arc::new(ListenerShared {
            stop: AtomicBool::new(false),
            state: Mutex::new(ListenerState::Idle),
            restarts: AtomicU64::new(0),
            lines: AtomicU64::new(0),
        });
        let (done_tx, done) = mpsc::channel();
        let thread_shared = Arc::clone(&shared);
        let handle = std::thread::Builder::new()
            .name(format!("covprobe-listener-{}", config.tag))
            .spawn(move || {
                run_loop(device.as_ref(), &config, &counter, &thread_shared);
                thread_shared.set_state(ListenerState::Stopped);
                let _ = done_tx.send(());
            })?;
        Ok(Self {
            shared,
            handle: Some(handle),
            done: Mutex::new(done),
        })
    }

    /// Ask the thread to stop at the next line or restart boundary
    pub fn stop(&self) {
        self.shared.stop.store(true, Ordering::SeqCst);
    }

    /// Stop and wait up to `timeout` for the thread to exit
    ///
    /// Returns `false` if the thread is still blocked on a read when the
    /// timeout elapses; it is then left to finish on its own.
    pub fn shutdown(mut self, timeout: Duration) -> bool {
        self.stop();
        let exited = {
            let done = self.done.lock().unwrap_or_else(PoisonError::into_inner);
            !matches!(done.recv_timeout(timeout), Err(RecvTimeoutError::Timeout))
        };
        if !exited {
            tracing::warn!(?timeout, "listener still blocked on read; detaching");
            return false;
        }
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
        true
    }

    /// Current lifecycle state
    #[must_use]
    pub fn state(&self) -> ListenerState {
        *self
            .shared
            .state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Streams reopened so far
    #[must_use]
    pub fn restarts(&self) -> u64 {
        self.shared.restarts.load(Ordering::SeqCst)
    }

    /// Raw lines read across all streams
    #[must_use]
    pub fn lines_seen(&self) -> u64 {
        self.shared.lines.load(Ordering::SeqCst)
    }
}

impl Drop for StreamListener {
    fn drop(&mut self) {
        self.stop();
    }
}

fn run_loop(
    device: &dyn TargetDevice,
    config: &ListenerConfig,
    counter: &ComponentCounter,
    shared: &ListenerShared,
) {
    tracing::info!(tag = %config.tag, "log listener started");
    while !shared.stopping() {
        if let Err(e) = device.clear_log() {
            tracing::warn!(error = %e, "failed to clear device log");
        } else {
            tracing::debug!("cleared device log buffer");
        }

        match device.open_log_stream(&config.tag) {
            Ok(stream) => {
                shared.set_state(ListenerState::Running);
                consume(stream, counter, shared);
            }
            Err(e) => tracing::warn!(error = %e, "failed to open log stream"),
        }

        if shared.stopping() {
            break;
        }
        shared.set_state(ListenerState::Restarting);
        let restarts = shared.restarts.fetch_add(1, Ordering::SeqCst) + 1;
        let ended = CovError::StreamTerminated { restarts };
        tracing::warn!(methods = counter.method_count(), "{ended}; restarting log stream");
        pause(config.restart_backoff, shared);
    }
    tracing::info!(tag = %config.tag, "log listener stopped");
}

fn consume(mut stream: LogStream, counter: &ComponentCounter, shared: &ListenerShared) {
    let mut buf = Vec::with_capacity(256);
    loop {
        if shared.stopping() {
            return;
        }
        buf.clear();
        match stream.read_until(b'\n', &mut buf) {
            Ok(0) => return,
            Ok(_) => {
                shared.lines.fetch_add(1, Ordering::Relaxed);
                let line = String::from_utf8_lossy(&buf);
                let line = line.trim_end_matches('\n');
                if let Some(parsed) = LogLine::parse(line) {
                    if parsed.is_method() && counter.record_method(&parsed.content) {
                        tracing::trace!(method = %parsed.content, "new method covered");
                    }
                }
            }
            Err(e) => {
                tracing::warn!(error = %e, "log stream read failed");
                return;
            }
        }
    }
}

fn pause(backoff: Duration, shared: &ListenerShared) {
    let mut remaining = backoff;
    while !remaining.is_zero() && !shared.stopping() {
        let step = remaining.min(STOP_POLL_INTERVAL);
        std::thread::sleep(step);
        remaining -= step;
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::testing::FakeDevice;
    use std::time::Instant;

    const WAIT: Duration = Duration::from_secs(5);

    fn wait_until(mut cond: impl FnMut() -> bool) -> bool {
        let deadline = Instant::now() + WAIT;
        while Instant::now() < deadline {
            if cond() {
                return true;
            }
            std::thread::sleep(Duration::from_millis(5));
        }
        cond()
    }

    fn config() -> ListenerConfig {
        ListenerConfig::new("FING_SUPER_LOG").with_restart_backoff(Duration::from_millis(5))
    }

    #[test]
    fn test_malformed_and_duplicate_lines_count_once() {
        let device = FakeDevice::new().session(&[
            "METHOD=foo.bar",
            "garbage text",
            "METHOD=foo.bar",
            "CLASS=Baz",
        ]);
        let counter = ComponentCounter::new();
        let listener =
            StreamListener::start(Arc::new(device), config(), counter.clone()).unwrap();
        assert!(wait_until(|| listener.lines_seen() >= 4));
        assert_eq!(counter.method_count(), 1);
        assert!(listener.shutdown(WAIT));
    }

    #[test]
    fn test_restart_does_not_reset_counts() {
        let device = FakeDevice::new()
            .session(&["METHOD=a", "METHOD=b"])
            .session(&["METHOD=b", "METHOD=c", "METHOD=a"]);
        let counter = ComponentCounter::new();
        let listener =
            StreamListener::start(Arc::new(device.clone()), config(), counter.clone()).unwrap();
        assert!(wait_until(|| listener.lines_seen() >= 5));
        assert!(wait_until(|| listener.restarts() >= 2));
        assert_eq!(counter.method_count(), 3);
        assert!(device.opens() >= 2);
        assert!(listener.shutdown(WAIT));
    }

    #[test]
    fn test_start_does_not_block_caller() {
        let device = FakeDevice::new();
        let started = Instant::now();
        let listener = StreamListener::start(
            Arc::new(device),
            ListenerConfig::new("T").with_restart_backoff(Duration::from_secs(2)),
            ComponentCounter::new(),
        )
        .unwrap();
        assert!(started.elapsed() < Duration::from_secs(1));
        assert!(listener.shutdown(WAIT));
    }

    #[test]
    fn test_clears_log_before_each_open() {
        let device = FakeDevice::new().session(&["METHOD=a"]);
        let listener =
            StreamListener::start(Arc::new(device.clone()), config(), ComponentCounter::new())
                .unwrap();
        assert!(wait_until(|| device.opens() >= 2));
        assert!(device.clears() >= device.opens() - 1);
        assert!(listener.shutdown(WAIT));
    }

    #[test]
    fn test_clear_failure_is_not_fatal() {
        let device = FakeDevice::new().failing_clear().session(&["METHOD=x"]);
        let counter = ComponentCounter::new();
        let listener =
            StreamListener::start(Arc::new(device), config(), counter.clone()).unwrap();
        assert!(wait_until(|| counter.method_count() == 1));
        assert!(listener.shutdown(WAIT));
    }

    #[test]
    fn test_shutdown_reaches_stopped_state() {
        let device = FakeDevice::new();
        let listener =
            StreamListener::start(Arc::new(device), config(), ComponentCounter::new()).unwrap();
        assert!(wait_until(|| listener.restarts() >= 1));
        listener.stop();
        assert!(wait_until(|| listener.state() == ListenerState::Stopped));
        assert!(listener.shutdown(WAIT));
    }

    #[test]
    fn test_default_backoff_paces_reopening() {
        let device = FakeDevice::new();
        let config = ListenerConfig::new("T");
        assert_eq!(config.restart_backoff, DEFAULT_RESTART_BACKOFF);
        let listener =
            StreamListener::start(Arc::new(device.clone()), config, ComponentCounter::new())
                .unwrap();
        assert!(wait_until(|| device.opens() >= 1));
        std::thread::sleep(Duration::from_millis(300));
        assert_eq!(device.opens(), 1);
        assert!(listener.shutdown(WAIT));
    }

    #[test]
    fn test_logcat_prefixed_lines_are_counted() {
        let device = FakeDevice::new().session(&[
            "--------- beginning of main",
            "I/FING_SUPER_LOG( 1201): METHOD=com.app.Main.onCreate()V",
            "I/FING_SUPER_LOG( 1201): METHOD=com.app.Main.onResume()V",
        ]);
        let counter = ComponentCounter::new();
        let listener =
            StreamListener::start(Arc::new(device), config(), counter.clone()).unwrap();
        assert!(wait_until(|| counter.method_count() == 2));
        assert!(listener.shutdown(WAIT));
    }
}
