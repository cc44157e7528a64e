use std::os::fd::{AsFd, BorrowedFd};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use chunkbuf::{DoubleBuffer, TraceSink, DEFAULT_MAX_CHUNKS};
use nix::sys::epoll::{Epoll, EpollCreateFlags, EpollEvent, EpollFlags, EpollTimeout};
use nix::sys::eventfd::{EfdFlags, EventFd};
use parking_lot::Mutex;
use tracing::{debug, error, warn};

use crate::config::TraceConfig;
use crate::controller::TracingController;
use crate::registry::CategoryRegistry;
use crate::writer::LogWriter;
use crate::Result;

const FLUSH_TOKEN: u64 = 0;
const STOP_TOKEN: u64 = 1;

/// Coalescing wake-up signal backed by an eventfd. Any number of notifies
/// before the receiving thread reads collapse into one wake.
struct Notification {
    eventfd: EventFd,
}

impl Notification {
    fn new() -> Result<Self> {
        let eventfd = EventFd::from_value_and_flags(0, EfdFlags::EFD_CLOEXEC)?;
        Ok(Notification { eventfd })
    }

    /// Best effort; producers must never block or fail on a signal.
    fn notify(&self) {
        let _ = self.eventfd.write(1);
    }

    fn drain(&self) -> Result<()> {
        self.eventfd.read()?;
        Ok(())
    }

    fn fd(&self) -> BorrowedFd<'_> {
        self.eventfd.as_fd()
    }
}

/// Ties the controller, the double buffer, and the log writer together and
/// runs the dedicated writer thread.
///
/// The buffer reaches the agent only through the flush-signal closure, so
/// there is no ownership cycle between the two.
pub struct Agent {
    controller: Arc<TracingController>,
    writer: Arc<Mutex<LogWriter>>,
    stop_signal: Arc<Notification>,
    io_thread: Option<JoinHandle<()>>,
}

impl Agent {
    /// Starts tracing into `node_trace.log.<N>` files in the current
    /// directory.
    pub fn start(config: TraceConfig) -> Result<Agent> {
        Self::start_in(config, std::env::current_dir()?)
    }

    /// Starts tracing with the config read from `path`. With no path the
    /// fallback config enables the `v8` and `node` categories; an
    /// unreadable file falls back to the default config.
    pub fn start_with_config_file(
        path: Option<&Path>,
        directory: impl Into<PathBuf>,
    ) -> Result<Agent> {
        let config = match path {
            Some(path) => TraceConfig::from_file(path).unwrap_or_else(|error| {
                warn!(error = %error, path = %path.display(), "failed to read trace config");
                TraceConfig::default()
            }),
            None => {
                let mut config = TraceConfig::default();
                config.add_included_category("node");
                config
            }
        };
        Self::start_in(config, directory)
    }

    /// Starts tracing into `directory`. Fails when the first log file
    /// cannot be opened or when the writer thread cannot be spawned.
    pub fn start_in(config: TraceConfig, directory: impl Into<PathBuf>) -> Result<Agent> {
        let registry = Arc::new(CategoryRegistry::new());
        let mut log_writer = LogWriter::new(directory, registry.clone());
        if let Err(error) = log_writer.open_new_file() {
            error!(error = %error, "failed to open trace log file, tracing disabled");
            return Err(error.into());
        }
        let writer = Arc::new(Mutex::new(log_writer));

        let flush_signal = Arc::new(Notification::new()?);
        let stop_signal = Arc::new(Notification::new()?);

        let notify = flush_signal.clone();
        let sink: Arc<Mutex<dyn TraceSink + Send>> = writer.clone();
        let buffer = Arc::new(DoubleBuffer::new(
            DEFAULT_MAX_CHUNKS,
            Arc::new(move || notify.notify()),
            sink,
        ));
        let controller = Arc::new(TracingController::new(buffer.clone(), registry));
        controller.start_tracing(config);

        let io_thread = thread::Builder::new().name("trace-writer".to_string()).spawn({
            let writer = writer.clone();
            let stop_signal = stop_signal.clone();
            move || {
                if let Err(error) = writer_loop(&flush_signal, &stop_signal, &buffer, &writer) {
                    warn!(error = %error, "trace writer thread exited with error");
                }
            }
        })?;

        Ok(Agent {
            controller,
            writer,
            stop_signal,
            io_thread: Some(io_thread),
        })
    }

    pub fn controller(&self) -> &Arc<TracingController> {
        &self.controller
    }

    /// Stops tracing: drains the buffer synchronously, terminates the
    /// current log file, and joins the writer thread. Stopping an already
    /// stopped agent warns and does nothing.
    pub fn stop(&mut self) {
        let Some(io_thread) = self.io_thread.take() else {
            warn!("tracing agent already stopped");
            return;
        };
        self.controller.stop_tracing();
        self.writer.lock().write_suffix();
        self.stop_signal.notify();
        if io_thread.join().is_err() {
            warn!("trace writer thread panicked");
        }
    }
}

impl Drop for Agent {
    fn drop(&mut self) {
        if self.io_thread.is_some() {
            self.stop();
        }
    }
}

fn writer_loop(
    flush_signal: &Notification,
    stop_signal: &Notification,
    buffer: &DoubleBuffer,
    writer: &Mutex<LogWriter>,
) -> Result<()> {
    let epoll = Epoll::new(EpollCreateFlags::EPOLL_CLOEXEC)?;
    epoll.add(
        flush_signal.fd(),
        EpollEvent::new(EpollFlags::EPOLLIN, FLUSH_TOKEN),
    )?;
    epoll.add(
        stop_signal.fd(),
        EpollEvent::new(EpollFlags::EPOLLIN, STOP_TOKEN),
    )?;

    let mut events = [EpollEvent::empty(); 2];
    let mut stop_requested = false;
    while !stop_requested {
        let ready = match epoll.wait(&mut events, EpollTimeout::NONE) {
            Ok(ready) => ready,
            Err(nix::errno::Errno::EINTR) => continue,
            Err(error) => return Err(error.into()),
        };
        for event in events.iter().take(ready) {
            match event.data() {
                FLUSH_TOKEN => {
                    flush_signal.drain()?;
                    if !buffer.flush() {
                        // Writer still busy; the next append above the
                        // threshold re-signals.
                        debug!("flush skipped, writer busy");
                    }
                }
                STOP_TOKEN => {
                    stop_signal.drain()?;
                    stop_requested = true;
                }
                _ => {}
            }
        }
        // Completion stage of any writes queued by the flush above.
        writer.lock().process_pending();
    }
    Ok(())
}
