// tests/common.rs
#![allow(dead_code)] // Not every test binary uses every helper

use rmulti::{
  Connector, Exchange, ExchangeCx, Interest, Multi, MultiError, MultiOptions, OpenError, Progress, QueuedReactor,
  Step, TransferSpec, TransferStatus, TransportError,
};
use tracing_subscriber::fmt::format::FmtSpan;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use parking_lot::Mutex;

use std::io::{self, Write};
use std::os::unix::io::RawFd;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Once};
use std::time::{Duration, Instant};

// Use std::sync::Once for one-time initialization
static TRACING_INIT: Once = Once::new();

pub fn setup_tracing() {
  TRACING_INIT.call_once(|| {
    // Can be overridden by RUST_LOG env variable
    let default_filter = "rmulti=trace,info";
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));

    let subscriber = FmtSubscriber::builder()
      .with_max_level(tracing::Level::TRACE)
      .with_env_filter(env_filter)
      .with_target(true)
      .with_line_number(true)
      .with_span_events(FmtSpan::CLOSE)
      .with_test_writer()
      .finish();

    tracing::subscriber::set_global_default(subscriber).expect("Failed to set global tracing subscriber");
  });
}

/// Response body served by every scripted transfer.
pub const SCRIPTED_BODY: &[u8] = b"hello";

/// A body sink the test keeps a handle on.
#[derive(Debug, Clone, Default)]
pub struct SharedSink(Arc<Mutex<Vec<u8>>>);

impl SharedSink {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn contents(&self) -> Vec<u8> {
    self.0.lock().clone()
  }
}

impl Write for SharedSink {
  fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
    self.0.lock().extend_from_slice(buf);
    Ok(buf.len())
  }

  fn flush(&mut self) -> io::Result<()> {
    Ok(())
  }
}

/// Counters shared between a connector and the exchanges it opened.
#[derive(Debug, Default)]
pub struct ScriptStats {
  pub opened: AtomicUsize,
  pub aborted: AtomicUsize,
  pub dropped: AtomicUsize,
}

impl ScriptStats {
  pub fn aborted(&self) -> usize {
    self.aborted.load(Ordering::SeqCst)
  }

  pub fn dropped(&self) -> usize {
    self.dropped.load(Ordering::SeqCst)
  }
}

/// Opens exchanges whose behaviour is picked by the target string:
///
/// - `tcp:<fd>`: pretends to own socket `fd`. WRITE readiness connects, WRITE
///   again sends the request, READ receives [`SCRIPTED_BODY`] and succeeds.
///   Connection setup times out after the connector's connect timeout.
/// - `idle`: started but never acquires a socket or a deadline.
/// - `instant`: succeeds from `start` without a socket.
/// - `refused`: fails to open with `ConnectionRefused`.
/// - anything else is rejected as an invalid target.
#[derive(Debug, Clone)]
pub struct ScriptedConnector {
  connect_timeout: Duration,
  stats: Arc<ScriptStats>,
}

impl ScriptedConnector {
  pub fn new() -> Self {
    Self {
      connect_timeout: Duration::from_secs(30),
      stats: Arc::new(ScriptStats::default()),
    }
  }

  pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
    self.connect_timeout = timeout;
    self
  }

  pub fn stats(&self) -> Arc<ScriptStats> {
    self.stats.clone()
  }
}

impl Connector for ScriptedConnector {
  fn open(&mut self, spec: &TransferSpec<'_>) -> Result<Box<dyn Exchange>, OpenError> {
    let script = match spec.target {
      "idle" => Script::Idle,
      "instant" => Script::Instant,
      "refused" => {
        return Err(OpenError::Failed(TransportError::ConnectionRefused(spec.target.to_string())));
      }
      other => match other.strip_prefix("tcp:").and_then(|fd| fd.parse::<RawFd>().ok()) {
        Some(fd) => Script::Tcp(fd),
        None => return Err(OpenError::Rejected(MultiError::InvalidTarget(other.to_string()))),
      },
    };
    self.stats.opened.fetch_add(1, Ordering::SeqCst);
    Ok(Box::new(ScriptedExchange {
      script,
      state: ScriptState::Idle,
      connect_timeout: self.connect_timeout,
      deadline: None,
      progress: Progress::default(),
      stats: self.stats.clone(),
    }))
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Script {
  Tcp(RawFd),
  Idle,
  Instant,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ScriptState {
  Idle,
  Connecting,
  Sending,
  Receiving,
  Done,
}

pub struct ScriptedExchange {
  script: Script,
  state: ScriptState,
  connect_timeout: Duration,
  deadline: Option<Instant>,
  progress: Progress,
  stats: Arc<ScriptStats>,
}

impl Exchange for ScriptedExchange {
  fn start(&mut self, cx: &mut ExchangeCx<'_>) -> Step {
    match self.script {
      Script::Tcp(_) => {
        self.state = ScriptState::Connecting;
        self.deadline = Some(cx.now + self.connect_timeout);
        Step::Pending
      }
      Script::Idle => Step::Pending,
      Script::Instant => {
        self.state = ScriptState::Done;
        Step::Finished(TransferStatus::Success)
      }
    }
  }

  fn on_ready(&mut self, ready: Interest, cx: &mut ExchangeCx<'_>) -> Step {
    match self.state {
      ScriptState::Connecting if ready.contains(Interest::WRITE) => {
        self.state = ScriptState::Sending;
        self.deadline = None;
      }
      ScriptState::Sending if ready.contains(Interest::WRITE) => {
        self.state = ScriptState::Receiving;
        self.progress.uploaded = 32;
      }
      ScriptState::Receiving if ready.contains(Interest::READ) => {
        if let Err(e) = cx.sink.write_all(SCRIPTED_BODY) {
          return Step::Finished(TransferStatus::TransportFailure(TransportError::Sink(e.to_string())));
        }
        self.progress.downloaded = SCRIPTED_BODY.len() as u64;
        self.progress.total = Some(SCRIPTED_BODY.len() as u64);
        self.state = ScriptState::Done;
        return Step::Finished(TransferStatus::Success);
      }
      _ => {}
    }
    Step::Pending
  }

  fn on_timeout(&mut self, cx: &mut ExchangeCx<'_>) -> Step {
    match self.deadline {
      Some(deadline) if cx.now >= deadline => {
        self.state = ScriptState::Done;
        Step::Finished(TransferStatus::TransportFailure(TransportError::TimedOut))
      }
      _ => Step::Pending,
    }
  }

  fn socket(&self) -> Option<RawFd> {
    match (self.script, self.state) {
      (Script::Tcp(fd), ScriptState::Connecting | ScriptState::Sending | ScriptState::Receiving) => Some(fd),
      _ => None,
    }
  }

  fn interest(&self) -> Interest {
    match self.state {
      ScriptState::Connecting | ScriptState::Sending => Interest::WRITE,
      ScriptState::Receiving => Interest::READ,
      ScriptState::Idle | ScriptState::Done => Interest::empty(),
    }
  }

  fn deadline(&self) -> Option<Instant> {
    self.deadline
  }

  fn is_connected(&self) -> bool {
    matches!(self.state, ScriptState::Sending | ScriptState::Receiving)
  }

  fn progress(&self) -> Progress {
    self.progress
  }

  fn abort(&mut self) {
    self.stats.aborted.fetch_add(1, Ordering::SeqCst);
  }
}

impl Drop for ScriptedExchange {
  fn drop(&mut self) {
    self.stats.dropped.fetch_add(1, Ordering::SeqCst);
  }
}

pub type TestMulti = Multi<QueuedReactor, ScriptedConnector>;

// Helper to create an engine on a recording reactor
pub fn test_multi(connector: ScriptedConnector) -> TestMulti {
  test_multi_with(QueuedReactor::new(), connector, MultiOptions::default())
}

pub fn test_multi_with(reactor: QueuedReactor, connector: ScriptedConnector, options: MultiOptions) -> TestMulti {
  setup_tracing();
  Multi::new(reactor, connector, options)
}

/// Feeds the three readiness events that carry a `tcp:<fd>` transfer to success.
pub fn drive_to_success(multi: &mut TestMulti, fd: RawFd) {
  multi.notify_readiness(fd, Interest::WRITE);
  multi.notify_readiness(fd, Interest::WRITE);
  multi.notify_readiness(fd, Interest::READ);
}
