// src/transport/http.rs

//! A plain HTTP/1.0 GET exchange over a non-blocking `mio` TCP socket.
//!
//! HTTP/1.0 with `Connection: close` keeps the response framing to
//! `Content-Length` or end-of-stream; there is no chunked decoding, TLS,
//! redirect following or connection reuse.
//!
//! Host names are resolved on a short-lived helper thread. The exchange has
//! no socket meanwhile and checks for the answer each time the engine timer
//! fires, with a zero-delay deadline.

use crate::error::{ProtocolError, TransportError};
use crate::socket::Interest;
use crate::transfer::{Connector, Exchange, ExchangeCx, OpenError, Progress, Step, TransferSpec, TransferStatus};
use crate::transport::endpoint::{parse_target, Target};

use bytes::BytesMut;
use mio::net::TcpStream;

use std::io::{self, Read, Write};
use std::net::{IpAddr, Shutdown, SocketAddr, ToSocketAddrs};
use std::os::unix::io::{AsRawFd, RawFd};
use std::time::{Duration, Instant};

/// Upper bound on the size of a response head.
const MAX_HEAD_BYTES: usize = 64 * 1024;
const READ_CHUNK: usize = 16 * 1024;

/// Settings shared by every exchange a [`HttpConnector`] opens.
#[derive(Debug, Clone)]
pub struct HttpOptions {
  /// Time allowed for name resolution plus TCP connection setup.
  pub connect_timeout: Duration,
  /// Time allowed without any bytes moving once connected.
  pub stall_timeout: Duration,
  pub user_agent: String,
  pub tcp_nodelay: bool,
}

impl Default for HttpOptions {
  fn default() -> Self {
    Self {
      connect_timeout: Duration::from_secs(30),
      stall_timeout: Duration::from_secs(60),
      user_agent: concat!("rmulti/", env!("CARGO_PKG_VERSION")).to_string(),
      tcp_nodelay: true,
    }
  }
}

/// Opens [`HttpExchange`]s for `http://` targets.
#[derive(Debug, Clone, Default)]
pub struct HttpConnector {
  options: HttpOptions,
}

impl HttpConnector {
  pub fn new(options: HttpOptions) -> Self {
    Self { options }
  }

  pub fn options(&self) -> &HttpOptions {
    &self.options
  }
}

impl Connector for HttpConnector {
  fn open(&mut self, spec: &TransferSpec<'_>) -> Result<Box<dyn Exchange>, OpenError> {
    let target = parse_target(spec.target).map_err(OpenError::Rejected)?;
    let mut options = self.options.clone();
    if let Some(stall) = spec.stall_timeout {
      options.stall_timeout = stall;
    }
    Ok(Box::new(HttpExchange::new(spec.target.to_string(), target, options)))
  }
}

type ResolveResult = io::Result<Vec<SocketAddr>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
  Idle,
  Resolving,
  Connecting,
  Sending,
  Receiving,
  Done,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct ResponseHead {
  status: u16,
  content_length: Option<u64>,
}

/// One GET request/response over its own TCP connection.
pub struct HttpExchange {
  url: String,
  target: Target,
  options: HttpOptions,
  stream: Option<TcpStream>,
  resolver: Option<async_channel::Receiver<ResolveResult>>,
  state: State,
  /// Resolution and TCP setup together must finish by this instant.
  connect_deadline: Option<Instant>,
  request: Vec<u8>,
  written: usize,
  head: BytesMut,
  response: Option<ResponseHead>,
  received: u64,
  deadline: Option<Instant>,
}

type Outcome<T> = Result<T, TransferStatus>;

impl HttpExchange {
  fn new(url: String, target: Target, options: HttpOptions) -> Self {
    let request = format!(
      "GET {} HTTP/1.0\r\nHost: {}\r\nUser-Agent: {}\r\nAccept: */*\r\nConnection: close\r\n\r\n",
      target.request_path, target.authority, options.user_agent
    )
    .into_bytes();
    Self {
      url,
      target,
      options,
      stream: None,
      resolver: None,
      state: State::Idle,
      connect_deadline: None,
      request,
      written: 0,
      head: BytesMut::with_capacity(1024),
      response: None,
      received: 0,
      deadline: None,
    }
  }

  fn transport(&self, e: &io::Error) -> TransferStatus {
    TransferStatus::TransportFailure(TransportError::from_io(e, &self.url))
  }

  fn touch(&mut self, now: Instant) {
    self.deadline = Some(now + self.options.stall_timeout);
  }

  fn resolve_failure(&self, reason: impl std::fmt::Display) -> TransferStatus {
    TransferStatus::TransportFailure(TransportError::Resolve(format!("{}: {}", self.target.host, reason)))
  }

  fn begin(&mut self, now: Instant) -> Outcome<()> {
    self.connect_deadline = Some(now + self.options.connect_timeout);
    if let Ok(ip) = self.target.host.parse::<IpAddr>() {
      return self.connect(SocketAddr::new(ip, self.target.port));
    }

    let (tx, rx) = async_channel::bounded::<ResolveResult>(1);
    let host = self.target.host.clone();
    let port = self.target.port;
    std::thread::Builder::new()
      .name("rmulti-resolve".into())
      .spawn(move || {
        let result = (host.as_str(), port).to_socket_addrs().map(|addrs| addrs.collect());
        // The exchange may be gone already.
        let _ = tx.try_send(result);
      })
      .map_err(|e| self.resolve_failure(e))?;
    tracing::trace!(url = %self.url, host = %self.target.host, "Resolving");
    self.resolver = Some(rx);
    self.state = State::Resolving;
    self.deadline = Some(now);
    Ok(())
  }

  fn poll_resolver(&mut self, now: Instant) -> Outcome<()> {
    let Some(resolver) = self.resolver.as_ref() else {
      return Ok(());
    };
    match resolver.try_recv() {
      Ok(Ok(addrs)) => {
        self.resolver = None;
        let addr = addrs.into_iter().next().ok_or_else(|| self.resolve_failure("no addresses"))?;
        self.connect(addr)
      }
      Ok(Err(e)) => {
        self.resolver = None;
        Err(self.resolve_failure(e))
      }
      Err(async_channel::TryRecvError::Empty) => {
        if self.connect_deadline.map_or(false, |d| now >= d) {
          tracing::debug!(url = %self.url, "Name resolution timed out");
          return Err(TransferStatus::TransportFailure(TransportError::TimedOut));
        }
        self.deadline = Some(now);
        Ok(())
      }
      Err(async_channel::TryRecvError::Closed) => Err(self.resolve_failure("resolver exited")),
    }
  }

  fn connect(&mut self, addr: SocketAddr) -> Outcome<()> {
    let stream = TcpStream::connect(addr).map_err(|e| self.transport(&e))?;
    if self.options.tcp_nodelay {
      if let Err(e) = stream.set_nodelay(true) {
        tracing::trace!(url = %self.url, error = %e, "Setting TCP_NODELAY failed");
      }
    }
    tracing::trace!(url = %self.url, %addr, fd = stream.as_raw_fd(), "Connecting");
    self.stream = Some(stream);
    self.state = State::Connecting;
    self.deadline = self.connect_deadline;
    Ok(())
  }

  fn check_connected(&mut self) -> Outcome<bool> {
    let Some(stream) = self.stream.as_ref() else {
      return Ok(false);
    };
    match stream.take_error() {
      Ok(Some(e)) | Err(e) => return Err(self.transport(&e)),
      Ok(None) => {}
    }
    match stream.peer_addr() {
      Ok(_) => Ok(true),
      Err(e) if e.kind() == io::ErrorKind::NotConnected || e.kind() == io::ErrorKind::WouldBlock => Ok(false),
      Err(e) => Err(self.transport(&e)),
    }
  }

  /// Writes as much of the request as the socket takes. `Ok(true)` once all of it is out.
  fn flush_request(&mut self, now: Instant) -> Outcome<bool> {
    while self.written < self.request.len() {
      let Some(stream) = self.stream.as_mut() else {
        return Ok(false);
      };
      match stream.write(&self.request[self.written..]) {
        Ok(0) => return Err(TransferStatus::TransportFailure(TransportError::ConnectionClosed)),
        Ok(n) => {
          self.written += n;
          self.touch(now);
        }
        Err(e) if e.kind() == io::ErrorKind::WouldBlock => return Ok(false),
        Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
        Err(e) => return Err(self.transport(&e)),
      }
    }
    Ok(true)
  }

  fn read_response(&mut self, cx: &mut ExchangeCx<'_>) -> Outcome<bool> {
    let mut buf = [0u8; READ_CHUNK];
    loop {
      let Some(stream) = self.stream.as_mut() else {
        return Ok(false);
      };
      match stream.read(&mut buf) {
        Ok(0) => return self.on_eof().map(|_| true),
        Ok(n) => {
          self.touch(cx.now);
          if self.consume(&buf[..n], cx)? {
            return Ok(true);
          }
        }
        Err(e) if e.kind() == io::ErrorKind::WouldBlock => return Ok(false),
        Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
        Err(e) => return Err(self.transport(&e)),
      }
    }
  }

  /// Feeds received bytes. `Ok(true)` once the announced body is complete.
  fn consume(&mut self, data: &[u8], cx: &mut ExchangeCx<'_>) -> Outcome<bool> {
    if self.response.is_some() {
      return self.write_body(data, cx);
    }
    self.head.extend_from_slice(data);
    let Some(end) = find_head_end(&self.head) else {
      if self.head.len() > MAX_HEAD_BYTES {
        return Err(TransferStatus::ProtocolFailure(ProtocolError::Malformed(
          "response head too large".into(),
        )));
      }
      return Ok(false);
    };
    let head = self.head.split_to(end + 4);
    let response = parse_head(&head).map_err(TransferStatus::ProtocolFailure)?;
    tracing::trace!(url = %self.url, status = response.status, content_length = ?response.content_length, "Response head");
    self.response = Some(response);
    let body = self.head.split();
    self.write_body(&body, cx)
  }

  fn write_body(&mut self, body: &[u8], cx: &mut ExchangeCx<'_>) -> Outcome<bool> {
    if !body.is_empty() {
      cx.sink
        .write_all(body)
        .map_err(|e| TransferStatus::TransportFailure(TransportError::Sink(e.to_string())))?;
      self.received += body.len() as u64;
    }
    Ok(matches!(
      self.response,
      Some(ResponseHead { content_length: Some(len), .. }) if self.received >= len
    ))
  }

  fn on_eof(&mut self) -> Outcome<()> {
    match self.response {
      None if self.head.is_empty() => Err(TransferStatus::TransportFailure(TransportError::ConnectionClosed)),
      None => Err(TransferStatus::ProtocolFailure(ProtocolError::Malformed(
        "connection closed inside response head".into(),
      ))),
      Some(ResponseHead {
        content_length: Some(len),
        ..
      }) if self.received < len => Err(TransferStatus::TransportFailure(TransportError::ConnectionClosed)),
      Some(_) => Ok(()),
    }
  }

  fn final_status(&self) -> TransferStatus {
    match self.response {
      Some(ResponseHead { status, .. }) if status < 400 => TransferStatus::Success,
      Some(ResponseHead { status, .. }) => TransferStatus::ProtocolFailure(ProtocolError::Status(status)),
      None => TransferStatus::ProtocolFailure(ProtocolError::Malformed("no response".into())),
    }
  }

  fn advance(&mut self, cx: &mut ExchangeCx<'_>) -> Outcome<bool> {
    loop {
      match self.state {
        State::Connecting => {
          if !self.check_connected()? {
            return Ok(false);
          }
          tracing::trace!(url = %self.url, "Connected");
          self.state = State::Sending;
          self.touch(cx.now);
        }
        State::Sending => {
          if !self.flush_request(cx.now)? {
            return Ok(false);
          }
          self.state = State::Receiving;
          self.touch(cx.now);
        }
        State::Receiving => return self.read_response(cx),
        State::Idle | State::Resolving | State::Done => return Ok(false),
      }
    }
  }

  fn settle(&mut self, outcome: Outcome<bool>) -> Step {
    let status = match outcome {
      Ok(false) => return Step::Pending,
      Ok(true) => self.final_status(),
      Err(status) => status,
    };
    self.state = State::Done;
    self.deadline = None;
    Step::Finished(status)
  }
}

impl Exchange for HttpExchange {
  fn start(&mut self, cx: &mut ExchangeCx<'_>) -> Step {
    let outcome = self.begin(cx.now).map(|_| false);
    self.settle(outcome)
  }

  fn on_ready(&mut self, _ready: Interest, cx: &mut ExchangeCx<'_>) -> Step {
    let outcome = self.advance(cx);
    self.settle(outcome)
  }

  fn on_timeout(&mut self, cx: &mut ExchangeCx<'_>) -> Step {
    if self.state == State::Resolving {
      let outcome = self.poll_resolver(cx.now).map(|_| false);
      return self.settle(outcome);
    }
    match self.deadline {
      Some(deadline) if cx.now >= deadline => {
        tracing::debug!(url = %self.url, state = ?self.state, "Exchange stalled");
        self.settle(Err(TransferStatus::TransportFailure(TransportError::TimedOut)))
      }
      _ => Step::Pending,
    }
  }

  fn socket(&self) -> Option<RawFd> {
    self.stream.as_ref().map(|s| s.as_raw_fd())
  }

  fn interest(&self) -> Interest {
    match self.state {
      State::Connecting | State::Sending => Interest::WRITE,
      State::Receiving => Interest::READ,
      State::Idle | State::Resolving | State::Done => Interest::empty(),
    }
  }

  fn deadline(&self) -> Option<Instant> {
    self.deadline
  }

  fn is_connected(&self) -> bool {
    matches!(self.state, State::Sending | State::Receiving)
      || (self.state == State::Done && self.written > 0)
  }

  fn progress(&self) -> Progress {
    Progress {
      downloaded: self.received,
      total: self.response.and_then(|r| r.content_length),
      uploaded: self.written as u64,
    }
  }

  fn abort(&mut self) {
    self.resolver = None;
    if let Some(stream) = self.stream.as_ref() {
      let _ = stream.shutdown(Shutdown::Both);
    }
    self.state = State::Done;
    self.deadline = None;
  }
}

fn find_head_end(buf: &[u8]) -> Option<usize> {
  buf.windows(4).position(|w| w == b"\r\n\r\n")
}

fn parse_head(head: &[u8]) -> Result<ResponseHead, ProtocolError> {
  let text = String::from_utf8_lossy(head);
  let mut lines = text.split("\r\n");
  let status_line = lines.next().unwrap_or_default();
  let mut parts = status_line.splitn(3, ' ');
  let version = parts.next().unwrap_or_default();
  if !version.starts_with("HTTP/1.") {
    return Err(ProtocolError::Malformed(format!("bad status line: {:?}", status_line)));
  }
  let status = parts
    .next()
    .and_then(|code| code.parse::<u16>().ok())
    .filter(|code| (100..=999).contains(code))
    .ok_or_else(|| ProtocolError::Malformed(format!("bad status code: {:?}", status_line)))?;

  let mut content_length = None;
  for line in lines {
    let Some((name, value)) = line.split_once(':') else {
      continue;
    };
    if name.trim().eq_ignore_ascii_case("content-length") {
      let len = value
        .trim()
        .parse::<u64>()
        .map_err(|_| ProtocolError::Malformed(format!("bad content-length: {:?}", value.trim())))?;
      content_length = Some(len);
    }
  }
  Ok(ResponseHead { status, content_length })
}
