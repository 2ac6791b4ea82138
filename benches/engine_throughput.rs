// benches/engine_throughput.rs

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use rmulti::{
  Connector, Exchange, ExchangeCx, Interest, Multi, MultiOptions, OpenError, QueuedReactor, Step, TransferRequest,
  TransferSpec, TransferStatus,
};
use std::io;
use std::os::unix::io::RawFd;
use std::time::Instant;

// --- Benchmarking Constants ---
const TRANSFER_COUNTS: [usize; 3] = [16, 256, 4096];
const FD_BASE: RawFd = 1000;

/// Connects on WRITE, then finishes on READ. Target is the fake descriptor.
struct BenchExchange {
  fd: RawFd,
  connected: bool,
  done: bool,
}

impl Exchange for BenchExchange {
  fn start(&mut self, _cx: &mut ExchangeCx<'_>) -> Step {
    Step::Pending
  }

  fn on_ready(&mut self, ready: Interest, _cx: &mut ExchangeCx<'_>) -> Step {
    if !self.connected && ready.contains(Interest::WRITE) {
      self.connected = true;
      return Step::Pending;
    }
    if self.connected && ready.contains(Interest::READ) {
      self.done = true;
      return Step::Finished(TransferStatus::Success);
    }
    Step::Pending
  }

  fn on_timeout(&mut self, _cx: &mut ExchangeCx<'_>) -> Step {
    Step::Pending
  }

  fn socket(&self) -> Option<RawFd> {
    (!self.done).then_some(self.fd)
  }

  fn interest(&self) -> Interest {
    if self.connected {
      Interest::READ
    } else {
      Interest::WRITE
    }
  }

  fn deadline(&self) -> Option<Instant> {
    None
  }

  fn is_connected(&self) -> bool {
    self.connected
  }
}

struct BenchConnector;

impl Connector for BenchConnector {
  fn open(&mut self, spec: &TransferSpec<'_>) -> Result<Box<dyn Exchange>, OpenError> {
    let fd = spec.target.parse::<RawFd>().unwrap_or(FD_BASE);
    Ok(Box::new(BenchExchange {
      fd,
      connected: false,
      done: false,
    }))
  }
}

fn run_batch(count: usize) -> usize {
  let mut multi = Multi::new(QueuedReactor::new(), BenchConnector, MultiOptions::default());
  for i in 0..count {
    let fd = FD_BASE + i as RawFd;
    let _ = multi.add(TransferRequest::new(fd.to_string(), io::sink()));
  }
  for i in 0..count {
    let fd = FD_BASE + i as RawFd;
    multi.reactor().inject_readiness(fd, Interest::WRITE);
    multi.reactor().inject_readiness(fd, Interest::READ);
  }
  multi.step();
  let done = multi.poll_completions().filter(|c| c.status.is_success()).count();
  multi.reactor_mut().confirm_deregistered();
  multi.step();
  done
}

fn transfer_lifecycle_throughput(c: &mut Criterion) {
  let mut group = c.benchmark_group("TransferLifecycle");
  for count in TRANSFER_COUNTS.iter() {
    group.throughput(Throughput::Elements(*count as u64));
    let bench_id = BenchmarkId::new("add_ready_drain_release", count);
    group.bench_with_input(bench_id, count, |b, &n| {
      b.iter(|| {
        let done = run_batch(black_box(n));
        assert_eq!(done, n);
      });
    });
  }
  group.finish();
}

criterion_group!(benches, transfer_lifecycle_throughput);
criterion_main!(benches);
