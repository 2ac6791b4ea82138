use crate::cli::GetArgs;

use std::{
  collections::HashMap,
  fs::{self, File},
  io::{self, BufWriter, Write},
  path::{Path, PathBuf},
  sync::Arc,
  time::Duration,
};

use anyhow::{bail, Context as AnyhowContext, Result};
use parking_lot::Mutex;
use rmulti::{HttpOptions, MultiOptions, TransferEvent, TransferHandle, TransferRequest};

const TURN_WAIT: Duration = Duration::from_millis(100);

/// Holds one transfer's body in memory until it completes, so concurrent
/// bodies reach stdout whole and one after another.
#[derive(Debug, Clone, Default)]
struct BufferedBody(Arc<Mutex<Vec<u8>>>);

impl BufferedBody {
  fn take(&self) -> Vec<u8> {
    std::mem::take(&mut *self.0.lock())
  }
}

impl Write for BufferedBody {
  fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
    self.0.lock().extend_from_slice(buf);
    Ok(buf.len())
  }

  fn flush(&mut self) -> io::Result<()> {
    Ok(())
  }
}

/// Writes a finished body to `out` in one piece.
fn emit_body(out: &mut impl Write, body: &BufferedBody) -> io::Result<()> {
  out.write_all(&body.take())?;
  out.flush()
}

/// Fetches every URL on one engine and reports each outcome on stderr.
pub fn fetch(args: GetArgs) -> Result<()> {
  let mut options = MultiOptions::default();
  if let Some(max) = args.max_active {
    options = options.with_max_active(max);
  }
  let http = HttpOptions {
    connect_timeout: Duration::from_millis(args.connect_timeout_ms),
    stall_timeout: Duration::from_millis(args.stall_timeout_ms),
    ..HttpOptions::default()
  };
  let mut multi = rmulti::http_multi(options, http).context("Failed to create transfer engine")?;
  let monitor = args.progress.then(|| multi.monitor());

  if let Some(dir) = &args.output_dir {
    fs::create_dir_all(dir).with_context(|| format!("Failed to create output directory {}", dir.display()))?;
  }

  let mut urls: HashMap<TransferHandle, String> = HashMap::new();
  let mut buffered: HashMap<TransferHandle, BufferedBody> = HashMap::new();
  for (index, url) in args.urls.iter().enumerate() {
    let mut body = None;
    let sink: Box<dyn Write + Send> = match &args.output_dir {
      Some(dir) => {
        let path = output_path(dir, index, url);
        let file = File::create(&path).with_context(|| format!("Failed to create {}", path.display()))?;
        Box::new(BufWriter::new(file))
      }
      None => {
        let buffer = BufferedBody::default();
        body = Some(buffer.clone());
        Box::new(buffer)
      }
    };
    let handle = multi
      .add(TransferRequest::new(url.as_str(), sink))
      .with_context(|| format!("Cannot fetch {}", url))?;
    urls.insert(handle, url.clone());
    if let Some(body) = body {
      buffered.insert(handle, body);
    }
  }

  let mut failed = 0usize;
  let mut remaining = urls.len();
  while remaining > 0 {
    multi.run_once(Some(TURN_WAIT))?;

    if let Some(monitor) = &monitor {
      while let Ok(event) = monitor.try_recv() {
        if let TransferEvent::Progress { progress, .. } = event {
          match progress.total {
            Some(total) => eprintln!("total {}, now {}", total, progress.downloaded),
            None => eprintln!("total ?, now {}", progress.downloaded),
          }
        }
      }
    }

    for completion in multi.poll_completions() {
      remaining -= 1;
      let url = urls.get(&completion.handle).map(String::as_str).unwrap_or("?");
      if let Some(body) = buffered.remove(&completion.handle) {
        emit_body(&mut io::stdout().lock(), &body).context("Failed to write body to stdout")?;
      }
      if completion.status.is_success() {
        eprintln!(
          "{} -> {} ({} bytes in {:?})",
          url, completion.status, completion.metadata.progress.downloaded, completion.metadata.elapsed
        );
      } else {
        failed += 1;
        eprintln!("{} -> {}", url, completion.status);
      }
    }
  }

  multi.term().context("Transfer engine did not shut down cleanly")?;
  if failed > 0 {
    bail!("{} of {} transfers failed", failed, urls.len());
  }
  Ok(())
}

/// `<index>-<last path segment>`, or `<index>-index.html` for directory URLs.
fn output_path(dir: &Path, index: usize, url: &str) -> PathBuf {
  let name = url
    .split(['?', '#'])
    .next()
    .and_then(|u| u.rsplit('/').next())
    .filter(|segment| !segment.is_empty() && !segment.contains(':'))
    .unwrap_or("index.html");
  dir.join(format!("{}-{}", index, name))
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn output_names_follow_last_segment() {
    let dir = Path::new("/tmp/out");
    assert_eq!(output_path(dir, 0, "http://h/a/b.txt?x=1"), dir.join("0-b.txt"));
    assert_eq!(output_path(dir, 3, "http://h/a/"), dir.join("3-index.html"));
    assert_eq!(output_path(dir, 1, "http://h:80"), dir.join("1-index.html"));
  }

  #[test]
  fn interleaved_bodies_are_emitted_whole() {
    let mut first = BufferedBody::default();
    let mut second = BufferedBody::default();
    first.write_all(b"aaa").unwrap();
    second.write_all(b"111").unwrap();
    first.write_all(b"bbb").unwrap();
    second.write_all(b"222").unwrap();

    let mut out = Vec::new();
    emit_body(&mut out, &second).unwrap();
    emit_body(&mut out, &first).unwrap();
    assert_eq!(out, b"111222aaabbb");
    assert!(first.take().is_empty());
  }
}
