// src/transport/endpoint.rs

use crate::error::MultiError;

use url::Url;

/// A parsed and validated transfer target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Target {
  pub host: String,
  pub port: u16,
  /// Path plus query, always starting with `/`.
  pub request_path: String,
  /// Value for the `Host` header.
  pub authority: String,
}

/// Parses an `http://host[:port]/path` target.
///
/// Only plain `http` is supported; other schemes are rejected, not failed.
pub fn parse_target(target: &str) -> Result<Target, MultiError> {
  let url = Url::parse(target).map_err(|e| {
    tracing::debug!(url = target, error = %e, "Failed to parse target");
    MultiError::InvalidTarget(target.to_string())
  })?;

  if url.scheme() != "http" {
    return Err(MultiError::UnsupportedScheme(url.scheme().to_string()));
  }
  let host = url
    .host_str()
    .filter(|h| !h.is_empty())
    .ok_or_else(|| MultiError::InvalidTarget(target.to_string()))?;
  let port = url
    .port_or_known_default()
    .ok_or_else(|| MultiError::InvalidTarget(target.to_string()))?;

  let mut request_path = url.path().to_string();
  if request_path.is_empty() {
    request_path.push('/');
  }
  if let Some(query) = url.query() {
    request_path.push('?');
    request_path.push_str(query);
  }
  let authority = match url.port() {
    Some(p) => format!("{}:{}", host, p),
    None => host.to_string(),
  };

  Ok(Target {
    // IPv6 literals come back bracketed; resolution wants them bare.
    host: host.trim_start_matches('[').trim_end_matches(']').to_string(),
    port,
    request_path,
    authority,
  })
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn parses_host_port_and_path() {
    let t = parse_target("http://127.0.0.1:8080/a/b?x=1").unwrap();
    assert_eq!(t.host, "127.0.0.1");
    assert_eq!(t.port, 8080);
    assert_eq!(t.request_path, "/a/b?x=1");
    assert_eq!(t.authority, "127.0.0.1:8080");
  }

  #[test]
  fn default_port_and_root_path() {
    let t = parse_target("http://example.com").unwrap();
    assert_eq!(t.port, 80);
    assert_eq!(t.request_path, "/");
    assert_eq!(t.authority, "example.com");
  }

  #[test]
  fn rejects_other_schemes_and_garbage() {
    assert!(matches!(
      parse_target("https://example.com/"),
      Err(MultiError::UnsupportedScheme(s)) if s == "https"
    ));
    assert!(matches!(parse_target("not a url"), Err(MultiError::InvalidTarget(_))));
  }

  #[test]
  fn ipv6_literal_is_unbracketed() {
    let t = parse_target("http://[::1]:9000/").unwrap();
    assert_eq!(t.host, "::1");
    assert_eq!(t.authority, "[::1]:9000");
  }
}
