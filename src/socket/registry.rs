// src/socket/registry.rs

use crate::error::MultiError;
use crate::reactor::{Reactor, Token};
use crate::socket::context::{ContextState, SocketContext};
use crate::socket::Interest;
use crate::transfer::TransferHandle;

use std::collections::HashMap;
use std::os::unix::io::RawFd;

/// Outcome of a single [`SocketRegistry::reconcile`] call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reconciled {
  /// A new reactor registration was made.
  Registered(Token),
  /// The registered directions changed.
  Updated,
  /// Deregistration was requested; the context waits for confirmation.
  Retired,
  /// Nothing to do.
  Unchanged,
}

/// Owns one [`SocketContext`] per descriptor the engine has asked the
/// reactor to watch.
///
/// Teardown is two-phase: an empty mask retires the context and asks the
/// reactor to stop watching, and only the reactor's confirmation releases it.
#[derive(Debug, Default)]
pub struct SocketRegistry {
  contexts: HashMap<RawFd, SocketContext>,
}

impl SocketRegistry {
  pub fn new() -> Self {
    Self::default()
  }

  /// Brings the reactor registration of `fd` in line with `desired`.
  ///
  /// On error the registry is left consistent with what the reactor accepted:
  /// a failed register creates no context, a failed update keeps the previous
  /// mask, and a failed deregister releases the context (no confirmation will
  /// ever arrive for it).
  pub fn reconcile<R: Reactor + ?Sized>(
    &mut self,
    reactor: &mut R,
    fd: RawFd,
    owner: TransferHandle,
    desired: Interest,
  ) -> Result<Reconciled, MultiError> {
    let Some(ctx) = self.contexts.get_mut(&fd) else {
      if desired.is_empty() {
        return Ok(Reconciled::Unchanged);
      }
      let token = reactor
        .register(fd, desired)
        .map_err(|e| MultiError::registration(fd, "register", e))?;
      tracing::debug!(fd, %token, %owner, interest = desired.as_str(), "Socket context created");
      self.contexts.insert(fd, SocketContext::new(fd, owner, token, desired));
      return Ok(Reconciled::Registered(token));
    };

    match ctx.state() {
      ContextState::Active { interest, .. } if interest == desired => Ok(Reconciled::Unchanged),
      ContextState::Active { token, .. } if desired.is_empty() => match reactor.deregister(token) {
        Ok(()) => {
          ctx.retire();
          tracing::debug!(fd, %token, "Socket context retired, awaiting reactor confirmation");
          Ok(Reconciled::Retired)
        }
        Err(e) => {
          tracing::error!(fd, %token, error = %e, "Reactor rejected deregistration, releasing context");
          self.contexts.remove(&fd);
          Err(MultiError::registration(fd, "deregister", e))
        }
      },
      ContextState::Active { token, interest } => {
        reactor
          .update(token, desired)
          .map_err(|e| MultiError::registration(fd, "update", e))?;
        ctx.set_interest(desired);
        tracing::trace!(fd, %token, from = interest.as_str(), to = desired.as_str(), "Socket interest updated");
        Ok(Reconciled::Updated)
      }
      ContextState::Retired { .. } if desired.is_empty() => Ok(Reconciled::Unchanged),
      ContextState::Retired { token: old } => {
        // Descriptor number reused before the old teardown was confirmed.
        let token = reactor
          .register(fd, desired)
          .map_err(|e| MultiError::registration(fd, "register", e))?;
        ctx.reactivate(owner, token, desired);
        tracing::debug!(fd, %token, superseded = %old, %owner, "Retired socket context reactivated");
        Ok(Reconciled::Registered(token))
      }
    }
  }

  /// Reactor confirmation that `token` no longer watches `fd`.
  ///
  /// Returns the released context, or `None` when nothing was released
  /// (unknown descriptor, superseded token, or a token that is still live).
  pub fn on_deregistered(&mut self, fd: RawFd, token: Token) -> Option<SocketContext> {
    let Some(ctx) = self.contexts.get_mut(&fd) else {
      tracing::trace!(fd, %token, "Teardown confirmation for unknown descriptor ignored");
      return None;
    };
    if ctx.clear_superseded(token) {
      tracing::trace!(fd, %token, "Superseded registration confirmed removed");
      return None;
    }
    match ctx.state() {
      ContextState::Retired { token: retired } if retired == token => {
        if ctx.has_superseded() {
          tracing::trace!(fd, %token, "Releasing context with older teardowns still unconfirmed");
        }
        let released = self.contexts.remove(&fd);
        tracing::debug!(fd, %token, "Socket context released");
        released
      }
      state => {
        tracing::warn!(fd, %token, ?state, "Teardown confirmation does not match context state, ignored");
        None
      }
    }
  }

  /// Looks up the context for an incoming readiness event.
  pub fn resolve(&self, fd: RawFd) -> Option<&SocketContext> {
    self.contexts.get(&fd)
  }

  /// Number of contexts not yet released (active and retired).
  pub fn len(&self) -> usize {
    self.contexts.len()
  }

  pub fn is_empty(&self) -> bool {
    self.contexts.is_empty()
  }

  pub fn retired_count(&self) -> usize {
    self.contexts.values().filter(|c| !c.is_active()).count()
  }
}
