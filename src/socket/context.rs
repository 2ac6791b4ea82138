// src/socket/context.rs

use crate::reactor::Token;
use crate::socket::Interest;
use crate::transfer::TransferHandle;

use std::os::unix::io::RawFd;

/// Registration state of a socket context.
///
/// A context only leaves the registry from `Retired`, and only once the
/// reactor has confirmed the teardown of that exact token.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContextState {
  /// Registered with the reactor for `interest` (never empty).
  Active { token: Token, interest: Interest },
  /// Deregistration requested, confirmation outstanding.
  Retired { token: Token },
}

/// One descriptor's reactor registration.
#[derive(Debug)]
pub struct SocketContext {
  fd: RawFd,
  owner: TransferHandle,
  state: ContextState,
  // Earlier registrations of this descriptor whose teardown is still unconfirmed.
  superseded: Vec<Token>,
}

impl SocketContext {
  pub(crate) fn new(fd: RawFd, owner: TransferHandle, token: Token, interest: Interest) -> Self {
    Self {
      fd,
      owner,
      state: ContextState::Active { token, interest },
      superseded: Vec::new(),
    }
  }

  pub fn fd(&self) -> RawFd {
    self.fd
  }

  /// The transfer readiness on this descriptor is dispatched to.
  pub fn owner(&self) -> TransferHandle {
    self.owner
  }

  pub fn state(&self) -> ContextState {
    self.state
  }

  pub fn is_active(&self) -> bool {
    matches!(self.state, ContextState::Active { .. })
  }

  /// Currently registered directions; empty once retired.
  pub fn interest(&self) -> Interest {
    match self.state {
      ContextState::Active { interest, .. } => interest,
      ContextState::Retired { .. } => Interest::empty(),
    }
  }

  pub(crate) fn set_interest(&mut self, interest: Interest) {
    if let ContextState::Active { token, .. } = self.state {
      self.state = ContextState::Active { token, interest };
    }
  }

  pub(crate) fn retire(&mut self) {
    if let ContextState::Active { token, .. } = self.state {
      self.state = ContextState::Retired { token };
    }
  }

  /// Re-activates a retired context for a new registration of the same descriptor.
  pub(crate) fn reactivate(&mut self, owner: TransferHandle, token: Token, interest: Interest) {
    if let ContextState::Retired { token: old } = self.state {
      self.superseded.push(old);
    }
    self.owner = owner;
    self.state = ContextState::Active { token, interest };
  }

  /// Clears a superseded token; returns whether it was one.
  pub(crate) fn clear_superseded(&mut self, token: Token) -> bool {
    match self.superseded.iter().position(|t| *t == token) {
      Some(idx) => {
        self.superseded.swap_remove(idx);
        true
      }
      None => false,
    }
  }

  pub(crate) fn has_superseded(&self) -> bool {
    !self.superseded.is_empty()
  }
}
