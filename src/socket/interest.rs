use bitflags::bitflags;

bitflags! {
    /// Readiness directions a transfer wants notification for on its socket.
    ///
    /// The empty mask means "no interest" and requests removal of the
    /// reactor registration.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct Interest: u8 {
        /// Notify when the descriptor is readable.
        const READ = 0b01;
        /// Notify when the descriptor is writable.
        const WRITE = 0b10;
    }
}

impl Interest {
  /// Short label for log fields.
  pub fn as_str(self) -> &'static str {
    match (self.contains(Interest::READ), self.contains(Interest::WRITE)) {
      (false, false) => "none",
      (true, false) => "read",
      (false, true) => "write",
      (true, true) => "both",
    }
  }
}
