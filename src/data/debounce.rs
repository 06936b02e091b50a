use std::time::Duration;
use tokio::time::Instant;

/// Holds the latest value until `delay` has passed without a newer one.
///
/// Polled from the UI tick; nothing is spawned.
#[derive(Debug)]
pub struct Debouncer<T> {
  delay: Duration,
  pending: Option<(T, Instant)>,
}

impl<T> Debouncer<T> {
  pub fn new(delay: Duration) -> Self {
    Self {
      delay,
      pending: None,
    }
  }

  /// Replace the pending value and restart the delay.
  pub fn push(&mut self, value: T) {
    self.pending = Some((value, Instant::now() + self.delay));
  }

  pub fn pending(&self) -> Option<&T> {
    self.pending.as_ref().map(|(value, _)| value)
  }

  pub fn is_pending(&self) -> bool {
    self.pending.is_some()
  }

  /// Take the pending value once its delay has elapsed.
  pub fn take_ready(&mut self) -> Option<T> {
    match &self.pending {
      Some((_, deadline)) if Instant::now() >= *deadline => self.pending.take().map(|(v, _)| v),
      _ => None,
    }
  }

  pub fn cancel(&mut self) {
    self.pending = None;
  }
}
