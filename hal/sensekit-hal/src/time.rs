//! Time sources
//!
//! Millisecond resolution is enough for every timeout in the drivers.
//! Blocking delays use `embedded_hal::delay::DelayNs` directly; this
//! module only covers reading the current time.

/// Monotonic millisecond clock
pub trait Clock {
    /// Milliseconds since an arbitrary, fixed origin
    ///
    /// Must never go backwards.
    fn now_ms(&self) -> u64;

    /// Deadline `timeout_ms` from now
    fn deadline(&self, timeout_ms: u32) -> u64 {
        self.now_ms().saturating_add(timeout_ms as u64)
    }

    /// Whether `deadline` has passed
    fn expired(&self, deadline: u64) -> bool {
        self.now_ms() >= deadline
    }
}

impl<T: Clock + ?Sized> Clock for &T {
    fn now_ms(&self) -> u64 {
        (**self).now_ms()
    }
}
