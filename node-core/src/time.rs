//! Millisecond time base and the bounded wait primitives built on it.
//!
//! Every blocking loop in the node is a spin loop. Protocol exchanges are
//! bounded by a tick deadline through [`wait_until`]; hardware ready bits are
//! bounded by an iteration ceiling through [`spin_until`]. Keeping both in one
//! place gives every call site the same timeout semantics.

use core::fmt;

/// Source of the free-running millisecond tick.
///
/// The counter wraps at `u32::MAX`; all comparisons go through wrapping
/// subtraction so a wrap in the middle of a wait is harmless.
pub trait Monotonic {
    /// Current tick count in milliseconds.
    fn now_ms(&self) -> u32;

    /// Blocks for at least `ms` whole ticks.
    fn delay_ms(&self, ms: u32) {
        let deadline = Deadline::after(self.now_ms(), ms.saturating_add(1));
        while !deadline.expired(self.now_ms()) {
            core::hint::spin_loop();
        }
    }
}

impl<C> Monotonic for &C
where
    C: Monotonic + ?Sized,
{
    fn now_ms(&self) -> u32 {
        (**self).now_ms()
    }
}

/// A start tick paired with a budget.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct Deadline {
    start_ms: u32,
    budget_ms: u32,
}

impl Deadline {
    #[must_use]
    pub const fn after(start_ms: u32, budget_ms: u32) -> Self {
        Self {
            start_ms,
            budget_ms,
        }
    }

    /// Milliseconds elapsed between the start tick and `now_ms`.
    #[must_use]
    pub const fn elapsed(&self, now_ms: u32) -> u32 {
        now_ms.wrapping_sub(self.start_ms)
    }

    /// Returns `true` once `now - start >= budget`.
    #[must_use]
    pub const fn expired(&self, now_ms: u32) -> bool {
        self.elapsed(now_ms) >= self.budget_ms
    }

    #[must_use]
    pub const fn budget_ms(&self) -> u32 {
        self.budget_ms
    }
}

/// Returned when a tick-bounded wait ran out of budget.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct WaitTimeout {
    pub elapsed_ms: u32,
}

impl fmt::Display for WaitTimeout {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "timed out after {} ms", self.elapsed_ms)
    }
}

/// Polls `poll` until it yields a value or `timeout_ms` ticks have passed.
///
/// The poll runs before each deadline check, so a result that is already
/// available when the budget runs out still wins.
///
/// # Errors
///
/// Returns [`WaitTimeout`] when the deadline expires without a result.
pub fn wait_until<C, T, F>(clock: &C, timeout_ms: u32, mut poll: F) -> Result<T, WaitTimeout>
where
    C: Monotonic + ?Sized,
    F: FnMut() -> Option<T>,
{
    let deadline = Deadline::after(clock.now_ms(), timeout_ms);
    loop {
        if let Some(value) = poll() {
            return Ok(value);
        }

        let now = clock.now_ms();
        if deadline.expired(now) {
            return Err(WaitTimeout {
                elapsed_ms: deadline.elapsed(now),
            });
        }

        core::hint::spin_loop();
    }
}

/// Spins until `ready` reports `true`, giving up after `limit` checks.
///
/// Used for hardware status bits that are waited on before the tick is
/// trustworthy. Returns `false` when the ceiling was reached.
pub fn spin_until<F>(limit: u32, mut ready: F) -> bool
where
    F: FnMut() -> bool,
{
    for _ in 0..limit {
        if ready() {
            return true;
        }
        core::hint::spin_loop();
    }
    false
}
