//! Interrupt-fed receive ring shared between the UART ISR and the AT engine.
//!
//! Exactly one producer (the receive interrupt) appends bytes and publishes a
//! free-running write count. Exactly one consumer (the engine) never writes
//! producer state: "clearing" the buffer means taking a [`RxMark`] of the
//! current count, after which only bytes published past the mark are visible.

use heapless::Vec;
use portable_atomic::{AtomicU8, AtomicUsize, Ordering};

/// Default capacity of the modem receive ring.
pub const RX_CAPACITY: usize = 1024;

/// Position in the byte stream captured by the consumer.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct RxMark(usize);

/// Single-producer/single-consumer byte ring.
///
/// `N` must be a power of two so the free-running count maps onto the
/// storage without a discontinuity when it wraps.
pub struct RxRing<const N: usize = RX_CAPACITY> {
    cells: [AtomicU8; N],
    written: AtomicUsize,
}

impl<const N: usize> RxRing<N> {
    /// Creates an empty ring; usable in a `static`.
    #[must_use]
    pub const fn new() -> Self {
        const { assert!(N.is_power_of_two()) };
        Self {
            cells: [const { AtomicU8::new(0) }; N],
            written: AtomicUsize::new(0),
        }
    }

    /// Appends one byte. Producer side only.
    pub fn push(&self, byte: u8) {
        let count = self.written.load(Ordering::Relaxed);
        self.cells[count & (N - 1)].store(byte, Ordering::Relaxed);
        self.written.store(count.wrapping_add(1), Ordering::Release);
    }

    /// Appends a run of bytes. Producer side only.
    pub fn extend(&self, bytes: &[u8]) {
        for &byte in bytes {
            self.push(byte);
        }
    }

    /// Marks the current end of the stream; later reads start here.
    #[must_use]
    pub fn mark(&self) -> RxMark {
        RxMark(self.written.load(Ordering::Acquire))
    }

    /// Number of bytes published since `mark` that are still held in storage.
    #[must_use]
    pub fn available_since(&self, mark: RxMark) -> usize {
        let end = self.written.load(Ordering::Acquire);
        end.wrapping_sub(mark.0).min(N)
    }

    /// Copies the bytes published since `mark` into `out`, oldest first.
    ///
    /// If the producer lapped the ring only the newest `N` bytes survive. The
    /// copy stops when `out` is full. Returns the number of bytes copied.
    pub fn copy_since<const M: usize>(&self, mark: RxMark, out: &mut Vec<u8, M>) -> usize {
        let end = self.written.load(Ordering::Acquire);
        let visible = end.wrapping_sub(mark.0).min(N);
        let start = end.wrapping_sub(visible);

        let mut copied = 0;
        for offset in 0..visible {
            let index = start.wrapping_add(offset) & (N - 1);
            if out.push(self.cells[index].load(Ordering::Relaxed)).is_err() {
                break;
            }
            copied += 1;
        }
        copied
    }

    /// Returns whether `pattern` occurs in the bytes published since `mark`.
    ///
    /// Scans the ring in place, so a pattern is found even when the reply
    /// is longer than any copy buffer.
    #[must_use]
    pub fn contains_since(&self, mark: RxMark, pattern: &[u8]) -> bool {
        let end = self.written.load(Ordering::Acquire);
        let visible = end.wrapping_sub(mark.0).min(N);
        if visible < pattern.len() {
            return false;
        }

        let start = end.wrapping_sub(visible);
        let byte_at =
            |offset: usize| self.cells[start.wrapping_add(offset) & (N - 1)].load(Ordering::Relaxed);
        (0..=visible - pattern.len()).any(|first| {
            pattern
                .iter()
                .enumerate()
                .all(|(index, &byte)| byte_at(first + index) == byte)
        })
    }
}

impl<const N: usize> Default for RxRing<N> {
    fn default() -> Self {
        Self::new()
    }
}
