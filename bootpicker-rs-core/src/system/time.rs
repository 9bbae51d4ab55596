// SPDX-FileCopyrightText: 2025 some100 <ootinnyoo@outlook.com>
// SPDX-License-Identifier: MIT

//! Monotonic time for picker timeouts.
//!
//! The tick frequency is measured once and cached. [`recalculate`] throws the cached value away, which is needed
//! when firmware changes the CPU clock after the first measurement.
//!
//! # Safety
//!
//! This uses unsafe to read the tick counter (`rdtsc` on x86, `CNTVCT_EL0` on aarch64) and the aarch64 counter
//! frequency (`CNTFRQ_EL0`). Both are plain register reads in a single threaded environment.

use core::cell::Cell;

/// The cached tick frequency.
static TIMER_FREQ: TimerFreq = TimerFreq {
    freq: Cell::new(None),
};

/// A tick frequency that is measured on first use.
struct TimerFreq {
    /// Ticks per second, or [`None`] before the first measurement.
    freq: Cell<Option<u64>>,
}

// SAFETY: UEFI is single threaded there is no requirement of thread safety.
unsafe impl Sync for TimerFreq {}

impl TimerFreq {
    /// Returns the cached frequency, measuring it first if needed.
    fn get(&self) -> u64 {
        if let Some(freq) = self.freq.get() {
            return freq;
        }
        let freq = measure_freq().max(1);
        self.freq.set(Some(freq));
        freq
    }
}

/// Read the current value of the tick counter.
#[must_use = "Has no effect if the result is unused"]
fn timer_tick() -> u64 {
    // SAFETY: reads the timestamp counter and nothing more.
    #[cfg(target_arch = "x86")]
    unsafe {
        core::arch::x86::_rdtsc()
    }

    // SAFETY: reads the timestamp counter and nothing more.
    #[cfg(target_arch = "x86_64")]
    unsafe {
        core::arch::x86_64::_rdtsc()
    }

    // SAFETY: reads cntvct_el0 and nothing more.
    #[cfg(target_arch = "aarch64")]
    unsafe {
        let mut ticks: u64;
        core::arch::asm!("mrs {}, cntvct_el0", out(reg) ticks);
        ticks
    }
}

/// Measure the frequency of timer ticks on this system.
#[must_use = "Has no effect if the result is unused"]
fn measure_freq() -> u64 {
    #[cfg(any(target_arch = "x86", target_arch = "x86_64"))]
    {
        let start = timer_tick();
        uefi::boot::stall(1000);
        let end = timer_tick();
        end.wrapping_sub(start) * 1000
    }

    // SAFETY: reads cntfrq_el0 and nothing more.
    #[cfg(target_arch = "aarch64")]
    unsafe {
        let mut freq: u64;
        core::arch::asm!("mrs {}, cntfrq_el0", out(reg) freq);
        freq
    }
}

/// Drops the cached tick frequency so that the next reading measures it again.
pub fn recalculate() {
    TIMER_FREQ.freq.set(None);
}

/// Get the number of microseconds since system initialization.
#[must_use = "Has no effect if the result is unused"]
pub fn timer_usec() -> u64 {
    let usec = u128::from(timer_tick()) * 1_000_000 / u128::from(TIMER_FREQ.get());
    u64::try_from(usec).unwrap_or(u64::MAX)
}

/// A point in time after which a timeout has expired.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Deadline(u64);

impl Deadline {
    /// Creates a deadline `seconds` from now.
    #[must_use = "Has no effect if the result is unused"]
    pub fn after_secs(seconds: u64) -> Self {
        Self(timer_usec().saturating_add(seconds.saturating_mul(1_000_000)))
    }

    /// Returns `true` once the deadline has passed.
    #[must_use = "Has no effect if the result is unused"]
    pub fn expired(self) -> bool {
        timer_usec() >= self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recalculate_drops_cache() {
        TIMER_FREQ.freq.set(Some(1000));
        recalculate();
        assert_eq!(TIMER_FREQ.freq.get(), None);
    }
}
