// SPDX-FileCopyrightText: 2025 some100 <ootinnyoo@outlook.com>
// SPDX-License-Identifier: MIT

//! An ordered list of attempts where the first success wins.
//!
//! Attempts that report absent or malformed state are skipped, so a missing blessed file falls through to the next
//! candidate. Running out of memory stops the chain.

use log::{debug, warn};

use crate::{BootResult, error::BootError};

/// The state of a chain of attempts.
///
/// # Example
///
/// ```
/// use bootpicker_rs_core::{boot::scan::chain::Chain, error::BootError};
///
/// let result = Chain::new()
///     .attempt("first", || Err::<u32, _>(BootError::NotFound))
///     .attempt("second", || Ok(2))
///     .attempt("third", || Ok(3))
///     .finish();
/// assert!(matches!(result, Ok(2)));
/// ```
#[must_use = "Has no effect if the result is unused"]
pub struct Chain<T> {
    /// [`None`] while no attempt has succeeded or failed hard.
    outcome: Option<BootResult<T>>,
}

impl<T> Chain<T> {
    /// Creates an empty chain.
    pub const fn new() -> Self {
        Self { outcome: None }
    }

    /// Runs an attempt unless an earlier one already decided the chain.
    pub fn attempt(mut self, name: &str, attempt: impl FnOnce() -> BootResult<T>) -> Self {
        if self.outcome.is_some() {
            return self;
        }

        match attempt() {
            Ok(value) => self.outcome = Some(Ok(value)),
            Err(e) if e.is_out_of_resources() => self.outcome = Some(Err(e)),
            Err(e) if e.is_not_found() => debug!("{name}: not found"),
            Err(e) if e.is_invalid() => warn!("{name}: {e}"),
            Err(e) => warn!("{name}: {e}, trying the next candidate"),
        }
        self
    }

    /// Returns the result of the first successful attempt, or [`BootError::NotFound`].
    ///
    /// # Errors
    ///
    /// Returns the `Error` that stopped the chain, or [`BootError::NotFound`] if no attempt succeeded.
    pub fn finish(self) -> BootResult<T> {
        self.outcome.unwrap_or(Err(BootError::NotFound))
    }
}

impl<T> Default for Chain<T> {
    fn default() -> Self {
        Self::new()
    }
}
