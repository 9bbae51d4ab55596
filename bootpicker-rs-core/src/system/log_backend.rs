// SPDX-FileCopyrightText: 2025 some100 <ootinnyoo@outlook.com>
// SPDX-License-Identifier: MIT

//! Console backend for the [`log`] crate.
//!
//! Front ends install it once at startup:
//!
//! ```ignore
//! let _ = log::set_logger(UefiLogger::static_new(LevelFilter::Info));
//! log::set_max_level(LevelFilter::Info);
//! ```

use core::fmt::Write;

use alloc::boxed::Box;
use log::{LevelFilter, Metadata, Record};
use uefi::{runtime, system::with_stdout};

/// A logger that writes to the UEFI console.
pub struct UefiLogger {
    /// The most verbose level that is printed.
    level: LevelFilter,
}

impl UefiLogger {
    /// Constructs a new [`UefiLogger`] printing up to `level`.
    #[must_use = "Has no effect if the result is unused"]
    pub const fn new(level: LevelFilter) -> Self {
        Self { level }
    }

    /// Constructs a new [`UefiLogger`], then immediately leaks it so that it can be used with `set_logger`.
    #[must_use = "Has no effect if the result is unused"]
    pub fn static_new(level: LevelFilter) -> &'static Self {
        Box::leak(Box::new(Self::new(level)))
    }
}

impl Default for UefiLogger {
    fn default() -> Self {
        Self::new(LevelFilter::Info)
    }
}

impl log::Log for UefiLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= self.level
    }

    fn log(&self, record: &Record) {
        if !self.enabled(record.metadata()) {
            return;
        }
        let time = runtime::get_time().unwrap_or(runtime::Time::invalid());
        let level = record.level();
        let target = record.module_path().unwrap_or_default();
        let line = record.line().unwrap_or_default();
        let args = record.args();
        with_stdout(|stdout| {
            let _ = stdout.write_fmt(format_args!("[{time} {level} {target}:{line}] - {args}\n"));
        });
    }

    fn flush(&self) {}
}
