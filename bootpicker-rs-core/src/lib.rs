// SPDX-FileCopyrightText: 2025 some100 <ootinnyoo@outlook.com>
// SPDX-License-Identifier: MIT

//! The `bootpicker-rs` library crate.
//!
//! This is the boot entry discovery and selection engine. It walks every filesystem the firmware exposes, finds the
//! loaders on them, orders the result against `BootOrder` and `BootNext`, and picks a default. The chosen entry can
//! then be loaded and started through [`boot::BootPicker`].
//!
//! Front ends only deal with [`boot::BootPicker`] and [`boot::context::BootEntry`]. See
//! [bootpicker-rs-minimal](https://github.com/some100/bootmgr-rs/tree/main/bootpicker-rs-minimal) for the smallest
//! possible one.
//!
//! Every firmware interaction goes through [`system::firmware::Firmware`], [`system::firmware::Volume`] and
//! [`system::variable::VariableStore`], so the engine itself also runs on the host under tests and fuzzing.
//!
//! ## MSRV
//!
//! The minimum supported rust version is 1.88.0.

#![cfg_attr(not(any(fuzzing, test, doctest)), no_std)]

/// The primary result type that wraps around [`crate::error::BootError`].
pub type BootResult<T> = Result<T, crate::error::BootError>;

pub mod boot;
pub mod config;
pub mod error;
pub mod system;

extern crate alloc;
