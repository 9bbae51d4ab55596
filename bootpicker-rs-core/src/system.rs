// SPDX-FileCopyrightText: 2025 some100 <ootinnyoo@outlook.com>
// SPDX-License-Identifier: MIT

//! Firmware access: filesystems, device paths, NVRAM and the console logger.

pub mod apple;
pub mod device_path;
pub mod firmware;
pub mod fs;
pub mod helper;
pub mod log_backend;
pub mod time;
pub mod variable;

mod global_allocator;
mod panic_handler;
