// SPDX-FileCopyrightText: 2025 some100 <ootinnyoo@outlook.com>
// SPDX-License-Identifier: MIT

//! Panic handler behind the `panic_handler` feature.
//!
//! A panic in a boot picker leaves nothing useful to return to, so the message is shown until a key is pressed and
//! then the machine is powered off.

#![cfg(feature = "panic_handler")]
use core::fmt::Write;

use uefi::{
    Status, boot,
    runtime::{self, ResetType},
    system,
};

/// Microseconds to wait when there is no keyboard to wait on.
const NO_INPUT_STALL: usize = 10_000_000;

/// The panic handler.
#[panic_handler]
fn panic_handler(info: &core::panic::PanicInfo) -> ! {
    system::with_stdout(|stdout| {
        let _ = writeln!(stdout, "[PANIC] bootpicker: {info}");
        let _ = writeln!(stdout, "Press any key to power off");
    });
    let waited = system::with_stdin(|stdin| {
        stdin
            .wait_for_key_event()
            .is_some_and(|event| boot::wait_for_event(&mut [event]).is_ok())
    });
    if !waited {
        boot::stall(NO_INPUT_STALL);
    }
    runtime::reset(ResetType::SHUTDOWN, Status::ABORTED, None);
}
