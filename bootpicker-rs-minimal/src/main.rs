// SPDX-FileCopyrightText: 2025 some100 <ootinnyoo@outlook.com>
// SPDX-License-Identifier: MIT

//! Extremely minimal skeleton for a boot picker.
//!
//! Entries are printed with the key that selects them, and the default boots once the timeout runs out. This
//! mostly serves as an example frontend for the bootpicker crate.

#![no_main]
#![no_std]

extern crate alloc;

use alloc::boxed::Box;
use bootpicker_rs_core::{
    boot::{
        BootPicker,
        input::{index_to_key, key_to_index},
        services::NoHostServices,
    },
    error::BootError,
    system::{
        firmware::efi::UefiFirmware, log_backend::UefiLogger, time::Deadline,
        variable::RuntimeVariableStore,
    },
};
use log::{LevelFilter, error};
use uefi::{
    prelude::*,
    println,
    proto::console::text::{Key, Output, ScanCode},
    runtime::ResetType,
    system::{with_stdin, with_stdout},
};

/// The global logging instance.
static LOGGER: UefiLogger = UefiLogger::new(LevelFilter::Warn);

/// How long to sleep between polls of the keyboard, in microseconds.
const POLL_INTERVAL: usize = 10_000;

/// What the user chose.
enum Choice {
    /// Boot the entry at this index.
    Entry(usize),

    /// Boot the default entry.
    Default,
}

/// Waits for a key that selects an entry, or for the timeout to run out.
///
/// A timeout of `0` waits forever.
fn wait_for_choice(count: usize, timeout: u64) -> uefi::Result<Choice> {
    let deadline = (timeout > 0).then(|| Deadline::after_secs(timeout));
    loop {
        if deadline.is_some_and(Deadline::expired) {
            return Ok(Choice::Default);
        }
        match with_stdin(|input| input.read_key())? {
            Some(Key::Printable(key)) if char::from(key) == '\r' => return Ok(Choice::Default),
            Some(Key::Printable(key)) => {
                if let Some(index) = key_to_index(char::from(key))
                    && index < count
                {
                    return Ok(Choice::Entry(index));
                }
            }
            Some(Key::Special(ScanCode::ESCAPE)) => {
                // escape stops the countdown
                return wait_for_choice(count, 0);
            }
            Some(Key::Special(_)) | None => boot::stall(POLL_INTERVAL),
        }
    }
}

/// The actual main function of the program, which returns a [`Result`].
///
/// `Box<dyn core::error::Error>` is used here mainly for simplicity purposes (we simply will propagate all these errors).
///
/// # Errors
///
/// May return an `Error` if the filesystems could not be scanned, there is no input protocol, or the chosen entry
/// could not be booted.
fn main_func() -> Result<(), Box<dyn core::error::Error>> {
    uefi::helpers::init().map_err(BootError::Uefi)?; // initialize helpers (for print)
    with_stdout(Output::clear)?;
    let _ = log::set_logger(&LOGGER).map(|()| log::set_max_level(LevelFilter::Warn));

    let mut picker =
        BootPicker::from_firmware(UefiFirmware::new(), RuntimeVariableStore::new(), NoHostServices);
    picker.scan(true)?;

    let default = picker.get_default();
    for (i, entry) in picker.list().iter().enumerate() {
        let Some(key) = index_to_key(i) else {
            break; // only entries with a key can be chosen
        };
        let marker = if Some(i) == default { '*' } else { ' ' };
        println!("{marker}{key}. {}", entry.name); // print every boot option present
    }
    println!("Enter the preferred boot option here:");

    let timeout = picker.config().timeout;
    let index = match wait_for_choice(picker.list().len(), timeout)? {
        Choice::Entry(index) => index,
        Choice::Default => default.ok_or(BootError::NotFound)?,
    };
    Ok(picker.boot(index)?)
}

/// The main function of the program.
///
/// A fatal error restarts the system after ten seconds.
#[entry]
fn main() -> Status {
    match main_func() {
        Ok(()) => Status::SUCCESS,
        Err(e) => {
            error!("Fatal error occurred: {e}");
            error!("Automatically restarting in 10 seconds");

            // simple restart timer is used here for simplicity
            boot::stall(10_000_000);
            uefi::runtime::reset(ResetType::COLD, Status::SUCCESS, None);
        }
    }
}
