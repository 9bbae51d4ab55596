// SPDX-FileCopyrightText: 2025 some100 <ootinnyoo@outlook.com>
// SPDX-License-Identifier: MIT

//! A command line interface frontend to `bootpicker-rs`.

#![no_main]
#![no_std]

extern crate alloc;

use alloc::string::{String, ToString};

use bootpicker_rs_core::{
    BootResult,
    boot::{BootPicker, policy::ScanPolicy, services::NoHostServices},
    system::{firmware::efi::UefiFirmware, log_backend::UefiLogger, variable::RuntimeVariableStore},
};
use getargs::{Arg, Options};
use log::LevelFilter;
use uefi::{Status, boot, cstr16, entry, println, proto::loaded_image::LoadedImage};

/// The global logging instance.
static LOGGER: UefiLogger = UefiLogger::new(LevelFilter::Warn);

/// The picker as the command line drives it.
type Picker = BootPicker<UefiFirmware, RuntimeVariableStore, NoHostServices>;

/// Parses an entry index, printing why it could not be parsed.
fn parse_index(
    picker: &Picker,
    value: Result<&str, getargs::Error<&str>>,
    flag: &str,
) -> Option<usize> {
    let Ok(value) = value else {
        println!("Error: An index was not passed into the {flag} argument");
        return None;
    };
    let index: usize = match value.parse() {
        Ok(index) => index,
        Err(e) => {
            println!(
                "Error: {e} (The value passed to the {flag} argument could not be parsed as a number)"
            );
            return None;
        }
    };
    if index >= picker.list().len() {
        println!("Error: The value passed to the {flag} argument was not in range of the list");
        return None;
    }
    Some(index)
}

/// Prints every shown entry, marking the default.
fn print_list(picker: &Picker) {
    let default = picker.get_default();
    for (i, entry) in picker.list().iter().enumerate() {
        let marker = if Some(i) == default { '*' } else { ' ' };
        println!("{marker}{i}: {} ({:?})", entry.name, entry.entry_type);
    }
}

/// The actual main function of the program.
///
/// Returns `Ok(())` both after an informational command and after a started image returned.
///
/// # Errors
///
/// May return an `Error` if the program could not obtain the `LoadedImage` protocol, the filesystems could not be
/// scanned, or the chosen entry could not be booted.
fn main_func() -> BootResult<()> {
    uefi::helpers::init()?; // initialize helpers (for print)

    let load_options = {
        let handle = boot::image_handle();
        let loaded_image = boot::open_protocol_exclusive::<LoadedImage>(handle)?;
        loaded_image
            .load_options_as_cstr16()
            .unwrap_or(cstr16!("bootpicker-rs-cli.efi")) // there is at least one argument, which is the filename
            .to_string()
    }; // loaded_image dropped here

    let mut options = load_options.split_whitespace();

    let Some(app_filename) = options.next().map(String::from) else {
        println!("Error: No load options were passed to the program");
        return Ok(());
    };

    let _ = log::set_logger(&LOGGER).map(|()| log::set_max_level(LevelFilter::Warn));

    let mut picker =
        Picker::from_firmware(UefiFirmware::new(), RuntimeVariableStore::new(), NoHostServices);

    let mut opts = Options::new(options);
    while let Ok(Some(arg)) = opts.next_arg() {
        match arg {
            Arg::Short('p') | Arg::Long("scan-policy") => {
                let Ok(value) = opts.value() else {
                    println!("Error: A policy was not passed into the scan-policy argument");
                    return Ok(());
                };
                let Ok(bits) = u32::from_str_radix(value.trim_start_matches("0x"), 16) else {
                    println!(
                        "Error: The value passed to the scan-policy argument is not a hexadecimal number"
                    );
                    return Ok(());
                };
                picker.config_mut().scan_policy = ScanPolicy::from_bits_retain(bits);
            }
            Arg::Short('l') | Arg::Long("list") => {
                picker.scan(false)?;
                print_list(&picker);
                return Ok(());
            }
            Arg::Short('d') | Arg::Long("default") => {
                picker.scan(false)?;
                let default = picker
                    .get_default()
                    .and_then(|i| picker.list().get(i).map(|entry| (i, entry.name.clone())));
                match default {
                    Some((i, name)) => println!("{i}: {name}"),
                    None => println!("There is no default boot option"),
                }
                return Ok(());
            }
            Arg::Short('s') | Arg::Long("set-default") => {
                picker.scan(false)?;
                let Some(index) = parse_index(&picker, opts.value(), "set-default") else {
                    return Ok(());
                };
                picker.set_default(index)?;
                println!("{} is now the default boot option", picker.list()[index].name);
                return Ok(());
            }
            Arg::Short('b') | Arg::Long("boot") => {
                picker.scan(true)?;
                let Some(index) = parse_index(&picker, opts.value(), "boot") else {
                    return Ok(());
                };
                return picker.boot(index);
            }
            Arg::Short('h') | Arg::Long("help") => {
                // ignore any other arguments when help is specified
                print_usage(&app_filename);
                return Ok(());
            }
            Arg::Short(invalid) => println!("Error: Unknown short argument: -{invalid}"),
            Arg::Long(invalid) => println!("Error: Unknown long argument: --{invalid}"),
            Arg::Positional(invalid) => println!("Error: Unknown positional argument: {invalid}"),
        }
    }

    // without a command, boot what the boot order points to
    picker.scan_default(picker.config().default_only_boot_next)?;
    match picker.get_default() {
        Some(index) => picker.boot(index),
        None => {
            print_usage(&app_filename);
            Ok(())
        }
    }
}

/// Prints the usage of the program.
fn print_usage(app_filename: &str) {
    println!(
        r"Usage: {app_filename} [OPTIONS] [ARGS]...

-h, --help                 display this help and exit
-l, --list                 display boot options and exit
-d, --default              display the default boot option and exit
-b, --boot <INDEX>         boot the given boot option index
-s, --set-default <INDEX>  make the given boot option index the default
-p, --scan-policy <HEX>    scan with the given policy

Without options, the default boot option is booted.
"
    );
}

/// The main function of the program.
///
/// This will not panic on a fatal error, rather, it will return control to the UEFI shell (or the firmware menu).
/// This program is intended to be ran as a shell script, so panicking here would not make any sense.
#[entry]
fn main() -> Status {
    match main_func() {
        Ok(()) => Status::SUCCESS,
        Err(e) => {
            println!("Error: {e}");
            Status::ABORTED // dont panic when an error occurs, instead, just exit.
        }
    }
}
