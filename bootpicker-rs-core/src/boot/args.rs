// SPDX-FileCopyrightText: 2025 some100 <ootinnyoo@outlook.com>
// SPDX-License-Identifier: MIT

//! Editing kernel command lines, such as Apple `boot-args`.
//!
//! Arguments are space separated words. An argument ending in `=`, like `debug=`, names a key and matches any value.
//! Anything else matches a whole word only.

use alloc::{string::String, vec::Vec};
use log::debug;
use thiserror::Error;
use uefi::{cstr16, runtime::VariableVendor};

use crate::{
    BootResult,
    boot::services::{HostServices, PrivilegeLevel, request_privilege},
    error::BootError,
    system::variable::{APPLE_BOOT_VARIABLE_GUID, VariableStore, get_variable_str},
};

/// The largest command line, including its terminator.
pub const BOOT_LINE_LENGTH: usize = 1024;

/// An `Error` that may result from editing a command line.
#[derive(Error, Debug)]
pub enum ArgsError {
    /// The command line would not fit in [`BOOT_LINE_LENGTH`].
    #[error("Boot arguments would exceed {BOOT_LINE_LENGTH} bytes")]
    TooLong,
}

/// Iterates over the byte offsets where `arg` matches as an argument of `cmd`.
fn matches<'a>(cmd: &'a str, arg: &'a str) -> impl Iterator<Item = usize> + 'a {
    let is_key = arg.ends_with('=');
    cmd.match_indices(arg).map(|(idx, _)| idx).filter(move |&idx| {
        let starts_word = idx == 0 || cmd.as_bytes()[idx - 1] == b' ';
        let ends_word = is_key || cmd.as_bytes().get(idx + arg.len()).is_none_or(|&b| b == b' ');
        starts_word && ends_word
    })
}

/// Finds an argument in a command line and returns its value.
///
/// For `key=` arguments the value runs up to the next space. Whole word arguments have an empty value.
#[must_use = "Has no effect if the result is unused"]
pub fn get_argument<'a>(cmd: &'a str, arg: &str) -> Option<&'a str> {
    if arg.is_empty() {
        return None;
    }
    let idx = matches(cmd, arg).next()?;
    let rest = &cmd[idx + arg.len()..];
    Some(rest.split(' ').next().unwrap_or_default())
}

/// Removes every occurrence of the given arguments, then squeezes the spaces left behind.
pub fn remove_arguments(cmd: &mut String, args: &[&str]) {
    for arg in args.iter().filter(|arg| !arg.is_empty()) {
        let ranges: Vec<(usize, usize)> = matches(cmd, arg)
            .map(|idx| {
                let end = cmd[idx..].find(' ').map_or(cmd.len(), |len| idx + len);
                (idx, end)
            })
            .collect();
        for (start, end) in ranges.into_iter().rev() {
            cmd.replace_range(start..end, "");
        }
    }

    let squeezed = cmd.split(' ').filter(|word| !word.is_empty()).collect::<Vec<_>>().join(" ");
    *cmd = squeezed;
}

/// Appends an argument to a command line, separated by a space.
///
/// Changing the command line needs privilege. If the user declines, nothing changes and `Ok(true)` is returned, so
/// that the caller carries on as if the argument was never requested. Returns `Ok(true)` once the argument is added.
///
/// # Errors
///
/// May return an `Error` if the privilege prompt failed, or the command line would be too long.
pub fn append_argument(
    cmd: &mut String,
    services: Option<&mut dyn HostServices>,
    arg: &str,
) -> BootResult<bool> {
    if let Some(services) = services {
        match request_privilege(services, PrivilegeLevel::Authorized) {
            Ok(()) => (),
            Err(BootError::Aborted) => {
                debug!("Privilege declined, not appending {arg}");
                return Ok(true);
            }
            Err(e) => return Err(e),
        }
    }

    let separator = usize::from(!cmd.is_empty());
    if cmd.len() + separator + arg.len() >= BOOT_LINE_LENGTH {
        return Err(ArgsError::TooLong.into());
    }

    if separator > 0 {
        cmd.push(' ');
    }
    cmd.push_str(arg);
    Ok(true)
}

/// Returns the part of an argument that names it: `key=` for key value arguments, or else the whole word.
fn argument_key(arg: &str) -> &str {
    arg.find('=').map_or(arg, |idx| &arg[..=idx])
}

/// Appends every argument of `extra` that `cmd` does not already have.
///
/// # Errors
///
/// Returns [`ArgsError::TooLong`] once an argument does not fit. The arguments appended before it are kept.
pub fn merge_arguments(cmd: &mut String, extra: &str) -> BootResult<()> {
    for arg in extra.split(' ').filter(|arg| !arg.is_empty()) {
        if get_argument(cmd, argument_key(arg)).is_none() {
            append_argument(cmd, None, arg)?;
        }
    }
    Ok(())
}

/// Builds new load options from a list of arguments.
///
/// Unless `replace` is set, the existing options follow the new arguments.
#[must_use = "Has no effect if the result is unused"]
pub fn append_arguments_to_load_options(
    existing: Option<&str>,
    args: &[&str],
    replace: bool,
) -> String {
    let mut options = args.join(" ");
    if !replace && let Some(existing) = existing.filter(|e| !e.is_empty()) {
        if !options.is_empty() {
            options.push(' ');
        }
        options.push_str(existing);
    }
    options
}

/// Looks for an argument in the load options of the running image, then in the `boot-args` variable.
///
/// Returns the value of the first match.
#[must_use = "Has no effect if the result is unused"]
pub fn check_argument_from_env(
    load_options: Option<&str>,
    variables: &dyn VariableStore,
    arg: &str,
) -> Option<String> {
    if let Some(value) = load_options.and_then(|options| get_argument(options, arg)) {
        return Some(String::from(value));
    }

    let boot_args = get_variable_str(
        variables,
        cstr16!("boot-args"),
        &VariableVendor(APPLE_BOOT_VARIABLE_GUID),
    )
    .ok()
    .flatten()?;
    get_argument(&boot_args, arg).map(String::from)
}
