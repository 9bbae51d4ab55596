// SPDX-FileCopyrightText: 2025 some100 <ootinnyoo@outlook.com>
// SPDX-License-Identifier: MIT

//! Various helper functions for other modules.

use alloc::{string::String, vec::Vec};
use smallvec::SmallVec;
use thiserror::Error;
use uefi::CString16;

/// The max length of a path in UEFI.
pub(crate) const MAX_PATH: usize = 256;

/// An `Error` that may result from converting a [`String`] to another format.
#[derive(Error, Debug)]
pub enum StrError {
    /// A [`String`] could not be converted into a [`CString16`]
    #[error("Could not convert String to CString16")]
    CstrFromStr(#[from] uefi::data_types::FromStrError),

    /// A UCS-2 buffer held an unpaired surrogate or was not terminated.
    #[error("Invalid UCS-2 string")]
    InvalidUcs2,
}

/// Gets a [`CString16`] from an [`&str`].
///
/// # Errors
///
/// May return an `Error` if the string could not be converted into a [`CString16`], either due to unsupported
/// characters or an invalid nul character.
pub(crate) fn str_to_cstr(str: &str) -> Result<CString16, StrError> {
    Ok(CString16::try_from(str)?)
}

/// Joins a directory and a relative path with exactly one backslash between them.
#[must_use = "Has no effect if the result is unused"]
pub(crate) fn join_path(dir: &str, file: &str) -> String {
    let mut path = String::with_capacity(dir.len() + file.len() + 1);
    path.push_str(dir.trim_end_matches('\\'));
    path.push('\\');
    path.push_str(file.trim_start_matches('\\'));
    path
}

/// Normalizes a path to make it more aligned with UEFI expectations
///
/// Currently this means replacing all forward slashes with backslashes.
#[must_use = "Has no effect if the result is unused"]
pub(crate) fn normalize_path(path: &str) -> String {
    path.replace('/', "\\")
}

/// Returns the directory part of a path with its trailing backslash, or `\` if there is none.
#[must_use = "Has no effect if the result is unused"]
pub(crate) fn dir_name(path: &str) -> &str {
    match path.rfind('\\') {
        Some(idx) => &path[..=idx],
        None => "\\",
    }
}

/// Encodes a string as UCS-2 with a terminating nul.
///
/// Characters outside of the basic multilingual plane cannot be represented and are rejected.
///
/// # Errors
///
/// May return an `Error` if the string holds a character that UCS-2 cannot store, or an interior nul.
pub(crate) fn str_to_ucs2_with_nul(str: &str) -> Result<Vec<u16>, StrError> {
    Ok(str_to_cstr(str)?.to_u16_slice_with_nul().to_vec())
}

/// Decodes a UCS-2 buffer up to its first nul (or its end).
///
/// # Errors
///
/// May return an `Error` if the buffer holds an unpaired surrogate.
pub(crate) fn ucs2_to_string(units: &[u16]) -> Result<String, StrError> {
    let end = units.iter().position(|&c| c == 0).unwrap_or(units.len());
    char::decode_utf16(units[..end].iter().copied())
        .collect::<Result<String, _>>()
        .map_err(|_| StrError::InvalidUcs2)
}

/// Decodes little endian UCS-2 bytes up to their first nul.
///
/// The bytes do not need to be aligned. An odd trailing byte is ignored.
///
/// # Errors
///
/// May return an `Error` if the buffer holds an unpaired surrogate.
pub(crate) fn ucs2_bytes_to_string(bytes: &[u8]) -> Result<String, StrError> {
    let units: SmallVec<[u16; MAX_PATH]> = bytes
        .chunks_exact(2)
        .map(|c| u16::from_le_bytes([c[0], c[1]]))
        .collect();
    ucs2_to_string(&units)
}

/// Checks whether a string starts with a canonical 36 character GUID, such as `{GUID}\...`.
#[must_use = "Has no effect if the result is unused"]
pub(crate) fn has_guid_prefix(path: &str) -> bool {
    let path = path.trim_start_matches('\\').as_bytes();
    path.len() >= 36
        && path[..36].iter().enumerate().all(|(i, &c)| {
            if matches!(i, 8 | 13 | 18 | 23) {
                c == b'-'
            } else {
                c.is_ascii_hexdigit()
            }
        })
}

/// Gets the generic removable media loader path for the current architecture.
#[must_use = "Has no effect if the result is unused"]
pub const fn removable_media_path() -> &'static str {
    if cfg!(target_arch = "x86") {
        "\\EFI\\BOOT\\BOOTIA32.EFI"
    } else if cfg!(target_arch = "arm") {
        "\\EFI\\BOOT\\BOOTARM.EFI"
    } else if cfg!(target_arch = "aarch64") {
        "\\EFI\\BOOT\\BOOTAA64.EFI"
    } else {
        "\\EFI\\BOOT\\BOOTX64.EFI"
    }
}
