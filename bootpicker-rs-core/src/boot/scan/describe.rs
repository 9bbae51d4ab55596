// SPDX-FileCopyrightText: 2025 some100 <ootinnyoo@outlook.com>
// SPDX-License-Identifier: MIT

//! Naming a discovered loader.
//!
//! macOS leaves small text files next to its loaders. `.contentDetails` and `.disk_label.contentDetails` hold the
//! display name, `.contentFlavour` the icon flavour and `.contentVisibility` whether the entry is shown at all.
//! Loaders without any of them fall back to the volume label.

use alloc::{
    format,
    string::{String, ToString},
};
use log::debug;

use crate::{
    BootResult,
    boot::{
        classify::{BootEntryType, contains_ignore_case, get_path_type},
        context::BootEntry,
    },
    config::builder::BootEntryBuilder,
    error::BootError,
    system::{
        device_path::DevicePathBuf,
        firmware::Volume,
        fs::filter_label,
        helper::{dir_name, join_path},
    },
};

/// The largest label file that is read, matching the Apple volume label limit.
const LABEL_MAX_SIZE: usize = 64;

/// The largest `.contentVisibility` file that is read.
const VISIBILITY_MAX_SIZE: usize = 512;

/// The largest `SystemVersion.plist` that is read.
const SYSTEM_VERSION_MAX_SIZE: usize = 1024 * 1024;

/// The Windows boot configuration database, which marks a Windows installation.
const WINDOWS_BCD_PATH: &str = "\\EFI\\Microsoft\\Boot\\BCD";

/// Whether an entry is shown.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Visibility {
    Shown,
    Auxiliary,
    Disabled,
}

/// Returns the flavour used when a loader has no `.contentFlavour` file.
#[must_use = "Has no effect if the result is unused"]
pub fn default_flavour(entry_type: BootEntryType) -> &'static str {
    if entry_type.intersects(BootEntryType::APPLE_OS | BootEntryType::APPLE_FW_UPDATE) {
        "Apple"
    } else if entry_type.contains(BootEntryType::APPLE_RECOVERY) {
        "AppleRecv"
    } else if entry_type.contains(BootEntryType::APPLE_TIME_MACHINE) {
        "AppleTM"
    } else if entry_type.contains(BootEntryType::WINDOWS) {
        "Windows"
    } else if entry_type.contains(BootEntryType::SYSTEM) {
        "NVRAMReset"
    } else {
        "Auto"
    }
}

/// Reads a short text file from the boot directory as a filtered label.
fn read_label(volume: &mut dyn Volume, dir: &str, file: &str, max_size: usize) -> Option<String> {
    let path = join_path(dir, file);
    if !volume.exists(&path) {
        return None;
    }
    debug!("Trying to get label from {path}");
    match volume.read(&path, max_size) {
        Ok(raw) => Some(filter_label(&raw)).filter(|label| !label.is_empty()),
        Err(e) => {
            debug!("Could not read {path}: {e}");
            None
        }
    }
}

/// Reads `.contentVisibility`.
fn read_visibility(volume: &mut dyn Volume, dir: &str) -> Visibility {
    match read_label(volume, dir, ".contentVisibility", VISIBILITY_MAX_SIZE).as_deref() {
        Some(v) if v.eq_ignore_ascii_case("Disabled") => Visibility::Disabled,
        Some(v) if v.eq_ignore_ascii_case("Auxiliary") => Visibility::Auxiliary,
        _ => Visibility::Shown,
    }
}

/// Finds the string value of a key in a property list.
///
/// Only a flat `<key>..</key><string>..</string>` pair is recognized, which is all `SystemVersion.plist` holds.
fn plist_string<'a>(plist: &'a str, key: &str) -> Option<&'a str> {
    let key_tag = format!("<key>{key}</key>");
    let after_key = &plist[plist.find(&key_tag)? + key_tag.len()..];
    let value = after_key.trim_start().strip_prefix("<string>")?;
    let end = value.find("</string>")?;
    Some(value[..end].trim())
}

/// Builds the `Recovery X` name from the `SystemVersion.plist` next to a recovery loader.
fn recovery_name(volume: &mut dyn Volume, dir: &str) -> Option<String> {
    let path = join_path(dir, "SystemVersion.plist");
    debug!("Trying to get recovery from {path}");
    let raw = volume.read(&path, SYSTEM_VERSION_MAX_SIZE).ok()?;
    let plist = str::from_utf8(&raw).ok()?;
    let version = plist_string(plist, "ProductUserVisibleVersion")?;
    Some(filter_label(format!("Recovery {version}").as_bytes()))
}

/// Describes the loader at `path` on `volume`.
///
/// Returns [`None`] if `.contentVisibility` disables the entry.
///
/// # Errors
///
/// May return an `Error` if the path has no file path, or no name could be found for it.
pub fn describe_entry(
    volume: &mut dyn Volume,
    path: &DevicePathBuf,
) -> BootResult<Option<BootEntry>> {
    let file_path = path
        .file_path()
        .filter(|p| !p.is_empty())
        .ok_or(BootError::InvalidParameter)?;
    let path_type = get_path_type(&file_path);
    let dir = dir_name(&file_path).to_string();
    let mut entry_type = path_type.entry_type;

    let visibility = read_visibility(volume, &dir);
    if visibility == Visibility::Disabled {
        return Ok(None);
    }

    let mut name = read_label(volume, &dir, ".contentDetails", LABEL_MAX_SIZE)
        .or_else(|| read_label(volume, &dir, ".disk_label.contentDetails", LABEL_MAX_SIZE));

    // Windows may carry a custom name, but the type must still be right.
    if entry_type == BootEntryType::UNKNOWN && volume.exists(WINDOWS_BCD_PATH) {
        entry_type = BootEntryType::WINDOWS;
        name.get_or_insert_with(|| String::from("Windows"));
    }

    if name.is_none() {
        let label = volume
            .volume_label()
            .map(|label| filter_label(label.as_bytes()))
            .filter(|label| !label.is_empty());
        if let Some(label) = label.as_deref()
            && matches!(label, "Recovery HD" | "Recovery")
        {
            if entry_type == BootEntryType::UNKNOWN || entry_type == BootEntryType::APPLE_OS {
                entry_type = BootEntryType::APPLE_RECOVERY;
            }
            name = recovery_name(volume, &dir).or(Some(String::from(label)));
        } else {
            name = label;
        }
    }
    if name.is_none() && entry_type == BootEntryType::WINDOWS {
        name = Some(String::from("Windows"));
    }

    let Some(name) = name else {
        debug!("No name for {file_path}");
        return Err(BootError::NotFound);
    };

    let flavour = read_label(volume, &dir, ".contentFlavour", LABEL_MAX_SIZE)
        .unwrap_or_else(|| String::from(default_flavour(entry_type)));
    let installer = contains_ignore_case(&file_path, "com.apple.installer")
        || contains_ignore_case(&file_path, "macOS Install Data");

    Ok(Some(
        BootEntryBuilder::new(name, entry_type)
            .id(file_path.clone())
            .path_name(dir)
            .device_path(path.clone())
            .flavour(flavour)
            .folder(path_type.is_folder)
            .generic(path_type.is_generic)
            .auxiliary(visibility == Visibility::Auxiliary)
            .apple_installer(installer)
            .build(),
    ))
}
