// SPDX-FileCopyrightText: 2025 some100 <ootinnyoo@outlook.com>
// SPDX-License-Identifier: MIT

//! Guessing what kind of operating system a loader path belongs to.
//!
//! Only the file path is considered, so anything can pretend to be anything. The result picks names, flavours and
//! boot arguments. It never decides whether something may be booted.

use bitflags::bitflags;

use crate::system::{device_path::DevicePathBuf, helper::removable_media_path};

bitflags! {
    /// The kind of a boot entry.
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
    pub struct BootEntryType: u32 {
        /// Nothing is known about the entry.
        const UNKNOWN = 0;
        /// macOS.
        const APPLE_OS = 1 << 0;
        /// macOS recovery.
        const APPLE_RECOVERY = 1 << 1;
        /// A Time Machine restore environment.
        const APPLE_TIME_MACHINE = 1 << 2;
        /// An Apple firmware updater.
        const APPLE_FW_UPDATE = 1 << 3;
        /// Windows.
        const WINDOWS = 1 << 4;
        /// A custom entry that boots an operating system.
        const EXTERNAL_OS = 1 << 5;
        /// A custom entry that starts a tool.
        const EXTERNAL_TOOL = 1 << 6;
        /// A built-in action, like resetting NVRAM.
        const SYSTEM = 1 << 7;
        /// An entry supplied by a Boot Entry Protocol provider.
        const UNMANAGED = 1 << 8;

        /// Any Apple entry.
        const APPLE_ANY = Self::APPLE_OS.bits()
            | Self::APPLE_RECOVERY.bits()
            | Self::APPLE_TIME_MACHINE.bits()
            | Self::APPLE_FW_UPDATE.bits();
    }
}

/// Loaders recognized by their file name, which must be a whole path component.
const LOADER_NAMES: [(&str, BootEntryType); 3] = [
    ("boot.efi", BootEntryType::APPLE_OS),
    ("tmbootpicker.efi", BootEntryType::APPLE_TIME_MACHINE),
    ("bootmgfw.efi", BootEntryType::WINDOWS),
];

/// The result of classifying a loader path.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct PathType {
    /// The guessed type.
    pub entry_type: BootEntryType,

    /// The path ends with a backslash, so it names a folder rather than a file.
    pub is_folder: bool,

    /// The path ends with the removable media loader name, like `BOOTX64.EFI`.
    pub is_generic: bool,
}

/// Checks if `path` ends with the path component `name`, ignoring case.
fn ends_with_component(path: &str, name: &str) -> bool {
    let Some(rest) = path.len().checked_sub(name.len()) else {
        return false;
    };
    path.is_char_boundary(rest)
        && path[rest..].eq_ignore_ascii_case(name)
        && (rest == 0 || path.as_bytes()[rest - 1] == b'\\')
}

/// Checks if `haystack` contains `needle`, ignoring ASCII case.
pub(crate) fn contains_ignore_case(haystack: &str, needle: &str) -> bool {
    needle.is_empty()
        || haystack
            .as_bytes()
            .windows(needle.len())
            .any(|window| window.eq_ignore_ascii_case(needle.as_bytes()))
}

/// Classifies a loader by its file path.
///
/// The rules are tried in order and the first match wins:
///
/// 1. `com.apple.recovery.boot` anywhere is macOS recovery.
/// 2. `Backups.backupdb` or `.timemachine` anywhere is a Time Machine backup.
/// 3. `EFI\APPLE` anywhere is an Apple firmware update.
/// 4. A file named `boot.efi`, `tmbootpicker.efi` or `bootmgfw.efi` is macOS, Time Machine or Windows.
///
/// Anything else is [`BootEntryType::UNKNOWN`], which may still be flagged generic.
#[must_use = "Has no effect if the result is unused"]
pub fn get_path_type(path: &str) -> PathType {
    let mut result = PathType {
        is_folder: path.ends_with('\\'),
        ..PathType::default()
    };

    if contains_ignore_case(path, "com.apple.recovery.boot") {
        result.entry_type = BootEntryType::APPLE_RECOVERY;
        return result;
    }
    if contains_ignore_case(path, "Backups.backupdb")
        || contains_ignore_case(path, ".timemachine")
    {
        result.entry_type = BootEntryType::APPLE_TIME_MACHINE;
        return result;
    }
    if contains_ignore_case(path, "EFI\\APPLE") {
        result.entry_type = BootEntryType::APPLE_FW_UPDATE;
        return result;
    }
    if let Some((_, entry_type)) = LOADER_NAMES
        .iter()
        .find(|(name, _)| ends_with_component(path, name))
    {
        result.entry_type = *entry_type;
        return result;
    }

    let generic = removable_media_path().trim_start_matches("\\EFI\\BOOT\\");
    result.is_generic = ends_with_component(path, generic);
    result
}

/// Classifies a loader by the file path stored in its device path.
///
/// Paths without a file path node are [`BootEntryType::UNKNOWN`].
#[must_use = "Has no effect if the result is unused"]
pub fn get_boot_device_path_type(path: &DevicePathBuf) -> PathType {
    path.file_path()
        .filter(|p| !p.is_empty())
        .map_or_else(PathType::default, |p| get_path_type(&p))
}
