// SPDX-FileCopyrightText: 2025 some100 <ootinnyoo@outlook.com>
// SPDX-License-Identifier: MIT

//! APFS containers.
//!
//! A sealed macOS system cannot be booted from its own volume. Its loader lives on the preboot volume of the same
//! container, under a directory named after the volume UUID, and its recovery lives on the recovery volume under
//! the same name.

use alloc::{format, string::String, vec::Vec};
use log::{debug, warn};
use uefi::{Guid, Handle};

use crate::{
    BootResult,
    boot::{
        classify::BootEntryType,
        context::BootFilesystem,
        scan::{describe::describe_entry, find_entry, find_predefined},
    },
    config::builder::BootEntryBuilder,
    error::BootError,
    system::{
        apple::{ApfsInfo, ApfsVolumeRole},
        device_path::DevicePathBuf,
        firmware::{Firmware, Volume},
        helper::{dir_name, has_guid_prefix, join_path},
    },
};

/// Returns the directory a volume is known by on its preboot and recovery siblings, like `\{GUID}`.
#[must_use = "Has no effect if the result is unused"]
pub fn volume_dir(volume: Guid) -> String {
    format!("\\{volume}").to_ascii_uppercase()
}

/// Returns the APFS identity of every filesystem, skipping those that are not APFS.
fn apfs_volumes(firmware: &dyn Firmware) -> Vec<(Handle, ApfsInfo)> {
    let Ok(handles) = firmware.filesystem_handles() else {
        return Vec::new();
    };
    handles
        .into_iter()
        .filter_map(|handle| {
            let mut volume = firmware.open_volume(handle).ok()?;
            Some((handle, volume.apfs_info()?))
        })
        .collect()
}

/// Finds the loaders that a preboot volume holds for its siblings.
///
/// Volumes without the preboot role yield nothing.
pub fn preboot_paths(
    firmware: &dyn Firmware,
    volume: &mut dyn Volume,
    root: &DevicePathBuf,
) -> Vec<DevicePathBuf> {
    let Some(info) = volume.apfs_info() else {
        return Vec::new();
    };
    if !info.role.contains(ApfsVolumeRole::PREBOOT) {
        return Vec::new();
    }

    let mut paths = Vec::new();
    for (_, sibling) in apfs_volumes(firmware) {
        if sibling.container != info.container || sibling.volume == info.volume {
            continue;
        }

        let dir = volume_dir(sibling.volume);
        if !volume.is_directory(&dir) {
            continue;
        }
        match find_predefined(volume, &dir).and_then(|path| Ok(root.append_file_path(&path)?)) {
            Ok(path) => {
                debug!("Preboot has {path:?} for {}", sibling.volume);
                super::push_unique(&mut paths, path);
            }
            Err(e) => debug!("Preboot has no loader under {dir}: {e}"),
        }
    }
    paths
}

/// Finds the recovery of the APFS volume that `entry_path` was loaded for.
///
/// `entry_path` must start with the `{GUID}` directory of the volume. The recovery is looked up on the volume with
/// the recovery role in the same container, as `\{GUID}\boot.efi`, or as the `\{GUID}\` folder if it holds no loader.
///
/// # Errors
///
/// May return an `Error` if the path has no GUID prefix, the filesystem is not APFS, or there is no recovery.
pub fn get_apfs_recovery_path(
    firmware: &dyn Firmware,
    handle: Handle,
    entry_path: &str,
) -> BootResult<(Handle, DevicePathBuf)> {
    if !has_guid_prefix(entry_path) {
        return Err(BootError::InvalidParameter);
    }
    let trimmed = entry_path.trim_start_matches('\\');
    let dir = format!("\\{}\\", &trimmed[..36]);

    let container = firmware
        .open_volume(handle)?
        .apfs_info()
        .ok_or(BootError::Unsupported)?
        .container;

    for (candidate, info) in apfs_volumes(firmware) {
        if info.container != container || !info.role.contains(ApfsVolumeRole::RECOVERY) {
            continue;
        }

        let mut volume = firmware.open_volume(candidate)?;
        if !volume.is_directory(&dir) {
            continue;
        }
        let Some(root) = firmware.device_path(candidate) else {
            continue;
        };

        let booter = join_path(&dir, "boot.efi");
        let path = if volume.exists(&booter) { booter } else { dir.clone() };
        return Ok((candidate, root.append_file_path(&path)?));
    }

    Err(BootError::NotFound)
}

/// Points every APFS filesystem at the filesystem holding its recovery, adding the recovery entry if the scan did
/// not find it.
pub fn link_recovery(firmware: &dyn Firmware, filesystems: &mut [BootFilesystem]) {
    for index in 0..filesystems.len() {
        let filesystem = &filesystems[index];
        if filesystem.has_self_recovery {
            filesystems[index].recovery_fs = Some(index);
            continue;
        }
        let Some(handle) = filesystem.handle else {
            continue;
        };
        let Some(entry_path) = filesystem
            .entries
            .iter()
            .filter_map(|entry| entry.device_path.as_ref()?.file_path())
            .find(|path| has_guid_prefix(path))
        else {
            continue;
        };

        let found = get_apfs_recovery_path(firmware, handle, &entry_path);
        let (recovery_handle, recovery_path) = match found {
            Ok(found) => found,
            Err(e) => {
                debug!("No APFS recovery for {entry_path}: {e}");
                continue;
            }
        };
        let recovery_index = filesystems
            .iter()
            .position(|fs| fs.handle == Some(recovery_handle));
        let Some(recovery_index) = recovery_index else {
            debug!("Recovery for {entry_path} is on a filesystem that was not scanned");
            continue;
        };
        filesystems[index].recovery_fs = Some(recovery_index);

        let recovery = &mut filesystems[recovery_index];
        if find_entry(&recovery.entries, &recovery_path).is_none() {
            match recovery_entry(firmware, recovery_handle, &recovery_path) {
                Ok(mut entry) => {
                    entry.is_external = recovery.external;
                    recovery.entries.push(entry);
                }
                Err(e) => warn!("Could not describe recovery for {entry_path}: {e}"),
            }
        }
    }
}

/// Describes a recovery loader that the scan itself did not find.
fn recovery_entry(
    firmware: &dyn Firmware,
    handle: Handle,
    path: &DevicePathBuf,
) -> BootResult<crate::boot::context::BootEntry> {
    let mut volume = firmware.open_volume(handle)?;
    let mut entry = match describe_entry(&mut *volume, path) {
        Ok(Some(entry)) => entry,
        Ok(None) => return Err(BootError::NotFound),
        Err(e) if e.is_not_found() => {
            let file_path = path.file_path().unwrap_or_default();
            BootEntryBuilder::new("Recovery", BootEntryType::APPLE_RECOVERY)
                .path_name(dir_name(&file_path))
                .id(file_path.clone())
                .device_path(path.clone())
                .folder(file_path.ends_with('\\'))
                .build()
        }
        Err(e) => return Err(e),
    };
    entry.entry_type = BootEntryType::APPLE_RECOVERY;
    entry.flavour = String::from("AppleRecv");
    entry.partition_guid = firmware.partition_guid(handle);
    Ok(entry)
}
