// SPDX-FileCopyrightText: 2025 some100 <ootinnyoo@outlook.com>
// SPDX-License-Identifier: MIT

//! Finding the loaders on one filesystem.
//!
//! The blessed file, the blessed folder, the bless overrides and the predefined paths are tried in that order, and
//! the first one that exists is the loader of the filesystem. APFS preboot volumes then add one loader per sibling
//! volume. Every loader is described into a [`BootEntry`], and the registered providers add theirs.

use alloc::{string::String, vec::Vec};
use log::{debug, warn};
use uefi::{Handle, cstr16, runtime::VariableVendor};

use crate::{
    BootResult,
    boot::{
        config::PickerConfig,
        context::{BootEntry, BootFilesystem, PickerContext},
        loader::dmg::find_dmg,
    },
    error::BootError,
    system::{
        device_path::DevicePathBuf,
        firmware::{Firmware, Volume},
        helper::{join_path, normalize_path, removable_media_path},
        variable::{OC_VENDOR_VARIABLE_GUID, VariableStore, get_variable_ucs2},
    },
};

pub mod apfs;
pub mod chain;
pub mod describe;

use chain::Chain;
use describe::describe_entry;

/// The macOS loader.
pub const APPLE_BOOTER_PATH: &str = "\\System\\Library\\CoreServices\\boot.efi";

/// The Windows boot manager.
pub const WINDOWS_BOOTER_PATH: &str = "\\EFI\\Microsoft\\Boot\\bootmgfw.efi";

/// The folder holding a recovery loader or disk image next to an operating system.
pub const SELF_RECOVERY_PATH: &str = "\\com.apple.recovery.boot\\";

/// The file name that macOS loaders are known by.
const APPLE_BOOTER_NAME: &str = "boot.efi";

/// Which Boot Entry Protocol providers are asked during a scan.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ProviderQuery<'a> {
    /// Every entry of every provider.
    All,

    /// Only the entry with this id.
    Only(&'a str),

    /// No provider at all.
    Skip,
}

/// Returns the paths tried when nothing is blessed, in priority order.
#[must_use = "Has no effect if the result is unused"]
pub const fn predefined_paths() -> [&'static str; 4] {
    [
        APPLE_BOOTER_PATH,
        WINDOWS_BOOTER_PATH,
        removable_media_path(),
        "\\boot.efi",
    ]
}

/// Collects the bless overrides of the configuration and of the `bless-override` variable.
///
/// The variable holds UCS-2 paths separated by `;`.
#[must_use = "Has no effect if the result is unused"]
pub fn bless_overrides(config: &PickerConfig, variables: &dyn VariableStore) -> Vec<String> {
    let mut overrides = config.bless_override.clone();

    let vendor = VariableVendor(OC_VENDOR_VARIABLE_GUID);
    match get_variable_ucs2(variables, cstr16!("bless-override"), &vendor) {
        Ok(Some(value)) => {
            for path in value.split(';').map(str::trim).filter(|p| !p.is_empty()) {
                let path = normalize_path(path);
                if !overrides.iter().any(|o| o.eq_ignore_ascii_case(&path)) {
                    overrides.push(path);
                }
            }
        }
        Ok(None) => (),
        Err(e) => warn!("Ignoring bless-override: {e}"),
    }
    overrides
}

/// Checks if two loader paths name the same file, ignoring case.
pub(crate) fn same_loader(a: &DevicePathBuf, b: &DevicePathBuf) -> bool {
    a.root_prefix() == b.root_prefix()
        && match (a.file_path(), b.file_path()) {
            (Some(a), Some(b)) => a.eq_ignore_ascii_case(&b),
            (None, None) => true,
            _ => false,
        }
}

/// Appends a path unless it is already present.
pub(crate) fn push_unique(paths: &mut Vec<DevicePathBuf>, path: DevicePathBuf) {
    if !paths.iter().any(|p| same_loader(p, &path)) {
        paths.push(path);
    }
}

/// Reads a blessed device path and returns its file path, if the file exists on the volume.
fn blessed_path(raw: Option<Vec<u8>>, volume: &mut dyn Volume) -> BootResult<String> {
    let raw = raw.ok_or(BootError::NotFound)?;
    let path = DevicePathBuf::from_bytes(&raw)?
        .file_path()
        .filter(|p| !p.is_empty())
        .ok_or(BootError::InvalidParameter)?;
    if volume.exists(&path) {
        Ok(path)
    } else {
        debug!("Blessed path {path} does not exist");
        Err(BootError::NotFound)
    }
}

/// Returns the first of `paths` that exists on the volume.
fn first_existing<'a>(
    volume: &mut dyn Volume,
    paths: impl IntoIterator<Item = &'a str>,
) -> BootResult<String> {
    paths
        .into_iter()
        .find(|path| volume.exists(path) && !volume.is_directory(path))
        .map(String::from)
        .ok_or(BootError::NotFound)
}

/// Finds the first predefined path under a directory, such as `\{GUID}` on an APFS preboot volume.
pub(crate) fn find_predefined(volume: &mut dyn Volume, dir: &str) -> BootResult<String> {
    let candidates: Vec<String> = predefined_paths()
        .into_iter()
        .map(|path| if dir.is_empty() { String::from(path) } else { join_path(dir, path) })
        .collect();
    first_existing(volume, candidates.iter().map(String::as_str))
}

/// Finds the loaders on a filesystem, as full device paths.
///
/// A filesystem without any loader yields an empty list.
///
/// # Errors
///
/// May return an `Error` if the filesystem has no device path, or a lookup ran out of memory.
pub fn discover_loader_paths(
    firmware: &dyn Firmware,
    handle: Handle,
    volume: &mut dyn Volume,
    overrides: &[String],
) -> BootResult<Vec<DevicePathBuf>> {
    let root = firmware.device_path(handle).ok_or(BootError::NotFound)?;

    let found = Chain::new()
        .attempt("Blessed file", || {
            let raw = volume.blessed_file();
            blessed_path(raw, volume)
        })
        .attempt("Blessed folder", || {
            let raw = volume.blessed_folder().ok_or(BootError::NotFound)?;
            let folder = DevicePathBuf::from_bytes(&raw)?
                .file_path()
                .ok_or(BootError::InvalidParameter)?;
            first_existing(volume, [join_path(&folder, APPLE_BOOTER_NAME).as_str()])
        })
        .attempt("Bless override", || {
            first_existing(volume, overrides.iter().map(String::as_str))
        })
        .attempt("Predefined path", || find_predefined(volume, ""))
        .finish();

    let mut paths = Vec::new();
    match found {
        Ok(path) => paths.push(root.append_file_path(&path)?),
        Err(e) if e.is_not_found() => debug!("No loader on {handle:?}"),
        Err(e) => return Err(e),
    }

    for path in apfs::preboot_paths(firmware, volume, &root) {
        push_unique(&mut paths, path);
    }
    Ok(paths)
}

/// Returns the recovery loader in `\com.apple.recovery.boot`, or the folder itself if it only holds a disk image.
fn self_recovery_path(
    volume: &mut dyn Volume,
    root: &DevicePathBuf,
) -> BootResult<Option<DevicePathBuf>> {
    let booter = join_path(SELF_RECOVERY_PATH, APPLE_BOOTER_NAME);
    if volume.exists(&booter) {
        return Ok(Some(root.append_file_path(&booter)?));
    }
    match find_dmg(volume, SELF_RECOVERY_PATH) {
        Ok(_) => Ok(Some(root.append_file_path(SELF_RECOVERY_PATH)?)),
        Err(e) if e.is_out_of_resources() => Err(e),
        Err(_) => Ok(None),
    }
}

/// Scans one filesystem into a [`BootFilesystem`].
///
/// A filesystem with no entries is not an error.
///
/// # Errors
///
/// May return an `Error` if the filesystem could not be opened, or has no device path.
pub fn scan_filesystem(
    picker: &PickerContext,
    firmware: &dyn Firmware,
    handle: Handle,
    external: bool,
    overrides: &[String],
    providers: ProviderQuery<'_>,
) -> BootResult<BootFilesystem> {
    let root = firmware.device_path(handle).ok_or(BootError::NotFound)?;
    let partition_guid = firmware.partition_guid(handle);
    let mut volume = firmware.open_volume(handle)?;

    let mut paths = discover_loader_paths(firmware, handle, &mut *volume, overrides)?;
    let has_self_recovery = volume.is_directory(SELF_RECOVERY_PATH);
    if has_self_recovery && let Some(path) = self_recovery_path(&mut *volume, &root)? {
        push_unique(&mut paths, path);
    }

    let mut filesystem = BootFilesystem {
        handle: Some(handle),
        external,
        has_self_recovery,
        ..BootFilesystem::default()
    };

    for path in paths {
        match describe_entry(&mut *volume, &path) {
            Ok(Some(mut entry)) => {
                entry.is_external = external;
                entry.partition_guid = partition_guid;
                debug!(
                    "Entry {} is {} at {} ({:?})",
                    filesystem.entries.len(),
                    entry.name,
                    entry.path_name,
                    entry.entry_type
                );
                filesystem.entries.push(entry);
            }
            Ok(None) => debug!("Entry at {path:?} is disabled"),
            Err(e) if e.is_out_of_resources() => return Err(e),
            Err(e) => debug!("Dropping entry at {path:?}: {e}"),
        }
    }

    let default_id = match providers {
        ProviderQuery::All => None,
        ProviderQuery::Only(id) => Some(id),
        ProviderQuery::Skip => return Ok(filesystem),
    };
    for provider in &picker.providers {
        let entries = match provider.get_entries(&mut *volume, handle, default_id) {
            Ok(entries) => entries,
            Err(e) => {
                warn!("{}: {e}", provider.name());
                continue;
            }
        };
        for entry in entries {
            let id = entry.id.clone();
            match entry.into_boot_entry(&root, partition_guid, external) {
                Ok(entry) => filesystem.entries.push(entry),
                Err(e) => warn!("{}: dropping entry {id}: {e}", provider.name()),
            }
        }
    }

    Ok(filesystem)
}

/// Returns the entry on a filesystem whose loader is `path`.
pub(crate) fn find_entry<'a>(
    entries: &'a [BootEntry],
    path: &DevicePathBuf,
) -> Option<&'a BootEntry> {
    entries
        .iter()
        .find(|entry| entry.device_path.as_ref().is_some_and(|p| same_loader(p, path)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        boot::{
            classify::BootEntryType,
            context::scan_for_boot_entries,
            policy::{APFS_PARTITION_TYPE, ScanPolicy},
        },
        system::{
            apple::{ApfsInfo, ApfsVolumeRole},
            device_path::fixtures,
            firmware::mock::{MockFirmware, MockVolume},
            helper::has_guid_prefix,
            variable::{BOOT_OPTION_ATTRIBUTES, MemoryVariableStore},
        },
    };
    use uefi::{Guid, guid};

    fn paths_of(
        firmware: &MockFirmware,
        handle: Handle,
        overrides: &[String],
    ) -> BootResult<Vec<String>> {
        let mut volume = firmware.open_volume(handle)?;
        Ok(discover_loader_paths(firmware, handle, &mut *volume, overrides)?
            .iter()
            .filter_map(DevicePathBuf::file_path)
            .collect())
    }

    #[test]
    fn test_blessed_file_wins() -> BootResult<()> {
        let blessed = DevicePathBuf::new_file_path("\\EFI\\custom\\loader.efi")?;
        let mut firmware = MockFirmware::default();
        let handle = firmware.add_fs(
            fixtures::sata_partition(1, guid!("11111111-1111-1111-1111-111111111111")),
            None,
            MockVolume::default()
                .with_file("\\EFI\\custom\\loader.efi", b"MZ")
                .with_file(WINDOWS_BOOTER_PATH, b"MZ")
                .with_blessed_file(blessed.as_bytes()),
        );
        assert_eq!(paths_of(&firmware, handle, &[])?, ["\\EFI\\custom\\loader.efi"]);
        Ok(())
    }

    #[test]
    fn test_blessed_file_entry() -> BootResult<()> {
        let blessed = DevicePathBuf::new_file_path("\\foo\\bar.efi")?;
        let mut firmware = MockFirmware::default();
        let handle = firmware.add_fs(
            fixtures::sata_partition(1, guid!("11111111-1111-1111-1111-111111111111")),
            None,
            MockVolume::default()
                .with_label("Data")
                .with_file("\\foo\\bar.efi", b"MZ")
                .with_file(APPLE_BOOTER_PATH, b"MZ")
                .with_file(WINDOWS_BOOTER_PATH, b"MZ")
                .with_blessed_file(blessed.as_bytes()),
        );
        let picker = PickerContext::new(PickerConfig::default());
        let filesystem =
            scan_filesystem(&picker, &firmware, handle, false, &[], ProviderQuery::Skip)?;

        assert_eq!(filesystem.entries.len(), 1);
        let entry = &filesystem.entries[0];
        assert_eq!(entry.id, "\\foo\\bar.efi");
        assert_eq!(entry.path_name, "\\foo\\");
        assert_eq!(entry.name, "Data");
        assert_eq!(entry.entry_type, BootEntryType::UNKNOWN);
        Ok(())
    }

    #[test]
    fn test_fallthrough_order() -> BootResult<()> {
        let missing = DevicePathBuf::new_file_path("\\nope.efi")?;
        let mut firmware = MockFirmware::default();
        let handle = firmware.add_fs(
            fixtures::sata_partition(1, guid!("11111111-1111-1111-1111-111111111111")),
            None,
            MockVolume::default()
                .with_blessed_file(missing.as_bytes())
                .with_blessed_folder(b"\x7f")
                .with_file("\\EFI\\over\\ride.efi", b"MZ")
                .with_file(WINDOWS_BOOTER_PATH, b"MZ"),
        );

        assert_eq!(paths_of(&firmware, handle, &[])?, [WINDOWS_BOOTER_PATH]);
        let overrides = [String::from("\\EFI\\over\\ride.efi")];
        assert_eq!(paths_of(&firmware, handle, &overrides)?, ["\\EFI\\over\\ride.efi"]);
        Ok(())
    }

    #[test]
    fn test_blessed_folder() -> BootResult<()> {
        let folder = DevicePathBuf::new_file_path("\\System\\Library\\CoreServices")?;
        let mut firmware = MockFirmware::default();
        let handle = firmware.add_fs(
            fixtures::sata_partition(2, guid!("11111111-1111-1111-1111-111111111111")),
            None,
            MockVolume::default()
                .with_file(APPLE_BOOTER_PATH, b"MZ")
                .with_blessed_folder(folder.as_bytes()),
        );
        assert_eq!(paths_of(&firmware, handle, &[])?, [APPLE_BOOTER_PATH]);
        Ok(())
    }

    #[test]
    fn test_empty_filesystem() -> BootResult<()> {
        let mut firmware = MockFirmware::default();
        let handle = firmware.add_fs(
            fixtures::sata_partition(1, guid!("11111111-1111-1111-1111-111111111111")),
            None,
            MockVolume::default().with_label("DATA"),
        );
        let picker = PickerContext::new(PickerConfig::default());
        let filesystem =
            scan_filesystem(&picker, &firmware, handle, false, &[], ProviderQuery::All)?;
        assert!(filesystem.entries.is_empty());
        Ok(())
    }

    #[test]
    fn test_self_recovery() -> BootResult<()> {
        let mut firmware = MockFirmware::default();
        let handle = firmware.add_fs(
            fixtures::usb_partition(1, guid!("11111111-1111-1111-1111-111111111111")),
            None,
            MockVolume::default()
                .with_label("Install")
                .with_file("\\com.apple.recovery.boot\\BaseSystem.dmg", b"koly")
                .with_file("\\com.apple.recovery.boot\\.contentDetails", b"macOS Base System"),
        );
        let picker = PickerContext::new(PickerConfig::default());
        let filesystem =
            scan_filesystem(&picker, &firmware, handle, true, &[], ProviderQuery::Skip)?;

        assert!(filesystem.has_self_recovery);
        assert_eq!(filesystem.entries.len(), 1);
        let entry = &filesystem.entries[0];
        assert_eq!(entry.name, "macOS Base System");
        assert_eq!(entry.entry_type, BootEntryType::APPLE_RECOVERY);
        assert!(entry.is_folder && entry.is_external);
        Ok(())
    }

    #[cfg(feature = "linux")]
    #[test]
    fn test_provider_entries() -> BootResult<()> {
        let mut firmware = MockFirmware::default();
        let guid = guid!("11111111-1111-1111-1111-111111111111");
        let handle = firmware.add_fs(
            fixtures::sata_partition(1, guid),
            None,
            MockVolume::default()
                .with_file("\\loader\\entries\\arch.conf", b"title Arch\nlinux /vmlinuz\n")
                .with_file("\\loader\\entries\\lts.conf", b"title LTS\nlinux /vmlinuz-lts\n")
                .with_file("\\vmlinuz", b"MZ")
                .with_file("\\vmlinuz-lts", b"MZ"),
        );
        let picker = PickerContext::new(PickerConfig::default());

        let all = scan_filesystem(&picker, &firmware, handle, false, &[], ProviderQuery::All)?;
        assert_eq!(all.entries.len(), 2);
        assert!(
            all.entries
                .iter()
                .all(|e| e.is_boot_entry_protocol && e.partition_guid == Some(guid))
        );

        let only =
            scan_filesystem(&picker, &firmware, handle, false, &[], ProviderQuery::Only("lts"))?;
        assert_eq!(only.entries.len(), 1);
        assert_eq!(only.entries[0].name, "LTS");
        Ok(())
    }

    #[test]
    fn test_system_volume_booted_from_preboot() -> BootResult<()> {
        let container = guid!("aaaaaaaa-0000-0000-0000-000000000000");
        let system = guid!("5b7c1d2e-0000-4000-8000-00000000abcd");
        let info = |volume: Guid, role| ApfsInfo {
            container,
            volume,
            role,
        };
        let sys_dir = apfs::volume_dir(system);

        let mut firmware = MockFirmware::default();
        let preboot = firmware.add_fs(
            fixtures::sata_partition(2, guid!("00000000-0000-0000-0000-0000000000a1")),
            Some(APFS_PARTITION_TYPE),
            MockVolume::default()
                .with_apfs(info(
                    guid!("00000000-0000-0000-0000-0000000000f1"),
                    ApfsVolumeRole::PREBOOT,
                ))
                .with_file(&join_path(&sys_dir, APPLE_BOOTER_PATH), b"MZ")
                .with_file(
                    &join_path(&sys_dir, "System\\Library\\CoreServices\\.contentDetails"),
                    b"Macintosh HD",
                ),
        );
        let sealed = firmware.add_fs(
            fixtures::sata_partition(2, guid!("00000000-0000-0000-0000-0000000000a2")),
            Some(APFS_PARTITION_TYPE),
            MockVolume::default()
                .with_label("Macintosh HD")
                .with_apfs(info(system, ApfsVolumeRole::SYSTEM)),
        );

        let mut picker = PickerContext::new(PickerConfig {
            scan_policy: ScanPolicy::DEFAULT,
            ..PickerConfig::default()
        });
        let mut variables = MemoryVariableStore::new();
        let context = scan_for_boot_entries(&mut picker, &firmware, &mut variables, false)?;

        let on = |handle: Handle| {
            context
                .filesystems
                .iter()
                .find(|fs| fs.handle == Some(handle))
                .map(|fs| fs.entries.as_slice())
        };
        assert_eq!(on(sealed).map(<[BootEntry]>::len), Some(0));
        let entries = on(preboot).ok_or(BootError::NotFound)?;
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].name, "Macintosh HD");
        assert_eq!(entries[0].entry_type, BootEntryType::APPLE_OS);
        assert!(has_guid_prefix(&entries[0].id));
        assert!(entries[0].id.starts_with(&sys_dir));
        Ok(())
    }

    #[test]
    fn test_bless_overrides_from_nvram() -> BootResult<()> {
        let mut variables = MemoryVariableStore::new();
        let value: Vec<u8> = "/EFI/a.efi; \\EFI\\B.efi;\\efi\\b.efi\0"
            .encode_utf16()
            .flat_map(u16::to_le_bytes)
            .collect();
        variables.set(
            cstr16!("bless-override"),
            &VariableVendor(OC_VENDOR_VARIABLE_GUID),
            BOOT_OPTION_ATTRIBUTES,
            &value,
        )?;
        let config = PickerConfig {
            bless_override: alloc::vec![String::from("\\EFI\\c.efi")],
            ..PickerConfig::default()
        };
        assert_eq!(
            bless_overrides(&config, &variables),
            ["\\EFI\\c.efi", "\\EFI\\a.efi", "\\EFI\\B.efi"]
        );
        Ok(())
    }
}
