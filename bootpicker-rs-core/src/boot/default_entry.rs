// SPDX-FileCopyrightText: 2025 some100 <ootinnyoo@outlook.com>
// SPDX-License-Identifier: MIT

//! Choosing the default entry from `BootOrder`, and persisting a new one.
//!
//! Each `Boot####` option in the boot order is matched against the scanned entries by device path. The first
//! option that matches decides the default. `BootNext` is the exception: it may point at any file on a scanned
//! filesystem, and the matching entry is redirected there.
//!
//! Boot Entry Protocol entries can share one image, so the id of such an entry is remembered in a
//! [`DefaultEntryRecord`] next to the boot option.

use alloc::{string::String, vec::Vec};
use log::{debug, error, info, warn};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uefi::{Guid, Handle, cstr16, runtime::VariableVendor};

use crate::{
    BootResult,
    boot::context::{BootContext, BootEntry, EntryRef, PickerContext},
    error::BootError,
    system::{
        device_path::DevicePathBuf,
        firmware::Firmware,
        variable::{
            BOOT_OPTION_ATTRIBUTES, OC_VENDOR_VARIABLE_GUID, VariableStore,
            boot_option::{LoadOption, LoadOptionAttributes},
            boot_order::{
                BootOrder, DEFAULT_OPTION, LAUNCHER_OPTION, consume_boot_next, get_boot_option,
                get_boot_order, move_to_front, set_boot_option, set_boot_order,
            },
        },
    },
};

/// An `Error` that may result from persisting the default entry.
#[derive(Error, Debug)]
pub enum DefaultEntryError {
    /// The record could not be encoded.
    #[error("Default entry record could not be encoded: {0}")]
    Record(postcard::Error),
}

/// The remembered default Boot Entry Protocol entry.
///
/// Stored with postcard in the `bootpicker-default-id` variable of the bootpicker namespace.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DefaultEntryRecord {
    /// The provider id of the entry.
    pub id: String,

    /// The unique partition GUID of the filesystem, or all zeroes if it has none.
    pub partition_guid: [u8; 16],

    /// The raw device path written into the boot option.
    pub device_path: Vec<u8>,
}

impl DefaultEntryRecord {
    /// Builds the record for a Boot Entry Protocol entry. Other entries have none.
    #[must_use = "Has no effect if the result is unused"]
    pub fn new(entry: &BootEntry) -> Option<Self> {
        if !entry.is_boot_entry_protocol {
            return None;
        }
        Some(Self {
            id: entry.id.clone(),
            partition_guid: entry.partition_guid.map_or([0; 16], |guid| guid.to_bytes()),
            device_path: entry.device_path.as_ref()?.as_bytes().to_vec(),
        })
    }

    /// Returns the partition GUID, if the record has one.
    #[must_use = "Has no effect if the result is unused"]
    pub fn partition_guid(&self) -> Option<Guid> {
        (self.partition_guid != [0; 16]).then(|| Guid::from_bytes(self.partition_guid))
    }

    /// Reads the record. A missing or unreadable record reads as [`None`].
    #[must_use = "Has no effect if the result is unused"]
    pub fn load(variables: &dyn VariableStore) -> Option<Self> {
        let vendor = VariableVendor(OC_VENDOR_VARIABLE_GUID);
        match variables.get(cstr16!("bootpicker-default-id"), &vendor) {
            Ok(Some((data, _))) => postcard::from_bytes(&data)
                .map_err(|e| warn!("Ignoring malformed default entry record: {e}"))
                .ok(),
            Ok(None) => None,
            Err(e) => {
                warn!("Could not read the default entry record: {e}");
                None
            }
        }
    }

    /// Writes the record.
    ///
    /// # Errors
    ///
    /// May return an `Error` if the record could not be encoded or written.
    pub fn store(&self, variables: &mut dyn VariableStore) -> BootResult<()> {
        let data = postcard::to_allocvec(self).map_err(DefaultEntryError::Record)?;
        variables.set(
            cstr16!("bootpicker-default-id"),
            &VariableVendor(OC_VENDOR_VARIABLE_GUID),
            BOOT_OPTION_ATTRIBUTES,
            &data,
        )
    }

    /// Deletes the record.
    ///
    /// # Errors
    ///
    /// May return an `Error` if the record exists but could not be deleted.
    pub fn clear(variables: &mut dyn VariableStore) -> BootResult<()> {
        variables.delete(cstr16!("bootpicker-default-id"), &VariableVendor(OC_VENDOR_VARIABLE_GUID))
    }
}

/// How a boot option matches an entry.
#[derive(Clone, Debug, PartialEq, Eq)]
enum OptionMatch {
    /// The option names the loader of the entry, or only its filesystem.
    Exact,

    /// The option names another file on the filesystem of the entry, which should be loaded instead.
    Redirect(DevicePathBuf),
}

/// Returns the filesystem root an option points into, and the nodes after it.
fn split_option(firmware: &dyn Firmware, option: &DevicePathBuf) -> (DevicePathBuf, DevicePathBuf) {
    let root = if option.is_short_form() {
        option.root_prefix()
    } else {
        firmware
            .locate_filesystem(option)
            .map_or_else(|| option.root_prefix(), |(_, root)| root)
    };
    let rest = root.strip_prefix_of(option).unwrap_or_default();
    (root, rest)
}

/// Matches a boot option against the device path of an entry.
fn match_option(
    firmware: &dyn Firmware,
    option: &DevicePathBuf,
    entry: &DevicePathBuf,
    is_boot_next: bool,
) -> Option<OptionMatch> {
    let (root, rest) = split_option(firmware, option);
    let entry_key = if option.is_short_form() {
        entry.hard_drive_suffix()?
    } else {
        entry.clone()
    };
    if root.is_empty() || entry_key.root_prefix() != root {
        return None;
    }

    let exact = match rest.file_path().filter(|p| !p.is_empty()) {
        None => true,
        Some(path) => entry_key.file_path().is_some_and(|p| p.eq_ignore_ascii_case(&path)),
    };
    if exact {
        Some(OptionMatch::Exact)
    } else if is_boot_next {
        Some(OptionMatch::Redirect(entry.root_prefix().append_path(&rest)))
    } else {
        None
    }
}

/// Checks if an option points at the picker itself, which must never become the default.
fn is_own_loader(firmware: &dyn Firmware, option: &DevicePathBuf) -> bool {
    let Some(loader) = firmware.loader_path() else {
        return false;
    };
    let loader = if option.is_short_form() {
        match loader.hard_drive_suffix() {
            Some(suffix) => suffix,
            None => return false,
        }
    } else {
        loader
    };
    crate::boot::scan::same_loader(option, &loader)
}

/// Reads a boot option, logging instead of failing.
fn read_option(
    variables: &dyn VariableStore,
    vendor: &VariableVendor,
    option: u16,
    require_active: bool,
) -> Option<LoadOption> {
    get_boot_option(variables, vendor, option, require_active)
        .map_err(|e| warn!("Could not read Boot{option:04X}: {e}"))
        .ok()
        .flatten()
}

/// Reads the boot order, consuming `BootNext` when scanning for boot.
///
/// The order read by the first scan that consumed `BootNext` is cached on the picker, so a rescan sees the same
/// `BootNext` even though it is gone from NVRAM.
///
/// # Errors
///
/// May return an `Error` if the variables exist but could not be read.
pub fn read_boot_order(
    picker: &mut PickerContext,
    variables: &mut dyn VariableStore,
    for_boot: bool,
) -> BootResult<Option<BootOrder>> {
    if let Some(order) = &picker.boot_order {
        return Ok(Some(order.clone()));
    }

    let vendor = picker.boot_vendor();
    let order = get_boot_order(variables, &vendor, true)?;
    if for_boot && let Some(order) = &order && order.has_boot_next {
        if let Err(e) = consume_boot_next(variables, &vendor) {
            error!("Could not delete BootNext: {e}");
        }
        picker.boot_order = Some(order.clone());
    }
    Ok(order)
}

/// Returns the filesystem handles that the boot order points into, in order and without repeats.
#[must_use = "Has no effect if the result is unused"]
pub fn default_scan_handles(
    picker: &PickerContext,
    firmware: &dyn Firmware,
    variables: &dyn VariableStore,
    order: &BootOrder,
) -> Vec<Handle> {
    let vendor = picker.boot_vendor();
    let mut handles = Vec::new();

    for (index, &number) in order.options.iter().enumerate() {
        let is_boot_next = order.has_boot_next && index == 0;
        let Some(option) = read_option(variables, &vendor, number, !is_boot_next) else {
            continue;
        };
        let path = &option.device_path;
        if path.is_apple_legacy_load_app() {
            continue;
        }

        let handle = if path.is_short_form() {
            let root = path.root_prefix();
            firmware.filesystem_handles().ok().and_then(|all| {
                all.into_iter().find(|&handle| {
                    firmware
                        .device_path(handle)
                        .and_then(|dp| dp.hard_drive_suffix())
                        .is_some_and(|suffix| suffix.root_prefix() == root)
                })
            })
        } else {
            firmware.locate_filesystem(path).map(|(handle, _)| handle)
        };

        match handle {
            Some(handle) if !handles.contains(&handle) => handles.push(handle),
            Some(_) => (),
            None => debug!("Boot{number:04X} points to no filesystem"),
        }
    }
    handles
}

/// Finds the entry that a boot option defaults to.
fn match_entries(
    firmware: &dyn Firmware,
    context: &BootContext,
    option: &LoadOption,
    is_boot_next: bool,
    record: Option<&DefaultEntryRecord>,
) -> Option<(EntryRef, OptionMatch)> {
    let path = &option.device_path;
    let candidates = || {
        context.entries().filter_map(|(position, entry)| {
            let found = match_option(firmware, path, entry.device_path.as_ref()?, is_boot_next)?;
            Some((position, entry, found))
        })
    };

    if let Some(record) = record.filter(|r| r.device_path == path.as_bytes()) {
        let by_id = candidates().find(|(_, entry, found)| {
            *found == OptionMatch::Exact
                && entry.is_boot_entry_protocol
                && entry.id == record.id
                && entry.partition_guid == record.partition_guid()
        });
        if let Some((position, _, found)) = by_id {
            return Some((position, found));
        }
    }

    candidates()
        .find(|(_, _, found)| *found == OptionMatch::Exact)
        .or_else(|| candidates().next())
        .map(|(position, _, found)| (position, found))
}

/// Chooses the default entry from the boot order.
///
/// If no option matches and `fallback` is set, the first shown entry that is not a tool or an action is chosen.
///
/// # Errors
///
/// This does not currently fail. Unreadable options are skipped.
pub fn choose_default_entry(
    picker: &PickerContext,
    firmware: &dyn Firmware,
    variables: &dyn VariableStore,
    context: &mut BootContext,
    order: Option<&BootOrder>,
    record: Option<&DefaultEntryRecord>,
    fallback: bool,
) -> BootResult<Option<EntryRef>> {
    let vendor = picker.boot_vendor();

    for (index, &number) in order.map(|o| &o.options[..]).unwrap_or_default().iter().enumerate() {
        let is_boot_next = order.is_some_and(|o| o.has_boot_next) && index == 0;
        let Some(option) = read_option(variables, &vendor, number, !is_boot_next) else {
            continue;
        };
        if option.device_path.is_apple_legacy_load_app() {
            debug!("Skipping Boot{number:04X}, the Apple legacy loader");
            continue;
        }
        if is_own_loader(firmware, &option.device_path) {
            debug!("Skipping Boot{number:04X}, the picker itself");
            continue;
        }

        let Some((position, found)) =
            match_entries(firmware, context, &option, is_boot_next, record)
        else {
            continue;
        };
        if let OptionMatch::Redirect(path) = found
            && let Some(entry) = context.entry_mut(position)
        {
            info!("BootNext redirects {} to {path:?}", entry.name);
            entry.device_path = Some(path);
        }
        debug!("Boot{number:04X} is the default");
        return Ok(Some(position));
    }

    if !fallback {
        return Ok(None);
    }
    let shown = || context.entries().filter(|(_, entry)| !entry.auxiliary && !entry.is_system());
    let chosen = shown()
        .find(|(_, entry)| !entry.is_tool())
        .or_else(|| shown().next())
        .map(|(position, _)| position);
    debug!("Falling back to {chosen:?} as the default");
    Ok(chosen)
}

/// Makes an entry the default in `BootOrder`.
///
/// A `Boot####` option that already points at the entry is moved to the front. Otherwise the entry is written to
/// `Boot0080`, which is then moved to the front.
///
/// # Errors
///
/// May return an `Error` if setting the default is not allowed, the entry has no device path, or the variables could
/// not be written.
pub fn set_default_entry(
    picker: &PickerContext,
    firmware: &dyn Firmware,
    variables: &mut dyn VariableStore,
    entry: &BootEntry,
) -> BootResult<()> {
    if !picker.config.allow_set_default {
        return Err(BootError::SecurityViolation);
    }
    let path = entry.device_path.as_ref().ok_or(BootError::InvalidParameter)?;
    let vendor = picker.boot_vendor();

    let order: Vec<u16> = get_boot_order(variables, &vendor, false)?
        .map(|order| order.options.to_vec())
        .unwrap_or_default();
    let existing = order.iter().copied().find(|&number| {
        read_option(variables, &vendor, number, true).is_some_and(|option| {
            !is_own_loader(firmware, &option.device_path)
                && match_option(firmware, &option.device_path, path, false).is_some()
                && split_option(firmware, &option.device_path).1.file_path().is_some()
        })
    });

    let number = match existing {
        Some(number) => number,
        None => {
            let option = LoadOption::new(LoadOptionAttributes::ACTIVE, &entry.name, path.clone());
            set_boot_option(variables, &vendor, DEFAULT_OPTION, &option)?;
            DEFAULT_OPTION
        }
    };
    set_boot_order(variables, &vendor, &move_to_front(&order, number))?;
    info!("Boot{number:04X} is now the default ({})", entry.name);

    match DefaultEntryRecord::new(entry) {
        Some(record) => record.store(variables),
        None => DefaultEntryRecord::clear(variables),
    }
}

/// Registers the picker as `Boot9696` and puts it first in `BootOrder`.
///
/// Nothing is written if the option and the order already match.
///
/// # Errors
///
/// May return an `Error` if the variables could not be read or written.
pub fn register_launcher_option(
    variables: &mut dyn VariableStore,
    vendor: &VariableVendor,
    loader_path: &DevicePathBuf,
    name: &str,
) -> BootResult<()> {
    let wanted = LoadOption::new(LoadOptionAttributes::ACTIVE, name, loader_path.clone());
    if get_boot_option(variables, vendor, LAUNCHER_OPTION, false)?.as_ref() != Some(&wanted) {
        set_boot_option(variables, vendor, LAUNCHER_OPTION, &wanted)?;
        info!("Registered the picker as Boot{LAUNCHER_OPTION:04X}");
    }

    let order = get_boot_order(variables, vendor, false)?.unwrap_or_default();
    if order.options.first() != Some(&LAUNCHER_OPTION) || order.deduplicated {
        set_boot_order(variables, vendor, &move_to_front(&order.options, LAUNCHER_OPTION))?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        boot::{classify::BootEntryType, config::PickerConfig, context::BootFilesystem},
        config::builder::BootEntryBuilder,
        system::{
            device_path::fixtures,
            firmware::mock::{MockFirmware, MockVolume},
            variable::{MemoryVariableStore, get_variable_u16_slice},
        },
    };
    use uefi::guid;

    const GLOBAL: VariableVendor = VariableVendor::GLOBAL_VARIABLE;
    const GUID1: Guid = guid!("11111111-1111-1111-1111-111111111111");
    const GUID2: Guid = guid!("22222222-2222-2222-2222-222222222222");

    struct Fixture {
        firmware: MockFirmware,
        context: BootContext,
        picker: PickerContext,
        variables: MemoryVariableStore,
    }

    fn entry(root: &DevicePathBuf, path: &str, name: &str) -> BootResult<BootEntry> {
        Ok(BootEntryBuilder::new(name, BootEntryType::UNKNOWN)
            .id(path)
            .device_path(root.append_file_path(path)?)
            .build())
    }

    fn fixture() -> BootResult<Fixture> {
        let mut firmware = MockFirmware::default();
        let root1 = fixtures::sata_partition(1, GUID1);
        let root2 = fixtures::sata_partition(2, GUID2);
        let h1 = firmware.add_fs(root1.clone(), None, MockVolume::default());
        let h2 = firmware.add_fs(root2.clone(), None, MockVolume::default());

        let context = BootContext {
            filesystems: alloc::vec![
                BootFilesystem {
                    handle: Some(h1),
                    entries: alloc::vec![entry(
                        &root1,
                        "\\EFI\\Microsoft\\Boot\\bootmgfw.efi",
                        "Windows"
                    )?],
                    ..BootFilesystem::default()
                },
                BootFilesystem {
                    handle: Some(h2),
                    entries: alloc::vec![entry(&root2, "\\EFI\\BOOT\\BOOTX64.EFI", "Linux")?],
                    ..BootFilesystem::default()
                },
            ],
            ..<BootContext as Default>::default()
        };
        let picker = PickerContext::new(PickerConfig {
            allow_set_default: true,
            ..PickerConfig::default()
        });
        Ok(Fixture {
            firmware,
            context,
            picker,
            variables: MemoryVariableStore::new(),
        })
    }

    fn add_option(
        variables: &mut MemoryVariableStore,
        number: u16,
        path: DevicePathBuf,
    ) -> BootResult<()> {
        let option = LoadOption::new(LoadOptionAttributes::ACTIVE, "opt", path);
        set_boot_option(variables, &GLOBAL, number, &option)
    }

    fn choose(f: &mut Fixture, fallback: bool) -> BootResult<Option<EntryRef>> {
        let order = get_boot_order(&f.variables, &GLOBAL, true)?;
        choose_default_entry(
            &f.picker,
            &f.firmware,
            &f.variables,
            &mut f.context,
            order.as_ref(),
            None,
            fallback,
        )
    }

    #[test]
    fn test_first_matching_option() -> BootResult<()> {
        let mut f = fixture()?;
        add_option(&mut f.variables, 1, DevicePathBuf::new_file_path("\\nowhere.efi")?)?;
        let removable =
            fixtures::sata_partition(2, GUID2).append_file_path("\\efi\\boot\\bootx64.efi")?;
        add_option(&mut f.variables, 2, removable)?;
        add_option(&mut f.variables, 3, fixtures::sata_partition(1, GUID1))?;
        set_boot_order(&mut f.variables, &GLOBAL, &[1, 2, 3])?;

        assert_eq!(choose(&mut f, false)?, Some(EntryRef { fs: 1, entry: 0 }));
        Ok(())
    }

    #[test]
    fn test_short_form_option() -> BootResult<()> {
        let mut f = fixture()?;
        let full = fixtures::sata_partition(1, GUID1)
            .append_file_path("\\EFI\\Microsoft\\Boot\\bootmgfw.efi")?;
        add_option(&mut f.variables, 7, full.hard_drive_suffix().ok_or(BootError::NotFound)?)?;
        set_boot_order(&mut f.variables, &GLOBAL, &[7])?;

        assert_eq!(choose(&mut f, false)?, Some(EntryRef { fs: 0, entry: 0 }));
        Ok(())
    }

    #[test]
    fn test_boot_next_redirects() -> BootResult<()> {
        let mut f = fixture()?;
        let other =
            fixtures::sata_partition(2, GUID2).append_file_path("\\EFI\\arch\\grubx64.efi")?;
        add_option(&mut f.variables, 9, other.clone())?;
        f.variables.set(cstr16!("BootNext"), &GLOBAL, BOOT_OPTION_ATTRIBUTES, &9u16.to_le_bytes())?;

        let chosen = choose(&mut f, false)?;
        assert_eq!(chosen, Some(EntryRef { fs: 1, entry: 0 }));
        let redirected = f
            .context
            .entry(EntryRef { fs: 1, entry: 0 })
            .and_then(|e| e.device_path.clone());
        assert_eq!(redirected, Some(other));
        Ok(())
    }

    #[test]
    fn test_boot_next_consumed_once() -> BootResult<()> {
        let mut f = fixture()?;
        f.variables.set(cstr16!("BootNext"), &GLOBAL, BOOT_OPTION_ATTRIBUTES, &9u16.to_le_bytes())?;

        let first = read_boot_order(&mut f.picker, &mut f.variables, true)?;
        assert!(first.as_ref().is_some_and(|o| o.has_boot_next));
        assert!(f.variables.get(cstr16!("BootNext"), &GLOBAL)?.is_none());

        let again = read_boot_order(&mut f.picker, &mut f.variables, true)?;
        assert_eq!(first, again);
        Ok(())
    }

    #[test]
    fn test_skips_own_loader() -> BootResult<()> {
        let mut f = fixture()?;
        let own = fixtures::sata_partition(1, GUID1)
            .append_file_path("\\EFI\\Microsoft\\Boot\\bootmgfw.efi")?;
        f.firmware.loader_path = Some(own.clone());
        add_option(&mut f.variables, 1, own)?;
        set_boot_order(&mut f.variables, &GLOBAL, &[1])?;

        assert_eq!(choose(&mut f, false)?, None);
        assert_eq!(choose(&mut f, true)?, Some(EntryRef { fs: 0, entry: 0 }));
        Ok(())
    }

    #[test]
    fn test_fallback_skips_auxiliary() -> BootResult<()> {
        let mut f = fixture()?;
        f.context.filesystems[0].entries[0].auxiliary = true;
        assert_eq!(choose(&mut f, true)?, Some(EntryRef { fs: 1, entry: 0 }));
        Ok(())
    }

    #[test]
    fn test_set_default_writes_boot0080() -> BootResult<()> {
        let mut f = fixture()?;
        set_boot_order(&mut f.variables, &GLOBAL, &[1, 2])?;
        let linux = f.context.filesystems[1].entries[0].clone();
        set_default_entry(&f.picker, &f.firmware, &mut f.variables, &linux)?;

        let order = get_variable_u16_slice(&f.variables, cstr16!("BootOrder"), &GLOBAL)?;
        assert_eq!(order.as_deref(), Some(&[DEFAULT_OPTION, 1, 2][..]));
        let option = get_boot_option(&f.variables, &GLOBAL, DEFAULT_OPTION, true)?
            .ok_or(BootError::NotFound)?;
        assert_eq!(option.description, "Linux");
        assert_eq!(Some(option.device_path), linux.device_path);
        Ok(())
    }

    #[test]
    fn test_set_default_reuses_option() -> BootResult<()> {
        let mut f = fixture()?;
        let windows_path = fixtures::sata_partition(1, GUID1)
            .append_file_path("\\EFI\\Microsoft\\Boot\\bootmgfw.efi")?;
        add_option(&mut f.variables, 4, windows_path)?;
        set_boot_order(&mut f.variables, &GLOBAL, &[1, 4])?;
        let windows = f.context.filesystems[0].entries[0].clone();
        set_default_entry(&f.picker, &f.firmware, &mut f.variables, &windows)?;

        let order = get_variable_u16_slice(&f.variables, cstr16!("BootOrder"), &GLOBAL)?;
        assert_eq!(order.as_deref(), Some(&[4, 1][..]));
        assert!(get_boot_option(&f.variables, &GLOBAL, DEFAULT_OPTION, false)?.is_none());
        Ok(())
    }

    #[test]
    fn test_set_default_refused() -> BootResult<()> {
        let mut f = fixture()?;
        f.picker.config.allow_set_default = false;
        let windows = f.context.filesystems[0].entries[0].clone();
        assert!(matches!(
            set_default_entry(&f.picker, &f.firmware, &mut f.variables, &windows),
            Err(BootError::SecurityViolation)
        ));
        assert!(f.variables.is_empty());

        f.picker.config.allow_set_default = true;
        let action = BootEntryBuilder::new("Reset NVRAM", BootEntryType::SYSTEM).build();
        assert!(matches!(
            set_default_entry(&f.picker, &f.firmware, &mut f.variables, &action),
            Err(BootError::InvalidParameter)
        ));
        Ok(())
    }

    #[test]
    fn test_record_picks_provider_entry() -> BootResult<()> {
        let mut f = fixture()?;
        let root = fixtures::sata_partition(2, GUID2);
        let kernel = root.append_file_path("\\vmlinuz")?;
        let provider_entry = |id: &str| {
            BootEntryBuilder::new(id, BootEntryType::EXTERNAL_OS)
                .id(id)
                .device_path(kernel.clone())
                .boot_entry_protocol(true)
                .partition_guid(GUID2)
                .build()
        };
        f.context.filesystems[1].entries =
            alloc::vec![provider_entry("arch"), provider_entry("lts")];

        let lts = f.context.filesystems[1].entries[1].clone();
        set_default_entry(&f.picker, &f.firmware, &mut f.variables, &lts)?;
        let record = DefaultEntryRecord::load(&f.variables).ok_or(BootError::NotFound)?;
        assert_eq!(record.id, "lts");
        assert_eq!(record.partition_guid(), Some(GUID2));

        let order = get_boot_order(&f.variables, &GLOBAL, true)?;
        let chosen = choose_default_entry(
            &f.picker,
            &f.firmware,
            &f.variables,
            &mut f.context,
            order.as_ref(),
            Some(&record),
            false,
        )?;
        assert_eq!(chosen, Some(EntryRef { fs: 1, entry: 1 }));
        Ok(())
    }

    #[test]
    fn test_default_scan_handles() -> BootResult<()> {
        let mut f = fixture()?;
        let full = fixtures::sata_partition(2, GUID2).append_file_path("\\EFI\\BOOT\\BOOTX64.EFI")?;
        add_option(&mut f.variables, 1, full.hard_drive_suffix().ok_or(BootError::NotFound)?)?;
        add_option(&mut f.variables, 2, full)?;
        add_option(&mut f.variables, 3, fixtures::sata_partition(1, GUID1))?;
        set_boot_order(&mut f.variables, &GLOBAL, &[1, 2, 3])?;
        let order = get_boot_order(&f.variables, &GLOBAL, false)?.ok_or(BootError::NotFound)?;

        let handles = default_scan_handles(&f.picker, &f.firmware, &f.variables, &order);
        let expected: Vec<Handle> = [1, 0]
            .iter()
            .map(|&i| f.firmware.filesystems[i].handle)
            .collect();
        assert_eq!(handles, expected);
        Ok(())
    }

    #[test]
    fn test_register_launcher_option() -> BootResult<()> {
        let mut variables = MemoryVariableStore::new();
        set_boot_order(&mut variables, &GLOBAL, &[3, LAUNCHER_OPTION, 4])?;
        let loader = fixtures::sata_partition(1, GUID1)
            .append_file_path("\\EFI\\bootpicker\\bootpicker.efi")?;
        register_launcher_option(&mut variables, &GLOBAL, &loader, "bootpicker")?;

        let order = get_variable_u16_slice(&variables, cstr16!("BootOrder"), &GLOBAL)?;
        assert_eq!(order.as_deref(), Some(&[LAUNCHER_OPTION, 3, 4][..]));

        let before = variables.clone();
        register_launcher_option(&mut variables, &GLOBAL, &loader, "bootpicker")?;
        assert_eq!(variables.len(), before.len());
        Ok(())
    }

    #[test]
    fn test_record_round_trip() -> BootResult<()> {
        let mut variables = MemoryVariableStore::new();
        let record = DefaultEntryRecord {
            id: String::from("arch"),
            partition_guid: GUID1.to_bytes(),
            device_path: fixtures::sata_partition(1, GUID1).as_bytes().to_vec(),
        };
        record.store(&mut variables)?;
        assert_eq!(DefaultEntryRecord::load(&variables), Some(record));
        DefaultEntryRecord::clear(&mut variables)?;
        assert_eq!(DefaultEntryRecord::load(&variables), None);
        Ok(())
    }
}
