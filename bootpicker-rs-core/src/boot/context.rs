// SPDX-FileCopyrightText: 2025 some100 <ootinnyoo@outlook.com>
// SPDX-License-Identifier: MIT

//! Building the [`BootContext`], the set of every entry found on every filesystem.
//!
//! A full scan visits every filesystem handle that passes the scan policy, while a default scan only visits the
//! filesystems that `BootOrder` points to. Both end by choosing the default entry.

use alloc::{boxed::Box, string::String, vec::Vec};
use log::{debug, info, warn};
use uefi::{Guid, Handle, runtime::VariableVendor};

use crate::{
    BootResult,
    boot::{
        action::SystemAction,
        classify::BootEntryType,
        config::PickerConfig,
        default_entry::{
            DefaultEntryRecord, choose_default_entry, default_scan_handles, read_boot_order,
        },
        policy::check_handle,
        scan::{ProviderQuery, apfs::link_recovery, bless_overrides, scan_filesystem},
    },
    config::{
        materialize_custom_entries,
        providers::{BootEntryProvider, builtin_providers},
    },
    system::{
        device_path::DevicePathBuf,
        firmware::Firmware,
        variable::{OC_VENDOR_VARIABLE_GUID, VariableStore, boot_order::BootOrder},
    },
};

/// A bootable entry, or a built-in action.
#[derive(Clone, Debug, Default)]
pub struct BootEntry {
    /// The full device path of the loader. Tools from the configuration resolve it at load time.
    pub device_path: Option<DevicePathBuf>,

    /// The action run instead of loading an image.
    pub action: Option<SystemAction>,

    /// A stable identifier, such as the loader path or a provider id.
    pub id: String,

    /// The display name.
    pub name: String,

    /// The directory of the loader with its trailing backslash, or the path of a tool.
    pub path_name: String,

    /// The content flavour used to pick icons.
    pub flavour: String,

    /// The kind of the entry.
    pub entry_type: BootEntryType,

    /// The position of the entry in the menu, if it is shown.
    pub entry_index: Option<usize>,

    /// The entry lives on an external device.
    pub is_external: bool,

    /// The loader path names a folder that holds a disk image.
    pub is_folder: bool,

    /// The loader is the removable media fallback, like `\EFI\BOOT\BOOTX64.EFI`.
    pub is_generic: bool,

    /// The entry comes from the configuration.
    pub is_custom: bool,

    /// The entry comes from a [`BootEntryProvider`].
    pub is_boot_entry_protocol: bool,

    /// The entry is a macOS installer.
    pub is_apple_installer: bool,

    /// Persist the entry as the default once it loads.
    pub set_default: bool,

    /// Start the entry in text mode.
    pub launch_in_text: bool,

    /// Expose the device path of a tool to the image.
    pub expose_device_path: bool,

    /// Let the image see every variable.
    pub full_nvram_access: bool,

    /// Load a tool from its path even when the host can read it.
    pub real_path: bool,

    /// The entry is only shown when auxiliary entries are not hidden.
    pub auxiliary: bool,

    /// The unique partition GUID of the filesystem the entry lives on.
    pub partition_guid: Option<Guid>,

    /// The load options passed to the image.
    pub load_options: Option<String>,
}

impl BootEntry {
    /// Returns `true` if the entry is a tool rather than an operating system.
    #[must_use = "Has no effect if the result is unused"]
    pub const fn is_tool(&self) -> bool {
        self.entry_type.contains(BootEntryType::EXTERNAL_TOOL)
    }

    /// Returns `true` if the entry runs a built-in action.
    #[must_use = "Has no effect if the result is unused"]
    pub const fn is_system(&self) -> bool {
        self.entry_type.contains(BootEntryType::SYSTEM)
    }
}

/// The entries found on one filesystem.
#[derive(Clone, Debug, Default)]
pub struct BootFilesystem {
    /// The filesystem handle, or [`None`] for the custom entries.
    pub handle: Option<Handle>,

    /// The entries in scan order.
    pub entries: Vec<BootEntry>,

    /// The index of the filesystem that holds recovery for this one.
    pub recovery_fs: Option<usize>,

    /// The filesystem lives on an external device.
    pub external: bool,

    /// The picker itself was loaded from this filesystem.
    pub loader_fs: bool,

    /// The filesystem carries its own `\com.apple.recovery.boot` folder.
    pub has_self_recovery: bool,
}

/// The position of an entry in a [`BootContext`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct EntryRef {
    /// The index of the filesystem.
    pub fs: usize,

    /// The index of the entry within the filesystem.
    pub entry: usize,
}

/// Every entry found by a scan.
#[derive(Clone, Debug, Default)]
pub struct BootContext {
    /// The scanned filesystems, with the custom entries last.
    pub filesystems: Vec<BootFilesystem>,

    /// The namespace holding `BootOrder` and the boot options.
    pub boot_variable_guid: Guid,

    /// The chosen default entry.
    pub default_entry: Option<EntryRef>,
}

impl BootContext {
    /// Returns the number of entries on every filesystem.
    #[must_use = "Has no effect if the result is unused"]
    pub fn boot_entry_count(&self) -> usize {
        self.filesystems.iter().map(|fs| fs.entries.len()).sum()
    }

    /// Returns an entry.
    #[must_use = "Has no effect if the result is unused"]
    pub fn entry(&self, entry: EntryRef) -> Option<&BootEntry> {
        self.filesystems.get(entry.fs)?.entries.get(entry.entry)
    }

    /// Returns an entry mutably.
    pub fn entry_mut(&mut self, entry: EntryRef) -> Option<&mut BootEntry> {
        self.filesystems.get_mut(entry.fs)?.entries.get_mut(entry.entry)
    }

    /// Returns the default entry.
    #[must_use = "Has no effect if the result is unused"]
    pub fn default(&self) -> Option<&BootEntry> {
        self.entry(self.default_entry?)
    }

    /// Iterates over every entry with its position.
    pub fn entries(&self) -> impl Iterator<Item = (EntryRef, &BootEntry)> {
        self.filesystems.iter().enumerate().flat_map(|(fs, filesystem)| {
            filesystem
                .entries
                .iter()
                .enumerate()
                .map(move |(entry, e)| (EntryRef { fs, entry }, e))
        })
    }

    /// Returns the filesystem handle an entry lives on.
    #[must_use = "Has no effect if the result is unused"]
    pub fn handle_of(&self, entry: EntryRef) -> Option<Handle> {
        self.filesystems.get(entry.fs)?.handle
    }
}

/// The state that outlives a single scan.
pub struct PickerContext {
    /// The configuration.
    pub config: PickerConfig,

    /// The boot order read by the first scan that consumed `BootNext`.
    pub boot_order: Option<BootOrder>,

    /// The registered Boot Entry Protocol providers.
    pub providers: Vec<Box<dyn BootEntryProvider>>,
}

impl PickerContext {
    /// Creates a picker context with the built-in providers.
    #[must_use = "Has no effect if the result is unused"]
    pub fn new(config: PickerConfig) -> Self {
        Self {
            config,
            boot_order: None,
            providers: builtin_providers(),
        }
    }

    /// Returns the namespace holding `BootOrder` and the boot options.
    #[must_use = "Has no effect if the result is unused"]
    pub const fn boot_vendor(&self) -> VariableVendor {
        if self.config.custom_boot_guid {
            VariableVendor(OC_VENDOR_VARIABLE_GUID)
        } else {
            VariableVendor::GLOBAL_VARIABLE
        }
    }
}

/// Returns the handle of the filesystem the picker was loaded from.
fn loader_fs_handle(firmware: &dyn Firmware) -> Option<Handle> {
    firmware
        .loader_path()
        .and_then(|path| firmware.locate_filesystem(&path))
        .map(|(handle, _)| handle)
}

/// Appends the pseudo-filesystem holding the custom entries and the system entries.
fn push_custom_filesystem(
    picker: &PickerContext,
    firmware: &dyn Firmware,
    filesystems: &mut Vec<BootFilesystem>,
) {
    let entries = materialize_custom_entries(&picker.config, firmware);
    if !entries.is_empty() {
        filesystems.push(BootFilesystem {
            entries,
            ..BootFilesystem::default()
        });
    }
}

/// Scans one filesystem handle after checking the scan policy.
fn scan_handle(
    picker: &PickerContext,
    firmware: &dyn Firmware,
    handle: Handle,
    overrides: &[String],
    providers: ProviderQuery<'_>,
    loader_fs: Option<Handle>,
) -> Option<BootFilesystem> {
    let external = match check_handle(firmware, handle, picker.config.scan_policy) {
        Ok(external) => external,
        Err(e) => {
            debug!("Skipping filesystem {handle:?}: {e}");
            return None;
        }
    };

    match scan_filesystem(picker, firmware, handle, external, overrides, providers) {
        Ok(mut filesystem) => {
            filesystem.loader_fs = loader_fs == Some(handle);
            Some(filesystem)
        }
        Err(e) => {
            warn!("Could not scan filesystem {handle:?}: {e}");
            None
        }
    }
}

/// Scans every filesystem and chooses the default entry.
///
/// With `for_boot` set, `BootNext` is consumed so that it is honored only once.
///
/// # Errors
///
/// May return an `Error` if the filesystem handles could not be enumerated, or the boot order could not be read.
/// Failures on single filesystems are logged and skipped.
pub fn scan_for_boot_entries(
    picker: &mut PickerContext,
    firmware: &dyn Firmware,
    variables: &mut dyn VariableStore,
    for_boot: bool,
) -> BootResult<BootContext> {
    let handles = firmware.filesystem_handles()?;
    info!("Found {} potentially bootable filesystems", handles.len());

    let overrides = bless_overrides(&picker.config, variables);
    let loader_fs = loader_fs_handle(firmware);
    let mut filesystems: Vec<BootFilesystem> = handles
        .into_iter()
        .filter_map(|handle| {
            scan_handle(picker, firmware, handle, &overrides, ProviderQuery::All, loader_fs)
        })
        .collect();

    link_recovery(firmware, &mut filesystems);
    push_custom_filesystem(picker, firmware, &mut filesystems);

    let mut context = BootContext {
        filesystems,
        boot_variable_guid: picker.boot_vendor().0,
        default_entry: None,
    };
    info!("Scanning got {} entries", context.boot_entry_count());

    let order = read_boot_order(picker, variables, for_boot)?;
    let record = DefaultEntryRecord::load(variables);
    context.default_entry = choose_default_entry(
        picker,
        firmware,
        variables,
        &mut context,
        order.as_ref(),
        record.as_ref(),
        true,
    )?;
    Ok(context)
}

/// Scans only the filesystems that the boot order points to, and chooses the default entry among them.
///
/// With `use_boot_next_only`, or `default_only_boot_next` in the configuration, only `BootNext` is considered.
/// Boot Entry Protocol providers are only asked for the remembered default. Finding no default is not an error.
///
/// # Errors
///
/// May return an `Error` if the boot order could not be read.
pub fn scan_for_default_boot_entry(
    picker: &mut PickerContext,
    firmware: &dyn Firmware,
    variables: &mut dyn VariableStore,
    use_boot_next_only: bool,
) -> BootResult<BootContext> {
    let boot_next_only = use_boot_next_only || picker.config.default_only_boot_next;
    let order = read_boot_order(picker, variables, true)?
        .map(|order| restrict_to_boot_next(order, boot_next_only))
        .filter(|order| !order.options.is_empty());
    let record = DefaultEntryRecord::load(variables);

    let overrides = bless_overrides(&picker.config, variables);
    let loader_fs = loader_fs_handle(firmware);
    let handles = order
        .as_ref()
        .map(|order| default_scan_handles(picker, firmware, variables, order))
        .unwrap_or_default();
    debug!("Default scan visits {} filesystems", handles.len());

    let mut filesystems: Vec<BootFilesystem> = handles
        .into_iter()
        .filter_map(|handle| {
            let providers = match record.as_ref() {
                Some(record) if record.partition_guid() == firmware.partition_guid(handle) => {
                    ProviderQuery::Only(&record.id)
                }
                _ => ProviderQuery::Skip,
            };
            scan_handle(picker, firmware, handle, &overrides, providers, loader_fs)
        })
        .collect();
    push_custom_filesystem(picker, firmware, &mut filesystems);

    let mut context = BootContext {
        filesystems,
        boot_variable_guid: picker.boot_vendor().0,
        default_entry: None,
    };
    context.default_entry = choose_default_entry(
        picker,
        firmware,
        variables,
        &mut context,
        order.as_ref(),
        record.as_ref(),
        false,
    )?;
    Ok(context)
}

/// Keeps only `BootNext` in a boot order when asked to.
fn restrict_to_boot_next(mut order: BootOrder, boot_next_only: bool) -> BootOrder {
    if boot_next_only {
        if order.has_boot_next {
            order.options.truncate(1);
        } else {
            order.options.clear();
        }
    }
    order
}
