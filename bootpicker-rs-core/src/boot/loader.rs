// SPDX-FileCopyrightText: 2025 some100 <ootinnyoo@outlook.com>
// SPDX-License-Identifier: MIT

//! Loading a chosen entry.
//!
//! This mainly provides [`load_boot_entry`], which turns a [`BootEntry`] into a loaded image, or runs its
//! [`SystemAction`]. [`start_entry`] then hands control to the image.

use alloc::{string::String, vec::Vec};
use log::{debug, error, info, warn};
use thiserror::Error;
use uefi::Handle;

use crate::{
    BootResult,
    boot::{
        action::SystemAction,
        args::{append_arguments_to_load_options, check_argument_from_env},
        classify::BootEntryType,
        context::{BootContext, BootEntry, EntryRef, PickerContext},
        default_entry::set_default_entry,
        scan::apfs::get_apfs_recovery_path,
        services::HostServices,
    },
    error::BootError,
    system::{
        device_path::DevicePathBuf,
        firmware::Firmware,
        helper::{has_guid_prefix, str_to_ucs2_with_nul},
        variable::VariableStore,
    },
};

pub mod chunklist;
pub mod dmg;

/// An `Error` that may result from loading an entry.
#[derive(Error, Debug)]
pub enum LoadError {
    /// A `SYSTEM` entry did not carry an action.
    #[error("Entry \"{0}\" is a system entry without an action")]
    MissingAction(String),

    /// An entry had no device path when one was required.
    #[error("Entry \"{0}\" has no device path")]
    MissingDevicePath(String),

    /// The recovery of an APFS entry could not be found at load time.
    #[error("Recovery for \"{0}\" could not be found")]
    RecoveryNotFound(String),
}

/// An image that was loaded but not started.
#[derive(Clone, Debug)]
pub struct LoadedImage {
    /// The image handle.
    pub handle: Handle,

    /// The device path the image was loaded from.
    pub device_path: DevicePathBuf,

    /// The front end should switch to text mode before starting the image.
    pub launch_in_text: bool,

    /// The image should see every variable.
    pub full_nvram_access: bool,

    /// The image lives in a mounted disk image.
    pub from_disk_image: bool,
}

/// The result of loading an entry.
#[derive(Clone, Debug)]
pub enum LoadedEntry {
    /// An image ready to start.
    Image(LoadedImage),

    /// A system action that already ran.
    Action(SystemAction),
}

/// Where an image comes from.
struct ImageSource {
    /// The device path to load, or report for a buffer.
    device_path: DevicePathBuf,

    /// The image itself, when it was not read by the firmware.
    buffer: Option<Vec<u8>>,

    /// The device path points into a mounted disk image.
    mounted: bool,
}

/// Resolves the path of a tool on the filesystem the picker was loaded from.
fn tool_path(firmware: &dyn Firmware, entry: &BootEntry) -> BootResult<DevicePathBuf> {
    if let Some(path) = &entry.device_path {
        return Ok(path.clone());
    }
    let root = firmware
        .loader_path()
        .ok_or_else(|| LoadError::MissingDevicePath(entry.name.clone()))?
        .root_prefix();
    Ok(root.append_file_path(&entry.path_name)?)
}

/// Finds the image of a tool, preferring the host reader unless the entry wants its real path.
fn tool_source(
    services: &mut dyn HostServices,
    firmware: &dyn Firmware,
    entry: &BootEntry,
) -> BootResult<ImageSource> {
    let real_path = tool_path(firmware, entry)?;
    let reader = if entry.real_path { None } else { services.custom_reader() };
    let Some(reader) = reader else {
        return Ok(ImageSource {
            device_path: real_path,
            buffer: None,
            mounted: false,
        });
    };

    let image = reader.read(entry)?;
    let device_path = match image.device_path {
        Some(path) => path,
        None if entry.expose_device_path => real_path,
        None => DevicePathBuf::new_file_path(&entry.path_name)?,
    };
    Ok(ImageSource {
        device_path,
        buffer: Some(image.data),
        mounted: false,
    })
}

/// Re-resolves the recovery of an APFS entry, whose loader lives on a sibling volume.
fn resolve_apfs_recovery(
    firmware: &dyn Firmware,
    handle: Option<Handle>,
    entry: &mut BootEntry,
) -> BootResult<()> {
    let Some(file_path) = entry.device_path.as_ref().and_then(DevicePathBuf::file_path) else {
        return Ok(());
    };
    let Some(handle) = handle.filter(|_| has_guid_prefix(&file_path)) else {
        return Ok(());
    };

    match get_apfs_recovery_path(firmware, handle, &file_path) {
        Ok((_, path)) => {
            entry.is_folder = path.file_path().is_some_and(|p| p.ends_with('\\'));
            entry.device_path = Some(path);
            Ok(())
        }
        Err(e) => {
            warn!("Recovery of {} is gone: {e}", entry.name);
            Err(LoadError::RecoveryNotFound(entry.name.clone()).into())
        }
    }
}

/// Finds where the image of an entry comes from.
fn image_source(
    picker: &PickerContext,
    services: &mut dyn HostServices,
    firmware: &dyn Firmware,
    entry: &BootEntry,
) -> BootResult<ImageSource> {
    if entry.is_folder {
        let device_path = dmg::load_dmg(picker.config.dmg_loading, services, firmware, entry)?;
        return Ok(ImageSource {
            device_path,
            buffer: None,
            mounted: true,
        });
    }
    if entry.is_tool() {
        return tool_source(services, firmware, entry);
    }
    Ok(ImageSource {
        device_path: entry
            .device_path
            .clone()
            .ok_or_else(|| LoadError::MissingDevicePath(entry.name.clone()))?,
        buffer: None,
        mounted: false,
    })
}

/// Returns the load options of an entry.
///
/// Apple entries get the configured boot arguments, followed by their own options.
fn load_options(picker: &PickerContext, entry: &BootEntry) -> Option<String> {
    let options = if entry.entry_type.intersects(BootEntryType::APPLE_ANY) {
        let boot_args = [picker.config.boot_args.as_str()];
        append_arguments_to_load_options(entry.load_options.as_deref(), &boot_args, false)
    } else {
        entry.load_options.clone().unwrap_or_default()
    };
    Some(options).filter(|options| !options.is_empty())
}

/// Checks whether an Apple entry boots verbosely, from its options or the `boot-args` variable.
fn is_verbose_boot(
    entry: &BootEntry,
    options: Option<&str>,
    variables: &dyn VariableStore,
) -> bool {
    entry.entry_type.intersects(BootEntryType::APPLE_ANY)
        && check_argument_from_env(options, variables, "-v").is_some()
}

/// Drops the disk image after a failed load or start.
fn unmount(services: &mut dyn HostServices, firmware: &dyn Firmware, mounted: bool) {
    if mounted && let Some(mounter) = services.disk_image_mounter() {
        mounter.unmount(firmware);
    }
}

/// Loads an image and sets its load options.
fn load_image(
    firmware: &dyn Firmware,
    entry: &BootEntry,
    source: &ImageSource,
    options: Option<&str>,
    parent: Handle,
) -> BootResult<Handle> {
    let handle = firmware.load_image(parent, &source.device_path, source.buffer.as_deref())?;

    if let Some(options) = options {
        debug!("Passing \"{options}\" to {}", entry.name);
        let result = str_to_ucs2_with_nul(options)
            .map_err(BootError::from)
            .and_then(|options| firmware.set_load_options(handle, options));
        if let Err(e) = result {
            if let Err(unload) = firmware.unload_image(handle) {
                warn!("Could not unload {}: {unload}", entry.name);
            }
            return Err(e);
        }
    }
    Ok(handle)
}

/// Loads an entry of a context.
///
/// A `SYSTEM` entry runs its action. Other entries are loaded from their device path, from a disk image for folder
/// entries, or from the host reader for tools. Nothing is written to NVRAM unless the load succeeds, in which case an
/// entry marked `set_default` is persisted as the default.
///
/// # Errors
///
/// May return an `Error` if the entry does not exist, its image could not be found or loaded, or the policy refused it.
pub fn load_boot_entry(
    picker: &PickerContext,
    services: &mut dyn HostServices,
    firmware: &dyn Firmware,
    variables: &mut dyn VariableStore,
    context: &BootContext,
    position: EntryRef,
    parent: Handle,
) -> BootResult<LoadedEntry> {
    let mut entry = context.entry(position).ok_or(BootError::InvalidParameter)?.clone();

    if entry.is_system() {
        let action = entry.action.ok_or_else(|| LoadError::MissingAction(entry.name.clone()))?;
        info!("Running {action:?} for {}", entry.name);
        action.run(firmware, variables);
        return Ok(LoadedEntry::Action(action));
    }

    if entry.entry_type.contains(BootEntryType::APPLE_RECOVERY) {
        resolve_apfs_recovery(firmware, context.handle_of(position), &mut entry)?;
    }

    let source = image_source(picker, services, firmware, &entry)?;
    info!("Loading {} from {:?}", entry.name, source.device_path);
    let options = load_options(picker, &entry);
    let handle = match load_image(firmware, &entry, &source, options.as_deref(), parent) {
        Ok(handle) => handle,
        Err(e) => {
            unmount(services, firmware, source.mounted);
            return Err(e);
        }
    };

    if entry.set_default
        && picker.config.allow_set_default
        && let Err(e) = set_default_entry(picker, firmware, variables, &entry)
    {
        error!("Could not make {} the default: {e}", entry.name);
    }

    let verbose = is_verbose_boot(&entry, options.as_deref(), &*variables);
    Ok(LoadedEntry::Image(LoadedImage {
        handle,
        device_path: source.device_path,
        launch_in_text: entry.launch_in_text || verbose,
        full_nvram_access: entry.full_nvram_access,
        from_disk_image: source.mounted,
    }))
}

/// Lifts or restores the NVRAM restrictions of the host, returning `false` if it has none.
fn set_nvram_access(services: &mut dyn HostServices, full: bool) -> bool {
    match services.nvram_protection() {
        Some(protection) => {
            protection.set_full_access(full);
            true
        }
        None => false,
    }
}

/// Starts a loaded entry, through the host image starter if there is one.
///
/// Before handing off, the console is switched to text mode if the image wants it, the NVRAM restrictions are lifted
/// for images with full access, and the configured takeoff delay passes. A system action has already run, so starting
/// it does nothing. An image that fails to start is unloaded.
///
/// # Errors
///
/// May return an `Error` if the image could not be started, or returned an error.
pub fn start_entry(
    picker: &PickerContext,
    services: &mut dyn HostServices,
    firmware: &dyn Firmware,
    loaded: &LoadedEntry,
) -> BootResult<()> {
    let LoadedEntry::Image(image) = loaded else {
        return Ok(());
    };
    if image.launch_in_text {
        firmware.enter_text_mode();
    }
    let lifted = image.full_nvram_access && set_nvram_access(services, true);

    let delay = picker.config.takeoff_delay;
    if delay > 0 {
        debug!("Ready for takeoff in {delay} us");
        firmware.stall(delay);
    }

    let result = match services.image_starter() {
        Some(starter) => starter.start(firmware, image.handle),
        None => firmware.start_image(image.handle),
    };
    if lifted {
        set_nvram_access(services, false);
    }
    if let Err(e) = result {
        warn!("Image {:?} failed to start: {e}", image.handle);
        if let Err(unload) = firmware.unload_image(image.handle) {
            warn!("Could not unload {:?}: {unload}", image.handle);
        }
        unmount(services, firmware, image.from_disk_image);
        return Err(e);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        boot::{
            config::{DmgLoading, PickerConfig},
            context::BootFilesystem,
            services::{NoHostServices, fakes::FakeServices},
        },
        config::builder::BootEntryBuilder,
        system::{
            device_path::fixtures,
            firmware::mock::{MockFirmware, MockVolume},
            helper::ucs2_to_string,
            variable::{
                APPLE_BOOT_VARIABLE_GUID, BOOT_OPTION_ATTRIBUTES, MemoryVariableStore,
                boot_order::{DEFAULT_OPTION, get_boot_option},
            },
        },
    };
    use alloc::vec;
    use uefi::{Guid, cstr16, guid, runtime::VariableVendor};

    const GUID: Guid = guid!("44444444-4444-4444-4444-444444444444");

    struct Fixture {
        firmware: MockFirmware,
        picker: PickerContext,
        variables: MemoryVariableStore,
        root: DevicePathBuf,
    }

    fn fixture() -> Fixture {
        let mut firmware = MockFirmware::default();
        let root = fixtures::sata_partition(1, GUID);
        let volume = MockVolume::default().with_file("\\EFI\\tools\\Shell.efi", b"MZ");
        firmware.add_fs(root.clone(), None, volume);
        firmware.loader_path = root.append_file_path("\\EFI\\bootpicker\\picker.efi").ok();
        let config = PickerConfig {
            boot_args: String::from("-v keepsyms=1"),
            ..PickerConfig::default()
        };
        Fixture {
            firmware,
            picker: PickerContext::new(config),
            variables: MemoryVariableStore::new(),
            root,
        }
    }

    fn context(entries: Vec<BootEntry>) -> BootContext {
        BootContext {
            filesystems: vec![BootFilesystem {
                entries,
                ..BootFilesystem::default()
            }],
            ..<BootContext as Default>::default()
        }
    }

    const FIRST: EntryRef = EntryRef { fs: 0, entry: 0 };

    fn load(
        f: &Fixture,
        services: &mut dyn HostServices,
        context: &BootContext,
    ) -> BootResult<LoadedEntry> {
        let mut variables = f.variables.clone();
        let parent = f.firmware.image_handle();
        load_boot_entry(&f.picker, services, &f.firmware, &mut variables, context, FIRST, parent)
    }

    fn options(firmware: &MockFirmware) -> Vec<String> {
        firmware
            .options
            .borrow()
            .iter()
            .map(|(_, units)| ucs2_to_string(units).unwrap_or_default())
            .collect()
    }

    #[test]
    fn test_apple_entry_gets_boot_args() -> BootResult<()> {
        let f = fixture();
        let path = f.root.append_file_path("\\System\\Library\\CoreServices\\boot.efi")?;
        let context = context(vec![
            BootEntryBuilder::new("macOS", BootEntryType::APPLE_OS)
                .device_path(path.clone())
                .build(),
        ]);

        let LoadedEntry::Image(image) = load(&f, &mut NoHostServices, &context)? else {
            panic!("expected an image");
        };
        assert_eq!(image.device_path, path);
        assert_eq!(f.firmware.loads.borrow()[0].path, path);
        assert_eq!(options(&f.firmware), ["-v keepsyms=1"]);
        Ok(())
    }

    #[test]
    fn test_apple_options_follow_boot_args() -> BootResult<()> {
        let f = fixture();
        let path = f.root.append_file_path("\\EFI\\Microsoft\\Boot\\bootmgfw.efi")?;
        let context = context(vec![
            BootEntryBuilder::new("Windows", BootEntryType::WINDOWS)
                .device_path(path.clone())
                .build(),
        ]);
        load(&f, &mut NoHostServices, &context)?;
        assert!(options(&f.firmware).is_empty());

        let context = self::context(vec![
            BootEntryBuilder::new("macOS", BootEntryType::APPLE_OS)
                .device_path(path)
                .load_options("-s")
                .build(),
        ]);
        load(&f, &mut NoHostServices, &context)?;
        assert_eq!(options(&f.firmware), ["-v keepsyms=1 -s"]);
        Ok(())
    }

    #[test]
    fn test_tool_from_reader() -> BootResult<()> {
        let f = fixture();
        let context = context(vec![
            BootEntryBuilder::new("Shell", BootEntryType::EXTERNAL_TOOL)
                .path_name("\\EFI\\tools\\Shell.efi")
                .build(),
        ]);

        load(&f, &mut NoHostServices, &context)?;
        let mut services = FakeServices {
            custom_image: Some(vec![0x4D, 0x5A]),
            ..FakeServices::default()
        };
        load(&f, &mut services, &context)?;

        let loads = f.firmware.loads.borrow();
        assert_eq!(loads[0].path, f.root.append_file_path("\\EFI\\tools\\Shell.efi")?);
        assert!(!loads[0].from_buffer);
        assert!(loads[1].from_buffer);
        assert_eq!(loads[1].path.file_path().as_deref(), Some("\\EFI\\tools\\Shell.efi"));
        assert!(loads[1].path.hard_drive().is_none());
        Ok(())
    }

    #[test]
    fn test_real_path_skips_reader() -> BootResult<()> {
        let f = fixture();
        let context = context(vec![
            BootEntryBuilder::new("Shell", BootEntryType::EXTERNAL_TOOL)
                .path_name("\\EFI\\tools\\Shell.efi")
                .real_path(true)
                .build(),
        ]);
        let mut services = FakeServices {
            custom_image: Some(vec![0x4D, 0x5A]),
            ..FakeServices::default()
        };
        load(&f, &mut services, &context)?;
        assert!(!f.firmware.loads.borrow()[0].from_buffer);
        Ok(())
    }

    #[test]
    fn test_failed_load_unmounts() -> BootResult<()> {
        let mut f = fixture();
        f.firmware.add_fs(
            fixtures::sata_partition(2, guid!("55555555-5555-5555-5555-555555555555")),
            None,
            MockVolume::default().with_file("\\com.apple.recovery.boot\\BaseSystem.dmg", b"koly"),
        );
        f.firmware.fail_load = true;
        f.picker.config.dmg_loading = DmgLoading::Any;
        let folder = f.firmware.filesystems[1]
            .device_path
            .append_file_path("\\com.apple.recovery.boot\\")?;
        let context = context(vec![
            BootEntryBuilder::new("Recovery", BootEntryType::APPLE_RECOVERY)
                .device_path(folder)
                .folder(true)
                .build(),
        ]);
        let mut services = FakeServices {
            mount_path: Some(DevicePathBuf::new_file_path(
                "\\System\\Library\\CoreServices\\boot.efi",
            )?),
            ..FakeServices::default()
        };

        assert!(load(&f, &mut services, &context).is_err());
        assert_eq!(services.mounted, [4]);
        assert_eq!(services.unmounted, 1);
        Ok(())
    }

    #[test]
    fn test_system_entry_runs_action() -> BootResult<()> {
        let f = fixture();
        let context = context(vec![
            BootEntryBuilder::new("Reset NVRAM", BootEntryType::SYSTEM)
                .action(SystemAction::ResetNvram)
                .build(),
        ]);
        let loaded = load(&f, &mut NoHostServices, &context)?;
        assert!(matches!(loaded, LoadedEntry::Action(SystemAction::ResetNvram)));
        assert_eq!(f.firmware.resets.borrow().len(), 1);
        assert!(f.firmware.loads.borrow().is_empty());

        let context =
            self::context(vec![BootEntryBuilder::new("Broken", BootEntryType::SYSTEM).build()]);
        assert!(matches!(
            load(&f, &mut NoHostServices, &context),
            Err(BootError::LoadError(LoadError::MissingAction(_)))
        ));
        Ok(())
    }

    #[test]
    fn test_action_needs_system_type() -> BootResult<()> {
        let f = fixture();
        let context = context(vec![
            BootEntryBuilder::new("Tool", BootEntryType::EXTERNAL_OS)
                .action(SystemAction::ResetNvram)
                .build(),
        ]);
        assert!(matches!(
            load(&f, &mut NoHostServices, &context),
            Err(BootError::LoadError(LoadError::MissingDevicePath(_)))
        ));
        assert!(f.firmware.resets.borrow().is_empty());
        Ok(())
    }

    #[test]
    fn test_set_default_after_load() -> BootResult<()> {
        let mut f = fixture();
        f.picker.config.allow_set_default = true;
        let path = f.root.append_file_path("\\EFI\\Microsoft\\Boot\\bootmgfw.efi")?;
        let mut entry = BootEntryBuilder::new("Windows", BootEntryType::WINDOWS)
            .device_path(path)
            .build();
        entry.set_default = true;
        let context = context(vec![entry]);

        let parent = f.firmware.image_handle();
        load_boot_entry(
            &f.picker,
            &mut NoHostServices,
            &f.firmware,
            &mut f.variables,
            &context,
            FIRST,
            parent,
        )?;
        let vendor = f.picker.boot_vendor();
        assert!(get_boot_option(&f.variables, &vendor, DEFAULT_OPTION, false)?.is_some());

        f.firmware.fail_load = true;
        let mut untouched = MemoryVariableStore::new();
        let failed = load_boot_entry(
            &f.picker,
            &mut NoHostServices,
            &f.firmware,
            &mut untouched,
            &context,
            FIRST,
            parent,
        );
        assert!(failed.is_err());
        assert!(untouched.is_empty());
        Ok(())
    }

    #[test]
    fn test_start_entry() -> BootResult<()> {
        let mut f = fixture();
        let path = f.root.append_file_path("\\EFI\\Microsoft\\Boot\\bootmgfw.efi")?;
        let context = context(vec![
            BootEntryBuilder::new("Windows", BootEntryType::WINDOWS).device_path(path).build(),
        ]);

        let loaded = load(&f, &mut NoHostServices, &context)?;
        start_entry(&f.picker, &mut NoHostServices, &f.firmware, &loaded)?;
        assert_eq!(f.firmware.started.borrow().len(), 1);

        let mut services = FakeServices {
            started: Some(Vec::new()),
            ..FakeServices::default()
        };
        start_entry(&f.picker, &mut services, &f.firmware, &loaded)?;
        assert_eq!(services.started.as_ref().map(Vec::len), Some(1));
        assert_eq!(f.firmware.started.borrow().len(), 1);

        f.firmware.fail_start = true;
        assert!(start_entry(&f.picker, &mut NoHostServices, &f.firmware, &loaded).is_err());
        assert_eq!(f.firmware.unloaded.borrow().len(), 1);
        Ok(())
    }

    #[test]
    fn test_start_prepares_handoff() -> BootResult<()> {
        let mut f = fixture();
        f.picker.config.takeoff_delay = 250;
        let context = context(vec![
            BootEntryBuilder::new("Shell", BootEntryType::EXTERNAL_TOOL)
                .path_name("\\EFI\\tools\\Shell.efi")
                .launch_in_text(true)
                .full_nvram_access(true)
                .build(),
        ]);
        let mut services = FakeServices {
            nvram_access: Some(Vec::new()),
            ..FakeServices::default()
        };

        let loaded = load(&f, &mut services, &context)?;
        start_entry(&f.picker, &mut services, &f.firmware, &loaded)?;
        assert_eq!(f.firmware.text_mode.get(), 1);
        assert_eq!(*f.firmware.stalls.borrow(), [250]);
        assert_eq!(services.nvram_access, Some(vec![true, false]));
        assert_eq!(f.firmware.started.borrow().len(), 1);
        Ok(())
    }

    #[test]
    fn test_plain_start_keeps_console() -> BootResult<()> {
        let f = fixture();
        let path = f.root.append_file_path("\\EFI\\Microsoft\\Boot\\bootmgfw.efi")?;
        let context = context(vec![
            BootEntryBuilder::new("Windows", BootEntryType::WINDOWS).device_path(path).build(),
        ]);
        let mut services = FakeServices {
            nvram_access: Some(Vec::new()),
            ..FakeServices::default()
        };

        let loaded = load(&f, &mut services, &context)?;
        start_entry(&f.picker, &mut services, &f.firmware, &loaded)?;
        assert_eq!(f.firmware.text_mode.get(), 0);
        assert!(f.firmware.stalls.borrow().is_empty());
        assert_eq!(services.nvram_access, Some(Vec::new()));
        Ok(())
    }

    #[test]
    fn test_verbose_apple_boot_in_text() -> BootResult<()> {
        let mut f = fixture();
        f.picker.config.boot_args = String::new();
        let path = f.root.append_file_path("\\System\\Library\\CoreServices\\boot.efi")?;
        let context = context(vec![
            BootEntryBuilder::new("macOS", BootEntryType::APPLE_OS).device_path(path).build(),
        ]);
        let LoadedEntry::Image(image) = load(&f, &mut NoHostServices, &context)? else {
            panic!("expected an image");
        };
        assert!(!image.launch_in_text);

        f.variables.set(
            cstr16!("boot-args"),
            &VariableVendor(APPLE_BOOT_VARIABLE_GUID),
            BOOT_OPTION_ATTRIBUTES,
            b"keepsyms=1 -v\0",
        )?;
        let LoadedEntry::Image(image) = load(&f, &mut NoHostServices, &context)? else {
            panic!("expected an image");
        };
        assert!(image.launch_in_text);
        Ok(())
    }
}
