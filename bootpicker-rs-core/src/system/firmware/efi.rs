// SPDX-FileCopyrightText: 2025 some100 <ootinnyoo@outlook.com>
// SPDX-License-Identifier: MIT

//! [`Firmware`] and [`Volume`] on top of UEFI boot services.

use core::cell::RefCell;

use alloc::{boxed::Box, string::String, vec::Vec};
use log::debug;
use uefi::{
    Guid, Handle, Status,
    boot::{self, LoadImageSource, ScopedProtocol, SearchType},
    proto::{
        BootPolicy,
        device_path::{
            DevicePath,
            text::{AllowShortcuts, DevicePathFromText, DevicePathToText, DisplayOnly},
        },
        loaded_image::LoadedImage,
        media::{fs::SimpleFileSystem, partition::PartitionInfo},
    },
    runtime::{self, ResetType},
};

use crate::{
    BootResult,
    error::BootError,
    system::{
        apple::{self, ApfsInfo},
        device_path::{DevicePathBuf, DevicePathError},
        firmware::{Firmware, Volume},
        fs::{DirEntry, UefiFileSystem},
        helper::str_to_cstr,
    },
};

/// An instance of [`LoadOptions`] that remains for the lifetime of the program.
/// This is because load options must last long enough so that it can be safely
/// passed into [`LoadedImage::set_load_options`].
static LOAD_OPTIONS: LoadOptions = LoadOptions {
    options: RefCell::new(None),
};

/// Storage for the UCS-2 load options of the image that is about to be started.
struct LoadOptions {
    /// [`RefCell`] wrapper around the load options.
    options: RefCell<Option<Vec<u16>>>,
}

impl LoadOptions {
    /// Replaces the stored options and points the image at them.
    fn set_load_options(&self, image: &mut ScopedProtocol<LoadedImage>, options: Vec<u16>) {
        let mut stored = self.options.borrow_mut();
        let stored = stored.insert(options);
        // it is quite unlikely that the load options will literally exceed 4 gb in length, so its safe to truncate
        let size = u32::try_from(stored.len() * 2).unwrap_or(u32::MAX);
        // SAFETY: this should ONLY be used with a static cell, as the pointer must last long enough for the loaded image to use it
        unsafe {
            image.set_load_options(stored.as_ptr().cast::<u8>(), size);
        }
    }
}

// SAFETY: uefi is a single threaded environment, thread safety is irrelevant
unsafe impl Sync for LoadOptions {}

/// Converts a uefi [`DevicePath`] into an owned [`DevicePathBuf`].
fn to_buf(path: &DevicePath) -> Result<DevicePathBuf, DevicePathError> {
    DevicePathBuf::from_bytes(path.as_bytes())
}

/// Borrows a [`DevicePathBuf`] as a uefi [`DevicePath`].
fn as_uefi(path: &DevicePathBuf) -> BootResult<&DevicePath> {
    <&DevicePath>::try_from(path.as_bytes()).map_err(|_| BootError::InvalidParameter)
}

/// The firmware of the running system.
#[derive(Default)]
pub struct UefiFirmware;

impl UefiFirmware {
    /// Constructs a new [`UefiFirmware`].
    #[must_use = "Has no effect if the result is unused"]
    pub const fn new() -> Self {
        Self
    }
}

impl Firmware for UefiFirmware {
    fn filesystem_handles(&self) -> BootResult<Vec<Handle>> {
        Ok(boot::locate_handle_buffer(SearchType::from_proto::<SimpleFileSystem>())?.to_vec())
    }

    fn device_path(&self, handle: Handle) -> Option<DevicePathBuf> {
        let path = boot::open_protocol_exclusive::<DevicePath>(handle).ok()?;
        to_buf(&path)
            .map_err(|e| debug!("Handle has a malformed device path: {e}"))
            .ok()
    }

    fn partition_type(&self, handle: Handle) -> Option<Guid> {
        let info = boot::open_protocol_exclusive::<PartitionInfo>(handle).ok()?;
        info.gpt_partition_entry()
            .map(|entry| entry.partition_type_guid.0)
    }

    fn open_volume(&self, handle: Handle) -> BootResult<Box<dyn Volume + '_>> {
        Ok(Box::new(UefiVolume(UefiFileSystem::from_handle(handle)?)))
    }

    fn text_to_device_path(&self, text: &str) -> BootResult<DevicePathBuf> {
        let handle = boot::get_handle_for_protocol::<DevicePathFromText>()?;
        let from_text = boot::open_protocol_exclusive::<DevicePathFromText>(handle)?;
        let text = str_to_cstr(text)?;
        let path = from_text
            .convert_text_to_device_path(&text)
            .map_err(|_| DevicePathError::FromText)?;
        Ok(to_buf(&path)?)
    }

    fn device_path_to_text(&self, path: &DevicePathBuf) -> BootResult<String> {
        let handle = boot::get_handle_for_protocol::<DevicePathToText>()?;
        let to_text = boot::open_protocol_exclusive::<DevicePathToText>(handle)?;
        let text = to_text.convert_device_path_to_text(
            as_uefi(path)?,
            DisplayOnly(false),
            AllowShortcuts(false),
        )?;
        Ok(String::from(&*text))
    }

    fn image_handle(&self) -> Handle {
        boot::image_handle()
    }

    fn loader_path(&self) -> Option<DevicePathBuf> {
        let image = boot::open_protocol_exclusive::<LoadedImage>(boot::image_handle()).ok()?;
        let file = to_buf(image.file_path()?).ok()?;
        let root = self.device_path(image.device()?)?;
        Some(root.append_path(&file))
    }

    fn load_image(
        &self,
        parent: Handle,
        path: &DevicePathBuf,
        source: Option<&[u8]>,
    ) -> BootResult<Handle> {
        let device_path = as_uefi(path)?;
        let src = match source {
            Some(buffer) => LoadImageSource::FromBuffer {
                buffer,
                file_path: Some(device_path),
            },
            None => LoadImageSource::FromDevicePath {
                device_path,
                boot_policy: BootPolicy::ExactMatch,
            },
        };
        Ok(boot::load_image(parent, src)?)
    }

    fn set_load_options(&self, image: Handle, options: Vec<u16>) -> BootResult<()> {
        let mut loaded = boot::open_protocol_exclusive::<LoadedImage>(image)?;
        LOAD_OPTIONS.set_load_options(&mut loaded, options);
        Ok(())
    }

    fn start_image(&self, image: Handle) -> BootResult<()> {
        Ok(boot::start_image(image)?)
    }

    fn unload_image(&self, image: Handle) -> BootResult<()> {
        Ok(boot::unload_image(image)?)
    }

    fn enter_text_mode(&self) {
        if let Err(e) = uefi::system::with_stdout(|stdout| stdout.reset(false)) {
            debug!("Could not reset the console: {e}");
        }
    }

    fn stall(&self, micros: usize) {
        boot::stall(micros);
    }

    fn reset_system(&self, kind: ResetType) {
        runtime::reset(kind, Status::SUCCESS, None);
    }
}

/// A [`Volume`] backed by [`UefiFileSystem`].
pub struct UefiVolume(UefiFileSystem);

impl Volume for UefiVolume {
    fn exists(&mut self, path: &str) -> bool {
        self.0.exists(path)
    }

    fn is_directory(&mut self, path: &str) -> bool {
        self.0.is_directory(path)
    }

    fn read(&mut self, path: &str, max_size: usize) -> BootResult<Vec<u8>> {
        Ok(self.0.read(path, max_size)?)
    }

    fn read_dir(&mut self, path: &str) -> BootResult<Vec<DirEntry>> {
        Ok(self.0.read_dir(path)?)
    }

    fn volume_label(&mut self) -> Option<String> {
        self.0.get_volume_label().ok()
    }

    fn blessed_file(&mut self) -> Option<Vec<u8>> {
        apple::read_blessed_file(&mut self.0.root().ok()?)
    }

    fn blessed_folder(&mut self) -> Option<Vec<u8>> {
        apple::read_blessed_folder(&mut self.0.root().ok()?)
    }

    fn apfs_info(&mut self) -> Option<ApfsInfo> {
        apple::read_apfs_info(&mut self.0.root().ok()?).ok()
    }
}
