// SPDX-FileCopyrightText: 2025 some100 <ootinnyoo@outlook.com>
// SPDX-License-Identifier: MIT

//! The seam between the boot engine and the firmware.
//!
//! The scanner, the default entry logic and the loader only talk to the firmware through [`Firmware`] and
//! [`Volume`]. [`efi::UefiFirmware`] implements them with boot services. Unit tests use the in-memory fakes
//! in `mock`.

use alloc::{boxed::Box, string::String, vec::Vec};
use uefi::{Guid, Handle, runtime::ResetType};

use crate::{
    BootResult,
    system::{apple::ApfsInfo, device_path::DevicePathBuf, fs::DirEntry},
};

pub mod efi;

#[cfg(test)]
pub(crate) mod mock;

/// Access to one mounted filesystem.
///
/// Paths are absolute, backslash separated and relative to the volume root.
pub trait Volume {
    /// Checks if a file or directory exists.
    fn exists(&mut self, path: &str) -> bool;

    /// Checks if a path exists and is a directory.
    fn is_directory(&mut self, path: &str) -> bool;

    /// Reads a whole file, refusing files larger than `max_size` bytes.
    ///
    /// # Errors
    ///
    /// May return an `Error` if the file does not exist, is too large, or could not be read.
    fn read(&mut self, path: &str, max_size: usize) -> BootResult<Vec<u8>>;

    /// Lists a directory.
    ///
    /// # Errors
    ///
    /// May return an `Error` if the directory does not exist or could not be read.
    fn read_dir(&mut self, path: &str) -> BootResult<Vec<DirEntry>>;

    /// Returns the volume label, if the filesystem reports one.
    fn volume_label(&mut self) -> Option<String>;

    /// Returns the raw device path of the blessed system file. It has not been validated.
    fn blessed_file(&mut self) -> Option<Vec<u8>>;

    /// Returns the raw device path of the blessed system folder. It has not been validated.
    fn blessed_folder(&mut self) -> Option<Vec<u8>>;

    /// Returns the APFS identity of the volume, if it is APFS.
    fn apfs_info(&mut self) -> Option<ApfsInfo>;
}

/// Firmware services used while scanning and loading.
pub trait Firmware {
    /// Returns every handle that supports the simple filesystem protocol, in handle database order.
    ///
    /// # Errors
    ///
    /// May return an `Error` if the handle database could not be queried.
    fn filesystem_handles(&self) -> BootResult<Vec<Handle>>;

    /// Returns the device path installed on a handle.
    fn device_path(&self, handle: Handle) -> Option<DevicePathBuf>;

    /// Returns the GPT partition type GUID of the partition behind a handle.
    fn partition_type(&self, handle: Handle) -> Option<Guid>;

    /// Returns the unique GPT partition GUID of the partition behind a handle.
    fn partition_guid(&self, handle: Handle) -> Option<Guid> {
        self.device_path(handle)?.hard_drive()?.partition_guid()
    }

    /// Opens the filesystem behind a handle.
    ///
    /// # Errors
    ///
    /// May return an `Error` if the handle does not support the simple filesystem protocol.
    fn open_volume(&self, handle: Handle) -> BootResult<Box<dyn Volume + '_>>;

    /// Finds the filesystem handle that a device path points into.
    ///
    /// Returns the handle and the device path of the filesystem itself.
    fn locate_filesystem(&self, path: &DevicePathBuf) -> Option<(Handle, DevicePathBuf)> {
        self.filesystem_handles()
            .ok()?
            .into_iter()
            .filter_map(|handle| Some((handle, self.device_path(handle)?)))
            .filter(|(_, root)| !root.is_empty() && root.is_prefix_of(path))
            .max_by_key(|(_, root)| root.len())
    }

    /// Converts a text device path, such as `PciRoot(0x0)/Pci(0x1,0x1)/.../\EFI\foo.efi`.
    ///
    /// # Errors
    ///
    /// May return an `Error` if the firmware cannot convert text, or the text is malformed.
    fn text_to_device_path(&self, text: &str) -> BootResult<DevicePathBuf>;

    /// Converts a device path to text for logging and identification.
    ///
    /// # Errors
    ///
    /// May return an `Error` if the firmware cannot convert device paths to text.
    fn device_path_to_text(&self, path: &DevicePathBuf) -> BootResult<String>;

    /// Returns the handle of the running image.
    fn image_handle(&self) -> Handle;

    /// Returns the full device path of the running image, including its file path.
    fn loader_path(&self) -> Option<DevicePathBuf>;

    /// Loads an image, either from a device path or from a memory buffer.
    ///
    /// # Errors
    ///
    /// May return an `Error` if the firmware refused to load the image.
    fn load_image(
        &self,
        parent: Handle,
        path: &DevicePathBuf,
        source: Option<&[u8]>,
    ) -> BootResult<Handle>;

    /// Sets the load options of a loaded image. `options` is UCS-2 with a terminating nul.
    ///
    /// # Errors
    ///
    /// May return an `Error` if the image does not support the loaded image protocol.
    fn set_load_options(&self, image: Handle, options: Vec<u16>) -> BootResult<()>;

    /// Starts a loaded image.
    ///
    /// # Errors
    ///
    /// May return an `Error` if the image returned an error or could not be started.
    fn start_image(&self, image: Handle) -> BootResult<()>;

    /// Unloads an image that was loaded but will not be started.
    ///
    /// # Errors
    ///
    /// May return an `Error` if the image could not be unloaded.
    fn unload_image(&self, image: Handle) -> BootResult<()>;

    /// Switches the console out of graphics mode, for images that draw text.
    fn enter_text_mode(&self);

    /// Waits for the given number of microseconds.
    fn stall(&self, micros: usize);

    /// Resets the system. On real firmware this does not return.
    fn reset_system(&self, kind: ResetType);
}
