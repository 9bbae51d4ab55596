// SPDX-FileCopyrightText: 2025 some100 <ootinnyoo@outlook.com>
// SPDX-License-Identifier: MIT

//! Capabilities that the front end may lend to the engine.
//!
//! Every capability is optional. When one is missing, the engine falls back to what the firmware can do alone: no
//! privilege prompt, no custom image source, no disk images, no NVRAM filter and plain `StartImage`.

use alloc::vec::Vec;
use uefi::Handle;

use crate::{
    BootResult,
    boot::{context::BootEntry, loader::dmg::DmgImage},
    system::{device_path::DevicePathBuf, firmware::Firmware},
};

/// The privilege level that an operation asks for.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PrivilegeLevel {
    /// No authorization is required.
    Unauthorized,

    /// The user must authorize the operation, usually with a password.
    Authorized,
}

/// Asks the user for permission before a sensitive change.
pub trait PrivilegeEscalation {
    /// Requests a privilege level.
    ///
    /// # Errors
    ///
    /// Returns [`crate::error::BootError::Aborted`] if the user declined, or another `Error` if the prompt failed.
    fn request(&mut self, level: PrivilegeLevel) -> BootResult<()>;
}

/// An image supplied by a [`CustomEntryReader`].
#[derive(Clone, Debug, Default)]
pub struct CustomImage {
    /// The raw image.
    pub data: Vec<u8>,

    /// The device path to report for the image, if it differs from the entry.
    pub device_path: Option<DevicePathBuf>,
}

/// Reads images for tool entries from somewhere other than a filesystem, such as an embedded store.
pub trait CustomEntryReader {
    /// Reads the image of an entry.
    ///
    /// # Errors
    ///
    /// May return an `Error` if the image is not available.
    fn read(&mut self, entry: &BootEntry) -> BootResult<CustomImage>;
}

/// Checks the signature of a disk image chunklist.
pub trait DiskImageVerifier {
    /// Returns `true` if `signature` is a valid signature over `chunklist`.
    fn verify(&mut self, chunklist: &[u8], signature: &[u8]) -> bool;
}

/// Exposes a disk image to the firmware, usually as a RAM disk.
pub trait DiskImageMounter {
    /// Mounts an image and returns the device path of the loader inside it.
    ///
    /// # Errors
    ///
    /// May return an `Error` if the image could not be mounted, or holds no loader.
    fn mount(&mut self, firmware: &dyn Firmware, image: &DmgImage) -> BootResult<DevicePathBuf>;

    /// Removes the last mounted image after a failed load.
    fn unmount(&mut self, firmware: &dyn Firmware);
}

/// Starts loaded images in place of `StartImage`, for example to apply quirks right before handoff.
pub trait ImageStarter {
    /// Starts a loaded image.
    ///
    /// # Errors
    ///
    /// May return an `Error` if the image could not be started or returned an error.
    fn start(&mut self, firmware: &dyn Firmware, image: Handle) -> BootResult<()>;
}

/// Restricts which variables a started image may change, such as a write filter over runtime services.
pub trait NvramProtection {
    /// Lifts the restrictions when `full` is set, or puts them back.
    fn set_full_access(&mut self, full: bool);
}

/// The capabilities a front end provides.
///
/// Every method defaults to [`None`], so an implementation only overrides what it has.
pub trait HostServices {
    /// The privilege prompt.
    fn privilege(&mut self) -> Option<&mut dyn PrivilegeEscalation> {
        None
    }

    /// The custom image source.
    fn custom_reader(&mut self) -> Option<&mut dyn CustomEntryReader> {
        None
    }

    /// The disk image signature checker.
    fn image_verifier(&mut self) -> Option<&mut dyn DiskImageVerifier> {
        None
    }

    /// The disk image mounter.
    fn disk_image_mounter(&mut self) -> Option<&mut dyn DiskImageMounter> {
        None
    }

    /// The image starter.
    fn image_starter(&mut self) -> Option<&mut dyn ImageStarter> {
        None
    }

    /// The NVRAM write filter.
    fn nvram_protection(&mut self) -> Option<&mut dyn NvramProtection> {
        None
    }
}

/// Host services with every capability absent.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoHostServices;

impl HostServices for NoHostServices {}

/// Requests privilege if the host can prompt for it.
///
/// Without a prompt, the request succeeds.
///
/// # Errors
///
/// Returns the `Error` of the prompt, if there is one.
pub fn request_privilege(services: &mut dyn HostServices, level: PrivilegeLevel) -> BootResult<()> {
    match services.privilege() {
        Some(privilege) => privilege.request(level),
        None => Ok(()),
    }
}
