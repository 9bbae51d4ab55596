// SPDX-FileCopyrightText: 2025 some100 <ootinnyoo@outlook.com>
// SPDX-License-Identifier: MIT

//! Apple specific file information records.
//!
//! HFS+ and APFS drivers answer `EFI_FILE_PROTOCOL.GetInfo` for a few vendor GUIDs on the volume root. These
//! describe the blessed system file and folder, and the APFS container and volume that the filesystem
//! belongs to.

use alloc::vec::Vec;
use bitflags::bitflags;
use core::ffi::c_void;
use uefi::{
    Guid, Identify,
    data_types::Align,
    guid,
    proto::media::file::{Directory, File, FileProtocolInfo, FromUefi},
};

use crate::system::fs::FsError;

/// The GUID of the APFS container information record.
pub const APPLE_APFS_CONTAINER_INFO_GUID: Guid = guid!("3533cf0d-685f-5ebf-8dc6-7393485bafa2");

/// The GUID of the APFS volume information record.
pub const APPLE_APFS_VOLUME_INFO_GUID: Guid = guid!("900c7693-8c14-58ba-b44e-9745154d8c40");

/// The GUID of the blessed system file record.
pub const APPLE_BLESSED_SYSTEM_FILE_INFO_GUID: Guid =
    guid!("bbcc5c17-28a0-47a4-8c51-8c1bd17406e1");

/// The GUID of the blessed system folder record.
pub const APPLE_BLESSED_SYSTEM_FOLDER_INFO_GUID: Guid =
    guid!("fbb0803e-7dfd-4cf6-a10b-1d6e2e74dea1");

/// The largest blessed device path that will be read.
const BLESSED_BUFFER: usize = 1024;

bitflags! {
    /// The role of an APFS volume within its container.
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
    pub struct ApfsVolumeRole: u32 {
        /// The system volume.
        const SYSTEM = 1 << 0;
        /// A user home volume.
        const USER = 1 << 1;
        /// The recovery volume.
        const RECOVERY = 1 << 2;
        /// The swap volume.
        const VM = 1 << 3;
        /// The preboot volume holding loaders for its siblings.
        const PREBOOT = 1 << 4;
        /// An installer volume.
        const INSTALLER = 1 << 5;
        /// The data volume of a sealed system.
        const DATA = 1 << 6;
        /// The update volume.
        const UPDATE = 1 << 7;
    }
}

/// The identity of an APFS volume.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ApfsInfo {
    /// The container UUID shared by all volumes of a container.
    pub container: Guid,

    /// The volume UUID, used as a directory name on the preboot and recovery volumes.
    pub volume: Guid,

    /// The role of the volume.
    pub role: ApfsVolumeRole,
}

/// The raw APFS container information record.
#[repr(C)]
struct ApfsContainerInfo {
    /// Always set to 1.
    always1: u32,

    /// The container UUID.
    uuid: [u8; 16],
}

/// The raw APFS volume information record.
#[repr(C)]
struct ApfsVolumeInfo {
    /// Always set to 1.
    always1: u32,

    /// The volume UUID.
    uuid: [u8; 16],

    /// The volume role.
    role: u32,
}

/// A buffer for a blessed device path. The path terminates itself, so the record size is not needed.
#[repr(C)]
struct BlessedFileInfo {
    /// The raw device path bytes.
    path: [u8; BLESSED_BUFFER],
}

/// Same as [`BlessedFileInfo`], but for the blessed folder.
#[repr(C)]
struct BlessedFolderInfo {
    /// The raw device path bytes.
    path: [u8; BLESSED_BUFFER],
}

/// Implements the traits required by [`File::get_info`] for a sized record.
macro_rules! file_info {
    ($ty:ty, $guid:expr) => {
        // SAFETY: the GUID is the one the Apple filesystem drivers answer for this record layout.
        unsafe impl Identify for $ty {
            const GUID: Guid = $guid;
        }

        impl Align for $ty {
            fn alignment() -> usize {
                core::mem::align_of::<Self>()
            }
        }

        impl FromUefi for $ty {
            unsafe fn from_uefi<'ptr>(ptr: *mut c_void) -> &'ptr mut Self {
                // SAFETY: the caller passes an aligned buffer that the driver filled with this record.
                unsafe { &mut *ptr.cast::<Self>() }
            }
        }

        impl FileProtocolInfo for $ty {}
    };
}

file_info!(ApfsContainerInfo, APPLE_APFS_CONTAINER_INFO_GUID);
file_info!(ApfsVolumeInfo, APPLE_APFS_VOLUME_INFO_GUID);
file_info!(BlessedFileInfo, APPLE_BLESSED_SYSTEM_FILE_INFO_GUID);
file_info!(BlessedFolderInfo, APPLE_BLESSED_SYSTEM_FOLDER_INFO_GUID);

/// A buffer aligned for any of the records above.
#[repr(C, align(8))]
struct InfoBuffer([u8; BLESSED_BUFFER + 8]);

/// Reads the APFS container and volume identity from the root of a volume.
///
/// # Errors
///
/// May return an `Error` if the volume is not APFS, or the records do not have the expected shape.
pub(crate) fn read_apfs_info(root: &mut Directory) -> Result<ApfsInfo, FsError> {
    let mut buf = InfoBuffer([0; BLESSED_BUFFER + 8]);
    let container = root
        .get_info::<ApfsContainerInfo>(&mut buf.0)
        .map_err(|e| FsError::ReadErr(e.status()))?;
    if container.always1 != 1 {
        return Err(FsError::InfoErr);
    }
    let container = Guid::from_bytes(container.uuid);

    let mut buf = InfoBuffer([0; BLESSED_BUFFER + 8]);
    let volume = root
        .get_info::<ApfsVolumeInfo>(&mut buf.0)
        .map_err(|e| FsError::ReadErr(e.status()))?;
    if volume.always1 != 1 {
        return Err(FsError::InfoErr);
    }

    Ok(ApfsInfo {
        container,
        volume: Guid::from_bytes(volume.uuid),
        role: ApfsVolumeRole::from_bits_retain(volume.role),
    })
}

/// Reads the raw blessed system file device path. The caller validates it.
pub(crate) fn read_blessed_file(root: &mut Directory) -> Option<Vec<u8>> {
    let mut buf = InfoBuffer([0; BLESSED_BUFFER + 8]);
    let info = root.get_info::<BlessedFileInfo>(&mut buf.0).ok()?;
    Some(info.path.to_vec())
}

/// Reads the raw blessed system folder device path. The caller validates it.
pub(crate) fn read_blessed_folder(root: &mut Directory) -> Option<Vec<u8>> {
    let mut buf = InfoBuffer([0; BLESSED_BUFFER + 8]);
    let info = root.get_info::<BlessedFolderInfo>(&mut buf.0).ok()?;
    Some(info.path.to_vec())
}
