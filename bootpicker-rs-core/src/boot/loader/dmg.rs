// SPDX-FileCopyrightText: 2025 some100 <ootinnyoo@outlook.com>
// SPDX-License-Identifier: MIT

//! Booting a folder that holds a disk image, such as `\com.apple.recovery.boot`.
//!
//! The folder must hold a `*.dmg`, and under [`DmgLoading::Signed`] also the matching `*.chunklist`. The image is
//! read into memory and handed to the host [`crate::boot::services::DiskImageMounter`], which exposes it to the
//! firmware and reports where the loader inside it lives.

use alloc::{format, string::String, vec::Vec};
use log::{debug, info, warn};
use thiserror::Error;

use crate::{
    BootResult,
    boot::{
        config::DmgLoading, context::BootEntry, loader::chunklist::Chunklist,
        services::HostServices,
    },
    error::BootError,
    system::{
        device_path::DevicePathBuf,
        firmware::{Firmware, Volume},
        fs::ONE_GIGABYTE,
        helper::join_path,
    },
};

/// The largest chunklist that is read.
const CHUNKLIST_MAX_SIZE: usize = 1024 * 1024;

/// An `Error` that may result from loading a disk image.
#[derive(Error, Debug)]
pub enum DmgError {
    /// The folder holds no disk image.
    #[error("No disk image in \"{0}\"")]
    NoImage(String),

    /// The disk image has no chunklist, but the policy requires a signed image.
    #[error("Disk image \"{0}\" has no chunklist")]
    MissingChunklist(String),

    /// The policy requires a signed image, but the host cannot check signatures.
    #[error("No disk image verifier is available")]
    NoVerifier,

    /// The chunklist signature was rejected.
    #[error("Disk image signature was rejected")]
    Rejected,
}

/// A disk image read into memory.
#[derive(Clone, Debug)]
pub struct DmgImage {
    /// The contents of the image.
    pub data: Vec<u8>,

    /// The device path of the image file.
    pub device_path: DevicePathBuf,

    /// The contents of the chunklist, if there is one.
    pub chunklist: Option<Vec<u8>>,
}

/// Finds the first disk image in a folder and returns its path.
///
/// # Errors
///
/// May return an `Error` if the folder cannot be listed, or holds no disk image.
pub fn find_dmg(volume: &mut dyn Volume, dir: &str) -> BootResult<String> {
    volume
        .read_dir(dir)?
        .into_iter()
        .find(|entry| {
            !entry.is_directory
                && entry.name.len() > ".dmg".len()
                && entry.name.to_ascii_lowercase().ends_with(".dmg")
        })
        .map(|entry| join_path(dir, &entry.name))
        .ok_or_else(|| DmgError::NoImage(String::from(dir)).into())
}

/// Returns the path of the chunklist that belongs to a disk image.
fn chunklist_path(dmg_path: &str) -> String {
    let stem = &dmg_path[..dmg_path.len() - ".dmg".len()];
    format!("{stem}.chunklist")
}

/// Checks the chunklist of an image against the policy.
fn verify_image(
    mode: DmgLoading,
    services: &mut dyn HostServices,
    dmg_path: &str,
    data: &[u8],
    chunklist: Option<&[u8]>,
) -> BootResult<()> {
    if mode != DmgLoading::Signed {
        return Ok(());
    }
    let raw = chunklist.ok_or_else(|| DmgError::MissingChunklist(String::from(dmg_path)))?;
    let chunklist = Chunklist::parse(raw)?;

    let verifier = services.image_verifier().ok_or(DmgError::NoVerifier)?;
    if !verifier.verify(chunklist.signed, chunklist.signature) {
        warn!("Signature of {dmg_path} was rejected");
        return Err(DmgError::Rejected.into());
    }
    chunklist.verify_data(data)?;
    debug!("{dmg_path} matches its {} chunks", chunklist.chunks.len());
    Ok(())
}

/// Reads the disk image in a folder entry, and checks it against the policy.
///
/// # Errors
///
/// May return an `Error` if the image could not be found or read, or the policy rejects it.
pub fn read_dmg(
    mode: DmgLoading,
    services: &mut dyn HostServices,
    firmware: &dyn Firmware,
    folder: &DevicePathBuf,
) -> BootResult<DmgImage> {
    let dir = folder.file_path().ok_or(BootError::InvalidParameter)?;
    let (handle, root) = firmware.locate_filesystem(folder).ok_or(BootError::NotFound)?;
    let mut volume = firmware.open_volume(handle)?;

    let dmg_path = find_dmg(&mut *volume, &dir)?;
    let data = volume.read(&dmg_path, ONE_GIGABYTE)?;
    let chunklist = match volume.read(&chunklist_path(&dmg_path), CHUNKLIST_MAX_SIZE) {
        Ok(raw) => Some(raw),
        Err(e) if e.is_out_of_resources() => return Err(e),
        Err(e) => {
            debug!("No chunklist for {dmg_path}: {e}");
            None
        }
    };

    verify_image(mode, services, &dmg_path, &data, chunklist.as_deref())?;
    Ok(DmgImage {
        data,
        device_path: root.append_file_path(&dmg_path)?,
        chunklist,
    })
}

/// Reads and mounts the disk image of a folder entry, returning the device path of the loader inside it.
///
/// # Errors
///
/// Returns [`BootError::SecurityViolation`] if disk images are disabled, or [`BootError::Unsupported`] if the host
/// cannot mount them. May also return an `Error` if the image is missing or rejected.
pub fn load_dmg(
    mode: DmgLoading,
    services: &mut dyn HostServices,
    firmware: &dyn Firmware,
    entry: &BootEntry,
) -> BootResult<DevicePathBuf> {
    if mode == DmgLoading::Disabled {
        return Err(BootError::SecurityViolation);
    }
    if services.disk_image_mounter().is_none() {
        debug!("No disk image mounter for {}", entry.name);
        return Err(BootError::Unsupported);
    }
    let folder = entry.device_path.as_ref().ok_or(BootError::InvalidParameter)?;

    let image = read_dmg(mode, services, firmware, folder)?;
    info!("Mounting a {} byte disk image for {}", image.data.len(), entry.name);
    services
        .disk_image_mounter()
        .ok_or(BootError::Unsupported)?
        .mount(firmware, &image)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        boot::{
            classify::BootEntryType, loader::chunklist::build_chunklist,
            services::fakes::FakeServices,
        },
        config::builder::BootEntryBuilder,
        system::{
            device_path::fixtures,
            firmware::mock::{MockFirmware, MockVolume},
        },
    };
    use uefi::guid;

    const IMAGE: &[u8] = b"a tiny stand-in for BaseSystem.dmg";
    const RECOVERY: &str = "\\com.apple.recovery.boot\\";

    fn setup(volume: MockVolume) -> (MockFirmware, BootEntry) {
        let mut firmware = MockFirmware::default();
        let root = fixtures::sata_partition(2, guid!("33333333-3333-3333-3333-333333333333"));
        firmware.add_fs(root.clone(), None, volume);
        let entry = BootEntryBuilder::new("Recovery", BootEntryType::APPLE_RECOVERY)
            .device_path(root.append_file_path(RECOVERY).unwrap_or_default())
            .folder(true)
            .build();
        (firmware, entry)
    }

    fn services(verifier: Option<bool>) -> FakeServices {
        FakeServices {
            verifier,
            mount_path: DevicePathBuf::new_file_path("\\System\\Library\\CoreServices\\boot.efi")
                .ok(),
            ..FakeServices::default()
        }
    }

    fn signed_volume() -> MockVolume {
        MockVolume::default()
            .with_dir("\\com.apple.recovery.boot\\Old.dmg")
            .with_file("\\com.apple.recovery.boot\\BaseSystem.dmg", IMAGE)
            .with_file(
                "\\com.apple.recovery.boot\\BaseSystem.chunklist",
                &build_chunklist(IMAGE, 8, 1),
            )
    }

    #[test]
    fn test_find_dmg() -> BootResult<()> {
        let mut volume = MockVolume::default()
            .with_file("\\rec\\.dmg", b"")
            .with_file("\\rec\\notes.txt", b"")
            .with_file("\\rec\\Base.DMG", IMAGE);
        assert_eq!(find_dmg(&mut volume, "\\rec\\")?, "\\rec\\Base.DMG");
        assert!(matches!(
            find_dmg(&mut volume, "\\EFI\\"),
            Err(BootError::FsError(_))
        ));
        let mut empty = MockVolume::default().with_dir("\\rec");
        assert!(matches!(
            find_dmg(&mut empty, "\\rec\\"),
            Err(BootError::DmgError(DmgError::NoImage(_)))
        ));
        Ok(())
    }

    #[test]
    fn test_signed_image_mounts() -> BootResult<()> {
        let (firmware, entry) = setup(signed_volume());
        let mut services = services(Some(true));
        let path = load_dmg(DmgLoading::Signed, &mut services, &firmware, &entry)?;
        assert_eq!(path.file_path().as_deref(), Some("\\System\\Library\\CoreServices\\boot.efi"));
        assert_eq!(services.mounted, [IMAGE.len()]);
        Ok(())
    }

    #[test]
    fn test_signed_policy() {
        let (firmware, entry) = setup(signed_volume());
        let rejected = load_dmg(DmgLoading::Signed, &mut services(Some(false)), &firmware, &entry);
        assert!(matches!(rejected, Err(BootError::DmgError(DmgError::Rejected))));
        let unverified = load_dmg(DmgLoading::Signed, &mut services(None), &firmware, &entry);
        assert!(matches!(unverified, Err(BootError::DmgError(DmgError::NoVerifier))));

        let (firmware, entry) = setup(
            MockVolume::default().with_file("\\com.apple.recovery.boot\\BaseSystem.dmg", IMAGE),
        );
        let missing = load_dmg(DmgLoading::Signed, &mut services(Some(true)), &firmware, &entry);
        assert!(matches!(missing, Err(BootError::DmgError(DmgError::MissingChunklist(_)))));
        assert!(load_dmg(DmgLoading::Any, &mut services(None), &firmware, &entry).is_ok());
    }

    #[test]
    fn test_tampered_image() {
        let (firmware, entry) = setup(
            signed_volume().with_file(
                "\\com.apple.recovery.boot\\BaseSystem.dmg",
                b"a tiny stand-in for BaseSystem.dmX",
            ),
        );
        let mut services = services(Some(true));
        let result = load_dmg(DmgLoading::Signed, &mut services, &firmware, &entry);
        assert!(matches!(result, Err(BootError::ChunklistError(_))));
        assert!(services.mounted.is_empty());
    }

    #[test]
    fn test_disabled_and_unsupported() {
        let (firmware, entry) = setup(signed_volume());
        assert!(matches!(
            load_dmg(DmgLoading::Disabled, &mut services(Some(true)), &firmware, &entry),
            Err(BootError::SecurityViolation)
        ));
        assert!(matches!(
            load_dmg(DmgLoading::Any, &mut FakeServices::default(), &firmware, &entry),
            Err(BootError::Unsupported)
        ));
    }
}
