// SPDX-FileCopyrightText: 2025 some100 <ootinnyoo@outlook.com>
// SPDX-License-Identifier: MIT

//! Scan policy evaluation.
//!
//! A handle is classified by the bus it hangs off (from its device path) and by the filesystem on it (from its GPT
//! partition type). The scan policy then decides whether the scanner looks at it at all.
//!
//! This is a heuristic gate against scanning media the user did not ask for. It is not a security boundary, since
//! the device path of a tunneled or malicious device can look like anything.

use bitflags::bitflags;
use log::debug;
use uefi::{Guid, Handle, guid};

use crate::{
    BootResult,
    error::BootError,
    system::{
        device_path::{
            ACPI_DEVICE_PATH, DevicePathBuf, HARDWARE_DEVICE_PATH, HW_PCI, MEDIA_DEVICE_PATH,
            MEDIA_HARDDRIVE, MESSAGING_DEVICE_PATH, MSG_1394, MSG_APPLE_NVME, MSG_ATAPI, MSG_EMMC,
            MSG_NVME, MSG_SASEX, MSG_SATA, MSG_SCSI, MSG_SD, MSG_USB, PCI_ROOT_HID, PCIE_ROOT_HID,
        },
        firmware::Firmware,
    },
};

bitflags! {
    /// The scan policy bitmask.
    ///
    /// Bit values are the same as the ones stored by other boot managers in NVRAM, so a `scan-policy` variable can be
    /// shared with them.
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
    pub struct ScanPolicy: u32 {
        /// Only filesystems with an allowed `ALLOW_FS_*` bit are scanned.
        const FILE_SYSTEM_LOCK = 1 << 0;
        /// Only devices with an allowed `ALLOW_DEVICE_*` bit are scanned.
        const DEVICE_LOCK = 1 << 1;

        /// APFS containers.
        const ALLOW_FS_APFS = 1 << 8;
        /// HFS and HFS+ volumes, including Apple boot partitions.
        const ALLOW_FS_HFS = 1 << 9;
        /// EFI system partitions.
        const ALLOW_FS_ESP = 1 << 10;
        /// Microsoft basic data partitions.
        const ALLOW_FS_NTFS = 1 << 11;
        /// Linux root partitions.
        const ALLOW_FS_LINUX_ROOT = 1 << 12;
        /// Linux data partitions.
        const ALLOW_FS_LINUX_DATA = 1 << 13;
        /// Extended boot loader partitions.
        const ALLOW_FS_XBOOTLDR = 1 << 14;

        /// SATA devices.
        const ALLOW_DEVICE_SATA = 1 << 16;
        /// SAS and Mac NVMe devices.
        const ALLOW_DEVICE_SASEX = 1 << 17;
        /// SCSI devices.
        const ALLOW_DEVICE_SCSI = 1 << 18;
        /// NVMe devices.
        const ALLOW_DEVICE_NVME = 1 << 19;
        /// ATAPI devices, including CD and DVD drives.
        const ALLOW_DEVICE_ATAPI = 1 << 20;
        /// USB devices.
        const ALLOW_DEVICE_USB = 1 << 21;
        /// FireWire devices.
        const ALLOW_DEVICE_FIREWIRE = 1 << 22;
        /// SD and eMMC cards.
        const ALLOW_DEVICE_SDCARD = 1 << 23;
        /// Devices that sit directly on PCI, like NVMe without a namespace node or virtual disks.
        const ALLOW_DEVICE_PCI = 1 << 24;
    }
}

impl ScanPolicy {
    /// The policy used when none is configured: APFS on internal SATA, SAS, SCSI, NVMe and PCI media.
    pub const DEFAULT: Self = Self::from_bits_retain(
        Self::FILE_SYSTEM_LOCK.bits()
            | Self::DEVICE_LOCK.bits()
            | Self::ALLOW_FS_APFS.bits()
            | Self::ALLOW_DEVICE_SATA.bits()
            | Self::ALLOW_DEVICE_SASEX.bits()
            | Self::ALLOW_DEVICE_SCSI.bits()
            | Self::ALLOW_DEVICE_NVME.bits()
            | Self::ALLOW_DEVICE_PCI.bits(),
    );
}

impl Default for ScanPolicy {
    fn default() -> Self {
        Self::DEFAULT
    }
}

/// The GPT partition type of an APFS container.
pub const APFS_PARTITION_TYPE: Guid = guid!("7c3457ef-0000-11aa-aa11-00306543ecac");

/// The GPT partition type of an HFS+ volume.
pub const HFS_PARTITION_TYPE: Guid = guid!("48465300-0000-11aa-aa11-00306543ecac");

/// The GPT partition type of an Apple boot (Recovery HD) partition.
pub const HFS_BOOT_PARTITION_TYPE: Guid = guid!("426f6f74-0000-11aa-aa11-00306543ecac");

/// The GPT partition type of an EFI system partition.
pub const ESP_PARTITION_TYPE: Guid = guid!("c12a7328-f81f-11d2-ba4b-00a0c93ec93b");

/// The GPT partition type of a Microsoft basic data partition.
pub const MSFT_BASIC_DATA_PARTITION_TYPE: Guid = guid!("ebd0a0a2-b9e5-4433-87c0-68b6b72699c7");

/// The GPT partition type of an x86 Linux root partition.
pub const LINUX_ROOT_X86_PARTITION_TYPE: Guid = guid!("44479540-f297-41b2-9af7-d131d5f0458a");

/// The GPT partition type of an x86-64 Linux root partition.
pub const LINUX_ROOT_X86_64_PARTITION_TYPE: Guid = guid!("4f68bce3-e8cd-4db1-96e7-fbcaf984b709");

/// The GPT partition type of a Linux data partition.
pub const LINUX_DATA_PARTITION_TYPE: Guid = guid!("0fc63daf-8483-4772-8e79-3d69d8477de4");

/// The GPT partition type of an extended boot loader partition.
pub const XBOOTLDR_PARTITION_TYPE: Guid = guid!("bc13c2ff-59e6-4262-a352-b275fd6f7172");

/// Classifies a device path by the bus it is attached to.
///
/// Returns the matching `ALLOW_DEVICE_*` bit (or nothing at all for unknown devices) and whether the device looks
/// external. Only the first messaging node is considered, and later ones are assumed to be tunneled.
#[must_use = "Has no effect if the result is unused"]
pub fn get_device_policy_type(path: &DevicePathBuf) -> (ScanPolicy, bool) {
    let mut nodes = path.nodes().peekable();
    while let Some(node) = nodes.next() {
        if node.node_type != MESSAGING_DEVICE_PATH {
            continue;
        }
        return match node.sub_type {
            MSG_SATA => (ScanPolicy::ALLOW_DEVICE_SATA, false),
            MSG_SASEX => (ScanPolicy::ALLOW_DEVICE_SASEX, false),
            MSG_SCSI => (ScanPolicy::ALLOW_DEVICE_SCSI, false),
            MSG_NVME | MSG_APPLE_NVME => (ScanPolicy::ALLOW_DEVICE_NVME, false),
            MSG_ATAPI => {
                // a hard disk behind ATAPI carries a partition signature, optical media does not
                let has_disk = nodes
                    .peek()
                    .filter(|next| next.is(MEDIA_DEVICE_PATH, MEDIA_HARDDRIVE))
                    .and_then(|next| next.data.get(37))
                    .is_some_and(|&sig| sig == 1 || sig == 2);
                (ScanPolicy::ALLOW_DEVICE_ATAPI, !has_disk)
            }
            MSG_USB => (ScanPolicy::ALLOW_DEVICE_USB, true),
            MSG_1394 => (ScanPolicy::ALLOW_DEVICE_FIREWIRE, true),
            MSG_SD | MSG_EMMC => (ScanPolicy::ALLOW_DEVICE_SDCARD, true),
            _ => (ScanPolicy::empty(), false),
        };
    }

    for node in path.nodes() {
        if node.node_type == MEDIA_DEVICE_PATH {
            return (ScanPolicy::ALLOW_DEVICE_PCI, false);
        }
        let is_root = node.node_type == ACPI_DEVICE_PATH
            && node
                .data
                .get(..4)
                .map(|hid| u32::from_le_bytes([hid[0], hid[1], hid[2], hid[3]]))
                .is_some_and(|hid| hid == PCI_ROOT_HID || hid == PCIE_ROOT_HID);
        if !is_root && !node.is(HARDWARE_DEVICE_PATH, HW_PCI) {
            break;
        }
    }

    (ScanPolicy::empty(), false)
}

/// Classifies a filesystem by its GPT partition type.
#[must_use = "Has no effect if the result is unused"]
pub fn get_file_system_policy_type(partition_type: Option<Guid>) -> ScanPolicy {
    match partition_type {
        Some(APFS_PARTITION_TYPE) => ScanPolicy::ALLOW_FS_APFS,
        Some(ESP_PARTITION_TYPE) => ScanPolicy::ALLOW_FS_ESP,
        Some(HFS_PARTITION_TYPE | HFS_BOOT_PARTITION_TYPE) => ScanPolicy::ALLOW_FS_HFS,
        Some(MSFT_BASIC_DATA_PARTITION_TYPE) => ScanPolicy::ALLOW_FS_NTFS,
        Some(LINUX_ROOT_X86_PARTITION_TYPE | LINUX_ROOT_X86_64_PARTITION_TYPE) => {
            ScanPolicy::ALLOW_FS_LINUX_ROOT
        }
        Some(LINUX_DATA_PARTITION_TYPE) => ScanPolicy::ALLOW_FS_LINUX_DATA,
        Some(XBOOTLDR_PARTITION_TYPE) => ScanPolicy::ALLOW_FS_XBOOTLDR,
        _ => ScanPolicy::empty(),
    }
}

/// Applies the lock bits of a policy to one device kind and one filesystem kind.
///
/// A category whose lock bit is clear accepts everything. A locked category only accepts kinds whose allow bit is
/// set, so an unknown (empty) kind is always rejected by a locked category.
///
/// # Errors
///
/// Returns [`BootError::SecurityViolation`] if either category rejects the kind.
pub fn check_scan_policy(policy: ScanPolicy, device: ScanPolicy, fs: ScanPolicy) -> BootResult<()> {
    if policy.contains(ScanPolicy::DEVICE_LOCK) && !policy.intersects(device) {
        return Err(BootError::SecurityViolation);
    }
    if policy.contains(ScanPolicy::FILE_SYSTEM_LOCK) && !policy.intersects(fs) {
        return Err(BootError::SecurityViolation);
    }
    Ok(())
}

/// Checks a filesystem handle against the scan policy.
///
/// Returns whether the device looks external.
///
/// # Errors
///
/// Returns [`BootError::SecurityViolation`] if the policy rejects the handle.
pub fn check_handle(
    firmware: &dyn Firmware,
    handle: Handle,
    policy: ScanPolicy,
) -> BootResult<bool> {
    let (device, external) = firmware
        .device_path(handle)
        .map_or((ScanPolicy::empty(), false), |path| get_device_policy_type(&path));
    let fs = get_file_system_policy_type(firmware.partition_type(handle));

    check_scan_policy(policy, device, fs).inspect_err(|_| {
        debug!(
            "Handle {handle:?} rejected by scan policy {:#x} (device {:#x}, fs {:#x})",
            policy.bits(),
            device.bits(),
            fs.bits()
        );
    })?;
    Ok(external)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::system::device_path::{
        MEDIA_HARDDRIVE, MESSAGING_DEVICE_PATH, MSG_ATAPI,
        fixtures::{pci_root, push_gpt, sata_partition, usb_partition},
    };
    use crate::system::firmware::mock::{MockFirmware, MockVolume};
    use proptest::prelude::*;

    const PART: Guid = guid!("8e4c1b7a-7d1e-4b4c-9d7e-1b2c3d4e5f60");

    #[test]
    fn test_device_kinds() {
        assert_eq!(
            get_device_policy_type(&sata_partition(1, PART)),
            (ScanPolicy::ALLOW_DEVICE_SATA, false)
        );
        assert_eq!(
            get_device_policy_type(&usb_partition(1, PART)),
            (ScanPolicy::ALLOW_DEVICE_USB, true)
        );

        let mut pci = pci_root();
        push_gpt(&mut pci, 1, PART);
        assert_eq!(get_device_policy_type(&pci), (ScanPolicy::ALLOW_DEVICE_PCI, false));

        assert_eq!(
            get_device_policy_type(&DevicePathBuf::new()),
            (ScanPolicy::empty(), false)
        );
    }

    #[test]
    fn test_atapi_optical_is_external() {
        let mut dvd = pci_root();
        let _ = dvd.push_node(MESSAGING_DEVICE_PATH, MSG_ATAPI, &[0; 4]);
        assert_eq!(get_device_policy_type(&dvd), (ScanPolicy::ALLOW_DEVICE_ATAPI, true));

        let mut disk = pci_root();
        let _ = disk.push_node(MESSAGING_DEVICE_PATH, MSG_ATAPI, &[0; 4]);
        push_gpt(&mut disk, 1, PART);
        assert_eq!(get_device_policy_type(&disk), (ScanPolicy::ALLOW_DEVICE_ATAPI, false));
        assert!(disk.nodes().any(|n| n.is(MEDIA_DEVICE_PATH, MEDIA_HARDDRIVE)));
    }

    #[test]
    fn test_fs_kinds() {
        assert_eq!(
            get_file_system_policy_type(Some(APFS_PARTITION_TYPE)),
            ScanPolicy::ALLOW_FS_APFS
        );
        assert_eq!(
            get_file_system_policy_type(Some(HFS_BOOT_PARTITION_TYPE)),
            ScanPolicy::ALLOW_FS_HFS
        );
        assert_eq!(get_file_system_policy_type(Some(PART)), ScanPolicy::empty());
        assert_eq!(get_file_system_policy_type(None), ScanPolicy::empty());
    }

    #[test]
    fn test_default_policy_rejects_usb_esp() -> BootResult<()> {
        let mut firmware = MockFirmware::default();
        let internal = firmware.add_fs(
            sata_partition(1, PART),
            Some(APFS_PARTITION_TYPE),
            MockVolume::default(),
        );
        let usb = firmware.add_fs(
            usb_partition(1, PART),
            Some(ESP_PARTITION_TYPE),
            MockVolume::default(),
        );

        assert!(!check_handle(&firmware, internal, ScanPolicy::DEFAULT)?);
        assert!(matches!(
            check_handle(&firmware, usb, ScanPolicy::DEFAULT),
            Err(BootError::SecurityViolation)
        ));
        assert!(check_handle(&firmware, usb, ScanPolicy::empty())?);
        Ok(())
    }

    /// Strategy producing a single allow bit of a category, or no bit at all.
    fn kind(bits: &'static [u32]) -> impl Strategy<Value = ScanPolicy> {
        prop::sample::select(bits).prop_map(ScanPolicy::from_bits_retain)
    }

    const DEVICE_BITS: &[u32] = &[
        0,
        1 << 16,
        1 << 17,
        1 << 18,
        1 << 19,
        1 << 20,
        1 << 21,
        1 << 22,
        1 << 23,
        1 << 24,
    ];
    const FS_BITS: &[u32] = &[0, 1 << 8, 1 << 9, 1 << 10, 1 << 11, 1 << 12, 1 << 13, 1 << 14];

    proptest! {
        #[test]
        fn lock_bits_gate_each_category(
            policy in any::<u32>(),
            device in kind(DEVICE_BITS),
            fs in kind(FS_BITS),
        ) {
            let policy = ScanPolicy::from_bits_retain(policy);
            let device_ok = !policy.contains(ScanPolicy::DEVICE_LOCK) || policy.intersects(device);
            let fs_ok = !policy.contains(ScanPolicy::FILE_SYSTEM_LOCK) || policy.intersects(fs);
            prop_assert_eq!(check_scan_policy(policy, device, fs).is_ok(), device_ok && fs_ok);

            let unlocked =
                policy.difference(ScanPolicy::DEVICE_LOCK | ScanPolicy::FILE_SYSTEM_LOCK);
            prop_assert!(check_scan_policy(unlocked, device, fs).is_ok());
        }
    }
}
