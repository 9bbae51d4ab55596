// SPDX-FileCopyrightText: 2025 some100 <ootinnyoo@outlook.com>
// SPDX-License-Identifier: MIT

//! An owned, validated UEFI device path.
//!
//! Device paths reach the engine from untrusted places: blessed file attributes, `Boot####` variables,
//! and text conversions. [`DevicePathBuf`] stores the raw node stream and only exists after the stream has
//! been checked for sane node lengths and a terminating end node. Everything that walks nodes can then index
//! without further bounds worries.
//!
//! The node-level layout is the one from the UEFI specification:
//!
//! ```text
//! +------+---------+-------------+----------------+
//! | type | subtype | length (LE) | data ...       |
//! +------+---------+-------------+----------------+
//!   u8     u8        u16           length - 4
//! ```

use alloc::{string::String, vec::Vec};
use thiserror::Error;
use uefi::Guid;

use crate::system::helper::{StrError, str_to_ucs2_with_nul, ucs2_bytes_to_string};

/// Hardware device path node type.
pub const HARDWARE_DEVICE_PATH: u8 = 0x01;

/// ACPI device path node type.
pub const ACPI_DEVICE_PATH: u8 = 0x02;

/// Messaging device path node type.
pub const MESSAGING_DEVICE_PATH: u8 = 0x03;

/// Media device path node type.
pub const MEDIA_DEVICE_PATH: u8 = 0x04;

/// End of device path node type.
pub const END_DEVICE_PATH: u8 = 0x7F;

/// End of an entire device path.
pub const END_ENTIRE_SUBTYPE: u8 = 0xFF;

/// Hardware PCI node subtype.
pub const HW_PCI: u8 = 0x01;

/// Hardware memory mapped node subtype.
pub const HW_MEMMAP: u8 = 0x03;

/// Hardware vendor node subtype.
pub const HW_VENDOR: u8 = 0x04;

/// ACPI node subtype.
pub const ACPI_DP: u8 = 0x01;

/// The compressed EISA id of `PNP0A03`, a PCI root bridge.
pub const PCI_ROOT_HID: u32 = 0x0A03_41D0;

/// The compressed EISA id of `PNP0A08`, a PCI express root bridge.
pub const PCIE_ROOT_HID: u32 = 0x0A08_41D0;

/// Messaging ATAPI subtype.
pub const MSG_ATAPI: u8 = 0x01;

/// Messaging SCSI subtype.
pub const MSG_SCSI: u8 = 0x02;

/// Messaging 1394 subtype.
pub const MSG_1394: u8 = 0x04;

/// Messaging USB subtype.
pub const MSG_USB: u8 = 0x05;

/// Messaging vendor subtype.
pub const MSG_VENDOR: u8 = 0x0A;

/// Messaging SATA subtype.
pub const MSG_SATA: u8 = 0x12;

/// Messaging SAS-Ex subtype.
pub const MSG_SASEX: u8 = 0x16;

/// Messaging NVMe namespace subtype.
pub const MSG_NVME: u8 = 0x17;

/// Messaging SD subtype.
pub const MSG_SD: u8 = 0x1A;

/// Messaging eMMC subtype.
pub const MSG_EMMC: u8 = 0x1D;

/// Messaging NVMe subtype used by Apple firmware.
pub const MSG_APPLE_NVME: u8 = 0x22;

/// Media hard drive subtype.
pub const MEDIA_HARDDRIVE: u8 = 0x01;

/// Media CD-ROM subtype.
pub const MEDIA_CDROM: u8 = 0x02;

/// Media vendor subtype.
pub const MEDIA_VENDOR: u8 = 0x03;

/// Media file path subtype.
pub const MEDIA_FILEPATH: u8 = 0x04;

/// Media PIWG firmware file subtype.
pub const MEDIA_PIWG_FW_FILE: u8 = 0x06;

/// The size of the node header.
const NODE_HEADER: usize = 4;

/// The largest device path that will be accepted.
const MAX_DEVICE_PATH: usize = 64 * 1024;

/// The end node, also used to terminate paths that are built from scratch.
const END_NODE: [u8; 4] = [END_DEVICE_PATH, END_ENTIRE_SUBTYPE, 4, 0];

/// The GUID of the Apple legacy loader application, stored in a PIWG firmware file node.
const APPLE_LEGACY_LOAD_APP: Guid = uefi::guid!("2b0585eb-d8b8-49a9-8b8c-e21b01aef2b7");

/// An `Error` that may result from validating or building a device path.
#[derive(Error, Debug)]
pub enum DevicePathError {
    /// A node was shorter than its header or ran past the end of the buffer.
    #[error("Device path node at offset {0} has an invalid length")]
    InvalidNodeLength(usize),

    /// The buffer ended before an end-of-entire-path node.
    #[error("Device path is not terminated")]
    Unterminated,

    /// The device path is larger than any real firmware would produce.
    #[error("Device path is too large")]
    TooLarge,

    /// A node was too large to be represented.
    #[error("Device path node is too large")]
    NodeTooLarge,

    /// A file path could not be encoded as UCS-2.
    #[error("File path could not be encoded")]
    Encoding(#[from] StrError),

    /// A text device path could not be converted.
    #[error("Text device path could not be converted")]
    FromText,
}

/// A borrowed view of one device path node.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DevicePathNode<'a> {
    /// The node type.
    pub node_type: u8,

    /// The node subtype.
    pub sub_type: u8,

    /// The node data, without the header.
    pub data: &'a [u8],

    /// The byte offset of the node in its device path.
    pub offset: usize,
}

impl DevicePathNode<'_> {
    /// Checks the type and subtype of a node.
    #[must_use = "Has no effect if the result is unused"]
    pub const fn is(&self, node_type: u8, sub_type: u8) -> bool {
        self.node_type == node_type && self.sub_type == sub_type
    }

    /// Returns the full length of the node in bytes.
    #[must_use = "Has no effect if the result is unused"]
    pub const fn len(&self) -> usize {
        self.data.len() + NODE_HEADER
    }

    /// Returns `true` if the node is an end node.
    #[must_use = "Has no effect if the result is unused"]
    pub const fn is_end(&self) -> bool {
        self.node_type == END_DEVICE_PATH
    }

    /// Decodes the path stored in a file path node.
    ///
    /// Returns [`None`] if this is not a file path node, or the path is not valid UCS-2.
    #[must_use = "Has no effect if the result is unused"]
    pub fn file_path(&self) -> Option<String> {
        if self.is(MEDIA_DEVICE_PATH, MEDIA_FILEPATH) {
            ucs2_bytes_to_string(self.data).ok()
        } else {
            None
        }
    }

    /// Reads a little endian `u32` in the node data.
    fn read_u32(&self, offset: usize) -> Option<u32> {
        let bytes = self.data.get(offset..offset + 4)?;
        Some(u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
    }
}

/// Information from a hard drive media node.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct HardDriveNode {
    /// The partition number, starting from 1.
    pub partition_number: u32,

    /// The partition signature. For GPT disks this is the unique partition GUID.
    pub signature: [u8; 16],

    /// The partition format (1 = MBR, 2 = GPT).
    pub partition_format: u8,

    /// The signature type (0 = none, 1 = MBR, 2 = GUID).
    pub signature_type: u8,
}

impl HardDriveNode {
    /// The size of the node data.
    const DATA_LEN: usize = 38;

    /// Parses a hard drive node.
    fn parse(node: &DevicePathNode<'_>) -> Option<Self> {
        if !node.is(MEDIA_DEVICE_PATH, MEDIA_HARDDRIVE) || node.data.len() < Self::DATA_LEN {
            return None;
        }
        let mut signature = [0; 16];
        signature.copy_from_slice(&node.data[20..36]);
        Some(Self {
            partition_number: node.read_u32(0)?,
            signature,
            partition_format: node.data[36],
            signature_type: node.data[37],
        })
    }

    /// Returns the unique partition GUID if the signature is a GUID.
    #[must_use = "Has no effect if the result is unused"]
    pub const fn partition_guid(&self) -> Option<Guid> {
        if self.signature_type == 2 {
            Some(Guid::from_bytes(self.signature))
        } else {
            None
        }
    }
}

/// An owned device path that is known to be structurally valid.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct DevicePathBuf(Vec<u8>);

impl DevicePathBuf {
    /// Creates a device path consisting only of the end node.
    #[must_use = "Has no effect if the result is unused"]
    pub fn new() -> Self {
        Self(END_NODE.to_vec())
    }

    /// Validates raw bytes as a device path.
    ///
    /// Data after the first end-of-entire-path node is ignored. End-of-instance nodes are kept, so multi-instance
    /// paths survive, but most helpers only look at the first instance.
    ///
    /// # Errors
    ///
    /// May return an `Error` if a node length is out of bounds, the path is not terminated, or it is unreasonably large.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, DevicePathError> {
        let mut offset = 0;
        loop {
            if offset > MAX_DEVICE_PATH {
                return Err(DevicePathError::TooLarge);
            }
            let Some(header) = bytes.get(offset..offset + NODE_HEADER) else {
                return Err(DevicePathError::Unterminated);
            };
            let len = usize::from(u16::from_le_bytes([header[2], header[3]]));
            if len < NODE_HEADER || offset + len > bytes.len() {
                return Err(DevicePathError::InvalidNodeLength(offset));
            }
            if header[0] == END_DEVICE_PATH && header[1] == END_ENTIRE_SUBTYPE {
                let mut path = bytes[..offset].to_vec();
                path.extend_from_slice(&END_NODE);
                return Ok(Self(path));
            }
            offset += len;
        }
    }

    /// Builds a device path holding a single file path node.
    ///
    /// # Errors
    ///
    /// May return an `Error` if the path could not be encoded as UCS-2.
    pub fn new_file_path(path: &str) -> Result<Self, DevicePathError> {
        Self::new().append_file_path(path)
    }

    /// Returns the raw bytes of the device path, including its end node.
    #[must_use = "Has no effect if the result is unused"]
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Returns the size of the device path in bytes, including its end node.
    #[must_use = "Has no effect if the result is unused"]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns `true` if the path has no node other than the end node.
    #[must_use = "Has no effect if the result is unused"]
    pub fn is_empty(&self) -> bool {
        self.0.len() <= NODE_HEADER
    }

    /// Iterates over every node up to, and not including, the end node.
    pub fn nodes(&self) -> impl Iterator<Item = DevicePathNode<'_>> + '_ {
        let mut offset = 0;
        core::iter::from_fn(move || {
            let header = self.0.get(offset..offset + NODE_HEADER)?;
            let len = usize::from(u16::from_le_bytes([header[2], header[3]]));
            if header[0] == END_DEVICE_PATH && header[1] == END_ENTIRE_SUBTYPE {
                return None;
            }
            let node = DevicePathNode {
                node_type: header[0],
                sub_type: header[1],
                data: &self.0[offset + NODE_HEADER..offset + len],
                offset,
            };
            offset += len;
            Some(node)
        })
    }

    /// Appends a raw node before the end node.
    ///
    /// # Errors
    ///
    /// May return an `Error` if the node data is too large for a 16 bit length.
    pub fn push_node(
        &mut self,
        node_type: u8,
        sub_type: u8,
        data: &[u8],
    ) -> Result<(), DevicePathError> {
        let len = u16::try_from(data.len() + NODE_HEADER)
            .map_err(|_| DevicePathError::NodeTooLarge)?;
        let end = self.0.len() - NODE_HEADER;
        self.0.truncate(end);
        self.0.push(node_type);
        self.0.push(sub_type);
        self.0.extend_from_slice(&len.to_le_bytes());
        self.0.extend_from_slice(data);
        self.0.extend_from_slice(&END_NODE);
        Ok(())
    }

    /// Returns a copy of the path with a file path node appended.
    ///
    /// # Errors
    ///
    /// May return an `Error` if the path could not be encoded as UCS-2.
    pub fn append_file_path(&self, path: &str) -> Result<Self, DevicePathError> {
        let data: Vec<u8> = str_to_ucs2_with_nul(path)?
            .into_iter()
            .flat_map(u16::to_le_bytes)
            .collect();
        let mut new = self.clone();
        new.push_node(MEDIA_DEVICE_PATH, MEDIA_FILEPATH, &data)?;
        Ok(new)
    }

    /// Returns the nodes of `self` followed by the nodes of `other`.
    #[must_use = "Has no effect if the result is unused"]
    pub fn append_path(&self, other: &Self) -> Self {
        let mut path = self.0[..self.0.len() - NODE_HEADER].to_vec();
        path.extend_from_slice(&other.0);
        Self(path)
    }

    /// Returns the part of the path before the first file path node.
    ///
    /// For a loader on a partition, this is the device path of the partition itself.
    #[must_use = "Has no effect if the result is unused"]
    pub fn root_prefix(&self) -> Self {
        let end = self
            .nodes()
            .find(|n| n.is(MEDIA_DEVICE_PATH, MEDIA_FILEPATH))
            .map_or(self.0.len() - NODE_HEADER, |n| n.offset);
        let mut path = self.0[..end].to_vec();
        path.extend_from_slice(&END_NODE);
        Self(path)
    }

    /// Returns a copy of the path with every file path node replaced by a single new one.
    ///
    /// # Errors
    ///
    /// May return an `Error` if the path could not be encoded as UCS-2.
    pub fn replace_file_path(&self, path: &str) -> Result<Self, DevicePathError> {
        self.root_prefix().append_file_path(path)
    }

    /// Returns the concatenated path of every file path node.
    ///
    /// Firmware is allowed to split a path over several nodes, so `\EFI` + `BOOT\BOOTX64.EFI` is joined with a
    /// separator where needed.
    #[must_use = "Has no effect if the result is unused"]
    pub fn file_path(&self) -> Option<String> {
        let mut full: Option<String> = None;
        for part in self.nodes().filter_map(|n| n.file_path()) {
            let path = full.get_or_insert_with(String::new);
            if !path.is_empty() && !path.ends_with('\\') && !part.starts_with('\\') {
                path.push('\\');
            }
            path.push_str(&part);
        }
        full
    }

    /// Returns the path of the last non-empty file path node.
    #[must_use = "Has no effect if the result is unused"]
    pub fn last_file_path(&self) -> Option<String> {
        self.nodes()
            .filter_map(|n| n.file_path())
            .filter(|p| !p.is_empty())
            .last()
    }

    /// Returns the first hard drive node, if there is one.
    #[must_use = "Has no effect if the result is unused"]
    pub fn hard_drive(&self) -> Option<HardDriveNode> {
        self.nodes().find_map(|n| HardDriveNode::parse(&n))
    }

    /// Returns the path starting from the first hard drive node.
    ///
    /// Firmware and operating systems often store short-form load options that begin at the partition.
    #[must_use = "Has no effect if the result is unused"]
    pub fn hard_drive_suffix(&self) -> Option<Self> {
        let node = self
            .nodes()
            .find(|n| n.is(MEDIA_DEVICE_PATH, MEDIA_HARDDRIVE))?;
        Some(Self(self.0[node.offset..].to_vec()))
    }

    /// Returns `true` if the path begins with a hard drive node.
    #[must_use = "Has no effect if the result is unused"]
    pub fn is_short_form(&self) -> bool {
        self.nodes()
            .next()
            .is_some_and(|n| n.is(MEDIA_DEVICE_PATH, MEDIA_HARDDRIVE))
    }

    /// Returns `true` if every node of `self` (minus its end node) starts `other`.
    #[must_use = "Has no effect if the result is unused"]
    pub fn is_prefix_of(&self, other: &Self) -> bool {
        let prefix = &self.0[..self.0.len() - NODE_HEADER];
        other.0.starts_with(prefix)
    }

    /// Returns the nodes of `other` that follow `self`, if `self` is a prefix of it.
    #[must_use = "Has no effect if the result is unused"]
    pub fn strip_prefix_of(&self, other: &Self) -> Option<Self> {
        if self.is_prefix_of(other) {
            Some(Self(other.0[self.0.len() - NODE_HEADER..].to_vec()))
        } else {
            None
        }
    }

    /// Returns `true` if this path points at the Apple legacy loader application.
    #[must_use = "Has no effect if the result is unused"]
    pub fn is_apple_legacy_load_app(&self) -> bool {
        let mut nodes = self.nodes();
        let (Some(first), Some(second)) = (nodes.next(), nodes.next()) else {
            return false;
        };
        first.is(HARDWARE_DEVICE_PATH, HW_MEMMAP)
            && second.is(MEDIA_DEVICE_PATH, MEDIA_PIWG_FW_FILE)
            && second.data.len() >= 16
            && second.data[..16] == APPLE_LEGACY_LOAD_APP.to_bytes()
    }
}

impl Default for DevicePathBuf {
    fn default() -> Self {
        Self::new()
    }
}

impl core::fmt::Debug for DevicePathBuf {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let mut list = f.debug_list();
        for node in self.nodes() {
            match node.file_path() {
                Some(path) => list.entry(&path),
                None => list.entry(&(node.node_type, node.sub_type)),
            };
        }
        list.finish()
    }
}


#[cfg(test)]
mod tests {
    use super::{fixtures::*, *};
    use proptest::prelude::*;
    use uefi::guid;

    const PART: Guid = guid!("11111111-2222-3333-4444-555555555555");

    #[test]
    fn test_validate_round_trip() -> Result<(), DevicePathError> {
        let path = sata_partition(1, PART).append_file_path("\\EFI\\BOOT\\BOOTX64.EFI")?;
        let parsed = DevicePathBuf::from_bytes(path.as_bytes())?;
        assert_eq!(parsed, path);
        assert_eq!(parsed.file_path().as_deref(), Some("\\EFI\\BOOT\\BOOTX64.EFI"));
        assert_eq!(parsed.hard_drive().and_then(|hd| hd.partition_guid()), Some(PART));
        Ok(())
    }

    #[test]
    fn test_rejects_malformed() {
        assert!(matches!(
            DevicePathBuf::from_bytes(&[]),
            Err(DevicePathError::Unterminated)
        ));
        assert!(matches!(
            DevicePathBuf::from_bytes(&[4, 4, 2, 0, 0x7F, 0xFF, 4, 0]),
            Err(DevicePathError::InvalidNodeLength(0))
        ));
        assert!(matches!(
            DevicePathBuf::from_bytes(&[4, 4, 0xFF, 0x0F, 0, 0]),
            Err(DevicePathError::InvalidNodeLength(0))
        ));
        assert!(matches!(
            DevicePathBuf::from_bytes(&[4, 4, 6, 0, 0, 0]),
            Err(DevicePathError::Unterminated)
        ));
    }

    #[test]
    fn test_multiple_file_nodes_join() -> Result<(), DevicePathError> {
        let path = sata_partition(1, PART)
            .append_file_path("\\EFI")?
            .append_file_path("BOOT\\BOOTX64.EFI")?;
        assert_eq!(path.file_path().as_deref(), Some("\\EFI\\BOOT\\BOOTX64.EFI"));
        assert_eq!(path.last_file_path().as_deref(), Some("BOOT\\BOOTX64.EFI"));
        Ok(())
    }

    #[test]
    fn test_prefix_helpers() -> Result<(), DevicePathError> {
        let root = sata_partition(2, PART);
        let file = root.append_file_path("\\foo\\bar.efi")?;
        assert_eq!(file.root_prefix(), root);
        assert!(root.is_prefix_of(&file));
        assert!(!file.is_prefix_of(&root));

        let rest = root.strip_prefix_of(&file);
        assert_eq!(
            rest.and_then(|r| r.file_path()).as_deref(),
            Some("\\foo\\bar.efi")
        );

        let moved = file.replace_file_path("\\baz.efi")?;
        assert_eq!(moved.file_path().as_deref(), Some("\\baz.efi"));
        assert!(root.is_prefix_of(&moved));
        Ok(())
    }

    #[test]
    fn test_short_form() -> Result<(), DevicePathError> {
        let full = sata_partition(1, PART).append_file_path("\\a.efi")?;
        let short = full.hard_drive_suffix();
        assert!(short.as_ref().is_some_and(DevicePathBuf::is_short_form));
        assert!(!full.is_short_form());
        assert_eq!(
            short.and_then(|s| s.file_path()).as_deref(),
            Some("\\a.efi")
        );
        Ok(())
    }

    proptest! {
        #[test]
        fn from_bytes_never_panics(bytes in proptest::collection::vec(any::<u8>(), 0..256)) {
            if let Ok(path) = DevicePathBuf::from_bytes(&bytes) {
                let _ = path.file_path();
                let _ = path.hard_drive();
                prop_assert!(path.nodes().count() * 4 < path.len());
            }
        }
    }
}
