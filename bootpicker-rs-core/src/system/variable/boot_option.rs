// SPDX-FileCopyrightText: 2025 some100 <ootinnyoo@outlook.com>
// SPDX-License-Identifier: MIT

//! `Boot####` load options.
//!
//! The layout is `u32` attributes, `u16` device path list length, a nul terminated UCS-2 description, the device path
//! list and then optional data that is passed to the image.

use alloc::{string::String, vec::Vec};
use bitflags::bitflags;
use thiserror::Error;

use crate::system::{
    device_path::DevicePathBuf,
    helper::{str_to_ucs2_with_nul, ucs2_to_string},
};

bitflags! {
    /// The attributes of a load option.
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
    pub struct LoadOptionAttributes: u32 {
        /// The option is part of the boot order.
        const ACTIVE = 0x0000_0001;
        /// The option forces a reconnect of all drivers.
        const FORCE_RECONNECT = 0x0000_0002;
        /// The option is hidden from firmware menus.
        const HIDDEN = 0x0000_0008;
        /// The option is an application rather than a boot target.
        const CATEGORY_APP = 0x0000_0100;
    }
}

impl LoadOptionAttributes {
    /// A normal boot target category, which is no bits at all.
    pub const CATEGORY_BOOT: Self = Self::empty();

    /// The bits that hold the option category.
    pub const CATEGORY_MASK: u32 = 0x0000_1F00;
}

/// An `Error` that may result from parsing a load option.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum LoadOptionError {
    /// The option is shorter than its fixed header.
    #[error("Load option is truncated")]
    Truncated,

    /// The description is not nul terminated.
    #[error("Load option description is not terminated")]
    UnterminatedDescription,

    /// The device path list length runs past the end of the option.
    #[error("Load option device path list is {0} bytes, which exceeds the option")]
    FilePathListLength(usize),

    /// The device path list is malformed.
    #[error("Load option device path list is malformed")]
    FilePathList,

    /// The description is too long to be stored.
    #[error("Load option description is too long")]
    DescriptionTooLong,
}

/// A parsed `Boot####` variable.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LoadOption {
    /// The attributes of the option.
    pub attributes: LoadOptionAttributes,

    /// The human readable description.
    pub description: String,

    /// The first device path of the list.
    pub device_path: DevicePathBuf,

    /// Data passed to the image as load options.
    pub optional_data: Vec<u8>,
}

impl LoadOption {
    /// Constructs a new [`LoadOption`] with no optional data.
    #[must_use = "Has no effect if the result is unused"]
    pub fn new(
        attributes: LoadOptionAttributes,
        description: &str,
        device_path: DevicePathBuf,
    ) -> Self {
        Self {
            attributes,
            description: String::from(description),
            device_path,
            optional_data: Vec::new(),
        }
    }

    /// Parses a load option from variable data.
    ///
    /// # Errors
    ///
    /// May return an `Error` if the option is truncated or its device path list is malformed.
    pub fn parse(data: &[u8]) -> Result<Self, LoadOptionError> {
        if data.len() < 6 {
            return Err(LoadOptionError::Truncated);
        }
        let attributes = LoadOptionAttributes::from_bits_retain(u32::from_le_bytes([
            data[0], data[1], data[2], data[3],
        ]));
        let list_len = usize::from(u16::from_le_bytes([data[4], data[5]]));

        let rest = &data[6..];
        let desc_units = rest
            .chunks_exact(2)
            .position(|c| c == [0, 0])
            .ok_or(LoadOptionError::UnterminatedDescription)?;
        let desc: Vec<u16> = rest[..desc_units * 2]
            .chunks_exact(2)
            .map(|c| u16::from_le_bytes([c[0], c[1]]))
            .collect();
        let description =
            ucs2_to_string(&desc).map_err(|_| LoadOptionError::UnterminatedDescription)?;

        let list_start = desc_units * 2 + 2;
        let list = rest
            .get(list_start..list_start + list_len)
            .ok_or(LoadOptionError::FilePathListLength(list_len))?;
        let device_path =
            DevicePathBuf::from_bytes(list).map_err(|_| LoadOptionError::FilePathList)?;
        let optional_data = rest[list_start + list_len..].to_vec();

        Ok(Self {
            attributes,
            description,
            device_path,
            optional_data,
        })
    }

    /// Serializes the load option into variable data.
    ///
    /// # Errors
    ///
    /// May return an `Error` if the description or device path are too large to be stored.
    pub fn to_bytes(&self) -> Result<Vec<u8>, LoadOptionError> {
        let desc = str_to_ucs2_with_nul(&self.description)
            .map_err(|_| LoadOptionError::DescriptionTooLong)?;
        let list_len = u16::try_from(self.device_path.len())
            .map_err(|_| LoadOptionError::FilePathListLength(self.device_path.len()))?;

        let mut out = Vec::with_capacity(
            6 + desc.len() * 2 + self.device_path.len() + self.optional_data.len(),
        );
        out.extend_from_slice(&self.attributes.bits().to_le_bytes());
        out.extend_from_slice(&list_len.to_le_bytes());
        for unit in desc {
            out.extend_from_slice(&unit.to_le_bytes());
        }
        out.extend_from_slice(self.device_path.as_bytes());
        out.extend_from_slice(&self.optional_data);
        Ok(out)
    }
}
