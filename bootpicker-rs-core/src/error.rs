// SPDX-FileCopyrightText: 2025 some100 <ootinnyoo@outlook.com>
// SPDX-License-Identifier: MIT

//! Provides [`BootError`], which encapsulates other errors

use thiserror::Error;
use uefi::Status;

/// An `Error` resulting from the program.
#[derive(Error, Debug)]
pub enum BootError {
    /// An error with UEFI, or a service from the [`uefi`] crate.
    #[error("UEFI Error")]
    Uefi(#[from] uefi::Error),

    /// A `String` could not be converted into a `CString`
    #[error("String Conversion Error")]
    StrError(#[from] crate::system::helper::StrError),

    /// An error occurred while performing filesystem operations.
    #[error("Filesystem Error")]
    FsError(#[from] crate::system::fs::FsError),

    /// A device path was malformed or could not be built.
    #[error("DevicePath Error")]
    DevicePathError(#[from] crate::system::device_path::DevicePathError),

    /// A UEFI variable could not be read or written.
    #[error("Variable Error")]
    VarError(#[from] crate::system::variable::VarError),

    /// An `EFI_LOAD_OPTION` could not be parsed.
    #[error("Load Option Error")]
    LoadOptionError(#[from] crate::system::variable::boot_option::LoadOptionError),

    /// Load options or a var file could not be parsed.
    #[error("Parsed Vars Error")]
    VarsError(#[from] crate::config::load_options::VarsError),

    /// An error occurred while loading an image.
    #[error("Load Image Error")]
    LoadError(#[from] crate::boot::loader::LoadError),

    /// A disk image could not be located or accepted.
    #[error("Disk Image Error")]
    DmgError(#[from] crate::boot::loader::dmg::DmgError),

    /// A chunklist was malformed or did not match its image.
    #[error("Chunklist Error")]
    ChunklistError(#[from] crate::boot::loader::chunklist::ChunklistError),

    /// The boot arguments could not be changed.
    #[error("Boot Arguments Error")]
    ArgsError(#[from] crate::boot::args::ArgsError),

    /// The default entry could not be persisted.
    #[error("Default Entry Error")]
    DefaultEntryError(#[from] crate::boot::default_entry::DefaultEntryError),

    /// A custom entry from the configuration could not be materialized.
    #[error("Config Error")]
    ConfigError(#[from] crate::config::ConfigError),

    /// The requested item does not exist.
    #[error("Not found")]
    NotFound,

    /// A value failed a structural check.
    #[error("Invalid parameter")]
    InvalidParameter,

    /// The operation was refused by policy.
    #[error("Security violation")]
    SecurityViolation,

    /// The operation is not supported in this configuration.
    #[error("Unsupported")]
    Unsupported,

    /// The operation was aborted by the user.
    #[error("Aborted")]
    Aborted,

    /// An allocation failed.
    #[error("Out of resources")]
    OutOfResources,
}

impl BootError {
    /// Maps the error onto the closest firmware [`Status`].
    #[must_use = "Has no effect if the result is unused"]
    pub fn status(&self) -> Status {
        match self {
            Self::Uefi(e) => e.status(),
            Self::NotFound => Status::NOT_FOUND,
            Self::InvalidParameter
            | Self::StrError(_)
            | Self::DevicePathError(_)
            | Self::LoadOptionError(_)
            | Self::ChunklistError(_)
            | Self::ConfigError(_) => Status::INVALID_PARAMETER,
            Self::SecurityViolation => Status::SECURITY_VIOLATION,
            Self::Unsupported | Self::DmgError(_) => Status::UNSUPPORTED,
            Self::Aborted => Status::ABORTED,
            Self::OutOfResources => Status::OUT_OF_RESOURCES,
            Self::FsError(e) => e.status(),
            Self::VarError(e) => e.status(),
            Self::VarsError(e) => e.status(),
            Self::LoadError(_) | Self::ArgsError(_) | Self::DefaultEntryError(_) => {
                Status::LOAD_ERROR
            }
        }
    }

    /// Returns `true` if the error only says that something is absent.
    ///
    /// Absent state is never fatal during a scan. The next candidate is tried instead.
    #[must_use = "Has no effect if the result is unused"]
    pub fn is_not_found(&self) -> bool {
        self.status() == Status::NOT_FOUND
    }

    /// Returns `true` if the error comes from a failed well-formedness check.
    #[must_use = "Has no effect if the result is unused"]
    pub fn is_invalid(&self) -> bool {
        matches!(
            self.status(),
            Status::INVALID_PARAMETER | Status::DEVICE_ERROR | Status::VOLUME_CORRUPTED
        )
    }

    /// Returns `true` if the error is an allocation failure, which must not be retried.
    #[must_use = "Has no effect if the result is unused"]
    pub fn is_out_of_resources(&self) -> bool {
        self.status() == Status::OUT_OF_RESOURCES
    }
}

impl From<Status> for BootError {
    fn from(status: Status) -> Self {
        Self::Uefi(uefi::Error::from(status))
    }
}
