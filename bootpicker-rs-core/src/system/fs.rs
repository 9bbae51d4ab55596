// SPDX-FileCopyrightText: 2025 some100 <ootinnyoo@outlook.com>
// SPDX-License-Identifier: MIT

//! Filesystem helper functions for other modules.
//!
//! These mostly wrap around the UEFI [`SimpleFileSystem`] protocol to make an interface that's slightly more
//! intuitive and more in line with the Rust standard library.
//!
//! FAT is always available, since the UEFI specification mandates it. Apple firmware, and firmware with an
//! `ApfsJumpStart`-style driver loaded, also expose HFS+ and APFS volumes through the same protocol. Those
//! volumes additionally answer the Apple specific `GetInfo` requests read in [`crate::system::apple`].

use alloc::{borrow::ToOwned, string::String, vec, vec::Vec};
use thiserror::Error;
use uefi::{
    CStr16, Handle, Status,
    boot::{self, ScopedProtocol},
    fs::COMMON_SKIP_DIRS,
    proto::media::{
        file::{Directory, File, FileAttribute, FileInfo, FileMode, FileSystemVolumeLabel},
        fs::SimpleFileSystem,
    },
};

use crate::{BootResult, system::helper::str_to_cstr};

/// The size of one gigabyte in bytes. This is the default value if a file is too big to be read.
///
/// This is also a reasonable maximum size for files that may be read.
pub(crate) const ONE_GIGABYTE: usize = 1024 * 1024 * 1024;

/// An error that may result from performing filesystem operations
#[derive(Error, Debug)]
pub enum FsError {
    /// A file could not be opened.
    #[error("Failed to open file")]
    OpenErr(Status),

    /// A file could not be read.
    #[error("Failed to read file")]
    ReadErr(Status),

    /// A file was larger than its caller allowed.
    #[error("File is larger than {0} bytes")]
    TooLarge(usize),

    /// Failed to get a volume label on a partition.
    #[error("Could not get volume label of a partition")]
    VolumeLabelErr,

    /// A volume information record had an unexpected shape.
    #[error("Volume information is malformed")]
    InfoErr,
}

impl FsError {
    /// Returns the firmware status behind the error.
    #[must_use = "Has no effect if the result is unused"]
    pub const fn status(&self) -> Status {
        match self {
            Self::OpenErr(status) | Self::ReadErr(status) => *status,
            Self::TooLarge(_) => Status::OUT_OF_RESOURCES,
            Self::VolumeLabelErr => Status::NOT_FOUND,
            Self::InfoErr => Status::VOLUME_CORRUPTED,
        }
    }
}

/// One directory entry as returned by [`UefiFileSystem::read_dir`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DirEntry {
    /// The file name, without any directory component.
    pub name: String,

    /// Whether the entry is a directory.
    pub is_directory: bool,

    /// The file size in bytes.
    pub size: u64,
}

/// A rust-ier wrapper around [`SimpleFileSystem`].
///
/// This is similar to [`uefi::fs::FileSystem`], with different design decisions.
pub struct UefiFileSystem(ScopedProtocol<SimpleFileSystem>);

impl UefiFileSystem {
    /// Create a new [`UefiFileSystem`] from a handle that supports [`SimpleFileSystem`].
    ///
    /// # Errors
    ///
    /// May return an `Error` if the handle does not actually support [`SimpleFileSystem`].
    pub fn from_handle(handle: Handle) -> BootResult<Self> {
        let fs = boot::open_protocol_exclusive(handle)?;
        Ok(Self(fs))
    }

    /// Opens the root directory of the volume.
    ///
    /// # Errors
    ///
    /// May return an `Error` if the volume could not be opened.
    pub fn root(&mut self) -> Result<Directory, FsError> {
        self.0
            .open_volume()
            .map_err(|e| FsError::OpenErr(e.status()))
    }

    /// Gets the volume label from a [`SimpleFileSystem`]
    ///
    /// # Errors
    ///
    /// May return an `Error` if the volume could not be opened, or the volume does not support [`FileSystemVolumeLabel`]
    pub fn get_volume_label(&mut self) -> Result<String, FsError> {
        let mut root = self.root()?;
        let info = root
            .get_boxed_info::<FileSystemVolumeLabel>()
            .map_err(|_| FsError::VolumeLabelErr)?;
        Ok(String::from(info.volume_label()))
    }

    /// Checks if a file or directory exists.
    ///
    /// It makes no distinction between whether a file could not be verified to exist or a file that really
    /// does not exist. Both will return `false`.
    pub fn exists(&mut self, path: &str) -> bool {
        self.open(path).is_ok()
    }

    /// Checks if a path exists and is a directory.
    pub fn is_directory(&mut self, path: &str) -> bool {
        self.open(path)
            .is_ok_and(|f| f.into_directory().is_some())
    }

    /// Returns the entries of a directory, without `.` and `..`.
    ///
    /// # Errors
    ///
    /// May return an `Error` if the path does not exist or is not a directory.
    pub fn read_dir(&mut self, path: &str) -> Result<Vec<DirEntry>, FsError> {
        let mut dir = self
            .open(path)?
            .into_directory()
            .ok_or(FsError::OpenErr(Status::INVALID_PARAMETER))?;

        let mut entries = Vec::new();
        loop {
            let info = match dir.read_entry_boxed() {
                Ok(Some(info)) => info,
                Ok(None) => break,
                Err(e) => return Err(FsError::ReadErr(e.status())),
            };
            if COMMON_SKIP_DIRS.contains(&info.file_name()) {
                continue;
            }
            entries.push(DirEntry {
                name: String::from(info.file_name()),
                is_directory: info.is_directory(),
                size: info.file_size(),
            });
        }
        Ok(entries)
    }

    /// Reads a whole file, refusing files larger than `max_size` bytes.
    ///
    /// # Errors
    ///
    /// May return an `Error` if the path does not point to a regular file, the file is too large, or the read failed.
    pub fn read(&mut self, path: &str, max_size: usize) -> Result<Vec<u8>, FsError> {
        let mut file = self
            .open(path)?
            .into_regular_file()
            .ok_or(FsError::OpenErr(Status::INVALID_PARAMETER))?;

        let info = file
            .get_boxed_info::<FileInfo>()
            .map_err(|e| FsError::ReadErr(e.status()))?;

        let size = usize::try_from(info.file_size()).unwrap_or(ONE_GIGABYTE);
        if size > max_size.min(ONE_GIGABYTE) {
            return Err(FsError::TooLarge(max_size));
        }

        let mut buf = vec![0; size];
        let read = file
            .read(&mut buf)
            .map_err(|e| FsError::ReadErr(e.status()))?;
        buf.truncate(read);
        Ok(buf)
    }

    /// Opens a path relative to the volume root.
    fn open(&mut self, path: &str) -> Result<uefi::proto::media::file::FileHandle, FsError> {
        if !check_path_valid(path) {
            return Err(FsError::OpenErr(Status::INVALID_PARAMETER));
        }
        let path = str_to_cstr(path).map_err(|_| FsError::OpenErr(Status::INVALID_PARAMETER))?;
        self.open_cstr(&path)
    }

    /// Opens a [`CStr16`] path relative to the volume root.
    fn open_cstr(
        &mut self,
        path: &CStr16,
    ) -> Result<uefi::proto::media::file::FileHandle, FsError> {
        let mut root = self.root()?;
        root.open(path, FileMode::Read, FileAttribute::empty())
            .map_err(|e| FsError::OpenErr(e.status()))
    }
}

/// Checks if an [`&str`] path is valid.
///
/// A path may not hold `"`, `*`, `/`, `:`, `<`, `>`, `?` or `|`, and may not consist only of `..` or `.`.
#[must_use = "Has no effect if the result is unused"]
pub(crate) fn check_path_valid(path: &str) -> bool {
    path.chars().all(|x| !matches!(x, '"' | '*' | '/' | ':' | '<' | '>' | '?' | '|'))
        && path != ".."
        && path != "."
        && !path.is_empty()
}

/// Trims a label to printable ASCII, as stored in `.contentDetails` and similar files.
#[must_use = "Has no effect if the result is unused"]
pub(crate) fn filter_label(raw: &[u8]) -> String {
    let text: String = raw
        .iter()
        .take_while(|&&b| b != 0)
        .filter(|b| b.is_ascii_graphic() || **b == b' ')
        .map(|&b| char::from(b))
        .collect();
    text.trim().to_owned()
}
