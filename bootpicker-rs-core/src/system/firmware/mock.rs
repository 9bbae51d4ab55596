// SPDX-FileCopyrightText: 2025 some100 <ootinnyoo@outlook.com>
// SPDX-License-Identifier: MIT

//! In-memory firmware and volumes for host tests.

use alloc::{
    boxed::Box,
    collections::{BTreeMap, BTreeSet},
    format,
    string::{String, ToString},
    vec::Vec,
};
use core::cell::{Cell, RefCell};
use uefi::{Guid, Handle, runtime::ResetType};

use crate::{
    BootResult,
    error::BootError,
    system::{
        apple::ApfsInfo,
        device_path::{DevicePathBuf, DevicePathError},
        firmware::{Firmware, Volume},
        fs::{DirEntry, FsError},
    },
};

/// Creates a handle that is only ever compared, never given to firmware.
pub(crate) fn handle(n: usize) -> Handle {
    // SAFETY: the pointer is non-null, and mock handles are never dereferenced.
    match unsafe { Handle::from_ptr(core::ptr::without_provenance_mut(0x1000 + n * 0x10)) } {
        Some(handle) => handle,
        None => unreachable!("mock handle pointers are non-null"),
    }
}

/// A case-insensitive in-memory volume.
#[derive(Clone, Default)]
pub(crate) struct MockVolume {
    /// Files keyed by their lowercased path.
    files: BTreeMap<String, (String, Vec<u8>)>,

    /// Directories keyed by their lowercased path, without a trailing backslash.
    dirs: BTreeSet<String>,

    /// The volume label.
    label: Option<String>,

    /// The raw blessed file device path.
    blessed_file: Option<Vec<u8>>,

    /// The raw blessed folder device path.
    blessed_folder: Option<Vec<u8>>,

    /// The APFS identity.
    apfs: Option<ApfsInfo>,
}

/// Normalizes a path into a lookup key.
fn key(path: &str) -> String {
    let path = path.trim_end_matches('\\').to_ascii_lowercase();
    if path.starts_with('\\') {
        path
    } else {
        format!("\\{path}")
    }
}

impl MockVolume {
    /// Adds a file and every directory above it.
    pub(crate) fn with_file(mut self, path: &str, data: &[u8]) -> Self {
        let k = key(path);
        let mut dir = k.as_str();
        while let Some(idx) = dir.rfind('\\') {
            dir = &dir[..idx];
            if !dir.is_empty() {
                self.dirs.insert(dir.to_string());
            }
        }
        self.files.insert(k, (path.to_string(), data.to_vec()));
        self
    }

    /// Adds an empty directory and every directory above it.
    pub(crate) fn with_dir(mut self, path: &str) -> Self {
        let k = key(path);
        let mut dir = k.as_str();
        while !dir.is_empty() {
            self.dirs.insert(dir.to_string());
            dir = dir.rfind('\\').map_or("", |idx| &dir[..idx]);
        }
        self
    }

    /// Sets the volume label.
    pub(crate) fn with_label(mut self, label: &str) -> Self {
        self.label = Some(label.to_string());
        self
    }

    /// Sets the blessed file device path.
    pub(crate) fn with_blessed_file(mut self, path: &[u8]) -> Self {
        self.blessed_file = Some(path.to_vec());
        self
    }

    /// Sets the blessed folder device path.
    pub(crate) fn with_blessed_folder(mut self, path: &[u8]) -> Self {
        self.blessed_folder = Some(path.to_vec());
        self
    }

    /// Sets the APFS identity.
    pub(crate) fn with_apfs(mut self, info: ApfsInfo) -> Self {
        self.apfs = Some(info);
        self
    }
}

impl Volume for MockVolume {
    fn exists(&mut self, path: &str) -> bool {
        let k = key(path);
        k == "\\" || k.is_empty() || self.files.contains_key(&k) || self.dirs.contains(&k)
    }

    fn is_directory(&mut self, path: &str) -> bool {
        let k = key(path);
        k == "\\" || k.is_empty() || self.dirs.contains(&k)
    }

    fn read(&mut self, path: &str, max_size: usize) -> BootResult<Vec<u8>> {
        let (_, data) = self
            .files
            .get(&key(path))
            .ok_or(FsError::OpenErr(uefi::Status::NOT_FOUND))?;
        if data.len() > max_size {
            return Err(FsError::TooLarge(max_size).into());
        }
        Ok(data.clone())
    }

    fn read_dir(&mut self, path: &str) -> BootResult<Vec<DirEntry>> {
        if !self.is_directory(path) {
            return Err(FsError::OpenErr(uefi::Status::NOT_FOUND).into());
        }
        let k = key(path);
        let prefix = if k == "\\" { String::from("\\") } else { format!("{k}\\") };
        let is_child = |p: &str| {
            p.len() > prefix.len() && p.starts_with(&prefix) && !p[prefix.len()..].contains('\\')
        };

        let mut entries: Vec<DirEntry> = self
            .dirs
            .iter()
            .filter(|d| is_child(d))
            .map(|d| DirEntry {
                name: d[prefix.len()..].to_string(),
                is_directory: true,
                size: 0,
            })
            .collect();
        entries.extend(self.files.iter().filter(|(k, _)| is_child(k)).map(
            |(_, (original, data))| DirEntry {
                name: original.rsplit('\\').next().unwrap_or_default().to_string(),
                is_directory: false,
                size: data.len() as u64,
            },
        ));
        Ok(entries)
    }

    fn volume_label(&mut self) -> Option<String> {
        self.label.clone()
    }

    fn blessed_file(&mut self) -> Option<Vec<u8>> {
        self.blessed_file.clone()
    }

    fn blessed_folder(&mut self) -> Option<Vec<u8>> {
        self.blessed_folder.clone()
    }

    fn apfs_info(&mut self) -> Option<ApfsInfo> {
        self.apfs
    }
}

/// One filesystem known to a [`MockFirmware`].
pub(crate) struct MockFs {
    /// The handle of the filesystem.
    pub(crate) handle: Handle,

    /// The device path of the partition.
    pub(crate) device_path: DevicePathBuf,

    /// The GPT partition type.
    pub(crate) partition_type: Option<Guid>,

    /// The contents of the filesystem.
    pub(crate) volume: MockVolume,
}

/// An image load observed by a [`MockFirmware`].
#[derive(Clone, Debug)]
pub(crate) struct LoadRecord {
    /// The handle that was returned.
    pub(crate) image: Handle,

    /// The device path that was loaded.
    pub(crate) path: DevicePathBuf,

    /// Whether the image came from a memory buffer.
    pub(crate) from_buffer: bool,
}

/// Firmware that only exists in memory.
#[derive(Default)]
pub(crate) struct MockFirmware {
    /// The filesystems, in handle database order.
    pub(crate) filesystems: Vec<MockFs>,

    /// Text device path conversions.
    pub(crate) texts: Vec<(String, DevicePathBuf)>,

    /// The device path of the running image.
    pub(crate) loader_path: Option<DevicePathBuf>,

    /// Refuse every image load.
    pub(crate) fail_load: bool,

    /// Fail every image start.
    pub(crate) fail_start: bool,

    /// Loads that happened.
    pub(crate) loads: RefCell<Vec<LoadRecord>>,

    /// Load options that were set.
    pub(crate) options: RefCell<Vec<(Handle, Vec<u16>)>>,

    /// Images that were started.
    pub(crate) started: RefCell<Vec<Handle>>,

    /// Images that were unloaded.
    pub(crate) unloaded: RefCell<Vec<Handle>>,

    /// Resets that were requested.
    pub(crate) resets: RefCell<Vec<ResetType>>,

    /// How many times the console was switched to text mode.
    pub(crate) text_mode: Cell<usize>,

    /// Stalls that were requested, in microseconds.
    pub(crate) stalls: RefCell<Vec<usize>>,

    /// The next image handle number.
    next_image: Cell<usize>,
}

impl MockFirmware {
    /// Adds a filesystem and returns its handle.
    pub(crate) fn add_fs(
        &mut self,
        device_path: DevicePathBuf,
        partition_type: Option<Guid>,
        volume: MockVolume,
    ) -> Handle {
        let handle = handle(self.filesystems.len() + 1);
        self.filesystems.push(MockFs {
            handle,
            device_path,
            partition_type,
            volume,
        });
        handle
    }

    /// Finds a filesystem by handle.
    fn fs(&self, handle: Handle) -> Option<&MockFs> {
        self.filesystems.iter().find(|fs| fs.handle == handle)
    }
}

impl Firmware for MockFirmware {
    fn filesystem_handles(&self) -> BootResult<Vec<Handle>> {
        Ok(self.filesystems.iter().map(|fs| fs.handle).collect())
    }

    fn device_path(&self, handle: Handle) -> Option<DevicePathBuf> {
        self.fs(handle).map(|fs| fs.device_path.clone())
    }

    fn partition_type(&self, handle: Handle) -> Option<Guid> {
        self.fs(handle).and_then(|fs| fs.partition_type)
    }

    fn open_volume(&self, handle: Handle) -> BootResult<Box<dyn Volume + '_>> {
        let fs = self.fs(handle).ok_or(BootError::NotFound)?;
        Ok(Box::new(fs.volume.clone()))
    }

    fn text_to_device_path(&self, text: &str) -> BootResult<DevicePathBuf> {
        self.texts
            .iter()
            .find(|(t, _)| t == text)
            .map(|(_, path)| path.clone())
            .ok_or_else(|| DevicePathError::FromText.into())
    }

    fn device_path_to_text(&self, path: &DevicePathBuf) -> BootResult<String> {
        Ok(format!("{path:?}"))
    }

    fn image_handle(&self) -> Handle {
        handle(0)
    }

    fn loader_path(&self) -> Option<DevicePathBuf> {
        self.loader_path.clone()
    }

    fn load_image(
        &self,
        _parent: Handle,
        path: &DevicePathBuf,
        source: Option<&[u8]>,
    ) -> BootResult<Handle> {
        if self.fail_load {
            return Err(BootError::from(uefi::Status::LOAD_ERROR));
        }
        let n = self.next_image.get() + 1;
        self.next_image.set(n);
        let image = handle(1000 + n);
        self.loads.borrow_mut().push(LoadRecord {
            image,
            path: path.clone(),
            from_buffer: source.is_some(),
        });
        Ok(image)
    }

    fn set_load_options(&self, image: Handle, options: Vec<u16>) -> BootResult<()> {
        self.options.borrow_mut().push((image, options));
        Ok(())
    }

    fn start_image(&self, image: Handle) -> BootResult<()> {
        if self.fail_start {
            return Err(BootError::from(uefi::Status::ABORTED));
        }
        self.started.borrow_mut().push(image);
        Ok(())
    }

    fn unload_image(&self, image: Handle) -> BootResult<()> {
        self.unloaded.borrow_mut().push(image);
        Ok(())
    }

    fn enter_text_mode(&self) {
        self.text_mode.set(self.text_mode.get() + 1);
    }

    fn stall(&self, micros: usize) {
        self.stalls.borrow_mut().push(micros);
    }

    fn reset_system(&self, kind: ResetType) {
        self.resets.borrow_mut().push(kind);
    }
}
