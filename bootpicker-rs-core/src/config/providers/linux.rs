// SPDX-FileCopyrightText: 2025 some100 <ootinnyoo@outlook.com>
// SPDX-License-Identifier: MIT

//! A provider for `BootLoaderSpec` type #1 entries, a versionless specification for consistent boot entries.
//!
//! Example configuration:
//!
//! ```text
//! # a comment
//!
//! title Linux
//! sort_key linux
//! linux /vmlinuz-linux
//! options root=UUID=e09d636b-0cd9-4e84-8a39-84432cfc2b8e ro
//! ```

use alloc::{borrow::ToOwned, format, string::String, vec::Vec};
use log::{debug, warn};
use uefi::Handle;

use crate::{
    BootResult,
    config::providers::{BootEntryProvider, PickerEntry},
    system::{firmware::Volume, helper::normalize_path},
};

/// The configuration prefix.
const BLS_PREFIX: &str = "\\loader\\entries";

/// The configuration suffix.
const BLS_SUFFIX: &str = ".conf";

/// The largest entry file that is read.
const BLS_MAX_SIZE: usize = 16 * 1024;

/// One parsed `BootLoaderSpec` entry file.
#[derive(Default)]
struct BlsConfig {
    /// The title of the entry.
    title: Option<String>,

    /// The version of the entry.
    version: Option<String>,

    /// The linux path of the entry.
    linux: Option<String>,

    /// The initrds of the entry.
    initrd: Option<String>,

    /// The efi path of the entry.
    efi: Option<String>,

    /// The options of the entry.
    options: Option<String>,

    /// The architecture of the entry.
    architecture: Option<String>,
}

impl BlsConfig {
    /// Parses a BLS entry file.
    ///
    /// If a key is repeated, the latest value wins, except for `initrd` which accumulates.
    fn new(content: &[u8]) -> Self {
        let mut config = Self::default();

        if let Ok(content) = str::from_utf8(content) {
            for line in content.lines() {
                let line = line.trim();
                if line.is_empty() || line.starts_with('#') {
                    continue;
                }

                config.assign_to_field(line);
            }
        }

        config
    }

    /// Assign a field given a line containing the key and value.
    fn assign_to_field(&mut self, line: &str) {
        let Some((key, value)) = line.split_once(|c: char| c.is_ascii_whitespace()) else {
            return;
        };
        let value = value.trim().to_owned();
        match &*key.to_ascii_lowercase() {
            "title" => self.title = Some(value),
            "version" => self.version = Some(value),
            "linux" => self.linux = Some(value),
            "initrd" => {
                if let Some(initrd) = &mut self.initrd {
                    initrd.push(' ');
                    initrd.push_str(&value);
                } else {
                    self.initrd = Some(value);
                }
            }
            "efi" => self.efi = Some(value),
            "options" => self.options = Some(value),
            "architecture" => self.architecture = Some(value.to_ascii_lowercase()),
            "machine-id" | "sort-key" | "devicetree" | "devicetree-overlay" => (),
            _ => debug!("[BLS]: Ignoring key {key}"),
        }
    }

    /// Joins the options and one `initrd=` argument per initrd.
    fn get_options(&self) -> String {
        let mut options = self.options.clone().unwrap_or_default();
        if let Some(initrd) = &self.initrd {
            for initrd in initrd.split_ascii_whitespace() {
                if !options.is_empty() {
                    options.push(' ');
                }
                options.push_str("initrd=");
                options.push_str(&normalize_path(initrd));
            }
        }
        options
    }

    /// Checks that the entry was written for the architecture the picker runs on, if it names one.
    fn matches_architecture(&self) -> bool {
        self.architecture.as_deref().is_none_or(|arch| arch == target_efi_arch())
    }
}

/// The UEFI architecture name of the running picker, as written in BLS entries.
const fn target_efi_arch() -> &'static str {
    if cfg!(target_arch = "x86_64") {
        "x64"
    } else if cfg!(target_arch = "x86") {
        "ia32"
    } else if cfg!(target_arch = "aarch64") {
        "aa64"
    } else if cfg!(target_arch = "arm") {
        "arm"
    } else if cfg!(target_arch = "riscv64") {
        "riscv64"
    } else {
        "unknown"
    }
}

/// Provides entries from `\loader\entries\*.conf`.
///
/// The id of an entry is the file name without its suffix.
pub struct LinuxEntryProvider;

impl BootEntryProvider for LinuxEntryProvider {
    fn name(&self) -> &'static str {
        "BootLoaderSpec"
    }

    fn get_entries(
        &self,
        volume: &mut dyn Volume,
        _handle: Handle,
        default_id: Option<&str>,
    ) -> BootResult<Vec<PickerEntry>> {
        if !volume.is_directory(BLS_PREFIX) {
            return Ok(Vec::new());
        }

        let mut entries = Vec::new();
        for file in volume.read_dir(BLS_PREFIX)? {
            if file.is_directory || file.name.len() <= BLS_SUFFIX.len() {
                continue;
            }
            let (stem, suffix) = file.name.split_at(file.name.len() - BLS_SUFFIX.len());
            if !suffix.eq_ignore_ascii_case(BLS_SUFFIX) {
                continue;
            }
            if default_id.is_some_and(|id| id != stem) {
                continue;
            }

            match get_bls_entry(volume, stem) {
                Ok(Some(entry)) => entries.push(entry),
                Ok(None) => (),
                Err(e) => warn!("[BLS]: Could not read {stem}{BLS_SUFFIX}: {e}"),
            }
        }

        Ok(entries)
    }
}

/// Reads and parses one entry file, then checks that its image exists.
fn get_bls_entry(volume: &mut dyn Volume, stem: &str) -> BootResult<Option<PickerEntry>> {
    let content = volume.read(&format!("{BLS_PREFIX}\\{stem}{BLS_SUFFIX}"), BLS_MAX_SIZE)?;
    let config = BlsConfig::new(&content);

    if !config.matches_architecture() {
        debug!("[BLS]: Skipping {stem}, it is for another architecture");
        return Ok(None);
    }

    let Some(path) = config.efi.as_deref().or(config.linux.as_deref()).map(normalize_path) else {
        warn!("[BLS]: Entry {stem} names neither an efi nor a linux image");
        return Ok(None);
    };

    if !volume.exists(&path) {
        warn!("[BLS]: Entry {stem} points to {path}, which does not exist");
        return Ok(None);
    }

    let name = match (config.title.as_deref(), config.version.as_deref()) {
        (Some(title), Some(version)) => format!("{title} ({version})"),
        (Some(title), None) => title.to_owned(),
        (None, _) => stem.to_owned(),
    };
    let options = config.get_options();

    Ok(Some(PickerEntry {
        id: stem.to_owned(),
        name,
        path,
        arguments: (!options.is_empty()).then_some(options),
        flavour: Some(String::from("Linux")),
        ..PickerEntry::default()
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::system::firmware::mock::{MockVolume, handle};

    const ARCH: &[u8] = b"# arch\ntitle Arch Linux\nlinux /vmlinuz-linux\n\
        initrd /intel-ucode.img\ninitrd /initramfs-linux.img\noptions root=/dev/sda2 rw\n";

    fn volume() -> MockVolume {
        MockVolume::default()
            .with_file("\\loader\\entries\\arch.conf", ARCH)
            .with_file("\\loader\\entries\\broken.conf", b"title Broken\n")
            .with_file("\\loader\\entries\\missing.conf", b"title Missing\nefi /nope.efi\n")
            .with_file("\\loader\\entries\\notes.txt", b"title Notes\nlinux /vmlinuz-linux\n")
            .with_file("\\vmlinuz-linux", b"MZ")
    }

    #[test]
    fn test_parse_bls() {
        let config = BlsConfig::new(ARCH);
        assert_eq!(config.title.as_deref(), Some("Arch Linux"));
        assert_eq!(
            config.get_options(),
            "root=/dev/sda2 rw initrd=\\intel-ucode.img initrd=\\initramfs-linux.img"
        );
    }

    #[test]
    fn test_provider_entries() -> BootResult<()> {
        let mut volume = volume();
        let entries = LinuxEntryProvider.get_entries(&mut volume, handle(1), None)?;

        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].id, "arch");
        assert_eq!(entries[0].name, "Arch Linux");
        assert_eq!(entries[0].path, "\\vmlinuz-linux");
        assert!(entries[0].arguments.as_deref().is_some_and(|a| a.starts_with("root=/dev/sda2")));
        Ok(())
    }

    #[test]
    fn test_provider_default_id() -> BootResult<()> {
        let mut volume = volume();
        assert_eq!(LinuxEntryProvider.get_entries(&mut volume, handle(1), Some("arch"))?.len(), 1);
        assert!(LinuxEntryProvider.get_entries(&mut volume, handle(1), Some("gone"))?.is_empty());
        let mut empty = MockVolume::default();
        assert!(LinuxEntryProvider.get_entries(&mut empty, handle(1), None)?.is_empty());
        Ok(())
    }

    #[test]
    fn test_other_architecture() {
        let config = BlsConfig::new(b"title X\nefi /x.efi\narchitecture not-an-arch\n");
        assert!(!config.matches_architecture());
        assert!(BlsConfig::new(b"efi /x.efi\n").matches_architecture());
    }
}
