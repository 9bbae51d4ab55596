// SPDX-FileCopyrightText: 2025 some100 <ootinnyoo@outlook.com>
// SPDX-License-Identifier: MIT

//! Boot Entry Protocol providers, which contribute entries that the built-in discovery cannot find.
//!
//! Providers are asked once per scanned filesystem, after the built-in discovery. When the picker only resolves
//! the default entry, providers are given the id of the remembered default, and return that entry alone.

use alloc::{string::String, vec::Vec};
use uefi::{Guid, Handle};

use crate::{
    BootResult,
    boot::{classify::BootEntryType, context::BootEntry},
    config::builder::BootEntryBuilder,
    system::{device_path::DevicePathBuf, firmware::Volume, helper::dir_name},
};

#[cfg(feature = "linux")]
pub mod linux;

/// An entry supplied by a [`BootEntryProvider`].
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PickerEntry {
    /// A stable identifier, unique for the provider on one filesystem.
    pub id: String,

    /// The display name.
    pub name: String,

    /// The path of the image on the filesystem.
    pub path: String,

    /// The load options passed to the image.
    pub arguments: Option<String>,

    /// The content flavour used to pick icons.
    pub flavour: Option<String>,

    /// Whether the entry is auxiliary.
    pub auxiliary: bool,

    /// Whether this is a tool rather than an operating system.
    pub tool: bool,

    /// Start the image in text mode.
    pub text_mode: bool,

    /// Let the image see every variable instead of a filtered view.
    pub full_nvram_access: bool,
}

impl PickerEntry {
    /// Turns the entry into a [`BootEntry`] on the filesystem at `root`.
    ///
    /// # Errors
    ///
    /// May return an `Error` if the path could not be encoded into a device path.
    pub fn into_boot_entry(
        self,
        root: &DevicePathBuf,
        partition_guid: Option<Guid>,
        external: bool,
    ) -> BootResult<BootEntry> {
        let entry_type = if self.tool {
            BootEntryType::EXTERNAL_TOOL
        } else {
            BootEntryType::EXTERNAL_OS
        };
        let device_path = root.append_file_path(&self.path)?;

        Ok(BootEntryBuilder::new(self.name, entry_type)
            .id(self.id)
            .path_name(dir_name(&self.path))
            .device_path(device_path)
            .flavour(self.flavour.unwrap_or_else(|| String::from("Auto")))
            .boot_entry_protocol(true)
            .external(external)
            .auxiliary(self.auxiliary)
            .launch_in_text(self.text_mode)
            .full_nvram_access(self.full_nvram_access)
            .assign_if_some(partition_guid, BootEntryBuilder::partition_guid)
            .assign_if_some(self.arguments, BootEntryBuilder::load_options)
            .build())
    }
}

/// Supplies additional entries for a filesystem.
pub trait BootEntryProvider {
    /// The name of the provider, for logging.
    fn name(&self) -> &'static str;

    /// Returns the entries on a filesystem.
    ///
    /// With `default_id` set, only the entry with that id is returned, if it exists.
    ///
    /// # Errors
    ///
    /// May return an `Error` if the filesystem could not be read. An empty result is not an error.
    fn get_entries(
        &self,
        volume: &mut dyn Volume,
        handle: Handle,
        default_id: Option<&str>,
    ) -> BootResult<Vec<PickerEntry>>;
}

/// Returns the providers that are built in, according to the enabled features.
#[must_use = "Has no effect if the result is unused"]
pub fn builtin_providers() -> Vec<alloc::boxed::Box<dyn BootEntryProvider>> {
    #[cfg_attr(not(feature = "linux"), expect(unused_mut))]
    let mut providers: Vec<alloc::boxed::Box<dyn BootEntryProvider>> = Vec::new();
    #[cfg(feature = "linux")]
    providers.push(alloc::boxed::Box::new(linux::LinuxEntryProvider));
    providers
}
