// SPDX-FileCopyrightText: 2025 some100 <ootinnyoo@outlook.com>
// SPDX-License-Identifier: MIT

//! Boot entry builder.

use alloc::string::String;
use uefi::Guid;

use crate::{
    boot::{action::SystemAction, classify::BootEntryType, context::BootEntry},
    system::device_path::DevicePathBuf,
};

/// A builder to configure a [`BootEntry`].
///
/// # Example
///
/// ```
/// use bootpicker_rs_core::{boot::classify::BootEntryType, config::builder::BootEntryBuilder};
///
/// let entry = BootEntryBuilder::new("Shell", BootEntryType::EXTERNAL_TOOL)
///     .path_name("\\EFI\\tools\\Shell.efi")
///     .auxiliary(true)
///     .build();
/// assert!(entry.is_tool());
/// ```
#[must_use = "Has no effect if the result is unused"]
pub struct BootEntryBuilder {
    /// The inner [`BootEntry`] that the builder operates on.
    entry: BootEntry,
}

impl BootEntryBuilder {
    /// Constructs a new [`BootEntry`] with a name and type.
    pub fn new(name: impl Into<String>, entry_type: BootEntryType) -> Self {
        Self {
            entry: BootEntry {
                name: name.into(),
                entry_type,
                ..BootEntry::default()
            },
        }
    }

    /// Sets the stable identifier of a [`BootEntry`].
    pub fn id(mut self, id: impl Into<String>) -> Self {
        self.entry.id = id.into();
        self
    }

    /// Sets the device path of a [`BootEntry`].
    pub fn device_path(mut self, device_path: DevicePathBuf) -> Self {
        self.entry.device_path = Some(device_path);
        self
    }

    /// Sets the [`SystemAction`] of a [`BootEntry`], which runs instead of loading an image.
    pub const fn action(mut self, action: SystemAction) -> Self {
        self.entry.action = Some(action);
        self
    }

    /// Sets the directory or tool path of a [`BootEntry`].
    pub fn path_name(mut self, path_name: impl Into<String>) -> Self {
        self.entry.path_name = path_name.into();
        self
    }

    /// Sets the content flavour of a [`BootEntry`].
    pub fn flavour(mut self, flavour: impl Into<String>) -> Self {
        self.entry.flavour = flavour.into();
        self
    }

    /// Sets the load options of a [`BootEntry`].
    pub fn load_options(mut self, load_options: impl Into<String>) -> Self {
        self.entry.load_options = Some(load_options.into());
        self
    }

    /// Sets the unique partition GUID of a [`BootEntry`].
    pub const fn partition_guid(mut self, guid: Guid) -> Self {
        self.entry.partition_guid = Some(guid);
        self
    }

    /// Marks a [`BootEntry`] as coming from an external device.
    pub const fn external(mut self, external: bool) -> Self {
        self.entry.is_external = external;
        self
    }

    /// Marks a [`BootEntry`] as a folder, which may hold a disk image.
    pub const fn folder(mut self, folder: bool) -> Self {
        self.entry.is_folder = folder;
        self
    }

    /// Marks a [`BootEntry`] as using the removable media loader name.
    pub const fn generic(mut self, generic: bool) -> Self {
        self.entry.is_generic = generic;
        self
    }

    /// Marks a [`BootEntry`] as coming from the configuration.
    pub const fn custom(mut self, custom: bool) -> Self {
        self.entry.is_custom = custom;
        self
    }

    /// Marks a [`BootEntry`] as coming from a [`crate::config::providers::BootEntryProvider`].
    pub const fn boot_entry_protocol(mut self, bep: bool) -> Self {
        self.entry.is_boot_entry_protocol = bep;
        self
    }

    /// Marks a [`BootEntry`] as a macOS installer.
    pub const fn apple_installer(mut self, installer: bool) -> Self {
        self.entry.is_apple_installer = installer;
        self
    }

    /// Marks a [`BootEntry`] as auxiliary.
    pub const fn auxiliary(mut self, auxiliary: bool) -> Self {
        self.entry.auxiliary = auxiliary;
        self
    }

    /// Starts a [`BootEntry`] in text mode.
    pub const fn launch_in_text(mut self, text: bool) -> Self {
        self.entry.launch_in_text = text;
        self
    }

    /// Exposes the device path of a [`BootEntry`] to the image.
    pub const fn expose_device_path(mut self, expose: bool) -> Self {
        self.entry.expose_device_path = expose;
        self
    }

    /// Gives a [`BootEntry`] access to every variable.
    pub const fn full_nvram_access(mut self, full: bool) -> Self {
        self.entry.full_nvram_access = full;
        self
    }

    /// Loads a tool [`BootEntry`] from its real path.
    pub const fn real_path(mut self, real_path: bool) -> Self {
        self.entry.real_path = real_path;
        self
    }

    /// Builds a [`BootEntry`].
    #[must_use = "Has no effect if the result is unused"]
    pub fn build(self) -> BootEntry {
        self.entry
    }

    /// Assigns a value to a field in a [`BootEntry`] if it is [`Some`].
    pub fn assign_if_some<F, T>(self, value: Option<T>, assign: F) -> Self
    where
        F: FnOnce(Self, T) -> Self,
    {
        if let Some(value) = value {
            assign(self, value)
        } else {
            self
        }
    }
}

impl From<&BootEntry> for BootEntryBuilder {
    fn from(value: &BootEntry) -> Self {
        Self {
            entry: BootEntry {
                entry_index: None,
                set_default: false,
                ..value.clone()
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::borrow::ToOwned;

    #[test]
    fn test_basic_entry() -> Result<(), crate::system::device_path::DevicePathError> {
        let path = DevicePathBuf::new_file_path("\\EFI\\foo\\foo.efi")?;
        let entry = BootEntryBuilder::new("Foo", BootEntryType::EXTERNAL_OS)
            .id("\\EFI\\foo\\foo.efi")
            .device_path(path.clone())
            .path_name("\\EFI\\foo\\")
            .assign_if_some(Some("quiet"), BootEntryBuilder::load_options)
            .assign_if_some(None::<&str>, BootEntryBuilder::flavour)
            .build();

        assert_eq!(entry.name, "Foo".to_owned());
        assert_eq!(entry.device_path, Some(path));
        assert_eq!(entry.load_options, Some("quiet".to_owned()));
        assert!(entry.flavour.is_empty());
        assert_eq!(entry.entry_index, None);
        Ok(())
    }

    #[test]
    fn test_rebuild_drops_selection_state() {
        let mut entry = BootEntryBuilder::new("Foo", BootEntryType::WINDOWS).build();
        entry.entry_index = Some(3);
        entry.set_default = true;

        let rebuilt = BootEntryBuilder::from(&entry).auxiliary(true).build();
        assert_eq!(rebuilt.entry_index, None);
        assert!(!rebuilt.set_default);
        assert!(rebuilt.auxiliary);
        assert_eq!(rebuilt.entry_type, BootEntryType::WINDOWS);
    }
}
