// SPDX-FileCopyrightText: 2025 some100 <ootinnyoo@outlook.com>
// SPDX-License-Identifier: MIT

//! Provides [`CustomEntry`], the entries and tools written in the picker configuration.
//!
//! Custom entries are turned into [`BootEntry`]s after the filesystems have been scanned. Absolute entries carry a
//! text device path that the firmware converts. Tools carry a path on the picker's own filesystem, which is only
//! resolved when the tool is loaded.

use alloc::{
    string::{String, ToString},
    vec::Vec,
};
use log::{debug, warn};
use thiserror::Error;

use crate::{
    boot::{action::SystemAction, classify::BootEntryType, config::PickerConfig, context::BootEntry},
    config::builder::BootEntryBuilder,
    system::{firmware::Firmware, helper::normalize_path},
};

pub mod builder;
pub mod load_options;
pub mod providers;

/// The name of the Reset NVRAM entry.
pub const RESET_NVRAM_ENTRY_NAME: &str = "Reset NVRAM";

/// Errors indicating that a [`CustomEntry`] is invalid.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// The entry has no name.
    #[error("Custom entry \"{0}\" is missing a name")]
    MissingName(String),

    /// The entry has no path.
    #[error("Custom entry \"{0}\" is missing a path")]
    MissingPath(String),

    /// The entry has a flag that is not known.
    #[error("Custom entry \"{0}\" has unknown flag \"{1}\"")]
    UnknownFlag(String, String),

    /// The text device path of an absolute entry could not be converted.
    #[error("Custom entry \"{0}\" has an invalid device path")]
    InvalidDevicePath(String),

    /// The device path of an absolute entry does not name a file.
    #[error("Custom entry \"{0}\" has no file path in its device path")]
    NoFilePath(String),
}

/// A custom entry or tool from the picker configuration.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CustomEntry {
    /// The display name.
    pub name: String,

    /// A text device path for entries, or a path on the picker's filesystem for tools.
    pub path: String,

    /// The load options passed to the image.
    pub arguments: String,

    /// The content flavour used to pick icons.
    pub flavour: Option<String>,

    /// Whether the entry is auxiliary.
    pub auxiliary: bool,

    /// Whether this is a tool rather than an operating system.
    pub tool: bool,

    /// Start the image in text mode.
    pub text_mode: bool,

    /// Expose the device path of the tool to the image.
    pub expose_device_path: bool,

    /// Load the tool from its real path even when the host can supply the image.
    pub real_path: bool,

    /// Let the image see every variable instead of a filtered view.
    pub full_nvram_access: bool,
}

impl CustomEntry {
    /// Parses a custom entry written as `Name;Path;Arguments;flags`.
    ///
    /// Flags are comma separated and may be omitted together with their separator. Known flags are `auxiliary`,
    /// `text`, `expose_path`, `full_nvram`, `real_path` and `flavour=...`.
    ///
    /// # Errors
    ///
    /// May return an `Error` if the name or the path is empty, or a flag is not known.
    pub fn parse(value: &str, tool: bool) -> Result<Self, ConfigError> {
        let mut fields = value.splitn(4, ';').map(str::trim);
        let name = fields.next().unwrap_or_default();
        let path = fields.next().unwrap_or_default();
        let arguments = fields.next().unwrap_or_default();
        let flags = fields.next().unwrap_or_default();

        if name.is_empty() {
            return Err(ConfigError::MissingName(value.to_string()));
        }
        if path.is_empty() {
            return Err(ConfigError::MissingPath(name.to_string()));
        }

        let mut entry = Self {
            name: name.to_string(),
            path: if tool { normalize_path(path) } else { path.to_string() },
            arguments: arguments.to_string(),
            tool,
            ..Self::default()
        };

        for flag in flags.split(',').map(str::trim).filter(|f| !f.is_empty()) {
            match flag.split_once('=') {
                Some((key, flavour)) if key.eq_ignore_ascii_case("flavour") => {
                    entry.flavour = Some(flavour.to_string());
                }
                _ => match &*flag.to_ascii_lowercase() {
                    "auxiliary" => entry.auxiliary = true,
                    "text" => entry.text_mode = true,
                    "expose_path" => entry.expose_device_path = true,
                    "full_nvram" => entry.full_nvram_access = true,
                    "real_path" => entry.real_path = true,
                    _ => return Err(ConfigError::UnknownFlag(entry.name, flag.to_string())),
                },
            }
        }

        Ok(entry)
    }

    /// Turns the entry into a [`BootEntry`].
    ///
    /// # Errors
    ///
    /// May return an `Error` if the text device path of an absolute entry could not be converted, or does not name
    /// a file.
    pub fn materialize(&self, firmware: &dyn Firmware) -> Result<BootEntry, ConfigError> {
        let (entry_type, default_flavour) = if self.tool {
            (BootEntryType::EXTERNAL_TOOL, "Tool")
        } else {
            (BootEntryType::EXTERNAL_OS, "Auto")
        };

        let mut builder = BootEntryBuilder::new(&self.name, entry_type)
            .id(&self.path)
            .custom(true)
            .auxiliary(self.auxiliary)
            .launch_in_text(self.text_mode)
            .expose_device_path(self.expose_device_path)
            .full_nvram_access(self.full_nvram_access)
            .real_path(self.real_path)
            .flavour(self.flavour.as_deref().unwrap_or(default_flavour))
            .assign_if_some(
                Some(self.arguments.as_str()).filter(|a| !a.is_empty()),
                BootEntryBuilder::load_options,
            );

        if self.tool {
            builder = builder.path_name(&self.path);
        } else {
            let device_path = firmware
                .text_to_device_path(&self.path)
                .map_err(|_| ConfigError::InvalidDevicePath(self.name.clone()))?;
            let path_name = device_path
                .last_file_path()
                .ok_or_else(|| ConfigError::NoFilePath(self.name.clone()))?;
            builder = builder.path_name(path_name).device_path(device_path);
        }

        Ok(builder.build())
    }
}

/// Turns every custom entry of the configuration into a [`BootEntry`], followed by the Reset NVRAM entry if enabled.
///
/// Entries that cannot be materialized are skipped with a warning. Absolute entries come before tools, whatever
/// order they were written in.
#[must_use = "Has no effect if the result is unused"]
pub fn materialize_custom_entries(
    config: &PickerConfig,
    firmware: &dyn Firmware,
) -> Vec<BootEntry> {
    let (tools, entries): (Vec<&CustomEntry>, Vec<&CustomEntry>) =
        config.custom_entries.iter().partition(|entry| entry.tool);

    let mut materialized: Vec<BootEntry> = entries
        .into_iter()
        .chain(tools)
        .filter_map(|custom| match custom.materialize(firmware) {
            Ok(entry) => {
                debug!("Custom entry {} at {}", entry.name, entry.path_name);
                Some(entry)
            }
            Err(e) => {
                warn!("{e}");
                None
            }
        })
        .collect();

    if let Some(reset) = reset_nvram_entry(config) {
        materialized.push(reset);
    }
    materialized
}

/// Builds the Reset NVRAM entry, if the configuration offers it.
#[must_use = "Has no effect if the result is unused"]
pub fn reset_nvram_entry(config: &PickerConfig) -> Option<BootEntry> {
    if !config.show_nvram_reset {
        return None;
    }
    Some(
        BootEntryBuilder::new(RESET_NVRAM_ENTRY_NAME, BootEntryType::SYSTEM)
            .id("reset-nvram")
            .flavour("NVRAMReset")
            .action(SystemAction::ResetNvram)
            .auxiliary(!config.allow_nvram_reset_on_hide)
            .build(),
    )
}
