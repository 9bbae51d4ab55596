// SPDX-FileCopyrightText: 2025 some100 <ootinnyoo@outlook.com>
// SPDX-License-Identifier: MIT

//! Provides [`BootPicker`], a struct which abstracts most of scanning for, choosing and booting entries.

use alloc::{boxed::Box, vec::Vec};
use log::{error, info};

use crate::{
    BootResult,
    boot::{
        config::PickerConfig,
        context::{
            BootContext, BootEntry, EntryRef, PickerContext, scan_for_boot_entries,
            scan_for_default_boot_entry,
        },
        default_entry::{register_launcher_option, set_default_entry},
        enumerate::enumerate_entries,
        loader::{LoadedEntry, load_boot_entry, start_entry},
        services::HostServices,
    },
    config::providers::BootEntryProvider,
    error::BootError,
    system::{firmware::Firmware, variable::VariableStore},
};

pub mod action;
pub mod args;
pub mod classify;
pub mod config;
pub mod context;
pub mod default_entry;
pub mod enumerate;
pub mod input;
pub mod loader;
pub mod policy;
pub mod scan;
pub mod services;

/// The boot picker: the entries of the last scan, and everything needed to boot them.
pub struct BootPicker<F, V, S> {
    /// The configuration and the state shared between scans.
    picker: PickerContext,

    /// The firmware.
    firmware: F,

    /// The variable store.
    variables: V,

    /// The capabilities of the front end.
    services: S,

    /// The result of the last scan.
    context: BootContext,

    /// The entries of the last scan in presentation order.
    order: Vec<EntryRef>,
}

impl<F: Firmware, V: VariableStore, S: HostServices> BootPicker<F, V, S> {
    /// Creates a new [`BootPicker`] from a configuration.
    ///
    /// Overrides stored in NVRAM, like `scan-policy`, are applied on top of the configuration. Nothing is scanned
    /// until [`BootPicker::scan`] or [`BootPicker::scan_default`] is called.
    pub fn new(mut config: PickerConfig, firmware: F, variables: V, services: S) -> Self {
        config.apply_nvram_overrides(&variables);
        Self {
            picker: PickerContext::new(config),
            firmware,
            variables,
            services,
            context: <BootContext as Default>::default(),
            order: Vec::new(),
        }
    }

    /// Creates a new [`BootPicker`], reading the configuration from `\EFI\bootpicker\bootpicker.conf` on the
    /// filesystem the picker was loaded from.
    pub fn from_firmware(firmware: F, variables: V, services: S) -> Self {
        let config = PickerConfig::new(&firmware);
        Self::new(config, firmware, variables, services)
    }

    /// Scans every filesystem.
    ///
    /// With `for_boot` set, `BootNext` is consumed so that it is honored only once.
    ///
    /// # Errors
    ///
    /// May return an `Error` if the filesystems or the boot order could not be read.
    pub fn scan(&mut self, for_boot: bool) -> BootResult<()> {
        let context =
            scan_for_boot_entries(&mut self.picker, &self.firmware, &mut self.variables, for_boot)?;
        self.replace_context(context);
        Ok(())
    }

    /// Scans only the filesystems that the boot order points to.
    ///
    /// This is much faster than [`BootPicker::scan`] when there is no need to show a menu.
    ///
    /// # Errors
    ///
    /// May return an `Error` if the boot order could not be read.
    pub fn scan_default(&mut self, use_boot_next_only: bool) -> BootResult<()> {
        let context = scan_for_default_boot_entry(
            &mut self.picker,
            &self.firmware,
            &mut self.variables,
            use_boot_next_only,
        )?;
        self.replace_context(context);
        Ok(())
    }

    /// Stores a new scan result and lays it out for presentation.
    fn replace_context(&mut self, mut context: BootContext) {
        self.order = enumerate_entries(&mut context, self.picker.config.hide_auxiliary);
        self.context = context;
        info!("{} entries to show", self.order.len());
    }

    /// Returns the shown entries in presentation order.
    #[must_use = "Has no effect if the result is unused"]
    pub fn list(&self) -> Vec<&BootEntry> {
        self.order.iter().filter_map(|&pos| self.context.entry(pos)).collect()
    }

    /// Returns the index of the default entry in [`BootPicker::list`].
    ///
    /// Returns [`None`] if there is no default, or it is hidden.
    #[must_use = "Has no effect if the result is unused"]
    pub fn get_default(&self) -> Option<usize> {
        self.context.default()?.entry_index
    }

    /// Returns the position of a shown entry.
    fn position(&self, index: usize) -> BootResult<EntryRef> {
        self.order.get(index).copied().ok_or(BootError::InvalidParameter)
    }

    /// Loads an entry by its index in [`BootPicker::list`].
    ///
    /// # Errors
    ///
    /// May return an `Error` if the index is out of range, or the entry could not be loaded.
    pub fn load(&mut self, index: usize) -> BootResult<LoadedEntry> {
        let position = self.position(index)?;
        let parent = self.firmware.image_handle();
        load_boot_entry(
            &self.picker,
            &mut self.services,
            &self.firmware,
            &mut self.variables,
            &self.context,
            position,
            parent,
        )
    }

    /// Loads and starts an entry by its index in [`BootPicker::list`].
    ///
    /// # Errors
    ///
    /// May return an `Error` if the entry could not be loaded, or it failed to start.
    pub fn boot(&mut self, index: usize) -> BootResult<()> {
        let loaded = self.load(index)?;
        start_entry(&self.picker, &mut self.services, &self.firmware, &loaded)
    }

    /// Makes an entry the default in NVRAM right away.
    ///
    /// # Errors
    ///
    /// Returns [`BootError::SecurityViolation`] unless `allow_set_default` is enabled. May also return an `Error` if
    /// the entry has no device path, or the variables could not be written.
    pub fn set_default(&mut self, index: usize) -> BootResult<()> {
        let position = self.position(index)?;
        let entry = self.context.entry(position).ok_or(BootError::InvalidParameter)?;
        set_default_entry(&self.picker, &self.firmware, &mut self.variables, entry)?;
        self.context.default_entry = Some(position);
        Ok(())
    }

    /// Marks an entry to become the default once it loads successfully.
    ///
    /// # Errors
    ///
    /// Returns [`BootError::SecurityViolation`] unless `allow_set_default` is enabled, or an `Error` if the index is out
    /// of range.
    pub fn mark_default(&mut self, index: usize) -> BootResult<()> {
        if !self.picker.config.allow_set_default {
            return Err(BootError::SecurityViolation);
        }
        let position = self.position(index)?;
        if let Some(entry) = self.context.entry_mut(position) {
            entry.set_default = true;
        }
        Ok(())
    }

    /// Registers the picker itself as `Boot9696`, first in `BootOrder`.
    ///
    /// # Errors
    ///
    /// May return an `Error` if the picker does not know where it was loaded from, or the variables could not be
    /// written.
    pub fn register_launcher(&mut self, name: &str) -> BootResult<()> {
        let loader_path = self.firmware.loader_path().ok_or(BootError::NotFound)?;
        let vendor = self.picker.boot_vendor();
        if let Err(e) = register_launcher_option(&mut self.variables, &vendor, &loader_path, name) {
            error!("Could not register the launcher: {e}");
            return Err(e);
        }
        Ok(())
    }

    /// Adds a Boot Entry Protocol provider, which is asked for entries on every later scan.
    pub fn add_provider(&mut self, provider: Box<dyn BootEntryProvider>) {
        self.picker.providers.push(provider);
    }

    /// Returns the result of the last scan.
    #[must_use = "Has no effect if the result is unused"]
    pub const fn context(&self) -> &BootContext {
        &self.context
    }

    /// Returns the configuration.
    #[must_use = "Has no effect if the result is unused"]
    pub const fn config(&self) -> &PickerConfig {
        &self.picker.config
    }

    /// Returns the configuration for changes that apply to later scans.
    pub const fn config_mut(&mut self) -> &mut PickerConfig {
        &mut self.picker.config
    }

    /// Returns the firmware.
    #[must_use = "Has no effect if the result is unused"]
    pub const fn firmware(&self) -> &F {
        &self.firmware
    }

    /// Returns the variable store.
    #[must_use = "Has no effect if the result is unused"]
    pub const fn variables(&self) -> &V {
        &self.variables
    }

    /// Returns the host services.
    pub const fn services_mut(&mut self) -> &mut S {
        &mut self.services
    }
}
