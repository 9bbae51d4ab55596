// SPDX-FileCopyrightText: 2025 some100 <ootinnyoo@outlook.com>
// SPDX-License-Identifier: MIT

//! Provides [`PickerConfig`], the configuration file for the picker.
//!
//! This parses space separated key value pairs, one per line. Lines starting with `#` are comments.
//!
//! Example configuration:
//!
//! ```text
//! # Seconds before the default entry is booted, 0 waits forever
//! timeout 5
//!
//! # Which devices and filesystems may be scanned
//! scan_policy 0x010F0103
//!
//! # Disk images in recovery folders: disabled, any or signed
//! dmg_loading signed
//!
//! # Move recovery, Time Machine and tools out of the way
//! hide_auxiliary true
//!
//! # Apple boot-args, put in front of the load options of macOS entries
//! boot_args -v keepsyms=1
//!
//! # Extra paths to look for loaders in
//! bless_override \EFI\Custom\loader.efi
//!
//! # Name;Path;Arguments;flags
//! entry Ubuntu;PciRoot(0x0)/Pci(0x1,0x1)/Sata(0,0,0)/HD(1,GPT,...)/\EFI\ubuntu\shimx64.efi;;
//! tool Shell;\EFI\tools\Shell.efi;;auxiliary,text
//! ```

use alloc::{string::String, vec::Vec};
use log::{debug, warn};
use uefi::runtime::VariableVendor;

use crate::{
    boot::{
        args::{BOOT_LINE_LENGTH, merge_arguments},
        policy::ScanPolicy,
    },
    config::CustomEntry,
    system::{
        firmware::Firmware,
        helper::normalize_path,
        variable::{
            APPLE_BOOT_VARIABLE_GUID, OC_VENDOR_VARIABLE_GUID, VariableStore, get_variable_str,
        },
    },
};

/// The configuration path on the filesystem the picker was loaded from.
pub const CONFIG_PATH: &str = "\\EFI\\bootpicker\\bootpicker.conf";

/// The largest configuration file that will be read.
const CONFIG_MAX_SIZE: usize = 16 * 1024;

/// Whether disk images found in folder entries may be booted.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum DmgLoading {
    /// Disk images are never booted.
    Disabled,

    /// Any disk image is booted.
    Any,

    /// Only disk images with a chunklist that the host accepts are booted.
    #[default]
    Signed,
}

impl DmgLoading {
    /// Parses the configuration value of a [`DmgLoading`].
    fn parse(value: &str) -> Option<Self> {
        match &*value.to_ascii_lowercase() {
            "disabled" => Some(Self::Disabled),
            "any" => Some(Self::Any),
            "signed" => Some(Self::Signed),
            _ => None,
        }
    }
}

/// The configuration of the picker.
#[derive(Clone, Debug)]
pub struct PickerConfig {
    /// Seconds before the default entry is chosen. `0` waits forever.
    pub timeout: u64,

    /// Microseconds to wait right before the chosen image is started.
    pub takeoff_delay: usize,

    /// Which devices and filesystems are scanned.
    pub scan_policy: ScanPolicy,

    /// Whether disk images may be booted.
    pub dmg_loading: DmgLoading,

    /// Leave auxiliary entries out of the menu.
    pub hide_auxiliary: bool,

    /// Offer a Reset NVRAM entry.
    pub show_nvram_reset: bool,

    /// Keep the Reset NVRAM entry in the menu when auxiliary entries are hidden.
    pub allow_nvram_reset_on_hide: bool,

    /// Allow the chosen entry to be written to `BootOrder`.
    pub allow_set_default: bool,

    /// Keep `BootOrder` and the boot options in the picker's own namespace instead of the global one.
    pub custom_boot_guid: bool,

    /// When looking for the default entry without a menu, only honor `BootNext`.
    pub default_only_boot_next: bool,

    /// Apple boot-args put in front of the load options of macOS entries.
    pub boot_args: String,

    /// Extra loader paths tried on every filesystem.
    pub bless_override: Vec<String>,

    /// Custom entries and tools, in the order they were written.
    pub custom_entries: Vec<CustomEntry>,
}

impl PickerConfig {
    /// Reads the configuration from the filesystem the picker was loaded from.
    ///
    /// A missing or unreadable file yields the default configuration.
    #[must_use = "Has no effect if the result is unused"]
    pub fn new(firmware: &dyn Firmware) -> Self {
        let Some((handle, _)) = firmware
            .loader_path()
            .and_then(|path| firmware.locate_filesystem(&path))
        else {
            debug!("Loader filesystem not found, using the default config");
            return Self::default();
        };

        let content = firmware
            .open_volume(handle)
            .and_then(|mut volume| volume.read(CONFIG_PATH, CONFIG_MAX_SIZE));
        match content {
            Ok(content) => Self::get_picker_config(&content),
            Err(e) if e.is_not_found() => {
                debug!("No config at {CONFIG_PATH}");
                Self::default()
            }
            Err(e) => {
                warn!("{e}");
                Self::default()
            }
        }
    }

    /// Parses the contents of a [`PickerConfig`] format string.
    ///
    /// Unknown keys and malformed values are skipped with a warning.
    #[must_use = "Has no effect if the result is unused"]
    pub fn get_picker_config(content: &[u8]) -> Self {
        let mut config = Self::default();
        let end = content.iter().position(|&b| b == 0).unwrap_or(content.len());

        let Ok(content) = str::from_utf8(&content[..end]) else {
            warn!("Config is not UTF-8, using the default config");
            return config;
        };
        for line in content.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }

            let (key, value) = line.split_once(' ').unwrap_or((line, ""));
            config.assign_to_field(key, value.trim());
        }

        config
    }

    /// Assigns one key value pair.
    fn assign_to_field(&mut self, key: &str, value: &str) {
        match &*key.to_ascii_lowercase() {
            "timeout" => assign_parsed(&mut self.timeout, key, value, |v| v.parse().ok()),
            "takeoff_delay" => {
                assign_parsed(&mut self.takeoff_delay, key, value, |v| v.parse().ok());
            }
            "scan_policy" => assign_parsed(&mut self.scan_policy, key, value, |v| {
                let bits = crate::config::load_options::parse_int(v)?;
                Some(ScanPolicy::from_bits_retain(u32::try_from(bits).ok()?))
            }),
            "dmg_loading" => assign_parsed(&mut self.dmg_loading, key, value, DmgLoading::parse),
            "hide_auxiliary" => assign_parsed(&mut self.hide_auxiliary, key, value, parse_bool),
            "show_nvram_reset" => assign_parsed(&mut self.show_nvram_reset, key, value, parse_bool),
            "allow_nvram_reset_on_hide" => {
                assign_parsed(&mut self.allow_nvram_reset_on_hide, key, value, parse_bool);
            }
            "allow_set_default" => {
                assign_parsed(&mut self.allow_set_default, key, value, parse_bool);
            }
            "custom_boot_guid" => assign_parsed(&mut self.custom_boot_guid, key, value, parse_bool),
            "default_only_boot_next" => {
                assign_parsed(&mut self.default_only_boot_next, key, value, parse_bool);
            }
            "boot_args" => {
                if value.len() < BOOT_LINE_LENGTH {
                    self.boot_args = String::from(value);
                } else {
                    warn!("boot_args is longer than {BOOT_LINE_LENGTH} bytes, ignoring");
                }
            }
            "bless_override" if !value.is_empty() => {
                self.bless_override.push(normalize_path(value));
            }
            "entry" | "tool" => match CustomEntry::parse(value, key.eq_ignore_ascii_case("tool")) {
                Ok(entry) => self.custom_entries.push(entry),
                Err(e) => warn!("{e}"),
            },
            _ => warn!("Found unrecognized config key {key} with value {value}"),
        }
    }

    /// Applies overrides stored in NVRAM.
    ///
    /// `scan-policy` in the picker's namespace is a little endian `u32` that replaces the configured policy. The Apple
    /// `boot-args` variable is merged into [`PickerConfig::boot_args`], where arguments already configured win.
    pub fn apply_nvram_overrides(&mut self, variables: &dyn VariableStore) {
        let vendor = VariableVendor(OC_VENDOR_VARIABLE_GUID);
        match variables.get(uefi::cstr16!("scan-policy"), &vendor) {
            Ok(Some((data, _))) if data.len() == 4 => {
                let policy = u32::from_le_bytes([data[0], data[1], data[2], data[3]]);
                debug!("Scan policy overridden from NVRAM to {policy:#010X}");
                self.scan_policy = ScanPolicy::from_bits_retain(policy);
            }
            Ok(Some((data, _))) => warn!("Ignoring scan-policy of {} bytes", data.len()),
            Ok(None) => (),
            Err(e) => warn!("{e}"),
        }

        let apple = VariableVendor(APPLE_BOOT_VARIABLE_GUID);
        match get_variable_str(variables, uefi::cstr16!("boot-args"), &apple) {
            Ok(Some(nvram)) => {
                if let Err(e) = merge_arguments(&mut self.boot_args, &nvram) {
                    warn!("Only part of boot-args was kept: {e}");
                }
                debug!("Boot arguments are now \"{}\"", self.boot_args);
            }
            Ok(None) => (),
            Err(e) => warn!("{e}"),
        }
    }
}

impl Default for PickerConfig {
    fn default() -> Self {
        Self {
            timeout: 5,
            takeoff_delay: 0,
            scan_policy: ScanPolicy::DEFAULT,
            dmg_loading: DmgLoading::default(),
            hide_auxiliary: false,
            show_nvram_reset: false,
            allow_nvram_reset_on_hide: false,
            allow_set_default: false,
            custom_boot_guid: false,
            default_only_boot_next: false,
            boot_args: String::new(),
            bless_override: Vec::new(),
            custom_entries: Vec::new(),
        }
    }
}

/// Parses `true`/`false`, and the `1`/`0` or `yes`/`no` that people also write.
fn parse_bool(value: &str) -> Option<bool> {
    match &*value.to_ascii_lowercase() {
        "true" | "1" | "yes" => Some(true),
        "false" | "0" | "no" => Some(false),
        _ => None,
    }
}

/// Assigns a parsed value, warning if it does not parse.
fn assign_parsed<T>(field: &mut T, key: &str, value: &str, parse: impl FnOnce(&str) -> Option<T>) {
    match parse(value) {
        Some(value) => *field = value,
        None => warn!("Invalid value {value} for config key {key}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::system::{
        device_path::{DevicePathBuf, fixtures},
        firmware::mock::{MockFirmware, MockVolume},
        variable::{BOOT_OPTION_ATTRIBUTES, MemoryVariableStore},
    };
    use uefi::guid;

    #[test]
    fn test_full_config() {
        let config = br"
            # comment
            timeout 10
            takeoff_delay 250
            scan_policy 0x00000103
            dmg_loading any
            hide_auxiliary true
            show_nvram_reset yes
            allow_set_default 1
            custom_boot_guid false
            boot_args -v keepsyms=1
            bless_override /EFI/Custom/loader.efi
            tool Shell;\EFI\tools\Shell.efi;;auxiliary,text
            unknown_key whatever
        ";

        let config = PickerConfig::get_picker_config(config);
        assert_eq!(config.timeout, 10);
        assert_eq!(config.takeoff_delay, 250);
        assert_eq!(config.scan_policy.bits(), 0x103);
        assert_eq!(config.dmg_loading, DmgLoading::Any);
        assert!(config.hide_auxiliary);
        assert!(config.show_nvram_reset);
        assert!(config.allow_set_default);
        assert!(!config.custom_boot_guid);
        assert_eq!(config.boot_args, "-v keepsyms=1");
        assert_eq!(config.bless_override, ["\\EFI\\Custom\\loader.efi"]);
        assert_eq!(config.custom_entries.len(), 1);
        assert!(config.custom_entries[0].tool);
    }

    #[test]
    fn test_bad_values_keep_defaults() {
        let config =
            PickerConfig::get_picker_config(b"timeout soon\ndmg_loading maybe\nhide_auxiliary\n");
        assert_eq!(config.timeout, 5);
        assert_eq!(config.dmg_loading, DmgLoading::Signed);
        assert!(!config.hide_auxiliary);
        assert_eq!(config.scan_policy, ScanPolicy::DEFAULT);
    }

    #[test]
    fn test_config_from_loader_filesystem() -> crate::BootResult<()> {
        let esp = fixtures::sata_partition(1, guid!("11111111-2222-3333-4444-555555555555"));
        let mut firmware = MockFirmware::default();
        firmware.add_fs(
            esp.clone(),
            None,
            MockVolume::default().with_file(CONFIG_PATH, b"timeout 0\n"),
        );
        firmware.loader_path = Some(esp.append_file_path("\\EFI\\bootpicker\\bootpicker.efi")?);
        assert_eq!(PickerConfig::new(&firmware).timeout, 0);

        firmware.loader_path = Some(DevicePathBuf::new_file_path("\\nowhere.efi")?);
        assert_eq!(PickerConfig::new(&firmware).timeout, 5);
        Ok(())
    }

    #[test]
    fn test_nvram_scan_policy() -> crate::BootResult<()> {
        let mut variables = MemoryVariableStore::new();
        variables.set(
            uefi::cstr16!("scan-policy"),
            &VariableVendor(OC_VENDOR_VARIABLE_GUID),
            BOOT_OPTION_ATTRIBUTES,
            &0x0021_0F00u32.to_le_bytes(),
        )?;
        let mut config = PickerConfig::default();
        config.apply_nvram_overrides(&variables);
        assert_eq!(config.scan_policy.bits(), 0x0021_0F00);
        Ok(())
    }

    #[test]
    fn test_nvram_boot_args_merge() -> crate::BootResult<()> {
        let mut variables = MemoryVariableStore::new();
        variables.set(
            uefi::cstr16!("boot-args"),
            &VariableVendor(APPLE_BOOT_VARIABLE_GUID),
            BOOT_OPTION_ATTRIBUTES,
            b"-v debug=0x144 alcid=1\0",
        )?;
        let mut config = PickerConfig::get_picker_config(b"boot_args keepsyms=1 debug=0x100\n");
        config.apply_nvram_overrides(&variables);
        assert_eq!(config.boot_args, "keepsyms=1 debug=0x100 -v alcid=1");

        let mut config = PickerConfig::default();
        config.apply_nvram_overrides(&MemoryVariableStore::new());
        assert!(config.boot_args.is_empty());
        Ok(())
    }
}
