// SPDX-FileCopyrightText: 2025 some100 <ootinnyoo@outlook.com>
// SPDX-License-Identifier: MIT

//! `BootOrder`, `BootNext` and the `Boot####` options they point at.

use alloc::{format, vec::Vec};
use log::{debug, warn};
use tinyvec::TinyVec;
use uefi::{CString16, cstr16, runtime::VariableVendor};

use crate::{
    BootResult,
    system::variable::{
        BOOT_OPTION_ATTRIBUTES, VariableStore,
        boot_option::{LoadOption, LoadOptionAttributes},
        get_variable_u16_slice, set_variable_u16_slice, variable_name,
    },
};

/// The boot option index that the picker itself is registered under.
pub const LAUNCHER_OPTION: u16 = 0x9696;

/// The boot option index that a chosen default is written to when no existing option matches.
pub const DEFAULT_OPTION: u16 = 0x0080;

/// The boot order as read from NVRAM.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct BootOrder {
    /// Boot option indices in priority order. When `has_boot_next` is set, the first one came from `BootNext`.
    pub options: TinyVec<[u16; 16]>,

    /// Whether a duplicate index was removed.
    pub deduplicated: bool,

    /// Whether `BootNext` was present and prepended.
    pub has_boot_next: bool,
}

impl BootOrder {
    /// Removes every repeated index, keeping the first occurrence. Returns `true` if something was removed.
    fn deduplicate(&mut self) -> bool {
        let before = self.options.len();
        let mut seen: TinyVec<[u16; 16]> = TinyVec::new();
        self.options.retain(|option| {
            if seen.contains(option) {
                false
            } else {
                seen.push(*option);
                true
            }
        });
        self.options.len() != before
    }
}

/// Returns the `Boot####` variable name for an option index.
///
/// # Errors
///
/// This should never fail, since the name only holds ASCII.
pub fn boot_option_name(option: u16) -> BootResult<CString16> {
    Ok(variable_name(&format!("Boot{option:04X}"))?)
}

/// Reads `BootOrder`, optionally preceded by `BootNext`, from the given namespace.
///
/// A `BootOrder` that is empty or has an odd size is treated as absent. A `BootNext` that is not exactly one `u16`
/// is ignored. If only `BootNext` is usable, the order consists of `BootNext` alone. Returns [`None`] if neither is
/// usable.
///
/// # Errors
///
/// May return an `Error` if the variables exist but could not be read.
pub fn get_boot_order(
    store: &dyn VariableStore,
    vendor: &VariableVendor,
    with_boot_next: bool,
) -> BootResult<Option<BootOrder>> {
    let boot_next = if with_boot_next {
        match store.get(cstr16!("BootNext"), vendor)? {
            Some((data, _)) if data.len() == 2 => Some(u16::from_le_bytes([data[0], data[1]])),
            Some((data, _)) => {
                warn!("Ignoring BootNext of {} bytes", data.len());
                None
            }
            None => None,
        }
    } else {
        None
    };

    let order = match get_variable_u16_slice(store, cstr16!("BootOrder"), vendor) {
        Ok(Some(order)) if !order.is_empty() => Some(order),
        Ok(_) => None,
        Err(e) if e.is_invalid() => {
            warn!("Ignoring malformed BootOrder: {e}");
            None
        }
        Err(e) => return Err(e),
    };

    if order.is_none() && boot_next.is_none() {
        debug!("BootOrder and BootNext are not present");
        return Ok(None);
    }

    let mut boot_order = BootOrder {
        has_boot_next: boot_next.is_some(),
        ..BootOrder::default()
    };
    boot_order.options.extend(boot_next);
    boot_order.options.extend(order.into_iter().flatten());
    boot_order.deduplicated = boot_order.deduplicate();

    debug!(
        "Found {} boot order entries, BootNext {}",
        boot_order.options.len(),
        if boot_order.has_boot_next { "included" } else { "excluded" }
    );
    Ok(Some(boot_order))
}

/// Deletes `BootNext` so that firmware does not honor it a second time.
///
/// # Errors
///
/// May return an `Error` if the variable exists but could not be deleted.
pub fn consume_boot_next(store: &mut dyn VariableStore, vendor: &VariableVendor) -> BootResult<()> {
    store.delete(cstr16!("BootNext"), vendor)
}

/// Writes `BootOrder` into the given namespace.
///
/// # Errors
///
/// May return an `Error` if the variable could not be written.
pub fn set_boot_order(
    store: &mut dyn VariableStore,
    vendor: &VariableVendor,
    order: &[u16],
) -> BootResult<()> {
    set_variable_u16_slice(store, cstr16!("BootOrder"), vendor, BOOT_OPTION_ATTRIBUTES, order)
}

/// Reads a `Boot####` option.
///
/// When `require_active` is set, options that are not `ACTIVE` or are not boot targets are skipped, which is what
/// matching against the boot order wants. Missing or malformed options read as [`None`].
///
/// # Errors
///
/// May return an `Error` if the option exists but the variable could not be read.
pub fn get_boot_option(
    store: &dyn VariableStore,
    vendor: &VariableVendor,
    option: u16,
    require_active: bool,
) -> BootResult<Option<LoadOption>> {
    let name = boot_option_name(option)?;
    let Some((data, _)) = store.get(&name, vendor)? else {
        return Ok(None);
    };
    let parsed = match LoadOption::parse(&data) {
        Ok(parsed) => parsed,
        Err(e) => {
            warn!("Boot{option:04X} is malformed: {e}");
            return Ok(None);
        }
    };
    if require_active
        && (!parsed.attributes.contains(LoadOptionAttributes::ACTIVE)
            || parsed.attributes.bits() & LoadOptionAttributes::CATEGORY_MASK != 0)
    {
        debug!("Boot{option:04X} is inactive or not a boot target");
        return Ok(None);
    }
    Ok(Some(parsed))
}

/// Writes a `Boot####` option.
///
/// # Errors
///
/// May return an `Error` if the option could not be serialized or written.
pub fn set_boot_option(
    store: &mut dyn VariableStore,
    vendor: &VariableVendor,
    option: u16,
    load_option: &LoadOption,
) -> BootResult<()> {
    let name = boot_option_name(option)?;
    store.set(&name, vendor, BOOT_OPTION_ATTRIBUTES, &load_option.to_bytes()?)
}

/// Moves `option` to the front of `order`, dropping any other occurrence of it.
#[must_use = "Has no effect if the result is unused"]
pub fn move_to_front(order: &[u16], option: u16) -> Vec<u16> {
    let mut new = Vec::with_capacity(order.len() + 1);
    new.push(option);
    new.extend(order.iter().copied().filter(|&o| o != option));
    new
}
