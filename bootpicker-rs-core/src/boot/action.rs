// SPDX-FileCopyrightText: 2025 some100 <ootinnyoo@outlook.com>
// SPDX-License-Identifier: MIT

//! Provides [`SystemAction`], which runs in place of loading an image for `SYSTEM` entries.

use alloc::{string::ToString, vec::Vec};
use log::{debug, error, info};
use uefi::{
    CStr16, CString16, Guid, guid,
    runtime::{ResetType, VariableVendor},
};

use crate::{
    BootResult,
    error::BootError,
    system::{
        firmware::Firmware,
        variable::{
            APPLE_BOOT_VARIABLE_GUID, APPLE_CORE_STORAGE_VARIABLE_GUID,
            APPLE_SECURE_BOOT_VARIABLE_GUID, APPLE_TRB_SECURE_VARIABLE_GUID,
            APPLE_VENDOR_VARIABLE_GUID, OC_VENDOR_VARIABLE_GUID, VariableStore,
        },
    },
};

/// Namespaces that are wiped completely.
const WIPED_NAMESPACES: [Guid; 9] = [
    APPLE_VENDOR_VARIABLE_GUID,
    APPLE_BOOT_VARIABLE_GUID,
    APPLE_CORE_STORAGE_VARIABLE_GUID,
    APPLE_TRB_SECURE_VARIABLE_GUID,
    APPLE_SECURE_BOOT_VARIABLE_GUID,
    // Ozmosis
    guid!("1f8e0c02-58a9-4e34-ae22-2b63745fa101"),
    guid!("9480e8a1-1793-46c9-91d8-1108dba4731c"),
    // boot chime preferences
    guid!("89d4f995-67e3-4895-8f18-454b651d9215"),
    // wireless network
    guid!("36c28ab5-6566-4c50-9ebd-cbb920f83843"),
];

/// The Microsoft vendor namespace, where only `CurrentPolicy` survives.
const MICROSOFT_VARIABLE_GUID: Guid = guid!("77fa9abd-0359-4d32-bd60-28f4e78f784b");

/// Variables of the picker that describe how to boot at all, and survive a reset.
const PRESERVED_VENDOR_VARIABLES: [&str; 2] = ["boot-redirect", "scan-policy"];

/// An action that a `SYSTEM` entry runs instead of loading an image.
#[non_exhaustive]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SystemAction {
    /// Deletes the deletable variables, then cold resets.
    ResetNvram,
}

impl SystemAction {
    /// Runs the action.
    ///
    /// On real firmware, [`SystemAction::ResetNvram`] does not return. A failure to delete variables is logged, and the
    /// system is reset anyway.
    pub fn run(self, firmware: &dyn Firmware, variables: &mut dyn VariableStore) {
        match self {
            Self::ResetNvram => {
                match delete_variables(variables) {
                    Ok(count) => info!("Deleted {count} variables"),
                    Err(e) => error!("NVRAM cleanup stopped early: {e}"),
                }
                firmware.reset_system(ResetType::COLD);
            }
        }
    }
}

/// Checks whether a variable is removed by a reset.
fn is_deletable(name: &CStr16, vendor: &VariableVendor) -> bool {
    let name = name.to_string();
    if WIPED_NAMESPACES.contains(&vendor.0) {
        true
    } else if *vendor == VariableVendor::GLOBAL_VARIABLE {
        // BootOrder, Boot####, DriverOrder, Driver####, and BootNext
        name.starts_with("Boot") || name.starts_with("Driver")
    } else if vendor.0 == OC_VENDOR_VARIABLE_GUID {
        !PRESERVED_VENDOR_VARIABLES.contains(&name.as_str())
    } else if vendor.0 == MICROSOFT_VARIABLE_GUID {
        name != "CurrentPolicy"
    } else {
        false
    }
}

/// Deletes every deletable variable, and returns how many were deleted.
///
/// Variables that are missing or write protected are skipped.
///
/// # Errors
///
/// May return an `Error` if the variables could not be listed, or a deletion failed for another reason.
pub fn delete_variables(variables: &mut dyn VariableStore) -> BootResult<usize> {
    let deletable: Vec<(CString16, VariableVendor)> = variables
        .keys()?
        .into_iter()
        .filter(|(name, vendor)| is_deletable(name, vendor))
        .collect();

    let mut count = 0;
    for (name, vendor) in deletable {
        match variables.delete(&name, &vendor) {
            Ok(()) => {
                debug!("Deleting {}:{name}... OK", vendor.0);
                count += 1;
            }
            Err(e) if e.is_not_found() || matches!(e, BootError::SecurityViolation) => {
                debug!("Deleting {}:{name}... SKIP - {e}", vendor.0);
            }
            Err(e) => return Err(e),
        }
    }
    Ok(count)
}
