// SPDX-FileCopyrightText: 2025 some100 <ootinnyoo@outlook.com>
// SPDX-License-Identifier: MIT

//! UEFI variable storage.
//!
//! The engine reads and writes NVRAM only through [`VariableStore`]. A missing variable is not an error: reads
//! return [`None`] so that callers can treat absent state as empty, which is how boot order resolution wants it.

use alloc::{string::String, vec::Vec};
use thiserror::Error;
use uefi::{
    CStr16, CString16, Guid, Status, guid,
    runtime::{self, VariableAttributes, VariableVendor},
};

use crate::{BootResult, system::helper::ucs2_bytes_to_string};

pub mod boot_option;
pub mod boot_order;

/// The Apple boot variable namespace, which holds `boot-args` and friends.
pub const APPLE_BOOT_VARIABLE_GUID: Guid = guid!("7c436110-ab2a-4bbb-a880-fe41995c9f82");

/// The Apple vendor variable namespace.
pub const APPLE_VENDOR_VARIABLE_GUID: Guid = guid!("4d1ede05-38c7-4a6a-9cc6-4bcca8b38c14");

/// The Apple core storage variable namespace.
pub const APPLE_CORE_STORAGE_VARIABLE_GUID: Guid = guid!("8d63d4fe-bd3c-4aad-881d-86fd974bc1df");

/// The Apple TRB secure variable namespace.
pub const APPLE_TRB_SECURE_VARIABLE_GUID: Guid = guid!("5d62b28d-6ed2-40b4-a560-6cd79b93d366");

/// The Apple secure boot variable namespace.
pub const APPLE_SECURE_BOOT_VARIABLE_GUID: Guid = guid!("94b73556-2197-4702-82a8-3e1337dafbfb");

/// The vendor namespace of the boot picker.
///
/// This also holds the custom `BootOrder` when `custom_boot_guid` is enabled.
pub const OC_VENDOR_VARIABLE_GUID: Guid = guid!("4d1fda02-38c7-4a6a-9cc6-4bcca8b30102");

/// Attributes used for boot options and `BootOrder`.
pub const BOOT_OPTION_ATTRIBUTES: VariableAttributes = VariableAttributes::from_bits_retain(
    VariableAttributes::NON_VOLATILE.bits()
        | VariableAttributes::BOOTSERVICE_ACCESS.bits()
        | VariableAttributes::RUNTIME_ACCESS.bits(),
);

/// An `Error` that may result from reading or writing a variable.
#[derive(Error, Debug)]
pub enum VarError {
    /// The variable could not be read.
    #[error("Failed to get variable \"{0}\": {1}")]
    Get(String, Status),

    /// The variable could not be written.
    #[error("Failed to set variable \"{0}\": {1}")]
    Set(String, Status),

    /// The variable did not have the size or alignment its type requires.
    #[error("Variable \"{0}\" has an invalid size ({1} bytes)")]
    InvalidSize(String, usize),

    /// A variable name could not be encoded.
    #[error("Variable name could not be encoded")]
    Name,
}

impl VarError {
    /// Returns the firmware status behind the error.
    #[must_use = "Has no effect if the result is unused"]
    pub const fn status(&self) -> Status {
        match self {
            Self::Get(_, status) | Self::Set(_, status) => *status,
            Self::InvalidSize(..) | Self::Name => Status::INVALID_PARAMETER,
        }
    }
}

/// A store of UEFI variables.
pub trait VariableStore {
    /// Reads a variable and its attributes. A variable that does not exist reads as [`None`].
    ///
    /// # Errors
    ///
    /// May return an `Error` if the variable exists but could not be read.
    fn get(
        &self,
        name: &CStr16,
        vendor: &VariableVendor,
    ) -> BootResult<Option<(Vec<u8>, VariableAttributes)>>;

    /// Writes a variable. Writing empty data deletes it.
    ///
    /// # Errors
    ///
    /// May return an `Error` if the variable could not be written.
    fn set(
        &mut self,
        name: &CStr16,
        vendor: &VariableVendor,
        attributes: VariableAttributes,
        data: &[u8],
    ) -> BootResult<()>;

    /// Lists the name and namespace of every variable.
    ///
    /// # Errors
    ///
    /// May return an `Error` if the variable list could not be enumerated.
    fn keys(&self) -> BootResult<Vec<(CString16, VariableVendor)>>;

    /// Deletes a variable. Deleting a variable that does not exist succeeds.
    ///
    /// # Errors
    ///
    /// May return an `Error` if the variable exists but could not be deleted.
    fn delete(&mut self, name: &CStr16, vendor: &VariableVendor) -> BootResult<()> {
        if self.get(name, vendor)?.is_none() {
            return Ok(());
        }
        self.set(name, vendor, VariableAttributes::empty(), &[])
    }
}

/// Variable storage implemented with runtime services.
#[derive(Default)]
pub struct RuntimeVariableStore;

impl RuntimeVariableStore {
    /// Constructs a new [`RuntimeVariableStore`].
    #[must_use = "Has no effect if the result is unused"]
    pub const fn new() -> Self {
        Self
    }
}

impl VariableStore for RuntimeVariableStore {
    fn get(
        &self,
        name: &CStr16,
        vendor: &VariableVendor,
    ) -> BootResult<Option<(Vec<u8>, VariableAttributes)>> {
        match runtime::get_variable_boxed(name, vendor) {
            Ok((data, attrs)) => Ok(Some((data.into_vec(), attrs))),
            Err(e) if e.status() == Status::NOT_FOUND => Ok(None),
            Err(e) => Err(VarError::Get(String::from(name), e.status()).into()),
        }
    }

    fn set(
        &mut self,
        name: &CStr16,
        vendor: &VariableVendor,
        attributes: VariableAttributes,
        data: &[u8],
    ) -> BootResult<()> {
        match runtime::set_variable(name, vendor, attributes, data) {
            Ok(()) => Ok(()),
            Err(e) if data.is_empty() && e.status() == Status::NOT_FOUND => Ok(()),
            Err(e) => Err(VarError::Set(String::from(name), e.status()).into()),
        }
    }

    fn keys(&self) -> BootResult<Vec<(CString16, VariableVendor)>> {
        let mut keys = Vec::new();
        for key in runtime::variable_keys() {
            let key = key.map_err(|e| VarError::Get(String::new(), e.status()))?;
            keys.push((key.name, key.vendor));
        }
        Ok(keys)
    }
}

/// Encodes a variable name, such as `Boot0080`.
///
/// # Errors
///
/// May return an `Error` if the name holds characters that UCS-2 cannot store.
pub fn variable_name(name: &str) -> Result<CString16, VarError> {
    CString16::try_from(name).map_err(|_| VarError::Name)
}

/// Reads a variable as a list of `u16`, as used by `BootOrder`.
///
/// # Errors
///
/// May return an `Error` if the variable could not be read, or its size is odd.
pub fn get_variable_u16_slice(
    store: &dyn VariableStore,
    name: &CStr16,
    vendor: &VariableVendor,
) -> BootResult<Option<Vec<u16>>> {
    let Some((data, _)) = store.get(name, vendor)? else {
        return Ok(None);
    };
    if data.len() % 2 != 0 {
        return Err(VarError::InvalidSize(String::from(name), data.len()).into());
    }
    // the variable payload is not guaranteed to be aligned for u16, so copy through pod_collect
    Ok(Some(bytemuck::pod_collect_to_vec::<u8, u16>(&data)))
}

/// Writes a list of `u16` into a variable.
///
/// # Errors
///
/// May return an `Error` if the variable could not be written.
pub fn set_variable_u16_slice(
    store: &mut dyn VariableStore,
    name: &CStr16,
    vendor: &VariableVendor,
    attributes: VariableAttributes,
    values: &[u16],
) -> BootResult<()> {
    store.set(name, vendor, attributes, bytemuck::must_cast_slice(values))
}

/// Reads an ASCII or UTF-8 variable, like `boot-args`, up to its first nul.
///
/// # Errors
///
/// May return an `Error` if the variable could not be read or is not UTF-8.
pub fn get_variable_str(
    store: &dyn VariableStore,
    name: &CStr16,
    vendor: &VariableVendor,
) -> BootResult<Option<String>> {
    let Some((data, _)) = store.get(name, vendor)? else {
        return Ok(None);
    };
    let end = data.iter().position(|&b| b == 0).unwrap_or(data.len());
    let str = core::str::from_utf8(&data[..end])
        .map_err(|_| VarError::InvalidSize(String::from(name), data.len()))?;
    Ok(Some(String::from(str)))
}

/// Reads a UCS-2 variable up to its first nul.
///
/// # Errors
///
/// May return an `Error` if the variable could not be read or is not valid UCS-2.
pub fn get_variable_ucs2(
    store: &dyn VariableStore,
    name: &CStr16,
    vendor: &VariableVendor,
) -> BootResult<Option<String>> {
    let Some((data, _)) = store.get(name, vendor)? else {
        return Ok(None);
    };
    Ok(Some(ucs2_bytes_to_string(&data)?))
}

/// A variable store that only lives in memory.
///
/// Used in tests, and by front ends that want to preview NVRAM changes.
#[derive(Clone, Debug, Default)]
pub struct MemoryVariableStore {
    /// The variables in insertion order.
    vars: Vec<(CString16, VariableVendor, VariableAttributes, Vec<u8>)>,
}

impl MemoryVariableStore {
    /// Constructs an empty [`MemoryVariableStore`].
    #[must_use = "Has no effect if the result is unused"]
    pub const fn new() -> Self {
        Self { vars: Vec::new() }
    }

    /// Returns the number of variables stored.
    #[must_use = "Has no effect if the result is unused"]
    pub fn len(&self) -> usize {
        self.vars.len()
    }

    /// Returns `true` if no variable is stored.
    #[must_use = "Has no effect if the result is unused"]
    pub fn is_empty(&self) -> bool {
        self.vars.is_empty()
    }
}

impl VariableStore for MemoryVariableStore {
    fn get(
        &self,
        name: &CStr16,
        vendor: &VariableVendor,
    ) -> BootResult<Option<(Vec<u8>, VariableAttributes)>> {
        Ok(self
            .vars
            .iter()
            .find(|(n, v, ..)| &**n == name && v == vendor)
            .map(|(_, _, attrs, data)| (data.clone(), *attrs)))
    }

    fn set(
        &mut self,
        name: &CStr16,
        vendor: &VariableVendor,
        attributes: VariableAttributes,
        data: &[u8],
    ) -> BootResult<()> {
        let pos = self
            .vars
            .iter()
            .position(|(n, v, ..)| &**n == name && v == vendor);
        match (pos, data.is_empty()) {
            (Some(pos), true) => {
                self.vars.remove(pos);
            }
            (Some(pos), false) => {
                self.vars[pos].2 = attributes;
                self.vars[pos].3 = data.to_vec();
            }
            (None, true) => (),
            (None, false) => {
                self.vars
                    .push((CString16::from(name), *vendor, attributes, data.to_vec()));
            }
        }
        Ok(())
    }

    fn keys(&self) -> BootResult<Vec<(CString16, VariableVendor)>> {
        Ok(self
            .vars
            .iter()
            .map(|(name, vendor, ..)| (name.clone(), *vendor))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uefi::cstr16;

    #[test]
    fn test_memory_store_delete() -> BootResult<()> {
        let mut store = MemoryVariableStore::new();
        let vendor = VariableVendor::GLOBAL_VARIABLE;
        store.set(cstr16!("Foo"), &vendor, BOOT_OPTION_ATTRIBUTES, &[1, 2])?;
        assert_eq!(store.get(cstr16!("Foo"), &vendor)?.map(|v| v.0), Some(vec![1, 2]));

        store.delete(cstr16!("Foo"), &vendor)?;
        assert!(store.get(cstr16!("Foo"), &vendor)?.is_none());
        store.delete(cstr16!("Foo"), &vendor)?;
        assert!(store.is_empty());
        Ok(())
    }

    #[test]
    fn test_u16_slice() -> BootResult<()> {
        let mut store = MemoryVariableStore::new();
        let vendor = VariableVendor::GLOBAL_VARIABLE;
        set_variable_u16_slice(
            &mut store,
            cstr16!("BootOrder"),
            &vendor,
            BOOT_OPTION_ATTRIBUTES,
            &[0x0001, 0x0080],
        )?;
        let order = get_variable_u16_slice(&store, cstr16!("BootOrder"), &vendor)?;
        assert_eq!(order, Some(vec![0x0001, 0x0080]));

        store.set(cstr16!("Odd"), &vendor, BOOT_OPTION_ATTRIBUTES, &[1, 2, 3])?;
        assert!(get_variable_u16_slice(&store, cstr16!("Odd"), &vendor).is_err());
        Ok(())
    }

    #[test]
    fn test_get_str() -> BootResult<()> {
        let mut store = MemoryVariableStore::new();
        let vendor = VariableVendor(APPLE_BOOT_VARIABLE_GUID);
        store.set(cstr16!("boot-args"), &vendor, BOOT_OPTION_ATTRIBUTES, b"-v debug=0x100\0")?;
        assert_eq!(
            get_variable_str(&store, cstr16!("boot-args"), &vendor)?.as_deref(),
            Some("-v debug=0x100")
        );
        Ok(())
    }
}
