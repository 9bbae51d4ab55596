use bootpicker_rs_core::{
    BootResult,
    system::variable::{
        BOOT_OPTION_ATTRIBUTES, OC_VENDOR_VARIABLE_GUID, RuntimeVariableStore, VariableStore,
    },
};
use uefi::{CStr16, cstr16, println, runtime::VariableVendor};

use crate::press_for_reboot;

const VARIABLE_NAME: &CStr16 = cstr16!("bootpicker-test");
const VARIABLE_CONTENT: &[u8] = &23u32.to_le_bytes();
const UPDATED_VARIABLE_CONTENT: &[u8] = &24u32.to_le_bytes();
const VENDOR: VariableVendor = VariableVendor(OC_VENDOR_VARIABLE_GUID);

pub fn check_variable() -> BootResult<()> {
    let mut store = RuntimeVariableStore::new();
    if let Some((data, _)) = store.get(VARIABLE_NAME, &VENDOR)? {
        assert_ne!(data, UPDATED_VARIABLE_CONTENT);
        if data == VARIABLE_CONTENT {
            println!("Successfully got value of bootpicker-test: {data:?}");
            store.set(VARIABLE_NAME, &VENDOR, BOOT_OPTION_ATTRIBUTES, UPDATED_VARIABLE_CONTENT)?;
            assert!(
                store
                    .keys()?
                    .iter()
                    .any(|(name, vendor)| &**name == VARIABLE_NAME && *vendor == VENDOR)
            );

            println!("Now testing if variable can be deleted");
            store.delete(VARIABLE_NAME, &VENDOR)?;
            assert!(store.get(VARIABLE_NAME, &VENDOR)?.is_none());
            store.delete(VARIABLE_NAME, &VENDOR)?; // deleting twice is fine
            println!("Press a key to reboot");
            press_for_reboot();
        }
    }
    Ok(())
}

pub fn test_variables() -> BootResult<()> {
    let mut store = RuntimeVariableStore::new();
    store.set(VARIABLE_NAME, &VENDOR, BOOT_OPTION_ATTRIBUTES, VARIABLE_CONTENT)?;
    println!("Set value of bootpicker-test to 23");
    let (data, attributes) = store.get(VARIABLE_NAME, &VENDOR)?.expect("Variable was not written");
    assert_eq!(data, VARIABLE_CONTENT);
    assert_eq!(attributes, BOOT_OPTION_ATTRIBUTES);
    println!("Will now test if variable persists");
    println!("Press a key to reboot");
    press_for_reboot();
}
