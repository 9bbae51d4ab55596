use bootpicker_rs_core::{
    BootResult,
    boot::{BootPicker, config::PickerConfig, services::NoHostServices},
    config::CustomEntry,
    system::{
        firmware::{Firmware, efi::UefiFirmware},
        variable::{
            BOOT_OPTION_ATTRIBUTES, OC_VENDOR_VARIABLE_GUID, RuntimeVariableStore, VariableStore,
        },
    },
};
use uefi::{CStr16, cstr16, println, runtime::VariableVendor};

use crate::{press_for_reboot, read_key};

const LOADED_VARIABLE_NAME: &CStr16 = cstr16!("bootpicker-loaded");
const VENDOR: VariableVendor = VariableVendor(OC_VENDOR_VARIABLE_GUID);
const SHELL_PATH: &str = "\\shellx64.efi";
const FALLBACK_PATH: &str = "\\EFI\\BOOT\\BOOTx64.efi";
const TOOL_NAME: &str = "Load test";

pub fn check_loaded() {
    let mut store = RuntimeVariableStore::new();
    if let Ok(Some(_)) = store.get(LOADED_VARIABLE_NAME, &VENDOR) {
        store.delete(LOADED_VARIABLE_NAME, &VENDOR).unwrap();
        println!("Successfully passed load image test");
        println!(
            "If a panic from unwrap resulted before this, then the test was not actually passed."
        );
        println!("Press a key to reboot");
        press_for_reboot();
    }
}

pub fn test_loading() -> BootResult<()> {
    println!(
        "Will try to load an image from either {SHELL_PATH} or {FALLBACK_PATH} on same filesystem"
    );
    println!("Press a key to continue");
    let _ = read_key();

    let firmware = UefiFirmware::new();
    let efi = {
        let loader = firmware.loader_path().expect("Image was not loaded from a storage device");
        let (handle, _) = firmware
            .locate_filesystem(&loader)
            .expect("Image filesystem could not be found");
        let mut volume = firmware.open_volume(handle)?;
        if volume.exists(SHELL_PATH) {
            SHELL_PATH
        } else if volume.exists(FALLBACK_PATH) {
            FALLBACK_PATH
        } else {
            println!(
                "Cannot test if load image works, as {SHELL_PATH} and {FALLBACK_PATH} do not exist"
            );
            println!("Press a key to reboot");
            press_for_reboot();
        }
    }; // volume dropped here

    let mut config = PickerConfig::new(&firmware);
    config.hide_auxiliary = false;
    config
        .custom_entries
        .push(CustomEntry::parse(&alloc::format!("{TOOL_NAME};{efi}"), true).unwrap());

    let mut picker = BootPicker::new(config, firmware, RuntimeVariableStore::new(), NoHostServices);
    picker.scan(false)?;
    let index = picker
        .list()
        .iter()
        .position(|entry| entry.name == TOOL_NAME)
        .expect("The tool entry was not listed");

    RuntimeVariableStore::new().set(LOADED_VARIABLE_NAME, &VENDOR, BOOT_OPTION_ATTRIBUTES, &[1])?;
    picker.boot(index)?;

    Ok(())
}
