use bootpicker_rs_core::{
    BootResult,
    system::{
        firmware::{Firmware, efi::UefiFirmware},
        variable::{
            RuntimeVariableStore,
            boot_order::{boot_option_name, get_boot_option, get_boot_order},
        },
    },
};
use uefi::{println, runtime::VariableVendor};

use crate::press_for_reboot;

pub fn test_boot_order() -> BootResult<()> {
    let firmware = UefiFirmware::new();
    let store = RuntimeVariableStore::new();
    let vendor = VariableVendor::GLOBAL_VARIABLE;

    let Some(order) = get_boot_order(&store, &vendor, true)? else {
        println!("There is no BootOrder, so nothing can be tested");
        println!("Press a key to reboot");
        press_for_reboot();
    };
    println!("BootOrder has {} options (BootNext: {})", order.options.len(), order.has_boot_next);

    for &option in &order.options {
        let name = boot_option_name(option)?;
        match get_boot_option(&store, &vendor, option, false)? {
            Some(parsed) => {
                let text = firmware
                    .device_path_to_text(&parsed.device_path)
                    .unwrap_or_else(|e| alloc::format!("<{e}>"));
                println!("{name}: {} -> {text}", parsed.description);
            }
            None => println!("{name}: missing or malformed"),
        }
    }
    println!("Every listed option was decoded without a panic");
    println!("Press a key to reboot");
    press_for_reboot();
}
