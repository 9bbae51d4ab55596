use bootpicker_rs_core::{
    BootResult,
    boot::{BootPicker, input::index_to_key, services::NoHostServices},
    system::{firmware::efi::UefiFirmware, variable::RuntimeVariableStore},
};
use uefi::println;

use crate::press_for_reboot;

pub fn test_scan() -> BootResult<()> {
    let mut picker =
        BootPicker::from_firmware(UefiFirmware::new(), RuntimeVariableStore::new(), NoHostServices);
    picker.scan(false)?;
    let entries = picker.list();
    for (i, entry) in entries.iter().enumerate() {
        assert_eq!(entry.entry_index, Some(i));
        let key = index_to_key(i).unwrap_or(' ');
        println!("{key}. {} [{:?}] {}", entry.name, entry.entry_type, entry.id);
    }
    let total = picker.context().boot_entry_count();
    println!("{} of {total} entries shown", entries.len());

    let full_default = picker.get_default().map(|i| entries[i].id.clone());
    let mut fast =
        BootPicker::from_firmware(UefiFirmware::new(), RuntimeVariableStore::new(), NoHostServices);
    fast.scan_default(false)?;
    let fast_default = fast
        .get_default()
        .and_then(|i| fast.list().get(i).map(|entry| entry.id.clone()));
    println!("Default of the full scan: {full_default:?}");
    println!("Default of the quick scan: {fast_default:?}");
    if fast_default.is_some() {
        assert_eq!(full_default, fast_default);
    }

    println!("All scan assertions passed!");
    println!("Press a key to reboot");
    press_for_reboot();
}
