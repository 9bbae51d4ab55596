use bootpicker_rs_core::{
    BootResult,
    config::load_options::{has_load_options, parse_load_options, valid_load_options},
};
use uefi::{boot, println, proto::loaded_image::LoadedImage};

use crate::press_for_reboot;

pub fn test_load_options() -> BootResult<()> {
    let mut units: alloc::vec::Vec<u16> = {
        let loaded_image = boot::open_protocol_exclusive::<LoadedImage>(boot::image_handle())?;
        let raw = loaded_image.load_options_as_bytes().unwrap_or_default();
        assert!(valid_load_options(Some(raw)), "The running image has malformed load options");
        if !has_load_options(Some(raw)) {
            println!("The running image was started without load options");
            println!("Start it from the shell with a few arguments, like `foo=bar baz`, to test parsing");
            println!("Press a key to reboot");
            press_for_reboot();
        }
        raw.chunks_exact(2).map(|pair| u16::from_le_bytes([pair[0], pair[1]])).collect()
    }; // loaded_image dropped here

    let vars = parse_load_options(&mut units)?;
    for var in vars.iter() {
        let name = alloc::string::String::from_utf16_lossy(var.name);
        match var.value {
            Some(value) => println!("{name} = {}", alloc::string::String::from_utf16_lossy(value)),
            None => println!("{name}"),
        }
    }
    println!("Parsed {} load options", vars.len());
    println!("Press a key to reboot");
    press_for_reboot();
}
