#![no_main]
#![no_std]

// Integration tests for bootpicker-rs, run on real firmware or in a virtual machine.

// DISCLAIMER: This code extensively uses unwrap and expect, as any errors in testing should be treated as fatal.

extern crate alloc;

use bootpicker_rs_core::{BootResult, system::log_backend::UefiLogger};
use uefi::{
    prelude::*,
    println,
    proto::console::text::{Input, Key},
    runtime::ResetType,
};

use crate::{
    action::test_scan,
    load::{check_loaded, test_loading},
    options::test_load_options,
    order::test_boot_order,
    variables::{check_variable, test_variables},
};

mod action;
mod load;
mod options;
mod order;
mod variables;

fn main_func() -> BootResult<()> {
    uefi::helpers::init()?;
    log::set_logger(UefiLogger::static_new(log::LevelFilter::Info))
        .map(|()| log::set_max_level(log::LevelFilter::Info))
        .expect("Failed to set logger"); // set up logger so that errors produced by the library will get caught as well

    check_loaded();
    check_variable()?;

    println!("Select the test you would like to do:");
    println!("1. Scan test");
    println!("2. Variables test");
    println!("3. Boot order test");
    println!("4. Load options test");
    println!("5. Load image test");
    println!(
        "It's recommended that the tests are tested in order, as they will rely on each other in that order."
    );
    loop {
        if let Key::Printable(char) = read_key() {
            let char = char::from(char);
            return match char {
                '1' => test_scan(),
                '2' => test_variables(),
                '3' => test_boot_order(),
                '4' => test_load_options(),
                '5' => test_loading(),
                _ => Ok(()),
            };
        }
    }
}

#[entry]
fn main() -> Status {
    main_func().unwrap_or_else(|e| panic!("Failed to run test: {e}"));
    Status::SUCCESS
}

fn press_for_reboot() -> ! {
    let _ = read_key();
    uefi::runtime::reset(ResetType::COLD, Status::SUCCESS, None);
}

fn read_key() -> Key {
    let handle = boot::get_handle_for_protocol::<Input>().unwrap();
    let mut input = boot::open_protocol_exclusive::<Input>(handle).unwrap();
    let mut events = [input.wait_for_key_event().unwrap()];
    boot::wait_for_event(&mut events).unwrap();
    input.read_key().unwrap().unwrap()
}
