// SPDX-FileCopyrightText: 2025 some100 <ootinnyoo@outlook.com>
// SPDX-License-Identifier: MIT

#![no_main]

use libfuzzer_sys::fuzz_target;

use bootpicker_rs_core::{
    boot::classify::get_boot_device_path_type, system::variable::boot_option::LoadOption,
};

fuzz_target!(|data: &[u8]| {
    if let Ok(option) = LoadOption::parse(data) {
        let _ = get_boot_device_path_type(&option.device_path);
        let _ = option.to_bytes();
    }
});
