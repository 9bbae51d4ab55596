// SPDX-FileCopyrightText: 2025 some100 <ootinnyoo@outlook.com>
// SPDX-License-Identifier: MIT

#![no_main]

use libfuzzer_sys::fuzz_target;

use bootpicker_rs_core::{
    boot::classify::get_boot_device_path_type, system::device_path::DevicePathBuf,
};

fuzz_target!(|data: &[u8]| {
    if let Ok(path) = DevicePathBuf::from_bytes(data) {
        let _ = path.file_path();
        let _ = path.hard_drive_suffix();
        let _ = path.is_apple_legacy_load_app();
        let _ = get_boot_device_path_type(&path);
    }
});
