// SPDX-FileCopyrightText: 2025 some100 <ootinnyoo@outlook.com>
// SPDX-License-Identifier: MIT

#![no_main]

use libfuzzer_sys::fuzz_target;

use bootpicker_rs_core::boot::config::PickerConfig;

fuzz_target!(|data: &[u8]| {
    let _ = PickerConfig::get_picker_config(data);
});
