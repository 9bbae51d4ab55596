// SPDX-FileCopyrightText: 2025 some100 <ootinnyoo@outlook.com>
// SPDX-License-Identifier: MIT

#![no_main]

use libfuzzer_sys::fuzz_target;

use bootpicker_rs_core::boot::loader::chunklist::Chunklist;

fuzz_target!(|data: &[u8]| {
    if let Ok(chunklist) = Chunklist::parse(data) {
        let _ = chunklist.verify_data(chunklist.signed);
    }
});
