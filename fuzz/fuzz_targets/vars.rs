// SPDX-FileCopyrightText: 2025 some100 <ootinnyoo@outlook.com>
// SPDX-License-Identifier: MIT

#![no_main]

use bootpicker_rs_core::config::load_options::{has_load_options, parse_load_options, parse_vars};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let mut ascii = data.to_vec();
    if let Ok(vars) = parse_vars(&mut ascii) {
        let _ = vars.iter().filter(|var| var.value.is_some()).count();
        let _ = vars.get_int("timeout");
        let _ = vars.get_guid("guid");
    }

    let _ = has_load_options(Some(data));
    let mut wide: Vec<u16> = data
        .chunks_exact(2)
        .map(|pair| u16::from_le_bytes([pair[0], pair[1]]))
        .collect();
    if let Ok(vars) = parse_load_options(&mut wide) {
        let _ = vars.get_string("rtc");
    }
});
