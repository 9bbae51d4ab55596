// SPDX-FileCopyrightText: 2025 some100 <ootinnyoo@outlook.com>
// SPDX-License-Identifier: MIT

#![no_main]

use libfuzzer_sys::fuzz_target;

use bootpicker_rs_core::boot::{
    args::{append_argument, get_argument, remove_arguments},
    classify::get_path_type,
};

fuzz_target!(|data: &[u8]| {
    let Ok(text) = core::str::from_utf8(data) else {
        return;
    };
    let (cmd, arg) = text.split_once('\n').unwrap_or((text, "-v"));
    let _ = get_argument(cmd, arg);
    let _ = get_path_type(cmd);

    let mut cmd = String::from(cmd);
    let _ = append_argument(&mut cmd, None, arg);
    remove_arguments(&mut cmd, &[arg]);
});
