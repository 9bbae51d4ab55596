// SPDX-FileCopyrightText: 2025 some100 <ootinnyoo@outlook.com>
// SPDX-License-Identifier: MIT

//! Mapping between entry indices and the keys that select them.
//!
//! Entry `0` is selected with `1`, entry `9` with `A`, and so on. Letters that are easily confused are left out.
//! Negative values are reserved for [`InputCode`]s, so a picker can return one `isize` for both.

/// The keys that select entries, in order.
pub const OC_INPUT_STR: &str = "123456789ABCDEFGHIJKLMNOPQRSTUVXWZ";

/// The number of entries that can be selected with a single key.
pub const OC_INPUT_MAX: usize = OC_INPUT_STR.len();

/// Codes for input that does not select an entry.
pub struct InputCode;

impl InputCode {
    /// Escape or `0`.
    pub const ABORTED: isize = -1;
    /// Any other key.
    pub const INVALID: isize = -2;
    /// No key before the timeout.
    pub const TIMEOUT: isize = -3;
    /// Enter.
    pub const CONTINUE: isize = -4;
    /// Move up.
    pub const UP: isize = -5;
    /// Move down.
    pub const DOWN: isize = -6;
    /// Move left.
    pub const LEFT: isize = -7;
    /// Move right.
    pub const RIGHT: isize = -8;
    /// Move to the top.
    pub const TOP: isize = -9;
    /// Move to the bottom.
    pub const BOTTOM: isize = -10;
    /// Show more entries, usually space.
    pub const MORE: isize = -11;
    /// Toggle spoken feedback.
    pub const VOICE_OVER: isize = -12;
    /// An accepted internal hotkey.
    pub const INTERNAL: isize = -13;
    /// Clear the whole typed text.
    pub const TYPING_CLEAR_ALL: isize = -14;
    /// Confirm the typed text.
    pub const TYPING_CONFIRM: isize = -15;
    /// Delete the character before the cursor.
    pub const TYPING_BACKSPACE: isize = -16;
    /// Move the cursor left.
    pub const TYPING_LEFT: isize = -17;
    /// Move the cursor right.
    pub const TYPING_RIGHT: isize = -18;
    /// Move focus to the next control.
    pub const SWITCH_FOCUS: isize = -19;

    /// Returns the code of function key `x`, starting from `F0`.
    #[must_use = "Has no effect if the result is unused"]
    pub const fn functional(x: isize) -> isize {
        -20 - x
    }

    /// Returns the function key number of a code, if it is one.
    #[must_use = "Has no effect if the result is unused"]
    pub const fn as_functional(code: isize) -> Option<isize> {
        if code <= -20 { Some(-20 - code) } else { None }
    }
}

/// Returns the key that selects an entry index.
#[must_use = "Has no effect if the result is unused"]
pub fn index_to_key(index: usize) -> Option<char> {
    OC_INPUT_STR.as_bytes().get(index).map(|&b| char::from(b))
}

/// Returns the entry index a key selects. Letters match regardless of case.
#[must_use = "Has no effect if the result is unused"]
pub fn key_to_index(key: char) -> Option<usize> {
    let key = key.to_ascii_uppercase();
    OC_INPUT_STR.chars().position(|c| c == key)
}
