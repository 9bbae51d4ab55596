// SPDX-FileCopyrightText: 2025 some100 <ootinnyoo@outlook.com>
// SPDX-License-Identifier: MIT

//! Zero-copy parser for load options and var files.
//!
//! Load options are one line of space separated `name` or `name=value` tokens, as found in the load options of an
//! image. Var files are the same thing spread over many lines, with `#` comments:
//!
//! ```text
//! # shell style variables
//! timeout=5
//! title="macOS Sonoma"
//! ```
//!
//! Both forms accept ASCII (`u8`) and UCS-2 (`u16`) buffers. The buffer is parsed in place: quotes and escape
//! characters are squeezed out of it, and every returned name and value borrows it. Nothing is allocated per token.
//!
//! A double quote toggles quoting anywhere in a token, and the quote itself is dropped. A backslash takes the next
//! character literally, inside and outside of quotes. The first unescaped `=` splits the name from the value, even
//! inside quotes, so `"title=macOS Sonoma"` is the same as `title="macOS Sonoma"`.

use alloc::{string::String, vec::Vec};
use thiserror::Error;
use uefi::{Guid, Status};

/// The largest load options that are considered sane.
pub const MAX_LOAD_OPTIONS_SIZE: usize = 4096;

/// An `Error` that may result from parsing or querying variables.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum VarsError {
    /// The variable does not exist, or it has no value and a value was requested.
    #[error("Variable not found")]
    NotFound,

    /// A quoted section was never closed.
    #[error("Unterminated quote")]
    InvalidQuote,

    /// The buffer ended right after a backslash.
    #[error("Unterminated escape")]
    UnterminatedEscape,

    /// A value is not a decimal or `0x` prefixed hexadecimal integer.
    #[error("Invalid integer")]
    InvalidInt,

    /// A value is not a canonical GUID.
    #[error("Invalid GUID")]
    InvalidGuid,

    /// A value could not be decoded into a string.
    #[error("Invalid encoding")]
    InvalidEncoding,
}

impl VarsError {
    /// Returns the firmware status behind the error.
    #[must_use = "Has no effect if the result is unused"]
    pub const fn status(&self) -> Status {
        match self {
            Self::NotFound => Status::NOT_FOUND,
            _ => Status::INVALID_PARAMETER,
        }
    }
}

/// Seals [`VarUnit`].
mod sealed {
    /// The sealing trait.
    pub trait Sealed {}
    impl Sealed for u8 {}
    impl Sealed for u16 {}
}

/// A code unit that variables can be parsed from. This is implemented for ASCII (`u8`) and UCS-2 (`u16`).
pub trait VarUnit: sealed::Sealed + Copy + Eq + 'static {
    /// The nul unit, which ends the buffer.
    const NUL: Self;

    /// Converts an ASCII byte into a unit.
    fn from_ascii(byte: u8) -> Self;

    /// Checks if units spell out exactly `str`.
    fn eq_str(units: &[Self], str: &str) -> bool;

    /// Decodes units into a [`String`].
    fn decode(units: &[Self]) -> Option<String>;
}

impl VarUnit for u8 {
    const NUL: Self = 0;

    fn from_ascii(byte: u8) -> Self {
        byte
    }

    fn eq_str(units: &[Self], str: &str) -> bool {
        units == str.as_bytes()
    }

    fn decode(units: &[Self]) -> Option<String> {
        core::str::from_utf8(units).ok().map(String::from)
    }
}

impl VarUnit for u16 {
    const NUL: Self = 0;

    fn from_ascii(byte: u8) -> Self {
        Self::from(byte)
    }

    fn eq_str(units: &[Self], str: &str) -> bool {
        units.iter().copied().eq(str.encode_utf16())
    }

    fn decode(units: &[Self]) -> Option<String> {
        char::decode_utf16(units.iter().copied())
            .collect::<Result<String, _>>()
            .ok()
    }
}

/// One parsed `name` or `name=value` token.
///
/// Both slices borrow the parsed buffer.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ParsedVar<'a, C> {
    /// The name of the variable.
    pub name: &'a [C],

    /// The value of the variable. `name=` has an empty value, while `name` has none at all.
    pub value: Option<&'a [C]>,
}

/// A list of parsed variables, in the order they appear in the buffer.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ParsedVars<'a, C> {
    /// The variables.
    vars: Vec<ParsedVar<'a, C>>,
}

impl<'a, C: VarUnit> ParsedVars<'a, C> {
    /// Finds the first variable called `name`.
    fn find(&self, name: &str) -> Option<&ParsedVar<'a, C>> {
        self.vars.iter().find(|var| C::eq_str(var.name, name))
    }

    /// Checks if a variable is present, with or without a value.
    #[must_use = "Has no effect if the result is unused"]
    pub fn has(&self, name: &str) -> bool {
        self.find(name).is_some()
    }

    /// Returns the raw value of a variable.
    ///
    /// # Errors
    ///
    /// Returns [`VarsError::NotFound`] if the variable is missing or has no value.
    pub fn get_str(&self, name: &str) -> Result<&'a [C], VarsError> {
        self.find(name).and_then(|var| var.value).ok_or(VarsError::NotFound)
    }

    /// Returns the value of a variable as a [`String`].
    ///
    /// # Errors
    ///
    /// Returns [`VarsError::NotFound`] if the variable is missing or has no value, or
    /// [`VarsError::InvalidEncoding`] if it could not be decoded.
    pub fn get_string(&self, name: &str) -> Result<String, VarsError> {
        C::decode(self.get_str(name)?).ok_or(VarsError::InvalidEncoding)
    }

    /// Returns the value of a variable as an integer, written in decimal or as `0x` prefixed hexadecimal.
    ///
    /// # Errors
    ///
    /// Returns [`VarsError::NotFound`] if the variable is missing or has no value, or [`VarsError::InvalidInt`] if
    /// it is not an integer.
    pub fn get_int(&self, name: &str) -> Result<u64, VarsError> {
        let value = self.get_string(name).map_err(|e| match e {
            VarsError::InvalidEncoding => VarsError::InvalidInt,
            e => e,
        })?;
        parse_int(&value).ok_or(VarsError::InvalidInt)
    }

    /// Returns the value of a variable as a GUID in canonical dashed form.
    ///
    /// # Errors
    ///
    /// Returns [`VarsError::NotFound`] if the variable is missing or has no value, or [`VarsError::InvalidGuid`] if
    /// it is not a GUID.
    pub fn get_guid(&self, name: &str) -> Result<Guid, VarsError> {
        let value = self.get_string(name).map_err(|e| match e {
            VarsError::InvalidEncoding => VarsError::InvalidGuid,
            e => e,
        })?;
        Guid::try_parse(&value).map_err(|_| VarsError::InvalidGuid)
    }

    /// Iterates over every variable.
    pub fn iter(&self) -> impl Iterator<Item = &ParsedVar<'a, C>> {
        self.vars.iter()
    }

    /// Returns the number of variables.
    #[must_use = "Has no effect if the result is unused"]
    pub fn len(&self) -> usize {
        self.vars.len()
    }

    /// Returns `true` if there are no variables.
    #[must_use = "Has no effect if the result is unused"]
    pub fn is_empty(&self) -> bool {
        self.vars.is_empty()
    }
}

/// Parses a decimal or `0x` prefixed hexadecimal integer.
pub(crate) fn parse_int(value: &str) -> Option<u64> {
    let value = value.trim();
    match value.strip_prefix("0x").or_else(|| value.strip_prefix("0X")) {
        Some(hex) => u64::from_str_radix(hex, 16).ok(),
        None => value.parse().ok(),
    }
}

/// The location of one token inside the compacted buffer.
struct TokenRange {
    /// The first unit of the token.
    start: usize,

    /// The position of the splitting `=`, if any.
    split: Option<usize>,

    /// One past the last unit of the token.
    end: usize,
}

/// Checks if a unit separates tokens.
fn is_separator<C: VarUnit>(c: C, multi_line: bool) -> bool {
    c == C::from_ascii(b' ')
        || c == C::from_ascii(b'\t')
        || (multi_line && (c == C::from_ascii(b'\n') || c == C::from_ascii(b'\r')))
}

/// Tokenizes and compacts a buffer in place.
fn tokenize<C: VarUnit>(buf: &mut [C], multi_line: bool) -> Result<Vec<TokenRange>, VarsError> {
    let end = buf.iter().position(|&c| c == C::NUL).unwrap_or(buf.len());
    let (quote, escape, equals, hash, newline) = (
        C::from_ascii(b'"'),
        C::from_ascii(b'\\'),
        C::from_ascii(b'='),
        C::from_ascii(b'#'),
        C::from_ascii(b'\n'),
    );

    let mut tokens = Vec::new();
    let mut read = 0;
    let mut write = 0;

    while read < end {
        let c = buf[read];
        let line_end = c == newline || c == C::from_ascii(b'\r');
        if is_separator(c, multi_line) || (!multi_line && line_end) {
            read += 1;
            continue;
        }
        if multi_line && c == hash {
            while read < end && buf[read] != newline {
                read += 1;
            }
            continue;
        }

        let start = write;
        let mut split = None;
        let mut quoted = false;
        while read < end {
            let c = buf[read];
            if c == escape {
                let next = *buf
                    .get(read + 1)
                    .filter(|_| read + 1 < end)
                    .ok_or(VarsError::UnterminatedEscape)?;
                buf[write] = next;
                write += 1;
                read += 2;
                continue;
            }
            if c == quote {
                quoted = !quoted;
                read += 1;
                continue;
            }
            if !quoted && (is_separator(c, multi_line) || c == newline) {
                break;
            }
            if c == equals && split.is_none() {
                split = Some(write);
            }
            buf[write] = c;
            write += 1;
            read += 1;
        }
        if quoted {
            return Err(VarsError::InvalidQuote);
        }
        if write > start || split.is_some() {
            tokens.push(TokenRange {
                start,
                split,
                end: write,
            });
        }
    }

    Ok(tokens)
}

/// Turns token ranges into borrowed variables.
fn collect<'a, C: VarUnit>(buf: &'a [C], tokens: &[TokenRange]) -> ParsedVars<'a, C> {
    let vars = tokens
        .iter()
        .map(|token| match token.split {
            Some(split) => ParsedVar {
                name: &buf[token.start..split],
                value: Some(&buf[split + 1..token.end]),
            },
            None => ParsedVar {
                name: &buf[token.start..token.end],
                value: None,
            },
        })
        .collect();
    ParsedVars { vars }
}

/// Parses single line load options in place.
///
/// Parsing stops at the first nul. `#` has no special meaning.
///
/// # Errors
///
/// Returns [`VarsError::InvalidQuote`] for an unterminated quote, or [`VarsError::UnterminatedEscape`] for a
/// trailing backslash.
pub fn parse_load_options<C: VarUnit>(buf: &mut [C]) -> Result<ParsedVars<'_, C>, VarsError> {
    let tokens = tokenize(buf, false)?;
    Ok(collect(buf, &tokens))
}

/// Parses a multi line var file in place.
///
/// Newlines separate tokens like spaces do, and `#` at the start of a token comments out the rest of its line.
///
/// # Errors
///
/// Returns [`VarsError::InvalidQuote`] for an unterminated quote, or [`VarsError::UnterminatedEscape`] for a
/// trailing backslash.
pub fn parse_vars<C: VarUnit>(buf: &mut [C]) -> Result<ParsedVars<'_, C>, VarsError> {
    let tokens = tokenize(buf, true)?;
    Ok(collect(buf, &tokens))
}

/// Checks raw load options for sanity.
///
/// Absent or empty options are valid. Otherwise they must be whole UCS-2 units, no larger than
/// [`MAX_LOAD_OPTIONS_SIZE`], and contain a nul unit.
#[must_use = "Has no effect if the result is unused"]
pub fn valid_load_options(options: Option<&[u8]>) -> bool {
    let Some(options) = options.filter(|o| !o.is_empty()) else {
        return true;
    };
    options.len() % 2 == 0
        && options.len() <= MAX_LOAD_OPTIONS_SIZE
        && options.chunks_exact(2).any(|unit| unit == [0, 0])
}

/// Checks if raw load options are valid and do not begin with a nul unit.
#[must_use = "Has no effect if the result is unused"]
pub fn has_load_options(options: Option<&[u8]>) -> bool {
    options.is_some_and(|o| !o.is_empty())
        && valid_load_options(options)
        && options.is_some_and(|o| o.get(..2).is_some_and(|first| first != [0, 0]))
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::vec;
    use proptest::prelude::*;

    fn ucs2(str: &str) -> Vec<u16> {
        str.encode_utf16().chain(core::iter::once(0)).collect()
    }

    #[test]
    fn test_three_pairs() -> Result<(), VarsError> {
        let mut buf = b"name1=value1 name2 \"name3=value with space\"".to_vec();
        let vars = parse_load_options(&mut buf)?;
        let got: Vec<_> = vars.iter().map(|v| (v.name, v.value)).collect();
        assert_eq!(
            got,
            vec![
                (&b"name1"[..], Some(&b"value1"[..])),
                (&b"name2"[..], None),
                (&b"name3"[..], Some(&b"value with space"[..])),
            ]
        );
        Ok(())
    }

    #[test]
    fn test_ucs2_lookups() -> Result<(), VarsError> {
        let mut buf =
            ucs2("timeout=0x1F count=12 guid=4D1FDA02-38C7-4A6A-9CC6-4BCCA8B30102 flag empty=");
        let vars = parse_load_options(&mut buf)?;
        assert_eq!(vars.get_int("timeout")?, 0x1F);
        assert_eq!(vars.get_int("count")?, 12);
        assert_eq!(
            vars.get_guid("guid")?,
            uefi::guid!("4d1fda02-38c7-4a6a-9cc6-4bcca8b30102")
        );
        assert!(vars.has("flag"));
        assert_eq!(vars.get_str("flag"), Err(VarsError::NotFound));
        assert_eq!(vars.get_string("empty")?, "");
        assert_eq!(vars.get_str("missing"), Err(VarsError::NotFound));
        assert_eq!(vars.get_int("guid"), Err(VarsError::InvalidInt));
        assert_eq!(vars.get_guid("count"), Err(VarsError::InvalidGuid));
        Ok(())
    }

    #[test]
    fn test_escapes() -> Result<(), VarsError> {
        let mut buf = br#"path=C:\\dir\ name quote=\"x\" "a b"=c"#.to_vec();
        let vars = parse_load_options(&mut buf)?;
        assert_eq!(vars.get_string("path")?, "C:\\dir name");
        assert_eq!(vars.get_string("quote")?, "\"x\"");
        assert_eq!(vars.get_string("a b")?, "c");
        Ok(())
    }

    #[test]
    fn test_malformed() {
        let mut unterminated = b"title=\"macOS".to_vec();
        assert_eq!(parse_load_options(&mut unterminated), Err(VarsError::InvalidQuote));
        let mut escape = b"title=foo\\".to_vec();
        assert_eq!(parse_load_options(&mut escape), Err(VarsError::UnterminatedEscape));
    }

    #[test]
    fn test_var_file_comments() -> Result<(), VarsError> {
        let mut buf =
            b"# header\ntimeout=5\n  # indented\ntitle=\"a#b\" # trailing\nlast\0ignored=1".to_vec();
        let vars = parse_vars(&mut buf)?;
        assert_eq!(vars.len(), 3);
        assert_eq!(vars.get_int("timeout")?, 5);
        assert_eq!(vars.get_string("title")?, "a#b");
        assert!(vars.has("last"));
        assert!(!vars.has("ignored"));

        // load options have no comments
        let mut buf = b"#a=1".to_vec();
        assert_eq!(parse_load_options(&mut buf)?.get_int("#a")?, 1);
        Ok(())
    }

    #[test]
    fn test_valid_load_options() {
        assert!(valid_load_options(None));
        assert!(valid_load_options(Some(&[][..])));
        assert!(valid_load_options(Some(&[b'a', 0, 0, 0][..])));
        assert!(!valid_load_options(Some(&[b'a', 0, b'b', 0][..])));
        assert!(!valid_load_options(Some(&[b'a', 0, 0][..])));
        assert!(!valid_load_options(Some(&vec![0; MAX_LOAD_OPTIONS_SIZE + 2][..])));

        assert!(!has_load_options(None));
        assert!(!has_load_options(Some(&[0, 0][..])));
        assert!(has_load_options(Some(&[b'a', 0, 0, 0][..])));
    }

    proptest! {
        #[test]
        fn parser_never_panics(bytes in prop::collection::vec(any::<u8>(), 0..256)) {
            let mut line = bytes.clone();
            let mut file = bytes;
            let _ = parse_load_options(&mut line);
            let _ = parse_vars(&mut file);
        }

        #[test]
        fn plain_tokens_survive(names in prop::collection::vec("[a-z]{1,8}", 1..8)) {
            let line = names.join(" ");
            let mut buf = line.clone().into_bytes();
            let vars = parse_load_options(&mut buf)
                .map_err(|e| TestCaseError::fail(alloc::format!("{e}")))?;
            prop_assert_eq!(vars.len(), names.len());
            for name in &names {
                prop_assert!(vars.has(name));
            }
        }
    }
}
