// Identifier mangling: free-form path components are rewritten into the
// d-character alphabet with the ECMA-119 length caps. Directories may use
// 31 bytes; file identifiers get 30 including the mandatory ";1" version
// suffix.

use std::path::PathBuf;

use crate::types::{is_d_character, MAX_DIRECTORY_IDENTIFIER_LEN, MAX_FILE_IDENTIFIER_LEN};

const FILE_VERSION: &str = "1";

/// Uppercase, truncate to `max` bytes, and replace everything outside the
/// d-character set with `_`. A multi-byte character becomes one `_` per
/// byte, so truncation counts bytes, never characters.
fn mangle_d_string(input: &str, max: usize) -> String {
    input
        .to_uppercase()
        .bytes()
        .take(max)
        .map(|b| if is_d_character(b) { b as char } else { '_' })
        .collect()
}

/// ECMA-119 7.6.3.
pub fn mangle_directory_name(input: &str) -> String {
    mangle_d_string(input, MAX_DIRECTORY_IDENTIFIER_LEN)
}

/// ECMA-119 7.5: `STEM.EXT;1`, or `STEM;1` for extensionless names. The
/// extension is whatever follows the last dot, capped at 8 d-characters;
/// earlier dots fold into the stem as `_`; the stem then takes whatever
/// room the 30-byte cap leaves.
pub fn mangle_file_name(input: &str) -> String {
    let upper = input.to_uppercase();
    let (stem, extension) = match upper.rsplit_once('.') {
        None => (upper.clone(), String::new()),
        Some((before, after)) => (before.replace('.', "_"), after.to_string()),
    };

    let extension = mangle_d_string(&extension, 8);

    let mut max_stem = MAX_FILE_IDENTIFIER_LEN - (1 + FILE_VERSION.len());
    if !extension.is_empty() {
        max_stem -= 1 + extension.len();
    }
    let stem = mangle_d_string(&stem, max_stem);

    if extension.is_empty() {
        format!("{stem};{FILE_VERSION}")
    } else {
        format!("{stem}.{extension};{FILE_VERSION}")
    }
}

/// Split a slash-separated logical path, drop empty segments, and mangle
/// every directory component plus the final file component. Returns the
/// mangled directory path and file name, or `None` when the path has no
/// non-empty segment.
pub fn mangle_path(input: &str) -> Option<(PathBuf, String)> {
    let mut segments: Vec<&str> = input.split('/').filter(|s| !s.is_empty()).collect();
    let file = segments.pop()?;

    let mut directory = PathBuf::new();
    for segment in segments {
        directory.push(mangle_directory_name(segment));
    }
    Some((directory, mangle_file_name(file)))
}
