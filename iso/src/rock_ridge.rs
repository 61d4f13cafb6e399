// Rock Ridge (RRIP_1991A) recognition on top of SUSP. Only the presence
// announcement and the NM alternate-name entries are interpreted; POSIX
// attribute records are passed through undecoded.

use discus_core::DiscusResult;

use crate::susp::{extension_records, SystemUseEntry};

pub const ROCK_RIDGE_IDENTIFIER: &str = "RRIP_1991A";
pub const ROCK_RIDGE_VERSION: u8 = 1;

/// RRIP 4.1.4: alternate name.
pub const TAG_ALTERNATE_NAME: &[u8; 2] = b"NM";

/// Whether a split system-use area announces Rock Ridge.
pub fn has_rock_ridge(entries: &[SystemUseEntry]) -> DiscusResult<bool> {
    let records = extension_records(entries)?;
    Ok(records
        .iter()
        .any(|er| er.identifier == ROCK_RIDGE_IDENTIFIER && er.version == ROCK_RIDGE_VERSION))
}

/// The alternate name carried by NM entries, if any. A long name is spread
/// over several NM entries (each with a continuation flag in its first
/// payload byte); concatenating them in order yields the full name, so the
/// flag itself never needs inspecting.
pub fn alternate_name(entries: &[SystemUseEntry]) -> Option<String> {
    let mut name = String::new();
    let mut found = false;
    for entry in entries {
        if entry.tag() == TAG_ALTERNATE_NAME && !entry.data().is_empty() {
            found = true;
            name.push_str(&String::from_utf8_lossy(&entry.data()[1..]));
        }
    }
    found.then_some(name)
}
