/*!
Names for common VCP control codes.

The protocol engine treats control codes as opaque bytes; this table only
exists so front-ends can accept `brightness` instead of `0x10`.
*/

pub const BRIGHTNESS: u8 = 0x10;
pub const CONTRAST: u8 = 0x12;
pub const INPUT_SOURCE: u8 = 0x60;
pub const AUDIO_VOLUME: u8 = 0x62;
pub const POWER_MODE: u8 = 0xD6;
pub const VERSION: u8 = 0xDF;

const NAMES: &[(&str, u8)] = &[
    ("brightness", BRIGHTNESS),
    ("contrast", CONTRAST),
    ("input", INPUT_SOURCE),
    ("volume", AUDIO_VOLUME),
    ("power", POWER_MODE),
    ("version", VERSION),
];

/// Look up a control code by name (case-insensitive)
pub fn by_name(name: &str) -> Option<u8> {
    let name = name.to_ascii_lowercase();
    NAMES.iter().find(|(n, _)| *n == name).map(|&(_, code)| code)
}

/// Name of a known control code
pub fn name_of(code: u8) -> Option<&'static str> {
    NAMES.iter().find(|&&(_, c)| c == code).map(|&(n, _)| n)
}

/// Every named control
pub fn known() -> impl Iterator<Item = (&'static str, u8)> {
    NAMES.iter().copied()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lookup() {
        assert_eq!(by_name("Brightness"), Some(0x10));
        assert_eq!(by_name("contrast"), Some(0x12));
        assert_eq!(by_name("gamma"), None);
        assert_eq!(name_of(0x60), Some("input"));
        assert_eq!(name_of(0x41), None);
        assert_eq!(known().count(), NAMES.len());
    }
}
