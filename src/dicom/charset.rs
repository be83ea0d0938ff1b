//! Specific Character Set aware text decoding.

use log::debug;
use unicode_normalization::UnicodeNormalization;

/// The repertoire text values of a dataset are encoded in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CharacterSet {
    /// ISO_IR 6, the default repertoire. ASCII, decoded leniently as UTF-8.
    #[default]
    Default,
    /// ISO_IR 192.
    Utf8,
    /// ISO_IR 100, and anything we do not know how to decode.
    Latin1,
}

impl CharacterSet {
    /// Resolve a Specific Character Set (0008,0005) value.
    ///
    /// Multi-valued declarations name the code extensions after the first
    /// value; the first non-empty term decides the repertoire.
    pub fn from_term(term: &str) -> CharacterSet {
        let first = term
            .split('\\')
            .map(|t| t.trim_matches(|c: char| c == ' ' || c == '\0'))
            .find(|t| !t.is_empty())
            .unwrap_or("");
        match first {
            "" | "ISO_IR 6" | "ISO 2022 IR 6" => CharacterSet::Default,
            "ISO_IR 192" => CharacterSet::Utf8,
            "ISO_IR 100" | "ISO 2022 IR 100" => CharacterSet::Latin1,
            other => {
                debug!("unsupported character set {other:?}, decoding as Latin-1");
                CharacterSet::Latin1
            }
        }
    }

    /// Decode raw value bytes into NFC text with padding removed.
    pub fn decode(self, bytes: &[u8]) -> String {
        let raw = match self {
            CharacterSet::Utf8 => String::from_utf8_lossy(bytes).into_owned(),
            CharacterSet::Default => match std::str::from_utf8(bytes) {
                Ok(text) => text.to_string(),
                Err(_) => latin1(bytes),
            },
            CharacterSet::Latin1 => latin1(bytes),
        };
        trim_padding(&raw).nfc().collect()
    }
}

fn latin1(bytes: &[u8]) -> String {
    bytes.iter().map(|&b| b as char).collect()
}

/// Strip the space and NUL padding values carry, plus surrounding whitespace.
pub fn trim_padding(text: &str) -> &str {
    text.trim_matches(|c: char| c == '\0' || c.is_whitespace())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_terms() {
        assert_eq!(CharacterSet::from_term(""), CharacterSet::Default);
        assert_eq!(CharacterSet::from_term("ISO_IR 192"), CharacterSet::Utf8);
        assert_eq!(CharacterSet::from_term("ISO_IR 100 "), CharacterSet::Latin1);
        assert_eq!(
            CharacterSet::from_term("\\ISO 2022 IR 100"),
            CharacterSet::Latin1
        );
        assert_eq!(CharacterSet::from_term("ISO_IR 144"), CharacterSet::Latin1);
    }

    #[test]
    fn test_decode_latin1_and_utf8() {
        let latin = [b'M', 0xFC, b'l', b'l', b'e', b'r', b' '];
        assert_eq!(CharacterSet::Latin1.decode(&latin), "Müller");
        assert_eq!(CharacterSet::Utf8.decode("Müller\0".as_bytes()), "Müller");
        assert_eq!(CharacterSet::Default.decode(&latin), "Müller");
    }

    #[test]
    fn test_decode_normalizes_to_nfc() {
        let decomposed = "Mu\u{0308}ller";
        assert_eq!(CharacterSet::Utf8.decode(decomposed.as_bytes()), "Müller");
    }
}
