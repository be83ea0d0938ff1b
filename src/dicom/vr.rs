//! Value representations.

use std::fmt;

use serde::{Deserialize, Serialize};

/// The declared encoding of an attribute value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum VR {
    AE,
    AS,
    AT,
    CS,
    DA,
    DS,
    DT,
    FD,
    FL,
    IS,
    LO,
    LT,
    OB,
    OD,
    OF,
    OL,
    OV,
    OW,
    PN,
    SH,
    SL,
    SQ,
    SS,
    ST,
    SV,
    TM,
    UC,
    UI,
    UL,
    UN,
    UR,
    US,
    UT,
    UV,
}

/// How a value representation is decoded for indexing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VrKind {
    /// Character data.
    Text,
    /// Binary integers.
    BinaryInteger,
    /// Binary IEEE floats.
    BinaryFloat,
    /// Attribute tag values.
    AttributeTag,
    /// Opaque bytes that are never indexed.
    Bulk,
    /// Nested items.
    Sequence,
}

impl VR {
    pub fn from_bytes(bytes: [u8; 2]) -> Option<VR> {
        let vr = match &bytes {
            b"AE" => VR::AE,
            b"AS" => VR::AS,
            b"AT" => VR::AT,
            b"CS" => VR::CS,
            b"DA" => VR::DA,
            b"DS" => VR::DS,
            b"DT" => VR::DT,
            b"FD" => VR::FD,
            b"FL" => VR::FL,
            b"IS" => VR::IS,
            b"LO" => VR::LO,
            b"LT" => VR::LT,
            b"OB" => VR::OB,
            b"OD" => VR::OD,
            b"OF" => VR::OF,
            b"OL" => VR::OL,
            b"OV" => VR::OV,
            b"OW" => VR::OW,
            b"PN" => VR::PN,
            b"SH" => VR::SH,
            b"SL" => VR::SL,
            b"SQ" => VR::SQ,
            b"SS" => VR::SS,
            b"ST" => VR::ST,
            b"SV" => VR::SV,
            b"TM" => VR::TM,
            b"UC" => VR::UC,
            b"UI" => VR::UI,
            b"UL" => VR::UL,
            b"UN" => VR::UN,
            b"UR" => VR::UR,
            b"US" => VR::US,
            b"UT" => VR::UT,
            b"UV" => VR::UV,
            _ => return None,
        };
        Some(vr)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            VR::AE => "AE",
            VR::AS => "AS",
            VR::AT => "AT",
            VR::CS => "CS",
            VR::DA => "DA",
            VR::DS => "DS",
            VR::DT => "DT",
            VR::FD => "FD",
            VR::FL => "FL",
            VR::IS => "IS",
            VR::LO => "LO",
            VR::LT => "LT",
            VR::OB => "OB",
            VR::OD => "OD",
            VR::OF => "OF",
            VR::OL => "OL",
            VR::OV => "OV",
            VR::OW => "OW",
            VR::PN => "PN",
            VR::SH => "SH",
            VR::SL => "SL",
            VR::SQ => "SQ",
            VR::SS => "SS",
            VR::ST => "ST",
            VR::SV => "SV",
            VR::TM => "TM",
            VR::UC => "UC",
            VR::UI => "UI",
            VR::UL => "UL",
            VR::UN => "UN",
            VR::UR => "UR",
            VR::US => "US",
            VR::UT => "UT",
            VR::UV => "UV",
        }
    }

    /// Explicit VR encodings of these use two reserved bytes and a 32-bit length.
    pub fn has_long_header(self) -> bool {
        matches!(
            self,
            VR::OB
                | VR::OD
                | VR::OF
                | VR::OL
                | VR::OV
                | VR::OW
                | VR::SQ
                | VR::SV
                | VR::UC
                | VR::UN
                | VR::UR
                | VR::UT
                | VR::UV
        )
    }

    pub fn kind(self) -> VrKind {
        match self {
            VR::SS | VR::US | VR::SL | VR::UL | VR::SV | VR::UV => VrKind::BinaryInteger,
            VR::FL | VR::FD => VrKind::BinaryFloat,
            VR::AT => VrKind::AttributeTag,
            VR::OB | VR::OD | VR::OF | VR::OL | VR::OV | VR::OW | VR::UN => VrKind::Bulk,
            VR::SQ => VrKind::Sequence,
            _ => VrKind::Text,
        }
    }

    /// Size of one binary value, used to swap byte order. `None` for
    /// character data and bytes.
    pub fn unit_size(self) -> Option<usize> {
        match self {
            VR::SS | VR::US | VR::AT | VR::OW => Some(2),
            VR::SL | VR::UL | VR::FL | VR::OF | VR::OL => Some(4),
            VR::FD | VR::SV | VR::UV | VR::OD | VR::OV => Some(8),
            _ => None,
        }
    }

    /// Byte used to pad values to an even length.
    pub fn padding(self) -> u8 {
        match self {
            VR::UI | VR::OB | VR::UN => 0,
            _ if self.kind() == VrKind::Text => b' ',
            _ => 0,
        }
    }
}

impl fmt::Display for VR {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
