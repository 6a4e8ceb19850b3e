// Text payload charsets.
//
// Diff texts are UTF-16 code units in memory and are re-encoded with the
// configured charset when serialized.

use std::fmt;
use std::str::FromStr;

use crate::revision::RevisionText;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Hash)]
pub enum TextCharset {
    #[default]
    Utf8,
    Utf16Le,
    Utf16Be,
}

impl TextCharset {
    pub fn name(self) -> &'static str {
        match self {
            TextCharset::Utf8 => "UTF-8",
            TextCharset::Utf16Le => "UTF-16LE",
            TextCharset::Utf16Be => "UTF-16BE",
        }
    }

    /// Encode `text`. `None` when the charset cannot represent it (an
    /// unpaired surrogate under UTF-8).
    pub fn encode(self, text: &RevisionText) -> Option<Vec<u8>> {
        let units = text.as_units();
        match self {
            TextCharset::Utf8 => String::from_utf16(units).ok().map(String::into_bytes),
            TextCharset::Utf16Le => Some(units.iter().flat_map(|u| u.to_le_bytes()).collect()),
            TextCharset::Utf16Be => Some(units.iter().flat_map(|u| u.to_be_bytes()).collect()),
        }
    }

    /// Decode bytes produced by [`encode`](Self::encode).
    pub fn decode(self, bytes: &[u8]) -> Result<RevisionText, String> {
        match self {
            TextCharset::Utf8 => std::str::from_utf8(bytes)
                .map(RevisionText::from)
                .map_err(|e| format!("invalid UTF-8 text: {e}")),
            TextCharset::Utf16Le | TextCharset::Utf16Be => {
                if bytes.len() % 2 != 0 {
                    return Err(format!("odd byte length {} for {}", bytes.len(), self.name()));
                }
                let units = bytes
                    .chunks_exact(2)
                    .map(|pair| {
                        let pair = [pair[0], pair[1]];
                        if self == TextCharset::Utf16Le {
                            u16::from_le_bytes(pair)
                        } else {
                            u16::from_be_bytes(pair)
                        }
                    })
                    .collect();
                Ok(RevisionText::from_units(units))
            }
        }
    }
}

impl fmt::Display for TextCharset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for TextCharset {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().replace('_', "-").as_str() {
            "utf-8" | "utf8" => Ok(TextCharset::Utf8),
            "utf-16le" | "utf16le" => Ok(TextCharset::Utf16Le),
            "utf-16be" | "utf16be" | "utf-16" => Ok(TextCharset::Utf16Be),
            other => Err(format!("unsupported charset '{other}'")),
        }
    }
}
