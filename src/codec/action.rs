// Action codes of the bit-packed diff body.
//
// Every operation starts with a 3-bit code. Code 0 only appears once, as
// the codec-data marker opening the header; code 7 is unassigned.

use crate::diff::DiffPart;

/// Width of an action code in bits.
pub const ACTION_BITS: u32 = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Action {
    CodecData = 0,
    FullRevision = 1,
    Insert = 2,
    Delete = 3,
    Replace = 4,
    Cut = 5,
    Paste = 6,
}

impl Action {
    #[inline]
    pub fn code(self) -> u32 {
        self as u32
    }

    pub fn from_code(code: u32) -> Option<Action> {
        Some(match code {
            0 => Action::CodecData,
            1 => Action::FullRevision,
            2 => Action::Insert,
            3 => Action::Delete,
            4 => Action::Replace,
            5 => Action::Cut,
            6 => Action::Paste,
            _ => return None,
        })
    }

    pub fn of(part: &DiffPart) -> Action {
        match part {
            DiffPart::FullRevision { .. } => Action::FullRevision,
            DiffPart::Insert { .. } => Action::Insert,
            DiffPart::Delete { .. } => Action::Delete,
            DiffPart::Replace { .. } => Action::Replace,
            DiffPart::Cut { .. } => Action::Cut,
            DiffPart::Paste { .. } => Action::Paste,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Action::CodecData => "CODEC",
            Action::FullRevision => "FULL",
            Action::Insert => "INSERT",
            Action::Delete => "DELETE",
            Action::Replace => "REPLACE",
            Action::Cut => "CUT",
            Action::Paste => "PASTE",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_fit_three_bits() {
        for code in 0..8u32 {
            match Action::from_code(code) {
                Some(action) => {
                    assert_eq!(action.code(), code);
                    assert!(action.code() < (1 << ACTION_BITS));
                }
                None => assert_eq!(code, 7),
            }
        }
    }
}
