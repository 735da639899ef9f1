use std::fmt;
use std::ops::{BitAnd, BitOr, BitXor, Not};

/// Scalar three-valued logic.
///
/// There is intentionally no conversion into `bool` and no `Hash` impl: an
/// `Unknown` must be resolved explicitly through [`Ternary::to_bool`] or a
/// `match`, never silently treated as true or false.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Ternary {
    False,
    True,
    Unknown,
}

impl Ternary {
    /// `Some(b)` when the value is defined, `None` for `Unknown`.
    pub fn to_bool(self) -> Option<bool> {
        match self {
            Ternary::False => Some(false),
            Ternary::True => Some(true),
            Ternary::Unknown => None,
        }
    }

    pub fn is_true(self) -> bool {
        matches!(self, Ternary::True)
    }

    pub fn is_false(self) -> bool {
        matches!(self, Ternary::False)
    }

    pub fn is_unknown(self) -> bool {
        matches!(self, Ternary::Unknown)
    }
}

impl From<bool> for Ternary {
    fn from(value: bool) -> Self {
        if value { Ternary::True } else { Ternary::False }
    }
}

impl Not for Ternary {
    type Output = Ternary;

    fn not(self) -> Ternary {
        match self {
            Ternary::False => Ternary::True,
            Ternary::True => Ternary::False,
            Ternary::Unknown => Ternary::Unknown,
        }
    }
}

impl BitAnd for Ternary {
    type Output = Ternary;

    fn bitand(self, rhs: Ternary) -> Ternary {
        use Ternary::*;
        match (self, rhs) {
            (False, False) | (False, True) | (False, Unknown) => False,
            (True, False) | (Unknown, False) => False,
            (True, True) => True,
            (True, Unknown) | (Unknown, True) | (Unknown, Unknown) => Unknown,
        }
    }
}

impl BitOr for Ternary {
    type Output = Ternary;

    fn bitor(self, rhs: Ternary) -> Ternary {
        use Ternary::*;
        match (self, rhs) {
            (True, True) | (True, False) | (True, Unknown) => True,
            (False, True) | (Unknown, True) => True,
            (False, False) => False,
            (False, Unknown) | (Unknown, False) | (Unknown, Unknown) => Unknown,
        }
    }
}

impl BitXor for Ternary {
    type Output = Ternary;

    fn bitxor(self, rhs: Ternary) -> Ternary {
        use Ternary::*;
        match (self, rhs) {
            (False, False) | (True, True) => False,
            (False, True) | (True, False) => True,
            (Unknown, False) | (Unknown, True) | (Unknown, Unknown) => Unknown,
            (False, Unknown) | (True, Unknown) => Unknown,
        }
    }
}

impl fmt::Display for Ternary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Ternary::False => write!(f, "0"),
            Ternary::True => write!(f, "1"),
            Ternary::Unknown => write!(f, "x"),
        }
    }
}
