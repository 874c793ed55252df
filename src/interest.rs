//! Readiness conditions an endpoint can register interest in.

use std::fmt;
use std::ops::{BitOr, BitOrAssign};

/// Set over `{ACCEPT, READ, WRITE}`.
///
/// `ACCEPT` is a first-class member here even though the OS reports pending
/// connections as plain readability; [`to_mio`](InterestSet::to_mio) folds
/// it back onto `READABLE` at registration time and the poller unfolds it
/// when building ready sets.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct InterestSet(u8);

impl InterestSet {
    pub const ACCEPT: Self = Self(0b001);
    pub const READ: Self = Self(0b010);
    pub const WRITE: Self = Self(0b100);

    pub const fn empty() -> Self {
        Self(0)
    }

    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }

    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    pub const fn intersects(self, other: Self) -> bool {
        self.0 & other.0 != 0
    }

    pub const fn with(self, other: Self) -> Self {
        Self(self.0 | other.0)
    }

    pub const fn without(self, other: Self) -> Self {
        Self(self.0 & !other.0)
    }

    pub const fn is_acceptable(self) -> bool {
        self.contains(Self::ACCEPT)
    }

    pub const fn is_readable(self) -> bool {
        self.contains(Self::READ)
    }

    pub const fn is_writable(self) -> bool {
        self.contains(Self::WRITE)
    }

    /// Maps onto mio's interest type. `None` for the empty set, which mio
    /// cannot represent.
    pub(crate) fn to_mio(self) -> Option<mio::Interest> {
        let mut interest = None;
        if self.intersects(Self::ACCEPT.with(Self::READ)) {
            interest = Some(mio::Interest::READABLE);
        }
        if self.contains(Self::WRITE) {
            interest = Some(match interest {
                Some(i) => i | mio::Interest::WRITABLE,
                None => mio::Interest::WRITABLE,
            });
        }
        interest
    }
}

impl BitOr for InterestSet {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        self.with(rhs)
    }
}

impl BitOrAssign for InterestSet {
    fn bitor_assign(&mut self, rhs: Self) {
        *self = self.with(rhs);
    }
}

impl fmt::Debug for InterestSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_empty() {
            return write!(f, "(empty)");
        }
        let mut first = true;
        for (bit, name) in [
            (Self::ACCEPT, "ACCEPT"),
            (Self::READ, "READ"),
            (Self::WRITE, "WRITE"),
        ] {
            if self.contains(bit) {
                if !first {
                    write!(f, "|")?;
                }
                write!(f, "{name}")?;
                first = false;
            }
        }
        Ok(())
    }
}
