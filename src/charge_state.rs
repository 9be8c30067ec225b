// SPDX-FileCopyrightText: Copyright (c) 2024 NVIDIA CORPORATION & AFFILIATES. All rights reserved.
// SPDX-License-Identifier: Apache-2.0
//! SiDB charge states and the multiset encoding used for cluster-level
//! charge configurations.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::{Add, AddAssign, SubAssign};

/// Charge state of a single SiDB.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum ChargeState {
    Negative,
    Neutral,
    Positive,
    /// Unassigned.
    #[default]
    None,
}

const BASE_2_STATES: [ChargeState; 2] = [ChargeState::Negative, ChargeState::Neutral];
const BASE_3_STATES: [ChargeState; 3] = [
    ChargeState::Negative,
    ChargeState::Neutral,
    ChargeState::Positive,
];

impl ChargeState {
    /// Integer sign of the charge, `None` when unassigned.
    #[inline]
    pub fn sign(self) -> Option<i8> {
        match self {
            ChargeState::Negative => Some(-1),
            ChargeState::Neutral => Some(0),
            ChargeState::Positive => Some(1),
            ChargeState::None => None,
        }
    }

    /// Sign with unassigned SiDBs treated as neutral.
    #[inline]
    pub fn sign_or_zero(self) -> i8 {
        self.sign().unwrap_or(0)
    }

    /// The charge states admitted by a simulation base.
    pub fn for_base(base: u8) -> &'static [ChargeState] {
        if base == 3 {
            &BASE_3_STATES
        } else {
            &BASE_2_STATES
        }
    }
}

impl TryFrom<i8> for ChargeState {
    type Error = ();

    fn try_from(sign: i8) -> Result<Self, Self::Error> {
        match sign {
            -1 => Ok(ChargeState::Negative),
            0 => Ok(ChargeState::Neutral),
            1 => Ok(ChargeState::Positive),
            _ => Err(()),
        }
    }
}

impl fmt::Display for ChargeState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let c = match self {
            ChargeState::Negative => '-',
            ChargeState::Neutral => '0',
            ChargeState::Positive => '+',
            ChargeState::None => 'x',
        };
        write!(f, "{c}")
    }
}

/// Multiset charge configuration: how many SiDBs of a cluster are
/// negative and how many positive, without saying which.
///
/// Packed as `neg << 32 | pos`. The neutral count follows from the
/// cluster size.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Multiset(u64);

impl Multiset {
    pub const EMPTY: Multiset = Multiset(0);

    #[inline]
    pub fn new(neg_count: u32, pos_count: u32) -> Self {
        Multiset(((neg_count as u64) << 32) | pos_count as u64)
    }

    /// The multiset of a singleton in the given charge state.
    #[inline]
    pub fn from_charge_state(cs: ChargeState) -> Self {
        match cs {
            ChargeState::Negative => Multiset::new(1, 0),
            ChargeState::Positive => Multiset::new(0, 1),
            ChargeState::Neutral | ChargeState::None => Multiset::EMPTY,
        }
    }

    #[inline]
    pub fn from_packed(m: u64) -> Self {
        Multiset(m)
    }

    #[inline]
    pub fn packed(self) -> u64 {
        self.0
    }

    #[inline]
    pub fn neg_count(self) -> u64 {
        self.0 >> 32
    }

    #[inline]
    pub fn pos_count(self) -> u64 {
        self.0 & 0xFFFF_FFFF
    }

    /// Neutral count in a cluster of `size` SiDBs.
    #[inline]
    pub fn neutral_count(self, size: usize) -> u64 {
        (size as u64).saturating_sub(self.neg_count() + self.pos_count())
    }

    /// The charge state of a singleton holding this multiset.
    #[inline]
    pub fn to_singleton_charge_state(self) -> ChargeState {
        if self.neg_count() == 1 {
            ChargeState::Negative
        } else if self.pos_count() == 1 {
            ChargeState::Positive
        } else {
            ChargeState::Neutral
        }
    }

    /// Whether the counts fit into a cluster of `size` SiDBs.
    #[inline]
    pub fn fits(self, size: usize) -> bool {
        self.neg_count() + self.pos_count() <= size as u64
    }
}

impl Add for Multiset {
    type Output = Multiset;

    #[inline]
    fn add(self, rhs: Multiset) -> Multiset {
        Multiset(self.0 + rhs.0)
    }
}

impl AddAssign for Multiset {
    #[inline]
    fn add_assign(&mut self, rhs: Multiset) {
        self.0 += rhs.0;
    }
}

impl SubAssign for Multiset {
    #[inline]
    fn sub_assign(&mut self, rhs: Multiset) {
        debug_assert!(self.neg_count() >= rhs.neg_count() && self.pos_count() >= rhs.pos_count());
        self.0 -= rhs.0;
    }
}

impl fmt::Display for Multiset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{{-:{}, +:{}}}", self.neg_count(), self.pos_count())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sign_conversion() {
        for cs in BASE_3_STATES {
            assert_eq!(ChargeState::try_from(cs.sign().unwrap()), Ok(cs));
        }
        assert_eq!(ChargeState::None.sign(), None);
        assert!(ChargeState::try_from(2).is_err());
    }

    #[test]
    fn test_states_for_base() {
        assert_eq!(ChargeState::for_base(2).len(), 2);
        assert!(!ChargeState::for_base(2).contains(&ChargeState::Positive));
        assert_eq!(ChargeState::for_base(3).len(), 3);
    }

    #[test]
    fn test_multiset_counts() {
        let m = Multiset::new(3, 2);
        assert_eq!(m.neg_count(), 3);
        assert_eq!(m.pos_count(), 2);
        assert_eq!(m.neutral_count(7), 2);
        assert!(m.fits(5));
        assert!(!m.fits(4));
        assert_eq!(m.packed(), (3 << 32) | 2);
    }

    #[test]
    fn test_multiset_arithmetic() {
        let mut m = Multiset::from_charge_state(ChargeState::Negative);
        m += Multiset::from_charge_state(ChargeState::Positive);
        m += Multiset::from_charge_state(ChargeState::Negative);
        assert_eq!(m, Multiset::new(2, 1));
        m -= Multiset::new(1, 1);
        assert_eq!(m, Multiset::new(1, 0));
        assert_eq!(m + Multiset::new(0, 4), Multiset::new(1, 4));
    }

    #[test]
    fn test_singleton_round_trip() {
        for cs in BASE_3_STATES {
            assert_eq!(Multiset::from_charge_state(cs).to_singleton_charge_state(), cs);
        }
    }

    #[test]
    fn test_multiset_order_follows_packing() {
        // more negative charges always sort after more positive charges
        assert!(Multiset::new(0, 5) < Multiset::new(1, 0));
        assert!(Multiset::new(1, 0) < Multiset::new(1, 1));
    }
}
