// SPDX-FileCopyrightText: Copyright (c) 2024 NVIDIA CORPORATION & AFFILIATES. All rights reserved.
// SPDX-License-Identifier: Apache-2.0
//! Data of cluster charge spaces: potential projections, their orders,
//! potential bounds stores, projector states and compositions.
//!
//! All potentials here are negated local potentials: a negative charge at
//! distance `d` projects `+V(d)`.

use crate::charge_state::{ChargeState, Multiset};
use crate::cluster_hierarchy::ClusterId;
use indexmap::IndexMap;
use smallvec::SmallVec;
use std::cmp::Ordering;
use std::collections::{BTreeSet, HashMap};
use std::ops::{AddAssign, SubAssign};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BoundDirection {
    Lower,
    Upper,
}

impl BoundDirection {
    pub const BOTH: [BoundDirection; 2] = [BoundDirection::Lower, BoundDirection::Upper];

    /// Identity of [`BoundDirection::meet`].
    #[inline]
    pub fn top(self) -> f64 {
        match self {
            BoundDirection::Lower => f64::INFINITY,
            BoundDirection::Upper => f64::NEG_INFINITY,
        }
    }

    /// The looser of two bounds.
    #[inline]
    pub fn meet(self, a: f64, b: f64) -> f64 {
        match self {
            BoundDirection::Lower => a.min(b),
            BoundDirection::Upper => a.max(b),
        }
    }

    #[inline]
    fn ix(self) -> usize {
        self as usize
    }
}

/// Potential projected onto some SiDB by a cluster in multiset
/// configuration `multiset`.
#[derive(Debug, Clone, Copy, Default)]
pub struct PotentialProjection {
    pub pot_val: f64,
    pub multiset: Multiset,
}

impl PotentialProjection {
    #[inline]
    pub fn new(pot_val: f64, multiset: Multiset) -> Self {
        // -0.0 would sort apart from 0.0
        Self {
            pot_val: pot_val + 0.0,
            multiset,
        }
    }

    /// Projection of a singleton in charge state `cs`.
    #[inline]
    pub fn from_charge_state(pot_val: f64, cs: ChargeState) -> Self {
        Self::new(pot_val, Multiset::from_charge_state(cs))
    }
}

impl Ord for PotentialProjection {
    fn cmp(&self, other: &Self) -> Ordering {
        self.pot_val
            .total_cmp(&other.pot_val)
            .then(self.multiset.cmp(&other.multiset))
    }
}

impl PartialOrd for PotentialProjection {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for PotentialProjection {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for PotentialProjection {}

impl AddAssign for PotentialProjection {
    #[inline]
    fn add_assign(&mut self, rhs: PotentialProjection) {
        self.pot_val += rhs.pot_val;
        self.multiset += rhs.multiset;
    }
}

/// All projections of one cluster onto one SiDB, ordered by potential.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PotentialProjectionOrder {
    order: BTreeSet<PotentialProjection>,
}

impl PotentialProjectionOrder {
    /// What a singleton projects onto itself: the external potential it
    /// sits in, for every charge state it can take.
    pub fn self_projection(loc_ext_pot: f64, base: u8) -> Self {
        Self {
            order: ChargeState::for_base(base)
                .iter()
                .map(|&cs| PotentialProjection::from_charge_state(loc_ext_pot, cs))
                .collect(),
        }
    }

    /// What a singleton projects onto another SiDB at chargeless potential
    /// `inter_sidb_pot`.
    pub fn inter_sidb(inter_sidb_pot: f64, base: u8) -> Self {
        Self {
            order: ChargeState::for_base(base)
                .iter()
                .map(|&cs| {
                    let pot = match cs {
                        ChargeState::Negative => inter_sidb_pot,
                        ChargeState::Positive => -inter_sidb_pot,
                        ChargeState::Neutral | ChargeState::None => 0.0,
                    };
                    PotentialProjection::from_charge_state(pot, cs)
                })
                .collect(),
        }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.order.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &PotentialProjection> {
        self.order.iter()
    }

    /// The extremal projection in the given direction.
    #[inline]
    pub fn bound(&self, bound: BoundDirection) -> Option<PotentialProjection> {
        match bound {
            BoundDirection::Lower => self.order.first().copied(),
            BoundDirection::Upper => self.order.last().copied(),
        }
    }

    /// The extremal projection of a different multiset than the current
    /// bound, i.e. the bound after the current bound's multiset is gone.
    pub fn next_bound(&self, bound: BoundDirection) -> Option<PotentialProjection> {
        let m = self.bound(bound)?.multiset;
        match bound {
            BoundDirection::Lower => self.order.iter().find(|pp| pp.multiset != m).copied(),
            BoundDirection::Upper => self.order.iter().rev().find(|pp| pp.multiset != m).copied(),
        }
    }

    /// The extremal projection among those of multiset `m`.
    pub fn pot_proj_for_m_conf(&self, bound: BoundDirection, m: Multiset) -> Option<PotentialProjection> {
        match bound {
            BoundDirection::Lower => self.order.iter().find(|pp| pp.multiset == m).copied(),
            BoundDirection::Upper => self.order.iter().rev().find(|pp| pp.multiset == m).copied(),
        }
    }

    pub fn remove_m_conf(&mut self, m: Multiset) {
        self.order.retain(|pp| pp.multiset != m);
    }

    #[inline]
    pub fn add(&mut self, pp: PotentialProjection) {
        self.order.insert(pp);
    }
}

/// Potential bounds for a subset of SiDBs.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PartialPotentialBounds {
    store: HashMap<usize, [f64; 2]>,
}

impl PartialPotentialBounds {
    /// Bound at `sidb_ix`, zero if nothing was stored.
    #[inline]
    pub fn get(&self, bound: BoundDirection, sidb_ix: usize) -> f64 {
        self.store.get(&sidb_ix).map_or(0.0, |b| b[bound.ix()])
    }

    #[inline]
    pub fn set(&mut self, bound: BoundDirection, sidb_ix: usize, v: f64) {
        self.store.entry(sidb_ix).or_default()[bound.ix()] = v;
    }

    #[inline]
    pub fn set_both(&mut self, sidb_ix: usize, lb: f64, ub: f64) {
        self.store.insert(sidb_ix, [lb, ub]);
    }

    #[inline]
    pub fn update(&mut self, bound: BoundDirection, sidb_ix: usize, diff: f64) {
        self.store.entry(sidb_ix).or_default()[bound.ix()] += diff;
    }
}

/// Potential bounds for every SiDB of the layout.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CompletePotentialBounds {
    store: Vec<[f64; 2]>,
}

impl CompletePotentialBounds {
    /// All bounds zero.
    pub fn new(num_sidbs: usize) -> Self {
        Self {
            store: vec![[0.0; 2]; num_sidbs],
        }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.store.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.store.is_empty()
    }

    #[inline]
    pub fn get(&self, bound: BoundDirection, sidb_ix: usize) -> f64 {
        self.store[sidb_ix][bound.ix()]
    }

    #[inline]
    pub fn set_both(&mut self, sidb_ix: usize, lb: f64, ub: f64) {
        self.store[sidb_ix] = [lb, ub];
    }

    #[inline]
    pub fn update(&mut self, sidb_ix: usize, lb_diff: f64, ub_diff: f64) {
        let b = &mut self.store[sidb_ix];
        b[0] += lb_diff;
        b[1] += ub_diff;
    }
}

impl AddAssign<&CompletePotentialBounds> for CompletePotentialBounds {
    fn add_assign(&mut self, other: &CompletePotentialBounds) {
        for (a, b) in self.store.iter_mut().zip(&other.store) {
            a[0] += b[0];
            a[1] += b[1];
        }
    }
}

impl SubAssign<&CompletePotentialBounds> for CompletePotentialBounds {
    fn sub_assign(&mut self, other: &CompletePotentialBounds) {
        for (a, b) in self.store.iter_mut().zip(&other.store) {
            a[0] -= b[0];
            a[1] -= b[1];
        }
    }
}

/// A cluster taken in one of its multiset configurations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ProjectorState {
    pub cluster: ClusterId,
    pub multiset: Multiset,
}

impl ProjectorState {
    #[inline]
    pub fn new(cluster: ClusterId, multiset: Multiset) -> Self {
        Self { cluster, multiset }
    }

    /// How many SiDBs of a cluster of `cluster_size` must hold `cs`.
    #[inline]
    pub fn count(&self, cs: ChargeState, cluster_size: usize) -> u64 {
        match cs {
            ChargeState::Negative => self.multiset.neg_count(),
            ChargeState::Positive => self.multiset.pos_count(),
            ChargeState::Neutral => self.multiset.neutral_count(cluster_size),
            ChargeState::None => 0,
        }
    }
}

/// One way of realising a cluster multiset: a projector state per child,
/// plus the potential bounds these children project onto each SiDB.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Composition {
    pub proj_states: SmallVec<[ProjectorState; 2]>,
    pub pot_bounds: CompletePotentialBounds,
}

/// The charge space of a cluster: each surviving multiset with the
/// compositions that realise it.
pub type ChargeSpace = IndexMap<Multiset, Vec<Composition>>;

#[cfg(test)]
mod tests {
    use super::*;

    fn neg() -> Multiset {
        Multiset::from_charge_state(ChargeState::Negative)
    }

    fn pos() -> Multiset {
        Multiset::from_charge_state(ChargeState::Positive)
    }

    #[test]
    fn test_bound_direction() {
        assert_eq!(BoundDirection::Lower.meet(BoundDirection::Lower.top(), 1.5), 1.5);
        assert_eq!(BoundDirection::Upper.meet(BoundDirection::Upper.top(), -1.5), -1.5);
        assert_eq!(BoundDirection::Lower.meet(1.0, 2.0), 1.0);
        assert_eq!(BoundDirection::Upper.meet(1.0, 2.0), 2.0);
    }

    #[test]
    fn test_inter_sidb_projection_order() {
        let o = PotentialProjectionOrder::inter_sidb(0.3, 3);
        assert_eq!(o.len(), 3);
        assert_eq!(o.bound(BoundDirection::Lower), Some(PotentialProjection::new(-0.3, pos())));
        assert_eq!(o.bound(BoundDirection::Upper), Some(PotentialProjection::new(0.3, neg())));
        assert_eq!(
            o.next_bound(BoundDirection::Upper),
            Some(PotentialProjection::new(0.0, Multiset::EMPTY))
        );

        let o = PotentialProjectionOrder::inter_sidb(0.3, 2);
        assert_eq!(o.len(), 2);
        assert_eq!(o.bound(BoundDirection::Lower).unwrap().pot_val, 0.0);
    }

    #[test]
    fn test_self_projection_is_flat() {
        let o = PotentialProjectionOrder::self_projection(-0.1, 3);
        assert_eq!(o.len(), 3);
        assert!(o.iter().all(|pp| pp.pot_val == -0.1));
        // equal potentials are ordered by multiset
        assert_eq!(o.bound(BoundDirection::Lower).unwrap().multiset, Multiset::EMPTY);
        assert_eq!(o.bound(BoundDirection::Upper).unwrap().multiset, neg());
    }

    #[test]
    fn test_m_conf_lookup_and_removal() {
        let mut o = PotentialProjectionOrder::default();
        let m = Multiset::new(2, 0);
        let m2 = Multiset::new(1, 0);
        o.add(PotentialProjection::new(0.1, m));
        o.add(PotentialProjection::new(0.5, m));
        o.add(PotentialProjection::new(0.3, m2));
        o.add(PotentialProjection::new(0.3, m2));
        assert_eq!(o.len(), 3);
        assert_eq!(o.pot_proj_for_m_conf(BoundDirection::Lower, m).unwrap().pot_val, 0.1);
        assert_eq!(o.pot_proj_for_m_conf(BoundDirection::Upper, m).unwrap().pot_val, 0.5);
        assert_eq!(o.next_bound(BoundDirection::Lower).unwrap().pot_val, 0.3);
        o.remove_m_conf(m);
        assert_eq!(o.len(), 1);
        assert_eq!(o.pot_proj_for_m_conf(BoundDirection::Lower, m), None);
        assert_eq!(o.next_bound(BoundDirection::Upper), None);
    }

    #[test]
    fn test_projection_sum() {
        let mut pp = PotentialProjection::new(0.2, neg());
        pp += PotentialProjection::new(-0.1, pos());
        assert!((pp.pot_val - 0.1).abs() < 1e-12);
        assert_eq!(pp.multiset, Multiset::new(1, 1));
    }

    #[test]
    fn test_bounds_stores() {
        let mut partial = PartialPotentialBounds::default();
        assert_eq!(partial.get(BoundDirection::Upper, 7), 0.0);
        partial.set_both(7, -1.0, 1.0);
        partial.update(BoundDirection::Lower, 7, 0.25);
        partial.set(BoundDirection::Upper, 3, 2.0);
        assert_eq!(partial.get(BoundDirection::Lower, 7), -0.75);
        assert_eq!(partial.get(BoundDirection::Lower, 3), 0.0);
        assert_eq!(partial.get(BoundDirection::Upper, 3), 2.0);

        let mut a = CompletePotentialBounds::new(2);
        let mut b = CompletePotentialBounds::new(2);
        b.set_both(1, 0.5, 1.5);
        a += &b;
        a += &b;
        a.update(0, -1.0, 1.0);
        assert_eq!(a.get(BoundDirection::Upper, 1), 3.0);
        a -= &b;
        assert_eq!(a.get(BoundDirection::Lower, 1), 0.5);
        assert_eq!(a.get(BoundDirection::Lower, 0), -1.0);
    }

    #[test]
    fn test_projector_state_counts() {
        let pst = ProjectorState::new(9, Multiset::new(2, 1));
        assert_eq!(pst.count(ChargeState::Negative, 5), 2);
        assert_eq!(pst.count(ChargeState::Positive, 5), 1);
        assert_eq!(pst.count(ChargeState::Neutral, 5), 2);
    }
}
