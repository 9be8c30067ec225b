// SPDX-FileCopyrightText: Copyright (c) 2024 NVIDIA CORPORATION & AFFILIATES. All rights reserved.
// SPDX-License-Identifier: Apache-2.0
//! Charge distribution surface: a charge assignment on top of a layout,
//! with local potentials, system energy and the physical validity
//! predicates.
//!
//! Distances and chargeless potentials depend only on the layout and the
//! physical parameters, so they live in a shared [`SurfaceGeometry`]. A
//! copy of a surface clones the per-SiDB vectors only, which keeps the
//! copies made by simulation workers cheap.

use crate::charge_state::ChargeState;
use crate::layout::{SidbLayout, SiqadCoord};
use crate::physics::{chargeless_potential, nm_distance, SimulationParameters, POP_STABILITY_ERR};
use std::sync::Arc;

/// Immutable pairwise data of a layout under fixed physical parameters.
#[derive(Debug)]
pub struct SurfaceGeometry {
    layout: SidbLayout,
    params: SimulationParameters,
    num_sidbs: usize,
    /// Row-major `n x n` distances in nm.
    nm_dist: Vec<f64>,
    /// Row-major `n x n` chargeless potentials in V.
    pot_mat: Vec<f64>,
}

impl SurfaceGeometry {
    fn new(layout: SidbLayout, params: SimulationParameters) -> Self {
        let positions = layout.nm_positions();
        let n = positions.len();
        let mut nm_dist = vec![0.0; n * n];
        let mut pot_mat = vec![0.0; n * n];
        for i in 0..n {
            for j in 0..n {
                let d = nm_distance(positions[i], positions[j]);
                nm_dist[i * n + j] = d;
                pot_mat[i * n + j] = chargeless_potential(d, &params);
            }
        }
        Self {
            layout,
            params,
            num_sidbs: n,
            nm_dist,
            pot_mat,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ChargeDistributionSurface {
    geometry: Arc<SurfaceGeometry>,
    charges: Vec<ChargeState>,
    /// Externally applied potential per SiDB, excluding the global part.
    local_external_pot: Vec<f64>,
    global_external_pot: f64,
    /// Local potential per SiDB: induced by all other SiDBs plus external.
    local_pot: Vec<f64>,
    system_energy: f64,
    validity: bool,
}

impl ChargeDistributionSurface {
    /// Lays a surface over `layout` with every SiDB in state `cs`.
    pub fn new(layout: &SidbLayout, params: SimulationParameters, cs: ChargeState) -> Self {
        let n = layout.num_cells();
        let mut cds = Self {
            geometry: Arc::new(SurfaceGeometry::new(layout.clone(), params)),
            charges: vec![cs; n],
            local_external_pot: vec![0.0; n],
            global_external_pot: 0.0,
            local_pot: vec![0.0; n],
            system_energy: 0.0,
            validity: false,
        };
        cds.update_after_charge_change();
        cds
    }

    #[inline]
    pub fn num_cells(&self) -> usize {
        self.geometry.num_sidbs
    }

    pub fn layout(&self) -> &SidbLayout {
        &self.geometry.layout
    }

    pub fn phys_params(&self) -> &SimulationParameters {
        &self.geometry.params
    }

    /// Replaces the physical parameters. Pairwise potentials are
    /// recomputed and the surface is re-evaluated.
    pub fn assign_physical_parameters(&mut self, params: SimulationParameters) {
        if self.geometry.params == params {
            return;
        }
        self.geometry = Arc::new(SurfaceGeometry::new(self.geometry.layout.clone(), params));
        self.update_after_charge_change();
    }

    // ── charge states ────────────────────────────────────────────────────

    /// Assigns a charge state to SiDB `ix`. With `update` set, potentials,
    /// energy and validity are refreshed right away.
    pub fn assign_charge_state_by_index(&mut self, ix: usize, cs: ChargeState, update: bool) {
        self.charges[ix] = cs;
        if update {
            self.update_after_charge_change();
        }
    }

    /// Assigns a charge state by cell. Cells without an SiDB are ignored.
    pub fn assign_charge_state(&mut self, c: &SiqadCoord, cs: ChargeState, update: bool) -> bool {
        match self.geometry.layout.index_of(c) {
            Some(ix) => {
                self.assign_charge_state_by_index(ix, cs, update);
                true
            }
            None => false,
        }
    }

    pub fn assign_all_charge_states(&mut self, cs: ChargeState) {
        self.charges.fill(cs);
    }

    #[inline]
    pub fn charge_state_by_index(&self, ix: usize) -> ChargeState {
        self.charges[ix]
    }

    pub fn charge_state(&self, c: &SiqadCoord) -> Option<ChargeState> {
        self.geometry.layout.index_of(c).map(|ix| self.charges[ix])
    }

    pub fn charge_states(&self) -> &[ChargeState] {
        &self.charges
    }

    pub fn charge_exists(&self, cs: ChargeState) -> bool {
        self.charges.contains(&cs)
    }

    /// Charge states as a compact string, e.g. `-0-`.
    pub fn charge_string(&self) -> String {
        self.charges.iter().map(|cs| cs.to_string()).collect()
    }

    // ── pairwise quantities ──────────────────────────────────────────────

    #[inline]
    pub fn nm_distance_by_indices(&self, i: usize, j: usize) -> f64 {
        self.geometry.nm_dist[i * self.geometry.num_sidbs + j]
    }

    /// Potential a unit charge at `j` induces at `i`.
    #[inline]
    pub fn chargeless_potential_by_indices(&self, i: usize, j: usize) -> f64 {
        self.geometry.pot_mat[i * self.geometry.num_sidbs + j]
    }

    /// Potential the current charge of `j` induces at `i`.
    #[inline]
    pub fn potential_by_indices(&self, i: usize, j: usize) -> f64 {
        self.chargeless_potential_by_indices(i, j) * self.charges[j].sign_or_zero() as f64
    }

    // ── external potentials ──────────────────────────────────────────────

    /// Sets externally applied potentials per cell, replacing previous
    /// ones. Cells without an SiDB are skipped.
    pub fn assign_local_external_potential<'a>(
        &mut self,
        potentials: impl IntoIterator<Item = (&'a SiqadCoord, &'a f64)>,
    ) {
        self.local_external_pot.fill(0.0);
        for (c, &v) in potentials {
            match self.geometry.layout.index_of(c) {
                Some(ix) => self.local_external_pot[ix] = v,
                None => clilog::warn!("no SiDB at {} for external potential, ignored", c),
            }
        }
        self.update_after_charge_change();
    }

    /// Applies the same potential to every SiDB, replacing a previously
    /// assigned global potential.
    pub fn assign_global_external_potential(&mut self, v: f64) {
        self.global_external_pot = v;
        self.update_after_charge_change();
    }

    pub fn global_external_potential(&self) -> f64 {
        self.global_external_pot
    }

    /// Total external potential at SiDB `ix`.
    #[inline]
    pub fn local_external_potential(&self, ix: usize) -> f64 {
        self.local_external_pot[ix] + self.global_external_pot
    }

    // ── local potential and energy ───────────────────────────────────────

    pub fn update_local_potential(&mut self) {
        let n = self.num_cells();
        for i in 0..n {
            let row = &self.geometry.pot_mat[i * n..(i + 1) * n];
            let induced: f64 = row
                .iter()
                .zip(&self.charges)
                .map(|(v, cs)| v * cs.sign_or_zero() as f64)
                .sum();
            self.local_pot[i] = induced + self.local_external_potential(i);
        }
    }

    pub fn local_potential_by_index(&self, ix: usize) -> Option<f64> {
        self.local_pot.get(ix).copied()
    }

    pub fn local_potential(&self, c: &SiqadCoord) -> Option<f64> {
        self.geometry
            .layout
            .index_of(c)
            .and_then(|ix| self.local_potential_by_index(ix))
    }

    /// Electrostatic energy in eV. SiDB pairs are counted once; external
    /// potentials contribute `q * V`.
    pub fn recompute_system_energy(&mut self) {
        let mut energy = 0.0;
        for (i, cs) in self.charges.iter().enumerate() {
            let q = cs.sign_or_zero() as f64;
            if q == 0.0 {
                continue;
            }
            let ext = self.local_external_potential(i);
            energy += 0.5 * (self.local_pot[i] - ext) * q + ext * q;
        }
        self.system_energy = energy;
    }

    pub fn system_energy(&self) -> f64 {
        self.system_energy
    }

    // ── validity ─────────────────────────────────────────────────────────

    /// Every SiDB's charge state agrees with its local potential.
    pub fn is_population_stable(&self) -> bool {
        let mu_minus = self.geometry.params.mu_minus;
        let mu_plus = self.geometry.params.mu_plus();
        self.charges.iter().zip(&self.local_pot).all(|(cs, v)| match cs {
            ChargeState::Negative => -v + mu_minus < POP_STABILITY_ERR,
            ChargeState::Positive => -v + mu_plus > -POP_STABILITY_ERR,
            ChargeState::Neutral => {
                -v + mu_minus > -POP_STABILITY_ERR && -v + mu_plus < POP_STABILITY_ERR
            }
            ChargeState::None => false,
        })
    }

    /// No single electron hop lowers the system energy.
    pub fn is_configuration_stable(&self) -> bool {
        let n = self.num_cells();
        for i in 0..n {
            let si = self.charges[i].sign_or_zero();
            if si == 1 {
                continue;
            }
            let dn_i = if si == -1 { 1.0 } else { -1.0 };
            let dn_j = -dn_i;
            for j in 0..n {
                if self.charges[j].sign_or_zero() <= si {
                    continue;
                }
                let e_del = self.local_pot[i] * dn_i + self.local_pot[j] * dn_j
                    - self.chargeless_potential_by_indices(i, j);
                if e_del < -POP_STABILITY_ERR {
                    return false;
                }
            }
        }
        true
    }

    pub fn validity_check(&mut self) {
        self.validity =
            self.num_cells() > 0 && self.is_population_stable() && self.is_configuration_stable();
    }

    pub fn is_physically_valid(&self) -> bool {
        self.validity
    }

    /// Refreshes local potentials, energy and validity.
    pub fn update_after_charge_change(&mut self) {
        self.update_local_potential();
        self.recompute_system_energy();
        self.validity_check();
    }

    // ── charge index ─────────────────────────────────────────────────────

    /// Base-`b` index of the charge configuration: digit `sign + 1` per
    /// SiDB, SiDB 0 most significant.
    pub fn charge_index(&self) -> u64 {
        let base = self.geometry.params.base as u64;
        self.charges
            .iter()
            .fold(0u64, |acc, cs| acc * base + (cs.sign_or_zero() + 1) as u64)
    }

    /// The largest charge index, `None` if `base^n` does not fit in 64 bits.
    pub fn max_charge_index(&self) -> Option<u64> {
        (self.geometry.params.base as u64)
            .checked_pow(self.num_cells() as u32)
            .map(|m| m - 1)
    }

    /// Sets the charge configuration from an index without refreshing
    /// potentials.
    pub fn assign_charge_index(&mut self, mut index: u64) {
        let base = self.geometry.params.base as u64;
        for cs in self.charges.iter_mut().rev() {
            let digit = (index % base) as i8;
            index /= base;
            *cs = ChargeState::try_from(digit - 1).unwrap_or(ChargeState::None);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::physics::SimulationParameters;

    fn layout(cells: &[(i64, i64, u8)]) -> SidbLayout {
        SidbLayout::from_cells(cells.iter().map(|&c| SiqadCoord::from(c)))
    }

    #[test]
    fn test_single_sidb_is_negative() {
        let lyt = layout(&[(0, 0, 0)]);
        let mut cds = ChargeDistributionSurface::new(&lyt, SimulationParameters::new(2, -0.32), ChargeState::Negative);
        assert!(cds.is_physically_valid());
        assert_eq!(cds.local_potential_by_index(0), Some(0.0));
        cds.assign_charge_state_by_index(0, ChargeState::Neutral, true);
        assert!(!cds.is_physically_valid());
        assert_eq!(cds.system_energy(), 0.0);
    }

    #[test]
    fn test_pair_potential_and_energy() {
        let lyt = layout(&[(0, 0, 0), (10, 0, 0)]);
        let params = SimulationParameters::default();
        let cds = ChargeDistributionSurface::new(&lyt, params, ChargeState::Negative);
        let d = cds.nm_distance_by_indices(0, 1);
        assert!((d - 3.84).abs() < 1e-9);
        let v = chargeless_potential(d, &params);
        assert!((cds.chargeless_potential_by_indices(1, 0) - v).abs() < 1e-12);
        assert!((cds.potential_by_indices(0, 1) + v).abs() < 1e-12);
        assert!((cds.local_potential_by_index(0).unwrap() + v).abs() < 1e-12);
        assert!((cds.system_energy() - v).abs() < 1e-12);
        // far enough apart for both to stay negative
        assert!(cds.is_physically_valid());
    }

    #[test]
    fn test_close_pair_cannot_hold_two_electrons() {
        let lyt = layout(&[(0, 0, 0), (0, 0, 1)]);
        let mut cds =
            ChargeDistributionSurface::new(&lyt, SimulationParameters::default(), ChargeState::Negative);
        assert!(!cds.is_population_stable());
        assert!(!cds.is_physically_valid());
        // the electron-depleted partner turns positive
        cds.assign_charge_state_by_index(1, ChargeState::Positive, true);
        assert!(cds.is_physically_valid());
    }

    #[test]
    fn test_configuration_stability_detects_hop() {
        let lyt = layout(&[(0, 0, 0), (1, 0, 0)]);
        let mut cds =
            ChargeDistributionSurface::new(&lyt, SimulationParameters::new(2, -0.32), ChargeState::Neutral);
        cds.assign_charge_state_by_index(0, ChargeState::Negative, true);
        // symmetric pair: hopping over costs nothing
        assert!(cds.is_physically_valid());

        let ext = [(SiqadCoord::new(0, 0, 0), -0.05)];
        cds.assign_local_external_potential(ext.iter().map(|(c, v)| (c, v)));
        assert!(cds.is_population_stable());
        assert!(!cds.is_configuration_stable());
        assert!(!cds.is_physically_valid());
    }

    #[test]
    fn test_charge_index_round_trip() {
        let lyt = layout(&[(0, 0, 0), (5, 0, 0), (10, 0, 0)]);
        let mut cds = ChargeDistributionSurface::new(&lyt, SimulationParameters::default(), ChargeState::Negative);
        assert_eq!(cds.charge_index(), 0);
        assert_eq!(cds.max_charge_index(), Some(26));
        cds.assign_charge_index(5);
        // 5 = 0*9 + 1*3 + 2 -> (-, 0, +)
        assert_eq!(
            cds.charge_states(),
            &[ChargeState::Negative, ChargeState::Neutral, ChargeState::Positive]
        );
        assert_eq!(cds.charge_index(), 5);
        assert_eq!(cds.charge_string(), "-0+");
    }

    #[test]
    fn test_external_potential() {
        let lyt = layout(&[(0, 0, 0), (10, 0, 0)]);
        let mut cds =
            ChargeDistributionSurface::new(&lyt, SimulationParameters::new(2, -0.32), ChargeState::Neutral);
        cds.assign_global_external_potential(-0.5);
        assert!((cds.local_potential_by_index(1).unwrap() + 0.5).abs() < 1e-12);
        // a strongly negative potential empties both SiDBs
        assert!(cds.is_physically_valid());
        let ext = [(SiqadCoord::new(0, 0, 0), 0.2)];
        cds.assign_local_external_potential(ext.iter().map(|(c, v)| (c, v)));
        assert!((cds.local_external_potential(0) + 0.3).abs() < 1e-12);
        assert!((cds.local_external_potential(1) + 0.5).abs() < 1e-12);
    }

    #[test]
    fn test_parameter_change_recomputes_potentials() {
        let lyt = layout(&[(0, 0, 0), (3, 0, 0)]);
        let mut cds = ChargeDistributionSurface::new(&lyt, SimulationParameters::default(), ChargeState::Negative);
        let before = cds.chargeless_potential_by_indices(0, 1);
        cds.assign_physical_parameters(SimulationParameters {
            epsilon_r: 11.2,
            ..Default::default()
        });
        let after = cds.chargeless_potential_by_indices(0, 1);
        assert!((before / after - 2.0).abs() < 1e-9);
    }
}
