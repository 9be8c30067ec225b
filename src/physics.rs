// SPDX-FileCopyrightText: Copyright (c) 2024 NVIDIA CORPORATION & AFFILIATES. All rights reserved.
// SPDX-License-Identifier: Apache-2.0
//! Physical constants, simulation parameters and the screened Coulomb
//! interaction between SiDBs.
//!
//! Distances are in nanometers, potentials in volts and energies in
//! electronvolts throughout the crate.

use crate::error::{Result, SimulationError};
use serde::{Deserialize, Serialize};

/// Vacuum permittivity in F/m.
pub const EPSILON_0: f64 = 8.8541878128e-12;

/// Elementary charge in C.
pub const ELEMENTARY_CHARGE: f64 = 1.602176634e-19;

/// Coulomb constant in N m^2 / C^2.
pub const K_E: f64 = 1.0 / (4.0 * std::f64::consts::PI * EPSILON_0);

/// Numeric slack used by every population and configuration stability
/// comparison.
pub const POP_STABILITY_ERR: f64 = 1e-6;

/// Offset between the (0/-) and (+/0) charge transition levels in eV.
const TRANSITION_LEVEL_GAP: f64 = 0.59;

/// Physical parameters of an SiDB simulation.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SimulationParameters {
    /// Number of charge states considered: 2 for {-, 0}, 3 for {-, 0, +}.
    pub base: u8,
    /// Energy transition level (0/-) in eV.
    pub mu_minus: f64,
    /// Relative permittivity of the substrate.
    pub epsilon_r: f64,
    /// Thomas-Fermi screening length in nm.
    pub lambda_tf: f64,
}

impl Default for SimulationParameters {
    fn default() -> Self {
        Self {
            base: 3,
            mu_minus: -0.32,
            epsilon_r: 5.6,
            lambda_tf: 5.0,
        }
    }
}

impl SimulationParameters {
    /// Parameters with the given base and (0/-) level, default screening.
    pub fn new(base: u8, mu_minus: f64) -> Self {
        Self {
            base,
            mu_minus,
            ..Self::default()
        }
    }

    /// Energy transition level (+/0) in eV.
    #[inline]
    pub fn mu_plus(&self) -> f64 {
        self.mu_minus - TRANSITION_LEVEL_GAP
    }

    /// Coulomb constant scaled by the relative permittivity.
    #[inline]
    pub fn k(&self) -> f64 {
        K_E / self.epsilon_r
    }

    pub fn validate(&self) -> Result<()> {
        if self.base != 2 && self.base != 3 {
            return Err(SimulationError::InvalidBase(self.base));
        }
        if !(self.epsilon_r > 0.0) {
            return Err(SimulationError::NonPositivePermittivity(self.epsilon_r));
        }
        if !(self.lambda_tf > 0.0) {
            return Err(SimulationError::NonPositiveScreeningLength(
                self.lambda_tf,
            ));
        }
        Ok(())
    }
}

/// Lattice constants of a silicon surface in angstrom.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LatticeConstants {
    /// Dimer pitch along x.
    pub a: f64,
    /// Dimer row pitch along y.
    pub b: f64,
    /// Offset between the two atoms of a dimer along y.
    pub c: f64,
}

/// H-Si(100)-2x1.
pub const SI_100: LatticeConstants = LatticeConstants {
    a: 3.84,
    b: 7.68,
    c: 2.25,
};

/// Euclidean distance between two nanometer positions.
#[inline]
pub fn nm_distance(p: (f64, f64), q: (f64, f64)) -> f64 {
    (p.0 - q.0).hypot(p.1 - q.1)
}

/// Screened Coulomb potential (V) that a single elementary charge at
/// distance `d_nm` induces. Zero at distance zero.
pub fn chargeless_potential(d_nm: f64, params: &SimulationParameters) -> f64 {
    if d_nm == 0.0 {
        return 0.0;
    }
    params.k() / (d_nm * 1e-9) * (-d_nm / params.lambda_tf).exp() * ELEMENTARY_CHARGE
}

/// The thresholds that section the band gap, widened by a tolerance.
///
/// The predicates act on the *negated* local potential, i.e. the sum of
/// `V_ij` over negative neighbours minus the sum over positive ones.
/// Each returns `true` when the given bound proves that the charge state
/// cannot be population stable.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PopulationStabilityBounds {
    bounds: [f64; 4],
}

impl PopulationStabilityBounds {
    pub fn new(params: &SimulationParameters, err: f64) -> Self {
        Self {
            bounds: [
                err - params.mu_minus,
                -err - params.mu_minus,
                err - params.mu_plus(),
                -err - params.mu_plus(),
            ],
        }
    }

    /// `lb > e - mu-`: no SiDB- possible.
    #[inline]
    pub fn fail_onto_negative(&self, lb: f64) -> bool {
        lb > self.bounds[0]
    }

    /// `ub < -e - mu+`: no SiDB+ possible.
    #[inline]
    pub fn fail_onto_positive(&self, ub: f64) -> bool {
        ub < self.bounds[3]
    }

    /// `ub < -e - mu-`: no SiDB0 possible.
    #[inline]
    pub fn ub_fail_onto_neutral(&self, ub: f64) -> bool {
        ub < self.bounds[1]
    }

    /// `lb > e - mu+`: no SiDB0 possible.
    #[inline]
    pub fn lb_fail_onto_neutral(&self, lb: f64) -> bool {
        lb > self.bounds[2]
    }

    #[inline]
    pub fn fail_onto_neutral(&self, lb: f64, ub: f64) -> bool {
        self.ub_fail_onto_neutral(ub) || self.lb_fail_onto_neutral(lb)
    }
}
