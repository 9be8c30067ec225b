// SPDX-FileCopyrightText: Copyright (c) 2024 NVIDIA CORPORATION & AFFILIATES. All rights reserved.
// SPDX-License-Identifier: Apache-2.0
//! Simulation results shared by all simulation engines.

use crate::charge_surface::ChargeDistributionSurface;
use crate::layout::SiqadCoord;
use crate::physics::SimulationParameters;
use indexmap::IndexMap;
use serde::Serialize;
use std::time::Duration;

/// Charge distributions whose energies differ by less than this (eV) are
/// degenerate.
pub const ENERGY_DEGENERACY_TOLERANCE: f64 = 1e-6;

/// The physically valid charge distributions found by one simulation run.
#[derive(Debug, Clone)]
pub struct SimulationResult {
    pub algorithm_name: String,
    /// Wall-clock time of the whole run.
    pub simulation_runtime: Duration,
    pub physical_parameters: SimulationParameters,
    pub charge_distributions: Vec<ChargeDistributionSurface>,
    /// Engine specific settings, recorded for reporting.
    pub additional_simulation_parameters: IndexMap<String, serde_json::Value>,
}

impl SimulationResult {
    pub fn new(algorithm_name: &str, physical_parameters: SimulationParameters) -> Self {
        Self {
            algorithm_name: algorithm_name.to_string(),
            simulation_runtime: Duration::ZERO,
            physical_parameters,
            charge_distributions: vec![],
            additional_simulation_parameters: IndexMap::new(),
        }
    }

    /// Lowest system energy among the charge distributions.
    pub fn minimum_energy(&self) -> Option<f64> {
        self.charge_distributions
            .iter()
            .map(ChargeDistributionSurface::system_energy)
            .min_by(f64::total_cmp)
    }

    /// All charge distributions at the minimum energy.
    pub fn ground_states(&self) -> Vec<&ChargeDistributionSurface> {
        let Some(min) = self.minimum_energy() else {
            return vec![];
        };
        self.charge_distributions
            .iter()
            .filter(|cds| cds.system_energy() - min < ENERGY_DEGENERACY_TOLERANCE)
            .collect()
    }

    /// Sorted charge indices, for comparing result sets.
    pub fn charge_indices(&self) -> Vec<u64> {
        let mut ixs: Vec<u64> = self
            .charge_distributions
            .iter()
            .map(ChargeDistributionSurface::charge_index)
            .collect();
        ixs.sort_unstable();
        ixs
    }

    pub fn summary(&self) -> SimulationSummary {
        let mut charge_distributions: Vec<ChargeDistributionSummary> = self
            .charge_distributions
            .iter()
            .map(|cds| ChargeDistributionSummary {
                charges: cds.charge_string(),
                charge_index: cds.charge_index(),
                system_energy: cds.system_energy(),
            })
            .collect();
        charge_distributions.sort_by(|a, b| {
            a.system_energy
                .total_cmp(&b.system_energy)
                .then(a.charge_index.cmp(&b.charge_index))
        });
        SimulationSummary {
            algorithm_name: self.algorithm_name.clone(),
            runtime_secs: self.simulation_runtime.as_secs_f64(),
            physical_parameters: self.physical_parameters,
            cells: self
                .charge_distributions
                .first()
                .map(|cds| cds.layout().cells().collect())
                .unwrap_or_default(),
            minimum_energy: self.minimum_energy(),
            num_ground_states: self.ground_states().len(),
            charge_distributions,
            additional_simulation_parameters: self.additional_simulation_parameters.clone(),
        }
    }
}

/// One charge distribution in a [`SimulationSummary`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChargeDistributionSummary {
    /// One character per SiDB, in layout order.
    pub charges: String,
    pub charge_index: u64,
    pub system_energy: f64,
}

/// Serializable digest of a [`SimulationResult`], sorted by energy.
#[derive(Debug, Clone, Serialize)]
pub struct SimulationSummary {
    pub algorithm_name: String,
    pub runtime_secs: f64,
    pub physical_parameters: SimulationParameters,
    pub cells: Vec<SiqadCoord>,
    pub minimum_energy: Option<f64>,
    pub num_ground_states: usize,
    pub charge_distributions: Vec<ChargeDistributionSummary>,
    pub additional_simulation_parameters: IndexMap<String, serde_json::Value>,
}

impl SimulationSummary {
    /// Human readable report, one charge distribution per line.
    pub fn to_text(&self) -> String {
        let mut s = format!(
            "{}: {} physically valid charge distribution(s) in {:.4} s\n",
            self.algorithm_name,
            self.charge_distributions.len(),
            self.runtime_secs
        );
        for (k, v) in &self.additional_simulation_parameters {
            s.push_str(&format!("  {k} = {v}\n"));
        }
        for cd in &self.charge_distributions {
            s.push_str(&format!(
                "  {}  E = {:.6} eV  (index {})\n",
                cd.charges, cd.system_energy, cd.charge_index
            ));
        }
        if let Some(e) = self.minimum_energy {
            s.push_str(&format!("  ground state energy {:.6} eV, degeneracy {}\n", e, self.num_ground_states));
        }
        s
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::charge_state::ChargeState;
    use crate::layout::SidbLayout;

    fn surface(charges: &[ChargeState]) -> ChargeDistributionSurface {
        let lyt = SidbLayout::from_cells([SiqadCoord::new(0, 0, 0), SiqadCoord::new(1, 0, 0)]);
        let mut cds = ChargeDistributionSurface::new(&lyt, SimulationParameters::default(), ChargeState::Neutral);
        for (i, &cs) in charges.iter().enumerate() {
            cds.assign_charge_state_by_index(i, cs, false);
        }
        cds.update_after_charge_change();
        cds
    }

    #[test]
    fn test_empty_result() {
        let res = SimulationResult::new("ExGS", SimulationParameters::default());
        assert_eq!(res.minimum_energy(), None);
        assert!(res.ground_states().is_empty());
        let summary = res.summary();
        assert!(summary.cells.is_empty());
        assert!(summary.to_text().starts_with("ExGS: 0 physically valid"));
    }

    #[test]
    fn test_ground_states_and_indices() {
        let mut res = SimulationResult::new("ExGS", SimulationParameters::default());
        res.charge_distributions.push(surface(&[ChargeState::Negative, ChargeState::Negative]));
        res.charge_distributions.push(surface(&[ChargeState::Neutral, ChargeState::Negative]));
        res.charge_distributions.push(surface(&[ChargeState::Negative, ChargeState::Neutral]));
        assert_eq!(res.minimum_energy(), Some(0.0));
        assert_eq!(res.ground_states().len(), 2);
        assert_eq!(res.charge_indices(), vec![0, 1, 3]);

        let summary = res.summary();
        assert_eq!(summary.cells.len(), 2);
        assert_eq!(summary.num_ground_states, 2);
        assert_eq!(summary.charge_distributions.last().unwrap().charges, "--");
        let json = serde_json::to_value(&summary).unwrap();
        assert_eq!(json["algorithm_name"], "ExGS");
    }
}
