// SPDX-FileCopyrightText: Copyright (c) 2024 NVIDIA CORPORATION & AFFILIATES. All rights reserved.
// SPDX-License-Identifier: Apache-2.0
//! Exhaustive ground state search, the reference the pruning engines are
//! checked against.

use crate::clustercomplete::charge_layout_with_external_potentials;
use crate::error::{Result, SimulationError};
use crate::layout::{SidbLayout, SiqadCoord};
use crate::physics::SimulationParameters;
use crate::result::SimulationResult;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::time::Instant;

pub const EXHAUSTIVE_NAME: &str = "ExGS";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExhaustiveParams {
    pub simulation_parameters: SimulationParameters,
    #[serde(with = "indexmap::map::serde_seq")]
    pub local_external_potential: IndexMap<SiqadCoord, f64>,
    pub global_potential: f64,
    /// Layouts with more charge configurations than this are refused.
    pub max_configurations: u64,
}

impl Default for ExhaustiveParams {
    fn default() -> Self {
        Self {
            simulation_parameters: SimulationParameters::default(),
            local_external_potential: IndexMap::new(),
            global_potential: 0.0,
            max_configurations: 1 << 24,
        }
    }
}

/// Visits every charge configuration of `layout` and keeps the physically
/// valid ones.
pub fn exhaustive_ground_state_simulation(
    layout: &SidbLayout,
    params: &ExhaustiveParams,
) -> Result<SimulationResult> {
    params.simulation_parameters.validate()?;
    let start = Instant::now();
    let mut result = SimulationResult::new(EXHAUSTIVE_NAME, params.simulation_parameters);
    result
        .additional_simulation_parameters
        .insert("global_potential".into(), params.global_potential.into());
    if layout.is_empty() {
        result.simulation_runtime = start.elapsed();
        return Ok(result);
    }

    let mut cds = charge_layout_with_external_potentials(
        layout,
        params.simulation_parameters,
        &params.local_external_potential,
        params.global_potential,
    );
    let too_large = || SimulationError::ConfigurationSpaceTooLarge {
        num_sidbs: layout.num_cells(),
        base: params.simulation_parameters.base,
        limit: params.max_configurations,
    };
    let max_index = cds.max_charge_index().ok_or_else(too_large)?;
    if max_index >= params.max_configurations {
        return Err(too_large());
    }

    let timer = clilog::stimer!("exhaustive enumeration");
    for index in 0..=max_index {
        cds.assign_charge_index(index);
        cds.update_after_charge_change();
        if cds.is_physically_valid() {
            result.charge_distributions.push(cds.clone());
        }
    }
    clilog::finish!(timer);

    result.simulation_runtime = start.elapsed();
    Ok(result)
}
