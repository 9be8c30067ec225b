// SPDX-FileCopyrightText: Copyright (c) 2024 NVIDIA CORPORATION & AFFILIATES. All rights reserved.
// SPDX-License-Identifier: Apache-2.0
//! ClusterComplete: exact simulation by unfolding the Ground State Space.
//!
//! Every composition of the top cluster is a starting point. A worker
//! repeatedly replaces the largest cluster in its current clustering by
//! one of that cluster's compositions, keeping per-SiDB potential bounds
//! in step. A branch is cut as soon as some projector state can no longer
//! find enough SiDBs whose bounds admit the charge states it requires.
//! Clusterings consisting only of singletons are fully determined charge
//! distributions and are checked exactly.

use crate::charge_space::{BoundDirection, CompletePotentialBounds, Composition, ProjectorState};
use crate::charge_state::ChargeState;
use crate::charge_surface::ChargeDistributionSurface;
use crate::cluster_hierarchy::LinkageMethod;
use crate::error::Result;
use crate::ground_state_space::{GroundStateSpace, GroundStateSpaceBuilder, GroundStateSpaceParams};
use crate::layout::{SidbLayout, SiqadCoord};
use crate::physics::{PopulationStabilityBounds, SimulationParameters, POP_STABILITY_ERR};
use crate::result::SimulationResult;
use indexmap::IndexMap;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::num::NonZeroUsize;
use std::sync::Mutex;
use std::time::Instant;

pub const CLUSTERCOMPLETE_NAME: &str = "clustercomplete";

/// Number of worker threads used when none is given.
pub fn default_available_threads() -> usize {
    std::thread::available_parallelism().map_or(1, NonZeroUsize::get)
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClusterCompleteParams {
    pub simulation_parameters: SimulationParameters,
    /// Externally applied potential per SiDB, in V.
    #[serde(with = "indexmap::map::serde_seq")]
    pub local_external_potential: IndexMap<SiqadCoord, f64>,
    /// Externally applied potential on every SiDB, in V.
    pub global_potential: f64,
    /// Ground State Space clusters larger than this skip witness
    /// partitioning.
    pub validity_witness_partitioning_max_cluster_size_gss: u64,
    pub num_overlapping_witnesses_limit_gss: u64,
    /// Slack on the population stability thresholds used for pruning.
    pub stability_error: f64,
    pub available_threads: usize,
    /// Log Ground State Space statistics before unfolding.
    pub report_gss_stats: bool,
    pub linkage_method: LinkageMethod,
}

impl Default for ClusterCompleteParams {
    fn default() -> Self {
        Self {
            simulation_parameters: SimulationParameters::default(),
            local_external_potential: IndexMap::new(),
            global_potential: 0.0,
            validity_witness_partitioning_max_cluster_size_gss: 6,
            num_overlapping_witnesses_limit_gss: 6,
            stability_error: POP_STABILITY_ERR,
            available_threads: default_available_threads(),
            report_gss_stats: false,
            linkage_method: LinkageMethod::default(),
        }
    }
}

impl ClusterCompleteParams {
    fn gss_params(&self) -> GroundStateSpaceParams {
        GroundStateSpaceParams {
            simulation_parameters: self.simulation_parameters,
            witness_partitioning_cluster_size_limit: self.validity_witness_partitioning_max_cluster_size_gss,
            num_overlapping_witnesses_limit: self.num_overlapping_witnesses_limit_gss,
            stability_error: self.stability_error,
            linkage_method: self.linkage_method,
        }
    }
}

/// A neutral charge layout carrying the given external potentials.
pub(crate) fn charge_layout_with_external_potentials(
    layout: &SidbLayout,
    params: SimulationParameters,
    local_external_potential: &IndexMap<SiqadCoord, f64>,
    global_potential: f64,
) -> ChargeDistributionSurface {
    let mut cds = ChargeDistributionSurface::new(layout, params, ChargeState::Neutral);
    if !local_external_potential.is_empty() {
        cds.assign_local_external_potential(local_external_potential);
    }
    if global_potential != 0.0 {
        cds.assign_global_external_potential(global_potential);
    }
    cds
}

/// Finds all physically valid charge distributions of `layout`.
pub fn clustercomplete(layout: &SidbLayout, params: &ClusterCompleteParams) -> Result<SimulationResult> {
    params.simulation_parameters.validate()?;
    let start = Instant::now();

    let mut result = SimulationResult::new(CLUSTERCOMPLETE_NAME, params.simulation_parameters);
    let extra = &mut result.additional_simulation_parameters;
    extra.insert("global_potential".into(), params.global_potential.into());
    extra.insert(
        "validity_witness_partitioning_limit".into(),
        params.validity_witness_partitioning_max_cluster_size_gss.into(),
    );
    extra.insert(
        "num_overlapping_witnesses_limit".into(),
        params.num_overlapping_witnesses_limit_gss.into(),
    );
    extra.insert("stability_error".into(), params.stability_error.into());
    extra.insert("available_threads".into(), params.available_threads.into());

    if layout.is_empty() {
        result.simulation_runtime = start.elapsed();
        return Ok(result);
    }

    let charge_layout = charge_layout_with_external_potentials(
        layout,
        params.simulation_parameters,
        &params.local_external_potential,
        params.global_potential,
    );
    let gss = GroundStateSpaceBuilder::new(&charge_layout, &params.gss_params()).run();
    if params.report_gss_stats {
        gss.report();
    }

    let top_compositions: Vec<&Composition> = gss
        .top_charge_space()
        .map(|space| space.values().flatten().collect())
        .unwrap_or_default();
    clilog::debug!(
        "unfolding {} top level compositions on {} thread(s)",
        top_compositions.len(),
        params.available_threads
    );

    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(params.available_threads.max(1))
        .build()?;
    let bounds = PopulationStabilityBounds::new(&params.simulation_parameters, params.stability_error);
    let found = Mutex::new(Vec::new());

    let timer = clilog::stimer!("clustercomplete unfolding");
    pool.install(|| {
        top_compositions.par_iter().for_each_init(
            || Unfolder::new(&gss, &charge_layout, bounds, &found),
            |unfolder, composition| unfolder.unfold_top_level(composition),
        );
    });
    clilog::finish!(timer);

    result.charge_distributions = found.into_inner().unwrap_or_else(|e| e.into_inner());
    result.simulation_runtime = start.elapsed();
    Ok(result)
}

/// The clustering a worker currently looks at, with the potential bounds
/// it implies on every SiDB.
#[derive(Debug, Clone)]
struct ClusteringState {
    proj_states: Vec<ProjectorState>,
    pot_bounds: CompletePotentialBounds,
}

/// Depth-first unfolding of one top level composition.
struct Unfolder<'a> {
    gss: &'a GroundStateSpace,
    bounds: PopulationStabilityBounds,
    state: ClusteringState,
    /// Scratch surface for the exact check at the leaves.
    cds: ChargeDistributionSurface,
    found: &'a Mutex<Vec<ChargeDistributionSurface>>,
}

impl<'a> Unfolder<'a> {
    fn new(
        gss: &'a GroundStateSpace,
        charge_layout: &ChargeDistributionSurface,
        bounds: PopulationStabilityBounds,
        found: &'a Mutex<Vec<ChargeDistributionSurface>>,
    ) -> Self {
        let n = gss.num_sidbs();
        Self {
            gss,
            bounds,
            state: ClusteringState {
                proj_states: Vec::with_capacity(n),
                pot_bounds: CompletePotentialBounds::new(n),
            },
            cds: charge_layout.clone(),
            found,
        }
    }

    /// Starts from an empty clustering so that rounding left over from a
    /// previous top level composition does not carry over.
    fn unfold_top_level(&mut self, composition: &Composition) {
        self.state.proj_states.clear();
        self.state.pot_bounds = CompletePotentialBounds::new(self.gss.num_sidbs());
        self.unfold_composition(composition);
    }

    fn unfold_composition(&mut self, composition: &Composition) {
        self.add_composition(composition);
        self.add_physically_valid_charge_configurations();
        self.remove_composition(composition);
    }

    fn add_composition(&mut self, composition: &Composition) {
        self.state.pot_bounds += &composition.pot_bounds;
        self.state.proj_states.extend_from_slice(&composition.proj_states);
    }

    fn remove_composition(&mut self, composition: &Composition) {
        let len = self.state.proj_states.len() - composition.proj_states.len();
        self.state.proj_states.truncate(len);
        self.state.pot_bounds -= &composition.pot_bounds;
    }

    fn add_physically_valid_charge_configurations(&mut self) {
        if !self.meets_population_stability_criterion() {
            return;
        }
        if self.state.proj_states.len() == self.gss.num_sidbs() {
            self.check_leaf();
            return;
        }

        let ix = self.largest_cluster_index();
        let parent = self.take_parent_out(ix);
        let gss = self.gss;
        for composition in gss.compositions(parent) {
            self.unfold_composition(composition);
        }
        self.add_parent_back(ix, parent);
    }

    /// Each projector state still finds enough SiDBs whose bounds admit
    /// each of the charge states it requires.
    fn meets_population_stability_criterion(&self) -> bool {
        let pot_bounds = &self.state.pot_bounds;
        self.state.proj_states.iter().all(|pst| {
            let cluster = self.gss.cluster(pst.cluster);
            let size = cluster.num_sidbs();
            let mut neg = pst.count(ChargeState::Negative, size);
            let mut pos = pst.count(ChargeState::Positive, size);
            let mut neut = pst.count(ChargeState::Neutral, size);
            for &sidb in &cluster.sidbs {
                let lb = pot_bounds.get(BoundDirection::Lower, sidb);
                let ub = pot_bounds.get(BoundDirection::Upper, sidb);
                if neg > 0 && !self.bounds.fail_onto_negative(lb) {
                    neg -= 1;
                }
                if pos > 0 && !self.bounds.fail_onto_positive(ub) {
                    pos -= 1;
                }
                if neut > 0 && !self.bounds.fail_onto_neutral(lb, ub) {
                    neut -= 1;
                }
            }
            neg == 0 && pos == 0 && neut == 0
        })
    }

    /// Index of the first projector state with the most SiDBs.
    fn largest_cluster_index(&self) -> usize {
        let mut best = 0;
        let mut best_size = 0;
        for (i, pst) in self.state.proj_states.iter().enumerate() {
            let size = self.gss.cluster(pst.cluster).num_sidbs();
            if size > best_size {
                best = i;
                best_size = size;
            }
        }
        best
    }

    fn take_parent_out(&mut self, ix: usize) -> ProjectorState {
        let parent = self.state.proj_states.swap_remove(ix);
        if let Some(store) = self.gss.complete_store(parent) {
            self.state.pot_bounds -= store;
        }
        parent
    }

    fn add_parent_back(&mut self, ix: usize, parent: ProjectorState) {
        if let Some(store) = self.gss.complete_store(parent) {
            self.state.pot_bounds += store;
        }
        self.state.proj_states.push(parent);
        let last = self.state.proj_states.len() - 1;
        self.state.proj_states.swap(ix, last);
    }

    fn check_leaf(&mut self) {
        for pst in &self.state.proj_states {
            let sidb = self.gss.cluster(pst.cluster).singleton_sidb();
            self.cds
                .assign_charge_state_by_index(sidb, pst.multiset.to_singleton_charge_state(), false);
        }
        self.cds.update_after_charge_change();
        if self.cds.is_physically_valid() {
            let mut found = self.found.lock().unwrap_or_else(|e| e.into_inner());
            found.push(self.cds.clone());
        }
    }
}
