// SPDX-FileCopyrightText: Copyright (c) 2024 NVIDIA CORPORATION & AFFILIATES. All rights reserved.
// SPDX-License-Identifier: Apache-2.0
//! Ground State Space construction.
//!
//! Walks the cluster hierarchy bottom-up and computes, for every cluster,
//! the multiset charge configurations that survive potential bound
//! analysis together with the compositions realising them.
//!
//! ```text
//!   singletons ──► prune to fixpoint ──► merge smallest parent ──┐
//!        ▲                                                       │
//!        └──────────────── until only the top cluster ◄──────────┘
//! ```
//!
//! Per cluster the builder keeps received external potential bounds and
//! the potential projections onto every SiDB outside the current merge
//! context. Removing a multiset from a charge space shrinks the
//! projections, which tightens the received bounds of all other clusters,
//! which may remove further multisets. Construction is single-threaded;
//! the finished [`GroundStateSpace`] is read-only and shared by the
//! parallel unfolding stages.

use crate::charge_space::{
    BoundDirection, ChargeSpace, CompletePotentialBounds, Composition, PartialPotentialBounds,
    PotentialProjection, PotentialProjectionOrder, ProjectorState,
};
use crate::charge_state::{ChargeState, Multiset};
use crate::charge_surface::ChargeDistributionSurface;
use crate::cluster_hierarchy::{ClusterId, ClusterTree, LinkageMethod, SidbCluster};
use crate::error::Result;
use crate::layout::SidbLayout;
use crate::physics::{PopulationStabilityBounds, SimulationParameters, POP_STABILITY_ERR};
use serde::{Deserialize, Serialize};
use smallvec::SmallVec;
use std::collections::{BTreeSet, HashMap};
use std::time::{Duration, Instant};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GroundStateSpaceParams {
    pub simulation_parameters: SimulationParameters,
    /// Clusters larger than this skip witness partitioning.
    pub witness_partitioning_cluster_size_limit: u64,
    /// Witness partitioning is skipped when more witnesses than this
    /// compete for different charge states.
    pub num_overlapping_witnesses_limit: u64,
    /// Slack on every population stability threshold.
    pub stability_error: f64,
    pub linkage_method: LinkageMethod,
}

impl Default for GroundStateSpaceParams {
    fn default() -> Self {
        Self {
            simulation_parameters: SimulationParameters::default(),
            witness_partitioning_cluster_size_limit: 12,
            num_overlapping_witnesses_limit: 6,
            stability_error: POP_STABILITY_ERR,
            linkage_method: LinkageMethod::default(),
        }
    }
}

/// Maximum number of multisets the top cluster of `num_sidbs` SiDBs can
/// have.
pub fn maximum_top_level_multisets(num_sidbs: u64, base: u8) -> u64 {
    if base == 3 {
        (num_sidbs + 1) * (num_sidbs + 2) / 2
    } else {
        num_sidbs + 1
    }
}

/// Runs Ground State Space construction on a neutral layout without
/// external potentials.
pub fn ground_state_space(layout: &SidbLayout, params: &GroundStateSpaceParams) -> Result<GroundStateSpace> {
    params.simulation_parameters.validate()?;
    let cds = ChargeDistributionSurface::new(layout, params.simulation_parameters, ChargeState::Neutral);
    Ok(GroundStateSpaceBuilder::new(&cds, params).run())
}

// ── builder ──────────────────────────────────────────────────────────────────

/// Mutable per-cluster state, owned by the builder.
#[derive(Debug, Clone, Default)]
struct ClusterRecord {
    received_ext_pot_bounds: PartialPotentialBounds,
    pot_projs: HashMap<usize, PotentialProjectionOrder>,
    pot_projs_complete_store: HashMap<Multiset, CompletePotentialBounds>,
    charge_space: ChargeSpace,
}

#[derive(Debug, Clone, Copy)]
enum AnalysisMode<'a> {
    /// Check a multiset of a cluster in the current clustering.
    Multiset,
    /// Check a child projector state within a candidate composition.
    Composition(&'a CompletePotentialBounds),
}

/// Witnesses found for the charge states a projector state requires.
#[derive(Debug, Default)]
struct WitnessPartitioning {
    negative: Vec<usize>,
    positive: Vec<usize>,
    neutral: Vec<usize>,
    required_neg: u64,
    required_pos: u64,
    required_neut: u64,
}

impl WitnessPartitioning {
    fn new(pst: ProjectorState, cluster_size: usize) -> Self {
        Self {
            required_neg: pst.count(ChargeState::Negative, cluster_size),
            required_pos: pst.count(ChargeState::Positive, cluster_size),
            required_neut: pst.count(ChargeState::Neutral, cluster_size),
            ..Default::default()
        }
    }

    fn has_enough_witnesses(&self) -> bool {
        self.negative.len() as u64 >= self.required_neg
            && self.positive.len() as u64 >= self.required_pos
            && self.neutral.len() as u64 >= self.required_neut
    }

    /// Drops witnesses that witness a single charge state only, lowering
    /// the matching requirement. Returns the number of witnesses left.
    fn omit_free_witnesses_and_count_overlap(&mut self) -> usize {
        fn omit(set: &mut Vec<usize>, required: &mut u64, a: &[usize], b: &[usize]) {
            set.retain(|w| {
                let free = !a.contains(w) && !b.contains(w);
                if free {
                    *required = required.saturating_sub(1);
                }
                !free
            });
        }
        omit(&mut self.negative, &mut self.required_neg, &self.positive, &self.neutral);
        omit(&mut self.positive, &mut self.required_pos, &self.negative, &self.neutral);
        omit(&mut self.neutral, &mut self.required_neut, &self.negative, &self.positive);

        let overlap: BTreeSet<usize> = self
            .negative
            .iter()
            .chain(&self.positive)
            .chain(&self.neutral)
            .copied()
            .collect();
        overlap.len()
    }

    /// Searches an assignment of distinct witnesses: negative ones first,
    /// then positive ones, then enough neutral ones among the rest.
    fn has_valid_partitioning(&self) -> bool {
        let mut taken = Vec::with_capacity((self.required_neg + self.required_pos) as usize);
        self.fill(ChargeState::Negative, 0, self.required_neg, &mut taken)
    }

    fn fill(&self, cs: ChargeState, start: usize, remaining: u64, taken: &mut Vec<usize>) -> bool {
        let witnesses = match cs {
            ChargeState::Negative if remaining == 0 => {
                return self.fill(ChargeState::Positive, 0, self.required_pos, taken)
            }
            ChargeState::Positive if remaining == 0 => {
                return self.fill(ChargeState::Neutral, 0, self.required_neut, taken)
            }
            ChargeState::Negative => &self.negative,
            ChargeState::Positive => &self.positive,
            ChargeState::Neutral | ChargeState::None => {
                let free = self.neutral.iter().filter(|w| !taken.contains(w)).count();
                return free as u64 >= remaining;
            }
        };
        for k in start..witnesses.len() {
            if ((witnesses.len() - k) as u64) < remaining {
                break;
            }
            let w = witnesses[k];
            if taken.contains(&w) {
                continue;
            }
            taken.push(w);
            if self.fill(cs, k + 1, remaining - 1, taken) {
                return true;
            }
            taken.pop();
        }
        false
    }
}

/// Owns the cluster records while the ground state space is built.
pub struct GroundStateSpaceBuilder {
    params: GroundStateSpaceParams,
    tree: ClusterTree,
    records: Vec<ClusterRecord>,
    /// The current frontier of the bottom-up traversal.
    clustering: BTreeSet<ClusterId>,
    bounds: PopulationStabilityBounds,
    num_sidbs: usize,
    projector_state_count: u64,
    terminate: bool,
}

impl GroundStateSpaceBuilder {
    /// Sets up singleton charge spaces for the layout of `cds`. External
    /// potentials assigned to `cds` are taken into account; its charges
    /// are not.
    pub fn new(cds: &ChargeDistributionSurface, params: &GroundStateSpaceParams) -> Self {
        let mut cds = cds.clone();
        cds.assign_physical_parameters(params.simulation_parameters);
        let tree = ClusterTree::build(cds.layout(), params.linkage_method);
        let mut builder = Self {
            params: params.clone(),
            records: vec![ClusterRecord::default(); tree.len()],
            tree,
            clustering: BTreeSet::new(),
            bounds: PopulationStabilityBounds::new(&params.simulation_parameters, params.stability_error),
            num_sidbs: cds.num_cells(),
            projector_state_count: 0,
            terminate: cds.num_cells() == 0,
        };
        builder.initialize_singletons(&cds);
        builder
    }

    fn initialize_singletons(&mut self, cds: &ChargeDistributionSurface) {
        let base = self.params.simulation_parameters.base;
        let mut cds_min = cds.clone();
        let mut cds_max = cds.clone();
        cds_min.assign_all_charge_states(if base == 3 {
            ChargeState::Positive
        } else {
            ChargeState::Neutral
        });
        cds_max.assign_all_charge_states(ChargeState::Negative);
        cds_min.update_after_charge_change();
        cds_max.update_after_charge_change();

        let n = self.num_sidbs;
        for i in self.tree.singletons() {
            // potential from SiDBs only, external sources enter the self projection
            let loc_ext_pot = cds.local_external_potential(i);
            let min_loc_pot = cds_min.local_potential_by_index(i).unwrap_or(0.0) - loc_ext_pot;
            let max_loc_pot = cds_max.local_potential_by_index(i).unwrap_or(0.0) - loc_ext_pot;

            let rec = &mut self.records[i];
            rec.received_ext_pot_bounds.set_both(i, -min_loc_pot, -max_loc_pot);
            for &cs in ChargeState::for_base(base) {
                let m = Multiset::from_charge_state(cs);
                let mut pot_bounds = CompletePotentialBounds::new(n);
                pot_bounds.set_both(i, -loc_ext_pot, -loc_ext_pot);
                rec.charge_space.insert(
                    m,
                    vec![Composition {
                        proj_states: SmallVec::from_slice(&[ProjectorState::new(i, m)]),
                        pot_bounds,
                    }],
                );
            }
            rec.pot_projs
                .insert(i, PotentialProjectionOrder::self_projection(-loc_ext_pot, base));
            for j in (0..n).filter(|&j| j != i) {
                rec.pot_projs.insert(
                    j,
                    PotentialProjectionOrder::inter_sidb(cds.chargeless_potential_by_indices(i, j), base),
                );
            }
            self.clustering.insert(i);
        }
    }

    /// Prunes and merges until the top cluster is reached, then freezes the
    /// result.
    pub fn run(mut self) -> GroundStateSpace {
        let timer = clilog::stimer!("ground state space");
        let start = Instant::now();
        while !self.terminate {
            while !self.update_charge_spaces(None) {}
            self.move_up_hierarchy();
        }
        let runtime = start.elapsed();
        clilog::finish!(timer);
        self.finalize(runtime)
    }

    fn finalize(self, runtime: Duration) -> GroundStateSpace {
        let base = self.params.simulation_parameters.base;
        GroundStateSpace {
            maximum_top_level_multisets: maximum_top_level_multisets(self.num_sidbs as u64, base),
            projector_state_count: self.projector_state_count,
            num_sidbs: self.num_sidbs,
            runtime,
            clusters: self
                .records
                .into_iter()
                .map(|r| ClusterChargeData {
                    charge_space: r.charge_space,
                    pot_projs_complete_store: r.pot_projs_complete_store,
                })
                .collect(),
            tree: self.tree,
        }
    }

    // ── projections ──────────────────────────────────────────────────────

    /// Current bound of everything cluster `c` may project onto `sidb_ix`.
    fn projection_bound(&self, c: ClusterId, sidb_ix: usize, bound: BoundDirection) -> f64 {
        self.records[c]
            .pot_projs
            .get(&sidb_ix)
            .and_then(|o| o.bound(bound))
            .map_or(0.0, |pp| pp.pot_val)
    }

    /// What `pst` projects onto `sidb_ix`, bounded in direction `bound`.
    fn projector_state_bound(&self, pst: ProjectorState, sidb_ix: usize, bound: BoundDirection) -> PotentialProjection {
        self.records[pst.cluster]
            .pot_projs
            .get(&sidb_ix)
            .and_then(|o| o.pot_proj_for_m_conf(bound, pst.multiset).or_else(|| o.bound(bound)))
            .unwrap_or_default()
    }

    // ── pruning ──────────────────────────────────────────────────────────

    fn received_potential_bounds(&self, pst: ProjectorState, sidb_ix: usize, mode: AnalysisMode<'_>) -> (f64, f64) {
        match mode {
            AnalysisMode::Multiset => {
                let recv = &self.records[pst.cluster].received_ext_pot_bounds;
                (
                    self.projector_state_bound(pst, sidb_ix, BoundDirection::Lower).pot_val
                        + recv.get(BoundDirection::Lower, sidb_ix),
                    self.projector_state_bound(pst, sidb_ix, BoundDirection::Upper).pot_val
                        + recv.get(BoundDirection::Upper, sidb_ix),
                )
            }
            AnalysisMode::Composition(store) => {
                let parent = self.tree.cluster(pst.cluster).parent.unwrap_or(pst.cluster);
                let recv = &self.records[parent].received_ext_pot_bounds;
                (
                    store.get(BoundDirection::Lower, sidb_ix) + recv.get(BoundDirection::Lower, sidb_ix),
                    store.get(BoundDirection::Upper, sidb_ix) + recv.get(BoundDirection::Upper, sidb_ix),
                )
            }
        }
    }

    /// Whether `pst` may still be part of a population stable charge
    /// distribution. `false` is a proof that it cannot.
    fn perform_potential_bound_analysis(&self, pst: ProjectorState, mode: AnalysisMode<'_>) -> bool {
        let cluster = self.tree.cluster(pst.cluster);
        let mut st = WitnessPartitioning::new(pst, cluster.num_sidbs());

        for &sidb_ix in &cluster.sidbs {
            let (lb, ub) = self.received_potential_bounds(pst, sidb_ix, mode);
            if st.required_neg != 0 && !self.bounds.fail_onto_negative(lb) {
                st.negative.push(sidb_ix);
            }
            if st.required_pos != 0 && !self.bounds.fail_onto_positive(ub) {
                st.positive.push(sidb_ix);
            }
            if st.required_neut != 0 && !self.bounds.fail_onto_neutral(lb, ub) {
                st.neutral.push(sidb_ix);
            }
        }

        if !st.has_enough_witnesses() {
            return false;
        }
        if cluster.num_sidbs() as u64 > self.params.witness_partitioning_cluster_size_limit {
            return true;
        }
        if st.omit_free_witnesses_and_count_overlap() as u64 > self.params.num_overlapping_witnesses_limit {
            return true;
        }
        st.has_valid_partitioning()
    }

    /// Retracts the projections of a pruned multiset from every other
    /// cluster in the clustering.
    fn handle_invalid_state(&mut self, pst: ProjectorState) {
        let others: Vec<ClusterId> = self
            .clustering
            .iter()
            .copied()
            .filter(|&c| c != pst.cluster)
            .collect();
        for other in others {
            for ix in 0..self.tree.cluster(other).sidbs.len() {
                let sidb_ix = self.tree.cluster(other).sidbs[ix];
                for bound in BoundDirection::BOTH {
                    let diff = self.records[pst.cluster].pot_projs.get(&sidb_ix).and_then(|o| {
                        let cur = o.bound(bound)?;
                        if cur.multiset != pst.multiset {
                            return None;
                        }
                        o.next_bound(bound).map(|next| next.pot_val - cur.pot_val)
                    });
                    if let Some(diff) = diff {
                        self.records[other]
                            .received_ext_pot_bounds
                            .update(bound, sidb_ix, diff);
                    }
                }
                if let Some(o) = self.records[pst.cluster].pot_projs.get_mut(&sidb_ix) {
                    o.remove_m_conf(pst.multiset);
                }
            }
        }
    }

    /// Removes every multiset of `c` that fails the analysis. Returns
    /// whether nothing was removed.
    fn check_charge_space(&mut self, c: ClusterId) -> bool {
        if self.records[c].charge_space.len() == 1 {
            return true;
        }
        let ms: Vec<Multiset> = self.records[c].charge_space.keys().copied().collect();
        let mut removed = vec![];
        for m in ms {
            let pst = ProjectorState::new(c, m);
            if !self.perform_potential_bound_analysis(pst, AnalysisMode::Multiset) {
                self.handle_invalid_state(pst);
                removed.push(m);
            }
        }
        for m in &removed {
            self.records[c].charge_space.shift_remove(m);
        }
        if !removed.is_empty() {
            clilog::trace!("cluster {}: pruned {} multisets", c, removed.len());
        }
        removed.is_empty()
    }

    fn update_charge_spaces(&mut self, skip_cluster: Option<ClusterId>) -> bool {
        let clustering: Vec<ClusterId> = self.clustering.iter().copied().collect();
        let mut fixpoint = true;
        for c in clustering {
            if skip_cluster != Some(c) {
                fixpoint &= self.check_charge_space(c);
            }
        }
        fixpoint
    }

    // ── merging ──────────────────────────────────────────────────────────

    fn write_children_pot_bounds_to_complete_store(&mut self, parent: ClusterId) {
        for &child in &self.tree.cluster(parent).children {
            let mut stores = HashMap::with_capacity(self.records[child].charge_space.len());
            for &m in self.records[child].charge_space.keys() {
                let pst = ProjectorState::new(child, m);
                let mut store = CompletePotentialBounds::new(self.num_sidbs);
                for sidb_ix in 0..self.num_sidbs {
                    store.set_both(
                        sidb_ix,
                        self.projector_state_bound(pst, sidb_ix, BoundDirection::Lower).pot_val,
                        self.projector_state_bound(pst, sidb_ix, BoundDirection::Upper).pot_val,
                    );
                }
                stores.insert(m, store);
            }
            self.records[child].pot_projs_complete_store = stores;
        }
    }

    /// Completes the bounds stored with each child composition by what the
    /// composition projects outside the child. Returns the number of
    /// projector states visited.
    fn compute_external_pot_bounds_for_saved_compositions(&mut self, parent: ClusterId) -> u64 {
        let mut saved_projector_states = 0;
        for &child in &self.tree.cluster(parent).children {
            let mut space = std::mem::take(&mut self.records[child].charge_space);
            for composition in space.values_mut().flatten() {
                for &sidb_ix in &self.tree.cluster(child).external_sidbs {
                    for &pst in &composition.proj_states {
                        composition.pot_bounds.update(
                            sidb_ix,
                            self.projector_state_bound(pst, sidb_ix, BoundDirection::Lower).pot_val,
                            self.projector_state_bound(pst, sidb_ix, BoundDirection::Upper).pot_val,
                        );
                    }
                }
                saved_projector_states += composition.proj_states.len() as u64;
            }
            self.records[child].charge_space = space;
        }
        saved_projector_states
    }

    /// Stores on `parent` the bounds its SiDBs receive from outside it.
    fn derive_children_received_bounds_without_siblings(&mut self, parent: ClusterId) {
        let children = self.tree.cluster(parent).children.clone();
        for &child in &children {
            for &sidb_ix in &self.tree.cluster(child).sidbs {
                for bound in BoundDirection::BOTH {
                    let mut recv = self.records[child].received_ext_pot_bounds.get(bound, sidb_ix);
                    for &sibling in children.iter().filter(|&&s| s != child) {
                        recv -= self.projection_bound(sibling, sidb_ix, bound);
                    }
                    self.records[parent]
                        .received_ext_pot_bounds
                        .set(bound, sidb_ix, recv);
                }
            }
        }
    }

    fn verify_composition(&self, composition: &mut Composition) -> bool {
        let proj_states = composition.proj_states.clone();
        for &receiving in &proj_states {
            for &sidb_ix in &self.tree.cluster(receiving.cluster).sidbs {
                let (mut lb, mut ub) = (0.0, 0.0);
                for &pst in &proj_states {
                    lb += self.projector_state_bound(pst, sidb_ix, BoundDirection::Lower).pot_val;
                    ub += self.projector_state_bound(pst, sidb_ix, BoundDirection::Upper).pot_val;
                }
                composition.pot_bounds.set_both(sidb_ix, lb, ub);
            }
            if !self.perform_potential_bound_analysis(receiving, AnalysisMode::Composition(&composition.pot_bounds)) {
                return false;
            }
        }
        true
    }

    fn fill_merged_charge_space(
        &self,
        children: &[ClusterId],
        m: Multiset,
        proj_states: &mut SmallVec<[ProjectorState; 2]>,
        space: &mut ChargeSpace,
    ) {
        let Some((&cur_child, rest)) = children.split_first() else {
            let mut composition = Composition {
                proj_states: proj_states.clone(),
                pot_bounds: CompletePotentialBounds::new(self.num_sidbs),
            };
            if self.verify_composition(&mut composition) {
                space.entry(m).or_default().push(composition);
            }
            return;
        };
        for &m_part in self.records[cur_child].charge_space.keys() {
            proj_states.push(ProjectorState::new(cur_child, m_part));
            self.fill_merged_charge_space(rest, m + m_part, proj_states, space);
            proj_states.pop();
        }
    }

    fn construct_merged_charge_space(&mut self, parent: ClusterId) {
        let children = self.tree.cluster(parent).children.clone();
        let mut space = ChargeSpace::new();
        self.fill_merged_charge_space(&children, Multiset::EMPTY, &mut SmallVec::new(), &mut space);
        space.sort_keys();
        self.records[parent].charge_space = space;
    }

    fn construct_merged_potential_projections(&mut self, parent: ClusterId) {
        let non_children: Vec<ClusterId> = self.clustering.iter().copied().collect();
        let children = self.tree.cluster(parent).children.clone();
        for non_child in non_children {
            for ix in 0..self.tree.cluster(non_child).sidbs.len() {
                let sidb_ix = self.tree.cluster(non_child).sidbs[ix];
                for bound in BoundDirection::BOTH {
                    let projections: Vec<PotentialProjection> = self.records[parent]
                        .charge_space
                        .values()
                        .flatten()
                        .map(|composition| {
                            let mut pp = PotentialProjection::default();
                            for &pst in &composition.proj_states {
                                pp += self.projector_state_bound(pst, sidb_ix, bound);
                            }
                            pp
                        })
                        .collect();
                    let order = self.records[parent].pot_projs.entry(sidb_ix).or_default();
                    for pp in projections {
                        order.add(pp);
                    }

                    let mut diff = self.projection_bound(parent, sidb_ix, bound);
                    for &child in &children {
                        diff -= self.projection_bound(child, sidb_ix, bound);
                    }
                    self.records[non_child]
                        .received_ext_pot_bounds
                        .update(bound, sidb_ix, diff);
                }
            }
        }
    }

    fn compute_meets_for_internal_pot_bounds(&mut self, parent: ClusterId) {
        let mut meets = vec![];
        for (&m, compositions) in &self.records[parent].charge_space {
            for &sidb_ix in &self.tree.cluster(parent).sidbs {
                for bound in BoundDirection::BOTH {
                    let meet = compositions
                        .iter()
                        .map(|c| c.pot_bounds.get(bound, sidb_ix))
                        .fold(bound.top(), |a, b| bound.meet(a, b));
                    meets.push((sidb_ix, PotentialProjection::new(meet, m)));
                }
            }
        }
        let rec = &mut self.records[parent];
        for (sidb_ix, pp) in meets {
            rec.pot_projs.entry(sidb_ix).or_default().add(pp);
        }
    }

    /// Merges the smallest parent of the clustering, and keeps merging
    /// while the remaining charge spaces stay at their fixpoint.
    fn move_up_hierarchy(&mut self) {
        loop {
            let Some(top) = self.tree.top() else {
                self.terminate = true;
                return;
            };
            if self.clustering.len() == 1 && self.clustering.contains(&top) {
                self.terminate = true;
                return;
            }

            let Some(parent) = self
                .clustering
                .iter()
                .filter_map(|&c| self.tree.cluster(c).parent)
                .min_by_key(|&p| (self.tree.cluster(p).num_sidbs(), p))
            else {
                self.terminate = true;
                return;
            };

            for c in &self.tree.cluster(parent).children {
                self.clustering.remove(c);
            }

            self.write_children_pot_bounds_to_complete_store(parent);
            self.projector_state_count += self.compute_external_pot_bounds_for_saved_compositions(parent);
            self.derive_children_received_bounds_without_siblings(parent);
            self.construct_merged_charge_space(parent);

            if self.records[parent].charge_space.is_empty() {
                clilog::debug!("cluster {} has an empty charge space, nothing is stable", parent);
                self.terminate = true;
                return;
            }

            self.construct_merged_potential_projections(parent);
            self.compute_meets_for_internal_pot_bounds(parent);
            self.clustering.insert(parent);

            clilog::debug!(
                "merged cluster {} ({} SiDBs): {} multisets, {} compositions",
                parent,
                self.tree.cluster(parent).num_sidbs(),
                self.records[parent].charge_space.len(),
                self.records[parent].charge_space.values().map(Vec::len).sum::<usize>()
            );

            if !self.update_charge_spaces(Some(parent)) {
                return;
            }
        }
    }
}

// ── finalized ────────────────────────────────────────────────────────────────

/// Charge data of one cluster after construction.
#[derive(Debug, Clone, Default)]
pub struct ClusterChargeData {
    pub charge_space: ChargeSpace,
    /// For each multiset, the bounds it projects onto every SiDB. Set once
    /// the cluster is merged into its parent.
    pub pot_projs_complete_store: HashMap<Multiset, CompletePotentialBounds>,
}

/// Result of Ground State Space construction.
#[derive(Debug, Clone)]
pub struct GroundStateSpace {
    tree: ClusterTree,
    clusters: Vec<ClusterChargeData>,
    num_sidbs: usize,
    runtime: Duration,
    maximum_top_level_multisets: u64,
    projector_state_count: u64,
}

impl GroundStateSpace {
    pub fn tree(&self) -> &ClusterTree {
        &self.tree
    }

    #[inline]
    pub fn num_sidbs(&self) -> usize {
        self.num_sidbs
    }

    /// `None` for an empty layout.
    pub fn top_cluster(&self) -> Option<&SidbCluster> {
        self.tree.top().map(|uid| self.tree.cluster(uid))
    }

    #[inline]
    pub fn cluster(&self, uid: ClusterId) -> &SidbCluster {
        self.tree.cluster(uid)
    }

    #[inline]
    pub fn charge_space(&self, uid: ClusterId) -> &ChargeSpace {
        &self.clusters[uid].charge_space
    }

    /// Charge space of the top cluster, empty for an empty layout.
    pub fn top_charge_space(&self) -> Option<&ChargeSpace> {
        self.tree.top().map(|uid| self.charge_space(uid))
    }

    /// The compositions realising a projector state.
    pub fn compositions(&self, pst: ProjectorState) -> &[Composition] {
        self.clusters[pst.cluster]
            .charge_space
            .get(&pst.multiset)
            .map_or(&[], Vec::as_slice)
    }

    /// What `pst` projects onto every SiDB.
    pub fn complete_store(&self, pst: ProjectorState) -> Option<&CompletePotentialBounds> {
        self.clusters[pst.cluster].pot_projs_complete_store.get(&pst.multiset)
    }

    pub fn runtime(&self) -> Duration {
        self.runtime
    }

    pub fn maximum_top_level_multisets(&self) -> u64 {
        self.maximum_top_level_multisets
    }

    pub fn projector_state_count(&self) -> u64 {
        self.projector_state_count
    }

    pub fn stats(&self) -> GroundStateSpaceStats {
        GroundStateSpaceStats {
            num_sidbs: self.num_sidbs,
            top_level_multisets: self.top_charge_space().map_or(0, |s| s.len() as u64),
            maximum_top_level_multisets: self.maximum_top_level_multisets,
            projector_state_count: self.projector_state_count,
            runtime_secs: self.runtime.as_secs_f64(),
        }
    }

    /// Logs the pruning statistics.
    pub fn report(&self) {
        let stats = self.stats();
        clilog::info!(
            "leaving {} out of {} top level multiset charge configurations",
            stats.top_level_multisets,
            stats.maximum_top_level_multisets
        );
        clilog::info!(
            "there are {} projector states in the constructed hierarchy",
            stats.projector_state_count
        );
        if stats.runtime_secs > 1.0 {
            clilog::info!("ground state space took {:.4} seconds", stats.runtime_secs);
        } else {
            clilog::info!("ground state space took {:.4} milliseconds", stats.runtime_secs * 1e3);
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GroundStateSpaceStats {
    pub num_sidbs: usize,
    pub top_level_multisets: u64,
    pub maximum_top_level_multisets: u64,
    pub projector_state_count: u64,
    pub runtime_secs: f64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layout::SiqadCoord;

    fn layout(cells: &[(i64, i64, u8)]) -> SidbLayout {
        SidbLayout::from_cells(cells.iter().map(|&c| SiqadCoord::from(c)))
    }

    fn params(base: u8) -> GroundStateSpaceParams {
        GroundStateSpaceParams {
            simulation_parameters: SimulationParameters::new(base, -0.32),
            ..Default::default()
        }
    }

    fn check_multisets(gss: &GroundStateSpace) {
        for c in gss.tree().clusters() {
            for (&m, compositions) in gss.charge_space(c.uid) {
                assert!(m.fits(c.num_sidbs()), "{m} in cluster {}", c.uid);
                if c.is_singleton() {
                    assert!(m.neg_count() + m.pos_count() <= 1);
                }
                assert!(!compositions.is_empty());
                for composition in compositions {
                    let mut sum = Multiset::EMPTY;
                    for pst in &composition.proj_states {
                        sum += pst.multiset;
                    }
                    assert_eq!(sum, m);
                }
            }
        }
    }

    #[test]
    fn test_maximum_top_level_multisets() {
        assert_eq!(maximum_top_level_multisets(4, 3), 15);
        assert_eq!(maximum_top_level_multisets(4, 2), 5);
        assert_eq!(maximum_top_level_multisets(0, 3), 1);
    }

    #[test]
    fn test_empty_layout() {
        let gss = ground_state_space(&SidbLayout::new(), &params(3)).unwrap();
        assert!(gss.top_cluster().is_none());
        assert!(gss.top_charge_space().is_none());
        assert_eq!(gss.stats().top_level_multisets, 0);
    }

    #[test]
    fn test_single_sidb() {
        for base in [2, 3] {
            let gss = ground_state_space(&layout(&[(1, 3, 0)]), &params(base)).unwrap();
            let top = gss.top_cluster().unwrap();
            assert_eq!(top.uid, 1);
            assert_eq!(top.children.as_slice(), &[0]);
            let space = gss.top_charge_space().unwrap();
            assert_eq!(space.len(), 1);
            assert_eq!(space.keys().next(), Some(&Multiset::new(1, 0)));
            check_multisets(&gss);
        }
    }

    #[test]
    fn test_invalid_parameters() {
        let mut p = params(3);
        p.simulation_parameters.base = 5;
        assert!(ground_state_space(&layout(&[(0, 0, 0)]), &p).is_err());
    }

    #[test]
    fn test_multiset_invariants() {
        let lyt = layout(&[
            (0, 0, 0),
            (2, 1, 0),
            (6, 0, 1),
            (9, 2, 0),
            (13, 1, 1),
            (17, 0, 0),
            (4, 5, 0),
        ]);
        for base in [2, 3] {
            let gss = ground_state_space(&lyt, &params(base)).unwrap();
            check_multisets(&gss);
            let top = gss.top_charge_space().unwrap();
            assert!(top.len() as u64 <= gss.maximum_top_level_multisets());
            assert!(gss.projector_state_count() > 0);
        }
    }

    #[test]
    fn test_far_apart_sidbs_are_all_negative() {
        // screened interaction at 20 nm is far below |mu-|
        let lyt = layout(&[(0, 0, 0), (60, 0, 0), (0, 30, 0)]);
        let gss = ground_state_space(&lyt, &params(3)).unwrap();
        let top = gss.top_charge_space().unwrap();
        assert_eq!(top.keys().copied().collect::<Vec<_>>(), vec![Multiset::new(3, 0)]);
    }

    #[test]
    fn test_adjacent_pair() {
        // two SiDBs on one dimer cannot both hold an electron
        let lyt = layout(&[(0, 0, 0), (0, 0, 1)]);
        let gss = ground_state_space(&lyt, &params(2)).unwrap();
        assert!(gss.top_charge_space().unwrap().is_empty());
        let gss = ground_state_space(&lyt, &params(3)).unwrap();
        assert!(!gss.top_charge_space().unwrap().is_empty());
    }

    fn seven_db_cells() -> Vec<(i64, i64, u8)> {
        vec![(0, 0, 0), (2, 2, 0), (4, 1, 0), (0, 7, 0), (1, 6, 0), (6, 5, 1), (4, 8, 1)]
    }

    #[test]
    fn test_seven_sidbs_base_2() {
        let gss = ground_state_space(&layout(&seven_db_cells()), &params(2)).unwrap();
        let top = gss.top_charge_space().unwrap();
        assert_eq!(gss.maximum_top_level_multisets() - top.len() as u64, 7);
        assert_eq!(top.keys().copied().collect::<Vec<_>>(), vec![Multiset::new(5, 0)]);

        let compositions = &top[&Multiset::new(5, 0)];
        assert_eq!(compositions.len(), 1);
        let psts = &compositions[0].proj_states;
        assert_eq!(psts.len(), 2);
        for pst in psts {
            let sidbs = &gss.cluster(pst.cluster).sidbs;
            if sidbs.len() == 3 {
                assert_eq!(sidbs, &[0, 1, 2]);
                assert_eq!(pst.multiset, Multiset::new(2, 0));
            } else {
                assert_eq!(sidbs, &[3, 4, 5, 6]);
                assert_eq!(pst.multiset, Multiset::new(3, 0));
            }
        }
        check_multisets(&gss);
    }

    #[test]
    fn test_fourteen_sidbs() {
        let mut cells = seven_db_cells();
        cells.extend([(4, 0, 0), (6, 2, 0), (8, 1, 0), (4, 7, 0), (5, 6, 0), (10, 5, 1), (8, 8, 1)]);
        let gss = ground_state_space(&layout(&cells), &GroundStateSpaceParams::default()).unwrap();
        assert_eq!(gss.top_cluster().unwrap().num_sidbs(), 14);
        assert_eq!(gss.top_charge_space().unwrap().len(), 5);
    }

    #[test]
    fn test_loose_stability_error_keeps_more_multisets() {
        let lyt = layout(&seven_db_cells());
        for base in [2, 3] {
            let strict = ground_state_space(&lyt, &params(base)).unwrap();
            let loose = ground_state_space(
                &lyt,
                &GroundStateSpaceParams {
                    stability_error: 0.05,
                    ..params(base)
                },
            )
            .unwrap();
            let loose_top = loose.top_charge_space().unwrap();
            for m in strict.top_charge_space().unwrap().keys() {
                assert!(loose_top.contains_key(m), "{m} lost in base {base}");
            }
            check_multisets(&loose);
        }
    }

    #[test]
    fn test_complete_stores_cover_children() {
        let lyt = layout(&[(0, 0, 0), (3, 0, 0), (8, 1, 1), (12, 0, 0)]);
        let gss = ground_state_space(&lyt, &params(2)).unwrap();
        let top = gss.top_cluster().unwrap();
        for composition in gss.top_charge_space().unwrap().values().flatten() {
            assert_eq!(composition.proj_states.len(), top.children.len());
            for &pst in &composition.proj_states {
                let store = gss.complete_store(pst).unwrap();
                assert_eq!(store.len(), 4);
                assert!(!gss.compositions(pst).is_empty());
                for ix in 0..4 {
                    assert!(store.get(BoundDirection::Lower, ix) <= store.get(BoundDirection::Upper, ix) + 1e-12);
                }
            }
        }
    }

    #[test]
    fn test_witness_partitioning() {
        // SiDB 0 can only be negative, which leaves SiDB 1 for the neutral
        let mut st = WitnessPartitioning {
            negative: vec![0, 1],
            positive: vec![],
            neutral: vec![1],
            required_neg: 1,
            required_pos: 0,
            required_neut: 1,
        };
        assert!(st.has_enough_witnesses());
        assert_eq!(st.omit_free_witnesses_and_count_overlap(), 1);
        assert_eq!(st.required_neg, 0);
        assert!(st.has_valid_partitioning());

        // one SiDB cannot witness both required states
        let mut st = WitnessPartitioning {
            negative: vec![4],
            positive: vec![],
            neutral: vec![4],
            required_neg: 1,
            required_pos: 0,
            required_neut: 1,
        };
        assert!(st.has_enough_witnesses());
        assert_eq!(st.omit_free_witnesses_and_count_overlap(), 1);
        assert!(!st.has_valid_partitioning());

        let st = WitnessPartitioning {
            negative: vec![0, 1, 2],
            positive: vec![1, 2],
            neutral: vec![0, 2],
            required_neg: 1,
            required_pos: 1,
            required_neut: 1,
        };
        // e.g. - on 0, + on 1, 0 on 2
        assert!(st.has_valid_partitioning());
    }
}
