// SPDX-FileCopyrightText: Copyright (c) 2024 NVIDIA CORPORATION & AFFILIATES. All rights reserved.
// SPDX-License-Identifier: Apache-2.0
//! FLITSim: exhaustive search restricted to the Ground State Space.
//!
//! The top level multisets are split into contiguous ranges, one per
//! worker. Each worker expands every composition by substituting the
//! largest cluster until only singletons remain, without any bound
//! pruning, and checks the resulting charge distributions exactly.

use crate::charge_space::ProjectorState;
use crate::charge_state::ChargeState;
use crate::charge_surface::ChargeDistributionSurface;
use crate::error::Result;
use crate::ground_state_space::{GroundStateSpace, GroundStateSpaceBuilder, GroundStateSpaceParams};
use crate::layout::SidbLayout;
use crate::physics::SimulationParameters;
use crate::result::SimulationResult;
use std::ops::Range;
use std::sync::Mutex;
use std::time::Instant;

pub const FLITSIM_NAME: &str = "flitsim";

/// Splits `0..len` into `min(parts, len)` contiguous ranges. The last range
/// takes the remainder.
fn contiguous_ranges(len: usize, parts: usize) -> Vec<Range<usize>> {
    let parts = parts.min(len).max(1);
    let chunk = len / parts;
    (0..parts)
        .map(|i| {
            let end = if i + 1 == parts { len } else { (i + 1) * chunk };
            i * chunk..end
        })
        .collect()
}

/// Finds all physically valid charge distributions of `layout`.
pub fn flitsim(
    layout: &SidbLayout,
    params: &SimulationParameters,
    witness_partitioning_limit: u64,
    available_threads: usize,
) -> Result<SimulationResult> {
    params.validate()?;
    let start = Instant::now();

    let mut result = SimulationResult::new(FLITSIM_NAME, *params);
    result
        .additional_simulation_parameters
        .insert("witness_partitioning_limit".into(), witness_partitioning_limit.into());
    result
        .additional_simulation_parameters
        .insert("available_threads".into(), available_threads.into());
    if layout.is_empty() {
        result.simulation_runtime = start.elapsed();
        return Ok(result);
    }

    let charge_layout = ChargeDistributionSurface::new(layout, *params, ChargeState::Neutral);
    let gss_params = GroundStateSpaceParams {
        simulation_parameters: *params,
        witness_partitioning_cluster_size_limit: witness_partitioning_limit,
        ..Default::default()
    };
    let gss = GroundStateSpaceBuilder::new(&charge_layout, &gss_params).run();
    let Some(top_space) = gss.top_charge_space() else {
        result.simulation_runtime = start.elapsed();
        return Ok(result);
    };

    let ranges = contiguous_ranges(top_space.len(), available_threads);
    clilog::debug!(
        "flitsim: {} top level multisets over {} worker(s)",
        top_space.len(),
        ranges.len()
    );
    let pool = rayon::ThreadPoolBuilder::new().num_threads(ranges.len()).build()?;
    let found = Mutex::new(Vec::new());

    let timer = clilog::stimer!("flitsim expansion");
    pool.scope(|s| {
        for range in ranges {
            let (gss, charge_layout, found) = (&gss, &charge_layout, &found);
            s.spawn(move |_| {
                let mut cds = charge_layout.clone();
                for ix in range {
                    let Some((_, compositions)) = top_space.get_index(ix) else {
                        continue;
                    };
                    for composition in compositions {
                        let mut psts = composition.proj_states.to_vec();
                        expand(gss, &mut psts, &mut cds, found);
                    }
                }
            });
        }
    });
    clilog::finish!(timer);

    result.charge_distributions = found.into_inner().unwrap_or_else(|e| e.into_inner());
    result.simulation_runtime = start.elapsed();
    Ok(result)
}

/// Substitutes the largest cluster in `psts` by each of its compositions
/// until only singletons remain.
fn expand(
    gss: &GroundStateSpace,
    psts: &mut Vec<ProjectorState>,
    cds: &mut ChargeDistributionSurface,
    found: &Mutex<Vec<ChargeDistributionSurface>>,
) {
    let largest = psts
        .iter()
        .enumerate()
        .filter(|(_, pst)| !gss.cluster(pst.cluster).is_singleton())
        .fold(None::<(usize, usize)>, |best, (i, pst)| {
            let size = gss.cluster(pst.cluster).num_sidbs();
            match best {
                Some((_, best_size)) if best_size >= size => best,
                _ => Some((i, size)),
            }
        });

    let Some((ix, _)) = largest else {
        for pst in psts.iter() {
            let sidb = gss.cluster(pst.cluster).singleton_sidb();
            cds.assign_charge_state_by_index(sidb, pst.multiset.to_singleton_charge_state(), false);
        }
        cds.update_after_charge_change();
        if cds.is_physically_valid() {
            found.lock().unwrap_or_else(|e| e.into_inner()).push(cds.clone());
        }
        return;
    };

    let parent = psts.swap_remove(ix);
    let base_len = psts.len();
    for composition in gss.compositions(parent) {
        psts.extend_from_slice(&composition.proj_states);
        expand(gss, psts, cds, found);
        psts.truncate(base_len);
    }
    psts.push(parent);
    let last = psts.len() - 1;
    psts.swap(ix, last);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clustercomplete::{clustercomplete, ClusterCompleteParams};
    use crate::layout::SiqadCoord;

    fn layout(cells: &[(i64, i64, u8)]) -> SidbLayout {
        SidbLayout::from_cells(cells.iter().map(|&c| SiqadCoord::from(c)))
    }

    #[test]
    fn test_contiguous_ranges() {
        assert_eq!(contiguous_ranges(10, 3), vec![0..3, 3..6, 6..10]);
        assert_eq!(contiguous_ranges(2, 8), vec![0..1, 1..2]);
        assert_eq!(contiguous_ranges(5, 1), vec![0..5]);
        assert_eq!(contiguous_ranges(0, 4), vec![0..0]);
    }

    #[test]
    fn test_empty_and_single() {
        let p = SimulationParameters::new(2, -0.32);
        let res = flitsim(&SidbLayout::new(), &p, 6, 2).unwrap();
        assert_eq!(res.algorithm_name, FLITSIM_NAME);
        assert!(res.charge_distributions.is_empty());

        let res = flitsim(&layout(&[(3, 2, 1)]), &p, 6, 2).unwrap();
        assert_eq!(res.charge_distributions.len(), 1);
        assert_eq!(res.charge_distributions[0].charge_string(), "-");
    }

    #[test]
    fn test_agrees_with_clustercomplete() {
        let lyt = layout(&[
            (0, 0, 0),
            (2, 0, 1),
            (4, 1, 0),
            (7, 0, 0),
            (9, 1, 1),
            (1, 3, 0),
            (5, 3, 1),
        ]);
        for base in [2, 3] {
            let p = SimulationParameters::new(base, -0.28);
            let cc = clustercomplete(
                &lyt,
                &ClusterCompleteParams {
                    simulation_parameters: p,
                    available_threads: 2,
                    ..Default::default()
                },
            )
            .unwrap();
            for threads in [1, 3] {
                let res = flitsim(&lyt, &p, 6, threads).unwrap();
                assert_eq!(res.charge_indices(), cc.charge_indices(), "base {base}, {threads} threads");
            }
        }
    }
}
