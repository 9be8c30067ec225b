// SPDX-FileCopyrightText: Copyright (c) 2024 NVIDIA CORPORATION & AFFILIATES. All rights reserved.
// SPDX-License-Identifier: Apache-2.0

//! sidbsim — exact charge configuration simulation of silicon dangling
//! bond (SiDB) layouts.
//!
//! Finds every physically valid charge distribution of a layout without
//! enumerating all `base^N` configurations: a cluster hierarchy over the
//! SiDBs is walked bottom-up, pruning multiset charge configurations by
//! electrostatic potential bounds, and the surviving state space is then
//! unfolded in parallel.
//!
//! # Pipeline
//!
//! ```text
//! SiDB layout
//!   → ClusterTree        (cluster_hierarchy — agglomerative clustering, arena of clusters)
//!   → GroundStateSpace   (ground_state_space — bottom-up multiset pruning)
//!   → unfolding          (clustercomplete — bound pruned DFS; flitsim — plain expansion)
//!   → SimulationResult   (result — physically valid charge distributions)
//! ```
//!
//! # Key modules
//!
//! - [`physics`] — Physical parameters, screened Coulomb potential and stability thresholds
//! - [`charge_state`] — SiDB charge states and packed multiset configurations
//! - [`layout`] — Lattice coordinates and SiDB layouts
//! - [`charge_surface`] — Charge distribution with local potentials, energy and validity
//! - [`cluster_hierarchy`] — Hierarchical clustering of SiDBs
//! - [`charge_space`] — Potential projections, bounds and compositions
//! - [`ground_state_space`] — Ground State Space construction
//! - [`clustercomplete`] — Exact simulation by pruned unfolding
//! - [`flitsim`] — Exhaustive search inside the Ground State Space
//! - [`exhaustive`] — Plain exhaustive enumeration for reference
//! - [`result`] — Simulation results and summaries

pub mod error;

pub mod physics;

pub mod charge_state;

pub mod layout;

pub mod charge_surface;

pub mod cluster_hierarchy;

pub mod charge_space;

pub mod ground_state_space;

pub mod clustercomplete;

pub mod flitsim;

pub mod exhaustive;

pub mod result;
