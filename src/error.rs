// SPDX-FileCopyrightText: Copyright (c) 2024 NVIDIA CORPORATION & AFFILIATES. All rights reserved.
// SPDX-License-Identifier: Apache-2.0
//! Error type shared by the simulation entry points.

use thiserror::Error;

/// The result of a simulation operation.
pub type Result<T> = std::result::Result<T, SimulationError>;

/// Error returned when a simulation cannot be set up.
///
/// Once parameters and layout are accepted, the engines themselves do
/// not fail.
#[derive(Debug, Error)]
pub enum SimulationError {
    /// Only 2-state (`-`, `0`) and 3-state (`-`, `0`, `+`) simulation exist.
    #[error("simulation base must be 2 or 3, got {0}")]
    InvalidBase(u8),

    /// Relative permittivity must be strictly positive.
    #[error("epsilon_r must be positive, got {0}")]
    NonPositivePermittivity(f64),

    /// Thomas-Fermi screening length must be strictly positive.
    #[error("lambda_tf must be positive, got {0} nm")]
    NonPositiveScreeningLength(f64),

    /// The number of charge configurations exceeds what exhaustive
    /// enumeration accepts.
    #[error("{num_sidbs} SiDBs in base {base} exceed the exhaustive enumeration limit of {limit} configurations")]
    ConfigurationSpaceTooLarge {
        num_sidbs: usize,
        base: u8,
        limit: u64,
    },

    /// A cell string on the command line could not be parsed.
    #[error("invalid cell `{0}`, expected `x,y,z` with z in {{0, 1}}")]
    InvalidCell(String),

    /// Building the worker pool failed.
    #[error("failed to build worker pool: {0}")]
    ThreadPool(#[from] rayon::ThreadPoolBuildError),

    /// Reading a layout file failed.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// A layout file did not parse.
    #[error("layout json error: {0}")]
    Json(#[from] serde_json::Error),
}
