// SPDX-FileCopyrightText: Copyright (c) 2024 NVIDIA CORPORATION & AFFILIATES. All rights reserved.
// SPDX-License-Identifier: Apache-2.0
//! Cell-level SiDB layouts in SiQAD coordinates.
//!
//! A layout is just the ordered list of occupied lattice sites. The index
//! of a cell in that list is the SiDB index used by every other module.

use crate::error::{Result, SimulationError};
use crate::physics::{LatticeConstants, SI_100};
use indexmap::IndexSet;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use std::str::FromStr;

/// A lattice site: dimer column `x`, dimer row `y`, and the atom `z`
/// (0 or 1) within the dimer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(from = "(i64, i64, u8)", into = "(i64, i64, u8)")]
pub struct SiqadCoord {
    pub x: i64,
    pub y: i64,
    pub z: u8,
}

impl SiqadCoord {
    pub fn new(x: i64, y: i64, z: u8) -> Self {
        Self { x, y, z }
    }

    /// Position in nanometers on the given lattice.
    pub fn nm_position(self, lat: &LatticeConstants) -> (f64, f64) {
        (
            self.x as f64 * lat.a * 0.1,
            (self.y as f64 * lat.b + self.z as f64 * lat.c) * 0.1,
        )
    }
}

impl From<(i64, i64, u8)> for SiqadCoord {
    fn from((x, y, z): (i64, i64, u8)) -> Self {
        Self { x, y, z }
    }
}

impl From<SiqadCoord> for (i64, i64, u8) {
    fn from(c: SiqadCoord) -> Self {
        (c.x, c.y, c.z)
    }
}

impl FromStr for SiqadCoord {
    type Err = SimulationError;

    /// Parses `x,y` or `x,y,z`.
    fn from_str(s: &str) -> Result<Self> {
        let invalid = || SimulationError::InvalidCell(s.to_string());
        let parts: Vec<&str> = s.split(',').map(str::trim).collect();
        if parts.len() < 2 || parts.len() > 3 {
            return Err(invalid());
        }
        let x = parts[0].parse::<i64>().map_err(|_| invalid())?;
        let y = parts[1].parse::<i64>().map_err(|_| invalid())?;
        let z = match parts.get(2) {
            Some(z) => z.parse::<u8>().map_err(|_| invalid())?,
            None => 0,
        };
        if z > 1 {
            return Err(invalid());
        }
        Ok(Self { x, y, z })
    }
}

impl fmt::Display for SiqadCoord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {}, {})", self.x, self.y, self.z)
    }
}

/// An SiDB layout on H-Si(100)-2x1.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SidbLayout {
    #[serde(default)]
    pub name: Option<String>,
    cells: IndexSet<SiqadCoord>,
}

impl SidbLayout {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_cells(cells: impl IntoIterator<Item = SiqadCoord>) -> Self {
        Self {
            name: None,
            cells: cells.into_iter().collect(),
        }
    }

    /// Loads `{"name": ..., "cells": [[x, y, z], ...]}`.
    pub fn from_json_file(path: &Path) -> Result<Self> {
        let file = std::fs::File::open(path)?;
        let reader = std::io::BufReader::new(file);
        let layout: SidbLayout = serde_json::from_reader(reader)?;
        clilog::debug!("loaded {} SiDBs from {:?}", layout.num_cells(), path);
        Ok(layout)
    }

    /// Places an SiDB. Returns `false` if the site was already occupied.
    pub fn assign_sidb(&mut self, c: SiqadCoord) -> bool {
        self.cells.insert(c)
    }

    #[inline]
    pub fn num_cells(&self) -> usize {
        self.cells.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    pub fn cell(&self, ix: usize) -> Option<SiqadCoord> {
        self.cells.get_index(ix).copied()
    }

    pub fn index_of(&self, c: &SiqadCoord) -> Option<usize> {
        self.cells.get_index_of(c)
    }

    pub fn cells(&self) -> impl Iterator<Item = SiqadCoord> + '_ {
        self.cells.iter().copied()
    }

    pub fn nm_positions(&self) -> Vec<(f64, f64)> {
        self.cells.iter().map(|c| c.nm_position(&SI_100)).collect()
    }
}
