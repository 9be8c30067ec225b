// SPDX-FileCopyrightText: Copyright (c) 2024 NVIDIA CORPORATION & AFFILIATES. All rights reserved.
// SPDX-License-Identifier: Apache-2.0
//! Command line front end for the SiDB charge simulators.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};
use indexmap::IndexMap;
use sidbsim::cluster_hierarchy::LinkageMethod;
use sidbsim::clustercomplete::{clustercomplete, default_available_threads, ClusterCompleteParams};
use sidbsim::error::Result;
use sidbsim::exhaustive::{exhaustive_ground_state_simulation, ExhaustiveParams};
use sidbsim::flitsim::flitsim;
use sidbsim::ground_state_space::{ground_state_space, GroundStateSpaceParams};
use sidbsim::layout::{SidbLayout, SiqadCoord};
use sidbsim::physics::{SimulationParameters, POP_STABILITY_ERR};
use sidbsim::result::SimulationResult;

#[derive(Parser)]
#[command(name = "sidbsim", about = "sidbsim — exact SiDB charge configuration simulator")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Find all physically valid charge distributions with ClusterComplete.
    ///
    /// Builds the Ground State Space and unfolds it in parallel with
    /// potential bound pruning. Supports external potentials.
    #[command(alias = "ccsim")]
    Clustercomplete(ClusterCompleteArgs),

    /// Find all physically valid charge distributions with FLITSim.
    ///
    /// Builds the Ground State Space and checks every charge distribution
    /// it admits.
    Flitsim(FlitsimArgs),

    /// Enumerate every charge configuration. Only for small layouts.
    Exhaustive(ExhaustiveArgs),

    /// Build the Ground State Space and print its statistics.
    Gss(GssArgs),
}

#[derive(Args, Debug)]
struct LayoutArgs {
    /// JSON layout file: `{"name": ..., "cells": [[x, y, z], ...]}`.
    #[clap(long)]
    layout: Option<PathBuf>,

    /// An SiDB at `x,y,z`. May be repeated, adds to `--layout`.
    #[clap(long = "cell", allow_hyphen_values = true)]
    cells: Vec<SiqadCoord>,
}

impl LayoutArgs {
    fn load(&self) -> Result<SidbLayout> {
        let mut layout = match &self.layout {
            Some(path) => SidbLayout::from_json_file(path)?,
            None => SidbLayout::new(),
        };
        for &c in &self.cells {
            if !layout.assign_sidb(c) {
                clilog::warn!("duplicate SiDB at {}, ignored", c);
            }
        }
        clilog::info!("layout has {} SiDBs", layout.num_cells());
        Ok(layout)
    }
}

#[derive(Args, Debug)]
struct PhysicsArgs {
    /// Number of charge states: 2 for {-, 0}, 3 for {-, 0, +}.
    #[clap(long, default_value_t = 3)]
    base: u8,

    /// Energy transition level (0/-) in eV.
    #[clap(long, default_value_t = -0.32, allow_hyphen_values = true)]
    mu_minus: f64,

    /// Relative permittivity.
    #[clap(long, default_value_t = 5.6)]
    epsilon_r: f64,

    /// Thomas-Fermi screening length in nm.
    #[clap(long, default_value_t = 5.0)]
    lambda_tf: f64,
}

impl PhysicsArgs {
    fn params(&self) -> SimulationParameters {
        SimulationParameters {
            base: self.base,
            mu_minus: self.mu_minus,
            epsilon_r: self.epsilon_r,
            lambda_tf: self.lambda_tf,
        }
    }
}

#[derive(Clone, Copy, Debug, Default, ValueEnum)]
enum OutputFormat {
    #[default]
    Text,
    Json,
}

#[derive(Args, Debug)]
struct OutputArgs {
    /// Output format of the result printed on stdout.
    #[clap(long, value_enum, default_value_t = OutputFormat::Text)]
    format: OutputFormat,
}

#[derive(Args, Debug)]
struct ClusterCompleteArgs {
    #[command(flatten)]
    layout: LayoutArgs,

    #[command(flatten)]
    physics: PhysicsArgs,

    /// External potential on one SiDB as `x,y,z=volts`. May be repeated.
    #[clap(long = "external-potential", value_parser = parse_external_potential, allow_hyphen_values = true)]
    external_potentials: Vec<(SiqadCoord, f64)>,

    /// External potential on every SiDB, in V.
    #[clap(long, default_value_t = 0.0, allow_hyphen_values = true)]
    global_potential: f64,

    /// Clusters larger than this skip witness partitioning during Ground
    /// State Space construction.
    #[clap(long, default_value_t = 6)]
    witness_partitioning_limit: u64,

    /// Witness partitioning is skipped beyond this many overlapping
    /// witnesses.
    #[clap(long, default_value_t = 6)]
    overlapping_witnesses_limit: u64,

    /// Slack on the population stability thresholds used for pruning.
    #[clap(long, default_value_t = POP_STABILITY_ERR)]
    stability_error: f64,

    /// Worker threads. Defaults to the available parallelism.
    #[clap(long)]
    threads: Option<usize>,

    #[clap(long, value_enum, default_value_t = LinkageMethod::default())]
    linkage: LinkageMethod,

    /// Log Ground State Space statistics.
    #[clap(long)]
    report_gss_stats: bool,

    #[command(flatten)]
    output: OutputArgs,
}

#[derive(Args, Debug)]
struct FlitsimArgs {
    #[command(flatten)]
    layout: LayoutArgs,

    #[command(flatten)]
    physics: PhysicsArgs,

    #[clap(long, default_value_t = 6)]
    witness_partitioning_limit: u64,

    #[clap(long)]
    threads: Option<usize>,

    #[command(flatten)]
    output: OutputArgs,
}

#[derive(Args, Debug)]
struct ExhaustiveArgs {
    #[command(flatten)]
    layout: LayoutArgs,

    #[command(flatten)]
    physics: PhysicsArgs,

    #[clap(long = "external-potential", value_parser = parse_external_potential, allow_hyphen_values = true)]
    external_potentials: Vec<(SiqadCoord, f64)>,

    #[clap(long, default_value_t = 0.0, allow_hyphen_values = true)]
    global_potential: f64,

    /// Refuse layouts with more charge configurations than this.
    #[clap(long, default_value_t = 1 << 24)]
    max_configurations: u64,

    #[command(flatten)]
    output: OutputArgs,
}

#[derive(Args, Debug)]
struct GssArgs {
    #[command(flatten)]
    layout: LayoutArgs,

    #[command(flatten)]
    physics: PhysicsArgs,

    #[clap(long, default_value_t = 12)]
    witness_partitioning_limit: u64,

    #[clap(long, default_value_t = 6)]
    overlapping_witnesses_limit: u64,

    #[clap(long, default_value_t = POP_STABILITY_ERR)]
    stability_error: f64,

    #[clap(long, value_enum, default_value_t = LinkageMethod::default())]
    linkage: LinkageMethod,

    #[command(flatten)]
    output: OutputArgs,
}

fn parse_external_potential(s: &str) -> std::result::Result<(SiqadCoord, f64), String> {
    let (cell, volts) = s
        .split_once('=')
        .ok_or_else(|| format!("expected `x,y,z=volts`, got `{s}`"))?;
    let cell = cell.parse::<SiqadCoord>().map_err(|e| e.to_string())?;
    let volts = volts
        .trim()
        .parse::<f64>()
        .map_err(|e| format!("invalid potential `{volts}`: {e}"))?;
    Ok((cell, volts))
}

fn print_result(result: &SimulationResult, format: OutputFormat) -> Result<()> {
    let summary = result.summary();
    match format {
        OutputFormat::Text => print!("{}", summary.to_text()),
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&summary)?),
    }
    Ok(())
}

fn cmd_clustercomplete(args: ClusterCompleteArgs) -> Result<()> {
    let layout = args.layout.load()?;
    let params = ClusterCompleteParams {
        simulation_parameters: args.physics.params(),
        local_external_potential: args.external_potentials.into_iter().collect::<IndexMap<_, _>>(),
        global_potential: args.global_potential,
        validity_witness_partitioning_max_cluster_size_gss: args.witness_partitioning_limit,
        num_overlapping_witnesses_limit_gss: args.overlapping_witnesses_limit,
        stability_error: args.stability_error,
        available_threads: args.threads.unwrap_or_else(default_available_threads),
        report_gss_stats: args.report_gss_stats,
        linkage_method: args.linkage,
    };
    let result = clustercomplete(&layout, &params)?;
    print_result(&result, args.output.format)
}

fn cmd_flitsim(args: FlitsimArgs) -> Result<()> {
    let layout = args.layout.load()?;
    let threads = args.threads.unwrap_or_else(default_available_threads);
    let result = flitsim(&layout, &args.physics.params(), args.witness_partitioning_limit, threads)?;
    print_result(&result, args.output.format)
}

fn cmd_exhaustive(args: ExhaustiveArgs) -> Result<()> {
    let layout = args.layout.load()?;
    let params = ExhaustiveParams {
        simulation_parameters: args.physics.params(),
        local_external_potential: args.external_potentials.into_iter().collect(),
        global_potential: args.global_potential,
        max_configurations: args.max_configurations,
    };
    let result = exhaustive_ground_state_simulation(&layout, &params)?;
    print_result(&result, args.output.format)
}

fn cmd_gss(args: GssArgs) -> Result<()> {
    let layout = args.layout.load()?;
    let params = GroundStateSpaceParams {
        simulation_parameters: args.physics.params(),
        witness_partitioning_cluster_size_limit: args.witness_partitioning_limit,
        num_overlapping_witnesses_limit: args.overlapping_witnesses_limit,
        stability_error: args.stability_error,
        linkage_method: args.linkage,
    };
    let gss = ground_state_space(&layout, &params)?;
    gss.report();
    match args.output.format {
        OutputFormat::Text => {
            if let Some(space) = gss.top_charge_space() {
                for (m, compositions) in space {
                    println!("{m}  ({} composition(s))", compositions.len());
                }
            }
        }
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&gss.stats())?),
    }
    Ok(())
}

fn main() {
    clilog::init_stderr_color_debug();
    let cli = Cli::parse();
    clilog::debug!("sidbsim args:\n{:#?}", cli.command);

    let ret = match cli.command {
        Commands::Clustercomplete(args) => cmd_clustercomplete(args),
        Commands::Flitsim(args) => cmd_flitsim(args),
        Commands::Exhaustive(args) => cmd_exhaustive(args),
        Commands::Gss(args) => cmd_gss(args),
    };
    if let Err(e) = ret {
        clilog::error!("{}", e);
        std::process::exit(1);
    }
}
