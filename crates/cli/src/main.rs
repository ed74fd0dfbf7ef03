// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `workspacectl`: thin operator CLI for local diagnostics against a
//! running `wcod` daemon. Talks to the daemon's `/admin/*` and
//! `/healthz` HTTP surface — ambient tooling, not a spec module.

#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

mod client;
mod color;
mod commands;
mod output;

use clap::{CommandFactory, FromArgMatches, Parser, Subcommand};
use output::OutputFormat;

#[derive(Parser)]
#[command(name = "workspacectl", version, about = "Operator CLI for the workspace container orchestration daemon")]
struct Cli {
    #[arg(short = 'o', long = "format", value_enum, default_value_t, global = true)]
    format: OutputFormat,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Daemon health snapshot.
    Status,
    /// Warm pool diagnostics.
    #[command(subcommand)]
    Pool(PoolCommand),
    /// Garbage collector diagnostics.
    #[command(subcommand)]
    Gc(GcCommand),
    /// Sandbox container diagnostics.
    #[command(subcommand)]
    Container(ContainerCommand),
}

#[derive(Subcommand)]
enum PoolCommand {
    /// Show the warm pool's current occupancy.
    Status,
}

#[derive(Subcommand)]
enum GcCommand {
    /// Force an out-of-band GC sweep.
    Run,
}

#[derive(Subcommand)]
enum ContainerCommand {
    /// List every sandbox container the backend knows about.
    Ls,
    /// Destroy one container by id, bypassing the conversation lock.
    Destroy {
        #[arg(value_name = "CONTAINER_ID")]
        id: String,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let matches = Cli::command().styles(color::styles()).get_matches();
    let cli = Cli::from_arg_matches(&matches)?;

    match cli.command {
        Command::Status => commands::status::handle(cli.format).await,
        Command::Pool(PoolCommand::Status) => commands::pool::handle(cli.format).await,
        Command::Gc(GcCommand::Run) => commands::gc::handle(cli.format).await,
        Command::Container(ContainerCommand::Ls) => commands::container::ls(cli.format).await,
        Command::Container(ContainerCommand::Destroy { id }) => commands::container::destroy(id).await,
    }
}
