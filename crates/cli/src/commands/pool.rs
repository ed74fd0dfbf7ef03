// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `workspacectl pool status` — warm pool occupancy (spec §4.3).

use anyhow::Result;

use crate::client::DaemonClient;
use crate::output::OutputFormat;

pub async fn handle(format: OutputFormat) -> Result<()> {
    let client = DaemonClient::new();
    let status = client.pool_status().await?;

    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&status)?),
        OutputFormat::Text => {
            println!("{}", crate::color::header("warm pool"));
            println!("  size: {} (min={}, max={})", status.size, status.min, status.max);
            println!("  exhaustion events: {}", status.exhaustion_count);
        }
    }

    Ok(())
}
