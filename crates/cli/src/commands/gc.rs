// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `workspacectl gc run` — force an out-of-band sweep (spec §4.4).

use anyhow::Result;

use crate::client::DaemonClient;
use crate::output::OutputFormat;

pub async fn handle(format: OutputFormat) -> Result<()> {
    let client = DaemonClient::new();
    let result = client.run_gc().await?;

    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&result)?),
        OutputFormat::Text => {
            println!("{}", crate::color::header("gc sweep complete"));
            println!("  destroyed: {}", result.destroyed_count);
            println!("  orphans: {}", result.orphan_count);
        }
    }

    Ok(())
}
