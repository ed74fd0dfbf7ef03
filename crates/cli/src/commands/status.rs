// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `workspacectl status` — daemon health snapshot.

use anyhow::Result;

use crate::client::DaemonClient;
use crate::output::OutputFormat;

pub async fn handle(format: OutputFormat) -> Result<()> {
    let client = DaemonClient::new();
    let health = match client.health().await {
        Ok(h) => h,
        Err(e) => {
            println!("Daemon is not reachable: {e}");
            return Ok(());
        }
    };

    match format {
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(&health)?);
        }
        OutputFormat::Text => {
            println!("{}", crate::color::header("daemon"));
            println!("  uptime: {}s", health.uptime_secs);
            println!("  warm pool: {}", health.warm_pool_size);
            println!("  active executions: {}", health.active_executions);
            println!("  last gc sweep: {}", crate::output::format_time_ago(health.last_gc_sweep_ms));
            if let Some(err) = &health.last_error {
                println!("  {}: {}", crate::color::muted("last error"), err);
            }
        }
    }

    Ok(())
}
