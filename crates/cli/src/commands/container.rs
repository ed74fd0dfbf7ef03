// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `workspacectl container ls|destroy` — direct backend diagnostics,
//! bypassing the conversation lock (operator escape hatch only).

use anyhow::Result;

use crate::client::DaemonClient;
use crate::output::OutputFormat;

pub async fn ls(format: OutputFormat) -> Result<()> {
    let client = DaemonClient::new();
    let containers = client.list_containers().await?;

    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&containers)?),
        OutputFormat::Text => {
            if containers.is_empty() {
                println!("No sandbox containers");
                return Ok(());
            }
            println!("{}", crate::color::header("sandbox containers"));
            for c in &containers {
                let conv = c.conversation_id.as_deref().unwrap_or("-");
                println!(
                    "  {}  {}  conversation={}  age={}",
                    c.id,
                    c.state,
                    conv,
                    crate::output::format_time_ago(c.created_at_ms)
                );
            }
        }
    }

    Ok(())
}

pub async fn destroy(id: String) -> Result<()> {
    let client = DaemonClient::new();
    client.destroy_container(&id).await?;
    println!("destroyed {id}");
    Ok(())
}
