//! One-shot processing of a saved event or explicit keys

use crate::wiring::{build_orchestrator, load_config};
use anyhow::{Context as _, Result};
use clap::Args;
use normalizer_orchestrator::{InvocationResponse, NotificationBatch};
use serde_json::Value;
use std::io::Read as _;
use std::path::PathBuf;

#[derive(Args)]
pub struct InvokeCommand {
    /// Event document to process, `-` for stdin
    #[arg(
        short,
        long,
        value_name = "FILE",
        conflicts_with = "keys",
        required_unless_present = "keys"
    )]
    event: Option<String>,

    /// Object key to process as a created-object record (repeatable)
    #[arg(short, long = "key", value_name = "KEY")]
    keys: Vec<String>,

    /// YAML settings file; the environment is used when omitted
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,
}

impl InvokeCommand {
    pub async fn execute(self) -> Result<()> {
        let config = load_config(self.config.as_deref())?;
        let bucket = config.bucket.clone();
        let orchestrator = build_orchestrator(config).await?;

        let response = match &self.event {
            Some(source) => orchestrator.handle_event(read_event(source)?).await,
            None => {
                let batch = NotificationBatch::from_keys(&bucket, &self.keys);
                InvocationResponse::from(&orchestrator.process_batch(&batch).await)
            }
        };

        println!(
            "{}",
            serde_json::to_string_pretty(&response).context("Failed to encode response")?
        );
        Ok(())
    }
}

fn read_event(source: &str) -> Result<Value> {
    let raw = if source == "-" {
        let mut raw = String::new();
        std::io::stdin()
            .read_to_string(&mut raw)
            .context("Failed to read event from stdin")?;
        raw
    } else {
        std::fs::read_to_string(source).with_context(|| format!("Failed to read event {source}"))?
    };

    serde_json::from_str(&raw).context("Event is not valid JSON")
}
