//! Function runtime loop

use crate::wiring::{build_orchestrator, load_config};
use anyhow::Result;
use clap::Args;
use lambda_runtime::{service_fn, LambdaEvent};
use normalizer_orchestrator::InvocationResponse;
use serde_json::Value;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

#[derive(Args)]
pub struct LambdaCommand {
    /// YAML settings file; the environment is used when omitted
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,
}

impl LambdaCommand {
    pub async fn execute(self) -> Result<()> {
        let config = load_config(self.config.as_deref())?;
        let orchestrator = Arc::new(build_orchestrator(config).await?);

        info!("Waiting for invocations");
        lambda_runtime::run(service_fn(move |event: LambdaEvent<Value>| {
            let orchestrator = orchestrator.clone();
            async move {
                info!(request_id = %event.context.request_id, "Invocation received");
                Ok::<InvocationResponse, lambda_runtime::Error>(
                    orchestrator.handle_event(event.payload).await,
                )
            }
        }))
        .await
        .map_err(|e| anyhow::anyhow!("Function runtime stopped: {e}"))
    }
}
