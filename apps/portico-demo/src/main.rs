use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use clap::Parser;
use portico_core::{CallContext, Consumer, Portal};
use portico_http::{HandlerError, HttpPortal, HttpPortalConfig, http_handler};
use portico_local::{LocalPortal, local_handler};
use portico_schema::{FunctionSchema, ValueSchema};
use portico_script::{ScriptPortal, ScriptPortalConfig, ScriptSource};
use serde_json::{Value, json};
use tracing::info;

#[derive(Debug, Parser)]
#[command(name = "portico-demo")]
#[command(about = "Registers add(a, b) on every transport and calls each through one consumer")]
struct Cli {
    #[arg(long, default_value = "127.0.0.1")]
    host: String,
    /// 0 picks an ephemeral port
    #[arg(long, default_value_t = 0)]
    port: u16,
}

fn add_schema() -> FunctionSchema {
    FunctionSchema::builder("add")
        .description("sum of two numbers")
        .required_input("a", ValueSchema::Number)
        .required_input("b", ValueSchema::Number)
        .output(ValueSchema::Number)
        .build()
}

fn number(params: &Value, key: &str) -> Result<f64, String> {
    params[key]
        .as_f64()
        .ok_or_else(|| format!("{key} must be a number"))
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter("info")
        .compact()
        .init();

    let cli = Cli::parse();
    let ctx = CallContext::with_timeout(Duration::from_secs(5));
    let consumer = Consumer::new();

    // In-process transport.
    let local = Arc::new(LocalPortal::new());
    let local_add = local_handler(|params: Value| {
        Ok(json!(number(&params, "a")? + number(&params, "b")?))
    });
    let local_address = local.generate_address("add", &local_add)?;
    local
        .apply(&local_address, add_schema(), local_add)
        .await?;
    consumer.mount(local.clone())?;

    // Network transport: the same portal instance plays provider and
    // consumer here.
    let http = Arc::new(HttpPortal::new(HttpPortalConfig {
        host: cli.host.clone(),
        port: cli.port,
        ..Default::default()
    })?);
    let bound = http.start_server().await?;
    info!(addr = %bound, "portal server listening");

    let http_add = http_handler(|params: Value| async move {
        let a = number(&params, "a").map_err(HandlerError::new)?;
        let b = number(&params, "b").map_err(HandlerError::new)?;
        Ok(json!(a + b))
    });
    let http_address = http.generate_address("add", &http_add)?;
    http.apply(&http_address, add_schema(), http_add).await?;
    consumer.mount(http.clone())?;

    // Sandboxed script transport.
    let script = Arc::new(ScriptPortal::new(ScriptPortalConfig::default()));
    let script_add = ScriptSource::new("fn add(a, b) { a + b }");
    let script_address = script.generate_address("add", &script_add)?;
    script
        .apply(&script_address, add_schema(), script_add)
        .await?;
    consumer.mount(script.clone())?;

    info!(schemes = ?consumer.schemes(), "portals mounted");

    let params = json!({"a": 2, "b": 3});
    for address in [&local_address, &http_address, &script_address] {
        let result = consumer.call_at(&ctx, address, params.clone()).await?;
        info!(address = %address, %result, "call complete");
    }

    // Wrong-typed parameters never reach a handler on any transport.
    let rejected = consumer
        .call_at(&ctx, &http_address, json!({"a": 2, "b": "three"}))
        .await;
    if let Err(error) = rejected {
        info!(%error, "invalid call rejected before dispatch");
    }

    http.stop_server(Duration::from_secs(2)).await;
    Ok(())
}
