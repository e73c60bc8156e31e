use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use sandwich_audit::{HttpAuditSink, TracingAuditSink};
use sandwich_core::traits::SharedAuditSink;
use sandwich_engine::{ConfigSnapshot, ConfigStore, Engine};
use sandwich_rpc::EvmChainClient;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Snapshot de configuração em JSON
    #[arg(long, short, default_value = "config.json")]
    config: PathBuf,

    /// Monta e assina as pernas sem enviá-las
    #[arg(long)]
    dry_run: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();
    let snapshot = ConfigSnapshot::from_file(&cli.config)
        .with_context(|| format!("falha ao carregar {}", cli.config.display()))?;
    if cli.dry_run || snapshot.dry_run {
        warn!("modo dry-run: nenhuma transação será enviada");
    }

    let client = EvmChainClient::new(snapshot.rpc_config()).context("falha ao criar cliente RPC")?;
    let audit: SharedAuditSink = match &snapshot.audit.endpoint {
        Some(endpoint) => Arc::new(HttpAuditSink::new(endpoint.clone()).with_source("sandwich-engine")),
        None => Arc::new(TracingAuditSink),
    };
    let config = Arc::new(if cli.dry_run {
        ConfigStore::with_forced_dry_run(snapshot)
    } else {
        ConfigStore::new(snapshot)
    });

    let engine = Arc::new(
        Engine::new(Arc::new(client), config, audit)
            .context("falha ao montar o motor")?
            .with_config_path(&cli.config),
    );
    let mut supervisor = engine.start();
    info!("motor em execução");

    let exit = tokio::select! {
        signal = tokio::signal::ctrl_c() => {
            signal.context("falha ao aguardar ctrl-c")?;
            info!("encerrando");
            Ok(())
        }
        fatal = supervisor.wait_fatal() => match fatal {
            Some(exit) => {
                error!(worker = exit.worker, error = %exit.error, "falha fatal");
                Err(anyhow::anyhow!("worker {} falhou: {}", exit.worker, exit.error))
            }
            None => Ok(()),
        },
    };

    supervisor.shutdown(Duration::from_secs(5)).await;
    exit
}
