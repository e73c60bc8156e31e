use ethers::providers::{Middleware, Provider, Ws};
use futures::StreamExt;
use sandwich_core::traits::PendingStream;
use sandwich_core::{Error, Result, TransactionHash};
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

const CHANNEL_CAPACITY: usize = 8192;

/// Abre a assinatura de transações pendentes.
///
/// A primeira conexão é feita aqui, então falha de discagem retorna
/// `ConnectionError` ao chamador. Depois disso a tarefa de fundo reassina
/// com intervalo fixo, alternando entre os endpoints, e só emite o erro
/// fatal quando as tentativas consecutivas se esgotam.
pub(crate) async fn open(
    endpoints: Vec<String>,
    dial_timeout: Duration,
    retry_delay: Duration,
    max_retries: u32,
) -> Result<PendingStream> {
    let first = endpoints
        .first()
        .cloned()
        .ok_or_else(|| Error::ConfigError("no websocket endpoint configured".to_string()))?;
    let provider = dial(&first, dial_timeout)
        .await
        .map_err(|e| Error::ConnectionError(format!("{first}: {e}")))?;

    let (tx, rx) = mpsc::channel(CHANNEL_CAPACITY);
    tokio::spawn(run(endpoints, provider, tx, dial_timeout, retry_delay, max_retries));

    let stream = futures::stream::unfold(rx, |mut rx| async move {
        rx.recv().await.map(|item| (item, rx))
    });
    Ok(stream.boxed())
}

/// Conexão WS com prazo; endpoint travado conta como falha
async fn dial(endpoint: &str, timeout: Duration) -> std::result::Result<Provider<Ws>, String> {
    match tokio::time::timeout(timeout, Provider::<Ws>::connect(endpoint)).await {
        Ok(Ok(provider)) => Ok(provider),
        Ok(Err(e)) => Err(e.to_string()),
        Err(_) => Err(format!("dial timed out after {timeout:?}")),
    }
}

async fn run(
    endpoints: Vec<String>,
    initial: Provider<Ws>,
    tx: mpsc::Sender<Result<TransactionHash>>,
    dial_timeout: Duration,
    retry_delay: Duration,
    max_retries: u32,
) {
    let mut current = Some(initial);
    let mut failures: u32 = 0;
    let mut cursor = 0usize;

    loop {
        let endpoint = &endpoints[cursor % endpoints.len()];
        let connected = match current.take() {
            Some(provider) => Ok(provider),
            None => dial(endpoint, dial_timeout).await,
        };

        let last_error = match connected {
            Ok(provider) => match provider.subscribe_pending_txs().await {
                Ok(mut stream) => {
                    info!(endpoint = %endpoint, "assinatura da mempool ativa");
                    failures = 0;
                    while let Some(hash) = stream.next().await {
                        if tx.send(Ok(hash)).await.is_err() {
                            debug!("consumidor da mempool encerrado");
                            return;
                        }
                    }
                    "subscription closed by node".to_string()
                }
                Err(e) => e.to_string(),
            },
            Err(e) => e,
        };

        failures += 1;
        if failures > max_retries {
            error!(attempts = failures, error = %last_error, "reconexões esgotadas");
            let _ = tx
                .send(Err(Error::RetriesExhausted {
                    attempts: failures,
                    last: last_error,
                }))
                .await;
            return;
        }

        cursor += 1;
        warn!(
            attempt = failures,
            endpoint = %endpoints[cursor % endpoints.len()],
            error = %last_error,
            "reassinando mempool em {:?}",
            retry_delay
        );
        tokio::time::sleep(retry_delay).await;
        if tx.is_closed() {
            return;
        }
    }
}
