//! Sinks de auditoria: HTTP para o colaborador de persistência e
//! `tracing` quando nenhum endpoint está configurado.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::Client;
use sandwich_core::traits::AuditSink;
use sandwich_core::{AuditRecord, Error as CoreError};
use serde::Serialize;
use std::time::Duration;
use thiserror::Error;
use tracing::{info, warn};

/// Tipo de erro retornado pelo sink HTTP.
#[derive(Debug, Error)]
pub enum AuditError {
    #[error("failed to send audit record: {0}")]
    Request(#[from] reqwest::Error),
}

impl From<AuditError> for CoreError {
    fn from(err: AuditError) -> Self {
        CoreError::Other(err.to_string())
    }
}

/// Envelope enviado ao colaborador.
#[derive(Serialize)]
struct AuditEnvelope<'a> {
    source: &'a str,
    #[serde(flatten)]
    record: &'a AuditRecord,
    sent_at: DateTime<Utc>,
}

/// Cliente simples para envio de registros via HTTP POST.
pub struct HttpAuditSink {
    endpoint: String,
    source: String,
    client: Client,
}

impl HttpAuditSink {
    /// Cria uma nova instância apontando para `endpoint`.
    pub fn new(endpoint: impl Into<String>) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(5))
            .build()
            .unwrap_or_else(|_| Client::new());
        Self {
            endpoint: endpoint.into(),
            source: "sandwich-engine".to_string(),
            client,
        }
    }

    /// Identificação da origem gravada em cada registro
    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = source.into();
        self
    }

    /// Envia um registro.
    pub async fn send(&self, record: &AuditRecord) -> Result<(), AuditError> {
        let envelope = AuditEnvelope {
            source: &self.source,
            record,
            sent_at: Utc::now(),
        };
        self.client
            .post(&self.endpoint)
            .json(&envelope)
            .send()
            .await?
            .error_for_status()?;
        Ok(())
    }
}

#[async_trait]
impl AuditSink for HttpAuditSink {
    async fn record(&self, record: AuditRecord) -> sandwich_core::Result<()> {
        if let Err(e) = self.send(&record).await {
            warn!(kind = record.kind(), error = %e, "falha ao enviar registro de auditoria");
            return Err(e.into());
        }
        Ok(())
    }
}

/// Sink que apenas registra em log estruturado.
#[derive(Debug, Default, Clone)]
pub struct TracingAuditSink;

#[async_trait]
impl AuditSink for TracingAuditSink {
    async fn record(&self, record: AuditRecord) -> sandwich_core::Result<()> {
        let payload = serde_json::to_string(&record)
            .map_err(|e| CoreError::Other(format!("failed to serialize audit record: {e}")))?;
        info!(target: "audit", kind = record.kind(), %payload);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ethereum_types::H256;
    use wiremock::matchers::{body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn send_reject_succeeds() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/"))
            .and(body_partial_json(serde_json::json!({
                "source": "sandwich-engine",
                "kind": "reject",
                "reason": "contract is in the blacklist"
            })))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        let sink = HttpAuditSink::new(server.uri());
        let record = AuditRecord::reject(H256::repeat_byte(7), None, "contract is in the blacklist");
        assert!(sink.record(record).await.is_ok());
    }

    #[tokio::test]
    async fn server_error_is_reported() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let sink = HttpAuditSink::new(server.uri()).with_source("test");
        let record = AuditRecord::reject(H256::zero(), None, "kill switch is on");
        assert!(sink.record(record).await.is_err());
    }

    #[tokio::test]
    async fn tracing_sink_never_fails() {
        let record = AuditRecord::reject(H256::zero(), None, "malformed tx");
        assert!(TracingAuditSink.record(record).await.is_ok());
    }
}
