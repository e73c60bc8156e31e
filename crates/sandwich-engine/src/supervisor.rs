//! Workers de longa duração com política de reinício e sinal de
//! encerramento explícito.

use sandwich_core::{Error, Result};
use std::future::Future;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

#[derive(Debug, Clone, Copy)]
pub struct RestartPolicy {
    pub delay: Duration,
    pub max_restarts: u32,
}

impl Default for RestartPolicy {
    fn default() -> Self {
        Self {
            delay: Duration::from_secs(1),
            max_restarts: 100,
        }
    }
}

/// Como um worker reage ao término
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerKind {
    /// Reinicia sempre que termina, com erro ou não
    Service,
    /// Termina com sucesso uma vez; só reinicia em falha
    OneShot,
}

/// Falha que deve encerrar o processo
#[derive(Debug, Clone)]
pub struct FatalExit {
    pub worker: &'static str,
    pub error: Error,
}

pub struct Supervisor {
    policy: RestartPolicy,
    shutdown_tx: watch::Sender<bool>,
    shutdown_rx: watch::Receiver<bool>,
    fatal_tx: mpsc::UnboundedSender<FatalExit>,
    fatal_rx: mpsc::UnboundedReceiver<FatalExit>,
    handles: Vec<(&'static str, JoinHandle<()>)>,
}

impl Supervisor {
    pub fn new(policy: RestartPolicy) -> Self {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let (fatal_tx, fatal_rx) = mpsc::unbounded_channel();
        Self {
            policy,
            shutdown_tx,
            shutdown_rx,
            fatal_tx,
            fatal_rx,
            handles: Vec::new(),
        }
    }

    pub fn shutdown_signal(&self) -> watch::Receiver<bool> {
        self.shutdown_rx.clone()
    }

    pub fn len(&self) -> usize {
        self.handles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }

    /// Inicia um worker. `factory` é chamada a cada (re)início.
    pub fn spawn<F, Fut>(&mut self, name: &'static str, kind: WorkerKind, factory: F)
    where
        F: Fn(watch::Receiver<bool>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<()>> + Send + 'static,
    {
        let policy = self.policy;
        let mut shutdown = self.shutdown_rx.clone();
        let fatal = self.fatal_tx.clone();

        let handle = tokio::spawn(async move {
            let mut restarts = 0u32;
            loop {
                let run = tokio::spawn(factory(shutdown.clone()));
                let outcome = run.await;
                if *shutdown.borrow() {
                    info!(worker = name, "worker encerrado");
                    return;
                }
                match outcome {
                    Ok(Ok(())) if kind == WorkerKind::OneShot => {
                        info!(worker = name, "worker concluído");
                        return;
                    }
                    Ok(Ok(())) => warn!(worker = name, "worker terminou sem sinal de encerramento"),
                    Ok(Err(e)) if e.is_fatal() => {
                        error!(worker = name, error = %e, "falha fatal");
                        let _ = fatal.send(FatalExit { worker: name, error: e });
                        return;
                    }
                    Ok(Err(e)) => warn!(worker = name, error = %e, "worker falhou"),
                    Err(join) if join.is_panic() => error!(worker = name, "worker entrou em pânico"),
                    Err(join) => warn!(worker = name, error = %join, "worker cancelado"),
                }

                restarts += 1;
                if restarts > policy.max_restarts {
                    let e = Error::Other(format!("worker {name} exceeded {} restarts", policy.max_restarts));
                    error!(worker = name, "limite de reinícios atingido");
                    let _ = fatal.send(FatalExit { worker: name, error: e });
                    return;
                }
                warn!(worker = name, attempt = restarts, delay = ?policy.delay, "reiniciando worker");
                tokio::select! {
                    _ = tokio::time::sleep(policy.delay) => {}
                    _ = shutdown.changed() => return,
                }
            }
        });
        self.handles.push((name, handle));
    }

    /// Aguarda a primeira falha fatal
    pub async fn wait_fatal(&mut self) -> Option<FatalExit> {
        self.fatal_rx.recv().await
    }

    /// Sinaliza o encerramento e aguarda os workers até `grace`
    pub async fn shutdown(self, grace: Duration) {
        let _ = self.shutdown_tx.send(true);
        for (name, handle) in self.handles {
            if tokio::time::timeout(grace, handle).await.is_err() {
                warn!(worker = name, "worker não encerrou no prazo");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    fn fast_policy(max_restarts: u32) -> RestartPolicy {
        RestartPolicy {
            delay: Duration::from_millis(5),
            max_restarts,
        }
    }

    #[tokio::test]
    async fn failing_worker_is_restarted() {
        let mut sup = Supervisor::new(fast_policy(10));
        let runs = Arc::new(AtomicU32::new(0));
        let counter = runs.clone();
        sup.spawn("flaky", WorkerKind::OneShot, move |_| {
            let counter = counter.clone();
            async move {
                if counter.fetch_add(1, Ordering::SeqCst) < 2 {
                    return Err(Error::RpcError("boom".to_string()));
                }
                Ok(())
            }
        });
        tokio::time::sleep(Duration::from_millis(200)).await;
        assert_eq!(runs.load(Ordering::SeqCst), 3);
        sup.shutdown(Duration::from_secs(1)).await;
    }

    #[tokio::test]
    async fn panics_are_caught_and_restarted() {
        let mut sup = Supervisor::new(fast_policy(10));
        let runs = Arc::new(AtomicU32::new(0));
        let counter = runs.clone();
        sup.spawn("panicky", WorkerKind::OneShot, move |_| {
            let counter = counter.clone();
            async move {
                if counter.fetch_add(1, Ordering::SeqCst) == 0 {
                    panic!("first run panics");
                }
                Ok(())
            }
        });
        tokio::time::sleep(Duration::from_millis(200)).await;
        assert_eq!(runs.load(Ordering::SeqCst), 2);
        sup.shutdown(Duration::from_secs(1)).await;
    }

    #[tokio::test]
    async fn exhausted_retries_are_fatal() {
        let mut sup = Supervisor::new(fast_policy(10));
        sup.spawn("subscription", WorkerKind::Service, |_| async {
            Err(Error::RetriesExhausted {
                attempts: 10,
                last: "refused".to_string(),
            })
        });
        let exit = tokio::time::timeout(Duration::from_secs(1), sup.wait_fatal())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(exit.worker, "subscription");
        assert!(exit.error.is_fatal());
    }

    #[tokio::test]
    async fn restart_limit_is_fatal() {
        let mut sup = Supervisor::new(fast_policy(2));
        sup.spawn("always-failing", WorkerKind::Service, |_| async {
            Err(Error::RpcError("down".to_string()))
        });
        let exit = tokio::time::timeout(Duration::from_secs(1), sup.wait_fatal())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(exit.worker, "always-failing");
    }

    #[tokio::test]
    async fn shutdown_stops_services() {
        let mut sup = Supervisor::new(fast_policy(10));
        sup.spawn("loop", WorkerKind::Service, |mut shutdown| async move {
            let _ = shutdown.changed().await;
            Ok(())
        });
        assert_eq!(sup.len(), 1);
        tokio::time::timeout(Duration::from_secs(1), sup.shutdown(Duration::from_secs(1)))
            .await
            .unwrap();
    }
}
