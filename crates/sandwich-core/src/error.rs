use ethereum_types::U256;
use thiserror::Error;

/// Erros comuns do motor de sandwich.
///
/// As mensagens são exibidas na trilha de auditoria, por isso ficam em
/// inglês e legíveis por operadores.
#[derive(Error, Debug, Clone)]
pub enum Error {
    /// Node inacessível; tratado com reconexão
    #[error("connection error: {0}")]
    ConnectionError(String),

    /// Reconexões esgotadas; único erro fatal para o processo
    #[error("connection retries exhausted after {attempts} attempts: {last}")]
    RetriesExhausted { attempts: u32, last: String },

    /// Orçamento de latência de uma chamada estourado
    #[error("deadline exceeded: {0}")]
    DeadlineExceeded(String),

    /// Calldata não reconhecida ou malformada
    #[error("decode error: {0}")]
    DecodeError(String),

    /// Allowance insuficiente para o valor do frontrun
    #[error("insufficient allowance: have {have}, need {need}")]
    InsufficientAllowance { have: U256, need: U256 },

    /// Saldo insuficiente para o valor do frontrun
    #[error("insufficient balance: have {have}, need {need}")]
    InsufficientBalance { have: U256, need: U256 },

    /// Nenhuma carteira de ataque livre
    #[error("wallet lock engaged")]
    WalletUnavailable,

    /// Falha ao enviar transação assinada
    #[error("submission error: {0}")]
    SubmissionError(String),

    /// Falha ao assinar transação
    #[error("signing error: {0}")]
    SigningError(String),

    /// Erro genérico de RPC
    #[error("rpc error: {0}")]
    RpcError(String),

    /// Configuração inválida
    #[error("config error: {0}")]
    ConfigError(String),

    /// Recurso não encontrado
    #[error("not found: {0}")]
    NotFound(String),

    /// Erro genérico
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Indica se o erro deve derrubar o processo.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Error::RetriesExhausted { .. })
    }
}

/// Tipo de resultado usado em toda a workspace
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_exhausted_retries_are_fatal() {
        assert!(Error::RetriesExhausted { attempts: 3, last: "eof".into() }.is_fatal());
        assert!(!Error::ConnectionError("refused".into()).is_fatal());
        assert!(!Error::DeadlineExceeded("280ms".into()).is_fatal());
        assert!(!Error::WalletUnavailable.is_fatal());
    }

    #[test]
    fn wallet_unavailable_reads_as_lock_engaged() {
        assert_eq!(Error::WalletUnavailable.to_string(), "wallet lock engaged");
    }
}
