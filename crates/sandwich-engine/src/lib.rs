/*! Sandwich Engine
 *
 * Motor de detecção e execução de sandwich sobre a mempool. Classifica
 * transações pendentes destinadas aos routers registrados, avalia a
 * oportunidade contra as regras configuradas e, quando aceita, envia o par
 * frontrun/backrun a partir de uma carteira livre.
 */

pub mod approvals;
pub mod classifier;
pub mod config;
pub mod dex;
pub mod dispatcher;
pub mod engine;
pub mod evaluator;
pub mod filters;
pub mod market;
pub mod mempool;
pub mod registry;
pub mod signer;
pub mod supervisor;
pub mod wallet;

pub use classifier::{classify, Classification, SwapIntent};
pub use config::{ActiveConfig, ConfigSnapshot, ConfigStore};
pub use dispatcher::{DispatchOptions, DispatchReport, DispatchStage, SandwichDispatcher};
pub use engine::{Engine, Outcome};
pub use evaluator::{Decision, Evaluator, Opportunity};
pub use wallet::{AllowanceKey, WalletLease, WalletStateCache};
