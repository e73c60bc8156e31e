/*!
 * Sandwich Core
 *
 * Tipos, erros e capacidades compartilhados pela workspace
 */

pub mod error;
pub mod traits;
pub mod types;
pub mod utils;

// Re-exportações públicas
pub use error::{Error, Result};
pub use types::*;
