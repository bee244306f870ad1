/*!
 * Core Module
 * Fundamental scheduler types, limits, and error handling
 */

pub mod errors;
pub mod limits;
pub mod tti;
pub mod types;

// Re-export for convenience
pub use errors::*;
pub use tti::{SlotContext, TtiPoint};
pub use types::*;
