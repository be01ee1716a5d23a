//! Ingestion → conversion → fan-out delivery pipeline.
//!
//! ```text
//! upload ──▶ classify ──▶ convert (unless .epub) ──▶ deliver ×N ──▶ report
//!                                                        │
//!                           cleanup of every artifact ◀──┘ (always)
//! ```

pub mod classifier;
pub mod converter;
pub mod delivery;
pub mod orchestrator;
pub mod types;

pub use classifier::{FormatClass, classify};
pub use converter::{Converter, EbookConvert};
pub use delivery::{DeliveryEngine, MailRelay, MailSession, OutboundMessage, SmtpRelay};
pub use orchestrator::JobOrchestrator;
pub use types::*;
