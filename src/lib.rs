//! Token-Lab Backend Library
//!
//! Deterministic research pipeline for on-chain token trading data:
//! raw swap/liquidity events are replayed into normalized series and
//! derived features, exit strategies are simulated under adverse
//! execution scenarios, and a multi-criterion gate emits a reproducible
//! GO / NO-GO / INSUFFICIENT_DATA decision with a full audit report.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                        run_pipeline                          │
//! │   (orchestration, error categorization, cancellation)        │
//! └──────────────────────────────────────────────────────────────┘
//!        │            │              │             │
//!        ▼            ▼              ▼             ▼
//! ┌──────────┐ ┌────────────┐ ┌───────────┐ ┌───────────┐
//! │ replay / │ │ simulation │ │ aggregate │ │ decision  │
//! │ normalize│ │ (strategy) │ │ (stats)   │ │ gate      │
//! └──────────┘ └────────────┘ └───────────┘ └───────────┘
//!        │            │              │             │
//!        └────────────┴──────┬───────┴─────────────┘
//!                            ▼
//!               ┌─────────────────────────┐
//!               │   storage contracts     │
//!               │ (memory | sqlite impls) │
//!               └─────────────────────────┘
//!                            │
//!                            ▼
//!               ┌─────────────────────────┐
//!               │  report + data version  │
//!               │ (content-addressed run) │
//!               └─────────────────────────┘
//! ```
//!
//! # Determinism Guarantees
//!
//! - One canonical comparator: `(slot, tx_signature, event_index, kind)`,
//!   defined in [`ordering`] and reused by every consumer
//! - No wall clock in the core; report timestamps are caller-supplied
//! - Content-addressed ids ([`ids`]) and a content-addressed input
//!   universe ([`data_version`])
//! - Stored trades replay bit-stably ([`verification`])

pub mod aggregate;
pub mod cancel;
pub mod data_version;
pub mod decision;
pub mod events;
pub mod fixtures;
pub mod ids;
pub mod normalize;
pub mod ordering;
pub mod pipeline;
pub mod replay;
pub mod report;
pub mod scenario;
pub mod series;
pub mod simulation;
pub mod stats;
pub mod storage;
pub mod strategy;
pub mod sufficiency;
pub mod trade;
pub mod verification;

#[cfg(test)]
mod aggregate_tests;
#[cfg(test)]
mod strategy_tests;
#[cfg(test)]
mod sufficiency_tests;

pub use cancel::CancellationToken;
pub use decision::GateDecision;
pub use pipeline::{run_pipeline, PipelineConfig, PipelineError};
pub use report::{ReportWriter, RunReport};
pub use storage::Stores;
