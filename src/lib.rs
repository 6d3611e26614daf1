//! Atelier inventory engine
//!
//! Per-location stock ledger with reservations, audited adjustments,
//! inter-location transfers and low-stock alerting.
#![forbid(unsafe_code)]
#![deny(rust_2018_idioms)]
#![allow(elided_lifetimes_in_paths)]
#![warn(clippy::all, clippy::perf, clippy::dbg_macro)]

pub mod config;
pub mod db;
pub mod entities;
pub mod errors;
pub mod events;
pub mod metrics;
pub mod migrator;
pub mod services;

pub use config::{AppConfig, DecreasePolicy, InventorySettings, RetryPolicy};
pub use entities::{AdjustmentType, StockRef, TransferStatus};
pub use errors::ServiceError;
pub use events::{EventEnvelope, EventPublisher, EventSender, InventoryEvent, RecordingPublisher};
pub use services::InventoryServices;
