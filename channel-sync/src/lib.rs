//! Hub channel synchronization
//!
//! Keeps the hub's channel bookkeeping in step with the lightning daemon and
//! publishes every lifecycle change to in-process subscribers.
//!
//! # Architecture
//!
//! ```text
//!  ┌──────────────┐ lists ┌──────────────────────────────┐  events  ┌─────────────┐
//!  │ DaemonClient │──────▶│          SyncEngine          │────────▶│ Broadcaster │──▶ subscribers
//!  └──────────────┘       │ plan → backfill → persist →  │          └─────────────┘
//!  ┌──────────────┐  txs  │ index → publish              │
//!  │   Explorer   │──────▶│                              │──────▶ Storage (info, channels, index)
//!  └──────────────┘       └──────────────────────────────┘
//!                                  ▲ tick / trigger
//!                          ┌───────┴───────┐
//!                          │ spawn_sync_loop│
//!                          └───────────────┘
//! ```
//!
//! # Guarantees
//!
//! - Channels only move forward; an observation implying a backward move is
//!   reported and the channel is left untouched
//! - Skipped phases are synthesized in order, with unrecoverable fields
//!   recorded as lost rather than left blank
//! - Events are published after the state they describe has been persisted
//! - Re-running a tick against an unchanged daemon writes and publishes nothing
//!
//! # Example
//!
//! ```no_run
//! use channel_sync::{spawn_sync_loop, Config, SyncEngine, SyncMetrics};
//! use channel_sync::{DaemonClient, Explorer};
//! use channel_core::MemoryStorage;
//! use hub_broadcast::Broadcaster;
//! use std::sync::Arc;
//!
//! async fn run(daemon: Arc<dyn DaemonClient>, explorer: Arc<dyn Explorer>) -> channel_sync::Result<()> {
//!     let config = Config::from_env()?;
//!     let engine = Arc::new(SyncEngine::new(
//!         config.sync.clone(),
//!         daemon,
//!         explorer,
//!         Arc::new(MemoryStorage::new()),
//!         Broadcaster::new(),
//!         SyncMetrics::new().map_err(|e| channel_sync::Error::Config(e.to_string()))?,
//!     )?);
//!
//!     let mut updates = engine.subscribe();
//!     let handle = spawn_sync_loop(engine.clone(), config.sync.interval());
//!
//!     while let Some(update) = updates.read().await {
//!         println!("{} -> {}", update.channel_id(), update.state());
//!     }
//!     handle.shutdown().await;
//!     Ok(())
//! }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs, rust_2018_idioms, missing_debug_implementations)]

mod backfill;
pub mod config;
pub mod daemon;
pub mod engine;
pub mod error;
pub mod explorer;
pub mod metrics;
mod observation;
pub mod report;
pub mod scheduler;
pub mod telemetry;
pub mod transition;

// Re-exports
pub use config::{Config, LoggingConfig, RetryConfig, SyncConfig};
pub use daemon::DaemonClient;
pub use engine::SyncEngine;
pub use error::{Error, Result, Severity};
pub use explorer::Explorer;
pub use metrics::{SyncMetrics, TransitionKind};
pub use report::{ChannelFailure, FailureKind, SyncReport};
pub use scheduler::{spawn_sync_loop, SyncHandle};
pub use telemetry::init_tracing;
pub use transition::Category;
