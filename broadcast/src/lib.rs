//! Hub broadcast primitive
//!
//! In-process fan-out of values from one or more producers to any number of
//! dynamically attached receivers, with:
//! - Non-blocking writes (a stalled consumer never stalls a producer)
//! - Per-receiver FIFO order with unbounded buffering
//! - No replay: a receiver only sees values written after it subscribed
//! - Idempotent shutdown on both ends
//!
//! # Architecture
//!
//! ```text
//!   Broadcaster (Clone)          control task              per receiver
//!  ┌──────────────────┐  cmds  ┌──────────────┐  inbox  ┌──────────────┐  outbox  ┌──────────┐
//!  │ write/subscribe  │──────▶│ receiver set │───────▶│ delivery task│────────▶│ Receiver │
//!  └──────────────────┘ (mpsc) └──────────────┘ (mpsc)  │ VecDeque<T>  │ (cap 1)  │  read()  │
//!                                                        └──────────────┘          └──────────┘
//! ```
//!
//! The control task is the only owner of the receiver set. Each delivery task
//! owns its receiver's backlog and hands the oldest element to the consumer,
//! backing off when the consumer is not ready.

#![forbid(unsafe_code)]
#![warn(missing_docs, rust_2018_idioms, missing_debug_implementations)]

pub mod broadcaster;
pub mod receiver;

pub use broadcaster::Broadcaster;
pub use receiver::Receiver;
