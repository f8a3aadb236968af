//! # jet-queue
//!
//! A durable, Redis-backed job queue and worker runtime.
//!
//! ## Features
//!
//! - **Durable storage**: jobs live in Redis, surviving process restarts
//! - **Atomic dispatch**: waiting/active/delayed transitions run as Lua
//!   scripts so no job is ever dispatched twice
//! - **Retry with backoff**: fixed or exponential backoff, bounded by a
//!   per-job attempt count
//! - **Bounded concurrency**: each worker runs up to `concurrency` jobs
//!   in parallel, with an optional lifetime cap
//! - **Observability**: every state transition is broadcast as a
//!   [`QueueEvent`]
//!
//! ## Quick start
//!
//! ```rust,no_run
//! use jet_queue::{ConnectionOptions, Queue, QueueOptions, Worker, WorkerOptions};
//!
//! # tokio_test::block_on(async {
//! let queue = Queue::new("emails", ConnectionOptions::default(), QueueOptions::default())
//!     .await
//!     .unwrap();
//!
//! queue
//!     .add("welcome", serde_json::json!({"to": "user@example.com"}), None)
//!     .await
//!     .unwrap();
//!
//! let worker = Worker::new(
//!     "emails",
//!     "jet",
//!     ConnectionOptions::default(),
//!     WorkerOptions::default(),
//! )
//! .await
//! .unwrap();
//!
//! worker
//!     .process(|job| async move {
//!         println!("sending to {:?}", job.data["to"]);
//!         Ok(serde_json::json!({"sent": true}))
//!     })
//!     .await
//!     .unwrap();
//! # });
//! ```

pub mod backoff;
pub mod config;
pub mod error;
pub mod events;
pub mod job;
pub mod keys;
pub mod queue;
pub mod registry;
pub mod scripts;
pub mod worker;

pub use config::{
    ConnectionOptions, ConnectionOptionsBuilder, QueueOptions, QueueOptionsBuilder, WorkerOptions,
    WorkerOptionsBuilder,
};
pub use error::{JetError, JetResult};
pub use events::{CompletedPayload, QueueEvent};
pub use job::{BackoffKind, BackoffOptions, Job, JobId, JobOptions, JobStatus};
pub use queue::Queue;
pub use worker::{HandlerResult, JobHandler, Worker};
