//! Execution of blocking remote calls off the async scheduler
//!
//! This module provides:
//! - [`WorkerPool`] - Fixed set of worker threads fed from one FIFO queue
//! - [`ClientRegistry`] / [`WorkerContext`] - One lazily built client per worker
//! - [`WorkerPool::run_blocking`] - The await point used by async callers
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │            async callers (many concurrent tasks)            │
//! └──────────────────────────────┬──────────────────────────────┘
//!                                │ run_blocking(work) → oneshot
//!                                ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                  unbounded FIFO work queue                  │
//! └──────┬───────────────────────┬───────────────────────┬──────┘
//!        ▼                       ▼                       ▼
//! ┌──────────────┐        ┌──────────────┐        ┌──────────────┐
//! │  worker-0    │        │  worker-1    │  ...   │  worker-N    │
//! │  ctx.client  │        │  ctx.client  │        │  ctx.client  │
//! └──────────────┘        └──────────────┘        └──────────────┘
//! ```

mod adapter;
mod pool;
mod registry;

pub use pool::{WorkerPool, WorkerPoolConfig, WorkerPoolError, WorkerPoolStats, WorkerPoolStatus};
pub use registry::{
    ClientFactory, ClientInitError, ClientRecord, ClientRegistry, WorkerContext, WorkerId,
};
