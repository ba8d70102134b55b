//! # dma-engine
//!
//! Asynchronous DMA transfer engine. A dedicated worker thread drains a producer-fed task queue,
//! batching buffer-acquire, buffer-release and buffer-copy requests into as few command-buffer
//! submissions as possible on one transfer queue, respecting read/write hazards between batched
//! tasks and queue-family ownership transfer semantics.
//!
//! Callers never touch a command buffer directly: [engine::TransferEngine] validates each request
//! synchronously against an owned-buffer map, turns it into one or more [task::Task]s, and hands
//! them to the worker through [queue::TaskQueue]. Host-visible transfers go through a single
//! [staging::StagingPool] backed by an unbacked [ring::RingAllocator].

mod config;
mod engine;
mod error;
mod queue;
mod recorder;
mod ring;
mod staging;
mod task;
mod worker;

pub use config::TransferEngineConfig;
pub use engine::TransferEngine;
pub use error::{RingError, StagingError, TransferError};
pub use ring::{RingAllocation, RingAllocator};
pub use staging::{StagingAllocation, StagingPool};
pub use task::{
    AcquireBuffer, BufferCopy, CopyRegion, PipelineBarrier, ReleaseBuffer, SemaphoreSet,
    SignalSemaphore, Task, WaitSemaphore,
};
