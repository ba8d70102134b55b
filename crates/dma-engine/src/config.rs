use std::time::Duration;

/// Construction-time configuration for a [TransferEngine](crate::engine::TransferEngine).
///
/// Build with `TransferEngineConfig { transfer_queue_family, ..Default::default() }` or mutate the
/// fields individually before handing the config to the engine's constructor.
#[derive(Debug, Clone, Copy)]
pub struct TransferEngineConfig {
    /// Queue family the engine records and submits on. There is no sane default for this, but we
    /// keep a field here (rather than a constructor argument) to mirror the rest of the config.
    pub transfer_queue_family: u32,
    /// Size in bytes of the single host-visible staging buffer backing the ring allocator. Must be
    /// a power of two.
    pub staging_pool_size: u64,
    /// Maximum number of tasks recorded into a single submission.
    pub batch_cap: usize,
    /// How long the worker waits on the submission fence before declaring a fatal timeout.
    pub fence_timeout: Duration,
    /// How long the worker blocks on the task condvar when the queue is empty.
    pub idle_poll_interval: Duration,
}

impl TransferEngineConfig {
    pub const DEFAULT_STAGING_POOL_SIZE: u64 = 128 * 1024 * 1024;
    pub const DEFAULT_BATCH_CAP: usize = 40;
    pub const DEFAULT_FENCE_TIMEOUT: Duration = Duration::from_millis(10);
    pub const DEFAULT_IDLE_POLL_INTERVAL: Duration = Duration::from_millis(1);

    pub fn new(transfer_queue_family: u32) -> Self {
        TransferEngineConfig {
            transfer_queue_family,
            ..Default::default()
        }
    }
}

impl Default for TransferEngineConfig {
    fn default() -> Self {
        TransferEngineConfig {
            transfer_queue_family: 0,
            staging_pool_size: Self::DEFAULT_STAGING_POOL_SIZE,
            batch_cap: Self::DEFAULT_BATCH_CAP,
            fence_timeout: Self::DEFAULT_FENCE_TIMEOUT,
            idle_poll_interval: Self::DEFAULT_IDLE_POLL_INTERVAL,
        }
    }
}
