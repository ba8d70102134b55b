use thiserror::Error;

/// Errors raised by the [ring allocator](crate::ring::RingAllocator).
#[derive(Error, Debug, Clone, Copy)]
pub enum RingError {
    #[error("Ring capacity must be a non-zero power of two, was {0}")]
    InvalidArgument(u64),
    #[error("Ring is out of contiguous space for this allocation")]
    OutOfMemory,
    #[error("No allocation found at physical address {0}")]
    InvalidAddress(u64),
}

/// Errors raised by the [staging pool](crate::staging::StagingPool).
#[derive(Error, Debug)]
pub enum StagingError {
    #[error("Ring allocator error: {0}")]
    Ring(#[from] RingError),
    #[error("Staging pool size must be a non-zero power of two, was {0}")]
    InvalidArgument(u64),
    #[error("Staging pool was already destroyed")]
    InvalidState,
    #[error("Failed to create staging buffer: {0}")]
    VkError(#[from] dma_vk::DeviceError),
}

/// Top level error surfaced to callers of the [engine](crate::engine::TransferEngine) API and
/// fatal-status channel.
#[derive(Error, Debug)]
pub enum TransferError {
    #[error("Buffer is already owned by the engine")]
    AlreadyOwned,
    #[error("Buffer is not owned by the engine")]
    NotOwned,
    #[error("Acquiring a buffer whose release is still queued requires wait semaphores")]
    SyncRequired,
    #[error("{0}")]
    InvalidArgument(String),
    #[error("Staging pool error: {0}")]
    Staging(#[from] StagingError),
    #[error("Ring allocator error: {0}")]
    Ring(#[from] RingError),
    #[error("Image transfers are not supported by this engine")]
    Unsupported,
    #[error("Fence wait exceeded its timeout")]
    TransferTimeout,
    #[error("Underlying driver call failed: {0}")]
    DriverFailure(#[from] dma_vk::DmaVkError),
    #[error("Vulkan error: {0}")]
    VkError(#[from] dma_vk::ash::vk::Result),
    #[error("The transfer engine has shut down after a fatal error")]
    EngineShutDown,
}

#[cfg(test)]
mod test {
    use super::{RingError, StagingError, TransferError};
    use static_assertions::assert_impl_all;

    #[test]
    fn assure_send_sync() {
        assert_impl_all!(RingError: Send, Sync);
        assert_impl_all!(StagingError: Send, Sync);
        assert_impl_all!(TransferError: Send, Sync);
    }
}
