use std::error::Error;

use ash::{vk, LoadingError};

use thiserror::Error;

#[derive(Error, Debug)]
pub enum DeviceError {
    #[error("Extension {0} is not supported by device")]
    UnsupportedExtension(String),
    #[error("Feature {0} not supported")]
    UnsupportedFeature(String),
    #[error("No physical device found. Is a Vulkan capable GPU and driver installed?")]
    NoPhysicalDevice,
    //FIXME: Not happy about that Box :/
    #[error("GpuAllocator error: {0}")]
    GpuAllocatorError(#[from] Box<dyn Error + Send + Sync + 'static>),
    #[error("Vulkan error: {0}")]
    VkError(#[from] vk::Result),
}

#[derive(Error, Debug)]
pub enum CommandBufferError {
    #[error("Vulkan error: {0}")]
    VkError(#[from] vk::Result),
    #[error("Command pool is not resettable")]
    PoolNotResetable,
    #[error("Submitting to queue failed with {0}")]
    SubmitFailed(vk::Result),
    #[error("Failed to allocate command buffer. Requested {count}, got {allocated}")]
    FailedToAllocate { allocated: usize, count: usize },
}

#[derive(Error, Debug)]
pub enum InstanceError {
    #[error("Vulkan error: {0}")]
    VkError(#[from] vk::Result),
    #[error("Failed to load Vulkan entry point: {0}")]
    EntryLoading(#[from] LoadingError),
}

#[derive(Error, Debug)]
pub enum DmaVkError {
    #[error("CommandBuffer error: {0}")]
    CommandBufferError(#[from] CommandBufferError),
    #[error("Device error: {0}")]
    DeviceError(#[from] DeviceError),
    #[error("Instance error: {0}")]
    InstanceError(#[from] InstanceError),
    #[error("Other error: {0}")]
    Other(String),
}

#[cfg(test)]
mod test {
    use static_assertions::assert_impl_all;

    use crate::{
        error::{CommandBufferError, DeviceError, InstanceError},
        DmaVkError,
    };

    #[test]
    fn assure_send_sync() {
        assert_impl_all!(DeviceError: Send, Sync);
        assert_impl_all!(CommandBufferError: Send, Sync);
        assert_impl_all!(InstanceError: Send, Sync);
        assert_impl_all!(DmaVkError: Send, Sync);
    }
}
