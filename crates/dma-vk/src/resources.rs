mod buffer;
pub use buffer::{BufDesc, Buffer, BufferMapError};

mod command_buffer;
pub use command_buffer::{CommandBuffer, CommandBufferAllocator, CommandPool};

use smallvec::SmallVec;

///Memory usage types
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum SharingMode {
    Exclusive,
    Concurrent {
        ///The queue family indices of families that can access the buffer concurrently.
        queue_family_indices: SmallVec<[u32; 4]>,
    },
}
