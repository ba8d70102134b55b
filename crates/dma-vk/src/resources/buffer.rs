use std::sync::{Arc, Mutex};

use thiserror::Error;

use crate::allocator::{Allocation, Allocator, ManagedAllocation, MemoryUsage};

#[derive(Error, Debug)]
pub enum BufferMapError {
    #[error("Buffer's memory is not host-visible or not currently mapped")]
    NotMapped,
}

pub struct BufDesc {
    pub size: ash::vk::DeviceSize,
    pub usage: ash::vk::BufferUsageFlags,
    pub sharing: super::SharingMode,
}

impl BufDesc {
    pub fn set_on_builder<'a>(
        &'a self,
        mut builder: ash::vk::BufferCreateInfo<'a>,
    ) -> ash::vk::BufferCreateInfo<'a> {
        builder = builder.size(self.size).usage(self.usage);

        match &self.sharing {
            super::SharingMode::Exclusive => {
                builder = builder.sharing_mode(ash::vk::SharingMode::EXCLUSIVE)
            }
            super::SharingMode::Concurrent {
                queue_family_indices,
            } => {
                builder = builder
                    .sharing_mode(ash::vk::SharingMode::CONCURRENT)
                    .queue_family_indices(queue_family_indices)
            }
        }

        builder
    }
}

///Self managing buffer that uses the allocator `A` to create the buffer, and free it when dropped.
//Note Freeing happens in `ManagedAllocation`'s implementation.
pub struct Buffer<A: Allocator + Send + Sync + 'static> {
    pub desc: BufDesc,
    pub inner: ash::vk::Buffer,
    pub allocaton: ManagedAllocation<A>,
}

impl<A: Allocator + Send + Sync + 'static> Buffer<A> {
    ///Creates a buffer for `description` and the supplied creation-time information. Note that the actual resulting
    ///allocation can be bigger than specified. use `extend` to change the creation info before the buffer is created.
    pub fn new(
        device: &Arc<crate::context::Device>,
        allocator: &Arc<Mutex<A>>,
        description: BufDesc,
        usage: MemoryUsage,
        name: Option<&str>,
        create_flags: Option<ash::vk::BufferCreateFlags>,
        extend: Option<
            Box<dyn FnMut(ash::vk::BufferCreateInfo) -> ash::vk::BufferCreateInfo>,
        >,
    ) -> Result<Self, anyhow::Error> {
        let mut builder = ash::vk::BufferCreateInfo::default();
        if let Some(flags) = create_flags {
            builder = builder.flags(flags);
        }

        builder = description.set_on_builder(builder);
        if let Some(mut ext) = extend {
            builder = ext(builder);
        }

        //create buffer handle
        let buffer = unsafe { device.inner.create_buffer(&builder, None)? };
        let allocation =
            allocator
                .lock()
                .unwrap()
                .allocate_buffer(&device.inner, name, &buffer, usage)?;

        //if allocation did no fail, bind memory to buffer, update the description with the actual data and return.
        unsafe {
            device
                .inner
                .bind_buffer_memory(buffer, allocation.memory(), allocation.offset())?
        };

        Ok(Buffer {
            allocaton: ManagedAllocation {
                allocator: allocator.clone(),
                allocation: Some(allocation),
            },
            desc: description,
            inner: buffer,
        })
    }

    ///Returns the host-visible mapped byte slice backing this buffer, if its memory is mapped.
    pub fn mapped_slice(&self) -> Result<&[u8], BufferMapError> {
        self.allocaton
            .allocation
            .as_ref()
            .and_then(|a| a.as_slice_ref())
            .ok_or(BufferMapError::NotMapped)
    }

    ///Returns the host-visible mapped byte slice backing this buffer, if its memory is mapped.
    pub fn mapped_slice_mut(&mut self) -> Result<&mut [u8], BufferMapError> {
        self.allocaton
            .allocation
            .as_mut()
            .and_then(|a| a.as_slice_mut())
            .ok_or(BufferMapError::NotMapped)
    }

    pub fn size(&self) -> ash::vk::DeviceSize {
        self.desc.size
    }
}
