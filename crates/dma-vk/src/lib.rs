//! # dma-vk
//!
//! Thin wrapper around Ash that takes care of object lifetimes, simplifies object creation, and
//! provides helpers for recurring tasks.
//!
//! # Usage
//!
//! In general dma-vk provides you with transparent wrappers around the main Vulkan objects. This includes the [Instance](context::Instance), [Device](context::Device) and other lifetime sensitive structures. Those wrappers, if used, keep track of lifetimes
//! and destruction of those objects when not needed anymore. Usually there are some helpers to simplify the creation of
//! those. They can however also be created by hand.
//!
//!
//! Structures that are not sensitive to lifetime requirements (like create info) are not wrapped.
#![deny(warnings)]

pub use ash;
#[cfg(feature = "default_allocator")]
pub use gpu_allocator;
pub use bytemuck;

///Owned-Or-Shared wrapper. Allows us to implement generic over a type that might be owned or shared via [Arc](std::sync::Arc).
///
/// Note that you can convert from and into this type from Arcs and any value T.
///
/// If the context allows for the assumption that something is shared, a normal Arc should be preffered.
pub use oos::OoS;

///Allocator related details. dma-vk allows for custom allocators (usually the `A` parameter on the [Context](context::Ctx)).
pub mod allocator;

///Structures you need to get starting. Basically [Instance](context::Instance) and [Device](context::Device) creation.
/// Also includes the [Ctx](context::Ctx) struct, which also keeps track of a memory allocator and "in use" resources.
pub mod context;

///Allocatable resources. Currently just [Buffer](resources::Buffer) and the command-buffer/pool wrappers.
pub mod resources;

///Vulkan synchronisation primitives
pub mod sync;

mod error;
pub use error::{CommandBufferError, DeviceError, DmaVkError, InstanceError};

///The infamous utility module contains all sorts of nice-to-have functions. Stuff like type converters etc.
pub mod util;
