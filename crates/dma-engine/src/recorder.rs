use ahash::AHashSet;
use dma_vk::ash::{self, vk};
use smallvec::SmallVec;

/// Per-batch scratchpad. One [Recorder] backs exactly one submission: it holds the primary
/// command buffer currently being recorded into, the wait/signal semaphore sets and
/// post-submission callbacks accumulated so far, and the read/write buffer-hazard sets that back
/// each task variant's `scan`. [reset](Recorder::reset) clears all of it between batches; nothing
/// here survives past the worker's `try_run_batch`.
pub struct Recorder {
    command_buffer: Option<vk::CommandBuffer>,
    wait_semaphores: SmallVec<[vk::SemaphoreSubmitInfo; 4]>,
    signal_semaphores: SmallVec<[vk::SemaphoreSubmitInfo; 4]>,
    callbacks: Vec<Box<dyn FnOnce() + Send>>,
    read_buffers: AHashSet<u64>,
    write_buffers: AHashSet<u64>,
    pending_barrier: Option<PendingBarrier>,
}

/// A [Recorder::record_pipeline_barrier] call not yet flushed to the command buffer. Kept
/// separate from the already-recorded command stream so that two barrier tasks back to back with
/// identical stage masks can merge into a single `vkCmdPipelineBarrier2` instead of two.
struct PendingBarrier {
    src_stage: vk::PipelineStageFlags2,
    dst_stage: vk::PipelineStageFlags2,
    memory_barriers: Vec<vk::MemoryBarrier2>,
    buffer_memory_barriers: Vec<vk::BufferMemoryBarrier2>,
}

impl Default for Recorder {
    fn default() -> Self {
        Recorder {
            command_buffer: None,
            wait_semaphores: SmallVec::new(),
            signal_semaphores: SmallVec::new(),
            callbacks: Vec::new(),
            read_buffers: AHashSet::new(),
            write_buffers: AHashSet::new(),
            pending_barrier: None,
        }
    }
}

impl Recorder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Resets the command buffer and begins a new one-time-submit recording.
    pub fn begin(
        &mut self,
        device: &ash::Device,
        cmd: vk::CommandBuffer,
    ) -> Result<(), vk::Result> {
        unsafe {
            device.begin_command_buffer(
                cmd,
                &vk::CommandBufferBeginInfo::default()
                    .flags(vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT),
            )?;
        }
        self.command_buffer = Some(cmd);
        Ok(())
    }

    /// Flushes any pending merged barrier and ends the command buffer.
    pub fn end(&mut self, device: &ash::Device) -> Result<(), vk::Result> {
        self.flush_pending_barrier(device);
        let cmd = self.command_buffer.expect("end() called without begin()");
        unsafe { device.end_command_buffer(cmd) }
    }

    fn cmd(&self) -> vk::CommandBuffer {
        self.command_buffer
            .expect("recorder used before begin() or after reset()")
    }

    pub fn record_buffer_copy(
        &mut self,
        device: &ash::Device,
        src: vk::Buffer,
        dst: vk::Buffer,
        regions: &[(u64, u64, u64)],
    ) {
        self.flush_pending_barrier(device);
        let vk_regions: SmallVec<[vk::BufferCopy2; 4]> = regions
            .iter()
            .map(|&(src_offset, dst_offset, size)| {
                vk::BufferCopy2::default()
                    .src_offset(src_offset)
                    .dst_offset(dst_offset)
                    .size(size)
            })
            .collect();

        let info = vk::CopyBufferInfo2::default()
            .src_buffer(src)
            .dst_buffer(dst)
            .regions(&vk_regions);

        unsafe { device.cmd_copy_buffer2(self.cmd(), &info) };
    }

    /// Records (or merges into a pending) pipeline barrier. Two barrier calls with identical
    /// `src_stage`/`dst_stage` in a row are coalesced into one `vkCmdPipelineBarrier2`, matching
    /// the `PipelineBarrier` task's merge rule.
    pub fn record_pipeline_barrier(
        &mut self,
        device: &ash::Device,
        src_stage: vk::PipelineStageFlags2,
        dst_stage: vk::PipelineStageFlags2,
        memory_barriers: &[vk::MemoryBarrier2],
        buffer_memory_barriers: &[vk::BufferMemoryBarrier2],
    ) {
        if let Some(pending) = &mut self.pending_barrier {
            if pending.src_stage == src_stage && pending.dst_stage == dst_stage {
                pending.memory_barriers.extend_from_slice(memory_barriers);
                pending
                    .buffer_memory_barriers
                    .extend_from_slice(buffer_memory_barriers);
                return;
            }
            self.flush_pending_barrier(device);
        }

        self.pending_barrier = Some(PendingBarrier {
            src_stage,
            dst_stage,
            memory_barriers: memory_barriers.to_vec(),
            buffer_memory_barriers: buffer_memory_barriers.to_vec(),
        });
    }

    fn flush_pending_barrier(&mut self, device: &ash::Device) {
        let Some(pending) = self.pending_barrier.take() else {
            return;
        };
        let dep_info = vk::DependencyInfo::default()
            .memory_barriers(&pending.memory_barriers)
            .buffer_memory_barriers(&pending.buffer_memory_barriers);
        unsafe { device.cmd_pipeline_barrier2(self.cmd(), &dep_info) };
    }

    pub fn add_wait_semaphores(&mut self, waits: impl IntoIterator<Item = vk::SemaphoreSubmitInfo>) {
        self.wait_semaphores.extend(waits);
    }

    pub fn add_signal_semaphores(
        &mut self,
        signals: impl IntoIterator<Item = vk::SemaphoreSubmitInfo>,
    ) {
        self.signal_semaphores.extend(signals);
    }

    pub fn add_callback(&mut self, cb: Box<dyn FnOnce() + Send>) {
        self.callbacks.push(cb);
    }

    pub fn add_read_buffer(&mut self, handle: u64) {
        self.read_buffers.insert(handle);
    }

    pub fn add_write_buffer(&mut self, handle: u64) {
        self.write_buffers.insert(handle);
    }

    pub fn has_read_buffer(&self, handle: u64) -> bool {
        self.read_buffers.contains(&handle)
    }

    pub fn has_written_buffer(&self, handle: u64) -> bool {
        self.write_buffers.contains(&handle)
    }

    pub fn has_signal_semaphores(&self) -> bool {
        !self.signal_semaphores.is_empty()
    }

    pub fn wait_semaphores(&self) -> &[vk::SemaphoreSubmitInfo] {
        &self.wait_semaphores
    }

    pub fn signal_semaphores(&self) -> &[vk::SemaphoreSubmitInfo] {
        &self.signal_semaphores
    }

    pub fn take_callbacks(&mut self) -> Vec<Box<dyn FnOnce() + Send>> {
        std::mem::take(&mut self.callbacks)
    }

    /// Clears all accumulated sets and the command-buffer slot. Called between batches; the
    /// result is indistinguishable from a freshly constructed `Recorder`.
    pub fn reset(&mut self) {
        self.command_buffer = None;
        self.wait_semaphores.clear();
        self.signal_semaphores.clear();
        self.callbacks.clear();
        self.read_buffers.clear();
        self.write_buffers.clear();
        self.pending_barrier = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reset_clears_hazard_sets() {
        let mut recorder = Recorder::new();
        recorder.add_read_buffer(1);
        recorder.add_write_buffer(2);
        recorder.add_callback(Box::new(|| {}));
        recorder.reset();
        assert!(!recorder.has_read_buffer(1));
        assert!(!recorder.has_written_buffer(2));
        assert!(recorder.take_callbacks().is_empty());
    }

    #[test]
    fn reset_then_idle_matches_fresh_state() {
        let mut recorder = Recorder::new();
        recorder.add_write_buffer(9);
        recorder.reset();
        let fresh = Recorder::new();
        assert_eq!(recorder.has_signal_semaphores(), fresh.has_signal_semaphores());
        assert_eq!(recorder.wait_semaphores().len(), fresh.wait_semaphores().len());
        assert_eq!(recorder.has_written_buffer(9), fresh.has_written_buffer(9));
    }
}
