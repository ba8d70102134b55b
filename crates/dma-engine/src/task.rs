use dma_vk::ash::{self, vk};
use smallvec::SmallVec;

use crate::recorder::Recorder;

/// Up to four binary semaphores inline before falling back to the heap; acquire/release rarely
/// juggle more than one or two at a time.
pub type SemaphoreSet = SmallVec<[vk::Semaphore; 4]>;

/// One contiguous byte range to copy, `(src_offset, dst_offset, size)`.
pub type CopyRegion = (u64, u64, u64);

pub struct AcquireBuffer {
    pub buffer: vk::Buffer,
    pub src_queue_family: u32,
    pub dst_queue_family: u32,
    pub wait_semaphores: SemaphoreSet,
    pub callback: Option<Box<dyn FnOnce() + Send>>,
}

pub struct ReleaseBuffer {
    pub buffer: vk::Buffer,
    pub src_queue_family: u32,
    pub dst_queue_family: u32,
    pub signal_semaphores: SemaphoreSet,
    pub callback: Option<Box<dyn FnOnce() + Send>>,
}

pub struct BufferCopy {
    pub src: vk::Buffer,
    pub dst: vk::Buffer,
    pub regions: SmallVec<[CopyRegion; 2]>,
}

pub struct PipelineBarrier {
    pub src_stage: vk::PipelineStageFlags2,
    pub dst_stage: vk::PipelineStageFlags2,
    pub memory_barriers: SmallVec<[vk::MemoryBarrier2; 2]>,
    pub buffer_memory_barriers: SmallVec<[vk::BufferMemoryBarrier2; 2]>,
}

pub struct WaitSemaphore {
    pub semaphores: SemaphoreSet,
    pub stage_mask: vk::PipelineStageFlags2,
}

pub struct SignalSemaphore {
    pub semaphores: SemaphoreSet,
}

/// Tagged union of everything the worker can pull off the [TaskQueue](crate::queue::TaskQueue).
/// Each variant carries its own `scan`/`record`/`on_completed` behavior below rather than going
/// through a trait object, so the worker's hot loop dispatches on a plain `match` instead of a
/// vtable call.
pub enum Task {
    AcquireBuffer(AcquireBuffer),
    ReleaseBuffer(ReleaseBuffer),
    BufferCopy(BufferCopy),
    PipelineBarrier(PipelineBarrier),
    WaitSemaphore(WaitSemaphore),
    SignalSemaphore(SignalSemaphore),
    Callback(Box<dyn FnOnce() + Send>),
}

/// Handle used by [Recorder]'s hazard sets and by the release-after-write-hazard check on
/// `ReleaseBuffer::scan`; buffers are identified by their raw Vulkan handle cast to `u64`.
fn buf_id(b: vk::Buffer) -> u64 {
    use dma_vk::ash::vk::Handle;
    b.as_raw()
}

impl Task {
    /// Probes whether this task may still be appended to the batch the recorder describes.
    /// `pending_release` is the set of buffers that already have a queued `ReleaseBuffer` in this
    /// batch (tracked by the worker, since the recorder itself has no notion of "release" vs.
    /// plain write). A `ReleaseBuffer` is always recordable regardless of prior writes to its own
    /// buffer in this batch (that's the canonical acquire → upload → release pattern, all in one
    /// submission); what `pending_release` guards against instead is a *write* task targeting a
    /// buffer that was already handed off to another queue family earlier in the same batch.
    pub fn scan(&self, recorder: &Recorder, pending_release: &ahash::AHashSet<u64>) -> bool {
        match self {
            Task::AcquireBuffer(a) => !pending_release.contains(&buf_id(a.buffer)),
            Task::ReleaseBuffer(_) => true,
            Task::BufferCopy(c) => {
                !recorder.has_read_buffer(buf_id(c.dst))
                    && !recorder.has_written_buffer(buf_id(c.src))
                    && !pending_release.contains(&buf_id(c.dst))
            }
            Task::PipelineBarrier(_) => true,
            Task::WaitSemaphore(_) => !recorder.has_signal_semaphores(),
            Task::SignalSemaphore(_) => true,
            Task::Callback(_) => true,
        }
    }

    /// Emits this task's commands/side effects into `recorder`. Must only be called after `scan`
    /// returned `true` for the same recorder state.
    pub fn record(self, device: &ash::Device, recorder: &mut Recorder) -> CompletedTask {
        match self {
            Task::AcquireBuffer(a) => {
                recorder.add_wait_semaphores(a.wait_semaphores.iter().map(|&s| {
                    vk::SemaphoreSubmitInfo::default()
                        .semaphore(s)
                        .stage_mask(vk::PipelineStageFlags2::TRANSFER)
                }));
                if a.src_queue_family != a.dst_queue_family {
                    let barrier = vk::BufferMemoryBarrier2::default()
                        .buffer(a.buffer)
                        .offset(0)
                        .size(vk::WHOLE_SIZE)
                        .src_access_mask(
                            vk::AccessFlags2::MEMORY_READ | vk::AccessFlags2::MEMORY_WRITE,
                        )
                        .src_stage_mask(vk::PipelineStageFlags2::TOP_OF_PIPE)
                        .src_queue_family_index(a.src_queue_family)
                        .dst_access_mask(
                            vk::AccessFlags2::TRANSFER_READ | vk::AccessFlags2::TRANSFER_WRITE,
                        )
                        .dst_stage_mask(vk::PipelineStageFlags2::TRANSFER)
                        .dst_queue_family_index(a.dst_queue_family);
                    recorder.record_pipeline_barrier(
                        device,
                        vk::PipelineStageFlags2::TOP_OF_PIPE,
                        vk::PipelineStageFlags2::TRANSFER,
                        &[],
                        &[barrier],
                    );
                }
                CompletedTask::Callback(a.callback)
            }
            Task::ReleaseBuffer(r) => {
                if r.src_queue_family != r.dst_queue_family {
                    let barrier = vk::BufferMemoryBarrier2::default()
                        .buffer(r.buffer)
                        .offset(0)
                        .size(vk::WHOLE_SIZE)
                        .src_access_mask(
                            vk::AccessFlags2::TRANSFER_READ | vk::AccessFlags2::TRANSFER_WRITE,
                        )
                        .src_stage_mask(vk::PipelineStageFlags2::TRANSFER)
                        .src_queue_family_index(r.src_queue_family)
                        .dst_access_mask(
                            vk::AccessFlags2::MEMORY_READ | vk::AccessFlags2::MEMORY_WRITE,
                        )
                        .dst_stage_mask(vk::PipelineStageFlags2::TOP_OF_PIPE)
                        .dst_queue_family_index(r.dst_queue_family);
                    recorder.record_pipeline_barrier(
                        device,
                        vk::PipelineStageFlags2::TRANSFER,
                        vk::PipelineStageFlags2::TOP_OF_PIPE,
                        &[],
                        &[barrier],
                    );
                }
                recorder.add_signal_semaphores(r.signal_semaphores.iter().map(|&s| {
                    vk::SemaphoreSubmitInfo::default()
                        .semaphore(s)
                        .stage_mask(vk::PipelineStageFlags2::TRANSFER)
                }));
                CompletedTask::Callback(r.callback)
            }
            Task::BufferCopy(c) => {
                recorder.add_read_buffer(buf_id(c.src));
                recorder.add_write_buffer(buf_id(c.dst));
                recorder.record_buffer_copy(device, c.src, c.dst, &c.regions);
                CompletedTask::None
            }
            Task::PipelineBarrier(p) => {
                recorder.record_pipeline_barrier(
                    device,
                    p.src_stage,
                    p.dst_stage,
                    &p.memory_barriers,
                    &p.buffer_memory_barriers,
                );
                CompletedTask::None
            }
            Task::WaitSemaphore(w) => {
                recorder.add_wait_semaphores(w.semaphores.iter().map(|&s| {
                    vk::SemaphoreSubmitInfo::default()
                        .semaphore(s)
                        .stage_mask(w.stage_mask)
                }));
                CompletedTask::None
            }
            Task::SignalSemaphore(s) => {
                recorder.add_signal_semaphores(s.semaphores.iter().map(|&s| {
                    vk::SemaphoreSubmitInfo::default()
                        .semaphore(s)
                        .stage_mask(vk::PipelineStageFlags2::TRANSFER)
                }));
                CompletedTask::None
            }
            Task::Callback(cb) => {
                recorder.add_callback(cb);
                CompletedTask::None
            }
        }
    }

    /// Whether this task, if recorded, would be a `ReleaseBuffer` — used by the worker to extend
    /// its `pending_release` set before scanning the next task.
    pub fn release_target(&self) -> Option<vk::Buffer> {
        match self {
            Task::ReleaseBuffer(r) => Some(r.buffer),
            _ => None,
        }
    }
}

/// What's left of a [Task] after `record`: a possibly-absent completion callback to be invoked
/// once the batch's fence signals, in FIFO order alongside every other consumed task.
pub enum CompletedTask {
    None,
    Callback(Option<Box<dyn FnOnce() + Send>>),
}

impl CompletedTask {
    pub fn on_completed(self) {
        if let CompletedTask::Callback(Some(cb)) = self {
            cb();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ahash::AHashSet;
    use dma_vk::ash::vk::Handle;

    fn fake_buffer(raw: u64) -> vk::Buffer {
        vk::Buffer::from_raw(raw)
    }

    #[test]
    fn buffer_copy_scan_detects_raw_hazard() {
        let mut recorder = Recorder::new();
        recorder.add_write_buffer(buf_id(fake_buffer(2)));
        let copy = Task::BufferCopy(BufferCopy {
            src: fake_buffer(2),
            dst: fake_buffer(3),
            regions: SmallVec::from_elem((0, 0, 16), 1),
        });
        let empty = AHashSet::default();
        assert!(!copy.scan(&recorder, &empty));
    }

    #[test]
    fn buffer_copy_scan_detects_waw_hazard() {
        let mut recorder = Recorder::new();
        recorder.add_read_buffer(buf_id(fake_buffer(3)));
        let copy = Task::BufferCopy(BufferCopy {
            src: fake_buffer(2),
            dst: fake_buffer(3),
            regions: SmallVec::from_elem((0, 0, 16), 1),
        });
        let empty = AHashSet::default();
        assert!(!copy.scan(&recorder, &empty));
    }

    #[test]
    fn buffer_copy_scan_passes_when_clear() {
        let recorder = Recorder::new();
        let copy = Task::BufferCopy(BufferCopy {
            src: fake_buffer(2),
            dst: fake_buffer(3),
            regions: SmallVec::from_elem((0, 0, 16), 1),
        });
        let empty = AHashSet::default();
        assert!(copy.scan(&recorder, &empty));
    }

    #[test]
    fn acquire_scan_refuses_when_release_pending() {
        let recorder = Recorder::new();
        let acquire = Task::AcquireBuffer(AcquireBuffer {
            buffer: fake_buffer(5),
            src_queue_family: 0,
            dst_queue_family: 1,
            wait_semaphores: SemaphoreSet::new(),
            callback: None,
        });
        let mut pending = AHashSet::default();
        pending.insert(buf_id(fake_buffer(5)));
        assert!(!acquire.scan(&recorder, &pending));
    }

    #[test]
    fn wait_semaphore_scan_refuses_after_signal() {
        let mut recorder = Recorder::new();
        recorder.add_signal_semaphores([vk::SemaphoreSubmitInfo::default()]);
        let wait = Task::WaitSemaphore(WaitSemaphore {
            semaphores: SemaphoreSet::from_elem(vk::Semaphore::null(), 1),
            stage_mask: vk::PipelineStageFlags2::TRANSFER,
        });
        let empty = AHashSet::default();
        assert!(!wait.scan(&recorder, &empty));
    }

    #[test]
    fn release_scan_allows_after_write_in_batch() {
        // Canonical acquire -> upload-copy -> release pattern: the release must still be
        // recordable in the same batch as the write to its own buffer.
        let mut recorder = Recorder::new();
        recorder.add_write_buffer(buf_id(fake_buffer(7)));
        let release = Task::ReleaseBuffer(ReleaseBuffer {
            buffer: fake_buffer(7),
            src_queue_family: 1,
            dst_queue_family: 0,
            signal_semaphores: SemaphoreSet::new(),
            callback: None,
        });
        let empty = AHashSet::default();
        assert!(release.scan(&recorder, &empty));
    }

    #[test]
    fn buffer_copy_scan_refuses_write_to_already_released_buffer() {
        let recorder = Recorder::new();
        let copy = Task::BufferCopy(BufferCopy {
            src: fake_buffer(2),
            dst: fake_buffer(7),
            regions: SmallVec::from_elem((0, 0, 16), 1),
        });
        let mut pending_release = AHashSet::default();
        pending_release.insert(buf_id(fake_buffer(7)));
        assert!(!copy.scan(&recorder, &pending_release));
    }
}
