use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use ahash::AHashSet;
use dma_vk::ash::vk::{self, Handle};
use dma_vk::context::{Device, Queue};
use dma_vk::resources::{CommandBuffer, CommandBufferAllocator, CommandPool};
use dma_vk::sync::Fence;

use crate::config::TransferEngineConfig;
use crate::error::TransferError;
use crate::queue::TaskQueue;
use crate::recorder::Recorder;
use crate::task::{CompletedTask, Task};

/// Shared state the worker publishes back to callers of the engine's public API: whether the
/// worker is still alive, and the error that took it down if it isn't.
pub struct WorkerStatus {
    shutdown_requested: AtomicBool,
    fatal: Mutex<Option<TransferError>>,
}

impl Default for WorkerStatus {
    fn default() -> Self {
        WorkerStatus {
            shutdown_requested: AtomicBool::new(false),
            fatal: Mutex::new(None),
        }
    }
}

impl WorkerStatus {
    pub fn request_shutdown(&self) {
        self.shutdown_requested.store(true, Ordering::Release);
    }

    fn shutdown_requested(&self) -> bool {
        self.shutdown_requested.load(Ordering::Acquire)
    }

    fn set_fatal(&self, err: TransferError) {
        #[cfg(feature = "logging")]
        log::error!("transfer worker shutting down after fatal error: {err}");
        *self.fatal.lock().unwrap() = Some(err);
    }

    /// Returns the error that killed the worker, if any. Calls into the public API consult this
    /// first and reject with [TransferError::EngineShutDown] rather than enqueueing onto a queue
    /// nobody is draining anymore.
    pub fn fatal_error(&self) -> Option<String> {
        self.fatal.lock().unwrap().as_ref().map(|e| e.to_string())
    }

    pub fn is_alive(&self) -> bool {
        self.fatal.lock().unwrap().is_none()
    }
}

fn buf_id(b: vk::Buffer) -> u64 {
    b.as_raw()
}

/// Drives the dedicated transfer-queue thread: pulls batches off the [TaskQueue], scans/records
/// them into a single command buffer up to `config.batch_cap`, submits once, and blocks on a fence
/// before recycling the buffer for the next batch. One `Worker` owns exactly one command
/// buffer/fence pair; there is no double-buffering; since all transfer work funnels through a
/// single queue anyway, overlapping recording with an in-flight submission buys little.
pub struct Worker {
    device: Arc<Device>,
    queue: Queue,
    command_buffer: CommandBuffer<CommandPool>,
    fence: Fence,
    recorder: Recorder,
    config: TransferEngineConfig,
    status: Arc<WorkerStatus>,
    tasks: Arc<TaskQueue>,
}

impl Worker {
    pub fn new(
        device: Arc<Device>,
        queue: Queue,
        config: TransferEngineConfig,
        status: Arc<WorkerStatus>,
        tasks: Arc<TaskQueue>,
    ) -> Result<Self, TransferError> {
        let pool = CommandPool::new(
            &device,
            config.transfer_queue_family,
            vk::CommandPoolCreateFlags::RESET_COMMAND_BUFFER,
        )
        .map_err(|e| TransferError::InvalidArgument(e.to_string()))?;

        let command_buffer = pool
            .allocate_buffer(vk::CommandBufferLevel::PRIMARY)
            .map_err(|e| TransferError::InvalidArgument(e.to_string()))?;

        let fence = Fence::new(&device, false)?;

        Ok(Worker {
            device,
            queue,
            command_buffer,
            fence,
            recorder: Recorder::new(),
            config,
            status,
            tasks,
        })
    }

    /// Spawns the worker's dedicated thread. The thread runs until `status` is told to shut down
    /// and the queue has drained, or until a fatal error is recorded on `status`.
    pub fn spawn(mut self) -> std::thread::JoinHandle<()> {
        std::thread::Builder::new()
            .name("dma-engine-transfer-worker".into())
            .spawn(move || self.run())
            .expect("failed to spawn transfer worker thread")
    }

    fn run(&mut self) {
        loop {
            let pulled = self.tasks.wait_and_take_timeout(self.config.idle_poll_interval);
            if pulled.is_empty() {
                if self.status.shutdown_requested() && self.tasks.is_empty() {
                    #[cfg(feature = "logging")]
                    log::debug!("transfer worker draining and shutting down");
                    return;
                }
                continue;
            }

            match self.try_run_batch(pulled) {
                Ok(()) => {}
                Err(e) => {
                    self.status.set_fatal(e);
                    return;
                }
            }
        }
    }

    /// Scans as many tasks as fit (hazard-free and under `batch_cap`) into one command buffer,
    /// submits, and waits on the fence. Anything left over — either because it hazards against the
    /// batch or because the cap was hit — is pushed back to the front of the queue in order.
    fn try_run_batch(&mut self, mut pulled: VecDeque<Task>) -> Result<(), TransferError> {
        self.command_buffer
            .reset(true)
            .map_err(|e| TransferError::InvalidArgument(e.to_string()))?;
        self.recorder.reset();
        self.recorder
            .begin(&self.device.inner, self.command_buffer.inner)?;

        let mut pending_release: AHashSet<u64> = AHashSet::default();
        let mut completions: Vec<CompletedTask> = Vec::new();
        let mut leftover: VecDeque<Task> = VecDeque::new();

        while let Some(task) = pulled.pop_front() {
            if completions.len() >= self.config.batch_cap {
                leftover.push_back(task);
                continue;
            }
            if !task.scan(&self.recorder, &pending_release) {
                leftover.push_back(task);
                leftover.extend(pulled);
                break;
            }
            if let Some(buf) = task.release_target() {
                pending_release.insert(buf_id(buf));
            }
            let completed = task.record(&self.device.inner, &mut self.recorder);
            completions.push(completed);
        }

        if !leftover.is_empty() {
            self.tasks.requeue_front(leftover);
        }

        if completions.is_empty() {
            // Nothing in this pull could be scanned into the batch (a lone hazarding task at the
            // front). Let it sit requeued and come back around on the next poll.
            return Ok(());
        }

        self.recorder.end(&self.device.inner)?;

        let cmd_infos = [vk::CommandBufferSubmitInfo::default().command_buffer(self.command_buffer.inner)];
        let submit = vk::SubmitInfo2::default()
            .wait_semaphore_infos(self.recorder.wait_semaphores())
            .signal_semaphore_infos(self.recorder.signal_semaphores())
            .command_buffer_infos(&cmd_infos);

        self.queue
            .submit(&self.device.inner, &[submit], self.fence.inner)?;

        match self.fence.wait(self.config.fence_timeout.as_nanos() as u64) {
            Ok(()) => {}
            Err(vk::Result::TIMEOUT) => return Err(TransferError::TransferTimeout),
            Err(e) => return Err(e.into()),
        }
        self.fence.reset()?;

        for completed in completions {
            completed.on_completed();
        }
        for cb in self.recorder.take_callbacks() {
            cb();
        }

        Ok(())
    }
}
