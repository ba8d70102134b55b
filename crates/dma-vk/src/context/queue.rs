///Abstract queue that collects a [ash::vk::Queue](ash::vk::Queue) and its family.
///
/// The inner handle is mutex-guarded: Vulkan requires external synchronisation on `vkQueueSubmit`
/// and friends, and a queue may be shared between a dedicated worker and ad-hoc submissions.
#[derive(Clone, Debug)]
pub struct Queue {
    pub inner: std::sync::Arc<std::sync::Mutex<ash::vk::Queue>>,
    pub family_index: u32,
    pub properties: ash::vk::QueueFamilyProperties,
}

impl Queue {
    ///Locks and submits to this queue via `device`.
    pub fn submit(
        &self,
        device: &ash::Device,
        submits: &[ash::vk::SubmitInfo2],
        fence: ash::vk::Fence,
    ) -> Result<(), ash::vk::Result> {
        let guard = self.inner.lock().unwrap();
        unsafe { device.queue_submit2(*guard, submits, fence) }
    }
}

pub struct QueueBuilder {
    ///The family's index.
    pub family_index: u32,
    ///its properties
    pub properties: ash::vk::QueueFamilyProperties,
    ///The length of this vector determins how many instances of this queue are created. The number determins the
    /// priority of each queue on the hardware. See the [documentation](https://www.khronos.org/registry/vulkan/specs/1.3-extensions/man/html/VkDeviceQueueCreateInfo.html) for more information about this topic.
    pub priorities: Vec<f32>,
}

impl QueueBuilder {
    ///Sets the queue ammount that is being created (length of the vector) and each queues priority. Have a look at the
    /// `priorities` field documentation.
    ///
    /// Note that only the first `n` priorities are resprected if the length of the vector exceeds `n = self.properties.queue_count`.
    pub fn with_queues(&mut self, mut queue_priorities: Vec<f32>) {
        if queue_priorities.len() > self.properties.queue_count as usize {
            queue_priorities.resize(self.properties.queue_count as usize, 0.0);
        }

        self.priorities = queue_priorities;
    }

    pub fn as_create_info<'a>(&'a self) -> ash::vk::DeviceQueueCreateInfo<'a> {
        ash::vk::DeviceQueueCreateInfo::default()
            .queue_family_index(self.family_index)
            .queue_priorities(&self.priorities)
    }
}
