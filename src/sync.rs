use std::time::{Duration};

use ash::vk;

use crate::error::*;
use crate::vulkan::*;

// Outcome of a bounded fence wait
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FenceStatus {
    Signaled,
    TimedOut,
}


// Queue that executes recorded command buffers and signals a fence
// once done.
pub trait SubmitQueue {
    type Fence;

    fn create_fence(&self) -> Result<Self::Fence>;

    fn submit(&self, command_buffer : vk::CommandBuffer, fence : &Self::Fence) -> Result<()>;

    fn wait(&self, fence : &Self::Fence, timeout : Duration) -> Result<FenceStatus>;

    // Must only be called once the fence is signaled, was never submitted
    // or the wait itself failed
    fn destroy_fence(&self, fence : Self::Fence);
}

impl SubmitQueue for VulkanDevice {
    type Fence = vk::Fence;

    fn create_fence(&self) -> Result<vk::Fence> {
        let fence_info = vk::FenceCreateInfo::default();

        let fence = unsafe {
            self.get().create_fence(&fence_info, None)
                .map_err(Error::Submission)?
        };

        tracing::debug!("created fence {:?}", fence);
        Ok(fence)
    }

    fn submit(&self, command_buffer : vk::CommandBuffer, fence : &vk::Fence) -> Result<()> {
        let command_buffers = [command_buffer];

        let submit_info = [
            vk::SubmitInfo::default()
                .command_buffers(&command_buffers)
        ];

        unsafe {
            self.get().queue_submit(self.queue(), &submit_info, *fence)
                .map_err(Error::Submission)
        }
    }

    fn wait(&self, fence : &vk::Fence, timeout : Duration) -> Result<FenceStatus> {
        let fences = [*fence];
        let timeout_ns = u64::try_from(timeout.as_nanos()).unwrap_or(u64::MAX);

        let result = unsafe {
            self.get().wait_for_fences(&fences, true, timeout_ns)
        };

        match result {
            Ok(()) => Ok(FenceStatus::Signaled),
            Err(vk::Result::TIMEOUT) => Ok(FenceStatus::TimedOut),
            Err(e) => Err(Error::FenceWait(e)),
        }
    }

    fn destroy_fence(&self, fence : vk::Fence) {
        unsafe {
            self.get().destroy_fence(fence, None);
        }
    }
}


// Submits one command buffer and blocks until it completes or the
// timeout expires.
pub fn submit_and_wait<Q : SubmitQueue>(queue : &Q, command_buffer : vk::CommandBuffer, timeout : Duration) -> Result<()> {
    let fence = queue.create_fence()?;

    if let Err(e) = queue.submit(command_buffer, &fence) {
        queue.destroy_fence(fence);
        return Err(e);
    }

    match queue.wait(&fence, timeout) {
        Ok(FenceStatus::Signaled) => {
            queue.destroy_fence(fence);
            tracing::info!("dispatch completed");
            Ok(())
        },

        // Nothing is pending on a lost device, so the fence can go
        Err(e) => {
            queue.destroy_fence(fence);
            Err(e)
        },

        Ok(FenceStatus::TimedOut) => {
            // Work may still be in flight, so the fence is leaked
            tracing::warn!(?timeout, "dispatch did not complete, device state is undefined");
            Err(Error::DispatchTimeout(timeout))
        },
    }
}
