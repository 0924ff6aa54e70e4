use std::rc::{Rc};

use ash::vk;

use crate::bindings::*;
use crate::error::*;
use crate::pipeline::*;
use crate::vulkan::*;

// Number of workgroups needed to cover `total` work items, one-dimensional
pub fn dispatch_geometry(total : u32, workgroup_size : u32) -> Result<(u32, u32, u32)> {
    if workgroup_size == 0 {
        return Err(Error::DispatchLimit("Workgroup size must not be zero".into()));
    }

    Ok((total.div_ceil(workgroup_size), 1, 1))
}

// Checks a dispatch against the device's compute limits
pub fn check_limits(geometry : (u32, u32, u32), workgroup_size : u32, limits : &vk::PhysicalDeviceLimits) -> Result<()> {
    let max_count = limits.max_compute_work_group_count[0];
    let max_size = limits.max_compute_work_group_size[0];

    if geometry.0 > max_count {
        return Err(Error::DispatchLimit(format!(
            "Workgroup count {} exceeds device limit {max_count}", geometry.0)));
    }

    if workgroup_size > max_size {
        return Err(Error::DispatchLimit(format!(
            "Workgroup size {workgroup_size} exceeds device limit {max_size}")));
    }

    Ok(())
}


// Command pool with a single primary command buffer
pub struct CommandRecorder {
    device              : Rc<VulkanDevice>,
    vk_command_pool     : vk::CommandPool,
    vk_command_buffer   : vk::CommandBuffer,
}

impl CommandRecorder {
    pub fn new(device : &Rc<VulkanDevice>) -> Result<Self> {
        let vk = device.get();

        let command_pool_info = vk::CommandPoolCreateInfo::default()
            .queue_family_index(device.queue_family());

        let vk_command_pool = unsafe {
            vk.create_command_pool(&command_pool_info, None)
                .map_err(Error::CommandRecording)?
        };

        let command_buffer_info = vk::CommandBufferAllocateInfo::default()
            .command_pool(vk_command_pool)
            .level(vk::CommandBufferLevel::PRIMARY)
            .command_buffer_count(1);

        let vk_command_buffer = unsafe {
            vk.allocate_command_buffers(&command_buffer_info).map_err(|e| {
                vk.destroy_command_pool(vk_command_pool, None);
                Error::CommandRecording(e)
            })?
        };

        tracing::debug!("created command pool {:?}", vk_command_pool);

        Ok(Self {
            device              : device.clone(),
            vk_command_pool     : vk_command_pool,
            vk_command_buffer   : vk_command_buffer[0],
        })
    }

    pub fn command_buffer(&self) -> vk::CommandBuffer {
        self.vk_command_buffer
    }

    // Records pipeline bind, set binds and the dispatch. The buffer is
    // submitted once per recording, recording again resets the pool.
    pub fn record(&self, pipeline : &Pipeline, bindings : &ResourceBindings, geometry : (u32, u32, u32)) -> Result<()> {
        let vk = self.device.get();
        let cmd = self.vk_command_buffer;

        let begin_info = vk::CommandBufferBeginInfo::default()
            .flags(vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT);

        let sets = bindings.sets();
        let (x, y, z) = geometry;

        unsafe {
            // SAFETY: Any previous submission must have completed.
            vk.reset_command_pool(self.vk_command_pool, vk::CommandPoolResetFlags::empty())
                .map_err(Error::CommandRecording)?;

            vk.begin_command_buffer(cmd, &begin_info)
                .map_err(Error::CommandRecording)?;

            vk.cmd_bind_pipeline(cmd, vk::PipelineBindPoint::COMPUTE, pipeline.handle());
            vk.cmd_bind_descriptor_sets(cmd, vk::PipelineBindPoint::COMPUTE,
                pipeline.layout(), 0, &sets, &[]);
            vk.cmd_dispatch(cmd, x, y, z);

            vk.end_command_buffer(cmd)
                .map_err(Error::CommandRecording)?;
        }

        tracing::info!(x, y, z, "recorded dispatch");
        Ok(())
    }
}

impl Drop for CommandRecorder {
    fn drop(&mut self) {
        let vk = self.device.get();

        unsafe {
            vk.destroy_command_pool(self.vk_command_pool, None);
        }
    }
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exact_multiple() {
        assert_eq!(dispatch_geometry(16, 16).unwrap(), (1, 1, 1));
        assert_eq!(dispatch_geometry(64, 16).unwrap(), (4, 1, 1));
    }

    #[test]
    fn rounds_up_partial_workgroup() {
        assert_eq!(dispatch_geometry(17, 16).unwrap(), (2, 1, 1));
        assert_eq!(dispatch_geometry(1, 256).unwrap(), (1, 1, 1));
    }

    #[test]
    fn covers_every_item_without_spare_workgroup() {
        for wg in 1..=64u32 {
            for total in 1..=300u32 {
                let (x, y, z) = dispatch_geometry(total, wg).unwrap();

                assert_eq!((y, z), (1, 1));
                assert!(x * wg >= total);
                assert!((x - 1) * wg < total);
            }
        }
    }

    #[test]
    fn does_not_overflow_near_max() {
        assert_eq!(dispatch_geometry(u32::MAX, 16).unwrap(), (u32::MAX / 16 + 1, 1, 1));
    }

    #[test]
    fn zero_workgroup_size_is_an_error() {
        assert!(matches!(dispatch_geometry(16, 0), Err(Error::DispatchLimit(_))));
    }

    #[test]
    fn enforces_device_limits() {
        let mut limits = vk::PhysicalDeviceLimits::default();
        limits.max_compute_work_group_count = [65535, 65535, 65535];
        limits.max_compute_work_group_size = [1024, 1024, 64];

        assert!(check_limits((65535, 1, 1), 1024, &limits).is_ok());
        assert!(matches!(check_limits((65536, 1, 1), 16, &limits), Err(Error::DispatchLimit(_))));
        assert!(matches!(check_limits((1, 1, 1), 2048, &limits), Err(Error::DispatchLimit(_))));
    }
}
