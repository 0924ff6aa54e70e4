use std::rc::{Rc};

use ash::vk;

use crate::bindings::*;
use crate::error::*;
use crate::shader::*;
use crate::shader_reflection::*;
use crate::vulkan::*;

// Checks the kernel's declared interface against what the host binds
pub fn check_kernel_interface(kernel : &KernelModule, slots : &[(u32, u32)], workgroup_size : u32) -> Result<()> {
    let (local_x, local_y, local_z) = kernel.workgroup_size();

    if local_x != workgroup_size || local_y != 1 || local_z != 1 {
        return Err(Error::PipelineCreation(format!(
            "Kernel local size ({local_x}, {local_y}, {local_z}) does not match workgroup size {workgroup_size}")));
    }

    for resource in kernel.resources() {
        match resource.kind {
            ResourceKind::StorageBuffer |
            ResourceKind::UniformBuffer => { },
            _ => continue,
        }

        if resource.kind != ResourceKind::StorageBuffer {
            return Err(Error::PipelineCreation(format!(
                "Kernel resource '{}' is a {:?}, expected a storage buffer", resource.name, resource.kind)));
        }

        if resource.array_size != 1 {
            return Err(Error::PipelineCreation(format!(
                "Kernel resource '{}' is an array of buffers, expected a single buffer", resource.name)));
        }

        if !slots.contains(&resource.slot()) {
            return Err(Error::PipelineCreation(format!(
                "Kernel resource '{}' at set {}, binding {} has no matching buffer",
                resource.name, resource.set, resource.binding)));
        }
    }

    Ok(())
}


// Compute pipeline with its layout and shader module
pub struct Pipeline {
    device            : Rc<VulkanDevice>,
    vk_module         : vk::ShaderModule,
    vk_layout         : vk::PipelineLayout,
    vk_pipeline       : vk::Pipeline,
}

impl Pipeline {
    pub fn new(device : &Rc<VulkanDevice>, kernel : &KernelModule, bindings : &ResourceBindings, workgroup_size : u32) -> Result<Self> {
        check_kernel_interface(kernel, &bindings.slots(), workgroup_size)?;

        let vk = device.get();

        let module_info = vk::ShaderModuleCreateInfo::default()
            .code(kernel.code());

        let vk_module = unsafe {
            vk.create_shader_module(&module_info, None).map_err(
                |e| Error::PipelineCreation(format!("Failed to create shader module: {e}")))?
        };

        let vk_layout = Self::create_pipeline_layout(vk, &bindings.set_layouts()).map_err(|e| {
            unsafe { vk.destroy_shader_module(vk_module, None); }
            e
        })?;

        let vk_pipeline = Self::create_pipeline(vk, vk_module, vk_layout).map_err(|e| {
            unsafe {
                vk.destroy_pipeline_layout(vk_layout, None);
                vk.destroy_shader_module(vk_module, None);
            }
            e
        })?;

        tracing::debug!("created compute pipeline {:?}", vk_pipeline);

        Ok(Self {
            device            : device.clone(),
            vk_module         : vk_module,
            vk_layout         : vk_layout,
            vk_pipeline       : vk_pipeline,
        })
    }

    pub(crate) fn handle(&self) -> vk::Pipeline {
        self.vk_pipeline
    }

    pub(crate) fn layout(&self) -> vk::PipelineLayout {
        self.vk_layout
    }
}

impl Pipeline {
    fn create_pipeline_layout(vk : &ash::Device, set_layouts : &[vk::DescriptorSetLayout]) -> Result<vk::PipelineLayout> {
        let create_info = vk::PipelineLayoutCreateInfo::default()
            .set_layouts(set_layouts);

        let vk_pipeline_layout = unsafe {
            vk.create_pipeline_layout(&create_info, None).map_err(
                |e| Error::PipelineCreation(format!("Failed to create pipeline layout: {e}")))?
        };

        Ok(vk_pipeline_layout)
    }

    fn create_pipeline(vk : &ash::Device, module : vk::ShaderModule, layout : vk::PipelineLayout) -> Result<vk::Pipeline> {
        let stage_info = vk::PipelineShaderStageCreateInfo::default()
            .stage(vk::ShaderStageFlags::COMPUTE)
            .module(module)
            .name(c"main");

        let info = [
            vk::ComputePipelineCreateInfo::default()
                .stage(stage_info)
                .layout(layout)
                .base_pipeline_index(-1)
        ];

        let vk_pipelines = unsafe {
            vk.create_compute_pipelines(vk::PipelineCache::null(), &info, None).map_err(
                |(_, e)| Error::PipelineCreation(format!("Failed to create compute pipeline: {e}")))?
        };

        vk_pipelines.first().copied().ok_or_else(||
            Error::PipelineCreation("No compute pipeline returned".into()))
    }
}

impl Drop for Pipeline {
    fn drop(&mut self) {
        let vk = self.device.get();

        unsafe {
            vk.destroy_pipeline(self.vk_pipeline, None);
            vk.destroy_pipeline_layout(self.vk_layout, None);
            vk.destroy_shader_module(self.vk_module, None);
        }
    }
}
