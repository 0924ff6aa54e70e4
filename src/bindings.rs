use std::rc::{Rc};

use ash::vk;

use crate::buffer::*;
use crate::error::*;
use crate::vulkan::*;

// Binding index of the single buffer in each set
pub const BUFFER_BINDING : u32 = 0;


// Descriptor set layout with a single storage buffer binding
pub struct ResourceLayout {
    device            : Rc<VulkanDevice>,
    vk_set_layout     : vk::DescriptorSetLayout,
}

impl ResourceLayout {
    pub fn new(device : &Rc<VulkanDevice>) -> Result<Self> {
        let vk = device.get();

        let bindings = [
            vk::DescriptorSetLayoutBinding::default()
                .binding(BUFFER_BINDING)
                .descriptor_type(vk::DescriptorType::STORAGE_BUFFER)
                .descriptor_count(1)
                .stage_flags(vk::ShaderStageFlags::COMPUTE)
        ];

        let create_info = vk::DescriptorSetLayoutCreateInfo::default()
            .bindings(&bindings);

        let vk_set_layout = unsafe {
            vk.create_descriptor_set_layout(&create_info, None).map_err(|e|
                Error::PipelineCreation(format!("Failed to create descriptor set layout: {e}")))?
        };

        tracing::debug!("created descriptor set layout {:?}", vk_set_layout);

        Ok(Self {
            device        : device.clone(),
            vk_set_layout : vk_set_layout,
        })
    }

    pub(crate) fn handle(&self) -> vk::DescriptorSetLayout {
        self.vk_set_layout
    }
}

impl Drop for ResourceLayout {
    fn drop(&mut self) {
        let vk = self.device.get();

        unsafe {
            vk.destroy_descriptor_set_layout(self.vk_set_layout, None);
        }
    }
}


// Buffer together with the layout and set that expose it to the kernel.
// The layout is destroyed before the buffer and its memory.
pub struct BoundBuffer {
    layout      : ResourceLayout,
    vk_set      : vk::DescriptorSet,
    pub buffer  : Buffer,
}

impl BoundBuffer {
    pub fn role(&self) -> BufferRole {
        self.buffer.role()
    }

    // (set, binding) slot the buffer occupies
    pub fn slot(&self) -> (u32, u32) {
        (self.role().set_index(), BUFFER_BINDING)
    }
}


// Descriptor pool holding one set per buffer role. Freeing the pool
// releases the sets.
pub struct ResourceBindings {
    input       : BoundBuffer,
    output      : BoundBuffer,
    device      : Rc<VulkanDevice>,
    vk_pool     : vk::DescriptorPool,
}

impl ResourceBindings {
    pub fn new(device : &Rc<VulkanDevice>, input : Buffer, output : Buffer) -> Result<Self> {
        if input.role() != BufferRole::Input || output.role() != BufferRole::Output {
            return Err(Error::PipelineCreation(format!(
                "Buffers bound in wrong order: {:?}, {:?}", input.role(), output.role())));
        }

        let vk = device.get();

        let input_layout = ResourceLayout::new(device)?;
        let output_layout = ResourceLayout::new(device)?;

        let pool_sizes = [
            vk::DescriptorPoolSize::default()
                .ty(vk::DescriptorType::STORAGE_BUFFER)
                .descriptor_count(BufferRole::ALL.len() as u32),
        ];

        let pool_info = vk::DescriptorPoolCreateInfo::default()
            .max_sets(BufferRole::ALL.len() as u32)
            .pool_sizes(&pool_sizes);

        let vk_pool = unsafe {
            vk.create_descriptor_pool(&pool_info, None).map_err(|e|
                Error::PipelineCreation(format!("Failed to create descriptor pool: {e}")))?
        };

        tracing::debug!("created descriptor pool {:?}", vk_pool);

        let set_layouts = [input_layout.handle(), output_layout.handle()];

        let set_info = vk::DescriptorSetAllocateInfo::default()
            .descriptor_pool(vk_pool)
            .set_layouts(&set_layouts);

        let sets = unsafe {
            vk.allocate_descriptor_sets(&set_info).map_err(|e| {
                vk.destroy_descriptor_pool(vk_pool, None);
                Error::PipelineCreation(format!("Failed to allocate descriptor sets: {e}"))
            })?
        };

        let bindings = Self {
            input       : BoundBuffer {
                layout  : input_layout,
                vk_set  : sets[0],
                buffer  : input,
            },
            output      : BoundBuffer {
                layout  : output_layout,
                vk_set  : sets[1],
                buffer  : output,
            },
            device      : device.clone(),
            vk_pool     : vk_pool,
        };

        bindings.write_descriptors();
        Ok(bindings)
    }

    pub fn input<'a>(&'a self) -> &'a BoundBuffer {
        &self.input
    }

    pub fn input_mut<'a>(&'a mut self) -> &'a mut BoundBuffer {
        &mut self.input
    }

    pub fn output<'a>(&'a self) -> &'a BoundBuffer {
        &self.output
    }

    // Slots provided to the kernel, in set order
    pub fn slots(&self) -> [(u32, u32); 2] {
        [self.input.slot(), self.output.slot()]
    }

    // Set layouts in set index order
    pub(crate) fn set_layouts(&self) -> [vk::DescriptorSetLayout; 2] {
        [self.input.layout.handle(), self.output.layout.handle()]
    }

    // Descriptor sets in set index order
    pub(crate) fn sets(&self) -> [vk::DescriptorSet; 2] {
        [self.input.vk_set, self.output.vk_set]
    }

    // Points each set's binding at the full range of its buffer
    fn write_descriptors(&self) {
        let vk = self.device.get();

        let input_info = [Self::buffer_info(&self.input.buffer)];
        let output_info = [Self::buffer_info(&self.output.buffer)];

        let writes = [
            Self::descriptor_write(self.input.vk_set, &input_info),
            Self::descriptor_write(self.output.vk_set, &output_info),
        ];

        unsafe {
            vk.update_descriptor_sets(&writes, &[]);
        }
    }

    fn buffer_info(buffer : &Buffer) -> vk::DescriptorBufferInfo {
        vk::DescriptorBufferInfo::default()
            .buffer(buffer.handle())
            .offset(0)
            .range(buffer.info().size as vk::DeviceSize)
    }

    fn descriptor_write<'a>(set : vk::DescriptorSet, info : &'a [vk::DescriptorBufferInfo]) -> vk::WriteDescriptorSet<'a> {
        vk::WriteDescriptorSet::default()
            .dst_set(set)
            .dst_binding(BUFFER_BINDING)
            .dst_array_element(0)
            .descriptor_type(vk::DescriptorType::STORAGE_BUFFER)
            .buffer_info(info)
    }
}

impl Drop for ResourceBindings {
    fn drop(&mut self) {
        let vk = self.device.get();

        unsafe {
            vk.destroy_descriptor_pool(self.vk_pool, None);
        }
    }
}
