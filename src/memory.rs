use std::ffi::{c_void};
use std::rc::{Rc};

use ash::vk;

use bitflags::bitflags;

use crate::error::*;
use crate::vulkan::*;

// CPU access flags for a resource
bitflags! {
    #[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
    pub struct CpuAccess : u32 {
        const READ  = 0x1;
        const WRITE = 0x2;
    }
}

impl CpuAccess {
    // Host-accessible memory is always requested coherent so that mapped
    // writes and device results are visible without explicit flushes.
    pub fn memory_property_flags(&self) -> vk::MemoryPropertyFlags {
        if self.is_empty() {
            vk::MemoryPropertyFlags::DEVICE_LOCAL
        } else {
            vk::MemoryPropertyFlags::HOST_VISIBLE |
            vk::MemoryPropertyFlags::HOST_COHERENT
        }
    }
}


// Returns the first memory type allowed by `type_bits` whose property
// flags contain all of `flags`.
pub fn find_memory_type(
    memory    : &vk::PhysicalDeviceMemoryProperties,
    type_bits : u32,
    flags     : vk::MemoryPropertyFlags
) -> Result<u32> {
    let count = memory.memory_type_count.min(vk::MAX_MEMORY_TYPES as u32);

    let valid_bits = if count >= 32 { !0u32 } else { (1u32 << count) - 1 };
    let mut mask = type_bits & valid_bits;

    while mask != 0 {
        let index = mask.trailing_zeros();

        if memory.memory_types[index as usize].property_flags.contains(flags) {
            return Ok(index);
        }

        mask &= mask - 1;
    }

    Err(Error::NoMatchingMemoryType {
        type_bits : type_bits,
        flags     : flags,
    })
}


// Dedicated device memory allocation, freed on drop
pub struct Allocation {
    device      : Rc<VulkanDevice>,
    vk_memory   : vk::DeviceMemory,
}

impl Allocation {
    pub fn new(device : &Rc<VulkanDevice>, requirements : &vk::MemoryRequirements, access : CpuAccess) -> Result<Self> {
        let memory_type = find_memory_type(device.memory_properties(),
            requirements.memory_type_bits, access.memory_property_flags())?;

        let memory_info = vk::MemoryAllocateInfo::default()
            .allocation_size(requirements.size)
            .memory_type_index(memory_type);

        let vk_memory = unsafe {
            device.get().allocate_memory(&memory_info, None)
                .map_err(Error::Allocation)?
        };

        tracing::debug!(size = requirements.size, memory_type, "allocated device memory {:?}", vk_memory);

        Ok(Self {
            device      : device.clone(),
            vk_memory   : vk_memory,
        })
    }

    pub(crate) fn handle(&self) -> vk::DeviceMemory {
        self.vk_memory
    }

    // Maps the whole allocation. Caller must unmap before mapping again.
    pub(crate) fn map(&self) -> Result<*mut c_void> {
        unsafe {
            self.device.get().map_memory(self.vk_memory, 0,
                vk::WHOLE_SIZE, vk::MemoryMapFlags::empty())
                .map_err(Error::MemoryMap)
        }
    }

    pub(crate) fn unmap(&self) {
        unsafe {
            self.device.get().unmap_memory(self.vk_memory);
        }
    }
}

impl Drop for Allocation {
    fn drop(&mut self) {
        unsafe {
            self.device.get().free_memory(self.vk_memory, None);
        }
    }
}
