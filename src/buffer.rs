use std::ops::{Deref, DerefMut};
use std::rc::{Rc};
use std::slice;

use ash::vk;

use crate::error::*;
use crate::memory::*;
use crate::vulkan::*;

// Which side of the kernel a buffer sits on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BufferRole {
    // Read by the kernel, written by the host before dispatch
    Input,
    // Written by the kernel, read by the host after completion
    Output,
}

impl BufferRole {
    pub const ALL : [BufferRole; 2] = [BufferRole::Input, BufferRole::Output];

    // Descriptor set index the kernel expects this buffer in
    pub fn set_index(&self) -> u32 {
        match self {
            BufferRole::Input => 0,
            BufferRole::Output => 1,
        }
    }

    pub fn cpu_access(&self) -> CpuAccess {
        match self {
            BufferRole::Input => CpuAccess::WRITE,
            BufferRole::Output => CpuAccess::READ,
        }
    }
}


// Vulkan buffer parameters
#[derive(Debug, Default, Clone)]
pub struct BufferInfo {
    pub size        : usize,
    pub cpu_access  : CpuAccess,
}

impl BufferInfo {
    pub fn for_role(role : BufferRole, size : usize) -> Self {
        Self::default()
            .size(size)
            .cpu_access(role.cpu_access())
    }

    pub fn size(mut self, size : usize) -> Self {
        self.size = size;
        self
    }

    pub fn cpu_access(mut self, access : CpuAccess) -> Self {
        self.cpu_access = access;
        self
    }

    // Checks parameters before any Vulkan object is created
    pub fn validate(&self, role : BufferRole) -> Result<()> {
        if self.size == 0 {
            return Err(Error::Config(format!("{role:?} buffer must not be empty")));
        }

        Ok(())
    }
}


// Guard around a mapped memory region. Unmaps once dropped.
pub struct MappedRegion<'a> {
    buffer  : &'a Buffer,
    ptr     : *mut u8,
}

impl<'a> MappedRegion<'a> {
    fn new(buffer : &'a Buffer) -> Result<Self> {
        let ptr = buffer.memory.map()?.cast::<u8>();

        Ok(Self {
            buffer  : buffer,
            ptr     : ptr,
        })
    }
}

impl Deref for MappedRegion<'_> {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        unsafe {
            // SAFETY: The whole allocation is mapped and at least
            // as large as the buffer.
            slice::from_raw_parts(self.ptr, self.buffer.info.size)
        }
    }
}

impl DerefMut for MappedRegion<'_> {
    fn deref_mut(&mut self) -> &mut [u8] {
        unsafe {
            slice::from_raw_parts_mut(self.ptr, self.buffer.info.size)
        }
    }
}

impl Drop for MappedRegion<'_> {
    fn drop(&mut self) {
        self.buffer.memory.unmap();
    }
}


// Storage buffer backed by its own allocation, bound at offset zero
pub struct Buffer {
    device      : Rc<VulkanDevice>,
    role        : BufferRole,
    info        : BufferInfo,
    vk_buffer   : vk::Buffer,
    memory      : Allocation,
}

impl Buffer {
    pub fn new(device : &Rc<VulkanDevice>, role : BufferRole, info : BufferInfo) -> Result<Self> {
        let vk = device.get();

        info.validate(role)?;

        let buffer_info = vk::BufferCreateInfo::default()
            .size(info.size as vk::DeviceSize)
            .usage(vk::BufferUsageFlags::STORAGE_BUFFER)
            .sharing_mode(vk::SharingMode::EXCLUSIVE);

        let vk_buffer = unsafe {
            vk.create_buffer(&buffer_info, None).map_err(Error::BufferCreation)?
        };

        // Allocate memory on suitable memory type, don't bother suballocating
        let memory_requirements = unsafe {
            vk.get_buffer_memory_requirements(vk_buffer)
        };

        let memory = Allocation::new(device, &memory_requirements, info.cpu_access)
            .and_then(|memory| unsafe {
                vk.bind_buffer_memory(vk_buffer, memory.handle(), 0)
                    .map(|_| memory)
                    .map_err(Error::Allocation)
            })
            .map_err(|e| {
                unsafe { vk.destroy_buffer(vk_buffer, None); }
                e
            })?;

        tracing::debug!(?role, size = info.size, "created buffer {:?}", vk_buffer);

        Ok(Self {
            device      : device.clone(),
            role        : role,
            info        : info,
            vk_buffer   : vk_buffer,
            memory      : memory,
        })
    }

    pub fn role(&self) -> BufferRole {
        self.role
    }

    // Buffer properties
    pub fn info<'a>(&'a self) -> &'a BufferInfo {
        &self.info
    }

    pub(crate) fn handle(&self) -> vk::Buffer {
        self.vk_buffer
    }

    // Maps the buffer for host reads
    pub fn map<'a>(&'a self) -> Result<MappedRegion<'a>> {
        self.check_access(CpuAccess::READ)?;
        MappedRegion::new(self)
    }

    // Maps the buffer for host writes
    pub fn map_mut<'a>(&'a mut self) -> Result<MappedRegion<'a>> {
        self.check_access(CpuAccess::WRITE)?;
        MappedRegion::new(self)
    }

    fn check_access(&self, access : CpuAccess) -> Result<()> {
        if !self.info.cpu_access.contains(access) {
            return Err(Error::HostAccess(format!(
                "{:?} buffer does not allow {:?} host access", self.role, access)));
        }

        Ok(())
    }
}

impl Drop for Buffer {
    fn drop(&mut self) {
        unsafe {
            self.device.get().destroy_buffer(self.vk_buffer, None);
        }
    }
}
