use std::ffi::{CStr, CString, c_char, c_void};
use std::rc::{Rc};
use std::sync::atomic::{AtomicU32, Ordering};

use ash::{self, ext, vk};

use crate::error::*;

const VALIDATION_LAYER : &CStr = c"VK_LAYER_KHRONOS_validation";

static VALIDATION_ERRORS : AtomicU32 = AtomicU32::new(0);

// Number of error messages reported by the validation layer so far,
// across all instances in this process
pub fn validation_error_count() -> u32 {
    VALIDATION_ERRORS.load(Ordering::Relaxed)
}

fn make_string_from_vk<const N : usize>(s : &[c_char; N]) -> String {
    make_cstring_from_vk(s).to_string_lossy().into_owned()
}

fn make_cstring_from_vk<const N : usize>(s : &[c_char; N]) -> CString {
    let mut bytes : [u8; N] = [0; N];

    for (i, &c) in s.iter().enumerate() {
        bytes[i] = c as u8;
    }

    CStr::from_bytes_until_nul(&bytes)
        .map(|s| s.into())
        .unwrap_or_default()
}


// Vulkan device creation parameters
#[derive(Debug, Clone)]
pub struct VulkanInfo {
    pub adapter_index : Option<u32>,
    pub debug         : bool,
}

impl VulkanInfo {
    pub fn new() -> Self {
        Self {
            adapter_index : None,
            debug         : false,
        }
    }

    pub fn adapter_index(mut self, index : Option<u32>) -> Self {
        self.adapter_index = index;
        self
    }

    pub fn debug(mut self, enable : bool) -> Self {
        self.debug = enable;
        self
    }
}

impl Default for VulkanInfo {
    fn default() -> Self {
        Self::new()
    }
}


// Vulkan instance with optional validation messenger
pub struct VulkanInstance {
    _vk_entry       : ash::Entry,
    vk_instance     : ash::Instance,
    ext_debug_utils : Option<ext::debug_utils::Instance>,
    vk_messenger    : vk::DebugUtilsMessengerEXT,
    validation      : bool,
}

impl VulkanInstance {
    pub fn new(info : &VulkanInfo) -> Result<Self> {
        let vk_entry = unsafe {
            // SAFETY: The loader is only used through the returned entry,
            // which outlives every object created from it.
            ash::Entry::load().map_err(|e| Error::LoaderUnavailable(e.to_string()))?
        };

        let mut layers : Vec<&CStr> = vec![];
        let mut extensions : Vec<&CStr> = vec![];

        if info.debug {
            let layer_infos = unsafe {
                vk_entry.enumerate_instance_layer_properties()
                    .map_err(Error::InstanceCreation)?
            };

            let found = layer_infos.iter().any(|l| {
                make_cstring_from_vk(&l.layer_name).as_c_str() == VALIDATION_LAYER
            });

            if !found {
                return Err(Error::ValidationLayerUnavailable(
                    VALIDATION_LAYER.to_string_lossy().into_owned()));
            }

            layers.push(VALIDATION_LAYER);
            extensions.push(ext::debug_utils::NAME);
        }

        let layer_names : Vec<*const c_char> = layers.iter()
            .map(|s| s.as_ptr()).collect();

        let extension_names : Vec<*const c_char> = extensions.iter()
            .map(|s| s.as_ptr()).collect();

        let mut messenger_info = vk::DebugUtilsMessengerCreateInfoEXT::default()
            .message_severity(
                vk::DebugUtilsMessageSeverityFlagsEXT::VERBOSE |
                vk::DebugUtilsMessageSeverityFlagsEXT::WARNING |
                vk::DebugUtilsMessageSeverityFlagsEXT::ERROR)
            .message_type(
                vk::DebugUtilsMessageTypeFlagsEXT::GENERAL |
                vk::DebugUtilsMessageTypeFlagsEXT::VALIDATION |
                vk::DebugUtilsMessageTypeFlagsEXT::PERFORMANCE)
            .pfn_user_callback(Some(Self::debug_callback));

        let app_info = vk::ApplicationInfo::default()
            .application_name(c"vkbatch")
            .application_version(vk::make_api_version(0, 0, 1, 0))
            .engine_name(c"No Engine")
            .api_version(vk::API_VERSION_1_0);

        let mut instance_info = vk::InstanceCreateInfo::default()
            .application_info(&app_info)
            .enabled_layer_names(&layer_names)
            .enabled_extension_names(&extension_names);

        if info.debug {
            instance_info = instance_info.push_next(&mut messenger_info);
        }

        let vk_instance = unsafe {
            vk_entry.create_instance(&instance_info, None)
                .map_err(Error::InstanceCreation)?
        };

        let ext_debug_utils = if info.debug {
            Some(ext::debug_utils::Instance::new(&vk_entry, &vk_instance))
        } else {
            None
        };

        let mut vk_messenger = vk::DebugUtilsMessengerEXT::null();

        if let Some(ext_debug_utils) = &ext_debug_utils {
            let status = unsafe {
                ext_debug_utils.create_debug_utils_messenger(&messenger_info, None)
            };

            // Missing messenger only loses diagnostics
            match status {
                Ok(object)  => { vk_messenger = object; },
                Err(e)      => { tracing::warn!("Failed to create debug utils messenger: {e}"); },
            }
        }

        tracing::debug!(validation = info.debug, "created Vulkan instance");

        Ok(Self {
            _vk_entry       : vk_entry,
            vk_instance     : vk_instance,
            ext_debug_utils : ext_debug_utils,
            vk_messenger    : vk_messenger,
            validation      : info.debug,
        })
    }

    pub fn get<'a>(&'a self) -> &'a ash::Instance {
        &self.vk_instance
    }
}

impl VulkanInstance {
    unsafe extern "system" fn debug_callback(
        severity    : vk::DebugUtilsMessageSeverityFlagsEXT,
        _type_flags : vk::DebugUtilsMessageTypeFlagsEXT,
        data        : *const vk::DebugUtilsMessengerCallbackDataEXT<'_>,
        _user_data  : *mut c_void) -> vk::Bool32 {
        let data = unsafe {
            // SAFETY: We kinda have to assume that Vulkan gives us
            // valid pointers to work with if they are not null
            if data.is_null() {
                return vk::FALSE;
            }

            *data
        };

        let message = unsafe {
            if !data.p_message.is_null() {
                CStr::from_ptr(data.p_message).to_string_lossy().into_owned()
            } else {
                String::new()
            }
        };

        let id = data.message_id_number;

        if severity.contains(vk::DebugUtilsMessageSeverityFlagsEXT::ERROR) {
            VALIDATION_ERRORS.fetch_add(1, Ordering::Relaxed);
            tracing::error!(target: "vkbatch::validation", id, "{message}");
        } else if severity.contains(vk::DebugUtilsMessageSeverityFlagsEXT::WARNING) {
            tracing::warn!(target: "vkbatch::validation", id, "{message}");
        } else {
            tracing::trace!(target: "vkbatch::validation", id, "{message}");
        }

        vk::FALSE
    }
}

impl Drop for VulkanInstance {
    fn drop(&mut self) {
        unsafe {
            if let Some(ext_debug_utils) = self.ext_debug_utils.take() &&
                    self.vk_messenger != vk::DebugUtilsMessengerEXT::null() {
                ext_debug_utils.destroy_debug_utils_messenger(self.vk_messenger, None);
            }

            self.vk_instance.destroy_instance(None);
        }
    }
}


// Returns the first queue family that can run compute work
pub fn find_compute_queue_family(families : &[vk::QueueFamilyProperties]) -> Option<u32> {
    families.iter().enumerate()
        .filter(|(_, p)| p.queue_count > 0 && p.queue_flags.contains(vk::QueueFlags::COMPUTE))
        .map(|(index, _)| index as u32)
        .next()
}


// Physical device as seen during selection
#[derive(Debug, Clone)]
pub struct AdapterCandidate {
    pub name            : String,
    pub queue_families  : Vec<vk::QueueFamilyProperties>,
}

// Picks the adapter to open and its compute queue family. Without an
// explicit index, the first adapter with a compute family wins.
pub fn select_adapter(candidates : &[AdapterCandidate], preferred : Option<u32>) -> Result<(usize, u32)> {
    if candidates.is_empty() {
        return Err(Error::NoSuitableDevice("no Vulkan devices present".into()));
    }

    if let Some(index) = preferred {
        let candidate = candidates.get(index as usize).ok_or_else(|| Error::NoSuitableDevice(
            format!("adapter index {index} out of range ({} present)", candidates.len())))?;

        let family = find_compute_queue_family(&candidate.queue_families)
            .ok_or_else(|| Error::NoComputeQueue(candidate.name.clone()))?;

        return Ok((index as usize, family));
    }

    candidates.iter().enumerate()
        .find_map(|(index, c)| find_compute_queue_family(&c.queue_families).map(|f| (index, f)))
        .ok_or_else(|| Error::NoComputeQueue(candidates.iter()
            .map(|c| c.name.as_str()).collect::<Vec<_>>().join(", ")))
}


// Opened device with a single compute queue
pub struct VulkanDevice {
    _instance     : Rc<VulkanInstance>,
    name          : String,
    limits        : vk::PhysicalDeviceLimits,
    memory        : vk::PhysicalDeviceMemoryProperties,
    queue_family  : u32,
    vk_device     : ash::Device,
    vk_queue      : vk::Queue,
}

impl VulkanDevice {
    pub fn new(instance : &Rc<VulkanInstance>, info : &VulkanInfo) -> Result<Self> {
        let vk = instance.get();

        let adapters = unsafe {
            vk.enumerate_physical_devices().map_err(
                |e| Error::NoSuitableDevice(format!("failed to query adapters: {e}")))?
        };

        let candidates : Vec<_> = adapters.iter().map(|&adapter| {
            let properties = unsafe { vk.get_physical_device_properties(adapter) };
            let queue_families = unsafe { vk.get_physical_device_queue_family_properties(adapter) };

            AdapterCandidate {
                name            : make_string_from_vk(&properties.device_name),
                queue_families  : queue_families,
            }
        }).collect();

        let (adapter_index, queue_family) = select_adapter(&candidates, info.adapter_index)?;
        let adapter = adapters[adapter_index];

        let (properties, memory) = unsafe {
            (vk.get_physical_device_properties(adapter),
             vk.get_physical_device_memory_properties(adapter))
        };

        let queue_prios = [1.0f32];

        let queue_info = [
            vk::DeviceQueueCreateInfo::default()
                .queue_family_index(queue_family)
                .queue_priorities(&queue_prios)
        ];

        let features = vk::PhysicalDeviceFeatures::default();

        // Device layers are deprecated but still honored by old loaders
        let layer_names : Vec<*const c_char> = if instance.validation {
            vec![VALIDATION_LAYER.as_ptr()]
        } else {
            vec![]
        };

        #[allow(deprecated)]
        let device_info = vk::DeviceCreateInfo::default()
            .queue_create_infos(&queue_info)
            .enabled_layer_names(&layer_names)
            .enabled_features(&features);

        let vk_device = unsafe {
            vk.create_device(adapter, &device_info, None)
                .map_err(Error::DeviceCreation)?
        };

        let vk_queue = unsafe {
            vk_device.get_device_queue(queue_family, 0)
        };

        let name = candidates[adapter_index].name.clone();
        let limits = properties.limits;

        tracing::info!(queue_family, "Using device {name}");
        tracing::info!("maxComputeWorkGroupCount: {:?}", limits.max_compute_work_group_count);
        tracing::info!("maxComputeWorkGroupSize: {:?}", limits.max_compute_work_group_size);
        tracing::info!("maxComputeWorkGroupInvocations: {}", limits.max_compute_work_group_invocations);

        Ok(Self {
            _instance     : instance.clone(),
            name          : name,
            limits        : limits,
            memory        : memory,
            queue_family  : queue_family,
            vk_device     : vk_device,
            vk_queue      : vk_queue,
        })
    }

    pub fn get<'a>(&'a self) -> &'a ash::Device {
        &self.vk_device
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn limits(&self) -> &vk::PhysicalDeviceLimits {
        &self.limits
    }

    pub fn memory_properties(&self) -> &vk::PhysicalDeviceMemoryProperties {
        &self.memory
    }

    pub fn queue_family(&self) -> u32 {
        self.queue_family
    }

    pub fn queue(&self) -> vk::Queue {
        self.vk_queue
    }

}

impl Drop for VulkanDevice {
    fn drop(&mut self) {
        unsafe {
            self.vk_device.destroy_device(None);
        }
    }
}


#[cfg(test)]
mod tests {
    use super::*;

    fn family(flags : vk::QueueFlags, count : u32) -> vk::QueueFamilyProperties {
        vk::QueueFamilyProperties {
            queue_flags : flags,
            queue_count : count,
            ..Default::default()
        }
    }

    fn candidate(name : &str, families : Vec<vk::QueueFamilyProperties>) -> AdapterCandidate {
        AdapterCandidate {
            name            : name.to_string(),
            queue_families  : families,
        }
    }

    #[test]
    fn compute_family_needs_queues() {
        let families = [
            family(vk::QueueFlags::TRANSFER, 2),
            family(vk::QueueFlags::COMPUTE, 0),
            family(vk::QueueFlags::GRAPHICS | vk::QueueFlags::COMPUTE, 1),
        ];

        assert_eq!(find_compute_queue_family(&families), Some(2));
        assert_eq!(find_compute_queue_family(&families[..2]), None);
    }

    #[test]
    fn first_compute_capable_adapter_wins() {
        let candidates = [
            candidate("transfer-only", vec![family(vk::QueueFlags::TRANSFER, 1)]),
            candidate("compute", vec![
                family(vk::QueueFlags::GRAPHICS, 1),
                family(vk::QueueFlags::COMPUTE, 4),
            ]),
            candidate("also-compute", vec![family(vk::QueueFlags::COMPUTE, 1)]),
        ];

        assert_eq!(select_adapter(&candidates, None).unwrap(), (1, 1));
    }

    #[test]
    fn selection_errors() {
        assert!(matches!(select_adapter(&[], None), Err(Error::NoSuitableDevice(_))));

        let graphics_only = [candidate("gfx", vec![family(vk::QueueFlags::GRAPHICS, 1)])];
        assert!(matches!(select_adapter(&graphics_only, None), Err(Error::NoComputeQueue(_))));

        assert!(matches!(select_adapter(&graphics_only, Some(3)), Err(Error::NoSuitableDevice(_))));
    }

    #[test]
    fn explicit_adapter_must_have_compute() {
        let candidates = [
            candidate("compute", vec![family(vk::QueueFlags::COMPUTE, 1)]),
            candidate("gfx", vec![family(vk::QueueFlags::GRAPHICS, 1)]),
        ];

        assert_eq!(select_adapter(&candidates, Some(0)).unwrap(), (0, 0));

        match select_adapter(&candidates, Some(1)) {
            Err(Error::NoComputeQueue(name)) => assert_eq!(name, "gfx"),
            other => panic!("unexpected selection: {:?}", other),
        }
    }

    #[test]
    fn vk_strings_stop_at_nul() {
        let mut raw = [0 as c_char; 8];
        for (i, b) in b"gpu".iter().enumerate() {
            raw[i] = *b as c_char;
        }

        assert_eq!(make_string_from_vk(&raw), "gpu");
    }
}
