use std::io;
use std::path::{PathBuf};
use std::time::{Duration};

use ash::vk;

use thiserror::Error;

// Broad failure category. All of them are fatal for a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    // No usable loader, device or queue
    Environment,
    // Memory, buffer or mapping failures
    Resource,
    // Kernel module or pipeline rejected
    Pipeline,
    // Submission or completion failures
    Execution,
    // Invalid configuration or input files
    Configuration,
}

#[derive(Debug, Error)]
pub enum Error {
    #[error("Failed to load Vulkan library: {0}")]
    LoaderUnavailable(String),

    #[error("Validation layer requested, but not available: {0}")]
    ValidationLayerUnavailable(String),

    #[error("Failed to create Vulkan instance: {0}")]
    InstanceCreation(vk::Result),

    #[error("No suitable device found: {0}")]
    NoSuitableDevice(String),

    #[error("Device '{0}' has no compute-capable queue family")]
    NoComputeQueue(String),

    #[error("Failed to create Vulkan device: {0}")]
    DeviceCreation(vk::Result),

    #[error("No memory type matches type bits {type_bits:#x} with properties {flags:?}")]
    NoMatchingMemoryType {
        type_bits : u32,
        flags     : vk::MemoryPropertyFlags,
    },

    #[error("Failed to create buffer: {0}")]
    BufferCreation(vk::Result),

    #[error("Failed to allocate memory: {0}")]
    Allocation(vk::Result),

    #[error("Failed to map memory: {0}")]
    MemoryMap(vk::Result),

    #[error("Region of {len} bytes is not a whole number of {stride}-byte records")]
    RecordLayout {
        len     : usize,
        stride  : usize,
    },

    #[error("{0}")]
    HostAccess(String),

    #[error("Failed to load kernel module: {0}")]
    ShaderLoad(String),

    #[error("Failed to create pipeline: {0}")]
    PipelineCreation(String),

    #[error("Dispatch exceeds device limits: {0}")]
    DispatchLimit(String),

    #[error("Failed to record commands: {0}")]
    CommandRecording(vk::Result),

    #[error("Failed to submit commands: {0}")]
    Submission(vk::Result),

    #[error("Failed to wait for fence: {0}")]
    FenceWait(vk::Result),

    #[error("Dispatch did not complete within {0:?}")]
    DispatchTimeout(Duration),

    #[error("Session unusable after failed dispatch: {0}")]
    SessionAborted(String),

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("Failed to access {path}: {source}")]
    Io {
        path    : PathBuf,
        source  : io::Error,
    },
}

impl Error {
    pub fn class(&self) -> ErrorClass {
        match self {
            Error::LoaderUnavailable(_) |
            Error::ValidationLayerUnavailable(_) |
            Error::InstanceCreation(_) |
            Error::NoSuitableDevice(_) |
            Error::NoComputeQueue(_) |
            Error::DeviceCreation(_) => ErrorClass::Environment,

            Error::NoMatchingMemoryType { .. } |
            Error::BufferCreation(_) |
            Error::Allocation(_) |
            Error::MemoryMap(_) |
            Error::RecordLayout { .. } |
            Error::HostAccess(_) => ErrorClass::Resource,

            Error::ShaderLoad(_) |
            Error::PipelineCreation(_) |
            Error::DispatchLimit(_) => ErrorClass::Pipeline,

            Error::CommandRecording(_) |
            Error::Submission(_) |
            Error::FenceWait(_) |
            Error::DispatchTimeout(_) |
            Error::SessionAborted(_) => ErrorClass::Execution,

            Error::Config(_) |
            Error::Io { .. } => ErrorClass::Configuration,
        }
    }

    pub(crate) fn io(path : impl Into<PathBuf>, source : io::Error) -> Self {
        Error::Io { path : path.into(), source : source }
    }
}

pub type Result<T> = std::result::Result<T, Error>;


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classes_follow_taxonomy() {
        assert_eq!(Error::NoComputeQueue("gpu".into()).class(), ErrorClass::Environment);
        assert_eq!(Error::NoMatchingMemoryType {
            type_bits : 0x3,
            flags     : vk::MemoryPropertyFlags::HOST_VISIBLE,
        }.class(), ErrorClass::Resource);
        assert_eq!(Error::ShaderLoad("missing".into()).class(), ErrorClass::Pipeline);
        assert_eq!(Error::DispatchTimeout(Duration::from_secs(1)).class(), ErrorClass::Execution);
        assert_eq!(Error::SessionAborted("timeout".into()).class(), ErrorClass::Execution);
    }

    #[test]
    fn timeout_message_names_bound() {
        let e = Error::DispatchTimeout(Duration::from_millis(250));
        assert_eq!(e.to_string(), "Dispatch did not complete within 250ms");
    }
}
