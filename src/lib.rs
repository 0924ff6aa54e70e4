pub mod bindings;
pub mod buffer;
pub mod command;
pub mod config;
pub mod data_conv;
pub mod error;
pub mod marshal;
pub mod memory;
pub mod pipeline;
pub mod records;
pub mod session;
pub mod shader;
pub mod shader_reflection;
pub mod sync;
pub mod vulkan;

pub use config::{DispatchConfig};
pub use error::{Error, ErrorClass, Result};
pub use records::{BatchLayout, DoubleFe25519, Fe25519};
pub use session::{ComputeSession};
