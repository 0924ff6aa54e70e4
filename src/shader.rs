use std::fs;
use std::path::{Path};

use crate::error::*;
use crate::shader_reflection::*;

// Packs a byte stream into little-endian 32-bit words, zero-padding
// the tail to a multiple of four bytes.
pub fn pad_to_words(bytes : &[u8]) -> Vec<u32> {
    bytes.chunks(4).map(|chunk| {
        let mut word = [0u8; 4];
        word[..chunk.len()].copy_from_slice(chunk);
        u32::from_le_bytes(word)
    }).collect()
}


// Pre-compiled compute kernel and its reflection data
#[derive(Debug, Clone)]
pub struct KernelModule {
    code        : Vec<u32>,
    reflection  : Reflection,
}

impl KernelModule {
    // Kernel words, padded to a multiple of four bytes
    pub fn code<'a>(&'a self) -> &'a [u32] {
        &self.code
    }

    pub fn workgroup_size(&self) -> (u32, u32, u32) {
        self.reflection.workgroup_size
    }

    // Descriptor-backed variables sorted by set and binding
    pub fn resources<'a>(&'a self) -> &'a [KernelResource] {
        &self.reflection.resources
    }

    pub fn from_words(code : Vec<u32>) -> Result<Self> {
        if code.is_empty() {
            return Err(Error::ShaderLoad("Kernel module is empty".into()));
        }

        let reflection = Reflection::from_spv(&code)?;

        Ok(Self {
            code        : code,
            reflection  : reflection,
        })
    }

    pub fn from_bytes(bytes : &[u8]) -> Result<Self> {
        Self::from_words(pad_to_words(bytes))
    }

    pub fn from_file(path : &Path) -> Result<Self> {
        let bytes = fs::read(path).map_err(|e|
            Error::ShaderLoad(format!("Failed to read {}: {e}", path.display())))?;

        let module = Self::from_bytes(&bytes).map_err(|e| match e {
            Error::ShaderLoad(msg) => Error::ShaderLoad(format!("{}: {msg}", path.display())),
            e => e,
        })?;

        tracing::debug!(path = %path.display(), bytes = bytes.len(),
            workgroup_size = ?module.workgroup_size(), "loaded kernel module");

        Ok(module)
    }
}
