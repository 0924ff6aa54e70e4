use std::fs;
use std::path::{PathBuf};
use std::process;

// Copies the first field element of every input pair to the output
pub const COPY_KERNEL : &str = r#"
#version 450

layout(local_size_x = 16) in;

struct Fe25519 {
    int value[10];
};

struct DoubleFe25519 {
    Fe25519 value[2];
};

layout(std430, set = 0, binding = 0) readonly buffer Inputs {
    DoubleFe25519 records[];
} inbuf;

layout(std430, set = 1, binding = 0) writeonly buffer Outputs {
    Fe25519 records[];
} outbuf;

void main() {
    uint i = gl_GlobalInvocationID.x;

    if (i >= uint(outbuf.records.length()))
        return;

    outbuf.records[i] = inbuf.records[i].value[0];
}
"#;

pub fn compile_compute(glsl : &str) -> Vec<u32> {
    let compiler = glslang::Compiler::acquire()
        .expect("Failed to acquire glslang instance.");

    let source = glslang::ShaderSource::from(glsl.to_string());

    let mut options = glslang::CompilerOptions::default();
    options.target = glslang::Target::Vulkan {
        version : glslang::VulkanVersion::Vulkan1_0,
        spirv_version : glslang::SpirvVersion::SPIRV1_0,
    };

    let input = glslang::ShaderInput::new(&source,
        glslang::ShaderStage::Compute,
        &options,
        None, None).expect("Invalid shader input");

    compiler.create_shader(input)
        .and_then(|shader| shader.compile())
        .expect("Failed to compile kernel")
}

// Writes the copy kernel to a file unique to this test
pub fn copy_kernel_file(tag : &str) -> PathBuf {
    let words = compile_compute(COPY_KERNEL);
    let bytes : Vec<u8> = words.iter().flat_map(|w| w.to_le_bytes()).collect();

    let path = std::env::temp_dir().join(format!("vkbatch-{}-{tag}.spv", process::id()));
    fs::write(&path, bytes).expect("Failed to write kernel");
    path
}
