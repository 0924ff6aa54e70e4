use std::collections::{HashMap};

use rspirv::{binary, dr, spirv};

use crate::error::*;

// Name of the entry point every kernel must export
pub const ENTRY_POINT : &str = "main";


// Decorations relevant to descriptor bindings and the workgroup size
#[derive(Debug, Default, Clone)]
struct SpvDecorations {
    buffer_block    : bool,
    set             : Option<u32>,
    binding         : Option<u32>,
    workgroup_size  : bool,
}

impl SpvDecorations {
    fn parse(&mut self, kind : spirv::Decoration, operands : &[dr::Operand]) -> binary::ParseAction {
        use dr::Operand::*;

        match (kind, operands.first()) {
            (spirv::Decoration::BufferBlock, _) => {
                self.buffer_block = true;
            },

            (spirv::Decoration::Binding, Some(&LiteralBit32(index))) => {
                self.binding = Some(index);
            },

            (spirv::Decoration::DescriptorSet, Some(&LiteralBit32(index))) => {
                self.set = Some(index);
            },

            (spirv::Decoration::BuiltIn, Some(&BuiltIn(spirv::BuiltIn::WorkgroupSize))) => {
                self.workgroup_size = true;
            },

            (spirv::Decoration::Binding, _) |
            (spirv::Decoration::DescriptorSet, _) => {
                return binary::ParseAction::Error(format!("Invalid {kind:?} decoration").into());
            },

            _ => { },
        }

        binary::ParseAction::Continue
    }
}


// SPIR-V type info, only what is needed to classify resources
#[derive(Debug, Clone, PartialEq, Eq)]
enum SpvType {
    Int(u32, bool),
    Array(spirv::Word, u32),
    RuntimeArray(spirv::Word),
    Pointer(spirv::Word),
    Struct,
    Image,
    Sampler,
    SampledImage,
}


#[derive(Debug)]
struct SpvVariable {
    storage_class : spirv::StorageClass,
    pointee_type  : spirv::Word,
}


#[derive(Debug, Copy, Clone, PartialEq)]
enum SpvConstant {
    U32(u32),
    I32(i32),
    U64(u64),
    I64(i64),
}


#[derive(Debug, Clone)]
struct SpvEntryPoint {
    id                  : spirv::Word,
    execution_model     : spirv::ExecutionModel,
}


#[derive(Debug, Default, Clone)]
struct SpvExecutionModes {
    local_size          : Option<(u32, u32, u32)>,
    local_size_id       : Option<(spirv::Word, spirv::Word, spirv::Word)>,
}


// Kind of descriptor a kernel variable expects
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResourceKind {
    StorageBuffer,
    UniformBuffer,
    Image,
    Sampler,
}


// Descriptor-backed variable declared by a kernel
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KernelResource {
    pub name        : String,
    pub set         : u32,
    pub binding     : u32,
    pub kind        : ResourceKind,
    // Number of descriptors, zero for runtime-sized arrays
    pub array_size  : u32,
}

impl KernelResource {
    pub fn slot(&self) -> (u32, u32) {
        (self.set, self.binding)
    }
}


// Shader reflection parser
#[derive(Debug, Default)]
struct SpvReflector {
    names               : HashMap<spirv::Word, String>,
    decorations         : HashMap<spirv::Word, SpvDecorations>,
    constants           : HashMap<spirv::Word, SpvConstant>,
    composites          : HashMap<spirv::Word, Vec<spirv::Word>>,
    types               : HashMap<spirv::Word, SpvType>,
    variables           : Vec<(spirv::Word, SpvVariable)>,
    execution_modes     : HashMap<spirv::Word, SpvExecutionModes>,
    entry_points        : HashMap<String, SpvEntryPoint>,
}

impl SpvReflector {
    fn get_reflection(&self) -> Result<Reflection> {
        let entry_point = self.entry_points.get(ENTRY_POINT).ok_or_else(||
            Error::ShaderLoad(format!("Entry point '{ENTRY_POINT}' not found")))?;

        if entry_point.execution_model != spirv::ExecutionModel::GLCompute {
            return Err(Error::ShaderLoad(format!(
                "Entry point '{ENTRY_POINT}' is not a compute kernel, model is {:?}", entry_point.execution_model)));
        }

        Ok(Reflection {
            workgroup_size  : self.get_workgroup_size(entry_point)?,
            resources       : self.get_resources()?,
        })
    }

    // A constant decorated with the WorkgroupSize built-in takes
    // precedence over the LocalSize and LocalSizeId execution modes.
    fn get_workgroup_size(&self, e : &SpvEntryPoint) -> Result<(u32, u32, u32)> {
        let get = |id| self.get_constant_as_u32(id).ok_or_else(||
            Error::ShaderLoad(format!("Invalid constant '%{id}'")));

        let builtin = self.decorations.iter()
            .find(|(_, d)| d.workgroup_size)
            .map(|(id, _)| *id);

        if let Some(id) = builtin {
            let Some(&[x_id, y_id, z_id]) = self.composites.get(&id).map(Vec::as_slice) else {
                return Err(Error::ShaderLoad(format!("Invalid workgroup size constant '%{id}'")));
            };

            return Ok((get(x_id)?, get(y_id)?, get(z_id)?));
        }

        let modes = self.execution_modes.get(&e.id).ok_or_else(||
            Error::ShaderLoad(format!("No execution modes for '%{}'", e.id)))?;

        if let Some((x, y, z)) = modes.local_size {
            Ok((x, y, z))
        } else if let Some((x_id, y_id, z_id)) = modes.local_size_id {
            Ok((get(x_id)?, get(y_id)?, get(z_id)?))
        } else {
            Err(Error::ShaderLoad("No workgroup size specified".into()))
        }
    }

    // Walks all module-scope variables rather than the entry point
    // interface, which only lists buffers from SPIR-V 1.4 onwards.
    fn get_resources(&self) -> Result<Vec<KernelResource>> {
        let mut resources = Vec::new();

        for (var_id, var) in &self.variables {
            let is_resource = matches!(var.storage_class,
                spirv::StorageClass::Uniform |
                spirv::StorageClass::UniformConstant |
                spirv::StorageClass::StorageBuffer);

            if !is_resource {
                continue;
            }

            let var_ty = self.types.get(&var.pointee_type).ok_or_else(||
                Error::ShaderLoad(format!("Invalid type '%{}'", var.pointee_type)))?;

            let (ty_id, array_size) = match var_ty {
                SpvType::Array(t, n) => (*t, *n),
                SpvType::RuntimeArray(t) => (*t, 0u32),
                _ => (var.pointee_type, 1u32),
            };

            let ty = self.types.get(&ty_id).ok_or_else(||
                Error::ShaderLoad(format!("Invalid type '%{ty_id}'")))?;

            let decorations = self.decorations.get(var_id).cloned().unwrap_or_default();
            let type_decorations = self.decorations.get(&ty_id).cloned().unwrap_or_default();

            let kind = match ty {
                SpvType::Struct => {
                    if var.storage_class == spirv::StorageClass::StorageBuffer || type_decorations.buffer_block {
                        ResourceKind::StorageBuffer
                    } else {
                        ResourceKind::UniformBuffer
                    }
                },

                SpvType::Image |
                SpvType::SampledImage => ResourceKind::Image,

                SpvType::Sampler => ResourceKind::Sampler,

                _ => {
                    return Err(Error::ShaderLoad(format!("Unsupported resource type: {ty:?}")));
                },
            };

            let name = self.names.get(var_id).cloned()
                .filter(|name| !name.is_empty())
                .or_else(|| self.names.get(&ty_id).cloned())
                .unwrap_or_else(|| format!("_{var_id}"));

            resources.push(KernelResource {
                name        : name,
                set         : decorations.set.unwrap_or(0),
                binding     : decorations.binding.unwrap_or(0),
                kind        : kind,
                array_size  : array_size,
            });
        }

        resources.sort_by_key(|r| r.slot());
        Ok(resources)
    }

    fn get_constant_as_u32(&self, id : spirv::Word) -> Option<u32> {
        self.constants.get(&id).and_then(|&c| match c {
            SpvConstant::U32(n) => Some(n),
            SpvConstant::U64(n) => n.try_into().ok(),
            SpvConstant::I32(n) => n.try_into().ok(),
            SpvConstant::I64(n) => n.try_into().ok(),
        })
    }

    fn parse_constant(&self, inst : &dr::Instruction) -> Option<SpvConstant> {
        use dr::Operand::*;

        let ty = self.types.get(&inst.result_type?)?;

        match (ty, inst.operands.first()?) {
            (SpvType::Int(64, false), &LiteralBit64(n)) => Some(SpvConstant::U64(n)),
            (SpvType::Int(64, true), &LiteralBit64(n)) => Some(SpvConstant::I64(n as i64)),
            (SpvType::Int(_, false), &LiteralBit32(n)) => Some(SpvConstant::U32(n)),
            (SpvType::Int(_, true), &LiteralBit32(n)) => Some(SpvConstant::I32(n as i32)),
            _ => None,
        }
    }

    fn parse_instruction(&mut self, inst : &dr::Instruction) -> std::result::Result<(), String> {
        use spirv::Op;
        use dr::Operand::*;

        let opcode = inst.class.opcode;
        let result_id = || inst.result_id.ok_or_else(|| format!("Missing result ID for {opcode:?}"));
        let malformed = || format!("Failed to parse {opcode:?}");

        match opcode {
            Op::EntryPoint => {
                let [ExecutionModel(model), IdRef(id), LiteralString(name), ..] = &inst.operands[..] else {
                    return Err(malformed());
                };

                self.entry_points.insert(name.clone(), SpvEntryPoint {
                    id              : *id,
                    execution_model : *model,
                });
            },

            Op::ExecutionMode => {
                let [IdRef(entry_point), ExecutionMode(mode), params @ ..] = &inst.operands[..] else {
                    return Err(malformed());
                };

                let modes = self.execution_modes.entry(*entry_point).or_default();

                match (*mode, params) {
                    (spirv::ExecutionMode::LocalSize, &[LiteralBit32(x), LiteralBit32(y), LiteralBit32(z)]) => {
                        modes.local_size = Some((x, y, z));
                    },

                    (spirv::ExecutionMode::LocalSize, _) => {
                        return Err(malformed());
                    },

                    _ => { },
                }
            },

            Op::ExecutionModeId => {
                let [IdRef(entry_point), ExecutionMode(mode), params @ ..] = &inst.operands[..] else {
                    return Err(malformed());
                };

                if *mode == spirv::ExecutionMode::LocalSizeId {
                    let &[IdRef(x), IdRef(y), IdRef(z)] = params else {
                        return Err(malformed());
                    };

                    self.execution_modes.entry(*entry_point).or_default()
                        .local_size_id = Some((x, y, z));
                }
            },

            Op::Name => {
                let [IdRef(id), LiteralString(name)] = &inst.operands[..] else {
                    return Err(malformed());
                };

                self.names.insert(*id, name.clone());
            },

            Op::Decorate => {
                let [IdRef(id), Decoration(kind), operands @ ..] = &inst.operands[..] else {
                    return Err(malformed());
                };

                let action = self.decorations.entry(*id).or_default().parse(*kind, operands);

                if let binary::ParseAction::Error(e) = action {
                    return Err(e.to_string());
                }
            },

            Op::TypeInt => {
                let [LiteralBit32(width), LiteralBit32(sign)] = inst.operands[..] else {
                    return Err(malformed());
                };

                self.types.insert(result_id()?, SpvType::Int(width, sign != 0));
            },

            Op::TypeArray => {
                let [IdRef(base_id), IdRef(size_id)] = inst.operands[..] else {
                    return Err(malformed());
                };

                let size = self.get_constant_as_u32(size_id).ok_or_else(malformed)?;
                self.types.insert(result_id()?, SpvType::Array(base_id, size));
            },

            Op::TypeRuntimeArray => {
                let [IdRef(base_id)] = inst.operands[..] else {
                    return Err(malformed());
                };

                self.types.insert(result_id()?, SpvType::RuntimeArray(base_id));
            },

            Op::TypeStruct => {
                self.types.insert(result_id()?, SpvType::Struct);
            },

            Op::TypePointer => {
                let [StorageClass(_), IdRef(base)] = inst.operands[..] else {
                    return Err(malformed());
                };

                self.types.insert(result_id()?, SpvType::Pointer(base));
            },

            Op::TypeImage => {
                self.types.insert(result_id()?, SpvType::Image);
            },

            Op::TypeSampler => {
                self.types.insert(result_id()?, SpvType::Sampler);
            },

            Op::TypeSampledImage => {
                self.types.insert(result_id()?, SpvType::SampledImage);
            },

            Op::Constant | Op::SpecConstant => {
                if let Some(constant) = self.parse_constant(inst) {
                    self.constants.insert(result_id()?, constant);
                }
            },

            Op::ConstantComposite | Op::SpecConstantComposite => {
                let constituents = inst.operands.iter().map(|op| match op {
                    IdRef(id) => Ok(*id),
                    _ => Err(malformed()),
                }).collect::<std::result::Result<Vec<_>, _>>()?;

                self.composites.insert(result_id()?, constituents);
            },

            Op::Variable => {
                let id = result_id()?;
                let ptr_type_id = inst.result_type.ok_or_else(malformed)?;

                let Some(&StorageClass(class)) = inst.operands.first() else {
                    return Err(malformed());
                };

                let Some(&SpvType::Pointer(var_type_id)) = self.types.get(&ptr_type_id) else {
                    return Err(malformed());
                };

                self.variables.push((id, SpvVariable {
                    pointee_type  : var_type_id,
                    storage_class : class,
                }));
            },

            _ => { },
        }

        Ok(())
    }
}

impl binary::Consumer for SpvReflector {
    fn initialize(&mut self) -> binary::ParseAction {
        binary::ParseAction::Continue
    }

    fn finalize(&mut self) -> binary::ParseAction {
        // If we send 'Stop' here, parse returns an error, so don't
        binary::ParseAction::Continue
    }

    fn consume_header(&mut self, _module : dr::ModuleHeader) -> binary::ParseAction {
        binary::ParseAction::Continue
    }

    fn consume_instruction(&mut self, inst : dr::Instruction) -> binary::ParseAction {
        match self.parse_instruction(&inst) {
            Ok(()) => binary::ParseAction::Continue,
            Err(e) => binary::ParseAction::Error(e.into()),
        }
    }
}


// Kernel reflection data
#[derive(Debug, Default, Clone)]
pub struct Reflection {
    pub workgroup_size  : (u32, u32, u32),
    pub resources       : Vec<KernelResource>,
}

impl Reflection {
    pub fn from_spv(code : &[u32]) -> Result<Self> {
        let mut reflector = SpvReflector::default();

        binary::parse_words(code, &mut reflector).map_err(
            |e| Error::ShaderLoad(format!("Failed to parse SPIR-V: {e}")))?;

        reflector.get_reflection()
    }
}
