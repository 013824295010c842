use wgpu::naga;

/// Scalar `float` member of the parameter uniform block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct UniformMember {
    pub name: String,
    pub offset: u32,
}

/// Layout of the block bound at set 0, binding 0.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub(crate) struct UniformBlock {
    pub size: u32,
    pub members: Vec<UniformMember>,
}

/// Smallest uniform buffer we allocate, one std140 vec4.
const MIN_BLOCK_SIZE: u32 = 16;

impl UniformBlock {
    /// Reads the uniform block at set 0, binding 0 out of a parsed module.
    ///
    /// Only scalar `float` members are addressable; everything else in the
    /// block still counts toward its size.
    pub fn reflect(module: &naga::Module) -> Self {
        let mut block = UniformBlock::default();
        for (_, variable) in module.global_variables.iter() {
            if variable.space != naga::AddressSpace::Uniform {
                continue;
            }
            let at_origin = matches!(
                variable.binding,
                Some(naga::ResourceBinding { group: 0, binding: 0 })
            );
            if !at_origin {
                continue;
            }
            if let naga::TypeInner::Struct { members, span } = &module.types[variable.ty].inner {
                block.size = block.size.max(*span);
                for member in members {
                    let is_float = matches!(
                        module.types[member.ty].inner,
                        naga::TypeInner::Scalar(naga::Scalar {
                            kind: naga::ScalarKind::Float,
                            width: 4,
                        })
                    );
                    if let (true, Some(name)) = (is_float, member.name.as_ref()) {
                        block.members.push(UniformMember {
                            name: name.clone(),
                            offset: member.offset,
                        });
                    }
                }
            }
        }
        block
    }

    pub fn offset_of(&self, name: &str) -> Option<u32> {
        self.members
            .iter()
            .find(|member| member.name == name)
            .map(|member| member.offset)
    }

    /// Union of two stages' views of the block.
    pub fn merge(&self, other: &UniformBlock) -> UniformBlock {
        let mut merged = self.clone();
        merged.size = merged.size.max(other.size);
        for member in &other.members {
            if merged.offset_of(&member.name).is_none() {
                merged.members.push(member.clone());
            }
        }
        merged
    }

    /// Buffer size to allocate, rounded up to a whole vec4.
    pub fn buffer_size(&self) -> u64 {
        let size = self.size.max(MIN_BLOCK_SIZE);
        u64::from(size.div_ceil(MIN_BLOCK_SIZE) * MIN_BLOCK_SIZE)
    }
}

/// Uniform buffer and bind group feeding a linked program.
pub(crate) struct UniformBinding {
    pub buffer: wgpu::Buffer,
    pub bind_group: wgpu::BindGroup,
}

impl UniformBinding {
    pub fn new(device: &wgpu::Device, layout: &wgpu::BindGroupLayout, block: &UniformBlock) -> Self {
        let buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("distortion params"),
            size: block.buffer_size(),
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        let bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("distortion params bind group"),
            layout,
            entries: &[wgpu::BindGroupEntry {
                binding: 0,
                resource: buffer.as_entire_binding(),
            }],
        });
        Self { buffer, bind_group }
    }

    pub fn write_f32(&self, queue: &wgpu::Queue, offset: u32, value: f32) {
        queue.write_buffer(&self.buffer, u64::from(offset), bytemuck::bytes_of(&value));
    }
}

pub(crate) fn uniform_layout(device: &wgpu::Device) -> wgpu::BindGroupLayout {
    device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
        label: Some("uniform layout"),
        entries: &[wgpu::BindGroupLayoutEntry {
            binding: 0,
            visibility: wgpu::ShaderStages::VERTEX_FRAGMENT,
            ty: wgpu::BindingType::Buffer {
                ty: wgpu::BufferBindingType::Uniform,
                has_dynamic_offset: false,
                min_binding_size: None,
            },
            count: None,
        }],
    })
}
