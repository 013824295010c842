use std::borrow::Cow;

use wgpu::naga;

use crate::compile::wrap_fragment;
use crate::types::ShaderStage;

use super::uniforms::{UniformBinding, UniformBlock};

/// A stage that parsed and validated, with its uniform block reflected.
pub struct WgpuShader {
    pub(crate) stage: ShaderStage,
    pub(crate) module: wgpu::ShaderModule,
    pub(crate) block: UniformBlock,
}

/// A linked render pipeline together with its uniform buffer.
pub struct WgpuProgram {
    pub(crate) pipeline: wgpu::RenderPipeline,
    pub(crate) uniforms: UniformBinding,
    pub(crate) block: UniformBlock,
}

fn naga_stage(stage: ShaderStage) -> naga::ShaderStage {
    match stage {
        ShaderStage::Vertex => naga::ShaderStage::Vertex,
        ShaderStage::Fragment => naga::ShaderStage::Fragment,
    }
}

/// Parses and validates GLSL, returning the module or the rendered diagnostic.
///
/// Fragment sources are passed through [`wrap_fragment`] first so GLES-style
/// shaders with loose `k1`/`k2` uniforms compile against the parameter block.
pub(crate) fn parse_glsl(stage: ShaderStage, source: &str) -> Result<naga::Module, String> {
    let source: Cow<'_, str> = match stage {
        ShaderStage::Vertex => Cow::Borrowed(source),
        ShaderStage::Fragment => Cow::Owned(wrap_fragment(source)),
    };
    let options = naga::front::glsl::Options::from(naga_stage(stage));
    let module = naga::front::glsl::Frontend::default()
        .parse(&options, &source)
        .map_err(|errors| errors.emit_to_string(&source))?;

    naga::valid::Validator::new(
        naga::valid::ValidationFlags::all(),
        naga::valid::Capabilities::default(),
    )
    .validate(&module)
    .map_err(|error| error.emit_to_string(&source))?;

    Ok(module)
}

pub(crate) fn compile_shader(
    device: &wgpu::Device,
    stage: ShaderStage,
    source: &str,
) -> Result<WgpuShader, String> {
    let module = parse_glsl(stage, source)?;
    let block = UniformBlock::reflect(&module);
    let label = match stage {
        ShaderStage::Vertex => "lensbridge vertex",
        ShaderStage::Fragment => "lensbridge fragment",
    };
    let module = device.create_shader_module(wgpu::ShaderModuleDescriptor {
        label: Some(label),
        source: wgpu::ShaderSource::Naga(Cow::Owned(module)),
    });
    Ok(WgpuShader {
        stage,
        module,
        block,
    })
}

/// Builds the render pipeline inside a validation error scope.
///
/// Interface mismatches between the stages, or bindings the layout does not
/// provide, surface here as the link log.
pub(crate) fn link_program(
    device: &wgpu::Device,
    uniform_layout: &wgpu::BindGroupLayout,
    format: wgpu::TextureFormat,
    vertex: &WgpuShader,
    fragment: &WgpuShader,
) -> Result<WgpuProgram, String> {
    if vertex.stage != ShaderStage::Vertex || fragment.stage != ShaderStage::Fragment {
        return Err("program stages attached in the wrong slots".into());
    }

    device.push_error_scope(wgpu::ErrorFilter::Validation);
    let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
        label: Some("lensbridge pipeline layout"),
        bind_group_layouts: &[uniform_layout],
        push_constant_ranges: &[],
    });
    let pipeline = device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
        label: Some("lensbridge pipeline"),
        layout: Some(&pipeline_layout),
        vertex: wgpu::VertexState {
            module: &vertex.module,
            entry_point: Some("main"),
            buffers: &[],
            compilation_options: wgpu::PipelineCompilationOptions::default(),
        },
        primitive: wgpu::PrimitiveState {
            topology: wgpu::PrimitiveTopology::TriangleList,
            strip_index_format: None,
            front_face: wgpu::FrontFace::Ccw,
            cull_mode: None,
            polygon_mode: wgpu::PolygonMode::Fill,
            unclipped_depth: false,
            conservative: false,
        },
        depth_stencil: None,
        multisample: wgpu::MultisampleState::default(),
        fragment: Some(wgpu::FragmentState {
            module: &fragment.module,
            entry_point: Some("main"),
            targets: &[Some(wgpu::ColorTargetState {
                format,
                blend: None,
                write_mask: wgpu::ColorWrites::ALL,
            })],
            compilation_options: wgpu::PipelineCompilationOptions::default(),
        }),
        multiview: None,
        cache: None,
    });
    if let Some(error) = pollster::block_on(device.pop_error_scope()) {
        return Err(error.to_string());
    }

    let block = vertex.block.merge(&fragment.block);
    let uniforms = UniformBinding::new(device, uniform_layout, &block);
    Ok(WgpuProgram {
        pipeline,
        uniforms,
        block,
    })
}
