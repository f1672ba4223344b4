//! Thin wgpu glue: turn a [`ComputeProgram`] into a pipeline and record its
//! dispatch. Buffer management stays with the caller.

use std::borrow::Cow;

use crate::error::Result;
use crate::preamble::{assemble, ENTRY_POINT};
use crate::program::{program_key, ComputeProgram};
use crate::shape::TensorShape;

pub fn shader_module_descriptor<'a>(
    label: &'a str,
    wgsl: &'a str,
) -> wgpu::ShaderModuleDescriptor<'a> {
    wgpu::ShaderModuleDescriptor {
        label: Some(label),
        source: wgpu::ShaderSource::Wgsl(Cow::Borrowed(wgsl)),
    }
}

/// Assembles and compiles `program`. The pipeline uses an automatic layout;
/// fetch it with `get_bind_group_layout(0)` (inputs in `variable_names`
/// order, then the output).
pub fn create_pipeline(
    device: &wgpu::Device,
    program: &dyn ComputeProgram,
    input_shapes: &[TensorShape],
) -> Result<wgpu::ComputePipeline> {
    let wgsl = assemble(program, input_shapes)?;
    let key = program_key(program);
    log::debug!("wgpu: compiling pipeline {key}");
    let module = device.create_shader_module(shader_module_descriptor(&key, &wgsl));
    Ok(device.create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
        label: Some(&key),
        layout: None,
        module: &module,
        entry_point: ENTRY_POINT,
    }))
}

pub fn encode_dispatch(pass: &mut wgpu::ComputePass<'_>, program: &dyn ComputeProgram) {
    let [x, y, z] = program.dispatch().as_array();
    log::trace!("wgpu: dispatch {} {x}x{y}x{z}", program.label());
    pass.dispatch_workgroups(x, y, z);
}
