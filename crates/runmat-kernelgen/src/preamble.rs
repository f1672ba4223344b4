//! Reference assembly of a complete WGSL module around a program's
//! `user_code`.
//!
//! Execution engines normally own this step; the layout produced here is the
//! one every generator in this crate is written against:
//!
//! - `@group(0) @binding(i)` read-only `array<f32>` per variable name, in
//!   order, followed by the read-write `outputData` buffer;
//! - `<name>Shape` / `outShape` constants (`i32` or `vecN<i32>`);
//! - `get<Name>(c0, ..)` row-major accessors, `setOutput(c0, .., value)` and
//!   `setOutputFlat(index, value)`;
//! - `getOutputCoords()` decoding the invocation id through the program's
//!   dispatch layout (flat row-major over `globalId.x` when it has none);
//! - `globalId`, `localId`, `workgroupId` private copies of the builtins, set
//!   by the `main` entry point before it calls `kernel_main()`.

use std::fmt::Write as _;

use crate::dispatch::{DispatchLayout, AXIS_NAMES};
use crate::error::{ProgramError, Result};
use crate::program::ComputeProgram;
use crate::shape::TensorShape;

pub const ENTRY_POINT: &str = "main";
pub const OUTPUT_BINDING_NAME: &str = "outputData";

/// Builds the full WGSL module for `program` given the shapes bound to its
/// variables (same order as `variable_names`).
pub fn assemble(program: &dyn ComputeProgram, input_shapes: &[TensorShape]) -> Result<String> {
    let names = program.variable_names();
    if names.len() != input_shapes.len() {
        return Err(ProgramError::InputCountMismatch {
            expected: names.len(),
            actual: input_shapes.len(),
        });
    }
    let output_shape = program.output_shape();
    for shape in input_shapes.iter().chain(std::iter::once(output_shape)) {
        shape_type(shape)?;
    }

    let mut src = String::new();
    let _ = writeln!(src, "// {} (generated)", program.label());
    for (binding, name) in names.iter().enumerate() {
        let _ = writeln!(
            src,
            "@group(0) @binding({binding}) var<storage, read> {name}: array<f32>;"
        );
    }
    let _ = writeln!(
        src,
        "@group(0) @binding({}) var<storage, read_write> {OUTPUT_BINDING_NAME}: array<f32>;\n",
        names.len()
    );
    src.push_str("var<private> globalId: vec3<u32>;\n");
    src.push_str("var<private> localId: vec3<u32>;\n");
    src.push_str("var<private> workgroupId: vec3<u32>;\n\n");

    for (name, shape) in names.iter().zip(input_shapes) {
        write_shape_const(&mut src, &format!("{name}Shape"), shape)?;
    }
    write_shape_const(&mut src, "outShape", output_shape)?;
    src.push('\n');

    for (name, shape) in names.iter().zip(input_shapes) {
        write_getter(&mut src, name, shape);
    }
    write_output_coords(&mut src, output_shape, program.dispatch_layout())?;
    write_setters(&mut src, output_shape);

    src.push_str(program.user_code());
    src.push('\n');

    let [x, y, z] = program.work_group_size().as_array();
    let _ = write!(
        src,
        r#"
@compute @workgroup_size({x}, {y}, {z})
fn {ENTRY_POINT}(
    @builtin(global_invocation_id) gid: vec3<u32>,
    @builtin(local_invocation_id) lid: vec3<u32>,
    @builtin(workgroup_id) wid: vec3<u32>,
) {{
    globalId = gid;
    localId = lid;
    workgroupId = wid;
    kernel_main();
}}
"#
    );
    log::trace!("assembled {} module ({} bytes)", program.label(), src.len());
    Ok(src)
}

fn shape_type(shape: &TensorShape) -> Result<&'static str> {
    match shape.rank() {
        1 => Ok("i32"),
        2 => Ok("vec2<i32>"),
        3 => Ok("vec3<i32>"),
        4 => Ok("vec4<i32>"),
        rank => Err(ProgramError::UnsupportedRank { rank }),
    }
}

fn write_shape_const(src: &mut String, name: &str, shape: &TensorShape) -> Result<()> {
    let ty = shape_type(shape)?;
    let dims = shape
        .dims()
        .iter()
        .map(|d| d.to_string())
        .collect::<Vec<_>>()
        .join(", ");
    if shape.rank() == 1 {
        let _ = writeln!(src, "const {name}: i32 = {dims};");
    } else {
        let _ = writeln!(src, "const {name} = {ty}({dims});");
    }
    Ok(())
}

fn coord_params(rank: usize) -> String {
    (0..rank)
        .map(|i| format!("c{i}: i32"))
        .collect::<Vec<_>>()
        .join(", ")
}

fn flat_index(shape: &TensorShape) -> String {
    shape
        .strides()
        .iter()
        .enumerate()
        .map(|(i, stride)| format!("c{i} * {stride}"))
        .collect::<Vec<_>>()
        .join(" + ")
}

fn getter_name(name: &str) -> String {
    let mut chars = name.chars();
    match chars.next() {
        Some(first) => format!("get{}{}", first.to_ascii_uppercase(), chars.as_str()),
        None => "get".to_string(),
    }
}

fn write_getter(src: &mut String, name: &str, shape: &TensorShape) {
    let _ = writeln!(
        src,
        "fn {}({}) -> f32 {{\n    return {name}[u32({})];\n}}\n",
        getter_name(name),
        coord_params(shape.rank()),
        flat_index(shape)
    );
}

fn write_setters(src: &mut String, shape: &TensorShape) {
    let _ = writeln!(
        src,
        "fn setOutputFlat(flatIndex: u32, value: f32) {{\n    {OUTPUT_BINDING_NAME}[flatIndex] = value;\n}}\n"
    );
    let _ = writeln!(
        src,
        "fn setOutput({}, value: f32) {{\n    {OUTPUT_BINDING_NAME}[u32({})] = value;\n}}\n",
        coord_params(shape.rank()),
        flat_index(shape)
    );
}

fn write_output_coords(
    src: &mut String,
    shape: &TensorShape,
    layout: Option<&DispatchLayout>,
) -> Result<()> {
    let ty = shape_type(shape)?;
    let flat;
    let layout = match layout {
        Some(layout) => layout,
        None => {
            flat = DispatchLayout::flat(shape.rank());
            &flat
        }
    };
    layout.validate(shape.rank())?;

    let _ = writeln!(src, "fn getOutputCoords() -> {ty} {{");
    for (bucket, axis) in layout.axes().iter().zip(AXIS_NAMES) {
        let Some((&outermost, inner)) = bucket.split_first() else {
            continue;
        };
        let _ = writeln!(src, "    var rest{axis} = i32(globalId.{axis});");
        for &dim in inner.iter().rev() {
            let _ = writeln!(src, "    let c{dim} = rest{axis} % {};", shape[dim]);
            let _ = writeln!(src, "    rest{axis} = rest{axis} / {};", shape[dim]);
        }
        let _ = writeln!(src, "    let c{outermost} = rest{axis};");
    }
    let coords = (0..shape.rank())
        .map(|i| format!("c{i}"))
        .collect::<Vec<_>>()
        .join(", ");
    if shape.rank() == 1 {
        let _ = writeln!(src, "    return {coords};\n}}\n");
    } else {
        let _ = writeln!(src, "    return {ty}({coords});\n}}\n");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::KernelConfig;
    use crate::kernels::{BinaryOpProgram, ResizeBilinearProgram, ADD};

    #[test]
    fn folded_axes_decode_innermost_first() {
        let program =
            ResizeBilinearProgram::with_config([2, 3, 3, 5], 6, 6, false, &KernelConfig::default())
                .unwrap();
        let src = assemble(&program, &[program.input_shape().clone()]).unwrap();
        assert!(src.contains("var restz = i32(globalId.z);"));
        assert!(src.contains("let c3 = restz % 5;"));
        assert!(src.contains("let c0 = restz;"));
        assert!(src.contains("let c1 = restx;"));
        assert!(src.contains("const xShape = vec4<i32>(2, 3, 3, 5);"));
        assert!(src.contains("const outShape = vec4<i32>(2, 6, 6, 5);"));
        assert!(src.contains("fn getX(c0: i32, c1: i32, c2: i32, c3: i32) -> f32"));
        assert!(src.contains("@compute @workgroup_size(64, 1, 1)"));
    }

    #[test]
    fn bindings_follow_variable_order() {
        let program = BinaryOpProgram::with_config(ADD, [4], &KernelConfig::default()).unwrap();
        let shape = TensorShape::from([4]);
        let src = assemble(&program, &[shape.clone(), shape]).unwrap();
        assert!(src.contains("@group(0) @binding(0) var<storage, read> A: array<f32>;"));
        assert!(src.contains("@group(0) @binding(1) var<storage, read> B: array<f32>;"));
        assert!(src.contains("@group(0) @binding(2) var<storage, read_write> outputData"));
        assert!(src.contains("const AShape: i32 = 4;"));
        assert!(src.contains("return c0;"));
    }

    #[test]
    fn input_count_and_rank_are_checked() {
        let program = BinaryOpProgram::with_config(ADD, [4], &KernelConfig::default()).unwrap();
        assert_eq!(
            assemble(&program, &[TensorShape::from([4])]).unwrap_err(),
            ProgramError::InputCountMismatch {
                expected: 2,
                actual: 1
            }
        );
        let big = BinaryOpProgram::with_config(ADD, [1, 1, 1, 1, 2], &KernelConfig::default())
            .unwrap();
        let shape = TensorShape::from([1, 1, 1, 1, 2]);
        assert_eq!(
            assemble(&big, &[shape.clone(), shape]).unwrap_err(),
            ProgramError::UnsupportedRank { rank: 5 }
        );
    }
}
