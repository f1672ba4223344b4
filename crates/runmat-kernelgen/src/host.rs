//! Host-side reference evaluation of the generated kernels.
//!
//! Each function walks the program's dispatch grid invocation by invocation
//! and performs the same arithmetic, in `f32`, as the WGSL it was generated
//! with. Every buffer access is checked, and every output element must be
//! written exactly once, so these double as coverage checks for the
//! dispatch geometry.

use crate::dispatch::DispatchLayout;
use crate::error::{ProgramError, Result};
use crate::kernels::{
    BinaryOpKind, BinaryOpProgram, MatMulProgram, OpBody, ResizeBilinearProgram,
};
use crate::program::ComputeProgram;
use crate::shape::TensorShape;

/// Output of a host run plus the number of invocations whose write was
/// rejected by the kernel's bounds guard.
#[derive(Debug, Clone, PartialEq)]
pub struct HostRun {
    pub output: Vec<f32>,
    pub guarded_invocations: usize,
}

struct OutputTracker {
    data: Vec<f32>,
    written: Vec<bool>,
    guarded: usize,
}

impl OutputTracker {
    fn new(len: usize) -> Self {
        Self {
            data: vec![0.0; len],
            written: vec![false; len],
            guarded: 0,
        }
    }

    fn write(&mut self, index: usize, value: f32) -> Result<()> {
        let slot = self.written.get_mut(index).ok_or_else(|| {
            ProgramError::HostEvaluation(format!("write to {index} is out of bounds"))
        })?;
        if *slot {
            return Err(ProgramError::HostEvaluation(format!(
                "element {index} written twice"
            )));
        }
        *slot = true;
        self.data[index] = value;
        Ok(())
    }

    fn finish(self) -> Result<HostRun> {
        if let Some(missing) = self.written.iter().position(|w| !w) {
            return Err(ProgramError::HostEvaluation(format!(
                "element {missing} was never written"
            )));
        }
        Ok(HostRun {
            output: self.data,
            guarded_invocations: self.guarded,
        })
    }
}

fn read(buffer: &[f32], name: &str, index: usize) -> Result<f32> {
    buffer.get(index).copied().ok_or_else(|| {
        ProgramError::HostEvaluation(format!(
            "read {name}[{index}] past length {}",
            buffer.len()
        ))
    })
}

fn expect_len(name: &str, buffer: &[f32], shape: &TensorShape) -> Result<()> {
    if buffer.len() != shape.numel() {
        return Err(ProgramError::HostEvaluation(format!(
            "{name} holds {} values, shape {shape} needs {}",
            buffer.len(),
            shape.numel()
        )));
    }
    Ok(())
}

/// Global invocation extents of the launch: `dispatch * work_group_size`.
fn grid(program: &dyn ComputeProgram) -> [usize; 3] {
    let wg = program.work_group_size().as_array();
    let dispatch = program.dispatch().as_array();
    [0, 1, 2].map(|a| dispatch[a] as usize * wg[a] as usize)
}

/// Mirror of the generated `getOutputCoords()`.
fn output_coords(shape: &TensorShape, layout: &DispatchLayout, gid: [usize; 3]) -> Vec<usize> {
    let mut coords = vec![0usize; shape.rank()];
    for (bucket, id) in layout.axes().iter().zip(gid) {
        let Some((&outermost, inner)) = bucket.split_first() else {
            continue;
        };
        let mut rest = id;
        for &dim in inner.iter().rev() {
            coords[dim] = rest % shape[dim];
            rest /= shape[dim];
        }
        coords[outermost] = rest;
    }
    coords
}

fn flat(shape: &TensorShape, coords: &[usize]) -> usize {
    shape
        .strides()
        .iter()
        .zip(coords)
        .map(|(stride, c)| stride * c)
        .sum()
}

/// Evaluates a [`BinaryOpProgram`] whose body is the predefined `kind`.
pub fn binary(
    program: &BinaryOpProgram,
    kind: BinaryOpKind,
    a: &[f32],
    b: &[f32],
) -> Result<HostRun> {
    if program.op() != &OpBody::from(kind) {
        return Err(ProgramError::HostEvaluation(format!(
            "program body `{}` is not {kind:?}",
            program.op()
        )));
    }
    let shape = program.output_shape();
    expect_len("A", a, shape)?;
    expect_len("B", b, shape)?;
    let size = shape.numel();
    let mut out = OutputTracker::new(size);
    let [gx, gy, gz] = grid(program);
    // Only globalId.x indexes; y/z invocations repeat it and must stay at 1.
    if gy != 1 || gz != 1 {
        return Err(ProgramError::HostEvaluation(format!(
            "binary_op expects a 1-D grid, got {:?}",
            [gx, gy, gz]
        )));
    }
    for index in 0..gx {
        if index < size {
            out.write(index, kind.apply(read(a, "A", index)?, read(b, "B", index)?))?;
        } else {
            out.guarded += 1;
        }
    }
    out.finish()
}

/// Evaluates a [`MatMulProgram`], one work-group at a time, through the same
/// shared-tile staging and partial-tile clamp as the shader.
pub fn matmul(program: &MatMulProgram, a: &[f32], b: &[f32]) -> Result<HostRun> {
    let info = program.info();
    expect_len("A", a, &info.a_shape())?;
    expect_len("B", b, &info.b_shape())?;
    let (m, n, k) = (info.m, info.n, info.k);
    let tile = program.tile_size() as usize;
    let dispatch = program.dispatch();
    let mut out = OutputTracker::new(program.output_shape().numel());

    let mut a_sub = vec![0.0f32; tile * tile];
    let mut b_sub = vec![0.0f32; tile * tile];
    let mut acc = vec![0.0f32; tile * tile];
    for batch in 0..dispatch.z as usize {
        let a_base = batch * m * n;
        let b_base = batch * n * k;
        for wx in 0..dispatch.x as usize {
            for wy in 0..dispatch.y as usize {
                acc.iter_mut().for_each(|v| *v = 0.0);
                for t in 0..program.num_tiles() {
                    for row in 0..tile {
                        for col in 0..tile {
                            let global_row = tile * wx + row;
                            let global_col = tile * wy + col;
                            let tiled_row = tile * t + row;
                            let tiled_col = tile * t + col;
                            a_sub[row * tile + col] = if global_row < m && tiled_col < n {
                                read(a, "A", a_base + global_row * n + tiled_col)?
                            } else {
                                0.0
                            };
                            b_sub[row * tile + col] = if tiled_row < n && global_col < k {
                                read(b, "B", b_base + tiled_row * k + global_col)?
                            } else {
                                0.0
                            };
                        }
                    }
                    let size_ts = program.tile_extent(t);
                    for row in 0..tile {
                        for col in 0..tile {
                            for kk in 0..size_ts {
                                acc[row * tile + col] +=
                                    a_sub[row * tile + kk] * b_sub[kk * tile + col];
                            }
                        }
                    }
                }
                for row in 0..tile {
                    for col in 0..tile {
                        let global_row = tile * wx + row;
                        let global_col = tile * wy + col;
                        if global_row < m && global_col < k {
                            out.write(
                                batch * m * k + global_row * k + global_col,
                                acc[row * tile + col],
                            )?;
                        } else {
                            out.guarded += 1;
                        }
                    }
                }
            }
        }
    }
    out.finish()
}

/// Evaluates a [`ResizeBilinearProgram`] over an NHWC `input`.
pub fn resize_bilinear(program: &ResizeBilinearProgram, input: &[f32]) -> Result<HostRun> {
    let in_shape = program.input_shape();
    expect_len("x", input, in_shape)?;
    let out_shape = program.output_shape();
    let layout = program
        .dispatch_layout()
        .ok_or_else(|| ProgramError::HostEvaluation("resize has no dispatch layout".into()))?;
    let (ratio_h, ratio_w) = program.source_ratio();
    let (in_h, in_w) = (in_shape[1], in_shape[2]);
    let mut out = OutputTracker::new(out_shape.numel());

    let [gx, gy, gz] = grid(program);
    for z in 0..gz {
        for y in 0..gy {
            for x in 0..gx {
                let coords = output_coords(out_shape, layout, [x, y, z]);
                let inside = coords
                    .iter()
                    .zip(out_shape.dims())
                    .all(|(c, extent)| c < extent);
                if !inside {
                    out.guarded += 1;
                    continue;
                }
                let (b, r, c, d) = (coords[0], coords[1], coords[2], coords[3]);
                let src_r = r as f32 * ratio_h;
                let src_c = c as f32 * ratio_w;
                let floor_r = src_r as usize;
                let floor_c = src_c as usize;
                let ceil_r = (in_h - 1).min(src_r.ceil() as usize);
                let ceil_c = (in_w - 1).min(src_c.ceil() as usize);

                let at = |row: usize, col: usize| {
                    read(input, "x", flat(in_shape, &[b, row, col, d]))
                };
                let top_left = at(floor_r, floor_c)?;
                let bottom_left = at(ceil_r, floor_c)?;
                let top_right = at(floor_r, ceil_c)?;
                let bottom_right = at(ceil_r, ceil_c)?;

                let frac_r = src_r - floor_r as f32;
                let frac_c = src_c - floor_c as f32;
                let top = top_left + (top_right - top_left) * frac_c;
                let bottom = bottom_left + (bottom_right - bottom_left) * frac_c;
                let value = top + (bottom - top) * frac_r;
                out.write(flat(out_shape, &coords), value)?;
            }
        }
    }
    out.finish()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::KernelConfig;
    use crate::kernels::{MatMulInfo, ADD};

    #[test]
    fn binary_add_covers_every_element() {
        let program = BinaryOpProgram::with_config(ADD, [4], &KernelConfig::default()).unwrap();
        let a = [1.0, 2.0, 3.0, 4.0];
        let b = [10.0, 20.0, 30.0, 40.0];
        let run = binary(&program, BinaryOpKind::Add, &a, &b).unwrap();
        assert_eq!(run.output, vec![11.0, 22.0, 33.0, 44.0]);
        assert_eq!(run.guarded_invocations, 0);
    }

    #[test]
    fn binary_guards_the_ragged_last_group() {
        let program = BinaryOpProgram::with_config(ADD, [300], &KernelConfig::default()).unwrap();
        let a = vec![1.0; 300];
        let run = binary(&program, BinaryOpKind::Add, &a, &a).unwrap();
        assert_eq!(run.guarded_invocations, 512 - 300);
        assert!(run.output.iter().all(|&v| v == 2.0));
    }

    #[test]
    fn binary_rejects_mismatched_kind() {
        let program = BinaryOpProgram::with_config(ADD, [2], &KernelConfig::default()).unwrap();
        assert!(binary(&program, BinaryOpKind::Mul, &[1.0, 2.0], &[1.0, 2.0]).is_err());
    }

    #[test]
    fn matmul_identity() {
        let info = MatMulInfo::new(3, 3, 3, 1);
        let config = KernelConfig::default();
        let program = MatMulProgram::with_config(info.output_shape(), info, &config).unwrap();
        let a: Vec<f32> = (0..9).map(|v| v as f32).collect();
        let eye = vec![1.0, 0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 1.0];
        let run = matmul(&program, &a, &eye).unwrap();
        assert_eq!(run.output, a);
    }

    #[test]
    fn output_coords_follow_layout() {
        let shape = TensorShape::from([2, 4, 5, 3]);
        let layout = DispatchLayout::new(vec![1], vec![2], vec![0, 3]);
        assert_eq!(output_coords(&shape, &layout, [3, 4, 5]), vec![1, 3, 4, 2]);
        assert_eq!(output_coords(&shape, &layout, [0, 0, 6]), vec![2, 0, 0, 0]);
    }
}
