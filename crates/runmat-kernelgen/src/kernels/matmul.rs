use serde::{Deserialize, Serialize};

use crate::config::KernelConfig;
use crate::dispatch::{compute_dispatch, DispatchLayout, DispatchSize, WorkGroupSize};
use crate::error::{ProgramError, Result};
use crate::program::ComputeProgram;
use crate::shape::TensorShape;
use crate::template::{ShaderTemplate, TemplateParams};

// Both barriers sit outside every data-dependent branch: the loop bound is
// built from compile-time constants only, so all invocations of a group
// reach them together.
const MATMUL_TEMPLATE: ShaderTemplate = ShaderTemplate::new(
    "matmul",
    r#"
var<workgroup> Asub: array<array<f32, @TILE@>, @TILE@>;
var<workgroup> Bsub: array<array<f32, @TILE@>, @TILE@>;

fn kernel_main() {
    // M is A outer, N is shared, K is B outer
    let M = @M@u;
    let N = @N@u;
    let K = @K@u;
    let tileSize = @TILE@u;
    let batch = workgroupId.z;
    let row = localId.x;
    let col = localId.y;
    let globalRow = tileSize * workgroupId.x + row;
    let globalCol = tileSize * workgroupId.y + col;
    let aBase = batch * M * N;
    let bBase = batch * N * K;

    var acc = 0.0;
    let numTiles = select(N / tileSize, N / tileSize + 1u, (N % tileSize) != 0u);

    for (var t = 0u; t < numTiles; t = t + 1u) {
        let tiledRow = tileSize * t + row;
        let tiledCol = tileSize * t + col;
        var aValue = 0.0;
        if (globalRow < M && tiledCol < N) {
            aValue = A[aBase + globalRow * N + tiledCol];
        }
        var bValue = 0.0;
        if (tiledRow < N && globalCol < K) {
            bValue = B[bBase + tiledRow * K + globalCol];
        }
        Asub[row][col] = aValue;
        Bsub[row][col] = bValue;

        workgroupBarrier();

        var sizeTS = tileSize;
        if (t == numTiles - 1u && (N % tileSize) != 0u) {
            sizeTS = N % tileSize;
        }
        for (var k = 0u; k < sizeTS; k = k + 1u) {
            acc = acc + Asub[row][k] * Bsub[k][col];
        }

        workgroupBarrier();
    }

    if (globalRow < M && globalCol < K) {
        setOutputFlat(batch * M * K + globalRow * K + globalCol, acc);
    }
}
"#,
);

/// Dimensions of `A[M x N] * B[N x K] -> C[M x K]`, repeated `batch` times.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MatMulInfo {
    pub m: usize,
    pub n: usize,
    pub k: usize,
    pub batch: usize,
}

impl MatMulInfo {
    pub const fn new(m: usize, n: usize, k: usize, batch: usize) -> Self {
        Self { m, n, k, batch }
    }

    pub fn output_shape(&self) -> TensorShape {
        TensorShape::from([self.batch, self.m, self.k])
    }

    pub fn a_shape(&self) -> TensorShape {
        TensorShape::from([self.batch, self.m, self.n])
    }

    pub fn b_shape(&self) -> TensorShape {
        TensorShape::from([self.batch, self.n, self.k])
    }
}

/// Tile steps needed to sweep a shared dimension of `shared` elements.
pub fn num_tiles(shared: usize, tile: u32) -> usize {
    let tile = tile as usize;
    if shared % tile != 0 {
        shared / tile + 1
    } else {
        shared / tile
    }
}

/// Valid columns consumed on tile step `t`; only the last one can be partial.
pub fn tile_extent(shared: usize, tile: u32, t: usize) -> usize {
    let tile = tile as usize;
    let remainder = shared % tile;
    if t + 1 == num_tiles(shared, tile as u32) && remainder != 0 {
        remainder
    } else {
        tile
    }
}

struct MatMulParams {
    info: MatMulInfo,
    tile: u32,
}

impl TemplateParams for MatMulParams {
    fn substitutions(&self) -> Vec<(&'static str, String)> {
        vec![
            ("TILE", self.tile.to_string()),
            ("M", self.info.m.to_string()),
            ("N", self.info.n.to_string()),
            ("K", self.info.k.to_string()),
        ]
    }
}

/// Shared-memory tiled matrix multiply; each work-group owns one
/// `tile x tile` block of the output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MatMulProgram {
    info: MatMulInfo,
    tile: u32,
    output_shape: TensorShape,
    dispatch_layout: DispatchLayout,
    work_group_size: WorkGroupSize,
    dispatch: DispatchSize,
    user_code: String,
}

impl MatMulProgram {
    pub fn new(output_shape: impl Into<TensorShape>, info: MatMulInfo) -> Result<Self> {
        Self::with_config(output_shape, info, KernelConfig::global())
    }

    pub fn with_config(
        output_shape: impl Into<TensorShape>,
        info: MatMulInfo,
        config: &KernelConfig,
    ) -> Result<Self> {
        let output_shape = output_shape.into();
        output_shape.ensure_rank("matmul output", 3)?;
        output_shape.ensure_positive()?;
        let expected = info.output_shape();
        if output_shape != expected {
            return Err(ProgramError::ShapeMismatch {
                context: "matmul output vs [batch, M, K]",
                expected: expected.dims().to_vec(),
                actual: output_shape.dims().to_vec(),
            });
        }
        // N has no output extent to be checked through, so check it here.
        info.a_shape().ensure_positive()?;
        for shape in [info.a_shape(), info.b_shape(), expected] {
            shape.ensure_addressable("matmul operand")?;
        }

        let tile = config.matmul_tile;
        let work_group_size = WorkGroupSize::new(tile, tile, 1);
        work_group_size.validate(config)?;

        let dispatch_layout = DispatchLayout::new(vec![1], vec![2], vec![0]);
        let dispatch = compute_dispatch(&dispatch_layout, &output_shape, work_group_size, config)?;
        let user_code = MATMUL_TEMPLATE.render(&MatMulParams { info, tile })?;

        log::debug!(
            "matmul: m={} n={} k={} batch={} tile={} dispatch={:?}",
            info.m,
            info.n,
            info.k,
            info.batch,
            tile,
            dispatch.as_array()
        );
        Ok(Self {
            info,
            tile,
            output_shape,
            dispatch_layout,
            work_group_size,
            dispatch,
            user_code,
        })
    }

    pub fn info(&self) -> MatMulInfo {
        self.info
    }

    pub fn input_shapes(&self) -> Vec<TensorShape> {
        vec![self.info.a_shape(), self.info.b_shape()]
    }

    pub fn tile_size(&self) -> u32 {
        self.tile
    }

    pub fn num_tiles(&self) -> usize {
        num_tiles(self.info.n, self.tile)
    }

    pub fn tile_extent(&self, t: usize) -> usize {
        tile_extent(self.info.n, self.tile, t)
    }
}

impl ComputeProgram for MatMulProgram {
    fn label(&self) -> &'static str {
        "matmul"
    }

    fn output_shape(&self) -> &TensorShape {
        &self.output_shape
    }

    fn work_group_size(&self) -> WorkGroupSize {
        self.work_group_size
    }

    fn dispatch(&self) -> DispatchSize {
        self.dispatch
    }

    fn variable_names(&self) -> &[&'static str] {
        &["A", "B"]
    }

    fn user_code(&self) -> &str {
        &self.user_code
    }

    fn dispatch_layout(&self) -> Option<&DispatchLayout> {
        Some(&self.dispatch_layout)
    }
}
