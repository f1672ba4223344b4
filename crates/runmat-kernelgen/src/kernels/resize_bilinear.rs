use crate::config::KernelConfig;
use crate::dispatch::{compute_dispatch, DispatchLayout, DispatchSize, WorkGroupSize};
use crate::error::Result;
use crate::program::ComputeProgram;
use crate::shape::TensorShape;
use crate::template::{ShaderTemplate, TemplateParams};

const RESIZE_BILINEAR_TEMPLATE: ShaderTemplate = ShaderTemplate::new(
    "resize_bilinear",
    r#"
fn kernel_main() {
    let coords = getOutputCoords();

    if (all(coords < outShape)) {
        let b = coords[0];
        let d = coords[3];
        let rc = coords.yz;

        let effectiveInSize = vec2<f32>(
            @IN_HEIGHT@,
            @IN_WIDTH@);

        let effectiveOutSize = vec2<f32>(
            @OUT_HEIGHT@,
            @OUT_WIDTH@);

        let effectiveInputOverOutputRatioRC = effectiveInSize / effectiveOutSize;

        // Fractional source index
        let sourceFracIndexRC = vec2<f32>(rc) * effectiveInputOverOutputRatioRC;

        // The four integer indices around it
        let sourceFloorRC = vec2<i32>(sourceFracIndexRC);
        let sourceCeilRC = vec2<i32>(
            min(xShape.y - 1, i32(ceil(sourceFracIndexRC.x))),
            min(xShape.z - 1, i32(ceil(sourceFracIndexRC.y))));

        let topLeft = getX(b, sourceFloorRC.x, sourceFloorRC.y, d);
        let bottomLeft = getX(b, sourceCeilRC.x, sourceFloorRC.y, d);
        let topRight = getX(b, sourceFloorRC.x, sourceCeilRC.y, d);
        let bottomRight = getX(b, sourceCeilRC.x, sourceCeilRC.y, d);

        let fracRC = sourceFracIndexRC - vec2<f32>(sourceFloorRC);

        let top = topLeft + (topRight - topLeft) * fracRC.y;
        let bottom = bottomLeft + (bottomRight - bottomLeft) * fracRC.y;
        let newValue = top + (bottom - top) * fracRC.x;

        setOutput(b, coords[1], coords[2], d, newValue);
    }
}
"#,
);

struct ResizeParams {
    adjust_height: bool,
    adjust_width: bool,
}

impl TemplateParams for ResizeParams {
    fn substitutions(&self) -> Vec<(&'static str, String)> {
        let extent = |adjust: bool, shape: &str, component: &str| {
            if adjust {
                format!("f32({shape}.{component} - 1)")
            } else {
                format!("f32({shape}.{component})")
            }
        };
        vec![
            ("IN_HEIGHT", extent(self.adjust_height, "xShape", "y")),
            ("IN_WIDTH", extent(self.adjust_width, "xShape", "z")),
            ("OUT_HEIGHT", extent(self.adjust_height, "outShape", "y")),
            ("OUT_WIDTH", extent(self.adjust_width, "outShape", "z")),
        ]
    }
}

/// Bilinear resize of an NHWC tensor to `new_height x new_width`.
///
/// Each output pixel maps back to `dst * ratio` in the source, where the
/// ratio is `in / out`, or `(in - 1) / (out - 1)` when corners are aligned
/// and the output extent is larger than one. No half-pixel offset is applied.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResizeBilinearProgram {
    input_shape: TensorShape,
    align_corners: bool,
    output_shape: TensorShape,
    dispatch_layout: DispatchLayout,
    work_group_size: WorkGroupSize,
    dispatch: DispatchSize,
    user_code: String,
}

impl ResizeBilinearProgram {
    pub fn new(
        input_shape: impl Into<TensorShape>,
        new_height: usize,
        new_width: usize,
        align_corners: bool,
    ) -> Result<Self> {
        Self::with_config(
            input_shape,
            new_height,
            new_width,
            align_corners,
            KernelConfig::global(),
        )
    }

    pub fn with_config(
        input_shape: impl Into<TensorShape>,
        new_height: usize,
        new_width: usize,
        align_corners: bool,
        config: &KernelConfig,
    ) -> Result<Self> {
        let input_shape = input_shape.into();
        input_shape.ensure_rank("resize_bilinear input", 4)?;
        input_shape.ensure_positive()?;
        input_shape.ensure_addressable("resize_bilinear input")?;
        let output_shape =
            TensorShape::from([input_shape[0], new_height, new_width, input_shape[3]]);
        output_shape.ensure_positive()?;
        output_shape.ensure_addressable("resize_bilinear output")?;

        let work_group_size = WorkGroupSize::from_array(config.resize_workgroup);
        work_group_size.validate(config)?;
        let dispatch_layout = DispatchLayout::new(vec![1], vec![2], vec![0, 3]);
        let dispatch = compute_dispatch(&dispatch_layout, &output_shape, work_group_size, config)?;

        let user_code = RESIZE_BILINEAR_TEMPLATE.render(&ResizeParams {
            adjust_height: align_corners && new_height > 1,
            adjust_width: align_corners && new_width > 1,
        })?;

        log::debug!(
            "resize_bilinear: {} -> {} align_corners={} dispatch={:?}",
            input_shape,
            output_shape,
            align_corners,
            dispatch.as_array()
        );
        Ok(Self {
            input_shape,
            align_corners,
            output_shape,
            dispatch_layout,
            work_group_size,
            dispatch,
            user_code,
        })
    }

    pub fn input_shape(&self) -> &TensorShape {
        &self.input_shape
    }

    pub fn input_shapes(&self) -> Vec<TensorShape> {
        vec![self.input_shape.clone()]
    }

    pub fn align_corners(&self) -> bool {
        self.align_corners
    }

    /// Source-over-destination ratio for (height, width), as the shader computes it in `f32`.
    pub fn source_ratio(&self) -> (f32, f32) {
        let ratio = |input: usize, output: usize| {
            if self.align_corners && output > 1 {
                (input - 1) as f32 / (output - 1) as f32
            } else {
                input as f32 / output as f32
            }
        };
        (
            ratio(self.input_shape[1], self.output_shape[1]),
            ratio(self.input_shape[2], self.output_shape[2]),
        )
    }
}

impl ComputeProgram for ResizeBilinearProgram {
    fn label(&self) -> &'static str {
        "resize_bilinear"
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
        &["x"]
    }

    fn user_code(&self) -> &str {
        &self.user_code
    }

    fn dispatch_layout(&self) -> Option<&DispatchLayout> {
        Some(&self.dispatch_layout)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ProgramError;

    fn program(input: [usize; 4], h: usize, w: usize, align: bool) -> ResizeBilinearProgram {
        ResizeBilinearProgram::with_config(input, h, w, align, &KernelConfig::default())
            .expect("resize program")
    }

    #[test]
    fn output_shape_and_geometry() {
        let p = program([2, 10, 12, 3], 100, 130, false);
        assert_eq!(p.output_shape().dims(), &[2, 100, 130, 3]);
        assert_eq!(p.work_group_size(), WorkGroupSize::new(64, 1, 1));
        // x <- height, y <- width, z <- batch * channels
        assert_eq!(p.dispatch(), DispatchSize::new(2, 130, 6));
        assert_eq!(p.variable_names(), &["x"]);
    }

    #[test]
    fn aligned_corners_use_reduced_extents() {
        let p = program([1, 2, 2, 1], 4, 4, true);
        assert!(p.user_code().contains("f32(xShape.y - 1)"));
        assert!(p.user_code().contains("f32(outShape.z - 1)"));
        assert_eq!(p.source_ratio(), (1.0 / 3.0, 1.0 / 3.0));
    }

    #[test]
    fn unit_output_extent_falls_back_to_raw_ratio() {
        let p = program([1, 5, 5, 1], 1, 3, true);
        assert!(p.user_code().contains("f32(xShape.y)"));
        assert!(p.user_code().contains("f32(xShape.z - 1)"));
        assert_eq!(p.source_ratio(), (5.0, 2.0));
    }

    #[test]
    fn raw_extents_without_alignment() {
        let p = program([1, 4, 6, 2], 8, 3, false);
        assert!(!p.user_code().contains("- 1)"));
        assert_eq!(p.source_ratio(), (0.5, 2.0));
    }

    #[test]
    fn rejects_bad_shapes() {
        let config = KernelConfig::default();
        assert!(matches!(
            ResizeBilinearProgram::with_config([2, 2, 1], 4, 4, false, &config),
            Err(ProgramError::RankMismatch { expected: 4, .. })
        ));
        assert!(matches!(
            ResizeBilinearProgram::with_config([1, 2, 2, 1], 0, 4, false, &config),
            Err(ProgramError::ZeroExtent { axis: 1, .. })
        ));
    }
}
