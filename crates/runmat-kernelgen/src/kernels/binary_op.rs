use std::borrow::Cow;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::config::KernelConfig;
use crate::dispatch::{
    compute_dispatch, compute_work_group_size, DispatchLayout, DispatchSize, WorkGroupSize,
};
use crate::error::Result;
use crate::program::ComputeProgram;
use crate::shape::TensorShape;
use crate::template::{ShaderTemplate, TemplateParams};

pub const MUL: &str = "return a * b;";
pub const ADD: &str = "return a + b;";

const BINARY_OP_TEMPLATE: ShaderTemplate = ShaderTemplate::new(
    "binary_op",
    r#"
fn binaryOperation(a: f32, b: f32) -> f32 {
    @OP_BODY@
}

fn kernel_main() {
    let index = globalId.x;
    if (index < @SIZE@u) {
        let a = A[index];
        let b = B[index];
        setOutputFlat(index, binaryOperation(a, b));
    }
}
"#,
);

/// Body of `fn binaryOperation(a: f32, b: f32) -> f32`.
///
/// The text is pasted verbatim into generated WGSL. It is a code-generation
/// parameter chosen by the developer wiring up an operator and must never be
/// built from end-user input.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct OpBody(Cow<'static, str>);

impl OpBody {
    pub const fn from_static(body: &'static str) -> Self {
        Self(Cow::Borrowed(body))
    }

    pub fn trusted(body: impl Into<Cow<'static, str>>) -> Self {
        Self(body.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&'static str> for OpBody {
    fn from(body: &'static str) -> Self {
        Self::from_static(body)
    }
}

impl From<BinaryOpKind> for OpBody {
    fn from(kind: BinaryOpKind) -> Self {
        Self::from_static(kind.body())
    }
}

impl fmt::Display for OpBody {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Predefined scalar binary operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum BinaryOpKind {
    Add,
    Sub,
    Mul,
    Div,
    Max,
    Min,
    Pow,
}

impl BinaryOpKind {
    pub const fn body(self) -> &'static str {
        match self {
            BinaryOpKind::Add => ADD,
            BinaryOpKind::Sub => "return a - b;",
            BinaryOpKind::Mul => MUL,
            BinaryOpKind::Div => "return a / b;",
            BinaryOpKind::Max => "return max(a, b);",
            BinaryOpKind::Min => "return min(a, b);",
            BinaryOpKind::Pow => "return pow(a, b);",
        }
    }

    /// Host evaluation matching the WGSL body.
    pub fn apply(self, a: f32, b: f32) -> f32 {
        match self {
            BinaryOpKind::Add => a + b,
            BinaryOpKind::Sub => a - b,
            BinaryOpKind::Mul => a * b,
            BinaryOpKind::Div => a / b,
            BinaryOpKind::Max => a.max(b),
            BinaryOpKind::Min => a.min(b),
            BinaryOpKind::Pow => a.powf(b),
        }
    }
}

struct BinaryOpParams<'a> {
    op: &'a OpBody,
    size: usize,
}

impl TemplateParams for BinaryOpParams<'_> {
    fn substitutions(&self) -> Vec<(&'static str, String)> {
        vec![
            ("OP_BODY", self.op.as_str().to_string()),
            ("SIZE", self.size.to_string()),
        ]
    }
}

/// Elementwise `y[i] = op(A[i], B[i])` over the flattened output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BinaryOpProgram {
    op: OpBody,
    output_shape: TensorShape,
    work_group_size: WorkGroupSize,
    dispatch: DispatchSize,
    user_code: String,
}

impl BinaryOpProgram {
    pub fn new(op: impl Into<OpBody>, output_shape: impl Into<TensorShape>) -> Result<Self> {
        Self::with_config(op, output_shape, KernelConfig::global())
    }

    pub fn with_config(
        op: impl Into<OpBody>,
        output_shape: impl Into<TensorShape>,
        config: &KernelConfig,
    ) -> Result<Self> {
        let op = op.into();
        let output_shape = output_shape.into();
        output_shape.ensure_positive()?;
        output_shape.ensure_addressable("binary_op output")?;

        let work_group_size = compute_work_group_size(&output_shape, config);
        let dispatch = compute_dispatch(
            &DispatchLayout::flat(output_shape.rank()),
            &output_shape,
            work_group_size,
            config,
        )?;
        let user_code = BINARY_OP_TEMPLATE.render(&BinaryOpParams {
            op: &op,
            size: output_shape.numel(),
        })?;

        log::debug!(
            "binary_op: shape={} wg={:?} dispatch={:?}",
            output_shape,
            work_group_size.as_array(),
            dispatch.as_array()
        );
        Ok(Self {
            op,
            output_shape,
            work_group_size,
            dispatch,
            user_code,
        })
    }

    pub fn op(&self) -> &OpBody {
        &self.op
    }

    /// Shapes bound to `A` and `B`; both operands share the output shape.
    pub fn input_shapes(&self) -> Vec<TensorShape> {
        vec![self.output_shape.clone(), self.output_shape.clone()]
    }
}

impl ComputeProgram for BinaryOpProgram {
    fn label(&self) -> &'static str {
        "binary_op"
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
}
