pub mod binary_op;
pub mod matmul;
pub mod resize_bilinear;

pub use binary_op::{BinaryOpKind, BinaryOpProgram, OpBody, ADD, MUL};
pub use matmul::{MatMulInfo, MatMulProgram};
pub use resize_bilinear::ResizeBilinearProgram;
