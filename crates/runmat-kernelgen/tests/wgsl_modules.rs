use std::sync::Once;

use runmat_kernelgen::preamble::assemble;
use runmat_kernelgen::{
    BinaryOpKind, BinaryOpProgram, ComputeProgram, KernelConfig, MatMulInfo, MatMulProgram,
    ResizeBilinearProgram, TensorShape, MUL,
};

fn init_logger() {
    static INIT: Once = Once::new();
    INIT.call_once(|| {
        let _ = env_logger::builder().is_test(true).try_init();
    });
}

fn validate(program: &dyn ComputeProgram, inputs: &[TensorShape]) {
    let src = assemble(program, inputs).expect("assemble");
    let module = match naga::front::wgsl::parse_str(&src) {
        Ok(module) => module,
        Err(err) => panic!(
            "{} failed to parse:\n{}",
            program.label(),
            err.emit_to_string(&src)
        ),
    };
    let mut validator = naga::valid::Validator::new(
        naga::valid::ValidationFlags::all(),
        naga::valid::Capabilities::empty(),
    );
    if let Err(err) = validator.validate(&module) {
        panic!("{} failed validation: {err:?}\n{src}", program.label());
    }
}

#[test]
fn binary_op_modules_validate() {
    init_logger();
    let config = KernelConfig::default();
    for kind in [
        BinaryOpKind::Add,
        BinaryOpKind::Sub,
        BinaryOpKind::Mul,
        BinaryOpKind::Div,
        BinaryOpKind::Max,
        BinaryOpKind::Min,
        BinaryOpKind::Pow,
    ] {
        let program = BinaryOpProgram::with_config(kind, [3, 7], &config).unwrap();
        validate(&program, &program.input_shapes());
    }
    let program = BinaryOpProgram::with_config(MUL, [5], &config).unwrap();
    validate(&program, &program.input_shapes());
}

#[test]
fn matmul_modules_validate() {
    init_logger();
    let config = KernelConfig::default();
    for info in [
        MatMulInfo::new(16, 16, 16, 1),
        MatMulInfo::new(17, 20, 9, 1),
        MatMulInfo::new(3, 40, 5, 4),
    ] {
        let program = MatMulProgram::with_config(info.output_shape(), info, &config).unwrap();
        validate(&program, &program.input_shapes());
    }
    let small_tile = config.with_matmul_tile(8);
    let info = MatMulInfo::new(9, 9, 9, 2);
    let program = MatMulProgram::with_config(info.output_shape(), info, &small_tile).unwrap();
    validate(&program, &program.input_shapes());
}

#[test]
fn resize_modules_validate() {
    init_logger();
    let config = KernelConfig::default();
    for align_corners in [false, true] {
        let program =
            ResizeBilinearProgram::with_config([2, 5, 7, 3], 11, 4, align_corners, &config)
                .unwrap();
        validate(&program, &program.input_shapes());
    }
    let program = ResizeBilinearProgram::with_config([1, 4, 4, 1], 1, 1, true, &config).unwrap();
    validate(&program, &program.input_shapes());
}
