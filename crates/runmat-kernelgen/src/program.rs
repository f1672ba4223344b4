use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

use crate::dispatch::{DispatchLayout, DispatchSize, WorkGroupSize};
use crate::shape::TensorShape;

/// A generated compute kernel, ready to hand to an execution engine.
///
/// Implementors are immutable values built once by their constructor. The
/// engine binds one storage buffer per entry of [`variable_names`] plus the
/// output, compiles [`user_code`] inside its shader runtime and launches
/// [`dispatch`] work-groups of [`work_group_size`] threads.
///
/// `user_code` defines `fn kernel_main()` and relies on the engine for the
/// `globalId`/`localId`/`workgroupId` private variables, the
/// `getOutputCoords`, `setOutput`, `setOutputFlat` and `get<Name>` helpers,
/// and the `<name>Shape`/`outShape` constants (see [`crate::preamble`]).
///
/// [`variable_names`]: ComputeProgram::variable_names
/// [`user_code`]: ComputeProgram::user_code
/// [`dispatch`]: ComputeProgram::dispatch
/// [`work_group_size`]: ComputeProgram::work_group_size
pub trait ComputeProgram {
    /// Short kernel name, used for labels and cache keys.
    fn label(&self) -> &'static str;

    fn output_shape(&self) -> &TensorShape;

    fn work_group_size(&self) -> WorkGroupSize;

    fn dispatch(&self) -> DispatchSize;

    fn variable_names(&self) -> &[&'static str];

    fn user_code(&self) -> &str;

    /// Logical-to-dispatch axis mapping, when the program indexes by output
    /// coordinates rather than by flat invocation index.
    fn dispatch_layout(&self) -> Option<&DispatchLayout> {
        None
    }
}

/// Stable key for memoising compiled pipelines of `program`.
pub fn program_key(program: &dyn ComputeProgram) -> String {
    let mut hasher = DefaultHasher::new();
    program.user_code().hash(&mut hasher);
    program.variable_names().hash(&mut hasher);
    let [x, y, z] = program.work_group_size().as_array();
    format!("{}-{x}x{y}x{z}-{:016x}", program.label(), hasher.finish())
}
