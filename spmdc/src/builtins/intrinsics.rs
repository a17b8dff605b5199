//! FinalizeLinkage: last fixups once every library is in.

use inkwell::intrinsics::Intrinsic;
use inkwell::module::{Linkage, Module};
use tracing::{debug, trace};

use super::error::LinkError;
use super::ir;
use crate::target::Arch;

/// Library globals that must end up module-local whether or not anything
/// references them yet.
pub const FORCED_INTERNAL: [&str; 3] = ["__fast_masked_vload", "__math_lib", "__memory_alignment"];

/// Give every [`FORCED_INTERNAL`] global or function present in `module`
/// internal linkage. Returns how many were found.
pub fn force_internal_globals(module: &Module<'_>) -> usize {
    let mut found = 0;
    for name in FORCED_INTERNAL {
        if let Some(global) = module.get_global(name) {
            global.set_linkage(Linkage::Internal);
            found += 1;
        } else if let Some(function) = module.get_function(name) {
            function.set_linkage(Linkage::Internal);
            found += 1;
        } else {
            continue;
        }
        trace!(global = name, "forced internal");
    }
    found
}

/// Check every declaration in the target architecture's intrinsic
/// namespace against LLVM's own definition of that intrinsic.
///
/// A name LLVM does not know is [`LinkError::IntrinsicIdUnresolved`]. A
/// non-overloaded intrinsic declared with another type is
/// [`LinkError::IntrinsicSignatureMismatch`]. Overloaded intrinsics have
/// no single canonical type and are not compared. Returns the number of
/// declarations compared.
pub fn check_module_intrinsics(module: &Module<'_>, arch: Arch) -> Result<usize, LinkError> {
    let namespace = arch.intrinsic_namespace();
    // Canonical declarations are materialized here so that the module under
    // check keeps its own declarations untouched.
    let scratch = module.get_context().create_module("intrinsic_signatures");

    let mut compared = 0;
    for function in module.get_functions() {
        let name = ir::function_name(function);
        if !name.starts_with(namespace) {
            continue;
        }
        let unresolved = || LinkError::IntrinsicIdUnresolved { name: name.clone() };
        if function.get_intrinsic_id() == 0 {
            return Err(unresolved());
        }
        let intrinsic = Intrinsic::find(&name).ok_or_else(unresolved)?;
        if intrinsic.is_overloaded() {
            continue;
        }
        let expected = intrinsic
            .get_declaration(&scratch, &[])
            .ok_or_else(unresolved)?
            .get_type();
        let declared = function.get_type();
        if declared != expected {
            return Err(LinkError::IntrinsicSignatureMismatch {
                name,
                declared: declared.print_to_string().to_string(),
                expected: expected.print_to_string().to_string(),
            });
        }
        compared += 1;
    }
    debug!(namespace, compared, "validated intrinsic declarations");
    Ok(compared)
}
