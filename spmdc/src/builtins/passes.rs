//! Module passes run between link stages.

use inkwell::module::Module;
use inkwell::passes::PassManager;
use tracing::debug;

/// Run global dead-code elimination over `module`.
///
/// Internal functions and globals that nothing reachable refers to are
/// deleted. Entries of `llvm.compiler.used` count as references. Returns
/// the number of functions removed.
pub fn run_global_dce(module: &Module<'_>) -> usize {
    let before = module.get_functions().count();

    let pm = PassManager::create(());
    pm.add_global_dce_pass();
    pm.run_on(module);

    let removed = before.saturating_sub(module.get_functions().count());
    debug!(removed, "global dce");
    removed
}
