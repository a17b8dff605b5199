//! The builtin link pipeline.
//!
//! One run takes a freshly generated module through
//!
//! ```text
//! LinkStdlib (optional) -> LinkCommonBuiltins -> LinkTargetBuiltins -> FinalizeLinkage
//! ```
//!
//! Every library the run needs is resolved before anything is merged, so a
//! missing library leaves the module untouched.

use std::sync::Arc;

use inkwell::context::Context;
use inkwell::module::Module;
use tracing::{info, info_span};

use super::dump::DumpSettings;
use super::error::{LinkError, LinkStage};
use super::intrinsics;
use super::library::{BitcodeLib, LibraryKey, LibraryRegistry, LibraryRole};
use super::linker::{BitcodeModuleLinker, LinkMode};
use super::passes::run_global_dce;
use super::persistent::{PersistentCatalog, PersistentSymbolGuard, PreservedRoots};
use crate::config::LinkContext;
use crate::diagnostics::Diagnostic;

/// Function counts around one stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StageStats {
    pub stage: LinkStage,
    pub functions_before: usize,
    pub functions_after: usize,
}

/// What a pipeline run did.
#[derive(Debug, Clone, Default)]
pub struct LinkReport {
    pub stages: Vec<StageStats>,
    /// The preserved roots left in the module at the end.
    pub roots: PreservedRoots,
    /// Non-fatal problems, such as dumps that could not be written.
    pub warnings: Vec<Diagnostic>,
}

impl LinkReport {
    pub fn stage(&self, stage: LinkStage) -> Option<&StageStats> {
        self.stages.iter().find(|s| s.stage == stage)
    }
}

struct Libraries {
    stdlib: Option<Arc<BitcodeLib>>,
    common: Arc<BitcodeLib>,
    target: Arc<BitcodeLib>,
}

/// Links the standard library and builtins into modules for one target.
pub struct LinkPipeline<'a> {
    ctx: &'a LinkContext,
    registry: &'a LibraryRegistry,
    catalog: PersistentCatalog,
    dumps: DumpSettings,
}

impl<'a> LinkPipeline<'a> {
    pub fn new(ctx: &'a LinkContext, registry: &'a LibraryRegistry) -> Self {
        Self {
            ctx,
            registry,
            catalog: PersistentCatalog::builtin(),
            dumps: DumpSettings::from_context(ctx),
        }
    }

    /// Replace the built-in persistent catalog.
    pub fn with_catalog(mut self, catalog: PersistentCatalog) -> Self {
        self.catalog = catalog;
        self
    }

    pub fn catalog(&self) -> &PersistentCatalog {
        &self.catalog
    }

    /// Link every library into `module`.
    ///
    /// `stage_counter` is the compiler-wide dump index; it advances once per
    /// checkpoint.
    pub fn run<'ctx>(
        &self,
        context: &'ctx Context,
        module: &Module<'ctx>,
        stage_counter: &mut u32,
    ) -> Result<LinkReport, LinkError> {
        let libs = self.resolve_all()?;
        let linker = BitcodeModuleLinker::new(context, module);
        let guard = PersistentSymbolGuard::new(&self.catalog);
        let mut report = LinkReport::default();

        match &libs.stdlib {
            Some(stdlib) => {
                stage(LinkStage::LinkStdlib, module, &mut report, || {
                    let mode = if self.ctx.multi_target {
                        LinkMode::library().with_suffix(self.ctx.target.symbol_suffix())
                    } else {
                        LinkMode::library()
                    };
                    let names = linker.link(stdlib, &mode)?;
                    linker.set_internal(&names);

                    // Preserve before the first DCE, prune after it.
                    guard.preserve_conservatively(module);
                    run_global_dce(module);
                    guard.prune_precisely(module);
                    run_global_dce(module);
                    Ok(())
                })?;
                self.checkpoint(module, LinkStage::LinkStdlib, stage_counter, &mut report);
            }
            None => {
                guard.preserve_conservatively(module);
            }
        }

        stage(LinkStage::LinkCommonBuiltins, module, &mut report, || {
            let names = linker.link(&libs.common, &LinkMode::library())?;
            linker.set_internal(&names);
            run_global_dce(module);
            Ok(())
        })?;
        self.checkpoint(module, LinkStage::LinkCommonBuiltins, stage_counter, &mut report);

        stage(LinkStage::LinkTargetBuiltins, module, &mut report, || {
            let names = linker.link(&libs.target, &LinkMode::library())?;
            linker.set_internal(&names);
            run_global_dce(module);
            Ok(())
        })?;
        self.checkpoint(module, LinkStage::LinkTargetBuiltins, stage_counter, &mut report);

        stage(LinkStage::FinalizeLinkage, module, &mut report, || {
            intrinsics::force_internal_globals(module);
            intrinsics::check_module_intrinsics(module, self.ctx.target.arch())?;
            Ok(())
        })?;

        report.roots = PreservedRoots::read_from_module(module);
        Ok(report)
    }

    fn resolve_all(&self) -> Result<Libraries, LinkError> {
        let target = &self.ctx.target;
        let resolve = |role, stage| {
            self.registry
                .resolve(LibraryKey::for_target(role, target))
                .map_err(|err| err.in_stage(stage))
        };

        let stdlib = if self.ctx.include_stdlib {
            Some(resolve(LibraryRole::Stdlib, LinkStage::LinkStdlib)?)
        } else {
            None
        };
        Ok(Libraries {
            stdlib,
            common: resolve(LibraryRole::CommonBuiltins, LinkStage::LinkCommonBuiltins)?,
            target: resolve(LibraryRole::TargetBuiltins, LinkStage::LinkTargetBuiltins)?,
        })
    }

    fn checkpoint(
        &self,
        module: &Module<'_>,
        stage: LinkStage,
        stage_counter: &mut u32,
        report: &mut LinkReport,
    ) {
        let index = *stage_counter;
        *stage_counter += 1;
        if let Some(warning) = self.dumps.checkpoint(module, stage, index) {
            report.warnings.push(warning);
        }
    }
}

fn stage<F>(
    stage: LinkStage,
    module: &Module<'_>,
    report: &mut LinkReport,
    body: F,
) -> Result<(), LinkError>
where
    F: FnOnce() -> Result<(), LinkError>,
{
    let span = info_span!("link_stage", stage = stage.as_str());
    let _guard = span.enter();

    let functions_before = module.get_functions().count();
    body().map_err(|err| err.in_stage(stage))?;
    let functions_after = module.get_functions().count();

    info!(functions_before, functions_after, "stage complete");
    report.stages.push(StageStats {
        stage,
        functions_before,
        functions_after,
    });
    Ok(())
}

/// Link the dispatch stubs for the target OS into `module`.
///
/// Dispatch modules carry no persistent helpers: nothing is preserved,
/// internalized or removed.
pub fn link_dispatcher<'ctx>(
    context: &'ctx Context,
    module: &Module<'ctx>,
    ctx: &LinkContext,
    registry: &LibraryRegistry,
) -> Result<(), LinkError> {
    let span = info_span!("link_stage", stage = LinkStage::LinkDispatch.as_str());
    let _guard = span.enter();

    let lib = registry
        .resolve(LibraryKey::dispatch(ctx.target.os()))
        .map_err(|err| err.in_stage(LinkStage::LinkDispatch))?;
    let names = BitcodeModuleLinker::new(context, module)
        .link(&lib, &LinkMode::dispatch())
        .map_err(|err| err.in_stage(LinkStage::LinkDispatch))?;
    info!(functions = names.len(), "linked dispatch stubs");
    Ok(())
}
