//! IR dumps at pipeline checkpoints.
//!
//! Each checkpoint has a compiler-wide index. When the index is enabled,
//! the module is written to `pre_<index>_<stage>.ll` in the dump directory,
//! or printed to standard output if there is none. Multi-target builds
//! append `_<isa>` to the file name. A dump that cannot be written is a
//! warning: linking goes on without it.

use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};

use inkwell::module::Module;
use tracing::{debug, warn};

use super::error::LinkStage;
use crate::config::LinkContext;
use crate::diagnostics::{Diagnostic, ErrorCode};

/// The dump-related part of a [`LinkContext`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DumpSettings {
    debug_stages: BTreeSet<u32>,
    disabled_stages: BTreeSet<u32>,
    dump_dir: Option<PathBuf>,
    isa_suffix: Option<String>,
}

impl DumpSettings {
    pub fn from_context(ctx: &LinkContext) -> Self {
        Self {
            debug_stages: ctx.debug_stages.clone(),
            disabled_stages: ctx.disabled_stages.clone(),
            dump_dir: ctx.dump_dir.clone(),
            isa_suffix: ctx
                .multi_target
                .then(|| ctx.target.isa().as_str().to_string()),
        }
    }

    pub fn is_enabled(&self, index: u32) -> bool {
        self.debug_stages.contains(&index) && !self.disabled_stages.contains(&index)
    }

    pub fn file_name(&self, index: u32, stage: LinkStage) -> String {
        let mut name = format!("pre_{}_{}.ll", index, stage);
        if let Some(isa) = &self.isa_suffix {
            name.push('_');
            name.push_str(isa);
        }
        name
    }

    /// Dump `module` if checkpoint `index` is enabled. Returns a warning if
    /// the dump could not be written.
    pub fn checkpoint(&self, module: &Module<'_>, stage: LinkStage, index: u32) -> Option<Diagnostic> {
        if !self.is_enabled(index) {
            return None;
        }
        let name = self.file_name(index, stage);
        let Some(dir) = &self.dump_dir else {
            println!("; {}\n{}", name, module.print_to_string().to_string());
            return None;
        };

        let path = dir.join(&name);
        match write_dump(module, dir, &path) {
            Ok(()) => {
                debug!(path = %path.display(), "dumped IR");
                None
            }
            Err(message) => {
                warn!(path = %path.display(), %message, "IR dump skipped");
                Some(
                    Diagnostic::warning(format!("could not dump IR for {}: {}", stage, message))
                        .with_error_code(ErrorCode::DumpFailed)
                        .with_subject(path.display().to_string()),
                )
            }
        }
    }
}

fn write_dump(module: &Module<'_>, dir: &Path, path: &Path) -> Result<(), String> {
    fs::create_dir_all(dir).map_err(|e| format!("cannot create {}: {}", dir.display(), e))?;
    module.print_to_file(path).map_err(|e| e.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::target::{Arch, Target, TargetIsa, TargetOs};
    use inkwell::context::Context;

    fn link_context() -> LinkContext {
        let target = Target::new(TargetIsa::Avx2I32x16, TargetOs::Linux, Arch::X86_64).unwrap();
        LinkContext::new(target)
    }

    #[test]
    fn test_file_names() {
        let single = DumpSettings::from_context(&link_context());
        assert_eq!(
            single.file_name(2, LinkStage::LinkCommonBuiltins),
            "pre_2_LinkCommonBuiltins.ll"
        );

        let multi = DumpSettings::from_context(&link_context().with_multi_target(true));
        assert_eq!(
            multi.file_name(1, LinkStage::LinkStdlib),
            "pre_1_LinkStdlib.ll_avx2-i32x16"
        );
    }

    #[test]
    fn test_disabled_stages_win() {
        let settings = DumpSettings::from_context(
            &link_context()
                .with_debug_stages([1, 2])
                .with_disabled_stages([2]),
        );
        assert!(settings.is_enabled(1));
        assert!(!settings.is_enabled(2));
        assert!(!settings.is_enabled(3));
    }

    #[test]
    fn test_checkpoint_creates_directory() {
        let tmp = tempfile::tempdir().unwrap();
        let dir = tmp.path().join("nested").join("dumps");
        let settings = DumpSettings::from_context(
            &link_context().with_debug_stages([3]).with_dump_dir(&dir),
        );
        let ctx = Context::create();
        let module = ctx.create_module("dumped");

        assert!(settings
            .checkpoint(&module, LinkStage::LinkTargetBuiltins, 3)
            .is_none());
        let text = fs::read_to_string(dir.join("pre_3_LinkTargetBuiltins.ll")).unwrap();
        assert!(text.contains("dumped"));

        assert!(settings.checkpoint(&module, LinkStage::LinkStdlib, 1).is_none());
        assert!(!dir.join("pre_1_LinkStdlib.ll").exists());
    }

    #[test]
    fn test_unwritable_directory_is_a_warning() {
        let tmp = tempfile::tempdir().unwrap();
        let blocker = tmp.path().join("not_a_dir");
        fs::write(&blocker, "").unwrap();
        let settings = DumpSettings::from_context(
            &link_context().with_debug_stages([1]).with_dump_dir(&blocker),
        );
        let ctx = Context::create();
        let module = ctx.create_module("dumped");

        let warning = settings
            .checkpoint(&module, LinkStage::LinkStdlib, 1)
            .unwrap();
        assert!(!warning.is_error());
        assert_eq!(warning.code, Some(ErrorCode::DumpFailed));
    }
}
