//! # spmdc builtins linker
//!
//! The part of an SPMD compiler backend that turns a freshly generated LLVM
//! module into a self-contained one: it links the standard library and the
//! builtin libraries for the target, keeps alive the helpers that later
//! optimization passes will call, and strips the rest.
//!
//! ## Quick Start
//!
//! ```rust
//! use inkwell::context::Context;
//! use spmdc::builtins::{LibraryKey, LibraryRegistry, LibraryRole, LinkPipeline};
//! use spmdc::config::LinkContext;
//! use spmdc::target::{Arch, Target, TargetIsa, TargetOs};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let target = Target::new(TargetIsa::Avx2I32x8, TargetOs::Linux, Arch::X86_64)?;
//! let config = LinkContext::new(target).with_stdlib(false);
//!
//! let registry = LibraryRegistry::new();
//! registry.register_ir(
//!     LibraryKey::for_target(LibraryRole::CommonBuiltins, &target),
//!     "define i32 @__num_cores() {\n  ret i32 1\n}\n",
//! );
//! registry.register_ir(
//!     LibraryKey::for_target(LibraryRole::TargetBuiltins, &target),
//!     "; no target helpers\n",
//! );
//!
//! let context = Context::create();
//! let module = context.create_module("kernel");
//! let mut stage = 0;
//! let report = LinkPipeline::new(&config, &registry).run(&context, &module, &mut stage)?;
//!
//! assert_eq!(stage, 2);
//! assert_eq!(report.stages.len(), 3);
//! assert!(module.get_function("__num_cores").is_some());
//! # Ok(())
//! # }
//! ```
//!
//! ## Module Overview
//!
//! - [`builtins`] - Library registry, linker, persistent symbols, pipeline
//! - [`config`] - Per-target link configuration
//! - [`diagnostics`] - Error reporting infrastructure
//! - [`logging`] - Subscriber setup for embedding drivers
//! - [`symbol`] - Symbol table shared with the front end
//! - [`target`] - ISA, OS and architecture
//! - [`types`] - Source-level types of foreign functions

pub mod builtins;
pub mod config;
pub mod diagnostics;
pub mod logging;
pub mod symbol;
pub mod target;
pub mod types;

// Re-export commonly used types
pub use builtins::{LinkError, LinkPipeline, LinkReport};
pub use config::{ConfigError, LinkContext};
pub use diagnostics::{Diagnostic, DiagnosticEmitter, DiagnosticKind, ErrorCode};
pub use target::{Arch, MaskRepr, Target, TargetIsa, TargetOs};
