//! Linking precompiled builtin libraries into generated modules.
//!
//! # Architecture
//!
//! ```text
//! LibraryRegistry -> BitcodeModuleLinker -> PersistentSymbolGuard -> global DCE
//!                                 \-> LinkPipeline drives the stages
//! IntrinsicTypeMapper -> IntrinsicSymbolBinder -> SymbolTable
//! ```
//!
//! The pipeline merges the standard library and the builtins, keeps the
//! helpers that later passes will call, and removes everything else. The
//! binder works on the other side of the front end: it gives LLVM
//! intrinsics source-level signatures so user code can call them.

pub mod binder;
pub mod dump;
pub mod error;
pub mod intrinsics;
pub mod ir;
pub mod library;
pub mod linker;
pub mod passes;
pub mod persistent;
pub mod pipeline;
pub mod type_map;

pub use binder::IntrinsicSymbolBinder;
pub use dump::DumpSettings;
pub use error::{BindError, LinkError, LinkStage};
pub use library::{BitcodeLib, LibraryKey, LibraryRegistry, LibraryRole, LibrarySource};
pub use linker::{BitcodeModuleLinker, LinkMode, LinkedNames};
pub use persistent::{PersistentCatalog, PersistentGroup, PersistentSymbolGuard, PreservedRoots};
pub use pipeline::{link_dispatcher, LinkPipeline, LinkReport, StageStats};
pub use type_map::{IntrinsicTypeMapper, LlvmTypeKey, Unrepresentable};
