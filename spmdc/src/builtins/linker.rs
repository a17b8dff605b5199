//! Merging precompiled library modules into the module being compiled.
//!
//! A library is linked in four steps:
//!
//! 1. Its own `!llvm.ident` is dropped, and in multi-target builds its
//!    definitions are renamed with the target's suffix.
//! 2. Library definitions of names the destination already defines are
//!    turned into declarations. The destination's definition wins.
//! 3. Declarations nobody in the library calls are re-declared in the
//!    destination, because the module linker drops them.
//! 4. Triple and data layout are overwritten with the destination's. The
//!    libraries are built for a generic triple, which would otherwise make
//!    the linker warn about every merge.
//! 5. The modules are merged.
//!
//! Afterwards the caller internalizes what the library introduced with
//! [`BitcodeModuleLinker::set_internal`], so that the next global DCE
//! removes whatever nothing references. Only externally visible library
//! definitions are recorded: local ones may be renamed by the merge, and
//! their names could then belong to the destination.

use std::collections::HashSet;

use inkwell::attributes::AttributeLoc;
use inkwell::context::Context;
use inkwell::memory_buffer::MemoryBuffer;
use inkwell::module::{Linkage, Module};
use inkwell::values::{FunctionValue, GlobalValue};
use tracing::{debug, trace};

use super::error::LinkError;
use super::ir;
use super::library::BitcodeLib;

/// Runtime entry points the C builtins export to the task and print
/// runtime. They are never internalized.
pub const RUNTIME_HOOKS: [&str; 2] = ["__do_print", "__num_cores"];

/// How a library is merged.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LinkMode {
    declare_all: bool,
    rename_suffix: Option<String>,
}

impl LinkMode {
    /// Standard library or builtins: merged as is.
    pub fn library() -> Self {
        Self::default()
    }

    /// Dispatch stubs: every library function is declared in the
    /// destination first, so all of them are pulled in.
    pub fn dispatch() -> Self {
        Self {
            declare_all: true,
            rename_suffix: None,
        }
    }

    /// Append `suffix` to every non-intrinsic definition before merging.
    pub fn with_suffix(mut self, suffix: impl Into<String>) -> Self {
        self.rename_suffix = Some(suffix.into());
        self
    }

    pub fn suffix(&self) -> Option<&str> {
        self.rename_suffix.as_deref()
    }

    pub fn declares_all(&self) -> bool {
        self.declare_all
    }
}

/// Definitions a library brought in, under their final names.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LinkedNames {
    pub library: String,
    /// Function definitions.
    pub definitions: Vec<String>,
    /// Global variable definitions.
    pub globals: Vec<String>,
}

impl LinkedNames {
    pub fn contains(&self, name: &str) -> bool {
        self.definitions.iter().chain(&self.globals).any(|n| n == name)
    }

    pub fn len(&self) -> usize {
        self.definitions.len() + self.globals.len()
    }

    pub fn is_empty(&self) -> bool {
        self.definitions.is_empty() && self.globals.is_empty()
    }
}

/// Whether a library-introduced name must stay externally visible.
pub fn is_reserved_name(name: &str) -> bool {
    ir::is_intrinsic_name(name) || RUNTIME_HOOKS.iter().any(|hook| *hook == name)
}

fn is_local(linkage: Linkage) -> bool {
    matches!(linkage, Linkage::Internal | Linkage::Private)
}

/// Global variables that are linked by name. Appending arrays are
/// concatenated instead, and `llvm.` globals belong to LLVM.
fn is_named_variable(global: GlobalValue<'_>) -> bool {
    global.get_linkage() != Linkage::Appending && !ir::is_intrinsic_name(&ir::global_name(global))
}

/// Links libraries into one destination module.
pub struct BitcodeModuleLinker<'a, 'ctx> {
    context: &'ctx Context,
    dest: &'a Module<'ctx>,
}

impl<'a, 'ctx> BitcodeModuleLinker<'a, 'ctx> {
    pub fn new(context: &'ctx Context, dest: &'a Module<'ctx>) -> Self {
        Self { context, dest }
    }

    /// Materialize `lib` in the destination's context and merge it.
    pub fn link(&self, lib: &BitcodeLib, mode: &LinkMode) -> Result<LinkedNames, LinkError> {
        let module = lib.load(self.context)?;
        self.link_module(module, lib.name(), mode)
    }

    /// Merge an already parsed library module.
    pub fn link_module(
        &self,
        lib: Module<'ctx>,
        library: &str,
        mode: &LinkMode,
    ) -> Result<LinkedNames, LinkError> {
        let lib = self.strip_ident(lib, library)?;

        if let Some(suffix) = mode.suffix() {
            rename_definitions(&lib, suffix);
        }

        let dest_defined = self.defined_names();
        let dropped = drop_redefinitions(&lib, &dest_defined);

        let definitions: Vec<String> = lib
            .get_functions()
            .filter(|f| f.count_basic_blocks() > 0 && !is_local(f.get_linkage()))
            .map(ir::function_name)
            .filter(|name| !ir::is_intrinsic_name(name))
            .collect();
        let globals: Vec<String> = lib
            .get_globals()
            .filter(|g| !g.is_declaration() && !is_local(g.get_linkage()) && is_named_variable(*g))
            .map(ir::global_name)
            .collect();

        let reinserted = self.redeclare_unused_declarations(&lib);

        lib.set_triple(&self.dest.get_triple());
        lib.set_data_layout(&self.dest.get_data_layout());

        if mode.declares_all() {
            for function in lib.get_functions() {
                self.declare(function);
            }
        }

        self.dest
            .link_in_module(lib)
            .map_err(|message| LinkError::LinkConflict {
                library: library.to_string(),
                message: message.to_string(),
            })?;

        debug!(
            library,
            definitions = definitions.len(),
            globals = globals.len(),
            dropped,
            reinserted,
            "linked builtin library"
        );
        Ok(LinkedNames {
            library: library.to_string(),
            definitions,
            globals,
        })
    }

    /// Give internal linkage to every destination definition named in
    /// `names`, except the reserved ones. Returns how many changed.
    pub fn set_internal(&self, names: &LinkedNames) -> usize {
        let mut changed = 0;
        for name in names.definitions.iter().filter(|n| !is_reserved_name(n)) {
            let Some(function) = self.dest.get_function(name) else {
                continue;
            };
            if function.count_basic_blocks() == 0 || is_local(function.get_linkage()) {
                continue;
            }
            trace!(function = %name, "internalized");
            function.set_linkage(Linkage::Internal);
            changed += 1;
        }
        for name in names.globals.iter().filter(|n| !is_reserved_name(n)) {
            let Some(global) = self.dest.get_global(name) else {
                continue;
            };
            if global.is_declaration() || is_local(global.get_linkage()) || !is_named_variable(global)
            {
                continue;
            }
            trace!(global = %name, "internalized");
            global.set_linkage(Linkage::Internal);
            changed += 1;
        }
        changed
    }

    /// Externally visible definitions already in the destination.
    fn defined_names(&self) -> HashSet<String> {
        let functions = self
            .dest
            .get_functions()
            .filter(|f| f.count_basic_blocks() > 0 && !is_local(f.get_linkage()))
            .map(ir::function_name);
        let globals = self
            .dest
            .get_globals()
            .filter(|g| !g.is_declaration() && !is_local(g.get_linkage()) && is_named_variable(*g))
            .map(ir::global_name);
        functions.chain(globals).collect()
    }

    /// Drop the library's `!llvm.ident`. The C API cannot erase named
    /// metadata, so the module goes through its textual form.
    fn strip_ident(&self, lib: Module<'ctx>, library: &str) -> Result<Module<'ctx>, LinkError> {
        if lib.get_global_metadata_size("llvm.ident") == 0 {
            return Ok(lib);
        }

        let text = lib.print_to_string().to_string();
        let filtered: String = text
            .lines()
            .filter(|line| !line.trim_start().starts_with("!llvm.ident"))
            .flat_map(|line| [line, "\n"])
            .collect();

        let buffer = MemoryBuffer::create_from_memory_range_copy(filtered.as_bytes(), library);
        self.context
            .create_module_from_ir(buffer)
            .map_err(|err| LinkError::MalformedLibrary {
                library: library.to_string(),
                message: err.to_string(),
            })
    }

    fn redeclare_unused_declarations(&self, lib: &Module<'ctx>) -> usize {
        let mut count = 0;
        for function in lib.get_functions() {
            if function.count_basic_blocks() > 0 || ir::has_any_use(function) {
                continue;
            }
            if self.declare(function).is_some() {
                count += 1;
            }
        }
        count
    }

    /// Declare `function` in the destination with its attributes, unless a
    /// function of that name already exists there.
    fn declare(&self, function: FunctionValue<'ctx>) -> Option<FunctionValue<'ctx>> {
        let name = ir::function_name(function);
        if self.dest.get_function(&name).is_some() {
            return None;
        }
        let decl = self.dest.add_function(&name, function.get_type(), None);
        decl.set_call_conventions(function.get_call_conventions());

        let mut locations = vec![AttributeLoc::Function, AttributeLoc::Return];
        locations.extend((0..function.count_params()).map(AttributeLoc::Param));
        for loc in locations {
            for attribute in function.attributes(loc) {
                decl.add_attribute(loc, attribute);
            }
        }
        Some(decl)
    }
}

/// Turn every externally visible definition in `lib` whose name is in
/// `defined` into a declaration. Returns how many were dropped.
fn drop_redefinitions(lib: &Module<'_>, defined: &HashSet<String>) -> usize {
    if defined.is_empty() {
        return 0;
    }
    let mut dropped = 0;

    let functions: Vec<_> = lib
        .get_functions()
        .filter(|f| f.count_basic_blocks() > 0 && !is_local(f.get_linkage()))
        .filter(|f| defined.contains(&ir::function_name(*f)))
        .collect();
    for function in functions {
        let name = ir::function_name(function);
        function.as_global_value().set_name("");
        let decl = lib.add_function(&name, function.get_type(), None);
        function.replace_all_uses_with(decl);
        // SAFETY: every use now refers to `decl`, and nothing else holds
        // this handle.
        unsafe { function.delete() };
        trace!(function = %name, "kept the destination's definition");
        dropped += 1;
    }

    let globals: Vec<_> = lib
        .get_globals()
        .filter(|g| !g.is_declaration() && !is_local(g.get_linkage()) && is_named_variable(*g))
        .filter(|g| defined.contains(&ir::global_name(*g)))
        .collect();
    for global in globals {
        let name = ir::global_name(global);
        trace!(global = %name, "kept the destination's definition");
        ir::clear_initializer(global);
        dropped += 1;
    }
    dropped
}

/// Rename every non-intrinsic definition in `lib` by appending `suffix`.
pub fn rename_definitions(lib: &Module<'_>, suffix: &str) -> usize {
    let mut renamed = 0;
    for function in lib.get_functions() {
        if function.count_basic_blocks() == 0 {
            continue;
        }
        let name = ir::function_name(function);
        if ir::is_intrinsic_name(&name) {
            continue;
        }
        let new_name = format!("{}{}", name, suffix);
        trace!(from = %name, to = %new_name, "renamed library function");
        function.as_global_value().set_name(&new_name);
        renamed += 1;
    }
    renamed
}
