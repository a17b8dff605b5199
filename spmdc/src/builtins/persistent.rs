//! Keeping late-needed helper functions alive through early DCE.
//!
//! Some library helpers are only called by code that later optimization
//! passes synthesize. A masked load may become a gather, for example.
//! Such helpers look dead right after linking. They are protected by
//! listing them in `llvm.compiler.used`, which global DCE treats as a use.
//!
//! Protection happens in two phases around the standard library's first
//! DCE:
//!
//! * [`PersistentSymbolGuard::preserve_conservatively`] runs before it. A
//!   group with any used member is preserved whole.
//! * [`PersistentSymbolGuard::prune_precisely`] runs after it. Uses are
//!   re-counted once dead standard library code is gone, and the list is
//!   rebuilt from scratch.
//!
//! Both phases keep every persistent function, and both carry over
//! entries that some other producer put in the list.
//!
//! The phases must stay in that order relative to the standard library
//! DCE. If pruning runs first, it strips helpers whose only future callers
//! do not exist yet.

use inkwell::module::{Linkage, Module};
use inkwell::values::{FunctionValue, PointerValue};
use inkwell::AddressSpace;
use tracing::debug;

use super::ir::{self, COMPILER_USED, METADATA_SECTION};

/// Functions that are kept or dropped together.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PersistentGroup {
    pub name: &'static str,
    pub members: &'static [&'static str],
}

impl PersistentGroup {
    pub const fn new(name: &'static str, members: &'static [&'static str]) -> Self {
        Self { name, members }
    }

    pub fn contains(&self, function: &str) -> bool {
        self.members.iter().any(|m| *m == function)
    }
}

const MASKED_LOAD: PersistentGroup = PersistentGroup::new(
    "masked_load",
    &[
        "__masked_load_i8",
        "__masked_load_i16",
        "__masked_load_i32",
        "__masked_load_i64",
        "__masked_load_half",
        "__masked_load_float",
        "__masked_load_double",
    ],
);

const MASKED_STORE: PersistentGroup = PersistentGroup::new(
    "masked_store",
    &[
        "__masked_store_i8",
        "__masked_store_i16",
        "__masked_store_i32",
        "__masked_store_i64",
        "__masked_store_half",
        "__masked_store_float",
        "__masked_store_double",
    ],
);

const MASKED_STORE_BLEND: PersistentGroup = PersistentGroup::new(
    "masked_store_blend",
    &[
        "__masked_store_blend_i8",
        "__masked_store_blend_i16",
        "__masked_store_blend_i32",
        "__masked_store_blend_i64",
        "__masked_store_blend_half",
        "__masked_store_blend_float",
        "__masked_store_blend_double",
    ],
);

const GATHER: PersistentGroup = PersistentGroup::new(
    "gather",
    &[
        "__gather32_i8",
        "__gather32_i16",
        "__gather32_i32",
        "__gather32_i64",
        "__gather32_float",
        "__gather32_double",
        "__gather64_i8",
        "__gather64_i16",
        "__gather64_i32",
        "__gather64_i64",
        "__gather64_float",
        "__gather64_double",
    ],
);

const SCATTER: PersistentGroup = PersistentGroup::new(
    "scatter",
    &[
        "__scatter32_i8",
        "__scatter32_i16",
        "__scatter32_i32",
        "__scatter32_i64",
        "__scatter32_float",
        "__scatter32_double",
        "__scatter64_i8",
        "__scatter64_i16",
        "__scatter64_i32",
        "__scatter64_i64",
        "__scatter64_float",
        "__scatter64_double",
    ],
);

const PREFETCH: PersistentGroup = PersistentGroup::new(
    "prefetch",
    &[
        "__prefetch_read_uniform_1",
        "__prefetch_read_uniform_2",
        "__prefetch_read_uniform_3",
        "__prefetch_read_uniform_nt",
        "__prefetch_read_varying_1",
        "__prefetch_read_varying_2",
        "__prefetch_read_varying_3",
        "__prefetch_read_varying_nt",
    ],
);

const BUILTIN_GROUPS: [PersistentGroup; 6] = [
    MASKED_LOAD,
    MASKED_STORE,
    MASKED_STORE_BLEND,
    GATHER,
    SCATTER,
    PREFETCH,
];

/// Print and task runtime entry points.
const BUILTIN_FUNCS: [&str; 5] = ["__do_print", "__num_cores", "ISPCAlloc", "ISPCLaunch", "ISPCSync"];

/// The groups and single functions protected from early DCE.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PersistentCatalog {
    pub groups: Vec<PersistentGroup>,
    pub funcs: Vec<&'static str>,
}

impl Default for PersistentCatalog {
    fn default() -> Self {
        Self::builtin()
    }
}

impl PersistentCatalog {
    pub fn new(groups: Vec<PersistentGroup>, funcs: Vec<&'static str>) -> Self {
        Self { groups, funcs }
    }

    /// The catalog of the shipped builtin libraries.
    pub fn builtin() -> Self {
        Self::new(BUILTIN_GROUPS.to_vec(), BUILTIN_FUNCS.to_vec())
    }

    /// Whether `name` is a group member or a persistent function.
    pub fn contains(&self, name: &str) -> bool {
        self.funcs.iter().any(|f| *f == name) || self.groups.iter().any(|g| g.contains(name))
    }

    pub fn group(&self, name: &str) -> Option<&PersistentGroup> {
        self.groups.iter().find(|g| g.name == name)
    }
}

/// The set of globals protected from DCE, in insertion order.
///
/// This is the in-memory form of `llvm.compiler.used`: it is computed with
/// [`PreservedRoots::rebuild_from`] and written back with
/// [`PreservedRoots::apply_to_module`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PreservedRoots {
    names: Vec<String>,
    retained_groups: Vec<&'static str>,
}

impl PreservedRoots {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a name; returns false if it was already present.
    pub fn insert(&mut self, name: impl Into<String>) -> bool {
        let name = name.into();
        if self.contains(&name) {
            return false;
        }
        self.names.push(name);
        true
    }

    pub fn contains(&self, name: &str) -> bool {
        self.names.iter().any(|n| n == name)
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }

    /// Groups that were retained when this set was computed.
    pub fn retained_groups(&self) -> &[&'static str] {
        &self.retained_groups
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    /// The roots currently recorded in `module`.
    pub fn read_from_module(module: &Module<'_>) -> Self {
        let mut roots = Self::new();
        for name in ir::compiler_used_names(module) {
            roots.insert(name);
        }
        roots
    }

    /// Compute a new root set for `module`.
    ///
    /// Entries already in the module's list that the catalog does not know
    /// are kept. Every group with a member satisfying `is_used` is kept
    /// whole, and every persistent function present in the module is kept.
    /// Catalog names with no function in the module are skipped.
    pub fn rebuild_from<'ctx>(
        module: &Module<'ctx>,
        catalog: &PersistentCatalog,
        is_used: impl Fn(FunctionValue<'ctx>) -> bool,
    ) -> Self {
        let mut roots = Self::new();
        for name in ir::compiler_used_names(module) {
            if !catalog.contains(&name) {
                roots.insert(name);
            }
        }

        for group in &catalog.groups {
            let present: Vec<_> = group
                .members
                .iter()
                .filter_map(|name| module.get_function(name))
                .collect();
            if present.iter().any(|f| is_used(*f)) {
                roots.retained_groups.push(group.name);
                for function in present {
                    roots.insert(ir::function_name(function));
                }
            }
        }

        for name in &catalog.funcs {
            if module.get_function(name).is_some() {
                roots.insert(*name);
            }
        }
        roots
    }

    /// Replace the module's `llvm.compiler.used` with this set. No array
    /// is created for an empty set. Returns the number of entries written.
    pub fn apply_to_module(&self, module: &Module<'_>) -> usize {
        if let Some(existing) = module.get_global(COMPILER_USED) {
            // SAFETY: nothing holds a handle to the compiler-used global;
            // its only user is the module itself.
            unsafe { existing.delete() };
        }

        let context = module.get_context();
        let i8_ptr = context.i8_type().ptr_type(AddressSpace::default());
        let entries: Vec<PointerValue<'_>> = self
            .names
            .iter()
            .filter_map(|name| {
                module
                    .get_function(name)
                    .map(|f| f.as_global_value().as_pointer_value())
                    .or_else(|| module.get_global(name).map(|g| g.as_pointer_value()))
            })
            .map(|ptr| ptr.const_cast(i8_ptr))
            .collect();
        if entries.is_empty() {
            return 0;
        }

        let array = i8_ptr.const_array(&entries);
        let global = module.add_global(i8_ptr.array_type(entries.len() as u32), None, COMPILER_USED);
        global.set_linkage(Linkage::Appending);
        global.set_section(Some(METADATA_SECTION));
        global.set_initializer(&array);
        entries.len()
    }
}

/// Runs the two preservation phases against one catalog.
#[derive(Debug, Clone, Copy)]
pub struct PersistentSymbolGuard<'c> {
    catalog: &'c PersistentCatalog,
}

impl<'c> PersistentSymbolGuard<'c> {
    pub fn new(catalog: &'c PersistentCatalog) -> Self {
        Self { catalog }
    }

    /// Phase A: before the first DCE after linking the standard library.
    pub fn preserve_conservatively(&self, module: &Module<'_>) -> PreservedRoots {
        let roots = self.recompute(module);
        debug!(
            groups = ?roots.retained_groups(),
            roots = roots.len(),
            "preserved persistent functions"
        );
        roots
    }

    /// Phase B: after that DCE, when use counts reflect real callers.
    pub fn prune_precisely(&self, module: &Module<'_>) -> PreservedRoots {
        let before = ir::compiler_used_names(module).len();
        let roots = self.recompute(module);
        debug!(
            groups = ?roots.retained_groups(),
            before,
            after = roots.len(),
            "pruned persistent functions"
        );
        roots
    }

    fn recompute(&self, module: &Module<'_>) -> PreservedRoots {
        let current = module.get_global(COMPILER_USED);
        let roots = PreservedRoots::rebuild_from(module, self.catalog, |f| {
            ir::genuine_use_count(f, current) > 0
        });
        roots.apply_to_module(module);
        roots
    }
}
