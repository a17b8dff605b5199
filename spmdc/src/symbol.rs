//! Symbols visible to the type checker.
//!
//! The builtins layer only ever adds function symbols, but it adds them to
//! the same table the front end uses, so lookups by name see builtin and
//! user functions alike. Foreign functions additionally get an index keyed
//! by the LLVM function they were bound from.

use std::collections::HashMap;

use inkwell::values::FunctionValue;
use string_interner::{DefaultStringInterner, DefaultSymbol};

use crate::builtins::error::BindError;
use crate::types::FunctionType;

/// Index of a symbol in its [`SymbolTable`]. Stable for the table's
/// lifetime; two ids are equal exactly when they denote the same symbol.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SymbolId(u32);

impl SymbolId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SymbolKind {
    Function,
}

/// Where a symbol's definition comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SymbolOrigin<'ctx> {
    /// Declared by the front end from source.
    Source,
    /// Bound from a foreign (LLVM-level) function; codegen calls it directly.
    ForeignIntrinsic(FunctionValue<'ctx>),
}

#[derive(Debug, Clone)]
pub struct Symbol<'ctx> {
    pub name: DefaultSymbol,
    pub ty: FunctionType,
    pub kind: SymbolKind,
    pub origin: SymbolOrigin<'ctx>,
}

impl<'ctx> Symbol<'ctx> {
    /// The LLVM function backing this symbol, if it was bound from one.
    pub fn foreign_function(&self) -> Option<FunctionValue<'ctx>> {
        match self.origin {
            SymbolOrigin::ForeignIntrinsic(f) => Some(f),
            SymbolOrigin::Source => None,
        }
    }
}

/// Function symbols of one module.
#[derive(Debug, Default)]
pub struct SymbolTable<'ctx> {
    interner: DefaultStringInterner,
    symbols: Vec<Symbol<'ctx>>,
    by_name: HashMap<DefaultSymbol, Vec<SymbolId>>,
    intrinsics: HashMap<FunctionValue<'ctx>, SymbolId>,
    rejected: HashMap<FunctionValue<'ctx>, BindError>,
}

impl<'ctx> SymbolTable<'ctx> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a function symbol. Overloads share a name and are all kept.
    pub fn add_function(
        &mut self,
        name: &str,
        ty: FunctionType,
        origin: SymbolOrigin<'ctx>,
    ) -> SymbolId {
        let interned = self.interner.get_or_intern(name);
        let id = SymbolId(self.symbols.len() as u32);
        self.symbols.push(Symbol {
            name: interned,
            ty,
            kind: SymbolKind::Function,
            origin,
        });
        self.by_name.entry(interned).or_default().push(id);
        id
    }

    pub fn get(&self, id: SymbolId) -> &Symbol<'ctx> {
        &self.symbols[id.index()]
    }

    /// Name of a symbol as written.
    pub fn name(&self, id: SymbolId) -> &str {
        self.interner
            .resolve(self.get(id).name)
            .unwrap_or_default()
    }

    /// All function symbols named `name`.
    pub fn lookup_functions(&self, name: &str) -> &[SymbolId] {
        self.interner
            .get(name)
            .and_then(|sym| self.by_name.get(&sym))
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    pub fn lookup_intrinsic(&self, function: FunctionValue<'ctx>) -> Option<SymbolId> {
        self.intrinsics.get(&function).copied()
    }

    pub(crate) fn register_intrinsic(&mut self, function: FunctionValue<'ctx>, id: SymbolId) {
        self.intrinsics.insert(function, id);
    }

    /// The recorded failure for a foreign function that could not be bound.
    pub fn rejection(&self, function: FunctionValue<'ctx>) -> Option<&BindError> {
        self.rejected.get(&function)
    }

    pub(crate) fn record_rejection(&mut self, function: FunctionValue<'ctx>, error: BindError) {
        self.rejected.insert(function, error);
    }

    pub fn len(&self) -> usize {
        self.symbols.len()
    }

    pub fn is_empty(&self) -> bool {
        self.symbols.is_empty()
    }

    pub fn intrinsic_count(&self) -> usize {
        self.intrinsics.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = (SymbolId, &Symbol<'ctx>)> {
        self.symbols
            .iter()
            .enumerate()
            .map(|(i, sym)| (SymbolId(i as u32), sym))
    }
}
