//! Mapping from LLVM types to source-level types.
//!
//! LLVM erases three distinctions the source language makes: integer
//! signedness, uniform versus varying, and what a pointer points at. The
//! mapper recovers a source type for the small, closed set of LLVM types
//! that builtin libraries use in foreign function signatures and refuses
//! everything else.
//!
//! An LLVM type is first classified into an [`LlvmTypeKey`]. The key is
//! then looked up in a single table built once per process. Signedness
//! cannot be recovered from the IR, so integer entries hold both variants
//! and the caller's hint picks one. Varying-ness is recovered from vector
//! width: a vector is varying only when its lane count equals the target's
//! gang size. Varying bool is the target's mask type, so `<W x i1>` only
//! maps on targets whose mask lanes are `i1`. On `i32`-mask targets the
//! mask is indistinguishable from `<W x i32>`, which maps to varying int.

use std::collections::HashMap;
use std::sync::OnceLock;

use inkwell::types::{AnyTypeEnum, BasicTypeEnum, FloatType};
use inkwell::AddressSpace;
use thiserror::Error;

use crate::target::{MaskRepr, Target, TargetIsa};
use crate::types::{AtomicKind, SourceType};

/// The LLVM type has no source-level equivalent.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("LLVM type `{llvm_type}` has no source-level equivalent")]
pub struct Unrepresentable {
    pub llvm_type: String,
}

/// Low-level scalar kinds: what LLVM can tell apart.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ScalarKind {
    I1,
    I8,
    I16,
    I32,
    I64,
    F16,
    F32,
    F64,
}

impl ScalarKind {
    pub const ALL: [ScalarKind; 8] = [
        ScalarKind::I1,
        ScalarKind::I8,
        ScalarKind::I16,
        ScalarKind::I32,
        ScalarKind::I64,
        ScalarKind::F16,
        ScalarKind::F32,
        ScalarKind::F64,
    ];

    fn from_int_width(bits: u32) -> Option<Self> {
        match bits {
            1 => Some(ScalarKind::I1),
            8 => Some(ScalarKind::I8),
            16 => Some(ScalarKind::I16),
            32 => Some(ScalarKind::I32),
            64 => Some(ScalarKind::I64),
            _ => None,
        }
    }

    fn from_float(ty: FloatType<'_>) -> Option<Self> {
        let ctx = ty.get_context();
        if ty == ctx.f16_type() {
            Some(ScalarKind::F16)
        } else if ty == ctx.f32_type() {
            Some(ScalarKind::F32)
        } else if ty == ctx.f64_type() {
            Some(ScalarKind::F64)
        } else {
            None
        }
    }

    fn from_basic(ty: BasicTypeEnum<'_>) -> Option<Self> {
        match ty {
            BasicTypeEnum::IntType(t) => Self::from_int_width(t.get_bit_width()),
            BasicTypeEnum::FloatType(t) => Self::from_float(t),
            _ => None,
        }
    }

    /// Source kinds for this scalar: `(signed, unsigned)` for integers,
    /// the same kind twice otherwise.
    fn atomic_kinds(self) -> (AtomicKind, AtomicKind) {
        match self {
            ScalarKind::I1 => (AtomicKind::Bool, AtomicKind::Bool),
            ScalarKind::I8 => (AtomicKind::Int8, AtomicKind::UInt8),
            ScalarKind::I16 => (AtomicKind::Int16, AtomicKind::UInt16),
            ScalarKind::I32 => (AtomicKind::Int32, AtomicKind::UInt32),
            ScalarKind::I64 => (AtomicKind::Int64, AtomicKind::UInt64),
            ScalarKind::F16 => (AtomicKind::Float16, AtomicKind::Float16),
            ScalarKind::F32 => (AtomicKind::Float, AtomicKind::Float),
            ScalarKind::F64 => (AtomicKind::Double, AtomicKind::Double),
        }
    }
}

/// Classification of an LLVM type relative to a gang size.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum LlvmTypeKey {
    Void,
    Value {
        scalar: ScalarKind,
        /// A vector of exactly gang-size lanes.
        varying: bool,
        pointer_depth: u8,
    },
}

impl LlvmTypeKey {
    /// Every key up to `max_depth` levels of pointers.
    pub fn enumerate(max_depth: u8) -> Vec<LlvmTypeKey> {
        let mut keys = vec![LlvmTypeKey::Void];
        for pointer_depth in 0..=max_depth {
            for varying in [false, true] {
                for scalar in ScalarKind::ALL {
                    keys.push(LlvmTypeKey::Value {
                        scalar,
                        varying,
                        pointer_depth,
                    });
                }
            }
        }
        keys
    }
}

#[derive(Debug, Clone)]
enum TableEntry {
    Fixed(SourceType),
    Integer {
        signed: SourceType,
        unsigned: SourceType,
    },
}

impl TableEntry {
    fn select(&self, treat_int_as_unsigned: bool) -> &SourceType {
        match self {
            TableEntry::Fixed(ty) => ty,
            TableEntry::Integer { signed, unsigned } => {
                if treat_int_as_unsigned {
                    unsigned
                } else {
                    signed
                }
            }
        }
    }
}

fn type_table() -> &'static HashMap<LlvmTypeKey, TableEntry> {
    static TABLE: OnceLock<HashMap<LlvmTypeKey, TableEntry>> = OnceLock::new();
    TABLE.get_or_init(build_type_table)
}

fn build_type_table() -> HashMap<LlvmTypeKey, TableEntry> {
    let mut table = HashMap::new();
    table.insert(LlvmTypeKey::Void, TableEntry::Fixed(SourceType::void()));

    for scalar in ScalarKind::ALL {
        let (signed, unsigned) = scalar.atomic_kinds();
        for varying in [false, true] {
            let make = |kind| {
                if varying {
                    SourceType::varying(kind)
                } else {
                    SourceType::uniform(kind)
                }
            };
            let entry = |wrap: &dyn Fn(SourceType) -> SourceType| {
                if signed == unsigned {
                    TableEntry::Fixed(wrap(make(signed)))
                } else {
                    TableEntry::Integer {
                        signed: wrap(make(signed)),
                        unsigned: wrap(make(unsigned)),
                    }
                }
            };

            table.insert(
                LlvmTypeKey::Value {
                    scalar,
                    varying,
                    pointer_depth: 0,
                },
                entry(&|ty| ty),
            );

            // Neither `i1*` nor a pointer to the mask is a source type.
            if scalar != ScalarKind::I1 {
                table.insert(
                    LlvmTypeKey::Value {
                        scalar,
                        varying,
                        pointer_depth: 1,
                    },
                    entry(&SourceType::uniform_pointer_to),
                );
            }
        }
    }
    table
}

/// Maps LLVM types to source types for one gang size and mask layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IntrinsicTypeMapper {
    vector_width: u32,
    mask: MaskRepr,
}

impl IntrinsicTypeMapper {
    pub fn new(vector_width: u32, mask: MaskRepr) -> Self {
        Self { vector_width, mask }
    }

    pub fn for_isa(isa: TargetIsa) -> Self {
        Self::new(isa.vector_width(), isa.mask_repr())
    }

    pub fn for_target(target: &Target) -> Self {
        Self::for_isa(target.isa())
    }

    pub fn vector_width(&self) -> u32 {
        self.vector_width
    }

    pub fn mask_repr(&self) -> MaskRepr {
        self.mask
    }

    /// Classify an LLVM type, or `None` if it is outside the mapped domain
    /// altogether.
    pub fn classify(&self, ty: AnyTypeEnum<'_>) -> Option<LlvmTypeKey> {
        match ty {
            AnyTypeEnum::VoidType(_) => Some(LlvmTypeKey::Void),
            AnyTypeEnum::IntType(t) => {
                ScalarKind::from_int_width(t.get_bit_width()).map(|scalar| LlvmTypeKey::Value {
                    scalar,
                    varying: false,
                    pointer_depth: 0,
                })
            }
            AnyTypeEnum::FloatType(t) => ScalarKind::from_float(t).map(|scalar| LlvmTypeKey::Value {
                scalar,
                varying: false,
                pointer_depth: 0,
            }),
            AnyTypeEnum::VectorType(t) if t.get_size() == self.vector_width => {
                match ScalarKind::from_basic(t.get_element_type())? {
                    ScalarKind::I1 if self.mask != MaskRepr::I1 => None,
                    scalar => Some(LlvmTypeKey::Value {
                        scalar,
                        varying: true,
                        pointer_depth: 0,
                    }),
                }
            }
            AnyTypeEnum::PointerType(t) if t.get_address_space() == AddressSpace::default() => {
                match self.classify(t.get_element_type())? {
                    LlvmTypeKey::Void => None,
                    LlvmTypeKey::Value {
                        scalar,
                        varying,
                        pointer_depth,
                    } => Some(LlvmTypeKey::Value {
                        scalar,
                        varying,
                        pointer_depth: pointer_depth.checked_add(1)?,
                    }),
                }
            }
            _ => None,
        }
    }

    /// Table lookup for an already classified type.
    pub fn lookup(key: LlvmTypeKey, treat_int_as_unsigned: bool) -> Option<SourceType> {
        type_table()
            .get(&key)
            .map(|entry| entry.select(treat_int_as_unsigned).clone())
    }

    /// Map an LLVM type to its source type.
    pub fn map_type(
        &self,
        ty: AnyTypeEnum<'_>,
        treat_int_as_unsigned: bool,
    ) -> Result<SourceType, Unrepresentable> {
        self.classify(ty)
            .and_then(|key| Self::lookup(key, treat_int_as_unsigned))
            .ok_or_else(|| Unrepresentable {
                llvm_type: ty.print_to_string().to_string(),
            })
    }
}
