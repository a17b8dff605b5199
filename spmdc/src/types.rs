//! Source-level types for foreign function declarations.
//!
//! This is the narrow slice of the SPMD source type system that the
//! builtins layer needs in order to declare foreign functions: atomic
//! types qualified by variability, pointers, and function signatures.
//! The full type system (structs, references, enums, templates) lives in
//! the front end and is never constructed here.
//!
//! Types are plain values. Two types are the same type exactly when they
//! compare equal, so they can be freely cloned, hashed, and used as map
//! keys.

use std::fmt;

/// Whether a value is shared across all program instances of a gang
/// (`uniform`) or holds one value per program instance (`varying`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Variability {
    Uniform,
    Varying,
}

impl Variability {
    pub fn as_str(self) -> &'static str {
        match self {
            Variability::Uniform => "uniform",
            Variability::Varying => "varying",
        }
    }
}

impl fmt::Display for Variability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Scalar kinds of atomic types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum AtomicKind {
    Void,
    Bool,
    Int8,
    UInt8,
    Int16,
    UInt16,
    Int32,
    UInt32,
    Int64,
    UInt64,
    Float16,
    Float,
    Double,
}

impl AtomicKind {
    /// Name as written in source.
    pub fn as_str(self) -> &'static str {
        match self {
            AtomicKind::Void => "void",
            AtomicKind::Bool => "bool",
            AtomicKind::Int8 => "int8",
            AtomicKind::UInt8 => "uint8",
            AtomicKind::Int16 => "int16",
            AtomicKind::UInt16 => "uint16",
            AtomicKind::Int32 => "int32",
            AtomicKind::UInt32 => "uint32",
            AtomicKind::Int64 => "int64",
            AtomicKind::UInt64 => "uint64",
            AtomicKind::Float16 => "float16",
            AtomicKind::Float => "float",
            AtomicKind::Double => "double",
        }
    }

    pub fn is_integer(self) -> bool {
        matches!(
            self,
            AtomicKind::Int8
                | AtomicKind::UInt8
                | AtomicKind::Int16
                | AtomicKind::UInt16
                | AtomicKind::Int32
                | AtomicKind::UInt32
                | AtomicKind::Int64
                | AtomicKind::UInt64
        )
    }

    pub fn is_unsigned(self) -> bool {
        matches!(
            self,
            AtomicKind::UInt8 | AtomicKind::UInt16 | AtomicKind::UInt32 | AtomicKind::UInt64
        )
    }
}

/// A source-level type node.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum SourceType {
    /// A scalar type qualified by variability.
    Atomic {
        kind: AtomicKind,
        variability: Variability,
    },
    /// A pointer. `variability` qualifies the pointer value itself; the
    /// pointee carries its own.
    Pointer {
        pointee: Box<SourceType>,
        variability: Variability,
    },
}

impl SourceType {
    pub fn void() -> Self {
        SourceType::uniform(AtomicKind::Void)
    }

    pub fn uniform(kind: AtomicKind) -> Self {
        SourceType::Atomic {
            kind,
            variability: Variability::Uniform,
        }
    }

    pub fn varying(kind: AtomicKind) -> Self {
        SourceType::Atomic {
            kind,
            variability: Variability::Varying,
        }
    }

    /// A uniform pointer to `pointee`.
    pub fn uniform_pointer_to(pointee: SourceType) -> Self {
        SourceType::Pointer {
            pointee: Box::new(pointee),
            variability: Variability::Uniform,
        }
    }

    pub fn variability(&self) -> Variability {
        match self {
            SourceType::Atomic { variability, .. } | SourceType::Pointer { variability, .. } => {
                *variability
            }
        }
    }

    pub fn is_void(&self) -> bool {
        matches!(
            self,
            SourceType::Atomic {
                kind: AtomicKind::Void,
                ..
            }
        )
    }

    pub fn is_pointer(&self) -> bool {
        matches!(self, SourceType::Pointer { .. })
    }

    /// Number of pointer levels above the innermost atomic type.
    pub fn pointer_depth(&self) -> usize {
        match self {
            SourceType::Atomic { .. } => 0,
            SourceType::Pointer { pointee, .. } => 1 + pointee.pointer_depth(),
        }
    }
}

impl fmt::Display for SourceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SourceType::Atomic {
                kind: AtomicKind::Void,
                ..
            } => f.write_str("void"),
            SourceType::Atomic { kind, variability } => {
                write!(f, "{} {}", variability, kind.as_str())
            }
            SourceType::Pointer {
                pointee,
                variability,
            } => write!(f, "{} * {}", pointee, variability),
        }
    }
}

/// Signature of a function as seen by the type checker.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FunctionType {
    pub return_type: SourceType,
    pub params: Vec<SourceType>,
}

impl FunctionType {
    pub fn new(return_type: SourceType, params: Vec<SourceType>) -> Self {
        Self {
            return_type,
            params,
        }
    }

    pub fn arity(&self) -> usize {
        self.params.len()
    }
}

impl fmt::Display for FunctionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}(", self.return_type)?;
        for (i, param) in self.params.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{}", param)?;
        }
        f.write_str(")")
    }
}
