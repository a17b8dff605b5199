//! Compilation targets: instruction set, operating system, architecture.
//!
//! A [`Target`] names one SPMD code generation target. The ISA fixes the
//! gang size (vector width), which is what distinguishes `uniform` from
//! `varying` low-level types. The (ISA, OS, architecture) tuple is also the
//! key under which precompiled builtin libraries are registered.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors produced while describing a target.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TargetError {
    #[error("unknown target ISA `{0}`")]
    UnknownIsa(String),

    #[error("unknown target OS `{0}`")]
    UnknownOs(String),

    #[error("unknown target architecture `{0}`")]
    UnknownArch(String),

    #[error("ISA `{isa}` cannot be compiled for architecture `{arch}`")]
    IsaArchMismatch { isa: TargetIsa, arch: Arch },
}

/// SPMD target instruction sets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum TargetIsa {
    #[serde(rename = "sse2-i32x4")]
    Sse2I32x4,
    #[serde(rename = "sse4.1-i32x4")]
    Sse41I32x4,
    #[serde(rename = "avx2-i32x8")]
    Avx2I32x8,
    #[serde(rename = "avx2-i32x16")]
    Avx2I32x16,
    #[serde(rename = "avx512skx-x16")]
    Avx512SkxX16,
    #[serde(rename = "neon-i32x4")]
    NeonI32x4,
}

impl TargetIsa {
    pub const ALL: [TargetIsa; 6] = [
        TargetIsa::Sse2I32x4,
        TargetIsa::Sse41I32x4,
        TargetIsa::Avx2I32x8,
        TargetIsa::Avx2I32x16,
        TargetIsa::Avx512SkxX16,
        TargetIsa::NeonI32x4,
    ];

    /// Canonical ISA string, as accepted on the command line.
    pub fn as_str(self) -> &'static str {
        match self {
            TargetIsa::Sse2I32x4 => "sse2-i32x4",
            TargetIsa::Sse41I32x4 => "sse4.1-i32x4",
            TargetIsa::Avx2I32x8 => "avx2-i32x8",
            TargetIsa::Avx2I32x16 => "avx2-i32x16",
            TargetIsa::Avx512SkxX16 => "avx512skx-x16",
            TargetIsa::NeonI32x4 => "neon-i32x4",
        }
    }

    /// Number of program instances in a gang.
    pub fn vector_width(self) -> u32 {
        match self {
            TargetIsa::Sse2I32x4 | TargetIsa::Sse41I32x4 | TargetIsa::NeonI32x4 => 4,
            TargetIsa::Avx2I32x8 => 8,
            TargetIsa::Avx2I32x16 | TargetIsa::Avx512SkxX16 => 16,
        }
    }

    /// Lane type of the execution mask.
    pub fn mask_repr(self) -> MaskRepr {
        match self {
            TargetIsa::Avx512SkxX16 => MaskRepr::I1,
            _ => MaskRepr::I32,
        }
    }

    pub fn supports(self, arch: Arch) -> bool {
        match self {
            TargetIsa::NeonI32x4 => matches!(arch, Arch::Arm | Arch::Aarch64),
            _ => matches!(arch, Arch::X86 | Arch::X86_64),
        }
    }

    /// Symbol suffix used to keep per-ISA copies of library functions apart
    /// when several targets are emitted into one object.
    ///
    /// Derived from the full ISA string, so distinct ISAs never share a
    /// suffix. Characters that are not valid in C identifiers become `_`.
    pub fn symbol_suffix(self) -> String {
        let mut suffix = String::with_capacity(self.as_str().len() + 1);
        suffix.push('_');
        suffix.extend(
            self.as_str()
                .chars()
                .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' }),
        );
        suffix
    }
}

impl fmt::Display for TargetIsa {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TargetIsa {
    type Err = TargetError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let needle = s.trim().to_ascii_lowercase();
        TargetIsa::ALL
            .into_iter()
            .find(|isa| isa.as_str() == needle)
            .ok_or_else(|| TargetError::UnknownIsa(s.to_string()))
    }
}

/// How the execution mask is represented in IR: `<W x i1>` on ISAs with
/// mask registers, `<W x i32>` everywhere else.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MaskRepr {
    I1,
    I32,
}

impl MaskRepr {
    pub fn lane_bits(self) -> u32 {
        match self {
            MaskRepr::I1 => 1,
            MaskRepr::I32 => 32,
        }
    }
}

/// Target operating systems.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TargetOs {
    Linux,
    Windows,
    Macos,
    Freebsd,
    Android,
}

impl TargetOs {
    pub fn as_str(self) -> &'static str {
        match self {
            TargetOs::Linux => "linux",
            TargetOs::Windows => "windows",
            TargetOs::Macos => "macos",
            TargetOs::Freebsd => "freebsd",
            TargetOs::Android => "android",
        }
    }
}

impl fmt::Display for TargetOs {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TargetOs {
    type Err = TargetError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "linux" => Ok(TargetOs::Linux),
            "windows" | "win" => Ok(TargetOs::Windows),
            "macos" | "darwin" => Ok(TargetOs::Macos),
            "freebsd" => Ok(TargetOs::Freebsd),
            "android" => Ok(TargetOs::Android),
            _ => Err(TargetError::UnknownOs(s.to_string())),
        }
    }
}

/// Target CPU architectures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Arch {
    #[serde(rename = "x86")]
    X86,
    #[serde(rename = "x86-64")]
    X86_64,
    #[serde(rename = "arm")]
    Arm,
    #[serde(rename = "aarch64")]
    Aarch64,
}

impl Arch {
    pub fn as_str(self) -> &'static str {
        match self {
            Arch::X86 => "x86",
            Arch::X86_64 => "x86-64",
            Arch::Arm => "arm",
            Arch::Aarch64 => "aarch64",
        }
    }

    /// Namespace of the architecture-specific LLVM intrinsics whose
    /// declarations are validated after linking.
    pub fn intrinsic_namespace(self) -> &'static str {
        match self {
            Arch::X86 | Arch::X86_64 => "llvm.x86.",
            Arch::Arm => "llvm.arm.",
            Arch::Aarch64 => "llvm.aarch64.",
        }
    }
}

impl fmt::Display for Arch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Arch {
    type Err = TargetError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "x86" | "i686" => Ok(Arch::X86),
            "x86-64" | "x86_64" | "amd64" => Ok(Arch::X86_64),
            "arm" | "armv7" => Ok(Arch::Arm),
            "aarch64" | "arm64" => Ok(Arch::Aarch64),
            _ => Err(TargetError::UnknownArch(s.to_string())),
        }
    }
}

/// One code generation target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Target {
    isa: TargetIsa,
    os: TargetOs,
    arch: Arch,
}

impl Target {
    /// Describe a target, rejecting ISA/architecture combinations that
    /// cannot exist.
    pub fn new(isa: TargetIsa, os: TargetOs, arch: Arch) -> Result<Self, TargetError> {
        if !isa.supports(arch) {
            return Err(TargetError::IsaArchMismatch { isa, arch });
        }
        Ok(Self { isa, os, arch })
    }

    pub fn isa(&self) -> TargetIsa {
        self.isa
    }

    pub fn os(&self) -> TargetOs {
        self.os
    }

    pub fn arch(&self) -> Arch {
        self.arch
    }

    pub fn vector_width(&self) -> u32 {
        self.isa.vector_width()
    }

    pub fn mask_repr(&self) -> MaskRepr {
        self.isa.mask_repr()
    }

    pub fn symbol_suffix(&self) -> String {
        self.isa.symbol_suffix()
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.isa, self.os, self.arch)
    }
}
