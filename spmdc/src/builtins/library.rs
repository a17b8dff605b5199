//! Precompiled builtin libraries and the registry that serves them.
//!
//! Every target links up to four precompiled libraries, each identified by
//! a [`LibraryRole`] and the parts of the target that matter for that role.
//! The registry loads a library image the first time any thread asks for
//! it and hands every caller the same immutable image afterwards.
//!
//! LLVM modules belong to a context that is confined to one thread, so the
//! shared artifact is the image bytes. Each link materializes its own
//! module from the image in the caller's context.

use std::collections::HashMap;
use std::fmt;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use inkwell::context::Context;
use inkwell::memory_buffer::MemoryBuffer;
use inkwell::module::Module;
use once_cell::sync::OnceCell;
use parking_lot::RwLock;
use tracing::debug;

use super::error::LinkError;
use crate::target::{Arch, Target, TargetIsa, TargetOs};

/// What a library provides.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum LibraryRole {
    /// The portable standard library, written in SPMD source.
    Stdlib,
    /// Portable builtins written in C (printing, task runtime glue).
    CommonBuiltins,
    /// ISA-specific builtins.
    TargetBuiltins,
    /// Dispatch stubs selecting among per-ISA variants at run time.
    Dispatch,
}

impl LibraryRole {
    pub fn as_str(self) -> &'static str {
        match self {
            LibraryRole::Stdlib => "stdlib",
            LibraryRole::CommonBuiltins => "common-builtins",
            LibraryRole::TargetBuiltins => "target-builtins",
            LibraryRole::Dispatch => "dispatch",
        }
    }
}

impl fmt::Display for LibraryRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Registry key of a library.
///
/// Dispatch stubs depend only on the OS, common builtins on the OS and
/// architecture, and the rest on the full target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct LibraryKey {
    pub role: LibraryRole,
    pub isa: Option<TargetIsa>,
    pub os: TargetOs,
    pub arch: Option<Arch>,
}

impl LibraryKey {
    /// The key under which `role`'s library for `target` is registered.
    pub fn for_target(role: LibraryRole, target: &Target) -> Self {
        match role {
            LibraryRole::Dispatch => Self::dispatch(target.os()),
            LibraryRole::CommonBuiltins => Self {
                role,
                isa: None,
                os: target.os(),
                arch: Some(target.arch()),
            },
            LibraryRole::Stdlib | LibraryRole::TargetBuiltins => Self {
                role,
                isa: Some(target.isa()),
                os: target.os(),
                arch: Some(target.arch()),
            },
        }
    }

    pub fn dispatch(os: TargetOs) -> Self {
        Self {
            role: LibraryRole::Dispatch,
            isa: None,
            os,
            arch: None,
        }
    }

    /// Identifier-like name, used for module names and messages.
    pub fn library_name(&self) -> String {
        let mut name = self.role.as_str().to_string();
        if let Some(isa) = self.isa {
            name.push('-');
            name.push_str(isa.as_str());
        }
        name.push('-');
        name.push_str(self.os.as_str());
        if let Some(arch) = self.arch {
            name.push('-');
            name.push_str(arch.as_str());
        }
        name
    }
}

impl fmt::Display for LibraryKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (", self.role)?;
        if let Some(isa) = self.isa {
            write!(f, "isa {}, ", isa)?;
        }
        write!(f, "os {}", self.os)?;
        if let Some(arch) = self.arch {
            write!(f, ", arch {}", arch)?;
        }
        f.write_str(")")
    }
}

/// Where a registered library's image comes from.
#[derive(Debug, Clone)]
pub enum LibrarySource {
    Memory(Arc<[u8]>),
    File(PathBuf),
}

/// Encoding of a library image.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LibraryFormat {
    Bitcode,
    Text,
}

impl LibraryFormat {
    const RAW_MAGIC: [u8; 4] = [b'B', b'C', 0xC0, 0xDE];
    const WRAPPER_MAGIC: [u8; 4] = [0xDE, 0xC0, 0x17, 0x0B];

    pub fn detect(image: &[u8]) -> Self {
        match image.get(..4) {
            Some(magic) if magic == Self::RAW_MAGIC || magic == Self::WRAPPER_MAGIC => {
                LibraryFormat::Bitcode
            }
            _ => LibraryFormat::Text,
        }
    }
}

/// A loaded library image. Immutable and shared between threads.
#[derive(Debug)]
pub struct BitcodeLib {
    key: LibraryKey,
    name: String,
    format: LibraryFormat,
    image: Arc<[u8]>,
}

impl BitcodeLib {
    pub fn new(key: LibraryKey, image: Arc<[u8]>) -> Self {
        Self {
            key,
            name: key.library_name(),
            format: LibraryFormat::detect(&image),
            image,
        }
    }

    pub fn key(&self) -> LibraryKey {
        self.key
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn format(&self) -> LibraryFormat {
        self.format
    }

    pub fn image_len(&self) -> usize {
        self.image.len()
    }

    /// Parse a fresh copy of the library into `context`.
    pub fn load<'ctx>(&self, context: &'ctx Context) -> Result<Module<'ctx>, LinkError> {
        let buffer = MemoryBuffer::create_from_memory_range_copy(&self.image, &self.name);
        let module = match self.format {
            LibraryFormat::Bitcode => Module::parse_bitcode_from_buffer(&buffer, context),
            LibraryFormat::Text => context.create_module_from_ir(buffer),
        };
        module.map_err(|err| LinkError::MalformedLibrary {
            library: self.name.clone(),
            message: err.to_string(),
        })
    }
}

#[derive(Debug)]
struct LibrarySlot {
    source: LibrarySource,
    loaded: OnceCell<Arc<BitcodeLib>>,
}

/// Resolves library keys to loaded libraries.
///
/// Thread-safe. The first `resolve` of a key loads the image; concurrent
/// first calls for the same key wait for that single load and all callers
/// receive the same [`BitcodeLib`].
#[derive(Debug, Default)]
pub struct LibraryRegistry {
    slots: RwLock<HashMap<LibraryKey, Arc<LibrarySlot>>>,
    loads: AtomicUsize,
}

impl LibraryRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register (or replace) the library for `key`. Replacing drops the
    /// previously loaded image for later callers.
    pub fn register(&self, key: LibraryKey, source: LibrarySource) {
        let slot = Arc::new(LibrarySlot {
            source,
            loaded: OnceCell::new(),
        });
        self.slots.write().insert(key, slot);
    }

    pub fn register_image(&self, key: LibraryKey, image: impl Into<Arc<[u8]>>) {
        self.register(key, LibrarySource::Memory(image.into()));
    }

    /// Register a library given as textual LLVM IR.
    pub fn register_ir(&self, key: LibraryKey, ir: &str) {
        self.register_image(key, ir.as_bytes());
    }

    pub fn register_file(&self, key: LibraryKey, path: impl Into<PathBuf>) {
        self.register(key, LibrarySource::File(path.into()));
    }

    pub fn contains(&self, key: &LibraryKey) -> bool {
        self.slots.read().contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.slots.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.read().is_empty()
    }

    /// Number of images actually loaded so far.
    pub fn load_count(&self) -> usize {
        self.loads.load(Ordering::Relaxed)
    }

    /// Look up `key`, loading its image on first use.
    pub fn resolve(&self, key: LibraryKey) -> Result<Arc<BitcodeLib>, LinkError> {
        let slot = self
            .slots
            .read()
            .get(&key)
            .cloned()
            .ok_or(LinkError::MissingLibrary { key })?;

        let lib = slot.loaded.get_or_try_init(|| self.load(key, &slot.source))?;
        Ok(Arc::clone(lib))
    }

    fn load(&self, key: LibraryKey, source: &LibrarySource) -> Result<Arc<BitcodeLib>, LinkError> {
        let image: Arc<[u8]> = match source {
            LibrarySource::Memory(bytes) => Arc::clone(bytes),
            LibrarySource::File(path) => std::fs::read(path)
                .map_err(|source| LinkError::LibraryIo {
                    library: key.library_name(),
                    path: path.clone(),
                    source,
                })?
                .into(),
        };
        self.loads.fetch_add(1, Ordering::Relaxed);

        let lib = BitcodeLib::new(key, image);
        debug!(
            library = %lib.name(),
            bytes = lib.image_len(),
            format = ?lib.format(),
            "loaded builtin library"
        );
        Ok(Arc::new(lib))
    }
}
