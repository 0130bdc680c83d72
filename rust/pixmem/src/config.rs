//! Tuning parameters for the aligned and virtual memory allocators.

use std::{ffi::OsString, path::PathBuf, sync::OnceLock};

use pixmem_common::{Result, error::Error, verify_arg};

/// Default alignment of [`acquire_aligned`](crate::MemoryManager::acquire_aligned)
/// blocks: one cache line on mainstream x86_64 and aarch64 parts.
pub const DEFAULT_ALIGNMENT: usize = 64;

/// Smallest accepted alignment. Keeps the block header naturally aligned.
pub const MIN_ALIGNMENT: usize = 16;

/// Largest accepted alignment (1 MiB).
pub const MAX_ALIGNMENT: usize = 1 << 20;

/// Default upper bound for virtual memory requests served from the heap.
pub const DEFAULT_HEAP_THRESHOLD: usize = 16 * 1024 * 1024;

pub const ENV_MAX_MEMORY_REQUEST: &str = "PIXMEM_MAX_MEMORY_REQUEST";
pub const ENV_HEAP_THRESHOLD: &str = "PIXMEM_HEAP_THRESHOLD";
pub const ENV_MEMORY_MAP: &str = "PIXMEM_MEMORY_MAP";
pub const ENV_TEMPORARY_PATH: &str = "PIXMEM_TEMPORARY_PATH";

const ENV_VARIABLES: [&str; 4] = [
    ENV_MAX_MEMORY_REQUEST,
    ENV_HEAP_THRESHOLD,
    ENV_MEMORY_MAP,
    ENV_TEMPORARY_PATH,
];

/// Which strategy a virtual memory request tries first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MemoryMapPolicy {
    /// Small requests come from the heap; larger ones are mapped.
    #[default]
    Heap,
    /// Every request starts with an anonymous mapping.
    Anonymous,
}

/// Byte budgets for memory held by virtual memory handles. `None` means unlimited.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResourceLimits {
    /// Heap-backed handles.
    pub heap: Option<u64>,
    /// Anonymous mappings.
    pub map: Option<u64>,
    /// Scratch files behind file-backed mappings.
    pub disk: Option<u64>,
}

/// Configuration for a [`MemoryManager`](crate::MemoryManager).
#[derive(Debug, Clone)]
pub struct MemoryConfig {
    /// Alignment of aligned blocks. Power of two in `MIN_ALIGNMENT..=MAX_ALIGNMENT`.
    pub alignment: usize,
    /// Largest virtual memory request served from the heap.
    pub heap_threshold: usize,
    /// Requests above this size skip the heap and anonymous mappings.
    pub max_memory_request: Option<usize>,
    /// Order in which virtual memory strategies are tried.
    pub memory_map: MemoryMapPolicy,
    /// Whether anonymous mappings may be used.
    pub anonymous_map: bool,
    /// Whether file-backed mappings over scratch files may be used.
    pub file_map: bool,
    /// Directory for scratch files; the system temporary directory when `None`.
    pub temporary_path: Option<PathBuf>,
    /// Whether a plain heap block is tried after every mapping strategy failed.
    pub unaligned_heap_fallback: bool,
    pub limits: ResourceLimits,
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            alignment: DEFAULT_ALIGNMENT,
            heap_threshold: DEFAULT_HEAP_THRESHOLD,
            max_memory_request: None,
            memory_map: MemoryMapPolicy::Heap,
            anonymous_map: true,
            file_map: true,
            temporary_path: None,
            unaligned_heap_fallback: true,
            limits: ResourceLimits::default(),
        }
    }
}

impl MemoryConfig {
    /// Validates the configuration and returns an error if invalid.
    pub fn validate(&self) -> Result<()> {
        verify_arg!(alignment, self.alignment.is_power_of_two());
        verify_arg!(alignment, self.alignment >= MIN_ALIGNMENT);
        verify_arg!(alignment, self.alignment <= MAX_ALIGNMENT);
        if let Some(path) = self.temporary_path.as_ref() {
            verify_arg!(temporary_path, !path.as_os_str().is_empty());
        }
        Ok(())
    }

    /// The default configuration with overrides taken from the `PIXMEM_*`
    /// environment variables.
    pub fn from_env() -> Result<MemoryConfig> {
        MemoryConfig::default().with_overrides(|name| std::env::var_os(name))
    }

    /// Applies `PIXMEM_*` overrides obtained through `lookup`, then validates.
    ///
    /// Sizes accept an optional binary suffix (`KiB`, `MiB`, `GiB`, also `K`,
    /// `KB`, ...). `PIXMEM_MEMORY_MAP` accepts `heap` or `anonymous`.
    pub fn with_overrides<F>(mut self, lookup: F) -> Result<MemoryConfig>
    where
        F: Fn(&str) -> Option<OsString>,
    {
        for name in ENV_VARIABLES {
            if let Some(value) = lookup(name) {
                self.apply_override(name, value)?;
            }
        }
        self.validate()?;
        Ok(self)
    }

    /// Like [`with_overrides`](Self::with_overrides), but an invalid variable
    /// is logged and skipped while the valid ones still apply.
    pub fn with_lenient_overrides<F>(mut self, lookup: F) -> MemoryConfig
    where
        F: Fn(&str) -> Option<OsString>,
    {
        for name in ENV_VARIABLES {
            if let Some(value) = lookup(name) {
                if let Err(e) = self.apply_override(name, value) {
                    log::warn!("ignoring {name}: {e}");
                }
            }
        }
        self
    }

    fn apply_override(&mut self, name: &str, value: OsString) -> Result<()> {
        if name == ENV_TEMPORARY_PATH {
            if !value.is_empty() {
                self.temporary_path = Some(PathBuf::from(value));
            }
            return Ok(());
        }
        let value = value
            .into_string()
            .map_err(|_| Error::invalid_arg(name, "value is not valid UTF-8"))?;
        match name {
            ENV_MAX_MEMORY_REQUEST => self.max_memory_request = Some(parse_size(name, &value)?),
            ENV_HEAP_THRESHOLD => self.heap_threshold = parse_size(name, &value)?,
            ENV_MEMORY_MAP => {
                self.memory_map = match value.trim().to_ascii_lowercase().as_str() {
                    "heap" => MemoryMapPolicy::Heap,
                    "anonymous" => MemoryMapPolicy::Anonymous,
                    _ => {
                        return Err(Error::invalid_arg(
                            name,
                            format!("expected 'heap' or 'anonymous', got '{value}'"),
                        ));
                    }
                }
            }
            _ => return Err(Error::invalid_arg(name, "unknown memory setting")),
        }
        Ok(())
    }
}

/// Parses a byte count such as `4096`, `64KiB` or `2g`.
pub fn parse_size(name: &str, value: &str) -> Result<usize> {
    let value = value.trim();
    let split = value
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(value.len());
    let (digits, suffix) = value.split_at(split);
    let number: usize = digits
        .parse()
        .map_err(|_| Error::invalid_arg(name, format!("'{value}' is not a size")))?;
    let shift = match suffix.trim().to_ascii_lowercase().as_str() {
        "" | "b" => 0,
        "k" | "kb" | "kib" => 10,
        "m" | "mb" | "mib" => 20,
        "g" | "gb" | "gib" => 30,
        "t" | "tb" | "tib" => 40,
        _ => {
            return Err(Error::invalid_arg(
                name,
                format!("unknown size suffix in '{value}'"),
            ));
        }
    };
    1usize
        .checked_shl(shift)
        .and_then(|unit| number.checked_mul(unit))
        .ok_or_else(|| Error::invalid_arg(name, format!("'{value}' overflows usize")))
}

static CONFIG: OnceLock<MemoryConfig> = OnceLock::new();

/// Installs the configuration used by the process-wide manager.
///
/// Same startup-only contract as
/// [`set_memory_handlers`](crate::handlers::set_memory_handlers).
///
/// # Errors
///
/// Returns `InvalidArgument` if `config` fails validation and
/// `InvalidOperation` if a configuration is already in effect.
pub fn set_memory_config(config: MemoryConfig) -> Result<()> {
    config.validate()?;
    CONFIG.set(config).map_err(|_| {
        log::warn!("memory configuration registered after first use; keeping the active one");
        Error::invalid_operation("set_memory_config: memory configuration is already in use")
    })
}

/// Returns the process-wide configuration, reading the environment on first use.
///
/// Each invalid environment override is logged and ignored on its own; the
/// valid ones still take effect.
pub fn memory_config() -> &'static MemoryConfig {
    CONFIG.get_or_init(|| {
        MemoryConfig::default().with_lenient_overrides(|name| std::env::var_os(name))
    })
}
