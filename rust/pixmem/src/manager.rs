use std::sync::OnceLock;

use pixmem_budget::Budget;
use pixmem_common::Result;

use crate::{
    config::{MemoryConfig, ResourceLimits, memory_config},
    handlers::{MemoryHandlers, get_memory_handlers},
};

/// An allocation context: a handler set plus the tuning that governs aligned and
/// virtual memory requests.
///
/// A manager is immutable once built and is shared by reference; every
/// operation is safe to call concurrently on distinct blocks. The allocation
/// entry points live in the `quantum`, `aligned` and `virtual_memory` modules.
pub struct MemoryManager {
    pub(crate) handlers: MemoryHandlers,
    pub(crate) config: MemoryConfig,
    pub(crate) budgets: ResourceBudgets,
}

/// Live budgets built from [`ResourceLimits`].
#[derive(Debug, Clone)]
pub struct ResourceBudgets {
    pub heap: Budget,
    pub map: Budget,
    pub disk: Budget,
}

impl ResourceBudgets {
    fn from_limits(limits: &ResourceLimits) -> ResourceBudgets {
        let budget = |limit: Option<u64>| limit.map_or_else(Budget::unlimited, Budget::new);
        ResourceBudgets {
            heap: budget(limits.heap),
            map: budget(limits.map),
            disk: budget(limits.disk),
        }
    }
}

impl MemoryManager {
    /// Creates a manager over `handlers` with the given configuration.
    ///
    /// # Errors
    ///
    /// Returns `InvalidArgument` if `config` fails validation.
    pub fn new(handlers: MemoryHandlers, config: MemoryConfig) -> Result<MemoryManager> {
        config.validate()?;
        Ok(Self::from_parts(handlers, config))
    }

    /// Creates a manager over the system heap.
    pub fn with_config(config: MemoryConfig) -> Result<MemoryManager> {
        Self::new(MemoryHandlers::system(), config)
    }

    fn from_parts(handlers: MemoryHandlers, config: MemoryConfig) -> MemoryManager {
        let budgets = ResourceBudgets::from_limits(&config.limits);
        MemoryManager {
            handlers,
            config,
            budgets,
        }
    }

    /// The process-wide manager, built on first use from the registered
    /// handlers and configuration.
    ///
    /// Building it freezes both registries.
    pub fn global() -> &'static MemoryManager {
        static GLOBAL: OnceLock<MemoryManager> = OnceLock::new();
        GLOBAL.get_or_init(|| {
            let manager = Self::from_parts(get_memory_handlers(), memory_config().clone());
            log::debug!(
                "memory manager initialized: alignment={}, heap_threshold={}",
                manager.config.alignment,
                manager.config.heap_threshold
            );
            manager
        })
    }

    pub fn handlers(&self) -> &MemoryHandlers {
        &self.handlers
    }

    pub fn config(&self) -> &MemoryConfig {
        &self.config
    }

    /// Budgets charged by live virtual memory handles.
    pub fn budgets(&self) -> &ResourceBudgets {
        &self.budgets
    }

    /// The alignment guaranteed by [`acquire_aligned`](Self::acquire_aligned).
    pub fn alignment(&self) -> usize {
        self.config.alignment
    }
}

impl Default for MemoryManager {
    fn default() -> Self {
        Self::from_parts(MemoryHandlers::system(), MemoryConfig::default())
    }
}

impl std::fmt::Debug for MemoryManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryManager")
            .field("handlers", &self.handlers)
            .field("config", &self.config)
            .field("budgets", &self.budgets)
            .finish()
    }
}
