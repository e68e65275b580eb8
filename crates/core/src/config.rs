//! Configuration for the manycore execution engine.
//!
//! Mirrors the teacher's `config.rs`: a `defaults` module of baseline
//! constants, hierarchical `Deserialize` structs, and `#[serde(default =
//! "...")]` per field so partial JSON configs (from a host-side runtime)
//! still produce a complete `Config`.

use serde::Deserialize;

/// Default configuration constants.
mod defaults {
    /// Number of shires on the chip.
    pub const SHIRES: u8 = 4;
    /// Neighborhoods per shire.
    pub const NEIGHBORHOODS_PER_SHIRE: u8 = 4;
    /// Minions per neighborhood.
    pub const MINIONS_PER_NEIGHBORHOOD: u8 = 8;
    /// Number of PLIC interrupt sources.
    pub const PLIC_SOURCES: usize = 64;
    /// Number of PLIC interrupt targets (one M-mode + one S-mode context per hart is typical).
    pub const PLIC_TARGETS: usize = 8;
    /// Watchdog clock divider (ticks per decrement).
    pub const WATCHDOG_DIVIDER: u64 = 1;
    /// L1 sets per thread.
    pub const CACHE_SETS: usize = 64;
    /// L1 ways per set.
    pub const CACHE_WAYS: usize = 4;
    /// Default per-shire boot physical address.
    pub const BOOT_PC: u64 = 0x8000_0000;
    /// Maximum cycle budget for a run (0 = unbounded).
    pub const MAX_CYCLES: u64 = 0;
}

/// Root configuration structure.
///
/// # Examples
///
/// A partial JSON document fills in every omitted field from its
/// `#[serde(default = "...")]` (spec leaves integrator-supplied topology
/// sizing unconstrained beyond the documented defaults):
///
/// ```
/// use shirecore::config::Config;
///
/// let json = r#"{
///     "topology": { "shires": 2 },
///     "plic": {},
///     "syscon": { "watchdog_divider": 4 },
///     "dcache": {},
///     "warn": {},
///     "run": {}
/// }"#;
///
/// let config: Config = serde_json::from_str(json).unwrap();
/// assert_eq!(config.topology.shires, 2);
/// assert_eq!(config.topology.minions_per_neighborhood, 8);
/// assert_eq!(config.syscon.watchdog_divider, 4);
/// ```
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Chip topology.
    pub topology: TopologyConfig,
    /// PLIC sizing.
    pub plic: PlicConfig,
    /// System-controller / watchdog settings.
    pub syscon: SysConConfig,
    /// D-cache/SCP sizing.
    pub dcache: DCacheConfig,
    /// Per-category warning promotion.
    pub warn: WarnPromotion,
    /// Scheduler run limits.
    pub run: RunConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            topology: TopologyConfig::default(),
            plic: PlicConfig::default(),
            syscon: SysConConfig::default(),
            dcache: DCacheConfig::default(),
            warn: WarnPromotion::default(),
            run: RunConfig::default(),
        }
    }
}

/// Chip topology: shires, neighborhoods, minions.
#[derive(Debug, Clone, Deserialize)]
pub struct TopologyConfig {
    /// Number of shires.
    #[serde(default = "TopologyConfig::default_shires")]
    pub shires: u8,
    /// Neighborhoods per shire.
    #[serde(default = "TopologyConfig::default_neighborhoods")]
    pub neighborhoods_per_shire: u8,
    /// Minions per neighborhood.
    #[serde(default = "TopologyConfig::default_minions")]
    pub minions_per_neighborhood: u8,
    /// Per-shire boot physical address.
    #[serde(default = "TopologyConfig::default_boot_pc")]
    pub boot_pc: u64,
}

impl TopologyConfig {
    fn default_shires() -> u8 {
        defaults::SHIRES
    }
    fn default_neighborhoods() -> u8 {
        defaults::NEIGHBORHOODS_PER_SHIRE
    }
    fn default_minions() -> u8 {
        defaults::MINIONS_PER_NEIGHBORHOOD
    }
    fn default_boot_pc() -> u64 {
        defaults::BOOT_PC
    }
}

impl Default for TopologyConfig {
    fn default() -> Self {
        Self {
            shires: defaults::SHIRES,
            neighborhoods_per_shire: defaults::NEIGHBORHOODS_PER_SHIRE,
            minions_per_neighborhood: defaults::MINIONS_PER_NEIGHBORHOOD,
            boot_pc: defaults::BOOT_PC,
        }
    }
}

/// PLIC sizing: number of sources `S` and targets `T`.
#[derive(Debug, Clone, Deserialize)]
pub struct PlicConfig {
    /// Number of interrupt sources.
    #[serde(default = "PlicConfig::default_sources")]
    pub sources: usize,
    /// Number of interrupt targets.
    #[serde(default = "PlicConfig::default_targets")]
    pub targets: usize,
}

impl PlicConfig {
    fn default_sources() -> usize {
        defaults::PLIC_SOURCES
    }
    fn default_targets() -> usize {
        defaults::PLIC_TARGETS
    }
}

impl Default for PlicConfig {
    fn default() -> Self {
        Self {
            sources: defaults::PLIC_SOURCES,
            targets: defaults::PLIC_TARGETS,
        }
    }
}

/// System-controller / watchdog configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct SysConConfig {
    /// Watchdog clock divider (ticks consumed per internal decrement).
    #[serde(default = "SysConConfig::default_divider")]
    pub watchdog_divider: u64,
}

impl SysConConfig {
    fn default_divider() -> u64 {
        defaults::WATCHDOG_DIVIDER
    }
}

impl Default for SysConConfig {
    fn default() -> Self {
        Self {
            watchdog_divider: defaults::WATCHDOG_DIVIDER,
        }
    }
}

/// D-cache/SCP lock-table sizing (per thread).
#[derive(Debug, Clone, Deserialize)]
pub struct DCacheConfig {
    /// Number of sets.
    #[serde(default = "DCacheConfig::default_sets")]
    pub sets: usize,
    /// Number of ways per set.
    #[serde(default = "DCacheConfig::default_ways")]
    pub ways: usize,
}

impl DCacheConfig {
    fn default_sets() -> usize {
        defaults::CACHE_SETS
    }
    fn default_ways() -> usize {
        defaults::CACHE_WAYS
    }
}

impl Default for DCacheConfig {
    fn default() -> Self {
        Self {
            sets: defaults::CACHE_SETS,
            ways: defaults::CACHE_WAYS,
        }
    }
}

/// Per-category promotion of operator warnings to hard errors (spec §7).
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct WarnPromotion {
    /// Promote `memory` category warnings.
    #[serde(default)]
    pub memory: bool,
    /// Promote `tensors` category warnings.
    #[serde(default)]
    pub tensors: bool,
    /// Promote `trans` category warnings.
    #[serde(default)]
    pub trans: bool,
    /// Promote `esrs` category warnings.
    #[serde(default)]
    pub esrs: bool,
    /// Promote `cacheops` category warnings.
    #[serde(default)]
    pub cacheops: bool,
    /// Promote `debug` category warnings.
    #[serde(default)]
    pub debug: bool,
    /// Promote `other` category warnings.
    #[serde(default)]
    pub other: bool,
}

impl Default for WarnPromotion {
    /// With the `strict-warnings` feature, every category defaults to
    /// promoted; otherwise every category defaults to a routed warning.
    fn default() -> Self {
        let strict = cfg!(feature = "strict-warnings");
        Self {
            memory: strict,
            tensors: strict,
            trans: strict,
            esrs: strict,
            cacheops: strict,
            debug: strict,
            other: strict,
        }
    }
}

/// Run limits for the scheduler's cycle loop.
#[derive(Debug, Clone, Deserialize)]
pub struct RunConfig {
    /// Maximum number of cycles to run before terminating (0 = unbounded).
    #[serde(default = "RunConfig::default_max_cycles")]
    pub max_cycles: u64,
}

impl RunConfig {
    fn default_max_cycles() -> u64 {
        defaults::MAX_CYCLES
    }
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            max_cycles: defaults::MAX_CYCLES,
        }
    }
}
