//! The ESR (External System Register) fabric (spec §4.B, §6).
//!
//! An ESR address decomposes into a region selector, a shire id, an
//! intra-region sub-selector, and a per-register offset; see
//! [`address`] for the concrete bit layout this crate uses. The five
//! regions below each own a fixed bank of named registers, tabulated in
//! [`register`] and implemented per bank in their own modules.

/// ESR address decode/encode.
pub mod address;
/// The memory-shire (DDRC/MS) register bank.
pub mod memory_shire;
/// Per-neighborhood register bank.
pub mod neighborhood;
/// Tabular register descriptors and the generic read/write engine.
pub mod register;
/// Per-shire cache-controller register banks (four per shire).
pub mod shire_cache;
/// Per-shire "other" register bank (config, FLB counters, power/clock).
pub mod shire_other;
/// Ties every bank together behind the [`crate::memory::Region`] contract.
pub mod store;

pub use address::EsrAddress;
pub use store::EsrStore;

/// Which ESR bank an address targets (spec §4.B region selector field).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum EsrRegion {
    /// Per-hart registers (message ports, program buffer).
    Hart,
    /// Per-neighborhood registers (boot address, hactrl/hastatus, texture).
    Neighborhood,
    /// Per-shire cache-controller bank registers.
    ShireCache,
    /// Per-shire "other" registers (config, FLB counters, power/clock).
    ShireOther,
    /// Memory-shire DDRC/MS registers.
    MemoryShire,
}

impl EsrRegion {
    /// This region's value in the address's region-selector field.
    pub const fn discriminant(self) -> u8 {
        match self {
            Self::Hart => 0,
            Self::Neighborhood => 1,
            Self::ShireCache => 2,
            Self::ShireOther => 3,
            Self::MemoryShire => 4,
        }
    }

    /// Recovers a region from its discriminant.
    ///
    /// # Errors
    /// Returns `Err(())` if `raw` does not name a known region.
    pub const fn from_discriminant(raw: u8) -> Result<Self, ()> {
        match raw {
            0 => Ok(Self::Hart),
            1 => Ok(Self::Neighborhood),
            2 => Ok(Self::ShireCache),
            3 => Ok(Self::ShireOther),
            4 => Ok(Self::MemoryShire),
            _ => Err(()),
        }
    }
}

/// Sentinel shire-id meaning "the issuing hart's own shire" (spec §4.B).
pub const SHIRE_LOCAL_SENTINEL: u8 = 0xFF;

/// Cache-controller banks per shire (spec §3).
pub const CACHE_BANKS_PER_SHIRE: usize = 4;
