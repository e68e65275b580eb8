//! Hart and agent identity.
//!
//! Every bus access and every debug-module selection decision is made in
//! terms of these identities: [`HartId`] decomposes into the shire /
//! neighborhood / minion / thread hierarchy from spec §3, and [`AgentId`]
//! widens that to include the non-hart bus masters (DM, watchdog) that the
//! memory fabric and ESR store must still attribute faults to.

/// Number of neighborhoods inside one shire.
pub const NEIGHBORHOODS_PER_SHIRE: u32 = 4;
/// Number of minions inside one neighborhood.
pub const MINIONS_PER_NEIGHBORHOOD: u32 = 8;
/// Number of hardware threads (HARTs) per minion.
pub const THREADS_PER_MINION: u32 = 2;
/// Number of harts selectable by one neighborhood's 16-bit selection mask.
pub const HARTS_PER_NEIGHBORHOOD: u32 = MINIONS_PER_NEIGHBORHOOD * THREADS_PER_MINION;

/// Identity of one hardware thread, decomposed per spec §3.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct HartId {
    /// Shire index.
    pub shire: u8,
    /// Neighborhood index within the shire (`0..NEIGHBORHOODS_PER_SHIRE`).
    pub neighborhood: u8,
    /// Minion index within the neighborhood (`0..MINIONS_PER_NEIGHBORHOOD`).
    pub minion: u8,
    /// Thread index within the minion (`0` or `1`).
    pub thread: u8,
}

impl HartId {
    /// Builds a hart identity from its four hierarchy fields.
    pub fn new(shire: u8, neighborhood: u8, minion: u8, thread: u8) -> Self {
        Self {
            shire,
            neighborhood,
            minion,
            thread,
        }
    }

    /// Returns this hart's bit position within its neighborhood's 16-bit
    /// selection mask (`hactrl[15:0] | hactrl[31:16]`, spec §3).
    pub fn neighborhood_bit(self) -> u32 {
        u32::from(self.minion) * THREADS_PER_MINION + u32::from(self.thread)
    }

    /// Returns a flat index unique within the whole chip, stable across
    /// resets; used as the scheduler's stable hart-list key.
    pub fn flat_index(self, neighborhoods_per_shire: u32, minions_per_neighborhood: u32) -> u64 {
        let per_shire = neighborhoods_per_shire * minions_per_neighborhood * THREADS_PER_MINION;
        let per_neighborhood = minions_per_neighborhood * THREADS_PER_MINION;
        u64::from(self.shire) * u64::from(per_shire)
            + u64::from(self.neighborhood) * u64::from(per_neighborhood)
            + u64::from(self.minion) * u64::from(THREADS_PER_MINION)
            + u64::from(self.thread)
    }
}

impl std::fmt::Display for HartId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "hart(shire={},nbhd={},minion={},thread={})",
            self.shire, self.neighborhood, self.minion, self.thread
        )
    }
}

/// Identity of the agent performing a bus or ESR access.
///
/// Every fault is reported with the originating agent so logs can attribute
/// failures (spec §4.A); the debug module and watchdog are named masters
/// rather than harts.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AgentId {
    /// A hardware thread.
    Hart(HartId),
    /// A non-hart bus master, identified by a short static name (e.g. `"dm"`, `"watchdog"`).
    Named(&'static str),
}

impl std::fmt::Display for AgentId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Hart(h) => write!(f, "{h}"),
            Self::Named(name) => write!(f, "{name}"),
        }
    }
}
