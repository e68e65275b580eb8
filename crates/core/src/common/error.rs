//! Error and trap taxonomy.
//!
//! This module realizes the taxonomy of spec §7 in Rust types:
//! 1. **`MemoryFault`** — region/ESR/PLIC-level access violations (wrong
//!    address, wrong size, wrong alignment, read-only violation, unknown
//!    register). These are reported to the instruction executor as a
//!    load/store/instruction access fault; they never panic the core.
//! 2. **`Trap`** — the RISC-V cause the instruction executor is expected to
//!    raise given a `MemoryFault` and the access kind that triggered it.
//!    The core does not itself implement traps (decode/execute is out of
//!    scope, §1); this type is the seam the executor's black box consumes.
//! 3. **`CoreError`** — the small set of conditions fatal to the whole
//!    simulation run (§7's `Fatal` category).

use thiserror::Error;

use super::addr::PhysAddr;
use super::data::AccessType;

/// An access-level fault raised by a memory region, the ESR store, or the PLIC.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Error)]
pub enum MemoryFault {
    /// No region claims this address.
    #[error("unmapped address {0}")]
    UnmappedAddress(PhysAddr),
    /// The access size is not one this region accepts at this address.
    #[error("wrong access size {size} bytes at {addr}")]
    WrongSize {
        /// Offending address.
        addr: PhysAddr,
        /// Attempted size in bytes.
        size: usize,
    },
    /// The address is not aligned to the region's required granularity.
    #[error("unaligned access at {0}")]
    Unaligned(PhysAddr),
    /// A write targeted a read-only register or region.
    #[error("read-only violation at {0}")]
    ReadOnlyViolation(PhysAddr),
    /// The sub-address does not name a defined register.
    #[error("unknown register at {0}")]
    UnknownRegister(PhysAddr),
    /// A non-hart agent attempted a hart-only operation (e.g. local-shire ESR access).
    #[error("privilege violation at {0}")]
    PrivilegeViolation(PhysAddr),
    /// A physical-memory-attribute check rejected the access.
    #[error("PMA violation at {0}")]
    PmaViolation(PhysAddr),
}

impl MemoryFault {
    /// Converts this fault into the RISC-V trap the instruction executor
    /// raises, given the kind of access that triggered it (spec §7).
    pub fn into_trap(self, access: AccessType) -> Trap {
        let addr = match self {
            Self::UnmappedAddress(a)
            | Self::WrongSize { addr: a, .. }
            | Self::Unaligned(a)
            | Self::ReadOnlyViolation(a)
            | Self::UnknownRegister(a)
            | Self::PrivilegeViolation(a)
            | Self::PmaViolation(a) => a,
        };
        match access {
            AccessType::Fetch => Trap::InstructionAccessFault(addr.val()),
            AccessType::Read => Trap::LoadAccessFault(addr.val()),
            AccessType::Write => Trap::StoreAccessFault(addr.val()),
        }
    }
}

/// RISC-V traps the instruction executor's black box is expected to raise.
///
/// The core never dispatches these itself — it only produces the value, as
/// documented in spec §4.H ("the core consumes ... a translation function").
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Trap {
    /// Instruction access fault (cause 1); faulting virtual/physical address.
    InstructionAccessFault(u64),
    /// Load access fault (cause 5); faulting address.
    LoadAccessFault(u64),
    /// Store/AMO access fault (cause 7); faulting address.
    StoreAccessFault(u64),
    /// Bus-error interrupt: a fetch failed; PC should advance past it and
    /// the bus-error interrupt line should be raised (spec §7).
    BusErrorInterrupt(u64),
}

impl Trap {
    /// Returns the RISC-V standard cause code for this trap, where one exists.
    pub fn cause(self) -> u64 {
        match self {
            Self::InstructionAccessFault(_) => 1,
            Self::LoadAccessFault(_) => 5,
            Self::StoreAccessFault(_) => 7,
            Self::BusErrorInterrupt(_) => 1 << 63 | 11,
        }
    }
}

impl std::fmt::Display for Trap {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InstructionAccessFault(a) => write!(f, "InstructionAccessFault({a:#x})"),
            Self::LoadAccessFault(a) => write!(f, "LoadAccessFault({a:#x})"),
            Self::StoreAccessFault(a) => write!(f, "StoreAccessFault({a:#x})"),
            Self::BusErrorInterrupt(a) => write!(f, "BusErrorInterrupt({a:#x})"),
        }
    }
}

/// Conditions fatal to the whole simulation run (spec §7's `Fatal` category).
#[derive(Debug, Error)]
pub enum CoreError {
    /// A hart's trap vector pointed back at the faulting PC (trap recursion).
    #[error("fatal trap recursion at pc {0:#018x}")]
    TrapRecursion(u64),
    /// An exception category was promoted to hard error by configuration.
    #[error("{category} warning promoted to hard error: {message}")]
    Promoted {
        /// The warning category (`memory`, `tensors`, `trans`, `esrs`, `cacheops`, `debug`, `other`).
        category: &'static str,
        /// Human-readable detail.
        message: String,
    },
    /// A region was configured with overlapping address ranges.
    #[error("overlapping memory regions: {0}")]
    OverlappingRegions(String),
}
