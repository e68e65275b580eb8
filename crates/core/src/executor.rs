//! The MMU surface the core consumes from the instruction executor (spec §4.H).
//!
//! Instruction decode and execution are out of scope (spec §1); the core
//! only needs one black-box operation — virtual-to-physical translation —
//! exposed as a trait so tests can supply a trivial identity mapping
//! without pulling in a real MMU. Grounded on the teacher's `Device`/`Bus`
//! seam style (`memory::Region`): a small trait at the boundary, not a
//! concrete dependency.

use crate::common::{AccessType, HartId, PhysAddr};
use crate::dcache::CacheOp;

/// Why a translation attempt failed (spec §4.H: "may raise a page fault or
/// an access fault").
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TranslationFault {
    /// No valid page-table mapping for this virtual address.
    PageFault,
    /// The mapping exists but does not permit this access.
    AccessFault,
}

/// The translation function the core consumes (spec §4.H).
///
/// Implemented by the surrounding runtime (MMU + page tables); the core
/// never constructs a translation itself.
pub trait Translator: Send + Sync {
    /// Translates `vaddr` for `hart`, for an access of `bytes` length and
    /// kind `access`. `cacheop` is `Some` when this translation was
    /// requested by a D-cache/SCP software cacheop (spec §4.E), so PMA
    /// checks specific to cacheops can be applied.
    fn translate(
        &mut self,
        hart: HartId,
        vaddr: u64,
        bytes: usize,
        access: AccessType,
        cacheop: Option<CacheOp>,
    ) -> Result<PhysAddr, TranslationFault>;
}

/// An identity-mapped translator for tests and bring-up configurations
/// with no MMU: `vaddr == paddr`, never faults.
#[derive(Debug, Clone, Copy, Default)]
pub struct IdentityTranslator;

impl Translator for IdentityTranslator {
    fn translate(
        &mut self,
        _hart: HartId,
        vaddr: u64,
        _bytes: usize,
        _access: AccessType,
        _cacheop: Option<CacheOp>,
    ) -> Result<PhysAddr, TranslationFault> {
        Ok(PhysAddr::new(vaddr))
    }
}

/// How a single hart-step resolved (spec §4.F's trap table, condensed to
/// what the scheduler needs to act on: it never inspects instruction
/// semantics itself).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StepOutcome {
    /// The instruction retired normally; the hart's PC is already advanced.
    Retired,
    /// `Debug_entry`: enter debug mode with the given cause.
    DebugEntry(crate::hart::HaltCause),
    /// `Trap`: jump to the trap vector at `vector_pc`. If this equals the
    /// faulting PC, the scheduler raises [`crate::common::CoreError::TrapRecursion`].
    Trap {
        /// The PC the trap vector redirected to.
        vector_pc: u64,
    },
    /// `instruction_restart`: re-issue the same PC next cycle.
    InstructionRestart,
    /// `memory_error` at fetch or execute: advance PC, raise a bus-error interrupt.
    MemoryError,
    /// Any other exception: fatal to the run.
    Fatal,
}

/// The black-box instruction executor the core consumes (spec §1, §4.F,
/// §4.H): decode/execute semantics are entirely its concern. It also
/// supplies the MMU translation surface, since spec §4.H describes
/// `translate` as something the core consumes "from the instruction
/// executor" rather than as an independent component.
pub trait InstructionExecutor: Translator {
    /// Executes one instruction at the hart's current PC, applying every
    /// observable state mutation (registers, CSRs, PC) internally and
    /// returning only the classification the scheduler needs (spec §4.F step 5).
    fn step(&mut self, hart: &mut crate::hart::Hart) -> StepOutcome;

    /// Executes one program-buffer instruction (spec §4.D): traps here
    /// become the *exception* sub-state instead of normal trap handling.
    fn step_progbuf(&mut self, hart: &mut crate::hart::Hart) -> StepOutcome;

    /// Advances the async tail of any in-flight long-latency operation on
    /// `hart`, clearing wait-reason bits as they complete. Runs every
    /// cycle regardless of the hart's halted/blocked status (spec §4.F step 1).
    fn tick_async_tail(&mut self, hart: &mut crate::hart::Hart);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identity_translator_passes_through() {
        let mut t = IdentityTranslator;
        let hart = HartId::new(0, 0, 0, 0);
        let p = t.translate(hart, 0x1000, 8, AccessType::Read, None).unwrap();
        assert_eq!(p.val(), 0x1000);
    }
}
