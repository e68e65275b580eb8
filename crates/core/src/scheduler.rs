//! The cooperative hart scheduler (spec §4.F).
//!
//! Single-threaded dispatch over four ordered hart lists, the same "tick
//! drives every live component in order" shape as the teacher's
//! `Simulator::tick`, generalized from one CPU to many harts sharing one
//! cycle. Harts are addressed by [`HartId`] into the system's
//! `HashMap<HartId, Hart>` rather than owned here, so the scheduler holds
//! no cyclic references (spec §9).

use std::collections::HashMap;

use crate::common::{CoreError, HartId};
use crate::executor::{InstructionExecutor, StepOutcome};
use crate::hart::{ExecState, HaltCause, Hart, ProgbufState};

/// Injectable hook for an attached debugger (spec §4.F steps 2 and 5): a
/// single-step breakpoint set and a query for whether a hart should break
/// before its next instruction. No stored global pointer — constructed and
/// owned by whoever assembles the scheduler (spec §9).
pub trait DebugStub: Send + Sync {
    /// Whether `hart` should be armed and halted before executing its next
    /// instruction (e.g. a PC or mode trigger matched).
    fn should_break(&mut self, hart: &Hart) -> bool;
}

/// Injectable sink for bus-error interrupts raised by `memory_error` traps
/// (spec §4.F's trap table).
pub trait BusErrorSink: Send + Sync {
    /// Raises the bus-error interrupt line for `hart`.
    fn raise_bus_error(&mut self, hart: HartId);
}

/// One hart's declared single-step range: stepping halts once the new PC
/// falls outside `[start, end)` (spec §4.F "Single-step").
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct StepRange {
    /// Inclusive start of the permitted PC range.
    pub start: u64,
    /// Exclusive end of the permitted PC range.
    pub end: u64,
}

/// The four hart lists plus single-step bookkeeping (spec §4.F).
#[derive(Debug, Default)]
pub struct Scheduler {
    active: Vec<HartId>,
    awaking: Vec<HartId>,
    sleeping: Vec<HartId>,
    nonexistent: Vec<HartId>,
    single_step: HashMap<HartId, StepRange>,
}

impl Scheduler {
    /// Creates an empty scheduler; populate lists via [`Self::cold_reset`].
    pub fn new() -> Self {
        Self::default()
    }

    /// Places every hart in `harts` into `active` (if enabled) or
    /// `nonexistent` (if disabled by its shire's mask), clearing all other
    /// lists (spec §4.F "Cold reset").
    pub fn cold_reset(&mut self, harts: &HashMap<HartId, Hart>) {
        self.active.clear();
        self.awaking.clear();
        self.sleeping.clear();
        self.nonexistent.clear();
        let mut ids: Vec<HartId> = harts.keys().copied().collect();
        ids.sort();
        for id in ids {
            if harts[&id].state == ExecState::Nonexistent {
                self.nonexistent.push(id);
            } else {
                self.active.push(id);
            }
        }
    }

    /// Arms single-stepping for `hart` within `[range.start, range.end)`.
    pub fn arm_single_step(&mut self, hart: HartId, range: StepRange) {
        let _ = self.single_step.insert(hart, range);
    }

    /// Disarms single-stepping for `hart`.
    pub fn disarm_single_step(&mut self, hart: HartId) {
        let _ = self.single_step.remove(&hart);
    }

    /// Moves a hart from `sleeping`/`nonexistent` into `awaking`, to be
    /// merged into `active` at the top of the next cycle (e.g. after a DM
    /// resume or a newly enabled shire).
    pub fn wake(&mut self, hart: HartId) {
        self.sleeping.retain(|h| *h != hart);
        self.nonexistent.retain(|h| *h != hart);
        if !self.active.contains(&hart) && !self.awaking.contains(&hart) {
            self.awaking.push(hart);
        }
    }

    /// Moves a hart out of `active`/`awaking`/`sleeping` into `nonexistent`
    /// (e.g. a disable-mask write recomputing the active set, spec §4.B).
    pub fn retire(&mut self, hart: HartId) {
        self.active.retain(|h| *h != hart);
        self.awaking.retain(|h| *h != hart);
        self.sleeping.retain(|h| *h != hart);
        if !self.nonexistent.contains(&hart) {
            self.nonexistent.push(hart);
        }
    }

    /// Currently active harts, in dispatch order.
    pub fn active(&self) -> &[HartId] {
        &self.active
    }

    /// Whether the scheduler has no work left: no active harts and no
    /// sleeping harts that could ever wake (the caller determines the
    /// latter externally; this reports only the always-knowable half,
    /// spec §4.F "Cycle termination").
    pub fn out_of_active_work(&self) -> bool {
        self.active.is_empty() && self.awaking.is_empty()
    }

    /// Runs one emulated cycle: merges `awaking` into `active`, then steps
    /// every active hart through spec §4.F's five-step procedure.
    ///
    /// # Errors
    /// Returns [`CoreError::TrapRecursion`] if any hart's trap vector
    /// points back at the faulting PC, or a promoted-warning error from
    /// `warn` surfaced while handling a step outcome.
    pub fn run_cycle(
        &mut self,
        harts: &mut HashMap<HartId, Hart>,
        executor: &mut dyn InstructionExecutor,
        stub: Option<&mut dyn DebugStub>,
        bus_errors: &mut dyn BusErrorSink,
    ) -> Result<(), CoreError> {
        if !self.awaking.is_empty() {
            self.active.append(&mut self.awaking);
        }

        let mut stub = stub;
        let mut became_sleeping = Vec::new();

        for &id in &self.active {
            let Some(hart) = harts.get_mut(&id) else { continue };

            executor.tick_async_tail(hart);

            if let Some(stub) = stub.as_deref_mut() {
                if stub.should_break(hart) {
                    hart.force_halt(HaltCause::Step);
                    continue;
                }
            }

            if hart.state == ExecState::Blocked {
                continue;
            }

            if hart.state == ExecState::Halted {
                if hart.progbuf == ProgbufState::Fetching {
                    let outcome = executor.step_progbuf(hart);
                    match outcome {
                        StepOutcome::Retired => hart.progbuf = ProgbufState::Executed,
                        StepOutcome::InstructionRestart => {}
                        StepOutcome::Fatal
                        | StepOutcome::Trap { .. }
                        | StepOutcome::MemoryError
                        | StepOutcome::DebugEntry(_) => hart.progbuf = ProgbufState::Exception,
                    }
                }
                continue;
            }

            if hart.state != ExecState::Waiting {
                let source_pc = hart.pc;
                let outcome = executor.step(hart);
                match outcome {
                    StepOutcome::Retired => {
                        if let Some(range) = self.single_step.get(&id) {
                            if hart.pc < range.start || hart.pc >= range.end {
                                hart.force_halt(HaltCause::Step);
                            }
                        }
                    }
                    StepOutcome::DebugEntry(cause) => hart.force_halt(cause),
                    StepOutcome::Trap { vector_pc } => {
                        if vector_pc == source_pc {
                            return Err(CoreError::TrapRecursion(source_pc));
                        }
                        hart.pc = vector_pc;
                    }
                    StepOutcome::InstructionRestart => hart.pc = source_pc,
                    StepOutcome::MemoryError => {
                        hart.pc = source_pc.wrapping_add(4);
                        bus_errors.raise_bus_error(id);
                    }
                    StepOutcome::Fatal => return Err(CoreError::TrapRecursion(source_pc)),
                }
            }

            if hart.wait.is_waiting() {
                became_sleeping.push(id);
            }
        }

        if !became_sleeping.is_empty() {
            self.active.retain(|h| !became_sleeping.contains(h));
            self.sleeping.extend(became_sleeping);
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::{AccessType, PhysAddr};
    use crate::dcache::CacheOp;
    use crate::executor::{Translator, TranslationFault};

    struct NoopStub;
    impl DebugStub for NoopStub {
        fn should_break(&mut self, _hart: &Hart) -> bool {
            false
        }
    }

    struct NoopBusErrors;
    impl BusErrorSink for NoopBusErrors {
        fn raise_bus_error(&mut self, _hart: HartId) {}
    }

    struct RetiringExecutor;
    impl Translator for RetiringExecutor {
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
    impl InstructionExecutor for RetiringExecutor {
        fn step(&mut self, hart: &mut Hart) -> StepOutcome {
            hart.pc += 4;
            StepOutcome::Retired
        }
        fn step_progbuf(&mut self, hart: &mut Hart) -> StepOutcome {
            hart.pc += 4;
            StepOutcome::Retired
        }
        fn tick_async_tail(&mut self, _hart: &mut Hart) {}
    }

    fn harts_with(id: HartId) -> HashMap<HartId, Hart> {
        let mut h = Hart::new(id);
        h.cold_reset(0x8000_0000, true);
        let mut map = HashMap::new();
        let _ = map.insert(id, h);
        map
    }

    #[test]
    fn cold_reset_populates_active_from_enabled_harts() {
        let id = HartId::new(0, 0, 0, 0);
        let harts = harts_with(id);
        let mut sched = Scheduler::new();
        sched.cold_reset(&harts);
        assert_eq!(sched.active(), &[id]);
    }

    #[test]
    fn run_cycle_advances_pc() {
        let id = HartId::new(0, 0, 0, 0);
        let mut harts = harts_with(id);
        let mut sched = Scheduler::new();
        sched.cold_reset(&harts);
        let mut exec = RetiringExecutor;
        let mut stub = NoopStub;
        let mut bus = NoopBusErrors;
        sched.run_cycle(&mut harts, &mut exec, Some(&mut stub), &mut bus).unwrap();
        assert_eq!(harts[&id].pc, 0x8000_0004);
    }

    #[test]
    fn trap_recursion_is_fatal() {
        struct RecursingExecutor;
        impl Translator for RecursingExecutor {
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
        impl InstructionExecutor for RecursingExecutor {
            fn step(&mut self, hart: &mut Hart) -> StepOutcome {
                StepOutcome::Trap { vector_pc: hart.pc }
            }
            fn step_progbuf(&mut self, hart: &mut Hart) -> StepOutcome {
                StepOutcome::Trap { vector_pc: hart.pc }
            }
            fn tick_async_tail(&mut self, _hart: &mut Hart) {}
        }

        let id = HartId::new(0, 0, 0, 0);
        let mut harts = harts_with(id);
        let mut sched = Scheduler::new();
        sched.cold_reset(&harts);
        let mut exec = RecursingExecutor;
        let mut stub = NoopStub;
        let mut bus = NoopBusErrors;
        let err = sched.run_cycle(&mut harts, &mut exec, Some(&mut stub), &mut bus).unwrap_err();
        assert!(matches!(err, CoreError::TrapRecursion(_)));
    }

    #[test]
    fn retire_moves_active_hart_to_nonexistent() {
        let id = HartId::new(0, 0, 0, 0);
        let harts = harts_with(id);
        let mut sched = Scheduler::new();
        sched.cold_reset(&harts);
        sched.retire(id);
        assert!(sched.active().is_empty());
        assert!(sched.nonexistent.contains(&id));
    }

    #[test]
    fn wake_after_retire_reactivates_hart() {
        let id = HartId::new(0, 0, 0, 0);
        let harts = harts_with(id);
        let mut sched = Scheduler::new();
        sched.cold_reset(&harts);
        sched.retire(id);
        sched.wake(id);
        assert!(sched.awaking.contains(&id));
    }

    #[test]
    fn waiting_hart_moves_to_sleeping() {
        let id = HartId::new(0, 0, 0, 0);
        let mut harts = harts_with(id);
        harts.get_mut(&id).unwrap().begin_wait(crate::common::WaitReason::TENSOR_LOAD);
        let mut sched = Scheduler::new();
        sched.active = vec![id];
        let mut exec = RetiringExecutor;
        let mut stub = NoopStub;
        let mut bus = NoopBusErrors;
        sched.run_cycle(&mut harts, &mut exec, Some(&mut stub), &mut bus).unwrap();
        assert!(sched.active.is_empty());
        assert!(sched.sleeping.contains(&id));
    }
}
