//! Hart state (spec §3, §9: "sum types for hart state").
//!
//! The combined `state × wait-reason-set × progbuf-sub-state` forms a
//! finite product; this module represents it as one tagged record with a
//! bitset for wait reasons, the way the teacher represents privilege mode
//! as a small enum with explicit numeric conversions.

use crate::common::{HartId, WaitReason};

/// A hart's top-level execution state (spec §3).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ExecState {
    /// Not yet brought up by a cold reset, or disabled by a shire mask.
    Nonexistent,
    /// Halted by the debug module.
    Halted,
    /// Normal fetch/execute/retire dispatch.
    Running,
    /// Suspended on a non-empty wait-reason set.
    Waiting,
    /// Blocked behind another hart's exclusive region on the same core.
    Blocked,
    /// Selected by the debug module but neither halted nor running.
    Unavailable,
}

/// Why a hart most recently entered debug mode (`haltreq`, single-step, `ebreak`, reset).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum HaltCause {
    /// Forced halt via `dmctrl.haltreq`.
    HaltRequest,
    /// Halted by a single-step boundary.
    Step,
    /// Halted by an `ebreak` instruction.
    Ebreak,
    /// Halted immediately after a cold/warm reset with resethalt armed.
    ResetHalt,
}

/// The debug-module program-buffer sub-state (spec §4.D).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum ProgbufState {
    /// Not executing from the program buffer.
    #[default]
    Idle,
    /// Currently fetching/executing a program-buffer instruction.
    Fetching,
    /// The last program-buffer instruction retired successfully.
    Executed,
    /// A debug-program-buffer exception; the debugger is expected to poll.
    Error,
    /// An exception transitioned the hart out of normal trap handling (spec §7).
    Exception,
}

/// Per-hart debug-aggregate flags: halted / running / resumeack / havereset
/// (the four lanes `hastatus0` packs per neighborhood, spec §3).
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct DebugFlags {
    /// Set while halted.
    pub halted: bool,
    /// Set while running.
    pub running: bool,
    /// Set once after a `resumereq` transition, cleared on the next `resumereq` 1→0.
    pub resumeack: bool,
    /// Set after a reset, cleared by `ackhavereset`.
    pub havereset: bool,
}

/// One hardware thread's complete observable state.
#[derive(Clone, Debug)]
pub struct Hart {
    /// This hart's identity.
    pub id: HartId,
    /// Program counter.
    pub pc: u64,
    /// Privilege mode: 0 = U, 1 = S, 3 = M (RISC-V encoding).
    pub privilege: u8,
    /// Top-level execution state.
    pub state: ExecState,
    /// Accumulated wait reasons; `state == Waiting` iff this is non-empty.
    pub wait: WaitReason,
    /// Debug-module program-buffer sub-state.
    pub progbuf: ProgbufState,
    /// Debug-aggregate flags contributed to this hart's neighborhood's `hastatus0`.
    pub debug: DebugFlags,
    /// Cause of the most recent debug-mode entry, if halted via the DM.
    pub halt_cause: Option<HaltCause>,
    /// Hart-local tensor-error CSR (spec §4.E, §7; bits accumulate, never trap).
    pub tensor_error: u32,
    /// Committed program-buffer instruction pair (`AXPROGBUF0/1`, spec §4.D).
    pub progbuf_words: [u32; 2],
    /// Staged, not-yet-committed program-buffer instruction pair
    /// (`NXPROGBUF0/1`, spec §4.D); writing these never enters `Fetching`.
    pub nxprogbuf_words: [u32; 2],
    /// Program-buffer data shuttle register (`DDATA0`, spec §4.D).
    pub ddata: u64,
}

impl Hart {
    /// Creates a hart in the `Nonexistent` state.
    pub fn new(id: HartId) -> Self {
        Self {
            id,
            pc: 0,
            privilege: 3,
            state: ExecState::Nonexistent,
            wait: WaitReason::empty(),
            progbuf: ProgbufState::Idle,
            debug: DebugFlags::default(),
            halt_cause: None,
            tensor_error: 0,
            progbuf_words: [0; 2],
            nxprogbuf_words: [0; 2],
            ddata: 0,
        }
    }

    /// Cold-resets this hart to `boot_pc` in M-mode, running (or nonexistent
    /// if `enabled` is false, per the shire's disable mask).
    pub fn cold_reset(&mut self, boot_pc: u64, enabled: bool) {
        self.pc = boot_pc;
        self.privilege = 3;
        self.wait = WaitReason::empty();
        self.progbuf = ProgbufState::Idle;
        self.halt_cause = None;
        self.tensor_error = 0;
        self.state = if enabled { ExecState::Running } else { ExecState::Nonexistent };
        self.debug = DebugFlags { halted: false, running: enabled, resumeack: false, havereset: true };
    }

    /// Warm-resets this hart: clears wait/halt flags but preserves the
    /// disable mask's outcome (the caller passes `enabled` computed from
    /// the current disable mask, since a warm reset does not change it).
    pub fn warm_reset(&mut self, boot_pc: u64, enabled: bool) {
        self.pc = boot_pc;
        self.wait = WaitReason::empty();
        self.progbuf = ProgbufState::Idle;
        self.state = if enabled { ExecState::Running } else { ExecState::Nonexistent };
        self.debug.havereset = true;
        self.debug.halted = false;
        self.debug.running = enabled;
    }

    /// Publishes a non-empty wait-reason set, transitioning to `Waiting`.
    pub fn begin_wait(&mut self, reason: WaitReason) {
        self.wait.insert(reason);
        if self.wait.is_waiting() && self.state == ExecState::Running {
            self.state = ExecState::Waiting;
        }
    }

    /// Clears `reason` from the wait set; transitions back to `Running` once empty.
    pub fn end_wait(&mut self, reason: WaitReason) {
        self.wait.remove(reason);
        if !self.wait.is_waiting() && self.state == ExecState::Waiting {
            self.state = ExecState::Running;
        }
    }

    /// Forces this hart into `Halted` with the given cause (DM `haltreq`, spec §4.D).
    pub fn force_halt(&mut self, cause: HaltCause) {
        self.state = ExecState::Halted;
        self.halt_cause = Some(cause);
        self.debug.halted = true;
        self.debug.running = false;
    }

    /// Resumes a halted hart to `Running` and sets `resumeack` (spec §4.D).
    pub fn resume(&mut self) {
        if self.state == ExecState::Halted {
            self.state = ExecState::Running;
            self.halt_cause = None;
            self.debug.halted = false;
            self.debug.running = true;
            self.debug.resumeack = true;
        }
    }

    /// Clears `resumeack` (spec §4.D: `resumereq` 1→0).
    pub fn clear_resumeack(&mut self) {
        self.debug.resumeack = false;
    }

    /// Clears `havereset` (spec §4.D: `ackhavereset`).
    pub fn clear_havereset(&mut self) {
        self.debug.havereset = false;
    }

    /// Whether this hart is neither halted nor running despite being
    /// debug-selected (spec §3: `unavailable := selected ∧ ¬halted ∧ ¬running`).
    pub fn is_unavailable(&self) -> bool {
        !self.debug.halted && !self.debug.running
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id() -> HartId {
        HartId::new(0, 0, 0, 0)
    }

    #[test]
    fn cold_reset_enabled_hart_runs() {
        let mut h = Hart::new(id());
        h.cold_reset(0x8000_0000, true);
        assert_eq!(h.state, ExecState::Running);
        assert_eq!(h.pc, 0x8000_0000);
        assert!(h.debug.havereset);
    }

    #[test]
    fn wait_reason_transitions_to_waiting_and_back() {
        let mut h = Hart::new(id());
        h.cold_reset(0, true);
        h.begin_wait(WaitReason::TENSOR_LOAD);
        assert_eq!(h.state, ExecState::Waiting);
        h.end_wait(WaitReason::TENSOR_LOAD);
        assert_eq!(h.state, ExecState::Running);
    }

    #[test]
    fn halt_then_resume_sets_resumeack() {
        let mut h = Hart::new(id());
        h.cold_reset(0, true);
        h.force_halt(HaltCause::HaltRequest);
        assert_eq!(h.state, ExecState::Halted);
        h.resume();
        assert_eq!(h.state, ExecState::Running);
        assert!(h.debug.resumeack);
    }
}
