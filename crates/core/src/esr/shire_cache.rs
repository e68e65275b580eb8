//! Per-shire cache-controller register bank (spec §3; one instance per
//! [`crate::esr::CACHE_BANKS_PER_SHIRE`] banks).
//!
//! Most registers are ordinary control/perfmon/error fields. The
//! state-machine control register is special: writes are accepted (and
//! may be observed as a side effect) but the value is never retained —
//! reads always return a constant "idle" encoding (spec §3, §9 open
//! question on bank-broadcast semantics).

use crate::esr::register::{reg_read, reg_write, reset_bank, RegKind, RegMeta, ResetKind, WriteOutcome};

/// Encoding returned by reads of the state-machine control register.
pub const STATE_MACHINE_IDLE: u64 = 0;

const REG_COUNT: usize = 25;

/// Index of the state-machine control register within the bank.
pub const STATE_MACHINE_CTRL_IDX: usize = 0;

fn table() -> [RegMeta; REG_COUNT] {
    let mut t = [RegMeta::rw("cache_perfmon"); REG_COUNT];
    t[STATE_MACHINE_CTRL_IDX] = RegMeta {
        name: "state_machine_ctrl",
        writable_mask: u64::MAX,
        readable_mask: 0,
        reset: ResetKind::None,
        reset_value: STATE_MACHINE_IDLE,
        kind: RegKind::SideEffect,
    };
    for (i, meta) in t.iter_mut().enumerate().skip(1) {
        meta.name = match i {
            1 => "cache_error_status",
            2 => "cache_error_addr",
            3 => "cache_enable",
            _ => "cache_perfmon",
        };
        if i == 1 {
            meta.kind = RegKind::ReadClear;
            meta.writable_mask = 0;
            meta.readable_mask = u64::MAX;
        }
    }
    t
}

/// One cache-controller bank's register file.
#[derive(Debug, Clone)]
pub struct ShireCacheBank {
    values: [u64; REG_COUNT],
}

impl Default for ShireCacheBank {
    fn default() -> Self {
        let table = table();
        let mut values = [0u64; REG_COUNT];
        reset_bank(&mut values, &table, ResetKind::Cold);
        Self { values }
    }
}

impl ShireCacheBank {
    /// Creates a bank with cold-reset values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Reads register `idx`. The state-machine control register always
    /// reads as [`STATE_MACHINE_IDLE`] regardless of prior writes.
    pub fn read(&mut self, idx: usize) -> Option<u64> {
        let table = table();
        if idx == STATE_MACHINE_CTRL_IDX {
            return table.get(idx).map(|_| STATE_MACHINE_IDLE);
        }
        reg_read(&mut self.values, &table, idx)
    }

    /// Writes register `idx`. For the state-machine control register the
    /// write is accepted and a side effect is signalled, but nothing is
    /// retained in `self.values`.
    pub fn write(&mut self, idx: usize, val: u64) -> Option<WriteOutcome> {
        let table = table();
        let outcome = reg_write(&mut self.values, &table, idx, val)?;
        if idx == STATE_MACHINE_CTRL_IDX {
            self.values[idx] = 0;
        }
        Some(outcome)
    }

    /// Restores registers tagged for `kind` resets to their reset values.
    pub fn reset(&mut self, kind: ResetKind) {
        reset_bank(&mut self.values, &table(), kind);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn state_machine_ctrl_write_not_retained() {
        let mut bank = ShireCacheBank::new();
        let outcome = bank.write(STATE_MACHINE_CTRL_IDX, 0xFFFF_FFFF).unwrap();
        assert_eq!(outcome, WriteOutcome::RunSideEffect);
        assert_eq!(bank.read(STATE_MACHINE_CTRL_IDX), Some(STATE_MACHINE_IDLE));
    }

    #[test]
    fn error_status_is_read_clear() {
        let mut bank = ShireCacheBank::new();
        bank.values[1] = 0x42;
        assert_eq!(bank.read(1), Some(0x42));
        assert_eq!(bank.read(1), Some(0));
    }
}
