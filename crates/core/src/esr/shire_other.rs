//! Per-shire "other" ESR bank (spec §3): config, fast-local-barrier
//! counters, power/clock/PLL/DLL configuration, and the coop-mode and
//! i-cache-prefetch flags.

use crate::esr::register::{reg_read, reg_write, reset_bank, RegKind, RegMeta, ResetKind, WriteOutcome};

/// Number of fast-local-barrier counters per shire (spec §3).
pub const FLB_COUNTERS: usize = 32;

const SHIRE_CONFIG: usize = 0;
/// Exposed to `esr::store` so a fabric write to this register can be
/// reported back as [`crate::esr::store::SideEffect::RecomputeEnablement`].
pub(crate) const THREAD0_DISABLE: usize = 1;
/// See [`THREAD0_DISABLE`].
pub(crate) const THREAD1_DISABLE: usize = 2;
const MINION_FEATURE_MASK: usize = 3;
const MTIME_TARGET: usize = 4;
const POWER_CONFIG: usize = 5;
const CLOCK_CONFIG: usize = 6;
const PLL_CONFIG: usize = 7;
const DLL_CONFIG: usize = 8;
/// Exposed to `esr::store` so a fabric write to this register can be
/// reported back as [`crate::esr::store::SideEffect::FlushPrefetch`].
pub(crate) const COOP_MODE: usize = 9;
const ICACHE_PREFETCH: usize = 10;
const CHANNEL_ECO_CONTROL: usize = 11;
const FLB_BASE: usize = 12;
const REG_COUNT: usize = FLB_BASE + FLB_COUNTERS;

fn table() -> [RegMeta; REG_COUNT] {
    let mut t = [RegMeta::rw("flb_counter"); REG_COUNT];
    t[SHIRE_CONFIG] = RegMeta {
        name: "shire_config",
        writable_mask: 0,
        readable_mask: u64::MAX,
        reset: ResetKind::Cold,
        reset_value: 0,
        kind: RegKind::ReadOnly,
    };
    t[THREAD0_DISABLE] = RegMeta {
        name: "thread0_disable",
        writable_mask: u64::MAX,
        readable_mask: u64::MAX,
        reset: ResetKind::Warm,
        reset_value: 0,
        kind: RegKind::SideEffect,
    };
    t[THREAD1_DISABLE] = RegMeta {
        name: "thread1_disable",
        writable_mask: u64::MAX,
        readable_mask: u64::MAX,
        reset: ResetKind::Warm,
        reset_value: 0,
        kind: RegKind::SideEffect,
    };
    t[MINION_FEATURE_MASK] = RegMeta::rw("minion_feature_mask");
    t[MTIME_TARGET] = RegMeta::rw("mtime_target");
    t[POWER_CONFIG] = RegMeta::rw("power_config");
    t[CLOCK_CONFIG] = RegMeta::rw("clock_config");
    t[PLL_CONFIG] = RegMeta::rw("pll_config");
    t[DLL_CONFIG] = RegMeta::rw("dll_config");
    t[COOP_MODE] = RegMeta {
        name: "coop_mode",
        writable_mask: 0x1,
        readable_mask: 0x1,
        reset: ResetKind::Cold,
        reset_value: 0,
        kind: RegKind::SideEffect,
    };
    t[ICACHE_PREFETCH] = RegMeta {
        name: "icache_prefetch",
        writable_mask: 0x1,
        readable_mask: 0x1,
        reset: ResetKind::Cold,
        reset_value: 0,
        kind: RegKind::ReadWrite,
    };
    t[CHANNEL_ECO_CONTROL] = RegMeta::rw("channel_eco_control");
    for slot in t.iter_mut().skip(FLB_BASE) {
        slot.reset = ResetKind::Cold;
        slot.reset_value = 0;
    }
    t
}

/// A shire's "other" register file, including its 32 fast-local-barrier counters.
#[derive(Debug, Clone)]
pub struct ShireOtherBank {
    values: [u64; REG_COUNT],
    shire_id: u8,
}

impl ShireOtherBank {
    /// Creates a bank with cold-reset values; `shire_id` is embedded in `shire_config`.
    pub fn new(shire_id: u8) -> Self {
        let table = table();
        let mut values = [0u64; REG_COUNT];
        reset_bank(&mut values, &table, ResetKind::Cold);
        values[SHIRE_CONFIG] = u64::from(shire_id);
        Self { values, shire_id }
    }

    /// Reads register `idx`; `None` if out of range.
    pub fn read(&mut self, idx: usize) -> Option<u64> {
        reg_read(&mut self.values, &table(), idx)
    }

    /// Writes register `idx`; returns the side-effect outcome for the caller to act on.
    pub fn write(&mut self, idx: usize, val: u64) -> Option<WriteOutcome> {
        reg_write(&mut self.values, &table(), idx, val)
    }

    /// Restores registers tagged for `kind` resets; re-seeds `shire_config`'s embedded id.
    pub fn reset(&mut self, kind: ResetKind) {
        reset_bank(&mut self.values, &table(), kind);
        self.values[SHIRE_CONFIG] = u64::from(self.shire_id);
    }

    /// Index of fast-local-barrier counter `n` (`n < FLB_COUNTERS`).
    pub fn flb_index(n: usize) -> usize {
        FLB_BASE + n
    }

    /// Current per-thread disable masks `(thread0_disable, thread1_disable)`.
    pub fn thread_disable_masks(&self) -> (u64, u64) {
        (self.values[THREAD0_DISABLE], self.values[THREAD1_DISABLE])
    }

    /// Whether coop mode is currently enabled.
    pub fn coop_mode(&self) -> bool {
        self.values[COOP_MODE] & 1 != 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn shire_config_embeds_id() {
        let mut bank = ShireOtherBank::new(3);
        assert_eq!(bank.read(SHIRE_CONFIG), Some(3));
    }

    #[test]
    fn flb_counters_are_addressable() {
        let mut bank = ShireOtherBank::new(0);
        let idx = ShireOtherBank::flb_index(31);
        let _ = bank.write(idx, 16).unwrap();
        assert_eq!(bank.read(idx), Some(16));
    }

    #[test]
    fn thread_disable_is_side_effecting() {
        let mut bank = ShireOtherBank::new(0);
        let outcome = bank.write(THREAD0_DISABLE, 0xFF).unwrap();
        assert_eq!(outcome, WriteOutcome::RunSideEffect);
        assert_eq!(bank.thread_disable_masks().0, 0xFF);
    }
}
