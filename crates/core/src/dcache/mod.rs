//! D-cache / scratchpad manager (spec §4.E).
//!
//! Per hardware thread, a lock table of `sets × ways` entries tracks which
//! lines are pinned as software-managed scratchpad. Cacheops are driven by
//! a 64-bit immediate descriptor and iterate `count+1` times, optionally
//! skipping iterations the tensor mask excludes — the same per-thread
//! table-plus-iteration shape as the teacher's `CacheSim` (`set_index`/
//! `ways` bookkeeping), generalized from a timing model to a lock-state
//! model since this core has no cycle-cost simulation to do here.

use crate::common::{AccessType, HartId, MemoryFault, PhysAddr};
use crate::executor::{TranslationFault, Translator};
use crate::hart::Hart;
use crate::log::WarnSink;

/// A cacheop's destination, as encoded in the 64-bit immediate (spec §4.E).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CacheOp {
    /// Evict by set/way.
    EvictSw,
    /// Flush (writeback + evict) by set/way.
    FlushSw,
    /// Evict by virtual address.
    EvictVa,
    /// Flush by virtual address.
    FlushVa,
    /// Prefetch by virtual address.
    PrefetchVa,
    /// Lock by physical address onto an explicit way.
    LockSw,
    /// Unlock by set/way.
    UnlockSw,
    /// Lock by virtual address (hint-only).
    LockVa,
    /// Unlock by virtual address (hint-only).
    UnlockVa,
}

/// Bit set in a hart's tensor-error CSR when a cacheop hits a lock conflict
/// (spec §4.E: precondition checks (b) and (c)).
pub const TENSOR_ERROR_LOCK_CONFLICT: u32 = 1 << 5;
/// Bit set when a cacheop's translation, zero-fill, or access check fails
/// (spec §4.E: precondition (a), zero-fill failure, VA-op translation failure).
pub const TENSOR_ERROR_TRANSLATION: u32 = 1 << 7;

const LINE_BYTES: usize = 64;

/// Decoded cacheop immediate (spec §4.E: `{tm:1, dest_level:2, ..., set, way, count, id}`).
#[derive(Clone, Copy, Debug)]
pub struct CacheOpDescriptor {
    /// Whether the tensor mask gates iteration (`tm`).
    pub tensor_masked: bool,
    /// Destination level: 0 = L1, >1 = scratchpad-capable levels.
    pub dest_level: u8,
    /// Starting set index.
    pub set: usize,
    /// Starting way index.
    pub way: usize,
    /// Iteration count minus one (`count+1` total iterations, 1..=16).
    pub count: u8,
    /// Per-iteration tensor-mask bits (bit `i` gates iteration `i`); ignored unless `tensor_masked`.
    pub tensor_mask: u16,
}

impl CacheOpDescriptor {
    fn iterations(self) -> u32 {
        u32::from(self.count) + 1
    }

    fn iteration_active(self, i: u32) -> bool {
        !self.tensor_masked || (self.tensor_mask >> i) & 1 != 0
    }
}

#[derive(Clone, Copy, Debug, Default)]
struct LockEntry {
    locked: bool,
    paddr: u64,
}

/// One hardware thread's D-cache lock table (spec §3, §4.E).
#[derive(Debug, Clone)]
pub struct LockTable {
    entries: Vec<LockEntry>,
    sets: usize,
    ways: usize,
}

impl LockTable {
    /// Creates an all-unlocked table of `sets × ways` entries.
    pub fn new(sets: usize, ways: usize) -> Self {
        Self { entries: vec![LockEntry::default(); sets * ways], sets, ways }
    }

    fn index(&self, set: usize, way: usize) -> Option<usize> {
        if set < self.sets && way < self.ways {
            Some(set * self.ways + way)
        } else {
            None
        }
    }

    /// Whether `(set, way)` is currently locked.
    pub fn is_locked(&self, set: usize, way: usize) -> bool {
        self.index(set, way).is_some_and(|i| self.entries[i].locked)
    }

    /// Number of locked ways within `set`.
    pub fn locked_count(&self, set: usize) -> usize {
        if set >= self.sets {
            return 0;
        }
        (0..self.ways).filter(|&w| self.entries[set * self.ways + w].locked).count()
    }

    /// Finds a locked entry holding `paddr`, if any, other than `(set, way)`.
    pub fn find_by_paddr(&self, paddr: u64) -> Option<(usize, usize)> {
        self.entries.iter().position(|e| e.locked && e.paddr == paddr).map(|i| (i / self.ways, i % self.ways))
    }

    /// Locks `(set, way)` onto `paddr`; no-op if out of range.
    pub fn lock(&mut self, set: usize, way: usize, paddr: u64) {
        if let Some(i) = self.index(set, way) {
            self.entries[i] = LockEntry { locked: true, paddr };
        }
    }

    /// Clears the lock bit at `(set, way)`; silently ignored if out of range (spec §4.E).
    pub fn unlock(&mut self, set: usize, way: usize) {
        if let Some(i) = self.index(set, way) {
            self.entries[i].locked = false;
        }
    }

    /// Clears every lock (cache-control `all` bit changed, spec §4.E).
    pub fn clear_all(&mut self) {
        for e in &mut self.entries {
            e.locked = false;
        }
    }

    /// Clears every lock except those in the last two sets (cache-control
    /// `scp` bit changed, spec §4.E).
    pub fn clear_all_but_last_two_sets(&mut self) {
        let keep_from = self.sets.saturating_sub(2);
        for set in 0..keep_from {
            for way in 0..self.ways {
                self.entries[set * self.ways + way].locked = false;
            }
        }
    }

    fn set_index_for_paddr(&self, paddr: u64) -> usize {
        ((paddr as usize) / LINE_BYTES) % self.sets.max(1)
    }
}

/// Per-thread cache-control byte: `all` (bit 0) and `scp` (bit 1) (spec §4.E).
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct CacheControl(u8);

impl CacheControl {
    const ALL_BIT: u8 = 1 << 0;
    const SCP_BIT: u8 = 1 << 1;

    /// Current `all` bit.
    pub fn all(self) -> bool {
        self.0 & Self::ALL_BIT != 0
    }

    /// Current `scp` bit.
    pub fn scp(self) -> bool {
        self.0 & Self::SCP_BIT != 0
    }

    /// Applies a new control byte, returning `(all_changed, scp_rising_edge)`.
    pub fn write(&mut self, new: u8) -> (bool, bool) {
        let all_changed = (self.0 & Self::ALL_BIT) != (new & Self::ALL_BIT);
        let scp_changed = (self.0 & Self::SCP_BIT) != (new & Self::SCP_BIT);
        let scp_rising = scp_changed && new & Self::SCP_BIT != 0;
        self.0 = new;
        (all_changed, scp_rising)
    }
}

/// D-cache/SCP manager for one hardware thread: lock table, cache-control
/// byte, and the scratchpad address range cacheops police against.
pub struct DCacheUnit {
    table: LockTable,
    control: CacheControl,
    scratchpad: (PhysAddr, PhysAddr),
}

impl DCacheUnit {
    /// Creates a unit with `sets × ways` lock-table entries and the given
    /// scratchpad physical-address range (inclusive start, exclusive end).
    pub fn new(sets: usize, ways: usize, scratchpad: (PhysAddr, PhysAddr)) -> Self {
        Self { table: LockTable::new(sets, ways), control: CacheControl::default(), scratchpad }
    }

    /// Read-only access to the lock table (for status/debug surfaces).
    pub fn table(&self) -> &LockTable {
        &self.table
    }

    fn in_scratchpad(&self, paddr: u64) -> bool {
        paddr >= self.scratchpad.0.val() && paddr < self.scratchpad.1.val()
    }

    /// Applies a cache-control byte write, invalidating the lock table per
    /// the `all`/`scp` edge rules (spec §4.E).
    pub fn write_control(&mut self, new: u8) {
        let (all_changed, scp_rising) = self.control.write(new);
        if all_changed {
            self.table.clear_all();
        } else if scp_rising {
            self.table.clear_all_but_last_two_sets();
        }
    }

    /// `EvictSW`/`FlushSW`: walks `desc.count + 1` set/way pairs starting at
    /// `(desc.set, desc.way)`, incrementing way-then-set with wrap. Raises a
    /// PMA violation if a locked, scratchpad-resident line is targeted at
    /// `dest_level > 1` (spec §4.E).
    pub fn evict_or_flush_sw(&mut self, desc: CacheOpDescriptor) -> Result<(), MemoryFault> {
        let (mut set, mut way) = (desc.set, desc.way);
        for i in 0..desc.iterations() {
            if desc.iteration_active(i) && desc.dest_level > 1 {
                if let Some(idx) = self.table.index(set, way) {
                    let entry = self.table.entries[idx];
                    if entry.locked && self.in_scratchpad(entry.paddr) {
                        return Err(MemoryFault::PmaViolation(PhysAddr::new(entry.paddr)));
                    }
                }
            }
            way += 1;
            if way >= self.table.ways.max(1) {
                way = 0;
                set += 1;
                if set >= self.table.sets.max(1) {
                    set = 0;
                }
            }
        }
        Ok(())
    }

    /// `EvictVA`/`FlushVA`: translates `desc.count + 1` virtual addresses
    /// starting at `vaddr`, each advanced by `stride`. A translation failure
    /// sets tensor-error bit 7 and stops the remaining iterations without
    /// raising a memory fault; a scratchpad hit at `dest_level > 1` raises
    /// one (spec §4.E).
    pub fn evict_or_flush_va(
        &mut self,
        hart: &mut Hart,
        hart_id: HartId,
        desc: CacheOpDescriptor,
        vaddr: u64,
        stride: u64,
        op: CacheOp,
        translator: &mut dyn Translator,
    ) -> Result<(), MemoryFault> {
        for i in 0..desc.iterations() {
            if !desc.iteration_active(i) {
                continue;
            }
            let va = vaddr.wrapping_add(stride.wrapping_mul(u64::from(i)));
            match translator.translate(hart_id, va, LINE_BYTES, AccessType::Write, Some(op)) {
                Ok(paddr) => {
                    if desc.dest_level > 1 && self.in_scratchpad(paddr.val()) {
                        return Err(MemoryFault::PmaViolation(paddr));
                    }
                }
                Err(TranslationFault::PageFault | TranslationFault::AccessFault) => {
                    hart.tensor_error |= TENSOR_ERROR_TRANSLATION;
                    break;
                }
            }
        }
        Ok(())
    }

    /// `PrefetchVA`: translates `desc.count + 1` addresses and reads one
    /// line each; a failure sets tensor-error bit 7 and aborts (spec §4.E).
    pub fn prefetch_va(
        &mut self,
        hart: &mut Hart,
        hart_id: HartId,
        desc: CacheOpDescriptor,
        vaddr: u64,
        stride: u64,
        translator: &mut dyn Translator,
    ) {
        for i in 0..desc.iterations() {
            if !desc.iteration_active(i) {
                continue;
            }
            let va = vaddr.wrapping_add(stride.wrapping_mul(u64::from(i)));
            if translator.translate(hart_id, va, LINE_BYTES, AccessType::Read, Some(CacheOp::PrefetchVa)).is_err() {
                hart.tensor_error |= TENSOR_ERROR_TRANSLATION;
                break;
            }
        }
    }

    /// `LockSW(paddr, way)`: checks preconditions (a)-(c) in order, each
    /// failure setting the documented tensor-error bit and aborting before
    /// the zero-fill in (d) (spec §4.E).
    pub fn lock_sw(
        &mut self,
        hart: &mut Hart,
        hart_id: HartId,
        paddr: u64,
        way: usize,
        translator: &mut dyn Translator,
        warn: &WarnSink,
    ) {
        let set = self.table.set_index_for_paddr(paddr);

        if translator.translate(hart_id, paddr, LINE_BYTES, AccessType::Write, Some(CacheOp::LockSw)).is_err() {
            hart.tensor_error |= TENSOR_ERROR_TRANSLATION;
            return;
        }

        let conflicting_paddr = self.table.find_by_paddr(paddr).is_some_and(|(s, w)| (s, w) != (set, way));
        let conflicting_way = self.table.is_locked(set, way) && !self.same_paddr(set, way, paddr);
        if conflicting_paddr || conflicting_way {
            hart.tensor_error |= TENSOR_ERROR_LOCK_CONFLICT;
            return;
        }

        let locked_here = self.table.locked_count(set);
        if locked_here >= self.table.ways.saturating_sub(1) && !self.table.is_locked(set, way) {
            hart.tensor_error |= TENSOR_ERROR_LOCK_CONFLICT;
            return;
        }

        // Zero-fill has no real backing store at this layer (the manager
        // owns lock metadata only, not cache-line contents); it cannot fail
        // in this core.
        let _ = warn;
        self.table.lock(set, way, paddr);
    }

    fn same_paddr(&self, set: usize, way: usize, paddr: u64) -> bool {
        self.table.index(set, way).is_some_and(|i| self.table.entries[i].paddr == paddr)
    }

    /// `UnlockSW(set, way)`: clears the lock, silently ignoring out-of-range indices.
    pub fn unlock_sw(&mut self, set: usize, way: usize) {
        self.table.unlock(set, way);
    }

    /// `LockVA`/`UnlockVA(vaddr, stride)`: hint-only; translates each of
    /// `desc.count + 1` addresses and, for `Lock`, records it at its
    /// address-derived set/way. Translation failure sets tensor-error bit 7
    /// and aborts (spec §4.E).
    pub fn lock_or_unlock_va(
        &mut self,
        hart: &mut Hart,
        hart_id: HartId,
        desc: CacheOpDescriptor,
        vaddr: u64,
        stride: u64,
        lock: bool,
        translator: &mut dyn Translator,
    ) {
        for i in 0..desc.iterations() {
            if !desc.iteration_active(i) {
                continue;
            }
            let va = vaddr.wrapping_add(stride.wrapping_mul(u64::from(i)));
            let op = if lock { CacheOp::LockVa } else { CacheOp::UnlockVa };
            match translator.translate(hart_id, va, LINE_BYTES, AccessType::Write, Some(op)) {
                Ok(paddr) => {
                    let set = self.table.set_index_for_paddr(paddr.val());
                    if lock {
                        let way = (0..self.table.ways).find(|&w| !self.table.is_locked(set, w)).unwrap_or(0);
                        self.table.lock(set, way, paddr.val());
                    } else if let Some((s, w)) = self.table.find_by_paddr(paddr.val()) {
                        self.table.unlock(s, w);
                    }
                }
                Err(_) => {
                    hart.tensor_error |= TENSOR_ERROR_TRANSLATION;
                    break;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::HartId;
    use crate::config::WarnPromotion;
    use crate::executor::IdentityTranslator;

    fn hart() -> (Hart, HartId) {
        let id = HartId::new(0, 0, 0, 0);
        let mut h = Hart::new(id);
        h.cold_reset(0, true);
        (h, id)
    }

    fn unit() -> DCacheUnit {
        DCacheUnit::new(4, 4, (PhysAddr::new(0x1000), PhysAddr::new(0x2000)))
    }

    #[test]
    fn lock_then_conflicting_way_sets_tensor_error() {
        let mut u = unit();
        let (mut h, id) = hart();
        let warn = WarnSink::new(WarnPromotion::default());
        let mut t = IdentityTranslator;
        u.lock_sw(&mut h, id, 0x40, 0, &mut t, &warn);
        assert!(u.table().is_locked(0, 0));
        u.lock_sw(&mut h, id, 0x80, 0, &mut t, &warn);
        assert_eq!(h.tensor_error & TENSOR_ERROR_LOCK_CONFLICT, TENSOR_ERROR_LOCK_CONFLICT);
    }

    #[test]
    fn ways_minus_one_limit_enforced() {
        let mut u = DCacheUnit::new(1, 2, (PhysAddr::new(0), PhysAddr::new(0)));
        let (mut h, id) = hart();
        let warn = WarnSink::new(WarnPromotion::default());
        let mut t = IdentityTranslator;
        u.lock_sw(&mut h, id, 0x0, 0, &mut t, &warn);
        u.lock_sw(&mut h, id, LINE_BYTES as u64, 1, &mut t, &warn);
        assert_eq!(h.tensor_error & TENSOR_ERROR_LOCK_CONFLICT, TENSOR_ERROR_LOCK_CONFLICT);
    }

    #[test]
    fn unlock_out_of_range_is_noop() {
        let mut u = unit();
        u.unlock_sw(99, 99);
    }

    #[test]
    fn all_bit_change_clears_every_lock() {
        let mut u = unit();
        u.table.lock(0, 0, 0x40);
        u.write_control(0x1);
        assert!(!u.table().is_locked(0, 0));
    }

    #[test]
    fn scp_rising_edge_preserves_last_two_sets() {
        let mut u = unit();
        u.table.lock(0, 0, 0x40);
        u.table.lock(3, 0, 0x80);
        u.write_control(0x2);
        assert!(!u.table().is_locked(0, 0));
        assert!(u.table().is_locked(3, 0));
    }

    #[test]
    fn evict_sw_raises_pma_violation_on_locked_scratchpad_line() {
        let mut u = unit();
        u.table.lock(0, 0, 0x1500);
        let desc = CacheOpDescriptor { tensor_masked: false, dest_level: 2, set: 0, way: 0, count: 0, tensor_mask: 0 };
        let err = u.evict_or_flush_sw(desc).unwrap_err();
        assert!(matches!(err, MemoryFault::PmaViolation(_)));
    }

    #[test]
    fn tensor_mask_skips_inactive_iterations() {
        let mut u = unit();
        let desc =
            CacheOpDescriptor { tensor_masked: true, dest_level: 0, set: 0, way: 0, count: 3, tensor_mask: 0b0000 };
        // No scratchpad hits possible since nothing is locked; exercised for coverage of masking path.
        assert!(u.evict_or_flush_sw(desc).is_ok());
    }
}
