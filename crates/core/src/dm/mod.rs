//! The Debug Module: hart selection, halt/resume/reset, and program-buffer
//! instruction injection (spec §4.D).
//!
//! Selection is driven entirely by each neighborhood's own `hactrl`
//! register (spec §4.D: "a hart is selected iff its bit is set in its
//! neighborhood's `hactrl[15:0] | hactrl[31:16]`"); `dmctrl`'s `hartsel`
//! field is decoded for observability but does not gate which harts a
//! request affects — recorded as an Open Question resolution in
//! `DESIGN.md`.

use std::collections::HashMap;

use crate::common::HartId;
use crate::esr::EsrStore;
use crate::hart::{Hart, HaltCause};
use crate::log::WarnSink;

/// Pure AND/OR status-tree computation.
pub mod tree;

const DMACTIVE: u32 = 1 << 0;
const NDMRESET: u32 = 1 << 1;
const CLRRESETHALTREQ: u32 = 1 << 2;
const SETRESETHALTREQ: u32 = 1 << 3;
const HASEL: u32 = 1 << 26;
const ACKHAVERESET: u32 = 1 << 28;
const HARTRESET: u32 = 1 << 29;
const RESUMEREQ: u32 = 1 << 30;
const HALTREQ: u32 = 1 << 31;

/// Bits that persist in `dmctrl` across writes, as opposed to the one-shot
/// request bits below (spec §4.D, §6). `hartreset` is dual-purpose: it is
/// both latched here and applied as a per-hart warm-reset request.
const STATEFUL_MASK: u32 = DMACTIVE | NDMRESET | HASEL | HARTRESET;

/// One-shot request bits, in the fixed priority order applied when more
/// than one is set on a single write (spec §4.D, §9).
const REQUEST_PRIORITY: [u32; 6] = [HALTREQ, RESUMEREQ, HARTRESET, ACKHAVERESET, SETRESETHALTREQ, CLRRESETHALTREQ];
const REQUEST_MASK: u32 = HALTREQ | RESUMEREQ | HARTRESET | ACKHAVERESET | SETRESETHALTREQ | CLRRESETHALTREQ;

/// `hactrl`'s resethalt bit (spec §4.D: `setresethaltreq`/`clrresethaltreq`).
const RESETHALT_BIT: u64 = 1 << 20;

/// The debug module's register state.
#[derive(Debug, Clone, Default)]
pub struct DebugModule {
    dmctrl: u32,
    /// The one-shot request bits latched by the previous active write, used
    /// to detect the `resumereq` 1→0 falling edge (spec §4.D).
    requests_prev: u32,
}

impl DebugModule {
    /// Creates a debug module with `dmactive` clear.
    pub fn new() -> Self {
        Self::default()
    }

    /// Current raw `dmctrl` value.
    pub fn dmctrl(&self) -> u32 {
        self.dmctrl
    }

    /// Whether the debug module is active (`dmctrl.dmactive`).
    pub fn is_active(&self) -> bool {
        self.dmctrl & DMACTIVE != 0
    }

    /// The `hartsel` field assembled from `dmctrl[19:16]` and `dmctrl[9:0]` (spec §6).
    pub fn hartsel(&self) -> u32 {
        ((self.dmctrl >> 16) & 0xF) << 10 | (self.dmctrl & 0x3FF)
    }

    /// Applies a write to `dmctrl`, running the triggered transitions
    /// against every hart selected by its neighborhood's `hactrl` (spec §4.D).
    pub fn write_dmctrl(
        &mut self,
        val: u32,
        esr: &mut EsrStore,
        harts: &mut HashMap<HartId, Hart>,
        warn: &WarnSink,
    ) {
        let was_active = self.is_active();
        let stateful = val & STATEFUL_MASK;
        self.dmctrl = (self.dmctrl & !STATEFUL_MASK) | stateful;
        let now_active = self.is_active();

        if was_active && !now_active {
            self.dmctrl = 0;
            self.requests_prev = 0;
            for shire in 0..esr.shires() {
                for n in 0..esr.neighborhoods_per_shire() {
                    if let Some(nbhd) = esr.neighborhood_mut(shire, n) {
                        nbhd.reset(crate::esr::register::ResetKind::Debug);
                    }
                }
            }
            return;
        }
        if !now_active {
            self.requests_prev = 0;
            return;
        }

        let requests = val & REQUEST_MASK;
        let set_bits: Vec<u32> = REQUEST_PRIORITY.iter().copied().filter(|bit| requests & bit != 0).collect();
        if set_bits.len() > 1 {
            let _ = warn.debug("multiple simultaneous DM request bits; applying fixed priority order");
        }

        for bit in set_bits {
            self.apply_request(bit, esr, harts);
        }

        if self.requests_prev & RESUMEREQ != 0 && requests & RESUMEREQ == 0 {
            self.clear_resumeack(esr, harts);
        }
        self.requests_prev = requests;
    }

    fn apply_request(&mut self, bit: u32, esr: &mut EsrStore, harts: &mut HashMap<HartId, Hart>) {
        for shire in 0..esr.shires() {
            for n in 0..esr.neighborhoods_per_shire() {
                let Some(nbhd) = esr.neighborhood(shire, n) else { continue };
                let selection = nbhd.selection_mask();
                if selection == 0 {
                    continue;
                }
                if bit == SETRESETHALTREQ || bit == CLRRESETHALTREQ {
                    if let Some(nbhd) = esr.neighborhood_mut(shire, n) {
                        let cur = nbhd.hactrl();
                        let new = if bit == SETRESETHALTREQ { cur | RESETHALT_BIT } else { cur & !RESETHALT_BIT };
                        let _ = nbhd.write(10, new);
                    }
                    continue;
                }
                for bit_pos in 0..u32::from(crate::common::ident::HARTS_PER_NEIGHBORHOOD) {
                    if selection & (1 << bit_pos) == 0 {
                        continue;
                    }
                    let minion = (bit_pos / 2) as u8;
                    let thread = (bit_pos % 2) as u8;
                    let id = HartId::new(shire, n, minion, thread);
                    let Some(hart) = harts.get_mut(&id) else { continue };
                    match bit {
                        RESUMEREQ => hart.resume(),
                        HARTRESET => {
                            let enabled = hart.state != crate::hart::ExecState::Nonexistent;
                            hart.warm_reset(hart.pc, enabled);
                        }
                        ACKHAVERESET => hart.clear_havereset(),
                        HALTREQ => hart.force_halt(HaltCause::HaltRequest),
                        _ => {}
                    }
                }
                self.sync_hastatus(esr, shire, n, harts);
            }
        }
    }

    /// `resumereq` 1→0 clears each affected hart's `resumeack` (spec §4.D).
    fn clear_resumeack(&mut self, esr: &EsrStore, harts: &mut HashMap<HartId, Hart>) {
        for shire in 0..esr.shires() {
            for n in 0..esr.neighborhoods_per_shire() {
                let Some(nbhd) = esr.neighborhood(shire, n) else { continue };
                let selection = nbhd.selection_mask();
                for bit_pos in 0..u32::from(crate::common::ident::HARTS_PER_NEIGHBORHOOD) {
                    if selection & (1 << bit_pos) == 0 {
                        continue;
                    }
                    let id = HartId::new(shire, n, (bit_pos / 2) as u8, (bit_pos % 2) as u8);
                    if let Some(hart) = harts.get_mut(&id) {
                        hart.clear_resumeack();
                    }
                }
            }
        }
    }

    fn sync_hastatus(&self, esr: &mut EsrStore, shire: u8, n: u8, harts: &HashMap<HartId, Hart>) {
        let Some(nbhd) = esr.neighborhood_mut(shire, n) else { return };
        let selection = nbhd.selection_mask();
        let (mut halted, mut running, mut resumeack, mut havereset) = (0u16, 0u16, 0u16, 0u16);
        for bit_pos in 0..u32::from(crate::common::ident::HARTS_PER_NEIGHBORHOOD) {
            if selection & (1 << bit_pos) == 0 {
                continue;
            }
            let id = HartId::new(shire, n, (bit_pos / 2) as u8, (bit_pos % 2) as u8);
            if let Some(hart) = harts.get(&id) {
                let bit = 1u16 << bit_pos;
                if hart.debug.halted {
                    halted |= bit;
                }
                if hart.debug.running {
                    running |= bit;
                }
                if hart.debug.resumeack {
                    resumeack |= bit;
                }
                if hart.debug.havereset {
                    havereset |= bit;
                }
            }
        }
        nbhd.set_hastatus0(halted, running, resumeack, havereset);
    }

    /// Writes the committed program-buffer instruction pair for `hart`,
    /// entering program-buffer mode if the hart is halted (spec §4.D).
    pub fn write_progbuf(&self, hart: &mut Hart, words: [u32; 2]) {
        hart.progbuf_words = words;
        if hart.state == crate::hart::ExecState::Halted {
            hart.progbuf = crate::hart::ProgbufState::Fetching;
        }
    }

    /// Writes `DDATA0`, the data shuttle register.
    pub fn write_ddata(&self, hart: &mut Hart, value: u64) {
        hart.ddata = value;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::WarnPromotion;

    fn fixture() -> (DebugModule, EsrStore, HashMap<HartId, Hart>) {
        let warn = WarnSink::new(WarnPromotion::default());
        let mut esr = EsrStore::new(crate::common::PhysAddr::new(0x2_0000_0000), 1, 1, 16, warn);
        let mut harts = HashMap::new();
        let id = HartId::new(0, 0, 0, 0);
        let mut hart = Hart::new(id);
        hart.cold_reset(0x8000_0000, true);
        let _ = harts.insert(id, hart);
        let _ = esr.neighborhood_mut(0, 0).unwrap().write(10, 1).unwrap();
        (DebugModule::new(), esr, harts)
    }

    #[test]
    fn haltreq_halts_selected_hart() {
        let (mut dm, mut esr, mut harts) = fixture();
        let warn = WarnSink::new(WarnPromotion::default());
        dm.write_dmctrl(DMACTIVE, &mut esr, &mut harts, &warn);
        dm.write_dmctrl(DMACTIVE | HALTREQ, &mut esr, &mut harts, &warn);
        let hart = &harts[&HartId::new(0, 0, 0, 0)];
        assert_eq!(hart.state, crate::hart::ExecState::Halted);
    }

    #[test]
    fn dmactive_falling_edge_resets_debug_state() {
        let (mut dm, mut esr, mut harts) = fixture();
        let warn = WarnSink::new(WarnPromotion::default());
        dm.write_dmctrl(DMACTIVE, &mut esr, &mut harts, &warn);
        dm.write_dmctrl(0, &mut esr, &mut harts, &warn);
        assert!(!dm.is_active());
    }

    #[test]
    fn resume_sets_resumeack() {
        let (mut dm, mut esr, mut harts) = fixture();
        let warn = WarnSink::new(WarnPromotion::default());
        dm.write_dmctrl(DMACTIVE, &mut esr, &mut harts, &warn);
        dm.write_dmctrl(DMACTIVE | HALTREQ, &mut esr, &mut harts, &warn);
        dm.write_dmctrl(DMACTIVE | RESUMEREQ, &mut esr, &mut harts, &warn);
        let hart = &harts[&HartId::new(0, 0, 0, 0)];
        assert_eq!(hart.state, crate::hart::ExecState::Running);
        assert!(hart.debug.resumeack);
    }

    #[test]
    fn resumereq_falling_edge_clears_resumeack() {
        let (mut dm, mut esr, mut harts) = fixture();
        let warn = WarnSink::new(WarnPromotion::default());
        dm.write_dmctrl(DMACTIVE, &mut esr, &mut harts, &warn);
        dm.write_dmctrl(DMACTIVE | HALTREQ, &mut esr, &mut harts, &warn);
        dm.write_dmctrl(DMACTIVE | RESUMEREQ, &mut esr, &mut harts, &warn);
        assert!(harts[&HartId::new(0, 0, 0, 0)].debug.resumeack);
        dm.write_dmctrl(DMACTIVE, &mut esr, &mut harts, &warn);
        assert!(!harts[&HartId::new(0, 0, 0, 0)].debug.resumeack);
    }

    #[test]
    fn setresethaltreq_sets_hactrl_bit_on_selected_neighborhoods() {
        let (mut dm, mut esr, mut harts) = fixture();
        let warn = WarnSink::new(WarnPromotion::default());
        dm.write_dmctrl(DMACTIVE, &mut esr, &mut harts, &warn);
        dm.write_dmctrl(DMACTIVE | SETRESETHALTREQ, &mut esr, &mut harts, &warn);
        assert_eq!(esr.neighborhood(0, 0).unwrap().hactrl() & (1 << 20), 1 << 20);
        dm.write_dmctrl(DMACTIVE | CLRRESETHALTREQ, &mut esr, &mut harts, &warn);
        assert_eq!(esr.neighborhood(0, 0).unwrap().hactrl() & (1 << 20), 0);
    }
}
