//! Top-level system: owns every subcomponent, wires them behind one
//! address space, and drives the per-cycle tick (spec §3, §4.F, §4.G).
//!
//! Grounded on the teacher's `soc::builder::System`: one struct assembling
//! every device from `Config` and exposing a single `tick`, generalized
//! from the teacher's fixed RV64 SoC (RAM/UART/VirtIO/CLINT/PLIC/SysCon)
//! to this chip's shire/neighborhood/minion/thread hierarchy and its own
//! device set (ESR fabric, debug module, PLIC, small-variant syscon).

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::common::{AccessType, AgentId, CoreError, HartId, MemoryFault, PhysAddr, Trap, WaitReason};
use crate::config::Config;
use crate::dm::DebugModule;
use crate::esr::register::ResetKind;
use crate::esr::store::{HartDebugReg, SideEffect};
use crate::esr::EsrStore;
use crate::executor::InstructionExecutor;
use crate::hart::{ExecState, Hart, ProgbufState};
use crate::log::WarnSink;
use crate::memory::{MemoryFabric, Ram, Region};
use crate::plic::{Plic, Target};
use crate::scheduler::{BusErrorSink, DebugStub, Scheduler};
use crate::stats::Stats;
use crate::syscon::SysCon;

/// Default main-memory size backing the boot region (spec leaves overall
/// memory-map sizing to the integrator; this core seeds a fixed default).
const DEFAULT_RAM_SIZE: u64 = 64 * 1024 * 1024;

const ESR_BASE: u64 = 0x1_0000_0000;
const PLIC_BASE: u64 = 0x3000_0000;
const SYSCON_BASE: u64 = 0x4000_0000;
/// Base address of the debug module's single `dmctrl` register (spec §4.D,
/// §6). The spec's memory map leaves this unassigned; picked clear of the
/// other three fixed devices.
const DM_BASE: u64 = 0x5000_0000;
const DM_SIZE: u64 = 4;

/// Fixed PLIC source id raised for every `memory_error` trap (spec §7's bus
/// error interrupt; the spec does not disambiguate by faulting hart, so
/// every bus error shares one source — see `DESIGN.md`).
const BUS_ERROR_SOURCE: u32 = 1;

/// One interrupt target's externally observable pending line.
#[derive(Debug, Default)]
pub struct InterruptLine(AtomicBool);

impl InterruptLine {
    /// Whether this target's external-interrupt-pending line is currently asserted.
    pub fn is_pending(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// The whole chip: hart map, ESR fabric, memory fabric, PLIC, debug module,
/// system controller, and the scheduler that steps them all.
pub struct System {
    /// Every hart on the chip, keyed by its identity.
    pub harts: HashMap<HartId, Hart>,
    /// The external system register fabric.
    pub esr: EsrStore,
    /// Flat memory regions (currently: main RAM).
    pub fabric: MemoryFabric,
    /// The platform-level interrupt controller.
    pub plic: Plic,
    /// Per-PLIC-target pending lines, shared with each target's notify closure.
    pub plic_lines: Vec<Arc<InterruptLine>>,
    /// The debug module.
    pub dm: DebugModule,
    /// The small-variant system controller and watchdog.
    pub syscon: SysCon,
    /// The cooperative hart scheduler.
    pub scheduler: Scheduler,
    /// Run-time counters.
    pub stats: Stats,
    /// Shared warning sink.
    pub warn: WarnSink,
    config: Config,
}

impl System {
    /// Builds a system from `config`: allocates every hart in the
    /// configured topology, sizes the ESR fabric and PLIC, and performs the
    /// initial cold reset.
    pub fn new(config: Config) -> Self {
        let warn = WarnSink::new(config.warn);

        let mut harts = HashMap::new();
        for shire in 0..config.topology.shires {
            for nbhd in 0..config.topology.neighborhoods_per_shire {
                for minion in 0..config.topology.minions_per_neighborhood {
                    for thread in 0..2u8 {
                        let id = HartId::new(shire, nbhd, minion, thread);
                        let _ = harts.insert(id, Hart::new(id));
                    }
                }
            }
        }

        let esr = EsrStore::new(
            PhysAddr::new(ESR_BASE),
            config.topology.shires,
            config.topology.neighborhoods_per_shire,
            crate::common::ident::HARTS_PER_NEIGHBORHOOD as u8,
            warn,
        );

        let mut plic_lines = Vec::new();
        let mut targets = Vec::new();
        for address_id in 0..config.plic.targets as u32 {
            let line = Arc::new(InterruptLine::default());
            plic_lines.push(line.clone());
            targets.push(Target {
                name_id: address_id,
                address_id,
                notify: Box::new(move |pending| line.0.store(pending, Ordering::SeqCst)),
            });
        }
        let plic = Plic::new(PhysAddr::new(PLIC_BASE), config.plic.sources, targets);

        let mut fabric = MemoryFabric::new();
        if let Err(e) = fabric.add_region(Box::new(Ram::new(PhysAddr::new(config.topology.boot_pc), DEFAULT_RAM_SIZE))) {
            unreachable!("default RAM region is the first and only region registered: {e}");
        }

        let syscon = SysCon::new(PhysAddr::new(SYSCON_BASE), config.syscon.watchdog_divider);

        let mut system = Self {
            harts,
            esr,
            fabric,
            plic,
            plic_lines,
            dm: DebugModule::new(),
            syscon,
            scheduler: Scheduler::new(),
            stats: Stats::new(),
            warn,
            config,
        };
        system.cold_reset();
        system
    }

    fn in_range(paddr: PhysAddr, range: (PhysAddr, u64)) -> Option<u64> {
        let (base, size) = range;
        (paddr.val() >= base.val() && paddr.val() < base.val() + size).then(|| paddr.val() - base.val())
    }

    /// Reads `out.len()` bytes at `paddr`, trying the debug module, ESR
    /// fabric, PLIC, and syscon before falling back to the general memory
    /// fabric (spec §4.A dispatch, extended over the four fixed devices this
    /// core adds).
    ///
    /// # Errors
    /// Returns the `Trap` the instruction executor should raise.
    pub fn read(&mut self, agent: AgentId, paddr: PhysAddr, out: &mut [u8], access: AccessType) -> Result<(), Trap> {
        if let Some(offset) = Self::in_range(paddr, (PhysAddr::new(DM_BASE), DM_SIZE)) {
            return self.read_dm(offset, out, access);
        }
        if let Some(offset) = Self::in_range(paddr, self.esr.address_range()) {
            if let Some((id, reg)) = self.esr.hart_debug_register(agent, offset) {
                return self.read_hart_debug_register(id, reg, out, paddr, access);
            }
            return self.esr.read(agent, offset, out).map_err(|f| f.into_trap(access));
        }
        if let Some(offset) = Self::in_range(paddr, self.plic.address_range()) {
            return self.plic.read(agent, offset, out).map_err(|f| f.into_trap(access));
        }
        if let Some(offset) = Self::in_range(paddr, self.syscon.address_range()) {
            return self.syscon.read(agent, offset, out).map_err(|f| f.into_trap(access));
        }
        self.fabric.read(agent, paddr, out, access)
    }

    /// Writes `data` at `paddr`, trying the debug module, ESR fabric, PLIC,
    /// and syscon before falling back to the general memory fabric.
    ///
    /// # Errors
    /// Returns the `Trap` the instruction executor should raise.
    pub fn write(&mut self, agent: AgentId, paddr: PhysAddr, data: &[u8], access: AccessType) -> Result<(), Trap> {
        if let Some(offset) = Self::in_range(paddr, (PhysAddr::new(DM_BASE), DM_SIZE)) {
            return self.write_dm(offset, data, access);
        }
        if let Some(offset) = Self::in_range(paddr, self.esr.address_range()) {
            if let Some((id, reg)) = self.esr.hart_debug_register(agent, offset) {
                return self.write_hart_debug_register(id, reg, data, paddr, access);
            }
            let effect = self.esr.write_with_effect(agent, offset, data).map_err(|f| f.into_trap(access))?;
            self.apply_side_effect(effect);
            return Ok(());
        }
        if let Some(offset) = Self::in_range(paddr, self.plic.address_range()) {
            return self.plic.write(agent, offset, data).map_err(|f| f.into_trap(access));
        }
        if let Some(offset) = Self::in_range(paddr, self.syscon.address_range()) {
            return self.syscon.write(agent, offset, data).map_err(|f| f.into_trap(access));
        }
        self.fabric.write(agent, paddr, data, access)
    }

    fn read_dm(&mut self, offset: u64, out: &mut [u8], access: AccessType) -> Result<(), Trap> {
        if offset != 0 || out.len() != 4 {
            return Err(MemoryFault::WrongSize { addr: PhysAddr::new(DM_BASE + offset), size: out.len() }.into_trap(access));
        }
        out.copy_from_slice(&self.dm.dmctrl().to_le_bytes());
        Ok(())
    }

    fn write_dm(&mut self, offset: u64, data: &[u8], access: AccessType) -> Result<(), Trap> {
        if offset != 0 || data.len() != 4 {
            return Err(MemoryFault::WrongSize { addr: PhysAddr::new(DM_BASE + offset), size: data.len() }.into_trap(access));
        }
        let mut bytes = [0u8; 4];
        bytes.copy_from_slice(data);
        self.dm.write_dmctrl(u32::from_le_bytes(bytes), &mut self.esr, &mut self.harts, &self.warn);
        Ok(())
    }

    fn read_hart_debug_register(&mut self, id: HartId, reg: HartDebugReg, out: &mut [u8], paddr: PhysAddr, access: AccessType) -> Result<(), Trap> {
        let size = if matches!(reg, HartDebugReg::Ddata) { 8 } else { 4 };
        if out.len() != size {
            return Err(MemoryFault::WrongSize { addr: paddr, size: out.len() }.into_trap(access));
        }
        let Some(hart) = self.harts.get(&id) else {
            return Err(MemoryFault::UnmappedAddress(paddr).into_trap(access));
        };
        match reg {
            HartDebugReg::NxProgbuf(i) => out.copy_from_slice(&hart.nxprogbuf_words[i].to_le_bytes()),
            HartDebugReg::AxProgbuf(i) => out.copy_from_slice(&hart.progbuf_words[i].to_le_bytes()),
            HartDebugReg::AxData(i) => {
                let half = if i == 0 { hart.ddata as u32 } else { (hart.ddata >> 32) as u32 };
                out.copy_from_slice(&half.to_le_bytes());
            }
            HartDebugReg::Ddata => out.copy_from_slice(&hart.ddata.to_le_bytes()),
        }
        Ok(())
    }

    fn write_hart_debug_register(&mut self, id: HartId, reg: HartDebugReg, data: &[u8], paddr: PhysAddr, access: AccessType) -> Result<(), Trap> {
        let size = if matches!(reg, HartDebugReg::Ddata) { 8 } else { 4 };
        if data.len() != size {
            return Err(MemoryFault::WrongSize { addr: paddr, size: data.len() }.into_trap(access));
        }
        let Some(hart) = self.harts.get_mut(&id) else {
            return Err(MemoryFault::UnmappedAddress(paddr).into_trap(access));
        };
        let enters_fetching = |hart: &Hart| hart.state == ExecState::Halted;
        match reg {
            HartDebugReg::NxProgbuf(i) => {
                let mut bytes = [0u8; 4];
                bytes.copy_from_slice(data);
                hart.nxprogbuf_words[i] = u32::from_le_bytes(bytes);
            }
            HartDebugReg::AxProgbuf(i) => {
                let mut bytes = [0u8; 4];
                bytes.copy_from_slice(data);
                hart.progbuf_words[i] = u32::from_le_bytes(bytes);
                if enters_fetching(hart) {
                    hart.progbuf = ProgbufState::Fetching;
                }
            }
            HartDebugReg::AxData(i) => {
                let mut bytes = [0u8; 4];
                bytes.copy_from_slice(data);
                let half = u64::from(u32::from_le_bytes(bytes));
                hart.ddata = if i == 0 { (hart.ddata & !0xFFFF_FFFF) | half } else { (hart.ddata & 0xFFFF_FFFF) | (half << 32) };
                if enters_fetching(hart) {
                    hart.progbuf = ProgbufState::Fetching;
                }
            }
            HartDebugReg::Ddata => {
                let mut bytes = [0u8; 8];
                bytes.copy_from_slice(data);
                hart.ddata = u64::from_le_bytes(bytes);
            }
        }
        Ok(())
    }

    /// Applies the system-level action a side-effecting ESR write demands
    /// (spec §4.B): recomputing a shire's active hart set, or flushing a
    /// shire's outstanding prefetches.
    fn apply_side_effect(&mut self, effect: SideEffect) {
        match effect {
            SideEffect::None => {}
            SideEffect::RecomputeEnablement { shire } => self.recompute_enablement(shire),
            SideEffect::FlushPrefetch { shire } => self.flush_prefetches(shire),
        }
    }

    /// Re-evaluates every hart in `shire` against its (just-changed)
    /// thread-disable mask, warm-resetting and waking newly enabled harts
    /// and retiring newly disabled ones (spec §4.B, §4.F).
    fn recompute_enablement(&mut self, shire: u8) {
        let ids: Vec<HartId> = self.harts.keys().filter(|id| id.shire == shire).copied().collect();
        for id in ids {
            let enabled = self.enabled(id);
            let Some(currently_nonexistent) = self.harts.get(&id).map(|h| h.state == ExecState::Nonexistent) else { continue };
            if enabled && currently_nonexistent {
                let boot_pc = self.boot_pc_for(id.shire, id.neighborhood);
                if let Some(hart) = self.harts.get_mut(&id) {
                    hart.warm_reset(boot_pc, true);
                }
                self.scheduler.wake(id);
            } else if !enabled && !currently_nonexistent {
                if let Some(hart) = self.harts.get_mut(&id) {
                    let pc = hart.pc;
                    hart.warm_reset(pc, false);
                }
                self.scheduler.retire(id);
            }
        }
    }

    /// Clears the `PREFETCH` wait reason on every hart in `shire` (spec
    /// §4.B's coop-mode "flush outstanding prefetches"; `dcache::prefetch_va`
    /// is synchronous, so the only flushable state at this layer is the
    /// hart-level wait bit a prefetch suspends on).
    fn flush_prefetches(&mut self, shire: u8) {
        for hart in self.harts.values_mut().filter(|h| h.id.shire == shire) {
            hart.end_wait(WaitReason::PREFETCH);
        }
    }

    fn enabled(&self, id: HartId) -> bool {
        let Some((t0, t1)) = self.esr.thread_disable_masks(id.shire) else { return true };
        let minion_bit = 1u64
            << (u64::from(id.neighborhood) * u64::from(crate::common::ident::MINIONS_PER_NEIGHBORHOOD) + u64::from(id.minion));
        let mask = if id.thread == 0 { t0 } else { t1 };
        mask & minion_bit == 0
    }

    fn boot_pc_for(&mut self, shire: u8, nbhd: u8) -> u64 {
        self.esr
            .neighborhood_mut(shire, nbhd)
            .and_then(|n| n.read(crate::esr::neighborhood::NeighborhoodReg::MinionBoot as usize))
            .filter(|&pc| pc != 0)
            .unwrap_or(self.config.topology.boot_pc)
    }

    /// Cold-resets every subcomponent: ESR banks, debug module, syscon,
    /// every hart (to its neighborhood's boot address, or disabled per the
    /// shire's thread-disable mask), and the scheduler's hart lists (spec
    /// §3, §4.F "Cold reset").
    pub fn cold_reset(&mut self) {
        self.esr.reset(ResetKind::Cold);
        self.dm = DebugModule::new();
        self.syscon.power_on_reset();

        let ids: Vec<HartId> = self.harts.keys().copied().collect();
        for id in ids {
            let enabled = self.enabled(id);
            let boot_pc = self.boot_pc_for(id.shire, id.neighborhood);
            if let Some(hart) = self.harts.get_mut(&id) {
                hart.cold_reset(boot_pc, enabled);
            }
        }
        self.scheduler.cold_reset(&self.harts);
    }

    /// Cascades a watchdog-triggered reset: syscon re-initializes with
    /// `reset_cause = WATCHDOG`, and every hart and the scheduler follow the
    /// same cold-reset path (spec §4.G).
    pub fn watchdog_reset(&mut self) {
        self.esr.reset(ResetKind::Cold);
        self.dm = DebugModule::new();
        self.syscon.watchdog_reset();

        let ids: Vec<HartId> = self.harts.keys().copied().collect();
        for id in ids {
            let enabled = self.enabled(id);
            let boot_pc = self.boot_pc_for(id.shire, id.neighborhood);
            if let Some(hart) = self.harts.get_mut(&id) {
                hart.cold_reset(boot_pc, enabled);
            }
        }
        self.scheduler.cold_reset(&self.harts);
        self.stats.watchdog_resets += 1;
    }

    /// Advances one emulated cycle: ticks the watchdog (cascading a reset on
    /// timeout), then runs the scheduler over every hart.
    ///
    /// # Errors
    /// Propagates any fatal [`CoreError`] raised while stepping a hart.
    pub fn tick(
        &mut self,
        executor: &mut dyn InstructionExecutor,
        stub: Option<&mut dyn DebugStub>,
    ) -> Result<(), CoreError> {
        if self.syscon.tick_watchdog() {
            self.watchdog_reset();
            return Ok(());
        }

        struct PlicBusErrors<'a> {
            plic: &'a mut Plic,
        }
        impl BusErrorSink for PlicBusErrors<'_> {
            fn raise_bus_error(&mut self, _hart: HartId) {
                self.plic.raise(BUS_ERROR_SOURCE);
            }
        }
        let mut bus_errors = PlicBusErrors { plic: &mut self.plic };

        self.scheduler.run_cycle(&mut self.harts, executor, stub, &mut bus_errors)?;
        self.stats.tick();
        Ok(())
    }

    /// Runs cycles until `scheduler` reports no active work, a fatal error
    /// occurs, or `config.run.max_cycles` is reached (0 = unbounded).
    ///
    /// # Errors
    /// Propagates the first fatal [`CoreError`] raised while running.
    pub fn run(&mut self, executor: &mut dyn InstructionExecutor) -> Result<(), CoreError> {
        let max_cycles = self.config.run.max_cycles;
        loop {
            if self.scheduler.out_of_active_work() {
                return Ok(());
            }
            self.tick(executor, None)?;
            if max_cycles != 0 && self.stats.cycles >= max_cycles {
                return Ok(());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::AccessType;
    use crate::dcache::CacheOp;
    use crate::executor::{StepOutcome, TranslationFault, Translator};

    struct HaltingExecutor;
    impl Translator for HaltingExecutor {
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
    impl InstructionExecutor for HaltingExecutor {
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

    fn tiny_config() -> Config {
        let mut c = Config::default();
        c.topology.shires = 1;
        c.topology.neighborhoods_per_shire = 1;
        c.topology.minions_per_neighborhood = 1;
        c.run.max_cycles = 4;
        c
    }

    #[test]
    fn cold_reset_brings_up_every_configured_hart() {
        let system = System::new(tiny_config());
        assert_eq!(system.harts.len(), 2);
        assert_eq!(system.scheduler.active().len(), 2);
    }

    #[test]
    fn tick_advances_every_active_hart() {
        let mut system = System::new(tiny_config());
        let mut exec = HaltingExecutor;
        system.tick(&mut exec, None).unwrap();
        for hart in system.harts.values() {
            assert_eq!(hart.pc, tiny_config().topology.boot_pc + 4);
        }
        assert_eq!(system.stats.cycles, 1);
    }

    #[test]
    fn watchdog_timeout_triggers_cold_reset() {
        let mut config = tiny_config();
        config.syscon.watchdog_divider = 1;
        let mut system = System::new(config);
        system.syscon.watchdog.set_reload(1);
        system.syscon.watchdog.set_enabled(true);
        let mut exec = HaltingExecutor;
        system.tick(&mut exec, None).unwrap();
        system.tick(&mut exec, None).unwrap();
        assert_eq!(system.stats.watchdog_resets, 1);
    }

    #[test]
    fn run_respects_max_cycles() {
        let mut system = System::new(tiny_config());
        let mut exec = HaltingExecutor;
        system.run(&mut exec).unwrap();
        assert_eq!(system.stats.cycles, 4);
    }
}
