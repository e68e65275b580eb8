//! End-to-end scenarios, driven entirely through `System`'s public surface
//! (register offsets and bit positions below are the documented external
//! layout, the same numbers a bare-metal test would hardcode from a
//! datasheet — not access to any crate-private constant).

use shirecore::common::{AccessType, AgentId, HartId, PhysAddr};
use shirecore::config::Config;
use shirecore::dcache::CacheOp;
use shirecore::esr::{EsrAddress, EsrRegion};
use shirecore::executor::{InstructionExecutor, StepOutcome, TranslationFault, Translator};
use shirecore::hart::{ExecState, Hart, ProgbufState};
use shirecore::memory::Region;
use shirecore::syscon::ResetCause;
use shirecore::System;

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
        hart.pc = hart.pc.wrapping_add(4);
        StepOutcome::Retired
    }
    fn step_progbuf(&mut self, hart: &mut Hart) -> StepOutcome {
        StepOutcome::Retired
    }
    fn tick_async_tail(&mut self, _hart: &mut Hart) {}
}

#[test]
fn mram_round_trip() {
    let config = Config::default();
    let ram_addr = PhysAddr::new(config.topology.boot_pc + 0x1000);
    let mut system = System::new(config);
    let value: u64 = 0xDEAD_BEEF_CAFE_FEED;
    system
        .write(AgentId::Named("test"), ram_addr, &value.to_le_bytes(), AccessType::Write)
        .unwrap();
    let mut out = [0u8; 8];
    system.read(AgentId::Named("test"), ram_addr, &mut out, AccessType::Read).unwrap();
    assert_eq!(u64::from_le_bytes(out), value);
}

#[test]
fn watchdog_timeout_cold_resets_and_records_cause() {
    let mut config = Config::default();
    config.syscon.watchdog_divider = 1;
    let mut system = System::new(config);
    system.syscon.watchdog.set_reload(1);
    system.syscon.watchdog.set_enabled(true);

    let mut exec = RetiringExecutor;
    system.tick(&mut exec, None).unwrap();
    assert_eq!(system.stats.watchdog_resets, 1);

    // reset_cause is register index 5 at 8-byte stride (spec §4.G register file).
    let mut cause = [0u8; 4];
    system.syscon.read(AgentId::Named("test"), 5 * 8, &mut cause).unwrap();
    assert_eq!(u32::from_le_bytes(cause), ResetCause::Watchdog as u32);
}

#[test]
fn plic_claim_complete_round_trip() {
    let config = Config::default();
    let mut system = System::new(config);

    // PLIC register layout (spec §6): priority[source] at source*4, target 0's
    // enable bitmap at 0x2000, claim/complete at 0x200000 + 4.
    const PRIORITY_SOURCE_1: u64 = 4;
    const ENABLE_TARGET_0: u64 = 0x2000;
    const CLAIM_COMPLETE_TARGET_0: u64 = 0x200004;

    system.plic.write(AgentId::Named("test"), PRIORITY_SOURCE_1, &5u32.to_le_bytes()).unwrap();
    system.plic.write(AgentId::Named("test"), ENABLE_TARGET_0, &0b10u32.to_le_bytes()).unwrap();

    system.plic.raise(1);
    assert!(system.plic_lines[0].is_pending());

    let mut claimed = [0u8; 4];
    system.plic.read(AgentId::Named("test"), CLAIM_COMPLETE_TARGET_0, &mut claimed).unwrap();
    assert_eq!(u32::from_le_bytes(claimed), 1);
    assert!(!system.plic_lines[0].is_pending());

    system.plic.write(AgentId::Named("test"), CLAIM_COMPLETE_TARGET_0, &1u32.to_le_bytes()).unwrap();
    system.plic.raise(1);
    assert!(system.plic_lines[0].is_pending(), "source is no longer in flight, raising it again is observable");
}

#[test]
fn debug_program_buffer_retires_then_reports_executed() {
    let mut config = Config::default();
    config.topology.shires = 1;
    config.topology.neighborhoods_per_shire = 1;
    config.topology.minions_per_neighborhood = 1;
    let mut system = System::new(config);
    let id = HartId::new(0, 0, 0, 0);

    // dmctrl.dmactive (bit 0) and hactrl selecting hart 0 (bit 0), then
    // dmctrl.haltreq (bit 31) — documented bit positions (spec §6).
    const DMACTIVE: u32 = 1 << 0;
    const HALTREQ: u32 = 1 << 31;
    const HACTRL: usize = 10;

    let _ = system.esr.neighborhood_mut(0, 0).unwrap().write(HACTRL, 1).unwrap();
    system.dm.write_dmctrl(DMACTIVE, &mut system.esr, &mut system.harts, &system.warn);
    system.dm.write_dmctrl(DMACTIVE | HALTREQ, &mut system.esr, &mut system.harts, &system.warn);
    assert_eq!(system.harts[&id].state, shirecore::hart::ExecState::Halted);

    let hart = system.harts.get_mut(&id).unwrap();
    system.dm.write_progbuf(hart, [0x0000_0013, 0x0000_0013]);
    assert_eq!(system.harts[&id].progbuf, ProgbufState::Fetching);

    let mut exec = RetiringExecutor;
    system.tick(&mut exec, None).unwrap();
    assert_eq!(system.harts[&id].progbuf, ProgbufState::Executed);
}

#[test]
fn debug_module_is_routed_on_the_fabric() {
    let mut config = Config::default();
    config.topology.shires = 1;
    config.topology.neighborhoods_per_shire = 1;
    config.topology.minions_per_neighborhood = 1;
    let mut system = System::new(config);
    let id = HartId::new(0, 0, 0, 0);

    // Fixed device base addresses and documented dmctrl bit positions (spec §6).
    const DM_BASE: u64 = 0x5000_0000;
    const DMACTIVE: u32 = 1 << 0;
    const HALTREQ: u32 = 1 << 31;
    const HACTRL: usize = 10;

    let _ = system.esr.neighborhood_mut(0, 0).unwrap().write(HACTRL, 1).unwrap();
    let dm_addr = PhysAddr::new(DM_BASE);

    system.write(AgentId::Named("test"), dm_addr, &DMACTIVE.to_le_bytes(), AccessType::Write).unwrap();
    system.write(AgentId::Named("test"), dm_addr, &(DMACTIVE | HALTREQ).to_le_bytes(), AccessType::Write).unwrap();
    assert_eq!(system.harts[&id].state, ExecState::Halted);

    let mut dmctrl = [0u8; 4];
    system.read(AgentId::Named("test"), dm_addr, &mut dmctrl, AccessType::Read).unwrap();
    assert_eq!(u32::from_le_bytes(dmctrl) & DMACTIVE, DMACTIVE, "dmactive must persist across writes");
}

#[test]
fn per_hart_debug_registers_are_routed_through_the_esr_fabric() {
    let mut config = Config::default();
    config.topology.shires = 1;
    config.topology.neighborhoods_per_shire = 1;
    config.topology.minions_per_neighborhood = 1;
    let mut system = System::new(config);
    let id = HartId::new(0, 0, 0, 0);

    const ESR_BASE: u64 = 0x1_0000_0000;
    // Register indices within the Hart-region bank, just past the message
    // port at index 0 (spec §4.D).
    const AXPROGBUF0_REG: u16 = 3;
    const DDATA0_REG: u16 = 7;

    system.harts.get_mut(&id).unwrap().state = ExecState::Halted;

    let progbuf_addr = EsrAddress::builder(EsrRegion::Hart, 0, 0, 0, AXPROGBUF0_REG);
    let progbuf_paddr = PhysAddr::new(ESR_BASE + progbuf_addr.encode());
    system
        .write(AgentId::Named("test"), progbuf_paddr, &0x0000_0013u32.to_le_bytes(), AccessType::Write)
        .unwrap();
    assert_eq!(system.harts[&id].progbuf_words[0], 0x0000_0013);
    assert_eq!(system.harts[&id].progbuf, ProgbufState::Fetching, "committing AXPROGBUF0 while halted enters program-buffer mode");

    let ddata_addr = EsrAddress::builder(EsrRegion::Hart, 0, 0, 0, DDATA0_REG);
    let ddata_paddr = PhysAddr::new(ESR_BASE + ddata_addr.encode());
    system
        .write(AgentId::Named("test"), ddata_paddr, &0xDEAD_BEEF_0000_0001u64.to_le_bytes(), AccessType::Write)
        .unwrap();
    let mut out = [0u8; 8];
    system.read(AgentId::Named("test"), ddata_paddr, &mut out, AccessType::Read).unwrap();
    assert_eq!(u64::from_le_bytes(out), 0xDEAD_BEEF_0000_0001);
}

#[test]
fn shire_other_disable_write_recomputes_active_hart_set() {
    let mut config = Config::default();
    config.topology.shires = 1;
    config.topology.neighborhoods_per_shire = 1;
    config.topology.minions_per_neighborhood = 1;
    let mut system = System::new(config);
    let id = HartId::new(0, 0, 0, 0);
    assert_eq!(system.harts[&id].state, ExecState::Running);

    const ESR_BASE: u64 = 0x1_0000_0000;
    // thread0_disable's register index within shire_other (spec §3).
    const THREAD0_DISABLE_REG: u16 = 1;

    let addr = EsrAddress::builder(EsrRegion::ShireOther, 0, 0, 0, THREAD0_DISABLE_REG);
    let paddr = PhysAddr::new(ESR_BASE + addr.encode());
    system.write(AgentId::Named("test"), paddr, &1u64.to_le_bytes(), AccessType::Write).unwrap();
    assert_eq!(system.harts[&id].state, ExecState::Nonexistent, "disabling minion 0 must retire its harts");

    system.write(AgentId::Named("test"), paddr, &0u64.to_le_bytes(), AccessType::Write).unwrap();
    assert_eq!(system.harts[&id].state, ExecState::Running, "re-enabling must bring the hart back up");
}

#[test]
fn debug_program_buffer_trap_enters_exception_substate() {
    struct TrappingExecutor;
    impl Translator for TrappingExecutor {
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
    impl InstructionExecutor for TrappingExecutor {
        fn step(&mut self, hart: &mut Hart) -> StepOutcome {
            hart.pc = hart.pc.wrapping_add(4);
            StepOutcome::Retired
        }
        fn step_progbuf(&mut self, hart: &mut Hart) -> StepOutcome {
            StepOutcome::Fatal
        }
        fn tick_async_tail(&mut self, _hart: &mut Hart) {}
    }

    let mut config = Config::default();
    config.topology.shires = 1;
    config.topology.neighborhoods_per_shire = 1;
    config.topology.minions_per_neighborhood = 1;
    let mut system = System::new(config);
    let id = HartId::new(0, 0, 0, 0);

    const DMACTIVE: u32 = 1 << 0;
    const HALTREQ: u32 = 1 << 31;
    const HACTRL: usize = 10;

    let _ = system.esr.neighborhood_mut(0, 0).unwrap().write(HACTRL, 1).unwrap();
    system.dm.write_dmctrl(DMACTIVE, &mut system.esr, &mut system.harts, &system.warn);
    system.dm.write_dmctrl(DMACTIVE | HALTREQ, &mut system.esr, &mut system.harts, &system.warn);
    let hart = system.harts.get_mut(&id).unwrap();
    system.dm.write_progbuf(hart, [0x0000_0013, 0x0000_0013]);

    let mut exec = TrappingExecutor;
    system.tick(&mut exec, None).unwrap();
    assert_eq!(system.harts[&id].progbuf, ProgbufState::Exception);
}
