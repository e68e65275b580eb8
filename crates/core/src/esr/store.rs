//! The ESR store: decodes addresses, polices accesses, and ties the
//! neighborhood/cache/other/memory-shire banks together behind the
//! [`Region`] contract (spec §4.A, §4.B).

use crate::common::{AgentId, HartId, MemoryFault, PhysAddr};
use crate::esr::address::{
    is_local_shire, EsrAddress, ALIGN_MASK, BANK_ALL_SENTINEL, SELECTOR_ALL_SENTINEL,
};
use crate::esr::memory_shire::{MemoryShireBank, MemoryShireSubBank};
use crate::esr::neighborhood::NeighborhoodBank;
use crate::esr::register::{ResetKind, WriteOutcome};
use crate::esr::shire_cache::ShireCacheBank;
use crate::esr::shire_other::{self, ShireOtherBank};
use crate::esr::{EsrRegion, CACHE_BANKS_PER_SHIRE};
use crate::log::WarnSink;
use crate::memory::region::Region;

/// Register index (within the shire-other bank's address space) of the
/// latched broadcast payload register.
///
/// `reg_index` is an 8-bit address field (`esr::address`'s regularized
/// layout), so these sentinels sit just above every real shire-other
/// register (largest table tops out at 44) rather than in four-digit space.
const BROADCAST_DATA_REG: u16 = 255;
/// Register index of the U-mode broadcast command register.
const U_BROADCAST_REG: u16 = 254;
/// Register index of the S-mode broadcast command register.
const S_BROADCAST_REG: u16 = 253;
/// Register index of the M-mode broadcast command register.
const M_BROADCAST_REG: u16 = 252;

/// One hart's message-port payload (spec §4.B "hart message ports").
const HART_MESSAGE_PORT_REG: u16 = 0;
/// No-commit program-buffer word 0 (spec §4.D `NXPROGBUF0`).
const HART_NXPROGBUF0_REG: u16 = 1;
/// No-commit program-buffer word 1 (spec §4.D `NXPROGBUF1`).
const HART_NXPROGBUF1_REG: u16 = 2;
/// Commit program-buffer word 0 (spec §4.D `AXPROGBUF0`).
const HART_AXPROGBUF0_REG: u16 = 3;
/// Commit program-buffer word 1 (spec §4.D `AXPROGBUF1`).
const HART_AXPROGBUF1_REG: u16 = 4;
/// Commit data-shuttle low half (spec §4.D `AXDATA0`).
const HART_AXDATA0_REG: u16 = 5;
/// Commit data-shuttle high half (spec §4.D `AXDATA1`).
const HART_AXDATA1_REG: u16 = 6;
/// The full 64-bit data-shuttle register (spec §4.D `DDATA0`).
const HART_DDATA0_REG: u16 = 7;

/// A fan-out broadcast's effect on one target shire, for diagnostics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BroadcastOutcome {
    /// The per-target write succeeded.
    Applied,
    /// The per-target write faulted; the fan-out continued regardless (spec §4.B).
    Faulted,
}

/// What a caller with access to the rest of the system (harts, scheduler)
/// must now apply after a side-effecting ESR write (spec §4.B: "side-effect
/// registers trigger actions"). Broadcast fan-out is its own side effect,
/// handled inline in [`EsrStore::write_shire_other`], and never reaches here.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SideEffect {
    /// No further action required.
    None,
    /// `shire`'s thread-disable masks changed; recompute its active hart set.
    RecomputeEnablement {
        /// The shire whose `thread0_disable`/`thread1_disable` changed.
        shire: u8,
    },
    /// `shire`'s `coop_mode` changed; flush outstanding prefetches.
    FlushPrefetch {
        /// The shire whose `coop_mode` changed.
        shire: u8,
    },
}

/// One per-hart debug-program-buffer or data-shuttle register (spec §4.D),
/// decoded from a Hart-region ESR address. Storage for these lives on
/// [`crate::hart::Hart`] itself, which `EsrStore` has no access to; the
/// system layer reads/writes it directly once this names which hart and
/// which register.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HartDebugReg {
    /// `NXPROGBUF0/1`: stage an instruction word without committing.
    NxProgbuf(usize),
    /// `AXPROGBUF0/1`: commit an instruction word, entering program-buffer
    /// mode if the hart is halted.
    AxProgbuf(usize),
    /// `AXDATA0/1`: commit a 32-bit half of the data shuttle, entering
    /// program-buffer mode if the hart is halted.
    AxData(usize),
    /// `DDATA0`: the full 64-bit data-shuttle register, no commit semantics.
    Ddata,
}

/// Ties every ESR bank together behind the region contract.
pub struct EsrStore {
    base: PhysAddr,
    shires: u8,
    neighborhoods_per_shire: u8,
    harts_per_neighborhood: u8,
    neighborhoods: Vec<Vec<NeighborhoodBank>>,
    cache_banks: Vec<[ShireCacheBank; CACHE_BANKS_PER_SHIRE]>,
    other: Vec<ShireOtherBank>,
    memory_shire: Vec<MemoryShireBank>,
    hart_ports: Vec<Vec<u32>>,
    broadcast_data: Vec<u64>,
    warn: WarnSink,
}

impl std::fmt::Debug for EsrStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EsrStore")
            .field("shires", &self.shires)
            .field("neighborhoods_per_shire", &self.neighborhoods_per_shire)
            .finish()
    }
}

impl EsrStore {
    /// Creates a store sized per the chip topology.
    pub fn new(
        base: PhysAddr,
        shires: u8,
        neighborhoods_per_shire: u8,
        harts_per_neighborhood: u8,
        warn: WarnSink,
    ) -> Self {
        let neighborhoods = (0..shires)
            .map(|_| (0..neighborhoods_per_shire).map(|_| NeighborhoodBank::new()).collect())
            .collect();
        let cache_banks = (0..shires)
            .map(|_| std::array::from_fn(|_| ShireCacheBank::new()))
            .collect();
        let other = (0..shires).map(|s| ShireOtherBank::new(s)).collect();
        let memory_shire = (0..shires).map(|_| MemoryShireBank::new()).collect();
        let hart_ports = (0..shires)
            .map(|_| vec![0u32; usize::from(neighborhoods_per_shire) * usize::from(harts_per_neighborhood)])
            .collect();
        Self {
            base,
            shires,
            neighborhoods_per_shire,
            harts_per_neighborhood,
            neighborhoods,
            cache_banks,
            other,
            memory_shire,
            hart_ports,
            broadcast_data: vec![0u64; shires as usize],
            warn,
        }
    }

    /// Resets every bank's `kind`-tagged registers.
    pub fn reset(&mut self, kind: ResetKind) {
        for shire in &mut self.neighborhoods {
            for nbhd in shire {
                nbhd.reset(kind);
            }
        }
        for shire in &mut self.cache_banks {
            for bank in shire {
                bank.reset(kind);
            }
        }
        for bank in &mut self.other {
            bank.reset(kind);
        }
        for bank in &mut self.memory_shire {
            bank.reset(kind);
        }
    }

    /// Read-only access to one neighborhood's bank (used by the debug module's L0 tree).
    pub fn neighborhood(&self, shire: u8, nbhd: u8) -> Option<&NeighborhoodBank> {
        self.neighborhoods.get(usize::from(shire))?.get(usize::from(nbhd))
    }

    /// Mutable access to one neighborhood's bank (used by the debug module's writes).
    pub fn neighborhood_mut(&mut self, shire: u8, nbhd: u8) -> Option<&mut NeighborhoodBank> {
        self.neighborhoods.get_mut(usize::from(shire))?.get_mut(usize::from(nbhd))
    }

    /// Per-shire thread-disable masks `(thread0_disable, thread1_disable)`
    /// from the shire's "other" bank, used by cold/warm reset to decide
    /// which harts come up enabled (spec §3).
    pub fn thread_disable_masks(&self, shire: u8) -> Option<(u64, u64)> {
        self.other.get(usize::from(shire)).map(ShireOtherBank::thread_disable_masks)
    }

    /// Number of shires this store was sized for.
    pub fn shires(&self) -> u8 {
        self.shires
    }

    /// Number of neighborhoods per shire this store was sized for.
    pub fn neighborhoods_per_shire(&self) -> u8 {
        self.neighborhoods_per_shire
    }

    /// Number of selectable harts per neighborhood this store was sized for.
    pub fn harts_per_neighborhood(&self) -> u8 {
        self.harts_per_neighborhood
    }

    /// Decodes a Hart-region address into the hart it targets and which
    /// debug-program-buffer/data-shuttle register it names, or `None` if the
    /// address doesn't decode, targets another region, or names the message
    /// port (handled by the ordinary [`Region::read`]/[`Region::write`] path).
    pub(crate) fn hart_debug_register(&self, agent: AgentId, offset: u64) -> Option<(HartId, HartDebugReg)> {
        let addr = self.decode(agent, offset).ok()?;
        if addr.region != EsrRegion::Hart {
            return None;
        }
        let reg = match addr.reg_index {
            HART_NXPROGBUF0_REG => HartDebugReg::NxProgbuf(0),
            HART_NXPROGBUF1_REG => HartDebugReg::NxProgbuf(1),
            HART_AXPROGBUF0_REG => HartDebugReg::AxProgbuf(0),
            HART_AXPROGBUF1_REG => HartDebugReg::AxProgbuf(1),
            HART_AXDATA0_REG => HartDebugReg::AxData(0),
            HART_AXDATA1_REG => HartDebugReg::AxData(1),
            HART_DDATA0_REG => HartDebugReg::Ddata,
            _ => return None,
        };
        let harts_per_neighborhood = self.harts_per_neighborhood.max(1);
        let nbhd = addr.bank_or_hart / harts_per_neighborhood;
        let bit_pos = u32::from(addr.bank_or_hart % harts_per_neighborhood);
        let id = HartId::new(addr.shire, nbhd, (bit_pos / 2) as u8, (bit_pos % 2) as u8);
        Some((id, reg))
    }

    fn agent_shire(agent: AgentId) -> Option<u8> {
        match agent {
            AgentId::Hart(h) => Some(h.shire),
            AgentId::Named(_) => None,
        }
    }

    fn decode(&self, agent: AgentId, offset: u64) -> Result<EsrAddress, MemoryFault> {
        let fault_addr = self.base.offset(offset);
        if offset & ALIGN_MASK != 0 {
            return Err(MemoryFault::Unaligned(fault_addr));
        }
        if is_local_shire(offset) && Self::agent_shire(agent).is_none() {
            return Err(MemoryFault::PrivilegeViolation(fault_addr));
        }
        EsrAddress::decode(offset, Self::agent_shire(agent)).map_err(|()| MemoryFault::UnknownRegister(fault_addr))
    }

    fn read_scalar(&mut self, agent: AgentId, addr: EsrAddress, fault_addr: PhysAddr) -> Result<u64, MemoryFault> {
        let shire = usize::from(addr.shire);
        match addr.region {
            EsrRegion::Hart => {
                let ports = self.hart_ports.get(shire).ok_or(MemoryFault::UnmappedAddress(fault_addr))?;
                if addr.reg_index != HART_MESSAGE_PORT_REG {
                    return Err(MemoryFault::UnknownRegister(fault_addr));
                }
                ports
                    .get(usize::from(addr.bank_or_hart))
                    .map(|v| u64::from(*v))
                    .ok_or(MemoryFault::UnmappedAddress(fault_addr))
            }
            EsrRegion::Neighborhood => {
                let nbhd = self
                    .neighborhood_mut(addr.shire, addr.selector)
                    .ok_or(MemoryFault::UnmappedAddress(fault_addr))?;
                nbhd.read(addr.reg_index as usize).ok_or(MemoryFault::UnknownRegister(fault_addr))
            }
            EsrRegion::ShireCache => {
                let banks = self.cache_banks.get_mut(shire).ok_or(MemoryFault::UnmappedAddress(fault_addr))?;
                let bank = banks.get_mut(usize::from(addr.bank_or_hart)).ok_or(MemoryFault::UnmappedAddress(fault_addr))?;
                bank.read(addr.reg_index as usize).ok_or(MemoryFault::UnknownRegister(fault_addr))
            }
            EsrRegion::ShireOther => self.read_shire_other(addr, fault_addr),
            EsrRegion::MemoryShire => {
                let which = if addr.selector == 0 { MemoryShireSubBank::Ddrc } else { MemoryShireSubBank::Ms };
                let bank = self.memory_shire.get_mut(shire).ok_or(MemoryFault::UnmappedAddress(fault_addr))?;
                bank.read(which, addr.reg_index as usize).ok_or(MemoryFault::UnknownRegister(fault_addr))
            }
        }
        .map_err(|e: MemoryFault| {
            let _ = self.warn.esrs(format!("{agent} read fault: {e}"));
            e
        })
    }

    fn read_shire_other(&mut self, addr: EsrAddress, fault_addr: PhysAddr) -> Result<u64, MemoryFault> {
        let shire = usize::from(addr.shire);
        match addr.reg_index {
            BROADCAST_DATA_REG => self
                .broadcast_data
                .get(shire)
                .copied()
                .ok_or(MemoryFault::UnmappedAddress(fault_addr)),
            U_BROADCAST_REG | S_BROADCAST_REG | M_BROADCAST_REG => Ok(0),
            idx => {
                let bank = self.other.get_mut(shire).ok_or(MemoryFault::UnmappedAddress(fault_addr))?;
                bank.read(idx as usize).ok_or(MemoryFault::UnknownRegister(fault_addr))
            }
        }
    }

    /// Writes `val` at the decoded address, returning any side effect the
    /// caller (the hart scheduler / system wrapper) must now apply.
    fn write_scalar(&mut self, agent: AgentId, addr: EsrAddress, val: u64, fault_addr: PhysAddr) -> Result<Option<WriteOutcome>, MemoryFault> {
        let shire = usize::from(addr.shire);
        let result = match addr.region {
            EsrRegion::Hart => {
                if addr.reg_index != HART_MESSAGE_PORT_REG {
                    return Err(MemoryFault::UnknownRegister(fault_addr));
                }
                let ports = self.hart_ports.get_mut(shire).ok_or(MemoryFault::UnmappedAddress(fault_addr))?;
                let slot = ports
                    .get_mut(usize::from(addr.bank_or_hart))
                    .ok_or(MemoryFault::UnmappedAddress(fault_addr))?;
                *slot = val as u32;
                Ok(None)
            }
            EsrRegion::Neighborhood => {
                let targets = self.neighborhood_selector_targets(addr.shire, addr.selector)?;
                let mut outcome = None;
                for nbhd in targets {
                    let bank = self.neighborhood_mut(addr.shire, nbhd).ok_or(MemoryFault::UnmappedAddress(fault_addr))?;
                    outcome = bank.write(addr.reg_index as usize, val).ok_or(MemoryFault::UnknownRegister(fault_addr))?.into();
                }
                Ok(outcome)
            }
            EsrRegion::ShireCache => {
                let targets = self.cache_bank_targets(addr.bank_or_hart);
                let banks = self.cache_banks.get_mut(shire).ok_or(MemoryFault::UnmappedAddress(fault_addr))?;
                let mut outcome = None;
                for bank_idx in targets {
                    let bank = banks.get_mut(bank_idx).ok_or(MemoryFault::UnmappedAddress(fault_addr))?;
                    outcome = bank.write(addr.reg_index as usize, val).ok_or(MemoryFault::UnknownRegister(fault_addr))?.into();
                }
                Ok(outcome)
            }
            EsrRegion::ShireOther => self.write_shire_other(addr, val, fault_addr),
            EsrRegion::MemoryShire => {
                let which = if addr.selector == 0 { MemoryShireSubBank::Ddrc } else { MemoryShireSubBank::Ms };
                let bank = self.memory_shire.get_mut(shire).ok_or(MemoryFault::UnmappedAddress(fault_addr))?;
                Ok(bank.write(which, addr.reg_index as usize, val).ok_or(MemoryFault::UnknownRegister(fault_addr))?.into())
            }
        };
        if let Err(e) = &result {
            let _ = self.warn.esrs(format!("{agent} write fault: {e}"));
        }
        result
    }

    fn neighborhood_selector_targets(&self, shire: u8, selector: u8) -> Result<Vec<u8>, MemoryFault> {
        if selector == SELECTOR_ALL_SENTINEL {
            Ok((0..self.neighborhoods_per_shire).collect())
        } else if usize::from(selector) < self.neighborhoods.get(usize::from(shire)).map_or(0, Vec::len) {
            Ok(vec![selector])
        } else {
            Err(MemoryFault::UnmappedAddress(self.base))
        }
    }

    fn cache_bank_targets(&self, bank_or_hart: u8) -> Vec<usize> {
        if bank_or_hart == BANK_ALL_SENTINEL {
            (0..CACHE_BANKS_PER_SHIRE).collect()
        } else {
            vec![usize::from(bank_or_hart)]
        }
    }

    fn write_shire_other(&mut self, addr: EsrAddress, val: u64, fault_addr: PhysAddr) -> Result<Option<WriteOutcome>, MemoryFault> {
        let shire = usize::from(addr.shire);
        match addr.reg_index {
            BROADCAST_DATA_REG => {
                let slot = self.broadcast_data.get_mut(shire).ok_or(MemoryFault::UnmappedAddress(fault_addr))?;
                *slot = val;
                Ok(None)
            }
            U_BROADCAST_REG | S_BROADCAST_REG | M_BROADCAST_REG => {
                let _ = self.run_broadcast(addr.shire, val);
                Ok(None)
            }
            idx => {
                let bank = self.other.get_mut(shire).ok_or(MemoryFault::UnmappedAddress(fault_addr))?;
                Ok(bank.write(idx as usize, val).ok_or(MemoryFault::UnknownRegister(fault_addr))?.into())
            }
        }
    }

    /// Decodes and executes a broadcast-command write (spec §4.B, §6).
    ///
    /// Payload layout (regularized, see `address.rs`'s module doc for why):
    /// `[63:62] prot`, `[61:57] sregion`, `[56:42] addr (selector:4 | bank_or_hart:4 | reg_index:7)`,
    /// `[41:40] reserved`, `[39:0] shire_mask`.
    fn run_broadcast(&mut self, source_shire: u8, payload: u64) -> Vec<BroadcastOutcome> {
        let sregion = ((payload >> 57) & 0x1F) as u8;
        let addr_bits = (payload >> 42) & 0x7FFF;
        let selector = ((addr_bits >> 11) & 0xF) as u8;
        let bank_or_hart = ((addr_bits >> 7) & 0xF) as u8;
        let reg_index = (addr_bits & 0x7F) as u16;
        let shire_mask = payload & 0xFF_FFFF_FFFF;
        let data = self.broadcast_data.get(usize::from(source_shire)).copied().unwrap_or(0);

        let Ok(region) = broadcast_region_from_sregion(sregion) else {
            let _ = self.warn.esrs(format!("broadcast from shire {source_shire}: unknown sregion {sregion}"));
            return Vec::new();
        };

        let mut outcomes = Vec::new();
        for shire in 0..self.shires {
            if shire_mask & (1u64 << shire) == 0 {
                continue;
            }
            let target = EsrAddress::builder(region, shire, selector, bank_or_hart, reg_index);
            let fault_addr = self.base.offset(target.encode());
            let outcome = self.write_scalar(AgentId::Named("broadcast"), target, data, fault_addr);
            outcomes.push(if outcome.is_ok() { BroadcastOutcome::Applied } else { BroadcastOutcome::Faulted });
        }
        outcomes
    }
}

fn broadcast_region_from_sregion(sregion: u8) -> Result<EsrRegion, ()> {
    match sregion {
        0 => Ok(EsrRegion::Neighborhood),
        1 => Ok(EsrRegion::ShireCache),
        2 => Ok(EsrRegion::ShireOther),
        3 => Ok(EsrRegion::MemoryShire),
        _ => Err(()),
    }
}

impl Region for EsrStore {
    fn name(&self) -> &str {
        "esr"
    }

    fn address_range(&self) -> (PhysAddr, u64) {
        (self.base, 1u64 << 43)
    }

    fn read(&mut self, agent: AgentId, offset: u64, out: &mut [u8]) -> Result<(), MemoryFault> {
        if out.len() != 8 {
            return Err(MemoryFault::WrongSize { addr: self.base.offset(offset), size: out.len() });
        }
        let fault_addr = self.base.offset(offset);
        let addr = self.decode(agent, offset)?;
        let val = self.read_scalar(agent, addr, fault_addr)?;
        out.copy_from_slice(&val.to_le_bytes());
        Ok(())
    }

    fn write(&mut self, agent: AgentId, offset: u64, data: &[u8]) -> Result<(), MemoryFault> {
        let _ = self.write_with_effect(agent, offset, data)?;
        Ok(())
    }

    fn init(&mut self, agent: AgentId, offset: u64, data: &[u8]) -> Result<(), MemoryFault> {
        self.write(agent, offset, data)
    }
}

impl EsrStore {
    /// Same as [`Region::write`], but surfaces the [`SideEffect`] a
    /// side-effecting register's write demands (spec §4.B). The generic
    /// `Region::write` path (used for ordinary bus traffic and broadcast
    /// fan-out) has no caller able to act on this, so it drops the result;
    /// [`crate::system::System::write`] calls this directly instead so it
    /// can apply the effect against harts/scheduler it owns and `EsrStore`
    /// doesn't.
    pub(crate) fn write_with_effect(&mut self, agent: AgentId, offset: u64, data: &[u8]) -> Result<SideEffect, MemoryFault> {
        if data.len() != 8 {
            return Err(MemoryFault::WrongSize { addr: self.base.offset(offset), size: data.len() });
        }
        let fault_addr = self.base.offset(offset);
        let addr = self.decode(agent, offset)?;
        let mut bytes = [0u8; 8];
        bytes.copy_from_slice(data);
        let val = u64::from_le_bytes(bytes);
        let outcome = self.write_scalar(agent, addr, val, fault_addr)?;
        Ok(Self::side_effect_for(addr, outcome))
    }

    /// Maps a completed side-effecting write to the action the system layer
    /// must now take. Only `shire_other`'s `thread0/1_disable` and
    /// `coop_mode` registers are side-effecting outside of broadcast
    /// fan-out (which is applied inline in [`Self::run_broadcast`] and never
    /// reaches here as a plain bus write).
    fn side_effect_for(addr: EsrAddress, outcome: Option<WriteOutcome>) -> SideEffect {
        if outcome != Some(WriteOutcome::RunSideEffect) || addr.region != EsrRegion::ShireOther {
            return SideEffect::None;
        }
        match addr.reg_index as usize {
            shire_other::THREAD0_DISABLE | shire_other::THREAD1_DISABLE => SideEffect::RecomputeEnablement { shire: addr.shire },
            shire_other::COOP_MODE => SideEffect::FlushPrefetch { shire: addr.shire },
            _ => SideEffect::None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::HartId;
    use crate::config::WarnPromotion;

    fn store() -> EsrStore {
        EsrStore::new(PhysAddr::new(0x1_0000_0000), 4, 4, 16, WarnSink::new(WarnPromotion::default()))
    }

    #[test]
    fn neighborhood_register_round_trips() {
        let mut s = store();
        let addr = EsrAddress::builder(EsrRegion::Neighborhood, 1, 2, 0, 0);
        let mut buf = 0x1234u64.to_le_bytes();
        s.write(AgentId::Hart(HartId::new(1, 2, 0, 0)), addr.encode(), &buf).unwrap();
        s.read(AgentId::Hart(HartId::new(1, 2, 0, 0)), addr.encode(), &mut buf).unwrap();
        assert_eq!(u64::from_le_bytes(buf), 0x1234);
    }

    #[test]
    fn wrong_size_faults() {
        let mut s = store();
        let addr = EsrAddress::builder(EsrRegion::Neighborhood, 1, 2, 0, 0);
        let mut buf = [0u8; 4];
        let err = s.read(AgentId::Named("x"), addr.encode(), &mut buf).unwrap_err();
        assert!(matches!(err, MemoryFault::WrongSize { .. }));
    }

    #[test]
    fn unaligned_faults() {
        let mut s = store();
        let mut buf = [0u8; 8];
        let err = s.read(AgentId::Named("x"), 1, &mut buf).unwrap_err();
        assert!(matches!(err, MemoryFault::Unaligned(_)));
    }

    #[test]
    fn local_shire_requires_hart_agent() {
        let mut s = store();
        let addr = EsrAddress::builder(EsrRegion::Neighborhood, crate::esr::SHIRE_LOCAL_SENTINEL, 0, 0, 0);
        let mut buf = [0u8; 8];
        let err = s.read(AgentId::Named("watchdog"), addr.encode(), &mut buf).unwrap_err();
        assert!(matches!(err, MemoryFault::PrivilegeViolation(_)));
    }

    #[test]
    fn all_neighborhoods_broadcast_writes_every_neighborhood() {
        let mut s = store();
        let addr = EsrAddress::builder(
            EsrRegion::Neighborhood,
            0,
            SELECTOR_ALL_SENTINEL,
            0,
            crate::esr::neighborhood::NeighborhoodReg::PmuControl as u16,
        );
        let buf = 7u64.to_le_bytes();
        s.write(AgentId::Hart(HartId::new(0, 0, 0, 0)), addr.encode(), &buf).unwrap();
        for n in 0..4 {
            assert_eq!(s.neighborhood(0, n).unwrap().hactrl(), 0);
        }
    }

    #[test]
    fn broadcast_fans_out_to_shire_mask() {
        let mut s = store();
        let data_addr = EsrAddress::builder(EsrRegion::ShireOther, 0, 0, 0, BROADCAST_DATA_REG);
        s.write(AgentId::Named("x"), data_addr.encode(), &0xABCDu64.to_le_bytes()).unwrap();

        let nbhd_reg = crate::esr::neighborhood::NeighborhoodReg::PmuControl as u64;
        let selector: u64 = 0;
        let bank_or_hart: u64 = 0;
        let addr_bits = (selector << 11) | (bank_or_hart << 7) | nbhd_reg;
        let sregion: u64 = 0;
        let shire_mask: u64 = 0b1010;
        let payload = (sregion << 57) | (addr_bits << 42) | shire_mask;

        let cmd_addr = EsrAddress::builder(EsrRegion::ShireOther, 0, 0, 0, M_BROADCAST_REG);
        s.write(AgentId::Named("x"), cmd_addr.encode(), &payload.to_le_bytes()).unwrap();

        for shire in [1u8, 3u8] {
            let target = s.neighborhood(shire, 0).unwrap();
            let mut v = target.clone();
            assert_eq!(v.read(crate::esr::neighborhood::NeighborhoodReg::PmuControl as usize), Some(0xABCD));
        }
        for shire in [0u8, 2u8] {
            let target = s.neighborhood(shire, 0).unwrap();
            let mut v = target.clone();
            assert_eq!(v.read(crate::esr::neighborhood::NeighborhoodReg::PmuControl as usize), Some(0));
        }
    }
}
