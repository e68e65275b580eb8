//! The platform-level interrupt controller (spec §4.C, §6).
//!
//! Generalized over `S` sources and `T` targets, unlike the teacher's
//! fixed two-context PLIC: this variant tracks per-source in-flight
//! ownership (needed for the claim/complete handshake) and invokes a
//! per-target notify callback synchronously whenever a mutation changes
//! that target's external-interrupt-pending line.

use crate::common::{AgentId, MemoryFault, PhysAddr};
use crate::memory::region::Region;

const PRIORITY_BASE: u64 = 0x000000;
const PENDING_BASE: u64 = 0x001000;
const ENABLE_BASE: u64 = 0x002000;
const CONTEXT_BASE: u64 = 0x200000;
const ENABLE_STRIDE: u64 = 0x80;
const CONTEXT_STRIDE: u64 = 0x1000;

/// One interrupt target: its notify callback and addressing identity.
pub struct Target {
    /// Stable identity used by internal data structures.
    pub name_id: u32,
    /// Identity used to key the register map (`offset / CONTEXT_STRIDE`).
    pub address_id: u32,
    /// Invoked synchronously whenever this target's `eip` transitions.
    pub notify: Box<dyn FnMut(bool) + Send + Sync>,
}

impl std::fmt::Debug for Target {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Target")
            .field("name_id", &self.name_id)
            .field("address_id", &self.address_id)
            .finish()
    }
}

#[derive(Debug, Clone, Copy, Default)]
struct SourceState {
    priority: u32,
    pending: bool,
    in_flight: Option<u32>,
}

#[derive(Debug, Default)]
struct TargetState {
    enable: Vec<bool>,
    threshold: u32,
    max_id: u32,
    eip: bool,
}

/// A parameterized PLIC with `S` sources (1-indexed, index 0 reserved)
/// and a small fixed set of targets.
pub struct Plic {
    base: PhysAddr,
    sources: Vec<SourceState>,
    targets: Vec<Target>,
    target_state: Vec<TargetState>,
}

impl std::fmt::Debug for Plic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Plic")
            .field("sources", &self.sources.len())
            .field("targets", &self.targets.len())
            .finish()
    }
}

impl Plic {
    /// Creates a PLIC with `source_count` sources (plus reserved id 0) and
    /// the given `targets`.
    pub fn new(base: PhysAddr, source_count: usize, targets: Vec<Target>) -> Self {
        let target_state = targets
            .iter()
            .map(|_| TargetState {
                enable: vec![false; source_count + 1],
                threshold: 0,
                max_id: 0,
                eip: false,
            })
            .collect();
        Self {
            base,
            sources: vec![SourceState::default(); source_count + 1],
            targets,
            target_state,
        }
    }

    fn target_index(&self, address_id: u32) -> Option<usize> {
        self.targets.iter().position(|t| t.address_id == address_id)
    }

    /// Raises source `id` (sets pending) and re-runs the scheduler.
    pub fn raise(&mut self, id: u32) {
        if let Some(s) = self.sources.get_mut(id as usize) {
            s.pending = true;
        }
        self.reschedule_all();
    }

    /// Clears a source's pending bit directly (external line deasserted)
    /// without going through claim, then re-runs the scheduler.
    pub fn clear_pending(&mut self, id: u32) {
        if let Some(s) = self.sources.get_mut(id as usize) {
            s.pending = false;
        }
        self.reschedule_all();
    }

    /// Target `address_id` claims its current `max_id`; clears the
    /// source's pending bit and marks it in-flight, owned by this target.
    pub fn claim(&mut self, address_id: u32) -> u32 {
        let Some(idx) = self.target_index(address_id) else {
            return 0;
        };
        let max_id = self.target_state[idx].max_id;
        if max_id != 0 {
            let name_id = self.targets[idx].name_id;
            if let Some(s) = self.sources.get_mut(max_id as usize) {
                s.pending = false;
                s.in_flight = Some(name_id);
            }
            self.reschedule_all();
        }
        max_id
    }

    /// Target `address_id` completes source `id`; ignored unless that
    /// source is in-flight and owned by this target.
    pub fn complete(&mut self, address_id: u32, id: u32) {
        let Some(idx) = self.target_index(address_id) else {
            return;
        };
        let name_id = self.targets[idx].name_id;
        if let Some(s) = self.sources.get_mut(id as usize) {
            if s.in_flight == Some(name_id) {
                s.in_flight = None;
                self.reschedule_all();
            }
        }
    }

    fn reschedule_all(&mut self) {
        for t in 0..self.targets.len() {
            self.reschedule_target(t);
        }
    }

    /// Scans sources ascending; ties on priority resolve to the lowest id (spec §4.C).
    fn reschedule_target(&mut self, t: usize) {
        let threshold = self.target_state[t].threshold;
        let enable = &self.target_state[t].enable;
        let mut winner = 0u32;
        let mut winner_priority = threshold;
        for (id, s) in self.sources.iter().enumerate() {
            if id == 0 || s.in_flight.is_some() || !s.pending {
                continue;
            }
            if !enable.get(id).copied().unwrap_or(false) {
                continue;
            }
            if s.priority > winner_priority {
                winner_priority = s.priority;
                winner = id as u32;
            }
        }
        self.target_state[t].max_id = winner;
        let should_raise = winner != 0;
        if should_raise != self.target_state[t].eip {
            self.target_state[t].eip = should_raise;
            (self.targets[t].notify)(should_raise);
        }
    }
}

impl Region for Plic {
    fn name(&self) -> &str {
        "plic"
    }

    fn address_range(&self) -> (PhysAddr, u64) {
        (self.base, CONTEXT_BASE + CONTEXT_STRIDE * self.targets.len().max(1) as u64)
    }

    fn read(&mut self, _agent: AgentId, offset: u64, out: &mut [u8]) -> Result<(), MemoryFault> {
        if out.len() != 4 {
            return Err(MemoryFault::WrongSize { addr: self.base.offset(offset), size: out.len() });
        }
        let fault_addr = self.base.offset(offset);
        let val = if (PRIORITY_BASE..PENDING_BASE).contains(&offset) {
            let idx = ((offset - PRIORITY_BASE) / 4) as usize;
            self.sources.get(idx).map_or(0, |s| s.priority)
        } else if (PENDING_BASE..ENABLE_BASE).contains(&offset) {
            let word = ((offset - PENDING_BASE) / 4) as usize;
            let mut bits = 0u32;
            for (id, s) in self.sources.iter().enumerate() {
                if id / 32 == word && s.pending {
                    bits |= 1 << (id % 32);
                }
            }
            bits
        } else if (ENABLE_BASE..CONTEXT_BASE).contains(&offset) {
            let rel = offset - ENABLE_BASE;
            let t = (rel / ENABLE_STRIDE) as usize;
            let word = ((rel % ENABLE_STRIDE) / 4) as usize;
            let Some(state) = self.target_state.get(t) else {
                return Err(MemoryFault::UnmappedAddress(fault_addr));
            };
            let mut bits = 0u32;
            for (id, enabled) in state.enable.iter().enumerate() {
                if id / 32 == word && *enabled {
                    bits |= 1 << (id % 32);
                }
            }
            bits
        } else if offset >= CONTEXT_BASE {
            let rel = offset - CONTEXT_BASE;
            let address_id = (rel / CONTEXT_STRIDE) as u32;
            let reg = rel % CONTEXT_STRIDE;
            match reg {
                0 => self.target_index(address_id).map_or(0, |i| self.target_state[i].threshold),
                4 => self.claim(address_id),
                _ => return Err(MemoryFault::UnknownRegister(fault_addr)),
            }
        } else {
            return Err(MemoryFault::UnmappedAddress(fault_addr));
        };
        out.copy_from_slice(&val.to_le_bytes());
        Ok(())
    }

    fn write(&mut self, _agent: AgentId, offset: u64, data: &[u8]) -> Result<(), MemoryFault> {
        if data.len() != 4 {
            return Err(MemoryFault::WrongSize { addr: self.base.offset(offset), size: data.len() });
        }
        let fault_addr = self.base.offset(offset);
        let mut bytes = [0u8; 4];
        bytes.copy_from_slice(data);
        let val = u32::from_le_bytes(bytes);

        if (PRIORITY_BASE..PENDING_BASE).contains(&offset) {
            let idx = ((offset - PRIORITY_BASE) / 4) as usize;
            if let Some(s) = self.sources.get_mut(idx) {
                s.priority = val & 0x7;
            }
            self.reschedule_all();
        } else if (PENDING_BASE..ENABLE_BASE).contains(&offset) {
            return Err(MemoryFault::ReadOnlyViolation(fault_addr));
        } else if (ENABLE_BASE..CONTEXT_BASE).contains(&offset) {
            let rel = offset - ENABLE_BASE;
            let t = (rel / ENABLE_STRIDE) as usize;
            let word = ((rel % ENABLE_STRIDE) / 4) as usize;
            let Some(state) = self.target_state.get_mut(t) else {
                return Err(MemoryFault::UnmappedAddress(fault_addr));
            };
            for bit in 0..32 {
                let id = word * 32 + bit;
                if let Some(slot) = state.enable.get_mut(id) {
                    *slot = val & (1 << bit) != 0;
                }
            }
            self.reschedule_all();
        } else if offset >= CONTEXT_BASE {
            let rel = offset - CONTEXT_BASE;
            let address_id = (rel / CONTEXT_STRIDE) as u32;
            let reg = rel % CONTEXT_STRIDE;
            match reg {
                0 => {
                    if let Some(i) = self.target_index(address_id) {
                        self.target_state[i].threshold = val & 0x7;
                    }
                    self.reschedule_all();
                }
                4 => self.complete(address_id, val),
                _ => return Err(MemoryFault::UnknownRegister(fault_addr)),
            }
        } else {
            return Err(MemoryFault::UnmappedAddress(fault_addr));
        }
        Ok(())
    }

    fn init(&mut self, agent: AgentId, offset: u64, data: &[u8]) -> Result<(), MemoryFault> {
        self.write(agent, offset, data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;

    fn plic_with_one_target() -> (Plic, Arc<AtomicBool>) {
        let raised = Arc::new(AtomicBool::new(false));
        let flag = raised.clone();
        let target = Target {
            name_id: 0,
            address_id: 0,
            notify: Box::new(move |r| flag.store(r, Ordering::SeqCst)),
        };
        (Plic::new(PhysAddr::new(0x3000_0000), 8, vec![target]), raised)
    }

    #[test]
    fn claim_complete_round_trip() {
        let (mut plic, raised) = plic_with_one_target();
        plic.write(AgentId::Named("x"), PRIORITY_BASE + 4, &5u32.to_le_bytes()).unwrap();
        plic.write(AgentId::Named("x"), ENABLE_BASE, &0b10u32.to_le_bytes()).unwrap();
        plic.raise(1);
        assert!(raised.load(Ordering::SeqCst));

        let mut claim_buf = [0u8; 4];
        plic.read(AgentId::Named("x"), CONTEXT_BASE + 4, &mut claim_buf).unwrap();
        assert_eq!(u32::from_le_bytes(claim_buf), 1);
        assert!(!raised.load(Ordering::SeqCst));

        plic.write(AgentId::Named("x"), CONTEXT_BASE + 4, &1u32.to_le_bytes()).unwrap();
        plic.raise(1);
        assert!(raised.load(Ordering::SeqCst));
    }

    #[test]
    fn ties_favor_lowest_id() {
        let (mut plic, _raised) = plic_with_one_target();
        plic.write(AgentId::Named("x"), PRIORITY_BASE + 4, &3u32.to_le_bytes()).unwrap();
        plic.write(AgentId::Named("x"), PRIORITY_BASE + 8, &3u32.to_le_bytes()).unwrap();
        plic.write(AgentId::Named("x"), ENABLE_BASE, &0b110u32.to_le_bytes()).unwrap();
        plic.raise(1);
        plic.raise(2);
        assert_eq!(plic.claim(0), 1);
    }

    #[test]
    fn writing_pending_faults() {
        let (mut plic, _raised) = plic_with_one_target();
        let err = plic.write(AgentId::Named("x"), PENDING_BASE, &1u32.to_le_bytes()).unwrap_err();
        assert!(matches!(err, MemoryFault::ReadOnlyViolation(_)));
    }
}
