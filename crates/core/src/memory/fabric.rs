//! The process-wide memory fabric (spec §4.A).

use crate::common::{AccessType, AgentId, CoreError, MemoryFault, PhysAddr, Trap};
use crate::memory::region::Region;

/// Dispatches each physical access to exactly one non-overlapping region.
pub struct MemoryFabric {
    regions: Vec<Box<dyn Region>>,
}

impl std::fmt::Debug for MemoryFabric {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryFabric")
            .field("regions", &self.regions.len())
            .finish()
    }
}

impl Default for MemoryFabric {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryFabric {
    /// Creates an empty fabric; register regions with [`Self::add_region`].
    pub fn new() -> Self {
        Self {
            regions: Vec::new(),
        }
    }

    /// Registers a region, rejecting it if it overlaps an existing one.
    ///
    /// # Errors
    /// Returns [`CoreError::OverlappingRegions`] if the new region's range
    /// intersects an already-registered region.
    pub fn add_region(&mut self, region: Box<dyn Region>) -> Result<(), CoreError> {
        let (new_base, new_size) = region.address_range();
        for existing in &self.regions {
            let (base, size) = existing.address_range();
            let overlap = new_base.val() < base.val() + size && base.val() < new_base.val() + new_size;
            if overlap {
                return Err(CoreError::OverlappingRegions(format!(
                    "{} ({:#x}..{:#x}) overlaps {} ({:#x}..{:#x})",
                    region.name(),
                    new_base.val(),
                    new_base.val() + new_size,
                    existing.name(),
                    base.val(),
                    base.val() + size
                )));
            }
        }
        self.regions.push(region);
        self.regions
            .sort_by_key(|r| r.address_range().0.val());
        Ok(())
    }

    fn find(&mut self, addr: PhysAddr) -> Option<(&mut Box<dyn Region>, u64)> {
        for region in &mut self.regions {
            let (base, size) = region.address_range();
            if addr.val() >= base.val() && addr.val() < base.val() + size {
                return Some((region, addr.val() - base.val()));
            }
        }
        None
    }

    /// Returns the region claiming `addr`, by name, if any.
    pub fn region_at(&self, addr: PhysAddr) -> Option<&str> {
        self.regions.iter().find_map(|r| {
            let (base, size) = r.address_range();
            (addr.val() >= base.val() && addr.val() < base.val() + size).then(|| r.name())
        })
    }

    /// Reads `out.len()` bytes at `addr`, raising a fault converted to a
    /// [`Trap`] via `access` on failure (spec §4.A, §7).
    pub fn read(
        &mut self,
        agent: AgentId,
        addr: PhysAddr,
        out: &mut [u8],
        access: AccessType,
    ) -> Result<(), Trap> {
        match self.find(addr) {
            Some((region, offset)) => region
                .read(agent, offset, out)
                .map_err(|fault| fault.into_trap(access)),
            None => Err(MemoryFault::UnmappedAddress(addr).into_trap(access)),
        }
    }

    /// Writes `data` at `addr`, raising a fault converted to a [`Trap`] via
    /// `access` on failure.
    pub fn write(
        &mut self,
        agent: AgentId,
        addr: PhysAddr,
        data: &[u8],
        access: AccessType,
    ) -> Result<(), Trap> {
        match self.find(addr) {
            Some((region, offset)) => region
                .write(agent, offset, data)
                .map_err(|fault| fault.into_trap(access)),
            None => Err(MemoryFault::UnmappedAddress(addr).into_trap(access)),
        }
    }

    /// Bulk-initializes `data` at `addr` (used by the loader, not all regions accept it).
    ///
    /// # Errors
    /// Returns a [`MemoryFault`] if unmapped or the region rejects bulk init.
    pub fn init(&mut self, agent: AgentId, addr: PhysAddr, data: &[u8]) -> Result<(), MemoryFault> {
        match self.find(addr) {
            Some((region, offset)) => region.init(agent, offset, data),
            None => Err(MemoryFault::UnmappedAddress(addr)),
        }
    }

    /// Debug-dumps `n_bytes` at `addr` to `stream`.
    ///
    /// # Errors
    /// Returns a [`MemoryFault`] if unmapped or the underlying write fails.
    pub fn dump_data(
        &mut self,
        agent: AgentId,
        stream: &mut dyn std::io::Write,
        addr: PhysAddr,
        n_bytes: u64,
    ) -> Result<(), MemoryFault> {
        match self.find(addr) {
            Some((region, offset)) => region.dump_data(agent, stream, offset, n_bytes),
            None => Err(MemoryFault::UnmappedAddress(addr)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::ram::Ram;

    #[test]
    fn unmapped_address_faults() {
        let mut fabric = MemoryFabric::new();
        fabric
            .add_region(Box::new(Ram::new(PhysAddr::new(0x1000), 0x100)))
            .unwrap();
        let mut out = [0u8; 4];
        let err = fabric
            .read(
                AgentId::Named("test"),
                PhysAddr::new(0x2000_0000),
                &mut out,
                AccessType::Read,
            )
            .unwrap_err();
        assert!(matches!(err, Trap::LoadAccessFault(_)));
    }

    #[test]
    fn overlapping_regions_rejected() {
        let mut fabric = MemoryFabric::new();
        fabric
            .add_region(Box::new(Ram::new(PhysAddr::new(0x1000), 0x100)))
            .unwrap();
        let err = fabric
            .add_region(Box::new(Ram::new(PhysAddr::new(0x1050), 0x100)))
            .unwrap_err();
        assert!(matches!(err, CoreError::OverlappingRegions(_)));
    }
}
