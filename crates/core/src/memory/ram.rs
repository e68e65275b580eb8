//! Flat RAM region.

use crate::common::{AgentId, MemoryFault, PhysAddr};
use crate::memory::region::Region;

/// A flat byte-addressable RAM region, any size/alignment access allowed.
#[derive(Debug)]
pub struct Ram {
    base: PhysAddr,
    data: Vec<u8>,
}

impl Ram {
    /// Creates a zero-initialized RAM region of `size` bytes at `base`.
    pub fn new(base: PhysAddr, size: u64) -> Self {
        Self {
            base,
            data: vec![0u8; size as usize],
        }
    }

    fn bounds_check(&self, offset: u64, len: usize) -> Result<(), MemoryFault> {
        if offset + len as u64 > self.data.len() as u64 {
            return Err(MemoryFault::UnmappedAddress(self.base.offset(offset)));
        }
        Ok(())
    }
}

impl Region for Ram {
    fn name(&self) -> &str {
        "ram"
    }

    fn address_range(&self) -> (PhysAddr, u64) {
        (self.base, self.data.len() as u64)
    }

    fn read(&mut self, _agent: AgentId, offset: u64, out: &mut [u8]) -> Result<(), MemoryFault> {
        self.bounds_check(offset, out.len())?;
        let start = offset as usize;
        out.copy_from_slice(&self.data[start..start + out.len()]);
        Ok(())
    }

    fn write(&mut self, _agent: AgentId, offset: u64, data: &[u8]) -> Result<(), MemoryFault> {
        self.bounds_check(offset, data.len())?;
        let start = offset as usize;
        self.data[start..start + data.len()].copy_from_slice(data);
        Ok(())
    }

    fn init(&mut self, agent: AgentId, offset: u64, data: &[u8]) -> Result<(), MemoryFault> {
        self.write(agent, offset, data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mram_round_trip() {
        let mut ram = Ram::new(PhysAddr::new(0x4000_0000), 0x1000);
        let value: u64 = 0xDEAD_BEEF_CAFE_FEED;
        ram.write(AgentId::Named("test"), 0, &value.to_le_bytes())
            .unwrap();
        let mut out = [0u8; 8];
        ram.read(AgentId::Named("test"), 0, &mut out).unwrap();
        assert_eq!(u64::from_le_bytes(out), value);
    }

    #[test]
    fn out_of_bounds_faults() {
        let mut ram = Ram::new(PhysAddr::new(0), 0x10);
        let mut out = [0u8; 8];
        assert!(matches!(
            ram.read(AgentId::Named("test"), 0x20, &mut out),
            Err(MemoryFault::UnmappedAddress(_))
        ));
    }
}
