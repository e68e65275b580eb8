//! The four-operation region contract (spec §4.A).

use crate::common::{AgentId, MemoryFault, PhysAddr};

/// A region of the unified physical address space.
///
/// Every memory-mapped component (RAM, the ESR store, the PLIC, the system
/// controller) implements this trait; the [`super::fabric::MemoryFabric`]
/// dispatches each access to exactly one non-overlapping region.
pub trait Region: Send + Sync {
    /// A short name for diagnostics (`"ram"`, `"esr"`, `"plic"`, `"syscon"`).
    fn name(&self) -> &str;

    /// The `(base, size)` of this region's claim on the address space.
    fn address_range(&self) -> (PhysAddr, u64);

    /// Fills `out` with `out.len()` bytes read from `offset` within the region.
    ///
    /// # Errors
    /// Returns a [`MemoryFault`] if the size/alignment is invalid for this
    /// region or the offset names no defined register.
    fn read(&mut self, agent: AgentId, offset: u64, out: &mut [u8]) -> Result<(), MemoryFault>;

    /// Applies `data` at `offset` with region-specific write semantics
    /// (masking, side effects, read-only rejection).
    ///
    /// # Errors
    /// Returns a [`MemoryFault`] on invalid size/alignment or a read-only violation.
    fn write(&mut self, agent: AgentId, offset: u64, data: &[u8]) -> Result<(), MemoryFault>;

    /// Bulk-initializes `data` at `offset`, bypassing normal write semantics
    /// (used by the loader). Not all regions support this.
    ///
    /// # Errors
    /// Returns a [`MemoryFault`] if the region rejects bulk initialization
    /// or the range doesn't fit.
    fn init(&mut self, agent: AgentId, offset: u64, data: &[u8]) -> Result<(), MemoryFault>;

    /// Writes a human-readable debug snapshot of `n_bytes` starting at
    /// `offset` to `stream`.
    ///
    /// # Errors
    /// Returns a [`MemoryFault`] if the range is invalid; an I/O error is
    /// reported via a `MemoryFault::UnmappedAddress` sentinel since regions
    /// don't otherwise carry I/O errors in their contract.
    fn dump_data(
        &mut self,
        agent: AgentId,
        stream: &mut dyn std::io::Write,
        offset: u64,
        n_bytes: u64,
    ) -> Result<(), MemoryFault> {
        let mut buf = vec![0u8; n_bytes as usize];
        self.read(agent, offset, &mut buf)?;
        for (i, chunk) in buf.chunks(16).enumerate() {
            let line_addr = self.address_range().0.val() + offset + (i as u64) * 16;
            let hex: Vec<String> = chunk.iter().map(|b| format!("{b:02x}")).collect();
            writeln!(stream, "{line_addr:016x}: {}", hex.join(" "))
                .map_err(|_| MemoryFault::UnmappedAddress(PhysAddr::new(line_addr)))?;
        }
        Ok(())
    }
}
