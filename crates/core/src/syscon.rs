//! System controller, small variant (spec §4.G).
//!
//! Fourteen 32-bit-wide registers at 64-bit stride, described with the same
//! tabular descriptor engine as the ESR banks (spec §9), plus the watchdog
//! counter. Grounded on the teacher's `SysCon` device for the "small
//! memory-mapped controller with magic reset/poweroff semantics" shape,
//! generalized from a single command register to the documented register
//! file.

use crate::common::{AccessType, AgentId, MemoryFault, PhysAddr};
use crate::esr::register::{reg_read, reg_write, reset_bank, RegKind, RegMeta, ResetKind};
use crate::memory::Region;

const VERSION: usize = 0;
const WATCHDOG_COUNT: usize = 1;
const SYSTEM_CONFIG: usize = 2;
const WATCHDOG: usize = 3;
const SYS_INTERRUPT: usize = 4;
const RESET_CAUSE: usize = 5;
const POWER_DOMAIN_REQ: usize = 6;
const POWER_DOMAIN_ACK: usize = 7;
const SPIN_LOCK: usize = 8;
const CHIP_MODE: usize = 9;
const SOFT_RESET: usize = 10;
const MAILBOX0: usize = 11;
const MAILBOX1: usize = 12;
const POWER_GOOD: usize = 13;
const REG_COUNT: usize = 14;

const WDOG_DISABLE_BIT: u64 = 1 << 8;
const WATCHDOG_KICK_BIT: u64 = 1 << 7;

/// `version`'s reset value: a build-identifying constant (spec leaves the
/// exact encoding unspecified; this core seeds a stable placeholder).
const VERSION_CONST: u64 = 0x0001_0000;

/// `reset_cause` encodings (spec §4.G: "sets `reset_cause=POR`" / `=WATCHDOG`).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ResetCause {
    /// Power-on reset.
    PowerOn = 1,
    /// Watchdog-triggered reset.
    Watchdog = 2,
}

fn table() -> [RegMeta; REG_COUNT] {
    let mut t = [RegMeta::rw("reserved"); REG_COUNT];
    t[VERSION] = RegMeta {
        name: "version",
        writable_mask: 0,
        readable_mask: 0xFFFF_FFFF,
        reset: ResetKind::Cold,
        reset_value: VERSION_CONST,
        kind: RegKind::ReadOnly,
    };
    t[WATCHDOG_COUNT] = RegMeta {
        name: "watchdog_count",
        writable_mask: 0xFFFF_FFFF,
        readable_mask: 0xFFFF_FFFF,
        reset: ResetKind::Cold,
        reset_value: 0,
        kind: RegKind::ReadWrite,
    };
    t[SYSTEM_CONFIG] = RegMeta {
        name: "system_config",
        writable_mask: 0xFFFF_FFFF,
        readable_mask: 0xFFFF_FFFF,
        reset: ResetKind::Cold,
        reset_value: WDOG_DISABLE_BIT,
        kind: RegKind::SideEffect,
    };
    t[WATCHDOG] = RegMeta {
        name: "watchdog",
        writable_mask: 0xFFFF_FFFF,
        readable_mask: 0,
        reset: ResetKind::Cold,
        reset_value: 0,
        kind: RegKind::SideEffect,
    };
    t[SYS_INTERRUPT] = RegMeta {
        name: "sys_interrupt",
        writable_mask: 0xFFFF_FFFF,
        readable_mask: 0xFFFF_FFFF,
        reset: ResetKind::Cold,
        reset_value: 0,
        kind: RegKind::ReadWrite,
    };
    t[RESET_CAUSE] = RegMeta {
        name: "reset_cause",
        writable_mask: 0,
        readable_mask: 0xFFFF_FFFF,
        reset: ResetKind::None,
        reset_value: 0,
        kind: RegKind::ReadClear,
    };
    t[POWER_DOMAIN_REQ] = RegMeta {
        name: "power_domain_req",
        writable_mask: 0xFFFF_FFFF,
        readable_mask: 0xFFFF_FFFF,
        reset: ResetKind::Cold,
        reset_value: 0,
        kind: RegKind::ReadWrite,
    };
    t[POWER_DOMAIN_ACK] = RegMeta {
        name: "power_domain_ack",
        writable_mask: 0,
        readable_mask: 0xFFFF_FFFF,
        reset: ResetKind::Cold,
        reset_value: 0,
        kind: RegKind::ReadOnly,
    };
    t[SPIN_LOCK] = RegMeta {
        name: "spin_lock",
        writable_mask: 0x1,
        readable_mask: 0xFFFF_FFFF,
        reset: ResetKind::Cold,
        reset_value: 0,
        kind: RegKind::ReadSet,
    };
    t[CHIP_MODE] = RegMeta {
        name: "chip_mode",
        writable_mask: 0,
        readable_mask: 0xFFFF_FFFF,
        reset: ResetKind::Cold,
        reset_value: 0,
        kind: RegKind::ReadOnly,
    };
    t[SOFT_RESET] = RegMeta {
        name: "soft_reset",
        writable_mask: 0xFFFF_FFFF,
        readable_mask: 0xFFFF_FFFF,
        reset: ResetKind::Cold,
        reset_value: 0,
        kind: RegKind::ReadWrite,
    };
    t[MAILBOX0] = RegMeta {
        name: "mailbox0",
        writable_mask: 0xFFFF_FFFF,
        readable_mask: 0xFFFF_FFFF,
        reset: ResetKind::Cold,
        reset_value: 0,
        kind: RegKind::ReadWrite,
    };
    t[MAILBOX1] = RegMeta {
        name: "mailbox1",
        writable_mask: 0xFFFF_FFFF,
        readable_mask: 0xFFFF_FFFF,
        reset: ResetKind::Cold,
        reset_value: 0,
        kind: RegKind::ReadWrite,
    };
    t[POWER_GOOD] = RegMeta {
        name: "power_good",
        writable_mask: 0,
        readable_mask: 0xFFFF_FFFF,
        reset: ResetKind::Cold,
        reset_value: 0,
        kind: RegKind::ReadOnly,
    };
    t
}

/// The watchdog counter: decremented by one every `divider` clock ticks
/// while enabled; reaching zero is reported to the caller so the system
/// can cascade a cold reset (spec §4.G). No stored callback pointer (spec
/// §9's caution against a global timeout handler): the caller drives
/// [`Watchdog::tick`] and reacts to its return value.
#[derive(Debug, Clone)]
pub struct Watchdog {
    divider: u64,
    ticks_since_decrement: u64,
    counter: u64,
    reload: u64,
    enabled: bool,
}

impl Watchdog {
    /// Creates a disabled watchdog with the given clock divider.
    pub fn new(divider: u64) -> Self {
        Self { divider: divider.max(1), ticks_since_decrement: 0, counter: 0, reload: 0, enabled: false }
    }

    /// Sets the reload value used by [`Self::kick`] and the next enable edge.
    pub fn set_reload(&mut self, reload: u64) {
        self.reload = reload;
    }

    /// Enables or disables the watchdog; disabling does not clear the counter.
    pub fn set_enabled(&mut self, enabled: bool) {
        if enabled && !self.enabled {
            self.counter = self.reload;
            self.ticks_since_decrement = 0;
        }
        self.enabled = enabled;
    }

    /// Reloads the counter from the configured reload value (spec §4.G: "a kick").
    pub fn kick(&mut self) {
        self.counter = self.reload;
        self.ticks_since_decrement = 0;
    }

    /// Advances one clock tick; returns `true` exactly on the tick the
    /// counter reaches zero while enabled.
    pub fn tick(&mut self) -> bool {
        if !self.enabled {
            return false;
        }
        self.ticks_since_decrement += 1;
        if self.ticks_since_decrement < self.divider {
            return false;
        }
        self.ticks_since_decrement = 0;
        if self.counter == 0 {
            self.counter = self.reload;
            return true;
        }
        self.counter -= 1;
        self.counter == 0
    }
}

/// The small-variant system controller (spec §4.G).
pub struct SysCon {
    base: PhysAddr,
    values: [u64; REG_COUNT],
    /// The watchdog subdevice.
    pub watchdog: Watchdog,
}

impl SysCon {
    /// Creates the controller at `base`, power-on reset applied.
    pub fn new(base: PhysAddr, watchdog_divider: u64) -> Self {
        let mut s = Self { base, values: [0; REG_COUNT], watchdog: Watchdog::new(watchdog_divider) };
        s.power_on_reset();
        s
    }

    /// Power-on reset: `reset_cause=POR`, watchdog disabled, version seeded, mailboxes cleared (spec §4.G).
    pub fn power_on_reset(&mut self) {
        reset_bank(&mut self.values, &table(), ResetKind::Cold);
        self.values[RESET_CAUSE] = ResetCause::PowerOn as u64;
        self.watchdog.set_enabled(false);
    }

    /// Applies a watchdog-triggered reset: same as power-on, but `reset_cause=WATCHDOG`.
    pub fn watchdog_reset(&mut self) {
        reset_bank(&mut self.values, &table(), ResetKind::Cold);
        self.values[RESET_CAUSE] = ResetCause::Watchdog as u64;
        self.watchdog.set_enabled(false);
    }

    /// Advances the watchdog by one clock tick; returns `true` if it just
    /// reached zero (the caller is expected to cascade a full cold reset
    /// and call [`Self::watchdog_reset`]).
    pub fn tick_watchdog(&mut self) -> bool {
        self.watchdog.tick()
    }

    fn on_side_effect(&mut self, idx: usize) {
        match idx {
            SYSTEM_CONFIG => {
                self.watchdog.set_enabled(self.values[SYSTEM_CONFIG] & WDOG_DISABLE_BIT == 0);
            }
            WATCHDOG => {
                if self.values[WATCHDOG] & WATCHDOG_KICK_BIT != 0 {
                    self.watchdog.kick();
                }
                self.values[WATCHDOG] = 0;
            }
            _ => {}
        }
    }
}

impl Region for SysCon {
    fn name(&self) -> &str {
        "syscon"
    }

    fn address_range(&self) -> (PhysAddr, u64) {
        (self.base, (REG_COUNT as u64) * 8)
    }

    fn read(&mut self, _agent: AgentId, offset: u64, out: &mut [u8]) -> Result<(), MemoryFault> {
        if out.len() != 4 {
            return Err(MemoryFault::WrongSize { addr: self.base.offset(offset), size: out.len() });
        }
        if offset % 8 != 0 {
            return Err(MemoryFault::Unaligned(self.base.offset(offset)));
        }
        let idx = (offset / 8) as usize;
        let val = reg_read(&mut self.values, &table(), idx)
            .ok_or(MemoryFault::UnknownRegister(self.base.offset(offset)))?;
        out.copy_from_slice(&(val as u32).to_le_bytes());
        Ok(())
    }

    fn write(&mut self, _agent: AgentId, offset: u64, data: &[u8]) -> Result<(), MemoryFault> {
        if data.len() != 4 {
            return Err(MemoryFault::WrongSize { addr: self.base.offset(offset), size: data.len() });
        }
        if offset % 8 != 0 {
            return Err(MemoryFault::Unaligned(self.base.offset(offset)));
        }
        let idx = (offset / 8) as usize;
        let mut bytes = [0u8; 4];
        bytes.copy_from_slice(data);
        let val = u64::from(u32::from_le_bytes(bytes));
        let outcome = reg_write(&mut self.values, &table(), idx, val)
            .ok_or(MemoryFault::UnknownRegister(self.base.offset(offset)))?;
        if outcome == crate::esr::register::WriteOutcome::ReadOnlyViolation {
            return Err(MemoryFault::ReadOnlyViolation(self.base.offset(offset)));
        }
        if outcome == crate::esr::register::WriteOutcome::RunSideEffect {
            self.on_side_effect(idx);
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

    fn agent() -> AgentId {
        AgentId::Named("test")
    }

    fn write_reg(s: &mut SysCon, idx: usize, val: u32) {
        s.write(agent(), (idx as u64) * 8, &val.to_le_bytes()).unwrap();
    }

    fn read_reg(s: &mut SysCon, idx: usize) -> u32 {
        let mut buf = [0u8; 4];
        s.read(agent(), (idx as u64) * 8, &mut buf).unwrap();
        u32::from_le_bytes(buf)
    }

    #[test]
    fn power_on_reset_sets_cause() {
        let mut s = SysCon::new(PhysAddr::new(0x3000), 4);
        assert_eq!(read_reg(&mut s, RESET_CAUSE), ResetCause::PowerOn as u32);
        assert_eq!(read_reg(&mut s, RESET_CAUSE), 0, "reset_cause is read-clear");
    }

    #[test]
    fn system_config_enables_watchdog() {
        let mut s = SysCon::new(PhysAddr::new(0x3000), 4);
        write_reg(&mut s, WATCHDOG_COUNT, 3);
        write_reg(&mut s, SYSTEM_CONFIG, 0);
        assert!(s.watchdog.enabled);
    }

    #[test]
    fn watchdog_kick_reloads_and_timeout_fires() {
        let mut s = SysCon::new(PhysAddr::new(0x3000), 1);
        write_reg(&mut s, WATCHDOG_COUNT, 2);
        write_reg(&mut s, SYSTEM_CONFIG, 0);
        assert!(!s.tick_watchdog());
        assert!(!s.tick_watchdog());
        assert!(s.tick_watchdog());
    }

    #[test]
    fn watchdog_register_reads_zero_and_kicks() {
        let mut s = SysCon::new(PhysAddr::new(0x3000), 1);
        write_reg(&mut s, WATCHDOG_COUNT, 5);
        write_reg(&mut s, SYSTEM_CONFIG, 0);
        let _ = s.tick_watchdog();
        write_reg(&mut s, WATCHDOG, 1 << 7);
        assert_eq!(read_reg(&mut s, WATCHDOG), 0);
    }

    #[test]
    fn spin_lock_is_read_set() {
        let mut s = SysCon::new(PhysAddr::new(0x3000), 4);
        assert_eq!(read_reg(&mut s, SPIN_LOCK), 0);
        assert_eq!(read_reg(&mut s, SPIN_LOCK), 1);
    }
}
