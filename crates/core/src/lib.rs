//! Cycle-driven execution-engine emulator core for a manycore RISC-V accelerator.
//!
//! This crate implements the chip-level state machine described by the
//! shire/neighborhood/minion/thread hierarchy:
//! 1. **Hart:** per-thread architectural state and halt/wait sub-states.
//! 2. **Scheduler:** the cooperative, four-list dispatcher that drives every
//!    hart through one cycle at a time.
//! 3. **ESR fabric:** the memory-mapped register address space spanning
//!    per-hart, per-neighborhood, per-shire, and memory-shire banks.
//! 4. **Debug module:** the AND/OR status tree and halt/resume/reset request
//!    handling shared across every hart.
//! 5. **D-cache/SCP manager:** per-thread lock table and software cacheops.
//! 6. **PLIC:** a generalized multi-source, multi-target interrupt controller.
//! 7. **System controller:** the small-variant register bank and watchdog.
//! 8. **System:** the top-level assembly tying every device behind one
//!    address space and driving the per-cycle tick.
//!
//! Instruction decode and execution are out of scope; callers supply an
//! [`executor::InstructionExecutor`] implementation.

/// Common types shared across every module (addresses, hart/agent ids, traps,
/// wait reasons, byte-level helpers).
pub mod common;
/// Topology, PLIC, watchdog, and warning-promotion configuration.
pub mod config;
/// Per-thread D-cache/SCP lock table and software cacheops.
pub mod dcache;
/// Debug module: request handling and the AND/OR hart-status tree.
pub mod dm;
/// ESR register fabric: address decode, per-scope banks, and the store.
pub mod esr;
/// The black-box instruction executor and MMU translation surfaces.
pub mod executor;
/// Per-thread hart state machine.
pub mod hart;
/// Warning routing and promotion.
pub mod log;
/// Physical memory regions and the general-purpose-RAM fabric.
pub mod memory;
/// The multi-source, multi-target platform-level interrupt controller.
pub mod plic;
/// The cooperative four-list hart scheduler.
pub mod scheduler;
/// Cycle/claim/cacheop/reset counters.
pub mod stats;
/// Top-level system: owns every device, wires the address space, drives `tick`.
pub mod system;
/// Small-variant system controller and watchdog.
pub mod syscon;

/// Root configuration type; use `Config::default()` or deserialize from JSON.
pub use crate::config::Config;
/// Top-level system (hart table, ESR fabric, PLIC, syscon, scheduler).
pub use crate::system::System;
