//! Integration-test entry point.
//!
//! Exercises the crate purely through its public API, the same way an
//! external bare-metal test harness would: no access to private fields or
//! register-index constants, only `System`'s devices and the traits they
//! implement.

/// End-to-end scenarios seeded from the documented testable properties.
pub mod unit;
