//! Hart wait-reason bitset.
//!
//! A hart becomes `waiting` exactly when its wait-reason set is non-empty
//! (spec §3). The set accumulates one bit per concurrently in-flight
//! long-latency condition; the async tail (scheduler §4.F) clears bits as
//! each operation's tail completes.

use bitflags::bitflags;

bitflags! {
    /// Reasons a hart may currently be suspended waiting on a long-latency event.
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
    pub struct WaitReason: u32 {
        /// Waiting on a tensor load.
        const TENSOR_LOAD = 1 << 0;
        /// Waiting on a software prefetch.
        const PREFETCH = 1 << 1;
        /// Waiting on a D-cache/SCP cacheop.
        const CACHEOP = 1 << 2;
        /// Waiting on a tensor fused-multiply-add.
        const TENSOR_FMA = 1 << 3;
        /// Waiting on a tensor store.
        const TENSOR_STORE = 1 << 4;
        /// Waiting on a tensor reduce.
        const REDUCE = 1 << 5;
        /// Waiting on a tensor quantize.
        const TENSOR_QUANT = 1 << 6;
        /// Waiting on an interrupt.
        const INTERRUPT = 1 << 7;
        /// Waiting on a message-port event.
        const MESSAGE = 1 << 8;
        /// Waiting on credit channel 0.
        const CREDIT_0 = 1 << 9;
        /// Waiting on credit channel 1.
        const CREDIT_1 = 1 << 10;
        /// Waiting on a tensor load into the TenB register bank.
        const TENSOR_LOAD_TENB = 1 << 11;
    }
}

impl WaitReason {
    /// A hart is `waiting` exactly when its wait-reason set is non-empty.
    pub fn is_waiting(self) -> bool {
        !self.is_empty()
    }
}
