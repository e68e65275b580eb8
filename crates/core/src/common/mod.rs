//! Common types shared across the core: addresses, identity, access
//! classification, the wait-reason bitset, and the error/trap taxonomy.

/// Physical address newtype.
pub mod addr;
/// Memory access classification (fetch/read/write).
pub mod data;
/// Trap and fault taxonomy.
pub mod error;
/// Hart and agent identity (shire/neighborhood/minion/thread decomposition).
pub mod ident;
/// Hart wait-reason bitset.
pub mod wait;

pub use addr::PhysAddr;
pub use data::AccessType;
pub use error::{CoreError, MemoryFault, Trap};
pub use ident::{AgentId, HartId};
pub use wait::WaitReason;
