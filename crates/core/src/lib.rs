//! Event bus and boundary traits for the lattice node.
//!
//! The transaction-processing core talks to the rest of the node through the
//! interfaces defined here:
//!
//! - [`Chain`] / [`ChainStore`] / [`StateDb`]: canonical chain and account
//!   state (storage is out of process scope, only the seam lives here)
//! - [`Vm`]: contract execution
//! - [`DebtVerifier`]: proof that a debt's transaction was packed on its
//!   source shard
//! - [`ShardRelay`]: shard-scoped peer broadcast
//! - [`EventBus`]: asynchronous fan-out of node events
//!
//! The pool holds a handle to chain read operations; the chain emits events
//! the pool subscribes to. No back-reference is owned by either side.

mod chain;
mod error;
mod events;
mod relay;
mod validation;
mod verify;
mod vm;

pub use chain::{Chain, ChainStore, StateDb};
pub use error::{ChainError, RelayError, VerifierError};
pub use events::{Event, EventBus, EventReceiver, DEFAULT_BUS_CAPACITY};
pub use relay::{HeadStatus, PeerId, PeerInfo, ShardRelay};
pub use validation::{validate_for_admission, AdmissionError};
pub use verify::{DebtVerdict, DebtVerifier};
pub use vm::Vm;

#[cfg(any(test, feature = "test-utils"))]
pub mod testing;
