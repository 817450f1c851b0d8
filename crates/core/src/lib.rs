//! Shortly core types and utilities
//!
//! Holds the pieces every Shortly crate shares: the process-wide session
//! store, logging initialisation and platform state directories.

pub mod error;
pub mod logging;
pub mod session;
pub mod state_dir;

pub use error::{CoreError, CoreResult};
pub use session::{
    FilePersistence, MemoryPersistence, SessionPersistence, SessionStore, UserProfile,
};
pub use state_dir::StateDir;
