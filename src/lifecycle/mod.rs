//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Startup:
//!     Load config → Validate → Build transport → Spawn sweeper
//!
//! Shutdown (shutdown.rs):
//!     Trigger → Sweeper loop exits → Join handle resolves
//! ```
//!
//! # Design Decisions
//! - Background tasks subscribe to one broadcast channel
//! - In-flight requests are never cancelled by shutdown; callers drop them

pub mod shutdown;

pub use shutdown::Shutdown;
