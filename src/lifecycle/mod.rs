//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Shutdown (shutdown.rs):
//!     trigger() → every wait() resolves → server stops accepting → drain
//!
//! Signals (signals.rs):
//!     SIGTERM/SIGINT → Shutdown::trigger
//! ```
//!
//! # Design Decisions
//! - One broadcast coordinator shared by every long-running task
//! - In-flight requests finish; their transactions commit or abort normally

pub mod shutdown;
pub mod signals;

pub use shutdown::Shutdown;
