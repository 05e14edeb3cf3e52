//! Async client for resource protocol (CInP) servers.
//!
//! ```no_run
//! # async fn run() -> Result<(), cinp_client::ClientError> {
//! let client = cinp_client::CinpClient::new("http://localhost:8080", "/api/")?;
//! let root = client.describe("/api/").await?;
//! println!("{root}");
//! # Ok(())
//! # }
//! ```

mod client;
mod error;

pub use client::{CinpClient, ListRequest, ListResult, PageInfo, PROTOCOL_VERSION};
pub use error::ClientError;
