//! HTTP API module.
//!
//! Upload endpoint, report download, KPI catalog listing and live pipeline logs.

pub mod logs;
pub mod server;
pub mod types;

pub use logs::*;
pub use server::{router, start_server, AppState};
pub use types::*;
