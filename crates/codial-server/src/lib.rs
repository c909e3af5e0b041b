//! # codial-server
//!
//! The bearer-authenticated REST surface of the agent core, plus the
//! process container that assembles the runtime at startup.

#![deny(unsafe_code)]

pub mod config;
pub mod container;
pub mod health;
pub mod routes;
pub mod server;
pub mod shutdown;

pub use config::CoreConfig;
pub use container::{build_runtime, AppState, RuntimeHandles};
pub use server::CodialServer;
pub use shutdown::ShutdownCoordinator;
