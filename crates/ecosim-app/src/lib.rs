//! Shared application plumbing for the ecosim control surfaces.

use std::sync::{Arc, Mutex};

use ecosim_core::Coordinator;

pub type SharedSimulation = Arc<Mutex<Coordinator>>;

pub mod control;
pub mod servers;

pub use control::{ControlError, ControlHandle, HistoryQuery, StartRequest};
pub use servers::{ControlServerConfig, router, serve};
