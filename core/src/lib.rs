//! Tunnel Config Core Library
//!
//! This crate models a reverse-tunnel client document (a `[common]` section
//! plus named proxy sections), parses and renders it, applies proxy-level
//! changes, and coordinates writing the result and restarting the client
//! service.

pub mod config;
pub mod error;
pub mod lifecycle;
pub mod model;
pub mod mutator;
pub mod parser;
pub mod serializer;
pub mod store;
pub mod supervisor;

pub use config::{discover_clients, unit_for_artifact, ManagerConfig};
pub use error::{Error, Result};
pub use lifecycle::{ChangeReport, LifecycleCoordinator, RestartOutcome, Stage};
pub use model::*;
pub use mutator::{add_proxy, delete_proxy, edit_proxy, Operation, ProxyChanges};
pub use parser::{parse, parse_with_warnings, ParseWarning};
pub use serializer::serialize;
pub use store::{FileStore, LocalFileStore};
pub use supervisor::{CommandOutput, ProcessSupervisor, SystemdSupervisor};
