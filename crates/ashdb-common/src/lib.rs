//! ashdb common types, errors, and configuration.
//!
//! This crate provides the identifiers and keys shared by every ashdb
//! component, along with the error type and configuration structures.

pub mod config;
pub mod error;
pub mod key;
pub mod node_id;

pub use config::{HeapConfig, TreeConfig};
pub use error::{AshError, Result};
pub use key::Key;
pub use node_id::{DataAddress, NodeId};
