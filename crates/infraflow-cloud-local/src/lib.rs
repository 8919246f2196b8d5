//! Local emulator provider for InfraFlow
//!
//! This crate implements the `CloudProvider` trait against an in-process
//! control plane. It validates requests the way a real cloud does (required
//! properties, existing resource groups, linked ids, name conflicts) and
//! generates deterministic ids, addresses and host names, so stacks can be
//! planned and applied without any account.
//!
//! # Example
//!
//! ```ignore
//! use infraflow_cloud::Engine;
//! use infraflow_cloud_local::LocalProvider;
//! use std::sync::Arc;
//!
//! let provider = Arc::new(LocalProvider::open(".infraflow/local-cloud.json").await?);
//! let engine = Engine::new(provider);
//! let report = engine.apply(&stack, &mut state).await?;
//! ```

pub mod control_plane;
pub mod error;
pub mod provider;

pub use control_plane::{ControlPlane, DEFAULT_LOCATION, EmulatedResource};
pub use error::{LocalError, Result};
pub use provider::{DEFAULT_SUBSCRIPTION, LocalProvider};
