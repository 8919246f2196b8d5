//! InfraFlow cloud infrastructure
//!
//! Provider abstraction, output binding, planning, state and the apply
//! engine that ties them together.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────┐
//! │                  InfraFlow CLI                   │
//! │              (infra plan / up / destroy)         │
//! └─────────────────┬───────────────────────────────┘
//!                   │
//! ┌─────────────────▼───────────────────────────────┐
//! │                infraflow-cloud                   │
//! │  ┌──────────────────────────────────────────┐   │
//! │  │  Engine: plan ─▶ levels ─▶ bind outputs   │   │
//! │  └──────────────────────────────────────────┘   │
//! │  ┌──────────────┐  ┌──────────────┐            │
//! │  │ OutputBinder │  │  State Mgmt  │            │
//! │  └──────────────┘  └──────────────┘            │
//! │  ┌──────────────────────────────────────────┐   │
//! │  │  trait CloudProvider { create, update,    │   │
//! │  │                        delete, ... }      │   │
//! │  └──────────────────────────────────────────┘   │
//! └─────────────────┬───────────────────────────────┘
//!                   │
//!           ┌───────▼───────┐
//!           │ local emulator│
//!           └───────────────┘
//! ```

pub mod action;
pub mod engine;
pub mod error;
pub mod outputs;
pub mod provider;
pub mod state;

// Re-exports
pub use action::{Action, ActionResult, ActionType, ApplyResult, Plan, PlanSummary};
pub use engine::{ApplyReport, DEFAULT_PARALLELISM, Engine};
pub use error::{CloudError, Result};
pub use outputs::OutputBinder;
pub use provider::{
    AuthStatus, CloudProvider, ResourceOutputs, ResourceRequest, RetryConfig, provider_error,
    with_retry,
};
pub use state::{GlobalState, ResourceState, ResourceStatus, STATE_DIR, StateLock, StateManager};
