//! Local emulator error types
//!
//! Messages follow the `Code: detail` shape of real control plane errors;
//! they reach the user verbatim through `CloudError::Provider`.

use infraflow_cloud::CloudError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum LocalError {
    #[error("MissingRequiredProperty: {kind} '{resource}' requires '{property}'")]
    MissingProperty {
        resource: String,
        kind: String,
        property: String,
    },

    #[error("ResourceGroupNotFound: resource group '{group}' for '{resource}' does not exist")]
    ResourceGroupNotFound { resource: String, group: String },

    #[error("ParentResourceNotFound: '{parent}' for '{resource}' does not exist")]
    ParentNotFound { resource: String, parent: String },

    #[error("LinkedResourceNotFound: '{resource}' links to '{id}', which does not exist")]
    LinkedResourceNotFound { resource: String, id: String },

    #[error("Conflict: {id}")]
    Conflict { resource: String, id: String },

    #[error("ResourceNotFound: {id}")]
    NotFound { id: String },

    #[error("ResourceGroupNotEmpty: '{group}' still contains {count} resource(s)")]
    ResourceGroupNotEmpty { group: String, count: usize },

    #[error("PropertyChangeNotAllowed: '{resource}' would move from {from} to {to}")]
    PlacementChanged {
        resource: String,
        from: String,
        to: String,
    },

    #[error("InvalidRequest: inputs of '{0}' must be an object")]
    InvalidInputs(String),

    #[error("{message}")]
    Injected { resource: String, message: String },

    #[error("TooManyRequests: retry later")]
    Throttled { resource: String },

    #[error("Emulator state error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Emulator state is corrupt: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, LocalError>;

impl From<LocalError> for CloudError {
    fn from(err: LocalError) -> Self {
        match err {
            LocalError::Conflict { id, .. } => CloudError::ResourceAlreadyExists(id),
            LocalError::NotFound { id } => CloudError::ResourceNotFound(id),
            LocalError::InvalidInputs(_) => CloudError::InvalidConfig(err.to_string()),
            LocalError::Throttled { ref resource } => CloudError::Throttled {
                resource: resource.clone(),
                message: err.to_string(),
            },
            LocalError::Io(e) => CloudError::Io(e),
            LocalError::Json(e) => CloudError::Json(e),
            LocalError::MissingProperty { ref resource, .. }
            | LocalError::ResourceGroupNotFound { ref resource, .. }
            | LocalError::ParentNotFound { ref resource, .. }
            | LocalError::LinkedResourceNotFound { ref resource, .. }
            | LocalError::PlacementChanged { ref resource, .. }
            | LocalError::Injected { ref resource, .. } => {
                CloudError::provider(resource.clone(), err.to_string())
            }
            LocalError::ResourceGroupNotEmpty { ref group, .. } => {
                CloudError::provider(group.clone(), err.to_string())
            }
        }
    }
}
