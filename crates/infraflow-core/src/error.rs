use std::path::PathBuf;
use thiserror::Error;

use crate::graph::GraphError;

#[derive(Error, Debug)]
pub enum StackError {
    #[error("KDL parse error: {0}")]
    KdlParse(#[from] kdl::KdlError),

    #[error("File read error: {0}")]
    Io(#[from] std::io::Error),

    #[error("IO error: {path}\nreason: {message}")]
    IoError { path: PathBuf, message: String },

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Template error: {file}\nreason: {message}")]
    TemplateError {
        file: PathBuf,
        line: Option<usize>,
        message: String,
    },

    #[error("Template render error: {0}")]
    TemplateRenderError(String),

    #[error("File discovery error: {path}\nreason: {message}")]
    DiscoveryError { path: PathBuf, message: String },

    #[error(
        "Project root not found\nsearched from: {0}\nhint: run inside a directory containing stack.kdl"
    )]
    ProjectRootNotFound(PathBuf),

    #[error("Unknown resource kind '{kind}' for '{name}'")]
    UnknownResourceKind { kind: String, name: String },

    #[error("Resource '{0}' is declared more than once")]
    DuplicateResource(String),

    #[error("Invalid reference: {0}")]
    InvalidReference(String),

    #[error(transparent)]
    Graph(#[from] GraphError),
}

pub type Result<T> = std::result::Result<T, StackError>;
