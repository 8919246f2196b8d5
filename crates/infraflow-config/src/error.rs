use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Config directory not found")]
    ConfigDirNotFound,

    #[error(
        "Stack file not found. Looked in:\n\
        - the current directory: stack.local.kdl, .stack.local.kdl, stack.kdl, .stack.kdl\n\
        - the ./.infraflow/ directory\n\
        - ~/.config/infraflow/stack.kdl\n\
        Set INFRAFLOW_STACK_PATH to point at a file directly"
    )]
    StackFileNotFound,

    #[error("INFRAFLOW_STACK_PATH points to a missing file: {0}")]
    StackPathMissing(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, ConfigError>;
