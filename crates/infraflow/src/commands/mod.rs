pub mod destroy;
pub mod graph;
pub mod outputs;
pub mod plan;
pub mod up;
pub mod validate;
