// Error types for table-scene

use thiserror::Error;

/// Failure to turn shader sources into a usable program.
#[derive(Debug, Error)]
pub enum LinkError {
    #[error("shader compilation failed: {0}")]
    Compile(String),
    #[error("program link failed: {0}")]
    Link(String),
    #[error("rendering context is lost")]
    ContextLost,
}

/// Failures reported by a [`RenderDevice`](crate::device::RenderDevice).
#[derive(Debug, Error)]
pub enum DeviceError {
    #[error("rendering context is lost")]
    ContextLost,
    #[error("device ran out of memory")]
    OutOfMemory,
    #[error("invalid mesh data: {0}")]
    InvalidMesh(String),
}

/// Everything that can stop a frame or the startup sequence.
#[derive(Debug, Error)]
pub enum RenderError {
    /// A pop without a matching push. Always a composer bug.
    #[error("transform stack underflow: pop with no saved matrix")]
    StackUnderflow,
    #[error(transparent)]
    Link(#[from] LinkError),
    #[error(transparent)]
    Device(#[from] DeviceError),
    #[error("shader program has no attribute `{0}`")]
    MissingAttribute(&'static str),
    #[error("shader program has no uniform `{0}`")]
    MissingUniform(&'static str),
    #[error("render context is not initialized")]
    NotInitialized,
}
