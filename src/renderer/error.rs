use thiserror::Error;

use super::device::DeviceError;

/// Failures that stop the renderer from starting or the application from
/// running. Per-resource failures are logged and never surface here.
#[derive(Debug, Error)]
pub enum RenderError {
    #[error("graphics device error: {0}")]
    Device(#[from] DeviceError),
    #[error("failed to create default {what}: {source}")]
    DefaultResource {
        what: &'static str,
        #[source]
        source: DeviceError,
    },
    #[error("window creation failed: {0}")]
    Window(#[from] winit::error::OsError),
    #[error("event loop error: {0}")]
    EventLoop(#[from] winit::error::EventLoopError),
}
