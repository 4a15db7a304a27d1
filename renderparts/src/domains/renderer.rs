use blender::{blender::BlenderError, models::border::Border};
use std::{io, path::Path, path::PathBuf};
use thiserror::Error;
use tokio::sync::mpsc::UnboundedSender;

#[derive(Debug, Error)]
pub enum RenderDispatchError {
    #[error("Unable to reserve {path:?}: {source}")]
    Placeholder {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("Something wrong with blender: {0}")]
    Blender(#[from] BlenderError),
    #[error("Render of {output:?} failed with exit code {code:?}")]
    Failed { output: PathBuf, code: Option<i32> },
    #[error("Render of {0:?} ended without saving an image")]
    NothingSaved(PathBuf),
    #[error("Renderer closed its output before the render ended")]
    BrokenPipe,
    #[error("Render of {tile} failed: {reason}")]
    Aborted { tile: String, reason: String },
}

impl RenderDispatchError {
    pub fn kind(&self) -> &'static str {
        match self {
            RenderDispatchError::Placeholder { .. } => "Placeholder",
            RenderDispatchError::Blender(_) => "Blender",
            RenderDispatchError::Failed { .. } => "Failed",
            RenderDispatchError::NothingSaved(_) => "NothingSaved",
            RenderDispatchError::BrokenPipe => "BrokenPipe",
            RenderDispatchError::Aborted { .. } => "Aborted",
        }
    }
}

/// Lifecycle notifications a renderer fires around each render.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RenderEvent {
    Pre,
    Post,
    Complete,
    /// Stopped on request, the job winds down quietly.
    Cancelled,
    /// The render broke after launch. Carries the reason shown to the user.
    Failed(String),
}

pub type RenderListener = UnboundedSender<RenderEvent>;

/// The external engine that turns a region of the frame into an image file.
#[async_trait::async_trait]
pub trait Renderer: Send {
    /// Start delivering lifecycle events to `listener`, replacing any previous one.
    fn register(&mut self, listener: RenderListener);
    /// Stop delivering lifecycle events.
    fn deregister(&mut self);
    fn set_region(&mut self, border: &Border, crop: bool);
    /// Render one frame to `output` (extension appended by the renderer).
    /// With `blocking` the call returns once the image is written, otherwise right after launch.
    async fn render(&mut self, output: &Path, blocking: bool) -> Result<(), RenderDispatchError>;
}
