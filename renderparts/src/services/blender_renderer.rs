use crate::domains::renderer::{RenderDispatchError, RenderEvent, RenderListener, Renderer};
use blender::{
    blender::Blender,
    models::{args::Args, border::Border, engine::Engine, format::Format, status::Status},
};
use std::path::{Path, PathBuf};
use tokio::sync::mpsc::UnboundedReceiver;
use tracing::{debug, error, info, warn};

/// Renders regions of one blend file with a local blender installation.
#[derive(Debug)]
pub struct BlenderRenderer {
    blender: Blender,
    blend_file: PathBuf,
    engine: Option<Engine>,
    frame: Option<i32>,
    format: Format,
    overwrite: bool,
    border: Border,
    crop: bool,
    listener: Option<RenderListener>,
}

impl BlenderRenderer {
    pub fn new(blender: Blender, blend_file: impl AsRef<Path>, format: Format) -> Self {
        Self {
            blender,
            blend_file: blend_file.as_ref().to_path_buf(),
            engine: None,
            frame: None,
            format,
            overwrite: false,
            border: Border::full(),
            crop: false,
            listener: None,
        }
    }

    pub fn with_engine(mut self, engine: Option<Engine>) -> Self {
        self.engine = engine;
        self
    }

    pub fn with_frame(mut self, frame: Option<i32>) -> Self {
        self.frame = frame;
        self
    }

    pub fn with_overwrite(mut self, overwrite: bool) -> Self {
        self.overwrite = overwrite;
        self
    }

    pub fn border(&self) -> &Border {
        &self.border
    }

    pub fn crop(&self) -> bool {
        self.crop
    }

    /// Paths are made absolute, blender resolves relative ones against its own working directory.
    pub fn create_args(&self, output: &Path) -> Args {
        let mut args = Args::new(absolute(&self.blend_file), absolute(output));
        args.border = self.border.clone();
        args.crop = self.crop;
        args.overwrite = self.overwrite;
        args.frame = self.frame;
        args.engine = self.engine;
        args.format = Some(self.format.clone());
        args
    }
}

fn absolute(path: &Path) -> PathBuf {
    std::path::absolute(path).unwrap_or_else(|_| path.to_path_buf())
}

/// Relay one blender process to `listener` and report how it ended.
///
/// `Pre` goes out before anything else and `Post` once the process is gone, followed by
/// `Complete` when blender exited cleanly after saving, `Failed` otherwise. Blender runs in its
/// own process group, so nothing here is ever a user cancel.
pub async fn forward(
    listener: Option<RenderListener>,
    mut rx: UnboundedReceiver<Status>,
    output: PathBuf,
) -> Result<PathBuf, RenderDispatchError> {
    let emit = |event: RenderEvent| {
        if let Some(listener) = &listener {
            // scheduler gone, nobody left to tell
            let _ = listener.send(event);
        }
    };

    emit(RenderEvent::Pre);
    let result = await_exit(&mut rx, output).await;
    emit(RenderEvent::Post);
    match &result {
        Ok(_) => emit(RenderEvent::Complete),
        Err(e) => emit(RenderEvent::Failed(e.to_string())),
    }
    result
}

async fn await_exit(
    rx: &mut UnboundedReceiver<Status>,
    output: PathBuf,
) -> Result<PathBuf, RenderDispatchError> {
    let mut saved = None;
    while let Some(status) = rx.recv().await {
        match status {
            Status::Running { status } => debug!("[Running] {status}"),
            Status::Log { status } => debug!("[Log] {status}"),
            Status::Warning { message } => warn!("[Blender] {message}"),
            Status::Error { message } => error!("[Blender] {message}"),
            Status::Completed { result } => {
                info!(?result, "Image saved");
                saved = Some(result);
            }
            Status::Exit { code } => {
                return match (code, saved) {
                    (Some(0), Some(result)) => Ok(result),
                    (Some(0), None) => Err(RenderDispatchError::NothingSaved(output)),
                    (code, _) => Err(RenderDispatchError::Failed { output, code }),
                };
            }
        }
    }
    Err(RenderDispatchError::BrokenPipe)
}

#[async_trait::async_trait]
impl Renderer for BlenderRenderer {
    fn register(&mut self, listener: RenderListener) {
        self.listener = Some(listener);
    }

    fn deregister(&mut self) {
        self.listener = None;
    }

    fn set_region(&mut self, border: &Border, crop: bool) {
        self.border = border.clone();
        self.crop = crop;
    }

    async fn render(&mut self, output: &Path, blocking: bool) -> Result<(), RenderDispatchError> {
        let args = self.create_args(output);
        let rx = self.blender.render(&args).await?;
        let listener = self.listener.clone();
        let output = output.to_path_buf();

        if blocking {
            return forward(listener, rx, output).await.map(|_| ());
        }

        tokio::spawn(async move {
            if let Err(e) = forward(listener, rx, output).await {
                error!("Render failed: {e}");
            }
        });
        Ok(())
    }
}
