// User operations on a render job. Each one ends in exactly one notification, failures included.
use crate::{
    domains::renderer::Renderer,
    models::{
        job_config::JobConfiguration, notification::Notification,
        scheduler_state::SchedulerState,
    },
    services::{
        image_reassembler::{self, CanvasSize},
        render_scheduler::{RenderScheduler, StopHandle},
        tile_inventory::TileInventory,
    },
};
use blender::models::border::Border;
use std::{
    env::consts::OS,
    path::{Path, PathBuf},
    process::Command,
};
use tracing::{error, info, warn};

const START: &str = "Start Rendering";
const STOP: &str = "Stop Rendering";
const REFRESH: &str = "Refresh List";
const OPEN: &str = "Open Folder";
const RESET: &str = "Reset Render Border";
const MERGE: &str = "Merge Images";

/// Render every missing part, then put the renderer back on the full frame.
pub async fn start<R: Renderer + ?Sized>(
    config: &JobConfiguration,
    renderer: &mut R,
    stop: StopHandle,
) -> Notification {
    if let Err(e) = config.validate() {
        error!("Invalid configuration: {e}");
        return Notification::error(START, e.to_string());
    }

    let result = {
        let mut scheduler = RenderScheduler::new(config.clone(), &mut *renderer).with_stop_handle(stop);
        scheduler.run().await
    };
    reset_region(renderer);

    match result {
        Ok(report) if report.state == SchedulerState::Finished => Notification::info(
            START,
            format!(
                "All {} parts rendered, {} in this run",
                config.total_tiles(),
                report.dispatched.len()
            ),
        ),
        Ok(report) => {
            warn!(dispatched = report.dispatched.len(), "User interruption");
            Notification::warning(START, "User interruption")
        }
        Err(e) => Notification::error("Render Failed", e.to_string()),
    }
}

pub fn stop(handle: &StopHandle) -> Notification {
    handle.request();
    Notification::warning(STOP, "Render will be stopped after the current part finishes")
}

pub fn refresh(config: &JobConfiguration) -> (TileInventory, Notification) {
    let inventory = TileInventory::refresh(config);
    let message = format!(
        "Rendered parts: {} / {}",
        inventory.rendered_count(),
        inventory.total()
    );
    info!("{message}");
    (inventory, Notification::info(REFRESH, message))
}

pub fn open_folder(config: &JobConfiguration) -> Notification {
    open_path(OPEN, &config.output_folder)
}

pub fn reset_region<R: Renderer + ?Sized>(renderer: &mut R) -> Notification {
    renderer.set_region(&Border::full(), false);
    Notification::info(RESET, "Render border reset to the full frame")
}

/// Reassemble the parts. With `open_after` the output folder is opened on success.
pub fn merge(config: &JobConfiguration, canvas: Option<CanvasSize>, open_after: bool) -> Notification {
    match image_reassembler::merge(config, canvas) {
        Ok(path) => {
            if open_after {
                let opened = open_folder(config);
                if opened.is_error() {
                    return opened;
                }
            }
            Notification::info(MERGE, format!("Saved {}", path.display()))
        }
        Err(e) => {
            error!(kind = e.kind(), "Merge failed: {e}");
            Notification::error(
                MERGE,
                format!("Cannot merge images properly: {} ({e})", e.kind()),
            )
        }
    }
}

/// Program handing a path to the desktop on this platform.
pub fn opener() -> &'static str {
    match OS {
        "macos" => "open",
        "windows" => "explorer",
        _ => "xdg-open",
    }
}

fn open_path(title: &str, path: &Path) -> Notification {
    let path: PathBuf = path.canonicalize().unwrap_or_else(|_| path.to_path_buf());
    match Command::new(opener()).arg(&path).spawn() {
        Ok(_) => {
            info!(?path, "Opened folder");
            Notification::info(title, path.display().to_string())
        }
        Err(e) => {
            error!(?path, "Unable to open folder: {e}");
            Notification::error(title, format!("Unable to open {}: {e}", path.display()))
        }
    }
}
