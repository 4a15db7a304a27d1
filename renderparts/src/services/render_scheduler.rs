/*
    The scheduler never remembers which parts are done. Every tick rebuilds the missing set from
    the output folder, so a restarted process, or a second machine sharing the folder, picks up
    exactly where the files on disk say the job is.
*/
use crate::{
    domains::renderer::{RenderDispatchError, RenderEvent, Renderer},
    models::{
        job_config::JobConfiguration,
        scheduler_state::{SchedulerFlags, SchedulerState},
        tile::TileDescriptor,
    },
    services::{grid_partitioner::partition, tile_inventory::TileInventory},
};
use std::{
    fs::{self, OpenOptions},
    path::{Path, PathBuf},
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    time::Duration,
};
use tokio::{
    select,
    sync::mpsc::{self, UnboundedReceiver},
    time::{interval, MissedTickBehavior},
};
use tracing::{debug, error, info, info_span, warn, Instrument};
use uuid::Uuid;

pub const TICK_INTERVAL: Duration = Duration::from_millis(500);

/// Cooperative stop signal, safe to trigger from another task or a signal handler.
#[derive(Debug, Clone, Default)]
pub struct StopHandle(Arc<AtomicBool>);

impl StopHandle {
    pub fn request(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_requested(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SchedulerReport {
    pub run_id: Uuid,
    pub state: SchedulerState,
    /// Parts handed to the renderer during this run, in dispatch order.
    pub dispatched: Vec<String>,
}

pub struct RenderScheduler<'a, R: Renderer + ?Sized> {
    run_id: Uuid,
    config: JobConfiguration,
    renderer: &'a mut R,
    state: SchedulerState,
    flags: SchedulerFlags,
    stop: StopHandle,
    // Some while the listener is registered with the renderer
    events: Option<UnboundedReceiver<RenderEvent>>,
    tick_interval: Duration,
    dispatched: Vec<String>,
    // reported by the renderer after launch, surfaces on the next tick
    failure: Option<RenderDispatchError>,
}

impl<'a, R: Renderer + ?Sized> RenderScheduler<'a, R> {
    pub fn new(config: JobConfiguration, renderer: &'a mut R) -> Self {
        Self {
            run_id: Uuid::new_v4(),
            config,
            renderer,
            state: SchedulerState::Idle,
            flags: SchedulerFlags::default(),
            stop: StopHandle::default(),
            events: None,
            tick_interval: TICK_INTERVAL,
            dispatched: Vec::new(),
            failure: None,
        }
    }

    pub fn with_tick_interval(mut self, tick_interval: Duration) -> Self {
        self.tick_interval = tick_interval;
        self
    }

    pub fn with_stop_handle(mut self, stop: StopHandle) -> Self {
        self.stop = stop;
        self
    }

    pub fn stop_handle(&self) -> StopHandle {
        self.stop.clone()
    }

    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    pub fn state(&self) -> &SchedulerState {
        &self.state
    }

    pub fn flags(&self) -> &SchedulerFlags {
        &self.flags
    }

    pub fn dispatched(&self) -> &[String] {
        &self.dispatched
    }

    pub fn report(&self) -> SchedulerReport {
        SchedulerReport {
            run_id: self.run_id,
            state: self.state.clone(),
            dispatched: self.dispatched.clone(),
        }
    }

    /// Register the lifecycle listener and arm the flags. The first tick may dispatch right away.
    pub fn start(&mut self) {
        self.deregister();
        let (tx, rx) = mpsc::unbounded_channel();
        self.renderer.register(tx);
        self.events = Some(rx);
        self.flags = SchedulerFlags::armed();
        self.state = SchedulerState::Idle;
        self.failure = None;
        info!(
            run_id = %self.run_id,
            folder = ?self.config.output_folder,
            total = self.config.total_tiles(),
            "Start rendering parts"
        );
    }

    /// Run until every part exists on disk or the job is stopped.
    /// Listener and tick are released on every exit path.
    pub async fn run(&mut self) -> Result<SchedulerReport, RenderDispatchError> {
        let span = info_span!(
            "render_job",
            run_id = %self.run_id,
            prefix = %self.config.filename_prefix,
            parts = self.config.parts_count
        );
        self.drive().instrument(span).await
    }

    async fn drive(&mut self) -> Result<SchedulerReport, RenderDispatchError> {
        self.start();
        // tokio refuses a zero period
        let mut ticker = interval(self.tick_interval.max(Duration::from_millis(1)));
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        while !self.state.is_terminal() {
            select! {
                _ = ticker.tick() => {
                    self.tick().await?;
                }
                Some(event) = next_event(&mut self.events) => self.handle_event(event),
            }
        }

        Ok(self.report())
    }

    /// One scheduling pass. Dispatches at most one part.
    pub async fn tick(&mut self) -> Result<&SchedulerState, RenderDispatchError> {
        if self.state.is_terminal() {
            return Ok(&self.state);
        }

        self.drain_events();

        if self.stop.is_requested() && !self.flags.stop_requested {
            warn!("Render will be stopped after the current part finishes");
            self.flags.stop_requested = true;
        }

        // never abort a part in progress, stop or not
        if self.in_flight() {
            if let Some(tile) = self.state.tile() {
                debug!(tile = %tile.name, "Waiting for the current part");
            }
            return Ok(&self.state);
        }

        if let Some(e) = self.failure.take() {
            error!(kind = e.kind(), "Render failed: {e}");
            self.finish(SchedulerState::Cancelled);
            return Err(e);
        }

        if self.flags.stop_requested {
            self.finish(SchedulerState::Cancelled);
            return Ok(&self.state);
        }

        if !self.flags.ready_to_dispatch() {
            return Ok(&self.state);
        }

        // always fresh, parts added by other processes count too
        let inventory = TileInventory::refresh(&self.config);
        let missing = partition(&self.config, inventory.rendered_names());
        let remaining = missing.len();
        let Some(tile) = missing.into_iter().next() else {
            info!(total = inventory.total(), "All parts rendered");
            self.finish(SchedulerState::Finished);
            return Ok(&self.state);
        };

        debug!(remaining, rendered = inventory.rendered_count(), "Next part picked");
        if let Err(e) = self.dispatch(tile).await {
            error!(kind = e.kind(), "Render failed: {e}");
            self.finish(SchedulerState::Cancelled);
            return Err(e);
        }

        Ok(&self.state)
    }

    pub fn handle_event(&mut self, event: RenderEvent) {
        debug!(?event, "Render event");
        match event {
            RenderEvent::Pre => {
                self.flags.render_in_progress = true;
                self.flags.last_render_complete = false;
            }
            RenderEvent::Post => self.flags.render_in_progress = false,
            RenderEvent::Complete => {
                self.flags.last_render_complete = true;
                if let Some(tile) = self.state.tile() {
                    info!(tile = %tile.name, "Part rendered");
                }
                self.settle();
            }
            RenderEvent::Cancelled => {
                warn!("Render cancelled");
                self.flags.stop_requested = true;
                self.settle();
            }
            RenderEvent::Failed(reason) => {
                let tile = self
                    .state
                    .tile()
                    .map(|tile| tile.name.clone())
                    .unwrap_or_default();
                warn!(%tile, "Render failed after launch: {reason}");
                self.failure = Some(RenderDispatchError::Aborted { tile, reason });
                self.settle();
            }
        }
    }

    // the part in flight has ended one way or another
    fn settle(&mut self) {
        if !self.state.is_terminal() {
            self.state = SchedulerState::Idle;
        }
    }

    fn in_flight(&self) -> bool {
        self.state.tile().is_some() || self.flags.render_in_progress
    }

    fn drain_events(&mut self) {
        while let Some(event) = self.events.as_mut().and_then(|rx| rx.try_recv().ok()) {
            self.handle_event(event);
        }
    }

    async fn dispatch(&mut self, tile: TileDescriptor) -> Result<(), RenderDispatchError> {
        info!(
            tile = %tile.name,
            row = tile.row + 1,
            column = tile.column + 1,
            "Rendering part"
        );
        self.state = SchedulerState::Dispatching(tile.clone());

        let blocking = !self.config.interactive_render;
        let placeholder = if blocking {
            Some(reserve(&self.config.tile_path(&tile))?)
        } else {
            None
        };

        self.renderer
            .set_region(&tile.border, self.config.crop_to_border);
        let output = self.config.tile_output(&tile);
        if let Err(e) = self.renderer.render(&output, blocking).await {
            if let Some(path) = placeholder {
                release(&path);
            }
            return Err(e);
        }

        self.dispatched.push(tile.name.clone());
        self.state = SchedulerState::AwaitingRenderEnd(tile);
        Ok(())
    }

    fn finish(&mut self, state: SchedulerState) {
        self.deregister();
        info!(?state, dispatched = self.dispatched.len(), "Render job ended");
        self.state = state;
    }

    fn deregister(&mut self) {
        if self.events.take().is_some() {
            self.renderer.deregister();
            debug!("Render listener removed");
        }
    }
}

impl<R: Renderer + ?Sized> Drop for RenderScheduler<'_, R> {
    fn drop(&mut self) {
        self.deregister();
    }
}

async fn next_event(events: &mut Option<UnboundedReceiver<RenderEvent>>) -> Option<RenderEvent> {
    match events {
        Some(rx) => rx.recv().await,
        None => std::future::pending().await,
    }
}

/// Zero-byte file so other instances scanning the folder skip this part.
/// Two processes can still pick the same part before either writes it.
fn reserve(path: &Path) -> Result<PathBuf, RenderDispatchError> {
    OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .map_err(|source| RenderDispatchError::Placeholder {
            path: path.to_path_buf(),
            source,
        })?;
    debug!(?path, "Reserved part");
    Ok(path.to_path_buf())
}

// only an untouched placeholder goes, a written image stays
fn release(path: &Path) {
    if let Ok(metadata) = fs::metadata(path) {
        if metadata.len() == 0 {
            if let Err(e) = fs::remove_file(path) {
                warn!(?path, "Unable to remove placeholder: {e}");
            }
        }
    }
}
