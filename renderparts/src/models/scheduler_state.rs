use super::tile::TileDescriptor;

/// Where a render job stands. Lives only as long as the scheduler that owns it.
#[derive(Debug, Clone, Default, PartialEq)]
pub enum SchedulerState {
    #[default]
    Idle,
    /// Placeholder and region are being set up, render call in progress.
    Dispatching(TileDescriptor),
    /// Renderer accepted the tile, waiting for its lifecycle events.
    AwaitingRenderEnd(TileDescriptor),
    Finished,
    Cancelled,
}

impl SchedulerState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, SchedulerState::Finished | SchedulerState::Cancelled)
    }

    pub fn tile(&self) -> Option<&TileDescriptor> {
        match self {
            SchedulerState::Dispatching(tile) | SchedulerState::AwaitingRenderEnd(tile) => Some(tile),
            _ => None,
        }
    }
}

/// Flags flipped by the render lifecycle events.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SchedulerFlags {
    pub stop_requested: bool,
    pub render_in_progress: bool,
    pub last_render_complete: bool,
}

impl SchedulerFlags {
    /// Flags right after `start`.
    pub fn armed() -> Self {
        Self {
            stop_requested: false,
            render_in_progress: false,
            last_render_complete: true,
        }
    }

    /// A new tile may only go out when the previous one reported completion.
    pub fn ready_to_dispatch(&self) -> bool {
        self.last_render_complete && !self.render_in_progress && !self.stop_requested
    }
}
