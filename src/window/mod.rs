//! Window system capabilities
//!
//! Everything the pairing core needs from the compositor: window metadata,
//! queries and mutations on frames and actors, timed rotations and timers.
//! Long-running operations return an id and report completion later as a
//! [`crate::context::ShellEvent`], so the core never blocks.

pub mod identity;

use std::fmt;
use std::time::Duration;

use crate::codeview::button::ButtonView;
use crate::codeview::effect::ShaderEffect;
use crate::codeview::SessionId;
use crate::shared::window_state::{Geometry, Size};

/// Handle of a compositor window (and its actor)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct WindowHandle(pub u32);

impl fmt::Display for WindowHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:x}", self.0)
    }
}

/// Desktop entry information of the application owning a window
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppInfo {
    /// Desktop file id, including the `.desktop` suffix
    pub desktop_id: String,
    /// Whether the entry is shown in menus (`NoDisplay` unset)
    pub should_show: bool,
    /// Explicit `X-Endless-Hackable` flag
    pub hackable: Option<bool>,
    /// `X-Endless-HackShader` value
    pub shader: Option<String>,
}

/// Metadata the compositor reports for a window when it is created
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WindowInfo {
    pub handle: WindowHandle,
    pub gtk_application_id: Option<String>,
    pub gtk_application_object_path: Option<String>,
    pub gtk_window_object_path: Option<String>,
    pub stable_sequence: u32,
    /// Tracked application, `None` for windows with no desktop entry
    pub app: Option<AppInfo>,
    /// Normal toplevel window
    pub normal: bool,
}

/// Id of a rotation started with [`WindowSystem::ease_rotation`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct AnimationId(pub u64);

/// Id of a timeout started with [`WindowSystem::add_timeout`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TimerId(pub u64);

/// Id of a lightweight actor clone
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CloneId(pub u64);

/// Easing curve for rotations
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Easing {
    EaseInQuad,
    EaseOutQuad,
}

/// Kind of interactive grab
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GrabOp {
    Moving,
    Resizing,
    Other,
}

impl GrabOp {
    /// Move and resize drags are the ones that drag the back window along
    pub fn drags_window(self) -> bool {
        matches!(self, GrabOp::Moving | GrabOp::Resizing)
    }
}

/// Compositor capabilities consumed by the pairing core
pub trait WindowSystem {
    /// The window has been destroyed (its actor may still be held for an effect)
    fn is_destroyed(&self, window: WindowHandle) -> bool;
    fn has_drawn_first_frame(&self, window: WindowHandle) -> bool;
    fn focused_window(&self) -> Option<WindowHandle>;

    fn frame_rect(&self, window: WindowHandle) -> Geometry;
    /// Request a new frame rectangle; size hints may make it not stick exactly
    fn move_resize_frame(&mut self, window: WindowHandle, rect: Geometry);
    /// Minimum size hints, in frame coordinates
    fn minimum_size(&self, window: WindowHandle) -> Size;
    /// Expand the allocation currently being computed for `window`
    fn expand_allocated_geometry(&mut self, window: WindowHandle, min: Size);

    fn is_maximized(&self, window: WindowHandle) -> bool;
    fn maximize(&mut self, window: WindowHandle);
    fn unmaximize(&mut self, window: WindowHandle);
    fn is_minimized(&self, window: WindowHandle) -> bool;
    fn minimize(&mut self, window: WindowHandle);
    fn unminimize(&mut self, window: WindowHandle);

    fn activate(&mut self, window: WindowHandle);
    fn raise(&mut self, window: WindowHandle);
    /// Ask the window to close
    fn delete(&mut self, window: WindowHandle);

    fn is_visible(&self, window: WindowHandle) -> bool;
    fn set_visible(&mut self, window: WindowHandle, visible: bool);
    fn rotation(&self, window: WindowHandle) -> f32;
    fn set_rotation(&mut self, window: WindowHandle, angle: f32);
    fn set_opacity(&mut self, window: WindowHandle, opacity: u8);
    fn set_effect_enabled(&mut self, window: WindowHandle, enabled: bool, shader: ShaderEffect);

    /// Ease the actor's rotation; completion is reported with the returned id
    fn ease_rotation(
        &mut self,
        window: WindowHandle,
        angle: f32,
        duration: Duration,
        easing: Easing,
    ) -> AnimationId;
    fn cancel_animation(&mut self, animation: AnimationId);

    fn attach_clone(&mut self, front: WindowHandle, back: WindowHandle) -> CloneId;
    fn detach_clone(&mut self, front: WindowHandle, clone: CloneId);

    fn complete_map(&mut self, window: WindowHandle);
    /// Keep the actor of a destroyed window around until `complete_destroy`
    fn hold_actor(&mut self, window: WindowHandle);
    fn complete_destroy(&mut self, window: WindowHandle);
    fn skip_next_effect(&mut self, window: WindowHandle);
    /// Report actor destruction even when the window manager would not
    fn track_actor_destroy(&mut self, window: WindowHandle, enabled: bool);

    fn add_timeout(&mut self, delay: Duration) -> TimerId;
    fn cancel_timeout(&mut self, timer: TimerId);

    fn present_button(&mut self, session: SessionId, view: &ButtonView);
    fn remove_button(&mut self, session: SessionId);
}
