//! Compositor adapter
//!
//! Mirrors window state from [`HostEvent`]s so the pairing core can query it
//! synchronously, and turns window-system mutations into [`ShellCommand`]s.
//! Mutations are applied to the mirror right away; the compositor reports
//! the real outcome later (size hints may change a requested rectangle).

use std::collections::HashMap;
use std::time::Duration;

use flipview_ipc::{
    ButtonDescriptor, EasingKind, GrabKind, HostEvent, ShellCommand, WindowDescriptor,
};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::codeview::button::ButtonView;
use crate::codeview::effect::ShaderEffect;
use crate::codeview::{Direction, SessionId, ShellMode};
use crate::context::ShellEvent;
use crate::shared::window_state::{Geometry, Size, WindowFlags};
use crate::window::{
    AnimationId, AppInfo, CloneId, Easing, GrabOp, TimerId, WindowHandle, WindowInfo, WindowSystem,
};

#[derive(Debug, Clone)]
struct MirroredWindow {
    rect: Geometry,
    min: Size,
    flags: WindowFlags,
    rotation: f32,
    first_frame: bool,
    destroyed: bool,
    tracked: bool,
    held: bool,
}

impl MirroredWindow {
    fn from_descriptor(desc: &WindowDescriptor) -> Self {
        Self {
            rect: Geometry::new(desc.x, desc.y, desc.width, desc.height),
            min: Size::new(desc.min_width, desc.min_height),
            flags: WindowFlags {
                maximized: desc.maximized,
                minimized: desc.minimized,
                visible: desc.visible,
            },
            rotation: 0.0,
            first_frame: desc.first_frame_drawn,
            destroyed: false,
            tracked: false,
            held: false,
        }
    }
}

/// Pairing metadata of a compositor window
pub fn window_info(desc: &WindowDescriptor) -> WindowInfo {
    WindowInfo {
        handle: WindowHandle(desc.id),
        gtk_application_id: desc.gtk_application_id.clone(),
        gtk_application_object_path: desc.gtk_application_object_path.clone(),
        gtk_window_object_path: desc.gtk_window_object_path.clone(),
        stable_sequence: desc.stable_sequence,
        app: desc.app.as_ref().map(|app| AppInfo {
            desktop_id: app.desktop_id.clone(),
            should_show: app.should_show,
            hackable: app.hackable,
            shader: app.shader.clone(),
        }),
        normal: desc.normal,
    }
}

fn button_descriptor(view: &ButtonView) -> ButtonDescriptor {
    ButtonDescriptor {
        visible: view.visible,
        reactive: view.reactive,
        flipped: view.flipped,
        dimmed: view.dimmed,
        highlighted: view.highlighted,
        rotating_right: view.rotating.map(|direction| direction == Direction::Right),
        sound_theme: view.sound_theme.to_string(),
        x: view.rect.x,
        y: view.rect.y,
        width: view.rect.width,
        height: view.rect.height,
    }
}

fn easing_kind(easing: Easing) -> EasingKind {
    match easing {
        Easing::EaseInQuad => EasingKind::EaseInQuad,
        Easing::EaseOutQuad => EasingKind::EaseOutQuad,
    }
}

fn grab_op(kind: GrabKind) -> GrabOp {
    match kind {
        GrabKind::Moving => GrabOp::Moving,
        GrabKind::Resizing => GrabOp::Resizing,
        GrabKind::Other => GrabOp::Other,
    }
}

pub struct IpcWindowSystem {
    windows: HashMap<WindowHandle, MirroredWindow>,
    /// Metadata of created windows waiting for their map
    pending: HashMap<WindowHandle, WindowInfo>,
    focused: Option<WindowHandle>,
    commands: mpsc::UnboundedSender<ShellCommand>,
    events: mpsc::UnboundedSender<ShellEvent>,
    timers: HashMap<TimerId, JoinHandle<()>>,
    next_id: u64,
}

impl IpcWindowSystem {
    /// Commands go to `commands`; fired timers come back through `events`.
    pub fn new(
        commands: mpsc::UnboundedSender<ShellCommand>,
        events: mpsc::UnboundedSender<ShellEvent>,
    ) -> Self {
        Self {
            windows: HashMap::new(),
            pending: HashMap::new(),
            focused: None,
            commands,
            events,
            timers: HashMap::new(),
            next_id: 0,
        }
    }

    fn send(&self, command: ShellCommand) {
        if let Err(e) = self.commands.send(command) {
            warn!("Failed to queue compositor command: {}", e);
        }
    }

    fn next(&mut self) -> u64 {
        self.next_id += 1;
        self.next_id
    }

    fn live(&self, window: WindowHandle) -> Option<&MirroredWindow> {
        self.windows.get(&window).filter(|w| !w.destroyed)
    }

    fn live_mut(&mut self, window: WindowHandle) -> Option<&mut MirroredWindow> {
        self.windows.get_mut(&window).filter(|w| !w.destroyed)
    }

    /// Replace the mirror with a full state sync. Returns the windows to
    /// hand to the pairing core.
    pub fn sync(&mut self, descriptors: Vec<WindowDescriptor>, focused: Option<u32>) -> Vec<WindowInfo> {
        info!("Syncing state: {} windows", descriptors.len());
        self.windows.clear();
        self.pending.clear();
        self.focused = focused.map(WindowHandle);

        descriptors
            .iter()
            .map(|desc| {
                self.windows
                    .insert(WindowHandle(desc.id), MirroredWindow::from_descriptor(desc));
                window_info(desc)
            })
            .collect()
    }

    /// The core did not take over a mapped window; let its effect run
    pub fn release_map(&mut self, window: WindowHandle) {
        self.send(ShellCommand::ReleaseMap { id: window.0 });
    }

    /// Forget a destroyed window once the core saw its destruction, unless
    /// its actor is held or tracked
    pub fn settle_destroyed(&mut self, window: WindowHandle) {
        if self
            .windows
            .get(&window)
            .is_some_and(|w| w.destroyed && !w.held && !w.tracked)
        {
            self.windows.remove(&window);
        }
    }

    /// Update the mirror and translate a compositor event into core events
    pub fn translate(&mut self, event: HostEvent) -> Vec<ShellEvent> {
        let event = match event {
            HostEvent::WindowCreated { window } => {
                let handle = WindowHandle(window.id);
                self.windows.insert(handle, MirroredWindow::from_descriptor(&window));
                self.pending.insert(handle, window_info(&window));
                return Vec::new();
            }
            HostEvent::WindowMapped { id } => {
                let handle = WindowHandle(id);
                match self.pending.remove(&handle) {
                    Some(info) => ShellEvent::WindowMapped(info),
                    None => {
                        warn!("Window {} mapped without being created", handle);
                        self.release_map(handle);
                        return Vec::new();
                    }
                }
            }
            HostEvent::WindowFirstFrame { id } => {
                if let Some(w) = self.windows.get_mut(&WindowHandle(id)) {
                    w.first_frame = true;
                }
                ShellEvent::WindowFirstFrame(WindowHandle(id))
            }
            HostEvent::WindowDestroyed { id } => {
                let handle = WindowHandle(id);
                self.pending.remove(&handle);
                // Dropped by settle_destroyed() unless the core holds the actor
                if let Some(w) = self.windows.get_mut(&handle) {
                    w.destroyed = true;
                }
                if self.focused == Some(handle) {
                    self.focused = None;
                }
                ShellEvent::WindowDestroyed(handle)
            }
            HostEvent::ActorDestroyed { id } => {
                let handle = WindowHandle(id);
                let tracked = self.windows.remove(&handle).is_some_and(|w| w.tracked);
                if !tracked {
                    return Vec::new();
                }
                ShellEvent::ActorDestroyed(handle)
            }
            HostEvent::WindowMinimized { id } => {
                if let Some(w) = self.live_mut(WindowHandle(id)) {
                    w.flags.minimized = true;
                }
                ShellEvent::Minimized(WindowHandle(id))
            }
            HostEvent::WindowUnminimized { id } => {
                if let Some(w) = self.live_mut(WindowHandle(id)) {
                    w.flags.minimized = false;
                }
                ShellEvent::Unminimized(WindowHandle(id))
            }
            HostEvent::WindowGeometryChanged { id, x, y, width, height } => {
                if let Some(w) = self.live_mut(WindowHandle(id)) {
                    w.rect = Geometry::new(x, y, width, height);
                }
                ShellEvent::GeometryChanged(WindowHandle(id))
            }
            HostEvent::WindowGeometryAllocate { id } => ShellEvent::GeometryAllocate(WindowHandle(id)),
            HostEvent::WindowMaximizeChanged { id, maximized } => {
                if let Some(w) = self.live_mut(WindowHandle(id)) {
                    w.flags.maximized = maximized;
                }
                ShellEvent::MaximizeChanged(WindowHandle(id))
            }
            HostEvent::WindowRaised { id } => ShellEvent::Raised(WindowHandle(id)),
            HostEvent::WindowVisibilityChanged { id, visible } => {
                if let Some(w) = self.live_mut(WindowHandle(id)) {
                    w.flags.visible = visible;
                }
                ShellEvent::VisibilityChanged(WindowHandle(id))
            }
            HostEvent::GrabBegin { id, op } => ShellEvent::GrabBegin(WindowHandle(id), grab_op(op)),
            HostEvent::GrabEnd { id } => ShellEvent::GrabEnd(WindowHandle(id)),
            HostEvent::FocusChanged { id } => {
                self.focused = id.map(WindowHandle);
                ShellEvent::FocusChanged(self.focused)
            }
            HostEvent::ShellModeChanged { overview, fullscreen, locked } => {
                ShellEvent::ShellModeChanged(ShellMode {
                    overview,
                    fullscreen,
                    locked,
                })
            }
            HostEvent::AnimationCompleted { animation } => {
                ShellEvent::AnimationCompleted(AnimationId(animation))
            }
            HostEvent::ButtonClicked { session } => ShellEvent::ButtonClicked(SessionId(session)),
            HostEvent::KillEffects { id } => ShellEvent::KillEffects(WindowHandle(id)),
            HostEvent::SetToolboxVisible { object_path, visible } => {
                ShellEvent::SetToolboxVisible { object_path, visible }
            }
            HostEvent::SetPulseFlipButton { object_path, pulse } => {
                ShellEvent::SetPulseFlipButton { object_path, pulse }
            }
            HostEvent::InstalledAppsChanged => ShellEvent::InstalledAppsChanged,
            HostEvent::Stopped => ShellEvent::Stopped,
            HostEvent::SyncState { .. } => {
                debug!("State sync must go through sync()");
                return Vec::new();
            }
        };
        vec![event]
    }
}

impl WindowSystem for IpcWindowSystem {
    fn is_destroyed(&self, window: WindowHandle) -> bool {
        self.live(window).is_none()
    }

    fn has_drawn_first_frame(&self, window: WindowHandle) -> bool {
        self.windows.get(&window).is_some_and(|w| w.first_frame)
    }

    fn focused_window(&self) -> Option<WindowHandle> {
        self.focused
    }

    fn frame_rect(&self, window: WindowHandle) -> Geometry {
        self.live(window).map(|w| w.rect).unwrap_or_default()
    }

    fn move_resize_frame(&mut self, window: WindowHandle, rect: Geometry) {
        let Some(w) = self.live_mut(window) else {
            return;
        };
        let rect = rect.expanded_to(w.min);
        w.rect = rect;
        self.send(ShellCommand::MoveResize {
            id: window.0,
            x: rect.x,
            y: rect.y,
            width: rect.width,
            height: rect.height,
        });
    }

    fn minimum_size(&self, window: WindowHandle) -> Size {
        self.live(window).map(|w| w.min).unwrap_or_default()
    }

    fn expand_allocated_geometry(&mut self, window: WindowHandle, min: Size) {
        if let Some(w) = self.live_mut(window) {
            w.rect = w.rect.expanded_to(min);
        }
        self.send(ShellCommand::ExpandAllocation {
            id: window.0,
            min_width: min.width,
            min_height: min.height,
        });
    }

    fn is_maximized(&self, window: WindowHandle) -> bool {
        self.live(window).is_some_and(|w| w.flags.maximized)
    }

    fn maximize(&mut self, window: WindowHandle) {
        if let Some(w) = self.live_mut(window) {
            w.flags.maximized = true;
        }
        self.send(ShellCommand::Maximize { id: window.0 });
    }

    fn unmaximize(&mut self, window: WindowHandle) {
        if let Some(w) = self.live_mut(window) {
            w.flags.maximized = false;
        }
        self.send(ShellCommand::Unmaximize { id: window.0 });
    }

    fn is_minimized(&self, window: WindowHandle) -> bool {
        self.live(window).is_some_and(|w| w.flags.minimized)
    }

    fn minimize(&mut self, window: WindowHandle) {
        if let Some(w) = self.live_mut(window) {
            w.flags.minimized = true;
        }
        self.send(ShellCommand::Minimize { id: window.0 });
    }

    fn unminimize(&mut self, window: WindowHandle) {
        if let Some(w) = self.live_mut(window) {
            w.flags.minimized = false;
        }
        self.send(ShellCommand::Unminimize { id: window.0 });
    }

    fn activate(&mut self, window: WindowHandle) {
        if self.is_destroyed(window) {
            return;
        }
        self.focused = Some(window);
        self.send(ShellCommand::Activate { id: window.0 });
    }

    fn raise(&mut self, window: WindowHandle) {
        self.send(ShellCommand::Raise { id: window.0 });
    }

    fn delete(&mut self, window: WindowHandle) {
        self.send(ShellCommand::Delete { id: window.0 });
    }

    fn is_visible(&self, window: WindowHandle) -> bool {
        self.live(window).is_some_and(|w| w.flags.visible)
    }

    fn set_visible(&mut self, window: WindowHandle, visible: bool) {
        if let Some(w) = self.live_mut(window) {
            w.flags.visible = visible;
        }
        self.send(ShellCommand::SetVisible { id: window.0, visible });
    }

    fn rotation(&self, window: WindowHandle) -> f32 {
        self.windows.get(&window).map(|w| w.rotation).unwrap_or(0.0)
    }

    fn set_rotation(&mut self, window: WindowHandle, angle: f32) {
        if let Some(w) = self.windows.get_mut(&window) {
            w.rotation = angle;
        }
        self.send(ShellCommand::SetRotation { id: window.0, angle });
    }

    fn set_opacity(&mut self, window: WindowHandle, opacity: u8) {
        self.send(ShellCommand::SetOpacity { id: window.0, opacity });
    }

    fn set_effect_enabled(&mut self, window: WindowHandle, enabled: bool, shader: ShaderEffect) {
        self.send(ShellCommand::SetEffect {
            id: window.0,
            enabled,
            shader: shader.name().to_string(),
        });
    }

    fn ease_rotation(
        &mut self,
        window: WindowHandle,
        angle: f32,
        duration: Duration,
        easing: Easing,
    ) -> AnimationId {
        let animation = AnimationId(self.next());
        if let Some(w) = self.windows.get_mut(&window) {
            w.rotation = angle;
        }
        self.send(ShellCommand::EaseRotation {
            id: window.0,
            animation: animation.0,
            angle,
            duration_ms: duration.as_millis() as u64,
            easing: easing_kind(easing),
        });
        animation
    }

    fn cancel_animation(&mut self, animation: AnimationId) {
        self.send(ShellCommand::CancelAnimation { animation: animation.0 });
    }

    fn attach_clone(&mut self, front: WindowHandle, back: WindowHandle) -> CloneId {
        let clone = CloneId(self.next());
        self.send(ShellCommand::AttachClone {
            front: front.0,
            back: back.0,
            clone: clone.0,
        });
        clone
    }

    fn detach_clone(&mut self, front: WindowHandle, clone: CloneId) {
        self.send(ShellCommand::DetachClone {
            front: front.0,
            clone: clone.0,
        });
    }

    fn complete_map(&mut self, window: WindowHandle) {
        self.send(ShellCommand::CompleteMap { id: window.0 });
    }

    fn hold_actor(&mut self, window: WindowHandle) {
        if let Some(w) = self.windows.get_mut(&window) {
            w.held = true;
        }
        self.send(ShellCommand::HoldActor { id: window.0 });
    }

    fn complete_destroy(&mut self, window: WindowHandle) {
        if self.windows.get(&window).is_some_and(|w| w.destroyed) {
            self.windows.remove(&window);
        }
        self.send(ShellCommand::CompleteDestroy { id: window.0 });
    }

    fn skip_next_effect(&mut self, window: WindowHandle) {
        self.send(ShellCommand::SkipNextEffect { id: window.0 });
    }

    fn track_actor_destroy(&mut self, window: WindowHandle, enabled: bool) {
        if let Some(w) = self.windows.get_mut(&window) {
            w.tracked = enabled;
        }
        self.send(ShellCommand::TrackActorDestroy { id: window.0, enabled });
    }

    fn add_timeout(&mut self, delay: Duration) -> TimerId {
        self.timers.retain(|_, handle| !handle.is_finished());

        let timer = TimerId(self.next());
        let events = self.events.clone();
        let handle = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            // The loop is gone when shutting down
            let _ = events.send(ShellEvent::TimerFired(timer));
        });
        self.timers.insert(timer, handle);
        timer
    }

    fn cancel_timeout(&mut self, timer: TimerId) {
        if let Some(handle) = self.timers.remove(&timer) {
            handle.abort();
        }
    }

    fn present_button(&mut self, session: SessionId, view: &ButtonView) {
        self.send(ShellCommand::UpdateButton {
            session: session.0,
            button: button_descriptor(view),
        });
    }

    fn remove_button(&mut self, session: SessionId) {
        self.send(ShellCommand::RemoveButton { session: session.0 });
    }
}

impl Drop for IpcWindowSystem {
    fn drop(&mut self) {
        for (_, handle) in self.timers.drain() {
            handle.abort();
        }
    }
}
