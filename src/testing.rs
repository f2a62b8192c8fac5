//! In-memory window system and remote used by unit tests

use std::cell::{Cell, RefCell};
use std::collections::{HashMap, HashSet};
use std::time::Duration;

use crate::codeview::SessionId;
use crate::codeview::button::ButtonView;
use crate::codeview::effect::ShaderEffect;
use crate::remote::{ActionParam, ActionScope, RemoteActions, RemoteError};
use crate::shared::window_state::{Geometry, Size};
use crate::window::identity::WindowIdentity;
use crate::window::{
    AnimationId, AppInfo, CloneId, Easing, TimerId, WindowHandle, WindowInfo, WindowSystem,
};

pub const SCREEN: Geometry = Geometry {
    x: 0,
    y: 0,
    width: 1920,
    height: 1080,
};

#[derive(Debug, Clone)]
pub struct FakeWindow {
    pub rect: Geometry,
    pub min: Size,
    pub maximized: bool,
    pub minimized: bool,
    pub visible: bool,
    pub rotation: f32,
    pub opacity: u8,
    pub effect: bool,
    pub first_frame: bool,
    pub destroyed: bool,
    pub tracked: bool,
}

impl FakeWindow {
    fn new(rect: Geometry) -> Self {
        Self {
            rect,
            min: Size::default(),
            maximized: false,
            minimized: false,
            visible: true,
            rotation: 0.0,
            opacity: 255,
            effect: false,
            first_frame: true,
            destroyed: false,
            tracked: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct FakeAnimation {
    pub id: AnimationId,
    pub window: WindowHandle,
    pub angle: f32,
    pub duration: Duration,
    pub easing: Easing,
}

#[derive(Debug, Default)]
pub struct FakeWindowSystem {
    pub windows: HashMap<WindowHandle, FakeWindow>,
    pub focused: Option<WindowHandle>,
    pub animations: Vec<FakeAnimation>,
    pub timers: Vec<(TimerId, Duration)>,
    pub clones: HashMap<CloneId, (WindowHandle, WindowHandle)>,
    pub deleted: Vec<WindowHandle>,
    pub activated: Vec<WindowHandle>,
    pub raised: Vec<WindowHandle>,
    pub completed_maps: Vec<WindowHandle>,
    pub held: Vec<WindowHandle>,
    pub completed_destroys: Vec<WindowHandle>,
    pub skipped_effects: Vec<WindowHandle>,
    pub expanded: Vec<(WindowHandle, Size)>,
    pub buttons: HashMap<SessionId, ButtonView>,
    pub removed_buttons: Vec<SessionId>,
    next_id: u64,
}

impl FakeWindowSystem {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_window(&mut self, handle: WindowHandle, rect: Geometry) -> &mut FakeWindow {
        self.windows.entry(handle).or_insert_with(|| FakeWindow::new(rect))
    }

    pub fn window(&self, handle: WindowHandle) -> &FakeWindow {
        &self.windows[&handle]
    }

    pub fn window_mut(&mut self, handle: WindowHandle) -> &mut FakeWindow {
        self.windows
            .get_mut(&handle)
            .unwrap_or_else(|| panic!("unknown window {handle}"))
    }

    /// Mark a window destroyed, as the compositor does before reporting it
    pub fn destroy(&mut self, handle: WindowHandle) {
        if let Some(window) = self.windows.get_mut(&handle) {
            window.destroyed = true;
        }
        if self.focused == Some(handle) {
            self.focused = None;
        }
    }

    /// Drain the pending rotations, applying their final angles
    pub fn finish_animations(&mut self) -> Vec<AnimationId> {
        let pending = std::mem::take(&mut self.animations);
        pending
            .into_iter()
            .map(|animation| {
                if let Some(window) = self.windows.get_mut(&animation.window) {
                    window.rotation = animation.angle;
                }
                animation.id
            })
            .collect()
    }

    pub fn take_timers(&mut self) -> Vec<TimerId> {
        std::mem::take(&mut self.timers)
            .into_iter()
            .map(|(id, _)| id)
            .collect()
    }

    fn next(&mut self) -> u64 {
        self.next_id += 1;
        self.next_id
    }
}

impl WindowSystem for FakeWindowSystem {
    fn is_destroyed(&self, window: WindowHandle) -> bool {
        self.windows.get(&window).is_none_or(|w| w.destroyed)
    }

    fn has_drawn_first_frame(&self, window: WindowHandle) -> bool {
        self.windows.get(&window).is_some_and(|w| w.first_frame)
    }

    fn focused_window(&self) -> Option<WindowHandle> {
        self.focused
    }

    fn frame_rect(&self, window: WindowHandle) -> Geometry {
        self.windows.get(&window).map(|w| w.rect).unwrap_or_default()
    }

    fn move_resize_frame(&mut self, window: WindowHandle, rect: Geometry) {
        if let Some(w) = self.windows.get_mut(&window) {
            w.rect = rect.expanded_to(w.min);
        }
    }

    fn minimum_size(&self, window: WindowHandle) -> Size {
        self.windows.get(&window).map(|w| w.min).unwrap_or_default()
    }

    fn expand_allocated_geometry(&mut self, window: WindowHandle, min: Size) {
        self.expanded.push((window, min));
        if let Some(w) = self.windows.get_mut(&window) {
            w.rect = w.rect.expanded_to(min);
        }
    }

    fn is_maximized(&self, window: WindowHandle) -> bool {
        self.windows.get(&window).is_some_and(|w| w.maximized)
    }

    fn maximize(&mut self, window: WindowHandle) {
        if let Some(w) = self.windows.get_mut(&window) {
            w.maximized = true;
            w.rect = SCREEN;
        }
    }

    fn unmaximize(&mut self, window: WindowHandle) {
        if let Some(w) = self.windows.get_mut(&window) {
            w.maximized = false;
        }
    }

    fn is_minimized(&self, window: WindowHandle) -> bool {
        self.windows.get(&window).is_some_and(|w| w.minimized)
    }

    fn minimize(&mut self, window: WindowHandle) {
        if let Some(w) = self.windows.get_mut(&window) {
            w.minimized = true;
        }
    }

    fn unminimize(&mut self, window: WindowHandle) {
        if let Some(w) = self.windows.get_mut(&window) {
            w.minimized = false;
        }
    }

    fn activate(&mut self, window: WindowHandle) {
        self.activated.push(window);
        self.focused = Some(window);
    }

    fn raise(&mut self, window: WindowHandle) {
        self.raised.push(window);
    }

    fn delete(&mut self, window: WindowHandle) {
        self.deleted.push(window);
    }

    fn is_visible(&self, window: WindowHandle) -> bool {
        self.windows.get(&window).is_some_and(|w| w.visible)
    }

    fn set_visible(&mut self, window: WindowHandle, visible: bool) {
        if let Some(w) = self.windows.get_mut(&window) {
            w.visible = visible;
        }
    }

    fn rotation(&self, window: WindowHandle) -> f32 {
        self.windows.get(&window).map(|w| w.rotation).unwrap_or(0.0)
    }

    fn set_rotation(&mut self, window: WindowHandle, angle: f32) {
        if let Some(w) = self.windows.get_mut(&window) {
            w.rotation = angle;
        }
    }

    fn set_opacity(&mut self, window: WindowHandle, opacity: u8) {
        if let Some(w) = self.windows.get_mut(&window) {
            w.opacity = opacity;
        }
    }

    fn set_effect_enabled(&mut self, window: WindowHandle, enabled: bool, _shader: ShaderEffect) {
        if let Some(w) = self.windows.get_mut(&window) {
            w.effect = enabled;
        }
    }

    fn ease_rotation(
        &mut self,
        window: WindowHandle,
        angle: f32,
        duration: Duration,
        easing: Easing,
    ) -> AnimationId {
        let id = AnimationId(self.next());
        self.animations.push(FakeAnimation {
            id,
            window,
            angle,
            duration,
            easing,
        });
        id
    }

    fn cancel_animation(&mut self, animation: AnimationId) {
        self.animations.retain(|a| a.id != animation);
    }

    fn attach_clone(&mut self, front: WindowHandle, back: WindowHandle) -> CloneId {
        let id = CloneId(self.next());
        self.clones.insert(id, (front, back));
        id
    }

    fn detach_clone(&mut self, _front: WindowHandle, clone: CloneId) {
        self.clones.remove(&clone);
    }

    fn complete_map(&mut self, window: WindowHandle) {
        self.completed_maps.push(window);
    }

    fn hold_actor(&mut self, window: WindowHandle) {
        self.held.push(window);
    }

    fn complete_destroy(&mut self, window: WindowHandle) {
        self.completed_destroys.push(window);
    }

    fn skip_next_effect(&mut self, window: WindowHandle) {
        self.skipped_effects.push(window);
    }

    fn track_actor_destroy(&mut self, window: WindowHandle, enabled: bool) {
        if let Some(w) = self.windows.get_mut(&window) {
            w.tracked = enabled;
        }
    }

    fn add_timeout(&mut self, delay: Duration) -> TimerId {
        let id = TimerId(self.next());
        self.timers.push((id, delay));
        id
    }

    fn cancel_timeout(&mut self, timer: TimerId) {
        self.timers.retain(|(id, _)| *id != timer);
    }

    fn present_button(&mut self, session: SessionId, view: &ButtonView) {
        self.buttons.insert(session, view.clone());
    }

    fn remove_button(&mut self, session: SessionId) {
        self.buttons.remove(&session);
        self.removed_buttons.push(session);
    }
}

/// Remote capabilities backed by tables filled in by the test
#[derive(Debug, Default)]
pub struct FakeRemote {
    pub targets: RefCell<HashMap<WindowHandle, WindowIdentity>>,
    pub actions: RefCell<HashMap<ActionScope, HashSet<String>>>,
    pub prepared: RefCell<Vec<ActionScope>>,
    pub invoked: RefCell<Vec<(ActionScope, String, ActionParam)>>,
    pub fail_invocations: Cell<bool>,
}

impl FakeRemote {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_target(&self, window: WindowHandle, target: WindowIdentity) {
        self.targets.borrow_mut().insert(window, target);
    }

    pub fn add_action(&self, scope: &ActionScope, name: &str) {
        self.actions
            .borrow_mut()
            .entry(scope.clone())
            .or_default()
            .insert(name.to_string());
    }

    pub fn invocations_of(&self, name: &str) -> Vec<(ActionScope, ActionParam)> {
        self.invoked
            .borrow()
            .iter()
            .filter(|(_, action, _)| action == name)
            .map(|(scope, _, param)| (scope.clone(), param.clone()))
            .collect()
    }
}

impl RemoteActions for FakeRemote {
    fn resolve_target(&self, window: &WindowInfo) -> Option<WindowIdentity> {
        self.targets.borrow().get(&window.handle).cloned()
    }

    fn prepare_actions(&self, scope: &ActionScope) {
        self.prepared.borrow_mut().push(scope.clone());
    }

    fn has_action(&self, scope: &ActionScope, name: &str) -> bool {
        self.actions
            .borrow()
            .get(scope)
            .is_some_and(|actions| actions.contains(name))
    }

    fn invoke_action(
        &self,
        scope: &ActionScope,
        name: &str,
        param: ActionParam,
    ) -> Result<(), RemoteError> {
        if self.fail_invocations.get() {
            return Err(RemoteError::Call(format!("{name} refused")));
        }
        self.invoked
            .borrow_mut()
            .push((scope.clone(), name.to_string(), param));
        Ok(())
    }
}

/// A GTK application window with a tracked, shown desktop entry
pub fn app_window(handle: u32, app_id: &str, sequence: u32) -> WindowInfo {
    let app_path = format!("/{}", app_id.replace('.', "/"));
    WindowInfo {
        handle: WindowHandle(handle),
        gtk_application_id: Some(app_id.to_string()),
        gtk_window_object_path: Some(format!("{app_path}/window/{sequence}")),
        gtk_application_object_path: Some(app_path),
        stable_sequence: sequence,
        app: Some(AppInfo {
            desktop_id: format!("{app_id}.desktop"),
            should_show: true,
            hackable: None,
            shader: None,
        }),
        normal: true,
    }
}

/// A toolbox window of the current toolbox application
pub fn toolbox_window(handle: u32, sequence: u32) -> WindowInfo {
    app_window(handle, "com.hack_computer.HackToolbox", sequence)
}
