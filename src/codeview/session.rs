//! Coding session
//!
//! A session pairs an application window ("app") with its toolbox window and
//! owns the flip between them: a two-phase rotation where the outgoing window
//! turns to its midpoint, the incoming window takes over at its own midpoint
//! and both finish back to back. Every step is a continuation keyed by the
//! animation or window it waits on, so the session is driven entirely by the
//! events the compositor reports back.
//!
//! Invariants:
//! - at most one flip is in flight
//! - `state` only changes when a flip completes, on focus reconciliation, or
//!   when one side disappears
//! - after `destroy`, no pending continuation runs

use std::collections::HashMap;

use tracing::{debug, info, warn};

use super::button::PairingButton;
use super::effect::ShaderEffect;
use super::sync::{common_minimum, synchronize_geometries};
use super::{Direction, SessionId, SessionTiming, ShellMode, Side};
use crate::remote::{ActionParam, ActionScope, RemoteActions};
use crate::shared::window_state::Size;
use crate::window::identity::{WindowIdentity, window_identity};
use crate::window::{AnimationId, CloneId, Easing, TimerId, WindowHandle, WindowInfo, WindowSystem};

/// Why a session is torn down
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DestroyReason {
    AppDestroyed,
    ToolboxDestroyed,
}

/// Replacement the session expects for its app window
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PendingReplacement {
    #[default]
    None,
    /// The toolbox asked to flip back; the app restarts and its old window goes away
    FlipBack,
}

/// Notifications drained by the manager after each event
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionSignal {
    Minimized,
    Unminimized,
    StateChanged,
}

#[derive(Debug, Clone)]
struct PairedWindow {
    info: WindowInfo,
    identity: WindowIdentity,
}

impl PairedWindow {
    fn handle(&self) -> WindowHandle {
        self.info.handle
    }
}

#[derive(Debug, Clone, Copy)]
enum Step {
    AttachButton,
    StartRotation,
    RotateOutMidpoint,
    RotateInMidpoint,
    RotateOutDone,
    RotateInDone,
}

#[derive(Debug, Clone, Copy)]
struct Flip {
    target: Side,
    src: WindowHandle,
    /// Held actor of a replaced app; it rotates in place of `new_dst` until the midpoint
    old_dst: Option<WindowHandle>,
    new_dst: WindowHandle,
    direction: Direction,
    started: bool,
    rotating_in: bool,
    rotating_out: bool,
}

#[derive(Debug, Clone, Copy)]
struct BackClone {
    front: WindowHandle,
    back: WindowHandle,
    clone: CloneId,
}

#[derive(Debug)]
pub struct CodingSession {
    id: SessionId,
    timing: SessionTiming,
    shader: ShaderEffect,

    app: Option<PairedWindow>,
    toolbox: Option<PairedWindow>,
    toolbox_target: Option<WindowIdentity>,
    /// Actor of an app that closed for a flip-back, kept until the replacement rotates in
    removed_app: Option<WindowHandle>,

    state: Side,
    pending: PendingReplacement,
    awaiting_toolbox: bool,
    init_requested: bool,
    grabbed: bool,
    hackable: bool,
    shell_mode: ShellMode,

    button: Option<PairingButton>,
    flip: Option<Flip>,
    animations: HashMap<AnimationId, Step>,
    first_frame_waits: Vec<(WindowHandle, Step)>,
    grab_timer: Option<TimerId>,
    back_clone: Option<BackClone>,
    raise_echo: Option<WindowHandle>,

    toolbox_app_scope: Option<ActionScope>,
    toolbox_scope: Option<ActionScope>,
    app_scope: Option<ActionScope>,

    signals: Vec<SessionSignal>,
    destroyed: bool,
}

impl CodingSession {
    pub fn new(id: SessionId, timing: SessionTiming) -> Self {
        Self {
            id,
            timing,
            shader: timing.default_shader,
            app: None,
            toolbox: None,
            toolbox_target: None,
            removed_app: None,
            state: Side::App,
            pending: PendingReplacement::None,
            awaiting_toolbox: false,
            init_requested: false,
            grabbed: false,
            hackable: true,
            shell_mode: ShellMode::default(),
            button: None,
            flip: None,
            animations: HashMap::new(),
            first_frame_waits: Vec::new(),
            grab_timer: None,
            back_clone: None,
            raise_echo: None,
            toolbox_app_scope: None,
            toolbox_scope: None,
            app_scope: None,
            signals: Vec::new(),
            destroyed: false,
        }
    }

    pub fn id(&self) -> SessionId {
        self.id
    }

    pub fn state(&self) -> Side {
        self.state
    }

    pub fn app(&self) -> Option<WindowHandle> {
        self.app.as_ref().map(PairedWindow::handle)
    }

    pub fn toolbox(&self) -> Option<WindowHandle> {
        self.toolbox.as_ref().map(PairedWindow::handle)
    }

    pub fn app_info(&self) -> Option<&WindowInfo> {
        self.app.as_ref().map(|w| &w.info)
    }

    pub fn app_identity(&self) -> Option<&WindowIdentity> {
        self.app.as_ref().map(|w| &w.identity)
    }

    pub fn app_id(&self) -> Option<&str> {
        self.app_identity().map(|identity| identity.app_id.as_str())
    }

    pub fn toolbox_target(&self) -> Option<&WindowIdentity> {
        self.toolbox_target.as_ref()
    }

    pub fn pending_replacement(&self) -> PendingReplacement {
        self.pending
    }

    pub fn is_grabbed(&self) -> bool {
        self.grabbed
    }

    pub fn is_animating(&self) -> bool {
        self.flip.is_some()
    }

    pub fn is_awaiting_toolbox(&self) -> bool {
        self.awaiting_toolbox
    }

    pub fn is_hackable(&self) -> bool {
        self.hackable
    }

    pub fn is_destroyed(&self) -> bool {
        self.destroyed
    }

    /// No window left to pair
    pub fn is_empty(&self) -> bool {
        self.app.is_none() && self.toolbox.is_none()
    }

    pub fn button(&self) -> Option<&PairingButton> {
        self.button.as_ref()
    }

    pub fn contains(&self, window: WindowHandle) -> bool {
        self.side_of(window).is_some()
    }

    pub fn side_of(&self, window: WindowHandle) -> Option<Side> {
        if self.app() == Some(window) {
            Some(Side::App)
        } else if self.toolbox() == Some(window) {
            Some(Side::Toolbox)
        } else {
            None
        }
    }

    fn handle_for(&self, side: Side) -> Option<WindowHandle> {
        match side {
            Side::App => self.app(),
            Side::Toolbox => self.toolbox(),
        }
    }

    /// Window currently facing the user
    pub fn front_window(&self) -> Option<WindowHandle> {
        self.handle_for(self.state)
    }

    /// Window currently turned away, when both are present
    pub fn back_window(&self) -> Option<WindowHandle> {
        match self.state {
            Side::App => self.toolbox(),
            Side::Toolbox => self.app(),
        }
    }

    fn other(&self, window: WindowHandle) -> Option<WindowHandle> {
        match self.side_of(window)? {
            Side::App => self.toolbox(),
            Side::Toolbox => self.app(),
        }
    }

    fn is_front(&self, window: WindowHandle) -> bool {
        self.front_window() == Some(window)
    }

    fn common_min(&self, windows: &dyn WindowSystem, a: WindowHandle, b: WindowHandle) -> Option<Size> {
        self.timing
            .constrain_geometry
            .then(|| common_minimum(windows, a, b))
    }

    /// Bring in the app window. Rejected when the session is destroyed or
    /// already has an app.
    ///
    /// A session that only holds its toolbox (the app closed for a flip-back)
    /// flips to the new app, using the held actor of the old one for the first
    /// half of the rotation.
    pub fn admit_app(
        &mut self,
        windows: &mut dyn WindowSystem,
        remote: &dyn RemoteActions,
        info: WindowInfo,
    ) -> bool {
        if self.destroyed || self.app.is_some() {
            return false;
        }
        let Some(identity) = window_identity(&info) else {
            debug!("Window {} has no app id, not pairing", info.handle);
            return false;
        };

        let handle = info.handle;
        let removed = self.removed_app.take();
        self.pending = PendingReplacement::None;

        self.shader = ShaderEffect::resolve(
            info.app.as_ref().and_then(|app| app.shader.as_deref()),
            self.timing.default_shader,
        );
        self.app_scope = ActionScope::application(&info);
        if let Some(scope) = &self.app_scope {
            remote.prepare_actions(scope);
        }
        if self.toolbox_app_scope.is_none() {
            let scope = ActionScope::toolbox_app(&identity.app_id);
            remote.prepare_actions(&scope);
            self.toolbox_app_scope = Some(scope);
        }

        info!("{}: app {} ({})", self.id, handle, identity);
        self.app = Some(PairedWindow { info, identity });
        self.ensure_button(windows);

        let flipped = match self.toolbox() {
            Some(toolbox) => self.setup_flip(
                windows,
                remote,
                Side::App,
                toolbox,
                removed,
                handle,
                Direction::Right,
            ),
            None => false,
        };
        if !flipped && let Some(removed) = removed {
            windows.complete_destroy(removed);
        }

        self.sync_button_visibility(windows, remote);
        true
    }

    /// Bring in the toolbox window targeting this session's app.
    ///
    /// When the user asked for the toolbox, the session flips to it. A toolbox
    /// that shows up on its own is paired behind the app and the state stays
    /// on the app.
    pub fn admit_toolbox(
        &mut self,
        windows: &mut dyn WindowSystem,
        remote: &dyn RemoteActions,
        info: WindowInfo,
        target: WindowIdentity,
    ) -> bool {
        if self.destroyed || self.toolbox.is_some() {
            return false;
        }
        let Some(identity) = window_identity(&info) else {
            return false;
        };

        let handle = info.handle;
        self.toolbox_scope = ActionScope::window(&info);
        if let Some(scope) = &self.toolbox_scope {
            remote.prepare_actions(scope);
        }

        info!("{}: toolbox {} for {}", self.id, handle, target);
        self.toolbox = Some(PairedWindow { info, identity });
        self.toolbox_target = Some(target);

        if let Some(app) = self.app() {
            if self.awaiting_toolbox {
                self.awaiting_toolbox = false;
                if let Some(button) = &mut self.button {
                    button.set_reactive(true);
                }
                self.setup_flip(windows, remote, Side::Toolbox, app, None, handle, Direction::Left);
            } else {
                self.place_behind(windows, app, handle);
            }
        }

        self.sync_button_visibility(windows, remote);
        true
    }

    /// Pair `back` behind `front` without animating
    fn place_behind(&mut self, windows: &mut dyn WindowSystem, front: WindowHandle, back: WindowHandle) {
        if windows.is_destroyed(front) || windows.is_destroyed(back) {
            return;
        }
        let min = self.common_min(windows, front, back);
        synchronize_geometries(windows, front, back, min);
        windows.set_rotation(back, 180.0);
        windows.set_effect_enabled(back, true, self.shader);
        windows.raise(front);
    }

    fn ensure_button(&mut self, windows: &mut dyn WindowSystem) {
        if self.button.is_some() {
            return;
        }
        self.button = Some(PairingButton::new());

        let Some(front) = self.front_window() else {
            return;
        };
        if windows.has_drawn_first_frame(front) {
            self.attach_button(windows, front);
        } else {
            self.first_frame_waits.push((front, Step::AttachButton));
        }
    }

    fn attach_button(&mut self, windows: &mut dyn WindowSystem, window: WindowHandle) {
        let rect = windows.frame_rect(window);
        let state = self.state;
        if let Some(button) = &mut self.button {
            button.set_state(state);
            button.set_rect(rect);
            button.attach();
        }
    }

    /// The user asked to flip. Ignored while a flip is running, during a grab,
    /// or while the button is waiting on another application.
    pub fn request_flip(&mut self, windows: &mut dyn WindowSystem, remote: &dyn RemoteActions) {
        if self.destroyed || self.flip.is_some() || self.grabbed {
            debug!("{}: flip request ignored", self.id);
            return;
        }
        if let Some(button) = &mut self.button {
            if !button.reactive() {
                debug!("{}: flip request ignored, button inactive", self.id);
                return;
            }
            button.set_dimmed(true);
        }

        match self.state {
            Side::App => self.switch_to_toolbox(windows, remote),
            Side::Toolbox => self.switch_to_app(windows, remote),
        }
    }

    fn switch_to_toolbox(&mut self, windows: &mut dyn WindowSystem, remote: &dyn RemoteActions) {
        let Some(app) = self.app() else {
            self.set_button_dimmed(false);
            return;
        };

        if let Some(toolbox) = self.toolbox() {
            self.setup_flip(windows, remote, Side::Toolbox, app, None, toolbox, Direction::Left);
            return;
        }

        // Ask the toolbox application for a window targeting this app; the
        // flip runs when it is admitted.
        let (Some(scope), Some(identity)) = (&self.toolbox_app_scope, self.app_identity()) else {
            self.set_button_dimmed(false);
            return;
        };
        match remote.invoke_action(scope, "flip", ActionParam::Target(identity.clone())) {
            Ok(()) => {
                debug!("{}: requested toolbox for {}", self.id, identity);
                self.awaiting_toolbox = true;
                if let Some(button) = &mut self.button {
                    button.set_reactive(false);
                }
            }
            Err(e) => {
                warn!("{}: could not request a toolbox: {}", self.id, e);
                self.set_button_dimmed(false);
            }
        }
    }

    fn switch_to_app(&mut self, windows: &mut dyn WindowSystem, remote: &dyn RemoteActions) {
        let Some(toolbox) = self.toolbox() else {
            self.set_button_dimmed(false);
            return;
        };

        // The toolbox may restart the app with its changes applied
        if let Some(scope) = &self.toolbox_scope
            && remote.has_action(scope, "flip-back")
        {
            match remote.invoke_action(scope, "flip-back", ActionParam::None) {
                Ok(()) => {
                    debug!("{}: flip-back requested", self.id);
                    self.pending = PendingReplacement::FlipBack;
                    if let Some(button) = &mut self.button {
                        button.set_reactive(false);
                    }
                    return;
                }
                Err(e) => warn!("{}: flip-back failed, flipping locally: {}", self.id, e),
            }
        }

        match self.app() {
            Some(app) => {
                self.setup_flip(windows, remote, Side::App, toolbox, None, app, Direction::Right);
            }
            None => self.set_button_dimmed(false),
        }
    }

    fn set_button_dimmed(&mut self, dimmed: bool) {
        if let Some(button) = &mut self.button {
            button.set_dimmed(dimmed);
        }
    }

    /// Prepare a flip from `src` to `new_dst` and start it once `new_dst` has
    /// drawn. Returns whether a flip was set up.
    #[allow(clippy::too_many_arguments)]
    fn setup_flip(
        &mut self,
        windows: &mut dyn WindowSystem,
        remote: &dyn RemoteActions,
        target: Side,
        src: WindowHandle,
        old_dst: Option<WindowHandle>,
        new_dst: WindowHandle,
        direction: Direction,
    ) -> bool {
        if self.flip.is_some() || self.state == target {
            return false;
        }
        if windows.is_destroyed(src) || windows.is_destroyed(new_dst) {
            warn!("{}: cannot flip, window already gone", self.id);
            return false;
        }

        debug!("{}: flip {} -> {} ({:?})", self.id, src, new_dst, direction);
        self.prepare_animation(windows, src, old_dst, new_dst, direction);
        self.flip = Some(Flip {
            target,
            src,
            old_dst,
            new_dst,
            direction,
            started: false,
            rotating_in: true,
            rotating_out: true,
        });

        if windows.has_drawn_first_frame(new_dst) {
            self.start_rotation(windows, remote);
        } else {
            self.first_frame_waits.push((new_dst, Step::StartRotation));
        }
        true
    }

    fn prepare_animation(
        &self,
        windows: &mut dyn WindowSystem,
        src: WindowHandle,
        old_dst: Option<WindowHandle>,
        new_dst: WindowHandle,
        direction: Direction,
    ) {
        windows.activate(src);

        let min = self.common_min(windows, src, new_dst);
        synchronize_geometries(windows, src, new_dst, min);

        windows.set_visible(src, true);
        windows.set_visible(new_dst, true);
        // The incoming window stays invisible until it turns its front
        if old_dst.is_some() || direction == Direction::Left {
            windows.set_opacity(new_dst, 0);
        }

        let start = direction.incoming_start();
        windows.set_rotation(new_dst, start);
        windows.set_rotation(src, 0.0);
        windows.set_effect_enabled(src, false, self.shader);
        if let Some(old_dst) = old_dst {
            windows.set_rotation(old_dst, start);
        }
    }

    fn start_rotation(&mut self, windows: &mut dyn WindowSystem, _remote: &dyn RemoteActions) {
        let Some(flip) = self.flip.as_mut() else {
            return;
        };
        if flip.started {
            return;
        }
        flip.started = true;
        let flip = *flip;

        let duration = self.timing.half_flip();
        let out = windows.ease_rotation(
            flip.src,
            flip.direction.outgoing_midpoint(),
            duration,
            Easing::EaseInQuad,
        );
        self.animations.insert(out, Step::RotateOutMidpoint);

        let incoming = flip.old_dst.unwrap_or(flip.new_dst);
        let rotate_in = windows.ease_rotation(
            incoming,
            flip.direction.incoming_midpoint(),
            duration,
            Easing::EaseInQuad,
        );
        self.animations.insert(rotate_in, Step::RotateInMidpoint);

        if let Some(button) = &mut self.button {
            button.switch_animation(flip.direction, flip.target);
        }
    }

    fn rotate_out_midpoint(&mut self, windows: &mut dyn WindowSystem, remote: &dyn RemoteActions) {
        let Some(flip) = self.flip else {
            return;
        };
        self.activate_app_flip(remote, flip.target == Side::Toolbox);
        windows.set_effect_enabled(flip.src, true, self.shader);

        let id = windows.ease_rotation(
            flip.src,
            flip.direction.outgoing_final(),
            self.timing.half_flip(),
            Easing::EaseOutQuad,
        );
        self.animations.insert(id, Step::RotateOutDone);
    }

    fn rotate_in_midpoint(&mut self, windows: &mut dyn WindowSystem) {
        let Some(flip) = self.flip else {
            return;
        };

        if let Some(old_dst) = flip.old_dst {
            let angle = windows.rotation(old_dst);
            windows.set_rotation(flip.new_dst, angle);
            windows.complete_destroy(old_dst);
        }

        if let Some(button) = &mut self.button {
            button.set_dimmed(false);
            button.reach_midpoint();
        }

        windows.set_effect_enabled(flip.new_dst, false, self.shader);
        windows.activate(flip.new_dst);
        windows.set_opacity(flip.new_dst, 255);

        let id = windows.ease_rotation(flip.new_dst, 0.0, self.timing.half_flip(), Easing::EaseOutQuad);
        self.animations.insert(id, Step::RotateInDone);
    }

    fn rotate_in_done(&mut self, windows: &mut dyn WindowSystem, remote: &dyn RemoteActions) {
        let Some(flip) = self.flip.as_mut() else {
            return;
        };
        flip.rotating_in = false;
        let new_dst = flip.new_dst;

        windows.set_rotation(new_dst, 0.0);
        windows.set_opacity(new_dst, 255);
        if let Some(button) = &mut self.button {
            button.set_reactive(true);
        }
        self.finish_flip(windows, remote);
    }

    fn rotate_out_done(&mut self, windows: &mut dyn WindowSystem, remote: &dyn RemoteActions) {
        let Some(flip) = self.flip.as_mut() else {
            return;
        };
        flip.rotating_out = false;
        self.finish_flip(windows, remote);
    }

    fn finish_flip(&mut self, windows: &mut dyn WindowSystem, remote: &dyn RemoteActions) {
        let Some(flip) = self.flip else {
            return;
        };
        if flip.rotating_in || flip.rotating_out {
            return;
        }
        self.flip = None;
        self.set_state(flip.target);
        info!("{}: flipped to {:?}", self.id, flip.target);

        let (Some(front), Some(back)) = (self.front_window(), self.back_window()) else {
            return;
        };
        if windows.is_destroyed(front) || windows.is_destroyed(back) {
            return;
        }

        let minimized = windows.is_minimized(front);
        if windows.is_minimized(back) != minimized {
            if minimized {
                windows.minimize(back);
            } else {
                windows.unminimize(back);
            }
        }
        self.raise_pair(windows, front, back);
        self.sync_button_visibility(windows, remote);
    }

    /// Keep `back` directly beneath `front` in the stacking order
    fn raise_pair(&mut self, windows: &mut dyn WindowSystem, front: WindowHandle, back: WindowHandle) {
        windows.raise(back);
        if Some(front) == self.toolbox() {
            self.raise_echo = Some(front);
        }
        windows.raise(front);
    }

    fn set_state(&mut self, state: Side) {
        if let Some(button) = &mut self.button {
            button.set_state(state);
        }
        if self.state != state {
            self.state = state;
            self.signals.push(SessionSignal::StateChanged);
        }
    }

    /// Tell the app its front face changed; apps without a `flip` action are
    /// left alone.
    fn activate_app_flip(&self, remote: &dyn RemoteActions, flipped: bool) {
        let Some(scope) = &self.app_scope else {
            return;
        };
        if !remote.has_action(scope, "flip") {
            return;
        }
        if let Err(e) = remote.invoke_action(scope, "flip", ActionParam::Bool(flipped)) {
            warn!("{}: app flip action failed: {}", self.id, e);
        }
    }

    /// Resume the continuation waiting on `animation`. Returns false when the
    /// animation does not belong to this session.
    pub fn handle_animation_completed(
        &mut self,
        windows: &mut dyn WindowSystem,
        remote: &dyn RemoteActions,
        animation: AnimationId,
    ) -> bool {
        let Some(step) = self.animations.remove(&animation) else {
            return false;
        };
        if !self.destroyed {
            self.run_step(windows, remote, step, None);
        }
        true
    }

    /// Resume continuations waiting on `window`'s first frame
    pub fn handle_first_frame(
        &mut self,
        windows: &mut dyn WindowSystem,
        remote: &dyn RemoteActions,
        window: WindowHandle,
    ) -> bool {
        let (ready, waiting): (Vec<_>, Vec<_>) = std::mem::take(&mut self.first_frame_waits)
            .into_iter()
            .partition(|(w, _)| *w == window);
        self.first_frame_waits = waiting;

        if ready.is_empty() {
            return false;
        }
        for (window, step) in ready {
            self.run_step(windows, remote, step, Some(window));
        }
        true
    }

    fn run_step(
        &mut self,
        windows: &mut dyn WindowSystem,
        remote: &dyn RemoteActions,
        step: Step,
        window: Option<WindowHandle>,
    ) {
        match step {
            Step::AttachButton => {
                if let Some(window) = window.filter(|w| self.contains(*w)) {
                    self.attach_button(windows, window);
                    self.sync_button_visibility(windows, remote);
                }
            }
            Step::StartRotation => self.start_rotation(windows, remote),
            Step::RotateOutMidpoint => self.rotate_out_midpoint(windows, remote),
            Step::RotateInMidpoint => self.rotate_in_midpoint(windows),
            Step::RotateOutDone => self.rotate_out_done(windows, remote),
            Step::RotateInDone => self.rotate_in_done(windows, remote),
        }
    }

    pub fn owns_timer(&self, timer: TimerId) -> bool {
        self.grab_timer == Some(timer)
    }

    /// Effects were killed: jump to the end of any running flip
    pub fn kill_effects(&mut self, windows: &mut dyn WindowSystem, remote: &dyn RemoteActions) {
        let Some(flip) = self.flip else {
            return;
        };
        for (animation, _) in self.animations.drain() {
            windows.cancel_animation(animation);
        }
        self.first_frame_waits.retain(|(_, step)| !matches!(step, Step::StartRotation));

        if let Some(old_dst) = flip.old_dst {
            windows.complete_destroy(old_dst);
        }
        windows.set_rotation(flip.new_dst, 0.0);
        windows.set_opacity(flip.new_dst, 255);
        windows.set_effect_enabled(flip.new_dst, false, self.shader);
        windows.set_rotation(flip.src, flip.direction.outgoing_final());
        windows.set_effect_enabled(flip.src, true, self.shader);

        if let Some(button) = &mut self.button {
            button.reach_midpoint();
            button.set_dimmed(false);
            button.set_reactive(true);
        }
        if let Some(flip) = self.flip.as_mut() {
            flip.rotating_in = false;
            flip.rotating_out = false;
        }
        self.finish_flip(windows, remote);
    }

    /// Interactive move/resize of one of the windows. While grabbed the back
    /// window is shown as a clone behind the front; the end of the grab is
    /// debounced so the last geometry sync happens once.
    pub fn set_grabbed(
        &mut self,
        windows: &mut dyn WindowSystem,
        remote: &dyn RemoteActions,
        grabbed: bool,
    ) {
        if let Some(timer) = self.grab_timer.take() {
            windows.cancel_timeout(timer);
        }

        if grabbed {
            self.grabbed = true;
            self.attach_back_clone(windows);
            self.sync_button_visibility(windows, remote);
        } else if self.grabbed {
            self.grab_timer = Some(windows.add_timeout(self.timing.grab_debounce));
        }
    }

    /// Debounced end of a grab
    pub fn handle_timer(
        &mut self,
        windows: &mut dyn WindowSystem,
        remote: &dyn RemoteActions,
        timer: TimerId,
    ) -> bool {
        if self.grab_timer != Some(timer) {
            return false;
        }
        self.grab_timer = None;
        self.grabbed = false;
        self.detach_back_clone(windows);

        if let (Some(front), Some(back)) = (self.front_window(), self.back_window())
            && self.flip.is_none()
            && !windows.is_destroyed(front)
            && !windows.is_destroyed(back)
        {
            let min = self.common_min(windows, front, back);
            synchronize_geometries(windows, front, back, min);
        }
        if let Some(front) = self.front_window() {
            let rect = windows.frame_rect(front);
            if let Some(button) = &mut self.button {
                button.set_rect(rect);
            }
        }
        self.sync_button_visibility(windows, remote);
        true
    }

    fn attach_back_clone(&mut self, windows: &mut dyn WindowSystem) {
        if self.back_clone.is_some() {
            return;
        }
        let (Some(front), Some(back)) = (self.front_window(), self.back_window()) else {
            return;
        };
        if windows.is_destroyed(front) || windows.is_destroyed(back) {
            return;
        }
        let clone = windows.attach_clone(front, back);
        windows.set_opacity(back, 0);
        self.back_clone = Some(BackClone { front, back, clone });
    }

    fn detach_back_clone(&mut self, windows: &mut dyn WindowSystem) {
        let Some(BackClone { front, back, clone }) = self.back_clone.take() else {
            return;
        };
        if !windows.is_destroyed(front) {
            windows.detach_clone(front, clone);
        }
        if !windows.is_destroyed(back) {
            windows.set_opacity(back, 255);
        }
    }

    /// Show the button only while one of the session's windows is focused and
    /// visible, nothing hides it and the app is hackable.
    pub fn sync_button_visibility(
        &mut self,
        windows: &mut dyn WindowSystem,
        remote: &dyn RemoteActions,
    ) {
        if self.button.is_none() {
            return;
        }
        let show = match windows.focused_window() {
            Some(focused) => {
                self.contains(focused)
                    && windows.is_visible(focused)
                    && !windows.is_minimized(focused)
                    && !self.shell_mode.hides_button()
                    && !self.grabbed
                    && self.hackable
            }
            None => false,
        };

        if show && self.toolbox.is_none() && !self.init_requested {
            self.request_init(remote);
        }
        if let Some(button) = &mut self.button {
            if show {
                button.show();
            } else {
                button.hide();
            }
        }
    }

    /// Let the toolbox application prelaunch for this app
    fn request_init(&mut self, remote: &dyn RemoteActions) {
        let (Some(scope), Some(identity)) = (&self.toolbox_app_scope, self.app_identity()) else {
            return;
        };
        if let Err(e) = remote.invoke_action(scope, "init", ActionParam::Target(identity.clone())) {
            warn!("{}: toolbox init failed: {}", self.id, e);
        }
        self.init_requested = true;
    }

    /// Reconcile the state with the focused window. A no-op unless both
    /// windows are present and no flip is running.
    pub fn handle_focus_changed(
        &mut self,
        windows: &mut dyn WindowSystem,
        remote: &dyn RemoteActions,
        focused: Option<WindowHandle>,
    ) {
        self.sync_button_visibility(windows, remote);

        let Some(focused) = focused else {
            return;
        };
        let Some(side) = self.side_of(focused) else {
            return;
        };
        if self.flip.is_some() {
            return;
        }
        let (Some(app), Some(toolbox)) = (self.app(), self.toolbox()) else {
            return;
        };
        if windows.is_destroyed(app) || windows.is_destroyed(toolbox) {
            return;
        }

        if !self.is_front(focused) {
            debug!("{}: focus moved to {:?} side", self.id, side);
            self.set_state(side);
            self.activate_app_flip(remote, side == Side::Toolbox);

            let other = if side == Side::App { toolbox } else { app };
            windows.set_rotation(focused, 0.0);
            windows.set_rotation(other, 180.0);
            windows.set_effect_enabled(focused, false, self.shader);
            windows.set_effect_enabled(other, true, self.shader);
            windows.set_visible(focused, true);
        }

        if focused == toolbox {
            self.raise_pair(windows, toolbox, app);
        }
    }

    /// A paired window moved or resized.
    ///
    /// The back window follows the front one. A report from the back window
    /// is the compositor's answer to a synchronization; when it settled
    /// elsewhere than the front, the front takes the back's rectangle.
    pub fn handle_geometry_changed(&mut self, windows: &mut dyn WindowSystem, window: WindowHandle) {
        let front = self.is_front(window);
        if front && let Some(button) = &mut self.button {
            button.set_rect(windows.frame_rect(window));
        }
        if self.grabbed || self.flip.is_some() {
            return;
        }
        let Some(other) = self.other(window) else {
            return;
        };
        if windows.is_destroyed(window) || windows.is_destroyed(other) {
            return;
        }
        if !front && windows.frame_rect(window) == windows.frame_rect(other) {
            return;
        }

        let min = self.common_min(windows, window, other);
        synchronize_geometries(windows, window, other, min);
        if !front && let Some(button) = &mut self.button {
            button.set_rect(windows.frame_rect(other));
        }
    }

    /// Geometry of the front window is being allocated: keep it at least as
    /// large as both windows' minimum sizes.
    pub fn handle_geometry_allocate(&mut self, windows: &mut dyn WindowSystem, window: WindowHandle) {
        if !self.timing.constrain_geometry || !self.is_front(window) {
            return;
        }
        let Some(other) = self.other(window) else {
            return;
        };
        if windows.is_destroyed(other) {
            return;
        }
        let min = common_minimum(windows, window, other);
        windows.expand_allocated_geometry(window, min);
    }

    /// Maximization of the front window changed
    pub fn handle_maximize_changed(&mut self, windows: &mut dyn WindowSystem, window: WindowHandle) {
        if !self.is_front(window) || self.flip.is_some() {
            return;
        }
        let Some(other) = self.other(window) else {
            return;
        };
        if windows.is_destroyed(other) {
            return;
        }
        let maximized = windows.is_maximized(window);
        if windows.is_maximized(other) != maximized {
            windows.skip_next_effect(other);
            if maximized {
                windows.maximize(other);
            } else {
                windows.unmaximize(other);
            }
        }
    }

    pub fn handle_minimized(&mut self, windows: &mut dyn WindowSystem, window: WindowHandle) {
        if !self.is_front(window) {
            return;
        }
        if let Some(button) = &mut self.button {
            button.hide();
        }
        if let Some(other) = self.other(window)
            && !windows.is_destroyed(other)
            && !windows.is_minimized(other)
        {
            windows.minimize(other);
        }
        self.signals.push(SessionSignal::Minimized);
    }

    pub fn handle_unminimized(
        &mut self,
        windows: &mut dyn WindowSystem,
        remote: &dyn RemoteActions,
        window: WindowHandle,
    ) {
        if !self.is_front(window) {
            return;
        }
        if let Some(other) = self.other(window)
            && !windows.is_destroyed(other)
            && windows.is_minimized(other)
        {
            windows.unminimize(other);
        }
        self.sync_button_visibility(windows, remote);
        self.signals.push(SessionSignal::Unminimized);
    }

    /// A raised toolbox pulls its app up right behind it
    pub fn handle_raised(&mut self, windows: &mut dyn WindowSystem, window: WindowHandle) {
        if self.raise_echo == Some(window) {
            self.raise_echo = None;
            return;
        }
        if self.toolbox() != Some(window) || self.state != Side::Toolbox {
            return;
        }
        let Some(app) = self.app() else {
            return;
        };
        if windows.is_destroyed(app) {
            return;
        }
        self.raise_pair(windows, window, app);
    }

    pub fn handle_visibility_changed(
        &mut self,
        windows: &mut dyn WindowSystem,
        remote: &dyn RemoteActions,
        window: WindowHandle,
    ) {
        if self.contains(window) {
            self.sync_button_visibility(windows, remote);
        }
    }

    /// Overview, fullscreen and lock screen changes
    pub fn handle_shell_mode(
        &mut self,
        windows: &mut dyn WindowSystem,
        remote: &dyn RemoteActions,
        mode: ShellMode,
    ) {
        let overview_changed = mode.overview != self.shell_mode.overview;
        self.shell_mode = mode;

        if overview_changed && self.flip.is_none() {
            // The overview shows windows flat; the back window hides behind a clone
            if let Some(back) = self.back_window()
                && !windows.is_destroyed(back)
            {
                windows.set_effect_enabled(back, !mode.overview, self.shader);
            }
            if mode.overview {
                self.attach_back_clone(windows);
            } else if !self.grabbed {
                self.detach_back_clone(windows);
            }
        }
        self.sync_button_visibility(windows, remote);
    }

    pub fn set_hackable(
        &mut self,
        windows: &mut dyn WindowSystem,
        remote: &dyn RemoteActions,
        hackable: bool,
    ) {
        if self.hackable == hackable {
            return;
        }
        self.hackable = hackable;
        self.sync_button_visibility(windows, remote);
    }

    pub fn set_button_highlighted(&mut self, highlighted: bool) {
        if let Some(button) = &mut self.button {
            button.set_highlighted(highlighted);
        }
    }

    pub fn toolbox_visible(&self, windows: &dyn WindowSystem) -> bool {
        self.toolbox()
            .is_some_and(|toolbox| !windows.is_destroyed(toolbox) && windows.is_visible(toolbox))
    }

    pub fn set_toolbox_visible(&mut self, windows: &mut dyn WindowSystem, visible: bool) {
        if let Some(toolbox) = self.toolbox()
            && !windows.is_destroyed(toolbox)
        {
            windows.set_visible(toolbox, visible);
        }
    }

    /// The app closed after the toolbox asked to flip back. The session keeps
    /// the toolbox and waits for the restarted app. Returns false when no
    /// flip-back was pending.
    pub fn remove_flipped_back_app(&mut self, windows: &mut dyn WindowSystem) -> bool {
        if self.pending != PendingReplacement::FlipBack {
            return false;
        }
        let Some(app) = self.app.take() else {
            return false;
        };
        let app = app.handle();
        self.forget_window(windows, app);
        self.app_scope = None;
        windows.hold_actor(app);
        self.removed_app = Some(app);
        self.set_state(Side::Toolbox);

        if let Some(toolbox) = self.toolbox()
            && !windows.is_destroyed(toolbox)
        {
            windows.set_rotation(toolbox, 0.0);
            windows.set_effect_enabled(toolbox, false, self.shader);
            windows.set_visible(toolbox, true);
            windows.activate(toolbox);
        }
        info!("{}: app {} closed for flip-back", self.id, app);
        true
    }

    /// The toolbox went away while the app lives on: the app becomes the
    /// front again and the session waits for a new toolbox.
    pub fn detach_toolbox(&mut self, windows: &mut dyn WindowSystem, remote: &dyn RemoteActions) {
        let Some(toolbox) = self.toolbox.take() else {
            return;
        };
        let toolbox = toolbox.handle();
        self.forget_window(windows, toolbox);
        self.abort_flip(windows);

        self.toolbox_scope = None;
        self.toolbox_target = None;
        self.awaiting_toolbox = false;
        self.init_requested = false;
        self.pending = PendingReplacement::None;

        if let Some(app) = self.app()
            && !windows.is_destroyed(app)
        {
            windows.set_rotation(app, 0.0);
            windows.set_opacity(app, 255);
            windows.set_effect_enabled(app, false, self.shader);
            windows.set_visible(app, true);
        }
        self.set_state(Side::App);
        if let Some(button) = &mut self.button {
            button.reach_midpoint();
            button.set_reactive(true);
            button.set_dimmed(false);
        }
        info!("{}: toolbox {} closed", self.id, toolbox);
        self.sync_button_visibility(windows, remote);
    }

    /// Drop continuations tied to a window that is going away
    fn forget_window(&mut self, windows: &mut dyn WindowSystem, window: WindowHandle) {
        self.first_frame_waits.retain(|(w, _)| *w != window);
        if self
            .back_clone
            .is_some_and(|c| c.front == window || c.back == window)
        {
            self.detach_back_clone(windows);
        }
        if self.raise_echo == Some(window) {
            self.raise_echo = None;
        }
    }

    fn abort_flip(&mut self, windows: &mut dyn WindowSystem) {
        for (animation, _) in self.animations.drain() {
            windows.cancel_animation(animation);
        }
        self.first_frame_waits
            .retain(|(_, step)| matches!(step, Step::AttachButton));
        if let Some(flip) = self.flip.take()
            && let Some(old_dst) = flip.old_dst
        {
            windows.complete_destroy(old_dst);
        }
    }

    /// Tear the session down. Idempotent; afterwards no continuation runs.
    ///
    /// The window that caused the teardown is never deleted, the surviving
    /// one is asked to close.
    pub fn destroy(&mut self, windows: &mut dyn WindowSystem, reason: DestroyReason) {
        if self.destroyed {
            return;
        }
        self.destroyed = true;
        info!("{}: destroyed ({:?})", self.id, reason);

        if let Some(timer) = self.grab_timer.take() {
            windows.cancel_timeout(timer);
        }
        self.detach_back_clone(windows);
        self.abort_flip(windows);
        self.first_frame_waits.clear();

        if let Some(removed) = self.removed_app.take() {
            windows.complete_destroy(removed);
        }

        let toolbox = self.toolbox.take().map(|w| w.handle());
        if let Some(app) = self.app.take().map(|w| w.handle())
            && !windows.is_destroyed(app)
            && reason != DestroyReason::AppDestroyed
        {
            windows.delete(app);
        }
        if let Some(toolbox) = toolbox
            && !windows.is_destroyed(toolbox)
            && reason != DestroyReason::ToolboxDestroyed
        {
            windows.delete(toolbox);
        }

        if let Some(button) = self.button.take()
            && button.is_attached()
        {
            windows.remove_button(self.id);
        }
        self.signals.clear();
    }

    /// Present the button if its view changed
    pub fn flush_button(&mut self, windows: &mut dyn WindowSystem) {
        if let Some(button) = &mut self.button {
            button.flush(windows, self.id);
        }
    }

    pub fn take_signals(&mut self) -> Vec<SessionSignal> {
        std::mem::take(&mut self.signals)
    }
}
