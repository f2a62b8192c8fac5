//! Code view manager
//!
//! Registry of coding sessions. Decides which newly mapped windows get
//! paired, matches toolboxes with their app windows (and restarted apps
//! with their toolboxes), and routes every window-system event to the one
//! session that owns the window. A window belongs to at most one session.

use std::collections::HashSet;

use bitflags::bitflags;
use tokio::sync::mpsc;
use tracing::{debug, info};

use super::session::{CodingSession, DestroyReason, SessionSignal};
use super::{SessionId, SessionTiming, ShellMode, Side};
use crate::eligibility::EligibilityPolicy;
use crate::remote::RemoteActions;
use crate::window::identity::{WindowIdentity, window_identity};
use crate::window::{AnimationId, GrabOp, TimerId, WindowHandle, WindowInfo, WindowSystem};

bitflags! {
    /// Sides of a session a window lookup matches
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct SessionLookup: u8 {
        const APP     = 1 << 0;
        const TOOLBOX = 1 << 1;
    }
}

/// Registry changes, for introspection collaborators
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ManagerEvent {
    SessionAdded(SessionId),
    SessionRemoved(SessionId),
    /// Front side of the session changed
    SessionChanged(SessionId),
}

pub struct CodeViewManager {
    sessions: Vec<CodingSession>,
    policy: EligibilityPolicy,
    timing: SessionTiming,
    companion_installed: bool,
    stopped: bool,
    shell_mode: ShellMode,
    next_session_id: u64,
    listeners: Vec<mpsc::UnboundedSender<ManagerEvent>>,
}

impl CodeViewManager {
    pub fn new(policy: EligibilityPolicy, timing: SessionTiming) -> Self {
        Self {
            sessions: Vec::new(),
            policy,
            timing,
            companion_installed: false,
            stopped: false,
            shell_mode: ShellMode::default(),
            next_session_id: 1,
            listeners: Vec::new(),
        }
    }

    /// Flipping only works while the toolbox-providing companion is installed
    pub fn set_companion_installed(&mut self, installed: bool) {
        if self.companion_installed != installed {
            info!("CodeView: companion installed: {}", installed);
        }
        self.companion_installed = installed;
        self.policy.set_clubhouse_installed(installed);
    }

    pub fn policy_mut(&mut self) -> &mut EligibilityPolicy {
        &mut self.policy
    }

    /// Receive registry changes
    pub fn subscribe(&mut self) -> mpsc::UnboundedReceiver<ManagerEvent> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.listeners.push(tx);
        rx
    }

    fn emit(&mut self, event: ManagerEvent) {
        self.listeners.retain(|tx| tx.send(event).is_ok());
    }

    /// Sessions in creation order
    pub fn sessions(&self) -> &[CodingSession] {
        &self.sessions
    }

    pub fn session(&self, id: SessionId) -> Option<&CodingSession> {
        self.sessions.iter().find(|s| s.id() == id)
    }

    fn session_index(&self, id: SessionId) -> Option<usize> {
        self.sessions.iter().position(|s| s.id() == id)
    }

    fn find_index(&self, window: WindowHandle, lookup: SessionLookup) -> Option<usize> {
        self.sessions.iter().position(|session| {
            (lookup.contains(SessionLookup::APP) && session.app() == Some(window))
                || (lookup.contains(SessionLookup::TOOLBOX) && session.toolbox() == Some(window))
        })
    }

    /// Session owning `window` on one of the `lookup` sides
    pub fn find_session(&self, window: WindowHandle, lookup: SessionLookup) -> Option<&CodingSession> {
        self.find_index(window, lookup).map(|i| &self.sessions[i])
    }

    /// Window turned away in a complete pair; switchers and the icon bar skip it
    pub fn is_backgrounded(&self, window: WindowHandle) -> bool {
        self.sessions.iter().any(|session| {
            session.app().is_some()
                && session.toolbox().is_some()
                && session.back_window() == Some(window)
        })
    }

    pub fn backgrounded_windows(&self) -> HashSet<WindowHandle> {
        self.sessions
            .iter()
            .filter(|s| s.app().is_some() && s.toolbox().is_some())
            .filter_map(CodingSession::back_window)
            .collect()
    }

    /// A window was mapped. Returns whether the manager took it over, in
    /// which case the default map effect must not run.
    pub fn handle_window_mapped(
        &mut self,
        windows: &mut dyn WindowSystem,
        remote: &dyn RemoteActions,
        info: WindowInfo,
    ) -> bool {
        if self.stopped || !self.companion_installed {
            return false;
        }
        if info.app.is_none() {
            return false;
        }
        if self.find_index(info.handle, SessionLookup::all()).is_some() {
            debug!("CodeView: window {} already paired", info.handle);
            return false;
        }
        if !self.policy.is_managed(&info) {
            debug!("CodeView: window {} not managed", info.handle);
            return false;
        }

        let window = info.handle;
        let handled = match remote.resolve_target(&info) {
            Some(target) => self.route_toolbox(windows, remote, info, target),
            None => self.route_app(windows, remote, info),
        };

        if handled {
            windows.complete_map(window);
        }
        self.settle(windows);
        handled
    }

    fn route_toolbox(
        &mut self,
        windows: &mut dyn WindowSystem,
        remote: &dyn RemoteActions,
        info: WindowInfo,
        target: WindowIdentity,
    ) -> bool {
        let exact = self.sessions.iter().position(|s| {
            s.app().is_some_and(|app| !windows.is_destroyed(app))
                && s.app_identity() == Some(&target)
        });
        let index = exact.or_else(|| {
            self.sessions.iter().position(|s| {
                s.app().is_some_and(|app| !windows.is_destroyed(app))
                    && s.toolbox().is_none()
                    && s.app_id() == Some(target.app_id.as_str())
            })
        });

        match index {
            Some(index) => self.sessions[index].admit_toolbox(windows, remote, info, target),
            None => {
                debug!("CodeView: toolbox {} has no session for {}", info.handle, target);
                false
            }
        }
    }

    fn route_app(
        &mut self,
        windows: &mut dyn WindowSystem,
        remote: &dyn RemoteActions,
        info: WindowInfo,
    ) -> bool {
        // A restarted app joins the toolbox that is waiting for it
        if let Some(identity) = window_identity(&info) {
            let live_toolbox = |s: &CodingSession| {
                s.toolbox().is_some_and(|toolbox| !windows.is_destroyed(toolbox))
            };
            let exact = self
                .sessions
                .iter()
                .position(|s| live_toolbox(s) && s.toolbox_target() == Some(&identity));
            let index = exact.or_else(|| {
                self.sessions.iter().position(|s| {
                    s.app().is_none()
                        && live_toolbox(s)
                        && s.toolbox_target().map(|t| t.app_id.as_str()) == Some(identity.app_id.as_str())
                })
            });

            if let Some(index) = index
                && self.sessions[index].admit_app(windows, remote, info.clone())
            {
                return true;
            }
        }

        self.add_session(windows, remote, info);
        false
    }

    fn add_session(&mut self, windows: &mut dyn WindowSystem, remote: &dyn RemoteActions, info: WindowInfo) {
        let id = SessionId(self.next_session_id);
        self.next_session_id += 1;

        let mut session = CodingSession::new(id, self.timing);
        let handle = info.handle;
        if !session.admit_app(windows, remote, info) {
            debug!("CodeView: window {} cannot start a session", handle);
            return;
        }
        session.handle_shell_mode(windows, remote, self.shell_mode);

        info!("CodeView: new {} for window {}", id, handle);
        self.sessions.push(session);
        self.emit(ManagerEvent::SessionAdded(id));
    }

    /// A window (or the actor of a minimized window) was destroyed.
    ///
    /// An app closing after a flip-back only leaves its session; a toolbox
    /// closing while its app lives on only detaches. Anything else ends the
    /// session.
    pub fn handle_window_destroyed(
        &mut self,
        windows: &mut dyn WindowSystem,
        remote: &dyn RemoteActions,
        window: WindowHandle,
    ) -> bool {
        if self.stopped {
            return false;
        }
        let Some(index) = self.find_index(window, SessionLookup::all()) else {
            return false;
        };

        let session = &mut self.sessions[index];
        match session.side_of(window) {
            Some(Side::App) => {
                if !session.remove_flipped_back_app(windows) {
                    session.destroy(windows, DestroyReason::AppDestroyed);
                }
            }
            Some(Side::Toolbox) => {
                let app_alive = session.app().is_some_and(|app| !windows.is_destroyed(app));
                if app_alive {
                    session.detach_toolbox(windows, remote);
                } else {
                    session.destroy(windows, DestroyReason::ToolboxDestroyed);
                }
            }
            None => {}
        }

        self.settle(windows);
        true
    }

    pub fn handle_grab_begin(
        &mut self,
        windows: &mut dyn WindowSystem,
        remote: &dyn RemoteActions,
        window: WindowHandle,
        op: GrabOp,
    ) {
        if !op.drags_window() {
            return;
        }
        if let Some(index) = self.find_index(window, SessionLookup::all()) {
            self.sessions[index].set_grabbed(windows, remote, true);
        }
        self.settle(windows);
    }

    pub fn handle_grab_end(
        &mut self,
        windows: &mut dyn WindowSystem,
        remote: &dyn RemoteActions,
        window: WindowHandle,
    ) {
        if let Some(index) = self.find_index(window, SessionLookup::all()) {
            self.sessions[index].set_grabbed(windows, remote, false);
        }
        self.settle(windows);
    }

    pub fn handle_minimized(&mut self, windows: &mut dyn WindowSystem, window: WindowHandle) {
        if let Some(index) = self.find_index(window, SessionLookup::all()) {
            self.sessions[index].handle_minimized(windows, window);
        }
        self.settle(windows);
    }

    pub fn handle_unminimized(
        &mut self,
        windows: &mut dyn WindowSystem,
        remote: &dyn RemoteActions,
        window: WindowHandle,
    ) {
        if let Some(index) = self.find_index(window, SessionLookup::all()) {
            self.sessions[index].handle_unminimized(windows, remote, window);
        }
        self.settle(windows);
    }

    pub fn handle_geometry_changed(&mut self, windows: &mut dyn WindowSystem, window: WindowHandle) {
        if let Some(index) = self.find_index(window, SessionLookup::all()) {
            self.sessions[index].handle_geometry_changed(windows, window);
        }
        self.settle(windows);
    }

    pub fn handle_geometry_allocate(&mut self, windows: &mut dyn WindowSystem, window: WindowHandle) {
        if let Some(index) = self.find_index(window, SessionLookup::all()) {
            self.sessions[index].handle_geometry_allocate(windows, window);
        }
    }

    pub fn handle_maximize_changed(&mut self, windows: &mut dyn WindowSystem, window: WindowHandle) {
        if let Some(index) = self.find_index(window, SessionLookup::all()) {
            self.sessions[index].handle_maximize_changed(windows, window);
        }
        self.settle(windows);
    }

    pub fn handle_raised(&mut self, windows: &mut dyn WindowSystem, window: WindowHandle) {
        if let Some(index) = self.find_index(window, SessionLookup::TOOLBOX) {
            self.sessions[index].handle_raised(windows, window);
        }
    }

    pub fn handle_visibility_changed(
        &mut self,
        windows: &mut dyn WindowSystem,
        remote: &dyn RemoteActions,
        window: WindowHandle,
    ) {
        if let Some(index) = self.find_index(window, SessionLookup::all()) {
            self.sessions[index].handle_visibility_changed(windows, remote, window);
        }
        self.settle(windows);
    }

    pub fn handle_first_frame(
        &mut self,
        windows: &mut dyn WindowSystem,
        remote: &dyn RemoteActions,
        window: WindowHandle,
    ) {
        if let Some(index) = self.find_index(window, SessionLookup::all()) {
            self.sessions[index].handle_first_frame(windows, remote, window);
        }
        self.settle(windows);
    }

    pub fn handle_animation_completed(
        &mut self,
        windows: &mut dyn WindowSystem,
        remote: &dyn RemoteActions,
        animation: AnimationId,
    ) {
        for session in &mut self.sessions {
            if session.handle_animation_completed(windows, remote, animation) {
                break;
            }
        }
        self.settle(windows);
    }

    pub fn handle_timer_fired(
        &mut self,
        windows: &mut dyn WindowSystem,
        remote: &dyn RemoteActions,
        timer: TimerId,
    ) {
        if let Some(session) = self.sessions.iter_mut().find(|s| s.owns_timer(timer)) {
            session.handle_timer(windows, remote, timer);
        }
        self.settle(windows);
    }

    pub fn handle_focus_changed(
        &mut self,
        windows: &mut dyn WindowSystem,
        remote: &dyn RemoteActions,
        focused: Option<WindowHandle>,
    ) {
        for session in &mut self.sessions {
            session.handle_focus_changed(windows, remote, focused);
        }
        self.settle(windows);
    }

    pub fn handle_shell_mode(
        &mut self,
        windows: &mut dyn WindowSystem,
        remote: &dyn RemoteActions,
        mode: ShellMode,
    ) {
        self.shell_mode = mode;
        for session in &mut self.sessions {
            session.handle_shell_mode(windows, remote, mode);
        }
        self.settle(windows);
    }

    /// The pairing button of a session was clicked
    pub fn handle_button_clicked(
        &mut self,
        windows: &mut dyn WindowSystem,
        remote: &dyn RemoteActions,
        id: SessionId,
    ) {
        if let Some(index) = self.session_index(id) {
            self.sessions[index].request_flip(windows, remote);
        }
        self.settle(windows);
    }

    /// An app changed its runtime `Hackable` property
    pub fn handle_hackable_changed(
        &mut self,
        windows: &mut dyn WindowSystem,
        remote: &dyn RemoteActions,
        window: WindowHandle,
        hackable: bool,
    ) {
        if let Some(index) = self.find_index(window, SessionLookup::APP) {
            self.sessions[index].set_hackable(windows, remote, hackable);
        }
        self.settle(windows);
    }

    pub fn kill_effects(
        &mut self,
        windows: &mut dyn WindowSystem,
        remote: &dyn RemoteActions,
        window: WindowHandle,
    ) {
        if let Some(index) = self.find_index(window, SessionLookup::all()) {
            self.sessions[index].kill_effects(windows, remote);
        }
        self.settle(windows);
    }

    pub fn set_toolbox_visible(&mut self, windows: &mut dyn WindowSystem, id: SessionId, visible: bool) {
        if let Some(index) = self.session_index(id) {
            self.sessions[index].set_toolbox_visible(windows, visible);
        }
    }

    pub fn set_button_highlighted(&mut self, windows: &mut dyn WindowSystem, id: SessionId, highlighted: bool) {
        if let Some(index) = self.session_index(id) {
            self.sessions[index].set_button_highlighted(highlighted);
        }
        self.settle(windows);
    }

    /// The window manager is shutting down: ignore further map/destroy events
    pub fn stop(&mut self) {
        info!("CodeView: window manager stopped");
        self.stopped = true;
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped
    }

    /// Tear down every session. Apps are left alone and shown flat;
    /// toolboxes are closed.
    pub fn remove_sessions(&mut self, windows: &mut dyn WindowSystem) {
        for mut session in std::mem::take(&mut self.sessions) {
            if let Some(app) = session.app()
                && !windows.is_destroyed(app)
            {
                windows.set_rotation(app, 0.0);
                windows.set_opacity(app, 255);
                windows.set_effect_enabled(app, false, self.timing.default_shader);
                windows.set_visible(app, true);
            }
            session.destroy(windows, DestroyReason::AppDestroyed);
            self.emit(ManagerEvent::SessionRemoved(session.id()));
        }
    }

    /// Present buttons, forward session signals and drop finished sessions
    fn settle(&mut self, windows: &mut dyn WindowSystem) {
        let mut events = Vec::new();

        for session in &mut self.sessions {
            session.flush_button(windows);
            for signal in session.take_signals() {
                match signal {
                    SessionSignal::Minimized | SessionSignal::Unminimized => {
                        // Destroying a minimized window skips the usual effects
                        let track = signal == SessionSignal::Minimized;
                        for window in [session.app(), session.toolbox()].into_iter().flatten() {
                            if !windows.is_destroyed(window) {
                                windows.track_actor_destroy(window, track);
                            }
                        }
                    }
                    SessionSignal::StateChanged => {
                        events.push(ManagerEvent::SessionChanged(session.id()));
                    }
                }
            }
        }

        let mut kept = Vec::with_capacity(self.sessions.len());
        for mut session in std::mem::take(&mut self.sessions) {
            if session.is_destroyed() || session.is_empty() {
                session.destroy(windows, DestroyReason::AppDestroyed);
                info!("CodeView: removed {}", session.id());
                events.push(ManagerEvent::SessionRemoved(session.id()));
            } else {
                kept.push(session);
            }
        }
        self.sessions = kept;

        for event in events {
            self.emit(event);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{CompanionConfig, EligibilityConfig};
    use crate::remote::{ActionParam, ActionScope};
    use crate::shared::window_state::{Geometry, Size};
    use crate::testing::{FakeRemote, FakeWindowSystem, app_window, toolbox_window};

    const APP: WindowHandle = WindowHandle(1);
    const TOOLBOX: WindowHandle = WindowHandle(2);

    fn manager() -> CodeViewManager {
        let config = EligibilityConfig {
            installations: Vec::new(),
            ..EligibilityConfig::default()
        };
        let policy = EligibilityPolicy::new(config, CompanionConfig::default().privileged_app_ids);
        let mut manager = CodeViewManager::new(policy, SessionTiming::default());
        manager.set_companion_installed(true);
        manager
    }

    fn target() -> WindowIdentity {
        WindowIdentity::new("com.example.Foo", "/com/example/Foo/window/1")
    }

    fn drain(rx: &mut mpsc::UnboundedReceiver<ManagerEvent>) -> Vec<ManagerEvent> {
        let mut events = Vec::new();
        while let Ok(event) = rx.try_recv() {
            events.push(event);
        }
        events
    }

    fn run_animations(manager: &mut CodeViewManager, ws: &mut FakeWindowSystem, remote: &FakeRemote) {
        loop {
            let finished = ws.finish_animations();
            if finished.is_empty() {
                break;
            }
            for id in finished {
                manager.handle_animation_completed(ws, remote, id);
            }
        }
    }

    /// App window mapped and focused, toolbox window created but not mapped
    fn setup() -> (CodeViewManager, FakeWindowSystem, FakeRemote) {
        let mut manager = manager();
        let mut ws = FakeWindowSystem::new();
        let remote = FakeRemote::new();
        ws.add_window(APP, Geometry::new(100, 100, 800, 600));
        ws.add_window(TOOLBOX, Geometry::new(0, 0, 500, 500));
        ws.focused = Some(APP);
        remote.set_target(TOOLBOX, target());

        assert!(!manager.handle_window_mapped(&mut ws, &remote, app_window(1, "com.example.Foo", 1)));
        (manager, ws, remote)
    }

    #[test]
    fn test_flip_scenario() {
        let mut manager = manager();
        let mut rx = manager.subscribe();
        let mut ws = FakeWindowSystem::new();
        let remote = FakeRemote::new();
        ws.add_window(APP, Geometry::new(100, 100, 800, 600));
        ws.focused = Some(APP);

        // New app window: one session, default entrance
        assert!(!manager.handle_window_mapped(&mut ws, &remote, app_window(1, "com.example.Foo", 1)));
        assert_eq!(manager.sessions().len(), 1);
        let id = manager.sessions()[0].id();
        assert_eq!(manager.sessions()[0].state(), Side::App);
        assert_eq!(drain(&mut rx), vec![ManagerEvent::SessionAdded(id)]);

        // Toolbox for that window joins the same session, no flip yet
        ws.add_window(TOOLBOX, Geometry::new(0, 0, 500, 500));
        remote.set_target(TOOLBOX, target());
        assert!(manager.handle_window_mapped(&mut ws, &remote, toolbox_window(2, 1)));
        assert_eq!(manager.sessions().len(), 1);
        assert_eq!(manager.sessions()[0].toolbox(), Some(TOOLBOX));
        assert_eq!(manager.sessions()[0].state(), Side::App);
        assert_eq!(ws.completed_maps, vec![TOOLBOX]);

        // Flip; a second click while rotating is ignored
        manager.handle_button_clicked(&mut ws, &remote, id);
        assert!(manager.sessions()[0].is_animating());
        let pending = ws.animations.clone();
        manager.handle_button_clicked(&mut ws, &remote, id);
        assert_eq!(ws.animations, pending);
        run_animations(&mut manager, &mut ws, &remote);
        assert_eq!(manager.sessions()[0].state(), Side::Toolbox);
        assert_eq!(drain(&mut rx), vec![ManagerEvent::SessionChanged(id)]);

        // Toolbox closes: the app is the front again
        ws.destroy(TOOLBOX);
        assert!(manager.handle_window_destroyed(&mut ws, &remote, TOOLBOX));
        assert_eq!(manager.sessions().len(), 1);
        assert_eq!(manager.sessions()[0].toolbox(), None);
        assert_eq!(manager.sessions()[0].app(), Some(APP));
        assert_eq!(manager.sessions()[0].state(), Side::App);
        assert_eq!(drain(&mut rx), vec![ManagerEvent::SessionChanged(id)]);

        // App closes: the session goes away, exactly once
        ws.destroy(APP);
        assert!(manager.handle_window_destroyed(&mut ws, &remote, APP));
        assert!(manager.sessions().is_empty());
        assert!(!manager.handle_window_destroyed(&mut ws, &remote, APP));
        assert_eq!(drain(&mut rx), vec![ManagerEvent::SessionRemoved(id)]);
        assert!(ws.deleted.is_empty());
    }

    #[test]
    fn test_window_is_owned_once() {
        let (mut manager, mut ws, remote) = setup();
        assert!(!manager.handle_window_mapped(&mut ws, &remote, app_window(1, "com.example.Foo", 1)));
        assert_eq!(manager.sessions().len(), 1);

        ws.add_window(WindowHandle(3), Geometry::default());
        manager.handle_window_mapped(&mut ws, &remote, app_window(3, "com.example.Foo", 2));
        assert_eq!(manager.sessions().len(), 2);

        let mut seen = HashSet::new();
        for session in manager.sessions() {
            for window in [session.app(), session.toolbox()].into_iter().flatten() {
                assert!(seen.insert(window));
            }
        }
    }

    #[test]
    fn test_toolbox_matches_exact_window() {
        let (mut manager, mut ws, remote) = setup();
        let second = WindowHandle(3);
        ws.add_window(second, Geometry::default());
        manager.handle_window_mapped(&mut ws, &remote, app_window(3, "com.example.Foo", 2));

        remote.set_target(TOOLBOX, WindowIdentity::new("com.example.Foo", "/com/example/Foo/window/2"));
        assert!(manager.handle_window_mapped(&mut ws, &remote, toolbox_window(2, 1)));
        assert_eq!(
            manager.find_session(TOOLBOX, SessionLookup::TOOLBOX).and_then(|s| s.app()),
            Some(second)
        );
        assert!(manager.find_session(APP, SessionLookup::APP).unwrap().toolbox().is_none());
    }

    #[test]
    fn test_toolbox_falls_back_to_app_id() {
        let (mut manager, mut ws, remote) = setup();
        remote.set_target(TOOLBOX, WindowIdentity::new("com.example.Foo", "/gone"));
        assert!(manager.handle_window_mapped(&mut ws, &remote, toolbox_window(2, 1)));
        assert_eq!(manager.sessions()[0].toolbox(), Some(TOOLBOX));
    }

    #[test]
    fn test_orphan_toolbox_is_not_handled() {
        let (mut manager, mut ws, remote) = setup();
        remote.set_target(TOOLBOX, WindowIdentity::new("org.other.App", "/w"));
        assert!(!manager.handle_window_mapped(&mut ws, &remote, toolbox_window(2, 1)));
        assert_eq!(manager.sessions().len(), 1);
        assert!(manager.sessions()[0].toolbox().is_none());
    }

    #[test]
    fn test_nothing_managed_without_companion_or_after_stop() {
        let (mut manager, mut ws, remote) = setup();
        ws.add_window(WindowHandle(3), Geometry::default());

        manager.set_companion_installed(false);
        manager.handle_window_mapped(&mut ws, &remote, app_window(3, "com.example.Bar", 1));
        assert_eq!(manager.sessions().len(), 1);

        manager.set_companion_installed(true);
        manager.stop();
        manager.handle_window_mapped(&mut ws, &remote, app_window(3, "com.example.Bar", 1));
        assert_eq!(manager.sessions().len(), 1);
        assert!(!manager.handle_window_destroyed(&mut ws, &remote, APP));
    }

    #[test]
    fn test_flip_back_keeps_session() {
        let (mut manager, mut ws, remote) = setup();
        let mut rx = manager.subscribe();
        manager.handle_window_mapped(&mut ws, &remote, toolbox_window(2, 1));
        let id = manager.sessions()[0].id();
        manager.handle_button_clicked(&mut ws, &remote, id);
        run_animations(&mut manager, &mut ws, &remote);

        let scope = ActionScope::new(
            "com.hack_computer.HackToolbox",
            "/com/hack_computer/HackToolbox/window/1",
        );
        remote.add_action(&scope, "flip-back");
        manager.handle_button_clicked(&mut ws, &remote, id);
        assert_eq!(remote.invocations_of("flip-back"), vec![(scope, ActionParam::None)]);

        ws.destroy(APP);
        assert!(manager.handle_window_destroyed(&mut ws, &remote, APP));
        assert_eq!(manager.sessions().len(), 1);
        assert_eq!(manager.sessions()[0].toolbox(), Some(TOOLBOX));
        assert!(ws.deleted.is_empty());

        // The restarted app has a new window id but finds its toolbox
        let restarted = WindowHandle(3);
        ws.add_window(restarted, Geometry::new(0, 0, 640, 480));
        assert!(manager.handle_window_mapped(&mut ws, &remote, app_window(3, "com.example.Foo", 2)));
        assert_eq!(manager.sessions()[0].app(), Some(restarted));
        assert!(ws.completed_maps.contains(&restarted));
        run_animations(&mut manager, &mut ws, &remote);
        assert_eq!(manager.sessions()[0].state(), Side::App);
        assert!(!drain(&mut rx).contains(&ManagerEvent::SessionRemoved(id)));
    }

    #[test]
    fn test_app_destroyed_closes_toolbox_only() {
        let (mut manager, mut ws, remote) = setup();
        manager.handle_window_mapped(&mut ws, &remote, toolbox_window(2, 1));

        ws.destroy(APP);
        assert!(manager.handle_window_destroyed(&mut ws, &remote, APP));
        assert!(manager.sessions().is_empty());
        assert_eq!(ws.deleted, vec![TOOLBOX]);
    }

    #[test]
    fn test_geometry_uses_common_minimum() {
        let mut manager = manager();
        let mut ws = FakeWindowSystem::new();
        let remote = FakeRemote::new();
        ws.add_window(APP, Geometry::new(0, 0, 300, 200)).min = Size::new(300, 200);
        ws.add_window(TOOLBOX, Geometry::new(0, 0, 400, 150)).min = Size::new(400, 150);
        remote.set_target(TOOLBOX, target());

        manager.handle_window_mapped(&mut ws, &remote, app_window(1, "com.example.Foo", 1));
        manager.handle_window_mapped(&mut ws, &remote, toolbox_window(2, 1));
        assert_eq!(ws.window(APP).rect.size(), Size::new(400, 200));
        assert_eq!(ws.window(TOOLBOX).rect.size(), Size::new(400, 200));
    }

    #[test]
    fn test_backgrounded_window_is_the_back_side() {
        let (mut manager, mut ws, remote) = setup();
        assert!(!manager.is_backgrounded(APP));
        manager.handle_window_mapped(&mut ws, &remote, toolbox_window(2, 1));
        assert!(manager.is_backgrounded(TOOLBOX));
        assert!(!manager.is_backgrounded(APP));
        assert_eq!(manager.backgrounded_windows(), HashSet::from([TOOLBOX]));
    }

    #[test]
    fn test_minimize_tracks_actor_destroy() {
        let (mut manager, mut ws, remote) = setup();
        manager.handle_window_mapped(&mut ws, &remote, toolbox_window(2, 1));

        ws.window_mut(APP).minimized = true;
        manager.handle_minimized(&mut ws, APP);
        assert!(ws.window(APP).tracked);
        assert!(ws.window(TOOLBOX).tracked);

        ws.window_mut(APP).minimized = false;
        manager.handle_unminimized(&mut ws, &remote, APP);
        assert!(!ws.window(APP).tracked);
    }

    #[test]
    fn test_grab_routes_to_owner() {
        let (mut manager, mut ws, remote) = setup();
        manager.handle_window_mapped(&mut ws, &remote, toolbox_window(2, 1));

        manager.handle_grab_begin(&mut ws, &remote, APP, GrabOp::Other);
        assert!(!manager.sessions()[0].is_grabbed());
        manager.handle_grab_begin(&mut ws, &remote, APP, GrabOp::Moving);
        assert!(manager.sessions()[0].is_grabbed());

        manager.handle_grab_end(&mut ws, &remote, APP);
        for timer in ws.take_timers() {
            manager.handle_timer_fired(&mut ws, &remote, timer);
        }
        assert!(!manager.sessions()[0].is_grabbed());
    }

    #[test]
    fn test_button_presented_and_removed() {
        let (mut manager, mut ws, remote) = setup();
        let id = manager.sessions()[0].id();
        assert!(ws.buttons[&id].visible);

        ws.destroy(APP);
        manager.handle_window_destroyed(&mut ws, &remote, APP);
        assert!(!ws.buttons.contains_key(&id));
    }

    #[test]
    fn test_remove_sessions_closes_toolboxes() {
        let (mut manager, mut ws, remote) = setup();
        let mut rx = manager.subscribe();
        manager.handle_window_mapped(&mut ws, &remote, toolbox_window(2, 1));
        let id = manager.sessions()[0].id();

        manager.remove_sessions(&mut ws);
        assert!(manager.sessions().is_empty());
        assert_eq!(ws.deleted, vec![TOOLBOX]);
        assert_eq!(drain(&mut rx), vec![ManagerEvent::SessionRemoved(id)]);
    }
}
