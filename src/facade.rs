//! Hackable apps directory
//!
//! Gives every session a stable object path under
//! `/com/hack_computer/HackableApp/` for introspection clients and builds the
//! snapshots published to them.

use flipview_ipc::SessionDescriptor;
use tracing::debug;

use crate::codeview::SessionId;
use crate::codeview::manager::{CodeViewManager, ManagerEvent};
use crate::codeview::session::CodingSession;
use crate::switcher::activation_target;
use crate::window::WindowSystem;

pub const HACKABLE_APP_PATH: &str = "/com/hack_computer/HackableApp";

#[derive(Debug, Default)]
pub struct HackableAppsDirectory {
    paths: Vec<(SessionId, String)>,
    next_id: u64,
}

impl HackableAppsDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Track a registry change. Returns whether the list of paths changed.
    pub fn apply(&mut self, event: ManagerEvent) -> bool {
        match event {
            ManagerEvent::SessionAdded(id) => {
                if self.paths.iter().any(|(session, _)| *session == id) {
                    return false;
                }
                self.next_id += 1;
                let path = format!("{}/{}", HACKABLE_APP_PATH, self.next_id);
                debug!("Exporting {} at {}", id, path);
                self.paths.push((id, path));
                true
            }
            ManagerEvent::SessionRemoved(id) => {
                let before = self.paths.len();
                self.paths.retain(|(session, _)| *session != id);
                self.paths.len() != before
            }
            ManagerEvent::SessionChanged(_) => false,
        }
    }

    /// `CurrentlyHackableApps`, in session creation order
    pub fn currently_hackable_apps(&self) -> Vec<&str> {
        self.paths.iter().map(|(_, path)| path.as_str()).collect()
    }

    pub fn object_path(&self, id: SessionId) -> Option<&str> {
        self.paths
            .iter()
            .find(|(session, _)| *session == id)
            .map(|(_, path)| path.as_str())
    }

    pub fn session_at(&self, path: &str) -> Option<SessionId> {
        self.paths
            .iter()
            .find(|(_, p)| p == path)
            .map(|(session, _)| *session)
    }

    fn describe(
        &self,
        manager: &CodeViewManager,
        session: &CodingSession,
        windows: &dyn WindowSystem,
    ) -> Option<SessionDescriptor> {
        let object_path = self.object_path(session.id())?.to_string();
        let app_id = session
            .app_id()
            .or_else(|| session.toolbox_target().map(|target| target.app_id.as_str()))
            .map(str::to_string);
        let backgrounded = session
            .back_window()
            .filter(|window| manager.is_backgrounded(*window));

        Some(SessionDescriptor {
            object_path,
            app_id,
            state: session.state().as_u32(),
            toolbox_visible: session.toolbox_visible(windows),
            pulse_flip_button: session.button().is_some_and(|b| b.highlighted()),
            app_window: session.app().map(|w| w.0),
            toolbox_window: session.toolbox().map(|w| w.0),
            backgrounded_window: backgrounded.map(|w| w.0),
            activation_window: session.app().map(|app| activation_target(manager, app).0),
        })
    }

    /// Read-only view of every exported session
    pub fn snapshot(&self, manager: &CodeViewManager, windows: &dyn WindowSystem) -> Vec<SessionDescriptor> {
        manager
            .sessions()
            .iter()
            .filter_map(|session| self.describe(manager, session, windows))
            .collect()
    }

    /// Writable `ToolboxVisible` property
    pub fn set_toolbox_visible(
        &self,
        manager: &mut CodeViewManager,
        windows: &mut dyn WindowSystem,
        path: &str,
        visible: bool,
    ) -> bool {
        let Some(id) = self.session_at(path) else {
            return false;
        };
        manager.set_toolbox_visible(windows, id, visible);
        true
    }

    /// Writable `PulseFlipToHackButton` property
    pub fn set_pulse_flip_button(
        &self,
        manager: &mut CodeViewManager,
        windows: &mut dyn WindowSystem,
        path: &str,
        pulse: bool,
    ) -> bool {
        let Some(id) = self.session_at(path) else {
            return false;
        };
        manager.set_button_highlighted(windows, id, pulse);
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codeview::SessionTiming;
    use crate::config::{CompanionConfig, EligibilityConfig};
    use crate::eligibility::EligibilityPolicy;
    use crate::shared::window_state::Geometry;
    use crate::testing::{FakeRemote, FakeWindowSystem, app_window, toolbox_window};
    use crate::window::WindowHandle;
    use crate::window::identity::WindowIdentity;

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

    #[test]
    fn test_paths_follow_sessions() {
        let mut manager = manager();
        let mut rx = manager.subscribe();
        let mut ws = FakeWindowSystem::new();
        let remote = FakeRemote::new();
        let mut directory = HackableAppsDirectory::new();

        for handle in 1..=2 {
            ws.add_window(WindowHandle(handle), Geometry::new(0, 0, 400, 300));
            manager.handle_window_mapped(&mut ws, &remote, app_window(handle, "com.example.Foo", handle));
        }
        while let Ok(event) = rx.try_recv() {
            directory.apply(event);
        }
        assert_eq!(
            directory.currently_hackable_apps(),
            vec!["/com/hack_computer/HackableApp/1", "/com/hack_computer/HackableApp/2"]
        );

        ws.destroy(WindowHandle(1));
        manager.handle_window_destroyed(&mut ws, &remote, WindowHandle(1));
        let mut changed = false;
        while let Ok(event) = rx.try_recv() {
            changed |= directory.apply(event);
        }
        assert!(changed);
        assert_eq!(directory.currently_hackable_apps(), vec!["/com/hack_computer/HackableApp/2"]);

        // Ids are never reused
        ws.add_window(WindowHandle(3), Geometry::new(0, 0, 400, 300));
        manager.handle_window_mapped(&mut ws, &remote, app_window(3, "com.example.Foo", 3));
        while let Ok(event) = rx.try_recv() {
            directory.apply(event);
        }
        assert_eq!(
            directory.currently_hackable_apps(),
            vec!["/com/hack_computer/HackableApp/2", "/com/hack_computer/HackableApp/3"]
        );
    }

    #[test]
    fn test_snapshot_and_writable_properties() {
        let mut manager = manager();
        let mut rx = manager.subscribe();
        let mut ws = FakeWindowSystem::new();
        let remote = FakeRemote::new();
        let mut directory = HackableAppsDirectory::new();

        ws.add_window(WindowHandle(1), Geometry::new(0, 0, 400, 300));
        ws.add_window(WindowHandle(2), Geometry::new(0, 0, 400, 300));
        remote.set_target(
            WindowHandle(2),
            WindowIdentity::new("com.example.Foo", "/com/example/Foo/window/1"),
        );
        manager.handle_window_mapped(&mut ws, &remote, app_window(1, "com.example.Foo", 1));
        manager.handle_window_mapped(&mut ws, &remote, toolbox_window(2, 1));
        while let Ok(event) = rx.try_recv() {
            directory.apply(event);
        }

        let path = "/com/hack_computer/HackableApp/1";
        let snapshot = directory.snapshot(&manager, &ws);
        assert_eq!(snapshot.len(), 1);
        assert_eq!(snapshot[0].object_path, path);
        assert_eq!(snapshot[0].app_id.as_deref(), Some("com.example.Foo"));
        assert_eq!(snapshot[0].state, 0);
        assert!(snapshot[0].toolbox_visible);
        assert!(!snapshot[0].pulse_flip_button);
        assert_eq!(snapshot[0].app_window, Some(1));
        assert_eq!(snapshot[0].toolbox_window, Some(2));
        assert_eq!(snapshot[0].backgrounded_window, Some(2));
        assert_eq!(snapshot[0].activation_window, Some(1));

        assert!(directory.set_toolbox_visible(&mut manager, &mut ws, path, false));
        assert!(directory.set_pulse_flip_button(&mut manager, &mut ws, path, true));
        let snapshot = directory.snapshot(&manager, &ws);
        assert!(!snapshot[0].toolbox_visible);
        assert!(snapshot[0].pulse_flip_button);

        assert!(!directory.set_toolbox_visible(&mut manager, &mut ws, "/nope", true));
    }
}
