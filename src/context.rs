//! Flip-to-hack context
//!
//! Owns the window-system and remote adapters together with the session
//! registry, turns shell events into manager calls and keeps the hackable
//! apps directory in step with the registry.

use std::env;
use std::path::{Path, PathBuf};

use flipview_ipc::SessionDescriptor;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::codeview::manager::{CodeViewManager, ManagerEvent};
use crate::codeview::{SessionId, SessionTiming, ShellMode};
use crate::config::{CompanionConfig, Config};
use crate::eligibility::EligibilityPolicy;
use crate::facade::HackableAppsDirectory;
use crate::remote::RemoteActions;
use crate::window::{AnimationId, GrabOp, TimerId, WindowHandle, WindowInfo, WindowSystem};

/// Everything the pairing core reacts to
#[derive(Debug, Clone, PartialEq)]
pub enum ShellEvent {
    WindowMapped(WindowInfo),
    WindowFirstFrame(WindowHandle),
    WindowDestroyed(WindowHandle),
    /// Actor of a window under destroy tracking went away
    ActorDestroyed(WindowHandle),
    Minimized(WindowHandle),
    Unminimized(WindowHandle),
    GeometryChanged(WindowHandle),
    GeometryAllocate(WindowHandle),
    MaximizeChanged(WindowHandle),
    Raised(WindowHandle),
    VisibilityChanged(WindowHandle),
    GrabBegin(WindowHandle, GrabOp),
    GrabEnd(WindowHandle),
    FocusChanged(Option<WindowHandle>),
    ShellModeChanged(ShellMode),
    AnimationCompleted(AnimationId),
    TimerFired(TimerId),
    ButtonClicked(SessionId),
    HackableChanged(WindowHandle, bool),
    /// Jump any running flip of the window's session to its end
    KillEffects(WindowHandle),
    SetToolboxVisible { object_path: String, visible: bool },
    SetPulseFlipButton { object_path: String, pulse: bool },
    /// The window manager is stopping
    Stopped,
    InstalledAppsChanged,
}

pub struct FlipContext<W: WindowSystem, R: RemoteActions> {
    windows: W,
    remote: R,
    manager: CodeViewManager,
    directory: HackableAppsDirectory,
    registry: mpsc::UnboundedReceiver<ManagerEvent>,
    companion: CompanionConfig,
    published: Option<Vec<SessionDescriptor>>,
    enabled: bool,
}

impl<W: WindowSystem, R: RemoteActions> FlipContext<W, R> {
    pub fn new(config: &Config, windows: W, remote: R) -> Self {
        let policy = EligibilityPolicy::new(
            config.eligibility.clone(),
            config.companion.privileged_app_ids.clone(),
        );
        let mut manager = CodeViewManager::new(policy, SessionTiming::from_config(config));
        let registry = manager.subscribe();

        Self {
            windows,
            remote,
            manager,
            directory: HackableAppsDirectory::new(),
            registry,
            companion: config.companion.clone(),
            published: None,
            enabled: false,
        }
    }

    pub fn windows(&self) -> &W {
        &self.windows
    }

    pub fn windows_mut(&mut self) -> &mut W {
        &mut self.windows
    }

    pub fn remote(&self) -> &R {
        &self.remote
    }

    pub fn manager(&self) -> &CodeViewManager {
        &self.manager
    }

    pub fn directory(&self) -> &HackableAppsDirectory {
        &self.directory
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Start pairing, taking over the windows that already exist
    pub fn enable(&mut self, existing: Vec<WindowInfo>) {
        if self.enabled {
            return;
        }
        self.enabled = true;
        self.refresh_companion();

        if let Err(e) = self.manager.policy_mut().watch() {
            warn!("Hack data changes will not be picked up: {:#}", e);
        }

        info!("Flip to hack enabled, {} existing windows", existing.len());
        for info in existing {
            self.manager.handle_window_mapped(&mut self.windows, &self.remote, info);
        }
    }

    /// Stop pairing: every session is torn down
    pub fn disable(&mut self) {
        if !self.enabled {
            return;
        }
        self.enabled = false;
        self.manager.remove_sessions(&mut self.windows);
        info!("Flip to hack disabled");
    }

    fn refresh_companion(&mut self) {
        let found = find_companion(&self.companion.clubhouse_ids, &application_dirs(&self.companion));
        match &found {
            Some(id) => debug!("Companion {} is installed", id),
            None => debug!("No companion installed"),
        }
        self.manager.set_companion_installed(found.is_some());
    }

    /// Feed one event to the core. Returns whether a mapped or destroyed
    /// window was taken over by a session.
    pub fn dispatch(&mut self, event: ShellEvent) -> bool {
        if !self.enabled {
            debug!("Flip to hack disabled, dropping {:?}", event);
            return false;
        }

        let windows = &mut self.windows;
        let remote = &self.remote;
        let manager = &mut self.manager;

        match event {
            ShellEvent::WindowMapped(info) => return manager.handle_window_mapped(windows, remote, info),
            ShellEvent::WindowDestroyed(window) | ShellEvent::ActorDestroyed(window) => {
                return manager.handle_window_destroyed(windows, remote, window);
            }
            ShellEvent::WindowFirstFrame(window) => manager.handle_first_frame(windows, remote, window),
            ShellEvent::Minimized(window) => manager.handle_minimized(windows, window),
            ShellEvent::Unminimized(window) => manager.handle_unminimized(windows, remote, window),
            ShellEvent::GeometryChanged(window) => manager.handle_geometry_changed(windows, window),
            ShellEvent::GeometryAllocate(window) => manager.handle_geometry_allocate(windows, window),
            ShellEvent::MaximizeChanged(window) => manager.handle_maximize_changed(windows, window),
            ShellEvent::Raised(window) => manager.handle_raised(windows, window),
            ShellEvent::VisibilityChanged(window) => manager.handle_visibility_changed(windows, remote, window),
            ShellEvent::GrabBegin(window, op) => manager.handle_grab_begin(windows, remote, window, op),
            ShellEvent::GrabEnd(window) => manager.handle_grab_end(windows, remote, window),
            ShellEvent::FocusChanged(window) => manager.handle_focus_changed(windows, remote, window),
            ShellEvent::ShellModeChanged(mode) => manager.handle_shell_mode(windows, remote, mode),
            ShellEvent::AnimationCompleted(animation) => {
                manager.handle_animation_completed(windows, remote, animation)
            }
            ShellEvent::TimerFired(timer) => manager.handle_timer_fired(windows, remote, timer),
            ShellEvent::ButtonClicked(id) => manager.handle_button_clicked(windows, remote, id),
            ShellEvent::HackableChanged(window, hackable) => {
                manager.handle_hackable_changed(windows, remote, window, hackable)
            }
            ShellEvent::KillEffects(window) => manager.kill_effects(windows, remote, window),
            ShellEvent::SetToolboxVisible { object_path, visible } => {
                if !self.directory.set_toolbox_visible(manager, windows, &object_path, visible) {
                    warn!("No hackable app at {}", object_path);
                }
            }
            ShellEvent::SetPulseFlipButton { object_path, pulse } => {
                if !self.directory.set_pulse_flip_button(manager, windows, &object_path, pulse) {
                    warn!("No hackable app at {}", object_path);
                }
            }
            ShellEvent::Stopped => manager.stop(),
            ShellEvent::InstalledAppsChanged => self.refresh_companion(),
        }
        false
    }

    /// Introspection view of the sessions, if it changed since the last call
    pub fn take_session_snapshot(&mut self) -> Option<Vec<SessionDescriptor>> {
        while let Ok(event) = self.registry.try_recv() {
            self.directory.apply(event);
        }

        let snapshot = self.directory.snapshot(&self.manager, &self.windows);
        if self.published.as_ref() == Some(&snapshot) {
            return None;
        }
        self.published = Some(snapshot.clone());
        Some(snapshot)
    }
}

/// First companion id with a desktop entry in `dirs`
pub fn find_companion(ids: &[String], dirs: &[PathBuf]) -> Option<String> {
    ids.iter()
        .find(|id| {
            dirs.iter()
                .any(|dir| dir.join(format!("{id}.desktop")).is_file())
        })
        .cloned()
}

/// Directories holding installed desktop entries, most specific first
pub fn application_dirs(config: &CompanionConfig) -> Vec<PathBuf> {
    let mut result = config.application_dirs.clone();

    if let Some(data_dir) = dirs::data_dir() {
        result.push(data_dir.join("applications"));
        result.push(data_dir.join("flatpak/exports/share/applications"));
    }
    result.push(PathBuf::from("/var/lib/flatpak/exports/share/applications"));

    let system = env::var("XDG_DATA_DIRS").unwrap_or_else(|_| "/usr/local/share:/usr/share".into());
    result.extend(
        system
            .split(':')
            .filter(|dir| !dir.is_empty())
            .map(|dir| Path::new(dir).join("applications")),
    );

    result.dedup();
    result
}
