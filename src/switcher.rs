//! Pairing-aware application view for switchers and the icon bar
//!
//! While a session shows its toolbox, the toolbox stands in for the app
//! window: alt-tab lists it under the app, activating the app brings up the
//! toolbox, and the toolbox application itself does not show the window.

use crate::codeview::Side;
use crate::codeview::manager::{CodeViewManager, SessionLookup};
use crate::window::{WindowHandle, WindowSystem};

/// Application as seen by switchers
pub trait AppHandle {
    fn app_id(&self) -> &str;

    /// Windows of the application, most recently used first
    fn windows(&self) -> Vec<WindowHandle>;

    fn activate(&self, windows: &mut dyn WindowSystem) {
        if let Some(window) = self.windows().first() {
            windows.activate(*window);
        }
    }
}

/// An application handle with pairing substitutions applied
pub struct PairedApp<'a, A: AppHandle> {
    inner: &'a A,
    manager: &'a CodeViewManager,
}

impl<'a, A: AppHandle> PairedApp<'a, A> {
    pub fn new(inner: &'a A, manager: &'a CodeViewManager) -> Self {
        Self { inner, manager }
    }

    pub fn inner(&self) -> &A {
        self.inner
    }
}

impl<A: AppHandle> AppHandle for PairedApp<'_, A> {
    fn app_id(&self) -> &str {
        self.inner.app_id()
    }

    fn windows(&self) -> Vec<WindowHandle> {
        let mut result = Vec::new();
        for window in self.inner.windows() {
            if is_toolbox_window(self.manager, window) {
                continue;
            }
            let shown = activation_target(self.manager, window);
            if !result.contains(&shown) {
                result.push(shown);
            }
        }
        result
    }
}

/// Window to activate instead of `window`: the toolbox of a flipped app
pub fn activation_target(manager: &CodeViewManager, window: WindowHandle) -> WindowHandle {
    manager
        .find_session(window, SessionLookup::APP)
        .filter(|session| session.state() == Side::Toolbox)
        .and_then(|session| session.toolbox())
        .unwrap_or(window)
}

/// Toolbox windows never get an icon of their own
pub fn is_toolbox_window(manager: &CodeViewManager, window: WindowHandle) -> bool {
    manager.find_session(window, SessionLookup::TOOLBOX).is_some()
}

/// Drop windows that are turned away in a pair
pub fn filter_backgrounded(manager: &CodeViewManager, windows: &[WindowHandle]) -> Vec<WindowHandle> {
    windows
        .iter()
        .copied()
        .filter(|window| !manager.is_backgrounded(*window))
        .collect()
}
