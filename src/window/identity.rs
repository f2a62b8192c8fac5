//! Window identity and toolbox discovery helpers
//!
//! A window is identified by `(app id, window id)`. Toolbox windows declare the
//! identity of the window they control as their target; matching the two is
//! how a toolbox finds its session.

use std::fmt;

use zbus::names::BusName;

use super::WindowInfo;

const DESKTOP_SUFFIX: &str = ".desktop";

/// Current toolbox interface
pub const TOOLBOX_INTERFACE: &str = "com.hack_computer.HackToolbox.Toolbox";
/// Toolbox interface used by the older `com.endlessm` apps
pub const OLD_TOOLBOX_INTERFACE: &str = "com.endlessm.HackToolbox.Toolbox";

/// `(app id, window id)` pair used for matching apps and toolboxes
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct WindowIdentity {
    pub app_id: String,
    pub window_id: String,
}

impl WindowIdentity {
    pub fn new(app_id: impl Into<String>, window_id: impl Into<String>) -> Self {
        Self {
            app_id: app_id.into(),
            window_id: window_id.into(),
        }
    }
}

impl fmt::Display for WindowIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.app_id, self.window_id)
    }
}

/// Strip the `.desktop` suffix from a desktop file id
pub fn strip_desktop_suffix(desktop_id: &str) -> &str {
    desktop_id.strip_suffix(DESKTOP_SUFFIX).unwrap_or(desktop_id)
}

/// Application id of a window: the GTK application id when declared, else the
/// tracked application's desktop id without its suffix.
pub fn app_id(info: &WindowInfo) -> Option<String> {
    if let Some(id) = info.gtk_application_id.as_deref().filter(|id| !id.is_empty()) {
        return Some(id.to_string());
    }
    info.app
        .as_ref()
        .map(|app| strip_desktop_suffix(&app.desktop_id).to_string())
}

/// Window id: the GTK window object path, else a synthetic id from the stable sequence
pub fn window_id(info: &WindowInfo) -> String {
    match info.gtk_window_object_path.as_deref() {
        Some(path) if !path.is_empty() => path.to_string(),
        _ => format!("window:{}", info.stable_sequence),
    }
}

pub fn window_identity(info: &WindowInfo) -> Option<WindowIdentity> {
    app_id(info).map(|app_id| WindowIdentity::new(app_id, window_id(info)))
}

/// Where a window would publish its toolbox target, if it were a toolbox
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolboxProbe {
    pub bus_name: String,
    pub object_path: String,
    pub interface: &'static str,
}

/// Decide whether a window could be a toolbox and where to ask.
///
/// A toolbox must declare both a GTK application id that is a valid bus name
/// and a window object path.
pub fn toolbox_probe(info: &WindowInfo) -> Option<ToolboxProbe> {
    let bus_name = info.gtk_application_id.as_deref()?;
    let object_path = info.gtk_window_object_path.as_deref()?;

    if bus_name.is_empty() || object_path.is_empty() || BusName::try_from(bus_name).is_err() {
        return None;
    }

    let interface = if bus_name.starts_with("com.endlessm") {
        OLD_TOOLBOX_INTERFACE
    } else {
        TOOLBOX_INTERFACE
    };

    Some(ToolboxProbe {
        bus_name: bus_name.to_string(),
        object_path: object_path.to_string(),
        interface,
    })
}

/// Validate a toolbox `Target` property value
pub fn parse_target(app_id: &str, window_id: &str) -> Option<WindowIdentity> {
    if app_id.is_empty() || window_id.is_empty() {
        return None;
    }
    Some(WindowIdentity::new(app_id, window_id))
}

/// Well-known name of the toolbox application serving `app_id`
pub fn toolbox_app_id(app_id: &str) -> String {
    let prefix = if app_id.starts_with("com.endlessm.") {
        "com.endlessm"
    } else {
        "com.hack_computer"
    };
    format!("{prefix}.HackToolbox")
}

/// Object path for a well-known name (`a.b.C` -> `/a/b/C`)
pub fn object_path_for(bus_name: &str) -> String {
    format!("/{}", bus_name.replace('.', "/"))
}
