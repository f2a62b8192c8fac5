//! Remote capabilities exposed by other applications
//!
//! Toolboxes publish their target, toolbox apps and paired apps expose
//! actions (`flip`, `flip-back`, `init`). Implementations must answer from
//! cached state: the pairing core calls these from inside event handlers.

use thiserror::Error;

use crate::window::WindowInfo;
use crate::window::identity::{WindowIdentity, object_path_for, toolbox_app_id};

/// Object exposing an action group
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ActionScope {
    pub bus_name: String,
    pub object_path: String,
}

impl ActionScope {
    pub fn new(bus_name: impl Into<String>, object_path: impl Into<String>) -> Self {
        Self {
            bus_name: bus_name.into(),
            object_path: object_path.into(),
        }
    }

    /// The toolbox application that serves `app_id`
    pub fn toolbox_app(app_id: &str) -> Self {
        let bus_name = toolbox_app_id(app_id);
        let object_path = object_path_for(&bus_name);
        Self::new(bus_name, object_path)
    }

    /// Window-level action group of a toolbox window
    pub fn window(info: &WindowInfo) -> Option<Self> {
        Some(Self::new(
            info.gtk_application_id.clone()?,
            info.gtk_window_object_path.clone()?,
        ))
    }

    /// Application-level action group of an app window
    pub fn application(info: &WindowInfo) -> Option<Self> {
        Some(Self::new(
            info.gtk_application_id.clone()?,
            info.gtk_application_object_path.clone()?,
        ))
    }
}

/// Parameter of an action invocation
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ActionParam {
    None,
    Bool(bool),
    /// `(ss)`: app id and window id of the window to pair with
    Target(WindowIdentity),
}

#[derive(Debug, Error)]
pub enum RemoteError {
    #[error("remote capability unavailable: {0}")]
    Unavailable(String),

    #[error("remote call failed: {0}")]
    Call(String),
}

/// Remote capability protocol
pub trait RemoteActions {
    /// Target declared by a toolbox window; `None` means it is not a toolbox.
    fn resolve_target(&self, window: &WindowInfo) -> Option<WindowIdentity>;

    /// Start fetching the action list of a scope so `has_action` can answer.
    fn prepare_actions(&self, scope: &ActionScope);

    fn has_action(&self, scope: &ActionScope, name: &str) -> bool;

    fn invoke_action(
        &self,
        scope: &ActionScope,
        name: &str,
        param: ActionParam,
    ) -> Result<(), RemoteError>;
}
