//! Flipview IPC Protocol
//!
//! Shared message types for communication between the compositor (which owns
//! the real windows, actors and animations) and `flipview` (which pairs app
//! windows with their toolbox and drives the flip).

use serde::{Deserialize, Serialize};

/// Socket path for IPC communication
pub fn socket_path() -> std::path::PathBuf {
    let runtime_dir = std::env::var("XDG_RUNTIME_DIR")
        .unwrap_or_else(|_| format!("/run/user/{}", unsafe { libc::getuid() }));
    std::path::PathBuf::from(runtime_dir).join("flipview.sock")
}

// ============================================================================
// Compositor → Flipview Events
// ============================================================================

/// Events sent from the compositor to flipview
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum HostEvent {
    /// A window was created (not yet mapped)
    WindowCreated { window: WindowDescriptor },

    /// A window was mapped. The compositor holds its map effect until
    /// answered with `CompleteMap` or `ReleaseMap`.
    WindowMapped { id: u32 },

    /// The window's actor drew its first frame
    WindowFirstFrame { id: u32 },

    /// A window was destroyed. Its actor is only kept when answered with
    /// `HoldActor`.
    WindowDestroyed { id: u32 },

    /// The actor of a window under destroy tracking went away
    ActorDestroyed { id: u32 },

    /// A window was minimized
    WindowMinimized { id: u32 },

    /// A window was unminimized
    WindowUnminimized { id: u32 },

    /// A window was moved or resized
    WindowGeometryChanged {
        id: u32,
        x: i32,
        y: i32,
        width: u32,
        height: u32,
    },

    /// The compositor is allocating geometry for a window
    WindowGeometryAllocate { id: u32 },

    /// Maximization state changed
    WindowMaximizeChanged { id: u32, maximized: bool },

    /// A window was raised in the stacking order
    WindowRaised { id: u32 },

    /// The window actor's visibility changed
    WindowVisibilityChanged { id: u32, visible: bool },

    /// A grab operation started on a window
    GrabBegin { id: u32, op: GrabKind },

    /// A grab operation ended on a window
    GrabEnd { id: u32 },

    /// Keyboard focus moved
    FocusChanged { id: Option<u32> },

    /// Overview, fullscreen or lock state changed
    ShellModeChanged {
        overview: bool,
        fullscreen: bool,
        locked: bool,
    },

    /// A rotation started with `EaseRotation` reached its target
    AnimationCompleted { animation: u64 },

    /// The user clicked a pairing button
    ButtonClicked { session: u64 },

    /// Jump any running flip of the window's pair to its end
    KillEffects { id: u32 },

    /// Introspection client wrote `ToolboxVisible`
    SetToolboxVisible { object_path: String, visible: bool },

    /// Introspection client wrote `PulseFlipToHackButton`
    SetPulseFlipButton { object_path: String, pulse: bool },

    /// Desktop entries were installed or removed
    InstalledAppsChanged,

    /// The window manager is stopping
    Stopped,

    /// Initial state sync (sent on connect)
    SyncState {
        windows: Vec<WindowDescriptor>,
        focused_window: Option<u32>,
    },
}

/// Kind of grab operation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum GrabKind {
    Moving,
    Resizing,
    Other,
}

/// Window information sent on creation and state sync
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WindowDescriptor {
    pub id: u32,
    pub x: i32,
    pub y: i32,
    pub width: u32,
    pub height: u32,
    pub min_width: u32,
    pub min_height: u32,
    pub maximized: bool,
    pub minimized: bool,
    pub visible: bool,
    pub first_frame_drawn: bool,
    /// Normal toplevel (as opposed to dialogs, menus, splash screens)
    pub normal: bool,
    pub stable_sequence: u32,
    pub gtk_application_id: Option<String>,
    pub gtk_application_object_path: Option<String>,
    pub gtk_window_object_path: Option<String>,
    pub app: Option<AppDescriptor>,
}

/// Desktop entry of the application a window belongs to
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppDescriptor {
    pub desktop_id: String,
    pub should_show: bool,
    /// `X-Endless-Hackable`, if the entry declares it
    pub hackable: Option<bool>,
    /// `X-Endless-HackShader`, if the entry declares it
    pub shader: Option<String>,
}

// ============================================================================
// Flipview → Compositor Commands
// ============================================================================

/// Easing curve for rotations
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EasingKind {
    EaseInQuad,
    EaseOutQuad,
}

/// Commands sent from flipview to the compositor
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ShellCommand {
    /// Move and resize a window frame
    MoveResize {
        id: u32,
        x: i32,
        y: i32,
        width: u32,
        height: u32,
    },

    Maximize { id: u32 },
    Unmaximize { id: u32 },
    Minimize { id: u32 },
    Unminimize { id: u32 },
    Activate { id: u32 },
    Raise { id: u32 },

    /// Politely ask a window to close
    Delete { id: u32 },

    /// Show or hide the window actor
    SetVisible { id: u32, visible: bool },

    /// Set the actor's Y rotation (degrees, pivot at the center)
    SetRotation { id: u32, angle: f32 },

    SetOpacity { id: u32, opacity: u8 },

    /// Toggle the back-face effect on an actor
    SetEffect {
        id: u32,
        enabled: bool,
        shader: String,
    },

    /// Ease the actor's Y rotation, reply with `AnimationCompleted`
    EaseRotation {
        id: u32,
        animation: u64,
        angle: f32,
        duration_ms: u64,
        easing: EasingKind,
    },

    /// Stop a running rotation without completing it
    CancelAnimation { animation: u64 },

    /// Attach a clone of `back` behind the `front` actor
    AttachClone { front: u32, back: u32, clone: u64 },

    DetachClone { front: u32, clone: u64 },

    /// Expand the pending allocation to at least this size
    ExpandAllocation {
        id: u32,
        min_width: u32,
        min_height: u32,
    },

    /// Finish the map effect (the flip replaces it)
    CompleteMap { id: u32 },

    /// Play the default map effect of a window flipview did not take over
    ReleaseMap { id: u32 },

    /// Keep the actor of a destroyed window until `CompleteDestroy`
    HoldActor { id: u32 },

    /// Finish the destroy effect of a held actor
    CompleteDestroy { id: u32 },

    SkipNextEffect { id: u32 },

    /// Start/stop reporting `ActorDestroyed` for a window
    TrackActorDestroy { id: u32, enabled: bool },

    /// Present the pairing button of a session
    UpdateButton { session: u64, button: ButtonDescriptor },

    RemoveButton { session: u64 },

    /// Publish the introspection view of all sessions
    PublishSessions { sessions: Vec<SessionDescriptor> },
}

/// Visual state of a pairing button
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ButtonDescriptor {
    pub visible: bool,
    pub reactive: bool,
    pub flipped: bool,
    pub dimmed: bool,
    pub highlighted: bool,
    /// `Some(true)` while rotating to the right, `Some(false)` to the left
    pub rotating_right: Option<bool>,
    pub sound_theme: String,
    pub x: i32,
    pub y: i32,
    pub width: u32,
    pub height: u32,
}

/// Introspection view of one session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionDescriptor {
    pub object_path: String,
    pub app_id: Option<String>,
    pub state: u32,
    pub toolbox_visible: bool,
    pub pulse_flip_button: bool,
    pub app_window: Option<u32>,
    pub toolbox_window: Option<u32>,
    /// Window turned away in a complete pair; alt-tab and the icon bar skip it
    pub backgrounded_window: Option<u32>,
    /// Window to activate in place of the app window
    pub activation_window: Option<u32>,
}

// ============================================================================
// Message Framing
// ============================================================================

/// A framed message with length prefix for reliable socket reads
#[derive(Debug)]
pub struct FramedMessage {
    pub data: Vec<u8>,
}

impl FramedMessage {
    /// Create a new framed message from serializable data
    pub fn new<T: Serialize>(msg: &T) -> anyhow::Result<Self> {
        let data = serde_json::to_vec(msg)?;
        Ok(Self { data })
    }

    /// Encode message with length prefix (4 bytes, big-endian)
    pub fn encode(&self) -> Vec<u8> {
        let len = self.data.len() as u32;
        let mut buf = Vec::with_capacity(4 + self.data.len());
        buf.extend_from_slice(&len.to_be_bytes());
        buf.extend_from_slice(&self.data);
        buf
    }

    /// Decode a host event from bytes
    pub fn decode_host_event(data: &[u8]) -> anyhow::Result<HostEvent> {
        Ok(serde_json::from_slice(data)?)
    }

    /// Decode a shell command from bytes
    pub fn decode_shell_command(data: &[u8]) -> anyhow::Result<ShellCommand> {
        Ok(serde_json::from_slice(data)?)
    }
}
