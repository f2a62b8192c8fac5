//! Flip-to-code pairing
//!
//! A [`session::CodingSession`] pairs an application window with its toolbox
//! window and flips between them; the [`manager::CodeViewManager`] routes
//! window-system events to the right session.

pub mod button;
pub mod effect;
pub mod manager;
pub mod session;
pub mod sync;

use std::fmt;
use std::time::Duration;

use crate::config::Config;
use effect::ShaderEffect;

/// Registry-assigned session id
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SessionId(pub u64);

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "session#{}", self.0)
    }
}

/// Which side of the pair faces the user
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Side {
    #[default]
    App,
    Toolbox,
}

impl Side {
    /// Numeric value published to introspection clients
    pub fn as_u32(self) -> u32 {
        match self {
            Side::App => 0,
            Side::Toolbox => 1,
        }
    }
}

/// Rotation direction of a flip
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// Toolbox -> app
    Right,
    /// App -> toolbox
    Left,
}

impl Direction {
    pub fn outgoing_midpoint(self) -> f32 {
        match self {
            Direction::Right => 90.0,
            Direction::Left => -90.0,
        }
    }

    pub fn outgoing_final(self) -> f32 {
        match self {
            Direction::Right => 180.0,
            Direction::Left => -180.0,
        }
    }

    pub fn incoming_start(self) -> f32 {
        -self.outgoing_final()
    }

    pub fn incoming_midpoint(self) -> f32 {
        -self.outgoing_midpoint()
    }
}

/// Shell-wide state that hides the pairing button
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ShellMode {
    pub overview: bool,
    pub fullscreen: bool,
    pub locked: bool,
}

impl ShellMode {
    pub fn hides_button(&self) -> bool {
        self.overview || self.fullscreen || self.locked
    }
}

/// Timing and behavior knobs shared by all sessions
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SessionTiming {
    /// Base window animation time; each half of a flip takes twice this
    pub animation: Duration,
    /// Delay after a grab ends before real geometry sync resumes
    pub grab_debounce: Duration,
    pub constrain_geometry: bool,
    pub default_shader: ShaderEffect,
}

impl SessionTiming {
    pub fn from_config(config: &Config) -> Self {
        Self {
            animation: Duration::from_millis(config.flip.animation_ms),
            grab_debounce: Duration::from_millis(config.flip.grab_debounce_ms),
            constrain_geometry: config.flip.constrain_geometry,
            default_shader: ShaderEffect::from_name(&config.effects.default_shader)
                .unwrap_or(ShaderEffect::Desaturate),
        }
    }

    pub fn half_flip(&self) -> Duration {
        self.animation * 2
    }
}

impl Default for SessionTiming {
    fn default() -> Self {
        Self::from_config(&Config::default())
    }
}
