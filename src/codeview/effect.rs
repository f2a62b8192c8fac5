//! Back-face effect applied to the window that is turned away

/// Shader used to tint the back window
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShaderEffect {
    /// No shader; compositors fall back to a plain colorize tint
    None,
    Desaturate,
    Fizzics,
}

impl ShaderEffect {
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "none" => Some(Self::None),
            "desaturate" => Some(Self::Desaturate),
            "fizzics" => Some(Self::Fizzics),
            _ => None,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Desaturate => "desaturate",
            Self::Fizzics => "fizzics",
        }
    }

    /// Shader requested by a desktop entry, else the configured default
    pub fn resolve(requested: Option<&str>, default: ShaderEffect) -> ShaderEffect {
        requested.and_then(Self::from_name).unwrap_or(default)
    }
}
