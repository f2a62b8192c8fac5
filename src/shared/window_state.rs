//! Window geometry shared between the pairing core and the compositor adapter

/// Window frame geometry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Geometry {
    pub x: i32,
    pub y: i32,
    pub width: u32,
    pub height: u32,
}

impl Geometry {
    pub fn new(x: i32, y: i32, width: u32, height: u32) -> Self {
        Self { x, y, width, height }
    }

    pub fn size(&self) -> Size {
        Size::new(self.width, self.height)
    }

    /// Grow (never shrink) the rectangle so it is at least `min`, keeping the origin.
    pub fn expanded_to(&self, min: Size) -> Self {
        Self {
            x: self.x,
            y: self.y,
            width: self.width.max(min.width),
            height: self.height.max(min.height),
        }
    }
}

/// Window size (frame coordinates)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Size {
    pub width: u32,
    pub height: u32,
}

impl Size {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// Component-wise maximum
    pub fn max(self, other: Size) -> Size {
        Size {
            width: self.width.max(other.width),
            height: self.height.max(other.height),
        }
    }
}

/// Window flags
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WindowFlags {
    pub maximized: bool,
    pub minimized: bool,
    pub visible: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_expanded_to_keeps_origin() {
        let rect = Geometry::new(10, 20, 300, 200);
        assert_eq!(rect.expanded_to(Size::new(400, 150)), Geometry::new(10, 20, 400, 200));
    }

    #[test]
    fn test_size_max_is_component_wise() {
        assert_eq!(Size::new(300, 200).max(Size::new(400, 150)), Size::new(400, 200));
    }
}
