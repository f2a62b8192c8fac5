//! Pairing button
//!
//! The control beside the front window that flips it over. The compositor
//! renders it from [`ButtonView`] snapshots and reports clicks back; the
//! button itself only tracks visual state.

use super::{Direction, SessionId, Side};
use crate::shared::window_state::Geometry;
use crate::window::WindowSystem;

pub const FLIP_BUTTON_WIDTH: u32 = 66;
pub const FLIP_BUTTON_HEIGHT: u32 = 124;

/// What the compositor needs to draw the button
#[derive(Debug, Clone, PartialEq)]
pub struct ButtonView {
    pub visible: bool,
    pub reactive: bool,
    pub flipped: bool,
    pub dimmed: bool,
    pub highlighted: bool,
    pub rotating: Option<Direction>,
    /// Sound theme for enter/hover (`flip` or `flip-inverse`)
    pub sound_theme: &'static str,
    pub rect: Geometry,
}

#[derive(Debug, Clone, Copy)]
struct Transition {
    direction: Direction,
    target: Side,
}

#[derive(Debug)]
pub struct PairingButton {
    state: Side,
    reactive: bool,
    visible: bool,
    dimmed: bool,
    highlighted: bool,
    /// Added to the stage (after the window's first frame)
    attached: bool,
    window_rect: Geometry,
    transition: Option<Transition>,
    presented: Option<ButtonView>,
}

impl PairingButton {
    pub fn new() -> Self {
        Self {
            state: Side::App,
            reactive: true,
            visible: false,
            dimmed: false,
            highlighted: false,
            attached: false,
            window_rect: Geometry::default(),
            transition: None,
            presented: None,
        }
    }

    pub fn state(&self) -> Side {
        self.state
    }

    pub fn set_state(&mut self, state: Side) {
        self.state = state;
    }

    pub fn reactive(&self) -> bool {
        self.reactive
    }

    pub fn set_reactive(&mut self, reactive: bool) {
        self.reactive = reactive;
    }

    pub fn dimmed(&self) -> bool {
        self.dimmed
    }

    pub fn set_dimmed(&mut self, dimmed: bool) {
        self.dimmed = dimmed;
    }

    pub fn highlighted(&self) -> bool {
        self.highlighted
    }

    /// Toggle the pulse animation
    pub fn set_highlighted(&mut self, highlighted: bool) {
        self.highlighted = highlighted;
    }

    pub fn is_visible(&self) -> bool {
        self.visible
    }

    pub fn show(&mut self) {
        self.visible = true;
    }

    pub fn hide(&mut self) {
        self.visible = false;
    }

    pub fn is_attached(&self) -> bool {
        self.attached
    }

    pub fn attach(&mut self) {
        self.attached = true;
    }

    /// Track the frame rectangle of the front window
    pub fn set_rect(&mut self, rect: Geometry) {
        self.window_rect = rect;
    }

    /// Start rotating the button around the window center towards `target`.
    pub fn switch_animation(&mut self, direction: Direction, target: Side) {
        self.transition = Some(Transition { direction, target });
    }

    /// The rotation crossed its midpoint: the back face becomes the front.
    pub fn reach_midpoint(&mut self) {
        if let Some(transition) = self.transition.take() {
            self.state = transition.target;
        }
    }

    pub fn is_animating(&self) -> bool {
        self.transition.is_some()
    }

    /// Left edge of the window, vertically centered
    fn button_rect(&self) -> Geometry {
        let rect = self.window_rect;
        let offset = rect.height.saturating_sub(FLIP_BUTTON_HEIGHT) / 2;
        Geometry::new(
            rect.x,
            rect.y + offset as i32,
            FLIP_BUTTON_WIDTH,
            FLIP_BUTTON_HEIGHT,
        )
    }

    pub fn view(&self) -> ButtonView {
        let flipped = self.state == Side::Toolbox;
        ButtonView {
            visible: self.visible,
            reactive: self.reactive,
            flipped,
            dimmed: self.dimmed,
            highlighted: self.highlighted,
            rotating: self.transition.map(|t| t.direction),
            sound_theme: if flipped { "flip-inverse" } else { "flip" },
            rect: self.button_rect(),
        }
    }

    /// Push the current view to the compositor if it changed
    pub fn flush(&mut self, windows: &mut dyn WindowSystem, session: SessionId) {
        if !self.attached {
            return;
        }
        let view = self.view();
        if self.presented.as_ref() != Some(&view) {
            windows.present_button(session, &view);
            self.presented = Some(view);
        }
    }
}

impl Default for PairingButton {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_changes_at_midpoint() {
        let mut button = PairingButton::new();
        button.switch_animation(Direction::Left, Side::Toolbox);
        assert_eq!(button.state(), Side::App);
        assert_eq!(button.view().rotating, Some(Direction::Left));

        button.reach_midpoint();
        assert_eq!(button.state(), Side::Toolbox);
        assert!(button.view().flipped);
        assert_eq!(button.view().sound_theme, "flip-inverse");
        assert!(!button.is_animating());
    }

    #[test]
    fn test_button_sits_on_left_edge_centered() {
        let mut button = PairingButton::new();
        button.set_rect(Geometry::new(100, 50, 800, 600));
        let rect = button.view().rect;
        assert_eq!(rect.x, 100);
        assert_eq!(rect.y, 50 + (600 - FLIP_BUTTON_HEIGHT as i32) / 2);
        assert_eq!(rect.width, FLIP_BUTTON_WIDTH);
    }
}
