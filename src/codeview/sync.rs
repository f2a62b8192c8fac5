//! Geometry synchronization between paired windows

use tracing::debug;

use crate::shared::window_state::Size;
use crate::window::{WindowHandle, WindowSystem};

/// Largest of both windows' minimum sizes; neither window may get smaller.
pub fn common_minimum(windows: &dyn WindowSystem, a: WindowHandle, b: WindowHandle) -> Size {
    windows.minimum_size(a).max(windows.minimum_size(b))
}

/// Synchronize `dst` to `src`: maximization state first, then the frame
/// rectangle (grown to `min` when given). If the result does not stick on
/// `dst` because of its size hints, `src` is adjusted to whatever `dst`
/// actually took, so both end up identical.
pub fn synchronize_geometries(
    windows: &mut dyn WindowSystem,
    src: WindowHandle,
    dst: WindowHandle,
    min: Option<Size>,
) {
    let src_rect = windows.frame_rect(src);
    let target = match min {
        Some(min) => src_rect.expanded_to(min),
        None => src_rect,
    };

    let src_maximized = windows.is_maximized(src);
    let dst_maximized = windows.is_maximized(dst);

    // The destination is being synchronized, its own effect would only distract
    if src_maximized != dst_maximized {
        windows.skip_next_effect(dst);
    }
    if !src_maximized && dst_maximized {
        windows.unmaximize(dst);
    }
    if src_maximized && !dst_maximized {
        windows.maximize(dst);
    }

    if windows.frame_rect(dst) != target {
        windows.move_resize_frame(dst, target);
    }

    let dst_rect = windows.frame_rect(dst);
    if dst_rect != src_rect {
        debug!("Window {} settled at {:?}, following with {}", dst, dst_rect, src);
        windows.move_resize_frame(src, dst_rect);
    }
}
