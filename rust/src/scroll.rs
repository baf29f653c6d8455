//! Scroll policy for the message list.
//!
//! The native list owns pixels; these helpers own the decisions so every
//! platform scrolls the same way.

/// Pixels between the bottom of the viewport and the bottom of the content.
#[uniffi::export]
pub fn distance_from_bottom(scroll_height: f64, scroll_top: f64, client_height: f64) -> f64 {
    (scroll_height - scroll_top - client_height).max(0.0)
}

/// Whether the list should jump to the newest message after an update.
///
/// Only a new tail message can trigger a scroll; metadata-only changes (status,
/// read flags) never do. A new tail scrolls when it is mine or when the reader
/// is already within `threshold` pixels of the bottom.
#[uniffi::export]
pub fn should_auto_scroll(
    last_id_changed: bool,
    last_is_mine: bool,
    distance_from_bottom: f64,
    threshold: f64,
) -> bool {
    if !last_id_changed {
        return false;
    }
    last_is_mine || distance_from_bottom < threshold
}

/// Reaching the top edge is what requests the next older page.
#[uniffi::export]
pub fn at_top_edge(scroll_top: f64) -> bool {
    scroll_top <= 0.0
}

/// Scroll offset that keeps the previously-first message in place after older
/// messages were prepended: the content grew above the viewport by exactly
/// `new_extent - old_extent`.
#[uniffi::export]
pub fn anchored_scroll_offset(old_offset: f64, old_extent: f64, new_extent: f64) -> f64 {
    (old_offset + (new_extent - old_extent)).max(0.0)
}
