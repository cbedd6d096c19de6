//! Aspect-preserving fit calculations for the display area.
//!
//! Pure functions; the engine recomputes the whole layout from current
//! inputs every cycle instead of mutating cached dimensions.

/// Largest dimensions that fit inside `container_w` × `container_h` while
/// preserving `ratio` (width / height).
///
/// Chooses between the width-constrained and height-constrained fit by
/// comparing the ratio-derived height against the container height. A
/// degenerate container or ratio (zero, negative, or non-finite) yields
/// zero extents rather than an error.
pub fn fit_with_aspect(container_w: f32, container_h: f32, ratio: f32) -> (f32, f32) {
    if !container_w.is_finite()
        || !container_h.is_finite()
        || !ratio.is_finite()
        || container_w <= 0.0
        || container_h <= 0.0
        || ratio <= 0.0
    {
        return (0.0, 0.0);
    }

    let target_h = container_w / ratio;
    let target_w = container_h * ratio;

    if target_h > container_h {
        (target_w, container_h)
    } else {
        (container_w, target_h)
    }
}

/// Fit an arbitrary source image into a container, preserving the source's
/// native aspect ratio. Degenerate source dimensions yield zero extents.
pub fn fit_source(container_w: f32, container_h: f32, source_w: f32, source_h: f32) -> (f32, f32) {
    if !source_w.is_finite() || !source_h.is_finite() || source_w <= 0.0 || source_h <= 0.0 {
        return (0.0, 0.0);
    }
    fit_with_aspect(container_w, container_h, source_w / source_h)
}
