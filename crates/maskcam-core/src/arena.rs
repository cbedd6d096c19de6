//! Cycle-scoped buffer tracking.
//!
//! Every intermediate numeric buffer a cycle allocates (frame tensor, crop
//! batch, score vector) is wrapped in [`Tracked`], which counts itself in a
//! shared [`BufferGauge`] for as long as it lives. Release is tied to scope
//! exit, so success, empty-detections, and error paths all return the gauge
//! to its pre-cycle baseline; the engine checks that invariant after every
//! cycle.

use std::ops::{Deref, DerefMut};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// Shared count of live intermediate buffers.
#[derive(Debug, Clone, Default)]
pub struct BufferGauge(Arc<AtomicUsize>);

impl BufferGauge {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of currently live tracked buffers.
    pub fn live(&self) -> usize {
        self.0.load(Ordering::Relaxed)
    }

    fn acquire(&self) {
        self.0.fetch_add(1, Ordering::Relaxed);
    }

    fn release(&self) {
        self.0.fetch_sub(1, Ordering::Relaxed);
    }
}

/// An intermediate buffer counted in a [`BufferGauge`] until dropped.
pub struct Tracked<T> {
    value: T,
    gauge: BufferGauge,
}

impl<T> Tracked<T> {
    pub fn new(gauge: &BufferGauge, value: T) -> Self {
        gauge.acquire();
        Self {
            value,
            gauge: gauge.clone(),
        }
    }
}

impl<T> Deref for Tracked<T> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.value
    }
}

impl<T> DerefMut for Tracked<T> {
    fn deref_mut(&mut self) -> &mut T {
        &mut self.value
    }
}

impl<T> Drop for Tracked<T> {
    fn drop(&mut self) {
        self.gauge.release();
    }
}
