//! Shared handle for a context accessed from both the input and paint
//! threads.

use crate::context::VisualEditContext;
use crate::metrics::{FontMetrics, LayoutConfig};
use std::sync::{Arc, RwLock};

/// Cloneable handle over a [`VisualEditContext`]. Edits take the write
/// lock; the paint path reads, and can decline to wait (skip the frame)
/// while an edit is in flight.
#[derive(Clone)]
pub struct SharedEditContext {
    inner: Arc<RwLock<VisualEditContext>>,
}

impl SharedEditContext {
    pub fn new(context: VisualEditContext) -> Self {
        Self {
            inner: Arc::new(RwLock::new(context)),
        }
    }

    pub fn with_metrics(
        metrics: Arc<dyn FontMetrics>,
        config: LayoutConfig,
        viewport_width: f64,
        viewport_height: f64,
    ) -> Self {
        Self::new(VisualEditContext::new(
            metrics,
            config,
            viewport_width,
            viewport_height,
        ))
    }

    pub fn with_read<T>(&self, f: impl FnOnce(&VisualEditContext) -> T) -> T {
        f(&self.inner.read().unwrap())
    }

    pub fn with_write<T>(&self, f: impl FnOnce(&mut VisualEditContext) -> T) -> T {
        f(&mut self.inner.write().unwrap())
    }

    /// Non-blocking read; `None` means an edit holds the lock and the
    /// caller should repaint on the next frame instead.
    pub fn try_with_read<T>(&self, f: impl FnOnce(&VisualEditContext) -> T) -> Option<T> {
        self.inner.try_read().ok().map(|guard| f(&guard))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::MonospaceMetrics;

    fn shared() -> SharedEditContext {
        let metrics = Arc::new(MonospaceMetrics::default());
        SharedEditContext::with_metrics(metrics, LayoutConfig::default(), 800.0, 600.0)
    }

    #[test]
    fn test_write_then_read() {
        let ctx = shared();
        ctx.with_write(|c| c.reset("hello"));
        assert_eq!(ctx.with_read(|c| c.text()), "hello");
    }

    #[test]
    fn test_try_read_skips_while_writing() {
        let ctx = shared();
        let clone = ctx.clone();
        ctx.with_write(|c| {
            c.reset("busy");
            assert!(clone.try_with_read(|c| c.text()).is_none());
        });
        assert_eq!(clone.try_with_read(|c| c.text()), Some("busy".to_owned()));
    }

    #[test]
    fn test_clones_share_state() {
        let ctx = shared();
        let clone = ctx.clone();
        ctx.with_write(|c| c.insert("ab"));
        assert_eq!(clone.with_read(|c| c.text()), "ab");
    }
}
