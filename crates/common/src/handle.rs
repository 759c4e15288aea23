use parking_lot::Mutex;
use std::fmt;
use std::sync::Arc;

/// Failure reported by a release routine.
#[derive(Debug, thiserror::Error)]
#[error("failed to release {resource}: {reason}")]
pub struct ReleaseError {
    pub resource: &'static str,
    pub reason: String,
}

impl ReleaseError {
    pub fn new(resource: &'static str, reason: impl Into<String>) -> Self {
        Self {
            resource,
            reason: reason.into(),
        }
    }
}

type ReleaseFn<T> = Box<dyn FnOnce(T) -> Result<(), ReleaseError> + Send>;

/// Exclusive owner of a native resource with a custom release routine.
///
/// The release routine runs exactly once, when the handle is dropped or
/// explicitly [`release`](Self::release)d. A default handle holds nothing and
/// releasing it does nothing. Handles are move-only; [`take`](Self::take)
/// moves the resource out of a place that must stay valid, leaving a null
/// handle behind.
///
/// A release routine that reports an error is fatal: the resource graph can
/// no longer be trusted, so the process aborts after logging.
pub struct ResourceHandle<T> {
    value: Option<T>,
    release: Option<ReleaseFn<T>>,
}

impl<T> ResourceHandle<T> {
    pub fn new<F>(value: T, release: F) -> Self
    where
        F: FnOnce(T) -> Result<(), ReleaseError> + Send + 'static,
    {
        Self {
            value: Some(value),
            release: Some(Box::new(release)),
        }
    }

    /// Wrap a value whose only release step is dropping it.
    pub fn owned(value: T) -> Self
    where
        T: 'static,
    {
        Self::new(value, |v| {
            drop(v);
            Ok(())
        })
    }

    pub fn null() -> Self {
        Self {
            value: None,
            release: None,
        }
    }

    pub fn is_null(&self) -> bool {
        self.value.is_none()
    }

    pub fn get(&self) -> Option<&T> {
        self.value.as_ref()
    }

    pub fn get_mut(&mut self) -> Option<&mut T> {
        self.value.as_mut()
    }

    /// Transfer ownership out, nulling `self`.
    pub fn take(&mut self) -> Self {
        Self {
            value: self.value.take(),
            release: self.release.take(),
        }
    }

    /// Release the held resource now. No-op on a null handle.
    pub fn release(&mut self) {
        let (Some(value), Some(release)) = (self.value.take(), self.release.take()) else {
            return;
        };
        if let Err(e) = release(value) {
            crate::fatal::release_failure(&e);
        }
    }
}

impl<T: Send + 'static> ResourceHandle<T> {
    /// Owned handle that logs its release and reports it to `observer`.
    pub fn tracked(
        value: T,
        resource: &'static str,
        observer: Option<Arc<dyn ReleaseObserver>>,
    ) -> Self {
        Self::new(value, move |v| {
            drop(v);
            tracing::debug!(resource, "released");
            if let Some(observer) = observer {
                observer.released(resource);
            }
            Ok(())
        })
    }
}

/// Notified after a tracked resource has been released.
pub trait ReleaseObserver: Send + Sync {
    fn released(&self, resource: &'static str);
}

/// Observer that records release order.
#[derive(Debug, Default)]
pub struct ReleaseLog {
    entries: Mutex<Vec<&'static str>>,
}

impl ReleaseLog {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn entries(&self) -> Vec<&'static str> {
        self.entries.lock().clone()
    }
}

impl ReleaseObserver for ReleaseLog {
    fn released(&self, resource: &'static str) {
        self.entries.lock().push(resource);
    }
}

impl<T> Default for ResourceHandle<T> {
    fn default() -> Self {
        Self::null()
    }
}

impl<T> Drop for ResourceHandle<T> {
    fn drop(&mut self) {
        self.release();
    }
}

impl<T: fmt::Debug> fmt::Debug for ResourceHandle<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.value {
            Some(v) => f.debug_tuple("ResourceHandle").field(v).finish(),
            None => f.write_str("ResourceHandle(null)"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn counting(value: u32, counter: &Arc<AtomicUsize>) -> ResourceHandle<u32> {
        let counter = counter.clone();
        ResourceHandle::new(value, move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(())
        })
    }

    #[test]
    fn drop_releases_exactly_once() {
        let count = Arc::new(AtomicUsize::new(0));
        {
            let h = counting(7, &count);
            assert_eq!(h.get(), Some(&7));
        }
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn null_handle_release_is_noop() {
        let mut h: ResourceHandle<String> = ResourceHandle::default();
        assert!(h.is_null());
        h.release();
        assert!(h.get().is_none());
    }

    #[test]
    fn take_moves_ownership_and_nulls_source() {
        let count = Arc::new(AtomicUsize::new(0));
        let mut a = counting(1, &count);
        let b = a.take();
        assert!(a.is_null());
        assert!(!b.is_null());
        drop(a);
        assert_eq!(count.load(Ordering::SeqCst), 0);
        drop(b);
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn explicit_release_then_drop_does_not_double_release() {
        let count = Arc::new(AtomicUsize::new(0));
        let mut h = counting(3, &count);
        h.release();
        assert!(h.is_null());
        drop(h);
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn moved_handle_releases_once() {
        let count = Arc::new(AtomicUsize::new(0));
        let h = counting(5, &count);
        let moved = vec![h];
        drop(moved);
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn tracked_handle_reports_release() {
        let log = ReleaseLog::new();
        let a = ResourceHandle::tracked(1u8, "first", Some(log.clone()));
        let b = ResourceHandle::tracked(2u8, "second", Some(log.clone()));
        drop(b);
        drop(a);
        assert_eq!(log.entries(), vec!["second", "first"]);
    }

    #[test]
    fn get_mut_modifies_held_value() {
        let mut h = ResourceHandle::owned(vec![1, 2]);
        h.get_mut().unwrap().push(3);
        assert_eq!(h.get().unwrap().len(), 3);
    }
}
