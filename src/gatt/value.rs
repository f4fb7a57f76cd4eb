use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

use super::{Io, IoReq, Val};

/// Producer-owned flag indicating that a characteristic value changed and
/// should be notified. The producer sets it; the notification scheduler reads
/// and clears it.
#[derive(Clone, Debug, Default)]
#[repr(transparent)]
pub struct Pending(Arc<AtomicBool>);

impl Pending {
    /// Creates a cleared flag.
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Marks the value as changed.
    #[inline]
    pub fn mark(&self) {
        self.0.store(true, Ordering::Release);
    }

    /// Returns whether the value is waiting to be notified.
    #[inline]
    #[must_use]
    pub fn is_set(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }

    /// Clears the flag and returns its previous state. A mark that races with
    /// this call is either consumed here or left set for the next flush.
    #[inline]
    pub(crate) fn take(&self) -> bool {
        self.0.swap(false, Ordering::AcqRel)
    }

    /// Returns whether `other` refers to the same flag.
    #[inline]
    #[must_use]
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

/// Shared characteristic value with change tracking. Clones refer to the same
/// storage, so a producer can update the value on another thread while the
/// characteristic callbacks from [`Value::io`] serve it.
#[derive(Clone, Debug)]
pub struct Value(Arc<Inner>);

#[derive(Debug)]
struct Inner {
    val: Mutex<Val>,
    lim: usize,
    pending: Pending,
}

impl Value {
    /// Creates an empty value that holds at most `lim` bytes.
    #[must_use]
    pub fn new(lim: usize) -> Self {
        Self(Arc::new(Inner {
            val: Mutex::new(Val::new()),
            lim,
            pending: Pending::new(),
        }))
    }

    /// Creates a value with initial contents. The initial value is not marked
    /// as pending.
    #[must_use]
    pub fn with_initial(lim: usize, v: impl AsRef<[u8]>) -> Self {
        let this = Self::new(lim);
        this.store(v.as_ref());
        this
    }

    /// Replaces the stored bytes, truncating to the limit, and marks the value
    /// as pending if the bytes changed. Returns whether they changed.
    pub fn set(&self, v: impl AsRef<[u8]>) -> bool {
        let changed = self.store(v.as_ref());
        if changed {
            self.0.pending.mark();
        }
        changed
    }

    /// Returns a copy of the stored bytes.
    #[inline]
    #[must_use]
    pub fn get(&self) -> Val {
        self.0.val.lock().clone()
    }

    /// Returns the maximum value length.
    #[inline(always)]
    #[must_use]
    pub fn limit(&self) -> usize {
        self.0.lim
    }

    /// Returns the change flag shared with the notification scheduler.
    #[inline(always)]
    #[must_use]
    pub fn pending(&self) -> &Pending {
        &self.0.pending
    }

    /// Returns a callback that serves reads and notifications from the stored
    /// bytes. Nothing is pushed to the stack while disconnected.
    #[must_use]
    pub fn io(&self) -> Io {
        Io::with(&self.0, |this, req| match req {
            IoReq::Read(mut r) if r.is_connected() => r.update(this.val.lock().as_slice()),
            IoReq::Notify(mut n) if n.is_connected() => n.update(this.val.lock().as_slice()),
            _ => Ok(()),
        })
    }

    fn store(&self, v: &[u8]) -> bool {
        let v = &v[..v.len().min(self.0.lim)];
        let mut val = self.0.val.lock();
        if val.as_slice() == v {
            return false;
        }
        val.clear();
        val.extend_from_slice(v);
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pending() {
        let p = Pending::new();
        let q = p.clone();
        assert!(!q.is_set());
        p.mark();
        assert!(q.is_set());
        assert!(q.take());
        assert!(!p.is_set());
        assert!(!p.take());
        assert!(p.ptr_eq(&q));
        assert!(!p.ptr_eq(&Pending::new()));
    }

    #[test]
    fn set() {
        let v = Value::with_initial(4, [0; 4]);
        assert!(!v.pending().is_set());
        assert!(!v.set([0; 4]));
        assert!(!v.pending().is_set());
        assert!(v.set([1, 2, 3, 4, 5]));
        assert!(v.pending().is_set());
        assert_eq!(v.get().as_slice(), &[1, 2, 3, 4]);
        assert!(v.pending().take());
        assert!(!v.set([1, 2, 3, 4]));
        assert!(!v.pending().is_set());
    }
}
