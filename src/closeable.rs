//! Closeable registrations and ordered callback lists
//!
//! Trackers, listeners and subscriptions all hand back something that can be
//! closed. [`CloseableSet`] collects them so a view can release everything it
//! registered in one go.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError, Weak};

/// Something that can be released. Closing twice is harmless.
pub trait Closeable: Send {
    fn close(&self);
}

/// Closes everything added to it, on [`close_all`](Self::close_all) or drop.
#[derive(Default)]
pub struct CloseableSet {
    items: Vec<Box<dyn Closeable>>,
}

impl CloseableSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, closeable: impl Closeable + 'static) {
        self.items.push(Box::new(closeable));
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Close every item, most recently added first, and empty the set.
    pub fn close_all(&mut self) {
        while let Some(item) = self.items.pop() {
            item.close();
        }
    }
}

impl Drop for CloseableSet {
    fn drop(&mut self) {
        self.close_all();
    }
}

impl fmt::Debug for CloseableSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CloseableSet").field("len", &self.items.len()).finish()
    }
}

/// Removal side of a callback list, type-erased for [`CallbackHandle`].
trait Unregister: Send + Sync {
    fn unregister(&self, id: u64);
}

struct ListInner<A: ?Sized> {
    next_id: AtomicU64,
    callbacks: Mutex<Vec<(u64, Arc<dyn Fn(&A) + Send + Sync>)>>,
}

impl<A: ?Sized + 'static> Unregister for ListInner<A> {
    fn unregister(&self, id: u64) {
        self.callbacks.lock().unwrap_or_else(PoisonError::into_inner).retain(|(other, _)| *other != id);
    }
}

/// Callbacks invoked in registration order.
///
/// The list is locked only to add, remove or snapshot callbacks, never while
/// one runs, so callbacks may register or close other callbacks.
pub struct CallbackList<A: ?Sized> {
    inner: Arc<ListInner<A>>,
}

impl<A: ?Sized + 'static> CallbackList<A> {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(ListInner { next_id: AtomicU64::new(1), callbacks: Mutex::new(Vec::new()) }),
        }
    }

    /// Append a callback; the handle removes it again.
    pub fn add<F>(&self, callback: F) -> CallbackHandle
    where
        F: Fn(&A) + Send + Sync + 'static,
    {
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        self.inner.callbacks.lock().unwrap_or_else(PoisonError::into_inner).push((id, Arc::new(callback)));
        let list: Arc<dyn Unregister> = self.inner.clone();
        CallbackHandle { list: Arc::downgrade(&list), id }
    }

    /// Invoke every callback currently registered.
    pub fn notify(&self, arg: &A) {
        let snapshot: Vec<_> = self
            .inner
            .callbacks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|(_, callback)| Arc::clone(callback))
            .collect();
        for callback in snapshot {
            callback(arg);
        }
    }

    pub fn len(&self) -> usize {
        self.inner.callbacks.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<A: ?Sized + 'static> Default for CallbackList<A> {
    fn default() -> Self {
        Self::new()
    }
}

impl<A: ?Sized> fmt::Debug for CallbackList<A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let len = self.inner.callbacks.lock().unwrap_or_else(PoisonError::into_inner).len();
        f.debug_struct("CallbackList").field("len", &len).finish()
    }
}

/// Registration in a [`CallbackList`].
///
/// Dropping the handle leaves the callback registered; call
/// [`close`](Closeable::close) to remove it.
#[derive(Clone)]
pub struct CallbackHandle {
    list: Weak<dyn Unregister>,
    id: u64,
}

impl CallbackHandle {
    /// Remove the callback from its list.
    pub fn close(&self) {
        if let Some(list) = self.list.upgrade() {
            list.unregister(self.id);
        }
    }
}

impl Closeable for CallbackHandle {
    fn close(&self) {
        CallbackHandle::close(self);
    }
}

impl fmt::Debug for CallbackHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CallbackHandle").field("id", &self.id).finish()
    }
}
