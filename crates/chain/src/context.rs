//! Cancellable interception contexts.
//!
//! All contexts created during one chain invocation live in a shared arena
//! and refer to each other through [`ContextId`] handles. Each node owns one
//! payload, a canceled flag, the handle of at most one live child and the
//! notifiers to run when it gets canceled.

use std::{
    fmt,
    panic::{self, AssertUnwindSafe},
    sync::{Arc, Mutex, MutexGuard},
};

use tracing::warn;

type Notifier = Box<dyn FnOnce() + Send>;

/// Opaque handle of a context node within one chain invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ContextId(usize);

struct Node<T> {
    data: T,
    canceled: bool,
    child: Option<ContextId>,
    notifiers: Vec<Notifier>,
}

struct Arena<T> {
    nodes: Vec<Node<T>>,
}

impl<T> Arena<T> {
    fn insert(&mut self, data: T) -> ContextId {
        self.nodes.push(Node {
            data,
            canceled: false,
            child: None,
            notifiers: Vec::new(),
        });
        ContextId(self.nodes.len() - 1)
    }

    fn node(&self, id: ContextId) -> &Node<T> {
        &self.nodes[id.0]
    }

    fn node_mut(&mut self, id: ContextId) -> &mut Node<T> {
        &mut self.nodes[id.0]
    }
}

/// Handle to one node of an interception context tree.
///
/// Cloning the handle does not create a new context; use
/// [`next`](Self::next) for that.
pub struct InterceptionContext<T> {
    arena: Arc<Mutex<Arena<T>>>,
    id: ContextId,
}

impl<T> Clone for InterceptionContext<T> {
    fn clone(&self) -> Self {
        Self {
            arena: Arc::clone(&self.arena),
            id: self.id,
        }
    }
}

impl<T> fmt::Debug for InterceptionContext<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InterceptionContext")
            .field("id", &self.id)
            .field("canceled", &self.is_canceled())
            .finish()
    }
}

impl<T> InterceptionContext<T> {
    /// Start a new context tree whose root carries `data`.
    pub fn start(data: T) -> Self {
        let mut arena = Arena { nodes: Vec::new() };
        let id = arena.insert(data);
        Self {
            arena: Arc::new(Mutex::new(arena)),
            id,
        }
    }

    fn lock(&self) -> MutexGuard<'_, Arena<T>> {
        self.arena.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn id(&self) -> ContextId {
        self.id
    }

    /// Clone of the payload owned by this context.
    pub fn data(&self) -> T
    where
        T: Clone,
    {
        self.lock().node(self.id).data.clone()
    }

    /// Borrow the payload for the duration of `f`.
    pub fn with_data<R>(&self, f: impl FnOnce(&T) -> R) -> R {
        f(&self.lock().node(self.id).data)
    }

    pub fn is_canceled(&self) -> bool {
        self.lock().node(self.id).canceled
    }

    /// Handle of the live child, if any.
    pub fn child(&self) -> Option<ContextId> {
        self.lock().node(self.id).child
    }

    /// Create a child context carrying `data`.
    ///
    /// The previous child, if any, is detached from this context. It stays
    /// alive for as long as a pending downstream call still holds it. A
    /// child of a canceled context starts out canceled.
    pub fn next(&self, data: T) -> Self {
        let mut arena = self.lock();
        let child = arena.insert(data);
        if arena.node(self.id).canceled {
            arena.node_mut(child).canceled = true;
        } else {
            arena.node_mut(self.id).child = Some(child);
        }
        Self {
            arena: Arc::clone(&self.arena),
            id: child,
        }
    }

    /// Register a notifier to run when this context is canceled.
    ///
    /// Notifiers run synchronously, in registration order. A notifier that
    /// panics is logged and skipped.
    pub fn on_cancel(&self, notifier: impl FnOnce() + Send + 'static) {
        self.lock().node_mut(self.id).notifiers.push(Box::new(notifier));
    }

    /// Cancel everything currently downstream of this context.
    ///
    /// This context itself is left untouched. Every descendant reachable
    /// through live child links is marked canceled and unlinked in one
    /// step; their notifiers then run deepest first.
    pub fn cancel(&self) {
        let pending = {
            let mut arena = self.lock();
            let mut pending = Vec::new();
            let mut cursor = arena.node_mut(self.id).child.take();
            while let Some(id) = cursor {
                let node = arena.node_mut(id);
                node.canceled = true;
                cursor = node.child.take();
                pending.push((id, std::mem::take(&mut node.notifiers)));
            }
            pending
        };

        // Lock released: notifiers may call back into the tree.
        for (id, notifiers) in pending.into_iter().rev() {
            for notify in notifiers {
                if panic::catch_unwind(AssertUnwindSafe(notify)).is_err() {
                    warn!(context = ?id, "cancel notifier panicked, ignoring");
                }
            }
        }
    }
}
