//! Request-scoped identity storage.
//!
//! Each request gets an opaque [`RequestHandle`] from the gate. The handle
//! indexes a shared table; the entry lives exactly as long as the request's
//! [`IdentityScope`] and is removed on every exit path (normal return, error,
//! panic or cancellation) because removal happens in `Drop`.
//!
//! ```text
//! Empty --set()--> Set(user) --scope dropped--> (gone)
//! ```

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock};

use crate::auth::identity::AuthenticatedUser;

/// Identifier of one request's context entry. Never reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RequestId(u64);

impl RequestId {
    pub fn as_u64(self) -> u64 {
        self.0
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "req-{}", self.0)
    }
}

/// Errors from reading or writing a request context.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ContextError {
    /// The current request carries no authenticated user.
    NoAuthenticatedUser,
    /// The context for this request was already set once.
    AlreadySet,
    /// The request's scope has ended.
    Closed,
}

impl fmt::Display for ContextError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NoAuthenticatedUser => write!(f, "No authenticated user in this context"),
            Self::AlreadySet => write!(f, "Request context is already set"),
            Self::Closed => write!(f, "Request context is closed"),
        }
    }
}

impl std::error::Error for ContextError {}

#[derive(Debug)]
enum Slot {
    Empty,
    Set(Arc<AuthenticatedUser>),
}

#[derive(Debug, Default)]
struct Table {
    next_id: AtomicU64,
    entries: RwLock<HashMap<RequestId, Slot>>,
}

/// Shared table of live request contexts.
#[derive(Debug, Clone, Default)]
pub struct IdentityContexts {
    table: Arc<Table>,
}

impl IdentityContexts {
    pub fn new() -> Self {
        Self::default()
    }

    /// Open an `Empty` context for a new request.
    pub fn open(&self) -> IdentityScope {
        let id = RequestId(self.table.next_id.fetch_add(1, Ordering::Relaxed));
        self.table
            .entries
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(id, Slot::Empty);
        IdentityScope {
            handle: RequestHandle {
                id,
                table: Arc::clone(&self.table),
            },
        }
    }

    /// Open a context that is already `Set`.
    pub fn open_authenticated(&self, user: AuthenticatedUser) -> IdentityScope {
        let scope = self.open();
        // A freshly opened entry is always Empty.
        let _ = scope.set(user);
        scope
    }

    /// Number of contexts currently open.
    pub fn active(&self) -> usize {
        self.table
            .entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

/// Opaque per-request handle. Cheap to clone; stops resolving once the
/// request's scope ends.
#[derive(Clone)]
pub struct RequestHandle {
    id: RequestId,
    table: Arc<Table>,
}

impl RequestHandle {
    pub fn id(&self) -> RequestId {
        self.id
    }

    /// The authenticated user of this request.
    pub fn current_user(&self) -> Result<Arc<AuthenticatedUser>, ContextError> {
        let entries = self
            .table
            .entries
            .read()
            .unwrap_or_else(PoisonError::into_inner);
        match entries.get(&self.id) {
            Some(Slot::Set(user)) => Ok(Arc::clone(user)),
            _ => Err(ContextError::NoAuthenticatedUser),
        }
    }

    /// Like [`current_user`](Self::current_user) but for optional-auth code paths.
    pub fn try_current_user(&self) -> Option<Arc<AuthenticatedUser>> {
        self.current_user().ok()
    }

    pub fn is_authenticated(&self) -> bool {
        self.try_current_user().is_some()
    }

    /// Look up the handle the gate stored in request extensions.
    pub fn from_extensions(extensions: &http::Extensions) -> Option<Self> {
        extensions.get::<Self>().cloned()
    }
}

impl fmt::Debug for RequestHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("RequestHandle").field(&self.id).finish()
    }
}

/// Owns one request's context entry and removes it when dropped.
pub struct IdentityScope {
    handle: RequestHandle,
}

impl IdentityScope {
    pub fn handle(&self) -> RequestHandle {
        self.handle.clone()
    }

    pub fn id(&self) -> RequestId {
        self.handle.id
    }

    /// Transition `Empty -> Set(user)`. Allowed once.
    pub fn set(&self, user: AuthenticatedUser) -> Result<(), ContextError> {
        let mut entries = self
            .handle
            .table
            .entries
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        match entries.get_mut(&self.handle.id) {
            Some(slot @ Slot::Empty) => {
                *slot = Slot::Set(Arc::new(user));
                Ok(())
            }
            Some(Slot::Set(_)) => Err(ContextError::AlreadySet),
            None => Err(ContextError::Closed),
        }
    }
}

impl fmt::Debug for IdentityScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("IdentityScope").field(&self.handle.id).finish()
    }
}

impl Drop for IdentityScope {
    fn drop(&mut self) {
        self.handle
            .table
            .entries
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&self.handle.id);
    }
}
