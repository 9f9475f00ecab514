//! Primitive Registry
//!
//! Ordered, name-keyed collections of the three server primitives
//! (tools, prompts, resources) shared by every session a host serves.
//!
//! Collections are read-mostly: list operations take a snapshot of the
//! current ordered view and paginate against it, so a mutation during
//! a paged listing may produce duplicates or gaps but never a corrupted
//! stream. Every mutation bumps a revision counter and emits a change
//! event that sessions forward as `notifications/*/list_changed` when
//! the corresponding capability was negotiated.

// Layer 1: Standard library imports
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};

// Layer 2: Third-party crate imports
use thiserror::Error;
use tokio::sync::broadcast;

// Layer 3: Internal module imports
use crate::protocol::{Cursor, ProtocolError, RpcError};

pub mod filter;
pub mod prompt;
pub mod resource;
pub mod schema;
pub mod tool;

pub use filter::{FilterChain, Next, RequestFilter};
pub use prompt::{PromptHandler, RegisteredPrompt};
pub use resource::{RegisteredResource, ResourceHandler, UriTemplate};
pub use schema::{output_schema_for, SchemaError, SchemaValidator};
pub use tool::{RegisteredTool, ToolBuilder, ToolError, ToolHandler, ToolOutput};

/// Which primitive collection changed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PrimitiveKind {
    /// The tool collection
    Tool,
    /// The prompt collection
    Prompt,
    /// The resource collection
    Resource,
}

impl fmt::Display for PrimitiveKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PrimitiveKind::Tool => "tool",
            PrimitiveKind::Prompt => "prompt",
            PrimitiveKind::Resource => "resource",
        };
        write!(f, "{name}")
    }
}

/// Registry-level failures
#[derive(Debug, Clone, Error)]
pub enum RegistryError {
    /// A primitive with this name is already registered
    #[error("A {kind} named {name:?} is already registered")]
    DuplicateName { kind: PrimitiveKind, name: String },

    /// A schema attached to the registration failed to compile
    #[error(transparent)]
    InvalidSchema(#[from] SchemaError),
}

/// Anything storable in a [`PrimitiveCollection`]
pub trait Primitive: Send + Sync + 'static {
    /// The unique name the primitive is addressed by
    fn name(&self) -> &str;
}

/// Ordered, name-keyed primitive collection with change notifications
///
/// Insertion order is observable: it is the order list operations and
/// pagination cursors run over.
pub struct PrimitiveCollection<T: Primitive> {
    entries: RwLock<Vec<Arc<T>>>,
    revision: AtomicU64,
    changes: broadcast::Sender<PrimitiveKind>,
    kind: PrimitiveKind,
}

impl<T: Primitive> PrimitiveCollection<T> {
    /// Create an empty collection of the given kind
    pub fn new(kind: PrimitiveKind) -> Self {
        let (changes, _) = broadcast::channel(16);
        Self {
            entries: RwLock::new(Vec::new()),
            revision: AtomicU64::new(0),
            changes,
            kind,
        }
    }

    /// Add a primitive; names must be unique
    ///
    /// # Errors
    ///
    /// Returns `RegistryError::DuplicateName` when the name is taken.
    pub fn add(&self, item: T) -> Result<(), RegistryError> {
        {
            let mut entries = self
                .entries
                .write()
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            if entries.iter().any(|existing| existing.name() == item.name()) {
                return Err(RegistryError::DuplicateName {
                    kind: self.kind,
                    name: item.name().to_string(),
                });
            }
            entries.push(Arc::new(item));
        }
        self.notify_changed();
        Ok(())
    }

    /// Remove a primitive by name
    pub fn remove(&self, name: &str) -> Option<Arc<T>> {
        let removed = {
            let mut entries = self
                .entries
                .write()
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            let index = entries.iter().position(|item| item.name() == name)?;
            Some(entries.remove(index))
        };
        self.notify_changed();
        removed
    }

    /// Replace a primitive in place, preserving its position
    ///
    /// Returns `false` (and registers nothing) when no primitive with
    /// that name exists.
    pub fn update(&self, item: T) -> bool {
        let updated = {
            let mut entries = self
                .entries
                .write()
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            match entries.iter().position(|existing| existing.name() == item.name()) {
                Some(index) => {
                    entries[index] = Arc::new(item);
                    true
                }
                None => false,
            }
        };
        if updated {
            self.notify_changed();
        }
        updated
    }

    /// Look up a primitive by name
    pub fn get(&self, name: &str) -> Option<Arc<T>> {
        self.entries
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .iter()
            .find(|item| item.name() == name)
            .cloned()
    }

    /// Clone the current ordered view
    ///
    /// List operations paginate against one snapshot, unaffected by
    /// concurrent mutation.
    pub fn snapshot(&self) -> Vec<Arc<T>> {
        self.entries
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    /// Number of registered primitives
    pub fn len(&self) -> usize {
        self.entries
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .len()
    }

    /// Whether the collection is empty
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Mutation counter; bumps on every add/remove/update
    pub fn revision(&self) -> u64 {
        self.revision.load(Ordering::SeqCst)
    }

    /// Subscribe to change events for this collection
    pub fn subscribe_changes(&self) -> broadcast::Receiver<PrimitiveKind> {
        self.changes.subscribe()
    }

    fn notify_changed(&self) {
        self.revision.fetch_add(1, Ordering::SeqCst);
        // No receivers is fine; sessions subscribe lazily.
        let _ = self.changes.send(self.kind);
    }
}

impl<T: Primitive> fmt::Debug for PrimitiveCollection<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PrimitiveCollection")
            .field("kind", &self.kind)
            .field("len", &self.len())
            .field("revision", &self.revision())
            .finish()
    }
}

/// Slice one page out of a snapshot
///
/// The cursor encodes the start index into the snapshot's order; the
/// returned cursor points at the next page, or `None` on the last.
///
/// # Errors
///
/// Returns `InvalidParams` for cursors this registry never issued.
pub fn paginate<T>(
    snapshot: &[Arc<T>],
    cursor: Option<&Cursor>,
    page_size: usize,
) -> Result<(Vec<Arc<T>>, Option<Cursor>), RpcError> {
    let start = match cursor {
        None => 0,
        Some(cursor) => cursor.to_index().map_err(|error| match error {
            ProtocolError::InvalidCursor(token) => {
                RpcError::invalid_params(format!("invalid cursor: {token}"))
            }
            other => RpcError::invalid_params(other.to_string()),
        })?,
    };

    // A start past the end yields an empty final page rather than an
    // error; the registry may have shrunk since the cursor was issued.
    let end = start.saturating_add(page_size).min(snapshot.len());
    let page: Vec<Arc<T>> = snapshot
        .get(start.min(snapshot.len())..end)
        .unwrap_or(&[])
        .to_vec();
    let next_cursor = if end < snapshot.len() {
        Some(Cursor::from_index(end))
    } else {
        None
    };
    Ok((page, next_cursor))
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Named(&'static str);

    impl Primitive for Named {
        fn name(&self) -> &str {
            self.0
        }
    }

    fn collection_of(names: &[&'static str]) -> PrimitiveCollection<Named> {
        let collection = PrimitiveCollection::new(PrimitiveKind::Tool);
        for name in names {
            collection.add(Named(name)).unwrap();
        }
        collection
    }

    #[test]
    fn insertion_order_is_preserved() {
        let collection = collection_of(&["c", "a", "b"]);
        let snapshot = collection.snapshot();
        let order: Vec<&str> = snapshot.iter().map(|i| i.name()).collect();
        assert_eq!(order, vec!["c", "a", "b"]);
    }

    #[test]
    fn duplicate_names_are_rejected() {
        let collection = collection_of(&["a"]);
        assert!(matches!(
            collection.add(Named("a")),
            Err(RegistryError::DuplicateName { .. })
        ));
        assert_eq!(collection.len(), 1);
    }

    #[test]
    fn update_preserves_position() {
        let collection = collection_of(&["a", "b", "c"]);
        assert!(collection.update(Named("b")));
        let snapshot = collection.snapshot();
        let order: Vec<&str> = snapshot.iter().map(|i| i.name()).collect();
        assert_eq!(order, vec!["a", "b", "c"]);
        assert!(!collection.update(Named("zzz")));
    }

    #[test]
    fn revision_bumps_on_every_mutation() {
        let collection = collection_of(&["a"]);
        let before = collection.revision();
        collection.add(Named("b")).unwrap();
        collection.remove("a");
        collection.update(Named("b"));
        assert_eq!(collection.revision(), before + 3);
    }

    #[tokio::test]
    async fn mutations_emit_change_events() {
        let collection = PrimitiveCollection::new(PrimitiveKind::Prompt);
        let mut changes = collection.subscribe_changes();
        collection.add(Named("p")).unwrap();
        assert_eq!(changes.recv().await.unwrap(), PrimitiveKind::Prompt);
    }

    #[test]
    fn pagination_walks_the_snapshot() {
        let collection = collection_of(&["a", "b", "c", "d", "e"]);
        let snapshot = collection.snapshot();

        let (first, cursor) = paginate(&snapshot, None, 2).unwrap();
        assert_eq!(first.len(), 2);
        let cursor = cursor.unwrap();

        let (second, cursor) = paginate(&snapshot, Some(&cursor), 2).unwrap();
        assert_eq!(second[0].name(), "c");
        let cursor = cursor.unwrap();

        let (last, cursor) = paginate(&snapshot, Some(&cursor), 2).unwrap();
        assert_eq!(last.len(), 1);
        assert!(cursor.is_none());
    }

    #[test]
    fn foreign_cursor_is_invalid_params() {
        let snapshot = collection_of(&["a"]).snapshot();
        let bogus = Cursor::from_index(0);
        // A cursor past the end is a valid empty page, not an error.
        let far = Cursor::from_index(10);
        assert!(paginate(&snapshot, Some(&far), 2).unwrap().0.is_empty());
        assert!(paginate(&snapshot, Some(&bogus), 2).is_ok());

        let garbage: Cursor = serde_json::from_value(serde_json::json!("!!!")).unwrap();
        assert!(matches!(
            paginate(&snapshot, Some(&garbage), 2),
            Err(RpcError::InvalidParams { .. })
        ));
    }
}
