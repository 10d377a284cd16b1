//! In-memory collection implementation.
//!
//! This module provides [`MemoryCollection`], a `RwLock`-backed implementation
//! of the [`Collection`] trait used by tests, local development, and the
//! default server wiring.
//!
//! ## Limitations
//!
//! - **No durability**: All state is lost when the process exits
//! - **Single-process only**: State is not shared across process boundaries
//!
//! Each call takes the collection lock for the duration of one document
//! operation only, which gives exactly the per-document atomicity the store
//! contract promises and nothing more.

use std::collections::{BTreeMap, HashMap};
use std::sync::{PoisonError, RwLock};

use async_trait::async_trait;

use crate::error::{Error, Result};
use crate::store::{
    Collection, Document, DocumentId, Query, Update, Versioned, WritePrecondition, WriteResult, apply_update,
};

/// Converts a lock poison error to a storage error.
fn poison_err<T>(_: PoisonError<T>) -> Error {
    Error::storage("lock poisoned")
}

#[derive(Debug)]
struct State<D: Document> {
    docs: BTreeMap<D::Id, Versioned<D>>,
    unique: HashMap<String, D::Id>,
}

/// In-memory collection for one document kind.
///
/// ## Example
///
/// ```rust,ignore
/// use skein_core::memory::MemoryCollection;
///
/// let reviews: MemoryCollection<Review> = MemoryCollection::new();
/// ```
#[derive(Debug)]
pub struct MemoryCollection<D: Document> {
    state: RwLock<State<D>>,
}

impl<D: Document> Default for MemoryCollection<D> {
    fn default() -> Self {
        Self::new()
    }
}

impl<D: Document> MemoryCollection<D> {
    /// Creates an empty collection.
    #[must_use]
    pub fn new() -> Self {
        Self {
            state: RwLock::new(State {
                docs: BTreeMap::new(),
                unique: HashMap::new(),
            }),
        }
    }

    /// Returns the number of documents currently stored.
    ///
    /// # Errors
    ///
    /// Returns an error if the lock is poisoned.
    pub fn len(&self) -> Result<usize> {
        let count = {
            let state = self.state.read().map_err(poison_err)?;
            state.docs.len()
        };
        Ok(count)
    }

    /// Returns true if the collection holds no documents.
    ///
    /// # Errors
    ///
    /// Returns an error if the lock is poisoned.
    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }
}

#[async_trait]
impl<D: Document> Collection<D> for MemoryCollection<D> {
    async fn get(&self, id: &D::Id) -> Result<Option<Versioned<D>>> {
        let result = {
            let state = self.state.read().map_err(poison_err)?;
            state.docs.get(id).cloned()
        };
        Ok(result)
    }

    async fn insert(&self, mut doc: D) -> Result<D::Id> {
        let id = D::Id::generate();
        doc.set_id(id);

        let mut state = self.state.write().map_err(poison_err)?;
        if let Some(key) = doc.unique_key() {
            if state.unique.contains_key(&key) {
                drop(state);
                return Err(Error::Duplicate {
                    collection: D::COLLECTION,
                    key,
                });
            }
            state.unique.insert(key, id);
        }
        state.docs.insert(id, Versioned { doc, version: 1 });
        drop(state);

        Ok(id)
    }

    async fn update(
        &self,
        id: &D::Id,
        update: Update<D::Patch>,
        precondition: WritePrecondition,
    ) -> Result<WriteResult> {
        let mut state = self.state.write().map_err(poison_err)?;

        let Some(current) = state.docs.get(id) else {
            drop(state);
            return Ok(WriteResult::NotFound);
        };

        if let WritePrecondition::MatchesVersion(expected) = precondition {
            if current.version != expected {
                let current_version = current.version;
                drop(state);
                return Ok(WriteResult::PreconditionFailed { current_version });
            }
        }

        if update.is_empty() {
            let version = current.version;
            drop(state);
            return Ok(WriteResult::Success { version });
        }

        // Apply to a copy so a rejected unique key leaves the stored document untouched.
        let mut next = current.doc.clone();
        let old_key = next.unique_key();
        let changed = apply_update(&mut next, update)?;
        let version = current.version;

        if !changed {
            drop(state);
            return Ok(WriteResult::Success { version });
        }

        let new_key = next.unique_key();
        if new_key != old_key {
            if let Some(key) = new_key.as_ref() {
                if state.unique.get(key).is_some_and(|owner| owner != id) {
                    let key = key.clone();
                    drop(state);
                    return Err(Error::Duplicate {
                        collection: D::COLLECTION,
                        key,
                    });
                }
            }
            if let Some(key) = old_key {
                state.unique.remove(&key);
            }
            if let Some(key) = new_key {
                state.unique.insert(key, *id);
            }
        }

        let version = version + 1;
        state.docs.insert(*id, Versioned { doc: next, version });
        drop(state);

        Ok(WriteResult::Success { version })
    }

    async fn delete(&self, id: &D::Id) -> Result<bool> {
        let mut state = self.state.write().map_err(poison_err)?;
        let Some(removed) = state.docs.remove(id) else {
            drop(state);
            return Ok(false);
        };
        if let Some(key) = removed.doc.unique_key() {
            state.unique.remove(&key);
        }
        drop(state);
        Ok(true)
    }

    async fn find(&self, query: &D::Query) -> Result<Vec<Versioned<D>>> {
        let result = {
            let state = self.state.read().map_err(poison_err)?;
            state
                .docs
                .values()
                .filter(|v| query.matches(&v.doc))
                .cloned()
                .collect()
        };
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::id::{AuthorId, ReviewId};

    #[derive(Debug, Clone, PartialEq)]
    struct Member {
        id: AuthorId,
        handle: String,
        refs: Vec<ReviewId>,
    }

    #[derive(Debug, Clone)]
    enum MemberPatch {
        Handle(String),
    }

    #[derive(Debug)]
    enum MemberQuery {
        All,
        Handle(String),
    }

    impl Query<Member> for MemberQuery {
        fn matches(&self, doc: &Member) -> bool {
            match self {
                Self::All => true,
                Self::Handle(h) => doc.handle == *h,
            }
        }
    }

    impl Document for Member {
        type Id = AuthorId;
        type Patch = MemberPatch;
        type Query = MemberQuery;
        const COLLECTION: &'static str = "members";

        fn id(&self) -> AuthorId {
            self.id
        }

        fn set_id(&mut self, id: AuthorId) {
            self.id = id;
        }

        fn apply(&mut self, patch: MemberPatch) {
            match patch {
                MemberPatch::Handle(h) => self.handle = h,
            }
        }

        fn refs_mut(&mut self) -> Option<&mut Vec<ReviewId>> {
            Some(&mut self.refs)
        }

        fn unique_key(&self) -> Option<String> {
            Some(self.handle.clone())
        }
    }

    fn member(handle: &str) -> Member {
        Member {
            id: AuthorId::generate(),
            handle: handle.to_string(),
            refs: vec![],
        }
    }

    #[tokio::test]
    async fn insert_assigns_id_and_version() -> Result<()> {
        let members = MemoryCollection::new();
        let id = members.insert(member("bob")).await?;

        let stored = members.get(&id).await?.expect("inserted");
        assert_eq!(stored.doc.id, id);
        assert_eq!(stored.version, 1);
        assert_eq!(members.len()?, 1);
        Ok(())
    }

    #[tokio::test]
    async fn duplicate_unique_key_is_rejected() -> Result<()> {
        let members = MemoryCollection::new();
        members.insert(member("bob")).await?;

        let err = members.insert(member("bob")).await.unwrap_err();
        assert!(matches!(err, Error::Duplicate { .. }));

        // Case-sensitive uniqueness.
        members.insert(member("Bob")).await?;
        assert_eq!(members.len()?, 2);
        Ok(())
    }

    #[tokio::test]
    async fn renaming_to_taken_key_fails_without_change() -> Result<()> {
        let members = MemoryCollection::new();
        members.insert(member("alice")).await?;
        let bob = members.insert(member("bob")).await?;

        let err = members
            .update_fields(&bob, vec![MemberPatch::Handle("alice".into())])
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Duplicate { .. }));

        let stored = members.get(&bob).await?.expect("bob");
        assert_eq!(stored.doc.handle, "bob");
        assert_eq!(stored.version, 1);

        // The old key is released after a successful rename.
        members
            .update_fields(&bob, vec![MemberPatch::Handle("robert".into())])
            .await?;
        members.insert(member("bob")).await?;
        Ok(())
    }

    #[tokio::test]
    async fn cas_update_detects_version_mismatch() -> Result<()> {
        let members = MemoryCollection::new();
        let id = members.insert(member("bob")).await?;
        let r = ReviewId::generate();

        let result = members
            .update(&id, Update::new().push_ref(r), WritePrecondition::MatchesVersion(1))
            .await?;
        assert_eq!(result, WriteResult::Success { version: 2 });

        let result = members
            .update(&id, Update::new().pull_ref(r), WritePrecondition::MatchesVersion(1))
            .await?;
        assert_eq!(result, WriteResult::PreconditionFailed { current_version: 2 });
        Ok(())
    }

    #[tokio::test]
    async fn noop_push_keeps_version() -> Result<()> {
        let members = MemoryCollection::new();
        let id = members.insert(member("bob")).await?;
        let r = ReviewId::generate();

        assert_eq!(members.push_ref(&id, r).await?, WriteResult::Success { version: 2 });
        assert_eq!(members.push_ref(&id, r).await?, WriteResult::Success { version: 2 });
        Ok(())
    }

    #[tokio::test]
    async fn empty_update_keeps_version_but_checks_precondition() -> Result<()> {
        let members = MemoryCollection::new();
        let id = members.insert(member("bob")).await?;

        let result = members
            .update(&id, Update::new(), WritePrecondition::MatchesVersion(1))
            .await?;
        assert_eq!(result, WriteResult::Success { version: 1 });

        let result = members
            .update(&id, Update::new(), WritePrecondition::MatchesVersion(7))
            .await?;
        assert_eq!(result, WriteResult::PreconditionFailed { current_version: 1 });
        Ok(())
    }

    #[tokio::test]
    async fn update_missing_document_is_not_found() -> Result<()> {
        let members: MemoryCollection<Member> = MemoryCollection::new();
        let result = members.push_ref(&AuthorId::generate(), ReviewId::generate()).await?;
        assert!(result.is_not_found());
        Ok(())
    }

    #[tokio::test]
    async fn delete_is_idempotent_and_releases_key() -> Result<()> {
        let members = MemoryCollection::new();
        let id = members.insert(member("bob")).await?;

        assert!(members.delete(&id).await?);
        assert!(!members.delete(&id).await?);
        assert!(members.is_empty()?);
        members.insert(member("bob")).await?;
        Ok(())
    }

    #[tokio::test]
    async fn find_returns_matches_in_insertion_order() -> Result<()> {
        let members = MemoryCollection::new();
        let a = members.insert(member("a")).await?;
        let b = members.insert(member("b")).await?;

        let all: Vec<AuthorId> = members
            .find(&MemberQuery::All)
            .await?
            .into_iter()
            .map(|v| v.doc.id)
            .collect();
        assert_eq!(all, vec![a, b]);

        let found = members.find(&MemberQuery::Handle("b".into())).await?;
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].doc.id, b);
        Ok(())
    }
}
