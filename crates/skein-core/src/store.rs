//! Document store contract.
//!
//! This module defines the persistence contract that the catalog's consistency
//! protocol is written against. The contract deliberately offers atomicity
//! **per document only**:
//!
//! - Read, insert, and delete of a single document
//! - A combined [`Update`] (field assignments plus back-reference push/pull)
//!   applied atomically to one document
//! - Optional compare-and-swap on the document version via [`WritePrecondition`]
//!
//! There is no cross-document transaction. Callers that keep denormalized
//! back-references in sync across documents must order their writes so that
//! every intermediate state is detectable and repairable.
//!
//! ## Back-references
//!
//! A document may own one back-reference array of [`ReviewId`]s. Push is
//! idempotent (pushing a present id is a no-op) and pull removes every
//! occurrence, so retried writes never duplicate or resurrect an entry.

use std::fmt;
use std::hash::Hash;

use async_trait::async_trait;

use crate::error::Result;
use crate::id::{AuthorId, ListingId, ReviewId};

/// Identifier type usable as a document key.
///
/// Keys sort by creation time, so iterating a collection in key order is
/// iterating it in insertion order.
pub trait DocumentId:
    Copy + Eq + Ord + Hash + fmt::Display + fmt::Debug + Send + Sync + 'static
{
    /// Generates a fresh, globally unique key.
    fn generate() -> Self;
}

impl DocumentId for ListingId {
    fn generate() -> Self {
        ListingId::generate()
    }
}

impl DocumentId for AuthorId {
    fn generate() -> Self {
        AuthorId::generate()
    }
}

impl DocumentId for ReviewId {
    fn generate() -> Self {
        ReviewId::generate()
    }
}

/// A document stored in a [`Collection`].
pub trait Document: Clone + Send + Sync + 'static {
    /// Key type, assigned by the store at insert time.
    type Id: DocumentId;

    /// A single field assignment that may be applied by [`Update`].
    type Patch: Clone + fmt::Debug + Send + Sync + 'static;

    /// Typed query over the collection.
    type Query: Query<Self>;

    /// Collection name, used in errors and logs.
    const COLLECTION: &'static str;

    /// Returns the document key.
    fn id(&self) -> Self::Id;

    /// Sets the document key. Called exactly once by the store on insert.
    fn set_id(&mut self, id: Self::Id);

    /// Applies one field assignment.
    fn apply(&mut self, patch: Self::Patch);

    /// Returns the back-reference array, if this document kind has one.
    fn refs_mut(&mut self) -> Option<&mut Vec<ReviewId>> {
        None
    }

    /// Returns the unique key of this document, if its collection enforces one.
    fn unique_key(&self) -> Option<String> {
        None
    }
}

/// A predicate over documents of kind `D`.
pub trait Query<D>: fmt::Debug + Send + Sync {
    /// Returns true if the document matches.
    fn matches(&self, doc: &D) -> bool;
}

/// A document together with its current version.
#[derive(Debug, Clone, PartialEq)]
pub struct Versioned<D> {
    /// The document body.
    pub doc: D,
    /// Monotonically increasing version, bumped by every effective write.
    pub version: u64,
}

/// Precondition for conditional writes (CAS operations).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WritePrecondition {
    /// Write unconditionally.
    None,
    /// Write only if the document's version matches.
    MatchesVersion(u64),
}

/// Result of an update.
///
/// Precondition failure and a missing document are normal results, not errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteResult {
    /// Write succeeded (or was an idempotent no-op); returns the version after it.
    Success {
        /// The document version after the write.
        version: u64,
    },
    /// Precondition failed, returns the current version.
    PreconditionFailed {
        /// The version that caused the precondition to fail.
        current_version: u64,
    },
    /// No document with the given key exists.
    NotFound,
}

impl WriteResult {
    /// Returns true if the write was applied.
    #[must_use]
    pub const fn is_success(&self) -> bool {
        matches!(self, Self::Success { .. })
    }

    /// Returns true if the document does not exist.
    #[must_use]
    pub const fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound)
    }
}

/// An atomic single-document update.
///
/// Field assignments are applied first, then pulls, then pushes. All parts
/// become visible together.
#[derive(Debug, Clone)]
pub struct Update<P> {
    /// Field assignments.
    pub fields: Vec<P>,
    /// Back-references to append (skipped when already present).
    pub push_refs: Vec<ReviewId>,
    /// Back-references to remove (all occurrences).
    pub pull_refs: Vec<ReviewId>,
}

impl<P> Default for Update<P> {
    fn default() -> Self {
        Self {
            fields: Vec::new(),
            push_refs: Vec::new(),
            pull_refs: Vec::new(),
        }
    }
}

impl<P> Update<P> {
    /// Creates an empty update.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a field assignment.
    #[must_use]
    pub fn set(mut self, patch: P) -> Self {
        self.fields.push(patch);
        self
    }

    /// Adds a back-reference push.
    #[must_use]
    pub fn push_ref(mut self, review: ReviewId) -> Self {
        self.push_refs.push(review);
        self
    }

    /// Adds a back-reference pull.
    #[must_use]
    pub fn pull_ref(mut self, review: ReviewId) -> Self {
        self.pull_refs.push(review);
        self
    }

    /// Returns true if the update changes nothing.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty() && self.push_refs.is_empty() && self.pull_refs.is_empty()
    }

    /// Returns true if the update touches the back-reference array.
    #[must_use]
    pub fn touches_refs(&self) -> bool {
        !self.push_refs.is_empty() || !self.pull_refs.is_empty()
    }
}

/// Applies an update to a document in place.
///
/// Returns true if the document changed. Implementations of [`Collection`]
/// call this under their per-document lock.
///
/// # Errors
///
/// Returns `Error::InvalidInput` if the update pushes or pulls references on a
/// document kind without a back-reference array.
pub fn apply_update<D: Document>(doc: &mut D, update: Update<D::Patch>) -> Result<bool> {
    let touches_refs = update.touches_refs();
    let Update {
        fields,
        push_refs,
        pull_refs,
    } = update;

    let mut changed = !fields.is_empty();
    for patch in fields {
        doc.apply(patch);
    }

    if !touches_refs {
        return Ok(changed);
    }

    let Some(refs) = doc.refs_mut() else {
        return Err(crate::Error::InvalidInput(format!(
            "{} documents have no back-reference array",
            D::COLLECTION
        )));
    };

    for review in pull_refs {
        let before = refs.len();
        refs.retain(|r| *r != review);
        changed |= refs.len() != before;
    }
    for review in push_refs {
        if !refs.contains(&review) {
            refs.push(review);
            changed = true;
        }
    }

    Ok(changed)
}

/// A collection of documents with per-document atomic primitives.
///
/// ## Thread Safety
///
/// All methods are `Send + Sync`; concurrent requests share collections
/// without any lock wider than one document.
#[async_trait]
pub trait Collection<D: Document>: Send + Sync {
    /// Gets a document by key.
    ///
    /// Returns `None` if the document does not exist.
    async fn get(&self, id: &D::Id) -> Result<Option<Versioned<D>>>;

    /// Inserts a new document, assigning its key.
    ///
    /// Returns `Error::Duplicate` if the document's unique key is taken.
    async fn insert(&self, doc: D) -> Result<D::Id>;

    /// Applies an update atomically to one document.
    async fn update(
        &self,
        id: &D::Id,
        update: Update<D::Patch>,
        precondition: WritePrecondition,
    ) -> Result<WriteResult>;

    /// Deletes a document.
    ///
    /// Returns false if it did not exist (idempotent).
    async fn delete(&self, id: &D::Id) -> Result<bool>;

    /// Returns matching documents ordered by key (creation order).
    async fn find(&self, query: &D::Query) -> Result<Vec<Versioned<D>>>;

    /// Sets fields unconditionally.
    async fn update_fields(&self, id: &D::Id, fields: Vec<D::Patch>) -> Result<WriteResult> {
        let update = fields.into_iter().fold(Update::new(), Update::set);
        self.update(id, update, WritePrecondition::None).await
    }

    /// Appends a back-reference (no-op when already present).
    async fn push_ref(&self, id: &D::Id, review: ReviewId) -> Result<WriteResult> {
        self.update(id, Update::new().push_ref(review), WritePrecondition::None)
            .await
    }

    /// Removes every occurrence of a back-reference (no-op when absent).
    async fn pull_ref(&self, id: &D::Id, review: ReviewId) -> Result<WriteResult> {
        self.update(id, Update::new().pull_ref(review), WritePrecondition::None)
            .await
    }
}
