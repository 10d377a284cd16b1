//! The entity store: the three collections the catalog is built on.
//!
//! [`EntityStore`] bundles one [`Collection`] per document kind. It is the
//! only component that touches persistent state. Each collection offers
//! per-document atomicity and nothing wider, so the coordinator's write
//! ordering is what keeps the collections mutually consistent.

use std::fmt;

use skein_core::{Collection, MemoryCollection};

use crate::model::{Author, Listing, Review};

/// Access to the listings, authors, and reviews collections.
///
/// ## Thread Safety
///
/// Implementations are shared across every concurrent request as
/// `Arc<dyn EntityStore>`.
pub trait EntityStore: Send + Sync + 'static {
    /// The listings collection.
    fn listings(&self) -> &dyn Collection<Listing>;

    /// The authors collection. Author handles are a unique key.
    fn authors(&self) -> &dyn Collection<Author>;

    /// The reviews collection.
    fn reviews(&self) -> &dyn Collection<Review>;
}

/// In-memory entity store for tests and single-process deployments.
#[derive(Default)]
pub struct InMemoryEntityStore {
    listings: MemoryCollection<Listing>,
    authors: MemoryCollection<Author>,
    reviews: MemoryCollection<Review>,
}

impl InMemoryEntityStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl fmt::Debug for InMemoryEntityStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InMemoryEntityStore")
            .field("listings", &self.listings.len().unwrap_or_default())
            .field("authors", &self.authors.len().unwrap_or_default())
            .field("reviews", &self.reviews.len().unwrap_or_default())
            .finish()
    }
}

impl EntityStore for InMemoryEntityStore {
    fn listings(&self) -> &dyn Collection<Listing> {
        &self.listings
    }

    fn authors(&self) -> &dyn Collection<Author> {
        &self.authors
    }

    fn reviews(&self) -> &dyn Collection<Review> {
        &self.reviews
    }
}
