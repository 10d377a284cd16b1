//! Catalog operations.
//!
//! [`Catalog`] is the operation surface the API layer calls. Listing and
//! author operations are implemented here directly; review mutations are
//! delegated to the [`ReviewCoordinator`], which is the only writer of
//! back-references and averages.

use std::collections::HashSet;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::Instrument;

use skein_core::observability::catalog_span;
use skein_core::store::Document;
use skein_core::{AuthorId, ListingId, ReviewId, WriteResult};

use crate::auth::Principal;
use crate::coordinator::{CoordinatorOptions, ReviewCoordinator};
use crate::error::{CatalogError, Result};
use crate::guard::require_owner;
use crate::model::{
    Author, AuthorPatch, AuthorQuery, Handle, Listing, ListingQuery, NewListing, NewReview,
    Review, ReviewEdit, ReviewQuery,
};
use crate::store::EntityStore;

/// A listing as shown in list views.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ListingSummary {
    /// Listing ID.
    pub id: ListingId,
    /// Product name.
    pub name: String,
    /// Colorway.
    pub color: String,
    /// Weight class.
    pub weight: String,
    /// Brand, if known.
    pub brand: Option<String>,
    /// First image reference, if any.
    pub image_url: Option<String>,
    /// Mean rating over linked reviews.
    pub average_rating: f64,
    /// Number of linked reviews.
    pub review_count: usize,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
}

impl From<&Listing> for ListingSummary {
    fn from(listing: &Listing) -> Self {
        Self {
            id: listing.id,
            name: listing.name.clone(),
            color: listing.color.clone(),
            weight: listing.weight.clone(),
            brand: listing.brand.clone(),
            image_url: listing.image_urls.first().cloned(),
            average_rating: listing.average_rating,
            review_count: listing.review_count(),
            created_at: listing.created_at,
        }
    }
}

/// Changes to an author's account. Omitted fields keep their value.
#[derive(Debug, Clone, Default)]
pub struct AuthorUpdate {
    /// New handle (validated, must be unique).
    pub handle: Option<String>,
    /// New credential digest.
    pub credential: Option<String>,
}

/// The catalog operation surface.
#[derive(Clone)]
pub struct Catalog {
    store: Arc<dyn EntityStore>,
    coordinator: ReviewCoordinator,
}

impl std::fmt::Debug for Catalog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Catalog")
            .field("coordinator", &self.coordinator)
            .finish_non_exhaustive()
    }
}

impl Catalog {
    /// Creates a catalog over a store.
    #[must_use]
    pub fn new(store: Arc<dyn EntityStore>, options: CoordinatorOptions) -> Self {
        let coordinator = ReviewCoordinator::new(Arc::clone(&store), options);
        Self { store, coordinator }
    }

    /// Returns the underlying store.
    #[must_use]
    pub fn store(&self) -> &Arc<dyn EntityStore> {
        &self.store
    }

    /// Returns the review coordinator.
    #[must_use]
    pub fn coordinator(&self) -> &ReviewCoordinator {
        &self.coordinator
    }

    // ------------------------------------------------------------------------
    // Authors
    // ------------------------------------------------------------------------

    /// Registers a new author.
    ///
    /// `credential` is an opaque digest produced by the caller; the catalog
    /// stores it and never returns it.
    ///
    /// # Errors
    ///
    /// - `ValidationFailed` if the handle is empty, too long, or not alphanumeric
    /// - `Conflict` if the handle is taken
    pub async fn register_author(&self, handle: &str, credential: String) -> Result<Author> {
        let handle = Handle::parse(handle).map_err(|e| CatalogError::validation(e.to_string()))?;
        if credential.is_empty() {
            return Err(CatalogError::validation("credential is required"));
        }

        let mut author = Author {
            id: AuthorId::generate(),
            handle,
            credential,
            review_refs: Vec::new(),
            created_at: Utc::now(),
        };

        let id = self
            .store
            .authors()
            .insert(author.clone())
            .instrument(catalog_span("register_author", "author"))
            .await?;
        author.id = id;

        tracing::info!(author_id = %id, handle = %author.handle, "author registered");
        Ok(author)
    }

    /// Changes an author's handle and/or credential.
    ///
    /// # Errors
    ///
    /// - `ValidationFailed` for an empty update or an invalid handle
    /// - `NotFound` if the author does not exist
    /// - `Unauthorized` if `acting` is a different author
    /// - `Conflict` if the new handle is taken
    pub async fn update_author(
        &self,
        acting: &Principal,
        author_id: AuthorId,
        update: AuthorUpdate,
    ) -> Result<Author> {
        let mut patches = Vec::with_capacity(2);
        if let Some(handle) = update.handle {
            let handle =
                Handle::parse(handle).map_err(|e| CatalogError::validation(e.to_string()))?;
            patches.push(AuthorPatch::Handle(handle));
        }
        if let Some(credential) = update.credential {
            if credential.is_empty() {
                return Err(CatalogError::validation("credential cannot be empty"));
            }
            patches.push(AuthorPatch::Credential(credential));
        }
        if patches.is_empty() {
            return Err(CatalogError::validation(
                "update must change the handle or the credential",
            ));
        }

        let mut author = self.get_author(author_id).await?;
        require_owner(acting, author.id, "update this account")?;

        match self
            .store
            .authors()
            .update_fields(&author_id, patches.clone())
            .instrument(catalog_span("update_author", "author"))
            .await?
        {
            WriteResult::Success { .. } => {}
            _ => return Err(CatalogError::not_found("author", author_id)),
        }

        for patch in patches {
            author.apply(patch);
        }
        tracing::info!(author_id = %author_id, "author updated");
        Ok(author)
    }

    /// Gets an author by ID.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if the author does not exist.
    pub async fn get_author(&self, author_id: AuthorId) -> Result<Author> {
        self.store
            .authors()
            .get(&author_id)
            .await?
            .map(|v| v.doc)
            .ok_or_else(|| CatalogError::not_found("author", author_id))
    }

    /// Finds an author by exact handle.
    ///
    /// # Errors
    ///
    /// Returns `StoreUnavailable` if the lookup fails. A malformed handle
    /// matches nobody.
    pub async fn find_author_by_handle(&self, handle: &str) -> Result<Option<Author>> {
        let Ok(handle) = Handle::parse(handle) else {
            return Ok(None);
        };
        let found = self.store.authors().find(&AuthorQuery::Handle(handle)).await?;
        Ok(found.into_iter().next().map(|v| v.doc))
    }

    // ------------------------------------------------------------------------
    // Listings
    // ------------------------------------------------------------------------

    /// Creates a listing owned by the acting author.
    ///
    /// The listing starts with no reviews and an average rating of 0.
    ///
    /// # Errors
    ///
    /// - `ValidationFailed` if a required field is blank or no material is given
    /// - `NotFound` if the acting author does not exist
    pub async fn create_listing(&self, acting: &Principal, new: NewListing) -> Result<Listing> {
        let name = required("name", new.name)?;
        let color = required("color", new.color)?;
        let weight = required("weight", new.weight)?;
        let hook = required("hook_size", new.hook_size)?;
        let needle = required("needle_size", new.needle_size)?;
        let materials: Vec<String> = new
            .materials
            .into_iter()
            .map(|m| m.trim().to_string())
            .filter(|m| !m.is_empty())
            .collect();
        if materials.is_empty() {
            return Err(CatalogError::validation("at least one material is required"));
        }

        self.get_author(acting.author_id).await?;

        let mut listing = Listing {
            id: ListingId::generate(),
            name,
            color,
            weight,
            brand: new.brand.filter(|b| !b.trim().is_empty()),
            recommended_hook_size: hook,
            recommended_needle_size: needle,
            materials,
            image_urls: new.image_urls,
            average_rating: 0.0,
            review_refs: Vec::new(),
            owner_ref: acting.author_id,
            created_at: Utc::now(),
        };

        let id = self
            .store
            .listings()
            .insert(listing.clone())
            .instrument(catalog_span("create_listing", "listing"))
            .await?;
        listing.id = id;

        tracing::info!(listing_id = %id, owner = %acting.author_id, "listing created");
        Ok(listing)
    }

    /// Gets a listing by ID.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if the listing does not exist.
    pub async fn get_listing(&self, listing_id: ListingId) -> Result<Listing> {
        self.store
            .listings()
            .get(&listing_id)
            .await?
            .map(|v| v.doc)
            .ok_or_else(|| CatalogError::not_found("listing", listing_id))
    }

    /// Lists all listings as summaries, oldest first.
    ///
    /// # Errors
    ///
    /// Returns `StoreUnavailable` if the scan fails.
    pub async fn list_listings(&self) -> Result<Vec<ListingSummary>> {
        let listings = self.store.listings().find(&ListingQuery::All).await?;
        Ok(listings.iter().map(|v| ListingSummary::from(&v.doc)).collect())
    }

    /// Lists the listings posted by one author, oldest first.
    ///
    /// An unknown author simply owns nothing.
    ///
    /// # Errors
    ///
    /// Returns `StoreUnavailable` if the scan fails.
    pub async fn listings_owned_by(&self, owner: AuthorId) -> Result<Vec<ListingSummary>> {
        let listings = self
            .store
            .listings()
            .find(&ListingQuery::OwnedBy(owner))
            .await?;
        Ok(listings.iter().map(|v| ListingSummary::from(&v.doc)).collect())
    }

    // ------------------------------------------------------------------------
    // Reviews
    // ------------------------------------------------------------------------

    /// Gets a review by ID.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if the review does not exist.
    pub async fn get_review(&self, review_id: ReviewId) -> Result<Review> {
        self.store
            .reviews()
            .get(&review_id)
            .await?
            .map(|v| v.doc)
            .ok_or_else(|| CatalogError::not_found("review", review_id))
    }

    /// Returns the reviews linked from a listing, newest first.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if the listing does not exist.
    pub async fn reviews_for_listing(&self, listing_id: ListingId) -> Result<Vec<Review>> {
        let listing = self.get_listing(listing_id).await?;
        let linked: HashSet<ReviewId> = listing.review_refs.into_iter().collect();
        self.linked_reviews(&ReviewQuery::ForListing(listing_id), &linked)
            .await
    }

    /// Returns the reviews linked from an author, newest first.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if the author does not exist.
    pub async fn reviews_by_author(&self, author_id: AuthorId) -> Result<Vec<Review>> {
        let author = self.get_author(author_id).await?;
        let linked: HashSet<ReviewId> = author.review_refs.into_iter().collect();
        self.linked_reviews(&ReviewQuery::ByAuthor(author_id), &linked)
            .await
    }

    async fn linked_reviews(
        &self,
        query: &ReviewQuery,
        linked: &HashSet<ReviewId>,
    ) -> Result<Vec<Review>> {
        let mut reviews: Vec<Review> = self
            .store
            .reviews()
            .find(query)
            .await?
            .into_iter()
            .map(|v| v.doc)
            .filter(|r| linked.contains(&r.id))
            .collect();
        reviews.reverse();
        Ok(reviews)
    }

    /// Creates a review. See [`ReviewCoordinator::create_review`].
    ///
    /// # Errors
    ///
    /// See [`ReviewCoordinator::create_review`].
    pub async fn create_review(&self, acting: &Principal, new: NewReview) -> Result<Review> {
        self.coordinator.create_review(acting, new).await
    }

    /// Edits a review. See [`ReviewCoordinator::edit_review`].
    ///
    /// # Errors
    ///
    /// See [`ReviewCoordinator::edit_review`].
    pub async fn edit_review(
        &self,
        review_id: ReviewId,
        acting: &Principal,
        edit: ReviewEdit,
    ) -> Result<Review> {
        self.coordinator.edit_review(review_id, acting, edit).await
    }

    /// Deletes a review. See [`ReviewCoordinator::delete_review`].
    ///
    /// # Errors
    ///
    /// See [`ReviewCoordinator::delete_review`].
    pub async fn delete_review(&self, review_id: ReviewId, acting: &Principal) -> Result<()> {
        self.coordinator.delete_review(review_id, acting).await
    }
}

fn required(field: &str, value: String) -> Result<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(CatalogError::validation(format!("{field} is required")));
    }
    Ok(trimmed.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::store::InMemoryEntityStore;

    fn catalog() -> Catalog {
        Catalog::new(Arc::new(InMemoryEntityStore::new()), CoordinatorOptions::default())
    }

    fn worsted() -> NewListing {
        NewListing {
            name: "Cascade 220".into(),
            color: "Ruby".into(),
            weight: "worsted".into(),
            brand: Some("Cascade".into()),
            hook_size: "5mm".into(),
            needle_size: "4.5mm".into(),
            materials: vec!["wool".into()],
            image_urls: vec![],
        }
    }

    #[tokio::test]
    async fn register_rejects_bad_handles() {
        let catalog = catalog();
        let err = catalog.register_author("bob!", "x$y".into()).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ValidationFailed);

        catalog.register_author("bob", "x$y".into()).await.unwrap();
        let err = catalog.register_author("bob", "x$z".into()).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Conflict);
    }

    #[tokio::test]
    async fn new_listing_starts_empty() {
        let catalog = catalog();
        let owner = catalog.register_author("ann", "x$y".into()).await.unwrap();
        let listing = catalog
            .create_listing(&Principal::new(owner.id), worsted())
            .await
            .unwrap();
        assert!(listing.average_rating.abs() < f64::EPSILON);
        assert!(listing.review_refs.is_empty());
        assert_eq!(catalog.get_listing(listing.id).await.unwrap(), listing);

        let summaries = catalog.list_listings().await.unwrap();
        assert_eq!(summaries.len(), 1);
        assert_eq!(summaries[0].review_count, 0);
    }

    #[tokio::test]
    async fn owner_filter_lists_only_their_listings() {
        let catalog = catalog();
        let ann = catalog.register_author("ann", "x$y".into()).await.unwrap();
        let bob = catalog.register_author("bob", "x$y".into()).await.unwrap();
        let mine = catalog
            .create_listing(&Principal::new(ann.id), worsted())
            .await
            .unwrap();
        catalog
            .create_listing(&Principal::new(bob.id), worsted())
            .await
            .unwrap();

        let owned = catalog.listings_owned_by(ann.id).await.unwrap();
        assert_eq!(owned.len(), 1);
        assert_eq!(owned[0].id, mine.id);
        assert!(catalog
            .listings_owned_by(AuthorId::generate())
            .await
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn listing_requires_materials_and_author() {
        let catalog = catalog();
        let owner = catalog.register_author("ann", "x$y".into()).await.unwrap();

        let mut listing = worsted();
        listing.materials = vec!["  ".into()];
        let err = catalog
            .create_listing(&Principal::new(owner.id), listing)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ValidationFailed);

        let err = catalog
            .create_listing(&Principal::new(AuthorId::generate()), worsted())
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    #[tokio::test]
    async fn update_author_is_owner_only() {
        let catalog = catalog();
        let ann = catalog.register_author("ann", "x$y".into()).await.unwrap();
        let bob = catalog.register_author("bob", "x$y".into()).await.unwrap();

        let rename = AuthorUpdate {
            handle: Some("annie".into()),
            credential: None,
        };
        let err = catalog
            .update_author(&Principal::new(bob.id), ann.id, rename.clone())
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Unauthorized);

        let updated = catalog
            .update_author(&Principal::new(ann.id), ann.id, rename)
            .await
            .unwrap();
        assert_eq!(updated.handle.as_str(), "annie");
        assert!(catalog.find_author_by_handle("ann").await.unwrap().is_none());
        assert!(catalog.find_author_by_handle("annie").await.unwrap().is_some());

        let taken = AuthorUpdate {
            handle: Some("bob".into()),
            credential: None,
        };
        let err = catalog
            .update_author(&Principal::new(ann.id), ann.id, taken)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Conflict);
    }

    #[tokio::test]
    async fn find_by_malformed_handle_matches_nobody() {
        let catalog = catalog();
        assert!(catalog.find_author_by_handle("no such!").await.unwrap().is_none());
    }
}
