//! Review lifecycle coordinator.
//!
//! The coordinator is the only writer of review back-references and of
//! `Listing::average_rating`. It runs each review mutation as a fixed,
//! ordered sequence of single-document writes:
//!
//! ```text
//! create:  insert review ─► listing {push ref, set average} ─► author {push ref}
//! edit:    review {set fields} ─► listing {set average}   (only if the rating changed)
//! delete:  delete review ─► listing {pull ref, set average} ─► author {pull ref}
//! ```
//!
//! The store offers no cross-document transaction, so a failure after the
//! first write is not rolled back. Create failures leave an *orphan* review
//! (present, not linked); delete failures leave a *dangling reference* (linked,
//! not present). Both are detected and repaired by the
//! [`Reconciler`](crate::reconciler::Reconciler).
//!
//! ## Concurrency
//!
//! Listing writes are compare-and-swap on the listing version. The average is
//! recomputed from the listing's linked reviews on every attempt, so two
//! reviews posted at once never lose an update. After validation and
//! authorization the write phase runs on a spawned task: dropping the
//! caller's future does not cancel writes that have already begun.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use chrono::Utc;
use tracing::Instrument;

use skein_core::observability::review_span;
use skein_core::store::Document;
use skein_core::{ListingId, ReviewId, Update, WritePrecondition, WriteResult};

use crate::aggregate::compute_average;
use crate::auth::Principal;
use crate::error::{CatalogError, Result};
use crate::guard::require_owner;
use crate::metrics::{record_cas_retry, record_partial_failure, record_review_write};
use crate::model::{
    Listing, ListingPatch, NewReview, Rating, Review, ReviewEdit, ReviewPatch, ReviewQuery,
};
use crate::store::EntityStore;

/// Default number of CAS attempts on a contended listing.
pub const DEFAULT_MAX_CAS_ATTEMPTS: u32 = 5;

/// Tuning for the coordinator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CoordinatorOptions {
    /// Attempts at a listing compare-and-swap before giving up with
    /// `StoreUnavailable`.
    pub max_cas_attempts: u32,
}

impl Default for CoordinatorOptions {
    fn default() -> Self {
        Self {
            max_cas_attempts: DEFAULT_MAX_CAS_ATTEMPTS,
        }
    }
}

// ============================================================================
// Listing aggregate writes
// ============================================================================

/// How a listing write changes the back-reference array.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum RefChange {
    /// Push a review and count it.
    Link(ReviewId),
    /// Pull a review and stop counting it.
    Unlink(ReviewId),
    /// Leave the refs alone; only recompute the average.
    Recompute,
}

/// Result of a listing aggregate write.
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) enum AggregateOutcome {
    /// The write landed.
    Applied {
        /// The average written.
        average: f64,
    },
    /// The listing does not exist.
    ListingMissing,
}

/// Writes a listing's back-reference change and recomputed average together.
///
/// The average covers the reviews linked from the listing after `change` is
/// applied, and only those that still exist and still target the listing.
/// Retries on version conflicts up to `max_attempts`.
pub(crate) async fn write_listing_aggregate(
    store: &dyn EntityStore,
    listing_id: ListingId,
    change: RefChange,
    max_attempts: u32,
    operation: &'static str,
) -> Result<AggregateOutcome> {
    let attempts = max_attempts.max(1);

    for attempt in 1..=attempts {
        let Some(current) = store.listings().get(&listing_id).await? else {
            return Ok(AggregateOutcome::ListingMissing);
        };

        let linked = linked_after(&current.doc, change);
        let ratings: HashMap<ReviewId, Rating> = store
            .reviews()
            .find(&ReviewQuery::ForListing(listing_id))
            .await?
            .into_iter()
            .map(|v| (v.doc.id, v.doc.rating))
            .collect();
        let average = compute_average(linked.iter().filter_map(|id| ratings.get(id).copied()));

        let mut update = Update::new().set(ListingPatch::AverageRating(average));
        match change {
            RefChange::Link(review) => update = update.push_ref(review),
            RefChange::Unlink(review) => update = update.pull_ref(review),
            RefChange::Recompute => {}
        }

        match store
            .listings()
            .update(
                &listing_id,
                update,
                WritePrecondition::MatchesVersion(current.version),
            )
            .await?
        {
            WriteResult::Success { version } => {
                tracing::debug!(
                    listing_id = %listing_id,
                    version,
                    average,
                    linked = linked.len(),
                    "listing aggregate written"
                );
                return Ok(AggregateOutcome::Applied { average });
            }
            WriteResult::PreconditionFailed { current_version } => {
                record_cas_retry(operation);
                tracing::debug!(
                    listing_id = %listing_id,
                    attempt,
                    expected = current.version,
                    current_version,
                    "listing version moved, retrying"
                );
            }
            WriteResult::NotFound => return Ok(AggregateOutcome::ListingMissing),
        }
    }

    tracing::warn!(listing_id = %listing_id, attempts, operation, "listing CAS retries exhausted");
    Err(CatalogError::store_unavailable(
        "listing is under heavy contention, retry later",
    ))
}

/// Returns the distinct review ids linked from `listing` once `change` applies.
fn linked_after(listing: &Listing, change: RefChange) -> Vec<ReviewId> {
    let mut seen = HashSet::new();
    let mut linked: Vec<ReviewId> = listing
        .review_refs
        .iter()
        .copied()
        .filter(|id| seen.insert(*id))
        .collect();
    match change {
        RefChange::Link(review) => {
            if seen.insert(review) {
                linked.push(review);
            }
        }
        RefChange::Unlink(review) => linked.retain(|id| *id != review),
        RefChange::Recompute => {}
    }
    linked
}

// ============================================================================
// Coordinator
// ============================================================================

/// Orchestrates review create, edit, and delete.
#[derive(Clone)]
pub struct ReviewCoordinator {
    store: Arc<dyn EntityStore>,
    options: CoordinatorOptions,
}

impl std::fmt::Debug for ReviewCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReviewCoordinator")
            .field("store", &"EntityStore")
            .field("options", &self.options)
            .finish()
    }
}

impl ReviewCoordinator {
    /// Creates a coordinator over a store.
    #[must_use]
    pub fn new(store: Arc<dyn EntityStore>, options: CoordinatorOptions) -> Self {
        Self { store, options }
    }

    /// Returns the coordinator options.
    #[must_use]
    pub const fn options(&self) -> CoordinatorOptions {
        self.options
    }

    /// Creates a review on a listing and links it from the listing and the
    /// acting author.
    ///
    /// # Errors
    ///
    /// - `ValidationFailed` for blank content or a rating outside `1..=5`
    /// - `NotFound` if the listing or the acting author does not exist
    /// - `StoreUnavailable` if a write fails; the review may remain as an orphan
    pub async fn create_review(&self, acting: &Principal, new: NewReview) -> Result<Review> {
        let result = self.create_review_inner(acting, new).await;
        record_review_write("create_review", outcome(&result));
        result
    }

    async fn create_review_inner(&self, acting: &Principal, new: NewReview) -> Result<Review> {
        let content = require_content(new.content)?;
        let rating = parse_rating(new.rating)?;

        if self.store.listings().get(&new.listing_id).await?.is_none() {
            return Err(CatalogError::not_found("listing", new.listing_id));
        }
        if self.store.authors().get(&acting.author_id).await?.is_none() {
            return Err(CatalogError::not_found("author", acting.author_id));
        }

        let review = Review {
            id: ReviewId::generate(),
            content,
            rating,
            author_ref: acting.author_id,
            target_ref: new.listing_id,
            image_urls: new.image_urls,
            created_at: Utc::now(),
            updated_at: None,
        };

        let store = Arc::clone(&self.store);
        let max_attempts = self.options.max_cas_attempts;
        let span = review_span("create_review", "pending");
        run_to_completion(
            async move { create_write_phase(store.as_ref(), review, max_attempts).await }
                .instrument(span),
        )
        .await
    }

    /// Edits a review's content, rating, or images.
    ///
    /// The listing average is recomputed only when the rating actually changes.
    ///
    /// # Errors
    ///
    /// - `ValidationFailed` for an empty edit, blank content, or an out-of-range rating
    /// - `NotFound` if the review (or its author) does not exist
    /// - `Unauthorized` if `acting` did not write the review
    /// - `StoreUnavailable` if a write fails
    pub async fn edit_review(
        &self,
        review_id: ReviewId,
        acting: &Principal,
        edit: ReviewEdit,
    ) -> Result<Review> {
        let result = self.edit_review_inner(review_id, acting, edit).await;
        record_review_write("edit_review", outcome(&result));
        result
    }

    async fn edit_review_inner(
        &self,
        review_id: ReviewId,
        acting: &Principal,
        edit: ReviewEdit,
    ) -> Result<Review> {
        if edit.content.is_none() && edit.rating.is_none() && edit.image_urls.is_none() {
            return Err(CatalogError::validation("edit must change at least one field"));
        }
        let content = edit.content.map(require_content).transpose()?;
        let rating = edit.rating.map(parse_rating).transpose()?;

        let review = self.load_owned_review(review_id, acting, "edit this review").await?;

        let rating_changed = rating.is_some_and(|r| r != review.rating);
        let mut patches = Vec::with_capacity(4);
        if let Some(content) = content {
            patches.push(ReviewPatch::Content(content));
        }
        if let Some(rating) = rating {
            patches.push(ReviewPatch::Rating(rating));
        }
        if let Some(images) = edit.image_urls {
            patches.push(ReviewPatch::Images(images));
        }
        patches.push(ReviewPatch::UpdatedAt(Utc::now()));

        let mut updated = review;
        for patch in patches.iter().cloned() {
            updated.apply(patch);
        }

        let store = Arc::clone(&self.store);
        let max_attempts = self.options.max_cas_attempts;
        let listing_id = updated.target_ref;
        let span = review_span("edit_review", &review_id.to_string());
        run_to_completion(
            async move {
                edit_write_phase(
                    store.as_ref(),
                    review_id,
                    listing_id,
                    patches,
                    rating_changed,
                    max_attempts,
                )
                .await
            }
            .instrument(span),
        )
        .await?;

        Ok(updated)
    }

    /// Deletes a review and retracts both back-references.
    ///
    /// # Errors
    ///
    /// - `NotFound` if the review (or its author) does not exist
    /// - `Unauthorized` if `acting` did not write the review
    /// - `StoreUnavailable` if a write fails; references may remain dangling
    pub async fn delete_review(&self, review_id: ReviewId, acting: &Principal) -> Result<()> {
        let result = self.delete_review_inner(review_id, acting).await;
        record_review_write("delete_review", outcome(&result));
        result
    }

    async fn delete_review_inner(&self, review_id: ReviewId, acting: &Principal) -> Result<()> {
        let review = self
            .load_owned_review(review_id, acting, "delete this review")
            .await?;

        let store = Arc::clone(&self.store);
        let max_attempts = self.options.max_cas_attempts;
        let span = review_span("delete_review", &review_id.to_string());
        run_to_completion(
            async move { delete_write_phase(store.as_ref(), &review, max_attempts).await }
                .instrument(span),
        )
        .await
    }

    /// Loads a review and checks `acting` against its stored author.
    async fn load_owned_review(
        &self,
        review_id: ReviewId,
        acting: &Principal,
        action: &str,
    ) -> Result<Review> {
        let review = self
            .store
            .reviews()
            .get(&review_id)
            .await?
            .ok_or_else(|| CatalogError::not_found("review", review_id))?
            .doc;

        let author = self
            .store
            .authors()
            .get(&review.author_ref)
            .await?
            .ok_or_else(|| CatalogError::not_found("author", review.author_ref))?
            .doc;

        require_owner(acting, author.id, action)?;
        Ok(review)
    }
}

// ============================================================================
// Write phases
// ============================================================================

async fn create_write_phase(
    store: &dyn EntityStore,
    mut review: Review,
    max_attempts: u32,
) -> Result<Review> {
    let review_id = store.reviews().insert(review.clone()).await?;
    review.id = review_id;
    tracing::debug!(review_id = %review_id, "review inserted");

    let listing_id = review.target_ref;
    match write_listing_aggregate(
        store,
        listing_id,
        RefChange::Link(review_id),
        max_attempts,
        "create_review",
    )
    .await
    {
        Ok(AggregateOutcome::Applied { .. }) => {}
        Ok(AggregateOutcome::ListingMissing) => {
            orphaned(review_id, "listing vanished before link");
            return Err(CatalogError::not_found("listing", listing_id));
        }
        Err(err) => {
            orphaned(review_id, "listing link failed");
            return Err(err);
        }
    }

    let author_id = review.author_ref;
    match store.authors().push_ref(&author_id, review_id).await {
        Ok(WriteResult::Success { .. }) => {}
        Ok(_) => {
            orphaned(review_id, "author vanished before link");
            return Err(CatalogError::not_found("author", author_id));
        }
        Err(err) => {
            orphaned(review_id, "author link failed");
            return Err(err.into());
        }
    }

    tracing::info!(
        review_id = %review_id,
        listing_id = %listing_id,
        author_id = %author_id,
        rating = %review.rating,
        "review created"
    );
    Ok(review)
}

async fn edit_write_phase(
    store: &dyn EntityStore,
    review_id: ReviewId,
    listing_id: ListingId,
    patches: Vec<ReviewPatch>,
    rating_changed: bool,
    max_attempts: u32,
) -> Result<()> {
    match store.reviews().update_fields(&review_id, patches).await? {
        WriteResult::Success { version } => {
            tracing::debug!(review_id = %review_id, version, "review fields updated");
        }
        _ => return Err(CatalogError::not_found("review", review_id)),
    }

    if !rating_changed {
        return Ok(());
    }

    match write_listing_aggregate(
        store,
        listing_id,
        RefChange::Recompute,
        max_attempts,
        "edit_review",
    )
    .await
    {
        Ok(AggregateOutcome::Applied { average }) => {
            tracing::info!(
                review_id = %review_id,
                listing_id = %listing_id,
                average,
                "rating edited"
            );
            Ok(())
        }
        Ok(AggregateOutcome::ListingMissing) => {
            tracing::warn!(
                review_id = %review_id,
                listing_id = %listing_id,
                "edited review targets a missing listing"
            );
            Ok(())
        }
        Err(err) => {
            record_partial_failure("edit_review", "stale_average");
            tracing::error!(
                review_id = %review_id,
                listing_id = %listing_id,
                state = "stale_average",
                "rating changed but listing average was not updated"
            );
            Err(err)
        }
    }
}

async fn delete_write_phase(
    store: &dyn EntityStore,
    review: &Review,
    max_attempts: u32,
) -> Result<()> {
    let review_id = review.id;
    if !store.reviews().delete(&review_id).await? {
        tracing::debug!(review_id = %review_id, "review already gone, retracting references");
    }

    if let Err(err) = write_listing_aggregate(
        store,
        review.target_ref,
        RefChange::Unlink(review_id),
        max_attempts,
        "delete_review",
    )
    .await
    {
        dangling(review_id, "listing retraction failed");
        return Err(err);
    }

    if let Err(err) = store.authors().pull_ref(&review.author_ref, review_id).await {
        dangling(review_id, "author retraction failed");
        return Err(err.into());
    }

    tracing::info!(
        review_id = %review_id,
        listing_id = %review.target_ref,
        author_id = %review.author_ref,
        "review deleted"
    );
    Ok(())
}

// ============================================================================
// Helpers
// ============================================================================

/// Runs a write phase on its own task and waits for it.
///
/// Once spawned, the phase completes even if the caller is dropped.
async fn run_to_completion<F, T>(phase: F) -> Result<T>
where
    F: std::future::Future<Output = Result<T>> + Send + 'static,
    T: Send + 'static,
{
    tokio::spawn(phase).await.map_err(|err| {
        tracing::error!(error = %err, "review write task failed");
        CatalogError::store_unavailable("write sequence aborted")
    })?
}

fn orphaned(review_id: ReviewId, reason: &str) {
    record_partial_failure("create_review", "orphan");
    tracing::error!(
        review_id = %review_id,
        state = "orphan",
        reason,
        "review left unlinked"
    );
}

fn dangling(review_id: ReviewId, reason: &str) {
    record_partial_failure("delete_review", "dangling_ref");
    tracing::error!(
        review_id = %review_id,
        state = "dangling_ref",
        reason,
        "reference left dangling"
    );
}

fn require_content(content: String) -> Result<String> {
    if content.trim().is_empty() {
        return Err(CatalogError::validation("review content is required"));
    }
    Ok(content)
}

fn parse_rating(raw: i64) -> Result<Rating> {
    Rating::new(raw).map_err(|e| CatalogError::validation(e.to_string()))
}

fn outcome<T>(result: &Result<T>) -> &'static str {
    match result {
        Ok(_) => "success",
        Err(_) => "error",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Author, Handle};
    use crate::store::InMemoryEntityStore;
    use skein_core::AuthorId;

    async fn seed(store: &InMemoryEntityStore, review_refs: Vec<ReviewId>) -> ListingId {
        let owner = store
            .authors()
            .insert(Author {
                id: AuthorId::generate(),
                handle: Handle::parse("owner").unwrap(),
                credential: String::new(),
                review_refs: vec![],
                created_at: Utc::now(),
            })
            .await
            .unwrap();
        store
            .listings()
            .insert(Listing {
                id: ListingId::generate(),
                name: "Merino".into(),
                color: "Teal".into(),
                weight: "dk".into(),
                brand: None,
                recommended_hook_size: "4mm".into(),
                recommended_needle_size: "4mm".into(),
                materials: vec!["wool".into()],
                image_urls: vec![],
                average_rating: 0.0,
                review_refs,
                owner_ref: owner,
                created_at: Utc::now(),
            })
            .await
            .unwrap()
    }

    #[test]
    fn linked_after_dedupes_and_applies_change() {
        let a = ReviewId::generate();
        let b = ReviewId::generate();
        let mut listing = Listing {
            id: ListingId::generate(),
            name: String::new(),
            color: String::new(),
            weight: String::new(),
            brand: None,
            recommended_hook_size: String::new(),
            recommended_needle_size: String::new(),
            materials: vec![],
            image_urls: vec![],
            average_rating: 0.0,
            review_refs: vec![a, a],
            owner_ref: AuthorId::generate(),
            created_at: Utc::now(),
        };
        assert_eq!(linked_after(&listing, RefChange::Recompute), vec![a]);
        assert_eq!(linked_after(&listing, RefChange::Link(b)), vec![a, b]);
        assert_eq!(linked_after(&listing, RefChange::Link(a)), vec![a]);
        listing.review_refs.push(b);
        assert_eq!(linked_after(&listing, RefChange::Unlink(a)), vec![b]);
    }

    #[tokio::test]
    async fn aggregate_ignores_dangling_refs() {
        let store = InMemoryEntityStore::new();
        let dangling = ReviewId::generate();
        let listing_id = seed(&store, vec![dangling]).await;

        let outcome = write_listing_aggregate(&store, listing_id, RefChange::Recompute, 3, "test")
            .await
            .unwrap();
        assert_eq!(outcome, AggregateOutcome::Applied { average: 0.0 });
    }

    #[tokio::test]
    async fn aggregate_on_missing_listing_reports_missing() {
        let store = InMemoryEntityStore::new();
        let outcome = write_listing_aggregate(
            &store,
            ListingId::generate(),
            RefChange::Recompute,
            3,
            "test",
        )
        .await
        .unwrap();
        assert_eq!(outcome, AggregateOutcome::ListingMissing);
    }

    #[test]
    fn outcome_labels() {
        assert_eq!(outcome::<()>(&Ok(())), "success");
        assert_eq!(
            outcome::<()>(&Err(CatalogError::validation("x"))),
            "error"
        );
    }
}
