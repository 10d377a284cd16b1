//! Anti-entropy reconciler for review back-references and averages.
//!
//! The review coordinator writes three documents per operation without a
//! transaction. A failure between writes leaves one of two shapes:
//!
//! - an **orphan** review: present, but missing from its listing's or its
//!   author's `review_refs`
//! - a **dangling reference**: a `review_refs` entry for a review that no
//!   longer exists
//!
//! [`Reconciler::check`] scans all three collections and reports every
//! divergence. [`Reconciler::repair`] fixes repairable issues using the same
//! per-document primitives the coordinator uses. Each repair re-reads the
//! affected documents first, so a report that has gone stale by the time it
//! is repaired never causes a wrong write.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use skein_core::{AuthorId, ListingId, ReviewId, WriteResult};

use crate::aggregate::compute_average;
use crate::coordinator::{AggregateOutcome, RefChange, write_listing_aggregate};
use crate::error::Result;
use crate::metrics::record_repair_action;
use crate::model::{Author, AuthorQuery, Listing, ListingQuery, Review, ReviewQuery};
use crate::store::EntityStore;

/// Default age, in seconds, below which an unlinked review is assumed to be mid-create.
pub const DEFAULT_ORPHAN_GRACE_SECS: i64 = 30;

/// Tolerance when comparing a stored average with a recomputed one.
const AVERAGE_EPSILON: f64 = 1e-9;

// ============================================================================
// Reconciliation Report
// ============================================================================

/// Report from a reconciliation check.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReconciliationReport {
    /// When the check was performed.
    pub checked_at: DateTime<Utc>,

    /// Listings scanned.
    pub listing_count: usize,

    /// Authors scanned.
    pub author_count: usize,

    /// Reviews scanned.
    pub review_count: usize,

    /// Issues found during reconciliation.
    pub issues: Vec<ReconciliationIssue>,
}

impl ReconciliationReport {
    /// Returns true if any issues were found.
    #[must_use]
    pub fn has_issues(&self) -> bool {
        !self.issues.is_empty()
    }

    /// Returns issues of a specific type.
    #[must_use]
    pub fn issues_of_type(&self, issue_type: IssueType) -> Vec<&ReconciliationIssue> {
        self.issues
            .iter()
            .filter(|i| i.issue_type == issue_type)
            .collect()
    }
}

/// A specific reconciliation issue.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReconciliationIssue {
    /// Type of issue.
    pub issue_type: IssueType,

    /// Listing involved, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub listing_id: Option<ListingId>,

    /// Author involved, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub author_id: Option<AuthorId>,

    /// Review involved, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub review_id: Option<ReviewId>,

    /// Human-readable description.
    pub description: String,

    /// Severity level.
    pub severity: Severity,

    /// Whether this issue is auto-repairable.
    pub repairable: bool,
}

/// Type of reconciliation issue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IssueType {
    /// Review exists but its listing or author does not link it.
    OrphanedReview,
    /// Listing links a review that does not exist.
    DanglingListingRef,
    /// Author links a review that does not exist.
    DanglingAuthorRef,
    /// A listing or author links a review that points elsewhere.
    MisplacedRef,
    /// A review id appears more than once in one `review_refs`.
    DuplicateRef,
    /// Stored average differs from the average over linked reviews.
    StaleAverage,
    /// Review targets a listing or author that does not exist.
    MissingParent,
}

impl IssueType {
    /// Returns the stable name used in logs and metrics.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::OrphanedReview => "orphaned_review",
            Self::DanglingListingRef => "dangling_listing_ref",
            Self::DanglingAuthorRef => "dangling_author_ref",
            Self::MisplacedRef => "misplaced_ref",
            Self::DuplicateRef => "duplicate_ref",
            Self::StaleAverage => "stale_average",
            Self::MissingParent => "missing_parent",
        }
    }
}

/// Severity of an issue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    /// Informational - no action required.
    Info,
    /// Warning - should be investigated.
    Warning,
    /// Error - requires attention.
    Error,
    /// Critical - immediate action required.
    Critical,
}

/// Result of a repair operation.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RepairResult {
    /// When the repair was performed.
    pub repaired_at: Option<DateTime<Utc>>,

    /// Number of issues successfully repaired.
    pub repaired_count: usize,

    /// Number of issues skipped (not repairable, or already resolved).
    pub skipped_count: usize,

    /// Number of repair attempts that failed.
    pub failed_count: usize,
}

// ============================================================================
// Reconciler
// ============================================================================

/// Anti-entropy reconciler for the review back-references.
#[derive(Clone)]
pub struct Reconciler {
    store: Arc<dyn EntityStore>,
    orphan_grace: Duration,
    max_cas_attempts: u32,
}

impl std::fmt::Debug for Reconciler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Reconciler")
            .field("store", &"EntityStore")
            .field("orphan_grace", &self.orphan_grace)
            .field("max_cas_attempts", &self.max_cas_attempts)
            .finish()
    }
}

/// Everything one check reads, indexed for lookups.
struct Snapshot {
    listings: HashMap<ListingId, Listing>,
    authors: HashMap<AuthorId, Author>,
    reviews: HashMap<ReviewId, Review>,
    review_order: Vec<ReviewId>,
}

impl Reconciler {
    /// Creates a new reconciler with the default orphan grace period.
    #[must_use]
    pub fn new(store: Arc<dyn EntityStore>) -> Self {
        Self {
            store,
            orphan_grace: Duration::seconds(DEFAULT_ORPHAN_GRACE_SECS),
            max_cas_attempts: crate::coordinator::DEFAULT_MAX_CAS_ATTEMPTS,
        }
    }

    /// Sets how old an unlinked review must be before it is repaired.
    #[must_use]
    pub fn with_orphan_grace(mut self, grace: Duration) -> Self {
        self.orphan_grace = grace;
        self
    }

    /// Sets the CAS attempt budget for listing repairs.
    #[must_use]
    pub fn with_max_cas_attempts(mut self, attempts: u32) -> Self {
        self.max_cas_attempts = attempts;
        self
    }

    /// Checks all collections for inconsistencies.
    ///
    /// Parents are read before reviews, so a review created during the scan
    /// shows up as a young orphan rather than as a dangling reference.
    ///
    /// # Errors
    ///
    /// Returns an error if a collection scan fails.
    pub async fn check(&self) -> Result<ReconciliationReport> {
        tracing::info!("starting reconciliation check");

        let snapshot = self.load().await?;
        let now = Utc::now();
        let mut issues = Vec::new();

        for listing in snapshot.listings.values() {
            check_refs(
                &listing.review_refs,
                &snapshot.reviews,
                |review| review.target_ref == listing.id,
                IssueType::DanglingListingRef,
                RefOwner::Listing(listing.id),
                &mut issues,
            );

            let linked: HashSet<ReviewId> = listing.review_refs.iter().copied().collect();
            let expected = compute_average(
                linked
                    .iter()
                    .filter_map(|id| snapshot.reviews.get(id))
                    .filter(|r| r.target_ref == listing.id)
                    .map(|r| r.rating),
            );
            if (expected - listing.average_rating).abs() > AVERAGE_EPSILON {
                issues.push(ReconciliationIssue {
                    issue_type: IssueType::StaleAverage,
                    listing_id: Some(listing.id),
                    author_id: None,
                    review_id: None,
                    description: format!(
                        "stored average {} differs from linked average {expected}",
                        listing.average_rating
                    ),
                    severity: Severity::Warning,
                    repairable: true,
                });
            }
        }

        for author in snapshot.authors.values() {
            check_refs(
                &author.review_refs,
                &snapshot.reviews,
                |review| review.author_ref == author.id,
                IssueType::DanglingAuthorRef,
                RefOwner::Author(author.id),
                &mut issues,
            );
        }

        for review_id in &snapshot.review_order {
            let Some(review) = snapshot.reviews.get(review_id) else {
                continue;
            };
            let listing = snapshot.listings.get(&review.target_ref);
            let author = snapshot.authors.get(&review.author_ref);

            if listing.is_none() || author.is_none() {
                let missing = if listing.is_none() { "listing" } else { "author" };
                issues.push(ReconciliationIssue {
                    issue_type: IssueType::MissingParent,
                    listing_id: Some(review.target_ref),
                    author_id: Some(review.author_ref),
                    review_id: Some(review.id),
                    description: format!("review's {missing} does not exist"),
                    severity: Severity::Error,
                    repairable: true,
                });
                continue;
            }

            let in_listing = listing.is_some_and(|l| l.review_refs.contains(&review.id));
            let in_author = author.is_some_and(|a| a.review_refs.contains(&review.id));
            if in_listing && in_author {
                continue;
            }

            let age = now - review.id.created_at();
            let settled = age >= self.orphan_grace;
            let unlinked_from = match (in_listing, in_author) {
                (false, false) => "listing and author",
                (false, true) => "listing",
                _ => "author",
            };
            issues.push(ReconciliationIssue {
                issue_type: IssueType::OrphanedReview,
                listing_id: Some(review.target_ref),
                author_id: Some(review.author_ref),
                review_id: Some(review.id),
                description: if settled {
                    format!("review not linked from its {unlinked_from}")
                } else {
                    format!("review not yet linked from its {unlinked_from} (possibly in flight)")
                },
                severity: if settled { Severity::Warning } else { Severity::Info },
                repairable: settled,
            });
        }

        let report = ReconciliationReport {
            checked_at: now,
            listing_count: snapshot.listings.len(),
            author_count: snapshot.authors.len(),
            review_count: snapshot.reviews.len(),
            issues,
        };

        tracing::info!(
            listings = report.listing_count,
            authors = report.author_count,
            reviews = report.review_count,
            issues = report.issues.len(),
            "reconciliation check complete"
        );

        Ok(report)
    }

    /// Repairs issues found in a reconciliation report.
    ///
    /// Only issues marked as `repairable: true` will be addressed. Each repair
    /// re-reads current state and is skipped if the issue no longer holds.
    ///
    /// # Errors
    ///
    /// Individual repair failures are counted in `failed_count`; this only
    /// returns an error for failures outside a single repair.
    pub async fn repair(&self, report: &ReconciliationReport) -> Result<RepairResult> {
        let mut result = RepairResult {
            repaired_at: Some(Utc::now()),
            ..RepairResult::default()
        };

        // Averages are recomputed once per listing, after every ref change.
        let mut recompute: Vec<ListingId> = Vec::new();

        for issue in &report.issues {
            if !issue.repairable {
                result.skipped_count += 1;
                continue;
            }

            match self.repair_issue(issue, &mut recompute).await {
                Ok(true) => {
                    record_repair_action(issue.issue_type.as_str());
                    result.repaired_count += 1;
                }
                Ok(false) => result.skipped_count += 1,
                Err(e) => {
                    tracing::error!(
                        issue = issue.issue_type.as_str(),
                        review_id = ?issue.review_id,
                        listing_id = ?issue.listing_id,
                        author_id = ?issue.author_id,
                        error = %e,
                        "repair failed"
                    );
                    result.failed_count += 1;
                }
            }
        }

        let mut seen = HashSet::new();
        for listing_id in recompute.into_iter().filter(|id| seen.insert(*id)) {
            if let Err(e) = self.recompute(listing_id).await {
                tracing::error!(listing_id = %listing_id, error = %e, "average recompute failed");
            }
        }

        tracing::info!(
            repaired = result.repaired_count,
            skipped = result.skipped_count,
            failed = result.failed_count,
            "repair pass complete"
        );
        Ok(result)
    }

    /// Runs a check followed by a repair of everything it found.
    ///
    /// # Errors
    ///
    /// Returns an error if the check fails.
    pub async fn sweep(&self) -> Result<(ReconciliationReport, RepairResult)> {
        let report = self.check().await?;
        if !report.has_issues() {
            return Ok((report, RepairResult::default()));
        }
        let result = self.repair(&report).await?;
        Ok((report, result))
    }

    async fn repair_issue(
        &self,
        issue: &ReconciliationIssue,
        recompute: &mut Vec<ListingId>,
    ) -> Result<bool> {
        match issue.issue_type {
            IssueType::OrphanedReview => {
                let Some(review) = self.current_review(issue.review_id).await? else {
                    return Ok(false);
                };
                self.relink(&review).await
            }
            IssueType::DanglingListingRef | IssueType::DanglingAuthorRef => {
                let Some(review_id) = issue.review_id else {
                    return Ok(false);
                };
                if self.store.reviews().get(&review_id).await?.is_some() {
                    return Ok(false);
                }
                self.pull_from_parent(issue, review_id, recompute).await
            }
            IssueType::MisplacedRef => {
                let Some(review_id) = issue.review_id else {
                    return Ok(false);
                };
                let Some(review) = self.current_review(Some(review_id)).await? else {
                    return Ok(false);
                };
                let still_misplaced = issue.listing_id.is_some_and(|l| l != review.target_ref)
                    || issue.author_id.is_some_and(|a| a != review.author_ref);
                if !still_misplaced {
                    return Ok(false);
                }
                self.pull_from_parent(issue, review_id, recompute).await
            }
            IssueType::DuplicateRef => {
                let Some(review_id) = issue.review_id else {
                    return Ok(false);
                };
                self.collapse_duplicate(issue, review_id, recompute).await
            }
            IssueType::StaleAverage => {
                if let Some(listing_id) = issue.listing_id {
                    recompute.push(listing_id);
                    return Ok(true);
                }
                Ok(false)
            }
            IssueType::MissingParent => {
                let Some(review) = self.current_review(issue.review_id).await? else {
                    return Ok(false);
                };
                let listing = self.store.listings().get(&review.target_ref).await?;
                let author = self.store.authors().get(&review.author_ref).await?;
                if listing.is_some() && author.is_some() {
                    return Ok(false);
                }
                self.store.reviews().delete(&review.id).await?;
                if listing.is_some() {
                    self.store.listings().pull_ref(&review.target_ref, review.id).await?;
                    recompute.push(review.target_ref);
                }
                if author.is_some() {
                    self.store.authors().pull_ref(&review.author_ref, review.id).await?;
                }
                tracing::warn!(review_id = %review.id, "deleted review with missing parent");
                Ok(true)
            }
        }
    }

    /// Links an orphan from whichever side is missing it.
    async fn relink(&self, review: &Review) -> Result<bool> {
        let mut changed = false;
        let Some(listing) = self.store.listings().get(&review.target_ref).await? else {
            return Ok(false);
        };
        if !listing.doc.review_refs.contains(&review.id) {
            match write_listing_aggregate(
                self.store.as_ref(),
                review.target_ref,
                RefChange::Link(review.id),
                self.max_cas_attempts,
                "repair",
            )
            .await?
            {
                AggregateOutcome::Applied { .. } => changed = true,
                AggregateOutcome::ListingMissing => return Ok(false),
            }
        }
        let linked_from_author = self
            .store
            .authors()
            .get(&review.author_ref)
            .await?
            .is_some_and(|a| a.doc.review_refs.contains(&review.id));
        if !linked_from_author {
            if let WriteResult::Success { .. } =
                self.store.authors().push_ref(&review.author_ref, review.id).await?
            {
                changed = true;
            }
        }
        if changed {
            tracing::info!(review_id = %review.id, "re-linked orphaned review");
        }
        Ok(changed)
    }

    async fn pull_from_parent(
        &self,
        issue: &ReconciliationIssue,
        review_id: ReviewId,
        recompute: &mut Vec<ListingId>,
    ) -> Result<bool> {
        if let Some(listing_id) = issue.listing_id {
            let outcome = write_listing_aggregate(
                self.store.as_ref(),
                listing_id,
                RefChange::Unlink(review_id),
                self.max_cas_attempts,
                "repair",
            )
            .await?;
            tracing::info!(listing_id = %listing_id, review_id = %review_id, "pulled listing ref");
            recompute.push(listing_id);
            return Ok(matches!(outcome, AggregateOutcome::Applied { .. }));
        }
        if let Some(author_id) = issue.author_id {
            let outcome = self.store.authors().pull_ref(&author_id, review_id).await?;
            tracing::info!(author_id = %author_id, review_id = %review_id, "pulled author ref");
            return Ok(outcome.is_success());
        }
        Ok(false)
    }

    /// Collapses repeated entries into one, moving the ref to the end.
    async fn collapse_duplicate(
        &self,
        issue: &ReconciliationIssue,
        review_id: ReviewId,
        recompute: &mut Vec<ListingId>,
    ) -> Result<bool> {
        let outcome = if let Some(listing_id) = issue.listing_id {
            recompute.push(listing_id);
            let update = skein_core::Update::new().pull_ref(review_id).push_ref(review_id);
            self.store
                .listings()
                .update(&listing_id, update, skein_core::WritePrecondition::None)
                .await?
        } else if let Some(author_id) = issue.author_id {
            let update = skein_core::Update::new().pull_ref(review_id).push_ref(review_id);
            self.store
                .authors()
                .update(&author_id, update, skein_core::WritePrecondition::None)
                .await?
        } else {
            return Ok(false);
        };
        Ok(outcome.is_success())
    }

    async fn recompute(&self, listing_id: ListingId) -> Result<()> {
        write_listing_aggregate(
            self.store.as_ref(),
            listing_id,
            RefChange::Recompute,
            self.max_cas_attempts,
            "repair",
        )
        .await?;
        Ok(())
    }

    async fn current_review(&self, review_id: Option<ReviewId>) -> Result<Option<Review>> {
        let Some(review_id) = review_id else {
            return Ok(None);
        };
        Ok(self.store.reviews().get(&review_id).await?.map(|v| v.doc))
    }

    async fn load(&self) -> Result<Snapshot> {
        let listings = self.store.listings().find(&ListingQuery::All).await?;
        let authors = self.store.authors().find(&AuthorQuery::All).await?;
        let reviews = self.store.reviews().find(&ReviewQuery::All).await?;

        Ok(Snapshot {
            listings: listings.into_iter().map(|v| (v.doc.id, v.doc)).collect(),
            authors: authors.into_iter().map(|v| (v.doc.id, v.doc)).collect(),
            review_order: reviews.iter().map(|v| v.doc.id).collect(),
            reviews: reviews.into_iter().map(|v| (v.doc.id, v.doc)).collect(),
        })
    }
}

#[derive(Debug, Clone, Copy)]
enum RefOwner {
    Listing(ListingId),
    Author(AuthorId),
}

impl RefOwner {
    fn ids(self) -> (Option<ListingId>, Option<AuthorId>) {
        match self {
            Self::Listing(id) => (Some(id), None),
            Self::Author(id) => (None, Some(id)),
        }
    }
}

/// Reports dangling, misplaced, and duplicate entries in one refs array.
fn check_refs(
    refs: &[ReviewId],
    reviews: &HashMap<ReviewId, Review>,
    belongs: impl Fn(&Review) -> bool,
    dangling: IssueType,
    owner: RefOwner,
    issues: &mut Vec<ReconciliationIssue>,
) {
    let (listing_id, author_id) = owner.ids();
    let mut seen = HashSet::new();

    for review_id in refs {
        if !seen.insert(*review_id) {
            issues.push(ReconciliationIssue {
                issue_type: IssueType::DuplicateRef,
                listing_id,
                author_id,
                review_id: Some(*review_id),
                description: "review linked more than once".to_string(),
                severity: Severity::Warning,
                repairable: true,
            });
            continue;
        }

        match reviews.get(review_id) {
            None => issues.push(ReconciliationIssue {
                issue_type: dangling,
                listing_id,
                author_id,
                review_id: Some(*review_id),
                description: "reference to a review that does not exist".to_string(),
                severity: Severity::Warning,
                repairable: true,
            }),
            Some(review) if !belongs(review) => issues.push(ReconciliationIssue {
                issue_type: IssueType::MisplacedRef,
                listing_id,
                author_id,
                review_id: Some(*review_id),
                description: "reference to a review that points elsewhere".to_string(),
                severity: Severity::Error,
                repairable: true,
            }),
            Some(_) => {}
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::Principal;
    use crate::catalog::Catalog;
    use crate::coordinator::CoordinatorOptions;
    use crate::model::{ListingPatch, NewListing, NewReview};
    use crate::store::InMemoryEntityStore;

    async fn fixture() -> (Arc<InMemoryEntityStore>, Catalog, Principal, ListingId) {
        let store = Arc::new(InMemoryEntityStore::new());
        let catalog = Catalog::new(store.clone(), CoordinatorOptions::default());
        let author = catalog.register_author("ann", "s$d".into()).await.unwrap();
        let acting = Principal::new(author.id);
        let listing = catalog
            .create_listing(
                &acting,
                NewListing {
                    name: "Malabrigo Rios".into(),
                    color: "Azul".into(),
                    weight: "worsted".into(),
                    brand: None,
                    hook_size: "5mm".into(),
                    needle_size: "4.5mm".into(),
                    materials: vec!["merino".into()],
                    image_urls: vec![],
                },
            )
            .await
            .unwrap();
        (store, catalog, acting, listing.id)
    }

    #[tokio::test]
    async fn consistent_state_has_no_issues() {
        let (store, catalog, acting, listing_id) = fixture().await;
        catalog
            .create_review(
                &acting,
                NewReview {
                    listing_id,
                    content: "squishy".into(),
                    rating: 5,
                    image_urls: vec![],
                },
            )
            .await
            .unwrap();

        let report = Reconciler::new(store).check().await.unwrap();
        assert!(!report.has_issues(), "{:?}", report.issues);
        assert_eq!(report.review_count, 1);
    }

    #[tokio::test]
    async fn stale_average_is_recomputed() {
        let (store, _catalog, _acting, listing_id) = fixture().await;
        store
            .listings()
            .update_fields(&listing_id, vec![ListingPatch::AverageRating(4.2)])
            .await
            .unwrap();

        let reconciler = Reconciler::new(store.clone());
        let report = reconciler.check().await.unwrap();
        assert_eq!(report.issues_of_type(IssueType::StaleAverage).len(), 1);

        let result = reconciler.repair(&report).await.unwrap();
        assert_eq!(result.repaired_count, 1);
        let listing = store.listings().get(&listing_id).await.unwrap().unwrap();
        assert!(listing.doc.average_rating.abs() < f64::EPSILON);
        assert!(!reconciler.check().await.unwrap().has_issues());
    }

    #[tokio::test]
    async fn young_orphan_is_not_repairable() {
        let (store, _catalog, acting, listing_id) = fixture().await;
        store
            .reviews()
            .insert(Review {
                id: ReviewId::generate(),
                content: "in flight".into(),
                rating: crate::model::Rating::new(3).unwrap(),
                author_ref: acting.author_id,
                target_ref: listing_id,
                image_urls: vec![],
                created_at: Utc::now(),
                updated_at: None,
            })
            .await
            .unwrap();

        let report = Reconciler::new(store).check().await.unwrap();
        let orphans = report.issues_of_type(IssueType::OrphanedReview);
        assert_eq!(orphans.len(), 1);
        assert_eq!(orphans[0].severity, Severity::Info);
        assert!(!orphans[0].repairable);
    }

    #[tokio::test]
    async fn misplaced_ref_is_pulled() {
        let (store, catalog, acting, listing_id) = fixture().await;
        let review = catalog
            .create_review(
                &acting,
                NewReview {
                    listing_id,
                    content: "nice".into(),
                    rating: 4,
                    image_urls: vec![],
                },
            )
            .await
            .unwrap();
        let other = catalog
            .create_listing(
                &acting,
                NewListing {
                    name: "Other".into(),
                    color: "Grey".into(),
                    weight: "lace".into(),
                    brand: None,
                    hook_size: "2mm".into(),
                    needle_size: "2mm".into(),
                    materials: vec!["silk".into()],
                    image_urls: vec![],
                },
            )
            .await
            .unwrap();
        store.listings().push_ref(&other.id, review.id).await.unwrap();

        let reconciler = Reconciler::new(store.clone());
        let report = reconciler.check().await.unwrap();
        let misplaced = report.issues_of_type(IssueType::MisplacedRef);
        assert_eq!(misplaced.len(), 1);
        assert_eq!(misplaced[0].listing_id, Some(other.id));

        let result = reconciler.repair(&report).await.unwrap();
        assert_eq!(result.repaired_count, 1);
        let other = store.listings().get(&other.id).await.unwrap().unwrap().doc;
        assert!(other.review_refs.is_empty());
        let home = store.listings().get(&listing_id).await.unwrap().unwrap().doc;
        assert_eq!(home.review_refs, vec![review.id]);
        assert!(!reconciler.check().await.unwrap().has_issues());
    }
}
