//! Data model for the Skein catalog.
//!
//! Three document kinds live in three independent collections:
//!
//! - [`Listing`]: a yarn product with a derived `average_rating` and a
//!   back-reference array of the reviews that target it
//! - [`Author`]: a registered user with a unique handle and a back-reference
//!   array of the reviews they wrote
//! - [`Review`]: content plus a bounded [`Rating`], pointing at exactly one
//!   listing and one author
//!
//! The back-reference arrays and `average_rating` are denormalized. Only the
//! review coordinator and the reconciler write them, which is why the patch
//! types below expose no way to set `review_refs` and only
//! [`ListingPatch::AverageRating`] for the aggregate.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use skein_core::store::{Document, Query};
use skein_core::{AuthorId, ListingId, ReviewId};

// ============================================================================
// Rating
// ============================================================================

/// A review rating: an integer from [`Rating::MIN`] to [`Rating::MAX`] inclusive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "i64", into = "u8")]
pub struct Rating(u8);

impl Rating {
    /// Lowest allowed rating.
    pub const MIN: u8 = 1;
    /// Highest allowed rating.
    pub const MAX: u8 = 5;

    /// Validates a raw rating.
    ///
    /// # Errors
    ///
    /// Returns [`RatingError`] if the value is outside `1..=5`.
    pub fn new(value: i64) -> Result<Self, RatingError> {
        u8::try_from(value)
            .ok()
            .filter(|v| (Self::MIN..=Self::MAX).contains(v))
            .map(Self)
            .ok_or(RatingError { value })
    }

    /// Returns the rating value.
    #[must_use]
    pub const fn get(self) -> u8 {
        self.0
    }
}

impl TryFrom<i64> for Rating {
    type Error = RatingError;

    fn try_from(value: i64) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<Rating> for u8 {
    fn from(value: Rating) -> Self {
        value.0
    }
}

impl std::fmt::Display for Rating {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A rating outside the allowed range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("rating must be an integer from {min} to {max}, got {value}", min = Rating::MIN, max = Rating::MAX)]
pub struct RatingError {
    /// The rejected value.
    pub value: i64,
}

// ============================================================================
// Handle
// ============================================================================

/// An author's public handle.
///
/// Handles are ASCII alphanumeric, 1 to [`Handle::MAX_LEN`] characters, and
/// unique across authors. Uniqueness is case-sensitive: `bob` and `Bob` are
/// different handles.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Handle(String);

impl Handle {
    /// Maximum handle length.
    pub const MAX_LEN: usize = 32;

    /// Validates a handle.
    ///
    /// # Errors
    ///
    /// Returns [`HandleError`] if the handle is empty, too long, or contains
    /// anything other than ASCII letters and digits.
    pub fn parse(value: impl Into<String>) -> Result<Self, HandleError> {
        let value = value.into();
        if value.is_empty() {
            return Err(HandleError::Empty);
        }
        if value.len() > Self::MAX_LEN {
            return Err(HandleError::TooLong { len: value.len() });
        }
        if !value.chars().all(|c| c.is_ascii_alphanumeric()) {
            return Err(HandleError::InvalidCharacters);
        }
        Ok(Self(value))
    }

    /// Returns the handle as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for Handle {
    type Error = HandleError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(value)
    }
}

impl From<Handle> for String {
    fn from(value: Handle) -> Self {
        value.0
    }
}

impl std::fmt::Display for Handle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Errors for handle validation.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum HandleError {
    /// Handle is empty.
    #[error("handle cannot be empty")]
    Empty,

    /// Handle is too long.
    #[error("handle is too long ({len} > 32 characters)")]
    TooLong {
        /// The actual length.
        len: usize,
    },

    /// Handle contains characters other than ASCII letters and digits.
    #[error("handle may only contain letters and digits")]
    InvalidCharacters,
}

// ============================================================================
// Listing
// ============================================================================

/// A yarn product listing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Listing {
    /// Listing ID (assigned at insert).
    pub id: ListingId,
    /// Product name.
    pub name: String,
    /// Colorway.
    pub color: String,
    /// Weight class (e.g. `fingering`, `worsted`).
    pub weight: String,
    /// Brand, if known.
    pub brand: Option<String>,
    /// Recommended crochet hook size.
    pub recommended_hook_size: String,
    /// Recommended knitting needle size.
    pub recommended_needle_size: String,
    /// Fiber content.
    pub materials: Vec<String>,
    /// Image references.
    pub image_urls: Vec<String>,
    /// Mean rating over the linked reviews; 0 with no reviews.
    pub average_rating: f64,
    /// Reviews targeting this listing, in creation order.
    pub review_refs: Vec<ReviewId>,
    /// Author who posted the listing.
    pub owner_ref: AuthorId,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
}

impl Listing {
    /// Returns the number of linked reviews.
    #[must_use]
    pub fn review_count(&self) -> usize {
        self.review_refs.len()
    }
}

/// Field assignments accepted by the listings collection.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ListingPatch {
    /// Replace the derived average rating.
    AverageRating(f64),
}

/// Queries over listings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListingQuery {
    /// Every listing.
    All,
    /// Listings posted by one author.
    OwnedBy(AuthorId),
}

impl Query<Listing> for ListingQuery {
    fn matches(&self, doc: &Listing) -> bool {
        match self {
            Self::All => true,
            Self::OwnedBy(owner) => doc.owner_ref == *owner,
        }
    }
}

impl Document for Listing {
    type Id = ListingId;
    type Patch = ListingPatch;
    type Query = ListingQuery;
    const COLLECTION: &'static str = "listings";

    fn id(&self) -> ListingId {
        self.id
    }

    fn set_id(&mut self, id: ListingId) {
        self.id = id;
    }

    fn apply(&mut self, patch: ListingPatch) {
        match patch {
            ListingPatch::AverageRating(value) => self.average_rating = value,
        }
    }

    fn refs_mut(&mut self) -> Option<&mut Vec<ReviewId>> {
        Some(&mut self.review_refs)
    }
}

/// Client-supplied fields for a new listing.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct NewListing {
    /// Product name.
    pub name: String,
    /// Colorway.
    pub color: String,
    /// Weight class.
    pub weight: String,
    /// Brand, if known.
    #[serde(default)]
    pub brand: Option<String>,
    /// Recommended crochet hook size.
    pub hook_size: String,
    /// Recommended knitting needle size.
    pub needle_size: String,
    /// Fiber content (at least one entry).
    pub materials: Vec<String>,
    /// Image references.
    #[serde(default)]
    pub image_urls: Vec<String>,
}

// ============================================================================
// Author
// ============================================================================

/// A registered author.
#[derive(Clone, PartialEq, Serialize, Deserialize)]
pub struct Author {
    /// Author ID (assigned at insert).
    pub id: AuthorId,
    /// Unique public handle.
    pub handle: Handle,
    /// Opaque credential digest. Never serialized.
    #[serde(skip_serializing, default)]
    pub credential: String,
    /// Reviews written by this author, in creation order.
    pub review_refs: Vec<ReviewId>,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
}

impl std::fmt::Debug for Author {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Author")
            .field("id", &self.id)
            .field("handle", &self.handle)
            .field("credential", &"[REDACTED]")
            .field("review_refs", &self.review_refs)
            .field("created_at", &self.created_at)
            .finish()
    }
}

/// Field assignments accepted by the authors collection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthorPatch {
    /// Change the handle (subject to uniqueness).
    Handle(Handle),
    /// Replace the credential digest.
    Credential(String),
}

/// Queries over authors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthorQuery {
    /// Every author.
    All,
    /// The author with exactly this handle.
    Handle(Handle),
}

impl Query<Author> for AuthorQuery {
    fn matches(&self, doc: &Author) -> bool {
        match self {
            Self::All => true,
            Self::Handle(handle) => doc.handle == *handle,
        }
    }
}

impl Document for Author {
    type Id = AuthorId;
    type Patch = AuthorPatch;
    type Query = AuthorQuery;
    const COLLECTION: &'static str = "authors";

    fn id(&self) -> AuthorId {
        self.id
    }

    fn set_id(&mut self, id: AuthorId) {
        self.id = id;
    }

    fn apply(&mut self, patch: AuthorPatch) {
        match patch {
            AuthorPatch::Handle(handle) => self.handle = handle,
            AuthorPatch::Credential(credential) => self.credential = credential,
        }
    }

    fn refs_mut(&mut self) -> Option<&mut Vec<ReviewId>> {
        Some(&mut self.review_refs)
    }

    fn unique_key(&self) -> Option<String> {
        Some(self.handle.as_str().to_string())
    }
}

// ============================================================================
// Review
// ============================================================================

/// A review of one listing by one author.
///
/// `id`, `author_ref`, `target_ref`, and `created_at` are fixed at creation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Review {
    /// Review ID (assigned at insert).
    pub id: ReviewId,
    /// Free text.
    pub content: String,
    /// Bounded rating.
    pub rating: Rating,
    /// Author who wrote the review.
    pub author_ref: AuthorId,
    /// Listing the review targets.
    pub target_ref: ListingId,
    /// Image references.
    pub image_urls: Vec<String>,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
    /// Last edit timestamp.
    pub updated_at: Option<DateTime<Utc>>,
}

/// Field assignments accepted by the reviews collection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReviewPatch {
    /// Replace the content.
    Content(String),
    /// Replace the rating.
    Rating(Rating),
    /// Replace the image references.
    Images(Vec<String>),
    /// Stamp the edit time.
    UpdatedAt(DateTime<Utc>),
}

/// Queries over reviews.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReviewQuery {
    /// Every review.
    All,
    /// Reviews whose `target_ref` is this listing.
    ForListing(ListingId),
    /// Reviews whose `author_ref` is this author.
    ByAuthor(AuthorId),
}

impl Query<Review> for ReviewQuery {
    fn matches(&self, doc: &Review) -> bool {
        match self {
            Self::All => true,
            Self::ForListing(listing) => doc.target_ref == *listing,
            Self::ByAuthor(author) => doc.author_ref == *author,
        }
    }
}

impl Document for Review {
    type Id = ReviewId;
    type Patch = ReviewPatch;
    type Query = ReviewQuery;
    const COLLECTION: &'static str = "reviews";

    fn id(&self) -> ReviewId {
        self.id
    }

    fn set_id(&mut self, id: ReviewId) {
        self.id = id;
    }

    fn apply(&mut self, patch: ReviewPatch) {
        match patch {
            ReviewPatch::Content(content) => self.content = content,
            ReviewPatch::Rating(rating) => self.rating = rating,
            ReviewPatch::Images(images) => self.image_urls = images,
            ReviewPatch::UpdatedAt(at) => self.updated_at = Some(at),
        }
    }
}

/// Client-supplied fields for a new review.
#[derive(Debug, Clone, Deserialize)]
pub struct NewReview {
    /// Listing being reviewed.
    pub listing_id: ListingId,
    /// Free text (required, non-blank).
    pub content: String,
    /// Raw rating; validated against `1..=5`.
    pub rating: i64,
    /// Image references.
    #[serde(default)]
    pub image_urls: Vec<String>,
}

/// Client-supplied changes to a review. Omitted fields keep their value.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ReviewEdit {
    /// New content.
    #[serde(default)]
    pub content: Option<String>,
    /// New raw rating; validated against `1..=5`.
    #[serde(default)]
    pub rating: Option<i64>,
    /// New image references.
    #[serde(default)]
    pub image_urls: Option<Vec<String>>,
}
