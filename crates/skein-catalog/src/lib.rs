//! # skein-catalog
//!
//! Listing, author and review catalog for Skein.
//!
//! This crate implements the catalog domain, providing:
//!
//! - **Model**: Listings, authors and reviews with validated ratings and handles
//! - **Entity Store**: Three collections with per-document atomic writes
//! - **Review Lifecycle Coordinator**: Ordered create/edit/delete write sequences
//!   that keep back-references and listing averages consistent
//! - **Reconciler**: Detection and repair of orphans and dangling references
//!
//! ## Consistency Model
//!
//! The store offers atomicity per document only. A review is referenced from
//! its listing and its author, so every review mutation touches up to three
//! documents:
//!
//! - **Create** writes the review first, then links it. A failure leaves an
//!   orphan review, which the reconciler re-links.
//! - **Delete** removes the review first, then retracts the links. A failure
//!   leaves dangling references, which the reconciler prunes.
//! - The listing's ref change and average update are always one write, so a
//!   reader never sees a linked review that is not counted in the average.
//!
//! ## Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use skein_catalog::prelude::*;
//!
//! let catalog = Catalog::new(Arc::new(InMemoryEntityStore::new()), CoordinatorOptions::default());
//! let author = catalog.register_author("bob", digest).await?;
//! let acting = Principal::new(author.id);
//! let listing = catalog.create_listing(&acting, new_listing).await?;
//! catalog.create_review(&acting, NewReview { listing_id: listing.id, content, rating: 4, image_urls: vec![] }).await?;
//! ```

#![forbid(unsafe_code)]
#![deny(missing_docs)]
#![deny(rust_2018_idioms)]
#![warn(clippy::pedantic)]

pub mod aggregate;
pub mod auth;
pub mod catalog;
pub mod coordinator;
pub mod error;
pub mod guard;
pub mod metrics;
pub mod model;
pub mod reconciler;
pub mod store;

// Re-export main types at crate root
pub use aggregate::compute_average;
pub use auth::{Authenticator, IssuedToken, Principal};
pub use catalog::{AuthorUpdate, Catalog, ListingSummary};
pub use coordinator::{CoordinatorOptions, ReviewCoordinator};
pub use error::{CatalogError, ErrorKind, Result};
pub use model::{
    Author, Handle, HandleError, Listing, NewListing, NewReview, Rating, RatingError, Review,
    ReviewEdit,
};
pub use reconciler::{
    IssueType, ReconciliationIssue, ReconciliationReport, Reconciler, RepairResult, Severity,
};
pub use store::{EntityStore, InMemoryEntityStore};

/// Prelude module for convenient imports.
pub mod prelude {
    pub use crate::auth::{Authenticator, Principal};
    pub use crate::catalog::{AuthorUpdate, Catalog};
    pub use crate::coordinator::CoordinatorOptions;
    pub use crate::error::{CatalogError, ErrorKind};
    pub use crate::model::{Author, Listing, NewListing, NewReview, Review, ReviewEdit};
    pub use crate::reconciler::Reconciler;
    pub use crate::store::{EntityStore, InMemoryEntityStore};
}
