//! # skein-core
//!
//! Core abstractions shared by every Skein component.
//!
//! This crate provides the foundational types and traits used across the catalog
//! and the API layer:
//!
//! - **Identifiers**: Strongly-typed ULID ids for listings, authors, and reviews
//! - **Document Store Contract**: Per-document atomic read, insert, update, and
//!   back-reference push/pull primitives
//! - **Error Types**: Shared error definitions and result types
//! - **Observability**: Logging initialization and span helpers
//!
//! ## Crate Boundary
//!
//! `skein-core` knows nothing about yarn, ratings, or reviews. It defines the
//! storage contract that the catalog's consistency protocol is written against;
//! the domain types live in `skein-catalog`.
//!
//! ## Example
//!
//! ```rust
//! use skein_core::prelude::*;
//!
//! let listing = ListingId::generate();
//! let review = ReviewId::generate();
//! assert_ne!(listing.to_string(), review.to_string());
//! ```

#![forbid(unsafe_code)]
#![deny(missing_docs)]
#![deny(rust_2018_idioms)]
#![warn(clippy::pedantic)]

pub mod error;
pub mod id;
pub mod memory;
pub mod observability;
pub mod store;

/// Prelude module for convenient imports.
///
/// # Example
///
/// ```rust
/// use skein_core::prelude::*;
/// ```
pub mod prelude {
    pub use crate::error::{Error, Result};
    pub use crate::id::{AuthorId, ListingId, ReviewId};
    pub use crate::memory::MemoryCollection;
    pub use crate::store::{
        Collection, Document, Query, Update, Versioned, WritePrecondition, WriteResult,
    };
}

// Re-export key types at crate root for ergonomics
pub use error::{Error, Result};
pub use id::{AuthorId, ListingId, ReviewId};
pub use memory::MemoryCollection;
pub use observability::{LogFormat, init_logging};
pub use store::{Collection, Document, Query, Update, Versioned, WritePrecondition, WriteResult};
