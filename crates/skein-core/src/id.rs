//! Strongly-typed identifiers for Skein entities.
//!
//! All identifiers in Skein are:
//! - **Strongly typed**: Prevents mixing up a listing ID with a review ID at compile time
//! - **Lexicographically sortable**: ULIDs encode creation time and sort naturally,
//!   so ordering a collection by ID is ordering it by creation
//! - **Globally unique**: Assigned by the store at insert time without coordination
//!
//! # Example
//!
//! ```rust
//! use skein_core::id::{ListingId, ReviewId};
//!
//! let listing = ListingId::generate();
//! let review = ReviewId::generate();
//!
//! // IDs are different types - this won't compile:
//! // let wrong: ListingId = review;
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::{Mutex, OnceLock};
use ulid::{Generator, Ulid};

use crate::error::{Error, Result};

static GENERATOR: OnceLock<Mutex<Generator>> = OnceLock::new();

/// Returns a ULID strictly greater than every ULID previously returned by this process.
///
/// Monotonicity within one millisecond keeps "ordered by id" equal to
/// "ordered by creation", which back-reference arrays and listings rely on.
fn next_ulid() -> Ulid {
    let generator = GENERATOR.get_or_init(|| Mutex::new(Generator::new()));
    match generator.lock() {
        Ok(mut generator) => generator.generate().unwrap_or_else(|_| Ulid::new()),
        Err(_) => Ulid::new(),
    }
}

macro_rules! ulid_id {
    ($(#[$meta:meta])* $name:ident, $label:literal) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(Ulid);

        impl $name {
            /// Generates a new unique ID, monotonic within this process.
            #[must_use]
            pub fn generate() -> Self {
                Self(next_ulid())
            }

            /// Creates an ID from a raw ULID.
            #[must_use]
            pub const fn from_ulid(ulid: Ulid) -> Self {
                Self(ulid)
            }

            /// Returns the underlying ULID.
            #[must_use]
            pub const fn as_ulid(&self) -> Ulid {
                self.0
            }

            /// Returns the creation timestamp encoded in the ID.
            #[must_use]
            pub fn created_at(&self) -> chrono::DateTime<chrono::Utc> {
                let ms = i64::try_from(self.0.timestamp_ms()).unwrap_or(i64::MAX);
                chrono::DateTime::from_timestamp_millis(ms).unwrap_or_else(chrono::Utc::now)
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl FromStr for $name {
            type Err = Error;

            fn from_str(s: &str) -> Result<Self> {
                Ulid::from_string(s)
                    .map(Self)
                    .map_err(|e| Error::InvalidId {
                        message: format!(concat!("invalid ", $label, " ID '{}': {}"), s, e),
                    })
            }
        }
    };
}

ulid_id!(
    /// A unique identifier for a yarn product listing.
    ListingId,
    "listing"
);

ulid_id!(
    /// A unique identifier for an author (a registered user).
    AuthorId,
    "author"
);

ulid_id!(
    /// A unique identifier for a review.
    ///
    /// Review IDs are the values stored in the back-reference arrays of
    /// listings and authors.
    ReviewId,
    "review"
);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn review_id_roundtrip() {
        let id = ReviewId::generate();
        let parsed: ReviewId = id.to_string().parse().unwrap();
        assert_eq!(id, parsed);
    }

    #[test]
    fn ids_are_unique() {
        assert_ne!(ListingId::generate(), ListingId::generate());
    }

    #[test]
    fn invalid_id_names_the_entity() {
        let err = "not-a-valid-ulid".parse::<AuthorId>().unwrap_err();
        assert!(err.to_string().contains("invalid author ID"));
    }

    #[test]
    fn generated_ids_are_monotonic() {
        let ids: Vec<ReviewId> = (0..64).map(|_| ReviewId::generate()).collect();
        assert!(ids.windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn ids_sort_by_creation_time() {
        let earlier = ReviewId::from_ulid(Ulid::from_parts(1_000, 7));
        let later = ReviewId::from_ulid(Ulid::from_parts(2_000, 1));
        assert!(earlier < later);
        assert_eq!(earlier.created_at().timestamp_millis(), 1_000);
    }
}
