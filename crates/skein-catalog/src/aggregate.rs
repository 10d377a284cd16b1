//! Rating aggregation.

use crate::model::Rating;

/// Computes the arithmetic mean of a set of ratings.
///
/// Returns `0.0` for an empty set. The sum is accumulated as an integer, so
/// the only rounding is the final division.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn compute_average<I>(ratings: I) -> f64
where
    I: IntoIterator<Item = Rating>,
{
    let (sum, count) = ratings
        .into_iter()
        .fold((0_u64, 0_u64), |(sum, count), rating| {
            (sum + u64::from(rating.get()), count + 1)
        });

    if count == 0 {
        return 0.0;
    }
    sum as f64 / count as f64
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn ratings(values: &[i64]) -> Vec<Rating> {
        values.iter().map(|v| Rating::new(*v).unwrap()).collect()
    }

    #[test]
    fn empty_is_zero() {
        assert!(compute_average(Vec::new()).abs() < f64::EPSILON);
    }

    #[test]
    fn mean_of_ratings() {
        assert!((compute_average(ratings(&[4])) - 4.0).abs() < f64::EPSILON);
        assert!((compute_average(ratings(&[4, 2])) - 3.0).abs() < f64::EPSILON);
        assert!((compute_average(ratings(&[5, 2])) - 3.5).abs() < f64::EPSILON);
        assert!((compute_average(ratings(&[1, 2, 2])) - 5.0 / 3.0).abs() < 1e-12);
    }

    proptest! {
        #[test]
        fn average_stays_within_bounds(values in prop::collection::vec(1_i64..=5, 1..500)) {
            let avg = compute_average(ratings(&values));
            prop_assert!((1.0..=5.0).contains(&avg));
        }

        #[test]
        fn average_is_order_independent(values in prop::collection::vec(1_i64..=5, 0..200)) {
            let mut reversed = values.clone();
            reversed.reverse();
            let forward = compute_average(ratings(&values));
            let backward = compute_average(ratings(&reversed));
            prop_assert!((forward - backward).abs() < 1e-12);
        }
    }
}
