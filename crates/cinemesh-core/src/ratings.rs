//! MovieLens-style ratings dataset loader.
//!
//! The coordinator loads the full `userID → (movieID → rating)` map once at
//! startup; it is never mutated afterwards. Rows that do not parse are
//! skipped — MovieLens exports carry a header and occasionally trailing
//! columns, and partial data beats no data for a recommender.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use crate::message::{RatingVector, UserId};

/// The full dataset: one rating vector per user.
pub type UserRatings = HashMap<UserId, RatingVector>;

#[derive(Debug, thiserror::Error)]
pub enum RatingsError {
    #[error("failed to open {0}: {1}")]
    Open(PathBuf, #[source] csv::Error),
    #[error("failed to read ratings record: {0}")]
    Read(#[source] csv::Error),
    #[error("no ratings found in {0}")]
    Empty(PathBuf),
}

/// Read a ratings CSV (`userId,movieId,rating,...`, header skipped) and
/// return the ratings map together with the sorted list of user IDs.
pub fn load_user_ratings(path: &Path) -> Result<(UserRatings, Vec<UserId>), RatingsError> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_path(path)
        .map_err(|e| RatingsError::Open(path.to_path_buf(), e))?;

    let mut ratings = UserRatings::new();
    let mut skipped = 0usize;

    for record in reader.records() {
        let record = record.map_err(RatingsError::Read)?;
        let parsed = record.get(0).and_then(|u| {
            let user: UserId = u.trim().parse().ok()?;
            let movie: u32 = record.get(1)?.trim().parse().ok()?;
            let rating: f64 = record.get(2)?.trim().parse().ok()?;
            rating.is_finite().then_some((user, movie, rating))
        });
        match parsed {
            Some((user, movie, rating)) => {
                ratings.entry(user).or_default().insert(movie, rating);
            }
            None => skipped += 1,
        }
    }

    if ratings.is_empty() {
        return Err(RatingsError::Empty(path.to_path_buf()));
    }
    if skipped > 0 {
        tracing::warn!(skipped, path = %path.display(), "skipped unparsable rating rows");
    }

    let mut user_ids: Vec<UserId> = ratings.keys().copied().collect();
    user_ids.sort_unstable();

    Ok((ratings, user_ids))
}
