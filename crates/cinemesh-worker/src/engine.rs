//! Cosine-similarity ranking over one block of candidate users.
//!
//! Pure functions, no I/O and no shared state. The coordinator never sees
//! this module — only the RESULT frames it produces.

use cinemesh_core::message::{Neighbor, RatingVector, Task};

/// Cosine similarity between two sparse rating vectors.
///
/// The dot product runs over the intersection of rated movies; the norms
/// run over each full vector. Zero when either vector has zero norm.
pub fn cosine_similarity(target: &RatingVector, candidate: &RatingVector) -> f64 {
    let mut dot = 0.0;
    let mut target_norm_sq = 0.0;
    for (movie, rating) in target {
        if let Some(other) = candidate.get(movie) {
            dot += rating * other;
        }
        target_norm_sq += rating * rating;
    }

    let candidate_norm_sq: f64 = candidate.values().map(|r| r * r).sum();

    if target_norm_sq == 0.0 || candidate_norm_sq == 0.0 {
        return 0.0;
    }
    dot / (target_norm_sq.sqrt() * candidate_norm_sq.sqrt())
}

/// Rank every candidate in the task against the target and keep the best.
///
/// Candidates with non-positive similarity are dropped; the survivors are
/// sorted strictly descending and truncated to the task's `k`. Ties keep
/// an arbitrary order.
pub fn rank_neighbors(task: &Task) -> Vec<Neighbor> {
    let mut neighbors: Vec<Neighbor> = task
        .candidate_ratings
        .iter()
        .filter_map(|(user, ratings)| {
            let similarity = cosine_similarity(&task.target_ratings, ratings);
            (similarity > 0.0).then(|| Neighbor {
                id: user.to_string(),
                similarity,
            })
        })
        .collect();

    neighbors.sort_unstable_by(|a, b| b.similarity.total_cmp(&a.similarity));
    neighbors.truncate(task.k);
    neighbors
}

#[cfg(test)]
mod tests {
    use super::*;
    use cinemesh_core::message::Block;
    use std::collections::HashMap;

    fn task(
        target: &[(u32, f64)],
        candidates: &[(u32, &[(u32, f64)])],
        k: usize,
    ) -> Task {
        Task {
            job_id: "test".into(),
            block_id: Block {
                start_id: 0,
                end_id: candidates.len().saturating_sub(1),
            },
            k,
            target_ratings: target.iter().copied().collect(),
            candidate_ratings: candidates
                .iter()
                .map(|(id, ratings)| (*id, ratings.iter().copied().collect()))
                .collect(),
        }
    }

    #[test]
    fn identical_vectors_have_similarity_one() {
        let v: RatingVector = HashMap::from([(1, 3.0), (2, 4.0)]);
        let sim = cosine_similarity(&v, &v.clone());
        assert!((sim - 1.0).abs() < 1e-12);
    }

    #[test]
    fn hand_computed_similarity() {
        // target {10:5, 20:4}, candidate {10:3, 20:5}
        // dot = 15 + 20 = 35, |t| = sqrt(41), |c| = sqrt(34)
        let target: RatingVector = HashMap::from([(10, 5.0), (20, 4.0)]);
        let candidate: RatingVector = HashMap::from([(10, 3.0), (20, 5.0)]);
        let expected = 35.0 / (41.0_f64.sqrt() * 34.0_f64.sqrt());
        assert!((cosine_similarity(&target, &candidate) - expected).abs() < 1e-12);
    }

    #[test]
    fn norms_cover_unshared_movies() {
        // Only movie 10 is shared; candidate's movie 30 still widens its norm.
        let target: RatingVector = HashMap::from([(10, 5.0), (20, 4.0)]);
        let candidate: RatingVector = HashMap::from([(10, 4.0), (30, 2.0)]);
        let expected = 20.0 / (41.0_f64.sqrt() * 20.0_f64.sqrt());
        assert!((cosine_similarity(&target, &candidate) - expected).abs() < 1e-12);
    }

    #[test]
    fn zero_norm_yields_zero() {
        let empty = RatingVector::new();
        let rated: RatingVector = HashMap::from([(1, 5.0)]);
        assert_eq!(cosine_similarity(&empty, &rated), 0.0);
        assert_eq!(cosine_similarity(&rated, &empty), 0.0);
        let zeroed: RatingVector = HashMap::from([(1, 0.0)]);
        assert_eq!(cosine_similarity(&zeroed, &rated), 0.0);
    }

    #[test]
    fn disjoint_vectors_have_zero_similarity() {
        let a: RatingVector = HashMap::from([(1, 4.0)]);
        let b: RatingVector = HashMap::from([(2, 4.0)]);
        assert_eq!(cosine_similarity(&a, &b), 0.0);
    }

    #[test]
    fn neighbors_are_sorted_descending() {
        let task = task(
            &[(10, 5.0), (20, 4.0)],
            &[
                (2, &[(10, 4.0), (30, 2.0)]),
                (3, &[(10, 3.0), (20, 5.0)]),
                (4, &[(99, 1.0)]),
            ],
            30,
        );

        let neighbors = rank_neighbors(&task);
        assert_eq!(neighbors.len(), 2, "disjoint candidate must be dropped");
        assert_eq!(neighbors[0].id, "3");
        assert_eq!(neighbors[1].id, "2");
        assert!(neighbors[0].similarity > neighbors[1].similarity);
    }

    #[test]
    fn truncates_to_k() {
        let candidates: Vec<(u32, Vec<(u32, f64)>)> = (1..=10)
            .map(|u| (u, vec![(1, f64::from(u))]))
            .collect();
        let borrowed: Vec<(u32, &[(u32, f64)])> = candidates
            .iter()
            .map(|(u, r)| (*u, r.as_slice()))
            .collect();
        let task = task(&[(1, 5.0)], &borrowed, 3);

        let neighbors = rank_neighbors(&task);
        assert_eq!(neighbors.len(), 3);
    }

    #[test]
    fn k_zero_returns_nothing() {
        let task = task(&[(1, 5.0)], &[(2, &[(1, 4.0)])], 0);
        assert!(rank_neighbors(&task).is_empty());
    }

    #[test]
    fn similarity_stays_within_unit_range() {
        let target: RatingVector = HashMap::from([(1, 5.0), (2, 1.0), (3, 3.0)]);
        let candidate: RatingVector = HashMap::from([(1, 2.5), (2, 0.5), (3, 1.5)]);
        let sim = cosine_similarity(&target, &candidate);
        assert!(sim <= 1.0 + 1e-12);
        assert!((sim - 1.0).abs() < 1e-9, "parallel vectors should be ~1");
    }
}
