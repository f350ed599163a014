//! Reciprocal Rank Fusion over multiple ranked lists.

use std::collections::HashMap;

/// Fuse ranked lists of `(chunk_id, score)` pairs, each sorted descending.
///
/// Every id present in any list receives `sum over lists of
/// 1 / (k + rank + 1)` where `rank` is its 0-based position in that list.
/// The original per-retriever scores do not contribute. Output is sorted by
/// fused score descending, ties broken by ascending chunk id, truncated to
/// `top_n`.
pub fn reciprocal_rank_fusion(
    results_lists: &[Vec<(i64, f32)>],
    k: usize,
    top_n: usize,
) -> Vec<(i64, f32)> {
    let mut rrf_scores: HashMap<i64, f32> = HashMap::new();
    for ranked_list in results_lists {
        for (rank, &(doc_id, _score)) in ranked_list.iter().enumerate() {
            *rrf_scores.entry(doc_id).or_insert(0.0) += 1.0 / (k as f32 + rank as f32 + 1.0);
        }
    }

    let mut fused: Vec<(i64, f32)> = rrf_scores.into_iter().collect();
    fused.sort_by(|a, b| {
        b.1.partial_cmp(&a.1)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then(a.0.cmp(&b.0))
    });
    fused.truncate(top_n);
    fused
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_single_list_preserves_order() {
        let list = vec![(3, 0.9), (1, 0.5), (2, 0.1)];
        let fused = reciprocal_rank_fusion(&[list], 60, 10);
        let ids: Vec<i64> = fused.iter().map(|f| f.0).collect();
        assert_eq!(ids, vec![3, 1, 2]);
    }

    #[test]
    fn test_k_zero_rank_one_wins() {
        // With k=0 the top of either list scores 1.0, dominating everything
        let a = vec![(7, 0.4), (1, 0.3)];
        let b = vec![(1, 0.9), (7, 0.8)];
        let fused = reciprocal_rank_fusion(&[a, b], 0, 10);
        // Both ids score 1.0 + 0.5; tie broken by ascending id
        assert_eq!(fused[0].0, 1);
        assert!((fused[0].1 - 1.5).abs() < 1e-6);
    }

    #[test]
    fn test_hybrid_fusion_surfaces_consensus() {
        // dense [c1, c2, c0], sparse [c0, c1, c2] with k=60:
        // c1 = 1/61 + 1/62, c0 = 1/63 + 1/61, c2 = 1/62 + 1/63
        let dense = vec![(1, 0.9), (2, 0.8), (0, 0.7)];
        let sparse = vec![(0, 5.0), (1, 4.0), (2, 3.0)];
        let fused = reciprocal_rank_fusion(&[dense, sparse], 60, 10);

        let ids: Vec<i64> = fused.iter().map(|f| f.0).collect();
        assert_eq!(ids, vec![1, 0, 2]);
        assert!((fused[0].1 - (1.0 / 61.0 + 1.0 / 62.0)).abs() < 1e-6);
        assert!((fused[1].1 - (1.0 / 63.0 + 1.0 / 61.0)).abs() < 1e-6);
        assert!((fused[2].1 - (1.0 / 62.0 + 1.0 / 63.0)).abs() < 1e-6);
    }

    #[test]
    fn test_ties_broken_by_ascending_id() {
        let a = vec![(9, 1.0)];
        let b = vec![(4, 1.0)];
        let fused = reciprocal_rank_fusion(&[a, b], 60, 10);
        assert_eq!(fused[0].0, 4);
        assert_eq!(fused[1].0, 9);
    }

    #[test]
    fn test_top_n_truncation() {
        let list: Vec<(i64, f32)> = (0..20).map(|i| (i, 20.0 - i as f32)).collect();
        let fused = reciprocal_rank_fusion(&[list], 60, 5);
        assert_eq!(fused.len(), 5);
    }

    #[test]
    fn test_empty_input() {
        assert!(reciprocal_rank_fusion(&[], 60, 10).is_empty());
        assert!(reciprocal_rank_fusion(&[vec![]], 60, 10).is_empty());
    }
}
