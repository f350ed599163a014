//! Dense vector index over L2-normalized chunk embeddings.
//!
//! Two interchangeable implementations behind one enum: `Flat` scores every
//! row exactly; `Ivf` partitions the corpus into `nlist` coarse cells and
//! probes `nprobe` of them per query. Scores are inner products on unit
//! vectors, so they fall in [-1, 1] and equal cosine similarity.

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::path::Path;

use crate::config::IndexConfig;

/// IVF training refuses corpora smaller than this multiple of `nlist`.
const IVF_MIN_POINTS_PER_LIST: usize = 40;

const KMEANS_ITERATIONS: usize = 10;

#[derive(Debug, Serialize, Deserialize)]
pub enum DenseIndex {
    Flat(FlatIndex),
    Ivf(IvfIndex),
}

/// Exact inner-product search over the full matrix.
#[derive(Debug, Serialize, Deserialize)]
pub struct FlatIndex {
    dim: usize,
    /// Row-major (N, dim); row i belongs to chunk_id i
    vectors: Vec<f32>,
}

/// Inverted-file index: coarse centroids plus per-cell id lists. The full
/// matrix is retained so probed candidates are scored exactly.
#[derive(Debug, Serialize, Deserialize)]
pub struct IvfIndex {
    dim: usize,
    nprobe: usize,
    /// Row-major (nlist, dim)
    centroids: Vec<f32>,
    /// Chunk ids assigned to each centroid
    lists: Vec<Vec<i64>>,
    /// Row-major (N, dim); row i belongs to chunk_id i
    vectors: Vec<f32>,
}

impl DenseIndex {
    /// Build an index from an ordered embedding matrix; row i is chunk i.
    /// IVF is selected only when configured and the corpus is large enough
    /// to train `nlist` centroids.
    pub fn build(embeddings: &[Vec<f32>], config: &IndexConfig) -> Result<Self> {
        let n = embeddings.len();
        let dim = embeddings.first().map(|v| v.len()).unwrap_or(0);
        if embeddings.iter().any(|v| v.len() != dim) {
            bail!("embedding rows have inconsistent dimensions");
        }

        let use_ivf =
            config.faiss_use_ivf && n > config.faiss_ivf_nlist * IVF_MIN_POINTS_PER_LIST;
        tracing::info!(n_vectors = n, dim, use_ivf, "building dense index");

        let mut vectors = Vec::with_capacity(n * dim);
        for row in embeddings {
            vectors.extend_from_slice(row);
        }

        if use_ivf {
            let (centroids, lists) =
                train_ivf(&vectors, n, dim, config.faiss_ivf_nlist);
            Ok(DenseIndex::Ivf(IvfIndex {
                dim,
                nprobe: config.faiss_nprobe.max(1),
                centroids,
                lists,
                vectors,
            }))
        } else {
            Ok(DenseIndex::Flat(FlatIndex { dim, vectors }))
        }
    }

    /// Top-k by inner product, descending score with ties broken by
    /// ascending chunk id. Returns everything when `k > N`, empty when the
    /// index is empty.
    pub fn search(&self, query: &[f32], k: usize) -> Vec<(i64, f32)> {
        match self {
            DenseIndex::Flat(flat) => flat.search(query, k),
            DenseIndex::Ivf(ivf) => ivf.search(query, k),
        }
    }

    pub fn ntotal(&self) -> usize {
        match self {
            DenseIndex::Flat(flat) => flat.ntotal(),
            DenseIndex::Ivf(ivf) => ivf.vectors.len() / ivf.dim.max(1),
        }
    }

    pub fn dim(&self) -> usize {
        match self {
            DenseIndex::Flat(flat) => flat.dim,
            DenseIndex::Ivf(ivf) => ivf.dim,
        }
    }

    pub fn set_nprobe(&mut self, nprobe: usize) {
        if let DenseIndex::Ivf(ivf) = self {
            ivf.nprobe = nprobe.max(1);
        }
    }

    pub fn save(&self, path: &Path) -> Result<u64> {
        let file = std::fs::File::create(path)
            .with_context(|| format!("failed to create {}", path.display()))?;
        let mut writer = std::io::BufWriter::new(file);
        bincode::serialize_into(&mut writer, self).context("failed to serialize dense index")?;
        use std::io::Write;
        writer.flush()?;
        Ok(std::fs::metadata(path)?.len())
    }

    pub fn load(path: &Path) -> Result<Self> {
        let file = std::fs::File::open(path)
            .with_context(|| format!("failed to open {}", path.display()))?;
        let reader = std::io::BufReader::new(file);
        let index: Self =
            bincode::deserialize_from(reader).context("failed to parse dense index")?;
        tracing::info!(total = index.ntotal(), "dense index loaded");
        Ok(index)
    }
}

impl FlatIndex {
    fn ntotal(&self) -> usize {
        if self.dim == 0 {
            0
        } else {
            self.vectors.len() / self.dim
        }
    }

    fn search(&self, query: &[f32], k: usize) -> Vec<(i64, f32)> {
        let n = self.ntotal();
        let mut hits: Vec<(i64, f32)> = (0..n)
            .map(|i| {
                let row = &self.vectors[i * self.dim..(i + 1) * self.dim];
                (i as i64, dot(query, row))
            })
            .collect();
        sort_hits(&mut hits);
        hits.truncate(k);
        hits
    }
}

impl IvfIndex {
    fn search(&self, query: &[f32], k: usize) -> Vec<(i64, f32)> {
        let nlist = self.lists.len();
        if nlist == 0 {
            return Vec::new();
        }

        // Rank cells by centroid similarity and probe the closest nprobe.
        let mut cells: Vec<(usize, f32)> = (0..nlist)
            .map(|c| {
                let row = &self.centroids[c * self.dim..(c + 1) * self.dim];
                (c, dot(query, row))
            })
            .collect();
        cells.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(Ordering::Equal));

        let mut hits: Vec<(i64, f32)> = Vec::new();
        for &(cell, _) in cells.iter().take(self.nprobe) {
            for &id in &self.lists[cell] {
                let row =
                    &self.vectors[id as usize * self.dim..(id as usize + 1) * self.dim];
                hits.push((id, dot(query, row)));
            }
        }
        sort_hits(&mut hits);
        hits.truncate(k);
        hits
    }
}

fn dot(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}

fn sort_hits(hits: &mut [(i64, f32)]) {
    hits.sort_by(|a, b| {
        b.1.partial_cmp(&a.1)
            .unwrap_or(Ordering::Equal)
            .then(a.0.cmp(&b.0))
    });
}

/// Deterministic Lloyd k-means on the unit sphere. Centroids are seeded from
/// evenly spaced corpus rows so training is reproducible without an RNG.
fn train_ivf(vectors: &[f32], n: usize, dim: usize, nlist: usize) -> (Vec<f32>, Vec<Vec<i64>>) {
    let nlist = nlist.min(n).max(1);
    let mut centroids = Vec::with_capacity(nlist * dim);
    for c in 0..nlist {
        let row = c * n / nlist;
        centroids.extend_from_slice(&vectors[row * dim..(row + 1) * dim]);
    }

    let mut assignments = vec![0usize; n];
    for _ in 0..KMEANS_ITERATIONS {
        // Assign each vector to its nearest centroid by inner product.
        for i in 0..n {
            let row = &vectors[i * dim..(i + 1) * dim];
            let mut best = 0usize;
            let mut best_score = f32::NEG_INFINITY;
            for c in 0..nlist {
                let score = dot(row, &centroids[c * dim..(c + 1) * dim]);
                if score > best_score {
                    best_score = score;
                    best = c;
                }
            }
            assignments[i] = best;
        }

        // Recompute centroids as normalized means; empty cells keep theirs.
        let mut sums = vec![0f32; nlist * dim];
        let mut counts = vec![0usize; nlist];
        for i in 0..n {
            let c = assignments[i];
            counts[c] += 1;
            for d in 0..dim {
                sums[c * dim + d] += vectors[i * dim + d];
            }
        }
        for c in 0..nlist {
            if counts[c] == 0 {
                continue;
            }
            let cell = &mut sums[c * dim..(c + 1) * dim];
            let norm = cell.iter().map(|x| x * x).sum::<f32>().sqrt();
            if norm > 0.0 {
                for (d, value) in cell.iter().enumerate() {
                    centroids[c * dim + d] = value / norm;
                }
            }
        }
    }

    let mut lists: Vec<Vec<i64>> = vec![Vec::new(); nlist];
    for (i, &c) in assignments.iter().enumerate() {
        lists[c].push(i as i64);
    }
    (centroids, lists)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unit(v: Vec<f32>) -> Vec<f32> {
        let norm = v.iter().map(|x| x * x).sum::<f32>().sqrt();
        v.into_iter().map(|x| x / norm).collect()
    }

    fn flat_config() -> IndexConfig {
        IndexConfig::default()
    }

    #[test]
    fn test_self_similarity_is_one() {
        let rows = vec![
            unit(vec![1.0, 0.0, 0.0]),
            unit(vec![0.0, 1.0, 0.0]),
            unit(vec![0.6, 0.8, 0.0]),
        ];
        let index = DenseIndex::build(&rows, &flat_config()).unwrap();

        let hits = index.search(&rows[2], 3);
        assert_eq!(hits[0].0, 2);
        assert!((hits[0].1 - 1.0).abs() < 1e-5);
    }

    #[test]
    fn test_descending_scores_and_k_cap() {
        let rows = vec![
            unit(vec![1.0, 0.0]),
            unit(vec![0.9, 0.1]),
            unit(vec![0.0, 1.0]),
        ];
        let index = DenseIndex::build(&rows, &flat_config()).unwrap();

        let hits = index.search(&unit(vec![1.0, 0.0]), 2);
        assert_eq!(hits.len(), 2);
        assert!(hits[0].1 >= hits[1].1);
        assert_eq!(hits[0].0, 0);

        // k > N returns all
        assert_eq!(index.search(&unit(vec![1.0, 0.0]), 99).len(), 3);
    }

    #[test]
    fn test_empty_index() {
        let index = DenseIndex::build(&[], &flat_config()).unwrap();
        assert_eq!(index.ntotal(), 0);
        assert!(index.search(&[1.0, 0.0], 5).is_empty());
    }

    #[test]
    fn test_ties_broken_by_ascending_id() {
        let v = unit(vec![0.5, 0.5]);
        let rows = vec![v.clone(), v.clone(), v.clone()];
        let index = DenseIndex::build(&rows, &flat_config()).unwrap();
        let hits = index.search(&v, 3);
        assert_eq!(
            hits.iter().map(|h| h.0).collect::<Vec<_>>(),
            vec![0, 1, 2]
        );
    }

    #[test]
    fn test_bincode_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("faiss.index");

        let rows: Vec<Vec<f32>> = (0..8)
            .map(|i| unit(vec![(i as f32).cos(), (i as f32).sin()]))
            .collect();
        let index = DenseIndex::build(&rows, &flat_config()).unwrap();
        let query = unit(vec![0.3, 0.7]);
        let before = index.search(&query, 4);
        index.save(&path).unwrap();

        let reloaded = DenseIndex::load(&path).unwrap();
        assert_eq!(reloaded.ntotal(), 8);
        assert_eq!(reloaded.dim(), 2);
        assert_eq!(reloaded.search(&query, 4), before);
    }

    #[test]
    fn test_ivf_matches_flat_with_full_probe() {
        // 3 well-separated clusters in 4d, enough points to trigger IVF
        let nlist = 3;
        let mut rows = Vec::new();
        for i in 0..150 {
            let axis = i % 3;
            let mut v = vec![0.05f32; 4];
            v[axis] = 1.0;
            v[3] = (i as f32 % 7.0) / 100.0;
            rows.push(unit(v));
        }

        let ivf_config = IndexConfig {
            faiss_use_ivf: true,
            faiss_nprobe: nlist, // probe everything: must match exact search
            faiss_ivf_nlist: nlist,
        };
        let ivf = DenseIndex::build(&rows, &ivf_config).unwrap();
        assert!(matches!(ivf, DenseIndex::Ivf(_)));

        let flat = DenseIndex::build(&rows, &flat_config()).unwrap();

        let query = unit(vec![0.9, 0.1, 0.0, 0.05]);
        assert_eq!(ivf.search(&query, 10), flat.search(&query, 10));
    }

    #[test]
    fn test_ivf_falls_back_to_flat_when_corpus_small() {
        let rows = vec![unit(vec![1.0, 0.0]), unit(vec![0.0, 1.0])];
        let config = IndexConfig {
            faiss_use_ivf: true,
            faiss_nprobe: 8,
            faiss_ivf_nlist: 100,
        };
        let index = DenseIndex::build(&rows, &config).unwrap();
        assert!(matches!(index, DenseIndex::Flat(_)));
    }
}
