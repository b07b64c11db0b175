//! The k-means map/reduce task: assign every row of a chunk to its closest
//! centroid and accumulate per-cluster sums.
use crate::dataset::{Chunk, RowDecoder};
use crate::error::LiquidError;
use crate::executor::Task;
use serde::{Deserialize, Serialize};

/// The request shipped to every chunk: which columns to read and the
/// current centroids.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct KMeansTask {
    /// The columns that make up a point, in order
    pub cols: Vec<usize>,
    /// One vector per cluster, each `cols.len()` long
    pub centroids: Vec<Vec<f64>>,
}

/// The result of a `KMeansTask` over one or more chunks.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct KMeansPartial {
    /// Per cluster, the elementwise sum of the points assigned to it
    pub sums: Vec<Vec<f64>>,
    /// Per cluster, the number of points assigned to it
    pub counts: Vec<u64>,
    /// Sum of the squared distance of every point to its centroid
    pub error: f64,
    /// Rows skipped because one of their selected columns was missing
    pub skipped: u64,
}

impl KMeansPartial {
    /// An empty partial result for `k` clusters of dimension `dim`.
    pub fn new(k: usize, dim: usize) -> Self {
        KMeansPartial {
            sums: vec![vec![0.0; dim]; k],
            counts: vec![0; k],
            error: 0.0,
            skipped: 0,
        }
    }

    /// Adds `point` to the cluster `cluster`, at squared distance `dist`.
    pub fn add(&mut self, cluster: usize, point: &[f64], dist: f64) {
        for (sum, v) in self.sums[cluster].iter_mut().zip(point) {
            *sum += v;
        }
        self.counts[cluster] += 1;
        self.error += dist;
    }

    /// Merges `other` into `self`. Partials of different shapes are padded
    /// to the larger shape.
    pub fn merge(mut self, other: KMeansPartial) -> Self {
        if self.sums.len() < other.sums.len() {
            self.sums.resize(other.sums.len(), Vec::new());
            self.counts.resize(other.counts.len(), 0);
        }
        for (mine, theirs) in self.sums.iter_mut().zip(other.sums) {
            if mine.len() < theirs.len() {
                mine.resize(theirs.len(), 0.0);
            }
            for (a, b) in mine.iter_mut().zip(theirs) {
                *a += b;
            }
        }
        for (a, b) in self.counts.iter_mut().zip(other.counts) {
            *a += b;
        }
        self.error += other.error;
        self.skipped += other.skipped;
        self
    }

    /// The number of points that were assigned to a cluster.
    pub fn n_assigned(&self) -> u64 {
        self.counts.iter().sum()
    }
}

/// The closest centroid to a point and the squared distance to it.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ClusterDist {
    pub cluster: usize,
    pub dist: f64,
}

/// The squared Euclidean distance between `a` and `b`.
pub fn squared_distance(a: &[f64], b: &[f64]) -> f64 {
    a.iter()
        .zip(b)
        .map(|(x, y)| {
            let d = x - y;
            d * d
        })
        .sum()
}

/// Finds the centroid closest to `point`. Ties go to the lowest index.
/// Returns `None` if there are no centroids.
pub fn closest(point: &[f64], centroids: &[Vec<f64>]) -> Option<ClusterDist> {
    let mut best: Option<ClusterDist> = None;
    let mut min = f64::INFINITY;
    for (cluster, centroid) in centroids.iter().enumerate() {
        let dist = squared_distance(point, centroid);
        if best.is_none() || dist < min {
            min = dist;
            best = Some(ClusterDist { cluster, dist });
        }
    }
    best
}

impl Task for KMeansTask {
    type Output = KMeansPartial;

    fn map(&self, chunk: &Chunk) -> Result<KMeansPartial, LiquidError> {
        let decoder = RowDecoder::new(chunk, &self.cols)?;
        let mut partial = KMeansPartial::new(self.centroids.len(), self.cols.len());
        let mut point = vec![0.0; self.cols.len()];
        for row in 0..chunk.n_rows() {
            decoder.fill(row, &mut point)?;
            if point.iter().any(|v| v.is_nan()) {
                partial.skipped += 1;
                continue;
            }
            match closest(&point, &self.centroids) {
                Some(c) => partial.add(c.cluster, &point, c.dist),
                None => partial.skipped += 1,
            }
        }
        Ok(partial)
    }

    fn reduce(&self, a: KMeansPartial, b: KMeansPartial) -> KMeansPartial {
        a.merge(b)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::{encode_chunks, infer_schema, RawColumn};
    use approx::assert_relative_eq;

    #[test]
    fn test_closest_ties_go_low() {
        let centroids = vec![vec![0.0], vec![2.0], vec![2.0]];
        let c = closest(&[1.0], &centroids).unwrap();
        assert_eq!(c.cluster, 0);
        assert_relative_eq!(c.dist, 1.0);
        assert_eq!(closest(&[2.0], &centroids).unwrap().cluster, 1);
        assert!(closest(&[2.0], &[]).is_none());
    }

    #[test]
    fn test_closest_with_overflowing_distances() {
        let c = closest(&[1e200], &[vec![0.0], vec![1.0]]).unwrap();
        assert_eq!(c.cluster, 0);
        assert_eq!(c.dist, f64::INFINITY);

        let raw = vec![RawColumn::from_values(None, &[1.0, 1e200])];
        let schema = infer_schema(&raw).unwrap();
        let chunks = encode_chunks(&schema, &raw, 2).unwrap();
        let task = KMeansTask {
            cols: vec![0],
            centroids: vec![vec![0.0]],
        };
        let p = task.map(&chunks[0]).unwrap();
        assert_eq!(p.counts, vec![2]);
        assert_eq!(p.skipped, 0);
        assert_eq!(p.error, f64::INFINITY);
    }

    #[test]
    fn test_map_chunk() {
        let raw = vec![
            RawColumn::from_values(Some("id"), &[0.0, 1.0, 2.0, 3.0]),
            RawColumn::new(Some("x"), vec![Some(1.0), Some(3.0), None, Some(10.0)]),
        ];
        let schema = infer_schema(&raw).unwrap();
        let chunks = encode_chunks(&schema, &raw, 4).unwrap();
        let task = KMeansTask {
            cols: vec![1],
            centroids: vec![vec![2.0], vec![9.0]],
        };
        let p = task.map(&chunks[0]).unwrap();
        assert_eq!(p.counts, vec![2, 1]);
        assert_relative_eq!(p.sums[0][0], 4.0);
        assert_relative_eq!(p.sums[1][0], 10.0);
        assert_relative_eq!(p.error, 3.0);
        assert_eq!(p.skipped, 1);
    }

    #[test]
    fn test_map_rejects_bad_columns() {
        let raw = vec![RawColumn::from_values(None, &[1.0, 2.0])];
        let schema = infer_schema(&raw).unwrap();
        let chunks = encode_chunks(&schema, &raw, 2).unwrap();
        let task = KMeansTask {
            cols: vec![3],
            centroids: vec![vec![0.0]],
        };
        assert!(matches!(task.map(&chunks[0]), Err(LiquidError::Decode(_))));
    }

    #[test]
    fn test_merge() {
        let mut a = KMeansPartial::new(2, 1);
        a.add(0, &[1.0], 0.5);
        let mut b = KMeansPartial::new(2, 1);
        b.add(1, &[4.0], 1.0);
        b.skipped = 2;
        let m = a.merge(b);
        assert_eq!(m.counts, vec![1, 1]);
        assert_eq!(m.sums, vec![vec![1.0], vec![4.0]]);
        assert_relative_eq!(m.error, 1.5);
        assert_eq!(m.skipped, 2);
        assert_eq!(m.n_assigned(), 2);
    }
}
