//! Strategies for picking the rows that seed the initial centroids.
use rand::rngs::StdRng;
use rand::seq::index::sample;
use rand::{Rng, SeedableRng};

/// Picks the rows whose values become the initial centroids. Centroid `i`
/// is seeded from the `i`-th returned row; centroids without a row start at
/// the fallback vector.
pub trait Seeder {
    /// Picks at most `k` row indices, each `< n_rows`.
    fn seed_rows(&mut self, n_rows: usize, k: usize) -> Vec<usize>;
}

fn rng(seed: Option<u64>) -> StdRng {
    match seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_entropy(),
    }
}

/// Seeds only the first centroid, from a uniformly random row.
#[derive(Debug)]
pub struct RandomRow {
    rng: StdRng,
}

impl RandomRow {
    pub fn new() -> Self {
        RandomRow { rng: rng(None) }
    }

    pub fn with_seed(seed: u64) -> Self {
        RandomRow { rng: rng(Some(seed)) }
    }
}

impl Default for RandomRow {
    fn default() -> Self {
        RandomRow::new()
    }
}

impl Seeder for RandomRow {
    fn seed_rows(&mut self, n_rows: usize, k: usize) -> Vec<usize> {
        if n_rows == 0 || k == 0 {
            return Vec::new();
        }
        vec![self.rng.gen_range(0..n_rows)]
    }
}

/// Seeds every centroid from `k` distinct, uniformly random rows.
#[derive(Debug)]
pub struct RandomRows {
    rng: StdRng,
}

impl RandomRows {
    pub fn new() -> Self {
        RandomRows { rng: rng(None) }
    }

    pub fn with_seed(seed: u64) -> Self {
        RandomRows { rng: rng(Some(seed)) }
    }
}

impl Default for RandomRows {
    fn default() -> Self {
        RandomRows::new()
    }
}

impl Seeder for RandomRows {
    fn seed_rows(&mut self, n_rows: usize, k: usize) -> Vec<usize> {
        sample(&mut self.rng, n_rows, k.min(n_rows)).into_vec()
    }
}

/// Seeds centroids from explicitly chosen rows.
#[derive(Debug, Clone, PartialEq)]
pub struct FixedRows(pub Vec<usize>);

impl Seeder for FixedRows {
    fn seed_rows(&mut self, n_rows: usize, k: usize) -> Vec<usize> {
        self.0
            .iter()
            .copied()
            .filter(|&row| row < n_rows)
            .take(k)
            .collect()
    }
}
