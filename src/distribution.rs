use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};

use crate::error::{ChunkStoreError, Result};
use crate::model::Destination;

/// How replicas are spread over the destination pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlacementPolicy {
    #[default]
    RoundRobin,
    /// Seeded shuffle per chunk index; reproducible for the same pool and seed.
    Random,
    /// Declared for configuration compatibility; places exactly like `RoundRobin`.
    SizeBased,
}

impl std::str::FromStr for PlacementPolicy {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "round_robin" | "round-robin" | "roundrobin" => Ok(PlacementPolicy::RoundRobin),
            "random" => Ok(PlacementPolicy::Random),
            "size_based" | "size-based" => Ok(PlacementPolicy::SizeBased),
            _ => Err(format!("Unknown load balancing strategy: {}", s)),
        }
    }
}

/// Pure mapping from chunk index to the destinations that should hold it.
#[derive(Debug, Clone)]
pub struct DistributionStrategy {
    pool: Vec<Destination>,
    replication: usize,
    policy: PlacementPolicy,
    seed: u64,
}

impl DistributionStrategy {
    pub fn new(pool: Vec<Destination>, replication: usize, policy: PlacementPolicy) -> Result<Self> {
        if replication == 0 {
            return Err(ChunkStoreError::config("replication count must be at least 1"));
        }
        if !pool.is_empty() && replication > pool.len() {
            tracing::warn!(
                replication,
                pool_size = pool.len(),
                "Replication count exceeds destination pool; each chunk gets one replica per destination"
            );
        }
        Ok(Self {
            pool,
            replication,
            policy,
            seed: 0,
        })
    }

    pub fn round_robin(pool: Vec<Destination>, replication: usize) -> Result<Self> {
        Self::new(pool, replication, PlacementPolicy::RoundRobin)
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    pub fn pool(&self) -> &[Destination] {
        &self.pool
    }

    pub fn replication(&self) -> usize {
        self.replication
    }

    pub fn policy(&self) -> PlacementPolicy {
        self.policy
    }

    /// Ordered destinations for one chunk.
    ///
    /// An empty pool yields the single local-only sentinel. Otherwise the result has
    /// `min(replication, pool size)` distinct entries.
    pub fn destinations_for(&self, chunk_index: usize) -> Vec<Destination> {
        if self.pool.is_empty() {
            return vec![Destination::local_only()];
        }
        let copies = self.replication.min(self.pool.len());

        match self.policy {
            PlacementPolicy::Random => {
                let mut rng = StdRng::seed_from_u64(
                    self.seed ^ (chunk_index as u64).wrapping_mul(0x9E37_79B9_7F4A_7C15),
                );
                rand::seq::index::sample(&mut rng, self.pool.len(), copies)
                    .into_iter()
                    .map(|i| self.pool[i].clone())
                    .collect()
            }
            PlacementPolicy::RoundRobin | PlacementPolicy::SizeBased => (0..copies)
                .map(|replica| self.pool[(chunk_index % self.pool.len() + replica) % self.pool.len()].clone())
                .collect(),
        }
    }
}
