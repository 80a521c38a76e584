//! In-process embedding and clustering
//!
//! A [`LocalEngine`] is built once at startup and shared by every session
//! through [`LocalClassifier`]. The bundled embedder/clusterer pair is a
//! lightweight k-mer profile grouping; other engines plug in through the
//! [`Embedder`] and [`Clusterer`] traits.

use crate::config::LocalEngineConfig;
use crate::provider::ClassificationProvider;
use async_trait::async_trait;
use seqstream_core::{ClusterAssignment, ProviderError, SequenceSet, NOISE_LABEL};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info};

/// Fixed-size numeric representation of sequences
pub trait Embedder: Send + Sync {
    fn embed(&self, sequences: &[String]) -> Vec<Vec<f32>>;

    /// Length of every produced vector
    fn dimension(&self) -> usize;
}

/// Groups embeddings; returns one label per input, `-1` for noise
pub trait Clusterer: Send + Sync {
    fn cluster(&self, embeddings: &[Vec<f32>]) -> Vec<i64>;
}

/// Normalised k-mer frequency profile over the `ACGT` alphabet
///
/// Windows containing any other symbol are skipped.
#[derive(Debug, Clone)]
pub struct KmerEmbedder {
    k: usize,
}

impl KmerEmbedder {
    pub fn new(k: usize) -> Self {
        Self { k: k.clamp(1, 8) }
    }

    fn base_index(base: u8) -> Option<usize> {
        match base.to_ascii_uppercase() {
            b'A' => Some(0),
            b'C' => Some(1),
            b'G' => Some(2),
            b'T' | b'U' => Some(3),
            _ => None,
        }
    }

    fn profile(&self, sequence: &[u8]) -> Vec<f32> {
        let mut counts = vec![0f32; self.dimension()];
        for window in sequence.windows(self.k) {
            let index = window
                .iter()
                .try_fold(0usize, |acc, b| Some(acc * 4 + Self::base_index(*b)?));
            if let Some(index) = index {
                counts[index] += 1.0;
            }
        }

        let norm = counts.iter().map(|c| c * c).sum::<f32>().sqrt();
        if norm > 0.0 {
            counts.iter_mut().for_each(|c| *c /= norm);
        }
        counts
    }
}

impl Embedder for KmerEmbedder {
    fn embed(&self, sequences: &[String]) -> Vec<Vec<f32>> {
        sequences.iter().map(|s| self.profile(s.as_bytes())).collect()
    }

    fn dimension(&self) -> usize {
        4usize.pow(self.k as u32)
    }
}

/// Single-pass leader clustering on cosine similarity
///
/// Each vector joins the most similar existing leader when the similarity
/// reaches the threshold, otherwise it becomes a new leader. Clusters smaller
/// than `min_cluster_size` are relabelled as noise and the survivors are
/// numbered from zero in order of creation.
#[derive(Debug, Clone)]
pub struct LeaderClusterer {
    threshold: f32,
    min_cluster_size: usize,
}

impl LeaderClusterer {
    pub fn new(threshold: f32, min_cluster_size: usize) -> Self {
        Self {
            threshold,
            min_cluster_size: min_cluster_size.max(1),
        }
    }
}

fn cosine(a: &[f32], b: &[f32]) -> f32 {
    // Inputs are unit length or all-zero.
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}

impl Clusterer for LeaderClusterer {
    fn cluster(&self, embeddings: &[Vec<f32>]) -> Vec<i64> {
        let mut leaders: Vec<usize> = Vec::new();
        let mut sizes: Vec<usize> = Vec::new();
        let mut raw = Vec::with_capacity(embeddings.len());

        for (i, vector) in embeddings.iter().enumerate() {
            let best = leaders
                .iter()
                .enumerate()
                .map(|(c, leader)| (c, cosine(vector, &embeddings[*leader])))
                .filter(|(_, sim)| *sim >= self.threshold)
                .fold(None, |best: Option<(usize, f32)>, cand| match best {
                    Some(b) if b.1 >= cand.1 => Some(b),
                    _ => Some(cand),
                });

            let cluster = match best {
                Some((c, _)) => c,
                None => {
                    leaders.push(i);
                    sizes.push(0);
                    leaders.len() - 1
                }
            };
            sizes[cluster] += 1;
            raw.push(cluster);
        }

        let mut relabel = vec![NOISE_LABEL; sizes.len()];
        let mut next = 0;
        for (c, size) in sizes.iter().enumerate() {
            if *size >= self.min_cluster_size {
                relabel[c] = next;
                next += 1;
            }
        }

        raw.into_iter().map(|c| relabel[c]).collect()
    }
}

/// Process-wide embedding + clustering engine
pub struct LocalEngine {
    embedder: Box<dyn Embedder>,
    clusterer: Box<dyn Clusterer>,
    running: AtomicBool,
}

impl LocalEngine {
    /// Build the bundled k-mer engine
    pub fn initialize(config: &LocalEngineConfig) -> Self {
        info!(
            kmer_size = config.kmer_size,
            similarity_threshold = config.similarity_threshold,
            min_cluster_size = config.min_cluster_size,
            "Initializing local classification engine"
        );
        Self::with_parts(
            Box::new(KmerEmbedder::new(config.kmer_size)),
            Box::new(LeaderClusterer::new(
                config.similarity_threshold,
                config.min_cluster_size,
            )),
        )
    }

    /// Compose an engine from custom parts
    pub fn with_parts(embedder: Box<dyn Embedder>, clusterer: Box<dyn Clusterer>) -> Self {
        Self {
            embedder,
            clusterer,
            running: AtomicBool::new(true),
        }
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Stop accepting work
    pub fn shutdown(&self) {
        if self.running.swap(false, Ordering::SeqCst) {
            info!("Local classification engine shut down");
        }
    }

    /// Embed and cluster; blocking, CPU-bound
    pub fn run(&self, sequences: &[String]) -> Result<Vec<i64>, ProviderError> {
        if !self.is_running() {
            return Err(ProviderError::Rejected(
                "local engine has been shut down".to_string(),
            ));
        }

        let start = Instant::now();
        let embeddings = self.embedder.embed(sequences);
        let labels = self.clusterer.cluster(&embeddings);
        debug!(
            sequences = sequences.len(),
            dimension = self.embedder.dimension(),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "local classification finished"
        );
        Ok(labels)
    }
}

/// [`ClassificationProvider`] backed by a shared [`LocalEngine`]
#[derive(Clone)]
pub struct LocalClassifier {
    engine: Arc<LocalEngine>,
}

impl LocalClassifier {
    pub fn new(engine: Arc<LocalEngine>) -> Self {
        Self { engine }
    }
}

#[async_trait]
impl ClassificationProvider for LocalClassifier {
    async fn classify(&self, sequences: &SequenceSet) -> Result<ClusterAssignment, ProviderError> {
        let engine = Arc::clone(&self.engine);
        let owned = sequences.as_slice().to_vec();

        let labels = match tokio::task::spawn_blocking(move || engine.run(&owned)).await {
            Ok(labels) => labels?,
            Err(e) if e.is_panic() => std::panic::resume_unwind(e.into_panic()),
            Err(e) => return Err(ProviderError::Connection(format!("engine task aborted: {}", e))),
        };
        Ok(ClusterAssignment::new(labels))
    }

    fn name(&self) -> &str {
        "local-engine"
    }
}
