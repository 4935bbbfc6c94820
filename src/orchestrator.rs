use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures::stream::{self, StreamExt};
use serde::{Deserialize, Serialize};
use tokio::sync::Semaphore;

use crate::distribution::DistributionStrategy;
use crate::error::{ChunkStoreError, Result};
use crate::manifest::{ChunkRecord, Manifest, ReplicaLocation};
use crate::model::Destination;
use crate::storage::backend::BackendError;
use crate::storage::factory::BackendRegistry;
use crate::storage::local::LocalChunkDir;

/// What an upload does when a single replica fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReplicaFailurePolicy {
    /// Record the skipped replica and keep going (replication may end below R).
    #[default]
    Continue,
    /// Stop issuing new calls and fail the upload once in-flight calls settle.
    Abort,
}

#[derive(Debug, Clone)]
pub struct TransferOptions {
    /// Upper bound on concurrent backend calls
    pub max_concurrency: usize,
    /// Per-call limit; `None` waits forever
    pub call_timeout: Option<Duration>,
    /// Extra attempts for transient errors
    pub max_retries: u32,
    /// Base delay between attempts, multiplied by the attempt number
    pub retry_backoff: Duration,
    pub replica_failure: ReplicaFailurePolicy,
}

impl Default for TransferOptions {
    fn default() -> Self {
        Self {
            max_concurrency: 4,
            call_timeout: Some(Duration::from_secs(120)),
            max_retries: 0,
            retry_backoff: Duration::from_millis(200),
            replica_failure: ReplicaFailurePolicy::Continue,
        }
    }
}

/// A replica that could not be written during an upload pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkippedReplica {
    pub chunk_id: String,
    pub index: usize,
    pub destination: Destination,
    pub reason: String,
}

#[derive(Debug, Clone, Default)]
pub struct UploadReport {
    /// Replicas written in this pass
    pub uploaded: usize,
    /// Planned replicas the manifest already recorded
    pub already_present: usize,
    /// Chunks placed on the local-only sentinel (empty destination pool)
    pub local_only: usize,
    pub skipped: Vec<SkippedReplica>,
    /// Set when the pass stopped early because of cancellation
    pub cancelled: bool,
}

impl UploadReport {
    /// Every planned replica is in place.
    pub fn is_complete(&self) -> bool {
        self.skipped.is_empty() && !self.cancelled
    }
}

#[derive(Debug, Clone, Default)]
pub struct DownloadReport {
    pub downloaded: usize,
    /// Bytes fetched; chunks sharing an id are fetched once
    pub bytes: u64,
    /// Chunks served by a replica other than the first recorded one
    pub fallbacks: usize,
}

enum CallError {
    Cancelled,
    Backend(BackendError),
}

/// One distinct chunk id and, per destination, the chunk indices that still
/// need a replica there. Identical chunks share an id, so each id is handled
/// by exactly one worker.
struct UploadJob {
    id: String,
    targets: Vec<UploadTarget>,
}

struct UploadTarget {
    destination: Destination,
    indices: Vec<usize>,
}

struct ReplicaOutcome {
    destination: Destination,
    indices: Vec<usize>,
    remote_path: String,
    result: std::result::Result<String, Option<String>>,
}

struct ChunkUploadOutcome {
    id: String,
    replicas: Vec<ReplicaOutcome>,
}

/// Every record sharing one chunk id.
struct FetchJob<'a> {
    records: Vec<&'a ChunkRecord>,
}

struct FetchedChunk {
    bytes: u64,
    copies: usize,
    fallback: bool,
}

/// Moves chunks between a local chunk directory and the registered backends.
pub struct Orchestrator {
    registry: Arc<BackendRegistry>,
    options: TransferOptions,
    permits: Semaphore,
    cancel: Arc<AtomicBool>,
}

impl Orchestrator {
    pub fn new(registry: Arc<BackendRegistry>, options: TransferOptions) -> Self {
        let permits = Semaphore::new(options.max_concurrency.max(1));
        Self {
            registry,
            options,
            permits,
            cancel: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Share an externally owned cancellation flag.
    pub fn with_cancel(mut self, cancel: Arc<AtomicBool>) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn cancel_handle(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.cancel)
    }

    pub fn cancel(&self) {
        self.cancel.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.load(Ordering::SeqCst)
    }

    pub fn options(&self) -> &TransferOptions {
        &self.options
    }

    /// Push every chunk of `manifest` to the destinations `strategy` picks for it.
    ///
    /// Destinations that already hold a replica are skipped, so re-running an
    /// interrupted or partial upload against the same manifest fills the gaps.
    /// The manifest is updated in place as replicas land.
    pub async fn upload(
        &self,
        manifest: &mut Manifest,
        chunks: &LocalChunkDir,
        strategy: &DistributionStrategy,
    ) -> Result<UploadReport> {
        let mut report = UploadReport::default();
        let mut jobs: Vec<UploadJob> = Vec::new();
        let mut job_of_id: HashMap<&str, usize> = HashMap::new();

        for record in manifest.chunks() {
            for destination in strategy.destinations_for(record.index) {
                if destination.is_local_only() {
                    report.local_only += 1;
                    continue;
                }
                if record.has_replica_at(&destination) {
                    report.already_present += 1;
                    continue;
                }

                let slot = *job_of_id.entry(record.id.as_str()).or_insert_with(|| {
                    jobs.push(UploadJob {
                        id: record.id.clone(),
                        targets: Vec::new(),
                    });
                    jobs.len() - 1
                });
                let job = &mut jobs[slot];
                match job.targets.iter_mut().find(|t| t.destination == destination) {
                    Some(target) => target.indices.push(record.index),
                    None => job.targets.push(UploadTarget {
                        destination,
                        indices: vec![record.index],
                    }),
                }
            }
        }
        drop(job_of_id);

        tracing::info!(
            file = %manifest.original_name,
            chunks = manifest.chunk_count(),
            pending_chunks = jobs.len(),
            replication = strategy.replication(),
            "Starting upload pass"
        );

        let halt = AtomicBool::new(false);
        let mut abort_error = None;
        let mut local_error = None;

        let mut results = stream::iter(jobs)
            .map(|job| self.upload_chunk(job, chunks, &halt))
            .buffer_unordered(self.options.max_concurrency.max(1));

        while let Some(outcome) = results.next().await {
            let outcome = match outcome {
                Ok(outcome) => outcome,
                Err(e) => {
                    halt.store(true, Ordering::SeqCst);
                    if local_error.is_none() {
                        local_error = Some(e);
                    }
                    continue;
                }
            };

            for replica in outcome.replicas {
                match replica.result {
                    Ok(remote_id) => {
                        tracing::debug!(
                            chunk_id = %outcome.id,
                            copies = replica.indices.len(),
                            provider = %replica.destination.provider,
                            account = %replica.destination.account,
                            remote_id = %remote_id,
                            "Replica uploaded"
                        );
                        let location = ReplicaLocation {
                            provider: replica.destination.provider,
                            remote_path: replica.remote_path,
                            remote_id,
                            account: replica.destination.account,
                        };
                        for &index in &replica.indices {
                            manifest.update_distribution(index, location.clone())?;
                            report.uploaded += 1;
                        }
                    }
                    Err(None) => report.cancelled = true,
                    Err(Some(reason)) => {
                        tracing::warn!(
                            chunk_id = %outcome.id,
                            copies = replica.indices.len(),
                            provider = %replica.destination.provider,
                            account = %replica.destination.account,
                            error = %reason,
                            "Replica upload failed"
                        );
                        if self.options.replica_failure == ReplicaFailurePolicy::Abort && abort_error.is_none() {
                            halt.store(true, Ordering::SeqCst);
                            abort_error = Some(ChunkStoreError::ReplicaFailed {
                                id: outcome.id.clone(),
                                index: replica.indices.first().copied().unwrap_or_default(),
                                destination: replica.destination.to_string(),
                                reason: reason.clone(),
                            });
                        }
                        for &index in &replica.indices {
                            report.skipped.push(SkippedReplica {
                                chunk_id: outcome.id.clone(),
                                index,
                                destination: replica.destination.clone(),
                                reason: reason.clone(),
                            });
                        }
                    }
                }
            }
        }
        drop(results);

        manifest.finish_upload_pass();

        if let Some(e) = local_error {
            return Err(e);
        }
        if let Some(e) = abort_error {
            return Err(e);
        }

        tracing::info!(
            file = %manifest.original_name,
            uploaded = report.uploaded,
            already_present = report.already_present,
            skipped = report.skipped.len(),
            cancelled = report.cancelled,
            mode = ?manifest.distribution_mode,
            "Upload pass finished"
        );
        Ok(report)
    }

    async fn upload_chunk(&self, job: UploadJob, chunks: &LocalChunkDir, halt: &AtomicBool) -> Result<ChunkUploadOutcome> {
        if self.should_stop(halt) {
            let replicas = job
                .targets
                .into_iter()
                .map(|target| ReplicaOutcome {
                    remote_path: target.destination.provider.remote_path(&job.id),
                    destination: target.destination,
                    indices: target.indices,
                    result: Err(None),
                })
                .collect();
            return Ok(ChunkUploadOutcome { id: job.id, replicas });
        }

        let data = chunks.load_async(&job.id).await?;

        let attempts = job.targets.into_iter().map(|UploadTarget { destination, indices }| {
            let data = &data;
            let id = &job.id;
            async move {
                let remote_path = destination.provider.remote_path(id);
                let result = match self.registry.get(&destination) {
                    None => Err(Some(format!("no backend registered for {}", destination))),
                    Some(backend) => self
                        .call(halt, || backend.upload(data, &remote_path))
                        .await
                        .map_err(|e| match e {
                            CallError::Cancelled => None,
                            CallError::Backend(e) => Some(e.to_string()),
                        }),
                };
                ReplicaOutcome {
                    destination,
                    indices,
                    remote_path,
                    result,
                }
            }
        });
        let replicas = futures::future::join_all(attempts).await;

        Ok(ChunkUploadOutcome { id: job.id, replicas })
    }

    /// Fetch every chunk of `manifest` into `sink`, trying each chunk's recorded
    /// replicas in order until one succeeds.
    ///
    /// Chunks sharing an id are fetched once and written once; the replicas of
    /// every record with that id are candidates.
    pub async fn download(&self, manifest: &Manifest, sink: &LocalChunkDir) -> Result<DownloadReport> {
        tracing::info!(
            file = %manifest.original_name,
            chunks = manifest.chunk_count(),
            "Starting download"
        );

        let halt = AtomicBool::new(false);
        let mut report = DownloadReport::default();
        let mut first_error: Option<ChunkStoreError> = None;

        let mut jobs: Vec<FetchJob<'_>> = Vec::new();
        let mut job_of_id: HashMap<&str, usize> = HashMap::new();
        for record in manifest.chunks() {
            match job_of_id.get(record.id.as_str()) {
                Some(&slot) => jobs[slot].records.push(record),
                None => {
                    job_of_id.insert(record.id.as_str(), jobs.len());
                    jobs.push(FetchJob { records: vec![record] });
                }
            }
        }

        let mut results = stream::iter(jobs)
            .map(|job| self.fetch_chunk(job, sink, &halt))
            .buffer_unordered(self.options.max_concurrency.max(1));

        while let Some(result) = results.next().await {
            match result {
                Ok(fetched) => {
                    report.downloaded += fetched.copies;
                    report.bytes += fetched.bytes;
                    if fetched.fallback {
                        report.fallbacks += fetched.copies;
                    }
                }
                Err(e) => {
                    halt.store(true, Ordering::SeqCst);
                    match &first_error {
                        None | Some(ChunkStoreError::Cancelled) => first_error = Some(e),
                        Some(_) => {}
                    }
                }
            }
        }
        drop(results);

        if let Some(e) = first_error {
            tracing::warn!(file = %manifest.original_name, error = %e, "Download failed");
            return Err(e);
        }

        tracing::info!(
            file = %manifest.original_name,
            downloaded = report.downloaded,
            bytes = report.bytes,
            fallbacks = report.fallbacks,
            "Download finished"
        );
        Ok(report)
    }

    async fn fetch_chunk(&self, job: FetchJob<'_>, sink: &LocalChunkDir, halt: &AtomicBool) -> Result<FetchedChunk> {
        let record = job.records[0];
        let mut candidates: Vec<&ReplicaLocation> = Vec::new();
        for replica in job.records.iter().flat_map(|r| r.destinations.iter()) {
            if !candidates.contains(&replica) {
                candidates.push(replica);
            }
        }
        if candidates.is_empty() {
            return Err(ChunkStoreError::ChunkUnavailable {
                id: record.id.clone(),
                index: record.index,
                reason: "no recorded destinations".to_string(),
            });
        }

        let mut failures = Vec::new();
        for (attempt, replica) in candidates.into_iter().enumerate() {
            let destination = replica.destination();
            let Some(backend) = self.registry.get(&destination) else {
                failures.push(format!("{}: no backend registered", destination));
                continue;
            };

            let remote_id = if replica.remote_id.is_empty() {
                let name = replica.remote_path.rsplit('/').next().unwrap_or(&replica.remote_path);
                match self.call(halt, || backend.find_by_name(name)).await {
                    Ok(id) => id,
                    Err(CallError::Cancelled) => return Err(ChunkStoreError::Cancelled),
                    Err(CallError::Backend(e)) => {
                        failures.push(format!("{}: lookup failed: {}", destination, e));
                        continue;
                    }
                }
            } else {
                replica.remote_id.clone()
            };

            let data = match self.call(halt, || backend.download(&remote_id)).await {
                Ok(data) => data,
                Err(CallError::Cancelled) => return Err(ChunkStoreError::Cancelled),
                Err(CallError::Backend(e)) => {
                    tracing::warn!(
                        chunk_id = %record.id,
                        index = record.index,
                        provider = %replica.provider,
                        account = %replica.account,
                        error = %e,
                        "Replica download failed, trying next destination"
                    );
                    failures.push(format!("{}: {}", destination, e));
                    continue;
                }
            };

            if data.len() as u64 != record.size_bytes {
                tracing::warn!(
                    chunk_id = %record.id,
                    index = record.index,
                    provider = %replica.provider,
                    expected = record.size_bytes,
                    actual = data.len(),
                    "Replica has unexpected size"
                );
                failures.push(format!(
                    "{}: expected {} bytes, got {}",
                    destination,
                    record.size_bytes,
                    data.len()
                ));
                continue;
            }

            sink.store_async(&record.id, &data).await?;
            tracing::debug!(chunk_id = %record.id, index = record.index, provider = %replica.provider, "Chunk downloaded");
            return Ok(FetchedChunk {
                bytes: data.len() as u64,
                copies: job.records.len(),
                fallback: attempt > 0,
            });
        }

        Err(ChunkStoreError::ChunkUnavailable {
            id: record.id.clone(),
            index: record.index,
            reason: failures.join("; "),
        })
    }

    fn should_stop(&self, halt: &AtomicBool) -> bool {
        self.is_cancelled() || halt.load(Ordering::SeqCst)
    }

    /// One logical backend call: bounded by the semaphore, the timeout and the retry budget.
    async fn call<T, F, Fut>(&self, halt: &AtomicBool, mut op: F) -> std::result::Result<T, CallError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = std::result::Result<T, BackendError>>,
    {
        let mut attempt = 0u32;
        loop {
            if self.should_stop(halt) {
                return Err(CallError::Cancelled);
            }
            let permit = self.permits.acquire().await.map_err(|_| CallError::Cancelled)?;
            if self.should_stop(halt) {
                return Err(CallError::Cancelled);
            }

            let result = match self.options.call_timeout {
                Some(limit) => match tokio::time::timeout(limit, op()).await {
                    Ok(result) => result,
                    Err(_) => Err(BackendError::Transient(format!("call timed out after {:?}", limit))),
                },
                None => op().await,
            };
            drop(permit);

            match result {
                Ok(value) => return Ok(value),
                Err(e) if e.is_retryable() && attempt < self.options.max_retries => {
                    attempt += 1;
                    tracing::debug!(attempt, error = %e, "Retrying transient backend error");
                    tokio::time::sleep(self.options.retry_backoff.saturating_mul(attempt)).await;
                }
                Err(e) => return Err(CallError::Backend(e)),
            }
        }
    }
}
