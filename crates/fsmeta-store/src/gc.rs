//! Trash GC driver.
//!
//! Proposes `CleanExpiredInodes` for soft-deleted records past their
//! retention and `InternalClean` sweeps for the head of the free list. Both
//! go through the partition apply path like any other command.

use crate::command::Command;
use crate::partition::{ApplyResponse, MetaPartition};
use fsmeta_common::Result;
use fsmeta_common::config::TrashConfig;
use parking_lot::Mutex;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::{Duration, Instant};
use tracing::{debug, error, info};

/// How often a sleeping GC thread checks for shutdown
const SHUTDOWN_POLL: Duration = Duration::from_millis(100);

pub struct TrashGc {
    partition: Arc<MetaPartition>,
    config: TrashConfig,
    shutdown: Arc<AtomicBool>,
    handle: Mutex<Option<thread::JoinHandle<()>>>,
}

impl TrashGc {
    #[must_use]
    pub fn new(partition: Arc<MetaPartition>, config: TrashConfig) -> Self {
        Self {
            partition,
            config,
            shutdown: Arc::new(AtomicBool::new(false)),
            handle: Mutex::new(None),
        }
    }

    /// Expire soft-deleted records older than the retention period.
    /// Returns how many were expired or removed.
    pub fn expire_once(&self, now: i64) -> Result<usize> {
        expire(&self.partition, &self.config, now)
    }

    /// Purge up to one batch from the head of the free list.
    pub fn reclaim_once(&self) -> Result<usize> {
        reclaim(&self.partition, &self.config)
    }

    /// Start the background GC thread
    pub fn start(&self) {
        let mut slot = self.handle.lock();
        if slot.is_some() {
            return;
        }

        let partition = Arc::clone(&self.partition);
        let config = self.config.clone();
        let shutdown = Arc::clone(&self.shutdown);
        let interval = Duration::from_secs(config.interval_secs);

        let handle = thread::spawn(move || {
            info!("Trash GC started for partition {}", partition.id());

            while !shutdown.load(Ordering::Relaxed) {
                let deadline = Instant::now() + interval;
                while Instant::now() < deadline {
                    if shutdown.load(Ordering::Relaxed) {
                        break;
                    }
                    thread::sleep(SHUTDOWN_POLL.min(interval));
                }
                if shutdown.load(Ordering::Relaxed) {
                    break;
                }

                let now = chrono::Utc::now().timestamp();
                if let Err(e) = expire(&partition, &config, now) {
                    error!("Trash expiry failed: {}", e);
                }
                if let Err(e) = reclaim(&partition, &config) {
                    error!("Trash reclamation failed: {}", e);
                }
            }

            info!("Trash GC stopped for partition {}", partition.id());
        });

        *slot = Some(handle);
    }

    /// Stop the background thread and wait for it
    pub fn shutdown(&self) {
        self.shutdown.store(true, Ordering::Relaxed);

        if let Some(handle) = self.handle.lock().take() {
            if handle.join().is_err() {
                error!("Trash GC thread panicked");
            }
        }
    }
}

impl Drop for TrashGc {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn expire(partition: &MetaPartition, config: &TrashConfig, now: i64) -> Result<usize> {
    let retention = i64::try_from(config.retention_secs).unwrap_or(i64::MAX);
    let cutoff = now.saturating_sub(retention);
    let candidates = partition.expired_candidates(cutoff, config.expire_batch_size)?;
    if candidates.is_empty() {
        return Ok(0);
    }

    let resp = partition.apply(&Command::CleanExpiredInodes(candidates))?;
    let expired = match resp {
        ApplyResponse::Outcomes(outcomes) => outcomes.iter().filter(|o| o.is_ok()).count(),
        _ => 0,
    };
    debug!("partition {} expired {} trashed inodes", partition.id(), expired);
    Ok(expired)
}

fn reclaim(partition: &MetaPartition, config: &TrashConfig) -> Result<usize> {
    let inodes = partition.free_list().peek(config.reclaim_batch_size);
    if inodes.is_empty() {
        return Ok(0);
    }

    match partition.apply(&Command::internal_clean(&inodes))? {
        ApplyResponse::Purged(n) => Ok(n),
        _ => Ok(0),
    }
}
