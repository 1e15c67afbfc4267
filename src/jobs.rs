//! job registry (C8): in-process tracking of long-running ingestion-style
//! jobs by id, with TTL eviction.
//!
//! grounded on the `DashMap`-backed concurrent registry pattern from the
//! wider retrieval corpus (a lock-free `tool_name -> ToolEntry` map) —
//! same shape, applied here to job lifecycle instead of tool lookup, which
//! gives `create`/`update`/`get`/`list_active` per-shard locking so no
//! caller ever observes a torn record.

use crate::model::{Job, JobStatus};
use dashmap::DashMap;
use std::sync::Arc;
use std::time::Duration;

#[derive(Clone, Default)]
pub struct JobRegistry {
    jobs: Arc<DashMap<String, Job>>,
}

impl JobRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// create a new in-progress job with an opaque, collision-resistant id.
    pub fn create(&self, total: usize) -> Job {
        let job = Job {
            id: uuid::Uuid::new_v4().to_string(),
            status: JobStatus::InProgress,
            total,
            progress: 0,
            results: Vec::new(),
            start_time: chrono::Utc::now(),
            end_time: None,
        };
        self.jobs.insert(job.id.clone(), job.clone());
        job
    }

    /// last-writer-wins on individual fields; replaces the whole record
    /// atomically under the shard lock so no caller observes a partial
    /// write.
    pub fn update<F>(&self, id: &str, mutate: F) -> Option<Job>
    where
        F: FnOnce(&mut Job),
    {
        self.jobs.get_mut(id).map(|mut entry| {
            mutate(&mut entry);
            entry.clone()
        })
    }

    pub fn get(&self, id: &str) -> Option<Job> {
        self.jobs.get(id).map(|entry| entry.clone())
    }

    pub fn list_active(&self) -> Vec<Job> {
        self.jobs
            .iter()
            .filter(|entry| entry.status == JobStatus::InProgress)
            .map(|entry| entry.clone())
            .collect()
    }

    /// evict jobs whose `start_time` is older than `ttl`. intended to run
    /// on a periodic interval (default every 10 minutes for a default
    /// 60-minute TTL).
    pub fn sweep(&self, ttl: Duration) {
        let cutoff = chrono::Utc::now() - chrono::Duration::from_std(ttl).unwrap_or_default();
        self.jobs.retain(|_, job| job.start_time > cutoff);
    }

    /// spawn the periodic sweep task. returns the task handle so callers
    /// may abort it on shutdown.
    pub fn spawn_sweeper(&self, ttl: Duration, interval: Duration) -> tokio::task::JoinHandle<()> {
        let registry = self.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                ticker.tick().await;
                registry.sweep(ttl);
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn create_then_get_round_trips() {
        let registry = JobRegistry::new();
        let job = registry.create(10);
        let fetched = registry.get(&job.id).unwrap();
        assert_eq!(fetched.id, job.id);
        assert_eq!(fetched.status, JobStatus::InProgress);
    }

    #[test]
    fn update_is_visible_and_never_torn() {
        let registry = JobRegistry::new();
        let job = registry.create(10);
        registry.update(&job.id, |j| {
            j.progress = 5;
            j.status = JobStatus::Completed;
        });
        let fetched = registry.get(&job.id).unwrap();
        assert_eq!(fetched.progress, 5);
        assert_eq!(fetched.status, JobStatus::Completed);
    }

    #[test]
    fn list_active_excludes_completed_jobs() {
        let registry = JobRegistry::new();
        let running = registry.create(10);
        let done = registry.create(10);
        registry.update(&done.id, |j| j.status = JobStatus::Completed);

        let active = registry.list_active();
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].id, running.id);
    }

    #[test]
    fn sweep_evicts_jobs_older_than_ttl() {
        let registry = JobRegistry::new();
        let job = registry.create(10);
        registry.update(&job.id, |j| {
            j.start_time = chrono::Utc::now() - chrono::Duration::minutes(61);
        });

        registry.sweep(Duration::from_secs(3600));
        assert!(registry.get(&job.id).is_none());
    }

    #[test]
    fn unknown_job_id_yields_none() {
        let registry = JobRegistry::new();
        assert!(registry.get("does-not-exist").is_none());
    }
}
