//! Search job controller
//!
//! Async entry points for search operations. Every remote step is one unit of
//! work on the [`WorkerPool`]; waiting between polls happens inside that unit
//! so the async scheduler is never blocked.
//!
//! ```text
//! search_and_wait / wait_job:
//!
//!   start ──► RUNNING ──► elapsed ≥ max_wait? ──yes──► TIMEOUT
//!                 ▲               │ no
//!                 │               ▼
//!                 └── sleep ◄── poll ── done? ──yes──► DONE
//! ```

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tracing::{debug, error, info, warn};

use super::job::{JobStatus, SearchJob};
use super::ops;
use super::types::{
    CompletedSearch, PollResult, PollSchedule, SearchRequest, StartedSearch, StopOutcome,
    StoppedSearch,
};
use crate::error::{Result, SearchError};
use crate::executor::{ClientFactory, WorkerPool};
use crate::remote::RemoteCommand;

/// Drives search jobs through the worker pool
pub struct SearchController<F: ClientFactory> {
    pool: Arc<WorkerPool<F>>,
}

impl<F: ClientFactory> Clone for SearchController<F> {
    fn clone(&self) -> Self {
        Self {
            pool: Arc::clone(&self.pool),
        }
    }
}

impl<F> SearchController<F>
where
    F: ClientFactory,
    F::Client: RemoteCommand,
{
    pub fn new(pool: Arc<WorkerPool<F>>) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &Arc<WorkerPool<F>> {
        &self.pool
    }

    /// Start a search and return as soon as the remote service accepts it
    pub async fn start_search(&self, request: SearchRequest) -> Result<StartedSearch> {
        request.validate()?;
        self.pool
            .run_blocking(move |ctx| ops::start_search(ctx.client()?, &request))
            .await
    }

    /// Single status check; safe to repeat
    pub async fn poll_search(&self, repository: &str, job_id: &str) -> Result<PollResult> {
        self.poll_step(repository, job_id, None).await
    }

    /// Cancel a search by id, always forwarding to the remote service
    pub async fn stop_search(&self, repository: &str, job_id: &str) -> Result<StoppedSearch> {
        let repository = repository.to_string();
        let job_id = job_id.to_string();
        self.pool
            .run_blocking(move |ctx| ops::stop_search(ctx.client()?, &repository, &job_id))
            .await
    }

    /// Start a search and poll until it is done or `max_wait` elapses
    ///
    /// On timeout the remote job keeps running; the returned
    /// [`SearchError::Timeout`] carries its id so it can be polled or stopped.
    pub async fn search_and_wait(
        &self,
        request: SearchRequest,
        schedule: PollSchedule,
    ) -> Result<CompletedSearch> {
        let mut job = self.start_job(request).await?;
        self.wait_job(&mut job, schedule).await
    }

    /// Poll a RUNNING job until it is done or `max_wait` has passed since it
    /// was created
    ///
    /// The job ends in DONE, TIMEOUT or ERROR. A timed-out job can still be
    /// handed to [`stop_job`](Self::stop_job) to cancel the remote search.
    pub async fn wait_job(
        &self,
        job: &mut SearchJob,
        schedule: PollSchedule,
    ) -> Result<CompletedSearch> {
        let job_id = job.require_job_id()?.to_string();
        if job.status() != JobStatus::Running {
            return Err(SearchError::validation(format!(
                "job {} is {}, only RUNNING jobs can be waited on",
                job_id,
                job.status()
            )));
        }
        let repository = job.repository().to_string();

        loop {
            let elapsed = job.elapsed();
            if elapsed >= schedule.max_wait() {
                job.transition(JobStatus::Timeout)?;
                warn!(
                    repository = %repository,
                    job_id = %job_id,
                    poll_count = job.poll_count(),
                    elapsed_ms = elapsed.as_millis() as u64,
                    "Search timed out"
                );
                return Err(SearchError::Timeout {
                    job_id,
                    max_wait: schedule.max_wait(),
                    elapsed,
                    poll_count: job.poll_count(),
                });
            }

            let result = self
                .poll_step(&repository, &job_id, Some(schedule.poll_interval()))
                .await;
            job.record_poll();

            match result {
                Ok(result) if result.done => {
                    job.transition(JobStatus::Done)?;
                    let elapsed = job.elapsed();
                    info!(
                        repository = %repository,
                        job_id = %job_id,
                        event_count = result.event_count,
                        poll_count = job.poll_count(),
                        elapsed_ms = elapsed.as_millis() as u64,
                        "Search completed"
                    );
                    return Ok(CompletedSearch {
                        job_id,
                        repository,
                        query: job.request().query.clone(),
                        status: JobStatus::Done,
                        event_count: result.event_count,
                        events: result.events,
                        metadata: result.metadata,
                        elapsed,
                        poll_count: job.poll_count(),
                        completed_at: Utc::now(),
                    });
                }
                Ok(_) => {
                    debug!(
                        job_id = %job_id,
                        poll_count = job.poll_count(),
                        elapsed_ms = job.elapsed().as_millis() as u64,
                        "Search still running"
                    );
                }
                Err(err) => {
                    let err = err.with_job_context(&job_id, job.elapsed(), job.poll_count());
                    job.mark_failed(&err);
                    error!(
                        repository = %repository,
                        job_id = %job_id,
                        error = %err,
                        "Search failed while polling"
                    );
                    return Err(err);
                }
            }
        }
    }

    /// Start a search and track it as a [`SearchJob`] in RUNNING state
    pub async fn start_job(&self, request: SearchRequest) -> Result<SearchJob> {
        request.validate()?;
        let mut job = SearchJob::new(request.clone());

        match self.start_search(request).await {
            Ok(started) => {
                job.mark_running(started.job_id)?;
                Ok(job)
            }
            Err(err) => {
                job.mark_failed(&err);
                error!(
                    repository = %job.repository(),
                    query = %job.request().query_prefix(),
                    error = %err,
                    "Failed to start search"
                );
                Err(err)
            }
        }
    }

    /// Poll a tracked job, moving it to DONE or ERROR as appropriate
    ///
    /// Terminal jobs keep their status regardless of what the remote reports.
    pub async fn poll_job(&self, job: &mut SearchJob) -> Result<PollResult> {
        let job_id = job.require_job_id()?.to_string();
        let result = self.poll_step(job.repository(), &job_id, None).await;
        job.record_poll();

        match result {
            Ok(result) => {
                if result.done && job.status() == JobStatus::Running {
                    job.transition(JobStatus::Done)?;
                }
                Ok(result)
            }
            Err(err) => {
                let err = err.with_job_context(&job_id, job.elapsed(), job.poll_count());
                job.mark_failed(&err);
                Err(err)
            }
        }
    }

    /// Stop a tracked job
    ///
    /// RUNNING jobs become CANCELLED. TIMEOUT jobs are still running remotely,
    /// so the stop is forwarded but the local status stays TIMEOUT. Jobs that
    /// are DONE, CANCELLED or ERROR are left alone.
    pub async fn stop_job(&self, job: &mut SearchJob) -> Result<StopOutcome> {
        let job_id = job.require_job_id()?.to_string();

        match job.status() {
            JobStatus::Running => {
                let stopped = self.stop_search(job.repository(), &job_id).await?;
                job.transition(JobStatus::Cancelled)?;
                Ok(StopOutcome::Stopped(stopped))
            }
            JobStatus::Timeout => {
                let stopped = self.stop_search(job.repository(), &job_id).await?;
                Ok(StopOutcome::Stopped(stopped))
            }
            status => {
                debug!(job_id = %job_id, status = %status, "Stop skipped for finished job");
                Ok(StopOutcome::AlreadyTerminal { job_id, status })
            }
        }
    }

    /// One status check as a unit of work, pausing `sleep_after` on the worker
    /// when the job is not yet done
    async fn poll_step(
        &self,
        repository: &str,
        job_id: &str,
        sleep_after: Option<Duration>,
    ) -> Result<PollResult> {
        let repository = repository.to_string();
        let job_id = job_id.to_string();
        self.pool
            .run_blocking(move |ctx| {
                let result = ops::get_search_status(ctx.client()?, &repository, &job_id)?;
                if let Some(pause) = sleep_after.filter(|_| !result.done) {
                    std::thread::sleep(pause);
                }
                Ok(result)
            })
            .await
    }
}
