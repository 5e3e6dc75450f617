//! Sync orchestrator.
//!
//! Drives one organization through
//! `Idle → FetchingRepos → FetchingCommits → Aggregating → Complete`
//! (or `Errored`). Repositories are processed in fixed-size batches with a
//! pause between batches; inside a batch each repository runs as its own task
//! and a failure only removes that repository from the result.
//!
//! Every upstream listing goes through the [`CacheStore`] first.
//!
//! # Example
//!
//! ```ignore
//! use orgpulse::sync::{SyncOptions, SyncOrchestrator, SyncRequest};
//!
//! let orchestrator = SyncOrchestrator::new(client, cache, watermarks, SyncOptions::default());
//! let outcome = orchestrator
//!     .synchronize(SyncRequest::new("acme").with_credential(token), None)
//!     .await?;
//! println!("{} commits", outcome.commits.len());
//! ```

use std::collections::HashSet;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use tokio::sync::{Semaphore, watch};

use super::progress::{CacheStatus, ProgressCallback, SyncProgress, emit};
use super::types::{
    RepoFailure, SyncError, SyncOptions, SyncOutcome, SyncPhase, SyncRequest, SyncedCommit,
};
use super::watermark::WatermarkStore;
use crate::branches;
use crate::cache::{CacheCategory, CacheStore, DataSource, Fetched, keys};
use crate::platform::{
    AuthorIdentity, Branch, Commit, DateWindow, PlatformClient, PlatformError, Repository,
    short_error_message,
};
use crate::stats::{self, UserStats};

/// Commits fetched for one repository, deduplicated by sha.
#[derive(Debug)]
struct RepoCommits {
    repository: String,
    branches: Vec<Branch>,
    commits: Vec<Commit>,
}

/// What a repository task needs, owned so it can move into `tokio::spawn`.
struct RepoTask<C> {
    client: C,
    cache: CacheStore,
    status: Arc<watch::Sender<Option<CacheStatus>>>,
    org: String,
    repository: String,
    auth: Option<String>,
    window: DateWindow,
}

/// Publish the provenance and size of a cache lookup.
fn publish(
    sender: &watch::Sender<Option<CacheStatus>>,
    category: CacheCategory,
    org: &str,
    item_count: usize,
    source: DataSource,
) {
    sender.send_replace(Some(CacheStatus {
        category,
        org: org.to_string(),
        timestamp: Utc::now(),
        item_count,
        source,
    }));
}

impl<C: PlatformClient + Clone + 'static> RepoTask<C> {
    /// Branches first, then commits per branch.
    async fn run(self) -> Result<RepoCommits, PlatformError> {
        let repo = self.repository.as_str();
        let auth = self.auth.as_deref();

        let branches: Fetched<Vec<Branch>> = self
            .cache
            .get_or_fetch(CacheCategory::Branches, &keys::branches(repo, auth), || {
                self.client.list_branches(repo, auth)
            })
            .await?;
        publish(
            &self.status,
            CacheCategory::Branches,
            &self.org,
            branches.data.len(),
            branches.source,
        );

        let mut seen: HashSet<String> = HashSet::new();
        let mut commits = Vec::new();
        for branch in &branches.data {
            let anchor = if branch.head_sha.is_empty() {
                branch.name.as_str()
            } else {
                branch.head_sha.as_str()
            };
            let key = keys::commits(repo, &branch.name, anchor, self.window);
            let fetched: Fetched<Vec<Commit>> = self
                .cache
                .get_or_fetch(CacheCategory::Commits, &key, || {
                    self.client.list_commits(repo, anchor, self.window, auth)
                })
                .await?;
            publish(
                &self.status,
                CacheCategory::Commits,
                &self.org,
                fetched.data.len(),
                fetched.source,
            );

            commits.extend(
                fetched
                    .data
                    .into_iter()
                    .filter(|c| seen.insert(c.sha.clone())),
            );
        }

        Ok(RepoCommits {
            repository: self.repository,
            branches: branches.data,
            commits,
        })
    }
}

/// Synchronizes organizations through a cache.
pub struct SyncOrchestrator<C> {
    client: C,
    cache: CacheStore,
    watermarks: WatermarkStore,
    options: SyncOptions,
    cache_status: Arc<watch::Sender<Option<CacheStatus>>>,
    phase: Mutex<SyncPhase>,
}

impl<C: PlatformClient + Clone + 'static> SyncOrchestrator<C> {
    pub fn new(
        client: C,
        cache: CacheStore,
        watermarks: WatermarkStore,
        options: SyncOptions,
    ) -> Self {
        let (cache_status, _) = watch::channel(None);
        Self {
            client,
            cache,
            watermarks,
            options,
            cache_status: Arc::new(cache_status),
            phase: Mutex::new(SyncPhase::Idle),
        }
    }

    pub fn cache(&self) -> &CacheStore {
        &self.cache
    }

    pub fn watermarks(&self) -> &WatermarkStore {
        &self.watermarks
    }

    /// Receive the most recent cache lookup of any run.
    pub fn subscribe_cache_status(&self) -> watch::Receiver<Option<CacheStatus>> {
        self.cache_status.subscribe()
    }

    /// Current phase of the most recent run.
    pub fn phase(&self) -> SyncPhase {
        *self.phase.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn set_phase(&self, org: &str, phase: SyncPhase, on_progress: Option<&ProgressCallback>) {
        *self.phase.lock().unwrap_or_else(|e| e.into_inner()) = phase;
        tracing::debug!(org, %phase, "Sync phase changed");
        emit(
            on_progress,
            SyncProgress::PhaseChanged {
                org: org.to_string(),
                phase,
            },
        );
    }

    /// Run one synchronization.
    ///
    /// Organization-level failures (listing repositories or members) abort the
    /// run. Repository-level failures are logged, reported through
    /// `on_progress`, and listed in [`SyncOutcome::failed_repositories`].
    #[tracing::instrument(skip_all, fields(org = %request.org))]
    pub async fn synchronize(
        &self,
        request: SyncRequest,
        on_progress: Option<&ProgressCallback>,
    ) -> Result<SyncOutcome, SyncError> {
        let org = request.org.clone();
        self.set_phase(&org, SyncPhase::FetchingRepos, on_progress);

        match self.run(&request, on_progress).await {
            Ok(outcome) => {
                self.set_phase(&org, SyncPhase::Complete, on_progress);
                tracing::info!(
                    repositories = outcome.repositories_synced,
                    failed = outcome.failed_repositories.len(),
                    commits = outcome.commits.len(),
                    "Sync complete"
                );
                emit(
                    on_progress,
                    SyncProgress::SyncComplete {
                        org,
                        repositories: outcome.repositories_synced,
                        failed: outcome.failed_repositories.len(),
                        commits: outcome.commits.len(),
                    },
                );
                Ok(outcome)
            }
            Err(e) => {
                self.set_phase(&org, SyncPhase::Errored, on_progress);
                tracing::error!(error = %e, "Sync failed");
                emit(
                    on_progress,
                    SyncProgress::SyncFailed {
                        org,
                        error: short_error_message(&e),
                    },
                );
                Err(e)
            }
        }
    }

    async fn run(
        &self,
        request: &SyncRequest,
        on_progress: Option<&ProgressCallback>,
    ) -> Result<SyncOutcome, SyncError> {
        let org = request.org.as_str();
        let auth = request.credential.as_deref();

        let repos = self.fetch_repositories(request, on_progress).await?;

        let members = if self.options.members_only {
            Some(self.fetch_members(org, auth).await?)
        } else {
            None
        };

        let (window, floor) = self.effective_window(org, request.window);
        tracing::debug!(since = ?window.since, until = ?window.until, "Commit window");

        self.set_phase(org, SyncPhase::FetchingCommits, on_progress);
        let (fetched, failed_repositories) = self
            .fetch_commits(org, &repos, auth, window, on_progress)
            .await;

        self.set_phase(org, SyncPhase::Aggregating, on_progress);
        let mut user_stats = UserStats::new();
        let mut commits = Vec::new();
        let repositories_synced = fetched.len();

        for repo in fetched {
            let fresh: Vec<Commit> = repo
                .commits
                .into_iter()
                .filter(|c| floor.is_none_or(|f| c.authored_at > f))
                .collect();
            let membership = branches::resolve(&repo.branches, &fresh);
            user_stats.merge(stats::aggregate(&fresh, &membership, &repo.repository));

            commits.extend(fresh.into_iter().map(|commit| SyncedCommit {
                branches: membership.get(&commit.sha).cloned().unwrap_or_default(),
                repository: repo.repository.clone(),
                commit,
            }));
        }

        if let Some(members) = members {
            user_stats.retain(|author| match author {
                AuthorIdentity::Known { login } => members.contains(login),
                AuthorIdentity::Unattributed { .. } => false,
            });
        }

        commits.sort_by(|a, b| {
            b.commit
                .authored_at
                .cmp(&a.commit.authored_at)
                .then_with(|| a.commit.sha.cmp(&b.commit.sha))
        });

        let watermark = if failed_repositories.is_empty() && request.repo_filter.is_empty() {
            self.advance_watermark(org, &commits, on_progress).await
        } else {
            // Skipped repositories may hold commits older than what this run saw.
            tracing::info!(
                failed = failed_repositories.len(),
                filtered = !request.repo_filter.is_empty(),
                "Partial run, keeping the previous watermark"
            );
            self.watermarks.get(org).map(|s| s.watermark)
        };

        Ok(SyncOutcome {
            org: org.to_string(),
            commits,
            user_stats,
            repositories_synced,
            failed_repositories,
            since: window.since,
            until: window.until,
            watermark,
        })
    }

    async fn advance_watermark(
        &self,
        org: &str,
        commits: &[SyncedCommit],
        on_progress: Option<&ProgressCallback>,
    ) -> Option<DateTime<Utc>> {
        let observed = commits.iter().map(|c| c.commit.authored_at).max();
        let watermark = self
            .watermarks
            .advance(org, observed, Utc::now())
            .map(|s| s.watermark);
        if let Err(e) = self.watermarks.flush().await {
            tracing::warn!(error = %e, "Failed to persist sync watermark");
            emit(
                on_progress,
                SyncProgress::Warning {
                    message: format!("Could not persist sync watermark: {e}"),
                },
            );
        }
        watermark
    }

    /// Resolve the commit window and the exclusive lower bound for new
    /// commits.
    ///
    /// With a stored watermark, `since` is the later of the requested `since`
    /// and the watermark; commits at or before the watermark were already
    /// counted by an earlier run. Without one, the requested `since` is used,
    /// falling back to the configured look-back.
    fn effective_window(
        &self,
        org: &str,
        requested: DateWindow,
    ) -> (DateWindow, Option<DateTime<Utc>>) {
        match self.watermarks.get(org).map(|s| s.watermark) {
            Some(watermark) if requested.since.is_none_or(|s| watermark >= s) => (
                DateWindow::new(Some(watermark), requested.until),
                Some(watermark),
            ),
            _ => {
                let since = requested
                    .since
                    .unwrap_or_else(|| Utc::now() - self.options.lookback);
                (DateWindow::new(Some(since), requested.until), None)
            }
        }
    }

    async fn fetch_repositories(
        &self,
        request: &SyncRequest,
        on_progress: Option<&ProgressCallback>,
    ) -> Result<Vec<Repository>, SyncError> {
        let org = request.org.as_str();
        let auth = request.credential.as_deref();

        let fetched: Fetched<Vec<Repository>> = self
            .cache
            .get_or_fetch(
                CacheCategory::Repositories,
                &keys::repositories(org, auth),
                || self.client.list_org_repos(org, auth),
            )
            .await?;
        publish(
            &self.cache_status,
            CacheCategory::Repositories,
            org,
            fetched.data.len(),
            fetched.source,
        );

        let mut repos = fetched.data;
        if !request.repo_filter.is_empty() {
            repos.retain(|r| {
                request
                    .repo_filter
                    .iter()
                    .any(|f| f == &r.name || f == &r.full_name)
            });
        }

        if repos.is_empty() {
            return Err(SyncError::EmptyOrganization {
                org: org.to_string(),
            });
        }

        tracing::info!(repositories = repos.len(), source = ?fetched.source, "Repositories resolved");
        emit(
            on_progress,
            SyncProgress::ReposResolved {
                org: org.to_string(),
                total: repos.len(),
                source: fetched.source,
            },
        );
        Ok(repos)
    }

    async fn fetch_members(
        &self,
        org: &str,
        auth: Option<&str>,
    ) -> Result<HashSet<String>, SyncError> {
        let fetched: Fetched<Vec<String>> = self
            .cache
            .get_or_fetch(
                CacheCategory::Employees,
                &keys::employees(org, auth),
                || self.client.list_org_members(org, auth),
            )
            .await?;
        publish(
            &self.cache_status,
            CacheCategory::Employees,
            org,
            fetched.data.len(),
            fetched.source,
        );
        Ok(fetched.data.into_iter().collect())
    }

    /// Fetch branches and commits for every repository, batch by batch.
    async fn fetch_commits(
        &self,
        org: &str,
        repos: &[Repository],
        auth: Option<&str>,
        window: DateWindow,
        on_progress: Option<&ProgressCallback>,
    ) -> (Vec<RepoCommits>, Vec<RepoFailure>) {
        let batch_size = self.options.batch_size.max(1);
        let batches = repos.len().div_ceil(batch_size);
        let semaphore = Arc::new(Semaphore::new(batch_size));

        let mut fetched = Vec::with_capacity(repos.len());
        let mut failures = Vec::new();

        for (index, batch) in repos.chunks(batch_size).enumerate() {
            if index > 0 && !self.options.batch_delay.is_zero() {
                tokio::time::sleep(self.options.batch_delay).await;
            }

            tracing::debug!(batch = index + 1, batches, size = batch.len(), "Starting batch");
            emit(
                on_progress,
                SyncProgress::BatchStarted {
                    batch: index + 1,
                    batches,
                    size: batch.len(),
                },
            );

            let mut handles = Vec::with_capacity(batch.len());
            for repo in batch {
                let task = RepoTask {
                    client: self.client.clone(),
                    cache: self.cache.clone(),
                    status: Arc::clone(&self.cache_status),
                    org: org.to_string(),
                    repository: repo.full_name.clone(),
                    auth: auth.map(str::to_string),
                    window,
                };
                let semaphore = Arc::clone(&semaphore);

                let handle = tokio::spawn(async move {
                    let _permit = match semaphore.acquire_owned().await {
                        Ok(permit) => permit,
                        Err(_) => {
                            return Err(PlatformError::internal("Semaphore closed unexpectedly"));
                        }
                    };
                    task.run().await
                });
                handles.push((repo.full_name.clone(), handle));
            }

            for (repository, handle) in handles {
                let result = match handle.await {
                    Ok(result) => result,
                    Err(e) => Err(PlatformError::internal(format!("Task panic: {e}"))),
                };

                match result {
                    Ok(repo) => {
                        tracing::debug!(
                            repository = %repo.repository,
                            branches = repo.branches.len(),
                            commits = repo.commits.len(),
                            "Repository synced"
                        );
                        emit(
                            on_progress,
                            SyncProgress::RepositorySynced {
                                repository: repo.repository.clone(),
                                branches: repo.branches.len(),
                                commits: repo.commits.len(),
                            },
                        );
                        fetched.push(repo);
                    }
                    Err(e) => {
                        let error = short_error_message(&e);
                        tracing::warn!(repository = %repository, error = %error, "Repository sync failed");
                        emit(
                            on_progress,
                            SyncProgress::RepositoryFailed {
                                repository: repository.clone(),
                                error: error.clone(),
                            },
                        );
                        failures.push(RepoFailure { repository, error });
                    }
                }
            }
        }

        (fetched, failures)
    }
}
