//! End-to-end sync tests against a scripted GitHub API.
//!
//! The transport answers by URL path and counts hits, so the tests can tell
//! which listings were served upstream and which came from the cache.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use orgpulse::cache::{CacheCategory, CacheConfig, CacheStore};
use orgpulse::github::GitHubClient;
use orgpulse::http::{HttpError, HttpRequest, HttpResponse, HttpTransport};
use orgpulse::platform::{AuthorIdentity, DateWindow, RateLimitRegistry};
use orgpulse::sync::{
    SyncError, SyncOptions, SyncOrchestrator, SyncProgress, SyncRequest, WatermarkStore,
};
use serde_json::json;

/// Upper bound for a run; hitting it means something hung.
const SYNC_TIMEOUT: Duration = Duration::from_secs(10);

const API: &str = "https://api.test";

#[derive(Clone, Default)]
struct ScriptedGitHub {
    routes: Arc<Mutex<HashMap<String, (u16, serde_json::Value)>>>,
    hits: Arc<Mutex<Vec<HttpRequest>>>,
}

impl ScriptedGitHub {
    fn route(&self, path: &str, status: u16, body: serde_json::Value) {
        self.routes
            .lock()
            .unwrap()
            .insert(format!("{API}{path}"), (status, body));
    }

    fn hits_for(&self, path: &str) -> usize {
        let wanted = format!("{API}{path}");
        self.hits
            .lock()
            .unwrap()
            .iter()
            .filter(|r| r.url.split('?').next() == Some(wanted.as_str()))
            .count()
    }

    fn requests(&self) -> Vec<HttpRequest> {
        self.hits.lock().unwrap().clone()
    }
}

#[async_trait]
impl HttpTransport for ScriptedGitHub {
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse, HttpError> {
        let path = request.url.split('?').next().unwrap_or_default().to_string();
        self.hits.lock().unwrap().push(request.clone());

        let (status, body) = self
            .routes
            .lock()
            .unwrap()
            .get(&path)
            .cloned()
            .ok_or(HttpError::NoMockResponse { url: request.url })?;

        Ok(HttpResponse {
            status,
            headers: vec![
                ("X-RateLimit-Limit".to_string(), "5000".to_string()),
                ("X-RateLimit-Remaining".to_string(), "4999".to_string()),
                (
                    "X-RateLimit-Reset".to_string(),
                    (Utc::now().timestamp() + 3600).to_string(),
                ),
            ],
            body: serde_json::to_vec(&body).unwrap(),
        })
    }
}

fn repo(id: u64, name: &str) -> serde_json::Value {
    json!({
        "id": id,
        "name": name,
        "full_name": format!("acme/{name}"),
        "default_branch": "main",
    })
}

fn branch(name: &str, head: &str) -> serde_json::Value {
    json!({ "name": name, "commit": { "sha": head } })
}

fn commit(
    sha: &str,
    login: Option<&str>,
    date: &str,
    message: &str,
    parents: &[&str],
) -> serde_json::Value {
    json!({
        "sha": sha,
        "commit": {
            "author": { "name": "Dev", "email": "dev@example.com", "date": date },
            "message": message,
        },
        "author": login.map(|l| json!({ "login": l })),
        "parents": parents.iter().map(|p| json!({ "sha": p })).collect::<Vec<_>>(),
    })
}

/// Two repositories; `api` has a feature branch, `web` has an unlinked author.
fn scripted_org() -> ScriptedGitHub {
    let github = ScriptedGitHub::default();
    github.route("/orgs/acme/repos", 200, json!([repo(1, "api"), repo(2, "web")]));
    github.route("/orgs/acme/members", 200, json!([{ "login": "ada" }]));

    github.route(
        "/repos/acme/api/branches",
        200,
        json!([branch("main", "a3"), branch("feature", "a2")]),
    );
    github.route(
        "/repos/acme/api/commits",
        200,
        json!([
            commit("a3", Some("grace"), "2024-01-12T10:00:00Z", "Merge pull request #4 from acme/feature", &["a2"]),
            commit("a2", Some("ada"), "2024-01-11T10:00:00Z", "Add endpoint", &["a1"]),
            commit("a1", Some("ada"), "2024-01-10T10:00:00Z", "Initial commit", &[]),
        ]),
    );

    github.route("/repos/acme/web/branches", 200, json!([branch("main", "w1")]));
    github.route(
        "/repos/acme/web/commits",
        200,
        json!([commit("w1", None, "2024-01-15T08:30:00Z", "Landing page", &[])]),
    );
    github
}

fn client(github: &ScriptedGitHub) -> GitHubClient {
    GitHubClient::new_with_transport(API, Arc::new(github.clone()), RateLimitRegistry::new(0))
}

fn window() -> DateWindow {
    DateWindow::new(Some(Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap()), None)
}

fn options() -> SyncOptions {
    SyncOptions {
        batch_delay: Duration::ZERO,
        ..SyncOptions::default()
    }
}

#[tokio::test]
async fn full_sync_builds_commits_and_stats() {
    let github = scripted_org();
    let orchestrator = SyncOrchestrator::new(
        client(&github),
        CacheStore::new(CacheConfig::default()),
        WatermarkStore::in_memory(),
        options(),
    );

    let outcome = tokio::time::timeout(
        SYNC_TIMEOUT,
        orchestrator.synchronize(
            SyncRequest::new("acme")
                .with_credential(Some("ghp_test".to_string()))
                .with_window(window()),
            None,
        ),
    )
    .await
    .expect("sync timed out")
    .expect("sync failed");

    assert_eq!(outcome.repositories_synced, 2);
    assert!(outcome.failed_repositories.is_empty());

    let shas: Vec<&str> = outcome.commits.iter().map(|c| c.commit.sha.as_str()).collect();
    assert_eq!(shas, ["w1", "a3", "a2", "a1"]);

    let a1 = outcome.commits.iter().find(|c| c.commit.sha == "a1").unwrap();
    assert_eq!(a1.repository, "acme/api");
    assert_eq!(a1.branches.iter().collect::<Vec<_>>(), ["feature", "main"]);

    // Merge commit excluded; unlinked author kept under its own identity.
    assert_eq!(outcome.user_stats.total_commits(), 3);
    let ada = outcome
        .user_stats
        .get(&AuthorIdentity::Known {
            login: "ada".to_string(),
        })
        .unwrap();
    assert_eq!(ada.total_commits, 2);
    assert!(
        outcome
            .user_stats
            .get(&AuthorIdentity::Known {
                login: "grace".to_string()
            })
            .is_none()
    );
    assert!(outcome.user_stats.authors.keys().any(|a| matches!(
        a,
        AuthorIdentity::Unattributed { name, .. } if name == "Dev"
    )));

    assert_eq!(
        outcome.watermark,
        Some(Utc.with_ymd_and_hms(2024, 1, 15, 8, 30, 0).unwrap())
    );

    // Both branches of `api` listed once each, anchored on their heads.
    assert_eq!(github.hits_for("/repos/acme/api/commits"), 2);
    let anchors: Vec<String> = github
        .requests()
        .iter()
        .filter(|r| r.url.starts_with(&format!("{API}/repos/acme/api/commits?")))
        .filter_map(|r| r.url.split("sha=").nth(1).map(|v| v[..2].to_string()))
        .collect();
    assert!(anchors.contains(&"a3".to_string()));
    assert!(anchors.contains(&"a2".to_string()));
    let auth = github.requests()[0]
        .headers
        .iter()
        .find(|(k, _)| k == "Authorization")
        .map(|(_, v)| v.clone());
    assert_eq!(auth.as_deref(), Some("Bearer ghp_test"));
}

#[tokio::test]
async fn repository_failure_is_reported_and_skipped() {
    let github = scripted_org();
    github.route(
        "/repos/acme/web/branches",
        404,
        json!({ "message": "Not Found" }),
    );

    let events = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&events);
    let callback: orgpulse::sync::ProgressCallback =
        Box::new(move |event| sink.lock().unwrap().push(event));

    let orchestrator = SyncOrchestrator::new(
        client(&github),
        CacheStore::new(CacheConfig::default()),
        WatermarkStore::in_memory(),
        options(),
    );
    let outcome = orchestrator
        .synchronize(SyncRequest::new("acme").with_window(window()), Some(&callback))
        .await
        .unwrap();

    assert_eq!(outcome.repositories_synced, 1);
    assert_eq!(outcome.failed_repositories.len(), 1);
    assert_eq!(outcome.failed_repositories[0].repository, "acme/web");
    assert_eq!(github.hits_for("/repos/acme/web/branches"), 1, "404 is not retried");
    assert_eq!(outcome.watermark, None, "partial run keeps the previous watermark");
    assert!(orchestrator.watermarks().get("acme").is_none());

    let events = events.lock().unwrap();
    assert!(events.iter().any(|e| matches!(
        e,
        SyncProgress::RepositoryFailed { repository, .. } if repository == "acme/web"
    )));
    assert!(events.iter().any(|e| matches!(
        e,
        SyncProgress::SyncComplete { failed: 1, .. }
    )));
}

#[tokio::test]
async fn unknown_organization_fails_the_run() {
    let github = ScriptedGitHub::default();
    github.route("/orgs/ghost/repos", 404, json!({ "message": "Not Found" }));

    let orchestrator = SyncOrchestrator::new(
        client(&github),
        CacheStore::new(CacheConfig::default()),
        WatermarkStore::in_memory(),
        options(),
    );
    let err = orchestrator
        .synchronize(SyncRequest::new("ghost"), None)
        .await
        .unwrap_err();

    assert!(matches!(err, SyncError::Platform(_)));
    assert!(err.user_message().contains("repositories for ghost"));
}

#[tokio::test]
async fn members_only_keeps_organization_members() {
    let github = scripted_org();
    let orchestrator = SyncOrchestrator::new(
        client(&github),
        CacheStore::new(CacheConfig::default()),
        WatermarkStore::in_memory(),
        SyncOptions {
            members_only: true,
            ..options()
        },
    );

    let outcome = orchestrator
        .synchronize(SyncRequest::new("acme").with_window(window()), None)
        .await
        .unwrap();

    let authors: Vec<String> = outcome
        .user_stats
        .authors
        .keys()
        .map(ToString::to_string)
        .collect();
    assert_eq!(authors, ["ada"]);
    assert_eq!(github.hits_for("/orgs/acme/members"), 1);
}

#[tokio::test]
async fn cache_and_watermark_survive_restart() {
    let dir = tempfile::tempdir().unwrap();
    let cache_path = dir.path().join("cache.json");
    let watermark_path = dir.path().join("watermarks.json");
    let github = scripted_org();

    {
        let cache = CacheStore::open(CacheConfig::at(&cache_path)).await;
        let watermarks = WatermarkStore::open(&watermark_path).await;
        let orchestrator =
            SyncOrchestrator::new(client(&github), cache.clone(), watermarks, options());

        let first = orchestrator
            .synchronize(SyncRequest::new("acme").with_window(window()), None)
            .await
            .unwrap();
        assert_eq!(first.commits.len(), 4);
        assert!(cache.flush().await.unwrap());
    }
    assert_eq!(github.hits_for("/orgs/acme/repos"), 1);

    let cache = CacheStore::open(CacheConfig::at(&cache_path)).await;
    let status = cache.status();
    let repositories = status
        .categories
        .iter()
        .find(|c| c.category == CacheCategory::Repositories)
        .unwrap();
    assert_eq!(repositories.items, 1);

    let watermarks = WatermarkStore::open(&watermark_path).await;
    assert!(watermarks.get("acme").is_some());

    let orchestrator = SyncOrchestrator::new(client(&github), cache, watermarks, options());
    let second = orchestrator
        .synchronize(SyncRequest::new("acme").with_window(window()), None)
        .await
        .unwrap();

    // Repository and branch listings come from the reloaded cache; commits
    // are listed again from the watermark and nothing new is counted.
    assert_eq!(github.hits_for("/orgs/acme/repos"), 1);
    assert_eq!(github.hits_for("/repos/acme/api/branches"), 1);
    assert_eq!(github.hits_for("/repos/acme/api/commits"), 4);
    assert!(second.commits.is_empty());
    assert!(second.user_stats.is_empty());
    assert_eq!(second.since, first_watermark());
}

fn first_watermark() -> Option<chrono::DateTime<Utc>> {
    Some(Utc.with_ymd_and_hms(2024, 1, 15, 8, 30, 0).unwrap())
}
