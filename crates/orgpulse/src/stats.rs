//! Contributor statistics.
//!
//! [`aggregate`] folds one repository's commits into a [`UserStats`];
//! [`UserStats::merge`] combines per-repository results. Both are
//! order-independent, so repositories can be aggregated concurrently and
//! merged in completion order.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use serde::ser::{SerializeMap, SerializeSeq};
use serde::{Serialize, Serializer};

use crate::platform::{AuthorIdentity, Commit};

/// Case-insensitive message fragments marking merge and pull-request commits.
pub const MERGE_MARKERS: [&str; 4] = [
    "merge pull request",
    "merge branch",
    "merge remote-tracking branch",
    "pull request #",
];

/// Whether a commit message marks a merge or pull-request commit.
pub fn is_merge_commit(message: &str) -> bool {
    let message = message.to_lowercase();
    MERGE_MARKERS.iter().any(|marker| message.contains(marker))
}

/// Per-repository figures for one author.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RepoStats {
    pub commits: usize,
    pub branches: BTreeSet<String>,
    /// `yyyy-MM-dd` (UTC) to commit count.
    pub by_date: BTreeMap<String, usize>,
}

impl RepoStats {
    fn merge(&mut self, other: RepoStats) {
        self.commits += other.commits;
        self.branches.extend(other.branches);
        for (date, count) in other.by_date {
            *self.by_date.entry(date).or_default() += count;
        }
    }
}

/// All figures for one author.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct AuthorStats {
    pub total_commits: usize,
    pub repositories: BTreeMap<String, RepoStats>,
}

impl AuthorStats {
    fn merge(&mut self, other: AuthorStats) {
        self.total_commits += other.total_commits;
        for (repo, stats) in other.repositories {
            self.repositories.entry(repo).or_default().merge(stats);
        }
    }
}

/// Statistics keyed by author identity.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UserStats {
    pub authors: BTreeMap<AuthorIdentity, AuthorStats>,
}

impl UserStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.authors.is_empty()
    }

    pub fn get(&self, author: &AuthorIdentity) -> Option<&AuthorStats> {
        self.authors.get(author)
    }

    /// Total commits across every author.
    pub fn total_commits(&self) -> usize {
        self.authors.values().map(|a| a.total_commits).sum()
    }

    /// Fold `other` into `self`. Commutative and associative.
    pub fn merge(&mut self, other: UserStats) {
        for (author, stats) in other.authors {
            self.authors.entry(author).or_default().merge(stats);
        }
    }

    /// Keep only authors for which `keep` returns true.
    pub fn retain(&mut self, mut keep: impl FnMut(&AuthorIdentity) -> bool) {
        self.authors.retain(|author, _| keep(author));
    }

    /// Authors ordered by total commits, most active first.
    pub fn ranked(&self) -> Vec<(&AuthorIdentity, &AuthorStats)> {
        let mut ranked: Vec<_> = self.authors.iter().collect();
        ranked.sort_by(|a, b| b.1.total_commits.cmp(&a.1.total_commits).then(a.0.cmp(b.0)));
        ranked
    }
}

// Serialized as a list because author identities are not string keys.
impl Serialize for UserStats {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        struct Row<'a>(&'a AuthorIdentity, &'a AuthorStats);

        impl Serialize for Row<'_> {
            fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
                let mut map = serializer.serialize_map(Some(2))?;
                map.serialize_entry("author", self.0)?;
                map.serialize_entry("stats", self.1)?;
                map.end()
            }
        }

        let mut seq = serializer.serialize_seq(Some(self.authors.len()))?;
        for (author, stats) in &self.authors {
            seq.serialize_element(&Row(author, stats))?;
        }
        seq.end()
    }
}

/// Aggregate one repository's commits.
///
/// Merge and pull-request commits are skipped. `membership` maps commit sha
/// to branch names (see [`crate::branches::resolve`]); commits without an
/// entry count with an empty branch set.
pub fn aggregate(
    commits: &[Commit],
    membership: &HashMap<String, BTreeSet<String>>,
    repo: &str,
) -> UserStats {
    let mut stats = UserStats::new();

    for commit in commits.iter().filter(|c| !is_merge_commit(&c.message)) {
        let author = stats.authors.entry(commit.author.clone()).or_default();
        author.total_commits += 1;

        let repo_stats = author.repositories.entry(repo.to_string()).or_default();
        repo_stats.commits += 1;
        if let Some(branches) = membership.get(&commit.sha) {
            repo_stats.branches.extend(branches.iter().cloned());
        }
        let date = commit.authored_at.format("%Y-%m-%d").to_string();
        *repo_stats.by_date.entry(date).or_default() += 1;
    }

    stats
}

#[cfg(test)]
mod tests {
    use chrono::{TimeZone, Utc};

    use super::*;

    fn known(login: &str) -> AuthorIdentity {
        AuthorIdentity::Known {
            login: login.to_string(),
        }
    }

    fn commit(sha: &str, author: AuthorIdentity, day: u32, hour: u32, message: &str) -> Commit {
        Commit {
            sha: sha.to_string(),
            author,
            authored_at: Utc.with_ymd_and_hms(2024, 3, day, hour, 0, 0).unwrap(),
            message: message.to_string(),
            parents: Vec::new(),
        }
    }

    fn membership(pairs: &[(&str, &[&str])]) -> HashMap<String, BTreeSet<String>> {
        pairs
            .iter()
            .map(|(sha, names)| {
                (
                    sha.to_string(),
                    names.iter().map(|n| n.to_string()).collect(),
                )
            })
            .collect()
    }

    #[test]
    fn merge_markers_are_case_insensitive() {
        assert!(is_merge_commit("Merge pull request #12 from acme/fix"));
        assert!(is_merge_commit("MERGE BRANCH 'main' into topic"));
        assert!(is_merge_commit("Merge remote-tracking branch 'origin/main'"));
        assert!(is_merge_commit("Squashed (Pull Request #7)"));
        assert!(!is_merge_commit("Emergency fix for branch naming"));
        assert!(!is_merge_commit("Add pull request template"));
    }

    #[test]
    fn aggregates_counts_branches_and_dates() {
        let commits = vec![
            commit("a1", known("ada"), 1, 9, "Add parser"),
            commit("a2", known("ada"), 1, 23, "Fix parser"),
            commit("a3", known("ada"), 2, 0, "Merge pull request #3 from x"),
            commit("g1", known("grace"), 2, 10, "Docs"),
        ];
        let membership = membership(&[
            ("a1", &["main"]),
            ("a2", &["feature", "main"]),
            ("g1", &[]),
        ]);

        let stats = aggregate(&commits, &membership, "acme/api");
        assert_eq!(stats.total_commits(), 3);

        let ada = &stats.get(&known("ada")).unwrap().repositories["acme/api"];
        assert_eq!(ada.commits, 2);
        assert_eq!(
            ada.branches.iter().map(String::as_str).collect::<Vec<_>>(),
            ["feature", "main"]
        );
        assert_eq!(ada.by_date.get("2024-03-01"), Some(&2));
        assert!(ada.by_date.get("2024-03-02").is_none(), "merge commit excluded");

        let grace = &stats.get(&known("grace")).unwrap().repositories["acme/api"];
        assert!(grace.branches.is_empty());
    }

    #[test]
    fn unattributed_authors_are_kept_apart_from_known_ones() {
        let commits = vec![
            commit("a1", known("ada"), 1, 9, "One"),
            commit(
                "a2",
                AuthorIdentity::Unattributed {
                    name: "ada".to_string(),
                    email: None,
                },
                1,
                10,
                "Two",
            ),
        ];
        let stats = aggregate(&commits, &HashMap::new(), "acme/api");
        assert_eq!(stats.authors.len(), 2);
    }

    #[test]
    fn merge_is_commutative_and_associative() {
        let empty = HashMap::new();
        let a = aggregate(
            &[
                commit("1", known("ada"), 1, 0, "x"),
                commit("2", known("grace"), 2, 0, "y"),
            ],
            &membership(&[("1", &["main"])]),
            "acme/api",
        );
        let b = aggregate(
            &[commit("3", known("ada"), 1, 5, "z")],
            &membership(&[("3", &["dev"])]),
            "acme/api",
        );
        let c = aggregate(&[commit("4", known("ada"), 3, 0, "w")], &empty, "acme/web");

        let mut ab_c = a.clone();
        ab_c.merge(b.clone());
        ab_c.merge(c.clone());

        let mut c_ba = c.clone();
        let mut ba = b.clone();
        ba.merge(a.clone());
        c_ba.merge(ba);

        assert_eq!(ab_c, c_ba);

        let ada = ab_c.get(&known("ada")).unwrap();
        assert_eq!(ada.total_commits, 3);
        let api = &ada.repositories["acme/api"];
        assert_eq!(api.commits, 2);
        assert_eq!(api.by_date["2024-03-01"], 2);
        assert_eq!(api.branches.len(), 2);
    }

    #[test]
    fn input_order_does_not_matter() {
        let mut commits = vec![
            commit("1", known("ada"), 1, 0, "x"),
            commit("2", known("grace"), 2, 0, "y"),
            commit("3", known("ada"), 4, 0, "z"),
        ];
        let forward = aggregate(&commits, &HashMap::new(), "acme/api");
        commits.reverse();
        assert_eq!(forward, aggregate(&commits, &HashMap::new(), "acme/api"));
    }

    #[test]
    fn ranked_orders_by_total_commits() {
        let stats = aggregate(
            &[
                commit("1", known("ada"), 1, 0, "x"),
                commit("2", known("grace"), 2, 0, "y"),
                commit("3", known("grace"), 3, 0, "z"),
            ],
            &HashMap::new(),
            "acme/api",
        );
        let order: Vec<String> = stats.ranked().iter().map(|(a, _)| a.to_string()).collect();
        assert_eq!(order, ["grace", "ada"]);
    }

    #[test]
    fn serializes_as_author_rows() {
        let stats = aggregate(
            &[commit("1", known("ada"), 1, 0, "x")],
            &HashMap::new(),
            "acme/api",
        );
        let json = serde_json::to_value(&stats).unwrap();
        assert_eq!(json[0]["author"]["login"], "ada");
        assert_eq!(json[0]["stats"]["total_commits"], 1);
        assert_eq!(json[0]["stats"]["repositories"]["acme/api"]["by_date"]["2024-03-01"], 1);
    }
}
