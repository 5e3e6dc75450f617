//! Branch membership of commits.
//!
//! Upstream commit listings are per branch, so the same commit may appear
//! under several branches or under none of the fetched heads. Membership is
//! recomputed from the parent graph: a commit belongs to every branch whose
//! head reaches it by following parent links inside the fetched set.

use std::collections::{BTreeSet, HashMap, HashSet, VecDeque};

use crate::platform::{Branch, Commit};

/// Map each commit sha to the names of the branches that reach it.
///
/// Every input commit appears in the result; commits no branch head reaches
/// map to an empty set. Parents outside `commits` end the walk on that path.
pub fn resolve(branches: &[Branch], commits: &[Commit]) -> HashMap<String, BTreeSet<String>> {
    let parents: HashMap<&str, &[String]> = commits
        .iter()
        .map(|c| (c.sha.as_str(), c.parents.as_slice()))
        .collect();

    let mut membership: HashMap<String, BTreeSet<String>> = commits
        .iter()
        .map(|c| (c.sha.clone(), BTreeSet::new()))
        .collect();

    for branch in branches {
        if !parents.contains_key(branch.head_sha.as_str()) {
            tracing::trace!(
                branch = %branch.name,
                head = %branch.head_sha,
                "Branch head outside fetched commits"
            );
            continue;
        }

        let mut visited: HashSet<&str> = HashSet::new();
        let mut queue: VecDeque<&str> = VecDeque::from([branch.head_sha.as_str()]);

        while let Some(sha) = queue.pop_front() {
            if !visited.insert(sha) {
                continue;
            }
            let Some(parent_shas) = parents.get(sha) else {
                continue;
            };
            if let Some(names) = membership.get_mut(sha) {
                names.insert(branch.name.clone());
            }
            queue.extend(
                parent_shas
                    .iter()
                    .map(String::as_str)
                    .filter(|p| parents.contains_key(p) && !visited.contains(p)),
            );
        }
    }

    membership
}

#[cfg(test)]
mod tests {
    use chrono::{DateTime, Utc};

    use super::*;
    use crate::platform::AuthorIdentity;

    fn commit(sha: &str, parents: &[&str]) -> Commit {
        Commit {
            sha: sha.to_string(),
            author: AuthorIdentity::Known {
                login: "ada".to_string(),
            },
            authored_at: DateTime::<Utc>::from_timestamp(1_700_000_000, 0).unwrap(),
            message: format!("commit {sha}"),
            parents: parents.iter().map(|p| p.to_string()).collect(),
        }
    }

    fn branch(name: &str, head: &str) -> Branch {
        Branch {
            name: name.to_string(),
            head_sha: head.to_string(),
        }
    }

    fn names(map: &HashMap<String, BTreeSet<String>>, sha: &str) -> Vec<String> {
        map[sha].iter().cloned().collect()
    }

    #[test]
    fn shared_history_belongs_to_both_branches() {
        let commits = vec![commit("c3", &["c2"]), commit("c2", &["c1"]), commit("c1", &[])];
        let branches = vec![branch("main", "c3"), branch("feature", "c2")];

        let membership = resolve(&branches, &commits);
        assert_eq!(names(&membership, "c3"), ["main"]);
        assert_eq!(names(&membership, "c2"), ["feature", "main"]);
        assert_eq!(names(&membership, "c1"), ["feature", "main"]);
    }

    #[test]
    fn walk_stops_at_parents_outside_fetched_set() {
        // c1 fell outside the fetched window.
        let commits = vec![commit("c3", &["c2"]), commit("c2", &["c1"])];
        let membership = resolve(&[branch("main", "c3")], &commits);

        assert_eq!(membership.len(), 2);
        assert_eq!(names(&membership, "c2"), ["main"]);
        assert!(!membership.contains_key("c1"));
    }

    #[test]
    fn unreachable_commits_are_kept_with_no_branches() {
        let commits = vec![commit("c2", &["c1"]), commit("c1", &[]), commit("orphan", &[])];
        let membership = resolve(&[branch("main", "c2")], &commits);

        assert!(membership["orphan"].is_empty());
        assert_eq!(names(&membership, "c1"), ["main"]);
    }

    #[test]
    fn merge_commits_reach_both_parents_once() {
        //   m
        //  / \
        // a   b
        //  \ /
        //   r
        let commits = vec![
            commit("m", &["a", "b"]),
            commit("a", &["r"]),
            commit("b", &["r"]),
            commit("r", &[]),
        ];
        let membership = resolve(&[branch("main", "m"), branch("topic", "b")], &commits);

        assert_eq!(names(&membership, "a"), ["main"]);
        assert_eq!(names(&membership, "b"), ["main", "topic"]);
        assert_eq!(names(&membership, "r"), ["main", "topic"]);
    }

    #[test]
    fn head_outside_fetched_set_contributes_nothing() {
        let commits = vec![commit("c1", &[])];
        let membership = resolve(&[branch("stale", "zzz")], &commits);
        assert!(membership["c1"].is_empty());
    }

    #[test]
    fn cycles_terminate() {
        let commits = vec![commit("x", &["y"]), commit("y", &["x"])];
        let membership = resolve(&[branch("main", "x")], &commits);
        assert_eq!(names(&membership, "y"), ["main"]);
    }
}
