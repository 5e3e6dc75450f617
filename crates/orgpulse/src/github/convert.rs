//! Conversion from GitHub response shapes to engine types.

use crate::platform::{AuthorIdentity, Branch, Commit, PlatformError, Repository};

use super::types::{GitHubBranch, GitHubCommit, GitHubRepo, GitHubUser};

/// Author name used when a commit carries no usable signature.
const UNKNOWN_AUTHOR: &str = "unknown";

pub fn to_repository(repo: GitHubRepo) -> Repository {
    Repository {
        id: repo.id,
        name: repo.name,
        full_name: repo.full_name,
        default_branch: repo.default_branch,
        pushed_at: repo.pushed_at,
    }
}

pub fn to_branch(branch: GitHubBranch) -> Branch {
    Branch {
        name: branch.name,
        head_sha: branch.commit.sha,
    }
}

pub fn to_member(user: GitHubUser) -> String {
    user.login
}

/// Convert a commit listing item.
///
/// The author date is preferred; the committer date is used when the author
/// signature has none. A commit with neither is rejected.
pub fn to_commit(commit: GitHubCommit, resource: &str) -> Result<Commit, PlatformError> {
    let detail = commit.commit;
    let authored_at = detail
        .author
        .as_ref()
        .and_then(|a| a.date)
        .or_else(|| detail.committer.as_ref().and_then(|c| c.date))
        .ok_or_else(|| PlatformError::Decode {
            resource: resource.to_string(),
            message: format!("commit {} has no author or committer date", commit.sha),
        })?;

    let author = match commit.author {
        Some(user) => AuthorIdentity::Known { login: user.login },
        None => {
            let signature = detail.author.as_ref();
            AuthorIdentity::Unattributed {
                name: signature
                    .and_then(|a| a.name.clone())
                    .filter(|n| !n.trim().is_empty())
                    .unwrap_or_else(|| UNKNOWN_AUTHOR.to_string()),
                email: signature.and_then(|a| a.email.clone()),
            }
        }
    };

    Ok(Commit {
        sha: commit.sha,
        author,
        authored_at,
        message: detail.message,
        parents: commit.parents.into_iter().map(|p| p.sha).collect(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(json: serde_json::Value) -> GitHubCommit {
        serde_json::from_value(json).expect("valid commit json")
    }

    #[test]
    fn linked_author_becomes_known_identity() {
        let commit = parse(serde_json::json!({
            "sha": "c2",
            "commit": {
                "author": {"name": "Ada", "email": "ada@example.com", "date": "2024-03-01T10:00:00Z"},
                "message": "Add parser"
            },
            "author": {"login": "ada"},
            "parents": [{"sha": "c1"}]
        }));

        let converted = to_commit(commit, "commits for acme/api").unwrap();
        assert_eq!(
            converted.author,
            AuthorIdentity::Known {
                login: "ada".to_string()
            }
        );
        assert_eq!(converted.parents, vec!["c1".to_string()]);
        assert_eq!(converted.authored_at.to_rfc3339(), "2024-03-01T10:00:00+00:00");
    }

    #[test]
    fn unlinked_author_falls_back_to_signature_name() {
        let commit = parse(serde_json::json!({
            "sha": "c3",
            "commit": {
                "author": {"name": "Grace", "email": "grace@example.com", "date": "2024-03-02T10:00:00Z"},
                "message": "Fix typo"
            },
            "author": null,
            "parents": []
        }));

        let converted = to_commit(commit, "commits for acme/api").unwrap();
        assert_eq!(
            converted.author,
            AuthorIdentity::Unattributed {
                name: "Grace".to_string(),
                email: Some("grace@example.com".to_string()),
            }
        );
    }

    #[test]
    fn committer_date_is_used_when_author_date_missing() {
        let commit = parse(serde_json::json!({
            "sha": "c4",
            "commit": {
                "author": {"name": "", "email": null},
                "committer": {"date": "2024-04-01T00:00:00Z"},
                "message": "Bump"
            }
        }));

        let converted = to_commit(commit, "commits for acme/api").unwrap();
        assert_eq!(converted.authored_at.to_rfc3339(), "2024-04-01T00:00:00+00:00");
        assert_eq!(
            converted.author,
            AuthorIdentity::Unattributed {
                name: "unknown".to_string(),
                email: None,
            }
        );
    }

    #[test]
    fn commit_without_any_date_is_a_decode_error() {
        let commit = parse(serde_json::json!({
            "sha": "c5",
            "commit": {"message": "??"}
        }));

        let err = to_commit(commit, "commits for acme/api").unwrap_err();
        assert!(matches!(err, PlatformError::Decode { .. }));
        assert!(err.to_string().contains("commits for acme/api"));
    }
}
