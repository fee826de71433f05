use std::collections::BTreeMap;
use std::sync::Mutex;

use async_trait::async_trait;
use revio_core::{InlineComment, PrMetadata, RevioError};
use revio_difflens::parser::{parse_unified_diff, FileDiff};
use serde::Deserialize;
use sha2::{Digest, Sha256};

use crate::provider::{Capability, GitProvider};

/// GitHub pull request access.
///
/// JSON endpoints go through `octocrab`; the raw diff, raw file contents and
/// comment deletion use plain `reqwest` calls against the same API root.
///
/// # Examples
///
/// ```no_run
/// use revio_review::github::GitHubProvider;
///
/// let provider = GitHubProvider::new("https://api.github.com", "ghp_xxxx", "octocat", "hello-world", 42).unwrap();
/// ```
pub struct GitHubProvider {
    octocrab: octocrab::Octocrab,
    http: reqwest::Client,
    api_url: String,
    web_url: String,
    token: String,
    owner: String,
    repo: String,
    number: u64,
    head_sha: Mutex<Option<String>>,
    temporary_comments: Mutex<Vec<u64>>,
}

#[derive(Deserialize)]
struct PullResponse {
    title: String,
    body: Option<String>,
    head: HeadRef,
}

#[derive(Deserialize)]
struct HeadRef {
    #[serde(rename = "ref")]
    branch: String,
    sha: String,
}

#[derive(Deserialize)]
struct CommitEntry {
    commit: CommitDetail,
}

#[derive(Deserialize)]
struct CommitDetail {
    message: String,
}

#[derive(Deserialize)]
struct CreatedComment {
    id: u64,
}

impl GitHubProvider {
    /// Create a provider for `owner/repo#number` against `api_url`.
    ///
    /// # Errors
    ///
    /// Returns [`RevioError::Git`] if the clients cannot be built.
    pub fn new(
        api_url: &str,
        token: &str,
        owner: &str,
        repo: &str,
        number: u64,
    ) -> Result<Self, RevioError> {
        let api_url = api_url.trim_end_matches('/').to_string();

        let octocrab = octocrab::Octocrab::builder()
            .base_uri(api_url.as_str())
            .map_err(|e| RevioError::Git(format!("invalid GitHub API URL {api_url}: {e}")))?
            .personal_token(token.to_string())
            .build()
            .map_err(|e| RevioError::Git(format!("failed to create GitHub client: {e}")))?;

        let http = reqwest::Client::builder()
            .user_agent("revio")
            .build()
            .map_err(|e| RevioError::Git(format!("failed to create HTTP client: {e}")))?;

        Ok(Self {
            octocrab,
            http,
            web_url: web_url_for(&api_url),
            api_url,
            token: token.to_string(),
            owner: owner.to_string(),
            repo: repo.to_string(),
            number,
            head_sha: Mutex::new(None),
            temporary_comments: Mutex::new(Vec::new()),
        })
    }

    fn repo_route(&self) -> String {
        format!("/repos/{}/{}", self.owner, self.repo)
    }

    async fn pull(&self) -> Result<PullResponse, RevioError> {
        let route = format!("{}/pulls/{}", self.repo_route(), self.number);
        let pull: PullResponse = self
            .octocrab
            .get(route, None::<&()>)
            .await
            .map_err(|e| RevioError::Git(format!("failed to fetch PR: {e}")))?;
        if let Ok(mut sha) = self.head_sha.lock() {
            *sha = Some(pull.head.sha.clone());
        }
        Ok(pull)
    }

    /// Head commit of the PR, fetched once.
    async fn head_sha(&self) -> Result<String, RevioError> {
        let cached = self.head_sha.lock().ok().and_then(|sha| sha.clone());
        match cached {
            Some(sha) => Ok(sha),
            None => Ok(self.pull().await?.head.sha),
        }
    }

    async fn raw_get(&self, url: &str, accept: &str, query: &[(&str, &str)]) -> Result<String, RevioError> {
        let response = self
            .http
            .get(url)
            .query(query)
            .header("Accept", accept)
            .header("Authorization", format!("Bearer {}", self.token))
            .send()
            .await
            .map_err(|e| RevioError::Git(format!("request to {url} failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(RevioError::Git(format!("GitHub API error {status}: {body}")));
        }

        response
            .text()
            .await
            .map_err(|e| RevioError::Git(format!("failed to read response: {e}")))
    }

    async fn post_review(&self, items: &[InlineComment], multi_line: bool) -> Result<(), RevioError> {
        let comments: Vec<serde_json::Value> = items
            .iter()
            .map(|c| {
                let mut comment = serde_json::json!({
                    "path": c.path,
                    "body": c.body,
                    "line": c.end_line,
                    "side": "RIGHT",
                });
                if multi_line && c.start_line < c.end_line {
                    comment["start_line"] = c.start_line.into();
                    comment["start_side"] = "RIGHT".into();
                }
                comment
            })
            .collect();

        let route = format!("{}/pulls/{}/reviews", self.repo_route(), self.number);
        let body = serde_json::json!({
            "event": "COMMENT",
            "comments": comments,
        });

        let _response: serde_json::Value = self
            .octocrab
            .post(route, Some(&body))
            .await
            .map_err(|e| RevioError::Git(format!("failed to post review: {e}")))?;

        tracing::debug!(count = items.len(), "posted review comments");
        Ok(())
    }
}

fn web_url_for(api_url: &str) -> String {
    if api_url == "https://api.github.com" {
        return "https://github.com".into();
    }
    api_url
        .strip_suffix("/api/v3")
        .unwrap_or(api_url)
        .to_string()
}

#[async_trait]
impl GitProvider for GitHubProvider {
    async fn get_metadata(&self) -> Result<PrMetadata, RevioError> {
        let pull = self.pull().await?;

        let route = format!("{}/pulls/{}/commits", self.repo_route(), self.number);
        let commits: Vec<CommitEntry> = self
            .octocrab
            .get(route, Some(&[("per_page", "100")]))
            .await
            .map_err(|e| RevioError::Git(format!("failed to fetch PR commits: {e}")))?;

        Ok(PrMetadata {
            title: pull.title,
            branch: pull.head.branch,
            description: pull.body.unwrap_or_default(),
            commit_messages: commits.into_iter().map(|c| c.commit.message).collect(),
        })
    }

    async fn get_languages(&self) -> Result<BTreeMap<String, u64>, RevioError> {
        let route = format!("{}/languages", self.repo_route());
        self.octocrab
            .get(route, None::<&()>)
            .await
            .map_err(|e| RevioError::Git(format!("failed to fetch languages: {e}")))
    }

    async fn get_diff(&self) -> Result<Vec<FileDiff>, RevioError> {
        let url = format!("{}{}/pulls/{}", self.api_url, self.repo_route(), self.number);
        let diff = self
            .raw_get(&url, "application/vnd.github.v3.diff", &[])
            .await?;
        parse_unified_diff(&diff)
    }

    async fn get_file_content(&self, path: &str) -> Result<String, RevioError> {
        let sha = self.head_sha().await?;
        let url = format!("{}{}/contents/{path}", self.api_url, self.repo_route());
        self.raw_get(&url, "application/vnd.github.raw", &[("ref", sha.as_str())])
            .await
    }

    async fn publish_comment(&self, body: &str, temporary: bool) -> Result<(), RevioError> {
        let route = format!("{}/issues/{}/comments", self.repo_route(), self.number);
        let created: CreatedComment = self
            .octocrab
            .post(route, Some(&serde_json::json!({ "body": body })))
            .await
            .map_err(|e| RevioError::Git(format!("failed to post comment: {e}")))?;

        if temporary {
            if let Ok(mut ids) = self.temporary_comments.lock() {
                ids.push(created.id);
            }
        }
        Ok(())
    }

    async fn remove_initial_comment(&self) -> Result<(), RevioError> {
        let ids: Vec<u64> = match self.temporary_comments.lock() {
            Ok(mut ids) => std::mem::take(&mut *ids),
            Err(_) => return Ok(()),
        };

        for id in ids {
            let url = format!("{}{}/issues/comments/{id}", self.api_url, self.repo_route());
            let result = self
                .http
                .delete(&url)
                .header("Authorization", format!("Bearer {}", self.token))
                .send()
                .await;
            match result {
                Ok(r) if r.status().is_success() => {}
                Ok(r) => tracing::warn!(id, status = %r.status(), "failed to remove temporary comment"),
                Err(e) => tracing::warn!(id, error = %e, "failed to remove temporary comment"),
            }
        }
        Ok(())
    }

    async fn publish_code_suggestions(&self, items: &[InlineComment]) -> Result<usize, RevioError> {
        self.post_review(items, true).await?;
        Ok(0)
    }

    async fn publish_inline_comments(&self, items: &[InlineComment]) -> Result<usize, RevioError> {
        self.post_review(items, false).await?;
        Ok(0)
    }

    fn get_line_link(&self, path: &str, start: u32, end: u32) -> String {
        let mut hasher = Sha256::new();
        hasher.update(path.as_bytes());
        format!(
            "{}/{}/{}/pull/{}/files#diff-{:x}R{start}-R{end}",
            self.web_url,
            self.owner,
            self.repo,
            self.number,
            hasher.finalize()
        )
    }

    fn is_supported(&self, _capability: Capability) -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::Matcher;

    fn provider(url: &str) -> GitHubProvider {
        GitHubProvider::new(url, "ghp_test", "o", "r", 1).unwrap()
    }

    const DIFF: &str = "\
diff --git a/src/a.rs b/src/a.rs
--- a/src/a.rs
+++ b/src/a.rs
@@ -1,1 +1,1 @@
-old
+new
";

    #[test]
    fn web_url_mapping() {
        assert_eq!(web_url_for("https://api.github.com"), "https://github.com");
        assert_eq!(web_url_for("https://ghe.corp/api/v3"), "https://ghe.corp");
    }

    #[tokio::test]
    async fn line_link_uses_path_hash() {
        let p = GitHubProvider::new("https://api.github.com", "t", "o", "r", 5).unwrap();
        let link = p.get_line_link("src/a.rs", 3, 7);
        assert!(link.starts_with("https://github.com/o/r/pull/5/files#diff-"));
        assert!(link.ends_with("R3-R7"));
        let hash = link.split("#diff-").nth(1).unwrap().split('R').next().unwrap();
        assert_eq!(hash.len(), 64);
    }

    #[tokio::test]
    async fn fetches_diff_with_diff_media_type() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/repos/o/r/pulls/1")
            .match_header("accept", "application/vnd.github.v3.diff")
            .match_header("authorization", "Bearer ghp_test")
            .with_status(200)
            .with_body(DIFF)
            .create_async()
            .await;

        let files = provider(&server.url()).get_diff().await.unwrap();
        assert_eq!(files.len(), 1);
        assert_eq!(files[0].hunks.len(), 1);
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn diff_error_status_is_git_error() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/repos/o/r/pulls/1")
            .with_status(404)
            .with_body("Not Found")
            .create_async()
            .await;

        let err = provider(&server.url()).get_diff().await.unwrap_err();
        assert!(matches!(err, RevioError::Git(ref m) if m.contains("404")));
    }

    #[tokio::test]
    async fn metadata_combines_pull_and_commits() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/repos/o/r/pulls/1")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"title":"Add cache","body":null,"head":{"ref":"feat/cache","sha":"abc"}}"#)
            .create_async()
            .await;
        server
            .mock("GET", "/repos/o/r/pulls/1/commits")
            .match_query(Matcher::Any)
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"[{"commit":{"message":"add cache"}},{"commit":{"message":"fix"}}]"#)
            .create_async()
            .await;

        let meta = provider(&server.url()).get_metadata().await.unwrap();
        assert_eq!(meta.title, "Add cache");
        assert_eq!(meta.branch, "feat/cache");
        assert_eq!(meta.description, "");
        assert_eq!(meta.commit_messages, ["add cache", "fix"]);
    }

    #[tokio::test]
    async fn suggestions_post_multi_line_review() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/repos/o/r/pulls/1/reviews")
            .match_body(Matcher::AllOf(vec![
                Matcher::PartialJson(serde_json::json!({"event": "COMMENT"})),
                Matcher::Regex(r#""start_line":3"#.into()),
                Matcher::Regex(r#""line":5"#.into()),
            ]))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"id":1}"#)
            .create_async()
            .await;

        let item = InlineComment {
            path: "src/a.rs".into(),
            start_line: 3,
            end_line: 5,
            body: "**Suggestion:** x [y]".into(),
        };
        let rejected = provider(&server.url())
            .publish_code_suggestions(&[item])
            .await
            .unwrap();
        assert_eq!(rejected, 0);
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn file_contents_fetch_pull_once() {
        let mut server = mockito::Server::new_async().await;
        let pull = server
            .mock("GET", "/repos/o/r/pulls/1")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"title":"t","body":null,"head":{"ref":"feat","sha":"abc123"}}"#)
            .expect(1)
            .create_async()
            .await;
        let contents = server
            .mock("GET", Matcher::Regex(r"^/repos/o/r/contents/src/[ab]\.rs".into()))
            .match_query(Matcher::UrlEncoded("ref".into(), "abc123".into()))
            .match_header("accept", "application/vnd.github.raw")
            .with_status(200)
            .with_body("fn main() {}\n")
            .expect(2)
            .create_async()
            .await;

        let p = provider(&server.url());
        assert_eq!(p.get_file_content("src/a.rs").await.unwrap(), "fn main() {}\n");
        assert_eq!(p.get_file_content("src/b.rs").await.unwrap(), "fn main() {}\n");
        pull.assert_async().await;
        contents.assert_async().await;
    }

    #[tokio::test]
    async fn temporary_comments_are_deleted() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/repos/o/r/issues/1/comments")
            .with_status(201)
            .with_header("content-type", "application/json")
            .with_body(r#"{"id":77}"#)
            .expect(2)
            .create_async()
            .await;
        let delete = server
            .mock("DELETE", "/repos/o/r/issues/comments/77")
            .with_status(204)
            .expect(1)
            .create_async()
            .await;

        let p = provider(&server.url());
        p.publish_comment("Preparing suggestions...", true).await.unwrap();
        p.publish_comment("final", false).await.unwrap();
        p.remove_initial_comment().await.unwrap();
        p.remove_initial_comment().await.unwrap();
        delete.assert_async().await;
    }
}
