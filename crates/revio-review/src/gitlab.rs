use std::collections::BTreeMap;
use std::fmt::Write;
use std::sync::Mutex;

use async_trait::async_trait;
use reqwest::Url;
use revio_core::{InlineComment, PrMetadata, RevioError};
use revio_difflens::parser::{parse_unified_diff, FileDiff};
use serde::de::DeserializeOwned;
use serde::Deserialize;

use crate::provider::{Capability, GitProvider};

/// GitLab merge request access over the v4 REST API.
///
/// Suggestion items become MR discussions positioned on the head commit;
/// plain inline comments are not supported.
pub struct GitLabProvider {
    http: reqwest::Client,
    api: Url,
    web_url: String,
    token: String,
    project: String,
    iid: u64,
    mr: Mutex<Option<MrInfo>>,
    temporary_notes: Mutex<Vec<u64>>,
}

#[derive(Debug, Clone, Deserialize)]
struct MergeRequest {
    title: String,
    description: Option<String>,
    source_branch: String,
    diff_refs: DiffRefs,
}

#[derive(Debug, Clone, Deserialize)]
struct DiffRefs {
    base_sha: String,
    start_sha: String,
    head_sha: String,
}

#[derive(Debug, Clone)]
struct MrInfo {
    source_branch: String,
    diff_refs: DiffRefs,
}

#[derive(Deserialize)]
struct MrCommit {
    message: String,
}

#[derive(Deserialize)]
struct MrChanges {
    changes: Vec<MrChange>,
}

#[derive(Deserialize)]
struct MrChange {
    old_path: String,
    new_path: String,
    #[serde(default)]
    new_file: bool,
    #[serde(default)]
    deleted_file: bool,
    #[serde(default)]
    renamed_file: bool,
    diff: String,
}

#[derive(Deserialize)]
struct CreatedNote {
    id: u64,
}

impl GitLabProvider {
    /// Create a provider for merge request `iid` of `project` on `gitlab_url`.
    ///
    /// # Errors
    ///
    /// Returns [`RevioError::Config`] for an unusable URL, or
    /// [`RevioError::Git`] if the HTTP client cannot be built.
    pub fn new(gitlab_url: &str, token: &str, project: &str, iid: u64) -> Result<Self, RevioError> {
        let web_url = gitlab_url.trim_end_matches('/').to_string();
        let api = Url::parse(&format!("{web_url}/api/v4"))
            .map_err(|e| RevioError::Config(format!("invalid GitLab URL {web_url}: {e}")))?;
        if api.cannot_be_a_base() {
            return Err(RevioError::Config(format!("invalid GitLab URL {web_url}")));
        }

        let http = reqwest::Client::builder()
            .user_agent("revio")
            .build()
            .map_err(|e| RevioError::Git(format!("failed to create HTTP client: {e}")))?;

        Ok(Self {
            http,
            api,
            web_url,
            token: token.to_string(),
            project: project.to_string(),
            iid,
            mr: Mutex::new(None),
            temporary_notes: Mutex::new(Vec::new()),
        })
    }

    /// API URL for `projects/{project}/merge_requests/{iid}/{tail...}`.
    fn mr_url(&self, tail: &[&str]) -> Url {
        let iid = self.iid.to_string();
        let mut segments = vec!["merge_requests", iid.as_str()];
        segments.extend_from_slice(tail);
        self.project_url(&segments)
    }

    fn project_url(&self, tail: &[&str]) -> Url {
        let mut url = self.api.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().push("projects").push(&self.project).extend(tail);
        }
        url
    }

    async fn send(&self, request: reqwest::RequestBuilder) -> Result<reqwest::Response, RevioError> {
        let response = request
            .header("PRIVATE-TOKEN", &self.token)
            .send()
            .await
            .map_err(|e| RevioError::Git(format!("GitLab request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(RevioError::Git(format!("GitLab API error {status}: {body}")));
        }
        Ok(response)
    }

    async fn get_json<T: DeserializeOwned>(&self, url: Url) -> Result<T, RevioError> {
        self.send(self.http.get(url))
            .await?
            .json()
            .await
            .map_err(|e| RevioError::Git(format!("failed to parse GitLab response: {e}")))
    }

    async fn post_json<T: DeserializeOwned>(
        &self,
        url: Url,
        body: &serde_json::Value,
    ) -> Result<T, RevioError> {
        self.send(self.http.post(url).json(body))
            .await?
            .json()
            .await
            .map_err(|e| RevioError::Git(format!("failed to parse GitLab response: {e}")))
    }

    async fn merge_request(&self) -> Result<MergeRequest, RevioError> {
        let mr: MergeRequest = self.get_json(self.mr_url(&[])).await?;
        if let Ok(mut cached) = self.mr.lock() {
            *cached = Some(MrInfo {
                source_branch: mr.source_branch.clone(),
                diff_refs: mr.diff_refs.clone(),
            });
        }
        Ok(mr)
    }

    async fn mr_info(&self) -> Result<MrInfo, RevioError> {
        let cached = self.mr.lock().ok().and_then(|c| c.clone());
        match cached {
            Some(info) => Ok(info),
            None => {
                let mr = self.merge_request().await?;
                Ok(MrInfo {
                    source_branch: mr.source_branch,
                    diff_refs: mr.diff_refs,
                })
            }
        }
    }

    async fn post_discussion(&self, item: &InlineComment, refs: &DiffRefs) -> Result<(), RevioError> {
        let lines = item.end_line.saturating_sub(item.start_line);
        let body = item
            .body
            .replace("```suggestion\n", &format!("```suggestion:-0+{lines}\n"));
        let payload = serde_json::json!({
            "body": body,
            "position": {
                "position_type": "text",
                "base_sha": refs.base_sha,
                "start_sha": refs.start_sha,
                "head_sha": refs.head_sha,
                "old_path": item.path,
                "new_path": item.path,
                "new_line": item.start_line,
            },
        });
        let _created: serde_json::Value = self
            .post_json(self.mr_url(&["discussions"]), &payload)
            .await?;
        Ok(())
    }
}

/// Rebuild a git-style file diff from a GitLab change entry.
fn change_to_patch(change: &MrChange, out: &mut String) {
    let old = if change.new_file {
        "/dev/null".to_string()
    } else {
        format!("a/{}", change.old_path)
    };
    let new = if change.deleted_file {
        "/dev/null".to_string()
    } else {
        format!("b/{}", change.new_path)
    };

    let _ = writeln!(out, "diff --git a/{} b/{}", change.old_path, change.new_path);
    if change.new_file {
        out.push_str("new file mode 100644\n");
    }
    if change.deleted_file {
        out.push_str("deleted file mode 100644\n");
    }
    if change.renamed_file {
        let _ = writeln!(out, "rename from {}", change.old_path);
        let _ = writeln!(out, "rename to {}", change.new_path);
    }
    let _ = writeln!(out, "--- {old}");
    let _ = writeln!(out, "+++ {new}");
    out.push_str(&change.diff);
    if !change.diff.ends_with('\n') {
        out.push('\n');
    }
}

#[async_trait]
impl GitProvider for GitLabProvider {
    async fn get_metadata(&self) -> Result<PrMetadata, RevioError> {
        let mr = self.merge_request().await?;
        let commits: Vec<MrCommit> = self.get_json(self.mr_url(&["commits"])).await?;

        Ok(PrMetadata {
            title: mr.title,
            branch: mr.source_branch,
            description: mr.description.unwrap_or_default(),
            // GitLab lists newest first
            commit_messages: commits.into_iter().rev().map(|c| c.message).collect(),
        })
    }

    async fn get_languages(&self) -> Result<BTreeMap<String, u64>, RevioError> {
        let shares: BTreeMap<String, f64> = self.get_json(self.project_url(&["languages"])).await?;
        Ok(shares
            .into_iter()
            .map(|(lang, pct)| (lang, (pct * 100.0).round() as u64))
            .collect())
    }

    async fn get_diff(&self) -> Result<Vec<FileDiff>, RevioError> {
        let changes: MrChanges = self.get_json(self.mr_url(&["changes"])).await?;
        let mut patch = String::new();
        for change in &changes.changes {
            change_to_patch(change, &mut patch);
        }
        parse_unified_diff(&patch)
    }

    async fn get_file_content(&self, path: &str) -> Result<String, RevioError> {
        let head = self.mr_info().await?.diff_refs.head_sha;
        let mut url = self.project_url(&["repository", "files", path, "raw"]);
        url.query_pairs_mut().append_pair("ref", &head);
        self.send(self.http.get(url))
            .await?
            .text()
            .await
            .map_err(|e| RevioError::Git(format!("failed to read file content: {e}")))
    }

    async fn publish_comment(&self, body: &str, temporary: bool) -> Result<(), RevioError> {
        let note: CreatedNote = self
            .post_json(self.mr_url(&["notes"]), &serde_json::json!({ "body": body }))
            .await?;
        if temporary {
            if let Ok(mut ids) = self.temporary_notes.lock() {
                ids.push(note.id);
            }
        }
        Ok(())
    }

    async fn remove_initial_comment(&self) -> Result<(), RevioError> {
        let ids: Vec<u64> = match self.temporary_notes.lock() {
            Ok(mut ids) => std::mem::take(&mut *ids),
            Err(_) => return Ok(()),
        };
        for id in ids {
            let url = self.mr_url(&["notes", &id.to_string()]);
            if let Err(e) = self.send(self.http.delete(url)).await {
                tracing::warn!(id, error = %e, "failed to remove temporary note");
            }
        }
        Ok(())
    }

    async fn publish_code_suggestions(&self, items: &[InlineComment]) -> Result<usize, RevioError> {
        let refs = self.mr_info().await?.diff_refs;
        let mut failed = 0;
        for item in items {
            if let Err(e) = self.post_discussion(item, &refs).await {
                tracing::warn!(path = %item.path, line = item.start_line, error = %e, "failed to post suggestion");
                failed += 1;
            }
        }
        if failed > 0 && failed == items.len() {
            return Err(RevioError::Git(format!("all {failed} suggestions failed to publish")));
        }
        Ok(failed)
    }

    async fn publish_inline_comments(&self, _items: &[InlineComment]) -> Result<usize, RevioError> {
        Err(RevioError::Git(
            "plain inline comments are not supported on GitLab".into(),
        ))
    }

    fn get_line_link(&self, path: &str, start: u32, end: u32) -> String {
        let branch = self
            .mr
            .lock()
            .ok()
            .and_then(|c| c.as_ref().map(|i| i.source_branch.clone()));
        match branch {
            Some(branch) => format!(
                "{}/{}/-/blob/{branch}/{path}?ref_type=heads#L{start}-{end}",
                self.web_url, self.project
            ),
            None => format!(
                "{}/{}/-/merge_requests/{}/diffs",
                self.web_url, self.project, self.iid
            ),
        }
    }

    fn is_supported(&self, capability: Capability) -> bool {
        !matches!(capability, Capability::InlineComments)
    }
}
