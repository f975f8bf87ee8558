//! GitHub REST implementation of [`RepositoryAccessor`].
//!
//! Uses the contents API for reads and single-file commits, the git refs
//! API for branch creation, and the pulls API for publishing. Requests
//! authenticate with a bearer token; timeouts come from
//! `[repository] timeout_secs`.
//!
//! File content is decoded strictly: bytes that are not valid UTF-8 fail
//! with [`RepoError::NotText`] and are never replaced with U+FFFD.

use std::time::Duration;

use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use reqwest::{Method, StatusCode, Url};
use serde::Deserialize;
use serde_json::json;

use super::{CreatedPullRequest, DirEntry, EntryKind, RemoteFile, RepoError, RepositoryAccessor};
use crate::config::{Config, ConfigError};
use crate::models::RepoId;

const API_VERSION: &str = "2022-11-28";

/// Thin GitHub REST client.
pub struct GitHubClient {
    http: reqwest::Client,
    api_url: Url,
    token: String,
}

#[derive(Deserialize)]
struct ContentEntry {
    path: String,
    #[serde(rename = "type")]
    kind: String,
}

#[derive(Deserialize)]
struct ContentFile {
    path: String,
    sha: String,
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    encoding: Option<String>,
}

#[derive(Deserialize)]
struct Blob {
    content: String,
    encoding: String,
}

#[derive(Deserialize)]
struct GitRef {
    object: GitObject,
}

#[derive(Deserialize)]
struct GitObject {
    sha: String,
}

#[derive(Deserialize)]
struct PullResponse {
    number: u64,
    html_url: String,
}

impl GitHubClient {
    /// Create a client against `api_url` (e.g. `https://api.github.com`).
    pub fn new(api_url: &str, token: &str, timeout: Duration) -> Result<Self, ConfigError> {
        let api_url = Url::parse(api_url).map_err(|e| ConfigError::Invalid {
            field: "repository.api_url",
            reason: e.to_string(),
        })?;
        if api_url.cannot_be_a_base() {
            return Err(ConfigError::Invalid {
                field: "repository.api_url",
                reason: format!("{api_url} cannot be used as a base URL"),
            });
        }
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(format!(
                "{}/{}",
                crate::constants::APP_NAME,
                crate::constants::VERSION
            ))
            .build()
            .map_err(|e| ConfigError::Invalid {
                field: "repository",
                reason: format!("failed to build HTTP client: {e}"),
            })?;
        Ok(Self {
            http,
            api_url,
            token: token.to_string(),
        })
    }

    /// Create a client from the `[repository]` section.
    pub fn from_config(config: &Config) -> Result<Self, ConfigError> {
        Self::new(
            &config.repository.api_url,
            config.github_token()?,
            Duration::from_secs(config.repository.timeout_secs),
        )
    }

    /// Build `<api_url>/repos/<owner>/<name>/<segments...>` with each segment escaped.
    fn repo_url<'a>(&self, repo: &RepoId, segments: impl IntoIterator<Item = &'a str>) -> Url {
        let mut url = self.api_url.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty()
                .extend(["repos", repo.owner.as_str(), repo.name.as_str()])
                .extend(segments.into_iter().filter(|s| !s.is_empty()));
        }
        url
    }

    fn contents_url(&self, repo: &RepoId, path: &str) -> Url {
        self.repo_url(repo, std::iter::once("contents").chain(path.split('/')))
    }

    fn request(&self, method: Method, url: Url) -> reqwest::RequestBuilder {
        self.http
            .request(method, url)
            .bearer_auth(&self.token)
            .header("Accept", "application/vnd.github+json")
            .header("X-GitHub-Api-Version", API_VERSION)
    }

    /// Send a request and return the raw response, mapping transport failures.
    async fn send_raw(
        &self,
        url: &Url,
        builder: reqwest::RequestBuilder,
    ) -> Result<reqwest::Response, RepoError> {
        builder.send().await.map_err(|e| RepoError::Transport {
            url: url.to_string(),
            message: e.to_string(),
        })
    }

    /// Send a request and require a success status.
    async fn send(
        &self,
        operation: &str,
        url: &Url,
        builder: reqwest::RequestBuilder,
    ) -> Result<reqwest::Response, RepoError> {
        let response = self.send_raw(url, builder).await?;
        ensure_success(operation, response).await
    }

    async fn fetch_blob(&self, repo: &RepoId, path: &str, sha: &str) -> Result<String, RepoError> {
        let url = self.repo_url(repo, ["git", "blobs", sha]);
        let response = self
            .send("blob fetch", &url, self.request(Method::GET, url.clone()))
            .await?;
        let blob: Blob = decode_json("blob fetch", response).await?;
        if blob.encoding != "base64" {
            return Err(RepoError::Decode {
                operation: "blob fetch".to_string(),
                message: format!("unsupported blob encoding '{}'", blob.encoding),
            });
        }
        into_text(path, decode_base64("blob fetch", &blob.content)?)
    }

    async fn put_contents(
        &self,
        operation: &str,
        repo: &RepoId,
        path: &str,
        body: serde_json::Value,
    ) -> Result<(), RepoError> {
        let url = self.contents_url(repo, path);
        self.send(
            operation,
            &url,
            self.request(Method::PUT, url.clone()).json(&body),
        )
        .await?;
        Ok(())
    }
}

#[async_trait]
impl RepositoryAccessor for GitHubClient {
    async fn branch_tip_sha(&self, repo: &RepoId, branch: &str) -> Result<String, RepoError> {
        let url = self.repo_url(
            repo,
            ["git", "ref", "heads"].into_iter().chain(branch.split('/')),
        );
        let response = self
            .send("branch lookup", &url, self.request(Method::GET, url.clone()))
            .await?;
        let git_ref: GitRef = decode_json("branch lookup", response).await?;
        Ok(git_ref.object.sha)
    }

    async fn create_branch(
        &self,
        repo: &RepoId,
        new_branch: &str,
        from_sha: &str,
    ) -> Result<(), RepoError> {
        let url = self.repo_url(repo, ["git", "refs"]);
        let body = json!({
            "ref": format!("refs/heads/{new_branch}"),
            "sha": from_sha,
        });
        self.send(
            "branch creation",
            &url,
            self.request(Method::POST, url.clone()).json(&body),
        )
        .await?;
        Ok(())
    }

    async fn list_directory(
        &self,
        repo: &RepoId,
        path: &str,
        git_ref: &str,
    ) -> Result<Vec<DirEntry>, RepoError> {
        let mut url = self.contents_url(repo, path);
        url.query_pairs_mut().append_pair("ref", git_ref);
        let response = self
            .send("directory listing", &url, self.request(Method::GET, url.clone()))
            .await?;
        let value: serde_json::Value = decode_json("directory listing", response).await?;
        if !value.is_array() {
            return Err(RepoError::NotADirectory {
                path: path.to_string(),
            });
        }
        let entries: Vec<ContentEntry> =
            serde_json::from_value(value).map_err(|e| RepoError::Decode {
                operation: "directory listing".to_string(),
                message: e.to_string(),
            })?;
        Ok(entries
            .into_iter()
            .map(|entry| DirEntry {
                kind: match entry.kind.as_str() {
                    "file" => EntryKind::File,
                    "dir" => EntryKind::Dir,
                    _ => EntryKind::Other,
                },
                path: entry.path,
            })
            .collect())
    }

    async fn get_file(
        &self,
        repo: &RepoId,
        path: &str,
        git_ref: &str,
    ) -> Result<Option<RemoteFile>, RepoError> {
        let mut url = self.contents_url(repo, path);
        url.query_pairs_mut().append_pair("ref", git_ref);
        let response = self
            .send_raw(&url, self.request(Method::GET, url.clone()))
            .await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        let response = ensure_success("file fetch", response).await?;
        let value: serde_json::Value = decode_json("file fetch", response).await?;
        if value.is_array() {
            return Err(RepoError::Decode {
                operation: "file fetch".to_string(),
                message: format!("{path} is a directory"),
            });
        }
        let file: ContentFile = serde_json::from_value(value).map_err(|e| RepoError::Decode {
            operation: "file fetch".to_string(),
            message: e.to_string(),
        })?;

        // Files above the inline limit come back with `encoding: "none"`.
        let content = match (file.encoding.as_deref(), file.content.as_deref()) {
            (Some("base64"), Some(encoded)) => {
                into_text(&file.path, decode_base64("file fetch", encoded)?)?
            }
            _ => {
                tracing::debug!(path = %file.path, "content not inlined, fetching blob");
                self.fetch_blob(repo, &file.path, &file.sha).await?
            }
        };

        Ok(Some(RemoteFile {
            path: file.path,
            content,
            sha: file.sha,
        }))
    }

    async fn create_file(
        &self,
        repo: &RepoId,
        path: &str,
        message: &str,
        content: &str,
        branch: &str,
    ) -> Result<(), RepoError> {
        let body = json!({
            "message": message,
            "content": BASE64.encode(content),
            "branch": branch,
        });
        self.put_contents("file creation", repo, path, body).await
    }

    async fn update_file(
        &self,
        repo: &RepoId,
        path: &str,
        message: &str,
        content: &str,
        current_sha: &str,
        branch: &str,
    ) -> Result<(), RepoError> {
        let body = json!({
            "message": message,
            "content": BASE64.encode(content),
            "sha": current_sha,
            "branch": branch,
        });
        self.put_contents("file update", repo, path, body).await
    }

    async fn delete_file(
        &self,
        repo: &RepoId,
        path: &str,
        message: &str,
        current_sha: &str,
        branch: &str,
    ) -> Result<(), RepoError> {
        let url = self.contents_url(repo, path);
        let body = json!({
            "message": message,
            "sha": current_sha,
            "branch": branch,
        });
        self.send(
            "file deletion",
            &url,
            self.request(Method::DELETE, url.clone()).json(&body),
        )
        .await?;
        Ok(())
    }

    async fn create_pull_request(
        &self,
        base_repo: &RepoId,
        head: &str,
        base_branch: &str,
        title: &str,
        body: &str,
    ) -> Result<CreatedPullRequest, RepoError> {
        let url = self.repo_url(base_repo, ["pulls"]);
        let payload = json!({
            "title": title,
            "body": body,
            "head": head,
            "base": base_branch,
        });
        let response = self
            .send(
                "pull request creation",
                &url,
                self.request(Method::POST, url.clone()).json(&payload),
            )
            .await?;
        let pull: PullResponse = decode_json("pull request creation", response).await?;
        Ok(CreatedPullRequest {
            number: pull.number,
            html_url: pull.html_url,
        })
    }
}

/// Turn a non-success response into [`RepoError::Status`], keeping the body.
async fn ensure_success(
    operation: &str,
    response: reqwest::Response,
) -> Result<reqwest::Response, RepoError> {
    if response.status().is_success() {
        return Ok(response);
    }
    let status = response.status().as_u16();
    let body = response
        .text()
        .await
        .unwrap_or_else(|_| "<no body>".to_string());
    Err(RepoError::Status {
        operation: operation.to_string(),
        status,
        body: summarize_body(&body),
    })
}

async fn decode_json<T: serde::de::DeserializeOwned>(
    operation: &str,
    response: reqwest::Response,
) -> Result<T, RepoError> {
    response.json::<T>().await.map_err(|e| RepoError::Decode {
        operation: operation.to_string(),
        message: e.to_string(),
    })
}

/// Decode the line-wrapped base64 the contents API returns.
fn decode_base64(operation: &str, encoded: &str) -> Result<Vec<u8>, RepoError> {
    let compact: String = encoded.chars().filter(|c| !c.is_whitespace()).collect();
    BASE64.decode(compact).map_err(|e| RepoError::Decode {
        operation: operation.to_string(),
        message: format!("invalid base64 content: {e}"),
    })
}

fn into_text(path: &str, bytes: Vec<u8>) -> Result<String, RepoError> {
    String::from_utf8(bytes).map_err(|_| RepoError::NotText {
        path: path.to_string(),
    })
}

/// Prefer GitHub's `message` field over the raw JSON error body.
fn summarize_body(body: &str) -> String {
    serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|v| v.get("message").and_then(|m| m.as_str()).map(str::to_string))
        .unwrap_or_else(|| body.trim().chars().take(500).collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client(api_url: &str) -> GitHubClient {
        GitHubClient::new(api_url, "tok", Duration::from_secs(5)).unwrap()
    }

    #[test]
    fn contents_url_escapes_segments() {
        let client = client("https://api.github.com");
        let repo = RepoId::new("octo", "bot");
        let url = client.contents_url(&repo, "src/my file.py");
        assert_eq!(
            url.as_str(),
            "https://api.github.com/repos/octo/bot/contents/src/my%20file.py"
        );
    }

    #[test]
    fn contents_url_for_repository_root() {
        let client = client("https://api.github.com/");
        let url = client.contents_url(&RepoId::new("octo", "bot"), "");
        assert_eq!(url.as_str(), "https://api.github.com/repos/octo/bot/contents");
    }

    #[test]
    fn enterprise_prefix_is_kept() {
        let client = client("https://ghe.example.com/api/v3");
        let url = client.repo_url(&RepoId::new("octo", "bot"), ["pulls"]);
        assert_eq!(url.as_str(), "https://ghe.example.com/api/v3/repos/octo/bot/pulls");
    }

    #[test]
    fn invalid_api_url_is_a_config_error() {
        let err = GitHubClient::new("not a url", "tok", Duration::from_secs(1))
            .err()
            .unwrap();
        assert!(err.to_string().contains("repository.api_url"));
    }

    #[test]
    fn decode_base64_handles_line_wrapping() {
        let encoded = "aGVsbG8g\nd29ybGQ=\n";
        assert_eq!(decode_base64("t", encoded).unwrap(), b"hello world");
    }

    #[test]
    fn invalid_utf8_is_not_text() {
        let err = into_text("logo.png", vec![0x89, b'P', b'N', b'G', 0xff]).unwrap_err();
        assert!(matches!(err, RepoError::NotText { ref path } if path == "logo.png"));
        assert_eq!(into_text("a.py", b"x = 1".to_vec()).unwrap(), "x = 1");
    }

    #[test]
    fn decode_base64_rejects_garbage() {
        assert!(decode_base64("t", "!!!").is_err());
    }

    #[test]
    fn summarize_body_prefers_message_field() {
        let body = r#"{"message":"Reference already exists","documentation_url":"x"}"#;
        assert_eq!(summarize_body(body), "Reference already exists");
        assert_eq!(summarize_body("  plain text  "), "plain text");
    }
}
