//! Remote file retrieval from GitHub.
//!
//! Raw files come from `raw.githubusercontent.com`; directory listings from
//! the git trees endpoint of the REST API. GitHub rejects requests without a
//! `user-agent` header, so the client always sends one.

use std::path::Path;
use std::time::Duration;

use futures::StreamExt;
use reqwest::Client;
use serde::Deserialize;
use tokio::io::AsyncWriteExt;
use tracing::debug;

use crate::error::{MigrateError, Result};

const USER_AGENT: &str = concat!("mdb-reload/", env!("CARGO_PKG_VERSION"));

/// Recursive listing of a repository tree.
#[derive(Debug, Clone, Deserialize)]
pub struct RepoTree {
    pub sha: String,

    #[serde(default)]
    pub truncated: bool,

    pub tree: Vec<TreeEntry>,
}

/// One file or directory in a [`RepoTree`].
#[derive(Debug, Clone, Deserialize)]
pub struct TreeEntry {
    pub path: String,

    /// `blob` for files, `tree` for directories.
    #[serde(rename = "type")]
    pub kind: String,

    #[serde(default)]
    pub size: Option<u64>,
}

impl TreeEntry {
    pub fn is_file(&self) -> bool {
        self.kind == "blob"
    }
}

/// HTTP client for GitHub raw files and the trees API.
#[derive(Debug, Clone)]
pub struct GithubClient {
    client: Client,
    raw_base_url: String,
    api_base_url: String,
}

impl GithubClient {
    pub fn new(raw_base_url: impl Into<String>, api_base_url: impl Into<String>) -> Result<Self> {
        let client = Client::builder()
            .user_agent(USER_AGENT)
            .connect_timeout(Duration::from_secs(30))
            .build()?;

        Ok(Self {
            client,
            raw_base_url: raw_base_url.into().trim_end_matches('/').to_string(),
            api_base_url: api_base_url.into().trim_end_matches('/').to_string(),
        })
    }

    /// URL of a raw file. `#` occurs in some file names and is percent-encoded.
    pub fn raw_url(&self, repository: &str, branch: &str, path: &str) -> String {
        format!(
            "{}/{}/{}/{}",
            self.raw_base_url,
            repository,
            branch,
            path.replace('#', "%23")
        )
    }

    /// Download a raw file to `destination`, replacing any existing file.
    ///
    /// The body is streamed to `<destination>.part` and renamed on success,
    /// so a failed download never leaves a file at `destination`.
    pub async fn download(
        &self,
        repository: &str,
        branch: &str,
        path: &str,
        destination: &Path,
    ) -> Result<u64> {
        let url = self.raw_url(repository, branch, path);
        debug!("Downloading \"{}\" from \"{}/{}\"", path, repository, branch);

        if tokio::fs::try_exists(destination).await? {
            tokio::fs::remove_file(destination).await?;
        }
        if let Some(parent) = destination.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let mut partial = destination.as_os_str().to_owned();
        partial.push(".part");
        let partial = std::path::PathBuf::from(partial);

        let written = match self.stream_to_file(&url, &partial).await {
            Ok(written) => written,
            Err(e) => {
                let _ = tokio::fs::remove_file(&partial).await;
                return Err(e);
            }
        };
        tokio::fs::rename(&partial, destination).await?;

        debug!("Downloaded \"{}\" to \"{}\" ({} bytes)", path, destination.display(), written);
        Ok(written)
    }

    async fn stream_to_file(&self, url: &str, path: &Path) -> Result<u64> {
        let response = self.client.get(url).send().await?.error_for_status()?;

        let mut file = tokio::fs::File::create(path).await?;
        let mut stream = response.bytes_stream();
        let mut written = 0u64;
        while let Some(chunk) = stream.next().await {
            let chunk = chunk?;
            file.write_all(&chunk).await?;
            written += chunk.len() as u64;
        }
        file.flush().await?;
        Ok(written)
    }

    /// Recursive tree listing of a branch.
    pub async fn list_tree(&self, repository: &str, branch: &str) -> Result<RepoTree> {
        let url = format!(
            "{}/repos/{}/git/trees/{}?recursive=1",
            self.api_base_url, repository, branch
        );
        let response = self.client.get(&url).send().await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(MigrateError::connection(
                format!("GitHub API error ({}): {}", status, body),
                format!("listing {}/{}", repository, branch),
            ));
        }

        Ok(response.json().await?)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use tokio::io::AsyncReadExt;
    use tokio::net::TcpListener;

    /// Serve canned responses on a local port: each connection gets the body
    /// registered for its request path, or a 404. Returns the base URL.
    pub(crate) async fn serve(routes: Vec<(String, String)>) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        tokio::spawn(async move {
            loop {
                let Ok((mut socket, _)) = listener.accept().await else {
                    return;
                };
                let routes = routes.clone();
                tokio::spawn(async move {
                    let mut buf = vec![0u8; 8192];
                    let n = socket.read(&mut buf).await.unwrap_or(0);
                    let request = String::from_utf8_lossy(&buf[..n]).to_string();
                    let path = request.split_whitespace().nth(1).unwrap_or("/").to_string();
                    let has_agent = request.to_lowercase().contains("user-agent: mdb-reload/");

                    let response = match routes.iter().find(|(p, _)| *p == path) {
                        Some((_, body)) if has_agent => format!(
                            "HTTP/1.1 200 OK\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{}",
                            body.len(),
                            body
                        ),
                        Some(_) => "HTTP/1.1 403 Forbidden\r\ncontent-length: 0\r\nconnection: close\r\n\r\n".to_string(),
                        None => "HTTP/1.1 404 Not Found\r\ncontent-length: 0\r\nconnection: close\r\n\r\n".to_string(),
                    };
                    let _ = socket.write_all(response.as_bytes()).await;
                    let _ = socket.shutdown().await;
                });
            }
        });

        format!("http://{}", addr)
    }

    #[test]
    fn test_raw_url_encodes_hash() {
        let client = GithubClient::new("https://raw.githubusercontent.com/", "https://api.github.com")
            .unwrap();
        assert_eq!(
            client.raw_url("owner/repo", "main", "translations/story/#1.json"),
            "https://raw.githubusercontent.com/owner/repo/main/translations/story/%231.json"
        );
    }

    #[test]
    fn test_tree_deserialization() {
        let json = r#"{
            "sha": "abc",
            "url": "https://api.github.com/...",
            "tree": [
                {"path": "translations", "mode": "040000", "type": "tree", "sha": "1"},
                {"path": "translations/mdb/char-name.json", "mode": "100644", "type": "blob", "sha": "2", "size": 12}
            ],
            "truncated": false
        }"#;
        let tree: RepoTree = serde_json::from_str(json).unwrap();
        assert_eq!(tree.tree.len(), 2);
        assert!(!tree.tree[0].is_file());
        assert!(tree.tree[1].is_file());
        assert_eq!(tree.tree[1].size, Some(12));
    }

    #[tokio::test]
    async fn test_download_writes_file() {
        let base = serve(vec![(
            "/owner/repo/main/master/master.mdb".to_string(),
            "SQLite format 3".to_string(),
        )])
        .await;
        let client = GithubClient::new(&base, &base).unwrap();
        let dir = tempfile::TempDir::new().unwrap();
        let dest = dir.path().join("master.mdb");

        let written = client
            .download("owner/repo", "main", "master/master.mdb", &dest)
            .await
            .unwrap();
        assert_eq!(written, 15);
        assert_eq!(std::fs::read_to_string(&dest).unwrap(), "SQLite format 3");
    }

    #[tokio::test]
    async fn test_failed_download_leaves_no_file() {
        let base = serve(vec![]).await;
        let client = GithubClient::new(&base, &base).unwrap();
        let dir = tempfile::TempDir::new().unwrap();
        let dest = dir.path().join("meta");
        std::fs::write(&dest, "stale").unwrap();

        let result = client.download("owner/repo", "main", "meta", &dest).await;
        assert!(result.is_err());
        assert!(!dest.exists());
        assert!(!dir.path().join("meta.part").exists());
    }

    #[tokio::test]
    async fn test_list_tree() {
        let base = serve(vec![(
            "/repos/noccu/umamusu-translate/git/trees/master?recursive=1".to_string(),
            r#"{"sha":"s","tree":[{"path":"translations/localify/ui.json","type":"blob"}]}"#
                .to_string(),
        )])
        .await;
        let client = GithubClient::new(&base, &base).unwrap();
        let tree = client.list_tree("noccu/umamusu-translate", "master").await.unwrap();
        assert_eq!(tree.tree[0].path, "translations/localify/ui.json");
    }
}
