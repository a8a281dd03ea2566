//! Source of truth for project metadata.
//!
//! Projects live as files in a GitHub content repository:
//!
//! ```text
//! project/
//!   {slug}/
//!     index.md            YAML front matter: title, github, status, supportPolicy
//!     documentation.json  releases
//!     support.json        support windows (optional)
//! ```
use crate::config::GithubConfig;
use crate::types::{Project, ProjectDocumentation, ProjectStatus, ProjectSupport};
use async_trait::async_trait;
use reqwest::header::{ACCEPT, AUTHORIZATION};
use reqwest::{StatusCode, Url};
use parking_lot::Mutex;
use serde::Deserialize;
use std::collections::HashMap;
use tokio::time::{Duration, sleep};

const BASE_DELAY: u64 = 500;
const MAX_RETRIES: u32 = 3;
const RAW_CONTENT: &str = "application/vnd.github.raw";
const JSON_CONTENT: &str = "application/vnd.github+json";

#[derive(thiserror::Error, Debug)]
pub enum SourceError {
    #[error("request failed: {0}")]
    ReqwestError(#[from] reqwest::Error),
    #[error("invalid URL: {0}")]
    InvalidUrl(String),
    #[error("no content found at {0}")]
    NotFound(String),
    #[error("unexpected status {status} for {path}")]
    UnexpectedStatus { status: StatusCode, path: String },
    #[error("source unavailable after retries: {0}")]
    RetriesExceeded(String),
    #[error("invalid JSON in {path}: {source}")]
    InvalidJson {
        path: String,
        source: serde_json::Error,
    },
    #[error("invalid front matter in {path}: {reason}")]
    InvalidFrontMatter { path: String, reason: String },
}

/// Read-only access to the project registry.
#[async_trait]
pub trait SourceClient: Send + Sync {
    async fn list_projects(&self) -> Result<Vec<Project>, SourceError>;
    async fn get_documentations(&self, slug: &str)
    -> Result<Vec<ProjectDocumentation>, SourceError>;
    async fn get_supports(&self, slug: &str) -> Result<Vec<ProjectSupport>, SourceError>;
    async fn get_support_policy(&self, slug: &str) -> Result<String, SourceError>;
}

#[derive(Deserialize)]
struct DirectoryEntry {
    name: String,
    #[serde(rename = "type")]
    kind: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct FrontMatter {
    title: String,
    github: Option<String>,
    #[serde(default = "default_status")]
    status: ProjectStatus,
    support_policy: Option<String>,
}

fn default_status() -> ProjectStatus {
    ProjectStatus::Active
}

pub struct GithubSource {
    client: reqwest::Client,
    contents_url: String,
    branch: String,
    token: Option<String>,
    default_support_policy: String,
    /// Support policies read from each project's front matter by the last
    /// `list_projects`, keyed by slug. Taken on first use.
    listed_policies: Mutex<HashMap<String, Option<String>>>,
}

impl GithubSource {
    pub fn new(config: &GithubConfig) -> Result<Self, SourceError> {
        let contents_url = format!(
            "{}/repos/{}/contents/",
            config.api_url.trim_end_matches('/'),
            config.repository.trim_matches('/'),
        );

        let client = reqwest::Client::builder()
            .user_agent(concat!("project-api/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(GithubSource {
            client,
            contents_url,
            branch: config.branch.clone(),
            token: config.token.clone(),
            default_support_policy: config.default_support_policy.clone(),
            listed_policies: Mutex::new(HashMap::new()),
        })
    }

    /// Fetches a path from the contents API. Returns `None` if the path does
    /// not exist. Retries transient failures with exponential backoff.
    async fn fetch(&self, path: &str, accept: &str) -> Result<Option<String>, SourceError> {
        const RETRIABLE_STATUS_CODES: &[StatusCode] = &[
            StatusCode::TOO_MANY_REQUESTS,     // 429
            StatusCode::INTERNAL_SERVER_ERROR, // 500
            StatusCode::BAD_GATEWAY,           // 502
            StatusCode::SERVICE_UNAVAILABLE,   // 503
            StatusCode::GATEWAY_TIMEOUT,       // 504
        ];

        let mut url = Url::parse(&self.contents_url)
            .and_then(|base| base.join(path))
            .map_err(|e| SourceError::InvalidUrl(e.to_string()))?;
        url.query_pairs_mut().append_pair("ref", &self.branch);

        let mut retries = 0;

        loop {
            let mut request = self.client.get(url.clone()).header(ACCEPT, accept);
            if let Some(token) = &self.token {
                request = request.header(AUTHORIZATION, format!("Bearer {token}"));
            }

            let response = request.send().await?;
            let status = response.status();

            if status.is_success() {
                return Ok(Some(response.text().await?));
            }

            if status == StatusCode::NOT_FOUND {
                return Ok(None);
            }

            if RETRIABLE_STATUS_CODES.contains(&status) {
                if retries < MAX_RETRIES {
                    // Backoff between retries
                    let retry_millis = BASE_DELAY * 2_u64.pow(retries);
                    tracing::debug!(path, %status, retry_millis, "Retrying source request");
                    sleep(Duration::from_millis(retry_millis)).await;
                    retries += 1;
                    continue;
                }
                return Err(SourceError::RetriesExceeded(path.to_string()));
            }

            return Err(SourceError::UnexpectedStatus {
                status,
                path: path.to_string(),
            });
        }
    }

    async fn fetch_json<T>(&self, path: &str) -> Result<Option<T>, SourceError>
    where
        T: for<'de> Deserialize<'de>,
    {
        match self.fetch(path, RAW_CONTENT).await? {
            Some(body) => serde_json::from_str(&body)
                .map(Some)
                .map_err(|source| SourceError::InvalidJson {
                    path: path.to_string(),
                    source,
                }),
            None => Ok(None),
        }
    }

    async fn fetch_front_matter(&self, slug: &str) -> Result<FrontMatter, SourceError> {
        let path = format!("project/{slug}/index.md");
        let body = self
            .fetch(&path, RAW_CONTENT)
            .await?
            .ok_or_else(|| SourceError::NotFound(path.clone()))?;
        parse_front_matter(&path, &body)
    }
}

fn parse_front_matter(path: &str, body: &str) -> Result<FrontMatter, SourceError> {
    let invalid = |reason: String| SourceError::InvalidFrontMatter {
        path: path.to_string(),
        reason,
    };

    let rest = body
        .trim_start()
        .strip_prefix("---")
        .ok_or_else(|| invalid("missing opening delimiter".into()))?;
    let end = rest
        .find("\n---")
        .ok_or_else(|| invalid("missing closing delimiter".into()))?;

    serde_yaml::from_str(&rest[..end]).map_err(|e| invalid(e.to_string()))
}

#[async_trait]
impl SourceClient for GithubSource {
    async fn list_projects(&self) -> Result<Vec<Project>, SourceError> {
        let listing = self
            .fetch("project", JSON_CONTENT)
            .await?
            .ok_or_else(|| SourceError::NotFound("project".into()))?;
        let entries: Vec<DirectoryEntry> =
            serde_json::from_str(&listing).map_err(|source| SourceError::InvalidJson {
                path: "project".into(),
                source,
            })?;

        let mut projects = Vec::new();
        let mut policies = HashMap::new();
        for entry in entries.into_iter().filter(|e| e.kind == "dir") {
            let front_matter = self.fetch_front_matter(&entry.name).await?;
            policies.insert(entry.name.clone(), front_matter.support_policy);
            projects.push(Project {
                slug: entry.name,
                name: front_matter.title,
                repository_url: front_matter.github,
                status: front_matter.status,
            });
        }

        *self.listed_policies.lock() = policies;

        tracing::debug!("Fetched {} projects from source", projects.len());
        Ok(projects)
    }

    async fn get_documentations(
        &self,
        slug: &str,
    ) -> Result<Vec<ProjectDocumentation>, SourceError> {
        let path = format!("project/{slug}/documentation.json");
        self.fetch_json(&path)
            .await?
            .ok_or_else(|| SourceError::NotFound(path.clone()))
    }

    async fn get_supports(&self, slug: &str) -> Result<Vec<ProjectSupport>, SourceError> {
        // Projects without a support file have no published support windows
        let path = format!("project/{slug}/support.json");
        Ok(self.fetch_json(&path).await?.unwrap_or_default())
    }

    async fn get_support_policy(&self, slug: &str) -> Result<String, SourceError> {
        // Reuse the front matter of the listing that started this load
        let listed = self.listed_policies.lock().remove(slug);
        let support_policy = match listed {
            Some(policy) => policy,
            None => self.fetch_front_matter(slug).await?.support_policy,
        };
        Ok(support_policy.unwrap_or_else(|| self.default_support_policy.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ReleaseStatus;
    use wiremock::matchers::{header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const CONTENTS: &str = "/repos/acme/content/contents";

    fn github_config(server: &MockServer) -> GithubConfig {
        GithubConfig {
            api_url: server.uri(),
            repository: "acme/content".into(),
            branch: "main".into(),
            token: Some("secret".into()),
            default_support_policy: "SPRING_BOOT".into(),
        }
    }

    async fn mount_raw(server: &MockServer, file: &str, status: u16, body: &str) {
        Mock::given(method("GET"))
            .and(path(format!("{CONTENTS}/{file}")))
            .and(query_param("ref", "main"))
            .and(header("accept", RAW_CONTENT))
            .respond_with(ResponseTemplate::new(status).set_body_string(body))
            .mount(server)
            .await;
    }

    #[test]
    fn test_parse_front_matter() {
        let body = "---\ntitle: Widgets\ngithub: https://github.com/acme/widgets\nstatus: INCUBATING\n---\nSome markdown\n";
        let front_matter = parse_front_matter("index.md", body).unwrap();
        assert_eq!(front_matter.title, "Widgets");
        assert_eq!(front_matter.status, ProjectStatus::Incubating);
        assert_eq!(front_matter.support_policy, None);

        assert!(matches!(
            parse_front_matter("index.md", "no front matter"),
            Err(SourceError::InvalidFrontMatter { .. })
        ));
    }

    #[tokio::test]
    async fn test_list_projects() {
        let server = MockServer::start().await;

        let listing = r#"[
            {"name": "widgets", "type": "dir"},
            {"name": "README.md", "type": "file"},
            {"name": "gadgets", "type": "dir"}
        ]"#;
        Mock::given(method("GET"))
            .and(path(format!("{CONTENTS}/project")))
            .and(header("authorization", "Bearer secret"))
            .respond_with(ResponseTemplate::new(200).set_body_string(listing))
            .mount(&server)
            .await;
        mount_raw(&server, "project/widgets/index.md", 200, "---\ntitle: Widgets\n---\n").await;
        mount_raw(
            &server,
            "project/gadgets/index.md",
            200,
            "---\ntitle: Gadgets\nstatus: END_OF_LIFE\n---\n",
        )
        .await;

        let source = GithubSource::new(&github_config(&server)).unwrap();
        let projects = source.list_projects().await.unwrap();

        let slugs: Vec<&str> = projects.iter().map(|p| p.slug.as_str()).collect();
        assert_eq!(slugs, vec!["widgets", "gadgets"]);
        assert_eq!(projects[0].status, ProjectStatus::Active);
        assert_eq!(projects[1].status, ProjectStatus::EndOfLife);
    }

    #[tokio::test]
    async fn test_documentation_and_support() {
        let server = MockServer::start().await;

        mount_raw(
            &server,
            "project/widgets/documentation.json",
            200,
            r#"[{"version": "1.0.0", "status": "GENERAL_AVAILABILITY", "current": true}]"#,
        )
        .await;
        mount_raw(&server, "project/widgets/support.json", 404, "").await;
        mount_raw(
            &server,
            "project/widgets/index.md",
            200,
            "---\ntitle: Widgets\nsupportPolicy: UPSTREAM\n---\n",
        )
        .await;
        mount_raw(&server, "project/gadgets/index.md", 200, "---\ntitle: Gadgets\n---\n").await;

        let source = GithubSource::new(&github_config(&server)).unwrap();

        let docs = source.get_documentations("widgets").await.unwrap();
        assert_eq!(docs.len(), 1);
        assert_eq!(docs[0].status, ReleaseStatus::GeneralAvailability);

        // Missing support file means no support windows
        assert!(source.get_supports("widgets").await.unwrap().is_empty());

        assert_eq!(source.get_support_policy("widgets").await.unwrap(), "UPSTREAM");
        assert_eq!(
            source.get_support_policy("gadgets").await.unwrap(),
            "SPRING_BOOT"
        );
    }

    #[tokio::test]
    async fn test_missing_documentation_is_not_found() {
        let server = MockServer::start().await;
        mount_raw(&server, "project/widgets/documentation.json", 404, "").await;

        let source = GithubSource::new(&github_config(&server)).unwrap();
        assert!(matches!(
            source.get_documentations("widgets").await,
            Err(SourceError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_non_retriable_status() {
        let server = MockServer::start().await;
        mount_raw(&server, "project/widgets/documentation.json", 403, "").await;

        let source = GithubSource::new(&github_config(&server)).unwrap();
        let result = source.get_documentations("widgets").await;
        assert!(matches!(
            result,
            Err(SourceError::UnexpectedStatus { status, .. }) if status == StatusCode::FORBIDDEN
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_transient_failure_is_retried() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path(format!("{CONTENTS}/project/widgets/documentation.json")))
            .respond_with(ResponseTemplate::new(503))
            .up_to_n_times(1)
            .expect(1)
            .mount(&server)
            .await;
        mount_raw(
            &server,
            "project/widgets/documentation.json",
            200,
            r#"[{"version": "1.0.0", "status": "SNAPSHOT"}]"#,
        )
        .await;

        let source = GithubSource::new(&github_config(&server)).unwrap();
        let docs = source.get_documentations("widgets").await.unwrap();
        assert_eq!(docs.len(), 1);
        assert_eq!(docs[0].status, ReleaseStatus::Snapshot);
    }

    #[tokio::test(start_paused = true)]
    async fn test_retries_exceeded() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path(format!("{CONTENTS}/project/widgets/documentation.json")))
            .respond_with(ResponseTemplate::new(503))
            .expect(u64::from(MAX_RETRIES) + 1)
            .mount(&server)
            .await;

        let source = GithubSource::new(&github_config(&server)).unwrap();
        let result = source.get_documentations("widgets").await;
        assert!(matches!(
            result,
            Err(SourceError::RetriesExceeded(path)) if path == "project/widgets/documentation.json"
        ));
    }

    #[tokio::test]
    async fn test_front_matter_fetched_once_per_load() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path(format!("{CONTENTS}/project")))
            .respond_with(
                ResponseTemplate::new(200).set_body_string(r#"[{"name": "widgets", "type": "dir"}]"#),
            )
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path(format!("{CONTENTS}/project/widgets/index.md")))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_string("---\ntitle: Widgets\nsupportPolicy: UPSTREAM\n---\n"),
            )
            .expect(1)
            .mount(&server)
            .await;

        let source = GithubSource::new(&github_config(&server)).unwrap();
        let projects = source.list_projects().await.unwrap();
        assert_eq!(projects[0].name, "Widgets");
        assert_eq!(source.get_support_policy("widgets").await.unwrap(), "UPSTREAM");
    }
}
