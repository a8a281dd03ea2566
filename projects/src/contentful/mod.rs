//! Writes to the project documentation held in the content backend.
pub mod backend;
pub mod retry;

use crate::releases::{add_release, remove_release};
use crate::types::ProjectDocumentation;
use backend::{ContentBackend, Entry, EntryQuery, LOCALE};
use retry::{RetryError, RetryingClient};
use std::sync::Arc;
use tokio::sync::Notify;

const PROJECT_CONTENT_TYPE: &str = "project";
const DOCUMENTATION_FIELD: &str = "documentation";

#[derive(thiserror::Error, Debug)]
pub enum DocumentationError {
    #[error("no project entry found with slug {0:?}")]
    ProjectNotFound(String),
    #[error("{count} project entries found with slug {slug:?}, expected one")]
    AmbiguousProject { slug: String, count: usize },
    #[error("project {slug:?} has no documentation for version {version:?}")]
    VersionNotFound { slug: String, version: String },
    #[error("invalid documentation in project entry {slug:?}: {source}")]
    InvalidEntry {
        slug: String,
        source: serde_json::Error,
    },
    #[error(transparent)]
    Backend(#[from] RetryError),
}

/// Adds and removes documented releases of a project.
///
/// Each change reads the project's entry, edits its release list, recomputes
/// which release is current, then updates and publishes the entry. The two
/// writes are not transactional: if publishing fails the updated entry stays
/// as an unpublished draft.
pub struct DocumentationOperations {
    client: RetryingClient,
}

impl DocumentationOperations {
    pub fn new(backend: Arc<dyn ContentBackend>) -> Self {
        DocumentationOperations {
            client: RetryingClient::new(backend),
        }
    }

    /// Wakes every write that is waiting out a rate limit so it retries now.
    pub fn interrupt_handle(&self) -> Arc<Notify> {
        self.client.interrupt_handle()
    }

    pub async fn add_documentation(
        &self,
        slug: &str,
        documentation: ProjectDocumentation,
    ) -> Result<(), DocumentationError> {
        let mut entry = self.get_project_entry(slug).await?;
        let releases = read_releases(slug, &entry)?;

        let version = documentation.version.clone();
        let updated = add_release(&releases, documentation);
        write_releases(slug, &mut entry, &updated)?;

        self.update_and_publish(&entry).await?;
        tracing::info!(slug, version, "Added project documentation");
        Ok(())
    }

    pub async fn delete_documentation(
        &self,
        slug: &str,
        version: &str,
    ) -> Result<(), DocumentationError> {
        let mut entry = self.get_project_entry(slug).await?;
        let releases = read_releases(slug, &entry)?;

        let updated =
            remove_release(&releases, version).ok_or_else(|| DocumentationError::VersionNotFound {
                slug: slug.to_string(),
                version: version.to_string(),
            })?;
        write_releases(slug, &mut entry, &updated)?;

        self.update_and_publish(&entry).await?;
        tracing::info!(slug, version, "Deleted project documentation");
        Ok(())
    }

    async fn get_project_entry(&self, slug: &str) -> Result<Entry, DocumentationError> {
        let query = EntryQuery::new(PROJECT_CONTENT_TYPE).field("slug", slug);
        let mut entries = self.client.query_entries(&query).await?;

        match entries.len() {
            0 => Err(DocumentationError::ProjectNotFound(slug.to_string())),
            1 => Ok(entries.remove(0)),
            count => Err(DocumentationError::AmbiguousProject {
                slug: slug.to_string(),
                count,
            }),
        }
    }

    async fn update_and_publish(&self, entry: &Entry) -> Result<(), DocumentationError> {
        let updated = self.client.update_entry(entry).await?;
        self.client.publish_entry(&updated).await?;
        Ok(())
    }
}

fn read_releases(slug: &str, entry: &Entry) -> Result<Vec<ProjectDocumentation>, DocumentationError> {
    match entry.field(DOCUMENTATION_FIELD, LOCALE) {
        Some(value) => serde_json::from_value(value.clone()).map_err(|source| {
            DocumentationError::InvalidEntry {
                slug: slug.to_string(),
                source,
            }
        }),
        None => Ok(Vec::new()),
    }
}

fn write_releases(
    slug: &str,
    entry: &mut Entry,
    releases: &[ProjectDocumentation],
) -> Result<(), DocumentationError> {
    let value = serde_json::to_value(releases).map_err(|source| DocumentationError::InvalidEntry {
        slug: slug.to_string(),
        source,
    })?;
    entry.set_field(DOCUMENTATION_FIELD, LOCALE, value);
    Ok(())
}
