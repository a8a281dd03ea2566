use crate::metrics_defs::SNAPSHOT_PROJECTS;
use crate::snapshot::{LoadError, Snapshot};
use crate::source::SourceClient;
use crate::types::{Project, ProjectDocumentation, ProjectSupport};
use arc_swap::ArcSwap;
use shared::gauge;
use std::sync::Arc;

#[derive(thiserror::Error, Debug, PartialEq)]
pub enum RepositoryError {
    #[error("no project found with slug {0:?}")]
    ProjectNotFound(String),
}

struct ProjectRepositoryInner {
    source: Arc<dyn SourceClient>,
    snapshot: ArcSwap<Snapshot>,
}

/// Read-optimized cache of all project data.
///
/// Holds exactly one [`Snapshot`]. Reads load the current snapshot without
/// locking. [`ProjectRepository::refresh`] builds a replacement off to the
/// side and publishes it with a single atomic swap, so readers see either the
/// old or the new snapshot and never a mix of both.
///
/// Concurrent refreshes are not serialized here; hosts that trigger refresh
/// from several places must allow only one at a time.
#[derive(Clone)]
pub struct ProjectRepository {
    inner: Arc<ProjectRepositoryInner>,
}

impl ProjectRepository {
    /// Loads the first snapshot. The repository cannot exist without data,
    /// so a failed load fails construction.
    pub async fn initialize(source: Arc<dyn SourceClient>) -> Result<Self, LoadError> {
        let snapshot = Snapshot::load(source.as_ref()).await?;
        gauge!(SNAPSHOT_PROJECTS).set(snapshot.len() as f64);

        Ok(ProjectRepository {
            inner: Arc::new(ProjectRepositoryInner {
                source,
                snapshot: ArcSwap::from_pointee(snapshot),
            }),
        })
    }

    /// Replaces the held snapshot with a freshly loaded one. On failure, or
    /// if the returned future is dropped before completion, the previous
    /// snapshot stays in place.
    pub async fn refresh(&self) -> Result<(), LoadError> {
        let snapshot = Snapshot::load(self.inner.source.as_ref()).await?;
        gauge!(SNAPSHOT_PROJECTS).set(snapshot.len() as f64);
        self.inner.snapshot.store(Arc::new(snapshot));
        Ok(())
    }

    /// The current snapshot, for callers that need several reads to agree.
    pub fn snapshot(&self) -> Arc<Snapshot> {
        self.inner.snapshot.load_full()
    }

    /// Used by the readiness check. A repository only exists once its first
    /// snapshot has loaded.
    pub fn is_ready(&self) -> bool {
        true
    }

    pub fn get_projects(&self) -> Vec<Project> {
        self.inner.snapshot.load().projects().cloned().collect()
    }

    pub fn get_project(&self, slug: &str) -> Result<Project, RepositoryError> {
        self.inner
            .snapshot
            .load()
            .project(slug)
            .cloned()
            .ok_or_else(|| RepositoryError::ProjectNotFound(slug.to_string()))
    }

    pub fn get_project_documentations(
        &self,
        slug: &str,
    ) -> Result<Vec<ProjectDocumentation>, RepositoryError> {
        self.inner
            .snapshot
            .load()
            .documentation(slug)
            .map(<[_]>::to_vec)
            .ok_or_else(|| RepositoryError::ProjectNotFound(slug.to_string()))
    }

    pub fn get_project_supports(
        &self,
        slug: &str,
    ) -> Result<Vec<ProjectSupport>, RepositoryError> {
        self.inner
            .snapshot
            .load()
            .support(slug)
            .map(<[_]>::to_vec)
            .ok_or_else(|| RepositoryError::ProjectNotFound(slug.to_string()))
    }

    pub fn get_project_support_policy(&self, slug: &str) -> Result<String, RepositoryError> {
        self.inner
            .snapshot
            .load()
            .support_policy(slug)
            .map(str::to_string)
            .ok_or_else(|| RepositoryError::ProjectNotFound(slug.to_string()))
    }
}
