use crate::metrics_defs::{SNAPSHOT_LOAD_DURATION, SNAPSHOT_LOAD_FAILURE};
use crate::source::{SourceClient, SourceError};
use crate::types::{Project, ProjectDocumentation, ProjectSupport, Slug};
use indexmap::IndexMap;
use shared::{counter, histogram};
use std::time::Instant;

#[derive(thiserror::Error, Debug)]
pub enum LoadError {
    #[error("could not list projects: {0}")]
    ListProjects(#[source] SourceError),
    #[error("could not load project {slug}: {source}")]
    Project { slug: Slug, source: SourceError },
}

/// One complete, immutable view of every project and its derived data.
///
/// All four mappings are built together from a single enumeration of
/// projects, so they always hold exactly the same set of slugs, in the
/// order the source listed them.
#[derive(Debug, Default, PartialEq)]
pub struct Snapshot {
    projects: IndexMap<Slug, Project>,
    documentation: IndexMap<Slug, Vec<ProjectDocumentation>>,
    support: IndexMap<Slug, Vec<ProjectSupport>>,
    support_policy: IndexMap<Slug, String>,
}

impl Snapshot {
    /// Loads a full snapshot. Any failing fetch fails the whole load.
    pub async fn load(source: &dyn SourceClient) -> Result<Snapshot, LoadError> {
        let start = Instant::now();
        let result = Self::load_inner(source).await;

        match &result {
            Ok(snapshot) => {
                histogram!(SNAPSHOT_LOAD_DURATION).record(start.elapsed().as_secs_f64());
                tracing::info!(
                    projects = snapshot.len(),
                    elapsed_ms = start.elapsed().as_millis() as u64,
                    "Loaded project snapshot"
                );
            }
            Err(e) => {
                counter!(SNAPSHOT_LOAD_FAILURE).increment(1);
                tracing::error!(error = %e, "Failed to load project snapshot");
            }
        }

        result
    }

    async fn load_inner(source: &dyn SourceClient) -> Result<Snapshot, LoadError> {
        let listed = source
            .list_projects()
            .await
            .map_err(LoadError::ListProjects)?;

        let mut snapshot = Snapshot::default();

        for project in listed {
            let slug = project.slug.clone();
            let fetched = tokio::try_join!(
                source.get_documentations(&slug),
                source.get_supports(&slug),
                source.get_support_policy(&slug),
            );
            let (documentation, support, support_policy) =
                fetched.map_err(|source| LoadError::Project {
                    slug: slug.clone(),
                    source,
                })?;

            snapshot.projects.insert(slug.clone(), project);
            snapshot.documentation.insert(slug.clone(), documentation);
            snapshot.support.insert(slug.clone(), support);
            snapshot.support_policy.insert(slug, support_policy);
        }

        Ok(snapshot)
    }

    pub fn len(&self) -> usize {
        self.projects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.projects.is_empty()
    }

    pub fn projects(&self) -> impl Iterator<Item = &Project> {
        self.projects.values()
    }

    pub fn project(&self, slug: &str) -> Option<&Project> {
        self.projects.get(slug)
    }

    pub fn documentation(&self, slug: &str) -> Option<&[ProjectDocumentation]> {
        self.documentation.get(slug).map(Vec::as_slice)
    }

    pub fn support(&self, slug: &str) -> Option<&[ProjectSupport]> {
        self.support.get(slug).map(Vec::as_slice)
    }

    pub fn support_policy(&self, slug: &str) -> Option<&str> {
        self.support_policy.get(slug).map(String::as_str)
    }
}
