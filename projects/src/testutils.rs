//! In-memory stand-ins for the project source and the content backend.
use crate::contentful::backend::{BackendError, ContentBackend, Entry, EntryQuery, LOCALE};
use crate::source::{SourceClient, SourceError};
use crate::types::{Project, ProjectDocumentation, ProjectStatus, ProjectSupport, ReleaseStatus};
use async_trait::async_trait;
use chrono::NaiveDate;
use serde_json::Value;
use std::sync::Mutex;

struct TestSourceState {
    slugs: Vec<String>,
    support_policy: String,
    fail_listing: bool,
    fail_supports: Option<String>,
    hang_listing: bool,
}

pub struct TestSource {
    state: Mutex<TestSourceState>,
}

impl TestSource {
    pub fn with_projects(slugs: &[&str]) -> Self {
        TestSource {
            state: Mutex::new(TestSourceState {
                slugs: slugs.iter().map(|s| s.to_string()).collect(),
                support_policy: "SPRING_BOOT".into(),
                fail_listing: false,
                fail_supports: None,
                hang_listing: false,
            }),
        }
    }

    pub fn set_projects(&self, slugs: &[&str]) {
        self.state.lock().unwrap().slugs = slugs.iter().map(|s| s.to_string()).collect();
    }

    pub fn set_support_policy(&self, policy: &str) {
        self.state.lock().unwrap().support_policy = policy.into();
    }

    pub fn fail_listing(&self) {
        self.state.lock().unwrap().fail_listing = true;
    }

    pub fn fail_supports_for(&self, slug: &str) {
        self.state.lock().unwrap().fail_supports = Some(slug.into());
    }

    /// Makes `list_projects` wait forever.
    pub fn hang_listing(&self) {
        self.state.lock().unwrap().hang_listing = true;
    }
}

#[async_trait]
impl SourceClient for TestSource {
    async fn list_projects(&self) -> Result<Vec<Project>, SourceError> {
        let (hang, fail, slugs) = {
            let state = self.state.lock().unwrap();
            (state.hang_listing, state.fail_listing, state.slugs.clone())
        };

        if hang {
            std::future::pending::<()>().await;
        }
        if fail {
            return Err(SourceError::NotFound("project".into()));
        }

        Ok(slugs
            .into_iter()
            .map(|slug| {
                let name = slug.to_uppercase();
                Project::new(slug, name, ProjectStatus::Active)
            })
            .collect())
    }

    async fn get_documentations(
        &self,
        slug: &str,
    ) -> Result<Vec<ProjectDocumentation>, SourceError> {
        let mut release = ProjectDocumentation::new(
            format!("{slug}-1.0.0"),
            ReleaseStatus::GeneralAvailability,
        );
        release.current = true;
        Ok(vec![release])
    }

    async fn get_supports(&self, slug: &str) -> Result<Vec<ProjectSupport>, SourceError> {
        if self.state.lock().unwrap().fail_supports.as_deref() == Some(slug) {
            return Err(SourceError::NotFound(format!("project/{slug}/support.json")));
        }

        Ok(vec![ProjectSupport {
            branch: "1.0.x".into(),
            initial_date: NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
            oss_policy_end: NaiveDate::from_ymd_opt(2025, 1, 1),
            commercial_policy_end: None,
        }])
    }

    async fn get_support_policy(&self, _slug: &str) -> Result<String, SourceError> {
        Ok(self.state.lock().unwrap().support_policy.clone())
    }
}

struct StoredEntry {
    current: Entry,
    published: Option<Entry>,
}

#[derive(Default)]
struct TestBackendState {
    entries: Vec<StoredEntry>,
    // (operation, error); an operation of None fails whichever call comes next
    failures: Vec<(Option<&'static str>, BackendError)>,
    calls: Vec<&'static str>,
}

impl TestBackendState {
    fn begin(&mut self, operation: &'static str) -> Result<(), BackendError> {
        self.calls.push(operation);
        let position = self
            .failures
            .iter()
            .position(|(op, _)| op.is_none_or(|op| op == operation));
        match position {
            Some(i) => Err(self.failures.remove(i).1),
            None => Ok(()),
        }
    }

    fn find(&mut self, id: &str) -> Result<&mut StoredEntry, BackendError> {
        self.entries
            .iter_mut()
            .find(|stored| stored.current.sys.id == id)
            .ok_or_else(|| BackendError::new(Some(404), format!("no entry {id}")))
    }

    fn find_slug(&self, slug: &str) -> Option<&StoredEntry> {
        let slug = Value::String(slug.into());
        self.entries
            .iter()
            .find(|stored| stored.current.field("slug", LOCALE) == Some(&slug))
    }
}

#[derive(Default)]
pub struct TestBackend {
    state: Mutex<TestBackendState>,
}

impl TestBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_project(slug: &str, releases: Vec<ProjectDocumentation>) -> Self {
        let backend = Self::new();
        let mut entry = Entry::new(format!("{slug}-entry"), 1);
        entry.set_field(
            "documentation",
            LOCALE,
            serde_json::to_value(releases).unwrap(),
        );
        backend.insert_entry(entry, slug);
        backend
    }

    pub fn insert_entry(&self, mut entry: Entry, slug: &str) {
        entry.set_field("slug", LOCALE, Value::String(slug.into()));
        self.state.lock().unwrap().entries.push(StoredEntry {
            current: entry,
            published: None,
        });
    }

    pub fn fail_next(&self, error: BackendError) {
        self.state.lock().unwrap().failures.push((None, error));
    }

    pub fn fail_call(&self, operation: &'static str, error: BackendError) {
        self.state
            .lock()
            .unwrap()
            .failures
            .push((Some(operation), error));
    }

    pub fn calls(&self) -> Vec<&'static str> {
        self.state.lock().unwrap().calls.clone()
    }

    pub fn stored_releases(&self, slug: &str) -> Vec<ProjectDocumentation> {
        let state = self.state.lock().unwrap();
        let stored = state.find_slug(slug).unwrap();
        releases_of(&stored.current)
    }

    pub fn published_releases(&self, slug: &str) -> Vec<ProjectDocumentation> {
        let state = self.state.lock().unwrap();
        let stored = state.find_slug(slug).unwrap();
        stored.published.as_ref().map(releases_of).unwrap_or_default()
    }
}

fn releases_of(entry: &Entry) -> Vec<ProjectDocumentation> {
    entry
        .field("documentation", LOCALE)
        .map(|value| serde_json::from_value(value.clone()).unwrap())
        .unwrap_or_default()
}

#[async_trait]
impl ContentBackend for TestBackend {
    async fn query_entries(&self, query: &EntryQuery) -> Result<Vec<Entry>, BackendError> {
        let mut state = self.state.lock().unwrap();
        state.begin("query_entries")?;

        if query.content_type != "project" {
            return Ok(Vec::new());
        }

        Ok(state
            .entries
            .iter()
            .filter(|stored| {
                query.fields.iter().all(|(name, value)| {
                    stored.current.field(name, LOCALE) == Some(&Value::String(value.clone()))
                })
            })
            .map(|stored| stored.current.clone())
            .collect())
    }

    async fn update_entry(&self, entry: &Entry) -> Result<Entry, BackendError> {
        let mut state = self.state.lock().unwrap();
        state.begin("update_entry")?;

        let stored = state.find(&entry.sys.id)?;
        if stored.current.sys.version != entry.sys.version {
            return Err(BackendError::new(Some(409), "version mismatch"));
        }

        let mut updated = entry.clone();
        updated.sys.version += 1;
        stored.current = updated.clone();
        Ok(updated)
    }

    async fn publish_entry(&self, entry: &Entry) -> Result<(), BackendError> {
        let mut state = self.state.lock().unwrap();
        state.begin("publish_entry")?;

        let stored = state.find(&entry.sys.id)?;
        if stored.current.sys.version != entry.sys.version {
            return Err(BackendError::new(Some(409), "version mismatch"));
        }

        stored.published = Some(entry.clone());
        Ok(())
    }
}
