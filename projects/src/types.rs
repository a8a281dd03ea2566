use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

pub type Slug = String;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ProjectStatus {
    Active,
    Community,
    Incubating,
    EndOfLife,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Project {
    pub slug: Slug,
    pub name: String,
    pub repository_url: Option<String>,
    pub status: ProjectStatus,
}

impl Project {
    pub fn new<S, N>(slug: S, name: N, status: ProjectStatus) -> Self
    where
        S: Into<String>,
        N: Into<String>,
    {
        Project {
            slug: slug.into(),
            name: name.into(),
            repository_url: None,
            status,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ReleaseStatus {
    Prerelease,
    GeneralAvailability,
    Snapshot,
}

/// A documented release of a project.
///
/// `current` is derived from the whole release list of the project and is
/// only ever set by [`crate::releases::recompute_current`].
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectDocumentation {
    pub version: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api: Option<String>,
    #[serde(rename = "ref", default, skip_serializing_if = "Option::is_none")]
    pub reference: Option<String>,
    pub status: ReleaseStatus,
    #[serde(default)]
    pub current: bool,
}

impl ProjectDocumentation {
    pub fn new<V: Into<String>>(version: V, status: ReleaseStatus) -> Self {
        ProjectDocumentation {
            version: version.into(),
            api: None,
            reference: None,
            status,
            current: false,
        }
    }
}

/// Support window of one release line (generation) of a project.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectSupport {
    pub branch: String,
    pub initial_date: NaiveDate,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub oss_policy_end: Option<NaiveDate>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub commercial_policy_end: Option<NaiveDate>,
}
