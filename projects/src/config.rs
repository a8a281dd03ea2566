use serde::Deserialize;

#[derive(thiserror::Error, Debug, PartialEq)]
pub enum ValidationError {
    #[error("Port cannot be 0")]
    InvalidPort,
    #[error("GitHub repository must be in the form owner/name, got {0:?}")]
    InvalidRepository(String),
    #[error("Empty Contentful {0}")]
    EmptyContentfulField(&'static str),
}

#[derive(Clone, Deserialize, Debug, PartialEq)]
pub struct Listener {
    pub host: String,
    pub port: u16,
}

impl Listener {
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.port == 0 {
            return Err(ValidationError::InvalidPort);
        }
        Ok(())
    }
}

impl Default for Listener {
    fn default() -> Self {
        Listener {
            host: "127.0.0.1".into(),
            port: 3000,
        }
    }
}

fn default_admin_listener() -> Listener {
    Listener {
        host: "127.0.0.1".into(),
        port: 3001,
    }
}

/// Content repository the project registry is read from.
#[derive(Clone, Deserialize, Debug, PartialEq)]
pub struct GithubConfig {
    #[serde(default = "default_github_api_url")]
    pub api_url: String,
    /// `owner/name` of the content repository
    pub repository: String,
    #[serde(default = "default_branch")]
    pub branch: String,
    pub token: Option<String>,
    /// Support policy used when a project does not declare one
    #[serde(default = "default_support_policy")]
    pub default_support_policy: String,
}

fn default_github_api_url() -> String {
    "https://api.github.com".into()
}

fn default_branch() -> String {
    "main".into()
}

fn default_support_policy() -> String {
    "SPRING_BOOT".into()
}

/// Content management backend that documentation writes go to.
#[derive(Clone, Deserialize, Debug, PartialEq)]
pub struct ContentfulConfig {
    #[serde(default = "default_contentful_api_url")]
    pub api_url: String,
    pub space_id: String,
    #[serde(default = "default_environment")]
    pub environment_id: String,
    pub access_token: String,
}

fn default_contentful_api_url() -> String {
    "https://api.contentful.com".into()
}

fn default_environment() -> String {
    "master".into()
}

#[derive(Clone, Deserialize, Debug, PartialEq)]
pub struct Config {
    #[serde(default)]
    pub listener: Listener,
    #[serde(default = "default_admin_listener")]
    pub admin_listener: Listener,
    pub github: GithubConfig,
    pub contentful: ContentfulConfig,
}

impl Config {
    pub fn validate(&self) -> Result<(), ValidationError> {
        self.listener.validate()?;
        self.admin_listener.validate()?;

        let repository = &self.github.repository;
        match repository.split_once('/') {
            Some((owner, name)) if !owner.is_empty() && !name.is_empty() && !name.contains('/') => {}
            _ => return Err(ValidationError::InvalidRepository(repository.clone())),
        }

        if self.contentful.space_id.is_empty() {
            return Err(ValidationError::EmptyContentfulField("space_id"));
        }
        if self.contentful.access_token.is_empty() {
            return Err(ValidationError::EmptyContentfulField("access_token"));
        }

        Ok(())
    }
}
