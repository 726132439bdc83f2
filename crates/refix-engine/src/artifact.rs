//! Engine distribution metadata and jar resolution.
//!
//! The pinned Scalafix version ships as a properties resource baked into the
//! crate. Resolvers turn the published coordinate into a concrete jar set on
//! the local filesystem, either from a pre-fetched directory or by pulling
//! the artifact from a Maven repository.

use std::collections::HashMap;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use async_trait::async_trait;
use thiserror::Error;
use tracing::{debug, info};

const PROPERTIES_RESOURCE: &str = include_str!("engine.properties");

const ARTIFACT_GROUP: &str = "ch.epfl.scala";
const ARTIFACT_NAME: &str = "scalafix-cli";

const DEFAULT_MAVEN_REPO: &str = "https://repo1.maven.org/maven2";

// ---------------------------------------------------------------------------
// Packaged properties
// ---------------------------------------------------------------------------

/// Version metadata baked into the crate at build time.
#[derive(Debug)]
pub struct EngineProperties {
    values: HashMap<String, String>,
}

impl EngineProperties {
    fn parse(raw: &str) -> Self {
        let mut values = HashMap::new();
        for line in raw.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            if let Some((key, value)) = line.split_once('=') {
                values.insert(key.trim().to_string(), value.trim().to_string());
            }
        }
        Self { values }
    }

    fn get(&self, key: &str) -> &str {
        self.values.get(key).map(String::as_str).unwrap_or("unknown")
    }

    /// Stable Scalafix release this build drives.
    pub fn scalafix_version(&self) -> &str {
        self.get("scalafixStableVersion")
    }

    /// Scala 3 LTS line the CLI artifact is published for.
    pub fn scala3_lts(&self) -> &str {
        self.get("scala3LTS")
    }

    /// Entry point class of the CLI jar.
    pub fn main_class(&self) -> &str {
        self.get("scalafixMainClass")
    }
}

static PROPERTIES: OnceLock<EngineProperties> = OnceLock::new();

/// Parsed packaged properties, loaded once per process.
pub fn engine_properties() -> &'static EngineProperties {
    PROPERTIES.get_or_init(|| EngineProperties::parse(PROPERTIES_RESOURCE))
}

/// Full Maven coordinate of the pinned CLI artifact, in the form
/// `ch.epfl.scala:scalafix-cli_<scala3LTS>:<scalafixStableVersion>`.
pub fn cli_coordinate() -> String {
    let props = engine_properties();
    format!(
        "{}:{}_{}:{}",
        ARTIFACT_GROUP,
        ARTIFACT_NAME,
        props.scala3_lts(),
        props.scalafix_version()
    )
}

// ---------------------------------------------------------------------------
// Distribution
// ---------------------------------------------------------------------------

/// A resolved engine distribution: the coordinate it was requested as plus
/// the jar set that realizes it on disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineDistribution {
    pub coordinate: String,
    pub jars: Vec<PathBuf>,
}

impl EngineDistribution {
    pub fn new(coordinate: impl Into<String>, jars: Vec<PathBuf>) -> Self {
        Self {
            coordinate: coordinate.into(),
            jars,
        }
    }
}

// ---------------------------------------------------------------------------
// Resolution errors
// ---------------------------------------------------------------------------

#[derive(Debug, Error)]
pub enum ResolveError {
    #[error("invalid artifact coordinate '{coordinate}' (expected group:name:version)")]
    InvalidCoordinate { coordinate: String },

    #[error("artifact '{coordinate}' not found in repository (status {status})")]
    NotFound { coordinate: String, status: u16 },

    #[error("no jar files found in '{dir}'")]
    NoJars { dir: String },

    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

pub type ResolveResult<T> = std::result::Result<T, ResolveError>;

fn split_coordinate(coordinate: &str) -> ResolveResult<(&str, &str, &str)> {
    let mut parts = coordinate.split(':');
    match (parts.next(), parts.next(), parts.next(), parts.next()) {
        (Some(group), Some(name), Some(version), None)
            if !group.is_empty() && !name.is_empty() && !version.is_empty() =>
        {
            Ok((group, name, version))
        }
        _ => Err(ResolveError::InvalidCoordinate {
            coordinate: coordinate.to_string(),
        }),
    }
}

// ---------------------------------------------------------------------------
// Resolvers
// ---------------------------------------------------------------------------

/// Trait for turning a coordinate into a local jar set.
#[async_trait]
pub trait ArtifactResolver: Send + Sync {
    async fn resolve(&self, coordinate: &str) -> ResolveResult<EngineDistribution>;
}

/// Resolver over a directory of pre-fetched jars.
///
/// Every `*.jar` in the directory becomes part of the distribution, sorted
/// by file name so the set is stable across runs.
#[derive(Debug, Clone)]
pub struct DirResolver {
    dir: PathBuf,
}

impl DirResolver {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn list_jars(&self) -> ResolveResult<Vec<PathBuf>> {
        let mut jars = Vec::new();
        for entry in std::fs::read_dir(&self.dir)? {
            let path = entry?.path();
            if path.extension().is_some_and(|ext| ext == "jar") {
                jars.push(path);
            }
        }
        jars.sort();
        if jars.is_empty() {
            return Err(ResolveError::NoJars {
                dir: self.dir.display().to_string(),
            });
        }
        Ok(jars)
    }
}

#[async_trait]
impl ArtifactResolver for DirResolver {
    async fn resolve(&self, coordinate: &str) -> ResolveResult<EngineDistribution> {
        let jars = self.list_jars()?;
        debug!(
            coordinate = %coordinate,
            dir = %self.dir.display(),
            jar_count = jars.len(),
            "Resolved engine distribution from local directory"
        );
        Ok(EngineDistribution::new(coordinate, jars))
    }
}

/// Resolver that pulls the artifact jar from a Maven repository.
///
/// Only the coordinate's own jar is downloaded; jars already present in the
/// cache directory (for example a pre-seeded dependency closure) are always
/// included in the returned set.
pub struct MavenResolver {
    repo_url: String,
    cache_dir: PathBuf,
    client: reqwest::Client,
}

impl MavenResolver {
    pub fn new(repo_url: &str, cache_dir: impl Into<PathBuf>) -> Self {
        let client = reqwest::Client::builder()
            .user_agent(concat!("refix/", env!("CARGO_PKG_VERSION")))
            .build()
            .expect("Failed to create HTTP client");

        Self {
            repo_url: repo_url.trim_end_matches('/').to_string(),
            cache_dir: cache_dir.into(),
            client,
        }
    }

    /// Repository URL from `REFIX_MAVEN_REPO`, falling back to Maven Central.
    pub fn from_env(cache_dir: impl Into<PathBuf>) -> Self {
        let repo = std::env::var("REFIX_MAVEN_REPO")
            .unwrap_or_else(|_| DEFAULT_MAVEN_REPO.to_string());
        Self::new(&repo, cache_dir)
    }

    fn jar_url(&self, coordinate: &str) -> ResolveResult<String> {
        let (group, name, version) = split_coordinate(coordinate)?;
        Ok(format!(
            "{}/{}/{}/{}/{}-{}.jar",
            self.repo_url,
            group.replace('.', "/"),
            name,
            version,
            name,
            version
        ))
    }

    fn cached_jar_path(&self, coordinate: &str) -> ResolveResult<PathBuf> {
        let (_, name, version) = split_coordinate(coordinate)?;
        Ok(self.cache_dir.join(format!("{name}-{version}.jar")))
    }

    async fn fetch_jar(&self, coordinate: &str, target: &Path) -> ResolveResult<()> {
        let url = self.jar_url(coordinate)?;
        info!(coordinate = %coordinate, url = %url, "Fetching engine artifact");

        let response = self.client.get(&url).send().await?;
        if !response.status().is_success() {
            return Err(ResolveError::NotFound {
                coordinate: coordinate.to_string(),
                status: response.status().as_u16(),
            });
        }
        let bytes = response.bytes().await?;

        std::fs::create_dir_all(&self.cache_dir)?;
        let mut tmp = tempfile::NamedTempFile::new_in(&self.cache_dir)?;
        tmp.write_all(&bytes)?;
        tmp.persist(target).map_err(|e| e.error)?;
        Ok(())
    }
}

#[async_trait]
impl ArtifactResolver for MavenResolver {
    async fn resolve(&self, coordinate: &str) -> ResolveResult<EngineDistribution> {
        let artifact_jar = self.cached_jar_path(coordinate)?;
        if artifact_jar.exists() {
            debug!(coordinate = %coordinate, "Engine artifact already cached");
        } else {
            self.fetch_jar(coordinate, &artifact_jar).await?;
        }

        let jars = DirResolver::new(&self.cache_dir).list_jars()?;
        Ok(EngineDistribution::new(coordinate, jars))
    }
}
