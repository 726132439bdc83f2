//! Cached, isolated engine contexts.
//!
//! Loading a Scalafix distribution is expensive, so contexts are cached by a
//! digest of the artifact coordinate and the exact jar set. The loader is an
//! owned service instance: hosts create one, share it, and drop it to release
//! every context it holds. Contexts are never evicted while the loader lives.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use sha2::Sha256;
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::artifact::EngineDistribution;
use crate::interface::Engine;

// ---------------------------------------------------------------------------
// Context key
// ---------------------------------------------------------------------------

/// Cache key for an isolated context: SHA-256 over the artifact coordinate
/// and the jar set. Jar order does not matter; the set is what identifies
/// the distribution.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ContextKey(String);

impl ContextKey {
    pub fn compute(coordinate: &str, jars: &[PathBuf]) -> Self {
        use sha2::Digest;

        let mut sorted: Vec<&PathBuf> = jars.iter().collect();
        sorted.sort();
        sorted.dedup();

        let mut hasher = Sha256::new();
        hasher.update(coordinate.as_bytes());
        for jar in sorted {
            hasher.update([0u8]);
            hasher.update(jar.display().to_string().as_bytes());
        }
        ContextKey(hex::encode(hasher.finalize()))
    }

    /// Full hex string.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Short form (first 12 hex chars) for log lines.
    pub fn short(&self) -> &str {
        &self.0[..12]
    }
}

impl std::fmt::Display for ContextKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.short())
    }
}

// ---------------------------------------------------------------------------
// Load errors
// ---------------------------------------------------------------------------

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("engine jar set for '{artifact}' is empty")]
    EmptyJarSet { artifact: String },

    #[error("failed to construct engine for '{artifact}': {reason}")]
    Construction { artifact: String, reason: String },
}

pub type LoadResult<T> = std::result::Result<T, LoadError>;

// ---------------------------------------------------------------------------
// Factory trait and context
// ---------------------------------------------------------------------------

/// Trait for constructing engine instances from a resolved distribution.
#[async_trait]
pub trait EngineFactory: Send + Sync {
    /// Build an engine whose classpath is exactly the distribution's jar
    /// set. Only the [`Engine`] surface escapes the boundary.
    async fn load(&self, distribution: &EngineDistribution) -> LoadResult<Arc<dyn Engine>>;
}

/// One loaded engine together with the distribution it was built from.
#[derive(Clone)]
pub struct IsolatedContext {
    key: ContextKey,
    coordinate: String,
    jars: Vec<PathBuf>,
    engine: Arc<dyn Engine>,
}

impl IsolatedContext {
    pub fn key(&self) -> &ContextKey {
        &self.key
    }

    pub fn coordinate(&self) -> &str {
        &self.coordinate
    }

    pub fn jars(&self) -> &[PathBuf] {
        &self.jars
    }

    pub fn engine(&self) -> &Arc<dyn Engine> {
        &self.engine
    }
}

impl std::fmt::Debug for IsolatedContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IsolatedContext")
            .field("key", &self.key)
            .field("coordinate", &self.coordinate)
            .field("jars", &self.jars.len())
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Loader
// ---------------------------------------------------------------------------

/// Keyed cache of isolated engine contexts.
pub struct EngineLoader {
    factory: Arc<dyn EngineFactory>,
    contexts: Mutex<HashMap<ContextKey, Arc<IsolatedContext>>>,
}

impl EngineLoader {
    pub fn new(factory: Arc<dyn EngineFactory>) -> Self {
        Self {
            factory,
            contexts: Mutex::new(HashMap::new()),
        }
    }

    /// Get or create the context for a distribution.
    ///
    /// The cache lock is held across construction, so concurrent callers
    /// asking for the same key observe exactly one construction and share
    /// the resulting instance.
    pub async fn isolated_context(
        &self,
        distribution: &EngineDistribution,
    ) -> LoadResult<Arc<IsolatedContext>> {
        if distribution.jars.is_empty() {
            return Err(LoadError::EmptyJarSet {
                artifact: distribution.coordinate.clone(),
            });
        }

        let key = ContextKey::compute(&distribution.coordinate, &distribution.jars);

        let mut contexts = self.contexts.lock().await;
        if let Some(context) = contexts.get(&key) {
            debug!(key = %key, coordinate = %distribution.coordinate, "Engine context cache hit");
            return Ok(Arc::clone(context));
        }

        info!(
            key = %key,
            coordinate = %distribution.coordinate,
            jar_count = distribution.jars.len(),
            "Constructing isolated engine context"
        );
        let engine = self.factory.load(distribution).await?;
        let context = Arc::new(IsolatedContext {
            key: key.clone(),
            coordinate: distribution.coordinate.clone(),
            jars: distribution.jars.clone(),
            engine,
        });
        contexts.insert(key, Arc::clone(&context));
        Ok(context)
    }

    /// Number of cached contexts.
    pub async fn context_count(&self) -> usize {
        self.contexts.lock().await.len()
    }
}
