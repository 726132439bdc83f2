//! Scripted engine fakes (testing only)
//!
//! Provides `ScriptedEngine` and `ScriptedEngineFactory` that satisfy the
//! engine traits without a JVM, recording every invocation for assertions.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use crate::artifact::EngineDistribution;
use crate::interface::{DriverResult, Engine, EngineArgs, EngineError, RuleInfo};
use crate::loader::{EngineFactory, LoadError, LoadResult};

// ---------------------------------------------------------------------------
// ScriptedEngine
// ---------------------------------------------------------------------------

/// Engine fake with scripted rules and outcomes.
///
/// Behavior is fixed at construction: the rule lists are returned verbatim
/// and `run` reports the scripted error codes. With `require_semanticdb`
/// set, a run whose applicable rules include a semantic rule reports
/// `missing_semanticdb` unless the arguments carry the `-Xsemanticdb` flag,
/// approximating how the real engine fails without compiler metadata.
#[derive(Debug, Default)]
pub struct ScriptedEngine {
    available: Vec<RuleInfo>,
    applicable: Vec<RuleInfo>,
    errors: Vec<EngineError>,
    require_semanticdb: bool,
    invocations: Mutex<Vec<EngineArgs>>,
}

impl ScriptedEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a rule that is both available and applicable.
    pub fn with_rule(mut self, rule: RuleInfo) -> Self {
        self.available.push(rule.clone());
        self.applicable.push(rule);
        self
    }

    /// Add a rule that is available but will not run.
    pub fn with_available_rule(mut self, rule: RuleInfo) -> Self {
        self.available.push(rule);
        self
    }

    /// Script the error codes every run reports.
    pub fn with_errors(mut self, errors: Vec<EngineError>) -> Self {
        self.errors = errors;
        self
    }

    /// Fail runs of semantic rules unless `-Xsemanticdb` is present.
    pub fn require_semanticdb(mut self) -> Self {
        self.require_semanticdb = true;
        self
    }

    /// Arguments of every `run` call so far, in call order.
    pub fn recorded_runs(&self) -> Vec<EngineArgs> {
        self.invocations.lock().unwrap().clone()
    }

    pub fn run_count(&self) -> usize {
        self.invocations.lock().unwrap().len()
    }
}

#[async_trait]
impl Engine for ScriptedEngine {
    async fn available_rules(&self, _args: &EngineArgs) -> DriverResult<Vec<RuleInfo>> {
        Ok(self.available.clone())
    }

    async fn rules_that_will_run(&self, _args: &EngineArgs) -> DriverResult<Vec<RuleInfo>> {
        Ok(self.applicable.clone())
    }

    async fn run(&self, args: &EngineArgs) -> DriverResult<Vec<EngineError>> {
        self.invocations.lock().unwrap().push(args.clone());

        if self.require_semanticdb
            && self.applicable.iter().any(RuleInfo::is_semantic)
            && !args.emits_semanticdb()
        {
            return Ok(vec![EngineError::MissingSemanticdb]);
        }
        Ok(self.errors.clone())
    }
}

// ---------------------------------------------------------------------------
// ScriptedEngineFactory
// ---------------------------------------------------------------------------

/// Factory fake that hands out one shared `ScriptedEngine` and counts loads.
#[derive(Debug)]
pub struct ScriptedEngineFactory {
    engine: Arc<ScriptedEngine>,
    fail_with: Option<String>,
    loads: AtomicUsize,
}

impl Default for ScriptedEngineFactory {
    fn default() -> Self {
        Self::with_engine(Arc::new(ScriptedEngine::new()))
    }
}

impl ScriptedEngineFactory {
    pub fn with_engine(engine: Arc<ScriptedEngine>) -> Self {
        Self {
            engine,
            fail_with: None,
            loads: AtomicUsize::new(0),
        }
    }

    /// Make every load fail with the given reason.
    pub fn failing(reason: impl Into<String>) -> Self {
        Self {
            engine: Arc::new(ScriptedEngine::new()),
            fail_with: Some(reason.into()),
            loads: AtomicUsize::new(0),
        }
    }

    /// The shared engine instance handed to every context.
    pub fn engine(&self) -> Arc<ScriptedEngine> {
        Arc::clone(&self.engine)
    }

    /// Number of successful and failed load attempts.
    pub fn load_count(&self) -> usize {
        self.loads.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl EngineFactory for ScriptedEngineFactory {
    async fn load(&self, distribution: &EngineDistribution) -> LoadResult<Arc<dyn Engine>> {
        self.loads.fetch_add(1, Ordering::SeqCst);
        if let Some(reason) = &self.fail_with {
            return Err(LoadError::Construction {
                artifact: distribution.coordinate.clone(),
                reason: reason.clone(),
            });
        }
        Ok(self.engine() as Arc<dyn Engine>)
    }
}
