//! Refix-Engine: Scalafix CLI distribution bindings
//!
//! This crate owns everything that touches the engine itself: resolving the
//! pinned CLI artifact to a jar set, constructing isolated engine contexts,
//! and driving runs through a uniform async trait.
//!
//! ## Key Components
//!
//! - `Engine`: async invocation surface every binding implements
//! - `EngineLoader`: keyed cache of isolated contexts (one per distribution)
//! - `ProcessEngine`: subprocess binding over `java -cp <jars> ... --json`
//! - `fakes::ScriptedEngine`: JVM-free binding for tests

pub mod artifact;
pub mod fakes;
pub mod interface;
pub mod loader;
pub mod process;

pub use artifact::{
    cli_coordinate, engine_properties, ArtifactResolver, DirResolver, EngineDistribution,
    MavenResolver, ResolveError, ResolveResult,
};
pub use interface::{
    DriverError, DriverResult, Engine, EngineArgs, EngineError, EngineFailure, EngineMode,
    RuleInfo, RuleKind,
};
pub use loader::{ContextKey, EngineFactory, EngineLoader, IsolatedContext, LoadError, LoadResult};
pub use process::{ProcessEngine, ProcessEngineConfig, ProcessEngineFactory, ProcessReport};

/// Crate version, exposed for diagnostics.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
