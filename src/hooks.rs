//! Extension hooks invoked between compiler phases.

use futures::FutureExt;
use futures::future::{BoxFuture, join_all};
use std::fmt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::{Mutex, MutexGuard};
use tracing::{debug, error};

use crate::error::CompileError;
use crate::graph::Document;

/// Points in the pipeline at which extensions run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HookPhase {
    /// The stored document, before any migration or renaming.
    BeforeMigration,
    /// The runtime document after group instances were expanded.
    AfterExpansion,
    /// The runtime document returned by [`Compiler::load`](crate::compiler::Compiler::load).
    AfterLoad,
}

impl fmt::Display for HookPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            HookPhase::BeforeMigration => "before_migration",
            HookPhase::AfterExpansion => "after_expansion",
            HookPhase::AfterLoad => "after_load",
        };
        f.write_str(name)
    }
}

/// Failure reported by an extension. Logged, never propagated.
#[derive(Error, Debug, Clone, PartialEq)]
#[error("{0}")]
pub struct HookError(pub String);

impl HookError {
    pub fn new(message: impl Into<String>) -> Self {
        HookError(message.into())
    }
}

/// State shared with the extensions of one phase.
pub struct HookContext {
    document: Mutex<Document>,
    missing_types: Vec<String>,
}

impl HookContext {
    pub fn new(document: Document, missing_types: Vec<String>) -> Self {
        Self {
            document: Mutex::new(document),
            missing_types,
        }
    }

    /// Locks the document. Extensions of a phase run concurrently, so keep
    /// the guard only as long as needed.
    pub async fn document(&self) -> MutexGuard<'_, Document> {
        self.document.lock().await
    }

    /// Types found in the document that the registry does not know.
    pub fn missing_types(&self) -> &[String] {
        &self.missing_types
    }

    pub fn into_document(self) -> Document {
        self.document.into_inner()
    }
}

/// A named participant in the compile pipeline.
pub trait Extension: Send + Sync {
    fn name(&self) -> &str;

    /// Called once per phase. The default does nothing.
    fn on_phase<'a>(
        &'a self,
        phase: HookPhase,
        ctx: &'a HookContext,
    ) -> BoxFuture<'a, Result<(), HookError>> {
        let _ = (phase, ctx);
        Box::pin(async { Ok(()) })
    }
}

/// Registered extensions, in registration order.
#[derive(Clone, Default)]
pub struct ExtensionSet {
    extensions: Vec<Arc<dyn Extension>>,
}

impl fmt::Debug for ExtensionSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.names()).finish()
    }
}

impl ExtensionSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds an extension. Names must be non-empty and unique.
    pub fn register(&mut self, extension: Arc<dyn Extension>) -> Result<(), CompileError> {
        let name = extension.name();
        if name.trim().is_empty() {
            return Err(CompileError::InvalidExtension(
                "extensions must have a name".to_string(),
            ));
        }
        if self.extensions.iter().any(|e| e.name() == name) {
            return Err(CompileError::InvalidExtension(format!(
                "extension '{}' is already registered",
                name
            )));
        }
        debug!(extension = name, "Registered extension");
        self.extensions.push(extension);
        Ok(())
    }

    pub fn names(&self) -> Vec<&str> {
        self.extensions.iter().map(|e| e.name()).collect()
    }

    pub fn len(&self) -> usize {
        self.extensions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.extensions.is_empty()
    }

    /// Runs every extension for `phase` concurrently and waits for all of them.
    /// Errors and panics are logged per extension. Returns how many failed.
    pub async fn invoke(&self, phase: HookPhase, ctx: &HookContext) -> usize {
        if self.extensions.is_empty() {
            return 0;
        }
        let runs = self.extensions.iter().map(|extension| async move {
            let outcome = AssertUnwindSafe(async { extension.on_phase(phase, ctx).await })
                .catch_unwind()
                .await;
            match outcome {
                Ok(Ok(())) => true,
                Ok(Err(e)) => {
                    error!(extension = extension.name(), phase = %phase, error = %e, "Extension hook failed");
                    false
                }
                Err(_) => {
                    error!(extension = extension.name(), phase = %phase, "Extension hook panicked");
                    false
                }
            }
        });
        let failures = join_all(runs).await.into_iter().filter(|ok| !ok).count();
        debug!(phase = %phase, extensions = self.extensions.len(), failures, "Ran extension hooks");
        failures
    }
}
