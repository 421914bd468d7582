//! Prelude module for convenient imports
//!
//! This module re-exports the most commonly used types and traits from the kumitate crate.
//! Import this module to get access to the core functionality without having to import
//! each type individually.
//!
//! # Example
//!
//! ```rust,no_run
//! use kumitate::prelude::*;
//!
//! # async fn run_example() -> Result<()> {
//! let registry = OperationRegistry::from_file("path/to/object_info.json")?;
//! let compiler = Compiler::new(registry);
//!
//! let loaded = compiler.load(&Document::from_file("path/to/workflow.json")?).await?;
//! println!("Groups: {}", loaded.group_defs.len());
//!
//! let compact = migrate::compact(loaded.document)?;
//! compact.save("path/to/workflow.compact.json")?;
//! # Ok(())
//! # }
//! ```

// Compilation
pub use crate::compiler::{CompiledPrompt, Compiler, CompilerBuilder, InputValue, Instruction, LoadedGraph};
pub use crate::config::CompilerConfig;

// Graph model
pub use crate::graph::{Document, GraphArena, Link, Node, NodeId, NodeMode};
pub use crate::migrate::{self, FlowTable};
pub use crate::registry::{OperationDef, OperationRegistry, VirtualKind};

// Extensions and submission
pub use crate::hooks::{Extension, HookContext, HookError, HookPhase};
pub use crate::queue::{EngineClient, PromptRequest, QueueReceipt, SubmissionQueue, SubmissionWorker, SubmitRequest};

// Error types
pub use crate::error::{CompileError, EngineError};

// Result type alias for convenience
pub type Result<T> = std::result::Result<T, Box<dyn std::error::Error>>;
