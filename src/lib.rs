//! # Kumitate - Workflow Graph Compiler
//!
//! **Kumitate** turns visually authored node graphs (*workflows*) into the
//! instruction map an execution engine runs. It accepts the documents a node
//! editor stores, old and new, and never touches the caller's copy.
//!
//! ## Core Workflow
//!
//! Compiling a document runs these stages in order:
//!
//! 1.  **Migrate**: documents stored before sequencing links existed get a flow order
//!     synthesized from their data links; compact sequencing data is materialized as
//!     ordinary `FLOW` slots (see [`migrate`]).
//! 2.  **Expand groups**: every group instance is replaced by its member nodes, with
//!     widget values and links remapped (see [`group`]).
//! 3.  **Resolve links**: inputs fed through bypassed or editor-only nodes are traced back
//!     to the node that actually produces the value.
//! 4.  **Plan and serialize**: nodes are ordered so producers come first and written out
//!     as `{class_type, inputs, is_input_linked}` together with a table of FLOW successors
//!     and a compact snapshot of the workflow.
//!
//! Extensions can observe or rewrite the document between stages (see [`hooks`]), and
//! [`queue`] submits compiled prompts to an engine one at a time.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use kumitate::prelude::*;
//!
//! # async fn run() -> Result<()> {
//! let registry = OperationRegistry::from_file("object_info.json")?;
//! let compiler = Compiler::builder(registry).build()?;
//!
//! let workflow = Document::from_file("workflow.json")?;
//! let compiled = compiler.compile(&workflow).await?;
//!
//! for (id, instruction) in &compiled.output {
//!     println!("{} -> {}", id, instruction.class_type);
//! }
//! if !compiled.missing_types.is_empty() {
//!     println!("Missing node types: {}", compiled.missing_types.join(", "));
//! }
//! compiled.save_snapshot("workflow.compact.json")?;
//! # Ok(())
//! # }
//! ```

pub mod compiler;
pub mod config;
pub mod error;
pub mod graph;
pub mod group;
pub mod hooks;
pub mod migrate;
pub mod prelude;
pub mod queue;
pub mod registry;
