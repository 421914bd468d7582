use rand::Rng;
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::{debug, warn};

use crate::config::CompilerConfig;
use crate::error::CompileError;
use crate::graph::{Document, GraphArena};
use crate::group::{DefinitionSet, GroupNodeDef, expand_groups};
use crate::hooks::{ExtensionSet, HookContext, HookPhase};
use crate::migrate::{self, FlowTable};
use crate::queue::{ExtraData, PromptRequest};
use crate::registry::{OperationRegistry, widgets};

mod builder;
mod context;
pub mod planner;
pub mod resolver;
pub mod serializer;
pub mod virtual_nodes;

pub use builder::CompilerBuilder;
pub use resolver::Producer;
pub use serializer::{InputValue, Instruction, Prompt};

use context::CompilerContext;

/// Result of compiling one workflow document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompiledPrompt {
    /// Instruction map keyed by node id.
    pub output: Prompt,
    /// FLOW successors of every node, from the compact snapshot.
    pub flows: FlowTable,
    /// Compact snapshot of the workflow as compiled.
    pub workflow: Document,
    pub missing_types: Vec<String>,
}

impl CompiledPrompt {
    /// Persists the compact snapshot.
    pub fn save_snapshot(&self, path: impl AsRef<Path>) -> Result<(), CompileError> {
        self.workflow.save(path)
    }

    /// The request body handed to the execution engine.
    pub fn to_request(&self, number: i64) -> PromptRequest {
        PromptRequest {
            number,
            prompt: self.output.clone(),
            flows: self.flows.clone(),
            extra_data: ExtraData::with_workflow(self.workflow.clone()),
        }
    }
}

/// A stored document brought into runtime form for editing.
#[derive(Debug, Clone)]
pub struct LoadedGraph {
    pub document: Document,
    pub missing_types: Vec<String>,
    /// Definitions of the groups embedded in the document, sorted by type.
    pub group_defs: Vec<GroupNodeDef>,
}

/// Compiles workflow documents into prompts for the execution engine.
///
/// A compiler owns its registry and extensions and keeps no state between
/// calls; every compile works on its own copy of the document.
pub struct Compiler {
    registry: OperationRegistry,
    config: CompilerConfig,
    extensions: ExtensionSet,
}

impl Compiler {
    pub fn builder(registry: OperationRegistry) -> CompilerBuilder {
        CompilerBuilder::new(registry)
    }

    pub fn new(registry: OperationRegistry) -> Self {
        Self {
            registry,
            config: CompilerConfig::default(),
            extensions: ExtensionSet::new(),
        }
    }

    pub fn registry(&self) -> &OperationRegistry {
        &self.registry
    }

    pub fn config(&self) -> &CompilerConfig {
        &self.config
    }

    pub fn extensions(&self) -> &ExtensionSet {
        &self.extensions
    }

    /// Runs the extensions of `phase` over `document` and returns the
    /// document as they left it.
    async fn run_hooks(
        &self,
        phase: HookPhase,
        document: Document,
        missing_types: Vec<String>,
    ) -> Document {
        if self.extensions.is_empty() {
            return document;
        }
        let ctx = HookContext::new(document, missing_types);
        self.extensions.invoke(phase, &ctx).await;
        ctx.into_document()
    }

    fn migrate(&self, document: Document) -> Result<Document, CompileError> {
        migrate::expand(document, &self.registry).map_err(|e| {
            e.with_hint(CompilerContext::extension_hint(&self.extensions.names()))
        })
    }

    /// Compiles a stored or runtime document.
    ///
    /// Unknown node types do not fail the compile; they are listed in
    /// `missing_types`. Errors are reserved for documents that cannot be
    /// brought into runtime form.
    pub async fn compile(&self, document: &Document) -> Result<CompiledPrompt, CompileError> {
        let mut ctx = CompilerContext::new(document, &self.registry);
        ctx.document = self
            .run_hooks(HookPhase::BeforeMigration, ctx.document, Vec::new())
            .await;

        let defs = ctx.normalize_types();
        let runtime = self.migrate(std::mem::take(&mut ctx.document))?;
        debug!(nodes = runtime.nodes.len(), links = runtime.links.len(), "Migrated document");

        let mut arena = GraphArena::from_document(&runtime);
        let order = planner::execution_order(&arena);
        virtual_nodes::apply(&mut arena, &defs, &order);

        let workflow = migrate::compact(arena.to_document(&runtime))?;
        let flows = FlowTable::from_document(&workflow);

        let expanded = expand_groups(&mut arena, &defs, &mut ctx.missing);
        if expanded > 0 {
            let order = planner::execution_order(&arena);
            virtual_nodes::apply(&mut arena, &defs, &order);
        }

        if !self.extensions.is_empty() {
            let document = self
                .run_hooks(
                    HookPhase::AfterExpansion,
                    arena.to_document(&runtime),
                    ctx.missing_types(),
                )
                .await;
            arena = GraphArena::from_document(&document);
        }

        let order = planner::execution_order(&arena);
        let output = serializer::serialize(&arena, &defs, &order);

        let missing_types = ctx.missing_types();
        if !missing_types.is_empty() {
            warn!(types = ?missing_types, "Workflow uses node types that are not registered");
        }
        debug!(instructions = output.len(), groups = expanded, "Compiled workflow");

        Ok(CompiledPrompt {
            output,
            flows,
            workflow,
            missing_types,
        })
    }

    /// Brings a stored document into runtime form without compiling it.
    pub async fn load(&self, document: &Document) -> Result<LoadedGraph, CompileError> {
        let mut ctx = CompilerContext::new(document, &self.registry);
        ctx.document = self
            .run_hooks(HookPhase::BeforeMigration, ctx.document, Vec::new())
            .await;

        let defs = ctx.normalize_types();
        let runtime = self.migrate(std::mem::take(&mut ctx.document))?;
        let missing_types = ctx.missing_types();
        if !missing_types.is_empty() {
            warn!(types = ?missing_types, "Workflow uses node types that are not registered");
        }
        let document = self
            .run_hooks(HookPhase::AfterLoad, runtime, missing_types.clone())
            .await;

        Ok(LoadedGraph {
            document,
            missing_types,
            group_defs: defs.groups().into_iter().cloned().collect(),
        })
    }

    /// Applies every `control_after_generate` widget in the document, group
    /// instances included. Returns the number of nodes whose seed changed.
    pub fn advance_seed_controls<R: Rng + ?Sized>(&self, document: &mut Document, rng: &mut R) -> usize {
        let defs = DefinitionSet::with_groups(&self.registry, &document.extra.group_nodes);
        let mut changed = 0;
        for node in document.nodes.iter_mut() {
            let Some(def) = defs.get(&node.node_type) else {
                continue;
            };
            if widgets::advance_seed_controls(node, def, &self.registry, rng) {
                changed += 1;
            }
        }
        changed
    }
}
