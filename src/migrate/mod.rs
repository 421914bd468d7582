//! Conversion between stored (compact) and runtime workflow documents.
//!
//! A compact document keeps its sequencing links outside the slot lists, in
//! `flow_links` plus per-node `flow_inputs`/`flow_outputs`. The runtime form
//! materializes them as ordinary `FLOW` slots placed ahead of every data slot,
//! which is what the rest of the compiler works on. Documents saved before
//! sequencing existed get a flow order synthesized from their data links.

mod codec;
mod flows;
mod legacy;

pub use flows::{FlowTable, FlowTarget};
pub use legacy::flow_order;

use tracing::debug;

use crate::error::CompileError;
use crate::graph::Document;
use crate::registry::OperationRegistry;

fn needs_flow_synthesis(doc: &Document) -> bool {
    !doc.support_flow_control
        && !doc.has_compact_flow()
        && !doc
            .nodes
            .iter()
            .any(|n| n.flow_input_count() > 0 || n.flow_output_count() > 0)
}

/// Brings any stored document into runtime form.
///
/// Legacy documents first get one flow link per consecutive pair of their
/// [`flow_order`]. Runtime documents are returned unchanged.
pub fn expand(doc: Document, registry: &OperationRegistry) -> Result<Document, CompileError> {
    let doc = if needs_flow_synthesis(&doc) {
        debug!(nodes = doc.nodes.len(), "Migrating legacy document");
        legacy::synthesize_flow(doc, registry)
    } else {
        doc
    };
    codec::materialize(doc)
}

/// Converts a document into compact form for persistence.
///
/// Pending compact data is materialized first, so compacting twice is the same
/// as compacting once. Legacy documents must go through [`expand`] first,
/// otherwise they are stored with empty sequencing data.
pub fn compact(doc: Document) -> Result<Document, CompileError> {
    codec::strip(codec::materialize(doc)?)
}
