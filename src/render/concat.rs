//! Concat stage: batch external scripts through the concat endpoint.
//!
//! Each contiguous run of `<script src>` elements under the same parent is
//! split into batches. A reference is added to the current batch first and
//! the batch is closed once the accumulated URL-encoded length of its
//! references exceeds [`CONCAT_BATCH_THRESHOLD`], or when the run ends.
//! Every batch becomes one `<script>` pointing at
//!
//! ```text
//! {concat}?rewriteMime=text/javascript&gadget=<url>&1=<src>&2=<src>...
//! ```
//!
//! placed where the batch's first script was. Inline scripts and other
//! nodes break runs, so execution order is unchanged.

use anyhow::Result;
use futures::future::BoxFuture;
use tracing::debug;

use super::{GadgetRenderModule, RenderContext, RenderStage};
use crate::constants::CONCAT_BATCH_THRESHOLD;
use crate::document::{MutableDocument, NodeId, external_script, text_roots};
use crate::utils::{query_string, url_encode};

/// Scripts replaced by one concat request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConcatBatch {
    pub parent: NodeId,
    pub nodes: Vec<NodeId>,
    pub sources: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct ConcatModule {
    endpoint: String,
}

impl ConcatModule {
    pub fn new(endpoint: &str) -> Self {
        Self {
            endpoint: endpoint.to_string(),
        }
    }

    fn is_candidate(&self, document: &dyn MutableDocument, node: NodeId) -> Option<String> {
        if document.tag_name(node) != Some("script") {
            return None;
        }
        let src = document.attribute(node, "src")?;
        if src.is_empty() || src.starts_with(&self.endpoint) {
            return None;
        }
        Some(src.to_string())
    }

    /// Batches for the direct children of `parent`, in document order.
    pub fn plan(&self, document: &dyn MutableDocument, parent: NodeId) -> Vec<ConcatBatch> {
        let mut batches = Vec::new();
        let mut current = ConcatBatch {
            parent,
            nodes: Vec::new(),
            sources: Vec::new(),
        };
        let mut length = 0;

        let mut close = |current: &mut ConcatBatch, length: &mut usize| {
            if !current.nodes.is_empty() {
                batches.push(std::mem::replace(
                    current,
                    ConcatBatch {
                        parent,
                        nodes: Vec::new(),
                        sources: Vec::new(),
                    },
                ));
            }
            *length = 0;
        };

        for child in document.children(parent) {
            let Some(src) = self.is_candidate(document, child) else {
                close(&mut current, &mut length);
                continue;
            };
            length += url_encode(&src).len();
            current.nodes.push(child);
            current.sources.push(src);
            if length > CONCAT_BATCH_THRESHOLD {
                close(&mut current, &mut length);
            }
        }
        close(&mut current, &mut length);
        batches
    }

    /// Concat URL for a batch of sources.
    pub fn batch_url(&self, gadget_url: &str, sources: &[String]) -> String {
        let numbers: Vec<String> = (1..=sources.len()).map(|i| i.to_string()).collect();
        let pairs = [("rewriteMime", "text/javascript"), ("gadget", gadget_url)]
            .into_iter()
            .chain(numbers.iter().map(String::as_str).zip(sources.iter().map(String::as_str)));
        format!("{}?{}", self.endpoint, query_string(pairs))
    }
}

impl GadgetRenderModule for ConcatModule {
    fn stage(&self) -> RenderStage {
        RenderStage::Concat
    }

    fn render<'a>(
        &'a self,
        context: &'a RenderContext<'a>,
        document: &'a mut dyn MutableDocument,
    ) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            let mut batches = Vec::new();
            for root in text_roots(&*document, context.gadget.context.mode)? {
                batches.extend(self.plan(&*document, root));
            }
            debug!("Concatenating scripts into {} batch(es)", batches.len());

            for batch in batches.iter().rev() {
                let Some(first) = batch.nodes.first().copied() else {
                    continue;
                };
                let url = self.batch_url(&context.gadget.definition.uri, &batch.sources);
                let replacement = external_script(document, &url);
                document.insert_before(batch.parent, replacement, first);
                for node in &batch.nodes {
                    document.remove_child(batch.parent, *node);
                }
            }
            Ok(())
        })
    }
}
