//! View stage: write the selected view content into the document.

use anyhow::Result;
use futures::future::{BoxFuture, join_all};
use tracing::{debug, warn};

use super::{GadgetRenderModule, RenderContext, RenderStage};
use crate::document::{MutableDocument, content_node};
use crate::fetch::{FetchRequest, fetch_text};
use crate::gadget::View;

/// Writes every view matching the requested view name, fetching remote
/// views concurrently. A failed fetch leaves that view empty.
#[derive(Debug, Clone, Copy, Default)]
pub struct ViewModule;

impl ViewModule {
    async fn view_content(context: &RenderContext<'_>, view: &View) -> String {
        let Some(href) = view.href.as_deref().filter(|_| view.needs_fetch()) else {
            return view.content.clone();
        };
        match fetch_text(context.fetcher, &context.deadline, &FetchRequest::get(href), "view content fetch").await {
            Ok(body) => body,
            Err(e) => {
                warn!("Failed to fetch content of view '{}' from {}: {}", view.name, href, e);
                String::new()
            }
        }
    }
}

impl GadgetRenderModule for ViewModule {
    fn stage(&self) -> RenderStage {
        RenderStage::View
    }

    fn render<'a>(
        &'a self,
        context: &'a RenderContext<'a>,
        document: &'a mut dyn MutableDocument,
    ) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            let views = context.gadget.current_views();
            if views.is_empty() {
                warn!("Gadget {} declares no content", context.gadget.definition.uri);
            }
            debug!("Rendering {} view section(s) for '{}'", views.len(), context.gadget.context.view);

            let contents = join_all(views.iter().map(|view| Self::view_content(context, view))).await;

            let node = content_node(&*document, context.gadget.context.mode)?;
            let markup = document.create_markup(&contents.concat());
            document.append_child(node, markup);
            Ok(())
        })
    }
}
