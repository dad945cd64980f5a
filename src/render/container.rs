//! Container pipeline: the environment-init script for a container page.

use anyhow::Result;
use futures::future::BoxFuture;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tracing::debug;

use crate::container::Container;
use crate::features::TargetType;
use crate::utils::script_json;

/// One module of the container pipeline, writing into a string buffer.
pub trait ContainerRenderModule: Send + Sync {
    /// Short name for logs.
    fn name(&self) -> &'static str;

    fn render<'a>(&'a self, container: &'a Container, output: &'a mut String) -> BoxFuture<'a, Result<()>>;
}

/// Writes the container-side script of every container feature.
///
/// Remote scripts cannot be inlined and are left out.
#[derive(Debug, Clone, Copy, Default)]
pub struct ContainerFeatureModule;

impl ContainerRenderModule for ContainerFeatureModule {
    fn name(&self) -> &'static str {
        "container-features"
    }

    fn render<'a>(&'a self, container: &'a Container, output: &'a mut String) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            for feature in container.container_features() {
                for script in feature.delivered_scripts(TargetType::Container) {
                    match script.content()? {
                        Some(content) => {
                            output.push_str(&content);
                            output.push('\n');
                        }
                        None => debug!(
                            "Not inlining {} script {} of feature '{}'",
                            script.kind(),
                            script.reference().unwrap_or_default(),
                            feature.name
                        ),
                    }
                }
            }
            Ok(())
        })
    }
}

/// Writes `gadgets.config.init(<settings>);`.
#[derive(Debug, Clone, Copy, Default)]
pub struct ContainerConfigModule;

impl ContainerRenderModule for ContainerConfigModule {
    fn name(&self) -> &'static str {
        "container-config"
    }

    fn render<'a>(&'a self, container: &'a Container, output: &'a mut String) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            output.push_str("gadgets.config.init(");
            output.push_str(&script_json(container.settings())?);
            output.push_str(");\n");
            Ok(())
        })
    }
}

/// Ordered container modules.
pub struct ContainerPipeline {
    modules: Vec<Box<dyn ContainerRenderModule>>,
}

impl ContainerPipeline {
    pub fn new(modules: Vec<Box<dyn ContainerRenderModule>>) -> Self {
        Self {
            modules,
        }
    }

    /// Feature scripts, then the config init call.
    pub fn standard() -> Self {
        Self::new(vec![Box::new(ContainerFeatureModule), Box::new(ContainerConfigModule)])
    }

    /// Run every module and write the buffer to `writer` once.
    ///
    /// # Errors
    ///
    /// Propagates the first module error; nothing is written in that case.
    pub async fn render<W>(&self, container: &Container, writer: &mut W) -> Result<()>
    where
        W: AsyncWrite + Unpin + Send,
    {
        let mut output = String::new();
        for module in &self.modules {
            debug!("Running {} for container '{}'", module.name(), container.name());
            module.render(container, &mut output).await?;
        }
        writer.write_all(output.as_bytes()).await?;
        writer.flush().await?;
        Ok(())
    }
}
