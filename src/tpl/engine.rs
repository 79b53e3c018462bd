use std::sync::{Arc, LazyLock};

use serde::Serialize;
use tracing::debug;

use crate::error::{CompileError, Error};
use crate::models::engine_options::EngineOptions;
use crate::models::render_options::RenderOptions;
use crate::tpl::cache::{ArtifactCache, CacheKey};
use crate::tpl::codegen::Artifact;
use crate::tpl::render::Renderer;
use crate::value::{Value, to_value};

static ENGINE: LazyLock<Engine> = LazyLock::new(Engine::new);

/// The process-wide default engine.
pub fn engine() -> &'static Engine {
    &ENGINE
}

/// Renders through the process-wide default engine.
pub async fn render(source: &str, ctx: &Value, options: &RenderOptions) -> Result<String, Error> {
    engine().render(source, ctx, options).await
}

/// Compiles templates through an artifact cache and renders them.
///
/// Engines are cheap to construct. Engines built with [`Engine::with_cache`]
/// over the same cache share compiled artifacts; otherwise each engine's
/// cache is independent.
#[derive(Debug)]
pub struct Engine {
    cache: Arc<ArtifactCache>,
    options: EngineOptions,
}

impl Default for Engine {
    fn default() -> Self {
        Self::new()
    }
}

impl Engine {
    pub fn new() -> Self {
        Self::with_options(EngineOptions::default())
    }

    pub fn with_options(options: EngineOptions) -> Self {
        Self::with_cache(Arc::new(ArtifactCache::new(options.cache_capacity)), options)
    }

    /// `options.cache_capacity` is ignored; the cache keeps its own capacity.
    pub fn with_cache(cache: Arc<ArtifactCache>, options: EngineOptions) -> Self {
        Engine { cache, options }
    }

    pub fn cache(&self) -> &Arc<ArtifactCache> {
        &self.cache
    }

    pub fn options(&self) -> &EngineOptions {
        &self.options
    }

    /// Cached artifact for `source`, compiled on first use.
    pub fn load(&self, source: &str, custom_helpers: &[String]) -> Result<Arc<Artifact>, CompileError> {
        self.cache.get_or_compile(source, custom_helpers)
    }

    /// Drops the cached artifact for `source`; `true` if one was cached.
    pub fn remove(&self, source: &str, custom_helpers: &[String]) -> bool {
        self.cache
            .remove(&CacheKey::derive(source, custom_helpers))
            .is_some()
    }

    pub async fn render(
        &self,
        source: &str,
        ctx: &Value,
        options: &RenderOptions,
    ) -> Result<String, Error> {
        let custom = options.custom_helper_names();
        let artifact = self.load(source, &custom)?;
        debug!("rendering {}", artifact.entry_point);

        let out = Renderer::new(&options.helpers)
            .partials(options.partials.as_deref())
            .cache(&self.cache)
            .max_partial_depth(self.options.max_partial_depth)
            .render(&artifact, ctx)
            .await?;
        Ok(out)
    }

    /// Serializes `param` into a [`Value`] and renders with it as the context.
    pub async fn render_serialize<T: Serialize + Sync + ?Sized>(
        &self,
        source: &str,
        param: &T,
        options: &RenderOptions,
    ) -> Result<String, Error> {
        let ctx = to_value(param)?;
        self.render(source, &ctx, options).await
    }
}
