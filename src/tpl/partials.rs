use anyhow::{Context, Result};
use async_trait::async_trait;
use dashmap::DashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{trace, warn};
use walkdir::WalkDir;

/// File extension of partial templates on disk.
pub const TEMPLATE_EXTENSION: &str = "bnt";

/// Fallback source for partials that were not registered up front.
#[async_trait]
pub trait PartialResolver: Send + Sync {
    /// `Ok(None)` means the partial does not exist.
    async fn resolve(&self, name: &str) -> Result<Option<String>>;
}

/// Adapts a synchronous closure into a [`PartialResolver`].
pub struct FnResolver<F>(pub F);

#[async_trait]
impl<F> PartialResolver for FnResolver<F>
where
    F: Fn(&str) -> Option<String> + Send + Sync,
{
    async fn resolve(&self, name: &str) -> Result<Option<String>> {
        Ok((self.0)(name))
    }
}

/// Loads `a.b` from `<root>/a/b.bnt` on demand.
#[derive(Debug, Clone)]
pub struct DirectoryResolver {
    root: PathBuf,
}

impl DirectoryResolver {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn path_for(&self, name: &str) -> Option<PathBuf> {
        let mut path = self.root.clone();
        for segment in name.split('.') {
            let valid = !segment.is_empty()
                && segment
                    .chars()
                    .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');
            if !valid {
                return None;
            }
            path.push(segment);
        }
        path.set_extension(TEMPLATE_EXTENSION);
        Some(path)
    }
}

#[async_trait]
impl PartialResolver for DirectoryResolver {
    async fn resolve(&self, name: &str) -> Result<Option<String>> {
        let Some(path) = self.path_for(name) else {
            return Ok(None);
        };
        match tokio::fs::read_to_string(&path).await {
            Ok(text) => Ok(Some(text)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e).with_context(|| format!("reading partial {}", path.display())),
        }
    }
}

/// Name → template text, memoizing whatever the resolver returns.
///
/// Concurrent first lookups of the same name may each call the resolver.
#[derive(Default)]
pub struct PartialRegistry {
    templates: DashMap<String, Arc<str>>,
    resolver: Option<Arc<dyn PartialResolver>>,
}

impl PartialRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_resolver(mut self, resolver: impl PartialResolver + 'static) -> Self {
        self.resolver = Some(Arc::new(resolver));
        self
    }

    pub fn from_map<I, K, V>(partials: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let registry = Self::new();
        for (name, text) in partials {
            registry.register(name, text);
        }
        registry
    }

    pub fn register(&self, name: impl Into<String>, template: impl Into<String>) {
        let template: String = template.into();
        self.templates.insert(name.into(), Arc::from(template));
    }

    pub fn contains(&self, name: &str) -> bool {
        self.templates.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.templates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.templates.is_empty()
    }

    /// Memoized text first, then the resolver. Successful resolutions are memoized.
    pub async fn resolve(&self, name: &str) -> Result<Option<Arc<str>>> {
        let memoized = self.templates.get(name).map(|t| t.value().clone());
        if memoized.is_some() {
            return Ok(memoized);
        }

        let Some(resolver) = &self.resolver else {
            return Ok(None);
        };
        trace!("resolving partial '{}'", name);
        match resolver.resolve(name).await {
            Ok(Some(text)) if !text.is_empty() => {
                let text: Arc<str> = Arc::from(text);
                self.templates.insert(name.to_string(), text.clone());
                Ok(Some(text))
            }
            Ok(_) => Ok(None),
            Err(e) => {
                warn!("partial resolver failed for '{}': {:#}", name, e);
                Err(e)
            }
        }
    }

    /// Recursively registers every `*.bnt` file under `dir`.
    /// `user/card.bnt` becomes the partial `user.card`.
    pub fn register_directory(&self, dir: &Path) -> Result<usize> {
        let mut count = 0;
        for entry in WalkDir::new(dir).into_iter().filter_map(|e| e.ok()) {
            let path = entry.path();
            if !path.is_file() || path.extension().is_none_or(|ext| ext != TEMPLATE_EXTENSION) {
                continue;
            }
            let relative = path
                .strip_prefix(dir)
                .with_context(|| format!("{} is outside {}", path.display(), dir.display()))?
                .with_extension("");
            let name = relative
                .components()
                .map(|c| c.as_os_str().to_string_lossy())
                .collect::<Vec<_>>()
                .join(".");
            let text = std::fs::read_to_string(path)
                .with_context(|| format!("failed to read partial: {}", path.display()))?;
            self.register(name, text);
            count += 1;
        }
        Ok(count)
    }
}

impl fmt::Debug for PartialRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PartialRegistry")
            .field("templates", &self.templates.len())
            .field("resolver", &self.resolver.is_some())
            .finish()
    }
}
