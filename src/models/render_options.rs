use std::sync::Arc;

use crate::error::HelperError;
use crate::tpl::helpers::{Helper, HelperTable};
use crate::tpl::partials::PartialRegistry;
use crate::value::Value;

/// Per-render inputs: custom helpers and where partials come from.
#[derive(Debug, Clone)]
pub struct RenderOptions {
    pub helpers: HelperTable,
    pub partials: Option<Arc<PartialRegistry>>,
}

impl Default for RenderOptions {
    fn default() -> Self {
        RenderOptions {
            helpers: HelperTable::standard(),
            partials: None,
        }
    }
}

impl RenderOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn helper<F>(mut self, name: impl Into<String>, f: F) -> Self
    where
        F: Fn(&[Value]) -> Result<Value, HelperError> + Send + Sync + 'static,
    {
        self.helpers.insert(name, Helper::new(f));
        self
    }

    pub fn helpers<I>(mut self, helpers: I) -> Self
    where
        I: IntoIterator<Item = (String, Helper)>,
    {
        for (name, helper) in helpers {
            self.helpers.insert(name, helper);
        }
        self
    }

    pub fn partials(mut self, partials: Arc<PartialRegistry>) -> Self {
        self.partials = Some(partials);
        self
    }

    /// Names that take part in the cache key.
    pub fn custom_helper_names(&self) -> Vec<String> {
        self.helpers.custom_names()
    }
}
