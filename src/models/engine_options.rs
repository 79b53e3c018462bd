use crate::tpl::cache::DEFAULT_CAPACITY;
use crate::tpl::render::DEFAULT_MAX_PARTIAL_DEPTH;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EngineOptions {
    pub cache_capacity: usize,    // max compiled artifacts kept; 0 is treated as 1
    pub max_partial_depth: usize, // max nested partial inclusions
}

impl Default for EngineOptions {
    fn default() -> Self {
        EngineOptions {
            cache_capacity: DEFAULT_CAPACITY,
            max_partial_depth: DEFAULT_MAX_PARTIAL_DEPTH,
        }
    }
}

impl EngineOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cache_capacity(mut self, cache_capacity: usize) -> Self {
        self.cache_capacity = cache_capacity.max(1);
        self
    }

    pub fn max_partial_depth(mut self, max_partial_depth: usize) -> Self {
        self.max_partial_depth = max_partial_depth;
        self
    }
}
