/// A dot-path followed by the pipes applied to it, left to right.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Accessor {
    /// Never empty.
    pub path: Vec<String>,
    pub pipes: Vec<String>,
}

impl Accessor {
    pub fn new(path: Vec<String>, pipes: Vec<String>) -> Self {
        debug_assert!(!path.is_empty());
        Self { path, pipes }
    }

    pub fn head(&self) -> &str {
        &self.path[0]
    }

    /// `user.name`, for diagnostics.
    pub fn dotted(&self) -> String {
        self.path.join(".")
    }
}

/// How a partial is named at the inclusion site.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PartialName {
    /// Registry key; dotted names are already flattened (`user.card`).
    Static(String),
    /// `{{> (expr) }}`: the name is computed at render time.
    Dynamic(Accessor),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AstNode {
    Text(String),
    Interpolation {
        expr: Accessor,
        escaped: bool,
    },
    If {
        condition: Accessor,
        then: Ast,
        otherwise: Option<Ast>,
    },
    Each {
        items: Accessor,
        item: String,
        index: Option<String>,
        body: Ast,
    },
    Partial {
        name: PartialName,
        /// Ordered as written; `None` when no `with` clause was given.
        params: Option<Vec<(String, Accessor)>>,
    },
}

pub type Ast = Vec<AstNode>;
