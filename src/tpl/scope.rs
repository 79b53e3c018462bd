/// Loop bindings visible at a point of compilation.
///
/// Each `#each` body is compiled against a child scope; the parent is never
/// mutated, so leaving the body is simply dropping the child. A binding's slot
/// is its position in the flattened stack, which matches the order the
/// renderer pushes loop values.
#[derive(Debug, Clone, Copy)]
pub struct Scope<'a> {
    bindings: &'a [String],
    parent: Option<&'a Scope<'a>>,
    base: usize,
}

impl<'a> Scope<'a> {
    pub fn root() -> Scope<'static> {
        Scope {
            bindings: &[],
            parent: None,
            base: 0,
        }
    }

    pub fn push<'b>(&'b self, bindings: &'b [String]) -> Scope<'b>
    where
        'a: 'b,
    {
        Scope {
            bindings,
            parent: Some(self),
            base: self.depth(),
        }
    }

    /// Number of slots bound so far.
    pub fn depth(&self) -> usize {
        self.base + self.bindings.len()
    }

    /// Slot of the innermost binding named `name`.
    pub fn lookup(&self, name: &str) -> Option<usize> {
        let mut scope = Some(self);
        while let Some(s) = scope {
            if let Some(i) = s.bindings.iter().rposition(|b| b == name) {
                return Some(s.base + i);
            }
            scope = s.parent;
        }
        None
    }
}
