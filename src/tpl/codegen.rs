use std::collections::BTreeSet;
use std::fmt;

use crate::error::CompileError;
use crate::tpl::ast::{Accessor, Ast, AstNode, PartialName};
use crate::tpl::cache::CacheKey;
use crate::tpl::helpers::{ESCAPE_HELPER, standard_names};
use crate::tpl::parser::parse_template;
use crate::tpl::scope::Scope;

/// Whether an absent value is an error at this position.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Guard {
    /// Interpolations and dynamic partial names.
    Required,
    /// Conditions, loop sources and partial parameters.
    Optional,
}

/// Where an accessor's first segment was resolved at compile time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Base {
    /// A loop binding, by slot.
    Local(usize),
    /// A bare helper reference such as `{{now}}`.
    Helper(String),
    /// A top-level context key.
    Context(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Expr {
    pub base: Base,
    pub tail: Vec<String>,
    pub pipes: Vec<String>,
    pub guard: Guard,
    /// Source path, used in `MissingValue` errors.
    pub path: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IncludeName {
    Static(String),
    Dynamic(Expr),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Op {
    Text(String),
    Emit {
        expr: Expr,
        escape: bool,
    },
    Branch {
        cond: Expr,
        then: Vec<Op>,
        otherwise: Vec<Op>,
    },
    Loop {
        items: Expr,
        /// The loop also binds the element index after the element itself.
        index: bool,
        body: Vec<Op>,
    },
    Include {
        name: IncludeName,
        params: Vec<(String, Expr)>,
    },
}

/// A compiled, scope-resolved render program.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Program {
    pub ops: Vec<Op>,
}

/// The output of code generation for one template.
#[derive(Debug, Clone)]
pub struct Artifact {
    pub key: CacheKey,
    pub entry_point: String,
    pub program: Program,
}

#[derive(Debug, Clone, Default)]
pub struct GenerateOptions {
    /// Every helper name visible to the template (standard and custom).
    pub helper_names: BTreeSet<String>,
    pub entry_point: String,
}

#[derive(Debug, Clone, Default)]
pub struct CompileOptions {
    /// Names of caller-supplied helpers; their implementations are bound at render time.
    pub custom_helpers: Vec<String>,
}

impl CompileOptions {
    pub fn helper(mut self, name: impl Into<String>) -> Self {
        self.custom_helpers.push(name.into());
        self
    }
}

struct Generator<'o> {
    helper_names: &'o BTreeSet<String>,
}

impl Generator<'_> {
    fn block(&self, nodes: &[AstNode], scope: &Scope<'_>) -> Vec<Op> {
        nodes.iter().map(|node| self.node(node, scope)).collect()
    }

    fn node(&self, node: &AstNode, scope: &Scope<'_>) -> Op {
        match node {
            AstNode::Text(text) => Op::Text(text.clone()),
            AstNode::Interpolation { expr, escaped } => {
                let already_escaped = expr.pipes.last().is_some_and(|p| p == ESCAPE_HELPER);
                Op::Emit {
                    expr: self.expr(expr, scope, Guard::Required),
                    escape: *escaped && !already_escaped,
                }
            }
            AstNode::If {
                condition,
                then,
                otherwise,
            } => Op::Branch {
                cond: self.expr(condition, scope, Guard::Optional),
                then: self.block(then, scope),
                otherwise: otherwise
                    .as_deref()
                    .map(|nodes| self.block(nodes, scope))
                    .unwrap_or_default(),
            },
            AstNode::Each {
                items,
                item,
                index,
                body,
            } => {
                // The source expression is resolved outside the loop's own bindings.
                let items = self.expr(items, scope, Guard::Optional);
                let mut bindings = vec![item.clone()];
                bindings.extend(index.iter().cloned());
                let inner = scope.push(&bindings);
                Op::Loop {
                    items,
                    index: index.is_some(),
                    body: self.block(body, &inner),
                }
            }
            AstNode::Partial { name, params } => Op::Include {
                name: match name {
                    PartialName::Static(name) => IncludeName::Static(name.clone()),
                    PartialName::Dynamic(expr) => {
                        IncludeName::Dynamic(self.expr(expr, scope, Guard::Required))
                    }
                },
                params: params
                    .iter()
                    .flatten()
                    .map(|(key, expr)| (key.clone(), self.expr(expr, scope, Guard::Optional)))
                    .collect(),
            },
        }
    }

    fn expr(&self, accessor: &Accessor, scope: &Scope<'_>, guard: Guard) -> Expr {
        let head = accessor.head();
        let base = if let Some(slot) = scope.lookup(head) {
            Base::Local(slot)
        } else if accessor.path.len() == 1 && self.helper_names.contains(head) {
            Base::Helper(head.to_string())
        } else {
            Base::Context(head.to_string())
        };
        Expr {
            base,
            tail: accessor.path[1..].to_vec(),
            pipes: accessor.pipes.clone(),
            guard,
            path: accessor.dotted(),
        }
    }
}

/// Lowers an AST into a render program. Pure: the same inputs always
/// produce the same program.
pub fn generate(ast: &Ast, options: &GenerateOptions) -> Artifact {
    let generator = Generator {
        helper_names: &options.helper_names,
    };
    let program = Program {
        ops: generator.block(ast, &Scope::root()),
    };
    Artifact {
        key: CacheKey::default(),
        entry_point: options.entry_point.clone(),
        program,
    }
}

/// Tokenizes, parses and generates in one pass. No I/O.
pub fn compile(source: &str, options: &CompileOptions) -> Result<Artifact, CompileError> {
    let ast = parse_template(source)?;
    let key = CacheKey::derive(source, &options.custom_helpers);
    let mut helper_names = standard_names();
    helper_names.extend(options.custom_helpers.iter().cloned());
    let mut artifact = generate(
        &ast,
        &GenerateOptions {
            helper_names,
            entry_point: key.entry_point(),
        },
    );
    artifact.key = key;
    Ok(artifact)
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.base {
            Base::Local(slot) => write!(f, "${slot}")?,
            Base::Helper(name) => write!(f, "helper:{name}")?,
            Base::Context(key) => write!(f, "ctx.{key}")?,
        }
        for segment in &self.tail {
            write!(f, ".{segment}")?;
        }
        for pipe in &self.pipes {
            write!(f, " |> {pipe}")?;
        }
        if self.guard == Guard::Optional {
            f.write_str(" ?")?;
        }
        Ok(())
    }
}

fn write_ops(f: &mut fmt::Formatter<'_>, ops: &[Op], depth: usize) -> fmt::Result {
    let pad = "  ".repeat(depth);
    for op in ops {
        match op {
            Op::Text(text) => writeln!(f, "{pad}text {text:?}")?,
            Op::Emit { expr, escape } => {
                let mode = if *escape { "escape" } else { "raw" };
                writeln!(f, "{pad}emit {mode} {expr}")?;
            }
            Op::Branch {
                cond,
                then,
                otherwise,
            } => {
                writeln!(f, "{pad}if {cond}")?;
                write_ops(f, then, depth + 1)?;
                if !otherwise.is_empty() {
                    writeln!(f, "{pad}else")?;
                    write_ops(f, otherwise, depth + 1)?;
                }
                writeln!(f, "{pad}end")?;
            }
            Op::Loop { items, index, body } => {
                let binds = if *index { "item, index" } else { "item" };
                writeln!(f, "{pad}each {items} as {binds}")?;
                write_ops(f, body, depth + 1)?;
                writeln!(f, "{pad}end")?;
            }
            Op::Include { name, params } => {
                match name {
                    IncludeName::Static(name) => write!(f, "{pad}include {name:?}")?,
                    IncludeName::Dynamic(expr) => write!(f, "{pad}include ({expr})")?,
                }
                for (i, (key, expr)) in params.iter().enumerate() {
                    let sep = if i == 0 { " with " } else { ", " };
                    write!(f, "{sep}{key}={expr}")?;
                }
                writeln!(f)?;
            }
        }
    }
    Ok(())
}

impl fmt::Display for Program {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write_ops(f, &self.ops, 0)
    }
}
