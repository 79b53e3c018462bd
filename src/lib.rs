pub mod error;
pub mod models;
pub mod tpl;
pub mod value;

pub use error::{CompileError, Error, HelperError, ParseError, RenderError, TokenizeError};
pub use models::engine_options::EngineOptions;
pub use models::render_options::RenderOptions;
pub use tpl::ast::{Accessor, Ast, AstNode, PartialName};
pub use tpl::cache::{ArtifactCache, CacheKey};
pub use tpl::codegen::{Artifact, CompileOptions, GenerateOptions, Program, compile, generate};
pub use tpl::engine::{Engine, engine, render};
pub use tpl::helpers::{Helper, HelperTable};
pub use tpl::parser::{parse, parse_template};
pub use tpl::partials::{DirectoryResolver, FnResolver, PartialRegistry, PartialResolver};
pub use tpl::token::{Token, TokenKind};
pub use tpl::tokenizer::tokenize;
pub use value::{Value, to_value};
