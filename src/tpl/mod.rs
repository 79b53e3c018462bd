pub mod ast;
pub mod cache;
pub mod codegen;
pub mod engine;
pub mod helpers;
pub mod parser;
pub mod partials;
pub mod render;
mod render_context;
mod scope;
pub mod token;
pub mod tokenizer;
