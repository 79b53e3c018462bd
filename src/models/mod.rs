pub mod engine_options;
pub mod render_options;
