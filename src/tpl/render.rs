use std::sync::{Arc, LazyLock};

use futures::future::{BoxFuture, FutureExt};
use tracing::trace;

use crate::error::RenderError;
use crate::tpl::cache::ArtifactCache;
use crate::tpl::codegen::{Artifact, Base, CompileOptions, Expr, Guard, IncludeName, Op, compile};
use crate::tpl::helpers::{ESCAPE_HELPER, HelperTable};
use crate::tpl::partials::PartialRegistry;
use crate::tpl::render_context::Frame;
use crate::value::Value;

pub const DEFAULT_MAX_PARTIAL_DEPTH: usize = 32;

static STANDARD_HELPERS: LazyLock<HelperTable> = LazyLock::new(HelperTable::standard);

/// Executes compiled programs against a context.
pub struct Renderer<'r> {
    helpers: &'r HelperTable,
    custom_helpers: Vec<String>,
    partials: Option<&'r PartialRegistry>,
    cache: Option<&'r ArtifactCache>,
    max_partial_depth: usize,
}

impl<'r> Renderer<'r> {
    pub fn new(helpers: &'r HelperTable) -> Self {
        Self {
            helpers,
            custom_helpers: helpers.custom_names(),
            partials: None,
            cache: None,
            max_partial_depth: DEFAULT_MAX_PARTIAL_DEPTH,
        }
    }

    pub fn partials(mut self, partials: Option<&'r PartialRegistry>) -> Self {
        self.partials = partials;
        self
    }

    /// Partial bodies are compiled through `cache` instead of on every inclusion.
    pub fn cache(mut self, cache: &'r ArtifactCache) -> Self {
        self.cache = Some(cache);
        self
    }

    pub fn max_partial_depth(mut self, depth: usize) -> Self {
        self.max_partial_depth = depth;
        self
    }

    pub async fn render(&self, artifact: &Artifact, ctx: &Value) -> Result<String, RenderError> {
        let mut out = String::new();
        let mut frame = Frame::new(ctx);
        self.exec(&artifact.program.ops, &mut frame, &mut out).await?;
        Ok(out)
    }

    fn exec<'a, 'v: 'a>(
        &'a self,
        ops: &'a [Op],
        frame: &'a mut Frame<'v>,
        out: &'a mut String,
    ) -> BoxFuture<'a, Result<(), RenderError>> {
        async move {
            for op in ops {
                match op {
                    Op::Text(text) => out.push_str(text),
                    Op::Emit { expr, escape } => {
                        let mut value = self.eval(expr, frame)?;
                        if *escape {
                            value = self.helpers.call(ESCAPE_HELPER, &[value])?;
                        }
                        out.push_str(&value.to_string());
                    }
                    Op::Branch {
                        cond,
                        then,
                        otherwise,
                    } => {
                        let branch = if self.eval(cond, frame)?.is_truthy() {
                            then
                        } else {
                            otherwise
                        };
                        self.exec(branch, frame, out).await?;
                    }
                    Op::Loop { items, index, body } => {
                        let items_value = self.eval(items, frame)?;
                        let list = match items_value {
                            Value::Null => continue,
                            Value::List(list) => list,
                            other => {
                                return Err(RenderError::NonIterableEach {
                                    path: items.path.clone(),
                                    found: other.type_name(),
                                });
                            }
                        };
                        for (i, item) in list.into_iter().enumerate() {
                            frame.push(item);
                            if *index {
                                frame.push(Value::I64(i as i64));
                            }
                            let result = self.exec(body, frame, out).await;
                            if *index {
                                frame.pop();
                            }
                            frame.pop();
                            result?;
                        }
                    }
                    Op::Include { name, params } => {
                        self.include(name, params, frame, out).await?;
                    }
                }
            }
            Ok(())
        }
        .boxed()
    }

    async fn include(
        &self,
        name: &IncludeName,
        params: &[(String, Expr)],
        frame: &mut Frame<'_>,
        out: &mut String,
    ) -> Result<(), RenderError> {
        let name = match name {
            IncludeName::Static(name) => name.clone(),
            IncludeName::Dynamic(expr) => match self.eval(expr, frame)? {
                Value::Str(s) => s,
                other => other.to_string(),
            },
        };

        let depth = frame.depth() + 1;
        if depth > self.max_partial_depth {
            return Err(RenderError::PartialDepthExceeded {
                name,
                depth: self.max_partial_depth,
            });
        }

        let registry = self
            .partials
            .ok_or_else(|| RenderError::PartialNotFound(name.clone()))?;
        let text = registry
            .resolve(&name)
            .await
            .map_err(|e| RenderError::PartialResolve {
                name: name.clone(),
                message: format!("{e:#}"),
            })?
            .ok_or_else(|| RenderError::PartialNotFound(name.clone()))?;

        let compiled = match self.cache {
            Some(cache) => cache.get_or_compile(&text, &self.custom_helpers),
            None => compile(
                &text,
                &CompileOptions {
                    custom_helpers: self.custom_helpers.clone(),
                },
            )
            .map(Arc::new),
        };
        let artifact = compiled.map_err(|source| RenderError::PartialCompile {
            name: name.clone(),
            source,
        })?;

        let mut values = Vec::with_capacity(params.len());
        for (key, expr) in params {
            values.push((key.clone(), self.eval(expr, frame)?));
        }
        let context = frame.partial_context(values);

        trace!("including partial '{}' at depth {}", name, depth);
        let mut child = Frame::nested(&context, depth);
        self.exec(&artifact.program.ops, &mut child, out).await
    }

    fn eval(&self, expr: &Expr, frame: &Frame<'_>) -> Result<Value, RenderError> {
        let found = match &expr.base {
            Base::Local(slot) => frame.local(*slot, &expr.tail).cloned(),
            Base::Context(key) => frame.context(key, &expr.tail).cloned(),
            // In an unguarded position a bare helper only tests for presence.
            Base::Helper(name) if expr.guard == Guard::Optional && expr.pipes.is_empty() => {
                if !self.helpers.contains(name) {
                    return Err(RenderError::UnknownHelper(name.clone()));
                }
                return Ok(Value::Bool(true));
            }
            Base::Helper(name) => Some(self.helpers.call(name, &[])?),
        };

        let mut value = match found {
            Some(v) if !v.is_null() => v,
            _ => {
                if let Some(pipe) = expr.pipes.iter().find(|p| !self.helpers.contains(p)) {
                    return Err(RenderError::UnknownHelper(pipe.clone()));
                }
                return match expr.guard {
                    Guard::Required => Err(RenderError::MissingValue(expr.path.clone())),
                    Guard::Optional => Ok(Value::Null),
                };
            }
        };
        for pipe in &expr.pipes {
            value = self.helpers.call(pipe, &[value])?;
        }
        if expr.guard == Guard::Required && value.is_null() {
            return Err(RenderError::MissingValue(expr.path.clone()));
        }
        Ok(value)
    }
}

impl Artifact {
    /// Renders this artifact. `helpers` defaults to the standard table; it
    /// must carry every custom helper the artifact was compiled against.
    pub async fn call(
        &self,
        ctx: &Value,
        helpers: Option<&HelperTable>,
        partials: Option<&PartialRegistry>,
    ) -> Result<String, RenderError> {
        Renderer::new(helpers.unwrap_or_else(|| &*STANDARD_HELPERS))
            .partials(partials)
            .render(self, ctx)
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::HelperError;
    use crate::tpl::helpers::Helper;
    use crate::value::to_value;
    use serde_json::json;

    async fn run(src: &str, ctx: serde_json::Value) -> Result<String, RenderError> {
        let artifact = compile(src, &CompileOptions::default()).unwrap();
        artifact.call(&to_value(&ctx).unwrap(), None, None).await
    }

    #[tokio::test]
    async fn test_interpolation_is_escaped() {
        let out = run("<p>{{body}}</p>", json!({"body": "<b>\"hi\" & 'bye'</b>"}))
            .await
            .unwrap();
        assert_eq!(
            out,
            "<p>&lt;b&gt;&quot;hi&quot; &amp; &#39;bye&#39;&lt;/b&gt;</p>"
        );
    }

    #[tokio::test]
    async fn test_raw_interpolation() {
        let out = run("{{& body}}", json!({"body": "<b>x</b>"})).await.unwrap();
        assert_eq!(out, "<b>x</b>");
    }

    #[tokio::test]
    async fn test_explicit_escape_is_not_doubled() {
        let out = run("{{ body |> escapeHtml }}", json!({"body": "a&b"}))
            .await
            .unwrap();
        assert_eq!(out, "a&amp;b");
    }

    #[tokio::test]
    async fn test_missing_value_is_reported_by_path() {
        let err = run("{{user.name}}", json!({"user": {}})).await.unwrap_err();
        assert_eq!(err, RenderError::MissingValue("user.name".into()));

        let err = run("{{name}}", json!({"name": null})).await.unwrap_err();
        assert_eq!(err, RenderError::MissingValue("name".into()));
    }

    #[tokio::test]
    async fn test_falsy_values_still_render() {
        let out = run("{{n}}|{{flag}}|{{s}}", json!({"n": 0, "flag": false, "s": ""}))
            .await
            .unwrap();
        assert_eq!(out, "0|false|");
    }

    #[tokio::test]
    async fn test_truthiness() {
        let tpl = "{{#if v}}yes{{else}}no{{/if}}";
        for (v, expected) in [
            (json!(null), "no"),
            (json!(0), "no"),
            (json!(""), "no"),
            (json!(false), "no"),
            (json!(1), "yes"),
            (json!("x"), "yes"),
            (json!([]), "yes"),
            (json!({}), "yes"),
        ] {
            assert_eq!(run(tpl, json!({"v": v})).await.unwrap(), expected);
        }
        assert_eq!(run(tpl, json!({})).await.unwrap(), "no");
    }

    #[tokio::test]
    async fn test_each_over_absent_or_scalar() {
        let tpl = "{{#each items as |x|}}{{x}}{{/each}}";
        assert_eq!(run(tpl, json!({})).await.unwrap(), "");
        let err = run(tpl, json!({"items": "abc"})).await.unwrap_err();
        assert_eq!(
            err,
            RenderError::NonIterableEach {
                path: "items".into(),
                found: "string"
            }
        );
    }

    #[tokio::test]
    async fn test_nested_each_shadowing() {
        let tpl = "{{#each rows as |r, i|}}[{{#each r as |r|}}{{i}}{{r}}{{/each}}]{{/each}}";
        let out = run(tpl, json!({"rows": [["a", "b"], ["c"]]})).await.unwrap();
        assert_eq!(out, "[0a0b][1c]");
    }

    #[tokio::test]
    async fn test_unknown_helper() {
        let err = run("{{ name |> shout }}", json!({"name": "x"})).await.unwrap_err();
        assert_eq!(err, RenderError::UnknownHelper("shout".into()));
    }

    #[tokio::test]
    async fn test_unknown_pipe_fails_regardless_of_data() {
        let tpl = "{{#if flag |> nope}}x{{/if}}";
        for data in [json!({}), json!({"flag": true})] {
            let err = run(tpl, data).await.unwrap_err();
            assert_eq!(err, RenderError::UnknownHelper("nope".into()));
        }

        let err = run("{{#each xs |> nope as |x|}}{{x}}{{/each}}", json!({}))
            .await
            .unwrap_err();
        assert_eq!(err, RenderError::UnknownHelper("nope".into()));

        // known pipes over an absent value stay silent
        let out = run("{{#if flag |> upper}}x{{else}}y{{/if}}", json!({})).await.unwrap();
        assert_eq!(out, "y");
    }

    #[tokio::test]
    async fn test_helper_name_as_condition() {
        let out = run("{{#if upper}}x{{else}}y{{/if}}", json!({})).await.unwrap();
        assert_eq!(out, "x");
    }

    #[tokio::test]
    async fn test_custom_and_zero_argument_helpers() {
        let mut helpers = HelperTable::standard();
        helpers.insert(
            "shout",
            Helper::new(|args: &[Value]| match args {
                [v] => Ok(Value::Str(format!("{}!", v))),
                _ => Err(HelperError::Arity {
                    expected: 1,
                    got: args.len(),
                }),
            }),
        );
        helpers.insert("now", Helper::new(|_: &[Value]| Ok(Value::Str("noon".into()))));

        let options = CompileOptions::default().helper("shout").helper("now");
        let artifact = compile("{{ name |> shout }} at {{now}}", &options).unwrap();
        let ctx = to_value(&json!({"name": "hey"})).unwrap();
        let out = artifact.call(&ctx, Some(&helpers), None).await.unwrap();
        assert_eq!(out, "hey! at noon");
    }

    #[tokio::test]
    async fn test_helper_failure_is_attributed() {
        let err = run("{{ when |> date }}", json!({"when": "not a date"}))
            .await
            .unwrap_err();
        assert!(matches!(err, RenderError::Helper { ref name, .. } if name == "date"));
    }

    #[tokio::test]
    async fn test_partial_without_registry() {
        let err = run("{{> footer}}", json!({})).await.unwrap_err();
        assert_eq!(err, RenderError::PartialNotFound("footer".into()));
    }

    #[tokio::test]
    async fn test_partial_params_and_depth() {
        let partials = PartialRegistry::from_map([
            ("card", "<{{title}}:{{user.name}}>"),
            ("loop", "{{> loop}}"),
        ]);
        let helpers = HelperTable::standard();
        let ctx = to_value(&json!({"title": "T", "people": [{"name": "A"}, {"name": "B"}]})).unwrap();

        let artifact = compile(
            "{{#each people as |p|}}{{#partial card with user=p}}{{/each}}",
            &CompileOptions::default(),
        )
        .unwrap();
        let out = artifact.call(&ctx, Some(&helpers), Some(&partials)).await.unwrap();
        assert_eq!(out, "<T:A><T:B>");

        let recursive = compile("{{> loop}}", &CompileOptions::default()).unwrap();
        let err = Renderer::new(&helpers)
            .partials(Some(&partials))
            .max_partial_depth(4)
            .render(&recursive, &ctx)
            .await
            .unwrap_err();
        assert_eq!(
            err,
            RenderError::PartialDepthExceeded {
                name: "loop".into(),
                depth: 4
            }
        );
    }

    #[tokio::test]
    async fn test_partial_compile_error_names_partial() {
        let partials = PartialRegistry::from_map([("bad", "{{#if x}}")]);
        let artifact = compile("{{> bad}}", &CompileOptions::default()).unwrap();
        let err = artifact
            .call(&Value::Null, None, Some(&partials))
            .await
            .unwrap_err();
        assert!(matches!(err, RenderError::PartialCompile { ref name, .. } if name == "bad"));
    }

    #[tokio::test]
    async fn test_partials_share_the_cache() {
        let cache = ArtifactCache::default();
        let partials = PartialRegistry::from_map([("world", "World")]);
        let helpers = HelperTable::standard();
        let artifact = compile("Hello {{> world}}", &CompileOptions::default()).unwrap();

        let renderer = Renderer::new(&helpers).partials(Some(&partials)).cache(&cache);
        assert_eq!(renderer.render(&artifact, &Value::Null).await.unwrap(), "Hello World");
        assert_eq!(cache.len(), 1);
        assert_eq!(renderer.render(&artifact, &Value::Null).await.unwrap(), "Hello World");
        assert_eq!(cache.len(), 1);
    }
}
