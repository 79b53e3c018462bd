use serde::Serialize;
use std::sync::Arc;
use stencil::{CompileOptions, Engine, FnResolver, PartialRegistry, RenderOptions, Value, compile};
use tracing_subscriber::{EnvFilter, fmt};

const PAGE: &str = "<h1>{{ title |> upper }}</h1>
{{#each users as |u, i|}}{{i}}. {{#partial user.card with user=u}}
{{/each}}{{#if footer}}{{> footer}}{{else}}-{{/if}}
";

#[derive(Serialize, Debug)]
struct User<'a> {
    name: &'a str,
    bio: &'a str,
}

#[derive(Serialize, Debug)]
struct Page<'a> {
    title: &'a str,
    users: Vec<User<'a>>,
    footer: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("debug")))
        .init();

    let partials = PartialRegistry::new().with_resolver(FnResolver(|name: &str| match name {
        "footer" => Some("<small>{{ year }}</small>".to_string()),
        _ => None,
    }));
    partials.register("user.card", "<b>{{ user.name |> shout }}</b> {{ user.bio |> truncate }}");

    let options = RenderOptions::new()
        .helper("shout", |args: &[Value]| {
            let text = args.first().map(|v| v.to_string()).unwrap_or_default();
            Ok(Value::Str(format!("{}!", text)))
        })
        .helper("year", |_: &[Value]| Ok(Value::I64(2025)))
        .partials(Arc::new(partials));

    let page = Page {
        title: "Members",
        users: vec![
            User {
                name: "Alice",
                bio: "Writes compilers for fun and occasionally for profit.",
            },
            User {
                name: "Bob",
                bio: "<script>alert(1)</script>",
            },
        ],
        footer: true,
    };

    let listing = compile(PAGE, &CompileOptions::default().helper("shout").helper("year"))?;
    println!("{}:\n{}", listing.entry_point, listing.program);

    let engine = Engine::new();
    let html = engine.render_serialize(PAGE, &page, &options).await?;
    println!("{}", html);
    Ok(())
}
