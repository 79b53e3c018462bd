use async_trait::async_trait;
use serde_json::json;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use stencil::{
    DirectoryResolver, Engine, Error, PartialRegistry, PartialResolver, RenderError,
    RenderOptions, to_value,
};

struct SlowResolver {
    calls: AtomicUsize,
}

#[async_trait]
impl PartialResolver for SlowResolver {
    async fn resolve(&self, name: &str) -> anyhow::Result<Option<String>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(5)).await;
        Ok(match name {
            "greeting" => Some("Hi {{who}}".to_string()),
            "broken" => anyhow::bail!("store offline"),
            _ => None,
        })
    }
}

#[tokio::test]
async fn test_async_resolver_is_awaited_and_memoized() {
    let resolver = SlowResolver {
        calls: AtomicUsize::new(0),
    };
    let registry = Arc::new(PartialRegistry::new().with_resolver(resolver));
    let opts = RenderOptions::new().partials(registry.clone());
    let engine = Engine::new();
    let data = to_value(&json!({"who": "there"})).unwrap();

    for _ in 0..3 {
        let out = engine.render("[{{> greeting}}]", &data, &opts).await.unwrap();
        assert_eq!(out, "[Hi there]");
    }
    assert!(registry.contains("greeting"));
}

#[tokio::test]
async fn test_resolver_failure_is_a_render_error() {
    let registry = Arc::new(PartialRegistry::new().with_resolver(SlowResolver {
        calls: AtomicUsize::new(0),
    }));
    let opts = RenderOptions::new().partials(registry);
    let err = Engine::new()
        .render("{{> broken}}", &to_value(&json!({})).unwrap(), &opts)
        .await
        .unwrap_err();
    match err {
        Error::Render(RenderError::PartialResolve { name, message }) => {
            assert_eq!(name, "broken");
            assert!(message.contains("store offline"));
        }
        other => panic!("unexpected error: {other:?}"),
    }
}

#[tokio::test]
async fn test_registered_directory() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::create_dir_all(dir.path().join("user")).unwrap();
    std::fs::write(dir.path().join("user/card.bnt"), "User: {{user.name}}").unwrap();
    std::fs::write(dir.path().join("footer.bnt"), "Copyright 2025").unwrap();

    let registry = PartialRegistry::new();
    assert_eq!(registry.register_directory(dir.path()).unwrap(), 2);
    let opts = RenderOptions::new().partials(Arc::new(registry));

    let data = to_value(&json!({"people": [{"name": "Alice"}]})).unwrap();
    let out = Engine::new()
        .render(
            "{{#each people as |p|}}{{#partial user.card with user=p}}; {{/each}}{{> footer}}",
            &data,
            &opts,
        )
        .await
        .unwrap();
    assert_eq!(out, "User: Alice; Copyright 2025");
}

#[tokio::test]
async fn test_directory_resolver_loads_on_demand() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::create_dir_all(dir.path().join("mail")).unwrap();
    std::fs::write(dir.path().join("mail/sign.bnt"), "-- {{& sender}}").unwrap();

    let registry = Arc::new(PartialRegistry::new().with_resolver(DirectoryResolver::new(dir.path())));
    let opts = RenderOptions::new().partials(registry.clone());
    let data = to_value(&json!({"sender": "<ops>"})).unwrap();

    let out = Engine::new()
        .render("Thanks\n{{> mail.sign}}", &data, &opts)
        .await
        .unwrap();
    assert_eq!(out, "Thanks\n-- <ops>");
    assert!(registry.contains("mail.sign"));
}

#[tokio::test]
async fn test_partial_sees_custom_helpers() {
    let registry = Arc::new(PartialRegistry::from_map([("shouty", "{{ word |> shout }}")]));
    let opts = RenderOptions::new()
        .helper("shout", |args: &[stencil::Value]| {
            Ok(stencil::Value::Str(format!(
                "{}!",
                args.first().cloned().unwrap_or_default()
            )))
        })
        .partials(registry);
    let out = Engine::new()
        .render("{{> shouty}}", &to_value(&json!({"word": "hey"})).unwrap(), &opts)
        .await
        .unwrap();
    assert_eq!(out, "hey!");
}
