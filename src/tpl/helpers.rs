use chrono::format::{Item, StrftimeItems};
use chrono::{DateTime, Locale, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use std::collections::{BTreeSet, HashMap};
use std::fmt::{self, Write};
use std::sync::Arc;

use crate::error::{HelperError, RenderError};
use crate::value::Value;

/// Name of the helper applied to escaped interpolations.
pub const ESCAPE_HELPER: &str = "escapeHtml";

const STANDARD_NAMES: [&str; 7] = [
    "upper",
    "lower",
    "capitalize",
    "truncate",
    "json",
    "date",
    ESCAPE_HELPER,
];

const DEFAULT_TRUNCATE_LENGTH: usize = 20;
const ELLIPSIS: &str = "...";
const DEFAULT_DATE_PATTERN: &str = "%-m/%-d/%Y";
const LOCALE_DATE_PATTERN: &str = "%x";

pub type HelperFn = dyn Fn(&[Value]) -> Result<Value, HelperError> + Send + Sync;

/// A named transform callable from templates.
#[derive(Clone)]
pub struct Helper(Arc<HelperFn>);

impl Helper {
    pub fn new<F>(f: F) -> Self
    where
        F: Fn(&[Value]) -> Result<Value, HelperError> + Send + Sync + 'static,
    {
        Helper(Arc::new(f))
    }

    pub fn call(&self, args: &[Value]) -> Result<Value, HelperError> {
        (self.0)(args)
    }
}

impl fmt::Debug for Helper {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Helper(..)")
    }
}

/// Standard helpers merged with caller-supplied ones; custom entries win.
#[derive(Debug, Clone, Default)]
pub struct HelperTable {
    entries: HashMap<String, Helper>,
    custom: BTreeSet<String>,
}

impl HelperTable {
    pub fn standard() -> Self {
        let mut entries = HashMap::with_capacity(STANDARD_NAMES.len());
        entries.insert("upper".to_string(), Helper::new(upper));
        entries.insert("lower".to_string(), Helper::new(lower));
        entries.insert("capitalize".to_string(), Helper::new(capitalize));
        entries.insert("truncate".to_string(), Helper::new(truncate));
        entries.insert("json".to_string(), Helper::new(json));
        entries.insert("date".to_string(), Helper::new(date));
        entries.insert(ESCAPE_HELPER.to_string(), Helper::new(escape));
        Self {
            entries,
            custom: BTreeSet::new(),
        }
    }

    pub fn with_custom<I>(custom: I) -> Self
    where
        I: IntoIterator<Item = (String, Helper)>,
    {
        let mut table = Self::standard();
        for (name, helper) in custom {
            table.insert(name, helper);
        }
        table
    }

    /// Adds or overrides a helper; the name counts as custom.
    pub fn insert(&mut self, name: impl Into<String>, helper: Helper) {
        let name = name.into();
        self.custom.insert(name.clone());
        self.entries.insert(name, helper);
    }

    pub fn get(&self, name: &str) -> Option<&Helper> {
        self.entries.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    pub fn call(&self, name: &str, args: &[Value]) -> Result<Value, RenderError> {
        let helper = self
            .get(name)
            .ok_or_else(|| RenderError::UnknownHelper(name.to_string()))?;
        helper.call(args).map_err(|source| RenderError::Helper {
            name: name.to_string(),
            source,
        })
    }

    pub fn names(&self) -> BTreeSet<String> {
        self.entries.keys().cloned().collect()
    }

    /// Sorted names of the caller-supplied helpers.
    pub fn custom_names(&self) -> Vec<String> {
        self.custom.iter().cloned().collect()
    }
}

pub fn standard_names() -> BTreeSet<String> {
    STANDARD_NAMES.iter().map(|s| s.to_string()).collect()
}

fn first(args: &[Value]) -> Result<&Value, HelperError> {
    args.first().ok_or(HelperError::Arity {
        expected: 1,
        got: args.len(),
    })
}

fn upper(args: &[Value]) -> Result<Value, HelperError> {
    Ok(Value::Str(first(args)?.to_string().to_uppercase()))
}

fn lower(args: &[Value]) -> Result<Value, HelperError> {
    Ok(Value::Str(first(args)?.to_string().to_lowercase()))
}

fn capitalize(args: &[Value]) -> Result<Value, HelperError> {
    let text = first(args)?.to_string();
    let mut chars = text.chars();
    Ok(Value::Str(match chars.next() {
        Some(c) => c.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }))
}

fn truncate(args: &[Value]) -> Result<Value, HelperError> {
    let text = first(args)?.to_string();
    let length = match args.get(1) {
        None | Some(Value::Null) => DEFAULT_TRUNCATE_LENGTH,
        Some(Value::I64(n)) if *n >= 0 => *n as usize,
        Some(Value::F64(n)) if *n >= 0.0 => *n as usize,
        Some(Value::Str(s)) => s
            .trim()
            .parse()
            .map_err(|_| HelperError::InvalidArgument(format!("truncate length `{s}`")))?,
        Some(other) => {
            return Err(HelperError::InvalidArgument(format!(
                "truncate length must be a non-negative number, got {}",
                other.type_name()
            )));
        }
    };
    if text.chars().count() <= length {
        return Ok(Value::Str(text));
    }
    let mut out: String = text.chars().take(length).collect();
    out.push_str(ELLIPSIS);
    Ok(Value::Str(out))
}

fn json(args: &[Value]) -> Result<Value, HelperError> {
    serde_json::to_string(first(args)?)
        .map(Value::Str)
        .map_err(|e| HelperError::Custom(e.to_string()))
}

fn escape(args: &[Value]) -> Result<Value, HelperError> {
    Ok(Value::Str(escape_html(&first(args)?.to_string())))
}

/// Escapes markup characters with named references, and control characters
/// and non-ASCII code points with decimal numeric references.
pub fn escape_html(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for c in input.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            '\t' | '\n' | '\r' => out.push(c),
            c if c.is_control() || !c.is_ascii() => {
                out.push_str(&format!("&#{};", c as u32));
            }
            c => out.push(c),
        }
    }
    out
}

fn date(args: &[Value]) -> Result<Value, HelperError> {
    let when = coerce_datetime(first(args)?)?;
    let locale = match args.get(1) {
        None | Some(Value::Null) => None,
        Some(Value::Str(name)) => Some(
            Locale::try_from(name.replace('-', "_").as_str())
                .map_err(|_| HelperError::InvalidArgument(format!("unknown locale `{name}`")))?,
        ),
        Some(other) => {
            return Err(HelperError::InvalidArgument(format!(
                "locale must be a string, got {}",
                other.type_name()
            )));
        }
    };
    let pattern = match args.get(2) {
        None | Some(Value::Null) if locale.is_some() => LOCALE_DATE_PATTERN,
        None | Some(Value::Null) => DEFAULT_DATE_PATTERN,
        Some(Value::Str(p)) => p.as_str(),
        Some(other) => {
            return Err(HelperError::InvalidArgument(format!(
                "date pattern must be a string, got {}",
                other.type_name()
            )));
        }
    };
    if StrftimeItems::new(pattern).any(|item| matches!(item, Item::Error)) {
        return Err(HelperError::InvalidArgument(format!(
            "invalid date pattern `{pattern}`"
        )));
    }

    let mut out = String::new();
    let written = match locale {
        Some(locale) => write!(out, "{}", when.format_localized(pattern, locale)),
        None => write!(out, "{}", when.format(pattern)),
    };
    written.map_err(|_| HelperError::InvalidArgument(format!("cannot format date with `{pattern}`")))?;
    Ok(Value::Str(out))
}

fn coerce_datetime(value: &Value) -> Result<DateTime<Utc>, HelperError> {
    let parsed = match value {
        Value::DateTimeUtc(dt) => Some(*dt),
        Value::DateTime(ndt) => Some(ndt.and_utc()),
        Value::Date(d) => Some(d.and_time(NaiveTime::MIN).and_utc()),
        Value::I64(ms) => DateTime::from_timestamp_millis(*ms),
        Value::F64(ms) if ms.is_finite() => DateTime::from_timestamp_millis(*ms as i64),
        Value::Str(s) => parse_date_str(s.trim()),
        _ => None,
    };
    parsed.ok_or_else(|| {
        HelperError::InvalidArgument(format!("cannot interpret `{value}` as a date"))
    })
}

fn parse_date_str(s: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }
    for pattern in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"] {
        if let Ok(ndt) = NaiveDateTime::parse_from_str(s, pattern) {
            return Some(ndt.and_utc());
        }
    }
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .ok()
        .map(|d| d.and_time(NaiveTime::MIN).and_utc())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn call(name: &str, args: &[Value]) -> Result<Value, RenderError> {
        HelperTable::standard().call(name, args)
    }

    fn text(name: &str, args: &[Value]) -> String {
        match call(name, args).unwrap() {
            Value::Str(s) => s,
            other => panic!("expected string, got {other:?}"),
        }
    }

    #[test]
    fn test_case_helpers() {
        assert_eq!(text("upper", &["cline".into()]), "CLINE");
        assert_eq!(text("lower", &["CLINE".into()]), "cline");
        assert_eq!(text("capitalize", &["cline".into()]), "Cline");
        assert_eq!(text("capitalize", &["".into()]), "");
        assert_eq!(text("upper", &[Value::I64(5)]), "5");
    }

    #[test]
    fn test_truncate() {
        assert_eq!(text("truncate", &["short".into()]), "short");
        assert_eq!(
            text("truncate", &["abcdefghijklmnopqrstuvwxyz".into()]),
            "abcdefghijklmnopqrst..."
        );
        assert_eq!(text("truncate", &["héllo wörld".into(), Value::I64(5)]), "héllo...");
        assert!(matches!(
            call("truncate", &["x".into(), Value::Bool(true)]),
            Err(RenderError::Helper { .. })
        ));
    }

    #[test]
    fn test_json_is_deterministic() {
        let v = crate::value::to_value(&serde_json::json!({"b": [1, 2], "a": "x"})).unwrap();
        assert_eq!(text("json", &[v]), r#"{"a":"x","b":[1,2]}"#);
    }

    #[test]
    fn test_escape_html() {
        assert_eq!(
            escape_html(r#"<a href="x">'Tom' & Jerry</a>"#),
            "&lt;a href=&quot;x&quot;&gt;&#39;Tom&#39; &amp; Jerry&lt;/a&gt;"
        );
        assert_eq!(escape_html("é\u{7}\n"), "&#233;&#7;\n");
        assert_eq!(escape_html("plain text"), "plain text");
    }

    #[test]
    fn test_date_default_format() {
        assert_eq!(text("date", &["2024-01-15".into()]), "1/15/2024");
        assert_eq!(text("date", &["2024-03-05T10:20:30Z".into()]), "3/5/2024");
        let d = NaiveDate::from_ymd_opt(2023, 12, 1).unwrap();
        assert_eq!(text("date", &[Value::Date(d)]), "12/1/2023");
        assert_eq!(text("date", &[Value::I64(0)]), "1/1/1970");
    }

    #[test]
    fn test_date_with_locale_and_pattern() {
        assert_eq!(
            text("date", &["2024-01-15".into(), "de-DE".into(), "%d.%m.%Y".into()]),
            "15.01.2024"
        );
        assert_eq!(
            text("date", &["2024-01-15".into(), Value::Null, "%Y".into()]),
            "2024"
        );
    }

    #[test]
    fn test_date_failures() {
        let err = call("date", &["not a date".into()]).unwrap_err();
        assert!(matches!(err, RenderError::Helper { ref name, .. } if name == "date"));
        assert!(call("date", &["2024-01-15".into(), "xx-YY-nope".into()]).is_err());
        assert!(call("date", &["2024-01-15".into(), Value::Null, "%Q".into()]).is_err());
    }

    #[test]
    fn test_custom_overrides_standard() {
        let table = HelperTable::with_custom([(
            "upper".to_string(),
            Helper::new(|_| Ok(Value::from("overridden"))),
        )]);
        assert_eq!(table.call("upper", &["x".into()]).unwrap(), Value::from("overridden"));
        assert_eq!(table.custom_names(), vec!["upper".to_string()]);
        assert!(table.contains("lower"));
    }

    #[test]
    fn test_unknown_helper() {
        assert_eq!(
            call("nope", &[]).unwrap_err(),
            RenderError::UnknownHelper("nope".into())
        );
    }

    #[test]
    fn test_missing_argument() {
        assert!(matches!(
            call("upper", &[]).unwrap_err(),
            RenderError::Helper {
                source: HelperError::Arity { expected: 1, got: 0 },
                ..
            }
        ));
    }

    #[test]
    fn test_standard_names_match_table() {
        assert_eq!(standard_names(), HelperTable::standard().names());
    }
}
