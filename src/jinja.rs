//! The minijinja environment the payload store renders through: payload
//! lookup functions, time helpers and the sign-specific filters.
//!
//! Times are exposed to templates as Unix timestamps (seconds, f64) so that
//! comparisons and arithmetic work with plain template operators; `timedelta`
//! accordingly yields seconds.

use std::collections::HashMap;
use std::sync::{Arc, OnceLock, RwLock};

use chrono::{Local, NaiveDate, NaiveDateTime, TimeZone};
use minijinja::value::Kwargs;
use minijinja::{Environment, Error, ErrorKind, Value};
use regex::Regex;

/// The shared payload map, written by the update pipeline and read from
/// inside template evaluation
pub type Payloads = Arc<RwLock<HashMap<String, serde_json::Value>>>;

/// Look up a payload as a template value, empty string when unset
fn payload_value(payloads: &Payloads, name: &str) -> Value {
    let map = match payloads.read() {
        Ok(map) => map,
        Err(_) => return Value::from(""),
    };

    match map.get(name) {
        Some(serde_json::Value::String(s)) => Value::from(s.as_str()),
        Some(other) => Value::from_serialize(other),
        None => Value::from(""),
    }
}

/// Look up one attribute of a structured payload, none when the payload is
/// not structured or lacks the key
fn payload_attr_value(payloads: &Payloads, name: &str, attr: &str) -> Value {
    let map = match payloads.read() {
        Ok(map) => map,
        Err(_) => return Value::from(()),
    };

    match map.get(name) {
        Some(serde_json::Value::Object(obj)) => match obj.get(attr) {
            Some(value) => Value::from_serialize(value),
            None => Value::from(()),
        },
        _ => Value::from(()),
    }
}

fn timestamp_to_local(ts: f64) -> Result<chrono::DateTime<Local>, Error> {
    Local.timestamp_opt(ts as i64, 0).single().ok_or_else(|| {
        Error::new(
            ErrorKind::InvalidOperation,
            format!("timestamp {ts} is out of range"),
        )
    })
}

fn now() -> f64 {
    Local::now().timestamp() as f64
}

/// `timedelta(days=.., hours=.., ...)` as seconds
fn timedelta(kwargs: Kwargs) -> Result<f64, Error> {
    let mut seconds = 0.0;
    for (unit, factor) in [
        ("weeks", 604_800.0),
        ("days", 86_400.0),
        ("hours", 3_600.0),
        ("minutes", 60.0),
        ("seconds", 1.0),
        ("milliseconds", 1e-3),
        ("microseconds", 1e-6),
    ] {
        if let Some(amount) = kwargs.get::<Option<f64>>(unit)? {
            seconds += amount * factor;
        }
    }
    kwargs.assert_all_used()?;
    Ok(seconds)
}

/// Parse a time string in the given strftime format into a timestamp
fn strptime(text: String, format: String) -> Result<f64, Error> {
    if let Ok(dt) = NaiveDateTime::parse_from_str(&text, &format) {
        return Ok(dt.and_local_timezone(Local).earliest().map_or(0.0, |dt| {
            dt.timestamp() as f64
        }));
    }

    // date-only formats parse to midnight
    let date = NaiveDate::parse_from_str(&text, &format).map_err(|e| {
        Error::new(
            ErrorKind::InvalidOperation,
            format!("cannot parse '{text}' with format '{format}': {e}"),
        )
    })?;

    Ok(date
        .and_hms_opt(0, 0, 0)
        .and_then(|dt| dt.and_local_timezone(Local).earliest())
        .map_or(0.0, |dt| dt.timestamp() as f64))
}

/// Test whether a time expression matches the current (or given) time when
/// formatted with the same strftime codes, e.g. `is_time("10", "%m")` for
/// "is it October"
fn is_time(expr: String, format: String, at: Option<f64>) -> Result<bool, Error> {
    let time = match at {
        Some(ts) => timestamp_to_local(ts)?,
        None => Local::now(),
    };

    Ok(time.format(&format).to_string() == expr)
}

static URL_RE: OnceLock<Regex> = OnceLock::new();

fn url_regex() -> &'static Regex {
    URL_RE.get_or_init(|| {
        // scheme or www prefix, or a bare domain followed by a path; the
        // bare form requires an alphabetic final label and a slash so
        // version numbers like "1.2/3" stay untouched
        Regex::new(
            r"(?i)\b(?:(?:https?://|www\.)[^\s<>()\[\]{}'`]+|[a-z0-9][a-z0-9-]*(?:\.[a-z0-9-]+)*\.[a-z]{2,}/[^\s<>()\[\]{}'`]*)",
        )
        .expect("static pattern")
    })
}

/// Filter that replaces every URL in the text with just its domain, so long
/// links stay readable on a scrolling display
fn shorten_urls(value: String) -> String {
    let mut result = value.clone();

    for m in url_regex().find_iter(&value) {
        let url = m.as_str();
        let without_scheme = url
            .strip_prefix("https://")
            .or_else(|| url.strip_prefix("http://"))
            .or_else(|| {
                url.strip_prefix("HTTPS://")
                    .or_else(|| url.strip_prefix("HTTP://"))
            })
            .unwrap_or(url);
        let domain = without_scheme.split('/').next().unwrap_or(without_scheme);
        result = result.replace(url, domain);
    }

    result
}

/// Rainbow color codes are not valid inside string files per the Alphasign
/// protocol, substitute a scroll-safe color
fn safe_color(name: &str) -> &str {
    match name {
        "rainbow1" | "rainbow2" => "green",
        other => other,
    }
}

/// Filter that prefixes text with a sign color code. An optional condition
/// gates the color; `alt_color` applies when the condition is false.
fn color(
    text: String,
    color: String,
    condition: Option<bool>,
    alt_color: Option<String>,
) -> Result<String, Error> {
    let lookup = |name: &str| {
        crate::sign::color_code(safe_color(name)).ok_or_else(|| {
            Error::new(
                ErrorKind::InvalidOperation,
                format!("unknown color '{name}'"),
            )
        })
    };

    let applied = if condition.unwrap_or(true) {
        lookup(&color)?
    } else {
        match alt_color {
            Some(alt) => lookup(&alt)?,
            None => "",
        }
    };

    Ok(format!("{applied}{text}"))
}

/// Build the template environment bound to a shared payload map
pub fn build_environment(payloads: Payloads) -> Environment<'static> {
    let mut env = Environment::new();

    let p = payloads.clone();
    env.add_function("get_payload", move |name: String| payload_value(&p, &name));

    let p = payloads.clone();
    env.add_function("get_payload_attr", move |name: String, attr: String| {
        payload_attr_value(&p, &name, &attr)
    });

    let p = payloads.clone();
    env.add_function("is_payload", move |name: String, expected: Value| {
        payload_value(&p, &name) == expected
    });

    let p = payloads;
    env.add_function(
        "is_payload_attr",
        move |name: String, attr: String, expected: Value| {
            let value = payload_attr_value(&p, &name, &attr);
            !value.is_none() && value == expected
        },
    );

    env.add_function("now", now);
    env.add_function("timedelta", timedelta);
    env.add_function("strptime", strptime);
    env.add_function("is_time", is_time);

    env.add_filter("shorten_urls", shorten_urls);
    env.add_filter("color", color);

    env
}

#[cfg(test)]
mod tests {
    use super::*;

    fn env_with(payloads: &[(&str, serde_json::Value)]) -> Environment<'static> {
        let map: HashMap<String, serde_json::Value> = payloads
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect();
        build_environment(Arc::new(RwLock::new(map)))
    }

    fn render(env: &Environment<'static>, template: &str) -> String {
        env.render_str(template, minijinja::context! {}).unwrap()
    }

    #[test]
    fn test_get_payload_lookup() {
        let env = env_with(&[("state", serde_json::json!("on"))]);
        assert_eq!(render(&env, "{{ get_payload('state') }}"), "on");
        assert_eq!(render(&env, "{{ get_payload('missing') }}"), "");
    }

    #[test]
    fn test_payload_attr_lookup() {
        let env = env_with(&[("weather", serde_json::json!({"temp": 72}))]);
        assert_eq!(
            render(&env, "{{ get_payload_attr('weather', 'temp') }}"),
            "72"
        );
        assert!(render(&env, "{{ is_payload_attr('weather', 'temp', 72) }}").contains("true"));
        assert!(render(&env, "{{ is_payload_attr('weather', 'humidity', 72) }}").contains("false"));
    }

    #[test]
    fn test_is_payload_comparison() {
        let env = env_with(&[("state", serde_json::json!("on"))]);
        assert_eq!(render(&env, "{{ is_payload('state', 'on') }}"), "true");
        assert_eq!(render(&env, "{{ is_payload('state', 'off') }}"), "false");
    }

    #[test]
    fn test_time_arithmetic() {
        let env = env_with(&[]);
        // one hour from now is after now
        assert_eq!(
            render(&env, "{{ now() + timedelta(hours=1) > now() }}"),
            "true"
        );
    }

    #[test]
    fn test_is_time_with_fixed_timestamp() {
        let env = env_with(&[]);
        let ts = strptime("2026-10-01 12:00".to_string(), "%Y-%m-%d %H:%M".to_string()).unwrap();
        assert_eq!(
            render(&env, &format!("{{{{ is_time('10', '%m', {ts}) }}}}")),
            "true"
        );
        assert_eq!(
            render(&env, &format!("{{{{ is_time('03', '%m', {ts}) }}}}")),
            "false"
        );
    }

    #[test]
    fn test_shorten_urls_filter() {
        let env = env_with(&[]);
        assert_eq!(
            render(
                &env,
                "{{ 'see https://www.example.com/a/long/path for more' | shorten_urls }}"
            ),
            "see www.example.com for more"
        );
    }

    #[test]
    fn test_shorten_urls_bare_domain() {
        let env = env_with(&[]);
        assert_eq!(
            render(&env, "{{ 'read example.com/some/long/path now' | shorten_urls }}"),
            "read example.com now"
        );
        // version-like fragments are not URLs
        assert_eq!(
            render(&env, "{{ 'firmware 1.2/3 installed' | shorten_urls }}"),
            "firmware 1.2/3 installed"
        );
    }

    #[test]
    fn test_color_filter() {
        let env = env_with(&[]);
        assert_eq!(render(&env, "{{ 'hi' | color('green') }}"), "\x1c2hi");
        // rainbow is not string-safe and falls back to green
        assert_eq!(render(&env, "{{ 'hi' | color('rainbow1') }}"), "\x1c2hi");
        // false condition without alt color leaves the text bare
        assert_eq!(render(&env, "{{ 'hi' | color('red', false) }}"), "hi");
        assert_eq!(
            render(&env, "{{ 'hi' | color('red', false, 'amber') }}"),
            "\x1c3hi"
        );
    }

    #[test]
    fn test_unknown_color_is_error() {
        let env = env_with(&[]);
        assert!(
            env.render_str("{{ 'hi' | color('chartreuse') }}", minijinja::context! {})
                .is_err()
        );
    }
}
