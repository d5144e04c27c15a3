//! Latest payload per variable, memoized renders, and the static dependency
//! graph that decides which derived variables re-render after a write.

use std::collections::HashMap;
use std::sync::{Arc, OnceLock, RwLock};

use color_eyre::Result;
use color_eyre::eyre::eyre;
use minijinja::Environment;
use regex::Regex;

use crate::jinja::{self, Payloads};
use crate::variable::Variable;

/// Extracts the names of variables a template reads from the payload store.
/// Kept behind a trait so a richer template dialect can swap the scanner
/// without touching the graph's consumers.
pub trait DependencyParser {
    fn dependencies(&self, template: &str) -> Vec<String>;
}

/// Static scan for the payload lookup functions with a literal first
/// argument. Computed variable names are invisible to this pass and will not
/// trigger cascading re-renders; that is a documented limitation, not a bug.
pub struct RegexParser;

static LOOKUP_RE: OnceLock<Regex> = OnceLock::new();

impl DependencyParser for RegexParser {
    fn dependencies(&self, template: &str) -> Vec<String> {
        let re = LOOKUP_RE.get_or_init(|| {
            Regex::new(
                r#"(?:get_payload_attr|get_payload|is_payload_attr|is_payload)\(\s*['"]([A-Za-z0-9_]+)['"]"#,
            )
            .expect("static pattern")
        });

        let mut names = Vec::new();
        for cap in re.captures_iter(template) {
            let name = cap[1].to_string();
            if !names.contains(&name) {
                names.push(name);
            }
        }
        names
    }
}

/// Payload state for every template-driven variable plus the environment
/// used to evaluate their templates
pub struct PayloadStore {
    payloads: Payloads,
    rendered: HashMap<String, String>,
    /// source variable -> dependents to re-render when it changes,
    /// in insertion order
    depends: HashMap<String, Vec<String>>,
    env: Environment<'static>,
}

impl PayloadStore {
    /// Build the store over the template-driven variables. Fails when the
    /// dependency graph contains a cycle, since a self-dependent variable
    /// would cascade forever at runtime.
    pub fn new(vars: &[&Variable]) -> Result<Self> {
        Self::with_parser(vars, &RegexParser)
    }

    pub fn with_parser(vars: &[&Variable], parser: &dyn DependencyParser) -> Result<Self> {
        let mut payloads = HashMap::new();
        let mut rendered = HashMap::new();
        let mut depends: HashMap<String, Vec<String>> = HashMap::new();

        for var in vars {
            payloads.insert(var.name().to_string(), serde_json::Value::String(String::new()));
            rendered.insert(var.name().to_string(), String::new());

            if let Some(template) = var.template() {
                for source in parser.dependencies(template) {
                    let dependents = depends.entry(source).or_default();
                    if !dependents.contains(&var.name().to_string()) {
                        dependents.push(var.name().to_string());
                    }
                }
            }
        }

        detect_cycles(&depends)?;

        let payloads: Payloads = Arc::new(RwLock::new(payloads));
        let env = jinja::build_environment(payloads.clone());

        Ok(Self {
            payloads,
            rendered,
            depends,
            env,
        })
    }

    /// Overwrite the payload for a variable; per-key atomic, no merge
    pub fn set_payload(&self, name: &str, payload: serde_json::Value) {
        if let Ok(mut map) = self.payloads.write() {
            map.insert(name.to_string(), payload);
        }
    }

    /// The latest payload, or the empty-string sentinel when never set
    pub fn get_payload(&self, name: &str) -> serde_json::Value {
        self.payloads
            .read()
            .ok()
            .and_then(|map| map.get(name).cloned())
            .unwrap_or_else(|| serde_json::Value::String(String::new()))
    }

    /// Whether a variable has ever received a non-empty payload
    pub fn has_value(&self, name: &str) -> bool {
        !matches!(self.get_payload(name), serde_json::Value::String(s) if s.is_empty())
    }

    /// Variables whose templates read the given variable, in the order their
    /// references were discovered
    pub fn dependents(&self, name: &str) -> &[String] {
        self.depends.get(name).map_or(&[], Vec::as_slice)
    }

    /// Evaluate the variable's update guard. Defaults to always-true;
    /// evaluation errors count as "do not update" so one bad guard cannot
    /// stall the rest of the cycle.
    pub fn should_update(&self, var: &Variable) -> bool {
        let value = minijinja::Value::from_serialize(self.get_payload(var.name()));
        match self
            .env
            .render_str(var.update_template(), minijinja::context! { value })
        {
            Ok(result) => result.trim().to_lowercase() == "true",
            Err(e) => {
                log::error!("update guard for {} failed: {e}", var.name());
                false
            }
        }
    }

    /// Render the variable's template against its current payload. Returns
    /// the new text only when it differs from the previous render, so
    /// unchanged output suppresses the device write.
    pub fn render_variable(&mut self, var: &Variable) -> Option<String> {
        let template = var.template()?;
        let value = minijinja::Value::from_serialize(self.get_payload(var.name()));

        let text = match self.env.render_str(template, minijinja::context! { value }) {
            Ok(text) => text.trim().to_string(),
            Err(e) => {
                log::error!("template for {} failed: {e}", var.name());
                return None;
            }
        };

        if self.rendered.get(var.name()) == Some(&text) {
            return None;
        }

        self.rendered.insert(var.name().to_string(), text.clone());
        Some(text)
    }

    /// Render a bare template string with no payload bound, used for queue
    /// activation templates
    pub fn render_template(&self, template: &str) -> Result<String> {
        Ok(self
            .env
            .render_str(template, minijinja::context! {})?
            .trim()
            .to_string())
    }
}

/// Reject dependency graphs where a variable can reach itself, directly or
/// transitively
fn detect_cycles(depends: &HashMap<String, Vec<String>>) -> Result<()> {
    fn visit<'a>(
        node: &'a str,
        depends: &'a HashMap<String, Vec<String>>,
        path: &mut Vec<&'a str>,
        done: &mut std::collections::HashSet<&'a str>,
    ) -> Result<()> {
        if done.contains(node) {
            return Ok(());
        }
        if path.contains(&node) {
            return Err(eyre!(
                "dependency cycle among variables: {} -> {node}",
                path.join(" -> ")
            ));
        }

        path.push(node);
        for dependent in depends.get(node).map_or(&[][..], Vec::as_slice) {
            visit(dependent, depends, path, done)?;
        }
        path.pop();
        done.insert(node);

        Ok(())
    }

    let mut done = std::collections::HashSet::new();
    for node in depends.keys() {
        visit(node, depends, &mut Vec::new(), &mut done)?;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::VariableConfig;

    fn var(name: &str, toml_src: &str) -> Variable {
        let config: VariableConfig = toml::from_str(toml_src).unwrap();
        Variable::from_config(name, config).unwrap()
    }

    fn mqtt_var(name: &str, template: &str) -> Variable {
        var(
            name,
            &format!("type = \"mqtt\"\ntopic = \"t/{name}\"\ntemplate = '''{template}'''"),
        )
    }

    #[test]
    fn test_dependency_extraction() {
        let parser = RegexParser;
        let deps = parser
            .dependencies("{{ get_payload('x') }} and {{ get_payload_attr('y', 'z') }}");
        assert_eq!(deps, vec!["x".to_string(), "y".to_string()]);

        assert!(parser.dependencies("{{ value }}").is_empty());
    }

    #[test]
    fn test_dependency_extraction_dedups_in_order() {
        let parser = RegexParser;
        let deps = parser.dependencies(
            "{{ is_payload('b', 'on') }} {{ get_payload('a') }} {{ get_payload('b') }}",
        );
        assert_eq!(deps, vec!["b".to_string(), "a".to_string()]);
    }

    #[test]
    fn test_dependents_reverse_mapping() {
        let upstream = mqtt_var("upstream", "{{ value }}");
        let derived = mqtt_var("derived", "{{ get_payload('upstream') }}!");
        let store = PayloadStore::new(&[&upstream, &derived]).unwrap();

        assert_eq!(store.dependents("upstream"), &["derived".to_string()]);
        assert!(store.dependents("derived").is_empty());
    }

    #[test]
    fn test_cycle_detected_at_construction() {
        let a = mqtt_var("a", "{{ get_payload('b') }}");
        let b = mqtt_var("b", "{{ get_payload('a') }}");
        assert!(PayloadStore::new(&[&a, &b]).is_err());

        let selfish = mqtt_var("selfish", "{{ get_payload('selfish') }}");
        assert!(PayloadStore::new(&[&selfish]).is_err());
    }

    #[test]
    fn test_render_memoization() {
        let v = mqtt_var("state", "{{ value }}");
        let mut store = PayloadStore::new(&[&v]).unwrap();

        store.set_payload("state", serde_json::json!("on"));
        assert_eq!(store.render_variable(&v), Some("on".to_string()));
        // unchanged payload renders to the same text, no update needed
        assert_eq!(store.render_variable(&v), None);

        store.set_payload("state", serde_json::json!("off"));
        assert_eq!(store.render_variable(&v), Some("off".to_string()));
    }

    #[test]
    fn test_render_error_skips_variable() {
        let bad = mqtt_var("bad", "{{ value | no_such_filter }}");
        let mut store = PayloadStore::new(&[&bad]).unwrap();
        store.set_payload("bad", serde_json::json!("x"));
        assert_eq!(store.render_variable(&bad), None);
    }

    #[test]
    fn test_has_value() {
        let v = mqtt_var("state", "{{ value }}");
        let store = PayloadStore::new(&[&v]).unwrap();

        assert!(!store.has_value("state"));
        store.set_payload("state", serde_json::json!(""));
        assert!(!store.has_value("state"));
        store.set_payload("state", serde_json::json!("on"));
        assert!(store.has_value("state"));
        store.set_payload("state", serde_json::json!({"k": 1}));
        assert!(store.has_value("state"));
    }

    #[test]
    fn test_should_update_guard() {
        let always = mqtt_var("always", "{{ value }}");
        let guarded = var(
            "guarded",
            "type = \"mqtt\"\ntopic = \"t/g\"\nupdate_template = \"{{ value == 'go' }}\"",
        );
        let store = PayloadStore::new(&[&always, &guarded]).unwrap();

        assert!(store.should_update(&always));

        store.set_payload("guarded", serde_json::json!("stop"));
        assert!(!store.should_update(&guarded));
        store.set_payload("guarded", serde_json::json!("go"));
        assert!(store.should_update(&guarded));
    }

    #[test]
    fn test_structured_payload_attr() {
        let weather = mqtt_var("weather", "{{ value }}");
        let derived = mqtt_var("display_temp", "{{ get_payload_attr('weather', 'temp') }}F");
        let mut store = PayloadStore::new(&[&weather, &derived]).unwrap();

        store.set_payload("weather", serde_json::json!({"temp": 68}));
        assert_eq!(store.render_variable(&derived), Some("68F".to_string()));
        assert_eq!(store.dependents("weather"), &["display_temp".to_string()]);
    }
}
