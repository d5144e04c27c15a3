use chrono::{DateTime, Duration, Local};
use color_eyre::Result;

use crate::config::VariableConfig;
use crate::schedule;

pub mod home_assistant;
pub mod mqtt;
pub mod rest;
pub mod text;
pub mod time;

pub use home_assistant::HomeAssistantVariable;
pub use mqtt::MqttVariable;
pub use rest::RestVariable;
pub use text::{DynamicVariable, StaticVariable};
pub use time::{DateVariable, TimeVariable};

/// Default text template applied when a template variable defines none
pub const DEFAULT_TEMPLATE: &str = "{{ value }}";

/// Default update guard, always true
pub const DEFAULT_UPDATE_TEMPLATE: &str = "True";

/// Default polling schedule, every five minutes
pub const DEFAULT_CRON: &str = "*/5 * * * *";

/// Which subsystems must process a variable
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Category {
    /// Allocates an object in sign memory at startup
    Sign,
    /// Re-checked for due-ness on every poll tick
    Polling,
    /// Holds a payload and renders through the template engine
    Template,
}

/// A named, typed source of display text. Constructed once from the layout
/// file and immutable afterwards; only its payload in the store changes.
#[derive(Debug, Clone)]
pub enum Variable {
    Static(StaticVariable),
    Date(DateVariable),
    Time(TimeVariable),
    Dynamic(DynamicVariable),
    Mqtt(MqttVariable),
    Rest(RestVariable),
    HomeAssistant(HomeAssistantVariable),
}

impl Variable {
    /// Build a variable from its validated layout entry. Fails on an invalid
    /// cron expression; an unknown kind never reaches this point because the
    /// config deserializer rejects it.
    pub fn from_config(name: &str, config: VariableConfig) -> Result<Self> {
        Ok(match config {
            VariableConfig::Static(c) => Variable::Static(StaticVariable::new(name, c)),
            VariableConfig::Date(c) => Variable::Date(DateVariable::new(name, c)?),
            VariableConfig::Time(c) => Variable::Time(TimeVariable::new(name, c)),
            VariableConfig::Dynamic(c) => Variable::Dynamic(DynamicVariable::new(name, c)?),
            VariableConfig::Mqtt(c) => Variable::Mqtt(MqttVariable::new(name, c)),
            VariableConfig::Rest(c) => Variable::Rest(RestVariable::new(name, c)?),
            VariableConfig::HomeAssistant(c) => {
                Variable::HomeAssistant(HomeAssistantVariable::new(name, c)?)
            }
        })
    }

    pub fn name(&self) -> &str {
        match self {
            Variable::Static(v) => &v.name,
            Variable::Date(v) => &v.name,
            Variable::Time(v) => &v.name,
            Variable::Dynamic(v) => &v.name,
            Variable::Mqtt(v) => &v.name,
            Variable::Rest(v) => &v.name,
            Variable::HomeAssistant(v) => &v.name,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Variable::Static(_) => "static",
            Variable::Date(_) => "date",
            Variable::Time(_) => "time",
            Variable::Dynamic(_) => "dynamic",
            Variable::Mqtt(_) => "mqtt",
            Variable::Rest(_) => "rest",
            Variable::HomeAssistant(_) => "home_assistant",
        }
    }

    pub fn categories(&self) -> &'static [Category] {
        match self {
            Variable::Static(_) | Variable::Time(_) => &[Category::Sign],
            Variable::Date(_) | Variable::HomeAssistant(_) => &[Category::Polling],
            Variable::Mqtt(_) => &[Category::Template],
            Variable::Dynamic(_) | Variable::Rest(_) => &[Category::Polling, Category::Template],
        }
    }

    pub fn has_category(&self, category: Category) -> bool {
        self.categories().contains(&category)
    }

    /// The template rendered through the engine, for template-driven kinds
    pub fn template(&self) -> Option<&str> {
        match self {
            Variable::Dynamic(v) => Some(&v.template),
            Variable::Mqtt(v) => Some(&v.template),
            Variable::Rest(v) => Some(&v.template),
            _ => None,
        }
    }

    /// The update guard template, always-true unless configured otherwise
    pub fn update_template(&self) -> &str {
        match self {
            Variable::Dynamic(v) => &v.update_template,
            Variable::Mqtt(v) => &v.update_template,
            Variable::Rest(v) => &v.update_template,
            _ => DEFAULT_UPDATE_TEMPLATE,
        }
    }

    /// The text shown on the sign before the first real update arrives
    pub fn startup_text(&self) -> String {
        match self {
            Variable::Static(v) => v.text.clone(),
            Variable::Date(v) => v.current_text(),
            Variable::Time(v) => v.startup_text(),
            Variable::Dynamic(v) => v.startup.clone(),
            Variable::Mqtt(v) => v.startup.clone(),
            Variable::Rest(v) => v.startup.clone(),
            Variable::HomeAssistant(v) => v.startup.clone(),
        }
    }

    /// Alphasign formatting codes prefixed to this variable's slot call
    pub fn display_params(&self) -> String {
        let color = match self {
            Variable::Static(v) => v.color.as_deref(),
            Variable::Date(v) => v.color.as_deref(),
            Variable::Time(v) => v.color.as_deref(),
            Variable::Dynamic(v) => v.color.as_deref(),
            Variable::Mqtt(v) => v.color.as_deref(),
            Variable::Rest(v) => v.color.as_deref(),
            Variable::HomeAssistant(v) => v.color.as_deref(),
        };

        color
            .and_then(crate::sign::color_code)
            .unwrap_or_default()
            .to_string()
    }

    fn cron(&self) -> Option<&cron::Schedule> {
        match self {
            Variable::Date(v) => Some(&v.schedule),
            Variable::Dynamic(v) => Some(&v.schedule),
            Variable::Rest(v) => Some(&v.schedule),
            Variable::HomeAssistant(v) => Some(&v.schedule),
            _ => None,
        }
    }

    /// Whether this polling variable is due at `now`; always false for
    /// kinds that do not poll
    pub fn should_poll(&self, now: DateTime<Local>, offset: Duration) -> bool {
        self.cron()
            .is_some_and(|schedule| schedule::is_due(schedule, now, offset))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::VariableConfig;

    fn make(toml_src: &str) -> Variable {
        let config: VariableConfig = toml::from_str(toml_src).unwrap();
        Variable::from_config("test_var", config).unwrap()
    }

    #[test]
    fn test_categories_by_kind() {
        let var = make("type = \"static\"\ntext = \"Hello\"");
        assert!(var.has_category(Category::Sign));
        assert!(!var.has_category(Category::Polling));

        let var = make("type = \"mqtt\"\ntopic = \"home/x\"");
        assert!(var.has_category(Category::Template));
        assert!(!var.has_category(Category::Polling));

        let var = make("type = \"dynamic\"\ntemplate = \"{{ value }}\"");
        assert!(var.has_category(Category::Polling));
        assert!(var.has_category(Category::Template));
    }

    #[test]
    fn test_template_defaults_merged() {
        let var = make("type = \"mqtt\"\ntopic = \"home/x\"");
        assert_eq!(var.template(), Some(DEFAULT_TEMPLATE));
        assert_eq!(var.update_template(), DEFAULT_UPDATE_TEMPLATE);

        let var = make(
            "type = \"mqtt\"\ntopic = \"home/x\"\ntemplate = \"{{ value.state }}\"\nupdate_template = \"{{ value != '' }}\"",
        );
        assert_eq!(var.template(), Some("{{ value.state }}"));
        assert_eq!(var.update_template(), "{{ value != '' }}");
    }

    #[test]
    fn test_static_never_polls() {
        let var = make("type = \"static\"\ntext = \"Hello\"");
        assert!(!var.should_poll(chrono::Local::now(), crate::schedule::startup_offset()));
    }

    #[test]
    fn test_polling_kind_due_after_startup_offset() {
        let var = make("type = \"rest\"\nurl = \"http://example.com/api\"");
        assert!(var.should_poll(chrono::Local::now(), crate::schedule::startup_offset()));
    }

    #[test]
    fn test_invalid_cron_is_fatal() {
        let config: VariableConfig =
            toml::from_str("type = \"rest\"\nurl = \"http://x\"\ncron = \"bogus\"").unwrap();
        assert!(Variable::from_config("bad", config).is_err());
    }
}
