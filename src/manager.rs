//! Sign memory allocation and display queue management. Slots are assigned
//! once at startup and never freed; a restart re-allocates from scratch.

use std::collections::HashMap;

use color_eyre::Result;
use color_eyre::eyre::eyre;

use crate::config::{Layout, MessageConfig, MqttConfig, QueueConfig};
use crate::constants;
use crate::payload::PayloadStore;
use crate::sign::{
    ClockObject, SignInterface, SignObject, StringObject, TextObject, color_code, font_code,
    mode_code, speed_code,
};
use crate::variable::{Category, MqttVariable, Variable};

/// Objects produced by the startup allocation pass
pub struct StartupObjects {
    /// Everything to pre-load into sign memory, in allocation order
    pub allocate: Vec<SignObject>,
    /// The run list for the default queue
    pub run: Vec<SignObject>,
}

pub struct MessageManager {
    variables: HashMap<String, Variable>,
    queues: Vec<QueueConfig>,
    string_labels: HashMap<String, char>,
    text_labels: HashMap<String, char>,
    run_lists: HashMap<String, Vec<SignObject>>,
}

impl MessageManager {
    pub fn new(layout: Layout) -> Result<Self> {
        let mut variables = HashMap::new();

        for (name, config) in layout.variables {
            let var = Variable::from_config(&name, config)?;
            variables.insert(name, var);
        }

        // internal variable backing the Home Assistant text entity
        variables.insert(
            constants::TEXT_ENTITY_VARIABLE.to_string(),
            Variable::Mqtt(MqttVariable::new(
                constants::TEXT_ENTITY_VARIABLE,
                MqttConfig::for_topic(constants::MQTT_CURRENT_TEXT),
            )),
        );

        Ok(Self {
            variables,
            queues: layout.display,
            string_labels: HashMap::new(),
            text_labels: HashMap::new(),
            run_lists: HashMap::new(),
        })
    }

    /// Assign the next string slot from 'a'..'z'; running out is a fatal
    /// configuration error
    fn allocate_string(&mut self, name: &str) -> Result<char> {
        let offset = self.string_labels.len() as u32;
        let label = char::from_u32('a' as u32 + offset)
            .filter(|c| *c <= 'z')
            .ok_or_else(|| eyre!("out of string slots, the sign can hold 26"))?;

        self.string_labels.insert(name.to_string(), label);
        Ok(label)
    }

    /// Assign the next text slot from 'A'..'Z'
    fn allocate_text(&mut self, name: &str) -> Result<char> {
        let offset = self.text_labels.len() as u32;
        let label = char::from_u32('A' as u32 + offset)
            .filter(|c| *c <= 'Z')
            .ok_or_else(|| eyre!("out of text slots, the sign can hold 26"))?;

        self.text_labels.insert(name.to_string(), label);
        Ok(label)
    }

    /// Alphasign codes for a message's display options
    fn message_params(&self, message: &MessageConfig) -> Result<String> {
        let mut params = String::new();

        if let Some(color) = &message.color {
            params.push_str(
                color_code(color).ok_or_else(|| eyre!("unknown message color '{color}'"))?,
            );
        }
        if let Some(font) = &message.font {
            params
                .push_str(font_code(font).ok_or_else(|| eyre!("unknown message font '{font}'"))?);
        }
        if let Some(speed) = message.speed {
            params.push_str(
                speed_code(speed).ok_or_else(|| eyre!("invalid message speed {speed}"))?,
            );
        }

        Ok(params)
    }

    /// Walk every queue's messages, allocate slots for each referenced
    /// variable (reusing slots on repeat references), compose the text
    /// objects, and build the per-queue run lists. A message referencing an
    /// undefined variable aborts startup.
    pub fn startup(&mut self, device: &mut dyn SignInterface) -> Result<StartupObjects> {
        let mut strings: Vec<SignObject> = Vec::new();
        let mut texts: Vec<SignObject> = Vec::new();

        // the off message comes first so the switch topic can always find it
        let off_label = self.allocate_text(constants::SIGN_OFF)?;
        texts.push(SignObject::Text(TextObject::new(off_label, "", "b")));

        let queues = self.queues.clone();
        for queue in &queues {
            let mut run_list = Vec::new();

            for (index, message) in queue.queue.iter().enumerate() {
                let mut calls = Vec::new();

                for name in message.message.names() {
                    let var = self.variables.get(name).cloned().ok_or_else(|| {
                        eyre!("the variable '{name}' does not exist or is not allocated")
                    })?;

                    let call = match &var {
                        Variable::Time(time_var) => {
                            // the clock is sign-internal, write it now and
                            // reference it directly
                            let clock = ClockObject::new(time_var.twenty_four_hour());
                            device.write(&SignObject::Clock(clock.clone()))?;
                            clock.call()
                        }
                        _ => match self.string_labels.get(name) {
                            Some(label) => {
                                log::info!("{name} already loaded, adding to message");
                                StringObject::new(*label, "").call()
                            }
                            None => {
                                log::info!("loading variable {name}:{} for message", var.kind());
                                let label = self.allocate_string(name)?;
                                let obj = StringObject::new(label, var.startup_text());
                                let call = obj.call();
                                strings.push(SignObject::Str(obj));
                                call
                            }
                        },
                    };

                    calls.push(format!("{}{call}", var.display_params()));
                }

                let mode = mode_code(&message.mode)
                    .ok_or_else(|| eyre!("unknown message mode '{}'", message.mode))?;
                let params = self.message_params(message)?;
                let label = self.allocate_text(&format!("MESSAGE_{}_{index}", queue.name))?;

                let text =
                    TextObject::new(label, format!("{params}{}", calls.join(" ")), mode);
                texts.push(SignObject::Text(text.clone()));
                run_list.push(SignObject::Text(text));
            }

            self.run_lists.insert(queue.name.clone(), run_list);
        }

        let run = self.get_queue(constants::MAIN_QUEUE).to_vec();
        texts.extend(strings);

        Ok(StartupObjects {
            allocate: texts,
            run,
        })
    }

    /// A write for the string slot belonging to `name`, None when the
    /// variable was never placed on the display. Callers treat None as a
    /// silent no-op: not every configured variable appears in a message.
    pub fn update_string(&self, name: &str, message: &str) -> Option<StringObject> {
        self.string_labels
            .get(name)
            .map(|label| StringObject::new(*label, message))
    }

    /// A write for an allocated text object, used to swap the off message in
    /// and out with the priority flag
    pub fn update_text(&self, name: &str, message: &str, priority: bool) -> Result<TextObject> {
        let label = self
            .text_labels
            .get(name)
            .ok_or_else(|| eyre!("no text object allocated for '{name}'"))?;

        Ok(TextObject::new(*label, message, "b").priority(priority))
    }

    /// Evaluate each non-default queue's activation template in declaration
    /// order; the first match wins, otherwise the default queue
    pub fn find_active_queue(&self, store: &PayloadStore) -> String {
        for queue in &self.queues {
            if queue.name == constants::MAIN_QUEUE {
                continue;
            }
            let Some(template) = &queue.active_template else {
                continue;
            };

            match store.render_template(template) {
                Ok(result) if result.to_lowercase() == "true" => return queue.name.clone(),
                Ok(_) => {}
                Err(e) => log::error!("activation template for '{}' failed: {e}", queue.name),
            }
        }

        constants::MAIN_QUEUE.to_string()
    }

    /// The run list for a queue, falling back to the default queue for
    /// unknown names
    pub fn get_queue(&self, name: &str) -> &[SignObject] {
        self.run_lists
            .get(name)
            .or_else(|| self.run_lists.get(constants::MAIN_QUEUE))
            .map_or(&[], Vec::as_slice)
    }

    pub fn get_variable(&self, name: &str) -> Option<&Variable> {
        self.variables.get(name)
    }

    /// All variables carrying the given category tag, ordered by name so
    /// dependency scans and poll passes run in the same order every start
    pub fn variables_by_category(&self, category: Category) -> Vec<&Variable> {
        let mut vars: Vec<&Variable> = self
            .variables
            .values()
            .filter(|v| v.has_category(category))
            .collect();
        vars.sort_by(|a, b| a.name().cmp(b.name()));
        vars
    }

    /// The MQTT variable watching the given topic, if any
    pub fn variable_for_topic(&self, topic: &str) -> Option<&Variable> {
        self.variables.values().find(|v| match v {
            Variable::Mqtt(m) => m.topic == topic,
            _ => false,
        })
    }

    /// All MQTT variables in name order, used to build the subscription list
    pub fn mqtt_variables(&self) -> Vec<&MqttVariable> {
        let mut vars: Vec<&MqttVariable> = self
            .variables
            .values()
            .filter_map(|v| match v {
                Variable::Mqtt(m) => Some(m),
                _ => None,
            })
            .collect();
        vars.sort_by(|a, b| a.name.cmp(&b.name));
        vars
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sign::console::ConsoleSign;

    fn manager_from(layout_src: &str) -> MessageManager {
        let layout: Layout = toml::from_str(layout_src).unwrap();
        MessageManager::new(layout).unwrap()
    }

    const TWO_QUEUE_LAYOUT: &str = r#"
[variables.greeting]
type = "static"
text = "Hello"

[variables.alert_state]
type = "mqtt"
topic = "home/alert"

[[display]]
name = "main"
[[display.queue]]
message = "greeting"
mode = "hold"

[[display]]
name = "alert"
active_template = "{{ is_payload('alert_state', 'on') }}"
[[display.queue]]
message = ["greeting", "alert_state"]
mode = "flash"
"#;

    #[test]
    fn test_shared_variable_allocates_one_slot() {
        let mut manager = manager_from(TWO_QUEUE_LAYOUT);
        let mut device = ConsoleSign;
        let objects = manager.startup(&mut device).unwrap();

        // greeting appears in both queues but holds exactly one slot
        let greeting_strings: Vec<_> = objects
            .allocate
            .iter()
            .filter_map(|o| match o {
                SignObject::Str(s) if s.data == "Hello" => Some(s.label),
                _ => None,
            })
            .collect();
        assert_eq!(greeting_strings, vec!['a']);

        // both queue messages call the same slot
        for queue in ["main", "alert"] {
            let run = manager.get_queue(queue);
            let SignObject::Text(text) = &run[0] else {
                panic!("run list should hold text objects");
            };
            assert!(text.data.contains("\x10a"), "queue {queue} misses the call");
        }
    }

    #[test]
    fn test_active_queue_selection() {
        let mut manager = manager_from(TWO_QUEUE_LAYOUT);
        let mut device = ConsoleSign;
        manager.startup(&mut device).unwrap();

        let vars = manager.variables_by_category(Category::Template);
        let store = PayloadStore::new(&vars).unwrap();

        assert_eq!(manager.find_active_queue(&store), "main");
        store.set_payload("alert_state", serde_json::json!("on"));
        assert_eq!(manager.find_active_queue(&store), "alert");
        store.set_payload("alert_state", serde_json::json!("off"));
        assert_eq!(manager.find_active_queue(&store), "main");
    }

    #[test]
    fn test_startup_and_update_string_end_to_end() {
        let mut manager = manager_from(
            "[variables.greeting]\ntype = \"static\"\ntext = \"Hello\"\n\n[[display]]\nname = \"main\"\n[[display.queue]]\nmessage = \"greeting\"",
        );
        let mut device = ConsoleSign;
        let objects = manager.startup(&mut device).unwrap();

        // off message takes the first text slot, the message the second
        assert!(matches!(
            &objects.allocate[0],
            SignObject::Text(t) if t.label == 'A' && t.data.is_empty()
        ));
        assert_eq!(objects.run.len(), 1);

        let update = manager.update_string("greeting", "Hi").unwrap();
        assert_eq!(update.label, 'a');
        assert_eq!(update.data, "Hi");
    }

    #[test]
    fn test_update_string_for_undisplayed_variable() {
        let mut manager = manager_from(TWO_QUEUE_LAYOUT);
        let mut device = ConsoleSign;
        manager.startup(&mut device).unwrap();

        // defined but never referenced by a message: silent no-op
        assert!(manager.update_string("HA_TEXT_ENTITY", "x").is_none());
        assert!(manager.update_string("nope", "x").is_none());
    }

    #[test]
    fn test_undefined_variable_aborts_startup() {
        let mut manager = manager_from(
            "[variables.a]\ntype = \"static\"\ntext = \"x\"\n\n[[display]]\nname = \"main\"\n[[display.queue]]\nmessage = \"ghost\"",
        );
        let mut device = ConsoleSign;
        assert!(manager.startup(&mut device).is_err());
    }

    #[test]
    fn test_text_slot_exhaustion_is_fatal() {
        // 26 messages plus the off message need 27 text slots
        let mut layout = String::from(
            "[variables.a]\ntype = \"static\"\ntext = \"x\"\n\n[[display]]\nname = \"main\"\n",
        );
        for _ in 0..26 {
            layout.push_str("[[display.queue]]\nmessage = \"a\"\n");
        }

        let mut manager = manager_from(&layout);
        let mut device = ConsoleSign;
        assert!(manager.startup(&mut device).is_err());
    }

    #[test]
    fn test_dependent_order_stable_across_builds() {
        let mut layout_src = String::from(
            "[variables.src_var]\ntype = \"mqtt\"\ntopic = \"t/src\"\n\n",
        );
        for i in 0..10 {
            layout_src.push_str(&format!(
                "[variables.derived_{i}]\ntype = \"dynamic\"\ntemplate = \"{{{{ get_payload('src_var') }}}}\"\n\n",
            ));
        }
        layout_src.push_str("[[display]]\nname = \"main\"\n[[display.queue]]\nmessage = \"src_var\"\n");

        let build = || {
            let manager = manager_from(&layout_src);
            let vars = manager.variables_by_category(Category::Template);
            let store = PayloadStore::new(&vars).unwrap();
            store.dependents("src_var").to_vec()
        };

        let first = build();
        assert_eq!(first.len(), 10);
        for _ in 0..5 {
            assert_eq!(build(), first, "dependent order changed between builds");
        }

        // name order, independent of map iteration
        let mut sorted = first.clone();
        sorted.sort();
        assert_eq!(first, sorted);
    }

    #[test]
    fn test_topic_lookup() {
        let manager = manager_from(TWO_QUEUE_LAYOUT);
        let var = manager.variable_for_topic("home/alert").unwrap();
        assert_eq!(var.name(), "alert_state");
        assert!(manager.variable_for_topic("home/unknown").is_none());
    }
}
