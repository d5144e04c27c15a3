//! Reserved names and MQTT topics shared across the daemon

/// The default display queue, always present and used when no other
/// queue's activation template matches
pub const MAIN_QUEUE: &str = "main";

/// Internal text object swapped in as priority text to blank the display
pub const SIGN_OFF: &str = "MARQUEE_OFF";

/// Internal MQTT variable backing the Home Assistant text entity
pub const TEXT_ENTITY_VARIABLE: &str = "HA_TEXT_ENTITY";

// state and command topics
pub const MQTT_STATUS: &str = "marquee/sign/status";
pub const MQTT_ATTRIBUTES: &str = "marquee/sign/attributes";
pub const MQTT_SWITCH: &str = "marquee/sign/switch";
pub const MQTT_AVAILABLE: &str = "marquee/sign/available";
pub const MQTT_CURRENT_TEXT: &str = "marquee/sign/current_text";
pub const MQTT_NEW_TEXT: &str = "marquee/sign/new_text";

// Home Assistant discovery entity classes
pub const DISCOVERY_LIGHT_CLASS: &str = "light";
pub const DISCOVERY_TEXT_CLASS: &str = "text";
