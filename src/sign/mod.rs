use color_eyre::Result;

pub mod console;
pub mod serial;

/// Fixed size of every string file allocated in sign memory
pub const STRING_SIZE: usize = 125;

/// Control code that calls an allocated string file from inside a text object
const CALL_STRING: char = '\x10';

/// Control code that inserts the sign's internal clock into a text object
const CALL_CLOCK: char = '\x13';

/// Label reserved by the Alphasign protocol for priority text
pub const PRIORITY_LABEL: char = '0';

/// Map a layout mode name to its Alphasign display mode code
pub fn mode_code(name: &str) -> Option<&'static str> {
    Some(match name {
        "rotate" => "a",
        "hold" => "b",
        "flash" => "c",
        "roll_up" => "e",
        "roll_down" => "f",
        "roll_left" => "g",
        "roll_right" => "h",
        "wipe_up" => "i",
        "wipe_down" => "j",
        "wipe_left" => "k",
        "wipe_right" => "l",
        "scroll" => "m",
        "twinkle" => "n0",
        "sparkle" => "n1",
        "snow" => "n2",
        "interlock" => "n3",
        "switch" => "n4",
        "spray" => "n6",
        "starburst" => "n7",
        "welcome" => "n8",
        "slot_machine" => "n9",
        _ => return None,
    })
}

/// Map a layout color name to its Alphasign color code
pub fn color_code(name: &str) -> Option<&'static str> {
    Some(match name {
        "red" => "\x1c1",
        "green" => "\x1c2",
        "amber" => "\x1c3",
        "dim_red" => "\x1c4",
        "dim_green" => "\x1c5",
        "brown" => "\x1c6",
        "orange" => "\x1c7",
        "yellow" => "\x1c8",
        "rainbow1" => "\x1c9",
        "rainbow2" => "\x1cA",
        "color_mix" => "\x1cB",
        _ => return None,
    })
}

/// Map a layout font name to its Alphasign character set code
pub fn font_code(name: &str) -> Option<&'static str> {
    Some(match name {
        "five_high_std" => "\x1a1",
        "five_stroke" => "\x1a2",
        "seven_high_std" => "\x1a3",
        "seven_stroke" => "\x1a4",
        "seven_high_fancy" => "\x1a5",
        "ten_high_std" => "\x1a6",
        "seven_shadow" => "\x1a7",
        "full_height_fancy" => "\x1a8",
        "full_height_std" => "\x1a9",
        "seven_shadow_fancy" => "\x1a:",
        "five_wide" => "\x1a;",
        "seven_wide" => "\x1a<",
        "seven_fancy_wide" => "\x1a=",
        "wide_stroke_five" => "\x1a>",
        _ => return None,
    })
}

/// Map a layout speed (1-5, slowest first) to its Alphasign speed code
pub fn speed_code(speed: u8) -> Option<&'static str> {
    Some(match speed {
        1 => "\x15",
        2 => "\x16",
        3 => "\x17",
        4 => "\x18",
        5 => "\x19",
        _ => return None,
    })
}

/// An allocated string file on the sign. Strings hold plain text that can be
/// rewritten at runtime without re-sending the text objects that call them.
#[derive(Debug, Clone)]
pub struct StringObject {
    pub label: char,
    pub data: String,
}

impl StringObject {
    pub fn new(label: char, data: impl Into<String>) -> Self {
        Self {
            label,
            data: data.into(),
        }
    }

    /// The control sequence a text object uses to display this string
    pub fn call(&self) -> String {
        format!("{}{}", CALL_STRING, self.label)
    }
}

/// An allocated text file on the sign. Text objects carry display mode and
/// formatting codes and are what the sign actually runs in its sequence.
#[derive(Debug, Clone)]
pub struct TextObject {
    pub label: char,
    pub data: String,
    pub mode: &'static str,
    pub priority: bool,
}

impl TextObject {
    pub fn new(label: char, data: impl Into<String>, mode: &'static str) -> Self {
        Self {
            label,
            data: data.into(),
            mode,
            priority: false,
        }
    }

    pub fn priority(mut self, priority: bool) -> Self {
        self.priority = priority;
        self
    }
}

/// The sign's internal clock. Once the time and display format are written
/// the sign keeps the clock current on its own.
#[derive(Debug, Clone)]
pub struct ClockObject {
    pub twenty_four_hour: bool,
}

impl ClockObject {
    pub fn new(twenty_four_hour: bool) -> Self {
        Self { twenty_four_hour }
    }

    /// The control sequence a text object uses to display the clock
    pub fn call(&self) -> String {
        CALL_CLOCK.to_string()
    }
}

/// Any object that can be allocated in, or written to, sign memory
#[derive(Debug, Clone)]
pub enum SignObject {
    Str(StringObject),
    Text(TextObject),
    Clock(ClockObject),
}

impl SignObject {
    pub fn label(&self) -> char {
        match self {
            SignObject::Str(s) => s.label,
            SignObject::Text(t) => {
                if t.priority {
                    PRIORITY_LABEL
                } else {
                    t.label
                }
            }
            // the clock lives in a fixed register, not a labelled file
            SignObject::Clock(_) => ' ',
        }
    }

    /// Raw command payloads that write this object's current contents.
    /// Transports wrap each payload in its own framing.
    pub fn frames(&self) -> Vec<String> {
        match self {
            SignObject::Str(s) => vec![format!("G{}{}", s.label, s.data)],
            SignObject::Text(t) => {
                let label = if t.priority { PRIORITY_LABEL } else { t.label };
                vec![format!("A{}\x1b {}{}", label, t.mode, t.data)]
            }
            SignObject::Clock(c) => {
                let now = chrono::Local::now();
                vec![
                    format!("E'{}", if c.twenty_four_hour { "M" } else { "S" }),
                    format!("E\x20{}", now.format("%H%M")),
                ]
            }
        }
    }

    /// The memory-configuration entry used by the allocate command,
    /// None for objects outside labelled memory
    fn alloc_entry(&self) -> Option<String> {
        match self {
            SignObject::Str(s) => Some(format!("{}BL{:04X}0000", s.label, STRING_SIZE)),
            SignObject::Text(t) => Some(format!("{}AU{:04X}FF00", t.label, t.data.len().max(64))),
            SignObject::Clock(_) => None,
        }
    }
}

/// The transport-level contract the update engine writes through. All calls
/// happen inside the device mutex held by the caller.
pub trait SignInterface: Send {
    fn connect(&mut self) -> Result<()>;
    fn disconnect(&mut self);
    fn clear_memory(&mut self) -> Result<()>;
    fn allocate(&mut self, objects: &[SignObject]) -> Result<()>;
    fn set_run_sequence(&mut self, objects: &[SignObject]) -> Result<()>;
    fn write(&mut self, object: &SignObject) -> Result<()>;
}

/// Build the memory allocation command for a set of objects
fn allocate_command(objects: &[SignObject]) -> String {
    let mut cmd = String::from("E$");
    for obj in objects {
        if let Some(entry) = obj.alloc_entry() {
            cmd.push_str(&entry);
        }
    }
    cmd
}

/// Build the run sequence command from text object labels
fn run_sequence_command(objects: &[SignObject]) -> String {
    let mut cmd = String::from("E.TU");
    for obj in objects {
        cmd.push(obj.label());
    }
    cmd
}

/// Strip Alphasign control sequences from a string so it can be logged
pub fn strip_control(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut chars = text.chars();

    while let Some(c) = chars.next() {
        match c {
            // color, font and string-call codes carry a one-character argument
            '\x1c' | '\x1a' | '\x10' => {
                chars.next();
            }
            // clock call and speed codes stand alone
            '\x13' | '\x15'..='\x19' => {}
            _ => out.push(c),
        }
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_string_call_sequence() {
        let s = StringObject::new('a', "Hello");
        assert_eq!(s.call(), "\x10a");
    }

    #[test]
    fn test_priority_text_uses_reserved_label() {
        let t = TextObject::new('A', "off", "b").priority(true);
        let frames = SignObject::Text(t).frames();
        assert!(frames[0].starts_with("A0"));
    }

    #[test]
    fn test_run_sequence_collects_labels() {
        let objs = vec![
            SignObject::Text(TextObject::new('A', "one", "a")),
            SignObject::Text(TextObject::new('B', "two", "b")),
        ];
        assert_eq!(run_sequence_command(&objs), "E.TUAB");
    }

    #[test]
    fn test_allocate_skips_clock() {
        let objs = vec![
            SignObject::Str(StringObject::new('a', "x")),
            SignObject::Clock(ClockObject::new(false)),
        ];
        let cmd = allocate_command(&objs);
        assert!(cmd.starts_with("E$aBL"));
        assert!(!cmd.contains('\x13'));
    }

    #[test]
    fn test_strip_control_removes_color_codes() {
        assert_eq!(strip_control("\x1c2Hello"), "Hello");
        assert_eq!(strip_control("\x1c2Hi \x10a\x13"), "Hi ");
    }

    #[test]
    fn test_unknown_mode_is_none() {
        assert!(mode_code("warp").is_none());
        assert_eq!(mode_code("rotate"), Some("a"));
    }
}
