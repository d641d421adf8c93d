//! Post-processing of raw tooltip text returned by the vision model.

/// UI control-hint lines the model sometimes copies from the screenshot.
const BANNED_LINES: &[&str] = &[
    "SHIFT + LEFT CLICK TO UNEQUIP",
    "CTRL + LEFT CLICK TO MOVE",
    "SHIFT + LEFT CLICK TO EQUIP",
    "HOLD SHIFT TO COMPARE",
    "LEFT CLICK TO CAST",
    "KEEP IN INVENTORY TO GAIN BONUS",
    "CAN BE INSERTED INTO SOCKETED ITEMS",
];

pub const DEFAULT_CATEGORY: &str = "MISC";

/// Tooltip text with hint lines removed and the category tag split out.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Cleaned {
    pub text: String,
    pub category: String,
}

impl Cleaned {
    /// The stored record: text followed by a `[CATEGORY: X]` line, or empty when nothing survived.
    pub fn tagged(&self) -> String {
        if self.text.is_empty() {
            String::new()
        } else {
            format!("{}\n[CATEGORY: {}]", self.text, self.category)
        }
    }
}

pub fn clean_output(raw: &str) -> Cleaned {
    let mut lines = Vec::new();
    let mut category = DEFAULT_CATEGORY.to_string();

    for line in raw.lines() {
        let s = line.trim();
        if s.is_empty() {
            continue;
        }
        let upper = s.to_uppercase();
        if BANNED_LINES.contains(&upper.as_str()) {
            continue;
        }
        if let Some(tag) = parse_category(&upper) {
            if let Some(tag) = tag {
                category = tag;
            }
            continue;
        }
        lines.push(s);
    }

    Cleaned {
        text: lines.join("\n"),
        category,
    }
}

/// `None` if the line is not a category tag; `Some(None)` if it is a tag without a usable word.
fn parse_category(upper: &str) -> Option<Option<String>> {
    let inner = upper.strip_prefix("[CATEGORY:")?.strip_suffix(']')?;
    let word: String = inner
        .trim()
        .chars()
        .take_while(|c| c.is_alphanumeric() || *c == '_')
        .collect();
    Some((!word.is_empty()).then_some(word))
}
