use serde_json::Value;

use super::Entry;

const TERMINAL_PUNCTUATION: &[char] = &['?', ';', ':', '\\', '.', ',', '!'];

/// Turn a raw log message into the text shown in Splunk: capitalized, one
/// trailing punctuation mark removed, `{Name}` placeholders filled from
/// `properties`, then wrapped in `envelope` (`%v` marks the message).
pub fn format_message(raw: &str, properties: &Entry, envelope: Option<&str>) -> String {
    let message = render_template(strip_terminal_punctuation(&capitalize(raw)), properties);
    match envelope {
        Some(envelope) => envelope.replacen("%v", &message, 1),
        None => message,
    }
}

fn capitalize(raw: &str) -> String {
    let mut chars = raw.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

fn strip_terminal_punctuation(message: &str) -> &str {
    if message.chars().nth(1).is_none() {
        return message;
    }
    message
        .strip_suffix(TERMINAL_PUNCTUATION)
        .unwrap_or(message)
}

/// Unknown placeholders and unmatched braces are kept verbatim.
fn render_template(template: &str, properties: &Entry) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;
    while let Some(start) = rest.find('{') {
        out.push_str(&rest[..start]);
        let after = &rest[start + 1..];
        let Some(end) = after.find('}') else {
            out.push_str(&rest[start..]);
            return out;
        };
        let name = &after[..end];
        match properties.get(name) {
            Some(Value::String(s)) => out.push_str(s),
            Some(other) => out.push_str(&other.to_string()),
            None => {
                out.push('{');
                out.push_str(name);
                out.push('}');
            }
        }
        rest = &after[end + 1..];
    }
    out.push_str(rest);
    out
}
