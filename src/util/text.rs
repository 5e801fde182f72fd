use std::borrow::Cow;

const RTL_PREFIX: &str = "<div style=\"direction:rtl;text-align:right\">";
const RTL_SUFFIX: &str = "</div>";

fn is_stripped_control(c: char) -> bool {
    c.is_control() && !matches!(c, '\t' | '\n' | '\r')
}

/// SEC-001: Strip control characters and ANSI escape sequences from remote text.
///
/// Folder and feed names come straight from the remote service and are later
/// printed to a terminal by the CLI. Tab, newline and carriage return are kept.
///
/// Returns `Cow::Borrowed` when the input is already clean.
pub fn strip_control_chars(s: &str) -> Cow<'_, str> {
    if !s.chars().any(is_stripped_control) {
        return Cow::Borrowed(s);
    }

    let mut out = String::with_capacity(s.len());
    let mut chars = s.chars().peekable();

    while let Some(c) = chars.next() {
        if c != '\x1b' {
            if !is_stripped_control(c) {
                out.push(c);
            }
            continue;
        }
        match chars.peek() {
            // CSI: parameters until a final byte in 0x40..=0x7e
            Some('[') => {
                chars.next();
                for c in chars.by_ref() {
                    if ('\x40'..='\x7e').contains(&c) {
                        break;
                    }
                }
            }
            // OSC: until BEL or ST
            Some(']') => {
                chars.next();
                while let Some(c) = chars.next() {
                    if c == '\x07' {
                        break;
                    }
                    if c == '\x1b' && chars.peek() == Some(&'\\') {
                        chars.next();
                        break;
                    }
                }
            }
            _ => {}
        }
    }

    Cow::Owned(out)
}

/// Remove the right-to-left wrapper `<div style="direction:rtl;text-align:right">…</div>`
/// that the remote adds around titles and summaries in RTL languages.
pub fn strip_rtl_wrapper(s: &str) -> Cow<'_, str> {
    match s.strip_prefix(RTL_PREFIX).and_then(|rest| rest.strip_suffix(RTL_SUFFIX)) {
        Some(inner) => Cow::Borrowed(inner),
        None => Cow::Borrowed(s),
    }
}

/// Normalize a folder or feed name received from the remote.
pub fn sanitize_name(s: &str) -> String {
    let unwrapped = strip_rtl_wrapper(s);
    strip_control_chars(&unwrapped).trim().to_string()
}
