//! Make build output safe to paint inside the dashboard region.
//!
//! Compiler and tool diagnostics often carry colour codes, cursor movement,
//! window-title sequences or embedded newlines. Any of those would move the
//! cursor out of the region the redraw loop owns, so they are removed and the
//! text is collapsed onto a single line.

pub const MAX_MESSAGE_CHARS: usize = 2048;

const TRUNCATED_MARKER: &str = " ...";

#[derive(Clone, Copy)]
enum Escape {
    /// Just saw ESC.
    Start,
    /// `ESC [` ... final byte in `@..=~`.
    Csi,
    /// `ESC ]` ... BEL or `ESC \`.
    Osc { saw_esc: bool },
    /// DCS / SOS / PM / APC, terminated by `ESC \`.
    String { saw_esc: bool },
}

/// Strip escape sequences and control characters, fold tabs and line breaks
/// into spaces, and cap the result at `MAX_MESSAGE_CHARS` characters.
pub fn sanitize_message(input: &str) -> String {
    sanitize_message_to(input, MAX_MESSAGE_CHARS)
}

pub fn sanitize_message_to(input: &str, max_chars: usize) -> String {
    let mut out = String::with_capacity(input.len().min(max_chars));
    let mut escape: Option<Escape> = None;
    let mut kept = 0usize;
    let mut pending_space = false;

    for c in input.chars() {
        if let Some(state) = escape {
            escape = match (state, c) {
                (Escape::Start, '[') => Some(Escape::Csi),
                (Escape::Start, ']') => Some(Escape::Osc { saw_esc: false }),
                (Escape::Start, 'P' | 'X' | '^' | '_') => Some(Escape::String { saw_esc: false }),
                (Escape::Start, _) => None,
                (Escape::Csi, c) if ('@'..='~').contains(&c) => None,
                (Escape::Csi, _) => Some(Escape::Csi),
                (Escape::Osc { .. }, '\x07') => None,
                (Escape::Osc { saw_esc: true }, '\\') => None,
                (Escape::Osc { .. }, '\x1b') => Some(Escape::Osc { saw_esc: true }),
                (Escape::Osc { .. }, _) => Some(Escape::Osc { saw_esc: false }),
                (Escape::String { saw_esc: true }, '\\') => None,
                (Escape::String { .. }, '\x1b') => Some(Escape::String { saw_esc: true }),
                (Escape::String { .. }, _) => Some(Escape::String { saw_esc: false }),
            };
            continue;
        }

        match c {
            '\x1b' => {
                escape = Some(Escape::Start);
                continue;
            }
            '\t' | '\r' | '\n' => {
                pending_space = !out.is_empty();
                continue;
            }
            ' ' if pending_space => continue,
            c if c.is_control() || is_bidi_control(c) => continue,
            _ => {}
        }

        if pending_space && !out.ends_with(' ') {
            if kept >= max_chars {
                out.push_str(TRUNCATED_MARKER);
                return out;
            }
            out.push(' ');
            kept += 1;
        }
        pending_space = false;

        if kept >= max_chars {
            out.push_str(TRUNCATED_MARKER);
            return out;
        }
        out.push(c);
        kept += 1;
    }

    out
}

fn is_bidi_control(c: char) -> bool {
    matches!(c, '\u{061C}' | '\u{200E}' | '\u{200F}')
        || ('\u{202A}'..='\u{202E}').contains(&c)
        || ('\u{2066}'..='\u{2069}').contains(&c)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_colour_and_title_sequences() {
        let input = "\u{1b}[1;31merror\u{1b}[0m CS1002: \u{1b}]0;msbuild\u{7}; expected";
        assert_eq!(sanitize_message(input), "error CS1002: ; expected");
    }

    #[test]
    fn strips_device_control_strings() {
        assert_eq!(sanitize_message("a\u{1b}Pq#0;payload\u{1b}\\b"), "ab");
    }

    #[test]
    fn folds_line_breaks_into_one_line() {
        assert_eq!(
            sanitize_message("warning: unused\r\n  --> src/lib.rs:3\n\n"),
            "warning: unused --> src/lib.rs:3"
        );
        assert_eq!(sanitize_message("\n\tleading"), "leading");
    }

    #[test]
    fn drops_bidi_overrides() {
        assert_eq!(sanitize_message("ok\u{202e}txt.exe"), "oktxt.exe");
    }

    #[test]
    fn long_messages_are_truncated() {
        let got = sanitize_message_to("abcdefgh", 4);
        assert_eq!(got, "abcd ...");
        assert_eq!(sanitize_message_to("abcd", 4), "abcd");
    }
}
