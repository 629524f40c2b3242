//! Normalizes a raw candidate command (from a script line or an LLM
//! completion) into a single clean imperative command.

/// Quote/punctuation characters trimmed from both ends of a candidate.
const EDGE_CHARS: &[char] = &['"', '\'', '.', ',', '!', '?'];

/// Filler the model tends to prepend. Checked in order, one pass: after a
/// prefix is removed the lowercase view is re-derived and the *remaining*
/// prefixes in the list are still checked against the updated string.
const FILLER_PREFIXES: &[&str] = &[
    "command:", "next:", "i will", "i'll", "i would", "let me", "let's", "okay,", "ok,", "sure,",
    "response:",
];

const MAX_COMMAND_LEN: usize = 100;
const DEFAULT_COMMAND: &str = "look";

/// Total function: always yields a sendable command, defaulting to `look`
/// when nothing survives cleaning.
pub fn sanitize(candidate: &str) -> String {
    let mut command = candidate
        .trim()
        .trim_matches(|c: char| EDGE_CHARS.contains(&c))
        .to_string();

    let mut lower = command.to_lowercase();
    for prefix in FILLER_PREFIXES {
        if lower.starts_with(prefix) {
            command = command
                .get(prefix.len()..)
                .unwrap_or("")
                .trim()
                .to_string();
            lower = command.to_lowercase();
        }
    }

    command = command.lines().next().unwrap_or("").trim().to_string();

    if command.len() > MAX_COMMAND_LEN {
        let mut end = MAX_COMMAND_LEN;
        while !command.is_char_boundary(end) {
            end -= 1;
        }
        command.truncate(end);
        // The cut may land on whitespace or punctuation; re-trim the tail.
        command = command
            .trim_end_matches(|c: char| c.is_whitespace() || EDGE_CHARS.contains(&c))
            .to_string();
    }

    if command.is_empty() {
        DEFAULT_COMMAND.to_string()
    } else {
        command
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_surrounding_quotes() {
        assert_eq!(sanitize("\"north\""), "north");
        assert_eq!(sanitize("'take lamp'"), "take lamp");
    }

    #[test]
    fn strips_filler_prefixes() {
        assert_eq!(sanitize("Command: take lamp"), "take lamp");
        assert_eq!(sanitize("I will go north."), "go north");
        assert_eq!(sanitize("Okay, I'll open the mailbox"), "open the mailbox");
    }

    #[test]
    fn later_prefix_then_earlier_one_is_not_rescanned() {
        // "okay," is after "i will" in the list, so the single pass strips
        // "okay," but leaves the now-leading "I will" alone.
        assert_eq!(sanitize("Okay, I will go north"), "I will go north");
    }

    #[test]
    fn keeps_only_the_first_line() {
        assert_eq!(sanitize("north\nthen I will go east"), "north");
    }

    #[test]
    fn truncates_long_commands() {
        let long = "go ".repeat(60);
        assert_eq!(sanitize(&long).len(), 100);
    }

    #[test]
    fn empty_input_defaults_to_look() {
        assert_eq!(sanitize(""), "look");
        assert_eq!(sanitize("   "), "look");
        assert_eq!(sanitize("\"...\""), "look");
    }

    #[test]
    fn clean_commands_pass_through_unchanged() {
        for raw in ["north", "take lamp", "look", "attack troll with sword"] {
            assert_eq!(sanitize(raw), raw);
        }
    }

    #[test]
    fn resanitizing_a_cleaned_command_changes_nothing() {
        let long = "go ".repeat(60);
        for raw in [
            "\"north\"",
            "Command: take lamp",
            "I will go north.",
            "",
            "   ",
            "examine troll\nattack troll",
            long.as_str(),
        ] {
            let once = sanitize(raw);
            assert_eq!(sanitize(&once), once, "input {raw:?}");
        }
    }
}
