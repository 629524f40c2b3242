//! Best-effort interpreter for raw game output.
//!
//! Everything here is a heuristic tuned to Zork I's prose. Extractors never
//! fail: unexpected text yields `None`/empty/false, not an error. The
//! compiled patterns and phrase tables live on [`GameParser`] so there is no
//! process-wide mutable state.

use regex::Regex;
use serde::{Deserialize, Serialize};

/// Game-semantic conditions surfaced by one chunk of output. Death and
/// victory are independent heuristics and may both be set; the session loop's
/// check order (victory first) is the tie-break.
#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq, Eq)]
pub struct GameFlags {
    pub is_death: bool,
    pub is_victory: bool,
    pub is_command_error: bool,
}

/// Immutable snapshot of everything we could extract from one chunk of game
/// output since the last prompt marker.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct GameState {
    pub raw_text: String,
    pub cleaned_text: String,
    /// `(current, max)` from the score banner, if present.
    pub score: Option<(u32, u32)>,
    pub moves: Option<u32>,
    /// Heuristic title-line guess; no correctness guarantee.
    pub location: Option<String>,
    /// Item names in printed order.
    pub inventory: Vec<String>,
    pub flags: GameFlags,
}

/// Phrases that mark the player's death. Stored lowercase and matched
/// against lowercased text.
const DEATH_PHRASES: &[&str] = &[
    "***** you have died *****",
    "it is now pitch black",
    "you have been eaten by a grue",
];

/// Phrases the game prints when it refuses a command.
const REFUSAL_PHRASES: &[&str] = &[
    "i don't understand",
    "i don't know the word",
    "that doesn't make sense",
    "you can't see any",
    "i don't see that here",
];

/// Sentence openers that disqualify a line as a location title.
const NARRATIVE_OPENERS: &[&str] = &["You ", "The ", "There ", "It ", "A ", "An "];

/// Prefixes that mark an inventory item line.
const ITEM_PREFIXES: &[&str] = &["- ", "A ", "An ", "The "];

/// Stateless analyzer for raw interpreter output.
#[derive(Debug)]
pub struct GameParser {
    score_re: Regex,
    moves_re: Regex,
    ansi_re: Regex,
    blank_run_re: Regex,
}

impl Default for GameParser {
    fn default() -> Self {
        Self::new()
    }
}

impl GameParser {
    pub fn new() -> Self {
        Self {
            score_re: Regex::new(r"Your score is (\d+) \(total of (\d+) points\)")
                .expect("hardcoded pattern"),
            moves_re: Regex::new(r"in (\d+) moves?").expect("hardcoded pattern"),
            ansi_re: Regex::new(r"\x1b\[[0-9;]*m").expect("hardcoded pattern"),
            blank_run_re: Regex::new(r"\n\s*\n\s*\n").expect("hardcoded pattern"),
        }
    }

    /// Full-state summary: bundles every extractor plus the cleaned text.
    pub fn interpret(&self, raw: &str) -> GameState {
        GameState {
            raw_text: raw.to_string(),
            cleaned_text: self.clean_output(raw),
            score: self.extract_score(raw),
            moves: self.extract_moves(raw),
            location: self.extract_location(raw),
            inventory: self.parse_inventory(raw),
            flags: GameFlags {
                is_death: self.is_death(raw),
                is_victory: self.is_victory(raw),
                is_command_error: self.is_command_error(raw),
            },
        }
    }

    /// Matches the `Your score is N (total of M points)` banner.
    pub fn extract_score(&self, text: &str) -> Option<(u32, u32)> {
        let caps = self.score_re.captures(text)?;
        let current = caps.get(1)?.as_str().parse().ok()?;
        let max = caps.get(2)?.as_str().parse().ok()?;
        Some((current, max))
    }

    /// Matches `in N move(s)`.
    pub fn extract_moves(&self, text: &str) -> Option<u32> {
        let caps = self.moves_re.captures(text)?;
        caps.get(1)?.as_str().parse().ok()
    }

    pub fn is_death(&self, text: &str) -> bool {
        let lower = text.to_lowercase();
        DEATH_PHRASES.iter().any(|p| lower.contains(p))
    }

    /// Coarse by design: "350" can appear incidentally. Accepted heuristic,
    /// not a bug to fix here.
    pub fn is_victory(&self, text: &str) -> bool {
        text.to_lowercase().contains("congratulations") || text.contains("350")
    }

    pub fn is_command_error(&self, text: &str) -> bool {
        let lower = text.to_lowercase();
        REFUSAL_PHRASES.iter().any(|p| lower.contains(p))
    }

    /// Strips ANSI escapes, collapses runs of 3+ newlines to exactly 2, and
    /// trims the ends.
    pub fn clean_output(&self, text: &str) -> String {
        let text = self.ansi_re.replace_all(text, "");
        let text = self.blank_run_re.replace_all(&text, "\n\n");
        text.trim().to_string()
    }

    /// Scans the first few lines for something that reads like a room title:
    /// starts uppercase, short, and not a narrative sentence. A line ending
    /// in terminal punctuation only qualifies if it is very short and within
    /// the first two lines.
    pub fn extract_location(&self, text: &str) -> Option<String> {
        for (i, line) in text.lines().take(5).enumerate() {
            let line = line.trim();
            if line.is_empty() || line.len() >= 60 {
                continue;
            }
            let starts_upper = line
                .chars()
                .next()
                .map(char::is_uppercase)
                .unwrap_or(false);
            if !starts_upper {
                continue;
            }
            if NARRATIVE_OPENERS.iter().any(|p| line.starts_with(p)) {
                continue;
            }
            if line.ends_with(['.', '!', '?']) {
                if line.len() < 30 && i < 2 {
                    return Some(line.trim_end_matches(['.', '!', '?']).to_string());
                }
                continue;
            }
            return Some(line.to_string());
        }
        None
    }

    /// Collects item lines following a "you are carrying"/"you have"
    /// trigger. Lines starting with an article or bullet are items; the
    /// first line not starting with an uppercase letter ends the list.
    pub fn parse_inventory(&self, text: &str) -> Vec<String> {
        let lower = text.to_lowercase();
        if !lower.contains("you are carrying") && !lower.contains("you have") {
            return Vec::new();
        }

        let mut items = Vec::new();
        let mut in_list = false;
        for line in text.lines() {
            let line_lower = line.to_lowercase();
            if line_lower.contains("you are carrying") || line_lower.contains("you have") {
                in_list = true;
                continue;
            }
            if !in_list {
                continue;
            }
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            let item = ITEM_PREFIXES
                .iter()
                .find_map(|p| line.strip_prefix(p));
            if let Some(item) = item {
                items.push(item.trim().to_string());
            } else if !line.chars().next().map(char::is_uppercase).unwrap_or(false) {
                break;
            }
        }
        items
    }
}
