//! Changelog rendering.
//!
//! Every renderer is a pure function of its inputs. Channel adapters consume
//! the output opaquely: plain text, a chat block payload, escaped markup, or
//! Markdown with issue links.

use std::collections::BTreeMap;

use regex::Regex;
use serde::Serialize;

/// One filtered, deduplicated commit subject with its references.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChangelogEntry {
    /// Commit subject, possibly with the message key stripped.
    pub subject: String,
    /// Distinct references found in the subject, in match order.
    pub references: Vec<String>,
}

impl ChangelogEntry {
    /// Entry without references.
    pub fn new(subject: impl Into<String>) -> Self {
        Self {
            subject: subject.into(),
            references: Vec::new(),
        }
    }
}

const BULLET: &str = "• ";
const ELLIPSIS: char = '…';

/// Subjects joined by newlines, without a trailing newline.
pub fn render_plain_text(entries: &[ChangelogEntry]) -> String {
    entries
        .iter()
        .map(|e| e.subject.as_str())
        .collect::<Vec<_>>()
        .join("\n")
}

// ---------------------------------------------------------------------------
// Chat blocks
// ---------------------------------------------------------------------------

/// Size caps imposed by chat services.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChatLimits {
    /// Sections rendered before the rest are summarized.
    pub max_entries: usize,
    /// Characters per section, counted after escaping and including the
    /// ellipsis.
    pub max_chars_per_entry: usize,
}

impl Default for ChatLimits {
    fn default() -> Self {
        Self {
            max_entries: 50,
            max_chars_per_entry: 3000,
        }
    }
}

/// Text object inside a block.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChatText {
    /// How the chat service interprets `text`.
    #[serde(rename = "type")]
    pub kind: TextKind,
    /// The text itself.
    pub text: String,
}

/// Text object flavor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TextKind {
    /// Shown verbatim.
    PlainText,
    /// Slack mrkdwn, escaped.
    Mrkdwn,
}

impl ChatText {
    fn plain(text: impl Into<String>) -> Self {
        Self {
            kind: TextKind::PlainText,
            text: text.into(),
        }
    }

    fn mrkdwn(text: impl Into<String>) -> Self {
        Self {
            kind: TextKind::Mrkdwn,
            text: text.into(),
        }
    }
}

/// One block of a chat payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ChatBlock {
    /// Title line.
    Header {
        /// Header text.
        text: ChatText,
    },
    /// One changelog entry.
    Section {
        /// Entry text.
        text: ChatText,
    },
    /// Small print, used for the omitted-entries marker.
    Context {
        /// Context texts.
        elements: Vec<ChatText>,
    },
}

/// A block-list payload, ready to be wrapped by a chat adapter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChatPayload {
    /// Blocks in display order.
    pub blocks: Vec<ChatBlock>,
    /// Entries left out because of `max_entries`.
    #[serde(skip)]
    pub omitted: usize,
}

impl ChatPayload {
    /// Prepend a header block.
    #[must_use]
    pub fn with_header(mut self, title: impl Into<String>) -> Self {
        self.blocks.insert(
            0,
            ChatBlock::Header {
                text: ChatText::plain(title),
            },
        );
        self
    }

    /// Number of section blocks, one per rendered entry.
    pub fn section_count(&self) -> usize {
        self.blocks
            .iter()
            .filter(|b| matches!(b, ChatBlock::Section { .. }))
            .count()
    }
}

/// Render entries as chat blocks within `limits`.
///
/// Long entries are cut with an ellipsis after escaping, never inside an
/// escape sequence. When entries are dropped a trailing context block says
/// how many.
pub fn render_chat_blocks(entries: &[ChangelogEntry], limits: ChatLimits) -> ChatPayload {
    let rules = EscapeRules::slack_mrkdwn();
    let mut blocks: Vec<ChatBlock> = entries
        .iter()
        .take(limits.max_entries)
        .map(|e| ChatBlock::Section {
            text: ChatText::mrkdwn(rules.escape_within(&e.subject, limits.max_chars_per_entry)),
        })
        .collect();

    let omitted = entries.len().saturating_sub(limits.max_entries);
    if omitted > 0 {
        blocks.push(ChatBlock::Context {
            elements: vec![ChatText::plain(format!("{ELLIPSIS} and {omitted} more"))],
        });
    }

    ChatPayload { blocks, omitted }
}

// ---------------------------------------------------------------------------
// Markup
// ---------------------------------------------------------------------------

/// Reserved character → escape sequence for a target markup.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EscapeRules {
    rules: BTreeMap<char, String>,
}

impl EscapeRules {
    /// Rules from an explicit table.
    pub fn new(rules: BTreeMap<char, String>) -> Self {
        Self { rules }
    }

    /// Telegram MarkdownV2: every reserved character gets a backslash.
    pub fn telegram_markdown_v2() -> Self {
        "\\_*[]()~`>#+-=|{}.!"
            .chars()
            .map(|c| (c, format!("\\{c}")))
            .collect()
    }

    /// Slack mrkdwn control characters.
    pub fn slack_mrkdwn() -> Self {
        [('&', "&amp;"), ('<', "&lt;"), ('>', "&gt;")]
            .into_iter()
            .map(|(c, s)| (c, s.to_string()))
            .collect()
    }

    /// HTML entities, including both quote characters.
    pub fn html() -> Self {
        [
            ('&', "&amp;"),
            ('<', "&lt;"),
            ('>', "&gt;"),
            ('"', "&quot;"),
            ('\'', "&#39;"),
        ]
        .into_iter()
        .map(|(c, s)| (c, s.to_string()))
        .collect()
    }

    /// Add or replace a rule.
    pub fn insert(&mut self, reserved: char, escaped: impl Into<String>) {
        self.rules.insert(reserved, escaped.into());
    }

    /// True when nothing is escaped.
    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Replace every reserved character with its escape sequence.
    pub fn escape(&self, text: &str) -> String {
        let mut out = String::with_capacity(text.len());
        for c in text.chars() {
            self.push_escaped(&mut out, c);
        }
        out
    }

    /// Escape `text` into at most `max` characters.
    ///
    /// Overlong output keeps whole escape sequences and ends in `…`.
    pub fn escape_within(&self, text: &str, max: usize) -> String {
        let escaped = self.escape(text);
        if escaped.chars().count() <= max {
            return escaped;
        }

        let budget = max.saturating_sub(1);
        let mut out = String::new();
        let mut used = 0;
        for c in text.chars() {
            let width = self.rules.get(&c).map_or(1, |s| s.chars().count());
            if used + width > budget {
                break;
            }
            self.push_escaped(&mut out, c);
            used += width;
        }
        out.push(ELLIPSIS);
        out
    }

    fn push_escaped(&self, out: &mut String, c: char) {
        match self.rules.get(&c) {
            Some(escaped) => out.push_str(escaped),
            None => out.push(c),
        }
    }
}

impl FromIterator<(char, String)> for EscapeRules {
    fn from_iter<I: IntoIterator<Item = (char, String)>>(iter: I) -> Self {
        Self {
            rules: iter.into_iter().collect(),
        }
    }
}

/// Escape each entry and join as a bulleted list. The bullet is not escaped.
pub fn render_markup(entries: &[ChangelogEntry], rules: &EscapeRules) -> String {
    entries
        .iter()
        .map(|e| format!("{BULLET}{}", rules.escape(&e.subject)))
        .collect::<Vec<_>>()
        .join("\n")
}

// ---------------------------------------------------------------------------
// Markdown
// ---------------------------------------------------------------------------

/// Bulleted Markdown list; references become `[KEY](<prefix>KEY)` links when
/// a prefix is given.
pub fn render_markdown(entries: &[ChangelogEntry], issue_url_prefix: Option<&str>) -> String {
    entries
        .iter()
        .map(|e| match issue_url_prefix {
            Some(prefix) => format!("- {}", link_references(e, prefix)),
            None => format!("- {}", e.subject),
        })
        .collect::<Vec<_>>()
        .join("\n")
}

fn link_references(entry: &ChangelogEntry, prefix: &str) -> String {
    if entry.references.is_empty() {
        return entry.subject.clone();
    }

    // Longest first so `PROJ-12` wins over `PROJ-1`.
    let mut refs: Vec<&str> = entry.references.iter().map(String::as_str).collect();
    refs.sort_by_key(|r| std::cmp::Reverse(r.len()));
    let alternation = refs
        .iter()
        .map(|r| regex::escape(r))
        .collect::<Vec<_>>()
        .join("|");

    match Regex::new(&alternation) {
        Ok(re) => re
            .replace_all(&entry.subject, |caps: &regex::Captures<'_>| {
                format!("[{0}]({prefix}{0})", &caps[0])
            })
            .into_owned(),
        Err(_) => entry.subject.clone(),
    }
}
