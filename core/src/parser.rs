//! Stream Chunk Parser Module
//!
//! Splits streamed LLM output on the end-of-item sentinel and repairs the
//! JSON defects models commonly emit: markdown fences, bare `undefined`,
//! trailing commas, single-quoted strings, and unescaped inner quotes.

use anyhow::{anyhow, Context, Result};
use regex::Regex;
use std::sync::OnceLock;
use tracing::debug;

/// Exact end-of-item sentinel the writer prompt demands between items.
pub const END_OF_PROBLEM: &str = "<END_OF_PROBLEM>";

/// Result of splitting a complete raw stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedStream {
    /// Complete sentinel-terminated blocks, trimmed, in arrival order.
    pub blocks: Vec<String>,
    /// True when the stream ended mid-block.
    pub truncated: bool,
    /// The unterminated tail, present only when truncated.
    pub leftover: Option<String>,
}

/// Incremental splitter: feed deltas as they arrive, collect complete blocks,
/// and recover the unterminated tail at end of stream.
#[derive(Debug, Default)]
pub struct SentinelSplitter {
    buffer: String,
}

impl SentinelSplitter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Consume a delta and return every block completed by it, in order.
    pub fn feed(&mut self, delta: &str) -> Vec<String> {
        self.buffer.push_str(delta);
        let mut blocks = Vec::new();
        while let Some(pos) = self.buffer.find(END_OF_PROBLEM) {
            let block = self.buffer[..pos].trim().to_string();
            self.buffer.drain(..pos + END_OF_PROBLEM.len());
            if !block.is_empty() {
                blocks.push(block);
            }
        }
        blocks
    }

    /// End of stream: the non-empty remainder is a truncated block.
    pub fn finish(self) -> Option<String> {
        let tail = self.buffer.trim();
        if tail.is_empty() {
            None
        } else {
            Some(tail.to_string())
        }
    }
}

/// Split a fully-received stream into blocks plus an optional truncated tail.
pub fn split_stream(raw: &str) -> ParsedStream {
    let mut splitter = SentinelSplitter::new();
    let blocks = splitter.feed(raw);
    let leftover = splitter.finish();
    ParsedStream {
        blocks,
        truncated: leftover.is_some(),
        leftover,
    }
}

fn undefined_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r":\s*undefined").expect("static regex"))
}

fn trailing_comma_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r",(\s*[}\]])").expect("static regex"))
}

fn single_quote_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    // A single-quoted string directly after a structural character.
    RE.get_or_init(|| Regex::new(r#"([{\[,:]\s*)'((?:[^'\\]|\\.)*)'"#).expect("static regex"))
}

/// Remove markdown code fences around a block.
pub fn strip_fences(block: &str) -> String {
    let trimmed = block.trim();
    if !trimmed.starts_with("```") {
        return trimmed.to_string();
    }
    let mut body: Vec<&str> = trimmed.lines().collect();
    if !body.is_empty() {
        body.remove(0);
    }
    if body.last().map(|l| l.trim() == "```").unwrap_or(false) {
        body.pop();
    }
    body.join("\n").trim().to_string()
}

/// Escape double quotes inside string values.
///
/// Walks character by character; a `"` inside a string closes it only when
/// the next non-whitespace character is one of `,` `:` `}` `]` or end of
/// input. Anything else means the quote is content and gets escaped, which
/// preserves prompts like `what does the letter "m" represent?`.
pub fn escape_inner_quotes(block: &str) -> String {
    let chars: Vec<char> = block.chars().collect();
    let mut out = String::with_capacity(block.len());
    let mut in_string = false;
    let mut i = 0;
    while i < chars.len() {
        let c = chars[i];
        if !in_string {
            out.push(c);
            if c == '"' {
                in_string = true;
            }
        } else if c == '\\' {
            out.push(c);
            if i + 1 < chars.len() {
                out.push(chars[i + 1]);
                i += 1;
            }
        } else if c == '"' {
            let mut j = i + 1;
            while j < chars.len() && chars[j].is_whitespace() {
                j += 1;
            }
            let closes = j >= chars.len() || matches!(chars[j], ',' | ':' | '}' | ']');
            if closes {
                out.push('"');
                in_string = false;
            } else {
                out.push('\\');
                out.push('"');
            }
        } else {
            out.push(c);
        }
        i += 1;
    }
    out
}

/// Apply the full repair sequence to a raw block.
pub fn repair_json(block: &str) -> String {
    let defenced = strip_fences(block);
    let no_undefined = undefined_re().replace_all(&defenced, ": null");
    let requoted = single_quote_re().replace_all(&no_undefined, |caps: &regex::Captures| {
        let inner = caps[2].replace('"', "\\\"");
        format!("{}\"{}\"", &caps[1], inner)
    });
    let no_trailing = trailing_comma_re().replace_all(&requoted, "$1");
    escape_inner_quotes(&no_trailing)
}

/// Parse one item block, repairing defects if a direct parse fails.
pub fn parse_item_block(block: &str) -> Result<serde_json::Value> {
    let trimmed = block.trim();
    let value = match serde_json::from_str::<serde_json::Value>(trimmed) {
        Ok(v) => v,
        Err(first_err) => {
            let repaired = repair_json(trimmed);
            debug!("direct parse failed ({}), retrying after repair", first_err);
            serde_json::from_str::<serde_json::Value>(&repaired)
                .with_context(|| format!("unparseable item block: {}", truncate_for_log(trimmed)))?
        }
    };
    if value.is_object() {
        Ok(value)
    } else {
        Err(anyhow!("item block is not a JSON object"))
    }
}

/// Try to recover a truncated tail as a complete JSON object.
pub fn salvage_truncated(leftover: &str) -> Option<serde_json::Value> {
    parse_item_block(leftover).ok()
}

fn truncate_for_log(s: &str) -> String {
    if s.len() <= 120 {
        s.to_string()
    } else {
        let cut = s
            .char_indices()
            .take_while(|(i, _)| *i < 120)
            .last()
            .map(|(i, c)| i + c.len_utf8())
            .unwrap_or(0);
        format!("{}...", &s[..cut])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_round_trip_two_items() {
        let raw = "{\"a\": 1}\n<END_OF_PROBLEM>\n{\"b\": 2}\n<END_OF_PROBLEM>\n";
        let parsed = split_stream(raw);
        assert_eq!(parsed.blocks, vec!["{\"a\": 1}", "{\"b\": 2}"]);
        assert!(!parsed.truncated);
        assert!(parsed.leftover.is_none());
    }

    #[test]
    fn test_truncated_tail_reported_once() {
        let raw = "{\"a\": 1}\n<END_OF_PROBLEM>\n{\"b\": ";
        let parsed = split_stream(raw);
        assert_eq!(parsed.blocks.len(), 1);
        assert!(parsed.truncated);
        assert_eq!(parsed.leftover.as_deref(), Some("{\"b\":"));
    }

    #[test]
    fn test_splitter_handles_sentinel_across_deltas() {
        let mut splitter = SentinelSplitter::new();
        assert!(splitter.feed("{\"a\": 1}\n<END_OF_").is_empty());
        let blocks = splitter.feed("PROBLEM>\n{\"b\": 2}");
        assert_eq!(blocks, vec!["{\"a\": 1}"]);
        assert_eq!(splitter.finish().as_deref(), Some("{\"b\": 2}"));
    }

    #[test]
    fn test_strip_fences() {
        let fenced = "```json\n{\"a\": 1}\n```";
        assert_eq!(strip_fences(fenced), "{\"a\": 1}");
        assert_eq!(strip_fences("{\"a\": 1}"), "{\"a\": 1}");
    }

    #[test]
    fn test_repair_bare_undefined() {
        let v = parse_item_block("{\"options\": undefined, \"answer\": \"x\"}").unwrap();
        assert!(v["options"].is_null());
    }

    #[test]
    fn test_repair_trailing_comma() {
        let v = parse_item_block("{\"answer\": \"x\",}").unwrap();
        assert_eq!(v["answer"], "x");
    }

    #[test]
    fn test_repair_single_quotes() {
        let v = parse_item_block("{'prompt': 'Solve for x', 'answer': '4'}").unwrap();
        assert_eq!(v["prompt"], "Solve for x");
        assert_eq!(v["answer"], "4");
    }

    #[test]
    fn test_inner_quote_escaping_preserves_content() {
        let raw = r#"{"prompt": "In y = mx + b, what does the letter "m" represent?", "answer": "slope"}"#;
        let v = parse_item_block(raw).unwrap();
        assert_eq!(
            v["prompt"],
            "In y = mx + b, what does the letter \"m\" represent?"
        );
        assert_eq!(v["answer"], "slope");
    }

    #[test]
    fn test_escaped_quotes_pass_through() {
        let raw = r#"{"prompt": "already \"escaped\" here", "answer": "ok"}"#;
        let v = parse_item_block(raw).unwrap();
        assert_eq!(v["prompt"], "already \"escaped\" here");
    }

    #[test]
    fn test_salvage_valid_tail() {
        assert!(salvage_truncated("{\"prompt\": \"p\", \"answer\": \"a\"}").is_some());
        assert!(salvage_truncated("{\"prompt\": \"p\", \"ans").is_none());
    }

    #[test]
    fn test_non_object_block_rejected() {
        assert!(parse_item_block("[1, 2, 3]").is_err());
        assert!(parse_item_block("\"just a string\"").is_err());
    }
}
