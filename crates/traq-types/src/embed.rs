//! Message embed parsing.
//!
//! Clients embed references in message text as inline JSON objects prefixed
//! with `!`, for example:
//!
//! ```text
//! hello !{"type":"user","raw":"@alice","id":"5b8e...-..."}
//! ```
//!
//! [`parse`] extracts those references and renders the plain text that is
//! shown in notifications.

use once_cell::sync::Lazy;
use regex::{Captures, Regex};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

static EMBED_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r#"!(\{(?:[ \t\n]*"(?:[^"]|\\.)*"[ \t\n]*:[ \t\n]*"(?:[^"]|\\.)*",)*(?:[ \t\n]*"(?:[^"]|\\.)*"[ \t\n]*:[ \t\n]*"(?:[^"]|\\.)*")\})"#,
    )
    .expect("Invalid regex")
});

const ATTACHMENT_PLACEHOLDER: &str = "[attachment]";
const CITATION_PLACEHOLDER: &str = "[quoted message]";

#[derive(Deserialize)]
struct EmbedInfo {
    #[serde(default)]
    raw: String,
    #[serde(rename = "type")]
    kind: String,
    id: Uuid,
}

/// References extracted from a message.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParseResult {
    pub plain_text: String,
    pub mentions: Vec<Uuid>,
    pub group_mentions: Vec<Uuid>,
    pub tag_mentions: Vec<Uuid>,
    pub channel_links: Vec<Uuid>,
    pub attachments: Vec<Uuid>,
    pub citations: Vec<Uuid>,
}

impl ParseResult {
    /// Plain text with newlines collapsed into spaces.
    pub fn one_line(&self) -> String {
        self.plain_text.replace('\n', " ")
    }
}

/// Parses a message and extracts its embedded references.
pub fn parse(text: &str) -> ParseResult {
    let mut result = ParseResult::default();

    let plain = EMBED_REGEX.replace_all(text, |caps: &Captures| {
        let whole = caps.get(0).map(|m| m.as_str()).unwrap_or_default();
        let json = caps.get(1).map(|m| m.as_str()).unwrap_or_default();

        let info: EmbedInfo = match serde_json::from_str(json) {
            Ok(info) => info,
            Err(_) => return whole.to_string(),
        };

        match info.kind.as_str() {
            "user" => {
                result.mentions.push(info.id);
                info.raw
            }
            "group" => {
                result.group_mentions.push(info.id);
                info.raw
            }
            "tag" => {
                result.tag_mentions.push(info.id);
                info.raw
            }
            "channel" => {
                result.channel_links.push(info.id);
                info.raw
            }
            "file" => {
                result.attachments.push(info.id);
                ATTACHMENT_PLACEHOLDER.to_string()
            }
            "message" => {
                result.citations.push(info.id);
                CITATION_PLACEHOLDER.to_string()
            }
            _ => whole.to_string(),
        }
    });

    result.plain_text = plain.into_owned();
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_parse_user_mention() {
        let id = Uuid::new_v4();
        let text = format!(r#"hi !{{"type":"user","raw":"@alice","id":"{}"}} there"#, id);
        let result = parse(&text);

        assert_eq!(result.plain_text, "hi @alice there");
        assert_eq!(result.mentions, vec![id]);
        assert!(result.group_mentions.is_empty());
    }

    #[test]
    fn test_parse_mixed_embeds() {
        let user = Uuid::new_v4();
        let group = Uuid::new_v4();
        let tag = Uuid::new_v4();
        let file = Uuid::new_v4();
        let text = format!(
            concat!(
                r#"!{{"type":"user","raw":"@a","id":"{}"}} "#,
                r#"!{{"type":"group","raw":"@team","id":"{}"}} "#,
                r##"!{{"raw":"#tag","type":"tag","id":"{}"}}"##,
                "\n",
                r#"!{{"type":"file","raw":"","id":"{}"}}"#
            ),
            user, group, tag, file
        );
        let result = parse(&text);

        assert_eq!(result.mentions, vec![user]);
        assert_eq!(result.group_mentions, vec![group]);
        assert_eq!(result.tag_mentions, vec![tag]);
        assert_eq!(result.attachments, vec![file]);
        assert_eq!(result.one_line(), "@a @team #tag [attachment]");
    }

    #[test]
    fn test_parse_leaves_invalid_embeds() {
        let text = r#"!{"type":"user","raw":"@x","id":"not-a-uuid"} !{"type":"unknown","raw":"r","id":"00000000-0000-0000-0000-000000000000"}"#;
        let result = parse(text);
        assert_eq!(result.plain_text, text);
        assert!(result.mentions.is_empty());
    }

    proptest! {
        #[test]
        fn prop_text_without_embeds_is_unchanged(s in "[^!]*") {
            let result = parse(&s);
            prop_assert_eq!(result.plain_text, s);
            prop_assert!(result.mentions.is_empty());
        }
    }
}
