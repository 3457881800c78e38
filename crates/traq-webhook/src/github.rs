//! Rendering GitHub webhook deliveries into chat messages.

use crate::error::WebhookError;
use crate::Result;
use once_cell::sync::Lazy;
use regex::{Captures, Regex};
use serde::Deserialize;
use serde_json::Value;
use std::collections::HashMap;
use std::path::Path;

/// Header naming the GitHub event.
pub const GITHUB_EVENT_HEADER: &str = "X-GitHub-Event";

static BUILTIN_TEMPLATES: &str = include_str!("../templates/github.yaml");

static PLACEHOLDER_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\{(len:)?([A-Za-z0-9_.]+)(?::(\d+))?\}").expect("Invalid regex")
});

#[derive(Debug, Clone, Deserialize)]
pub struct Template {
    pub text: String,
    #[serde(default)]
    pub each: Option<Repeat>,
}

/// A line repeated for every element of an array in the payload.
#[derive(Debug, Clone, Deserialize)]
pub struct Repeat {
    pub items: String,
    pub line: String,
}

/// Templates keyed by event name, then by action.
#[derive(Debug, Clone, Default)]
pub struct TemplateSet {
    events: HashMap<String, HashMap<String, Template>>,
}

impl TemplateSet {
    pub fn from_yaml(source: &str) -> Result<Self> {
        let events = serde_yaml::from_str(source).map_err(|e| WebhookError::Template(e.to_string()))?;
        Ok(Self { events })
    }

    /// The templates shipped with the server.
    pub fn builtin() -> Result<Self> {
        Self::from_yaml(BUILTIN_TEMPLATES)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let source = std::fs::read_to_string(path)
            .map_err(|e| WebhookError::Template(format!("{}: {e}", path.display())))?;
        Self::from_yaml(&source)
    }

    /// Whether `event` is listed, even without templates.
    pub fn knows(&self, event: &str) -> bool {
        self.events.contains_key(event)
    }

    /// Message text for a delivery, or `None` when the event or action has
    /// no template or renders to nothing.
    pub fn render(&self, event: &str, payload: &Value) -> Option<String> {
        let templates = self.events.get(event)?;
        let action = action(event, payload);
        let template = templates.get(action.as_str()).or_else(|| templates.get("*"))?;

        let mut text = fill(&template.text, payload);
        if let Some(each) = &template.each {
            if let Some(Value::Array(items)) = lookup(payload, &each.items) {
                for item in items {
                    text.push_str(&fill(&each.line, item));
                }
            }
        }
        (!text.trim().is_empty()).then_some(text)
    }
}

/// The action a template is chosen by. Merged pull requests close with
/// `merged: true` and get their own action.
fn action(event: &str, payload: &Value) -> String {
    let action = payload
        .get("action")
        .and_then(Value::as_str)
        .unwrap_or_default();
    let merged = lookup(payload, "pull_request.merged")
        .and_then(Value::as_bool)
        .unwrap_or(false);
    if event == "pull_request" && action == "closed" && merged {
        return "merged".to_string();
    }
    action.to_string()
}

fn lookup<'a>(value: &'a Value, path: &str) -> Option<&'a Value> {
    path.split('.').try_fold(value, |v, key| v.get(key))
}

fn fill(template: &str, scope: &Value) -> String {
    PLACEHOLDER_REGEX
        .replace_all(template, |caps: &Captures| {
            let path = caps.get(2).map(|m| m.as_str()).unwrap_or_default();
            let value = lookup(scope, path);
            if caps.get(1).is_some() {
                return value
                    .and_then(Value::as_array)
                    .map(|a| a.len())
                    .unwrap_or(0)
                    .to_string();
            }
            let text = match value {
                Some(Value::String(s)) => s.clone(),
                Some(Value::Number(n)) => n.to_string(),
                Some(Value::Bool(b)) => b.to_string(),
                _ => String::new(),
            };
            match caps.get(3).and_then(|m| m.as_str().parse::<usize>().ok()) {
                Some(limit) => text.chars().take(limit).collect(),
                None => text,
            }
        })
        .into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn repository() -> Value {
        json!({ "full_name": "traP/traQ", "html_url": "https://github.com/traP/traQ" })
    }

    #[test]
    fn test_builtin_templates_load() {
        let set = TemplateSet::builtin().unwrap();
        for event in ["ping", "push", "issues", "pull_request", "release"] {
            assert!(set.knows(event), "{event}");
        }
        assert!(!set.knows("fork"));
    }

    #[test]
    fn test_ping_renders_nothing() {
        let set = TemplateSet::builtin().unwrap();
        assert_eq!(set.render("ping", &json!({ "zen": "Keep it simple." })), None);
    }

    #[test]
    fn test_issue_opened() {
        let set = TemplateSet::builtin().unwrap();
        let payload = json!({
            "action": "opened",
            "issue": { "title": "Crash", "html_url": "https://github.com/traP/traQ/issues/1" },
            "repository": repository(),
        });
        assert_eq!(
            set.render("issues", &payload).unwrap(),
            "## Issue Opened\n[traP/traQ](https://github.com/traP/traQ) - [Crash](https://github.com/traP/traQ/issues/1)"
        );

        let labeled = json!({ "action": "labeled", "repository": repository() });
        assert_eq!(set.render("issues", &labeled), None);
    }

    #[test]
    fn test_pull_request_merged() {
        let set = TemplateSet::builtin().unwrap();
        let payload = json!({
            "action": "closed",
            "pull_request": { "title": "Fix", "html_url": "https://github.com/traP/traQ/pull/2", "merged": true },
            "repository": repository(),
        });
        assert!(set
            .render("pull_request", &payload)
            .unwrap()
            .starts_with("## PullRequest Merged\n"));
    }

    #[test]
    fn test_push_lists_commits() {
        let set = TemplateSet::builtin().unwrap();
        let payload = json!({
            "ref": "refs/heads/master",
            "compare": "https://github.com/traP/traQ/compare/a...b",
            "pusher": { "name": "alice" },
            "repository": repository(),
            "commits": [
                { "id": "0123456789abcdef", "url": "https://github.com/c/1", "message": "first" },
                { "id": "fedcba9876543210", "url": "https://github.com/c/2", "message": "second" },
            ],
        });
        let text = set.render("push", &payload).unwrap();
        assert!(text.starts_with("## 2 Commit(s) Pushed by alice\n"));
        assert!(text.contains("refs: `refs/heads/master`"));
        assert!(text.contains("+ [`0123456`](https://github.com/c/1) - first \n"));
        assert!(text.contains("+ [`fedcba9`](https://github.com/c/2) - second \n"));
    }

    #[test]
    fn test_custom_template_set() {
        let set = TemplateSet::from_yaml("star:\n  created:\n    text: \"{sender.login} starred\"\n").unwrap();
        let payload = json!({ "action": "created", "sender": { "login": "bob" } });
        assert_eq!(set.render("star", &payload).unwrap(), "bob starred");
        assert!(TemplateSet::from_yaml("star: [").is_err());
    }
}
