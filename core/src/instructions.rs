//! Recipe instructions arrive in one of three encodings: a JSON array of
//! step objects, newline text with embedded image references, or plain
//! newline text. Each encoding has its own parser; they are tried in
//! order and the first one that accepts the input decides the variant.

use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Step {
    pub text: String,
    #[serde(rename = "imageUrl", default, skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "format", rename_all = "snake_case")]
pub enum Instructions {
    Empty,
    Steps { steps: Vec<Step> },
    Markdown { steps: Vec<Step>, images: Vec<String> },
    PlainText { lines: Vec<String> },
}

impl Instructions {
    #[must_use]
    pub fn steps(&self) -> Vec<Step> {
        match self {
            Instructions::Empty => Vec::new(),
            Instructions::Steps { steps } | Instructions::Markdown { steps, .. } => steps.clone(),
            Instructions::PlainText { lines } => lines
                .iter()
                .map(|text| Step {
                    text: text.clone(),
                    image_url: None,
                })
                .collect(),
        }
    }
}

static MARKDOWN_IMAGE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"!\[([^\]]*)\]\(([^)]+)\)").expect("markdown image pattern"));
static IMAGE_TAG: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\[IMAGE:([^\]]+)\]").expect("image tag pattern"));
static STEP_NUMBER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\d+\.\s*").expect("step number pattern"));

type Parser = fn(&str) -> Option<Instructions>;

const PARSERS: &[Parser] = &[parse_json_steps, parse_markdown, parse_plain_text];

/// Decode stored instruction text. Blank input is `Empty`; anything else is
/// accepted by at least the plain-text parser.
#[must_use]
pub fn parse_instructions(raw: &str) -> Instructions {
    if raw.trim().is_empty() {
        return Instructions::Empty;
    }
    PARSERS
        .iter()
        .find_map(|parse| parse(raw))
        .unwrap_or(Instructions::Empty)
}

fn parse_json_steps(raw: &str) -> Option<Instructions> {
    let trimmed = raw.trim();
    if !trimmed.starts_with('[') {
        return None;
    }
    let steps: Vec<Step> = serde_json::from_str(trimmed).ok()?;
    Some(Instructions::Steps { steps })
}

fn parse_markdown(raw: &str) -> Option<Instructions> {
    let mut images = Vec::new();
    let steps: Vec<Step> = non_empty_lines(raw)
        .map(|line| {
            let (pattern, group) = if let Some(caps) = MARKDOWN_IMAGE.captures(line) {
                (&*MARKDOWN_IMAGE, caps.get(2))
            } else if let Some(caps) = IMAGE_TAG.captures(line) {
                (&*IMAGE_TAG, caps.get(1))
            } else {
                return Step {
                    text: strip_step_number(line),
                    image_url: None,
                };
            };
            let url = group.map(|m| m.as_str().to_string());
            if let Some(url) = &url {
                images.push(url.clone());
            }
            Step {
                text: pattern.replace(line, "").trim().to_string(),
                image_url: url,
            }
        })
        .collect();

    if images.is_empty() {
        None
    } else {
        Some(Instructions::Markdown { steps, images })
    }
}

fn parse_plain_text(raw: &str) -> Option<Instructions> {
    let lines: Vec<String> = non_empty_lines(raw).map(strip_step_number).collect();
    if lines.is_empty() {
        None
    } else {
        Some(Instructions::PlainText { lines })
    }
}

fn non_empty_lines(raw: &str) -> impl Iterator<Item = &str> {
    raw.lines().filter(|l| !l.trim().is_empty())
}

fn strip_step_number(line: &str) -> String {
    STEP_NUMBER.replace(line.trim(), "").trim().to_string()
}
