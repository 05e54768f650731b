//! Template rewriting through the Gemini API
//!
//! Sends the current subject/body to `generateContent` with a prompt that
//! asks for a labeled rewrite, then pulls the new subject and body back
//! out of free-form model text. Placeholders must survive the trip: a
//! rewrite that loses one is rejected rather than silently de-personalizing
//! every send that follows.

use std::time::Duration;

use lazy_static::lazy_static;
use regex::Regex;
use tracing::{info, instrument, warn};

use outreach_core::types::{Template, PLACEHOLDERS};

/// Model used for rewrites.
pub const DEFAULT_MODEL: &str = "gemini-2.5-flash";

/// Hard bound on one rewrite round trip.
pub const REWRITE_TIMEOUT: Duration = Duration::from_secs(30);

lazy_static! {
    static ref SUBJECT_LINE: Regex = Regex::new(r"(?i)(?:subject line|subject):[ \t]*(.+)").unwrap();
    static ref BODY_BLOCK: Regex =
        Regex::new(r"(?is)(?:email body|body|message):[ \t]*(.+?)(?:\n\n|$)").unwrap();
}

#[derive(Debug, Clone, thiserror::Error)]
pub enum RewriteError {
    /// The model did not answer within [`REWRITE_TIMEOUT`].
    #[error("rewrite request timed out")]
    Timeout,

    /// The request never got a usable response.
    #[error("rewrite request failed: {0}")]
    Http(String),

    /// The API refused the request (bad key, quota, safety block).
    #[error("{0}")]
    Rejected(String),

    /// The response arrived but carried no usable text.
    #[error("malformed rewrite response: {0}")]
    Malformed(String),

    /// The rewritten template lost placeholders the original had.
    #[error("rewrite dropped template placeholders")]
    PlaceholdersDropped,
}

/// Rewrites outreach templates with Gemini.
pub struct GeminiRewriter {
    http: reqwest::Client,
    model: String,
}

impl GeminiRewriter {
    pub fn new(http: reqwest::Client) -> Self {
        Self {
            http,
            model: DEFAULT_MODEL.to_string(),
        }
    }

    pub fn with_model(http: reqwest::Client, model: impl Into<String>) -> Self {
        Self {
            http,
            model: model.into(),
        }
    }

    /// Ask the model for a more compelling version of the template.
    #[instrument(skip_all)]
    pub async fn rewrite(
        &self,
        api_key: &str,
        template: &Template,
    ) -> Result<Template, RewriteError> {
        let url = format!(
            "https://generativelanguage.googleapis.com/v1beta/models/{}:generateContent?key={}",
            self.model, api_key
        );
        let request = serde_json::json!({
            "contents": [{ "parts": [{ "text": build_prompt(template) }] }],
            "generationConfig": { "temperature": 0.7, "maxOutputTokens": 1024 },
        });

        let exchange = async {
            let response = self
                .http
                .post(&url)
                .json(&request)
                .send()
                .await
                .map_err(|e| RewriteError::Http(e.to_string()))?;

            let status = response.status();
            let body: serde_json::Value = response
                .json()
                .await
                .map_err(|e| RewriteError::Malformed(e.to_string()))?;

            if !status.is_success() {
                let reason = body
                    .pointer("/error/message")
                    .and_then(|v| v.as_str())
                    .map(String::from)
                    .unwrap_or_else(|| format!("rewrite rejected: {status}"));
                warn!(status = %status, "gemini rejected rewrite request");
                return Err(RewriteError::Rejected(reason));
            }

            Ok(body)
        };

        let body = tokio::time::timeout(REWRITE_TIMEOUT, exchange)
            .await
            .map_err(|_| RewriteError::Timeout)??;

        let text = body
            .pointer("/candidates/0/content/parts/0/text")
            .and_then(|v| v.as_str())
            .ok_or_else(|| RewriteError::Malformed("no candidates in response".to_string()))?;
        if text.trim().is_empty() {
            return Err(RewriteError::Malformed("empty model response".to_string()));
        }

        let rewritten = parse_rewrite(text, template);
        if !placeholders_preserved(template, &rewritten) {
            warn!("rewrite dropped placeholders, discarding");
            return Err(RewriteError::PlaceholdersDropped);
        }

        info!("template rewritten");
        Ok(rewritten)
    }
}

fn build_prompt(template: &Template) -> String {
    format!(
        "You are an expert cold-outreach copywriter. Rewrite the following \
         email template to be more compelling and personal while staying \
         concise and professional.\n\n\
         Keep every placeholder like {{First Name}}, {{Company}}, {{Role}}, and \
         {{Email}} exactly as written; they are substituted per recipient \
         later.\n\n\
         Current subject: {}\n\
         Current body:\n{}\n\n\
         Answer in exactly this format:\n\
         Subject: <rewritten subject>\n\
         Body:\n<rewritten body>",
        template.subject, template.body
    )
}

/// Extract the rewritten subject and body from model text.
///
/// Prefers the labeled `Subject:` / `Body:` format the prompt asks for,
/// falling back to "everything after the subject line" when the model
/// skipped the body label. Fields the text yields nothing for keep their
/// original value.
fn parse_rewrite(text: &str, original: &Template) -> Template {
    let subject = SUBJECT_LINE
        .captures(text)
        .and_then(|c| c.get(1))
        .map(|m| clean_fragment(m.as_str()))
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| original.subject.clone());

    let body = BODY_BLOCK
        .captures(text)
        .and_then(|c| c.get(1))
        .map(|m| clean_fragment(m.as_str()))
        .filter(|s| !s.is_empty())
        .or_else(|| {
            // No body label: take whatever follows the subject line.
            SUBJECT_LINE
                .find(text)
                .map(|m| clean_fragment(&text[m.end()..]))
                .filter(|s| !s.is_empty())
        })
        .unwrap_or_else(|| original.body.clone());

    Template { subject, body }
}

/// Strip wrapping quotes, unescape literal `\n` sequences, and trim.
fn clean_fragment(fragment: &str) -> String {
    let trimmed = fragment.trim();
    let unquoted = trimmed
        .strip_prefix('"')
        .and_then(|s| s.strip_suffix('"'))
        .unwrap_or(trimmed);
    unquoted.replace("\\n", "\n").trim().to_string()
}

/// Every placeholder occurrence in the original must still be present at
/// least as often in the rewrite, per field pair combined.
fn placeholders_preserved(original: &Template, rewritten: &Template) -> bool {
    let before = format!("{}\n{}", original.subject, original.body);
    let after = format!("{}\n{}", rewritten.subject, rewritten.body);
    PLACEHOLDERS.iter().all(|(placeholder, _)| {
        before.matches(placeholder).count() <= after.matches(placeholder).count()
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn template() -> Template {
        Template::new("Quick question, {First Name}", "Hi {First Name} at {Company},\n\nbody")
    }

    #[test]
    fn test_prompt_carries_template_and_placeholder_rule() {
        let prompt = build_prompt(&template());
        assert!(prompt.contains("Quick question, {First Name}"));
        assert!(prompt.contains("Hi {First Name} at {Company}"));
        assert!(prompt.contains("Keep every placeholder"));
    }

    #[test]
    fn test_parse_labeled_format() {
        let text = "Subject: Hello {First Name}!\nBody:\nNew body for {First Name} at {Company}.";
        let parsed = parse_rewrite(text, &template());
        assert_eq!(parsed.subject, "Hello {First Name}!");
        assert_eq!(parsed.body, "New body for {First Name} at {Company}.");
    }

    #[test]
    fn test_parse_falls_back_to_text_after_subject() {
        let text = "Subject: Hello {First Name}\nEverything here is the body,\n{Company} included.";
        let parsed = parse_rewrite(text, &template());
        assert_eq!(parsed.subject, "Hello {First Name}");
        assert_eq!(parsed.body, "Everything here is the body,\n{Company} included.");
    }

    #[test]
    fn test_parse_strips_quotes_and_unescapes() {
        let text = "Subject: \"Hello {First Name}\"\nBody: Line one\\nLine two {Company}";
        let parsed = parse_rewrite(text, &template());
        assert_eq!(parsed.subject, "Hello {First Name}");
        assert_eq!(parsed.body, "Line one\nLine two {Company}");
    }

    #[test]
    fn test_parse_keeps_original_on_unusable_text() {
        let original = template();
        let parsed = parse_rewrite("I cannot help with that.", &original);
        assert_eq!(parsed, original);
    }

    #[test]
    fn test_placeholder_preservation() {
        let original = template();
        let good = Template::new("Hey {First Name}", "For {First Name} of {Company}");
        let bad = Template::new("Hey there", "For {First Name} of {Company}");
        assert!(placeholders_preserved(&original, &good));
        assert!(!placeholders_preserved(&original, &bad));
    }

    #[test]
    fn test_placeholder_check_counts_occurrences() {
        let original = Template::new("{First Name}", "{First Name} and {First Name}");
        let fewer = Template::new("{First Name}", "{First Name} once");
        assert!(!placeholders_preserved(&original, &fewer));
    }
}
