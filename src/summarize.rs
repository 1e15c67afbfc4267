//! summariser client (C6): assembles a grounded prompt from surviving
//! candidates, sends one completion request, returns the digest plus
//! metered usage.
//!
//! generalises the teacher's single-call HTTP client pattern
//! (`embedding.rs`'s bearer-auth POST + typed response) to the spec's
//! `transaction:{response:{choices,usage}, cost}` envelope (§9 design
//! note: keep the envelope explicit so cost accounting is never dropped).

use crate::model::{Item, SummaryStyle};
use crate::providers::{Completer, CompletionError, CompletionOutcome, CompletionUsage};
use reqwest::Client;
use serde::{Deserialize, Serialize};

const DESCRIPTION_CHAR_LIMIT: usize = 200;
const BUSINESS_VALUE_CHAR_LIMIT: usize = 150;
const ACCEPTANCE_CHAR_LIMIT: usize = 200;
pub const DEFAULT_ITEM_CAP: usize = 5;
/// same per-remote-call deadline convention as `lexical::DEFAULT_TIMEOUT`
/// / `vector::DEFAULT_TIMEOUT`; a hung completion service must not stall
/// past the orchestrator's own degradation policy for this stage.
const SUMMARY_TIMEOUT: std::time::Duration = std::time::Duration::from_secs(30);

fn truncate_chars(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        s.chars().take(max).collect::<String>() + "..."
    }
}

/// populated-subset projection: spec's items occasionally use
/// user-story-shaped fields (`key`, `summary`, `acceptanceCriteria`) and
/// occasionally test-case-shaped fields (`id`, `title`, `steps`)
/// interchangeably. pick whichever are non-empty rather than guessing
/// which collection the request targets.
fn render_item(item: &Item) -> String {
    let id = if !item.key.is_empty() { &item.key } else { &item.id };
    let title = if !item.summary.is_empty() { &item.summary } else { &item.title };

    let description = if !item.description.is_empty() {
        truncate_chars(&item.description, DESCRIPTION_CHAR_LIMIT)
    } else {
        truncate_chars(&item.acceptance_criteria, ACCEPTANCE_CHAR_LIMIT)
    };

    let mut lines = vec![format!(
        "- [{}] {} (module: {}, priority: {})",
        id, title, item.module, item.priority
    )];
    if !description.is_empty() {
        lines.push(format!("  detail: {}", description));
    }
    if !item.business_value.is_empty() {
        lines.push(format!(
            "  business value: {}",
            truncate_chars(&item.business_value, BUSINESS_VALUE_CHAR_LIMIT)
        ));
    }
    lines.join("\n")
}

/// assemble the grounded prompt, capping included items at `item_cap`
/// regardless of how many survived deduplication, independent of `limit`.
pub fn build_prompt(items: &[Item], style: SummaryStyle, item_cap: usize) -> String {
    let style_instruction = match style {
        SummaryStyle::Concise => "Summarise the following items in 2-3 sentences.",
        SummaryStyle::Detailed => {
            "Summarise the following items in a detailed paragraph, noting priorities and risks."
        }
    };

    let rendered: Vec<String> = items.iter().take(item_cap).map(render_item).collect();

    format!("{}\n\n{}", style_instruction, rendered.join("\n"))
}

/// strip a leading/trailing markdown code fence from a completion
/// response before treating it as the digest text. non-`}`-terminal
/// truncation of fenced JSON is reported as a warning, not a hard
/// failure, per §9.
pub fn strip_markdown_fence(text: &str) -> (String, Option<String>) {
    let trimmed = text.trim();
    let Some(after_open) = trimmed.strip_prefix("```") else {
        return (trimmed.to_string(), None);
    };
    let after_open = after_open
        .split_once('\n')
        .map(|(_, rest)| rest)
        .unwrap_or(after_open);

    match after_open.rfind("```") {
        Some(idx) => (after_open[..idx].trim().to_string(), None),
        None => {
            let body = after_open.trim().to_string();
            let looks_like_json = body.starts_with('{');
            let warning = (looks_like_json && !body.ends_with('}'))
                .then(|| "completion response appears truncated inside a fenced block".to_string());
            (body, warning)
        }
    }
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    messages: Vec<ChatMessage<'a>>,
}

#[derive(Debug, Deserialize)]
struct TransactionEnvelope {
    transaction: Transaction,
}

#[derive(Debug, Deserialize)]
struct Transaction {
    response: ChatResponse,
    #[serde(default)]
    cost: f64,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<Choice>,
    #[serde(default)]
    usage: Option<Usage>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    content: String,
}

#[derive(Debug, Deserialize, Default)]
struct Usage {
    #[serde(default)]
    prompt_tokens: u64,
    #[serde(default)]
    completion_tokens: u64,
    #[serde(default)]
    total_tokens: u64,
}

/// HTTP client for the remote completion service.
#[derive(Clone)]
pub struct HttpCompleter {
    client: Client,
    base_url: String,
    auth_token: String,
}

impl HttpCompleter {
    pub fn new(base_url: String, auth_token: String) -> Self {
        Self {
            client: Client::new(),
            base_url,
            auth_token,
        }
    }
}

impl Completer for HttpCompleter {
    async fn complete(&self, prompt: &str) -> Result<CompletionOutcome, CompletionError> {
        let request = ChatRequest {
            messages: vec![ChatMessage {
                role: "user",
                content: prompt,
            }],
        };

        let response = self
            .client
            .post(format!("{}/v1/chat/completions", self.base_url))
            .header("Authorization", format!("Bearer {}", self.auth_token))
            .json(&request)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(CompletionError::Api { status, body });
        }

        let envelope: TransactionEnvelope = response
            .json()
            .await
            .map_err(|e| CompletionError::Parse(e.to_string()))?;

        let raw_text = envelope
            .transaction
            .response
            .choices
            .into_iter()
            .next()
            .map(|c| c.message.content)
            .ok_or_else(|| CompletionError::Parse("no choices in response".to_string()))?;

        let (text, warning) = strip_markdown_fence(&raw_text);
        let usage = envelope.transaction.response.usage.unwrap_or_default();

        Ok(CompletionOutcome {
            text,
            usage: CompletionUsage {
                prompt_tokens: usage.prompt_tokens,
                completion_tokens: usage.completion_tokens,
                total_tokens: usage.total_tokens,
                cost: envelope.transaction.cost,
            },
            warnings: warning.into_iter().collect(),
        })
    }

    fn name(&self) -> &'static str {
        "http-completer"
    }
}

/// one deadline-bounded completion attempt. a timeout collapses to the
/// same `None` the caller already treats as a non-fatal failure.
async fn complete_once<C: Completer>(completer: &C, prompt: &str) -> Option<CompletionOutcome> {
    tokio::time::timeout(SUMMARY_TIMEOUT, completer.complete(prompt))
        .await
        .ok()?
        .ok()
}

/// run the summariser with a single retry on transient error or deadline
/// breach. on second failure the caller gets `None` and should surface
/// `SummariserFailure` as a non-fatal warning without aborting the
/// pipeline.
pub async fn summarize<C: Completer>(
    completer: &C,
    items: &[Item],
    style: SummaryStyle,
) -> Option<CompletionOutcome> {
    let prompt = build_prompt(items, style, DEFAULT_ITEM_CAP);
    match complete_once(completer, &prompt).await {
        Some(outcome) => Some(outcome),
        None => complete_once(completer, &prompt).await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn item(id: &str, description: &str) -> Item {
        Item {
            id: id.to_string(),
            title: "title".to_string(),
            module: "module".to_string(),
            description: description.to_string(),
            steps: String::new(),
            expected_results: String::new(),
            pre_requisites: String::new(),
            priority: "P1".to_string(),
            risk: String::new(),
            key: String::new(),
            summary: String::new(),
            acceptance_criteria: String::new(),
            business_value: String::new(),
            embedding: Vec::new(),
            metadata: Default::default(),
        }
    }

    #[test]
    fn prompt_truncates_long_descriptions() {
        let long_description = "x".repeat(500);
        let prompt = build_prompt(&[item("1", &long_description)], SummaryStyle::Concise, 5);
        assert!(prompt.contains("..."));
        assert!(!prompt.contains(&"x".repeat(201)));
    }

    #[test]
    fn prompt_caps_item_count_independent_of_input_size() {
        let items: Vec<Item> = (0..20).map(|i| item(&i.to_string(), "d")).collect();
        let prompt = build_prompt(&items, SummaryStyle::Concise, DEFAULT_ITEM_CAP);
        assert_eq!(prompt.matches("- [").count(), DEFAULT_ITEM_CAP);
    }

    #[test]
    fn strips_fenced_json_cleanly() {
        let (text, warning) = strip_markdown_fence("```json\n{\"a\":1}\n```");
        assert_eq!(text, "{\"a\":1}");
        assert!(warning.is_none());
    }

    #[test]
    fn flags_truncated_fenced_json_as_warning() {
        let (_, warning) = strip_markdown_fence("```json\n{\"a\":1");
        assert!(warning.is_some());
    }

    struct HangingCompleter;
    impl Completer for HangingCompleter {
        async fn complete(&self, _prompt: &str) -> Result<CompletionOutcome, CompletionError> {
            tokio::time::sleep(SUMMARY_TIMEOUT * 2).await;
            unreachable!("should be cancelled by the per-call timeout first");
        }
        fn name(&self) -> &'static str {
            "hanging"
        }
    }

    #[tokio::test(start_paused = true)]
    async fn deadline_breach_degrades_to_none_instead_of_hanging() {
        let result = summarize(&HangingCompleter, &[item("1", "d")], SummaryStyle::Concise).await;
        assert!(result.is_none());
    }
}
