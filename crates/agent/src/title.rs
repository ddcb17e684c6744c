//! Chat title generation.

use toolchat_core::error::Result;
use toolchat_core::provider::Provider;
use tracing::debug;

const MAX_TITLE_CHARS: usize = 80;
const FALLBACK_TITLE: &str = "New chat";

/// Ask the provider for a short title describing `first_message`.
pub async fn generate_title(
    provider: &dyn Provider,
    model: &str,
    first_message: &str,
    max_tokens: u32,
) -> Result<String> {
    let prompt = format!(
        "Write a title of at most six words for a chat that starts with the \
         message below. Reply with the title only, without quotes.\n\n{first_message}"
    );
    let raw = provider.complete_text(model, &prompt, max_tokens).await?;
    let title = clean_title(&raw);
    debug!(title = %title, "Generated chat title");
    Ok(title)
}

/// First non-empty line, without surrounding quotes or trailing period.
fn clean_title(raw: &str) -> String {
    let line = raw.lines().map(str::trim).find(|l| !l.is_empty()).unwrap_or("");
    let line = line
        .trim_matches(|c: char| matches!(c, '"' | '\'' | '`' | '*' | '#'))
        .trim()
        .trim_end_matches('.')
        .trim();

    if line.is_empty() {
        return FALLBACK_TITLE.to_string();
    }
    line.chars().take(MAX_TITLE_CHARS).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use tokio::sync::mpsc;
    use toolchat_core::message::{ContentBlock, Message};
    use toolchat_core::provider::{CompletionRequest, ModelInfo, RoundItem};

    struct FixedProvider(&'static str);

    #[async_trait]
    impl Provider for FixedProvider {
        fn name(&self) -> &str {
            "fixed"
        }

        fn models(&self) -> Vec<ModelInfo> {
            vec![ModelInfo {
                id: "haiku".into(),
                name: "Haiku".into(),
                description: String::new(),
            }]
        }

        async fn stream_completion(
            &self,
            request: CompletionRequest,
        ) -> Result<mpsc::Receiver<RoundItem>> {
            self.validate(&request)?;
            assert_eq!(request.max_tokens, Some(32));
            let (tx, rx) = mpsc::channel(1);
            tx.send(RoundItem::Finished(Message::assistant(
                &request.model,
                vec![ContentBlock::text(self.0)],
            )))
            .await
            .unwrap();
            Ok(rx)
        }
    }

    #[tokio::test]
    async fn title_is_cleaned() {
        let title = generate_title(&FixedProvider("\"Rust async basics.\"\n"), "haiku", "hi", 32)
            .await
            .unwrap();
        assert_eq!(title, "Rust async basics");
    }

    #[tokio::test]
    async fn empty_reply_falls_back() {
        let title = generate_title(&FixedProvider("  \n"), "haiku", "hi", 32)
            .await
            .unwrap();
        assert_eq!(title, FALLBACK_TITLE);
    }

    #[test]
    fn long_titles_are_truncated() {
        let raw = "x".repeat(200);
        assert_eq!(clean_title(&raw).len(), MAX_TITLE_CHARS);
    }

    #[test]
    fn markdown_heading_is_stripped() {
        assert_eq!(clean_title("## Weekend trip plan"), "Weekend trip plan");
    }
}
