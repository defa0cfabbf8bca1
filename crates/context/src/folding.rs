//! Fold decision and execution.
//!
//! Folding is how a context stays under budget: working memory is
//! condensed into level 0 (granular), and lower levels are periodically
//! consolidated into the next level up (deep).

use chrono::Utc;

use fathom_domain::cost::CostBreakdown;
use fathom_domain::error::{Error, Result};
use fathom_domain::message::Message;
use fathom_domain::stream::Usage;
use fathom_providers::ChatRequest;
use fathom_tools::extract_first_json;

use crate::manager::{recompute_tokens, ContextManager, Interaction};

/// What to do about a full context.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FoldDirective {
    /// Leave the context as is.
    None,
    /// Compress working memory into level 0.
    Granular,
    /// Consolidate levels `0..=target_level` into `target_level + 1`.
    Deep { target_level: usize },
}

/// Fixed system prompt for the folding decision call.
pub const DECISION_SYSTEM_PROMPT: &str = "\
You manage the memory of a research agent. Decide how to compress its context.\n\
Modes:\n\
- NONE: context is healthy, change nothing\n\
- GRANULAR: compress the working memory into summary level 0\n\
- DEEP: consolidate summary levels 0..=target_level into level target_level+1\n\
Respond with a single JSON object:\n\
{\"mode\": \"NONE\" | \"GRANULAR\" | \"DEEP\", \"target_level\": <int, DEEP only>, \"rationale\": \"...\"}";

const CONDENSE_PROMPT: &str = "\
Condense the following conversation excerpt into a dense summary that preserves \
goals, decisions, findings with their sources, and open questions. Write in \
present tense and omit pleasantries.";

const CONSOLIDATE_PROMPT: &str = "\
Consolidate the following research summaries into one broader summary. Keep \
every concrete finding and source; drop repetition and narrative detail.";

/// Raw-text fallback size when the summarizer LLM is unavailable.
const FALLBACK_CHARS: usize = 1000;

impl ContextManager {
    /// Ask the LLM which fold to perform.
    ///
    /// Any transport error, empty response, or unparseable reply
    /// degrades to [`FoldDirective::Granular`], as does having no
    /// client configured.
    pub async fn decide_folding(&self) -> FoldDirective {
        let Some(chat) = self.chat_client().cloned() else {
            return FoldDirective::Granular;
        };

        let snapshot = {
            let state = self.state.lock().await;
            let fill: Vec<String> = state
                .levels
                .iter()
                .enumerate()
                .map(|(i, l)| format!("L{i}: {} tokens, {} turns", l.tokens, l.covered_turns.len()))
                .collect();
            format!(
                "current_tokens: {}\nmax_tokens: {}\nworking_memory: {} turns\n{}",
                state.current_tokens,
                self.config().max_tokens,
                state.working.len(),
                fill.join("\n")
            )
        };

        let req = ChatRequest {
            messages: vec![
                Message::system(DECISION_SYSTEM_PROMPT),
                Message::user(snapshot),
            ],
            temperature: Some(0.0),
            max_tokens: Some(200),
            model: Some(self.summarizer_model().to_string()),
        };

        let (directive, cost) = match chat.chat(req).await {
            Ok(response) => {
                let cost = self.call_cost(response.usage, &response.content);
                (
                    parse_directive(&response.content).unwrap_or(FoldDirective::Granular),
                    cost,
                )
            }
            Err(e) => {
                tracing::debug!(error = %e, "folding decision failed, defaulting to granular");
                (FoldDirective::Granular, CostBreakdown::default())
            }
        };

        self.state.lock().await.folding_cost += cost;
        directive
    }

    /// Execute a fold. Holds the context lock for the full LLM call so
    /// no interaction is lost mid-fold.
    pub async fn fold(&self, directive: FoldDirective) -> Result<()> {
        match directive {
            FoldDirective::None => Ok(()),
            FoldDirective::Granular => self.fold_granular().await,
            FoldDirective::Deep { target_level } => self.fold_deep(target_level).await,
        }
    }

    /// Convenience driver: check the threshold, decide, execute.
    /// An invalid deep target downgrades to a granular fold.
    pub async fn fold_if_needed(&self) -> Result<bool> {
        if !self.should_fold().await {
            return Ok(false);
        }
        let directive = self.decide_folding().await;
        if directive == FoldDirective::None {
            return Ok(false);
        }
        match self.fold(directive).await {
            Ok(()) => Ok(true),
            Err(Error::InvalidFoldTarget { .. }) => {
                self.fold(FoldDirective::Granular).await?;
                Ok(true)
            }
            Err(e) => Err(e),
        }
    }

    async fn fold_granular(&self) -> Result<()> {
        let mut state = self.state.lock().await;
        if state.working.is_empty() {
            return Ok(());
        }

        let transcript = render_interactions(&state.working);
        let covered: Vec<u64> = state.working.iter().map(|i| i.turn).collect();

        let (summary, cost) = match self.summarize(&transcript, CONDENSE_PROMPT).await {
            Ok(ok) => ok,
            Err(e) => {
                tracing::warn!(error = %e, "condense failed, truncating raw working memory");
                (truncate_chars(&transcript, FALLBACK_CHARS), CostBreakdown::default())
            }
        };

        let level0 = &mut state.levels[0];
        if level0.text.is_empty() {
            level0.text = summary;
        } else {
            level0.text.push_str("\n\n");
            level0.text.push_str(&summary);
        }
        level0.covered_turns.extend(covered);
        level0.tokens = Usage::estimate_tokens(&level0.text);
        level0.updated_at = Some(Utc::now());

        state.working.clear();
        state.folding_cost += cost;
        state.current_tokens = recompute_tokens(&state);
        tracing::debug!(tokens = state.current_tokens, "granular fold applied");
        Ok(())
    }

    async fn fold_deep(&self, target_level: usize) -> Result<()> {
        let levels = self.config().summary_levels;
        if levels < 2 || target_level > levels - 2 {
            return Err(Error::InvalidFoldTarget {
                target: target_level,
                levels,
            });
        }

        let mut state = self.state.lock().await;

        let mut combined = String::new();
        let mut covered = Vec::new();
        for (i, level) in state.levels.iter().enumerate().take(target_level + 1) {
            if level.is_empty() {
                continue;
            }
            combined.push_str(&format!("[Level {i}]\n{}\n\n", level.text));
            covered.extend(level.covered_turns.iter().copied());
        }
        if combined.is_empty() {
            return Ok(());
        }

        let (summary, cost) = match self.summarize(&combined, CONSOLIDATE_PROMPT).await {
            Ok(ok) => ok,
            Err(e) => {
                tracing::warn!(error = %e, "consolidate failed, truncating raw summaries");
                (truncate_chars(&combined, FALLBACK_CHARS), CostBreakdown::default())
            }
        };

        let parent = &mut state.levels[target_level + 1];
        if parent.text.is_empty() {
            parent.text = summary;
        } else {
            parent.text.push_str("\n\n");
            parent.text.push_str(&summary);
        }
        parent.covered_turns.extend(covered);
        parent.tokens = Usage::estimate_tokens(&parent.text);
        parent.updated_at = Some(Utc::now());

        for level in state.levels.iter_mut().take(target_level + 1) {
            *level = Default::default();
        }

        state.folding_cost += cost;
        state.current_tokens = recompute_tokens(&state);
        tracing::debug!(target_level, tokens = state.current_tokens, "deep fold applied");
        Ok(())
    }

    /// One summarizer call. Touches no shared state so it can run while
    /// the caller holds the context lock.
    async fn summarize(&self, text: &str, instruction: &str) -> Result<(String, CostBreakdown)> {
        let chat = self
            .chat_client()
            .ok_or_else(|| Error::capability("chat", "no summarizer client configured"))?;

        let req = ChatRequest {
            messages: vec![
                Message::system(instruction),
                Message::user(text.to_string()),
            ],
            temperature: Some(0.1),
            max_tokens: Some(1200),
            model: Some(self.summarizer_model().to_string()),
        };

        let response = chat.chat(req).await?;
        if response.content.trim().is_empty() {
            return Err(Error::capability("chat", "empty summary response"));
        }
        let cost = self.call_cost(response.usage, &response.content);
        Ok((response.content.trim().to_string(), cost))
    }

    fn call_cost(&self, usage: Option<Usage>, output: &str) -> CostBreakdown {
        let usage = usage.unwrap_or_else(|| Usage::new(0, Usage::estimate_tokens(output)));
        self.pricing().cost_for(self.summarizer_model(), usage)
    }
}

fn parse_directive(response: &str) -> Option<FoldDirective> {
    let value = extract_first_json(response)?;
    match value.get("mode")?.as_str()? {
        "NONE" => Some(FoldDirective::None),
        "GRANULAR" => Some(FoldDirective::Granular),
        "DEEP" => Some(FoldDirective::Deep {
            target_level: value.get("target_level")?.as_u64()? as usize,
        }),
        _ => None,
    }
}

/// Render working memory for the condense prompt. Think-tool chatter is
/// filtered out of compression.
fn render_interactions(interactions: &[Interaction]) -> String {
    interactions
        .iter()
        .filter(|i| !is_think_noise(&i.content))
        .map(|i| format!("{}: {}", i.role.as_str(), i.content))
        .collect::<Vec<_>>()
        .join("\n")
}

fn is_think_noise(content: &str) -> bool {
    content.contains("<tool name=\"think\"") || content.starts_with("Tool result for think")
}

fn truncate_chars(text: &str, max: usize) -> String {
    if text.chars().count() <= max {
        text.to_string()
    } else {
        text.chars().take(max).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use fathom_domain::config::ContextConfig;
    use fathom_domain::cost::PricingTable;
    use fathom_domain::message::Role;
    use fathom_domain::stream::{BoxStream, StreamEvent};
    use fathom_providers::{ChatClient, ChatResponse};

    /// Fake summarizer returning a canned reply for every call.
    struct CannedChat {
        reply: String,
        fail: bool,
    }

    #[async_trait::async_trait]
    impl ChatClient for CannedChat {
        async fn chat(&self, _req: ChatRequest) -> fathom_domain::Result<ChatResponse> {
            if self.fail {
                return Err(Error::capability("chat", "down"));
            }
            Ok(ChatResponse {
                content: self.reply.clone(),
                usage: Some(Usage::new(100, 20)),
                model: "summarizer".into(),
                finish_reason: Some("stop".into()),
            })
        }

        async fn chat_stream(
            &self,
            _req: ChatRequest,
        ) -> fathom_domain::Result<BoxStream<'static, fathom_domain::Result<StreamEvent>>> {
            Err(Error::capability("chat", "streaming not available in test"))
        }

        fn default_model(&self) -> &str {
            "summarizer"
        }
    }

    fn manager_with(reply: &str, fail: bool) -> ContextManager {
        ContextManager::new(
            ContextConfig {
                max_tokens: 200,
                working_mem_size: 10,
                fold_threshold: 0.75,
                summary_levels: 3,
            },
            Arc::new(CannedChat {
                reply: reply.into(),
                fail,
            }),
            "summarizer",
            PricingTable::default(),
        )
    }

    #[test]
    fn parses_all_directive_modes() {
        assert_eq!(parse_directive(r#"{"mode": "NONE"}"#), Some(FoldDirective::None));
        assert_eq!(
            parse_directive(r#"{"mode": "GRANULAR", "rationale": "big"}"#),
            Some(FoldDirective::Granular)
        );
        assert_eq!(
            parse_directive(r#"before {"mode": "DEEP", "target_level": 1} after"#),
            Some(FoldDirective::Deep { target_level: 1 })
        );
        assert_eq!(parse_directive("not json"), None);
        assert_eq!(parse_directive(r#"{"mode": "SIDEWAYS"}"#), None);
    }

    #[tokio::test]
    async fn granular_fold_clears_working_memory() {
        let ctx = manager_with("a tight summary", false);
        for i in 0..5 {
            ctx.add_interaction(Role::User, format!("turn {i}")).await;
        }

        ctx.fold(FoldDirective::Granular).await.unwrap();

        assert_eq!(ctx.working_len().await, 0);
        let level0 = ctx.summary_level(0).await.unwrap();
        assert_eq!(level0.text, "a tight summary");
        assert_eq!(level0.covered_turns.len(), 5);
        // Fold LLM cost was recorded.
        assert!(ctx.folding_cost().await.total_tokens > 0);
    }

    #[tokio::test]
    async fn granular_fold_falls_back_to_truncation() {
        let ctx = manager_with("", true);
        ctx.add_interaction(Role::User, "z".repeat(3000)).await;

        ctx.fold(FoldDirective::Granular).await.unwrap();

        let level0 = ctx.summary_level(0).await.unwrap();
        assert!(!level0.is_empty());
        assert!(level0.text.chars().count() <= 1000);
    }

    #[tokio::test]
    async fn deep_fold_consolidates_levels() {
        let ctx = manager_with("consolidated", false);
        for i in 0..4 {
            ctx.add_interaction(Role::User, format!("turn {i}")).await;
        }
        ctx.fold(FoldDirective::Granular).await.unwrap();
        ctx.add_interaction(Role::User, "turn 4").await;
        ctx.fold(FoldDirective::Granular).await.unwrap();

        ctx.fold(FoldDirective::Deep { target_level: 0 }).await.unwrap();

        let level0 = ctx.summary_level(0).await.unwrap();
        let level1 = ctx.summary_level(1).await.unwrap();
        assert!(level0.is_empty());
        assert_eq!(level1.text, "consolidated");
        assert_eq!(level1.covered_turns.len(), 5);
        // All five turns are still accounted for after two fold shapes.
        assert_eq!(ctx.accounted_turns().await.len(), 5);
    }

    #[tokio::test]
    async fn deep_fold_rejects_out_of_range_target() {
        let ctx = manager_with("x", false);
        // 3 levels: valid targets are 0 and 1.
        let err = ctx.fold(FoldDirective::Deep { target_level: 2 }).await;
        assert!(matches!(err, Err(Error::InvalidFoldTarget { .. })));
    }

    #[tokio::test]
    async fn fold_if_needed_respects_threshold() {
        let ctx = manager_with(r#"{"mode": "GRANULAR"}"#, false);
        ctx.add_interaction(Role::User, "small").await;
        assert!(!ctx.fold_if_needed().await.unwrap());

        // 200 max tokens * 0.75 = 150 tokens = 600 chars.
        ctx.add_interaction(Role::User, "y".repeat(700)).await;
        assert!(ctx.fold_if_needed().await.unwrap());
        assert_eq!(ctx.working_len().await, 0);
    }

    #[tokio::test]
    async fn decide_folding_defaults_to_granular_without_client() {
        let ctx = ContextManager::without_client(ContextConfig::default());
        assert_eq!(ctx.decide_folding().await, FoldDirective::Granular);
    }

    #[tokio::test]
    async fn decide_folding_defaults_to_granular_on_error() {
        let ctx = manager_with("", true);
        assert_eq!(ctx.decide_folding().await, FoldDirective::Granular);
    }

    #[tokio::test]
    async fn decide_folding_parses_deep() {
        let ctx = manager_with(r#"{"mode": "DEEP", "target_level": 0}"#, false);
        assert_eq!(
            ctx.decide_folding().await,
            FoldDirective::Deep { target_level: 0 }
        );
    }

    #[test]
    fn think_chatter_is_filtered_from_compression() {
        let interactions = vec![
            Interaction {
                role: Role::Assistant,
                content: "<tool name=\"think\">{\"reflection\": \"hmm\"}</tool>".into(),
                estimated_tokens: 10,
                turn: 0,
                timestamp: Utc::now(),
            },
            Interaction {
                role: Role::User,
                content: "Tool result for think:\nReflection recorded: hmm".into(),
                estimated_tokens: 10,
                turn: 1,
                timestamp: Utc::now(),
            },
            Interaction {
                role: Role::User,
                content: "real question".into(),
                estimated_tokens: 3,
                turn: 2,
                timestamp: Utc::now(),
            },
        ];
        let rendered = render_interactions(&interactions);
        assert_eq!(rendered, "user: real question");
    }
}
