//! Working memory, summary levels, and tool memory for one agent.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::Mutex;

use fathom_domain::config::ContextConfig;
use fathom_domain::cost::{CostBreakdown, PricingTable};
use fathom_domain::message::{Message, Role};
use fathom_domain::stream::Usage;
use fathom_providers::ChatClient;

/// One conversation turn held in working memory.
#[derive(Debug, Clone)]
pub struct Interaction {
    pub role: Role,
    pub content: String,
    pub estimated_tokens: u32,
    pub turn: u64,
    pub timestamp: DateTime<Utc>,
}

/// One hierarchical summary level. Level 0 is the finest.
#[derive(Debug, Clone, Default)]
pub struct SummaryLevel {
    pub text: String,
    pub tokens: u32,
    pub covered_turns: BTreeSet<u64>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl SummaryLevel {
    pub fn is_empty(&self) -> bool {
        self.text.is_empty()
    }
}

#[derive(Debug, Clone, Default)]
pub(crate) struct ToolRecord {
    pub calls: u32,
    pub last_result_prefix: String,
}

pub(crate) struct ContextState {
    pub working: Vec<Interaction>,
    pub levels: Vec<SummaryLevel>,
    pub tool_memory: BTreeMap<String, ToolRecord>,
    pub key_findings: Vec<String>,
    pub current_tokens: u32,
    pub next_turn: u64,
    pub folding_cost: CostBreakdown,
}

/// Per-agent context manager.
///
/// All mutation goes through the internal async mutex; a fold holds the
/// lock across its LLM call so no interaction is lost mid-fold. Only
/// the owning agent writes to its context, so the coarse lock is cheap.
pub struct ContextManager {
    config: ContextConfig,
    chat: Option<Arc<dyn ChatClient>>,
    summarizer_model: String,
    pricing: PricingTable,
    pub(crate) state: Mutex<ContextState>,
}

impl ContextManager {
    /// Create a manager with an LLM available for folding decisions and
    /// summaries.
    pub fn new(
        config: ContextConfig,
        chat: Arc<dyn ChatClient>,
        summarizer_model: impl Into<String>,
        pricing: PricingTable,
    ) -> Self {
        Self::build(config, Some(chat), summarizer_model.into(), pricing)
    }

    /// Create a manager with no LLM; folding decisions default to
    /// granular and summaries fall back to truncation.
    pub fn without_client(config: ContextConfig) -> Self {
        Self::build(config, None, String::new(), PricingTable::default())
    }

    fn build(
        config: ContextConfig,
        chat: Option<Arc<dyn ChatClient>>,
        summarizer_model: String,
        pricing: PricingTable,
    ) -> Self {
        let levels = vec![SummaryLevel::default(); config.summary_levels.max(1)];
        Self {
            config,
            chat,
            summarizer_model,
            pricing,
            state: Mutex::new(ContextState {
                working: Vec::new(),
                levels,
                tool_memory: BTreeMap::new(),
                key_findings: Vec::new(),
                current_tokens: 0,
                next_turn: 0,
                folding_cost: CostBreakdown::default(),
            }),
        }
    }

    pub(crate) fn chat_client(&self) -> Option<&Arc<dyn ChatClient>> {
        self.chat.as_ref()
    }

    pub(crate) fn summarizer_model(&self) -> &str {
        &self.summarizer_model
    }

    pub(crate) fn pricing(&self) -> &PricingTable {
        &self.pricing
    }

    pub fn config(&self) -> &ContextConfig {
        &self.config
    }

    // ── Interactions ───────────────────────────────────────────────

    /// Append a turn, estimate its tokens, and FIFO-evict past the
    /// working-memory cap. Evicted turns are absorbed into level 0 as
    /// raw prefixes so the coverage invariant holds without an LLM call.
    pub async fn add_interaction(&self, role: Role, content: impl Into<String>) {
        let content = content.into();
        let mut state = self.state.lock().await;

        let turn = state.next_turn;
        state.next_turn += 1;
        let estimated_tokens = Usage::estimate_tokens(&content);
        state.working.push(Interaction {
            role,
            content,
            estimated_tokens,
            turn,
            timestamp: Utc::now(),
        });

        while state.working.len() > self.config.working_mem_size {
            let evicted = state.working.remove(0);
            let prefix: String = evicted.content.chars().take(120).collect();
            let level0 = &mut state.levels[0];
            if !level0.text.is_empty() {
                level0.text.push('\n');
            }
            level0.text.push_str(&format!("[turn {}] {}", evicted.turn, prefix));
            level0.covered_turns.insert(evicted.turn);
            level0.updated_at = Some(Utc::now());
            level0.tokens = Usage::estimate_tokens(&level0.text);
        }

        state.current_tokens = recompute_tokens(&state);
    }

    /// Record a tool invocation in tool memory.
    pub async fn record_tool_use(&self, tool: &str, result: &str) {
        let mut state = self.state.lock().await;
        let record = state.tool_memory.entry(tool.to_string()).or_default();
        record.calls += 1;
        record.last_result_prefix = result.chars().take(120).collect();
    }

    /// Record a deduplicated key finding in tool memory.
    pub async fn record_finding(&self, finding: impl Into<String>) {
        let finding = finding.into();
        let mut state = self.state.lock().await;
        if !state.key_findings.contains(&finding) {
            state.key_findings.push(finding);
        }
    }

    // ── Message assembly ───────────────────────────────────────────

    /// Assemble the provider message list.
    ///
    /// Order: system prompt, summaries coarsest → finest, tool history,
    /// working memory verbatim, then the user query. Coarse-to-fine
    /// ordering means a provider that truncates from the front keeps
    /// the broadest summaries.
    pub async fn build_messages(&self, system_prompt: &str, user_query: &str) -> Vec<Message> {
        let state = self.state.lock().await;
        let mut messages = Vec::with_capacity(state.working.len() + state.levels.len() + 3);

        messages.push(Message::system(system_prompt));

        for (i, level) in state.levels.iter().enumerate().rev() {
            if !level.is_empty() {
                messages.push(Message::system(format!(
                    "[Research Context L{i}]\n{}",
                    level.text
                )));
            }
        }

        if !state.tool_memory.is_empty() || !state.key_findings.is_empty() {
            messages.push(Message::system(format!(
                "[Tool History]\n{}",
                format_tool_memory(&state)
            )));
        }

        for interaction in &state.working {
            messages.push(Message {
                role: interaction.role,
                content: interaction.content.clone(),
            });
        }

        messages.push(Message::user(user_query));
        messages
    }

    // ── Budget ─────────────────────────────────────────────────────

    pub async fn current_tokens(&self) -> u32 {
        self.state.lock().await.current_tokens
    }

    /// True when the context has reached the fold threshold.
    pub async fn should_fold(&self) -> bool {
        let state = self.state.lock().await;
        state.current_tokens as f64 / self.config.max_tokens as f64 >= self.config.fold_threshold
    }

    /// Total cost of folding LLM calls so far.
    pub async fn folding_cost(&self) -> CostBreakdown {
        self.state.lock().await.folding_cost
    }

    // ── Test/inspection accessors ──────────────────────────────────

    pub async fn working_len(&self) -> usize {
        self.state.lock().await.working.len()
    }

    pub async fn summary_level(&self, level: usize) -> Option<SummaryLevel> {
        self.state.lock().await.levels.get(level).cloned()
    }

    /// Union of covered turns across all levels plus turns still in
    /// working memory.
    pub async fn accounted_turns(&self) -> BTreeSet<u64> {
        let state = self.state.lock().await;
        let mut turns: BTreeSet<u64> = state
            .levels
            .iter()
            .flat_map(|l| l.covered_turns.iter().copied())
            .collect();
        turns.extend(state.working.iter().map(|i| i.turn));
        turns
    }

    pub async fn turns_appended(&self) -> u64 {
        self.state.lock().await.next_turn
    }
}

pub(crate) fn recompute_tokens(state: &ContextState) -> u32 {
    let working: u32 = state.working.iter().map(|i| i.estimated_tokens).sum();
    let summaries: u32 = state.levels.iter().map(|l| l.tokens).sum();
    let findings: u32 = state
        .key_findings
        .iter()
        .map(|f| Usage::estimate_tokens(f))
        .sum();
    working + summaries + findings
}

pub(crate) fn format_tool_memory(state: &ContextState) -> String {
    let mut out = String::new();
    for (tool, record) in &state.tool_memory {
        out.push_str(&format!(
            "{}: {} call(s), last: {}\n",
            tool, record.calls, record.last_result_prefix
        ));
    }
    if !state.key_findings.is_empty() {
        out.push_str("Key findings:\n");
        for finding in &state.key_findings {
            out.push_str(&format!("- {finding}\n"));
        }
    }
    out.trim_end().to_string()
}
