//! The assembled context handed to a specialist.

use serde::{Deserialize, Serialize};
use voltwise_core::{Classification, ConversationMessage, FailureKind, Passage};

use crate::budget::TokenBudget;

/// The four context categories, in descending operational priority.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContextSource {
    System,
    Conversation,
    Knowledge,
    User,
}

impl ContextSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::System => "system",
            Self::Conversation => "conversation",
            Self::Knowledge => "knowledge",
            Self::User => "user",
        }
    }

    /// What a failure of this source is reported as.
    pub fn failure_kind(&self) -> FailureKind {
        match self {
            Self::System => FailureKind::SystemStateUnavailable,
            Self::Conversation => FailureKind::HistoryUnavailable,
            Self::Knowledge => FailureKind::KnowledgeUnavailable,
            Self::User => FailureKind::UserContextUnavailable,
        }
    }
}

impl std::fmt::Display for ContextSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Estimated tokens per category.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategoryTokens {
    pub system: usize,
    pub knowledge: usize,
    pub conversation: usize,
    pub user: usize,
}

impl CategoryTokens {
    pub fn total(&self) -> usize {
        self.system + self.knowledge + self.conversation + self.user
    }
}

/// Content removed to respect a budget.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DropInfo {
    pub category: ContextSource,
    pub items_dropped: usize,
    pub tokens_dropped: usize,
    pub reason: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContextBundle {
    pub system_context: String,
    pub kb_passages: Vec<Passage>,
    pub conversation_messages: Vec<ConversationMessage>,
    pub user_context: String,
    pub tokens: CategoryTokens,
    pub total_tokens: usize,

    /// Never stored as `true`; set when the bundle is served from the cache.
    #[serde(default)]
    pub cache_hit: bool,

    pub classification: Classification,
    pub budget: TokenBudget,

    /// Over the aggregate budget and left whole because truncation is off.
    #[serde(default)]
    pub over_budget: bool,

    /// Some content was cut or dropped to fit a budget.
    #[serde(default)]
    pub truncated: bool,

    /// Sources that failed and were degraded to empty.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub degraded_sources: Vec<ContextSource>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub drops: Vec<DropInfo>,
}

impl ContextBundle {
    /// Render the non-conversation context as prompt sections.
    ///
    /// Conversation turns are not included: specialists send them as
    /// chat messages.
    pub fn render_sections(&self) -> String {
        let mut sections = Vec::new();

        if !self.system_context.is_empty() {
            sections.push(format!("[System State]\n{}", self.system_context));
        }

        if !self.kb_passages.is_empty() {
            let mut section = String::from("[Retrieved Knowledge]\n");
            for passage in &self.kb_passages {
                let source = passage.source.as_deref().unwrap_or(&passage.doc_id);
                section.push_str(&format!("[Source: {}] {}\n", source, passage.text));
            }
            sections.push(section.trim_end().to_string());
        }

        if !self.user_context.is_empty() {
            sections.push(format!("[User Profile]\n{}", self.user_context));
        }

        sections.join("\n\n")
    }

    pub fn is_degraded(&self) -> bool {
        !self.degraded_sources.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use voltwise_core::QueryType;

    fn bundle() -> ContextBundle {
        ContextBundle {
            system_context: "Current state:\n- Battery: 82% SOC".into(),
            kb_passages: vec![Passage {
                doc_id: "lfp-temps".into(),
                text: "LFP cells charge safely between 0 and 45 °C.".into(),
                score: 0.8,
                source: Some("lfp.md".into()),
            }],
            conversation_messages: vec![],
            user_context: String::new(),
            tokens: CategoryTokens {
                system: 9,
                knowledge: 12,
                conversation: 0,
                user: 0,
            },
            total_tokens: 21,
            cache_hit: false,
            classification: Classification::new(QueryType::System, 0.9),
            budget: crate::budget::BudgetPlanner::default().row(QueryType::System),
            over_budget: false,
            truncated: false,
            degraded_sources: vec![],
            drops: vec![],
        }
    }

    #[test]
    fn renders_sections_in_priority_order() {
        let rendered = bundle().render_sections();
        let system = rendered.find("[System State]").unwrap();
        let knowledge = rendered.find("[Retrieved Knowledge]").unwrap();
        assert!(system < knowledge);
        assert!(rendered.contains("[Source: lfp.md] LFP cells"));
        assert!(!rendered.contains("[User Profile]"));
    }

    #[test]
    fn serialized_bundle_round_trips() {
        let original = bundle();
        let json = serde_json::to_string(&original).unwrap();
        let restored: ContextBundle = serde_json::from_str(&json).unwrap();
        assert_eq!(restored, original);
    }

    #[test]
    fn failure_kinds_per_source() {
        assert_eq!(ContextSource::Knowledge.failure_kind(), FailureKind::KnowledgeUnavailable);
        assert_eq!(ContextSource::Conversation.failure_kind(), FailureKind::HistoryUnavailable);
    }
}
