//! Per query type token budgets.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::warn;
use voltwise_config::{BudgetRowConfig, ContextConfig};
use voltwise_core::{Classification, QueryType};

/// How much of each context category a request may use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenBudget {
    pub system_max: usize,
    pub kb_max_docs: usize,
    pub kb_max_tokens: usize,
    pub conv_max_messages: usize,
    pub conv_max_tokens: usize,
    pub user_max_tokens: usize,
}

impl TokenBudget {
    /// Sum of the four token maxima, saturating at `usize::MAX`.
    pub fn aggregate(&self) -> usize {
        self.system_max
            .saturating_add(self.kb_max_tokens)
            .saturating_add(self.conv_max_tokens)
            .saturating_add(self.user_max_tokens)
    }

    fn from_row(row: &BudgetRowConfig) -> Self {
        Self {
            system_max: row.system_max.unwrap_or_default(),
            kb_max_docs: row.kb_max_docs.unwrap_or_default(),
            kb_max_tokens: row.kb_max_tokens.unwrap_or_default(),
            conv_max_messages: row.conv_max_messages.unwrap_or_default(),
            conv_max_tokens: row.conv_max_tokens.unwrap_or_default(),
            user_max_tokens: row.user_max_tokens.unwrap_or_default(),
        }
    }
}

/// Pure lookup from query type to [`TokenBudget`], fixed at construction.
#[derive(Debug, Clone)]
pub struct BudgetPlanner {
    rows: BTreeMap<QueryType, TokenBudget>,
}

impl BudgetPlanner {
    /// Configured rows override the built-in ones field by field. Rows
    /// named after unknown query types are ignored. Every row's
    /// `system_max` is raised to at least `reserved_system_tokens`.
    pub fn new(
        reserved_system_tokens: usize,
        configured: &BTreeMap<String, BudgetRowConfig>,
    ) -> Self {
        for name in configured.keys() {
            if QueryType::parse(name).is_none() {
                warn!(row = %name, "Ignoring budget row for unknown query type");
            }
        }

        let rows = QueryType::ALL
            .into_iter()
            .map(|query_type| {
                let row = match configured
                    .iter()
                    .find(|(name, _)| QueryType::parse(name) == Some(query_type))
                {
                    Some((_, row)) => row.or(&BudgetRowConfig::builtin(query_type)),
                    None => BudgetRowConfig::builtin(query_type),
                };
                let mut budget = TokenBudget::from_row(&row);
                budget.system_max = budget.system_max.max(reserved_system_tokens);
                (query_type, budget)
            })
            .collect();

        Self { rows }
    }

    pub fn from_config(config: &ContextConfig) -> Self {
        Self::new(config.reserved_system_tokens, &config.budgets)
    }

    pub fn plan(&self, classification: &Classification) -> TokenBudget {
        self.row(classification.query_type)
    }

    pub fn row(&self, query_type: QueryType) -> TokenBudget {
        self.rows
            .get(&query_type)
            .or_else(|| self.rows.get(&QueryType::General))
            .copied()
            .unwrap_or_else(|| TokenBudget::from_row(&BudgetRowConfig::builtin(QueryType::General)))
    }
}

impl Default for BudgetPlanner {
    fn default() -> Self {
        Self::from_config(&ContextConfig::default())
    }
}
