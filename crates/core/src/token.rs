//! Token estimation utilities.
//!
//! Exact counts depend on the model's tokenizer, so estimation is a
//! pluggable [`TokenEstimator`]. The default is a character heuristic:
//! ~4 characters per token, rounded up, which stays within ~10% of BPE
//! tokenizers on English text.

use crate::message::ConversationMessage;

/// Per-message overhead for role name and delimiters in the wire format.
pub const MESSAGE_OVERHEAD_TOKENS: usize = 4;

/// Text → approximate token count.
pub trait TokenEstimator: Send + Sync {
    fn estimate(&self, text: &str) -> usize;

    /// Tokens for one conversation turn, including overhead.
    fn estimate_message(&self, message: &ConversationMessage) -> usize {
        MESSAGE_OVERHEAD_TOKENS + self.estimate(&message.content)
    }
}

/// `ceil(chars / chars_per_token)`.
#[derive(Debug, Clone, Copy)]
pub struct CharHeuristicEstimator {
    chars_per_token: usize,
}

impl CharHeuristicEstimator {
    pub fn new(chars_per_token: usize) -> Self {
        Self {
            chars_per_token: chars_per_token.max(1),
        }
    }
}

impl Default for CharHeuristicEstimator {
    fn default() -> Self {
        Self::new(4)
    }
}

impl TokenEstimator for CharHeuristicEstimator {
    fn estimate(&self, text: &str) -> usize {
        if text.is_empty() {
            return 0;
        }
        text.len().div_ceil(self.chars_per_token)
    }
}

/// Cut `text` from the tail so it fits in `max_tokens`.
///
/// Whole lines are kept while they fit, so structured content loses its
/// least important trailing sections first. If even the first line does not
/// fit, it is cut at the longest char-boundary prefix that does. Returns the
/// kept text and whether anything was removed.
pub fn truncate_to_tokens(
    estimator: &dyn TokenEstimator,
    text: &str,
    max_tokens: usize,
) -> (String, bool) {
    if estimator.estimate(text) <= max_tokens {
        return (text.to_string(), false);
    }
    if max_tokens == 0 {
        return (String::new(), true);
    }

    let mut end = 0;
    for (idx, _) in text.match_indices('\n') {
        if estimator.estimate(&text[..idx]) > max_tokens {
            break;
        }
        end = idx;
    }
    if end > 0 {
        return (text[..end].to_string(), true);
    }

    // First line alone is too large: binary search the char boundary.
    let boundaries: Vec<usize> = text.char_indices().map(|(i, _)| i).skip(1).collect();
    let (mut lo, mut hi) = (0usize, boundaries.len());
    while lo < hi {
        let mid = (lo + hi).div_ceil(2);
        if estimator.estimate(&text[..boundaries[mid - 1]]) <= max_tokens {
            lo = mid;
        } else {
            hi = mid - 1;
        }
    }
    let cut = if lo == 0 { 0 } else { boundaries[lo - 1] };
    (text[..cut].to_string(), true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::Role;
    use chrono::Utc;

    #[test]
    fn empty_string_is_zero() {
        assert_eq!(CharHeuristicEstimator::default().estimate(""), 0);
    }

    #[test]
    fn four_chars_is_one_token() {
        assert_eq!(CharHeuristicEstimator::default().estimate("test"), 1);
    }

    #[test]
    fn five_chars_rounds_up() {
        assert_eq!(CharHeuristicEstimator::default().estimate("hello"), 2);
    }

    #[test]
    fn custom_ratio() {
        let est = CharHeuristicEstimator::new(2);
        assert_eq!(est.estimate("abcde"), 3);
        assert_eq!(CharHeuristicEstimator::new(0).estimate("ab"), 2);
    }

    #[test]
    fn message_includes_overhead() {
        let msg = ConversationMessage {
            id: 1,
            session_id: "s".into(),
            role: Role::User,
            content: "test".into(),
            created_at: Utc::now(),
            agent_role: None,
            query_type: None,
            tokens: None,
            duration_ms: None,
        };
        assert_eq!(CharHeuristicEstimator::default().estimate_message(&msg), 5);
    }

    #[test]
    fn truncate_keeps_text_that_fits() {
        let est = CharHeuristicEstimator::default();
        let (kept, truncated) = truncate_to_tokens(&est, "short", 10);
        assert_eq!(kept, "short");
        assert!(!truncated);
    }

    #[test]
    fn truncate_drops_trailing_lines_first() {
        let est = CharHeuristicEstimator::default();
        let text = "line one ok\nline two ok\nline three is the long historical tail";
        let (kept, truncated) = truncate_to_tokens(&est, text, 6);
        assert!(truncated);
        assert_eq!(kept, "line one ok\nline two ok");
        assert!(est.estimate(&kept) <= 6);
    }

    #[test]
    fn truncate_cuts_a_single_long_line() {
        let est = CharHeuristicEstimator::default();
        let text = "x".repeat(100);
        let (kept, truncated) = truncate_to_tokens(&est, &text, 5);
        assert!(truncated);
        assert_eq!(kept.len(), 20);
    }

    #[test]
    fn truncate_respects_char_boundaries() {
        let est = CharHeuristicEstimator::default();
        let text = "é".repeat(20); // 2 bytes each
        let (kept, _) = truncate_to_tokens(&est, &text, 3);
        assert!(est.estimate(&kept) <= 3);
        assert!(kept.chars().all(|c| c == 'é'));
    }

    #[test]
    fn truncate_to_zero_is_empty() {
        let est = CharHeuristicEstimator::default();
        assert_eq!(truncate_to_tokens(&est, "anything", 0), (String::new(), true));
    }
}
