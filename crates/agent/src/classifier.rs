//! Query classification — keyword scoring with anaphora carry-over.
//!
//! Each domain has a lexicon of single words (weight 1) and phrases
//! (weight 2). The highest-scoring domain wins when it does so clearly;
//! everything else is `general`. Short follow-ups that point back at the
//! previous answer ("is that safe?") inherit the previous turn's type unless
//! they carry strong evidence of their own.

use tracing::debug;
use voltwise_config::ClassifierConfig;
use voltwise_core::{Classification, FailureKind, PriorTurn, QueryType};

const SYSTEM_WORDS: &[&str] = &[
    "battery", "batteries", "soc", "charge", "charging", "discharging", "level", "solar",
    "panel", "panels", "inverter", "voltage", "current", "power", "load", "grid", "import",
    "export", "exporting", "importing", "telemetry", "status", "temperature", "temp",
    "producing", "production", "output", "watts", "kw", "kwh", "miner", "miners", "mining",
    "online", "offline", "alert", "alerts", "alarm", "now",
];
const SYSTEM_PHRASES: &[&str] = &[
    "battery level", "state of charge", "right now", "how much power", "is the battery",
    "are the miners", "current load", "solar output",
];

const PLANNING_WORDS: &[&str] = &[
    "plan", "planning", "schedule", "scheduling", "optimize", "optimise", "optimization",
    "tomorrow", "tonight", "forecast", "strategy", "should", "recommend", "recommendation",
    "tariff", "arbitrage", "shift", "overnight", "weekend", "maximize", "maximise", "minimize",
    "minimise", "budget",
];
const PLANNING_PHRASES: &[&str] = &[
    "best time", "when should", "should i", "charge schedule", "time of use", "peak hours",
    "off peak", "plan for",
];

const RESEARCH_WORDS: &[&str] = &[
    "why", "explain", "research", "chemistry", "lifepo4", "lfp", "lithium", "nmc",
    "degradation", "lifespan", "compare", "comparison", "difference", "safe", "safety",
    "study", "studies", "efficiency", "theory", "history", "article", "paper", "science",
    "hashrate", "halving", "difficulty",
];
const RESEARCH_PHRASES: &[&str] = &[
    "how does", "how do", "cycle life", "depth of discharge", "what is the difference",
    "pros and cons", "tell me about", "learn about",
];

const REFERRING_WORDS: &[&str] = &["that", "it", "this", "those", "them", "these", "there"];
const CONTINUATION_PREFIXES: &[&str] = &["and", "what about", "how about", "also", "so"];

const NO_SIGNAL_CONFIDENCE: f32 = 0.3;
const AMBIGUOUS_CONFIDENCE: f32 = 0.5;
const INHERITED_CONFIDENCE: f32 = 0.8;

struct Lexicon {
    query_type: QueryType,
    words: &'static [&'static str],
    phrases: &'static [&'static str],
}

const LEXICONS: [Lexicon; 3] = [
    Lexicon {
        query_type: QueryType::System,
        words: SYSTEM_WORDS,
        phrases: SYSTEM_PHRASES,
    },
    Lexicon {
        query_type: QueryType::Planning,
        words: PLANNING_WORDS,
        phrases: PLANNING_PHRASES,
    },
    Lexicon {
        query_type: QueryType::Research,
        words: RESEARCH_WORDS,
        phrases: RESEARCH_PHRASES,
    },
];

struct DomainScore {
    query_type: QueryType,
    score: u32,
    matched: Vec<String>,
}

pub struct QueryClassifier {
    ambiguity_threshold: f32,
    clear_domain_score: u32,
    anaphora_max_words: usize,
}

impl QueryClassifier {
    pub fn new(config: &ClassifierConfig) -> Self {
        Self {
            ambiguity_threshold: config.ambiguity_threshold,
            clear_domain_score: config.clear_domain_score,
            anaphora_max_words: config.anaphora_max_words,
        }
    }

    /// Classify a standalone query. Never fails.
    pub fn classify(&self, text: &str) -> Classification {
        self.classify_with_history(text, None)
    }

    /// Classify, letting a deictic follow-up inherit the prior turn's type.
    pub fn classify_with_history(&self, text: &str, prior: Option<PriorTurn>) -> Classification {
        let words = tokenize(text);
        let normalized = format!(" {} ", words.join(" "));

        let mut scores: Vec<DomainScore> = LEXICONS
            .iter()
            .map(|lexicon| score_domain(lexicon, &words, &normalized))
            .collect();
        scores.sort_by(|a, b| b.score.cmp(&a.score));

        let top_score = scores[0].score;

        if let Some(prior) = prior {
            if top_score < self.clear_domain_score && self.is_anaphoric(&words, &normalized) {
                debug!(
                    query_type = %prior.query_type,
                    top_score,
                    "Follow-up query inherits prior turn's type"
                );
                let mut classification =
                    Classification::new(prior.query_type, INHERITED_CONFIDENCE);
                classification.inherited = true;
                return classification;
            }
        }

        if top_score == 0 {
            return Classification::new(QueryType::General, NO_SIGNAL_CONFIDENCE);
        }

        if scores[1].score == top_score {
            debug!(
                kind = %FailureKind::AmbiguousIntent,
                first = %scores[0].query_type,
                second = %scores[1].query_type,
                top_score,
                "Tied domain scores, treating as general"
            );
            return Classification::new(QueryType::General, AMBIGUOUS_CONFIDENCE);
        }

        let total: u32 = scores.iter().map(|s| s.score).sum();
        let share = top_score as f32 / total as f32;
        let strength = (0.5 + 0.1 * top_score as f32).min(1.0);
        let confidence = share.min(strength);

        let winner = scores.swap_remove(0);
        if confidence < self.ambiguity_threshold {
            debug!(
                kind = %FailureKind::AmbiguousIntent,
                candidate = %winner.query_type,
                confidence,
                "Low-confidence classification, treating as general"
            );
            let mut classification =
                Classification::new(QueryType::General, confidence.min(AMBIGUOUS_CONFIDENCE));
            classification.matched = winner.matched;
            return classification;
        }

        let mut classification = Classification::new(winner.query_type, confidence);
        classification.matched = winner.matched;
        classification
    }

    fn is_anaphoric(&self, words: &[String], normalized: &str) -> bool {
        if words.is_empty() || words.len() > self.anaphora_max_words {
            return false;
        }
        let refers_back = words.iter().any(|w| REFERRING_WORDS.contains(&w.as_str()));
        let continues = CONTINUATION_PREFIXES
            .iter()
            .any(|prefix| normalized.starts_with(&format!(" {prefix} ")));
        refers_back || continues
    }
}

impl Default for QueryClassifier {
    fn default() -> Self {
        Self::new(&ClassifierConfig::default())
    }
}

fn tokenize(text: &str) -> Vec<String> {
    text.to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .map(str::to_string)
        .collect()
}

fn score_domain(lexicon: &Lexicon, words: &[String], normalized: &str) -> DomainScore {
    let mut score = 0;
    let mut matched = Vec::new();

    for phrase in lexicon.phrases {
        if normalized.contains(&format!(" {phrase} ")) {
            score += 2;
            matched.push(phrase.to_string());
        }
    }
    for word in words {
        if lexicon.words.contains(&word.as_str()) && !matched.contains(word) {
            score += 1;
            matched.push(word.clone());
        }
    }

    DomainScore {
        query_type: lexicon.query_type,
        score,
        matched,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use voltwise_core::AgentRole;

    fn classifier() -> QueryClassifier {
        QueryClassifier::default()
    }

    fn prior(query_type: QueryType) -> Option<PriorTurn> {
        Some(PriorTurn {
            query_type,
            agent_role: Some(AgentRole::SolarController),
        })
    }

    #[test]
    fn battery_level_is_system() {
        let c = classifier().classify("What is my battery level?");
        assert_eq!(c.query_type, QueryType::System);
        assert!(c.confidence >= 0.5);
        assert!(c.matched.contains(&"battery level".to_string()));
    }

    #[test]
    fn planning_query() {
        let c = classifier().classify("When should I schedule charging for tomorrow?");
        assert_eq!(c.query_type, QueryType::Planning);
    }

    #[test]
    fn research_query() {
        let c = classifier().classify("Explain LiFePO4 degradation and cycle life");
        assert_eq!(c.query_type, QueryType::Research);
        assert!(c.confidence > 0.5);
    }

    #[test]
    fn no_keywords_is_general() {
        let c = classifier().classify("Hello there, good morning");
        assert_eq!(c.query_type, QueryType::General);
        assert!((c.confidence - 0.3).abs() < f32::EPSILON);
    }

    #[test]
    fn empty_and_garbage_input_never_fail() {
        for text in ["", "   ", "?!?!", "\u{1f50b}\u{26a1}"] {
            let c = classifier().classify(text);
            assert_eq!(c.query_type, QueryType::General);
            assert!(c.confidence <= 0.5);
        }
    }

    #[test]
    fn tie_is_general_and_ambiguous() {
        // one system word, one research word
        let c = classifier().classify("battery chemistry");
        assert_eq!(c.query_type, QueryType::General);
        assert!(c.confidence <= 0.5);
    }

    #[test]
    fn follow_up_inherits_prior_type() {
        let c = classifier().classify_with_history("Is that safe?", prior(QueryType::System));
        assert_eq!(c.query_type, QueryType::System);
        assert!(c.inherited);
        assert!((c.confidence - 0.8).abs() < f32::EPSILON);
    }

    #[test]
    fn follow_up_without_history_classifies_itself() {
        let c = classifier().classify("Is that safe?");
        assert_eq!(c.query_type, QueryType::Research);
        assert!(!c.inherited);
    }

    #[test]
    fn clear_domain_change_overrides_history() {
        let c = classifier().classify_with_history(
            "What about the best time to charge tomorrow?",
            prior(QueryType::System),
        );
        assert_eq!(c.query_type, QueryType::Planning);
        assert!(!c.inherited);
    }

    #[test]
    fn long_queries_are_not_anaphoric() {
        let c = classifier().classify_with_history(
            "I was wondering whether it would be a good idea for the family",
            prior(QueryType::Research),
        );
        assert!(!c.inherited);
        assert_eq!(c.query_type, QueryType::General);
    }

    #[test]
    fn continuation_prefix_is_anaphoric() {
        let c = classifier().classify_with_history("And tomorrow?", prior(QueryType::Planning));
        assert_eq!(c.query_type, QueryType::Planning);
        assert!(c.inherited);
    }

    #[test]
    fn classification_is_deterministic() {
        let a = classifier().classify("How much power are the panels producing right now?");
        let b = classifier().classify("How much power are the panels producing right now?");
        assert_eq!(a, b);
        assert_eq!(a.query_type, QueryType::System);
    }
}
