//! Name-keyed registry of question strategies.
//!
//! Built once at startup, then shared immutably; the type tags of the survey
//! schema resolve against it both during validation and at dispatch time.

use std::collections::HashMap;

use crate::domain::survey::{Question, SchemaError};

use super::{ButtonsStrategy, QuestionStrategy, TextRatingStrategy, TextStrategy};

/// Registry of strategies, keyed by normalized name.
pub struct StrategyRegistry {
    strategies: HashMap<String, Box<dyn QuestionStrategy>>,
}

impl Default for StrategyRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl StrategyRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self {
            strategies: HashMap::new(),
        }
    }

    /// Creates a registry holding all built-in strategies.
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        registry.register(Box::new(TextStrategy));
        registry.register(Box::new(ButtonsStrategy));
        registry.register(Box::new(TextRatingStrategy));
        registry
    }

    /// Registers a strategy.
    ///
    /// # Panics
    ///
    /// Registering the same normalized name twice is a programming error and
    /// panics at startup.
    pub fn register(&mut self, strategy: Box<dyn QuestionStrategy>) {
        let key = normalize(strategy.name());
        if key.is_empty() {
            panic!("cannot register a question strategy with an empty name");
        }
        if self.strategies.contains_key(&key) {
            panic!("question strategy '{key}' already registered");
        }
        self.strategies.insert(key, strategy);
    }

    /// Looks up a strategy by type tag.
    pub fn get(&self, name: &str) -> Option<&dyn QuestionStrategy> {
        self.strategies.get(&normalize(name)).map(Box::as_ref)
    }

    /// Number of registered strategies.
    pub fn len(&self) -> usize {
        self.strategies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.strategies.is_empty()
    }

    /// Validates one question: resolves the type tag, then applies the
    /// strategy's own rules. A missing strategy is a validation error naming
    /// the section and question.
    pub fn validate_question(&self, section_id: &str, question: &Question) -> Result<(), SchemaError> {
        match self.get(&question.kind) {
            Some(strategy) => strategy.validate(section_id, question),
            None => Err(SchemaError::question(
                section_id,
                &question.id,
                format!("unknown question type '{}'", question.kind),
            )),
        }
    }
}

fn normalize(name: &str) -> String {
    name.trim().to_lowercase()
}

#[cfg(test)]
mod tests {
    use super::super::testing;
    use super::*;

    #[test]
    fn builtins_are_all_registered() {
        let registry = StrategyRegistry::with_builtins();
        assert_eq!(registry.len(), 3);
        assert!(registry.get("text").is_some());
        assert!(registry.get("buttons").is_some());
        assert!(registry.get("text_rating").is_some());
    }

    #[test]
    fn lookup_normalizes_case_and_whitespace() {
        let registry = StrategyRegistry::with_builtins();
        assert!(registry.get("  Text ").is_some());
        assert!(registry.get("BUTTONS").is_some());
        assert!(registry.get("unknown").is_none());
    }

    #[test]
    #[should_panic(expected = "already registered")]
    fn duplicate_registration_panics() {
        let mut registry = StrategyRegistry::with_builtins();
        registry.register(Box::new(TextStrategy));
    }

    #[test]
    fn validate_question_reports_unknown_type() {
        let registry = StrategyRegistry::with_builtins();
        let question = testing::question("telepathy", "k");

        let err = registry.validate_question("sec", &question).unwrap_err();
        assert!(matches!(
            err,
            SchemaError::Question { section, question, .. }
                if section == "sec" && question == "q1"
        ));
    }

    #[test]
    fn validate_question_delegates_to_the_strategy() {
        let registry = StrategyRegistry::with_builtins();
        // A buttons question with no options fails the strategy's own check.
        let question = testing::question("buttons", "k");
        assert!(registry.validate_question("sec", &question).is_err());
    }
}
