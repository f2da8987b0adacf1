//! Survey schema: the immutable tree of sections and questions.
//!
//! Loaded once from YAML at startup, validated, then shared read-only for the
//! process lifetime. Sections live in a `BTreeMap` so every consumer (section
//! keyboard, check-mark computation, forward aggregation) iterates them in the
//! same deterministic order, sorted by section id.

use serde::Deserialize;
use std::collections::{BTreeMap, HashSet};
use std::path::Path;
use thiserror::Error;

/// Reserved prefix for strategy-private keys inside a record's data map.
///
/// User-defined storage keys must not start with it.
pub const RESERVED_KEY_PREFIX: char = '_';

/// Separator character of the callback payload grammar. Identifiers and
/// option values must not contain it.
pub const CALLBACK_SEPARATOR: char = ':';

/// Root of the survey document.
#[derive(Debug, Clone, Deserialize)]
pub struct Survey {
    pub sections: BTreeMap<String, Section>,
}

/// One titled group of questions.
#[derive(Debug, Clone, Deserialize)]
pub struct Section {
    pub title: String,
    #[serde(default)]
    pub questions: Vec<Question>,
}

/// A single question definition.
#[derive(Debug, Clone, Deserialize)]
pub struct Question {
    pub id: String,
    pub prompt: String,
    /// Type tag; must match a registered question strategy.
    #[serde(rename = "type")]
    pub kind: String,
    /// Globally unique key under which the answer is stored.
    pub store_key: String,
    /// Button options; required iff `kind == "buttons"`.
    #[serde(default)]
    pub options: Vec<ButtonOption>,
    /// Lower rating bound for the compound strategy (defaults to 1).
    #[serde(default)]
    pub rating_min: Option<u8>,
    /// Upper rating bound for the compound strategy (defaults to 10).
    #[serde(default)]
    pub rating_max: Option<u8>,
    #[serde(default)]
    pub next_button_label: Option<String>,
    #[serde(default)]
    pub finish_button_label: Option<String>,
}

/// One choice of a button question.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ButtonOption {
    pub text: String,
    pub value: String,
}

/// Validation and load failures. All of these are fatal at startup; none can
/// occur at runtime.
#[derive(Debug, Error)]
pub enum SchemaError {
    #[error("failed to read survey file '{path}': {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse survey YAML: {0}")]
    Parse(#[from] serde_yaml::Error),

    #[error("survey defines no sections")]
    NoSections,

    #[error("section '{section}' has no title")]
    MissingTitle { section: String },

    #[error("question #{index} in section '{section}' has no id")]
    MissingQuestionId { section: String, index: usize },

    #[error("question '{question}' in section '{section}' has no {field}")]
    EmptyField {
        section: String,
        question: String,
        field: &'static str,
    },

    #[error("duplicate store_key '{key}' (question '{question}', section '{section}')")]
    DuplicateStoreKey {
        section: String,
        question: String,
        key: String,
    },

    #[error("store_key '{key}' (question '{question}', section '{section}') starts with the reserved prefix '{RESERVED_KEY_PREFIX}'")]
    ReservedStoreKey {
        section: String,
        question: String,
        key: String,
    },

    #[error("identifier '{identifier}' in section '{section}' contains '{CALLBACK_SEPARATOR}'")]
    SeparatorInIdentifier { section: String, identifier: String },

    #[error("question '{question}' in section '{section}': {reason}")]
    Question {
        section: String,
        question: String,
        reason: String,
    },
}

impl SchemaError {
    /// Creates a strategy-level validation error for one question.
    pub fn question(
        section: impl Into<String>,
        question: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        SchemaError::Question {
            section: section.into(),
            question: question.into(),
            reason: reason.into(),
        }
    }
}

impl Survey {
    /// Loads a survey document from a YAML file. Validation is separate; see
    /// [`Survey::validate`].
    pub fn load(path: impl AsRef<Path>) -> Result<Self, SchemaError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|source| SchemaError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_yaml(&raw)
    }

    /// Parses a survey document from YAML text.
    pub fn from_yaml(raw: &str) -> Result<Self, SchemaError> {
        Ok(serde_yaml::from_str(raw)?)
    }

    /// Validates the schema.
    ///
    /// Structural checks run first; afterwards every question is handed to
    /// `question_validator`, which resolves the type tag against the strategy
    /// registry and applies the strategy's own rules.
    pub fn validate(
        &self,
        question_validator: impl Fn(&str, &Question) -> Result<(), SchemaError>,
    ) -> Result<(), SchemaError> {
        self.validate_structure()?;
        for (section_id, section) in &self.sections {
            for question in &section.questions {
                question_validator(section_id, question)?;
            }
        }
        Ok(())
    }

    fn validate_structure(&self) -> Result<(), SchemaError> {
        if self.sections.is_empty() {
            return Err(SchemaError::NoSections);
        }

        let mut seen_keys: HashSet<&str> = HashSet::new();

        for (section_id, section) in &self.sections {
            if section.title.is_empty() {
                return Err(SchemaError::MissingTitle {
                    section: section_id.clone(),
                });
            }
            if section_id.contains(CALLBACK_SEPARATOR) {
                return Err(SchemaError::SeparatorInIdentifier {
                    section: section_id.clone(),
                    identifier: section_id.clone(),
                });
            }

            for (index, question) in section.questions.iter().enumerate() {
                if question.id.is_empty() {
                    return Err(SchemaError::MissingQuestionId {
                        section: section_id.clone(),
                        index: index + 1,
                    });
                }
                if question.id.contains(CALLBACK_SEPARATOR) {
                    return Err(SchemaError::SeparatorInIdentifier {
                        section: section_id.clone(),
                        identifier: question.id.clone(),
                    });
                }
                if question.prompt.is_empty() {
                    return Err(SchemaError::EmptyField {
                        section: section_id.clone(),
                        question: question.id.clone(),
                        field: "prompt",
                    });
                }
                if question.store_key.is_empty() {
                    return Err(SchemaError::EmptyField {
                        section: section_id.clone(),
                        question: question.id.clone(),
                        field: "store_key",
                    });
                }
                if question.store_key.starts_with(RESERVED_KEY_PREFIX) {
                    return Err(SchemaError::ReservedStoreKey {
                        section: section_id.clone(),
                        question: question.id.clone(),
                        key: question.store_key.clone(),
                    });
                }
                if !seen_keys.insert(question.store_key.as_str()) {
                    return Err(SchemaError::DuplicateStoreKey {
                        section: section_id.clone(),
                        question: question.id.clone(),
                        key: question.store_key.clone(),
                    });
                }
                for option in &question.options {
                    if option.value.contains(CALLBACK_SEPARATOR) {
                        return Err(SchemaError::SeparatorInIdentifier {
                            section: section_id.clone(),
                            identifier: option.value.clone(),
                        });
                    }
                }
            }
        }
        Ok(())
    }

    /// Looks up a section by id.
    pub fn section(&self, section_id: &str) -> Option<&Section> {
        self.sections.get(section_id)
    }

    /// Resolves the question at `index` within `section_id`, if both exist.
    pub fn question_at(&self, section_id: &str, index: usize) -> Option<(&Section, &Question)> {
        let section = self.sections.get(section_id)?;
        let question = section.questions.get(index)?;
        Some((section, question))
    }
}

impl Question {
    /// Finds the button option with the given stored value.
    pub fn option_by_value(&self, value: &str) -> Option<&ButtonOption> {
        self.options.iter().find(|opt| opt.value == value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn accept_all(_: &str, _: &Question) -> Result<(), SchemaError> {
        Ok(())
    }

    fn minimal_yaml() -> &'static str {
        r#"
sections:
  personal:
    title: "Personal"
    questions:
      - id: q1
        prompt: "Name?"
        type: text
        store_key: name
      - id: q2
        prompt: "City?"
        type: buttons
        store_key: city
        options:
          - text: "Tbilisi"
            value: tb
          - text: "Other"
            value: ot
"#
    }

    #[test]
    fn parses_minimal_survey() {
        let survey = Survey::from_yaml(minimal_yaml()).unwrap();
        let section = survey.section("personal").unwrap();
        assert_eq!(section.title, "Personal");
        assert_eq!(section.questions.len(), 2);
        assert_eq!(section.questions[0].kind, "text");
        assert_eq!(section.questions[1].options.len(), 2);
    }

    #[test]
    fn load_reads_a_yaml_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("survey.yaml");
        std::fs::write(&path, minimal_yaml()).unwrap();

        let survey = Survey::load(&path).unwrap();
        assert!(survey.section("personal").is_some());

        let missing = Survey::load(dir.path().join("missing.yaml"));
        assert!(matches!(missing, Err(SchemaError::Io { .. })));
    }

    #[test]
    fn validate_accepts_minimal_survey() {
        let survey = Survey::from_yaml(minimal_yaml()).unwrap();
        assert!(survey.validate(accept_all).is_ok());
    }

    #[test]
    fn empty_section_list_fails() {
        let survey = Survey {
            sections: BTreeMap::new(),
        };
        assert!(matches!(
            survey.validate(accept_all),
            Err(SchemaError::NoSections)
        ));
    }

    #[test]
    fn missing_title_fails() {
        let yaml = r#"
sections:
  a:
    title: ""
    questions: []
"#;
        let survey = Survey::from_yaml(yaml).unwrap();
        assert!(matches!(
            survey.validate(accept_all),
            Err(SchemaError::MissingTitle { section }) if section == "a"
        ));
    }

    #[test]
    fn duplicate_store_key_across_sections_fails() {
        let yaml = r#"
sections:
  a:
    title: "A"
    questions:
      - { id: q1, prompt: "P", type: text, store_key: shared }
  b:
    title: "B"
    questions:
      - { id: q2, prompt: "P", type: text, store_key: shared }
"#;
        let survey = Survey::from_yaml(yaml).unwrap();
        assert!(matches!(
            survey.validate(accept_all),
            Err(SchemaError::DuplicateStoreKey { key, .. }) if key == "shared"
        ));
    }

    #[test]
    fn reserved_store_key_prefix_fails() {
        let yaml = r#"
sections:
  a:
    title: "A"
    questions:
      - { id: q1, prompt: "P", type: text, store_key: _hidden }
"#;
        let survey = Survey::from_yaml(yaml).unwrap();
        assert!(matches!(
            survey.validate(accept_all),
            Err(SchemaError::ReservedStoreKey { key, .. }) if key == "_hidden"
        ));
    }

    #[test]
    fn separator_in_question_id_fails() {
        let yaml = r#"
sections:
  a:
    title: "A"
    questions:
      - { id: "q:1", prompt: "P", type: text, store_key: k }
"#;
        let survey = Survey::from_yaml(yaml).unwrap();
        assert!(matches!(
            survey.validate(accept_all),
            Err(SchemaError::SeparatorInIdentifier { identifier, .. }) if identifier == "q:1"
        ));
    }

    #[test]
    fn separator_in_option_value_fails() {
        let yaml = r#"
sections:
  a:
    title: "A"
    questions:
      - id: q1
        prompt: "P"
        type: buttons
        store_key: k
        options:
          - { text: "Bad", value: "x:y" }
"#;
        let survey = Survey::from_yaml(yaml).unwrap();
        assert!(matches!(
            survey.validate(accept_all),
            Err(SchemaError::SeparatorInIdentifier { identifier, .. }) if identifier == "x:y"
        ));
    }

    #[test]
    fn question_validator_runs_after_structural_checks() {
        let survey = Survey::from_yaml(minimal_yaml()).unwrap();
        let result = survey.validate(|section_id, question| {
            Err(SchemaError::question(section_id, &question.id, "rejected"))
        });
        assert!(matches!(
            result,
            Err(SchemaError::Question { question, .. }) if question == "q1"
        ));
    }

    #[test]
    fn sections_iterate_sorted_by_id() {
        let yaml = r#"
sections:
  zeta: { title: "Z", questions: [] }
  alpha: { title: "A", questions: [] }
  mid: { title: "M", questions: [] }
"#;
        let survey = Survey::from_yaml(yaml).unwrap();
        let ids: Vec<&str> = survey.sections.keys().map(String::as_str).collect();
        assert_eq!(ids, vec!["alpha", "mid", "zeta"]);
    }

    #[test]
    fn question_at_resolves_valid_indices_only() {
        let survey = Survey::from_yaml(minimal_yaml()).unwrap();
        assert!(survey.question_at("personal", 0).is_some());
        assert!(survey.question_at("personal", 1).is_some());
        assert!(survey.question_at("personal", 2).is_none());
        assert!(survey.question_at("missing", 0).is_none());
    }

    #[test]
    fn option_by_value_matches_exactly() {
        let survey = Survey::from_yaml(minimal_yaml()).unwrap();
        let (_, question) = survey.question_at("personal", 1).unwrap();
        assert_eq!(question.option_by_value("tb").map(|o| o.text.as_str()), Some("Tbilisi"));
        assert!(question.option_by_value("Tbilisi").is_none());
    }
}
