//! Application configuration.
//!
//! Loaded from environment variables (with `.env` support in development)
//! using the `config` and `dotenvy` crates, then validated once before
//! anything else starts. The survey document itself lives in a separate YAML
//! file; see `domain::survey`.
//!
//! # Environment variables
//!
//! - `BOT_TOKEN` - chat transport credential, required
//! - `TARGET_USER_ID` - reviewer chat id; zero or absent disables
//!   reviewer-forward with a user-visible warning, an unparseable value is
//!   fatal
//! - `DELETE_USER_MESSAGES` - case-insensitive `true`/`false`, default false
//! - `SURVEY_CONFIG_PATH` - survey YAML path, default `survey.yaml`

mod error;
pub mod target;

pub use error::{ConfigError, ValidationError};

use serde::{Deserialize, Deserializer};

fn default_survey_path() -> String {
    "survey.yaml".to_string()
}

/// Root application configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    /// Chat transport credential.
    pub bot_token: String,

    /// Reviewer chat id for forwarded answers. 0 = disabled.
    #[serde(default)]
    pub target_user_id: i64,

    /// Delete participants' free-text answer messages after processing.
    #[serde(default, deserialize_with = "de_loose_bool")]
    pub delete_user_messages: bool,

    /// Path of the survey YAML document.
    #[serde(default = "default_survey_path")]
    pub survey_config_path: String,
}

impl AppConfig {
    /// Loads configuration from environment variables.
    ///
    /// A `.env` file is read first when present (development convenience);
    /// real environment variables win.
    pub fn load() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        let config = config::Config::builder()
            .add_source(config::Environment::default())
            .build()?
            .try_deserialize()?;

        Ok(config)
    }

    /// Semantic validation of loaded values.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.bot_token.is_empty() {
            return Err(ValidationError::empty_field("bot_token"));
        }
        if self.survey_config_path.is_empty() {
            return Err(ValidationError::empty_field("survey_config_path"));
        }
        Ok(())
    }

    /// True when reviewer-forward is usable.
    pub fn reviewer_configured(&self) -> bool {
        self.target_user_id != 0
    }
}

/// Accepts booleans as real booleans or case-insensitive `"true"`/`"false"`
/// strings, which is what environment sources produce.
fn de_loose_bool<'de, D>(deserializer: D) -> Result<bool, D::Error>
where
    D: Deserializer<'de>,
{
    struct LooseBool;

    impl serde::de::Visitor<'_> for LooseBool {
        type Value = bool;

        fn expecting(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            f.write_str("a boolean or a true/false string")
        }

        fn visit_bool<E: serde::de::Error>(self, value: bool) -> Result<bool, E> {
            Ok(value)
        }

        fn visit_str<E: serde::de::Error>(self, value: &str) -> Result<bool, E> {
            if value.eq_ignore_ascii_case("true") {
                Ok(true)
            } else if value.eq_ignore_ascii_case("false") || value.is_empty() {
                Ok(false)
            } else {
                Err(E::custom(format!("not a boolean: '{value}'")))
            }
        }
    }

    deserializer.deserialize_any(LooseBool)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::env;
    use std::sync::Mutex;

    // Env vars are process-global; serialize the tests that touch them.
    static ENV_MUTEX: Mutex<()> = Mutex::new(());

    fn set_minimal_env() {
        env::set_var("BOT_TOKEN", "123:abc");
        env::remove_var("TARGET_USER_ID");
        env::remove_var("DELETE_USER_MESSAGES");
        env::remove_var("SURVEY_CONFIG_PATH");
    }

    fn clear_env() {
        env::remove_var("BOT_TOKEN");
        env::remove_var("TARGET_USER_ID");
        env::remove_var("DELETE_USER_MESSAGES");
        env::remove_var("SURVEY_CONFIG_PATH");
    }

    #[test]
    fn loads_with_defaults() {
        let _guard = ENV_MUTEX.lock().unwrap();
        set_minimal_env();
        let result = AppConfig::load();
        clear_env();

        let config = result.expect("minimal env should load");
        assert_eq!(config.bot_token, "123:abc");
        assert_eq!(config.target_user_id, 0);
        assert!(!config.delete_user_messages);
        assert_eq!(config.survey_config_path, "survey.yaml");
        assert!(!config.reviewer_configured());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn reads_target_and_flags() {
        let _guard = ENV_MUTEX.lock().unwrap();
        set_minimal_env();
        env::set_var("TARGET_USER_ID", "999");
        env::set_var("DELETE_USER_MESSAGES", "TRUE");
        env::set_var("SURVEY_CONFIG_PATH", "demo/survey.yaml");
        let result = AppConfig::load();
        clear_env();

        let config = result.unwrap();
        assert_eq!(config.target_user_id, 999);
        assert!(config.delete_user_messages);
        assert_eq!(config.survey_config_path, "demo/survey.yaml");
        assert!(config.reviewer_configured());
    }

    #[test]
    fn negative_target_id_parses() {
        let _guard = ENV_MUTEX.lock().unwrap();
        set_minimal_env();
        env::set_var("TARGET_USER_ID", "-100123");
        let result = AppConfig::load();
        clear_env();

        assert_eq!(result.unwrap().target_user_id, -100123);
    }

    #[test]
    fn unparseable_target_id_is_fatal() {
        let _guard = ENV_MUTEX.lock().unwrap();
        set_minimal_env();
        env::set_var("TARGET_USER_ID", "not-a-number");
        let result = AppConfig::load();
        clear_env();

        assert!(result.is_err());
    }

    #[test]
    fn garbage_delete_flag_is_fatal() {
        let _guard = ENV_MUTEX.lock().unwrap();
        set_minimal_env();
        env::set_var("DELETE_USER_MESSAGES", "maybe");
        let result = AppConfig::load();
        clear_env();

        assert!(result.is_err());
    }

    #[test]
    fn empty_token_fails_validation() {
        let config = AppConfig {
            bot_token: String::new(),
            target_user_id: 0,
            delete_user_messages: false,
            survey_config_path: default_survey_path(),
        };
        assert_eq!(
            config.validate(),
            Err(ValidationError::empty_field("bot_token"))
        );
    }
}
