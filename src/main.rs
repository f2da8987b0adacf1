//! Process bootstrap: configuration, schema validation, adapter wiring,
//! shutdown handling, and the update fan-out loop.

use anyhow::Context;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

use survey_sherpa::adapters::TelegramChatPort;
use survey_sherpa::config::{self, AppConfig};
use survey_sherpa::domain::questions::StrategyRegistry;
use survey_sherpa::domain::state::{DefaultFsmFactory, StateStore};
use survey_sherpa::domain::survey::Survey;
use survey_sherpa::engine::{Engine, EngineSettings};
use survey_sherpa::ports::{ChatError, ChatPort, Markup};

/// Long-poll timeout for getUpdates.
const POLL_TIMEOUT_SECS: u64 = 60;

/// Backoff after a failed poll before trying again.
const POLL_RETRY_DELAY: std::time::Duration = std::time::Duration::from_secs(3);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let app_config = AppConfig::load().context("failed to load configuration")?;
    app_config.validate().context("invalid configuration")?;

    let registry = Arc::new(StrategyRegistry::with_builtins());

    let survey = Survey::load(&app_config.survey_config_path)
        .context("failed to load survey document")?;
    survey
        .validate(|section_id, question| registry.validate_question(section_id, question))
        .context("survey validation failed")?;
    tracing::info!(
        path = %app_config.survey_config_path,
        sections = survey.sections.len(),
        "survey loaded and validated"
    );

    config::target::set(app_config.target_user_id);
    if !app_config.reviewer_configured() {
        tracing::warn!("TARGET_USER_ID is not set; reviewer-forward is disabled");
    }

    let adapter = Arc::new(
        TelegramChatPort::new(&app_config.bot_token)
            .context("failed to construct chat adapter")?,
    );

    let cancel = CancellationToken::new();
    let username = adapter
        .get_me(&cancel)
        .await
        .context("could not authorize against the chat API")?;
    tracing::info!(%username, "authorized");

    notify_target_on_startup(adapter.as_ref(), &cancel, app_config.target_user_id).await;

    let engine = Arc::new(Engine::new(
        adapter.clone() as Arc<dyn ChatPort>,
        Arc::new(survey),
        registry,
        Arc::new(StateStore::new(DefaultFsmFactory)),
        EngineSettings {
            delete_user_messages: app_config.delete_user_messages,
        },
    ));

    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::info!("shutdown signal received");
                cancel.cancel();
            }
        });
    }

    tracing::info!("starting update processing");
    let mut offset = 0i64;
    while !cancel.is_cancelled() {
        match adapter.poll_updates(&cancel, offset, POLL_TIMEOUT_SECS).await {
            Ok(updates) => {
                for (update_id, update) in updates {
                    offset = offset.max(update_id + 1);
                    let engine = engine.clone();
                    let cancel = cancel.clone();
                    tokio::spawn(async move {
                        engine.handle_update(&cancel, update).await;
                    });
                }
            }
            Err(ChatError::Canceled) | Err(ChatError::DeadlineExceeded) if cancel.is_cancelled() => {
                break;
            }
            Err(err) => {
                tracing::error!(code = err.code(), %err, "polling for updates failed");
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = tokio::time::sleep(POLL_RETRY_DELAY) => {}
                }
            }
        }
    }

    tracing::info!("shutdown complete");
    Ok(())
}

/// Tells the reviewer the bot is up. Failures are logged and swallowed; they
/// never block startup.
async fn notify_target_on_startup(port: &dyn ChatPort, cancel: &CancellationToken, target_id: i64) {
    if target_id == 0 {
        return;
    }
    if let Err(err) = port
        .send(cancel, target_id, "Survey bot started and ready.", Markup::None)
        .await
    {
        tracing::warn!(target_id, code = err.code(), %err, "startup notification failed");
    }
}
