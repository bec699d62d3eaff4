use std::sync::Arc;

use moldquote_core::config::{AppConfig, ConfigError, LoadOptions, SinkKind};
use moldquote_core::dialogue::{ConversationService, DialogueEngine};
use moldquote_core::session::InMemorySessionStore;
use moldquote_core::sink::{DiscardingQuotationSink, QuotationSink};
use moldquote_db::{
    connect_with_settings, migrations, BigQueryConfigError, BigQuerySink, DbPool,
    SqlQuotationRepository,
};
use moldquote_line::events::{conversation_dispatcher, EventDispatcher};
use moldquote_line::reply::{LineMessagingClient, ReplyError, ReplySender};
use moldquote_line::signature::SignatureVerifier;
use thiserror::Error;
use tracing::{info, warn};

use crate::health::PersistenceProbe;

pub struct Application {
    pub config: AppConfig,
    pub db_pool: Option<DbPool>,
    pub service: Arc<ConversationService>,
    pub dispatcher: Arc<EventDispatcher>,
    pub verifier: Option<SignatureVerifier>,
}

impl Application {
    pub fn persistence_probe(&self) -> PersistenceProbe {
        match (&self.db_pool, self.config.sink.kind) {
            (Some(pool), _) => PersistenceProbe::Sqlite(pool.clone()),
            (None, SinkKind::BigQuery) => PersistenceProbe::Remote {
                sink: "bigquery",
                detail: format!(
                    "streaming to {}.{}.{}",
                    self.config.sink.project_id.as_deref().unwrap_or_default(),
                    self.config.sink.dataset.as_deref().unwrap_or_default(),
                    self.config.sink.table.as_deref().unwrap_or_default()
                ),
            },
            (None, _) => PersistenceProbe::Disabled,
        }
    }
}

#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("database connection failed: {0}")]
    DatabaseConnect(#[source] sqlx::Error),
    #[error("database migration failed: {0}")]
    Migration(#[source] sqlx::migrate::MigrateError),
    #[error("warehouse sink setup failed: {0}")]
    Warehouse(#[from] BigQueryConfigError),
    #[error("messaging client setup failed: {0}")]
    Messaging(#[from] ReplyError),
}

pub async fn bootstrap(options: LoadOptions) -> Result<Application, BootstrapError> {
    let config = AppConfig::load(options)?;
    bootstrap_with_config(config).await
}

pub async fn bootstrap_with_config(config: AppConfig) -> Result<Application, BootstrapError> {
    let replies: Arc<dyn ReplySender> = Arc::new(LineMessagingClient::from_config(&config.line)?);
    assemble(config, replies).await
}

/// Wires the application around an already-built reply sender.
pub async fn assemble(
    config: AppConfig,
    replies: Arc<dyn ReplySender>,
) -> Result<Application, BootstrapError> {
    info!(
        event_name = "system.bootstrap.start",
        correlation_id = "bootstrap",
        sink = config.sink.kind.as_str(),
        "starting application bootstrap"
    );

    let (sink, db_pool): (Arc<dyn QuotationSink>, Option<DbPool>) = match config.sink.kind {
        SinkKind::Sqlite => {
            let pool = connect_database(&config).await?;
            (Arc::new(SqlQuotationRepository::new(pool.clone())), Some(pool))
        }
        SinkKind::BigQuery => {
            let sink = BigQuerySink::from_config(&config.sink)?;
            info!(
                event_name = "system.bootstrap.warehouse_configured",
                correlation_id = "bootstrap",
                table = %sink.table().qualified_name(),
                "warehouse sink configured"
            );
            (Arc::new(sink), None)
        }
        SinkKind::None => {
            warn!(
                event_name = "system.bootstrap.persistence_disabled",
                correlation_id = "bootstrap",
                "sink.kind is none, finished quotations will only be logged"
            );
            (Arc::new(DiscardingQuotationSink), None)
        }
    };

    let engine = DialogueEngine::new(
        config.pricing.catalog()?,
        config.pricing.calculator()?,
        config.dialogue.policy(),
    );
    let service = Arc::new(ConversationService::new(
        engine,
        config.reply_catalog(),
        Arc::new(InMemorySessionStore::default()),
        sink,
    ));
    let dispatcher = Arc::new(conversation_dispatcher(service.clone(), replies));

    let verifier = config.line.channel_secret.clone().map(SignatureVerifier::new);
    if verifier.is_none() {
        warn!(
            event_name = "system.bootstrap.signature_check_disabled",
            correlation_id = "bootstrap",
            "line.channel_secret is not set, webhook signatures will not be verified"
        );
    }

    Ok(Application { config, db_pool, service, dispatcher, verifier })
}

async fn connect_database(config: &AppConfig) -> Result<DbPool, BootstrapError> {
    let db_pool = connect_with_settings(
        &config.database.url,
        config.database.max_connections,
        config.database.timeout_secs,
    )
    .await
    .map_err(BootstrapError::DatabaseConnect)?;
    info!(
        event_name = "system.bootstrap.database_connected",
        correlation_id = "bootstrap",
        "database connection established"
    );

    migrations::run_pending(&db_pool).await.map_err(BootstrapError::Migration)?;
    info!(
        event_name = "system.bootstrap.migrations_applied",
        correlation_id = "bootstrap",
        "database migrations applied"
    );

    Ok(db_pool)
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use moldquote_core::config::{ConfigOverrides, LoadOptions, SinkKind};
    use moldquote_line::reply::RecordingReplySender;

    use crate::bootstrap::{assemble, bootstrap};
    use crate::health::PersistenceProbe;

    fn valid_overrides(database_url: &str) -> LoadOptions {
        LoadOptions {
            overrides: ConfigOverrides {
                database_url: Some(database_url.to_string()),
                line_channel_access_token: Some("line-token".to_string()),
                line_channel_secret: Some("line-secret".to_string()),
                ..ConfigOverrides::default()
            },
            ..LoadOptions::default()
        }
    }

    #[tokio::test]
    async fn bootstrap_fails_fast_with_invalid_database_url() {
        let mut options = valid_overrides("postgres://nope");
        options.overrides.sink_kind = Some(SinkKind::Sqlite);

        let result = bootstrap(options).await;

        let message = result.err().map(|error| error.to_string()).unwrap_or_default();
        assert!(message.contains("database.url"), "{message}");
    }

    #[tokio::test]
    async fn sqlite_bootstrap_runs_migrations_and_persists_dialogue() {
        let options = valid_overrides("sqlite::memory:");
        let config = moldquote_core::config::AppConfig::load(options).expect("config");
        let replies = RecordingReplySender::default();

        let app = assemble(config, Arc::new(replies)).await.expect("bootstrap");
        let pool = app.db_pool.clone().expect("sqlite pool");
        assert!(matches!(app.persistence_probe(), PersistenceProbe::Sqlite(_)));
        assert!(app.verifier.is_some());

        for text in ["เริ่มคำนวณ", "PP", "10x10x10", "100", "ใช่"] {
            app.service.handle_message("U1", text, "test").await;
        }
        let turn = app.service.handle_message("U1", "Somchai, 0812345678, s@example.com", "test").await;
        assert!(turn.persisted.is_some());

        let (rows,): (i64,) =
            sqlx::query_as("SELECT COUNT(*) FROM quotation").fetch_one(&pool).await.expect("count");
        assert_eq!(rows, 1);

        pool.close().await;
    }

    #[tokio::test]
    async fn none_sink_skips_database() {
        let mut options = valid_overrides("sqlite::memory:");
        options.overrides.sink_kind = Some(SinkKind::None);
        options.overrides.line_channel_secret = None;
        let config = moldquote_core::config::AppConfig::load(options).expect("config");

        let app = assemble(config, Arc::new(RecordingReplySender::default())).await.expect("app");

        assert!(app.db_pool.is_none());
        assert!(matches!(app.persistence_probe(), PersistenceProbe::Disabled));
        assert_eq!(app.service.sink_name(), "none");
    }
}
