//! Logwarden
//!
//! Multi-tenant log ingestion and query API built on Rust + Actix-Web.
//! Producers submit logs under per-project API keys; operators search,
//! inspect, and purge them under bearer tokens. Submissions pass a
//! constraint gate and a billing-anchored quota before being enqueued for
//! asynchronous persistence and alarm evaluation.

use actix_web::{middleware, web, App, HttpServer};
use std::sync::Arc;
use tracing::{info, warn};
use tracing_actix_web::TracingLogger;

mod alarm;
mod api;
mod auth;
mod billing;
mod bus;
mod config;
mod constraints;
mod db;
mod domain;
mod ingest;
mod kv;
mod mail;
mod purge;
mod search;
mod services;

use crate::alarm::{AlarmDispatcher, AlarmWorker};
use crate::auth::JwtVerifier;
use crate::billing::{QuotaEngine, QuotaNotifier};
use crate::bus::LocalBus;
use crate::config::Settings;
use crate::db::{DbPool, LogRepository, ProjectRepository, UserRepository};
use crate::ingest::IngestWorker;
use crate::kv::{KvStore, MemoryKv, RedisKv};
use crate::mail::{HttpMailer, MailSink, NoopMailer};
use crate::search::PgSearchIndex;
use crate::services::{ApiKeyCache, Services, UsageMetaCache};

/// Application state shared across all handlers
pub struct AppState {
    pub services: Arc<Services>,
}

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables from .env file
    dotenvy::dotenv().ok();

    // Initialize tracing subscriber for structured logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("logwarden=info".parse()?)
                .add_directive("actix_web=info".parse()?),
        )
        .json()
        .init();

    let settings = Settings::load().map_err(|e| anyhow::anyhow!("configuration: {e}"))?;
    let bind_addr = format!("{}:{}", settings.server.host, settings.server.port);

    info!(
        "Starting Logwarden v{} on {}",
        env!("CARGO_PKG_VERSION"),
        bind_addr
    );

    // Primary store
    let pool = DbPool::new(&settings.database.url)?;
    pool.test_connection().await?;
    pool.ensure_schema().await?;

    // Counter store: Redis when configured, in-process otherwise
    let kv: Arc<dyn KvStore> = if settings.redis.url.is_empty() {
        warn!("no Redis URL configured, using the in-process counter store");
        Arc::new(MemoryKv::new())
    } else {
        Arc::new(RedisKv::connect(&settings.redis.url).await?)
    };

    // Mail sink
    let mailer: Arc<dyn MailSink> = if settings.mail.endpoint.is_empty() {
        warn!("no mail endpoint configured, quota and alarm emails are dropped");
        Arc::new(NoopMailer)
    } else {
        Arc::new(HttpMailer::new(
            settings.mail.endpoint.clone(),
            settings.mail.api_key.clone(),
            settings.mail.from.clone(),
        ))
    };

    let services = Arc::new(Services {
        logs: LogRepository::new(pool.clone()),
        projects: ProjectRepository::new(pool.clone()),
        users: UserRepository::new(pool.clone()),
        index: Arc::new(PgSearchIndex::new(pool.clone())),
        bus: Arc::new(LocalBus::new()),
        verifier: Arc::new(JwtVerifier::new(&settings.auth.jwt_secret)),
        quota: QuotaEngine::new(kv.clone()),
        notifier: Arc::new(QuotaNotifier::new(kv, mailer.clone())),
        key_cache: ApiKeyCache::new(),
        usage_cache: UsageMetaCache::new(),
    });

    // Attach the bus consumers before accepting traffic
    IngestWorker::start(services.clone()).await?;
    AlarmWorker::start(services.clone(), Arc::new(AlarmDispatcher::new(mailer))).await?;
    info!("ingestion and alarm workers attached");

    let workers = settings
        .server
        .workers
        .unwrap_or_else(|| num_cpus::get() * 2);
    let app_state = web::Data::new(AppState { services });

    HttpServer::new(move || {
        App::new()
            .app_data(app_state.clone())
            .wrap(TracingLogger::default())
            .wrap(middleware::Compress::default())
            .wrap(
                middleware::DefaultHeaders::new()
                    .add(("X-Service", "logwarden"))
                    .add(("X-Version", env!("CARGO_PKG_VERSION"))),
            )
            .configure(api::configure_routes)
    })
    .workers(workers)
    .bind(&bind_addr)?
    .run()
    .await?;

    Ok(())
}
