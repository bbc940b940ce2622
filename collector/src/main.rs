use actix_web::{App, HttpServer, middleware, web};
use anyhow::{Context, Result};
use log::{info, warn};
use std::sync::Arc;

use watchtower_collector::config::{CollectorConfig, mask_secret};
use watchtower_collector::db::create_pool;
use watchtower_collector::services::notifier::notifier_from_config;
use watchtower_collector::services::token_authority::TokenAuthority;
use watchtower_collector::state::AppState;

#[actix_web::main]
async fn main() -> Result<()> {
    let config = CollectorConfig::from_env();
    env_logger::init_from_env(env_logger::Env::default().default_filter_or("info"));

    let pool = create_pool(&config.database_url)
        .await
        .with_context(|| format!("failed to open database {}", config.database_url))?;

    let authority = TokenAuthority::load(pool.clone(), config.bootstrap_token.as_deref())
        .await
        .context("failed to establish the login alert token")?;
    if let Some(token) = authority.current() {
        info!("Login alert token loaded: {}", mask_secret(&token));
    }

    if config.admin_api_key.is_none() {
        warn!("ADMIN_API_KEY not set. Admin endpoints will not be usable.");
    }

    let notifier = notifier_from_config(config.slack_webhook_url.as_deref(), config.notify_timeout)?;
    let state = web::Data::new(AppState::new(
        pool,
        Arc::new(authority),
        notifier,
        config.admin_api_key.clone(),
    ));

    info!("Watchtower collector listening on {}", config.bind_addr);
    HttpServer::new(move || {
        App::new()
            .app_data(state.clone())
            .wrap(middleware::Logger::default())
            .configure(watchtower_collector::configure)
    })
    .bind(&config.bind_addr)
    .with_context(|| format!("failed to bind {}", config.bind_addr))?
    .run()
    .await
    .context("collector server failed")
}
