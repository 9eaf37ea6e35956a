use actix_cors::Cors;
use actix_governor::{Governor, GovernorConfigBuilder};
use actix_web::{web, App, HttpServer};

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use bridgepay::webhook::{webhook_url, Environment};
use bridgepay_server::config::ServerConfig;
use bridgepay_server::routes;
use bridgepay_server::state::AppState;

fn build_cors(origins: &[String]) -> Cors {
    if origins.is_empty() {
        // Default: allow localhost on any port
        Cors::default()
            .allowed_origin_fn(|origin, _| {
                origin
                    .to_str()
                    .map(|o| o == "http://localhost" || o.starts_with("http://localhost:"))
                    .unwrap_or(false)
            })
            .allow_any_method()
            .allowed_headers(vec!["content-type", "authorization"])
            .max_age(3600)
    } else {
        let mut cors = Cors::default();
        for origin in origins {
            cors = cors.allowed_origin(origin);
        }
        cors.allow_any_method()
            .allowed_headers(vec!["content-type", "authorization"])
            .max_age(3600)
    }
}

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,actix_web=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = match ServerConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            tracing::error!("Invalid configuration: {e}");
            std::process::exit(1);
        }
    };

    if config.admin_token.is_none() {
        tracing::warn!("ADMIN_TOKEN not set — admin endpoints are disabled");
    }
    if config.public_metrics {
        tracing::warn!("BRIDGE_PUBLIC_METRICS set — /metrics endpoint is publicly accessible");
    }

    let port = config.port;
    let rate_limit_rpm = config.rate_limit_rpm;
    let cors_origins = config.allowed_origins.clone();
    let site_url = config.site.site_url.clone();
    let permalinks = config.site.permalinks;

    // No in-memory fallback: losing the master key makes every stored
    // credential and payment link unreadable.
    let state = match AppState::open(config) {
        Ok(state) => web::Data::new(state),
        Err(e) => {
            tracing::error!("Failed to open store: {e}");
            std::process::exit(1);
        }
    };

    tracing::info!("Bridge payment server listening on port {port}");
    tracing::info!("Rate limit: {rate_limit_rpm} req/min per IP");
    for env in [Environment::Production, Environment::Sandbox] {
        tracing::info!("  {env} webhook: {}", webhook_url(&site_url, permalinks, env));
    }

    let governor_conf = match GovernorConfigBuilder::default()
        .requests_per_minute(rate_limit_rpm)
        .finish()
    {
        Some(conf) => conf,
        None => {
            tracing::error!("Invalid RATE_LIMIT_RPM: {rate_limit_rpm}");
            std::process::exit(1);
        }
    };

    HttpServer::new(move || {
        App::new()
            .wrap(build_cors(&cors_origins))
            .wrap(Governor::new(&governor_conf))
            .app_data(state.clone())
            .app_data(web::JsonConfig::default().limit(65_536))
            .app_data(web::PayloadConfig::default().limit(262_144))
            .service(routes::health)
            .service(routes::metrics_endpoint)
            .service(routes::webhook_rewrite)
            .service(routes::webhook_query)
            .service(routes::banks)
            .service(routes::checkout_payment)
            .service(routes::checkout_return)
            .service(routes::test_credentials)
            .service(routes::test_webhook)
            .service(routes::get_settings)
            .service(routes::put_settings)
    })
    .bind(("0.0.0.0", port))?
    .run()
    .await
}
