use std::collections::HashMap;

use actix_web::{get, post, put, route, web, HttpRequest, HttpResponse};
use bridgepay::gateway::PaymentContext;
use bridgepay::security::constant_time_eq;
use bridgepay::settings::error_text;
use bridgepay::webhook::{self, Environment, InboundRequest, WebhookAuthenticator};
use bridgepay::{fetch_banks, query, BridgeError, Credentials, NotificationOutcome, Order};
use serde::Deserialize;
use serde_json::{json, Value};

use crate::metrics;
use crate::state::AppState;

fn query_map(req: &HttpRequest) -> HashMap<String, String> {
    web::Query::<HashMap<String, String>>::from_query(req.query_string())
        .map(|q| q.into_inner())
        .unwrap_or_default()
}

fn bearer_matches(req: &HttpRequest, token: &[u8]) -> bool {
    req.headers()
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(|t| constant_time_eq(t.as_bytes(), token))
        .unwrap_or(false)
}

/// Admin routes need `Authorization: Bearer <ADMIN_TOKEN>`; with no token
/// configured they are closed.
fn require_admin(req: &HttpRequest, state: &AppState) -> Result<(), HttpResponse> {
    let Some(token) = &state.config.admin_token else {
        metrics::ADMIN_AUTH_FAILURES
            .with_label_values(&["disabled"])
            .inc();
        return Err(HttpResponse::Forbidden().json(json!({
            "error": "forbidden",
            "message": "Set ADMIN_TOKEN to enable admin endpoints"
        })));
    };
    if !bearer_matches(req, token) {
        tracing::warn!(path = %req.path(), "admin request rejected");
        metrics::ADMIN_AUTH_FAILURES
            .with_label_values(&["invalid"])
            .inc();
        return Err(HttpResponse::Unauthorized().json(json!({
            "error": "unauthorized",
            "message": "Valid Bearer token required"
        })));
    }
    Ok(())
}

#[get("/health")]
pub async fn health(state: web::Data<AppState>) -> HttpResponse {
    match state.vault.master_key() {
        Ok(_) => HttpResponse::Ok().json(json!({
            "status": "ok",
            "service": "bridgepay-server",
        })),
        Err(e) => {
            tracing::error!(error = %e, "vault master key unavailable");
            HttpResponse::ServiceUnavailable().json(json!({
                "status": "degraded",
                "service": "bridgepay-server",
                "error": "vault unavailable",
            }))
        }
    }
}

#[get("/metrics")]
pub async fn metrics_endpoint(req: HttpRequest, state: web::Data<AppState>) -> HttpResponse {
    if !state.config.public_metrics {
        if let Err(resp) = require_admin(&req, &state) {
            return resp;
        }
    }
    HttpResponse::Ok()
        .content_type("text/plain; version=0.0.4")
        .body(metrics::metrics_output())
}

// ── Webhook front controller ────────────────────────────────────────

/// Permalink form: `/bridge-webhook/{status}[?sandbox]`.
#[route("/bridge-webhook/{status}", method = "GET", method = "POST")]
pub async fn webhook_rewrite(
    req: HttpRequest,
    path: web::Path<String>,
    body: web::Bytes,
    state: web::Data<AppState>,
) -> HttpResponse {
    front_controller(&req, Some(path.into_inner()), body, &state).await
}

/// Query form: `/?bridge-status={status}[&sandbox]`.
#[route("/", method = "GET", method = "POST")]
pub async fn webhook_query(
    req: HttpRequest,
    body: web::Bytes,
    state: web::Data<AppState>,
) -> HttpResponse {
    let route = query_map(&req).remove("bridge-status");
    front_controller(&req, route, body, &state).await
}

/// Answer `OK`/`TESTOK` for a handled notification. Anything else gets the
/// same reply whatever the reason: 404 with permalinks, an empty 200
/// otherwise.
async fn front_controller(
    req: &HttpRequest,
    route: Option<String>,
    body: web::Bytes,
    state: &AppState,
) -> HttpResponse {
    let env = Environment::from_sandbox_flag(query_map(req).contains_key("sandbox"));
    let env_label = if env.is_sandbox() { "sandbox" } else { "production" };

    match handle_webhook(req, route, &body, env, state).await {
        NotificationOutcome::Processed(text) => {
            metrics::WEBHOOK_REQUESTS
                .with_label_values(&[env_label, "processed"])
                .inc();
            HttpResponse::Ok().content_type("text/plain").body(text)
        }
        NotificationOutcome::Rejected => {
            metrics::WEBHOOK_REQUESTS
                .with_label_values(&[env_label, "rejected"])
                .inc();
            if state.config.site.permalinks {
                HttpResponse::NotFound().finish()
            } else {
                HttpResponse::Ok().finish()
            }
        }
    }
}

async fn handle_webhook(
    req: &HttpRequest,
    route: Option<String>,
    body: &[u8],
    env: Environment,
    state: &AppState,
) -> NotificationOutcome {
    let settings = match state.settings() {
        Ok(s) => s,
        Err(e) => {
            tracing::error!(error = %e, "failed to load gateway settings for webhook");
            return NotificationOutcome::Rejected;
        }
    };

    let inbound = InboundRequest {
        method: req.method().as_str().to_string(),
        route,
        headers: req
            .headers()
            .iter()
            .filter_map(|(k, v)| v.to_str().ok().map(|v| (k.as_str().to_string(), v.to_string())))
            .collect(),
        body: body.to_vec(),
    };

    let authenticator = WebhookAuthenticator::new(settings.webhook_secrets());
    if body.is_empty() || !authenticator.is_authentic(&inbound, env) {
        tracing::debug!(%env, "webhook request not authenticated");
        return NotificationOutcome::Rejected;
    }

    let payload: Value = match serde_json::from_slice(body) {
        Ok(v) => v,
        Err(_) => return NotificationOutcome::Rejected,
    };
    if payload.get("type").is_none() {
        return NotificationOutcome::Rejected;
    }

    let mut client = state.client(settings.active_credentials());
    state
        .gateway
        .handle_notification(&mut client, &payload, env)
        .await
}

// ── Checkout ────────────────────────────────────────────────────────

#[derive(Deserialize)]
pub struct BanksQuery {
    pub locale: Option<String>,
}

fn api_error_text(e: &BridgeError) -> String {
    match e {
        BridgeError::Connection(_) => {
            format!("Error connecting to API server: {}", error_text(e))
        }
        other => format!("API Error: {}", error_text(other)),
    }
}

#[get("/banks")]
pub async fn banks(query: web::Query<BanksQuery>, state: web::Data<AppState>) -> HttpResponse {
    let settings = match state.settings() {
        Ok(s) => s,
        Err(e) => {
            tracing::error!(error = %e, "failed to load gateway settings");
            return HttpResponse::InternalServerError().json(json!({
                "success": false,
                "data": "API Error: gateway settings unavailable",
            }));
        }
    };

    let mut client = state.client(settings.active_credentials());
    let result = fetch_banks(&mut client, query.locale.as_deref()).await;
    metrics::BANK_LIST_REQUESTS
        .with_label_values(&[metrics::result_label(&result)])
        .inc();

    match result {
        Ok(banks) => HttpResponse::Ok().json(json!({
            "success": true,
            "data": banks,
        })),
        Err(e) => {
            tracing::warn!(error = %e, "bank list failed");
            HttpResponse::InternalServerError().json(json!({
                "success": false,
                "data": api_error_text(&e),
            }))
        }
    }
}

fn order_not_found() -> HttpResponse {
    HttpResponse::NotFound().json(json!({
        "error": "order not found",
    }))
}

/// Load the order named in the path when the caller holds its `?key=`.
/// Unknown orders and missing or wrong keys get the same 404.
fn owned_order(req: &HttpRequest, state: &AppState, order_id: u64) -> Result<Order, HttpResponse> {
    let key = query_map(req).remove("key").unwrap_or_default();
    match state.orders.order(order_id) {
        Ok(Some(order)) if order.key_matches(&key) => Ok(order),
        Ok(_) => {
            tracing::debug!(order_id, "checkout request without a valid order key");
            Err(order_not_found())
        }
        Err(e) => {
            tracing::error!(order_id, error = %e, "order lookup failed");
            Err(HttpResponse::InternalServerError().json(json!({
                "error": "order lookup failed",
            })))
        }
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentForm {
    pub bank_id: Option<u64>,
}

#[post("/checkout/{order_id}/payment")]
pub async fn checkout_payment(
    req: HttpRequest,
    path: web::Path<u64>,
    form: web::Json<PaymentForm>,
    state: web::Data<AppState>,
) -> HttpResponse {
    let order_id = path.into_inner();
    let order = match owned_order(&req, &state, order_id) {
        Ok(order) => order,
        Err(response) => return response,
    };
    let settings = match state.settings() {
        Ok(s) => s,
        Err(e) => {
            tracing::error!(order_id, error = %e, "failed to load gateway settings");
            return HttpResponse::InternalServerError().json(json!({
                "result": "failure",
                "messages": "gateway settings unavailable",
            }));
        }
    };
    let mut client = state.client(settings.active_credentials());

    let bank_id = match state.gateway.validate_bank(&mut client, form.bank_id).await {
        Ok(id) => id,
        Err(message) => {
            return HttpResponse::BadRequest().json(json!({
                "result": "failure",
                "messages": message,
            }));
        }
    };

    let info = req.connection_info().clone();
    let return_url = format!(
        "{}/checkout/return/{order_id}?key={}",
        state.config.site.site_url, order.order_key
    );
    let ctx = PaymentContext {
        return_url: &return_url,
        customer_ip: info.realip_remote_addr().unwrap_or_default(),
        site: &state.config.site,
    };

    let result = state
        .gateway
        .process_payment(&mut client, order_id, bank_id, &ctx)
        .await;
    metrics::PROVIDER_CALLS
        .with_label_values(&["create_payment", metrics::result_label(&result)])
        .inc();

    match result {
        Ok(redirect) => HttpResponse::Ok().json(json!({
            "result": "success",
            "redirect": redirect.consent_url,
        })),
        Err(BridgeError::NotFound(_)) => order_not_found(),
        Err(BridgeError::NotPayable(message)) => HttpResponse::Conflict().json(json!({
            "result": "failure",
            "messages": message,
        })),
        Err(e) => {
            tracing::warn!(order_id, error = %e, "payment request failed");
            HttpResponse::BadGateway().json(json!({
                "result": "failure",
                "messages": api_error_text(&e),
            }))
        }
    }
}

/// The buyer's landing page after the provider redirect.
#[get("/checkout/return/{order_id}")]
pub async fn checkout_return(
    req: HttpRequest,
    path: web::Path<u64>,
    state: web::Data<AppState>,
) -> HttpResponse {
    let order_id = path.into_inner();
    if let Err(response) = owned_order(&req, &state, order_id) {
        return response;
    }
    let settings = match state.settings() {
        Ok(s) => s,
        Err(e) => {
            tracing::error!(order_id, error = %e, "failed to load gateway settings");
            return HttpResponse::InternalServerError().json(json!({
                "error": "gateway settings unavailable",
            }));
        }
    };
    let mut client = state.client(settings.active_credentials());

    let result = state.gateway.process_return(&mut client, order_id).await;
    metrics::PROVIDER_CALLS
        .with_label_values(&["refresh_payment", metrics::result_label(&result)])
        .inc();
    if let Err(e) = &result {
        tracing::error!(order_id, error = %e, "failed to record payment outcome");
    }

    match state.orders.order(order_id) {
        Ok(Some(order)) => HttpResponse::Ok().json(json!({
            "orderId": order.id,
            "status": order.status.as_str(),
            "notes": order
                .notes
                .iter()
                .map(|n| state.gateway.render_note(order_id, n))
                .collect::<Vec<_>>(),
        })),
        Ok(None) => order_not_found(),
        Err(e) => {
            tracing::error!(order_id, error = %e, "order lookup failed");
            HttpResponse::InternalServerError().json(json!({
                "error": "order lookup failed",
            }))
        }
    }
}

// ── Admin ───────────────────────────────────────────────────────────

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CredentialsForm {
    #[serde(default)]
    pub app_id: String,
    #[serde(default)]
    pub app_secret: String,
}

/// Try a credential pair before the merchant saves it.
#[post("/admin/credentials/test")]
pub async fn test_credentials(
    req: HttpRequest,
    form: web::Json<CredentialsForm>,
    state: web::Data<AppState>,
) -> HttpResponse {
    if let Err(resp) = require_admin(&req, &state) {
        return resp;
    }
    let creds = Credentials::new(form.app_id.trim(), form.app_secret.trim());
    if !creds.is_complete() {
        return HttpResponse::BadRequest().json(json!({
            "success": false,
            "data": "app_id and app_secret are required",
        }));
    }

    let mut client = state.client(creds);
    let result = client.resource("banks").list(query([("limit", "1")])).await;
    metrics::PROVIDER_CALLS
        .with_label_values(&["test_credentials", metrics::result_label(&result)])
        .inc();

    match result {
        Ok(_) => HttpResponse::Ok().json(json!({ "success": true })),
        Err(e) => HttpResponse::InternalServerError().json(json!({
            "success": false,
            "data": e.to_string(),
        })),
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WebhookTestForm {
    pub is_sandbox: bool,
}

/// When the environment's webhook was last seen working.
#[post("/admin/webhook/test")]
pub async fn test_webhook(
    req: HttpRequest,
    form: web::Json<WebhookTestForm>,
    state: web::Data<AppState>,
) -> HttpResponse {
    if let Err(resp) = require_admin(&req, &state) {
        return resp;
    }
    let env = Environment::from_sandbox_flag(form.is_sandbox);
    match webhook::webhook_configured(state.options.as_ref(), env) {
        Ok(Some(ts)) => HttpResponse::Ok().json(json!({ "success": true, "data": ts })),
        Ok(None) => HttpResponse::Ok().json(json!({ "success": false })),
        Err(e) => {
            tracing::error!(%env, error = %e, "webhook status lookup failed");
            HttpResponse::Ok().json(json!({ "success": false }))
        }
    }
}

fn settings_view(state: &AppState) -> Result<Value, BridgeError> {
    let mut settings = state.settings()?;
    let notices = settings.site_notices(&state.config.site);
    let site = &state.config.site;
    let status = |env| webhook::webhook_configured(state.options.as_ref(), env);

    Ok(json!({
        "enabled": settings.enabled,
        "enableLogo": settings.enable_logo,
        "isTest": settings.is_test,
        "appId": settings.app_id,
        "testAppId": settings.test_app_id,
        "appSecretSet": !settings.app_secret.is_empty(),
        "testAppSecretSet": !settings.test_app_secret.is_empty(),
        "webhookSecretSet": !settings.webhook_secret.is_empty(),
        "testWebhookSecretSet": !settings.test_webhook_secret.is_empty(),
        "webhooks": {
            "production": {
                "url": webhook::webhook_url(
                    &site.site_url,
                    site.permalinks,
                    Environment::Production,
                ),
                "lastReceived": status(Environment::Production)?,
            },
            "sandbox": {
                "url": webhook::webhook_url(&site.site_url, site.permalinks, Environment::Sandbox),
                "lastReceived": status(Environment::Sandbox)?,
            },
        },
        "notices": notices,
    }))
}

#[get("/admin/settings")]
pub async fn get_settings(req: HttpRequest, state: web::Data<AppState>) -> HttpResponse {
    if let Err(resp) = require_admin(&req, &state) {
        return resp;
    }
    match settings_view(&state) {
        Ok(view) => HttpResponse::Ok().json(view),
        Err(e) => {
            tracing::error!(error = %e, "failed to render settings");
            HttpResponse::InternalServerError().json(json!({ "error": "settings unavailable" }))
        }
    }
}

/// Partial update: absent fields keep their stored value, an empty string
/// clears a secret.
#[derive(Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct SettingsForm {
    pub enabled: Option<bool>,
    pub enable_logo: Option<bool>,
    pub is_test: Option<bool>,
    pub app_id: Option<String>,
    pub app_secret: Option<String>,
    pub webhook_secret: Option<String>,
    pub test_app_id: Option<String>,
    pub test_app_secret: Option<String>,
    pub test_webhook_secret: Option<String>,
}

#[put("/admin/settings")]
pub async fn put_settings(
    req: HttpRequest,
    form: web::Json<SettingsForm>,
    state: web::Data<AppState>,
) -> HttpResponse {
    if let Err(resp) = require_admin(&req, &state) {
        return resp;
    }
    let form = form.into_inner();

    let mut settings = match state.settings() {
        Ok(s) => s,
        Err(e) => {
            tracing::error!(error = %e, "failed to load gateway settings");
            return HttpResponse::InternalServerError().json(json!({
                "error": "settings unavailable",
            }));
        }
    };

    if let Some(v) = form.enabled {
        settings.enabled = v;
    }
    if let Some(v) = form.enable_logo {
        settings.enable_logo = v;
    }
    if let Some(v) = form.is_test {
        settings.is_test = v;
    }
    for (slot, value) in [
        (&mut settings.app_id, form.app_id),
        (&mut settings.app_secret, form.app_secret),
        (&mut settings.webhook_secret, form.webhook_secret),
        (&mut settings.test_app_id, form.test_app_id),
        (&mut settings.test_app_secret, form.test_app_secret),
        (&mut settings.test_webhook_secret, form.test_webhook_secret),
    ] {
        if let Some(value) = value {
            *slot = value.trim().to_string();
        }
    }

    let site = &state.config.site;
    let production_allowed = match settings
        .can_enable_production(site, state.options.as_ref(), |c| state.client(c))
        .await
    {
        Ok(allowed) => allowed,
        Err(e) => {
            tracing::warn!(error = %e, "production check failed");
            false
        }
    };
    settings.enforce_mode(production_allowed);

    if let Err(e) = settings.save(state.options.as_ref(), &state.vault) {
        tracing::error!(error = %e, "failed to save gateway settings");
        return HttpResponse::InternalServerError().json(json!({ "error": "settings not saved" }));
    }

    let mut messages = settings.site_notices(site);
    match settings
        .validate(state.options.as_ref(), |c| state.client(c))
        .await
    {
        Ok(found) => messages.extend(found),
        Err(e) => {
            tracing::error!(error = %e, "settings validation failed");
            messages.push(e.to_string());
        }
    }

    HttpResponse::Ok().json(json!({
        "saved": true,
        "isTest": settings.is_test,
        "productionAllowed": production_allowed,
        "messages": messages,
    }))
}
