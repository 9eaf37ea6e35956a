//! Checkout payments and order reconciliation.
//!
//! The provider is the source of truth for a payment's state. Both the
//! buyer's return redirect and an authenticated webhook only tell us *that*
//! something changed; the order status is always set from a fresh
//! `payment-requests/<id>` fetch.

use std::sync::Arc;

use serde_json::{json, Value};

use crate::client::{Client, Resource};
use crate::constants::{
    EVENT_TEST, EVENT_TRANSACTION_UPDATED, PAYMENT_LINK_META, PAYMENT_REQUEST_ID_KEY,
};
use crate::error::{BridgeError, Result};
use crate::settings::{error_text, SiteContext};
use crate::store::{ConfigStore, OrderStatus, OrderStore};
use crate::transport::Transport;
use crate::vault::{CredentialVault, SecretScope};
use crate::webhook::{self, Environment};

/// Placeholder expanded by [`Gateway::render_note`].
pub const PAYMENT_ID_PLACEHOLDER: &str = "{payment_id}";

/// Provider payment status codes, grouped by what they mean for the order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PaymentStatus {
    /// `CREA`, `ACTC`, `ACCP`
    Initiated,
    /// `PDNG`, `ACSP`
    Pending,
    /// `ACSC`
    Succeeded,
    /// `CANC`
    Canceled,
    /// `RJCT`
    Rejected,
    Unknown(String),
}

impl PaymentStatus {
    pub fn from_code(code: &str) -> Self {
        match code {
            "CREA" | "ACTC" | "ACCP" => PaymentStatus::Initiated,
            "PDNG" | "ACSP" => PaymentStatus::Pending,
            "ACSC" => PaymentStatus::Succeeded,
            "CANC" => PaymentStatus::Canceled,
            "RJCT" => PaymentStatus::Rejected,
            other => PaymentStatus::Unknown(other.to_string()),
        }
    }

    pub fn order_status(&self) -> OrderStatus {
        match self {
            PaymentStatus::Initiated | PaymentStatus::Pending => OrderStatus::OnHold,
            PaymentStatus::Succeeded => OrderStatus::Processing,
            PaymentStatus::Canceled | PaymentStatus::Rejected | PaymentStatus::Unknown(_) => {
                OrderStatus::Failed
            }
        }
    }

    pub fn note(&self) -> String {
        let verb = match self {
            PaymentStatus::Initiated => "initiated",
            PaymentStatus::Pending => "pending",
            PaymentStatus::Succeeded => "succeeded",
            PaymentStatus::Canceled => "canceled",
            PaymentStatus::Rejected => "rejected",
            PaymentStatus::Unknown(code) => return format!("Unknown payment status: {code}"),
        };
        format!("Bridge payment {verb} (Payment ID : {PAYMENT_ID_PLACEHOLDER})")
    }
}

/// Outcome of a webhook notification, as told to the front controller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NotificationOutcome {
    /// Handled; answer 200 with this body.
    Processed(&'static str),
    Rejected,
}

/// Checkout inputs not stored on the order.
#[derive(Debug, Clone)]
pub struct PaymentContext<'a> {
    pub return_url: &'a str,
    pub customer_ip: &'a str,
    pub site: &'a SiteContext,
}

/// Where to send the buyer after a payment request is created.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaymentRedirect {
    pub payment_request_id: String,
    pub consent_url: String,
}

/// Strip characters the provider rejects in transaction labels and
/// collapse whitespace runs.
pub fn remove_forbidden_chars(label: &str) -> String {
    let decoded = label
        .replace("&quot;", "\"")
        .replace("&#039;", "'")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&amp;", "&");
    let kept: String = decoded
        .chars()
        .filter(|c| !matches!(c, '#' | '@' | '[' | ']' | '|' | '\u{2013}'))
        .collect();
    kept.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Payment flows over the order store, the config store and the vault.
#[derive(Clone)]
pub struct Gateway {
    orders: Arc<dyn OrderStore>,
    config: Arc<dyn ConfigStore>,
    vault: CredentialVault,
}

impl Gateway {
    pub fn new(
        orders: Arc<dyn OrderStore>,
        config: Arc<dyn ConfigStore>,
        vault: CredentialVault,
    ) -> Self {
        Self {
            orders,
            config,
            vault,
        }
    }

    /// Decrypted payment request id linked to the order, empty when none.
    pub fn order_payment_request_id(&self, order_id: u64) -> Result<String> {
        let Some(ciphertext) = self
            .orders
            .get_meta(order_id, PAYMENT_LINK_META)?
            .filter(|v| !v.is_empty())
        else {
            return Ok(String::new());
        };
        self.vault
            .decrypt(&ciphertext, PAYMENT_REQUEST_ID_KEY, SecretScope::Transaction(order_id))
    }

    /// Encrypt `payment_request_id` under the order's scope and keep the
    /// ciphertext in the order metadata.
    pub fn link_payment_request_id(&self, payment_request_id: &str, order_id: u64) -> Result<()> {
        let ciphertext = self.vault.encrypt(
            payment_request_id,
            PAYMENT_REQUEST_ID_KEY,
            true,
            SecretScope::Transaction(order_id),
        )?;
        self.orders.set_meta(order_id, PAYMENT_LINK_META, &ciphertext)
    }

    /// Expand the payment id placeholder of an order note.
    pub fn render_note(&self, order_id: u64, note: &str) -> String {
        if !note.contains(PAYMENT_ID_PLACEHOLDER) {
            return note.to_string();
        }
        let replacement = match self.order_payment_request_id(order_id) {
            Ok(id) => id,
            Err(e) => e.to_string(),
        };
        note.replace(PAYMENT_ID_PLACEHOLDER, &replacement)
    }

    /// Check the buyer's bank choice. `Err` carries the checkout notice.
    pub async fn validate_bank<T: Transport>(
        &self,
        client: &mut Client<T>,
        bank_id: Option<u64>,
    ) -> std::result::Result<u64, String> {
        let Some(bank_id) = bank_id.filter(|id| *id > 0) else {
            return Err("Payment error: Please select a bank to proceed".to_string());
        };
        if !crate::banks::bank_is_valid(bank_id) {
            return Err("Invalid bank selected: ".to_string());
        }
        match client.select(Resource::Banks).get(&bank_id.to_string()).await {
            Ok(_) => Ok(bank_id),
            Err(e @ BridgeError::Connection(_)) => {
                Err(format!("Connection error: {}", error_text(&e)))
            }
            Err(e) => Err(format!("Invalid bank selected: {}", error_text(&e))),
        }
    }

    /// Create a payment request for the order and link it.
    pub async fn process_payment<T: Transport>(
        &self,
        client: &mut Client<T>,
        order_id: u64,
        bank_id: u64,
        ctx: &PaymentContext<'_>,
    ) -> Result<PaymentRedirect> {
        if bank_id == 0 {
            return Err(BridgeError::Config("no bank selected".to_string()));
        }
        let order = self
            .orders
            .order(order_id)?
            .ok_or_else(|| BridgeError::NotFound("WC Order not found".to_string()))?;
        if !order.status.needs_payment() {
            return Err(BridgeError::NotPayable(format!(
                "order {order_id} is {}",
                order.status.as_str()
            )));
        }

        let body = json!({
            "successful_callback_url": ctx.return_url,
            "unsuccessful_callback_url": ctx.return_url,
            "transactions": [{
                "currency": ctx.site.currency,
                "label": remove_forbidden_chars(&ctx.site.store_name),
                "amount": order.total,
                "end_to_end_id": order_id.to_string(),
                "client_reference": order_id.to_string(),
            }],
            "user": {
                "name": format!("{} {}", order.billing_first_name, order.billing_last_name),
                "ip_address": ctx.customer_ip,
            },
            "bank_id": bank_id,
        });

        let note = if self.order_payment_request_id(order_id)?.is_empty() {
            format!("Bridge payment initiated (Payment ID: {PAYMENT_ID_PLACEHOLDER})\n")
        } else {
            format!(
                "Last payment has not been finished, customer initiate a new one. \
                 Bridge payment initiated (Payment ID: {PAYMENT_ID_PLACEHOLDER})\n"
            )
        };

        let response = client.select(Resource::PaymentRequests).create(body).await?;
        let field = |name: &str| {
            response
                .body
                .get(name)
                .and_then(Value::as_str)
                .map(str::to_string)
                .ok_or_else(|| BridgeError::Provider("Unknown Bridge API response".to_string()))
        };
        let payment_request_id = field("id")?;
        let consent_url = field("consent_url")?;

        self.link_payment_request_id(&payment_request_id, order_id)?;

        if order.status != OrderStatus::Pending {
            self.orders.update_status(order_id, OrderStatus::Pending, &note)?;
        } else {
            self.orders.add_note(order_id, &note)?;
        }

        tracing::info!(order_id, bank_id, "payment request created");
        Ok(PaymentRedirect {
            payment_request_id,
            consent_url,
        })
    }

    /// Fetch the linked payment request and move the order accordingly.
    async fn refresh_status<T: Transport>(
        &self,
        client: &mut Client<T>,
        order_id: u64,
        payment_request_id: &str,
    ) -> Result<PaymentStatus> {
        let response = client
            .select(Resource::PaymentRequests)
            .get(payment_request_id)
            .await?;
        let code = response
            .body
            .get("status")
            .and_then(Value::as_str)
            .unwrap_or_default();
        let status = PaymentStatus::from_code(code);
        self.orders
            .update_status(order_id, status.order_status(), &status.note())?;
        tracing::info!(
            order_id,
            code,
            order_status = status.order_status().as_str(),
            "order status refreshed"
        );
        Ok(status)
    }

    /// Buyer came back from the provider. Provider or decryption failures
    /// mark the order failed with the reason instead of propagating.
    pub async fn process_return<T: Transport>(
        &self,
        client: &mut Client<T>,
        order_id: u64,
    ) -> Result<Option<PaymentStatus>> {
        if !self.orders.exists(order_id)? {
            return Ok(None);
        }

        let outcome = match self.order_payment_request_id(order_id) {
            Ok(id) if id.is_empty() => return Ok(None),
            Ok(id) => self.refresh_status(client, order_id, &id).await,
            Err(e) => Err(BridgeError::Store(format!(
                "Error while fetching payment request ID:{e}"
            ))),
        };

        match outcome {
            Ok(status) => Ok(Some(status)),
            Err(e) => {
                tracing::warn!(order_id, error = %e, "payment return could not be reconciled");
                let reason = match &e {
                    BridgeError::Store(msg) => msg.clone(),
                    other => other.to_string(),
                };
                self.orders
                    .update_status(order_id, OrderStatus::Failed, &format!("{reason}\n"))?;
                Ok(None)
            }
        }
    }

    /// Handle an already-authenticated notification payload.
    pub async fn handle_notification<T: Transport>(
        &self,
        client: &mut Client<T>,
        payload: &Value,
        env: Environment,
    ) -> NotificationOutcome {
        let kind = payload.get("type").and_then(Value::as_str).unwrap_or_default();

        let outcome = match kind {
            EVENT_TRANSACTION_UPDATED => self.handle_transaction_updated(client, payload).await,
            EVENT_TEST => NotificationOutcome::Processed("TESTOK"),
            _ => NotificationOutcome::Rejected,
        };

        if outcome != NotificationOutcome::Rejected {
            if let Err(e) = webhook::configure_webhook(self.config.as_ref(), env) {
                tracing::error!(%env, error = %e, "failed to record webhook status");
            }
        }
        tracing::info!(kind, %env, ?outcome, "webhook notification handled");
        outcome
    }

    async fn handle_transaction_updated<T: Transport>(
        &self,
        client: &mut Client<T>,
        payload: &Value,
    ) -> NotificationOutcome {
        let content = payload.get("content");
        let field = |name: &str| content.and_then(|c| c.get(name));

        let order_id = match field("end_to_end_id") {
            Some(Value::String(s)) => s.trim().parse::<u64>().ok(),
            Some(Value::Number(n)) => n.as_u64(),
            _ => None,
        };
        let Some(payment_request_id) = field("payment_request_id").and_then(Value::as_str) else {
            return NotificationOutcome::Rejected;
        };
        let Some(order_id) = order_id else {
            return NotificationOutcome::Rejected;
        };
        match self.orders.exists(order_id) {
            Ok(true) => {}
            Ok(false) => return NotificationOutcome::Rejected,
            Err(e) => {
                tracing::error!(order_id, error = %e, "order lookup failed");
                return NotificationOutcome::Rejected;
            }
        }

        let result = self
            .reconcile(client, order_id, payment_request_id)
            .await;

        match result {
            Ok(true) => NotificationOutcome::Processed("OK"),
            Ok(false) => NotificationOutcome::Rejected,
            Err(e) => {
                let note = match &e {
                    BridgeError::Provider(_) => {
                        format!("Webhook verification failed: {}", error_text(&e))
                    }
                    BridgeError::Connection(_) => {
                        format!("Webhook verification connection error: {}", error_text(&e))
                    }
                    other => format!("Webhook failed: {other}"),
                };
                tracing::warn!(order_id, error = %e, "webhook reconciliation failed");
                if let Err(e) = self.orders.add_note(order_id, &note) {
                    tracing::error!(order_id, error = %e, "failed to annotate order");
                }
                NotificationOutcome::Rejected
            }
        }
    }

    /// `Ok(false)` when the payload's payment id is not the one linked to
    /// the order.
    async fn reconcile<T: Transport>(
        &self,
        client: &mut Client<T>,
        order_id: u64,
        payment_request_id: &str,
    ) -> Result<bool> {
        self.orders.add_note(order_id, "Webhook received")?;
        let linked = self.order_payment_request_id(order_id)?;
        if linked != payment_request_id {
            tracing::warn!(order_id, "webhook payment id does not match linked payment");
            return Ok(false);
        }
        self.refresh_status(client, order_id, payment_request_id).await?;
        self.orders.add_note(order_id, "Order updated through webhook")?;
        Ok(true)
    }
}
