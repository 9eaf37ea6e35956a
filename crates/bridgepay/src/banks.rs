//! Bank listing for the checkout bank picker.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::client::{query, Client};
use crate::constants::IGNORED_BANK_IDS;
use crate::error::Result;
use crate::transport::Transport;

/// The subset of a provider bank resource exposed to the checkout page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Bank {
    pub id: u64,
    pub name: String,
    pub logo_url: Option<String>,
    pub country_code: Option<String>,
}

impl Bank {
    /// Keep only the allowed fields of a provider resource. Resources
    /// without a numeric id are skipped.
    pub fn from_resource(resource: &Value) -> Option<Self> {
        let text = |field: &str| resource.get(field).and_then(Value::as_str).map(str::to_string);
        Some(Self {
            id: resource.get("id").and_then(Value::as_u64)?,
            name: text("name").unwrap_or_default(),
            logo_url: text("logo_url"),
            country_code: text("country_code"),
        })
    }
}

/// Banks the integration refuses to offer.
pub fn bank_is_valid(id: u64) -> bool {
    !IGNORED_BANK_IDS.contains(&id)
}

/// Order banks for display under `locale` (e.g. `fr_FR`).
///
/// Spanish and French locales put banks of the user's own country first;
/// any other locale puts French banks first. Ties sort by name. Without a
/// locale, banks sort by name only.
pub fn sort_banks(banks: &mut [Bank], locale: Option<&str>) {
    let preferred = locale.map(|l| match l.split_once('_').map(|(_, c)| c) {
        Some(country @ ("ES" | "FR")) => country.to_string(),
        _ => "FR".to_string(),
    });

    banks.sort_by(|a, b| {
        let rank = |bank: &Bank| match &preferred {
            Some(country) => bank.country_code.as_deref() != Some(country.as_str()),
            None => false,
        };
        rank(a).cmp(&rank(b)).then_with(|| a.name.cmp(&b.name))
    });
}

/// Every bank supporting single payments, drained across pages, filtered
/// and sorted.
pub async fn fetch_banks<T: Transport>(
    client: &mut Client<T>,
    locale: Option<&str>,
) -> Result<Vec<Bank>> {
    let first = client
        .resource("banks")
        .list(query([("limit", "250"), ("capabilities", "single_payment")]))
        .await?;

    let mut banks: Vec<Bank> = first.resources().iter().filter_map(Bank::from_resource).collect();
    let mut pages = 1;
    while let Some(page) = client.next_page().await? {
        pages += 1;
        banks.extend(page.resources().iter().filter_map(Bank::from_resource));
    }

    banks.retain(|bank| bank_is_valid(bank.id));
    sort_banks(&mut banks, locale);

    tracing::debug!(pages, count = banks.len(), "fetched bank list");
    Ok(banks)
}
