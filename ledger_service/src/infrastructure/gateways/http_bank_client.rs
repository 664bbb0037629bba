use std::time::Duration;

use async_trait::async_trait;
use serde_json::json;

use crate::domain::gateways::{BankClient, BankResult};
use crate::domain::types::WalletUuid;

/// Talks to the external bank over HTTP (spec §4.2). The original system
/// called this the same thing: a single POST that either debits the
/// account or doesn't, with no partial states.
pub struct HttpBankClient {
    client: reqwest::Client,
    base_url: String,
}

impl HttpBankClient {
    pub fn new(base_url: String, timeout: Duration) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self { client, base_url })
    }
}

#[async_trait]
impl BankClient for HttpBankClient {
    async fn request_deposit(&self, wallet_uuid: WalletUuid, amount: i64) -> BankResult {
        let url = format!("{}/", self.base_url.trim_end_matches('/'));
        let body = json!({ "wallet_uuid": wallet_uuid.to_string(), "amount": amount });

        match self.client.post(url).json(&body).send().await {
            Ok(resp) => {
                let payload = resp.json::<serde_json::Value>().await.unwrap_or(json!({}));
                classify_response(payload)
            }
            Err(err) => classify_transport_error(&err),
        }
    }
}

/// Pure so it can be exercised without a live HTTP round trip. The bank's
/// own contract puts success in the JSON body's `status` field, not the HTTP
/// transport status — the bank always answers 200 OK even when it declines.
fn classify_response(payload: serde_json::Value) -> BankResult {
    let ok = payload.get("status").and_then(|v| v.as_i64()) == Some(200);
    BankResult { ok, payload }
}

fn classify_transport_error(err: &reqwest::Error) -> BankResult {
    let kind = if err.is_timeout() {
        "timeout"
    } else if err.is_connect() {
        "connection_error"
    } else {
        "request_error"
    };
    BankResult {
        ok: false,
        payload: json!({ "error": kind, "detail": err.to_string() }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn body_status_200_is_ok() {
        let result = classify_response(json!({"status": 200, "id": "abc"}));
        assert!(result.ok);
    }

    #[test]
    fn body_status_500_is_not_ok() {
        let result = classify_response(json!({"status": 500, "error": "boom"}));
        assert!(!result.ok);
    }

    #[test]
    fn missing_status_field_is_not_ok() {
        let result = classify_response(json!({"error": "invalid"}));
        assert!(!result.ok);
    }
}
