//! Sandbox payment processor.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};

use secrecy::{ExposeSecret, SecretString};
use uuid::Uuid;
use veloura_core::{PaymentIntentId, PaymentStatus, Price};

use super::lock;
use crate::services::{
    IntentMetadata, PAYMENT_METHOD_KEY, PaymentConfirmation, PaymentGateway, PaymentIntent, ServiceError,
};

/// Test payment methods the sandbox always declines.
pub const DECLINED_TEST_METHODS: [&str; 2] = ["pm_card_chargeDeclined", "pm_card_visa_chargeDeclined"];

#[derive(Debug)]
struct IntentRecord {
    id: PaymentIntentId,
    amount: Price,
    method: Option<String>,
    charge: Option<String>,
}

#[derive(Debug, Default)]
struct Processor {
    intents: HashMap<String, IntentRecord>,
    charges: HashMap<String, Price>,
    refunds: Vec<(String, Price)>,
    next_id: u64,
}

/// In-memory payment processor.
///
/// Confirming an intent whose payment method is in the declined list reports
/// `declined`; every other method succeeds. Confirming twice returns the same
/// charge.
#[derive(Debug, Clone)]
pub struct SandboxPayments {
    processor: Arc<Mutex<Processor>>,
    declined: Arc<HashSet<String>>,
}

impl Default for SandboxPayments {
    fn default() -> Self {
        Self::new(DECLINED_TEST_METHODS.iter().map(ToString::to_string))
    }
}

impl SandboxPayments {
    #[must_use]
    pub fn new(declined_methods: impl IntoIterator<Item = String>) -> Self {
        Self {
            processor: Arc::new(Mutex::new(Processor::default())),
            declined: Arc::new(declined_methods.into_iter().collect()),
        }
    }

    /// Number of captured charges.
    #[must_use]
    pub fn charge_count(&self) -> usize {
        lock(&self.processor).charges.len()
    }

    /// Refunds issued so far, as `(charge, amount)`.
    #[must_use]
    pub fn refunds(&self) -> Vec<(String, Price)> {
        lock(&self.processor).refunds.clone()
    }
}

impl PaymentGateway for SandboxPayments {
    async fn create_intent(&self, amount: Price, metadata: &IntentMetadata) -> Result<PaymentIntent, ServiceError> {
        let mut processor = lock(&self.processor);
        processor.next_id += 1;
        let id = PaymentIntentId::new(format!("pi_sandbox_{}", processor.next_id));
        let secret = format!("{id}_secret_{}", Uuid::new_v4().simple());

        processor.intents.insert(
            secret.clone(),
            IntentRecord {
                id: id.clone(),
                amount,
                method: metadata.get(PAYMENT_METHOD_KEY).cloned(),
                charge: None,
            },
        );

        Ok(PaymentIntent {
            id,
            client_secret: SecretString::from(secret),
            amount,
        })
    }

    async fn confirm(&self, client_secret: &SecretString) -> Result<PaymentConfirmation, ServiceError> {
        let mut processor = lock(&self.processor);
        processor.next_id += 1;
        let next_id = processor.next_id;

        let record = processor
            .intents
            .get_mut(client_secret.expose_secret())
            .ok_or_else(|| ServiceError::Api {
                status: 404,
                message: "no such payment intent".into(),
            })?;

        if let Some(charge) = &record.charge {
            return Ok(PaymentConfirmation {
                status: PaymentStatus::Succeeded,
                payment_ref: Some(charge.clone()),
                failure_reason: None,
            });
        }

        if record.method.as_ref().is_some_and(|m| self.declined.contains(m)) {
            tracing::debug!(intent = %record.id, "sandbox decline");
            return Ok(PaymentConfirmation {
                status: PaymentStatus::Declined,
                payment_ref: None,
                failure_reason: Some("card_declined".into()),
            });
        }

        let charge = format!("ch_sandbox_{next_id}");
        record.charge = Some(charge.clone());
        let amount = record.amount;
        processor.charges.insert(charge.clone(), amount);

        Ok(PaymentConfirmation {
            status: PaymentStatus::Succeeded,
            payment_ref: Some(charge),
            failure_reason: None,
        })
    }

    async fn refund(&self, payment_ref: &str, amount: Price, reason: &str) -> Result<(), ServiceError> {
        let mut processor = lock(&self.processor);
        let captured = processor.charges.get(payment_ref).copied().ok_or_else(|| ServiceError::Api {
            status: 404,
            message: format!("no such charge {payment_ref}"),
        })?;
        if amount.currency_code != captured.currency_code || amount.amount > captured.amount {
            return Err(ServiceError::Api {
                status: 400,
                message: format!("refund {amount} exceeds charge {captured}"),
            });
        }
        processor.refunds.push((payment_ref.to_owned(), amount));
        tracing::info!(payment_ref, %amount, reason, "sandbox refund");
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use veloura_core::CurrencyCode;

    use super::*;

    fn usd(cents: i64) -> Price {
        Price::from_minor_units(cents, CurrencyCode::USD)
    }

    fn metadata(method: &str) -> IntentMetadata {
        IntentMetadata::from([(PAYMENT_METHOD_KEY.to_string(), method.to_string())])
    }

    #[tokio::test]
    async fn test_success_and_idempotent_confirm() {
        let payments = SandboxPayments::default();
        let intent = payments.create_intent(usd(8400), &metadata("pm_card_visa")).await.unwrap();
        assert_eq!(intent.amount, usd(8400));

        let first = payments.confirm(&intent.client_secret).await.unwrap();
        let second = payments.confirm(&intent.client_secret).await.unwrap();
        assert_eq!(first.status, PaymentStatus::Succeeded);
        assert_eq!(first.payment_ref, second.payment_ref);
        assert_eq!(payments.charge_count(), 1);
    }

    #[tokio::test]
    async fn test_declined_test_card() {
        let payments = SandboxPayments::default();
        let intent = payments
            .create_intent(usd(8400), &metadata("pm_card_chargeDeclined"))
            .await
            .unwrap();
        let confirmation = payments.confirm(&intent.client_secret).await.unwrap();
        assert_eq!(confirmation.status, PaymentStatus::Declined);
        assert_eq!(payments.charge_count(), 0);
    }

    #[tokio::test]
    async fn test_unknown_secret() {
        let payments = SandboxPayments::default();
        let result = payments.confirm(&SecretString::from("nope")).await;
        assert!(matches!(result, Err(ServiceError::Api { status: 404, .. })));
    }

    #[tokio::test]
    async fn test_refund_bounds() {
        let payments = SandboxPayments::default();
        let intent = payments.create_intent(usd(1000), &IntentMetadata::new()).await.unwrap();
        let charge = payments.confirm(&intent.client_secret).await.unwrap().payment_ref.unwrap();

        assert!(payments.refund(&charge, usd(1001), "too much").await.is_err());
        payments.refund(&charge, usd(1000), "commit_failed").await.unwrap();
        assert_eq!(payments.refunds(), vec![(charge, usd(1000))]);
    }
}
