use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::AppError;
use crate::models::optional_id_string;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum TransactionKind {
    #[serde(alias = "Credit", alias = "deposit")]
    Credit,
    #[serde(alias = "Debit", alias = "payment", alias = "withdrawal")]
    Debit,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Transaction {
    #[serde(default, alias = "_id", deserialize_with = "optional_id_string")]
    pub id: Option<String>,
    #[serde(rename = "type")]
    pub kind: TransactionKind,
    pub amount: f64,
    #[serde(default)]
    pub description: String,
    #[serde(default, alias = "date", alias = "timestamp")]
    pub created_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct Wallet {
    #[serde(default)]
    pub balance: f64,
    #[serde(default)]
    pub total_earnings: f64,
    #[serde(default)]
    pub transactions: Vec<Transaction>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AmountRequest {
    pub amount: f64,
}

impl AmountRequest {
    pub fn validate(&self) -> Result<(), AppError> {
        validate_amount(self.amount)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PayDeliveryRequest {
    pub delivery_id: String,
    pub amount: f64,
}

impl PayDeliveryRequest {
    pub fn validate(&self) -> Result<(), AppError> {
        if self.delivery_id.trim().is_empty() {
            return Err(AppError::validation("deliveryId", "delivery id cannot be empty"));
        }
        validate_amount(self.amount)
    }
}

fn validate_amount(amount: f64) -> Result<(), AppError> {
    if !amount.is_finite() || amount <= 0.0 {
        return Err(AppError::validation("amount", "amount must be > 0"));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::{AmountRequest, TransactionKind, Wallet};

    #[test]
    fn wallet_tolerates_missing_history() {
        let wallet: Wallet = serde_json::from_value(json!({ "balance": 120.5 })).unwrap();
        assert_eq!(wallet.balance, 120.5);
        assert!(wallet.transactions.is_empty());
    }

    #[test]
    fn transaction_kind_aliases() {
        let wallet: Wallet = serde_json::from_value(json!({
            "balance": 10,
            "transactions": [
                { "type": "deposit", "amount": 100 },
                { "type": "payment", "amount": 90, "description": "DLV-7" }
            ]
        }))
        .unwrap();

        assert_eq!(wallet.transactions[0].kind, TransactionKind::Credit);
        assert_eq!(wallet.transactions[1].kind, TransactionKind::Debit);
    }

    #[test]
    fn non_positive_amounts_are_rejected() {
        assert!(AmountRequest { amount: 0.0 }.validate().is_err());
        assert!(AmountRequest { amount: -5.0 }.validate().is_err());
        assert!(AmountRequest { amount: f64::NAN }.validate().is_err());
        assert!(AmountRequest { amount: 1.0 }.validate().is_ok());
    }
}
