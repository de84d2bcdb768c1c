use reqwest::Method;

use crate::error::AppError;
use crate::models::wallet::{AmountRequest, PayDeliveryRequest, Wallet};
use crate::upstream::ApiClient;

const RESOURCE: &str = "wallet";

impl ApiClient {
    pub async fn wallet_balance(&self) -> Result<Wallet, AppError> {
        self.get(RESOURCE, &["wallet", "balance"], Some("wallet")).await
    }

    pub async fn add_money(&self, request: &AmountRequest) -> Result<Wallet, AppError> {
        request.validate()?;
        self.send(
            RESOURCE,
            Method::POST,
            &["wallet", "add-money"],
            request,
            Some("wallet"),
        )
        .await
    }

    pub async fn pay_delivery(&self, request: &PayDeliveryRequest) -> Result<Wallet, AppError> {
        request.validate()?;
        self.send(
            RESOURCE,
            Method::POST,
            &["wallet", "pay-delivery"],
            request,
            Some("wallet"),
        )
        .await
    }

    pub async fn withdraw(&self, request: &AmountRequest) -> Result<Wallet, AppError> {
        request.validate()?;
        self.send(
            RESOURCE,
            Method::POST,
            &["wallet", "withdraw"],
            request,
            Some("wallet"),
        )
        .await
    }
}
