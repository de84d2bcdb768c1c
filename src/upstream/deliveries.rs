use reqwest::Method;

use crate::error::AppError;
use crate::models::delivery::{
    AssignDelivery, Delivery, DeliveryTracking, NewDelivery, RejectDelivery, StatusChange,
};
use crate::upstream::ApiClient;

const RESOURCE: &str = "deliveries";

impl ApiClient {
    pub async fn list_deliveries(&self) -> Result<Vec<Delivery>, AppError> {
        self.get(RESOURCE, &["deliveries"], Some("deliveries")).await
    }

    pub async fn get_delivery(&self, id: &str) -> Result<Delivery, AppError> {
        self.get(RESOURCE, &["deliveries", id], Some("delivery")).await
    }

    pub async fn create_delivery(&self, delivery: &NewDelivery) -> Result<Delivery, AppError> {
        self.send(RESOURCE, Method::POST, &["deliveries"], delivery, Some("delivery"))
            .await
    }

    pub async fn update_delivery(
        &self,
        id: &str,
        changes: &NewDelivery,
    ) -> Result<Delivery, AppError> {
        self.send(RESOURCE, Method::PUT, &["deliveries", id], changes, Some("delivery"))
            .await
    }

    pub async fn delete_delivery(&self, id: &str) -> Result<(), AppError> {
        self.send_empty::<()>(RESOURCE, Method::DELETE, &["deliveries", id], None)
            .await
    }

    pub async fn update_delivery_status(
        &self,
        id: &str,
        change: &StatusChange,
    ) -> Result<Delivery, AppError> {
        self.send(
            RESOURCE,
            Method::PATCH,
            &["deliveries", id, "status"],
            change,
            Some("delivery"),
        )
        .await
    }

    pub async fn approve_delivery(&self, id: &str) -> Result<Delivery, AppError> {
        self.delivery_command(id, "approve", &serde_json::json!({})).await
    }

    pub async fn assign_delivery(
        &self,
        id: &str,
        assignment: &AssignDelivery,
    ) -> Result<Delivery, AppError> {
        self.delivery_command(id, "assign", assignment).await
    }

    pub async fn accept_delivery(&self, id: &str) -> Result<Delivery, AppError> {
        self.delivery_command(id, "accept", &serde_json::json!({})).await
    }

    pub async fn reject_delivery(
        &self,
        id: &str,
        rejection: &RejectDelivery,
    ) -> Result<Delivery, AppError> {
        self.delivery_command(id, "reject", rejection).await
    }

    pub async fn cancel_delivery(&self, id: &str) -> Result<Delivery, AppError> {
        self.delivery_command(id, "cancel", &serde_json::json!({})).await
    }

    pub async fn delivery_tracking(&self, id: &str) -> Result<DeliveryTracking, AppError> {
        self.get(RESOURCE, &["deliveries", id, "tracking"], Some("tracking"))
            .await
    }

    async fn delivery_command<B>(
        &self,
        id: &str,
        command: &str,
        payload: &B,
    ) -> Result<Delivery, AppError>
    where
        B: serde::Serialize + ?Sized,
    {
        self.send(
            RESOURCE,
            Method::PATCH,
            &["deliveries", id, command],
            payload,
            Some("delivery"),
        )
        .await
    }
}
