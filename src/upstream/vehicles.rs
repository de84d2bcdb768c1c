use reqwest::Method;

use crate::error::AppError;
use crate::models::vehicle::{Vehicle, VehicleRequest, VehicleStatusChange};
use crate::upstream::ApiClient;

const RESOURCE: &str = "vehicles";

impl ApiClient {
    pub async fn list_vehicles(&self) -> Result<Vec<Vehicle>, AppError> {
        self.get(RESOURCE, &["vehicles"], Some("vehicles")).await
    }

    pub async fn create_vehicle(&self, request: &VehicleRequest) -> Result<Vehicle, AppError> {
        self.send(RESOURCE, Method::POST, &["vehicles"], request, Some("vehicle"))
            .await
    }

    pub async fn update_vehicle(
        &self,
        id: &str,
        request: &VehicleRequest,
    ) -> Result<Vehicle, AppError> {
        self.send(RESOURCE, Method::PUT, &["vehicles", id], request, Some("vehicle"))
            .await
    }

    pub async fn delete_vehicle(&self, id: &str) -> Result<(), AppError> {
        self.send_empty::<()>(RESOURCE, Method::DELETE, &["vehicles", id], None)
            .await
    }

    pub async fn update_vehicle_status(
        &self,
        id: &str,
        change: &VehicleStatusChange,
    ) -> Result<Vehicle, AppError> {
        self.send(
            RESOURCE,
            Method::PATCH,
            &["vehicles", id, "status"],
            change,
            Some("vehicle"),
        )
        .await
    }
}
