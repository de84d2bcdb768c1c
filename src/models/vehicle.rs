use serde::{Deserialize, Serialize};

use crate::error::AppError;
use crate::models::id_string;
use crate::models::location::CurrentLocation;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum VehicleStatus {
    #[serde(alias = "available")]
    Available,
    #[serde(rename = "On Route", alias = "OnRoute", alias = "on_route")]
    OnRoute,
    #[serde(alias = "assigned")]
    Assigned,
    #[serde(alias = "maintenance")]
    Maintenance,
    #[serde(rename = "Out of Service", alias = "OutOfService", alias = "out_of_service")]
    OutOfService,
}

impl VehicleStatus {
    pub fn label(&self) -> &'static str {
        match self {
            VehicleStatus::Available => "Available",
            VehicleStatus::OnRoute => "On Route",
            VehicleStatus::Assigned => "Assigned",
            VehicleStatus::Maintenance => "Maintenance",
            VehicleStatus::OutOfService => "Out of Service",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Vehicle {
    #[serde(alias = "_id", deserialize_with = "id_string")]
    pub id: String,
    pub name: String,
    #[serde(rename = "type")]
    pub vehicle_type: String,
    pub plate_number: String,
    #[serde(default)]
    pub capacity: f64,
    #[serde(default)]
    pub fuel_type: Option<String>,
    pub status: VehicleStatus,
    #[serde(default)]
    pub current_location: Option<CurrentLocation>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VehicleRequest {
    pub name: String,
    #[serde(rename = "type")]
    pub vehicle_type: String,
    pub plate_number: String,
    pub capacity: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fuel_type: Option<String>,
}

impl VehicleRequest {
    pub fn validate(&self) -> Result<(), AppError> {
        if self.name.trim().is_empty() {
            return Err(AppError::validation("name", "name cannot be empty"));
        }

        if self.vehicle_type.trim().is_empty() {
            return Err(AppError::validation("type", "vehicle type cannot be empty"));
        }

        if self.plate_number.trim().is_empty() {
            return Err(AppError::validation(
                "plateNumber",
                "plate number cannot be empty",
            ));
        }

        if !self.capacity.is_finite() || self.capacity <= 0.0 {
            return Err(AppError::validation("capacity", "capacity must be > 0"));
        }

        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VehicleStatusChange {
    pub status: VehicleStatus,
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::{Vehicle, VehicleRequest, VehicleStatus};

    #[test]
    fn decodes_spaced_status_names() {
        let vehicle: Vehicle = serde_json::from_value(json!({
            "_id": 17,
            "name": "Tata Ace",
            "type": "Mini Truck",
            "plateNumber": "KA-01-AB-1234",
            "capacity": 750,
            "status": "Out of Service"
        }))
        .unwrap();

        assert_eq!(vehicle.id, "17");
        assert_eq!(vehicle.status, VehicleStatus::OutOfService);
        assert!(vehicle.fuel_type.is_none());
    }

    #[test]
    fn blank_plate_number_is_a_field_error() {
        let request = VehicleRequest {
            name: "Van 2".to_string(),
            vehicle_type: "Van".to_string(),
            plate_number: " ".to_string(),
            capacity: 900.0,
            fuel_type: None,
        };

        let err = request.validate().unwrap_err();
        assert!(err.to_string().contains("plateNumber"));
    }
}
