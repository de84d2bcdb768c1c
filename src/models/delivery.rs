use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::AppError;
use crate::geo::validate_point;
use crate::lifecycle::LifecycleState;
use crate::models::{id_string, optional_id_string};
use crate::models::location::{CurrentLocation, Place};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum DeliveryStatus {
    #[serde(alias = "pending")]
    Pending,
    #[serde(alias = "approved")]
    Approved,
    #[serde(alias = "assigned")]
    Assigned,
    #[serde(alias = "accepted")]
    Accepted,
    #[serde(
        rename = "On Route",
        alias = "OnRoute",
        alias = "onRoute",
        alias = "on_route",
        alias = "on route"
    )]
    OnRoute,
    #[serde(alias = "delivered")]
    Delivered,
    #[serde(alias = "cancelled", alias = "Canceled")]
    Cancelled,
    #[serde(alias = "rejected")]
    Rejected,
}

impl DeliveryStatus {
    pub const ALL: [DeliveryStatus; 8] = [
        DeliveryStatus::Pending,
        DeliveryStatus::Approved,
        DeliveryStatus::Assigned,
        DeliveryStatus::Accepted,
        DeliveryStatus::OnRoute,
        DeliveryStatus::Delivered,
        DeliveryStatus::Cancelled,
        DeliveryStatus::Rejected,
    ];

    pub fn label(&self) -> &'static str {
        match self {
            DeliveryStatus::Pending => "Pending",
            DeliveryStatus::Approved => "Approved",
            DeliveryStatus::Assigned => "Assigned",
            DeliveryStatus::Accepted => "Accepted",
            DeliveryStatus::OnRoute => "On Route",
            DeliveryStatus::Delivered => "Delivered",
            DeliveryStatus::Cancelled => "Cancelled",
            DeliveryStatus::Rejected => "Rejected",
        }
    }
}

impl fmt::Display for DeliveryStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
pub enum Cluster {
    #[default]
    #[serde(alias = "small")]
    Small,
    #[serde(alias = "medium")]
    Medium,
    #[serde(alias = "large")]
    Large,
    #[serde(rename = "Extra Large", alias = "ExtraLarge", alias = "extra large")]
    ExtraLarge,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct PartyRef {
    #[serde(default, alias = "_id", deserialize_with = "optional_id_string")]
    pub id: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct VehicleRef {
    #[serde(default, alias = "_id", deserialize_with = "optional_id_string")]
    pub id: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub plate_number: Option<String>,
    #[serde(default, rename = "type")]
    pub vehicle_type: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PackageDetails {
    pub weight: f64,
    #[serde(default)]
    pub dimensions: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub cluster: Cluster,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Default)]
#[serde(rename_all = "camelCase", default)]
pub struct Pricing {
    pub base_price: f64,
    pub weight_charge: f64,
    pub distance_charge: f64,
    pub cluster_charge: f64,
    pub total_price: f64,
    pub distance_km: Option<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct HistoryEntry {
    pub status: DeliveryStatus,
    #[serde(default)]
    pub description: String,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Delivery {
    #[serde(alias = "_id", deserialize_with = "id_string")]
    pub id: String,
    #[serde(default)]
    pub delivery_code: Option<String>,
    #[serde(default)]
    pub customer: Option<PartyRef>,
    #[serde(default)]
    pub driver: Option<PartyRef>,
    #[serde(default)]
    pub vehicle: Option<VehicleRef>,
    pub pickup_location: Place,
    pub drop_location: Place,
    #[serde(default)]
    pub current_location: Option<CurrentLocation>,
    pub package_details: PackageDetails,
    #[serde(default)]
    pub contact_number: Option<String>,
    #[serde(default)]
    pub pricing: Pricing,
    pub status: DeliveryStatus,
    #[serde(default)]
    pub rejection_reason: Option<String>,
    #[serde(default)]
    pub status_history: Vec<HistoryEntry>,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
}

impl Delivery {
    pub fn lifecycle_state(&self) -> LifecycleState {
        LifecycleState {
            status: self.status,
            assigned_driver_id: self.driver.as_ref().and_then(|driver| driver.id.clone()),
            customer_id: self.customer.as_ref().and_then(|customer| customer.id.clone()),
        }
    }

    pub fn matches_search(&self, needle: &str) -> bool {
        let needle = needle.trim().to_lowercase();
        if needle.is_empty() {
            return true;
        }

        let party_matches = |party: &Option<PartyRef>| {
            party.as_ref().is_some_and(|party| {
                party
                    .name
                    .as_deref()
                    .into_iter()
                    .chain(party.email.as_deref())
                    .any(|field| field.to_lowercase().contains(&needle))
            })
        };

        self.id.to_lowercase().contains(&needle)
            || self
                .delivery_code
                .as_deref()
                .is_some_and(|code| code.to_lowercase().contains(&needle))
            || self.pickup_location.address.to_lowercase().contains(&needle)
            || self.drop_location.address.to_lowercase().contains(&needle)
            || party_matches(&self.customer)
            || party_matches(&self.driver)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BookingRequest {
    pub pickup_location: Place,
    pub drop_location: Place,
    pub package_details: PackageDetails,
    pub contact_number: String,
}

impl BookingRequest {
    pub fn validate(&self) -> Result<(), AppError> {
        validate_point("pickupLocation", &self.pickup_location.point())?;
        validate_point("dropLocation", &self.drop_location.point())?;

        let weight = self.package_details.weight;
        if !weight.is_finite() || weight <= 0.0 {
            return Err(AppError::validation(
                "packageDetails.weight",
                "weight must be > 0",
            ));
        }

        if self.contact_number.trim().is_empty() {
            return Err(AppError::validation(
                "contactNumber",
                "contact number cannot be empty",
            ));
        }

        Ok(())
    }
}

/// What the platform receives when a booking is created: the request plus the
/// client-side price preview.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NewDelivery {
    #[serde(flatten)]
    pub booking: BookingRequest,
    pub pricing: Pricing,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssignmentRequest {
    pub driver_id: String,
    pub vehicle_id: String,
    #[serde(alias = "estimatedDistance")]
    pub estimated_distance_km: f64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AssignDelivery {
    pub driver_id: String,
    pub vehicle_id: String,
    pub estimated_distance: f64,
    pub pricing: Pricing,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusChange {
    pub status: DeliveryStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct RejectDelivery {
    pub reason: String,
}

/// Tracking snapshot as served by the platform's tracking endpoint.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct DeliveryTracking {
    #[serde(alias = "_id", alias = "deliveryId", deserialize_with = "id_string")]
    pub id: String,
    pub status: DeliveryStatus,
    #[serde(default)]
    pub current_location: Option<CurrentLocation>,
    #[serde(default)]
    pub status_history: Vec<HistoryEntry>,
}
