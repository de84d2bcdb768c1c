use serde::{Deserialize, Serialize};

use crate::models::id_string;
use crate::models::wallet::Wallet;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum DriverStatus {
    #[serde(alias = "active")]
    Active,
    #[serde(alias = "inactive")]
    Inactive,
    #[serde(rename = "On Leave", alias = "OnLeave", alias = "on_leave")]
    OnLeave,
    #[serde(alias = "suspended")]
    Suspended,
}

impl DriverStatus {
    pub fn label(&self) -> &'static str {
        match self {
            DriverStatus::Active => "Active",
            DriverStatus::Inactive => "Inactive",
            DriverStatus::OnLeave => "On Leave",
            DriverStatus::Suspended => "Suspended",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(rename_all = "camelCase", default)]
pub struct Performance {
    pub completed_trips: u32,
    pub average_rating: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Driver {
    #[serde(alias = "_id", deserialize_with = "id_string")]
    pub id: String,
    pub name: String,
    pub email: String,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default = "default_driver_status")]
    pub status: DriverStatus,
    #[serde(default)]
    pub performance: Performance,
    #[serde(default)]
    pub wallet: Option<Wallet>,
}

fn default_driver_status() -> DriverStatus {
    DriverStatus::Active
}
