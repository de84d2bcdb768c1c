use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::AppError;
use crate::models::delivery::PartyRef;
use crate::models::{id_string, optional_id_string};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct CategoryRatings {
    pub punctuality: u8,
    pub professionalism: u8,
    pub vehicle_condition: u8,
    pub communication: u8,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Feedback {
    #[serde(alias = "_id", deserialize_with = "id_string")]
    pub id: String,
    #[serde(default, alias = "delivery", deserialize_with = "optional_id_string")]
    pub delivery_id: Option<String>,
    #[serde(default)]
    pub customer: Option<PartyRef>,
    #[serde(default)]
    pub driver: Option<PartyRef>,
    pub rating: u8,
    #[serde(alias = "categoryRatings")]
    pub categories: CategoryRatings,
    #[serde(default)]
    pub comment: String,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub admin_response: Option<String>,
    #[serde(default)]
    pub viewed: bool,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeedbackSubmission {
    pub delivery_id: String,
    pub rating: u8,
    pub categories: CategoryRatings,
    #[serde(default)]
    pub comment: String,
    #[serde(default)]
    pub tags: Vec<String>,
}

impl FeedbackSubmission {
    pub fn validate(&self) -> Result<(), AppError> {
        if self.delivery_id.trim().is_empty() {
            return Err(AppError::validation("deliveryId", "delivery id cannot be empty"));
        }

        check_stars("rating", self.rating)?;
        check_stars("categories.punctuality", self.categories.punctuality)?;
        check_stars("categories.professionalism", self.categories.professionalism)?;
        check_stars("categories.vehicleCondition", self.categories.vehicle_condition)?;
        check_stars("categories.communication", self.categories.communication)?;

        if self.tags.iter().any(|tag| tag.trim().is_empty()) {
            return Err(AppError::validation("tags", "tags cannot be blank"));
        }

        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeedbackReply {
    pub response: String,
}

impl FeedbackReply {
    pub fn validate(&self) -> Result<(), AppError> {
        if self.response.trim().is_empty() {
            return Err(AppError::validation("response", "response cannot be empty"));
        }
        Ok(())
    }
}

fn check_stars(field: &str, stars: u8) -> Result<(), AppError> {
    if !(1..=5).contains(&stars) {
        return Err(AppError::validation(field, "rating must be between 1 and 5"));
    }
    Ok(())
}
