use std::sync::Arc;

use axum::routing::post;
use axum::Json;
use axum::Router;
use serde::Deserialize;

use crate::error::AppError;
use crate::geo::validate_point;
use crate::models::delivery::Cluster;
use crate::models::location::GeoPoint;
use crate::pricing::{compute_price, estimate_for_route, PriceEstimate};
use crate::state::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new().route("/pricing/estimate", post(estimate))
}

/// Either a route (`pickup` + `drop`) or a known `distanceKm`.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EstimateRequest {
    pub weight: f64,
    #[serde(default)]
    pub cluster: Cluster,
    #[serde(default)]
    pub pickup: Option<GeoPoint>,
    #[serde(default)]
    pub drop: Option<GeoPoint>,
    #[serde(default)]
    pub distance_km: Option<f64>,
}

/// Preview only; the price the platform stores is authoritative.
async fn estimate(Json(request): Json<EstimateRequest>) -> Result<Json<PriceEstimate>, AppError> {
    if !request.weight.is_finite() || request.weight < 0.0 {
        return Err(AppError::validation("weight", "weight must be >= 0"));
    }

    match (request.pickup, request.drop, request.distance_km) {
        (Some(pickup), Some(drop), _) => {
            validate_point("pickup", &pickup)?;
            validate_point("drop", &drop)?;
            Ok(Json(estimate_for_route(
                &pickup,
                &drop,
                request.weight,
                request.cluster,
            )))
        }
        (None, None, Some(distance_km)) => {
            if !distance_km.is_finite() || distance_km < 0.0 {
                return Err(AppError::validation("distanceKm", "distance must be >= 0"));
            }
            Ok(Json(PriceEstimate {
                distance_km,
                breakdown: compute_price(request.weight, distance_km, request.cluster),
            }))
        }
        _ => Err(AppError::validation(
            "pickup",
            "pickup and drop, or distanceKm, are required",
        )),
    }
}
