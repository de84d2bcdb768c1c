use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::{get, patch, put};
use axum::Json;
use axum::Router;
use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::info;

use crate::api::rest::require_role;
use crate::error::AppError;
use crate::models::driver::Driver;
use crate::models::user::Role;
use crate::models::vehicle::{Vehicle, VehicleRequest, VehicleStatusChange};
use crate::presentation::{driver_style, vehicle_style, StatusStyle};
use crate::state::AppState;
use crate::store::ListSnapshot;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/drivers", get(list_drivers))
        .route("/vehicles", get(list_vehicles).post(create_vehicle))
        .route("/vehicles/:id", put(update_vehicle).delete(delete_vehicle))
        .route("/vehicles/:id/status", patch(update_vehicle_status))
}

#[derive(Debug, Serialize)]
pub struct Styled<T> {
    #[serde(flatten)]
    pub item: T,
    pub style: StatusStyle,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FleetList<T> {
    pub items: Vec<Styled<T>>,
    pub error: Option<String>,
    pub error_kind: Option<&'static str>,
    pub refreshed_at: Option<DateTime<Utc>>,
}

impl<T> FleetList<T> {
    fn from_snapshot(snapshot: ListSnapshot<T>, style: impl Fn(&T) -> StatusStyle) -> Self {
        Self {
            items: snapshot
                .items
                .into_iter()
                .map(|item| Styled {
                    style: style(&item),
                    item,
                })
                .collect(),
            error: snapshot.error,
            error_kind: snapshot.error_kind,
            refreshed_at: snapshot.refreshed_at,
        }
    }
}

async fn list_drivers(
    State(state): State<Arc<AppState>>,
) -> Result<Json<FleetList<Driver>>, AppError> {
    let actor = state.session.actor()?;
    require_role(&actor, &[Role::Admin])?;

    let snapshot = state.drivers.ensure_loaded().await.require_session()?;
    Ok(Json(FleetList::from_snapshot(snapshot, |driver| {
        driver_style(driver.status)
    })))
}

async fn list_vehicles(
    State(state): State<Arc<AppState>>,
) -> Result<Json<FleetList<Vehicle>>, AppError> {
    let actor = state.session.actor()?;
    require_role(&actor, &[Role::Admin, Role::Driver])?;

    let snapshot = state.vehicles.ensure_loaded().await.require_session()?;
    Ok(Json(FleetList::from_snapshot(snapshot, |vehicle| {
        vehicle_style(vehicle.status)
    })))
}

async fn create_vehicle(
    State(state): State<Arc<AppState>>,
    Json(request): Json<VehicleRequest>,
) -> Result<(StatusCode, Json<Styled<Vehicle>>), AppError> {
    let actor = state.session.actor()?;
    require_role(&actor, &[Role::Admin])?;
    request.validate()?;

    let vehicle = state
        .vehicles
        .mutate(state.api.create_vehicle(&request))
        .await?;

    info!(vehicle_id = %vehicle.id, plate = %vehicle.plate_number, "vehicle created");
    Ok((StatusCode::CREATED, Json(styled(vehicle))))
}

async fn update_vehicle(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(request): Json<VehicleRequest>,
) -> Result<Json<Styled<Vehicle>>, AppError> {
    let actor = state.session.actor()?;
    require_role(&actor, &[Role::Admin])?;
    request.validate()?;

    let vehicle = state
        .vehicles
        .mutate(state.api.update_vehicle(&id, &request))
        .await?;
    Ok(Json(styled(vehicle)))
}

async fn delete_vehicle(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<StatusCode, AppError> {
    let actor = state.session.actor()?;
    require_role(&actor, &[Role::Admin])?;

    state.vehicles.mutate(state.api.delete_vehicle(&id)).await?;
    info!(vehicle_id = %id, "vehicle deleted");
    Ok(StatusCode::NO_CONTENT)
}

async fn update_vehicle_status(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(change): Json<VehicleStatusChange>,
) -> Result<Json<Styled<Vehicle>>, AppError> {
    let actor = state.session.actor()?;
    require_role(&actor, &[Role::Admin])?;

    let vehicle = state
        .vehicles
        .mutate(state.api.update_vehicle_status(&id, &change))
        .await?;
    Ok(Json(styled(vehicle)))
}

fn styled(vehicle: Vehicle) -> Styled<Vehicle> {
    Styled {
        style: vehicle_style(vehicle.status),
        item: vehicle,
    }
}
