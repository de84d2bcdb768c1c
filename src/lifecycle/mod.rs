use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::AppError;
use crate::models::delivery::{AssignmentRequest, BookingRequest, DeliveryStatus};
use crate::models::user::Role;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LifecycleState {
    pub status: DeliveryStatus,
    pub assigned_driver_id: Option<String>,
    pub customer_id: Option<String>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "camelCase")]
pub enum Action {
    Book,
    Approve,
    Cancel,
    Assign,
    Accept,
    Reject,
    StartRoute,
    Deliver,
}

impl Action {
    pub const ALL: [Action; 8] = [
        Action::Book,
        Action::Approve,
        Action::Cancel,
        Action::Assign,
        Action::Accept,
        Action::Reject,
        Action::StartRoute,
        Action::Deliver,
    ];

    pub fn label(&self) -> &'static str {
        match self {
            Action::Book => "book",
            Action::Approve => "approve",
            Action::Cancel => "cancel",
            Action::Assign => "assign",
            Action::Accept => "accept",
            Action::Reject => "reject",
            Action::StartRoute => "start",
            Action::Deliver => "deliver",
        }
    }

    pub fn target(&self) -> DeliveryStatus {
        match self {
            Action::Book => DeliveryStatus::Pending,
            Action::Approve => DeliveryStatus::Approved,
            Action::Cancel => DeliveryStatus::Cancelled,
            Action::Assign => DeliveryStatus::Assigned,
            Action::Accept => DeliveryStatus::Accepted,
            Action::Reject => DeliveryStatus::Rejected,
            Action::StartRoute => DeliveryStatus::OnRoute,
            Action::Deliver => DeliveryStatus::Delivered,
        }
    }

    pub fn role(&self) -> Role {
        match self {
            Action::Book | Action::Cancel => Role::Customer,
            Action::Approve | Action::Assign => Role::Admin,
            Action::Accept | Action::Reject | Action::StartRoute | Action::Deliver => Role::Driver,
        }
    }

    /// Statuses the action may leave from. `Book` has none: it creates the delivery.
    pub fn sources(&self) -> &'static [DeliveryStatus] {
        match self {
            Action::Book => &[],
            Action::Approve => &[DeliveryStatus::Pending],
            Action::Cancel => &[DeliveryStatus::Pending, DeliveryStatus::Approved],
            Action::Assign => &[DeliveryStatus::Approved, DeliveryStatus::Rejected],
            Action::Accept | Action::Reject => &[DeliveryStatus::Assigned],
            Action::StartRoute => &[DeliveryStatus::Accepted],
            Action::Deliver => &[DeliveryStatus::OnRoute],
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActorRef {
    pub role: Role,
    pub id: String,
}

#[derive(Debug, Clone, Copy)]
pub enum TransitionPayload<'a> {
    None,
    Booking(&'a BookingRequest),
    Assignment(&'a AssignmentRequest),
    Rejection { reason: &'a str },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Transition {
    pub from: Option<DeliveryStatus>,
    pub to: DeliveryStatus,
    /// `false` when the delivery was already in the target status.
    pub applied: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RejectionReason {
    NotPermitted { role: Role },
    IllegalFrom,
    NotActorsDelivery,
    AlreadyAssigned,
    Invalid { field: String, message: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransitionRejection {
    pub action: Action,
    pub from: Option<DeliveryStatus>,
    pub reason: RejectionReason,
}

impl fmt::Display for TransitionRejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (&self.reason, self.from) {
            (RejectionReason::NotPermitted { role }, _) => {
                write!(f, "a {role} cannot {} a delivery", self.action)
            }
            (RejectionReason::IllegalFrom, Some(from)) => {
                write!(f, "cannot {} a delivery that is {from}", self.action)
            }
            (RejectionReason::IllegalFrom, None) => {
                write!(f, "cannot {} a delivery that does not exist", self.action)
            }
            (RejectionReason::NotActorsDelivery, _) => {
                write!(f, "cannot {}: the delivery belongs to someone else", self.action)
            }
            (RejectionReason::AlreadyAssigned, _) => f.write_str(
                "delivery is already assigned to another driver; it must be rejected before reassignment",
            ),
            (RejectionReason::Invalid { message, .. }, _) => {
                write!(f, "cannot {}: {message}", self.action)
            }
        }
    }
}

impl std::error::Error for TransitionRejection {}

/// `current` is `None` for a delivery that does not exist yet. Repeating a
/// transition that already happened yields `applied == false`.
pub fn attempt_transition(
    current: Option<&LifecycleState>,
    action: Action,
    actor: &ActorRef,
    payload: TransitionPayload<'_>,
) -> Result<Transition, TransitionRejection> {
    let from = current.map(|state| state.status);
    let reject = |reason| TransitionRejection {
        action,
        from,
        reason,
    };

    if action.role() != actor.role {
        return Err(reject(RejectionReason::NotPermitted { role: actor.role }));
    }

    validate_payload(action, payload).map_err(reject)?;

    let Some(state) = current else {
        return match action {
            Action::Book => Ok(Transition {
                from: None,
                to: DeliveryStatus::Pending,
                applied: true,
            }),
            _ => Err(reject(RejectionReason::IllegalFrom)),
        };
    };

    if action == Action::Book {
        return Err(reject(RejectionReason::IllegalFrom));
    }

    check_ownership(state, action, actor).map_err(reject)?;

    if state.status == action.target() {
        if let (Action::Assign, TransitionPayload::Assignment(request)) = (action, payload) {
            if state.assigned_driver_id.as_deref() != Some(request.driver_id.as_str()) {
                return Err(reject(RejectionReason::AlreadyAssigned));
            }
        }

        return Ok(Transition {
            from,
            to: state.status,
            applied: false,
        });
    }

    if !action.sources().contains(&state.status) {
        return Err(reject(RejectionReason::IllegalFrom));
    }

    Ok(Transition {
        from,
        to: action.target(),
        applied: true,
    })
}

pub fn allowed_actions(current: Option<&LifecycleState>, actor: &ActorRef) -> Vec<Action> {
    let Some(state) = current else {
        return match actor.role {
            Role::Customer => vec![Action::Book],
            _ => Vec::new(),
        };
    };

    Action::ALL
        .into_iter()
        .filter(|action| action.role() == actor.role)
        .filter(|action| action.sources().contains(&state.status))
        .filter(|action| check_ownership(state, *action, actor).is_ok())
        .collect()
}

fn check_ownership(
    state: &LifecycleState,
    action: Action,
    actor: &ActorRef,
) -> Result<(), RejectionReason> {
    match action.role() {
        Role::Driver => {
            if state.assigned_driver_id.as_deref() != Some(actor.id.as_str()) {
                return Err(RejectionReason::NotActorsDelivery);
            }
        }
        Role::Customer => {
            if let Some(owner) = state.customer_id.as_deref() {
                if owner != actor.id {
                    return Err(RejectionReason::NotActorsDelivery);
                }
            }
        }
        Role::Admin => {}
    }
    Ok(())
}

fn validate_payload(action: Action, payload: TransitionPayload<'_>) -> Result<(), RejectionReason> {
    match (action, payload) {
        (Action::Book, TransitionPayload::Booking(booking)) => {
            booking.validate().map_err(invalid_from_error)
        }
        (Action::Assign, TransitionPayload::Assignment(request)) => {
            if request.driver_id.trim().is_empty() {
                return Err(invalid("driverId", "a driver must be selected"));
            }
            if request.vehicle_id.trim().is_empty() {
                return Err(invalid("vehicleId", "a vehicle must be selected"));
            }
            let distance = request.estimated_distance_km;
            if !distance.is_finite() || distance <= 0.0 {
                return Err(invalid("estimatedDistanceKm", "distance must be > 0"));
            }
            Ok(())
        }
        (Action::Reject, TransitionPayload::Rejection { reason }) => {
            if reason.trim().is_empty() {
                return Err(invalid("reason", "a rejection reason is required"));
            }
            Ok(())
        }
        (Action::Book, _) => Err(invalid("booking", "booking details are required")),
        (Action::Assign, _) => Err(invalid("assignment", "driver and vehicle are required")),
        (Action::Reject, _) => Err(invalid("reason", "a rejection reason is required")),
        _ => Ok(()),
    }
}

fn invalid(field: &str, message: &str) -> RejectionReason {
    RejectionReason::Invalid {
        field: field.to_string(),
        message: message.to_string(),
    }
}

fn invalid_from_error(err: AppError) -> RejectionReason {
    match err {
        AppError::Validation { field, message } => RejectionReason::Invalid { field, message },
        other => RejectionReason::Invalid {
            field: "booking".to_string(),
            message: other.to_string(),
        },
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::{
        allowed_actions, attempt_transition, Action, ActorRef, LifecycleState, RejectionReason,
        TransitionPayload,
    };
    use crate::models::delivery::{AssignmentRequest, BookingRequest, DeliveryStatus};
    use crate::models::user::Role;

    const DRIVER_ID: &str = "drv-1";
    const CUSTOMER_ID: &str = "cus-1";

    fn actor(role: Role) -> ActorRef {
        let id = match role {
            Role::Customer => CUSTOMER_ID,
            Role::Admin => "adm-1",
            Role::Driver => DRIVER_ID,
        };
        ActorRef {
            role,
            id: id.to_string(),
        }
    }

    fn state(status: DeliveryStatus) -> LifecycleState {
        LifecycleState {
            status,
            assigned_driver_id: Some(DRIVER_ID.to_string()),
            customer_id: Some(CUSTOMER_ID.to_string()),
        }
    }

    fn booking() -> BookingRequest {
        serde_json::from_value(json!({
            "pickupLocation": { "address": "A", "lat": 12.9, "lng": 77.6 },
            "dropLocation": { "address": "B", "lat": 12.95, "lng": 77.65 },
            "packageDetails": { "weight": 5, "cluster": "Large" },
            "contactNumber": "9876543210"
        }))
        .unwrap()
    }

    fn assignment() -> AssignmentRequest {
        AssignmentRequest {
            driver_id: DRIVER_ID.to_string(),
            vehicle_id: "veh-1".to_string(),
            estimated_distance_km: 7.5,
        }
    }

    const EDGES: [(DeliveryStatus, Action); 9] = [
        (DeliveryStatus::Pending, Action::Approve),
        (DeliveryStatus::Pending, Action::Cancel),
        (DeliveryStatus::Approved, Action::Cancel),
        (DeliveryStatus::Approved, Action::Assign),
        (DeliveryStatus::Rejected, Action::Assign),
        (DeliveryStatus::Assigned, Action::Accept),
        (DeliveryStatus::Assigned, Action::Reject),
        (DeliveryStatus::Accepted, Action::StartRoute),
        (DeliveryStatus::OnRoute, Action::Deliver),
    ];

    #[test]
    fn only_listed_edges_apply() {
        let booking = booking();
        let assignment = assignment();

        for status in DeliveryStatus::ALL {
            for action in Action::ALL {
                let payload = match action {
                    Action::Book => TransitionPayload::Booking(&booking),
                    Action::Assign => TransitionPayload::Assignment(&assignment),
                    Action::Reject => TransitionPayload::Rejection {
                        reason: "vehicle broke down",
                    },
                    _ => TransitionPayload::None,
                };
                let current = state(status);
                let result =
                    attempt_transition(Some(&current), action, &actor(action.role()), payload);

                if action == Action::Book {
                    assert!(result.is_err(), "booking an existing delivery must fail");
                } else if EDGES.contains(&(status, action)) {
                    let transition = result.unwrap();
                    assert!(transition.applied, "{status} --{action}--> should apply");
                    assert_eq!(transition.to, action.target());
                } else if status == action.target() {
                    let transition = result.unwrap();
                    assert!(!transition.applied, "{status} --{action}--> should be a no-op");
                    assert_eq!(transition.to, status);
                } else {
                    let rejection = result.unwrap_err();
                    assert_eq!(rejection.from, Some(status));
                    assert!(!rejection.to_string().is_empty());
                }
            }
        }
    }

    #[test]
    fn booking_creates_a_pending_delivery() {
        let booking = booking();
        let transition = attempt_transition(
            None,
            Action::Book,
            &actor(Role::Customer),
            TransitionPayload::Booking(&booking),
        )
        .unwrap();

        assert_eq!(transition.from, None);
        assert_eq!(transition.to, DeliveryStatus::Pending);
        assert!(transition.applied);
    }

    #[test]
    fn booking_with_bad_coordinates_is_invalid() {
        let mut booking = booking();
        booking.drop_location.lat = 123.0;

        let rejection = attempt_transition(
            None,
            Action::Book,
            &actor(Role::Customer),
            TransitionPayload::Booking(&booking),
        )
        .unwrap_err();

        assert!(matches!(
            rejection.reason,
            RejectionReason::Invalid { ref field, .. } if field == "dropLocation"
        ));
    }

    #[test]
    fn actions_on_missing_delivery_are_illegal() {
        let rejection = attempt_transition(
            None,
            Action::Approve,
            &actor(Role::Admin),
            TransitionPayload::None,
        )
        .unwrap_err();

        assert_eq!(rejection.reason, RejectionReason::IllegalFrom);
    }

    #[test]
    fn re_approving_is_a_no_op() {
        let transition = attempt_transition(
            Some(&state(DeliveryStatus::Approved)),
            Action::Approve,
            &actor(Role::Admin),
            TransitionPayload::None,
        )
        .unwrap();

        assert!(!transition.applied);
        assert_eq!(transition.from, Some(DeliveryStatus::Approved));
    }

    #[test]
    fn cancelling_late_deliveries_fails_with_description() {
        for status in [DeliveryStatus::OnRoute, DeliveryStatus::Delivered] {
            let rejection = attempt_transition(
                Some(&state(status)),
                Action::Cancel,
                &actor(Role::Customer),
                TransitionPayload::None,
            )
            .unwrap_err();

            assert_eq!(rejection.reason, RejectionReason::IllegalFrom);
            assert_eq!(
                rejection.to_string(),
                format!("cannot cancel a delivery that is {status}")
            );
        }
    }

    #[test]
    fn rejection_needs_a_reason() {
        for reason in ["", "   ", "\t\n"] {
            let rejection = attempt_transition(
                Some(&state(DeliveryStatus::Assigned)),
                Action::Reject,
                &actor(Role::Driver),
                TransitionPayload::Rejection { reason },
            )
            .unwrap_err();

            assert!(matches!(
                rejection.reason,
                RejectionReason::Invalid { ref field, .. } if field == "reason"
            ));
        }
    }

    #[test]
    fn wrong_role_is_not_permitted() {
        let rejection = attempt_transition(
            Some(&state(DeliveryStatus::Pending)),
            Action::Approve,
            &actor(Role::Customer),
            TransitionPayload::None,
        )
        .unwrap_err();

        assert_eq!(
            rejection.reason,
            RejectionReason::NotPermitted {
                role: Role::Customer
            }
        );
        assert_eq!(rejection.to_string(), "a customer cannot approve a delivery");
    }

    #[test]
    fn drivers_only_act_on_their_own_assignment() {
        let other_driver = ActorRef {
            role: Role::Driver,
            id: "drv-2".to_string(),
        };

        let rejection = attempt_transition(
            Some(&state(DeliveryStatus::Assigned)),
            Action::Accept,
            &other_driver,
            TransitionPayload::None,
        )
        .unwrap_err();

        assert_eq!(rejection.reason, RejectionReason::NotActorsDelivery);
    }

    #[test]
    fn customers_only_cancel_their_own_booking() {
        let stranger = ActorRef {
            role: Role::Customer,
            id: "cus-9".to_string(),
        };

        let rejection = attempt_transition(
            Some(&state(DeliveryStatus::Pending)),
            Action::Cancel,
            &stranger,
            TransitionPayload::None,
        )
        .unwrap_err();

        assert_eq!(rejection.reason, RejectionReason::NotActorsDelivery);
    }

    #[test]
    fn assigning_needs_driver_vehicle_and_distance() {
        let mut request = assignment();
        request.estimated_distance_km = 0.0;

        let rejection = attempt_transition(
            Some(&state(DeliveryStatus::Approved)),
            Action::Assign,
            &actor(Role::Admin),
            TransitionPayload::Assignment(&request),
        )
        .unwrap_err();
        assert!(matches!(rejection.reason, RejectionReason::Invalid { .. }));

        let mut request = assignment();
        request.vehicle_id = String::new();

        let rejection = attempt_transition(
            Some(&state(DeliveryStatus::Approved)),
            Action::Assign,
            &actor(Role::Admin),
            TransitionPayload::Assignment(&request),
        )
        .unwrap_err();
        assert!(matches!(
            rejection.reason,
            RejectionReason::Invalid { ref field, .. } if field == "vehicleId"
        ));
    }

    #[test]
    fn assigning_an_assigned_delivery_to_someone_else_conflicts() {
        let mut request = assignment();
        request.driver_id = "drv-2".to_string();

        let rejection = attempt_transition(
            Some(&state(DeliveryStatus::Assigned)),
            Action::Assign,
            &actor(Role::Admin),
            TransitionPayload::Assignment(&request),
        )
        .unwrap_err();

        assert_eq!(rejection.reason, RejectionReason::AlreadyAssigned);
    }

    #[test]
    fn buttons_follow_role_and_status() {
        let pending = state(DeliveryStatus::Pending);
        assert_eq!(
            allowed_actions(Some(&pending), &actor(Role::Admin)),
            vec![Action::Approve]
        );
        assert_eq!(
            allowed_actions(Some(&pending), &actor(Role::Customer)),
            vec![Action::Cancel]
        );
        assert!(allowed_actions(Some(&pending), &actor(Role::Driver)).is_empty());

        let assigned = state(DeliveryStatus::Assigned);
        assert_eq!(
            allowed_actions(Some(&assigned), &actor(Role::Driver)),
            vec![Action::Accept, Action::Reject]
        );

        let rejected = state(DeliveryStatus::Rejected);
        assert_eq!(
            allowed_actions(Some(&rejected), &actor(Role::Admin)),
            vec![Action::Assign]
        );

        let delivered = state(DeliveryStatus::Delivered);
        for role in [Role::Customer, Role::Admin, Role::Driver] {
            assert!(allowed_actions(Some(&delivered), &actor(role)).is_empty());
        }

        assert_eq!(allowed_actions(None, &actor(Role::Customer)), vec![Action::Book]);
    }
}
