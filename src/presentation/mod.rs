use serde::Serialize;

use crate::models::delivery::DeliveryStatus;
use crate::models::driver::DriverStatus;
use crate::models::vehicle::VehicleStatus;

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Tone {
    Neutral,
    Info,
    Progress,
    Success,
    Warning,
    Danger,
}

impl Tone {
    pub fn color(&self) -> &'static str {
        match self {
            Tone::Neutral => "#6b7280",
            Tone::Info => "#3b82f6",
            Tone::Progress => "#8b5cf6",
            Tone::Success => "#10b981",
            Tone::Warning => "#f59e0b",
            Tone::Danger => "#ef4444",
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
pub struct StatusStyle {
    pub label: &'static str,
    pub tone: Tone,
    pub color: &'static str,
}

impl StatusStyle {
    fn new(label: &'static str, tone: Tone) -> Self {
        Self {
            label,
            tone,
            color: tone.color(),
        }
    }
}

pub fn delivery_style(status: DeliveryStatus) -> StatusStyle {
    let tone = match status {
        DeliveryStatus::Pending => Tone::Warning,
        DeliveryStatus::Approved => Tone::Info,
        DeliveryStatus::Assigned | DeliveryStatus::Accepted => Tone::Progress,
        DeliveryStatus::OnRoute => Tone::Info,
        DeliveryStatus::Delivered => Tone::Success,
        DeliveryStatus::Cancelled => Tone::Neutral,
        DeliveryStatus::Rejected => Tone::Danger,
    };
    StatusStyle::new(status.label(), tone)
}

pub fn vehicle_style(status: VehicleStatus) -> StatusStyle {
    let tone = match status {
        VehicleStatus::Available => Tone::Success,
        VehicleStatus::OnRoute => Tone::Info,
        VehicleStatus::Assigned => Tone::Progress,
        VehicleStatus::Maintenance => Tone::Warning,
        VehicleStatus::OutOfService => Tone::Danger,
    };
    StatusStyle::new(status.label(), tone)
}

pub fn driver_style(status: DriverStatus) -> StatusStyle {
    let tone = match status {
        DriverStatus::Active => Tone::Success,
        DriverStatus::Inactive => Tone::Neutral,
        DriverStatus::OnLeave => Tone::Warning,
        DriverStatus::Suspended => Tone::Danger,
    };
    StatusStyle::new(status.label(), tone)
}

#[cfg(test)]
mod tests {
    use super::{delivery_style, vehicle_style, Tone};
    use crate::models::delivery::DeliveryStatus;
    use crate::models::vehicle::VehicleStatus;

    #[test]
    fn labels_match_wire_names() {
        for status in DeliveryStatus::ALL {
            let wire = serde_json::to_value(status).unwrap();
            assert_eq!(wire, delivery_style(status).label);
        }
    }

    #[test]
    fn outcomes_have_distinct_tones() {
        assert_eq!(delivery_style(DeliveryStatus::Delivered).tone, Tone::Success);
        assert_eq!(delivery_style(DeliveryStatus::Rejected).tone, Tone::Danger);
        assert_eq!(delivery_style(DeliveryStatus::Pending).color, "#f59e0b");
        assert_eq!(
            vehicle_style(VehicleStatus::OutOfService).label,
            "Out of Service"
        );
    }
}
