use serde::{Deserialize, Serialize};

use crate::geo::haversine_km;
use crate::models::delivery::{Cluster, Pricing};
use crate::models::location::GeoPoint;

const BASE_PRICE: f64 = 50.0;
const PER_KG: f64 = 10.0;
const PER_KM: f64 = 8.0;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PriceBreakdown {
    pub base: f64,
    pub weight_charge: f64,
    pub distance_charge: f64,
    pub cluster_charge: f64,
    pub total: f64,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PriceEstimate {
    pub distance_km: f64,
    pub breakdown: PriceBreakdown,
}

impl PriceEstimate {
    pub fn to_pricing(&self) -> Pricing {
        Pricing {
            base_price: self.breakdown.base,
            weight_charge: self.breakdown.weight_charge,
            distance_charge: self.breakdown.distance_charge,
            cluster_charge: self.breakdown.cluster_charge,
            total_price: self.breakdown.total,
            distance_km: Some(self.distance_km),
        }
    }
}

pub fn cluster_surcharge(cluster: Cluster) -> f64 {
    match cluster {
        Cluster::Small => 0.0,
        Cluster::Medium => 50.0,
        Cluster::Large => 100.0,
        Cluster::ExtraLarge => 200.0,
    }
}

/// `50 + weight_kg * 10 + distance_km * 8 + surcharge(cluster)`, rounded to
/// two decimals. Negative or non-finite inputs count as zero.
pub fn compute_price(weight_kg: f64, distance_km: f64, cluster: Cluster) -> PriceBreakdown {
    let weight_charge = round2(non_negative(weight_kg) * PER_KG);
    let distance_charge = round2(non_negative(distance_km) * PER_KM);
    let cluster_charge = cluster_surcharge(cluster);

    PriceBreakdown {
        base: BASE_PRICE,
        weight_charge,
        distance_charge,
        cluster_charge,
        total: round2(BASE_PRICE + weight_charge + distance_charge + cluster_charge),
    }
}

pub fn estimate_for_route(
    pickup: &GeoPoint,
    drop: &GeoPoint,
    weight_kg: f64,
    cluster: Cluster,
) -> PriceEstimate {
    let distance_km = round2(haversine_km(pickup, drop));

    PriceEstimate {
        distance_km,
        breakdown: compute_price(weight_kg, distance_km, cluster),
    }
}

fn non_negative(value: f64) -> f64 {
    if value.is_finite() { value.max(0.0) } else { 0.0 }
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

#[cfg(test)]
mod tests {
    use super::{compute_price, estimate_for_route};
    use crate::models::delivery::Cluster;
    use crate::models::location::GeoPoint;

    #[test]
    fn medium_parcel_over_ten_km() {
        let price = compute_price(5.0, 10.0, Cluster::Medium);

        assert_eq!(price.base, 50.0);
        assert_eq!(price.weight_charge, 50.0);
        assert_eq!(price.distance_charge, 80.0);
        assert_eq!(price.cluster_charge, 50.0);
        assert_eq!(price.total, 230.0);
    }

    #[test]
    fn empty_small_parcel_costs_the_base_price() {
        assert_eq!(compute_price(0.0, 0.0, Cluster::Small).total, 50.0);
    }

    #[test]
    fn surcharge_grows_with_cluster() {
        let totals: Vec<f64> = [
            Cluster::Small,
            Cluster::Medium,
            Cluster::Large,
            Cluster::ExtraLarge,
        ]
        .into_iter()
        .map(|cluster| compute_price(1.0, 1.0, cluster).total)
        .collect();

        assert_eq!(totals, vec![68.0, 118.0, 168.0, 268.0]);
    }

    #[test]
    fn negative_inputs_do_not_discount() {
        assert_eq!(compute_price(-3.0, -7.0, Cluster::Small).total, 50.0);
        assert_eq!(compute_price(f64::NAN, 0.0, Cluster::Small).total, 50.0);
    }

    #[test]
    fn route_estimate_uses_great_circle_distance() {
        let pickup = GeoPoint { lat: 12.9, lng: 77.6 };
        let drop = GeoPoint {
            lat: 12.95,
            lng: 77.65,
        };

        let estimate = estimate_for_route(&pickup, &drop, 5.0, Cluster::Large);

        assert!(estimate.distance_km > 7.0 && estimate.distance_km < 8.0);
        assert!(estimate.breakdown.total > 200.0);
        assert_eq!(
            estimate.breakdown.distance_charge,
            (estimate.distance_km * 8.0 * 100.0).round() / 100.0
        );
    }
}
