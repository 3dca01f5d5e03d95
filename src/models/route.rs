use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use crate::geo::GeoPoint;
use crate::models::{lenient_bool, lenient_f64, lenient_u32, OrderId, RouteId};

pub const DRIVER_STEP_TYPE: &str = "Driver";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Step {
    /// Index in the route's sequence; assigned after fetch.
    #[serde(default)]
    pub position: usize,
    #[serde(rename = "type", default)]
    pub kind: String,
    #[serde(default)]
    pub order_id: Option<OrderId>,
    #[serde(default)]
    pub address: Option<String>,
    #[serde(rename = "currentStatus", default)]
    pub current_status: String,
    #[serde(rename = "nextStatus", default)]
    pub next_status: Option<String>,
    #[serde(rename = "bagsCollected", default, deserialize_with = "lenient_bool")]
    pub bags_collected: bool,
    #[serde(default, deserialize_with = "lenient_u32")]
    pub bag_count: Option<u32>,
    #[serde(default, deserialize_with = "lenient_u32")]
    pub barcode_count: Option<u32>,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub latitude: Option<f64>,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub longitude: Option<f64>,
}

impl Step {
    /// The marker for the driver's own position carries no action.
    pub fn is_driver_marker(&self) -> bool {
        self.kind == DRIVER_STEP_TYPE
    }

    pub fn location(&self) -> Option<GeoPoint> {
        Some(GeoPoint {
            lat: self.latitude?,
            lng: self.longitude?,
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Route {
    pub id: RouteId,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub created_at: Option<String>,
    #[serde(default, deserialize_with = "lenient_acceptance")]
    pub is_accept: Option<i64>,
    #[serde(default)]
    pub sequence: Vec<Step>,
}

impl Route {
    /// `is_accept` is null while pending and 1 once the driver accepted.
    pub fn accepted(&self) -> bool {
        self.is_accept == Some(1)
    }

    pub fn is_pending(&self) -> bool {
        self.is_accept.is_none()
    }

    pub fn assign_positions(&mut self) {
        for (position, step) in self.sequence.iter_mut().enumerate() {
            step.position = position;
        }
    }

    pub fn step(&self, position: usize) -> Option<&Step> {
        self.sequence.get(position)
    }

    pub fn step_mut(&mut self, position: usize) -> Option<&mut Step> {
        self.sequence.get_mut(position)
    }
}

fn lenient_acceptance<'de, D>(deserializer: D) -> Result<Option<i64>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(Value::Number(n)) => n.as_i64(),
        Some(Value::Bool(b)) => Some(i64::from(b)),
        Some(Value::String(s)) => s.trim().parse::<i64>().ok(),
        _ => None,
    })
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::Route;

    #[test]
    fn parses_backend_route_with_string_coordinates() {
        let mut route: Route = serde_json::from_value(json!({
            "id": 12,
            "name": "Morning loop",
            "created_at": "2025-01-05 07:00:00",
            "is_accept": null,
            "sequence": [
                { "type": "Driver", "currentStatus": "",
                  "latitude": "40.71", "longitude": "-74.00" },
                { "type": "Shop", "order_id": 3, "currentStatus": "Shop",
                  "nextStatus": "Bags Collected",
                  "bagsCollected": 0, "bag_count": null, "barcode_count": "0",
                  "latitude": 40.72, "longitude": -74.01 }
            ]
        }))
        .unwrap();
        route.assign_positions();

        assert!(route.is_pending());
        assert!(!route.accepted());
        assert!(route.sequence[0].is_driver_marker());
        assert_eq!(route.sequence[1].position, 1);
        assert!(!route.sequence[1].bags_collected);
        assert_eq!(route.sequence[1].barcode_count, Some(0));
        assert_eq!(route.sequence[0].location().unwrap().lat, 40.71);
    }

    #[test]
    fn accepted_only_when_is_accept_is_one() {
        let accepted: Route = serde_json::from_value(json!({ "id": 1, "is_accept": "1" })).unwrap();
        assert!(accepted.accepted());

        let rejected: Route = serde_json::from_value(json!({ "id": 2, "is_accept": 0 })).unwrap();
        assert!(!rejected.accepted());
        assert!(!rejected.is_pending());
    }
}
