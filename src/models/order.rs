use std::collections::HashMap;

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::OrderId;

pub const PICKUP_SCHEDULED: &str = "Pickup Scheduled";
pub const DELIVERY_SCHEDULED: &str = "Delivery Scheduled";

/// Local acceptance marker the dashboard sets after the backend confirms.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum OrderStatus {
    Accepted,
    Rejected,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Order {
    pub id: OrderId,
    #[serde(default)]
    pub address: Option<String>,
    #[serde(default)]
    pub pick_date: Option<String>,
    #[serde(default)]
    pub pick_hour: Option<String>,
    #[serde(default)]
    pub delivery_date: Option<String>,
    #[serde(default)]
    pub delivery_hour: Option<String>,
    #[serde(default)]
    pub order_status: Option<String>,
    #[serde(default)]
    pub assign_for: Option<String>,
    #[serde(default, deserialize_with = "lenient_order_status")]
    pub status: Option<OrderStatus>,
    #[serde(default)]
    pub created_at: Option<String>,
    #[serde(default)]
    pub updated_at: Option<String>,
}

impl Order {
    /// Accept and reject are offered until one of them has been confirmed.
    pub fn is_actionable(&self) -> bool {
        self.status.is_none()
    }
}

fn lenient_order_status<'de, D>(deserializer: D) -> Result<Option<OrderStatus>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let raw = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(match raw.as_ref().and_then(|v| v.as_str()) {
        Some("Accepted") => Some(OrderStatus::Accepted),
        Some("Rejected") => Some(OrderStatus::Rejected),
        _ => None,
    })
}

/// One row of the processed-orders feed: a single status change of an order.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ProcessedOrder {
    pub order_id: OrderId,
    #[serde(default)]
    pub order_code: Option<String>,
    #[serde(default)]
    pub address: Option<String>,
    #[serde(default)]
    pub order_status: Option<String>,
    #[serde(default)]
    pub assign_for: Option<String>,
    #[serde(default)]
    pub pick_date: Option<String>,
    #[serde(default)]
    pub pick_hour: Option<String>,
    #[serde(default)]
    pub delivery_date: Option<String>,
    #[serde(default)]
    pub delivery_hour: Option<String>,
    #[serde(default)]
    pub updated_at: Option<String>,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct StatusRecord {
    pub order_status: Option<String>,
    pub assign_for: Option<String>,
    pub updated_at: Option<String>,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct OrderHistoryEntry {
    pub order_id: OrderId,
    pub order_code: Option<String>,
    pub address: Option<String>,
    pub pick_date: Option<String>,
    pub pick_hour: Option<String>,
    pub delivery_date: Option<String>,
    pub delivery_hour: Option<String>,
    pub statuses: Vec<StatusRecord>,
}

impl OrderHistoryEntry {
    pub fn pickup_window(&self) -> Option<(&str, &str)> {
        Some((self.pick_date.as_deref()?, self.pick_hour.as_deref()?))
    }

    pub fn delivery_window(&self) -> Option<(&str, &str)> {
        Some((self.delivery_date.as_deref()?, self.delivery_hour.as_deref()?))
    }
}

/// Groups history rows per order, keeping first-seen order. The pickup window
/// comes from the "Pickup Scheduled" row and the delivery window from the
/// "Delivery Scheduled" row.
pub fn group_history(rows: Vec<ProcessedOrder>) -> Vec<OrderHistoryEntry> {
    let mut index: HashMap<OrderId, usize> = HashMap::new();
    let mut entries: Vec<OrderHistoryEntry> = Vec::new();

    for row in rows {
        let slot = *index.entry(row.order_id).or_insert_with(|| {
            entries.push(OrderHistoryEntry {
                order_id: row.order_id,
                order_code: row.order_code.clone(),
                address: row.address.clone(),
                pick_date: None,
                pick_hour: None,
                delivery_date: None,
                delivery_hour: None,
                statuses: Vec::new(),
            });
            entries.len() - 1
        });
        let entry = &mut entries[slot];

        match row.order_status.as_deref() {
            Some(PICKUP_SCHEDULED) => {
                entry.pick_date = row.pick_date;
                entry.pick_hour = row.pick_hour;
            }
            Some(DELIVERY_SCHEDULED) => {
                entry.delivery_date = row.delivery_date;
                entry.delivery_hour = row.delivery_hour;
            }
            _ => {}
        }

        entry.statuses.push(StatusRecord {
            order_status: row.order_status,
            assign_for: row.assign_for,
            updated_at: row.updated_at,
        });
    }

    entries
}

/// Parses the backend's timestamps: RFC 3339 or "YYYY-MM-DD HH:MM:SS" (UTC).
pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if let Ok(parsed) = DateTime::parse_from_rfc3339(raw) {
        return Some(parsed.with_timezone(&Utc));
    }

    ["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M"]
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(raw, format).ok())
        .map(|naive| naive.and_utc())
}

/// Medium date with short time, e.g. "Jan 5, 2025, 3:04 PM"; "N/A" when absent
/// or unparseable.
pub fn format_timestamp(raw: Option<&str>) -> String {
    raw.and_then(parse_timestamp)
        .map(|ts| ts.format("%b %-d, %Y, %-I:%M %p").to_string())
        .unwrap_or_else(|| "N/A".to_string())
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::{format_timestamp, group_history, Order, OrderStatus, ProcessedOrder};

    fn row(order_id: u64, status: &str, updated_at: &str) -> ProcessedOrder {
        serde_json::from_value(json!({
            "order_id": order_id,
            "order_code": format!("LD-{order_id}"),
            "address": "12 Wash Lane",
            "order_status": status,
            "assign_for": status,
            "pick_date": "2025-01-05",
            "pick_hour": "09:00-11:00",
            "delivery_date": "2025-01-07",
            "delivery_hour": "14:00-16:00",
            "updated_at": updated_at,
        }))
        .unwrap()
    }

    #[test]
    fn groups_rows_per_order_and_picks_windows_from_scheduled_rows() {
        let rows = vec![
            row(1, "Pickup Scheduled", "2025-01-04 10:00:00"),
            row(2, "Order Placed", "2025-01-04 11:00:00"),
            row(1, "Picked Up", "2025-01-05 09:30:00"),
            row(1, "Delivery Scheduled", "2025-01-06 08:00:00"),
        ];

        let grouped = group_history(rows);
        assert_eq!(grouped.len(), 2);

        let first = &grouped[0];
        assert_eq!(first.order_id, 1);
        assert_eq!(first.statuses.len(), 3);
        assert_eq!(first.pickup_window(), Some(("2025-01-05", "09:00-11:00")));
        assert_eq!(first.delivery_window(), Some(("2025-01-07", "14:00-16:00")));

        let second = &grouped[1];
        assert_eq!(second.order_id, 2);
        assert!(second.pickup_window().is_none());
        assert!(second.delivery_window().is_none());
    }

    #[test]
    fn formats_timestamps_medium_date_short_time() {
        assert_eq!(
            format_timestamp(Some("2025-01-05 15:04:00")),
            "Jan 5, 2025, 3:04 PM"
        );
        assert_eq!(
            format_timestamp(Some("2025-11-20T08:30:00Z")),
            "Nov 20, 2025, 8:30 AM"
        );
        assert_eq!(format_timestamp(None), "N/A");
        assert_eq!(format_timestamp(Some("yesterday")), "N/A");
    }

    #[test]
    fn order_status_is_only_recognized_for_local_markers() {
        let pending: Order = serde_json::from_value(json!({
            "id": 4, "address": "1 Main St", "status": "Pickup Scheduled"
        }))
        .unwrap();
        assert!(pending.is_actionable());

        let accepted: Order =
            serde_json::from_value(json!({ "id": 5, "status": "Accepted" })).unwrap();
        assert_eq!(accepted.status, Some(OrderStatus::Accepted));
        assert!(!accepted.is_actionable());
    }
}
