//! Data-driven status-transition table for route steps.
//!
//! Every decision about what a step offers (no control, a confirmation text,
//! bag collection, or a photo upload with or without a camera capture) is a
//! lookup in [`TransitionTable`]. Supporting a new backend status is a table
//! edit, either in [`TransitionTable::default`] or in a JSON table loaded at
//! startup.

use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::AppError;
use crate::models::route::{Route, Step};

pub const STATUS_SHOP: &str = "Shop";
pub const STATUS_BAGS_COLLECTED: &str = "Bags Collected";
pub const STATUS_DELIVERED: &str = "Delivered";
pub const STATUS_DROPPED_IN_SHOP: &str = "Dropped in Shop";
pub const STATUS_END_OF_ROUTE: &str = "End of Route";

/// Bags are collected at the first stop after the driver marker.
pub const BAG_COLLECTION_POSITION: usize = 1;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum CaptureMode {
    /// Open the device camera and upload the captured still.
    Camera,
    /// Upload straight away with whatever capture state exists.
    Direct,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ButtonStyle {
    #[default]
    Primary,
    Success,
    Warning,
    Danger,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TransitionRule {
    pub label: String,
    #[serde(default)]
    pub style: ButtonStyle,
    pub capture: CaptureMode,
    /// Action name sent with the photo upload.
    pub action: String,
    /// Status the backend moves the step to once the upload is accepted.
    #[serde(default)]
    pub next_status: Option<String>,
}

impl TransitionRule {
    fn new(
        label: &str,
        style: ButtonStyle,
        capture: CaptureMode,
        action: &str,
        next_status: Option<&str>,
    ) -> Self {
        Self {
            label: label.to_string(),
            style,
            capture,
            action: action.to_string(),
            next_status: next_status.map(str::to_string),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TransitionTable {
    /// Terminal status -> fixed confirmation text.
    pub terminal: BTreeMap<String, String>,
    /// Non-terminal status -> upload control.
    pub rules: BTreeMap<String, TransitionRule>,
    /// Spelling variants seen from the backend -> canonical status.
    #[serde(default)]
    pub aliases: BTreeMap<String, String>,
    /// Statuses that count as done when deciding whether a route may be
    /// completed, in addition to the terminal ones.
    #[serde(default)]
    pub completion: BTreeSet<String>,
}

impl Default for TransitionTable {
    fn default() -> Self {
        use ButtonStyle::{Primary, Success, Warning};
        use CaptureMode::{Camera, Direct};

        let terminal = BTreeMap::from([
            (STATUS_DELIVERED.to_string(), "Order Delivered".to_string()),
            (
                STATUS_DROPPED_IN_SHOP.to_string(),
                "Dropped in Shop".to_string(),
            ),
        ]);

        let start_pickup = TransitionRule::new(
            "Start Pickup",
            Primary,
            Direct,
            "driver_en_route_pickup",
            Some("Driver En Route for Pickup"),
        );

        let rules = BTreeMap::from([
            ("Order Placed".to_string(), start_pickup.clone()),
            ("Pickup Scheduled".to_string(), start_pickup),
            (
                "Driver En Route for Pickup".to_string(),
                TransitionRule::new(
                    "Confirm Pickup",
                    Success,
                    Camera,
                    "picked_up",
                    Some("Picked Up"),
                ),
            ),
            (
                "Picked Up".to_string(),
                TransitionRule::new(
                    "Drop in Shop",
                    Warning,
                    Camera,
                    "dropped_in_shop",
                    Some(STATUS_DROPPED_IN_SHOP),
                ),
            ),
            (
                STATUS_SHOP.to_string(),
                TransitionRule::new("Shop Arrival Photo", Primary, Camera, "shop_arrival", None),
            ),
            (
                STATUS_BAGS_COLLECTED.to_string(),
                TransitionRule::new("Upload Bag Photo", Primary, Camera, "bags_photo", None),
            ),
            (
                "Ready for Delivery".to_string(),
                TransitionRule::new(
                    "Start Delivery",
                    Primary,
                    Direct,
                    "driver_en_route_delivery",
                    Some("Driver En Route for Delivery"),
                ),
            ),
            (
                "Driver En Route for Delivery".to_string(),
                TransitionRule::new(
                    "Confirm Delivery",
                    Success,
                    Camera,
                    "delivered",
                    Some(STATUS_DELIVERED),
                ),
            ),
        ]);

        let aliases = BTreeMap::from([(
            "Drop in Shop".to_string(),
            STATUS_DROPPED_IN_SHOP.to_string(),
        )]);

        let completion = BTreeSet::from([
            STATUS_BAGS_COLLECTED.to_string(),
            STATUS_END_OF_ROUTE.to_string(),
        ]);

        Self {
            terminal,
            rules,
            aliases,
            completion,
        }
    }
}

impl TransitionTable {
    pub fn from_json_str(raw: &str) -> Result<Self, AppError> {
        serde_json::from_str(raw)
            .map_err(|err| AppError::Config(format!("invalid transition table: {err}")))
    }

    pub fn load(path: &Path) -> Result<Self, AppError> {
        let raw = fs::read_to_string(path).map_err(|err| {
            AppError::Config(format!(
                "cannot read transition table {}: {err}",
                path.display()
            ))
        })?;
        Self::from_json_str(&raw)
    }

    pub fn load_or_default(path: Option<&Path>) -> Result<Self, AppError> {
        match path {
            Some(path) => Self::load(path),
            None => Ok(Self::default()),
        }
    }

    pub fn normalize<'a>(&'a self, status: &'a str) -> &'a str {
        let trimmed = status.trim();
        self.aliases
            .get(trimmed)
            .map(String::as_str)
            .unwrap_or(trimmed)
    }

    pub fn is_terminal(&self, status: &str) -> bool {
        self.terminal.contains_key(self.normalize(status))
    }

    pub fn confirmation(&self, status: &str) -> Option<&str> {
        self.terminal.get(self.normalize(status)).map(String::as_str)
    }

    pub fn rule(&self, status: &str) -> Option<&TransitionRule> {
        self.rules.get(self.normalize(status))
    }

    pub fn counts_as_done(&self, status: &str) -> bool {
        let status = self.normalize(status);
        self.terminal.contains_key(status) || self.completion.contains(status)
    }
}

/// What a step renders.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StepAction {
    None,
    Confirmation {
        label: String,
    },
    CollectBags,
    UploadPhoto {
        label: String,
        style: ButtonStyle,
        capture: CaptureMode,
        action: String,
        next_status: Option<String>,
    },
}

impl StepAction {
    pub fn has_control(&self) -> bool {
        matches!(self, StepAction::CollectBags | StepAction::UploadPhoto { .. })
    }

    pub fn label(&self) -> Option<&str> {
        match self {
            StepAction::None => None,
            StepAction::Confirmation { label } | StepAction::UploadPhoto { label, .. } => {
                Some(label)
            }
            StepAction::CollectBags => Some("Collect Bags"),
        }
    }

    pub fn requires_camera(&self) -> bool {
        matches!(
            self,
            StepAction::UploadPhoto {
                capture: CaptureMode::Camera,
                ..
            }
        )
    }
}

pub fn step_action(table: &TransitionTable, route_accepted: bool, step: &Step) -> StepAction {
    if !route_accepted || step.is_driver_marker() {
        return StepAction::None;
    }

    let status = table.normalize(&step.current_status);
    if status.is_empty() {
        return StepAction::None;
    }

    if let Some(label) = table.confirmation(status) {
        return StepAction::Confirmation {
            label: label.to_string(),
        };
    }

    if status == STATUS_SHOP && step.position == BAG_COLLECTION_POSITION && !step.bags_collected {
        return StepAction::CollectBags;
    }

    match table.rule(status) {
        Some(rule) => StepAction::UploadPhoto {
            label: rule.label.clone(),
            style: rule.style,
            capture: rule.capture,
            action: rule.action.clone(),
            next_status: rule.next_status.clone(),
        },
        None => StepAction::UploadPhoto {
            label: "Upload Photo".to_string(),
            style: ButtonStyle::Primary,
            capture: CaptureMode::Camera,
            action: status.to_string(),
            next_status: None,
        },
    }
}

/// Route-level control shown once a step points at the end of the route.
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RouteAction {
    None,
    CompleteRoute { enabled: bool },
}

pub fn route_action(table: &TransitionTable, route: &Route) -> RouteAction {
    if !route.accepted() {
        return RouteAction::None;
    }

    let reaches_end = route.sequence.iter().any(|step| {
        step.next_status
            .as_deref()
            .is_some_and(|next| table.normalize(next) == STATUS_END_OF_ROUTE)
    });

    if !reaches_end {
        return RouteAction::None;
    }

    RouteAction::CompleteRoute {
        enabled: route_completable(table, route),
    }
}

/// Every non-driver step has reached a terminal or neutral status.
pub fn route_completable(table: &TransitionTable, route: &Route) -> bool {
    route
        .sequence
        .iter()
        .filter(|step| !step.is_driver_marker())
        .all(|step| table.counts_as_done(&step.current_status))
}

#[cfg(test)]
mod tests {
    use super::{
        route_action, step_action, CaptureMode, RouteAction, StepAction, TransitionTable,
        STATUS_DELIVERED,
    };
    use crate::models::route::{Route, Step};

    fn step(position: usize, kind: &str, status: &str) -> Step {
        Step {
            position,
            kind: kind.to_string(),
            order_id: Some(40 + position as u64),
            address: Some(format!("{position} Rinse Rd")),
            current_status: status.to_string(),
            next_status: None,
            bags_collected: false,
            bag_count: None,
            barcode_count: None,
            latitude: None,
            longitude: None,
        }
    }

    fn route(accepted: bool, sequence: Vec<Step>) -> Route {
        Route {
            id: 9,
            name: "Afternoon".to_string(),
            created_at: None,
            is_accept: accepted.then_some(1),
            sequence,
        }
    }

    const ALL_STATUSES: &[&str] = &[
        "Order Placed",
        "Pickup Scheduled",
        "Driver En Route for Pickup",
        "Picked Up",
        "Shop",
        "Bags Collected",
        "Ready for Delivery",
        "Driver En Route for Delivery",
        "Delivered",
        "Dropped in Shop",
        "Drop in Shop",
        "Something New",
    ];

    #[test]
    fn nothing_is_offered_on_unaccepted_routes() {
        let table = TransitionTable::default();
        for (position, status) in ALL_STATUSES.iter().enumerate() {
            let s = step(position, "Order Placed", status);
            assert_eq!(step_action(&table, false, &s), StepAction::None, "{status}");
        }
    }

    #[test]
    fn driver_marker_never_gets_a_control() {
        let table = TransitionTable::default();
        let marker = step(0, "Driver", "Order Placed");
        assert_eq!(step_action(&table, true, &marker), StepAction::None);
    }

    #[test]
    fn terminal_statuses_render_confirmation_only() {
        let table = TransitionTable::default();
        for status in ["Delivered", "Dropped in Shop", "Drop in Shop"] {
            let action = step_action(&table, true, &step(2, "Ready for Delivery", status));
            assert!(matches!(action, StepAction::Confirmation { .. }), "{status}");
            assert!(!action.has_control());
        }
    }

    #[test]
    fn shop_at_second_step_asks_for_bag_collection() {
        let table = TransitionTable::default();
        let shop = step(1, "Shop", "Shop");
        assert_eq!(step_action(&table, true, &shop), StepAction::CollectBags);

        let mut collected = shop.clone();
        collected.bags_collected = true;
        assert!(matches!(
            step_action(&table, true, &collected),
            StepAction::UploadPhoto { .. }
        ));

        let later_shop = step(3, "Shop", "Shop");
        assert!(matches!(
            step_action(&table, true, &later_shop),
            StepAction::UploadPhoto { .. }
        ));
    }

    #[test]
    fn capture_mode_comes_from_the_table() {
        let table = TransitionTable::default();

        let pickup = step_action(
            &table,
            true,
            &step(2, "Order Placed", "Driver En Route for Pickup"),
        );
        assert!(pickup.requires_camera());
        assert_eq!(pickup.label(), Some("Confirm Pickup"));

        let start = step_action(&table, true, &step(2, "Order Placed", "Order Placed"));
        assert!(!start.requires_camera());
        match start {
            StepAction::UploadPhoto {
                capture, next_status, ..
            } => {
                assert_eq!(capture, CaptureMode::Direct);
                assert_eq!(next_status.as_deref(), Some("Driver En Route for Pickup"));
            }
            other => panic!("unexpected action {other:?}"),
        }
    }

    #[test]
    fn unknown_status_falls_back_to_generic_upload() {
        let table = TransitionTable::default();
        let action = step_action(&table, true, &step(2, "Order Placed", "Something New"));
        assert_eq!(
            action,
            StepAction::UploadPhoto {
                label: "Upload Photo".to_string(),
                style: super::ButtonStyle::Primary,
                capture: CaptureMode::Camera,
                action: "Something New".to_string(),
                next_status: None,
            }
        );
    }

    #[test]
    fn complete_route_gated_on_every_step_done() {
        let table = TransitionTable::default();
        let mut last = step(2, "Ready for Delivery", "Driver En Route for Delivery");
        last.next_status = Some("End of Route".to_string());

        let mut shop = step(1, "Shop", "Bags Collected");
        shop.bags_collected = true;

        let mut r = route(true, vec![step(0, "Driver", ""), shop, last]);
        assert_eq!(
            route_action(&table, &r),
            RouteAction::CompleteRoute { enabled: false }
        );

        r.sequence[2].current_status = STATUS_DELIVERED.to_string();
        assert_eq!(
            route_action(&table, &r),
            RouteAction::CompleteRoute { enabled: true }
        );

        r.is_accept = None;
        assert_eq!(route_action(&table, &r), RouteAction::None);
    }

    #[test]
    fn table_loads_from_json() {
        let table = TransitionTable::from_json_str(
            r#"{
                "terminal": { "Returned": "Returned to Customer" },
                "rules": {
                    "Washing": { "label": "Wash Done", "capture": "direct", "action": "washed" }
                }
            }"#,
        )
        .unwrap();

        assert!(table.is_terminal("Returned"));
        let rule = table.rule("Washing").unwrap();
        assert_eq!(rule.capture, CaptureMode::Direct);
        assert!(rule.next_status.is_none());
        assert!(TransitionTable::from_json_str("{").is_err());
    }
}
