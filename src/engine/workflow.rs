use serde::Serialize;

use crate::engine::transitions::STATUS_BAGS_COLLECTED;
use crate::error::ClientError;
use crate::models::order::{Order, OrderStatus};
use crate::models::route::Step;

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
pub struct BagCounts {
    pub bag_count: u32,
    pub barcode_count: u32,
}

impl BagCounts {
    /// Validates raw form input; both counts must be whole numbers above zero.
    pub fn parse(bags: &str, barcodes: &str) -> Result<Self, ClientError> {
        Ok(Self {
            bag_count: parse_positive("bag count", bags)?,
            barcode_count: parse_positive("barcode count", barcodes)?,
        })
    }
}

fn parse_positive(field: &str, raw: &str) -> Result<u32, ClientError> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Err(ClientError::Validation(format!("{field} is required")));
    }

    match raw.parse::<u32>() {
        Ok(0) => Err(ClientError::Validation(format!(
            "{field} must be greater than zero"
        ))),
        Ok(value) => Ok(value),
        Err(_) => Err(ClientError::Validation(format!(
            "{field} must be a whole number"
        ))),
    }
}

/// Local patch once the backend has recorded the bag collection.
pub fn apply_bag_collection(step: &mut Step, counts: BagCounts) {
    step.bags_collected = true;
    step.bag_count = Some(counts.bag_count);
    step.barcode_count = Some(counts.barcode_count);
    step.current_status = STATUS_BAGS_COLLECTED.to_string();
}

/// Local patch once the backend has accepted an upload that advances the step.
pub fn apply_confirmed_status(step: &mut Step, next_status: &str) {
    step.current_status = next_status.to_string();
}

pub fn apply_order_decision(order: &mut Order, decision: OrderStatus) {
    order.status = Some(decision);
}
