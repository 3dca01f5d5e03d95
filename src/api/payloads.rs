use serde::{Deserialize, Serialize};

use crate::models::order::{Order, ProcessedOrder};
use crate::models::profile::DriverProfile;
use crate::models::route::Route;
use crate::models::RouteId;

#[derive(Debug, Clone, Serialize)]
pub struct LoginRequest<'a> {
    pub email: &'a str,
    pub password: &'a str,
    #[serde(rename = "type")]
    pub kind: &'static str,
}

impl<'a> LoginRequest<'a> {
    pub fn driver(email: &'a str, password: &'a str) -> Self {
        Self {
            email,
            password,
            kind: "driver",
        }
    }
}

/// `{"data": {"access": {"token": "..."}}}`
#[derive(Debug, Deserialize)]
pub struct LoginResponse {
    pub data: LoginData,
}

#[derive(Debug, Deserialize)]
pub struct LoginData {
    pub access: AccessToken,
}

#[derive(Debug, Deserialize)]
pub struct AccessToken {
    pub token: String,
}

#[derive(Debug, Serialize)]
pub struct CollectBagsRequest {
    pub route_id: RouteId,
    pub bag_count: u32,
    pub barcode_count: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LocationReport {
    pub latitude: f64,
    pub longitude: f64,
    pub address: String,
}

#[derive(Debug, Deserialize)]
pub struct OrdersEnvelope {
    #[serde(default)]
    pub orders: Vec<Order>,
}

#[derive(Debug, Deserialize)]
pub struct ProcessedOrdersEnvelope {
    #[serde(default)]
    pub orders: Vec<ProcessedOrder>,
}

#[derive(Debug, Deserialize)]
pub struct RoutesEnvelope {
    #[serde(default)]
    pub routes: Vec<Route>,
}

#[derive(Debug, Deserialize)]
pub struct ProfileEnvelope {
    pub user: DriverProfile,
}
