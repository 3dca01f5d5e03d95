use std::sync::Arc;
use std::time::{Duration, Instant};

use reqwest::multipart::{Form, Part};
use reqwest::{Client, RequestBuilder, StatusCode};
use serde::de::DeserializeOwned;
use serde_json::{json, Value};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::api::payloads::{
    CollectBagsRequest, LocationReport, LoginRequest, LoginResponse, OrdersEnvelope,
    ProcessedOrdersEnvelope, ProfileEnvelope, RoutesEnvelope,
};
use crate::capture::camera::{CaptureTarget, CapturedPhoto};
use crate::engine::workflow::BagCounts;
use crate::error::ClientError;
use crate::models::order::{Order, ProcessedOrder};
use crate::models::profile::DriverProfile;
use crate::models::route::Route;
use crate::models::{OrderId, RouteId};
use crate::state::AppState;

/// Laravel answers an expired CSRF/session token with 419.
const SESSION_EXPIRED: u16 = 419;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    Login,
    Logout,
    FetchDriverOrders,
    FetchProcessedOrders,
    AcceptOrder,
    RejectOrder,
    FetchDriverRoutes,
    AcceptRoute,
    RejectRoute,
    UploadPhoto,
    CollectBags,
    CompleteRoute,
    ReportLocation,
    FetchProfile,
}

impl Operation {
    pub fn name(self) -> &'static str {
        match self {
            Operation::Login => "login",
            Operation::Logout => "logout",
            Operation::FetchDriverOrders => "fetch_driver_orders",
            Operation::FetchProcessedOrders => "fetch_processed_orders",
            Operation::AcceptOrder => "accept_order",
            Operation::RejectOrder => "reject_order",
            Operation::FetchDriverRoutes => "fetch_driver_routes",
            Operation::AcceptRoute => "accept_route",
            Operation::RejectRoute => "reject_route",
            Operation::UploadPhoto => "upload_photo",
            Operation::CollectBags => "collect_bags",
            Operation::CompleteRoute => "complete_route",
            Operation::ReportLocation => "report_location",
            Operation::FetchProfile => "fetch_profile",
        }
    }

    fn describe(self) -> &'static str {
        match self {
            Operation::Login => "log in",
            Operation::Logout => "log out",
            Operation::FetchDriverOrders => "fetch orders",
            Operation::FetchProcessedOrders => "fetch order history",
            Operation::AcceptOrder => "accept the order",
            Operation::RejectOrder => "reject the order",
            Operation::FetchDriverRoutes => "fetch routes",
            Operation::AcceptRoute => "accept the route",
            Operation::RejectRoute => "reject the route",
            Operation::UploadPhoto => "upload the photo",
            Operation::CollectBags => "record collected bags",
            Operation::CompleteRoute => "complete the route",
            Operation::ReportLocation => "report your location",
            Operation::FetchProfile => "load your profile",
        }
    }

    /// Login runs without a token; a 401 there means bad credentials.
    fn is_authenticated(self) -> bool {
        self != Operation::Login
    }
}

/// Facade over the driver backend. One method per backend operation.
#[derive(Clone)]
pub struct ApiClient {
    http: Client,
    base_url: String,
    state: Arc<AppState>,
}

impl ApiClient {
    pub fn new(
        base_url: impl Into<String>,
        timeout: Duration,
        state: Arc<AppState>,
    ) -> Result<Self, ClientError> {
        let http = Client::builder().timeout(timeout).build()?;
        Ok(Self::with_http(http, base_url, state))
    }

    fn with_http(http: Client, base_url: impl Into<String>, state: Arc<AppState>) -> Self {
        Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            state,
        }
    }

    pub fn state(&self) -> &Arc<AppState> {
        &self.state
    }

    pub fn http(&self) -> &Client {
        &self.http
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// Returns the access token; storing it is up to the caller.
    pub async fn login(&self, email: &str, password: &str) -> Result<String, ClientError> {
        let request = self
            .http
            .post(self.url("/driver/login"))
            .json(&LoginRequest::driver(email, password));

        let payload = self.execute(Operation::Login, request).await?;
        let response: LoginResponse = decode(Operation::Login, payload)?;
        info!("driver logged in");
        Ok(response.data.access.token)
    }

    pub async fn logout(&self) -> Result<Value, ClientError> {
        let request = self.authorized(self.http.get(self.url("/driver/logout")))?;
        self.execute(Operation::Logout, request).await
    }

    pub async fn fetch_driver_orders(&self) -> Result<Vec<Order>, ClientError> {
        let request = self.authorized(self.http.get(self.url("/driver/orders")))?;
        let payload = self.execute(Operation::FetchDriverOrders, request).await?;
        let envelope: OrdersEnvelope = decode(Operation::FetchDriverOrders, payload)?;
        debug!(count = envelope.orders.len(), "driver orders fetched");
        Ok(envelope.orders)
    }

    pub async fn fetch_processed_orders(&self) -> Result<Vec<ProcessedOrder>, ClientError> {
        let request = self.authorized(self.http.get(self.url("/driver/orders/processed")))?;
        let payload = self.execute(Operation::FetchProcessedOrders, request).await?;
        let envelope: ProcessedOrdersEnvelope = decode(Operation::FetchProcessedOrders, payload)?;
        Ok(envelope.orders)
    }

    pub async fn accept_order(&self, order_id: OrderId) -> Result<Value, ClientError> {
        let request = self.authorized(
            self.http
                .post(self.url(&format!("/driver/orders/{order_id}/accept")))
                .json(&json!({})),
        )?;
        self.execute(Operation::AcceptOrder, request).await
    }

    pub async fn reject_order_pickup(&self, order_id: OrderId) -> Result<Value, ClientError> {
        let request = self.authorized(
            self.http
                .post(self.url(&format!("/driver/orders/{order_id}/reject")))
                .json(&json!({})),
        )?;
        self.execute(Operation::RejectOrder, request).await
    }

    pub async fn fetch_driver_routes(&self) -> Result<Vec<Route>, ClientError> {
        let request = self.authorized(self.http.get(self.url("/driver/routes")))?;
        let payload = self.execute(Operation::FetchDriverRoutes, request).await?;
        let envelope: RoutesEnvelope = decode(Operation::FetchDriverRoutes, payload)?;

        let mut routes = envelope.routes;
        for route in &mut routes {
            route.assign_positions();
        }
        debug!(count = routes.len(), "driver routes fetched");
        Ok(routes)
    }

    pub async fn accept_route(&self, route_id: RouteId) -> Result<Value, ClientError> {
        let request = self.authorized(
            self.http
                .post(self.url(&format!("/driver/routes/{route_id}/accept")))
                .json(&json!({})),
        )?;
        self.execute(Operation::AcceptRoute, request).await
    }

    pub async fn reject_route(&self, route_id: RouteId) -> Result<Value, ClientError> {
        let request = self.authorized(
            self.http
                .post(self.url(&format!("/driver/routes/{route_id}/reject")))
                .json(&json!({})),
        )?;
        self.execute(Operation::RejectRoute, request).await
    }

    /// Advances a step. The photo part is omitted for direct transitions
    /// that carry no capture.
    pub async fn upload_photo(
        &self,
        target: &CaptureTarget,
        photo: Option<&CapturedPhoto>,
    ) -> Result<Value, ClientError> {
        let token = self.state.require_token()?;

        let mut form = Form::new()
            .text("route_id", target.route_id.to_string())
            .text("action", target.action.clone());
        if let Some(order_id) = target.order_id {
            form = form.text("order_id", order_id.to_string());
        }
        if let Some(photo) = photo {
            let part = Part::bytes(photo.bytes.clone())
                .file_name(photo.file_name)
                .mime_str(photo.mime)?;
            form = form.part("photo", part);
        }

        let request = self
            .http
            .post(self.url("/driver/routes/upload-photo"))
            .bearer_auth(token)
            .multipart(form);

        info!(
            route_id = target.route_id,
            position = target.position,
            action = %target.action,
            photo_id = ?photo.map(|photo| photo.id),
            "uploading step transition"
        );
        self.execute(Operation::UploadPhoto, request).await
    }

    pub async fn collect_bags(
        &self,
        route_id: RouteId,
        counts: BagCounts,
    ) -> Result<Value, ClientError> {
        let body = CollectBagsRequest {
            route_id,
            bag_count: counts.bag_count,
            barcode_count: counts.barcode_count,
        };
        let request = self.authorized(
            self.http
                .post(self.url("/driver/routes/collect-bags"))
                .json(&body),
        )?;
        self.execute(Operation::CollectBags, request).await
    }

    pub async fn complete_route(&self, route_id: RouteId) -> Result<Value, ClientError> {
        let request = self.authorized(
            self.http
                .post(self.url(&format!("/driver/routes/{route_id}/complete")))
                .json(&json!({})),
        )?;
        self.execute(Operation::CompleteRoute, request).await
    }

    pub async fn report_location(&self, report: &LocationReport) -> Result<Value, ClientError> {
        let request =
            self.authorized(self.http.post(self.url("/driver/location")).json(report))?;
        self.execute(Operation::ReportLocation, request).await
    }

    pub async fn fetch_profile(&self) -> Result<DriverProfile, ClientError> {
        let request = self.authorized(self.http.get(self.url("/user/profile")))?;
        let payload = self.execute(Operation::FetchProfile, request).await?;
        let envelope: ProfileEnvelope = decode(Operation::FetchProfile, payload)?;
        Ok(envelope.user)
    }

    fn authorized(&self, request: RequestBuilder) -> Result<RequestBuilder, ClientError> {
        let token = self.state.require_token()?;
        Ok(request.bearer_auth(token))
    }

    async fn execute(&self, op: Operation, request: RequestBuilder) -> Result<Value, ClientError> {
        let request_id = Uuid::new_v4();
        let start = Instant::now();

        let result = self
            .dispatch(op, request.header("x-request-id", request_id.to_string()))
            .await;

        let outcome = match &result {
            Ok(_) => "success",
            Err(ClientError::SessionExpired) => "session_expired",
            Err(ClientError::Rejected { .. }) => "rejected",
            Err(_) => "error",
        };
        self.state
            .metrics
            .record_call(op.name(), outcome, start.elapsed().as_secs_f64());

        if let Err(err) = &result {
            warn!(operation = op.name(), %request_id, error = %err, "backend call failed");
            self.surface(op, err);
        }

        result
    }

    async fn dispatch(&self, op: Operation, request: RequestBuilder) -> Result<Value, ClientError> {
        let response = request.send().await?;
        let status = response.status();

        if op.is_authenticated()
            && (status == StatusCode::UNAUTHORIZED || status.as_u16() == SESSION_EXPIRED)
        {
            self.state.expire_session();
            return Err(ClientError::SessionExpired);
        }

        let body = response.bytes().await?;
        let payload: Option<Value> = if body.is_empty() {
            Some(Value::Null)
        } else {
            serde_json::from_slice(&body).ok()
        };

        if !status.is_success() {
            let message = payload
                .as_ref()
                .and_then(server_message)
                .unwrap_or_else(|| {
                    status
                        .canonical_reason()
                        .unwrap_or("request failed")
                        .to_string()
                });
            return Err(ClientError::Rejected {
                status: status.as_u16(),
                message,
            });
        }

        let payload = payload.ok_or_else(|| {
            ClientError::Decode(format!("{} returned a non-JSON body", op.name()))
        })?;

        if reports_failure(&payload) {
            return Err(ClientError::Rejected {
                status: status.as_u16(),
                message: server_message(&payload).unwrap_or_else(|| "request failed".to_string()),
            });
        }

        Ok(payload)
    }

    fn surface(&self, op: Operation, err: &ClientError) {
        let notifier = &self.state.notifier;
        match (op, err) {
            // Already surfaced by the session gate / expiry path.
            (_, ClientError::SessionExpired | ClientError::MissingToken) => {}
            (Operation::Login, ClientError::Rejected { message, .. }) if !message.is_empty() => {
                notifier.error(message.clone())
            }
            (Operation::Login, _) => notifier.error("Login failed. Please try again."),
            (_, ClientError::Rejected { message, .. }) if !message.is_empty() => {
                notifier.error(format!("Failed to {}: {message}", op.describe()))
            }
            _ => notifier.error(format!("Failed to {}. Please try again.", op.describe())),
        }
    }
}

fn server_message(payload: &Value) -> Option<String> {
    payload
        .get("message")
        .or_else(|| payload.get("error"))
        .and_then(Value::as_str)
        .map(str::to_string)
}

/// Some endpoints answer 200 with `"success": false` or `"status": false`.
fn reports_failure(payload: &Value) -> bool {
    ["success", "status"]
        .iter()
        .any(|key| matches!(payload.get(key), Some(Value::Bool(false))))
}

fn decode<T: DeserializeOwned>(op: Operation, payload: Value) -> Result<T, ClientError> {
    serde_json::from_value(payload)
        .map_err(|err| ClientError::Decode(format!("{}: {err}", op.name())))
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::{reports_failure, server_message, Operation};

    #[test]
    fn detects_failure_flags_in_successful_responses() {
        assert!(reports_failure(&json!({ "success": false, "message": "Route locked" })));
        assert!(reports_failure(&json!({ "status": false })));
        assert!(!reports_failure(&json!({ "success": true })));
        assert!(!reports_failure(&json!({ "status": "ok" })));
        assert!(!reports_failure(&json!(null)));
    }

    #[test]
    fn extracts_server_message() {
        assert_eq!(
            server_message(&json!({ "message": "Invalid credentials" })).as_deref(),
            Some("Invalid credentials")
        );
        assert_eq!(
            server_message(&json!({ "error": "boom" })).as_deref(),
            Some("boom")
        );
        assert!(server_message(&json!({ "orders": [] })).is_none());
    }

    #[test]
    fn only_login_runs_unauthenticated() {
        assert!(!Operation::Login.is_authenticated());
        assert!(Operation::UploadPhoto.is_authenticated());
        assert_eq!(Operation::CollectBags.name(), "collect_bags");
    }
}
