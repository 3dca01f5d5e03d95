use tracing::{info, warn};

use crate::api::client::ApiClient;
use crate::capture::location::{LocationSnapshot, LocationTracker, PositionOptions};
use crate::engine::workflow::apply_order_decision;
use crate::error::ClientError;
use crate::models::order::{Order, OrderStatus};
use crate::models::OrderId;
use crate::screens::{Devices, ViewState};
use crate::state::Screen;

pub struct DashboardController {
    api: ApiClient,
    devices: Devices,
    orders: ViewState<Vec<Order>>,
    tracker: Option<LocationTracker>,
}

impl DashboardController {
    pub fn new(api: ApiClient, devices: Devices) -> Self {
        Self {
            api,
            devices,
            orders: ViewState::Loading,
            tracker: None,
        }
    }

    pub fn orders(&self) -> &ViewState<Vec<Order>> {
        &self.orders
    }

    pub fn location(&self) -> LocationSnapshot {
        self.tracker
            .as_ref()
            .map(LocationTracker::snapshot)
            .unwrap_or_default()
    }

    pub fn is_tracking(&self) -> bool {
        self.tracker.as_ref().is_some_and(LocationTracker::is_running)
    }

    pub async fn mount(&mut self) -> Result<(), ClientError> {
        self.api.state().require_token()?;

        self.orders = ViewState::Loading;
        match self.api.fetch_driver_orders().await {
            Ok(orders) => {
                self.orders = ViewState::from_list(orders);
                self.start_tracking();
                Ok(())
            }
            Err(err) => {
                self.orders =
                    ViewState::Failed("Failed to fetch orders. Please try again.".to_string());
                Err(err)
            }
        }
    }

    pub fn start_tracking(&mut self) {
        if self.tracker.is_none() {
            self.tracker = Some(LocationTracker::start(
                self.devices.position.as_ref(),
                self.devices.geocoder.clone(),
                PositionOptions::default(),
            ));
        }
    }

    pub async fn accept_order(&mut self, order_id: OrderId) -> Result<(), ClientError> {
        self.decide(order_id, OrderStatus::Accepted).await
    }

    pub async fn reject_order(&mut self, order_id: OrderId) -> Result<(), ClientError> {
        self.decide(order_id, OrderStatus::Rejected).await
    }

    async fn decide(
        &mut self,
        order_id: OrderId,
        decision: OrderStatus,
    ) -> Result<(), ClientError> {
        let actionable = self
            .orders
            .ready()
            .and_then(|orders| orders.iter().find(|order| order.id == order_id))
            .map(Order::is_actionable)
            .ok_or_else(|| ClientError::Validation(format!("order {order_id} is not listed")))?;
        if !actionable {
            return Err(ClientError::Validation(format!(
                "order {order_id} was already handled"
            )));
        }

        match decision {
            OrderStatus::Accepted => {
                self.api.accept_order(order_id).await?;
                self.api
                    .state()
                    .notifier
                    .success(format!("Order {order_id} accepted for pickup!"));
            }
            OrderStatus::Rejected => {
                self.api.reject_order_pickup(order_id).await?;
                self.api
                    .state()
                    .notifier
                    .warning(format!("Order {order_id} rejected!"));
            }
        }

        if let Some(order) = self
            .orders
            .ready_mut()
            .and_then(|orders| orders.iter_mut().find(|order| order.id == order_id))
        {
            apply_order_decision(order, decision);
        }
        info!(order_id, ?decision, "order decision recorded");
        Ok(())
    }

    /// Clears the session even when the backend call fails.
    pub async fn logout(&mut self) {
        let state = self.api.state().clone();
        if state.token().is_some() {
            if let Err(err) = self.api.logout().await {
                warn!(error = %err, "backend logout failed; clearing local session anyway");
            }
        }

        self.unmount();
        state.clear_token();
        state.notifier.info("Logged out successfully.");
        state.navigate(Screen::Login);
    }

    pub fn open_order_history(&self) {
        self.api.state().navigate(Screen::OrderHistory);
    }

    pub fn open_routes(&self) {
        self.api.state().navigate(Screen::DriverRoutes);
    }

    /// Stops live location tracking.
    pub fn unmount(&mut self) {
        if let Some(tracker) = self.tracker.take() {
            tracker.stop();
        }
    }
}
