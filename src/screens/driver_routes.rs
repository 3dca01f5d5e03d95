use std::sync::{Arc, Mutex, RwLock};

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use serde::Serialize;
use tracing::{info, warn};

use crate::api::client::ApiClient;
use crate::capture::camera::{CameraSession, CaptureTarget, CapturedPhoto, FacingMode};
use crate::capture::location::PositionOptions;
use crate::engine::transitions::{
    route_action, step_action, CaptureMode, RouteAction, StepAction, TransitionTable,
};
use crate::engine::workflow::{apply_bag_collection, apply_confirmed_status, BagCounts};
use crate::error::ClientError;
use crate::geo::{haversine_km, GeoPoint};
use crate::models::route::Route;
use crate::models::{OrderId, RouteId};
use crate::screens::{Devices, ViewState};

/// A step, or the route itself when the position is `None`.
type ActionKey = (RouteId, Option<usize>);

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StepView {
    pub position: usize,
    pub kind: String,
    pub order_id: Option<OrderId>,
    pub address: Option<String>,
    pub status: String,
    pub action: StepAction,
    pub distance_km: Option<f64>,
    pub busy: bool,
    pub has_capture: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RouteView {
    pub id: RouteId,
    pub name: String,
    pub created_at: Option<String>,
    pub total_orders: usize,
    pub pending: bool,
    pub accepted: bool,
    pub steps: Vec<StepView>,
    pub route_action: RouteAction,
}

/// The single controller for driver routes and their step workflow.
///
/// Methods take `&self` so a UI shell can fire actions from concurrent
/// tasks; a second trigger of an action that is still running is refused.
pub struct DriverRoutesController {
    api: ApiClient,
    devices: Devices,
    table: Arc<TransitionTable>,
    routes: RwLock<ViewState<Vec<Route>>>,
    in_flight: DashMap<ActionKey, &'static str>,
    captures: DashMap<(RouteId, usize), CapturedPhoto>,
    camera: Mutex<Option<CameraSession>>,
    driver_position: RwLock<Option<GeoPoint>>,
}

struct InFlight<'a> {
    map: &'a DashMap<ActionKey, &'static str>,
    key: ActionKey,
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.map.remove(&self.key);
    }
}

impl DriverRoutesController {
    pub fn new(api: ApiClient, devices: Devices, table: Arc<TransitionTable>) -> Self {
        Self {
            api,
            devices,
            table,
            routes: RwLock::new(ViewState::Loading),
            in_flight: DashMap::new(),
            captures: DashMap::new(),
            camera: Mutex::new(None),
            driver_position: RwLock::new(None),
        }
    }

    pub fn routes(&self) -> ViewState<Vec<Route>> {
        self.routes
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    pub fn set_driver_position(&self, position: Option<GeoPoint>) {
        *self
            .driver_position
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = position;
    }

    pub async fn mount(&self) -> Result<(), ClientError> {
        self.api.state().require_token()?;
        self.set_routes(ViewState::Loading);
        let fetched = self.refresh().await;
        self.locate_driver().await;
        fetched
    }

    /// One-shot fix used for the per-step distances. Failure leaves the last
    /// known position in place.
    pub async fn locate_driver(&self) {
        match self
            .devices
            .position
            .current_position(PositionOptions::default())
            .await
        {
            Ok(fix) => self.set_driver_position(Some(fix.point)),
            Err(err) => warn!(error = %err, "driver position unavailable"),
        }
    }

    /// Re-fetches every route; the list is small, so no incremental patching.
    pub async fn refresh(&self) -> Result<(), ClientError> {
        self.reload(false).await
    }

    /// Re-fetch after the backend confirmed a change. A failed fetch keeps the
    /// routes already on screen.
    async fn resync(&self) -> Result<(), ClientError> {
        self.reload(true).await
    }

    async fn reload(&self, keep_on_error: bool) -> Result<(), ClientError> {
        match self.api.fetch_driver_routes().await {
            Ok(routes) => {
                if routes.is_empty() {
                    self.api.state().notifier.info("No routes assigned.");
                }
                self.set_routes(ViewState::from_list(routes));
                self.prune_captures();
                Ok(())
            }
            Err(err) => {
                if !(keep_on_error && self.routes_ready()) {
                    self.set_routes(ViewState::Failed("Failed to fetch routes.".to_string()));
                }
                Err(err)
            }
        }
    }

    /// Drops kept captures whose step no longer asks for the action they were
    /// taken for.
    fn prune_captures(&self) {
        self.captures.retain(|&(route_id, position), photo| {
            matches!(
                self.step_action(route_id, position),
                Ok(StepAction::UploadPhoto { action, .. }) if action == photo.target.action
            )
        });
    }

    pub fn view(&self, route_id: RouteId) -> Option<RouteView> {
        let driver = *self
            .driver_position
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner());

        self.with_route(route_id, |route| {
            let accepted = route.accepted();
            let steps = route
                .sequence
                .iter()
                .map(|step| StepView {
                    position: step.position,
                    kind: step.kind.clone(),
                    order_id: step.order_id,
                    address: step.address.clone(),
                    status: step.current_status.clone(),
                    action: step_action(&self.table, accepted, step),
                    distance_km: driver
                        .zip(step.location())
                        .map(|(from, to)| haversine_km(&from, &to)),
                    busy: self
                        .in_flight
                        .contains_key(&(route.id, Some(step.position))),
                    has_capture: self.captures.contains_key(&(route.id, step.position)),
                })
                .collect();

            RouteView {
                id: route.id,
                name: route.name.clone(),
                created_at: route.created_at.clone(),
                total_orders: route.sequence.len(),
                pending: route.is_pending(),
                accepted,
                steps,
                route_action: route_action(&self.table, route),
            }
        })
        .ok()
    }

    pub fn step_action(
        &self,
        route_id: RouteId,
        position: usize,
    ) -> Result<StepAction, ClientError> {
        self.with_route(route_id, |route| {
            route
                .step(position)
                .map(|step| step_action(&self.table, route.accepted(), step))
                .ok_or_else(|| {
                    ClientError::Validation(format!("route {route_id} has no step {position}"))
                })
        })?
    }

    pub async fn accept_route(&self, route_id: RouteId) -> Result<(), ClientError> {
        self.ensure_pending(route_id)?;
        let _guard = self.begin((route_id, None), "accept_route")?;

        self.api.accept_route(route_id).await?;
        self.api.state().notifier.success("Route accepted.");
        info!(route_id, "route accepted");
        self.resync().await
    }

    pub async fn reject_route(&self, route_id: RouteId) -> Result<(), ClientError> {
        self.ensure_pending(route_id)?;
        let _guard = self.begin((route_id, None), "reject_route")?;

        self.api.reject_route(route_id).await?;
        self.api.state().notifier.warning("Route rejected.");
        info!(route_id, "route rejected");
        self.resync().await
    }

    /// Records the bag tally for the shop step. Input is validated before
    /// anything is sent; the step is patched only after the backend confirms.
    pub async fn collect_bags(
        &self,
        route_id: RouteId,
        position: usize,
        bags: &str,
        barcodes: &str,
    ) -> Result<(), ClientError> {
        if self.step_action(route_id, position)? != StepAction::CollectBags {
            return Err(ClientError::Validation(format!(
                "step {position} of route {route_id} does not collect bags"
            )));
        }

        let counts = match BagCounts::parse(bags, barcodes) {
            Ok(counts) => counts,
            Err(err) => {
                self.api
                    .state()
                    .notifier
                    .error("Please enter valid numbers for bags and stickers.");
                return Err(err);
            }
        };

        let _guard = self.begin((route_id, Some(position)), "collect_bags")?;
        self.api.collect_bags(route_id, counts).await?;

        self.patch_route(route_id, |route| {
            if let Some(step) = route.step_mut(position) {
                apply_bag_collection(step, counts);
            }
        });
        self.api.state().notifier.success("Bags collected.");
        info!(
            route_id,
            position,
            bags = counts.bag_count,
            barcodes = counts.barcode_count,
            "bags collected"
        );
        Ok(())
    }

    /// Opens the camera for a step whose action requires a capture.
    pub async fn open_camera(&self, route_id: RouteId, position: usize) -> Result<(), ClientError> {
        let target = self.upload_target(route_id, position)?;
        if !self.step_action(route_id, position)?.requires_camera() {
            return Err(ClientError::Validation(format!(
                "step {position} of route {route_id} uploads without a capture"
            )));
        }

        let session = CameraSession::open(
            self.devices.camera.clone(),
            target,
            self.api.state().notifier.clone(),
        )
        .await?;

        // Replacing a previous session drops it, which stops its stream.
        *self.camera_slot() = Some(session);
        Ok(())
    }

    pub fn camera_open(&self) -> bool {
        self.camera_slot().is_some()
    }

    pub fn camera_facing(&self) -> Option<FacingMode> {
        self.camera_slot().as_ref().map(CameraSession::facing)
    }

    pub async fn toggle_camera(&self) -> Result<(), ClientError> {
        let mut session = self
            .camera_slot()
            .take()
            .ok_or_else(|| ClientError::Capture("camera is not open".to_string()))?;

        let result = session.toggle_facing().await;
        if result.is_ok() {
            *self.camera_slot() = Some(session);
        }
        result
    }

    /// Takes the still and keeps it for the step until it is uploaded.
    pub fn capture_photo(&self) -> Result<CaptureTarget, ClientError> {
        let session = self
            .camera_slot()
            .take()
            .ok_or_else(|| ClientError::Capture("camera is not open".to_string()))?;

        let photo = session.capture()?;
        let target = photo.target.clone();
        self.captures
            .insert((target.route_id, target.position), photo);
        Ok(target)
    }

    /// Closes the camera without keeping anything.
    pub fn cancel_capture(&self) {
        if let Some(session) = self.camera_slot().take() {
            session.cancel();
        }
    }

    pub fn discard_capture(&self, route_id: RouteId, position: usize) {
        self.captures.remove(&(route_id, position));
    }

    /// Captures the open camera's still and uploads it straight away.
    pub async fn capture_and_upload(&self) -> Result<(), ClientError> {
        let target = self.capture_photo()?;
        self.upload_step(target.route_id, target.position).await
    }

    /// Sends the step's upload. Camera steps need a capture kept for the same
    /// action; direct steps attach one if it exists. On success the capture is
    /// discarded and routes are re-fetched.
    pub async fn upload_step(&self, route_id: RouteId, position: usize) -> Result<(), ClientError> {
        let target = self.upload_target(route_id, position)?;
        let capture_mode = match self.step_action(route_id, position)? {
            StepAction::UploadPhoto { capture, .. } => capture,
            _ => no_upload(route_id, position)?,
        };

        let kept = self
            .captures
            .get(&(route_id, position))
            .map(|entry| entry.value().clone());
        let photo = match kept {
            Some(photo) if photo.target.action == target.action => Some(photo),
            Some(stale) => {
                warn!(
                    route_id,
                    position,
                    taken_for = %stale.target.action,
                    action = %target.action,
                    "discarding capture taken for another action"
                );
                self.captures.remove(&(route_id, position));
                None
            }
            None => None,
        };
        if capture_mode == CaptureMode::Camera && photo.is_none() {
            return Err(ClientError::Validation(
                "capture a photo before uploading".to_string(),
            ));
        }

        let _guard = self.begin((route_id, Some(position)), "upload_photo")?;
        self.api.upload_photo(&target, photo.as_ref()).await?;

        self.captures.remove(&(route_id, position));
        self.api.state().notifier.success("Photo uploaded.");

        if self.resync().await.is_err() {
            if let Some(next) = target.next_status.as_deref() {
                warn!(
                    route_id,
                    position,
                    next,
                    "refresh failed after upload; applying confirmed status"
                );
                self.patch_route(route_id, |route| {
                    if let Some(step) = route.step_mut(position) {
                        apply_confirmed_status(step, next);
                    }
                });
            }
        }
        Ok(())
    }

    pub async fn complete_route(&self, route_id: RouteId) -> Result<(), ClientError> {
        let action = self.with_route(route_id, |route| route_action(&self.table, route))?;
        if action != (RouteAction::CompleteRoute { enabled: true }) {
            return Err(ClientError::Validation(
                "every stop must be finished before the route can be completed".to_string(),
            ));
        }

        let _guard = self.begin((route_id, None), "complete_route")?;
        self.api.complete_route(route_id).await?;
        self.api.state().notifier.success("Route completed.");
        info!(route_id, "route completed");
        self.resync().await
    }

    /// Releases the camera. Called when the screen goes away.
    pub fn unmount(&self) {
        self.cancel_capture();
        self.captures.clear();
    }

    fn begin(&self, key: ActionKey, action: &'static str) -> Result<InFlight<'_>, ClientError> {
        match self.in_flight.entry(key) {
            Entry::Occupied(running) => Err(ClientError::Validation(format!(
                "{} is already in progress",
                running.get()
            ))),
            Entry::Vacant(slot) => {
                slot.insert(action);
                Ok(InFlight {
                    map: &self.in_flight,
                    key,
                })
            }
        }
    }

    fn upload_target(
        &self,
        route_id: RouteId,
        position: usize,
    ) -> Result<CaptureTarget, ClientError> {
        let action = self.step_action(route_id, position)?;
        let (action_name, next_status) = match action {
            StepAction::UploadPhoto {
                action, next_status, ..
            } => (action, next_status),
            _ => return no_upload(route_id, position),
        };

        let order_id = self.with_route(route_id, |route| {
            route.step(position).and_then(|step| step.order_id)
        })?;

        Ok(CaptureTarget {
            route_id,
            position,
            order_id,
            action: action_name,
            next_status,
        })
    }

    fn ensure_pending(&self, route_id: RouteId) -> Result<(), ClientError> {
        if self.with_route(route_id, Route::is_pending)? {
            Ok(())
        } else {
            Err(ClientError::Validation(format!(
                "route {route_id} was already answered"
            )))
        }
    }

    fn with_route<R>(
        &self,
        route_id: RouteId,
        f: impl FnOnce(&Route) -> R,
    ) -> Result<R, ClientError> {
        let routes = self
            .routes
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        routes
            .ready()
            .and_then(|routes| routes.iter().find(|route| route.id == route_id))
            .map(f)
            .ok_or_else(|| ClientError::Validation(format!("route {route_id} is not listed")))
    }

    fn patch_route(&self, route_id: RouteId, f: impl FnOnce(&mut Route)) {
        let mut routes = self
            .routes
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if let Some(route) = routes
            .ready_mut()
            .and_then(|routes| routes.iter_mut().find(|route| route.id == route_id))
        {
            f(route);
        }
    }

    fn routes_ready(&self) -> bool {
        self.routes
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .ready()
            .is_some()
    }

    fn set_routes(&self, routes: ViewState<Vec<Route>>) {
        *self
            .routes
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = routes;
    }

    fn camera_slot(&self) -> std::sync::MutexGuard<'_, Option<CameraSession>> {
        self.camera
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl Drop for DriverRoutesController {
    fn drop(&mut self) {
        self.unmount();
    }
}

fn no_upload<T>(route_id: RouteId, position: usize) -> Result<T, ClientError> {
    Err(ClientError::Validation(format!(
        "step {position} of route {route_id} has no photo upload"
    )))
}
