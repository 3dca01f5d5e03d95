use std::sync::Arc;

use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::api::client::ApiClient;
use crate::api::payloads::LocationReport;
use crate::capture::location::{PositionOptions, PositionSource};
use crate::error::ClientError;
use crate::geo::{address_or_unavailable, Geocoder};
use crate::screens::Devices;
use crate::state::Screen;

pub struct LoginController {
    api: ApiClient,
    devices: Devices,
    loading: bool,
    error: Option<String>,
    location_report: Option<JoinHandle<()>>,
}

impl LoginController {
    pub fn new(api: ApiClient, devices: Devices) -> Self {
        Self {
            api,
            devices,
            loading: false,
            error: None,
            location_report: None,
        }
    }

    pub fn is_loading(&self) -> bool {
        self.loading
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    pub fn button_label(&self) -> &'static str {
        if self.loading { "Logging in..." } else { "Login" }
    }

    pub async fn submit(&mut self, email: &str, password: &str) -> Result<(), ClientError> {
        if email.trim().is_empty() || password.is_empty() {
            self.error = Some("Both fields are required".to_string());
            return Err(ClientError::Validation(
                "email and password are required".to_string(),
            ));
        }

        self.loading = true;
        self.error = None;
        let result = self.api.login(email.trim(), password).await;
        self.loading = false;

        match result {
            Ok(token) => {
                let state = self.api.state();
                state.store_token(&token);

                self.location_report = Some(tokio::spawn(report_current_location(
                    self.api.clone(),
                    self.devices.position.clone(),
                    self.devices.geocoder.clone(),
                )));

                state.navigate(Screen::Dashboard);
                Ok(())
            }
            Err(err) => {
                self.error = Some(match &err {
                    ClientError::Rejected { message, .. } if !message.is_empty() => message.clone(),
                    _ => "Login failed. Please try again.".to_string(),
                });
                Err(err)
            }
        }
    }

    /// Waits for the background location report started by a successful
    /// login, if any.
    pub async fn wait_for_location_report(&mut self) {
        if let Some(task) = self.location_report.take() {
            if let Err(err) = task.await {
                warn!(error = %err, "location report task failed");
            }
        }
    }
}

/// One-shot position report sent right after login. Failures are logged and
/// never block the session.
pub async fn report_current_location(
    api: ApiClient,
    source: Arc<dyn PositionSource>,
    geocoder: Arc<dyn Geocoder>,
) {
    let fix = match source.current_position(PositionOptions::default()).await {
        Ok(fix) => fix,
        Err(err) => {
            warn!(error = %err, "could not determine position after login");
            return;
        }
    };

    let address = address_or_unavailable(geocoder.as_ref(), fix.point).await;
    let report = LocationReport {
        latitude: fix.point.lat,
        longitude: fix.point.lng,
        address,
    };

    if api.report_location(&report).await.is_ok() {
        info!(lat = report.latitude, lng = report.longitude, "location reported");
    }
}
