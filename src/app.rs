//! Wires the session context, API facade, device adapters and transition
//! table together from a [`Config`].

use std::sync::Arc;

use tracing::info;

use crate::api::client::ApiClient;
use crate::capture::camera::CameraDevice;
use crate::capture::location::PositionSource;
use crate::config::Config;
use crate::engine::transitions::TransitionTable;
use crate::error::AppError;
use crate::geo::{Geocoder, GoogleGeocoder, NoGeocoder};
use crate::screens::dashboard::DashboardController;
use crate::screens::driver_routes::DriverRoutesController;
use crate::screens::login::LoginController;
use crate::screens::order_history::OrderHistoryController;
use crate::screens::Devices;
use crate::state::AppState;

pub struct DriverApp {
    pub state: Arc<AppState>,
    pub api: ApiClient,
    pub devices: Devices,
    pub table: Arc<TransitionTable>,
}

impl DriverApp {
    /// Fails on a malformed transition table or an unusable HTTP client.
    pub fn from_config(
        config: &Config,
        camera: Arc<dyn CameraDevice>,
        position: Arc<dyn PositionSource>,
    ) -> Result<Self, AppError> {
        let table = TransitionTable::load_or_default(config.transition_table_path.as_deref())?;
        let state = Arc::new(AppState::from_config(config));
        let api = ApiClient::new(
            config.api_base_url.clone(),
            config.request_timeout,
            state.clone(),
        )
        .map_err(|err| AppError::Config(format!("cannot build http client: {err}")))?;

        let geocoder: Arc<dyn Geocoder> = match &config.maps_api_key {
            Some(key) => Arc::new(GoogleGeocoder::new(
                api.http().clone(),
                config.geocode_url.clone(),
                key.clone(),
            )),
            None => Arc::new(NoGeocoder),
        };

        info!(
            api_base_url = %config.api_base_url,
            geocoding = config.maps_api_key.is_some(),
            rules = table.rules.len(),
            terminal = table.terminal.len(),
            "driver client assembled"
        );

        Ok(Self {
            state,
            api,
            devices: Devices {
                camera,
                position,
                geocoder,
            },
            table: Arc::new(table),
        })
    }

    pub fn login(&self) -> LoginController {
        LoginController::new(self.api.clone(), self.devices.clone())
    }

    pub fn dashboard(&self) -> DashboardController {
        DashboardController::new(self.api.clone(), self.devices.clone())
    }

    pub fn order_history(&self) -> OrderHistoryController {
        OrderHistoryController::new(self.api.clone())
    }

    pub fn driver_routes(&self) -> DriverRoutesController {
        DriverRoutesController::new(self.api.clone(), self.devices.clone(), self.table.clone())
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::sync::Arc;

    use super::DriverApp;
    use crate::capture::camera::NoCamera;
    use crate::capture::location::UnsupportedPositionSource;
    use crate::config::Config;
    use crate::error::AppError;

    fn app_from(pairs: &[(&str, String)]) -> Result<DriverApp, AppError> {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect();
        let config = Config::from_lookup(|key| vars.get(key).cloned())?;
        DriverApp::from_config(
            &config,
            Arc::new(NoCamera),
            Arc::new(UnsupportedPositionSource),
        )
    }

    #[test]
    fn table_override_replaces_the_default_rules() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("transitions.json");
        std::fs::write(
            &path,
            r#"{
                "terminal": { "Delivered": "Order Delivered" },
                "rules": {
                    "Order Placed": {
                        "label": "Begin Pickup",
                        "capture": "direct",
                        "action": "begin_pickup"
                    }
                }
            }"#,
        )
        .unwrap();

        let app = app_from(&[("TRANSITION_TABLE_PATH", path.display().to_string())]).unwrap();

        let rule = app.table.rule("Order Placed").unwrap();
        assert_eq!(rule.label, "Begin Pickup");
        assert!(app.table.rule("Picked Up").is_none());
    }

    #[test]
    fn malformed_table_fails_assembly() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("transitions.json");
        std::fs::write(&path, "{ not json").unwrap();

        let result = app_from(&[("TRANSITION_TABLE_PATH", path.display().to_string())]);

        assert!(matches!(result, Err(AppError::Config(_))));
    }

    #[test]
    fn api_base_url_comes_from_config() {
        let app = app_from(&[("API_BASE_URL", "http://127.0.0.1:9/api/".to_string())]).unwrap();

        assert_eq!(app.api.base_url(), "http://127.0.0.1:9/api");
        assert!(app.state.token().is_none());
    }
}
