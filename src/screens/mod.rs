//! Screen controllers. Each one is constructed with the shared API facade
//! (and through it the session context) plus the device adapters it needs,
//! and exposes plain view state for a UI shell to render.

pub mod dashboard;
pub mod driver_routes;
pub mod login;
pub mod order_history;

use std::sync::Arc;

use serde::Serialize;

use crate::capture::camera::CameraDevice;
use crate::capture::location::PositionSource;
use crate::geo::Geocoder;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "state", content = "data", rename_all = "snake_case")]
pub enum ViewState<T> {
    Loading,
    Failed(String),
    Empty,
    Ready(T),
}

impl<T> ViewState<T> {
    pub fn is_loading(&self) -> bool {
        matches!(self, ViewState::Loading)
    }

    pub fn ready(&self) -> Option<&T> {
        match self {
            ViewState::Ready(data) => Some(data),
            _ => None,
        }
    }

    pub fn ready_mut(&mut self) -> Option<&mut T> {
        match self {
            ViewState::Ready(data) => Some(data),
            _ => None,
        }
    }
}

impl<E> ViewState<Vec<E>> {
    pub fn from_list(items: Vec<E>) -> Self {
        if items.is_empty() {
            ViewState::Empty
        } else {
            ViewState::Ready(items)
        }
    }
}

/// Device-facing collaborators shared by the screens.
#[derive(Clone)]
pub struct Devices {
    pub camera: Arc<dyn CameraDevice>,
    pub position: Arc<dyn PositionSource>,
    pub geocoder: Arc<dyn Geocoder>,
}
