use crate::api::client::ApiClient;
use crate::error::ClientError;
use crate::models::order::{format_timestamp, group_history, OrderHistoryEntry};
use crate::screens::ViewState;
use crate::state::Screen;

pub struct OrderHistoryController {
    api: ApiClient,
    entries: ViewState<Vec<OrderHistoryEntry>>,
}

impl OrderHistoryController {
    pub fn new(api: ApiClient) -> Self {
        Self {
            api,
            entries: ViewState::Loading,
        }
    }

    pub fn entries(&self) -> &ViewState<Vec<OrderHistoryEntry>> {
        &self.entries
    }

    pub async fn mount(&mut self) -> Result<(), ClientError> {
        self.api.state().require_token()?;

        self.entries = ViewState::Loading;
        match self.api.fetch_processed_orders().await {
            Ok(rows) => {
                self.entries = ViewState::from_list(group_history(rows));
                Ok(())
            }
            Err(err) => {
                self.entries = ViewState::Failed(
                    "Failed to fetch order history. Please try again.".to_string(),
                );
                Err(err)
            }
        }
    }

    pub fn back(&self) {
        self.api.state().navigate(Screen::Dashboard);
    }
}

/// Status table rows: the assignment tag ("N/A" if missing) and when it changed.
pub fn status_rows(entry: &OrderHistoryEntry) -> Vec<(String, String)> {
    entry
        .statuses
        .iter()
        .map(|status| {
            (
                status.assign_for.clone().unwrap_or_else(|| "N/A".to_string()),
                format_timestamp(status.updated_at.as_deref()),
            )
        })
        .collect()
}
