//! Reports service: fetch the caller's complaints and aggregate them.
//!
//! The collection is refetched on every request and the aggregation reruns
//! only when the records differ from the previous fetch for the same scope.
//! A failing backend never fails the report: the failure is logged and the
//! report is built from an empty collection, flagged as degraded.
//!
//! # Usage
//!
//! ```ignore
//! let dashboard = Dashboard::new(ComplaintsClient::with_base_url(api_url));
//! let report = dashboard.report_for(&session).await;
//! ```

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::Mutex;
use tracing::{info, instrument, warn};

use crate::aggregation::{AggregatedView, ViewMemo};
use crate::data_sources::ComplaintsClient;
use crate::model::Session;

/// Response for GET /reports.
#[derive(Debug, Clone, Serialize)]
pub struct ReportResponse {
    /// When the report was produced.
    pub generated_at: DateTime<Utc>,

    /// Backend endpoint the records came from.
    pub scope: String,

    /// True when the backend could not be read and the view is empty.
    pub degraded: bool,

    #[serde(flatten)]
    pub view: AggregatedView,
}

/// Reports over the complaint backend.
#[derive(Clone)]
pub struct Dashboard {
    complaints: ComplaintsClient,
    memos: Arc<Mutex<HashMap<String, ViewMemo>>>,
}

impl Dashboard {
    pub fn new(complaints: ComplaintsClient) -> Self {
        Self {
            complaints,
            memos: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Build the report `session` is entitled to.
    #[instrument(skip_all, fields(role = ?session.role))]
    pub async fn report_for(&self, session: &Session) -> ReportResponse {
        let scope = ComplaintsClient::endpoint_for(session);

        let (records, degraded) = match self.complaints.fetch_for(session).await {
            Ok(records) => (records, false),
            Err(e) => {
                warn!(scope = %scope, error = %e, "Failed to fetch report data");
                (Vec::new(), true)
            }
        };

        let view = {
            let mut memos = self.memos.lock().await;
            memos.entry(scope.clone()).or_default().get_or_compute(records)
        };

        info!(
            scope = %scope,
            total = view.stats.total,
            resolution_rate = view.stats.resolution_rate,
            degraded,
            "Report generated"
        );

        ReportResponse {
            generated_at: Utc::now(),
            scope,
            degraded,
            view: AggregatedView::clone(&view),
        }
    }
}
