//! Client for the complaint backend.
//!
//! The backend exposes three collection endpoints, and which one a caller may
//! read depends on their role:
//!
//! | Role | Endpoint |
//! |------|----------|
//! | Admin | `GET /Complaint/all` |
//! | Manager | `GET /Complaint/department/{deptId}` |
//! | Employee | `GET /Complaint/my-complaints` |
//!
//! Each returns a JSON array of complaint records. The caller's bearer token
//! is forwarded as is; authorisation is enforced by the backend.

use crate::error::RemoteError;
use crate::model::{ComplaintRecord, Role, Session};

/// Default base URL of the complaint backend.
pub const COMPLAINTS_API_BASE: &str = "https://localhost:7001/api";

/// Client for the complaint REST API.
#[derive(Clone)]
pub struct ComplaintsClient {
    client: reqwest::Client,
    base_url: String,
}

impl Default for ComplaintsClient {
    fn default() -> Self {
        Self::new()
    }
}

impl ComplaintsClient {
    /// Create a client against the default backend.
    pub fn new() -> Self {
        Self::with_base_url(COMPLAINTS_API_BASE)
    }

    /// Create a client with a custom base URL.
    pub fn with_base_url(base_url: &str) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    /// Path of the collection `session` is allowed to see.
    ///
    /// A manager without a department falls back to department `0`.
    pub fn endpoint_for(session: &Session) -> String {
        match session.role {
            Role::Admin => "/Complaint/all".to_string(),
            Role::Manager => format!("/Complaint/department/{}", session.dept_id.unwrap_or(0)),
            Role::Employee => "/Complaint/my-complaints".to_string(),
        }
    }

    /// Fetch the complaint collection for `session`.
    ///
    /// # Example
    ///
    /// ```ignore
    /// let client = ComplaintsClient::with_base_url("https://grievance.example/api");
    /// let records = client.fetch_for(&session).await?;
    /// ```
    pub async fn fetch_for(&self, session: &Session) -> Result<Vec<ComplaintRecord>, RemoteError> {
        let url = format!("{}{}", self.base_url, Self::endpoint_for(session));

        let response = self
            .client
            .get(&url)
            .bearer_auth(&session.token)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(RemoteError::Status { status });
        }

        let records = response.json::<Vec<ComplaintRecord>>().await?;
        Ok(records)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn session(role: Role, dept_id: Option<i64>) -> Session {
        Session {
            user_id: "42".to_string(),
            name: "Ravi".to_string(),
            role,
            dept_id,
            token: "token".to_string(),
        }
    }

    #[test]
    fn test_endpoint_by_role() {
        assert_eq!(
            ComplaintsClient::endpoint_for(&session(Role::Admin, Some(3))),
            "/Complaint/all"
        );
        assert_eq!(
            ComplaintsClient::endpoint_for(&session(Role::Manager, Some(3))),
            "/Complaint/department/3"
        );
        assert_eq!(
            ComplaintsClient::endpoint_for(&session(Role::Employee, Some(3))),
            "/Complaint/my-complaints"
        );
    }

    #[test]
    fn test_manager_without_department() {
        assert_eq!(
            ComplaintsClient::endpoint_for(&session(Role::Manager, None)),
            "/Complaint/department/0"
        );
    }

    #[test]
    fn test_base_url_trailing_slash() {
        let client = ComplaintsClient::with_base_url("http://backend.local/api/");
        assert_eq!(client.base_url, "http://backend.local/api");
    }
}
