/// Connection settings for the metrics service.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Service root, e.g. `https://app.lightdash.cloud`.
    pub base_url: String,
    /// Personal access token, sent as `Authorization: ApiKey <token>`.
    pub access_token: String,
    /// UUID of the project whose catalog is loaded.
    pub project_id: String,
    /// Load at most this many catalogs (`None` = all of them). Useful
    /// when poking at a large project without waiting for the full
    /// metadata sweep.
    pub catalog_limit: Option<usize>,
}

impl ClientConfig {
    pub fn new(
        base_url: impl Into<String>,
        access_token: impl Into<String>,
        project_id: impl Into<String>,
    ) -> Self {
        let base_url = base_url.into();
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            access_token: access_token.into(),
            project_id: project_id.into(),
            catalog_limit: None,
        }
    }

    pub fn with_catalog_limit(mut self, limit: usize) -> Self {
        self.catalog_limit = Some(limit);
        self
    }
}
