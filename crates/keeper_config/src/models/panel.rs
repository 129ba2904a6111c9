use serde::Deserialize;

/// Connection details for the Pelican panel.
#[derive(Debug, Clone, Deserialize, Default, PartialEq)]
pub struct PanelConfig {
    pub url: String,

    /// Client API key: resources, server details and power signals.
    #[serde(default)]
    pub client_token: String,

    /// Application API key: server listing.
    #[serde(default)]
    pub application_token: String,

    /// Host used to reach game servers. Falls back to the allocation ip.
    #[serde(default)]
    pub external_ip: Option<String>,
}

impl PanelConfig {
    pub fn is_complete(&self) -> bool {
        !self.url.trim().is_empty()
            && !self.client_token.trim().is_empty()
            && !self.application_token.trim().is_empty()
    }
}
