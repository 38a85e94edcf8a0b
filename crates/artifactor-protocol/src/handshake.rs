use serde::{Deserialize, Serialize};

/// Query parameters accepted on the WebSocket upgrade route:
/// `GET /ws?artifact_id=...&token=...`
#[derive(Debug, Clone, Deserialize)]
pub struct ConnectParams {
    pub artifact_id: String,
    pub token: String,
    #[serde(default)]
    pub client_info: Option<ClientInfo>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ClientInfo {
    pub name: Option<String>,
    pub version: Option<String>,
    pub platform: Option<String>,
}

/// Identity resolved from the bearer token at handshake time, handed to the
/// hub's `Attach` operation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthenticatedUser {
    pub user_id: String,
    pub display_name: String,
    pub avatar_url: Option<String>,
}
