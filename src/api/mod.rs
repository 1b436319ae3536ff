// API module - on-demand snapshot endpoints

pub mod rest;

use serde::{Deserialize, Serialize};

#[derive(Debug, Default, Serialize, Deserialize)]
pub struct DnsQuery {
    /// Per-interface settings instead of the system-wide list
    #[serde(default)]
    pub manual: bool,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    pub message: String,
}
