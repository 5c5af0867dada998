use serde::Deserialize;

/// One decoded response line.
#[derive(Debug, Deserialize)]
pub struct Envelope {
    #[serde(default)]
    pub success: bool,
    #[serde(rename = "type", default)]
    pub kind: Option<String>,
    #[serde(default)]
    pub result: Option<serde_json::Value>,
    #[serde(default)]
    pub error: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct QueryPayload {
    // The engine sends `null` for an empty column list or row set.
    #[serde(default)]
    pub columns: Option<Vec<String>>,
    #[serde(default)]
    pub data: Option<Vec<Vec<String>>>,
    #[serde(default)]
    pub records_read: u64,
    // The native bindings report `execution_time_ms`.
    #[serde(default, alias = "execution_time_ms")]
    pub time_ms: f64,
}

#[derive(Debug, Default, Deserialize)]
pub struct CommitPayload {
    #[serde(default)]
    pub databases_created: u64,
    #[serde(default)]
    pub databases_deleted: u64,
    #[serde(default)]
    pub tables_created: u64,
    #[serde(default)]
    pub tables_deleted: u64,
    #[serde(default)]
    pub records_written: u64,
    #[serde(default)]
    pub records_deleted: u64,
    #[serde(default, alias = "execution_time_ms")]
    pub time_ms: f64,
}

#[derive(Debug, Default, Deserialize)]
pub struct AuthPayload {
    #[serde(default)]
    pub authenticated: bool,
    #[serde(default)]
    pub identity: String,
    #[serde(default)]
    pub expires_in: Option<i64>,
}
