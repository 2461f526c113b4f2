use serde::Serialize;
use utoipa::ToSchema;

#[derive(Debug, Serialize, ToSchema)]
pub struct IssuanceDepth {
    pub queued: i64,
    pub dead_lettered: i64,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct RedriveResult {
    pub moved: usize,
}
