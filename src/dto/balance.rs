use serde::Deserialize;
use utoipa::ToSchema;

#[derive(Debug, Deserialize, ToSchema)]
pub struct TopUpRequest {
    /// Amount to add, in minor currency units. Must be positive.
    pub amount: i64,
}
