use serde::{Deserialize, Serialize};

pub const ENDPOINT_LOANS: &str = "/loans";
/// Path the loans role also answers under for older clients.
pub const ENDPOINT_LOANS_ALIAS: &str = "/borrows";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AcquireRequest {
    #[serde(default, alias = "bookId")]
    pub item_id: String,
}
