use marketplace_engine::db_types::{ComplaintType, Order, OrderId, OrderStatusType, ProductId, Restock};
use serde::{Deserialize, Serialize};

/// The short form of an order returned by state-changing order routes.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderStatusResponse {
    pub order_id: OrderId,
    pub status: OrderStatusType,
    #[serde(skip_serializing_if = "std::ops::Not::not", default)]
    pub refund_flagged: bool,
}

impl From<&Order> for OrderStatusResponse {
    fn from(order: &Order) -> Self {
        Self { order_id: order.order_id.clone(), status: order.status, refund_flagged: order.refund_flagged }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentProofRequest {
    pub proof_ref: String,
    #[serde(default)]
    pub destination: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ComplaintRequest {
    pub order_id: OrderId,
    pub product_id: ProductId,
    pub complaint_type: ComplaintType,
    pub description: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolveComplaintRequest {
    pub resolution: String,
    #[serde(default)]
    pub restock: Option<Restock>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RejectComplaintRequest {
    pub resolution: String,
}
