use chrono::{DateTime, Utc};
use mkp_common::Money;
use serde::{Deserialize, Serialize};

use crate::db_types::{OrderStatusType, ShippingAddress};

/// An order as submitted by a client, before validation.
///
/// All fields are optional at the serde level so that missing values are reported by the validator as field errors
/// instead of failing deserialization wholesale.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct OrderRequest {
    pub customer: String,
    pub shipping_address: ShippingAddress,
    pub order_items: Vec<OrderItemRequest>,
    pub payment_method: String,
    pub shipping_method: String,
    pub items_price: Option<Money>,
    pub shipping_price: Option<Money>,
    pub tax_price: Option<Money>,
    pub total_price: Option<Money>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct OrderItemRequest {
    pub product: String,
    pub color: String,
    pub size: String,
    pub quantity: i64,
    pub price: Option<Money>,
}

impl OrderItemRequest {
    pub fn new(product: &str, color: &str, size: &str, quantity: i64, price: Money) -> Self {
        Self {
            product: product.to_string(),
            color: color.to_string(),
            size: size.to_string(),
            quantity,
            price: Some(price),
        }
    }
}

/// Filters for order searches. Empty filters match every order.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct OrderQueryFilter {
    pub buyer_id: Option<String>,
    pub seller_id: Option<String>,
    pub since: Option<DateTime<Utc>>,
    pub until: Option<DateTime<Utc>>,
    pub status: Option<Vec<OrderStatusType>>,
}

impl OrderQueryFilter {
    pub fn with_buyer_id<S: Into<String>>(mut self, buyer_id: S) -> Self {
        self.buyer_id = Some(buyer_id.into());
        self
    }

    pub fn with_seller_id<S: Into<String>>(mut self, seller_id: S) -> Self {
        self.seller_id = Some(seller_id.into());
        self
    }

    pub fn with_status(mut self, status: OrderStatusType) -> Self {
        self.status.get_or_insert_with(Vec::new).push(status);
        self
    }

    pub fn since(mut self, since: DateTime<Utc>) -> Self {
        self.since = Some(since);
        self
    }

    pub fn until(mut self, until: DateTime<Utc>) -> Self {
        self.until = Some(until);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.buyer_id.is_none() &&
            self.seller_id.is_none() &&
            self.since.is_none() &&
            self.until.is_none() &&
            self.status.as_ref().map(|s| s.is_empty()).unwrap_or(true)
    }
}
