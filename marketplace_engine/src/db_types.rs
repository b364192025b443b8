//! Data types shared between the storage backends, the variant ledger and the public API.
use std::{fmt::Display, str::FromStr};

use chrono::{DateTime, Utc};
use mkp_common::Money;
use rand::Rng;
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, Type};
use thiserror::Error;

#[derive(Debug, Clone, Error)]
#[error("Invalid value: {0}")]
pub struct ConversionError(String);

/// Generates a random, prefixed identifier such as `ord-5f1c0a2b9d3e4f60`.
fn random_id(prefix: &str) -> String {
    let n: u64 = rand::thread_rng().gen();
    format!("{prefix}-{n:016x}")
}

macro_rules! string_id {
    ($name:ident, $prefix:literal) => {
        #[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Type, Serialize, Deserialize)]
        #[sqlx(transparent)]
        #[serde(transparent)]
        pub struct $name(pub String);

        impl $name {
            pub fn random() -> Self {
                Self(random_id($prefix))
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl FromStr for $name {
            type Err = ConversionError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                if s.trim().is_empty() {
                    return Err(ConversionError(format!("{} cannot be empty", stringify!($name))));
                }
                Ok(Self(s.to_string()))
            }
        }

        impl From<String> for $name {
            fn from(s: String) -> Self {
                Self(s)
            }
        }

        impl From<&str> for $name {
            fn from(s: &str) -> Self {
                Self(s.to_string())
            }
        }

        impl Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(&self.0)
            }
        }
    };
}

string_id!(ProductId, "prd");
string_id!(OrderId, "ord");
string_id!(ReservationId, "rsv");

//--------------------------------------       VariantKey      ---------------------------------------------------------
/// Identifies a single colour/size combination of a product.
///
/// The derived ordering (product id, then colour, then size) is the global lock order used by the variant ledger.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VariantKey {
    pub product_id: ProductId,
    pub color: String,
    pub size: String,
}

impl VariantKey {
    pub fn new<P: Into<ProductId>, C: Into<String>, S: Into<String>>(product_id: P, color: C, size: S) -> Self {
        Self { product_id: product_id.into(), color: color.into(), size: size.into() }
    }
}

impl Display for VariantKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}/{}", self.product_id, self.color, self.size)
    }
}

//--------------------------------------        Variant        ---------------------------------------------------------
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Variant {
    #[serde(flatten)]
    pub key: VariantKey,
    pub stock: u32,
    pub reserved: u32,
}

impl Variant {
    pub fn new(key: VariantKey, stock: u32, reserved: u32) -> Self {
        Self { key, stock, reserved }
    }

    /// The quantity that can still be ordered.
    pub fn available(&self) -> u32 {
        self.stock.saturating_sub(self.reserved)
    }
}

//--------------------------------------        Product        ---------------------------------------------------------
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Product {
    pub id: ProductId,
    pub seller_id: String,
    pub name: String,
    pub price: Money,
    pub variants: Vec<Variant>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Product {
    pub fn has_variant(&self, color: &str, size: &str) -> bool {
        self.variants.iter().any(|v| v.key.color == color && v.key.size == size)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewVariant {
    pub color: String,
    pub size: String,
    pub stock: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewProduct {
    pub name: String,
    pub price: Money,
    pub variants: Vec<NewVariant>,
}

//--------------------------------------   OrderStatusType     ---------------------------------------------------------
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Type, Serialize, Deserialize)]
#[sqlx(rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum OrderStatusType {
    /// The order has been placed and its stock is reserved. Awaiting payment confirmation.
    PendingPayment,
    /// The seller has confirmed payment. The reservation has been committed.
    Confirmed,
    /// The seller has dispatched the order.
    Shipped,
    /// The order has reached the buyer. Complaints can be filed from here on.
    Delivered,
    /// The order was cancelled (by a user, by payment rejection, or by reservation expiry).
    Cancelled,
}

impl OrderStatusType {
    /// Whether the state machine permits moving directly from `self` to `next`.
    ///
    /// | From \ To       | Confirmed | Shipped | Delivered | Cancelled |
    /// |-----------------|-----------|---------|-----------|-----------|
    /// | PendingPayment  | ✓         |         |           | ✓         |
    /// | Confirmed       |           | ✓       |           | ✓         |
    /// | Shipped         |           |         | ✓         |           |
    /// | Delivered       |           |         |           |           |
    /// | Cancelled       |           |         |           |           |
    pub fn can_transition_to(&self, next: OrderStatusType) -> bool {
        use OrderStatusType::*;
        matches!(
            (self, next),
            (PendingPayment, Confirmed | Cancelled) | (Confirmed, Shipped | Cancelled) | (Shipped, Delivered)
        )
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Delivered | Self::Cancelled)
    }
}

impl Display for OrderStatusType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OrderStatusType::PendingPayment => write!(f, "pending_payment"),
            OrderStatusType::Confirmed => write!(f, "confirmed"),
            OrderStatusType::Shipped => write!(f, "shipped"),
            OrderStatusType::Delivered => write!(f, "delivered"),
            OrderStatusType::Cancelled => write!(f, "cancelled"),
        }
    }
}

impl FromStr for OrderStatusType {
    type Err = ConversionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending_payment" => Ok(Self::PendingPayment),
            "confirmed" => Ok(Self::Confirmed),
            "shipped" => Ok(Self::Shipped),
            "delivered" => Ok(Self::Delivered),
            "cancelled" => Ok(Self::Cancelled),
            s => Err(ConversionError(format!("Invalid order status: {s}"))),
        }
    }
}

//--------------------------------------     CancelReason      ---------------------------------------------------------
#[derive(Debug, Clone, Copy, PartialEq, Eq, Type, Serialize, Deserialize)]
#[sqlx(rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum CancelReason {
    Buyer,
    Seller,
    Admin,
    PaymentRejected,
    GatewayFailure,
    Expired,
}

impl Display for CancelReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CancelReason::Buyer => write!(f, "cancelled by buyer"),
            CancelReason::Seller => write!(f, "cancelled by seller"),
            CancelReason::Admin => write!(f, "cancelled by an administrator"),
            CancelReason::PaymentRejected => write!(f, "payment proof rejected"),
            CancelReason::GatewayFailure => write!(f, "card payment failed"),
            CancelReason::Expired => write!(f, "reservation expired"),
        }
    }
}

//--------------------------------------  Payment / Shipping   ---------------------------------------------------------
#[derive(Debug, Clone, Copy, PartialEq, Eq, Type, Serialize, Deserialize)]
pub enum PaymentMethod {
    #[sqlx(rename = "credit-card")]
    #[serde(rename = "credit-card")]
    CreditCard,
    #[sqlx(rename = "paypal")]
    #[serde(rename = "paypal")]
    Paypal,
}

impl Display for PaymentMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PaymentMethod::CreditCard => write!(f, "credit-card"),
            PaymentMethod::Paypal => write!(f, "paypal"),
        }
    }
}

impl FromStr for PaymentMethod {
    type Err = ConversionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "credit-card" => Ok(Self::CreditCard),
            "paypal" => Ok(Self::Paypal),
            other => Err(ConversionError(format!("Unsupported payment method: {other}"))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Type, Serialize, Deserialize)]
#[sqlx(rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum ShippingMethod {
    Standard,
    Express,
}

impl Display for ShippingMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ShippingMethod::Standard => write!(f, "standard"),
            ShippingMethod::Express => write!(f, "express"),
        }
    }
}

impl FromStr for ShippingMethod {
    type Err = ConversionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "standard" => Ok(Self::Standard),
            "express" => Ok(Self::Express),
            other => Err(ConversionError(format!("Unsupported shipping method: {other}"))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default, FromRow, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ShippingAddress {
    pub address: String,
    pub city: String,
    pub postal_code: String,
    pub country: String,
}

//--------------------------------------       OrderItem       ---------------------------------------------------------
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderItem {
    #[serde(flatten)]
    pub key: VariantKey,
    pub quantity: u32,
    /// The unit price at the time the order was placed. Later price changes on the product do not affect it.
    pub unit_price: Money,
}

impl OrderItem {
    pub fn line_total(&self) -> Option<Money> {
        self.unit_price.checked_times(self.quantity)
    }
}

//--------------------------------------        NewOrder       ---------------------------------------------------------
/// A fully validated order, ready to be persisted together with its stock reservation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NewOrder {
    pub order_id: OrderId,
    pub buyer_id: String,
    pub seller_id: String,
    pub items: Vec<OrderItem>,
    pub shipping_address: ShippingAddress,
    pub payment_method: PaymentMethod,
    pub shipping_method: ShippingMethod,
    pub items_price: Money,
    pub shipping_price: Money,
    pub tax_price: Money,
    pub total_price: Money,
}

//--------------------------------------         Order         ---------------------------------------------------------
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Order {
    pub id: i64,
    pub order_id: OrderId,
    pub buyer_id: String,
    pub seller_id: String,
    pub items: Vec<OrderItem>,
    pub shipping_address: ShippingAddress,
    pub payment_method: PaymentMethod,
    pub shipping_method: ShippingMethod,
    pub items_price: Money,
    pub shipping_price: Money,
    pub tax_price: Money,
    pub total_price: Money,
    pub status: OrderStatusType,
    pub reservation_id: ReservationId,
    pub cancel_reason: Option<CancelReason>,
    /// Set when a confirmed order is cancelled. The refund itself is executed by the payment collaborator.
    pub refund_flagged: bool,
    pub gateway_txid: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Order {
    pub fn item_for(&self, key: &VariantKey) -> Option<&OrderItem> {
        self.items.iter().find(|i| &i.key == key)
    }

    pub fn contains_product(&self, product_id: &ProductId) -> bool {
        self.items.iter().any(|i| &i.key.product_id == product_id)
    }

    pub fn is_party(&self, user_id: &str) -> bool {
        self.buyer_id == user_id || self.seller_id == user_id
    }
}

/// A guarded status update. Storage backends only apply it if the order is still in the `from` state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusChange {
    pub from: OrderStatusType,
    pub to: OrderStatusType,
    pub cancel_reason: Option<CancelReason>,
    pub refund_flagged: bool,
    pub gateway_txid: Option<String>,
}

impl StatusChange {
    pub fn new(from: OrderStatusType, to: OrderStatusType) -> Self {
        Self { from, to, cancel_reason: None, refund_flagged: false, gateway_txid: None }
    }

    pub fn cancellation(from: OrderStatusType, reason: CancelReason) -> Self {
        Self {
            from,
            to: OrderStatusType::Cancelled,
            cancel_reason: Some(reason),
            refund_flagged: from == OrderStatusType::Confirmed,
            gateway_txid: None,
        }
    }

    pub fn with_gateway_txid(mut self, txid: Option<String>) -> Self {
        self.gateway_txid = txid;
        self
    }
}

//--------------------------------------        Payment        ---------------------------------------------------------
#[derive(Debug, Clone, PartialEq, Eq, FromRow, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Payment {
    pub id: i64,
    pub order_id: OrderId,
    pub buyer_id: String,
    pub seller_id: String,
    /// Opaque handle to the uploaded evidence. Never inspected.
    pub proof_ref: String,
    /// Optional bank account or wallet the buyer paid into.
    pub destination: Option<String>,
    pub confirmed: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub confirmed_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewPayment {
    pub order_id: OrderId,
    pub buyer_id: String,
    pub seller_id: String,
    pub proof_ref: String,
    pub destination: Option<String>,
}

impl NewPayment {
    pub fn for_order(order: &Order, proof_ref: String, destination: Option<String>) -> Self {
        Self {
            order_id: order.order_id.clone(),
            buyer_id: order.buyer_id.clone(),
            seller_id: order.seller_id.clone(),
            proof_ref,
            destination,
        }
    }
}

/// The outcome of a card payment, as reported by the external payment gateway.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GatewayReport {
    pub succeeded: bool,
    pub transaction_id: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
}

//--------------------------------------       Complaint       ---------------------------------------------------------
#[derive(Debug, Clone, Copy, PartialEq, Eq, Type, Serialize, Deserialize)]
#[sqlx(rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum ComplaintType {
    Defective,
    Damaged,
    WrongItem,
    NotAsDescribed,
    MissingParts,
    Other,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Type, Serialize, Deserialize)]
#[sqlx(rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum ComplaintStatus {
    Pending,
    InReview,
    Resolved,
    Rejected,
}

impl ComplaintStatus {
    pub fn can_transition_to(&self, next: ComplaintStatus) -> bool {
        use ComplaintStatus::*;
        matches!((self, next), (Pending, InReview) | (Pending | InReview, Resolved | Rejected))
    }

    pub fn is_closed(&self) -> bool {
        matches!(self, Self::Resolved | Self::Rejected)
    }
}

impl Display for ComplaintStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ComplaintStatus::Pending => write!(f, "pending"),
            ComplaintStatus::InReview => write!(f, "in_review"),
            ComplaintStatus::Resolved => write!(f, "resolved"),
            ComplaintStatus::Rejected => write!(f, "rejected"),
        }
    }
}

/// Stock handed back to the seller as part of a resolved complaint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Restock {
    pub color: String,
    pub size: String,
    pub quantity: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Complaint {
    pub id: i64,
    pub user_id: String,
    pub product_id: ProductId,
    pub order_id: OrderId,
    pub complaint_type: ComplaintType,
    pub description: String,
    pub status: ComplaintStatus,
    pub resolution: Option<String>,
    pub resolved_by: Option<String>,
    pub resolved_at: Option<DateTime<Utc>>,
    pub restock: Option<Restock>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewComplaint {
    pub user_id: String,
    pub order_id: OrderId,
    pub product_id: ProductId,
    pub complaint_type: ComplaintType,
    pub description: String,
}

/// A guarded complaint update. Storage backends only apply it while the complaint is in one of the `from` states.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ComplaintUpdate {
    pub from: Vec<ComplaintStatus>,
    pub to: ComplaintStatus,
    pub resolution: Option<String>,
    pub resolved_by: Option<String>,
    pub restock: Option<Restock>,
}

//--------------------------------------          Role         ---------------------------------------------------------
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Buyer,
    Seller,
    Admin,
    /// The external card payment gateway reporting transaction outcomes.
    Gateway,
}

impl Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Role::Buyer => write!(f, "buyer"),
            Role::Seller => write!(f, "seller"),
            Role::Admin => write!(f, "admin"),
            Role::Gateway => write!(f, "gateway"),
        }
    }
}

impl FromStr for Role {
    type Err = ConversionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "buyer" => Ok(Self::Buyer),
            "seller" => Ok(Self::Seller),
            "admin" => Ok(Self::Admin),
            "gateway" => Ok(Self::Gateway),
            s => Err(ConversionError(format!("Invalid role: {s}"))),
        }
    }
}
