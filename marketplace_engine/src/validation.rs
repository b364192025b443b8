//! # Order validation
//!
//! [`OrderValidator`] turns a loosely typed [`OrderRequest`] into a fully checked [`NewOrder`] draft before anything
//! touches the ledger or the database. Validation is pure: the catalog data it needs is fetched beforehand and handed
//! in as a [`CatalogSnapshot`].
//!
//! Checks run in stages. The first stage that finds problems stops validation and reports *every* problem found in
//! that stage:
//! 1. Required fields (customer, shipping address, at least one item, shipping, tax and total prices).
//! 2. Items (positive unit price matching the listed price, quantity of at least one, product and variant exist,
//!    single seller).
//! 3. Payment and shipping methods.
//! 4. Price signs (`shippingPrice >= 0`, `taxPrice >= 0`, `totalPrice > 0`).
//! 5. Arithmetic. The items price is recomputed from the items; the submitted items price (if any) and the total
//!    must agree with the recomputed values to within the currency epsilon.
//!
//! The draft snapshots each product's listed price as the item's unit price, and stores the recomputed items price
//! and the exact sum of items, shipping and tax as its total.
use std::{collections::HashMap, fmt::Display};

use mkp_common::Money;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::{
    db_types::{NewOrder, OrderId, OrderItem, PaymentMethod, Product, ProductId, ShippingMethod, VariantKey},
    mkp_api::order_objects::OrderRequest,
};

/// The largest difference between a submitted and a recomputed amount that is still accepted.
pub const PRICE_EPSILON: Money = Money::from_cents(1);

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldError {
    pub field: String,
    pub message: String,
}

impl FieldError {
    pub fn new<F: Into<String>, M: Into<String>>(field: F, message: M) -> Self {
        Self { field: field.into(), message: message.into() }
    }
}

impl Display for FieldError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[error("Invalid order. {}", display_errors(.0))]
pub struct ValidationErrors(pub Vec<FieldError>);

impl ValidationErrors {
    pub fn single<F: Into<String>, M: Into<String>>(field: F, message: M) -> Self {
        Self(vec![FieldError::new(field, message)])
    }

    pub fn errors(&self) -> &[FieldError] {
        &self.0
    }

    pub fn has_field(&self, field: &str) -> bool {
        self.0.iter().any(|e| e.field == field)
    }
}

fn display_errors(errors: &[FieldError]) -> String {
    errors.iter().map(ToString::to_string).collect::<Vec<_>>().join("; ")
}

/// Collects the errors of one validation stage.
#[derive(Default)]
struct Stage(Vec<FieldError>);

impl Stage {
    fn fail<F: Into<String>, M: Into<String>>(&mut self, field: F, message: M) {
        self.0.push(FieldError::new(field, message));
    }

    fn require(&mut self, field: &str, value: &str) {
        if value.trim().is_empty() {
            self.fail(field, "is required");
        }
    }

    fn finish<T>(self, value: T) -> Result<T, ValidationErrors> {
        if self.0.is_empty() {
            Ok(value)
        } else {
            Err(ValidationErrors(self.0))
        }
    }
}

/// The products referenced by an order, as they were when the order was submitted.
#[derive(Debug, Clone, Default)]
pub struct CatalogSnapshot {
    products: HashMap<ProductId, Product>,
}

impl CatalogSnapshot {
    pub fn new(products: Vec<Product>) -> Self {
        Self { products: products.into_iter().map(|p| (p.id.clone(), p)).collect() }
    }

    pub fn product(&self, id: &ProductId) -> Option<&Product> {
        self.products.get(id)
    }
}

#[derive(Debug, Clone, Copy)]
pub struct OrderValidator {
    epsilon: Money,
}

impl Default for OrderValidator {
    fn default() -> Self {
        Self::new(PRICE_EPSILON)
    }
}

struct RequiredPrices {
    shipping: Money,
    tax: Money,
    total: Money,
}

impl OrderValidator {
    pub fn new(epsilon: Money) -> Self {
        Self { epsilon }
    }

    /// Validates `request`, placed by `buyer_id`, against the catalog.
    pub fn validate(
        &self,
        buyer_id: &str,
        request: &OrderRequest,
        catalog: &CatalogSnapshot,
    ) -> Result<NewOrder, ValidationErrors> {
        let prices = check_required_fields(buyer_id, request)?;
        let (seller_id, items) = self.check_items(request, catalog)?;
        let (payment_method, shipping_method) = check_methods(request)?;
        check_price_signs(&prices)?;
        let (items_price, total_price) = self.check_arithmetic(request, &items, &prices)?;
        Ok(NewOrder {
            order_id: OrderId::random(),
            buyer_id: buyer_id.to_string(),
            seller_id,
            items,
            shipping_address: request.shipping_address.clone(),
            payment_method,
            shipping_method,
            items_price,
            shipping_price: prices.shipping,
            tax_price: prices.tax,
            total_price,
        })
    }

    fn check_items(
        &self,
        request: &OrderRequest,
        catalog: &CatalogSnapshot,
    ) -> Result<(String, Vec<OrderItem>), ValidationErrors> {
        let mut stage = Stage::default();
        let mut items = Vec::with_capacity(request.order_items.len());
        let mut sellers = Vec::<&str>::new();
        for (i, item) in request.order_items.iter().enumerate() {
            let field = format!("orderItems[{i}]");
            let submitted_price = match item.price {
                Some(p) if p.is_positive() => Some(p),
                _ => {
                    stage.fail(format!("{field}.price"), "must be greater than zero");
                    None
                },
            };
            let quantity = if item.quantity < 1 {
                stage.fail(format!("{field}.quantity"), "must be at least 1");
                0
            } else {
                u32::try_from(item.quantity).unwrap_or_else(|_| {
                    stage.fail(format!("{field}.quantity"), "is too large");
                    0
                })
            };
            if item.product.trim().is_empty() {
                stage.fail(format!("{field}.product"), "is required");
                continue;
            }
            let product_id = ProductId::from(item.product.trim());
            let Some(product) = catalog.product(&product_id) else {
                stage.fail(format!("{field}.product"), format!("product {product_id} does not exist"));
                continue;
            };
            if !product.has_variant(&item.color, &item.size) {
                stage.fail(
                    field.as_str(),
                    format!("variant {}/{} does not exist on product {product_id}", item.color, item.size),
                );
                continue;
            }
            // The unit price is the listed price at the time of ordering
            let unit_price = product.price;
            if let Some(submitted) = submitted_price {
                if submitted.distance(unit_price) > self.epsilon {
                    let message = format!("{submitted} does not match the listed price {unit_price}");
                    stage.fail(format!("{field}.price"), message);
                }
            }
            if !sellers.contains(&product.seller_id.as_str()) {
                sellers.push(product.seller_id.as_str());
            }
            let key = VariantKey::new(product_id, item.color.as_str(), item.size.as_str());
            items.push(OrderItem { key, quantity, unit_price });
        }
        if sellers.len() > 1 {
            stage.fail("orderItems", "all items must be sold by the same seller");
        }
        let seller_id = sellers.first().map(|s| s.to_string()).unwrap_or_default();
        stage.finish((seller_id, items))
    }

    fn check_arithmetic(
        &self,
        request: &OrderRequest,
        items: &[OrderItem],
        prices: &RequiredPrices,
    ) -> Result<(Money, Money), ValidationErrors> {
        let mut stage = Stage::default();
        let mut items_price = Some(Money::default());
        for (i, item) in items.iter().enumerate() {
            let line = item.line_total();
            if line.is_none() {
                stage.fail(format!("orderItems[{i}]"), "line total is too large");
            }
            items_price = items_price.zip(line).and_then(|(sum, line)| sum.checked_add(line));
        }
        let Some(items_price) = items_price else {
            stage.fail("itemsPrice", "items price is too large");
            return stage.finish((Money::default(), Money::default()));
        };
        if let Some(submitted) = request.items_price {
            if submitted.distance(items_price) > self.epsilon {
                stage.fail(
                    "itemsPrice",
                    format!("{submitted} does not match the sum of the order items ({items_price})"),
                );
            }
        }
        let expected = items_price.checked_add(prices.shipping).and_then(|p| p.checked_add(prices.tax));
        match expected {
            Some(expected) if prices.total.distance(expected) > self.epsilon => stage.fail(
                "totalPrice",
                format!("{} does not match items + shipping + tax ({expected})", prices.total),
            ),
            Some(_) => {},
            None => stage.fail("totalPrice", "total price is too large"),
        }
        stage.finish((items_price, expected.unwrap_or_default()))
    }
}

fn check_required_fields(buyer_id: &str, request: &OrderRequest) -> Result<RequiredPrices, ValidationErrors> {
    let mut stage = Stage::default();
    stage.require("customer", &request.customer);
    if !request.customer.trim().is_empty() && request.customer.trim() != buyer_id {
        stage.fail("customer", "does not match the authenticated buyer");
    }
    let address = &request.shipping_address;
    stage.require("shippingAddress.address", &address.address);
    stage.require("shippingAddress.city", &address.city);
    stage.require("shippingAddress.postalCode", &address.postal_code);
    stage.require("shippingAddress.country", &address.country);
    if request.order_items.is_empty() {
        stage.fail("orderItems", "at least one item is required");
    }
    let mut price = |field: &str, value: Option<Money>| {
        if value.is_none() {
            stage.fail(field, "is required");
        }
        value.unwrap_or_default()
    };
    let prices = RequiredPrices {
        shipping: price("shippingPrice", request.shipping_price),
        tax: price("taxPrice", request.tax_price),
        total: price("totalPrice", request.total_price),
    };
    stage.finish(prices)
}

fn check_methods(request: &OrderRequest) -> Result<(PaymentMethod, ShippingMethod), ValidationErrors> {
    let mut stage = Stage::default();
    let payment = request.payment_method.parse::<PaymentMethod>().map_err(|_| {
        stage.fail("paymentMethod", format!("'{}' is not one of credit-card, paypal", request.payment_method))
    });
    let shipping = request.shipping_method.parse::<ShippingMethod>().map_err(|_| {
        stage.fail("shippingMethod", format!("'{}' is not one of standard, express", request.shipping_method))
    });
    match (payment, shipping) {
        (Ok(p), Ok(s)) => stage.finish((p, s)),
        _ => Err(ValidationErrors(stage.0)),
    }
}

fn check_price_signs(prices: &RequiredPrices) -> Result<(), ValidationErrors> {
    let mut stage = Stage::default();
    if prices.shipping.is_negative() {
        stage.fail("shippingPrice", "cannot be negative");
    }
    if prices.tax.is_negative() {
        stage.fail("taxPrice", "cannot be negative");
    }
    if !prices.total.is_positive() {
        stage.fail("totalPrice", "must be greater than zero");
    }
    stage.finish(())
}
