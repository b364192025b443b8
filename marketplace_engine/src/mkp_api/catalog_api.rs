//! Product listing for sellers. Orders can only be placed against variants that were registered here.
use std::{collections::HashSet, fmt::Debug, sync::Arc};

use log::*;

use crate::{
    db_types::{NewProduct, Product, ProductId},
    ledger::VariantLedger,
    traits::MarketplaceDatabase,
    validation::{FieldError, ValidationErrors},
    MarketplaceError,
};

pub struct CatalogApi<B> {
    db: B,
    ledger: Arc<VariantLedger>,
}

impl<B> Debug for CatalogApi<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "CatalogApi")
    }
}

impl<B> CatalogApi<B> {
    pub fn new(db: B, ledger: Arc<VariantLedger>) -> Self {
        Self { db, ledger }
    }
}

impl<B> CatalogApi<B>
where B: MarketplaceDatabase
{
    /// Lists a new product for `seller_id` and registers its variants with the ledger.
    pub async fn add_product(&self, seller_id: &str, product: NewProduct) -> Result<Product, MarketplaceError> {
        check_new_product(&product)?;
        let product_id = ProductId::random();
        let product = self.db.insert_product(product_id, seller_id, product).await?;
        self.ledger.register(&product.variants).await?;
        info!("📦️ {seller_id} listed product {} with {} variant(s)", product.id, product.variants.len());
        Ok(product)
    }

    /// Fetches a product with its live stock levels, as the ledger sees them.
    pub async fn fetch_product(&self, product_id: &ProductId) -> Result<Option<Product>, MarketplaceError> {
        let Some(mut product) = self.db.fetch_product(product_id).await? else {
            return Ok(None);
        };
        let live = self.ledger.variants_for_product(product_id).await;
        for variant in &mut product.variants {
            if let Some(level) = live.iter().find(|v| v.key == variant.key) {
                variant.stock = level.stock;
                variant.reserved = level.reserved;
            }
        }
        Ok(Some(product))
    }
}

fn check_new_product(product: &NewProduct) -> Result<(), ValidationErrors> {
    let mut errors = Vec::new();
    if product.name.trim().is_empty() {
        errors.push(FieldError::new("name", "is required"));
    }
    if !product.price.is_positive() {
        errors.push(FieldError::new("price", "must be greater than zero"));
    }
    if product.variants.is_empty() {
        errors.push(FieldError::new("variants", "at least one variant is required"));
    }
    let mut seen = HashSet::new();
    for (i, v) in product.variants.iter().enumerate() {
        if v.color.trim().is_empty() || v.size.trim().is_empty() {
            errors.push(FieldError::new(format!("variants[{i}]"), "color and size are required"));
        } else if !seen.insert((v.color.as_str(), v.size.as_str())) {
            errors.push(FieldError::new(format!("variants[{i}]"), format!("{}/{} is listed twice", v.color, v.size)));
        }
    }
    if errors.is_empty() {
        Ok(())
    } else {
        Err(ValidationErrors(errors))
    }
}
