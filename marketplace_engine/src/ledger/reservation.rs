use std::collections::BTreeMap;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::{
    db_types::{ReservationId, VariantKey},
    ledger::LedgerError,
};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReservationItem {
    pub key: VariantKey,
    pub quantity: u32,
}

impl ReservationItem {
    pub fn new(key: VariantKey, quantity: u32) -> Self {
        Self { key, quantity }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReservationState {
    /// Stock is held against `reserved`, awaiting commit or release.
    Held,
    /// The sale is final. `stock` and `reserved` have both been decremented.
    Committed,
    /// The hold was dropped. Only `reserved` was decremented.
    Released,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Reservation {
    pub id: ReservationId,
    /// One entry per variant, sorted by key.
    pub items: Vec<ReservationItem>,
    pub created_at: DateTime<Utc>,
    pub state: ReservationState,
}

impl Reservation {
    pub(crate) fn new(quantities: &BTreeMap<VariantKey, u32>) -> Self {
        Self::held(ReservationId::random(), quantities, Utc::now())
    }

    pub(crate) fn held(id: ReservationId, quantities: &BTreeMap<VariantKey, u32>, created_at: DateTime<Utc>) -> Self {
        let items = quantities.iter().map(|(k, q)| ReservationItem::new(k.clone(), *q)).collect();
        Self { id, items, created_at, state: ReservationState::Held }
    }

    /// Rebuilds a held reservation from persisted order data, e.g. at start-up.
    pub fn restored(
        id: ReservationId,
        items: &[ReservationItem],
        created_at: DateTime<Utc>,
    ) -> Result<Self, LedgerError> {
        let quantities = aggregate(items)?;
        Ok(Self::held(id, &quantities, created_at))
    }

    pub fn is_expired(&self, now: DateTime<Utc>, hold_window: Duration) -> bool {
        self.state == ReservationState::Held && self.created_at + hold_window <= now
    }

    pub(crate) fn quantities(&self) -> BTreeMap<VariantKey, u32> {
        self.items.iter().map(|i| (i.key.clone(), i.quantity)).collect()
    }
}

/// Collapses a batch into one quantity per variant, in lock order.
///
/// Duplicate keys are summed so that a variant's lock is only ever taken once per batch.
pub(crate) fn aggregate(items: &[ReservationItem]) -> Result<BTreeMap<VariantKey, u32>, LedgerError> {
    if items.is_empty() {
        return Err(LedgerError::EmptyBatch);
    }
    let mut quantities = BTreeMap::new();
    for item in items {
        if item.quantity == 0 {
            return Err(LedgerError::ZeroQuantity(item.key.clone()));
        }
        let entry = quantities.entry(item.key.clone()).or_insert(0u32);
        *entry = entry.checked_add(item.quantity).ok_or_else(|| LedgerError::Overflow(item.key.clone()))?;
    }
    Ok(quantities)
}
