//! # Variant ledger
//!
//! The ledger is the sole owner of the per-variant `stock` and `reserved` counters. Every other component asks the
//! ledger to change them; nothing writes them directly.
//!
//! Stock moves through three operations on a [`Reservation`]:
//! * [`VariantLedger::reserve`] holds stock for a whole batch of items, or for none of them.
//! * [`VariantLedger::commit`] makes a held reservation a final sale (`stock` and `reserved` both drop).
//! * [`VariantLedger::release`] drops a held reservation (`reserved` drops, the stock is orderable again).
//!
//! Commit and release are terminal and mutually exclusive. Repeating the same one is a no-op, which lets the expiry
//! sweep and a manual cancellation race harmlessly. Settled reservations are only remembered for one hold window
//! after settlement; [`VariantLedger::prune_settled`] forgets older ones, after which they are unknown to the ledger.
//!
//! ## Locking
//! Each variant has its own mutex. Batch operations always acquire the mutexes in ascending [`VariantKey`] order, so
//! two batches that share variants can never wait on each other in a cycle. The reservation table has its own lock,
//! which is only ever taken *after* variant locks, and never held while waiting on anything else.
//!
//! ## Persistence
//! The `*_with` variants of each operation take a `persist` closure. It receives the variant levels as they *will*
//! be once the operation is applied and runs while the variant locks are held. The in-memory counters only change if
//! `persist` succeeds, so callers can write the new levels (and related order/payment records) to storage in one
//! transaction and get all-or-nothing behaviour across the ledger and the database.
mod errors;
mod reservation;

use std::{
    collections::{BTreeMap, HashMap},
    fmt::Debug,
    future::Future,
    sync::Arc,
};

use chrono::{DateTime, Duration, Utc};
pub use errors::LedgerError;
use log::*;
pub(crate) use reservation::aggregate;
pub use reservation::{Reservation, ReservationItem, ReservationState};
use tokio::sync::{Mutex, OwnedMutexGuard, RwLock};

use crate::db_types::{ProductId, ReservationId, Variant, VariantKey};

pub const DEFAULT_HOLD_WINDOW_MINUTES: i64 = 30;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
struct StockLevel {
    stock: u32,
    reserved: u32,
}

impl StockLevel {
    fn available(&self) -> u32 {
        self.stock.saturating_sub(self.reserved)
    }
}

/// The outcome of a commit or release.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Settlement<T> {
    /// The reservation was held and has now been settled. Carries the result of the persistence closure.
    Applied(T),
    /// The reservation had already been settled the same way. Nothing changed.
    AlreadySettled,
}

impl<T> Settlement<T> {
    pub fn is_applied(&self) -> bool {
        matches!(self, Settlement::Applied(_))
    }

    pub fn applied(self) -> Option<T> {
        match self {
            Settlement::Applied(v) => Some(v),
            Settlement::AlreadySettled => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Settle {
    Commit,
    Release,
}

struct LockedVariant {
    key: VariantKey,
    quantity: u32,
    level: OwnedMutexGuard<StockLevel>,
}

impl LockedVariant {
    fn variant(&self, level: StockLevel) -> Variant {
        Variant::new(self.key.clone(), level.stock, level.reserved)
    }
}

/// Held reservations, and settled ones with the time they were settled.
#[derive(Default)]
struct ReservationBook {
    held: HashMap<ReservationId, Reservation>,
    settled: HashMap<ReservationId, (Reservation, DateTime<Utc>)>,
}

impl ReservationBook {
    fn get(&self, id: &ReservationId) -> Option<&Reservation> {
        self.held.get(id).or_else(|| self.settled.get(id).map(|(r, _)| r))
    }

    fn settle(&mut self, id: &ReservationId, state: ReservationState, at: DateTime<Utc>) {
        if let Some(mut r) = self.held.remove(id) {
            r.state = state;
            self.settled.insert(id.clone(), (r, at));
        }
    }
}

pub struct VariantLedger {
    cells: RwLock<BTreeMap<VariantKey, Arc<Mutex<StockLevel>>>>,
    reservations: Mutex<ReservationBook>,
    hold_window: Duration,
}

impl Debug for VariantLedger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "VariantLedger (hold window {} min)", self.hold_window.num_minutes())
    }
}

impl Default for VariantLedger {
    fn default() -> Self {
        Self::new(Duration::minutes(DEFAULT_HOLD_WINDOW_MINUTES))
    }
}

impl VariantLedger {
    pub fn new(hold_window: Duration) -> Self {
        Self {
            cells: RwLock::new(BTreeMap::new()),
            reservations: Mutex::new(ReservationBook::default()),
            hold_window,
        }
    }

    /// Rebuilds the ledger from persisted stock levels and the reservations that are still held.
    ///
    /// A mismatch between a variant's persisted `reserved` counter and the sum of the held reservations is logged,
    /// but the persisted counter is kept, since it is what the database constraints were checked against.
    pub fn restore(
        variants: Vec<Variant>,
        held: Vec<Reservation>,
        hold_window: Duration,
    ) -> Result<Self, LedgerError> {
        let mut cells = BTreeMap::new();
        for v in variants {
            if v.reserved > v.stock {
                return Err(LedgerError::InconsistentLevels(v.key));
            }
            let level = StockLevel { stock: v.stock, reserved: v.reserved };
            if cells.insert(v.key.clone(), level).is_some() {
                return Err(LedgerError::DuplicateVariant(v.key));
            }
        }
        let mut expected = BTreeMap::<VariantKey, u64>::new();
        let mut reservations = ReservationBook::default();
        for r in held {
            for item in &r.items {
                if !cells.contains_key(&item.key) {
                    return Err(LedgerError::UnknownVariant(item.key.clone()));
                }
                *expected.entry(item.key.clone()).or_default() += u64::from(item.quantity);
            }
            reservations.held.insert(r.id.clone(), Reservation { state: ReservationState::Held, ..r });
        }
        for (key, level) in &cells {
            let held_qty = expected.get(key).copied().unwrap_or_default();
            if held_qty != u64::from(level.reserved) {
                warn!(
                    "📦️ Variant {key} has {} units marked reserved, but held reservations account for {held_qty}.",
                    level.reserved
                );
            }
        }
        info!("📦️ Ledger restored with {} variants and {} held reservations", cells.len(), reservations.held.len());
        let cells = cells.into_iter().map(|(k, l)| (k, Arc::new(Mutex::new(l)))).collect();
        Ok(Self { cells: RwLock::new(cells), reservations: Mutex::new(reservations), hold_window })
    }

    pub fn hold_window(&self) -> Duration {
        self.hold_window
    }

    /// Adds new variants to the ledger. Fails without registering anything if any of them already exist.
    pub async fn register(&self, variants: &[Variant]) -> Result<(), LedgerError> {
        let mut cells = self.cells.write().await;
        for v in variants {
            if cells.contains_key(&v.key) {
                return Err(LedgerError::DuplicateVariant(v.key.clone()));
            }
            if v.reserved > v.stock {
                return Err(LedgerError::InconsistentLevels(v.key.clone()));
            }
        }
        for v in variants {
            cells.insert(v.key.clone(), Arc::new(Mutex::new(StockLevel { stock: v.stock, reserved: v.reserved })));
            debug!("📦️ Registered variant {} with {} units", v.key, v.stock);
        }
        Ok(())
    }

    pub async fn contains(&self, key: &VariantKey) -> bool {
        self.cells.read().await.contains_key(key)
    }

    /// The current counters for a single variant.
    pub async fn level(&self, key: &VariantKey) -> Option<Variant> {
        let cell = self.cells.read().await.get(key).cloned()?;
        let level = *cell.lock().await;
        Some(Variant::new(key.clone(), level.stock, level.reserved))
    }

    /// The current counters of every variant of a product, in key order.
    pub async fn variants_for_product(&self, product_id: &ProductId) -> Vec<Variant> {
        let cells = {
            let index = self.cells.read().await;
            index.iter().filter(|(k, _)| &k.product_id == product_id).map(|(k, c)| (k.clone(), c.clone())).collect()
        };
        Self::read_cells(cells).await
    }

    /// The current counters of every variant in the ledger. Each variant is read under its own lock, so the result
    /// is not a point-in-time snapshot across variants.
    pub async fn snapshot(&self) -> Vec<Variant> {
        let cells = {
            let index = self.cells.read().await;
            index.iter().map(|(k, c)| (k.clone(), c.clone())).collect()
        };
        Self::read_cells(cells).await
    }

    async fn read_cells(cells: Vec<(VariantKey, Arc<Mutex<StockLevel>>)>) -> Vec<Variant> {
        let mut result = Vec::with_capacity(cells.len());
        for (key, cell) in cells {
            let level = *cell.lock().await;
            result.push(Variant::new(key, level.stock, level.reserved));
        }
        result
    }

    /// A held reservation, or a settled one that has not been pruned yet.
    pub async fn reservation(&self, id: &ReservationId) -> Option<Reservation> {
        self.reservations.lock().await.get(id).cloned()
    }

    /// Forgets reservations that were settled more than one hold window before `now`. Returns how many were dropped.
    pub async fn prune_settled(&self, now: DateTime<Utc>) -> usize {
        let cutoff = now - self.hold_window;
        let mut book = self.reservations.lock().await;
        let before = book.settled.len();
        book.settled.retain(|_, (_, settled_at)| *settled_at > cutoff);
        let pruned = before - book.settled.len();
        if pruned > 0 {
            debug!("📦️ Forgot {pruned} settled reservation(s)");
        }
        pruned
    }

    /// Held reservations whose hold window has elapsed at `now`, oldest first.
    pub async fn expired_reservations(&self, now: DateTime<Utc>) -> Vec<Reservation> {
        let mut expired = self
            .reservations
            .lock()
            .await
            .held
            .values()
            .filter(|r| r.is_expired(now, self.hold_window))
            .cloned()
            .collect::<Vec<_>>();
        expired.sort_by_key(|r| r.created_at);
        expired
    }

    /// Reserves every item in the batch, or nothing at all.
    pub async fn reserve(&self, items: &[ReservationItem]) -> Result<Reservation, LedgerError> {
        self.reserve_with(items, |reservation, _| async move { Ok(reservation) }).await
    }

    /// Reserves every item in the batch, or nothing at all, persisting the result with `persist` before the new
    /// counters become visible.
    ///
    /// `persist` receives the new reservation and the variant levels as they will be after the reservation. If it
    /// fails, the ledger is left untouched and its error is returned.
    pub async fn reserve_with<F, Fut, T, E>(&self, items: &[ReservationItem], persist: F) -> Result<T, E>
    where
        F: FnOnce(Reservation, Vec<Variant>) -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: From<LedgerError>,
    {
        let quantities = aggregate(items)?;
        let mut batch = self.lock_batch(&quantities).await?;
        let short = batch.iter().filter(|v| v.level.available() < v.quantity).map(|v| v.key.clone()).collect::<Vec<_>>();
        if !short.is_empty() {
            debug!("📦️ Reservation refused. Insufficient stock for {} variant(s)", short.len());
            return Err(LedgerError::InsufficientStock(short).into());
        }
        // available >= quantity, so reserved + quantity <= stock and cannot overflow
        let next = batch
            .iter()
            .map(|v| StockLevel { stock: v.level.stock, reserved: v.level.reserved + v.quantity })
            .collect::<Vec<_>>();
        let levels = batch.iter().zip(&next).map(|(v, l)| v.variant(*l)).collect();
        let reservation = Reservation::new(&quantities);
        let result = persist(reservation.clone(), levels).await?;
        for (v, level) in batch.iter_mut().zip(next) {
            *v.level = level;
        }
        debug!("📦️ Reservation {} holds {} variant(s)", reservation.id, reservation.items.len());
        self.reservations.lock().await.held.insert(reservation.id.clone(), reservation);
        Ok(result)
    }

    pub async fn commit(&self, id: &ReservationId) -> Result<Settlement<()>, LedgerError> {
        self.commit_with(id, |_| async { Ok(()) }).await
    }

    /// Finalises a held reservation: `stock` and `reserved` both drop by the reserved quantities.
    ///
    /// Committing an already committed reservation returns [`Settlement::AlreadySettled`] without calling
    /// `persist`. Committing a released reservation fails with [`LedgerError::ReservationReleased`].
    pub async fn commit_with<F, Fut, T, E>(&self, id: &ReservationId, persist: F) -> Result<Settlement<T>, E>
    where
        F: FnOnce(Vec<Variant>) -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: From<LedgerError>,
    {
        self.settle_with(id, Settle::Commit, persist).await
    }

    pub async fn release(&self, id: &ReservationId) -> Result<Settlement<()>, LedgerError> {
        self.release_with(id, |_| async { Ok(()) }).await
    }

    /// Drops a held reservation: `reserved` drops by the reserved quantities, `stock` is unchanged.
    ///
    /// Releasing an already released reservation returns [`Settlement::AlreadySettled`] without calling `persist`.
    /// Releasing a committed reservation fails with [`LedgerError::ReservationCommitted`].
    pub async fn release_with<F, Fut, T, E>(&self, id: &ReservationId, persist: F) -> Result<Settlement<T>, E>
    where
        F: FnOnce(Vec<Variant>) -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: From<LedgerError>,
    {
        self.settle_with(id, Settle::Release, persist).await
    }

    pub async fn restock(&self, items: &[ReservationItem]) -> Result<Vec<Variant>, LedgerError> {
        self.restock_with(items, |levels| async move { Ok(levels) }).await
    }

    /// Adds fresh, unreserved stock, e.g. for goods returned after a sale was committed.
    pub async fn restock_with<F, Fut, T, E>(&self, items: &[ReservationItem], persist: F) -> Result<T, E>
    where
        F: FnOnce(Vec<Variant>) -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: From<LedgerError>,
    {
        let quantities = aggregate(items)?;
        let mut batch = self.lock_batch(&quantities).await?;
        let mut next = Vec::with_capacity(batch.len());
        for v in &batch {
            let stock = v.level.stock.checked_add(v.quantity).ok_or_else(|| LedgerError::Overflow(v.key.clone()))?;
            next.push(StockLevel { stock, reserved: v.level.reserved });
        }
        let levels = batch.iter().zip(&next).map(|(v, l)| v.variant(*l)).collect();
        let result = persist(levels).await?;
        for (v, level) in batch.iter_mut().zip(next) {
            debug!("📦️ Restocked {} units of {}. Stock is now {}", v.quantity, v.key, level.stock);
            *v.level = level;
        }
        Ok(result)
    }

    async fn settle_with<F, Fut, T, E>(&self, id: &ReservationId, settle: Settle, persist: F) -> Result<Settlement<T>, E>
    where
        F: FnOnce(Vec<Variant>) -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: From<LedgerError>,
    {
        let quantities =
            self.reservation(id).await.ok_or_else(|| LedgerError::UnknownReservation(id.clone()))?.quantities();
        let mut batch = self.lock_batch(&quantities).await?;
        // A reservation's state only changes while all of its variant locks are held, so it is stable from here on.
        let state = self
            .reservations
            .lock()
            .await
            .get(id)
            .map(|r| r.state)
            .ok_or_else(|| LedgerError::UnknownReservation(id.clone()))?;
        match (state, settle) {
            (ReservationState::Committed, Settle::Commit) | (ReservationState::Released, Settle::Release) => {
                trace!("📦️ Reservation {id} is already {state:?}. Nothing to do.");
                return Ok(Settlement::AlreadySettled);
            },
            (ReservationState::Released, Settle::Commit) => {
                return Err(LedgerError::ReservationReleased(id.clone()).into());
            },
            (ReservationState::Committed, Settle::Release) => {
                return Err(LedgerError::ReservationCommitted(id.clone()).into());
            },
            (ReservationState::Held, _) => {},
        }
        let mut next = Vec::with_capacity(batch.len());
        for v in &batch {
            let inconsistent = || LedgerError::InconsistentLevels(v.key.clone());
            let reserved = v.level.reserved.checked_sub(v.quantity).ok_or_else(inconsistent)?;
            let stock = match settle {
                Settle::Commit => v.level.stock.checked_sub(v.quantity).ok_or_else(inconsistent)?,
                Settle::Release => v.level.stock,
            };
            next.push(StockLevel { stock, reserved });
        }
        let levels = batch.iter().zip(&next).map(|(v, l)| v.variant(*l)).collect();
        let result = persist(levels).await?;
        for (v, level) in batch.iter_mut().zip(next) {
            *v.level = level;
        }
        let new_state = match settle {
            Settle::Commit => ReservationState::Committed,
            Settle::Release => ReservationState::Released,
        };
        self.reservations.lock().await.settle(id, new_state, Utc::now());
        debug!("📦️ Reservation {id} is now {new_state:?}");
        Ok(Settlement::Applied(result))
    }

    /// Locks the cells for every key in `quantities`, in key order.
    async fn lock_batch(&self, quantities: &BTreeMap<VariantKey, u32>) -> Result<Vec<LockedVariant>, LedgerError> {
        let cells = {
            let index = self.cells.read().await;
            quantities
                .iter()
                .map(|(key, qty)| {
                    index
                        .get(key)
                        .map(|cell| (key.clone(), *qty, Arc::clone(cell)))
                        .ok_or_else(|| LedgerError::UnknownVariant(key.clone()))
                })
                .collect::<Result<Vec<_>, _>>()?
        };
        let mut batch = Vec::with_capacity(cells.len());
        for (key, quantity, cell) in cells {
            trace!("📦️ Locking {key}");
            let level = cell.lock_owned().await;
            batch.push(LockedVariant { key, quantity, level });
        }
        Ok(batch)
    }
}
