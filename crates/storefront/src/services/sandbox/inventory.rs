//! Sandbox stock ledger.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Duration, Utc};
use veloura_core::{HolderId, ProductId, ShadeId, TicketId};

use super::lock;
use crate::checkout::Clock;
use crate::services::{
    InventoryService, ReleaseReason, ReservationLine, ReserveOutcome, ServiceError, UnavailableLine,
};

type StockKey = (ProductId, Option<ShadeId>);

#[derive(Debug, Clone)]
struct Hold {
    holder: HolderId,
    lines: Vec<ReservationLine>,
    expires_at: DateTime<Utc>,
}

#[derive(Debug)]
struct Ledger {
    on_hand: HashMap<StockKey, u32>,
    sold: HashMap<StockKey, u32>,
    holds: HashMap<TicketId, Hold>,
    default_stock: u32,
    next_ticket: u64,
}

impl Ledger {
    fn available(&self, key: &StockKey) -> u32 {
        self.on_hand.get(key).copied().unwrap_or(self.default_stock)
    }

    fn restock(&mut self, lines: &[ReservationLine]) {
        for line in lines {
            let key = key_of(line);
            let current = self.available(&key);
            self.on_hand.insert(key, current.saturating_add(line.quantity));
        }
    }

    fn reap(&mut self, now: DateTime<Utc>) -> usize {
        let expired: Vec<TicketId> = self
            .holds
            .iter()
            .filter(|(_, hold)| now >= hold.expires_at)
            .map(|(id, _)| id.clone())
            .collect();
        for id in &expired {
            if let Some(hold) = self.holds.remove(id) {
                self.restock(&hold.lines);
            }
        }
        expired.len()
    }
}

fn key_of(line: &ReservationLine) -> StockKey {
    (line.product_id.clone(), line.shade_id.clone())
}

/// In-memory inventory service.
///
/// Products without an explicit stock level start with the default stock.
/// Holds lapse after the configured TTL, measured on the injected clock, and
/// are reaped lazily on every call or explicitly through
/// [`SandboxInventory::reap_expired`].
#[derive(Clone)]
pub struct SandboxInventory {
    ledger: Arc<Mutex<Ledger>>,
    hold_ttl: Duration,
    clock: Arc<dyn Clock>,
}

impl std::fmt::Debug for SandboxInventory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SandboxInventory")
            .field("ledger", &self.ledger)
            .field("hold_ttl", &self.hold_ttl)
            .finish_non_exhaustive()
    }
}

impl SandboxInventory {
    pub const DEFAULT_STOCK: u32 = 100;

    #[must_use]
    pub fn new(hold_ttl: Duration, clock: Arc<dyn Clock>) -> Self {
        Self::with_default_stock(Self::DEFAULT_STOCK, hold_ttl, clock)
    }

    #[must_use]
    pub fn with_default_stock(default_stock: u32, hold_ttl: Duration, clock: Arc<dyn Clock>) -> Self {
        Self {
            ledger: Arc::new(Mutex::new(Ledger {
                on_hand: HashMap::new(),
                sold: HashMap::new(),
                holds: HashMap::new(),
                default_stock,
                next_ticket: 1,
            })),
            hold_ttl,
            clock,
        }
    }

    /// Set the stock on hand for one product and shade.
    pub fn set_stock(&self, product_id: &ProductId, shade_id: Option<&ShadeId>, quantity: u32) {
        lock(&self.ledger)
            .on_hand
            .insert((product_id.clone(), shade_id.cloned()), quantity);
    }

    /// Units that can currently be reserved.
    #[must_use]
    pub fn available(&self, product_id: &ProductId, shade_id: Option<&ShadeId>) -> u32 {
        lock(&self.ledger).available(&(product_id.clone(), shade_id.cloned()))
    }

    /// Units sold through committed reservations.
    #[must_use]
    pub fn sold(&self, product_id: &ProductId, shade_id: Option<&ShadeId>) -> u32 {
        lock(&self.ledger)
            .sold
            .get(&(product_id.clone(), shade_id.cloned()))
            .copied()
            .unwrap_or(0)
    }

    /// Number of holds not yet committed, released or reaped.
    #[must_use]
    pub fn outstanding_holds(&self) -> usize {
        lock(&self.ledger).holds.len()
    }

    /// Return stock from holds that have expired by the clock's current time.
    pub fn reap_expired(&self) -> usize {
        let reaped = lock(&self.ledger).reap(self.clock.now());
        if reaped > 0 {
            tracing::info!(reaped, "expired reservations reaped");
        }
        reaped
    }
}

impl InventoryService for SandboxInventory {
    async fn reserve(&self, items: &[ReservationLine], holder: &HolderId) -> Result<ReserveOutcome, ServiceError> {
        let now = self.clock.now();
        let mut ledger = lock(&self.ledger);
        ledger.reap(now);

        // Aggregate repeated keys so two lines cannot each pass on their own.
        let mut wanted: HashMap<StockKey, u32> = HashMap::new();
        for line in items {
            let total = wanted.entry(key_of(line)).or_default();
            *total = total.saturating_add(line.quantity);
        }

        let unavailable: Vec<UnavailableLine> = items
            .iter()
            .filter(|line| wanted.get(&key_of(line)).copied().unwrap_or(0) > ledger.available(&key_of(line)))
            .map(|line| UnavailableLine {
                product_id: line.product_id.clone(),
                shade_id: line.shade_id.clone(),
                requested: line.quantity,
                reason: "insufficient_stock".to_string(),
            })
            .collect();
        if !unavailable.is_empty() {
            return Ok(ReserveOutcome::Rejected { unavailable });
        }

        for (key, quantity) in wanted {
            let remaining = ledger.available(&key) - quantity;
            ledger.on_hand.insert(key, remaining);
        }

        let ticket_id = TicketId::new(format!("T{}", ledger.next_ticket));
        ledger.next_ticket += 1;
        let expires_at = now + self.hold_ttl;
        ledger.holds.insert(
            ticket_id.clone(),
            Hold {
                holder: holder.clone(),
                lines: items.to_vec(),
                expires_at,
            },
        );
        drop(ledger);

        tracing::debug!(ticket_id = %ticket_id, holder = %holder, "sandbox reservation");
        Ok(ReserveOutcome::Reserved {
            ticket_id,
            expires_at: Some(expires_at),
        })
    }

    async fn release(
        &self,
        items: &[ReservationLine],
        holder: &HolderId,
        ticket_id: Option<&TicketId>,
        reason: ReleaseReason,
    ) -> Result<(), ServiceError> {
        let mut ledger = lock(&self.ledger);
        let ticket = match ticket_id {
            Some(id) => ledger
                .holds
                .get(id)
                .filter(|hold| &hold.holder == holder)
                .map(|_| id.clone()),
            None => ledger
                .holds
                .iter()
                .filter(|(_, hold)| &hold.holder == holder && hold.lines == items)
                .min_by_key(|(_, hold)| hold.expires_at)
                .map(|(id, _)| id.clone()),
        };

        // Releasing something already reaped or never held is a no-op.
        if let Some((id, hold)) = ticket.and_then(|id| ledger.holds.remove_entry(&id)) {
            ledger.restock(&hold.lines);
            tracing::debug!(ticket_id = %id, holder = %holder, reason = reason.as_str(), "sandbox release");
        }
        Ok(())
    }

    async fn commit(&self, ticket_id: &TicketId) -> Result<(), ServiceError> {
        let mut ledger = lock(&self.ledger);
        ledger.reap(self.clock.now());

        let hold = ledger.holds.remove(ticket_id).ok_or_else(|| ServiceError::Api {
            status: 410,
            message: format!("reservation {ticket_id} not found or expired"),
        })?;
        for line in &hold.lines {
            let sold = ledger.sold.entry(key_of(line)).or_default();
            *sold = sold.saturating_add(line.quantity);
        }
        Ok(())
    }
}
