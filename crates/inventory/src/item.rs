//! Catalog item: the droppable product and its stock.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use dropshop_core::{DomainError, DomainResult, Entity, ItemId};

use crate::stock::StockLevel;

/// A limited-stock item offered in a drop.
///
/// Stock moves only through [`take_unit`](Item::take_unit) and
/// [`return_unit`](Item::return_unit), and only while the caller holds the
/// item's exclusive storage section. Everything else is display metadata;
/// `starts_at` in particular does not gate reservations.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Item {
    pub id: ItemId,
    pub name: String,
    pub price_cents: u64,
    pub image_url: Option<String>,
    pub starts_at: DateTime<Utc>,
    pub stock: StockLevel,
    pub created_at: DateTime<Utc>,
}

impl Item {
    pub fn new(
        name: impl Into<String>,
        price_cents: u64,
        total_stock: u32,
        image_url: Option<String>,
        starts_at: Option<DateTime<Utc>>,
    ) -> DomainResult<Self> {
        let name = name.into();
        if name.trim().is_empty() {
            return Err(DomainError::validation("name cannot be empty"));
        }
        if price_cents == 0 {
            return Err(DomainError::validation("price must be positive"));
        }
        let now = Utc::now();
        Ok(Self {
            id: ItemId::new(),
            name,
            price_cents,
            image_url,
            starts_at: starts_at.unwrap_or(now),
            stock: StockLevel::new(total_stock)?,
            created_at: now,
        })
    }

    pub fn available_stock(&self) -> u32 {
        self.stock.available()
    }

    pub fn total_stock(&self) -> u32 {
        self.stock.total()
    }

    /// Debit one unit; `false` when sold out (no state change).
    pub fn take_unit(&mut self) -> bool {
        self.stock.take_unit()
    }

    /// Credit one unit back, failing on overrun past total stock.
    pub fn return_unit(&mut self) -> DomainResult<()> {
        self.stock.return_unit()
    }
}

impl Entity for Item {
    type Id = ItemId;

    fn id(&self) -> &Self::Id {
        &self.id
    }
}
