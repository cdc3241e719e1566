//! Position store
//!
//! Authoritative in-memory set of open positions, grouped per chain.
//! Every operation is atomic on its own; readers always get copies, so a
//! reporting layer can poll while monitor loops mutate.

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::collections::HashMap;
use tracing::{debug, info};

use crate::chain::Chain;
use crate::error::{Error, Result};
use crate::position::types::Position;

/// Open positions keyed by chain, plus an id index for O(1) lookups
#[derive(Default)]
pub struct PositionStore {
    books: DashMap<Chain, HashMap<String, Position>>,
    index: DashMap<String, Chain>,
}

impl PositionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a freshly opened position
    pub fn add(&self, position: Position) -> Result<()> {
        match self.index.entry(position.id.clone()) {
            Entry::Occupied(_) => Err(Error::DuplicateId(position.id)),
            Entry::Vacant(slot) => {
                let chain = position.chain;
                info!(
                    "Opened {} position {} in {} ({} @ {})",
                    chain, position.id, position.token_address, position.quantity,
                    position.entry_price
                );
                self.books
                    .entry(chain)
                    .or_default()
                    .insert(position.id.clone(), position);
                slot.insert(chain);
                Ok(())
            }
        }
    }

    /// Remove a position, returning it
    pub fn remove(&self, id: &str) -> Result<Position> {
        let (_, chain) = self
            .index
            .remove(id)
            .ok_or_else(|| Error::NotFound(id.to_string()))?;

        let removed = self
            .books
            .get_mut(&chain)
            .and_then(|mut book| book.remove(id));

        match removed {
            Some(position) => {
                debug!("Removed {} position {}", chain, id);
                Ok(position)
            }
            None => Err(Error::Internal(format!(
                "position {} indexed on {} but missing from its book",
                id, chain
            ))),
        }
    }

    /// Raise the trailing stop of a position. Lower highs are ignored so
    /// `highest_price_seen` never decreases. Returns whether anything changed.
    pub fn apply_trailing(&self, id: &str, highest: f64, stop: f64) -> Result<bool> {
        let chain = self.chain_of(id)?;
        let mut book = self
            .books
            .get_mut(&chain)
            .ok_or_else(|| Error::NotFound(id.to_string()))?;
        let position = book
            .get_mut(id)
            .ok_or_else(|| Error::NotFound(id.to_string()))?;

        if highest > position.highest_price_seen {
            position.highest_price_seen = highest;
            position.stop_price = stop;
            Ok(true)
        } else {
            Ok(false)
        }
    }

    /// Copy of one position
    pub fn get(&self, id: &str) -> Option<Position> {
        let chain = *self.index.get(id)?;
        self.books.get(&chain)?.get(id).cloned()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.index.contains_key(id)
    }

    /// Snapshot of the positions open on a chain, oldest first
    pub fn list_by_chain(&self, chain: Chain) -> Vec<Position> {
        let mut positions: Vec<Position> = self
            .books
            .get(&chain)
            .map(|book| book.values().cloned().collect())
            .unwrap_or_default();
        positions.sort_by_key(|p| p.opened_at);
        positions
    }

    /// Snapshot of every open position
    pub fn all(&self) -> Vec<Position> {
        let mut positions: Vec<Position> = self
            .books
            .iter()
            .flat_map(|book| book.values().cloned().collect::<Vec<_>>())
            .collect();
        positions.sort_by_key(|p| p.opened_at);
        positions
    }

    /// Number of positions open on a chain
    pub fn count(&self, chain: Chain) -> usize {
        self.books.get(&chain).map(|book| book.len()).unwrap_or(0)
    }

    pub fn total_count(&self) -> usize {
        self.index.len()
    }

    /// Whether a position in this token is already open on the chain
    pub fn holds_token(&self, chain: Chain, token_address: &str) -> bool {
        self.books
            .get(&chain)
            .map(|book| book.values().any(|p| p.token_address == token_address))
            .unwrap_or(false)
    }

    fn chain_of(&self, id: &str) -> Result<Chain> {
        self.index
            .get(id)
            .map(|chain| *chain)
            .ok_or_else(|| Error::NotFound(id.to_string()))
    }
}
