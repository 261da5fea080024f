// src/pipeline/reconcile.rs

//! Merges observations into the persisted price history.
//!
//! Each call reads, compares and writes inside one store transaction.

use chrono::{DateTime, Utc};

use crate::error::Result;
use crate::models::{ExpirySignal, ListingRecord, ObservedListing, Observation, PriceUpdate};
use crate::storage::ListingStore;

/// What reconciling one observation did to the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// First sighting, row created
    Inserted,
    /// Price changed, history merged
    Updated,
    /// Same price as stored, nothing written
    Unchanged,
    /// Expiry date recorded
    Expired,
    /// Still online, check timestamp refreshed
    Confirmed,
    /// Price missing or not positive, nothing written
    Rejected,
    /// Row missing or already expired, nothing written
    Skipped,
}

/// Reconcile one observation against the store as one transaction.
pub fn reconcile<S: ListingStore>(
    store: &S,
    observation: &Observation,
    now: DateTime<Utc>,
) -> Result<Outcome> {
    store.atomically(|store| match observation {
        Observation::Listing(listing) => apply_listing(store, listing, now),
        Observation::Expired(signal) => apply_expiry(store, signal, now),
        Observation::StillListed { row_id, item_id } => {
            if store.find_by_id(*row_id)?.is_none() {
                log::warn!("listing {item_id} (row {row_id}) vanished before its check");
                return Ok(Outcome::Skipped);
            }
            store.mark_checked(*row_id, now)?;
            Ok(Outcome::Confirmed)
        }
    })
}

fn apply_listing<S: ListingStore>(
    store: &S,
    observed: &ObservedListing,
    now: DateTime<Utc>,
) -> Result<Outcome> {
    if !observed.has_valid_price() {
        log::warn!(
            "rejecting listing {} with price {} ({})",
            observed.item_id,
            observed.current_price,
            observed.url
        );
        return Ok(Outcome::Rejected);
    }

    let Some(stored) = store.find_by_item_id(&observed.item_id)? else {
        let id = store.insert(&new_record(observed, now))?;
        log::debug!("inserted listing {} as row {}", observed.item_id, id);
        return Ok(Outcome::Inserted);
    };

    if stored.is_expired() {
        log::debug!("listing {} is expired, ignoring observation", observed.item_id);
        return Ok(Outcome::Skipped);
    }

    if stored.current_price == observed.current_price {
        return Ok(Outcome::Unchanged);
    }

    log::info!(
        "price for item {} changed: {} -> {}",
        observed.item_id,
        stored.current_price,
        observed.current_price
    );
    store.update_by_id(stored.id, &merge(&stored, observed, now))?;
    Ok(Outcome::Updated)
}

fn apply_expiry<S: ListingStore>(
    store: &S,
    signal: &ExpirySignal,
    now: DateTime<Utc>,
) -> Result<Outcome> {
    let stored = match signal.row_id {
        Some(id) => store.find_by_id(id)?,
        None => store.find_by_item_id(&signal.item_id)?,
    };

    let Some(stored) = stored else {
        log::warn!("expired listing {} is not stored", signal.item_id);
        return Ok(Outcome::Skipped);
    };

    store.mark_expired(stored.id, signal.expiry_date, now)?;
    if stored.is_expired() {
        return Ok(Outcome::Skipped);
    }

    log::info!("listing {} expired ({})", signal.item_id, signal.url);
    Ok(Outcome::Expired)
}

/// A fresh row: every price equals the observed one.
pub fn new_record(observed: &ObservedListing, now: DateTime<Utc>) -> ListingRecord {
    let price = observed.current_price;
    let edit_date = observed.edit_date;

    ListingRecord {
        id: 0,
        item_id: observed.item_id.clone(),
        deal: observed.deal,
        kind: observed.kind,
        current_price: price,
        min_price: price,
        max_price: price,
        previous_price: price,
        min_price_date: edit_date,
        max_price_date: edit_date,
        previous_price_date: edit_date,
        edit_date,
        price_per_m2: observed.price_per_m2(),
        size: observed.size,
        room_count: observed.room_count,
        postal_code: observed.postal_code.clone(),
        district: observed.district.clone(),
        address: observed.address.clone(),
        energy_info: observed.energy_info.clone(),
        heating_consumption: observed.heating_consumption,
        features_info: observed.features_info.clone(),
        contract_duration: observed.contract_duration.clone(),
        construction_type: observed.construction_type.clone(),
        has_commission: observed.has_commission,
        seller_is_private: observed.seller_is_private,
        title: observed.title.clone(),
        description: observed.description.clone(),
        url: observed.url.clone(),
        published_at: observed.published_at,
        discovery_date: now.date_naive(),
        discovery_timestamp: now.timestamp(),
        expiry_date: None,
        expiry_last_check: now,
    }
}

/// Merge a changed price into the stored history.
///
/// Bounds only widen and the edit date never moves backwards.
pub fn merge(stored: &ListingRecord, observed: &ObservedListing, now: DateTime<Utc>) -> PriceUpdate {
    let price = observed.current_price;

    let (max_price, max_price_date) = if price > stored.max_price {
        (price, observed.edit_date)
    } else {
        (stored.max_price, stored.max_price_date)
    };
    let (min_price, min_price_date) = if price < stored.min_price {
        (price, observed.edit_date)
    } else {
        (stored.min_price, stored.min_price_date)
    };

    PriceUpdate {
        current_price: price,
        previous_price: stored.current_price,
        previous_price_date: stored.edit_date,
        min_price,
        min_price_date,
        max_price,
        max_price_date,
        edit_date: stored.edit_date.max(observed.edit_date),
        price_per_m2: observed.price_per_m2(),
        checked_at: now,
    }
}
