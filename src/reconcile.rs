use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use log::warn;

use crate::error::StoreError;
use crate::models::{ChangedEvent, Event};
use crate::store::CatalogStore;

/// Outcome of diffing a fresh candidate against the stored event for the
/// same source URL.
#[derive(Debug, Clone, PartialEq)]
pub enum ReconcileAction {
    Insert(Event),
    NoOp,
    Update {
        merged: Event,
        changes: Vec<ChangedEvent>,
    },
}

/// What a committed reconciliation did, for crawl-summary tallies.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconcileOutcome {
    Inserted,
    Updated(usize),
    Unchanged,
}

/// Pure field-by-field diff. Fields are compared in a fixed order so the
/// emitted change records are deterministic: title, dateStart, dateEnd,
/// price, ticketLink, imageLink, location, category. An update overwrites
/// every field with the candidate's value and marks the event updated.
pub fn reconcile(candidate: &Event, existing: Option<&Event>, now: DateTime<Utc>) -> ReconcileAction {
    let existing = match existing {
        Some(existing) => existing,
        None => return ReconcileAction::Insert(candidate.clone()),
    };

    let mut changes = Vec::new();
    let mut record = |field: &str, old: String, new: String| {
        if old != new {
            changes.push(ChangedEvent::new(&existing.id, field, &old, &new, now));
        }
    };

    record("title", existing.title.clone(), candidate.title.clone());
    record(
        "dateStart",
        existing.date_start.to_rfc3339(),
        candidate.date_start.to_rfc3339(),
    );
    record(
        "dateEnd",
        existing.date_end.to_rfc3339(),
        candidate.date_end.to_rfc3339(),
    );
    record("price", format_price(existing.price), format_price(candidate.price));
    record(
        "ticketLink",
        optional(existing.ticket_link.as_deref()),
        optional(candidate.ticket_link.as_deref()),
    );
    record(
        "imageLink",
        optional(existing.image_link.as_deref()),
        optional(candidate.image_link.as_deref()),
    );
    // Location and category compare by full identity, not by the rendered
    // name: an address or source-URL change under an unchanged name is
    // still a change.
    if existing.location != candidate.location {
        changes.push(ChangedEvent::new(
            &existing.id,
            "location",
            &existing.location.name,
            &candidate.location.name,
            now,
        ));
    }
    if existing.category != candidate.category {
        changes.push(ChangedEvent::new(
            &existing.id,
            "category",
            &existing.category.name,
            &candidate.category.name,
            now,
        ));
    }

    if changes.is_empty() {
        return ReconcileAction::NoOp;
    }

    let mut merged = candidate.clone();
    merged.id = existing.id.clone();
    merged.updated = true;
    ReconcileAction::Update { merged, changes }
}

fn format_price(price: f64) -> String {
    if price.fract() == 0.0 {
        format!("{price:.0}")
    } else {
        price.to_string()
    }
}

fn optional(value: Option<&str>) -> String {
    value.unwrap_or_default().to_string()
}

/// Serializes reconciliation per source URL. Two overlapping crawl runs
/// touching the same event take turns on a keyed async mutex, so neither
/// can read stale state and double-append conflicting change records. A
/// conflict that slips through anyway is retried once against a re-read
/// event.
#[derive(Default)]
pub struct ReconciliationEngine {
    locks: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
}

impl ReconciliationEngine {
    pub fn new() -> Self {
        Self::default()
    }

    fn key_lock(&self, source_url: &str) -> Arc<tokio::sync::Mutex<()>> {
        let mut locks = self.locks.lock().expect("key lock map poisoned");
        locks
            .entry(source_url.to_string())
            .or_insert_with(|| Arc::new(tokio::sync::Mutex::new(())))
            .clone()
    }

    /// Drops a key's mutex once nobody but the map holds it, so the map
    /// does not grow by one entry per source URL ever reconciled.
    fn release_key_lock(&self, source_url: &str, lock: Arc<tokio::sync::Mutex<()>>) {
        let mut locks = self.locks.lock().expect("key lock map poisoned");
        if let Some(entry) = locks.get(source_url) {
            // Two strong counts: the map's entry and our handle.
            if Arc::ptr_eq(entry, &lock) && Arc::strong_count(entry) <= 2 {
                locks.remove(source_url);
            }
        }
    }

    pub async fn commit(
        &self,
        store: &dyn CatalogStore,
        candidate: Event,
    ) -> Result<ReconcileOutcome, StoreError> {
        let lock = self.key_lock(&candidate.source_url);
        let result = {
            let _guard = lock.lock().await;
            match self.commit_once(store, &candidate) {
                Err(StoreError::Conflict { event_id }) => {
                    warn!("reconcile conflict on event {event_id}, retrying once");
                    self.commit_once(store, &candidate)
                }
                other => other,
            }
        };
        self.release_key_lock(&candidate.source_url, lock);
        result
    }

    fn commit_once(
        &self,
        store: &dyn CatalogStore,
        candidate: &Event,
    ) -> Result<ReconcileOutcome, StoreError> {
        let existing = store.event_by_source_url(&candidate.source_url)?;
        match reconcile(candidate, existing.as_ref(), Utc::now()) {
            ReconcileAction::Insert(event) => {
                store.upsert_event(&event, None)?;
                Ok(ReconcileOutcome::Inserted)
            }
            ReconcileAction::NoOp => Ok(ReconcileOutcome::Unchanged),
            ReconcileAction::Update { merged, changes } => {
                store.upsert_event(&merged, existing.as_ref())?;
                let count = changes.len();
                for change in &changes {
                    store.append_change(change)?;
                }
                Ok(ReconcileOutcome::Updated(count))
            }
        }
    }
}
