use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::sync::{Mutex, RwLock};

use chrono::Utc;
use rusqlite::{params, Connection};

use crate::error::StoreError;
use crate::models::{Category, ChangedEvent, Event, Location};

/// Narrow persistence surface the pipeline and query engine work against.
///
/// `upsert_event` is compare-and-swap: `prior` is the event as it was read
/// before reconciliation (None for a first sighting). If the stored state
/// no longer matches `prior`, the write is rejected with
/// [`StoreError::Conflict`] so the caller can re-read and retry.
pub trait CatalogStore: Send + Sync {
    fn event_by_source_url(&self, source_url: &str) -> Result<Option<Event>, StoreError>;
    fn events(&self) -> Result<Vec<Event>, StoreError>;
    fn upsert_event(&self, event: &Event, prior: Option<&Event>) -> Result<(), StoreError>;
    fn delete_event(&self, id: &str) -> Result<(), StoreError>;

    /// Change records are append-only and returned ordered by change time.
    fn append_change(&self, change: &ChangedEvent) -> Result<(), StoreError>;
    fn changes_for_event(&self, event_id: &str) -> Result<Vec<ChangedEvent>, StoreError>;

    fn upsert_category(&self, category: &Category) -> Result<(), StoreError>;
    fn categories(&self) -> Result<Vec<Category>, StoreError>;
    fn upsert_location(&self, location: &Location) -> Result<(), StoreError>;

    fn blacklisted_category_names(&self) -> Result<HashSet<String>, StoreError>;
    fn add_blacklisted_category_name(&self, name: &str) -> Result<(), StoreError>;
    fn blacklisted_pages(&self) -> Result<HashSet<String>, StoreError>;
    fn add_blacklisted_page(&self, url: &str) -> Result<(), StoreError>;
}

// ---------------------------------------------------------------------------
// In-memory store
// ---------------------------------------------------------------------------

#[derive(Default)]
struct MemoryInner {
    events: HashMap<String, Event>,
    changes: Vec<ChangedEvent>,
    categories: HashMap<String, Category>,
    locations: HashMap<String, Location>,
    blacklisted_names: HashSet<String>,
    blacklisted_pages: HashSet<String>,
}

/// RwLock'd map store used by tests and embedders that do not need
/// durability.
#[derive(Default)]
pub struct MemoryStore {
    inner: RwLock<MemoryInner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, MemoryInner> {
        self.inner.read().expect("store lock poisoned")
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, MemoryInner> {
        self.inner.write().expect("store lock poisoned")
    }
}

impl CatalogStore for MemoryStore {
    fn event_by_source_url(&self, source_url: &str) -> Result<Option<Event>, StoreError> {
        let id = Event::id_for_source_url(source_url);
        Ok(self.read().events.get(&id).cloned())
    }

    fn events(&self) -> Result<Vec<Event>, StoreError> {
        Ok(self.read().events.values().cloned().collect())
    }

    fn upsert_event(&self, event: &Event, prior: Option<&Event>) -> Result<(), StoreError> {
        let mut inner = self.write();
        let matches_prior = match (inner.events.get(&event.id), prior) {
            (None, None) => true,
            (Some(stored), Some(expected)) => stored == expected,
            _ => false,
        };
        if !matches_prior {
            return Err(StoreError::Conflict {
                event_id: event.id.clone(),
            });
        }
        inner.events.insert(event.id.clone(), event.clone());
        Ok(())
    }

    fn delete_event(&self, id: &str) -> Result<(), StoreError> {
        self.write().events.remove(id);
        Ok(())
    }

    fn append_change(&self, change: &ChangedEvent) -> Result<(), StoreError> {
        self.write().changes.push(change.clone());
        Ok(())
    }

    fn changes_for_event(&self, event_id: &str) -> Result<Vec<ChangedEvent>, StoreError> {
        let inner = self.read();
        let mut changes: Vec<ChangedEvent> = inner
            .changes
            .iter()
            .filter(|change| change.event_id == event_id)
            .cloned()
            .collect();
        changes.sort_by_key(|change| change.change_time);
        Ok(changes)
    }

    fn upsert_category(&self, category: &Category) -> Result<(), StoreError> {
        self.write()
            .categories
            .insert(category.id.clone(), category.clone());
        Ok(())
    }

    fn categories(&self) -> Result<Vec<Category>, StoreError> {
        Ok(self.read().categories.values().cloned().collect())
    }

    fn upsert_location(&self, location: &Location) -> Result<(), StoreError> {
        self.write()
            .locations
            .insert(location.id.clone(), location.clone());
        Ok(())
    }

    fn blacklisted_category_names(&self) -> Result<HashSet<String>, StoreError> {
        Ok(self.read().blacklisted_names.clone())
    }

    fn add_blacklisted_category_name(&self, name: &str) -> Result<(), StoreError> {
        self.write().blacklisted_names.insert(name.to_string());
        Ok(())
    }

    fn blacklisted_pages(&self) -> Result<HashSet<String>, StoreError> {
        Ok(self.read().blacklisted_pages.clone())
    }

    fn add_blacklisted_page(&self, url: &str) -> Result<(), StoreError> {
        self.write().blacklisted_pages.insert(url.to_string());
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Sqlite store
// ---------------------------------------------------------------------------

/// Sqlite-backed store. Entities are persisted as JSON payload columns
/// keyed by id, with the source URL indexed separately for event lookup.
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    pub fn open_default() -> Result<Self, StoreError> {
        Self::open(&crate::utils::database_path())
    }

    pub fn open(path: &Path) -> Result<Self, StoreError> {
        let conn = Connection::open(path)?;
        let store = Self {
            conn: Mutex::new(conn),
        };
        store.init_schema()?;
        Ok(store)
    }

    fn init_schema(&self) -> Result<(), StoreError> {
        let conn = self.lock();
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS events(
                id TEXT PRIMARY KEY,
                source_url TEXT NOT NULL UNIQUE,
                payload TEXT NOT NULL,
                first_seen_utc TEXT NOT NULL,
                last_seen_utc TEXT NOT NULL
            );
            CREATE TABLE IF NOT EXISTS changed_events(
                id TEXT PRIMARY KEY,
                event_id TEXT NOT NULL,
                payload TEXT NOT NULL,
                change_time_utc TEXT NOT NULL
            );
            CREATE TABLE IF NOT EXISTS categories(
                id TEXT PRIMARY KEY,
                payload TEXT NOT NULL
            );
            CREATE TABLE IF NOT EXISTS locations(
                id TEXT PRIMARY KEY,
                payload TEXT NOT NULL
            );
            CREATE TABLE IF NOT EXISTS blacklisted_category_names(
                name TEXT PRIMARY KEY
            );
            CREATE TABLE IF NOT EXISTS blacklisted_pages(
                url TEXT PRIMARY KEY
            );",
        )?;
        Ok(())
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Connection> {
        self.conn.lock().expect("sqlite mutex poisoned")
    }
}

impl CatalogStore for SqliteStore {
    fn event_by_source_url(&self, source_url: &str) -> Result<Option<Event>, StoreError> {
        let conn = self.lock();
        let mut stmt = conn.prepare("SELECT payload FROM events WHERE source_url = ?1")?;
        let mut rows = stmt.query_map(params![source_url], |row| row.get::<_, String>(0))?;
        match rows.next() {
            Some(payload) => Ok(Some(serde_json::from_str(&payload?)?)),
            None => Ok(None),
        }
    }

    fn events(&self) -> Result<Vec<Event>, StoreError> {
        let conn = self.lock();
        let mut stmt = conn.prepare("SELECT payload FROM events")?;
        let rows = stmt.query_map([], |row| row.get::<_, String>(0))?;
        let mut out = Vec::new();
        for payload in rows {
            out.push(serde_json::from_str(&payload?)?);
        }
        Ok(out)
    }

    fn upsert_event(&self, event: &Event, prior: Option<&Event>) -> Result<(), StoreError> {
        let mut conn = self.lock();
        let tx = conn.transaction()?;
        let stored: Option<String> = tx
            .query_row(
                "SELECT payload FROM events WHERE id = ?1",
                params![event.id],
                |row| row.get(0),
            )
            .map(Some)
            .or_else(|err| match err {
                rusqlite::Error::QueryReturnedNoRows => Ok(None),
                other => Err(other),
            })?;

        let matches_prior = match (&stored, prior) {
            (None, None) => true,
            (Some(payload), Some(expected)) => {
                serde_json::from_str::<Event>(payload)? == *expected
            }
            _ => false,
        };
        if !matches_prior {
            return Err(StoreError::Conflict {
                event_id: event.id.clone(),
            });
        }

        let now = Utc::now().to_rfc3339();
        let payload = serde_json::to_string(event)?;
        tx.execute(
            "INSERT INTO events (id, source_url, payload, first_seen_utc, last_seen_utc)
             VALUES (?1, ?2, ?3, ?4, ?4)
             ON CONFLICT(id) DO UPDATE SET
               payload = excluded.payload,
               last_seen_utc = excluded.last_seen_utc",
            params![event.id, event.source_url, payload, now],
        )?;
        tx.commit()?;
        Ok(())
    }

    fn delete_event(&self, id: &str) -> Result<(), StoreError> {
        self.lock()
            .execute("DELETE FROM events WHERE id = ?1", params![id])?;
        Ok(())
    }

    fn append_change(&self, change: &ChangedEvent) -> Result<(), StoreError> {
        let payload = serde_json::to_string(change)?;
        self.lock().execute(
            "INSERT INTO changed_events (id, event_id, payload, change_time_utc)
             VALUES (?1, ?2, ?3, ?4)",
            params![
                change.id,
                change.event_id,
                payload,
                change.change_time.to_rfc3339()
            ],
        )?;
        Ok(())
    }

    fn changes_for_event(&self, event_id: &str) -> Result<Vec<ChangedEvent>, StoreError> {
        let conn = self.lock();
        let mut stmt = conn.prepare(
            "SELECT payload FROM changed_events
             WHERE event_id = ?1 ORDER BY change_time_utc",
        )?;
        let rows = stmt.query_map(params![event_id], |row| row.get::<_, String>(0))?;
        let mut out = Vec::new();
        for payload in rows {
            out.push(serde_json::from_str(&payload?)?);
        }
        Ok(out)
    }

    fn upsert_category(&self, category: &Category) -> Result<(), StoreError> {
        let payload = serde_json::to_string(category)?;
        self.lock().execute(
            "INSERT INTO categories (id, payload) VALUES (?1, ?2)
             ON CONFLICT(id) DO UPDATE SET payload = excluded.payload",
            params![category.id, payload],
        )?;
        Ok(())
    }

    fn categories(&self) -> Result<Vec<Category>, StoreError> {
        let conn = self.lock();
        let mut stmt = conn.prepare("SELECT payload FROM categories")?;
        let rows = stmt.query_map([], |row| row.get::<_, String>(0))?;
        let mut out = Vec::new();
        for payload in rows {
            out.push(serde_json::from_str(&payload?)?);
        }
        Ok(out)
    }

    fn upsert_location(&self, location: &Location) -> Result<(), StoreError> {
        let payload = serde_json::to_string(location)?;
        self.lock().execute(
            "INSERT INTO locations (id, payload) VALUES (?1, ?2)
             ON CONFLICT(id) DO UPDATE SET payload = excluded.payload",
            params![location.id, payload],
        )?;
        Ok(())
    }

    fn blacklisted_category_names(&self) -> Result<HashSet<String>, StoreError> {
        let conn = self.lock();
        let mut stmt = conn.prepare("SELECT name FROM blacklisted_category_names")?;
        let rows = stmt.query_map([], |row| row.get::<_, String>(0))?;
        let mut out = HashSet::new();
        for name in rows {
            out.insert(name?);
        }
        Ok(out)
    }

    fn add_blacklisted_category_name(&self, name: &str) -> Result<(), StoreError> {
        self.lock().execute(
            "INSERT OR IGNORE INTO blacklisted_category_names (name) VALUES (?1)",
            params![name],
        )?;
        Ok(())
    }

    fn blacklisted_pages(&self) -> Result<HashSet<String>, StoreError> {
        let conn = self.lock();
        let mut stmt = conn.prepare("SELECT url FROM blacklisted_pages")?;
        let rows = stmt.query_map([], |row| row.get::<_, String>(0))?;
        let mut out = HashSet::new();
        for url in rows {
            out.insert(url?);
        }
        Ok(out)
    }

    fn add_blacklisted_page(&self, url: &str) -> Result<(), StoreError> {
        self.lock().execute(
            "INSERT OR IGNORE INTO blacklisted_pages (url) VALUES (?1)",
            params![url],
        )?;
        Ok(())
    }
}

/// Used by the binary to push config-authored blacklists into the store
/// before a crawl cycle.
pub fn seed_blacklists(
    store: &dyn CatalogStore,
    names: &[String],
    pages: &[String],
) -> Result<(), StoreError> {
    for name in names {
        store.add_blacklisted_category_name(name)?;
    }
    for page in pages {
        store.add_blacklisted_page(page)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Location;
    use chrono::TimeZone;

    fn sample_event(source_url: &str, price: f64) -> Event {
        let start = Utc.with_ymd_and_hms(2026, 10, 4, 20, 0, 0).unwrap();
        Event {
            id: Event::id_for_source_url(source_url),
            source_url: source_url.to_string(),
            title: "Jazz Night".to_string(),
            date_start: start,
            date_end: start,
            image_link: None,
            price,
            ticket_link: Some("https://tickets.example/jazz".to_string()),
            location: Location::new("Hall", "1 Main St", "Sofia", "Bulgaria"),
            category: Category::new("Music", "https://venue.example/music"),
            updated: false,
            scraped_at: Utc::now(),
        }
    }

    #[test]
    fn memory_store_upserts_and_finds_by_source_url() {
        let store = MemoryStore::new();
        let event = sample_event("https://venue.example/shows/jazz", 10.0);
        store.upsert_event(&event, None).expect("insert");

        let found = store
            .event_by_source_url("https://venue.example/shows/jazz")
            .expect("lookup")
            .expect("present");
        assert_eq!(found, event);
        assert!(store
            .event_by_source_url("https://venue.example/shows/other")
            .expect("lookup")
            .is_none());
    }

    #[test]
    fn memory_store_rejects_stale_prior() {
        let store = MemoryStore::new();
        let event = sample_event("https://venue.example/shows/jazz", 10.0);
        store.upsert_event(&event, None).expect("insert");

        // A second writer that read nothing must not clobber the insert.
        let mut repriced = sample_event("https://venue.example/shows/jazz", 12.5);
        repriced.updated = true;
        let err = store.upsert_event(&repriced, None).unwrap_err();
        assert!(matches!(err, StoreError::Conflict { .. }));

        // With the correct prior the write goes through.
        store.upsert_event(&repriced, Some(&event)).expect("update");
        let found = store
            .event_by_source_url("https://venue.example/shows/jazz")
            .unwrap()
            .unwrap();
        assert_eq!(found.price, 12.5);
    }

    #[test]
    fn sqlite_store_roundtrips_entities() {
        let dir = std::env::temp_dir().join(format!("event-scrape-test-{}", std::process::id()));
        std::fs::create_dir_all(&dir).expect("tmp dir");
        let path = dir.join("store-roundtrip.sqlite");
        let _ = std::fs::remove_file(&path);
        let store = SqliteStore::open(&path).expect("open sqlite");

        let event = sample_event("https://venue.example/shows/jazz", 10.0);
        store.upsert_event(&event, None).expect("insert");
        let found = store
            .event_by_source_url(&event.source_url)
            .expect("lookup")
            .expect("present");
        assert_eq!(found, event);

        let mut repriced = event.clone();
        repriced.price = 12.5;
        repriced.updated = true;
        assert!(matches!(
            store.upsert_event(&repriced, None),
            Err(StoreError::Conflict { .. })
        ));
        store.upsert_event(&repriced, Some(&event)).expect("update");

        let change = ChangedEvent::new(&event.id, "price", "10", "12.5", Utc::now());
        store.append_change(&change).expect("append change");
        let changes = store.changes_for_event(&event.id).expect("changes");
        assert_eq!(changes, vec![change]);

        store
            .add_blacklisted_category_name("Archive")
            .expect("blacklist name");
        assert!(store
            .blacklisted_category_names()
            .expect("names")
            .contains("Archive"));

        let _ = std::fs::remove_file(&path);
    }
}
