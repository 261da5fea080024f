//! SQLite storage implementation.
//!
//! Timestamps that take part in range queries (`expiry_last_check_timestamp`)
//! are stored as Unix seconds; dates shown to people are stored as text.

use std::path::Path;

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use rusqlite::types::{FromSql, FromSqlError, FromSqlResult, ToSql, ToSqlOutput, ValueRef};
use rusqlite::{Connection, OptionalExtension, Row, named_params, params};

use crate::error::{AppError, Result};
use crate::models::{
    Deal, ExpiryCandidate, KnownItems, ListingRecord, PriceUpdate, PropertyKind,
};
use crate::storage::{ListingStore, StoreSummary};

const WATERMARK_KEY: &str = "last_timestamp";
const WATERMARK_FORMAT: &str = "%Y-%m-%d %H:%M:%S";
const EPOCH_WATERMARK: &str = "1970-01-01 00:00:00";

const SCHEMA: &str = r#"
    CREATE TABLE IF NOT EXISTS listings (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        item_id TEXT NOT NULL UNIQUE,
        deal TEXT NOT NULL,
        kind TEXT NOT NULL,

        -- Price history
        current_price INTEGER NOT NULL,
        min_price INTEGER NOT NULL,
        max_price INTEGER NOT NULL,
        previous_price INTEGER NOT NULL,
        min_price_date TEXT NOT NULL,
        max_price_date TEXT NOT NULL,
        previous_price_date TEXT NOT NULL,
        edit_date TEXT NOT NULL,
        price_per_m2 REAL NOT NULL DEFAULT 0,

        -- Description
        size INTEGER NOT NULL DEFAULT 0,
        room_count INTEGER NOT NULL DEFAULT 0,
        postal_code TEXT NOT NULL DEFAULT '',
        district TEXT NOT NULL DEFAULT '',
        address TEXT NOT NULL DEFAULT '',
        energy_info TEXT,
        heating_consumption REAL,
        features_info TEXT,
        contract_duration TEXT,
        construction_type TEXT,
        has_commission INTEGER NOT NULL DEFAULT 1,
        seller_is_private INTEGER NOT NULL DEFAULT 0,
        title TEXT NOT NULL DEFAULT '',
        description TEXT NOT NULL DEFAULT '',
        url TEXT NOT NULL,

        -- Lifecycle
        published_at TEXT,
        discovery_date TEXT NOT NULL,
        discovery_timestamp INTEGER NOT NULL,
        expiry_date TEXT,
        expiry_last_check_timestamp INTEGER NOT NULL
    );

    CREATE INDEX IF NOT EXISTS idx_listings_expiry_check
        ON listings(expiry_last_check_timestamp) WHERE expiry_date IS NULL;

    CREATE TABLE IF NOT EXISTS meta (
        key TEXT PRIMARY KEY,
        value TEXT NOT NULL
    );
"#;

const LISTING_COLUMNS: &str = "id, item_id, deal, kind, \
    current_price, min_price, max_price, previous_price, \
    min_price_date, max_price_date, previous_price_date, edit_date, price_per_m2, \
    size, room_count, postal_code, district, address, energy_info, heating_consumption, \
    features_info, contract_duration, construction_type, has_commission, seller_is_private, \
    title, description, url, published_at, discovery_date, discovery_timestamp, \
    expiry_date, expiry_last_check_timestamp";

impl ToSql for Deal {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(self.as_str().into())
    }
}

impl FromSql for Deal {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        value
            .as_str()?
            .parse()
            .map_err(|e: AppError| FromSqlError::Other(Box::new(e)))
    }
}

impl ToSql for PropertyKind {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(self.as_str().into())
    }
}

impl FromSql for PropertyKind {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        value
            .as_str()?
            .parse()
            .map_err(|e: AppError| FromSqlError::Other(Box::new(e)))
    }
}

/// SQLite-backed listing store.
pub struct SqliteStore {
    conn: Connection,
}

impl SqliteStore {
    /// Open (or create) the database file and make sure the schema exists.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let store = Self {
            conn: Connection::open(path)?,
        };
        store.bootstrap()?;
        log::debug!("Opened listing store at {}", path.display());
        Ok(store)
    }

    /// Open a private in-memory database.
    pub fn in_memory() -> Result<Self> {
        let store = Self {
            conn: Connection::open_in_memory()?,
        };
        store.bootstrap()?;
        Ok(store)
    }

    /// Create tables if absent and seed the watermark with the epoch.
    fn bootstrap(&self) -> Result<()> {
        self.conn.execute_batch(SCHEMA)?;
        let seeded = self.conn.execute(
            "INSERT OR IGNORE INTO meta (key, value) VALUES (?1, ?2)",
            params![WATERMARK_KEY, EPOCH_WATERMARK],
        )?;
        if seeded > 0 {
            log::info!("Initialized empty listing store");
        }
        Ok(())
    }

    fn map_row(row: &Row<'_>) -> rusqlite::Result<ListingRecord> {
        let checked_at: i64 = row.get("expiry_last_check_timestamp")?;
        Ok(ListingRecord {
            id: row.get("id")?,
            item_id: row.get("item_id")?,
            deal: row.get("deal")?,
            kind: row.get("kind")?,
            current_price: row.get("current_price")?,
            min_price: row.get("min_price")?,
            max_price: row.get("max_price")?,
            previous_price: row.get("previous_price")?,
            min_price_date: row.get("min_price_date")?,
            max_price_date: row.get("max_price_date")?,
            previous_price_date: row.get("previous_price_date")?,
            edit_date: row.get("edit_date")?,
            price_per_m2: row.get("price_per_m2")?,
            size: row.get("size")?,
            room_count: row.get("room_count")?,
            postal_code: row.get("postal_code")?,
            district: row.get("district")?,
            address: row.get("address")?,
            energy_info: row.get("energy_info")?,
            heating_consumption: row.get("heating_consumption")?,
            features_info: row.get("features_info")?,
            contract_duration: row.get("contract_duration")?,
            construction_type: row.get("construction_type")?,
            has_commission: row.get("has_commission")?,
            seller_is_private: row.get("seller_is_private")?,
            title: row.get("title")?,
            description: row.get("description")?,
            url: row.get("url")?,
            published_at: row.get("published_at")?,
            discovery_date: row.get("discovery_date")?,
            discovery_timestamp: row.get("discovery_timestamp")?,
            expiry_date: row.get("expiry_date")?,
            expiry_last_check: from_unix(checked_at),
        })
    }

    fn find_one(&self, column: &str, value: &dyn ToSql) -> Result<Option<ListingRecord>> {
        let sql = format!("SELECT {LISTING_COLUMNS} FROM listings WHERE {column} = ?1 LIMIT 1");
        Ok(self
            .conn
            .query_row(&sql, [value], Self::map_row)
            .optional()?)
    }

    fn count(&self, sql: &str) -> Result<usize> {
        let n: i64 = self.conn.query_row(sql, [], |row| row.get(0))?;
        Ok(n as usize)
    }
}

impl ListingStore for SqliteStore {
    fn known_items(&self) -> Result<KnownItems> {
        let mut stmt = self
            .conn
            .prepare("SELECT item_id, current_price FROM listings")?;
        let rows = stmt.query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?;
        Ok(rows.collect::<rusqlite::Result<KnownItems>>()?)
    }

    fn due_for_expiration(&self, cutoff: DateTime<Utc>) -> Result<Vec<ExpiryCandidate>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, item_id, url FROM listings
             WHERE expiry_date IS NULL AND expiry_last_check_timestamp < ?1
             ORDER BY expiry_last_check_timestamp ASC",
        )?;
        let rows = stmt.query_map(params![cutoff.timestamp()], |row| {
            Ok(ExpiryCandidate {
                row_id: row.get(0)?,
                item_id: row.get(1)?,
                url: row.get(2)?,
            })
        })?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    fn find_by_item_id(&self, item_id: &str) -> Result<Option<ListingRecord>> {
        self.find_one("item_id", &item_id)
    }

    fn find_by_id(&self, id: i64) -> Result<Option<ListingRecord>> {
        self.find_one("id", &id)
    }

    fn insert(&self, record: &ListingRecord) -> Result<i64> {
        self.conn.execute(
            "INSERT INTO listings (
                item_id, deal, kind,
                current_price, min_price, max_price, previous_price,
                min_price_date, max_price_date, previous_price_date, edit_date, price_per_m2,
                size, room_count, postal_code, district, address,
                energy_info, heating_consumption, features_info,
                contract_duration, construction_type, has_commission, seller_is_private,
                title, description, url,
                published_at, discovery_date, discovery_timestamp,
                expiry_date, expiry_last_check_timestamp
            ) VALUES (
                :item_id, :deal, :kind,
                :current_price, :min_price, :max_price, :previous_price,
                :min_price_date, :max_price_date, :previous_price_date, :edit_date, :price_per_m2,
                :size, :room_count, :postal_code, :district, :address,
                :energy_info, :heating_consumption, :features_info,
                :contract_duration, :construction_type, :has_commission, :seller_is_private,
                :title, :description, :url,
                :published_at, :discovery_date, :discovery_timestamp,
                :expiry_date, :expiry_last_check_timestamp
            )",
            named_params! {
                ":item_id": record.item_id,
                ":deal": record.deal,
                ":kind": record.kind,
                ":current_price": record.current_price,
                ":min_price": record.min_price,
                ":max_price": record.max_price,
                ":previous_price": record.previous_price,
                ":min_price_date": record.min_price_date,
                ":max_price_date": record.max_price_date,
                ":previous_price_date": record.previous_price_date,
                ":edit_date": record.edit_date,
                ":price_per_m2": record.price_per_m2,
                ":size": record.size,
                ":room_count": record.room_count,
                ":postal_code": record.postal_code,
                ":district": record.district,
                ":address": record.address,
                ":energy_info": record.energy_info,
                ":heating_consumption": record.heating_consumption,
                ":features_info": record.features_info,
                ":contract_duration": record.contract_duration,
                ":construction_type": record.construction_type,
                ":has_commission": record.has_commission,
                ":seller_is_private": record.seller_is_private,
                ":title": record.title,
                ":description": record.description,
                ":url": record.url,
                ":published_at": record.published_at,
                ":discovery_date": record.discovery_date,
                ":discovery_timestamp": record.discovery_timestamp,
                ":expiry_date": record.expiry_date,
                ":expiry_last_check_timestamp": record.expiry_last_check.timestamp(),
            },
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    fn update_by_id(&self, id: i64, update: &PriceUpdate) -> Result<()> {
        let changed = self.conn.execute(
            "UPDATE listings SET
                current_price = :current_price,
                previous_price = :previous_price,
                previous_price_date = :previous_price_date,
                min_price = :min_price,
                min_price_date = :min_price_date,
                max_price = :max_price,
                max_price_date = :max_price_date,
                edit_date = :edit_date,
                price_per_m2 = :price_per_m2,
                expiry_last_check_timestamp = :checked_at
             WHERE id = :id",
            named_params! {
                ":current_price": update.current_price,
                ":previous_price": update.previous_price,
                ":previous_price_date": update.previous_price_date,
                ":min_price": update.min_price,
                ":min_price_date": update.min_price_date,
                ":max_price": update.max_price,
                ":max_price_date": update.max_price_date,
                ":edit_date": update.edit_date,
                ":price_per_m2": update.price_per_m2,
                ":checked_at": update.checked_at.timestamp(),
                ":id": id,
            },
        )?;
        if changed == 0 {
            return Err(AppError::Database(rusqlite::Error::QueryReturnedNoRows));
        }
        Ok(())
    }

    fn mark_expired(
        &self,
        id: i64,
        expiry_date: NaiveDate,
        checked_at: DateTime<Utc>,
    ) -> Result<()> {
        self.conn.execute(
            "UPDATE listings SET
                expiry_date = COALESCE(expiry_date, ?1),
                expiry_last_check_timestamp = ?2
             WHERE id = ?3",
            params![expiry_date, checked_at.timestamp(), id],
        )?;
        Ok(())
    }

    fn mark_checked(&self, id: i64, checked_at: DateTime<Utc>) -> Result<()> {
        self.conn.execute(
            "UPDATE listings SET expiry_last_check_timestamp = ?1 WHERE id = ?2",
            params![checked_at.timestamp(), id],
        )?;
        Ok(())
    }

    fn read_watermark(&self) -> Result<DateTime<Utc>> {
        let value: Option<String> = self
            .conn
            .query_row(
                "SELECT value FROM meta WHERE key = ?1",
                params![WATERMARK_KEY],
                |row| row.get(0),
            )
            .optional()?;

        match value {
            Some(text) => NaiveDateTime::parse_from_str(&text, WATERMARK_FORMAT)
                .map(|ts| ts.and_utc())
                .map_err(|e| AppError::validation(format!("stored watermark '{text}': {e}"))),
            None => Ok(DateTime::UNIX_EPOCH),
        }
    }

    fn write_watermark(&self, at: DateTime<Utc>) -> Result<()> {
        self.conn.execute(
            "INSERT INTO meta (key, value) VALUES (?1, ?2)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value",
            params![WATERMARK_KEY, at.format(WATERMARK_FORMAT).to_string()],
        )?;
        Ok(())
    }

    fn summary(&self) -> Result<StoreSummary> {
        Ok(StoreSummary {
            listings: self.count("SELECT COUNT(*) FROM listings")?,
            active: self.count("SELECT COUNT(*) FROM listings WHERE expiry_date IS NULL")?,
            expired: self.count("SELECT COUNT(*) FROM listings WHERE expiry_date IS NOT NULL")?,
        })
    }

    fn atomically<T, F>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Self) -> Result<T>,
    {
        let tx = self.conn.unchecked_transaction()?;
        let value = f(self)?;
        tx.commit()?;
        Ok(value)
    }
}

fn from_unix(seconds: i64) -> DateTime<Utc> {
    DateTime::from_timestamp(seconds, 0).unwrap_or(DateTime::UNIX_EPOCH)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};
    use tempfile::TempDir;

    fn record(item_id: &str, price: i64, checked_at: DateTime<Utc>) -> ListingRecord {
        let edit = NaiveDate::from_ymd_opt(2026, 1, 10)
            .unwrap()
            .and_hms_opt(9, 30, 0)
            .unwrap();
        ListingRecord {
            id: 0,
            item_id: item_id.to_string(),
            deal: Deal::Rent,
            kind: PropertyKind::Flat,
            current_price: price,
            min_price: price,
            max_price: price,
            previous_price: price,
            min_price_date: edit,
            max_price_date: edit,
            previous_price_date: edit,
            edit_date: edit,
            price_per_m2: 0.0,
            size: 0,
            room_count: 3,
            postal_code: "8020".into(),
            district: "Lend".into(),
            address: "8020 Lend".into(),
            energy_info: Some("\"HWB\": \"45\"".into()),
            heating_consumption: Some(45.0),
            features_info: None,
            contract_duration: Some("3".into()),
            construction_type: None,
            has_commission: false,
            seller_is_private: true,
            title: "Altbau".into(),
            description: String::new(),
            url: format!("https://example.test/iad/immobilien/d/x/{item_id}"),
            published_at: None,
            discovery_date: edit.date(),
            discovery_timestamp: 1_768_037_400,
            expiry_date: None,
            expiry_last_check: checked_at,
        }
    }

    #[test]
    fn test_insert_and_find() {
        let store = SqliteStore::in_memory().unwrap();
        let now = Utc.with_ymd_and_hms(2026, 1, 10, 12, 0, 0).unwrap();

        let id = store.insert(&record("123456", 800, now)).unwrap();
        let found = store.find_by_item_id("123456").unwrap().unwrap();

        assert_eq!(found.id, id);
        assert_eq!(found.current_price, 800);
        assert_eq!(found.deal, Deal::Rent);
        assert_eq!(found.heating_consumption, Some(45.0));
        assert_eq!(found.expiry_last_check, now);
        assert!(store.find_by_item_id("999").unwrap().is_none());
    }

    #[test]
    fn test_item_id_is_unique() {
        let store = SqliteStore::in_memory().unwrap();
        let now = Utc::now();
        store.insert(&record("1", 500, now)).unwrap();
        assert!(store.insert(&record("1", 600, now)).is_err());
    }

    #[test]
    fn test_known_items() {
        let store = SqliteStore::in_memory().unwrap();
        let now = Utc::now();
        store.insert(&record("1", 500, now)).unwrap();
        store.insert(&record("2", 900, now)).unwrap();

        let known = store.known_items().unwrap();
        assert_eq!(known.len(), 2);
        assert_eq!(known.price_of("2"), Some(900));
    }

    #[test]
    fn test_watermark_defaults_to_epoch() {
        let store = SqliteStore::in_memory().unwrap();
        assert_eq!(store.read_watermark().unwrap(), DateTime::UNIX_EPOCH);
    }

    #[test]
    fn test_watermark_survives_reopen() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("db/listings.sqlite");
        let at = Utc.with_ymd_and_hms(2026, 3, 1, 18, 45, 10).unwrap();

        {
            let store = SqliteStore::open(&path).unwrap();
            store.write_watermark(at).unwrap();
        }

        let store = SqliteStore::open(&path).unwrap();
        assert_eq!(store.read_watermark().unwrap(), at);
    }

    #[test]
    fn test_due_for_expiration() {
        let store = SqliteStore::in_memory().unwrap();
        let now = Utc.with_ymd_and_hms(2026, 3, 1, 0, 0, 0).unwrap();
        let cutoff = now - Duration::days(31);

        let stale = store
            .insert(&record("stale", 500, now - Duration::days(40)))
            .unwrap();
        store.insert(&record("fresh", 500, now - Duration::days(2))).unwrap();
        let gone = store
            .insert(&record("gone", 500, now - Duration::days(60)))
            .unwrap();
        store.mark_expired(gone, now.date_naive(), now - Duration::days(50)).unwrap();

        let due = store.due_for_expiration(cutoff).unwrap();
        assert_eq!(due.len(), 1);
        assert_eq!(due[0].row_id, stale);
        assert_eq!(due[0].item_id, "stale");
    }

    #[test]
    fn test_mark_expired_keeps_first_date() {
        let store = SqliteStore::in_memory().unwrap();
        let now = Utc.with_ymd_and_hms(2026, 3, 1, 0, 0, 0).unwrap();
        let id = store.insert(&record("1", 500, now)).unwrap();

        let first = NaiveDate::from_ymd_opt(2026, 3, 1).unwrap();
        let later = NaiveDate::from_ymd_opt(2026, 4, 1).unwrap();
        store.mark_expired(id, first, now).unwrap();
        store.mark_expired(id, later, now + Duration::days(31)).unwrap();

        let row = store.find_by_id(id).unwrap().unwrap();
        assert_eq!(row.expiry_date, Some(first));
        assert_eq!(row.expiry_last_check, now + Duration::days(31));
    }

    #[test]
    fn test_atomically_rolls_back_on_error() {
        let store = SqliteStore::in_memory().unwrap();
        let now = Utc::now();

        let result: Result<()> = store.atomically(|s| {
            s.insert(&record("1", 500, now))?;
            Err(AppError::validation("boom"))
        });

        assert!(result.is_err());
        assert!(store.find_by_item_id("1").unwrap().is_none());
    }

    #[test]
    fn test_summary() {
        let store = SqliteStore::in_memory().unwrap();
        let now = Utc::now();
        store.insert(&record("1", 500, now)).unwrap();
        let id = store.insert(&record("2", 500, now)).unwrap();
        store.mark_expired(id, now.date_naive(), now).unwrap();

        let summary = store.summary().unwrap();
        assert_eq!(
            summary,
            StoreSummary {
                listings: 2,
                active: 1,
                expired: 1
            }
        );
    }
}
