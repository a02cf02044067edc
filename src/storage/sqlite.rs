//! SQLite-backed storage.
//!
//! Owns the schema and all SQL. Enum columns are stored as TEXT through
//! the `ToSql`/`FromSql` impls below, timestamps are set in SQL with
//! `datetime('now')` so every row carries UTC wall-clock time.

use rusqlite::types::{FromSql, FromSqlError, FromSqlResult, ToSqlOutput, ValueRef};
use rusqlite::{params, Connection, OptionalExtension, Row, ToSql};
use std::path::Path;
use std::sync::Mutex;

use crate::error::{BrokerError, Result};
use crate::inventory::{format_lot_number, InventoryWriter};
use crate::models::{
    CalculationType, ConditionTier, HistoryAction, ItemStatus, Lot, MarketSnapshot, MarketSource,
    MarketStatistic, PolicyConditionDiscount, PolicyScope, PricingCalculationAudit, PricingPolicy,
    Release, SellerResponse, Submission, SubmissionHistoryEntry, SubmissionItem,
};
use crate::storage::{
    ItemTransition, NewCalculationAudit, NewConditionTier, NewHistoryEntry, NewMarketSnapshot,
    NewPolicyDiscount, NewPricingPolicy, NewRelease, NewSubmission, NewSubmissionItem, Storage,
};

/// SQLite implementation of [`Storage`]. The connection sits behind a
/// mutex, so one handle can serve the daemon and its jobs.
pub struct SqliteStorage {
    conn: Mutex<Connection>,
}

impl SqliteStorage {
    /// Opens (or creates) the database file and ensures the schema exists.
    pub fn open(db_path: &Path) -> Result<Self> {
        let conn = Connection::open(db_path)?;
        Self::from_connection(conn)
    }

    /// In-memory database, used by tests.
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        Self::from_connection(conn)
    }

    fn from_connection(conn: Connection) -> Result<Self> {
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        init_schema(&conn)?;
        Ok(SqliteStorage {
            conn: Mutex::new(conn),
        })
    }

    /// Looks up an inventory lot by its lot number.
    pub fn get_lot(&self, lot_number: &str) -> Result<Option<Lot>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare_cached(
            "SELECT id, lot_number, release_id, quantity, condition_media, condition_sleeve,
                    acquisition_price, source_item_id, created_at
             FROM lots WHERE lot_number = ?1",
        )?;
        Ok(stmt.query_row(params![lot_number], row_to_lot).optional()?)
    }
}

fn init_schema(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        r#"
        -- Record catalog
        CREATE TABLE IF NOT EXISTS releases (
            id INTEGER PRIMARY KEY,
            title TEXT NOT NULL,
            artist TEXT NOT NULL,
            genre TEXT,
            discogs_release_id INTEGER,
            created_at TEXT NOT NULL DEFAULT (datetime('now'))
        );

        -- Pricing rules per scope, versioned, never deleted
        CREATE TABLE IF NOT EXISTS pricing_policies (
            id INTEGER PRIMARY KEY,
            scope TEXT NOT NULL,
            scope_value TEXT,
            buy_source TEXT NOT NULL,
            buy_statistic TEXT NOT NULL,
            sell_source TEXT NOT NULL,
            sell_statistic TEXT NOT NULL,
            buy_percentage REAL NOT NULL,
            sell_percentage REAL NOT NULL,
            buy_min_cap REAL,
            buy_max_cap REAL,
            sell_min_cap REAL,
            sell_max_cap REAL,
            media_weight REAL NOT NULL,
            sleeve_weight REAL NOT NULL,
            rounding_increment REAL NOT NULL,
            condition_adjustment_enabled INTEGER NOT NULL DEFAULT 1,
            requires_manual_review INTEGER NOT NULL DEFAULT 0,
            version INTEGER NOT NULL DEFAULT 1,
            is_active INTEGER NOT NULL DEFAULT 1,
            created_at TEXT NOT NULL DEFAULT (datetime('now')),
            updated_at TEXT NOT NULL DEFAULT (datetime('now'))
        );
        CREATE INDEX IF NOT EXISTS idx_policies_scope
            ON pricing_policies(scope, scope_value, is_active);

        -- Condition grading scale
        CREATE TABLE IF NOT EXISTS condition_tiers (
            id INTEGER PRIMARY KEY,
            name TEXT NOT NULL UNIQUE,
            display_order INTEGER NOT NULL,
            media_adjustment REAL NOT NULL,
            sleeve_adjustment REAL NOT NULL
        );

        -- Optional per-policy discount on top of a tier's adjustment
        CREATE TABLE IF NOT EXISTS policy_condition_discounts (
            id INTEGER PRIMARY KEY,
            policy_id INTEGER NOT NULL REFERENCES pricing_policies(id),
            condition_tier_id INTEGER NOT NULL REFERENCES condition_tiers(id),
            buy_discount_percentage REAL,
            sell_discount_percentage REAL,
            UNIQUE (policy_id, condition_tier_id)
        );

        -- Cached marketplace statistics, one row per release and source
        CREATE TABLE IF NOT EXISTS market_snapshots (
            id INTEGER PRIMARY KEY,
            release_id INTEGER NOT NULL REFERENCES releases(id),
            source TEXT NOT NULL,
            stat_low REAL,
            stat_median REAL,
            stat_high REAL,
            fetched_at TEXT NOT NULL DEFAULT (datetime('now')),
            UNIQUE (release_id, source)
        );

        -- Append-only trail of price calculations
        CREATE TABLE IF NOT EXISTS pricing_calculation_audits (
            id INTEGER PRIMARY KEY,
            release_id INTEGER NOT NULL,
            policy_id INTEGER NOT NULL,
            market_snapshot_id INTEGER,
            calculation_type TEXT NOT NULL,
            condition_media TEXT NOT NULL,
            condition_sleeve TEXT NOT NULL,
            market_price REAL,
            final_price REAL NOT NULL,
            breakdown TEXT NOT NULL,
            created_at TEXT NOT NULL DEFAULT (datetime('now'))
        );
        CREATE INDEX IF NOT EXISTS idx_audits_release
            ON pricing_calculation_audits(release_id);
        CREATE INDEX IF NOT EXISTS idx_audits_created
            ON pricing_calculation_audits(created_at);

        -- Seller submissions and their items
        CREATE TABLE IF NOT EXISTS submissions (
            id INTEGER PRIMARY KEY,
            submission_number TEXT NOT NULL UNIQUE,
            seller_email TEXT NOT NULL,
            created_at TEXT NOT NULL DEFAULT (datetime('now'))
        );

        CREATE TABLE IF NOT EXISTS submission_items (
            id INTEGER PRIMARY KEY,
            submission_id INTEGER NOT NULL REFERENCES submissions(id),
            release_id INTEGER NOT NULL REFERENCES releases(id),
            quantity INTEGER NOT NULL,
            condition_media TEXT NOT NULL,
            condition_sleeve TEXT NOT NULL,
            auto_offer_price REAL NOT NULL,
            final_condition_media TEXT,
            final_condition_sleeve TEXT,
            final_offer_price REAL,
            status TEXT NOT NULL DEFAULT 'pending',
            created_at TEXT NOT NULL DEFAULT (datetime('now')),
            updated_at TEXT NOT NULL DEFAULT (datetime('now'))
        );
        CREATE INDEX IF NOT EXISTS idx_items_submission
            ON submission_items(submission_id);
        CREATE INDEX IF NOT EXISTS idx_items_status
            ON submission_items(status);

        -- Per-item action trail
        CREATE TABLE IF NOT EXISTS submission_history (
            id INTEGER PRIMARY KEY,
            submission_item_id INTEGER NOT NULL REFERENCES submission_items(id),
            action_type TEXT NOT NULL,
            admin_notes TEXT,
            adjusted_price REAL,
            seller_response TEXT,
            created_at TEXT NOT NULL DEFAULT (datetime('now'))
        );
        CREATE INDEX IF NOT EXISTS idx_history_item
            ON submission_history(submission_item_id);

        -- Sellable inventory created from finalized items
        CREATE TABLE IF NOT EXISTS lots (
            id INTEGER PRIMARY KEY,
            lot_number TEXT NOT NULL UNIQUE,
            release_id INTEGER NOT NULL REFERENCES releases(id),
            quantity INTEGER NOT NULL,
            condition_media TEXT NOT NULL,
            condition_sleeve TEXT NOT NULL,
            acquisition_price REAL NOT NULL,
            source_item_id INTEGER NOT NULL REFERENCES submission_items(id),
            created_at TEXT NOT NULL DEFAULT (datetime('now'))
        );
        "#,
    )?;
    Ok(())
}

// ── Enum column glue ──

impl ToSql for PolicyScope {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::from(self.as_str()))
    }
}

impl FromSql for PolicyScope {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        let text = value.as_str()?;
        PolicyScope::parse(text)
            .ok_or_else(|| FromSqlError::Other(format!("unknown policy scope: {text}").into()))
    }
}

impl ToSql for MarketSource {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::from(self.as_str()))
    }
}

impl FromSql for MarketSource {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        let text = value.as_str()?;
        MarketSource::parse(text)
            .ok_or_else(|| FromSqlError::Other(format!("unknown market source: {text}").into()))
    }
}

impl ToSql for MarketStatistic {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::from(self.as_str()))
    }
}

impl FromSql for MarketStatistic {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        let text = value.as_str()?;
        MarketStatistic::parse(text)
            .ok_or_else(|| FromSqlError::Other(format!("unknown market statistic: {text}").into()))
    }
}

impl ToSql for CalculationType {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::from(self.as_str()))
    }
}

impl FromSql for CalculationType {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        let text = value.as_str()?;
        CalculationType::parse(text)
            .ok_or_else(|| FromSqlError::Other(format!("unknown calculation type: {text}").into()))
    }
}

impl ToSql for ItemStatus {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::from(self.as_str()))
    }
}

impl FromSql for ItemStatus {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        let text = value.as_str()?;
        ItemStatus::parse(text)
            .ok_or_else(|| FromSqlError::Other(format!("unknown item status: {text}").into()))
    }
}

impl ToSql for SellerResponse {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::from(self.as_str()))
    }
}

impl FromSql for SellerResponse {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        let text = value.as_str()?;
        SellerResponse::parse(text)
            .ok_or_else(|| FromSqlError::Other(format!("unknown seller response: {text}").into()))
    }
}

impl ToSql for HistoryAction {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::from(self.as_str()))
    }
}

impl FromSql for HistoryAction {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        let text = value.as_str()?;
        HistoryAction::parse(text)
            .ok_or_else(|| FromSqlError::Other(format!("unknown history action: {text}").into()))
    }
}

// ── Row mappers ──

fn row_to_release(row: &Row) -> rusqlite::Result<Release> {
    Ok(Release {
        id: row.get(0)?,
        title: row.get(1)?,
        artist: row.get(2)?,
        genre: row.get(3)?,
        discogs_release_id: row.get(4)?,
        created_at: row.get(5)?,
    })
}

fn row_to_policy(row: &Row) -> rusqlite::Result<PricingPolicy> {
    Ok(PricingPolicy {
        id: row.get(0)?,
        scope: row.get(1)?,
        scope_value: row.get(2)?,
        buy_source: row.get(3)?,
        buy_statistic: row.get(4)?,
        sell_source: row.get(5)?,
        sell_statistic: row.get(6)?,
        buy_percentage: row.get(7)?,
        sell_percentage: row.get(8)?,
        buy_min_cap: row.get(9)?,
        buy_max_cap: row.get(10)?,
        sell_min_cap: row.get(11)?,
        sell_max_cap: row.get(12)?,
        media_weight: row.get(13)?,
        sleeve_weight: row.get(14)?,
        rounding_increment: row.get(15)?,
        condition_adjustment_enabled: row.get(16)?,
        requires_manual_review: row.get(17)?,
        version: row.get(18)?,
        is_active: row.get(19)?,
        created_at: row.get(20)?,
        updated_at: row.get(21)?,
    })
}

fn row_to_tier(row: &Row) -> rusqlite::Result<ConditionTier> {
    Ok(ConditionTier {
        id: row.get(0)?,
        name: row.get(1)?,
        display_order: row.get(2)?,
        media_adjustment: row.get(3)?,
        sleeve_adjustment: row.get(4)?,
    })
}

fn row_to_discount(row: &Row) -> rusqlite::Result<PolicyConditionDiscount> {
    Ok(PolicyConditionDiscount {
        id: row.get(0)?,
        policy_id: row.get(1)?,
        condition_tier_id: row.get(2)?,
        buy_discount_percentage: row.get(3)?,
        sell_discount_percentage: row.get(4)?,
    })
}

fn row_to_snapshot(row: &Row) -> rusqlite::Result<MarketSnapshot> {
    Ok(MarketSnapshot {
        id: row.get(0)?,
        release_id: row.get(1)?,
        source: row.get(2)?,
        stat_low: row.get(3)?,
        stat_median: row.get(4)?,
        stat_high: row.get(5)?,
        fetched_at: row.get(6)?,
    })
}

fn row_to_audit(row: &Row) -> rusqlite::Result<PricingCalculationAudit> {
    Ok(PricingCalculationAudit {
        id: row.get(0)?,
        release_id: row.get(1)?,
        policy_id: row.get(2)?,
        market_snapshot_id: row.get(3)?,
        calculation_type: row.get(4)?,
        condition_media: row.get(5)?,
        condition_sleeve: row.get(6)?,
        market_price: row.get(7)?,
        final_price: row.get(8)?,
        breakdown: row.get(9)?,
        created_at: row.get(10)?,
    })
}

fn row_to_submission(row: &Row) -> rusqlite::Result<Submission> {
    Ok(Submission {
        id: row.get(0)?,
        submission_number: row.get(1)?,
        seller_email: row.get(2)?,
        created_at: row.get(3)?,
    })
}

fn row_to_item(row: &Row) -> rusqlite::Result<SubmissionItem> {
    Ok(SubmissionItem {
        id: row.get(0)?,
        submission_id: row.get(1)?,
        release_id: row.get(2)?,
        quantity: row.get(3)?,
        condition_media: row.get(4)?,
        condition_sleeve: row.get(5)?,
        auto_offer_price: row.get(6)?,
        final_condition_media: row.get(7)?,
        final_condition_sleeve: row.get(8)?,
        final_offer_price: row.get(9)?,
        status: row.get(10)?,
        created_at: row.get(11)?,
        updated_at: row.get(12)?,
    })
}

fn row_to_history(row: &Row) -> rusqlite::Result<SubmissionHistoryEntry> {
    Ok(SubmissionHistoryEntry {
        id: row.get(0)?,
        submission_item_id: row.get(1)?,
        action_type: row.get(2)?,
        admin_notes: row.get(3)?,
        adjusted_price: row.get(4)?,
        seller_response: row.get(5)?,
        created_at: row.get(6)?,
    })
}

fn row_to_lot(row: &Row) -> rusqlite::Result<Lot> {
    Ok(Lot {
        id: row.get(0)?,
        lot_number: row.get(1)?,
        release_id: row.get(2)?,
        quantity: row.get(3)?,
        condition_media: row.get(4)?,
        condition_sleeve: row.get(5)?,
        acquisition_price: row.get(6)?,
        source_item_id: row.get(7)?,
        created_at: row.get(8)?,
    })
}

// ── Fetch helpers sharing an already-locked connection ──

const RELEASE_COLS: &str = "id, title, artist, genre, discogs_release_id, created_at";

const POLICY_COLS: &str = "id, scope, scope_value, buy_source, buy_statistic, sell_source, \
    sell_statistic, buy_percentage, sell_percentage, buy_min_cap, buy_max_cap, sell_min_cap, \
    sell_max_cap, media_weight, sleeve_weight, rounding_increment, condition_adjustment_enabled, \
    requires_manual_review, version, is_active, created_at, updated_at";

const ITEM_COLS: &str = "id, submission_id, release_id, quantity, condition_media, \
    condition_sleeve, auto_offer_price, final_condition_media, final_condition_sleeve, \
    final_offer_price, status, created_at, updated_at";

const AUDIT_COLS: &str = "id, release_id, policy_id, market_snapshot_id, calculation_type, \
    condition_media, condition_sleeve, market_price, final_price, breakdown, created_at";

fn fetch_release(conn: &Connection, id: i64) -> Result<Option<Release>> {
    let mut stmt =
        conn.prepare_cached(&format!("SELECT {RELEASE_COLS} FROM releases WHERE id = ?1"))?;
    Ok(stmt.query_row(params![id], row_to_release).optional()?)
}

fn fetch_policy(conn: &Connection, id: i64) -> Result<Option<PricingPolicy>> {
    let mut stmt = conn.prepare_cached(&format!(
        "SELECT {POLICY_COLS} FROM pricing_policies WHERE id = ?1"
    ))?;
    Ok(stmt.query_row(params![id], row_to_policy).optional()?)
}

fn fetch_item(conn: &Connection, id: i64) -> Result<Option<SubmissionItem>> {
    let mut stmt = conn.prepare_cached(&format!(
        "SELECT {ITEM_COLS} FROM submission_items WHERE id = ?1"
    ))?;
    Ok(stmt.query_row(params![id], row_to_item).optional()?)
}

fn fetch_discount(
    conn: &Connection,
    policy_id: i64,
    condition_tier_id: i64,
) -> Result<Option<PolicyConditionDiscount>> {
    let mut stmt = conn.prepare_cached(
        "SELECT id, policy_id, condition_tier_id, buy_discount_percentage, sell_discount_percentage
         FROM policy_condition_discounts WHERE policy_id = ?1 AND condition_tier_id = ?2",
    )?;
    Ok(stmt
        .query_row(params![policy_id, condition_tier_id], row_to_discount)
        .optional()?)
}

fn fetch_snapshot(
    conn: &Connection,
    release_id: i64,
    source: MarketSource,
) -> Result<Option<MarketSnapshot>> {
    let mut stmt = conn.prepare_cached(
        "SELECT id, release_id, source, stat_low, stat_median, stat_high, fetched_at
         FROM market_snapshots WHERE release_id = ?1 AND source = ?2",
    )?;
    Ok(stmt
        .query_row(params![release_id, source], row_to_snapshot)
        .optional()?)
}

// ── Storage impl ──

impl Storage for SqliteStorage {
    fn create_release(&self, release: &NewRelease) -> Result<Release> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO releases (title, artist, genre, discogs_release_id)
             VALUES (?1, ?2, ?3, ?4)",
            params![
                release.title,
                release.artist,
                release.genre,
                release.discogs_release_id
            ],
        )?;
        let id = conn.last_insert_rowid();
        fetch_release(&conn, id)?
            .ok_or_else(|| BrokerError::Internal(format!("release {id} missing after insert")))
    }

    fn get_release(&self, id: i64) -> Result<Option<Release>> {
        let conn = self.conn.lock().unwrap();
        fetch_release(&conn, id)
    }

    fn list_releases(&self) -> Result<Vec<Release>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt =
            conn.prepare_cached(&format!("SELECT {RELEASE_COLS} FROM releases ORDER BY id"))?;
        let rows = stmt.query_map([], row_to_release)?;
        let mut releases = Vec::new();
        for row in rows {
            releases.push(row?);
        }
        Ok(releases)
    }

    fn create_policy(&self, policy: &NewPricingPolicy) -> Result<PricingPolicy> {
        policy.validate()?;
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO pricing_policies (
                scope, scope_value, buy_source, buy_statistic, sell_source, sell_statistic,
                buy_percentage, sell_percentage, buy_min_cap, buy_max_cap, sell_min_cap,
                sell_max_cap, media_weight, sleeve_weight, rounding_increment,
                condition_adjustment_enabled, requires_manual_review, is_active
             ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17, ?18)",
            params![
                policy.scope,
                policy.scope_value,
                policy.buy_source,
                policy.buy_statistic,
                policy.sell_source,
                policy.sell_statistic,
                policy.buy_percentage,
                policy.sell_percentage,
                policy.buy_min_cap,
                policy.buy_max_cap,
                policy.sell_min_cap,
                policy.sell_max_cap,
                policy.media_weight,
                policy.sleeve_weight,
                policy.rounding_increment,
                policy.condition_adjustment_enabled,
                policy.requires_manual_review,
                policy.is_active,
            ],
        )?;
        let id = conn.last_insert_rowid();
        fetch_policy(&conn, id)?
            .ok_or_else(|| BrokerError::Internal(format!("policy {id} missing after insert")))
    }

    fn update_policy(&self, id: i64, policy: &NewPricingPolicy) -> Result<PricingPolicy> {
        policy.validate()?;
        let conn = self.conn.lock().unwrap();
        let updated = conn.execute(
            "UPDATE pricing_policies SET
                scope = ?1, scope_value = ?2, buy_source = ?3, buy_statistic = ?4,
                sell_source = ?5, sell_statistic = ?6, buy_percentage = ?7, sell_percentage = ?8,
                buy_min_cap = ?9, buy_max_cap = ?10, sell_min_cap = ?11, sell_max_cap = ?12,
                media_weight = ?13, sleeve_weight = ?14, rounding_increment = ?15,
                condition_adjustment_enabled = ?16, requires_manual_review = ?17, is_active = ?18,
                version = version + 1, updated_at = datetime('now')
             WHERE id = ?19",
            params![
                policy.scope,
                policy.scope_value,
                policy.buy_source,
                policy.buy_statistic,
                policy.sell_source,
                policy.sell_statistic,
                policy.buy_percentage,
                policy.sell_percentage,
                policy.buy_min_cap,
                policy.buy_max_cap,
                policy.sell_min_cap,
                policy.sell_max_cap,
                policy.media_weight,
                policy.sleeve_weight,
                policy.rounding_increment,
                policy.condition_adjustment_enabled,
                policy.requires_manual_review,
                policy.is_active,
                id,
            ],
        )?;
        if updated == 0 {
            return Err(BrokerError::NotFound(format!("pricing policy {id}")));
        }
        fetch_policy(&conn, id)?
            .ok_or_else(|| BrokerError::Internal(format!("policy {id} missing after update")))
    }

    fn get_policy(&self, id: i64) -> Result<Option<PricingPolicy>> {
        let conn = self.conn.lock().unwrap();
        fetch_policy(&conn, id)
    }

    fn find_active_policy(
        &self,
        scope: PolicyScope,
        scope_value: Option<&str>,
    ) -> Result<Option<PricingPolicy>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare_cached(&format!(
            "SELECT {POLICY_COLS} FROM pricing_policies
             WHERE is_active = 1 AND scope = ?1
               AND ((?2 IS NULL AND scope_value IS NULL) OR scope_value = ?2)
             ORDER BY id DESC LIMIT 1"
        ))?;
        Ok(stmt
            .query_row(params![scope, scope_value], row_to_policy)
            .optional()?)
    }

    fn create_condition_tier(&self, tier: &NewConditionTier) -> Result<ConditionTier> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO condition_tiers (name, display_order, media_adjustment, sleeve_adjustment)
             VALUES (?1, ?2, ?3, ?4)",
            params![
                tier.name,
                tier.display_order,
                tier.media_adjustment,
                tier.sleeve_adjustment
            ],
        )?;
        let id = conn.last_insert_rowid();
        let mut stmt = conn.prepare_cached(
            "SELECT id, name, display_order, media_adjustment, sleeve_adjustment
             FROM condition_tiers WHERE id = ?1",
        )?;
        stmt.query_row(params![id], row_to_tier)
            .optional()?
            .ok_or_else(|| BrokerError::Internal(format!("condition tier {id} missing after insert")))
    }

    fn list_condition_tiers(&self) -> Result<Vec<ConditionTier>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare_cached(
            "SELECT id, name, display_order, media_adjustment, sleeve_adjustment
             FROM condition_tiers ORDER BY display_order",
        )?;
        let rows = stmt.query_map([], row_to_tier)?;
        let mut tiers = Vec::new();
        for row in rows {
            tiers.push(row?);
        }
        Ok(tiers)
    }

    fn get_condition_tier_by_name(&self, name: &str) -> Result<Option<ConditionTier>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare_cached(
            "SELECT id, name, display_order, media_adjustment, sleeve_adjustment
             FROM condition_tiers WHERE name = ?1",
        )?;
        Ok(stmt.query_row(params![name], row_to_tier).optional()?)
    }

    fn upsert_policy_discount(
        &self,
        discount: &NewPolicyDiscount,
    ) -> Result<PolicyConditionDiscount> {
        discount.validate()?;
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO policy_condition_discounts
                (policy_id, condition_tier_id, buy_discount_percentage, sell_discount_percentage)
             VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT (policy_id, condition_tier_id) DO UPDATE SET
                buy_discount_percentage = excluded.buy_discount_percentage,
                sell_discount_percentage = excluded.sell_discount_percentage",
            params![
                discount.policy_id,
                discount.condition_tier_id,
                discount.buy_discount_percentage,
                discount.sell_discount_percentage
            ],
        )?;
        fetch_discount(&conn, discount.policy_id, discount.condition_tier_id)?.ok_or_else(|| {
            BrokerError::Internal(format!(
                "discount for policy {} tier {} missing after upsert",
                discount.policy_id, discount.condition_tier_id
            ))
        })
    }

    fn get_policy_discount(
        &self,
        policy_id: i64,
        condition_tier_id: i64,
    ) -> Result<Option<PolicyConditionDiscount>> {
        let conn = self.conn.lock().unwrap();
        fetch_discount(&conn, policy_id, condition_tier_id)
    }

    fn upsert_snapshot(&self, snapshot: &NewMarketSnapshot) -> Result<MarketSnapshot> {
        if snapshot.source == MarketSource::Hybrid {
            return Err(BrokerError::Validation(
                "snapshots require a concrete source, hybrid is a probe order".to_string(),
            ));
        }
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO market_snapshots (release_id, source, stat_low, stat_median, stat_high)
             VALUES (?1, ?2, ?3, ?4, ?5)
             ON CONFLICT (release_id, source) DO UPDATE SET
                stat_low = excluded.stat_low,
                stat_median = excluded.stat_median,
                stat_high = excluded.stat_high,
                fetched_at = datetime('now')",
            params![
                snapshot.release_id,
                snapshot.source,
                snapshot.stat_low,
                snapshot.stat_median,
                snapshot.stat_high
            ],
        )?;
        fetch_snapshot(&conn, snapshot.release_id, snapshot.source)?.ok_or_else(|| {
            BrokerError::Internal(format!(
                "snapshot for release {} source {} missing after upsert",
                snapshot.release_id,
                snapshot.source.as_str()
            ))
        })
    }

    fn get_snapshot(&self, release_id: i64, source: MarketSource) -> Result<Option<MarketSnapshot>> {
        let conn = self.conn.lock().unwrap();
        fetch_snapshot(&conn, release_id, source)
    }

    fn append_audit(&self, audit: &NewCalculationAudit) -> Result<i64> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO pricing_calculation_audits (
                release_id, policy_id, market_snapshot_id, calculation_type,
                condition_media, condition_sleeve, market_price, final_price, breakdown
             ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            params![
                audit.release_id,
                audit.policy_id,
                audit.market_snapshot_id,
                audit.calculation_type,
                audit.condition_media,
                audit.condition_sleeve,
                audit.market_price,
                audit.final_price,
                audit.breakdown
            ],
        )?;
        Ok(conn.last_insert_rowid())
    }

    fn get_audit(&self, id: i64) -> Result<Option<PricingCalculationAudit>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare_cached(&format!(
            "SELECT {AUDIT_COLS} FROM pricing_calculation_audits WHERE id = ?1"
        ))?;
        Ok(stmt.query_row(params![id], row_to_audit).optional()?)
    }

    fn audits_for_release(&self, release_id: i64) -> Result<Vec<PricingCalculationAudit>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare_cached(&format!(
            "SELECT {AUDIT_COLS} FROM pricing_calculation_audits
             WHERE release_id = ?1 ORDER BY id"
        ))?;
        let rows = stmt.query_map(params![release_id], row_to_audit)?;
        let mut audits = Vec::new();
        for row in rows {
            audits.push(row?);
        }
        Ok(audits)
    }

    fn purge_audits_before(&self, cutoff: &str) -> Result<usize> {
        let conn = self.conn.lock().unwrap();
        let deleted = conn.execute(
            "DELETE FROM pricing_calculation_audits WHERE created_at < ?1",
            params![cutoff],
        )?;
        Ok(deleted)
    }

    fn create_submission(&self, submission: &NewSubmission) -> Result<Submission> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO submissions (submission_number, seller_email) VALUES (?1, ?2)",
            params![submission.submission_number, submission.seller_email],
        )?;
        let id = conn.last_insert_rowid();
        let mut stmt = conn.prepare_cached(
            "SELECT id, submission_number, seller_email, created_at
             FROM submissions WHERE id = ?1",
        )?;
        stmt.query_row(params![id], row_to_submission)
            .optional()?
            .ok_or_else(|| BrokerError::Internal(format!("submission {id} missing after insert")))
    }

    fn get_submission(&self, id: i64) -> Result<Option<Submission>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare_cached(
            "SELECT id, submission_number, seller_email, created_at
             FROM submissions WHERE id = ?1",
        )?;
        Ok(stmt.query_row(params![id], row_to_submission).optional()?)
    }

    fn create_submission_item(&self, item: &NewSubmissionItem) -> Result<SubmissionItem> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO submission_items (
                submission_id, release_id, quantity, condition_media, condition_sleeve,
                auto_offer_price
             ) VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                item.submission_id,
                item.release_id,
                item.quantity,
                item.condition_media,
                item.condition_sleeve,
                item.auto_offer_price
            ],
        )?;
        let id = conn.last_insert_rowid();
        fetch_item(&conn, id)?.ok_or_else(|| {
            BrokerError::Internal(format!("submission item {id} missing after insert"))
        })
    }

    fn get_submission_item(&self, id: i64) -> Result<Option<SubmissionItem>> {
        let conn = self.conn.lock().unwrap();
        fetch_item(&conn, id)
    }

    fn items_for_submission(&self, submission_id: i64) -> Result<Vec<SubmissionItem>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare_cached(&format!(
            "SELECT {ITEM_COLS} FROM submission_items WHERE submission_id = ?1 ORDER BY id"
        ))?;
        let rows = stmt.query_map(params![submission_id], row_to_item)?;
        let mut items = Vec::new();
        for row in rows {
            items.push(row?);
        }
        Ok(items)
    }

    fn apply_item_transition(
        &self,
        item_id: i64,
        expected: ItemStatus,
        transition: &ItemTransition,
    ) -> Result<bool> {
        let conn = self.conn.lock().unwrap();
        let updated = conn.execute(
            "UPDATE submission_items SET
                status = ?1,
                final_condition_media = COALESCE(?2, final_condition_media),
                final_condition_sleeve = COALESCE(?3, final_condition_sleeve),
                final_offer_price = COALESCE(?4, final_offer_price),
                updated_at = datetime('now')
             WHERE id = ?5 AND status = ?6",
            params![
                transition.status,
                transition.final_condition_media,
                transition.final_condition_sleeve,
                transition.final_offer_price,
                item_id,
                expected
            ],
        )?;
        Ok(updated == 1)
    }

    fn append_history(&self, entry: &NewHistoryEntry) -> Result<i64> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO submission_history (
                submission_item_id, action_type, admin_notes, adjusted_price, seller_response
             ) VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                entry.submission_item_id,
                entry.action_type,
                entry.admin_notes,
                entry.adjusted_price,
                entry.seller_response
            ],
        )?;
        Ok(conn.last_insert_rowid())
    }

    fn history_for_item(&self, item_id: i64) -> Result<Vec<SubmissionHistoryEntry>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare_cached(
            "SELECT id, submission_item_id, action_type, admin_notes, adjusted_price,
                    seller_response, created_at
             FROM submission_history WHERE submission_item_id = ?1 ORDER BY id",
        )?;
        let rows = stmt.query_map(params![item_id], row_to_history)?;
        let mut entries = Vec::new();
        for row in rows {
            entries.push(row?);
        }
        Ok(entries)
    }

    fn resolve_pending_counter(&self, item_id: i64, response: SellerResponse) -> Result<bool> {
        let conn = self.conn.lock().unwrap();
        let updated = conn.execute(
            "UPDATE submission_history SET seller_response = ?1
             WHERE id = (
                SELECT id FROM submission_history
                WHERE submission_item_id = ?2
                  AND action_type = 'counter_offered'
                  AND seller_response = 'pending'
                ORDER BY id DESC LIMIT 1
             )",
            params![response, item_id],
        )?;
        Ok(updated > 0)
    }
}

impl InventoryWriter for SqliteStorage {
    fn create_lot_from_item(&self, item: &SubmissionItem) -> Result<String> {
        let mut conn = self.conn.lock().unwrap();
        // Inspected conditions take precedence over what the seller declared
        let condition_media = item
            .final_condition_media
            .clone()
            .unwrap_or_else(|| item.condition_media.clone());
        let condition_sleeve = item
            .final_condition_sleeve
            .clone()
            .unwrap_or_else(|| item.condition_sleeve.clone());
        // Number and row are assigned in one transaction so the sequence
        // stays gapless under writers from other processes
        let tx = conn.transaction()?;
        let next_id: i64 = tx.query_row("SELECT COALESCE(MAX(id), 0) + 1 FROM lots", [], |row| {
            row.get(0)
        })?;
        let lot_number = format_lot_number(next_id);
        tx.execute(
            "INSERT INTO lots (
                lot_number, release_id, quantity, condition_media, condition_sleeve,
                acquisition_price, source_item_id
             ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                lot_number,
                item.release_id,
                item.quantity,
                condition_media,
                condition_sleeve,
                item.current_offer(),
                item.id
            ],
        )?;
        tx.commit()?;
        log::info!(
            "Created inventory lot {} from submission item {}",
            lot_number,
            item.id
        );
        Ok(lot_number)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{make_test_policy, make_test_release, make_test_snapshot, make_test_tier};

    fn test_storage() -> SqliteStorage {
        SqliteStorage::open_in_memory().unwrap()
    }

    fn seed_item_numbered(storage: &SqliteStorage, submission_number: &str) -> SubmissionItem {
        let release = storage
            .create_release(&make_test_release("Test Album", "Test Artist"))
            .unwrap();
        let submission = storage
            .create_submission(&NewSubmission {
                submission_number: submission_number.to_string(),
                seller_email: "seller@example.com".to_string(),
            })
            .unwrap();
        storage
            .create_submission_item(&NewSubmissionItem {
                submission_id: submission.id,
                release_id: release.id,
                quantity: 1,
                condition_media: "Near Mint".to_string(),
                condition_sleeve: "Very Good Plus".to_string(),
                auto_offer_price: 12.5,
            })
            .unwrap()
    }

    fn seed_item(storage: &SqliteStorage) -> SubmissionItem {
        seed_item_numbered(storage, "SUB-001")
    }

    #[test]
    fn test_release_round_trip() {
        let storage = test_storage();
        let created = storage
            .create_release(&NewRelease {
                title: "Kind of Blue".to_string(),
                artist: "Miles Davis".to_string(),
                genre: Some("Jazz".to_string()),
                discogs_release_id: Some(12345),
            })
            .unwrap();
        assert!(created.id > 0);
        assert!(!created.created_at.is_empty());

        let fetched = storage.get_release(created.id).unwrap().unwrap();
        assert_eq!(fetched.title, "Kind of Blue");
        assert_eq!(fetched.genre.as_deref(), Some("Jazz"));
        assert_eq!(fetched.discogs_release_id, Some(12345));

        assert!(storage.get_release(9999).unwrap().is_none());
        assert_eq!(storage.list_releases().unwrap().len(), 1);
    }

    #[test]
    fn test_file_backed_database_persists_across_reopen() {
        use tempfile::TempDir;
        let temp_dir = TempDir::new().unwrap();
        let db_path = temp_dir.path().join("broker.db");

        {
            let storage = SqliteStorage::open(&db_path).unwrap();
            storage
                .create_release(&make_test_release("Axis: Bold as Love", "Jimi Hendrix"))
                .unwrap();
            storage
                .create_condition_tier(&make_test_tier("Near Mint", 2, 1.0))
                .unwrap();
        }

        let reopened = SqliteStorage::open(&db_path).unwrap();
        let releases = reopened.list_releases().unwrap();
        assert_eq!(releases.len(), 1);
        assert_eq!(releases[0].title, "Axis: Bold as Love");
        assert!(reopened
            .get_condition_tier_by_name("Near Mint")
            .unwrap()
            .is_some());
    }

    #[test]
    fn test_policy_create_and_update_versioning() {
        let storage = test_storage();
        let created = storage.create_policy(&make_test_policy()).unwrap();
        assert_eq!(created.version, 1);
        assert!(created.is_active);

        let mut changed = make_test_policy();
        changed.buy_percentage = 0.6;
        let updated = storage.update_policy(created.id, &changed).unwrap();
        assert_eq!(updated.version, 2);
        assert_eq!(updated.buy_percentage, 0.6);
        assert_eq!(updated.created_at, created.created_at);

        let err = storage.update_policy(9999, &changed).unwrap_err();
        assert!(matches!(err, BrokerError::NotFound(_)));
    }

    #[test]
    fn test_policy_validation_enforced_on_create() {
        let storage = test_storage();
        let mut bad = make_test_policy();
        bad.media_weight = 0.9;
        bad.sleeve_weight = 0.3;
        assert!(matches!(
            storage.create_policy(&bad),
            Err(BrokerError::Validation(_))
        ));
    }

    #[test]
    fn test_find_active_policy_scoping() {
        let storage = test_storage();
        let global = storage.create_policy(&make_test_policy()).unwrap();

        let mut genre = make_test_policy();
        genre.scope = PolicyScope::Genre;
        genre.scope_value = Some("Jazz".to_string());
        let genre = storage.create_policy(&genre).unwrap();

        let found = storage
            .find_active_policy(PolicyScope::Global, None)
            .unwrap()
            .unwrap();
        assert_eq!(found.id, global.id);

        let found = storage
            .find_active_policy(PolicyScope::Genre, Some("Jazz"))
            .unwrap()
            .unwrap();
        assert_eq!(found.id, genre.id);

        assert!(storage
            .find_active_policy(PolicyScope::Genre, Some("Classical"))
            .unwrap()
            .is_none());
    }

    #[test]
    fn test_find_active_policy_prefers_latest_and_skips_inactive() {
        let storage = test_storage();
        let first = storage.create_policy(&make_test_policy()).unwrap();
        let second = storage.create_policy(&make_test_policy()).unwrap();

        let found = storage
            .find_active_policy(PolicyScope::Global, None)
            .unwrap()
            .unwrap();
        assert_eq!(found.id, second.id);

        let mut retired = make_test_policy();
        retired.is_active = false;
        storage.update_policy(second.id, &retired).unwrap();

        let found = storage
            .find_active_policy(PolicyScope::Global, None)
            .unwrap()
            .unwrap();
        assert_eq!(found.id, first.id);
    }

    #[test]
    fn test_condition_tiers_listed_in_display_order() {
        let storage = test_storage();
        storage
            .create_condition_tier(&make_test_tier("Good", 5, 0.5))
            .unwrap();
        storage
            .create_condition_tier(&make_test_tier("Mint", 1, 1.1))
            .unwrap();
        storage
            .create_condition_tier(&make_test_tier("Very Good", 4, 0.7))
            .unwrap();

        let tiers = storage.list_condition_tiers().unwrap();
        let names: Vec<&str> = tiers.iter().map(|t| t.name.as_str()).collect();
        assert_eq!(names, vec!["Mint", "Very Good", "Good"]);

        let tier = storage.get_condition_tier_by_name("Mint").unwrap().unwrap();
        assert_eq!(tier.media_adjustment, 1.1);
        assert!(storage
            .get_condition_tier_by_name("Sealed")
            .unwrap()
            .is_none());
    }

    #[test]
    fn test_discount_upsert_keeps_single_row() {
        let storage = test_storage();
        let policy = storage.create_policy(&make_test_policy()).unwrap();
        let tier = storage
            .create_condition_tier(&make_test_tier("Good", 5, 0.5))
            .unwrap();

        let first = storage
            .upsert_policy_discount(&NewPolicyDiscount {
                policy_id: policy.id,
                condition_tier_id: tier.id,
                buy_discount_percentage: Some(10.0),
                sell_discount_percentage: None,
            })
            .unwrap();
        let second = storage
            .upsert_policy_discount(&NewPolicyDiscount {
                policy_id: policy.id,
                condition_tier_id: tier.id,
                buy_discount_percentage: Some(25.0),
                sell_discount_percentage: Some(5.0),
            })
            .unwrap();
        assert_eq!(first.id, second.id);
        assert_eq!(second.buy_discount_percentage, Some(25.0));
        assert_eq!(second.sell_discount_percentage, Some(5.0));

        let fetched = storage
            .get_policy_discount(policy.id, tier.id)
            .unwrap()
            .unwrap();
        assert_eq!(fetched.buy_discount_percentage, Some(25.0));
    }

    #[test]
    fn test_snapshot_upsert_and_hybrid_rejection() {
        let storage = test_storage();
        let release = storage
            .create_release(&make_test_release("Abraxas", "Santana"))
            .unwrap();

        let first = storage
            .upsert_snapshot(&make_test_snapshot(release.id, MarketSource::Discogs, 20.0))
            .unwrap();
        assert_eq!(first.stat_median, Some(20.0));

        let second = storage
            .upsert_snapshot(&make_test_snapshot(release.id, MarketSource::Discogs, 30.0))
            .unwrap();
        assert_eq!(second.id, first.id);
        assert_eq!(second.stat_median, Some(30.0));

        assert!(storage
            .get_snapshot(release.id, MarketSource::Ebay)
            .unwrap()
            .is_none());

        let err = storage
            .upsert_snapshot(&make_test_snapshot(release.id, MarketSource::Hybrid, 10.0))
            .unwrap_err();
        assert!(matches!(err, BrokerError::Validation(_)));
    }

    #[test]
    fn test_audit_append_and_purge() {
        let storage = test_storage();
        let release = storage
            .create_release(&make_test_release("Aja", "Steely Dan"))
            .unwrap();
        let policy = storage.create_policy(&make_test_policy()).unwrap();

        let audit_id = storage
            .append_audit(&NewCalculationAudit {
                release_id: release.id,
                policy_id: policy.id,
                market_snapshot_id: None,
                calculation_type: CalculationType::BuyOffer,
                condition_media: "Near Mint".to_string(),
                condition_sleeve: "Near Mint".to_string(),
                market_price: Some(20.0),
                final_price: 11.0,
                breakdown: "{}".to_string(),
            })
            .unwrap();

        let audit = storage.get_audit(audit_id).unwrap().unwrap();
        assert_eq!(audit.final_price, 11.0);
        assert_eq!(audit.calculation_type, CalculationType::BuyOffer);
        assert_eq!(storage.audits_for_release(release.id).unwrap().len(), 1);

        // Nothing is older than a past cutoff
        assert_eq!(storage.purge_audits_before("2000-01-01 00:00:00").unwrap(), 0);
        assert_eq!(storage.purge_audits_before("9999-01-01 00:00:00").unwrap(), 1);
        assert!(storage.get_audit(audit_id).unwrap().is_none());
    }

    #[test]
    fn test_submission_and_items() {
        let storage = test_storage();
        let item = seed_item(&storage);
        assert_eq!(item.status, ItemStatus::Pending);
        assert_eq!(item.auto_offer_price, 12.5);
        assert!(item.final_offer_price.is_none());

        let items = storage.items_for_submission(item.submission_id).unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].id, item.id);

        let submission = storage.get_submission(item.submission_id).unwrap().unwrap();
        assert_eq!(submission.submission_number, "SUB-001");
    }

    #[test]
    fn test_item_transition_guard() {
        let storage = test_storage();
        let item = seed_item(&storage);

        let applied = storage
            .apply_item_transition(
                item.id,
                ItemStatus::Pending,
                &ItemTransition {
                    status: ItemStatus::Accepted,
                    final_condition_media: Some("Very Good".to_string()),
                    final_condition_sleeve: None,
                    final_offer_price: Some(10.0),
                },
            )
            .unwrap();
        assert!(applied);

        let updated = storage.get_submission_item(item.id).unwrap().unwrap();
        assert_eq!(updated.status, ItemStatus::Accepted);
        assert_eq!(updated.final_condition_media.as_deref(), Some("Very Good"));
        // None left the sleeve column untouched
        assert!(updated.final_condition_sleeve.is_none());
        assert_eq!(updated.final_offer_price, Some(10.0));

        // Guard fails once the status moved on
        let applied = storage
            .apply_item_transition(
                item.id,
                ItemStatus::Pending,
                &ItemTransition::to_status(ItemStatus::Rejected),
            )
            .unwrap();
        assert!(!applied);
        let unchanged = storage.get_submission_item(item.id).unwrap().unwrap();
        assert_eq!(unchanged.status, ItemStatus::Accepted);
    }

    #[test]
    fn test_history_append_and_counter_resolution() {
        let storage = test_storage();
        let item = seed_item(&storage);

        storage
            .append_history(&NewHistoryEntry {
                submission_item_id: item.id,
                action_type: HistoryAction::Submitted,
                admin_notes: None,
                adjusted_price: Some(12.5),
                seller_response: None,
            })
            .unwrap();
        storage
            .append_history(&NewHistoryEntry {
                submission_item_id: item.id,
                action_type: HistoryAction::CounterOffered,
                admin_notes: Some("scuffed sleeve".to_string()),
                adjusted_price: Some(9.0),
                seller_response: Some(SellerResponse::Pending),
            })
            .unwrap();

        let resolved = storage
            .resolve_pending_counter(item.id, SellerResponse::Accepted)
            .unwrap();
        assert!(resolved);

        let history = storage.history_for_item(item.id).unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].action_type, HistoryAction::Submitted);
        assert_eq!(history[1].seller_response, Some(SellerResponse::Accepted));

        // No pending counter left to resolve
        let resolved = storage
            .resolve_pending_counter(item.id, SellerResponse::Rejected)
            .unwrap();
        assert!(!resolved);
    }

    #[test]
    fn test_lot_creation_uses_final_fields() {
        let storage = test_storage();
        let item = seed_item(&storage);
        storage
            .apply_item_transition(
                item.id,
                ItemStatus::Pending,
                &ItemTransition {
                    status: ItemStatus::Finalized,
                    final_condition_media: Some("Very Good".to_string()),
                    final_condition_sleeve: Some("Good".to_string()),
                    final_offer_price: Some(8.0),
                },
            )
            .unwrap();
        let finalized = storage.get_submission_item(item.id).unwrap().unwrap();

        let lot_number = storage.create_lot_from_item(&finalized).unwrap();
        assert_eq!(lot_number, "LOT-000001");

        let lot = storage.get_lot(&lot_number).unwrap().unwrap();
        assert_eq!(lot.condition_media, "Very Good");
        assert_eq!(lot.condition_sleeve, "Good");
        assert_eq!(lot.acquisition_price, 8.0);
        assert_eq!(lot.source_item_id, item.id);

        let second = seed_item_numbered(&storage, "SUB-002");
        let lot_number = storage.create_lot_from_item(&second).unwrap();
        assert_eq!(lot_number, "LOT-000002");
    }
}
