use rusqlite::types::Type;
use rusqlite::{Connection, OptionalExtension, Row, params};
use serde_json::Value;
use std::path::Path;
use std::str::FromStr;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::error::{LeadError, Result};
use crate::followup::{self, FollowUpDelays};
use crate::schema::{
    Lead, LeadEvent, LeadEventType, LeadStatus, OfferAngle, OutreachTemplate, OverrideReason,
    QueryTemplate, RunRecord, Settings, TemplateType,
};

pub const DEFAULT_LEAD_LIMIT: u32 = 100;
pub const DEFAULT_EVENT_LIMIT: u32 = 20;

pub fn open(db_path: &Path) -> Result<Connection> {
    let conn = Connection::open(db_path)?;
    conn.pragma_update(None, "journal_mode", "WAL")?;
    conn.pragma_update(None, "synchronous", "NORMAL")?;
    init(&conn)?;
    Ok(conn)
}

pub fn open_in_memory() -> Result<Connection> {
    let conn = Connection::open_in_memory()?;
    init(&conn)?;
    Ok(conn)
}

fn init(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        r#"
        CREATE TABLE IF NOT EXISTS settings (
          owner TEXT PRIMARY KEY,
          body_json TEXT NOT NULL,
          updated_at INTEGER NOT NULL
        );

        CREATE TABLE IF NOT EXISTS query_templates (
          id TEXT NOT NULL,
          owner TEXT NOT NULL,
          name TEXT NOT NULL,
          engine TEXT NOT NULL,
          category TEXT NOT NULL,
          mapped_service TEXT NOT NULL,
          base_query_text TEXT NOT NULL,
          is_active INTEGER NOT NULL,
          created_at INTEGER NOT NULL,
          updated_at INTEGER NOT NULL,
          PRIMARY KEY (owner, id)
        );

        CREATE TABLE IF NOT EXISTS outreach_templates (
          id TEXT NOT NULL,
          owner TEXT NOT NULL,
          name TEXT NOT NULL,
          template_type TEXT NOT NULL,
          body TEXT NOT NULL,
          applicable_buyer_type TEXT NOT NULL,
          applicable_service TEXT NOT NULL,
          applicable_offer_angle TEXT NOT NULL,
          priority INTEGER NOT NULL,
          is_active INTEGER NOT NULL,
          created_at INTEGER NOT NULL,
          updated_at INTEGER NOT NULL,
          PRIMARY KEY (owner, id)
        );

        CREATE TABLE IF NOT EXISTS runs (
          id TEXT PRIMARY KEY,
          owner TEXT NOT NULL,
          query_id TEXT NOT NULL,
          source_pack TEXT NOT NULL,
          market TEXT NOT NULL,
          freshness TEXT NOT NULL,
          final_query TEXT NOT NULL,
          started_at INTEGER NOT NULL,
          finished_at INTEGER,
          total_results INTEGER NOT NULL DEFAULT 0,
          qualified_results INTEGER NOT NULL DEFAULT 0,
          review_results INTEGER NOT NULL DEFAULT 0,
          rejected_results INTEGER NOT NULL DEFAULT 0,
          duplicates_removed INTEGER NOT NULL DEFAULT 0,
          error TEXT
        );

        CREATE INDEX IF NOT EXISTS idx_runs_owner_query ON runs(owner, query_id, started_at);

        CREATE TABLE IF NOT EXISTS leads (
          id TEXT PRIMARY KEY,
          owner TEXT NOT NULL,
          original_url TEXT NOT NULL,
          canonical_url TEXT NOT NULL,
          url_hash TEXT NOT NULL,
          title TEXT NOT NULL,
          snippet TEXT NOT NULL,
          source_host TEXT NOT NULL,
          first_seen_at INTEGER NOT NULL,
          last_seen_at INTEGER NOT NULL,
          buyer_type TEXT NOT NULL,
          pain_tags_json TEXT NOT NULL,
          mapped_service TEXT NOT NULL,
          offer_angle TEXT NOT NULL,
          score INTEGER NOT NULL,
          status TEXT NOT NULL,
          override_reason TEXT,
          rush_eligible INTEGER NOT NULL,
          notes TEXT NOT NULL DEFAULT '',
          last_outreach_at INTEGER,
          next_follow_up_at INTEGER,
          updated_at INTEGER NOT NULL,
          UNIQUE(owner, canonical_url)
        );

        CREATE INDEX IF NOT EXISTS idx_leads_url_hash ON leads(url_hash);
        CREATE INDEX IF NOT EXISTS idx_leads_follow_up ON leads(owner, next_follow_up_at);

        CREATE TABLE IF NOT EXISTS lead_events (
          id TEXT PRIMARY KEY,
          owner TEXT NOT NULL,
          lead_id TEXT NOT NULL REFERENCES leads(id),
          event_type TEXT NOT NULL,
          message_preview TEXT,
          template_id TEXT,
          payload_json TEXT NOT NULL,
          created_at INTEGER NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_lead_events_lead ON lead_events(lead_id, created_at);
        "#,
    )?;
    Ok(())
}

pub fn new_id() -> String {
    Uuid::new_v4().to_string()
}

// ---------- settings ----------

/// Returns the owner's settings, persisting `defaults` on first read.
pub fn get_or_create_settings(
    conn: &Connection,
    owner: &str,
    defaults: &Settings,
    now: OffsetDateTime,
) -> Result<Settings> {
    let existing: Option<String> = conn
        .query_row(
            "SELECT body_json FROM settings WHERE owner = ?1",
            params![owner],
            |row| row.get(0),
        )
        .optional()?;

    match existing {
        Some(body) => Ok(serde_json::from_str(&body)?),
        None => {
            conn.execute(
                "INSERT OR IGNORE INTO settings (owner, body_json, updated_at) VALUES (?1, ?2, ?3)",
                params![owner, serde_json::to_string(defaults)?, now.unix_timestamp()],
            )?;
            Ok(defaults.clone())
        }
    }
}

pub fn save_settings(
    conn: &Connection,
    owner: &str,
    settings: &Settings,
    now: OffsetDateTime,
) -> Result<()> {
    conn.execute(
        r#"
        INSERT INTO settings (owner, body_json, updated_at)
        VALUES (?1, ?2, ?3)
        ON CONFLICT(owner) DO UPDATE SET
          body_json=excluded.body_json,
          updated_at=excluded.updated_at
        "#,
        params![owner, serde_json::to_string(settings)?, now.unix_timestamp()],
    )?;
    Ok(())
}

// ---------- query templates ----------

const QUERY_TEMPLATE_COLUMNS: &str = "id, owner, name, engine, category, mapped_service, \
     base_query_text, is_active, created_at, updated_at";

/// Insert or refresh a query template. Name, base text and active flag of an
/// existing row belong to the user, so re-seeding only refreshes the rest.
pub fn upsert_query_template(conn: &Connection, template: &QueryTemplate) -> Result<()> {
    conn.execute(
        r#"
        INSERT INTO query_templates (
          id, owner, name, engine, category, mapped_service,
          base_query_text, is_active, created_at, updated_at
        )
        VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
        ON CONFLICT(owner, id) DO UPDATE SET
          engine=excluded.engine,
          category=excluded.category,
          mapped_service=excluded.mapped_service
        "#,
        params![
            template.id,
            template.owner,
            template.name,
            template.engine,
            template.category.as_str(),
            template.mapped_service.as_str(),
            template.base_query_text,
            template.is_active,
            template.created_at.unix_timestamp(),
            template.updated_at.unix_timestamp(),
        ],
    )?;
    Ok(())
}

pub fn list_query_templates(
    conn: &Connection,
    owner: &str,
    active_only: bool,
) -> Result<Vec<QueryTemplate>> {
    let sql = format!(
        "SELECT {QUERY_TEMPLATE_COLUMNS} FROM query_templates \
         WHERE owner = ?1 AND (?2 = 0 OR is_active = 1) ORDER BY name"
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map(params![owner, active_only], query_template_from_row)?;
    Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
}

pub fn get_query_template(conn: &Connection, owner: &str, id: &str) -> Result<QueryTemplate> {
    let sql = format!(
        "SELECT {QUERY_TEMPLATE_COLUMNS} FROM query_templates WHERE owner = ?1 AND id = ?2"
    );
    conn.query_row(&sql, params![owner, id], query_template_from_row)
        .optional()?
        .ok_or_else(|| LeadError::QueryNotFound(id.to_string()))
}

pub fn set_query_template_active(
    conn: &Connection,
    owner: &str,
    id: &str,
    active: bool,
    now: OffsetDateTime,
) -> Result<()> {
    let changed = conn.execute(
        "UPDATE query_templates SET is_active = ?3, updated_at = ?4 WHERE owner = ?1 AND id = ?2",
        params![owner, id, active, now.unix_timestamp()],
    )?;
    if changed == 0 {
        return Err(LeadError::QueryNotFound(id.to_string()));
    }
    Ok(())
}

/// Applies a user edit of name and/or base text. `None` leaves a field as is.
pub fn update_query_template(
    conn: &Connection,
    owner: &str,
    id: &str,
    name: Option<&str>,
    base_query_text: Option<&str>,
    now: OffsetDateTime,
) -> Result<QueryTemplate> {
    let changed = conn.execute(
        r#"
        UPDATE query_templates SET
          name = COALESCE(?3, name),
          base_query_text = COALESCE(?4, base_query_text),
          updated_at = ?5
        WHERE owner = ?1 AND id = ?2
        "#,
        params![owner, id, name, base_query_text, now.unix_timestamp()],
    )?;
    if changed == 0 {
        return Err(LeadError::QueryNotFound(id.to_string()));
    }
    get_query_template(conn, owner, id)
}

fn query_template_from_row(row: &Row<'_>) -> rusqlite::Result<QueryTemplate> {
    Ok(QueryTemplate {
        id: row.get(0)?,
        owner: row.get(1)?,
        name: row.get(2)?,
        engine: row.get(3)?,
        category: wire(row, 4)?,
        mapped_service: wire(row, 5)?,
        base_query_text: row.get(6)?,
        is_active: row.get(7)?,
        created_at: timestamp(row, 8)?,
        updated_at: timestamp(row, 9)?,
    })
}

// ---------- outreach templates ----------

const OUTREACH_TEMPLATE_COLUMNS: &str = "id, owner, name, template_type, body, \
     applicable_buyer_type, applicable_service, applicable_offer_angle, priority, is_active, \
     created_at, updated_at";

pub fn upsert_outreach_template(conn: &Connection, template: &OutreachTemplate) -> Result<()> {
    conn.execute(
        r#"
        INSERT INTO outreach_templates (
          id, owner, name, template_type, body,
          applicable_buyer_type, applicable_service, applicable_offer_angle,
          priority, is_active, created_at, updated_at
        )
        VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)
        ON CONFLICT(owner, id) DO UPDATE SET
          name=excluded.name,
          template_type=excluded.template_type,
          body=excluded.body,
          applicable_buyer_type=excluded.applicable_buyer_type,
          applicable_service=excluded.applicable_service,
          applicable_offer_angle=excluded.applicable_offer_angle,
          priority=excluded.priority,
          updated_at=excluded.updated_at
        "#,
        params![
            template.id,
            template.owner,
            template.name,
            template.template_type.as_str(),
            template.body,
            template.applicable_buyer_type.as_str(),
            template.applicable_service.as_str(),
            template.applicable_offer_angle.as_str(),
            template.priority,
            template.is_active,
            template.created_at.unix_timestamp(),
            template.updated_at.unix_timestamp(),
        ],
    )?;
    Ok(())
}

/// Templates of one owner, optionally narrowed to a single message type.
/// Inactive templates are included; selection filters them itself.
pub fn list_outreach_templates(
    conn: &Connection,
    owner: &str,
    template_type: Option<TemplateType>,
) -> Result<Vec<OutreachTemplate>> {
    let sql = format!(
        "SELECT {OUTREACH_TEMPLATE_COLUMNS} FROM outreach_templates \
         WHERE owner = ?1 AND (?2 IS NULL OR template_type = ?2) \
         ORDER BY template_type, priority DESC, name"
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map(
        params![owner, template_type.map(|t| t.as_str())],
        outreach_template_from_row,
    )?;
    Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
}

pub fn set_outreach_template_active(
    conn: &Connection,
    owner: &str,
    id: &str,
    active: bool,
    now: OffsetDateTime,
) -> Result<()> {
    let changed = conn.execute(
        "UPDATE outreach_templates SET is_active = ?3, updated_at = ?4 \
         WHERE owner = ?1 AND id = ?2",
        params![owner, id, active, now.unix_timestamp()],
    )?;
    if changed == 0 {
        return Err(LeadError::TemplateNotFound(id.to_string()));
    }
    Ok(())
}

fn outreach_template_from_row(row: &Row<'_>) -> rusqlite::Result<OutreachTemplate> {
    Ok(OutreachTemplate {
        id: row.get(0)?,
        owner: row.get(1)?,
        name: row.get(2)?,
        template_type: wire(row, 3)?,
        body: row.get(4)?,
        applicable_buyer_type: wire(row, 5)?,
        applicable_service: wire(row, 6)?,
        applicable_offer_angle: wire(row, 7)?,
        priority: row.get(8)?,
        is_active: row.get(9)?,
        created_at: timestamp(row, 10)?,
        updated_at: timestamp(row, 11)?,
    })
}

// ---------- runs ----------

pub fn begin_run(conn: &Connection, run: &RunRecord) -> Result<()> {
    conn.execute(
        r#"
        INSERT INTO runs (
          id, owner, query_id, source_pack, market, freshness, final_query, started_at
        )
        VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
        "#,
        params![
            run.id,
            run.owner,
            run.query_id,
            run.source_pack.as_str(),
            run.market,
            run.freshness,
            run.final_query,
            run.started_at.unix_timestamp(),
        ],
    )?;
    Ok(())
}

/// Writes the counts, finish time and error of a completed run.
pub fn finish_run(conn: &Connection, run: &RunRecord) -> Result<()> {
    conn.execute(
        r#"
        UPDATE runs SET
          finished_at = ?2,
          total_results = ?3,
          qualified_results = ?4,
          review_results = ?5,
          rejected_results = ?6,
          duplicates_removed = ?7,
          error = ?8
        WHERE id = ?1
        "#,
        params![
            run.id,
            run.finished_at.map(|t| t.unix_timestamp()),
            run.total_results,
            run.qualified_results,
            run.review_results,
            run.rejected_results,
            run.duplicates_removed,
            run.error,
        ],
    )?;
    Ok(())
}

pub fn fail_run(conn: &Connection, run_id: &str, message: &str, at: OffsetDateTime) -> Result<()> {
    conn.execute(
        "UPDATE runs SET finished_at = ?2, error = ?3 WHERE id = ?1",
        params![run_id, at.unix_timestamp(), message],
    )?;
    Ok(())
}

pub fn count_runs_since(
    conn: &Connection,
    owner: &str,
    query_id: &str,
    since: OffsetDateTime,
) -> Result<u32> {
    let count: u32 = conn.query_row(
        "SELECT COUNT(*) FROM runs WHERE owner = ?1 AND query_id = ?2 AND started_at >= ?3",
        params![owner, query_id, since.unix_timestamp()],
        |row| row.get(0),
    )?;
    Ok(count)
}

pub fn last_finished_run_at(conn: &Connection, owner: &str) -> Result<Option<OffsetDateTime>> {
    let secs: Option<i64> = conn.query_row(
        "SELECT MAX(finished_at) FROM runs WHERE owner = ?1",
        params![owner],
        |row| row.get(0),
    )?;
    secs.map(OffsetDateTime::from_unix_timestamp)
        .transpose()
        .map_err(LeadError::from)
}

pub fn list_runs(conn: &Connection, owner: &str, limit: u32) -> Result<Vec<RunRecord>> {
    let mut stmt = conn.prepare(
        r#"
        SELECT id, owner, query_id, source_pack, market, freshness, final_query,
               started_at, finished_at, total_results, qualified_results,
               review_results, rejected_results, duplicates_removed, error
        FROM runs WHERE owner = ?1
        ORDER BY started_at DESC, rowid DESC
        LIMIT ?2
        "#,
    )?;
    let rows = stmt.query_map(params![owner, limit], |row| {
        Ok(RunRecord {
            id: row.get(0)?,
            owner: row.get(1)?,
            query_id: row.get(2)?,
            source_pack: wire(row, 3)?,
            market: row.get(4)?,
            freshness: row.get(5)?,
            final_query: row.get(6)?,
            started_at: timestamp(row, 7)?,
            finished_at: optional_timestamp(row, 8)?,
            total_results: row.get(9)?,
            qualified_results: row.get(10)?,
            review_results: row.get(11)?,
            rejected_results: row.get(12)?,
            duplicates_removed: row.get(13)?,
            error: row.get(14)?,
        })
    })?;
    Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
}

// ---------- leads ----------

const LEAD_COLUMNS: &str = "id, owner, original_url, canonical_url, url_hash, title, snippet, \
     source_host, first_seen_at, last_seen_at, buyer_type, pain_tags_json, mapped_service, \
     offer_angle, score, status, override_reason, rush_eligible, notes, last_outreach_at, \
     next_follow_up_at, updated_at";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InsertOutcome {
    Created(String),
    /// The canonical URL was already known; its `last_seen_at` was bumped.
    Duplicate(String),
}

impl InsertOutcome {
    pub fn id(&self) -> &str {
        match self {
            InsertOutcome::Created(id) | InsertOutcome::Duplicate(id) => id,
        }
    }

    pub fn is_duplicate(&self) -> bool {
        matches!(self, InsertOutcome::Duplicate(_))
    }
}

/// Single-statement dedup on (owner, canonical_url). Concurrent writers of
/// the same URL resolve inside SQLite, so callers never check-then-insert.
pub fn insert_or_touch_lead(conn: &Connection, lead: &Lead) -> Result<InsertOutcome> {
    let id: String = conn.query_row(
        r#"
        INSERT INTO leads (
          id, owner, original_url, canonical_url, url_hash, title, snippet,
          source_host, first_seen_at, last_seen_at, buyer_type, pain_tags_json,
          mapped_service, offer_angle, score, status, override_reason,
          rush_eligible, notes, last_outreach_at, next_follow_up_at, updated_at
        )
        VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15,
                ?16, ?17, ?18, ?19, ?20, ?21, ?22)
        ON CONFLICT(owner, canonical_url) DO UPDATE SET
          last_seen_at=excluded.last_seen_at
        RETURNING id
        "#,
        params![
            lead.id,
            lead.owner,
            lead.original_url,
            lead.canonical_url,
            lead.url_hash,
            lead.title,
            lead.snippet,
            lead.source_host,
            lead.first_seen_at.unix_timestamp(),
            lead.last_seen_at.unix_timestamp(),
            lead.buyer_type.as_str(),
            serde_json::to_string(&lead.pain_tags)?,
            lead.mapped_service.as_str(),
            lead.offer_angle.as_str(),
            lead.score,
            lead.status.as_str(),
            lead.override_reason.map(|r| r.as_str()),
            lead.rush_eligible,
            lead.notes,
            lead.last_outreach_at.map(|t| t.unix_timestamp()),
            lead.next_follow_up_at.map(|t| t.unix_timestamp()),
            lead.updated_at.unix_timestamp(),
        ],
        |row| row.get(0),
    )?;

    if id == lead.id {
        Ok(InsertOutcome::Created(id))
    } else {
        Ok(InsertOutcome::Duplicate(id))
    }
}

pub fn get_lead(conn: &Connection, owner: &str, id: &str) -> Result<Lead> {
    let sql = format!("SELECT {LEAD_COLUMNS} FROM leads WHERE owner = ?1 AND id = ?2");
    conn.query_row(&sql, params![owner, id], lead_from_row)
        .optional()?
        .ok_or_else(|| LeadError::LeadNotFound(id.to_string()))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LeadSort {
    #[default]
    Score,
    Newest,
    Updated,
}

impl LeadSort {
    fn order_by(self) -> &'static str {
        match self {
            LeadSort::Score => "score DESC, last_seen_at DESC",
            LeadSort::Newest => "first_seen_at DESC, rowid DESC",
            LeadSort::Updated => "updated_at DESC, rowid DESC",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LeadFilter {
    pub status: Option<LeadStatus>,
    pub sort: LeadSort,
    /// `None` lists every matching lead.
    pub limit: Option<u32>,
}

impl Default for LeadFilter {
    fn default() -> Self {
        Self {
            status: None,
            sort: LeadSort::Score,
            limit: Some(DEFAULT_LEAD_LIMIT),
        }
    }
}

pub fn list_leads(conn: &Connection, owner: &str, filter: &LeadFilter) -> Result<Vec<Lead>> {
    let sql = format!(
        "SELECT {LEAD_COLUMNS} FROM leads \
         WHERE owner = ?1 AND (?2 IS NULL OR status = ?2) \
         ORDER BY {} LIMIT ?3",
        filter.sort.order_by()
    );
    // SQLite treats a negative LIMIT as unbounded.
    let limit = filter.limit.map_or(-1, i64::from);
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map(
        params![owner, filter.status.map(|s| s.as_str()), limit],
        lead_from_row,
    )?;
    Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
}

/// Leads with a scheduled follow-up, soonest first.
pub fn list_follow_ups(conn: &Connection, owner: &str) -> Result<Vec<Lead>> {
    let sql = format!(
        "SELECT {LEAD_COLUMNS} FROM leads \
         WHERE owner = ?1 AND next_follow_up_at IS NOT NULL \
         ORDER BY next_follow_up_at ASC"
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map(params![owner], lead_from_row)?;
    Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
}

/// Manual edits to a lead. `None` leaves a field untouched; the nested
/// options on nullable fields distinguish "clear" from "keep".
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LeadPatch {
    pub status: Option<LeadStatus>,
    pub notes: Option<String>,
    pub next_follow_up_at: Option<Option<OffsetDateTime>>,
    pub offer_angle: Option<OfferAngle>,
    pub override_reason: Option<Option<OverrideReason>>,
}

impl LeadPatch {
    pub fn is_empty(&self) -> bool {
        *self == LeadPatch::default()
    }

    fn apply(&self, lead: &mut Lead) {
        if let Some(status) = self.status {
            lead.status = status;
        }
        if let Some(notes) = &self.notes {
            lead.notes = notes.clone();
        }
        if let Some(next) = self.next_follow_up_at {
            lead.next_follow_up_at = next;
        }
        if let Some(angle) = self.offer_angle {
            lead.offer_angle = angle;
        }
        if let Some(reason) = self.override_reason {
            lead.override_reason = reason;
        }
    }
}

pub fn update_lead(
    conn: &Connection,
    owner: &str,
    id: &str,
    patch: &LeadPatch,
    now: OffsetDateTime,
) -> Result<Lead> {
    let mut lead = get_lead(conn, owner, id)?;
    patch.apply(&mut lead);
    lead.updated_at = now;
    write_lead_state(conn, &lead)?;
    Ok(lead)
}

/// Sets the same status on many leads in one transaction. Unknown ids are
/// skipped; the number of leads changed is returned.
pub fn bulk_update_status(
    conn: &mut Connection,
    owner: &str,
    ids: &[String],
    status: LeadStatus,
    now: OffsetDateTime,
) -> Result<usize> {
    let tx = conn.transaction()?;
    let mut changed = 0;
    {
        let mut stmt = tx.prepare(
            "UPDATE leads SET status = ?3, updated_at = ?4 WHERE owner = ?1 AND id = ?2",
        )?;
        for id in ids {
            changed += stmt.execute(params![owner, id, status.as_str(), now.unix_timestamp()])?;
        }
    }
    tx.commit()?;
    Ok(changed)
}

fn write_lead_state(conn: &Connection, lead: &Lead) -> Result<()> {
    conn.execute(
        r#"
        UPDATE leads SET
          status = ?3,
          notes = ?4,
          offer_angle = ?5,
          override_reason = ?6,
          last_outreach_at = ?7,
          next_follow_up_at = ?8,
          updated_at = ?9
        WHERE owner = ?1 AND id = ?2
        "#,
        params![
            lead.owner,
            lead.id,
            lead.status.as_str(),
            lead.notes,
            lead.offer_angle.as_str(),
            lead.override_reason.map(|r| r.as_str()),
            lead.last_outreach_at.map(|t| t.unix_timestamp()),
            lead.next_follow_up_at.map(|t| t.unix_timestamp()),
            lead.updated_at.unix_timestamp(),
        ],
    )?;
    Ok(())
}

fn lead_from_row(row: &Row<'_>) -> rusqlite::Result<Lead> {
    let pain_tags_json: String = row.get(11)?;
    let pain_tags: Vec<String> = serde_json::from_str(&pain_tags_json)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(11, Type::Text, Box::new(e)))?;

    Ok(Lead {
        id: row.get(0)?,
        owner: row.get(1)?,
        original_url: row.get(2)?,
        canonical_url: row.get(3)?,
        url_hash: row.get(4)?,
        title: row.get(5)?,
        snippet: row.get(6)?,
        source_host: row.get(7)?,
        first_seen_at: timestamp(row, 8)?,
        last_seen_at: timestamp(row, 9)?,
        buyer_type: wire(row, 10)?,
        pain_tags,
        mapped_service: wire(row, 12)?,
        offer_angle: wire(row, 13)?,
        score: row.get(14)?,
        status: wire(row, 15)?,
        override_reason: optional_wire(row, 16)?,
        rush_eligible: row.get(17)?,
        notes: row.get(18)?,
        last_outreach_at: optional_timestamp(row, 19)?,
        next_follow_up_at: optional_timestamp(row, 20)?,
        updated_at: timestamp(row, 21)?,
    })
}

// ---------- events ----------

#[derive(Debug, Clone, PartialEq)]
pub struct NewEvent {
    pub event_type: LeadEventType,
    pub message_preview: Option<String>,
    pub template_id: Option<String>,
    pub payload: Value,
}

impl NewEvent {
    pub fn of(event_type: LeadEventType) -> Self {
        Self {
            event_type,
            message_preview: None,
            template_id: None,
            payload: Value::Object(Default::default()),
        }
    }
}

/// Appends an event and applies its status/follow-up transition to the lead,
/// both in one transaction. Returns the updated lead.
pub fn record_event(
    conn: &mut Connection,
    owner: &str,
    lead_id: &str,
    event: &NewEvent,
    at: OffsetDateTime,
    delays: FollowUpDelays,
) -> Result<(LeadEvent, Lead)> {
    let tx = conn.transaction()?;

    let mut lead = get_lead(&tx, owner, lead_id)?;
    let step = followup::transition(lead.status, event.event_type, at, delays);
    let previous_status = lead.status;

    let recorded = LeadEvent {
        id: new_id(),
        owner: owner.to_string(),
        lead_id: lead_id.to_string(),
        event_type: event.event_type,
        message_preview: event.message_preview.clone(),
        template_id: event.template_id.clone(),
        payload: event.payload.clone(),
        created_at: at,
    };
    tx.execute(
        r#"
        INSERT INTO lead_events (
          id, owner, lead_id, event_type, message_preview, template_id,
          payload_json, created_at
        )
        VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
        "#,
        params![
            recorded.id,
            recorded.owner,
            recorded.lead_id,
            recorded.event_type.as_str(),
            recorded.message_preview,
            recorded.template_id,
            serde_json::to_string(&recorded.payload)?,
            recorded.created_at.unix_timestamp(),
        ],
    )?;

    lead.status = step.status;
    lead.next_follow_up_at = step.follow_up.apply(lead.next_follow_up_at);
    if let Some(sent_at) = step.outreach_at {
        lead.last_outreach_at = Some(sent_at);
    }
    lead.updated_at = at;
    write_lead_state(&tx, &lead)?;

    tx.commit()?;

    tracing::debug!(
        lead_id,
        event = %event.event_type,
        from = %previous_status,
        to = %lead.status,
        "recorded lead event"
    );
    Ok((recorded, lead))
}

pub fn list_events(
    conn: &Connection,
    owner: &str,
    lead_id: &str,
    limit: u32,
) -> Result<Vec<LeadEvent>> {
    let mut stmt = conn.prepare(
        r#"
        SELECT id, owner, lead_id, event_type, message_preview, template_id,
               payload_json, created_at
        FROM lead_events
        WHERE owner = ?1 AND lead_id = ?2
        ORDER BY created_at DESC, rowid DESC
        LIMIT ?3
        "#,
    )?;
    let rows = stmt.query_map(params![owner, lead_id, limit], |row| {
        let payload_json: String = row.get(6)?;
        let payload = serde_json::from_str(&payload_json)
            .map_err(|e| rusqlite::Error::FromSqlConversionFailure(6, Type::Text, Box::new(e)))?;
        Ok(LeadEvent {
            id: row.get(0)?,
            owner: row.get(1)?,
            lead_id: row.get(2)?,
            event_type: wire(row, 3)?,
            message_preview: row.get(4)?,
            template_id: row.get(5)?,
            payload,
            created_at: timestamp(row, 7)?,
        })
    })?;
    Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
}

// ---------- row helpers ----------

fn timestamp(row: &Row<'_>, idx: usize) -> rusqlite::Result<OffsetDateTime> {
    let secs: i64 = row.get(idx)?;
    OffsetDateTime::from_unix_timestamp(secs)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Integer, Box::new(e)))
}

fn optional_timestamp(row: &Row<'_>, idx: usize) -> rusqlite::Result<Option<OffsetDateTime>> {
    let secs: Option<i64> = row.get(idx)?;
    secs.map(|s| {
        OffsetDateTime::from_unix_timestamp(s)
            .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Integer, Box::new(e)))
    })
    .transpose()
}

fn wire<T>(row: &Row<'_>, idx: usize) -> rusqlite::Result<T>
where
    T: FromStr<Err = LeadError>,
{
    let raw: String = row.get(idx)?;
    raw.parse()
        .map_err(|e: LeadError| {
            rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e))
        })
}

fn optional_wire<T>(row: &Row<'_>, idx: usize) -> rusqlite::Result<Option<T>>
where
    T: FromStr<Err = LeadError>,
{
    let raw: Option<String> = row.get(idx)?;
    raw.map(|value| {
        value.parse().map_err(|e: LeadError| {
            rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e))
        })
    })
    .transpose()
}
