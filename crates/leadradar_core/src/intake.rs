//! Intake: turns search hits and pasted URLs into stored, scored leads.
//!
//! Every candidate goes canonicalize → score → atomic insert-or-touch. The
//! search engine itself is behind [`SearchSource`]; the live API client is
//! [`crate::search::WebSearchClient`].

use rusqlite::Connection;
use serde::Serialize;
use time::{Duration, OffsetDateTime};

use crate::canonicalize::{CanonicalUrl, canonicalize, extract_domain};
use crate::db::{self, InsertOutcome};
use crate::error::{LeadError, Result};
use crate::followup::start_of_day;
use crate::query::build_final_query;
use crate::schema::{
    Lead, LeadStatus, MappedService, OfferAngle, RunRecord, SearchResult, Settings, SourcePack,
};
use crate::scoring::{ScoringResult, compute_lead_score};

pub const DEFAULT_MARKET: &str = "en-US";
pub const DEFAULT_FRESHNESS: &str = "Week";
pub const MAX_MANUAL_IMPORT: usize = 50;
pub const MANUAL_IMPORT_SCORE: u8 = 50;

/// Anything that can answer a final query string with title/snippet/url hits.
pub trait SearchSource {
    fn search(
        &self,
        final_query: &str,
        params: &SearchParams,
        count: u32,
    ) -> Result<Vec<SearchResult>>;
}

/// Pre-fetched results, e.g. loaded from a JSON export of a search API response.
impl SearchSource for Vec<SearchResult> {
    fn search(
        &self,
        _final_query: &str,
        _params: &SearchParams,
        count: u32,
    ) -> Result<Vec<SearchResult>> {
        Ok(self.iter().take(count as usize).cloned().collect())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchParams {
    pub query_id: String,
    pub source_pack: SourcePack,
    pub market: String,
    pub freshness: String,
}

impl SearchParams {
    pub fn new(query_id: impl Into<String>, source_pack: SourcePack) -> Self {
        Self {
            query_id: query_id.into(),
            source_pack,
            market: DEFAULT_MARKET.to_string(),
            freshness: DEFAULT_FRESHNESS.to_string(),
        }
    }
}

/// Fails when the query already ran `query_max_runs_per_day` times today, or
/// when the owner's last finished run is inside the global cooldown.
pub fn check_rate_limits(
    settings: &Settings,
    runs_today: u32,
    last_finished_at: Option<OffsetDateTime>,
    now: OffsetDateTime,
) -> Result<()> {
    if runs_today >= settings.query_max_runs_per_day {
        return Err(LeadError::DailyRunLimit {
            limit: settings.query_max_runs_per_day,
        });
    }

    if let Some(last) = last_finished_at {
        let cooldown = Duration::minutes(i64::from(settings.global_cooldown_minutes));
        let elapsed = now - last;
        if elapsed < cooldown {
            let remaining_minutes = ((cooldown - elapsed).as_seconds_f64() / 60.0).ceil() as i64;
            return Err(LeadError::Cooldown { remaining_minutes });
        }
    }

    Ok(())
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
struct Tally {
    total: u32,
    qualified: u32,
    review: u32,
    rejected: u32,
    duplicates: u32,
}

impl Tally {
    fn count(&mut self, outcome: &InsertOutcome, status: LeadStatus) {
        self.total += 1;
        if outcome.is_duplicate() {
            self.duplicates += 1;
            return;
        }
        match status {
            LeadStatus::OutreachReady => self.qualified += 1,
            LeadStatus::Review => self.review += 1,
            LeadStatus::Rejected => self.rejected += 1,
            _ => {}
        }
    }
}

/// Runs one stored query through `source` and ingests the hits. The run is
/// recorded before searching and finalized with per-status counts, or with
/// the error if searching or ingesting failed.
pub fn run_search(
    conn: &Connection,
    owner: &str,
    params: &SearchParams,
    settings: &Settings,
    source: &dyn SearchSource,
    now: OffsetDateTime,
) -> Result<RunRecord> {
    let runs_today = db::count_runs_since(conn, owner, &params.query_id, start_of_day(now))?;
    let last_finished = db::last_finished_run_at(conn, owner)?;
    check_rate_limits(settings, runs_today, last_finished, now)?;

    let query = db::get_query_template(conn, owner, &params.query_id)?;
    let final_query = build_final_query(
        &query.base_query_text,
        params.source_pack,
        &settings.job_board_blocklist,
    );

    let mut run = RunRecord {
        id: db::new_id(),
        owner: owner.to_string(),
        query_id: query.id.clone(),
        source_pack: params.source_pack,
        market: params.market.clone(),
        freshness: params.freshness.clone(),
        final_query,
        started_at: now,
        finished_at: None,
        total_results: 0,
        qualified_results: 0,
        review_results: 0,
        rejected_results: 0,
        duplicates_removed: 0,
        error: None,
    };
    db::begin_run(conn, &run)?;
    tracing::info!(
        run_id = %run.id,
        query = %query.name,
        pack = %params.source_pack,
        "search run started"
    );

    let tally = source
        .search(&run.final_query, params, settings.max_results_per_run)
        .and_then(|results| {
            ingest_results(conn, owner, &results, query.mapped_service, settings, now)
        });

    let tally = match tally {
        Ok(tally) => tally,
        Err(err) => {
            tracing::warn!(run_id = %run.id, error = %err, "search run failed");
            db::fail_run(conn, &run.id, &err.to_string(), now)?;
            return Err(err);
        }
    };

    run.finished_at = Some(now);
    run.total_results = tally.total;
    run.qualified_results = tally.qualified;
    run.review_results = tally.review;
    run.rejected_results = tally.rejected;
    run.duplicates_removed = tally.duplicates;
    db::finish_run(conn, &run)?;

    tracing::info!(
        run_id = %run.id,
        total = tally.total,
        qualified = tally.qualified,
        review = tally.review,
        rejected = tally.rejected,
        duplicates = tally.duplicates,
        "search run finished"
    );
    Ok(run)
}

fn ingest_results(
    conn: &Connection,
    owner: &str,
    results: &[SearchResult],
    mapped_service: MappedService,
    settings: &Settings,
    now: OffsetDateTime,
) -> Result<Tally> {
    let mut tally = Tally::default();
    for result in results.iter().take(settings.max_results_per_run as usize) {
        let source_host = extract_domain(&result.url);
        let scoring = compute_lead_score(
            &result.title,
            &result.snippet,
            &source_host,
            &settings.job_board_blocklist,
        );
        let lead = new_lead(
            owner,
            &result.url,
            canonicalize(&result.url),
            source_host,
            result.title.clone(),
            result.snippet.clone(),
            &scoring,
            mapped_service,
            now,
        );
        let outcome = db::insert_or_touch_lead(conn, &lead)?;
        tracing::debug!(
            lead_id = outcome.id(),
            url = %result.url,
            score = scoring.score,
            duplicate = outcome.is_duplicate(),
            "ingested result"
        );
        tally.count(&outcome, lead.status);
    }
    Ok(tally)
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ImportSummary {
    pub imported: u32,
    pub duplicates: u32,
    pub failed: u32,
}

/// Imports pasted URLs as REVIEW leads with a neutral score. Blank lines are
/// skipped; a URL that fails to store is counted and the rest continue.
pub fn manual_import(
    conn: &Connection,
    owner: &str,
    urls: &[String],
    query_id: Option<&str>,
    settings: &Settings,
    now: OffsetDateTime,
) -> Result<ImportSummary> {
    let urls: Vec<&str> = urls.iter().map(|u| u.trim()).filter(|u| !u.is_empty()).collect();
    if urls.len() > MAX_MANUAL_IMPORT {
        return Err(LeadError::ImportTooLarge {
            max: MAX_MANUAL_IMPORT,
            got: urls.len(),
        });
    }

    let mapped_service = match query_id {
        Some(id) => db::get_query_template(conn, owner, id)?.mapped_service,
        None => MappedService::Unknown,
    };

    let mut summary = ImportSummary::default();
    for url in urls {
        let source_host = extract_domain(url);
        let title = format!("Manual Import: {source_host}");
        let snippet = format!("Manually imported from {url}");
        let scoring =
            compute_lead_score(&title, &snippet, &source_host, &settings.job_board_blocklist);

        let mut lead = new_lead(
            owner,
            url,
            canonicalize(url),
            source_host,
            title,
            snippet,
            &scoring,
            mapped_service,
            now,
        );
        lead.score = MANUAL_IMPORT_SCORE;
        lead.status = LeadStatus::Review;
        lead.override_reason = None;
        lead.rush_eligible = false;

        match db::insert_or_touch_lead(conn, &lead) {
            Ok(InsertOutcome::Created(_)) => summary.imported += 1,
            Ok(InsertOutcome::Duplicate(_)) => summary.duplicates += 1,
            Err(err) => {
                tracing::warn!(url, error = %err, "failed to import url");
                summary.failed += 1;
            }
        }
    }

    tracing::info!(
        imported = summary.imported,
        duplicates = summary.duplicates,
        failed = summary.failed,
        "manual import finished"
    );
    Ok(summary)
}

#[allow(clippy::too_many_arguments)]
fn new_lead(
    owner: &str,
    original_url: &str,
    canonical: CanonicalUrl,
    source_host: String,
    title: String,
    snippet: String,
    scoring: &ScoringResult,
    mapped_service: MappedService,
    now: OffsetDateTime,
) -> Lead {
    Lead {
        id: db::new_id(),
        owner: owner.to_string(),
        original_url: original_url.to_string(),
        canonical_url: canonical.canonical,
        url_hash: canonical.hash,
        title,
        snippet,
        source_host,
        first_seen_at: now,
        last_seen_at: now,
        buyer_type: scoring.buyer_type,
        pain_tags: scoring.pain_tag_strings(),
        mapped_service,
        offer_angle: OfferAngle::Any,
        score: scoring.score,
        status: scoring.status,
        override_reason: scoring.override_reason,
        rush_eligible: scoring.rush_eligible,
        notes: String::new(),
        last_outreach_at: None,
        next_follow_up_at: None,
        updated_at: now,
    }
}
