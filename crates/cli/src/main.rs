use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand, ValueEnum};
use leadradar_core::canonicalize::{canonicalize, extract_domain};
use leadradar_core::config::{AppConfig, Catalog, validate_settings};
use leadradar_core::db::{self, LeadFilter, LeadPatch, LeadSort, NewEvent};
use leadradar_core::followup::{FollowUpDelays, build_today_queue};
use leadradar_core::intake::{self, SearchParams, SearchSource};
use leadradar_core::query::{build_final_query, source_pack_label};
use leadradar_core::schema::{
    Lead, LeadEvent, LeadEventType, LeadStatus, OfferAngle, OutreachTemplate, OverrideReason,
    QueryTemplate, RunRecord, SearchResult, Settings, SourcePack, TemplateType,
};
use leadradar_core::scoring::{ScoringResult, compute_lead_score};
use leadradar_core::search::{self, WebSearchClient};
use leadradar_core::templates::{FillContext, LeadProfile, draft_message};
use rusqlite::Connection;
use schemars::schema_for;
use serde_json::Value;
use std::fs;
use std::path::{Path, PathBuf};
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "leadradar")]
#[command(about = "Lead intake, scoring and outreach CLI", long_about = None)]
struct Cli {
    /// Config file; defaults apply when it does not exist
    #[arg(long, global = true, env = "LEADRADAR_CONFIG", default_value = "leadradar.toml")]
    config: PathBuf,

    /// Override the database path from the config file
    #[arg(long, global = true, env = "LEADRADAR_DB")]
    db: Option<PathBuf>,

    /// Override the owner from the config file
    #[arg(long, global = true, env = "LEADRADAR_OWNER")]
    owner: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create the database and load the seed catalog
    Init {
        /// Directory holding queries.yaml and templates.yaml
        #[arg(long)]
        seed_dir: Option<PathBuf>,
    },
    /// Export JSON Schemas for the stored and exchanged types
    Schema {
        #[command(subcommand)]
        command: SchemaCommands,
    },
    /// Show or change the owner's settings
    Settings {
        #[command(subcommand)]
        command: SettingsCommands,
    },
    /// Manage search query templates
    Query {
        #[command(subcommand)]
        command: QueryCommands,
    },
    /// Manage outreach message templates
    Template {
        #[command(subcommand)]
        command: TemplateCommands,
    },
    /// Score a title/snippet/url without storing anything
    Score {
        title: String,
        #[arg(long, default_value = "")]
        snippet: String,
        #[arg(long, default_value = "")]
        url: String,
    },
    /// Print the canonical form and hash of a URL
    Canonicalize { url: String },
    /// Run a query against the web search API and ingest the hits
    Run {
        query_id: String,
        #[arg(long, default_value = "FORUMS")]
        pack: SourcePack,
        #[arg(long, default_value = intake::DEFAULT_MARKET)]
        market: String,
        #[arg(long, default_value = intake::DEFAULT_FRESHNESS)]
        freshness: String,
        /// Ingest hits from a file instead of calling the API: a JSON array of
        /// {title, snippet, url} or a saved web search API response
        #[arg(long)]
        results: Option<PathBuf>,
    },
    /// Import pasted URLs as leads for review
    Import {
        /// Take the mapped service from this query template
        #[arg(long)]
        query: Option<String>,
        /// File with one URL per line
        #[arg(long)]
        file: Option<PathBuf>,
        urls: Vec<String>,
    },
    /// List leads
    Leads {
        #[arg(long)]
        status: Option<LeadStatus>,
        #[arg(long, value_enum, default_value_t = SortArg::Score)]
        sort: SortArg,
        #[arg(long, default_value_t = db::DEFAULT_LEAD_LIMIT)]
        limit: u32,
    },
    /// Inspect or edit a single lead
    Lead {
        #[command(subcommand)]
        command: LeadCommands,
    },
    /// Record an outreach event and apply its follow-up transition
    Event {
        lead_id: String,
        event_type: LeadEventType,
        #[arg(long)]
        preview: Option<String>,
        #[arg(long)]
        template: Option<String>,
        /// Arbitrary JSON stored with the event
        #[arg(long)]
        payload: Option<String>,
    },
    /// Select and fill the best outreach template for a lead
    Draft {
        lead_id: String,
        #[arg(long = "type", default_value = "DM_1")]
        template_type: TemplateType,
        /// utm_campaign value for the order link
        #[arg(long)]
        category: Option<String>,
        /// Also record the matching *_SENT event
        #[arg(long)]
        send: bool,
    },
    /// Show overdue, due and upcoming follow-ups
    Today,
    /// Obsidian vault export
    Vault {
        #[command(subcommand)]
        command: VaultCommands,
    },
}

#[derive(Subcommand)]
enum SchemaCommands {
    /// Export JSON Schema files
    Export {
        /// Output directory (default: ./schemas)
        #[arg(long, default_value = "schemas")]
        out_dir: PathBuf,
    },
}

#[derive(Subcommand)]
enum SettingsCommands {
    Show,
    /// Set one field; the value is parsed as JSON, falling back to a string
    Set { key: String, value: String },
}

#[derive(Subcommand)]
enum QueryCommands {
    List {
        /// Include inactive templates
        #[arg(long)]
        all: bool,
    },
    /// Print the final search string for a query and source pack
    Build {
        query_id: String,
        #[arg(long, default_value = "FORUMS")]
        pack: SourcePack,
    },
    /// Rename a query template or change its base search text
    Set {
        query_id: String,
        #[arg(long)]
        name: Option<String>,
        #[arg(long)]
        text: Option<String>,
    },
    /// Flip a query template between active and inactive
    Toggle { query_id: String },
}

#[derive(Subcommand)]
enum TemplateCommands {
    List {
        #[arg(long = "type")]
        template_type: Option<TemplateType>,
    },
    /// Flip an outreach template between active and inactive
    Toggle { template_id: String },
}

#[derive(Subcommand)]
enum LeadCommands {
    /// Print a lead and its recent events as JSON
    Show { lead_id: String },
    /// Edit fields of a lead
    Set {
        lead_id: String,
        #[arg(long)]
        status: Option<LeadStatus>,
        #[arg(long)]
        notes: Option<String>,
        /// RFC 3339 timestamp
        #[arg(long, value_parser = parse_timestamp, conflicts_with = "clear_follow_up")]
        follow_up: Option<OffsetDateTime>,
        #[arg(long)]
        clear_follow_up: bool,
        #[arg(long)]
        offer_angle: Option<OfferAngle>,
        #[arg(long)]
        override_reason: Option<OverrideReason>,
    },
    /// Set the same status on several leads
    Status {
        status: LeadStatus,
        #[arg(required = true)]
        lead_ids: Vec<String>,
    },
}

#[derive(Subcommand)]
enum VaultCommands {
    Build {
        #[arg(long, default_value = "vault")]
        out_dir: PathBuf,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum SortArg {
    Score,
    Newest,
    Updated,
}

impl From<SortArg> for LeadSort {
    fn from(sort: SortArg) -> Self {
        match sort {
            SortArg::Score => LeadSort::Score,
            SortArg::Newest => LeadSort::Newest,
            SortArg::Updated => LeadSort::Updated,
        }
    }
}

struct App {
    conn: Connection,
    owner: String,
    config: AppConfig,
    now: OffsetDateTime,
}

impl App {
    fn open(config: &AppConfig, db: Option<&Path>, owner: Option<&str>) -> Result<Self> {
        let db_path = db.map_or_else(|| config.app.database.clone(), Path::to_path_buf);
        let owner = owner.map_or_else(|| config.app.owner.clone(), str::to_string);
        let conn = db::open(&db_path)
            .with_context(|| format!("opening database {}", db_path.display()))?;
        tracing::debug!(db = %db_path.display(), owner = %owner, "database opened");
        Ok(Self {
            conn,
            owner,
            config: config.clone(),
            now: OffsetDateTime::now_utc().replace_nanosecond(0)?,
        })
    }

    fn settings(&self) -> Result<Settings> {
        Ok(db::get_or_create_settings(
            &self.conn,
            &self.owner,
            &self.config.settings,
            self.now,
        )?)
    }
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = AppConfig::load(&cli.config)?;
    let open = || App::open(&config, cli.db.as_deref(), cli.owner.as_deref());

    match cli.command {
        Commands::Init { seed_dir } => init(&open()?, seed_dir),
        Commands::Schema { command } => match command {
            SchemaCommands::Export { out_dir } => schema_export(&out_dir),
        },
        Commands::Settings { command } => match command {
            SettingsCommands::Show => settings_show(&open()?),
            SettingsCommands::Set { key, value } => settings_set(&open()?, &key, &value),
        },
        Commands::Query { command } => match command {
            QueryCommands::List { all } => query_list(&open()?, all),
            QueryCommands::Build { query_id, pack } => query_build(&open()?, &query_id, pack),
            QueryCommands::Set {
                query_id,
                name,
                text,
            } => query_set(&open()?, &query_id, name.as_deref(), text.as_deref()),
            QueryCommands::Toggle { query_id } => query_toggle(&open()?, &query_id),
        },
        Commands::Template { command } => match command {
            TemplateCommands::List { template_type } => template_list(&open()?, template_type),
            TemplateCommands::Toggle { template_id } => template_toggle(&open()?, &template_id),
        },
        Commands::Score { title, snippet, url } => score(&open()?, &title, &snippet, &url),
        Commands::Canonicalize { url } => print_canonical(&url),
        Commands::Run {
            query_id,
            pack,
            market,
            freshness,
            results,
        } => {
            let params = SearchParams {
                query_id,
                source_pack: pack,
                market,
                freshness,
            };
            run(&open()?, &params, results.as_deref())
        }
        Commands::Import { query, file, urls } => import(&open()?, query.as_deref(), file, urls),
        Commands::Leads { status, sort, limit } => {
            let filter = LeadFilter {
                status,
                sort: sort.into(),
                limit: Some(limit),
            };
            leads(&open()?, &filter)
        }
        Commands::Lead { command } => match command {
            LeadCommands::Show { lead_id } => lead_show(&open()?, &lead_id),
            LeadCommands::Set {
                lead_id,
                status,
                notes,
                follow_up,
                clear_follow_up,
                offer_angle,
                override_reason,
            } => {
                let patch = LeadPatch {
                    status,
                    notes,
                    next_follow_up_at: if clear_follow_up {
                        Some(None)
                    } else {
                        follow_up.map(Some)
                    },
                    offer_angle,
                    override_reason: override_reason.map(Some),
                };
                lead_set(&open()?, &lead_id, &patch)
            }
            LeadCommands::Status { status, lead_ids } => {
                lead_status(&mut open()?, status, &lead_ids)
            }
        },
        Commands::Event {
            lead_id,
            event_type,
            preview,
            template,
            payload,
        } => {
            let payload = match payload {
                Some(raw) => serde_json::from_str(&raw).context("parsing --payload as JSON")?,
                None => Value::Object(Default::default()),
            };
            let event = NewEvent {
                event_type,
                message_preview: preview,
                template_id: template,
                payload,
            };
            record_event(&mut open()?, &lead_id, &event)
        }
        Commands::Draft {
            lead_id,
            template_type,
            category,
            send,
        } => draft(&mut open()?, &lead_id, template_type, category.as_deref(), send),
        Commands::Today => today(&open()?),
        Commands::Vault { command } => match command {
            VaultCommands::Build { out_dir } => vault_build(&open()?, &out_dir),
        },
    }
}

fn parse_timestamp(raw: &str) -> Result<OffsetDateTime, String> {
    OffsetDateTime::parse(raw, &Rfc3339).map_err(|e| e.to_string())
}

fn timestamp(at: OffsetDateTime) -> Result<String> {
    Ok(at.format(&Rfc3339)?)
}

fn schema_export(out_dir: &Path) -> Result<()> {
    fs::create_dir_all(out_dir)?;

    let schemas = [
        ("Lead", schema_for!(Lead)),
        ("LeadEvent", schema_for!(LeadEvent)),
        ("QueryTemplate", schema_for!(QueryTemplate)),
        ("OutreachTemplate", schema_for!(OutreachTemplate)),
        ("RunRecord", schema_for!(RunRecord)),
        ("Settings", schema_for!(Settings)),
        ("SearchResult", schema_for!(SearchResult)),
        ("ScoringResult", schema_for!(ScoringResult)),
    ];
    for (name, schema) in schemas {
        let json = serde_json::to_string_pretty(&schema)?;
        fs::write(out_dir.join(format!("{name}.schema.json")), json)?;
    }

    println!("Exported schemas to {}", out_dir.display());
    Ok(())
}

fn score_text(app: &App, title: &str, snippet: &str, url: &str) -> Result<ScoringResult> {
    let settings = app.settings()?;
    let host = if url.is_empty() {
        String::new()
    } else {
        extract_domain(url)
    };
    Ok(compute_lead_score(title, snippet, &host, &settings.job_board_blocklist))
}

fn score(app: &App, title: &str, snippet: &str, url: &str) -> Result<()> {
    let result = score_text(app, title, snippet, url)?;
    println!("{}", serde_json::to_string_pretty(&result)?);
    Ok(())
}

fn print_canonical(url: &str) -> Result<()> {
    let canonical = canonicalize(url);
    println!("{}", serde_json::to_string_pretty(&canonical)?);
    Ok(())
}

fn init(app: &App, seed_dir: Option<PathBuf>) -> Result<()> {
    let settings = app.settings()?;
    validate_settings(&settings)?;

    let seed_dir = seed_dir.unwrap_or_else(|| app.config.app.seed_dir.clone());
    let catalog = Catalog::load_from_dir(&seed_dir)?;
    let queries = catalog.query_templates(&app.owner, app.now);
    let templates = catalog.outreach_templates(&app.owner, app.now);
    for query in &queries {
        db::upsert_query_template(&app.conn, query)?;
    }
    for template in &templates {
        db::upsert_outreach_template(&app.conn, template)?;
    }

    tracing::info!(
        owner = %app.owner,
        queries = queries.len(),
        templates = templates.len(),
        "seed catalog loaded"
    );
    println!(
        "Initialized for {}: {} query templates, {} outreach templates",
        app.owner,
        queries.len(),
        templates.len()
    );
    Ok(())
}

fn settings_show(app: &App) -> Result<()> {
    let settings = app.settings()?;
    print!("{}", toml::to_string_pretty(&settings)?);
    Ok(())
}

fn settings_set(app: &App, key: &str, raw: &str) -> Result<()> {
    let current = app.settings()?;
    let mut body = serde_json::to_value(&current)?;
    let Some(fields) = body.as_object_mut() else {
        bail!("settings did not serialize to an object");
    };
    if !fields.contains_key(key) {
        let known: Vec<&str> = fields.keys().map(String::as_str).collect();
        bail!("unknown setting {key:?} (known: {})", known.join(", "));
    }
    let value = serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string()));
    fields.insert(key.to_string(), value);

    let updated: Settings =
        serde_json::from_value(body).with_context(|| format!("invalid value for {key}"))?;
    validate_settings(&updated)?;
    db::save_settings(&app.conn, &app.owner, &updated, app.now)?;
    println!("Updated {key}");
    Ok(())
}

fn query_list(app: &App, all: bool) -> Result<()> {
    for query in db::list_query_templates(&app.conn, &app.owner, !all)? {
        let marker = if query.is_active { "*" } else { " " };
        println!(
            "{marker} {:<30} {:<26} {}",
            query.id, query.mapped_service, query.name
        );
    }
    Ok(())
}

fn query_build(app: &App, query_id: &str, pack: SourcePack) -> Result<()> {
    let settings = app.settings()?;
    let query = db::get_query_template(&app.conn, &app.owner, query_id)?;
    let final_query =
        build_final_query(&query.base_query_text, pack, &settings.job_board_blocklist);
    println!("# {} / {}", query.name, source_pack_label(pack));
    println!("{final_query}");
    Ok(())
}

fn query_set(app: &App, query_id: &str, name: Option<&str>, text: Option<&str>) -> Result<()> {
    if name.is_none() && text.is_none() {
        bail!("nothing to change; pass --name and/or --text");
    }
    let query = db::update_query_template(&app.conn, &app.owner, query_id, name, text, app.now)?;
    println!("{} {}", query.id, query.name);
    println!("  {}", query.base_query_text);
    Ok(())
}

fn query_toggle(app: &App, query_id: &str) -> Result<()> {
    let query = db::get_query_template(&app.conn, &app.owner, query_id)?;
    let active = !query.is_active;
    db::set_query_template_active(&app.conn, &app.owner, query_id, active, app.now)?;
    println!("{query_id} is now {}", if active { "active" } else { "inactive" });
    Ok(())
}

fn template_list(app: &App, template_type: Option<TemplateType>) -> Result<()> {
    for template in db::list_outreach_templates(&app.conn, &app.owner, template_type)? {
        let marker = if template.is_active { "*" } else { " " };
        println!(
            "{marker} {:<5} {:>4} {:<24} {}",
            template.template_type, template.priority, template.id, template.name
        );
    }
    Ok(())
}

fn template_toggle(app: &App, template_id: &str) -> Result<()> {
    let template = db::list_outreach_templates(&app.conn, &app.owner, None)?
        .into_iter()
        .find(|t| t.id == template_id)
        .ok_or_else(|| leadradar_core::LeadError::TemplateNotFound(template_id.to_string()))?;
    let active = !template.is_active;
    db::set_outreach_template_active(&app.conn, &app.owner, template_id, active, app.now)?;
    println!("{template_id} is now {}", if active { "active" } else { "inactive" });
    Ok(())
}

fn load_results(path: &Path) -> Result<Vec<SearchResult>> {
    let raw = fs::read_to_string(path)
        .with_context(|| format!("reading results {}", path.display()))?;
    if let Ok(results) = serde_json::from_str::<Vec<SearchResult>>(&raw) {
        return Ok(results);
    }
    search::parse_response(&raw).with_context(|| format!("parsing results {}", path.display()))
}

fn run(app: &App, params: &SearchParams, results: Option<&Path>) -> Result<()> {
    let settings = app.settings()?;
    let source: Box<dyn SearchSource> = match results {
        Some(path) => Box::new(load_results(path)?),
        None => Box::new(WebSearchClient::from_env()?),
    };
    let run =
        intake::run_search(&app.conn, &app.owner, params, &settings, source.as_ref(), app.now)?;
    println!("Run {}", run.id);
    println!("  query:      {}", run.final_query);
    println!("  total:      {}", run.total_results);
    println!("  qualified:  {}", run.qualified_results);
    println!("  review:     {}", run.review_results);
    println!("  rejected:   {}", run.rejected_results);
    println!("  duplicates: {}", run.duplicates_removed);
    Ok(())
}

fn import(
    app: &App,
    query_id: Option<&str>,
    file: Option<PathBuf>,
    mut urls: Vec<String>,
) -> Result<()> {
    if let Some(path) = file {
        let raw = fs::read_to_string(&path)
            .with_context(|| format!("reading {}", path.display()))?;
        urls.extend(raw.lines().map(str::to_string));
    }
    if urls.iter().all(|u| u.trim().is_empty()) {
        bail!("no URLs given");
    }
    let settings = app.settings()?;
    let summary =
        intake::manual_import(&app.conn, &app.owner, &urls, query_id, &settings, app.now)?;
    println!(
        "Imported {}, duplicates {}, failed {}",
        summary.imported, summary.duplicates, summary.failed
    );
    Ok(())
}

fn leads(app: &App, filter: &LeadFilter) -> Result<()> {
    let leads = db::list_leads(&app.conn, &app.owner, filter)?;
    if leads.is_empty() {
        println!("No leads.");
    }
    for lead in leads {
        println!(
            "{:>3} {:<14} {:<9} {}  {}",
            lead.score, lead.status, lead.buyer_type, lead.id, lead.title
        );
    }
    Ok(())
}

fn lead_show(app: &App, lead_id: &str) -> Result<()> {
    let lead = db::get_lead(&app.conn, &app.owner, lead_id)?;
    let events = db::list_events(&app.conn, &app.owner, lead_id, db::DEFAULT_EVENT_LIMIT)?;
    let out = serde_json::json!({ "lead": lead, "events": events });
    println!("{}", serde_json::to_string_pretty(&out)?);
    Ok(())
}

fn lead_set(app: &App, lead_id: &str, patch: &LeadPatch) -> Result<()> {
    if patch.is_empty() {
        bail!("nothing to change");
    }
    let lead = db::update_lead(&app.conn, &app.owner, lead_id, patch, app.now)?;
    print_lead_state(&lead)
}

fn lead_status(app: &mut App, status: LeadStatus, lead_ids: &[String]) -> Result<()> {
    let changed = db::bulk_update_status(&mut app.conn, &app.owner, lead_ids, status, app.now)?;
    println!("Set {status} on {changed} of {} lead(s)", lead_ids.len());
    Ok(())
}

fn record_event(app: &mut App, lead_id: &str, event: &NewEvent) -> Result<()> {
    let delays = FollowUpDelays::from(&app.settings()?);
    let (_, lead) = db::record_event(&mut app.conn, &app.owner, lead_id, event, app.now, delays)?;
    print_lead_state(&lead)
}

fn print_lead_state(lead: &Lead) -> Result<()> {
    let next = match lead.next_follow_up_at {
        Some(at) => timestamp(at)?,
        None => "none".to_string(),
    };
    println!("{} {} (next follow-up: {next})", lead.id, lead.status);
    Ok(())
}

fn sent_event(template_type: TemplateType) -> LeadEventType {
    match template_type {
        TemplateType::Dm1 => LeadEventType::Dm1Sent,
        TemplateType::Fu1 => LeadEventType::Fu1Sent,
        TemplateType::Fu2 => LeadEventType::Fu2Sent,
    }
}

fn draft(
    app: &mut App,
    lead_id: &str,
    template_type: TemplateType,
    category: Option<&str>,
    send: bool,
) -> Result<()> {
    let settings = app.settings()?;
    let lead = db::get_lead(&app.conn, &app.owner, lead_id)?;
    let candidates = db::list_outreach_templates(&app.conn, &app.owner, Some(template_type))?;
    let profile = LeadProfile::from(&lead);
    let context = FillContext {
        lead: &profile,
        settings: &settings,
        lead_id: Some(lead.id.as_str()),
        category,
    };

    let Some(draft) = draft_message(&candidates, &profile, template_type, &context) else {
        tracing::warn!(lead_id, template_type = %template_type, "no active template matches");
        println!("No active {template_type} template matches this lead.");
        return Ok(());
    };

    println!("# {} ({})", draft.template_name, draft.template_id);
    println!("{}", draft.body);

    if send {
        let event = NewEvent {
            event_type: sent_event(template_type),
            message_preview: Some(draft.body.clone()),
            template_id: Some(draft.template_id.clone()),
            payload: serde_json::json!({ "template_type": template_type }),
        };
        record_event(app, lead_id, &event)?;
    }
    Ok(())
}

fn today(app: &App) -> Result<()> {
    let queue = build_today_queue(db::list_follow_ups(&app.conn, &app.owner)?, app.now);
    if queue.is_empty() {
        println!("No follow-ups scheduled.");
        return Ok(());
    }
    for (title, bucket) in [
        ("Overdue", &queue.overdue),
        ("Due today", &queue.due_today),
        ("Upcoming", &queue.upcoming),
    ] {
        println!("{title} ({})", bucket.len());
        for lead in bucket {
            let due = match lead.next_follow_up_at {
                Some(at) => timestamp(at)?,
                None => String::new(),
            };
            println!("  {due}  {:<12} {}  {}", lead.status, lead.id, lead.title);
        }
    }
    Ok(())
}

fn vault_build(app: &App, out_dir: &Path) -> Result<()> {
    let summary = obsidian::build_vault(&app.conn, &app.owner, out_dir, app.now)?;
    println!(
        "Wrote {} lead notes ({} follow-ups) to {}",
        summary.leads,
        summary.follow_ups,
        out_dir.display()
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::datetime;

    fn app() -> App {
        App {
            conn: db::open_in_memory().unwrap(),
            owner: "local".to_string(),
            config: AppConfig::default(),
            now: datetime!(2025-03-01 12:00 UTC),
        }
    }

    #[test]
    fn score_uses_the_stored_blocklist() {
        let app = app();
        let clean = score_text(&app, "Hiring an editor", "", "https://behance.net/jobs/1").unwrap();
        assert_eq!(clean.override_reason, None);

        let settings = Settings {
            job_board_blocklist: vec!["behance.net".to_string()],
            ..app.settings().unwrap()
        };
        db::save_settings(&app.conn, &app.owner, &settings, app.now).unwrap();

        let blocked =
            score_text(&app, "Hiring an editor", "", "https://behance.net/jobs/1").unwrap();
        assert_eq!(blocked.override_reason, Some(OverrideReason::JobBoard));
    }

    #[test]
    fn results_file_accepts_plain_hits_and_api_responses() {
        let dir = tempfile::tempdir().unwrap();

        let plain = dir.path().join("plain.json");
        fs::write(&plain, r#"[{"title": "t", "snippet": "s", "url": "https://ex.com/a"}]"#)
            .unwrap();
        let hits = load_results(&plain).unwrap();
        assert_eq!(hits[0].url, "https://ex.com/a");

        let saved = dir.path().join("saved.json");
        fs::write(
            &saved,
            r#"{"webPages": {"value": [{"name": "Need clips", "url": "https://ex.com/b"}]}}"#,
        )
        .unwrap();
        let hits = load_results(&saved).unwrap();
        assert_eq!(hits[0].title, "Need clips");

        let failed = dir.path().join("failed.json");
        fs::write(&failed, r#"{"error": {"code": "Quota", "message": "exceeded"}}"#).unwrap();
        assert!(load_results(&failed).is_err());
    }
}
