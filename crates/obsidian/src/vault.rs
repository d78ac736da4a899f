use anyhow::Result;
use leadradar_core::db::{self, DEFAULT_EVENT_LIMIT, LeadFilter};
use leadradar_core::followup::build_today_queue;
use leadradar_core::schema::{Lead, LeadEvent, LeadStatus};
use leadradar_core::templates::pain_phrase;
use rusqlite::Connection;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;

pub struct VaultPaths {
    pub root: PathBuf,
    pub index_dir: PathBuf,
    pub leads_dir: PathBuf,
}

impl VaultPaths {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        Self {
            index_dir: root.join("00_Index"),
            leads_dir: root.join("Leads"),
            root,
        }
    }

    pub fn ensure(&self) -> Result<()> {
        fs::create_dir_all(&self.index_dir)?;
        fs::create_dir_all(&self.leads_dir)?;
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VaultSummary {
    pub leads: usize,
    pub follow_ups: usize,
}

pub fn build_vault(
    conn: &Connection,
    owner: &str,
    vault_root: &Path,
    now: OffsetDateTime,
) -> Result<VaultSummary> {
    let paths = VaultPaths::new(vault_root);
    paths.ensure()?;

    let everything = LeadFilter {
        limit: None,
        ..LeadFilter::default()
    };
    let leads = db::list_leads(conn, owner, &everything)?;

    // 1) Lead notes
    let mut pain_counts: BTreeMap<String, usize> = BTreeMap::new();
    for lead in &leads {
        let events = db::list_events(conn, owner, &lead.id, DEFAULT_EVENT_LIMIT)?;
        write_lead_note(&paths, lead, &events)?;
        for tag in &lead.pain_tags {
            *pain_counts.entry(tag.clone()).or_insert(0) += 1;
        }
    }

    // 2) Inbox grouped by status
    let mut inbox = header("MOC - Inbox");
    for status in LeadStatus::ALL {
        let bucket: Vec<&Lead> = leads.iter().filter(|l| l.status == *status).collect();
        if bucket.is_empty() {
            continue;
        }
        inbox.push(format!("## {} ({})", status, bucket.len()));
        inbox.push(String::new());
        for lead in bucket {
            inbox.push(format!("- {} ({})", lead_link(lead), lead.score));
        }
        inbox.push(String::new());
    }
    if leads.is_empty() {
        inbox.push("_No leads yet._".to_string());
    }
    fs::write(paths.index_dir.join("MOC - Inbox.md"), inbox.join("\n"))?;

    // 3) Today queue
    let queue = build_today_queue(db::list_follow_ups(conn, owner)?, now);
    let follow_ups = queue.overdue.len() + queue.due_today.len() + queue.upcoming.len();
    let mut today = header("Today");
    for (title, bucket) in [
        ("Overdue", &queue.overdue),
        ("Due Today", &queue.due_today),
        ("Upcoming", &queue.upcoming),
    ] {
        today.push(format!("## {title}"));
        today.push(String::new());
        if bucket.is_empty() {
            today.push("_Nothing here._".to_string());
        }
        for lead in bucket {
            let due = match lead.next_follow_up_at {
                Some(at) => at.format(&Rfc3339)?,
                None => String::new(),
            };
            today.push(format!("- {} ({}) due `{}`", lead_link(lead), lead.status, due));
        }
        today.push(String::new());
    }
    fs::write(paths.index_dir.join("Today.md"), today.join("\n"))?;

    // 4) Pain tag counts
    let mut tag_lines = header("MOC - Pain Tags");
    let mut counts: Vec<(String, usize)> = pain_counts.into_iter().collect();
    counts.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
    if counts.is_empty() {
        tag_lines.push("_No pain tags found._".to_string());
    } else {
        for (tag, count) in counts {
            tag_lines.push(format!("- {tag}: {} ({count})", pain_phrase(&tag)));
        }
    }
    fs::write(paths.index_dir.join("MOC - Pain Tags.md"), tag_lines.join("\n"))?;

    tracing::info!(root = %paths.root.display(), leads = leads.len(), follow_ups, "vault built");
    Ok(VaultSummary {
        leads: leads.len(),
        follow_ups,
    })
}

fn header(title: &str) -> Vec<String> {
    vec![
        format!("# {title}"),
        String::new(),
        "This index is generated. Do not edit manually.".to_string(),
        String::new(),
    ]
}

fn lead_link(lead: &Lead) -> String {
    format!("[[Leads/{}|{}]]", lead.id, link_label(&lead.title))
}

// `|` and brackets end an Obsidian wikilink early.
fn link_label(title: &str) -> String {
    let label: String = title
        .chars()
        .map(|c| if matches!(c, '|' | '[' | ']') { ' ' } else { c })
        .collect();
    let label = label.trim();
    if label.is_empty() {
        "(untitled)".to_string()
    } else {
        label.to_string()
    }
}

fn write_lead_note(paths: &VaultPaths, lead: &Lead, events: &[LeadEvent]) -> Result<()> {
    let note_path = paths.leads_dir.join(format!("{}.md", lead.id));

    let mut md = String::new();
    md.push_str("---\n");
    md.push_str(&format!("id: {}\n", lead.id));
    md.push_str(&format!("status: {}\n", lead.status));
    md.push_str(&format!("score: {}\n", lead.score));
    md.push_str(&format!("buyer_type: {}\n", lead.buyer_type));
    md.push_str(&format!("mapped_service: {}\n", lead.mapped_service));
    md.push_str(&format!("offer_angle: {}\n", lead.offer_angle));
    md.push_str(&format!("rush_eligible: {}\n", lead.rush_eligible));
    md.push_str(&format!("source_host: {}\n", lead.source_host));
    md.push_str(&format!("first_seen_at: {}\n", lead.first_seen_at.format(&Rfc3339)?));
    md.push_str(&format!("last_seen_at: {}\n", lead.last_seen_at.format(&Rfc3339)?));
    if let Some(next) = lead.next_follow_up_at {
        md.push_str(&format!("next_follow_up_at: {}\n", next.format(&Rfc3339)?));
    }
    if let Some(reason) = lead.override_reason {
        md.push_str(&format!("override_reason: {reason}\n"));
    }
    md.push_str("pain_tags:\n");
    for tag in &lead.pain_tags {
        md.push_str(&format!("  - {tag}\n"));
    }
    md.push_str("canonical_url: |\n");
    md.push_str(&indent_yaml_block(&lead.canonical_url));
    md.push_str("---\n\n");

    md.push_str(&format!("# {}\n\n", lead.title));

    md.push_str("## Source\n");
    md.push_str(&format!("- URL: {}\n", lead.original_url));
    md.push_str(&format!("- Host: `{}`\n", lead.source_host));
    if !lead.snippet.trim().is_empty() {
        md.push_str(&format!("\n> {}\n", lead.snippet.replace('\n', "\n> ")));
    }
    md.push('\n');

    md.push_str("## Qualification\n");
    md.push_str(&format!("- Score: **{}** ({})\n", lead.score, lead.status));
    md.push_str(&format!("- Buyer: `{}`\n", lead.buyer_type));
    if lead.pain_tags.is_empty() {
        md.push_str("- Pain: _none detected_\n");
    } else {
        let phrases: Vec<String> = lead.pain_tags.iter().map(|t| pain_phrase(t)).collect();
        md.push_str(&format!("- Pain: {}\n", phrases.join(", ")));
    }
    md.push('\n');

    md.push_str("## Notes\n");
    if lead.notes.trim().is_empty() {
        md.push_str("_No notes._\n");
    } else {
        md.push_str(&lead.notes);
        md.push('\n');
    }
    md.push('\n');

    md.push_str("## Recent Events\n");
    if events.is_empty() {
        md.push_str("_No events recorded._\n");
    }
    for event in events {
        md.push_str(&format!(
            "- `{}` {}",
            event.created_at.format(&Rfc3339)?,
            event.event_type
        ));
        if let Some(preview) = &event.message_preview {
            md.push_str(&format!(": {}", preview.lines().next().unwrap_or_default()));
        }
        md.push('\n');
    }

    fs::write(note_path, md)?;
    Ok(())
}

fn indent_yaml_block(s: &str) -> String {
    let mut out = String::new();
    for line in s.lines() {
        out.push_str("  ");
        out.push_str(line);
        out.push('\n');
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use leadradar_core::canonicalize::canonicalize;
    use leadradar_core::db::NewEvent;
    use leadradar_core::followup::FollowUpDelays;
    use leadradar_core::schema::{BuyerType, LeadEventType, MappedService, OfferAngle};
    use time::macros::datetime;

    fn lead(url: &str, title: &str, status: LeadStatus, tags: &[&str]) -> Lead {
        let seen = datetime!(2025-03-01 8:00 UTC);
        let canonical = canonicalize(url);
        Lead {
            id: db::new_id(),
            owner: "local".to_string(),
            original_url: url.to_string(),
            canonical_url: canonical.canonical,
            url_hash: canonical.hash,
            title: title.to_string(),
            snippet: "need help with clips".to_string(),
            source_host: "reddit.com".to_string(),
            first_seen_at: seen,
            last_seen_at: seen,
            buyer_type: BuyerType::Podcaster,
            pain_tags: tags.iter().map(|t| t.to_string()).collect(),
            mapped_service: MappedService::PodcastYoutubeRepurpose,
            offer_angle: OfferAngle::Any,
            score: 75,
            status,
            override_reason: None,
            rush_eligible: false,
            notes: String::new(),
            last_outreach_at: None,
            next_follow_up_at: None,
            updated_at: seen,
        }
    }

    #[test]
    fn builds_notes_and_indexes() {
        let dir = tempfile::tempdir().unwrap();
        let mut conn = db::open_in_memory().unwrap();

        let ready = lead(
            "https://reddit.com/r/podcasting/a",
            "Need [podcast] editor | ASAP",
            LeadStatus::OutreachReady,
            &["deadline", "repurpose"],
        );
        let review = lead(
            "https://reddit.com/r/podcasting/b",
            "Clips help",
            LeadStatus::Review,
            &["deadline"],
        );
        db::insert_or_touch_lead(&conn, &ready).unwrap();
        db::insert_or_touch_lead(&conn, &review).unwrap();

        let delays = FollowUpDelays { fu1_hours: 48, fu2_hours: 96 };
        let mut dm = NewEvent::of(LeadEventType::Dm1Sent);
        dm.message_preview = Some("Hey, saw your post\nmore text".to_string());
        let sent_at = datetime!(2025-03-03 9:00 UTC);
        db::record_event(&mut conn, "local", &ready.id, &dm, sent_at, delays).unwrap();

        let now = datetime!(2025-03-05 12:00 UTC);
        let summary = build_vault(&conn, "local", dir.path(), now).unwrap();
        assert_eq!(summary, VaultSummary { leads: 2, follow_ups: 1 });

        let note_path = dir.path().join("Leads").join(format!("{}.md", ready.id));
        let note = fs::read_to_string(note_path).unwrap();
        assert!(note.starts_with("---\nid: "));
        assert!(note.contains("status: CONTACTED\n"));
        assert!(note.contains("  - deadline\n"));
        assert!(note.contains("- Pain: tight deadlines, repurposing content\n"));
        assert!(note.contains("DM_1_SENT: Hey, saw your post\n"));

        let index = dir.path().join("00_Index");
        let inbox = fs::read_to_string(index.join("MOC - Inbox.md")).unwrap();
        assert!(inbox.contains("## CONTACTED (1)"));
        assert!(inbox.contains("## REVIEW (1)"));
        assert!(inbox.contains(&format!("[[Leads/{}|Need  podcast  editor   ASAP]]", ready.id)));
        assert!(!inbox.contains("## WON"));

        let today = fs::read_to_string(index.join("Today.md")).unwrap();
        assert!(today.contains("## Due Today"));
        assert!(today.contains("due `2025-03-05T09:00:00Z`"));

        let tags = fs::read_to_string(index.join("MOC - Pain Tags.md")).unwrap();
        let deadline = tags.find("- deadline: tight deadlines (2)").unwrap();
        let repurpose = tags.find("- repurpose: repurposing content (1)").unwrap();
        assert!(deadline < repurpose);
    }

    #[test]
    fn empty_owner_gets_placeholder_indexes() {
        let dir = tempfile::tempdir().unwrap();
        let conn = db::open_in_memory().unwrap();
        let now = datetime!(2025-03-05 12:00 UTC);
        let summary = build_vault(&conn, "nobody", dir.path(), now).unwrap();
        assert_eq!(summary.leads, 0);
        let index = dir.path().join("00_Index");
        let inbox = fs::read_to_string(index.join("MOC - Inbox.md")).unwrap();
        assert!(inbox.contains("_No leads yet._"));
        let tags = fs::read_to_string(index.join("MOC - Pain Tags.md")).unwrap();
        assert!(tags.contains("_No pain tags found._"));
    }

    #[test]
    fn link_labels_drop_wikilink_delimiters() {
        assert_eq!(link_label("a|b[c]"), "a b c");
        assert_eq!(link_label(" [] "), "(untitled)");
    }
}
