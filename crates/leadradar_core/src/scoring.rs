//! Deterministic rule-based lead scoring.
//!
//! Rules run against the lower-cased `"{title} {snippet}"`. Hard rejects are
//! checked first and short-circuit everything else. Otherwise each additive
//! rule group contributes its points at most once, and buyer type, pain tags
//! and rush eligibility are derived independently of the score.

use regex::{Regex, RegexBuilder};
use schemars::JsonSchema;
use serde::Serialize;
use std::sync::OnceLock;

use crate::schema::{BuyerType, LeadStatus, OverrideReason, PainTag};

pub const SCORE_CEILING: u32 = 100;
pub const OUTREACH_READY_THRESHOLD: u8 = 70;
pub const REVIEW_THRESHOLD: u8 = 40;

/// Hosts rejected as job boards in addition to the caller's blocklist.
pub const JOB_BOARD_HOSTS: &[&str] = &[
    "upwork.com",
    "fiverr.com",
    "freelancer.com",
    "peopleperhour.com",
    "guru.com",
    "toptal.com",
];

const SELLER_PATTERNS: &[&str] = &[
    r"\[for hire\]",
    r"\bfor hire\b",
    r"\bmy portfolio\b",
    r"\bportfolio link\b",
    r"\bmy rates\b",
    r"\brates are\b",
    r"\bavailable for work\b",
    r"\bhire me\b",
    r"\beditor looking for work\b",
];

const ADDITIVE_RULES: &[(u32, &str, &str)] = &[
    (
        25,
        "High intent keywords (hiring/looking for/need)",
        r"\b(?:hiring|looking for|need an editor|video editor needed)\b",
    ),
    (
        15,
        "Urgency/pain keywords",
        r"\b(?:deadline|asap|urgent|rush|behind|swamped|overwhelmed|backlog)\b",
    ),
    (
        10,
        "Agency/overflow indicators",
        r"\b(?:agency|white label|client|overflow)\b",
    ),
    (
        10,
        "Podcast/repurpose content",
        r"\b(?:podcast|repurpose|clips|highlights)\b",
    ),
    (
        10,
        "Short-form content",
        r"\b(?:shorts|reels|tiktok|short form)\b",
    ),
    (5, "CapCut mentioned", r"\bcapcut\b"),
];

// First match wins; order is the tie-break.
const BUYER_TYPE_RULES: &[(BuyerType, &str)] = &[
    (BuyerType::Agency, r"\bagency\b"),
    (BuyerType::Podcaster, r"\bpodcast"),
    (BuyerType::Coach, r"\b(?:coach|consultant)\b"),
    (BuyerType::Ecom, r"\b(?:ecom|ugc|ads)\b"),
    (BuyerType::Creator, r"\b(?:creator|youtuber|influencer)\b"),
];

const PAIN_TAG_RULES: &[(PainTag, &str)] = &[
    (PainTag::Deadline, r"\b(?:deadline|asap|urgent)\b"),
    (PainTag::Volume, r"\b(?:swamped|overwhelmed|backlog)\b"),
    (PainTag::Overflow, r"\boverflow\b"),
    (PainTag::Repurpose, r"\b(?:repurpose|clips)\b"),
];

const RUSH_PATTERN: &str = r"\b(?:rush|asap|today)\b|\bimmediate";

struct CompiledRules {
    seller: Vec<Regex>,
    additive: Vec<(u32, &'static str, Regex)>,
    buyer_types: Vec<(BuyerType, Regex)>,
    pain_tags: Vec<(PainTag, Regex)>,
    rush: Regex,
}

fn rules() -> &'static CompiledRules {
    static RULES: OnceLock<CompiledRules> = OnceLock::new();
    RULES.get_or_init(|| CompiledRules {
        seller: SELLER_PATTERNS.iter().map(|p| compile(p)).collect(),
        additive: ADDITIVE_RULES
            .iter()
            .map(|(points, label, p)| (*points, *label, compile(p)))
            .collect(),
        buyer_types: BUYER_TYPE_RULES
            .iter()
            .map(|(buyer, p)| (*buyer, compile(p)))
            .collect(),
        pain_tags: PAIN_TAG_RULES
            .iter()
            .map(|(tag, p)| (*tag, compile(p)))
            .collect(),
        rush: compile(RUSH_PATTERN),
    })
}

// ASCII-only classes: `\b` treats CJK and accented letters as non-word.
fn compile(pattern: &str) -> Regex {
    RegexBuilder::new(pattern)
        .unicode(false)
        .build()
        .expect("built-in scoring pattern is valid")
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, JsonSchema)]
pub struct ScoringResult {
    pub score: u8,
    pub buyer_type: BuyerType,
    pub pain_tags: Vec<PainTag>,
    pub status: LeadStatus,
    pub override_reason: Option<OverrideReason>,
    pub rush_eligible: bool,
    /// Human-readable trace of every rule that fired.
    pub rule_matches: Vec<String>,
}

impl ScoringResult {
    fn hard_reject(reason: OverrideReason, trace: &str) -> Self {
        Self {
            score: 0,
            buyer_type: BuyerType::Unknown,
            pain_tags: Vec::new(),
            status: LeadStatus::Rejected,
            override_reason: Some(reason),
            rush_eligible: false,
            rule_matches: vec![format!("REJECTED: {trace}")],
        }
    }

    pub fn pain_tag_strings(&self) -> Vec<String> {
        self.pain_tags.iter().map(|tag| tag.as_str().to_string()).collect()
    }
}

pub fn compute_lead_score(
    title: &str,
    snippet: &str,
    source_host: &str,
    blocklist: &[String],
) -> ScoringResult {
    let text = format!("{title} {snippet}").to_lowercase();
    let rules = rules();

    if rules.seller.iter().any(|re| re.is_match(&text)) {
        return ScoringResult::hard_reject(OverrideReason::SellerPost, "Seller pattern detected");
    }

    if is_blocked_host(source_host, blocklist) {
        return ScoringResult::hard_reject(OverrideReason::JobBoard, "Job board/marketplace");
    }

    let mut total = 0u32;
    let mut rule_matches = Vec::new();
    for (points, label, re) in &rules.additive {
        if re.is_match(&text) {
            total += points;
            rule_matches.push(format!("+{points}: {label}"));
        }
    }

    let buyer_type = rules
        .buyer_types
        .iter()
        .find(|(_, re)| re.is_match(&text))
        .map(|(buyer, _)| *buyer)
        .unwrap_or(BuyerType::Unknown);

    let pain_tags = rules
        .pain_tags
        .iter()
        .filter(|(_, re)| re.is_match(&text))
        .map(|(tag, _)| *tag)
        .collect();

    let rush_eligible = rules.rush.is_match(&text);

    let score = clamp_score(total, SCORE_CEILING) as u8;

    ScoringResult {
        score,
        buyer_type,
        pain_tags,
        status: status_for_score(score),
        override_reason: None,
        rush_eligible,
        rule_matches,
    }
}

/// Qualification bucket for a score that passed the hard rejects.
pub fn status_for_score(score: u8) -> LeadStatus {
    if score >= OUTREACH_READY_THRESHOLD {
        LeadStatus::OutreachReady
    } else if score < REVIEW_THRESHOLD {
        LeadStatus::Rejected
    } else {
        LeadStatus::Review
    }
}

/// Substring match against the built-in job boards and `blocklist`.
pub fn is_blocked_host(source_host: &str, blocklist: &[String]) -> bool {
    let host = source_host.to_lowercase();
    JOB_BOARD_HOSTS
        .iter()
        .map(|blocked| blocked.to_string())
        .chain(blocklist.iter().map(|blocked| blocked.trim().to_lowercase()))
        .filter(|blocked| !blocked.is_empty())
        .any(|blocked| host.contains(&blocked))
}

// Additive terms are non-negative, so only the ceiling can bind.
fn clamp_score(value: u32, ceiling: u32) -> u32 {
    value.min(ceiling)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn score(title: &str, snippet: &str) -> ScoringResult {
        compute_lead_score(title, snippet, "reddit.com", &[])
    }

    #[test]
    fn seller_pattern_beats_high_intent_keywords() {
        let result = score("Hiring? Hire me!", "I am hiring out my time, deadline friendly");
        assert_eq!(result.status, LeadStatus::Rejected);
        assert_eq!(result.override_reason, Some(OverrideReason::SellerPost));
        assert_eq!(result.score, 0);
        assert!(result.pain_tags.is_empty());
        assert_eq!(result.buyer_type, BuyerType::Unknown);
        assert!(!result.rush_eligible);
    }

    #[test]
    fn bracketed_for_hire_is_a_seller_post() {
        let result = score("[FOR HIRE] Shorts editor", "");
        assert_eq!(result.override_reason, Some(OverrideReason::SellerPost));
    }

    #[test]
    fn job_board_host_is_rejected_by_substring() {
        let result = compute_lead_score("Hiring an editor", "", "www.upwork.com", &[]);
        assert_eq!(result.status, LeadStatus::Rejected);
        assert_eq!(result.override_reason, Some(OverrideReason::JobBoard));
    }

    #[test]
    fn caller_blocklist_extends_job_boards() {
        let blocklist = vec!["behance.net".to_string()];
        let result = compute_lead_score("Hiring an editor", "", "behance.net", &blocklist);
        assert_eq!(result.override_reason, Some(OverrideReason::JobBoard));
        let clean = compute_lead_score("Hiring an editor", "", "reddit.com", &blocklist);
        assert_eq!(clean.override_reason, None);
    }

    #[test]
    fn blank_blocklist_entry_blocks_nothing() {
        let blocklist = vec![String::new()];
        let result = compute_lead_score("Hiring an editor", "", "reddit.com", &blocklist);
        assert_eq!(result.override_reason, None);
    }

    #[test]
    fn seller_check_runs_before_host_check() {
        let result = compute_lead_score("Hire me", "", "upwork.com", &[]);
        assert_eq!(result.override_reason, Some(OverrideReason::SellerPost));
    }

    #[test]
    fn each_rule_group_counts_once() {
        let result = score("Hiring hiring hiring", "looking for someone, need an editor");
        assert_eq!(result.score, 25);
        assert_eq!(
            result.rule_matches,
            vec!["+25: High intent keywords (hiring/looking for/need)"]
        );
    }

    #[test]
    fn keywords_next_to_non_ascii_letters_still_match() {
        let result = score("募集hiring editor", "");
        assert_eq!(result.score, 25);
        assert_eq!(
            result.rule_matches,
            vec!["+25: High intent keywords (hiring/looking for/need)"]
        );

        // `t` is a word character, `é` is not.
        let urgent = score("gesuchtdeadline", "éasap");
        assert_eq!(urgent.score, 15);
        let accented = score("Café agency needs editor", "");
        assert_eq!(accented.buyer_type, BuyerType::Agency);
    }

    #[test]
    fn all_groups_add_up() {
        let result = score(
            "Agency hiring shorts editor ASAP",
            "podcast clips, using capcut right now",
        );
        // 25 + 15 + 10 + 10 + 10 + 5
        assert_eq!(result.score, 75);
        assert_eq!(result.status, LeadStatus::OutreachReady);
        assert_eq!(result.rule_matches.len(), 6);
    }

    #[test]
    fn seventy_points_is_outreach_ready() {
        let result = score("Agency hiring for reels", "swamped with podcast work");
        assert_eq!(result.score, 70);
        assert_eq!(result.status, LeadStatus::OutreachReady);
    }

    #[test]
    fn status_boundaries() {
        assert_eq!(status_for_score(70), LeadStatus::OutreachReady);
        assert_eq!(status_for_score(69), LeadStatus::Review);
        assert_eq!(status_for_score(40), LeadStatus::Review);
        assert_eq!(status_for_score(39), LeadStatus::Rejected);
        assert_eq!(status_for_score(100), LeadStatus::OutreachReady);
        assert_eq!(status_for_score(0), LeadStatus::Rejected);
    }

    #[test]
    fn forty_points_lands_in_review() {
        let result = score("Hiring an editor", "deadline friday");
        assert_eq!(result.score, 40);
        assert_eq!(result.status, LeadStatus::Review);
    }

    #[test]
    fn low_scores_are_rejected_without_override_reason() {
        let result = score("Nice sunset photos", "");
        assert_eq!(result.score, 0);
        assert_eq!(result.status, LeadStatus::Rejected);
        assert_eq!(result.override_reason, None);
    }

    #[test]
    fn buyer_type_follows_priority_order() {
        assert_eq!(score("agency and podcast", "").buyer_type, BuyerType::Agency);
        assert_eq!(score("podcasting coach", "").buyer_type, BuyerType::Podcaster);
        assert_eq!(score("coach running ads", "").buyer_type, BuyerType::Coach);
        assert_eq!(score("ugc for a creator", "").buyer_type, BuyerType::Ecom);
        assert_eq!(score("youtuber", "").buyer_type, BuyerType::Creator);
        assert_eq!(score("plumber", "").buyer_type, BuyerType::Unknown);
    }

    #[test]
    fn pain_tags_are_independent() {
        let result = score("Overwhelmed, urgent", "need to repurpose and overflow help");
        assert_eq!(
            result.pain_tags,
            vec![PainTag::Deadline, PainTag::Volume, PainTag::Overflow, PainTag::Repurpose]
        );
        assert_eq!(
            result.pain_tag_strings(),
            vec!["deadline", "volume", "overflow", "repurpose"]
        );
    }

    #[test]
    fn rush_eligibility_is_independent_of_score() {
        assert!(score("need it today", "").rush_eligible);
        assert!(score("immediately please", "").rush_eligible);
        assert!(!score("next month is fine", "").rush_eligible);
        let rushed = score("rush", "");
        assert!(rushed.rush_eligible);
        assert_eq!(rushed.status, LeadStatus::Rejected);
    }

    #[test]
    fn scoring_is_deterministic() {
        let blocklist = vec!["example.org".to_string()];
        let first = compute_lead_score("Agency hiring", "asap clips", "x.com", &blocklist);
        for _ in 0..5 {
            assert_eq!(
                compute_lead_score("Agency hiring", "asap clips", "x.com", &blocklist),
                first
            );
        }
    }

    #[test]
    fn clamp_only_binds_at_ceiling() {
        assert_eq!(clamp_score(75, 100), 75);
        assert_eq!(clamp_score(140, 100), 100);
    }
}
