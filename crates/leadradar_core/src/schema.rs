use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use time::OffsetDateTime;

use crate::error::LeadError;

/// Declares a fieldless enum whose variants map 1:1 to fixed wire strings.
///
/// The wire string is used for serde, for SQLite columns, and for CLI
/// arguments, so all three stay in lockstep.
macro_rules! wire_enum {
    (
        $(#[$meta:meta])*
        pub enum $name:ident {
            $( $(#[$vmeta:meta])* $variant:ident => $wire:literal ),+ $(,)?
        }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
        pub enum $name {
            $( $(#[$vmeta])* #[serde(rename = $wire)] $variant ),+
        }

        impl $name {
            pub const ALL: &'static [$name] = &[$($name::$variant),+];

            pub fn as_str(&self) -> &'static str {
                match self {
                    $($name::$variant => $wire),+
                }
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl std::str::FromStr for $name {
            type Err = LeadError;

            fn from_str(value: &str) -> Result<Self, Self::Err> {
                let normalized = value.trim().replace('-', "_");
                $(
                    if normalized.eq_ignore_ascii_case($wire) {
                        return Ok($name::$variant);
                    }
                )+
                Err(LeadError::UnknownVariant {
                    kind: stringify!($name),
                    value: value.to_string(),
                })
            }
        }
    };
}

wire_enum! {
    /// Site-constraint grouping applied to a search query.
    pub enum SourcePack {
        Forums => "FORUMS",
        Social => "SOCIAL",
        Professional => "PROFESSIONAL",
        WideWeb => "WIDE_WEB",
    }
}

wire_enum! {
    pub enum BuyerType {
        Agency => "AGENCY",
        Podcaster => "PODCASTER",
        Coach => "COACH",
        Ecom => "ECOM",
        Creator => "CREATOR",
        /// Also the wildcard filter on outreach templates.
        Unknown => "UNKNOWN",
    }
}

wire_enum! {
    pub enum MappedService {
        AiReelEdit => "AI_REEL_EDIT",
        SocialMediaEdit => "SOCIAL_MEDIA_EDIT",
        ViralCaptions => "VIRAL_CAPTIONS",
        PodcastYoutubeRepurpose => "PODCAST_YOUTUBE_REPURPOSE",
        AutoCaptions => "AUTO_CAPTIONS",
        VideoTrimSmartCut => "VIDEO_TRIM_SMART_CUT",
        Rush12Hour => "RUSH_12_HOUR",
        /// Also the wildcard filter on outreach templates.
        Unknown => "UNKNOWN",
    }
}

wire_enum! {
    pub enum OfferAngle {
        FixedPrice => "FIXED_PRICE",
        Speed48h => "SPEED_48H",
        LocalUsCa => "LOCAL_US_CA",
        Rush12h => "RUSH_12H",
        /// Wildcard filter on outreach templates and the default for new leads.
        Any => "ANY",
    }
}

wire_enum! {
    pub enum LeadStatus {
        OutreachReady => "OUTREACH_READY",
        Review => "REVIEW",
        Rejected => "REJECTED",
        Contacted => "CONTACTED",
        Replied => "REPLIED",
        Booked => "BOOKED",
        Won => "WON",
        Lost => "LOST",
        NoResponse => "NO_RESPONSE",
    }
}

wire_enum! {
    pub enum OverrideReason {
        SellerPost => "SELLER_POST",
        TooOld => "TOO_OLD",
        WrongNiche => "WRONG_NICHE",
        JobBoard => "JOB_BOARD",
        LowIntent => "LOW_INTENT",
        Other => "OTHER",
    }
}

wire_enum! {
    pub enum LeadEventType {
        StatusChange => "STATUS_CHANGE",
        Dm1Sent => "DM_1_SENT",
        Fu1Sent => "FU_1_SENT",
        Fu2Sent => "FU_2_SENT",
        OutreachSent => "OUTREACH_SENT",
        FollowupSent => "FOLLOWUP_SENT",
        ReplyReceived => "REPLY_RECEIVED",
        Booked => "BOOKED",
        Won => "WON",
        Lost => "LOST",
        NoteAdded => "NOTE_ADDED",
        Snoozed => "SNOOZED",
        Override => "OVERRIDE",
    }
}

wire_enum! {
    pub enum TemplateType {
        Dm1 => "DM_1",
        Fu1 => "FU_1",
        Fu2 => "FU_2",
    }
}

wire_enum! {
    pub enum QueryCategory {
        PodcastRepurpose => "PODCAST_REPURPOSE",
        ViralCaptions => "VIRAL_CAPTIONS",
        SmartCut => "SMART_CUT",
        Rush => "RUSH",
        AgencyOverflow => "AGENCY_OVERFLOW",
        CoachesConsultants => "COACHES_CONSULTANTS",
        EcomUgc => "ECOM_UGC",
        RetentionHook => "RETENTION_HOOK",
        BatchProduction => "BATCH_PRODUCTION",
        ZeroViews => "ZERO_VIEWS",
        PodcastHighlights => "PODCAST_HIGHLIGHTS",
        AudioProblems => "AUDIO_PROBLEMS",
        RenderIssues => "RENDER_ISSUES",
        HiringShortsEditor => "HIRING_SHORTS_EDITOR",
        RepurposeLongform => "REPURPOSE_LONGFORM",
        GeneralNeedEditor => "GENERAL_NEED_EDITOR",
        Master => "MASTER",
        HiringNow => "HIRING_NOW",
        Swamped => "SWAMPED",
        AgencyOverflowMaster => "AGENCY_OVERFLOW_MASTER",
    }
}

wire_enum! {
    /// Stored on leads by its lower-case wire name.
    pub enum PainTag {
        Deadline => "deadline",
        Volume => "volume",
        Overflow => "overflow",
        Repurpose => "repurpose",
    }
}

impl Default for BuyerType {
    fn default() -> Self {
        BuyerType::Unknown
    }
}

impl Default for MappedService {
    fn default() -> Self {
        MappedService::Unknown
    }
}

impl Default for OfferAngle {
    fn default() -> Self {
        OfferAngle::Any
    }
}

impl LeadEventType {
    /// Events that represent a message actually sent to the lead.
    pub fn is_outreach(&self) -> bool {
        matches!(
            self,
            LeadEventType::Dm1Sent
                | LeadEventType::Fu1Sent
                | LeadEventType::Fu2Sent
                | LeadEventType::OutreachSent
                | LeadEventType::FollowupSent
        )
    }
}

/// One raw hit from the search engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct SearchResult {
    pub title: String,
    #[serde(default)]
    pub snippet: String,
    pub url: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Lead {
    pub id: String,
    pub owner: String,
    pub original_url: String,
    pub canonical_url: String,
    pub url_hash: String, // sha256 hex of canonical_url
    pub title: String,
    pub snippet: String,
    pub source_host: String,
    #[serde(with = "time::serde::rfc3339")]
    #[schemars(with = "String")]
    pub first_seen_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    #[schemars(with = "String")]
    pub last_seen_at: OffsetDateTime,
    pub buyer_type: BuyerType,
    pub pain_tags: Vec<String>,
    pub mapped_service: MappedService,
    pub offer_angle: OfferAngle,
    pub score: u8,
    pub status: LeadStatus,
    pub override_reason: Option<OverrideReason>,
    pub rush_eligible: bool,
    pub notes: String,
    #[serde(with = "time::serde::rfc3339::option")]
    #[schemars(with = "Option<String>")]
    pub last_outreach_at: Option<OffsetDateTime>,
    #[serde(with = "time::serde::rfc3339::option")]
    #[schemars(with = "Option<String>")]
    pub next_follow_up_at: Option<OffsetDateTime>,
    #[serde(with = "time::serde::rfc3339")]
    #[schemars(with = "String")]
    pub updated_at: OffsetDateTime,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct LeadEvent {
    pub id: String,
    pub owner: String,
    pub lead_id: String,
    pub event_type: LeadEventType,
    pub message_preview: Option<String>,
    pub template_id: Option<String>,
    pub payload: Value,
    #[serde(with = "time::serde::rfc3339")]
    #[schemars(with = "String")]
    pub created_at: OffsetDateTime,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct QueryTemplate {
    pub id: String,
    pub owner: String,
    pub name: String,
    pub engine: String, // e.g. "bing"
    pub category: QueryCategory,
    pub mapped_service: MappedService,
    pub base_query_text: String,
    pub is_active: bool,
    #[serde(with = "time::serde::rfc3339")]
    #[schemars(with = "String")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    #[schemars(with = "String")]
    pub updated_at: OffsetDateTime,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct OutreachTemplate {
    pub id: String,
    pub owner: String,
    pub name: String,
    pub template_type: TemplateType,
    pub body: String,
    pub applicable_buyer_type: BuyerType,
    pub applicable_service: MappedService,
    pub applicable_offer_angle: OfferAngle,
    pub priority: i32,
    pub is_active: bool,
    #[serde(with = "time::serde::rfc3339")]
    #[schemars(with = "String")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    #[schemars(with = "String")]
    pub updated_at: OffsetDateTime,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct RunRecord {
    pub id: String,
    pub owner: String,
    pub query_id: String,
    pub source_pack: SourcePack,
    pub market: String,    // e.g. "en-US"
    pub freshness: String, // e.g. "Week"
    pub final_query: String,
    #[serde(with = "time::serde::rfc3339")]
    #[schemars(with = "String")]
    pub started_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339::option")]
    #[schemars(with = "Option<String>")]
    pub finished_at: Option<OffsetDateTime>,
    pub total_results: u32,
    pub qualified_results: u32,
    pub review_results: u32,
    pub rejected_results: u32,
    pub duplicates_removed: u32,
    pub error: Option<String>,
}

/// Per-owner configuration. Missing fields take the built-in defaults.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(default)]
pub struct Settings {
    pub order_page_url: String,
    pub utm_source: String,
    pub utm_medium: String,
    pub max_results_per_run: u32,
    pub query_max_runs_per_day: u32,
    pub global_cooldown_minutes: u32,
    pub job_board_blocklist: Vec<String>,
    pub fu1_delay_hours: u32,
    pub fu2_delay_hours: u32,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            order_page_url: String::new(),
            utm_source: "leadgen_app".to_string(),
            utm_medium: "outreach".to_string(),
            max_results_per_run: 50,
            query_max_runs_per_day: 5,
            global_cooldown_minutes: 2,
            job_board_blocklist: Vec::new(),
            fu1_delay_hours: 48,
            fu2_delay_hours: 96,
        }
    }
}
