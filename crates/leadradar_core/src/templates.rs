//! Outreach template selection and placeholder filling.

use std::cmp::Ordering;

use serde::Serialize;
use url::form_urlencoded;

use crate::schema::{
    BuyerType, Lead, MappedService, OfferAngle, OutreachTemplate, PainTag, Settings, TemplateType,
};

pub const DEFAULT_CAMPAIGN: &str = "leadgen";

const EXACT_BUYER_POINTS: i64 = 30;
const EXACT_SERVICE_POINTS: i64 = 30;
const EXACT_ANGLE_POINTS: i64 = 25;
const WILDCARD_POINTS: i64 = 10;

/// The lead fields that drive selection and filling.
#[derive(Debug, Clone, PartialEq)]
pub struct LeadProfile {
    pub buyer_type: BuyerType,
    pub mapped_service: MappedService,
    pub offer_angle: OfferAngle,
    pub pain_tags: Vec<String>,
    pub rush_eligible: bool,
    pub title: String,
    pub original_url: String,
}

impl From<&Lead> for LeadProfile {
    fn from(lead: &Lead) -> Self {
        Self {
            buyer_type: lead.buyer_type,
            mapped_service: lead.mapped_service,
            offer_angle: lead.offer_angle,
            pain_tags: lead.pain_tags.clone(),
            rush_eligible: lead.rush_eligible,
            title: lead.title.clone(),
            original_url: lead.original_url.clone(),
        }
    }
}

pub fn match_score(template: &OutreachTemplate, lead: &LeadProfile) -> i64 {
    let mut score = 0;

    if template.applicable_buyer_type == lead.buyer_type {
        score += EXACT_BUYER_POINTS;
    } else if template.applicable_buyer_type == BuyerType::Unknown {
        score += WILDCARD_POINTS;
    }

    if template.applicable_service == lead.mapped_service {
        score += EXACT_SERVICE_POINTS;
    } else if template.applicable_service == MappedService::Unknown {
        score += WILDCARD_POINTS;
    }

    if template.applicable_offer_angle == lead.offer_angle {
        score += EXACT_ANGLE_POINTS;
    } else if template.applicable_offer_angle == OfferAngle::Any {
        score += WILDCARD_POINTS;
    }

    score + i64::from(template.priority)
}

/// Best active template of `template_type` for `lead`, or `None` when no
/// candidate applies.
///
/// Ranking: match score desc, priority desc, updated_at desc, name asc.
/// Candidates tied on all four keep their input order.
pub fn select_best<'a>(
    candidates: &'a [OutreachTemplate],
    lead: &LeadProfile,
    template_type: TemplateType,
) -> Option<&'a OutreachTemplate> {
    let mut scored: Vec<(i64, &OutreachTemplate)> = candidates
        .iter()
        .filter(|template| template.template_type == template_type && template.is_active)
        .map(|template| (match_score(template, lead), template))
        .collect();

    scored.sort_by(|(score_a, a), (score_b, b)| rank(*score_a, a, *score_b, b));
    scored.first().map(|(_, template)| *template)
}

fn rank(score_a: i64, a: &OutreachTemplate, score_b: i64, b: &OutreachTemplate) -> Ordering {
    score_b
        .cmp(&score_a)
        .then_with(|| b.priority.cmp(&a.priority))
        .then_with(|| b.updated_at.cmp(&a.updated_at))
        .then_with(|| a.name.cmp(&b.name))
}

pub fn service_label(service: MappedService) -> &'static str {
    match service {
        MappedService::AiReelEdit => "AI Reel Edit",
        MappedService::SocialMediaEdit => "Social Media Edit",
        MappedService::ViralCaptions => "Viral Captions",
        MappedService::PodcastYoutubeRepurpose => "Podcast/YouTube Repurpose",
        MappedService::AutoCaptions => "Auto Captions",
        MappedService::VideoTrimSmartCut => "Video Trim/Smart Cut",
        MappedService::Rush12Hour => "12-Hour Rush Edit",
        MappedService::Unknown => "short-form editing",
    }
}

pub fn buyer_type_label(buyer_type: BuyerType) -> &'static str {
    match buyer_type {
        BuyerType::Agency => "agency",
        BuyerType::Podcaster => "podcaster",
        BuyerType::Coach => "coach",
        BuyerType::Ecom => "ecommerce",
        BuyerType::Creator | BuyerType::Unknown => "creator",
    }
}

pub fn offer_angle_label(angle: OfferAngle) -> &'static str {
    match angle {
        OfferAngle::FixedPrice => "fixed-price",
        OfferAngle::Speed48h => "fast 48-hour",
        OfferAngle::LocalUsCa => "US/Canada local",
        OfferAngle::Rush12h => "12-hour rush",
        OfferAngle::Any => "fast turnaround",
    }
}

pub fn pain_tag_label(tag: PainTag) -> &'static str {
    match tag {
        PainTag::Deadline => "tight deadlines",
        PainTag::Volume => "high volume",
        PainTag::Overflow => "overflow work",
        PainTag::Repurpose => "repurposing content",
    }
}

/// Label for a stored pain tag; tags outside [`PainTag`] are shown verbatim.
pub fn pain_phrase(tag: &str) -> String {
    match tag.parse::<PainTag>() {
        Ok(known) => pain_tag_label(known).to_string(),
        Err(_) => tag.to_string(),
    }
}

pub fn turnaround_label(rush_eligible: bool) -> &'static str {
    if rush_eligible {
        "12-hour rush available"
    } else {
        "48-hour turnaround"
    }
}

/// Order page URL with UTM parameters, or an empty string when no order
/// page is configured.
pub fn order_link(settings: &Settings, lead_id: Option<&str>, category: Option<&str>) -> String {
    if settings.order_page_url.is_empty() {
        return String::new();
    }
    let params = form_urlencoded::Serializer::new(String::new())
        .append_pair("utm_source", &settings.utm_source)
        .append_pair("utm_medium", &settings.utm_medium)
        .append_pair("utm_campaign", category.unwrap_or(DEFAULT_CAMPAIGN))
        .append_pair("utm_content", lead_id.unwrap_or("unknown"))
        .finish();
    let separator = if settings.order_page_url.contains('?') { '&' } else { '?' };
    format!("{}{separator}{params}", settings.order_page_url)
}

/// Everything a template body may reference.
#[derive(Debug, Clone)]
pub struct FillContext<'a> {
    pub lead: &'a LeadProfile,
    pub settings: &'a Settings,
    pub lead_id: Option<&'a str>,
    pub category: Option<&'a str>,
}

impl FillContext<'_> {
    /// Value for a `{token}`, or `None` if the token is not a known placeholder.
    pub fn resolve(&self, token: &str) -> Option<String> {
        let value = match token {
            "{turnaround}" => turnaround_label(self.lead.rush_eligible).to_string(),
            "{service}" => service_label(self.lead.mapped_service).to_string(),
            "{buyer_type}" => buyer_type_label(self.lead.buyer_type).to_string(),
            "{platform}" => "short-form".to_string(),
            "{pain_1}" => self
                .lead
                .pain_tags
                .first()
                .map(|tag| pain_phrase(tag))
                .unwrap_or_else(|| "editing taking too long".to_string()),
            "{pain_2}" => self
                .lead
                .pain_tags
                .get(1)
                .map(|tag| pain_phrase(tag))
                .unwrap_or_default(),
            "{offer_angle}" => offer_angle_label(self.lead.offer_angle).to_string(),
            "{order_link}" => order_link(self.settings, self.lead_id, self.category),
            "{cta_keyword}" => "ORDER".to_string(),
            "{source_title}" => self.lead.title.clone(),
            "{source_url}" => self.lead.original_url.clone(),
            _ => return None,
        };
        Some(value)
    }
}

/// Substitute every known `{token}` in `body` in a single left-to-right pass.
///
/// Unknown tokens are copied through untouched, and substituted values are
/// never scanned again.
pub fn fill(body: &str, context: &FillContext<'_>) -> String {
    let mut out = String::with_capacity(body.len());
    let mut rest = body;

    while let Some(start) = rest.find('{') {
        out.push_str(&rest[..start]);
        let candidate = &rest[start..];
        match candidate[1..].find(['{', '}']) {
            Some(offset) if candidate.as_bytes()[offset + 1] == b'}' => {
                let token = &candidate[..offset + 2];
                match context.resolve(token) {
                    Some(value) => out.push_str(&value),
                    None => out.push_str(token),
                }
                rest = &candidate[offset + 2..];
            }
            _ => {
                out.push('{');
                rest = &candidate[1..];
            }
        }
    }

    out.push_str(rest);
    out
}

/// A selected template rendered for one lead.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Draft {
    pub template_id: String,
    pub template_name: String,
    pub template_type: TemplateType,
    pub body: String,
}

pub fn draft_message(
    candidates: &[OutreachTemplate],
    lead: &LeadProfile,
    template_type: TemplateType,
    context: &FillContext<'_>,
) -> Option<Draft> {
    let template = select_best(candidates, lead, template_type)?;
    Some(Draft {
        template_id: template.id.clone(),
        template_name: template.name.clone(),
        template_type: template.template_type,
        body: fill(&template.body, context),
    })
}
