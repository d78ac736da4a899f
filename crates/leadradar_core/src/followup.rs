//! Follow-up cadence: how an outreach event moves a lead's status and its
//! next follow-up time.
//!
//! All status changes caused by events go through [`transition`]. No state
//! is guarded, so a WON lead that receives `DM_1_SENT` goes back to
//! CONTACTED; a guard for terminal states belongs in that one function.

use serde::Serialize;
use time::{Duration, OffsetDateTime, Time};

use crate::schema::{Lead, LeadEventType, LeadStatus, Settings};

const UPCOMING_WINDOW_DAYS: i64 = 7;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FollowUpDelays {
    pub fu1_hours: u32,
    pub fu2_hours: u32,
}

impl From<&Settings> for FollowUpDelays {
    fn from(settings: &Settings) -> Self {
        Self {
            fu1_hours: settings.fu1_delay_hours,
            fu2_hours: settings.fu2_delay_hours,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FollowUpChange {
    Keep,
    Clear,
    Set(OffsetDateTime),
}

impl FollowUpChange {
    pub fn apply(self, current: Option<OffsetDateTime>) -> Option<OffsetDateTime> {
        match self {
            FollowUpChange::Keep => current,
            FollowUpChange::Clear => None,
            FollowUpChange::Set(at) => Some(at),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Transition {
    pub status: LeadStatus,
    pub follow_up: FollowUpChange,
    /// Set when the event is a sent message; becomes the lead's `last_outreach_at`.
    pub outreach_at: Option<OffsetDateTime>,
}

pub fn transition(
    current: LeadStatus,
    event: LeadEventType,
    at: OffsetDateTime,
    delays: FollowUpDelays,
) -> Transition {
    let (status, follow_up) = match event {
        LeadEventType::Dm1Sent => (
            LeadStatus::Contacted,
            FollowUpChange::Set(at + hours(delays.fu1_hours)),
        ),
        LeadEventType::Fu1Sent => {
            // The second delay is measured from the first follow-up, not from DM 1.
            let gap = delays.fu2_hours.saturating_sub(delays.fu1_hours);
            (current, FollowUpChange::Set(at + hours(gap)))
        }
        LeadEventType::Fu2Sent => (LeadStatus::NoResponse, FollowUpChange::Clear),
        LeadEventType::ReplyReceived => (LeadStatus::Replied, FollowUpChange::Clear),
        LeadEventType::Booked => (LeadStatus::Booked, FollowUpChange::Clear),
        LeadEventType::Won => (LeadStatus::Won, FollowUpChange::Clear),
        LeadEventType::Lost => (LeadStatus::Lost, FollowUpChange::Clear),
        LeadEventType::StatusChange
        | LeadEventType::OutreachSent
        | LeadEventType::FollowupSent
        | LeadEventType::NoteAdded
        | LeadEventType::Snoozed
        | LeadEventType::Override => (current, FollowUpChange::Keep),
    };

    Transition {
        status,
        follow_up,
        outreach_at: event.is_outreach().then_some(at),
    }
}

fn hours(value: u32) -> Duration {
    Duration::hours(i64::from(value))
}

/// Leads with a scheduled follow-up, bucketed relative to the UTC day of `now`.
#[derive(Debug, Clone, Default, Serialize)]
pub struct TodayQueue {
    pub overdue: Vec<Lead>,
    pub due_today: Vec<Lead>,
    pub upcoming: Vec<Lead>,
}

impl TodayQueue {
    pub fn is_empty(&self) -> bool {
        self.overdue.is_empty() && self.due_today.is_empty() && self.upcoming.is_empty()
    }
}

/// Split leads into overdue (before today), due today, and the following
/// seven days. Leads without a follow-up or further out are dropped.
pub fn build_today_queue(leads: Vec<Lead>, now: OffsetDateTime) -> TodayQueue {
    let today_start = start_of_day(now);
    let today_end = today_start + Duration::days(1);
    let window_end = today_end + Duration::days(UPCOMING_WINDOW_DAYS);

    let mut queue = TodayQueue::default();
    for lead in leads {
        let Some(due) = lead.next_follow_up_at else {
            continue;
        };
        if due < today_start {
            queue.overdue.push(lead);
        } else if due < today_end {
            queue.due_today.push(lead);
        } else if due < window_end {
            queue.upcoming.push(lead);
        }
    }
    queue
}

pub fn start_of_day(at: OffsetDateTime) -> OffsetDateTime {
    at.to_offset(time::UtcOffset::UTC).replace_time(Time::MIDNIGHT)
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::datetime;

    const DELAYS: FollowUpDelays = FollowUpDelays {
        fu1_hours: 48,
        fu2_hours: 96,
    };

    #[test]
    fn dm1_fu1_fu2_cadence() {
        let t0 = datetime!(2025-03-03 9:00 UTC);
        let dm1 = transition(LeadStatus::OutreachReady, LeadEventType::Dm1Sent, t0, DELAYS);
        assert_eq!(dm1.status, LeadStatus::Contacted);
        assert_eq!(dm1.follow_up, FollowUpChange::Set(datetime!(2025-03-05 9:00 UTC)));
        assert_eq!(dm1.outreach_at, Some(t0));

        let t1 = datetime!(2025-03-05 10:30 UTC);
        let fu1 = transition(dm1.status, LeadEventType::Fu1Sent, t1, DELAYS);
        assert_eq!(fu1.status, LeadStatus::Contacted);
        assert_eq!(fu1.follow_up, FollowUpChange::Set(datetime!(2025-03-07 10:30 UTC)));

        let t2 = datetime!(2025-03-07 11:00 UTC);
        let fu2 = transition(fu1.status, LeadEventType::Fu2Sent, t2, DELAYS);
        assert_eq!(fu2.status, LeadStatus::NoResponse);
        assert_eq!(fu2.follow_up, FollowUpChange::Clear);
        assert_eq!(fu2.outreach_at, Some(t2));
    }

    #[test]
    fn terminal_replies_clear_follow_up() {
        let at = datetime!(2025-03-03 9:00 UTC);
        for (event, status) in [
            (LeadEventType::ReplyReceived, LeadStatus::Replied),
            (LeadEventType::Booked, LeadStatus::Booked),
            (LeadEventType::Won, LeadStatus::Won),
            (LeadEventType::Lost, LeadStatus::Lost),
        ] {
            let result = transition(LeadStatus::Contacted, event, at, DELAYS);
            assert_eq!(result.status, status);
            assert_eq!(result.follow_up, FollowUpChange::Clear);
            assert_eq!(result.outreach_at, None);
        }
    }

    #[test]
    fn other_events_only_log() {
        let at = datetime!(2025-03-03 9:00 UTC);
        let result = transition(LeadStatus::Review, LeadEventType::NoteAdded, at, DELAYS);
        assert_eq!(result.status, LeadStatus::Review);
        assert_eq!(result.follow_up, FollowUpChange::Keep);
        assert_eq!(result.outreach_at, None);

        let sent = transition(LeadStatus::Review, LeadEventType::OutreachSent, at, DELAYS);
        assert_eq!(sent.status, LeadStatus::Review);
        assert_eq!(sent.follow_up, FollowUpChange::Keep);
        assert_eq!(sent.outreach_at, Some(at));
    }

    #[test]
    fn won_lead_can_regress_to_contacted() {
        let at = datetime!(2025-03-03 9:00 UTC);
        let result = transition(LeadStatus::Won, LeadEventType::Dm1Sent, at, DELAYS);
        assert_eq!(result.status, LeadStatus::Contacted);
    }

    #[test]
    fn inverted_delays_do_not_schedule_in_the_past() {
        let at = datetime!(2025-03-03 9:00 UTC);
        let delays = FollowUpDelays { fu1_hours: 72, fu2_hours: 24 };
        let result = transition(LeadStatus::Contacted, LeadEventType::Fu1Sent, at, delays);
        assert_eq!(result.follow_up, FollowUpChange::Set(at));
    }

    #[test]
    fn follow_up_change_applies_to_current_value() {
        let current = Some(datetime!(2025-03-03 9:00 UTC));
        let next = datetime!(2025-03-04 9:00 UTC);
        assert_eq!(FollowUpChange::Keep.apply(current), current);
        assert_eq!(FollowUpChange::Clear.apply(current), None);
        assert_eq!(FollowUpChange::Set(next).apply(None), Some(next));
    }

    fn lead_due(id: &str, due: Option<OffsetDateTime>) -> Lead {
        let seen = datetime!(2025-03-01 0:00 UTC);
        Lead {
            id: id.to_string(),
            owner: "local".to_string(),
            original_url: format!("https://reddit.com/{id}"),
            canonical_url: format!("https://reddit.com/{id}"),
            url_hash: String::new(),
            title: id.to_string(),
            snippet: String::new(),
            source_host: "reddit.com".to_string(),
            first_seen_at: seen,
            last_seen_at: seen,
            buyer_type: Default::default(),
            pain_tags: Vec::new(),
            mapped_service: Default::default(),
            offer_angle: Default::default(),
            score: 0,
            status: LeadStatus::Contacted,
            override_reason: None,
            rush_eligible: false,
            notes: String::new(),
            last_outreach_at: None,
            next_follow_up_at: due,
            updated_at: seen,
        }
    }

    #[test]
    fn today_queue_buckets_by_utc_day() {
        let now = datetime!(2025-03-10 15:00 UTC);
        let leads = vec![
            lead_due("overdue", Some(datetime!(2025-03-09 23:59 UTC))),
            lead_due("morning", Some(datetime!(2025-03-10 0:00 UTC))),
            lead_due("tonight", Some(datetime!(2025-03-10 23:59 UTC))),
            lead_due("tomorrow", Some(datetime!(2025-03-11 0:00 UTC))),
            lead_due("next-week", Some(datetime!(2025-03-17 23:59 UTC))),
            lead_due("too-far", Some(datetime!(2025-03-18 0:00 UTC))),
            lead_due("none", None),
        ];
        let queue = build_today_queue(leads, now);
        let ids = |bucket: &[Lead]| bucket.iter().map(|l| l.id.clone()).collect::<Vec<_>>();
        assert_eq!(ids(&queue.overdue), vec!["overdue"]);
        assert_eq!(ids(&queue.due_today), vec!["morning", "tonight"]);
        assert_eq!(ids(&queue.upcoming), vec!["tomorrow", "next-week"]);
        assert!(!queue.is_empty());
    }
}
