//! Google Calendar v3 endpoints and `events.list` normalization.

use breakwatch_core::{EventStatus, NormalizedEvent, ProviderKind, TimeWindow};
use chrono::{DateTime, NaiveDate, Utc};
use serde::Deserialize;
use tracing::warn;

use crate::descriptor::{EventPage, NextPage};
use crate::error::{ProviderError, ProviderResult};

pub const AUTHORIZE_URL: &str = "https://accounts.google.com/o/oauth2/v2/auth";
pub const TOKEN_URL: &str = "https://oauth2.googleapis.com/token";
pub const EVENTS_URL: &str = "https://www.googleapis.com/calendar/v3/calendars/primary/events";
pub const SCOPES: &[&str] = &["https://www.googleapis.com/auth/calendar.readonly"];

/// Only the fields normalization looks at.
const PAGE_TOKEN_PARAM: &str = "pageToken";
const FIELDS: &str =
    "items(status,transparency,start,end,attendees(self,responseStatus)),nextPageToken";

pub(crate) fn events_query(window: &TimeWindow) -> Vec<(&'static str, String)> {
    vec![
        ("timeMin", window.start_rfc3339()),
        ("timeMax", window.end_rfc3339()),
        ("singleEvents", "true".to_string()),
        ("orderBy", "startTime".to_string()),
        ("maxResults", "250".to_string()),
        ("fields", FIELDS.to_string()),
    ]
}

pub(crate) fn parse_events(body: &str) -> ProviderResult<EventPage> {
    let list: EventList = serde_json::from_str(body).map_err(|e| {
        ProviderError::invalid_response(format!("failed to parse events: {e}"))
            .with_provider(ProviderKind::Google)
    })?;

    Ok(EventPage {
        events: list.items.into_iter().filter_map(normalize).collect(),
        next: list.next_page_token.map(|value| NextPage::Token {
            param: PAGE_TOKEN_PARAM,
            value,
        }),
    })
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct EventList {
    #[serde(default)]
    items: Vec<ApiEvent>,
    next_page_token: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ApiEvent {
    status: Option<String>,
    transparency: Option<String>,
    start: Option<EventTime>,
    end: Option<EventTime>,
    #[serde(default)]
    attendees: Vec<Attendee>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct EventTime {
    date_time: Option<String>,
    date: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Attendee {
    #[serde(rename = "self", default)]
    is_self: bool,
    response_status: Option<String>,
}

/// Returns the instant and whether it was a date-only (all-day) value.
fn parse_time(time: &EventTime) -> Option<(DateTime<Utc>, bool)> {
    if let Some(ref dt) = time.date_time {
        return DateTime::parse_from_rfc3339(dt)
            .map(|t| (t.with_timezone(&Utc), false))
            .map_err(|e| warn!(value = %dt, error = %e, "unparseable event time"))
            .ok();
    }
    let date = time.date.as_ref()?;
    NaiveDate::parse_from_str(date, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|d| (d.and_utc(), true))
}

fn normalize(event: ApiEvent) -> Option<NormalizedEvent> {
    if event.status.as_deref() == Some("cancelled") {
        return None;
    }

    let (start, all_day) = parse_time(event.start.as_ref()?)?;
    let (end, _) = parse_time(event.end.as_ref()?)?;

    let own_response = event
        .attendees
        .iter()
        .find(|a| a.is_self)
        .and_then(|a| a.response_status.as_deref());

    let status = if all_day
        || event.transparency.as_deref() == Some("transparent")
        || own_response == Some("declined")
    {
        EventStatus::Free
    } else if event.status.as_deref() == Some("tentative") || own_response == Some("tentative") {
        EventStatus::Tentative
    } else {
        EventStatus::Confirmed
    };

    Some(NormalizedEvent::new(start, end, status, ProviderKind::Google))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn parse(body: &str) -> EventPage {
        parse_events(body).unwrap()
    }

    #[test]
    fn query_contains_window_and_projection() {
        let start = Utc.with_ymd_and_hms(2024, 3, 15, 9, 0, 0).unwrap();
        let window = TimeWindow::from_now(start, chrono::Duration::hours(2));
        let query = events_query(&window);

        assert!(query.contains(&("timeMin", "2024-03-15T09:00:00Z".to_string())));
        assert!(query.contains(&("timeMax", "2024-03-15T11:00:00Z".to_string())));
        assert!(query.contains(&("singleEvents", "true".to_string())));
        assert!(query.iter().any(|(k, v)| *k == "fields" && v.contains("nextPageToken")));
    }

    #[test]
    fn status_mapping() {
        let page = parse(
            r#"{
              "items": [
                {"status": "confirmed",
                 "start": {"dateTime": "2024-03-15T10:00:00+01:00"},
                 "end": {"dateTime": "2024-03-15T11:00:00+01:00"}},
                {"status": "cancelled",
                 "start": {"dateTime": "2024-03-15T10:00:00Z"},
                 "end": {"dateTime": "2024-03-15T11:00:00Z"}},
                {"status": "confirmed", "transparency": "transparent",
                 "start": {"dateTime": "2024-03-15T12:00:00Z"},
                 "end": {"dateTime": "2024-03-15T13:00:00Z"}},
                {"status": "tentative",
                 "start": {"dateTime": "2024-03-15T14:00:00Z"},
                 "end": {"dateTime": "2024-03-15T15:00:00Z"}},
                {"status": "confirmed",
                 "attendees": [
                   {"email": "boss@example.com", "responseStatus": "accepted"},
                   {"self": true, "responseStatus": "declined"}],
                 "start": {"dateTime": "2024-03-15T16:00:00Z"},
                 "end": {"dateTime": "2024-03-15T17:00:00Z"}},
                {"status": "confirmed",
                 "attendees": [{"self": true, "responseStatus": "tentative"}],
                 "start": {"dateTime": "2024-03-15T17:00:00Z"},
                 "end": {"dateTime": "2024-03-15T18:00:00Z"}}
              ]
            }"#,
        );

        let statuses: Vec<_> = page.events.iter().map(|e| e.status).collect();
        assert_eq!(
            statuses,
            vec![
                EventStatus::Confirmed,
                EventStatus::Free,
                EventStatus::Tentative,
                EventStatus::Free,
                EventStatus::Tentative,
            ]
        );
        assert_eq!(
            page.events[0].start,
            Utc.with_ymd_and_hms(2024, 3, 15, 9, 0, 0).unwrap()
        );
        assert!(page.events.iter().all(|e| e.provider == ProviderKind::Google));
        assert_eq!(page.next, None);
    }

    #[test]
    fn all_day_events_are_free() {
        let page = parse(
            r#"{"items": [{"start": {"date": "2024-03-15"}, "end": {"date": "2024-03-16"}}]}"#,
        );
        assert_eq!(page.events.len(), 1);
        assert_eq!(page.events[0].status, EventStatus::Free);
        assert_eq!(page.events[0].duration(), chrono::Duration::days(1));
    }

    #[test]
    fn next_page_token() {
        let page = parse(r#"{"items": [], "nextPageToken": "abc"}"#);
        assert_eq!(
            page.next,
            Some(NextPage::Token {
                param: "pageToken",
                value: "abc".to_string()
            })
        );
    }

    #[test]
    fn events_without_times_are_skipped() {
        let page = parse(r#"{"items": [{"status": "confirmed"}]}"#);
        assert!(page.events.is_empty());
    }

    #[test]
    fn garbage_is_invalid_response() {
        let err = parse_events("<html>").unwrap_err();
        assert_eq!(
            err.code(),
            crate::error::ProviderErrorCode::InvalidResponse
        );
        assert_eq!(err.provider(), Some(ProviderKind::Google));
    }
}
