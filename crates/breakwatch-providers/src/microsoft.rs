//! Microsoft Graph endpoints and `calendarView` normalization.

use breakwatch_core::{EventStatus, NormalizedEvent, ProviderKind, TimeWindow};
use chrono::{DateTime, NaiveDateTime, Utc};
use serde::Deserialize;
use tracing::{debug, warn};

use crate::descriptor::{EventPage, NextPage};
use crate::error::{ProviderError, ProviderResult};

pub const AUTHORIZE_URL: &str = "https://login.microsoftonline.com/common/oauth2/v2.0/authorize";
pub const TOKEN_URL: &str = "https://login.microsoftonline.com/common/oauth2/v2.0/token";
pub const EVENTS_URL: &str = "https://graph.microsoft.com/v1.0/me/calendarView";
pub const SCOPES: &[&str] = &["Calendars.Read", "offline_access"];

pub(crate) fn events_query(window: &TimeWindow) -> Vec<(&'static str, String)> {
    vec![
        ("startDateTime", window.start_rfc3339()),
        ("endDateTime", window.end_rfc3339()),
        ("$select", "start,end,showAs,isCancelled,isAllDay".to_string()),
        ("$orderby", "start/dateTime".to_string()),
        ("$top", "50".to_string()),
    ]
}

pub(crate) fn parse_events(body: &str) -> ProviderResult<EventPage> {
    let view: CalendarView = serde_json::from_str(body).map_err(|e| {
        ProviderError::invalid_response(format!("failed to parse calendar view: {e}"))
            .with_provider(ProviderKind::Microsoft)
    })?;

    Ok(EventPage {
        events: view.value.into_iter().filter_map(normalize).collect(),
        next: view.next_link.map(NextPage::Link),
    })
}

#[derive(Debug, Deserialize)]
struct CalendarView {
    #[serde(default)]
    value: Vec<GraphEvent>,
    #[serde(rename = "@odata.nextLink")]
    next_link: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GraphEvent {
    #[serde(default)]
    is_cancelled: bool,
    #[serde(default)]
    is_all_day: bool,
    show_as: Option<String>,
    start: Option<GraphDateTime>,
    end: Option<GraphDateTime>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GraphDateTime {
    date_time: String,
    time_zone: Option<String>,
}

/// Graph returns `2024-03-15T10:00:00.0000000` in the zone named by
/// `timeZone`; requests ask for UTC.
fn parse_time(value: &GraphDateTime) -> Option<DateTime<Utc>> {
    if let Some(ref tz) = value.time_zone
        && !tz.eq_ignore_ascii_case("UTC")
    {
        debug!(time_zone = %tz, "calendar view returned a non-UTC zone");
    }

    if let Ok(t) = DateTime::parse_from_rfc3339(&value.date_time) {
        return Some(t.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(&value.date_time, "%Y-%m-%dT%H:%M:%S%.f")
        .map(|t| t.and_utc())
        .map_err(|e| warn!(value = %value.date_time, error = %e, "unparseable event time"))
        .ok()
}

fn normalize(event: GraphEvent) -> Option<NormalizedEvent> {
    if event.is_cancelled {
        return None;
    }

    let start = parse_time(event.start.as_ref()?)?;
    let end = parse_time(event.end.as_ref()?)?;

    let status = if event.is_all_day {
        EventStatus::Free
    } else {
        match event.show_as.as_deref() {
            Some("free") | Some("workingElsewhere") => EventStatus::Free,
            Some("tentative") => EventStatus::Tentative,
            _ => EventStatus::Confirmed,
        }
    };

    Some(NormalizedEvent::new(start, end, status, ProviderKind::Microsoft))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn event(show_as: &str, hour: u32) -> String {
        format!(
            r#"{{"showAs": "{show_as}", "isCancelled": false, "isAllDay": false,
                "start": {{"dateTime": "2024-03-15T{hour:02}:00:00.0000000", "timeZone": "UTC"}},
                "end": {{"dateTime": "2024-03-15T{hour:02}:30:00.0000000", "timeZone": "UTC"}}}}"#
        )
    }

    #[test]
    fn query_uses_calendar_view_params() {
        let start = Utc.with_ymd_and_hms(2024, 3, 15, 9, 0, 0).unwrap();
        let window = TimeWindow::from_now(start, chrono::Duration::hours(2));
        let query = events_query(&window);
        assert!(query.contains(&("startDateTime", "2024-03-15T09:00:00Z".to_string())));
        assert!(query.contains(&("endDateTime", "2024-03-15T11:00:00Z".to_string())));
        assert!(query.iter().any(|(k, _)| *k == "$select"));
    }

    #[test]
    fn show_as_mapping() {
        let body = format!(
            r#"{{"value": [{}, {}, {}, {}, {}, {}]}}"#,
            event("busy", 9),
            event("free", 10),
            event("tentative", 11),
            event("oof", 12),
            event("workingElsewhere", 13),
            event("unknown", 14),
        );
        let page = parse_events(&body).unwrap();
        let statuses: Vec<_> = page.events.iter().map(|e| e.status).collect();
        assert_eq!(
            statuses,
            vec![
                EventStatus::Confirmed,
                EventStatus::Free,
                EventStatus::Tentative,
                EventStatus::Confirmed,
                EventStatus::Free,
                EventStatus::Confirmed,
            ]
        );
        assert_eq!(
            page.events[0].start,
            Utc.with_ymd_and_hms(2024, 3, 15, 9, 0, 0).unwrap()
        );
        assert_eq!(page.events[0].duration(), chrono::Duration::minutes(30));
    }

    #[test]
    fn cancelled_dropped_and_all_day_free() {
        let body = r#"{"value": [
            {"showAs": "busy", "isCancelled": true,
             "start": {"dateTime": "2024-03-15T09:00:00.0000000", "timeZone": "UTC"},
             "end": {"dateTime": "2024-03-15T10:00:00.0000000", "timeZone": "UTC"}},
            {"showAs": "busy", "isAllDay": true,
             "start": {"dateTime": "2024-03-15T00:00:00.0000000", "timeZone": "UTC"},
             "end": {"dateTime": "2024-03-16T00:00:00.0000000", "timeZone": "UTC"}}
        ]}"#;
        let page = parse_events(body).unwrap();
        assert_eq!(page.events.len(), 1);
        assert_eq!(page.events[0].status, EventStatus::Free);
    }

    #[test]
    fn next_link() {
        let body = r#"{"value": [], "@odata.nextLink": "https://graph.microsoft.com/v1.0/me/calendarView?$skiptoken=x"}"#;
        let page = parse_events(body).unwrap();
        assert!(matches!(page.next, Some(NextPage::Link(ref l)) if l.contains("skiptoken")));
    }

    #[test]
    fn garbage_is_invalid_response() {
        let err = parse_events("{\"value\": 3}").unwrap_err();
        assert_eq!(err.provider(), Some(ProviderKind::Microsoft));
    }
}
