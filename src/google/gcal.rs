//! Google Calendar v3 REST client.

use anyhow::Result;
use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};

use super::oauth::CredentialStore;
use crate::core::config::CalendarConfig;
use crate::core::error::error_for_status;
use crate::core::{Lookup, RetryPolicy, ServiceError, with_retry};

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct EventTime {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub date_time: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub date: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub time_zone: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Attendee {
    pub email: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response_status: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Event {
    #[serde(default)]
    pub id: String,
    pub summary: Option<String>,
    pub description: Option<String>,
    pub location: Option<String>,
    pub start: Option<EventTime>,
    pub end: Option<EventTime>,
    pub attendees: Option<Vec<Attendee>>,
    pub html_link: Option<String>,
    pub status: Option<String>,
}

#[derive(Debug, Deserialize)]
struct EventList {
    #[serde(default)]
    items: Vec<Event>,
}

/// Fields for a new event. `start` and `end` are RFC 3339 date-times.
#[derive(Debug, Clone, Default)]
pub struct NewEvent {
    pub summary: String,
    pub start: String,
    pub end: String,
    pub description: Option<String>,
    pub location: Option<String>,
    pub attendees: Vec<String>,
}

/// Sparse update. Only fields that are `Some` end up in the request.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EventPatch {
    pub summary: Option<String>,
    pub start: Option<String>,
    pub end: Option<String>,
    pub description: Option<String>,
    pub location: Option<String>,
    pub attendees: Option<Vec<String>>,
}

impl EventPatch {
    pub fn is_empty(&self) -> bool {
        *self == EventPatch::default()
    }
}

fn timed(date_time: &str, timezone: &str) -> Value {
    json!({ "dateTime": date_time, "timeZone": timezone })
}

fn attendee_list(emails: &[String]) -> Value {
    Value::Array(emails.iter().map(|e| json!({ "email": e })).collect())
}

/// Full insert body. Start and end always carry the configured time zone.
pub fn event_body(event: &NewEvent, timezone: &str) -> Value {
    json!({
        "summary": event.summary,
        "location": event.location.clone().unwrap_or_default(),
        "description": event.description.clone().unwrap_or_default(),
        "start": timed(&event.start, timezone),
        "end": timed(&event.end, timezone),
        "attendees": attendee_list(&event.attendees),
    })
}

/// Patch body with only the supplied fields, or `None` when there is
/// nothing to change.
pub fn patch_body(patch: &EventPatch, timezone: &str) -> Option<Value> {
    let mut body = Map::new();
    if let Some(summary) = &patch.summary {
        body.insert("summary".into(), json!(summary));
    }
    if let Some(description) = &patch.description {
        body.insert("description".into(), json!(description));
    }
    if let Some(location) = &patch.location {
        body.insert("location".into(), json!(location));
    }
    if let Some(start) = &patch.start {
        body.insert("start".into(), timed(start, timezone));
    }
    if let Some(end) = &patch.end {
        body.insert("end".into(), timed(end, timezone));
    }
    if let Some(attendees) = &patch.attendees {
        body.insert("attendees".into(), attendee_list(attendees));
    }

    if body.is_empty() {
        None
    } else {
        Some(Value::Object(body))
    }
}

fn is_not_found(err: &anyhow::Error) -> bool {
    matches!(
        ServiceError::find(err),
        Some(ServiceError::Http { status: 404, .. })
    )
}

pub struct CalendarClient {
    config: CalendarConfig,
    policy: RetryPolicy,
    http: reqwest::Client,
    credentials: CredentialStore,
}

impl CalendarClient {
    pub fn new(config: &CalendarConfig, policy: RetryPolicy) -> Self {
        let http = reqwest::Client::new();
        Self {
            credentials: CredentialStore::new(config, http.clone()),
            config: config.clone(),
            policy,
            http,
        }
    }

    pub fn timezone(&self) -> &str {
        &self.config.timezone
    }

    fn events_url(&self, calendar_id: Option<&str>) -> String {
        let calendar_id = calendar_id.unwrap_or(&self.config.calendar_id);
        format!(
            "{}/calendars/{}/events",
            self.config.api_base_url.trim_end_matches('/'),
            urlencoding::encode(calendar_id)
        )
    }

    fn event_url(&self, calendar_id: Option<&str>, event_id: &str) -> String {
        format!(
            "{}/{}",
            self.events_url(calendar_id),
            urlencoding::encode(event_id)
        )
    }

    /// Upcoming events from now on, ordered by start time with recurring
    /// events expanded into single instances.
    pub async fn list_upcoming(
        &self,
        calendar_id: Option<&str>,
        max_results: u32,
    ) -> Result<Vec<Event>> {
        let url = self.events_url(calendar_id);
        let time_min = Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true);
        tracing::debug!("Listing up to {} events from {}", max_results, time_min);

        let list: EventList = with_retry(&self.policy, || async {
            let token = self.credentials.access_token().await?;
            let resp = self
                .http
                .get(&url)
                .bearer_auth(token)
                .query(&[
                    ("timeMin", time_min.as_str()),
                    ("maxResults", &max_results.to_string()),
                    ("singleEvents", "true"),
                    ("orderBy", "startTime"),
                ])
                .send()
                .await?;
            Ok(error_for_status(resp).await?.json().await?)
        })
        .await?;

        Ok(list.items)
    }

    pub async fn create_event(&self, calendar_id: Option<&str>, event: &NewEvent) -> Result<Event> {
        let url = self.events_url(calendar_id);
        let body = event_body(event, &self.config.timezone);

        let created: Event = with_retry(&self.policy, || async {
            let token = self.credentials.access_token().await?;
            let resp = self
                .http
                .post(&url)
                .bearer_auth(token)
                .json(&body)
                .send()
                .await?;
            Ok(error_for_status(resp).await?.json().await?)
        })
        .await?;

        tracing::info!("Created event {}", created.id);
        Ok(created)
    }

    pub async fn get_event(&self, calendar_id: Option<&str>, event_id: &str) -> Result<Lookup<Event>> {
        let url = self.event_url(calendar_id, event_id);
        let result = with_retry(&self.policy, || async {
            let token = self.credentials.access_token().await?;
            let resp = self.http.get(&url).bearer_auth(token).send().await?;
            Ok(error_for_status(resp).await?.json::<Event>().await?)
        })
        .await;

        match result {
            Ok(event) => Ok(Lookup::Found(event)),
            Err(e) if is_not_found(&e) => Ok(Lookup::NotFound),
            Err(e) => Err(e),
        }
    }

    /// Fetch the event and apply `patch` to it. An empty patch returns
    /// the fetched event without writing anything.
    pub async fn update_event(
        &self,
        calendar_id: Option<&str>,
        event_id: &str,
        patch: &EventPatch,
    ) -> Result<Lookup<Event>> {
        let existing = match self.get_event(calendar_id, event_id).await? {
            Lookup::Found(event) => event,
            Lookup::NotFound => {
                tracing::warn!("Event {} not found for update", event_id);
                return Ok(Lookup::NotFound);
            }
        };

        let Some(body) = patch_body(patch, &self.config.timezone) else {
            tracing::debug!("Empty patch for event {}", event_id);
            return Ok(Lookup::Found(existing));
        };

        let url = self.event_url(calendar_id, event_id);
        let result = with_retry(&self.policy, || async {
            let token = self.credentials.access_token().await?;
            let resp = self
                .http
                .patch(&url)
                .bearer_auth(token)
                .json(&body)
                .send()
                .await?;
            Ok(error_for_status(resp).await?.json::<Event>().await?)
        })
        .await;

        match result {
            Ok(event) => {
                tracing::info!("Updated event {}", event_id);
                Ok(Lookup::Found(event))
            }
            Err(e) if is_not_found(&e) => Ok(Lookup::NotFound),
            Err(e) => Err(e),
        }
    }

    /// Returns `false` when the event did not exist.
    pub async fn delete_event(&self, calendar_id: Option<&str>, event_id: &str) -> Result<bool> {
        let url = self.event_url(calendar_id, event_id);
        let result = with_retry(&self.policy, || async {
            let token = self.credentials.access_token().await?;
            let resp = self.http.delete(&url).bearer_auth(token).send().await?;
            error_for_status(resp).await?;
            Ok(())
        })
        .await;

        match result {
            Ok(()) => {
                tracing::info!("Deleted event {}", event_id);
                Ok(true)
            }
            Err(e) if is_not_found(&e) => {
                tracing::warn!("Event {} not found for deletion", event_id);
                Ok(false)
            }
            Err(e) => Err(e),
        }
    }
}
