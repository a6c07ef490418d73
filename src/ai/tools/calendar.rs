use std::sync::Arc;

use anyhow::{Error, Result};
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate};
use serde::{Deserialize, Serialize};

use super::{failure, parse_args};
use crate::core::Lookup;
use crate::google::CalendarClient;
use crate::google::gcal::{Event, EventPatch, EventTime, NewEvent};
use crate::openai::{Function, Parameters, Property, ToolCall, ToolType};

const DEFAULT_COUNT: u32 = 10;

/// `dd/mm/YYYY HH:MM` for date-times, `dd/mm/YYYY` for all-day dates.
/// Unparseable values are shown as-is.
pub fn format_event_time(time: &EventTime) -> Option<String> {
    if let Some(date_time) = &time.date_time {
        return Some(
            DateTime::parse_from_rfc3339(date_time)
                .map(|dt| dt.format("%d/%m/%Y %H:%M").to_string())
                .unwrap_or_else(|_| date_time.clone()),
        );
    }
    time.date.as_ref().map(|date| {
        NaiveDate::parse_from_str(date, "%Y-%m-%d")
            .map(|d| d.format("%d/%m/%Y").to_string())
            .unwrap_or_else(|_| date.clone())
    })
}

fn format_event(event: &Event) -> String {
    let mut out = format!(
        "  - {}\n",
        event.summary.as_deref().unwrap_or("Untitled")
    );
    if let Some(start) = event.start.as_ref().and_then(format_event_time) {
        out.push_str(&format!("    Start:    {}\n", start));
    }
    if let Some(end) = event.end.as_ref().and_then(format_event_time) {
        out.push_str(&format!("    End:      {}\n", end));
    }
    if let Some(location) = event.location.as_deref().filter(|l| !l.is_empty()) {
        out.push_str(&format!("    Location: {}\n", location));
    }
    if let Some(description) = event.description.as_deref().filter(|d| !d.is_empty()) {
        let excerpt: String = description.chars().take(50).collect();
        out.push_str(&format!("    Desc:     {}...\n", excerpt));
    }
    out.push_str(&format!("    ID:       {}\n", event.id));
    out
}

#[derive(Serialize)]
pub struct ListEventsProps {
    pub count: Property,
    pub calendar_id: Property,
}

#[derive(Deserialize)]
pub struct ListEventsArgs {
    pub count: Option<u32>,
    pub calendar_id: Option<String>,
}

#[derive(Serialize)]
pub struct ListCalendarEventsTool {
    pub r#type: ToolType,
    pub function: Function<ListEventsProps>,
    #[serde(skip)]
    client: Arc<CalendarClient>,
}

#[async_trait]
impl ToolCall for ListCalendarEventsTool {
    async fn call(&self, args: &str) -> Result<String, Error> {
        let fn_args: ListEventsArgs = match parse_args(args) {
            Ok(a) => a,
            Err(msg) => return Ok(msg),
        };
        let count = fn_args.count.unwrap_or(DEFAULT_COUNT);
        tracing::info!("Listing {} calendar events", count);

        let events = match self
            .client
            .list_upcoming(fn_args.calendar_id.as_deref(), count)
            .await
        {
            Ok(events) => events,
            Err(e) => return Ok(failure("retrieving events", &e)),
        };
        if events.is_empty() {
            return Ok(String::from("No upcoming events found."));
        }

        let mut out = format!("Upcoming events ({}):\n", events.len());
        for event in &events {
            out.push_str(&format_event(event));
            out.push('\n');
        }
        Ok(out.trim().to_string())
    }

    fn function_name(&self) -> String {
        self.function.name.clone()
    }
}

impl ListCalendarEventsTool {
    pub fn new(client: Arc<CalendarClient>) -> Self {
        let function = Function {
            name: String::from("list_calendar_events"),
            description: String::from("List the next upcoming events of a calendar."),
            parameters: Parameters {
                r#type: String::from("object"),
                properties: ListEventsProps {
                    count: Property::new(
                        "integer",
                        "Number of events to retrieve, between 1 and 100 (default 10).",
                    ),
                    calendar_id: Property::new(
                        "string",
                        "Calendar ID (defaults to the configured calendar).",
                    ),
                },
                required: vec![],
                additional_properties: false,
            },
            strict: false,
        };
        Self {
            r#type: ToolType::Function,
            function,
            client,
        }
    }
}

#[derive(Serialize)]
pub struct CreateEventProps {
    pub summary: Property,
    pub start_time: Property,
    pub end_time: Property,
    pub description: Property,
    pub location: Property,
    pub attendees: Property,
    pub calendar_id: Property,
}

#[derive(Deserialize)]
pub struct CreateEventArgs {
    pub summary: String,
    pub start_time: String,
    pub end_time: String,
    pub description: Option<String>,
    pub location: Option<String>,
    pub attendees: Option<Vec<String>>,
    pub calendar_id: Option<String>,
}

#[derive(Serialize)]
pub struct CreateCalendarEventTool {
    pub r#type: ToolType,
    pub function: Function<CreateEventProps>,
    #[serde(skip)]
    client: Arc<CalendarClient>,
}

#[async_trait]
impl ToolCall for CreateCalendarEventTool {
    async fn call(&self, args: &str) -> Result<String, Error> {
        let fn_args: CreateEventArgs = match parse_args(args) {
            Ok(a) => a,
            Err(msg) => return Ok(msg),
        };
        tracing::info!("Creating calendar event '{}'", fn_args.summary);

        let event = NewEvent {
            summary: fn_args.summary,
            start: fn_args.start_time,
            end: fn_args.end_time,
            description: fn_args.description,
            location: fn_args.location,
            attendees: fn_args.attendees.unwrap_or_default(),
        };
        match self
            .client
            .create_event(fn_args.calendar_id.as_deref(), &event)
            .await
        {
            Ok(created) => Ok(format!(
                "Event '{}' created. ID: {}",
                created.summary.as_deref().unwrap_or(&event.summary),
                created.id
            )),
            Err(e) => Ok(failure("creating the event", &e)),
        }
    }

    fn function_name(&self) -> String {
        self.function.name.clone()
    }
}

impl CreateCalendarEventTool {
    pub fn new(client: Arc<CalendarClient>) -> Self {
        let function = Function {
            name: String::from("create_calendar_event"),
            description: String::from("Create a new calendar event."),
            parameters: Parameters {
                r#type: String::from("object"),
                properties: CreateEventProps {
                    summary: Property::new("string", "Title of the event."),
                    start_time: Property::new(
                        "string",
                        "Start date and time in ISO format, e.g. '2024-07-01T10:00:00'.",
                    ),
                    end_time: Property::new(
                        "string",
                        "End date and time in ISO format, e.g. '2024-07-01T11:00:00'.",
                    ),
                    description: Property::new("string", "Description of the event."),
                    location: Property::new("string", "Where the event takes place."),
                    attendees: Property::string_list("Email addresses of the attendees."),
                    calendar_id: Property::new(
                        "string",
                        "Calendar ID (defaults to the configured calendar).",
                    ),
                },
                required: vec![
                    String::from("summary"),
                    String::from("start_time"),
                    String::from("end_time"),
                ],
                additional_properties: false,
            },
            strict: false,
        };
        Self {
            r#type: ToolType::Function,
            function,
            client,
        }
    }
}

#[derive(Serialize)]
pub struct UpdateEventProps {
    pub event_id: Property,
    pub calendar_id: Property,
    pub summary: Property,
    pub start_time: Property,
    pub end_time: Property,
    pub description: Property,
    pub location: Property,
    pub attendees: Property,
}

#[derive(Deserialize)]
pub struct UpdateEventArgs {
    pub event_id: String,
    pub calendar_id: Option<String>,
    pub summary: Option<String>,
    pub start_time: Option<String>,
    pub end_time: Option<String>,
    pub description: Option<String>,
    pub location: Option<String>,
    pub attendees: Option<Vec<String>>,
}

#[derive(Serialize)]
pub struct UpdateCalendarEventTool {
    pub r#type: ToolType,
    pub function: Function<UpdateEventProps>,
    #[serde(skip)]
    client: Arc<CalendarClient>,
}

#[async_trait]
impl ToolCall for UpdateCalendarEventTool {
    async fn call(&self, args: &str) -> Result<String, Error> {
        let fn_args: UpdateEventArgs = match parse_args(args) {
            Ok(a) => a,
            Err(msg) => return Ok(msg),
        };
        tracing::info!("Updating calendar event {}", fn_args.event_id);

        let patch = EventPatch {
            summary: fn_args.summary,
            start: fn_args.start_time,
            end: fn_args.end_time,
            description: fn_args.description,
            location: fn_args.location,
            attendees: fn_args.attendees,
        };
        if patch.is_empty() {
            return Ok(String::from("No update information provided."));
        }

        match self
            .client
            .update_event(fn_args.calendar_id.as_deref(), &fn_args.event_id, &patch)
            .await
        {
            Ok(Lookup::Found(event)) => Ok(format!(
                "Event '{}' (ID: {}) updated.",
                event.summary.as_deref().unwrap_or("Untitled"),
                fn_args.event_id
            )),
            Ok(Lookup::NotFound) => Ok(format!("Event {} not found.", fn_args.event_id)),
            Err(e) => Ok(failure(
                &format!("updating event {}", fn_args.event_id),
                &e,
            )),
        }
    }

    fn function_name(&self) -> String {
        self.function.name.clone()
    }
}

impl UpdateCalendarEventTool {
    pub fn new(client: Arc<CalendarClient>) -> Self {
        let function = Function {
            name: String::from("update_calendar_event"),
            description: String::from(
                "Update an existing calendar event. Only the fields provided are changed.",
            ),
            parameters: Parameters {
                r#type: String::from("object"),
                properties: UpdateEventProps {
                    event_id: Property::new("string", "ID of the event to update."),
                    calendar_id: Property::new(
                        "string",
                        "Calendar ID (defaults to the configured calendar).",
                    ),
                    summary: Property::new("string", "New title."),
                    start_time: Property::new("string", "New start date and time (ISO format)."),
                    end_time: Property::new("string", "New end date and time (ISO format)."),
                    description: Property::new("string", "New description."),
                    location: Property::new("string", "New location."),
                    attendees: Property::string_list(
                        "New list of attendee email addresses (replaces the existing one).",
                    ),
                },
                required: vec![String::from("event_id")],
                additional_properties: false,
            },
            strict: false,
        };
        Self {
            r#type: ToolType::Function,
            function,
            client,
        }
    }
}

#[derive(Serialize)]
pub struct DeleteEventProps {
    pub event_id: Property,
    pub calendar_id: Property,
}

#[derive(Deserialize)]
pub struct DeleteEventArgs {
    pub event_id: String,
    pub calendar_id: Option<String>,
}

#[derive(Serialize)]
pub struct DeleteCalendarEventTool {
    pub r#type: ToolType,
    pub function: Function<DeleteEventProps>,
    #[serde(skip)]
    client: Arc<CalendarClient>,
}

#[async_trait]
impl ToolCall for DeleteCalendarEventTool {
    async fn call(&self, args: &str) -> Result<String, Error> {
        let fn_args: DeleteEventArgs = match parse_args(args) {
            Ok(a) => a,
            Err(msg) => return Ok(msg),
        };
        tracing::info!("Deleting calendar event {}", fn_args.event_id);

        match self
            .client
            .delete_event(fn_args.calendar_id.as_deref(), &fn_args.event_id)
            .await
        {
            Ok(true) => Ok(format!("Event {} deleted.", fn_args.event_id)),
            Ok(false) => Ok(format!(
                "Event {} not found or already deleted.",
                fn_args.event_id
            )),
            Err(e) => Ok(failure(
                &format!("deleting event {}", fn_args.event_id),
                &e,
            )),
        }
    }

    fn function_name(&self) -> String {
        self.function.name.clone()
    }
}

impl DeleteCalendarEventTool {
    pub fn new(client: Arc<CalendarClient>) -> Self {
        let function = Function {
            name: String::from("delete_calendar_event"),
            description: String::from("Delete a calendar event."),
            parameters: Parameters {
                r#type: String::from("object"),
                properties: DeleteEventProps {
                    event_id: Property::new("string", "ID of the event to delete."),
                    calendar_id: Property::new(
                        "string",
                        "Calendar ID (defaults to the configured calendar).",
                    ),
                },
                required: vec![String::from("event_id")],
                additional_properties: false,
            },
            strict: false,
        };
        Self {
            r#type: ToolType::Function,
            function,
            client,
        }
    }
}
