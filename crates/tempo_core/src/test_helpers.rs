//! In-memory fakes for the two I/O seams.
//!
//! Used by this crate's unit tests and by integration tests; nothing here
//! is compiled into the binary's hot path.

use std::collections::{HashSet, VecDeque};
use std::sync::Mutex;

use async_trait::async_trait;

use crate::calbridge::{
    BackendEvent, BackendStatus, CalendarBackend, CalendarInfo, CreatedEvent, NewEvent,
};
use crate::error::{CoreError, Result};
use crate::model::LlmClient;

/// A model client that replays queued responses.
#[derive(Debug, Default)]
pub struct MockLlm {
    responses: Mutex<VecDeque<String>>,
}

impl MockLlm {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue the next raw model response.
    pub fn push(&self, response: impl Into<String>) {
        self.responses.lock().unwrap().push_back(response.into());
    }
}

#[async_trait]
impl LlmClient for MockLlm {
    async fn complete(&self, _prompt: &str, _temperature: f32) -> Result<String> {
        self.responses
            .lock()
            .unwrap()
            .pop_front()
            .ok_or_else(|| CoreError::LlmUnavailable("mock response queue exhausted".to_string()))
    }
}

#[derive(Debug, Default)]
struct MockBackendState {
    existing: Vec<BackendEvent>,
    created: Vec<NewEvent>,
    live_events: HashSet<String>,
    deleted: Vec<String>,
    add_calls: usize,
    fail_adds: HashSet<usize>,
    next_event_id: usize,
}

/// An in-memory calendar backend.
///
/// `events` returns every seeded event regardless of the calendar filter;
/// the allotter's own window and holiday filtering is what is under test.
#[derive(Debug, Default)]
pub struct MockBackend {
    calendars: Vec<CalendarInfo>,
    state: Mutex<MockBackendState>,
}

impl MockBackend {
    pub fn with_calendars(calendars: Vec<CalendarInfo>) -> Self {
        Self {
            calendars,
            state: Mutex::default(),
        }
    }

    /// Seed a pre-existing (busy) event.
    pub fn add_existing_event(
        &self,
        id: &str,
        title: &str,
        start_iso: &str,
        end_iso: &str,
        calendar_id: &str,
        calendar_title: &str,
    ) {
        self.state.lock().unwrap().existing.push(BackendEvent {
            id: id.to_string(),
            title: title.to_string(),
            start_iso: start_iso.to_string(),
            end_iso: end_iso.to_string(),
            calendar_id: Some(calendar_id.to_string()),
            calendar_title: Some(calendar_title.to_string()),
        });
    }

    /// Make the n-th `add_event` call (zero-based) fail with a 4xx.
    pub fn fail_add_at(&self, index: usize) {
        self.state.lock().unwrap().fail_adds.insert(index);
    }

    /// Drop a created event as if something else had deleted it.
    pub fn forget_event(&self, event_id: &str) {
        self.state.lock().unwrap().live_events.remove(event_id);
    }

    /// Notes of the most recently created event.
    pub fn last_notes(&self) -> Option<String> {
        self.state
            .lock()
            .unwrap()
            .created
            .last()
            .and_then(|e| e.notes.clone())
    }

    /// Number of events created so far.
    pub fn created_count(&self) -> usize {
        self.state.lock().unwrap().created.len()
    }

    /// Event ids deleted through the API, in order.
    pub fn deleted_ids(&self) -> Vec<String> {
        self.state.lock().unwrap().deleted.clone()
    }
}

#[async_trait]
impl CalendarBackend for MockBackend {
    async fn status(&self) -> Result<BackendStatus> {
        Ok(BackendStatus {
            authorized: true,
            status_code: 3,
        })
    }

    async fn calendars(&self) -> Result<Vec<CalendarInfo>> {
        Ok(self.calendars.clone())
    }

    async fn events(&self, _days: i64, _calendar_id: Option<&str>) -> Result<Vec<BackendEvent>> {
        Ok(self.state.lock().unwrap().existing.clone())
    }

    async fn add_event(&self, event: &NewEvent) -> Result<CreatedEvent> {
        let mut state = self.state.lock().unwrap();
        let call_index = state.add_calls;
        state.add_calls += 1;

        if state.fail_adds.contains(&call_index) {
            return Err(CoreError::BackendRejected {
                status: 422,
                body: "calendar rejected event".to_string(),
            });
        }

        let id = format!("ev-{}", state.next_event_id);
        state.next_event_id += 1;
        state.live_events.insert(id.clone());
        state.created.push(event.clone());

        Ok(CreatedEvent {
            id,
            title: event.title.clone(),
            start_iso: event.start_iso.clone(),
            end_iso: event.end_iso.clone(),
            calendar: event.calendar_id.clone(),
        })
    }

    async fn delete_event(&self, event_id: &str) -> Result<bool> {
        let mut state = self.state.lock().unwrap();
        if state.live_events.remove(event_id) {
            state.deleted.push(event_id.to_string());
            Ok(true)
        } else {
            Ok(false)
        }
    }
}
