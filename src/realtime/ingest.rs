use std::{
    collections::{HashSet, VecDeque},
    sync::{Arc, Mutex, MutexGuard, PoisonError},
};

use serde::Deserialize;
use thiserror::Error;

use crate::{
    domain::{
        chat::{ChatKind, LastMessage, MessageKind},
        events::MessageEvent,
    },
    store::chat_list::ChatListStore,
};

const INGEST_MALFORMED_EVENT: &str = "REALTIME_INGEST_MALFORMED_EVENT";
const INGEST_CHANNEL_STATE_CHANGED: &str = "REALTIME_INGEST_CHANNEL_STATE_CHANGED";

/// How many recently ingested event ids are remembered for invalidation
/// dedup. The transport redelivers at most a handful of frames around a
/// reconnect, so a small window is enough.
const SEEN_EVENT_WINDOW: usize = 512;

/// Lifecycle of the realtime channel, mirrored from the transport's signals.
/// The adapter only owns the mirror; connecting and reconnecting are the
/// transport's business.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ChannelState {
    #[default]
    Connecting,
    Connected,
    Idle,
    Reconnecting,
    Closed,
}

impl ChannelState {
    fn accepts_events(&self) -> bool {
        matches!(self, ChannelState::Connected | ChannelState::Idle)
    }
}

/// Tagged realtime push payload, already decoded from the wire.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RealtimeEvent {
    Direct {
        id: String,
        sender_id: String,
        receiver_id: String,
        body: String,
        kind: MessageKind,
        created_at_ms: i64,
    },
    Group {
        id: String,
        sender_id: String,
        group_id: String,
        body: String,
        kind: MessageKind,
        created_at_ms: i64,
    },
}

impl RealtimeEvent {
    fn event_id(&self) -> &str {
        match self {
            RealtimeEvent::Direct { id, .. } | RealtimeEvent::Group { id, .. } => id,
        }
    }
}

#[derive(Debug, Error)]
pub enum MalformedEvent {
    #[error("frame is not valid JSON: {0}")]
    BadFrame(#[source] serde_json::Error),
    #[error("frame is missing required field `{field}`")]
    MissingField { field: &'static str },
    #[error("frame timestamp `{value}` is not parseable")]
    InvalidTimestamp { value: String },
    #[error("frame message kind code {code} is unknown")]
    UnknownMessageKind { code: u8 },
}

/// Read-model invalidation seam: told which chat's cached metadata (profile,
/// group info, message pages) went stale because of an ingested event.
pub trait MetadataInvalidator: Send + Sync {
    fn invalidate(&self, chat_id: &str, kind: ChatKind);
}

/// Normalizes realtime payloads into the store's fold input and triggers
/// metadata invalidation once per distinct event id.
///
/// The adapter assumes nothing about delivery guarantees: duplicates are
/// absorbed by the store's idempotent fold, and the dedup window keeps
/// invalidation from firing twice for a redelivered frame.
pub struct EventIngestAdapter {
    store: Arc<ChatListStore>,
    invalidator: Arc<dyn MetadataInvalidator>,
    state: Mutex<IngestState>,
}

#[derive(Default)]
struct IngestState {
    channel: ChannelState,
    seen_order: VecDeque<String>,
    seen: HashSet<String>,
}

impl EventIngestAdapter {
    pub fn new(store: Arc<ChatListStore>, invalidator: Arc<dyn MetadataInvalidator>) -> Self {
        Self {
            store,
            invalidator,
            state: Mutex::new(IngestState::default()),
        }
    }

    pub fn channel_state(&self) -> ChannelState {
        self.lock().channel
    }

    /// Records a transport lifecycle signal. Signals may arrive in any order
    /// relative to auth state; the adapter just mirrors the latest one.
    pub fn channel_changed(&self, channel: ChannelState) {
        let mut state = self.lock();
        if state.channel != channel {
            tracing::info!(
                code = INGEST_CHANNEL_STATE_CHANGED,
                from = ?state.channel,
                to = ?channel,
                "realtime channel state changed"
            );
            state.channel = channel;
        }
    }

    /// Decodes a raw wire frame for the given topic and ingests it.
    /// Malformed frames are dropped and logged, never propagated: a bad
    /// payload must not corrupt the list with an unsortable summary.
    pub fn ingest_frame(&self, topic: ChatKind, payload: &str) -> bool {
        let decoded = match topic {
            ChatKind::Direct => decode_direct_frame(payload),
            ChatKind::Group => decode_group_frame(payload),
        };

        match decoded {
            Ok(event) => self.ingest(event),
            Err(error) => {
                tracing::warn!(
                    code = INGEST_MALFORMED_EVENT,
                    topic = ?topic,
                    error = %error,
                    "realtime frame dropped"
                );
                false
            }
        }
    }

    /// Applies one decoded event to the store. Returns whether the list
    /// changed. Events are dropped while the channel is not in
    /// `Connected`/`Idle` and while no account is active.
    pub fn ingest(&self, event: RealtimeEvent) -> bool {
        {
            let state = self.lock();
            if !state.channel.accepts_events() {
                tracing::debug!(
                    channel = ?state.channel,
                    event_id = event.event_id(),
                    "event dropped: channel not ready"
                );
                return false;
            }
        }

        let Some(account_id) = self.store.active_account() else {
            tracing::debug!(event_id = event.event_id(), "event dropped: no active account");
            return false;
        };

        let message_event = normalize(&event, &account_id);
        let applied = self.store.upsert_on_new_message(&message_event);

        for (chat_id, kind) in self.invalidation_targets(&event, &message_event.chat_id) {
            self.invalidator.invalidate(&chat_id, kind);
        }

        applied
    }

    /// Returns the metadata targets for this event, or nothing when the
    /// event id was already seen. Dedup decision happens under the lock;
    /// the invalidator itself is called outside it.
    fn invalidation_targets(
        &self,
        event: &RealtimeEvent,
        resolved_chat_id: &str,
    ) -> Vec<(String, ChatKind)> {
        let mut state = self.lock();
        if !state.seen.insert(event.event_id().to_owned()) {
            return Vec::new();
        }

        state.seen_order.push_back(event.event_id().to_owned());
        if state.seen_order.len() > SEEN_EVENT_WINDOW {
            if let Some(oldest) = state.seen_order.pop_front() {
                state.seen.remove(&oldest);
            }
        }

        match event {
            // The peer's profile cache is stale whichever side authored the
            // message.
            RealtimeEvent::Direct { .. } => vec![(resolved_chat_id.to_owned(), ChatKind::Direct)],
            RealtimeEvent::Group {
                sender_id,
                group_id,
                ..
            } => vec![
                (group_id.clone(), ChatKind::Group),
                (sender_id.clone(), ChatKind::Direct),
            ],
        }
    }

    fn lock(&self) -> MutexGuard<'_, IngestState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Resolves the conversation an event belongs to and builds the fold input.
/// For a direct message the chat id is the *other* party; for a group
/// message it is always the group id, never the sender.
fn normalize(event: &RealtimeEvent, account_id: &str) -> MessageEvent {
    match event {
        RealtimeEvent::Direct {
            id,
            sender_id,
            receiver_id,
            body,
            kind,
            created_at_ms,
        } => {
            let chat_id = if sender_id == account_id {
                receiver_id.clone()
            } else {
                sender_id.clone()
            };
            MessageEvent::new(
                chat_id,
                ChatKind::Direct,
                LastMessage {
                    id: id.clone(),
                    sender_id: sender_id.clone(),
                    body: body.clone(),
                    kind: *kind,
                    created_at_ms: *created_at_ms,
                },
            )
        }
        RealtimeEvent::Group {
            id,
            sender_id,
            group_id,
            body,
            kind,
            created_at_ms,
        } => MessageEvent::new(
            group_id.clone(),
            ChatKind::Group,
            LastMessage {
                id: id.clone(),
                sender_id: sender_id.clone(),
                body: body.clone(),
                kind: *kind,
                created_at_ms: *created_at_ms,
            },
        ),
    }
}

/// Raw wire shape of a realtime message frame. Field names and the numeric
/// kind code follow the server contract.
#[derive(Debug, Deserialize)]
struct WireMessage {
    id: Option<String>,
    sender: Option<String>,
    receiver: Option<String>,
    content: Option<String>,
    #[serde(rename = "type")]
    kind: Option<u8>,
    #[serde(rename = "createTime")]
    create_time: Option<String>,
}

pub fn decode_direct_frame(payload: &str) -> Result<RealtimeEvent, MalformedEvent> {
    let wire = decode_wire(payload)?;
    Ok(RealtimeEvent::Direct {
        id: wire.id,
        sender_id: wire.sender,
        receiver_id: wire.receiver,
        body: wire.body,
        kind: wire.kind,
        created_at_ms: wire.created_at_ms,
    })
}

pub fn decode_group_frame(payload: &str) -> Result<RealtimeEvent, MalformedEvent> {
    let wire = decode_wire(payload)?;
    Ok(RealtimeEvent::Group {
        id: wire.id,
        sender_id: wire.sender,
        group_id: wire.receiver,
        body: wire.body,
        kind: wire.kind,
        created_at_ms: wire.created_at_ms,
    })
}

struct ValidatedWire {
    id: String,
    sender: String,
    receiver: String,
    body: String,
    kind: MessageKind,
    created_at_ms: i64,
}

fn decode_wire(payload: &str) -> Result<ValidatedWire, MalformedEvent> {
    let wire: WireMessage = serde_json::from_str(payload).map_err(MalformedEvent::BadFrame)?;

    let id = require(wire.id, "id")?;
    let sender = require(wire.sender, "sender")?;
    let receiver = require(wire.receiver, "receiver")?;
    let create_time = require(wire.create_time, "createTime")?;

    let created_at_ms = parse_created_at(&create_time).ok_or(MalformedEvent::InvalidTimestamp {
        value: create_time,
    })?;

    let code = wire.kind.ok_or(MalformedEvent::MissingField { field: "type" })?;
    let kind = MessageKind::from_wire(code).ok_or(MalformedEvent::UnknownMessageKind { code })?;

    Ok(ValidatedWire {
        id,
        sender,
        receiver,
        body: wire.content.unwrap_or_default(),
        kind,
        created_at_ms,
    })
}

fn require(value: Option<String>, field: &'static str) -> Result<String, MalformedEvent> {
    value
        .filter(|value| !value.is_empty())
        .ok_or(MalformedEvent::MissingField { field })
}

/// Parses the server's `createTime` into epoch millis. The server emits
/// RFC 3339; naive datetimes without an offset are read as UTC.
fn parse_created_at(value: &str) -> Option<i64> {
    if let Ok(parsed) = chrono::DateTime::parse_from_rfc3339(value) {
        return Some(parsed.timestamp_millis());
    }

    for format in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"] {
        if let Ok(parsed) = chrono::NaiveDateTime::parse_from_str(value, format) {
            return Some(parsed.and_utc().timestamp_millis());
        }
    }

    None
}
