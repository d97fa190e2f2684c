//! Parsing of WhatsApp Cloud API webhook envelopes into the one
//! normalized message shape the state machine consumes.

use serde::Deserialize;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundMessage {
    pub from_phone: String,
    pub from_name: String,
    pub kind: InboundKind,
}

/// The three input shapes the transport can deliver. Each conversation
/// state declares which of these it accepts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InboundKind {
    Text(String),
    ButtonReply { id: String },
    ListReply { id: String },
}

#[derive(Debug, Deserialize)]
struct Envelope {
    #[serde(default)]
    entry: Vec<Entry>,
}

#[derive(Debug, Deserialize)]
struct Entry {
    #[serde(default)]
    changes: Vec<Change>,
}

#[derive(Debug, Deserialize)]
struct Change {
    value: ChangeValue,
}

#[derive(Debug, Deserialize)]
struct ChangeValue {
    #[serde(default)]
    contacts: Vec<Contact>,
    #[serde(default)]
    messages: Vec<RawMessage>,
}

#[derive(Debug, Deserialize)]
struct Contact {
    profile: Profile,
}

#[derive(Debug, Deserialize)]
struct Profile {
    name: String,
}

#[derive(Debug, Deserialize)]
struct RawMessage {
    from: String,
    #[serde(rename = "type")]
    kind: String,
    text: Option<TextBody>,
    interactive: Option<Interactive>,
}

#[derive(Debug, Deserialize)]
struct TextBody {
    body: String,
}

#[derive(Debug, Deserialize)]
struct Interactive {
    button_reply: Option<Reply>,
    list_reply: Option<Reply>,
}

#[derive(Debug, Deserialize)]
struct Reply {
    id: String,
}

/// Extract the first message from a webhook delivery. Status updates
/// and other non-message notifications yield `None`.
pub fn parse_webhook(payload: &serde_json::Value) -> Option<InboundMessage> {
    let envelope: Envelope = serde_json::from_value(payload.clone()).ok()?;
    let value = envelope
        .entry
        .into_iter()
        .flat_map(|e| e.changes)
        .map(|c| c.value)
        .find(|v| !v.messages.is_empty())?;

    let name = value
        .contacts
        .first()
        .map(|c| c.profile.name.clone())
        .unwrap_or_default();
    let message = value.messages.into_iter().next()?;

    let kind = match message.kind.as_str() {
        "text" => InboundKind::Text(message.text?.body),
        "interactive" => {
            let interactive = message.interactive?;
            if let Some(reply) = interactive.button_reply {
                InboundKind::ButtonReply { id: reply.id }
            } else if let Some(reply) = interactive.list_reply {
                InboundKind::ListReply { id: reply.id }
            } else {
                return None;
            }
        }
        _ => return None,
    };

    Some(InboundMessage {
        from_phone: message.from,
        from_name: name,
        kind,
    })
}
