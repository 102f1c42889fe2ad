//! WhatsApp Cloud API envelope extraction.
//!
//! The provider owns the envelope shape, so every field here is optional and
//! deserialized leniently: a field with the wrong JSON type is treated as
//! absent rather than failing the whole parse. [`extract`] is total over any
//! JSON value.
//!
//! ```text
//! { entry: [ { id, changes: [ { field, value: { metadata, messages: [..] } } ] } ] }
//! ```

use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

/// Top-level webhook envelope.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct WebhookEnvelope {
    #[serde(default, deserialize_with = "lenient")]
    pub object: Option<String>,
    #[serde(default, deserialize_with = "lenient")]
    pub entry: Option<Vec<Lenient<Entry>>>,
}

/// One business account entry.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Entry {
    #[serde(default, deserialize_with = "lenient_id")]
    pub id: Option<String>,
    #[serde(default, deserialize_with = "lenient")]
    pub changes: Option<Vec<Lenient<Change>>>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Change {
    #[serde(default, deserialize_with = "lenient")]
    pub field: Option<String>,
    #[serde(default, deserialize_with = "lenient")]
    pub value: Option<ChangeValue>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ChangeValue {
    #[serde(default, deserialize_with = "lenient")]
    pub metadata: Option<Metadata>,
    #[serde(default, deserialize_with = "lenient")]
    pub messages: Option<Vec<Lenient<Message>>>,
}

/// Identifies the receiving business number.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Metadata {
    #[serde(default, deserialize_with = "lenient_id")]
    pub phone_number_id: Option<String>,
    #[serde(default, deserialize_with = "lenient_id")]
    pub display_phone_number: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Message {
    #[serde(default, deserialize_with = "lenient_id")]
    pub from: Option<String>,
    #[serde(default, deserialize_with = "lenient_id")]
    pub id: Option<String>,
    #[serde(default, deserialize_with = "lenient_id")]
    pub timestamp: Option<String>,
    #[serde(default, rename = "type", deserialize_with = "lenient")]
    pub kind: Option<String>,
    #[serde(default, deserialize_with = "lenient")]
    pub text: Option<TextBody>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct TextBody {
    #[serde(default, deserialize_with = "lenient")]
    pub body: Option<String>,
}

/// Array element that degrades to `None` instead of failing its parent.
#[derive(Debug, Clone, Default)]
pub struct Lenient<T>(pub Option<T>);

impl<'de, T: DeserializeOwned> Deserialize<'de> for Lenient<T> {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = Value::deserialize(deserializer)?;
        Ok(Lenient(serde_json::from_value(value).ok()))
    }
}

impl<T> Lenient<T> {
    fn get(&self) -> Option<&T> {
        self.0.as_ref()
    }
}

/// Deserialize any JSON value, keeping it only if it fits `T`.
fn lenient<'de, D, T>(deserializer: D) -> Result<Option<T>, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned,
{
    let value = Value::deserialize(deserializer)?;
    Ok(serde_json::from_value(value).ok())
}

/// Identifiers arrive as strings, but numbers are accepted too.
fn lenient_id<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    Ok(match value {
        Value::String(s) => Some(s),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    })
}

/// Diagnostic view of one message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MessageSummary {
    pub from: Option<String>,
    #[serde(rename = "type")]
    pub kind: Option<String>,
    /// Text body, or the message type for non-text messages.
    pub text: Option<String>,
    pub timestamp: Option<String>,
    pub id: Option<String>,
}

/// Routing and diagnostic fields pulled out of an envelope.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExtractedEvent {
    /// Envelope `object`, e.g. `whatsapp_business_account`.
    pub object: Option<String>,
    /// Subscribed field of the first change, e.g. `messages`.
    pub field: Option<String>,
    pub channel_id: Option<String>,
    pub sender_id: Option<String>,
    pub message_count: usize,
    pub messages: Vec<MessageSummary>,
}

/// Treat empty strings as absent.
fn present(value: &Option<String>) -> Option<&String> {
    value.as_ref().filter(|s| !s.is_empty())
}

impl WebhookEnvelope {
    /// Parse an envelope from arbitrary JSON. Never fails.
    pub fn from_value(value: &Value) -> Self {
        serde_json::from_value(value.clone()).unwrap_or_default()
    }

    /// First entry, if it parsed.
    pub fn first_entry(&self) -> Option<&Entry> {
        self.entry.as_ref()?.first()?.get()
    }
}

impl Entry {
    pub fn first_change(&self) -> Option<&Change> {
        self.changes.as_ref()?.first()?.get()
    }
}

impl ChangeValue {
    fn messages(&self) -> impl Iterator<Item = &Message> {
        self.messages
            .iter()
            .flatten()
            .filter_map(Lenient::get)
    }
}

impl Message {
    fn summary(&self) -> MessageSummary {
        let text = self
            .text
            .as_ref()
            .and_then(|t| present(&t.body))
            .or_else(|| present(&self.kind))
            .cloned();

        MessageSummary {
            from: self.from.clone(),
            kind: self.kind.clone(),
            text,
            timestamp: self.timestamp.clone(),
            id: self.id.clone(),
        }
    }
}

/// Extract routing fields from an envelope.
///
/// Only the first entry and its first change are inspected. The channel id is
/// the first present of `metadata.phone_number_id`,
/// `metadata.display_phone_number` and the entry id. The sender is the `from`
/// of the first message.
pub fn extract(envelope: &WebhookEnvelope) -> ExtractedEvent {
    let object = present(&envelope.object).cloned();
    let Some(entry) = envelope.first_entry() else {
        return ExtractedEvent {
            object,
            ..ExtractedEvent::default()
        };
    };

    let change = entry.first_change();
    let field = change.and_then(|c| present(&c.field)).cloned();
    let value = change.and_then(|c| c.value.as_ref());
    let metadata = value.and_then(|v| v.metadata.as_ref());

    let channel_id = metadata
        .and_then(|m| present(&m.phone_number_id).or_else(|| present(&m.display_phone_number)))
        .or_else(|| present(&entry.id))
        .cloned();

    let messages: Vec<MessageSummary> = value
        .map(|v| v.messages().map(Message::summary).collect())
        .unwrap_or_default();

    let sender_id = messages.first().and_then(|m| present(&m.from)).cloned();

    ExtractedEvent {
        object,
        field,
        channel_id,
        sender_id,
        message_count: messages.len(),
        messages,
    }
}

/// Convenience wrapper for raw JSON.
pub fn extract_value(value: &Value) -> ExtractedEvent {
    extract(&WebhookEnvelope::from_value(value))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample_envelope() -> Value {
        json!({
            "object": "whatsapp_business_account",
            "entry": [{
                "id": "123456",
                "changes": [{
                    "field": "messages",
                    "value": {
                        "messaging_product": "whatsapp",
                        "metadata": {
                            "display_phone_number": "16505551234",
                            "phone_number_id": "111"
                        },
                        "contacts": [{"profile": {"name": "Test User"}, "wa_id": "549111"}],
                        "messages": [
                            {
                                "from": "549111",
                                "id": "wamid.1",
                                "timestamp": "1700000000",
                                "type": "text",
                                "text": {"body": "hi"}
                            },
                            {
                                "from": "549222",
                                "id": "wamid.2",
                                "timestamp": "1700000001",
                                "type": "image",
                                "image": {"id": "media-1"}
                            }
                        ]
                    }
                }]
            }]
        })
    }

    #[test]
    fn test_extract_full_envelope() {
        let event = extract_value(&sample_envelope());

        assert_eq!(event.object.as_deref(), Some("whatsapp_business_account"));
        assert_eq!(event.field.as_deref(), Some("messages"));
        assert_eq!(event.channel_id.as_deref(), Some("111"));
        assert_eq!(event.sender_id.as_deref(), Some("549111"));
        assert_eq!(event.message_count, 2);
        assert_eq!(
            event.messages[0],
            MessageSummary {
                from: Some("549111".to_string()),
                kind: Some("text".to_string()),
                text: Some("hi".to_string()),
                timestamp: Some("1700000000".to_string()),
                id: Some("wamid.1".to_string()),
            }
        );
        // Non-text messages fall back to their type
        assert_eq!(event.messages[1].text.as_deref(), Some("image"));
    }

    #[test]
    fn test_channel_id_fallbacks() {
        let display_only = json!({
            "entry": [{"id": "entry-9", "changes": [{"value": {"metadata": {"display_phone_number": "16505551234"}}}]}]
        });
        assert_eq!(
            extract_value(&display_only).channel_id.as_deref(),
            Some("16505551234")
        );

        let entry_only = json!({
            "entry": [{"id": "entry-9", "changes": [{"value": {"metadata": {"phone_number_id": ""}}}]}]
        });
        assert_eq!(extract_value(&entry_only).channel_id.as_deref(), Some("entry-9"));

        let no_changes = json!({"entry": [{"id": "entry-9"}]});
        assert_eq!(extract_value(&no_changes).channel_id.as_deref(), Some("entry-9"));
    }

    #[test]
    fn test_numeric_identifiers_accepted() {
        let numeric = json!({
            "entry": [{"changes": [{"value": {
                "metadata": {"phone_number_id": 111},
                "messages": [{"from": 549111, "type": "text"}]
            }}]}]
        });
        let event = extract_value(&numeric);
        assert_eq!(event.channel_id.as_deref(), Some("111"));
        assert_eq!(event.sender_id.as_deref(), Some("549111"));
    }

    #[test]
    fn test_status_update_without_messages() {
        let statuses = json!({
            "entry": [{"id": "1", "changes": [{"value": {
                "metadata": {"phone_number_id": "111"},
                "statuses": [{"id": "wamid.1", "status": "delivered"}]
            }}]}]
        });
        let event = extract_value(&statuses);
        assert_eq!(event.channel_id.as_deref(), Some("111"));
        assert_eq!(event.sender_id, None);
        assert_eq!(event.message_count, 0);
    }

    #[test]
    fn test_extract_is_total() {
        let inputs = [
            json!(null),
            json!(42),
            json!("entry"),
            json!([]),
            json!({}),
            json!({"entry": null}),
            json!({"entry": "nope"}),
            json!({"entry": []}),
            json!({"entry": [null]}),
            json!({"entry": [{"changes": {"value": 1}}]}),
            json!({"entry": [{"changes": [{"value": []}]}]}),
            json!({"entry": [{"changes": [{"value": {"metadata": "x", "messages": 3}}]}]}),
            json!({"entry": [{"changes": [{"value": {"messages": [null, 1, "x"]}}]}]}),
        ];

        for input in inputs {
            let event = extract_value(&input);
            assert_eq!(event.channel_id, None, "input {}", input);
            assert_eq!(event.sender_id, None, "input {}", input);
            assert_eq!(event.message_count, 0, "input {}", input);
        }
    }

    #[test]
    fn test_bad_sibling_does_not_hide_good_fields() {
        let mixed = json!({
            "object": 5,
            "entry": [{
                "id": {"nested": true},
                "changes": [{
                    "field": ["messages"],
                    "value": {
                        "metadata": {"phone_number_id": "111", "display_phone_number": false},
                        "messages": [
                            "garbage",
                            {"from": "549111", "type": "text", "text": "not an object"}
                        ]
                    }
                }]
            }]
        });

        let event = extract_value(&mixed);
        assert_eq!(event.object, None);
        assert_eq!(event.field, None);
        assert_eq!(event.channel_id.as_deref(), Some("111"));
        assert_eq!(event.sender_id.as_deref(), Some("549111"));
        assert_eq!(event.message_count, 1);
        assert_eq!(event.messages[0].text.as_deref(), Some("text"));
    }
}
