use crate::core::errors::PlatformError;
use crate::protocol::array::ValueArray;
use crate::protocol::value::Value;
use tracing::debug;

/// Callback invoked after an event's reply fields have been updated from an
/// inbound frame.
pub type EventHook = Box<dyn FnMut(&Event) + Send>;

/// A named request/reply message pair.
///
/// The outbound side is a set of parameter values serialized into
/// `{ "event": "<name>", ... }`; the inbound side is a pre-declared reply
/// schema filled when a frame carrying this event name arrives.
pub struct Event {
    name: String,
    vals: ValueArray,
    reply: Option<ValueArray>,
    callback: Option<EventHook>,
}

impl std::fmt::Debug for Event {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Event")
            .field("name", &self.name)
            .field("vals", &self.vals)
            .field("reply", &self.reply)
            .field("callback", &self.callback.is_some())
            .finish()
    }
}

impl Event {
    pub fn new(name: &str) -> Self {
        debug!(name, "new event");
        Self {
            name: name.to_string(),
            vals: ValueArray::new(),
            reply: None,
            callback: None,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Add an outbound parameter.
    pub fn add_value(&mut self, value: Value) {
        debug!(event = %self.name, value = %value.name(), "add value");
        self.vals.add(value);
    }

    /// Remove an outbound parameter, returning it.
    pub fn remove_value(&mut self, name: &str) -> Option<Value> {
        self.vals.remove(name)
    }

    pub fn values(&self) -> &ValueArray {
        &self.vals
    }

    /// Declare one inbound reply field. The reply schema is allocated on
    /// first use.
    pub fn add_reply(&mut self, value: Value) {
        debug!(event = %self.name, value = %value.name(), "add reply");
        self.reply
            .get_or_insert_with(|| ValueArray::with_capacity(3))
            .add(value);
    }

    /// Remove a reply field, returning it.
    pub fn remove_reply(&mut self, name: &str) -> Option<Value> {
        self.reply.as_mut()?.remove(name)
    }

    pub fn reply(&self) -> Option<&ValueArray> {
        self.reply.as_ref()
    }

    /// Parse an inbound object frame into the reply schema.
    ///
    /// With no schema declared, an empty one is created and every wire key
    /// lands as a generated field.
    pub fn update_reply(&mut self, text: &str) -> Result<(), PlatformError> {
        debug!(event = %self.name, "updating reply");
        self.reply
            .get_or_insert_with(ValueArray::new)
            .fill_from_object(text)
    }

    /// Purge generated reply fields, zero the declared ones.
    pub fn reset_reply(&mut self) {
        debug!(event = %self.name, "resetting reply");
        if let Some(reply) = self.reply.as_mut() {
            reply.reset();
        }
    }

    pub fn set_callback(&mut self, hook: EventHook) {
        debug!(event = %self.name, "setting callback");
        self.callback = Some(hook);
    }

    pub(crate) fn take_callback(&mut self) -> Option<EventHook> {
        self.callback.take()
    }

    pub(crate) fn put_callback(&mut self, hook: EventHook) {
        self.callback = Some(hook);
    }

    /// Outbound wire form: `{ "event": "<name>"[, <params...>] }`.
    pub fn to_frame(&self) -> String {
        let mut out = format!("{{ \"event\": \"{}\"", self.name);
        if !self.vals.is_empty() {
            out.push_str(", ");
            out.push_str(&self.vals.to_wire());
        }
        out.push_str(" }");
        out
    }
}

/// Does `text` open as `{ "event": "<name>", ... }`? Returns the name span.
pub fn event_frame_name(text: &str) -> Option<&str> {
    let t = text.trim_start();
    let t = t.strip_prefix('{')?.trim_start();
    let t = t.strip_prefix("\"event\"")?.trim_start();
    let t = t.strip_prefix(':')?.trim_start();
    let t = t.strip_prefix('"')?;
    let end = t.find('"')?;
    (end > 0).then(|| &t[..end])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_to_frame_without_params() {
        let ev = Event::new("conf");
        assert_eq!(ev.to_frame(), r#"{ "event": "conf" }"#);
    }

    #[test]
    fn test_to_frame_with_params() {
        let mut ev = Event::new("ping");
        ev.add_value(Value::unsigned("cid", 1234));
        assert_eq!(ev.to_frame(), r#"{ "event": "ping", "cid": 1234 }"#);
    }

    #[test]
    fn test_emit_roundtrip() {
        let mut ev = Event::new("subscribe");
        ev.add_value(Value::str("channel", "ticker"));
        ev.add_value(Value::unsigned("cid", 9));
        let frame = ev.to_frame();

        let mut schema = ValueArray::new();
        schema.add(Value::str("channel", ""));
        schema.add(Value::unsigned("cid", 0));
        schema.fill_from_object(&frame).unwrap();

        // the event name arrives as a generated field, params keep fidelity
        assert_eq!(schema.get("event").unwrap().as_str(), Some("subscribe"));
        assert_eq!(schema.get("channel").unwrap().as_str(), Some("ticker"));
        assert_eq!(schema.get("cid").unwrap().as_u64(), Some(9));
    }

    #[test]
    fn test_update_and_reset_reply() {
        let mut ev = Event::new("pong");
        ev.add_reply(Value::unsigned("cid", 0));
        ev.update_reply(r#"{ "event": "pong", "cid": 77 }"#).unwrap();

        let reply = ev.reply().unwrap();
        assert_eq!(reply.get("cid").unwrap().as_u64(), Some(77));
        assert!(reply.get("event").unwrap().is_generated());

        ev.reset_reply();
        let reply = ev.reply().unwrap();
        assert!(reply.get("event").is_none());
        assert_eq!(reply.get("cid").unwrap().as_u64(), Some(0));
    }

    #[test]
    fn test_event_frame_name() {
        assert_eq!(
            event_frame_name(r#"{ "event": "subscribed", "chanId": 3 }"#),
            Some("subscribed")
        );
        assert_eq!(event_frame_name(r#"  {"event":"pong"}"#), Some("pong"));
        assert_eq!(event_frame_name(r#"{ "other": 1 }"#), None);
        assert_eq!(event_frame_name("[17,\"hb\"]"), None);
        assert_eq!(event_frame_name(r#"{ "event": "" }"#), None);
    }
}
