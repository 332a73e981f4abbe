use crate::core::errors::PlatformError;
use crate::protocol::array::ValueArray;
use crate::protocol::event::Event;
use crate::protocol::value::Value;
use std::time::Instant;
use tracing::debug;

/// Callback invoked once per reply segment after the reply fields have been
/// filled.
pub type ChannelHook = Box<dyn FnMut(&Channel) + Send>;

/// Predicate deciding whether a confirmation event belongs to a channel.
pub type VerifyFn = Box<dyn Fn(&Channel, &Event) -> bool + Send>;

/// Upper bound on the transient reply-type tag ("te", "tu", ...).
const REPLY_TYPE_MAX: usize = 16;

/// A persistent, venue-multiplexed subscription stream.
///
/// The venue assigns the numeric id when it confirms the subscription; until
/// then the id is 0 and `subscribed` is false. Inbound frames for the id are
/// buffered verbatim and dispatched by [`wakeup`](Self::wakeup).
pub struct Channel {
    name: String,
    symbol: String,
    id: u64,
    subscribed: bool,
    last_heartbeat: Option<Instant>,
    reply: ValueArray,
    inbuf: String,
    reply_type: Option<String>,
    verify: Option<VerifyFn>,
    callback: Option<ChannelHook>,
    subscribe: Option<Event>,
}

impl std::fmt::Debug for Channel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Channel")
            .field("name", &self.name)
            .field("symbol", &self.symbol)
            .field("id", &self.id)
            .field("subscribed", &self.subscribed)
            .field("reply", &self.reply)
            .finish_non_exhaustive()
    }
}

impl Channel {
    pub fn new(name: &str, symbol: &str) -> Self {
        debug!(name, "new channel");
        Self {
            name: name.to_string(),
            symbol: symbol.to_string(),
            id: 0,
            subscribed: false,
            last_heartbeat: None,
            reply: ValueArray::with_capacity(3),
            inbuf: String::new(),
            reply_type: None,
            verify: None,
            callback: None,
            subscribe: None,
        }
    }

    /// Ticker stream for one symbol, with the venue's funding-ticker reply
    /// schema and a matching subscribe event.
    pub fn ticker(symbol: &str) -> Self {
        let mut ev = Event::new("subscribe");
        ev.add_value(Value::str("channel", "ticker"));
        ev.add_value(Value::str("symbol", symbol));

        let mut ch = Self::new(&format!("ticker:{symbol}"), symbol);
        ch.set_subscribe_event(ev);
        ch.set_verify(kind_verify("ticker"));

        ch.add_reply(Value::float("FRR", 0.0));
        ch.add_reply(Value::float("BID", 0.0));
        ch.add_reply(Value::unsigned("BID_PERIOD", 0));
        ch.add_reply(Value::float("BID_SIZE", 0.0));
        ch.add_reply(Value::float("ASK", 0.0));
        ch.add_reply(Value::unsigned("ASK_PERIOD", 0));
        ch.add_reply(Value::float("ASK_SIZE", 0.0));
        ch.add_reply(Value::float("DAILY_CHANGE", 0.0));
        ch.add_reply(Value::float("DAILY_CHANGE_PERC", 0.0));
        ch.add_reply(Value::float("LAST_PRICE", 0.0));
        ch.add_reply(Value::float("VOLUME", 0.0));
        ch.add_reply(Value::float("HIGH", 0.0));
        ch.add_reply(Value::float("LOW", 0.0));
        ch
    }

    /// Trades stream for one symbol.
    pub fn trades(symbol: &str) -> Self {
        let mut ev = Event::new("subscribe");
        ev.add_value(Value::str("channel", "trades"));
        ev.add_value(Value::str("symbol", symbol));

        let mut ch = Self::new(&format!("trades:{symbol}"), symbol);
        ch.set_subscribe_event(ev);
        ch.set_verify(kind_verify("trades"));

        ch.add_reply(Value::unsigned("ID", 0));
        ch.add_reply(Value::unsigned("MTS", 0));
        ch.add_reply(Value::float("AMOUNT", 0.0));
        ch.add_reply(Value::float("PRICE", 0.0));
        ch
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn symbol(&self) -> &str {
        &self.symbol
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn set_id(&mut self, id: u64) {
        self.id = id;
    }

    pub fn is_subscribed(&self) -> bool {
        self.subscribed
    }

    pub fn set_subscribed(&mut self, subscribed: bool) {
        debug!(channel = %self.name, subscribed, "subscribed status change");
        self.subscribed = subscribed;
    }

    pub fn update_heartbeat(&mut self) {
        debug!(channel = %self.name, "update heartbeat");
        self.last_heartbeat = Some(Instant::now());
    }

    pub fn heartbeat(&self) -> Option<Instant> {
        self.last_heartbeat
    }

    /// Type tag of the last dispatched reply frame ("te", "tu", ...), if the
    /// frame carried one.
    pub fn reply_type(&self) -> Option<&str> {
        self.reply_type.as_deref()
    }

    pub fn set_subscribe_event(&mut self, event: Event) {
        debug!(channel = %self.name, event = %event.name(), "set subscribe event");
        self.subscribe = Some(event);
    }

    pub fn subscribe_event(&self) -> Option<&Event> {
        self.subscribe.as_ref()
    }

    pub fn set_verify(&mut self, verify: VerifyFn) {
        self.verify = Some(verify);
    }

    /// Is this confirmation event ours? False without a predicate.
    pub fn verify(&self, event: &Event) -> bool {
        self.verify.as_ref().is_some_and(|f| f(self, event))
    }

    pub fn set_callback(&mut self, hook: ChannelHook) {
        self.callback = Some(hook);
    }

    pub fn add_reply(&mut self, value: Value) {
        debug!(channel = %self.name, value = %value.name(), "add reply");
        self.reply.add(value);
    }

    pub fn remove_reply(&mut self, name: &str) -> Option<Value> {
        self.reply.remove(name)
    }

    pub fn reply(&self) -> &ValueArray {
        &self.reply
    }

    /// Copy one raw inbound frame into the channel buffer. The buffer only
    /// grows; capacity is kept across frames. Single-writer: frames for one
    /// channel must be fed from one task at a time.
    pub fn update_inbuff(&mut self, text: &str) {
        self.inbuf.clear();
        self.inbuf.push_str(text);
    }

    /// Dispatch the buffered frame.
    ///
    /// Recognizes the venue heartbeat `[<id>, "hb"]`, an optional quoted
    /// type tag, and one or more positional reply segments; the reply
    /// callback fires once per segment, in order. The buffer is cleared in
    /// every case; the first fill error is returned.
    pub fn wakeup(&mut self) -> Result<(), PlatformError> {
        if self.inbuf.is_empty() {
            return Ok(());
        }
        let buf = std::mem::take(&mut self.inbuf);
        let rc = self.dispatch(&buf);
        self.inbuf = buf; // hand the grown capacity back
        self.inbuf.clear();
        rc
    }

    fn dispatch(&mut self, buf: &str) -> Result<(), PlatformError> {
        let bytes = buf.as_bytes();

        // skip the `[<chanId>` prefix
        let Some(comma) = buf.find(',') else {
            debug!(channel = %self.name, "frame without payload, discarding");
            return Ok(());
        };
        let mut pos = comma + 1;
        while pos < bytes.len() && bytes[pos].is_ascii_whitespace() {
            pos += 1;
        }

        if bytes.get(pos) == Some(&b'"') {
            // heartbeat, or a quoted reply-type tag
            let start = pos + 1;
            let Some(off) = buf[start..].find('"') else {
                debug!(channel = %self.name, "unterminated type tag, discarding");
                return Ok(());
            };
            let tag = &buf[start..start + off];
            pos = start + off + 1;
            while pos < bytes.len() && bytes[pos].is_ascii_whitespace() {
                pos += 1;
            }

            if tag == "hb" && bytes.get(pos) == Some(&b']') {
                self.update_heartbeat();
                return Ok(());
            }

            debug!(channel = %self.name, tag, "reply type");
            self.reply_type = Some(tag.chars().take(REPLY_TYPE_MAX).collect());
            if bytes.get(pos) == Some(&b',') {
                pos += 1;
            }
            while pos < bytes.len() && bytes[pos].is_ascii_whitespace() {
                pos += 1;
            }
        }

        // one or more bracketed segments, batched in a single frame
        while bytes.get(pos) == Some(&b'[') {
            let terminated = match self.reply.fill_positional(&buf[pos..]) {
                Ok(Some(next)) => {
                    pos += next;
                    true
                }
                Ok(None) => false,
                Err(e) => return Err(e),
            };

            self.invoke_callback();
            if !terminated {
                break;
            }
            while pos < bytes.len() && bytes[pos].is_ascii_whitespace() {
                pos += 1;
            }
            if bytes.get(pos) == Some(&b',') {
                pos += 1;
            }
            while pos < bytes.len() && bytes[pos].is_ascii_whitespace() {
                pos += 1;
            }
        }

        Ok(())
    }

    fn invoke_callback(&mut self) {
        if let Some(mut hook) = self.callback.take() {
            hook(self);
            self.callback = Some(hook);
        }
    }
}

fn kind_verify(kind: &'static str) -> VerifyFn {
    Box::new(move |ch, ev| {
        let Some(reply) = ev.reply() else {
            return false;
        };
        reply.get("channel").and_then(Value::as_str) == Some(kind)
            && reply.get("symbol").and_then(Value::as_str) == Some(ch.symbol())
    })
}

/// Does `text` open as `[<chanId>, ...`? Returns the channel id.
pub fn channel_frame_id(text: &str) -> Option<u64> {
    let t = text.trim_start().strip_prefix('[')?.trim_start();
    let digits = t.len() - t.trim_start_matches(|c: char| c.is_ascii_digit()).len();
    if digits == 0 {
        return None;
    }
    let id = t[..digits].parse().ok()?;
    t[digits..].trim_start().starts_with(',').then_some(id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn three_field_channel() -> Channel {
        let mut ch = Channel::new("test:XRPUSD", "XRPUSD");
        ch.add_reply(Value::unsigned("A", 0));
        ch.add_reply(Value::unsigned("B", 0));
        ch.add_reply(Value::float("C", 0.0));
        ch
    }

    #[test]
    fn test_wakeup_empty_buffer_is_noop() {
        let mut ch = three_field_channel();
        ch.wakeup().unwrap();
        assert!(ch.heartbeat().is_none());
    }

    #[test]
    fn test_wakeup_heartbeat() {
        let mut ch = three_field_channel();
        ch.update_inbuff("[1337,\"hb\"]");
        ch.wakeup().unwrap();
        assert!(ch.heartbeat().is_some());
        // no reply-schema mutation
        assert_eq!(ch.reply().get("A").unwrap().as_u64(), Some(0));
        assert_eq!(ch.reply().get("C").unwrap().as_f64(), Some(0.0));
    }

    #[test]
    fn test_wakeup_positional_fill_and_single_callback() {
        let hits = Arc::new(AtomicUsize::new(0));
        let seen = hits.clone();

        let mut ch = three_field_channel();
        ch.set_callback(Box::new(move |ch| {
            seen.fetch_add(1, Ordering::SeqCst);
            assert_eq!(ch.reply().get("C").unwrap().as_f64(), Some(3.5));
        }));

        ch.update_inbuff("[1337,[1,2,3.5]]");
        ch.wakeup().unwrap();

        assert_eq!(hits.load(Ordering::SeqCst), 1);
        assert_eq!(ch.reply().get("A").unwrap().as_u64(), Some(1));
        assert_eq!(ch.reply().get("B").unwrap().as_u64(), Some(2));
    }

    #[test]
    fn test_wakeup_batched_segments_fire_in_order() {
        let ticks: Arc<std::sync::Mutex<Vec<u64>>> = Arc::default();
        let seen = ticks.clone();

        let mut ch = three_field_channel();
        ch.set_callback(Box::new(move |ch| {
            seen.lock().unwrap().push(ch.reply().get("A").unwrap().as_u64().unwrap());
        }));

        ch.update_inbuff("[1337,[1,2,3.5],[4,5,6.5]]");
        ch.wakeup().unwrap();

        assert_eq!(*ticks.lock().unwrap(), vec![1, 4]);
    }

    #[test]
    fn test_wakeup_undersized_segment_drops_siblings() {
        let hits = Arc::new(AtomicUsize::new(0));
        let seen = hits.clone();

        let mut ch = three_field_channel();
        ch.set_callback(Box::new(move |_| {
            seen.fetch_add(1, Ordering::SeqCst);
        }));

        // first segment is short of the schema: the fill is unterminated,
        // so the second segment never dispatches
        ch.update_inbuff("[1337,[1,2],[4,5,6.5]]");
        ch.wakeup().unwrap();

        assert_eq!(hits.load(Ordering::SeqCst), 1);
        assert_eq!(ch.reply().get("A").unwrap().as_u64(), Some(1));
        assert_eq!(ch.reply().get("C").unwrap().as_f64(), Some(0.0));
    }

    #[test]
    fn test_wakeup_typed_reply_sets_tag() {
        let mut ch = three_field_channel();
        ch.update_inbuff("[1337,\"te\",[7,8,9.5]]");
        ch.wakeup().unwrap();
        assert_eq!(ch.reply_type(), Some("te"));
        assert_eq!(ch.reply().get("A").unwrap().as_u64(), Some(7));
    }

    #[test]
    fn test_wakeup_frame_without_comma_is_discarded() {
        let mut ch = three_field_channel();
        ch.update_inbuff("[1337]");
        ch.wakeup().unwrap();
        assert_eq!(ch.reply().get("A").unwrap().as_u64(), Some(0));
    }

    #[test]
    fn test_ticker_constructor_schema() {
        let ch = Channel::ticker("XRPUSD");
        assert_eq!(ch.name(), "ticker:XRPUSD");
        assert_eq!(ch.symbol(), "XRPUSD");
        assert_eq!(ch.reply().len(), 13);
        assert!(!ch.is_subscribed());
        assert_eq!(ch.id(), 0);
        let sub = ch.subscribe_event().unwrap();
        assert_eq!(
            sub.to_frame(),
            r#"{ "event": "subscribe", "channel": "ticker", "symbol": "XRPUSD" }"#
        );
    }

    #[test]
    fn test_verify_matches_kind_and_symbol() {
        let ch = Channel::trades("BTCUSD");

        let mut ev = Event::new("subscribed");
        ev.add_reply(Value::str("channel", "trades"));
        ev.add_reply(Value::str("symbol", "BTCUSD"));
        assert!(ch.verify(&ev));

        let mut other = Event::new("subscribed");
        other.add_reply(Value::str("channel", "trades"));
        other.add_reply(Value::str("symbol", "ETHUSD"));
        assert!(!ch.verify(&other));

        let mut wrong_kind = Event::new("subscribed");
        wrong_kind.add_reply(Value::str("channel", "ticker"));
        wrong_kind.add_reply(Value::str("symbol", "BTCUSD"));
        assert!(!ch.verify(&wrong_kind));
    }

    #[test]
    fn test_channel_frame_id() {
        assert_eq!(channel_frame_id("[17, \"hb\"]"), Some(17));
        assert_eq!(channel_frame_id("  [ 42 , [1,2]]"), Some(42));
        assert_eq!(channel_frame_id("{ \"event\": \"x\" }"), None);
        assert_eq!(channel_frame_id("[notanid,1]"), None);
        assert_eq!(channel_frame_id("[17]"), None);
    }
}
