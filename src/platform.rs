use crate::core::config::PlatformConfig;
use crate::core::errors::PlatformError;
use crate::core::kernel::ws::{Outbound, TungsteniteLink, WireTransport};
use crate::core::kernel::LinkState;
use crate::protocol::channel::{channel_frame_id, Channel};
use crate::protocol::event::{event_frame_name, Event};
use crate::protocol::value::Value;
use std::collections::HashMap;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, warn};

/// Name of the venue's subscription-confirmation event.
const SUBSCRIBED_EVENT: &str = "subscribed";
/// Name of the venue's unsubscription-confirmation event.
const UNSUBSCRIBED_EVENT: &str = "unsubscribed";

/// One venue connection: the registered Events and Channels, inbound
/// routing, and the subscription state machine, all driven cooperatively
/// through [`service`](Self::service).
pub struct Platform<T: WireTransport = TungsteniteLink> {
    config: PlatformConfig,
    events: HashMap<String, Event>,
    channels: HashMap<String, Channel>,
    link: T,
}

impl Platform<TungsteniteLink> {
    pub fn new(config: PlatformConfig) -> Self {
        let link = TungsteniteLink::new(&config, Outbound::new());
        Self::with_transport(config, link)
    }
}

impl<T: WireTransport> Platform<T> {
    /// Build a platform over a custom transport.
    pub fn with_transport(config: PlatformConfig, link: T) -> Self {
        debug!(
            host = %config.host,
            port = config.port,
            path = %config.path,
            tls = config.use_tls,
            "new platform"
        );
        Self {
            config,
            events: HashMap::new(),
            channels: HashMap::new(),
            link,
        }
    }

    pub fn config(&self) -> &PlatformConfig {
        &self.config
    }

    pub fn transport(&self) -> &T {
        &self.link
    }

    /// Register an event; replies carrying its name will be routed to it.
    pub fn add_event(&mut self, event: Event) {
        debug!(event = %event.name(), "add event");
        self.events.insert(event.name().to_string(), event);
    }

    /// Unregister an event, returning it.
    pub fn remove_event(&mut self, name: &str) -> Option<Event> {
        debug!(event = name, "remove event");
        self.events.remove(name)
    }

    pub fn event(&self, name: &str) -> Option<&Event> {
        self.events.get(name)
    }

    pub fn add_channel(&mut self, channel: Channel) {
        debug!(channel = %channel.name(), "add channel");
        self.channels.insert(channel.name().to_string(), channel);
    }

    pub fn remove_channel(&mut self, name: &str) -> Option<Channel> {
        debug!(channel = name, "remove channel");
        self.channels.remove(name)
    }

    pub fn channel(&self, name: &str) -> Option<&Channel> {
        self.channels.get(name)
    }

    pub fn channels(&self) -> impl Iterator<Item = &Channel> {
        self.channels.values()
    }

    /// A handle to the pending-write queue, for sends from inside callbacks.
    pub fn outbound(&self) -> Outbound {
        self.link.outbound()
    }

    /// Enqueue one raw outbound frame; written on the next writable signal.
    pub fn send(&self, frame: String) {
        debug!(len = frame.len(), "queueing frame");
        self.link.send(frame);
    }

    /// Serialize an event's params and enqueue the frame. The event does not
    /// have to be registered; registration only routes its reply.
    pub fn emit_event(&self, event: &Event) {
        debug!(event = %event.name(), "emitting event");
        self.send(event.to_frame());
    }

    pub async fn connect(&mut self) -> Result<(), PlatformError> {
        debug!("connecting");
        self.link.connect().await
    }

    pub async fn disconnect(&mut self) -> Result<(), PlatformError> {
        debug!("disconnecting");
        self.link.disconnect().await
    }

    /// Drive the link for up to `timeout`.
    ///
    /// Connects first when the link is down. Queued writes are flushed
    /// before each read, and one inbound frame is fully routed before the
    /// next is read. A drop detected mid-slice goes back through the
    /// bounded reconnect.
    pub async fn service(&mut self, timeout: Duration) -> Result<(), PlatformError> {
        if !self.link.is_established() {
            self.link.connect().await?;
        }

        let deadline = Instant::now() + timeout;
        loop {
            self.link.flush().await?;
            let now = Instant::now();
            if now >= deadline {
                break;
            }
            match self.link.next_frame(deadline - now).await? {
                Some(frame) => {
                    if let Err(e) = self.receive(&frame) {
                        debug!(error = %e, "inbound frame dropped");
                    }
                }
                None => {
                    if matches!(self.link.state(), LinkState::Closed | LinkState::Error) {
                        self.link.connect().await?;
                    } else {
                        break; // slice elapsed
                    }
                }
            }
        }
        self.link.flush().await
    }

    /// Route one raw inbound frame.
    ///
    /// Object frames carrying an `"event"` key go to the registered event of
    /// that name; `[<id>, ...]` frames go to the channel with that id.
    /// Anything else is dropped with a diagnostic.
    pub fn receive(&mut self, text: &str) -> Result<(), PlatformError> {
        if let Some(name) = event_frame_name(text) {
            let Some(mut event) = self.events.remove(name) else {
                debug!(event = name, "unregistered event frame dropped");
                return Ok(());
            };
            debug!(event = %event.name(), "received event");
            if let Err(e) = event.update_reply(text) {
                debug!(event = %event.name(), error = %e, "reply fill failed");
            }
            if event.name() == SUBSCRIBED_EVENT {
                self.correlate_subscription(&mut event);
            } else if event.name() == UNSUBSCRIBED_EVENT {
                self.correlate_unsubscription(&mut event);
            } else if let Some(mut hook) = event.take_callback() {
                hook(&event);
                event.put_callback(hook);
            }
            self.events.insert(event.name().to_string(), event);
            Ok(())
        } else if let Some(id) = channel_frame_id(text) {
            match self.channels.values_mut().find(|ch| ch.id() == id) {
                Some(channel) => {
                    channel.update_inbuff(text);
                    channel.wakeup()
                }
                None => {
                    debug!(id, "frame for unknown channel dropped");
                    Ok(())
                }
            }
        } else {
            debug!("unrecognized frame dropped: >>>{text}<<<");
            Ok(())
        }
    }

    /// Find which pending channel a confirmation belongs to and flip it to
    /// subscribed. The confirmation reply is reset afterwards so generated
    /// scratch fields do not leak into the next confirmation.
    fn correlate_subscription(&mut self, event: &mut Event) {
        let matched = self.channels.values_mut().find(|ch| ch.verify(event));
        match matched {
            Some(channel) => {
                let id = event
                    .reply()
                    .and_then(|r| r.get("chanId"))
                    .and_then(Value::as_u64)
                    .unwrap_or(0);
                channel.set_id(id);
                channel.set_subscribed(true);
                channel.update_heartbeat();
                debug!(channel = %channel.name(), id, "subscription confirmed");
            }
            None => debug!("confirmation matches no registered channel, dropped"),
        }
        event.reset_reply();
    }

    /// Drop the flag and id of the channel a released id belonged to.
    fn correlate_unsubscription(&mut self, event: &mut Event) {
        let id = event
            .reply()
            .and_then(|r| r.get("chanId"))
            .and_then(Value::as_u64);
        match id.and_then(|id| self.channels.values_mut().find(|ch| ch.id() == id)) {
            Some(channel) => {
                channel.set_subscribed(false);
                channel.set_id(0);
                debug!(channel = %channel.name(), "unsubscription confirmed");
            }
            None => debug!("unsubscription confirmation matches no channel, dropped"),
        }
        event.reset_reply();
    }

    fn ensure_confirmation_event(&mut self) {
        if self.events.contains_key(SUBSCRIBED_EVENT) {
            return;
        }
        let mut event = Event::new(SUBSCRIBED_EVENT);
        event.add_reply(Value::str("channel", ""));
        event.add_reply(Value::unsigned("chanId", 0));
        self.events.insert(SUBSCRIBED_EVENT.to_string(), event);
    }

    fn ensure_unsubscribe_confirmation_event(&mut self) {
        if self.events.contains_key(UNSUBSCRIBED_EVENT) {
            return;
        }
        let mut event = Event::new(UNSUBSCRIBED_EVENT);
        event.add_reply(Value::unsigned("chanId", 0));
        event.add_reply(Value::str("status", ""));
        self.events.insert(UNSUBSCRIBED_EVENT.to_string(), event);
    }

    /// Send a channel's subscribe event and wait, within the retry budget,
    /// for the venue's confirmation to flip it to subscribed.
    pub async fn subscribe_channel(&mut self, name: &str) -> Result<(), PlatformError> {
        let channel = self.channels.get(name).ok_or_else(|| {
            PlatformError::InvalidArgument(format!("unknown channel '{name}'"))
        })?;
        if channel.is_subscribed() {
            return Err(PlatformError::InvalidArgument(format!(
                "channel '{name}' already subscribed"
            )));
        }
        let Some(subscribe) = channel.subscribe_event() else {
            return Err(PlatformError::InvalidArgument(format!(
                "channel '{name}' has no subscribe event"
            )));
        };
        let frame = subscribe.to_frame();

        self.ensure_confirmation_event();
        debug!(channel = name, "subscribing");
        self.send(frame);

        let timeout = Duration::from_millis(self.config.service_timeout_ms);
        for _ in 0..self.config.subscribe_retries {
            self.service(timeout).await?;
            if self.channels.get(name).is_some_and(Channel::is_subscribed) {
                return Ok(());
            }
        }
        Err(PlatformError::SubscriptionTimeout(name.to_string()))
    }

    /// Subscribe every channel that is not subscribed yet.
    pub async fn subscribe_channels(&mut self) -> Result<(), PlatformError> {
        let pending: Vec<String> = self
            .channels
            .values()
            .filter(|ch| !ch.is_subscribed())
            .map(|ch| ch.name().to_string())
            .collect();
        let total = pending.len();

        let mut failed = 0;
        for name in pending {
            // a confirmation may arrive while another channel is waited on
            if self.channels.get(&name).is_some_and(Channel::is_subscribed) {
                continue;
            }
            if let Err(e) = self.subscribe_channel(&name).await {
                warn!(channel = %name, error = %e, "subscription failed");
                failed += 1;
            }
        }

        if failed > 0 {
            Err(PlatformError::SubscriptionsFailed { failed, total })
        } else {
            Ok(())
        }
    }

    /// Ask the venue to release a channel's id and wait, within the retry
    /// budget, for the confirmation to clear its subscribed flag.
    pub async fn unsubscribe_channel(&mut self, name: &str) -> Result<(), PlatformError> {
        let channel = self.channels.get(name).ok_or_else(|| {
            PlatformError::InvalidArgument(format!("unknown channel '{name}'"))
        })?;
        if !channel.is_subscribed() {
            return Err(PlatformError::InvalidArgument(format!(
                "channel '{name}' is not subscribed"
            )));
        }
        let mut unsubscribe = Event::new("unsubscribe");
        unsubscribe.add_value(Value::unsigned("chanId", channel.id()));
        let frame = unsubscribe.to_frame();

        self.ensure_unsubscribe_confirmation_event();
        debug!(channel = name, "unsubscribing");
        self.send(frame);

        let timeout = Duration::from_millis(self.config.service_timeout_ms);
        for _ in 0..self.config.subscribe_retries {
            self.service(timeout).await?;
            if !self.channels.get(name).is_some_and(Channel::is_subscribed) {
                return Ok(());
            }
        }
        Err(PlatformError::SubscriptionTimeout(name.to_string()))
    }

    /// Unsubscribe every channel that is currently subscribed.
    pub async fn unsubscribe_channels(&mut self) -> Result<(), PlatformError> {
        let active: Vec<String> = self
            .channels
            .values()
            .filter(|ch| ch.is_subscribed())
            .map(|ch| ch.name().to_string())
            .collect();
        let total = active.len();

        let mut failed = 0;
        for name in active {
            if !self.channels.get(&name).is_some_and(Channel::is_subscribed) {
                continue;
            }
            if let Err(e) = self.unsubscribe_channel(&name).await {
                warn!(channel = %name, error = %e, "unsubscription failed");
                failed += 1;
            }
        }

        if failed > 0 {
            Err(PlatformError::SubscriptionsFailed { failed, total })
        } else {
            Ok(())
        }
    }

}
