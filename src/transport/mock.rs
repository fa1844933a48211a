//! Scripted in-memory broker used by the unit tests.

use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::watch;
use tokio::time::Instant;

use super::{BrokerChannel, BrokerConnection, PublishProperties, Transport};
use crate::utils::error::{TransportError, TransportResult};

#[derive(Debug, Clone)]
pub(crate) struct Published {
    pub exchange: String,
    pub routing_key: String,
    pub body: Vec<u8>,
    pub properties: PublishProperties,
}

#[derive(Default)]
struct Script {
    connect_failures: u32,
    channel_failures: u32,
    declare_failures: u32,
    publish_failures: u32,
    channel_hangs: u32,
    declare_hangs: u32,
    publish_hangs: u32,
    connect_times: Vec<Instant>,
    connections: Vec<Arc<MockConnection>>,
    channels: Vec<Arc<MockChannel>>,
    declared: Vec<String>,
    published: Vec<Published>,
    publish_attempts: u32,
}

/// Cheap to clone; all clones share one script.
#[derive(Clone, Default)]
pub(crate) struct MockBroker {
    script: Arc<Mutex<Script>>,
}

impl MockBroker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_connects(&self, n: u32) {
        self.script.lock().unwrap().connect_failures = n;
    }

    pub fn fail_channels(&self, n: u32) {
        self.script.lock().unwrap().channel_failures = n;
    }

    pub fn fail_declares(&self, n: u32) {
        self.script.lock().unwrap().declare_failures = n;
    }

    pub fn fail_publishes(&self, n: u32) {
        self.script.lock().unwrap().publish_failures = n;
    }

    /// The next `n` channel opens never complete.
    pub fn hang_channels(&self, n: u32) {
        self.script.lock().unwrap().channel_hangs = n;
    }

    pub fn hang_declares(&self, n: u32) {
        self.script.lock().unwrap().declare_hangs = n;
    }

    pub fn hang_publishes(&self, n: u32) {
        self.script.lock().unwrap().publish_hangs = n;
    }

    pub fn connect_attempts(&self) -> usize {
        self.script.lock().unwrap().connect_times.len()
    }

    pub fn connect_times(&self) -> Vec<Instant> {
        self.script.lock().unwrap().connect_times.clone()
    }

    pub fn connections(&self) -> Vec<Arc<MockConnection>> {
        self.script.lock().unwrap().connections.clone()
    }

    pub fn channels(&self) -> Vec<Arc<MockChannel>> {
        self.script.lock().unwrap().channels.clone()
    }

    pub fn declared(&self) -> Vec<String> {
        self.script.lock().unwrap().declared.clone()
    }

    pub fn published(&self) -> Vec<Published> {
        self.script.lock().unwrap().published.clone()
    }

    pub fn publish_attempts(&self) -> u32 {
        self.script.lock().unwrap().publish_attempts
    }

    /// Simulates the broker dropping the most recent connection.
    pub fn drop_connection(&self, reason: &str) {
        if let Some(conn) = self.script.lock().unwrap().connections.last() {
            conn.lost.send_replace(Some(reason.to_string()));
        }
    }

    /// Simulates the broker closing the most recent channel while its
    /// connection stays up.
    pub fn close_channel_remotely(&self) {
        if let Some(channel) = self.script.lock().unwrap().channels.last() {
            channel.remotely_closed.store(true, Ordering::SeqCst);
        }
    }

    /// Decrements `counter` if positive and reports whether it was.
    fn take_failure(counter: &mut u32) -> bool {
        if *counter > 0 {
            *counter -= 1;
            true
        } else {
            false
        }
    }
}

#[async_trait]
impl Transport for MockBroker {
    async fn connect(&self, _url: &str) -> TransportResult<Arc<dyn BrokerConnection>> {
        let mut script = self.script.lock().unwrap();
        script.connect_times.push(Instant::now());
        if Self::take_failure(&mut script.connect_failures) {
            return Err(TransportError::Other("connection refused".into()));
        }

        let (lost, _) = watch::channel(None);
        let conn = Arc::new(MockConnection {
            broker: self.clone(),
            lost,
            close_calls: AtomicU32::new(0),
        });
        script.connections.push(conn.clone());
        Ok(conn)
    }
}

pub(crate) struct MockConnection {
    broker: MockBroker,
    lost: watch::Sender<Option<String>>,
    close_calls: AtomicU32,
}

impl MockConnection {
    pub fn close_calls(&self) -> u32 {
        self.close_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl BrokerConnection for MockConnection {
    async fn open_channel(&self) -> TransportResult<Arc<dyn BrokerChannel>> {
        let hang = MockBroker::take_failure(&mut self.broker.script.lock().unwrap().channel_hangs);
        if hang {
            return std::future::pending().await;
        }

        let mut script = self.broker.script.lock().unwrap();
        if MockBroker::take_failure(&mut script.channel_failures) {
            return Err(TransportError::Other("channel open refused".into()));
        }

        let channel = Arc::new(MockChannel {
            broker: self.broker.clone(),
            lost: self.lost.subscribe(),
            remotely_closed: AtomicBool::new(false),
            close_calls: AtomicU32::new(0),
        });
        script.channels.push(channel.clone());
        Ok(channel)
    }

    async fn closed(&self) -> String {
        let mut rx = self.lost.subscribe();
        let reason = match rx.wait_for(Option::is_some).await {
            Ok(reason) => reason.clone().unwrap_or_default(),
            Err(_) => String::new(),
        };
        reason
    }

    async fn close(&self) -> TransportResult<()> {
        self.close_calls.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

pub(crate) struct MockChannel {
    broker: MockBroker,
    lost: watch::Receiver<Option<String>>,
    remotely_closed: AtomicBool,
    close_calls: AtomicU32,
}

impl MockChannel {
    pub fn close_calls(&self) -> u32 {
        self.close_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl BrokerChannel for MockChannel {
    async fn declare_topic_exchange(&self, name: &str) -> TransportResult<()> {
        let hang = MockBroker::take_failure(&mut self.broker.script.lock().unwrap().declare_hangs);
        if hang {
            return std::future::pending().await;
        }

        let mut script = self.broker.script.lock().unwrap();
        if MockBroker::take_failure(&mut script.declare_failures) {
            return Err(TransportError::Other("access refused".into()));
        }
        script.declared.push(name.to_string());
        Ok(())
    }

    async fn publish(
        &self,
        exchange: &str,
        routing_key: &str,
        body: &[u8],
        properties: &PublishProperties,
    ) -> TransportResult<()> {
        let hang = {
            let mut script = self.broker.script.lock().unwrap();
            script.publish_attempts += 1;
            MockBroker::take_failure(&mut script.publish_hangs)
        };
        if hang {
            return std::future::pending().await;
        }

        let mut script = self.broker.script.lock().unwrap();
        if self.close_calls() > 0
            || self.remotely_closed.load(Ordering::SeqCst)
            || self.lost.borrow().is_some()
        {
            return Err(TransportError::ChannelClosed);
        }
        if MockBroker::take_failure(&mut script.publish_failures) {
            return Err(TransportError::Other("write failed".into()));
        }

        script.published.push(Published {
            exchange: exchange.to_string(),
            routing_key: routing_key.to_string(),
            body: body.to_vec(),
            properties: properties.clone(),
        });
        Ok(())
    }

    async fn close(&self) -> TransportResult<()> {
        self.close_calls.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}
