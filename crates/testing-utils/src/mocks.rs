//! Recording test doubles for the core traits
//!
//! Every mock is cheap to clone and shares its state between clones, so a
//! test can keep one handle while the code under test owns another.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use keeper_core::{
    models::{EventResult, Notification, ReplyEnvelope, ServiceAdvertisement, TaskDetail, TaskReceived},
    IntegrationEventHandler, KeeperError, KeeperResult, Mediator, MessageBus, ServiceDirectory,
};

/// A message recorded by [`MockMessageBus`]
#[derive(Debug, Clone, PartialEq)]
pub enum SentMessage {
    Task { destination: String, detail: TaskDetail },
    Reply { destination: String, envelope: ReplyEnvelope },
}

/// Mock implementation of MessageBus that records everything sent through it
#[derive(Clone, Default)]
pub struct MockMessageBus {
    sent: Arc<Mutex<Vec<SentMessage>>>,
    handlers: Arc<Mutex<HashMap<String, Arc<dyn IntegrationEventHandler>>>>,
    fail_publish: Arc<AtomicBool>,
}

impl MockMessageBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every publish and reply fail with a message queue error
    pub fn set_fail_publish(&self, fail: bool) {
        self.fail_publish.store(fail, Ordering::SeqCst);
    }

    pub fn sent(&self) -> Vec<SentMessage> {
        self.sent.lock().unwrap().clone()
    }

    pub fn published(&self) -> Vec<(String, TaskDetail)> {
        self.sent
            .lock()
            .unwrap()
            .iter()
            .filter_map(|m| match m {
                SentMessage::Task { destination, detail } => {
                    Some((destination.clone(), detail.clone()))
                }
                SentMessage::Reply { .. } => None,
            })
            .collect()
    }

    pub fn published_to(&self, destination: &str) -> Vec<TaskDetail> {
        self.published()
            .into_iter()
            .filter(|(d, _)| d == destination)
            .map(|(_, detail)| detail)
            .collect()
    }

    pub fn replies(&self) -> Vec<(String, ReplyEnvelope)> {
        self.sent
            .lock()
            .unwrap()
            .iter()
            .filter_map(|m| match m {
                SentMessage::Reply {
                    destination,
                    envelope,
                } => Some((destination.clone(), envelope.clone())),
                SentMessage::Task { .. } => None,
            })
            .collect()
    }

    pub fn clear(&self) {
        self.sent.lock().unwrap().clear();
    }

    pub fn subscribed_topics(&self) -> Vec<String> {
        let mut topics: Vec<String> = self.handlers.lock().unwrap().keys().cloned().collect();
        topics.sort();
        topics
    }

    /// Hand a raw body to the handler subscribed on `topic`
    pub async fn deliver(&self, topic: &str, body: &[u8]) -> KeeperResult<()> {
        let handler = self
            .handlers
            .lock()
            .unwrap()
            .get(topic)
            .cloned()
            .ok_or_else(|| KeeperError::MessageQueue(format!("no handler for {topic}")))?;
        handler.handle(topic, body).await
    }

    fn check_available(&self) -> KeeperResult<()> {
        if self.fail_publish.load(Ordering::SeqCst) {
            Err(KeeperError::MessageQueue("mock bus is down".to_string()))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl MessageBus for MockMessageBus {
    async fn publish(&self, destination: &str, detail: &TaskDetail) -> KeeperResult<()> {
        self.check_available()?;
        self.sent.lock().unwrap().push(SentMessage::Task {
            destination: destination.to_string(),
            detail: detail.clone(),
        });
        Ok(())
    }

    async fn reply(&self, destination: &str, envelope: &ReplyEnvelope) -> KeeperResult<()> {
        self.check_available()?;
        self.sent.lock().unwrap().push(SentMessage::Reply {
            destination: destination.to_string(),
            envelope: envelope.clone(),
        });
        Ok(())
    }

    async fn subscribe(
        &self,
        topic: &str,
        handler: Arc<dyn IntegrationEventHandler>,
    ) -> KeeperResult<()> {
        self.handlers
            .lock()
            .unwrap()
            .insert(topic.to_string(), handler);
        Ok(())
    }

    async fn unsubscribe(&self, topic: &str, handler_name: &str) -> KeeperResult<()> {
        let mut handlers = self.handlers.lock().unwrap();
        if handlers
            .get(topic)
            .is_some_and(|h| h.handler_name() == handler_name)
        {
            handlers.remove(topic);
        }
        Ok(())
    }

    async fn close(&self) -> KeeperResult<()> {
        Ok(())
    }
}

/// Mock implementation of ServiceDirectory backed by a plain map
#[derive(Clone, Default)]
pub struct MockServiceDirectory {
    services: Arc<Mutex<HashMap<String, ServiceAdvertisement>>>,
}

impl MockServiceDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_services(services: Vec<ServiceAdvertisement>) -> Self {
        let directory = Self::new();
        for service in services {
            directory.add(service);
        }
        directory
    }

    pub fn add(&self, advertisement: ServiceAdvertisement) {
        self.services
            .lock()
            .unwrap()
            .insert(advertisement.registry_key().to_string(), advertisement);
    }

    pub fn remove(&self, registry_key: &str) {
        self.services.lock().unwrap().remove(registry_key);
    }

    pub fn clear(&self) {
        self.services.lock().unwrap().clear();
    }
}

#[async_trait]
impl ServiceDirectory for MockServiceDirectory {
    async fn snapshot(&self) -> HashMap<String, ServiceAdvertisement> {
        self.services.lock().unwrap().clone()
    }
}

/// Mediator that records notifications and requests and answers requests
/// with a configurable result
#[derive(Clone)]
pub struct RecordingMediator {
    notifications: Arc<Mutex<Vec<Notification>>>,
    requests: Arc<Mutex<Vec<TaskReceived>>>,
    response: Arc<Mutex<Result<EventResult, String>>>,
}

impl RecordingMediator {
    pub fn new() -> Self {
        Self {
            notifications: Arc::new(Mutex::new(Vec::new())),
            requests: Arc::new(Mutex::new(Vec::new())),
            response: Arc::new(Mutex::new(Ok(EventResult::success()))),
        }
    }

    pub fn set_result(&self, result: EventResult) {
        *self.response.lock().unwrap() = Ok(result);
    }

    pub fn set_error(&self, message: &str) {
        *self.response.lock().unwrap() = Err(message.to_string());
    }

    pub fn notifications(&self) -> Vec<Notification> {
        self.notifications.lock().unwrap().clone()
    }

    pub fn requests(&self) -> Vec<TaskReceived> {
        self.requests.lock().unwrap().clone()
    }

    pub fn count(&self, predicate: impl Fn(&Notification) -> bool) -> usize {
        self.notifications
            .lock()
            .unwrap()
            .iter()
            .filter(|n| predicate(n))
            .count()
    }

    pub fn registry_changes(&self) -> usize {
        self.count(|n| matches!(n, Notification::RegistryChanged))
    }

    pub fn clear(&self) {
        self.notifications.lock().unwrap().clear();
        self.requests.lock().unwrap().clear();
    }
}

impl Default for RecordingMediator {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Mediator for RecordingMediator {
    async fn send(&self, request: TaskReceived) -> KeeperResult<EventResult> {
        self.requests.lock().unwrap().push(request);
        self.response
            .lock()
            .unwrap()
            .clone()
            .map_err(KeeperError::Handler)
    }

    fn publish(&self, notification: Notification) {
        self.notifications.lock().unwrap().push(notification);
    }
}
