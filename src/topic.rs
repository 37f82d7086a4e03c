//! Process-wide topic-to-queue routing table.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};

use crate::error::{Error, Result};
use crate::log::{Level, SegmentedLog};

/// A single topic's FIFO of pending messages, independently lockable from the registry.
#[derive(Default)]
struct TopicQueue {
    messages: VecDeque<String>,
}

/// Process-wide mapping from topic name to its queue. Lock order is fixed: the outer map lock
/// is always acquired before a queue's inner lock, never the reverse.
pub struct TopicRegistry {
    topics: Mutex<HashMap<String, Arc<Mutex<TopicQueue>>>>,
    log: Arc<SegmentedLog>,
}

impl TopicRegistry {
    pub fn new(log: Arc<SegmentedLog>) -> Self {
        Self {
            topics: Mutex::new(HashMap::new()),
            log,
        }
    }

    fn queue_for(&self, topic: &str) -> Result<Arc<Mutex<TopicQueue>>> {
        let mut topics = self.topics.lock().map_err(|_| Error::Corrupt("topic map lock poisoned"))?;
        Ok(topics
            .entry(topic.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(TopicQueue::default())))
            .clone())
    }

    /// Appends `message` to `topic`'s queue, creating the topic if needed. Always succeeds.
    pub fn publish(&self, topic: &str, message: &str) -> Result<()> {
        let queue = self.queue_for(topic)?;
        {
            let mut queue = queue.lock().map_err(|_| Error::Corrupt("topic queue lock poisoned"))?;
            queue.messages.push_back(message.to_string());
        }
        if let Err(err) = self.log.append(Level::Info, &format!("Published to {topic}: {message}")) {
            log::error!("failed to log publish to {topic}: {err}");
        }
        Ok(())
    }

    /// Removes and returns the head of `topic`'s queue, if any, without creating the topic.
    pub fn pull(&self, topic: &str) -> Result<Option<String>> {
        let queue = {
            let topics = self.topics.lock().map_err(|_| Error::Corrupt("topic map lock poisoned"))?;
            topics.get(topic).cloned()
        };
        let Some(queue) = queue else {
            return Ok(None);
        };
        let message = {
            let mut queue = queue.lock().map_err(|_| Error::Corrupt("topic queue lock poisoned"))?;
            queue.messages.pop_front()
        };
        if message.is_some() {
            if let Err(err) = self.log.append(Level::Info, &format!("Pulled from topic: {topic}")) {
                log::error!("failed to log pull from {topic}: {err}");
            }
        }
        Ok(message)
    }

    pub fn has_topic(&self, topic: &str) -> Result<bool> {
        let topics = self.topics.lock().map_err(|_| Error::Corrupt("topic map lock poisoned"))?;
        Ok(topics.contains_key(topic))
    }

    /// Snapshot of current topic names, for diagnostics only.
    pub fn topic_list(&self) -> Result<Vec<String>> {
        let topics = self.topics.lock().map_err(|_| Error::Corrupt("topic map lock poisoned"))?;
        Ok(topics.keys().cloned().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn new_registry_in(root: &std::path::Path) -> TopicRegistry {
        let log = SegmentedLog::open_in(root, "topic_test_log", 4096).unwrap();
        TopicRegistry::new(log)
    }

    #[test]
    fn publish_then_pull_preserves_fifo_order() {
        let dir = tempdir().unwrap();
        let registry = new_registry_in(dir.path());
        registry.publish("t1", "first").unwrap();
        registry.publish("t1", "second").unwrap();
        assert_eq!(registry.pull("t1").unwrap(), Some("first".to_string()));
        assert_eq!(registry.pull("t1").unwrap(), Some("second".to_string()));
        assert_eq!(registry.pull("t1").unwrap(), None);
    }

    #[test]
    fn pull_from_unknown_topic_returns_none() {
        let dir = tempdir().unwrap();
        let registry = new_registry_in(dir.path());
        assert_eq!(registry.pull("missing").unwrap(), None);
        assert!(!registry.has_topic("missing").unwrap());
    }

    #[test]
    fn publish_creates_topic_visible_in_list() {
        let dir = tempdir().unwrap();
        let registry = new_registry_in(dir.path());
        registry.publish("alerts", "fire").unwrap();
        assert!(registry.has_topic("alerts").unwrap());
        assert_eq!(registry.topic_list().unwrap(), vec!["alerts".to_string()]);
    }
}
