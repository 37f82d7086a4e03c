//! Line-delimited text command protocol: parsing and dispatch.

use std::collections::HashSet;
use std::sync::Arc;

use crate::log::{Level, SegmentedLog};
use crate::topic::TopicRegistry;

const SUBSCRIBE_PREFIX: &str = "SUBSCRIBE ";
const PULL_PREFIX: &str = "PULL";
const PUBLISH_PREFIX: &str = "PUBLISH ";

/// Dispatches parsed commands against a client's subscription set and the shared registry.
pub struct CommandHandler {
    topics: Arc<TopicRegistry>,
    log: Arc<SegmentedLog>,
}

impl CommandHandler {
    pub fn new(topics: Arc<TopicRegistry>, log: Arc<SegmentedLog>) -> Self {
        Self { topics, log }
    }

    /// Handles one trimmed command line, mutating `subscribed_topics` as needed, and returns the
    /// reply to write back verbatim (no trailing newline).
    pub fn handle(&self, line: &str, subscribed_topics: &mut HashSet<String>) -> String {
        let line = line.trim_end_matches(['\r', '\n', ' ', '\t']);
        self.note(&format!("received command: {line}"));

        if let Some(topic) = line.strip_prefix(SUBSCRIBE_PREFIX) {
            let topic = topic.trim();
            subscribed_topics.insert(topic.to_string());
            self.note(&format!("subscribed to {topic}"));
            return "OK".to_string();
        }

        if line == PULL_PREFIX || line.starts_with("PULL ") {
            return self.handle_pull(subscribed_topics);
        }

        if let Some(rest) = line.strip_prefix(PUBLISH_PREFIX) {
            return self.handle_publish(rest, line);
        }

        self.note(&format!("invalid command: {line}"));
        format!("INVALID_CMD: {line}")
    }

    fn handle_pull(&self, subscribed_topics: &HashSet<String>) -> String {
        if subscribed_topics.is_empty() {
            self.note("pull with no subscriptions");
            return "NO_TOPIC".to_string();
        }
        for topic in subscribed_topics {
            match self.topics.pull(topic) {
                Ok(Some(message)) => {
                    self.note(&format!("pulled from {topic}"));
                    return message;
                }
                Ok(None) => continue,
                Err(err) => {
                    log::error!("error pulling from {topic}: {err}");
                    continue;
                }
            }
        }
        self.note("pull yielded no messages");
        "NO_MESSAGES".to_string()
    }

    fn handle_publish(&self, rest: &str, original_line: &str) -> String {
        let Some((topic, message)) = rest.split_once(' ') else {
            self.note(&format!("invalid publish command: {original_line}"));
            return format!("INVALID_CMD: {original_line}");
        };
        if let Err(err) = self.topics.publish(topic, message) {
            log::error!("error publishing to {topic}: {err}");
        }
        self.note(&format!("published to {topic}"));
        "OK".to_string()
    }

    fn note(&self, message: &str) {
        if let Err(err) = self.log.append(Level::Info, message) {
            log::error!("failed to log protocol event: {err}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn new_handler_in(root: &std::path::Path) -> CommandHandler {
        let log = SegmentedLog::open_in(root, "protocol_test_log", 4096).unwrap();
        let topics = Arc::new(TopicRegistry::new(log.clone()));
        CommandHandler::new(topics, log)
    }

    #[test]
    fn subscribe_replies_ok_and_grows_subscription_set() {
        let dir = tempdir().unwrap();
        let handler = new_handler_in(dir.path());
        let mut subs = HashSet::new();
        assert_eq!(handler.handle("SUBSCRIBE topic1", &mut subs), "OK");
        assert!(subs.contains("topic1"));
    }

    #[test]
    fn pull_with_no_subscriptions_is_no_topic() {
        let dir = tempdir().unwrap();
        let handler = new_handler_in(dir.path());
        let mut subs = HashSet::new();
        assert_eq!(handler.handle("PULL", &mut subs), "NO_TOPIC");
    }

    #[test]
    fn pull_with_empty_topic_is_no_messages() {
        let dir = tempdir().unwrap();
        let handler = new_handler_in(dir.path());
        let mut subs = HashSet::new();
        handler.handle("SUBSCRIBE topic1", &mut subs);
        assert_eq!(handler.handle("PULL", &mut subs), "NO_MESSAGES");
    }

    #[test]
    fn publish_then_pull_delivers_message() {
        let dir = tempdir().unwrap();
        let handler = new_handler_in(dir.path());
        let mut subs = HashSet::new();
        assert_eq!(handler.handle("PUBLISH topic1 hello", &mut subs), "OK");
        handler.handle("SUBSCRIBE topic1", &mut subs);
        assert_eq!(handler.handle("PULL", &mut subs), "hello");
    }

    #[test]
    fn unknown_command_is_invalid() {
        let dir = tempdir().unwrap();
        let handler = new_handler_in(dir.path());
        let mut subs = HashSet::new();
        assert_eq!(handler.handle("BOGUS foo", &mut subs), "INVALID_CMD: BOGUS foo");
    }

    #[test]
    fn publish_missing_message_is_invalid() {
        let dir = tempdir().unwrap();
        let handler = new_handler_in(dir.path());
        let mut subs = HashSet::new();
        assert_eq!(handler.handle("PUBLISH topic1", &mut subs), "INVALID_CMD: PUBLISH topic1");
    }
}
