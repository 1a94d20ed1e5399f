// In-Flight Message

use super::mapping::QueueName;

/// A delivered message for the duration of one receive -> forward -> log cycle
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InFlightMessage {
    pub queue_name: QueueName,
    pub body: Vec<u8>,
}

impl InFlightMessage {
    pub fn new(queue_name: impl Into<String>, body: Vec<u8>) -> Self {
        Self {
            queue_name: queue_name.into(),
            body,
        }
    }

    /// Body as UTF-8 text; invalid sequences become U+FFFD
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }

    pub fn len(&self) -> usize {
        self.body.len()
    }

    pub fn is_empty(&self) -> bool {
        self.body.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_text_decodes_utf8() {
        let msg = InFlightMessage::new("orders", "{\"id\":1,\"name\":\"café\"}".as_bytes().to_vec());
        assert_eq!(msg.text(), "{\"id\":1,\"name\":\"café\"}");
    }

    #[test]
    fn test_text_replaces_invalid_bytes() {
        let msg = InFlightMessage::new("orders", vec![b'a', 0xff, b'b']);
        assert_eq!(msg.text(), "a\u{FFFD}b");
        assert_eq!(msg.len(), 3);
    }
}
