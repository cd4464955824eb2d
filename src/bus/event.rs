/// Notification bus wire format
///
/// UTF-8 text, fields joined by `|`, field 0 is the tag:
///
/// - `sendMessage|from|to|content`
/// - `friend_accepted|from|to`
///
/// There is no escaping. `content` is the last field, so a `|` inside it is
/// kept as part of the content; every other field count is checked exactly.
use crate::errors::{GatewayError, GatewayResult};

pub const TAG_SEND_MESSAGE: &str = "sendMessage";
pub const TAG_FRIEND_ACCEPTED: &str = "friend_accepted";
const DELIMITER: char = '|';

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    NewMessage {
        from: String,
        to: String,
        content: String,
    },
    FriendAccepted {
        from: String,
        to: String,
    },
}

impl Event {
    pub fn new_message(from: &str, to: &str, content: &str) -> Self {
        Event::NewMessage {
            from: from.to_string(),
            to: to.to_string(),
            content: content.to_string(),
        }
    }

    pub fn friend_accepted(from: &str, to: &str) -> Self {
        Event::FriendAccepted {
            from: from.to_string(),
            to: to.to_string(),
        }
    }

    pub fn tag(&self) -> &'static str {
        match self {
            Event::NewMessage { .. } => TAG_SEND_MESSAGE,
            Event::FriendAccepted { .. } => TAG_FRIEND_ACCEPTED,
        }
    }

    pub fn decode(raw: &str) -> GatewayResult<Self> {
        let (tag, rest) = raw
            .split_once(DELIMITER)
            .ok_or_else(|| GatewayError::invalid(format!("event without fields: '{}'", raw)))?;

        match tag {
            TAG_SEND_MESSAGE => {
                let mut fields = rest.splitn(3, DELIMITER);
                let (from, to, content) = match (fields.next(), fields.next(), fields.next()) {
                    (Some(from), Some(to), Some(content)) => (from, to, content),
                    _ => {
                        return Err(GatewayError::invalid(format!(
                            "{} needs from|to|content: '{}'",
                            TAG_SEND_MESSAGE, raw
                        )))
                    }
                };
                require_name("from", from)?;
                require_name("to", to)?;
                Ok(Event::new_message(from, to, content))
            }
            TAG_FRIEND_ACCEPTED => {
                let fields: Vec<&str> = rest.split(DELIMITER).collect();
                let [from, to] = fields.as_slice() else {
                    return Err(GatewayError::invalid(format!(
                        "{} needs exactly from|to: '{}'",
                        TAG_FRIEND_ACCEPTED, raw
                    )));
                };
                require_name("from", from)?;
                require_name("to", to)?;
                Ok(Event::friend_accepted(from, to))
            }
            other => Err(GatewayError::invalid(format!("unknown event tag '{}'", other))),
        }
    }

    pub fn encode(&self) -> String {
        match self {
            Event::NewMessage { from, to, content } => {
                format!("{}|{}|{}|{}", TAG_SEND_MESSAGE, from, to, content)
            }
            Event::FriendAccepted { from, to } => format!("{}|{}|{}", TAG_FRIEND_ACCEPTED, from, to),
        }
    }
}

impl std::fmt::Display for Event {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Event::NewMessage { from, to, content } => {
                write!(f, "{} {} -> {} ({} bytes)", self.tag(), from, to, content.len())
            }
            Event::FriendAccepted { from, to } => write!(f, "{} {} <-> {}", self.tag(), from, to),
        }
    }
}

fn require_name(field: &str, value: &str) -> GatewayResult<()> {
    if value.is_empty() {
        return Err(GatewayError::invalid(format!("empty '{}' field", field)));
    }
    if value.contains(DELIMITER) {
        return Err(GatewayError::invalid(format!("'{}' field contains '|'", field)));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_core_tags() {
        assert_eq!(
            Event::decode("sendMessage|alice|bob|hi").unwrap(),
            Event::new_message("alice", "bob", "hi")
        );
        assert_eq!(
            Event::decode("friend_accepted|alice|bob").unwrap(),
            Event::friend_accepted("alice", "bob")
        );
    }

    #[test]
    fn content_keeps_embedded_delimiters() {
        let event = Event::decode("sendMessage|alice|bob|a|b").unwrap();
        assert_eq!(event, Event::new_message("alice", "bob", "a|b"));
        assert_eq!(event.encode(), "sendMessage|alice|bob|a|b");
    }

    #[test]
    fn rejects_wrong_field_counts_and_unknown_tags() {
        for raw in [
            "sendMessage|alice|bob",
            "sendMessage",
            "friend_accepted|alice",
            "friend_accepted|alice|bob|extra",
            "sendMessage||bob|hi",
            "typing|alice|bob",
            "",
        ] {
            assert!(
                matches!(Event::decode(raw), Err(GatewayError::InvalidInput(_))),
                "accepted '{}'",
                raw
            );
        }
    }

    #[test]
    fn empty_content_is_allowed() {
        assert_eq!(
            Event::decode("sendMessage|alice|bob|").unwrap(),
            Event::new_message("alice", "bob", "")
        );
    }
}
