/// Client command protocol
///
/// Text frames from clients are `command|field|...`:
///
/// - `register|username|password|nickname`
/// - `login|username|password`
/// - `sendMessage|from|to|content` (content may contain `|`)
/// - `getFriendList|username`
///
/// Replies are `ok|command|detail` or `error|CODE|detail`; a successful login
/// is answered with `welcome|username`.
use crate::errors::{GatewayError, GatewayResult};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientCommand {
    Register {
        username: String,
        password: String,
        nickname: String,
    },
    Login {
        username: String,
        password: String,
    },
    SendMessage {
        from: String,
        to: String,
        content: String,
    },
    GetFriendList {
        username: String,
    },
}

impl ClientCommand {
    pub fn name(&self) -> &'static str {
        match self {
            ClientCommand::Register { .. } => "register",
            ClientCommand::Login { .. } => "login",
            ClientCommand::SendMessage { .. } => "sendMessage",
            ClientCommand::GetFriendList { .. } => "getFriendList",
        }
    }

    pub fn parse(text: &str) -> GatewayResult<Self> {
        let (command, rest) = match text.split_once('|') {
            Some((command, rest)) => (command, Some(rest)),
            None => (text, None),
        };

        match command {
            "register" => {
                let [username, password, nickname] = exact_fields::<3>(command, rest)?;
                Ok(ClientCommand::Register {
                    username,
                    password,
                    nickname,
                })
            }
            "login" => {
                let [username, password] = exact_fields::<2>(command, rest)?;
                Ok(ClientCommand::Login { username, password })
            }
            "sendMessage" => {
                let mut fields = rest.unwrap_or_default().splitn(3, '|');
                match (fields.next(), fields.next(), fields.next()) {
                    (Some(from), Some(to), Some(content)) if !from.is_empty() && !to.is_empty() => {
                        Ok(ClientCommand::SendMessage {
                            from: from.to_string(),
                            to: to.to_string(),
                            content: content.to_string(),
                        })
                    }
                    _ => Err(GatewayError::invalid("usage: sendMessage|from|to|content")),
                }
            }
            "getFriendList" => {
                let [username] = exact_fields::<1>(command, rest)?;
                Ok(ClientCommand::GetFriendList { username })
            }
            "" => Err(GatewayError::invalid("empty command")),
            other => Err(GatewayError::invalid(format!("unknown command '{}'", other))),
        }
    }
}

/// Split into exactly `N` non-empty fields
fn exact_fields<const N: usize>(command: &str, rest: Option<&str>) -> GatewayResult<[String; N]> {
    let fields: Vec<String> = rest
        .map(|rest| rest.split('|').map(str::to_string).collect())
        .unwrap_or_default();

    if fields.len() != N || fields.iter().any(|f| f.is_empty()) {
        return Err(GatewayError::invalid(format!(
            "{} expects {} non-empty fields, got {}",
            command,
            N,
            fields.len()
        )));
    }
    fields
        .try_into()
        .map_err(|_| GatewayError::invalid(format!("{} field count mismatch", command)))
}

pub fn ok_frame(command: &str, detail: &str) -> String {
    format!("ok|{}|{}", command, detail)
}

pub fn error_frame(error: &GatewayError) -> String {
    format!("error|{}|{}", error.code(), error)
}

pub fn welcome_frame(username: &str) -> String {
    format!("welcome|{}", username)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_every_command() {
        assert_eq!(
            ClientCommand::parse("register|alice|pw|Alice").unwrap(),
            ClientCommand::Register {
                username: "alice".into(),
                password: "pw".into(),
                nickname: "Alice".into(),
            }
        );
        assert_eq!(
            ClientCommand::parse("login|alice|pw").unwrap(),
            ClientCommand::Login {
                username: "alice".into(),
                password: "pw".into(),
            }
        );
        assert_eq!(
            ClientCommand::parse("sendMessage|alice|bob|a|b").unwrap(),
            ClientCommand::SendMessage {
                from: "alice".into(),
                to: "bob".into(),
                content: "a|b".into(),
            }
        );
        assert_eq!(
            ClientCommand::parse("getFriendList|alice").unwrap(),
            ClientCommand::GetFriendList {
                username: "alice".into()
            }
        );
    }

    #[test]
    fn wrong_field_counts_are_rejected() {
        for text in [
            "register|alice|pw",
            "register|alice|pw|Alice|extra",
            "login|alice",
            "login|alice|",
            "sendMessage|alice|bob",
            "getFriendList",
            "getFriendList|alice|bob",
            "dance|alice",
            "",
        ] {
            assert!(
                matches!(ClientCommand::parse(text), Err(GatewayError::InvalidInput(_))),
                "accepted '{}'",
                text
            );
        }
    }

    #[test]
    fn error_frames_carry_the_code() {
        let frame = error_frame(&GatewayError::invalid("unknown command 'dance'"));
        assert!(frame.starts_with("error|INVALID_INPUT|"));
    }
}
