use std::sync::Arc;

use tracing::{debug, info, trace, warn};

use super::events::DispatchEvent;
use crate::commands::CommandRegistry;
use crate::interpreter::{self, ExecutionContext, FunctionRegistry};
use crate::models::message::Message;
use crate::rest::RestClient;

/// What the session state machine should do after an event was routed.
#[derive(Debug, PartialEq, Eq)]
pub enum RouteOutcome {
    /// The gateway completed a fresh handshake; store the session id.
    SessionReady { session_id: String },
    /// The gateway accepted a resume; the existing session id stands.
    SessionResumed,
    /// Nothing for the state machine to act on.
    Handled,
}

/// Demultiplexes application-plane events: session lifecycle notifications go
/// back to the state machine, message events feed the command pipeline, and
/// everything unrecognized is ignored for forward compatibility.
pub struct DispatchRouter {
    commands: Arc<CommandRegistry>,
    functions: Arc<FunctionRegistry>,
    rest: RestClient,
    prefix: String,
}

impl DispatchRouter {
    pub fn new(
        commands: Arc<CommandRegistry>,
        functions: Arc<FunctionRegistry>,
        rest: RestClient,
        prefix: String,
    ) -> Self {
        Self {
            commands,
            functions,
            rest,
            prefix,
        }
    }

    pub fn route(&self, event: DispatchEvent) -> RouteOutcome {
        match event {
            DispatchEvent::Ready(ready) => {
                if let Some(user) = &ready.user {
                    info!(username = %user.username, "logged in");
                }
                RouteOutcome::SessionReady {
                    session_id: ready.session_id,
                }
            }
            DispatchEvent::Resumed => RouteOutcome::SessionResumed,
            DispatchEvent::MessageCreate { message, raw } => {
                self.handle_message(message, raw);
                RouteOutcome::Handled
            }
            DispatchEvent::GuildCreate(guild) => {
                debug!(guild = guild.name.as_deref().unwrap_or("?"), "guild available");
                RouteOutcome::Handled
            }
            DispatchEvent::Unknown(name) => {
                trace!(event = %name, "ignoring unrecognized dispatch event");
                RouteOutcome::Handled
            }
        }
    }

    fn handle_message(&self, message: Message, raw: serde_json::Value) {
        // Never respond to bots, including ourselves.
        if message.author.as_ref().is_some_and(|a| a.bot) {
            return;
        }

        let Some(invocation) = parse_invocation(&message.content, &self.prefix) else {
            return;
        };
        let Some(command) = self.commands.get(&invocation.name) else {
            return;
        };

        debug!(command = %command.name, channel = %message.channel_id, "executing command");

        let ctx = ExecutionContext {
            args: invocation.args,
            raw_text: invocation.raw_text,
            channel_id: message.channel_id.clone(),
            guild_id: message.guild_id.clone(),
            author_id: message
                .author
                .as_ref()
                .map(|a| a.id.clone())
                .unwrap_or_default(),
            author_username: message
                .author
                .as_ref()
                .map(|a| a.username.clone())
                .unwrap_or_else(|| "Unknown".to_string()),
            raw_event: raw,
        };

        // Commands run on their own task: a slow or failing command must not
        // stall frame processing or connection health.
        let functions = Arc::clone(&self.functions);
        let rest = self.rest.clone();
        tokio::spawn(async move {
            let response = interpreter::execute(&command.code, &ctx, &functions);
            if response.is_empty() {
                return;
            }
            if let Err(e) = rest
                .create_message(
                    &ctx.channel_id,
                    response.content.as_deref(),
                    response.embed.as_ref(),
                )
                .await
            {
                warn!(command = %command.name, "failed to deliver command response: {e}");
            }
        });
    }
}

struct Invocation {
    name: String,
    args: Vec<String>,
    /// Content after the prefix and command name.
    raw_text: String,
}

/// Split a message into command name and arguments, if it starts with the
/// configured prefix.
fn parse_invocation(content: &str, prefix: &str) -> Option<Invocation> {
    let without_prefix = content.strip_prefix(prefix)?.trim();
    let mut words = without_prefix.split_whitespace();
    let first = words.next()?;
    let name = first.to_lowercase();
    let args: Vec<String> = words.map(str::to_owned).collect();
    let raw_text = without_prefix[first.len()..].trim().to_string();

    Some(Invocation {
        name,
        args,
        raw_text,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::events::ReadyData;
    use crate::models::message::Author;
    use serde_json::json;

    fn router() -> DispatchRouter {
        DispatchRouter::new(
            Arc::new(CommandRegistry::empty("./commands")),
            Arc::new(FunctionRegistry::with_builtins()),
            RestClient::new("http://127.0.0.1:1".to_string(), "t".to_string()),
            "!".to_string(),
        )
    }

    fn message(content: &str, bot: bool) -> DispatchEvent {
        DispatchEvent::MessageCreate {
            message: Message {
                id: "m1".into(),
                channel_id: "c1".into(),
                guild_id: None,
                content: content.into(),
                author: Some(Author {
                    id: "u1".into(),
                    username: "someone".into(),
                    bot,
                }),
            },
            raw: json!({}),
        }
    }

    #[test]
    fn test_ready_returns_session_id() {
        let outcome = router().route(DispatchEvent::Ready(ReadyData {
            session_id: "abc123".into(),
            user: None,
        }));
        assert_eq!(
            outcome,
            RouteOutcome::SessionReady {
                session_id: "abc123".into()
            }
        );
    }

    #[test]
    fn test_resumed_is_reported() {
        assert_eq!(
            router().route(DispatchEvent::Resumed),
            RouteOutcome::SessionResumed
        );
    }

    #[test]
    fn test_unknown_event_is_ignored() {
        assert_eq!(
            router().route(DispatchEvent::Unknown("SOMETHING_NEW".into())),
            RouteOutcome::Handled
        );
    }

    #[tokio::test]
    async fn test_bot_messages_are_filtered() {
        assert_eq!(
            router().route(message("!ping", true)),
            RouteOutcome::Handled
        );
    }

    #[tokio::test]
    async fn test_unprefixed_messages_are_ignored() {
        assert_eq!(
            router().route(message("hello there", false)),
            RouteOutcome::Handled
        );
    }

    #[test]
    fn test_parse_invocation() {
        let inv = parse_invocation("!roll 2 d6", "!").unwrap();
        assert_eq!(inv.name, "roll");
        assert_eq!(inv.args, vec!["2", "d6"]);
        assert_eq!(inv.raw_text, "2 d6");
    }

    #[test]
    fn test_parse_invocation_lowercases_name() {
        let inv = parse_invocation("!Roll", "!").unwrap();
        assert_eq!(inv.name, "roll");
        assert!(inv.args.is_empty());
        assert_eq!(inv.raw_text, "");
    }

    #[test]
    fn test_parse_invocation_requires_prefix_and_name() {
        assert!(parse_invocation("roll", "!").is_none());
        assert!(parse_invocation("!", "!").is_none());
        assert!(parse_invocation("!   ", "!").is_none());
    }
}
