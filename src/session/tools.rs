//! Tool call executor.
//!
//! Runs model-issued tool calls against the host and builds the replies that
//! keep the remote conversation moving: one `function_call_output` correlated
//! by `call_id`, then one `response.create`.

use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{info, warn};

use super::host::{SessionHost, SiteUpdate};
use crate::error::SessionError;
use crate::realtime::{ClientEvent, ToolDef};

pub const SAVE_HTML: &str = "save_html";

/// A completed tool call
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolInvocation {
    pub name: String,
    /// Raw JSON argument string
    pub arguments: String,
    pub call_id: String,
}

/// Arguments of `save_html`
#[derive(Debug, Deserialize)]
struct SaveHtmlArgs {
    html_content: String,
    #[serde(default)]
    description: Option<String>,
}

/// Result of running one invocation
#[derive(Debug)]
pub struct ToolOutcome {
    /// Events to send, in order
    pub replies: Vec<ClientEvent>,
    /// Local failure to surface to the host (never fatal)
    pub error: Option<SessionError>,
}

/// Signature of every tool the session advertises
pub fn definitions() -> Vec<ToolDef> {
    vec![ToolDef {
        tool_type: "function".to_string(),
        name: SAVE_HTML.to_string(),
        description: "Save or update the website HTML content".to_string(),
        parameters: json!({
            "type": "object",
            "properties": {
                "html_content": {
                    "type": "string",
                    "description": "The complete HTML content for the website, including DOCTYPE, head, and body tags"
                },
                "description": {
                    "type": "string",
                    "description": "Brief description of what was changed or created"
                }
            },
            "required": ["html_content", "description"]
        }),
    }]
}

fn reply(call_id: &str, output: Value) -> Vec<ClientEvent> {
    vec![
        ClientEvent::function_output(call_id, &output),
        ClientEvent::ResponseCreate,
    ]
}

/// Execute one invocation
///
/// The host callback has returned before any reply is built, so the remote
/// side never sees completion ahead of the local change.
pub fn execute(invocation: &ToolInvocation, host: &dyn SessionHost) -> ToolOutcome {
    if invocation.name != SAVE_HTML {
        warn!("Unknown tool '{}' (call {})", invocation.name, invocation.call_id);
        return ToolOutcome {
            replies: reply(
                &invocation.call_id,
                json!({
                    "success": false,
                    "error": format!("Unknown tool: {}", invocation.name),
                }),
            ),
            error: None,
        };
    }

    match serde_json::from_str::<SaveHtmlArgs>(&invocation.arguments) {
        Ok(args) => {
            info!(
                "Executing {}: {} ({} bytes)",
                SAVE_HTML,
                args.description.as_deref().unwrap_or("no description"),
                args.html_content.len()
            );
            host.on_site_update(&SiteUpdate {
                content: args.html_content,
                description: args.description,
            });
            ToolOutcome {
                replies: reply(
                    &invocation.call_id,
                    json!({ "success": true, "message": "HTML saved successfully" }),
                ),
                error: None,
            }
        }
        Err(e) => {
            warn!("Malformed arguments for {}: {}", SAVE_HTML, e);
            ToolOutcome {
                replies: reply(
                    &invocation.call_id,
                    json!({ "success": false, "error": format!("Invalid arguments: {e}") }),
                ),
                error: Some(SessionError::MalformedToolArguments {
                    name: invocation.name.clone(),
                    reason: e.to_string(),
                }),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::realtime::messages::ConversationItem;
    use std::sync::Mutex;

    #[derive(Default)]
    struct RecordingHost {
        updates: Mutex<Vec<SiteUpdate>>,
    }

    impl SessionHost for RecordingHost {
        fn on_site_update(&self, update: &SiteUpdate) {
            self.updates.lock().unwrap().push(update.clone());
        }

        fn on_transcript(&self, _text: &str, _is_user: bool) {}
    }

    fn invocation(name: &str, arguments: &str) -> ToolInvocation {
        ToolInvocation {
            name: name.into(),
            arguments: arguments.into(),
            call_id: "call_7".into(),
        }
    }

    fn output_of(event: &ClientEvent) -> Value {
        match event {
            ClientEvent::ConversationItemCreate {
                item: ConversationItem::FunctionCallOutput { call_id, output },
            } => {
                assert_eq!(call_id, "call_7");
                serde_json::from_str(output).unwrap()
            }
            other => panic!("expected function output, got {other:?}"),
        }
    }

    #[test]
    fn test_save_html_updates_host_then_replies() {
        let host = RecordingHost::default();
        let outcome = execute(
            &invocation(SAVE_HTML, r#"{"html_content":"<h1>Hi</h1>","description":"heading"}"#),
            &host,
        );

        assert!(outcome.error.is_none());
        assert_eq!(
            host.updates.lock().unwrap().as_slice(),
            &[SiteUpdate {
                content: "<h1>Hi</h1>".into(),
                description: Some("heading".into()),
            }]
        );
        assert_eq!(outcome.replies.len(), 2);
        assert_eq!(output_of(&outcome.replies[0])["success"], true);
        assert_eq!(outcome.replies[1], ClientEvent::ResponseCreate);
    }

    #[test]
    fn test_malformed_arguments_acknowledge_failure_once() {
        let host = RecordingHost::default();
        let outcome = execute(&invocation(SAVE_HTML, "{not json"), &host);

        assert!(host.updates.lock().unwrap().is_empty());
        assert!(matches!(
            outcome.error,
            Some(SessionError::MalformedToolArguments { .. })
        ));
        let outputs = outcome
            .replies
            .iter()
            .filter(|e| matches!(e, ClientEvent::ConversationItemCreate { .. }))
            .count();
        assert_eq!(outputs, 1);
        assert_eq!(output_of(&outcome.replies[0])["success"], false);
    }

    #[test]
    fn test_missing_content_is_malformed() {
        let host = RecordingHost::default();
        let outcome = execute(&invocation(SAVE_HTML, r#"{"description":"x"}"#), &host);
        assert!(outcome.error.is_some());
    }

    #[test]
    fn test_unknown_tool_gets_generic_failure() {
        let host = RecordingHost::default();
        let outcome = execute(&invocation("delete_site", "{}"), &host);

        assert!(outcome.error.is_none());
        assert!(host.updates.lock().unwrap().is_empty());
        let output = output_of(&outcome.replies[0]);
        assert_eq!(output["success"], false);
        assert_eq!(outcome.replies[1], ClientEvent::ResponseCreate);
    }

    #[test]
    fn test_definitions_advertise_save_html() {
        let defs = definitions();
        assert_eq!(defs.len(), 1);
        assert_eq!(defs[0].name, SAVE_HTML);
        assert_eq!(defs[0].parameters["required"][0], "html_content");
    }
}
