//! Streaming chat orchestration with retrieval tool calls.
//!
//! A chat turn runs as a loop of model rounds. Each round streams text
//! deltas straight to the subscriber; if the model requests the retrieval
//! tool instead, the orchestrator runs the search, feeds the result back,
//! and opens another round. The loop is bounded so a model that keeps
//! calling tools cannot spin forever.

use std::sync::Arc;

use futures::StreamExt;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;

use crate::{ChatProvider, Error, NoteSearcher, QuillService, RelevantNote, Result};
use quill_config::ChatProviderConfig;
use quill_providers::chat::{ChatDelta, ChatMessage, ToolDefinition};

/// How many trailing history messages a turn keeps as model context.
pub const MAX_HISTORY_TURNS: usize = 10;
/// How many model rounds one turn may take, tool calls included.
pub const MAX_STEPS: usize = 5;
pub const RETRIEVAL_TOOL: &str = "findRelevantNotes";

const SYSTEM_PROMPT: &str = "\
You are a helpful assistant that answers questions about the user's personal notes.

Only answer using information retrieved from the user's notes. When the user asks about \
anything their notes might cover, call the findRelevantNotes tool with a search query before \
answering. Never invent note content.

Format responses in markdown and keep them concise. Bold the specific piece of information \
the user asked for, such as a password or a date. When an answer comes from a note, link to \
it as [title](/notes/{noteId}) using the note's id. If the retrieved notes do not contain \
the answer, reply exactly: \"Sorry, I can't find that information in your notes\".";

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ChatTurn {
	pub role: String,
	pub content: String,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ChatRequest {
	pub messages: Vec<ChatTurn>,
}

/// One server-sent event of a chat turn.
#[derive(Clone, Debug, Serialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum ChatEvent {
	TextDelta { text: String },
	ToolCall { name: String, arguments: Value },
	ToolResult { notes: Vec<RelevantNote> },
	Done,
	Error { message: String },
}
impl ChatEvent {
	pub fn kind(&self) -> &'static str {
		match self {
			Self::TextDelta { .. } => "text-delta",
			Self::ToolCall { .. } => "tool-call",
			Self::ToolResult { .. } => "tool-result",
			Self::Done => "done",
			Self::Error { .. } => "error",
		}
	}
}

impl QuillService {
	/// Starts a chat turn and returns its event stream. The turn runs on its
	/// own task; dropping the stream cancels it at the next event.
	pub fn chat(self: Arc<Self>, user_id: String, req: ChatRequest) -> ReceiverStream<ChatEvent> {
		let (events, rx) = mpsc::channel(32);

		tokio::spawn(async move {
			match self.run_chat(&user_id, req, &events).await {
				Ok(()) => {
					let _ = events.send(ChatEvent::Done).await;
				},
				Err(Error::Cancelled) => {},
				Err(err) => {
					tracing::warn!(error = %err, "A chat turn failed.");

					let _ = events.send(ChatEvent::Error { message: err.to_string() }).await;
				},
			}
		});

		ReceiverStream::new(rx)
	}

	async fn run_chat(
		&self,
		user_id: &str,
		req: ChatRequest,
		events: &mpsc::Sender<ChatEvent>,
	) -> Result<()> {
		let user_id = crate::require_user(Some(user_id))?;

		if req.messages.is_empty() {
			return Err(Error::InvalidRequest {
				message: "A chat request needs at least one message.".to_string(),
			});
		}

		let messages = history_to_messages(truncate_history(&req.messages))?;

		run_chat_turn(&self.cfg.providers.chat, &*self.providers.chat, self, user_id, messages, events)
			.await
	}
}

/// Maps replayed history onto the wire, prefixed with the system prompt.
/// Replayed tool results carry no paired tool_call id, so they cannot be
/// forwarded; the model re-runs retrieval when it still needs them.
pub(crate) fn history_to_messages(turns: &[ChatTurn]) -> Result<Vec<ChatMessage>> {
	let mut messages = vec![ChatMessage::system(SYSTEM_PROMPT)];

	for turn in turns {
		match turn.role.as_str() {
			"user" => messages.push(ChatMessage::user(turn.content.clone())),
			"assistant" => messages.push(ChatMessage::assistant(turn.content.clone())),
			"tool" => {},
			other =>
				return Err(Error::InvalidRequest {
					message: format!("Unsupported chat role {other:?}."),
				}),
		}
	}

	Ok(messages)
}

/// Keeps the last [`MAX_HISTORY_TURNS`] messages; older context is dropped
/// before it reaches the model.
pub(crate) fn truncate_history(messages: &[ChatTurn]) -> &[ChatTurn] {
	if messages.len() > MAX_HISTORY_TURNS {
		&messages[messages.len() - MAX_HISTORY_TURNS..]
	} else {
		messages
	}
}

pub(crate) fn retrieval_tool() -> ToolDefinition {
	ToolDefinition {
		name: RETRIEVAL_TOOL.to_string(),
		description: "Searches the user's notes and returns the ones most relevant to a query."
			.to_string(),
		parameters: json!({
			"type": "object",
			"properties": {
				"query": {
					"type": "string",
					"description": "What to look for in the user's notes.",
				},
			},
			"required": ["query"],
		}),
	}
}

pub(crate) fn parse_query_argument(arguments: &str) -> Result<String> {
	let parsed: Value = serde_json::from_str(arguments)
		.map_err(|err| Error::Model { message: format!("Malformed tool arguments: {err}.") })?;

	match parsed.get("query").and_then(Value::as_str) {
		Some(query) if !query.trim().is_empty() => Ok(query.trim().to_string()),
		_ => Err(Error::Model {
			message: "The tool call is missing a non-empty \"query\" argument.".to_string(),
		}),
	}
}

pub(crate) async fn run_chat_turn(
	cfg: &ChatProviderConfig,
	provider: &dyn ChatProvider,
	searcher: &dyn NoteSearcher,
	user_id: &str,
	mut messages: Vec<ChatMessage>,
	events: &mpsc::Sender<ChatEvent>,
) -> Result<()> {
	let tools = vec![retrieval_tool()];

	for _ in 0..MAX_STEPS {
		let mut stream = provider.stream_chat(cfg, messages.clone(), tools.clone());
		let mut assistant_text = String::new();
		let mut tool_calls = Vec::new();

		while let Some(delta) = stream.next().await {
			match delta.map_err(Error::model)? {
				ChatDelta::Text(text) => {
					assistant_text.push_str(&text);
					send(events, ChatEvent::TextDelta { text }).await?;
				},
				ChatDelta::ToolCall(call) => tool_calls.push(call),
				ChatDelta::Finished { .. } => break,
			}
		}

		if tool_calls.is_empty() {
			return Ok(());
		}

		messages.push(ChatMessage::assistant_with_tools(assistant_text, tool_calls.clone()));

		for call in tool_calls {
			if call.name != RETRIEVAL_TOOL {
				return Err(Error::Model {
					message: format!("The model requested an unknown tool {:?}.", call.name),
				});
			}

			let query = parse_query_argument(&call.arguments)?;

			send(events, ChatEvent::ToolCall {
				name: call.name.clone(),
				arguments: json!({ "query": query }),
			})
			.await?;

			let notes = searcher.find_relevant_notes(user_id, &query).await?;

			send(events, ChatEvent::ToolResult { notes: notes.clone() }).await?;

			let result_json = serde_json::to_string(&notes)
				.map_err(|err| Error::Model { message: format!("Tool result failed to encode: {err}.") })?;

			messages.push(ChatMessage::tool(call.id, result_json));
		}
	}

	Err(Error::Model {
		message: format!("The model exceeded the {MAX_STEPS}-round limit for one turn."),
	})
}

async fn send(events: &mpsc::Sender<ChatEvent>, event: ChatEvent) -> Result<()> {
	events.send(event).await.map_err(|_| Error::Cancelled)
}
