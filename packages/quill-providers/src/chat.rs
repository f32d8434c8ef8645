//! Streaming chat-completions client with tool-calling support.
//!
//! The model streams server-sent `data:` lines. Text content is forwarded as
//! it arrives; tool-call argument fragments are accumulated per index and
//! emitted as complete [`ChatDelta::ToolCall`]s when the model finishes its
//! turn.

use std::{collections::BTreeMap, time::Duration};

use async_stream::try_stream;
use futures::{Stream, StreamExt};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::Result;
use quill_config::ChatProviderConfig;

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ChatMessage {
	pub role: String,
	#[serde(default)]
	pub content: String,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub tool_calls: Option<Vec<ToolCallRequest>>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub tool_call_id: Option<String>,
}

impl ChatMessage {
	pub fn system(content: impl Into<String>) -> Self {
		Self { role: "system".to_string(), content: content.into(), tool_calls: None, tool_call_id: None }
	}

	pub fn user(content: impl Into<String>) -> Self {
		Self { role: "user".to_string(), content: content.into(), tool_calls: None, tool_call_id: None }
	}

	pub fn assistant(content: impl Into<String>) -> Self {
		Self {
			role: "assistant".to_string(),
			content: content.into(),
			tool_calls: None,
			tool_call_id: None,
		}
	}

	pub fn assistant_with_tools(content: impl Into<String>, tool_calls: Vec<ToolCallRequest>) -> Self {
		Self {
			role: "assistant".to_string(),
			content: content.into(),
			tool_calls: Some(tool_calls),
			tool_call_id: None,
		}
	}

	pub fn tool(tool_call_id: impl Into<String>, content: impl Into<String>) -> Self {
		Self {
			role: "tool".to_string(),
			content: content.into(),
			tool_calls: None,
			tool_call_id: Some(tool_call_id.into()),
		}
	}
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ToolCallRequest {
	pub id: String,
	pub name: String,
	/// JSON-encoded arguments exactly as the model produced them.
	pub arguments: String,
}

#[derive(Clone, Debug)]
pub struct ToolDefinition {
	pub name: String,
	pub description: String,
	pub parameters: Value,
}

#[derive(Clone, Debug)]
pub enum ChatDelta {
	Text(String),
	ToolCall(ToolCallRequest),
	Finished { reason: Option<String> },
}

/// Opens a streaming completion request. The returned stream owns its
/// connection; dropping it aborts the transfer.
pub fn stream_chat(
	cfg: &ChatProviderConfig,
	messages: Vec<ChatMessage>,
	tools: Vec<ToolDefinition>,
) -> impl Stream<Item = Result<ChatDelta>> + Send + 'static {
	let cfg = cfg.clone();

	try_stream! {
		let client =
			Client::builder().connect_timeout(Duration::from_millis(cfg.timeout_ms)).build()?;
		let url = format!("{}{}", cfg.api_base, cfg.path);
		let body = serde_json::json!({
			"model": cfg.model,
			"temperature": cfg.temperature,
			"stream": true,
			"messages": wire_messages(&messages),
			"tools": wire_tools(&tools),
		});
		let res = client
			.post(url)
			.headers(crate::auth_headers(&cfg.api_key, &cfg.default_headers)?)
			.json(&body)
			.send()
			.await?
			.error_for_status()?;
		let mut body_stream = res.bytes_stream();
		let mut buffer = String::new();
		let mut accumulator = StreamAccumulator::default();

		'outer: while let Some(bytes) = body_stream.next().await {
			buffer.push_str(&String::from_utf8_lossy(&bytes?));

			while let Some(line_end) = buffer.find('\n') {
				let line = buffer[..line_end].trim().to_string();

				buffer.drain(..=line_end);

				let Some(payload) = line.strip_prefix("data:") else {
					continue;
				};

				for delta in accumulator.push_data(payload.trim())? {
					yield delta;
				}
				if accumulator.finished() {
					break 'outer;
				}
			}
		}

		// Connection closed without a terminator; surface whatever is pending.
		for delta in accumulator.close() {
			yield delta;
		}
	}
}

fn wire_messages(messages: &[ChatMessage]) -> Vec<Value> {
	messages
		.iter()
		.map(|message| {
			let mut wire = serde_json::json!({
				"role": message.role,
				"content": message.content,
			});

			if let Some(tool_calls) = &message.tool_calls {
				wire["tool_calls"] = tool_calls
					.iter()
					.map(|call| {
						serde_json::json!({
							"id": call.id,
							"type": "function",
							"function": { "name": call.name, "arguments": call.arguments },
						})
					})
					.collect();
			}
			if let Some(tool_call_id) = &message.tool_call_id {
				wire["tool_call_id"] = Value::String(tool_call_id.clone());
			}

			wire
		})
		.collect()
}

fn wire_tools(tools: &[ToolDefinition]) -> Vec<Value> {
	tools
		.iter()
		.map(|tool| {
			serde_json::json!({
				"type": "function",
				"function": {
					"name": tool.name,
					"description": tool.description,
					"parameters": tool.parameters,
				},
			})
		})
		.collect()
}

#[derive(Debug, Default)]
struct StreamAccumulator {
	pending: BTreeMap<u32, PendingToolCall>,
	finished: bool,
}

#[derive(Debug, Default)]
struct PendingToolCall {
	id: String,
	name: String,
	arguments: String,
}

impl StreamAccumulator {
	fn push_data(&mut self, payload: &str) -> Result<Vec<ChatDelta>> {
		if self.finished {
			return Ok(Vec::new());
		}
		if payload == "[DONE]" {
			return Ok(self.complete(None));
		}

		let chunk: StreamChunk = serde_json::from_str(payload)?;
		let mut deltas = Vec::new();

		for choice in chunk.choices {
			if let Some(content) = choice.delta.content
				&& !content.is_empty()
			{
				deltas.push(ChatDelta::Text(content));
			}
			if let Some(calls) = choice.delta.tool_calls {
				for call in calls {
					let entry = self.pending.entry(call.index).or_default();

					if let Some(id) = call.id {
						entry.id = id;
					}
					if let Some(function) = call.function {
						if let Some(name) = function.name {
							entry.name.push_str(&name);
						}
						if let Some(arguments) = function.arguments {
							entry.arguments.push_str(&arguments);
						}
					}
				}
			}
			if let Some(reason) = choice.finish_reason {
				deltas.extend(self.complete(Some(reason)));
			}
		}

		Ok(deltas)
	}

	fn finished(&self) -> bool {
		self.finished
	}

	fn close(&mut self) -> Vec<ChatDelta> {
		if self.finished { Vec::new() } else { self.complete(None) }
	}

	fn complete(&mut self, reason: Option<String>) -> Vec<ChatDelta> {
		self.finished = true;

		let mut deltas = Vec::new();

		for (_, call) in std::mem::take(&mut self.pending) {
			deltas.push(ChatDelta::ToolCall(ToolCallRequest {
				id: call.id,
				name: call.name,
				arguments: call.arguments,
			}));
		}

		deltas.push(ChatDelta::Finished { reason });

		deltas
	}
}

#[derive(Debug, Deserialize)]
struct StreamChunk {
	#[serde(default)]
	choices: Vec<StreamChoice>,
}

#[derive(Debug, Deserialize)]
struct StreamChoice {
	#[serde(default)]
	delta: StreamDelta,
	#[serde(default)]
	finish_reason: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct StreamDelta {
	#[serde(default)]
	content: Option<String>,
	#[serde(default)]
	tool_calls: Option<Vec<StreamToolCall>>,
}

#[derive(Debug, Deserialize)]
struct StreamToolCall {
	#[serde(default)]
	index: u32,
	#[serde(default)]
	id: Option<String>,
	#[serde(default)]
	function: Option<StreamFunction>,
}

#[derive(Debug, Deserialize)]
struct StreamFunction {
	#[serde(default)]
	name: Option<String>,
	#[serde(default)]
	arguments: Option<String>,
}
