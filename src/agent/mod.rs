//! Claude-driven agent loop
//!
//! One REPL line becomes one turn: the conversation history and the
//! discovered tool catalog go to Claude, Claude decides which brokerage
//! tools to invoke, the MCP session executes them, and the results are fed
//! back until Claude produces a plain text reply. A failed tool call is
//! surfaced to the model as an error observation - the conversation
//! continues; only a failed model call ends the turn.

pub mod claude;

use anyhow::Result;
use serde_json::Value;
use tracing::{debug, warn};

use crate::mcp::protocol::{CallToolResult, Tool};
use crate::mcp::McpClient;

use claude::{ClaudeClient, ContentBlock, Message, ToolDefinition};

const SYSTEM_PROMPT: &str = "You are a trading assistant for a Zerodha brokerage account. \
    Use the available tools to answer questions about the account and to place, modify or \
    cancel orders when the user asks for it. Orders move real money: state what you are \
    about to do before calling an order tool, and report brokerage errors back to the user \
    plainly. If the brokerage reports the session is not authenticated, walk the user \
    through get_login_url and get_access_token first.";

/// Executes tool calls selected by the model. The MCP session is the real
/// implementation; tests substitute their own.
#[allow(async_fn_in_trait)]
pub trait ToolRunner {
    async fn invoke(&mut self, name: &str, arguments: Value) -> Result<CallToolResult>;
}

impl ToolRunner for McpClient {
    async fn invoke(&mut self, name: &str, arguments: Value) -> Result<CallToolResult> {
        self.call_tool(name, arguments).await
    }
}

/// Conversation state for one chat session
pub struct Agent {
    claude: ClaudeClient,
    tools: Vec<ToolDefinition>,
    history: Vec<Message>,
}

impl Agent {
    pub fn new(claude: ClaudeClient, tools: &[Tool]) -> Self {
        Self {
            claude,
            tools: tools.iter().map(ToolDefinition::from).collect(),
            history: Vec::new(),
        }
    }

    /// Run one user turn to completion and return the model's final text.
    /// Strictly sequential: one outstanding model or tool round trip at a
    /// time.
    pub async fn run_turn<R: ToolRunner>(&mut self, runner: &mut R, input: &str) -> Result<String> {
        self.history.push(Message::user_text(input));

        loop {
            let response = self
                .claude
                .send(SYSTEM_PROMPT, &self.tools, &self.history)
                .await?;

            let wants_tools = response.wants_tools();
            let text = response.text();
            let tool_uses: Vec<(String, String, Value)> = response
                .tool_uses()
                .into_iter()
                .map(|(id, name, input)| (id.to_string(), name.to_string(), input.clone()))
                .collect();

            // The assistant turn goes into history verbatim, tool_use and
            // thinking blocks included - the API requires them on replay.
            self.history.push(Message::assistant(response.content));

            if !wants_tools || tool_uses.is_empty() {
                return Ok(text);
            }

            let mut results = Vec::with_capacity(tool_uses.len());
            for (id, name, arguments) in tool_uses {
                debug!(tool = %name, "model selected tool");
                let block = match runner.invoke(&name, arguments).await {
                    Ok(result) => ContentBlock::ToolResult {
                        tool_use_id: id,
                        is_error: result.is_error,
                        content: result.text_content(),
                    },
                    Err(e) => {
                        // Mid-conversation failure: observed, not fatal
                        warn!(tool = %name, error = %e, "tool call failed");
                        ContentBlock::ToolResult {
                            tool_use_id: id,
                            content: format!("Tool call failed: {e}"),
                            is_error: true,
                        }
                    }
                };
                results.push(block);
            }
            self.history.push(Message::user_results(results));
        }
    }
}
