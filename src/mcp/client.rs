//! MCP Client
//!
//! One protocol session from the agent to the tool server, over either a
//! spawned child process (stdio) or an HTTP+SSE connection. Requests are
//! strictly sequential - one outstanding round trip at a time - so matching
//! responses to requests is a linear scan of the incoming stream.

use std::pin::Pin;
use std::process::Stdio;

use anyhow::{anyhow, bail, Context, Result};
use futures::stream::{Stream, StreamExt};
use serde_json::Value;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, Lines};
use tokio::process::{Child, ChildStdin, ChildStdout, Command};
use tracing::{debug, info};

use super::protocol::*;

/// Client half of one MCP session
pub struct McpClient {
    transport: Transport,
    next_id: u64,
    tools: Vec<Tool>,
}

enum Transport {
    Stdio {
        // Held so the server process dies with the session
        _child: Child,
        stdin: ChildStdin,
        lines: Lines<BufReader<ChildStdout>>,
    },
    Sse {
        http: reqwest::Client,
        /// `http://host:port`
        origin: String,
        /// Session message endpoint announced by the server
        endpoint: String,
        events: SseReader,
    },
}

impl McpClient {
    /// Spawn the server binary and speak MCP over its pipes. The server's
    /// stderr is inherited so its logs stay visible.
    pub async fn connect_stdio(command: &str, args: &[String]) -> Result<Self> {
        info!(command, "Spawning MCP server");
        let mut child = Command::new(command)
            .args(args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .kill_on_drop(true)
            .spawn()
            .with_context(|| format!("spawning {command}"))?;

        let stdin = child.stdin.take().context("child stdin unavailable")?;
        let stdout = child.stdout.take().context("child stdout unavailable")?;

        let mut client = Self {
            transport: Transport::Stdio {
                _child: child,
                stdin,
                lines: BufReader::new(stdout).lines(),
            },
            next_id: 0,
            tools: Vec::new(),
        };
        client.handshake().await?;
        Ok(client)
    }

    /// Connect to a running server over HTTP+SSE. `origin` is
    /// `http://host:port`; the server announces the per-session message
    /// endpoint as the first stream event.
    pub async fn connect_sse(origin: &str) -> Result<Self> {
        let http = reqwest::Client::builder()
            .connect_timeout(std::time::Duration::from_secs(10))
            .build()
            .context("building HTTP client")?;

        let sse_url = format!("{origin}/sse");
        info!(url = %sse_url, "Connecting to MCP server");
        let response = http
            .get(&sse_url)
            .send()
            .await
            .with_context(|| format!("connecting to {sse_url}"))?
            .error_for_status()
            .context("SSE handshake rejected")?;

        let mut events = SseReader::new(response.bytes_stream());
        let endpoint = loop {
            let event = events.next_event().await.context("awaiting endpoint event")?;
            if event.name == "endpoint" {
                break event.data;
            }
        };
        debug!(%endpoint, "session endpoint received");

        let mut client = Self {
            transport: Transport::Sse {
                http,
                origin: origin.to_string(),
                endpoint,
                events,
            },
            next_id: 0,
            tools: Vec::new(),
        };
        client.handshake().await?;
        Ok(client)
    }

    /// Tool descriptors discovered during the handshake
    pub fn tools(&self) -> &[Tool] {
        &self.tools
    }

    /// `initialize` + `notifications/initialized` + `tools/list`. Any
    /// failure here is fatal for the session.
    async fn handshake(&mut self) -> Result<()> {
        let init = self
            .request(
                "initialize",
                serde_json::json!({
                    "protocolVersion": PROTOCOL_VERSION,
                    "capabilities": {},
                    "clientInfo": {
                        "name": "zerodha-mcp-agent",
                        "version": env!("CARGO_PKG_VERSION"),
                    },
                }),
            )
            .await
            .context("initialize failed")?;
        let init: InitializeResult =
            serde_json::from_value(init).context("malformed initialize result")?;
        info!(
            server = %init.server_info.name,
            version = %init.server_info.version,
            "MCP session established"
        );

        self.send(&Request::notification("notifications/initialized"))
            .await?;

        let list = self
            .request("tools/list", Value::Null)
            .await
            .context("tools/list failed")?;
        let list: ListToolsResult =
            serde_json::from_value(list).context("malformed tools/list result")?;
        info!(count = list.tools.len(), "tools discovered");
        self.tools = list.tools;
        Ok(())
    }

    /// Invoke one tool. A result with `is_error` set is still `Ok` - the
    /// caller surfaces it to the model as an error observation.
    pub async fn call_tool(&mut self, name: &str, arguments: Value) -> Result<CallToolResult> {
        let result = self
            .request(
                "tools/call",
                serde_json::json!({"name": name, "arguments": arguments}),
            )
            .await?;
        serde_json::from_value(result).context("malformed tools/call result")
    }

    async fn request(&mut self, method: &str, params: Value) -> Result<Value> {
        self.next_id += 1;
        let id = self.next_id;
        self.send(&Request::new(id, method, params)).await?;

        // Sequential discipline: scan incoming messages until our id shows up
        loop {
            let response = self.receive().await?;
            if response.id != Value::from(id) {
                debug!(?response.id, "skipping stale response");
                continue;
            }
            if let Some(error) = response.error {
                bail!("{method} failed ({}): {}", error.code, error.message);
            }
            return response
                .result
                .ok_or_else(|| anyhow!("{method} returned neither result nor error"));
        }
    }

    async fn send(&mut self, request: &Request) -> Result<()> {
        match &mut self.transport {
            Transport::Stdio { stdin, .. } => {
                let mut line = serde_json::to_vec(request).context("encoding request")?;
                line.push(b'\n');
                stdin.write_all(&line).await.context("writing to server")?;
                stdin.flush().await.context("flushing to server")?;
            }
            Transport::Sse {
                http,
                origin,
                endpoint,
                ..
            } => {
                let url = format!("{origin}{endpoint}");
                http.post(&url)
                    .header("Content-Type", "application/json")
                    .body(serde_json::to_string(request).context("encoding request")?)
                    .send()
                    .await
                    .with_context(|| format!("posting to {url}"))?
                    .error_for_status()
                    .context("server rejected request")?;
            }
        }
        Ok(())
    }

    async fn receive(&mut self) -> Result<Response> {
        match &mut self.transport {
            Transport::Stdio { lines, .. } => loop {
                let line = lines
                    .next_line()
                    .await
                    .context("reading from server")?
                    .context("server closed the connection")?;
                if line.trim().is_empty() {
                    continue;
                }
                return serde_json::from_str(&line).context("malformed response");
            },
            Transport::Sse { events, .. } => loop {
                let event = events.next_event().await?;
                if event.name == "message" {
                    return serde_json::from_str(&event.data).context("malformed response");
                }
            },
        }
    }
}

/// One parsed server-sent event
struct SseEvent {
    name: String,
    data: String,
}

/// Minimal SSE parser over a byte stream: comment lines (keep-alives) are
/// skipped, events are delimited by blank lines.
struct SseReader {
    stream: Pin<Box<dyn Stream<Item = reqwest::Result<bytes::Bytes>> + Send>>,
    buffer: String,
}

impl SseReader {
    fn new(stream: impl Stream<Item = reqwest::Result<bytes::Bytes>> + Send + 'static) -> Self {
        Self {
            stream: Box::pin(stream),
            buffer: String::new(),
        }
    }

    async fn next_event(&mut self) -> Result<SseEvent> {
        loop {
            if let Some(event) = self.drain_event() {
                return Ok(event);
            }
            let chunk = self
                .stream
                .next()
                .await
                .context("SSE stream closed")?
                .context("SSE stream failed")?;
            self.buffer.push_str(&String::from_utf8_lossy(&chunk));
        }
    }

    /// Pop the first complete event block out of the buffer, if any.
    fn drain_event(&mut self) -> Option<SseEvent> {
        loop {
            let boundary = self.buffer.find("\n\n")?;
            let block: String = self.buffer.drain(..boundary + 2).collect();

            let mut name = String::from("message");
            let mut data = Vec::new();
            for line in block.lines() {
                if let Some(value) = line.strip_prefix("event:") {
                    name = value.trim().to_string();
                } else if let Some(value) = line.strip_prefix("data:") {
                    data.push(value.trim_start().to_string());
                }
                // Anything else (comments, ids) is ignored
            }
            if data.is_empty() && name == "message" {
                // Keep-alive block; try the next one
                continue;
            }
            return Some(SseEvent {
                name,
                data: data.join("\n"),
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::stream;

    fn reader_from(chunks: Vec<&str>) -> SseReader {
        let owned: Vec<reqwest::Result<bytes::Bytes>> = chunks
            .into_iter()
            .map(|c| Ok(bytes::Bytes::copy_from_slice(c.as_bytes())))
            .collect();
        SseReader::new(stream::iter(owned))
    }

    #[tokio::test]
    async fn parses_endpoint_then_message_events() {
        let mut reader = reader_from(vec![
            "event: endpoint\ndata: /messages?session_id=abc\n\n",
            "event: message\ndata: {\"jsonrpc\":\"2.0\",\"id\":1,\"result\":{}}\n\n",
        ]);

        let first = reader.next_event().await.unwrap();
        assert_eq!(first.name, "endpoint");
        assert_eq!(first.data, "/messages?session_id=abc");

        let second = reader.next_event().await.unwrap();
        assert_eq!(second.name, "message");
        assert!(second.data.contains("\"id\":1"));
    }

    #[tokio::test]
    async fn events_survive_chunk_splits() {
        // The byte stream can split anywhere, including mid-line
        let mut reader = reader_from(vec!["event: end", "point\ndata: /messages", "?x=1\n\n"]);
        let event = reader.next_event().await.unwrap();
        assert_eq!(event.name, "endpoint");
        assert_eq!(event.data, "/messages?x=1");
    }

    #[tokio::test]
    async fn keep_alive_comments_are_skipped() {
        let mut reader = reader_from(vec![
            ": keep-alive\n\n",
            "event: message\ndata: {}\n\n",
        ]);
        let event = reader.next_event().await.unwrap();
        assert_eq!(event.name, "message");
        assert_eq!(event.data, "{}");
    }

    #[tokio::test]
    async fn closed_stream_is_an_error() {
        let mut reader = reader_from(vec![]);
        assert!(reader.next_event().await.is_err());
    }
}
