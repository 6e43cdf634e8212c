use anyhow::{Context, Result};
use kglens::{Dataset, EngineConfig, RenderAdapter, Session, TextMap, VisNetworkRenderer};
use serde::Deserialize;
use serde_json::{json, Value as JsonValue};
use std::env;
use std::io::{self, BufRead, BufReader, Read, Write};
use tracing_subscriber::EnvFilter;

const MAX_MESSAGE_BYTES: usize = 1_048_576; // 1 MiB
const MAX_QUERY_BYTES: usize = 8 * 1024; // 8 KiB
const MAX_SOURCE_NAME_BYTES: usize = 512;

struct AppState {
    session: Session,
    renderer: VisNetworkRenderer,
}

impl AppState {
    fn open() -> Result<Self> {
        let config = EngineConfig::from_env().context("invalid engine configuration")?;
        let mut session = Session::new(config);
        if let Ok(path) = env::var("KGLENS_DATASET") {
            let status = session
                .load_path(&path)
                .with_context(|| format!("failed to load dataset {path}"))?;
            tracing::info!("{status}");
        }
        Ok(Self::with_session(session))
    }

    fn with_session(session: Session) -> Self {
        Self {
            session,
            renderer: VisNetworkRenderer::default(),
        }
    }
}

#[derive(Deserialize)]
struct LoadDatasetArgs {
    triples: Vec<JsonValue>,
    #[serde(default)]
    texts: TextMap,
    name: Option<String>,
}

fn init_tracing() {
    // stdout carries the protocol; logs go to stderr.
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .with_ansi(false)
        .init();
}

fn main() -> Result<()> {
    init_tracing();
    let mut state = AppState::open().context("failed to start kglens session")?;
    let stdin = io::stdin();
    let mut reader = BufReader::new(stdin.lock());
    let stdout = io::stdout();
    let mut writer = stdout.lock();

    loop {
        let maybe = match read_message(&mut reader) {
            Ok(m) => m,
            Err(e) => {
                // Malformed framing should not kill the server: return JSON-RPC
                // parse error (-32700) and continue reading the next message.
                tracing::warn!(error = %e, "rejected malformed message");
                let err_resp = json!({
                    "jsonrpc": "2.0",
                    "id": null,
                    "error": { "code": -32700, "message": format!("Parse error: {e}") }
                });
                write_message(&mut writer, &err_resp)?;
                continue;
            }
        };
        let Some(request) = maybe else {
            break;
        };
        if let Some(response) = handle_request(&mut state, &request) {
            write_message(&mut writer, &response)?;
        }
    }

    Ok(())
}

/// Read one Content-Length frame.
///
/// The header block is always consumed up to its blank line before a bad
/// header is reported, and an oversized payload is skipped, so the next call
/// starts on a frame boundary.
fn read_message<R: BufRead>(reader: &mut R) -> Result<Option<JsonValue>> {
    let mut content_length: Option<usize> = None;
    let mut bad_header: Option<String> = None;

    loop {
        let mut line = String::new();
        let n = reader.read_line(&mut line)?;
        if n == 0 {
            return Ok(None);
        }

        let trimmed = line.trim_end_matches(['\r', '\n']);
        if trimmed.is_empty() {
            break;
        }

        match trimmed.split_once(':') {
            Some((name, value)) if name.eq_ignore_ascii_case("Content-Length") => {
                match value.trim().parse::<usize>() {
                    Ok(len) => content_length = Some(len),
                    Err(_) => {
                        bad_header.get_or_insert_with(|| format!("invalid Content-Length {value:?}"));
                    }
                }
            }
            Some(_) => {}
            None => {
                bad_header.get_or_insert_with(|| format!("malformed header line {trimmed:?}"));
            }
        }
    }

    if let Some(reason) = bad_header {
        if let Some(len) = content_length {
            skip_payload(reader, len)?;
        }
        anyhow::bail!(reason);
    }
    let len = content_length.context("missing Content-Length header")?;
    if len > MAX_MESSAGE_BYTES {
        skip_payload(reader, len)?;
        anyhow::bail!(
            "Content-Length {} exceeds max allowed {} bytes",
            len,
            MAX_MESSAGE_BYTES
        );
    }
    let mut payload = vec![0_u8; len];
    reader.read_exact(&mut payload)?;
    let value: JsonValue = serde_json::from_slice(&payload).context("invalid JSON payload")?;
    Ok(Some(value))
}

fn skip_payload<R: BufRead>(reader: &mut R, len: usize) -> Result<()> {
    io::copy(&mut reader.by_ref().take(len as u64), &mut io::sink())?;
    Ok(())
}

fn write_message<W: Write>(writer: &mut W, value: &JsonValue) -> Result<()> {
    let payload = serde_json::to_vec(value)?;
    write!(writer, "Content-Length: {}\r\n\r\n", payload.len())?;
    writer.write_all(&payload)?;
    writer.flush()?;
    Ok(())
}

fn handle_request(state: &mut AppState, req: &JsonValue) -> Option<JsonValue> {
    let id = req.get("id").cloned();
    let method = req.get("method").and_then(JsonValue::as_str)?;

    match method {
        "initialize" => id.map(|id_val| {
            json!({
                "jsonrpc": "2.0",
                "id": id_val,
                "result": {
                    "protocolVersion": "2024-11-05",
                    "capabilities": { "tools": {} },
                    "serverInfo": { "name": "kglens-mcp", "version": env!("CARGO_PKG_VERSION") }
                }
            })
        }),
        "notifications/initialized" => None,
        "tools/list" => id.map(|id_val| {
            json!({
                "jsonrpc": "2.0",
                "id": id_val,
                "result": {
                    "tools": tools_schema(state.session.config())
                }
            })
        }),
        "tools/call" => id.map(|id_val| {
            let result = call_tool(state, req.get("params"));
            match result {
                Ok(tool_result) => json!({
                    "jsonrpc": "2.0",
                    "id": id_val,
                    "result": tool_result
                }),
                Err(err) => {
                    tracing::warn!(error = %err, "tool call failed");
                    json!({
                        "jsonrpc": "2.0",
                        "id": id_val,
                        "result": {
                            "content": [{ "type": "text", "text": format!("tool error: {err:#}") }],
                            "isError": true
                        }
                    })
                }
            }
        }),
        "ping" => id.map(|id_val| json!({ "jsonrpc": "2.0", "id": id_val, "result": {} })),
        _ => id.map(|id_val| {
            json!({
                "jsonrpc": "2.0",
                "id": id_val,
                "error": {
                    "code": -32601,
                    "message": format!("method not found: {method}")
                }
            })
        }),
    }
}

fn tools_schema(config: &EngineConfig) -> Vec<JsonValue> {
    let limits = &config.limits;
    vec![
        json!({
            "name": "load_dataset",
            "description": "Replace the knowledge graph with uploaded rows. Every row must have subject, predicate and object columns.",
            "inputSchema": {
                "type": "object",
                "properties": {
                    "triples": {
                        "type": "array",
                        "items": {
                            "type": "object",
                            "properties": {
                                "subject": {},
                                "predicate": {},
                                "object": {}
                            },
                            "required": ["subject", "predicate", "object"]
                        }
                    },
                    "texts": {
                        "description": "Descriptive sentences per entity: {label: text | [text]} or [{entity, text}].",
                        "type": ["object", "array"]
                    },
                    "name": {"type": "string"}
                },
                "required": ["triples"]
            }
        }),
        json!({
            "name": "load_demo",
            "description": "Reload the built-in demo knowledge graph.",
            "inputSchema": { "type": "object", "properties": {} }
        }),
        json!({
            "name": "search",
            "description": "Semantic search over graph nodes; returns ranked matches and the subgraph around them.",
            "inputSchema": {
                "type": "object",
                "properties": {
                    "query": {"type": "string"},
                    "top_k": {
                        "type": "integer",
                        "minimum": 1,
                        "maximum": limits.max_top_k,
                        "default": limits.default_top_k
                    },
                    "depth": {
                        "type": "integer",
                        "minimum": 0,
                        "maximum": limits.max_depth,
                        "default": limits.default_depth
                    }
                },
                "required": ["query"]
            }
        }),
        json!({
            "name": "graph",
            "description": "Render the full knowledge graph.",
            "inputSchema": { "type": "object", "properties": {} }
        }),
        json!({
            "name": "status",
            "description": "Loaded dataset, index backend and any fallback warnings.",
            "inputSchema": { "type": "object", "properties": {} }
        }),
    ]
}

fn call_tool(state: &mut AppState, params: Option<&JsonValue>) -> Result<JsonValue> {
    let name = params
        .and_then(|v| v.get("name"))
        .and_then(JsonValue::as_str)
        .context("missing tool name")?;
    let args = params
        .and_then(|v| v.get("arguments"))
        .cloned()
        .unwrap_or_else(|| json!({}));

    match name {
        "load_dataset" => {
            let args: LoadDatasetArgs =
                serde_json::from_value(args).context("invalid load_dataset arguments")?;
            let source = args.name.unwrap_or_else(|| "uploaded dataset".to_string());
            if source.len() > MAX_SOURCE_NAME_BYTES {
                anyhow::bail!(
                    "name exceeds max allowed size ({} bytes)",
                    MAX_SOURCE_NAME_BYTES
                );
            }
            let dataset = Dataset::from_rows(&args.triples, args.texts, source)?;
            let status = state.session.load(dataset);
            Ok(json!({
                "content": [{ "type": "text", "text": status }],
                "structuredContent": state.session.status()
            }))
        }
        "load_demo" => {
            let status = state.session.load(Dataset::demo());
            Ok(json!({
                "content": [{ "type": "text", "text": status }],
                "structuredContent": state.session.status()
            }))
        }
        "search" => {
            let query = args
                .get("query")
                .and_then(JsonValue::as_str)
                .context("query is required")?;
            if query.len() > MAX_QUERY_BYTES {
                anyhow::bail!("query exceeds max allowed size ({} bytes)", MAX_QUERY_BYTES);
            }
            let config = state.session.config();
            let limits = config.limits;
            let height = config.subgraph_height;
            let top_k = usize_arg(&args, "top_k")?.unwrap_or(limits.default_top_k);
            let depth = usize_arg(&args, "depth")?.unwrap_or(limits.default_depth);
            limits.check(top_k, depth)?;

            let outcome = state.session.search(query, top_k, depth)?;
            let mut text = outcome.status.clone();
            for m in &outcome.matches {
                text.push_str(&format!("\n{}\t{:.4}", m.label, m.score));
            }
            Ok(json!({
                "content": [{ "type": "text", "text": text }],
                "structuredContent": {
                    "status": outcome.status,
                    "matches": outcome.matches,
                    "subgraph": state.renderer.render(&outcome.subgraph, height),
                    "warnings": state.session.warnings()
                }
            }))
        }
        "graph" => {
            let height = state.session.config().render_height;
            let graph = state.session.graph();
            Ok(json!({
                "content": [{
                    "type": "text",
                    "text": format!("{} nodes, {} edges", graph.node_count(), graph.edge_count())
                }],
                "structuredContent": state.renderer.render(graph, height)
            }))
        }
        "status" => {
            let status = state.session.status();
            let backend = status
                .index
                .as_ref()
                .map(|s| s.backend.as_str())
                .unwrap_or("not built");
            Ok(json!({
                "content": [{
                    "type": "text",
                    "text": format!(
                        "{}: {} triples, {} nodes, index {}",
                        status.source, status.triples, status.nodes, backend
                    )
                }],
                "structuredContent": status
            }))
        }
        _ => anyhow::bail!("unknown tool: {name}"),
    }
}

fn usize_arg(args: &JsonValue, key: &str) -> Result<Option<usize>> {
    match args.get(key) {
        None | Some(JsonValue::Null) => Ok(None),
        Some(v) => {
            let n = v
                .as_u64()
                .with_context(|| format!("{key} must be a non-negative integer"))?;
            Ok(Some(usize::try_from(n).context("value out of range")?))
        }
    }
}
