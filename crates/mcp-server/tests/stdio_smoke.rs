use serde_json::Value;
use std::io::{BufRead, BufReader, Write};
use std::process::{Command, Stdio};
use tempfile::NamedTempFile;

fn write_mcp_message(stdin: &mut impl Write, payload: &Value) {
    let body = serde_json::to_vec(payload).unwrap();
    write!(stdin, "Content-Length: {}\r\n\r\n", body.len()).unwrap();
    stdin.write_all(&body).unwrap();
    stdin.flush().unwrap();
}

fn read_mcp_message(stdout: &mut impl BufRead) -> Value {
    let mut content_length: Option<usize> = None;
    loop {
        let mut line = String::new();
        let n = stdout.read_line(&mut line).unwrap();
        assert!(n > 0, "unexpected EOF");
        let trimmed = line.trim_end_matches(['\r', '\n']);
        if trimmed.is_empty() {
            break;
        }
        if let Some((name, value)) = trimmed.split_once(':') {
            if name.eq_ignore_ascii_case("Content-Length") {
                content_length = Some(value.trim().parse::<usize>().unwrap());
            }
        }
    }
    let len = content_length.expect("missing Content-Length");
    let mut buf = vec![0_u8; len];
    stdout.read_exact(&mut buf).unwrap();
    serde_json::from_slice(&buf).unwrap()
}

fn spawn(dataset: Option<&std::path::Path>) -> std::process::Child {
    let bin = env!("CARGO_BIN_EXE_kglens-mcp");
    let mut cmd = Command::new(bin);
    cmd.env("KGLENS_BACKEND", "sparse")
        .env("RUST_LOG", "warn")
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::null());
    if let Some(path) = dataset {
        cmd.env("KGLENS_DATASET", path);
    }
    cmd.spawn().unwrap()
}

#[test]
fn stdio_server_initialize_and_search() {
    let mut child = spawn(None);
    let mut stdin = child.stdin.take().unwrap();
    let mut stdout = BufReader::new(child.stdout.take().unwrap());

    write_mcp_message(
        &mut stdin,
        &serde_json::json!({
            "jsonrpc": "2.0",
            "id": 1,
            "method": "initialize",
            "params": {}
        }),
    );
    let init = read_mcp_message(&mut stdout);
    assert_eq!(init["id"], 1);
    assert_eq!(init["result"]["serverInfo"]["name"], "kglens-mcp");

    write_mcp_message(
        &mut stdin,
        &serde_json::json!({
            "jsonrpc": "2.0",
            "id": 2,
            "method": "tools/call",
            "params": {
                "name": "search",
                "arguments": { "query": "solar activity", "top_k": 3, "depth": 1 }
            }
        }),
    );
    let search = read_mcp_message(&mut stdout);
    assert_eq!(search["id"], 2);
    let matches = search["result"]["structuredContent"]["matches"]
        .as_array()
        .unwrap();
    assert_eq!(matches.len(), 3);
    assert!(search["result"]["structuredContent"]["subgraph"]["nodes"].is_array());

    // Stop child cleanly.
    drop(stdin);
    let _ = child.wait();
}

#[test]
fn stdio_server_loads_dataset_from_env_and_survives_bad_frames() {
    let mut file = NamedTempFile::new().unwrap();
    write!(
        file,
        r#"{{"triples":[{{"subject":"Sun","predicate":"is_a","object":"Star"}},{{"subject":"Sun","predicate":"related_to","object":"Astrophysics"}}]}}"#
    )
    .unwrap();
    file.flush().unwrap();

    let mut child = spawn(Some(file.path()));
    let mut stdin = child.stdin.take().unwrap();
    let mut stdout = BufReader::new(child.stdout.take().unwrap());

    // Valid frame carrying invalid JSON: parse error, server keeps going.
    write!(stdin, "Content-Length: 3\r\n\r\n{{{{x").unwrap();
    stdin.flush().unwrap();
    let parse_err = read_mcp_message(&mut stdout);
    assert_eq!(parse_err["error"]["code"], -32700);

    write_mcp_message(
        &mut stdin,
        &serde_json::json!({
            "jsonrpc": "2.0",
            "id": 3,
            "method": "tools/call",
            "params": { "name": "status", "arguments": {} }
        }),
    );
    let status = read_mcp_message(&mut stdout);
    assert_eq!(status["result"]["structuredContent"]["triples"], 2);
    assert_eq!(status["result"]["structuredContent"]["nodes"], 3);

    drop(stdin);
    let _ = child.wait();
}
