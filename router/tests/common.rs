use anyhow::Result;
use serde_json::{json, Value};
use std::io::{BufRead, BufReader, Read, Write};
use std::net::{TcpListener, TcpStream};

/// Answer words, and the question word that must be present for them to be picked
const ANSWERS: [(&str, &str); 2] = [("Hamlet", "Shakespeare"), ("Paris", "France")];

fn answer(example: &Value) -> Value {
    let words = |field: &str| -> Vec<String> {
        example[field]
            .as_array()
            .map(|words| {
                words
                    .iter()
                    .filter_map(|w| w.as_str().map(String::from))
                    .collect()
            })
            .unwrap_or_default()
    };
    let question = words("question");
    let passage = words("passage");
    let candidates = example.get("candidates").map(|_| words("candidates"));

    for (cue, target) in ANSWERS {
        if !question.iter().any(|w| w == cue) {
            continue;
        }
        if let Some(candidates) = &candidates {
            if !candidates.iter().any(|c| c == target) {
                continue;
            }
        }
        if let Some(position) = passage.iter().position(|w| w == target) {
            return json!({"start": position, "end": position, "score": 0.75});
        }
    }
    Value::Null
}

fn handle(stream: TcpStream) -> Result<()> {
    let mut reader = BufReader::new(stream.try_clone()?);

    let mut request_line = String::new();
    reader.read_line(&mut request_line)?;

    let mut content_length = 0;
    loop {
        let mut header = String::new();
        reader.read_line(&mut header)?;
        let header = header.trim();
        if header.is_empty() {
            break;
        }
        if let Some((name, value)) = header.split_once(':') {
            if name.eq_ignore_ascii_case("content-length") {
                content_length = value.trim().parse()?;
            }
        }
    }
    let mut body = vec![0; content_length];
    reader.read_exact(&mut body)?;

    let response = if request_line.starts_with("GET /health") {
        json!({})
    } else if request_line.starts_with("POST /predict") {
        let request: Value = serde_json::from_slice(&body)?;
        let spans: Vec<Value> = request["examples"]
            .as_array()
            .map(|examples| examples.iter().map(answer).collect())
            .unwrap_or_default();
        json!({ "spans": spans })
    } else {
        anyhow::bail!("Unexpected request {request_line}");
    };

    let body = response.to_string();
    let mut stream = stream;
    write!(
        stream,
        "HTTP/1.1 200 OK\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
        body.len()
    )?;
    stream.flush()?;
    Ok(())
}

/// Start a reader service on a free port and return its URL
pub fn start_reader() -> Result<String> {
    let listener = TcpListener::bind("127.0.0.1:0")?;
    let url = format!("http://{}", listener.local_addr()?);

    std::thread::spawn(move || {
        for stream in listener.incoming().flatten() {
            if let Err(err) = handle(stream) {
                eprintln!("Reader stub failed: {err}");
            }
        }
    });
    Ok(url)
}
