use super::*;
use std::io::Cursor;

fn stream_of(body: &str) -> GenerateStream<BufReader<Cursor<Vec<u8>>>> {
    GenerateStream {
        lines: BufReader::new(Cursor::new(body.as_bytes().to_vec())).lines(),
        finished: false,
    }
}

#[test]
fn client_configuration() {
    let mut config = Config::with_base_dir("/tmp/ragchat");
    config.ollama.host = "test-host".to_string();
    config.ollama.port = 1234;
    config.ollama.embedding_model = "test-model".to_string();
    config.ollama.batch_size = 128;

    let client = OllamaClient::new(&config).expect("Failed to create client");

    assert_eq!(client.embedding_model, "test-model");
    assert_eq!(client.batch_size, 128);
    assert_eq!(client.base_url.host_str(), Some("test-host"));
    assert_eq!(client.base_url.port(), Some(1234));
    assert_eq!(client.retry_attempts, DEFAULT_RETRY_ATTEMPTS);
}

#[test]
fn client_builder_methods() {
    let config = Config::with_base_dir("/tmp/ragchat");
    let client = OllamaClient::new(&config)
        .expect("Failed to create client")
        .with_timeout(Duration::from_secs(60))
        .with_retry_attempts(5);

    assert_eq!(client.retry_attempts, 5);
}

#[test]
fn endpoint_joins_api_paths() {
    let config = Config::with_base_dir("/tmp/ragchat");
    let client = OllamaClient::new(&config).expect("Failed to create client");

    let url = client.endpoint("/api/embed").expect("should build url");

    assert_eq!(url.as_str(), "http://localhost:11434/api/embed");
}

#[test]
fn empty_batch_skips_the_server() {
    let mut config = Config::with_base_dir("/tmp/ragchat");
    // Nothing listens here; an empty batch must not connect at all
    config.ollama.port = 1;
    let client = OllamaClient::new(&config).expect("Failed to create client");

    let embeddings = client
        .generate_embeddings_batch(&[])
        .expect("empty batch should succeed");

    assert!(embeddings.is_empty());
}

#[test]
fn generate_request_shape() {
    let request = GenerateRequest {
        model: "phi:2.7b",
        prompt: "Hi",
        stream: true,
        keep_alive: KEEP_ALIVE,
        options: Some(GenerateOptions { num_predict: 42 }),
    };

    let value = serde_json::to_value(&request).expect("should serialize");

    assert_eq!(value["model"], "phi:2.7b");
    assert_eq!(value["stream"], true);
    assert_eq!(value["options"]["num_predict"], 42);

    let warm_up = GenerateRequest {
        model: "phi:2.7b",
        prompt: "",
        stream: false,
        keep_alive: KEEP_ALIVE,
        options: None,
    };
    let value = serde_json::to_value(&warm_up).expect("should serialize");
    assert!(value.get("options").is_none());
}

#[test]
fn stream_yields_fragments_until_done() {
    let body = concat!(
        "{\"response\":\"Hello\",\"done\":false}\n",
        "\n",
        "{\"response\":\", world\",\"done\":false}\n",
        "{\"response\":\"\",\"done\":true}\n",
        "{\"response\":\"ignored\",\"done\":false}\n",
    );

    let fragments: Vec<String> = stream_of(body)
        .collect::<Result<_>>()
        .expect("stream should parse");

    assert_eq!(fragments, vec!["Hello", ", world"]);
}

#[test]
fn stream_surfaces_runtime_errors() {
    let body = concat!(
        "{\"response\":\"partial\",\"done\":false}\n",
        "{\"error\":\"model crashed\"}\n",
    );
    let mut stream = stream_of(body);

    assert_eq!(
        stream.next().and_then(|r| r.ok()),
        Some("partial".to_string())
    );
    let err = stream
        .next()
        .expect("error item")
        .expect_err("should be an error");
    assert!(err.to_string().contains("model crashed"));
    assert!(stream.next().is_none());
}

#[test]
fn stream_rejects_malformed_lines() {
    let mut stream = stream_of("not json\n");

    assert!(matches!(stream.next(), Some(Err(_))));
    assert!(stream.next().is_none());
}

#[test]
fn models_response_parsing() {
    let json = r#"{"models":[{"name":"phi:2.7b","size":1600000000,"details":{"family":"phi2"}}]}"#;

    let parsed: ModelsResponse = serde_json::from_str(json).expect("should parse");

    assert_eq!(parsed.models.len(), 1);
    assert_eq!(parsed.models[0].name, "phi:2.7b");
    assert_eq!(
        parsed.models[0]
            .details
            .as_ref()
            .and_then(|d| d.family.as_deref()),
        Some("phi2")
    );
}
