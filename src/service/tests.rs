use super::*;

#[test]
fn parses_every_operation() {
    let cases = [
        (
            r#"{"id":1,"op":"ingest","path":"notes.txt"}"#,
            Operation::Ingest {
                path: PathBuf::from("notes.txt"),
            },
        ),
        (
            r#"{"id":2,"op":"query","text":"hi"}"#,
            Operation::Query {
                text: "hi".to_string(),
            },
        ),
        (
            r#"{"id":3,"op":"ask","text":"hi"}"#,
            Operation::Ask {
                text: "hi".to_string(),
            },
        ),
        (
            r#"{"id":4,"op":"rag_query","text":"hi"}"#,
            Operation::RagQuery {
                text: "hi".to_string(),
                path: None,
            },
        ),
        (
            r#"{"id":5,"op":"rag_query","text":"hi","path":"a.pdf"}"#,
            Operation::RagQuery {
                text: "hi".to_string(),
                path: Some(PathBuf::from("a.pdf")),
            },
        ),
        (
            r#"{"id":6,"op":"switch_model","name":"gemma-2-2b"}"#,
            Operation::SwitchModel {
                name: "gemma-2-2b".to_string(),
            },
        ),
        (r#"{"id":7,"op":"status"}"#, Operation::Status),
    ];

    for (line, expected) in cases {
        let request = Request::parse(line).expect("request should parse");
        assert_eq!(request.operation, expected, "parsing {}", line);
    }
}

#[test]
fn request_id_is_kept_verbatim() {
    let request =
        Request::parse(r#"{"id":"abc-1","op":"status"}"#).expect("request should parse");
    assert_eq!(request.id, json!("abc-1"));

    let request = Request::parse(r#"{"op":"status"}"#).expect("request should parse");
    assert_eq!(request.id, Value::Null);
}

#[test]
fn invalid_json_is_a_bad_request() {
    let response = Request::parse("{not json").expect_err("should be rejected");

    assert!(!response.success);
    assert_eq!(response.id, Value::Null);
    assert_eq!(
        response.error.map(|e| e.kind),
        Some(BAD_REQUEST.to_string())
    );
}

#[test]
fn unknown_operation_keeps_the_id() {
    let response =
        Request::parse(r#"{"id":9,"op":"delete_everything"}"#).expect_err("should be rejected");

    assert_eq!(response.id, json!(9));
    assert_eq!(
        response.error.as_ref().map(|e| e.kind.as_str()),
        Some(BAD_REQUEST)
    );
}

#[test]
fn missing_fields_are_a_bad_request() {
    let response = Request::parse(r#"{"id":3,"op":"query"}"#).expect_err("should be rejected");

    assert_eq!(response.id, json!(3));
    assert!(
        response
            .error
            .is_some_and(|e| e.kind == BAD_REQUEST && e.message.contains("text"))
    );
}

#[test]
fn response_wire_format() {
    let ok = Response::success(json!(1), json!({ "chunks": 3 }));
    assert_eq!(
        serde_json::to_value(&ok).expect("should serialize"),
        json!({ "id": 1, "success": true, "data": { "chunks": 3 } })
    );

    let failed = Response::failure(json!(2), "PromptTooLong", "too long");
    assert_eq!(
        serde_json::to_value(&failed).expect("should serialize"),
        json!({
            "id": 2,
            "success": false,
            "error": { "kind": "PromptTooLong", "message": "too long" }
        })
    );
}
