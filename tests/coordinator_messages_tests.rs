use speech_worker::coordinator::{Inbound, RequestDescriptor, Status, StatusEvent, EOS_MARKER};
use tokio_tungstenite::tungstenite::Message;

#[test]
fn test_transcript_serialization() {
    let event = StatusEvent::transcript("hello world", false);

    let json = serde_json::to_string(&event).unwrap();
    assert!(json.contains("\"status\":0"));
    assert!(json.contains("\"transcript\":\"hello world\""));
    assert!(json.contains("\"final\":false"));

    let deserialized: StatusEvent = serde_json::from_str(&json).unwrap();
    assert_eq!(deserialized, event);
    assert_eq!(deserialized.first_transcript(), Some("hello world"));
}

#[test]
fn test_final_transcript_shape() {
    let event = StatusEvent::transcript("done", true);

    let value = serde_json::to_value(&event).unwrap();
    assert_eq!(
        value,
        serde_json::json!({
            "status": 0,
            "result": {
                "hypotheses": [{ "transcript": "done" }],
                "final": true
            }
        })
    );
}

#[test]
fn test_no_speech_has_no_result() {
    let json = serde_json::to_string(&StatusEvent::no_speech()).unwrap();
    assert_eq!(json, "{\"status\":1}");

    let deserialized: StatusEvent = serde_json::from_str(&json).unwrap();
    assert_eq!(deserialized.status, Status::NoSpeech);
    assert!(deserialized.first_transcript().is_none());
}

#[test]
fn test_status_codes() {
    let expected = [
        (Status::Eos, -1),
        (Status::Success, 0),
        (Status::NoSpeech, 1),
        (Status::Aborted, 2),
        (Status::AudioCapture, 3),
        (Status::Network, 4),
        (Status::NotAllowed, 5),
        (Status::ServiceNotAllowed, 6),
        (Status::BadGrammar, 7),
        (Status::LanguageNotSupported, 8),
        (Status::NotAvailable, 9),
    ];

    for (status, code) in expected {
        assert_eq!(status.code(), code);
        assert_eq!(Status::try_from(code).unwrap(), status);
    }

    assert!(Status::try_from(42).is_err());
    assert!(serde_json::from_str::<StatusEvent>("{\"status\": 42}").is_err());
}

#[test]
fn test_descriptor_deserialization() {
    let json = r#"{
        "id": "f1c3",
        "content_type": "audio/x-raw, layout=(string)interleaved, rate=(int)16000",
        "user_id": "someone",
        "content_id": "c-9"
    }"#;

    let descriptor: RequestDescriptor = serde_json::from_str(json).unwrap();
    assert_eq!(descriptor.id, "f1c3");
    assert!(descriptor.content_type.starts_with("audio/x-raw"));
}

#[test]
fn test_descriptor_requires_id_and_content_type() {
    assert!(serde_json::from_str::<RequestDescriptor>(r#"{"id": "x"}"#).is_err());
    assert!(serde_json::from_str::<RequestDescriptor>(r#"{"content_type": "audio/ogg"}"#).is_err());
    assert!(serde_json::from_str::<RequestDescriptor>("not json").is_err());
}

#[test]
fn test_inbound_classification() {
    assert_eq!(
        Inbound::classify(Message::text(EOS_MARKER)),
        Some(Inbound::EndOfStream)
    );
    assert_eq!(
        Inbound::classify(Message::binary(b"EOS".to_vec())),
        Some(Inbound::EndOfStream)
    );
    assert_eq!(
        Inbound::classify(Message::binary(vec![1u8, 2, 3])),
        Some(Inbound::Audio(vec![1, 2, 3]))
    );
    assert_eq!(
        Inbound::classify(Message::text("{\"id\": \"a\"}")),
        Some(Inbound::Text("{\"id\": \"a\"}".to_string()))
    );
    assert_eq!(Inbound::classify(Message::Close(None)), Some(Inbound::Closed));
    assert_eq!(Inbound::classify(Message::Ping(Vec::new().into())), None);
}

#[test]
fn test_inbound_kind() {
    assert_eq!(Inbound::EndOfStream.kind(), "end-of-stream");
    assert_eq!(Inbound::Audio(Vec::new()).kind(), "audio");
    assert_eq!(Inbound::Closed.kind(), "close");
}
