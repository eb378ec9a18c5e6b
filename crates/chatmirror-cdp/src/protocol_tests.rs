use super::*;

#[test]
fn test_cdp_request_serialize() {
    let req = CdpRequest {
        id: 7,
        method: "Runtime.evaluate",
        params: Some(serde_json::json!({"expression": "1 + 1"})),
    };
    let json = serde_json::to_value(&req).unwrap();
    assert_eq!(json["id"], 7);
    assert_eq!(json["method"], "Runtime.evaluate");
    assert_eq!(json["params"]["expression"], "1 + 1");
}

#[test]
fn test_cdp_request_omits_empty_params() {
    let req = CdpRequest {
        id: 1,
        method: "Runtime.enable",
        params: None,
    };
    let json = serde_json::to_string(&req).unwrap();
    assert!(!json.contains("params"));
}

#[test]
fn test_decode_response() {
    let inbound = Inbound::decode(r#"{"id": 3, "result": {"value": 1}}"#).unwrap();
    match inbound {
        Inbound::Response { id, outcome } => {
            assert_eq!(id, 3);
            assert_eq!(outcome.unwrap()["value"], 1);
        }
        other => panic!("unexpected frame: {other:?}"),
    }
}

#[test]
fn test_decode_error_response() {
    let inbound = Inbound::decode(
        r#"{"id": 4, "error": {"code": -32000, "message": "Cannot find context with specified id"}}"#,
    )
    .unwrap();
    match inbound {
        Inbound::Response { id, outcome } => {
            assert_eq!(id, 4);
            let err = outcome.unwrap_err();
            assert!(matches!(err, CdpError::Protocol { code: -32000, .. }));
            assert!(err.is_stale_context());
        }
        other => panic!("unexpected frame: {other:?}"),
    }
}

#[test]
fn test_decode_event() {
    let inbound = Inbound::decode(
        r#"{"method": "Runtime.executionContextDestroyed", "params": {"executionContextId": 2}}"#,
    )
    .unwrap();
    match inbound {
        Inbound::Event(event) => {
            assert_eq!(event.method, events::CONTEXT_DESTROYED);
            assert_eq!(event.params["executionContextId"], 2);
        }
        other => panic!("unexpected frame: {other:?}"),
    }
}

#[test]
fn test_decode_rejects_shapeless_frame() {
    assert!(matches!(
        Inbound::decode(r#"{"foo": 1}"#),
        Err(CdpError::InvalidResponse(_))
    ));
    assert!(matches!(
        Inbound::decode("not json"),
        Err(CdpError::Serialization(_))
    ));
}

#[test]
fn test_target_descriptor_deserialize() {
    let json = r#"{
        "id": "page123",
        "type": "page",
        "title": "project - IDE",
        "url": "vscode-file://vscode-app/workbench.html",
        "webSocketDebuggerUrl": "ws://127.0.0.1:9000/devtools/page/page123"
    }"#;
    let desc: TargetDescriptor = serde_json::from_str(json).unwrap();
    let target = Target::from_descriptor(9000, desc).unwrap();
    assert_eq!(target.id, "page123");
    assert_eq!(target.port, 9000);
    assert!(target.is_page());
}

#[test]
fn test_target_without_debugger_url() {
    let json = r#"{"id": "sw1", "type": "service_worker", "title": "", "url": ""}"#;
    let desc: TargetDescriptor = serde_json::from_str(json).unwrap();
    assert!(Target::from_descriptor(9000, desc).is_none());
}

#[test]
fn test_context_description_world() {
    let json = r#"{"id": 5, "origin": "vscode-file://vscode-app", "name": "",
        "auxData": {"isDefault": true, "type": "default", "frameId": "F1"}}"#;
    let desc: ExecutionContextDescription = serde_json::from_str(json).unwrap();
    assert!(desc.is_default());
    assert_eq!(desc.frame_id().as_deref(), Some("F1"));

    let json = r#"{"id": 6, "origin": "", "name": "isolated", "auxData": {"isDefault": false, "type": "isolated"}}"#;
    let desc: ExecutionContextDescription = serde_json::from_str(json).unwrap();
    assert!(!desc.is_default());
}

#[test]
fn test_exception_message() {
    let json = r#"{"text": "Uncaught", "lineNumber": 0, "columnNumber": 5,
        "exception": {"type": "object", "description": "ReferenceError: x is not defined"}}"#;
    let details: ExceptionDetails = serde_json::from_str(json).unwrap();
    assert_eq!(details.message(), "Uncaught: ReferenceError: x is not defined");
}
