use crate::{
    domain::{EntityId, Source},
    error::{ApiError, ErrorCode},
    protocol::EntityEvent,
};

#[test]
fn source_priority_follows_fixed_order() {
    assert!(Source::Direct.outranks(Source::Table));
    assert!(Source::Direct.outranks(Source::Create));
    assert!(Source::Direct.outranks(Source::Update));
    assert!(Source::Create.outranks(Source::Table));
    assert!(Source::Update.outranks(Source::Table));

    assert!(!Source::Table.outranks(Source::Table));
    assert!(!Source::Create.outranks(Source::Update));
    assert!(!Source::Update.outranks(Source::Create));
    assert!(!Source::Table.outranks(Source::Direct));
    assert!(!Source::Direct.outranks(Source::Direct));
}

#[test]
fn only_create_and_update_follow_a_save() {
    assert!(Source::Create.follows_save());
    assert!(Source::Update.follows_save());
    assert!(!Source::Table.follows_save());
    assert!(!Source::Direct.follows_save());
    assert!(!Source::DeleteCompleted.follows_save());
}

#[test]
fn source_serializes_kebab_case() {
    let raw = serde_json::to_string(&Source::DeleteCompleted).expect("serialize");
    assert_eq!(raw, "\"delete-completed\"");
    assert_eq!(Source::DeleteCompleted.to_string(), "delete-completed");
}

#[test]
fn entity_event_uses_tagged_payload() {
    let event = EntityEvent::Updated { id: EntityId(3) };
    let raw = serde_json::to_value(event).expect("serialize");
    assert_eq!(
        raw,
        serde_json::json!({ "type": "updated", "payload": { "id": 3 } })
    );
    assert_eq!(event.id(), EntityId(3));
}

#[test]
fn api_error_field_is_optional_on_the_wire() {
    let raw = r#"{"code":"not_found","message":"missing"}"#;
    let err: ApiError = serde_json::from_str(raw).expect("deserialize");
    assert_eq!(err.code, ErrorCode::NotFound);
    assert_eq!(err.field, None);

    let with_field = ApiError::new(ErrorCode::Validation, "too short").with_field("name");
    let encoded = serde_json::to_value(&with_field).expect("serialize");
    assert_eq!(encoded["field"], "name");
}
