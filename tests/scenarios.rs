mod common;

use serde_json::json;
use std::sync::Arc;

use common::{config, harness};
use fluent_log_sink::config::{LoggingConfig, OriginConfig, WriteMode};
use fluent_log_sink::exception::{Exception, StackFrame};
use fluent_log_sink::fluent::{FieldValue, LoggableFields, FALLBACK_MESSAGE};
use fluent_log_sink::http::RequestSnapshot;
use fluent_log_sink::origin::origin_hash;
use fluent_log_sink::severity::Severity;

#[tokio::test]
async fn plain_message_is_info_with_message_origin() {
    let h = harness(config());
    h.logger.message("Hello, World!").write();
    h.logger.flush().await;

    let records = h.events.records();
    assert_eq!(records.len(), 1);
    let record = &records[0];
    assert_eq!(record.severity, Severity::Info);
    assert_eq!(record.message.as_deref(), Some("Hello, World!"));
    assert_eq!(record.machine_name, "box1");
    assert_eq!(
        record.properties.get_str("Origin"),
        Some(origin_hash("Hello, World!").as_str())
    );
    assert_eq!(record.properties.get_str("LogType"), Some("Message"));
    assert_eq!(record.properties.get_str("MachineName"), Some("box1"));
    assert!(!record.properties.contains_key("Url"));
    assert!(!record.properties.contains_key("RequestMethod"));
    assert!(!record.properties.contains_key("DeployVersion"));
}

#[tokio::test]
async fn exception_with_posted_form_is_sanitized() {
    let h = harness(config());
    h.logger
        .exception(Exception::new("AuthError", "bad password"))
        .request(Arc::new(
            RequestSnapshot::new("POST", "http://example.com/login").body("password=topsecret"),
        ))
        .write();
    h.logger.flush().await;

    let record = &h.events.records()[0];
    assert_eq!(record.severity, Severity::Error);
    assert_eq!(record.message.as_deref(), Some("bad password"));
    assert_eq!(record.properties.get_str("RequestMethod"), Some("POST"));
    assert_eq!(record.properties.get_str("RequestBody"), Some("password=****"));
    assert_eq!(record.properties.get_str("LogType"), Some("Exception"));
    assert_eq!(record.exception.as_ref().unwrap().exception_type_name, "AuthError");
}

fn out_of_stock() -> Exception {
    Exception::capture("OrderError", "out of stock")
}

#[tokio::test]
async fn same_site_twice_gives_same_origin() {
    let h = harness(config());
    for _ in 0..2 {
        h.logger.exception(out_of_stock()).write();
    }
    h.logger.flush().await;

    let records = h.events.records();
    assert_eq!(records.len(), 2);
    let first = records[0].properties.get_str("Origin").unwrap();
    let second = records[1].properties.get_str("Origin").unwrap();
    assert_eq!(first, second);
    assert_eq!(first.len(), 32);
}

#[inline(never)]
fn reserve_stock() -> Exception {
    Exception::capture("OrderError", "out of stock")
}

#[inline(never)]
fn release_stock() -> Exception {
    Exception::capture("OrderError", "out of stock")
}

#[tokio::test]
async fn captures_from_different_functions_get_different_origins() {
    let h = harness(LoggingConfig {
        origin: OriginConfig::default(),
        ..config()
    });
    let reserved = reserve_stock();
    let released = release_stock();
    assert_eq!(reserved.frames[0].method, "reserve_stock");
    assert_eq!(released.frames[0].method, "release_stock");

    h.logger.exception(reserved).write();
    h.logger.exception(released).write();
    h.logger.flush().await;

    let records = h.events.records();
    assert_ne!(
        records[0].properties.get_str("Origin"),
        records[1].properties.get_str("Origin")
    );
}

#[tokio::test]
async fn custom_message_groups_different_exceptions() {
    let h = harness(config());
    let a = Exception::new("A", "one").with_frame(StackFrame::new("scenarios::a", "f").at("a.rs", 1));
    let b = Exception::new("B", "two").with_frame(StackFrame::new("scenarios::b", "g").at("b.rs", 2));
    h.logger.exception(a).message("checkout failed").write();
    h.logger.exception(b).message("checkout failed").write();
    h.logger.flush().await;

    let records = h.events.records();
    assert_eq!(
        records[0].properties.get("Origin"),
        records[1].properties.get("Origin")
    );
    assert_eq!(records[0].message.as_deref(), Some("checkout failed"));
}

#[tokio::test]
async fn explicit_severity_wins_over_default() {
    let h = harness(config());
    h.logger.exception(Exception::new("E", "minor")).warn().write();
    h.logger.message("verbose").debug().write();
    h.logger.message("dead").fatal().write();
    h.logger.flush().await;

    let severities: Vec<Severity> = h.events.records().iter().map(|r| r.severity).collect();
    assert_eq!(severities, vec![Severity::Warn, Severity::Debug, Severity::Fatal]);
}

#[tokio::test]
async fn sql_exception_origin_uses_statement() {
    let h = harness(config());
    h.logger
        .exception(Exception::new("SqlError", "deadlock"))
        .sql(
            "update orders set state = @state",
            Some(vec![("@state".to_string(), json!("shipped")), ("@note".to_string(), json!(null))]),
        )
        .write();
    h.logger.flush().await;

    let props = &h.events.records()[0].properties;
    assert_eq!(props.get_str("LogType"), Some("SqlException"));
    assert_eq!(props.get_str("Sql"), Some("update orders set state = @state"));
    assert_eq!(
        props.get("SqlParameters"),
        Some(&json!({"@state": "shipped", "@note": "null"}))
    );
    assert_eq!(
        props.get_str("Origin"),
        Some(origin_hash("deadlock;update orders set state = @state").as_str())
    );
}

struct Shipment {
    id: i64,
    carrier: String,
}

impl LoggableFields for Shipment {
    fn loggable_fields(&self) -> Vec<(&'static str, FieldValue)> {
        vec![
            ("Id", FieldValue::Long(self.id)),
            ("Carrier", FieldValue::Str(self.carrier.clone())),
        ]
    }
}

#[tokio::test]
async fn typed_data_and_tags_are_recorded() {
    let h = harness(config());
    let shipment = Shipment {
        id: 77,
        carrier: "ACME".into(),
    };
    h.logger
        .message("shipment booked")
        .data("Note", "fragile")
        .data("Expedited", true)
        .data("Pieces", 3)
        .data("Weight", 120_i64)
        .data("Rate", 0.5)
        .data("AdditionalInfo", "priority customer")
        .data_of(&shipment)
        .data_object("Dest_", &shipment)
        .tag("shipping")
        .tags(["booking", "api"])
        .write();
    h.logger.flush().await;

    let props = &h.events.records()[0].properties;
    assert_eq!(props.get_str("Note"), Some("fragile"));
    assert_eq!(props.get_str("Expedited"), Some("true"));
    assert_eq!(props.get("Pieces+Int32"), Some(&json!(3)));
    assert_eq!(props.get("Weight+Int64"), Some(&json!(120)));
    assert_eq!(props.get("Rate+Decimal"), Some(&json!(0.5)));
    assert_eq!(props.get_str("Parameters"), Some("priority customer"));
    assert_eq!(props.get("Shipment_Id"), Some(&json!(77)));
    assert_eq!(props.get_str("Shipment_Carrier"), Some("ACME"));
    assert_eq!(props.get_str("Dest_Carrier"), Some("ACME"));
    assert_eq!(props.get("Tags"), Some(&json!(["shipping", "booking", "api"])));
}

#[tokio::test]
async fn sensitive_data_keys_are_scrubbed() {
    let h = harness(config());
    h.logger
        .message("card updated")
        .data("password", "hunter2")
        .data("Cvv", 123)
        .data("Note", "ok")
        .write();
    h.logger.flush().await;

    let props = &h.events.records()[0].properties;
    assert_eq!(props.get_str("password"), Some("****"));
    assert_eq!(props.get_str("Cvv+Int32"), Some("****"));
    assert_eq!(props.get_str("Note"), Some("ok"));
}

#[tokio::test]
async fn key_collision_writes_fallback_record() {
    let h = harness(config());
    h.logger
        .message("checkout")
        .exception(Exception::new("PaymentError", "declined").with_stack_trace("   at checkout"))
        .data("MachineName", "spoofed")
        .write();
    h.logger.flush().await;

    let records = h.events.records();
    assert_eq!(records.len(), 1);
    let record = &records[0];
    assert_eq!(record.severity, Severity::Error);
    assert_eq!(record.message.as_deref(), Some(FALLBACK_MESSAGE));
    let props = &record.properties;
    assert_eq!(props.get_str("Original.Message"), Some("checkout"));
    assert_eq!(props.get_str("Original.Exception.Message"), Some("declined"));
    assert_eq!(props.get_str("Original.Exception.StackTrace"), Some("   at checkout"));
    assert_eq!(props.get_str("MachineName"), Some("box1"));

    let exception = props.get("Exception").unwrap();
    assert_eq!(exception["Data"]["Key"], "MachineName");
    assert_eq!(exception["Data"]["ExistingValue"], "box1");
    assert_eq!(exception["Data"]["AttemptedValue"], "spoofed");
}

#[tokio::test]
async fn background_mode_delivers_the_same_record() {
    let mut cfg = config();
    cfg.write_mode = WriteMode::Background;
    let h = harness(cfg);
    for step in ["pack", "ship"] {
        h.logger.message("later").data("Step", step).write();
    }
    h.logger.flush().await;

    let records = h.events.records();
    assert_eq!(records.len(), 2);
    let record = records
        .iter()
        .find(|r| r.properties.get_str("Step") == Some("ship"))
        .unwrap();
    assert_eq!(record.message.as_deref(), Some("later"));
    assert_eq!(record.properties.get_str("Step"), Some("ship"));
}

#[tokio::test]
async fn deploy_version_comes_from_base_directory() {
    let mut cfg = config();
    cfg.base_directory = Some("/srv/app/20240501/bin".into());
    let h = harness(cfg);
    h.logger.message("deployed").write();
    h.logger.flush().await;

    assert_eq!(
        h.events.records()[0].properties.get_str("DeployVersion"),
        Some("20240501")
    );
}

#[tokio::test]
async fn into_record_assembles_without_sending() {
    let h = harness(config());
    let record = h.logger.message("preview").into_record();
    h.logger.flush().await;

    assert_eq!(record.message.as_deref(), Some("preview"));
    assert!(h.events.records().is_empty());
}
