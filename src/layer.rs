use crate::logger::Logger;
use crate::severity::Severity;
use serde_json::{Map, Value};
use tracing::field::{Field, Visit};
use tracing::{Event, Level, Subscriber};
use tracing_subscriber::layer::{Context, Layer};
use tracing_subscriber::registry::LookupSpan;

/// Events from these targets are never forwarded, so the logger's own
/// diagnostics cannot loop back into it.
const OWN_TARGET_PREFIX: &str = "fluent_log_sink";

/// `tracing_subscriber` layer that turns `tracing` events into fluent log
/// writes on a [`Logger`].
///
/// Events at or above `min_level` become records with the event message,
/// the mapped [`Severity`] and every other field as caller data. Assembly
/// and delivery follow the logger's own write mode.
pub struct FacadeLayer {
    logger: Logger,
    min_level: Level,
}

impl FacadeLayer {
    pub fn new(logger: Logger, min_level: Level) -> Self {
        Self { logger, min_level }
    }
}

impl<S> Layer<S> for FacadeLayer
where
    S: Subscriber + for<'span> LookupSpan<'span>,
{
    fn on_event(&self, event: &Event, _ctx: Context<'_, S>) {
        let meta = event.metadata();
        if *meta.level() > self.min_level || meta.target().starts_with(OWN_TARGET_PREFIX) {
            return;
        }

        let mut fields = Map::new();
        let mut message: Option<String> = None;

        let mut visitor = FieldVisitor {
            fields: &mut fields,
            message: &mut message,
        };
        event.record(&mut visitor);

        let mut builder = self
            .logger
            .message(message.unwrap_or_default())
            .severity(Severity::from(*meta.level()));
        for (name, value) in fields {
            builder = builder.data_value(name, value);
        }
        builder.write();
    }
}

pub struct FieldVisitor<'a> {
    pub fields: &'a mut Map<String, Value>,
    pub message: &'a mut Option<String>,
}

impl<'a> Visit for FieldVisitor<'a> {
    fn record_str(&mut self, field: &Field, value: &str) {
        if field.name() == "message" {
            *self.message = Some(value.to_string());
        } else {
            self.fields
                .insert(field.name().to_string(), Value::String(value.to_string()));
        }
    }

    fn record_i64(&mut self, field: &Field, value: i64) {
        self.fields.insert(field.name().to_string(), Value::from(value));
    }

    fn record_u64(&mut self, field: &Field, value: u64) {
        self.fields.insert(field.name().to_string(), Value::from(value));
    }

    fn record_f64(&mut self, field: &Field, value: f64) {
        self.fields.insert(field.name().to_string(), Value::from(value));
    }

    fn record_bool(&mut self, field: &Field, value: bool) {
        self.fields.insert(field.name().to_string(), Value::from(value));
    }

    fn record_debug(&mut self, field: &Field, value: &dyn std::fmt::Debug) {
        if field.name() == "message" {
            *self.message = Some(format!("{:?}", value));
        } else {
            self.fields
                .insert(field.name().to_string(), Value::String(format!("{:?}", value)));
        }
    }
}
