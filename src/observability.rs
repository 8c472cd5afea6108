use biometrics::{Collector, Counter, Moments};

pub(crate) static CLIENT_REQUESTS: Counter = Counter::new("dschat.client.requests");
pub(crate) static CLIENT_REQUEST_ERRORS: Counter = Counter::new("dschat.client.request_errors");
pub(crate) static CLIENT_REQUEST_DURATION: Moments =
    Moments::new("dschat.client.request_duration_seconds");

pub(crate) static STREAM_CHUNKS: Counter = Counter::new("dschat.stream.chunks");
pub(crate) static STREAM_ERRORS: Counter = Counter::new("dschat.stream.errors");
pub(crate) static STREAM_BYTES: Counter = Counter::new("dschat.stream.bytes");

pub(crate) static SAVES: Counter = Counter::new("dschat.transcript.saves");
pub(crate) static SAVE_SKIPS: Counter = Counter::new("dschat.transcript.save_skips");
pub(crate) static ARCHIVES: Counter = Counter::new("dschat.transcript.archives");

pub(crate) static TURNS: Counter = Counter::new("dschat.chat.turns");
pub(crate) static TURN_DURATION: Moments = Moments::new("dschat.chat.turn_duration_seconds");

/// Register this crate's biometrics with the provided collector.
pub fn register_biometrics(collector: Collector) {
    collector.register_counter(&CLIENT_REQUESTS);
    collector.register_counter(&CLIENT_REQUEST_ERRORS);
    collector.register_moments(&CLIENT_REQUEST_DURATION);

    collector.register_counter(&STREAM_CHUNKS);
    collector.register_counter(&STREAM_ERRORS);
    collector.register_counter(&STREAM_BYTES);

    collector.register_counter(&SAVES);
    collector.register_counter(&SAVE_SKIPS);
    collector.register_counter(&ARCHIVES);

    collector.register_counter(&TURNS);
    collector.register_moments(&TURN_DURATION);
}
