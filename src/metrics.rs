//! Prometheus metrics for the realtime channel, exposed at GET /metrics.

use axum::extract::State;
use prometheus::{Encoder, IntCounter, IntGauge, Registry, TextEncoder};

use crate::AppState;

pub struct Metrics {
    registry: Registry,
    /// Currently registered WebSocket connections.
    pub ws_connections: IntGauge,
    pub pushes_delivered: IntCounter,
    pub pushes_dropped: IntCounter,
}

impl Metrics {
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new();
        let ws_connections = IntGauge::new(
            "ws_connections",
            "Currently registered realtime connections",
        )?;
        let pushes_delivered = IntCounter::new(
            "ws_pushes_delivered_total",
            "Realtime events handed to a live connection",
        )?;
        let pushes_dropped = IntCounter::new(
            "ws_pushes_dropped_total",
            "Realtime events dropped because the connection channel was full or closed",
        )?;
        registry.register(Box::new(ws_connections.clone()))?;
        registry.register(Box::new(pushes_delivered.clone()))?;
        registry.register(Box::new(pushes_dropped.clone()))?;
        Ok(Self {
            registry,
            ws_connections,
            pushes_delivered,
            pushes_dropped,
        })
    }

    pub fn encode(&self) -> String {
        let mut buf = Vec::new();
        let encoder = TextEncoder::new();
        if let Err(e) = encoder.encode(&self.registry.gather(), &mut buf) {
            tracing::error!("encode metrics: {:?}", e);
        }
        String::from_utf8(buf).unwrap_or_default()
    }
}

/// GET /metrics — Prometheus text exposition.
pub async fn metrics_handler(State(state): State<AppState>) -> String {
    state.metrics.encode()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encodes_registered_metrics() {
        let m = Metrics::new().unwrap();
        m.ws_connections.set(3);
        m.pushes_delivered.inc();
        let text = m.encode();
        assert!(text.contains("ws_connections 3"));
        assert!(text.contains("ws_pushes_delivered_total 1"));
    }
}
