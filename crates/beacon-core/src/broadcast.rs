//! Broadcast loop: consume topic-tagged frames until shutdown.
//!
//! After subscribing, the loop waits a short settle delay before the first
//! receive so the subscription can reach the distribution proxy. It then
//! classifies every frame: the alert topic is reported as an alert, any
//! other topic generically, and frames with fewer than two parts as
//! malformed. Receive errors are logged and skipped; only a terminated
//! connection or cancellation ends the loop.
//!
//! The topic check runs even when the channel already filters by prefix,
//! since a prefix subscription also matches longer topics.

use std::sync::Arc;
use std::time::Duration;

use beacon_types::config::BotConfig;
use beacon_types::envelope::PublishedMessage;
use beacon_types::report::Report;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::sink::OutputSink;
use crate::transport::BroadcastChannel;

/// What the broadcast loop needs from the configuration.
#[derive(Debug, Clone)]
pub struct BroadcastSettings {
    /// Subscription prefix, used for reporting only.
    pub subscribe_topic: String,
    pub alert_topic: String,
    pub settle_delay: Duration,
}

impl From<&BotConfig> for BroadcastSettings {
    fn from(config: &BotConfig) -> Self {
        Self {
            subscribe_topic: config.subscribe_topic.clone(),
            alert_topic: config.alert_topic.clone(),
            settle_delay: config.settle_delay(),
        }
    }
}

/// Turn one received frame into a report.
pub fn classify(parts: &[Vec<u8>], alert_topic: &str) -> Report {
    match PublishedMessage::from_parts(parts) {
        Some(msg) if msg.topic == alert_topic => Report::Alert {
            content: msg.content_text(),
            topic: msg.topic,
        },
        Some(msg) => Report::Broadcast {
            content: msg.content_text(),
            topic: msg.topic,
        },
        None => Report::Malformed {
            parts: parts
                .iter()
                .map(|p| String::from_utf8_lossy(p).into_owned())
                .collect(),
        },
    }
}

pub struct BroadcastLoop<B> {
    channel: B,
    settings: BroadcastSettings,
    sink: Arc<dyn OutputSink>,
}

impl<B: BroadcastChannel> BroadcastLoop<B> {
    pub fn new(channel: B, settings: BroadcastSettings, sink: Arc<dyn OutputSink>) -> Self {
        Self {
            channel,
            settings,
            sink,
        }
    }

    /// Run until `stop` is cancelled or the connection is terminated, then
    /// hand the connection back to the caller for release.
    pub async fn run(mut self, stop: CancellationToken) -> B {
        info!(topic = %self.settings.subscribe_topic, "broadcast loop started");
        self.sink.report(Report::BroadcastLoopStarted {
            topic: self.settings.subscribe_topic.clone(),
        });

        tokio::select! {
            biased;
            _ = stop.cancelled() => return self.channel,
            _ = tokio::time::sleep(self.settings.settle_delay) => {}
        }

        loop {
            let received = tokio::select! {
                biased;
                _ = stop.cancelled() => break,
                received = self.channel.recv() => received,
            };

            match received {
                Ok(parts) => {
                    let report = classify(&parts, &self.settings.alert_topic);
                    if let Report::Malformed { parts } = &report {
                        warn!(part_count = parts.len(), "discarding malformed broadcast frame");
                    } else {
                        debug!(part_count = parts.len(), "broadcast frame received");
                    }
                    self.sink.report(report);
                }
                Err(e) if e.is_terminated() => {
                    debug!("broadcast connection terminated");
                    break;
                }
                Err(e) => {
                    warn!(error = %e, "failed to receive broadcast");
                    self.sink.report(Report::BroadcastReceiveFailed {
                        error: e.to_string(),
                    });
                }
            }
        }

        debug!("broadcast loop stopped");
        self.channel
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::broadcast_pair;
    use crate::sink::MemorySink;
    use beacon_types::error::TransportError;

    fn parts(items: &[&str]) -> Vec<Vec<u8>> {
        items.iter().map(|s| s.as_bytes().to_vec()).collect()
    }

    fn settings(settle: Duration) -> BroadcastSettings {
        BroadcastSettings {
            subscribe_topic: String::new(),
            alert_topic: "ALERTA".to_string(),
            settle_delay: settle,
        }
    }

    #[test]
    fn alert_topic_is_classified_as_alert() {
        let report = classify(&parts(&["ALERTA", "disk full"]), "ALERTA");
        assert_eq!(
            report,
            Report::Alert {
                topic: "ALERTA".to_string(),
                content: "disk full".to_string(),
            }
        );
    }

    #[test]
    fn other_topics_are_generic() {
        let report = classify(&parts(&["metrics", "cpu=10"]), "ALERTA");
        assert_eq!(
            report,
            Report::Broadcast {
                topic: "metrics".to_string(),
                content: "cpu=10".to_string(),
            }
        );
    }

    #[test]
    fn topic_match_is_exact_not_prefix() {
        let report = classify(&parts(&["ALERTAS", "x"]), "ALERTA");
        assert!(!report.is_alert());
    }

    #[test]
    fn short_frames_are_malformed() {
        assert_eq!(
            classify(&parts(&["onlytopic"]), "ALERTA"),
            Report::Malformed {
                parts: vec!["onlytopic".to_string()]
            }
        );
        assert_eq!(
            classify(&[], "ALERTA"),
            Report::Malformed { parts: vec![] }
        );
    }

    #[tokio::test]
    async fn loop_reports_each_frame_kind() {
        let (channel, publisher) = broadcast_pair();
        let sink = Arc::new(MemorySink::new());
        let stop = CancellationToken::new();
        let bl = BroadcastLoop::new(channel, settings(Duration::ZERO), sink.clone());
        let handle = tokio::spawn(bl.run(stop.clone()));

        publisher.publish(&["ALERTA", "disk full"]);
        publisher.publish(&["metrics", "cpu=10"]);
        publisher.publish(&["onlytopic"]);
        publisher.publish(&["ALERTA", "back online"]);

        assert!(
            sink.wait_for(Duration::from_secs(1), |r| r.len() == 5)
                .await
        );
        let reports = sink.snapshot();
        assert_eq!(reports[0], Report::BroadcastLoopStarted { topic: String::new() });
        assert!(reports[1].is_alert());
        assert!(matches!(reports[2], Report::Broadcast { .. }));
        assert!(matches!(reports[3], Report::Malformed { .. }));
        assert!(reports[4].to_string().contains("back online"));

        stop.cancel();
        handle.await.unwrap();
    }

    #[tokio::test]
    async fn receive_errors_are_skipped() {
        let (channel, publisher) = broadcast_pair();
        let sink = Arc::new(MemorySink::new());
        let stop = CancellationToken::new();
        let bl = BroadcastLoop::new(channel, settings(Duration::ZERO), sink.clone());
        let handle = tokio::spawn(bl.run(stop.clone()));

        publisher.fail(TransportError::Receive("interrupted".to_string()));
        publisher.publish(&["ALERTA", "still here"]);

        assert!(
            sink.wait_for(Duration::from_secs(1), |r| r.iter().any(Report::is_alert))
                .await
        );
        assert_eq!(
            sink.count(|r| matches!(r, Report::BroadcastReceiveFailed { .. })),
            1
        );

        stop.cancel();
        handle.await.unwrap();
    }

    #[tokio::test]
    async fn settle_delay_precedes_first_receive() {
        let (channel, publisher) = broadcast_pair();
        let sink = Arc::new(MemorySink::new());
        let stop = CancellationToken::new();
        let bl = BroadcastLoop::new(channel, settings(Duration::from_millis(200)), sink.clone());
        let handle = tokio::spawn(bl.run(stop.clone()));

        publisher.publish(&["metrics", "early"]);
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(sink.count(|r| matches!(r, Report::Broadcast { .. })), 0);

        assert!(
            sink.wait_for(Duration::from_secs(1), |r| r
                .iter()
                .any(|x| matches!(x, Report::Broadcast { .. })))
                .await
        );

        stop.cancel();
        handle.await.unwrap();
    }

    #[tokio::test]
    async fn cancellation_during_settle_delay_returns_channel() {
        let (channel, publisher) = broadcast_pair();
        let sink = Arc::new(MemorySink::new());
        let stop = CancellationToken::new();
        let bl = BroadcastLoop::new(channel, settings(Duration::from_secs(30)), sink.clone());
        let handle = tokio::spawn(bl.run(stop.clone()));

        stop.cancel();
        let channel = tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .expect("loop should exit promptly")
            .unwrap();
        channel.close().await;
        assert!(publisher.is_closed());
    }

    #[tokio::test]
    async fn terminated_connection_ends_loop_without_failure() {
        let (channel, publisher) = broadcast_pair();
        let sink = Arc::new(MemorySink::new());
        let bl = BroadcastLoop::new(channel, settings(Duration::ZERO), sink.clone());
        publisher.fail(TransportError::Terminated);

        tokio::time::timeout(Duration::from_secs(1), bl.run(CancellationToken::new()))
            .await
            .expect("loop should exit on terminated connection");
        assert_eq!(sink.count(|r| r.is_failure()), 0);
    }

    mod properties {
        use super::*;
        use proptest::prelude::*;

        const ALERT: &str = "ALERTA";

        /// Frame parts whose first part is often the alert topic, a prefix
        /// or extension of it, or arbitrary bytes.
        fn frame_parts() -> impl Strategy<Value = Vec<Vec<u8>>> {
            let part = proptest::collection::vec(any::<u8>(), 0..32);
            let topic = prop_oneof![
                Just(ALERT.as_bytes().to_vec()),
                Just(b"ALERT".to_vec()),
                Just(b"ALERTAS".to_vec()),
                Just(b"alerta".to_vec()),
                part.clone(),
            ];
            (topic, proptest::collection::vec(part, 0..4)).prop_map(|(topic, rest)| {
                let mut parts = vec![topic];
                parts.extend(rest);
                parts
            })
        }

        proptest! {
            #[test]
            fn classification_follows_part_count_and_exact_topic(
                parts in prop_oneof![Just(Vec::new()), frame_parts()],
            ) {
                let report = classify(&parts, ALERT);
                if parts.len() < 2 {
                    let expected: Vec<String> = parts
                        .iter()
                        .map(|p| String::from_utf8_lossy(p).into_owned())
                        .collect();
                    prop_assert_eq!(report, Report::Malformed { parts: expected });
                } else {
                    let topic = String::from_utf8_lossy(&parts[0]).into_owned();
                    let content = String::from_utf8_lossy(&parts[1]).into_owned();
                    if topic == ALERT {
                        prop_assert_eq!(report, Report::Alert { topic, content });
                    } else {
                        prop_assert_eq!(report, Report::Broadcast { topic, content });
                    }
                }
            }
        }
    }
}
