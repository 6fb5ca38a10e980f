//! Language-aware subtitle fan-out.
//!
//! One hub per process routes each composite subtitle to the viewers of
//! its activity, projected down to each viewer's subscribed language.
//! Delivery is non-blocking with a bounded queue per viewer: a slow
//! consumer loses subtitles, never stalls the pipeline or its neighbors.

use std::collections::HashMap;
use std::sync::RwLock;

use log::{debug, warn};
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;

use crate::subtitle::{Subtitle, SubtitleForViewer};

/// Buffered subtitles per viewer connection.
pub const VIEWER_CHANNEL_CAPACITY: usize = 100;

struct ViewerConnection {
    id: String,
    language: String,
    sender: mpsc::Sender<SubtitleForViewer>,
}

struct ActivityBroadcast {
    viewers: HashMap<String, ViewerConnection>,
}

/// Fan-out hub for all live activities.
pub struct SubtitleBroadcaster {
    activities: RwLock<HashMap<String, ActivityBroadcast>>,
}

impl SubtitleBroadcaster {
    pub fn new() -> Self {
        Self {
            activities: RwLock::new(HashMap::new()),
        }
    }

    /// Create the broadcast for an activity. Idempotent.
    pub fn register_activity(&self, activity_id: &str) {
        let mut activities = self.activities.write().unwrap();
        if !activities.contains_key(activity_id) {
            activities.insert(
                activity_id.to_string(),
                ActivityBroadcast {
                    viewers: HashMap::new(),
                },
            );
            debug!("Registered activity for broadcast: {activity_id}");
        }
    }

    /// Tear down an activity's broadcast. Every viewer's channel closes as
    /// its sender drops, which shuts down the viewer writer tasks.
    pub fn unregister_activity(&self, activity_id: &str) {
        let mut activities = self.activities.write().unwrap();
        if activities.remove(activity_id).is_some() {
            debug!("Unregistered activity from broadcast: {activity_id}");
        }
    }

    /// Add a viewer and hand back the receiving end of its queue.
    ///
    /// The activity is auto-registered when absent. A duplicate viewer id
    /// replaces the previous connection (callers use fresh UUIDs, so this
    /// only matters for misbehaving callers, whose old receiver then sees
    /// the channel close).
    pub fn add_viewer(
        &self,
        activity_id: &str,
        viewer_id: &str,
        language: &str,
    ) -> mpsc::Receiver<SubtitleForViewer> {
        let (sender, receiver) = mpsc::channel(VIEWER_CHANNEL_CAPACITY);

        let mut activities = self.activities.write().unwrap();
        let broadcast = activities
            .entry(activity_id.to_string())
            .or_insert_with(|| ActivityBroadcast {
                viewers: HashMap::new(),
            });
        broadcast.viewers.insert(
            viewer_id.to_string(),
            ViewerConnection {
                id: viewer_id.to_string(),
                language: language.to_string(),
                sender,
            },
        );

        debug!("Added viewer {viewer_id} to activity {activity_id} (language: {language})");
        receiver
    }

    /// Drop a viewer; its channel closes with the sender.
    pub fn remove_viewer(&self, activity_id: &str, viewer_id: &str) {
        let mut activities = self.activities.write().unwrap();
        if let Some(broadcast) = activities.get_mut(activity_id) {
            if broadcast.viewers.remove(viewer_id).is_some() {
                debug!("Removed viewer {viewer_id} from activity {activity_id}");
            }
        }
    }

    /// Route one subtitle to every viewer of the activity.
    ///
    /// Each viewer gets the projection for its subscribed language; a
    /// viewer whose language is missing from the translations map is
    /// skipped for this subtitle. Sends never block: a full queue drops
    /// the subtitle for that viewer only.
    pub fn broadcast_subtitle(&self, activity_id: &str, subtitle: &Subtitle) {
        // Snapshot the viewer set so no channel operation happens under
        // the lock.
        let viewers: Vec<(String, String, mpsc::Sender<SubtitleForViewer>)> = {
            let activities = self.activities.read().unwrap();
            let Some(broadcast) = activities.get(activity_id) else {
                warn!("No broadcast found for activity {activity_id}");
                return;
            };
            broadcast
                .viewers
                .values()
                .map(|v| (v.id.clone(), v.language.clone(), v.sender.clone()))
                .collect()
        };

        let mut delivered = 0usize;
        for (viewer_id, language, sender) in &viewers {
            let Some(projected) = subtitle.for_language(language) else {
                continue;
            };
            match sender.try_send(projected) {
                Ok(()) => delivered += 1,
                Err(TrySendError::Full(_)) => {
                    warn!("Viewer {viewer_id} queue is full, skipping subtitle");
                }
                Err(TrySendError::Closed(_)) => {
                    // The viewer is on its way out; removal follows.
                }
            }
        }

        debug!(
            "Broadcast subtitle for activity {activity_id} to {delivered}/{} viewers",
            viewers.len()
        );
    }

    pub fn viewer_count(&self, activity_id: &str) -> usize {
        let activities = self.activities.read().unwrap();
        activities
            .get(activity_id)
            .map(|b| b.viewers.len())
            .unwrap_or(0)
    }

    pub fn viewers_by_language(&self, activity_id: &str) -> HashMap<String, usize> {
        let activities = self.activities.read().unwrap();
        let mut result = HashMap::new();
        if let Some(broadcast) = activities.get(activity_id) {
            for viewer in broadcast.viewers.values() {
                *result.entry(viewer.language.clone()).or_insert(0) += 1;
            }
        }
        result
    }
}

impl Default for SubtitleBroadcaster {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn subtitle(id: &str, langs: &[(&str, &str)]) -> Subtitle {
        Subtitle {
            id: id.to_string(),
            activity_id: "a1".to_string(),
            original: "原文".to_string(),
            source_lang: "zh-CN".to_string(),
            translations: langs
                .iter()
                .map(|(l, t)| (l.to_string(), t.to_string()))
                .collect(),
            confidence: 0.9,
            timestamp: Utc::now(),
        }
    }

    #[tokio::test]
    async fn routes_by_language_and_skips_missing() {
        let broadcaster = SubtitleBroadcaster::new();
        let mut en_rx = broadcaster.add_viewer("a1", "v-en", "en");
        let mut ja_rx = broadcaster.add_viewer("a1", "v-ja", "ja");

        broadcaster.broadcast_subtitle("a1", &subtitle("s1", &[("en", "hello")]));

        let frame = en_rx.recv().await.unwrap();
        assert_eq!(frame.text, "hello");
        assert_eq!(frame.target_lang, "en");

        // The ja viewer got nothing for this subtitle; a later one with a
        // ja translation reaches it.
        broadcaster.broadcast_subtitle("a1", &subtitle("s2", &[("ja", "こんにちは")]));
        let frame = ja_rx.recv().await.unwrap();
        assert_eq!(frame.id, "s2");
        assert!(ja_rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn slow_viewer_does_not_affect_others() {
        let broadcaster = SubtitleBroadcaster::new();
        let slow_rx = broadcaster.add_viewer("a1", "v-slow", "en");
        let mut fast_rx = broadcaster.add_viewer("a1", "v-fast", "en");

        let total = VIEWER_CHANNEL_CAPACITY + 50;
        for i in 0..total {
            broadcaster
                .broadcast_subtitle("a1", &subtitle(&format!("s{i}"), &[("en", "text")]));
            // Drain the fast viewer as we go; the slow one never reads.
            let frame = fast_rx.recv().await.unwrap();
            assert_eq!(frame.id, format!("s{i}"));
        }

        // The slow viewer kept at most its queue capacity, in order.
        let mut slow_rx = slow_rx;
        let mut received = 0;
        while let Ok(frame) = slow_rx.try_recv() {
            assert_eq!(frame.id, format!("s{received}"));
            received += 1;
        }
        assert_eq!(received, VIEWER_CHANNEL_CAPACITY);
    }

    #[tokio::test]
    async fn unregister_closes_viewer_channels() {
        let broadcaster = SubtitleBroadcaster::new();
        broadcaster.register_activity("a1");
        broadcaster.register_activity("a1"); // idempotent
        let mut rx = broadcaster.add_viewer("a1", "v1", "en");

        broadcaster.unregister_activity("a1");
        assert!(rx.recv().await.is_none());
        assert_eq!(broadcaster.viewer_count("a1"), 0);

        // Broadcasting to a gone activity is warned and ignored.
        broadcaster.broadcast_subtitle("a1", &subtitle("s1", &[("en", "x")]));
    }

    #[tokio::test]
    async fn remove_viewer_closes_only_that_channel() {
        let broadcaster = SubtitleBroadcaster::new();
        let mut rx1 = broadcaster.add_viewer("a1", "v1", "en");
        let mut rx2 = broadcaster.add_viewer("a1", "v2", "ja");

        broadcaster.remove_viewer("a1", "v1");
        assert!(rx1.recv().await.is_none());
        assert_eq!(broadcaster.viewer_count("a1"), 1);

        broadcaster.broadcast_subtitle("a1", &subtitle("s1", &[("ja", "y")]));
        assert_eq!(rx2.recv().await.unwrap().text, "y");
    }

    #[tokio::test]
    async fn viewers_by_language_counts() {
        let broadcaster = SubtitleBroadcaster::new();
        let _a = broadcaster.add_viewer("a1", "v1", "en");
        let _b = broadcaster.add_viewer("a1", "v2", "en");
        let _c = broadcaster.add_viewer("a1", "v3", "ja");

        let counts = broadcaster.viewers_by_language("a1");
        assert_eq!(counts["en"], 2);
        assert_eq!(counts["ja"], 1);
        assert_eq!(broadcaster.viewer_count("a1"), 3);
    }
}
