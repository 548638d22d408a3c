use std::{sync::Arc, time::Duration};

use chrono::{DateTime, Utc};
use dashmap::{mapref::entry::Entry, DashMap};
use log::debug;
use serenity::model::id::MessageId;

use crate::discord::from_snowflakes;

/// Interval of the full reply map clear.
pub const EVICTION_PERIOD: Duration = Duration::from_secs(24 * 60 * 60);

/// Edits of messages older than this are replays from the gateway, not real edits.
pub const EDIT_STALENESS_HOURS: i64 = 1;

/// Maps messages to the reply the bot posted for them.
///
/// A message is claimed before its reply is built, so concurrent create and
/// update events of the same message produce a single reply.
#[derive(Default)]
pub struct ReplyTracker {
    // `None` while the reply is being built
    replies: DashMap<MessageId, Option<MessageId>>,
}

impl ReplyTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claims `source` for replying. `false` when it is already claimed or answered.
    pub fn try_claim(&self, source: MessageId) -> bool {
        match self.replies.entry(source) {
            Entry::Occupied(_) => false,
            Entry::Vacant(entry) => {
                entry.insert(None);
                true
            }
        }
    }

    /// Drops a claim that did not end in a reply.
    pub fn release(&self, source: MessageId) {
        self.replies.remove_if(&source, |_, reply| reply.is_none());
    }

    pub fn track(&self, source: MessageId, reply: MessageId) {
        self.replies.insert(source, Some(reply));
    }

    pub fn is_tracked(&self, source: MessageId) -> bool {
        self.replies.contains_key(&source)
    }

    pub fn untrack(&self, source: MessageId) -> Option<MessageId> {
        self.replies.remove(&source).and_then(|(_, reply)| reply)
    }

    pub fn clear(&self) -> usize {
        let count = self.replies.len();
        self.replies.clear();
        count
    }

    /// Clears every `period` until `stop_signal` fires.
    pub fn spawn_eviction(
        self: &Arc<Self>,
        period: Duration,
        mut stop_signal: tokio::sync::broadcast::Receiver<()>,
    ) -> tokio::task::JoinHandle<()> {
        let tracker = Arc::clone(self);
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            // first tick completes immediately
            interval.tick().await;
            loop {
                tokio::select! {
                    _ = interval.tick() => {
                        let count = tracker.clear();
                        debug!("cleared reply map - {count} entries");
                    }
                    _ = stop_signal.recv() => break,
                }
            }
        })
    }
}

/// Whether an edit event of `message_id` should be ignored because the message is old.
pub fn is_stale_edit(message_id: MessageId, now: DateTime<Utc>) -> bool {
    let created_at = from_snowflakes(&Utc, *message_id.as_u64() as i64);
    now - created_at > chrono::Duration::hours(EDIT_STALENESS_HOURS)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::discord::IntoSnowflakes;

    #[test]
    fn tracks_and_untracks() {
        let tracker = ReplyTracker::new();
        assert!(!tracker.is_tracked(MessageId(1)));

        tracker.track(MessageId(1), MessageId(10));
        tracker.track(MessageId(2), MessageId(20));
        assert!(tracker.is_tracked(MessageId(1)));
        assert!(tracker.is_tracked(MessageId(2)));

        assert_eq!(tracker.untrack(MessageId(1)), Some(MessageId(10)));
        assert_eq!(tracker.untrack(MessageId(1)), None);
        assert!(!tracker.is_tracked(MessageId(1)));

        assert_eq!(tracker.clear(), 1);
        assert!(!tracker.is_tracked(MessageId(2)));
        assert_eq!(tracker.clear(), 0);
    }

    #[test]
    fn claims_are_exclusive() {
        let tracker = ReplyTracker::new();
        assert!(tracker.try_claim(MessageId(1)));
        assert!(!tracker.try_claim(MessageId(1)));
        assert!(tracker.is_tracked(MessageId(1)));

        tracker.release(MessageId(1));
        assert!(!tracker.is_tracked(MessageId(1)));
        assert!(tracker.try_claim(MessageId(1)));

        tracker.track(MessageId(1), MessageId(10));
        // answered messages stay tracked
        tracker.release(MessageId(1));
        assert!(!tracker.try_claim(MessageId(1)));
        assert_eq!(tracker.untrack(MessageId(1)), Some(MessageId(10)));

        // a pending claim has no reply to retract
        assert!(tracker.try_claim(MessageId(2)));
        assert_eq!(tracker.untrack(MessageId(2)), None);
    }

    #[test]
    fn edit_staleness() {
        let now = Utc::now();
        let fresh = MessageId((now - chrono::Duration::minutes(59)).into_snowflakes() as u64);
        let stale = MessageId((now - chrono::Duration::minutes(61)).into_snowflakes() as u64);

        assert!(!is_stale_edit(fresh, now));
        assert!(is_stale_edit(stale, now));
    }

    #[tokio::test(start_paused = true)]
    async fn eviction_clears_periodically() {
        let tracker = Arc::new(ReplyTracker::new());
        let (stop, stop_signal) = tokio::sync::broadcast::channel(1);
        let handle = tracker.spawn_eviction(Duration::from_secs(60), stop_signal);

        tracker.track(MessageId(1), MessageId(10));
        tokio::time::sleep(Duration::from_secs(30)).await;
        assert!(tracker.is_tracked(MessageId(1)));

        tokio::time::sleep(Duration::from_secs(31)).await;
        assert!(!tracker.is_tracked(MessageId(1)));

        stop.send(()).unwrap();
        handle.await.unwrap();
    }
}
