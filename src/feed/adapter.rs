/*!
 * Priority Feed Adapter
 *
 * Turns the best-effort external hint stream into a starting position in the
 * ordered user list. Each resolution performs exactly one non-blocking receive.
 * No message, an undecodable payload, or a hint naming no live user all fall
 * back to the previously resolved position.
 */

use super::traits::PriorityReceiver;
use super::types::{decode_hint, FeedStats};
use crate::core::Rnti;
use tracing::{info, warn};

/// Resolves the priority-selected user position once per scheduling decision
pub struct PriorityFeed<R> {
    receiver: R,
    prev: usize,
    stats: FeedStats,
}

impl<R: PriorityReceiver> PriorityFeed<R> {
    pub fn new(receiver: R) -> Self {
        Self {
            receiver,
            prev: 0,
            stats: FeedStats::default(),
        }
    }

    /// Resolve the starting position for `rntis`, given in list order
    ///
    /// The result is always below the list length when the list is non-empty.
    /// A position left over from a longer list wraps modulo the current length.
    pub fn resolve<I>(&mut self, rntis: I) -> usize
    where
        I: IntoIterator<Item = Rnti>,
        I::IntoIter: ExactSizeIterator,
    {
        let mut rntis = rntis.into_iter();
        let nof_users = rntis.len();
        self.stats.resolutions += 1;

        if let Some(target) = self.poll() {
            match rntis.position(|rnti| i32::from(rnti) == target) {
                Some(pos) => {
                    self.stats.matched += 1;
                    self.prev = pos;
                }
                None => {
                    self.stats.unmatched += 1;
                    info!(
                        hint = target,
                        prev = self.prev,
                        nof_users,
                        "priority hint names no attached user, keeping previous position"
                    );
                }
            }
        }

        if nof_users > 0 {
            self.prev %= nof_users;
        }
        self.prev
    }

    /// Last resolved position
    pub fn prev(&self) -> usize {
        self.prev
    }

    pub fn stats(&self) -> FeedStats {
        self.stats
    }

    pub fn receiver_mut(&mut self) -> &mut R {
        &mut self.receiver
    }

    pub fn into_receiver(self) -> R {
        self.receiver
    }

    /// One receive attempt, returning the decoded hint if any
    fn poll(&mut self) -> Option<i32> {
        let payload = match self.receiver.try_recv() {
            Ok(Some(payload)) => payload,
            Ok(None) => return None,
            Err(err) => {
                self.stats.transport_errors += 1;
                warn!(error = %err, "priority feed receive failed");
                return None;
            }
        };

        self.stats.received += 1;
        match decode_hint(&payload) {
            Some(target) => Some(target),
            None => {
                self.stats.malformed += 1;
                info!(
                    len = payload.len(),
                    "malformed priority hint, keeping previous position"
                );
                None
            }
        }
    }
}

impl<R: PriorityReceiver> std::fmt::Debug for PriorityFeed<R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PriorityFeed")
            .field("prev", &self.prev)
            .field("stats", &self.stats)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{SchedError, SchedResult};
    use crate::feed::types::encode_hint;
    use bytes::Bytes;
    use std::collections::VecDeque;

    /// Scripted receiver yielding one queued result per call
    #[derive(Default)]
    struct Scripted(VecDeque<SchedResult<Option<Bytes>>>);

    impl Scripted {
        fn hint(mut self, rnti: Rnti) -> Self {
            self.0.push_back(Ok(Some(encode_hint(rnti))));
            self
        }

        fn empty(mut self) -> Self {
            self.0.push_back(Ok(None));
            self
        }

        fn raw(mut self, payload: &'static [u8]) -> Self {
            self.0.push_back(Ok(Some(Bytes::from_static(payload))));
            self
        }

        fn fail(mut self) -> Self {
            self.0
                .push_back(Err(SchedError::FeedTransport("socket gone".into())));
            self
        }
    }

    impl PriorityReceiver for Scripted {
        fn try_recv(&mut self) -> SchedResult<Option<Bytes>> {
            self.0.pop_front().unwrap_or(Ok(None))
        }
    }

    const USERS: [Rnti; 5] = [0x46, 0x47, 0x48, 0x49, 0x4a];

    #[test]
    fn test_no_message_keeps_initial_zero() {
        let mut feed = PriorityFeed::new(Scripted::default().empty());
        assert_eq!(feed.resolve(USERS), 0);
        assert_eq!(feed.stats().received, 0);
    }

    #[test]
    fn test_matching_hint_updates_position() {
        let mut feed = PriorityFeed::new(Scripted::default().hint(0x49));
        assert_eq!(feed.resolve(USERS), 3);
        assert_eq!(feed.prev(), 3);
        assert_eq!(feed.stats().matched, 1);
    }

    #[test]
    fn test_unknown_hint_keeps_previous() {
        let mut feed = PriorityFeed::new(Scripted::default().hint(0x48).hint(0x99));
        assert_eq!(feed.resolve(USERS), 2);
        assert_eq!(feed.resolve(USERS), 2);
        assert_eq!(feed.stats().unmatched, 1);
    }

    #[test]
    fn test_malformed_and_failed_receives_keep_previous() {
        let mut feed = PriorityFeed::new(
            Scripted::default().hint(0x47).raw(&[0x48, 0x00]).fail(),
        );
        assert_eq!(feed.resolve(USERS), 1);
        assert_eq!(feed.resolve(USERS), 1);
        assert_eq!(feed.resolve(USERS), 1);

        let stats = feed.stats();
        assert_eq!(stats.malformed, 1);
        assert_eq!(stats.transport_errors, 1);
        assert_eq!(stats.received, 2);
    }

    #[test]
    fn test_negative_hint_never_matches() {
        let mut feed = PriorityFeed::new(Scripted::default().raw(&[0xff, 0xff, 0xff, 0xff]));
        assert_eq!(feed.resolve(USERS), 0);
        assert_eq!(feed.stats().unmatched, 1);
    }

    #[test]
    fn test_position_wraps_when_list_shrinks() {
        let mut feed = PriorityFeed::new(Scripted::default().hint(0x4a));
        assert_eq!(feed.resolve(USERS), 4);
        assert_eq!(feed.resolve(USERS[..3].iter().copied()), 1);
    }

    #[test]
    fn test_empty_list_resolves_zero() {
        let mut feed = PriorityFeed::new(Scripted::default().hint(0x46));
        assert_eq!(feed.resolve(std::iter::empty::<Rnti>()), 0);
        assert_eq!(feed.stats().unmatched, 1);
    }
}
