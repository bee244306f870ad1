/*!
 * Priority Feed
 * External priority hints: transport bridge, per-carrier mailboxes and the
 * slot-path adapter that resolves hints into user positions
 */

mod adapter;
mod mailbox;
mod traits;
mod types;
mod zmq;

pub use adapter::PriorityFeed;
pub use mailbox::{HintBroadcaster, HintSubscriber};
pub use traits::{PriorityReceiver, SilentReceiver};
pub use types::{decode_hint, encode_hint, FeedConfig, FeedStats};
pub use zmq::ZmqHintBridge;
