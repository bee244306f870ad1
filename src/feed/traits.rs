/*!
 * Feed Traits
 * Receive primitive consumed by the priority feed adapter
 */

use crate::core::SchedResult;
use bytes::Bytes;

/// Non-blocking source of priority hint payloads
///
/// Implementations must return immediately whatever the channel state;
/// `Ok(None)` means nothing is pending.
pub trait PriorityReceiver: Send {
    fn try_recv(&mut self) -> SchedResult<Option<Bytes>>;
}

impl<R: PriorityReceiver + ?Sized> PriorityReceiver for Box<R> {
    fn try_recv(&mut self) -> SchedResult<Option<Bytes>> {
        (**self).try_recv()
    }
}

/// Receiver that never yields a hint
#[derive(Debug, Default, Clone, Copy)]
pub struct SilentReceiver;

impl PriorityReceiver for SilentReceiver {
    fn try_recv(&mut self) -> SchedResult<Option<Bytes>> {
        Ok(None)
    }
}
