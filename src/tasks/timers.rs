/*!
 * Timer Service
 *
 * Pool of countdown timers advanced once per driving-thread tic.
 *
 * # Design
 *
 * The pool is allocated once at construction so the slot hot path never
 * allocates. Timers are driving-thread objects: the shared table sits behind
 * `Rc<RefCell<..>>`, which keeps both the service and every [`UniqueTimer`]
 * `!Send`. Expiry callbacks are taken out of the table before they run, so a
 * callback may freely restart its own timer, create new timers, or defer more
 * callbacks.
 */

use super::types::TimerId;
use crate::core::{SchedError, SchedResult};
use std::cell::RefCell;
use std::mem;
use std::rc::Rc;
use tracing::{error, trace};

type RepeatingCallback = Box<dyn FnMut(TimerId) + 'static>;
type OnceCallback = Box<dyn FnOnce() + 'static>;

enum Callback {
    Empty,
    Repeating(RepeatingCallback),
    Once(OnceCallback),
}

impl Callback {
    fn is_empty(&self) -> bool {
        matches!(self, Callback::Empty)
    }
}

struct TimerSlot {
    allocated: bool,
    generation: u32,
    duration: u32,
    elapsed: u32,
    running: bool,
    expired: bool,
    callback: Callback,
}

impl TimerSlot {
    fn new() -> Self {
        Self {
            allocated: false,
            generation: 0,
            duration: 0,
            elapsed: 0,
            running: false,
            expired: false,
            callback: Callback::Empty,
        }
    }

    /// Clear the slot, handing back its callback
    ///
    /// The callback may own other timers of the same pool, so the caller
    /// must drop it only after releasing the table borrow.
    #[must_use]
    fn reset(&mut self) -> Callback {
        self.allocated = false;
        self.generation = self.generation.wrapping_add(1);
        self.duration = 0;
        self.elapsed = 0;
        self.running = false;
        self.expired = false;
        mem::replace(&mut self.callback, Callback::Empty)
    }
}

struct TimerTable {
    slots: Vec<TimerSlot>,
    free: Vec<TimerId>,
    // Running timers in start order; expiry within one tic follows this order
    running: Vec<TimerId>,
    scratch: Vec<(TimerId, u32)>,
    tics: u64,
}

impl TimerTable {
    fn with_capacity(capacity: usize) -> Self {
        Self {
            slots: (0..capacity).map(|_| TimerSlot::new()).collect(),
            // Pop from the back hands out the lowest ids first
            free: (0..capacity as TimerId).rev().collect(),
            running: Vec::with_capacity(capacity),
            scratch: Vec::with_capacity(capacity),
            tics: 0,
        }
    }

    fn alloc(&mut self) -> SchedResult<(TimerId, u32)> {
        match self.free.pop() {
            Some(id) => {
                let slot = &mut self.slots[id as usize];
                slot.allocated = true;
                Ok((id, slot.generation))
            }
            None => {
                let capacity = self.slots.len();
                error!(capacity, "timer pool exhausted");
                Err(SchedError::TimerPoolExhausted { capacity })
            }
        }
    }

    #[must_use]
    fn release(&mut self, id: TimerId, generation: u32) -> Callback {
        let slot = &mut self.slots[id as usize];
        if !slot.allocated || slot.generation != generation {
            return Callback::Empty;
        }
        if slot.running {
            self.running.retain(|&r| r != id);
        }
        let callback = slot.reset();
        self.free.push(id);
        callback
    }

    fn slot(&self, id: TimerId, generation: u32) -> Option<&TimerSlot> {
        self.slots
            .get(id as usize)
            .filter(|s| s.allocated && s.generation == generation)
    }

    fn slot_mut(&mut self, id: TimerId, generation: u32) -> Option<&mut TimerSlot> {
        self.slots
            .get_mut(id as usize)
            .filter(|s| s.allocated && s.generation == generation)
    }

    fn start(&mut self, id: TimerId, generation: u32, duration: u32) {
        let Some(slot) = self.slot_mut(id, generation) else {
            return;
        };
        let was_running = slot.running;
        slot.duration = duration;
        slot.elapsed = 0;
        slot.running = true;
        slot.expired = false;
        if was_running {
            self.running.retain(|&r| r != id);
        }
        self.running.push(id);
    }

    fn stop(&mut self, id: TimerId, generation: u32) {
        let Some(slot) = self.slot_mut(id, generation) else {
            return;
        };
        if slot.running {
            slot.running = false;
            self.running.retain(|&r| r != id);
        }
    }
}

/// Pre-allocated countdown timer pool
///
/// Cloning yields another reference to the same pool.
#[derive(Clone)]
pub struct TimerService {
    table: Rc<RefCell<TimerTable>>,
}

impl TimerService {
    /// Create a pool holding `capacity` timers
    pub fn new(capacity: usize) -> Self {
        Self {
            table: Rc::new(RefCell::new(TimerTable::with_capacity(capacity))),
        }
    }

    /// Acquire an exclusively-owned timer from the pool
    ///
    /// Pool exhaustion is a provisioning error and is returned as such.
    pub fn create_timer(&self) -> SchedResult<UniqueTimer> {
        let (id, generation) = self.table.borrow_mut().alloc()?;
        Ok(UniqueTimer {
            table: Rc::clone(&self.table),
            id,
            generation,
        })
    }

    /// Run `func` after `delay` tics using a one-shot pool timer
    pub fn defer_callback<F>(&self, delay: u32, func: F) -> SchedResult<()>
    where
        F: FnOnce() + 'static,
    {
        let mut table = self.table.borrow_mut();
        let (id, generation) = table.alloc()?;
        if let Some(slot) = table.slot_mut(id, generation) {
            slot.callback = Callback::Once(Box::new(func));
        }
        table.start(id, generation, delay);
        Ok(())
    }

    /// Advance every running timer by one tic, firing expired callbacks
    pub fn step(&self) {
        let mut expired = {
            let mut guard = self.table.borrow_mut();
            let table = &mut *guard;
            table.tics += 1;

            let mut expired = mem::take(&mut table.scratch);
            expired.clear();

            let slots = &mut table.slots;
            table.running.retain(|&id| {
                let slot = &mut slots[id as usize];
                slot.elapsed = slot.elapsed.saturating_add(1);
                if slot.elapsed >= slot.duration {
                    slot.running = false;
                    slot.expired = true;
                    expired.push((id, slot.generation));
                    false
                } else {
                    true
                }
            });
            expired
        };

        for &(id, generation) in &expired {
            self.fire(id, generation);
        }

        expired.clear();
        self.table.borrow_mut().scratch = expired;
    }

    fn fire(&self, id: TimerId, generation: u32) {
        let callback = {
            let mut table = self.table.borrow_mut();
            match table.slot_mut(id, generation) {
                Some(slot) => mem::replace(&mut slot.callback, Callback::Empty),
                None => return,
            }
        };

        match callback {
            Callback::Empty => trace!(timer = id, "timer expired without callback"),
            Callback::Once(func) => {
                // One-shot timers return to the pool before their callback runs
                let released = self.table.borrow_mut().release(id, generation);
                drop(released);
                func();
            }
            Callback::Repeating(mut func) => {
                func(id);
                let mut table = self.table.borrow_mut();
                if let Some(slot) = table.slot_mut(id, generation) {
                    if slot.callback.is_empty() {
                        slot.callback = Callback::Repeating(func);
                    }
                }
            }
        }
    }

    /// Total pool capacity
    pub fn capacity(&self) -> usize {
        self.table.borrow().slots.len()
    }

    /// Timers currently handed out (including pending deferred callbacks)
    pub fn nof_timers(&self) -> usize {
        let table = self.table.borrow();
        table.slots.len() - table.free.len()
    }

    /// Timers currently counting down
    pub fn nof_running_timers(&self) -> usize {
        self.table.borrow().running.len()
    }

    /// Tics elapsed since construction
    pub fn tics(&self) -> u64 {
        self.table.borrow().tics
    }
}

/// Exclusively-owned handle to one pool timer
///
/// Returned to the pool on drop.
pub struct UniqueTimer {
    table: Rc<RefCell<TimerTable>>,
    id: TimerId,
    generation: u32,
}

impl UniqueTimer {
    pub fn id(&self) -> TimerId {
        self.id
    }

    /// Set duration and expiry callback without starting
    pub fn set<F>(&mut self, duration: u32, callback: F)
    where
        F: FnMut(TimerId) + 'static,
    {
        let previous = {
            let mut table = self.table.borrow_mut();
            match table.slot_mut(self.id, self.generation) {
                Some(slot) => {
                    slot.duration = duration;
                    mem::replace(&mut slot.callback, Callback::Repeating(Box::new(callback)))
                }
                None => Callback::Empty,
            }
        };
        // Dropped outside the borrow: it may own timers of this pool
        drop(previous);
    }

    /// Start (or restart) counting down `duration` tics
    pub fn start(&mut self, duration: u32) {
        self.table
            .borrow_mut()
            .start(self.id, self.generation, duration);
    }

    /// Restart with the previously set duration
    pub fn run(&mut self) {
        let duration = self.duration();
        self.start(duration);
    }

    pub fn stop(&mut self) {
        self.table.borrow_mut().stop(self.id, self.generation);
    }

    pub fn is_running(&self) -> bool {
        self.table
            .borrow()
            .slot(self.id, self.generation)
            .map(|s| s.running)
            .unwrap_or(false)
    }

    pub fn is_expired(&self) -> bool {
        self.table
            .borrow()
            .slot(self.id, self.generation)
            .map(|s| s.expired)
            .unwrap_or(false)
    }

    pub fn duration(&self) -> u32 {
        self.table
            .borrow()
            .slot(self.id, self.generation)
            .map(|s| s.duration)
            .unwrap_or(0)
    }

    /// Tics since the last start
    pub fn time_elapsed(&self) -> u32 {
        self.table
            .borrow()
            .slot(self.id, self.generation)
            .map(|s| s.elapsed)
            .unwrap_or(0)
    }
}

impl Drop for UniqueTimer {
    fn drop(&mut self) {
        let callback = match self.table.try_borrow_mut() {
            Ok(mut table) => table.release(self.id, self.generation),
            Err(_) => {
                error!(timer = self.id, "timer table busy on drop, slot not released");
                Callback::Empty
            }
        };
        // Owned timers inside the callback release their own slots here
        drop(callback);
    }
}
