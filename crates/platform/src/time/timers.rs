use std::cell::RefCell;
use std::collections::{BTreeMap, HashMap};
use std::rc::Rc;

/// Handle for a scheduled wake-up, used to cancel it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TimerId(u64);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimerEvent<E> {
    pub id: TimerId,
    pub deadline_ns: u64,
    pub event: E,
}

/// One-shot wake-ups ordered by deadline.
///
/// Wake-ups with equal deadlines are delivered in the order they were scheduled.
#[derive(Debug)]
pub struct TimerQueue<E> {
    next_id: u64,
    queue: BTreeMap<(u64, TimerId), E>,
    deadlines: HashMap<TimerId, u64>,
}

pub type SharedTimerQueue<E> = Rc<RefCell<TimerQueue<E>>>;

impl<E> Default for TimerQueue<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E> TimerQueue<E> {
    pub fn new() -> Self {
        Self {
            next_id: 0,
            queue: BTreeMap::new(),
            deadlines: HashMap::new(),
        }
    }

    pub fn schedule(&mut self, deadline_ns: u64, event: E) -> TimerId {
        let id = TimerId(self.next_id);
        self.next_id += 1;
        self.queue.insert((deadline_ns, id), event);
        self.deadlines.insert(id, deadline_ns);
        id
    }

    /// Cancels a pending wake-up. Returns `false` if it already fired or was cancelled.
    pub fn cancel(&mut self, id: TimerId) -> bool {
        let Some(deadline_ns) = self.deadlines.remove(&id) else {
            return false;
        };
        self.queue.remove(&(deadline_ns, id)).is_some()
    }

    pub fn is_pending(&self, id: TimerId) -> bool {
        self.deadlines.contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    pub fn next_deadline(&self) -> Option<u64> {
        self.queue.keys().next().map(|&(deadline_ns, _)| deadline_ns)
    }

    /// Removes and returns the earliest wake-up whose deadline is `<= now_ns`.
    pub fn pop_due(&mut self, now_ns: u64) -> Option<TimerEvent<E>> {
        let (&(deadline_ns, id), _) = self.queue.first_key_value()?;
        if deadline_ns > now_ns {
            return None;
        }
        let event = self.queue.remove(&(deadline_ns, id))?;
        self.deadlines.remove(&id);
        Some(TimerEvent {
            id,
            deadline_ns,
            event,
        })
    }
}
