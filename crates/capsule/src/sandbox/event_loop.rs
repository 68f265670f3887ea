//! Per-execution timer queue and engine-side state.
//!
//! Everything a script's callbacks share with the host during one execution
//! lives here: scheduled timers, the module cache and the settlement of the
//! script's completion value. A callback that throws surfaces as the error
//! of [`EventLoop::fire_due`].
//! Values are pinned with [`Persistent`] so they outlive a single
//! `Context::with` scope; [`EventLoop::clear`] must run before the engine is
//! torn down.

use std::cell::RefCell;
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::rc::Rc;
use std::time::Duration;

use rquickjs::{Ctx, Function, Object, Persistent, Value};
use tokio::time::Instant;

use super::ScriptFailure;
use super::convert;

/// Timers never repeat faster than this.
const MIN_INTERVAL: Duration = Duration::from_millis(1);

struct Timer {
    callback: Persistent<Function<'static>>,
    args: Vec<Persistent<Value<'static>>>,
    deadline: Instant,
    /// Insertion sequence; breaks deadline ties in scheduling order
    seq: u64,
    interval: Option<Duration>,
}

/// Settlement of the script's completion value.
#[derive(Debug, Clone, Default, PartialEq)]
pub(crate) enum Settlement {
    /// Not settled yet
    #[default]
    Pending,
    /// Settled with a (possibly absent) JSON value
    Fulfilled(Option<serde_json::Value>),
    /// Rejected or threw
    Rejected(ScriptFailure),
}

#[derive(Default)]
struct LoopState {
    timers: BTreeMap<u32, Timer>,
    next_id: u32,
    next_seq: u64,
    fired: usize,
    settlement: Settlement,
    modules: HashMap<String, Persistent<Object<'static>>>,
    module_record: Option<Persistent<Object<'static>>>,
}

/// Shared handle to one execution's event loop state.
#[derive(Clone, Default)]
pub struct EventLoop {
    state: Rc<RefCell<LoopState>>,
}

impl fmt::Debug for EventLoop {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.borrow();
        f.debug_struct("EventLoop")
            .field("pending_timers", &state.timers.len())
            .field("fired", &state.fired)
            .field("settlement", &state.settlement)
            .finish()
    }
}

impl EventLoop {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Queue `callback` to run after `delay`, repeating when `repeat` is
    /// set. Returns the timer id.
    pub(crate) fn schedule<'js>(
        &self,
        ctx: &Ctx<'js>,
        callback: Function<'js>,
        delay: Duration,
        repeat: bool,
        args: Vec<Value<'js>>,
    ) -> u32 {
        let mut state = self.state.borrow_mut();
        state.next_id += 1;
        state.next_seq += 1;
        let id = state.next_id;
        let timer = Timer {
            callback: Persistent::save(ctx, callback),
            args: args.into_iter().map(|arg| Persistent::save(ctx, arg)).collect(),
            deadline: Instant::now() + delay,
            seq: state.next_seq,
            interval: repeat.then(|| delay.max(MIN_INTERVAL)),
        };
        state.timers.insert(id, timer);
        tracing::trace!(id, delay_ms = delay.as_millis() as u64, repeat, "timer scheduled");
        id
    }

    /// Cancel a timer. Unknown ids are ignored.
    pub(crate) fn cancel(&self, id: u32) {
        self.state.borrow_mut().timers.remove(&id);
    }

    /// Number of timers still queued.
    pub fn pending_timers(&self) -> usize {
        self.state.borrow().timers.len()
    }

    /// Number of timer callbacks fired so far.
    pub fn fired(&self) -> usize {
        self.state.borrow().fired
    }

    /// Deadline of the next timer due.
    pub(crate) fn next_deadline(&self) -> Option<Instant> {
        self.state.borrow().timers.values().map(|t| t.deadline).min()
    }

    /// Run the earliest timer due at `now`, if any.
    ///
    /// Returns whether a callback ran. Interval timers are re-queued before
    /// their callback runs so the callback may cancel them.
    pub(crate) fn fire_due<'js>(&self, ctx: &Ctx<'js>, now: Instant) -> rquickjs::Result<bool> {
        let (callback, args) = {
            let mut state = self.state.borrow_mut();
            let due = state
                .timers
                .iter()
                .filter(|(_, t)| t.deadline <= now)
                .min_by_key(|(_, t)| (t.deadline, t.seq))
                .map(|(id, _)| *id);
            let Some(id) = due else {
                return Ok(false);
            };
            let Some(mut timer) = state.timers.remove(&id) else {
                return Ok(false);
            };
            state.fired += 1;
            let fired = (timer.callback.clone(), timer.args.clone());
            if let Some(interval) = timer.interval {
                state.next_seq += 1;
                timer.deadline = now + interval;
                timer.seq = state.next_seq;
                state.timers.insert(id, timer);
            }
            fired
        };

        let callback = callback.restore(ctx)?;
        let args = args
            .into_iter()
            .map(|arg| arg.restore(ctx))
            .collect::<rquickjs::Result<Vec<_>>>()?;
        let _: Value<'js> = convert::apply(ctx, &callback, Value::new_undefined(ctx.clone()), args)?;
        Ok(true)
    }

    pub(crate) fn settle(&self, settlement: Settlement) {
        let mut state = self.state.borrow_mut();
        if state.settlement == Settlement::Pending {
            state.settlement = settlement;
        }
    }

    pub(crate) fn settlement(&self) -> Settlement {
        self.state.borrow().settlement.clone()
    }

    pub(crate) fn cached_module<'js>(&self, ctx: &Ctx<'js>, name: &str) -> rquickjs::Result<Option<Object<'js>>> {
        let cached = self.state.borrow().modules.get(name).cloned();
        cached.map(|module| module.restore(ctx)).transpose()
    }

    pub(crate) fn cache_module<'js>(&self, ctx: &Ctx<'js>, name: &str, module: Object<'js>) {
        self.state
            .borrow_mut()
            .modules
            .insert(name.to_string(), Persistent::save(ctx, module));
    }

    pub(crate) fn set_module_record<'js>(&self, ctx: &Ctx<'js>, record: Object<'js>) {
        self.state.borrow_mut().module_record = Some(Persistent::save(ctx, record));
    }

    pub(crate) fn module_record<'js>(&self, ctx: &Ctx<'js>) -> rquickjs::Result<Option<Object<'js>>> {
        let record = self.state.borrow().module_record.clone();
        record.map(|record| record.restore(ctx)).transpose()
    }

    /// Drop every engine value held by the loop.
    pub(crate) fn clear(&self) {
        let mut state = self.state.borrow_mut();
        state.timers.clear();
        state.modules.clear();
        state.module_record = None;
    }
}
