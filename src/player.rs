use std::collections::{BTreeMap, HashMap, VecDeque};
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use tokio::time::Duration;
use tokio_util::sync::CancellationToken;

use crate::error::PlayerError;
use crate::timer::{FireHook, SuspendableTimer, TimerId};

/// A single timed event: an opaque payload played back `delay` after the
/// player is started.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlayerEvent<E> {
    /// Offset from playback start
    pub delay: Duration,
    /// Opaque payload handed to the player callback when the event fires
    pub data: E,
}

impl<E> PlayerEvent<E> {
    pub fn new(delay: Duration, data: E) -> Self {
        PlayerEvent { delay, data }
    }
}

/// Player lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlayerState {
    Initialised,
    Started,
    Paused,
    Resumed,
    Stopped,
    Done,
}

impl PlayerState {
    /// Lowercase name, also the per-state listener registration key
    pub fn name(self) -> &'static str {
        match self {
            PlayerState::Initialised => "initialised",
            PlayerState::Started => "started",
            PlayerState::Paused => "paused",
            PlayerState::Resumed => "resumed",
            PlayerState::Stopped => "stopped",
            PlayerState::Done => "done",
        }
    }
}

impl fmt::Display for PlayerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Value delivered to a registered listener.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PlayerSignal {
    /// Delivered to the `"state"` listener on every state change
    State {
        new: PlayerState,
        previous: PlayerState,
    },
    /// Delivered to the listener registered under the new state's name
    Entered(PlayerState),
    /// Delivered to the `"speed"` listener on every effective speed change
    Speed { new: f64, previous: f64 },
}

type Callback<E> = Arc<Mutex<dyn FnMut(E) + Send>>;
type Listener = Arc<Mutex<dyn FnMut(PlayerSignal) + Send>>;
type Notification = (Listener, PlayerSignal);

/// Validate a playback speed.
fn check_speed(speed: f64) -> Result<f64, PlayerError> {
    if speed.is_finite() && speed > 0.0 {
        Ok(speed)
    } else {
        Err(PlayerError::InvalidSpeed(speed))
    }
}

/// Validate the event list and sort it ascending by delay (stable).
fn check_events<E>(mut events: Vec<PlayerEvent<E>>) -> Result<Vec<PlayerEvent<E>>, PlayerError> {
    if events.is_empty() {
        return Err(PlayerError::NoEvents);
    }
    events.sort_by_key(|event| event.delay);
    Ok(events)
}

/// Per-timer delay under the current speed: `ceil(delay / speed)`.
fn effective_delay(delay: Duration, speed: f64) -> Duration {
    Duration::from_millis((delay.as_millis() as f64 / speed).ceil() as u64)
}

fn lock_inner<E>(inner: &Arc<Mutex<Inner<E>>>) -> MutexGuard<'_, Inner<E>> {
    inner.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Deliver queued notifications in order, with the state lock released.
///
/// Only the outermost frame invokes listeners: a re-entrant call from inside
/// a listener finds `dispatching` set, leaves its notifications on the queue
/// and returns, so a listener may call back into the player without ever
/// re-locking a listener mutex.
fn drain_notifications<E>(inner: &Arc<Mutex<Inner<E>>>) {
    loop {
        let (listener, signal) = {
            let mut guard = lock_inner(inner);
            if guard.dispatching {
                return;
            }
            match guard.notify_queue.pop_front() {
                Some(next) => {
                    guard.dispatching = true;
                    next
                }
                None => return,
            }
        };
        (listener.lock().unwrap_or_else(PoisonError::into_inner))(signal);
        lock_inner(inner).dispatching = false;
    }
}

struct Inner<E> {
    /// Source events, sorted ascending by delay
    events: Vec<PlayerEvent<E>>,

    speed: f64,

    state: PlayerState,

    next_timer_id: TimerId,

    /// Scheduled timers that have not yet fired or been canceled.
    /// Keyed by monotonic id, so iteration follows creation order.
    live_timers: BTreeMap<TimerId, SuspendableTimer<E>>,

    /// Source event for each live timer; key set mirrors `live_timers`
    /// mid-playback, and is what speed changes reschedule from.
    live_events: BTreeMap<TimerId, PlayerEvent<E>>,

    callback: Callback<E>,

    listeners: HashMap<String, Listener>,

    /// Notifications queued by state/speed changes, delivered by the
    /// outermost `drain_notifications` frame
    notify_queue: VecDeque<Notification>,

    /// Set while a listener is being invoked
    dispatching: bool,

    /// Self-reference handed to timer completion hooks
    self_ref: Weak<Mutex<Inner<E>>>,
}

impl<E: Clone + Send + 'static> Inner<E> {
    fn allocate_timer_id(&mut self) -> TimerId {
        let id = self.next_timer_id;
        self.next_timer_id += 1;
        id
    }

    /// Record a state change and queue its notifications. Setting the state
    /// to its current value is a no-op and queues nothing.
    fn transition(&mut self, to: PlayerState) {
        if self.state == to {
            return;
        }
        let previous = std::mem::replace(&mut self.state, to);
        log::debug!("player state: {previous} --> {to}");
        if let Some(listener) = self.listeners.get("state").cloned() {
            self.notify_queue
                .push_back((listener, PlayerSignal::State { new: to, previous }));
        }
        if let Some(listener) = self.listeners.get(to.name()).cloned() {
            self.notify_queue.push_back((listener, PlayerSignal::Entered(to)));
        }
    }

    /// Cancel every live timer. A restart supersedes the previous run, so
    /// this also transitions through `stopped` unless the player was never
    /// started at all.
    fn internal_stop(&mut self) {
        for timer in self.live_timers.values_mut() {
            timer.cancel();
        }
        if self.state != PlayerState::Initialised {
            self.transition(PlayerState::Stopped);
        }
    }

    /// Create and start a timer for `event` under the current speed, and
    /// register it in the live-timer map.
    fn schedule_event(&mut self, id: TimerId, event: &PlayerEvent<E>) {
        let delay = effective_delay(event.delay, self.speed);
        let weak = Weak::clone(&self.self_ref);
        let on_fire: FireHook = Arc::new(move |timer_id, token: &CancellationToken| {
            if let Some(inner) = weak.upgrade() {
                handle_fire(&inner, timer_id, token);
            }
        });
        let mut timer = SuspendableTimer::new(id, delay, event.data.clone(), on_fire);
        timer.start();
        self.live_timers.insert(id, timer);
    }
}

/// Completion hook shared by all of a player's timers. This is the single
/// point where the player learns a timer completed.
fn handle_fire<E: Clone + Send + 'static>(
    inner: &Arc<Mutex<Inner<E>>>,
    id: TimerId,
    token: &CancellationToken,
) {
    let (callback, data) = {
        let mut guard = lock_inner(inner);
        // A pause/stop/speed-change that raced the expiry wins: the token
        // was canceled under this lock before the wait was replaced.
        if token.is_cancelled() {
            return;
        }
        let Some(timer) = guard.live_timers.remove(&id) else {
            return;
        };
        guard.live_events.remove(&id);
        log::trace!("timer {id} fired");
        (Arc::clone(&guard.callback), timer.data)
    };

    // The user callback runs with the state lock released, so calling
    // start()/stop() from inside it is legal and runs inline.
    (callback.lock().unwrap_or_else(PoisonError::into_inner))(data);

    {
        let mut guard = lock_inner(inner);
        if guard.live_timers.is_empty() {
            guard.transition(PlayerState::Done);
        }
    }
    drain_notifications(inner);
}

/// Plays back a fixed set of timed events, invoking a callback for each
/// event at its delay offset.
///
/// The whole schedule can be paused, resumed, stopped and restarted, and the
/// playback speed can be changed while playing. The handle is cheap to clone
/// and all methods take `&self`; scheduling methods (`start`, `resume`,
/// `set_speed`) must be called from within a Tokio runtime context.
pub struct EventsPlayer<E> {
    inner: Arc<Mutex<Inner<E>>>,
}

impl<E> Clone for EventsPlayer<E> {
    fn clone(&self) -> Self {
        EventsPlayer {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<E: Clone + Send + 'static> EventsPlayer<E> {
    /// Create a player over `events` at the default speed of 1.
    ///
    /// `callback` is invoked with the event payload each time an event
    /// fires. Fails with [`PlayerError::NoEvents`] on an empty event list.
    pub fn new(
        events: Vec<PlayerEvent<E>>,
        callback: impl FnMut(E) + Send + 'static,
    ) -> Result<Self, PlayerError> {
        Self::with_speed(events, callback, 1.0)
    }

    /// Create a player with an explicit playback speed.
    ///
    /// Fails with [`PlayerError::InvalidSpeed`] unless `speed` is a finite
    /// number greater than zero.
    pub fn with_speed(
        events: Vec<PlayerEvent<E>>,
        callback: impl FnMut(E) + Send + 'static,
        speed: f64,
    ) -> Result<Self, PlayerError> {
        let events = check_events(events)?;
        let speed = check_speed(speed)?;
        let inner = Arc::new_cyclic(|weak| {
            Mutex::new(Inner {
                events,
                speed,
                state: PlayerState::Initialised,
                next_timer_id: 0,
                live_timers: BTreeMap::new(),
                live_events: BTreeMap::new(),
                callback: Arc::new(Mutex::new(callback)),
                listeners: HashMap::new(),
                notify_queue: VecDeque::new(),
                dispatching: false,
                self_ref: Weak::clone(weak),
            })
        });
        Ok(EventsPlayer { inner })
    }

    fn lock(&self) -> MutexGuard<'_, Inner<E>> {
        lock_inner(&self.inner)
    }

    /// Start playback from the beginning, scheduling every event.
    ///
    /// Equivalent to `start_from(Duration::ZERO)`.
    pub fn start(&self) {
        self.start_from(Duration::ZERO);
    }

    /// Start playback, scheduling every event whose delay is at least
    /// `offset`.
    ///
    /// A previous run, complete or not, is superseded: its timers are
    /// canceled and a `stopped` transition is recorded before the new run is
    /// scheduled. Skipped events keep their original delays; the offset only
    /// filters, it does not shift. If no event qualifies the player
    /// transitions to `started` and then immediately to `done`.
    ///
    /// Notification delivery is deferred until the restart completes: the
    /// `stopped` listener observing the supersession runs with the new
    /// timers already scheduled and `state()` already at `started` (or
    /// `done`). Signal values and ordering are unaffected.
    pub fn start_from(&self, offset: Duration) {
        {
            let mut inner = self.lock();
            inner.internal_stop();
            inner.live_events.clear();
            inner.live_timers.clear();

            let qualifying: Vec<PlayerEvent<E>> = inner
                .events
                .iter()
                .filter(|event| event.delay >= offset)
                .cloned()
                .collect();
            for event in qualifying {
                let id = inner.allocate_timer_id();
                inner.schedule_event(id, &event);
                inner.live_events.insert(id, event);
            }
            log::debug!("player started with {} live timer(s)", inner.live_timers.len());

            inner.transition(PlayerState::Started);
            if inner.live_timers.is_empty() {
                inner.transition(PlayerState::Done);
            }
        }
        drain_notifications(&self.inner);
    }

    /// Pause every live timer.
    ///
    /// Only effective while `started` or `resumed`; a silent no-op
    /// otherwise.
    pub fn pause(&self) {
        {
            let mut inner = self.lock();
            if matches!(inner.state, PlayerState::Started | PlayerState::Resumed) {
                for timer in inner.live_timers.values_mut() {
                    timer.pause();
                }
                inner.transition(PlayerState::Paused);
            }
        }
        drain_notifications(&self.inner);
    }

    /// Resume every live timer from its remembered remaining delay.
    ///
    /// Only effective while `paused`; a silent no-op otherwise.
    pub fn resume(&self) {
        {
            let mut inner = self.lock();
            if inner.state == PlayerState::Paused {
                for timer in inner.live_timers.values_mut() {
                    timer.resume();
                }
                inner.transition(PlayerState::Resumed);
            }
        }
        drain_notifications(&self.inner);
    }

    /// Cancel every live timer and transition to `stopped`.
    ///
    /// Always transitions, even before the first `start()`; repeated calls
    /// are idempotent and notify only once.
    pub fn stop(&self) {
        {
            let mut inner = self.lock();
            for timer in inner.live_timers.values_mut() {
                timer.cancel();
            }
            inner.transition(PlayerState::Stopped);
        }
        drain_notifications(&self.inner);
    }

    /// Current playback speed.
    pub fn speed(&self) -> f64 {
        self.lock().speed
    }

    /// Change the playback speed: quicker for values greater than 1, slower
    /// below 1.
    ///
    /// Setting the current value again is a silent no-op. While `started` or
    /// `resumed`, every not-yet-fired event is rescheduled from its
    /// *original* delay divided by the new speed; time already elapsed under
    /// the previous speed is deliberately discarded, so an event can appear
    /// to jump backward in remaining time when the speed decreases.
    pub fn set_speed(&self, speed: f64) -> Result<(), PlayerError> {
        let speed = check_speed(speed)?;
        {
            let mut inner = self.lock();
            if speed == inner.speed {
                return Ok(());
            }
            let previous = std::mem::replace(&mut inner.speed, speed);

            if matches!(inner.state, PlayerState::Started | PlayerState::Resumed) {
                for timer in inner.live_timers.values_mut() {
                    timer.cancel();
                }
                let live: Vec<(TimerId, PlayerEvent<E>)> = inner
                    .live_events
                    .iter()
                    .map(|(id, event)| (*id, event.clone()))
                    .collect();
                for (id, event) in &live {
                    inner.schedule_event(*id, event);
                }
                log::debug!("rescheduled {} live timer(s) at speed {speed}", live.len());
            }

            if let Some(listener) = inner.listeners.get("speed").cloned() {
                inner
                    .notify_queue
                    .push_back((listener, PlayerSignal::Speed { new: speed, previous }));
            }
        }
        drain_notifications(&self.inner);
        Ok(())
    }

    /// Current lifecycle state.
    pub fn state(&self) -> PlayerState {
        self.lock().state
    }

    /// Register a listener under `event_name`.
    ///
    /// Recognized names are `"state"`, `"speed"` and each lifecycle state
    /// name; any other name is accepted but never notified. Registering a
    /// name again replaces the previous listener.
    pub fn on<F>(&self, event_name: &str, listener: F)
    where
        F: FnMut(PlayerSignal) + Send + 'static,
    {
        self.lock()
            .listeners
            .insert(event_name.to_string(), Arc::new(Mutex::new(listener)));
    }

    /// Reset the listener under `event_name` to a no-op.
    pub fn off(&self, event_name: &str) {
        self.lock().listeners.remove(event_name);
    }
}
