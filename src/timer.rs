use std::sync::Arc;

use tokio::time::{self, Duration, Instant};
use tokio_util::sync::CancellationToken;

/// Unique timer identifier, allocated from a per-player monotonic counter.
pub(crate) type TimerId = u64;

/// Completion hook installed by the player on each of its timers.
///
/// Receives the timer identity and the cancellation token of the wait that
/// just elapsed, so the owner can detect a cancellation that raced the
/// expiry and ignore the late fire.
pub(crate) type FireHook = Arc<dyn Fn(TimerId, &CancellationToken) + Send + Sync>;

/// Internal timer state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum TimerState {
    Idle,
    Running,
    Paused,
    Canceled,
}

/// A single suspendable countdown driving one event's eventual callback.
///
/// The timer owns its remaining-delay accounting so it can be paused and
/// resumed arbitrarily many times before firing, with elapsed time deducted
/// on every pause. The underlying wait primitive is a spawned task racing
/// `tokio::time::sleep` against a [`CancellationToken`]; scheduling and
/// canceling that wait is the timer's only side effect.
pub(crate) struct SuspendableTimer<E> {
    /// Identity, unique within the owning player's lifetime
    pub(crate) id: TimerId,

    /// Opaque payload handed back through the completion hook
    pub(crate) data: E,

    /// Time left to fire, as of the last (re)start
    remaining: Duration,

    state: TimerState,

    /// Wall-clock instant of the last (re)start, used to deduct elapsed
    /// time on pause
    started_at: Option<Instant>,

    /// Token for the in-flight wait, present only while one is outstanding
    cancel: Option<CancellationToken>,

    /// Owner's completion hook
    on_fire: FireHook,
}

impl<E: Send + 'static> SuspendableTimer<E> {
    pub(crate) fn new(id: TimerId, delay: Duration, data: E, on_fire: FireHook) -> Self {
        SuspendableTimer {
            id,
            data,
            remaining: delay,
            state: TimerState::Idle,
            started_at: None,
            cancel: None,
            on_fire,
        }
    }

    /// Start (or restart) the countdown for the remaining delay.
    ///
    /// Any in-flight wait is canceled first. A timer whose remaining delay
    /// has already been consumed by prior pauses is a silent no-op: it never
    /// fires and is never rescheduled.
    ///
    /// Must be called from within a Tokio runtime context.
    pub(crate) fn start(&mut self) {
        self.cancel();
        if self.remaining.is_zero() {
            log::trace!("timer {} has no remaining delay, not scheduling", self.id);
            return;
        }

        let token = CancellationToken::new();
        self.cancel = Some(token.clone());
        self.started_at = Some(Instant::now());
        self.state = TimerState::Running;
        log::trace!("timer {} scheduled to fire in {:?}", self.id, self.remaining);

        let delay = self.remaining;
        let id = self.id;
        let on_fire = Arc::clone(&self.on_fire);
        tokio::spawn(async move {
            tokio::select! {
                () = token.cancelled() => {}
                () = time::sleep(delay) => on_fire(id, &token),
            }
        });
    }

    /// Abort the in-flight wait, if any. Idempotent.
    pub(crate) fn cancel(&mut self) {
        if let Some(token) = self.cancel.take() {
            token.cancel();
            self.state = TimerState::Canceled;
        }
    }

    /// Stop counting down and remember the remaining delay.
    ///
    /// Only effective while running. The deduction saturates at zero; a
    /// fully-consumed delay means a later `resume()` will not reschedule.
    pub(crate) fn pause(&mut self) {
        if self.state == TimerState::Running {
            if let Some(started_at) = self.started_at {
                self.remaining = self.remaining.saturating_sub(started_at.elapsed());
            }
            self.cancel();
            self.state = TimerState::Paused;
            log::trace!("timer {} paused with {:?} remaining", self.id, self.remaining);
        }
    }

    /// Continue counting down from the remembered remaining delay.
    ///
    /// Only effective while paused.
    pub(crate) fn resume(&mut self) {
        if self.state == TimerState::Paused {
            self.start();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use tokio::time::sleep;

    fn recording_hook() -> (FireHook, Arc<Mutex<Vec<TimerId>>>) {
        let fired = Arc::new(Mutex::new(Vec::new()));
        let fired_clone = Arc::clone(&fired);
        let hook: FireHook = Arc::new(move |id, token: &CancellationToken| {
            if !token.is_cancelled() {
                fired_clone.lock().unwrap().push(id);
            }
        });
        (hook, fired)
    }

    #[tokio::test(start_paused = true)]
    async fn fires_once_after_delay() {
        let (hook, fired) = recording_hook();
        let mut timer = SuspendableTimer::new(1, Duration::from_millis(100), (), hook);
        timer.start();

        sleep(Duration::from_millis(50)).await;
        assert!(fired.lock().unwrap().is_empty());

        sleep(Duration::from_millis(60)).await;
        assert_eq!(*fired.lock().unwrap(), vec![1]);

        // No refire afterwards
        sleep(Duration::from_millis(500)).await;
        assert_eq!(*fired.lock().unwrap(), vec![1]);
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_prevents_firing() {
        let (hook, fired) = recording_hook();
        let mut timer = SuspendableTimer::new(1, Duration::from_millis(100), (), hook);
        timer.start();
        timer.cancel();
        timer.cancel(); // idempotent

        sleep(Duration::from_millis(500)).await;
        assert!(fired.lock().unwrap().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn pause_deducts_elapsed_and_resume_continues() {
        let (hook, fired) = recording_hook();
        let mut timer = SuspendableTimer::new(1, Duration::from_millis(1000), (), hook);
        timer.start();

        sleep(Duration::from_millis(400)).await;
        timer.pause();

        // Time spent paused does not count against the delay
        sleep(Duration::from_millis(5000)).await;
        assert!(fired.lock().unwrap().is_empty());

        timer.resume();
        sleep(Duration::from_millis(590)).await;
        assert!(fired.lock().unwrap().is_empty());
        sleep(Duration::from_millis(20)).await;
        assert_eq!(*fired.lock().unwrap(), vec![1]);
    }

    #[tokio::test(start_paused = true)]
    async fn survives_repeated_pause_resume_cycles() {
        let (hook, fired) = recording_hook();
        let mut timer = SuspendableTimer::new(1, Duration::from_millis(100), (), hook);
        timer.start();

        // 40ms + 55ms of active countdown across two cycles, 5ms left
        sleep(Duration::from_millis(40)).await;
        timer.pause();
        timer.resume();
        sleep(Duration::from_millis(55)).await;
        timer.pause();
        timer.resume();

        sleep(Duration::from_millis(10)).await;
        assert_eq!(*fired.lock().unwrap(), vec![1]);
    }

    #[tokio::test(start_paused = true)]
    async fn zero_delay_never_schedules() {
        let (hook, fired) = recording_hook();
        let mut timer = SuspendableTimer::new(1, Duration::ZERO, (), hook);
        timer.start();

        sleep(Duration::from_millis(500)).await;
        assert!(fired.lock().unwrap().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn pause_when_not_running_is_a_no_op() {
        let (hook, fired) = recording_hook();
        let mut timer = SuspendableTimer::new(1, Duration::from_millis(100), (), hook);

        // Not started yet
        timer.pause();
        timer.resume();
        sleep(Duration::from_millis(500)).await;
        assert!(fired.lock().unwrap().is_empty());

        // Canceled
        timer.start();
        timer.cancel();
        timer.pause();
        timer.resume();
        sleep(Duration::from_millis(500)).await;
        assert!(fired.lock().unwrap().is_empty());
    }
}
