//! Time keeping and performance measurement.
//!
//! - [`Clock`] and [`FpsState`] compute the frame rate shown on screen.
//! - [`Timer`] and [`FpsCounter`] measure how long each stage takes and log it.

use std::{
    cell::Cell,
    fmt,
    mem,
    sync::Mutex,
    time::{Duration, Instant},
};

use itertools::Itertools;

/// A source of timestamps.
///
/// Timestamps are measured from an arbitrary, fixed origin and never go backwards.
pub trait Clock {
    fn now(&self) -> Duration;
}

/// A [`Clock`] backed by [`Instant`], counting from its creation.
#[derive(Debug, Clone, Copy)]
pub struct MonotonicClock {
    origin: Instant,
}

impl MonotonicClock {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl Default for MonotonicClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for MonotonicClock {
    fn now(&self) -> Duration {
        self.origin.elapsed()
    }
}

impl<C: Clock + ?Sized> Clock for &C {
    fn now(&self) -> Duration {
        (**self).now()
    }
}

/// Computes the instantaneous frame rate from the time between two consecutive frames.
#[derive(Debug, Clone, Copy, Default)]
pub struct FpsState {
    prev: Option<Duration>,
}

impl FpsState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a frame at timestamp `now` and returns the frame rate since the previous one.
    ///
    /// Returns `None` for the first frame, since there is no previous frame to measure against,
    /// and when no time has passed since the previous frame.
    pub fn tick(&mut self, now: Duration) -> Option<f32> {
        let prev = self.prev.replace(now)?;
        let elapsed = now.checked_sub(prev)?.as_secs_f32();
        if elapsed > 0.0 {
            Some(1.0 / elapsed)
        } else {
            None
        }
    }

    /// Returns the timestamp recorded by the last [`FpsState::tick`].
    pub fn prev(&self) -> Option<Duration> {
        self.prev
    }
}

/// A timer that can measure and average the time an operation takes.
///
/// Collected timings are averaged and reset when the timer is displayed using `{}`
/// ([`std::fmt::Display`]).
pub struct Timer {
    name: &'static str,
    state: Mutex<State>,
}

#[derive(Default)]
struct State {
    total: Duration,
    count: u32,
}

impl Timer {
    /// Creates a new timer.
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            state: Mutex::new(State::default()),
        }
    }

    /// Invokes a closure, measuring and recording the time it takes.
    pub fn time<T>(&self, timee: impl FnOnce() -> T) -> T {
        let _guard = self.start();
        timee()
    }

    /// Starts timing an operation using a drop guard.
    ///
    /// When the returned [`TimerGuard`] is dropped, the time between the call to `start` and the
    /// drop is measured and recorded.
    pub fn start(&self) -> TimerGuard<'_> {
        TimerGuard {
            start: Instant::now(),
            timer: self,
        }
    }

    fn stop(&self, start: Instant) {
        let duration = start.elapsed();
        let mut state = self.state.lock().unwrap();
        state.total += duration;
        state.count += 1;
    }
}

/// Displays the average recorded time and resets it.
impl fmt::Display for Timer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let State { total, count } = mem::take(&mut *self.state.lock().unwrap());
        let avg_ms = if count == 0 {
            0.0
        } else {
            total.as_secs_f32() * 1000.0 / count as f32
        };

        write!(f, "{}: {count}x{avg_ms:.01}ms", self.name)
    }
}

/// Guard returned by [`Timer::start`]. Stops timing the operation when dropped.
pub struct TimerGuard<'a> {
    start: Instant,
    timer: &'a Timer,
}

impl Drop for TimerGuard<'_> {
    fn drop(&mut self) {
        self.timer.stop(self.start);
    }
}

/// Logs frames per second with optional extra data.
pub struct FpsCounter {
    name: String,
    frames: u32,
    start: Instant,
}

impl FpsCounter {
    pub fn new<N: Into<String>>(name: N) -> Self {
        Self {
            name: name.into(),
            frames: 0,
            start: Instant::now(),
        }
    }

    /// Advances the frame counter by 1 and logs FPS and `extra` data if one second has passed.
    pub fn tick_with<D: fmt::Display, I: IntoIterator<Item = D>>(&mut self, extra: I) {
        struct DisplayExtra<D: fmt::Display, I: Iterator<Item = D>>(Cell<Option<I>>);

        impl<D: fmt::Display, I: Iterator<Item = D>> fmt::Display for DisplayExtra<D, I> {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                let Some(iter) = self.0.take() else {
                    return Ok(());
                };
                let mut iter = iter.peekable();
                if iter.peek().is_some() {
                    write!(f, " ({})", iter.format(", "))?;
                }
                Ok(())
            }
        }

        self.frames += 1;
        if self.start.elapsed() > Duration::from_secs(1) {
            let extra = DisplayExtra(Cell::new(Some(extra.into_iter())));
            log::debug!("{}: {} FPS{}", self.name, self.frames, extra);

            self.frames = 0;
            self.start = Instant::now();
        }
    }
}
