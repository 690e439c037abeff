//! Running blocking stages on a worker thread with a time limit.
//!
//! Capturing a frame and running the landmark network both block until they are done. A
//! [`Deadline`] moves such a stage onto its own thread, so that the caller can stop waiting after
//! a timeout and shut down cleanly instead of stalling forever.
//!
//! [`TimedSource`] and [`TimedLandmarker`] apply this to a [`FrameSource`] and a
//! [`HandLandmarker`].

use std::{
    fmt,
    thread::{self, JoinHandle},
    time::Duration,
};

use anyhow::anyhow;
use crossbeam_channel::{Receiver, RecvTimeoutError, Sender};

use crate::{
    error::{CaptureError, InferenceError},
    hand::{HandLandmarker, HandLandmarks, LandmarkIdx},
    image::{Frame, PackedFrame, PixelLayout},
    timer::FpsCounter,
    video::FrameSource,
};

/// Why a [`Deadline::call`] did not produce a result.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Missed {
    /// The worker did not answer in time. The worker is considered stuck from now on.
    Expired(Duration),
    /// The worker thread has exited (usually because the stage panicked).
    Gone,
}

/// A stage running on its own thread, called synchronously with a timeout.
pub struct Deadline<I, O> {
    name: String,
    timeout: Duration,
    input: Option<Sender<I>>,
    output: Receiver<O>,
    thread: Option<JoinHandle<()>>,
    stuck: bool,
}

impl<I: Send + 'static, O: Send + 'static> Deadline<I, O> {
    /// Spawns a worker thread.
    ///
    /// `init` runs on the new thread and creates the stage's state `T`, plus a value `R` that is
    /// handed back to the caller. This allows creating resources that must not change threads.
    /// `spawn` waits for `init` to finish, without timeout, and returns its error if it fails.
    ///
    /// Afterwards, every [`Deadline::call`] runs `stage` on the worker thread.
    pub fn spawn<T, R, Init, F>(
        name: &str,
        timeout: Duration,
        init: Init,
        mut stage: F,
    ) -> anyhow::Result<(Self, R)>
    where
        R: Send + 'static,
        Init: FnOnce() -> anyhow::Result<(T, R)> + Send + 'static,
        F: FnMut(&mut T, I) -> O + Send + 'static,
    {
        let (in_tx, in_rx) = crossbeam_channel::bounded::<I>(1);
        let (out_tx, out_rx) = crossbeam_channel::bounded::<O>(1);
        let (ready_tx, ready_rx) = crossbeam_channel::bounded::<anyhow::Result<R>>(1);

        let thread_name = name.to_string();
        let thread = thread::Builder::new()
            .name(name.to_string())
            .spawn(move || {
                let mut state = match init() {
                    Ok((state, ready)) => {
                        ready_tx.send(Ok(ready)).ok();
                        state
                    }
                    Err(e) => {
                        ready_tx.send(Err(e)).ok();
                        return;
                    }
                };
                drop(ready_tx);

                for input in in_rx {
                    let output = stage(&mut state, input);
                    if out_tx.send(output).is_err() {
                        break;
                    }
                }
                log::trace!("worker '{}' exiting", thread_name);
            })?;

        let ready = ready_rx
            .recv()
            .map_err(|_| anyhow!("worker '{}' exited during initialization", name))??;

        Ok((
            Self {
                name: name.to_string(),
                timeout,
                input: Some(in_tx),
                output: out_rx,
                thread: Some(thread),
                stuck: false,
            },
            ready,
        ))
    }

    /// Hands `input` to the worker and waits up to the configured timeout for its result.
    ///
    /// Once a call has expired, the worker may still be busy with it, so all further calls fail
    /// immediately with [`Missed::Expired`].
    pub fn call(&mut self, input: I) -> Result<O, Missed> {
        if self.stuck {
            return Err(Missed::Expired(self.timeout));
        }
        let Some(tx) = &self.input else {
            return Err(Missed::Gone);
        };
        tx.send(input).map_err(|_| Missed::Gone)?;

        match self.output.recv_timeout(self.timeout) {
            Ok(output) => Ok(output),
            Err(RecvTimeoutError::Timeout) => {
                log::error!("worker '{}' missed its {:?} deadline", self.name, self.timeout);
                self.stuck = true;
                Err(Missed::Expired(self.timeout))
            }
            Err(RecvTimeoutError::Disconnected) => Err(Missed::Gone),
        }
    }

    /// Returns the time limit applied to each call.
    pub fn timeout(&self) -> Duration {
        self.timeout
    }
}

impl<I, O> Drop for Deadline<I, O> {
    fn drop(&mut self) {
        // Closing the input channel ends the worker's loop, which drops the stage state.
        drop(self.input.take());
        let Some(thread) = self.thread.take() else {
            return;
        };
        if self.stuck {
            log::warn!(
                "worker '{}' is still busy; leaving it behind without joining",
                self.name
            );
            return;
        }
        if thread.join().is_err() {
            log::error!("worker '{}' panicked", self.name);
        }
    }
}

impl<I, O> fmt::Debug for Deadline<I, O> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Deadline")
            .field("name", &self.name)
            .field("timeout", &self.timeout)
            .field("stuck", &self.stuck)
            .finish()
    }
}

/// A [`FrameSource`] that lives on a worker thread and has to deliver each frame in time.
pub struct TimedSource {
    worker: Deadline<(), Result<Frame, CaptureError>>,
}

impl TimedSource {
    /// Creates the source with `open` on a worker thread.
    ///
    /// The source is dropped (and its device closed) on that thread when the [`TimedSource`] is
    /// dropped. The worker logs the capture rate and the source's [`FrameSource::timers`] once
    /// per second.
    pub fn spawn<S, F>(timeout: Duration, open: F) -> anyhow::Result<Self>
    where
        S: FrameSource + 'static,
        F: FnOnce() -> anyhow::Result<S> + Send + 'static,
    {
        let (worker, ()) = Deadline::spawn(
            "capture",
            timeout,
            move || Ok(((open()?, FpsCounter::new("capture")), ())),
            |(source, fps): &mut (S, FpsCounter), ()| {
                let frame = source.capture_frame();
                fps.tick_with(source.timers());
                frame
            },
        )?;
        Ok(Self { worker })
    }
}

impl FrameSource for TimedSource {
    fn capture_frame(&mut self) -> Result<Frame, CaptureError> {
        match self.worker.call(()) {
            Ok(result) => result,
            Err(Missed::Expired(timeout)) => Err(CaptureError::Timeout(timeout)),
            Err(Missed::Gone) => Err(CaptureError::Disconnected),
        }
    }
}

/// A [`HandLandmarker`] that runs on a worker thread and has to answer each frame in time.
pub struct TimedLandmarker {
    worker: Deadline<PackedFrame, Result<Vec<HandLandmarks>, InferenceError>>,
    layout: PixelLayout,
    connections: &'static [(LandmarkIdx, LandmarkIdx)],
}

impl TimedLandmarker {
    /// Creates the landmarker with `create` on a worker thread.
    pub fn spawn<L, F>(timeout: Duration, create: F) -> anyhow::Result<Self>
    where
        L: HandLandmarker + 'static,
        F: FnOnce() -> anyhow::Result<L> + Send + 'static,
    {
        let (worker, (layout, connections)) = Deadline::spawn(
            "landmarks",
            timeout,
            move || {
                let landmarker = create()?;
                let info = (landmarker.input_layout(), landmarker.connections());
                Ok((landmarker, info))
            },
            |landmarker: &mut L, frame: PackedFrame| landmarker.detect(&frame),
        )?;
        Ok(Self {
            worker,
            layout,
            connections,
        })
    }
}

impl HandLandmarker for TimedLandmarker {
    fn input_layout(&self) -> PixelLayout {
        self.layout
    }

    fn detect(&mut self, frame: &PackedFrame) -> Result<Vec<HandLandmarks>, InferenceError> {
        match self.worker.call(frame.clone()) {
            Ok(result) => result,
            Err(Missed::Expired(timeout)) => Err(InferenceError::Timeout(timeout)),
            Err(Missed::Gone) => Err(InferenceError::WorkerGone),
        }
    }

    fn connections(&self) -> &'static [(LandmarkIdx, LandmarkIdx)] {
        self.connections
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    };

    use super::*;
    use crate::timer::Timer;

    /// A source measuring its captures with a timer shared with the test.
    struct TimedStill(Arc<Timer>);

    impl FrameSource for TimedStill {
        fn capture_frame(&mut self) -> Result<Frame, CaptureError> {
            Ok(self.0.time(|| Frame::new(4, 4)))
        }

        fn timers(&self) -> Vec<&Timer> {
            vec![&*self.0]
        }
    }

    #[test]
    fn capture_worker_logs_source_timers() {
        let _ = env_logger::Builder::new()
            .is_test(true)
            .filter_level(log::LevelFilter::Debug)
            .try_init();

        let timer = Arc::new(Timer::new("still"));
        let shared = timer.clone();
        let mut source =
            TimedSource::spawn(Duration::from_secs(5), move || Ok(TimedStill(shared))).unwrap();

        source.capture_frame().unwrap();
        // Logging the rate once per second displays the timers, which resets them.
        thread::sleep(Duration::from_millis(1100));
        source.capture_frame().unwrap();
        assert_eq!(timer.to_string(), "still: 0x0.0ms");
    }

    #[test]
    fn calls_stage_on_worker() {
        let (mut doubler, tag) = Deadline::spawn(
            "doubler",
            Duration::from_secs(5),
            || Ok((0u32, "ready")),
            |calls: &mut u32, x: u32| {
                *calls += 1;
                (x * 2, *calls)
            },
        )
        .unwrap();
        assert_eq!(tag, "ready");
        assert_eq!(doubler.call(4), Ok((8, 1)));
        assert_eq!(doubler.call(5), Ok((10, 2)));
    }

    #[test]
    fn init_error_is_returned() {
        let result = Deadline::<(), ()>::spawn(
            "broken",
            Duration::from_secs(1),
            || -> anyhow::Result<((), ())> { Err(anyhow!("no device")) },
            |_, ()| (),
        );
        let err = result.unwrap_err();
        assert_eq!(err.to_string(), "no device");
    }

    #[test]
    fn expired_call_marks_worker_stuck() {
        let release = Arc::new(AtomicBool::new(false));
        let release2 = release.clone();
        let (mut slow, ()) = Deadline::spawn(
            "slow",
            Duration::from_millis(20),
            || Ok(((), ())),
            move |_, ()| {
                while !release2.load(Ordering::Relaxed) {
                    thread::sleep(Duration::from_millis(5));
                }
            },
        )
        .unwrap();

        assert_eq!(slow.call(()), Err(Missed::Expired(Duration::from_millis(20))));
        // Further calls fail immediately instead of picking up the stale result.
        assert_eq!(slow.call(()), Err(Missed::Expired(Duration::from_millis(20))));
        release.store(true, Ordering::Relaxed);
    }

    #[test]
    fn panicking_stage_is_gone() {
        let (mut bad, ()) = Deadline::spawn(
            "bad",
            Duration::from_secs(5),
            || Ok(((), ())),
            |_, ()| -> () { panic!("stage failure") },
        )
        .unwrap();
        assert_eq!(bad.call(()), Err(Missed::Gone));
    }
}
