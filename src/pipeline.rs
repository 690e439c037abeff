//! The capture, estimate, draw, and display loop.

use crate::{
    config::{LoopConfig, TrackingConfig},
    error::LoopError,
    gui::{DisplaySurface, UiEvent},
    hand::{HandLandmarker, PixelPoint},
    overlay,
    timer::{Clock, FpsCounter, FpsState, MonotonicClock, Timer},
    video::FrameSource,
};

/// Why an [`OverlayLoop`] stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// The quit key was pressed.
    QuitKey,
    /// The window was closed.
    WindowClosed,
    /// A stage failed. The error was returned by the step that failed.
    Failed,
}

/// What happened during one iteration of an [`OverlayLoop`].
#[derive(Debug, Clone, PartialEq)]
pub struct IterationReport {
    /// Number of hands whose landmarks were drawn onto the frame.
    pub hands_drawn: usize,
    /// The selected hand's landmarks in pixel coordinates, if that hand was detected.
    pub selected: Option<Vec<PixelPoint>>,
    /// Frame rate since the previous iteration. `None` on the first iteration.
    pub fps: Option<f32>,
    /// Set if this iteration stopped the loop.
    pub stop: Option<StopReason>,
}

/// Summary returned by [`OverlayLoop::run`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoopSummary {
    pub iterations: u64,
    pub reason: StopReason,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LoopState {
    Running,
    Stopped(StopReason),
}

/// Repeatedly captures a frame, draws the estimated hand landmarks and the overlay text onto it,
/// and shows it, until the quit key is pressed or the window is closed.
///
/// Each iteration finishes completely (including showing the frame) before the next frame is
/// captured. Once stopped, the loop never captures another frame.
pub struct OverlayLoop<S, L, D, C = MonotonicClock> {
    source: S,
    landmarker: L,
    display: D,
    clock: C,
    tracking: TrackingConfig,
    config: LoopConfig,

    state: LoopState,
    fps: FpsState,
    selected: Option<Vec<PixelPoint>>,
    iterations: u64,

    fps_counter: FpsCounter,
    t_capture: Timer,
    t_convert: Timer,
    t_infer: Timer,
    t_draw: Timer,
    t_display: Timer,
}

impl<S, L, D> OverlayLoop<S, L, D>
where
    S: FrameSource,
    L: HandLandmarker,
    D: DisplaySurface,
{
    /// Creates a loop timed by the system's monotonic clock.
    ///
    /// `tracking` has to be the configuration `landmarker` was created with; it is only used to
    /// display the thresholds.
    pub fn new(
        source: S,
        landmarker: L,
        display: D,
        tracking: TrackingConfig,
        config: LoopConfig,
    ) -> Self {
        Self {
            source,
            landmarker,
            display,
            clock: MonotonicClock::new(),
            tracking,
            config,
            state: LoopState::Running,
            fps: FpsState::new(),
            selected: None,
            iterations: 0,
            fps_counter: FpsCounter::new("overlay loop"),
            t_capture: Timer::new("capture"),
            t_convert: Timer::new("convert"),
            t_infer: Timer::new("infer"),
            t_draw: Timer::new("draw"),
            t_display: Timer::new("display"),
        }
    }
}

impl<S, L, D, C> OverlayLoop<S, L, D, C>
where
    S: FrameSource,
    L: HandLandmarker,
    D: DisplaySurface,
    C: Clock,
{
    /// Replaces the clock used for the frame rate computation.
    pub fn with_clock<C2: Clock>(self, clock: C2) -> OverlayLoop<S, L, D, C2> {
        OverlayLoop {
            source: self.source,
            landmarker: self.landmarker,
            display: self.display,
            clock,
            tracking: self.tracking,
            config: self.config,
            state: self.state,
            fps: self.fps,
            selected: self.selected,
            iterations: self.iterations,
            fps_counter: self.fps_counter,
            t_capture: self.t_capture,
            t_convert: self.t_convert,
            t_infer: self.t_infer,
            t_draw: self.t_draw,
            t_display: self.t_display,
        }
    }

    /// Runs a single iteration.
    ///
    /// Returns `Ok(None)` without doing anything if the loop has already stopped. If a stage
    /// fails, the loop stops and the error is returned.
    pub fn step(&mut self) -> Result<Option<IterationReport>, LoopError> {
        if !self.is_running() {
            return Ok(None);
        }
        match self.iteration() {
            Ok(report) => {
                self.iterations += 1;
                if let Some(reason) = report.stop {
                    log::info!(
                        "overlay loop stopped after {} iterations ({:?})",
                        self.iterations,
                        reason,
                    );
                    self.state = LoopState::Stopped(reason);
                }
                Ok(Some(report))
            }
            Err(e) => {
                log::error!("overlay loop failed after {} iterations: {}", self.iterations, e);
                self.state = LoopState::Stopped(StopReason::Failed);
                Err(e)
            }
        }
    }

    fn iteration(&mut self) -> Result<IterationReport, LoopError> {
        let mut frame = self.t_capture.time(|| self.source.capture_frame())?;
        let res = frame.resolution();

        let packed = self
            .t_convert
            .time(|| frame.to_packed(self.landmarker.input_layout()));
        let hands = self.t_infer.time(|| self.landmarker.detect(&packed))?;

        let fps = {
            let _guard = self.t_draw.start();
            let connections = self.landmarker.connections();
            for hand in &hands {
                hand.draw(&mut frame, connections);
            }
            self.selected = hands
                .get(self.config.hand_index)
                .map(|hand| hand.to_pixels(res));

            let fps = self.fps.tick(self.clock.now());
            overlay::draw_fps(&mut frame, fps);
            overlay::draw_settings(&mut frame, &self.tracking);
            fps
        };

        self.t_display.time(|| self.display.show(&frame))?;

        let stop = match self.display.poll_event(self.config.key_poll_timeout)? {
            Some(UiEvent::Key(key)) if key == self.config.quit_key => Some(StopReason::QuitKey),
            Some(UiEvent::Closed) => Some(StopReason::WindowClosed),
            Some(UiEvent::Key(_)) | None => None,
        };

        self.fps_counter.tick_with([
            &self.t_capture,
            &self.t_convert,
            &self.t_infer,
            &self.t_draw,
            &self.t_display,
        ]);

        Ok(IterationReport {
            hands_drawn: hands.len(),
            selected: self.selected.clone(),
            fps,
            stop,
        })
    }

    /// Runs iterations until the loop stops.
    pub fn run(&mut self) -> Result<LoopSummary, LoopError> {
        log::info!(
            "overlay loop running (quit key {:?}, {})",
            self.config.quit_key,
            self.tracking,
        );
        loop {
            match self.step()? {
                Some(IterationReport {
                    stop: Some(reason), ..
                }) => {
                    return Ok(LoopSummary {
                        iterations: self.iterations,
                        reason,
                    })
                }
                Some(_) => {}
                None => {
                    // Stopped by an earlier call.
                    let reason = match self.state {
                        LoopState::Stopped(reason) => reason,
                        LoopState::Running => StopReason::Failed,
                    };
                    return Ok(LoopSummary {
                        iterations: self.iterations,
                        reason,
                    });
                }
            }
        }
    }

    /// Returns the selected hand's landmarks in pixel coordinates from the latest iteration.
    ///
    /// This is `None` before the first iteration and whenever the latest frame did not contain
    /// the selected hand.
    pub fn selected_points(&self) -> Option<&[PixelPoint]> {
        self.selected.as_deref()
    }

    /// Returns the frame rate state, holding the timestamp of the latest iteration.
    pub fn fps_state(&self) -> &FpsState {
        &self.fps
    }

    pub fn is_running(&self) -> bool {
        self.state == LoopState::Running
    }

    /// Returns the reason the loop stopped, or `None` while it is still running.
    pub fn stop_reason(&self) -> Option<StopReason> {
        match self.state {
            LoopState::Running => None,
            LoopState::Stopped(reason) => Some(reason),
        }
    }

    /// Returns the number of completed iterations.
    pub fn iterations(&self) -> u64 {
        self.iterations
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    pub fn landmarker(&self) -> &L {
        &self.landmarker
    }

    pub fn display(&self) -> &D {
        &self.display
    }
}
