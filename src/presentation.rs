use crate::error::VizError;
use crate::scheduler::EventScheduler;
use crate::session::PlaybackSession;
use crate::token::{KeyboardLayout, VisualToken};
use crate::types::{Rect, Rgb};
use log::{debug, info, warn};

/// Display, clock and input as seen by the presentation loop.
///
/// All calls happen on the loop's thread.
pub trait Frontend {
    /// Non-blocking check for a quit request.
    fn poll_stop(&mut self) -> Result<bool, VizError>;

    /// Seconds on a monotonic clock. Only differences are meaningful.
    fn elapsed(&self) -> f64;

    /// Draw a filled rectangle in virtual screen coordinates.
    fn draw_rect(&mut self, rect: Rect, color: Rgb) -> Result<(), VizError>;

    /// Show everything drawn since the last call.
    fn present(&mut self, status: &FrameStatus) -> Result<(), VizError>;

    /// Block until the next frame boundary at `fps`.
    fn pace(&mut self, fps: f64);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopState {
    Running,
    Done,
}

/// Per-frame summary handed to the frontend alongside the drawing.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FrameStatus {
    pub time: f64,
    pub live_tokens: usize,
    pub pending_events: usize,
    pub fps: f64,
}

#[derive(Debug, Clone, Copy)]
pub struct LoopSettings {
    pub layout: KeyboardLayout,
    pub token_color: Rgb,
    pub fps: f64,
}

impl Default for LoopSettings {
    fn default() -> Self {
        Self {
            layout: KeyboardLayout::default(),
            token_color: Rgb::RED,
            fps: 60.0,
        }
    }
}

/// Totals reported when the loop finishes.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LoopSummary {
    pub frames: u64,
    pub released: u64,
    pub time: f64,
}

/// Per-frame driver: advances the playback clock, releases due events from
/// the scheduler as tokens, retires expired tokens and redraws.
pub struct PresentationLoop {
    scheduler: EventScheduler,
    tokens: Vec<VisualToken>,
    state: LoopState,
    settings: LoopSettings,
    origin: f64,
    last_frame: Option<f64>,
    fps_estimate: f64,
    frames: u64,
    released: u64,
}

/// Weight of the newest frame in the smoothed fps figure.
const FPS_SMOOTHING: f64 = 0.1;

impl PresentationLoop {
    /// Time zero is "now" on the session clock. Start playback right before
    /// calling this so audio and visuals share the same origin.
    pub fn new<F: Frontend>(
        scheduler: EventScheduler,
        session: &PlaybackSession<F>,
        settings: LoopSettings,
    ) -> Self {
        Self {
            scheduler,
            tokens: Vec::new(),
            state: LoopState::Running,
            settings,
            origin: session.frontend().elapsed(),
            last_frame: None,
            fps_estimate: 0.0,
            frames: 0,
            released: 0,
        }
    }

    pub fn state(&self) -> LoopState {
        self.state
    }

    pub fn tokens(&self) -> &[VisualToken] {
        &self.tokens
    }

    pub fn scheduler(&self) -> &EventScheduler {
        &self.scheduler
    }

    /// Seconds since the loop was created.
    pub fn time<F: Frontend>(&self, session: &PlaybackSession<F>) -> f64 {
        session.frontend().elapsed() - self.origin
    }

    /// Run frames until a stop signal or a collaborator failure.
    pub fn run<F: Frontend>(
        &mut self,
        session: &mut PlaybackSession<F>,
    ) -> Result<LoopSummary, VizError> {
        info!(
            "Presentation loop running ({} events pending, {:.0} fps target)",
            self.scheduler.len(),
            self.settings.fps
        );

        while self.step(session)? == LoopState::Running {}

        let summary = self.summary(session);
        info!(
            "Presentation loop done after {} frames, {} events released in {:.2}s",
            summary.frames, summary.released, summary.time
        );
        Ok(summary)
    }

    /// Process one frame. A no-op once the loop is done.
    pub fn step<F: Frontend>(
        &mut self,
        session: &mut PlaybackSession<F>,
    ) -> Result<LoopState, VizError> {
        if self.state == LoopState::Done {
            return Ok(LoopState::Done);
        }
        match self.frame(session) {
            Ok(state) => Ok(state),
            Err(e) => {
                warn!("Stopping presentation loop: {}", e);
                self.finish();
                Err(e)
            }
        }
    }

    fn frame<F: Frontend>(
        &mut self,
        session: &mut PlaybackSession<F>,
    ) -> Result<LoopState, VizError> {
        if session.frontend_mut().poll_stop()? {
            info!("Stop requested");
            self.finish();
            return Ok(LoopState::Done);
        }
        session.check_playback()?;

        let now = self.time(session);
        self.track_fps(now);

        // Retire expired tokens; leave the set alone when nothing expired.
        if self.tokens.iter().any(|t| t.has_expired(now)) {
            let before = self.tokens.len();
            self.tokens.retain(|t| !t.has_expired(now));
            debug!("{:.2}s retired {} tokens", now, before - self.tokens.len());
        }

        for event in self.scheduler.pop_due(now) {
            let token = VisualToken::new(event, &self.settings.layout, self.settings.token_color);
            self.tokens.push(token);
            self.released += 1;
            debug!(
                "{:.2}s adding token (n={}): {} at {:?}",
                now,
                self.tokens.len(),
                event,
                token.rect
            );
        }

        let frontend = session.frontend_mut();
        for token in &self.tokens {
            frontend.draw_rect(token.rect, token.shaded(now))?;
        }
        frontend.present(&FrameStatus {
            time: now,
            live_tokens: self.tokens.len(),
            pending_events: self.scheduler.len(),
            fps: self.fps_estimate,
        })?;

        self.frames += 1;
        frontend.pace(self.settings.fps);
        Ok(LoopState::Running)
    }

    fn track_fps(&mut self, now: f64) {
        if let Some(prev) = self.last_frame {
            let dt = now - prev;
            if dt > 0.0 {
                let inst = 1.0 / dt;
                self.fps_estimate = if self.fps_estimate == 0.0 {
                    inst
                } else {
                    self.fps_estimate + FPS_SMOOTHING * (inst - self.fps_estimate)
                };
            }
        }
        self.last_frame = Some(now);
    }

    fn finish(&mut self) {
        self.state = LoopState::Done;
        self.tokens.clear();
    }

    fn summary<F: Frontend>(&self, session: &PlaybackSession<F>) -> LoopSummary {
        LoopSummary {
            frames: self.frames,
            released: self.released,
            time: self.time(session),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::playback::SilentPlayback;
    use crate::types::Event;
    use std::cell::Cell;
    use std::rc::Rc;

    /// Frontend whose clock advances a fixed step per `pace` call.
    struct StepClock {
        now: Rc<Cell<f64>>,
        dt: f64,
        draws: usize,
    }

    impl Frontend for StepClock {
        fn poll_stop(&mut self) -> Result<bool, VizError> {
            Ok(false)
        }
        fn elapsed(&self) -> f64 {
            self.now.get()
        }
        fn draw_rect(&mut self, _rect: Rect, _color: Rgb) -> Result<(), VizError> {
            self.draws += 1;
            Ok(())
        }
        fn present(&mut self, _status: &FrameStatus) -> Result<(), VizError> {
            Ok(())
        }
        fn pace(&mut self, _fps: f64) {
            self.now.set(self.now.get() + self.dt);
        }
    }

    fn session(start: f64, dt: f64) -> PlaybackSession<StepClock> {
        let clock = StepClock {
            now: Rc::new(Cell::new(start)),
            dt,
            draws: 0,
        };
        PlaybackSession::open(clock, |_| Ok(Box::new(SilentPlayback))).unwrap()
    }

    #[test]
    fn test_clock_origin_is_construction_time() {
        let mut s = session(100.0, 0.5);
        let mut sched = EventScheduler::new();
        sched.add(Event::new(0, 0.4, 1.0, 60).unwrap());
        let mut lp = PresentationLoop::new(sched, &s, LoopSettings::default());

        // First frame at t=0: nothing due yet despite the large absolute clock
        lp.step(&mut s).unwrap();
        assert!(lp.tokens().is_empty());
        // Second frame at t=0.5
        lp.step(&mut s).unwrap();
        assert_eq!(lp.tokens().len(), 1);
    }

    #[test]
    fn test_step_after_done_is_noop() {
        let mut s = session(0.0, 0.1);
        let mut lp = PresentationLoop::new(EventScheduler::new(), &s, LoopSettings::default());
        lp.finish();
        assert_eq!(lp.step(&mut s).unwrap(), LoopState::Done);
        assert_eq!(s.frontend().draws, 0);
        assert_eq!(lp.frames, 0);
    }

    #[test]
    fn test_fps_estimate_converges() {
        let mut s = session(0.0, 0.02);
        let mut lp = PresentationLoop::new(EventScheduler::new(), &s, LoopSettings::default());
        for _ in 0..50 {
            lp.step(&mut s).unwrap();
        }
        assert!((lp.fps_estimate - 50.0).abs() < 1.0, "fps={}", lp.fps_estimate);
    }
}
