use crate::error::VizError;
use crate::playback::Playback;
use crate::presentation::Frontend;
use crossbeam_channel::{unbounded, Receiver, Sender};
use log::{info, warn};

/// Everything the presentation loop borrows from the outside world: the
/// frontend (display, clock, input) and the running playback.
///
/// Built once before the loop starts. Dropping the session stops playback,
/// and dropping the frontend restores the display, so both are released on
/// every exit path, error returns included.
pub struct PlaybackSession<F: Frontend> {
    frontend: F,
    playback: Box<dyn Playback>,
    faults: Receiver<String>,
}

impl<F: Frontend> PlaybackSession<F> {
    /// Take ownership of `frontend` and start playback. `start_playback`
    /// receives the sender half of the fault channel; any message sent on it
    /// ends the presentation loop with a playback error.
    pub fn open<P>(frontend: F, start_playback: P) -> Result<Self, VizError>
    where
        P: FnOnce(Sender<String>) -> Result<Box<dyn Playback>, VizError>,
    {
        let (fault_tx, faults) = unbounded();
        let playback = start_playback(fault_tx)?;
        info!("Playback session open");
        Ok(Self {
            frontend,
            playback,
            faults,
        })
    }

    pub fn frontend(&self) -> &F {
        &self.frontend
    }

    pub fn frontend_mut(&mut self) -> &mut F {
        &mut self.frontend
    }

    /// Surface the first reported playback fault, if any.
    pub fn check_playback(&self) -> Result<(), VizError> {
        match self.faults.try_recv() {
            Ok(msg) => Err(VizError::Playback(msg)),
            Err(_) => Ok(()),
        }
    }
}

impl<F: Frontend> Drop for PlaybackSession<F> {
    fn drop(&mut self) {
        self.playback.stop();
        while let Ok(msg) = self.faults.try_recv() {
            warn!("Unreported playback fault at shutdown: {}", msg);
        }
        info!("Playback session closed");
    }
}
