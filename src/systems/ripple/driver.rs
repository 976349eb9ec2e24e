use std::fmt;

use bevy::log::debug;

use super::{field::Viewport, simulation::FieldSimulation};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum DriverPhase {
    #[default]
    Idle,
    Running,
    Resizing,
    Stopped,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DriverError {
    CapabilityUnavailable,
    AlreadyStopped,
}

impl fmt::Display for DriverError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::CapabilityUnavailable => write!(f, "no rendering context for the ripple field"),
            Self::AlreadyStopped => write!(f, "ripple driver was already stopped"),
        }
    }
}

impl std::error::Error for DriverError {}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TickOutcome {
    /// Not running or not scheduled; nothing happened.
    Skipped,
    /// Viewport is below the run threshold; nothing drawn, not rescheduled
    /// and the field is left at its last applied size.
    Paused,
    /// The field was advanced and encoded; upload and draw it.
    Presented { resized: bool },
}

impl TickOutcome {
    pub fn resized(&self) -> bool {
        matches!(self, Self::Presented { resized: true })
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct RunPolicy {
    pub min_width: f32,
}

impl RunPolicy {
    pub fn allows(&self, viewport: &Viewport) -> bool {
        !viewport.is_empty() && viewport.width >= self.min_width
    }
}

/// Per-view control loop. Each scheduled tick checks the viewport, then
/// evolves and encodes the field; `stop` revokes any pending tick.
#[derive(Clone, Debug)]
pub struct FrameDriver {
    phase: DriverPhase,
    scheduled: bool,
    policy: RunPolicy,
    /// Viewport the simulation was last sized for.
    viewport: Option<Viewport>,
    /// Viewport seen by the most recent tick.
    observed: Option<Viewport>,
    frames: u64,
    resizes: u64,
}

impl FrameDriver {
    pub fn new(policy: RunPolicy) -> Self {
        Self {
            phase: DriverPhase::Idle,
            scheduled: false,
            policy,
            viewport: None,
            observed: None,
            frames: 0,
            resizes: 0,
        }
    }

    pub fn phase(&self) -> DriverPhase {
        self.phase
    }

    pub fn is_scheduled(&self) -> bool {
        self.scheduled
    }

    pub fn frames(&self) -> u64 {
        self.frames
    }

    pub fn resizes(&self) -> u64 {
        self.resizes
    }

    /// `capable` reports whether a rendering context was acquired. Without
    /// one the driver stays idle.
    pub fn start(&mut self, capable: bool, viewport: Viewport) -> Result<(), DriverError> {
        match self.phase {
            DriverPhase::Stopped => return Err(DriverError::AlreadyStopped),
            DriverPhase::Running | DriverPhase::Resizing => return Ok(()),
            DriverPhase::Idle => {}
        }
        if !capable {
            return Err(DriverError::CapabilityUnavailable);
        }

        self.phase = DriverPhase::Running;
        self.viewport = Some(viewport);
        self.observed = Some(viewport);
        self.scheduled = true;
        debug!(
            "ripple driver started at {}x{}",
            viewport.width,
            viewport.height
        );
        Ok(())
    }

    pub fn stop(&mut self) {
        if self.phase != DriverPhase::Stopped {
            debug!("ripple driver stopped after {} frames", self.frames);
        }
        self.phase = DriverPhase::Stopped;
        self.scheduled = false;
    }

    /// Re-arms a paused driver once the viewport changes to one the policy
    /// allows.
    pub fn on_viewport_changed(&mut self, viewport: &Viewport) {
        if self.phase != DriverPhase::Running || self.scheduled {
            return;
        }
        if self.observed.as_ref() != Some(viewport) && self.policy.allows(viewport) {
            self.scheduled = true;
        }
    }

    pub fn tick(&mut self, viewport: Viewport, simulation: &mut dyn FieldSimulation) -> TickOutcome {
        if self.phase != DriverPhase::Running || !self.scheduled {
            return TickOutcome::Skipped;
        }
        self.scheduled = false;
        self.observed = Some(viewport);

        // Narrow viewports keep the current allocation until they widen.
        if !self.policy.allows(&viewport) {
            return TickOutcome::Paused;
        }

        let resized = self.viewport != Some(viewport);
        if resized {
            self.phase = DriverPhase::Resizing;
            let reallocated = simulation.resize(&viewport);
            debug!(
                "viewport now {}x{} (field reallocated: {reallocated})",
                viewport.width,
                viewport.height
            );
            self.viewport = Some(viewport);
            self.resizes += 1;
            self.phase = DriverPhase::Running;
        }

        simulation.tick();
        simulation.encode();
        self.frames += 1;
        self.scheduled = true;
        TickOutcome::Presented { resized }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        data::config::SimulationConfig,
        systems::ripple::simulation::{build_simulation, FieldStrategy},
    };

    fn viewport(width: f32) -> Viewport {
        Viewport::new(width, 720.0, 1.0, 2.0)
    }

    fn policy() -> RunPolicy {
        RunPolicy { min_width: 600.0 }
    }

    fn simulation() -> Box<dyn FieldSimulation> {
        build_simulation(
            FieldStrategy::Splat,
            &SimulationConfig::default(),
            &viewport(1280.0),
        )
    }

    #[test]
    fn starts_idle_and_never_ticks_before_start() {
        let mut driver = FrameDriver::new(policy());
        let mut simulation = simulation();
        assert_eq!(driver.phase(), DriverPhase::Idle);
        assert_eq!(driver.tick(viewport(1280.0), simulation.as_mut()), TickOutcome::Skipped);
        assert_eq!(driver.frames(), 0);
    }

    #[test]
    fn missing_capability_keeps_driver_idle() {
        let mut driver = FrameDriver::new(policy());
        assert_eq!(
            driver.start(false, viewport(1280.0)),
            Err(DriverError::CapabilityUnavailable)
        );
        assert_eq!(driver.phase(), DriverPhase::Idle);
        assert!(!driver.is_scheduled());
    }

    #[test]
    fn running_ticks_reschedule_themselves() {
        let mut driver = FrameDriver::new(policy());
        let mut simulation = simulation();
        driver.start(true, viewport(1280.0)).expect("driver should start");

        for _ in 0..3 {
            assert_eq!(
                driver.tick(viewport(1280.0), simulation.as_mut()),
                TickOutcome::Presented { resized: false }
            );
            assert!(driver.is_scheduled());
        }
        assert_eq!(driver.frames(), 3);
        assert_eq!(driver.resizes(), 0);
    }

    #[test]
    fn viewport_change_passes_through_resizing() {
        let mut driver = FrameDriver::new(policy());
        let mut simulation = simulation();
        driver.start(true, viewport(1280.0)).expect("driver should start");

        let outcome = driver.tick(viewport(1024.0), simulation.as_mut());
        assert_eq!(outcome, TickOutcome::Presented { resized: true });
        assert!(outcome.resized());
        assert_eq!(driver.phase(), DriverPhase::Running);
        assert_eq!(driver.resizes(), 1);
        assert_eq!(simulation.encoded().dims().y, 45);
    }

    #[test]
    fn narrow_viewport_pauses_until_it_widens() {
        let mut driver = FrameDriver::new(policy());
        let mut simulation = simulation();
        driver.start(true, viewport(1280.0)).expect("driver should start");

        let dims = simulation.encoded().dims();
        assert_eq!(driver.tick(viewport(500.0), simulation.as_mut()), TickOutcome::Paused);
        assert!(!driver.is_scheduled());
        assert_eq!(simulation.encoded().dims(), dims);
        assert_eq!(driver.resizes(), 0);
        assert_eq!(driver.tick(viewport(500.0), simulation.as_mut()), TickOutcome::Skipped);

        driver.on_viewport_changed(&viewport(550.0));
        assert!(!driver.is_scheduled());

        driver.on_viewport_changed(&viewport(900.0));
        assert!(driver.is_scheduled());
        assert_eq!(
            driver.tick(viewport(900.0), simulation.as_mut()),
            TickOutcome::Presented { resized: true }
        );
    }

    #[test]
    fn unchanged_viewport_does_not_rearm_a_paused_driver() {
        let mut driver = FrameDriver::new(policy());
        let mut simulation = simulation();
        driver.start(true, viewport(500.0)).expect("driver should start");
        assert_eq!(driver.tick(viewport(500.0), simulation.as_mut()), TickOutcome::Paused);
        driver.on_viewport_changed(&viewport(500.0));
        assert!(!driver.is_scheduled());
    }

    #[test]
    fn returning_to_the_original_width_resumes_without_resizing() {
        let mut driver = FrameDriver::new(policy());
        let mut simulation = simulation();
        driver.start(true, viewport(1280.0)).expect("driver should start");

        assert_eq!(driver.tick(viewport(500.0), simulation.as_mut()), TickOutcome::Paused);
        driver.on_viewport_changed(&viewport(1280.0));
        assert!(driver.is_scheduled());
        assert_eq!(
            driver.tick(viewport(1280.0), simulation.as_mut()),
            TickOutcome::Presented { resized: false }
        );
        assert_eq!(driver.resizes(), 0);
    }

    #[test]
    fn min_width_is_a_policy() {
        let mut driver = FrameDriver::new(RunPolicy { min_width: 0.0 });
        let mut simulation = simulation();
        driver.start(true, viewport(320.0)).expect("driver should start");
        assert_eq!(
            driver.tick(viewport(320.0), simulation.as_mut()),
            TickOutcome::Presented { resized: false }
        );
    }

    #[test]
    fn ticks_after_stop_are_no_ops() {
        let mut driver = FrameDriver::new(policy());
        let mut simulation = simulation();
        driver.start(true, viewport(1280.0)).expect("driver should start");
        driver.tick(viewport(1280.0), simulation.as_mut());
        assert!(driver.is_scheduled());

        driver.stop();
        assert_eq!(driver.phase(), DriverPhase::Stopped);
        assert!(!driver.is_scheduled());
        for _ in 0..3 {
            assert_eq!(driver.tick(viewport(1280.0), simulation.as_mut()), TickOutcome::Skipped);
        }
        driver.on_viewport_changed(&viewport(1600.0));
        assert!(!driver.is_scheduled());
        assert_eq!(driver.frames(), 1);
        assert_eq!(
            driver.start(true, viewport(1280.0)),
            Err(DriverError::AlreadyStopped)
        );
    }
}
