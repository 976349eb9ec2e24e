use std::time::Duration;

use bevy::{log::trace, math::Vec2};
use rand::{Rng, SeedableRng};
use rand_pcg::Pcg64Mcg;

use crate::data::config::AmbientConfig;

use super::field::Viewport;

/// A single disturbance in normalized viewport space.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Impulse {
    pub position: Vec2,
    pub direction: Vec2,
    pub magnitude: f32,
    pub age: u32,
    pub max_age: u32,
}

impl Impulse {
    pub fn new(position: Vec2, direction: Vec2, magnitude: f32, max_age: u32) -> Self {
        Self {
            position,
            direction: direction.normalize_or_zero(),
            magnitude: magnitude.max(0.0),
            age: 0,
            max_age,
        }
    }

    pub fn is_expired(&self) -> bool {
        self.age > self.max_age
    }
}

/// Turns a stream of screen positions into impulses.
#[derive(Clone, Debug)]
pub struct ImpulseSource {
    viewport: Viewport,
    min_interval: Duration,
    max_age: u32,
    last_position: Option<Vec2>,
    last_emission: Option<Duration>,
    clock: Duration,
}

impl ImpulseSource {
    pub fn new(viewport: Viewport, min_interval: Duration, max_age: u32) -> Self {
        Self {
            viewport,
            min_interval,
            max_age,
            last_position: None,
            last_emission: None,
            clock: Duration::ZERO,
        }
    }

    pub fn set_viewport(&mut self, viewport: Viewport) {
        self.viewport = viewport;
    }

    pub fn viewport(&self) -> &Viewport {
        &self.viewport
    }

    /// Frame time used for events that carry no timestamp of their own.
    pub fn advance_clock(&mut self, now: Duration) {
        self.clock = now;
    }

    /// Forgets the previous position, e.g. when the pointer leaves the window.
    pub fn reset_trail(&mut self) {
        self.last_position = None;
    }

    /// `screen` is in logical pixels from the top-left corner. Returns
    /// `None` when the event falls inside the throttle window.
    pub fn on_pointer_event(
        &mut self,
        screen: Vec2,
        timestamp: Option<Duration>,
    ) -> Option<Impulse> {
        if self.viewport.is_empty() {
            return None;
        }

        let now = timestamp.unwrap_or(self.clock);
        if let Some(last) = self.last_emission {
            if now.checked_sub(last).is_some_and(|elapsed| elapsed < self.min_interval) {
                return None;
            }
        }

        let previous = self.last_position.unwrap_or(screen);
        let delta = (screen - previous) * self.viewport.pixel_ratio;
        let distance = delta.length();
        let (direction, magnitude) = if distance > 0.0 {
            (delta / distance, distance)
        } else {
            (Vec2::ZERO, 1.0)
        };

        self.last_position = Some(screen);
        self.last_emission = Some(now);

        let position = (screen / self.viewport.logical_size()).clamp(Vec2::ZERO, Vec2::ONE);
        Some(Impulse::new(position, direction, magnitude, self.max_age))
    }
}

struct Oscillator {
    col: u32,
    row: u32,
    phase: f32,
    source: ImpulseSource,
}

/// Synthetic impulses from a grid of phase-offset oscillators, so the field
/// keeps moving without user input.
pub struct AmbientGenerator {
    settings: AmbientConfig,
    oscillators: Vec<Oscillator>,
    viewport: Viewport,
    t: f32,
    next_emission: Option<Duration>,
    starters: Vec<Impulse>,
}

impl AmbientGenerator {
    pub fn new(settings: AmbientConfig, viewport: Viewport, max_age: u32) -> Self {
        let mut rng = Pcg64Mcg::seed_from_u64(settings.seed);

        let mut oscillators = Vec::with_capacity(settings.cols as usize * settings.rows as usize);
        for col in 0..settings.cols {
            for row in 0..settings.rows {
                oscillators.push(Oscillator {
                    col,
                    row,
                    phase: rng.random_range(0.0..std::f32::consts::TAU),
                    source: ImpulseSource::new(viewport, Duration::ZERO, max_age),
                });
            }
        }

        let starters = (0..settings.starter_drops)
            .map(|_| {
                let position = Vec2::new(rng.random::<f32>(), rng.random::<f32>());
                Impulse::new(position, Vec2::ZERO, settings.starter_strength, max_age)
            })
            .collect();

        Self {
            settings,
            oscillators,
            viewport,
            t: 0.0,
            next_emission: None,
            starters,
        }
    }

    pub fn set_viewport(&mut self, viewport: Viewport) {
        self.viewport = viewport;
        for oscillator in &mut self.oscillators {
            oscillator.source.set_viewport(viewport);
        }
    }

    pub fn oscillator_count(&self) -> usize {
        self.oscillators.len()
    }

    /// Normalized position of oscillator `(col, row)` at phase `t`.
    fn oscillator_position(&self, oscillator: &Oscillator, t: f32) -> Vec2 {
        let cols = self.settings.cols as f32;
        let rows = self.settings.rows as f32;
        let [jitter_x, jitter_y] = self.settings.jitter;
        let i = oscillator.col as f32;
        let j = oscillator.row as f32;

        Vec2::new(
            (i + 0.5) / cols + (t + i + oscillator.phase).sin() * jitter_x,
            (j + 0.5) / rows + (t + j + oscillator.phase).cos() * jitter_y,
        )
    }

    fn strength(&self, oscillator: &Oscillator, t: f32) -> f32 {
        let i = oscillator.col as f32;
        let j = oscillator.row as f32;
        (self.settings.strength_base + self.settings.strength_amplitude * (t + i + j).cos()).max(0.0)
    }

    /// Impulses due at `now`: the queued starter drops on the first call,
    /// then one impulse per oscillator each interval.
    pub fn poll(&mut self, now: Duration) -> Vec<Impulse> {
        let mut emitted = std::mem::take(&mut self.starters);

        if !self.settings.enabled || self.viewport.is_empty() {
            return emitted;
        }
        if self.next_emission.is_some_and(|next| now < next) {
            return emitted;
        }
        self.next_emission = Some(now + self.settings.interval());
        self.t += self.settings.phase_step;

        let t = self.t;
        let size = self.viewport.logical_size();
        emitted.reserve(self.oscillators.len());

        let mut oscillators = std::mem::take(&mut self.oscillators);
        for oscillator in &mut oscillators {
            let screen = self.oscillator_position(oscillator, t) * size;
            let strength = self.strength(oscillator, t);
            if let Some(mut impulse) = oscillator.source.on_pointer_event(screen, Some(now)) {
                impulse.magnitude = strength;
                emitted.push(impulse);
            }
        }
        self.oscillators = oscillators;

        trace!("ambient generator emitted {} impulses at t={t:.4}", emitted.len());
        emitted
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn viewport() -> Viewport {
        Viewport::new(1000.0, 500.0, 1.0, 2.0)
    }

    fn source() -> ImpulseSource {
        ImpulseSource::new(viewport(), Duration::from_millis(16), 64)
    }

    #[test]
    fn first_event_is_stationary_with_unit_magnitude() {
        let mut source = source();
        let impulse = source
            .on_pointer_event(Vec2::new(500.0, 250.0), Some(Duration::ZERO))
            .expect("first event should emit");
        assert_eq!(impulse.position, Vec2::new(0.5, 0.5));
        assert_eq!(impulse.direction, Vec2::ZERO);
        assert_eq!(impulse.magnitude, 1.0);
        assert_eq!(impulse.age, 0);
    }

    #[test]
    fn direction_and_magnitude_follow_the_motion() {
        let mut source = source();
        source.on_pointer_event(Vec2::new(100.0, 100.0), Some(Duration::ZERO));
        let impulse = source
            .on_pointer_event(Vec2::new(130.0, 140.0), Some(Duration::from_millis(20)))
            .expect("event outside throttle window should emit");
        assert!((impulse.direction - Vec2::new(0.6, 0.8)).length() < 1e-5);
        assert!((impulse.magnitude - 50.0).abs() < 1e-4);
    }

    #[test]
    fn magnitude_uses_physical_pixels() {
        let mut source = ImpulseSource::new(
            Viewport::new(1000.0, 500.0, 2.0, 2.0),
            Duration::ZERO,
            64,
        );
        source.on_pointer_event(Vec2::new(0.0, 0.0), None);
        let impulse = source
            .on_pointer_event(Vec2::new(10.0, 0.0), None)
            .expect("unthrottled source should emit");
        assert!((impulse.magnitude - 20.0).abs() < 1e-4);
    }

    #[test]
    fn coincident_positions_fall_back_to_unit_magnitude() {
        let mut source = source();
        source.on_pointer_event(Vec2::new(10.0, 10.0), Some(Duration::ZERO));
        let impulse = source
            .on_pointer_event(Vec2::new(10.0, 10.0), Some(Duration::from_millis(40)))
            .expect("should emit");
        assert_eq!(impulse.direction, Vec2::ZERO);
        assert_eq!(impulse.magnitude, 1.0);
    }

    #[test]
    fn burst_of_events_is_throttled() {
        let mut source = source();
        let emitted = (0..1000u64)
            .filter_map(|i| {
                let timestamp = Duration::from_micros(i * 16);
                source.on_pointer_event(Vec2::new(i as f32, 100.0), Some(timestamp))
            })
            .count();
        assert!(emitted >= 1);
        assert!(emitted <= 2, "emitted {emitted} impulses inside one 16ms window");
    }

    #[test]
    fn untimed_events_share_the_frame_clock() {
        let mut source = source();
        source.advance_clock(Duration::from_millis(100));
        let first = source.on_pointer_event(Vec2::new(1.0, 1.0), None);
        let second = source.on_pointer_event(Vec2::new(5.0, 1.0), None);
        assert!(first.is_some());
        assert!(second.is_none());

        source.advance_clock(Duration::from_millis(117));
        assert!(source.on_pointer_event(Vec2::new(9.0, 1.0), None).is_some());
    }

    #[test]
    fn reset_trail_starts_a_new_stroke() {
        let mut source = ImpulseSource::new(viewport(), Duration::ZERO, 64);
        source.on_pointer_event(Vec2::new(0.0, 0.0), None);
        source.reset_trail();
        let impulse = source
            .on_pointer_event(Vec2::new(300.0, 0.0), None)
            .expect("should emit");
        assert_eq!(impulse.direction, Vec2::ZERO);
        assert_eq!(impulse.magnitude, 1.0);
    }

    #[test]
    fn empty_viewport_emits_nothing() {
        let mut source = ImpulseSource::new(
            Viewport::new(0.0, 0.0, 1.0, 2.0),
            Duration::ZERO,
            64,
        );
        assert!(source.on_pointer_event(Vec2::ZERO, None).is_none());
    }

    #[test]
    fn ambient_generator_emits_starters_then_one_impulse_per_oscillator() {
        let settings = AmbientConfig::default();
        let mut generator = AmbientGenerator::new(settings.clone(), viewport(), 64);
        assert_eq!(generator.oscillator_count(), 36);

        let first = generator.poll(Duration::ZERO);
        assert_eq!(first.len(), settings.starter_drops as usize + 36);

        let within_interval = generator.poll(Duration::from_millis(10));
        assert!(within_interval.is_empty());

        let next = generator.poll(settings.interval());
        assert_eq!(next.len(), 36);
        assert!(next.iter().all(|impulse| impulse.magnitude > 0.0));
        assert!(next.iter().any(|impulse| impulse.direction != Vec2::ZERO));
        for impulse in &next {
            assert!((0.0..=1.0).contains(&impulse.position.x));
            assert!((0.0..=1.0).contains(&impulse.position.y));
        }
    }

    #[test]
    fn ambient_generator_is_deterministic_for_a_seed() {
        let settings = AmbientConfig::default();
        let mut a = AmbientGenerator::new(settings.clone(), viewport(), 64);
        let mut b = AmbientGenerator::new(settings, viewport(), 64);
        for step in 0..4u64 {
            let now = Duration::from_millis(step * 40);
            assert_eq!(a.poll(now), b.poll(now));
        }
    }

    #[test]
    fn disabled_ambient_only_drops_starters() {
        let settings = AmbientConfig {
            enabled: false,
            ..AmbientConfig::default()
        };
        let mut generator = AmbientGenerator::new(settings, viewport(), 64);
        assert_eq!(generator.poll(Duration::ZERO).len(), 5);
        assert!(generator.poll(Duration::from_secs(1)).is_empty());
    }
}
