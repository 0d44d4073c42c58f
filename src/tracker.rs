//! # Tracker Controller
//!
//! Orchestrates the [`RunSessionState`] machine against a location feed and
//! a 1-second duration timer. The controller owns the single mutable run
//! state; the embedding runtime (UI shell, platform glue) delivers events
//! into it:
//!
//! - `handle_sample` for each fix from the subscribed location feed
//! - `handle_tick` once per second while running
//!
//! Both event sources arrive on one logical thread; the controller itself
//! is synchronous and non-blocking. There is no global store: anything
//! that wants to observe progress registers an observer callback and
//! receives immutable [`RunSnapshot`]s.
//!
//! Pause and stop detach the location subscription immediately. A sample
//! that still arrives afterwards (already queued by the platform) is
//! rejected by the state machine rather than applied.

use log::{debug, warn};
use serde::{Deserialize, Serialize};

use crate::error::{Result, TrackError};
use crate::session::{RunSessionState, RunSnapshot, RunStatus};
use crate::GeoPoint;

/// One timestamped position reading from the location feed.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LocationSample {
    pub lat: f64,
    pub lng: f64,
    /// Instantaneous speed in m/s, when the provider reports one.
    pub speed_mps: Option<f64>,
    /// Epoch milliseconds at which the fix was taken.
    pub timestamp_ms: i64,
}

impl LocationSample {
    pub fn new(lat: f64, lng: f64, speed_mps: Option<f64>, timestamp_ms: i64) -> Self {
        Self {
            lat,
            lng,
            speed_mps,
            timestamp_ms,
        }
    }

    /// The geographic fix carried by this sample.
    pub fn point(&self) -> GeoPoint {
        GeoPoint::new(self.lat, self.lng, self.timestamp_ms)
    }
}

/// Contract for the platform location provider.
///
/// The feed delivers samples asynchronously at whatever cadence it throttles
/// to (time interval and/or minimum displacement); the controller only
/// attaches and detaches it. Permission state is queried up front; a denied
/// permission means tracking never starts.
pub trait LocationFeed {
    /// Whether location access has been granted.
    fn permission_granted(&self) -> bool;

    /// Attach the feed with the requested throttling parameters.
    fn subscribe(&mut self, min_interval_ms: u32, min_displacement_m: f64) -> Result<()>;

    /// Detach the feed; no further samples should be delivered.
    fn unsubscribe(&mut self);
}

/// Tracker configuration.
#[derive(Debug, Clone)]
pub struct TrackerConfig {
    /// Minimum interval between location updates requested from the feed.
    /// Default: 5000 ms
    pub min_interval_ms: u32,

    /// Minimum displacement between location updates requested from the feed.
    /// Default: 10.0 m
    pub min_displacement_m: f64,

    /// Runs shorter than this are discarded instead of saved.
    /// Default: 50.0 m
    pub min_save_distance_m: f64,

    /// Runner weight used by the calorie estimate. Default: 70.0 kg
    pub weight_kg: f64,

    /// Metabolic equivalent used by the calorie estimate. Default: 6.0
    pub met: f64,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            min_interval_ms: 5000,
            min_displacement_m: 10.0,
            min_save_distance_m: 50.0,
            weight_kg: 70.0,
            met: 6.0,
        }
    }
}

/// Observer callback invoked with a fresh snapshot after every accepted
/// sample and every tick.
pub type SnapshotObserver = Box<dyn FnMut(&RunSnapshot)>;

/// Orchestrates the run state machine against a location feed and timer.
pub struct TrackerController<F: LocationFeed> {
    state: RunSessionState,
    feed: F,
    config: TrackerConfig,
    observers: Vec<SnapshotObserver>,
}

impl<F: LocationFeed> TrackerController<F> {
    pub fn new(feed: F) -> Self {
        Self::with_config(feed, TrackerConfig::default())
    }

    pub fn with_config(feed: F, config: TrackerConfig) -> Self {
        Self {
            state: RunSessionState::new(),
            feed,
            config,
            observers: Vec::new(),
        }
    }

    pub fn status(&self) -> RunStatus {
        self.state.status()
    }

    pub fn config(&self) -> &TrackerConfig {
        &self.config
    }

    /// Take an immutable snapshot of the current run state.
    pub fn snapshot(&self) -> RunSnapshot {
        self.state.snapshot()
    }

    /// Register an observer for state changes.
    ///
    /// There is no shared global state to subscribe to; anything that
    /// wants progress updates registers here, on the owning controller.
    pub fn add_observer(&mut self, observer: SnapshotObserver) {
        self.observers.push(observer);
    }

    // ========================================================================
    // Lifecycle
    // ========================================================================

    /// Begin tracking a new run at `now_ms`.
    ///
    /// Fails with [`TrackError::PermissionDenied`] when location access is
    /// not granted, and with the provider's error when the subscription
    /// cannot be attached. Either way the state stays `Idle`; the
    /// surrounding UI decides whether to retry.
    pub fn start(&mut self, now_ms: i64) -> Result<()> {
        if !self.feed.permission_granted() {
            warn!("location permission not granted, tracking not started");
            return Err(TrackError::PermissionDenied);
        }

        self.state.start(now_ms)?;
        if let Err(err) = self
            .feed
            .subscribe(self.config.min_interval_ms, self.config.min_displacement_m)
        {
            warn!("location subscribe failed, tracking not started: {err}");
            self.state.reset();
            return Err(err);
        }
        debug!("tracking started at {now_ms}");
        self.notify();
        Ok(())
    }

    /// Pause the run: detach the location subscription and freeze the timer.
    pub fn pause(&mut self, now_ms: i64) -> Result<()> {
        self.state.pause(now_ms)?;
        self.feed.unsubscribe();
        debug!("tracking paused at {now_ms}");
        self.notify();
        Ok(())
    }

    /// Resume a paused run: reattach the feed and unfreeze the timer.
    ///
    /// A provider error re-freezes the run at `now_ms` (no paused time is
    /// lost) so the caller can retry the resume.
    pub fn resume(&mut self, now_ms: i64) -> Result<()> {
        self.state.resume(now_ms)?;
        if let Err(err) = self
            .feed
            .subscribe(self.config.min_interval_ms, self.config.min_displacement_m)
        {
            warn!("location subscribe failed, run stays paused: {err}");
            let _ = self.state.pause(now_ms);
            return Err(err);
        }
        debug!("tracking resumed at {now_ms}");
        self.notify();
        Ok(())
    }

    /// Stop the run: detach the subscription and freeze all fields.
    ///
    /// The frozen snapshot stays readable until [`reset`](Self::reset);
    /// persisting or discarding it is the caller's decision (see
    /// [`RunRecorder`](crate::service::RunRecorder)).
    pub fn stop(&mut self, now_ms: i64) -> Result<()> {
        self.state.stop(now_ms)?;
        self.feed.unsubscribe();
        debug!("tracking stopped at {now_ms}");
        self.notify();
        Ok(())
    }

    /// Clear back to `Idle` defaults, detaching the feed if needed.
    pub fn reset(&mut self) {
        self.feed.unsubscribe();
        self.state.reset();
        self.notify();
    }

    // ========================================================================
    // Event delivery
    // ========================================================================

    /// Deliver one location sample from the feed.
    ///
    /// Returns `true` if the sample was accepted. Samples arriving while
    /// not `Running` (late deliveries after pause/stop) are dropped.
    pub fn handle_sample(&mut self, sample: LocationSample) -> bool {
        let accepted = self.state.record_sample(sample.point(), sample.speed_mps);
        if accepted {
            self.notify();
        } else {
            debug!(
                "dropping sample at {} while {:?}",
                sample.timestamp_ms,
                self.state.status()
            );
        }
        accepted
    }

    /// Deliver one 1-second timer tick.
    ///
    /// Returns `true` if the tick was applied (ignored unless `Running`).
    pub fn handle_tick(&mut self, now_ms: i64) -> bool {
        let applied = self.state.tick(now_ms);
        if applied {
            self.notify();
        }
        applied
    }

    fn notify(&mut self) {
        if self.observers.is_empty() {
            return;
        }
        let snapshot = self.state.snapshot();
        for observer in &mut self.observers {
            observer(&snapshot);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::rc::Rc;

    /// Scripted feed for tests: permission and subscribe failures are
    /// configurable and the subscription state is observable.
    #[derive(Debug, Default)]
    pub(crate) struct FakeFeed {
        pub granted: bool,
        pub fail_subscribe: bool,
        pub subscribed: bool,
        pub subscribe_count: u32,
    }

    impl FakeFeed {
        pub fn granted() -> Self {
            Self {
                granted: true,
                ..Self::default()
            }
        }
    }

    impl LocationFeed for FakeFeed {
        fn permission_granted(&self) -> bool {
            self.granted
        }

        fn subscribe(&mut self, _min_interval_ms: u32, _min_displacement_m: f64) -> Result<()> {
            if self.fail_subscribe {
                return Err(TrackError::storage("location provider unavailable"));
            }
            self.subscribed = true;
            self.subscribe_count += 1;
            Ok(())
        }

        fn unsubscribe(&mut self) {
            self.subscribed = false;
        }
    }

    fn sample(lat: f64, lng: f64, ts: i64) -> LocationSample {
        LocationSample::new(lat, lng, None, ts)
    }

    #[test]
    fn test_permission_denied_stays_idle() {
        let mut tracker = TrackerController::new(FakeFeed::default());
        let err = tracker.start(0).unwrap_err();
        assert!(matches!(err, TrackError::PermissionDenied));
        assert_eq!(tracker.status(), RunStatus::Idle);
        assert!(!tracker.feed.subscribed);
    }

    #[test]
    fn test_provider_error_on_start_leaves_idle() {
        let mut tracker = TrackerController::new(FakeFeed {
            granted: true,
            fail_subscribe: true,
            ..FakeFeed::default()
        });

        let err = tracker.start(0).unwrap_err();
        assert!(matches!(err, TrackError::Storage { .. }));
        assert_eq!(tracker.status(), RunStatus::Idle);
        assert!(tracker.snapshot().started_at_ms.is_none());

        // Once the provider recovers, tracking starts normally.
        tracker.feed.fail_subscribe = false;
        tracker.start(1_000).unwrap();
        assert_eq!(tracker.status(), RunStatus::Running);
    }

    #[test]
    fn test_provider_error_on_resume_keeps_run_paused() {
        let mut tracker = TrackerController::new(FakeFeed::granted());
        tracker.start(0).unwrap();
        tracker.handle_tick(10_000);
        tracker.pause(10_000).unwrap();

        tracker.feed.fail_subscribe = true;
        assert!(tracker.resume(20_000).is_err());
        assert_eq!(tracker.status(), RunStatus::Paused);

        // A later successful resume still excludes all paused wall time.
        tracker.feed.fail_subscribe = false;
        tracker.resume(70_000).unwrap();
        tracker.handle_tick(80_000);
        assert_eq!(tracker.snapshot().duration_s, 20);
    }

    #[test]
    fn test_start_subscribes_feed() {
        let mut tracker = TrackerController::new(FakeFeed::granted());
        tracker.start(0).unwrap();
        assert_eq!(tracker.status(), RunStatus::Running);
        assert!(tracker.feed.subscribed);
    }

    #[test]
    fn test_pause_detaches_and_rejects_late_samples() {
        let mut tracker = TrackerController::new(FakeFeed::granted());
        tracker.start(0).unwrap();
        assert!(tracker.handle_sample(sample(51.5074, -0.1278, 0)));

        tracker.pause(5_000).unwrap();
        assert!(!tracker.feed.subscribed);

        // A sample already queued by the platform arrives after detach.
        assert!(!tracker.handle_sample(sample(51.5090, -0.1300, 5_500)));
        assert_eq!(tracker.snapshot().route.len(), 1);
    }

    #[test]
    fn test_resume_resubscribes() {
        let mut tracker = TrackerController::new(FakeFeed::granted());
        tracker.start(0).unwrap();
        tracker.pause(5_000).unwrap();
        tracker.resume(10_000).unwrap();

        assert!(tracker.feed.subscribed);
        assert_eq!(tracker.feed.subscribe_count, 2);
        assert!(tracker.handle_sample(sample(51.5074, -0.1278, 10_000)));
    }

    #[test]
    fn test_stop_freezes_snapshot() {
        let mut tracker = TrackerController::new(FakeFeed::granted());
        tracker.start(0).unwrap();
        tracker.handle_sample(sample(51.5074, -0.1278, 0));
        tracker.handle_sample(sample(51.5090, -0.1300, 60_000));
        tracker.handle_tick(60_000);
        tracker.stop(65_000).unwrap();

        let frozen = tracker.snapshot();
        assert_eq!(frozen.status, RunStatus::Stopped);
        assert!(!tracker.handle_tick(70_000));
        assert!(!tracker.handle_sample(sample(51.5100, -0.1310, 70_000)));
        assert_eq!(tracker.snapshot().duration_s, frozen.duration_s);
    }

    #[test]
    fn test_observers_receive_snapshots() {
        let seen: Rc<RefCell<Vec<RunStatus>>> = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&seen);

        let mut tracker = TrackerController::new(FakeFeed::granted());
        tracker.add_observer(Box::new(move |snap| sink.borrow_mut().push(snap.status)));

        tracker.start(0).unwrap();
        tracker.handle_sample(sample(51.5074, -0.1278, 0));
        tracker.handle_tick(1_000);
        tracker.stop(2_000).unwrap();

        let statuses = seen.borrow();
        assert_eq!(
            statuses.as_slice(),
            &[
                RunStatus::Running,
                RunStatus::Running,
                RunStatus::Running,
                RunStatus::Stopped
            ]
        );
    }

    #[test]
    fn test_reset_from_stopped_returns_idle() {
        let mut tracker = TrackerController::new(FakeFeed::granted());
        tracker.start(0).unwrap();
        tracker.stop(1_000).unwrap();
        tracker.reset();
        assert_eq!(tracker.status(), RunStatus::Idle);

        // A new run can start from Idle again.
        tracker.start(2_000).unwrap();
        assert_eq!(tracker.status(), RunStatus::Running);
    }
}
