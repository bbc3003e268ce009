//! Glue between the location service and the tag store.
//!
//! [`TagAdapter`] turns each check-in/check-out into tag mutations and
//! schedules self-expiring removals. [`LocationBridge`] owns the service
//! lifecycle: it authenticates, and subscribes the adapter once the service
//! reports that it started. An optional [`AdapterDelegate`] hears about
//! applied tags and session changes.

use std::collections::BTreeSet;
use std::sync::{Arc, Weak};

use tracing::{debug, error, info, warn};

use crate::config::ExpiryConfig;
use crate::error::Result;
use crate::location::{
    ApplicationNotificationListener, LocationError, LocationService, SdkCredentials,
    ServiceStatusListener,
};
use crate::router::{EventRouter, RoutedEvent};
use crate::scheduler::ExpiryScheduler;
use crate::store::TagStore;
use crate::types::{
    BeaconInfo, CustomData, FenceEvent, FenceInfo, LocationInfo, Proximity, ZoneInfo,
};

/// Host callbacks for tag changes and location sessions.
///
/// All methods default to doing nothing.
pub trait AdapterDelegate: Send + Sync {
    /// Called once an event's tags are committed. `tags` holds the tags added
    /// by a check-in or removed by a check-out.
    fn on_tags_applied(&self, _event: &FenceEvent, _tags: &BTreeSet<String>) {}

    /// Called when the location service has authenticated and started.
    fn on_authenticated(&self) {}

    /// Called when the location service stops, including after a rejected start.
    fn on_logged_out(&self) {}
}

/// Applies routed tag mutations and registers deferred removals.
pub struct TagAdapter {
    router: EventRouter,
    store: Arc<dyn TagStore>,
    scheduler: ExpiryScheduler,
    delegate: Option<Arc<dyn AdapterDelegate>>,
}

impl TagAdapter {
    /// Creates an adapter from its parts.
    pub fn new(router: EventRouter, store: Arc<dyn TagStore>, scheduler: ExpiryScheduler) -> Self {
        Self {
            router,
            store,
            scheduler,
            delegate: None,
        }
    }

    /// Attaches a delegate. A [`LocationBridge`] built from this adapter
    /// reports session changes to the same delegate.
    #[must_use]
    pub fn with_delegate(mut self, delegate: Arc<dyn AdapterDelegate>) -> Self {
        self.delegate = Some(delegate);
        self
    }

    /// The attached delegate, if any.
    pub const fn delegate(&self) -> Option<&Arc<dyn AdapterDelegate>> {
        self.delegate.as_ref()
    }

    /// Creates an adapter and spawns its expiry dispatcher.
    ///
    /// Must be called inside a Tokio runtime.
    pub fn from_config(config: &ExpiryConfig, store: Arc<dyn TagStore>) -> Self {
        let scheduler = ExpiryScheduler::spawn(Arc::clone(&store), config.policy);
        Self::new(EventRouter::new(config.delay()), store, scheduler)
    }

    /// The tag store mutations are applied to.
    pub fn store(&self) -> &Arc<dyn TagStore> {
        &self.store
    }

    /// The expiry scheduler.
    pub const fn scheduler(&self) -> &ExpiryScheduler {
        &self.scheduler
    }

    /// The event router.
    pub const fn router(&self) -> &EventRouter {
        &self.router
    }

    /// Routes `event`, applies the immediate mutation and schedules any
    /// deferred removal.
    ///
    /// The immediate mutation is committed before this returns. Pending
    /// removals for the same zone and target are only superseded once the
    /// mutation has been applied.
    ///
    /// # Errors
    ///
    /// Returns an error if the tag store rejects the mutation or the expiry
    /// dispatcher has stopped. When the mutation fails nothing is superseded
    /// or scheduled, so an earlier removal still fires.
    pub fn handle(&self, event: &FenceEvent) -> Result<RoutedEvent> {
        let routed = self.router.route(event);

        self.store.apply(&routed.mutation)?;

        if let Some(delegate) = &self.delegate {
            let tags = if event.is_check_in() {
                &routed.mutation.add
            } else {
                &routed.mutation.remove
            };
            delegate.on_tags_applied(event, tags);
        }

        self.scheduler.supersede(&routed.key)?;
        if let Some(removal) = &routed.deferred {
            self.scheduler.schedule(removal.clone())?;
        }

        info!(
            kind = event.kind_label(),
            zone = event.zone(),
            target = event.target(),
            added = routed.mutation.add.len(),
            removed = routed.mutation.remove.len(),
            expires = routed.deferred.is_some(),
            "Applied location tags"
        );
        Ok(routed)
    }

    fn dispatch(&self, event: &FenceEvent) {
        if let Err(err) = self.handle(event) {
            error!(
                kind = event.kind_label(),
                zone = event.zone(),
                target = event.target(),
                error = %err,
                "Failed to apply location tags"
            );
        }
    }
}

impl ApplicationNotificationListener for TagAdapter {
    fn on_check_into_fence(
        &self,
        fence: &FenceInfo,
        zone: &ZoneInfo,
        _location: &LocationInfo,
        _custom_data: &CustomData,
        will_check_out: bool,
    ) {
        self.dispatch(&FenceEvent::fence_check_in(fence, zone, will_check_out));
    }

    fn on_checked_out_from_fence(
        &self,
        fence: &FenceInfo,
        zone: &ZoneInfo,
        dwell_minutes: u32,
        _custom_data: &CustomData,
    ) {
        self.dispatch(&FenceEvent::fence_check_out(fence, zone, dwell_minutes));
    }

    fn on_check_into_beacon(
        &self,
        beacon: &BeaconInfo,
        zone: &ZoneInfo,
        _location: &LocationInfo,
        _proximity: Proximity,
        _custom_data: &CustomData,
        will_check_out: bool,
    ) {
        self.dispatch(&FenceEvent::beacon_check_in(beacon, zone, will_check_out));
    }

    fn on_checked_out_from_beacon(
        &self,
        beacon: &BeaconInfo,
        zone: &ZoneInfo,
        dwell_minutes: u32,
        _custom_data: &CustomData,
    ) {
        self.dispatch(&FenceEvent::beacon_check_out(beacon, zone, dwell_minutes));
    }
}

/// Subscribes the adapter when the service starts and unsubscribes it when
/// the service stops.
struct BridgeStatusListener {
    service: Weak<dyn LocationService>,
    adapter: Arc<dyn ApplicationNotificationListener>,
    delegate: Option<Arc<dyn AdapterDelegate>>,
}

impl ServiceStatusListener for BridgeStatusListener {
    fn on_service_started(&self) {
        if let Some(service) = self.service.upgrade() {
            service.subscribe(Arc::clone(&self.adapter));
            info!("Subscribed to location notifications");
        }
        if let Some(delegate) = &self.delegate {
            delegate.on_authenticated();
        }
    }

    fn on_service_stopped(&self) {
        if let Some(service) = self.service.upgrade() {
            service.unsubscribe(&self.adapter);
            info!("Unsubscribed from location notifications");
        }
        if let Some(delegate) = &self.delegate {
            delegate.on_logged_out();
        }
    }

    fn on_service_error(&self, error: &LocationError) {
        warn!(fatal = error.is_fatal(), %error, "Location service error");
    }

    fn on_rule_update(&self, zones: &[ZoneInfo]) {
        debug!(zones = zones.len(), "Location rules updated");
    }
}

/// Drives the location service lifecycle for a [`TagAdapter`].
pub struct LocationBridge {
    service: Arc<dyn LocationService>,
    status: Arc<BridgeStatusListener>,
}

impl LocationBridge {
    /// Creates a bridge. Nothing is started until [`start`](Self::start).
    pub fn new(service: Arc<dyn LocationService>, adapter: Arc<TagAdapter>) -> Self {
        let status = Arc::new(BridgeStatusListener {
            service: Arc::downgrade(&service),
            delegate: adapter.delegate().cloned(),
            adapter,
        });
        Self { service, status }
    }

    /// Authenticates with the location service unless it is already running.
    ///
    /// # Errors
    ///
    /// Returns the service's error if the credentials are rejected.
    pub fn start(&self, credentials: &SdkCredentials) -> Result<()> {
        if self.service.is_running() {
            debug!("Location service already running");
            return Ok(());
        }
        self.service
            .authenticate(credentials, Arc::clone(&self.status) as Arc<dyn ServiceStatusListener>)?;
        Ok(())
    }

    /// Stops the location service if it is running.
    pub fn stop(&self) {
        if self.service.is_running() {
            self.service.stop();
        }
    }

    /// Returns `true` while the location service is running.
    pub fn is_service_running(&self) -> bool {
        self.service.is_running()
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeSet;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use std::time::Duration;

    use super::*;
    use crate::error::FencetagError;
    use crate::location::{InProcessLocationService, LocationNotification};
    use crate::scheduler::ExpiryPolicy;
    use crate::store::{InMemoryTagStore, StoreError, StoreResult};
    use crate::tags::TagMutation;
    use crate::types::GeometryKind;

    const DELAY: Duration = Duration::from_millis(7000);

    fn set(tags: &[&str]) -> BTreeSet<String> {
        tags.iter().map(ToString::to_string).collect()
    }

    fn credentials() -> SdkCredentials {
        SdkCredentials {
            package_name: "au.com.example.app".into(),
            api_key: "2b0c2c4e-5f0e-11e6-8b77-86f30ca893d3".into(),
            user_name: "ops@example.com".into(),
            endpoint_url: None,
            restart_mode: false,
        }
    }

    fn build_adapter(policy: ExpiryPolicy) -> (Arc<InMemoryTagStore>, TagAdapter) {
        let store = Arc::new(InMemoryTagStore::new());
        let config = ExpiryConfig {
            delay_ms: 7000,
            policy,
        };
        let adapter = TagAdapter::from_config(&config, store.clone());
        (store, adapter)
    }

    fn fence_in(zone: &str, fence: &str, geometry: GeometryKind, will_check_out: bool) -> FenceEvent {
        FenceEvent::fence_check_in(&FenceInfo::new(fence, geometry), &ZoneInfo::named(zone), will_check_out)
    }

    #[tokio::test(start_paused = true)]
    async fn test_polygon_fence_waits_for_real_checkout() {
        let (store, adapter) = build_adapter(ExpiryPolicy::FireAlways);

        let routed = adapter
            .handle(&fence_in("Z1", "F1", GeometryKind::Polygon, true))
            .unwrap();
        assert!(routed.deferred.is_none());
        assert_eq!(store.tags().unwrap(), set(&["zone_Z1", "fence_F1"]));

        tokio::time::sleep(DELAY * 2).await;
        assert_eq!(store.tags().unwrap(), set(&["zone_Z1", "fence_F1"]));
        assert!(adapter.scheduler().pending().await.unwrap().is_empty());

        adapter
            .handle(&FenceEvent::fence_check_out(
                &FenceInfo::new("F1", GeometryKind::Polygon),
                &ZoneInfo::named("Z1"),
                14,
            ))
            .unwrap();
        assert!(store.tags().unwrap().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_line_string_fence_self_expires() {
        let (store, adapter) = build_adapter(ExpiryPolicy::FireAlways);

        adapter
            .handle(&fence_in("Z1", "F2", GeometryKind::LineString, true))
            .unwrap();
        assert_eq!(store.tags().unwrap(), set(&["zone_Z1", "fence_F2"]));

        tokio::time::sleep(Duration::from_millis(6900)).await;
        assert_eq!(store.tags().unwrap(), set(&["zone_Z1", "fence_F2"]));

        tokio::time::sleep(Duration::from_millis(200)).await;
        assert!(store.tags().unwrap().is_empty());
        assert_eq!(adapter.scheduler().stats().fired, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_untracked_beacon_self_expires() {
        let (store, adapter) = build_adapter(ExpiryPolicy::CancelOnReentry);

        let routed = adapter
            .handle(&FenceEvent::beacon_check_in(
                &BeaconInfo::named("B1"),
                &ZoneInfo::named("Z2"),
                false,
            ))
            .unwrap();
        let deferred = routed.deferred.unwrap();
        assert_eq!(deferred.remove, set(&["zone_Z2", "beacon_B1"]));
        assert_eq!(deferred.delay, DELAY);
        assert_eq!(store.tags().unwrap(), set(&["zone_Z2", "beacon_B1"]));

        tokio::time::sleep(DELAY + Duration::from_millis(1)).await;
        assert!(store.tags().unwrap().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_reentry_keeps_tags_under_cancel_policy() {
        let (store, adapter) = build_adapter(ExpiryPolicy::CancelOnReentry);
        let event = fence_in("Z1", "F1", GeometryKind::Polygon, false);

        adapter.handle(&event).unwrap();
        tokio::time::sleep(Duration::from_millis(5000)).await;
        adapter.handle(&event).unwrap();

        tokio::time::sleep(Duration::from_millis(3000)).await;
        assert_eq!(store.tags().unwrap(), set(&["zone_Z1", "fence_F1"]));

        tokio::time::sleep(Duration::from_millis(4100)).await;
        assert!(store.tags().unwrap().is_empty());
        assert_eq!(adapter.scheduler().stats().superseded, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_reentry_strips_tags_under_fire_always_policy() {
        let (store, adapter) = build_adapter(ExpiryPolicy::FireAlways);
        let event = fence_in("Z1", "F1", GeometryKind::Polygon, false);

        adapter.handle(&event).unwrap();
        tokio::time::sleep(Duration::from_millis(5000)).await;
        adapter.handle(&event).unwrap();

        // The first removal fires at 7000 ms even though the fence was re-entered.
        tokio::time::sleep(Duration::from_millis(3000)).await;
        assert!(store.tags().unwrap().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_checkout_cancels_pending_removal() {
        let (store, adapter) = build_adapter(ExpiryPolicy::CancelOnReentry);
        adapter
            .handle(&fence_in("Z1", "F2", GeometryKind::LineString, true))
            .unwrap();
        adapter
            .handle(&FenceEvent::FenceCheckOut {
                zone: "Z1".into(),
                fence: "F2".into(),
                dwell_minutes: 0,
            })
            .unwrap();

        assert!(store.tags().unwrap().is_empty());
        assert!(adapter.scheduler().pending().await.unwrap().is_empty());
        assert_eq!(adapter.scheduler().stats().superseded, 1);
    }

    struct RejectingStore;

    impl TagStore for RejectingStore {
        fn apply(&self, _mutation: &TagMutation) -> StoreResult<()> {
            Err(StoreError::Unavailable {
                message: "push backend offline".into(),
            })
        }

        fn tags(&self) -> StoreResult<BTreeSet<String>> {
            Ok(BTreeSet::new())
        }
    }

    #[tokio::test]
    async fn test_store_failure_surfaces_and_skips_scheduling() {
        let adapter = TagAdapter::from_config(&ExpiryConfig::default(), Arc::new(RejectingStore));
        let result = adapter.handle(&fence_in("Z1", "F2", GeometryKind::LineString, false));

        tokio_test::assert_err!(&result);
        assert!(matches!(result, Err(FencetagError::TagStoreUnavailable(_))));
        assert_eq!(adapter.scheduler().stats().scheduled, 0);
    }

    /// Fails only the `fail_on`-th apply (1-based).
    struct FlakyStore {
        inner: InMemoryTagStore,
        calls: AtomicUsize,
        fail_on: usize,
    }

    impl TagStore for FlakyStore {
        fn apply(&self, mutation: &TagMutation) -> StoreResult<()> {
            if self.calls.fetch_add(1, Ordering::SeqCst) + 1 == self.fail_on {
                return Err(StoreError::Unavailable {
                    message: "blip".into(),
                });
            }
            self.inner.apply(mutation)
        }

        fn tags(&self) -> StoreResult<BTreeSet<String>> {
            self.inner.tags()
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_reentry_keeps_earlier_removal_pending() {
        let store = Arc::new(FlakyStore {
            inner: InMemoryTagStore::new(),
            calls: AtomicUsize::new(0),
            fail_on: 2,
        });
        let adapter = TagAdapter::from_config(&ExpiryConfig::default(), store.clone());
        let event = fence_in("Z1", "F2", GeometryKind::LineString, true);

        adapter.handle(&event).unwrap();
        tokio::time::sleep(Duration::from_secs(1)).await;

        let result = adapter.handle(&event);
        assert!(matches!(result, Err(FencetagError::TagStoreUnavailable(_))));
        assert_eq!(adapter.scheduler().pending().await.unwrap().len(), 1);

        tokio::time::sleep(Duration::from_secs(60)).await;
        assert!(store.tags().unwrap().is_empty());
        let stats = adapter.scheduler().stats();
        assert_eq!(stats.fired, 1);
        assert_eq!(stats.superseded, 0);
    }

    #[tokio::test]
    async fn test_failed_checkout_leaves_expiry_in_place() {
        let store = Arc::new(FlakyStore {
            inner: InMemoryTagStore::new(),
            calls: AtomicUsize::new(0),
            fail_on: 2,
        });
        let adapter = TagAdapter::from_config(&ExpiryConfig::default(), store.clone());
        adapter
            .handle(&fence_in("Z1", "F2", GeometryKind::LineString, true))
            .unwrap();

        let result = adapter.handle(&FenceEvent::fence_check_out(
            &FenceInfo::new("F2", GeometryKind::LineString),
            &ZoneInfo::named("Z1"),
            1,
        ));

        tokio_test::assert_err!(result);
        let pending = adapter.scheduler().pending().await.unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].tags, set(&["zone_Z1", "fence_F2"]));
    }

    #[derive(Default)]
    struct RecordingDelegate {
        calls: Mutex<Vec<String>>,
    }

    impl RecordingDelegate {
        fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }
    }

    impl AdapterDelegate for RecordingDelegate {
        fn on_tags_applied(&self, event: &FenceEvent, tags: &BTreeSet<String>) {
            let tags: Vec<&str> = tags.iter().map(String::as_str).collect();
            self.calls
                .lock()
                .unwrap()
                .push(format!("{} {}", event.kind_label(), tags.join(",")));
        }

        fn on_authenticated(&self) {
            self.calls.lock().unwrap().push("authenticated".into());
        }

        fn on_logged_out(&self) {
            self.calls.lock().unwrap().push("logged_out".into());
        }
    }

    #[tokio::test]
    async fn test_delegate_hears_session_and_tag_changes() {
        let service = Arc::new(InProcessLocationService::new());
        let delegate = Arc::new(RecordingDelegate::default());
        let (_store, adapter) = build_adapter(ExpiryPolicy::CancelOnReentry);
        let adapter = adapter.with_delegate(delegate.clone());
        let bridge = LocationBridge::new(service.clone(), Arc::new(adapter));

        bridge.start(&credentials()).unwrap();
        service
            .notify(&LocationNotification::BeaconCheckIn {
                beacon: BeaconInfo::named("B1"),
                zone: ZoneInfo::named("Z2"),
                location: LocationInfo::default(),
                proximity: Proximity::Near,
                custom_data: CustomData::new(),
                will_check_out: true,
            })
            .unwrap();
        service
            .notify(&LocationNotification::BeaconCheckOut {
                beacon: BeaconInfo::named("B1"),
                zone: ZoneInfo::named("Z2"),
                dwell_minutes: 3,
                custom_data: CustomData::new(),
            })
            .unwrap();
        bridge.stop();

        assert_eq!(
            delegate.calls(),
            vec![
                "authenticated",
                "beacon_check_in beacon_B1,zone_Z2",
                "beacon_check_out beacon_B1,zone_Z2",
                "logged_out",
            ]
        );
    }

    #[tokio::test]
    async fn test_delegate_not_told_about_rejected_mutation() {
        let delegate = Arc::new(RecordingDelegate::default());
        let adapter = TagAdapter::from_config(&ExpiryConfig::default(), Arc::new(RejectingStore))
            .with_delegate(delegate.clone());

        tokio_test::assert_err!(adapter.handle(&fence_in("Z1", "F1", GeometryKind::Polygon, true)));
        assert!(delegate.calls().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_bridge_subscribes_on_start_and_unsubscribes_on_stop() {
        let service = Arc::new(InProcessLocationService::new());
        let (store, adapter) = build_adapter(ExpiryPolicy::CancelOnReentry);
        let bridge = LocationBridge::new(service.clone(), Arc::new(adapter));

        assert!(!bridge.is_service_running());
        bridge.start(&credentials()).unwrap();
        assert!(bridge.is_service_running());
        assert_eq!(service.subscriber_count(), 1);

        // Starting again is a no-op.
        bridge.start(&credentials()).unwrap();
        assert_eq!(service.subscriber_count(), 1);

        let delivered = service
            .notify(&LocationNotification::FenceCheckIn {
                fence: FenceInfo::new("F1", GeometryKind::Polygon),
                zone: ZoneInfo::named("Z1"),
                location: LocationInfo::default(),
                custom_data: CustomData::new(),
                will_check_out: true,
            })
            .unwrap();
        assert_eq!(delivered, 1);
        assert_eq!(store.tags().unwrap(), set(&["zone_Z1", "fence_F1"]));

        bridge.stop();
        assert!(!bridge.is_service_running());
        assert_eq!(service.subscriber_count(), 0);
    }

    #[tokio::test]
    async fn test_bridge_rejects_bad_credentials() {
        let service = Arc::new(InProcessLocationService::new());
        let (_store, adapter) = build_adapter(ExpiryPolicy::CancelOnReentry);
        let bridge = LocationBridge::new(service.clone(), Arc::new(adapter));

        let mut bad = credentials();
        bad.user_name.clear();
        let result = bridge.start(&bad);

        assert!(matches!(
            result,
            Err(FencetagError::LocationAuthenticationFailed(_))
        ));
        assert!(!bridge.is_service_running());
        assert_eq!(service.subscriber_count(), 0);
    }

    #[tokio::test]
    async fn test_fatal_error_unsubscribes_adapter() {
        let service = Arc::new(InProcessLocationService::new());
        let (_store, adapter) = build_adapter(ExpiryPolicy::CancelOnReentry);
        let bridge = LocationBridge::new(service.clone(), Arc::new(adapter));
        bridge.start(&credentials()).unwrap();

        service.report_error(&LocationError::RuleDownload {
            reason: "timeout".into(),
        });
        assert_eq!(service.subscriber_count(), 1);

        service.report_error(&LocationError::Authentication {
            reason: "key revoked".into(),
        });
        assert!(!bridge.is_service_running());
        assert_eq!(service.subscriber_count(), 0);
    }
}
