//! Background tasks: periodic auto-sync and the network watcher.
//!
//! Both tasks run until their [`CancellationToken`] fires and never
//! propagate errors; failures are logged and the next tick tries again.

use crate::orchestrator::SyncOrchestrator;
use bridge_traits::network::{NetworkMonitor, NetworkStatus};
use core_routes::RouteStateManager;
use core_runtime::events::{ConnectivityEvent, CoreEvent, EventBus};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Last known host network signal, shared between the watcher and readers.
#[derive(Debug)]
pub struct NetworkState {
    online: AtomicBool,
}

impl NetworkState {
    pub fn new(online: bool) -> Self {
        Self {
            online: AtomicBool::new(online),
        }
    }

    pub fn is_online(&self) -> bool {
        self.online.load(Ordering::SeqCst)
    }

    /// Returns `true` when the value changed.
    pub fn set_online(&self, online: bool) -> bool {
        self.online.swap(online, Ordering::SeqCst) != online
    }
}

impl Default for NetworkState {
    fn default() -> Self {
        Self::new(true)
    }
}

/// Whether an auto-sync tick should run a cycle right now.
fn should_auto_sync(orchestrator: &SyncOrchestrator, network: &NetworkState) -> bool {
    let manager = orchestrator.manager();
    orchestrator.client().is_configured()
        && network.is_online()
        && !manager.is_offline_mode()
        && manager.has_pending_changes()
}

/// Push pending changes every `interval` while the remote is reachable.
///
/// A tick is skipped when no endpoint is configured, the network is down,
/// offline mode is on, or nothing is pending.
pub fn spawn_auto_sync(
    orchestrator: Arc<SyncOrchestrator>,
    network: Arc<NetworkState>,
    interval: Duration,
    cancel: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + interval, interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    debug!("Auto-sync stopped");
                    break;
                }
                _ = ticker.tick() => {
                    if !should_auto_sync(&orchestrator, &network) {
                        continue;
                    }
                    let pending = orchestrator.manager().pending_count();
                    info!(pending, "Running auto-sync");
                    match orchestrator.sync_pending().await {
                        Ok(report) => debug!(
                            succeeded = report.success_count,
                            failed = report.failure_count,
                            "Auto-sync finished"
                        ),
                        Err(e) => warn!(error = %e, "Auto-sync failed"),
                    }
                }
            }
        }
    })
}

/// Follow host network transitions: losing the network turns offline mode
/// on, getting it back turns it off. Indeterminate readings are ignored.
pub fn spawn_network_watcher(
    monitor: Arc<dyn NetworkMonitor>,
    manager: Arc<RouteStateManager>,
    network: Arc<NetworkState>,
    events: EventBus,
    cancel: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut changes = match monitor.subscribe_changes().await {
            Ok(changes) => changes,
            Err(e) => {
                warn!(error = %e, "Network monitor unavailable, watcher not started");
                return;
            }
        };

        loop {
            let info = tokio::select! {
                _ = cancel.cancelled() => break,
                info = changes.next() => match info {
                    Some(info) => info,
                    None => {
                        debug!("Network change stream closed");
                        break;
                    }
                },
            };

            let online = match info.status {
                NetworkStatus::Connected => true,
                NetworkStatus::Disconnected => false,
                NetworkStatus::Indeterminate => continue,
            };

            if network.set_online(online) || manager.is_offline_mode() == online {
                info!(online, "Network status changed");
                manager.set_offline_mode(!online).await;
                let _ = events.emit(CoreEvent::Connectivity(ConnectivityEvent::NetworkChanged {
                    online,
                }));
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use bridge_traits::error::Result as BridgeResult;
    use bridge_traits::network::{NetworkChangeStream, NetworkInfo};
    use crate::client::SheetClient;
    use bridge_traits::error::BridgeError;
    use bridge_traits::http::{HttpClient, HttpRequest, HttpResponse};
    use bridge_traits::time::SystemClock;
    use bytes::Bytes;
    use core_routes::{RoutePatch, RouteStatus};
    use core_runtime::config::SyncSettings;
    use std::collections::HashMap;
    use std::sync::atomic::AtomicUsize;
    use tokio::sync::mpsc;

    /// Counts writes; refuses the connection while `failing` is set.
    #[derive(Default)]
    struct CountingSheet {
        calls: AtomicUsize,
        failing: AtomicBool,
    }

    #[async_trait]
    impl HttpClient for CountingSheet {
        async fn execute(&self, _request: HttpRequest) -> BridgeResult<HttpResponse> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.failing.load(Ordering::SeqCst) {
                return Err(BridgeError::Connection("refused".into()));
            }
            Ok(HttpResponse {
                status: 200,
                headers: HashMap::from([("content-type".into(), "application/json".into())]),
                body: Bytes::from(r#"{"success":true}"#),
            })
        }
    }

    const INTERVAL: Duration = Duration::from_secs(30);

    fn auto_sync_fixture(
        endpoint: Option<&str>,
    ) -> (Arc<SyncOrchestrator>, Arc<RouteStateManager>, Arc<CountingSheet>) {
        let sheet = Arc::new(CountingSheet::default());
        let manager = Arc::new(RouteStateManager::in_memory(
            Arc::new(SystemClock),
            Duration::from_secs(86_400),
        ));
        let settings = SyncSettings {
            auto_sync_interval: INTERVAL,
            item_delay: Duration::ZERO,
            batch_delay: Duration::ZERO,
            ..SyncSettings::default()
        };
        let client = SheetClient::new(sheet.clone(), endpoint.map(str::to_string), &settings)
            .with_status_sink(manager.clone());
        let orchestrator = Arc::new(SyncOrchestrator::new(
            Arc::new(client),
            manager.clone(),
            EventBus::default(),
            settings,
            Arc::new(SystemClock),
        ));
        (orchestrator, manager, sheet)
    }

    struct ChannelMonitor {
        receiver: std::sync::Mutex<Option<mpsc::UnboundedReceiver<NetworkInfo>>>,
    }

    struct ChannelStream(mpsc::UnboundedReceiver<NetworkInfo>);

    #[async_trait]
    impl NetworkChangeStream for ChannelStream {
        async fn next(&mut self) -> Option<NetworkInfo> {
            self.0.recv().await
        }
    }

    #[async_trait]
    impl NetworkMonitor for ChannelMonitor {
        async fn get_network_info(&self) -> BridgeResult<NetworkInfo> {
            Ok(NetworkInfo::connected())
        }

        async fn subscribe_changes(&self) -> BridgeResult<Box<dyn NetworkChangeStream>> {
            let receiver = self.receiver.lock().unwrap().take().unwrap();
            Ok(Box::new(ChannelStream(receiver)))
        }
    }

    #[test]
    fn test_network_state_reports_changes() {
        let state = NetworkState::default();
        assert!(state.is_online());
        assert!(!state.set_online(true));
        assert!(state.set_online(false));
        assert!(!state.is_online());
    }

    #[tokio::test]
    async fn test_watcher_toggles_offline_mode() {
        let (sender, receiver) = mpsc::unbounded_channel();
        let monitor = Arc::new(ChannelMonitor {
            receiver: std::sync::Mutex::new(Some(receiver)),
        });
        let manager = Arc::new(RouteStateManager::in_memory(
            Arc::new(SystemClock),
            Duration::from_secs(86_400),
        ));
        let network = Arc::new(NetworkState::default());
        let events = EventBus::default();
        let mut rx = events.subscribe();
        let cancel = CancellationToken::new();

        let handle = spawn_network_watcher(
            monitor,
            manager.clone(),
            network.clone(),
            events.clone(),
            cancel.clone(),
        );

        sender.send(NetworkInfo::disconnected()).unwrap();
        assert_eq!(
            rx.recv().await.unwrap(),
            CoreEvent::Connectivity(ConnectivityEvent::NetworkChanged { online: false })
        );
        assert!(manager.is_offline_mode());
        assert!(!network.is_online());

        sender.send(NetworkInfo::connected()).unwrap();
        assert_eq!(
            rx.recv().await.unwrap(),
            CoreEvent::Connectivity(ConnectivityEvent::NetworkChanged { online: true })
        );
        assert!(!manager.is_offline_mode());

        cancel.cancel();
        handle.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_auto_sync_runs_only_when_every_condition_holds() {
        let (orchestrator, manager, sheet) = auto_sync_fixture(Some("https://script.example.com/exec"));
        let network = Arc::new(NetworkState::default());
        let cancel = CancellationToken::new();
        let handle = spawn_auto_sync(orchestrator, network.clone(), INTERVAL, cancel.clone());

        // empty queue
        tokio::time::sleep(INTERVAL + Duration::from_secs(1)).await;
        assert_eq!(sheet.calls.load(Ordering::SeqCst), 0);

        manager
            .update_route(1, RoutePatch::status(RouteStatus::Active))
            .await;
        network.set_online(false);
        tokio::time::sleep(INTERVAL).await;
        assert_eq!(sheet.calls.load(Ordering::SeqCst), 0);

        network.set_online(true);
        manager.set_offline_mode(true).await;
        tokio::time::sleep(INTERVAL).await;
        assert_eq!(sheet.calls.load(Ordering::SeqCst), 0);
        assert_eq!(manager.pending_count(), 1);

        manager.set_offline_mode(false).await;
        tokio::time::sleep(INTERVAL).await;
        assert_eq!(sheet.calls.load(Ordering::SeqCst), 1);
        assert!(!manager.has_pending_changes());

        cancel.cancel();
        handle.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_auto_sync_skips_without_endpoint() {
        let (orchestrator, manager, sheet) = auto_sync_fixture(None);
        manager
            .update_route(2, RoutePatch::status(RouteStatus::Completed))
            .await;
        let cancel = CancellationToken::new();
        let handle = spawn_auto_sync(
            orchestrator,
            Arc::new(NetworkState::default()),
            INTERVAL,
            cancel.clone(),
        );

        tokio::time::sleep(INTERVAL * 3).await;

        assert_eq!(sheet.calls.load(Ordering::SeqCst), 0);
        assert_eq!(manager.pending_count(), 1);
        cancel.cancel();
        handle.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_auto_sync_keeps_task_alive() {
        let (orchestrator, manager, sheet) = auto_sync_fixture(Some("https://script.example.com/exec"));
        sheet.failing.store(true, Ordering::SeqCst);
        manager
            .update_route(3, RoutePatch::status(RouteStatus::Delayed))
            .await;
        let cancel = CancellationToken::new();
        let handle = spawn_auto_sync(
            orchestrator,
            Arc::new(NetworkState::default()),
            INTERVAL,
            cancel.clone(),
        );

        // first tick: both attempts refused
        tokio::time::sleep(INTERVAL + Duration::from_secs(10)).await;
        assert_eq!(sheet.calls.load(Ordering::SeqCst), 2);
        assert_eq!(manager.pending_count(), 1);
        assert!(!handle.is_finished());

        sheet.failing.store(false, Ordering::SeqCst);
        tokio::time::sleep(INTERVAL).await;
        assert_eq!(sheet.calls.load(Ordering::SeqCst), 3);
        assert!(!manager.has_pending_changes());

        cancel.cancel();
        handle.await.unwrap();
    }
}
