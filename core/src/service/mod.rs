//! Service lifecycle.
//!
//! Composes the capture driver (OS threads), the engine task (consumes
//! the record channel), the idle-timeout tick, and the settings watch.
//! The engine lives behind one tokio mutex; every critical section
//! (attacker-table updates, timer checks, history mutation) serializes
//! on it.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use chrono::Local;
use sonar_types::MeterSettings;
use tokio::sync::{Mutex, broadcast, mpsc, watch};
use tokio::task::JoinHandle;
use tracing::info;

use crate::capture::{CaptureDriver, CaptureError};
use crate::events::{EventBus, GameSignal};
use crate::session::{EncounterSummary, PlayerCache};
use crate::signal_processor::EventProcessor;

/// Idle-timeout check cadence.
const TICK_INTERVAL: Duration = Duration::from_millis(250);

pub struct CaptureService;

impl CaptureService {
    /// Open capture devices and start the pipeline. Fails only when no
    /// device at all can be opened.
    pub fn start(
        settings: MeterSettings,
        players: Arc<PlayerCache>,
    ) -> Result<ServiceHandle, CaptureError> {
        let bus = EventBus::new();
        let shutdown = Arc::new(AtomicBool::new(false));
        let (record_tx, mut record_rx) = mpsc::unbounded_channel();

        let driver = CaptureDriver::start(record_tx, Arc::clone(&shutdown))?;
        info!(devices = driver.device_count, "capture service started");

        let processor = Arc::new(Mutex::new(EventProcessor::new(
            players,
            settings,
            bus.clone(),
        )));
        let (settings_tx, mut settings_rx) = watch::channel(settings);

        let engine_task = tokio::spawn({
            let processor = Arc::clone(&processor);
            async move {
                while let Some(record) = record_rx.recv().await {
                    processor.lock().await.handle_record(&record);
                }
            }
        });

        let tick_task = tokio::spawn({
            let processor = Arc::clone(&processor);
            let shutdown = Arc::clone(&shutdown);
            async move {
                let mut interval = tokio::time::interval(TICK_INTERVAL);
                loop {
                    tokio::select! {
                        _ = interval.tick() => {
                            if shutdown.load(Ordering::Relaxed) {
                                break;
                            }
                            processor.lock().await.tick();
                        }
                        changed = settings_rx.changed() => {
                            if changed.is_err() {
                                break;
                            }
                            let new_settings = *settings_rx.borrow_and_update();
                            processor.lock().await.update_settings(new_settings);
                        }
                    }
                }
            }
        });

        Ok(ServiceHandle {
            processor,
            bus,
            shutdown,
            settings_tx,
            driver: Some(driver),
            engine_task,
            tick_task,
        })
    }
}

/// Handle to the running service: subscriptions, queries, settings,
/// shutdown.
pub struct ServiceHandle {
    processor: Arc<Mutex<EventProcessor>>,
    bus: EventBus,
    shutdown: Arc<AtomicBool>,
    settings_tx: watch::Sender<MeterSettings>,
    driver: Option<CaptureDriver>,
    engine_task: JoinHandle<()>,
    tick_task: JoinHandle<()>,
}

impl ServiceHandle {
    pub fn subscribe(&self) -> broadcast::Receiver<GameSignal> {
        self.bus.subscribe()
    }

    pub async fn current_summary(&self) -> Option<EncounterSummary> {
        self.processor
            .lock()
            .await
            .current_summary_at(Local::now().naive_local())
    }

    pub async fn history_summaries(&self) -> Vec<EncounterSummary> {
        self.processor
            .lock()
            .await
            .history_summaries_at(Local::now().naive_local())
    }

    pub async fn select_encounter(&self, id: Option<u64>) {
        self.processor.lock().await.select_encounter(id);
    }

    /// Push new settings; the engine reacts on its next loop turn.
    pub fn update_settings(&self, settings: MeterSettings) {
        let _ = self.settings_tx.send(settings);
    }

    /// Stop capture threads, drain the engine, and join everything.
    pub async fn shutdown(mut self) {
        info!("shutting down capture service");
        self.shutdown.store(true, Ordering::Relaxed);
        if let Some(driver) = self.driver.take() {
            // Joining pcap threads blocks on their read timeout.
            let _ = tokio::task::spawn_blocking(move || driver.join()).await;
        }
        // Capture threads held the only record senders; the engine task
        // ends once the channel drains.
        let _ = self.engine_task.await;
        let _ = self.tick_task.await;
    }
}
