mod actions;
mod core;
mod logging;
mod scroll;
mod state;
mod updates;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};
use std::thread;

use flume::{Receiver, Sender};
use hearth_memory_store::MemoryStore;
use hearth_store_traits::DocumentStore;

pub use actions::AppAction;
pub use crate::core::assistant::{AssistantBackend, HttpAssistant};
pub use scroll::*;
pub use state::*;
pub use updates::*;

/// Return the default `hearth_config.json` payload used when no config file exists.
#[uniffi::export]
pub fn default_config_json() -> String {
    core::default_app_config_json()
}

uniffi::setup_scaffolding!();

#[uniffi::export(callback_interface)]
pub trait AppReconciler: Send + Sync + 'static {
    fn reconcile(&self, update: AppUpdate);
}

#[derive(uniffi::Object)]
pub struct FfiApp {
    core_tx: Sender<CoreMsg>,
    update_rx: Receiver<AppUpdate>,
    listening: AtomicBool,
    shared_state: Arc<RwLock<AppState>>,
    near_bottom_threshold_px: f64,
}

#[uniffi::export]
impl FfiApp {
    /// App backed by the in-process store.
    #[uniffi::constructor]
    pub fn new(data_dir: String) -> Arc<Self> {
        Self::with_backends(data_dir, Arc::new(MemoryStore::default()), None)
    }

    pub fn state(&self) -> AppState {
        match self.shared_state.read() {
            Ok(g) => g.clone(),
            Err(poison) => poison.into_inner().clone(),
        }
    }

    pub fn dispatch(&self, action: AppAction) {
        // Contract: never block caller.
        let _ = self.core_tx.send(CoreMsg::Action(action));
    }

    pub fn listen_for_updates(&self, reconciler: Box<dyn AppReconciler>) {
        if self
            .listening
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            // Avoid multiple listeners that would split messages.
            return;
        }

        let rx = self.update_rx.clone();
        thread::spawn(move || {
            while let Ok(update) = rx.recv() {
                reconciler.reconcile(update);
            }
        });
    }

    /// Distance from the bottom within which new messages keep the view pinned.
    pub fn near_bottom_threshold_px(&self) -> f64 {
        self.near_bottom_threshold_px
    }
}

impl FfiApp {
    /// App over an explicit store and, optionally, an assistant backend.
    ///
    /// Without an assistant the one named by `assistant_url` in the config is
    /// used, if any.
    pub fn with_backends(
        data_dir: String,
        store: Arc<dyn DocumentStore>,
        assistant: Option<Arc<dyn AssistantBackend>>,
    ) -> Arc<Self> {
        let config = core::load_app_config(&data_dir);
        logging::init_logging(&data_dir, config.log_filter.as_deref());
        tracing::info!(data_dir = %data_dir, "FfiApp::new() starting");

        let (update_tx, update_rx) = flume::unbounded();
        let (core_tx, core_rx) = flume::unbounded::<CoreMsg>();
        let shared_state = Arc::new(RwLock::new(AppState::empty()));

        // Actor loop thread (single threaded "app actor").
        let core_tx_for_core = core_tx.clone();
        let shared_for_core = shared_state.clone();
        thread::spawn(move || {
            let mut core = match crate::core::AppCore::new(
                update_tx,
                core_tx_for_core,
                data_dir,
                shared_for_core,
                store,
                assistant,
            ) {
                Ok(core) => core,
                Err(e) => {
                    tracing::error!(%e, "app core failed to start");
                    return;
                }
            };
            while let Ok(msg) = core_rx.recv() {
                core.handle_message(msg);
            }
        });

        Arc::new(Self {
            core_tx,
            update_rx,
            listening: AtomicBool::new(false),
            shared_state,
            near_bottom_threshold_px: config.near_bottom_threshold_px(),
        })
    }
}
