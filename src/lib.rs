pub mod api;
pub mod backend;
pub mod config;
pub mod console;
pub mod controller;
pub mod error;
pub mod logging;
pub mod models;
pub mod render;
pub mod scheduler;
pub mod state;
pub mod storage;

#[cfg(all(feature = "app", not(test)))]
use std::sync::Arc;
#[cfg(all(feature = "app", not(test)))]
use std::time::Duration;

#[cfg(all(feature = "app", not(test)))]
use crate::api::HttpBackend;
#[cfg(all(feature = "app", not(test)))]
use crate::backend::{Backend, LocalBackend};
#[cfg(all(feature = "app", not(test)))]
use crate::config::AppConfig;
#[cfg(all(feature = "app", not(test)))]
use crate::console::ConsoleUi;
#[cfg(all(feature = "app", not(test)))]
use crate::controller::Controller;
#[cfg(all(feature = "app", not(test)))]
use crate::models::BackendKind;
#[cfg(all(feature = "app", not(test)))]
use crate::render::RenderContext;
#[cfg(all(feature = "app", not(test)))]
use crate::state::TaskStore;

#[cfg(all(feature = "app", not(test)))]
const DAY_WATCH_PERIOD: Duration = Duration::from_secs(60);

#[cfg(all(feature = "app", not(test)))]
pub fn run() -> Result<(), Box<dyn std::error::Error>> {
    let config = AppConfig::load()?;
    if let Err(err) = logging::init_logging(&config.data_dir) {
        eprintln!("failed to initialize logging: {err}");
    }
    log::info!(
        "starting data_dir={} backend={:?} locale={:?}",
        config.data_dir.display(),
        config.settings.backend,
        config.locale
    );

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;
    runtime.block_on(serve(config))
}

#[cfg(all(feature = "app", not(test)))]
async fn serve(config: AppConfig) -> Result<(), Box<dyn std::error::Error>> {
    let backend: Arc<dyn Backend> = match config.settings.backend {
        BackendKind::Local => Arc::new(LocalBackend::new(config.data_dir.clone())?),
        BackendKind::Remote => Arc::new(HttpBackend::new(
            &config.settings.api_base_url,
            config.request_timeout(),
        )?),
    };
    let store = TaskStore::new(backend);
    let ui = Arc::new(ConsoleUi::new(RenderContext::new(config.locale)));
    let controller = Controller::new(store, ui.clone(), config.notice_ttl());

    let watch_ui = ui.clone();
    let day_watch = scheduler::start_day_watch(DAY_WATCH_PERIOD, move |today| {
        let ctx = RenderContext {
            today,
            ..watch_ui.panel().context()
        };
        watch_ui.panel().set_context(ctx);
    });

    // A failed load is already on screen; the list starts empty.
    controller.initialize().await;
    console::run_loop(&controller).await?;

    day_watch.abort();
    Ok(())
}
