//! Tauri glue: the overlay window, the tray, the single `gateway` command and
//! the forwarding of bus notifications into the webview.

use crate::agent_client::AgentClient;
use crate::backend::BackendProcess;
use crate::config::{AppConfig, SettingsStore};
use crate::error::{PetError, Result};
use crate::gateway::Gateway;
use crate::interaction::Gesture;
use crate::logging::{self, LogConfig};
use crate::notifications::{SubscriptionId, Topic};
use crate::window::{OverlaySurface, WorkArea};
use serde_json::Value;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tauri::menu::{Menu, MenuItem};
use tauri::tray::{MouseButton, MouseButtonState, TrayIconEvent};
use tauri::{
    AppHandle, Emitter, LogicalPosition, Manager, RunEvent, State, WebviewUrl, WebviewWindow,
    WebviewWindowBuilder, WindowEvent,
};
use tracing::{error, info, warn};

const MAIN_LABEL: &str = "main";
const TRAY_ID: &str = "main";
const FALLBACK_AREA: WorkArea = WorkArea {
    x: 0,
    y: 0,
    width: 1280,
    height: 800,
};

fn window_err(e: tauri::Error) -> PetError {
    PetError::Window(e.to_string())
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// The live webview window behind the overlay.
pub struct TauriSurface {
    window: WebviewWindow,
}

impl OverlaySurface for TauriSurface {
    fn set_position(&self, x: i32, y: i32) -> Result<()> {
        self.window
            .set_position(LogicalPosition::new(f64::from(x), f64::from(y)))
            .map_err(window_err)
    }

    #[cfg(target_os = "macos")]
    fn set_opacity(&self, opacity: f64) -> Result<()> {
        use objc2::msg_send;
        use objc2::runtime::AnyObject;

        let ns_window = self.window.ns_window().map_err(window_err)?.cast::<AnyObject>();
        if ns_window.is_null() {
            return Err(PetError::Window("no native window".to_string()));
        }
        // SAFETY: tauri hands out the NSWindow pointer of a window that is still alive
        unsafe {
            let _: () = msg_send![&*ns_window, setAlphaValue: opacity];
        }
        Ok(())
    }

    #[cfg(not(target_os = "macos"))]
    fn set_opacity(&self, opacity: f64) -> Result<()> {
        // no per-window alpha outside macOS; fade the document instead
        self.window
            .eval(&format!(
                "document.documentElement.style.opacity = '{opacity}'"
            ))
            .map_err(window_err)
    }

    fn minimize(&self) -> Result<()> {
        self.window.minimize().map_err(window_err)
    }

    fn hide(&self) -> Result<()> {
        self.window.hide().map_err(window_err)
    }

    fn show(&self) -> Result<()> {
        self.window.show().map_err(window_err)
    }
}

struct AppState {
    gateway: Arc<Gateway<TauriSurface>>,
    config: AppConfig,
    backend: Mutex<Option<BackendProcess>>,
    forwarders: Mutex<Vec<SubscriptionId>>,
}

impl AppState {
    fn revoke_forwarders(&self) {
        for id in lock(&self.forwarders).drain(..) {
            self.gateway.bus().unsubscribe(id);
        }
    }

    /// Emit every bus topic to the overlay under the topic's name.
    fn attach_forwarders(&self, app: &AppHandle) {
        self.revoke_forwarders();
        let mut ids = lock(&self.forwarders);
        for topic in Topic::ALL {
            let handle = app.clone();
            let id = self.gateway.bus().subscribe(topic, move |payload| {
                if let Err(e) = handle.emit_to(MAIN_LABEL, topic.name(), payload.clone()) {
                    warn!(topic = topic.name(), error = %e, "failed to forward notification");
                }
            });
            ids.push(id);
        }
    }
}

/// The only command the webview can invoke.
#[tauri::command]
async fn gateway(
    operation: String,
    args: Option<Value>,
    state: State<'_, AppState>,
) -> std::result::Result<Value, PetError> {
    state
        .gateway
        .call(&operation, args.unwrap_or(Value::Null))
        .await
}

#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn primary_work_area(app: &AppHandle) -> WorkArea {
    let monitor = match app.primary_monitor() {
        Ok(Some(monitor)) => monitor,
        Ok(None) => {
            warn!("no primary monitor, using fallback work area");
            return FALLBACK_AREA;
        }
        Err(e) => {
            warn!(error = %e, "monitor query failed, using fallback work area");
            return FALLBACK_AREA;
        }
    };
    let scale = monitor.scale_factor();
    let area = monitor.work_area();
    let position = area.position.to_logical::<f64>(scale);
    let size = area.size.to_logical::<f64>(scale);
    WorkArea {
        x: position.x.round() as i32,
        y: position.y.round() as i32,
        width: size.width.round() as u32,
        height: size.height.round() as u32,
    }
}

fn create_main_window(app: &AppHandle) -> Result<()> {
    let state = app.state::<AppState>();
    let area = primary_work_area(app);
    state.gateway.create_overlay(area, |bounds| {
        let window = WebviewWindowBuilder::new(app, MAIN_LABEL, WebviewUrl::App("index.html".into()))
            .title("Desk Pet")
            .inner_size(f64::from(bounds.width), f64::from(bounds.height))
            .position(f64::from(bounds.x), f64::from(bounds.y))
            .decorations(false)
            .transparent(true)
            .shadow(false)
            .always_on_top(true)
            .skip_taskbar(true)
            .resizable(false)
            .build()
            .map_err(window_err)?;
        Ok(TauriSurface { window })
    })?;
    state.attach_forwarders(app);
    Ok(())
}

/// Tray "show" / dock re-activation: bring the overlay back, rebuilding it if
/// the windowing system destroyed it.
fn reveal(app: &AppHandle) {
    let gateway = Arc::clone(&app.state::<AppState>().gateway);
    if gateway.needs_recreate(app.webview_windows().len()) {
        info!("no overlay alive, recreating");
        if let Err(e) = create_main_window(app) {
            error!(error = %e, "failed to recreate overlay");
        }
        return;
    }
    if let Err(e) = gateway.show_window() {
        warn!(error = %e, "failed to show overlay");
    }
}

fn toggle(app: &AppHandle) {
    let gateway = Arc::clone(&app.state::<AppState>().gateway);
    match gateway.window_handle() {
        Ok(handle) if handle.visible => {
            if let Err(e) = gateway.hide_window() {
                warn!(error = %e, "failed to hide overlay");
            }
        }
        _ => reveal(app),
    }
}

fn setup_tray(app: &AppHandle) -> tauri::Result<()> {
    let Some(tray) = app.tray_by_id(TRAY_ID) else {
        warn!("tray icon missing from config");
        return Ok(());
    };
    let show = MenuItem::with_id(app, "show", "Show", true, None::<&str>)?;
    let quit = MenuItem::with_id(app, "quit", "Quit", true, None::<&str>)?;
    tray.set_menu(Some(Menu::with_items(app, &[&show, &quit])?))?;
    tray.set_show_menu_on_left_click(false)?;
    tray.on_menu_event(|app, event| match event.id.as_ref() {
        "show" => reveal(app),
        "quit" => app.exit(0),
        _ => {}
    });
    tray.on_tray_icon_event(|tray, event| {
        if let TrayIconEvent::Click {
            button: MouseButton::Left,
            button_state: MouseButtonState::Up,
            ..
        } = event
        {
            toggle(tray.app_handle());
        }
    });
    Ok(())
}

fn on_window_event(window: &tauri::Window, event: &WindowEvent) {
    if window.label() != MAIN_LABEL {
        return;
    }
    let state = window.state::<AppState>();
    match event {
        WindowEvent::CloseRequested { api, .. } => {
            api.prevent_close();
            state.gateway.intercept_close();
        }
        WindowEvent::Focused(false) => {
            let gateway = Arc::clone(&state.gateway);
            // gestures may arm timers, which need the async runtime
            tauri::async_runtime::spawn(async move {
                gateway.gesture(Gesture::FocusLost);
            });
        }
        WindowEvent::Destroyed => {
            state.gateway.overlay_destroyed();
            state.revoke_forwarders();
        }
        _ => {}
    }
}

/// Start the backend, load the pet and arm the greeting loop.
fn start_services(app: &AppHandle) {
    let handle = app.clone();
    tauri::async_runtime::spawn(async move {
        let state = handle.state::<AppState>();
        if let Some(command) = &state.config.backend_command {
            match BackendProcess::spawn(command) {
                Ok(process) => *lock(&state.backend) = Some(process),
                Err(e) => error!(program = %command.program, error = %e, "failed to start backend"),
            }
        }
        state.gateway.load_pet().await;
        state.gateway.start_greetings();
    });
}

fn stop_backend(app: &AppHandle) {
    let process = lock(&app.state::<AppState>().backend).take();
    if let Some(process) = process {
        let status = tauri::async_runtime::block_on(process.stop());
        info!(?status, "backend shut down");
    }
}

pub fn run() -> anyhow::Result<()> {
    if dotenvy::dotenv().is_err() {
        let _ = dotenvy::from_filename("../.env");
    }
    logging::init(&LogConfig::from_env());

    let config = AppConfig::from_env();
    info!(backend = %config.backend_url, settings = %config.settings_path.display(), "starting desk pet");

    let settings = SettingsStore::load(config.settings_path.clone());
    let gateway = Arc::new(Gateway::new(AgentClient::new(&config.backend_url), settings));

    let app = tauri::Builder::default()
        .manage(AppState {
            gateway,
            config,
            backend: Mutex::new(None),
            forwarders: Mutex::new(Vec::new()),
        })
        .setup(|app| {
            // no dock icon, the tray is the app's only chrome
            #[cfg(target_os = "macos")]
            app.set_activation_policy(tauri::ActivationPolicy::Accessory);

            let handle = app.handle();
            create_main_window(handle)?;
            setup_tray(handle)?;
            start_services(handle);
            Ok(())
        })
        .on_window_event(on_window_event)
        .invoke_handler(tauri::generate_handler![gateway])
        .build(tauri::generate_context!())?;

    app.run(|handle, event| match event {
        #[cfg(target_os = "macos")]
        RunEvent::Reopen { .. } => reveal(handle),
        RunEvent::Exit => stop_backend(handle),
        _ => {}
    });
    Ok(())
}
