//! The single privileged channel between the presentation layer and the
//! window, the backend and the settings.
//!
//! The presentation side can only name one of the operations in
//! [`Operation::ALL`] and pass a positional argument tuple; everything else is
//! rejected before any capability is touched.

use crate::agent_client::{AgentClient, ConversationTurn};
use crate::config::{Settings, SettingsAck, SettingsStore};
use crate::error::{PetError, Result};
use crate::greeting;
use crate::interaction::{Effect, Gesture, Interaction, Mode, Point, COMPOSE_BLUR_DELAY};
use crate::notifications::{NotificationBus, Payload, Topic};
use crate::pet::{PetRecord, PetState, PetType, PetView, MESSAGE_TTL};
use crate::timers::{TimerKey, Timers};
use crate::window::{Bounds, OverlaySurface, WindowController, WindowHandle, WorkArea};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::str::FromStr;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    GetWindowInfo,
    SetWindowPosition,
    SetWindowOpacity,
    MinimizeWindow,
    HideWindow,
    ShowWindow,
    GetPetInfo,
    SendMessage,
    GetConversationHistory,
    ChangePetType,
    GetSettings,
    UpdateSettings,
    ResetSettings,
    Gesture,
}

impl Operation {
    pub const ALL: [Operation; 14] = [
        Operation::GetWindowInfo,
        Operation::SetWindowPosition,
        Operation::SetWindowOpacity,
        Operation::MinimizeWindow,
        Operation::HideWindow,
        Operation::ShowWindow,
        Operation::GetPetInfo,
        Operation::SendMessage,
        Operation::GetConversationHistory,
        Operation::ChangePetType,
        Operation::GetSettings,
        Operation::UpdateSettings,
        Operation::ResetSettings,
        Operation::Gesture,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Self::GetWindowInfo => "get-window-info",
            Self::SetWindowPosition => "set-window-position",
            Self::SetWindowOpacity => "set-window-opacity",
            Self::MinimizeWindow => "minimize-window",
            Self::HideWindow => "hide-window",
            Self::ShowWindow => "show-window",
            Self::GetPetInfo => "get-pet-info",
            Self::SendMessage => "send-message",
            Self::GetConversationHistory => "get-conversation-history",
            Self::ChangePetType => "change-pet-type",
            Self::GetSettings => "get-settings",
            Self::UpdateSettings => "update-settings",
            Self::ResetSettings => "reset-settings",
            Self::Gesture => "gesture",
        }
    }
}

impl FromStr for Operation {
    type Err = PetError;

    fn from_str(s: &str) -> Result<Self> {
        Self::ALL
            .iter()
            .copied()
            .find(|op| op.name() == s)
            .ok_or_else(|| PetError::UnknownOperation(s.to_string()))
    }
}

/// Positional arguments of one call.
struct Args(Vec<Value>);

impl Args {
    fn from_value(value: Value) -> Self {
        match value {
            Value::Null => Self(Vec::new()),
            Value::Array(items) => Self(items),
            single => Self(vec![single]),
        }
    }

    fn get<T: DeserializeOwned>(&self, index: usize, name: &str) -> Result<T> {
        let value = self
            .0
            .get(index)
            .cloned()
            .ok_or_else(|| PetError::InvalidArgument(format!("missing argument '{name}'")))?;
        serde_json::from_value(value)
            .map_err(|e| PetError::InvalidArgument(format!("argument '{name}': {e}")))
    }

    #[allow(clippy::cast_possible_truncation)]
    fn coordinate(&self, index: usize, name: &str) -> Result<i32> {
        let raw: f64 = self.get(index, name)?;
        if !raw.is_finite() || raw.abs() > f64::from(i32::MAX) {
            return Err(PetError::InvalidArgument(format!("argument '{name}' out of range")));
        }
        Ok(raw.round() as i32)
    }
}

/// What the presentation layer renders after a gesture.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ViewState {
    pub mode: Mode,
    pub compose_buffer: String,
    pub pet: PetView,
    pub settings: Settings,
}

// lock order: interaction -> window -> settings -> pet
fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

// follows tokio's clock so paused-time tests see expiry move
fn now() -> Instant {
    tokio::time::Instant::now().into_std()
}

pub struct Gateway<S> {
    window: Mutex<WindowController<S>>,
    agent: AgentClient,
    settings: Mutex<SettingsStore>,
    pet: Mutex<PetState>,
    interaction: Mutex<Interaction>,
    bus: NotificationBus,
    timers: Timers,
}

impl<S: OverlaySurface + 'static> Gateway<S> {
    pub fn new(agent: AgentClient, settings: SettingsStore) -> Self {
        let interaction = Interaction::new(settings.get().clone());
        Self {
            window: Mutex::new(WindowController::new()),
            agent,
            settings: Mutex::new(settings),
            pet: Mutex::new(PetState::default()),
            interaction: Mutex::new(interaction),
            bus: NotificationBus::new(),
            timers: Timers::new(),
        }
    }

    pub fn bus(&self) -> &NotificationBus {
        &self.bus
    }

    /// Dispatch a named operation coming from the presentation layer.
    pub async fn call(self: &Arc<Self>, operation: &str, args: Value) -> Result<Value> {
        let op = match Operation::from_str(operation) {
            Ok(op) => op,
            Err(e) => {
                warn!(operation, "rejected call to unknown operation");
                return Err(e);
            }
        };
        let result = self.dispatch(op, Args::from_value(args)).await;
        if let Err(e) = &result {
            warn!(operation = op.name(), error = %e, "gateway call failed");
        }
        result
    }

    async fn dispatch(self: &Arc<Self>, op: Operation, args: Args) -> Result<Value> {
        let value = match op {
            Operation::GetWindowInfo => serde_json::to_value(self.window_info()?)?,
            Operation::SetWindowPosition => {
                let x = args.coordinate(0, "x")?;
                let y = args.coordinate(1, "y")?;
                self.set_window_position(x, y)?;
                Value::Null
            }
            Operation::SetWindowOpacity => {
                self.set_window_opacity(args.get(0, "opacity")?)?;
                Value::Null
            }
            Operation::MinimizeWindow => {
                lock(&self.window).minimize()?;
                Value::Null
            }
            Operation::HideWindow => {
                self.hide_window()?;
                Value::Null
            }
            Operation::ShowWindow => {
                self.show_window()?;
                Value::Null
            }
            Operation::GetPetInfo => serde_json::to_value(self.get_pet_info().await)?,
            Operation::SendMessage => {
                let text: String = args.get(0, "message")?;
                serde_json::to_value(self.send_message(&text).await)?
            }
            Operation::GetConversationHistory => {
                serde_json::to_value(self.conversation_history().await)?
            }
            Operation::ChangePetType => {
                let raw: String = args.get(0, "type")?;
                let pet_type = PetType::from_str(&raw)?;
                serde_json::to_value(self.change_pet_type(pet_type).await?)?
            }
            Operation::GetSettings => serde_json::to_value(self.settings())?,
            Operation::UpdateSettings => {
                serde_json::to_value(self.update_settings(args.get(0, "settings")?)?)?
            }
            Operation::ResetSettings => serde_json::to_value(self.reset_settings()?)?,
            Operation::Gesture => serde_json::to_value(self.gesture(args.get(0, "gesture")?))?,
        };
        Ok(value)
    }

    // --- window ---

    /// Build the overlay at its bottom-right home and apply the saved opacity.
    pub fn create_overlay<F>(&self, area: WorkArea, build: F) -> Result<Bounds>
    where
        F: FnOnce(Bounds) -> Result<S>,
    {
        let opacity = lock(&self.settings).get().opacity;
        let mut window = lock(&self.window);
        let bounds = window.create_overlay(area, build)?;
        if let Err(e) = window.set_opacity(opacity) {
            warn!(error = %e, "could not apply saved opacity");
        }
        Ok(bounds)
    }

    pub fn window_info(&self) -> Result<Bounds> {
        lock(&self.window).get_bounds()
    }

    pub fn window_handle(&self) -> Result<WindowHandle> {
        lock(&self.window).handle()
    }

    pub fn set_window_position(&self, x: i32, y: i32) -> Result<()> {
        lock(&self.window).set_position(x, y)
    }

    pub fn set_window_opacity(&self, opacity: f64) -> Result<()> {
        lock(&self.window).set_opacity(opacity)
    }

    pub fn hide_window(&self) -> Result<()> {
        lock(&self.window).hide()
    }

    pub fn show_window(&self) -> Result<()> {
        lock(&self.window).show()
    }

    /// OS close request: hide, never destroy.
    pub fn intercept_close(&self) {
        if let Err(e) = lock(&self.window).intercept_close() {
            warn!(error = %e, "close request on a window that is not ready");
        }
    }

    pub fn overlay_destroyed(&self) {
        lock(&self.window).forget();
    }

    pub fn needs_recreate(&self, live_windows: usize) -> bool {
        lock(&self.window).needs_recreate(live_windows)
    }

    // --- pet ---

    /// Startup fetch; an unreachable backend leaves the default pet in place.
    pub async fn load_pet(&self) -> PetView {
        match self.agent.fetch_pet_info().await {
            Some(record) => {
                info!(name = %record.name, pet_type = %record.pet_type, "pet loaded");
                lock(&self.pet).apply_record(&record);
            }
            None => warn!("backend unreachable, using default pet"),
        }
        self.pet_view()
    }

    pub async fn get_pet_info(&self) -> Option<PetRecord> {
        let record = self.agent.fetch_pet_info().await?;
        lock(&self.pet).apply_record(&record);
        Some(record)
    }

    /// Ask the backend directly; the reply (or fallback) also fills the bubble.
    pub async fn send_message(self: &Arc<Self>, text: &str) -> String {
        let reply = self.agent.send_message(text).await;
        self.display_message(&reply);
        reply
    }

    pub async fn conversation_history(&self) -> Vec<ConversationTurn> {
        let turns = self.agent.fetch_history().await;
        debug!(
            count = turns.len(),
            latest = ?turns.last().and_then(ConversationTurn::parsed_timestamp),
            "conversation history loaded"
        );
        turns
    }

    /// On failure the pet keeps its current type.
    pub async fn change_pet_type(&self, pet_type: PetType) -> Result<PetRecord> {
        let record = self.agent.change_pet_type(pet_type).await?;
        lock(&self.pet).apply_record(&record);
        info!(pet_type = %record.pet_type, "pet type changed");
        Ok(record)
    }

    pub fn pet_view(&self) -> PetView {
        lock(&self.pet).view(now())
    }

    pub fn current_message(&self) -> String {
        lock(&self.pet).message_at(now()).to_string()
    }

    // --- settings ---

    pub fn settings(&self) -> Settings {
        lock(&self.settings).get().clone()
    }

    pub fn update_settings(self: &Arc<Self>, settings: Settings) -> Result<SettingsAck> {
        let ack = lock(&self.settings).update(settings.clone())?;
        self.settings_changed(settings);
        Ok(ack)
    }

    pub fn reset_settings(self: &Arc<Self>) -> Result<SettingsAck> {
        let ack = lock(&self.settings).reset()?;
        self.settings_changed(Settings::default());
        Ok(ack)
    }

    fn settings_changed(self: &Arc<Self>, settings: Settings) {
        let opacity = settings.opacity;
        lock(&self.interaction).set_settings(settings);
        match self.set_window_opacity(opacity) {
            Ok(()) | Err(PetError::NotReady) => {}
            Err(e) => warn!(error = %e, "could not apply opacity"),
        }
        self.start_greetings();
    }

    // --- interaction ---

    pub fn mode(&self) -> Mode {
        lock(&self.interaction).mode()
    }

    pub fn view_state(&self) -> ViewState {
        let interaction = lock(&self.interaction);
        ViewState {
            mode: interaction.mode(),
            compose_buffer: interaction.compose_buffer().to_string(),
            pet: self.pet_view(),
            settings: interaction.settings().clone(),
        }
    }

    /// Feed one gesture through the state machine. Returns immediately; a
    /// message submit resolves in the background.
    pub fn gesture(self: &Arc<Self>, gesture: Gesture) -> ViewState {
        let effects = {
            let mut interaction = lock(&self.interaction);
            let effects = interaction.handle(self.with_window_origin(gesture));
            // window effects run under the session lock so moves keep arrival order
            self.apply_window_effects(&effects);
            effects
        };
        self.apply_effects(effects);
        self.view_state()
    }

    /// A press that arrives without the window origin is anchored to the
    /// overlay's current bounds.
    fn with_window_origin(&self, gesture: Gesture) -> Gesture {
        match gesture {
            Gesture::DragStart {
                pointer,
                window_origin: None,
                region,
            } => Gesture::DragStart {
                pointer,
                window_origin: self.window_info().ok().map(|b| Point::new(b.x, b.y)),
                region,
            },
            other => other,
        }
    }

    fn compose_revert_elapsed(self: &Arc<Self>) {
        let effects = lock(&self.interaction).compose_revert_elapsed();
        self.apply_effects(effects);
    }

    fn reply_received(self: &Arc<Self>, reply: String) {
        let effects = lock(&self.interaction).reply_received(reply);
        self.apply_effects(effects);
    }

    fn apply_window_effects(&self, effects: &[Effect]) {
        for effect in effects {
            match effect {
                Effect::MoveWindow(p) => {
                    if let Err(e) = self.set_window_position(p.x, p.y) {
                        warn!(error = %e, x = p.x, y = p.y, "drag move dropped");
                    }
                }
                Effect::ApplyOpacity(opacity) => {
                    if let Err(e) = self.set_window_opacity(*opacity) {
                        warn!(error = %e, "opacity change dropped");
                    }
                    let mut settings = lock(&self.settings);
                    let mut updated = settings.get().clone();
                    updated.opacity = *opacity;
                    if let Err(e) = settings.update(updated) {
                        warn!(error = %e, "could not save opacity");
                    }
                }
                _ => {}
            }
        }
    }

    fn apply_effects(self: &Arc<Self>, effects: Vec<Effect>) {
        for effect in effects {
            match effect {
                Effect::MoveWindow(_) | Effect::ApplyOpacity(_) => {}
                Effect::SendMessage(text) => {
                    let gateway = Arc::clone(self);
                    tokio::spawn(async move {
                        let reply = gateway.agent.send_message(&text).await;
                        gateway.reply_received(reply);
                    });
                }
                Effect::ShowMessage(text) => self.display_message(&text),
                Effect::ScheduleComposeRevert => {
                    let gateway = Arc::clone(self);
                    self.timers
                        .schedule(TimerKey::ComposeBlur, COMPOSE_BLUR_DELAY, async move {
                            gateway.compose_revert_elapsed();
                        });
                }
                Effect::CancelComposeRevert => {
                    self.timers.cancel(TimerKey::ComposeBlur);
                }
                Effect::ModeChanged(mode) => {
                    self.bus
                        .publish(Topic::PetAnimation, &Payload::Animation(mode.animation()));
                }
            }
        }
    }

    /// Put `text` in the bubble and arm its expiry; any older expiry is superseded.
    fn display_message(self: &Arc<Self>, text: &str) {
        lock(&self.pet).show_message(text, now());
        self.bus
            .publish(Topic::PetMessage, &Payload::Text(text.to_string()));

        if text.trim().is_empty() {
            self.timers.cancel(TimerKey::MessageExpiry);
            return;
        }
        let gateway = Arc::clone(self);
        self.timers
            .schedule(TimerKey::MessageExpiry, MESSAGE_TTL, async move {
                let cleared = lock(&gateway.pet).expire_message(now());
                if cleared {
                    debug!("message bubble expired");
                    gateway
                        .bus
                        .publish(Topic::PetMessage, &Payload::Text(String::new()));
                }
            });
    }

    // --- proactive greetings ---

    /// (Re)start the greeting loop from the current settings.
    pub fn start_greetings(self: &Arc<Self>) {
        let settings = self.settings();
        if !settings.enable_proactive_interaction {
            self.timers.cancel(TimerKey::Greeting);
            return;
        }
        let interval = Duration::from_secs(settings.greeting_interval);
        let weak = Arc::downgrade(self);
        self.timers.schedule(TimerKey::Greeting, interval, async move {
            loop {
                let Some(gateway) = weak.upgrade() else {
                    break;
                };
                gateway.greet();
                drop(gateway);
                tokio::time::sleep(interval).await;
            }
        });
    }

    /// Greet if allowed and the user is not busy with the pet.
    pub fn greet(self: &Arc<Self>) -> bool {
        if !self.settings().enable_proactive_interaction || self.mode() != Mode::Idle {
            return false;
        }
        let personality = lock(&self.pet).personality;
        let line = greeting::pick(personality, &mut rand::thread_rng());
        debug!(line, "proactive greeting");
        self.bus
            .publish(Topic::PetGreeting, &Payload::Text(line.to_string()));
        self.display_message(line);
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::window::testing::{RecordingSurface, SurfaceCall};
    use serde_json::json;

    const AREA: WorkArea = WorkArea {
        x: 0,
        y: 0,
        width: 1920,
        height: 1080,
    };

    fn offline() -> Arc<Gateway<RecordingSurface>> {
        Arc::new(Gateway::new(
            AgentClient::new("http://127.0.0.1:9"),
            SettingsStore::in_memory(),
        ))
    }

    fn with_window(gateway: &Gateway<RecordingSurface>) -> RecordingSurface {
        let surface = RecordingSurface::default();
        let s = surface.clone();
        gateway.create_overlay(AREA, move |_| Ok(s)).unwrap();
        surface
    }

    #[test]
    fn test_operation_names_round_trip() {
        for op in Operation::ALL {
            assert_eq!(Operation::from_str(op.name()).unwrap(), op);
        }
    }

    #[tokio::test]
    async fn test_unknown_operation_is_unreachable() {
        let gateway = offline();
        for name in ["exec", "open-url", "update-pet-info", "GET-WINDOW-INFO", ""] {
            let err = gateway.call(name, Value::Null).await.unwrap_err();
            assert!(matches!(err, PetError::UnknownOperation(_)), "{name}");
        }
    }

    #[tokio::test]
    async fn test_window_ops_not_ready_before_create() {
        let gateway = offline();
        let err = gateway
            .call("set-window-position", json!([10, 20]))
            .await
            .unwrap_err();
        assert!(matches!(err, PetError::NotReady));
        let err = gateway.call("get-window-info", Value::Null).await.unwrap_err();
        assert!(matches!(err, PetError::NotReady));
    }

    #[tokio::test]
    async fn test_create_applies_saved_opacity() {
        let gateway = offline();
        let surface = with_window(&gateway);
        assert_eq!(surface.calls(), vec![SurfaceCall::Opacity(0.9)]);

        let info = gateway.call("get-window-info", Value::Null).await.unwrap();
        assert_eq!(info, json!({ "x": 1570, "y": 530, "width": 300, "height": 500 }));
    }

    #[tokio::test]
    async fn test_page_load_reapplies_saved_opacity() {
        let gateway = offline();
        let mut settings = gateway.settings();
        settings.opacity = 0.4;
        gateway.update_settings(settings).unwrap();
        let surface = with_window(&gateway);

        // what the overlay page does once its document exists
        let saved = gateway.call("get-settings", Value::Null).await.unwrap();
        gateway
            .call("set-window-opacity", json!([saved["opacity"]]))
            .await
            .unwrap();
        assert_eq!(
            surface.calls(),
            vec![SurfaceCall::Opacity(0.4), SurfaceCall::Opacity(0.4)]
        );
    }

    #[tokio::test]
    async fn test_position_args_are_validated() {
        let gateway = offline();
        with_window(&gateway);
        gateway
            .call("set-window-position", json!([12.4, -3]))
            .await
            .unwrap();
        assert_eq!(gateway.window_info().unwrap().x, 12);

        let err = gateway
            .call("set-window-position", json!([1]))
            .await
            .unwrap_err();
        assert!(matches!(err, PetError::InvalidArgument(_)));
        let err = gateway
            .call("set-window-position", json!(["left", 1]))
            .await
            .unwrap_err();
        assert!(matches!(err, PetError::InvalidArgument(_)));
    }

    #[tokio::test]
    async fn test_opacity_out_of_range_rejected() {
        let gateway = offline();
        with_window(&gateway);
        let err = gateway
            .call("set-window-opacity", json!([1.2]))
            .await
            .unwrap_err();
        assert!(matches!(err, PetError::InvalidArgument(_)));
        gateway.call("set-window-opacity", json!([0.3])).await.unwrap();
        assert!((gateway.window_handle().unwrap().opacity - 0.3).abs() < f64::EPSILON);
    }

    #[tokio::test]
    async fn test_close_hides_window() {
        let gateway = offline();
        with_window(&gateway);
        gateway.intercept_close();
        assert!(gateway.window_info().is_ok());
        assert!(!gateway.window_handle().unwrap().visible);
    }

    #[tokio::test]
    async fn test_unreachable_backend_defaults() {
        let gateway = offline();
        assert_eq!(gateway.call("get-pet-info", Value::Null).await.unwrap(), Value::Null);
        assert_eq!(
            gateway.call("get-conversation-history", Value::Null).await.unwrap(),
            json!([])
        );
        let view = gateway.load_pet().await;
        assert_eq!(view.name, "Kitty");
    }

    #[tokio::test]
    async fn test_invalid_pet_type_rejected_locally() {
        let gateway = offline();
        let err = gateway
            .call("change-pet-type", json!(["dragon"]))
            .await
            .unwrap_err();
        assert!(matches!(err, PetError::InvalidArgument(_)));
    }

    #[tokio::test]
    async fn test_settings_round_trip_through_gateway() {
        let gateway = offline();
        let surface = with_window(&gateway);
        let ack = gateway
            .call(
                "update-settings",
                json!([{ "opacity": 0.5, "greetingInterval": 60, "enableProactiveInteraction": false }]),
            )
            .await
            .unwrap();
        assert_eq!(ack, json!({ "success": true }));
        assert!(surface.calls().contains(&SurfaceCall::Opacity(0.5)));
        assert_eq!(gateway.view_state().settings.greeting_interval, 60);

        let err = gateway
            .call(
                "update-settings",
                json!([{ "opacity": 2.0, "greetingInterval": 60, "enableProactiveInteraction": true }]),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, PetError::InvalidArgument(_)));

        gateway.call("reset-settings", Value::Null).await.unwrap();
        assert_eq!(
            gateway.call("get-settings", Value::Null).await.unwrap(),
            json!({ "opacity": 0.9, "greetingInterval": 300, "enableProactiveInteraction": true })
        );
    }

    #[tokio::test]
    async fn test_drag_gestures_move_window() {
        let gateway = offline();
        let surface = with_window(&gateway);
        let origin = gateway.window_info().unwrap();

        gateway.gesture(Gesture::DragStart {
            pointer: Point::new(origin.x + 40, origin.y + 60),
            window_origin: Some(Point::new(origin.x, origin.y)),
            region: crate::interaction::Region::Pet,
        });
        for (x, y) in [(900, 400), (800, 300)] {
            gateway.gesture(Gesture::DragMove {
                pointer: Point::new(x, y),
                seq: None,
            });
        }
        let view = gateway.gesture(Gesture::DragEnd);

        assert_eq!(view.mode, Mode::Idle);
        let bounds = gateway.window_info().unwrap();
        assert_eq!((bounds.x, bounds.y), (760, 240));
        assert!(surface.calls().contains(&SurfaceCall::Position(860, 340)));
    }

    #[tokio::test]
    async fn test_drag_without_window_is_harmless() {
        let gateway = offline();
        gateway.gesture(Gesture::DragStart {
            pointer: Point::new(10, 10),
            window_origin: Some(Point::new(0, 0)),
            region: crate::interaction::Region::Pet,
        });
        let view = gateway.gesture(Gesture::DragMove {
            pointer: Point::new(20, 20),
            seq: None,
        });
        assert_eq!(view.mode, Mode::Dragging);
    }

    #[tokio::test]
    async fn test_drag_start_uses_window_bounds_when_origin_missing() {
        let gateway = offline();
        let surface = with_window(&gateway);
        gateway
            .call(
                "gesture",
                json!([{ "kind": "dragStart", "pointer": { "x": 1600, "y": 600 } }]),
            )
            .await
            .unwrap();
        let view = gateway.gesture(Gesture::DragMove {
            pointer: Point::new(1000, 500),
            seq: Some(1),
        });

        assert_eq!(view.mode, Mode::Dragging);
        assert!(surface.calls().contains(&SurfaceCall::Position(970, 430)));
    }

    #[tokio::test]
    async fn test_drag_start_without_origin_or_window_is_ignored() {
        let gateway = offline();
        gateway.gesture(Gesture::DragStart {
            pointer: Point::new(10, 10),
            window_origin: None,
            region: crate::interaction::Region::Pet,
        });
        let view = gateway.gesture(Gesture::DragMove {
            pointer: Point::new(20, 20),
            seq: None,
        });
        assert_eq!(view.mode, Mode::Idle);
    }

    #[tokio::test]
    async fn test_mode_changes_publish_animation() {
        let gateway = offline();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let s = seen.clone();
        gateway
            .bus()
            .subscribe(Topic::PetAnimation, move |p| s.lock().unwrap().push(p.clone()));

        gateway.gesture(Gesture::RightClick);
        gateway.gesture(Gesture::CloseSettings);

        use crate::notifications::AnimationTag;
        assert_eq!(
            *seen.lock().unwrap(),
            vec![
                Payload::Animation(AnimationTag::Configure),
                Payload::Animation(AnimationTag::Idle)
            ]
        );
    }

    fn messages(gateway: &Gateway<RecordingSurface>) -> Arc<Mutex<Vec<Payload>>> {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let s = seen.clone();
        gateway
            .bus()
            .subscribe(Topic::PetMessage, move |p| s.lock().unwrap().push(p.clone()));
        seen
    }

    fn text(s: &str) -> Payload {
        Payload::Text(s.to_string())
    }

    async fn sleep_ms(ms: u64) {
        tokio::time::sleep(Duration::from_millis(ms)).await;
        tokio::task::yield_now().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_bubble_clears_after_three_seconds() {
        let gateway = offline();
        let seen = messages(&gateway);

        gateway.display_message("hello");
        sleep_ms(2999).await;
        assert_eq!(gateway.current_message(), "hello");
        assert_eq!(*seen.lock().unwrap(), vec![text("hello")]);

        sleep_ms(2).await;
        assert_eq!(gateway.current_message(), "");
        assert_eq!(*seen.lock().unwrap(), vec![text("hello"), text("")]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_new_message_restarts_bubble_timer() {
        let gateway = offline();
        let seen = messages(&gateway);

        gateway.display_message("one");
        sleep_ms(2000).await;
        gateway.display_message("two");

        sleep_ms(1500).await;
        assert_eq!(gateway.current_message(), "two");
        assert_eq!(*seen.lock().unwrap(), vec![text("one"), text("two")]);

        sleep_ms(1600).await;
        assert_eq!(gateway.current_message(), "");
        assert_eq!(
            *seen.lock().unwrap(),
            vec![text("one"), text("two"), text("")]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_compose_blur_reverts_after_delay() {
        let gateway = offline();
        gateway.gesture(Gesture::DoubleClick);
        gateway.gesture(Gesture::ComposeBlur);

        sleep_ms(99).await;
        assert_eq!(gateway.mode(), Mode::Composing);
        sleep_ms(2).await;
        assert_eq!(gateway.mode(), Mode::Idle);
    }

    #[tokio::test(start_paused = true)]
    async fn test_submit_within_blur_window_cancels_revert() {
        let gateway = offline();
        gateway.gesture(Gesture::DoubleClick);
        gateway.gesture(Gesture::ComposeBlur);
        assert!(gateway.timers.is_pending(TimerKey::ComposeBlur));

        sleep_ms(50).await;
        let view = gateway.gesture(Gesture::Submit { text: "hi".into() });
        assert_eq!(view.mode, Mode::AwaitingReply);
        assert!(!gateway.timers.is_pending(TimerKey::ComposeBlur));

        sleep_ms(100).await;
        assert_ne!(gateway.mode(), Mode::Composing);
    }

    #[tokio::test(start_paused = true)]
    async fn test_greeting_only_when_idle_and_enabled() {
        let gateway = offline();
        let greetings = Arc::new(Mutex::new(Vec::new()));
        let g = greetings.clone();
        gateway
            .bus()
            .subscribe(Topic::PetGreeting, move |p| g.lock().unwrap().push(p.clone()));

        assert!(gateway.greet());
        assert!(!gateway.current_message().is_empty());

        gateway.gesture(Gesture::RightClick);
        assert!(!gateway.greet());
        gateway.gesture(Gesture::RightClick);

        let mut settings = gateway.settings();
        settings.enable_proactive_interaction = false;
        gateway.update_settings(settings).unwrap();
        assert!(!gateway.greet());
        assert_eq!(greetings.lock().unwrap().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_greeting_loop_follows_interval() {
        let gateway = offline();
        let mut settings = gateway.settings();
        settings.greeting_interval = 10;
        gateway.update_settings(settings).unwrap();

        let count = Arc::new(Mutex::new(0));
        let c = count.clone();
        gateway
            .bus()
            .subscribe(Topic::PetGreeting, move |_| *c.lock().unwrap() += 1);

        tokio::time::sleep(Duration::from_secs(5)).await;
        assert_eq!(*count.lock().unwrap(), 0);
        tokio::time::sleep(Duration::from_secs(6)).await;
        assert_eq!(*count.lock().unwrap(), 1);
        tokio::time::sleep(Duration::from_secs(10)).await;
        assert_eq!(*count.lock().unwrap(), 2);
    }
}
