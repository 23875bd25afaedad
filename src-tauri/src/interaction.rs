//! Gesture interpretation for the overlay.
//!
//! `Interaction` is a plain state machine: it consumes gestures and returns the
//! effects the gateway has to carry out. It never talks to the window or the
//! backend itself, so a transition can never fail halfway.

use crate::config::{Settings, MAX_OPACITY, MIN_OPACITY};
use crate::notifications::AnimationTag;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

/// Grace period before a blurred compose box is dismissed, so a click on a
/// neighbouring send button still lands.
pub const COMPOSE_BLUR_DELAY: Duration = Duration::from_millis(100);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum Mode {
    #[default]
    Idle,
    Dragging,
    Composing,
    AwaitingReply,
    Configuring,
}

impl Mode {
    pub fn animation(self) -> AnimationTag {
        match self {
            Self::Idle => AnimationTag::Idle,
            Self::Dragging => AnimationTag::Drag,
            Self::Composing => AnimationTag::Listen,
            Self::AwaitingReply => AnimationTag::Think,
            Self::Configuring => AnimationTag::Configure,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Point {
    pub x: i32,
    pub y: i32,
}

impl Point {
    pub fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }

    /// `self - other`, or `None` if a coordinate leaves the `i32` range.
    pub fn offset_from(self, other: Point) -> Option<Point> {
        Some(Point::new(
            self.x.checked_sub(other.x)?,
            self.y.checked_sub(other.y)?,
        ))
    }
}

/// Which part of the overlay a pointer-down landed on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Region {
    #[default]
    Pet,
    Compose,
    Settings,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum Gesture {
    DragStart {
        pointer: Point,
        /// Filled in from the live window bounds when the caller leaves it out.
        #[serde(default)]
        window_origin: Option<Point>,
        #[serde(default)]
        region: Region,
    },
    DragMove {
        pointer: Point,
        #[serde(default)]
        seq: Option<u64>,
    },
    DragEnd,
    DoubleClick,
    RightClick,
    Edit {
        text: String,
    },
    Submit {
        text: String,
    },
    ComposeBlur,
    FocusLost,
    CloseSettings,
    AdjustOpacity {
        value: f64,
    },
    Cancel,
}

/// Work the gateway performs on behalf of a transition.
#[derive(Debug, Clone, PartialEq)]
pub enum Effect {
    MoveWindow(Point),
    ApplyOpacity(f64),
    SendMessage(String),
    ShowMessage(String),
    ScheduleComposeRevert,
    CancelComposeRevert,
    ModeChanged(Mode),
}

/// Session state for the lifetime of the process.
#[derive(Debug, Clone, Default)]
pub struct Interaction {
    mode: Mode,
    drag_offset: Option<Point>,
    last_move_seq: Option<u64>,
    compose_buffer: String,
    settings: Settings,
}

impl Interaction {
    pub fn new(settings: Settings) -> Self {
        Self {
            settings,
            ..Self::default()
        }
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }

    #[cfg(test)]
    fn drag_offset(&self) -> Option<Point> {
        self.drag_offset
    }

    pub fn compose_buffer(&self) -> &str {
        &self.compose_buffer
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn set_settings(&mut self, settings: Settings) {
        self.settings = settings;
    }

    pub fn handle(&mut self, gesture: Gesture) -> Vec<Effect> {
        let mut effects = Vec::new();
        match gesture {
            Gesture::DragStart {
                pointer,
                window_origin,
                region,
            } => self.drag_start(pointer, window_origin, region),
            Gesture::DragMove { pointer, seq } => self.drag_move(pointer, seq, &mut effects),
            Gesture::DragEnd => {
                if self.mode == Mode::Dragging {
                    self.enter(Mode::Idle, &mut effects);
                }
                self.drag_offset = None;
            }
            Gesture::DoubleClick => match self.mode {
                Mode::Idle => self.enter(Mode::Composing, &mut effects),
                Mode::Composing => {
                    effects.push(Effect::CancelComposeRevert);
                    self.enter(Mode::Idle, &mut effects);
                }
                _ => debug!(mode = ?self.mode, "double-click ignored"),
            },
            Gesture::RightClick => match self.mode {
                Mode::Idle => self.enter(Mode::Configuring, &mut effects),
                Mode::Configuring => self.enter(Mode::Idle, &mut effects),
                _ => debug!(mode = ?self.mode, "right-click ignored"),
            },
            Gesture::CloseSettings => {
                if self.mode == Mode::Configuring {
                    self.enter(Mode::Idle, &mut effects);
                }
            }
            Gesture::Edit { text } => {
                if self.mode == Mode::Composing {
                    self.compose_buffer = text;
                }
            }
            Gesture::Submit { text } => self.submit(&text, &mut effects),
            Gesture::ComposeBlur => {
                if self.mode == Mode::Composing {
                    effects.push(Effect::ScheduleComposeRevert);
                }
            }
            Gesture::FocusLost => {
                match self.mode {
                    Mode::Dragging => self.enter(Mode::Idle, &mut effects),
                    Mode::Composing => effects.push(Effect::ScheduleComposeRevert),
                    _ => {}
                }
                self.drag_offset = None;
            }
            Gesture::AdjustOpacity { value } => {
                if self.mode == Mode::Configuring && !value.is_nan() {
                    let opacity = value.clamp(MIN_OPACITY, MAX_OPACITY);
                    self.settings.opacity = opacity;
                    effects.push(Effect::ApplyOpacity(opacity));
                }
            }
            Gesture::Cancel => {
                if self.mode == Mode::Composing {
                    effects.push(Effect::CancelComposeRevert);
                }
                if self.mode != Mode::Idle {
                    self.enter(Mode::Idle, &mut effects);
                }
            }
        }
        effects
    }

    /// The blur grace period ran out without a submit.
    pub fn compose_revert_elapsed(&mut self) -> Vec<Effect> {
        let mut effects = Vec::new();
        if self.mode == Mode::Composing {
            self.enter(Mode::Idle, &mut effects);
        }
        effects
    }

    /// The backend answered (or the client substituted its fallback).
    pub fn reply_received(&mut self, text: String) -> Vec<Effect> {
        let mut effects = vec![Effect::ShowMessage(text)];
        if self.mode == Mode::AwaitingReply {
            self.enter(Mode::Idle, &mut effects);
        }
        effects
    }

    /// A press on the pet only arms a drag; the first move starts it. A plain
    /// click (press, release, no move) leaves the mode untouched.
    fn drag_start(&mut self, pointer: Point, origin: Option<Point>, region: Region) {
        if region != Region::Pet {
            // pointer-down inside the compose box or settings panel is not a drag
            return;
        }
        let Some(origin) = origin else {
            debug!("drag start without a window origin, ignored");
            return;
        };
        let Some(offset) = pointer.offset_from(origin) else {
            debug!(?pointer, ?origin, "drag start out of range, ignored");
            return;
        };
        self.drag_offset = Some(offset);
        self.last_move_seq = None;
    }

    fn drag_move(&mut self, pointer: Point, seq: Option<u64>, effects: &mut Vec<Effect>) {
        let Some(offset) = self.drag_offset else {
            return;
        };
        if let (Some(seq), Some(last)) = (seq, self.last_move_seq) {
            if seq <= last {
                // overtaken by a newer move; only the latest position matters
                return;
            }
        }
        let Some(target) = pointer.offset_from(offset) else {
            debug!(?pointer, ?offset, "drag move out of range, ignored");
            return;
        };
        if seq.is_some() {
            self.last_move_seq = seq;
        }
        if self.mode != Mode::Dragging {
            if self.mode == Mode::Composing {
                effects.push(Effect::CancelComposeRevert);
            }
            self.enter(Mode::Dragging, effects);
        }
        effects.push(Effect::MoveWindow(target));
    }

    fn submit(&mut self, text: &str, effects: &mut Vec<Effect>) {
        if self.mode != Mode::Composing {
            return;
        }
        effects.push(Effect::CancelComposeRevert);
        self.compose_buffer.clear();
        let text = text.trim();
        if text.is_empty() {
            self.enter(Mode::Idle, effects);
            return;
        }
        // the compose box goes away now; the reply only fills the bubble later
        self.enter(Mode::AwaitingReply, effects);
        effects.push(Effect::SendMessage(text.to_string()));
    }

    fn enter(&mut self, mode: Mode, effects: &mut Vec<Effect>) {
        if mode != Mode::Dragging {
            self.drag_offset = None;
            self.last_move_seq = None;
        }
        debug!(from = ?self.mode, to = ?mode, "mode change");
        self.mode = mode;
        effects.push(Effect::ModeChanged(mode));
    }
}
