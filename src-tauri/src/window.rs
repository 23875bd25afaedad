//! The one floating overlay window: geometry, opacity and visibility.
//!
//! Only `WindowController` touches the platform surface. Positions are
//! absolute screen coordinates in logical pixels and are never clamped, so a
//! drag can park the pet partly off-screen.

use crate::config::{MAX_OPACITY, MIN_OPACITY};
use crate::error::{PetError, Result};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

pub const OVERLAY_WIDTH: u32 = 300;
pub const OVERLAY_HEIGHT: u32 = 500;
/// gap kept from the right and bottom edges of the work area
pub const EDGE_MARGIN: i32 = 50;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Bounds {
    pub x: i32,
    pub y: i32,
    pub width: u32,
    pub height: u32,
}

/// Usable area of the primary display (excludes task bars / docks).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WorkArea {
    pub x: i32,
    pub y: i32,
    pub width: u32,
    pub height: u32,
}

/// Bottom-right placement of a fresh overlay.
#[allow(clippy::cast_possible_wrap)]
pub fn overlay_placement(area: WorkArea) -> Bounds {
    Bounds {
        x: area.x + area.width as i32 - OVERLAY_WIDTH as i32 - EDGE_MARGIN,
        y: area.y + area.height as i32 - OVERLAY_HEIGHT as i32 - EDGE_MARGIN,
        width: OVERLAY_WIDTH,
        height: OVERLAY_HEIGHT,
    }
}

/// Platform window operations. Implementations are borderless, transparent,
/// always-on-top and kept out of the taskbar from the moment they are built.
pub trait OverlaySurface: Send {
    fn set_position(&self, x: i32, y: i32) -> Result<()>;
    fn set_opacity(&self, opacity: f64) -> Result<()>;
    fn minimize(&self) -> Result<()>;
    fn hide(&self) -> Result<()>;
    fn show(&self) -> Result<()>;
}

/// Tracked state of the live window.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WindowHandle {
    pub bounds: Bounds,
    pub opacity: f64,
    pub always_on_top: bool,
    pub visible: bool,
}

struct Overlay<S> {
    surface: S,
    handle: WindowHandle,
}

pub struct WindowController<S> {
    overlay: Option<Overlay<S>>,
}

impl<S> Default for WindowController<S> {
    fn default() -> Self {
        Self { overlay: None }
    }
}

impl<S: OverlaySurface> WindowController<S> {
    pub fn new() -> Self {
        Self::default()
    }

    #[cfg(test)]
    fn is_ready(&self) -> bool {
        self.overlay.is_some()
    }

    /// Compute the bottom-right placement and let `build` realise it.
    pub fn create_overlay<F>(&mut self, area: WorkArea, build: F) -> Result<Bounds>
    where
        F: FnOnce(Bounds) -> Result<S>,
    {
        let bounds = overlay_placement(area);
        let surface = build(bounds)?;
        info!(x = bounds.x, y = bounds.y, "overlay created");
        self.overlay = Some(Overlay {
            surface,
            handle: WindowHandle {
                bounds,
                opacity: MAX_OPACITY,
                always_on_top: true,
                visible: true,
            },
        });
        Ok(bounds)
    }

    pub fn get_bounds(&self) -> Result<Bounds> {
        Ok(self.overlay()?.handle.bounds)
    }

    pub fn handle(&self) -> Result<WindowHandle> {
        Ok(self.overlay()?.handle)
    }

    pub fn set_position(&mut self, x: i32, y: i32) -> Result<()> {
        let overlay = self.overlay_mut()?;
        overlay.surface.set_position(x, y)?;
        overlay.handle.bounds.x = x;
        overlay.handle.bounds.y = y;
        Ok(())
    }

    /// Rejects anything outside [0.1, 1.0]; callers clamp first.
    pub fn set_opacity(&mut self, opacity: f64) -> Result<()> {
        if !(MIN_OPACITY..=MAX_OPACITY).contains(&opacity) {
            return Err(PetError::InvalidArgument(format!(
                "opacity {opacity} outside [{MIN_OPACITY}, {MAX_OPACITY}]"
            )));
        }
        let overlay = self.overlay_mut()?;
        overlay.surface.set_opacity(opacity)?;
        overlay.handle.opacity = opacity;
        Ok(())
    }

    pub fn minimize(&mut self) -> Result<()> {
        self.overlay_mut()?.surface.minimize()
    }

    pub fn hide(&mut self) -> Result<()> {
        let overlay = self.overlay_mut()?;
        overlay.surface.hide()?;
        overlay.handle.visible = false;
        Ok(())
    }

    pub fn show(&mut self) -> Result<()> {
        let overlay = self.overlay_mut()?;
        overlay.surface.show()?;
        overlay.handle.visible = true;
        Ok(())
    }

    /// An OS close signal only ever hides the overlay.
    pub fn intercept_close(&mut self) -> Result<()> {
        debug!("close request intercepted, hiding overlay");
        self.hide()
    }

    /// The platform tore the window down underneath us.
    pub fn forget(&mut self) {
        if self.overlay.take().is_some() {
            info!("overlay destroyed by the windowing system");
        }
    }

    /// On an "activate" signal the overlay is rebuilt only if no window is alive.
    pub fn needs_recreate(&self, live_windows: usize) -> bool {
        live_windows == 0
    }

    fn overlay(&self) -> Result<&Overlay<S>> {
        self.overlay.as_ref().ok_or(PetError::NotReady)
    }

    fn overlay_mut(&mut self) -> Result<&mut Overlay<S>> {
        self.overlay.as_mut().ok_or(PetError::NotReady)
    }
}


#[cfg(test)]
mod tests {
    use super::testing::{RecordingSurface, SurfaceCall};
    use super::*;

    const AREA: WorkArea = WorkArea {
        x: 0,
        y: 0,
        width: 1920,
        height: 1040,
    };

    fn ready() -> (WindowController<RecordingSurface>, RecordingSurface) {
        let surface = RecordingSurface::default();
        let mut controller = WindowController::new();
        let s = surface.clone();
        controller.create_overlay(AREA, move |_| Ok(s)).unwrap();
        (controller, surface)
    }

    #[test]
    fn test_placement_bottom_right_with_margin() {
        let bounds = overlay_placement(AREA);
        assert_eq!(bounds, Bounds { x: 1570, y: 490, width: 300, height: 500 });

        let offset = overlay_placement(WorkArea { x: 1920, y: 24, width: 1280, height: 776 });
        assert_eq!((offset.x, offset.y), (1920 + 1280 - 350, 24 + 776 - 550));
    }

    #[test]
    fn test_not_ready_before_create() {
        let mut controller = WindowController::<RecordingSurface>::new();
        assert!(matches!(controller.set_position(1, 2), Err(PetError::NotReady)));
        assert!(matches!(controller.get_bounds(), Err(PetError::NotReady)));
        assert!(matches!(controller.hide(), Err(PetError::NotReady)));
    }

    #[test]
    fn test_set_position_accepts_offscreen() {
        let (mut controller, surface) = ready();
        controller.set_position(-200, 99_999).unwrap();
        assert_eq!(controller.get_bounds().unwrap().x, -200);
        assert_eq!(controller.get_bounds().unwrap().y, 99_999);
        assert_eq!(surface.calls(), vec![SurfaceCall::Position(-200, 99_999)]);
    }

    #[test]
    fn test_opacity_accepted_iff_in_range() {
        let (mut controller, surface) = ready();
        for ok in [0.1, 0.5, 1.0] {
            controller.set_opacity(ok).unwrap();
        }
        for bad in [0.0, 0.099, 1.01, -1.0, f64::NAN] {
            assert!(matches!(controller.set_opacity(bad), Err(PetError::InvalidArgument(_))));
        }
        // rejected values never reach the surface
        assert_eq!(surface.calls().len(), 3);
        assert!((controller.handle().unwrap().opacity - 1.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_hide_is_idempotent_and_show_preserves_state() {
        let (mut controller, _) = ready();
        controller.set_position(10, 20).unwrap();
        controller.set_opacity(0.4).unwrap();

        controller.hide().unwrap();
        controller.hide().unwrap();
        assert!(!controller.handle().unwrap().visible);

        controller.show().unwrap();
        let handle = controller.handle().unwrap();
        assert!(handle.visible);
        assert_eq!((handle.bounds.x, handle.bounds.y), (10, 20));
        assert!((handle.opacity - 0.4).abs() < f64::EPSILON);
        assert!(handle.always_on_top);
    }

    #[test]
    fn test_close_hides_but_keeps_window() {
        let (mut controller, _) = ready();
        controller.intercept_close().unwrap();
        assert!(controller.is_ready());
        assert!(!controller.handle().unwrap().visible);
    }

    #[test]
    fn test_forget_and_recreate() {
        let (mut controller, _) = ready();
        assert!(!controller.needs_recreate(1));
        controller.forget();
        assert!(!controller.is_ready());
        assert!(controller.needs_recreate(0));
    }

    #[test]
    fn test_failed_build_leaves_not_ready() {
        let mut controller = WindowController::<RecordingSurface>::new();
        let result = controller.create_overlay(AREA, |_| Err(PetError::Window("no display".into())));
        assert!(result.is_err());
        assert!(!controller.is_ready());
    }
}
