//! Desktop embedding for fence windows.
//!
//! A fence is a borderless popup that sits directly above the desktop icon
//! surface. The window manager keeps trying to reorder, hide, activate and
//! minimize it; [`EmbeddingController`] answers each of those requests. The
//! controller is `Copy` and holds no OS handles, so the window procedure can
//! read it without borrowing anything else.

use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{info, warn};

// Log a missing shell once per process
static SHELL_MISSING_LOGGED: AtomicBool = AtomicBool::new(false);

/// `WM_SYSCOMMAND` code for minimize; the low four bits are reserved.
pub const SC_MINIMIZE_CODE: usize = 0xF020;

// ============================================================================
// Types
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Placement {
    /// Not yet shown.
    Pending,
    /// Placed above the desktop icon surface; defense active.
    Embedded,
    /// The shell could not be found. The fence behaves like an ordinary
    /// window and every correction is skipped.
    Floating,
}

/// Where a pending position change wants to put the window in the stack.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertAfter {
    Bottom,
    Top,
    TopMost,
    NoTopMost,
    /// Behind some specific window.
    Window,
}

/// The parts of a window-position change the controller cares about.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PositionRequest {
    pub hide: bool,
    pub show: bool,
    /// False when the change leaves the Z-order alone.
    pub reorder: bool,
    pub insert_after: InsertAfter,
}

/// A Z-order the host should apply to the window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ZOrder {
    /// Bottom of the normal stack, just above the desktop icon surface.
    DesktopLayer,
    TopMost,
    NotTopMost,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageReply {
    /// Let the default window procedure run.
    PassThrough,
    /// Stop here and return this value.
    Handled(isize),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShowDecision {
    Allow,
    /// Reject the hide and show the window again.
    Reshow,
}

/// What the controller needs from the shell when it embeds a window.
pub trait DesktopShell {
    /// Walk the shell window hierarchy for the desktop icon surface.
    fn locate_icon_surface(&self) -> bool;
    fn apply_z_order(&self, order: ZOrder);
    fn show_without_activating(&self);
}

// ============================================================================
// Controller
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EmbeddingController {
    placement: Placement,
    pinned: bool,
    user_hidden: bool,
    closing: bool,
}

impl Default for EmbeddingController {
    fn default() -> Self {
        Self::new()
    }
}

impl EmbeddingController {
    pub const fn new() -> Self {
        Self { placement: Placement::Pending, pinned: false, user_hidden: false, closing: false }
    }

    pub fn placement(&self) -> Placement {
        self.placement
    }

    pub fn is_embedded(&self) -> bool {
        self.placement == Placement::Embedded
    }

    pub fn is_pinned(&self) -> bool {
        self.pinned
    }

    pub fn is_user_hidden(&self) -> bool {
        self.user_hidden
    }

    pub fn set_user_hidden(&mut self, hidden: bool) {
        self.user_hidden = hidden;
    }

    /// Marks the window as going away; hides are allowed from here on.
    pub fn begin_close(&mut self) {
        self.closing = true;
    }

    /// First placement. Runs once; later calls return the existing placement.
    pub fn embed(&mut self, shell: &impl DesktopShell) -> Placement {
        if self.placement != Placement::Pending {
            return self.placement;
        }
        if shell.locate_icon_surface() {
            shell.apply_z_order(if self.pinned { ZOrder::TopMost } else { ZOrder::DesktopLayer });
            self.placement = Placement::Embedded;
            info!("Fence embedded above the desktop icon surface");
        } else {
            if !SHELL_MISSING_LOGGED.swap(true, Ordering::SeqCst) {
                warn!("Desktop shell not found; fences will float as ordinary windows");
            }
            self.placement = Placement::Floating;
        }
        if !self.user_hidden {
            shell.show_without_activating();
        }
        self.placement
    }

    /// Rewrite a pending position change so the fence stays visible and at
    /// the bottom of the stack.
    pub fn on_position_changing(&self, mut req: PositionRequest) -> PositionRequest {
        if !self.is_embedded() {
            return req;
        }
        if req.hide && !self.user_hidden && !self.closing {
            req.hide = false;
            req.show = true;
        }
        if !self.pinned && req.reorder && req.insert_after != InsertAfter::Bottom {
            req.insert_after = InsertAfter::Bottom;
        }
        req
    }

    /// Clicking a fence never activates it.
    pub fn on_mouse_activate(&self) -> MessageReply {
        MessageReply::Handled(MA_NOACTIVATE)
    }

    /// Keep the inactive look even when the OS asks for the active one.
    pub fn on_nc_activate(&self, activating: bool) -> MessageReply {
        if activating {
            MessageReply::Handled(1)
        } else {
            MessageReply::PassThrough
        }
    }

    /// A minimized fence would vanish from the desktop.
    pub fn on_sys_command(&self, command: usize) -> MessageReply {
        if command & 0xFFF0 == SC_MINIMIZE_CODE {
            MessageReply::Handled(0)
        } else {
            MessageReply::PassThrough
        }
    }

    pub fn on_show_window(&self, showing: bool) -> ShowDecision {
        if showing || self.closing || self.user_hidden {
            ShowDecision::Allow
        } else {
            ShowDecision::Reshow
        }
    }

    /// Switch pinned mode. Returns the Z-order to apply, or `None` when
    /// nothing changed.
    pub fn set_pinned(&mut self, pinned: bool) -> Option<ZOrder> {
        if self.pinned == pinned {
            return None;
        }
        self.pinned = pinned;
        Some(match (pinned, self.placement) {
            (true, _) => ZOrder::TopMost,
            (false, Placement::Embedded) => ZOrder::DesktopLayer,
            (false, _) => ZOrder::NotTopMost,
        })
    }

    /// Z-order to re-assert after something (an edit, a menu) disturbed it.
    pub fn resting_z_order(&self) -> Option<ZOrder> {
        match self.placement {
            Placement::Embedded if self.pinned => Some(ZOrder::TopMost),
            Placement::Embedded => Some(ZOrder::DesktopLayer),
            _ => None,
        }
    }
}

const MA_NOACTIVATE: isize = 3;

// ============================================================================
// Windows: shell walk and window placement
// ============================================================================

#[cfg(target_os = "windows")]
pub mod win32 {
    use super::{DesktopShell, InsertAfter, PositionRequest, ZOrder};
    use windows::core::w;
    use windows::Win32::Foundation::HWND;
    use windows::Win32::UI::WindowsAndMessaging::*;

    /// `SHELLDLL_DefView`, either directly under `Progman` or inside one of
    /// the `WorkerW` windows the shell creates for wallpaper transitions.
    pub fn find_shell_view() -> Option<HWND> {
        unsafe {
            let progman = FindWindowW(w!("Progman"), None).unwrap_or_default();
            if !progman.is_invalid() {
                if let Ok(view) = FindWindowExW(progman, HWND::default(), w!("SHELLDLL_DefView"), None) {
                    if !view.is_invalid() {
                        return Some(view);
                    }
                }
            }
            let mut worker = HWND::default();
            while let Ok(next) = FindWindowExW(HWND::default(), worker, w!("WorkerW"), None) {
                if next.is_invalid() {
                    break;
                }
                worker = next;
                if let Ok(view) = FindWindowExW(worker, HWND::default(), w!("SHELLDLL_DefView"), None) {
                    if !view.is_invalid() {
                        return Some(view);
                    }
                }
            }
            None
        }
    }

    /// The `SysListView32` holding the desktop icons.
    pub fn find_desktop_list_view() -> Option<HWND> {
        let view = find_shell_view()?;
        unsafe {
            FindWindowExW(view, HWND::default(), w!("SysListView32"), None)
                .ok()
                .filter(|h| !h.is_invalid())
        }
    }

    pub fn set_z_order(hwnd: HWND, order: ZOrder) {
        let flags = SWP_NOMOVE | SWP_NOSIZE | SWP_NOACTIVATE;
        unsafe {
            match order {
                ZOrder::TopMost => {
                    let _ = SetWindowPos(hwnd, HWND_TOPMOST, 0, 0, 0, 0, flags);
                }
                ZOrder::NotTopMost => {
                    let _ = SetWindowPos(hwnd, HWND_NOTOPMOST, 0, 0, 0, 0, flags);
                }
                ZOrder::DesktopLayer => {
                    let _ = SetWindowPos(hwnd, HWND_NOTOPMOST, 0, 0, 0, 0, flags);
                    let _ = SetWindowPos(hwnd, HWND_BOTTOM, 0, 0, 0, 0, flags);
                }
            }
        }
    }

    /// A shell bound to one fence window.
    pub struct Win32Shell {
        pub hwnd: HWND,
    }

    impl DesktopShell for Win32Shell {
        fn locate_icon_surface(&self) -> bool {
            find_desktop_list_view().is_some()
        }

        fn apply_z_order(&self, order: ZOrder) {
            set_z_order(self.hwnd, order);
        }

        fn show_without_activating(&self) {
            unsafe {
                let _ = ShowWindow(self.hwnd, SW_SHOWNOACTIVATE);
            }
        }
    }

    fn classify(after: HWND) -> InsertAfter {
        if after == HWND_BOTTOM {
            InsertAfter::Bottom
        } else if after == HWND_TOPMOST {
            InsertAfter::TopMost
        } else if after == HWND_NOTOPMOST {
            InsertAfter::NoTopMost
        } else if after == HWND_TOP {
            InsertAfter::Top
        } else {
            InsertAfter::Window
        }
    }

    pub fn read_request(pos: &WINDOWPOS) -> PositionRequest {
        PositionRequest {
            hide: pos.flags.contains(SWP_HIDEWINDOW),
            show: pos.flags.contains(SWP_SHOWWINDOW),
            reorder: !pos.flags.contains(SWP_NOZORDER),
            insert_after: classify(pos.hwndInsertAfter),
        }
    }

    /// Write a rewritten request back into the message's `WINDOWPOS`.
    pub fn write_request(pos: &mut WINDOWPOS, before: PositionRequest, after: PositionRequest) {
        if before.hide && !after.hide {
            pos.flags &= !SWP_HIDEWINDOW;
            pos.flags |= SWP_SHOWWINDOW;
        }
        if before.insert_after != after.insert_after && after.insert_after == InsertAfter::Bottom {
            pos.hwndInsertAfter = HWND_BOTTOM;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;

    #[derive(Default)]
    struct FakeShell {
        present: bool,
        orders: RefCell<Vec<ZOrder>>,
        shown: RefCell<u32>,
    }

    impl DesktopShell for FakeShell {
        fn locate_icon_surface(&self) -> bool {
            self.present
        }
        fn apply_z_order(&self, order: ZOrder) {
            self.orders.borrow_mut().push(order);
        }
        fn show_without_activating(&self) {
            *self.shown.borrow_mut() += 1;
        }
    }

    fn embedded() -> EmbeddingController {
        let mut c = EmbeddingController::new();
        c.embed(&FakeShell { present: true, ..FakeShell::default() });
        c
    }

    const HIDE: PositionRequest =
        PositionRequest { hide: true, show: false, reorder: false, insert_after: InsertAfter::Top };

    #[test]
    fn test_embed_places_at_desktop_layer_once() {
        let shell = FakeShell { present: true, ..FakeShell::default() };
        let mut c = EmbeddingController::new();
        assert_eq!(c.embed(&shell), Placement::Embedded);
        assert_eq!(c.embed(&shell), Placement::Embedded);
        assert_eq!(*shell.orders.borrow(), vec![ZOrder::DesktopLayer]);
        assert_eq!(*shell.shown.borrow(), 1);
    }

    #[test]
    fn test_hide_requests_are_rejected() {
        let c = embedded();
        for _ in 0..5 {
            let out = c.on_position_changing(HIDE);
            assert!(!out.hide);
            assert!(out.show);
            assert_eq!(c.on_show_window(false), ShowDecision::Reshow);
        }
    }

    #[test]
    fn test_user_hide_is_honoured() {
        let mut c = embedded();
        c.set_user_hidden(true);
        assert!(c.on_position_changing(HIDE).hide);
        assert_eq!(c.on_show_window(false), ShowDecision::Allow);
    }

    #[test]
    fn test_closing_allows_hide() {
        let mut c = embedded();
        c.begin_close();
        assert!(c.on_position_changing(HIDE).hide);
        assert_eq!(c.on_show_window(false), ShowDecision::Allow);
    }

    #[test]
    fn test_every_reorder_goes_to_bottom() {
        let c = embedded();
        for target in [InsertAfter::Top, InsertAfter::TopMost, InsertAfter::NoTopMost, InsertAfter::Window] {
            let req = PositionRequest { hide: false, show: false, reorder: true, insert_after: target };
            assert_eq!(c.on_position_changing(req).insert_after, InsertAfter::Bottom);
        }
        let untouched = PositionRequest { hide: false, show: false, reorder: false, insert_after: InsertAfter::Top };
        assert_eq!(c.on_position_changing(untouched), untouched);
    }

    #[test]
    fn test_pinned_disables_reorder_defense() {
        let mut c = embedded();
        assert_eq!(c.set_pinned(true), Some(ZOrder::TopMost));
        assert_eq!(c.set_pinned(true), None);
        let req = PositionRequest { hide: false, show: false, reorder: true, insert_after: InsertAfter::TopMost };
        assert_eq!(c.on_position_changing(req).insert_after, InsertAfter::TopMost);
        assert_eq!(c.resting_z_order(), Some(ZOrder::TopMost));
        assert_eq!(c.set_pinned(false), Some(ZOrder::DesktopLayer));
    }

    #[test]
    fn test_missing_shell_degrades_to_floating() {
        let shell = FakeShell::default();
        let mut c = EmbeddingController::new();
        assert_eq!(c.embed(&shell), Placement::Floating);
        assert!(shell.orders.borrow().is_empty());
        assert_eq!(*shell.shown.borrow(), 1);

        let req = PositionRequest { hide: true, show: false, reorder: true, insert_after: InsertAfter::Top };
        assert_eq!(c.on_position_changing(req), req);
        assert_eq!(c.resting_z_order(), None);
        assert_eq!(c.set_pinned(true), Some(ZOrder::TopMost));
        assert_eq!(c.set_pinned(false), Some(ZOrder::NotTopMost));
    }

    #[test]
    fn test_activation_and_minimize_suppressed() {
        let c = embedded();
        assert_eq!(c.on_mouse_activate(), MessageReply::Handled(MA_NOACTIVATE));
        assert_eq!(c.on_nc_activate(true), MessageReply::Handled(1));
        assert_eq!(c.on_nc_activate(false), MessageReply::PassThrough);
        assert_eq!(c.on_sys_command(0xF020), MessageReply::Handled(0));
        assert_eq!(c.on_sys_command(0xF022), MessageReply::Handled(0));
        assert_eq!(c.on_sys_command(0xF060), MessageReply::PassThrough);
    }

    mod properties {
        use super::*;
        use proptest::collection::vec;
        use proptest::prelude::*;

        #[derive(Debug, Clone, Copy)]
        enum OsEvent {
            Position(PositionRequest),
            ShowWindow(bool),
            SysCommand(usize),
        }

        fn insert_after_strategy() -> impl Strategy<Value = InsertAfter> {
            prop_oneof![
                Just(InsertAfter::Bottom),
                Just(InsertAfter::Top),
                Just(InsertAfter::TopMost),
                Just(InsertAfter::NoTopMost),
                Just(InsertAfter::Window),
            ]
        }

        fn request_strategy() -> impl Strategy<Value = PositionRequest> {
            (any::<bool>(), any::<bool>(), any::<bool>(), insert_after_strategy())
                .prop_map(|(hide, show, reorder, insert_after)| PositionRequest { hide, show, reorder, insert_after })
        }

        fn event_strategy() -> impl Strategy<Value = OsEvent> {
            prop_oneof![
                request_strategy().prop_map(OsEvent::Position),
                any::<bool>().prop_map(OsEvent::ShowWindow),
                prop_oneof![Just(SC_MINIMIZE_CODE), Just(SC_MINIMIZE_CODE | 2), any::<u16>().prop_map(usize::from)]
                    .prop_map(OsEvent::SysCommand),
            ]
        }

        proptest! {
            #[test]
            fn embedded_fence_survives_any_event_sequence(events in vec(event_strategy(), 0..40)) {
                let c = embedded();
                for event in events {
                    match event {
                        OsEvent::Position(req) => {
                            let out = c.on_position_changing(req);
                            prop_assert!(!out.hide);
                            if req.hide {
                                prop_assert!(out.show);
                            }
                            if req.reorder {
                                prop_assert_eq!(out.insert_after, InsertAfter::Bottom);
                            }
                        }
                        OsEvent::ShowWindow(showing) => {
                            let expected = if showing { ShowDecision::Allow } else { ShowDecision::Reshow };
                            prop_assert_eq!(c.on_show_window(showing), expected);
                        }
                        OsEvent::SysCommand(command) => {
                            if command & 0xFFF0 == SC_MINIMIZE_CODE {
                                prop_assert_eq!(c.on_sys_command(command), MessageReply::Handled(0));
                            }
                        }
                    }
                }
            }

            #[test]
            fn pinned_fence_keeps_requested_order(req in request_strategy()) {
                let mut c = embedded();
                c.set_pinned(true);
                let out = c.on_position_changing(req);
                prop_assert_eq!(out.insert_after, req.insert_after);
                prop_assert!(!out.hide);
            }

            #[test]
            fn floating_fence_passes_requests_through(req in request_strategy()) {
                let mut c = EmbeddingController::new();
                c.embed(&FakeShell::default());
                prop_assert_eq!(c.on_position_changing(req), req);
            }
        }
    }
}
