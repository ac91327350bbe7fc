//! Process shell: owns the [`ShellContext`], turns window messages into
//! context calls, and runs the message loop.
//!
//! The state lives in a thread-local `RefCell`. Win32 re-enters window
//! procedures from inside calls such as `SetWindowPos` or `DestroyWindow`;
//! a re-entrant message finds the state borrowed and falls through to the
//! default handling. Modal UI (menus, message boxes) runs outside the borrow.

use std::cell::RefCell;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Instant;

use tracing::{debug, error, info, warn};
use windows::Win32::Foundation::{HWND, LPARAM, LRESULT, WPARAM};
use windows::Win32::UI::Input::KeyboardAndMouse::{RegisterHotKey, UnregisterHotKey, MOD_ALT, MOD_CONTROL, MOD_NOREPEAT};
use windows::Win32::UI::WindowsAndMessaging::*;

use crate::context::ShellContext;
use crate::desktop_icons::win32::ShellIconLocator;
use crate::desktop_icons::RestoreOutcome;
use crate::embedding::win32::{set_z_order, Win32Shell};
use crate::error::{FenceError, Result};
use crate::fence::{Fence, DEFAULT_TITLE};
use crate::fence_window::{self as fw, key, MenuItem, PaintModel, COLLAPSE_BUTTON_WIDTH, WM_APP_EDITOR_DONE, Z_RESET_TIMER};
use crate::geometry::{
    apply_resize, clamp_to_work_area, hit_test_edges, Point, Rect, ResizeCursor, ResizeEdges, RowLayout, Size,
};
use crate::input_hooks::win32::{handle_from_message, Win32Hooks, Win32TopLevel, WM_APP_FINISH_EDIT, WM_APP_SHOW_DESKTOP};
use crate::input_hooks::WindowId;
use crate::record::FenceDocument;
use crate::registry::FenceHandle;
use crate::settings::Settings;
use crate::snapping::{snap_move, snap_resize};

const TICK_TIMER: usize = 1;
const TICK_MS: u32 = 15;
const HOTKEY_TOGGLE_ALL: i32 = 1;
const VK_F: u32 = 0x46;
/// Pointer travel before an icon press turns into a drag.
const DRAG_START_DISTANCE: i32 = 4;
const ROW_HEIGHT: i32 = 22;
const ROW_GAP: i32 = 4;
/// Title of the fence created when none were saved.
const FIRST_FENCE_TITLE: &str = "Fence";

mod menu {
    pub const OPEN: u32 = 1;
    pub const REMOVE_ICON: u32 = 2;
    pub const NEW_FENCE: u32 = 10;
    pub const RENAME: u32 = 11;
    pub const COLLAPSE: u32 = 12;
    pub const PIN: u32 = 13;
    pub const DELETE_FENCE: u32 = 14;
    pub const EXIT: u32 = 20;
}

enum Gesture {
    Move { fence: FenceHandle, grab: Point, start: Rect },
    Resize { fence: FenceHandle, edges: ResizeEdges, grab: Point, start: Rect },
    Icon { fence: FenceHandle, path: PathBuf, grab: Point, dragging: bool },
}

struct Editor {
    fence: FenceHandle,
    edit: HWND,
}

/// What a right-click hit, gathered before the menu opens.
struct MenuTarget {
    fence: FenceHandle,
    icon: Option<PathBuf>,
    collapsed: bool,
    pinned: bool,
}

struct App {
    ctx: ShellContext<Win32Hooks>,
    locator: ShellIconLocator,
    controller: HWND,
    windows: HashMap<FenceHandle, HWND>,
    by_hwnd: HashMap<isize, FenceHandle>,
    gesture: Option<Gesture>,
    editor: Option<Editor>,
    notices: Vec<String>,
    ticking: bool,
    all_hidden: bool,
}

thread_local! {
    static APP: RefCell<Option<App>> = const { RefCell::new(None) };
}

fn with_app<R>(f: impl FnOnce(&mut App) -> R) -> Option<R> {
    APP.with(|cell| {
        let mut guard = cell.try_borrow_mut().ok()?;
        let app = guard.as_mut()?;
        Some(f(app))
    })
}

/// Show queued user notifications once the state is no longer borrowed.
fn flush_notices() {
    let notices = with_app(|app| std::mem::take(&mut app.notices)).unwrap_or_default();
    for text in notices {
        fw::notify_user(&text);
    }
}

fn row_layout(settings: &Settings) -> RowLayout {
    RowLayout { top: settings.title_height + ROW_GAP, row_height: ROW_HEIGHT }
}

// ============================================================================
// Entry
// ============================================================================

pub fn run() -> Result<()> {
    let settings = Settings::load_or_default(&Settings::exe_dir());
    fw::register_classes()?;
    let controller = fw::create_controller()?;

    let doc = FenceDocument::load(&settings.fences_file()).unwrap_or_else(|e| {
        error!("{}; starting with no fences", e);
        FenceDocument::default()
    });

    let mut app = App {
        ctx: ShellContext::new(settings, Win32Hooks::new(controller)),
        locator: ShellIconLocator::new(),
        controller,
        windows: HashMap::new(),
        by_hwnd: HashMap::new(),
        gesture: None,
        editor: None,
        notices: Vec::new(),
        ticking: false,
        all_hidden: false,
    };
    let now = Instant::now();
    let mut handles = app.ctx.load_document(&doc, now);
    if handles.is_empty() {
        let fence = Fence::new(FIRST_FENCE_TITLE, app.ctx.settings().default_rect, app.ctx.settings());
        handles.push(app.ctx.create_fence(fence, now));
    }
    info!("Loaded {} fences", handles.len());
    APP.with(|cell| *cell.borrow_mut() = Some(app));

    with_app(|app| {
        for handle in handles {
            if let Err(e) = app.open_window(handle) {
                error!("Cannot open fence window: {}", e);
            }
        }
        app.arm();
    });

    unsafe {
        if RegisterHotKey(controller, HOTKEY_TOGGLE_ALL, MOD_CONTROL | MOD_ALT | MOD_NOREPEAT, VK_F).is_err() {
            warn!("Ctrl+Alt+F is taken; show/hide all fences is unavailable");
        }
        let mut msg = MSG::default();
        while GetMessageW(&mut msg, HWND::default(), 0, 0).into() {
            let _ = TranslateMessage(&msg);
            DispatchMessageW(&msg);
        }
        let _ = UnregisterHotKey(controller, HOTKEY_TOGGLE_ALL);
    }

    with_app(App::shutdown);
    APP.with(|cell| cell.borrow_mut().take());
    info!("Fence Desktop stopped");
    Ok(())
}

/// Messages for a fence window that need the application state.
pub(crate) fn fence_message(hwnd: HWND, msg: u32, wparam: WPARAM, lparam: LPARAM) -> Option<LRESULT> {
    if msg == WM_RBUTTONUP {
        context_menu(hwnd, fw::point_from_lparam(lparam));
        flush_notices();
        return Some(LRESULT(0));
    }
    let result = with_app(|app| {
        let handle = *app.by_hwnd.get(&key(hwnd))?;
        app.on_fence_message(hwnd, handle, msg, wparam, lparam)
    })
    .flatten();
    flush_notices();
    result
}

pub(crate) fn controller_message(hwnd: HWND, msg: u32, wparam: WPARAM, lparam: LPARAM) -> Option<LRESULT> {
    match msg {
        WM_DESTROY => {
            unsafe { PostQuitMessage(0) };
            Some(LRESULT(0))
        }
        WM_APP_SHOW_DESKTOP | WM_APP_FINISH_EDIT | WM_TIMER | WM_HOTKEY | WM_ENDSESSION => {
            let result = with_app(|app| app.on_controller_message(hwnd, msg, wparam, lparam));
            flush_notices();
            result
        }
        _ => None,
    }
}

/// Right-click menu for a fence. The menu loop runs outside the state borrow.
fn context_menu(hwnd: HWND, local: Point) {
    let Some(target) = with_app(|app| app.menu_target(hwnd, local)).flatten() else {
        return;
    };
    let mut items = Vec::new();
    if target.icon.is_some() {
        items.push(MenuItem { id: menu::OPEN, label: "Open", checked: false });
        items.push(MenuItem { id: menu::REMOVE_ICON, label: "Remove from Fence", checked: false });
        items.push(MenuItem { id: 0, label: "", checked: false });
    }
    items.push(MenuItem { id: menu::NEW_FENCE, label: "New Fence", checked: false });
    items.push(MenuItem { id: menu::RENAME, label: "Rename", checked: false });
    let collapse_label = if target.collapsed { "Expand" } else { "Collapse" };
    items.push(MenuItem { id: menu::COLLAPSE, label: collapse_label, checked: false });
    items.push(MenuItem { id: menu::PIN, label: "Always on Top", checked: target.pinned });
    items.push(MenuItem { id: 0, label: "", checked: false });
    items.push(MenuItem { id: menu::DELETE_FENCE, label: "Delete Fence", checked: false });
    items.push(MenuItem { id: 0, label: "", checked: false });
    items.push(MenuItem { id: menu::EXIT, label: "Exit", checked: false });

    let Some(command) = fw::show_menu(hwnd, fw::cursor_pos(), &items) else {
        return;
    };
    if command == menu::DELETE_FENCE && !fw::confirm("Delete this fence? Its icons go back to the desktop.") {
        return;
    }
    with_app(|app| app.run_command(hwnd, command, target));
}

// ============================================================================
// Application state
// ============================================================================

impl App {
    fn hwnd_of(&self, handle: FenceHandle) -> Option<HWND> {
        self.windows.get(&handle).copied()
    }

    fn publish(&self, handle: FenceHandle) {
        if let (Some(hwnd), Some(fence)) = (self.hwnd_of(handle), self.ctx.fence(handle)) {
            fw::publish_guard(hwnd, *fence.embedding());
        }
    }

    fn open_window(&mut self, handle: FenceHandle) -> Result<()> {
        let rect = self
            .ctx
            .fence(handle)
            .map(Fence::rect)
            .ok_or_else(|| FenceError::Window(format!("no fence for {handle:?}")))?;
        let hwnd = fw::create_fence_window(rect)?;
        self.windows.insert(handle, hwnd);
        self.by_hwnd.insert(key(hwnd), handle);
        self.ctx.input_mut().backend_mut().bind(handle, hwnd);

        if let Some(fence) = self.ctx.fence_mut(handle) {
            let placement = fence.embedding_mut().embed(&Win32Shell { hwnd });
            debug!("Fence '{}' placement: {:?}", fence.title(), placement);
        }
        self.publish(handle);
        Ok(())
    }

    fn close_window(&mut self, handle: FenceHandle, fence: &Fence) {
        self.ctx.input_mut().backend_mut().unbind(handle);
        if let Some(hwnd) = self.windows.remove(&handle) {
            self.by_hwnd.remove(&key(hwnd));
            // a closing fence lets its own hide through
            fw::publish_guard(hwnd, *fence.embedding());
            fw::destroy(hwnd);
        }
    }

    fn own_windows(&self) -> Vec<WindowId> {
        let mut own: Vec<WindowId> = self.windows.values().map(|h| key(*h)).collect();
        own.push(key(self.controller));
        own
    }

    fn save(&mut self) {
        let path = self.ctx.settings().fences_file();
        match self.ctx.snapshot().save(&path) {
            Ok(()) => debug!("Saved fences to {}", path.display()),
            Err(e) => error!("{}", e),
        }
    }

    fn report(&mut self, error: FenceError) {
        warn!("{}", error);
        if error.is_user_facing() {
            self.notices.push(error.to_string());
        }
    }

    /// Keep the controller tick running while anything is time-driven.
    fn arm(&mut self) {
        let busy = self.ctx.has_timed_work() || self.ctx.save_pending();
        if busy && !self.ticking {
            fw::start_timer(self.controller, TICK_TIMER, TICK_MS);
            self.ticking = true;
        } else if !busy && self.ticking {
            fw::stop_timer(self.controller, TICK_TIMER);
            self.ticking = false;
        }
    }

    fn tick(&mut self) {
        let report = self.ctx.poll(Instant::now(), &self.locator);
        for (handle, frame) in &report.frames {
            let (Some(hwnd), Some(fence)) = (self.hwnd_of(*handle), self.ctx.fence(*handle)) else {
                continue;
            };
            fw::place(hwnd, fence.rect());
            if frame.finished {
                fw::invalidate(hwnd);
            }
        }
        if report.restores.iter().any(|o| matches!(o, RestoreOutcome::GaveUp(_))) {
            if let Some(desktop) = self.ctx.settings().desktop_dir() {
                self.locator.refresh_desktop(&desktop);
            }
        }
        if report.save_due {
            self.save();
        }
        self.arm();
    }

    fn shutdown(&mut self) {
        if let Some(editor) = self.editor.take() {
            let text = fw::editor_text(editor.edit);
            self.ctx.finish_edit(editor.fence, &text, Instant::now());
        }
        self.save();
        for handle in self.ctx.fences().handles() {
            if let Some(fence) = self.ctx.dispose_fence(handle) {
                self.close_window(handle, &fence);
            }
        }
    }

    // ------------------------------------------------------------------------
    // Controller
    // ------------------------------------------------------------------------

    fn on_controller_message(&mut self, hwnd: HWND, msg: u32, wparam: WPARAM, lparam: LPARAM) -> LRESULT {
        match msg {
            WM_APP_SHOW_DESKTOP => {
                let own = self.own_windows();
                let action = self.ctx.show_desktop(&Win32TopLevel, &own);
                debug!("Show desktop: {:?}", action);
            }
            WM_APP_FINISH_EDIT => {
                let handle = handle_from_message(wparam, lparam);
                self.finish_edit(handle, true);
            }
            WM_TIMER if wparam.0 == TICK_TIMER => self.tick(),
            WM_HOTKEY if wparam.0 as i32 == HOTKEY_TOGGLE_ALL => self.toggle_all_hidden(),
            WM_ENDSESSION if wparam.0 != 0 => self.save(),
            _ => return unsafe { DefWindowProcW(hwnd, msg, wparam, lparam) },
        }
        LRESULT(0)
    }

    fn toggle_all_hidden(&mut self) {
        self.all_hidden = !self.all_hidden;
        for handle in self.ctx.set_all_hidden(self.all_hidden) {
            self.publish(handle);
            let Some(hwnd) = self.hwnd_of(handle) else { continue };
            fw::show(hwnd, !self.all_hidden);
            if !self.all_hidden {
                if let Some(order) = self.ctx.fence(handle).and_then(|f| f.embedding().resting_z_order()) {
                    set_z_order(hwnd, order);
                }
            }
        }
        info!("Fences {}", if self.all_hidden { "hidden" } else { "shown" });
    }

    // ------------------------------------------------------------------------
    // Fence windows
    // ------------------------------------------------------------------------

    fn on_fence_message(
        &mut self,
        hwnd: HWND,
        handle: FenceHandle,
        msg: u32,
        wparam: WPARAM,
        lparam: LPARAM,
    ) -> Option<LRESULT> {
        match msg {
            WM_PAINT => self.paint(hwnd, handle),
            WM_SETCURSOR if (lparam.0 & 0xFFFF) as u32 == HTCLIENT => {
                let shape = self.cursor_for(handle);
                fw::set_cursor(shape);
                return Some(LRESULT(1));
            }
            WM_LBUTTONDOWN => self.on_button_down(hwnd, handle, fw::point_from_lparam(lparam)),
            WM_MOUSEMOVE => self.on_drag(hwnd),
            WM_LBUTTONUP => self.on_button_up(hwnd),
            WM_CAPTURECHANGED if lparam.0 != key(hwnd) => self.on_button_up(hwnd),
            WM_LBUTTONDBLCLK => self.on_double_click(handle, fw::point_from_lparam(lparam)),
            WM_DROPFILES => {
                let paths = fw::dropped_files(wparam);
                let report = self.ctx.drop_files(handle, &paths, &self.locator, Instant::now());
                for failure in report.failures {
                    self.report(failure);
                }
                fw::invalidate(hwnd);
                self.arm();
            }
            WM_COMMAND => {
                let kill = self
                    .editor
                    .as_ref()
                    .is_some_and(|e| e.fence == handle && fw::is_editor_kill_focus(wparam, lparam, e.edit));
                if !kill {
                    return None;
                }
                self.finish_edit(handle, true);
            }
            WM_APP_EDITOR_DONE => self.finish_edit(handle, wparam.0 != 0),
            WM_TIMER if wparam.0 == Z_RESET_TIMER => {
                fw::stop_timer(hwnd, Z_RESET_TIMER);
                if let Some(order) = self.ctx.fence(handle).and_then(|f| f.embedding().resting_z_order()) {
                    set_z_order(hwnd, order);
                }
            }
            _ => return None,
        }
        Some(LRESULT(0))
    }

    fn paint(&self, hwnd: HWND, handle: FenceHandle) {
        let Some(fence) = self.ctx.fence(handle) else {
            return;
        };
        let settings = self.ctx.settings();
        let model = PaintModel {
            title: fence.title(),
            rows: fence.icons().iter().map(|i| i.name.as_str()).collect(),
            collapsed: fence.is_collapsed(),
            content_visible: fence.collapse().content_visible(),
            pinned: fence.embedding().is_pinned(),
            title_height: settings.title_height,
            layout: row_layout(settings),
        };
        fw::paint(hwnd, &model);
    }

    fn local_of(&self, handle: FenceHandle, screen: Point) -> Option<(Point, Size, bool)> {
        let fence = self.ctx.fence(handle)?;
        let rect = fence.rect();
        Some((
            Point::new(screen.x - rect.x, screen.y - rect.y),
            Size::new(rect.width, rect.height),
            fence.is_collapsed(),
        ))
    }

    fn cursor_for(&self, handle: FenceHandle) -> ResizeCursor {
        match &self.gesture {
            Some(Gesture::Resize { edges, .. }) => return ResizeCursor::from(*edges),
            Some(_) => return ResizeCursor::Arrow,
            None => {}
        }
        let Some((local, size, collapsed)) = self.local_of(handle, fw::cursor_pos()) else {
            return ResizeCursor::Arrow;
        };
        ResizeCursor::from(hit_test_edges(local, size, collapsed, self.ctx.settings().resize_border))
    }

    fn on_button_down(&mut self, hwnd: HWND, handle: FenceHandle, local: Point) {
        let border = self.ctx.settings().resize_border;
        let title_height = self.ctx.settings().title_height;
        let rows = row_layout(self.ctx.settings());
        let Some(fence) = self.ctx.fence(handle) else {
            return;
        };
        let start = fence.rect();
        let grab = fw::cursor_pos();
        let edges = hit_test_edges(local, Size::new(start.width, start.height), fence.is_collapsed(), border);
        let icon = if fence.collapse().content_visible() {
            rows.row_at(local.y, fence.icons().len()).map(|row| fence.icons()[row].path.clone())
        } else {
            None
        };

        let gesture = if !edges.is_none() {
            Some(Gesture::Resize { fence: handle, edges, grab, start })
        } else if local.y < title_height {
            if local.x >= start.width - COLLAPSE_BUTTON_WIDTH {
                self.ctx.toggle_collapsed(handle, Instant::now());
                self.arm();
                None
            } else {
                Some(Gesture::Move { fence: handle, grab, start })
            }
        } else {
            icon.map(|path| Gesture::Icon { fence: handle, path, grab, dragging: false })
        };

        if gesture.is_some() {
            self.gesture = gesture;
            fw::capture(hwnd);
        }
    }

    fn on_drag(&mut self, hwnd: HWND) {
        let cursor = fw::cursor_pos();
        let now = Instant::now();
        let threshold = self.ctx.settings().snap_threshold;
        let min_width = self.ctx.settings().min_width;
        let next = match &mut self.gesture {
            None => return,
            Some(Gesture::Icon { grab, dragging, .. }) => {
                if !*dragging
                    && ((cursor.x - grab.x).abs() > DRAG_START_DISTANCE || (cursor.y - grab.y).abs() > DRAG_START_DISTANCE)
                {
                    *dragging = true;
                }
                return;
            }
            Some(Gesture::Move { fence, grab, start }) => {
                let moved = start.translated(cursor.x - grab.x, cursor.y - grab.y);
                (*fence, snap_move(moved, &self.ctx.snap_candidates(*fence), threshold))
            }
            Some(Gesture::Resize { fence, edges, grab, start }) => {
                let Some(min) = self.ctx.fence(*fence).map(|f| f.min_size(min_width)) else {
                    return;
                };
                let delta = Point::new(cursor.x - grab.x, cursor.y - grab.y);
                let resized = apply_resize(*start, *edges, delta, min);
                (*fence, snap_resize(resized, *edges, &self.ctx.snap_candidates(*fence), threshold, min))
            }
        };
        let (handle, rect) = next;
        self.ctx.set_rect(handle, rect, now);
        fw::place(hwnd, rect);
        self.arm();
    }

    fn on_button_up(&mut self, hwnd: HWND) {
        let Some(gesture) = self.gesture.take() else {
            return;
        };
        fw::release_capture();
        let now = Instant::now();
        match gesture {
            Gesture::Move { fence, .. } | Gesture::Resize { fence, .. } => {
                let Some(rect) = self.ctx.fence(fence).map(Fence::rect) else {
                    return;
                };
                let clamped = clamp_to_work_area(rect, fw::work_area(hwnd));
                if clamped != rect {
                    self.ctx.set_rect(fence, clamped, now);
                    fw::place(hwnd, clamped);
                }
                fw::invalidate(hwnd);
            }
            Gesture::Icon { dragging: false, .. } => {}
            Gesture::Icon { fence, path, dragging: true, .. } => self.drop_icon(fence, &path, now),
        }
        self.arm();
    }

    /// An icon drag ended: reorder within the fence, move it to another
    /// fence, or send it back to the desktop.
    fn drop_icon(&mut self, fence: FenceHandle, path: &Path, now: Instant) {
        let cursor = fw::cursor_pos();
        let under = fw::root_window_at(cursor);
        match self.by_hwnd.get(&key(under)).copied() {
            Some(target) if target == fence => {
                let Some(f) = self.ctx.fence(fence) else { return };
                let local_y = cursor.y - f.rect().y;
                let slot = row_layout(self.ctx.settings()).insert_slot(local_y, f.icons().len());
                self.ctx.reorder_icon(fence, path, slot, now);
            }
            Some(target) => {
                if let Err(e) = self.ctx.move_icon(fence, target, path, now) {
                    self.report(e);
                }
                if let Some(hwnd) = self.hwnd_of(target) {
                    fw::invalidate(hwnd);
                }
            }
            None if fw::is_desktop_window(under) => {
                if let Err(e) = self.ctx.remove_icon(fence, path, &self.locator, now) {
                    self.report(e);
                }
            }
            None => debug!("Icon dropped outside any fence or the desktop"),
        }
        if let Some(hwnd) = self.hwnd_of(fence) {
            fw::invalidate(hwnd);
        }
    }

    fn on_double_click(&mut self, handle: FenceHandle, local: Point) {
        let title_height = self.ctx.settings().title_height;
        let rows = row_layout(self.ctx.settings());
        let Some(fence) = self.ctx.fence(handle) else {
            return;
        };
        if local.y < title_height {
            if local.x < fence.rect().width - COLLAPSE_BUTTON_WIDTH {
                self.begin_edit(handle);
            }
            return;
        }
        if fence.collapse().content_visible() {
            if let Some(row) = rows.row_at(local.y, fence.icons().len()) {
                fw::open_file(&fence.icons()[row].path);
            }
        }
    }

    // ------------------------------------------------------------------------
    // Title editing
    // ------------------------------------------------------------------------

    fn begin_edit(&mut self, handle: FenceHandle) {
        let Some(hwnd) = self.hwnd_of(handle) else { return };
        if !self.ctx.begin_edit(handle) {
            debug!("Another fence is being renamed");
            return;
        }
        let title_height = self.ctx.settings().title_height;
        let Some(fence) = self.ctx.fence(handle) else { return };
        match fw::open_title_editor(hwnd, fence.rect().width, title_height, fence.title()) {
            Ok(edit) => self.editor = Some(Editor { fence: handle, edit }),
            Err(e) => {
                warn!("{}", e);
                self.ctx.cancel_edit(handle);
            }
        }
    }

    fn finish_edit(&mut self, handle: FenceHandle, commit: bool) {
        if self.editor.as_ref().map(|e| e.fence) != Some(handle) {
            return;
        }
        let Some(editor) = self.editor.take() else { return };
        let text = fw::editor_text(editor.edit);
        let now = Instant::now();
        if commit {
            self.ctx.finish_edit(handle, &text, now);
        } else {
            self.ctx.cancel_edit(handle);
        }
        fw::destroy(editor.edit);

        if let Some(hwnd) = self.hwnd_of(handle) {
            let delay = self.ctx.settings().zorder_reset_delay_ms as u32;
            fw::start_timer(hwnd, Z_RESET_TIMER, delay.max(1));
            fw::invalidate(hwnd);
        }
        self.arm();
    }

    // ------------------------------------------------------------------------
    // Menu commands
    // ------------------------------------------------------------------------

    fn menu_target(&self, hwnd: HWND, local: Point) -> Option<MenuTarget> {
        let handle = *self.by_hwnd.get(&key(hwnd))?;
        let fence = self.ctx.fence(handle)?;
        let icon = fence
            .collapse()
            .content_visible()
            .then(|| row_layout(self.ctx.settings()).row_at(local.y, fence.icons().len()))
            .flatten()
            .map(|row| fence.icons()[row].path.clone());
        Some(MenuTarget {
            fence: handle,
            icon,
            collapsed: fence.is_collapsed(),
            pinned: fence.embedding().is_pinned(),
        })
    }

    fn run_command(&mut self, hwnd: HWND, command: u32, target: MenuTarget) {
        let now = Instant::now();
        let handle = target.fence;
        match command {
            menu::OPEN => {
                if let Some(path) = &target.icon {
                    fw::open_file(path);
                }
            }
            menu::REMOVE_ICON => {
                if let Some(path) = &target.icon {
                    if let Err(e) = self.ctx.remove_icon(handle, path, &self.locator, now) {
                        self.report(e);
                    }
                    fw::invalidate(hwnd);
                }
            }
            menu::NEW_FENCE => {
                let pos = self.ctx.new_fence_position(fw::work_area(hwnd));
                let size = self.ctx.settings().default_rect;
                let rect = Rect::new(pos.x, pos.y, size.width, size.height);
                let fence = Fence::new(DEFAULT_TITLE, rect, self.ctx.settings());
                let created = self.ctx.create_fence(fence, now);
                if let Err(e) = self.open_window(created) {
                    error!("Cannot open fence window: {}", e);
                }
            }
            menu::RENAME => self.begin_edit(handle),
            menu::COLLAPSE => {
                self.ctx.set_collapsed(handle, !target.collapsed, now);
            }
            menu::PIN => {
                if let Some(order) = self.ctx.set_pinned(handle, !target.pinned, now) {
                    self.publish(handle);
                    set_z_order(hwnd, order);
                    fw::invalidate(hwnd);
                }
            }
            menu::DELETE_FENCE => self.delete_fence(handle),
            menu::EXIT => fw::destroy(self.controller),
            other => debug!("Unknown menu command {}", other),
        }
        self.arm();
    }

    fn delete_fence(&mut self, handle: FenceHandle) {
        if self.editor.as_ref().is_some_and(|e| e.fence == handle) {
            if let Some(editor) = self.editor.take() {
                fw::destroy(editor.edit);
            }
        }
        let Some((fence, failures)) = self.ctx.destroy_fence(handle, &self.locator, Instant::now()) else {
            return;
        };
        for failure in failures {
            self.report(failure);
        }
        self.close_window(handle, &fence);
    }
}
