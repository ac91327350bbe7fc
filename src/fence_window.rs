//! Win32 fence and controller windows.
//!
//! Fence windows are borderless `WS_POPUP` tool windows that never activate.
//! The ordering, activation and show/hide messages are answered here from a
//! per-window copy of the fence's [`EmbeddingController`], so they can be
//! handled even while the application state is busy (those messages arrive
//! re-entrantly from inside `SetWindowPos` and `ShowWindow`). Everything else
//! is forwarded to [`crate::app`].

use std::cell::RefCell;
use std::collections::HashMap;
use std::ffi::c_void;
use std::os::windows::ffi::OsStrExt;
use std::path::{Path, PathBuf};

use log::{debug, warn};
use windows::core::{w, PCWSTR};
use windows::Win32::Foundation::{COLORREF, HINSTANCE, HWND, LPARAM, LRESULT, POINT, RECT, WPARAM};
use windows::Win32::Graphics::Gdi::*;
use windows::Win32::System::LibraryLoader::GetModuleHandleW;
use windows::Win32::UI::Input::KeyboardAndMouse::{ReleaseCapture, SetCapture, SetFocus, VK_ESCAPE, VK_RETURN};
use windows::Win32::UI::Shell::{
    DefSubclassProc, DragAcceptFiles, DragFinish, DragQueryFileW, RemoveWindowSubclass, SetWindowSubclass,
    ShellExecuteW, HDROP,
};
use windows::Win32::UI::WindowsAndMessaging::*;

use crate::embedding::win32::{read_request, write_request};
use crate::embedding::{EmbeddingController, MessageReply, ShowDecision};
use crate::error::{FenceError, Result};
use crate::geometry::{Point, Rect, ResizeCursor, RowLayout};

const FENCE_CLASS: PCWSTR = w!("FenceDesktopFence");
const CONTROLLER_CLASS: PCWSTR = w!("FenceDesktopController");

/// Posted to a fence after it refused a hide, to show itself again.
const WM_APP_RESHOW: u32 = WM_APP + 10;
/// Posted by the title editor: `wParam` is 1 for Enter, 0 for Escape.
pub const WM_APP_EDITOR_DONE: u32 = WM_APP + 11;

/// One-shot timer re-asserting Z-order after a title edit.
pub const Z_RESET_TIMER: usize = 2;

const EDITOR_SUBCLASS_ID: usize = 1;
const EN_KILLFOCUS_CODE: u32 = 0x0200;
const ES_AUTOHSCROLL_STYLE: u32 = 0x0080;
const DLGC_WANTALLKEYS_CODE: isize = 0x0004;
const FENCE_ALPHA: u8 = 225;

/// Width of the collapse toggle at the right end of the title band.
pub const COLLAPSE_BUTTON_WIDTH: i32 = 28;

thread_local! {
    static GUARDS: RefCell<HashMap<isize, EmbeddingController>> = RefCell::new(HashMap::new());
}

pub(crate) fn key(hwnd: HWND) -> isize {
    hwnd.0 as isize
}

/// Publish the embedding state the window procedure answers from.
pub fn publish_guard(hwnd: HWND, controller: EmbeddingController) {
    GUARDS.with_borrow_mut(|g| g.insert(key(hwnd), controller));
}

fn guard_of(hwnd: HWND) -> Option<EmbeddingController> {
    GUARDS.with_borrow(|g| g.get(&key(hwnd)).copied())
}

fn forget_guard(hwnd: HWND) {
    GUARDS.with_borrow_mut(|g| g.remove(&key(hwnd)));
}

fn wide(text: &str) -> Vec<u16> {
    text.encode_utf16().chain(std::iter::once(0)).collect()
}

fn wide_path(path: &Path) -> Vec<u16> {
    path.as_os_str().encode_wide().chain(std::iter::once(0)).collect()
}

fn instance() -> Result<HINSTANCE> {
    unsafe { GetModuleHandleW(None) }
        .map(Into::into)
        .map_err(|e| FenceError::Window(format!("GetModuleHandleW: {e}")))
}

// ============================================================================
// Classes and creation
// ============================================================================

pub fn register_classes() -> Result<()> {
    let hinstance = instance()?;
    unsafe {
        let cursor = LoadCursorW(None, IDC_ARROW).unwrap_or_default();
        let fence = WNDCLASSEXW {
            cbSize: std::mem::size_of::<WNDCLASSEXW>() as u32,
            style: CS_DBLCLKS | CS_HREDRAW | CS_VREDRAW,
            lpfnWndProc: Some(fence_proc),
            hInstance: hinstance,
            hCursor: cursor,
            lpszClassName: FENCE_CLASS,
            ..Default::default()
        };
        if RegisterClassExW(&fence) == 0 {
            return Err(FenceError::Window("cannot register fence class".into()));
        }
        let controller = WNDCLASSEXW {
            cbSize: std::mem::size_of::<WNDCLASSEXW>() as u32,
            lpfnWndProc: Some(controller_proc),
            hInstance: hinstance,
            lpszClassName: CONTROLLER_CLASS,
            ..Default::default()
        };
        if RegisterClassExW(&controller) == 0 {
            return Err(FenceError::Window("cannot register controller class".into()));
        }
    }
    Ok(())
}

/// Hidden top-level window that receives hook notifications, timers and
/// session messages.
pub fn create_controller() -> Result<HWND> {
    let hinstance = instance()?;
    unsafe {
        CreateWindowExW(
            WS_EX_TOOLWINDOW,
            CONTROLLER_CLASS,
            w!("Fence Desktop"),
            WS_POPUP,
            0,
            0,
            0,
            0,
            HWND::default(),
            HMENU::default(),
            hinstance,
            None,
        )
    }
    .map_err(|e| FenceError::Window(format!("controller window: {e}")))
}

/// Create a hidden fence window. Showing it is left to embedding, which
/// first moves it into the desktop layer.
pub fn create_fence_window(rect: Rect) -> Result<HWND> {
    let hinstance = instance()?;
    let hwnd = unsafe {
        CreateWindowExW(
            WS_EX_TOOLWINDOW | WS_EX_NOACTIVATE | WS_EX_LAYERED | WS_EX_ACCEPTFILES,
            FENCE_CLASS,
            w!("Fence"),
            WS_POPUP | WS_CLIPCHILDREN,
            rect.x,
            rect.y,
            rect.width,
            rect.height,
            HWND::default(),
            HMENU::default(),
            hinstance,
            None,
        )
    }
    .map_err(|e| FenceError::Window(format!("fence window: {e}")))?;

    unsafe {
        let _ = SetLayeredWindowAttributes(hwnd, COLORREF(0), FENCE_ALPHA, LWA_ALPHA);
        DragAcceptFiles(hwnd, true);
    }
    debug!("Created fence window {:?} at {:?}", hwnd, rect);
    Ok(hwnd)
}

pub fn destroy(hwnd: HWND) {
    unsafe {
        let _ = DestroyWindow(hwnd);
    }
}

// ============================================================================
// Window procedures
// ============================================================================

/// Messages answered from the published embedding state alone.
unsafe fn guard_message(hwnd: HWND, msg: u32, wparam: WPARAM, lparam: LPARAM) -> Option<LRESULT> {
    let guard = guard_of(hwnd)?;
    let reply = match msg {
        WM_WINDOWPOSCHANGING => {
            let pos = &mut *(lparam.0 as *mut WINDOWPOS);
            let before = read_request(pos);
            let after = guard.on_position_changing(before);
            write_request(pos, before, after);
            return None;
        }
        WM_MOUSEACTIVATE => guard.on_mouse_activate(),
        WM_NCACTIVATE => guard.on_nc_activate(wparam.0 != 0),
        WM_SYSCOMMAND => guard.on_sys_command(wparam.0),
        WM_SHOWWINDOW => {
            if guard.on_show_window(wparam.0 != 0) == ShowDecision::Reshow {
                debug!("Refused to hide fence window {:?}", hwnd);
                let _ = PostMessageW(hwnd, WM_APP_RESHOW, WPARAM(0), LPARAM(0));
            }
            return None;
        }
        _ => return None,
    };
    match reply {
        MessageReply::Handled(value) => Some(LRESULT(value)),
        MessageReply::PassThrough => None,
    }
}

unsafe extern "system" fn fence_proc(hwnd: HWND, msg: u32, wparam: WPARAM, lparam: LPARAM) -> LRESULT {
    if let Some(reply) = guard_message(hwnd, msg, wparam, lparam) {
        return reply;
    }
    match msg {
        WM_APP_RESHOW => {
            let _ = ShowWindow(hwnd, SW_SHOWNOACTIVATE);
            return LRESULT(0);
        }
        WM_ERASEBKGND => return LRESULT(1),
        WM_NCDESTROY => forget_guard(hwnd),
        _ => {}
    }
    if let Some(result) = crate::app::fence_message(hwnd, msg, wparam, lparam) {
        return result;
    }
    DefWindowProcW(hwnd, msg, wparam, lparam)
}

unsafe extern "system" fn controller_proc(hwnd: HWND, msg: u32, wparam: WPARAM, lparam: LPARAM) -> LRESULT {
    if let Some(result) = crate::app::controller_message(hwnd, msg, wparam, lparam) {
        return result;
    }
    DefWindowProcW(hwnd, msg, wparam, lparam)
}

// ============================================================================
// Geometry helpers
// ============================================================================

pub fn place(hwnd: HWND, rect: Rect) {
    unsafe {
        let _ = SetWindowPos(
            hwnd,
            HWND::default(),
            rect.x,
            rect.y,
            rect.width,
            rect.height,
            SWP_NOZORDER | SWP_NOACTIVATE,
        );
    }
}

pub fn show(hwnd: HWND, visible: bool) {
    unsafe {
        let _ = ShowWindow(hwnd, if visible { SW_SHOWNOACTIVATE } else { SW_HIDE });
    }
}

pub fn invalidate(hwnd: HWND) {
    unsafe {
        let _ = InvalidateRect(hwnd, None, true);
    }
}

/// Work area of the monitor the window is on.
pub fn work_area(hwnd: HWND) -> Rect {
    unsafe {
        let monitor = MonitorFromWindow(hwnd, MONITOR_DEFAULTTONEAREST);
        let mut info = MONITORINFO { cbSize: std::mem::size_of::<MONITORINFO>() as u32, ..Default::default() };
        if GetMonitorInfoW(monitor, &mut info).as_bool() {
            let r = info.rcWork;
            return Rect::from_edges(r.left, r.top, r.right, r.bottom);
        }
    }
    unsafe { Rect::new(0, 0, GetSystemMetrics(SM_CXSCREEN), GetSystemMetrics(SM_CYSCREEN)) }
}

pub fn cursor_pos() -> Point {
    let mut pt = POINT::default();
    unsafe {
        let _ = GetCursorPos(&mut pt);
    }
    Point::new(pt.x, pt.y)
}

/// Client coordinates packed in a mouse message's `lParam`.
pub fn point_from_lparam(lparam: LPARAM) -> Point {
    let x = (lparam.0 & 0xFFFF) as u16 as i16 as i32;
    let y = ((lparam.0 >> 16) & 0xFFFF) as u16 as i16 as i32;
    Point::new(x, y)
}

/// Top-level window under a screen point.
pub fn root_window_at(point: Point) -> HWND {
    unsafe {
        let hwnd = WindowFromPoint(POINT { x: point.x, y: point.y });
        GetAncestor(hwnd, GA_ROOT)
    }
}

/// Whether `hwnd` belongs to the shell's desktop (wallpaper or icon layer).
pub fn is_desktop_window(hwnd: HWND) -> bool {
    let mut buf = [0u16; 64];
    let len = unsafe { GetClassNameW(hwnd, &mut buf) };
    let class = String::from_utf16_lossy(&buf[..len.max(0) as usize]);
    class == "Progman" || class == "WorkerW"
}

pub fn set_cursor(shape: ResizeCursor) {
    let id = match shape {
        ResizeCursor::Arrow => IDC_ARROW,
        ResizeCursor::Horizontal => IDC_SIZEWE,
        ResizeCursor::Vertical => IDC_SIZENS,
        ResizeCursor::DiagonalMain => IDC_SIZENWSE,
        ResizeCursor::DiagonalAnti => IDC_SIZENESW,
    };
    unsafe {
        if let Ok(cursor) = LoadCursorW(None, id) {
            SetCursor(cursor);
        }
    }
}

pub fn capture(hwnd: HWND) {
    unsafe {
        SetCapture(hwnd);
    }
}

pub fn release_capture() {
    unsafe {
        let _ = ReleaseCapture();
    }
}

pub fn start_timer(hwnd: HWND, id: usize, ms: u32) {
    unsafe {
        SetTimer(hwnd, id, ms, None);
    }
}

pub fn stop_timer(hwnd: HWND, id: usize) {
    unsafe {
        let _ = KillTimer(hwnd, id);
    }
}

// ============================================================================
// Painting
// ============================================================================

/// What a fence window shows. Only plain text on a translucent background.
pub struct PaintModel<'a> {
    pub title: &'a str,
    pub rows: Vec<&'a str>,
    pub collapsed: bool,
    pub content_visible: bool,
    pub pinned: bool,
    pub title_height: i32,
    pub layout: RowLayout,
}

fn rgb(r: u8, g: u8, b: u8) -> COLORREF {
    COLORREF(u32::from(r) | (u32::from(g) << 8) | (u32::from(b) << 16))
}

fn fill(hdc: HDC, rect: RECT, color: COLORREF) {
    unsafe {
        let brush = CreateSolidBrush(color);
        FillRect(hdc, &rect, brush);
        let _ = DeleteObject(brush);
    }
}

fn draw_text(hdc: HDC, text: &str, mut rect: RECT, format: DRAW_TEXT_FORMAT) {
    let mut buf: Vec<u16> = text.encode_utf16().collect();
    unsafe {
        DrawTextW(hdc, &mut buf, &mut rect, format);
    }
}

pub fn paint(hwnd: HWND, model: &PaintModel<'_>) {
    unsafe {
        let mut ps = PAINTSTRUCT::default();
        let hdc = BeginPaint(hwnd, &mut ps);
        let mut client = RECT::default();
        let _ = GetClientRect(hwnd, &mut client);

        fill(hdc, client, rgb(28, 28, 30));
        let band = RECT { bottom: client.top + model.title_height, ..client };
        fill(hdc, band, if model.pinned { rgb(52, 58, 72) } else { rgb(44, 44, 48) });

        SetBkMode(hdc, TRANSPARENT);
        SetTextColor(hdc, rgb(235, 235, 235));
        let _ = SelectObject(hdc, GetStockObject(DEFAULT_GUI_FONT));

        let title = RECT { left: band.left + 10, right: band.right - COLLAPSE_BUTTON_WIDTH, ..band };
        draw_text(hdc, model.title, title, DT_SINGLELINE | DT_VCENTER | DT_END_ELLIPSIS | DT_NOPREFIX);
        let button = RECT { left: band.right - COLLAPSE_BUTTON_WIDTH, ..band };
        draw_text(hdc, if model.collapsed { "+" } else { "-" }, button, DT_SINGLELINE | DT_VCENTER | DT_CENTER);

        if model.content_visible {
            let width = client.right - client.left;
            for (i, name) in model.rows.iter().enumerate() {
                let r = model.layout.row_rect(i, width);
                if r.y >= client.bottom {
                    break;
                }
                let row = RECT { left: r.x + 12, top: r.y, right: r.right() - 8, bottom: r.bottom() };
                draw_text(hdc, name, row, DT_SINGLELINE | DT_VCENTER | DT_END_ELLIPSIS | DT_NOPREFIX);
            }
        }

        let _ = EndPaint(hwnd, &ps);
    }
}

// ============================================================================
// Title editor
// ============================================================================

unsafe extern "system" fn editor_proc(
    hwnd: HWND,
    msg: u32,
    wparam: WPARAM,
    lparam: LPARAM,
    _id: usize,
    _data: usize,
) -> LRESULT {
    match msg {
        WM_GETDLGCODE => return LRESULT(DLGC_WANTALLKEYS_CODE),
        WM_KEYDOWN if wparam.0 == VK_RETURN.0 as usize || wparam.0 == VK_ESCAPE.0 as usize => {
            let commit = usize::from(wparam.0 == VK_RETURN.0 as usize);
            if let Ok(parent) = GetParent(hwnd) {
                let _ = PostMessageW(parent, WM_APP_EDITOR_DONE, WPARAM(commit), LPARAM(0));
            }
            return LRESULT(0);
        }
        // swallow the matching characters so the control does not beep
        WM_CHAR if wparam.0 == 0x0D || wparam.0 == 0x1B => return LRESULT(0),
        WM_NCDESTROY => {
            let _ = RemoveWindowSubclass(hwnd, Some(editor_proc), EDITOR_SUBCLASS_ID);
        }
        _ => {}
    }
    DefSubclassProc(hwnd, msg, wparam, lparam)
}

/// Put a pre-filled, fully selected edit control over the title band and
/// give it keyboard focus.
pub fn open_title_editor(parent: HWND, width: i32, title_height: i32, text: &str) -> Result<HWND> {
    let hinstance = instance()?;
    let edit = unsafe {
        CreateWindowExW(
            WINDOW_EX_STYLE::default(),
            w!("EDIT"),
            PCWSTR::null(),
            WS_CHILD | WS_VISIBLE | WS_BORDER | WINDOW_STYLE(ES_AUTOHSCROLL_STYLE),
            6,
            4,
            (width - COLLAPSE_BUTTON_WIDTH - 12).max(40),
            (title_height - 8).max(16),
            parent,
            HMENU::default(),
            hinstance,
            None,
        )
    }
    .map_err(|e| FenceError::Window(format!("title editor: {e}")))?;

    let text = wide(text);
    unsafe {
        SendMessageW(edit, WM_SETFONT, WPARAM(GetStockObject(DEFAULT_GUI_FONT).0 as usize), LPARAM(1));
        let _ = SetWindowTextW(edit, PCWSTR(text.as_ptr()));
        SendMessageW(edit, EM_SETSEL, WPARAM(0), LPARAM(-1));
        let _ = SetWindowSubclass(edit, Some(editor_proc), EDITOR_SUBCLASS_ID, 0);
        // keyboard input needs the fence in the foreground for the edit's lifetime
        let _ = SetForegroundWindow(parent);
        let _ = SetFocus(edit);
    }
    Ok(edit)
}

pub fn editor_text(edit: HWND) -> String {
    unsafe {
        let len = GetWindowTextLengthW(edit).max(0) as usize;
        let mut buf = vec![0u16; len + 1];
        let copied = GetWindowTextW(edit, &mut buf).max(0) as usize;
        String::from_utf16_lossy(&buf[..copied])
    }
}

/// `WM_COMMAND` notification saying the editor lost focus.
pub fn is_editor_kill_focus(wparam: WPARAM, lparam: LPARAM, edit: HWND) -> bool {
    ((wparam.0 >> 16) & 0xFFFF) as u32 == EN_KILLFOCUS_CODE && lparam.0 == key(edit)
}

// ============================================================================
// Shell interaction
// ============================================================================

/// Paths carried by a `WM_DROPFILES` message. Releases the drop handle.
pub fn dropped_files(wparam: WPARAM) -> Vec<PathBuf> {
    let drop = HDROP(wparam.0 as *mut c_void);
    let mut paths = Vec::new();
    unsafe {
        let count = DragQueryFileW(drop, u32::MAX, None);
        for i in 0..count {
            let len = DragQueryFileW(drop, i, None) as usize;
            let mut buf = vec![0u16; len + 1];
            let copied = DragQueryFileW(drop, i, Some(&mut buf)) as usize;
            paths.push(PathBuf::from(String::from_utf16_lossy(&buf[..copied])));
        }
        DragFinish(drop);
    }
    paths
}

pub fn open_file(path: &Path) {
    let file = wide_path(path);
    let result = unsafe {
        ShellExecuteW(HWND::default(), w!("open"), PCWSTR(file.as_ptr()), PCWSTR::null(), PCWSTR::null(), SW_SHOWNORMAL)
    };
    if result.0 as isize <= 32 {
        warn!("Cannot open {}", path.display());
    }
}

/// Blocking notification for file operations the user must know about.
pub fn notify_user(text: &str) {
    let text = wide(text);
    unsafe {
        MessageBoxW(HWND::default(), PCWSTR(text.as_ptr()), w!("Fence Desktop"), MB_OK | MB_ICONWARNING | MB_TOPMOST);
    }
}

pub fn confirm(text: &str) -> bool {
    let text = wide(text);
    let answer = unsafe {
        MessageBoxW(HWND::default(), PCWSTR(text.as_ptr()), w!("Fence Desktop"), MB_YESNO | MB_ICONQUESTION | MB_TOPMOST)
    };
    answer == IDYES
}

/// An entry in a fence's context menu. `id == 0` is a separator.
pub struct MenuItem<'a> {
    pub id: u32,
    pub label: &'a str,
    pub checked: bool,
}

/// Show a context menu at a screen point and return the chosen command.
pub fn show_menu(owner: HWND, at: Point, items: &[MenuItem<'_>]) -> Option<u32> {
    unsafe {
        let menu = CreatePopupMenu().ok()?;
        for item in items {
            if item.id == 0 {
                let _ = AppendMenuW(menu, MF_SEPARATOR, 0, PCWSTR::null());
                continue;
            }
            let label = wide(item.label);
            let flags = if item.checked { MF_STRING | MF_CHECKED } else { MF_STRING };
            let _ = AppendMenuW(menu, flags, item.id as usize, PCWSTR(label.as_ptr()));
        }
        let chosen = TrackPopupMenu(menu, TPM_RETURNCMD | TPM_RIGHTBUTTON | TPM_NONOTIFY, at.x, at.y, 0, owner, None);
        let _ = DestroyMenu(menu);
        (chosen.0 > 0).then_some(chosen.0 as u32)
    }
}
