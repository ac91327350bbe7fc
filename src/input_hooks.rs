//! Process-wide low-level input hooks.
//!
//! Two channels:
//! - keyboard: installed while at least one fence exists; takes over the
//!   Win+D "show desktop" chord so fences stay on screen.
//! - mouse: installed only while a fence title is being edited; a press
//!   outside that fence asks it to finish editing.
//!
//! Hook callbacks never touch fence state. They inspect the event and post a
//! message to the UI thread, which resolves the [`FenceHandle`] it carries.

use tracing::{debug, info, warn};

use crate::error::Result;
use crate::geometry::{Point, Rect};
use crate::registry::FenceHandle;

/// Raw top-level window identifier (an `HWND` on Windows).
pub type WindowId = isize;

/// Virtual key code of `D`.
pub const VK_D: u32 = 0x44;

/// Win+D on key-down. Key-up and auto-repeat of the chord's release are left alone.
pub fn is_show_desktop_chord(vk_code: u32, key_down: bool, win_held: bool) -> bool {
    vk_code == VK_D && key_down && win_held
}

/// The fence whose edit should finish because of a press at `click`.
///
/// `bounds` is the edited fence's screen rectangle, or `None` when its window
/// is already gone.
pub fn edit_finish_target(editing: Option<FenceHandle>, click: Point, bounds: Option<Rect>) -> Option<FenceHandle> {
    let handle = editing?;
    let rect = bounds?;
    (!rect.contains(click)).then_some(handle)
}

// ============================================================================
// Hook installation
// ============================================================================

pub trait HookBackend {
    fn install_keyboard(&mut self) -> Result<()>;
    fn uninstall_keyboard(&mut self);
    fn install_mouse(&mut self, editing: FenceHandle) -> Result<()>;
    fn uninstall_mouse(&mut self);
}

#[derive(Debug)]
pub struct InputInterceptor<B: HookBackend> {
    backend: B,
    live_fences: usize,
    keyboard_installed: bool,
    editing: Option<FenceHandle>,
    mouse_installed: bool,
    show_desktop: ShowDesktopToggle,
}

impl<B: HookBackend> InputInterceptor<B> {
    pub fn new(backend: B) -> Self {
        Self {
            backend,
            live_fences: 0,
            keyboard_installed: false,
            editing: None,
            mouse_installed: false,
            show_desktop: ShowDesktopToggle::default(),
        }
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn backend_mut(&mut self) -> &mut B {
        &mut self.backend
    }

    pub fn keyboard_installed(&self) -> bool {
        self.keyboard_installed
    }

    pub fn mouse_installed(&self) -> bool {
        self.mouse_installed
    }

    pub fn editing(&self) -> Option<FenceHandle> {
        self.editing
    }

    /// Count a new fence. The first one installs the keyboard hook.
    pub fn fence_created(&mut self) {
        self.live_fences += 1;
        if self.live_fences == 1 && !self.keyboard_installed {
            match self.backend.install_keyboard() {
                Ok(()) => {
                    self.keyboard_installed = true;
                    info!("Keyboard hook installed");
                }
                Err(e) => warn!("{}; Win+D keeps its default behaviour", e),
            }
        }
    }

    /// Count a destroyed fence. The last one removes the keyboard hook.
    pub fn fence_destroyed(&mut self) {
        self.live_fences = self.live_fences.saturating_sub(1);
        if self.live_fences == 0 && self.keyboard_installed {
            self.backend.uninstall_keyboard();
            self.keyboard_installed = false;
            info!("Keyboard hook uninstalled");
        }
    }

    /// Claim the editing token. Fails when another fence holds it.
    pub fn begin_edit(&mut self, fence: FenceHandle) -> bool {
        if self.editing.is_some() {
            return false;
        }
        self.editing = Some(fence);
        match self.backend.install_mouse(fence) {
            Ok(()) => {
                self.mouse_installed = true;
                debug!("Mouse hook installed for {:?}", fence);
            }
            Err(e) => warn!("{}; only Enter or focus loss ends the edit", e),
        }
        true
    }

    /// Release the token if `fence` holds it.
    pub fn end_edit(&mut self, fence: FenceHandle) -> bool {
        if self.editing != Some(fence) {
            return false;
        }
        self.editing = None;
        if self.mouse_installed {
            self.backend.uninstall_mouse();
            self.mouse_installed = false;
            debug!("Mouse hook uninstalled");
        }
        true
    }

    /// A button went down somewhere on screen.
    pub fn on_mouse_button_down(
        &self,
        click: Point,
        bounds_of: impl Fn(FenceHandle) -> Option<Rect>,
    ) -> Option<FenceHandle> {
        let editing = self.editing?;
        edit_finish_target(Some(editing), click, bounds_of(editing))
    }

    /// Win+D was pressed.
    pub fn on_show_desktop(&mut self, windows: &impl TopLevelWindows, own: &[WindowId]) -> ShowDesktopAction {
        self.show_desktop.toggle(windows, own)
    }
}

// ============================================================================
// Show desktop
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TopLevelInfo {
    pub id: WindowId,
    pub class_name: String,
    pub visible: bool,
    pub minimized: bool,
    pub tool_window: bool,
}

/// Classes that make up the shell itself.
const SHELL_CLASSES: [&str; 4] = ["Progman", "WorkerW", "Shell_TrayWnd", "Shell_SecondaryTrayWnd"];

pub trait TopLevelWindows {
    fn enumerate(&self) -> Vec<TopLevelInfo>;
    /// The shell's desktop window, if any.
    fn shell_window(&self) -> Option<WindowId>;
    fn is_alive(&self, id: WindowId) -> bool;
    fn is_minimized(&self, id: WindowId) -> bool;
    fn minimize(&self, id: WindowId);
    fn restore(&self, id: WindowId);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShowDesktopAction {
    Minimized(usize),
    Restored(usize),
}

/// Toggle that minimizes other applications and later restores exactly the
/// windows it minimized, skipping any the user already brought back.
#[derive(Debug, Default)]
pub struct ShowDesktopToggle {
    active: bool,
    minimized: Vec<WindowId>,
}

impl ShowDesktopToggle {
    pub fn is_active(&self) -> bool {
        self.active
    }

    pub fn toggle(&mut self, windows: &impl TopLevelWindows, own: &[WindowId]) -> ShowDesktopAction {
        if self.active {
            let mut restored = 0;
            for id in self.minimized.drain(..) {
                if windows.is_alive(id) && windows.is_minimized(id) {
                    windows.restore(id);
                    restored += 1;
                }
            }
            self.active = false;
            info!("Show desktop off: restored {} windows", restored);
            return ShowDesktopAction::Restored(restored);
        }

        let shell = windows.shell_window();
        self.minimized = windows
            .enumerate()
            .into_iter()
            .filter(|w| {
                !own.contains(&w.id)
                    && Some(w.id) != shell
                    && !SHELL_CLASSES.contains(&w.class_name.as_str())
                    && w.visible
                    && !w.minimized
                    && !w.tool_window
            })
            .map(|w| w.id)
            .collect();
        for &id in &self.minimized {
            windows.minimize(id);
        }
        self.active = true;
        info!("Show desktop on: minimized {} windows", self.minimized.len());
        ShowDesktopAction::Minimized(self.minimized.len())
    }
}

// ============================================================================
// Windows: hook procedures and window enumeration
// ============================================================================

#[cfg(target_os = "windows")]
pub mod win32 {
    use super::{edit_finish_target, is_show_desktop_chord, HookBackend, TopLevelInfo, TopLevelWindows, WindowId};
    use crate::error::{FenceError, Result};
    use crate::geometry::{Point, Rect};
    use crate::registry::FenceHandle;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicIsize, Ordering};
    use std::sync::Mutex;
    use windows::Win32::Foundation::{BOOL, HWND, LPARAM, LRESULT, RECT, WPARAM};
    use windows::Win32::UI::Input::KeyboardAndMouse::{GetAsyncKeyState, VK_LWIN, VK_RWIN};
    use windows::Win32::UI::WindowsAndMessaging::*;

    /// Posted to the controller window when Win+D is pressed.
    pub const WM_APP_SHOW_DESKTOP: u32 = WM_APP + 1;
    /// Posted to the controller window with a fence handle in `wParam`/`lParam`.
    pub const WM_APP_FINISH_EDIT: u32 = WM_APP + 2;

    static NOTIFY_HWND: AtomicIsize = AtomicIsize::new(0);
    static EDIT_WATCH: Mutex<Option<(isize, FenceHandle)>> = Mutex::new(None);

    fn notify_hwnd() -> HWND {
        HWND(NOTIFY_HWND.load(Ordering::SeqCst) as *mut core::ffi::c_void)
    }

    /// Unhooks on drop.
    struct HookHandle {
        hook: HHOOK,
    }

    impl Drop for HookHandle {
        fn drop(&mut self) {
            unsafe {
                if !self.hook.is_invalid() {
                    let _ = UnhookWindowsHookEx(self.hook);
                }
            }
        }
    }

    fn key_held(vk: i32) -> bool {
        unsafe { (GetAsyncKeyState(vk) as u16 & 0x8000) != 0 }
    }

    unsafe extern "system" fn keyboard_proc(code: i32, wparam: WPARAM, lparam: LPARAM) -> LRESULT {
        if code == HC_ACTION as i32 {
            let info = &*(lparam.0 as *const KBDLLHOOKSTRUCT);
            let msg = wparam.0 as u32;
            let key_down = msg == WM_KEYDOWN || msg == WM_SYSKEYDOWN;
            let win_held = key_held(VK_LWIN.0 as i32) || key_held(VK_RWIN.0 as i32);
            if is_show_desktop_chord(info.vkCode, key_down, win_held) {
                let _ = PostMessageW(notify_hwnd(), WM_APP_SHOW_DESKTOP, WPARAM(0), LPARAM(0));
                return LRESULT(1);
            }
        }
        CallNextHookEx(HHOOK::default(), code, wparam, lparam)
    }

    unsafe extern "system" fn mouse_proc(code: i32, wparam: WPARAM, lparam: LPARAM) -> LRESULT {
        let msg = wparam.0 as u32;
        if code == HC_ACTION as i32 && (msg == WM_LBUTTONDOWN || msg == WM_RBUTTONDOWN) {
            let info = &*(lparam.0 as *const MSLLHOOKSTRUCT);
            // never block inside the hook
            let watch = EDIT_WATCH.try_lock().ok().and_then(|w| *w);
            if let Some((raw, handle)) = watch {
                let hwnd = HWND(raw as *mut core::ffi::c_void);
                let mut rect = RECT::default();
                let bounds = (IsWindow(hwnd).as_bool() && GetWindowRect(hwnd, &mut rect).is_ok())
                    .then(|| Rect::from_edges(rect.left, rect.top, rect.right, rect.bottom));
                let click = Point::new(info.pt.x, info.pt.y);
                if let Some(target) = edit_finish_target(Some(handle), click, bounds) {
                    let (index, generation) = target.to_parts();
                    let _ = PostMessageW(
                        notify_hwnd(),
                        WM_APP_FINISH_EDIT,
                        WPARAM(index as usize),
                        LPARAM(generation as isize),
                    );
                }
            }
        }
        CallNextHookEx(HHOOK::default(), code, wparam, lparam)
    }

    pub fn handle_from_message(wparam: WPARAM, lparam: LPARAM) -> FenceHandle {
        FenceHandle::from_parts(wparam.0 as u32, lparam.0 as u32)
    }

    /// Hook backend that reports to one controller window.
    pub struct Win32Hooks {
        keyboard: Option<HookHandle>,
        mouse: Option<HookHandle>,
        windows: HashMap<FenceHandle, HWND>,
    }

    impl Win32Hooks {
        pub fn new(notify: HWND) -> Self {
            NOTIFY_HWND.store(notify.0 as isize, Ordering::SeqCst);
            Self { keyboard: None, mouse: None, windows: HashMap::new() }
        }

        /// Record which window a fence lives in, for click-outside checks.
        pub fn bind(&mut self, fence: FenceHandle, hwnd: HWND) {
            self.windows.insert(fence, hwnd);
        }

        pub fn unbind(&mut self, fence: FenceHandle) {
            self.windows.remove(&fence);
        }
    }

    impl HookBackend for Win32Hooks {
        fn install_keyboard(&mut self) -> Result<()> {
            let hook = unsafe { SetWindowsHookExW(WH_KEYBOARD_LL, Some(keyboard_proc), None, 0) }
                .map_err(|_| FenceError::HookInstall("keyboard"))?;
            self.keyboard = Some(HookHandle { hook });
            Ok(())
        }

        fn uninstall_keyboard(&mut self) {
            self.keyboard = None;
        }

        fn install_mouse(&mut self, editing: FenceHandle) -> Result<()> {
            let hwnd = self
                .windows
                .get(&editing)
                .copied()
                .ok_or(FenceError::Window(format!("no window bound for {editing:?}")))?;
            if let Ok(mut watch) = EDIT_WATCH.lock() {
                *watch = Some((hwnd.0 as isize, editing));
            }
            let hook = unsafe { SetWindowsHookExW(WH_MOUSE_LL, Some(mouse_proc), None, 0) }
                .map_err(|_| FenceError::HookInstall("mouse"))?;
            self.mouse = Some(HookHandle { hook });
            Ok(())
        }

        fn uninstall_mouse(&mut self) {
            self.mouse = None;
            if let Ok(mut watch) = EDIT_WATCH.lock() {
                *watch = None;
            }
        }
    }

    /// The real top-level window list.
    pub struct Win32TopLevel;

    fn to_hwnd(id: WindowId) -> HWND {
        HWND(id as *mut core::ffi::c_void)
    }

    unsafe extern "system" fn collect_window(hwnd: HWND, lparam: LPARAM) -> BOOL {
        let out = &mut *(lparam.0 as *mut Vec<TopLevelInfo>);
        let mut class = [0u16; 256];
        let len = GetClassNameW(hwnd, &mut class);
        let class_name = String::from_utf16_lossy(&class[..len.max(0) as usize]);
        let ex_style = GetWindowLongW(hwnd, GWL_EXSTYLE) as u32;
        out.push(TopLevelInfo {
            id: hwnd.0 as WindowId,
            class_name,
            visible: IsWindowVisible(hwnd).as_bool(),
            minimized: IsIconic(hwnd).as_bool(),
            tool_window: ex_style & WS_EX_TOOLWINDOW.0 != 0,
        });
        BOOL(1)
    }

    impl TopLevelWindows for Win32TopLevel {
        fn enumerate(&self) -> Vec<TopLevelInfo> {
            let mut out: Vec<TopLevelInfo> = Vec::new();
            unsafe {
                let _ = EnumWindows(Some(collect_window), LPARAM(&mut out as *mut Vec<TopLevelInfo> as isize));
            }
            out
        }

        fn shell_window(&self) -> Option<WindowId> {
            let hwnd = unsafe { GetShellWindow() };
            (!hwnd.is_invalid()).then_some(hwnd.0 as WindowId)
        }

        fn is_alive(&self, id: WindowId) -> bool {
            unsafe { IsWindow(to_hwnd(id)).as_bool() }
        }

        fn is_minimized(&self, id: WindowId) -> bool {
            unsafe { IsIconic(to_hwnd(id)).as_bool() }
        }

        fn minimize(&self, id: WindowId) {
            unsafe {
                let _ = PostMessageW(to_hwnd(id), WM_SYSCOMMAND, WPARAM(SC_MINIMIZE as usize), LPARAM(0));
            }
        }

        fn restore(&self, id: WindowId) {
            unsafe {
                let _ = PostMessageW(to_hwnd(id), WM_SYSCOMMAND, WPARAM(SC_RESTORE as usize), LPARAM(0));
            }
        }
    }
}
