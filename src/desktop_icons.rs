//! Desktop icon positions in the shell's own list view.
//!
//! There is no public API for "where is this icon on the desktop", so the
//! Windows locator reads the shell's `SysListView32` from outside its process.
//! Everything else in the crate goes through [`DesktopIconLocator`], which
//! keeps the retry logic here testable with a fake.

use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use tracing::{debug, info};

use crate::geometry::Point;

// ============================================================================
// Locator interface
// ============================================================================

pub trait DesktopIconLocator {
    /// Grid position of the icon for `path`, if the shell lists it.
    fn get_position(&self, path: &Path) -> Option<Point>;

    /// Move the icon for `path`. Returns `false` when no item matched,
    /// typically because the shell has not indexed a new file yet.
    fn set_position(&self, path: &Path, position: Point) -> bool;

    fn notify_file_removed(&self, path: &Path);

    fn notify_file_added(&self, path: &Path);
}

/// Whether a list-view label names `path`. Desktop labels usually drop the
/// extension, so both forms match.
pub fn label_matches(label: &str, path: &Path) -> bool {
    let name = path.file_name().and_then(|n| n.to_str());
    let stem = path.file_stem().and_then(|n| n.to_str());
    Some(label) == name || Some(label) == stem
}

// ============================================================================
// Position restore with bounded retries
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RestoreJob {
    pub path: PathBuf,
    pub position: Option<Point>,
    /// Retries already spent.
    pub attempt: u32,
    due: Instant,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RestoreOutcome {
    Placed(PathBuf),
    Retrying { path: PathBuf, attempt: u32 },
    /// Out of retries; the file stays wherever the shell put it.
    GaveUp(PathBuf),
    /// No position was recorded for this icon.
    Skipped(PathBuf),
}

#[derive(Debug)]
pub struct RestoreQueue {
    jobs: Vec<RestoreJob>,
    retry_delay: Duration,
    max_retries: u32,
}

impl RestoreQueue {
    pub fn new(retry_delay: Duration, max_retries: u32) -> Self {
        Self { jobs: Vec::new(), retry_delay, max_retries }
    }

    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty()
    }

    pub fn len(&self) -> usize {
        self.jobs.len()
    }

    /// Queue a placement for a file that just returned to the desktop.
    pub fn schedule(&mut self, path: PathBuf, position: Option<Point>, due: Instant) {
        debug!("Queued icon restore for {} at {:?}", path.display(), position);
        self.jobs.push(RestoreJob { path, position, attempt: 0, due });
    }

    /// Earliest instant at which [`RestoreQueue::poll`] has work to do.
    pub fn next_due(&self) -> Option<Instant> {
        self.jobs.iter().map(|j| j.due).min()
    }

    /// Run every job that is due.
    pub fn poll(&mut self, now: Instant, locator: &dyn DesktopIconLocator) -> Vec<RestoreOutcome> {
        let mut outcomes = Vec::new();
        let mut pending = Vec::with_capacity(self.jobs.len());

        for mut job in self.jobs.drain(..) {
            if job.due > now {
                pending.push(job);
                continue;
            }
            let Some(position) = job.position else {
                outcomes.push(RestoreOutcome::Skipped(job.path));
                continue;
            };
            if locator.set_position(&job.path, position) {
                info!("Restored {} to {:?}", job.path.display(), position);
                outcomes.push(RestoreOutcome::Placed(job.path));
            } else if job.attempt < self.max_retries {
                job.attempt += 1;
                job.due = now + self.retry_delay;
                outcomes.push(RestoreOutcome::Retrying { path: job.path.clone(), attempt: job.attempt });
                pending.push(job);
            } else {
                info!("Gave up placing {}; the shell keeps its default position", job.path.display());
                outcomes.push(RestoreOutcome::GaveUp(job.path));
            }
        }

        self.jobs = pending;
        outcomes
    }
}

// ============================================================================
// Windows: cross-process list view access
// ============================================================================

#[cfg(target_os = "windows")]
pub mod win32 {
    use super::{label_matches, DesktopIconLocator};
    use crate::embedding::win32::find_desktop_list_view;
    use crate::error::{FenceError, Result};
    use crate::geometry::Point;
    use std::ffi::c_void;
    use std::os::windows::ffi::OsStrExt;
    use std::path::Path;
    use std::sync::atomic::{AtomicBool, Ordering};
    use tracing::{debug, warn};
    use windows::core::PWSTR;
    use windows::Win32::Foundation::{CloseHandle, BOOL, HANDLE, HWND, LPARAM, WPARAM};
    use windows::Win32::System::Diagnostics::Debug::{ReadProcessMemory, WriteProcessMemory};
    use windows::Win32::System::Memory::{VirtualAllocEx, VirtualFreeEx, MEM_COMMIT, MEM_RELEASE, PAGE_READWRITE};
    use windows::Win32::System::Threading::{
        GetCurrentProcess, IsWow64Process, OpenProcess, PROCESS_QUERY_INFORMATION, PROCESS_VM_OPERATION,
        PROCESS_VM_READ, PROCESS_VM_WRITE,
    };
    use windows::Win32::UI::Controls::{
        LVIF_TEXT, LVITEMW, LVM_GETITEMCOUNT, LVM_GETITEMPOSITION, LVM_GETITEMTEXTW, LVM_SETITEMPOSITION,
        LVM_UPDATE,
    };
    use windows::Win32::UI::Shell::{
        SHChangeNotify, SHCNE_CREATE, SHCNE_DELETE, SHCNE_ID, SHCNE_UPDATEDIR, SHCNF_PATHW,
    };
    use windows::Win32::UI::WindowsAndMessaging::{GetWindowThreadProcessId, SendMessageW};

    const MAX_LABEL: usize = 512;

    static ARCH_WARNED: AtomicBool = AtomicBool::new(false);

    /// A 32-bit build on 64-bit Windows cannot read Explorer's 64-bit
    /// `LVITEMW` layout.
    fn arch_compatible() -> bool {
        if cfg!(target_pointer_width = "64") {
            return true;
        }
        let mut wow64 = BOOL(0);
        unsafe {
            let _ = IsWow64Process(GetCurrentProcess(), &mut wow64);
        }
        !wow64.as_bool()
    }

    /// Owned handle to the shell process.
    pub struct RemoteProcess {
        handle: HANDLE,
    }

    impl RemoteProcess {
        pub fn open_owner_of(hwnd: HWND) -> Result<Self> {
            let mut pid = 0u32;
            unsafe {
                GetWindowThreadProcessId(hwnd, Some(&mut pid));
                let handle = OpenProcess(
                    PROCESS_VM_OPERATION | PROCESS_VM_READ | PROCESS_VM_WRITE | PROCESS_QUERY_INFORMATION,
                    false,
                    pid,
                )
                .map_err(|e| FenceError::RemoteAccess(format!("OpenProcess({pid}): {e}")))?;
                Ok(Self { handle })
            }
        }

        pub fn alloc(&self, size: usize) -> Result<RemoteBuffer<'_>> {
            let ptr = unsafe { VirtualAllocEx(self.handle, None, size, MEM_COMMIT, PAGE_READWRITE) };
            if ptr.is_null() {
                return Err(FenceError::RemoteAccess(format!("VirtualAllocEx({size}) failed")));
            }
            Ok(RemoteBuffer { process: self, ptr, size })
        }
    }

    impl Drop for RemoteProcess {
        fn drop(&mut self) {
            unsafe {
                let _ = CloseHandle(self.handle);
            }
        }
    }

    /// Memory committed inside the shell process, released on drop.
    pub struct RemoteBuffer<'a> {
        process: &'a RemoteProcess,
        ptr: *mut c_void,
        size: usize,
    }

    impl RemoteBuffer<'_> {
        pub fn address(&self) -> isize {
            self.ptr as isize
        }

        pub fn write<T: Copy>(&self, value: &T) -> Result<()> {
            let len = std::mem::size_of::<T>().min(self.size);
            unsafe {
                WriteProcessMemory(self.process.handle, self.ptr, value as *const T as *const c_void, len, None)
                    .map_err(|e| FenceError::RemoteAccess(format!("WriteProcessMemory: {e}")))
            }
        }

        pub fn read<T: Copy + Default>(&self) -> Result<T> {
            let mut value = T::default();
            let len = std::mem::size_of::<T>().min(self.size);
            unsafe {
                ReadProcessMemory(self.process.handle, self.ptr, &mut value as *mut T as *mut c_void, len, None)
                    .map_err(|e| FenceError::RemoteAccess(format!("ReadProcessMemory: {e}")))?;
            }
            Ok(value)
        }
    }

    impl Drop for RemoteBuffer<'_> {
        fn drop(&mut self) {
            unsafe {
                let _ = VirtualFreeEx(self.process.handle, self.ptr, 0, MEM_RELEASE);
            }
        }
    }

    #[derive(Clone, Copy, Default)]
    struct RemotePoint {
        x: i32,
        y: i32,
    }

    /// One enumeration pass over the desktop list view. All foreign
    /// allocations are released when the session drops.
    struct ListViewSession<'p> {
        list: HWND,
        text: RemoteBuffer<'p>,
        item: RemoteBuffer<'p>,
        point: RemoteBuffer<'p>,
    }

    impl<'p> ListViewSession<'p> {
        fn open(list: HWND, process: &'p RemoteProcess) -> Result<Self> {
            Ok(Self {
                list,
                text: process.alloc(MAX_LABEL * std::mem::size_of::<u16>())?,
                item: process.alloc(std::mem::size_of::<LVITEMW>())?,
                point: process.alloc(std::mem::size_of::<RemotePoint>())?,
            })
        }

        fn count(&self) -> usize {
            let n = unsafe { SendMessageW(self.list, LVM_GETITEMCOUNT, WPARAM(0), LPARAM(0)) };
            n.0.max(0) as usize
        }

        fn label(&self, index: usize) -> Result<String> {
            let item = LVITEMW {
                mask: LVIF_TEXT,
                iItem: index as i32,
                iSubItem: 0,
                pszText: PWSTR(self.text.address() as *mut u16),
                cchTextMax: MAX_LABEL as i32,
                ..Default::default()
            };
            self.item.write(&item)?;
            unsafe {
                SendMessageW(self.list, LVM_GETITEMTEXTW, WPARAM(index), LPARAM(self.item.address()));
            }
            let raw: [u16; MAX_LABEL] = self.text.read_array()?;
            let len = raw.iter().position(|&c| c == 0).unwrap_or(MAX_LABEL);
            Ok(String::from_utf16_lossy(&raw[..len]))
        }

        fn find(&self, path: &Path) -> Option<usize> {
            (0..self.count()).find(|&i| match self.label(i) {
                Ok(label) => label_matches(&label, path),
                Err(e) => {
                    debug!("Skipping list item {}: {}", i, e);
                    false
                }
            })
        }

        fn position(&self, index: usize) -> Option<Point> {
            let ok = unsafe {
                SendMessageW(self.list, LVM_GETITEMPOSITION, WPARAM(index), LPARAM(self.point.address()))
            };
            if ok.0 == 0 {
                return None;
            }
            let p: RemotePoint = self.point.read().ok()?;
            Some(Point::new(p.x, p.y))
        }

        fn set_position(&self, index: usize, p: Point) {
            let packed = ((p.y as u16 as isize) << 16) | (p.x as u16 as isize);
            unsafe {
                SendMessageW(self.list, LVM_SETITEMPOSITION, WPARAM(index), LPARAM(packed));
                SendMessageW(self.list, LVM_UPDATE, WPARAM(index), LPARAM(0));
            }
        }

        fn refresh_item(&self, index: usize) {
            unsafe {
                SendMessageW(self.list, LVM_UPDATE, WPARAM(index), LPARAM(0));
            }
        }
    }

    impl RemoteBuffer<'_> {
        fn read_array<const N: usize>(&self) -> Result<[u16; N]> {
            let mut out = [0u16; N];
            let len = (N * std::mem::size_of::<u16>()).min(self.size);
            unsafe {
                ReadProcessMemory(self.process.handle, self.ptr, out.as_mut_ptr() as *mut c_void, len, None)
                    .map_err(|e| FenceError::RemoteAccess(format!("ReadProcessMemory: {e}")))?;
            }
            Ok(out)
        }
    }

    fn wide(path: &Path) -> Vec<u16> {
        path.as_os_str().encode_wide().chain(std::iter::once(0)).collect()
    }

    fn notify(event: SHCNE_ID, path: &Path) {
        let w = wide(path);
        unsafe {
            SHChangeNotify(event, SHCNF_PATHW, Some(w.as_ptr() as *const c_void), None);
        }
    }

    /// Locator backed by Explorer's desktop list view.
    pub struct ShellIconLocator {
        compatible: bool,
    }

    impl Default for ShellIconLocator {
        fn default() -> Self {
            Self::new()
        }
    }

    impl ShellIconLocator {
        pub fn new() -> Self {
            let compatible = arch_compatible();
            if !compatible && !ARCH_WARNED.swap(true, Ordering::SeqCst) {
                warn!("{}", FenceError::ArchMismatch);
            }
            Self { compatible }
        }

        /// The desktop list view, or `None` when it cannot be used.
        pub fn locate(&self) -> Option<HWND> {
            if !self.compatible {
                return None;
            }
            find_desktop_list_view()
        }

        fn with_session<R>(&self, f: impl FnOnce(&ListViewSession<'_>) -> R) -> Result<R> {
            let list = self.locate().ok_or(FenceError::ShellNotFound)?;
            let process = RemoteProcess::open_owner_of(list)?;
            let session = ListViewSession::open(list, &process)?;
            Ok(f(&session))
        }

        /// Ask the shell to re-read the whole desktop folder.
        pub fn refresh_desktop(&self, desktop_dir: &Path) {
            notify(SHCNE_UPDATEDIR, desktop_dir);
        }
    }

    impl DesktopIconLocator for ShellIconLocator {
        fn get_position(&self, path: &Path) -> Option<Point> {
            let found = self.with_session(|s| s.find(path).and_then(|i| s.position(i)));
            match found {
                Ok(pos) => {
                    debug!("Icon position for {}: {:?}", path.display(), pos);
                    pos
                }
                Err(e) => {
                    warn!("Cannot read icon position for {}: {}", path.display(), e);
                    None
                }
            }
        }

        fn set_position(&self, path: &Path, position: Point) -> bool {
            let placed = self.with_session(|s| match s.find(path) {
                Some(i) => {
                    s.set_position(i, position);
                    true
                }
                None => false,
            });
            placed.unwrap_or_else(|e| {
                warn!("Cannot place icon {}: {}", path.display(), e);
                false
            })
        }

        fn notify_file_removed(&self, path: &Path) {
            if let Err(e) = self.with_session(|s| {
                if let Some(i) = s.find(path) {
                    s.refresh_item(i);
                }
            }) {
                debug!("Direct list update skipped for {}: {}", path.display(), e);
            }
            notify(SHCNE_DELETE, path);
        }

        fn notify_file_added(&self, path: &Path) {
            notify(SHCNE_CREATE, path);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;

    /// Matches only after a number of failed lookups.
    struct SlowShell {
        misses_left: RefCell<u32>,
        placed: RefCell<Vec<(PathBuf, Point)>>,
    }

    impl SlowShell {
        fn new(misses: u32) -> Self {
            Self { misses_left: RefCell::new(misses), placed: RefCell::new(Vec::new()) }
        }
    }

    impl DesktopIconLocator for SlowShell {
        fn get_position(&self, _path: &Path) -> Option<Point> {
            None
        }
        fn set_position(&self, path: &Path, position: Point) -> bool {
            let mut misses = self.misses_left.borrow_mut();
            if *misses > 0 {
                *misses -= 1;
                return false;
            }
            self.placed.borrow_mut().push((path.to_path_buf(), position));
            true
        }
        fn notify_file_removed(&self, _path: &Path) {}
        fn notify_file_added(&self, _path: &Path) {}
    }

    const RETRY: Duration = Duration::from_millis(500);

    #[test]
    fn test_label_matches_with_and_without_extension() {
        let path = Path::new("C:/Users/me/Desktop/db.lnk");
        assert!(label_matches("db.lnk", path));
        assert!(label_matches("db", path));
        assert!(!label_matches("db2", path));
    }

    #[test]
    fn test_job_waits_for_due_time() {
        let shell = SlowShell::new(0);
        let mut queue = RestoreQueue::new(RETRY, 3);
        let t0 = Instant::now();
        queue.schedule(PathBuf::from("a.txt"), Some(Point::new(100, 200)), t0 + Duration::from_millis(800));
        assert!(queue.poll(t0, &shell).is_empty());
        assert_eq!(queue.next_due(), Some(t0 + Duration::from_millis(800)));

        let out = queue.poll(t0 + Duration::from_millis(800), &shell);
        assert_eq!(out, vec![RestoreOutcome::Placed(PathBuf::from("a.txt"))]);
        assert_eq!(*shell.placed.borrow(), vec![(PathBuf::from("a.txt"), Point::new(100, 200))]);
        assert!(queue.is_empty());
    }

    #[test]
    fn test_placed_after_two_misses() {
        let shell = SlowShell::new(2);
        let mut queue = RestoreQueue::new(RETRY, 3);
        let mut now = Instant::now();
        queue.schedule(PathBuf::from("a.txt"), Some(Point::new(1, 2)), now);

        assert!(matches!(queue.poll(now, &shell)[0], RestoreOutcome::Retrying { attempt: 1, .. }));
        now += RETRY;
        assert!(matches!(queue.poll(now, &shell)[0], RestoreOutcome::Retrying { attempt: 2, .. }));
        now += RETRY;
        assert!(matches!(queue.poll(now, &shell)[0], RestoreOutcome::Placed(_)));
    }

    #[test]
    fn test_gives_up_after_three_retries() {
        let shell = SlowShell::new(u32::MAX);
        let mut queue = RestoreQueue::new(RETRY, 3);
        let mut now = Instant::now();
        queue.schedule(PathBuf::from("a.txt"), Some(Point::new(100, 200)), now);

        let mut outcomes = Vec::new();
        while !queue.is_empty() {
            outcomes.extend(queue.poll(now, &shell));
            now += RETRY;
        }
        assert_eq!(outcomes.len(), 4);
        assert_eq!(outcomes.last(), Some(&RestoreOutcome::GaveUp(PathBuf::from("a.txt"))));
        assert_eq!(*shell.misses_left.borrow(), u32::MAX - 4);
    }

    #[test]
    fn test_unknown_position_is_skipped() {
        let shell = SlowShell::new(0);
        let mut queue = RestoreQueue::new(RETRY, 3);
        let now = Instant::now();
        queue.schedule(PathBuf::from("a.txt"), None, now);
        assert_eq!(queue.poll(now, &shell), vec![RestoreOutcome::Skipped(PathBuf::from("a.txt"))]);
        assert!(shell.placed.borrow().is_empty());
    }
}
