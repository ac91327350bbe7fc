//! Process-scoped shell context: the live fences plus everything shared
//! between them (input hooks, pending icon restores, the save debouncer).
//!
//! All methods run on the UI thread. Hook callbacks only ever reach this
//! type through posted messages carrying a [`FenceHandle`].

use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::{debug, info, warn};

use crate::collapse::Frame;
use crate::debounce::SaveDebouncer;
use crate::desktop_icons::{DesktopIconLocator, RestoreOutcome, RestoreQueue};
use crate::embedding::ZOrder;
use crate::error::{FenceError, Result};
use crate::fence::{DropReport, Fence, PendingRestore};
use crate::geometry::{Point, Rect};
use crate::input_hooks::{HookBackend, InputInterceptor, ShowDesktopAction, TopLevelWindows, WindowId};
use crate::record::FenceDocument;
use crate::registry::{FenceHandle, Registry};
use crate::settings::Settings;
use crate::storage;

/// Spacing between successive new fences.
const CASCADE_STEP: i32 = 40;

/// What one [`ShellContext::poll`] pass produced.
#[derive(Debug, Default)]
pub struct PollReport {
    pub frames: Vec<(FenceHandle, Frame)>,
    pub restores: Vec<RestoreOutcome>,
    pub save_due: bool,
}

pub struct ShellContext<B: HookBackend> {
    settings: Settings,
    fences: Registry<Fence>,
    input: InputInterceptor<B>,
    restores: RestoreQueue,
    save: SaveDebouncer,
}

impl<B: HookBackend> ShellContext<B> {
    pub fn new(settings: Settings, hooks: B) -> Self {
        let restores = RestoreQueue::new(settings.retry_delay(), settings.max_retries);
        let save = SaveDebouncer::new(settings.save_debounce());
        Self { settings, fences: Registry::new(), input: InputInterceptor::new(hooks), restores, save }
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn fences(&self) -> &Registry<Fence> {
        &self.fences
    }

    pub fn fence(&self, handle: FenceHandle) -> Option<&Fence> {
        self.fences.get(handle)
    }

    pub fn fence_mut(&mut self, handle: FenceHandle) -> Option<&mut Fence> {
        self.fences.get_mut(handle)
    }

    pub fn input(&self) -> &InputInterceptor<B> {
        &self.input
    }

    pub fn input_mut(&mut self) -> &mut InputInterceptor<B> {
        &mut self.input
    }

    pub fn pending_restores(&self) -> usize {
        self.restores.len()
    }

    pub fn save_pending(&self) -> bool {
        self.save.is_pending()
    }

    /// Something persistent changed; push the save deadline back.
    pub fn mark_dirty(&mut self, now: Instant) {
        self.save.touch(now);
    }

    // ========================================================================
    // Lifecycle
    // ========================================================================

    pub fn create_fence(&mut self, fence: Fence, now: Instant) -> FenceHandle {
        info!("Fence '{}' ({}) created", fence.title(), fence.id());
        let handle = self.fences.insert(fence);
        self.input.fence_created();
        self.save.touch(now);
        handle
    }

    /// Load every fence from a saved document.
    pub fn load_document(&mut self, doc: &FenceDocument, now: Instant) -> Vec<FenceHandle> {
        let handles: Vec<FenceHandle> = doc
            .fences
            .iter()
            .map(|record| self.create_fence(Fence::from_record(record, &self.settings), now))
            .collect();
        // loading is not a change
        self.save.cancel();
        handles
    }

    pub fn snapshot(&self) -> FenceDocument {
        FenceDocument { fences: self.fences.iter().map(|(_, f)| f.to_record()).collect() }
    }

    /// Delete a fence for good. Its icons go back to the desktop first; files
    /// that could not be moved stay in fence storage and are reported.
    pub fn destroy_fence(
        &mut self,
        handle: FenceHandle,
        locator: &dyn DesktopIconLocator,
        now: Instant,
    ) -> Option<(Fence, Vec<FenceError>)> {
        let desktop = self.settings.desktop_dir();
        let fence = self.fences.get_mut(handle)?;
        fence.embedding_mut().begin_close();
        let (pending, failures) = fence.restore_all_icons(desktop.as_deref(), locator);
        if fence.is_editing_title() {
            fence.cancel_title_edit();
        }
        self.input.end_edit(handle);

        for restore in pending {
            self.queue_restore(restore, now);
        }
        let fence = self.fences.remove(handle)?;
        self.input.fence_destroyed();
        self.save.touch(now);
        info!("Fence '{}' ({}) deleted", fence.title(), fence.id());
        Some((fence, failures))
    }

    /// Close a fence at shutdown: its state is kept and its icons stay put.
    pub fn dispose_fence(&mut self, handle: FenceHandle) -> Option<Fence> {
        if let Some(fence) = self.fences.get_mut(handle) {
            fence.embedding_mut().begin_close();
        }
        self.input.end_edit(handle);
        let fence = self.fences.remove(handle)?;
        self.input.fence_destroyed();
        Some(fence)
    }

    /// Where the next new fence goes, cascading from the work area's corner.
    pub fn new_fence_position(&self, work_area: Rect) -> Point {
        let offset = CASCADE_STEP * self.fences.len() as i32;
        let span_x = (work_area.width - 400).max(1);
        let span_y = (work_area.height - 300).max(1);
        Point::new(work_area.x + 100 + offset % span_x, work_area.y + 100 + offset % span_y)
    }

    // ========================================================================
    // Title editing
    // ========================================================================

    /// Start renaming `handle`. A no-op while any fence is being edited.
    pub fn begin_edit(&mut self, handle: FenceHandle) -> bool {
        if !self.fences.contains(handle) || !self.input.begin_edit(handle) {
            return false;
        }
        match self.fences.get_mut(handle) {
            Some(fence) => fence.begin_title_edit(),
            None => false,
        }
    }

    /// Commit the edit of `handle` with `text`. Returns `true` on a rename.
    pub fn finish_edit(&mut self, handle: FenceHandle, text: &str, now: Instant) -> bool {
        self.input.end_edit(handle);
        let Some(fence) = self.fences.get_mut(handle) else {
            debug!("Finish edit for a fence that no longer exists");
            return false;
        };
        let renamed = fence.commit_title_edit(text);
        if renamed {
            self.save.touch(now);
        }
        renamed
    }

    pub fn cancel_edit(&mut self, handle: FenceHandle) -> bool {
        self.input.end_edit(handle);
        self.fences.get_mut(handle).is_some_and(|f| f.cancel_title_edit())
    }

    /// A mouse button went down at `click`; returns the fence that should
    /// finish its edit.
    pub fn on_mouse_button_down(&self, click: Point) -> Option<FenceHandle> {
        self.input.on_mouse_button_down(click, |h| self.fences.get(h).map(Fence::rect))
    }

    pub fn show_desktop(&mut self, windows: &impl TopLevelWindows, own: &[WindowId]) -> ShowDesktopAction {
        self.input.on_show_desktop(windows, own)
    }

    // ========================================================================
    // Geometry
    // ========================================================================

    /// Rectangles of every live fence except `except`.
    pub fn snap_candidates(&self, except: FenceHandle) -> Vec<Rect> {
        self.fences.iter().filter(|(h, _)| *h != except).map(|(_, f)| f.rect()).collect()
    }

    pub fn set_rect(&mut self, handle: FenceHandle, rect: Rect, now: Instant) {
        if let Some(fence) = self.fences.get_mut(handle) {
            fence.set_rect(rect);
            self.save.touch(now);
        }
    }

    pub fn set_collapsed(&mut self, handle: FenceHandle, collapsed: bool, now: Instant) -> bool {
        let changed = self.fences.get_mut(handle).is_some_and(|f| f.set_collapsed(collapsed, now));
        if changed {
            self.save.touch(now);
        }
        changed
    }

    pub fn toggle_collapsed(&mut self, handle: FenceHandle, now: Instant) {
        if let Some(fence) = self.fences.get_mut(handle) {
            fence.toggle_collapsed(now);
            self.save.touch(now);
        }
    }

    pub fn set_pinned(&mut self, handle: FenceHandle, pinned: bool, now: Instant) -> Option<ZOrder> {
        let order = self.fences.get_mut(handle)?.embedding_mut().set_pinned(pinned);
        if order.is_some() {
            self.save.touch(now);
        }
        order
    }

    /// Show or hide every fence on the user's behalf. Returns the fences
    /// whose visibility intent changed.
    pub fn set_all_hidden(&mut self, hidden: bool) -> Vec<FenceHandle> {
        self.fences
            .iter_mut()
            .filter_map(|(h, f)| {
                let embedding = f.embedding_mut();
                (embedding.is_user_hidden() != hidden).then(|| {
                    embedding.set_user_hidden(hidden);
                    h
                })
            })
            .collect()
    }

    // ========================================================================
    // Icons
    // ========================================================================

    pub fn drop_files(
        &mut self,
        handle: FenceHandle,
        paths: &[PathBuf],
        locator: &dyn DesktopIconLocator,
        now: Instant,
    ) -> DropReport {
        let desktop = self.settings.desktop_dir();
        let root = self.settings.storage_root();
        let Some(fence) = self.fences.get_mut(handle) else {
            return DropReport::default();
        };
        let report = fence.drop_files(paths, desktop.as_deref(), &root, locator);
        if !report.added.is_empty() {
            self.save.touch(now);
        }
        report
    }

    /// Remove one icon, sending a desktop file home and queueing its
    /// original grid position.
    pub fn remove_icon(
        &mut self,
        handle: FenceHandle,
        path: &Path,
        locator: &dyn DesktopIconLocator,
        now: Instant,
    ) -> Result<()> {
        let desktop = self.settings.desktop_dir();
        let Some(fence) = self.fences.get_mut(handle) else {
            return Ok(());
        };
        let pending = fence.remove_icon(path, desktop.as_deref(), locator)?;
        if let Some(restore) = pending {
            self.queue_restore(restore, now);
        }
        self.save.touch(now);
        Ok(())
    }

    pub fn reorder_icon(&mut self, handle: FenceHandle, path: &Path, target: usize, now: Instant) -> bool {
        let moved = self.fences.get_mut(handle).is_some_and(|f| f.reorder_icon(path, target));
        if moved {
            self.save.touch(now);
        }
        moved
    }

    fn queue_restore(&mut self, restore: PendingRestore, now: Instant) {
        self.restores.schedule(restore.path, restore.position, now + self.settings.restore_delay());
    }

    /// Move an icon from one fence to another. A stored desktop file follows
    /// the icon into the target's storage; a linked file stays where it is.
    pub fn move_icon(&mut self, from: FenceHandle, to: FenceHandle, path: &Path, now: Instant) -> Result<bool> {
        let root = self.settings.storage_root();
        let Some((source, target)) = self.fences.get_pair_mut(from, to) else {
            return Ok(false);
        };
        let Some(icon) = source.icons().iter().find(|i| i.path == path).cloned() else {
            return Ok(false);
        };

        let new_path = if icon.is_from_desktop {
            let dir = storage::fence_storage_dir(&root, target.id())?;
            let name = path.file_name().ok_or_else(|| FenceError::NoFileName(path.to_path_buf()))?;
            dir.join(name)
        } else {
            path.to_path_buf()
        };
        if target.contains_icon(&new_path) {
            return Err(FenceError::DuplicateIcon(new_path));
        }

        let mut icon = icon;
        if icon.is_from_desktop {
            if let Some(dir) = new_path.parent() {
                icon.path = storage::relocate(path, dir)?;
            }
        }
        source.take_icon(path);
        target.add_icon(icon);
        debug!("Moved icon {} from '{}' to '{}'", path.display(), source.title(), target.title());
        self.save.touch(now);
        Ok(true)
    }

    // ========================================================================
    // Timers
    // ========================================================================

    /// Advance animations, run due icon restores, and report whether the
    /// debounced save should happen now.
    pub fn poll(&mut self, now: Instant, locator: &dyn DesktopIconLocator) -> PollReport {
        let mut report = PollReport::default();
        let mut settled = false;
        for (handle, fence) in self.fences.iter_mut() {
            if let Some(frame) = fence.animate(now) {
                settled |= frame.finished;
                report.frames.push((handle, frame));
            }
        }
        if settled {
            self.save.touch(now);
        }
        if self.restores.next_due().is_some_and(|due| due <= now) {
            report.restores = self.restores.poll(now, locator);
            for outcome in &report.restores {
                if let RestoreOutcome::GaveUp(path) = outcome {
                    warn!("Icon {} kept the shell's default position", path.display());
                }
            }
        }
        report.save_due = self.save.poll(now);
        report
    }

    /// Whether any fence animation or icon restore is still outstanding.
    pub fn has_timed_work(&self) -> bool {
        !self.restores.is_empty() || self.fences.iter().any(|(_, f)| f.collapse().is_animating())
    }
}
