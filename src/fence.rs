//! One fence: its geometry, collapse state, embedding state, title edit and icons.

use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::{debug, info, warn};

use crate::collapse::{CollapseEngine, Frame};
use crate::desktop_icons::DesktopIconLocator;
use crate::embedding::EmbeddingController;
use crate::error::{FenceError, Result};
use crate::geometry::{Point, Rect, Size};
use crate::record::{FenceRecord, IconRecord};
use crate::settings::Settings;
use crate::storage;
use crate::title_edit::{EditOutcome, TitleEdit};

pub const DEFAULT_TITLE: &str = "New Fence";

/// Narrower or shorter saved fences are treated as corrupt and resized.
const MIN_RECORD_WIDTH: i32 = 100;
const MIN_RECORD_HEIGHT: i32 = 50;

/// A file that went back to the desktop and still needs its grid position.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingRestore {
    pub path: PathBuf,
    pub position: Option<Point>,
}

#[derive(Debug, Default)]
pub struct DropReport {
    pub added: Vec<PathBuf>,
    pub failures: Vec<FenceError>,
}

#[derive(Debug)]
pub struct Fence {
    id: String,
    title: String,
    rect: Rect,
    collapse: CollapseEngine,
    embedding: EmbeddingController,
    edit: TitleEdit,
    icons: Vec<IconRecord>,
}

impl Fence {
    pub fn new(title: &str, rect: Rect, settings: &Settings) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            title: title.to_string(),
            rect,
            collapse: CollapseEngine::new(settings.collapse_config(), rect.height),
            embedding: EmbeddingController::new(),
            edit: TitleEdit::default(),
            icons: Vec::new(),
        }
    }

    /// Rebuild a fence from its saved record, repairing what a hand-edited
    /// or older document may get wrong.
    pub fn from_record(record: &FenceRecord, settings: &Settings) -> Self {
        let id = if record.id.is_empty() { uuid::Uuid::new_v4().to_string() } else { record.id.clone() };
        let title = if record.title.is_empty() { DEFAULT_TITLE.to_string() } else { record.title.clone() };
        let default = settings.default_rect;

        let mut width = record.width.unwrap_or(default.width);
        if width < MIN_RECORD_WIDTH {
            width = default.width;
        }
        let mut height = record.height.unwrap_or(default.height);
        if height < MIN_RECORD_HEIGHT {
            height = default.height;
        }

        let config = settings.collapse_config();
        let collapse = if record.collapsed {
            let expanded = record.expanded_height.unwrap_or(settings.restored_expanded_height);
            height = config.collapsed_height;
            CollapseEngine::restored(config, true, expanded)
        } else {
            CollapseEngine::restored(config, false, height)
        };

        let mut embedding = EmbeddingController::new();
        embedding.set_pinned(record.pinned);

        let mut fence = Self {
            id,
            title,
            rect: Rect::new(record.x.unwrap_or(default.x), record.y.unwrap_or(default.y), width, height),
            collapse,
            embedding,
            edit: TitleEdit::default(),
            icons: Vec::new(),
        };

        for icon in &record.icons {
            if !icon.path.exists() {
                warn!("Dropping icon {}: file no longer exists", icon.path.display());
                continue;
            }
            fence.add_icon(icon.clone());
        }
        fence
    }

    pub fn to_record(&self) -> FenceRecord {
        FenceRecord {
            id: self.id.clone(),
            title: self.title.clone(),
            x: Some(self.rect.x),
            y: Some(self.rect.y),
            width: Some(self.rect.width),
            height: Some(self.rect.height),
            collapsed: self.collapse.is_collapsed(),
            expanded_height: Some(self.collapse.expanded_height()),
            pinned: self.embedding.is_pinned(),
            icons: self.icons.clone(),
        }
    }

    // ========================================================================
    // Accessors
    // ========================================================================

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn rect(&self) -> Rect {
        self.rect
    }

    pub fn icons(&self) -> &[IconRecord] {
        &self.icons
    }

    pub fn embedding(&self) -> &EmbeddingController {
        &self.embedding
    }

    pub fn embedding_mut(&mut self) -> &mut EmbeddingController {
        &mut self.embedding
    }

    pub fn collapse(&self) -> &CollapseEngine {
        &self.collapse
    }

    pub fn is_collapsed(&self) -> bool {
        self.collapse.is_collapsed()
    }

    pub fn is_editing_title(&self) -> bool {
        self.edit.is_editing()
    }

    /// Smallest size a resize may produce right now.
    pub fn min_size(&self, min_width: i32) -> Size {
        Size::new(min_width, self.collapse.constraints().min)
    }

    // ========================================================================
    // Geometry and collapse
    // ========================================================================

    /// Commit a new rectangle from a drag or resize.
    pub fn set_rect(&mut self, rect: Rect) {
        self.rect = rect;
        self.collapse.note_resized(rect.height);
    }

    pub fn set_collapsed(&mut self, collapsed: bool, now: Instant) -> bool {
        if collapsed {
            self.collapse.collapse(self.rect.height, now)
        } else {
            self.collapse.expand(self.rect.height, now)
        }
    }

    pub fn toggle_collapsed(&mut self, now: Instant) {
        self.collapse.toggle(self.rect.height, now);
    }

    /// Advance the collapse animation, applying the new height.
    pub fn animate(&mut self, now: Instant) -> Option<Frame> {
        let frame = self.collapse.sample(now)?;
        self.rect = self.rect.with_height(frame.height);
        Some(frame)
    }

    // ========================================================================
    // Title
    // ========================================================================

    pub fn begin_title_edit(&mut self) -> bool {
        self.edit.begin(&self.title)
    }

    /// Returns `true` when the title changed.
    pub fn commit_title_edit(&mut self, text: &str) -> bool {
        match self.edit.commit(text) {
            Some(EditOutcome::Renamed(title)) => {
                info!("Renamed fence '{}' to '{}'", self.title, title);
                self.title = title;
                true
            }
            _ => false,
        }
    }

    pub fn cancel_title_edit(&mut self) -> bool {
        self.edit.cancel().is_some()
    }

    // ========================================================================
    // Icons
    // ========================================================================

    fn icon_index(&self, path: &Path) -> Option<usize> {
        self.icons.iter().position(|i| i.path == path)
    }

    pub fn contains_icon(&self, path: &Path) -> bool {
        self.icon_index(path).is_some()
    }

    /// Append an icon. A path already in the fence is rejected.
    pub fn add_icon(&mut self, icon: IconRecord) -> bool {
        if self.contains_icon(&icon.path) {
            debug!("Icon {} already in fence", icon.path.display());
            return false;
        }
        self.icons.push(icon);
        true
    }

    /// Move an icon so it lands before the icon currently at `target`.
    /// Dropping onto its own slot or the slot after it changes nothing.
    pub fn reorder_icon(&mut self, path: &Path, target: usize) -> bool {
        let Some(from) = self.icon_index(path) else {
            return false;
        };
        if target == from || target == from + 1 {
            return false;
        }
        let icon = self.icons.remove(from);
        let to = if target > from { target - 1 } else { target };
        self.icons.insert(to.min(self.icons.len()), icon);
        true
    }

    /// Take an icon out without touching its file.
    pub fn take_icon(&mut self, path: &Path) -> Option<IconRecord> {
        self.icon_index(path).map(|i| self.icons.remove(i))
    }

    /// Accept files dropped from Explorer. Desktop files move into this
    /// fence's storage; anything else is linked where it is.
    pub fn drop_files(
        &mut self,
        paths: &[PathBuf],
        desktop_dir: Option<&Path>,
        storage_root: &Path,
        locator: &dyn DesktopIconLocator,
    ) -> DropReport {
        let mut report = DropReport::default();
        for path in paths {
            match self.drop_one(path, desktop_dir, storage_root, locator) {
                Ok(Some(added)) => report.added.push(added),
                Ok(None) => {}
                Err(e) => {
                    warn!("Skipping dropped file {}: {}", path.display(), e);
                    report.failures.push(e);
                }
            }
        }
        report
    }

    fn drop_one(
        &mut self,
        path: &Path,
        desktop_dir: Option<&Path>,
        storage_root: &Path,
        locator: &dyn DesktopIconLocator,
    ) -> Result<Option<PathBuf>> {
        let from_desktop = desktop_dir.is_some_and(|d| storage::is_desktop_file(path, d));
        if !from_desktop {
            let icon = IconRecord::linked(path.to_path_buf());
            return Ok(self.add_icon(icon).then(|| path.to_path_buf()));
        }

        let dir = storage::fence_storage_dir(storage_root, &self.id)?;
        let name = path.file_name().ok_or_else(|| FenceError::NoFileName(path.to_path_buf()))?;
        if self.contains_icon(&dir.join(name)) {
            return Err(FenceError::DuplicateIcon(dir.join(name)));
        }

        let position = locator.get_position(path);
        let stored = storage::take_from_desktop(path, &dir)?;
        locator.notify_file_removed(path);

        self.add_icon(IconRecord::from_desktop(path.to_path_buf(), stored.clone(), position));
        Ok(Some(stored))
    }

    /// Remove an icon. A desktop file goes back to the desktop first; if that
    /// move fails the icon stays.
    pub fn remove_icon(
        &mut self,
        path: &Path,
        desktop_dir: Option<&Path>,
        locator: &dyn DesktopIconLocator,
    ) -> Result<Option<PendingRestore>> {
        let Some(index) = self.icon_index(path) else {
            return Ok(None);
        };
        let icon = &self.icons[index];
        let mut pending = None;

        if icon.is_from_desktop && icon.path.exists() {
            let desktop = desktop_dir.ok_or(FenceError::NoDesktopDir)?;
            let restored = storage::return_to_desktop(&icon.path, desktop)?;
            locator.notify_file_added(&restored);
            pending = Some(PendingRestore { path: restored, position: icon.desktop_position() });
        }

        self.icons.remove(index);
        Ok(pending)
    }

    /// Return every icon, e.g. before the fence is deleted. Icons whose file
    /// could not be moved stay in the fence.
    pub fn restore_all_icons(
        &mut self,
        desktop_dir: Option<&Path>,
        locator: &dyn DesktopIconLocator,
    ) -> (Vec<PendingRestore>, Vec<FenceError>) {
        let mut restores = Vec::new();
        let mut failures = Vec::new();
        let paths: Vec<PathBuf> = self.icons.iter().map(|i| i.path.clone()).collect();
        for path in paths {
            match self.remove_icon(&path, desktop_dir, locator) {
                Ok(Some(pending)) => restores.push(pending),
                Ok(None) => {}
                Err(e) => failures.push(e),
            }
        }
        (restores, failures)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::time::Duration;

    /// Records every locator call; positions come from a fixed table.
    #[derive(Default)]
    pub(crate) struct FakeLocator {
        pub positions: Vec<(String, Point)>,
        pub removed: RefCell<Vec<PathBuf>>,
        pub added: RefCell<Vec<PathBuf>>,
        pub placed: RefCell<Vec<(PathBuf, Point)>>,
        pub never_matches: bool,
    }

    impl DesktopIconLocator for FakeLocator {
        fn get_position(&self, path: &Path) -> Option<Point> {
            let name = path.file_name()?.to_str()?;
            self.positions.iter().find(|(n, _)| n == name).map(|(_, p)| *p)
        }
        fn set_position(&self, path: &Path, position: Point) -> bool {
            if self.never_matches {
                return false;
            }
            self.placed.borrow_mut().push((path.to_path_buf(), position));
            true
        }
        fn notify_file_removed(&self, path: &Path) {
            self.removed.borrow_mut().push(path.to_path_buf());
        }
        fn notify_file_added(&self, path: &Path) {
            self.added.borrow_mut().push(path.to_path_buf());
        }
    }

    pub(crate) struct Workspace {
        pub _tmp: tempfile::TempDir,
        pub desktop: PathBuf,
        pub storage: PathBuf,
    }

    pub(crate) fn workspace() -> Workspace {
        let tmp = tempfile::tempdir().unwrap();
        let desktop = tmp.path().join("Desktop");
        let storage = tmp.path().join("fences_storage");
        std::fs::create_dir(&desktop).unwrap();
        Workspace { _tmp: tmp, desktop, storage }
    }

    fn fence() -> Fence {
        Fence::new("Work", Rect::new(100, 100, 280, 200), &Settings::default())
    }

    #[test]
    fn test_collapse_scenario() {
        let mut f = fence();
        let t0 = Instant::now();
        assert!(f.set_collapsed(true, t0));
        f.animate(t0 + Duration::from_millis(200));
        assert_eq!(f.rect(), Rect::new(100, 100, 280, 32));
        assert_eq!(f.collapse().expanded_height(), 200);

        assert!(!f.set_collapsed(true, t0));
        assert!(f.set_collapsed(false, t0));
        f.animate(t0 + Duration::from_millis(400));
        assert_eq!(f.rect().height, 200);
    }

    #[test]
    fn test_record_round_trip() {
        let ws = workspace();
        let file = ws.desktop.join("a.txt");
        std::fs::write(&file, "x").unwrap();
        let locator = FakeLocator { positions: vec![("a.txt".into(), Point::new(100, 200))], ..Default::default() };

        let mut f = fence();
        f.drop_files(&[file], Some(&ws.desktop), &ws.storage, &locator);
        let t0 = Instant::now();
        f.set_collapsed(true, t0);
        f.animate(t0 + Duration::from_secs(1));

        let record = f.to_record();
        let back = Fence::from_record(&record, &Settings::default());
        assert_eq!(back.id(), f.id());
        assert_eq!(back.title(), "Work");
        assert_eq!(back.rect(), f.rect());
        assert!(back.is_collapsed());
        assert_eq!(back.collapse().expanded_height(), 200);
        assert_eq!(back.icons(), f.icons());
        assert_eq!(back.to_record(), record);
    }

    #[test]
    fn test_from_record_repairs_bad_values() {
        let record = FenceRecord {
            id: String::new(),
            title: String::new(),
            x: None,
            y: Some(40),
            width: Some(20),
            height: Some(10),
            collapsed: false,
            expanded_height: None,
            pinned: false,
            icons: vec![IconRecord::linked(PathBuf::from("/definitely/not/here.txt"))],
        };
        let f = Fence::from_record(&record, &Settings::default());
        assert!(!f.id().is_empty());
        assert_eq!(f.title(), DEFAULT_TITLE);
        assert_eq!(f.rect(), Rect::new(100, 40, 280, 200));
        assert!(f.icons().is_empty());
        assert_eq!(f.collapse().constraints().min, 64);
    }

    #[test]
    fn test_collapsed_record_without_expanded_height() {
        let record = FenceRecord {
            id: "f".into(),
            title: "Games".into(),
            x: Some(0),
            y: Some(0),
            width: Some(300),
            height: Some(32),
            collapsed: true,
            expanded_height: None,
            pinned: false,
            icons: vec![],
        };
        let f = Fence::from_record(&record, &Settings::default());
        assert_eq!(f.rect().height, 32);
        assert_eq!(f.collapse().expanded_height(), 300);
        assert!(!f.collapse().content_visible());
        assert_eq!(f.collapse().constraints().max, 32);
    }

    #[test]
    fn test_drop_desktop_file_moves_it_and_records_position() {
        let ws = workspace();
        let file = ws.desktop.join("db.lnk");
        std::fs::write(&file, "x").unwrap();
        let locator = FakeLocator { positions: vec![("db.lnk".into(), Point::new(100, 200))], ..Default::default() };

        let mut f = fence();
        let report = f.drop_files(&[file.clone()], Some(&ws.desktop), &ws.storage, &locator);
        assert!(report.failures.is_empty());
        assert!(!file.exists());

        let icon = &f.icons()[0];
        assert!(icon.is_from_desktop);
        assert!(icon.path.starts_with(ws.storage.join(f.id())));
        assert!(icon.path.exists());
        assert_eq!(icon.name, "db");
        assert_eq!(icon.desktop_position(), Some(Point::new(100, 200)));
        assert_eq!(*locator.removed.borrow(), vec![file]);
    }

    #[test]
    fn test_drop_other_file_is_linked_in_place() {
        let ws = workspace();
        let elsewhere = ws.storage.parent().unwrap().join("doc.txt");
        std::fs::write(&elsewhere, "x").unwrap();
        let locator = FakeLocator::default();

        let mut f = fence();
        f.drop_files(&[elsewhere.clone(), elsewhere.clone()], Some(&ws.desktop), &ws.storage, &locator);
        assert_eq!(f.icons().len(), 1);
        assert_eq!(f.icons()[0].path, elsewhere);
        assert!(!f.icons()[0].is_from_desktop);
        assert!(elsewhere.exists());
    }

    #[test]
    fn test_failed_move_adds_nothing() {
        let ws = workspace();
        let missing = ws.desktop.join("ghost.txt");
        let locator = FakeLocator::default();
        let mut f = fence();
        let report = f.drop_files(&[missing], Some(&ws.desktop), &ws.storage, &locator);
        assert!(f.icons().is_empty());
        assert!(report.failures[0].is_user_facing());
        assert!(locator.removed.borrow().is_empty());
    }

    #[test]
    fn test_remove_returns_file_and_queues_position() {
        let ws = workspace();
        let file = ws.desktop.join("a.txt");
        std::fs::write(&file, "x").unwrap();
        let locator = FakeLocator { positions: vec![("a.txt".into(), Point::new(100, 200))], ..Default::default() };

        let mut f = fence();
        f.drop_files(&[file.clone()], Some(&ws.desktop), &ws.storage, &locator);
        let stored = f.icons()[0].path.clone();

        let pending = f.remove_icon(&stored, Some(&ws.desktop), &locator).unwrap();
        assert_eq!(pending, Some(PendingRestore { path: file.clone(), position: Some(Point::new(100, 200)) }));
        assert!(file.exists());
        assert!(f.icons().is_empty());
        assert_eq!(*locator.added.borrow(), vec![file]);
    }

    #[test]
    fn test_remove_keeps_icon_when_move_fails() {
        let ws = workspace();
        let file = ws.desktop.join("a.txt");
        std::fs::write(&file, "x").unwrap();
        let locator = FakeLocator::default();
        let mut f = fence();
        f.drop_files(&[file], Some(&ws.desktop), &ws.storage, &locator);
        let stored = f.icons()[0].path.clone();

        let gone = ws.desktop.join("removed-dir");
        assert!(f.remove_icon(&stored, Some(&gone), &locator).is_err());
        assert_eq!(f.icons().len(), 1);
        assert!(stored.exists());
    }

    #[test]
    fn test_reorder_icons() {
        let mut f = fence();
        for name in ["a", "b", "c", "d"] {
            f.add_icon(IconRecord::linked(PathBuf::from(format!("/x/{name}.txt"))));
        }
        let order = |f: &Fence| f.icons().iter().map(|i| i.name.clone()).collect::<Vec<_>>().join("");

        assert!(!f.reorder_icon(Path::new("/x/b.txt"), 1));
        assert!(!f.reorder_icon(Path::new("/x/b.txt"), 2));
        assert!(f.reorder_icon(Path::new("/x/a.txt"), 3));
        assert_eq!(order(&f), "bcad");
        assert!(f.reorder_icon(Path::new("/x/d.txt"), 0));
        assert_eq!(order(&f), "dbca");
        assert!(f.reorder_icon(Path::new("/x/d.txt"), 4));
        assert_eq!(order(&f), "bcad");
    }

    #[test]
    fn test_title_edit_through_fence() {
        let mut f = fence();
        assert!(f.begin_title_edit());
        assert!(!f.begin_title_edit());
        assert!(f.commit_title_edit(" Projects "));
        assert_eq!(f.title(), "Projects");
        assert!(f.begin_title_edit());
        assert!(f.cancel_title_edit());
        assert_eq!(f.title(), "Projects");
    }

    mod properties {
        use super::*;
        use proptest::collection::vec;
        use proptest::prelude::*;

        #[derive(Debug, Clone)]
        struct IconSeed {
            name: String,
            from_desktop: bool,
            position: Option<(i32, i32)>,
        }

        fn icon_strategy() -> impl Strategy<Value = IconSeed> {
            ("[a-z]{1,8}", any::<bool>(), proptest::option::of((0i32..4000, 0i32..4000)))
                .prop_map(|(name, from_desktop, position)| IconSeed { name, from_desktop, position })
        }

        /// Records as `to_record` writes them: every field present and in range.
        fn record_strategy() -> impl Strategy<Value = (FenceRecord, Vec<IconSeed>)> {
            (
                ("[a-f0-9]{8}", "[A-Za-z ]{0,12}[A-Za-z]"),
                (-4000i32..4000, -4000i32..4000, MIN_RECORD_WIDTH..3000, MIN_RECORD_HEIGHT..3000),
                (any::<bool>(), 64i32..3000, any::<bool>()),
                vec(icon_strategy(), 0..5),
            )
                .prop_map(|((id, title), (x, y, width, height), (collapsed, expanded, pinned), icons)| {
                    let record = FenceRecord {
                        id,
                        title,
                        x: Some(x),
                        y: Some(y),
                        width: Some(width),
                        height: Some(if collapsed { 32 } else { height }),
                        collapsed,
                        expanded_height: Some(if collapsed { expanded } else { height }),
                        pinned,
                        icons: Vec::new(),
                    };
                    (record, icons)
                })
        }

        proptest! {
            #[test]
            fn well_formed_record_round_trips((mut record, seeds) in record_strategy()) {
                let ws = workspace();
                for (i, seed) in seeds.iter().enumerate() {
                    let path = ws.desktop.join(format!("{i}_{}.txt", seed.name));
                    std::fs::write(&path, "x").unwrap();
                    let icon = if seed.from_desktop {
                        let stored = ws.storage.join(format!("{i}_{}.txt", seed.name));
                        IconRecord::from_desktop(path.clone(), stored.clone(), seed.position.map(|(x, y)| Point::new(x, y)))
                    } else {
                        IconRecord::linked(path.clone())
                    };
                    let icon = IconRecord { path, ..icon };
                    record.icons.push(icon);
                }

                let fence = Fence::from_record(&record, &Settings::default());
                prop_assert_eq!(fence.to_record(), record.clone());

                let json = serde_json::to_string(&record).unwrap();
                let parsed: FenceRecord = serde_json::from_str(&json).unwrap();
                prop_assert_eq!(parsed, record);
            }
        }
    }
}
