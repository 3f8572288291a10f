//! Directory walk as a stream of enter/file/exit events over walkdir's depth-first order.

use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// One event of a depth-first walk.
///
/// Every `EnterDir` is matched by an `ExitDir` after all of the directory's contents, so the
/// start directory's `ExitDir` is always the last directory event of a walk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WalkEvent {
    EnterDir(PathBuf),
    /// A non-directory entry (regular file, or symlink when links are not followed).
    File(PathBuf),
    ExitDir(PathBuf),
    /// An entry or directory listing that could not be read; the walk continues.
    Err { msg: String, path: Option<PathBuf> },
}

/// Convert a walkdir error into [`WalkEvent::Err`].
pub fn to_event_walkdir(err: walkdir::Error) -> WalkEvent {
    WalkEvent::Err {
        msg: format!("{}", err),
        path: err.path().map(PathBuf::from),
    }
}

/// Iterator of [`WalkEvent`]s rooted at one path.
pub struct WalkEvents {
    inner: walkdir::IntoIter,
    /// Open directories, innermost last, with their walk depth.
    open: Vec<(usize, PathBuf)>,
    queued: VecDeque<WalkEvent>,
    finished: bool,
}

/// Walk `root` depth-first. With `follow_links`, symlinked directories are descended into.
pub fn walk_events(root: &Path, follow_links: bool) -> WalkEvents {
    WalkEvents {
        inner: WalkDir::new(root)
            .follow_links(follow_links)
            .sort_by_file_name()
            .into_iter(),
        open: Vec::new(),
        queued: VecDeque::new(),
        finished: false,
    }
}

impl WalkEvents {
    /// Queue `ExitDir` for every open directory at `depth` or deeper.
    fn close_to(&mut self, depth: usize) {
        while self.open.last().is_some_and(|(d, _)| *d >= depth) {
            if let Some((_, dir)) = self.open.pop() {
                self.queued.push_back(WalkEvent::ExitDir(dir));
            }
        }
    }
}

impl Iterator for WalkEvents {
    type Item = WalkEvent;

    fn next(&mut self) -> Option<WalkEvent> {
        loop {
            if let Some(event) = self.queued.pop_front() {
                return Some(event);
            }
            if self.finished {
                return None;
            }
            match self.inner.next() {
                Some(Ok(entry)) => {
                    let depth = entry.depth();
                    self.close_to(depth);
                    if entry.file_type().is_dir() {
                        let path = entry.into_path();
                        self.open.push((depth, path.clone()));
                        self.queued.push_back(WalkEvent::EnterDir(path));
                    } else {
                        self.queued.push_back(WalkEvent::File(entry.into_path()));
                    }
                }
                Some(Err(err)) => {
                    // A listing error belongs to the directory at depth-1; it stays open.
                    self.close_to(err.depth() + 1);
                    self.queued.push_back(to_event_walkdir(err));
                }
                None => {
                    self.finished = true;
                    self.close_to(0);
                }
            }
        }
    }
}
