//! Candidate discovery.
//!
//! Two strategies produce the files an event visits:
//!
//! - **Index**: page through the service index, most overdue first. Used for
//!   preserve and verify when an index is configured and current.
//! - **Filesystem**: walk directories. Registration walks the data tree;
//!   every other event walks the metadata tree, so only files with a metadata
//!   document (including composite objects) are candidates.
//!
//! Candidates are produced one at a time; nothing is materialized up front.

use std::collections::VecDeque;
use std::path::PathBuf;
use std::sync::Arc;

use tracing::{debug, warn};
use vigil_db::PathPager;
use vigil_model::{time, EventKind};
use walkdir::{DirEntry, WalkDir};

use crate::context::AppContext;
use crate::error::Result;
use crate::record::FileRecord;
use crate::selector::{FileSelector, Scope, Target};
use crate::storage::StorageLocation;

type Entries = Box<dyn Iterator<Item = walkdir::Result<DirEntry>>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strategy {
    Filesystem,
    Index,
}

/// Yields the candidate files for one event over one selection.
pub struct CandidateLocator<'a> {
    ctx: &'a AppContext,
    source: Source,
}

enum Source {
    Filesystem(TreeWalker),
    Index(PathPager),
}

impl<'a> CandidateLocator<'a> {
    pub async fn new(
        ctx: &'a AppContext,
        selector: &FileSelector,
        event: EventKind,
        force: bool,
    ) -> Result<CandidateLocator<'a>> {
        if event.runs_services() {
            if let Some(driver) = ctx.index() {
                if driver.is_stale().await? {
                    warn!(
                        event = %event,
                        "Service index is stale; scanning the filesystem instead. Run `vigil reindex` to refresh it."
                    );
                } else {
                    let filter = selector.path_filter(ctx.locations())?;
                    let pager = if force {
                        PathPager::registered(driver.clone(), filter)
                    } else {
                        PathPager::stale_services(driver.clone(), filter, time::now())
                    };
                    debug!(event = %event, force, "Locating candidates from index");
                    return Ok(Self {
                        ctx,
                        source: Source::Index(pager),
                    });
                }
            }
        }

        let targets = selector.targets(ctx.locations())?;
        debug!(event = %event, targets = targets.len(), "Locating candidates from filesystem");
        Ok(Self {
            ctx,
            source: Source::Filesystem(TreeWalker::new(ctx, targets, event == EventKind::Register)),
        })
    }

    pub fn strategy(&self) -> Strategy {
        match self.source {
            Source::Filesystem(_) => Strategy::Filesystem,
            Source::Index(_) => Strategy::Index,
        }
    }

    /// Next candidate, or `None` when exhausted.
    ///
    /// An `Err` that is not fatal concerns a single path; the caller may
    /// report it and keep going.
    pub async fn next_candidate(&mut self) -> Result<Option<FileRecord>> {
        match &mut self.source {
            Source::Index(pager) => {
                let Some(path) = pager.next_path().await? else {
                    return Ok(None);
                };
                let path = PathBuf::from(path);
                let location = self.ctx.locations().location_for(&path)?;
                Ok(Some(FileRecord::new(path, location)))
            }
            Source::Filesystem(walker) => walker.next_candidate(self.ctx),
        }
    }

    /// Drain every remaining candidate path, stopping at the first error.
    pub async fn collect_paths(mut self) -> Result<Vec<PathBuf>> {
        let mut paths = Vec::new();
        while let Some(file) = self.next_candidate().await? {
            paths.push(file.path().to_path_buf());
        }
        Ok(paths)
    }
}

/// What a walked file stands for.
#[derive(Debug, Clone, Copy)]
enum WalkMode {
    /// The file itself is the candidate
    Data,
    /// The file is a metadata document; the candidate is its object
    Metadata,
}

struct ActiveWalk {
    entries: Entries,
    location: Arc<dyn StorageLocation>,
    mode: WalkMode,
}

struct TreeWalker {
    pending: VecDeque<Target>,
    active: Option<ActiveWalk>,
    register: bool,
    /// Metadata roots of every location; never walked as data
    metadata_roots: Arc<Vec<PathBuf>>,
}

impl TreeWalker {
    fn new(ctx: &AppContext, targets: Vec<Target>, register: bool) -> Self {
        let metadata_roots = ctx
            .locations()
            .all()
            .iter()
            .map(|loc| loc.metadata_path().to_path_buf())
            .collect();
        Self {
            pending: targets.into(),
            active: None,
            register,
            metadata_roots: Arc::new(metadata_roots),
        }
    }

    fn next_candidate(&mut self, ctx: &AppContext) -> Result<Option<FileRecord>> {
        loop {
            if let Some(walk) = self.active.as_mut() {
                match walk.entries.next() {
                    Some(Ok(entry)) => {
                        if !entry.file_type().is_file() {
                            continue;
                        }
                        let path = match walk.mode {
                            WalkMode::Data => entry.into_path(),
                            WalkMode::Metadata => match walk.location.path_for_metadata(entry.path()) {
                                Some(path) => path,
                                None => continue,
                            },
                        };
                        return Ok(Some(FileRecord::new(path, walk.location.clone())));
                    }
                    Some(Err(err)) => return Err(err.into()),
                    None => {
                        self.active = None;
                        continue;
                    }
                }
            }

            let Some(target) = self.pending.pop_front() else {
                return Ok(None);
            };
            match target.scope {
                Scope::Object => {
                    let location = ctx.locations().location_for(&target.path)?;
                    return Ok(Some(FileRecord::new(target.path, location)));
                }
                Scope::Tree => {
                    let location = ctx.locations().location_containing(&target.path)?;
                    if let Some(walk) = self.start_walk(&target.path, location)? {
                        self.active = Some(walk);
                    }
                }
            }
        }
    }

    fn start_walk(&self, dir: &std::path::Path, location: Arc<dyn StorageLocation>) -> Result<Option<ActiveWalk>> {
        if self.register {
            let skip = self.metadata_roots.clone();
            let entries = WalkDir::new(dir)
                .follow_links(false)
                .sort_by_file_name()
                .into_iter()
                .filter_entry(move |e| !skip.iter().any(|root| e.path().starts_with(root)));
            return Ok(Some(ActiveWalk {
                entries: Box::new(entries),
                location,
                mode: WalkMode::Data,
            }));
        }

        let metadata_dir = location.metadata_dir_for(dir)?;
        if !metadata_dir.is_dir() {
            debug!(dir = %dir.display(), "No metadata beneath directory");
            return Ok(None);
        }
        let entries = WalkDir::new(metadata_dir)
            .follow_links(false)
            .sort_by_file_name()
            .into_iter();
        Ok(Some(ActiveWalk {
            entries: Box::new(entries),
            location,
            mode: WalkMode::Metadata,
        }))
    }
}
