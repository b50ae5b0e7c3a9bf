//! Dump pipeline: parallel directory traversal feeding the residency probe
//! into a single compressed output stream.
//!
//! A pool of workers shares one [`crate::queue::Queue`] of directory
//! frames: head-push recursion, inline file handling, and an
//! `open_directories` counter that drives queue shutdown once the last
//! directory finishes draining.

use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;

use crate::codec::{self, MapWriter};
use crate::error::Result;
use crate::queue::Queue;
use crate::residency;

/// A directory-iteration context owned by one worker at a time. Created
/// on entry to a directory, consumed when `entries` is exhausted.
struct DirFrame {
    path: PathBuf,
    entries: std::fs::ReadDir,
}

pub struct DumpConfig {
    pub worker_threads: usize,
    pub page_size: u64,
    pub chunk_pages: u64,
}

impl Default for DumpConfig {
    fn default() -> Self {
        Self {
            worker_threads: num_cpus::get() * 8,
            page_size: crate::page_size(),
            chunk_pages: residency::DEFAULT_CHUNK_PAGES,
        }
    }
}

struct DumpState {
    queue: Queue<DirFrame>,
    open_dirs: AtomicUsize,
    writer: Mutex<MapWriter>,
    page_size: u64,
    chunk_pages: u64,
}

/// Walk `root`, probe every regular file's page-cache residency, and
/// write the resulting map to `output`.
pub fn run(root: &Path, output: &Path, config: &DumpConfig) -> Result<()> {
    let root_entries = std::fs::read_dir(root)?;
    let queue = Queue::new();
    queue.push_head(DirFrame {
        path: root.to_path_buf(),
        entries: root_entries,
    });

    let state = Arc::new(DumpState {
        queue,
        open_dirs: AtomicUsize::new(1),
        writer: Mutex::new(MapWriter::create(output)?),
        page_size: config.page_size,
        chunk_pages: config.chunk_pages,
    });

    let mut handles = Vec::with_capacity(config.worker_threads.max(1));
    let mut spawn_err = None;
    for i in 0..config.worker_threads.max(1) {
        let state = state.clone();
        match thread::Builder::new()
            .name(format!("happycache-dump-{i}"))
            .spawn(move || worker_loop(&state))
        {
            Ok(handle) => handles.push(handle),
            Err(e) => {
                spawn_err = Some(e);
                break;
            }
        }
    }

    for handle in handles {
        let _ = handle.join();
    }

    // Already-spawned workers still drain and close the queue on their own
    // (closure is driven by `open_directories`, not by worker count), so it's
    // safe to join them before reporting a spawn failure.
    if let Some(e) = spawn_err {
        return Err(e.into());
    }

    let state = Arc::try_unwrap(state)
        .unwrap_or_else(|_| panic!("dump worker still referencing shared state after join"));
    state.writer.into_inner().unwrap().finish()?;
    Ok(())
}

fn worker_loop(state: &Arc<DumpState>) {
    while let Some(mut frame) = state.queue.pop_head() {
        process_frame(&mut frame, state);
    }
}

/// Drain `frame`'s entries. Descending into a subdirectory pushes the
/// frame we were working on back to the queue head and replaces `frame`
/// in place with the child's context, so the same worker keeps iterating
/// depth-first without a queue round-trip.
fn process_frame(frame: &mut DirFrame, state: &Arc<DumpState>) {
    loop {
        match frame.entries.next() {
            None => break,
            Some(Err(e)) => {
                tracing::warn!(
                    component = "DUMP",
                    dir = %frame.path.display(),
                    error = %e,
                    "directory read error, skipping remaining entries"
                );
                break;
            }
            Some(Ok(entry)) => handle_entry(entry, frame, state),
        }
    }

    if state.open_dirs.fetch_sub(1, Ordering::AcqRel) == 1 {
        state.queue.close();
    }
}

fn handle_entry(entry: std::fs::DirEntry, frame: &mut DirFrame, state: &Arc<DumpState>) {
    let full_path = entry.path();
    let Some(path_str) = full_path.to_str() else {
        tracing::warn!(component = "DUMP", path = %full_path.display(), "skipping non-UTF-8 path");
        return;
    };
    if path_str.len() > codec::MIN_LINE_BUFFER {
        tracing::warn!(
            component = "DUMP",
            path = path_str,
            "path exceeds map line buffer, skipping rather than truncating"
        );
        return;
    }

    let file_type = match entry.file_type() {
        Ok(ft) => ft,
        Err(_) => match entry.metadata() {
            Ok(m) => m.file_type(),
            Err(e) => {
                tracing::warn!(component = "DUMP", path = path_str, error = %e, "stat failed, skipping");
                return;
            }
        },
    };

    if file_type.is_dir() {
        match std::fs::read_dir(&full_path) {
            Ok(child_entries) => {
                state.open_dirs.fetch_add(1, Ordering::AcqRel);
                let parent = std::mem::replace(
                    frame,
                    DirFrame {
                        path: full_path,
                        entries: child_entries,
                    },
                );
                state.queue.push_head(parent);
            }
            Err(e) => {
                tracing::warn!(component = "DUMP", path = path_str, error = %e, "could not open directory, skipping");
            }
        }
    } else if file_type.is_file() {
        match File::open(&full_path) {
            Ok(file) => dump_file(&file, path_str, state),
            Err(e) => {
                tracing::warn!(component = "DUMP", path = path_str, error = %e, "could not open file, skipping");
            }
        }
    }
    // Symlinks, FIFOs, sockets, and device nodes are out of scope and
    // silently ignored: only regular files and directories are walked.
}

/// Probe one regular file's residency and, if it has any resident pages,
/// append its group to the shared output stream.
fn dump_file(file: &File, path_str: &str, state: &Arc<DumpState>) {
    let len = match file.metadata() {
        Ok(m) => m.len(),
        Err(e) => {
            tracing::warn!(component = "DUMP", path = path_str, error = %e, "fstat failed, skipping");
            return;
        }
    };
    if len == 0 {
        return;
    }

    let mut resident = Vec::new();
    if let Err(e) = residency::scan_resident_pages(
        file,
        len,
        state.page_size,
        state.chunk_pages,
        |page| resident.push(page),
    ) {
        tracing::warn!(component = "DUMP", path = path_str, error = %e, "residency scan failed, skipping");
        return;
    }
    if resident.is_empty() {
        return;
    }

    let mut writer = state.writer.lock().unwrap();
    if let Err(e) = write_group(&mut writer, path_str, &resident) {
        tracing::warn!(component = "DUMP", path = path_str, error = %e, "failed to write map group");
    }
}

fn write_group(writer: &mut MapWriter, path_str: &str, resident: &[u64]) -> std::io::Result<()> {
    writer.write_path(path_str)?;
    let mut last = 0u64;
    for &page in resident {
        writer.write_delta(page - last)?;
        last = page;
    }
    Ok(())
}
