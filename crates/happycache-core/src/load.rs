//! Load pipeline: a single parser thread dispatching per-page prefetch
//! tasks to a fixed worker pool, with file-handle lifetime tracked by
//! reference count.
//!
//! The path/delta parser treats an unparseable line as a path switch,
//! which doubles as its recovery rule for a garbled group. File-handle
//! reference counting is `Arc<FileHandle>` rather than a hand-rolled
//! atomic counter: cloning a handle into a task *is* taking a reference,
//! and dropping it *is* releasing one, so Rust's own drop glue gives the
//! zero-detection a manual refcount would otherwise need.

use std::fs::File;
use std::path::Path;
use std::sync::Arc;
use std::thread;

use crate::codec::{self, MapReader};
use crate::error::Result;
use crate::prefetch;
use crate::queue::Queue;
use crate::residency;

pub struct LoadConfig {
    pub worker_threads: usize,
    pub page_size: u64,
    pub chunk_pages: u64,
    /// Pages per `posix_fadvise` hint call.
    pub hint_block_pages: u64,
    /// Ceiling on total pages dispatched in one run, guarding against a
    /// pathological map. Defaults to system RAM in pages.
    pub max_page_budget: u64,
}

impl Default for LoadConfig {
    fn default() -> Self {
        let page_size = crate::page_size();
        Self {
            worker_threads: num_cpus::get() * 8,
            page_size,
            chunk_pages: residency::DEFAULT_CHUNK_PAGES,
            hint_block_pages: prefetch::HINT_BLOCK_PAGES,
            max_page_budget: default_page_budget(),
        }
    }
}

fn default_page_budget() -> u64 {
    // SAFETY: `_SC_PHYS_PAGES` takes no arguments and has no failure mode
    // beyond returning -1, handled below.
    let pages = unsafe { libc::sysconf(libc::_SC_PHYS_PAGES) };
    if pages > 0 {
        pages as u64
    } else {
        u64::MAX
    }
}

struct FileHandle {
    file: File,
    path: String,
    len: u64,
}

/// A recyclable prefetch request. Pool-allocated once, cycled between the
/// free list and the work list.
struct Task {
    handle: Option<Arc<FileHandle>>,
    start_page: u64,
    count: u64,
}

impl Task {
    fn empty() -> Self {
        Self {
            handle: None,
            start_page: 0,
            count: 0,
        }
    }
}

struct LoadState {
    work_list: Queue<Task>,
    free_list: Queue<Task>,
    page_size: u64,
    chunk_pages: u64,
    hint_block_pages: u64,
}

/// Read `mapfile` and issue prefetch hints for every page it names.
pub fn run(mapfile: &Path, config: &LoadConfig) -> Result<()> {
    let mut reader = codec::open_reader(mapfile)?;

    let free_list = Queue::new();
    let pool_size = (2 * config.worker_threads).max(1);
    for _ in 0..pool_size {
        free_list.push_tail(Task::empty());
    }

    let state = Arc::new(LoadState {
        work_list: Queue::new(),
        free_list,
        page_size: config.page_size,
        chunk_pages: config.chunk_pages,
        hint_block_pages: config.hint_block_pages,
    });

    let mut handles = Vec::with_capacity(config.worker_threads.max(1));
    let mut spawn_err = None;
    for i in 0..config.worker_threads.max(1) {
        let state = state.clone();
        match thread::Builder::new()
            .name(format!("happycache-load-{i}"))
            .spawn(move || worker_loop(&state))
        {
            Ok(handle) => handles.push(handle),
            Err(e) => {
                spawn_err = Some(e);
                break;
            }
        }
    }

    let parse_result = if spawn_err.is_none() {
        parse_and_dispatch(&mut reader, &state, config.max_page_budget)
    } else {
        Ok(())
    };

    state.work_list.close();
    for handle in handles {
        let _ = handle.join();
    }

    if let Some(e) = spawn_err {
        return Err(e.into());
    }
    parse_result
}

fn worker_loop(state: &Arc<LoadState>) {
    while let Some(mut task) = state.work_list.pop_head() {
        if let Some(handle) = &task.handle {
            if let Err(e) = prefetch::prefetch_range(
                &handle.file,
                state.page_size,
                handle.len,
                state.chunk_pages,
                task.start_page,
                task.count,
                state.hint_block_pages,
            ) {
                tracing::warn!(
                    component = "LOAD",
                    path = %handle.path,
                    error = %e,
                    "prefetch hint failed"
                );
            }
        }
        // Dropping the handle here is the reference release: once every
        // task and the parser's own `current` have dropped their clone,
        // the file closes.
        task.handle = None;
        state.free_list.push_tail(task);
    }
}

/// Drive the parser state machine: a cursor `page` that advances by each
/// delta, and unparseable lines treated as path switches (the format's
/// self-delimiting recovery rule).
fn parse_and_dispatch<R: std::io::Read>(
    reader: &mut MapReader<R>,
    state: &Arc<LoadState>,
    max_page_budget: u64,
) -> Result<()> {
    let mut current: Option<Arc<FileHandle>> = None;
    let mut page = 0u64;
    let mut pages_dispatched = 0u64;

    while let Some(line) = reader.next_line()? {
        match codec::parse_delta(&line) {
            Some(delta) => {
                let Some(handle) = current.clone() else {
                    tracing::warn!(component = "LOAD", line = %line, "delta with no open file, skipping");
                    continue;
                };
                if pages_dispatched >= max_page_budget {
                    tracing::warn!(
                        component = "LOAD",
                        budget = max_page_budget,
                        "page budget exhausted, stopping dispatch"
                    );
                    break;
                }
                page += delta;
                dispatch(state, handle, page);
                pages_dispatched += 1;
            }
            None => {
                // Path line: release any reference to the previous file
                // (by letting `current` drop) and open the next one. This
                // is also how an unparseable mid-group line recovers —
                // the caller never distinguishes "real path" from
                // "garbage that happened not to parse as an integer".
                current = open_next(&line);
                page = 0;
            }
        }
    }

    Ok(())
}

fn open_next(path_str: &str) -> Option<Arc<FileHandle>> {
    let file = match File::open(path_str) {
        Ok(f) => f,
        Err(e) => {
            tracing::warn!(component = "LOAD", path = path_str, error = %e, "could not open file, skipping");
            return None;
        }
    };
    let len = match file.metadata() {
        Ok(m) => m.len(),
        Err(e) => {
            tracing::warn!(component = "LOAD", path = path_str, error = %e, "fstat failed, skipping");
            return None;
        }
    };
    Some(Arc::new(FileHandle {
        file,
        path: path_str.to_string(),
        len,
    }))
}

fn dispatch(state: &Arc<LoadState>, handle: Arc<FileHandle>, page: u64) {
    // Blocks if the pool is fully checked out; this is the pipeline's only
    // intentional backpressure point on the producer side.
    let Some(mut task) = state.free_list.pop_head() else {
        return;
    };
    task.handle = Some(handle);
    task.start_page = page;
    task.count = 1;
    state.work_list.push_tail(task);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::MapWriter;
    use std::io::Write;
    use tempfile::tempdir;

    fn write_map(path: &Path, groups: &[(&str, &[u64])]) {
        let mut writer = MapWriter::create(path).unwrap();
        for (name, deltas) in groups {
            writer.write_path(name).unwrap();
            for d in *deltas {
                writer.write_delta(*d).unwrap();
            }
        }
        writer.finish().unwrap();
    }

    #[test]
    fn load_of_simple_map_does_not_error() {
        let dir = tempdir().unwrap();
        let target = dir.path().join("a");
        let ps = crate::page_size();
        let mut f = File::create(&target).unwrap();
        f.write_all(&vec![1u8; (ps * 4) as usize]).unwrap();
        drop(f);

        let map_path = dir.path().join("map.gz");
        let target_str = target.to_str().unwrap();
        write_map(&map_path, &[(target_str, &[0, 2, 1])]);

        let config = LoadConfig {
            worker_threads: 2,
            ..LoadConfig::default()
        };
        run(&map_path, &config).unwrap();
    }

    #[test]
    fn missing_files_are_skipped_not_fatal() {
        let dir = tempdir().unwrap();
        let map_path = dir.path().join("map.gz");
        write_map(&map_path, &[("/does/not/exist", &[0, 1])]);

        let config = LoadConfig {
            worker_threads: 2,
            ..LoadConfig::default()
        };
        run(&map_path, &config).unwrap();
    }

    #[test]
    fn unparseable_line_switches_files_without_aborting() {
        let dir = tempdir().unwrap();
        let a = dir.path().join("a");
        let b = dir.path().join("b");
        File::create(&a).unwrap().write_all(b"hello").unwrap();
        File::create(&b).unwrap().write_all(b"world").unwrap();

        let map_path = dir.path().join("map.gz");
        {
            let mut writer = MapWriter::create(&map_path).unwrap();
            writer.write_path(a.to_str().unwrap()).unwrap();
            writer.write_delta(0).unwrap();
            writer.write_delta(5).unwrap();
            writer.write_path("not a valid delta but also not opened").unwrap();
            writer.write_path(b.to_str().unwrap()).unwrap();
            writer.write_delta(0).unwrap();
            writer.finish().unwrap();
        }

        let config = LoadConfig {
            worker_threads: 2,
            ..LoadConfig::default()
        };
        run(&map_path, &config).unwrap();
    }

    #[test]
    fn empty_map_completes_immediately() {
        let dir = tempdir().unwrap();
        let map_path = dir.path().join("empty.gz");
        write_map(&map_path, &[]);

        let config = LoadConfig {
            worker_threads: 4,
            ..LoadConfig::default()
        };
        run(&map_path, &config).unwrap();
    }
}
