//! Kernel read-ahead hints (`posix_fadvise(2)`, `POSIX_FADV_WILLNEED`).
//!
//! A hint-based approach rather than mapping the file and touching a byte
//! per page to force a fault — see DESIGN.md's Open Question notes for why
//! this supersedes that.

use std::fs::File;
use std::io;
use std::os::unix::io::AsRawFd;

use nix::fcntl::{posix_fadvise, PosixFadviseAdvice};

use crate::residency::ResidencyCursor;

/// Pages per `posix_fadvise` call. Kept well below typical block-device
/// max-sectors so adjacent hints can be served with overlapping I/O.
pub const HINT_BLOCK_PAGES: u64 = 8;

/// Issue "will need" hints over `[start_page, start_page + count)`,
/// skipping pages the residency cursor already reports resident and
/// coalescing adjacent cold pages into a single hint, up to
/// `block_pages` per call.
pub fn prefetch_range(
    file: &File,
    page_size: u64,
    file_len: u64,
    chunk_pages: u64,
    start_page: u64,
    count: u64,
    block_pages: u64,
) -> io::Result<()> {
    let block_pages = block_pages.max(1);
    let mut cursor = ResidencyCursor::new(file, file_len, page_size, chunk_pages)?;
    let end_page = start_page.saturating_add(count);
    let mut page = start_page;

    while page < end_page {
        if cursor.is_resident(page)? {
            page += 1;
            continue;
        }

        let block_limit = (page + block_pages).min(end_page);
        let mut run_end = page + 1;
        while run_end < block_limit && !cursor.is_resident(run_end)? {
            run_end += 1;
        }

        hint(file, page_size, page, run_end - page)?;
        page = run_end;
    }

    Ok(())
}

fn hint(file: &File, page_size: u64, start_page: u64, num_pages: u64) -> io::Result<()> {
    let offset = (start_page * page_size) as libc::off_t;
    let length = (num_pages * page_size) as libc::off_t;
    posix_fadvise(
        file.as_raw_fd(),
        offset,
        length,
        PosixFadviseAdvice::POSIX_FADV_WILLNEED,
    )
    .map_err(|errno| io::Error::from_raw_os_error(errno as i32))
}
