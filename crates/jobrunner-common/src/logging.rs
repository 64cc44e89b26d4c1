// PagingLogger: mirrors a job log into size-capped page files on disk.

use anyhow::Result;
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

/// Folder (under the log directory) holding page files.
pub const PAGING_FOLDER: &str = "pages";

/// Maximum size of a single log page in bytes (8 MB).
pub const PAGE_SIZE: usize = 8 * 1024 * 1024;

/// Writes lines to `<dir>/pages/<job>_<n>.log`, starting a new page once the
/// current one reaches the size cap. Pages are created lazily on first write.
pub struct PagingLogger {
    job_id: String,
    pages_folder: PathBuf,
    page_size: usize,
    writer: Option<BufWriter<File>>,
    page_byte_count: usize,
    page_count: u32,
    total_lines: u64,
}

impl PagingLogger {
    pub fn new(log_directory: &Path, job_id: impl Into<String>) -> Result<Self> {
        Self::with_page_size(log_directory, job_id, PAGE_SIZE)
    }

    pub fn with_page_size(
        log_directory: &Path,
        job_id: impl Into<String>,
        page_size: usize,
    ) -> Result<Self> {
        let pages_folder = log_directory.join(PAGING_FOLDER);
        fs::create_dir_all(&pages_folder)?;

        Ok(Self {
            job_id: job_id.into(),
            pages_folder,
            page_size: page_size.max(1),
            writer: None,
            page_byte_count: 0,
            page_count: 0,
            total_lines: 0,
        })
    }

    pub fn total_lines(&self) -> u64 {
        self.total_lines
    }

    pub fn page_count(&self) -> u32 {
        self.page_count
    }

    pub fn pages_folder(&self) -> &Path {
        &self.pages_folder
    }

    /// Append one line. I/O errors are reported through `tracing` and do not
    /// interrupt the job.
    pub fn write(&mut self, line: &str) {
        if self.writer.is_none() {
            self.new_page();
        }

        if let Some(ref mut writer) = self.writer {
            if let Err(e) = writeln!(writer, "{}", line) {
                tracing::error!("Failed to write job log page: {}", e);
            }
        }

        self.total_lines += 1;
        self.page_byte_count += line.len() + 1;
        if self.page_byte_count >= self.page_size {
            self.end_page();
        }
    }

    /// Flush and close the current page.
    pub fn end(&mut self) {
        self.end_page();
    }

    fn new_page(&mut self) {
        self.end_page();
        self.page_byte_count = 0;
        self.page_count += 1;

        let path = self
            .pages_folder
            .join(format!("{}_{}.log", self.job_id, self.page_count));
        match File::create(&path) {
            Ok(file) => self.writer = Some(BufWriter::new(file)),
            Err(e) => tracing::error!("Failed to create page file {:?}: {}", path, e),
        }
    }

    fn end_page(&mut self) {
        if let Some(mut writer) = self.writer.take() {
            let _ = writer.flush();
        }
    }
}

impl Drop for PagingLogger {
    fn drop(&mut self) {
        self.end();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pages_are_created_lazily() {
        let dir = tempfile::tempdir().unwrap();
        let logger = PagingLogger::new(dir.path(), "job-1").unwrap();
        assert_eq!(logger.page_count(), 0);
        assert_eq!(fs::read_dir(logger.pages_folder()).unwrap().count(), 0);
    }

    #[test]
    fn rolls_over_to_a_new_page_at_the_cap() {
        let dir = tempfile::tempdir().unwrap();
        let mut logger = PagingLogger::with_page_size(dir.path(), "job-2", 16).unwrap();
        logger.write("0123456789");
        logger.write("abcdefghij");
        logger.write("tail");
        logger.end();

        assert_eq!(logger.total_lines(), 3);
        assert_eq!(logger.page_count(), 2);
        let first = fs::read_to_string(dir.path().join("pages/job-2_1.log")).unwrap();
        let second = fs::read_to_string(dir.path().join("pages/job-2_2.log")).unwrap();
        assert_eq!(first, "0123456789\nabcdefghij\n");
        assert_eq!(second, "tail\n");
    }
}
