use std::{
    path::PathBuf,
    sync::Arc,
    sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering},
    time::{Duration, Instant},
};

use once_cell::sync::Lazy;
use walkdir::WalkDir;

pub static METRICS: Lazy<Arc<Metrics>> = Lazy::new(|| Arc::new(Metrics::new()));

#[derive(Debug)]
pub struct Metrics {
    start: Instant,
    ready: AtomicBool,
    active_voice_calls: AtomicUsize,
    total_queue_len: AtomicUsize,
    playlist_writes: AtomicU64,
    hydrate_failures: AtomicU64,
    downloads_bytes: AtomicU64,
    downloads_files: AtomicU64,
}

fn saturating_dec(counter: &AtomicUsize, n: usize) {
    let _ = counter.fetch_update(Ordering::Relaxed, Ordering::Relaxed, |x| {
        Some(x.saturating_sub(n))
    });
}

impl Metrics {
    fn new() -> Self {
        Self {
            start: Instant::now(),
            ready: AtomicBool::new(false),
            active_voice_calls: AtomicUsize::new(0),
            total_queue_len: AtomicUsize::new(0),
            playlist_writes: AtomicU64::new(0),
            hydrate_failures: AtomicU64::new(0),
            downloads_bytes: AtomicU64::new(0),
            downloads_files: AtomicU64::new(0),
        }
    }

    pub fn set_ready(&self, v: bool) {
        self.ready.store(v, Ordering::Relaxed);
    }
    pub fn is_ready(&self) -> bool {
        self.ready.load(Ordering::Relaxed)
    }

    pub fn inc_connections(&self) {
        self.active_voice_calls.fetch_add(1, Ordering::Relaxed);
    }
    pub fn dec_connections(&self) {
        saturating_dec(&self.active_voice_calls, 1);
    }

    pub fn inc_queue(&self, n: usize) {
        self.total_queue_len.fetch_add(n, Ordering::Relaxed);
    }
    pub fn dec_queue(&self, n: usize) {
        saturating_dec(&self.total_queue_len, n);
    }

    pub fn inc_playlist_writes(&self) {
        self.playlist_writes.fetch_add(1, Ordering::Relaxed);
    }

    pub fn add_hydrate_failures(&self, n: usize) {
        self.hydrate_failures.fetch_add(n as u64, Ordering::Relaxed);
    }

    pub fn set_downloads(&self, files: u64, bytes: u64) {
        self.downloads_files.store(files, Ordering::Relaxed);
        self.downloads_bytes.store(bytes, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            uptime_secs: self.start.elapsed().as_secs(),
            ready: self.is_ready(),
            active_voice_calls: self.active_voice_calls.load(Ordering::Relaxed),
            total_queue_len: self.total_queue_len.load(Ordering::Relaxed),
            playlist_writes: self.playlist_writes.load(Ordering::Relaxed),
            hydrate_failures: self.hydrate_failures.load(Ordering::Relaxed),
            downloads_bytes: self.downloads_bytes.load(Ordering::Relaxed),
            downloads_files: self.downloads_files.load(Ordering::Relaxed),
        }
    }
}

#[derive(Debug, Clone)]
pub struct MetricsSnapshot {
    pub uptime_secs: u64,
    pub ready: bool,
    pub active_voice_calls: usize,
    pub total_queue_len: usize,
    pub playlist_writes: u64,
    pub hydrate_failures: u64,
    pub downloads_bytes: u64,
    pub downloads_files: u64,
}

/// File count and total size under `root`. Unreadable entries are skipped.
pub fn scan_dir(root: &std::path::Path) -> (u64, u64) {
    WalkDir::new(root)
        .into_iter()
        .filter_map(Result::ok)
        .filter(|e| e.file_type().is_file())
        .fold((0, 0), |(files, bytes), e| {
            let len = e.metadata().map(|m| m.len()).unwrap_or(0);
            (files + 1, bytes.saturating_add(len))
        })
}

/// Rescans the download cache every 30s.
pub fn spawn_download_size_scanner(root: PathBuf) {
    tokio::spawn(async move {
        loop {
            let dir = root.clone();
            if let Ok((files, bytes)) = tokio::task::spawn_blocking(move || scan_dir(&dir)).await {
                METRICS.set_downloads(files, bytes);
            }
            tokio::time::sleep(Duration::from_secs(30)).await;
        }
    });
}
