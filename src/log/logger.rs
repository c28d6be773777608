use crate::{
    config::LogConfig,
    log::{
        log_level::LogLevel, log_msg::LogMsg, log_msg::now_millis, log_sink::LogSink,
        logger_handle::LoggerHandle,
    },
};

use std::{
    fs::{self, OpenOptions},
    io::{self, BufWriter, Write},
    path::{Path, PathBuf},
    sync::{Arc, atomic::AtomicU64, mpsc},
    thread,
};

/// Flush every 100 lines when debugging so crashes leave a useful tail.
#[cfg(feature = "log-debug")]
const FLUSH_BATCH_SIZE: u32 = 100;

/// Flush every 1000 lines otherwise.
#[cfg(not(feature = "log-debug"))]
const FLUSH_BATCH_SIZE: u32 = 1_000;

/// Bounded, non-blocking logger that writes to a per-process log file.
///
/// Producers enqueue through cloned [`LoggerHandle`]s; a dedicated worker
/// thread drains the queue into a buffered file writer. The writer is flushed
/// every `FLUSH_BATCH_SIZE` lines and whenever the queue runs empty.
pub struct Logger {
    handle: LoggerHandle,
    _thread: Option<thread::JoinHandle<()>>,
    file_path: PathBuf,
}

impl Logger {
    /// Starts a logger using the `[Logging]` settings.
    ///
    /// Without a configured directory the log goes to `logs/` next to the
    /// executable.
    #[must_use]
    pub fn start(config: &LogConfig) -> Self {
        let dir = config
            .dir
            .as_deref()
            .map(expand_path)
            .unwrap_or_else(|| exe_dir_fallback_cwd().join("logs"));
        Self::start_in_dir(
            dir,
            config.file_name.as_deref(),
            config.queue_capacity,
            config.min_level,
        )
    }

    /// Starts the logger in `dir`, creating it if needed.
    ///
    /// The file is named `<app_name>-<unix_ms>-pid<pid>.log`. If the file
    /// cannot be opened the worker falls back to a temp file, then to a sink.
    pub fn start_in_dir<D: AsRef<Path>>(
        dir: D,
        app_name: Option<&str>,
        cap: usize,
        min_level: LogLevel,
    ) -> Self {
        let dir = dir.as_ref().to_path_buf();
        let _ = fs::create_dir_all(&dir);

        let fname = format!(
            "{}-{}-pid{}.log",
            app_name.unwrap_or("peerlink"),
            now_millis(),
            std::process::id()
        );
        let file_path = dir.join(fname);

        let (tx, rx) = mpsc::sync_channel::<LogMsg>(cap.max(1));
        let handle = LoggerHandle {
            tx,
            min_level,
            dropped: Arc::new(AtomicU64::new(0)),
        };

        let worker_path = file_path.clone();
        let _thread = thread::Builder::new()
            .name("logger-worker".into())
            .spawn(move || run_worker(&worker_path, &rx))
            .ok();

        Self {
            handle,
            _thread,
            file_path,
        }
    }

    /// Returns a cloneable handle to the logger queue.
    #[must_use]
    pub fn handle(&self) -> LoggerHandle {
        self.handle.clone()
    }

    /// Returns the handle as a shareable sink for components.
    #[must_use]
    pub fn sink(&self) -> Arc<dyn LogSink> {
        Arc::new(self.handle.clone())
    }

    /// Path of the active log file.
    #[must_use]
    pub fn file_path(&self) -> &Path {
        &self.file_path
    }

    /// Records dropped because the queue was full.
    #[must_use]
    pub fn dropped(&self) -> u64 {
        self.handle.dropped()
    }
}

fn run_worker(path: &Path, rx: &mpsc::Receiver<LogMsg>) {
    let writer: Box<dyn Write + Send> =
        if let Ok(f) = OpenOptions::new().create(true).append(true).open(path) {
            Box::new(f)
        } else {
            let fallback = std::env::temp_dir().join("peerlink-fallback.log");
            match OpenOptions::new().create(true).append(true).open(&fallback) {
                Ok(f) => Box::new(f),
                Err(_) => Box::new(io::sink()),
            }
        };
    let mut out = BufWriter::new(writer);
    let mut lines_written: u32 = 0;

    while let Ok(first) = rx.recv() {
        let mut next = Some(first);
        while let Some(m) = next {
            let _ = writeln!(&mut out, "[{}] {} {} | {}", m.level, m.ts_ms, m.target, m.text);
            lines_written = lines_written.wrapping_add(1);
            if lines_written.is_multiple_of(FLUSH_BATCH_SIZE) {
                let _ = out.flush();
            }
            next = rx.try_recv().ok();
        }
        // Queue drained: persist what we have before blocking again.
        let _ = out.flush();
    }

    let _ = out.flush();
}

/// Directory of the running executable, or the working directory on error.
fn exe_dir_fallback_cwd() -> PathBuf {
    std::env::current_exe()
        .ok()
        .and_then(|p| p.parent().map(Path::to_path_buf))
        .unwrap_or_else(|| std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")))
}

/// Expands a leading `~` to the user's home directory.
fn expand_path(path_str: &str) -> PathBuf {
    let Some(rest) = path_str.strip_prefix('~') else {
        return PathBuf::from(path_str);
    };
    let home = std::env::var("HOME")
        .or_else(|_| std::env::var("USERPROFILE"))
        .ok()
        .map(PathBuf::from);
    match home {
        Some(home) if rest.is_empty() => home,
        Some(home) if rest.starts_with('/') || rest.starts_with('\\') => home.join(&rest[1..]),
        _ => PathBuf::from(path_str),
    }
}
