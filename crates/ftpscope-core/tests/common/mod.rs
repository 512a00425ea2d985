//! Local-directory stand-in for an FTP server
//!
//! Serves a tree laid out like a controller (`rd/NNN/ftp/DD-MM-YY/*.DAT`)
//! through the `Connector`/`FtpSession` traits. Modification times come from
//! a fixture map so ordering is deterministic.

#![allow(dead_code)]

use chrono::{NaiveDate, NaiveDateTime};
use ftpscope_core::ftp::{Connector, FtpSession, SessionError};
use ftpscope_core::models::{machine_root, parse_day, MODIFY_FORMAT};
use ftpscope_core::{AnalysisService, Settings};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

/// Connection counters shared by every session of one connector
#[derive(Default)]
pub struct Counters {
    pub connects: AtomicUsize,
    pub live: AtomicUsize,
    pub max_live: AtomicUsize,
    pub retrievals: AtomicUsize,
    pub listings: AtomicUsize,
}

#[derive(Clone)]
pub struct LocalConnector {
    root: PathBuf,
    stamps: Arc<Mutex<HashMap<String, NaiveDateTime>>>,
    pub counters: Arc<Counters>,
    transfer_delay: Duration,
}

pub struct LocalSession {
    root: PathBuf,
    stamps: Arc<Mutex<HashMap<String, NaiveDateTime>>>,
    counters: Arc<Counters>,
    transfer_delay: Duration,
}

impl LocalSession {
    fn local(&self, remote: &str) -> PathBuf {
        self.root.join(remote.trim_start_matches('/'))
    }

    fn not_found(remote: &str) -> SessionError {
        SessionError::Permanent(format!("550 {}: no such file or directory", remote))
    }
}

impl Drop for LocalSession {
    fn drop(&mut self) {
        self.counters.live.fetch_sub(1, Ordering::SeqCst);
    }
}

impl FtpSession for LocalSession {
    fn noop(&mut self) -> Result<(), SessionError> {
        Ok(())
    }

    fn mlsd(&mut self, path: &str) -> Result<Vec<String>, SessionError> {
        self.counters.listings.fetch_add(1, Ordering::SeqCst);
        let dir = self.local(path);
        let entries = std::fs::read_dir(&dir).map_err(|_| Self::not_found(path))?;
        let stamps = self.stamps.lock();

        let mut lines = Vec::new();
        for entry in entries {
            let entry = entry?;
            let name = entry.file_name().to_string_lossy().into_owned();
            let meta = entry.metadata()?;
            let remote = format!("{}/{}", path.trim_end_matches('/'), name);

            let mut facts = String::new();
            if meta.is_dir() {
                facts.push_str("type=dir;");
            } else {
                facts.push_str(&format!("type=file;size={};", meta.len()));
            }
            if let Some(ts) = stamps.get(&remote) {
                facts.push_str(&format!("modify={};", ts.format(MODIFY_FORMAT)));
            }
            lines.push(format!("{} {}", facts, name));
        }
        lines.sort();
        Ok(lines)
    }

    fn nlst(&mut self, path: &str) -> Result<Vec<String>, SessionError> {
        let entries = std::fs::read_dir(self.local(path)).map_err(|_| Self::not_found(path))?;
        let mut names = Vec::new();
        for entry in entries {
            names.push(entry?.file_name().to_string_lossy().into_owned());
        }
        names.sort();
        Ok(names)
    }

    fn mdtm(&mut self, path: &str) -> Result<NaiveDateTime, SessionError> {
        self.stamps
            .lock()
            .get(path)
            .copied()
            .ok_or_else(|| Self::not_found(path))
    }

    fn size(&mut self, path: &str) -> Result<u64, SessionError> {
        std::fs::metadata(self.local(path))
            .map(|m| m.len())
            .map_err(|_| Self::not_found(path))
    }

    fn retrieve(
        &mut self,
        path: &str,
        sink: &mut dyn Write,
        chunk_size: usize,
        on_chunk: &mut dyn FnMut(u64),
    ) -> Result<u64, SessionError> {
        let mut file = std::fs::File::open(self.local(path)).map_err(|_| Self::not_found(path))?;
        self.counters.retrievals.fetch_add(1, Ordering::SeqCst);
        if !self.transfer_delay.is_zero() {
            std::thread::sleep(self.transfer_delay);
        }

        let mut buf = vec![0u8; chunk_size.max(1)];
        let mut total = 0u64;
        loop {
            let read = file.read(&mut buf)?;
            if read == 0 {
                break;
            }
            sink.write_all(&buf[..read])?;
            total += read as u64;
            on_chunk(total);
        }
        sink.flush()?;
        Ok(total)
    }

    fn quit(&mut self) {}
}

impl Connector for LocalConnector {
    type Session = LocalSession;

    fn connect(&self) -> Result<LocalSession, SessionError> {
        self.counters.connects.fetch_add(1, Ordering::SeqCst);
        let live = self.counters.live.fetch_add(1, Ordering::SeqCst) + 1;
        self.counters.max_live.fetch_max(live, Ordering::SeqCst);
        Ok(LocalSession {
            root: self.root.clone(),
            stamps: Arc::clone(&self.stamps),
            counters: Arc::clone(&self.counters),
            transfer_delay: self.transfer_delay,
        })
    }

    fn endpoint(&self) -> (String, u16) {
        (self.root.display().to_string(), 21)
    }
}

/// Seeded controller tree in a temporary directory
pub struct Fixture {
    pub dir: TempDir,
    stamps: Arc<Mutex<HashMap<String, NaiveDateTime>>>,
    counters: Arc<Counters>,
    transfer_delay: Duration,
}

impl Fixture {
    pub fn new() -> Self {
        Self {
            dir: tempfile::tempdir().unwrap(),
            stamps: Arc::default(),
            counters: Arc::default(),
            transfer_delay: Duration::ZERO,
        }
    }

    pub fn with_transfer_delay(mut self, delay: Duration) -> Self {
        self.transfer_delay = delay;
        self
    }

    fn served_root(&self) -> PathBuf {
        self.dir.path().join("server")
    }

    pub fn counters(&self) -> Arc<Counters> {
        Arc::clone(&self.counters)
    }

    /// Create a folder under the machine root; dated names get a midnight stamp
    pub fn add_folder(&self, machine: u32, name: &str) -> String {
        let remote = format!("{}/{}", machine_root(machine), name);
        std::fs::create_dir_all(self.local(&remote)).unwrap();
        if let Ok(day) = parse_day(name) {
            self.stamps
                .lock()
                .insert(remote.clone(), day.and_hms_opt(0, 0, 0).unwrap());
        }
        remote
    }

    pub fn add_file(
        &self,
        machine: u32,
        folder: &str,
        name: &str,
        content: &str,
        modified: Option<NaiveDateTime>,
    ) -> String {
        let remote = format!("{}/{}/{}", machine_root(machine), folder, name);
        let local = self.local(&remote);
        std::fs::create_dir_all(local.parent().unwrap()).unwrap();
        std::fs::write(&local, content).unwrap();
        if let Some(ts) = modified {
            self.stamps.lock().insert(remote.clone(), ts);
        }
        remote
    }

    /// Seed `files_per_day` measurement files per day, ten minutes apart from
    /// 06:00, with `Durchmesser 1: <value> mm` lines; returns values in
    /// chronological order
    pub fn seed_measurements(
        &self,
        machine: u32,
        days: &[&str],
        files_per_day: usize,
    ) -> Vec<f64> {
        let mut values = Vec::new();
        let mut counter = 0;
        for day in days {
            self.add_folder(machine, day);
            let date: NaiveDate = parse_day(day).unwrap();
            for i in 0..files_per_day {
                counter += 1;
                let value = 10.0 + counter as f64 * 0.125;
                let content = format!(
                    "Programm: O{:04}\nDurchmesser 1: {:.3} mm\nTiefe: 2,5 mm\n",
                    counter, value
                );
                let modified = date.and_hms_opt(6, 0, 0).unwrap()
                    + chrono::Duration::minutes(10 * i as i64);
                self.add_file(
                    machine,
                    day,
                    &format!("LOG_{:03}.DAT", counter),
                    &content,
                    Some(modified),
                );
                values.push(value);
            }
        }
        values
    }

    pub fn local(&self, remote: &str) -> PathBuf {
        self.served_root().join(remote.trim_start_matches('/'))
    }

    pub fn connector(&self) -> LocalConnector {
        LocalConnector {
            root: self.served_root(),
            stamps: Arc::clone(&self.stamps),
            counters: Arc::clone(&self.counters),
            transfer_delay: self.transfer_delay,
        }
    }

    pub fn settings(&self, max_connections: usize) -> Settings {
        Settings {
            host: "local".to_string(),
            max_connections,
            chunk_size: 16,
            retry_base_delay_ms: 1,
            ..Settings::default()
        }
    }

    pub fn service(&self, max_connections: usize) -> AnalysisService<LocalConnector> {
        AnalysisService::with_connector(Arc::new(self.settings(max_connections)), self.connector())
            .with_work_root(self.work_root())
    }

    pub fn work_root(&self) -> PathBuf {
        self.dir.path().join("work")
    }
}

pub fn is_within(path: &Path, root: &Path) -> bool {
    path.starts_with(root)
}
