//! Directory listing over a session: MLSD first, NLST + MDTM/SIZE fallback

use super::session::{FtpSession, SessionError};
use crate::models::{normalize_path, parse_modify, EntryKind, RemoteFile};
use tracing::{debug, trace, warn};

/// A bare entry name: no separators, not `.` or `..`
///
/// Names are joined onto local directories, so anything that could address
/// another directory is refused.
pub fn is_plain_name(name: &str) -> bool {
    !name.is_empty() && name != "." && name != ".." && !name.contains(['/', '\\', '\0'])
}

/// Parse one MLSD line (`fact=value;fact=value; name`) into an entry
///
/// Returns `None` for `.`/`..`, for names with path separators and for
/// lines without a name part.
pub fn parse_mlsd_line(dir: &str, line: &str) -> Option<RemoteFile> {
    let line = line.trim_end_matches(['\r', '\n']);
    let (facts, name) = line.split_once(' ')?;
    if name.is_empty() || name == "." || name == ".." {
        return None;
    }
    if !is_plain_name(name) {
        debug!(dir, name, "Skipping MLSD entry with a path in its name");
        return None;
    }

    let mut modified = None;
    let mut size = None;
    let mut kind = None;

    for fact in facts.split(';').filter(|f| !f.is_empty()) {
        let Some((key, value)) = fact.split_once('=') else {
            continue;
        };
        match key.to_ascii_lowercase().as_str() {
            "modify" => modified = parse_modify(value),
            "size" => size = value.parse::<u64>().ok(),
            "type" => kind = Some(EntryKind::from_fact(value)),
            _ => {}
        }
    }

    Some(RemoteFile {
        name: name.to_string(),
        path: normalize_path([dir, name]),
        modified,
        size,
        kind,
    })
}

/// List `dir` on an open session
///
/// MLSD supplies modification time and size as facts. If the server rejects
/// MLSD, fall back to NLST and query MDTM and SIZE per entry, leaving fields
/// unset when those queries fail.
pub fn list_directory<S: FtpSession + ?Sized>(
    session: &mut S,
    dir: &str,
) -> Result<Vec<RemoteFile>, SessionError> {
    match session.mlsd(dir) {
        Ok(lines) => Ok(lines
            .iter()
            .filter_map(|line| parse_mlsd_line(dir, line))
            .collect()),
        Err(SessionError::Io(e)) => Err(SessionError::Io(e)),
        Err(e) => {
            warn!(path = dir, error = %e, "MLSD failed, falling back to NLST");
            list_with_nlst(session, dir)
        }
    }
}

fn list_with_nlst<S: FtpSession + ?Sized>(
    session: &mut S,
    dir: &str,
) -> Result<Vec<RemoteFile>, SessionError> {
    let names = session.nlst(dir)?;
    let mut files = Vec::with_capacity(names.len());

    for raw in names {
        let name = raw.rsplit('/').next().unwrap_or(&raw).trim().to_string();
        if name.is_empty() || name == "." || name == ".." {
            continue;
        }
        if !is_plain_name(&name) {
            debug!(dir, name = %name, "Skipping NLST entry with a path in its name");
            continue;
        }
        let path = normalize_path([dir, name.as_str()]);

        let modified = match session.mdtm(&path) {
            Ok(ts) => Some(ts),
            Err(e) => {
                trace!(path = %path, error = %e, "MDTM unavailable");
                None
            }
        };
        let size = match session.size(&path) {
            Ok(size) => Some(size),
            Err(e) => {
                trace!(path = %path, error = %e, "SIZE unavailable");
                None
            }
        };

        files.push(RemoteFile {
            name,
            path,
            modified,
            size,
            kind: None,
        });
    }

    Ok(files)
}
