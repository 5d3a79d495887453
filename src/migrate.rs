//! Versioned data-directory migrations, run once at startup before the
//! engine opens its WAL. Each step is idempotent and the version marker is
//! written only after the step succeeds, so a crashed migration reruns
//! safely.

use std::fs;
use std::io;
use std::path::Path;

use tracing::info;

const VERSION_FILE: &str = "schema_version";

struct Migration {
    version: u32,
    name: &'static str,
    step: fn(&Path) -> io::Result<()>,
}

fn migrations() -> Vec<Migration> {
    vec![
        Migration {
            version: 1,
            name: "create data directory layout",
            step: |dir| fs::create_dir_all(dir),
        },
        Migration {
            version: 2,
            name: "rename legacy bookings.wal to chime.wal",
            step: |dir| {
                let legacy = dir.join("bookings.wal");
                let current = dir.join("chime.wal");
                if legacy.exists() && !current.exists() {
                    fs::rename(&legacy, &current)?;
                }
                Ok(())
            },
        },
        Migration {
            version: 3,
            name: "remove orphaned compaction temp file",
            step: |dir| {
                let tmp = dir.join("chime.wal.tmp");
                if tmp.exists() {
                    fs::remove_file(&tmp)?;
                }
                Ok(())
            },
        },
    ]
}

fn current_version(data_dir: &Path) -> io::Result<u32> {
    match fs::read_to_string(data_dir.join(VERSION_FILE)) {
        Ok(s) => s
            .trim()
            .parse()
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e)),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(0),
        Err(e) => Err(e),
    }
}

fn write_version(data_dir: &Path, version: u32) -> io::Result<()> {
    fs::write(data_dir.join(VERSION_FILE), format!("{version}\n"))
}

/// Apply all pending migrations to `data_dir`. Returns the schema version
/// the directory ends up at.
pub fn run(data_dir: &Path) -> io::Result<u32> {
    // The version file lives inside the directory the first migration
    // creates, so make sure it exists before reading.
    fs::create_dir_all(data_dir)?;
    let mut version = current_version(data_dir)?;
    for m in migrations() {
        if m.version <= version {
            continue;
        }
        info!("migration {:03}: {}", m.version, m.name);
        (m.step)(data_dir)?;
        write_version(data_dir, m.version)?;
        version = m.version;
    }
    Ok(version)
}
