use super::{IntervalSet, StoreError};
use crate::dataset::{self, Decoded};

use chrono::NaiveDate;
use std::ffi::OsString;
use std::fs::{self, File};
use std::io::{BufWriter, ErrorKind};
use std::path::{Path, PathBuf};

const RANGES_FILE_NAME: &str = "ranges.jsonl.gz";
const MARKER_FILE_NAME: &str = "last_update";
pub(crate) const MARKER_FORMAT: &str = "%Y-%m-%d";

/// On-disk copy of the interval set and the staleness marker
#[derive(Debug)]
pub(crate) struct Snapshot {
    dir: PathBuf,
}

impl Snapshot {
    pub fn open(dir: &Path) -> Result<Self, StoreError> {
        fs::create_dir_all(dir).map_err(|error| StoreError::DirIo {
            path: dir.to_owned(),
            error,
        })?;
        Ok(Self {
            dir: dir.to_owned(),
        })
    }

    pub fn ranges_path(&self) -> PathBuf {
        self.dir.join(RANGES_FILE_NAME)
    }

    pub fn marker_path(&self) -> PathBuf {
        self.dir.join(MARKER_FILE_NAME)
    }

    pub fn load_intervals(&self) -> Result<Option<Decoded>, StoreError> {
        let path = self.ranges_path();
        let file = match File::open(&path) {
            Ok(file) => file,
            Err(error) if error.kind() == ErrorKind::NotFound => return Ok(None),
            Err(error) => return Err(StoreError::FileIo { path, error }),
        };
        dataset::decode_gzip(file)
            .map(Some)
            .map_err(|error| StoreError::Corrupted { path, error })
    }

    pub fn load_marker(&self) -> Result<Option<NaiveDate>, StoreError> {
        let path = self.marker_path();
        let value = match fs::read_to_string(&path) {
            Ok(value) => value,
            Err(error) if error.kind() == ErrorKind::NotFound => return Ok(None),
            Err(error) => return Err(StoreError::FileIo { path, error }),
        };
        NaiveDate::parse_from_str(value.trim(), MARKER_FORMAT)
            .map(Some)
            .map_err(|error| StoreError::InvalidMarker {
                path,
                value: value.trim().to_owned(),
                error,
            })
    }

    pub fn write_intervals(&self, set: &IntervalSet) -> Result<(), StoreError> {
        write_atomically(&self.ranges_path(), |file| {
            let writer = dataset::encode_gzip(BufWriter::new(file), set.iter())?;
            writer.into_inner()?.sync_all()
        })
    }

    pub fn write_marker(&self, date: NaiveDate) -> Result<(), StoreError> {
        write_atomically(&self.marker_path(), |file| {
            use std::io::Write;

            let mut writer = BufWriter::new(file);
            writeln!(writer, "{}", date.format(MARKER_FORMAT))?;
            writer.into_inner()?.sync_all()
        })
    }
}

fn tmp_path(path: &Path) -> PathBuf {
    let mut tmp = OsString::from(path.as_os_str());
    tmp.push(".tmp");
    tmp.into()
}

/// Write into a sibling temporary file and rename it over `path`
fn write_atomically<F>(path: &Path, write: F) -> Result<(), StoreError>
where
    F: FnOnce(File) -> std::io::Result<()>,
{
    let tmp = tmp_path(path);
    let result = File::create(&tmp)
        .and_then(write)
        .and_then(|()| fs::rename(&tmp, path));
    if let Err(error) = result {
        let _ = fs::remove_file(&tmp);
        return Err(StoreError::FileIo {
            path: path.to_owned(),
            error,
        });
    }
    Ok(())
}
