// src/fsio.rs
use std::fs;
use std::io::{self, Write};
use std::path::Path;

/// Write `bytes` to `path` so readers see either the old file or the new one,
/// never a torn write: temp file in the same directory, fsync, rename.
pub fn write_atomic(path: &Path, bytes: &[u8]) -> io::Result<()> {
    let parent = path.parent().filter(|p| !p.as_os_str().is_empty());
    if let Some(dir) = parent {
        fs::create_dir_all(dir)?;
    }

    let mut tmp_name = path.file_name().unwrap_or_default().to_os_string();
    tmp_name.push(".tmp");
    let tmp = path.with_file_name(tmp_name);

    let res = (|| {
        let mut f = fs::File::create(&tmp)?;
        f.write_all(bytes)?;
        f.sync_all()?;
        fs::rename(&tmp, path)
    })();

    if res.is_err() {
        let _ = fs::remove_file(&tmp);
        return res;
    }

    // Persist the rename itself. Not supported everywhere (e.g. Windows), so best effort.
    if let Some(dir) = parent {
        if let Ok(d) = fs::File::open(dir) {
            let _ = d.sync_all();
        }
    }
    Ok(())
}
