//! Loading `KEY=value` files into the process environment, plus thin
//! accessors over the environment itself.

use std::ffi::OsString;
use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::{debug, trace};

/// keys longer than this are cut short
pub const MAX_KEY_LEN: usize = 1024;
/// values longer than this are cut short
pub const MAX_VALUE_LEN: usize = 10240;
/// the file [`load_dot_env`] reads from the working directory
pub const DOT_ENV: &str = ".env";

#[derive(Error, Debug)]
pub enum EnvError {
    #[error("failed to read {}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("{key:?} cannot be stored in the environment")]
    Unassignable { key: String },
}

/// a key and value as raw bytes
pub type Pair = (Vec<u8>, Vec<u8>);

/// split the contents of an env file into key/value pairs.
///
/// a pair is only complete once its line ends in `\n`; a trailing line
/// without one is dropped. every line is split at its first `=`, later ones
/// belong to the value. carriage returns are dropped wherever they appear and
/// nothing is trimmed. lines without `=` are skipped, as are pairs the
/// environment cannot hold (an empty key, or a NUL anywhere)
pub fn parse(bytes: &[u8]) -> Vec<Pair> {
    let mut pairs = Vec::new();
    let mut lines = bytes.split(|&b| b == b'\n');
    // whatever follows the last newline is unterminated
    lines.next_back();

    for (number, line) in lines.enumerate() {
        let line: Vec<u8> = line.iter().copied().filter(|&b| b != b'\r').collect();

        let Some(split) = line.iter().position(|&b| b == b'=') else {
            if !line.is_empty() {
                trace!(line = number + 1, "skipping line without assignment");
            }
            continue;
        };
        let (key, value) = (&line[..split], &line[split + 1..]);

        let key = &key[..key.len().min(MAX_KEY_LEN)];
        let value = &value[..value.len().min(MAX_VALUE_LEN)];

        if !is_assignable(key, value) {
            trace!(line = number + 1, "skipping malformed assignment");
            continue;
        }

        pairs.push((key.to_vec(), value.to_vec()));
    }

    pairs
}

/// read `path` and set every pair in the process environment, overwriting
/// what is already there. returns how many pairs were set. a missing file is
/// not an error and sets nothing
pub fn load_from_path(path: impl AsRef<Path>) -> Result<usize, EnvError> {
    let path = path.as_ref();

    let bytes = match std::fs::read(path) {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            debug!(path = %path.display(), "no env file");
            return Ok(0);
        }
        Err(source) => {
            return Err(EnvError::Io {
                path: path.to_owned(),
                source,
            })
        }
    };

    let pairs = parse(&bytes);
    for (key, value) in &pairs {
        let key = os_string(key);
        trace!(key = ?key, "setting variable");
        std::env::set_var(key, os_string(value));
    }

    debug!(path = %path.display(), count = pairs.len(), "loaded env file");
    Ok(pairs.len())
}

/// load `.env` from the current working directory
pub fn load_dot_env() -> Result<usize, EnvError> {
    load_from_path(DOT_ENV)
}

/// the value of `key`, if it is set and valid unicode
pub fn get(key: &str) -> Option<String> {
    if !is_assignable(key.as_bytes(), b"") {
        return None;
    }
    std::env::var(key).ok()
}

/// set `key` to `value`. an existing value is only replaced when `overwrite`
/// is true
pub fn set(key: &str, value: &str, overwrite: bool) -> Result<(), EnvError> {
    if !is_assignable(key.as_bytes(), value.as_bytes()) {
        return Err(EnvError::Unassignable {
            key: key.to_owned(),
        });
    }

    if !overwrite && std::env::var_os(key).is_some() {
        trace!(key = %key, "keeping existing variable");
        return Ok(());
    }

    trace!(key = %key, "setting variable");
    std::env::set_var(key, value);
    Ok(())
}

/// whether `set_var` accepts the pair
fn is_assignable(key: &[u8], value: &[u8]) -> bool {
    !key.is_empty() && !key.contains(&b'=') && !key.contains(&0) && !value.contains(&0)
}

cfg_if::cfg_if! {
    if #[cfg(unix)] {
        fn os_string(bytes: &[u8]) -> OsString {
            use std::os::unix::ffi::OsStrExt;
            std::ffi::OsStr::from_bytes(bytes).to_owned()
        }
    } else {
        fn os_string(bytes: &[u8]) -> OsString {
            String::from_utf8_lossy(bytes).into_owned().into()
        }
    }
}

#[cfg(test)]
mod tests {
    use std::fs;

    use super::*;

    fn pair(key: &str, value: &str) -> Pair {
        (key.as_bytes().to_vec(), value.as_bytes().to_vec())
    }

    #[test]
    fn splits_at_the_first_equals() {
        assert_eq!(
            parse(b"A=1\nB=x=y\nC=\n"),
            [pair("A", "1"), pair("B", "x=y"), pair("C", "")]
        );
    }

    #[test]
    fn skips_lines_without_assignment() {
        assert_eq!(
            parse(b"\n# comment\nA=1\n   \nB=2\n"),
            [pair("A", "1"), pair("B", "2")]
        );
    }

    #[test]
    fn drops_carriage_returns() {
        assert_eq!(
            parse(b"A=1\r\nB=2\r\nC\r=3\n"),
            [pair("A", "1"), pair("B", "2"), pair("C", "3")]
        );
    }

    #[test]
    fn keeps_whitespace() {
        assert_eq!(parse(b" A = 1 \n"), [pair(" A ", " 1 ")]);
    }

    #[test]
    fn unterminated_last_line_is_dropped() {
        assert_eq!(parse(b"A=1\nB=2"), [pair("A", "1")]);
        assert!(parse(b"A=1").is_empty());
    }

    #[test]
    fn skips_pairs_the_environment_rejects() {
        assert_eq!(parse(b"=1\nA\0=2\nB=\x003\nC=4\n"), [pair("C", "4")]);
    }

    #[test]
    fn truncates_long_keys_and_values() {
        let text = format!("{}={}\n", "k".repeat(2000), "v".repeat(20000));
        let pairs = parse(text.as_bytes());
        assert_eq!(pairs.len(), 1);
        assert_eq!(pairs[0].0.len(), MAX_KEY_LEN);
        assert_eq!(pairs[0].1.len(), MAX_VALUE_LEN);
    }

    #[test]
    fn passes_raw_bytes_through() {
        assert_eq!(
            parse(b"K=\xff\xfe\n"),
            [(b"K".to_vec(), vec![0xff, 0xfe])]
        );
    }

    #[cfg(unix)]
    #[test]
    fn loads_non_unicode_values_unchanged() {
        use std::os::unix::ffi::OsStrExt;

        let dir = tempfile::tempdir().expect("failed to create temp dir");
        let path = dir.path().join(".env");
        fs::write(&path, b"SYPHA_ENV_TEST_RAW=\xffok\n").expect("failed to write env file");

        load_from_path(&path).expect("failed to load");
        let value = std::env::var_os("SYPHA_ENV_TEST_RAW").expect("variable not set");
        assert_eq!(value.as_bytes(), b"\xffok");
        assert_eq!(get("SYPHA_ENV_TEST_RAW"), None);
    }

    #[test]
    fn loads_into_the_environment() {
        let dir = tempfile::tempdir().expect("failed to create temp dir");
        let path = dir.path().join(".env");
        fs::write(
            &path,
            "SYPHA_ENV_TEST_LOAD_A=alpha\r\nSYPHA_ENV_TEST_LOAD_B=b=c\nnot a pair\n",
        )
        .expect("failed to write env file");

        assert_eq!(load_from_path(&path).expect("failed to load"), 2);
        assert_eq!(get("SYPHA_ENV_TEST_LOAD_A").as_deref(), Some("alpha"));
        assert_eq!(get("SYPHA_ENV_TEST_LOAD_B").as_deref(), Some("b=c"));
    }

    #[test]
    fn loading_overwrites_existing_variables() {
        set("SYPHA_ENV_TEST_OVERWRITE", "old", true).expect("failed to set");

        let dir = tempfile::tempdir().expect("failed to create temp dir");
        let path = dir.path().join(".env");
        fs::write(&path, "SYPHA_ENV_TEST_OVERWRITE=new\n").expect("failed to write env file");

        load_from_path(&path).expect("failed to load");
        assert_eq!(get("SYPHA_ENV_TEST_OVERWRITE").as_deref(), Some("new"));
    }

    #[test]
    fn missing_file_loads_nothing() {
        let dir = tempfile::tempdir().expect("failed to create temp dir");
        assert_eq!(
            load_from_path(dir.path().join("missing.env")).expect("failed to load"),
            0
        );
    }

    #[test]
    fn unreadable_path_is_an_error() {
        let dir = tempfile::tempdir().expect("failed to create temp dir");
        match load_from_path(dir.path()) {
            Err(EnvError::Io { path, .. }) => assert_eq!(path, dir.path()),
            other => panic!("expected an io error, got {:?}", other),
        }
    }

    #[test]
    fn load_dot_env_reads_the_working_directory() {
        struct RestoreDir(PathBuf);

        impl Drop for RestoreDir {
            fn drop(&mut self) {
                let _ = std::env::set_current_dir(&self.0);
            }
        }

        let dir = tempfile::tempdir().expect("failed to create temp dir");
        fs::write(dir.path().join(DOT_ENV), "SYPHA_ENV_TEST_DOT=from dot env\n")
            .expect("failed to write env file");

        let _restore = RestoreDir(std::env::current_dir().expect("no working directory"));
        std::env::set_current_dir(dir.path()).expect("failed to change directory");

        assert_eq!(load_dot_env().expect("failed to load"), 1);
        assert_eq!(get("SYPHA_ENV_TEST_DOT").as_deref(), Some("from dot env"));
    }

    #[test]
    fn set_without_overwrite_keeps_the_existing_value() {
        assert_eq!(get("SYPHA_ENV_TEST_KEEP"), None);

        set("SYPHA_ENV_TEST_KEEP", "it works", false).expect("failed to set");
        assert_eq!(get("SYPHA_ENV_TEST_KEEP").as_deref(), Some("it works"));

        set("SYPHA_ENV_TEST_KEEP", "won't work", false).expect("failed to set");
        assert_eq!(get("SYPHA_ENV_TEST_KEEP").as_deref(), Some("it works"));

        set("SYPHA_ENV_TEST_KEEP", "replaced", true).expect("failed to set");
        assert_eq!(get("SYPHA_ENV_TEST_KEEP").as_deref(), Some("replaced"));
    }

    #[test]
    fn set_rejects_unassignable_pairs() {
        for (key, value) in [("", "v"), ("A=B", "v"), ("A\0", "v"), ("SYPHA_ENV_TEST_NUL", "a\0b")] {
            assert!(matches!(
                set(key, value, true),
                Err(EnvError::Unassignable { .. })
            ));
        }
        assert_eq!(get("SYPHA_ENV_TEST_NUL"), None);
        assert_eq!(get(""), None);
        assert_eq!(get("A=B"), None);
    }
}
