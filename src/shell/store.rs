use std::collections::HashMap;
use std::fs;
use std::io;
use std::path::Path;

/// Read-only store of canned command output, loaded once at startup and
/// shared by every session.
///
/// Keys are the file stems of the `*.txt` resources in the canned directory:
/// `<cmd>` for bare invocations, `<cmd>-version` and `<cmd>-help` for the
/// matching flags, plus specials such as `lsb_release_all`. Values are the
/// file content split on the newline byte, nothing else — a file ending in a
/// newline therefore carries a final empty line, which is written out as-is.
#[derive(Debug, Default)]
pub struct ResponseStore {
    responses: HashMap<String, Vec<String>>,
}

impl ResponseStore {
    pub fn load(dir: &Path) -> io::Result<Self> {
        let mut responses = HashMap::new();

        for entry in fs::read_dir(dir)? {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) != Some("txt") {
                continue;
            }
            let Some(stem) = path.file_stem().and_then(|s| s.to_str()) else {
                continue;
            };
            match fs::read_to_string(&path) {
                Ok(data) => {
                    let lines = data.split('\n').map(str::to_string).collect();
                    responses.insert(stem.to_string(), lines);
                }
                Err(err) => {
                    log::warn!("Skipping unreadable canned response {}: {}", path.display(), err);
                }
            }
        }

        log::debug!("Loaded {} canned responses from {}", responses.len(), dir.display());
        Ok(ResponseStore { responses })
    }

    /// Looks up the canned output for a resource key. A miss is the caller's
    /// cue to degrade to the fault line.
    pub fn lookup(&self, key: &str) -> Option<&[String]> {
        self.responses.get(key).map(Vec::as_slice)
    }

    pub fn len(&self) -> usize {
        self.responses.len()
    }

    pub fn is_empty(&self) -> bool {
        self.responses.is_empty()
    }

    #[cfg(test)]
    pub fn from_entries<I>(entries: I) -> Self
    where
        I: IntoIterator<Item = (&'static str, Vec<&'static str>)>,
    {
        let responses = entries
            .into_iter()
            .map(|(k, v)| (k.to_string(), v.into_iter().map(str::to_string).collect()))
            .collect();
        ResponseStore { responses }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn loads_txt_files_keyed_by_stem() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("ls.txt"), "bin\netc\nhome").unwrap();
        fs::write(dir.path().join("wget-help.txt"), "Usage: wget [OPTION]...").unwrap();
        fs::write(dir.path().join("notes.md"), "ignored").unwrap();

        let store = ResponseStore::load(dir.path()).unwrap();

        assert_eq!(store.len(), 2);
        assert_eq!(store.lookup("ls").unwrap(), ["bin", "etc", "home"]);
        assert_eq!(store.lookup("wget-help").unwrap(), ["Usage: wget [OPTION]..."]);
        assert!(store.lookup("notes").is_none());
    }

    #[test]
    fn trailing_newline_yields_final_empty_line() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("ifconfig.txt"), "eth0: up\n").unwrap();

        let store = ResponseStore::load(dir.path()).unwrap();

        assert_eq!(store.lookup("ifconfig").unwrap(), ["eth0: up", ""]);
    }

    #[test]
    fn missing_directory_is_an_error() {
        assert!(ResponseStore::load(Path::new("/nonexistent/canned")).is_err());
    }
}
