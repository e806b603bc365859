//! Patch reference resolution.
//!
//! A patch may be declared as a local relative/absolute path, a `file://`
//! URI or a remote URL. [`PathResolver`] turns any of those into a local
//! filesystem path, downloading remote patches into the shared scratch
//! directory and memoizing the result per URL for the resolver's lifetime.

use crate::error::PatchError;
use crate::host::RemoteFetch;
use crate::scratch::ScratchDir;
use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

pub struct PathResolver {
    scratch: Rc<ScratchDir>,
    fetcher: Rc<dyn RemoteFetch>,
    resolved_remote: RefCell<HashMap<String, String>>,
}

impl PathResolver {
    pub fn new(scratch: Rc<ScratchDir>, fetcher: Rc<dyn RemoteFetch>) -> Self {
        PathResolver {
            scratch,
            fetcher,
            resolved_remote: RefCell::new(HashMap::new()),
        }
    }

    /// Resolve a local or remote patch reference.
    ///
    /// An empty reference resolves to an empty string: callers treat that as
    /// "no patch" and report a configuration error, so it is a sentinel, not
    /// a failure here.
    pub fn resolve(&self, path: &str, base_dir: &str) -> Result<String, PatchError> {
        let path = strip_file_scheme(path);
        if path.is_empty() {
            return Ok(String::new());
        }
        if has_remote_scheme(path) {
            self.resolve_remote(path)
        } else {
            Ok(resolve_local(path, base_dir))
        }
    }

    fn resolve_remote(&self, url: &str) -> Result<String, PatchError> {
        if let Some(local) = self.resolved_remote.borrow().get(url) {
            return Ok(local.clone());
        }
        let destination = self.scratch.new_path("")?;
        self.fetcher.fetch(url, &destination).map_err(|err| {
            PatchError::path_not_found(url, Some(err.to_string()))
        })?;
        let local = normalize_path(&destination.to_string_lossy());
        self.resolved_remote
            .borrow_mut()
            .insert(url.to_string(), local.clone());
        Ok(local)
    }
}

fn resolve_local(path: &str, base_dir: &str) -> String {
    let path = normalize_path(path);
    if is_absolute(&path) {
        return path;
    }
    let base_dir = normalize_path(strip_file_scheme(base_dir));
    format!("{base_dir}/{path}")
}

/// Strip a leading `file://` scheme, case-insensitively.
pub(crate) fn strip_file_scheme(path: &str) -> &str {
    if path.len() >= 7 && path[..7].eq_ignore_ascii_case("file://") {
        &path[7..]
    } else {
        path
    }
}

/// True when the string starts with a URI scheme of two or more word
/// characters followed by `://`.
pub(crate) fn has_remote_scheme(path: &str) -> bool {
    match path.find("://") {
        Some(idx) => {
            idx >= 2
                && path[..idx]
                    .bytes()
                    .all(|b| b.is_ascii_alphanumeric() || b == b'_')
        }
        None => false,
    }
}

/// Normalize separators to forward slashes and drop trailing slashes
/// (keeping a lone root).
pub(crate) fn normalize_path(path: &str) -> String {
    let normalized = path.replace('\\', "/");
    let trimmed = normalized.trim_end_matches('/');
    if trimmed.is_empty() && normalized.starts_with('/') {
        "/".to_string()
    } else {
        trimmed.to_string()
    }
}

/// Absolute means rooted (`/...`) or drive-qualified (`C:/...`).
pub(crate) fn is_absolute(path: &str) -> bool {
    if path.starts_with('/') {
        return true;
    }
    let bytes = path.as_bytes();
    bytes.len() >= 3 && bytes[0].is_ascii_alphabetic() && bytes[1] == b':' && bytes[2] == b'/'
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;
    use std::fs;
    use std::path::Path;

    struct CountingFetcher {
        downloads: Cell<usize>,
    }

    impl RemoteFetch for CountingFetcher {
        fn fetch(&self, _url: &str, destination: &Path) -> Result<(), PatchError> {
            self.downloads.set(self.downloads.get() + 1);
            fs::write(destination, "patch contents").map_err(|source| PatchError::Io {
                path: destination.display().to_string(),
                source,
            })
        }
    }

    struct FailingFetcher;

    impl RemoteFetch for FailingFetcher {
        fn fetch(&self, url: &str, _destination: &Path) -> Result<(), PatchError> {
            Err(PatchError::path_not_found(
                url,
                Some(format!("failed to download \"{url}\"")),
            ))
        }
    }

    fn resolver(fetcher: Rc<dyn RemoteFetch>) -> PathResolver {
        PathResolver::new(Rc::new(ScratchDir::system()), fetcher)
    }

    #[test]
    fn resolve_table() {
        let resolver = resolver(Rc::new(FailingFetcher));
        for (path, base, expected) in [
            ("", "", ""),
            ("", "/base", ""),
            ("file://", "/base", ""),
            ("/abs/patch.diff", "/base", "/abs/patch.diff"),
            ("file:///abs/patch.diff", "", "/abs/patch.diff"),
            ("patch.diff", "/base", "/base/patch.diff"),
            ("patch.diff", "file:///base", "/base/patch.diff"),
            ("patch.diff", "/base/", "/base/patch.diff"),
            ("sub\\patch.diff", "/base", "/base/sub/patch.diff"),
            ("C:\\patches\\fix.diff", "/base", "C:/patches/fix.diff"),
        ] {
            assert_eq!(
                resolver.resolve(path, base).unwrap(),
                expected,
                "resolving {path:?} against {base:?}"
            );
        }
    }

    #[test]
    fn remote_scheme_classification() {
        assert!(has_remote_scheme("https://example.com/p.diff"));
        assert!(has_remote_scheme("ftp://example.com/p.diff"));
        assert!(!has_remote_scheme("c://looks-like-a-drive"));
        assert!(!has_remote_scheme("/local/path"));
        assert!(!has_remote_scheme("patch.diff"));
    }

    #[test]
    fn remote_path_downloaded_once_and_cached() {
        let fetcher = Rc::new(CountingFetcher {
            downloads: Cell::new(0),
        });
        let resolver = resolver(fetcher.clone());
        let first = resolver
            .resolve("https://example.com/fix.diff", "/base")
            .unwrap();
        let second = resolver
            .resolve("https://example.com/fix.diff", "/other-base")
            .unwrap();
        assert_eq!(first, second);
        assert_eq!(fetcher.downloads.get(), 1);
        assert_eq!(fs::read_to_string(&first).unwrap(), "patch contents");
    }

    #[test]
    fn failed_download_is_path_not_found() {
        let resolver = resolver(Rc::new(FailingFetcher));
        match resolver.resolve("https://example.com/missing.diff", "") {
            Err(PatchError::PathNotFound { path, .. }) => {
                assert_eq!(path, "https://example.com/missing.diff");
            }
            other => panic!("expected PathNotFound, got {other:?}"),
        }
    }
}
