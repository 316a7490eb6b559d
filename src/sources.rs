use std::cmp::Ordering;
use std::fs;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::error::LoaderError;

/// Which directory entries count as slice sources
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceOptions {
    /// Accepted file extensions, compared case-insensitively
    pub extensions: Vec<String>,
    /// Accept every regular file regardless of extension
    pub accept_all: bool,
}

impl Default for SourceOptions {
    fn default() -> Self {
        Self {
            extensions: vec!["dcm".to_string()],
            accept_all: false,
        }
    }
}

impl SourceOptions {
    fn accepts(&self, path: &Path) -> bool {
        let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
            return false;
        };
        if name.starts_with('.') {
            return false;
        }
        if self.accept_all {
            return true;
        }
        path.extension()
            .and_then(|s| s.to_str())
            .is_some_and(|ext| {
                self.extensions
                    .iter()
                    .any(|wanted| wanted.trim_start_matches('.').eq_ignore_ascii_case(ext))
            })
    }
}

/// List the slice files directly inside `dir`, in natural file-name order.
///
/// An empty list is not an error here; the loader reports it as
/// [`LoaderError::NoFiles`].
pub fn enumerate_sources(
    dir: impl AsRef<Path>,
    options: &SourceOptions,
) -> Result<Vec<PathBuf>, LoaderError> {
    let dir = dir.as_ref();
    let unavailable = |e: std::io::Error| LoaderError::Unavailable {
        reason: format!("cannot read {}: {e}", dir.display()),
    };

    let mut paths: Vec<_> = fs::read_dir(dir)
        .map_err(unavailable)?
        .filter_map(Result::ok)
        .map(|entry| entry.path())
        // `is_file` follows symlinks, so linked slices are kept.
        .filter(|path| path.is_file() && options.accepts(path))
        .collect();

    paths.sort_by(|a, b| natural_cmp(&file_name(a), &file_name(b)));
    debug!(count = paths.len(), dir = %dir.display(), "enumerated slice sources");
    Ok(paths)
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}

/// Compare names so that embedded numbers order by value: `im2` < `im10`
fn natural_cmp(a: &str, b: &str) -> Ordering {
    let mut a = a.chars().peekable();
    let mut b = b.chars().peekable();

    loop {
        match (a.peek().copied(), b.peek().copied()) {
            (None, None) => return Ordering::Equal,
            (None, Some(_)) => return Ordering::Less,
            (Some(_), None) => return Ordering::Greater,
            (Some(x), Some(y)) if x.is_ascii_digit() && y.is_ascii_digit() => {
                let left = take_number(&mut a);
                let right = take_number(&mut b);
                let ordering = left
                    .trim_start_matches('0')
                    .len()
                    .cmp(&right.trim_start_matches('0').len())
                    .then_with(|| {
                        left.trim_start_matches('0')
                            .cmp(right.trim_start_matches('0'))
                    })
                    .then_with(|| left.len().cmp(&right.len()));
                if ordering != Ordering::Equal {
                    return ordering;
                }
            }
            (Some(x), Some(y)) => {
                if x != y {
                    return x.cmp(&y);
                }
                a.next();
                b.next();
            }
        }
    }
}

fn take_number(chars: &mut std::iter::Peekable<std::str::Chars<'_>>) -> String {
    let mut digits = String::new();
    while let Some(c) = chars.next_if(char::is_ascii_digit) {
        digits.push(c);
    }
    digits
}
