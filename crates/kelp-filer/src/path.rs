//! Paths within the filer namespace.

use std::fmt;

use lazy_static::lazy_static;
use regex::Regex;

/// Path separator used by the filer namespace, independent of the local OS.
pub const PATH_SEPARATOR: char = '/';

lazy_static! {
    static ref FILE_FRAGMENT: Regex = Regex::new(r"\.part$").expect("fragment pattern");
    static ref TEMP_RESOURCE: Regex = Regex::new(r"(^|/)\.uploads(/|$)").expect("temp pattern");
    static ref SYSTEM_RESOURCE: Regex = Regex::new(r"^/topics(/|$)").expect("system pattern");
}

/// An absolute path within the filer namespace.
///
/// Besides the usual directory/name accessors, the path knows how to
/// classify the special resources the event pipeline must treat differently:
/// file fragments (`*.part`), temporary upload areas (`**/.uploads/**`) and
/// system resources (`/topics/**`).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FilerPath(String);

impl FilerPath {
    pub fn new(path: impl Into<String>) -> Self {
        Self(path.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The directory portion of the path, `/` for top-level entries.
    pub fn dir(&self) -> &str {
        let trimmed = self.0.trim_end_matches(PATH_SEPARATOR);
        match trimmed.rfind(PATH_SEPARATOR) {
            Some(0) => "/",
            Some(idx) => &trimmed[..idx],
            None => "/",
        }
    }

    /// The file or directory name, the last path element.
    pub fn name(&self) -> &str {
        let trimmed = self.0.trim_end_matches(PATH_SEPARATOR);
        if trimmed.is_empty() {
            return "/";
        }
        match trimmed.rfind(PATH_SEPARATOR) {
            Some(idx) => &trimmed[idx + 1..],
            None => trimmed,
        }
    }

    /// The root element of the path, e.g. `/buckets` for `/buckets/a/b`.
    pub fn root(&self) -> String {
        match self.split().first() {
            Some(first) => format!("/{first}"),
            None => "/".to_string(),
        }
    }

    /// The non-empty path elements.
    pub fn split(&self) -> Vec<&str> {
        self.0
            .split(PATH_SEPARATOR)
            .filter(|s| !s.is_empty())
            .collect()
    }

    /// Reports whether the path is its own root.
    pub fn is_root(&self) -> bool {
        self.root() == self.0
    }

    /// Reports whether the name marks a fragment, a piece of a larger
    /// logical upload.
    pub fn is_file_fragment(&self) -> bool {
        FILE_FRAGMENT.is_match(self.name())
    }

    /// Reports whether the path lies in a temporary upload area.
    pub fn is_temp_resource(&self) -> bool {
        TEMP_RESOURCE.is_match(&self.0)
    }

    /// Reports whether the path addresses a system resource.
    pub fn is_system_resource(&self) -> bool {
        SYSTEM_RESOURCE.is_match(&self.0)
    }
}

impl fmt::Display for FilerPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for FilerPath {
    fn from(path: &str) -> Self {
        Self(path.to_string())
    }
}

impl From<String> for FilerPath {
    fn from(path: String) -> Self {
        Self(path)
    }
}

/// Normalizes `name` into an absolute, cleaned path: redundant separators
/// and `.` elements are dropped, `..` pops the previous element.
pub(crate) fn clean(name: &str) -> String {
    let mut parts: Vec<&str> = Vec::new();
    for element in name.trim().split(PATH_SEPARATOR) {
        match element {
            "" | "." => {}
            ".." => {
                parts.pop();
            }
            element => parts.push(element),
        }
    }
    if parts.is_empty() {
        "/".to_string()
    } else {
        format!("/{}", parts.join("/"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dir_and_name() {
        let p = FilerPath::from("/buckets/a/b.txt");
        assert_eq!(p.dir(), "/buckets/a");
        assert_eq!(p.name(), "b.txt");
        assert_eq!(p.root(), "/buckets");
        assert!(!p.is_root());

        let top = FilerPath::from("/buckets");
        assert_eq!(top.dir(), "/");
        assert_eq!(top.name(), "buckets");
        assert!(top.is_root());
    }

    #[test]
    fn split_skips_empty_elements() {
        assert_eq!(
            FilerPath::from("/buckets//a/").split(),
            vec!["buckets", "a"]
        );
    }

    #[test]
    fn fragment_classification() {
        assert!(FilerPath::from("/buckets/a/segment.part").is_file_fragment());
        assert!(!FilerPath::from("/buckets/a/segment.partial").is_file_fragment());
        assert!(!FilerPath::from("/buckets/a/part").is_file_fragment());
    }

    #[test]
    fn temp_resource_classification() {
        assert!(FilerPath::from("/buckets/a/.uploads/x").is_temp_resource());
        assert!(FilerPath::from("/buckets/.uploads").is_temp_resource());
        assert!(!FilerPath::from("/buckets/a/uploads/x").is_temp_resource());
        assert!(!FilerPath::from("/buckets/a/my.uploadsish").is_temp_resource());
    }

    #[test]
    fn system_resource_classification() {
        assert!(FilerPath::from("/topics/t1").is_system_resource());
        assert!(FilerPath::from("/topics").is_system_resource());
        assert!(!FilerPath::from("/buckets/topics/x").is_system_resource());
        assert!(!FilerPath::from("/topicsish").is_system_resource());
    }

    #[test]
    fn clean_normalizes() {
        assert_eq!(clean("buckets/a/b.txt"), "/buckets/a/b.txt");
        assert_eq!(clean("/buckets//a/./b.txt"), "/buckets/a/b.txt");
        assert_eq!(clean("/buckets/a/../c"), "/buckets/c");
        assert_eq!(clean(""), "/");
        assert_eq!(clean("/.."), "/");
    }
}
