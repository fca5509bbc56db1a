//! Identifier paths.
//!
//! An [`IdentPath`] is a name as written in source (`a::b::c`, `::root`).
//! A [`FullIdentPath`] is the root-anchored form every entity table is keyed
//! by. Turning one into the other depends on the scope stack and lives in
//! [`crate::scope::UnitParser::resolve`]; this module only provides the
//! per-base step of that algorithm.

use std::fmt;

/// A possibly qualified identifier as written in source.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct IdentPath {
    /// Final segment.
    pub name: String,
    /// Qualifying segments before `name`.
    pub path: Vec<String>,
    /// Written with a leading `::`.
    pub absolute: bool,
}

impl IdentPath {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            path: Vec::new(),
            absolute: false,
        }
    }

    /// Build from `::`-separated segments. The last segment is the name.
    pub fn from_segments<I, S>(segments: I, absolute: bool) -> Option<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut path: Vec<String> = segments.into_iter().map(Into::into).collect();
        let name = path.pop()?;
        Some(Self {
            name,
            path,
            absolute,
        })
    }

    /// A single, unqualified, relative name.
    pub fn is_single(&self) -> bool {
        self.path.is_empty() && !self.absolute
    }

    /// All segments, qualifier first.
    pub fn components(&self) -> Vec<String> {
        let mut out = self.path.clone();
        out.push(self.name.clone());
        out
    }
}

impl fmt::Display for IdentPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.absolute {
            f.write_str("::")?;
        }
        for segment in &self.path {
            write!(f, "{segment}::")?;
        }
        f.write_str(&self.name)
    }
}

impl From<&str> for IdentPath {
    fn from(value: &str) -> Self {
        let absolute = value.starts_with("::");
        let trimmed = value.trim_start_matches("::");
        Self::from_segments(trimmed.split("::"), absolute).unwrap_or_else(|| Self::new(trimmed))
    }
}

/// A fully-qualified, root-anchored path. The empty path is the root.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct FullIdentPath {
    pub path: Vec<String>,
}

impl FullIdentPath {
    pub fn new(path: Vec<String>) -> Self {
        Self { path }
    }

    pub fn root() -> Self {
        Self::default()
    }

    pub fn is_root(&self) -> bool {
        self.path.is_empty()
    }

    pub fn last(&self) -> Option<&str> {
        self.path.last().map(String::as_str)
    }

    /// Append one segment.
    pub fn join(&self, component: impl Into<String>) -> Self {
        let mut path = self.path.clone();
        path.push(component.into());
        Self { path }
    }

    fn extend(&self, components: &[String]) -> Self {
        let mut path = self.path.clone();
        path.extend_from_slice(components);
        Self { path }
    }

    /// Enclosing path; `None` for the root.
    pub fn parent(&self) -> Option<Self> {
        let (_, rest) = self.path.split_last()?;
        Some(Self {
            path: rest.to_vec(),
        })
    }

    pub fn ends_with(&self, suffix: &[String]) -> bool {
        self.path.ends_with(suffix)
    }

    /// Resolve `name` against this path taken as the enclosing namespace.
    ///
    /// A declaration (`existing == false`) appends the name textually. A
    /// lookup (`existing == true`) tries `self::name`, then each enclosing
    /// path up to the root, and returns the first candidate `is_declared`
    /// accepts. Absolute names ignore `self`.
    pub fn resolve<F>(&self, name: &IdentPath, existing: bool, is_declared: F) -> Option<Self>
    where
        F: Fn(&FullIdentPath) -> bool,
    {
        let components = name.components();
        if name.absolute {
            let candidate = Self::new(components);
            return (!existing || is_declared(&candidate)).then_some(candidate);
        }
        if !existing {
            return Some(self.extend(&components));
        }
        let mut base = Some(self.clone());
        while let Some(current) = base {
            let candidate = current.extend(&components);
            if is_declared(&candidate) {
                return Some(candidate);
            }
            base = current.parent();
        }
        None
    }

    /// Resolve a qualified `name` whose leading qualifier segments name the
    /// entity at this path, e.g. entity `app::ui` anchors `ui::Button` to
    /// `app::ui::Button`. The longest overlap wins. Unqualified and absolute
    /// names are never anchored.
    pub fn anchor(&self, name: &IdentPath) -> Option<Self> {
        if name.path.is_empty() || name.absolute {
            return None;
        }
        let max = self.path.len().min(name.path.len());
        (1..=max).rev().find_map(|overlap| {
            self.ends_with(&name.path[..overlap]).then(|| {
                let mut anchored = self.extend(&name.path[overlap..]);
                anchored.path.push(name.name.clone());
                anchored
            })
        })
    }
}

impl From<&IdentPath> for FullIdentPath {
    fn from(value: &IdentPath) -> Self {
        Self::new(value.components())
    }
}

impl From<&str> for FullIdentPath {
    fn from(value: &str) -> Self {
        if value.is_empty() {
            return Self::root();
        }
        Self::new(value.split("::").map(String::from).collect())
    }
}

impl fmt::Display for FullIdentPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.path.is_empty() {
            return f.write_str("::");
        }
        f.write_str(&self.path.join("::"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn declared(paths: &[&str]) -> impl Fn(&FullIdentPath) -> bool {
        let paths: Vec<FullIdentPath> = paths.iter().map(|p| FullIdentPath::from(*p)).collect();
        move |p| paths.contains(p)
    }

    #[test]
    fn parses_written_paths() {
        let path = IdentPath::from("a::b::c");
        assert_eq!(path.name, "c");
        assert_eq!(path.path, vec!["a", "b"]);
        assert!(!path.absolute);
        assert_eq!(path.to_string(), "a::b::c");

        let abs = IdentPath::from("::x");
        assert!(abs.absolute);
        assert!(!abs.is_single());
        assert_eq!(abs.to_string(), "::x");
        assert!(IdentPath::from("x").is_single());
    }

    #[test]
    fn declaration_appends() {
        let base = FullIdentPath::from("a::b");
        let resolved = base.resolve(&IdentPath::from("c::d"), false, |_| false);
        assert_eq!(resolved, Some(FullIdentPath::from("a::b::c::d")));
    }

    #[test]
    fn lookup_walks_upward() {
        let base = FullIdentPath::from("a::b");
        let is_declared = declared(&["a::x", "x", "a::b::y"]);
        assert_eq!(
            base.resolve(&IdentPath::from("x"), true, &is_declared),
            Some(FullIdentPath::from("a::x"))
        );
        assert_eq!(
            base.resolve(&IdentPath::from("y"), true, &is_declared),
            Some(FullIdentPath::from("a::b::y"))
        );
        assert_eq!(base.resolve(&IdentPath::from("z"), true, &is_declared), None);
    }

    #[test]
    fn lookup_reaches_root() {
        let base = FullIdentPath::from("ns");
        let is_declared = declared(&["int"]);
        assert_eq!(
            base.resolve(&IdentPath::from("int"), true, &is_declared),
            Some(FullIdentPath::from("int"))
        );
    }

    #[test]
    fn absolute_ignores_base() {
        let base = FullIdentPath::from("a");
        let is_declared = declared(&["x"]);
        assert_eq!(
            base.resolve(&IdentPath::from("::x"), true, &is_declared),
            Some(FullIdentPath::from("x"))
        );
        assert_eq!(base.resolve(&IdentPath::from("::y"), true, &is_declared), None);
    }

    #[test]
    fn resolution_is_deterministic() {
        let base = FullIdentPath::from("a::b");
        let is_declared = declared(&["a::x", "x"]);
        let name = IdentPath::from("x");
        let first = base.resolve(&name, true, &is_declared);
        for _ in 0..10 {
            assert_eq!(base.resolve(&name, true, &is_declared), first);
        }
    }

    #[test]
    fn anchors_on_longest_overlap() {
        let entity = FullIdentPath::from("app::ui");
        assert_eq!(
            entity.anchor(&IdentPath::from("ui::Button")),
            Some(FullIdentPath::from("app::ui::Button"))
        );
        assert_eq!(
            entity.anchor(&IdentPath::from("app::ui::Button")),
            Some(FullIdentPath::from("app::ui::Button"))
        );
        assert_eq!(entity.anchor(&IdentPath::from("other::Button")), None);
        assert_eq!(
            FullIdentPath::from("app").anchor(&IdentPath::from("app::ui::Button")),
            Some(FullIdentPath::from("app::ui::Button"))
        );
        assert_eq!(entity.anchor(&IdentPath::from("Button")), None);
    }

    #[test]
    fn join_and_parent() {
        let root = FullIdentPath::root();
        let a = root.join("a");
        assert_eq!(a.to_string(), "a");
        assert_eq!(a.parent(), Some(FullIdentPath::root()));
        assert_eq!(root.parent(), None);
        assert_eq!(root.to_string(), "::");
    }
}
