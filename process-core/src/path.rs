use std::fmt;

/// A dot-separated sequence of child ids addressing a descendant from the
/// composed root, used by `Process::resume`/`fail` (§4.1, §9).
///
/// Internally this is a list of segments; the dotted-string form is parsed
/// only at the API boundary (`NodePath::parse`), per §9's note that
/// implementations may keep a structural path internally and parse strings
/// only where the source format used one. Segment lookup is always by
/// child id, never by index.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash)]
pub struct NodePath {
    segments: Vec<String>,
}

impl NodePath {
    pub fn root() -> Self {
        Self { segments: Vec::new() }
    }

    pub fn parse(path: &str) -> Self {
        if path.is_empty() {
            return Self::root();
        }
        Self {
            segments: path.split('.').map(str::to_owned).collect(),
        }
    }

    pub fn from_segments(segments: Vec<String>) -> Self {
        Self { segments }
    }

    pub fn is_root(&self) -> bool {
        self.segments.is_empty()
    }

    /// Splits off the first segment, returning `(head, rest)`.
    pub fn split_first(&self) -> Option<(&str, NodePath)> {
        let (head, rest) = self.segments.split_first()?;
        Some((head.as_str(), NodePath::from_segments(rest.to_vec())))
    }

    pub fn push(&self, segment: impl Into<String>) -> NodePath {
        let mut segments = self.segments.clone();
        segments.push(segment.into());
        NodePath::from_segments(segments)
    }
}

impl fmt::Display for NodePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.segments.join("."))
    }
}

impl From<&str> for NodePath {
    fn from(value: &str) -> Self {
        NodePath::parse(value)
    }
}

impl From<String> for NodePath {
    fn from(value: String) -> Self {
        NodePath::parse(&value)
    }
}
