//! Construct paths and the logical IDs derived from them.
//!
//! Logical IDs follow the construct framework's scheme so synthesized
//! templates line up with ones produced by the original application: a
//! human-readable prefix built from the path plus an 8-digit MD5 suffix.

use std::fmt;

const HIDDEN_ID: &str = "Default";
const HIDDEN_FROM_HUMAN_ID: &str = "Resource";
const PATH_SEP: &str = "/";
const HASH_LEN: usize = 8;
const MAX_HUMAN_LEN: usize = 240;
const MAX_ID_LEN: usize = 255;

/// Compute the logical ID for a path relative to its stack.
///
/// ```rust
/// use cloudlab::template::make_unique_id;
///
/// assert_eq!(make_unique_id(&["WebServerSG"]), "WebServerSG");
/// assert!(make_unique_id(&["cdk_lab_vpc", "Resource"]).starts_with("cdklabvpc"));
/// ```
pub fn make_unique_id<S: AsRef<str>>(components: &[S]) -> String {
    let components: Vec<&str> = components
        .iter()
        .map(|c| c.as_ref())
        .filter(|c| *c != HIDDEN_ID)
        .collect();

    if components.is_empty() {
        return String::new();
    }

    if components.len() == 1 {
        let candidate = remove_non_alphanumeric(components[0]);
        if candidate.len() <= MAX_ID_LEN {
            return candidate;
        }
    }

    let hash = path_hash(&components);
    let human: String = remove_dupes(&components)
        .into_iter()
        .filter(|c| *c != HIDDEN_FROM_HUMAN_ID)
        .map(remove_non_alphanumeric)
        .collect::<String>()
        .chars()
        .take(MAX_HUMAN_LEN)
        .collect();

    human + &hash
}

/// First eight hex digits (uppercase) of the MD5 of the joined path.
fn path_hash(components: &[&str]) -> String {
    let digest = md5::compute(components.join(PATH_SEP));
    format!("{:x}", digest)[..HASH_LEN].to_uppercase()
}

/// Drop a component when the previous one already ends with it.
fn remove_dupes<'a>(components: &[&'a str]) -> Vec<&'a str> {
    let mut out: Vec<&str> = Vec::with_capacity(components.len());
    for &component in components {
        match out.last() {
            Some(prev) if prev.ends_with(component) => {}
            _ => out.push(component),
        }
    }
    out
}

fn remove_non_alphanumeric(s: &str) -> String {
    s.chars().filter(char::is_ascii_alphanumeric).collect()
}

/// Location of a construct: the stack it belongs to plus its path inside it.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ConstructPath {
    stack: String,
    components: Vec<String>,
}

impl ConstructPath {
    /// The stack itself.
    pub fn stack(stack: impl Into<String>) -> Self {
        Self {
            stack: stack.into(),
            components: Vec::new(),
        }
    }

    /// A child construct.
    pub fn child(&self, id: impl Into<String>) -> Self {
        let mut components = self.components.clone();
        components.push(id.into());
        Self {
            stack: self.stack.clone(),
            components,
        }
    }

    /// Name of the owning stack.
    pub fn stack_name(&self) -> &str {
        &self.stack
    }

    /// Components below the stack.
    pub fn components(&self) -> &[String] {
        &self.components
    }

    /// Logical ID of the construct in its stack's template.
    pub fn logical_id(&self) -> String {
        make_unique_id(&self.components)
    }
}

impl fmt::Display for ConstructPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.stack)?;
        for component in &self.components {
            write!(f, "{}{}", PATH_SEP, component)?;
        }
        Ok(())
    }
}
