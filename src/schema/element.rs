use serde_json::{Map, Value};
use std::fmt;

/// Container kind a path element stores.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ContainerType {
    /// Nested map (`M`)
    Map,
    /// Ordered list (`L`)
    List,
    /// Set (`SS`/`NS`/`BS`), absent while empty
    Set,
    /// Any non container value
    Scalar,
}

/// Key of a single path element.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ElementKey {
    /// Attribute or map key
    Name(String),
    /// List position
    Index(usize),
}

impl fmt::Display for ElementKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ElementKey::Name(name) => write!(f, "{name}"),
            ElementKey::Index(index) => write!(f, "{index}"),
        }
    }
}

/// The atomic addressable unit of a [`Chain`].
///
/// An [`ElementKey::Index`] is only valid directly after an element whose
/// container type is [`ContainerType::List`]; the resolver enforces this.
#[derive(Debug, Clone, PartialEq)]
pub struct PathElement {
    key: ElementKey,
    container: ContainerType,
    custom_default: Option<Value>,
}

impl PathElement {
    /// Create an element addressing a named attribute.
    pub fn named(name: impl Into<String>, container: ContainerType) -> Self {
        Self {
            key: ElementKey::Name(name.into()),
            container,
            custom_default: None,
        }
    }

    /// Create an element addressing a list position.
    pub fn indexed(index: usize, container: ContainerType) -> Self {
        Self {
            key: ElementKey::Index(index),
            container,
            custom_default: None,
        }
    }

    /// Attach a custom default used by auto-initialisation.
    pub fn with_default(mut self, value: Option<Value>) -> Self {
        self.custom_default = value;
        self
    }

    /// Element key
    pub fn key(&self) -> &ElementKey {
        &self.key
    }

    /// Declared container type
    pub fn container(&self) -> ContainerType {
        self.container
    }

    /// Whether this element addresses a list position
    pub fn is_index(&self) -> bool {
        matches!(self.key, ElementKey::Index(_))
    }

    /// Value written when this element has to be created.
    pub fn default_value(&self) -> Value {
        if let Some(value) = &self.custom_default {
            return value.clone();
        }

        match self.container {
            ContainerType::Map => Value::Object(Map::new()),
            ContainerType::List | ContainerType::Set => Value::Array(Vec::new()),
            ContainerType::Scalar => Value::Null,
        }
    }
}

/// Ordered sequence of elements identifying one nested location of a record.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Chain {
    elements: Vec<PathElement>,
}

impl Chain {
    /// Build a chain from its elements.
    pub fn new(elements: Vec<PathElement>) -> Self {
        Self { elements }
    }

    /// Elements in root-to-leaf order
    pub fn elements(&self) -> &[PathElement] {
        &self.elements
    }

    /// Number of elements
    pub fn len(&self) -> usize {
        self.elements.len()
    }

    /// Whether the chain addresses nothing
    pub fn is_empty(&self) -> bool {
        self.elements.is_empty()
    }

    /// Leaf element
    pub fn last(&self) -> Option<&PathElement> {
        self.elements.last()
    }

    /// Append an element.
    pub fn push(&mut self, element: PathElement) {
        self.elements.push(element);
    }

    /// Chain made of the first `len` elements.
    pub fn prefix(&self, len: usize) -> Chain {
        Chain {
            elements: self.elements[..len.min(self.elements.len())].to_vec(),
        }
    }

    /// Whether `self` is a strict ancestor of `other`.
    pub fn is_ancestor_of(&self, other: &Chain) -> bool {
        self.len() < other.len()
            && self
                .elements
                .iter()
                .zip(other.elements.iter())
                .all(|(a, b)| a.key == b.key)
    }

    /// Whether both chains address the same location.
    pub fn same_location(&self, other: &Chain) -> bool {
        self.len() == other.len()
            && self
                .elements
                .iter()
                .zip(other.elements.iter())
                .all(|(a, b)| a.key == b.key)
    }

    /// Whether the chain is exactly the one-element chain for `field`.
    pub fn is_single_field(&self, field: &str) -> bool {
        matches!(self.elements.as_slice(), [only] if only.key == ElementKey::Name(field.to_string()))
    }

    /// Element keys in root-to-leaf order.
    ///
    /// Two chains have equal keys exactly when they address the same
    /// location, which the joined path cannot promise once a map key holds
    /// a `.` or `[`.
    pub fn keys(&self) -> Vec<ElementKey> {
        self.elements.iter().map(|element| element.key.clone()).collect()
    }

    /// Readable form for logs and errors, e.g. `profile.items[2].name`.
    pub fn joined_path(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for Chain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, element) in self.elements.iter().enumerate() {
            match &element.key {
                ElementKey::Index(index) => write!(f, "[{index}]")?,
                ElementKey::Name(name) if i == 0 => write!(f, "{name}")?,
                ElementKey::Name(name) => write!(f, ".{name}")?,
            }
        }
        Ok(())
    }
}

impl From<Vec<PathElement>> for Chain {
    fn from(elements: Vec<PathElement>) -> Self {
        Self::new(elements)
    }
}
