use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Schema of the arguments a provider accepts.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArgSchema {
    /// Arguments keyed by identifier.
    pub args: BTreeMap<String, ArgDescriptor>,
}

impl ArgSchema {
    /// Adds one argument descriptor.
    #[must_use]
    pub fn with_arg(mut self, descriptor: ArgDescriptor) -> Self {
        self.args.insert(descriptor.id.clone(), descriptor);
        self
    }
}

/// Description of one argument.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArgDescriptor {
    /// Argument key used in grant `with` maps.
    pub id: String,
    /// Display title.
    pub title: String,
    /// Optional longer description.
    pub description: Option<String>,
    /// Whether every grant must carry this argument.
    pub required: bool,
    /// Whether the provider can enumerate values.
    pub has_options: bool,
    /// Option groups usable as filters, keyed by group identifier.
    pub groups: BTreeMap<String, ArgGroupDescriptor>,
}

impl ArgDescriptor {
    /// Creates a required argument without groups.
    #[must_use]
    pub fn required(id: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            description: None,
            required: true,
            has_options: false,
            groups: BTreeMap::new(),
        }
    }

    /// Sets the description.
    #[must_use]
    pub fn described(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Marks the argument as enumerable.
    #[must_use]
    pub fn with_options(mut self) -> Self {
        self.has_options = true;
        self
    }

    /// Adds one option group.
    #[must_use]
    pub fn with_group(mut self, group: ArgGroupDescriptor) -> Self {
        self.groups.insert(group.id.clone(), group);
        self
    }
}

/// Description of one option group.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArgGroupDescriptor {
    /// Group identifier.
    pub id: String,
    /// Display title.
    pub title: String,
    /// Optional longer description.
    pub description: Option<String>,
}

/// One selectable argument value.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ArgOption {
    /// Value placed in the grant `with` map.
    pub value: String,
    /// Display label.
    pub label: String,
    /// Optional description.
    pub description: Option<String>,
}

/// One group value and the option values it contains.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArgGroupOption {
    /// Group value used in filters.
    pub value: String,
    /// Display label.
    pub label: String,
    /// Option values belonging to the group.
    pub children: Vec<String>,
}

/// Options for one argument plus the groups they fall into.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArgOptions {
    /// Selectable values.
    pub options: Vec<ArgOption>,
    /// Group values keyed by group identifier.
    pub groups: BTreeMap<String, Vec<ArgGroupOption>>,
}
