//! Node schemas the host uses to build its node menu and wire sockets.

use serde::Serialize;

/// Socket type carrying a loaded BiRefNet model between nodes.
pub const MODEL_TYPE: &str = "BiRefNetMODEL";
/// Socket type of `[N, H, W, C]` image batches.
pub const IMAGE_TYPE: &str = "IMAGE";
/// Socket type of `[N, H, W]` mask batches.
pub const MASK_TYPE: &str = "MASK";

/// Kind of value an input socket accepts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum InputKind {
    /// One of a fixed list of strings, shown as a dropdown.
    Choice { options: Vec<String> },
    /// A value produced by another node's output of this type.
    Socket {
        #[serde(rename = "type")]
        type_name: String,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InputSpec {
    pub name: String,
    #[serde(flatten)]
    pub kind: InputKind,
}

impl InputSpec {
    pub fn choice<I, S>(name: &str, options: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            name: name.to_owned(),
            kind: InputKind::Choice {
                options: options.into_iter().map(Into::into).collect(),
            },
        }
    }

    pub fn socket(name: &str, type_name: &str) -> Self {
        Self {
            name: name.to_owned(),
            kind: InputKind::Socket {
                type_name: type_name.to_owned(),
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OutputSpec {
    #[serde(rename = "type")]
    pub type_name: String,
    pub name: String,
}

impl OutputSpec {
    pub fn new(type_name: &str, name: &str) -> Self {
        Self {
            type_name: type_name.to_owned(),
            name: name.to_owned(),
        }
    }
}

/// Everything the host needs to present and call a node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NodeSchema {
    pub class_name: String,
    pub display_name: String,
    pub category: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Required inputs, in socket order.
    pub inputs: Vec<InputSpec>,
    pub outputs: Vec<OutputSpec>,
    /// Name of the entry point the host invokes.
    pub function: String,
}

impl NodeSchema {
    pub fn input(&self, name: &str) -> Option<&InputSpec> {
        self.inputs.iter().find(|input| input.name == name)
    }
}
