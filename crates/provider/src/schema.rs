//! Terraform schema construction
//!
//! Builds the tfplugin6 `Schema` messages advertised by GetProviderSchema.

use crate::tfplugin6::{schema, Schema, StringKind};

/// cty type of an attribute, rendered as Terraform's JSON type notation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttrType {
    String,
    Number,
    ListOfString,
}

impl AttrType {
    pub fn type_json(self) -> &'static [u8] {
        match self {
            AttrType::String => br#""string""#,
            AttrType::Number => br#""number""#,
            AttrType::ListOfString => br#"["list","string"]"#,
        }
    }
}

/// Builder for a single schema attribute
#[derive(Debug, Clone)]
pub struct AttributeBuilder {
    inner: schema::Attribute,
}

impl AttributeBuilder {
    pub fn new(name: &str, ty: AttrType) -> Self {
        Self {
            inner: schema::Attribute {
                name: name.to_string(),
                r#type: ty.type_json().to_vec(),
                description_kind: StringKind::Markdown as i32,
                ..Default::default()
            },
        }
    }

    pub fn description(mut self, text: &str) -> Self {
        self.inner.description = text.to_string();
        self
    }

    pub fn optional(mut self) -> Self {
        self.inner.optional = true;
        self
    }

    pub fn computed(mut self) -> Self {
        self.inner.computed = true;
        self
    }

    pub fn sensitive(mut self) -> Self {
        self.inner.sensitive = true;
        self
    }

    pub fn write_only(mut self) -> Self {
        self.inner.write_only = true;
        self
    }

    pub fn build(self) -> schema::Attribute {
        self.inner
    }
}

/// Wrap attributes into a versioned schema
pub fn block_schema(version: i64, description: &str, attributes: Vec<schema::Attribute>) -> Schema {
    Schema {
        version,
        block: Some(schema::Block {
            version,
            attributes,
            description: description.to_string(),
            description_kind: StringKind::Markdown as i32,
            deprecated: false,
        }),
    }
}

/// The provider block takes no configuration
pub fn provider_schema() -> Schema {
    block_schema(0, "", vec![])
}
