use serde::Serialize;
use serde_json::{json, Value};

/// Field reference names used in work item patches.
pub mod fields {
    pub const TITLE: &str = "System.Title";
    pub const STATE: &str = "System.State";
    pub const TAGS: &str = "System.Tags";
    pub const ASSIGNED_TO: &str = "System.AssignedTo";
    pub const CREATED_BY: &str = "System.CreatedBy";
    pub const CREATED_DATE: &str = "System.CreatedDate";
    pub const CHANGED_BY: &str = "System.ChangedBy";
    pub const DESCRIPTION: &str = "System.Description";
    pub const HISTORY: &str = "System.History";
    pub const PRIORITY: &str = "Microsoft.VSTS.Common.Priority";
    pub const CLOSED_DATE: &str = "Microsoft.VSTS.Common.ClosedDate";
    pub const REPRO_STEPS: &str = "Microsoft.VSTS.TCM.ReproSteps";
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Op {
    Add,
    Replace,
    Remove,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PatchOperation {
    pub op: Op,
    pub path: String,
    #[serde(skip_serializing_if = "Value::is_null")]
    pub value: Value,
}

/// A link from a work item to an attachment or another work item.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Relation {
    pub rel: &'static str,
    pub url: String,
    pub attributes: Value,
}

impl Relation {
    pub fn attached_file(url: &str) -> Self {
        Self {
            rel: "AttachedFile",
            url: url.to_string(),
            attributes: json!({ "comment": "" }),
        }
    }

    /// Makes the work item at `url` the parent of the patched item.
    pub fn parent(url: &str) -> Self {
        Self {
            rel: "System.LinkTypes.Hierarchy-Reverse",
            url: url.to_string(),
            attributes: json!({ "isLocked": false, "name": "Parent" }),
        }
    }

    pub fn related(url: &str) -> Self {
        Self {
            rel: "System.LinkTypes.Related",
            url: url.to_string(),
            attributes: json!({ "isLocked": false, "name": "Related" }),
        }
    }
}

/// Ordered JSON-Patch document sent to create or update a work item.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct PatchDocument(Vec<PatchOperation>);

impl PatchDocument {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_field(self, field: &str, value: impl Into<Value>) -> Self {
        self.push(Op::Add, format!("/fields/{field}"), value.into())
    }

    pub fn replace_field(self, field: &str, value: impl Into<Value>) -> Self {
        self.push(Op::Replace, format!("/fields/{field}"), value.into())
    }

    #[cfg(test)]
    pub fn remove_field(self, field: &str) -> Self {
        self.push(Op::Remove, format!("/fields/{field}"), Value::Null)
    }

    pub fn add_relation(self, relation: Relation) -> Self {
        self.push(Op::Add, "/relations/-".to_string(), json!(relation))
    }

    fn push(mut self, op: Op, path: String, value: Value) -> Self {
        self.0.push(PatchOperation { op, path, value });
        self
    }

    pub fn operations(&self) -> &[PatchOperation] {
        &self.0
    }

    /// Value of the first operation touching `field`, if any.
    #[cfg(test)]
    pub fn field_value(&self, field: &str) -> Option<&Value> {
        let path = format!("/fields/{field}");
        self.0.iter().find(|o| o.path == path).map(|o| &o.value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serializes_as_json_patch_array() {
        let doc = PatchDocument::new()
            .add_field(fields::TITLE, "Crash on save")
            .replace_field(fields::PRIORITY, 2);
        let value = serde_json::to_value(&doc).unwrap();
        assert_eq!(
            value,
            json!([
                { "op": "add", "path": "/fields/System.Title", "value": "Crash on save" },
                { "op": "replace", "path": "/fields/Microsoft.VSTS.Common.Priority", "value": 2 }
            ])
        );
    }

    #[test]
    fn quotes_and_markup_survive_serialization() {
        let text = "it's <b>\"bold\"</b>\n\\path";
        let doc = PatchDocument::new().replace_field(fields::DESCRIPTION, text);
        let wire = serde_json::to_string(&doc).unwrap();
        let back: Value = serde_json::from_str(&wire).unwrap();
        assert_eq!(back[0]["value"], text);
    }

    #[test]
    fn remove_has_no_value() {
        let doc = PatchDocument::new().remove_field(fields::TAGS);
        let value = serde_json::to_value(&doc).unwrap();
        assert_eq!(value, json!([{ "op": "remove", "path": "/fields/System.Tags" }]));
    }

    #[test]
    fn relations_append_to_list() {
        let doc = PatchDocument::new().add_relation(Relation::parent("https://az/wi/7"));
        let value = serde_json::to_value(&doc).unwrap();
        assert_eq!(value[0]["path"], "/relations/-");
        assert_eq!(value[0]["value"]["rel"], "System.LinkTypes.Hierarchy-Reverse");
        assert_eq!(value[0]["value"]["attributes"]["name"], "Parent");
    }

    #[test]
    fn field_value_finds_first_match() {
        let doc = PatchDocument::new()
            .add_field(fields::STATE, "New")
            .add_field(fields::TITLE, "x");
        assert_eq!(doc.field_value(fields::TITLE), Some(&json!("x")));
        assert_eq!(doc.field_value(fields::HISTORY), None);
    }
}
