//! `wodata_wo_data` resource handler
//!
//! Captures the write-only `input_wo` into the computed `output`. After
//! creation the input is only recaptured when `input_wo_version` changes,
//! since a write-only value never reaches state and cannot be diffed.

use tracing::{debug, trace};

use super::{PlannedChange, Resource};
use crate::error::{Error, Result};
use crate::id::generate_id;
use crate::schema::{block_schema, AttrType, AttributeBuilder};
use crate::state::{make_state, string_value, DynamicValue};
use crate::tfplugin6::{AttributePath, Diagnostic, Schema};

pub const TYPE_NAME: &str = "wodata_wo_data";
pub const ID_PREFIX: &str = "wo_data_";

const ID: &str = "id";
const INPUT_WO: &str = "input_wo";
const INPUT_WO_VERSION: &str = "input_wo_version";
const TRIGGERS_REPLACE: &str = "triggers_replace";
const OUTPUT: &str = "output";

/// Attribute values of one `wodata_wo_data` instance.
///
/// Fields stay as dynamic values because plans carry unknowns.
#[derive(Debug, Clone, PartialEq)]
pub struct WoDataModel {
    pub id: DynamicValue,
    pub input_wo: DynamicValue,
    pub input_wo_version: DynamicValue,
    pub triggers_replace: DynamicValue,
    pub output: DynamicValue,
}

impl WoDataModel {
    /// Read the model out of an object value, type-checking each attribute.
    /// Attributes the schema does not know are ignored; missing ones are null.
    pub fn from_value(value: &DynamicValue) -> Result<Self> {
        if !matches!(value, DynamicValue::Map(_) | DynamicValue::Null) {
            return Err(Error::AttributeType {
                name: TYPE_NAME.to_string(),
                expected: "object".to_string(),
            });
        }

        Ok(Self {
            id: checked_string(value, ID)?,
            input_wo: checked_string(value, INPUT_WO)?,
            input_wo_version: checked_number(value, INPUT_WO_VERSION)?,
            triggers_replace: checked_string_list(value, TRIGGERS_REPLACE)?,
            output: checked_string(value, OUTPUT)?,
        })
    }

    pub fn into_value(self) -> DynamicValue {
        make_state(vec![
            (ID, self.id),
            (INPUT_WO, self.input_wo),
            (INPUT_WO_VERSION, self.input_wo_version),
            (TRIGGERS_REPLACE, self.triggers_replace),
            (OUTPUT, self.output),
        ])
    }

    /// Whether the planned version asks for the input to be captured again
    fn version_changed(&self, planned: &WoDataModel) -> bool {
        planned.input_wo_version.is_unknown()
            || !self.input_wo_version.same_as(&planned.input_wo_version)
    }
}

fn checked_string(value: &DynamicValue, name: &str) -> Result<DynamicValue> {
    let attr = value.attr(name);
    match attr {
        DynamicValue::Null | DynamicValue::Unknown | DynamicValue::String(_) => Ok(attr),
        _ => Err(type_error(name, "string")),
    }
}

fn checked_number(value: &DynamicValue, name: &str) -> Result<DynamicValue> {
    let attr = value.attr(name);
    match attr {
        DynamicValue::Null | DynamicValue::Unknown | DynamicValue::Number(_) => Ok(attr),
        // cty sends numbers that do not fit a float as strings
        DynamicValue::String(ref s) => s
            .parse::<f64>()
            .ok()
            .and_then(serde_json::Number::from_f64)
            .map(DynamicValue::Number)
            .ok_or_else(|| type_error(name, "number")),
        _ => Err(type_error(name, "number")),
    }
}

fn checked_string_list(value: &DynamicValue, name: &str) -> Result<DynamicValue> {
    let attr = value.attr(name);
    let valid = match &attr {
        DynamicValue::Null | DynamicValue::Unknown => true,
        DynamicValue::List(items) => items.iter().all(|item| {
            matches!(
                item,
                DynamicValue::Null | DynamicValue::Unknown | DynamicValue::String(_)
            )
        }),
        _ => false,
    };

    if valid {
        Ok(attr)
    } else {
        Err(type_error(name, "list of strings"))
    }
}

fn type_error(name: &str, expected: &str) -> Error {
    Error::AttributeType {
        name: name.to_string(),
        expected: expected.to_string(),
    }
}

/// Output planned for a fresh capture: unknown until apply reads the input
fn planned_capture(config: &WoDataModel) -> DynamicValue {
    if config.input_wo.is_null() {
        DynamicValue::Null
    } else {
        DynamicValue::Unknown
    }
}

/// Input value taken from configuration at apply time
fn applied_input(config: &WoDataModel) -> Result<DynamicValue> {
    if config.input_wo.is_unknown() {
        return Err(type_error(INPUT_WO, "known string during apply"));
    }
    Ok(config.input_wo.clone())
}

pub struct WoDataResource;

impl Resource for WoDataResource {
    fn type_name(&self) -> &'static str {
        TYPE_NAME
    }

    fn schema(&self) -> Schema {
        block_schema(
            0,
            "A resource that mimics terraform_data with write-only input support.",
            vec![
                AttributeBuilder::new(ID, AttrType::String)
                    .description("Unique identifier")
                    .computed()
                    .build(),
                AttributeBuilder::new(INPUT_WO, AttrType::String)
                    .description(
                        "Write-only input that accepts ephemeral values. The value is stored in `output`.",
                    )
                    .optional()
                    .sensitive()
                    .write_only()
                    .build(),
                AttributeBuilder::new(INPUT_WO_VERSION, AttrType::Number)
                    .description("When changed, triggers re-capture of the input_wo value.")
                    .optional()
                    .build(),
                AttributeBuilder::new(TRIGGERS_REPLACE, AttrType::ListOfString)
                    .description("Forces replacement when value changes.")
                    .optional()
                    .build(),
                AttributeBuilder::new(OUTPUT, AttrType::String)
                    .description("The captured value from input_wo.")
                    .computed()
                    .build(),
            ],
        )
    }

    fn validate(&self, config: &DynamicValue, write_only_allowed: bool) -> Vec<Diagnostic> {
        let model = match WoDataModel::from_value(config) {
            Ok(model) => model,
            Err(e) => return vec![Diagnostic::error("Invalid resource configuration", e.to_string())],
        };

        if !write_only_allowed && !model.input_wo.is_null() {
            return vec![Diagnostic::error(
                "WriteOnly Attribute Not Allowed",
                format!(
                    "The resource contains a non-null value for WriteOnly attribute {}. \
                     Write-only attributes are only supported in Terraform 1.11 and later.",
                    INPUT_WO
                ),
            )
            .with_attribute(AttributePath::root(INPUT_WO))];
        }

        vec![]
    }

    fn plan(
        &self,
        prior: &DynamicValue,
        proposed: &DynamicValue,
        config: &DynamicValue,
    ) -> Result<PlannedChange> {
        if proposed.is_null() {
            return Ok(PlannedChange::destroy());
        }

        let mut planned = WoDataModel::from_value(proposed)?;
        let config = WoDataModel::from_value(config)?;
        planned.input_wo = DynamicValue::Null;

        if prior.is_null() {
            planned.id = DynamicValue::Unknown;
            planned.output = planned_capture(&config);
            return Ok(PlannedChange::in_place(planned.into_value()));
        }

        let prior = WoDataModel::from_value(prior)?;

        if !prior.triggers_replace.same_as(&planned.triggers_replace) {
            debug!("{} triggers changed, planning replacement", TYPE_NAME);
            planned.id = DynamicValue::Unknown;
            planned.output = planned_capture(&config);
            return Ok(PlannedChange {
                planned_state: planned.into_value(),
                requires_replace: vec![TRIGGERS_REPLACE],
            });
        }

        planned.output = if prior.version_changed(&planned) {
            planned_capture(&config)
        } else {
            prior.output.clone()
        };
        planned.id = prior.id;

        Ok(PlannedChange::in_place(planned.into_value()))
    }

    fn create(&self, planned: &DynamicValue, config: &DynamicValue) -> Result<DynamicValue> {
        let mut state = WoDataModel::from_value(planned)?;
        let config = WoDataModel::from_value(config)?;

        if state.id.as_string().is_none() {
            state.id = string_value(generate_id(ID_PREFIX));
        }
        state.output = applied_input(&config)?;
        state.input_wo = DynamicValue::Null;

        trace!("created a {} resource", TYPE_NAME);
        Ok(state.into_value())
    }

    fn read(&self, state: &DynamicValue) -> Result<DynamicValue> {
        let mut state = WoDataModel::from_value(state)?;
        state.input_wo = DynamicValue::Null;
        Ok(state.into_value())
    }

    fn update(
        &self,
        prior: &DynamicValue,
        planned: &DynamicValue,
        config: &DynamicValue,
    ) -> Result<DynamicValue> {
        let prior = WoDataModel::from_value(prior)?;
        let mut state = WoDataModel::from_value(planned)?;
        let config = WoDataModel::from_value(config)?;

        state.output = if prior.version_changed(&state) {
            debug!("{} input version changed, recapturing input", TYPE_NAME);
            applied_input(&config)?
        } else {
            prior.output.clone()
        };
        state.id = prior.id;
        state.input_wo = DynamicValue::Null;

        Ok(state.into_value())
    }

    fn delete(&self, state: &DynamicValue) -> Result<()> {
        WoDataModel::from_value(state)?;
        Ok(())
    }

    fn import(&self, id: &str) -> Result<DynamicValue> {
        let state = WoDataModel {
            id: string_value(id),
            input_wo: DynamicValue::Null,
            input_wo_version: DynamicValue::Null,
            triggers_replace: DynamicValue::Null,
            output: DynamicValue::Null,
        };
        Ok(state.into_value())
    }

    fn upgrade(&self, version: i64, raw: &DynamicValue) -> Result<DynamicValue> {
        if version != 0 {
            return Err(Error::UnsupportedStateVersion(version));
        }
        let mut state = WoDataModel::from_value(raw)?;
        state.input_wo = DynamicValue::Null;
        Ok(state.into_value())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::{decode_dynamic_value, int_value, null_value};

    fn config(input: Option<&str>, version: Option<i64>, triggers: &[&str]) -> DynamicValue {
        make_state(vec![
            (ID, null_value()),
            (INPUT_WO, input.map(string_value).unwrap_or_default()),
            (INPUT_WO_VERSION, version.map(int_value).unwrap_or_default()),
            (
                TRIGGERS_REPLACE,
                if triggers.is_empty() {
                    null_value()
                } else {
                    DynamicValue::List(triggers.iter().map(|t| string_value(*t)).collect())
                },
            ),
            (OUTPUT, null_value()),
        ])
    }

    /// What Terraform proposes: config values with write-only nulled and
    /// computed attributes taken from prior state.
    fn proposed(config: &DynamicValue, prior: &DynamicValue) -> DynamicValue {
        let mut model = WoDataModel::from_value(config).unwrap();
        model.input_wo = DynamicValue::Null;
        model.id = prior.attr(ID);
        model.output = prior.attr(OUTPUT);
        model.into_value()
    }

    fn apply(prior: &DynamicValue, config: &DynamicValue) -> (PlannedChange, DynamicValue) {
        let resource = WoDataResource;
        let change = resource.plan(prior, &proposed(config, prior), config).unwrap();
        let state = if prior.is_null() || !change.requires_replace.is_empty() {
            let plan = resource
                .plan(&DynamicValue::Null, &proposed(config, &DynamicValue::Null), config)
                .unwrap();
            resource.create(&plan.planned_state, config).unwrap()
        } else {
            resource.update(prior, &change.planned_state, config).unwrap()
        };
        (change, state)
    }

    #[test]
    fn test_create_captures_input() {
        let (change, state) = apply(&DynamicValue::Null, &config(Some("test-value"), None, &[]));

        assert!(change.planned_state.attr(ID).is_unknown());
        assert!(change.planned_state.attr(OUTPUT).is_unknown());
        assert_eq!(state.attr(OUTPUT), string_value("test-value"));
        let id = state.attr(ID);
        let id = id.as_string().unwrap();
        assert!(id.starts_with(ID_PREFIX));
        assert_eq!(id.len(), 24);
        assert!(state.attr(INPUT_WO).is_null());
    }

    #[test]
    fn test_create_without_input_leaves_output_null() {
        let (change, state) = apply(&DynamicValue::Null, &config(None, None, &[]));

        assert!(change.planned_state.attr(OUTPUT).is_null());
        assert!(state.attr(OUTPUT).is_null());
        assert!(state.attr(ID).as_string().is_some());
    }

    #[test]
    fn test_unchanged_version_keeps_output() {
        let (_, first) = apply(&DynamicValue::Null, &config(Some("v1"), Some(1), &[]));
        let (change, second) = apply(&first, &config(Some("different"), Some(1), &[]));

        assert!(change.requires_replace.is_empty());
        assert_eq!(change.planned_state, first);
        assert_eq!(second, first);
    }

    #[test]
    fn test_changed_version_recaptures() {
        let (_, first) = apply(&DynamicValue::Null, &config(Some("v1"), Some(1), &[]));
        let (change, second) = apply(&first, &config(Some("v2"), Some(2), &[]));

        assert!(change.planned_state.attr(OUTPUT).is_unknown());
        assert_eq!(change.planned_state.attr(ID), first.attr(ID));
        assert_eq!(second.attr(OUTPUT), string_value("v2"));
        assert_eq!(second.attr(ID), first.attr(ID));
        assert!(second.attr(INPUT_WO).is_null());
    }

    #[test]
    fn test_version_compared_numerically() {
        let (_, first) = apply(&DynamicValue::Null, &config(Some("v1"), Some(1), &[]));
        let mut next = WoDataModel::from_value(&config(Some("v2"), None, &[])).unwrap();
        next.input_wo_version = DynamicValue::Number(serde_json::Number::from_f64(1.0).unwrap());
        let next = next.into_value();

        let (change, second) = apply(&first, &next);
        assert_eq!(change.planned_state.attr(OUTPUT), string_value("v1"));
        assert_eq!(second.attr(OUTPUT), string_value("v1"));
    }

    #[test]
    fn test_trigger_change_requires_replace() {
        let (_, first) = apply(&DynamicValue::Null, &config(Some("v"), None, &["a"]));
        let (change, second) = apply(&first, &config(Some("v"), None, &["b"]));

        assert_eq!(change.requires_replace, vec![TRIGGERS_REPLACE]);
        assert!(change.planned_state.attr(ID).is_unknown());
        assert_ne!(second.attr(ID), first.attr(ID));
        assert_eq!(second.attr(OUTPUT), string_value("v"));
    }

    #[test]
    fn test_unknown_version_counts_as_changed() {
        let (_, first) = apply(&DynamicValue::Null, &config(Some("v1"), Some(1), &[]));
        let mut next = WoDataModel::from_value(&config(Some("v2"), None, &[])).unwrap();
        next.input_wo_version = DynamicValue::Unknown;
        let next = next.into_value();

        let change = WoDataResource
            .plan(&first, &proposed(&next, &first), &next)
            .unwrap();
        assert!(change.requires_replace.is_empty());
        assert!(change.planned_state.attr(OUTPUT).is_unknown());
        assert_eq!(change.planned_state.attr(ID), first.attr(ID));
    }

    #[test]
    fn test_changed_version_with_null_input_clears_output() {
        let (_, first) = apply(&DynamicValue::Null, &config(Some("v1"), Some(1), &[]));
        let (change, second) = apply(&first, &config(None, Some(2), &[]));

        assert!(change.requires_replace.is_empty());
        assert!(change.planned_state.attr(OUTPUT).is_null());
        assert!(second.attr(OUTPUT).is_null());
        assert_eq!(second.attr(ID), first.attr(ID));
    }

    #[test]
    fn test_refined_unknown_trigger_plans_replacement() {
        let (_, first) = apply(&DynamicValue::Null, &config(Some("v"), None, &["a"]));

        // "k-${random_id.x.hex}" arrives as an unknown refined as not null
        let refined = decode_dynamic_value(&[0xc7, 0x03, 0x0c, 0x81, 0x01, 0xc2]).unwrap();
        let mut next = WoDataModel::from_value(&config(Some("v"), None, &[])).unwrap();
        next.triggers_replace = DynamicValue::List(vec![refined]);
        let next = next.into_value();

        let change = WoDataResource
            .plan(&first, &proposed(&next, &first), &next)
            .unwrap();
        assert_eq!(change.requires_replace, vec![TRIGGERS_REPLACE]);
        assert!(change.planned_state.attr(ID).is_unknown());
        assert!(change.planned_state.attr(OUTPUT).is_unknown());
    }

    #[test]
    fn test_destroy_plans_null() {
        let (_, first) = apply(&DynamicValue::Null, &config(Some("v"), None, &[]));
        let change = WoDataResource
            .plan(&first, &DynamicValue::Null, &DynamicValue::Null)
            .unwrap();
        assert_eq!(change, PlannedChange::destroy());
        assert!(WoDataResource.delete(&first).is_ok());
    }

    #[test]
    fn test_read_is_passthrough() {
        let (_, state) = apply(&DynamicValue::Null, &config(Some("v"), Some(3), &["x"]));
        assert_eq!(WoDataResource.read(&state).unwrap(), state);
    }

    #[test]
    fn test_input_never_persisted() {
        let mut leaked = WoDataModel::from_value(&config(Some("secret"), None, &[])).unwrap();
        leaked.id = string_value("wo_data_0000000000000000");
        let leaked = leaked.into_value();

        let resource = WoDataResource;
        assert!(resource.read(&leaked).unwrap().attr(INPUT_WO).is_null());
        assert!(resource.upgrade(0, &leaked).unwrap().attr(INPUT_WO).is_null());
        let (change, _) = apply(&DynamicValue::Null, &config(Some("secret"), None, &[]));
        assert!(change.planned_state.attr(INPUT_WO).is_null());
    }

    #[test]
    fn test_import_sets_only_id() {
        let state = WoDataResource.import("wo_data_imported00000").unwrap();
        assert_eq!(state.attr(ID), string_value("wo_data_imported00000"));
        assert!(state.attr(OUTPUT).is_null());
        assert!(state.attr(INPUT_WO_VERSION).is_null());
    }

    #[test]
    fn test_wrong_attribute_type_is_error() {
        let bad = make_state(vec![(INPUT_WO_VERSION, string_value("not-a-number"))]);
        let err = WoDataModel::from_value(&bad).unwrap_err();
        assert!(matches!(err, Error::AttributeType { .. }));
    }

    #[test]
    fn test_write_only_requires_client_support() {
        let cfg = config(Some("secret"), None, &[]);

        let diags = WoDataResource.validate(&cfg, false);
        assert_eq!(diags.len(), 1);
        assert!(diags[0].is_error());
        assert_eq!(diags[0].attribute, Some(AttributePath::root(INPUT_WO)));

        assert!(WoDataResource.validate(&cfg, true).is_empty());
        assert!(WoDataResource.validate(&config(None, None, &[]), false).is_empty());
    }

    #[test]
    fn test_upgrade_normalizes_attributes() {
        let raw = make_state(vec![
            (ID, string_value("wo_data_abcdefghijklmnop")),
            (OUTPUT, string_value("kept")),
            ("legacy", string_value("dropped")),
        ]);
        let upgraded = WoDataResource.upgrade(0, &raw).unwrap();

        assert_eq!(upgraded.as_map().unwrap().len(), 5);
        assert!(upgraded.get("legacy").is_none());
        assert_eq!(upgraded.attr(OUTPUT), string_value("kept"));
        assert!(WoDataResource.upgrade(1, &raw).is_err());
    }
}
