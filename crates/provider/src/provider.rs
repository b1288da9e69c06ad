//! wodata Terraform Provider Implementation
//!
//! Implements the Terraform Plugin Protocol v6 Provider service.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::RwLock;
use tonic::{Request, Response, Status};
use tracing::{debug, error, info};

use crate::error::{Error, Result};
use crate::resources::{self, Resource};
use crate::schema;
use crate::state::{
    decode_dynamic_value, decode_json_value, encode_dynamic_value,
    DynamicValue as LocalDynamicValue,
};
use crate::tfplugin6::provider_server::Provider;
use crate::tfplugin6::{
    self, apply_resource_change, configure_provider, get_metadata, get_provider_schema,
    import_resource_state, plan_resource_change, read_data_source, read_resource, stop_provider,
    upgrade_resource_state, validate_data_resource_config, validate_provider_config,
    validate_resource_config, AttributePath, Diagnostic, ServerCapabilities,
};

/// Provider type name; resource type names carry it as prefix
pub const PROVIDER_TYPE_NAME: &str = "wodata";

/// wodata Terraform Provider
pub struct WodataProvider {
    /// Resource handlers served by this provider
    resources: Vec<Box<dyn Resource>>,
    /// Terraform version reported by ConfigureProvider
    terraform_version: Arc<RwLock<Option<String>>>,
    /// Set once Terraform asks the provider to stop
    stop_requested: Arc<RwLock<bool>>,
}

impl Default for WodataProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl WodataProvider {
    pub fn new() -> Self {
        Self {
            resources: resources::all(),
            terraform_version: Arc::new(RwLock::new(None)),
            stop_requested: Arc::new(RwLock::new(false)),
        }
    }

    /// Terraform version from the last ConfigureProvider call
    pub async fn terraform_version(&self) -> Option<String> {
        self.terraform_version.read().await.clone()
    }

    pub async fn stop_requested(&self) -> bool {
        *self.stop_requested.read().await
    }

    fn resource(&self, type_name: &str) -> Result<&dyn Resource> {
        self.resources
            .iter()
            .find(|r| r.type_name() == type_name)
            .map(|r| r.as_ref())
            .ok_or_else(|| Error::UnknownResource(type_name.to_string()))
    }
}

/// Decode a wire DynamicValue, preferring msgpack over JSON
fn decode(value: Option<&tfplugin6::DynamicValue>) -> Result<LocalDynamicValue> {
    match value {
        Some(v) if !v.msgpack.is_empty() => decode_dynamic_value(&v.msgpack),
        Some(v) => decode_json_value(&v.json),
        None => Ok(LocalDynamicValue::Null),
    }
}

fn encode(value: &LocalDynamicValue) -> Result<tfplugin6::DynamicValue> {
    Ok(tfplugin6::DynamicValue {
        msgpack: encode_dynamic_value(value)?,
        json: vec![],
    })
}

#[tonic::async_trait]
impl Provider for WodataProvider {
    async fn get_metadata(
        &self,
        _request: Request<get_metadata::Request>,
    ) -> Result<Response<get_metadata::Response>, Status> {
        debug!("GetMetadata called");

        Ok(Response::new(get_metadata::Response {
            server_capabilities: Some(server_capabilities()),
            diagnostics: vec![],
            data_sources: vec![],
            resources: self
                .resources
                .iter()
                .map(|r| get_metadata::ResourceMetadata {
                    type_name: r.type_name().to_string(),
                })
                .collect(),
        }))
    }

    async fn get_provider_schema(
        &self,
        _request: Request<get_provider_schema::Request>,
    ) -> Result<Response<get_provider_schema::Response>, Status> {
        info!("GetProviderSchema called");

        let response = get_provider_schema::Response {
            provider: Some(schema::provider_schema()),
            resource_schemas: self
                .resources
                .iter()
                .map(|r| (r.type_name().to_string(), r.schema()))
                .collect(),
            data_source_schemas: HashMap::new(),
            diagnostics: vec![],
            provider_meta: None,
            server_capabilities: Some(server_capabilities()),
        };

        Ok(Response::new(response))
    }

    async fn validate_provider_config(
        &self,
        request: Request<validate_provider_config::Request>,
    ) -> Result<Response<validate_provider_config::Response>, Status> {
        debug!("ValidateProviderConfig called");

        let diagnostics = match decode(request.get_ref().config.as_ref()) {
            Ok(_) => vec![],
            Err(e) => vec![Diagnostic::error("Invalid provider configuration", e.to_string())],
        };

        Ok(Response::new(validate_provider_config::Response { diagnostics }))
    }

    async fn validate_resource_config(
        &self,
        request: Request<validate_resource_config::Request>,
    ) -> Result<Response<validate_resource_config::Response>, Status> {
        let req = request.into_inner();
        debug!("ValidateResourceConfig called for {}", req.type_name);

        let write_only_allowed = req
            .client_capabilities
            .as_ref()
            .map(|c| c.write_only_attributes_allowed)
            .unwrap_or(false);

        let diagnostics = match (self.resource(&req.type_name), decode(req.config.as_ref())) {
            (Ok(resource), Ok(config)) => resource.validate(&config, write_only_allowed),
            (Err(e), _) | (_, Err(e)) => {
                vec![Diagnostic::error("Invalid resource configuration", e.to_string())]
            }
        };

        Ok(Response::new(validate_resource_config::Response { diagnostics }))
    }

    async fn validate_data_resource_config(
        &self,
        request: Request<validate_data_resource_config::Request>,
    ) -> Result<Response<validate_data_resource_config::Response>, Status> {
        let type_name = request.into_inner().type_name;
        debug!("ValidateDataResourceConfig called for {}", type_name);

        Ok(Response::new(validate_data_resource_config::Response {
            diagnostics: vec![Diagnostic::error(
                "Unsupported data source",
                Error::UnsupportedDataSource(type_name).to_string(),
            )],
        }))
    }

    async fn upgrade_resource_state(
        &self,
        request: Request<upgrade_resource_state::Request>,
    ) -> Result<Response<upgrade_resource_state::Response>, Status> {
        let req = request.into_inner();
        debug!("UpgradeResourceState called for {} (version {})", req.type_name, req.version);

        let result = self.resource(&req.type_name).and_then(|resource| {
            let raw = match &req.raw_state {
                Some(raw) if !raw.json.is_empty() => decode_json_value(&raw.json)?,
                Some(raw) if !raw.flatmap.is_empty() => {
                    return Err(Error::Decode("flatmap state is not supported".to_string()))
                }
                _ => LocalDynamicValue::Null,
            };
            let upgraded = resource.upgrade(req.version, &raw)?;
            encode(&upgraded)
        });

        match result {
            Ok(upgraded) => Ok(Response::new(upgrade_resource_state::Response {
                upgraded_state: Some(upgraded),
                diagnostics: vec![],
            })),
            Err(e) => {
                error!("Failed to upgrade {} state: {}", req.type_name, e);
                Ok(Response::new(upgrade_resource_state::Response {
                    upgraded_state: None,
                    diagnostics: vec![Diagnostic::error(
                        "Failed to upgrade resource state",
                        e.to_string(),
                    )],
                }))
            }
        }
    }

    async fn configure_provider(
        &self,
        request: Request<configure_provider::Request>,
    ) -> Result<Response<configure_provider::Response>, Status> {
        let req = request.into_inner();
        info!("ConfigureProvider called by Terraform {}", req.terraform_version);

        if let Err(e) = decode(req.config.as_ref()) {
            return Ok(Response::new(configure_provider::Response {
                diagnostics: vec![Diagnostic::error(
                    "Invalid provider configuration",
                    e.to_string(),
                )],
            }));
        }

        *self.terraform_version.write().await = Some(req.terraform_version);

        Ok(Response::new(configure_provider::Response {
            diagnostics: vec![],
        }))
    }

    async fn read_resource(
        &self,
        request: Request<read_resource::Request>,
    ) -> Result<Response<read_resource::Response>, Status> {
        let req = request.into_inner();
        info!("ReadResource called for {}", req.type_name);

        let result = self.resource(&req.type_name).and_then(|resource| {
            let current_state = decode(req.current_state.as_ref())?;
            if current_state.is_null() {
                return Ok(None);
            }
            encode(&resource.read(&current_state)?).map(Some)
        });

        match result {
            Ok(new_state) => Ok(Response::new(read_resource::Response {
                new_state,
                diagnostics: vec![],
                private: req.private,
                deferred: None,
            })),
            Err(e) => Ok(Response::new(read_resource::Response {
                new_state: None,
                diagnostics: vec![Diagnostic::error("Failed to read resource", e.to_string())],
                private: vec![],
                deferred: None,
            })),
        }
    }

    async fn plan_resource_change(
        &self,
        request: Request<plan_resource_change::Request>,
    ) -> Result<Response<plan_resource_change::Response>, Status> {
        let req = request.into_inner();
        debug!("PlanResourceChange called for {}", req.type_name);

        let result = self.resource(&req.type_name).and_then(|resource| {
            let prior = decode(req.prior_state.as_ref())?;
            let proposed = decode(req.proposed_new_state.as_ref())?;
            let config = decode(req.config.as_ref())?;

            let change = resource.plan(&prior, &proposed, &config)?;
            Ok((encode(&change.planned_state)?, change.requires_replace))
        });

        match result {
            Ok((planned_state, requires_replace)) => {
                Ok(Response::new(plan_resource_change::Response {
                    planned_state: Some(planned_state),
                    requires_replace: requires_replace
                        .into_iter()
                        .map(AttributePath::root)
                        .collect(),
                    planned_private: req.prior_private,
                    diagnostics: vec![],
                    legacy_type_system: false,
                    deferred: None,
                }))
            }
            Err(e) => Ok(Response::new(plan_resource_change::Response {
                planned_state: None,
                requires_replace: vec![],
                planned_private: vec![],
                diagnostics: vec![Diagnostic::error(
                    "Failed to plan resource change",
                    e.to_string(),
                )],
                legacy_type_system: false,
                deferred: None,
            })),
        }
    }

    async fn apply_resource_change(
        &self,
        request: Request<apply_resource_change::Request>,
    ) -> Result<Response<apply_resource_change::Response>, Status> {
        let req = request.into_inner();
        info!("ApplyResourceChange called for {}", req.type_name);

        let result = self.resource(&req.type_name).and_then(|resource| {
            let prior_state = decode(req.prior_state.as_ref())?;
            let planned_state = decode(req.planned_state.as_ref())?;
            let config = decode(req.config.as_ref())?;

            match (&prior_state, &planned_state) {
                // No change
                (LocalDynamicValue::Null, LocalDynamicValue::Null) => Ok(LocalDynamicValue::Null),
                // Create
                (LocalDynamicValue::Null, planned) => {
                    info!("Creating {}", req.type_name);
                    resource.create(planned, &config)
                }
                // Delete
                (prior, LocalDynamicValue::Null) => {
                    info!("Deleting {}", req.type_name);
                    resource.delete(prior).map(|_| LocalDynamicValue::Null)
                }
                // Update
                (prior, planned) => resource.update(prior, planned, &config),
            }
        });

        match result.and_then(|state| encode(&state)) {
            Ok(new_state) => Ok(Response::new(apply_resource_change::Response {
                new_state: Some(new_state),
                private: req.planned_private,
                diagnostics: vec![],
                legacy_type_system: false,
            })),
            Err(e) => {
                error!("Failed to apply {} change: {}", req.type_name, e);
                Ok(Response::new(apply_resource_change::Response {
                    new_state: None,
                    private: vec![],
                    diagnostics: vec![Diagnostic::error(
                        "Failed to apply resource change",
                        e.to_string(),
                    )],
                    legacy_type_system: false,
                }))
            }
        }
    }

    async fn import_resource_state(
        &self,
        request: Request<import_resource_state::Request>,
    ) -> Result<Response<import_resource_state::Response>, Status> {
        let req = request.into_inner();
        info!("ImportResourceState called for {} with ID {}", req.type_name, req.id);

        let state = self
            .resource(&req.type_name)
            .and_then(|resource| resource.import(&req.id))
            .and_then(|state| encode(&state));

        match state {
            Ok(state) => Ok(Response::new(import_resource_state::Response {
                imported_resources: vec![import_resource_state::ImportedResource {
                    type_name: req.type_name,
                    state: Some(state),
                    private: vec![],
                }],
                diagnostics: vec![],
                deferred: None,
            })),
            Err(e) => Ok(Response::new(import_resource_state::Response {
                imported_resources: vec![],
                diagnostics: vec![Diagnostic::error("Failed to import resource", e.to_string())],
                deferred: None,
            })),
        }
    }

    async fn read_data_source(
        &self,
        request: Request<read_data_source::Request>,
    ) -> Result<Response<read_data_source::Response>, Status> {
        let type_name = request.into_inner().type_name;
        debug!("ReadDataSource called for {}", type_name);

        Ok(Response::new(read_data_source::Response {
            state: None,
            diagnostics: vec![Diagnostic::error(
                "Unsupported data source",
                Error::UnsupportedDataSource(type_name).to_string(),
            )],
            deferred: None,
        }))
    }

    async fn stop_provider(
        &self,
        _request: Request<stop_provider::Request>,
    ) -> Result<Response<stop_provider::Response>, Status> {
        info!("StopProvider called");
        *self.stop_requested.write().await = true;

        Ok(Response::new(stop_provider::Response {
            error: String::new(),
        }))
    }
}

fn server_capabilities() -> ServerCapabilities {
    ServerCapabilities {
        plan_destroy: true,
        get_provider_schema_optional: false,
        move_resource_state: false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resources::wo_data::TYPE_NAME;

    #[test]
    fn test_resource_lookup() {
        let provider = WodataProvider::new();
        assert_eq!(provider.resource(TYPE_NAME).unwrap().type_name(), TYPE_NAME);
        assert!(matches!(
            provider.resource("wodata_missing"),
            Err(Error::UnknownResource(_))
        ));
    }

    #[test]
    fn test_resource_types_carry_provider_prefix() {
        let provider = WodataProvider::new();
        for resource in &provider.resources {
            assert!(resource
                .type_name()
                .starts_with(&format!("{}_", PROVIDER_TYPE_NAME)));
        }
    }

    #[tokio::test]
    async fn test_configure_records_terraform_version() {
        let provider = WodataProvider::new();
        assert_eq!(provider.terraform_version().await, None);

        let response = provider
            .configure_provider(Request::new(configure_provider::Request {
                terraform_version: "1.11.0".to_string(),
                config: Some(encode(&LocalDynamicValue::Map(Default::default())).unwrap()),
                client_capabilities: None,
            }))
            .await
            .unwrap()
            .into_inner();

        assert!(response.diagnostics.is_empty());
        assert_eq!(provider.terraform_version().await.as_deref(), Some("1.11.0"));
    }

    #[tokio::test]
    async fn test_configure_rejects_malformed_config() {
        let provider = WodataProvider::new();
        let response = provider
            .configure_provider(Request::new(configure_provider::Request {
                terraform_version: "1.11.0".to_string(),
                config: Some(tfplugin6::DynamicValue {
                    msgpack: vec![0x81],
                    json: vec![],
                }),
                client_capabilities: None,
            }))
            .await
            .unwrap()
            .into_inner();

        assert!(response.diagnostics[0].is_error());
        assert_eq!(provider.terraform_version().await, None);
    }

    #[tokio::test]
    async fn test_stop_provider_sets_flag() {
        let provider = WodataProvider::new();
        assert!(!provider.stop_requested().await);

        let response = provider
            .stop_provider(Request::new(stop_provider::Request {}))
            .await
            .unwrap()
            .into_inner();

        assert!(response.error.is_empty());
        assert!(provider.stop_requested().await);
    }

    #[test]
    fn test_decode_prefers_msgpack() {
        let wire = tfplugin6::DynamicValue {
            msgpack: encode_dynamic_value(&crate::state::string_value("from msgpack")).unwrap(),
            json: br#""from json""#.to_vec(),
        };
        assert_eq!(
            decode(Some(&wire)).unwrap(),
            crate::state::string_value("from msgpack")
        );

        let json_only = tfplugin6::DynamicValue {
            msgpack: vec![],
            json: br#""from json""#.to_vec(),
        };
        assert_eq!(
            decode(Some(&json_only)).unwrap(),
            crate::state::string_value("from json")
        );
        assert_eq!(decode(None).unwrap(), LocalDynamicValue::Null);
    }
}
