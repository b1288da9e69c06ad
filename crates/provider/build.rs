use tonic_build::manual::{Builder, Method, Service};

/// tfplugin6 RPCs served by this provider: (rust method, RPC name, message module)
const PROVIDER_RPCS: &[(&str, &str, &str)] = &[
    ("get_metadata", "GetMetadata", "get_metadata"),
    ("get_provider_schema", "GetProviderSchema", "get_provider_schema"),
    ("validate_provider_config", "ValidateProviderConfig", "validate_provider_config"),
    ("validate_resource_config", "ValidateResourceConfig", "validate_resource_config"),
    ("validate_data_resource_config", "ValidateDataResourceConfig", "validate_data_resource_config"),
    ("upgrade_resource_state", "UpgradeResourceState", "upgrade_resource_state"),
    ("configure_provider", "ConfigureProvider", "configure_provider"),
    ("read_resource", "ReadResource", "read_resource"),
    ("plan_resource_change", "PlanResourceChange", "plan_resource_change"),
    ("apply_resource_change", "ApplyResourceChange", "apply_resource_change"),
    ("import_resource_state", "ImportResourceState", "import_resource_state"),
    ("read_data_source", "ReadDataSource", "read_data_source"),
    ("stop_provider", "StopProvider", "stop_provider"),
];

fn main() -> Result<(), Box<dyn std::error::Error>> {
    println!("cargo:rerun-if-changed=build.rs");

    // The message types are hand-written prost structs in src/tfplugin6.rs,
    // so only the service glue is generated here and no protoc is needed.
    let mut service = Service::builder()
        .name("Provider")
        .package("tfplugin6");

    for (name, route, module) in PROVIDER_RPCS {
        service = service.method(
            Method::builder()
                .name(name)
                .route_name(route)
                .input_type(format!("crate::tfplugin6::{}::Request", module))
                .output_type(format!("crate::tfplugin6::{}::Response", module))
                .codec_path("tonic::codec::ProstCodec")
                .build(),
        );
    }

    // The client half is only driven by the integration tests.
    Builder::new()
        .build_client(true)
        .build_server(true)
        .compile(&[service.build()]);

    Ok(())
}
