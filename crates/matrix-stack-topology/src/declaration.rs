//! Declarative topology table
//!
//! Declarations are plain builders. [`crate::Topology::new`] validates them
//! and turns them into [`crate::DeployableDetails`]; nothing here is trusted
//! until that pass succeeds.

/// Name of the shared component whose presence implies `has_db`
pub const POSTGRES: &str = "postgres";

/// Declaration of a component (top-level or shared)
#[derive(Clone, Debug, PartialEq)]
pub struct ComponentDecl {
    pub(crate) name: &'static str,
    pub(crate) helm_key: Option<&'static str>,
    pub(crate) is_shared: bool,
    pub(crate) shared_components: Vec<&'static str>,
    pub(crate) has_db: bool,
    pub(crate) has_image: bool,
    pub(crate) has_ingress: bool,
    pub(crate) has_workloads: bool,
    pub(crate) has_service_monitor: bool,
    pub(crate) paths_consistency_noqa: Vec<&'static str>,
    pub(crate) additional_values_files: Vec<&'static str>,
    pub(crate) secret_values_files: Vec<&'static str>,
    pub(crate) sub_components: Vec<SubComponentDecl>,
}

impl ComponentDecl {
    /// A top-level component with every capability enabled except a database
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            helm_key: None,
            is_shared: false,
            shared_components: vec![],
            has_db: false,
            has_image: true,
            has_ingress: true,
            has_workloads: true,
            has_service_monitor: true,
            paths_consistency_noqa: vec![],
            additional_values_files: vec![],
            secret_values_files: vec![],
            sub_components: vec![],
        }
    }

    /// A shared infrastructure component
    pub fn shared(name: &'static str) -> Self {
        Self {
            is_shared: true,
            ..Self::new(name)
        }
    }

    /// Override the Helm values key
    pub fn with_helm_key(mut self, key: &'static str) -> Self {
        self.helm_key = Some(key);
        self
    }

    /// Shared components this component pulls in
    pub fn with_shared_components(mut self, names: &[&'static str]) -> Self {
        self.shared_components = names.to_vec();
        self
    }

    /// Mark as talking to Postgres
    pub fn with_db(mut self) -> Self {
        self.has_db = true;
        self
    }

    /// No user-overridable image
    pub fn without_image(mut self) -> Self {
        self.has_image = false;
        self
    }

    /// No Ingress
    pub fn without_ingress(mut self) -> Self {
        self.has_ingress = false;
        self
    }

    /// No ServiceMonitor
    pub fn without_service_monitor(mut self) -> Self {
        self.has_service_monitor = false;
        self
    }

    /// No workloads
    pub fn without_workloads(mut self) -> Self {
        self.has_workloads = false;
        self
    }

    /// Mount paths exempt from the consistency check
    pub fn with_noqa_paths(mut self, paths: &[&'static str]) -> Self {
        self.paths_consistency_noqa = paths.to_vec();
        self
    }

    /// Values files exercised in addition to `{name}-minimal-values.yaml`
    pub fn with_values_files(mut self, files: &[&'static str]) -> Self {
        self.additional_values_files = files.to_vec();
        self
    }

    /// Values files exercising secret handling
    pub fn with_secret_values_files(mut self, files: &[&'static str]) -> Self {
        self.secret_values_files = files.to_vec();
        self
    }

    /// Add a sub-component
    pub fn with_sub_component(mut self, sub: SubComponentDecl) -> Self {
        self.sub_components.push(sub);
        self
    }
}

/// Declaration of a sub-component
#[derive(Clone, Debug, PartialEq)]
pub struct SubComponentDecl {
    pub(crate) name: &'static str,
    pub(crate) helm_key: Option<&'static str>,
    pub(crate) has_db: bool,
    pub(crate) has_image: bool,
    pub(crate) has_ingress: bool,
    pub(crate) has_workloads: bool,
    pub(crate) has_service_monitor: bool,
    pub(crate) uses_parent_properties: bool,
    pub(crate) paths_consistency_noqa: Vec<&'static str>,
}

impl SubComponentDecl {
    /// A sub-component with every capability enabled except a database
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            helm_key: None,
            has_db: false,
            has_image: true,
            has_ingress: true,
            has_workloads: true,
            has_service_monitor: true,
            uses_parent_properties: false,
            paths_consistency_noqa: vec![],
        }
    }

    /// Override the Helm values key (relative to the parent's)
    pub fn with_helm_key(mut self, key: &'static str) -> Self {
        self.helm_key = Some(key);
        self
    }

    /// Mark as talking to Postgres
    pub fn with_db(mut self) -> Self {
        self.has_db = true;
        self
    }

    /// No user-overridable image
    pub fn without_image(mut self) -> Self {
        self.has_image = false;
        self
    }

    /// No Ingress
    pub fn without_ingress(mut self) -> Self {
        self.has_ingress = false;
        self
    }

    /// No ServiceMonitor
    pub fn without_service_monitor(mut self) -> Self {
        self.has_service_monitor = false;
        self
    }

    /// Configured through the parent's values
    pub fn uses_parent_properties(mut self) -> Self {
        self.uses_parent_properties = true;
        self
    }

    /// Mount paths exempt from the consistency check
    pub fn with_noqa_paths(mut self, paths: &[&'static str]) -> Self {
        self.paths_consistency_noqa = paths.to_vec();
        self
    }
}

/// The matrix-stack chart.
///
/// Component names must match the chart's `app.kubernetes.io/name` label
/// prefixes; renaming a component in the chart means updating it here.
pub fn matrix_stack() -> Vec<ComponentDecl> {
    vec![
        ComponentDecl::shared("init-secrets")
            .without_image()
            .without_ingress()
            .without_service_monitor(),
        ComponentDecl::shared("haproxy").without_ingress(),
        ComponentDecl::shared(POSTGRES)
            .without_ingress()
            .with_noqa_paths(&["/docker-entrypoint-initdb.d"]),
        ComponentDecl::new("element-web")
            .without_service_monitor()
            .with_noqa_paths(&["/etc/nginx"]),
        ComponentDecl::new("matrix-authentication-service")
            .with_shared_components(&["init-secrets", POSTGRES])
            .with_db()
            .with_secret_values_files(&[
                "matrix-authentication-service-secrets-in-helm-values.yaml",
                "matrix-authentication-service-secrets-externally-values.yaml",
            ]),
        ComponentDecl::new("synapse")
            .with_shared_components(&["init-secrets", "haproxy", POSTGRES])
            .with_db()
            .with_values_files(&["synapse-worker-example-values.yaml"])
            .with_secret_values_files(&[
                "synapse-secrets-in-helm-values.yaml",
                "synapse-secrets-externally-values.yaml",
            ])
            .with_sub_component(
                SubComponentDecl::new("synapse-redis")
                    .with_helm_key("redis")
                    .without_ingress()
                    .without_service_monitor(),
            )
            .with_sub_component(
                SubComponentDecl::new("synapse-check-config-hook")
                    .with_helm_key("checkConfigHook")
                    .with_db()
                    .without_ingress()
                    .without_service_monitor()
                    .uses_parent_properties(),
            ),
        ComponentDecl::new("well-known")
            .with_helm_key("wellKnownDelegation")
            .with_shared_components(&["haproxy"])
            .without_image()
            .without_workloads()
            .without_service_monitor(),
    ]
}
