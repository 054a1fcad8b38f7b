//! Resource graph for the composite service
//!
//! [`build`] turns a [`ServiceRequest`] into a [`Plan`]: the child resource
//! specs sorted so that every node comes after the nodes it depends on. Ties
//! are broken by declaration order, which keeps provisioning order (and the
//! logs) identical across runs.

use crate::error::{Result, ServiceError};
use crate::request::ServiceRequest;
use miniflux_cloud::{ResourceKind, SecretHandle, SecretSet, outputs};
use std::collections::{BTreeMap, BTreeSet, HashMap};

/// Node id of the object storage child
pub const STORAGE_NODE: &str = "storage";
/// Node id of the database child
pub const DATABASE_NODE: &str = "database";
/// Node id of the application child
pub const SERVICE_NODE: &str = "service";

/// Database user created for the application
const DATABASE_USER: &str = "miniflux";
/// Initial Miniflux administrator
const ADMIN_USER: &str = "admin";

/// Reference to an output of another node, known only once that node is Ready
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct OutputRef {
    pub node: String,
    pub output: String,
}

impl std::fmt::Display for OutputRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{}", self.node, self.output)
    }
}

/// Input value of a child resource spec
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChildInput {
    Literal(String),
    Secret(SecretHandle),
    Deferred(OutputRef),
}

/// One node of the resource graph
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChildResourceSpec {
    pub id: String,
    pub kind: ResourceKind,
    pub inputs: BTreeMap<String, ChildInput>,
    pub depends_on: BTreeSet<String>,
}

impl ChildResourceSpec {
    pub fn new(id: impl Into<String>, kind: ResourceKind) -> Self {
        Self {
            id: id.into(),
            kind,
            inputs: BTreeMap::new(),
            depends_on: BTreeSet::new(),
        }
    }

    pub fn literal(mut self, key: impl Into<String>, value: impl ToString) -> Self {
        self.inputs
            .insert(key.into(), ChildInput::Literal(value.to_string()));
        self
    }

    pub fn secret(mut self, key: impl Into<String>, value: &SecretHandle) -> Self {
        self.inputs
            .insert(key.into(), ChildInput::Secret(value.clone()));
        self
    }

    /// Wire `node.output` into `key`; also records the dependency
    pub fn reference(
        mut self,
        key: impl Into<String>,
        node: impl Into<String>,
        output: impl Into<String>,
    ) -> Self {
        let node = node.into();
        self.depends_on.insert(node.clone());
        self.inputs.insert(
            key.into(),
            ChildInput::Deferred(OutputRef {
                node,
                output: output.into(),
            }),
        );
        self
    }

    pub fn depends_on(mut self, node: impl Into<String>) -> Self {
        self.depends_on.insert(node.into());
        self
    }

    /// Deferred references among the inputs
    pub fn references(&self) -> impl Iterator<Item = &OutputRef> {
        self.inputs.values().filter_map(|input| match input {
            ChildInput::Deferred(r) => Some(r),
            _ => None,
        })
    }
}

/// Topologically ordered set of child resource specs for one deployment
#[derive(Debug, Clone)]
pub struct Plan {
    name: String,
    nodes: Vec<ChildResourceSpec>,
    depth: Vec<usize>,
}

impl Plan {
    /// Validate and order an arbitrary set of specs
    pub fn from_specs(name: impl Into<String>, specs: Vec<ChildResourceSpec>) -> Result<Self> {
        let nodes = topological_order(specs)?;

        let mut position: HashMap<&str, usize> = HashMap::new();
        let mut depth = Vec::with_capacity(nodes.len());
        for (index, node) in nodes.iter().enumerate() {
            let level = node
                .depends_on
                .iter()
                .filter_map(|dep| position.get(dep.as_str()))
                .map(|&i| depth[i] + 1)
                .max()
                .unwrap_or(0);
            depth.push(level);
            position.insert(node.id.as_str(), index);
        }

        Ok(Self {
            name: name.into(),
            nodes,
            depth,
        })
    }

    /// Deployment name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Nodes in topological order
    pub fn nodes(&self) -> &[ChildResourceSpec] {
        &self.nodes
    }

    pub fn node(&self, id: &str) -> Option<&ChildResourceSpec> {
        self.nodes.iter().find(|n| n.id == id)
    }

    /// Nodes grouped by dependency depth.
    ///
    /// Nodes in one wave never depend on each other; every dependency of a
    /// node sits in an earlier wave. Within a wave, topological order is kept.
    pub fn waves(&self) -> Vec<Vec<&ChildResourceSpec>> {
        let count = self.depth.iter().max().map_or(0, |d| d + 1);
        let mut waves: Vec<Vec<&ChildResourceSpec>> = vec![Vec::new(); count];
        for (node, &level) in self.nodes.iter().zip(&self.depth) {
            waves[level].push(node);
        }
        waves
    }

    /// Secrets referenced anywhere in the plan
    pub fn secrets(&self) -> SecretSet {
        let mut set = SecretSet::new();
        for node in &self.nodes {
            for input in node.inputs.values() {
                if let ChildInput::Secret(handle) = input {
                    set.insert(handle);
                }
            }
        }
        set
    }
}

/// Build the three-node graph for a Miniflux deployment
pub fn build(request: &ServiceRequest) -> Result<Plan> {
    let name = &request.name;
    let settings = &request.settings;

    let storage = ChildResourceSpec::new(STORAGE_NODE, ResourceKind::Storage)
        .literal("bucket_name", format!("{}-storage", name))
        .literal("service", name);

    let database = ChildResourceSpec::new(DATABASE_NODE, ResourceKind::Database)
        .literal("instance_name", format!("{}-db", name))
        .literal("engine", &settings.database_engine)
        .literal("username", DATABASE_USER)
        .secret("password", &request.db_password);

    let service = ChildResourceSpec::new(SERVICE_NODE, ResourceKind::ServiceCompute)
        .literal("service_name", format!("{}-app", name))
        .literal("image", &settings.image)
        .literal("cpu", settings.cpu)
        .literal("memory_mb", settings.memory_mb)
        .literal("desired_count", settings.desired_count)
        .literal("container_port", settings.container_port)
        .literal("admin_username", ADMIN_USER)
        .secret("admin_password", &request.admin_password)
        .literal("database_user", DATABASE_USER)
        .secret("database_password", &request.db_password)
        .reference("bucket", STORAGE_NODE, outputs::BUCKET)
        .reference("database_endpoint", DATABASE_NODE, outputs::DB_ENDPOINT);

    let plan = Plan::from_specs(name.clone(), vec![storage, database, service])?;
    tracing::debug!(
        name = %name,
        order = ?plan.nodes().iter().map(|n| n.id.as_str()).collect::<Vec<_>>(),
        "Built resource graph"
    );
    Ok(plan)
}

/// Sort specs so that dependencies come first, breaking ties by declaration order.
///
/// # Errors
///
/// Fails on duplicate ids, dependencies on undeclared nodes, references to
/// nodes that are not listed as dependencies, and cycles.
pub fn topological_order(specs: Vec<ChildResourceSpec>) -> Result<Vec<ChildResourceSpec>> {
    let mut index: HashMap<String, usize> = HashMap::new();
    for (i, spec) in specs.iter().enumerate() {
        if index.insert(spec.id.clone(), i).is_some() {
            return Err(ServiceError::DuplicateNode {
                node: spec.id.clone(),
            });
        }
    }

    let mut indegree = vec![0usize; specs.len()];
    let mut dependents: Vec<Vec<usize>> = vec![Vec::new(); specs.len()];

    for (i, spec) in specs.iter().enumerate() {
        for reference in spec.references() {
            if !spec.depends_on.contains(&reference.node) {
                return Err(ServiceError::UndeclaredReference {
                    node: spec.id.clone(),
                    reference: reference.to_string(),
                });
            }
        }
        for dependency in &spec.depends_on {
            let Some(&d) = index.get(dependency) else {
                return Err(ServiceError::UnknownDependency {
                    node: spec.id.clone(),
                    dependency: dependency.clone(),
                });
            };
            dependents[d].push(i);
            indegree[i] += 1;
        }
    }

    let mut ready: BTreeSet<usize> = (0..specs.len()).filter(|&i| indegree[i] == 0).collect();
    let mut order = Vec::with_capacity(specs.len());
    while let Some(next) = ready.pop_first() {
        order.push(next);
        for &dependent in &dependents[next] {
            indegree[dependent] -= 1;
            if indegree[dependent] == 0 {
                ready.insert(dependent);
            }
        }
    }

    if order.len() != specs.len() {
        let cycle = specs
            .iter()
            .enumerate()
            .filter(|(i, _)| indegree[*i] > 0)
            .map(|(_, s)| s.id.as_str())
            .collect::<Vec<_>>()
            .join(" -> ");
        return Err(ServiceError::CyclicDependency { cycle });
    }

    let mut slots: Vec<Option<ChildResourceSpec>> = specs.into_iter().map(Some).collect();
    Ok(order
        .into_iter()
        .filter_map(|i| slots[i].take())
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request() -> ServiceRequest {
        ServiceRequest::new("feeds", "admin-secret", "db-secret").unwrap()
    }

    fn ids(plan: &Plan) -> Vec<&str> {
        plan.nodes().iter().map(|n| n.id.as_str()).collect()
    }

    #[test]
    fn test_build_three_nodes_in_order() {
        let plan = build(&request()).unwrap();
        assert_eq!(ids(&plan), vec![STORAGE_NODE, DATABASE_NODE, SERVICE_NODE]);
        assert_eq!(plan.nodes()[0].kind, ResourceKind::Storage);
        assert_eq!(plan.nodes()[1].kind, ResourceKind::Database);
        assert_eq!(plan.nodes()[2].kind, ResourceKind::ServiceCompute);
    }

    #[test]
    fn test_build_is_deterministic() {
        let first = build(&request()).unwrap();
        for _ in 0..10 {
            let again = build(&request()).unwrap();
            assert_eq!(ids(&again), ids(&first));
            assert_eq!(again.nodes(), first.nodes());
        }
    }

    #[test]
    fn test_service_wiring() {
        let plan = build(&request()).unwrap();
        let service = plan.node(SERVICE_NODE).unwrap();

        assert_eq!(
            service.depends_on,
            BTreeSet::from([STORAGE_NODE.to_string(), DATABASE_NODE.to_string()])
        );
        assert_eq!(
            service.inputs.get("bucket"),
            Some(&ChildInput::Deferred(OutputRef {
                node: STORAGE_NODE.to_string(),
                output: outputs::BUCKET.to_string(),
            }))
        );
        assert!(matches!(
            service.inputs.get("admin_password"),
            Some(ChildInput::Secret(_))
        ));

        let database = plan.node(DATABASE_NODE).unwrap();
        assert!(database.depends_on.is_empty());
        assert!(matches!(
            database.inputs.get("password"),
            Some(ChildInput::Secret(_))
        ));
    }

    #[test]
    fn test_waves() {
        let plan = build(&request()).unwrap();
        let waves: Vec<Vec<&str>> = plan
            .waves()
            .iter()
            .map(|w| w.iter().map(|n| n.id.as_str()).collect())
            .collect();
        assert_eq!(
            waves,
            vec![vec![STORAGE_NODE, DATABASE_NODE], vec![SERVICE_NODE]]
        );
    }

    #[test]
    fn test_ties_follow_declaration_order() {
        let specs = vec![
            ChildResourceSpec::new("c", ResourceKind::ServiceCompute).depends_on("a"),
            ChildResourceSpec::new("b", ResourceKind::Database),
            ChildResourceSpec::new("a", ResourceKind::Storage),
        ];
        let ordered = topological_order(specs).unwrap();
        let order: Vec<&str> = ordered.iter().map(|s| s.id.as_str()).collect();
        assert_eq!(order, vec!["b", "a", "c"]);
    }

    #[test]
    fn test_detects_cycle() {
        let specs = vec![
            ChildResourceSpec::new("a", ResourceKind::Storage).depends_on("b"),
            ChildResourceSpec::new("b", ResourceKind::Database).depends_on("a"),
            ChildResourceSpec::new("c", ResourceKind::ServiceCompute),
        ];
        let err = topological_order(specs).unwrap_err();
        match err {
            ServiceError::CyclicDependency { cycle } => assert_eq!(cycle, "a -> b"),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_unknown_dependency() {
        let specs = vec![ChildResourceSpec::new("a", ResourceKind::Storage).depends_on("ghost")];
        assert!(matches!(
            topological_order(specs).unwrap_err(),
            ServiceError::UnknownDependency { .. }
        ));
    }

    #[test]
    fn test_undeclared_reference() {
        let mut spec = ChildResourceSpec::new("a", ResourceKind::ServiceCompute);
        spec.inputs.insert(
            "bucket".to_string(),
            ChildInput::Deferred(OutputRef {
                node: "b".to_string(),
                output: "bucket".to_string(),
            }),
        );
        let specs = vec![spec, ChildResourceSpec::new("b", ResourceKind::Storage)];
        assert!(matches!(
            topological_order(specs).unwrap_err(),
            ServiceError::UndeclaredReference { .. }
        ));
    }

    #[test]
    fn test_duplicate_node() {
        let specs = vec![
            ChildResourceSpec::new("a", ResourceKind::Storage),
            ChildResourceSpec::new("a", ResourceKind::Database),
        ];
        assert!(matches!(
            topological_order(specs).unwrap_err(),
            ServiceError::DuplicateNode { .. }
        ));
    }

    #[test]
    fn test_plan_secrets_cover_both_passwords() {
        let plan = build(&request()).unwrap();
        let redacted = plan.secrets().redact("admin-secret / db-secret");
        assert_eq!(redacted, "[REDACTED] / [REDACTED]");
    }
}
