//! Hierarchical path -> method -> integration mapping.

use serde::{Deserialize, Serialize};

use super::cors::PreflightResponse;
use super::HttpMethod;
use crate::descriptor::{ConfigError, ResourceId};

/// A single `path + method -> target` line of the stack configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RouteDeclaration {
    pub path: String,
    pub method: HttpMethod,
    pub target: RouteTarget,
}

/// Declared target of a route method.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RouteTarget {
    Function(String),
    Preflight,
}

/// What a method on a route resolves to after tree construction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Integration {
    /// Proxy integration invoking a function.
    Function(String),
    /// Fixed response, no backend invocation.
    Preflight(PreflightResponse),
}

impl Integration {
    pub fn is_real(&self) -> bool {
        matches!(self, Integration::Function(_))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MethodBinding {
    pub method: HttpMethod,
    pub integration: Integration,
}

/// A node of the route tree. The root node has path `/`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RouteNode {
    pub path: String,
    pub segment: String,
    pub parent: Option<usize>,
    pub children: Vec<usize>,
    pub methods: Vec<MethodBinding>,
}

impl RouteNode {
    pub fn method(&self, method: HttpMethod) -> Option<&MethodBinding> {
        self.methods.iter().find(|b| b.method == method)
    }

    /// Methods bound to a real integration, in canonical order.
    pub fn real_methods(&self) -> Vec<HttpMethod> {
        let mut methods: Vec<HttpMethod> = self
            .methods
            .iter()
            .filter(|b| b.integration.is_real())
            .map(|b| b.method)
            .collect();
        methods.sort();
        methods
    }

    pub fn preflight(&self) -> Option<&PreflightResponse> {
        self.methods.iter().find_map(|b| match &b.integration {
            Integration::Preflight(response) => Some(response),
            Integration::Function(_) => None,
        })
    }
}

/// Provisioning view of one route node.
///
/// `parent` is `None` when the parent is the API root resource.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RouteDescriptor {
    pub api: String,
    pub path: String,
    pub parent: Option<String>,
    pub methods: Vec<MethodBinding>,
}

impl RouteDescriptor {
    pub fn id(&self) -> ResourceId {
        ResourceId::route(&self.path)
    }

    /// Functions invoked by this route's integrations.
    pub fn functions(&self) -> impl Iterator<Item = &str> {
        self.methods.iter().filter_map(|b| match &b.integration {
            Integration::Function(name) => Some(name.as_str()),
            Integration::Preflight(_) => None,
        })
    }
}

/// Route tree keyed by path, stored as an arena. Index 0 is the root.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RouteTree {
    nodes: Vec<RouteNode>,
}

impl Default for RouteTree {
    fn default() -> Self {
        Self::new()
    }
}

impl RouteTree {
    pub fn new() -> Self {
        Self {
            nodes: vec![RouteNode {
                path: "/".to_string(),
                segment: String::new(),
                parent: None,
                children: Vec::new(),
                methods: Vec::new(),
            }],
        }
    }

    /// All nodes, parents before children, in insertion order.
    pub fn nodes(&self) -> &[RouteNode] {
        &self.nodes
    }

    pub fn root(&self) -> &RouteNode {
        &self.nodes[0]
    }

    pub fn get(&self, path: &str) -> Option<&RouteNode> {
        self.nodes.iter().find(|n| n.path == path)
    }

    /// Binds `method` on `path`, creating intermediate nodes as needed.
    pub fn insert(
        &mut self,
        path: &str,
        method: HttpMethod,
        target: RouteTarget,
    ) -> Result<(), ConfigError> {
        let index = self.ensure_path(path)?;
        let node = &mut self.nodes[index];

        if node.method(method).is_some() {
            return Err(ConfigError::DuplicateMethod {
                path: node.path.clone(),
                method,
            });
        }

        let integration = match target {
            RouteTarget::Function(name) => Integration::Function(name),
            RouteTarget::Preflight => Integration::Preflight(PreflightResponse::for_methods(&[])),
        };
        node.methods.push(MethodBinding {
            method,
            integration,
        });
        Ok(())
    }

    /// Attaches the preflight `OPTIONS` binding to every node with a real
    /// integration and normalizes declared preflight bindings.
    ///
    /// A real integration already bound to `OPTIONS` is never overwritten.
    /// Alongside other real methods it is reported as a conflict; on its own
    /// it is kept as declared.
    pub fn attach_preflight(&mut self) -> Result<(), ConfigError> {
        for node in &mut self.nodes {
            let mut real = node.real_methods();
            real.retain(|m| *m != HttpMethod::Options);
            let response = PreflightResponse::for_methods(&real);

            match node.methods.iter_mut().find(|b| b.method == HttpMethod::Options) {
                Some(binding) => match &binding.integration {
                    Integration::Function(function) if !real.is_empty() => {
                        return Err(ConfigError::PreflightConflict {
                            path: node.path.clone(),
                            function: function.clone(),
                        });
                    }
                    Integration::Function(_) => {}
                    Integration::Preflight(_) => {
                        binding.integration = Integration::Preflight(response);
                    }
                },
                None if !real.is_empty() => {
                    node.methods.push(MethodBinding {
                        method: HttpMethod::Options,
                        integration: Integration::Preflight(response),
                    });
                }
                None => {}
            }

            node.methods.sort_by_key(|b| b.method);
        }
        Ok(())
    }

    /// One descriptor per node that needs provisioning: every non-root node,
    /// plus the root when methods are attached to it directly.
    pub fn descriptors(&self, api: &str) -> Vec<RouteDescriptor> {
        self.nodes
            .iter()
            .enumerate()
            .filter(|(i, node)| *i != 0 || !node.methods.is_empty())
            .map(|(_, node)| RouteDescriptor {
                api: api.to_string(),
                path: node.path.clone(),
                parent: node
                    .parent
                    .filter(|p| *p != 0)
                    .map(|p| self.nodes[p].path.clone()),
                methods: node.methods.clone(),
            })
            .collect()
    }

    fn ensure_path(&mut self, path: &str) -> Result<usize, ConfigError> {
        let segments = parse_path(path)?;
        let mut current = 0;

        for segment in segments {
            let existing = self.nodes[current]
                .children
                .iter()
                .copied()
                .find(|c| self.nodes[*c].segment == segment);

            current = match existing {
                Some(child) => child,
                None => {
                    let parent_path = &self.nodes[current].path;
                    let child_path = if parent_path == "/" {
                        format!("/{segment}")
                    } else {
                        format!("{parent_path}/{segment}")
                    };
                    let index = self.nodes.len();
                    self.nodes.push(RouteNode {
                        path: child_path,
                        segment: segment.to_string(),
                        parent: Some(current),
                        children: Vec::new(),
                        methods: Vec::new(),
                    });
                    self.nodes[current].children.push(index);
                    index
                }
            };
        }

        Ok(current)
    }
}

/// Builds the route tree from declarations and runs the preflight post-pass.
pub fn build_route_tree(declarations: &[RouteDeclaration]) -> Result<RouteTree, ConfigError> {
    let mut tree = RouteTree::new();
    for declaration in declarations {
        tree.insert(
            &declaration.path,
            declaration.method,
            declaration.target.clone(),
        )?;
    }
    tree.attach_preflight()?;
    Ok(tree)
}

fn parse_path(path: &str) -> Result<Vec<&str>, ConfigError> {
    let invalid = |reason: &str| ConfigError::InvalidRoutePath {
        path: path.to_string(),
        reason: reason.to_string(),
    };

    let rest = path
        .strip_prefix('/')
        .ok_or_else(|| invalid("must start with '/'"))?;
    if rest.is_empty() {
        return Ok(Vec::new());
    }
    if rest.ends_with('/') {
        return Err(invalid("must not end with '/'"));
    }

    rest.split('/')
        .map(|segment| {
            if segment.is_empty() {
                Err(invalid("empty path segment"))
            } else if !segment
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-' | '{' | '}' | '+'))
            {
                Err(invalid(&format!("invalid characters in segment '{segment}'")))
            } else {
                Ok(segment)
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn declare(path: &str, method: HttpMethod, function: &str) -> RouteDeclaration {
        RouteDeclaration {
            path: path.to_string(),
            method,
            target: RouteTarget::Function(function.to_string()),
        }
    }

    fn preflight(path: &str) -> RouteDeclaration {
        RouteDeclaration {
            path: path.to_string(),
            method: HttpMethod::Options,
            target: RouteTarget::Preflight,
        }
    }

    #[test]
    fn test_insert_creates_intermediate_nodes_once() {
        let tree = build_route_tree(&[
            declare("/matching/list", HttpMethod::Get, "list"),
            declare("/matching/post", HttpMethod::Post, "post"),
        ])
        .unwrap();

        let paths: Vec<&str> = tree.nodes().iter().map(|n| n.path.as_str()).collect();
        assert_eq!(paths, vec!["/", "/matching", "/matching/list", "/matching/post"]);

        let matching = tree.get("/matching").unwrap();
        assert_eq!(matching.children.len(), 2);
        assert!(matching.methods.is_empty());
    }

    #[test]
    fn test_leaf_gets_preflight_with_declared_methods() {
        let tree = build_route_tree(&[
            declare("/items", HttpMethod::Post, "create"),
            declare("/items", HttpMethod::Get, "list"),
        ])
        .unwrap();

        let node = tree.get("/items").unwrap();
        let response = node.preflight().unwrap();
        assert_eq!(
            response.header("Access-Control-Allow-Methods"),
            Some("OPTIONS,GET,POST")
        );
        let methods: Vec<HttpMethod> = node.methods.iter().map(|b| b.method).collect();
        assert_eq!(
            methods,
            vec![HttpMethod::Get, HttpMethod::Post, HttpMethod::Options]
        );
    }

    #[test]
    fn test_intermediate_node_without_methods_has_no_preflight() {
        let tree = build_route_tree(&[declare("/a/b", HttpMethod::Get, "f")]).unwrap();
        assert!(tree.get("/a").unwrap().preflight().is_none());
    }

    #[test]
    fn test_root_methods_get_preflight() {
        let tree = build_route_tree(&[declare("/", HttpMethod::Get, "index")]).unwrap();

        let root = tree.root();
        assert!(root.preflight().is_some());
        let descriptors = tree.descriptors("api");
        assert_eq!(descriptors.len(), 1);
        assert_eq!(descriptors[0].path, "/");
    }

    #[test]
    fn test_explicit_preflight_is_normalized() {
        let tree = build_route_tree(&[
            declare("/hello", HttpMethod::Get, "hello"),
            preflight("/hello"),
        ])
        .unwrap();

        let node = tree.get("/hello").unwrap();
        assert_eq!(node.methods.len(), 2);
        assert_eq!(
            node.preflight().unwrap().allowed_methods(),
            vec![HttpMethod::Options, HttpMethod::Get]
        );
    }

    #[test]
    fn test_duplicate_options_is_rejected() {
        let err = build_route_tree(&[
            declare("/hello", HttpMethod::Get, "hello"),
            preflight("/hello"),
            preflight("/hello"),
        ])
        .unwrap_err();

        assert_eq!(
            err,
            ConfigError::DuplicateMethod {
                path: "/hello".to_string(),
                method: HttpMethod::Options,
            }
        );
    }

    #[test]
    fn test_real_options_integration_is_never_shadowed() {
        let err = build_route_tree(&[
            declare("/hello", HttpMethod::Get, "hello"),
            declare("/hello", HttpMethod::Options, "custom"),
        ])
        .unwrap_err();

        assert_eq!(
            err,
            ConfigError::PreflightConflict {
                path: "/hello".to_string(),
                function: "custom".to_string(),
            }
        );
    }

    #[test]
    fn test_options_only_function_is_kept() {
        let tree = build_route_tree(&[declare("/custom", HttpMethod::Options, "custom")]).unwrap();

        let node = tree.get("/custom").unwrap();
        assert_eq!(node.methods.len(), 1);
        assert_eq!(
            node.method(HttpMethod::Options).unwrap().integration,
            Integration::Function("custom".to_string())
        );
        assert!(node.preflight().is_none());
    }

    #[test]
    fn test_invalid_paths_are_rejected() {
        for path in ["hello", "/hello/", "/a//b", "/a b"] {
            let err = build_route_tree(&[declare(path, HttpMethod::Get, "f")]).unwrap_err();
            assert!(
                matches!(err, ConfigError::InvalidRoutePath { .. }),
                "{path} should be rejected"
            );
        }
    }

    #[test]
    fn test_descriptors_link_parents() {
        let tree = build_route_tree(&[declare("/matching/list", HttpMethod::Get, "list")]).unwrap();
        let descriptors = tree.descriptors("api");

        assert_eq!(descriptors[0].path, "/matching");
        assert_eq!(descriptors[0].parent, None);
        assert_eq!(descriptors[1].path, "/matching/list");
        assert_eq!(descriptors[1].parent.as_deref(), Some("/matching"));
        assert_eq!(descriptors[1].functions().collect::<Vec<_>>(), vec!["list"]);
    }

    #[test]
    fn test_path_parameters_are_accepted() {
        let tree = build_route_tree(&[
            declare("/items/{id}", HttpMethod::Get, "get"),
            declare("/files/{proxy+}", HttpMethod::Get, "files"),
        ])
        .unwrap();
        assert!(tree.get("/items/{id}").is_some());
    }
}
