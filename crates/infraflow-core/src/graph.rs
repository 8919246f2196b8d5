//! 依存関係の解決
//!
//! 明示的な `depends_on` とリソース間の出力参照からスタックの有向非巡回グラフを
//! 構築し、全ての依存先が先に来るようにリソースを並べます。

use crate::model::Stack;
use std::collections::{BTreeMap, BTreeSet, HashMap, VecDeque};
use thiserror::Error;
use tracing::debug;

/// 宣言時のグラフエラー
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GraphError {
    #[error("Dependency cycle detected: {}", path.join(" -> "))]
    Cycle { path: Vec<String> },

    #[error("'{from}' references '{target}', which is not declared in the stack")]
    UnresolvedReference { from: String, target: String },

    #[error("'{from}' references '{target}.{output}', but {kind} does not publish '{output}'")]
    UnknownOutput {
        from: String,
        target: String,
        kind: String,
        output: String,
    },
}

/// 宣言されたリソースの依存グラフ
#[derive(Debug, Clone, Default)]
pub struct DependencyGraph {
    /// 宣言順のノード名
    nodes: Vec<String>,
    /// ノード → 依存先ノード
    dependencies: BTreeMap<String, BTreeSet<String>>,
    /// トポロジカル順（依存先が先）
    order: Vec<String>,
}

impl DependencyGraph {
    /// スタックのグラフを構築して検証
    ///
    /// `depends_on` と参照は全て宣言済みリソースを指し、参照する出力は
    /// 参照先の種別が公開しているものでなければならない。
    /// スタックの出力も検証する。
    #[tracing::instrument(skip(stack), fields(stack = %stack.name))]
    pub fn build(stack: &Stack) -> Result<Self, GraphError> {
        let kinds: HashMap<&str, _> = stack
            .resources
            .iter()
            .map(|r| (r.name.as_str(), r.kind))
            .collect();

        let check_ref = |from: &str, target: &str, output: &str| -> Result<(), GraphError> {
            let kind = kinds
                .get(target)
                .ok_or_else(|| GraphError::UnresolvedReference {
                    from: from.to_string(),
                    target: target.to_string(),
                })?;
            if !kind.has_output(output) {
                return Err(GraphError::UnknownOutput {
                    from: from.to_string(),
                    target: target.to_string(),
                    kind: kind.to_string(),
                    output: output.to_string(),
                });
            }
            Ok(())
        };

        let mut edges = Vec::with_capacity(stack.resources.len());
        for resource in &stack.resources {
            for dep in &resource.depends_on {
                if !kinds.contains_key(dep.as_str()) {
                    return Err(GraphError::UnresolvedReference {
                        from: resource.name.clone(),
                        target: dep.clone(),
                    });
                }
            }
            for output_ref in resource.references() {
                check_ref(&resource.name, &output_ref.resource, &output_ref.output)?;
            }
            edges.push((resource.name.clone(), resource.dependencies()));
        }

        for (output_name, value) in &stack.outputs {
            for output_ref in value.references() {
                check_ref(
                    &format!("output {}", output_name),
                    &output_ref.resource,
                    &output_ref.output,
                )?;
            }
        }

        let graph = Self::from_dependencies(edges)?;
        debug!(nodes = graph.nodes.len(), "Dependency graph resolved");
        Ok(graph)
    }

    /// `(name, dependencies)` の組からグラフを構築
    ///
    /// ノードにない名前への依存は無視するので、リソース削除後の
    /// 記録済みステートからも再構築できる。
    pub fn from_dependencies<I>(entries: I) -> Result<Self, GraphError>
    where
        I: IntoIterator<Item = (String, BTreeSet<String>)>,
    {
        let entries: Vec<(String, BTreeSet<String>)> = entries.into_iter().collect();
        let names: BTreeSet<&str> = entries.iter().map(|(n, _)| n.as_str()).collect();

        let mut graph = Self::default();
        for (name, deps) in &entries {
            let known: BTreeSet<String> = deps
                .iter()
                .filter(|d| names.contains(d.as_str()))
                .cloned()
                .collect();
            graph.nodes.push(name.clone());
            graph.dependencies.insert(name.clone(), known);
        }

        graph.order = graph.sort()?;
        Ok(graph)
    }

    /// Kahnのアルゴリズム（同順位は宣言順）
    fn sort(&self) -> Result<Vec<String>, GraphError> {
        let index: HashMap<&str, usize> = self
            .nodes
            .iter()
            .enumerate()
            .map(|(i, n)| (n.as_str(), i))
            .collect();

        let mut remaining: Vec<usize> = self
            .nodes
            .iter()
            .map(|n| self.dependencies.get(n).map_or(0, |d| d.len()))
            .collect();
        let dependents = self.reverse_edges();

        let mut ready: BTreeSet<usize> = remaining
            .iter()
            .enumerate()
            .filter(|(_, count)| **count == 0)
            .map(|(i, _)| i)
            .collect();
        let mut order = Vec::with_capacity(self.nodes.len());

        while let Some(i) = ready.pop_first() {
            let name = &self.nodes[i];
            order.push(name.clone());
            if let Some(children) = dependents.get(name.as_str()) {
                for child in children {
                    let ci = index[child.as_str()];
                    remaining[ci] -= 1;
                    if remaining[ci] == 0 {
                        ready.insert(ci);
                    }
                }
            }
        }

        if order.len() < self.nodes.len() {
            let placed: BTreeSet<&str> = order.iter().map(String::as_str).collect();
            return Err(GraphError::Cycle {
                path: self.find_cycle(&placed),
            });
        }

        Ok(order)
    }

    /// 未配置ノードの依存をたどり、同じノードに戻るまで進む
    fn find_cycle(&self, placed: &BTreeSet<&str>) -> Vec<String> {
        let Some(start) = self.nodes.iter().find(|n| !placed.contains(n.as_str())) else {
            return Vec::new();
        };

        let mut path: Vec<String> = Vec::new();
        let mut current = start.clone();
        loop {
            if let Some(pos) = path.iter().position(|n| *n == current) {
                let mut cycle = path.split_off(pos);
                cycle.push(current);
                return cycle;
            }
            path.push(current.clone());
            let next = self
                .dependencies
                .get(&current)
                .and_then(|deps| deps.iter().find(|d| !placed.contains(d.as_str())));
            match next {
                Some(next) => current = next.clone(),
                None => return path,
            }
        }
    }

    fn reverse_edges(&self) -> HashMap<&str, Vec<String>> {
        let mut dependents: HashMap<&str, Vec<String>> = HashMap::new();
        for (name, deps) in &self.dependencies {
            for dep in deps {
                dependents
                    .entry(dep.as_str())
                    .or_default()
                    .push(name.clone());
            }
        }
        dependents
    }

    /// 適用順のリソース（依存先が先）
    pub fn topological_order(&self) -> &[String] {
        &self.order
    }

    /// 削除順のリソース（依存元が先）
    pub fn reverse_order(&self) -> Vec<String> {
        self.order.iter().rev().cloned().collect()
    }

    /// 前のバッチにのみ依存するリソースのバッチ
    pub fn levels(&self) -> Vec<Vec<String>> {
        let mut depth: HashMap<&str, usize> = HashMap::new();
        let mut levels: Vec<Vec<String>> = Vec::new();

        for name in &self.order {
            let level = self
                .dependencies
                .get(name)
                .into_iter()
                .flatten()
                .filter_map(|d| depth.get(d.as_str()))
                .map(|d| d + 1)
                .max()
                .unwrap_or(0);
            depth.insert(name.as_str(), level);
            if levels.len() <= level {
                levels.resize_with(level + 1, Vec::new);
            }
            levels[level].push(name.clone());
        }

        levels
    }

    /// リソースの直接の依存先
    pub fn dependencies_of(&self, name: &str) -> BTreeSet<String> {
        self.dependencies.get(name).cloned().unwrap_or_default()
    }

    /// `name` に直接または間接に依存する全リソース
    pub fn dependents_of(&self, name: &str) -> BTreeSet<String> {
        let dependents = self.reverse_edges();
        let mut found = BTreeSet::new();
        let mut queue: VecDeque<&str> = VecDeque::from([name]);

        while let Some(current) = queue.pop_front() {
            if let Some(children) = dependents.get(current) {
                for child in children {
                    if found.insert(child.clone()) {
                        queue.push_back(child.as_str());
                    }
                }
            }
        }

        found
    }

    pub fn contains(&self, name: &str) -> bool {
        self.dependencies.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{ResourceDecl, ResourceKind, Value};

    fn rg(name: &str) -> ResourceDecl {
        ResourceDecl::new(name, ResourceKind::ResourceGroup)
            .with_property("name", Value::string(name))
    }

    fn sample_stack() -> Stack {
        let mut stack = Stack::new("sample");
        stack.add(rg("my-network"));
        stack.add(
            ResourceDecl::new("myvnet", ResourceKind::VirtualNetwork)
                .with_property("resource_group_name", Value::reference("my-network", "name")),
        );
        stack.add(
            ResourceDecl::new("application-subnet", ResourceKind::Subnet)
                .with_depends_on("myvnet")
                .with_property("resource_group_name", Value::reference("my-network", "name")),
        );
        stack.add(
            ResourceDecl::new("profile", ResourceKind::NetworkProfile)
                .with_property("subnet_id", Value::reference("application-subnet", "id")),
        );
        stack.add(
            ResourceDecl::new("aci", ResourceKind::ContainerGroup)
                .with_property("network_profile_id", Value::reference("profile", "id")),
        );
        stack
    }

    #[test]
    fn test_topological_order() {
        let graph = DependencyGraph::build(&sample_stack()).unwrap();
        assert_eq!(
            graph.topological_order(),
            &["my-network", "myvnet", "application-subnet", "profile", "aci"]
        );
    }

    #[test]
    fn test_ties_follow_declaration_order() {
        let mut stack = Stack::new("ties");
        stack.add(rg("b"));
        stack.add(rg("a"));
        stack.add(rg("c"));

        let graph = DependencyGraph::build(&stack).unwrap();
        assert_eq!(graph.topological_order(), &["b", "a", "c"]);
        assert_eq!(graph.levels().len(), 1);
    }

    #[test]
    fn test_levels_group_independent_resources() {
        let mut stack = sample_stack();
        stack.add(rg("my-application"));
        stack.add(
            ResourceDecl::new("storage", ResourceKind::StorageAccount)
                .with_property("resource_group_name", Value::reference("my-application", "name")),
        );

        let levels = DependencyGraph::build(&stack).unwrap().levels();
        assert_eq!(levels[0], vec!["my-network", "my-application"]);
        assert_eq!(levels[1], vec!["myvnet", "storage"]);
        assert_eq!(levels[2], vec!["application-subnet"]);
    }

    #[test]
    fn test_cycle_detected() {
        let mut stack = Stack::new("cycle");
        stack.add(
            ResourceDecl::new("a", ResourceKind::Subnet)
                .with_property("x", Value::reference("b", "id")),
        );
        stack.add(
            ResourceDecl::new("b", ResourceKind::Subnet)
                .with_property("x", Value::reference("c", "id")),
        );
        stack.add(ResourceDecl::new("c", ResourceKind::Subnet).with_depends_on("a"));
        stack.add(rg("unrelated"));

        match DependencyGraph::build(&stack) {
            Err(GraphError::Cycle { path }) => {
                assert_eq!(path.first(), path.last());
                assert_eq!(path.len(), 4);
                assert!(!path.contains(&"unrelated".to_string()));
            }
            other => panic!("expected cycle, got {:?}", other),
        }
    }

    #[test]
    fn test_self_reference_is_cycle() {
        let mut stack = Stack::new("self");
        stack.add(
            ResourceDecl::new("ip", ResourceKind::PublicIp)
                .with_property("domain_name_label", Value::reference("ip", "name")),
        );

        let err = DependencyGraph::build(&stack).unwrap_err();
        assert_eq!(
            err,
            GraphError::Cycle {
                path: vec!["ip".to_string(), "ip".to_string()]
            }
        );
    }

    #[test]
    fn test_unresolved_reference() {
        let mut stack = Stack::new("missing");
        stack.add(
            ResourceDecl::new("aci", ResourceKind::ContainerGroup)
                .with_property("network_profile_id", Value::reference("profile", "id")),
        );

        let err = DependencyGraph::build(&stack).unwrap_err();
        assert_eq!(
            err,
            GraphError::UnresolvedReference {
                from: "aci".to_string(),
                target: "profile".to_string()
            }
        );
    }

    #[test]
    fn test_unresolved_depends_on() {
        let mut stack = Stack::new("missing");
        stack.add(ResourceDecl::new("subnet", ResourceKind::Subnet).with_depends_on("myvnet"));

        assert!(matches!(
            DependencyGraph::build(&stack),
            Err(GraphError::UnresolvedReference { .. })
        ));
    }

    #[test]
    fn test_unknown_output() {
        let mut stack = sample_stack();
        stack
            .outputs
            .insert("url".to_string(), Value::reference("myvnet", "fqdn"));

        assert!(matches!(
            DependencyGraph::build(&stack),
            Err(GraphError::UnknownOutput { .. })
        ));
    }

    #[test]
    fn test_dependents_of_is_transitive() {
        let graph = DependencyGraph::build(&sample_stack()).unwrap();
        let dependents = graph.dependents_of("myvnet");
        assert_eq!(
            dependents.into_iter().collect::<Vec<_>>(),
            vec!["aci", "application-subnet", "profile"]
        );
        assert!(graph.dependents_of("aci").is_empty());
    }

    #[test]
    fn test_from_dependencies_ignores_missing_nodes() {
        let graph = DependencyGraph::from_dependencies(vec![
            ("subnet".to_string(), BTreeSet::from(["gone".to_string()])),
            (
                "profile".to_string(),
                BTreeSet::from(["subnet".to_string()]),
            ),
        ])
        .unwrap();

        assert_eq!(graph.reverse_order(), vec!["profile", "subnet"]);
    }
}
